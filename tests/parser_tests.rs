// tests/parser_tests.rs
//
// End-to-end parses through the compiler facade: whole constructs in, typed
// trees out, with positioned errors on the failure path.

use muscript::ast::{
    Block, BodyItem, File, IfNode, SimpleValueItem, Statement, StatementContent, StringItem,
    ValueItem,
};
use muscript::{CompileError, Compiler, Config};

fn parse(source: &str) -> File {
    Compiler::new()
        .parse(source)
        .unwrap_or_else(|e| panic!("parse failed: {e}"))
        .root
}

fn statements(file: &File) -> &[Statement] {
    match &file.block {
        Some(block) => &block.statements,
        None => &[],
    }
}

fn block_of(item: &BodyItem) -> &Block {
    match item {
        BodyItem::Block(b) => b,
        BodyItem::Statement(s) => panic!("expected a block, got {s:?}"),
    }
}

// ---
// Statements and blocks
// ---

#[test]
fn test_assignment_then_call() {
    let file = parse("total = 10\nprint total");
    assert_eq!(statements(&file).len(), 2);
}

#[test]
fn test_nested_indentation() {
    let file = parse("if a\n  if b\n    x = 1\n  y = 2\nz = 3");
    let stmts = statements(&file);
    assert_eq!(stmts.len(), 2);

    let StatementContent::ExpListAssign(outer) = &*stmts[0].content else {
        panic!("expected an expression statement");
    };
    let ValueItem::SimpleValue(sv) = &*outer.exprs.exprs[0].value.item else {
        panic!("expected a simple value");
    };
    let SimpleValueItem::If(if_node) = &*sv.item else {
        panic!("expected an if");
    };
    let IfNode::Body(body) = &if_node.nodes[1] else {
        panic!("expected the branch body");
    };
    // The branch holds the inner if plus the dedented follow-up.
    assert_eq!(block_of(&body.item).statements.len(), 2);
}

#[test]
fn test_one_line_if_with_then() {
    let file = parse("if ready then go!");
    assert_eq!(statements(&file).len(), 1);
}

#[test]
fn test_while_and_numeric_for() {
    let file = parse("while n > 0\n  n -= 1\nfor i = 1, 10, 2\n  print i");
    let stmts = statements(&file);
    assert!(matches!(&*stmts[0].content, StatementContent::While(_)));
    let StatementContent::For(f) = &*stmts[1].content else {
        panic!("expected a for loop");
    };
    assert_eq!(f.var.name.text, "i");
    assert!(f.step.is_some());
}

#[test]
fn test_update_operators() {
    let file = parse("x += 1\nx or= y\nx and= z\nx |= 4\nx >>= 2\nx ..= \"s\"");
    let stmts = statements(&file);
    assert_eq!(stmts.len(), 6);
    for stmt in stmts {
        let StatementContent::ExpListAssign(ela) = &*stmt.content else {
            panic!("expected an expression statement");
        };
        assert!(matches!(
            ela.action.as_deref(),
            Some(muscript::ast::AssignAction::Update(_))
        ));
    }
}

#[test]
fn test_with_block_implicit_access() {
    let file = parse("with window\n  .width = 100\n  \\show!\n  print .width");
    assert_eq!(statements(&file).len(), 1);
}

#[test]
fn test_foreach_with_destructuring() {
    let file = parse("for {x, y} in *points\n  draw x, y");
    let stmts = statements(&file);
    assert!(matches!(&*stmts[0].content, StatementContent::ForEach(_)));
}

#[test]
fn test_try_catch() {
    let file = parse("try\n  risky!\ncatch err\n  log err");
    let StatementContent::ExpListAssign(ela) = &*statements(&file)[0].content else {
        panic!("expected an expression statement");
    };
    let ValueItem::SimpleValue(sv) = &*ela.exprs.exprs[0].value.item else {
        panic!("expected a simple value");
    };
    let SimpleValueItem::Try(t) = &*sv.item else {
        panic!("expected a try");
    };
    assert!(t.catch.is_some());
}

#[test]
fn test_backcall() {
    let file = parse("(data) <- fetch url\nprint data");
    let stmts = statements(&file);
    assert!(matches!(&*stmts[0].content, StatementContent::Backcall(_)));
}

#[test]
fn test_import_from() {
    let file = parse("import concat, insert from table");
    assert!(matches!(
        &*statements(&file)[0].content,
        StatementContent::Import(_)
    ));
}

#[test]
fn test_statement_appendix() {
    let file = parse("print x for x in *items");
    let stmt = &statements(&file)[0];
    assert!(stmt.appendix.is_some());
}

// ---
// Expressions
// ---

#[test]
fn test_class_with_members() {
    let file = parse("class Point extends Base\n  new: (@x, @y) =>\n  move: => @x");
    let StatementContent::ExpListAssign(ela) = &*statements(&file)[0].content else {
        panic!("expected an expression statement");
    };
    let ValueItem::SimpleValue(sv) = &*ela.exprs.exprs[0].value.item else {
        panic!("expected a simple value");
    };
    let SimpleValueItem::ClassDecl(class) = &*sv.item else {
        panic!("expected a class");
    };
    assert!(class.name.is_some());
    assert!(class.extend.is_some());
    assert!(class.body.is_some());
}

#[test]
fn test_list_comprehension() {
    let file = parse("squares = [x * x for x in *nums when x > 0]");
    assert_eq!(statements(&file).len(), 1);
}

#[test]
fn test_table_comprehension() {
    let file = parse("inverted = {v, k for k, v in pairs tbl}");
    assert_eq!(statements(&file).len(), 1);
}

#[test]
fn test_switch_with_else() {
    let file = parse("switch kind\n  when 1, 2\n    low!\n  when 3\n    mid!\n  else\n    high!");
    assert_eq!(statements(&file).len(), 1);
}

#[test]
fn test_function_with_defaults_and_vararg() {
    let file = parse("f = (a, b = 2, ...) -> a + b");
    assert_eq!(statements(&file).len(), 1);
}

#[test]
fn test_string_interpolation() {
    let file = parse("msg = \"sum: #{a + b}!\"");
    let StatementContent::ExpListAssign(ela) = &*statements(&file)[0].content else {
        panic!("expected an expression statement");
    };
    let Some(action) = &ela.action else {
        panic!("expected an assignment");
    };
    let muscript::ast::AssignAction::Assign(assign) = &**action else {
        panic!("expected a plain assignment");
    };
    let muscript::ast::AssignValue::Exp(exp) = &assign.values[0] else {
        panic!("expected an expression value");
    };
    let ValueItem::String_(s) = &*exp.value.item else {
        panic!("expected a string");
    };
    let StringItem::DoubleString(ds) = &*s.item else {
        panic!("expected a double-quoted string");
    };
    assert_eq!(ds.segments.len(), 3);
}

#[test]
fn test_long_string_with_level() {
    let file = parse("doc = [==[may contain ]] inside]==]");
    assert_eq!(statements(&file).len(), 1);
}

// ---
// Failure path
// ---

#[test]
fn test_syntax_error_carries_line_and_column() {
    let err = Compiler::new().parse("x = 1\ny = )").unwrap_err();
    assert_eq!(err.to_string(), "syntax error at line 2, column 5");
    assert_eq!(err.code(), 1);
}

#[test]
fn test_truncated_source_is_invalid_eof() {
    let err = Compiler::new().parse("x = ").unwrap_err();
    assert!(matches!(err, CompileError::InvalidEof { .. }));
}

#[test]
fn test_truncated_block_points_past_the_last_token() {
    // The dangling operator leaves every failure at end of input.
    let err = Compiler::new().parse("if x then\n  y +").unwrap_err();
    match err {
        CompileError::InvalidEof { line, col, .. } => assert_eq!((line, col), (2, 6)),
        other => panic!("unexpected: {other:?}"),
    }
}

#[test]
fn test_mixed_indentation_is_a_user_error() {
    let err = Compiler::new().parse("if a\n \tb!").unwrap_err();
    match err {
        CompileError::User { kind, .. } => assert_eq!(kind, 100),
        other => panic!("unexpected: {other:?}"),
    }
}

// ---
// Lint and serialization
// ---

#[test]
fn test_lint_reports_globals_with_positions() {
    let compiler = Compiler::with_config(Config {
        lint_global: true,
        ..Config::default()
    });
    let out = compiler.parse("x = 1\nprint x, y").expect("parse");
    let globals = out.globals.expect("globals requested");
    let names: Vec<&str> = globals.iter().map(|g| g.name.as_str()).collect();
    assert_eq!(names, ["print", "y"]);
    assert_eq!((globals[0].line, globals[0].col), (2, 1));
}

#[test]
fn test_tree_serializes_to_json() {
    let file = parse("greet = -> print \"hi\"");
    let json = serde_json::to_string(&file).expect("serialize");
    assert!(json.contains("greet"));
}
