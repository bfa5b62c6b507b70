//! The language grammar.
//!
//! About 150 rules over the PEG engine, built once and shared behind a
//! [`Lazy`] static. Layout is indentation-sensitive: a small set of
//! semantic predicates maintains the indent stack in [`State`] while
//! matching, and every block-shaped construct brackets its body between
//! an `Advance` and a `PopIndent`. Node construction happens entirely in
//! deferred actions, so a failed sub-parse can never leave partial nodes
//! behind.
//!
//! List-bearing nodes open with a `Separator` marker pushed by the
//! grammar, which bounds their greedy child collection; see the node
//! definitions for the full story.

pub mod state;

use once_cell::sync::Lazy;

use crate::ast::{BuildNode, Span};
use crate::peg::{
    and_, any, ch, eof, false_, lit, not_, range, set, true_, user, Capture, CharSet, Expr,
    Grammar, RuleId, UserError,
};

pub use state::State;
use state::PREVENT_INDENT;

type E = Expr<State>;

/// The shared grammar, compiled on first use.
pub static GRAMMAR: Lazy<MuGrammar> = Lazy::new(MuGrammar::build);

pub struct MuGrammar {
    grammar: Grammar<State>,
    file: RuleId,
}

impl MuGrammar {
    pub fn grammar(&self) -> &Grammar<State> {
        &self.grammar
    }

    /// The root rule. Trailing-input detection lives in the engine, so the
    /// root deliberately does not require end of input itself.
    pub fn file(&self) -> RuleId {
        self.file
    }
}

// ============================================================================
// KEYWORDS
// ============================================================================

const LUA_KEYWORDS: &[&str] = &[
    "and", "break", "do", "else", "elseif", "end", "false", "for", "function", "goto", "if",
    "in", "local", "nil", "not", "or", "repeat", "return", "then", "true", "until", "while",
];

const MU_KEYWORDS: &[&str] = &[
    "as", "catch", "class", "continue", "export", "extends", "from", "global", "import",
    "switch", "try", "unless", "using", "when", "with",
];

pub fn is_keyword(word: &str) -> bool {
    LUA_KEYWORDS.contains(&word) || MU_KEYWORDS.contains(&word)
}

fn is_lua_keyword(word: &str) -> bool {
    LUA_KEYWORDS.contains(&word)
}

// ============================================================================
// DSL HELPERS
// ============================================================================

fn r(id: RuleId) -> E {
    Expr::Rule(id)
}

fn alpha() -> E {
    Expr::Set(
        CharSet::from_range('a', 'z')
            .union(CharSet::from_range('A', 'Z'))
            .union(CharSet::from_chars("_")),
    )
}

fn alpha_num() -> E {
    Expr::Set(
        CharSet::from_range('a', 'z')
            .union(CharSet::from_range('A', 'Z'))
            .union(CharSet::from_range('0', '9'))
            .union(CharSet::from_chars("_")),
    )
}

fn hex_digit() -> E {
    Expr::Set(
        CharSet::from_range('0', '9')
            .union(CharSet::from_range('a', 'f'))
            .union(CharSet::from_range('A', 'F')),
    )
}

/// A keyword literal: the word itself, not followed by an identifier char.
fn key(word: &str) -> E {
    lit(word) >> not_(alpha_num())
}

/// Run `body`, then `finally` whether or not `body` matched. Used to keep
/// the indent and disable stacks balanced across backtracking.
fn ensure(body: E, finally: E) -> E {
    (body >> finally.clone()) | (finally >> false_())
}

/// Width of an indentation run: a space counts 1, a tab 4. A tab after a
/// space is ambiguous and aborts the parse.
fn indent_width(cap: &Capture<'_>) -> Result<i32, UserError> {
    let mut width = 0;
    let mut seen_space = false;
    for &c in cap.chars() {
        match c {
            '\t' => {
                if seen_space {
                    return Err(UserError::new(
                        "tab found after space in indentation",
                        cap.begin,
                        cap.end,
                    ));
                }
                width += 4;
            }
            _ => {
                seen_space = true;
                width += 1;
            }
        }
    }
    Ok(width)
}

/// Attach the standard node-building action to a rule: construct the node
/// from the stack, store the matched text for leaf kinds, push it back.
fn build<T: BuildNode + 'static>(g: &mut Grammar<State>, id: RuleId) {
    g.action(id, |cap, st| {
        let mut node = T::construct(&mut st.ast, Span::from_capture(cap))?;
        if T::HAS_TEXT {
            node.set_text(cap.text());
        }
        st.ast.push(node.into());
        Ok(())
    });
}

// ============================================================================
// GRAMMAR CONSTRUCTION
// ============================================================================

impl MuGrammar {
    #[allow(clippy::similar_names)]
    fn build() -> MuGrammar {
        use crate::ast::nodes as n;

        let mut g: Grammar<State> = Grammar::new();

        // -- declarations (everything is mutually recursive somewhere) --
        let break_ = g.declare("Break");
        let any_char = g.declare("AnyChar");
        let stop = g.declare("Stop");
        let comment = g.declare("Comment");
        let space = g.declare("Space");
        let some_space = g.declare("SomeSpace");
        let white = g.declare("White");
        let indent = g.declare("Indent");
        let check_indent = g.declare("CheckIndent");
        let advance = g.declare("Advance");
        let prevent_indent = g.declare("PreventIndent");
        let pop_indent = g.declare("PopIndent");
        let in_block = g.declare("InBlock");
        let disable_do = g.declare("DisableDo");
        let pop_do = g.declare("PopDo");
        let enter_with = g.declare("EnterWith");
        let pop_with = g.declare("PopWith");
        let comma = g.declare("Comma");
        let sep = g.declare("Separator");

        let name = g.declare("Name");
        let variable = g.declare("Variable");
        let label_name = g.declare("LabelName");
        let lua_keyword = g.declare("LuaKeyword");
        let num = g.declare("Num");
        let vararg = g.declare("VarArg");
        let const_value = g.declare("ConstValue");

        let single_string_inner = g.declare("SingleStringInner");
        let single_string = g.declare("SingleString");
        let double_string_inner = g.declare("DoubleStringInner");
        let double_string_content = g.declare("DoubleStringContent");
        let double_string = g.declare("DoubleString");
        let lua_string_open = g.declare("LuaStringOpen");
        let lua_string_close = g.declare("LuaStringClose");
        let lua_string_content = g.declare("LuaStringContent");
        let lua_string = g.declare("LuaString");
        let string_rule = g.declare("String");

        let binary_operator = g.declare("BinaryOperator");
        let unary_operator = g.declare("UnaryOperator");
        let update_op = g.declare("UpdateOp");
        let fn_arrow = g.declare("FnArrow");
        let backcall_arrow = g.declare("BackcallArrow");

        let self_class_name = g.declare("SelfClassName");
        let self_class = g.declare("SelfClass");
        let self_var = g.declare("SelfVar");
        let self_plain = g.declare("Self");
        let self_name = g.declare("SelfName");
        let key_name = g.declare("KeyName");

        let exp = g.declare("Exp");
        let exp_op_value = g.declare("ExpOpValue");
        let value = g.declare("Value");
        let simple_value = g.declare("SimpleValue");
        let unary_exp = g.declare("UnaryExp");
        let parens = g.declare("Parens");
        let callable = g.declare("Callable");
        let dot_chain = g.declare("DotChainItem");
        let colon_chain = g.declare("ColonChainItem");
        let existential = g.declare("Existential");
        let bracket_exp = g.declare("BracketExp");
        let default_value = g.declare("DefaultValue");
        let slice = g.declare("Slice");
        let invoke = g.declare("Invoke");
        let invoke_args = g.declare("InvokeArgs");
        let chain_value = g.declare("ChainValue");

        let variable_pair = g.declare("VariablePair");
        let normal_pair = g.declare("NormalPair");
        let table_lit = g.declare("TableLit");
        let simple_table = g.declare("SimpleTable");
        let table_block = g.declare("TableBlock");

        let if_cond = g.declare("IfCond");
        let if_rule = g.declare("If");
        let unless_rule = g.declare("Unless");
        let while_rule = g.declare("While");
        let repeat_rule = g.declare("Repeat");
        let for_step = g.declare("ForStepValue");
        let for_rule = g.declare("For");
        let for_each = g.declare("ForEach");
        let star_exp = g.declare("StarExp");
        let do_rule = g.declare("Do");
        let catch_block = g.declare("CatchBlock");
        let try_rule = g.declare("Try");
        let switch_case = g.declare("SwitchCase");
        let switch_rule = g.declare("Switch");
        let with_rule = g.declare("With");

        let comp_for_each = g.declare("CompForEach");
        let comp_for = g.declare("CompFor");
        let comp_inner = g.declare("CompInner");
        let comprehension = g.declare("Comprehension");
        let tbl_comp_value = g.declare("TblCompValue");
        let tbl_comprehension = g.declare("TblComprehension");

        let fn_arg_def = g.declare("FnArgDef");
        let fn_arg_def_list = g.declare("FnArgDefList");
        let outer_var_shadow = g.declare("OuterVarShadow");
        let fn_args_def = g.declare("FnArgsDef");
        let fun_lit = g.declare("FunLit");
        let backcall = g.declare("Backcall");

        let name_list = g.declare("NameList");
        let assignable_name_list = g.declare("AssignableNameList");
        let exp_list = g.declare("ExpList");
        let exp_list_low = g.declare("ExpListLow");
        let assign = g.declare("Assign");
        let update = g.declare("Update");
        let exp_list_assign = g.declare("ExpListAssign");

        let local_flag = g.declare("LocalFlag");
        let local_rule = g.declare("Local");
        let local_attrib = g.declare("LocalAttrib");
        let name_values = g.declare("NameValues");
        let global_rule = g.declare("Global");
        let export_rule = g.declare("Export");
        let import_name = g.declare("ImportName");
        let colon_import_name = g.declare("ColonImportName");
        let import_literal_d = g.declare("ImportLiteralDouble");
        let import_literal_s = g.declare("ImportLiteralSingle");
        let import_from = g.declare("ImportFrom");
        let import_as = g.declare("ImportAs");
        let import_rule = g.declare("Import");
        let return_rule = g.declare("Return");
        let break_loop = g.declare("BreakLoop");
        let label = g.declare("Label");
        let goto_rule = g.declare("Goto");
        let class_member_list = g.declare("ClassMemberList");
        let class_block = g.declare("ClassBlock");
        let class_decl = g.declare("ClassDecl");

        let if_line = g.declare("IfLine");
        let unless_line = g.declare("UnlessLine");
        let statement_appendix = g.declare("StatementAppendix");
        let statement = g.declare("Statement");
        let block = g.declare("Block");
        let shebang = g.declare("Shebang");
        let file = g.declare("File");

        // Line breaks and blank runs before a block clause.
        let breaks = || (r(space) >> r(break_)).plus();
        // A clause keyword may sit on the same line or on a fresh line at
        // the block's own indent.
        let clause_lead = || breaks() >> r(check_indent) >> r(space) | r(space);

        // -- layout and trivia --
        g.define(break_, crate::peg::nl(ch('\r').opt() >> ch('\n')));
        g.define(any_char, r(break_) | any());
        g.define(stop, r(break_) | eof());
        g.define(
            comment,
            lit("--") >> (not_(set("\r\n")) >> any()).star() >> and_(r(stop)),
        );
        g.define(space, (set(" \t").plus() | r(comment)).star());
        g.define(some_space, set(" \t").plus());
        g.define(white, (r(break_) | set(" \t") | r(comment)).star());

        g.define(indent, set(" \t").star());
        g.define(
            check_indent,
            and_(user(r(indent), |cap, st: &mut State| {
                Ok(indent_width(cap)? == st.current_indent())
            })),
        );
        g.define(
            advance,
            and_(user(r(indent), |cap, st: &mut State| {
                let width = indent_width(cap)?;
                let top = st.current_indent();
                if top != PREVENT_INDENT && width > top {
                    st.indents.push(width);
                    Ok(true)
                } else {
                    Ok(false)
                }
            })),
        );
        g.define(
            prevent_indent,
            user(true_(), |_, st: &mut State| {
                st.indents.push(PREVENT_INDENT);
                Ok(true)
            }),
        );
        g.define(
            pop_indent,
            user(true_(), |_, st: &mut State| {
                st.indents.pop();
                Ok(true)
            }),
        );
        g.define(in_block, breaks() >> r(advance) >> ensure(r(block), r(pop_indent)));

        g.define(
            disable_do,
            user(true_(), |_, st: &mut State| {
                st.do_disable.push(true);
                Ok(true)
            }),
        );
        g.define(
            pop_do,
            user(true_(), |_, st: &mut State| {
                st.do_disable.pop();
                Ok(true)
            }),
        );
        // Header expressions of loops and switches must not swallow a `do`
        // block that belongs to the construct itself.
        let guarded_exp = |inner: E| r(disable_do) >> ensure(inner, r(pop_do));

        g.define(
            enter_with,
            user(true_(), |_, st: &mut State| {
                st.with_open.push(true);
                Ok(true)
            }),
        );
        g.define(
            pop_with,
            user(true_(), |_, st: &mut State| {
                st.with_open.pop();
                Ok(true)
            }),
        );

        g.define(
            comma,
            r(space) >> ch(',') >> r(space) >> (r(break_) >> r(space)).opt(),
        );

        g.define(sep, true_());
        build::<n::Separator>(&mut g, sep);

        // -- identifiers and literals --
        g.define(name, alpha() >> alpha_num().star());
        build::<n::Name>(&mut g, name);

        g.define(
            variable,
            user(r(name), |cap, _st: &mut State| Ok(!is_keyword(&cap.text()))),
        );
        build::<n::Variable>(&mut g, variable);

        g.define(label_name, alpha() >> alpha_num().star());
        build::<n::LabelName>(&mut g, label_name);

        // Lua keywords are legal method names after `\`.
        g.define(
            lua_keyword,
            user(alpha() >> alpha_num().star(), |cap, _st: &mut State| {
                Ok(is_lua_keyword(&cap.text()))
            }),
        );
        build::<n::LuaKeyword>(&mut g, lua_keyword);

        let exponent = || set("eE") >> set("+-").opt() >> range('0', '9').plus();
        g.define(
            num,
            lit("0x") >> hex_digit().plus()
                | range('0', '9').plus()
                    >> (ch('.') >> range('0', '9').plus()).opt()
                    >> exponent().opt()
                | ch('.') >> range('0', '9').plus() >> exponent().opt(),
        );
        build::<n::Num>(&mut g, num);

        g.define(vararg, lit("..."));
        build::<n::VarArg>(&mut g, vararg);

        g.define(const_value, key("nil") | key("true") | key("false"));
        build::<n::ConstValue>(&mut g, const_value);

        // -- strings --
        g.define(
            single_string_inner,
            (lit("\\") >> r(any_char) | not_(ch('\'')) >> r(any_char)).star(),
        );
        build::<n::SingleString>(&mut g, single_string_inner);
        g.define(single_string, ch('\'') >> r(single_string_inner) >> ch('\''));

        g.define(
            double_string_inner,
            (lit("\\") >> r(any_char) | not_(ch('"') | lit("#{")) >> r(any_char)).plus(),
        );
        build::<n::DoubleStringInner>(&mut g, double_string_inner);

        g.define(
            double_string_content,
            r(double_string_inner)
                | lit("#{") >> r(space) >> r(exp) >> r(space) >> ch('}'),
        );
        build::<n::DoubleStringContent>(&mut g, double_string_content);

        g.define(
            double_string,
            ch('"') >> r(sep) >> r(double_string_content).star() >> ch('"'),
        );
        build::<n::DoubleString>(&mut g, double_string);

        g.define(
            lua_string_open,
            user(ch('[') >> ch('=').star() >> ch('['), |cap, st: &mut State| {
                st.string_open = cap.chars().len() as i32 - 2;
                Ok(true)
            }),
        );
        g.define(
            lua_string_close,
            user(ch(']') >> ch('=').star() >> ch(']'), |cap, st: &mut State| {
                Ok(cap.chars().len() as i32 - 2 == st.string_open)
            }),
        );
        g.define(
            lua_string_content,
            (not_(r(lua_string_close)) >> r(any_char)).star(),
        );
        build::<n::LuaString>(&mut g, lua_string_content);
        g.define(
            lua_string,
            r(lua_string_open) >> r(break_).opt() >> r(lua_string_content) >> r(lua_string_close),
        );

        g.define(string_rule, r(double_string) | r(single_string) | r(lua_string));
        build::<n::String_>(&mut g, string_rule);

        // -- operators --
        g.define(
            binary_operator,
            key("or")
                | key("and")
                | lit("<=")
                | lit(">=")
                | lit("~=")
                | lit("!=")
                | lit("==")
                | lit("<<")
                | lit(">>")
                | lit("//")
                | lit("..") >> not_(ch('.'))
                | set("+-*/%^><|&"),
        );
        build::<n::BinaryOperator>(&mut g, binary_operator);

        g.define(
            unary_operator,
            key("not") | ch('-') >> not_(set("> \t")) | ch('#') | ch('~'),
        );
        build::<n::UnaryOperator>(&mut g, unary_operator);

        g.define(
            update_op,
            key("or")
                | key("and")
                | lit("..")
                | lit("//")
                | lit("<<")
                | lit(">>")
                | set("+-*/%^|&"),
        );
        build::<n::UpdateOp>(&mut g, update_op);

        g.define(fn_arrow, lit("->") | lit("=>"));
        build::<n::FnArrow>(&mut g, fn_arrow);

        g.define(backcall_arrow, lit("<-") | lit("<="));
        build::<n::FnArrow>(&mut g, backcall_arrow);

        // -- self access --
        g.define(self_class_name, lit("@@") >> r(name));
        build::<n::SelfClassNameItem>(&mut g, self_class_name);
        g.define(self_class, lit("@@"));
        build::<n::SelfClassItem>(&mut g, self_class);
        g.define(self_var, ch('@') >> r(name));
        build::<n::SelfNameItem>(&mut g, self_var);
        g.define(self_plain, ch('@'));
        build::<n::SelfItem>(&mut g, self_plain);
        g.define(
            self_name,
            r(self_class_name) | r(self_class) | r(self_var) | r(self_plain),
        );
        build::<n::SelfName>(&mut g, self_name);

        g.define(key_name, r(self_name) | r(name));
        build::<n::KeyName>(&mut g, key_name);

        // -- expressions --
        g.define(exp, r(value) >> r(exp_op_value).star());
        build::<n::Exp>(&mut g, exp);

        // A binary operator may carry its right operand onto the next line.
        g.define(
            exp_op_value,
            r(space)
                >> r(binary_operator)
                >> r(space)
                >> (r(break_) >> r(space)).opt()
                >> r(value),
        );
        build::<n::ExpOpValue>(&mut g, exp_op_value);

        g.define(
            value,
            r(simple_value) | r(simple_table) | r(chain_value) | r(string_rule),
        );
        build::<n::Value>(&mut g, value);

        g.define(
            simple_value,
            r(const_value)
                | r(if_rule)
                | r(unless_rule)
                | r(switch_rule)
                | r(with_rule)
                | r(class_decl)
                | r(for_each)
                | r(for_rule)
                | r(while_rule)
                | r(do_rule)
                | r(try_rule)
                | r(unary_exp)
                | r(tbl_comprehension)
                | r(comprehension)
                | r(fun_lit)
                | r(table_lit)
                | r(num),
        );
        build::<n::SimpleValue>(&mut g, simple_value);

        g.define(unary_exp, (r(unary_operator) >> r(space)).plus() >> r(exp));
        build::<n::UnaryExp>(&mut g, unary_exp);

        g.define(parens, ch('(') >> r(white) >> r(exp) >> r(white) >> ch(')'));
        build::<n::Parens>(&mut g, parens);

        g.define(callable, r(variable) | r(self_name) | r(vararg) | r(parens));
        build::<n::Callable>(&mut g, callable);

        // -- chains --
        g.define(dot_chain, ch('.') >> not_(ch('.')) >> r(name));
        build::<n::DotChainItem>(&mut g, dot_chain);

        g.define(colon_chain, ch('\\') >> (r(lua_keyword) | r(name)));
        build::<n::ColonChainItem>(&mut g, colon_chain);

        g.define(existential, ch('?'));
        build::<n::Existential>(&mut g, existential);

        // `[[` and `[=` open a long string, never an index.
        g.define(
            bracket_exp,
            ch('[') >> not_(set("[=")) >> r(space) >> r(exp) >> r(space) >> ch(']'),
        );
        build::<n::BracketExp>(&mut g, bracket_exp);

        g.define(default_value, true_());
        build::<n::DefaultValue>(&mut g, default_value);

        let slice_value = || r(exp) | r(default_value);
        g.define(
            slice,
            ch('[')
                >> not_(set("[="))
                >> r(space)
                >> slice_value()
                >> r(space)
                >> ch(',')
                >> r(space)
                >> slice_value()
                >> r(space)
                >> (ch(',') >> r(space) >> slice_value() | r(default_value))
                >> r(space)
                >> ch(']'),
        );
        build::<n::Slice>(&mut g, slice);

        // `f!` is the argument-less call; `!=` stays a comparison.
        g.define(
            invoke,
            r(sep)
                >> (ch('(')
                    >> r(white)
                    >> (r(exp) >> (r(white) >> ch(',') >> r(white) >> r(exp)).star()).opt()
                    >> r(white)
                    >> ch(')')
                    | ch('!') >> not_(ch('='))),
        );
        build::<n::Invoke>(&mut g, invoke);

        g.define(
            invoke_args,
            r(sep) >> r(some_space) >> r(exp) >> (r(comma) >> r(exp)).star(),
        );
        build::<n::InvokeArgs>(&mut g, invoke_args);

        let chain_item = || {
            r(invoke)
                | r(dot_chain)
                | r(colon_chain)
                | r(slice)
                | r(bracket_exp)
                | r(string_rule)
                | r(existential)
        };
        // Inside a `with` body a chain may omit its head: the leading
        // `.name`/`\name` binds to the `with` target.
        let implicit_chain = || {
            user(true_(), |_, st: &mut State| Ok(st.in_with()))
                >> (r(dot_chain) | r(colon_chain))
                >> chain_item().star()
        };
        g.define(
            chain_value,
            (r(callable) >> chain_item().star() | implicit_chain()) >> r(invoke_args).opt(),
        );
        build::<n::ChainValue>(&mut g, chain_value);

        // -- tables --
        g.define(variable_pair, ch(':') >> r(variable));
        build::<n::VariablePair>(&mut g, variable_pair);

        g.define(
            normal_pair,
            (r(key_name) | r(bracket_exp) | r(string_rule))
                >> ch(':')
                >> r(space)
                >> (r(exp) | r(table_block)),
        );
        build::<n::NormalPair>(&mut g, normal_pair);

        let key_value = || r(variable_pair) | r(normal_pair);
        let table_value = || r(variable_pair) | r(normal_pair) | r(exp);
        // Entries split on commas, semicolons, or plain line breaks.
        let table_delim = || {
            r(white) >> set(",;") >> r(white) | r(space) >> r(break_) >> r(white)
        };
        g.define(
            table_lit,
            r(sep)
                >> ch('{')
                >> r(white)
                >> (table_value() >> (table_delim() >> table_value()).star()).opt()
                >> (r(white) >> set(",;")).opt()
                >> r(white)
                >> ch('}'),
        );
        build::<n::TableLit>(&mut g, table_lit);

        g.define(
            simple_table,
            r(sep) >> key_value() >> (r(comma) >> key_value()).star(),
        );
        build::<n::SimpleTable>(&mut g, simple_table);

        let table_block_line =
            || r(check_indent) >> r(space) >> key_value() >> (r(comma) >> key_value()).star();
        g.define(
            table_block,
            r(sep)
                >> breaks()
                >> r(advance)
                >> ensure(
                    table_block_line() >> (breaks() >> table_block_line()).star(),
                    r(pop_indent),
                ),
        );
        build::<n::TableBlock>(&mut g, table_block);

        // -- conditionals --
        // The optional assignment may not open an indented block: whatever
        // follows the header at deeper indent is the body.
        g.define(
            if_cond,
            r(exp)
                >> (r(space) >> r(prevent_indent) >> ensure(r(assign), r(pop_indent))).opt(),
        );
        build::<n::IfCond>(&mut g, if_cond);

        let body = || r(in_block) | r(space) >> r(statement);
        let body_rule = g.rule("Body", body());
        build::<n::Body>(&mut g, body_rule);

        g.define(
            if_rule,
            r(sep)
                >> key("if")
                >> r(space)
                >> r(if_cond)
                >> (r(space) >> key("then")).opt()
                >> r(body_rule)
                >> (clause_lead()
                    >> key("elseif")
                    >> r(space)
                    >> r(if_cond)
                    >> (r(space) >> key("then")).opt()
                    >> r(body_rule))
                    .star()
                >> (clause_lead() >> key("else") >> r(body_rule)).opt(),
        );
        build::<n::If>(&mut g, if_rule);

        g.define(
            unless_rule,
            r(sep)
                >> key("unless")
                >> r(space)
                >> r(if_cond)
                >> (r(space) >> key("then")).opt()
                >> r(body_rule)
                >> (clause_lead() >> key("else") >> r(body_rule)).opt(),
        );
        build::<n::Unless>(&mut g, unless_rule);

        // -- loops --
        g.define(
            while_rule,
            key("while")
                >> r(space)
                >> guarded_exp(r(exp))
                >> (r(space) >> key("do")).opt()
                >> r(body_rule),
        );
        build::<n::While>(&mut g, while_rule);

        g.define(
            repeat_rule,
            key("repeat")
                >> r(body_rule)
                >> clause_lead()
                >> key("until")
                >> r(space)
                >> r(exp),
        );
        build::<n::Repeat>(&mut g, repeat_rule);

        g.define(for_step, r(exp));
        build::<n::ForStepValue>(&mut g, for_step);

        g.define(
            for_rule,
            key("for")
                >> r(space)
                >> r(variable)
                >> r(space)
                >> ch('=')
                >> r(space)
                >> guarded_exp(
                    r(exp)
                        >> r(space)
                        >> ch(',')
                        >> r(space)
                        >> r(exp)
                        >> (r(space) >> ch(',') >> r(space) >> r(for_step)).opt(),
                )
                >> (r(space) >> key("do")).opt()
                >> r(body_rule),
        );
        build::<n::For>(&mut g, for_rule);

        g.define(star_exp, ch('*') >> r(exp));
        build::<n::StarExp>(&mut g, star_exp);

        g.define(
            for_each,
            key("for")
                >> r(space)
                >> r(assignable_name_list)
                >> r(space)
                >> key("in")
                >> r(space)
                >> guarded_exp(r(star_exp) | r(exp_list))
                >> (r(space) >> key("do")).opt()
                >> r(body_rule),
        );
        build::<n::ForEach>(&mut g, for_each);

        g.define(
            do_rule,
            user(key("do"), |_, st: &mut State| Ok(!st.do_disabled())) >> r(body_rule),
        );
        build::<n::Do>(&mut g, do_rule);

        g.define(
            catch_block,
            clause_lead() >> key("catch") >> r(space) >> r(variable) >> r(body_rule),
        );
        build::<n::CatchBlock>(&mut g, catch_block);

        g.define(try_rule, key("try") >> r(body_rule) >> r(catch_block).opt());
        build::<n::Try>(&mut g, try_rule);

        // -- switch --
        g.define(
            switch_case,
            r(check_indent)
                >> r(space)
                >> key("when")
                >> r(space)
                >> r(exp_list)
                >> (r(space) >> key("then")).opt()
                >> r(body_rule),
        );
        build::<n::SwitchCase>(&mut g, switch_case);

        g.define(
            switch_rule,
            key("switch")
                >> r(space)
                >> guarded_exp(r(exp))
                >> breaks()
                >> r(advance)
                >> ensure(
                    r(switch_case)
                        >> (breaks() >> r(switch_case)).star()
                        >> (breaks() >> r(check_indent) >> r(space) >> key("else") >> r(body_rule))
                            .opt(),
                    r(pop_indent),
                ),
        );
        build::<n::Switch>(&mut g, switch_rule);

        g.define(
            with_rule,
            key("with")
                >> r(space)
                >> r(exp_list)
                >> (r(space) >> r(prevent_indent) >> ensure(r(assign), r(pop_indent))).opt()
                >> (r(space) >> key("do")).opt()
                >> r(enter_with)
                >> ensure(r(body_rule), r(pop_with)),
        );
        build::<n::With>(&mut g, with_rule);

        // -- comprehensions --
        g.define(
            comp_for_each,
            key("for")
                >> r(space)
                >> r(assignable_name_list)
                >> r(space)
                >> key("in")
                >> r(space)
                >> (r(star_exp) | r(exp)),
        );
        build::<n::CompForEach>(&mut g, comp_for_each);

        g.define(
            comp_for,
            key("for")
                >> r(space)
                >> r(variable)
                >> r(space)
                >> ch('=')
                >> r(space)
                >> r(exp)
                >> r(space)
                >> ch(',')
                >> r(space)
                >> r(exp)
                >> (r(space) >> ch(',') >> r(space) >> r(for_step)).opt(),
        );
        build::<n::CompFor>(&mut g, comp_for);

        let comp_clause = || r(comp_for_each) | r(comp_for) | key("when") >> r(space) >> r(exp);
        g.define(
            comp_inner,
            r(sep) >> comp_clause() >> (r(space) >> comp_clause()).star(),
        );
        build::<n::CompInner>(&mut g, comp_inner);

        g.define(
            comprehension,
            ch('[')
                >> not_(set("[="))
                >> r(white)
                >> r(exp)
                >> r(space)
                >> r(comp_inner)
                >> r(white)
                >> ch(']'),
        );
        build::<n::Comprehension>(&mut g, comprehension);

        g.define(tbl_comp_value, r(exp));
        build::<n::TblCompValue>(&mut g, tbl_comp_value);

        g.define(
            tbl_comprehension,
            ch('{')
                >> r(white)
                >> r(exp)
                >> (r(space) >> ch(',') >> r(space) >> r(tbl_comp_value)).opt()
                >> r(space)
                >> r(comp_inner)
                >> r(white)
                >> ch('}'),
        );
        build::<n::TblComprehension>(&mut g, tbl_comprehension);

        // -- functions --
        g.define(
            fn_arg_def,
            (r(variable) | r(self_name)) >> (r(space) >> ch('=') >> r(space) >> r(exp)).opt(),
        );
        build::<n::FnArgDef>(&mut g, fn_arg_def);

        let arg_delim = || r(white) >> ch(',') >> r(white);
        g.define(
            fn_arg_def_list,
            r(fn_arg_def)
                >> (arg_delim() >> r(fn_arg_def)).star()
                >> (arg_delim() >> r(vararg)).opt()
                | r(vararg),
        );
        build::<n::FnArgDefList>(&mut g, fn_arg_def_list);

        g.define(
            outer_var_shadow,
            key("using") >> r(space) >> (r(name_list) | key("nil")),
        );
        build::<n::OuterVarShadow>(&mut g, outer_var_shadow);

        g.define(
            fn_args_def,
            ch('(')
                >> r(white)
                >> r(fn_arg_def_list).opt()
                >> r(white)
                >> ch(')')
                >> (r(space) >> r(outer_var_shadow)).opt(),
        );
        build::<n::FnArgsDef>(&mut g, fn_args_def);

        g.define(
            fun_lit,
            r(fn_args_def).opt() >> r(space) >> r(fn_arrow) >> r(body_rule).opt(),
        );
        build::<n::FunLit>(&mut g, fun_lit);

        g.define(
            backcall,
            r(fn_args_def).opt() >> r(space) >> r(backcall_arrow) >> r(space) >> r(chain_value),
        );
        build::<n::Backcall>(&mut g, backcall);

        // -- lists and assignment --
        g.define(
            name_list,
            r(sep) >> r(variable) >> (r(comma) >> r(variable)).star(),
        );
        build::<n::NameList>(&mut g, name_list);

        let assignable = || r(variable) | r(table_lit);
        g.define(
            assignable_name_list,
            r(sep) >> assignable() >> (r(comma) >> assignable()).star(),
        );
        build::<n::AssignableNameList>(&mut g, assignable_name_list);

        g.define(exp_list, r(sep) >> r(exp) >> (r(comma) >> r(exp)).star());
        build::<n::ExpList>(&mut g, exp_list);

        g.define(exp_list_low, r(sep) >> r(exp) >> (r(comma) >> r(exp)).star());
        build::<n::ExpListLow>(&mut g, exp_list_low);

        let assign_value =
            || r(with_rule) | r(if_rule) | r(unless_rule) | r(switch_rule) | r(exp);
        g.define(
            assign,
            r(sep)
                >> ch('=')
                >> (r(space) >> assign_value() >> (r(comma) >> assign_value()).star()
                    | r(table_block)),
        );
        build::<n::Assign>(&mut g, assign);

        g.define(update, r(update_op) >> ch('=') >> r(space) >> r(exp));
        build::<n::Update>(&mut g, update);

        g.define(
            exp_list_assign,
            r(exp_list) >> (r(space) >> (r(update) | r(assign))).opt(),
        );
        build::<n::ExpListAssign>(&mut g, exp_list_assign);

        // -- declarations and statements --
        g.define(local_flag, ch('*') | ch('^'));
        build::<n::LocalFlag>(&mut g, local_flag);

        g.define(local_rule, key("local") >> r(space) >> (r(local_flag) | r(name_list)));
        build::<n::Local>(&mut g, local_rule);

        g.define(
            local_attrib,
            key("local")
                >> r(space)
                >> r(name_list)
                >> r(space)
                >> ch('<')
                >> r(space)
                >> r(name)
                >> r(space)
                >> ch('>')
                >> r(space)
                >> r(assign),
        );
        build::<n::LocalAttrib>(&mut g, local_attrib);

        g.define(name_values, r(name_list) >> (r(space) >> r(assign)).opt());
        build::<n::NameValues>(&mut g, name_values);

        g.define(
            global_rule,
            key("global") >> r(space) >> (r(class_decl) | r(local_flag) | r(name_values)),
        );
        build::<n::Global>(&mut g, global_rule);

        g.define(
            export_rule,
            key("export") >> r(space) >> (r(class_decl) | r(local_flag) | r(name_values)),
        );
        build::<n::Export>(&mut g, export_rule);

        g.define(import_name, r(name));
        build::<n::ImportName>(&mut g, import_name);

        g.define(colon_import_name, ch('\\') >> r(name));
        build::<n::ColonImportName>(&mut g, colon_import_name);

        g.define(
            import_literal_d,
            (not_(set("\"\r\n")) >> any()).plus(),
        );
        build::<n::ImportLiteral>(&mut g, import_literal_d);
        g.define(
            import_literal_s,
            (not_(set("'\r\n")) >> any()).plus(),
        );
        build::<n::ImportLiteral>(&mut g, import_literal_s);
        let import_literal = || {
            ch('"') >> r(import_literal_d) >> ch('"')
                | ch('\'') >> r(import_literal_s) >> ch('\'')
        };

        let import_name_item = || r(colon_import_name) | r(import_name);
        g.define(
            import_from,
            import_name_item()
                >> (r(comma) >> import_name_item()).star()
                >> r(space)
                >> key("from")
                >> r(space)
                >> r(exp),
        );
        build::<n::ImportFrom>(&mut g, import_from);

        g.define(
            import_as,
            import_literal()
                >> (r(space) >> key("as") >> r(space) >> (r(variable) | r(table_lit))).opt(),
        );
        build::<n::ImportAs>(&mut g, import_as);

        g.define(
            import_rule,
            key("import") >> r(space) >> (r(import_from) | r(import_as)),
        );
        build::<n::Import>(&mut g, import_rule);

        g.define(
            return_rule,
            key("return") >> (r(some_space) >> r(exp_list_low)).opt(),
        );
        build::<n::Return>(&mut g, return_rule);

        g.define(break_loop, key("break") | key("continue"));
        build::<n::BreakLoop>(&mut g, break_loop);

        g.define(label, lit("::") >> r(label_name) >> lit("::"));
        build::<n::Label>(&mut g, label);

        g.define(goto_rule, key("goto") >> r(space) >> r(label_name));
        build::<n::Goto>(&mut g, goto_rule);

        // -- classes --
        g.define(
            class_member_list,
            r(sep) >> key_value() >> (r(comma) >> key_value()).star(),
        );
        build::<n::ClassMemberList>(&mut g, class_member_list);

        let class_line =
            || r(check_indent) >> r(space) >> (r(class_member_list) | r(statement));
        g.define(
            class_block,
            r(sep)
                >> breaks()
                >> r(advance)
                >> ensure(class_line() >> (breaks() >> class_line()).star(), r(pop_indent)),
        );
        build::<n::ClassBlock>(&mut g, class_block);

        let class_name = || r(variable) >> not_(set(".\\[")) | r(self_name) | r(chain_value);
        g.define(
            class_decl,
            key("class")
                >> (r(space) >> class_name()).opt()
                >> (r(space) >> key("extends") >> r(space) >> r(exp)).opt()
                >> r(class_block).opt(),
        );
        build::<n::ClassDecl>(&mut g, class_decl);

        // -- statements --
        g.define(if_line, key("if") >> r(space) >> r(if_cond));
        build::<n::IfLine>(&mut g, if_line);

        g.define(unless_line, key("unless") >> r(space) >> r(if_cond));
        build::<n::UnlessLine>(&mut g, unless_line);

        g.define(
            statement_appendix,
            r(if_line) | r(unless_line) | r(comp_inner),
        );
        build::<n::StatementAppendix>(&mut g, statement_appendix);

        g.define(
            statement,
            r(space)
                >> (r(import_rule)
                    | r(while_rule)
                    | r(repeat_rule)
                    | r(for_each)
                    | r(for_rule)
                    | r(return_rule)
                    | r(local_attrib)
                    | r(local_rule)
                    | r(global_rule)
                    | r(export_rule)
                    | r(break_loop)
                    | r(label)
                    | r(goto_rule)
                    | r(backcall)
                    | r(exp_list_assign))
                >> (r(space) >> r(statement_appendix)).opt(),
        );
        build::<n::Statement>(&mut g, statement);

        let line = || r(check_indent) >> r(statement) | r(space) >> and_(r(stop));
        g.define(block, r(sep) >> line() >> (breaks() >> line()).star());
        build::<n::Block>(&mut g, block);

        g.define(shebang, lit("#!") >> (not_(r(stop)) >> any()).star());
        build::<n::Shebang>(&mut g, shebang);

        g.define(file, r(shebang).opt() >> r(block) >> r(white));
        build::<n::File>(&mut g, file);

        MuGrammar { grammar: g, file }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{self, Node};
    use crate::peg::{decode, ErrorKind, ParseFailure};

    fn parse(source: &str) -> Result<ast::File, ParseFailure> {
        let input = decode(source);
        let mut st = State::new();
        GRAMMAR.grammar().parse(&input, GRAMMAR.file(), &mut st)?;
        match st.ast.take_root().expect("single root") {
            Node::File(file) => Ok(file),
            other => panic!("root is not a file: {:?}", other.kind()),
        }
    }

    fn error_kind(source: &str) -> ErrorKind {
        match parse(source) {
            Ok(_) => panic!("expected {source:?} to be rejected"),
            Err(failure) => failure.raw().expect("positioned error").kind,
        }
    }

    fn statements(file: &ast::File) -> &[ast::Statement] {
        &file.block.as_ref().expect("block").statements
    }

    #[test]
    fn assignment_with_paren_less_call() {
        let file = parse("sum = add 1, 2").unwrap();
        let stmts = statements(&file);
        assert_eq!(stmts.len(), 1);
        let ast::StatementContent::ExpListAssign(ela) = &*stmts[0].content else {
            panic!("not an assignment statement");
        };
        let Some(ast::AssignAction::Assign(assign)) = ela.action.as_deref() else {
            panic!("missing assignment");
        };
        assert_eq!(assign.values.len(), 1);
    }

    #[test]
    fn indented_if_with_else() {
        let file = parse("if ready\n  go!\nelse\n  wait!\n").unwrap();
        assert_eq!(statements(&file).len(), 1);
    }

    #[test]
    fn if_nodes_alternate_conditions_and_bodies() {
        let file = parse("x = if a\n  1\nelseif b\n  2\nelse\n  3").unwrap();
        let stmts = statements(&file);
        let ast::StatementContent::ExpListAssign(ela) = &*stmts[0].content else {
            panic!("not an assignment");
        };
        let Some(ast::AssignAction::Assign(assign)) = ela.action.as_deref() else {
            panic!("missing assignment");
        };
        let ast::AssignValue::If(if_node) = &assign.values[0] else {
            panic!("value is not an if");
        };
        // Two cond/body pairs plus a trailing else body.
        assert_eq!(if_node.nodes.len(), 5);
        assert!(matches!(if_node.nodes[0], ast::IfNode::IfCond(_)));
        assert!(matches!(if_node.nodes[4], ast::IfNode::Body(_)));
    }

    #[test]
    fn bad_dedent_is_a_syntax_error() {
        assert_eq!(error_kind("if x\n  y\n   z"), ErrorKind::Syntax);
    }

    #[test]
    fn truncated_assignment_reports_invalid_eof() {
        assert_eq!(error_kind("x = "), ErrorKind::InvalidEof);
    }

    #[test]
    fn keyword_is_not_a_variable() {
        assert_eq!(error_kind("if = 3"), ErrorKind::Syntax);
    }

    #[test]
    fn mixed_indentation_aborts_with_user_kind() {
        assert_eq!(error_kind("if x\n \ty"), ErrorKind::User(100));
    }

    #[test]
    fn with_body_allows_implicit_chains() {
        let file = parse("with obj\n  .x = 1\n  \\update!").unwrap();
        let stmts = statements(&file);
        assert_eq!(stmts.len(), 1);
        let ast::StatementContent::ExpListAssign(ela) = &*stmts[0].content else {
            panic!("not an expression statement");
        };
        let ast::ValueItem::SimpleValue(sv) = &*ela.exprs.exprs[0].value.item else {
            panic!("not a simple value");
        };
        let ast::SimpleValueItem::With(with) = &*sv.item else {
            panic!("not a with block");
        };
        let ast::BodyItem::Block(block) = &*with.body.item else {
            panic!("with body is not a block");
        };
        assert_eq!(block.statements.len(), 2);
    }

    #[test]
    fn implicit_chain_outside_with_is_rejected() {
        assert_eq!(error_kind(".x = 1"), ErrorKind::Syntax);
        assert_eq!(error_kind("\\update!"), ErrorKind::Syntax);
    }

    #[test]
    fn list_comprehension_with_star_loop() {
        let file = parse("doubles = [x * 2 for x in *items]").unwrap();
        assert_eq!(statements(&file).len(), 1);
    }

    #[test]
    fn while_header_cannot_take_a_do_block() {
        assert_eq!(error_kind("while do\n  x"), ErrorKind::Syntax);
    }

    #[test]
    fn string_interpolation_splits_segments() {
        let file = parse("greeting = \"hello #{name}!\"").unwrap();
        let stmts = statements(&file);
        let ast::StatementContent::ExpListAssign(ela) = &*stmts[0].content else {
            panic!("not an assignment");
        };
        let Some(ast::AssignAction::Assign(assign)) = ela.action.as_deref() else {
            panic!("missing assignment");
        };
        let ast::AssignValue::Exp(exp) = &assign.values[0] else {
            panic!("value is not an expression");
        };
        let ast::ValueItem::String_(s) = &*exp.value.item else {
            panic!("value is not a string");
        };
        let ast::StringItem::DoubleString(ds) = &*s.item else {
            panic!("not a double-quoted string");
        };
        assert_eq!(ds.segments.len(), 3);
        assert!(matches!(
            &*ds.segments[1].item,
            ast::DoubleStringItem::Exp(_)
        ));
    }

    #[test]
    fn class_with_extends_and_members() {
        let file = parse("class Dog extends Animal\n  bark: => print @name\n").unwrap();
        assert_eq!(statements(&file).len(), 1);
    }

    #[test]
    fn import_from_statement() {
        let file = parse("import insert, remove from table").unwrap();
        let stmts = statements(&file);
        let ast::StatementContent::Import(import) = &*stmts[0].content else {
            panic!("not an import");
        };
        let ast::ImportItem::ImportFrom(from) = &*import.item else {
            panic!("not the from form");
        };
        assert_eq!(from.names.len(), 2);
    }

    #[test]
    fn backcall_statement() {
        let file = parse("(data) <- fetch \"users\"").unwrap();
        let stmts = statements(&file);
        assert!(matches!(
            &*stmts[0].content,
            ast::StatementContent::Backcall(_)
        ));
    }

    #[test]
    fn statement_appendix_condition() {
        let file = parse("print x if x > 0").unwrap();
        let stmts = statements(&file);
        assert!(stmts[0].appendix.is_some());
    }

    #[test]
    fn empty_source_is_a_valid_file() {
        let file = parse("").unwrap();
        assert!(file.shebang.is_none());
        assert!(statements(&file).is_empty());
    }

    #[test]
    fn shebang_line_is_kept() {
        let file = parse("#!/usr/bin/env mu\nx = 1\n").unwrap();
        assert!(file.shebang.is_some());
        assert_eq!(statements(&file).len(), 1);
    }

    #[test]
    fn long_string_levels_must_match() {
        assert!(parse("s = [==[raw ]] text]==]").is_ok());
        assert_eq!(error_kind("s = [==[raw text]=]"), ErrorKind::InvalidEof);
    }

    #[test]
    fn switch_with_cases_and_else() {
        let file = parse("switch color\n  when \"red\"\n    stop!\n  else\n    go!\n").unwrap();
        let stmts = statements(&file);
        let ast::StatementContent::ExpListAssign(ela) = &*stmts[0].content else {
            panic!("not an expression statement");
        };
        let ast::ValueItem::SimpleValue(sv) = &*ela.exprs.exprs[0].value.item else {
            panic!("not a simple value");
        };
        let ast::SimpleValueItem::Switch(switch) = &*sv.item else {
            panic!("not a switch");
        };
        assert_eq!(switch.cases.len(), 1);
        assert!(switch.last.is_some());
    }
}
