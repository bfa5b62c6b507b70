//! Global-variable detection.
//!
//! Walks a parsed module with a scope stack and records every name that is
//! read without ever being declared: assignment targets, loop variables,
//! function parameters, imports, and class names all introduce bindings,
//! following the language's implicit-local rule. Each undeclared name is
//! reported once, at its first occurrence.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::ast::*;

/// A reference to a name never declared in the module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalVar {
    pub name: String,
    pub line: usize,
    pub col: usize,
}

/// Collect the global references of a module, in first-occurrence order.
pub fn collect_globals(file: &File) -> Vec<GlobalVar> {
    let mut linter = Linter::default();
    linter.push();
    if let Some(block) = &file.block {
        linter.block(block);
    }
    linter.pop();
    linter.found
}

#[derive(Default)]
struct Linter {
    scopes: Vec<HashSet<String>>,
    reported: HashSet<String>,
    found: Vec<GlobalVar>,
}

impl Linter {
    fn push(&mut self) {
        self.scopes.push(HashSet::new());
    }

    fn pop(&mut self) {
        self.scopes.pop();
    }

    fn declare(&mut self, var: &Variable) {
        self.declare_name(&var.name.text);
    }

    fn declare_name(&mut self, name: &str) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string());
        }
    }

    fn is_declared(&self, name: &str) -> bool {
        self.scopes.iter().any(|scope| scope.contains(name))
    }

    fn reference(&mut self, var: &Variable) {
        let name = &var.name.text;
        if self.is_declared(name) || self.reported.contains(name) {
            return;
        }
        self.reported.insert(name.clone());
        self.found.push(GlobalVar {
            name: name.clone(),
            line: var.span.start.line,
            col: var.span.start.col,
        });
    }

    // -- statements --

    fn block(&mut self, block: &Block) {
        for stmt in &block.statements {
            self.statement(stmt);
        }
    }

    fn statement(&mut self, stmt: &Statement) {
        match stmt.appendix.as_deref().map(|a| &*a.item) {
            Some(AppendixItem::CompInner(ci)) => {
                // A trailing loop scopes its variables over the statement.
                self.push();
                self.comp_inner(ci);
                self.content(&stmt.content);
                self.pop();
            }
            Some(AppendixItem::IfLine(l)) => {
                self.if_cond(&l.cond);
                self.content(&stmt.content);
            }
            Some(AppendixItem::UnlessLine(l)) => {
                self.if_cond(&l.cond);
                self.content(&stmt.content);
            }
            None => self.content(&stmt.content),
        }
    }

    fn content(&mut self, content: &StatementContent) {
        match content {
            StatementContent::Import(i) => self.import(i),
            StatementContent::While(w) => {
                self.exp(&w.cond);
                self.body(&w.body);
            }
            StatementContent::Repeat(r) => {
                self.body(&r.body);
                self.exp(&r.cond);
            }
            StatementContent::For(f) => self.for_loop(f),
            StatementContent::ForEach(f) => self.for_each(f),
            StatementContent::Return(r) => {
                if let Some(exprs) = &r.exprs {
                    self.exp_run(&exprs.exprs);
                }
            }
            StatementContent::Local(l) => {
                if let LocalItem::NameList(names) = &*l.item {
                    for v in &names.names {
                        self.declare(v);
                    }
                }
            }
            StatementContent::LocalAttrib(la) => {
                for v in &la.names.names {
                    self.declare(v);
                }
                self.assign(&la.assign);
            }
            StatementContent::Export(e) => match &*e.item {
                ExportItem::ClassDecl(c) => self.class_decl(c),
                ExportItem::NameValues(nv) => self.name_values(nv),
                ExportItem::LocalFlag(_) => {}
            },
            StatementContent::Global(g) => match &*g.item {
                GlobalItem::ClassDecl(c) => self.class_decl(c),
                GlobalItem::NameValues(nv) => self.name_values(nv),
                GlobalItem::LocalFlag(_) => {}
            },
            StatementContent::BreakLoop(_)
            | StatementContent::Label(_)
            | StatementContent::Goto(_) => {}
            StatementContent::Backcall(b) => {
                self.chain_value(&b.value);
                // The rest of the block is the callback body; its
                // parameters bind in the enclosing scope.
                if let Some(args) = &b.args {
                    self.fn_args(args);
                }
            }
            StatementContent::ExpListAssign(ela) => self.exp_list_assign(ela),
        }
    }

    fn name_values(&mut self, nv: &NameValues) {
        for v in &nv.names.names {
            self.declare(v);
        }
        if let Some(assign) = &nv.assign {
            self.assign(assign);
        }
    }

    fn exp_list_assign(&mut self, ela: &ExpListAssign) {
        match ela.action.as_deref() {
            Some(AssignAction::Assign(a)) => {
                self.assign(a);
                // Targets declare after the values are read: `x = x`
                // references the outer `x`.
                for target in &ela.exprs.exprs {
                    match plain_var(target) {
                        Some(v) => self.declare(v),
                        None => self.exp(target),
                    }
                }
            }
            Some(AssignAction::Update(u)) => {
                self.exp(&u.value);
                self.exp_run(&ela.exprs.exprs);
            }
            None => self.exp_run(&ela.exprs.exprs),
        }
    }

    fn assign(&mut self, assign: &Assign) {
        for value in &assign.values {
            match value {
                AssignValue::With(w) => self.with(w),
                AssignValue::If(i) => self.if_nodes(&i.nodes),
                AssignValue::Unless(u) => self.if_nodes(&u.nodes),
                AssignValue::Switch(s) => self.switch(s),
                AssignValue::TableBlock(tb) => {
                    for kv in &tb.values {
                        self.key_value(kv);
                    }
                }
                AssignValue::Exp(e) => self.exp(e),
            }
        }
    }

    fn import(&mut self, import: &Import) {
        match &*import.item {
            ImportItem::ImportFrom(from) => {
                self.exp(&from.source);
                for item in &from.names {
                    match item {
                        ImportNameItem::ImportName(n) => self.declare_name(&n.name.text),
                        ImportNameItem::ColonImportName(n) => self.declare_name(&n.name.text),
                    }
                }
            }
            ImportItem::ImportAs(as_) => match as_.target.as_deref() {
                Some(ImportTarget::Variable(v)) => self.declare(v),
                Some(ImportTarget::TableLit(t)) => self.declare_destructure(t),
                // `import "a.b.c"` binds the last path component.
                None => {
                    let text = &as_.literal.text;
                    let last = text.rsplit('.').next().unwrap_or(text);
                    self.declare_name(last);
                }
            },
        }
    }

    fn for_loop(&mut self, f: &For) {
        self.exp(&f.start);
        self.exp(&f.stop);
        if let Some(step) = &f.step {
            self.exp(&step.step);
        }
        self.push();
        self.declare(&f.var);
        self.body(&f.body);
        self.pop();
    }

    fn for_each(&mut self, f: &ForEach) {
        match &*f.loop_value {
            ForEachLoop::StarExp(s) => self.exp(&s.expr),
            ForEachLoop::ExpList(l) => self.exp_run(&l.exprs),
        }
        self.push();
        self.declare_assignables(&f.names);
        self.body(&f.body);
        self.pop();
    }

    fn declare_assignables(&mut self, names: &AssignableNameList) {
        for item in &names.items {
            match item {
                NameOrDestructure::Variable(v) => self.declare(v),
                NameOrDestructure::TableLit(t) => self.declare_destructure(t),
            }
        }
    }

    /// A table literal in binding position introduces the names it lists.
    fn declare_destructure(&mut self, table: &TableLit) {
        let mut names = Vec::new();
        for value in &table.values {
            match value {
                TableValueItem::VariablePair(vp) => names.push(vp.name.name.text.clone()),
                TableValueItem::NormalPair(np) => {
                    if let PairValue::Exp(e) = &*np.value {
                        if let Some(v) = plain_var(e) {
                            names.push(v.name.text.clone());
                        }
                    }
                }
                TableValueItem::Exp(e) => {
                    if let Some(v) = plain_var(e) {
                        names.push(v.name.text.clone());
                    }
                }
            }
        }
        for name in names {
            self.declare_name(&name);
        }
    }

    // -- expressions --

    fn exp_run(&mut self, exprs: &[Exp]) {
        for e in exprs {
            self.exp(e);
        }
    }

    fn exp(&mut self, exp: &Exp) {
        self.value(&exp.value);
        for ov in &exp.op_values {
            self.value(&ov.value);
        }
    }

    fn value(&mut self, value: &Value) {
        match &*value.item {
            ValueItem::SimpleValue(sv) => self.simple_value(sv),
            ValueItem::SimpleTable(st) => {
                for kv in &st.pairs {
                    self.key_value(kv);
                }
            }
            ValueItem::ChainValue(cv) => self.chain_value(cv),
            ValueItem::String_(s) => self.string(s),
        }
    }

    fn simple_value(&mut self, sv: &SimpleValue) {
        match &*sv.item {
            SimpleValueItem::ConstValue(_) | SimpleValueItem::Num(_) => {}
            SimpleValueItem::If(i) => self.if_nodes(&i.nodes),
            SimpleValueItem::Unless(u) => self.if_nodes(&u.nodes),
            SimpleValueItem::Switch(s) => self.switch(s),
            SimpleValueItem::With(w) => self.with(w),
            SimpleValueItem::ClassDecl(c) => self.class_decl(c),
            SimpleValueItem::ForEach(f) => self.for_each(f),
            SimpleValueItem::For(f) => self.for_loop(f),
            SimpleValueItem::While(w) => {
                self.exp(&w.cond);
                self.body(&w.body);
            }
            SimpleValueItem::Do(d) => self.body(&d.body),
            SimpleValueItem::Try(t) => self.try_block(t),
            SimpleValueItem::UnaryExp(u) => self.exp(&u.expr),
            SimpleValueItem::TblComprehension(tc) => {
                self.push();
                self.comp_inner(&tc.forloop);
                self.exp(&tc.key);
                if let Some(v) = &tc.value {
                    self.exp(&v.value);
                }
                self.pop();
            }
            SimpleValueItem::Comprehension(c) => {
                self.push();
                self.comp_inner(&c.forloop);
                self.exp(&c.value);
                self.pop();
            }
            SimpleValueItem::FunLit(f) => self.fun_lit(f),
            SimpleValueItem::TableLit(t) => self.table_lit(t),
        }
    }

    fn chain_value(&mut self, cv: &ChainValue) {
        for (index, item) in cv.items.iter().enumerate() {
            match item {
                ChainItem::Callable(c) => match &*c.item {
                    CallableItem::Variable(v) => {
                        // Only the head of a chain is a variable read.
                        if index == 0 {
                            self.reference(v);
                        }
                    }
                    CallableItem::Parens(p) => self.exp(&p.expr),
                    CallableItem::SelfName(_) | CallableItem::VarArg(_) => {}
                },
                ChainItem::Invoke(inv) => {
                    for arg in &inv.args {
                        self.invoke_arg(arg);
                    }
                }
                ChainItem::InvokeArgs(inv) => {
                    for arg in &inv.args {
                        self.invoke_arg(arg);
                    }
                }
                ChainItem::BracketExp(b) => self.exp(&b.expr),
                ChainItem::Slice(s) => {
                    self.slice_value(&s.start);
                    self.slice_value(&s.stop);
                    self.slice_value(&s.step);
                }
                ChainItem::String_(s) => self.string(s),
                ChainItem::DotChainItem(_)
                | ChainItem::ColonChainItem(_)
                | ChainItem::Existential(_) => {}
            }
        }
    }

    fn invoke_arg(&mut self, arg: &InvokeArg) {
        match arg {
            InvokeArg::Exp(e) => self.exp(e),
            InvokeArg::DoubleString(ds) => self.double_string(ds),
            InvokeArg::TableLit(t) => self.table_lit(t),
            InvokeArg::SingleString(_) | InvokeArg::LuaString(_) => {}
        }
    }

    fn slice_value(&mut self, sv: &SliceValue) {
        if let SliceValue::Exp(e) = sv {
            self.exp(e);
        }
    }

    fn string(&mut self, s: &String_) {
        if let StringItem::DoubleString(ds) = &*s.item {
            self.double_string(ds);
        }
    }

    fn double_string(&mut self, ds: &DoubleString) {
        for segment in &ds.segments {
            if let DoubleStringItem::Exp(e) = &*segment.item {
                self.exp(e);
            }
        }
    }

    fn table_lit(&mut self, table: &TableLit) {
        for value in &table.values {
            match value {
                TableValueItem::VariablePair(vp) => self.reference(&vp.name),
                TableValueItem::NormalPair(np) => self.pair(np),
                TableValueItem::Exp(e) => self.exp(e),
            }
        }
    }

    fn key_value(&mut self, kv: &KeyValue) {
        match kv {
            KeyValue::VariablePair(vp) => self.reference(&vp.name),
            KeyValue::NormalPair(np) => self.pair(np),
        }
    }

    fn pair(&mut self, np: &NormalPair) {
        match &*np.key {
            PairKey::BracketExp(b) => self.exp(&b.expr),
            PairKey::String_(s) => self.string(s),
            PairKey::KeyName(_) => {}
        }
        match &*np.value {
            PairValue::Exp(e) => self.exp(e),
            PairValue::TableBlock(tb) => {
                for kv in &tb.values {
                    self.key_value(kv);
                }
            }
        }
    }

    // -- control flow --

    fn body(&mut self, body: &Body) {
        self.push();
        match &*body.item {
            BodyItem::Block(b) => self.block(b),
            BodyItem::Statement(s) => self.statement(s),
        }
        self.pop();
    }

    fn if_nodes(&mut self, nodes: &[IfNode]) {
        for node in nodes {
            match node {
                IfNode::IfCond(c) => self.if_cond(c),
                IfNode::Body(b) => self.body(b),
            }
        }
    }

    fn if_cond(&mut self, cond: &IfCond) {
        match &cond.assign {
            Some(assign) => {
                self.assign(assign);
                // `if x = f()` binds x for the branches.
                match plain_var(&cond.cond) {
                    Some(v) => self.declare(v),
                    None => self.exp(&cond.cond),
                }
            }
            None => self.exp(&cond.cond),
        }
    }

    fn switch(&mut self, s: &Switch) {
        self.exp(&s.target);
        for case in &s.cases {
            self.exp_run(&case.values.exprs);
            self.body(&case.body);
        }
        if let Some(last) = &s.last {
            self.body(last);
        }
    }

    fn with(&mut self, w: &With) {
        self.exp_run(&w.values.exprs);
        if let Some(assign) = &w.assign {
            self.assign(assign);
        }
        self.body(&w.body);
    }

    fn try_block(&mut self, t: &Try) {
        self.body(&t.block);
        if let Some(catch) = &t.catch {
            self.push();
            self.declare(&catch.var);
            self.body(&catch.body);
            self.pop();
        }
    }

    fn comp_inner(&mut self, ci: &CompInner) {
        for item in &ci.items {
            match item {
                CompItem::CompForEach(cfe) => {
                    match &*cfe.loop_value {
                        CompLoop::StarExp(s) => self.exp(&s.expr),
                        CompLoop::Exp(e) => self.exp(e),
                    }
                    self.declare_assignables(&cfe.names);
                }
                CompItem::CompFor(cf) => {
                    self.exp(&cf.start);
                    self.exp(&cf.stop);
                    if let Some(step) = &cf.step {
                        self.exp(&step.step);
                    }
                    self.declare(&cf.var);
                }
                CompItem::Exp(e) => self.exp(e),
            }
        }
    }

    fn class_decl(&mut self, c: &ClassDecl) {
        if let Some(extend) = &c.extend {
            self.exp(extend);
        }
        match c.name.as_deref() {
            Some(ClassName::Variable(v)) => self.declare(v),
            Some(ClassName::ChainValue(cv)) => self.chain_value(cv),
            Some(ClassName::SelfName(_)) | None => {}
        }
        if let Some(body) = &c.body {
            self.push();
            for content in &body.contents {
                match content {
                    ClassContent::ClassMemberList(ml) => {
                        for kv in &ml.values {
                            self.key_value(kv);
                        }
                    }
                    ClassContent::Statement(s) => self.statement(s),
                }
            }
            self.pop();
        }
    }

    fn fun_lit(&mut self, f: &FunLit) {
        self.push();
        if let Some(args) = &f.args {
            self.fn_args(args);
        }
        if let Some(body) = &f.body {
            match &*body.item {
                BodyItem::Block(b) => self.block(b),
                BodyItem::Statement(s) => self.statement(s),
            }
        }
        self.pop();
    }

    fn fn_args(&mut self, args: &FnArgsDef) {
        if let Some(defs) = &args.defs {
            for arg in &defs.args {
                if let Some(default) = &arg.default {
                    self.exp(default);
                }
                if let FnArgName::Variable(v) = &*arg.name {
                    self.declare(v);
                }
            }
        }
        if let Some(shadow) = &args.shadow {
            // `using` names must exist in an enclosing scope.
            if let Some(names) = &shadow.names {
                for v in &names.names {
                    self.reference(v);
                }
            }
        }
    }
}

/// An expression that is exactly one bare name.
fn plain_var(exp: &Exp) -> Option<&Variable> {
    if !exp.op_values.is_empty() {
        return None;
    }
    let ValueItem::ChainValue(cv) = &*exp.value.item else {
        return None;
    };
    if cv.items.len() != 1 {
        return None;
    }
    let ChainItem::Callable(c) = &cv.items[0] else {
        return None;
    };
    let CallableItem::Variable(v) = &*c.item else {
        return None;
    };
    Some(v)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::{State, GRAMMAR};
    use crate::peg::decode;

    fn globals(source: &str) -> Vec<String> {
        let input = decode(source);
        let mut st = State::new();
        GRAMMAR
            .grammar()
            .parse(&input, GRAMMAR.file(), &mut st)
            .expect("parse");
        let Node::File(file) = st.ast.take_root().expect("root") else {
            panic!("root is not a file");
        };
        collect_globals(&file).into_iter().map(|g| g.name).collect()
    }

    #[test]
    fn assignment_declares_its_target() {
        assert_eq!(globals("x = 1\nprint x"), ["print"]);
    }

    #[test]
    fn function_parameters_bind_in_the_body() {
        assert_eq!(globals("f = (a) -> a + b"), ["b"]);
    }

    #[test]
    fn loop_variable_does_not_escape() {
        assert_eq!(globals("for i = 1, 3\n  sum = i\nuse i"), ["use", "i"]);
    }

    #[test]
    fn import_binds_names() {
        assert_eq!(globals("import insert from table\ninsert 1"), ["table"]);
    }

    #[test]
    fn reading_before_assigning_is_global() {
        assert_eq!(globals("x = x"), ["x"]);
    }

    #[test]
    fn positions_point_at_first_occurrence() {
        let input = decode("a = 1\nhit!\nhit!");
        let mut st = State::new();
        GRAMMAR
            .grammar()
            .parse(&input, GRAMMAR.file(), &mut st)
            .expect("parse");
        let Node::File(file) = st.ast.take_root().expect("root") else {
            panic!("root is not a file");
        };
        let found = collect_globals(&file);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "hit");
        assert_eq!((found[0].line, found[0].col), (2, 1));
    }
}
