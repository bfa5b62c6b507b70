//! Every node kind of the Mu language.
//!
//! Member declarations mirror the productions in `crate::grammar`: children
//! appear in source order, and `construct` pops them back off the stack in
//! reverse. Two devices keep the type-driven pops unambiguous: list-bearing
//! nodes declare a leading [`Separator`] marker their production pushes
//! before any item, and wrapper kinds such as [`BracketExp`],
//! [`ForStepValue`] and [`TblCompValue`] keep optional members
//! distinguishable from a same-tagged sibling beneath them.

// ============================================================================
// LEAVES
// ============================================================================

ast_leaf!(
    /// Numeric literal: decimal, hex, float, or exponent form.
    Num
);
ast_leaf!(Name);
ast_leaf!(
    /// A keyword of the target language used where only it is legal,
    /// e.g. after `\` in a method call.
    LuaKeyword
);
ast_leaf!(
    /// `nil`, `true` or `false`.
    ConstValue
);
ast_leaf!(
    /// `break` or `continue`.
    BreakLoop
);
ast_leaf!(
    /// `*` or `^` after `local`/`export`/`global`.
    LocalFlag
);
ast_leaf!(Shebang);
ast_leaf!(
    /// Content of a single-quoted string, quotes excluded.
    SingleString
);
ast_leaf!(
    /// A literal run inside a double-quoted string, between interpolations.
    DoubleStringInner
);
ast_leaf!(
    /// Content of a `[[ ... ]]` long string, brackets excluded.
    LuaString
);
ast_leaf!(UnaryOperator);
ast_leaf!(BinaryOperator);
ast_leaf!(
    /// Compound assignment operator with the `=` stripped, e.g. `+` of `+=`.
    UpdateOp
);
ast_leaf!(
    /// `->`, `=>`, or their backcall forms `<-`, `<=`.
    FnArrow
);
ast_leaf!(
    /// Label identifier between `::` pairs.
    LabelName
);
ast_leaf!(
    /// Quoted module path of a literal import.
    ImportLiteral
);

ast_leaf!(VarArg, notext);
ast_leaf!(
    /// Bare `@`.
    SelfItem,
    notext
);
ast_leaf!(
    /// Bare `@@`.
    SelfClassItem,
    notext
);
ast_leaf!(
    /// Omitted slice bound.
    DefaultValue,
    notext
);
ast_leaf!(
    /// `?` existential test in a chain.
    Existential,
    notext
);
ast_leaf!(
    /// Stack boundary marker. Productions with list-shaped members push
    /// one before their items so greedy pops cannot reach past them into
    /// an enclosing construct's children.
    Separator,
    notext
);

// ============================================================================
// NAMES AND SELF
// ============================================================================

ast_node!(
    /// A name that passed the reserved-word check.
    Variable { req name: Name }
);
ast_node!(
    /// `@name`.
    SelfNameItem { req name: Name }
);
ast_node!(
    /// `@@name`.
    SelfClassNameItem { req name: Name }
);
ast_family!(SelfVariant { SelfClassNameItem, SelfClassItem, SelfNameItem, SelfItem });
ast_node!(SelfName { req item: SelfVariant });

ast_family!(KeyNameItem { SelfName, Name });
ast_node!(
    /// Key position of a table pair: a plain name or a self reference.
    KeyName { req item: KeyNameItem }
);

ast_node!(NameList {
    req sep: Separator,
    lst1 names: Variable,
});

// ============================================================================
// STRINGS
// ============================================================================

ast_family!(DoubleStringItem { DoubleStringInner, Exp });
ast_node!(
    /// One segment of a double-quoted string: literal text or `#{exp}`.
    DoubleStringContent { req item: DoubleStringItem }
);
ast_node!(DoubleString {
    req sep: Separator,
    lst segments: DoubleStringContent,
});

ast_family!(StringItem { SingleString, DoubleString, LuaString });
ast_node!(String_ { req item: StringItem });

// ============================================================================
// EXPRESSIONS
// ============================================================================

ast_node!(
    /// A flat binary-operator chain; precedence is resolved downstream.
    Exp {
        req value: Value,
        lst op_values: ExpOpValue,
    }
);
ast_node!(ExpOpValue {
    req op: BinaryOperator,
    req value: Value,
});

ast_family!(ValueItem { SimpleValue, SimpleTable, ChainValue, String_ });
ast_node!(Value { req item: ValueItem });

ast_family!(SimpleValueItem {
    ConstValue,
    If,
    Unless,
    Switch,
    With,
    ClassDecl,
    ForEach,
    For,
    While,
    Do,
    Try,
    UnaryExp,
    TblComprehension,
    Comprehension,
    FunLit,
    TableLit,
    Num,
});
ast_node!(SimpleValue { req item: SimpleValueItem });

ast_node!(UnaryExp {
    lst1 ops: UnaryOperator,
    req expr: Exp,
});

ast_node!(
    /// Parenthesized expression.
    Parens { req expr: Exp }
);

// ============================================================================
// CHAINS
// ============================================================================

ast_family!(CallableItem { Variable, SelfName, VarArg, Parens });
ast_node!(
    /// Head of a chain: something that can be called or indexed.
    Callable { req item: CallableItem }
);

ast_node!(
    /// `.name` access.
    DotChainItem { req name: Name }
);
ast_family!(ColonName { Name, LuaKeyword });
ast_node!(
    /// `\name` method access.
    ColonChainItem { req name: ColonName }
);
ast_node!(
    /// `[exp]` index access.
    BracketExp { req expr: Exp }
);

ast_family!(SliceValue { Exp, DefaultValue });
ast_node!(
    /// `[start, stop, step]` slice; omitted bounds carry `DefaultValue`.
    Slice {
        req start: SliceValue,
        req stop: SliceValue,
        req step: SliceValue,
    }
);

ast_family!(InvokeArg { Exp, SingleString, DoubleString, LuaString, TableLit });
ast_node!(
    /// Parenthesized call arguments; may be empty.
    Invoke {
        req sep: Separator,
        lst args: InvokeArg,
    }
);
ast_node!(
    /// Paren-less call arguments.
    InvokeArgs {
        req sep: Separator,
        lst1 args: InvokeArg,
    }
);

ast_family!(ChainItem {
    Callable,
    DotChainItem,
    ColonChainItem,
    BracketExp,
    Slice,
    Invoke,
    InvokeArgs,
    String_,
    Existential,
});
ast_node!(
    /// A head item followed by any run of accesses, calls and slices.
    ChainValue { lst1 items: ChainItem }
);

// ============================================================================
// TABLES
// ============================================================================

ast_node!(
    /// `:name` shorthand pair.
    VariablePair { req name: Variable }
);

ast_family!(PairKey { KeyName, BracketExp, String_ });
ast_family!(PairValue { Exp, TableBlock });
ast_node!(NormalPair {
    req key: PairKey,
    req value: PairValue,
});

ast_family!(KeyValue { VariablePair, NormalPair });

ast_family!(TableValueItem { VariablePair, NormalPair, Exp });

ast_node!(
    /// `{ ... }` literal.
    TableLit {
        req sep: Separator,
        lst values: TableValueItem,
    }
);
ast_node!(
    /// Brace-less key/value pairs at expression level.
    SimpleTable {
        req sep: Separator,
        lst1 pairs: KeyValue,
    }
);
ast_node!(
    /// Indented block of key/value pairs after an assignment or a pair key.
    TableBlock {
        req sep: Separator,
        lst1 values: KeyValue,
    }
);

// ============================================================================
// CONTROL FLOW
// ============================================================================

ast_node!(
    /// Condition with optional inline assignment: `if x := f()`.
    IfCond {
        req cond: Exp,
        opt assign: Assign,
    }
);
ast_family!(
    /// Alternating conditions and bodies of an `if`/`unless`; a trailing
    /// body without a preceding condition is the `else` branch.
    IfNode { IfCond, Body }
);
ast_node!(If {
    req sep: Separator,
    lst1 nodes: IfNode,
});
ast_node!(Unless {
    req sep: Separator,
    lst1 nodes: IfNode,
});

ast_node!(While {
    req cond: Exp,
    req body: Body,
});
ast_node!(Repeat {
    req body: Body,
    req cond: Exp,
});

ast_node!(
    /// Step expression of a numeric `for`, kept distinct from the stop
    /// bound so the optional pop cannot swallow it.
    ForStepValue { req step: Exp }
);
ast_node!(For {
    req var: Variable,
    req start: Exp,
    req stop: Exp,
    opt step: ForStepValue,
    req body: Body,
});

ast_family!(NameOrDestructure { Variable, TableLit });
ast_node!(AssignableNameList {
    req sep: Separator,
    lst1 items: NameOrDestructure,
});

ast_node!(
    /// `*exp` iteration source.
    StarExp { req expr: Exp }
);
ast_family!(ForEachLoop { StarExp, ExpList });
ast_node!(ForEach {
    req names: AssignableNameList,
    req loop_value: ForEachLoop,
    req body: Body,
});

ast_node!(Do { req body: Body });

ast_node!(CatchBlock {
    req var: Variable,
    req body: Body,
});
ast_node!(Try {
    req block: Body,
    opt catch: CatchBlock,
});

ast_node!(SwitchCase {
    req values: ExpList,
    req body: Body,
});
ast_node!(
    /// `switch` with `when` cases and an optional trailing `else` body.
    Switch {
        req target: Exp,
        lst1 cases: SwitchCase,
        opt last: Body,
    }
);

ast_node!(With {
    req values: ExpList,
    opt assign: Assign,
    req body: Body,
});

// ============================================================================
// COMPREHENSIONS
// ============================================================================

ast_family!(CompLoop { StarExp, Exp });
ast_node!(CompForEach {
    req names: AssignableNameList,
    req loop_value: CompLoop,
});
ast_node!(CompFor {
    req var: Variable,
    req start: Exp,
    req stop: Exp,
    opt step: ForStepValue,
});
ast_family!(
    /// One clause of a comprehension tail: a loop or a `when` guard.
    CompItem { CompForEach, CompFor, Exp }
);
ast_node!(CompInner {
    req sep: Separator,
    lst1 items: CompItem,
});

ast_node!(
    /// `[value for ...]` list comprehension.
    Comprehension {
        req value: Exp,
        req forloop: CompInner,
    }
);
ast_node!(
    /// Value expression of a table comprehension, wrapped so the optional
    /// pop cannot take the key.
    TblCompValue { req value: Exp }
);
ast_node!(
    /// `{k, v for ...}` table comprehension.
    TblComprehension {
        req key: Exp,
        opt value: TblCompValue,
        req forloop: CompInner,
    }
);

// ============================================================================
// FUNCTIONS
// ============================================================================

ast_family!(FnArgName { Variable, SelfName });
ast_node!(FnArgDef {
    req name: FnArgName,
    opt default: Exp,
});
ast_node!(FnArgDefList {
    lst args: FnArgDef,
    opt vararg: VarArg,
});
ast_node!(
    /// `using` clause; `None` names means `using nil`.
    OuterVarShadow { opt names: NameList }
);
ast_node!(FnArgsDef {
    opt defs: FnArgDefList,
    opt shadow: OuterVarShadow,
});
ast_node!(FunLit {
    opt args: FnArgsDef,
    req arrow: FnArrow,
    opt body: Body,
});

ast_node!(
    /// `<-`/`<=` backcall: the continuation of the enclosing block becomes
    /// the last argument of the chained call.
    Backcall {
        opt args: FnArgsDef,
        req arrow: FnArrow,
        req value: ChainValue,
    }
);

// ============================================================================
// ASSIGNMENT
// ============================================================================

ast_node!(ExpList {
    req sep: Separator,
    lst1 exprs: Exp,
});
ast_node!(ExpListLow {
    req sep: Separator,
    lst1 exprs: Exp,
});

ast_family!(AssignValue { With, If, Unless, Switch, TableBlock, Exp });
ast_node!(Assign {
    req sep: Separator,
    lst1 values: AssignValue,
});

ast_node!(
    /// Compound assignment: `+= 1` stored as op `+` and the value.
    Update {
        req op: UpdateOp,
        req value: Exp,
    }
);

ast_family!(AssignAction { Assign, Update });
ast_node!(
    /// Expression statement with an optional assignment tail.
    ExpListAssign {
        req exprs: ExpList,
        opt action: AssignAction,
    }
);

// ============================================================================
// DECLARATIONS
// ============================================================================

ast_family!(LocalItem { LocalFlag, NameList });
ast_node!(Local { req item: LocalItem });

ast_node!(
    /// `local x <const> = ...` attribute form.
    LocalAttrib {
        req names: NameList,
        req attrib: Name,
        req assign: Assign,
    }
);

ast_node!(
    /// Names with an optional initializer, shared by `export` and `global`.
    NameValues {
        req names: NameList,
        opt assign: Assign,
    }
);
ast_family!(ExportItem { ClassDecl, NameValues, LocalFlag });
ast_node!(Export { req item: ExportItem });
ast_family!(GlobalItem { ClassDecl, NameValues, LocalFlag });
ast_node!(Global { req item: GlobalItem });

ast_node!(ImportName { req name: Name });
ast_node!(
    /// `\name` in an import list: bind as a method of the source.
    ColonImportName { req name: Name }
);
ast_family!(ImportNameItem { ColonImportName, ImportName });
ast_node!(ImportFrom {
    lst1 names: ImportNameItem,
    req source: Exp,
});
ast_family!(ImportTarget { Variable, TableLit });
ast_node!(
    /// `import "mod"` / `import "mod" as target`.
    ImportAs {
        req literal: ImportLiteral,
        opt target: ImportTarget,
    }
);
ast_family!(ImportItem { ImportFrom, ImportAs });
ast_node!(Import { req item: ImportItem });

// ============================================================================
// CLASSES
// ============================================================================

ast_node!(ClassMemberList {
    req sep: Separator,
    lst1 values: KeyValue,
});
ast_family!(ClassContent { ClassMemberList, Statement });
ast_node!(ClassBlock {
    req sep: Separator,
    lst1 contents: ClassContent,
});
ast_family!(ClassName { Variable, SelfName, ChainValue });
ast_node!(ClassDecl {
    opt name: ClassName,
    opt extend: Exp,
    opt body: ClassBlock,
});

// ============================================================================
// STATEMENTS
// ============================================================================

ast_node!(Return { opt exprs: ExpListLow });

ast_node!(Label { req name: LabelName });
ast_node!(Goto { req name: LabelName });

ast_node!(IfLine { req cond: IfCond });
ast_node!(UnlessLine { req cond: IfCond });
ast_family!(AppendixItem { IfLine, UnlessLine, CompInner });
ast_node!(
    /// Postfix modifier: `... if cond`, `... unless cond`, `... for ...`.
    StatementAppendix { req item: AppendixItem }
);

ast_family!(StatementContent {
    Import,
    While,
    Repeat,
    For,
    ForEach,
    Return,
    Local,
    LocalAttrib,
    Export,
    Global,
    BreakLoop,
    Backcall,
    Label,
    Goto,
    ExpListAssign,
});
ast_node!(Statement {
    req content: StatementContent,
    opt appendix: StatementAppendix,
});

ast_family!(BodyItem { Block, Statement });
ast_node!(
    /// A statement body: an indented block or a single inline statement.
    Body { req item: BodyItem }
);
ast_node!(Block {
    req sep: Separator,
    lst statements: Statement,
});

ast_node!(
    /// Root of a parsed module.
    File {
        opt shebang: Shebang,
        opt block: Block,
    }
);

// ============================================================================
// MASTER ENUM
// ============================================================================

ast_kinds!(
    Num,
    Name,
    LuaKeyword,
    ConstValue,
    BreakLoop,
    LocalFlag,
    Shebang,
    SingleString,
    DoubleStringInner,
    LuaString,
    UnaryOperator,
    BinaryOperator,
    UpdateOp,
    FnArrow,
    LabelName,
    ImportLiteral,
    VarArg,
    SelfItem,
    SelfClassItem,
    DefaultValue,
    Existential,
    Separator,
    Variable,
    SelfNameItem,
    SelfClassNameItem,
    SelfName,
    KeyName,
    NameList,
    DoubleStringContent,
    DoubleString,
    String_,
    Exp,
    ExpOpValue,
    Value,
    SimpleValue,
    UnaryExp,
    Parens,
    Callable,
    DotChainItem,
    ColonChainItem,
    BracketExp,
    Slice,
    Invoke,
    InvokeArgs,
    ChainValue,
    VariablePair,
    NormalPair,
    TableLit,
    SimpleTable,
    TableBlock,
    IfCond,
    If,
    Unless,
    While,
    Repeat,
    ForStepValue,
    For,
    AssignableNameList,
    StarExp,
    ForEach,
    Do,
    CatchBlock,
    Try,
    SwitchCase,
    Switch,
    With,
    CompForEach,
    CompFor,
    CompInner,
    Comprehension,
    TblCompValue,
    TblComprehension,
    FnArgDef,
    FnArgDefList,
    OuterVarShadow,
    FnArgsDef,
    FunLit,
    Backcall,
    ExpList,
    ExpListLow,
    Assign,
    Update,
    ExpListAssign,
    Local,
    LocalAttrib,
    NameValues,
    Export,
    Global,
    ImportName,
    ColonImportName,
    ImportFrom,
    ImportAs,
    Import,
    ClassMemberList,
    ClassBlock,
    ClassDecl,
    Return,
    Label,
    Goto,
    IfLine,
    UnlessLine,
    StatementAppendix,
    Statement,
    Body,
    Block,
    File,
);
