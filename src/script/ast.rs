//! Syntax tree for scripts, plus a generic walker
//!
//! The walker reports every node kind it meets, including the load/store
//! context of names and the operator of unary expressions, so that an
//! allow-list can be expressed purely in terms of [`NodeKind`].

use std::fmt;

use crate::error::Span;

/// Every kind of syntax node the walker can report
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NodeKind {
    Module,
    // statements
    ExprStmt,
    Assign,
    AnnAssign,
    AugAssign,
    Pass,
    Break,
    Continue,
    Return,
    Delete,
    Global,
    Nonlocal,
    Assert,
    Raise,
    Import,
    ImportFrom,
    Alias,
    If,
    While,
    For,
    With,
    WithItem,
    FunctionDef,
    Arguments,
    Arg,
    ClassDef,
    Try,
    ExceptHandler,
    // expressions
    Constant,
    Name,
    Tuple,
    List,
    Set,
    Dict,
    Call,
    Keyword,
    Attribute,
    Subscript,
    Slice,
    Starred,
    UnaryOp,
    BinOp,
    BoolOp,
    Compare,
    Lambda,
    IfExp,
    NamedExpr,
    ListComp,
    SetComp,
    DictComp,
    GeneratorExp,
    Comprehension,
    JoinedStr,
    FormattedValue,
    Await,
    Yield,
    YieldFrom,
    // contexts
    Load,
    Store,
    Del,
    // unary operators
    Not,
    Invert,
    UnaryPlus,
    Negate,
}

impl NodeKind {
    /// Human-readable name used in diagnostics
    pub const fn name(self) -> &'static str {
        match self {
            Self::Module => "module",
            Self::ExprStmt => "expr-stmt",
            Self::Assign => "assign",
            Self::AnnAssign => "ann-assign",
            Self::AugAssign => "aug-assign",
            Self::Pass => "pass",
            Self::Break => "break",
            Self::Continue => "continue",
            Self::Return => "return",
            Self::Delete => "delete",
            Self::Global => "global",
            Self::Nonlocal => "nonlocal",
            Self::Assert => "assert",
            Self::Raise => "raise",
            Self::Import => "import",
            Self::ImportFrom => "import-from",
            Self::Alias => "alias",
            Self::If => "if",
            Self::While => "while",
            Self::For => "for",
            Self::With => "with",
            Self::WithItem => "with-item",
            Self::FunctionDef => "function-def",
            Self::Arguments => "arguments",
            Self::Arg => "arg",
            Self::ClassDef => "class-def",
            Self::Try => "try",
            Self::ExceptHandler => "except-handler",
            Self::Constant => "constant",
            Self::Name => "name",
            Self::Tuple => "tuple",
            Self::List => "list",
            Self::Set => "set",
            Self::Dict => "dict",
            Self::Call => "call",
            Self::Keyword => "keyword",
            Self::Attribute => "attribute",
            Self::Subscript => "subscript",
            Self::Slice => "slice",
            Self::Starred => "starred",
            Self::UnaryOp => "unary-op",
            Self::BinOp => "bin-op",
            Self::BoolOp => "bool-op",
            Self::Compare => "compare",
            Self::Lambda => "lambda",
            Self::IfExp => "if-exp",
            Self::NamedExpr => "named-expr",
            Self::ListComp => "list-comp",
            Self::SetComp => "set-comp",
            Self::DictComp => "dict-comp",
            Self::GeneratorExp => "generator-exp",
            Self::Comprehension => "comprehension",
            Self::JoinedStr => "joined-str",
            Self::FormattedValue => "formatted-value",
            Self::Await => "await",
            Self::Yield => "yield",
            Self::YieldFrom => "yield-from",
            Self::Load => "load",
            Self::Store => "store",
            Self::Del => "del",
            Self::Not => "not",
            Self::Invert => "invert",
            Self::UnaryPlus => "unary-plus",
            Self::Negate => "negate",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Whether a target expression is read, written or deleted
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExprContext {
    Load,
    Store,
    Del,
}

impl ExprContext {
    const fn kind(self) -> NodeKind {
        match self {
            Self::Load => NodeKind::Load,
            Self::Store => NodeKind::Store,
            Self::Del => NodeKind::Del,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOperator {
    Not,
    Invert,
    Plus,
    Minus,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOperator {
    Add,
    Sub,
    Mult,
    MatMult,
    Div,
    FloorDiv,
    Mod,
    Pow,
    LShift,
    RShift,
    BitOr,
    BitXor,
    BitAnd,
}

impl BinaryOperator {
    /// Operator for a binary token, also used for augmented assignment
    pub fn from_op(op: &str) -> Option<Self> {
        Some(match op {
            "+" => Self::Add,
            "-" => Self::Sub,
            "*" => Self::Mult,
            "@" => Self::MatMult,
            "/" => Self::Div,
            "//" => Self::FloorDiv,
            "%" => Self::Mod,
            "**" => Self::Pow,
            "<<" => Self::LShift,
            ">>" => Self::RShift,
            "|" => Self::BitOr,
            "^" => Self::BitXor,
            "&" => Self::BitAnd,
            _ => return None,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BoolOperator {
    And,
    Or,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompareOperator {
    Eq,
    NotEq,
    Lt,
    LtE,
    Gt,
    GtE,
    Is,
    IsNot,
    In,
    NotIn,
}

/// Literal values
#[derive(Clone, Debug, PartialEq)]
pub enum Constant {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    Ellipsis,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

impl Expr {
    pub const fn new(kind: ExprKind, span: Span) -> Self {
        Self { kind, span }
    }

    /// Kind of the node itself, ignoring children
    pub const fn node_kind(&self) -> NodeKind {
        match &self.kind {
            ExprKind::Constant(_) => NodeKind::Constant,
            ExprKind::Name { .. } => NodeKind::Name,
            ExprKind::Tuple { .. } => NodeKind::Tuple,
            ExprKind::List { .. } => NodeKind::List,
            ExprKind::Set(_) => NodeKind::Set,
            ExprKind::Dict { .. } => NodeKind::Dict,
            ExprKind::Call { .. } => NodeKind::Call,
            ExprKind::Attribute { .. } => NodeKind::Attribute,
            ExprKind::Subscript { .. } => NodeKind::Subscript,
            ExprKind::Slice { .. } => NodeKind::Slice,
            ExprKind::Starred { .. } => NodeKind::Starred,
            ExprKind::UnaryOp { .. } => NodeKind::UnaryOp,
            ExprKind::BinOp { .. } => NodeKind::BinOp,
            ExprKind::BoolOp { .. } => NodeKind::BoolOp,
            ExprKind::Compare { .. } => NodeKind::Compare,
            ExprKind::Lambda { .. } => NodeKind::Lambda,
            ExprKind::IfExp { .. } => NodeKind::IfExp,
            ExprKind::NamedExpr { .. } => NodeKind::NamedExpr,
            ExprKind::ListComp { .. } => NodeKind::ListComp,
            ExprKind::SetComp { .. } => NodeKind::SetComp,
            ExprKind::DictComp { .. } => NodeKind::DictComp,
            ExprKind::GeneratorExp { .. } => NodeKind::GeneratorExp,
            ExprKind::JoinedStr(_) => NodeKind::JoinedStr,
            ExprKind::FormattedValue { .. } => NodeKind::FormattedValue,
            ExprKind::Await(_) => NodeKind::Await,
            ExprKind::Yield(_) => NodeKind::Yield,
            ExprKind::YieldFrom(_) => NodeKind::YieldFrom,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ExprKind {
    Constant(Constant),
    Name {
        id: String,
        ctx: ExprContext,
    },
    Tuple {
        elts: Vec<Expr>,
        ctx: ExprContext,
    },
    List {
        elts: Vec<Expr>,
        ctx: ExprContext,
    },
    Set(Vec<Expr>),
    /// `None` keys stand for `**mapping` entries
    Dict {
        keys: Vec<Option<Expr>>,
        values: Vec<Expr>,
    },
    Call {
        func: Box<Expr>,
        args: Vec<Expr>,
        keywords: Vec<Keyword>,
    },
    Attribute {
        value: Box<Expr>,
        attr: String,
        ctx: ExprContext,
    },
    Subscript {
        value: Box<Expr>,
        slice: Box<Expr>,
        ctx: ExprContext,
    },
    Slice {
        lower: Option<Box<Expr>>,
        upper: Option<Box<Expr>>,
        step: Option<Box<Expr>>,
    },
    Starred {
        value: Box<Expr>,
        ctx: ExprContext,
    },
    UnaryOp {
        op: UnaryOperator,
        operand: Box<Expr>,
    },
    BinOp {
        left: Box<Expr>,
        op: BinaryOperator,
        right: Box<Expr>,
    },
    BoolOp {
        op: BoolOperator,
        values: Vec<Expr>,
    },
    Compare {
        left: Box<Expr>,
        ops: Vec<CompareOperator>,
        comparators: Vec<Expr>,
    },
    Lambda {
        params: Box<Parameters>,
        body: Box<Expr>,
    },
    IfExp {
        test: Box<Expr>,
        body: Box<Expr>,
        orelse: Box<Expr>,
    },
    NamedExpr {
        target: Box<Expr>,
        value: Box<Expr>,
    },
    ListComp {
        elt: Box<Expr>,
        generators: Vec<Comprehension>,
    },
    SetComp {
        elt: Box<Expr>,
        generators: Vec<Comprehension>,
    },
    DictComp {
        key: Box<Expr>,
        value: Box<Expr>,
        generators: Vec<Comprehension>,
    },
    GeneratorExp {
        elt: Box<Expr>,
        generators: Vec<Comprehension>,
    },
    /// f-string: literal pieces are `Constant`, holes are `FormattedValue`
    JoinedStr(Vec<Expr>),
    /// `{value!r:spec}`; a spec is itself a `JoinedStr` and may hold holes
    FormattedValue {
        value: Box<Expr>,
        conversion: Option<char>,
        format_spec: Option<Box<Expr>>,
    },
    Await(Box<Expr>),
    Yield(Option<Box<Expr>>),
    YieldFrom(Box<Expr>),
}

/// `name=value` in a call; `arg` is `None` for `**mapping`
#[derive(Clone, Debug, PartialEq)]
pub struct Keyword {
    pub arg: Option<String>,
    pub value: Expr,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Comprehension {
    pub target: Expr,
    pub iter: Expr,
    pub ifs: Vec<Expr>,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Param {
    pub name: String,
    pub annotation: Option<Expr>,
    pub default: Option<Expr>,
    pub span: Span,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Parameters {
    pub args: Vec<Param>,
    pub vararg: Option<Param>,
    pub kwonly: Vec<Param>,
    pub kwarg: Option<Param>,
}

impl Parameters {
    fn iter(&self) -> impl Iterator<Item = &Param> {
        self.args
            .iter()
            .chain(self.vararg.iter())
            .chain(self.kwonly.iter())
            .chain(self.kwarg.iter())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Alias {
    pub name: String,
    pub asname: Option<String>,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub struct WithItem {
    pub context: Expr,
    pub target: Option<Expr>,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ExceptHandler {
    pub ty: Option<Expr>,
    pub name: Option<String>,
    pub body: Vec<Stmt>,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

impl Stmt {
    pub const fn new(kind: StmtKind, span: Span) -> Self {
        Self { kind, span }
    }

    pub const fn node_kind(&self) -> NodeKind {
        match &self.kind {
            StmtKind::Expr(_) => NodeKind::ExprStmt,
            StmtKind::Assign { .. } => NodeKind::Assign,
            StmtKind::AnnAssign { .. } => NodeKind::AnnAssign,
            StmtKind::AugAssign { .. } => NodeKind::AugAssign,
            StmtKind::Pass => NodeKind::Pass,
            StmtKind::Break => NodeKind::Break,
            StmtKind::Continue => NodeKind::Continue,
            StmtKind::Return(_) => NodeKind::Return,
            StmtKind::Delete(_) => NodeKind::Delete,
            StmtKind::Global(_) => NodeKind::Global,
            StmtKind::Nonlocal(_) => NodeKind::Nonlocal,
            StmtKind::Assert { .. } => NodeKind::Assert,
            StmtKind::Raise { .. } => NodeKind::Raise,
            StmtKind::Import(_) => NodeKind::Import,
            StmtKind::ImportFrom { .. } => NodeKind::ImportFrom,
            StmtKind::If { .. } => NodeKind::If,
            StmtKind::While { .. } => NodeKind::While,
            StmtKind::For { .. } => NodeKind::For,
            StmtKind::With { .. } => NodeKind::With,
            StmtKind::FunctionDef { .. } => NodeKind::FunctionDef,
            StmtKind::ClassDef { .. } => NodeKind::ClassDef,
            StmtKind::Try { .. } => NodeKind::Try,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum StmtKind {
    Expr(Expr),
    Assign {
        targets: Vec<Expr>,
        value: Expr,
    },
    AnnAssign {
        target: Expr,
        annotation: Expr,
        value: Option<Expr>,
    },
    AugAssign {
        target: Expr,
        op: BinaryOperator,
        value: Expr,
    },
    Pass,
    Break,
    Continue,
    Return(Option<Expr>),
    Delete(Vec<Expr>),
    Global(Vec<String>),
    Nonlocal(Vec<String>),
    Assert {
        test: Expr,
        msg: Option<Expr>,
    },
    Raise {
        exc: Option<Expr>,
        cause: Option<Expr>,
    },
    Import(Vec<Alias>),
    ImportFrom {
        module: Option<String>,
        names: Vec<Alias>,
        level: usize,
    },
    If {
        test: Expr,
        body: Vec<Stmt>,
        orelse: Vec<Stmt>,
    },
    While {
        test: Expr,
        body: Vec<Stmt>,
        orelse: Vec<Stmt>,
    },
    For {
        target: Expr,
        iter: Expr,
        body: Vec<Stmt>,
        orelse: Vec<Stmt>,
    },
    With {
        items: Vec<WithItem>,
        body: Vec<Stmt>,
    },
    FunctionDef {
        name: String,
        params: Parameters,
        body: Vec<Stmt>,
        decorators: Vec<Expr>,
        returns: Option<Expr>,
    },
    ClassDef {
        name: String,
        bases: Vec<Expr>,
        keywords: Vec<Keyword>,
        body: Vec<Stmt>,
        decorators: Vec<Expr>,
    },
    Try {
        body: Vec<Stmt>,
        handlers: Vec<ExceptHandler>,
        orelse: Vec<Stmt>,
        finalbody: Vec<Stmt>,
    },
}

/// Parsed script
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Module {
    pub body: Vec<Stmt>,
}

/// Receives every node the walker visits
pub trait Visitor {
    fn visit_kind(&mut self, kind: NodeKind, span: Span);

    /// Called once per call expression, before its children are walked
    fn visit_call(&mut self, _func: &Expr, _span: Span) {}
}

pub fn walk_module<V: Visitor + ?Sized>(visitor: &mut V, module: &Module) {
    let span = match (module.body.first(), module.body.last()) {
        (Some(first), Some(last)) => first.span.to(last.span),
        _ => Span::empty(),
    };
    visitor.visit_kind(NodeKind::Module, span);
    walk_body(visitor, &module.body);
}

fn walk_body<V: Visitor + ?Sized>(visitor: &mut V, body: &[Stmt]) {
    for stmt in body {
        walk_stmt(visitor, stmt);
    }
}

fn walk_opt<V: Visitor + ?Sized>(visitor: &mut V, expr: Option<&Expr>) {
    if let Some(expr) = expr {
        walk_expr(visitor, expr);
    }
}

fn walk_exprs<V: Visitor + ?Sized>(visitor: &mut V, exprs: &[Expr]) {
    for expr in exprs {
        walk_expr(visitor, expr);
    }
}

fn walk_keywords<V: Visitor + ?Sized>(visitor: &mut V, keywords: &[Keyword]) {
    for keyword in keywords {
        visitor.visit_kind(NodeKind::Keyword, keyword.span);
        walk_expr(visitor, &keyword.value);
    }
}

fn walk_params<V: Visitor + ?Sized>(visitor: &mut V, params: &Parameters, span: Span) {
    visitor.visit_kind(NodeKind::Arguments, span);
    for param in params.iter() {
        visitor.visit_kind(NodeKind::Arg, param.span);
        walk_opt(visitor, param.annotation.as_ref());
        walk_opt(visitor, param.default.as_ref());
    }
}

fn walk_generators<V: Visitor + ?Sized>(visitor: &mut V, generators: &[Comprehension]) {
    for generator in generators {
        visitor.visit_kind(NodeKind::Comprehension, generator.span);
        walk_expr(visitor, &generator.target);
        walk_expr(visitor, &generator.iter);
        walk_exprs(visitor, &generator.ifs);
    }
}

pub fn walk_stmt<V: Visitor + ?Sized>(visitor: &mut V, stmt: &Stmt) {
    visitor.visit_kind(stmt.node_kind(), stmt.span);
    match &stmt.kind {
        StmtKind::Expr(expr) => walk_expr(visitor, expr),
        StmtKind::Assign { targets, value } => {
            walk_exprs(visitor, targets);
            walk_expr(visitor, value);
        }
        StmtKind::AnnAssign {
            target,
            annotation,
            value,
        } => {
            walk_expr(visitor, target);
            walk_expr(visitor, annotation);
            walk_opt(visitor, value.as_ref());
        }
        StmtKind::AugAssign { target, value, .. } => {
            walk_expr(visitor, target);
            walk_expr(visitor, value);
        }
        StmtKind::Pass
        | StmtKind::Break
        | StmtKind::Continue
        | StmtKind::Global(_)
        | StmtKind::Nonlocal(_) => {}
        StmtKind::Return(value) => walk_opt(visitor, value.as_ref()),
        StmtKind::Delete(targets) => walk_exprs(visitor, targets),
        StmtKind::Assert { test, msg } => {
            walk_expr(visitor, test);
            walk_opt(visitor, msg.as_ref());
        }
        StmtKind::Raise { exc, cause } => {
            walk_opt(visitor, exc.as_ref());
            walk_opt(visitor, cause.as_ref());
        }
        StmtKind::Import(names) | StmtKind::ImportFrom { names, .. } => {
            for alias in names {
                visitor.visit_kind(NodeKind::Alias, alias.span);
            }
        }
        StmtKind::If { test, body, orelse } | StmtKind::While { test, body, orelse } => {
            walk_expr(visitor, test);
            walk_body(visitor, body);
            walk_body(visitor, orelse);
        }
        StmtKind::For {
            target,
            iter,
            body,
            orelse,
        } => {
            walk_expr(visitor, target);
            walk_expr(visitor, iter);
            walk_body(visitor, body);
            walk_body(visitor, orelse);
        }
        StmtKind::With { items, body } => {
            for item in items {
                visitor.visit_kind(NodeKind::WithItem, item.span);
                walk_expr(visitor, &item.context);
                walk_opt(visitor, item.target.as_ref());
            }
            walk_body(visitor, body);
        }
        StmtKind::FunctionDef {
            params,
            body,
            decorators,
            returns,
            ..
        } => {
            walk_exprs(visitor, decorators);
            walk_params(visitor, params, stmt.span);
            walk_opt(visitor, returns.as_ref());
            walk_body(visitor, body);
        }
        StmtKind::ClassDef {
            bases,
            keywords,
            body,
            decorators,
            ..
        } => {
            walk_exprs(visitor, decorators);
            walk_exprs(visitor, bases);
            walk_keywords(visitor, keywords);
            walk_body(visitor, body);
        }
        StmtKind::Try {
            body,
            handlers,
            orelse,
            finalbody,
        } => {
            walk_body(visitor, body);
            for handler in handlers {
                visitor.visit_kind(NodeKind::ExceptHandler, handler.span);
                walk_opt(visitor, handler.ty.as_ref());
                walk_body(visitor, &handler.body);
            }
            walk_body(visitor, orelse);
            walk_body(visitor, finalbody);
        }
    }
}

pub fn walk_expr<V: Visitor + ?Sized>(visitor: &mut V, expr: &Expr) {
    visitor.visit_kind(expr.node_kind(), expr.span);
    match &expr.kind {
        ExprKind::Constant(_) => {}
        ExprKind::Name { ctx, .. } => visitor.visit_kind(ctx.kind(), expr.span),
        ExprKind::Tuple { elts, ctx } | ExprKind::List { elts, ctx } => {
            walk_exprs(visitor, elts);
            visitor.visit_kind(ctx.kind(), expr.span);
        }
        ExprKind::Set(elts) | ExprKind::JoinedStr(elts) => walk_exprs(visitor, elts),
        ExprKind::Dict { keys, values } => {
            for key in keys.iter().flatten() {
                walk_expr(visitor, key);
            }
            walk_exprs(visitor, values);
        }
        ExprKind::Call {
            func,
            args,
            keywords,
        } => {
            visitor.visit_call(func, expr.span);
            walk_expr(visitor, func);
            walk_exprs(visitor, args);
            walk_keywords(visitor, keywords);
        }
        ExprKind::Attribute { value, ctx, .. } | ExprKind::Starred { value, ctx } => {
            walk_expr(visitor, value);
            visitor.visit_kind(ctx.kind(), expr.span);
        }
        ExprKind::Subscript { value, slice, ctx } => {
            walk_expr(visitor, value);
            walk_expr(visitor, slice);
            visitor.visit_kind(ctx.kind(), expr.span);
        }
        ExprKind::Slice { lower, upper, step } => {
            for part in [lower, upper, step].into_iter().flatten() {
                walk_expr(visitor, part);
            }
        }
        ExprKind::UnaryOp { op, operand } => {
            let kind = match op {
                UnaryOperator::Not => NodeKind::Not,
                UnaryOperator::Invert => NodeKind::Invert,
                UnaryOperator::Plus => NodeKind::UnaryPlus,
                UnaryOperator::Minus => NodeKind::Negate,
            };
            visitor.visit_kind(kind, expr.span);
            walk_expr(visitor, operand);
        }
        ExprKind::BinOp { left, right, .. } => {
            walk_expr(visitor, left);
            walk_expr(visitor, right);
        }
        ExprKind::BoolOp { values, .. } => walk_exprs(visitor, values),
        ExprKind::Compare {
            left, comparators, ..
        } => {
            walk_expr(visitor, left);
            walk_exprs(visitor, comparators);
        }
        ExprKind::Lambda { params, body } => {
            walk_params(visitor, params, expr.span);
            walk_expr(visitor, body);
        }
        ExprKind::IfExp { test, body, orelse } => {
            walk_expr(visitor, test);
            walk_expr(visitor, body);
            walk_expr(visitor, orelse);
        }
        ExprKind::NamedExpr { target, value } => {
            walk_expr(visitor, target);
            walk_expr(visitor, value);
        }
        ExprKind::ListComp { elt, generators }
        | ExprKind::SetComp { elt, generators }
        | ExprKind::GeneratorExp { elt, generators } => {
            walk_expr(visitor, elt);
            walk_generators(visitor, generators);
        }
        ExprKind::DictComp {
            key,
            value,
            generators,
        } => {
            walk_expr(visitor, key);
            walk_expr(visitor, value);
            walk_generators(visitor, generators);
        }
        ExprKind::FormattedValue {
            value, format_spec, ..
        } => {
            walk_expr(visitor, value);
            walk_opt(visitor, format_spec.as_deref());
        }
        ExprKind::Await(value) | ExprKind::YieldFrom(value) => walk_expr(visitor, value),
        ExprKind::Yield(value) => walk_opt(visitor, value.as_deref()),
    }
}
