//! Script syntax: tree types, walker and parser

pub mod ast;
pub mod parser;

pub use ast::{
    walk_expr, walk_module, walk_stmt, Constant, Expr, ExprContext, ExprKind, Keyword, Module,
    NodeKind, Stmt, StmtKind, UnaryOperator, Visitor, WithItem,
};
pub use parser::{parse, parse_with_config, Parser, ScriptConfig};
