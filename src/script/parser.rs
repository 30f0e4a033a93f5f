//! Recursive-descent parser for scripts
//!
//! Accepts far more than the sandbox allows. A script that uses a loop or an
//! import must still parse, so that the sandbox can name what it refused.

use std::collections::HashSet;
use std::fmt;
use std::iter::Peekable;
use std::str::Chars;

use crate::error::{Error, Pos, Result, SecurityError, Span, SyntaxError};
use crate::lexer::script::{tokenize, Keyword as Kw, ScriptToken, ScriptTokenKind as Tok, StrKind};
use crate::script::ast::{
    Alias, BinaryOperator, BoolOperator, CompareOperator, Comprehension, Constant, ExceptHandler,
    Expr, ExprContext, ExprKind, Keyword, Module, Param, Parameters, Stmt, StmtKind,
    UnaryOperator, WithItem,
};

/// Maximum nesting depth of blocks and expressions; holds on a 2 MiB
/// thread stack in debug builds
pub const DEFAULT_MAX_DEPTH: usize = 32;
/// Maximum script size (1MB)
pub const DEFAULT_MAX_SIZE: usize = 1_048_576;

/// Limits applied while parsing untrusted scripts
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScriptConfig {
    /// Maximum input size in bytes (0 means unlimited)
    pub max_size: usize,
    /// Maximum nesting depth (0 means unlimited)
    pub max_depth: usize,
}

impl Default for ScriptConfig {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_MAX_SIZE,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl fmt::Display for ScriptConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ScriptConfig {{ max_size: {}, max_depth: {} }}",
            self.max_size, self.max_depth
        )
    }
}

impl ScriptConfig {
    pub const fn new(max_depth: usize, max_size: usize) -> Self {
        Self {
            max_size,
            max_depth,
        }
    }

    pub const fn unlimited() -> Self {
        Self {
            max_size: 0,
            max_depth: 0,
        }
    }
}

// Precedence levels, loosest first
const OR_LEVEL: usize = 0;
const AND_LEVEL: usize = 1;
const NOT_LEVEL: usize = 2;
const COMPARE_LEVEL: usize = 3;
const BITWISE_OR_LEVEL: usize = 4;

// Binary operators from `|` up to `*`, one level each
const BINARY_LEVELS: [&[&str]; 6] = [
    &["|"],
    &["^"],
    &["&"],
    &["<<", ">>"],
    &["+", "-"],
    &["*", "/", "%", "//", "@"],
];

const AUGMENTED: [&str; 13] = [
    "+=", "-=", "*=", "/=", "//=", "%=", "**=", ">>=", "<<=", "&=", "|=", "^=", "@=",
];

enum Infix {
    Bool(Kw, BoolOperator),
    Compare,
    Binary(BinaryOperator),
}

/// Script parser over a pre-lexed token stream
#[derive(Debug)]
pub struct Parser {
    tokens: Vec<ScriptToken>,
    pos: usize,
    prev_end: Pos,
    eof: ScriptToken,
    config: ScriptConfig,
    depth: usize,
}

impl Parser {
    pub fn new(input: &str, config: ScriptConfig) -> Result<Self> {
        if config.max_size > 0 && input.len() > config.max_size {
            return Err(Error::bare(SecurityError::MaxSizeExceeded {
                max: config.max_size,
            }));
        }
        let tokens = tokenize(input)?;
        let end = tokens.last().map(|t| t.span).unwrap_or_default();
        Ok(Self {
            tokens,
            pos: 0,
            prev_end: Pos::default(),
            eof: ScriptToken::new(Tok::Eof, end),
            config,
            depth: 0,
        })
    }

    /// Parse a whole script
    pub fn parse_module(mut self) -> Result<Module> {
        let mut body = Vec::new();
        loop {
            match self.peek() {
                Tok::Eof => break,
                Tok::Newline => {
                    self.advance();
                }
                _ => body.extend(self.statement()?),
            }
        }
        Ok(Module { body })
    }

    // Token helpers

    fn current(&self) -> &ScriptToken {
        self.tokens.get(self.pos).unwrap_or(&self.eof)
    }

    fn peek(&self) -> &Tok {
        &self.current().kind
    }

    fn peek_at(&self, ahead: usize) -> &Tok {
        self.tokens
            .get(self.pos.saturating_add(ahead))
            .map_or(&self.eof.kind, |t| &t.kind)
    }

    fn start(&self) -> Pos {
        self.current().span.start
    }

    fn span_from(&self, start: Pos) -> Span {
        Span::new(start, self.prev_end.max(start))
    }

    fn advance(&mut self) -> ScriptToken {
        let token = self.current().clone();
        if token.kind != Tok::Eof {
            self.pos += 1;
        }
        self.prev_end = token.span.end;
        token
    }

    fn check_op(&self, op: &str) -> bool {
        matches!(self.peek(), Tok::Op(o) if *o == op)
    }

    fn eat_op(&mut self, op: &str) -> bool {
        if self.check_op(op) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_op(&mut self, op: &str) -> Result<()> {
        if self.eat_op(op) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("'{op}'")))
        }
    }

    fn check_kw(&self, kw: Kw) -> bool {
        matches!(self.peek(), Tok::Keyword(k) if *k == kw)
    }

    fn eat_kw(&mut self, kw: Kw) -> bool {
        if self.check_kw(kw) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_kw(&mut self, kw: Kw) -> Result<()> {
        if self.eat_kw(kw) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("'{}'", kw.as_str())))
        }
    }

    fn expect_name(&mut self) -> Result<String> {
        match self.peek() {
            Tok::Name(_) => match self.advance().kind {
                Tok::Name(name) => Ok(name),
                _ => Err(self.unexpected("name")),
            },
            _ => Err(self.unexpected("name")),
        }
    }

    fn expect_line_end(&mut self) -> Result<()> {
        match self.peek() {
            Tok::Newline => {
                self.advance();
                Ok(())
            }
            Tok::Eof => Ok(()),
            _ => Err(self.unexpected("end of line")),
        }
    }

    fn unexpected(&self, expected: &str) -> Error {
        let token = self.current();
        Error::new(
            SyntaxError::Expected {
                expected: expected.to_string(),
                found: token.kind.to_string(),
            },
            token.span,
        )
    }

    fn enter_nested(&mut self) -> Result<()> {
        self.depth += 1;
        if self.config.max_depth > 0 && self.depth > self.config.max_depth {
            return Err(Error::new(
                SecurityError::MaxDepthExceeded {
                    max: self.config.max_depth,
                },
                self.current().span,
            ));
        }
        Ok(())
    }

    fn exit_nested(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    fn nested<T>(&mut self, parse: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.enter_nested()?;
        let result = parse(self);
        self.exit_nested();
        result
    }

    // Statements

    fn statement(&mut self) -> Result<Vec<Stmt>> {
        let stmt = match self.peek() {
            Tok::Keyword(Kw::If) => self.if_statement()?,
            Tok::Keyword(Kw::While) => self.while_statement()?,
            Tok::Keyword(Kw::For) => self.for_statement()?,
            Tok::Keyword(Kw::With) => self.with_statement()?,
            Tok::Keyword(Kw::Def) => self.function_def(Vec::new())?,
            Tok::Keyword(Kw::Class) => self.class_def(Vec::new())?,
            Tok::Keyword(Kw::Try) => self.try_statement()?,
            Tok::Op("@") => self.decorated()?,
            _ => return self.simple_statements(),
        };
        Ok(vec![stmt])
    }

    fn simple_statements(&mut self) -> Result<Vec<Stmt>> {
        let mut stmts = vec![self.small_statement()?];
        while self.eat_op(";") {
            if matches!(self.peek(), Tok::Newline | Tok::Eof) {
                break;
            }
            stmts.push(self.small_statement()?);
        }
        self.expect_line_end()?;
        Ok(stmts)
    }

    fn block(&mut self) -> Result<Vec<Stmt>> {
        self.expect_op(":")?;
        self.nested(|p| {
            if !matches!(p.peek(), Tok::Newline) {
                return p.simple_statements();
            }
            p.advance();
            if !matches!(p.peek(), Tok::Indent) {
                return Err(p.unexpected("indented block"));
            }
            p.advance();
            let mut body = Vec::new();
            loop {
                match p.peek() {
                    Tok::Dedent => {
                        p.advance();
                        break;
                    }
                    Tok::Eof => break,
                    Tok::Newline => {
                        p.advance();
                    }
                    _ => body.extend(p.statement()?),
                }
            }
            Ok(body)
        })
    }

    fn small_statement(&mut self) -> Result<Stmt> {
        let start = self.start();
        let kind = match self.peek() {
            Tok::Keyword(Kw::Pass) => {
                self.advance();
                StmtKind::Pass
            }
            Tok::Keyword(Kw::Break) => {
                self.advance();
                StmtKind::Break
            }
            Tok::Keyword(Kw::Continue) => {
                self.advance();
                StmtKind::Continue
            }
            Tok::Keyword(Kw::Return) => {
                self.advance();
                let value = if self.at_statement_end() {
                    None
                } else {
                    Some(self.star_expressions()?)
                };
                StmtKind::Return(value)
            }
            Tok::Keyword(Kw::Del) => {
                self.advance();
                let mut targets = Vec::new();
                loop {
                    let target = self.bitwise_or()?;
                    targets.push(to_target(target, ExprContext::Del)?);
                    if !self.eat_op(",") || self.at_statement_end() {
                        break;
                    }
                }
                StmtKind::Delete(targets)
            }
            Tok::Keyword(Kw::Global) => {
                self.advance();
                StmtKind::Global(self.name_list()?)
            }
            Tok::Keyword(Kw::Nonlocal) => {
                self.advance();
                StmtKind::Nonlocal(self.name_list()?)
            }
            Tok::Keyword(Kw::Assert) => {
                self.advance();
                let test = self.expression()?;
                let msg = if self.eat_op(",") {
                    Some(self.expression()?)
                } else {
                    None
                };
                StmtKind::Assert { test, msg }
            }
            Tok::Keyword(Kw::Raise) => {
                self.advance();
                let (exc, cause) = if self.at_statement_end() {
                    (None, None)
                } else {
                    let exc = self.expression()?;
                    let cause = if self.eat_kw(Kw::From) {
                        Some(self.expression()?)
                    } else {
                        None
                    };
                    (Some(exc), cause)
                };
                StmtKind::Raise { exc, cause }
            }
            Tok::Keyword(Kw::Import) => {
                self.advance();
                let mut names = Vec::new();
                loop {
                    names.push(self.alias(true)?);
                    if !self.eat_op(",") {
                        break;
                    }
                }
                StmtKind::Import(names)
            }
            Tok::Keyword(Kw::From) => self.import_from()?,
            _ => self.expression_statement()?,
        };
        Ok(Stmt::new(kind, self.span_from(start)))
    }

    fn at_statement_end(&self) -> bool {
        matches!(self.peek(), Tok::Newline | Tok::Eof | Tok::Op(";"))
    }

    fn name_list(&mut self) -> Result<Vec<String>> {
        let mut names = vec![self.expect_name()?];
        while self.eat_op(",") {
            names.push(self.expect_name()?);
        }
        Ok(names)
    }

    fn dotted_name(&mut self) -> Result<String> {
        let mut name = self.expect_name()?;
        while self.eat_op(".") {
            name.push('.');
            name.push_str(&self.expect_name()?);
        }
        Ok(name)
    }

    fn alias(&mut self, dotted: bool) -> Result<Alias> {
        let start = self.start();
        let name = if dotted {
            self.dotted_name()?
        } else {
            self.expect_name()?
        };
        let asname = if self.eat_kw(Kw::As) {
            Some(self.expect_name()?)
        } else {
            None
        };
        Ok(Alias {
            name,
            asname,
            span: self.span_from(start),
        })
    }

    fn import_from(&mut self) -> Result<StmtKind> {
        self.expect_kw(Kw::From)?;
        let mut level = 0;
        loop {
            if self.eat_op(".") {
                level += 1;
            } else if self.eat_op("...") {
                level += 3;
            } else {
                break;
            }
        }
        let module = if self.check_kw(Kw::Import) {
            None
        } else {
            Some(self.dotted_name()?)
        };
        self.expect_kw(Kw::Import)?;

        let mut names = Vec::new();
        if self.check_op("*") {
            let start = self.start();
            self.advance();
            names.push(Alias {
                name: "*".to_string(),
                asname: None,
                span: self.span_from(start),
            });
        } else {
            let parenthesized = self.eat_op("(");
            loop {
                names.push(self.alias(false)?);
                if !self.eat_op(",") {
                    break;
                }
                if parenthesized && self.check_op(")") {
                    break;
                }
            }
            if parenthesized {
                self.expect_op(")")?;
            }
        }
        Ok(StmtKind::ImportFrom {
            module,
            names,
            level,
        })
    }

    fn expression_statement(&mut self) -> Result<StmtKind> {
        let first = self.star_expressions()?;

        if self.check_op("=") {
            let mut targets = vec![to_target(first, ExprContext::Store)?];
            self.advance();
            let mut value = self.assignment_value()?;
            while self.eat_op("=") {
                targets.push(to_target(value, ExprContext::Store)?);
                value = self.assignment_value()?;
            }
            return Ok(StmtKind::Assign { targets, value });
        }

        if self.check_op(":") {
            self.advance();
            let target = to_target(first, ExprContext::Store)?;
            let annotation = self.expression()?;
            let value = if self.eat_op("=") {
                Some(self.assignment_value()?)
            } else {
                None
            };
            return Ok(StmtKind::AnnAssign {
                target,
                annotation,
                value,
            });
        }

        if let Tok::Op(op) = *self.peek() {
            if AUGMENTED.contains(&op) {
                let binary = op
                    .strip_suffix('=')
                    .and_then(BinaryOperator::from_op)
                    .ok_or_else(|| self.unexpected("augmented assignment"))?;
                self.advance();
                let target = to_target(first, ExprContext::Store)?;
                let value = self.assignment_value()?;
                return Ok(StmtKind::AugAssign {
                    target,
                    op: binary,
                    value,
                });
            }
        }

        Ok(StmtKind::Expr(first))
    }

    fn assignment_value(&mut self) -> Result<Expr> {
        if self.check_kw(Kw::Yield) {
            self.yield_expression()
        } else {
            self.star_expressions()
        }
    }

    fn if_statement(&mut self) -> Result<Stmt> {
        let start = self.start();
        // `if` or `elif`
        self.advance();
        let test = self.named_expression()?;
        let body = self.block()?;
        let orelse = if self.check_kw(Kw::Elif) {
            vec![self.if_statement()?]
        } else if self.eat_kw(Kw::Else) {
            self.block()?
        } else {
            Vec::new()
        };
        Ok(Stmt::new(
            StmtKind::If { test, body, orelse },
            self.span_from(start),
        ))
    }

    fn while_statement(&mut self) -> Result<Stmt> {
        let start = self.start();
        self.expect_kw(Kw::While)?;
        let test = self.named_expression()?;
        let body = self.block()?;
        let orelse = self.else_block()?;
        Ok(Stmt::new(
            StmtKind::While { test, body, orelse },
            self.span_from(start),
        ))
    }

    fn else_block(&mut self) -> Result<Vec<Stmt>> {
        if self.eat_kw(Kw::Else) {
            self.block()
        } else {
            Ok(Vec::new())
        }
    }

    fn for_statement(&mut self) -> Result<Stmt> {
        let start = self.start();
        self.expect_kw(Kw::For)?;
        let target = self.target_list()?;
        self.expect_kw(Kw::In)?;
        let iter = self.star_expressions()?;
        let body = self.block()?;
        let orelse = self.else_block()?;
        Ok(Stmt::new(
            StmtKind::For {
                target,
                iter,
                body,
                orelse,
            },
            self.span_from(start),
        ))
    }

    /// Targets of `for` and comprehensions; stops before `in`
    fn target_list(&mut self) -> Result<Expr> {
        let start = self.start();
        let first = self.star_or_bitwise()?;
        if !self.check_op(",") {
            return to_target(first, ExprContext::Store);
        }
        let mut elts = vec![first];
        while self.eat_op(",") {
            if self.check_kw(Kw::In) {
                break;
            }
            elts.push(self.star_or_bitwise()?);
        }
        let tuple = Expr::new(
            ExprKind::Tuple {
                elts,
                ctx: ExprContext::Load,
            },
            self.span_from(start),
        );
        to_target(tuple, ExprContext::Store)
    }

    fn star_or_bitwise(&mut self) -> Result<Expr> {
        let start = self.start();
        if self.eat_op("*") {
            let value = self.bitwise_or()?;
            return Ok(Expr::new(
                ExprKind::Starred {
                    value: Box::new(value),
                    ctx: ExprContext::Load,
                },
                self.span_from(start),
            ));
        }
        self.bitwise_or()
    }

    fn with_statement(&mut self) -> Result<Stmt> {
        let start = self.start();
        self.expect_kw(Kw::With)?;
        let mut items = Vec::new();
        loop {
            let item_start = self.start();
            let context = self.expression()?;
            let target = if self.eat_kw(Kw::As) {
                let target = self.star_or_bitwise()?;
                Some(to_target(target, ExprContext::Store)?)
            } else {
                None
            };
            items.push(WithItem {
                context,
                target,
                span: self.span_from(item_start),
            });
            if !self.eat_op(",") {
                break;
            }
        }
        let body = self.block()?;
        Ok(Stmt::new(
            StmtKind::With { items, body },
            self.span_from(start),
        ))
    }

    fn decorated(&mut self) -> Result<Stmt> {
        let mut decorators = Vec::new();
        while self.eat_op("@") {
            decorators.push(self.named_expression()?);
            self.expect_line_end()?;
        }
        match self.peek() {
            Tok::Keyword(Kw::Def) => self.function_def(decorators),
            Tok::Keyword(Kw::Class) => self.class_def(decorators),
            _ => Err(self.unexpected("'def' or 'class'")),
        }
    }

    fn function_def(&mut self, decorators: Vec<Expr>) -> Result<Stmt> {
        let start = self.start();
        self.expect_kw(Kw::Def)?;
        let name = self.expect_name()?;
        self.expect_op("(")?;
        let params = self.parameters(true, ")")?;
        self.expect_op(")")?;
        let returns = if self.eat_op("->") {
            Some(self.expression()?)
        } else {
            None
        };
        let body = self.block()?;
        Ok(Stmt::new(
            StmtKind::FunctionDef {
                name,
                params,
                body,
                decorators,
                returns,
            },
            self.span_from(start),
        ))
    }

    fn parameters(&mut self, annotated: bool, closing: &str) -> Result<Parameters> {
        let mut params = Parameters::default();
        let mut keyword_only = false;
        while !self.check_op(closing) {
            if self.eat_op("/") {
                // positional-only marker
            } else if self.eat_op("**") {
                params.kwarg = Some(self.parameter(annotated)?);
            } else if self.eat_op("*") {
                keyword_only = true;
                if !self.check_op(",") && !self.check_op(closing) {
                    params.vararg = Some(self.parameter(annotated)?);
                }
            } else {
                let mut param = self.parameter(annotated)?;
                if self.eat_op("=") {
                    param.default = Some(self.expression()?);
                }
                if keyword_only {
                    params.kwonly.push(param);
                } else {
                    params.args.push(param);
                }
            }
            if !self.eat_op(",") {
                break;
            }
        }
        Ok(params)
    }

    fn parameter(&mut self, annotated: bool) -> Result<Param> {
        let start = self.start();
        let name = self.expect_name()?;
        let annotation = if annotated && self.eat_op(":") {
            Some(self.expression()?)
        } else {
            None
        };
        Ok(Param {
            name,
            annotation,
            default: None,
            span: self.span_from(start),
        })
    }

    fn class_def(&mut self, decorators: Vec<Expr>) -> Result<Stmt> {
        let start = self.start();
        self.expect_kw(Kw::Class)?;
        let name = self.expect_name()?;
        let (bases, keywords) = if self.eat_op("(") {
            self.arguments()?
        } else {
            (Vec::new(), Vec::new())
        };
        let body = self.block()?;
        Ok(Stmt::new(
            StmtKind::ClassDef {
                name,
                bases,
                keywords,
                body,
                decorators,
            },
            self.span_from(start),
        ))
    }

    fn try_statement(&mut self) -> Result<Stmt> {
        let start = self.start();
        self.expect_kw(Kw::Try)?;
        let body = self.block()?;

        let mut handlers = Vec::new();
        while self.check_kw(Kw::Except) {
            let handler_start = self.start();
            self.advance();
            let (ty, name) = if self.check_op(":") {
                (None, None)
            } else {
                let ty = self.expression()?;
                let name = if self.eat_kw(Kw::As) {
                    Some(self.expect_name()?)
                } else {
                    None
                };
                (Some(ty), name)
            };
            let body = self.block()?;
            handlers.push(ExceptHandler {
                ty,
                name,
                body,
                span: self.span_from(handler_start),
            });
        }

        let orelse = self.else_block()?;
        let finalbody = if self.eat_kw(Kw::Finally) {
            self.block()?
        } else {
            Vec::new()
        };
        if handlers.is_empty() && finalbody.is_empty() {
            return Err(self.unexpected("'except' or 'finally'"));
        }
        Ok(Stmt::new(
            StmtKind::Try {
                body,
                handlers,
                orelse,
                finalbody,
            },
            self.span_from(start),
        ))
    }

    // Expressions

    /// Comma-separated expressions, forming a tuple when there is a comma
    fn star_expressions(&mut self) -> Result<Expr> {
        let start = self.start();
        let first = self.star_expression()?;
        if !self.check_op(",") {
            return Ok(first);
        }
        let mut elts = vec![first];
        while self.eat_op(",") {
            if self.at_expression_end() {
                break;
            }
            elts.push(self.star_expression()?);
        }
        Ok(Expr::new(
            ExprKind::Tuple {
                elts,
                ctx: ExprContext::Load,
            },
            self.span_from(start),
        ))
    }

    fn at_expression_end(&self) -> bool {
        match self.peek() {
            Tok::Newline | Tok::Eof | Tok::Indent | Tok::Dedent => true,
            Tok::Op(op) => matches!(*op, ";" | "=" | ":" | ")" | "]" | "}") || AUGMENTED.contains(op),
            _ => false,
        }
    }

    fn star_expression(&mut self) -> Result<Expr> {
        if self.check_op("*") {
            self.star_or_bitwise()
        } else {
            self.expression()
        }
    }

    fn named_expression(&mut self) -> Result<Expr> {
        let start = self.start();
        let expr = self.expression()?;
        if self.check_op(":=") {
            if !matches!(expr.kind, ExprKind::Name { .. }) {
                return Err(Error::new(
                    SyntaxError::InvalidTarget(expr.node_kind().name().to_string()),
                    expr.span,
                ));
            }
            self.advance();
            let value = self.expression()?;
            return Ok(Expr::new(
                ExprKind::NamedExpr {
                    target: Box::new(to_target(expr, ExprContext::Store)?),
                    value: Box::new(value),
                },
                self.span_from(start),
            ));
        }
        Ok(expr)
    }

    /// Conditional expression or lambda
    fn expression(&mut self) -> Result<Expr> {
        self.nested(|p| {
            if p.check_kw(Kw::Lambda) {
                return p.lambda();
            }
            let start = p.start();
            let body = p.disjunction()?;
            if !p.eat_kw(Kw::If) {
                return Ok(body);
            }
            let test = p.disjunction()?;
            p.expect_kw(Kw::Else)?;
            let orelse = p.expression()?;
            Ok(Expr::new(
                ExprKind::IfExp {
                    test: Box::new(test),
                    body: Box::new(body),
                    orelse: Box::new(orelse),
                },
                p.span_from(start),
            ))
        })
    }

    fn lambda(&mut self) -> Result<Expr> {
        let start = self.start();
        self.expect_kw(Kw::Lambda)?;
        let params = self.parameters(false, ":")?;
        self.expect_op(":")?;
        let body = self.expression()?;
        Ok(Expr::new(
            ExprKind::Lambda {
                params: Box::new(params),
                body: Box::new(body),
            },
            self.span_from(start),
        ))
    }

    fn disjunction(&mut self) -> Result<Expr> {
        self.operation(OR_LEVEL)
    }

    fn bitwise_or(&mut self) -> Result<Expr> {
        self.operation(BITWISE_OR_LEVEL)
    }

    /// Operators from `or` down to `*`, by precedence climbing. Operands
    /// bind at least as tightly as `min`.
    fn operation(&mut self, min: usize) -> Result<Expr> {
        let start = self.start();
        let mut left = if min <= NOT_LEVEL && self.eat_kw(Kw::Not) {
            let operand = self.nested(|p| p.operation(NOT_LEVEL))?;
            Expr::new(
                ExprKind::UnaryOp {
                    op: UnaryOperator::Not,
                    operand: Box::new(operand),
                },
                self.span_from(start),
            )
        } else {
            self.factor()?
        };

        while let Some((level, infix)) = self.infix() {
            if level < min {
                break;
            }
            let kind = match infix {
                Infix::Bool(kw, op) => {
                    let mut values = vec![left];
                    while self.eat_kw(kw) {
                        values.push(self.operation(level + 1)?);
                    }
                    ExprKind::BoolOp { op, values }
                }
                Infix::Compare => {
                    let mut ops = Vec::new();
                    let mut comparators = Vec::new();
                    while let Some(op) = self.compare_operator() {
                        ops.push(op);
                        comparators.push(self.operation(level + 1)?);
                    }
                    ExprKind::Compare {
                        left: Box::new(left),
                        ops,
                        comparators,
                    }
                }
                Infix::Binary(op) => {
                    self.advance();
                    let right = self.operation(level + 1)?;
                    ExprKind::BinOp {
                        left: Box::new(left),
                        op,
                        right: Box::new(right),
                    }
                }
            };
            left = Expr::new(kind, self.span_from(start));
        }
        Ok(left)
    }

    /// The infix operator at the cursor and its precedence level
    fn infix(&self) -> Option<(usize, Infix)> {
        match self.peek() {
            Tok::Keyword(Kw::Or) => Some((OR_LEVEL, Infix::Bool(Kw::Or, BoolOperator::Or))),
            Tok::Keyword(Kw::And) => Some((AND_LEVEL, Infix::Bool(Kw::And, BoolOperator::And))),
            Tok::Keyword(Kw::In | Kw::Is) | Tok::Op("==" | "!=" | "<" | "<=" | ">" | ">=") => {
                Some((COMPARE_LEVEL, Infix::Compare))
            }
            Tok::Keyword(Kw::Not) if matches!(self.peek_at(1), Tok::Keyword(Kw::In)) => {
                Some((COMPARE_LEVEL, Infix::Compare))
            }
            Tok::Op(op) => {
                let offset = BINARY_LEVELS.iter().position(|ops| ops.contains(op))?;
                let binary = BinaryOperator::from_op(op)?;
                Some((BITWISE_OR_LEVEL + offset, Infix::Binary(binary)))
            }
            _ => None,
        }
    }

    fn compare_operator(&mut self) -> Option<CompareOperator> {
        let op = match self.peek() {
            Tok::Op("==") => CompareOperator::Eq,
            Tok::Op("!=") => CompareOperator::NotEq,
            Tok::Op("<") => CompareOperator::Lt,
            Tok::Op("<=") => CompareOperator::LtE,
            Tok::Op(">") => CompareOperator::Gt,
            Tok::Op(">=") => CompareOperator::GtE,
            Tok::Keyword(Kw::In) => CompareOperator::In,
            Tok::Keyword(Kw::Not) if matches!(self.peek_at(1), Tok::Keyword(Kw::In)) => {
                self.advance();
                CompareOperator::NotIn
            }
            Tok::Keyword(Kw::Is) => {
                if matches!(self.peek_at(1), Tok::Keyword(Kw::Not)) {
                    self.advance();
                    CompareOperator::IsNot
                } else {
                    CompareOperator::Is
                }
            }
            _ => return None,
        };
        self.advance();
        Some(op)
    }

    fn factor(&mut self) -> Result<Expr> {
        let start = self.start();
        let op = match self.peek() {
            Tok::Op("-") => UnaryOperator::Minus,
            Tok::Op("+") => UnaryOperator::Plus,
            Tok::Op("~") => UnaryOperator::Invert,
            _ => return self.power(),
        };
        self.advance();
        let operand = self.nested(Self::factor)?;
        Ok(Expr::new(
            ExprKind::UnaryOp {
                op,
                operand: Box::new(operand),
            },
            self.span_from(start),
        ))
    }

    fn power(&mut self) -> Result<Expr> {
        let start = self.start();
        let base = if self.eat_kw(Kw::Await) {
            let value = self.primary()?;
            Expr::new(ExprKind::Await(Box::new(value)), self.span_from(start))
        } else {
            self.primary()?
        };
        if !self.eat_op("**") {
            return Ok(base);
        }
        let exponent = self.nested(Self::factor)?;
        Ok(Expr::new(
            ExprKind::BinOp {
                left: Box::new(base),
                op: BinaryOperator::Pow,
                right: Box::new(exponent),
            },
            self.span_from(start),
        ))
    }

    fn primary(&mut self) -> Result<Expr> {
        let start = self.start();
        let mut expr = self.atom()?;
        loop {
            if self.eat_op("(") {
                let (args, keywords) = self.arguments()?;
                expr = Expr::new(
                    ExprKind::Call {
                        func: Box::new(expr),
                        args,
                        keywords,
                    },
                    self.span_from(start),
                );
            } else if self.eat_op("[") {
                let slice = self.slices()?;
                self.expect_op("]")?;
                expr = Expr::new(
                    ExprKind::Subscript {
                        value: Box::new(expr),
                        slice: Box::new(slice),
                        ctx: ExprContext::Load,
                    },
                    self.span_from(start),
                );
            } else if self.eat_op(".") {
                let attr = self.expect_name()?;
                expr = Expr::new(
                    ExprKind::Attribute {
                        value: Box::new(expr),
                        attr,
                        ctx: ExprContext::Load,
                    },
                    self.span_from(start),
                );
            } else {
                return Ok(expr);
            }
        }
    }

    /// Call arguments after `(`, consuming the closing `)`
    fn arguments(&mut self) -> Result<(Vec<Expr>, Vec<Keyword>)> {
        let mut args = Vec::new();
        let mut keywords: Vec<Keyword> = Vec::new();
        let mut seen = HashSet::new();

        while !self.check_op(")") {
            let start = self.start();
            if self.eat_op("**") {
                let value = self.expression()?;
                keywords.push(Keyword {
                    arg: None,
                    value,
                    span: self.span_from(start),
                });
            } else if self.eat_op("*") {
                let value = self.expression()?;
                args.push(Expr::new(
                    ExprKind::Starred {
                        value: Box::new(value),
                        ctx: ExprContext::Load,
                    },
                    self.span_from(start),
                ));
            } else if matches!(self.peek(), Tok::Name(_)) && matches!(self.peek_at(1), Tok::Op("="))
            {
                let name = self.expect_name()?;
                self.advance();
                let value = self.expression()?;
                if !seen.insert(name.clone()) {
                    return Err(Error::new(
                        SyntaxError::DuplicateKeyword(name),
                        self.span_from(start),
                    ));
                }
                keywords.push(Keyword {
                    arg: Some(name),
                    value,
                    span: self.span_from(start),
                });
            } else {
                let value = self.named_expression()?;
                let value = if self.check_kw(Kw::For) {
                    let generators = self.comprehension_clauses()?;
                    Expr::new(
                        ExprKind::GeneratorExp {
                            elt: Box::new(value),
                            generators,
                        },
                        self.span_from(start),
                    )
                } else {
                    value
                };
                if !keywords.is_empty() {
                    return Err(Error::new(SyntaxError::PositionalAfterKeyword, value.span));
                }
                args.push(value);
            }
            if !self.eat_op(",") {
                break;
            }
        }
        self.expect_op(")")?;
        Ok((args, keywords))
    }

    fn slices(&mut self) -> Result<Expr> {
        let start = self.start();
        let first = self.slice()?;
        if !self.check_op(",") {
            return Ok(first);
        }
        let mut elts = vec![first];
        while self.eat_op(",") {
            if self.check_op("]") {
                break;
            }
            elts.push(self.slice()?);
        }
        Ok(Expr::new(
            ExprKind::Tuple {
                elts,
                ctx: ExprContext::Load,
            },
            self.span_from(start),
        ))
    }

    fn slice(&mut self) -> Result<Expr> {
        let start = self.start();
        let lower = if self.check_op(":") {
            None
        } else {
            let expr = self.star_expression()?;
            if !self.check_op(":") {
                return Ok(expr);
            }
            Some(Box::new(expr))
        };
        self.expect_op(":")?;
        let upper = self.slice_part()?;
        let step = if self.eat_op(":") {
            self.slice_part()?
        } else {
            None
        };
        Ok(Expr::new(
            ExprKind::Slice { lower, upper, step },
            self.span_from(start),
        ))
    }

    fn slice_part(&mut self) -> Result<Option<Box<Expr>>> {
        if self.check_op(":") || self.check_op(",") || self.check_op("]") {
            Ok(None)
        } else {
            Ok(Some(Box::new(self.expression()?)))
        }
    }

    fn comprehension_clauses(&mut self) -> Result<Vec<Comprehension>> {
        let mut generators = Vec::new();
        while self.check_kw(Kw::For) {
            let start = self.start();
            self.advance();
            let target = self.target_list()?;
            self.expect_kw(Kw::In)?;
            let iter = self.disjunction()?;
            let mut ifs = Vec::new();
            while self.eat_kw(Kw::If) {
                ifs.push(self.disjunction()?);
            }
            generators.push(Comprehension {
                target,
                iter,
                ifs,
                span: self.span_from(start),
            });
        }
        Ok(generators)
    }

    fn atom(&mut self) -> Result<Expr> {
        let start = self.start();
        let token = self.current().clone();
        match token.kind {
            Tok::Name(id) => {
                self.advance();
                Ok(Expr::new(
                    ExprKind::Name {
                        id,
                        ctx: ExprContext::Load,
                    },
                    token.span,
                ))
            }
            Tok::Int(n) => {
                self.advance();
                Ok(constant(Constant::Int(n), token.span))
            }
            Tok::Float(n) => {
                self.advance();
                Ok(constant(Constant::Float(n), token.span))
            }
            Tok::Keyword(Kw::None) => {
                self.advance();
                Ok(constant(Constant::None, token.span))
            }
            Tok::Keyword(Kw::True) => {
                self.advance();
                Ok(constant(Constant::Bool(true), token.span))
            }
            Tok::Keyword(Kw::False) => {
                self.advance();
                Ok(constant(Constant::Bool(false), token.span))
            }
            Tok::Op("...") => {
                self.advance();
                Ok(constant(Constant::Ellipsis, token.span))
            }
            Tok::Str { .. } => self.strings(),
            Tok::Op("(") => {
                self.advance();
                self.nested(|p| p.parenthesized(start))
            }
            Tok::Op("[") => {
                self.advance();
                self.nested(|p| p.list_display(start))
            }
            Tok::Op("{") => {
                self.advance();
                self.nested(|p| p.brace_display(start))
            }
            _ => Err(self.unexpected("expression")),
        }
    }

    fn parenthesized(&mut self, start: Pos) -> Result<Expr> {
        if self.eat_op(")") {
            return Ok(Expr::new(
                ExprKind::Tuple {
                    elts: Vec::new(),
                    ctx: ExprContext::Load,
                },
                self.span_from(start),
            ));
        }
        if self.check_kw(Kw::Yield) {
            let value = self.yield_expression()?;
            self.expect_op(")")?;
            return Ok(value);
        }

        let first = if self.check_op("*") {
            self.star_or_bitwise()?
        } else {
            self.named_expression()?
        };

        if self.check_kw(Kw::For) {
            let generators = self.comprehension_clauses()?;
            self.expect_op(")")?;
            return Ok(Expr::new(
                ExprKind::GeneratorExp {
                    elt: Box::new(first),
                    generators,
                },
                self.span_from(start),
            ));
        }

        if self.eat_op(")") {
            // parentheses only group
            return Ok(first);
        }

        let elts = self.sequence_tail(first, ")")?;
        Ok(Expr::new(
            ExprKind::Tuple {
                elts,
                ctx: ExprContext::Load,
            },
            self.span_from(start),
        ))
    }

    /// Remaining `, item` entries of a display, consuming `closing`
    fn sequence_tail(&mut self, first: Expr, closing: &str) -> Result<Vec<Expr>> {
        let mut elts = vec![first];
        while self.eat_op(",") {
            if self.check_op(closing) {
                break;
            }
            elts.push(self.star_expression()?);
        }
        self.expect_op(closing)?;
        Ok(elts)
    }

    fn list_display(&mut self, start: Pos) -> Result<Expr> {
        if self.eat_op("]") {
            return Ok(Expr::new(
                ExprKind::List {
                    elts: Vec::new(),
                    ctx: ExprContext::Load,
                },
                self.span_from(start),
            ));
        }
        let first = self.star_expression()?;
        if self.check_kw(Kw::For) {
            let generators = self.comprehension_clauses()?;
            self.expect_op("]")?;
            return Ok(Expr::new(
                ExprKind::ListComp {
                    elt: Box::new(first),
                    generators,
                },
                self.span_from(start),
            ));
        }
        let elts = self.sequence_tail(first, "]")?;
        Ok(Expr::new(
            ExprKind::List {
                elts,
                ctx: ExprContext::Load,
            },
            self.span_from(start),
        ))
    }

    fn brace_display(&mut self, start: Pos) -> Result<Expr> {
        if self.eat_op("}") {
            return Ok(Expr::new(
                ExprKind::Dict {
                    keys: Vec::new(),
                    values: Vec::new(),
                },
                self.span_from(start),
            ));
        }

        if self.eat_op("**") {
            let value = self.bitwise_or()?;
            return self.dict_tail(start, None, value);
        }

        let first = self.star_expression()?;
        if self.eat_op(":") {
            let value = self.expression()?;
            if self.check_kw(Kw::For) {
                let generators = self.comprehension_clauses()?;
                self.expect_op("}")?;
                return Ok(Expr::new(
                    ExprKind::DictComp {
                        key: Box::new(first),
                        value: Box::new(value),
                        generators,
                    },
                    self.span_from(start),
                ));
            }
            return self.dict_tail(start, Some(first), value);
        }

        if self.check_kw(Kw::For) {
            let generators = self.comprehension_clauses()?;
            self.expect_op("}")?;
            return Ok(Expr::new(
                ExprKind::SetComp {
                    elt: Box::new(first),
                    generators,
                },
                self.span_from(start),
            ));
        }

        let elts = self.sequence_tail(first, "}")?;
        Ok(Expr::new(ExprKind::Set(elts), self.span_from(start)))
    }

    fn dict_tail(&mut self, start: Pos, key: Option<Expr>, value: Expr) -> Result<Expr> {
        let mut keys = vec![key];
        let mut values = vec![value];
        while self.eat_op(",") {
            if self.check_op("}") {
                break;
            }
            if self.eat_op("**") {
                keys.push(None);
                values.push(self.bitwise_or()?);
            } else {
                keys.push(Some(self.expression()?));
                self.expect_op(":")?;
                values.push(self.expression()?);
            }
        }
        self.expect_op("}")?;
        Ok(Expr::new(ExprKind::Dict { keys, values }, self.span_from(start)))
    }

    fn yield_expression(&mut self) -> Result<Expr> {
        let start = self.start();
        self.expect_kw(Kw::Yield)?;
        if self.eat_kw(Kw::From) {
            let value = self.expression()?;
            return Ok(Expr::new(
                ExprKind::YieldFrom(Box::new(value)),
                self.span_from(start),
            ));
        }
        let value = if self.at_expression_end() {
            None
        } else {
            Some(Box::new(self.star_expressions()?))
        };
        Ok(Expr::new(ExprKind::Yield(value), self.span_from(start)))
    }

    /// Adjacent string literals concatenate; any f-string makes the
    /// result a `JoinedStr`
    fn strings(&mut self) -> Result<Expr> {
        let start = self.start();
        let mut parts: Vec<Expr> = Vec::new();
        let mut text = String::new();
        let mut bytes: Option<Vec<u8>> = None;
        let mut formatted = false;
        let mut literal_start = start;

        while let Tok::Str { .. } = self.peek() {
            let token = self.advance();
            let Tok::Str { value, kind } = token.kind else {
                break;
            };
            match kind {
                StrKind::Bytes => {
                    if !text.is_empty() || formatted {
                        return Err(mixed_literals(token.span));
                    }
                    bytes.get_or_insert_with(Vec::new).extend_from_slice(value.as_bytes());
                }
                _ if bytes.is_some() => return Err(mixed_literals(token.span)),
                StrKind::Text => text.push_str(&value),
                StrKind::Format => {
                    formatted = true;
                    let pieces = split_format(&value)
                        .ok_or_else(|| Error::new(SyntaxError::FormatSpecTooDeep, token.span))?;
                    for piece in pieces {
                        match piece {
                            FormatPiece::Literal(literal) => text.push_str(&literal),
                            FormatPiece::Hole(hole) => {
                                if !text.is_empty() {
                                    parts.push(constant(
                                        Constant::Str(std::mem::take(&mut text)),
                                        Span::new(literal_start, token.span.end),
                                    ));
                                }
                                parts.push(self.format_hole(&hole, token.span)?);
                                literal_start = token.span.start;
                            }
                        }
                    }
                }
            }
        }

        let span = self.span_from(start);
        if let Some(bytes) = bytes {
            return Ok(constant(Constant::Bytes(bytes), span));
        }
        if !formatted {
            return Ok(constant(Constant::Str(text), span));
        }
        if !text.is_empty() {
            parts.push(constant(Constant::Str(text), Span::new(literal_start, span.end)));
        }
        Ok(Expr::new(ExprKind::JoinedStr(parts), span))
    }

    /// Parse a hole's expression, and its spec as a nested `JoinedStr`
    fn format_hole(&mut self, hole: &FormatHole, span: Span) -> Result<Expr> {
        self.nested(|p| {
            let remaining = p.config.max_depth.saturating_sub(p.depth);
            let config = ScriptConfig::new(
                if p.config.max_depth == 0 { 0 } else { remaining.max(1) },
                0,
            );
            let relocate =
                |err: Error| Error::with_message(err.kind().clone(), span, err.message());
            let mut inner = Parser::new(hole.source.trim(), config).map_err(relocate)?;
            let value = inner.star_expressions().map_err(relocate)?;
            if !matches!(inner.peek(), Tok::Newline | Tok::Eof) {
                return Err(relocate(inner.unexpected("'}'")));
            }

            let format_spec = match &hole.spec {
                Some(pieces) => {
                    let mut values = Vec::with_capacity(pieces.len());
                    for piece in pieces {
                        values.push(match piece {
                            FormatPiece::Literal(text) => {
                                constant(Constant::Str(text.clone()), span)
                            }
                            FormatPiece::Hole(inner_hole) => p.format_hole(inner_hole, span)?,
                        });
                    }
                    Some(Box::new(Expr::new(ExprKind::JoinedStr(values), span)))
                }
                None => None,
            };
            Ok(Expr::new(
                ExprKind::FormattedValue {
                    value: Box::new(value),
                    conversion: hole.conversion,
                    format_spec,
                },
                span,
            ))
        })
    }
}

fn constant(value: Constant, span: Span) -> Expr {
    Expr::new(ExprKind::Constant(value), span)
}

fn mixed_literals(span: Span) -> Error {
    Error::new(
        SyntaxError::Expected {
            expected: "bytes literal".to_string(),
            found: "text literal".to_string(),
        },
        span,
    )
}

/// Rewrite a parsed expression as an assignment or deletion target
fn to_target(expr: Expr, ctx: ExprContext) -> Result<Expr> {
    let span = expr.span;
    let kind = match expr.kind {
        ExprKind::Name { id, .. } => ExprKind::Name { id, ctx },
        ExprKind::Attribute { value, attr, .. } => ExprKind::Attribute { value, attr, ctx },
        ExprKind::Subscript { value, slice, .. } => ExprKind::Subscript { value, slice, ctx },
        ExprKind::Starred { value, .. } => ExprKind::Starred {
            value: Box::new(to_target(*value, ctx)?),
            ctx,
        },
        ExprKind::Tuple { elts, .. } => ExprKind::Tuple {
            elts: elts
                .into_iter()
                .map(|e| to_target(e, ctx))
                .collect::<Result<_>>()?,
            ctx,
        },
        ExprKind::List { elts, .. } => ExprKind::List {
            elts: elts
                .into_iter()
                .map(|e| to_target(e, ctx))
                .collect::<Result<_>>()?,
            ctx,
        },
        other => {
            let name = Expr::new(other, span).node_kind().name();
            return Err(Error::new(SyntaxError::InvalidTarget(name.to_string()), span));
        }
    };
    Ok(Expr::new(kind, span))
}

enum FormatPiece {
    Literal(String),
    Hole(FormatHole),
}

/// One `{...}` of an f-string
struct FormatHole {
    source: String,
    conversion: Option<char>,
    spec: Option<Vec<FormatPiece>>,
}

// Specs may hold holes whose own specs hold holes, and no further
const MAX_SPEC_NESTING: usize = 2;

/// Split f-string text into literal runs and `{expression}` holes.
/// `None` when format specs nest too deeply.
fn split_format(text: &str) -> Option<Vec<FormatPiece>> {
    format_pieces(&mut text.chars().peekable(), 0)
}

/// Pieces up to the end of input, or inside a spec (`nesting > 0`) up to
/// the `}` that closes it. That brace is left for the caller.
fn format_pieces(chars: &mut Peekable<Chars<'_>>, nesting: usize) -> Option<Vec<FormatPiece>> {
    let in_spec = nesting > 0;
    let mut pieces = Vec::new();
    let mut literal = String::new();
    while let Some(ch) = chars.next_if(|&c| !(in_spec && c == '}')) {
        match ch {
            '{' | '}' if !in_spec && chars.peek() == Some(&ch) => {
                chars.next();
                literal.push(ch);
            }
            '{' => {
                if !literal.is_empty() {
                    pieces.push(FormatPiece::Literal(std::mem::take(&mut literal)));
                }
                pieces.push(FormatPiece::Hole(scan_hole(chars, nesting)?));
            }
            _ => literal.push(ch),
        }
    }
    if !literal.is_empty() {
        pieces.push(FormatPiece::Literal(literal));
    }
    Some(pieces)
}

/// Read a hole after its `{`, consuming the closing `}`
fn scan_hole(chars: &mut Peekable<Chars<'_>>, nesting: usize) -> Option<FormatHole> {
    let mut hole = FormatHole {
        source: String::new(),
        conversion: None,
        spec: None,
    };
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut has_spec = false;

    while let Some(ch) = chars.next() {
        if let Some(q) = quote {
            hole.source.push(ch);
            if ch == q {
                quote = None;
            }
            continue;
        }
        match ch {
            '\'' | '"' => {
                quote = Some(ch);
                hole.source.push(ch);
            }
            '(' | '[' | '{' => {
                depth += 1;
                hole.source.push(ch);
            }
            ')' | ']' | '}' if depth > 0 => {
                depth -= 1;
                hole.source.push(ch);
            }
            '}' => break,
            // `!=` stays in the expression
            '!' if depth == 0 && chars.peek() != Some(&'=') => {
                hole.conversion = chars.next_if(char::is_ascii_alphabetic);
                has_spec = chars.next() == Some(':');
                break;
            }
            ':' if depth == 0 => {
                has_spec = true;
                break;
            }
            _ => hole.source.push(ch),
        }
    }

    if has_spec {
        if nesting >= MAX_SPEC_NESTING {
            return None;
        }
        hole.spec = Some(format_pieces(chars, nesting + 1)?);
        chars.next();
    }
    Some(hole)
}

/// Parse script text with default limits
pub fn parse(input: &str) -> Result<Module> {
    parse_with_config(input, ScriptConfig::default())
}

/// Parse script text with custom limits
pub fn parse_with_config(input: &str, config: ScriptConfig) -> Result<Module> {
    Parser::new(input, config)?.parse_module()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn single(input: &str) -> Result<StmtKind> {
        let module = parse(input)?;
        assert_eq!(module.body.len(), 1, "expected one statement in {input:?}");
        Ok(module.body.into_iter().next().map(|s| s.kind).unwrap_or(StmtKind::Pass))
    }

    fn syntax_error(input: &str) -> Option<SyntaxError> {
        match parse(input).err()?.kind() {
            ErrorKind::Syntax(err) => Some(err.clone()),
            _ => None,
        }
    }

    #[test]
    fn test_call_with_keywords() -> Result<()> {
        let StmtKind::Expr(expr) = single("Note(Pitch('C', octave=4), duration=4)")? else {
            panic!("expected expression statement");
        };
        let ExprKind::Call { func, args, keywords } = expr.kind else {
            panic!("expected call");
        };
        assert!(matches!(func.kind, ExprKind::Name { ref id, .. } if id == "Note"));
        assert_eq!(args.len(), 1);
        assert_eq!(keywords.len(), 1);
        assert_eq!(keywords.first().and_then(|k| k.arg.as_deref()), Some("duration"));
        Ok(())
    }

    #[test]
    fn test_with_block_and_target() -> Result<()> {
        let StmtKind::With { items, body } = single("with Part(id='P1') as p:\n    Measure()\n    pass\n")? else {
            panic!("expected with");
        };
        assert_eq!(items.len(), 1);
        let target = items.first().and_then(|i| i.target.as_ref()).map(|t| &t.kind);
        assert!(matches!(
            target,
            Some(ExprKind::Name {
                ctx: ExprContext::Store,
                ..
            })
        ));
        assert_eq!(body.len(), 2);
        Ok(())
    }

    #[test]
    fn test_negative_literal_is_unary_minus() -> Result<()> {
        let StmtKind::Expr(expr) = single("-1")? else {
            panic!("expected expression statement");
        };
        assert!(matches!(
            expr.kind,
            ExprKind::UnaryOp {
                op: UnaryOperator::Minus,
                ..
            }
        ));
        Ok(())
    }

    #[test]
    fn test_disallowed_constructs_still_parse() -> Result<()> {
        let script = "\
import os
from a.b import (c, d as e,)
for i in range(3):
    x = i ** 2
else:
    pass
while not done:
    break
def f(a, b=1, *args, c, **kw) -> int:
    return [i for i in a if i]
class K(Base, metaclass=M):
    y: int = 3
try:
    raise E from None
except (A, B) as err:
    del x[0], y.z
finally:
    assert x, 'msg'
lambda q: q if q else {1: 2, **m}
x += 1; y = z = (1, *w)
print(f'{a!r:>4} and {{b}}')
";
        let module = parse(script)?;
        assert_eq!(module.body.len(), 11);
        Ok(())
    }

    #[test]
    fn test_tuple_and_subscripts() -> Result<()> {
        let StmtKind::Expr(expr) = single("a[1:2, ::3], (1,), ()")? else {
            panic!("expected expression statement");
        };
        let ExprKind::Tuple { elts, .. } = expr.kind else {
            panic!("expected tuple");
        };
        assert_eq!(elts.len(), 3);
        Ok(())
    }

    #[test]
    fn test_fstring_holes_become_expressions() -> Result<()> {
        let StmtKind::Expr(expr) = single("f'x{print(1)}y'")? else {
            panic!("expected expression statement");
        };
        let ExprKind::JoinedStr(parts) = expr.kind else {
            panic!("expected joined string");
        };
        assert_eq!(parts.len(), 3);
        assert!(parts
            .iter()
            .any(|p| matches!(p.kind, ExprKind::FormattedValue { .. })));
        Ok(())
    }

    #[test]
    fn test_fstring_conversion_and_nested_spec() -> Result<()> {
        let StmtKind::Expr(expr) = single("f'{a!r:>{w}}'")? else {
            panic!("expected expression statement");
        };
        let ExprKind::JoinedStr(parts) = expr.kind else {
            panic!("expected joined string");
        };
        let Some(ExprKind::FormattedValue {
            conversion,
            format_spec: Some(spec),
            ..
        }) = parts.first().map(|p| &p.kind)
        else {
            panic!("expected formatted value with a spec");
        };
        assert_eq!(*conversion, Some('r'));
        let ExprKind::JoinedStr(spec) = &spec.kind else {
            panic!("expected spec to be a joined string");
        };
        assert_eq!(spec.len(), 2);
        assert_eq!(
            spec.first().map(|p| &p.kind),
            Some(&ExprKind::Constant(Constant::Str(">".to_string())))
        );
        assert!(matches!(
            spec.get(1).map(|p| &p.kind),
            Some(ExprKind::FormattedValue { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_fstring_not_equal_is_a_comparison() -> Result<()> {
        let StmtKind::Expr(expr) = single("f'{a != b}'")? else {
            panic!("expected expression statement");
        };
        let ExprKind::JoinedStr(parts) = expr.kind else {
            panic!("expected joined string");
        };
        let Some(ExprKind::FormattedValue {
            value, conversion, ..
        }) = parts.first().map(|p| &p.kind)
        else {
            panic!("expected formatted value");
        };
        assert_eq!(*conversion, None);
        assert!(matches!(
            &value.kind,
            ExprKind::Compare { ops, .. } if ops == &[CompareOperator::NotEq]
        ));
        Ok(())
    }

    #[test]
    fn test_fstring_spec_nesting_limit() {
        assert!(parse("f'{a:{b:{c}}}'").is_ok());
        assert_eq!(
            syntax_error("f'{a:{b:{c:{d}}}}'"),
            Some(SyntaxError::FormatSpecTooDeep)
        );
    }

    #[test]
    fn test_operator_precedence() -> Result<()> {
        let StmtKind::Expr(expr) = single("not a == b and c or d | e * f")? else {
            panic!("expected expression statement");
        };
        let ExprKind::BoolOp {
            op: BoolOperator::Or,
            values,
        } = expr.kind
        else {
            panic!("expected `or` at the top");
        };
        assert_eq!(values.len(), 2);
        let Some(ExprKind::BoolOp {
            op: BoolOperator::And,
            values: conjuncts,
        }) = values.first().map(|v| &v.kind)
        else {
            panic!("expected `and` on the left");
        };
        assert!(matches!(
            conjuncts.first().map(|v| &v.kind),
            Some(ExprKind::UnaryOp {
                op: UnaryOperator::Not,
                operand,
            }) if matches!(operand.kind, ExprKind::Compare { .. })
        ));
        let Some(ExprKind::BinOp {
            op: BinaryOperator::BitOr,
            right,
            ..
        }) = values.get(1).map(|v| &v.kind)
        else {
            panic!("expected `|` on the right");
        };
        assert!(matches!(
            right.kind,
            ExprKind::BinOp {
                op: BinaryOperator::Mult,
                ..
            }
        ));
        Ok(())
    }

    #[test]
    fn test_binary_operators_associate_left() -> Result<()> {
        let StmtKind::Expr(expr) = single("a - b - c")? else {
            panic!("expected expression statement");
        };
        let ExprKind::BinOp { left, right, .. } = expr.kind else {
            panic!("expected binary operation");
        };
        assert!(matches!(left.kind, ExprKind::BinOp { .. }));
        assert!(matches!(right.kind, ExprKind::Name { ref id, .. } if id == "c"));
        Ok(())
    }

    #[test]
    fn test_string_concatenation() -> Result<()> {
        let StmtKind::Expr(expr) = single("'a' \"b\"")? else {
            panic!("expected expression statement");
        };
        assert_eq!(expr.kind, ExprKind::Constant(Constant::Str("ab".to_string())));
        Ok(())
    }

    #[test]
    fn test_duplicate_keyword_is_syntax_error() {
        assert_eq!(
            syntax_error("Note(a=1, a=2)"),
            Some(SyntaxError::DuplicateKeyword("a".to_string()))
        );
    }

    #[test]
    fn test_positional_after_keyword() {
        assert_eq!(
            syntax_error("Note(a=1, 2)"),
            Some(SyntaxError::PositionalAfterKeyword)
        );
    }

    #[test]
    fn test_invalid_assignment_target() {
        assert!(matches!(
            syntax_error("Note() = 1"),
            Some(SyntaxError::InvalidTarget(_))
        ));
    }

    #[test]
    fn test_missing_block() {
        assert!(parse("with A():\nB()\n").is_err());
        assert!(parse("with A()\n    B()\n").is_err());
    }

    #[test]
    fn test_unclosed_bracket() {
        assert!(parse("Note(1, 2").is_err());
    }

    #[test]
    fn test_depth_limit() {
        let config = ScriptConfig::new(8, 0);
        let deep = format!("{}1{}", "(".repeat(20), ")".repeat(20));
        let err = parse_with_config(&deep, config).err();
        assert!(matches!(
            err.as_ref().map(Error::kind),
            Some(ErrorKind::Security(SecurityError::MaxDepthExceeded { max: 8 }))
        ));
        assert!(parse_with_config("((1))", config).is_ok());
    }

    #[test]
    fn test_size_limit() {
        let config = ScriptConfig::new(0, 10);
        let err = parse_with_config("Note(duration=4)", config).err();
        assert!(matches!(
            err.as_ref().map(Error::kind),
            Some(ErrorKind::Security(SecurityError::MaxSizeExceeded { max: 10 }))
        ));
    }

    #[test]
    fn test_empty_script() -> Result<()> {
        assert!(parse("")?.body.is_empty());
        assert!(parse("\n# only a comment\n")?.body.is_empty());
        Ok(())
    }

    #[test]
    fn test_spans_point_at_source() -> Result<()> {
        let module = parse("\n\nNote()\n")?;
        let span = module.body.first().map(|s| s.span).unwrap_or_default();
        assert_eq!(span.start.line, 3);
        assert_eq!(span.start.col, 1);
        Ok(())
    }
}
