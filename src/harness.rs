//! Execution harness: vet a script, then drive a builder with it
//!
//! Scripts only ever reach the interpreter after the sandbox accepted
//! them, and the interpreter itself only understands the accepted subset.
//! The only names a script can see are the ones in its [`Scope`].

mod scope;

use std::sync::Arc;

use tracing::{debug, info, instrument};

use crate::builder::{Builder, BuilderConfig, Diagnostic, Document, ScopeToken};
use crate::catalogue::{Catalogue, TypeId};
use crate::error::{Error, Result, Span, UsageError};
use crate::sandbox::{self, Verdict};
use crate::schema::SchemaRegistry;
use crate::script::{
    self, Constant, Expr, ExprKind, Keyword, Module, ScriptConfig, Stmt, StmtKind,
    UnaryOperator, WithItem,
};
use crate::value::{ArgumentBundle, Value};

pub use scope::{Scope, HELPER};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HarnessConfig {
    pub script: ScriptConfig,
    pub builder: BuilderConfig,
}

/// Result of a successful run
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Output {
    pub document: Document,
    pub diagnostics: Vec<Diagnostic>,
}

impl Output {
    /// Header plus indented tree
    pub fn to_xml(&self) -> String {
        self.document.to_xml()
    }
}

/// Runs scripts against one catalogue and schema registry.
/// Each run gets its own builder; the registry cache is shared.
#[derive(Clone, Debug)]
pub struct Harness {
    catalogue: Arc<Catalogue>,
    registry: Arc<SchemaRegistry>,
    config: HarnessConfig,
}

impl Harness {
    pub fn new(
        catalogue: Arc<Catalogue>,
        registry: Arc<SchemaRegistry>,
        config: HarnessConfig,
    ) -> Self {
        Self {
            catalogue,
            registry,
            config,
        }
    }

    /// Harness over the embedded catalogue and master schema
    pub fn with_defaults() -> Result<Self> {
        Ok(Self::new(
            Arc::new(Catalogue::load_default()?),
            Arc::new(SchemaRegistry::load_default()?),
            HarnessConfig::default(),
        ))
    }

    #[must_use]
    pub fn with_config(mut self, config: HarnessConfig) -> Self {
        self.config = config;
        self
    }

    pub fn catalogue(&self) -> &Arc<Catalogue> {
        &self.catalogue
    }

    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    pub const fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Sandbox verdict under this harness's limits
    pub fn check(&self, script: &str) -> Result<Verdict> {
        sandbox::check_with_config(script, self.config.script)
    }

    /// Check and execute a script, returning the finished document
    #[instrument(skip_all, fields(bytes = script.len()))]
    pub fn run(&self, script: &str) -> Result<Output> {
        let module = script::parse_with_config(script, self.config.script)?;
        self.run_module(&module)
    }

    /// Check and execute an already parsed script
    pub fn run_module(&self, module: &Module) -> Result<Output> {
        sandbox::check_module(module).into_result()?;
        info!(statements = module.body.len(), "script accepted");

        let builder = Builder::new(
            Arc::clone(&self.catalogue),
            Arc::clone(&self.registry),
            self.config.builder,
        );
        let mut interpreter = Interpreter {
            scope: Scope::new(&self.catalogue),
            catalogue: &self.catalogue,
            builder,
        };
        interpreter.exec_body(&module.body)?;

        let (document, diagnostics) = interpreter.builder.finish()?;
        Ok(Output {
            document,
            diagnostics,
        })
    }
}

// A scope opened by a `with` item and the names it bound
struct OpenScope {
    token: ScopeToken,
    injected: Vec<(String, TypeId)>,
}

struct Interpreter<'h> {
    catalogue: &'h Catalogue,
    scope: Scope,
    builder: Builder,
}

impl Interpreter<'_> {
    fn exec_body(&mut self, body: &[Stmt]) -> Result<()> {
        body.iter().try_for_each(|stmt| self.exec(stmt))
    }

    fn exec(&mut self, stmt: &Stmt) -> Result<()> {
        match &stmt.kind {
            StmtKind::Expr(expr) => self.eval(expr).map(drop),
            StmtKind::With { items, body } => self.exec_with(items, body),
            StmtKind::Pass => Ok(()),
            _ => Err(unsupported(stmt.node_kind().name(), stmt.span)),
        }
    }

    /// Open every item in order, run the body, close in reverse
    fn exec_with(&mut self, items: &[WithItem], body: &[Stmt]) -> Result<()> {
        let mut open = Vec::with_capacity(items.len());
        for item in items {
            open.push(self.enter(item)?);
        }
        self.exec_body(body)?;
        while let Some(OpenScope { token, injected }) = open.pop() {
            self.builder.close(token)?;
            for (name, ty) in injected {
                self.scope.eject(&name, ty);
            }
        }
        Ok(())
    }

    fn enter(&mut self, item: &WithItem) -> Result<OpenScope> {
        let ExprKind::Call {
            func,
            args,
            keywords,
        } = &item.context.kind
        else {
            let found = self.eval(&item.context)?;
            return Err(Error::new(
                UsageError::NotAScope(found.kind_name().to_string()),
                item.span,
            ));
        };
        let ty = match self.eval(func)? {
            Value::Type(ty) => ty,
            other => {
                return Err(Error::new(
                    UsageError::NotAScope(other.kind_name().to_string()),
                    item.span,
                ))
            }
        };
        let bundle = self.arguments(args, keywords)?;
        let token = self
            .builder
            .open(ty, bundle, item.context.span)
            .map_err(|e| e.or_span(item.span))?;

        let mut injected = Vec::new();
        for (name, nested) in self.builder.scope_names(&token)? {
            if self.scope.inject(&name, nested) {
                injected.push((name, nested));
            }
        }
        debug!(injected = injected.len(), "entered scope");

        match item.target.as_ref().map(|target| &target.kind) {
            None => {}
            Some(ExprKind::Name { id, .. }) => {
                let tag = self.catalogue.element(ty)?.tag.clone();
                self.scope.bind(id.as_str(), Value::Element(tag));
            }
            Some(_) => return Err(unsupported("with target", item.span)),
        }
        Ok(OpenScope { token, injected })
    }

    fn eval(&mut self, expr: &Expr) -> Result<Value> {
        match &expr.kind {
            ExprKind::Constant(constant) => constant_value(constant, expr.span),
            ExprKind::Name { id, .. } => self.scope.get(id).cloned().ok_or_else(|| {
                Error::new(UsageError::UnknownName(id.clone()), expr.span)
            }),
            ExprKind::Tuple { elts, .. } => elts
                .iter()
                .map(|e| self.eval(e))
                .collect::<Result<_>>()
                .map(Value::Tuple),
            ExprKind::UnaryOp {
                op: UnaryOperator::Minus,
                operand,
            } => negate(self.eval(operand)?, expr.span),
            ExprKind::Call {
                func,
                args,
                keywords,
            } => self.call(func, args, keywords, expr.span),
            _ => Err(unsupported(expr.node_kind().name(), expr.span)),
        }
    }

    fn call(&mut self, func: &Expr, args: &[Expr], keywords: &[Keyword], span: Span) -> Result<Value> {
        match self.eval(func)? {
            Value::Type(ty) => {
                let bundle = self.arguments(args, keywords)?;
                self.builder
                    .create(ty, bundle, span)
                    .map_err(|e| e.or_span(span))?;
                Ok(Value::Element(self.catalogue.element(ty)?.tag.clone()))
            }
            Value::Helper => Ok(Value::Bundle(self.arguments(args, keywords)?)),
            _ => Err(Error::new(
                UsageError::NotCallable(sandbox::callable_name(func)),
                span,
            )),
        }
    }

    fn arguments(&mut self, args: &[Expr], keywords: &[Keyword]) -> Result<ArgumentBundle> {
        let mut bundle = ArgumentBundle::new();
        for arg in args {
            bundle.args.push(self.eval(arg)?);
        }
        for keyword in keywords {
            let Some(name) = &keyword.arg else {
                return Err(unsupported("** arguments", keyword.span));
            };
            let value = self.eval(&keyword.value)?;
            bundle.kwargs.push((name.clone(), value));
        }
        Ok(bundle)
    }
}

fn unsupported(what: &str, span: Span) -> Error {
    Error::new(UsageError::Unsupported(what.to_string()), span)
}

fn constant_value(constant: &Constant, span: Span) -> Result<Value> {
    Ok(match constant {
        Constant::None => Value::None,
        Constant::Bool(b) => Value::Bool(*b),
        Constant::Int(n) => Value::Int(*n),
        Constant::Float(x) => Value::Float(*x),
        Constant::Str(s) => Value::Str(s.clone()),
        Constant::Bytes(b) => Value::Bytes(b.clone()),
        Constant::Ellipsis => return Err(unsupported("...", span)),
    })
}

fn negate(value: Value, span: Span) -> Result<Value> {
    match value {
        Value::Int(n) => n.checked_neg().map(Value::Int).ok_or_else(|| {
            Error::new(UsageError::BadOperand(format!("-({n})")), span)
        }),
        Value::Float(x) => Ok(Value::Float(-x)),
        Value::Bool(b) => Ok(Value::Int(-i64::from(b))),
        other => Err(Error::new(
            UsageError::BadOperand(other.kind_name().to_string()),
            span,
        )),
    }
}
