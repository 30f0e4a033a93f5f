//! zscore: sandboxed score scripts that build schema-validated MusicXML
//!
//! A script is a small declarative program made of element constructor
//! calls and nested `with` blocks. Before anything runs, the script is
//! parsed and checked against a syntax allow-list; accepted scripts are
//! interpreted against a [`Builder`] that assembles the element tree,
//! keeps children in canonical order and validates every subtree against
//! the master schema as it goes.
//!
//! # Quick Start
//!
//! ```
//! # fn main() -> Result<(), zscore::Error> {
//! let script = "\
//! with Pitch():
//!     Octave(4)
//!     Step('C')
//! ";
//! let output = zscore::run(script)?;
//! assert_eq!(
//!     output.document.root().to_string(),
//!     "<pitch>\n  <step>C</step>\n  <octave>4</octave>\n</pitch>"
//! );
//!
//! let verdict = zscore::check("import os\n")?;
//! assert!(!verdict.accepted);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]

pub mod error;
pub use error::{Error, ErrorKind, Pos, Result, Span};

pub mod lexer;
pub mod naming;

pub mod json;
pub use json::Config as JsonConfig;

pub mod script;
pub use script::ScriptConfig;

pub mod sandbox;
pub use sandbox::Verdict;

pub mod catalogue;
pub use catalogue::{Catalogue, ElementType, Field, TypeId};

pub mod schema;
pub use schema::{MasterSchema, SchemaRegistry, ValidationMode, Violation, ViolationKind};

pub mod node;
pub use node::ElementNode;

pub mod value;
pub use value::{ArgumentBundle, Value};

pub mod builder;
pub use builder::{Builder, BuilderConfig, Diagnostic, Document, ScopeToken};

pub mod harness;
pub use harness::{Harness, HarnessConfig, Output};

pub mod xml;

use tracing::{debug, instrument};

/// Check and run a script against the embedded catalogue and schema
pub fn run(script: &str) -> Result<Output> {
    Harness::with_defaults()?.run(script)
}

/// Sandbox verdict for a script, with default limits
pub fn check(script: &str) -> Result<Verdict> {
    sandbox::check(script)
}

/// Read a text file, mapping failures into [`ErrorKind::Io`]
#[instrument]
pub fn load_file(path: &str) -> Result<String> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| Error::bare(ErrorKind::Io(format!("{path}: {e}"))))?;
    debug!(bytes = text.len(), "file read");
    Ok(text)
}
