//! Lazily compiled, cached validators keyed by tag

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, error, warn};

use crate::error::{Error, Result, SchemaError};
use crate::schema::{CompiledSchema, MasterSchema};

/// Cache of per-tag validators over one master schema
///
/// A tag whose validator cannot be built is cached as `None`; validation
/// for it is skipped from then on. Shareable across runs behind an `Arc`.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    master: Option<Arc<MasterSchema>>,
    cache: RwLock<HashMap<String, Option<Arc<CompiledSchema>>>>,
}

impl SchemaRegistry {
    pub fn new(master: MasterSchema) -> Self {
        Self {
            master: Some(Arc::new(master)),
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Registry without a master schema; every lookup yields `None`
    pub fn unavailable() -> Self {
        Self::default()
    }

    /// Registry over the embedded master schema
    pub fn load_default() -> Result<Self> {
        Ok(Self::new(MasterSchema::load_default()?))
    }

    /// Registry over master-schema text. Unreadable text leaves the
    /// registry unavailable rather than failing.
    pub fn load(text: &str) -> Self {
        match MasterSchema::from_json(text) {
            Ok(master) => Self::new(master),
            Err(err) => {
                error!("failed to load master schema: {err}");
                Self::unavailable()
            }
        }
    }

    pub fn is_available(&self) -> bool {
        self.master.is_some()
    }

    pub fn master(&self) -> Option<&Arc<MasterSchema>> {
        self.master.as_ref()
    }

    /// Validator for documents rooted at `tag`, compiled on first use
    pub fn get(&self, tag: &str) -> Option<Arc<CompiledSchema>> {
        if let Some(cached) = self.cache.read().get(tag) {
            return cached.clone();
        }

        let mut cache = self.cache.write();
        // another caller may have compiled it between the two locks
        if let Some(cached) = cache.get(tag) {
            return cached.clone();
        }
        let compiled = match self.compile(tag) {
            Ok(schema) => {
                debug!(tag, "compiled validator");
                Some(Arc::new(schema))
            }
            Err(err) => {
                warn!(tag, "no validation available: {err}");
                None
            }
        };
        cache.insert(tag.to_string(), compiled.clone());
        compiled
    }

    /// Number of tags looked up so far, including failures
    pub fn cached(&self) -> usize {
        self.cache.read().len()
    }

    fn compile(&self, tag: &str) -> Result<CompiledSchema> {
        let master = self
            .master
            .as_ref()
            .ok_or_else(|| Error::bare(SchemaError::Unavailable))?;
        CompiledSchema::compile(master, tag)
    }
}
