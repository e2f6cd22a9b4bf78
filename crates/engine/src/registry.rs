//! Projector lookup.
//!
//! A [`Registry`] is built once per transformer: the built-ins first, then
//! every projector the program defines. It is immutable while a transform
//! runs, so parallel workers share it by reference.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use whistle_ir::ProjectorDefinition;
use whistle_json::Value;

use crate::builtins;
use crate::error::EngineError;

/// Signature of a built-in projector.
pub type BuiltinFn = fn(&[Value]) -> Result<Value, EngineError>;

#[derive(Clone)]
pub enum Projector {
    /// The empty projector name: returns its first argument.
    Identity,
    Builtin(BuiltinFn),
    Definition(Arc<ProjectorDefinition>),
}

impl fmt::Debug for Projector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Projector::Identity => f.write_str("Identity"),
            Projector::Builtin(_) => f.write_str("Builtin(..)"),
            Projector::Definition(def) => f.debug_tuple("Definition").field(&def.name).finish(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Registry {
    projectors: HashMap<String, Projector>,
}

impl Registry {
    /// An empty registry. Only the identity projector resolves.
    pub fn new() -> Self {
        Registry::default()
    }

    /// A registry holding every built-in.
    pub fn with_builtins() -> Self {
        let mut registry = Registry::new();
        for (name, f) in builtins::BUILTINS {
            registry
                .projectors
                .insert((*name).to_string(), Projector::Builtin(*f));
        }
        registry
    }

    pub fn register_builtin(&mut self, name: &str, f: BuiltinFn) -> Result<(), EngineError> {
        self.insert(name, Projector::Builtin(f))
    }

    /// Registers a user-defined projector under its own name.
    pub fn register(&mut self, definition: ProjectorDefinition) -> Result<(), EngineError> {
        let name = definition.name.clone();
        self.insert(&name, Projector::Definition(Arc::new(definition)))
    }

    pub fn register_all(
        &mut self,
        definitions: impl IntoIterator<Item = ProjectorDefinition>,
    ) -> Result<(), EngineError> {
        definitions.into_iter().try_for_each(|d| self.register(d))
    }

    fn insert(&mut self, name: &str, projector: Projector) -> Result<(), EngineError> {
        if name.is_empty() || self.projectors.contains_key(name) {
            return Err(EngineError::DuplicateProjector {
                name: name.to_string(),
            });
        }
        tracing::trace!(projector = name, "registered projector");
        self.projectors.insert(name.to_string(), projector);
        Ok(())
    }

    pub fn find(&self, name: &str) -> Result<Projector, EngineError> {
        if name.is_empty() {
            return Ok(Projector::Identity);
        }
        self.projectors
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::UnknownProjector {
                name: name.to_string(),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        name.is_empty() || self.projectors.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.projectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.projectors.is_empty()
    }
}
