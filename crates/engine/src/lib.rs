//! whistle-engine: evaluates a compiled [`MappingConfig`] against JSON
//! documents.
//!
//! - [`registry`]: projector lookup (built-ins and user definitions)
//! - [`Transformer`]: root mappings, top-level objects, post-processing
//! - [`error`]: the [`EngineError`] chain
//!
//! Projector bodies run sequentially by default. With
//! [`EngineOptions::parallel`] each mapping of a body runs on its own
//! scoped thread, ordered through per-field version ledgers, and the
//! result is identical to sequential evaluation.

mod builtins;
mod context;
pub mod error;
mod mapping;
mod parallel;
pub mod registry;
mod transform;

use serde::{Deserialize, Serialize};

pub use error::EngineError;
pub use registry::{BuiltinFn, Projector, Registry};
pub use transform::{Transformer, ROOT_PROJECTOR};
pub use whistle_ir::MappingConfig;

/// Default bound on nested projector calls.
pub const DEFAULT_MAX_STACK_DEPTH: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineOptions {
    /// Evaluate the mappings of each projector body concurrently.
    pub parallel: bool,
    /// Nested projector calls allowed before failing with
    /// [`EngineError::StackDepthExceeded`].
    pub max_stack_depth: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        EngineOptions {
            parallel: false,
            max_stack_depth: DEFAULT_MAX_STACK_DEPTH,
        }
    }
}
