//! whistle-ir: the compiled form of a Whistle mapping program.
//!
//! The compiler emits a [`MappingConfig`]; the engine evaluates it. The
//! types are plain serde data so a compiled program can be stored and
//! reloaded.

pub mod types;

pub use types::*;
