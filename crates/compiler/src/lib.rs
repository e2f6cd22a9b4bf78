//! whistle-compiler: turns a Whistle parse tree into a [`MappingConfig`].
//!
//! - [`tree`]: the parse-tree node kinds a front end hands over
//! - [`env`]: lexical scopes with parent-input forwarding
//! - [`stack`]: per-scope condition stacks
//! - [`compile()`]: the tree walk itself
//!
//! Compilation is single-threaded and stops at the first [`CompileError`].

mod call;
mod compiler;
pub mod env;
pub mod error;
pub mod stack;
pub mod tree;

pub use call::project;
pub use compiler::{compile, CompileOptions, ROOT_INPUT_NAME};
pub use error::{CompileError, CompileErrorKind};
pub use whistle_ir::MappingConfig;
