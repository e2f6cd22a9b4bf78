//! whistle-json: the document layer shared by the Whistle compiler and engine.
//!
//! - [`path`]: dot/bracket field addresses (`a.b[3]`, `[*]`, `[]`, `\.` escapes)
//! - [`value`]: the [`Value`] document type and its JSON text form
//! - [`access`]: get/set/merge by path
//! - [`hash`]: structural digests, optionally ignoring array order
//! - [`parallel`]: [`Promise`] and the [`Versions`] ledger
//! - [`meta`]: an arena view of a document with parent links

pub mod access;
pub mod error;
pub mod hash;
pub mod meta;
pub mod parallel;
pub mod path;
pub mod value;

pub use access::{get_field, get_segmented, merge, set_field, set_segmented};
pub use error::{JsonError, ParallelError};
pub use hash::{hash, hash_hex, unordered_equal, Digest};
pub use meta::{MetaKind, MetaNode, MetaTree, NodeId};
pub use parallel::{Promise, Versioned, Versions};
pub use path::{format_path, is_index, join_path, segment_path, Segment};
pub use value::Value;
