/// Errors raised while parsing paths or navigating and mutating documents.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum JsonError {
    /// A path contains a character outside the permitted set.
    #[error("invalid character {ch:?} at offset {offset} in path {path:?}")]
    InvalidCharacter {
        path: String,
        ch: char,
        offset: usize,
    },

    /// A `[` without a matching `]`, or a stray `]`.
    #[error("unmatched bracket at offset {offset} in path {path:?}")]
    UnmatchedBracket { path: String, offset: usize },

    /// Two unescaped dots in a row.
    #[error("consecutive dots at offset {offset} in path {path:?}")]
    ConsecutiveDots { path: String, offset: usize },

    /// A path ending in a lone backslash.
    #[error("dangling escape at the end of path {path:?}")]
    DanglingEscape { path: String },

    #[error("negative array index {index} in path {path:?}")]
    NegativeIndex { path: String, index: String },

    /// Bracket contents that are neither a number, `*`, nor empty.
    #[error("could not parse array index {index:?} in path {path:?}")]
    InvalidIndex { path: String, index: String },

    /// Attempted to navigate below a string, number or bool.
    #[error("attempt to key into primitive {kind} with {segment}")]
    KeyIntoPrimitive { kind: &'static str, segment: String },

    /// A field name was used to navigate an array.
    #[error("expected an array index but got field {segment:?}")]
    ArrayWithoutIndex { segment: String },

    /// An index or wildcard was used to navigate a container.
    #[error("expected a field name but got {segment} on a container")]
    ContainerWithIndex { segment: String },

    /// `[]` in a read, or `[*]` in a write.
    #[error("{segment} is not allowed when {context} a field")]
    MisplacedSegment {
        segment: String,
        context: &'static str,
    },

    /// Merging would discard data already present in the destination.
    #[error("merge would overwrite existing {dest} with {src}")]
    MergeOverwrite { src: String, dest: String },

    /// Merging two values whose shapes cannot be combined.
    #[error("cannot merge {src} into {dest}")]
    MergeMismatch {
        src: &'static str,
        dest: &'static str,
    },

    /// Document text could not be parsed or produced.
    #[error("json: {0}")]
    Serde(String),
}

impl From<serde_json::Error> for JsonError {
    fn from(e: serde_json::Error) -> Self {
        JsonError::Serde(e.to_string())
    }
}

/// Contract violations in the use of [`crate::Promise`] and [`crate::Versions`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParallelError {
    #[error("double set of promise")]
    DoubleSet,

    #[error("versions are locked; cannot add version {id}")]
    Locked { id: i64 },

    #[error("version id must be non-negative, got {id}")]
    NegativeId { id: i64 },

    #[error("version {id} already exists")]
    DuplicateId { id: i64 },

    #[error("version {id} does not exist")]
    MissingVersion { id: i64 },

    /// Only a pending version can be skipped.
    #[error("version {id} is not a promise")]
    NotAPromise { id: i64 },
}
