use whistle_json::{JsonError, ParallelError};

/// Errors raised while evaluating a mapping program.
///
/// Failures inside a projector body are wrapped in [`EngineError::Mapping`]
/// at every level, so the message of a nested failure reads outermost first.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Json(#[from] JsonError),

    #[error(transparent)]
    Parallel(#[from] ParallelError),

    #[error("projector {name:?} is not registered")]
    UnknownProjector { name: String },

    #[error("projector {name:?} is already registered")]
    DuplicateProjector { name: String },

    #[error("from_input.arg {arg} is out of range, must be within [1, {len}]")]
    ArgOutOfRange { arg: usize, len: usize },

    #[error("attempted to access undefined var {name}")]
    UndefinedVar { name: String },

    #[error("no valid var accessor specified ({path:?} is not valid)")]
    InvalidVarAccessor { path: String },

    #[error("condition returned unexpected type {got} (expected bool)")]
    ConditionNotBool { got: &'static str },

    #[error("can't iterate non-array {got} (argument {position} of the call)")]
    IterateNonArray { position: usize, got: &'static str },

    #[error("can't zip arrays of different sizes together (argument {base} had {expected} items, but argument {position} had {got})")]
    ZipLengthMismatch {
        base: usize,
        expected: usize,
        position: usize,
        got: usize,
    },

    #[error("stack depth exceeded {max}: too many recursive projector calls; most frequently recurring projectors:\n{counts}")]
    StackDepthExceeded { max: usize, counts: String },

    #[error("expected {expected} arguments, got {got}")]
    ArgCount { expected: String, got: usize },

    #[error("argument {position}: got {got}, expected {expected}")]
    ArgType {
        position: usize,
        expected: &'static str,
        got: &'static str,
    },

    /// A built-in rejected its (well-typed) input.
    #[error("{0}")]
    Builtin(String),

    #[error("error calling {name}: {cause}")]
    Projector { name: String, cause: Box<EngineError> },

    #[error("error evaluating condition: {0}")]
    Condition(Box<EngineError>),

    #[error("could not write {target}: {cause}")]
    Write { target: String, cause: Box<EngineError> },

    #[error("error processing field mapping {index} in projector {projector}: {cause}")]
    Mapping {
        index: usize,
        projector: String,
        cause: Box<EngineError>,
    },

    #[error("post_process projector {name:?} not found")]
    PostProcessNotFound { name: String },

    #[error("attempt to merge root mappings with top-level objects failed: {0}")]
    TopLevelMerge(JsonError),

    #[error("worker evaluating field mapping {index} panicked")]
    WorkerPanicked { index: usize },
}

impl EngineError {
    pub(crate) fn in_projector(self, name: &str) -> EngineError {
        EngineError::Projector {
            name: name.to_string(),
            cause: Box::new(self),
        }
    }

    pub(crate) fn in_mapping(self, index: usize, projector: &str) -> EngineError {
        EngineError::Mapping {
            index,
            projector: projector.to_string(),
            cause: Box::new(self),
        }
    }
}
