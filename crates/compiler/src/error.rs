use whistle_ir::SourceSpan;

/// What went wrong, without position information.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompileErrorKind {
    #[error("variable {name} has the same name as a function argument, it must be unique")]
    VarShadowsArg { name: String },

    #[error("argument {name} is declared more than once in {projector}")]
    DuplicateArg { projector: String, name: String },

    #[error("unable to find variable {name:?}")]
    UnknownVariable { name: String },

    #[error("unable to find input {name:?}")]
    UnknownInput { name: String },

    #[error("unknown {position}-operator {op}")]
    UnknownOperator { position: &'static str, op: String },

    #[error("wrong number of arguments - {projector} expects {expected} but got {got}")]
    WrongArgCount {
        projector: String,
        expected: usize,
        got: usize,
    },

    #[error("invalid path - {0}")]
    InvalidPath(String),

    #[error("using the root keyword in a root mapping is redundant")]
    RedundantRoot,

    #[error("root mapping can't access source {field:?}. It can only use vars or the input \"$root\"")]
    RootSourceAccess { field: String },

    #[error("expected a valid variable name")]
    MissingVarName,

    #[error("missing required {0}")]
    MissingNode(&'static str),

    #[error("invalid number {0:?}")]
    InvalidNumber(String),
}

/// A compile failure at a source position. Compilation stops at the first one.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("line {line}:{column}: {cause}")]
pub struct CompileError {
    pub line: u32,
    pub column: u32,
    pub cause: CompileErrorKind,
}

impl CompileError {
    pub fn new(span: SourceSpan, cause: CompileErrorKind) -> Self {
        CompileError {
            line: span.start.line,
            column: span.start.column,
            cause,
        }
    }
}

/// Attaches `span` to an error kind, for use with `map_err`.
pub(crate) fn at(span: SourceSpan) -> impl FnOnce(CompileErrorKind) -> CompileError {
    move |cause| CompileError::new(span, cause)
}
