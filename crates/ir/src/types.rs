//! IR node types.

use serde::{Deserialize, Serialize};

// ── Positions ───────────────────────────────────────────────────────

/// A line/column pair (1-based line, 0-based column).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourcePosition {
    pub line: u32,
    pub column: u32,
}

/// The source text a node was compiled from.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceSpan {
    pub start: SourcePosition,
    pub stop: SourcePosition,
}

// ── Program ─────────────────────────────────────────────────────────

/// A whole compiled program.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MappingConfig {
    /// User-defined projectors followed by compiler-synthesized ones.
    #[serde(default)]
    pub projector: Vec<ProjectorDefinition>,
    /// Mappings evaluated against the input document.
    #[serde(default)]
    pub root_mapping: Vec<FieldMapping>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_process: Option<PostProcess>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ProjectorDefinition {
    pub name: String,
    #[serde(default)]
    pub mapping: Vec<FieldMapping>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<SourceSpan>,
}

/// The projector applied to the merged output of a transform.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum PostProcess {
    ProjectorName(String),
    ProjectorDefinition(ProjectorDefinition),
}

// ── Mappings ────────────────────────────────────────────────────────

/// Assigns the value computed by `value_source` to `target`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FieldMapping {
    pub value_source: ValueSource,
    pub target: Target,
    /// When present, the mapping only fires if this evaluates to `true`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<ValueSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<SourceSpan>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_meta: Option<SourceSpan>,
}

impl FieldMapping {
    pub fn new(target: Target, value_source: ValueSource) -> Self {
        FieldMapping {
            value_source,
            target,
            condition: None,
            meta: None,
            target_meta: None,
        }
    }
}

/// Where a mapping writes.
///
/// Paths may end in `[]` (append) or `!` (overwrite instead of merge).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum Target {
    /// A field of the projector's own output; `.` is the output itself.
    Field(String),
    /// A local variable, optionally with a sub-path.
    LocalVar(String),
    /// A field of the transform's root output.
    RootField(String),
    /// A named top-level object list.
    Object(String),
}

// ── Values ──────────────────────────────────────────────────────────

/// A computed value: `projector(source, additional_arg...)`.
///
/// An empty projector is the identity on `source`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ValueSource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Source>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub projector: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub additional_arg: Vec<ValueSource>,
}

impl ValueSource {
    /// The plain value of `source`.
    pub fn from_source(source: Source) -> Self {
        ValueSource {
            source: Some(source),
            ..ValueSource::default()
        }
    }

    /// A call to `projector` with no arguments.
    pub fn call(projector: impl Into<String>) -> Self {
        ValueSource {
            projector: projector.into(),
            ..ValueSource::default()
        }
    }

    /// True if evaluating this applies a projector.
    pub fn is_projection(&self) -> bool {
        !self.projector.is_empty()
    }

    /// This value as a [`Source`]: the bare source when nothing is
    /// projected, otherwise the whole value source nested.
    pub fn into_source(self) -> Source {
        match self {
            ValueSource {
                source: Some(source),
                projector,
                additional_arg,
            } if projector.is_empty() && additional_arg.is_empty() => source,
            other => Source::ProjectedValue(Box::new(other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Source {
    ConstString(String),
    ConstNum(f64),
    ConstBool(bool),
    /// Argument `arg` (1-based) of the enclosing projector.
    FromInput(InputSource),
    FromLocalVar(String),
    /// A field already written to the projector's output.
    FromDestination(String),
    ProjectedValue(Box<ValueSource>),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct InputSource {
    pub arg: usize,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub field: String,
}

impl Source {
    pub fn from_input(arg: usize, field: impl Into<String>) -> Self {
        Source::FromInput(InputSource {
            arg,
            field: field.into(),
        })
    }

    /// The path this source selects, if it reads a document.
    pub fn selector(&self) -> Option<&str> {
        match self {
            Source::FromInput(input) => Some(&input.field),
            Source::FromLocalVar(path) | Source::FromDestination(path) => Some(path),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_value_source_unwraps_to_its_source() {
        let vs = ValueSource::from_source(Source::ConstNum(1.0));
        assert_eq!(vs.into_source(), Source::ConstNum(1.0));
    }

    #[test]
    fn projected_value_source_is_nested() {
        let vs = ValueSource::call("$UUID");
        assert_eq!(
            vs.clone().into_source(),
            Source::ProjectedValue(Box::new(vs))
        );
    }

    #[test]
    fn serializes_compactly() {
        let m = FieldMapping::new(
            Target::Field("x".into()),
            ValueSource {
                source: Some(Source::from_input(1, "")),
                projector: "$Sum".into(),
                additional_arg: vec![ValueSource::from_source(Source::ConstNum(1.0))],
            },
        );
        let json = serde_json::to_value(&m).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "value_source": {
                    "source": {"FromInput": {"arg": 1}},
                    "projector": "$Sum",
                    "additional_arg": [{"source": {"ConstNum": 1.0}}]
                },
                "target": {"Field": "x"}
            })
        );
        let back: FieldMapping = serde_json::from_value(json).unwrap();
        assert_eq!(back, m);
    }
}
