use whistle_json::join_path;

use crate::error::CompileErrorKind;
use crate::tree::{Path, PathHead, PathSegment};
use super::ROOT_INPUT_NAME;

/// A path split the way scopes resolve it: exactly one of `arg` (a name)
/// or `index` (a bracketed head) is set, and `field` is the rest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(super) struct PathSpec {
    pub arg: String,
    pub index: String,
    pub field: String,
}

pub(super) fn path_spec(path: &Path) -> Result<PathSpec, CompileErrorKind> {
    let mut spec = PathSpec::default();
    match &path.head {
        Some(PathHead::Token(token)) => spec.arg = token_text(token),
        Some(PathHead::RootInput) => spec.arg = ROOT_INPUT_NAME.to_string(),
        Some(PathHead::Index(i)) => spec.index = format!("[{}]", i),
        Some(PathHead::Wildcard) => spec.index = "[*]".to_string(),
        None => return Err(CompileErrorKind::MissingNode("path head")),
    }
    if spec.arg.is_empty() == spec.index.is_empty() {
        return Err(CompileErrorKind::InvalidPath(
            "expected arg xor index".to_string(),
        ));
    }

    for segment in &path.segments {
        match segment {
            PathSegment::Field(token) => {
                spec.field.push('.');
                spec.field.push_str(&token_text(token));
            }
            PathSegment::Index(i) => spec.field.push_str(&format!("[{}]", i)),
            PathSegment::Wildcard => spec.field.push_str("[*]"),
        }
    }
    if path.array_mod {
        spec.field.push_str("[]");
    }
    if path.overwrite {
        spec.field.push('!');
    }
    Ok(spec)
}

/// Identifier text as a path piece: `'a.b'` becomes `\a\.\b`.
pub(super) fn token_text(token: &str) -> String {
    match token
        .strip_prefix('\'')
        .and_then(|t| t.strip_suffix('\''))
    {
        Some(quoted) if token.len() >= 2 => {
            let mut out = String::with_capacity(quoted.len() * 2);
            for ch in quoted.chars() {
                out.push('\\');
                out.push(ch);
            }
            out
        }
        _ => token.to_string(),
    }
}

/// Joins target pieces, keeping a trailing `!` attached to the end.
pub(super) fn join_target(pieces: [&str; 3]) -> String {
    let [arg, index, field] = pieces;
    match field.strip_suffix('!') {
        Some(field) => format!("{}!", join_path([arg, index, field])),
        None => join_path([arg, index, field]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(head: PathHead, segments: Vec<PathSegment>) -> Path {
        Path {
            head: Some(head),
            segments,
            ..Path::default()
        }
    }

    #[test]
    fn token_head_with_segments() {
        let p = path(
            PathHead::Token("a".into()),
            vec![
                PathSegment::Field("b".into()),
                PathSegment::Index(2),
                PathSegment::Wildcard,
            ],
        );
        assert_eq!(
            path_spec(&p).unwrap(),
            PathSpec {
                arg: "a".into(),
                index: String::new(),
                field: ".b[2][*]".into(),
            }
        );
    }

    #[test]
    fn index_head_and_modifiers() {
        let mut p = path(PathHead::Index(0), vec![PathSegment::Field("x".into())]);
        p.array_mod = true;
        p.overwrite = true;
        let spec = path_spec(&p).unwrap();
        assert_eq!(spec.index, "[0]");
        assert_eq!(spec.field, ".x[]!");
        assert_eq!(join_target(["", spec.index.as_str(), spec.field.as_str()]), "[0].x[]!");
    }

    #[test]
    fn root_input_head() {
        let p = path(PathHead::RootInput, vec![]);
        assert_eq!(path_spec(&p).unwrap().arg, "$root");
    }

    #[test]
    fn empty_token_is_invalid() {
        let p = path(PathHead::Token(String::new()), vec![]);
        assert!(matches!(
            path_spec(&p),
            Err(CompileErrorKind::InvalidPath(_))
        ));
        assert_eq!(
            path_spec(&Path::default()),
            Err(CompileErrorKind::MissingNode("path head"))
        );
    }

    #[test]
    fn quoted_tokens_escape_every_character() {
        assert_eq!(token_text("'a.b'"), r"\a\.\b");
        assert_eq!(token_text("plain"), "plain");
        assert_eq!(token_text("'"), "'");
    }

    #[test]
    fn overwrite_marker_stays_at_the_end() {
        assert_eq!(join_target(["a", "", "!"]), "a!");
        assert_eq!(join_target(["a", "", ".b!"]), "a.b!");
        assert_eq!(join_target(["a", "", ".b"]), "a.b");
    }
}
