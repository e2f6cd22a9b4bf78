//! Field addresses in dot/bracket notation.
//!
//! A path such as `a.b[3].c` decomposes into [`Segment`]s. Dots separate
//! field names unless escaped with `\`; brackets hold an index (`[3]`),
//! a wildcard (`[*]`) or the append marker (`[]`, write contexts only).

use std::fmt;

use crate::error::JsonError;

/// One step of a path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    /// A container key, already unescaped.
    Field(String),
    /// `[n]`
    Index(usize),
    /// `[*]`
    Wildcard,
    /// `[]`
    Append,
}

impl Segment {
    /// True for every bracketed segment.
    pub fn is_index(&self) -> bool {
        !matches!(self, Segment::Field(_))
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Field(name) => {
                for ch in name.chars() {
                    if !is_plain_char(ch) {
                        f.write_str("\\")?;
                    }
                    write!(f, "{}", ch)?;
                }
                Ok(())
            }
            Segment::Index(i) => write!(f, "[{}]", i),
            Segment::Wildcard => f.write_str("[*]"),
            Segment::Append => f.write_str("[]"),
        }
    }
}

/// Characters that may appear unescaped inside a field name.
fn is_plain_char(ch: char) -> bool {
    ch.is_alphanumeric() || matches!(ch, '-' | '_' | '*' | '\'')
}

/// Splits `path` into segments.
///
/// A leading dot is ignored, so `.a` and `a` are equivalent and `.` is the
/// empty path. Errors on unmatched brackets, consecutive unescaped dots,
/// characters outside the permitted set and negative or non-numeric indices.
pub fn segment_path(path: &str) -> Result<Vec<Segment>, JsonError> {
    let chars: Vec<(usize, char)> = path.char_indices().collect();
    let mut segments = Vec::new();
    let mut field = String::new();
    let mut prev_dot = false;
    let mut i = 0;

    while i < chars.len() {
        let (offset, ch) = chars[i];
        match ch {
            '\\' => {
                let Some(&(_, escaped)) = chars.get(i + 1) else {
                    return Err(JsonError::DanglingEscape {
                        path: path.to_string(),
                    });
                };
                field.push(escaped);
                prev_dot = false;
                i += 2;
                continue;
            }
            '.' => {
                if prev_dot {
                    return Err(JsonError::ConsecutiveDots {
                        path: path.to_string(),
                        offset,
                    });
                }
                flush_field(&mut field, &mut segments);
                prev_dot = true;
            }
            '[' => {
                flush_field(&mut field, &mut segments);
                let rest = &chars[i + 1..];
                let close = rest
                    .iter()
                    .position(|&(_, c)| c == ']')
                    .filter(|&close| rest[..close].iter().all(|&(_, c)| c != '['))
                    .ok_or_else(|| JsonError::UnmatchedBracket {
                        path: path.to_string(),
                        offset,
                    })?;
                let inner: String = rest[..close].iter().map(|&(_, c)| c).collect();
                segments.push(parse_bracket(path, &inner)?);
                prev_dot = false;
                i += close + 2;
                continue;
            }
            ']' => {
                return Err(JsonError::UnmatchedBracket {
                    path: path.to_string(),
                    offset,
                });
            }
            c if is_plain_char(c) => {
                field.push(c);
                prev_dot = false;
            }
            c => {
                return Err(JsonError::InvalidCharacter {
                    path: path.to_string(),
                    ch: c,
                    offset,
                });
            }
        }
        i += 1;
    }
    flush_field(&mut field, &mut segments);
    Ok(segments)
}

fn flush_field(field: &mut String, segments: &mut Vec<Segment>) {
    if !field.is_empty() {
        segments.push(Segment::Field(std::mem::take(field)));
    }
}

fn parse_bracket(path: &str, inner: &str) -> Result<Segment, JsonError> {
    match inner {
        "" => Ok(Segment::Append),
        "*" => Ok(Segment::Wildcard),
        _ => {
            if let Some(digits) = inner.strip_prefix('-') {
                if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) {
                    return Err(JsonError::NegativeIndex {
                        path: path.to_string(),
                        index: inner.to_string(),
                    });
                }
            }
            inner
                .parse::<usize>()
                .map(Segment::Index)
                .map_err(|_| JsonError::InvalidIndex {
                    path: path.to_string(),
                    index: inner.to_string(),
                })
        }
    }
}

/// Joins path pieces with dots.
///
/// Leading and trailing unescaped dots and whitespace are trimmed from each
/// piece, empty pieces are dropped, and no dot is placed before a piece
/// that starts with `[`.
pub fn join_path<I, S>(pieces: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out = String::new();
    for piece in pieces {
        let piece = trim_piece(piece.as_ref());
        if piece.is_empty() {
            continue;
        }
        if !out.is_empty() && !piece.starts_with('[') {
            out.push('.');
        }
        out.push_str(piece);
    }
    out
}

fn trim_piece(piece: &str) -> &str {
    let mut piece = piece.trim_start_matches(|c: char| c == '.' || c.is_whitespace());
    while let Some(last) = piece.chars().last() {
        if last != '.' && !last.is_whitespace() {
            break;
        }
        let body = &piece[..piece.len() - last.len_utf8()];
        let backslashes = body.chars().rev().take_while(|&c| c == '\\').count();
        if backslashes % 2 == 1 {
            break;
        }
        piece = body;
    }
    piece
}

/// Renders segments back into a path string.
pub fn format_path(segments: &[Segment]) -> String {
    join_path(segments.iter().map(Segment::to_string))
}

/// True if `segment` is a bracketed path piece such as `[0]`, `[*]` or `[]`.
pub fn is_index(segment: &str) -> bool {
    segment.len() >= 2 && segment.starts_with('[') && segment.ends_with(']')
}

pub(crate) fn has_wildcard(segments: &[Segment]) -> bool {
    segments.iter().any(|s| *s == Segment::Wildcard)
}
