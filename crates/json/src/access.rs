//! Reading, writing and merging document fields by path.

use crate::error::JsonError;
use crate::path::{has_wildcard, segment_path, Segment};
use crate::value::Value;

// ──────────────────────────────────────────────
// Get
// ──────────────────────────────────────────────

/// Reads the value at `path`.
///
/// Absent keys and out-of-range indices yield `Null`, as does any path
/// below a `Null` and an index or wildcard applied to a container.
/// Navigating into a primitive or keying an array by name is an error.
pub fn get_field(src: &Value, path: &str) -> Result<Value, JsonError> {
    let segments = segment_path(path)?;
    get_segmented(src, &segments)
}

/// [`get_field`] over an already segmented path.
///
/// `[*]` applies the remainder of the path to each array element and
/// collects the results. When the remainder expands a wildcard of its
/// own, the per-element arrays are concatenated instead of nested.
pub fn get_segmented(src: &Value, segments: &[Segment]) -> Result<Value, JsonError> {
    let Some((segment, rest)) = segments.split_first() else {
        return Ok(src.clone());
    };
    match src {
        Value::Null => Ok(Value::Null),
        Value::Array(items) => match segment {
            Segment::Index(i) => match items.get(*i) {
                Some(item) => get_segmented(item, rest),
                None => Ok(Value::Null),
            },
            Segment::Wildcard => {
                let flatten = has_wildcard(rest);
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    match get_segmented(item, rest)? {
                        Value::Array(inner) if flatten => out.extend(inner),
                        other => out.push(other),
                    }
                }
                Ok(Value::Array(out))
            }
            Segment::Append => Err(JsonError::MisplacedSegment {
                segment: segment.to_string(),
                context: "reading",
            }),
            Segment::Field(name) => Err(JsonError::ArrayWithoutIndex {
                segment: name.clone(),
            }),
        },
        Value::Container(fields) => match segment {
            Segment::Field(name) => match fields.get(name) {
                Some(field) => get_segmented(field, rest),
                None => Ok(Value::Null),
            },
            Segment::Append => Err(JsonError::MisplacedSegment {
                segment: segment.to_string(),
                context: "reading",
            }),
            Segment::Index(_) | Segment::Wildcard => Ok(Value::Null),
        },
        primitive => Err(JsonError::KeyIntoPrimitive {
            kind: primitive.type_name(),
            segment: segment.to_string(),
        }),
    }
}

// ──────────────────────────────────────────────
// Set
// ──────────────────────────────────────────────

/// Writes `src` at `path` inside `dest`, creating containers and arrays
/// along the way.
///
/// `[]` appends. With `match_nesting`, an array source written through
/// `[]` is unpacked: each element gets its own appended slot and the rest
/// of the path is written per element. Without it the whole source lands
/// in a single appended slot.
///
/// With `overwrite` the final value replaces whatever is there; otherwise
/// it is merged in with [`merge`], failing rather than discarding data.
/// An index into an existing container is an error.
pub fn set_field(
    src: Value,
    path: &str,
    dest: &mut Value,
    overwrite: bool,
    match_nesting: bool,
) -> Result<(), JsonError> {
    let segments = segment_path(path)?;
    set_segmented(src, &segments, dest, overwrite, match_nesting)
}

/// [`set_field`] over an already segmented path.
pub fn set_segmented(
    src: Value,
    segments: &[Segment],
    dest: &mut Value,
    overwrite: bool,
    match_nesting: bool,
) -> Result<(), JsonError> {
    let Some((segment, rest)) = segments.split_first() else {
        if overwrite {
            *dest = src;
            return Ok(());
        }
        return merge(src, dest, true, false);
    };

    if dest.is_null() {
        *dest = if segment.is_index() {
            Value::Array(Vec::new())
        } else {
            Value::Container(Default::default())
        };
    }

    match dest {
        Value::Array(items) => {
            let index = match segment {
                Segment::Index(i) => *i,
                Segment::Append => match src {
                    Value::Array(elements) if match_nesting => {
                        for element in elements {
                            let slot = items.len();
                            items.push(Value::Null);
                            set_segmented(element, rest, &mut items[slot], overwrite, true)?;
                        }
                        return Ok(());
                    }
                    _ => items.len(),
                },
                Segment::Wildcard => {
                    return Err(JsonError::MisplacedSegment {
                        segment: segment.to_string(),
                        context: "writing",
                    })
                }
                Segment::Field(name) => {
                    return Err(JsonError::ArrayWithoutIndex {
                        segment: name.clone(),
                    })
                }
            };
            if items.len() <= index {
                items.resize(index + 1, Value::Null);
            }
            set_segmented(src, rest, &mut items[index], overwrite, match_nesting)
        }
        Value::Container(fields) => match segment {
            Segment::Field(name) => {
                let slot = fields.entry(name.clone()).or_insert(Value::Null);
                set_segmented(src, rest, slot, overwrite, match_nesting)
            }
            other => Err(JsonError::ContainerWithIndex {
                segment: other.to_string(),
            }),
        },
        primitive => Err(JsonError::KeyIntoPrimitive {
            kind: primitive.type_name(),
            segment: segment.to_string(),
        }),
    }
}

// ──────────────────────────────────────────────
// Merge
// ──────────────────────────────────────────────

/// Merges `src` into `dest`.
///
/// Containers union recursively. Arrays concatenate, or are replaced when
/// `overwrite_arrays` is set. A primitive replaces the destination; with
/// `fail_on_overwrite` that is an error unless the destination is null or
/// an empty container/array. On error `dest` is left untouched.
pub fn merge(
    src: Value,
    dest: &mut Value,
    fail_on_overwrite: bool,
    overwrite_arrays: bool,
) -> Result<(), JsonError> {
    check_merge(&src, dest, fail_on_overwrite)?;
    apply_merge(src, dest, overwrite_arrays);
    Ok(())
}

fn is_vacant(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::Container(c) => c.is_empty(),
        Value::Array(a) => a.is_empty(),
        _ => false,
    }
}

fn check_merge(src: &Value, dest: &Value, fail_on_overwrite: bool) -> Result<(), JsonError> {
    if dest.is_null() {
        return Ok(());
    }
    if src.is_primitive() {
        if fail_on_overwrite && !is_vacant(dest) {
            return Err(JsonError::MergeOverwrite {
                src: src.to_string(),
                dest: dest.to_string(),
            });
        }
        return Ok(());
    }
    match (src, dest) {
        (Value::Container(s), Value::Container(d)) => {
            for (key, value) in s {
                if let Some(existing) = d.get(key) {
                    check_merge(value, existing, fail_on_overwrite)?;
                }
            }
            Ok(())
        }
        (Value::Array(_), Value::Array(_)) => Ok(()),
        (_, d) if is_vacant(d) => Ok(()),
        (s, d) => Err(JsonError::MergeMismatch {
            src: s.type_name(),
            dest: d.type_name(),
        }),
    }
}

fn apply_merge(src: Value, dest: &mut Value, overwrite_arrays: bool) {
    if dest.is_null() || src.is_primitive() {
        *dest = src;
        return;
    }
    match (src, dest) {
        (Value::Container(s), Value::Container(d)) => {
            for (key, value) in s {
                match d.get_mut(&key) {
                    Some(existing) => apply_merge(value, existing, overwrite_arrays),
                    None => {
                        d.insert(key, value);
                    }
                }
            }
        }
        (Value::Array(s), Value::Array(d)) => {
            if overwrite_arrays {
                *d = s;
            } else {
                d.extend(s);
            }
        }
        (src, dest) => *dest = src,
    }
}
