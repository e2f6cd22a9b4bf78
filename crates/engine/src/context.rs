//! Per-transform evaluation state.

use std::collections::BTreeMap;

use whistle_json::{segment_path, set_segmented, Segment, Value};

use crate::error::EngineError;
use crate::registry::Registry;
use crate::EngineOptions;

/// A write outside the projector being evaluated. Effects are collected
/// in evaluation order and applied to the transform's output by the root.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Effect {
    RootField {
        path: String,
        value: Value,
        iterated: bool,
    },
    Object { name: String, value: Value },
}

#[derive(Debug)]
pub(crate) struct Context<'r> {
    pub registry: &'r Registry,
    pub options: EngineOptions,
    /// One variable frame per active projector call; only the top one is visible.
    frames: Vec<BTreeMap<String, Value>>,
    depth: usize,
    projector_counts: BTreeMap<String, usize>,
    pub effects: Vec<Effect>,
}

impl<'r> Context<'r> {
    pub fn new(registry: &'r Registry, options: EngineOptions) -> Self {
        Context {
            registry,
            options,
            frames: vec![BTreeMap::new()],
            depth: 0,
            projector_counts: BTreeMap::new(),
            effects: Vec::new(),
        }
    }

    /// A context for a worker evaluating one mapping of the current
    /// projector body, seeing `vars` as its variable frame.
    pub fn fork(&self, vars: BTreeMap<String, Value>) -> Context<'r> {
        Context {
            registry: self.registry,
            options: self.options,
            frames: vec![vars],
            depth: self.depth,
            projector_counts: self.projector_counts.clone(),
            effects: Vec::new(),
        }
    }

    // ──────────────────────────────────────────────
    // Call stack
    // ──────────────────────────────────────────────

    pub fn enter_projector(&mut self, name: &str) -> Result<(), EngineError> {
        self.depth += 1;
        *self.projector_counts.entry(name.to_string()).or_default() += 1;
        if self.depth > self.options.max_stack_depth {
            let result = Err(self.stack_overflow());
            self.leave_projector(name);
            return result;
        }
        Ok(())
    }

    pub fn leave_projector(&mut self, name: &str) {
        self.depth = self.depth.saturating_sub(1);
        if let Some(count) = self.projector_counts.get_mut(name) {
            *count = count.saturating_sub(1);
        }
    }

    fn stack_overflow(&self) -> EngineError {
        let mut counts: Vec<(&String, &usize)> =
            self.projector_counts.iter().filter(|(_, c)| **c > 0).collect();
        counts.sort_by(|a, b| b.1.cmp(a.1));
        let counts = counts
            .iter()
            .map(|(name, count)| format!("{}: {}", name, count))
            .collect::<Vec<_>>()
            .join("\n");
        EngineError::StackDepthExceeded {
            max: self.options.max_stack_depth,
            counts,
        }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    // ──────────────────────────────────────────────
    // Variables
    // ──────────────────────────────────────────────

    pub fn push_frame(&mut self) {
        self.frames.push(BTreeMap::new());
    }

    pub fn pop_frame(&mut self) {
        self.frames.pop();
    }

    fn top(&self) -> Option<&BTreeMap<String, Value>> {
        self.frames.last()
    }

    pub fn var(&self, name: &str) -> Option<&Value> {
        self.top().and_then(|frame| frame.get(name))
    }

    pub fn set_var(&mut self, name: &str, value: Value) {
        if self.frames.is_empty() {
            self.frames.push(BTreeMap::new());
        }
        if let Some(frame) = self.frames.last_mut() {
            frame.insert(name.to_string(), value);
        }
    }

    /// Reads `path` (a variable name followed by an optional sub-path).
    pub fn read_var(&self, path: &str) -> Result<Value, EngineError> {
        let (name, rest) = split_var_path(path)?;
        let value = self.var(&name).ok_or_else(|| EngineError::UndefinedVar {
            name: path.to_string(),
        })?;
        Ok(whistle_json::get_segmented(value, &without_append(&rest))?)
    }

    /// Assigns `value` to the variable or sub-path named by `path`.
    pub fn write_var(
        &mut self,
        path: &str,
        value: Value,
        iterated: bool,
    ) -> Result<(), EngineError> {
        let (name, rest) = split_var_path(path)?;
        let updated = assign_var(self.var(&name).cloned(), &rest, value, iterated)?;
        self.set_var(&name, updated);
        Ok(())
    }
}

/// Splits a variable accessor into the variable name and the rest of the
/// path, ignoring a trailing `!`.
pub(crate) fn split_var_path(path: &str) -> Result<(String, Vec<Segment>), EngineError> {
    let trimmed = path.strip_suffix('!').unwrap_or(path);
    let mut segments = segment_path(trimmed)?;
    match segments.first() {
        Some(Segment::Field(name)) => {
            let name = name.clone();
            segments.remove(0);
            Ok((name, segments))
        }
        _ => Err(EngineError::InvalidVarAccessor {
            path: path.to_string(),
        }),
    }
}

/// Writes `value` at `rest` inside the previous value of a variable.
///
/// Variables are overwritten freely; only a path ending in `[]` appends.
/// An iterated array is appended element by element.
pub(crate) fn assign_var(
    previous: Option<Value>,
    rest: &[Segment],
    value: Value,
    iterated: bool,
) -> Result<Value, EngineError> {
    let mut current = previous.unwrap_or_default();
    let overwrite = rest.last() != Some(&Segment::Append);
    set_segmented(value, rest, &mut current, overwrite, iterated)?;
    Ok(current)
}

fn without_append(segments: &[Segment]) -> Vec<Segment> {
    match segments.split_last() {
        Some((Segment::Append, init)) => init.to_vec(),
        _ => segments.to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn options(max_stack_depth: usize) -> EngineOptions {
        EngineOptions {
            max_stack_depth,
            ..EngineOptions::default()
        }
    }

    #[test]
    fn variables_live_in_the_top_frame() {
        let registry = Registry::new();
        let mut ctx = Context::new(&registry, EngineOptions::default());
        ctx.write_var("v", Value::from(json!({"a": 1})), false).unwrap();
        assert_eq!(ctx.read_var("v.a").unwrap(), Value::Num(1.0));

        ctx.push_frame();
        assert!(matches!(
            ctx.read_var("v"),
            Err(EngineError::UndefinedVar { .. })
        ));
        ctx.pop_frame();
        assert_eq!(ctx.read_var("v[]").unwrap(), Value::from(json!({"a": 1})));
    }

    #[test]
    fn var_writes_overwrite_unless_appending() {
        let registry = Registry::new();
        let mut ctx = Context::new(&registry, EngineOptions::default());
        ctx.write_var("v", Value::Num(1.0), false).unwrap();
        ctx.write_var("v", Value::Num(2.0), false).unwrap();
        assert_eq!(ctx.var("v"), Some(&Value::Num(2.0)));

        ctx.write_var("l[]", Value::Num(1.0), false).unwrap();
        ctx.write_var("l[]", Value::Num(2.0), false).unwrap();
        assert_eq!(ctx.var("l"), Some(&Value::from(json!([1, 2]))));

        ctx.write_var("o.x", Value::Num(1.0), false).unwrap();
        ctx.write_var("o.x", Value::Num(3.0), false).unwrap();
        assert_eq!(ctx.var("o"), Some(&Value::from(json!({"x": 3}))));
    }

    #[test]
    fn iterated_var_appends_unpack_arrays() {
        let registry = Registry::new();
        let mut ctx = Context::new(&registry, EngineOptions::default());
        ctx.write_var("l[]", Value::from(json!([1, 2])), false).unwrap();
        assert_eq!(ctx.var("l"), Some(&Value::from(json!([[1, 2]]))));
        ctx.write_var("l[]", Value::from(json!([3, 4])), true).unwrap();
        assert_eq!(ctx.var("l"), Some(&Value::from(json!([[1, 2], 3, 4]))));
    }

    #[test]
    fn invalid_accessor() {
        assert!(matches!(
            split_var_path("[0]"),
            Err(EngineError::InvalidVarAccessor { .. })
        ));
        assert!(matches!(
            split_var_path("."),
            Err(EngineError::InvalidVarAccessor { .. })
        ));
    }

    #[test]
    fn stack_depth_is_bounded() {
        let registry = Registry::new();
        let mut ctx = Context::new(&registry, options(2));
        ctx.enter_projector("f").unwrap();
        ctx.enter_projector("f").unwrap();
        let err = ctx.enter_projector("g").unwrap_err();
        let EngineError::StackDepthExceeded { max, counts } = err else {
            panic!("expected stack depth error");
        };
        assert_eq!(max, 2);
        assert_eq!(counts, "f: 2\ng: 1");
        assert_eq!(ctx.depth(), 2);
        ctx.leave_projector("f");
        assert!(ctx.enter_projector("g").is_ok());
    }
}
