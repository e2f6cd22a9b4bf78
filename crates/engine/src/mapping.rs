//! Sequential evaluation of mappings and value sources.

use whistle_ir::{FieldMapping, ProjectorDefinition, Source, Target, ValueSource};
use whistle_json::{get_segmented, segment_path, set_segmented, Segment, Value};

use crate::context::{Context, Effect};
use crate::error::EngineError;
use crate::parallel;
use crate::registry::Projector;

/// Where the mappings of a body write their `Field` targets.
pub(crate) enum Body<'a> {
    /// A projector's own output.
    Projector(&'a mut Value),
    /// The root mappings: field writes become effects on the transform
    /// output, which `output` holds so far.
    Root { output: &'a Value },
}

// ──────────────────────────────────────────────
// Mappings
// ──────────────────────────────────────────────

/// Evaluates the mappings of a projector body in order.
pub(crate) fn process_mappings(
    ctx: &mut Context,
    mappings: &[FieldMapping],
    projector: &str,
    args: &[Value],
    output: &mut Value,
) -> Result<(), EngineError> {
    if ctx.options.parallel && mappings.len() > 1 {
        if let Some(plan) = parallel::Plan::build(mappings, false, output) {
            return parallel::process(ctx, &plan, mappings, projector, args, output);
        }
        tracing::debug!(projector, "falling back to sequential evaluation");
    }
    for (i, m) in mappings.iter().enumerate() {
        process_mapping(ctx, m, args, Body::Projector(&mut *output))
            .map_err(|e| e.in_mapping(i, projector))?;
    }
    Ok(())
}

/// Evaluates one mapping, writing its result.
pub(crate) fn process_mapping(
    ctx: &mut Context,
    m: &FieldMapping,
    args: &[Value],
    body: Body<'_>,
) -> Result<(), EngineError> {
    let snapshot: &Value = match &body {
        Body::Projector(output) => output,
        Body::Root { output } => output,
    };
    let Some(value) = evaluate_mapping(ctx, m, args, snapshot)? else {
        return Ok(());
    };
    let iterated = iterates(&m.value_source);
    match (&m.target, body) {
        (Target::Field(path), Body::Projector(output)) => {
            write_field(value, path, output, iterated)
        }
        (Target::LocalVar(path), _) => ctx
            .write_var(path, value, iterated)
            .map_err(|e| EngineError::Write {
                target: format!("var {:?}", path),
                cause: Box::new(e),
            }),
        (target, _) => {
            ctx.effects.push(effect(target, value, iterated));
            Ok(())
        }
    }
}

/// The condition check and value computation of a mapping.
///
/// `None` when the mapping does not fire or produced nothing to write.
pub(crate) fn evaluate_mapping(
    ctx: &mut Context,
    m: &FieldMapping,
    args: &[Value],
    output: &Value,
) -> Result<Option<Value>, EngineError> {
    if let Some(condition) = &m.condition {
        let result = evaluate_value_source(ctx, condition, args, output)
            .map_err(|e| EngineError::Condition(Box::new(e)))?;
        match result {
            Value::Bool(true) => {}
            Value::Bool(false) => return Ok(None),
            other => {
                return Err(EngineError::ConditionNotBool {
                    got: other.type_name(),
                })
            }
        }
    }

    let value = trim_string(evaluate_value_source(ctx, &m.value_source, args, output)?);
    // Vars are still defined when assigned nil.
    if value.is_empty() && !matches!(m.target, Target::LocalVar(_)) {
        return Ok(None);
    }
    Ok(Some(value))
}

/// An effect for a target outside the projector's own output. Root
/// mappings treat plain field targets as root fields.
pub(crate) fn effect(target: &Target, value: Value, iterated: bool) -> Effect {
    match target {
        Target::Object(name) => Effect::Object {
            name: name.clone(),
            value,
        },
        Target::Field(path) | Target::RootField(path) | Target::LocalVar(path) => {
            Effect::RootField {
                path: path.clone(),
                value,
                iterated,
            }
        }
    }
}

/// Writes into a document; a trailing `!` overwrites instead of merging.
///
/// An array written through `[]` is unpacked element by element only when
/// it came from an iterated value source.
pub(crate) fn write_field(
    value: Value,
    path: &str,
    dest: &mut Value,
    iterated: bool,
) -> Result<(), EngineError> {
    let (segments, overwrite) = target_segments(path).map_err(|e| write_error(path, e))?;
    set_segmented(value, &segments, dest, overwrite, iterated)
        .map_err(|e| write_error(path, e.into()))
}

pub(crate) fn target_segments(path: &str) -> Result<(Vec<Segment>, bool), EngineError> {
    match path.strip_suffix('!') {
        Some(p) => Ok((segment_path(p)?, true)),
        None => Ok((segment_path(path)?, false)),
    }
}

fn write_error(path: &str, cause: EngineError) -> EngineError {
    EngineError::Write {
        target: format!("field {:?}", path),
        cause: Box::new(cause),
    }
}

/// Non-blank strings lose surrounding whitespace.
fn trim_string(value: Value) -> Value {
    match value {
        Value::Str(s) if !s.trim().is_empty() && s.trim().len() != s.len() => {
            Value::Str(s.trim().to_string())
        }
        other => other,
    }
}

// ──────────────────────────────────────────────
// Value sources
// ──────────────────────────────────────────────

/// Computes `projector(source, additional_arg...)`.
///
/// An argument whose selector ends in `[]` is iterated: the projector is
/// applied once per element (zipping every iterated argument) and the
/// non-nil results are collected.
pub(crate) fn evaluate_value_source(
    ctx: &mut Context,
    vs: &ValueSource,
    args: &[Value],
    output: &Value,
) -> Result<Value, EngineError> {
    let mut values = Vec::with_capacity(1 + vs.additional_arg.len());
    let mut iterated = Vec::with_capacity(values.capacity());

    if let Some(source) = &vs.source {
        values.push(evaluate_source(ctx, source, args, output)?);
        iterated.push(is_iterated(source));
        for extra in &vs.additional_arg {
            values.push(evaluate_value_source(ctx, extra, args, output)?);
            iterated.push(is_iterated_arg(extra));
        }
    }

    let name = vs.projector.strip_suffix("[]").unwrap_or(&vs.projector);
    let projector = ctx.registry.find(name)?;

    if !iterated.iter().any(|i| *i) {
        return call(ctx, name, &projector, values);
    }
    if values.first().map_or(true, Value::is_null) {
        return Ok(Value::Null);
    }

    let mut results = Vec::new();
    for row in zip(&values, &iterated)? {
        let value = trim_string(call(ctx, name, &projector, row)?);
        if !value.is_empty() {
            results.push(value);
        }
    }
    Ok(Value::Array(results))
}

/// Whether a value source produces one result per element of an iterated
/// argument.
pub(crate) fn iterates(vs: &ValueSource) -> bool {
    vs.projector.ends_with("[]")
        || vs.source.as_ref().is_some_and(is_iterated)
        || vs.additional_arg.iter().any(is_iterated_arg)
}

fn is_iterated_arg(extra: &ValueSource) -> bool {
    let by_selector = extra.projector.is_empty() && extra.source.as_ref().is_some_and(is_iterated);
    by_selector || extra.projector.ends_with("[]")
}

fn is_iterated(source: &Source) -> bool {
    let selector = match source {
        Source::FromInput(input) => input.field.as_str(),
        Source::FromLocalVar(path) | Source::FromDestination(path) => path.as_str(),
        Source::ProjectedValue(vs) => vs.projector.as_str(),
        _ => return false,
    };
    selector.ends_with("[]")
}

/// Rows of arguments, expanding the iterated positions element-wise.
fn zip(values: &[Value], iterated: &[bool]) -> Result<Vec<Vec<Value>>, EngineError> {
    let mut base: Option<(usize, usize)> = None;
    for (i, (value, iterate)) in values.iter().zip(iterated).enumerate() {
        if !iterate {
            continue;
        }
        let Value::Array(items) = value else {
            return Err(EngineError::IterateNonArray {
                position: i + 1,
                got: value.type_name(),
            });
        };
        match base {
            None => base = Some((i + 1, items.len())),
            Some((position, len)) if len != items.len() => {
                return Err(EngineError::ZipLengthMismatch {
                    base: position,
                    expected: len,
                    position: i + 1,
                    got: items.len(),
                })
            }
            Some(_) => {}
        }
    }

    let len = base.map_or(0, |(_, len)| len);
    let rows = (0..len)
        .map(|row| {
            values
                .iter()
                .zip(iterated)
                .map(|(value, iterate)| match (value, iterate) {
                    (Value::Array(items), true) => items[row].clone(),
                    (other, _) => other.clone(),
                })
                .collect()
        })
        .collect();
    Ok(rows)
}

fn evaluate_source(
    ctx: &mut Context,
    source: &Source,
    args: &[Value],
    output: &Value,
) -> Result<Value, EngineError> {
    match source {
        Source::ConstString(s) => Ok(Value::Str(s.clone())),
        Source::ConstNum(n) => Ok(Value::Num(*n)),
        Source::ConstBool(b) => Ok(Value::Bool(*b)),
        Source::FromInput(input) => {
            if input.arg == 0 || input.arg > args.len() {
                return Err(EngineError::ArgOutOfRange {
                    arg: input.arg,
                    len: args.len(),
                });
            }
            let mut segments = segment_path(&input.field)?;
            if segments.last() == Some(&Segment::Append) {
                segments.pop();
            }
            Ok(get_segmented(&args[input.arg - 1], &segments)?)
        }
        Source::FromLocalVar(path) => ctx.read_var(path),
        Source::FromDestination(path) => {
            let trimmed = path.strip_suffix("[]").unwrap_or(path);
            Ok(whistle_json::get_field(output, trimmed)?)
        }
        Source::ProjectedValue(vs) => evaluate_value_source(ctx, vs, args, output),
    }
}

// ──────────────────────────────────────────────
// Projector calls
// ──────────────────────────────────────────────

pub(crate) fn call(
    ctx: &mut Context,
    name: &str,
    projector: &Projector,
    args: Vec<Value>,
) -> Result<Value, EngineError> {
    match projector {
        Projector::Identity => Ok(args.into_iter().next().unwrap_or_default()),
        Projector::Builtin(f) => {
            ctx.enter_projector(name)?;
            let result = f(&args).map_err(|e| e.in_projector(name));
            ctx.leave_projector(name);
            result
        }
        Projector::Definition(def) => call_definition(ctx, def, &args),
    }
}

/// Runs a user projector in a fresh variable frame and returns its output.
pub(crate) fn call_definition(
    ctx: &mut Context,
    def: &ProjectorDefinition,
    args: &[Value],
) -> Result<Value, EngineError> {
    ctx.enter_projector(&def.name)?;
    ctx.push_frame();
    let mut output = Value::Null;
    let result = process_mappings(ctx, &def.mapping, &def.name, args, &mut output);
    ctx.pop_frame();
    ctx.leave_projector(&def.name);
    result.map(|()| output)
}
