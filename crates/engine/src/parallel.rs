//! Parallel evaluation of a projector body.
//!
//! Every mapping runs on its own scoped thread. Each field of the output
//! (and each local variable) written by the body gets a [`Versions`]
//! ledger: version 0 is the value before the body runs and mapping `i`
//! owns version `i + 1`. A mapping that reads a field or variable waits on
//! the version just below its own, so it observes exactly the writes of
//! the mappings before it. A mapping that does not write (condition false,
//! empty value, error) skips its version, passing the previous value on.
//!
//! Writes outside the projector (root fields, top-level objects) are
//! buffered per mapping and appended in mapping order.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::thread;

use whistle_ir::{FieldMapping, Source, Target, ValueSource};
use whistle_json::{Promise, Segment, Value, Versioned, Versions};

use crate::context::{assign_var, split_var_path, Context, Effect};
use crate::error::EngineError;
use crate::mapping::{effect, evaluate_mapping, iterates, target_segments, write_field};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum Key {
    Field(String),
    Var(String),
}

#[derive(Debug)]
struct Step {
    write: Option<Key>,
    reads: BTreeSet<Key>,
}

/// The keys each mapping of a body reads and writes.
#[derive(Debug)]
pub(crate) struct Plan {
    steps: Vec<Step>,
}

impl Plan {
    /// `None` when some target or destination read cannot be keyed by a
    /// plain field name, or the output is not a container; such bodies run
    /// sequentially.
    pub(crate) fn build(mappings: &[FieldMapping], root: bool, output: &Value) -> Option<Plan> {
        if !matches!(output, Value::Null | Value::Container(_)) {
            return None;
        }
        let mut steps = Vec::with_capacity(mappings.len());
        for m in mappings {
            let write = match &m.target {
                Target::Field(path) if !root => Some(Key::Field(field_head(path)?)),
                Target::LocalVar(path) => Some(Key::Var(split_var_path(path).ok()?.0)),
                _ => None,
            };
            let mut reads = BTreeSet::new();
            collect_reads(&m.value_source, root, &mut reads)?;
            if let Some(condition) = &m.condition {
                collect_reads(condition, root, &mut reads)?;
            }
            steps.push(Step { write, reads });
        }
        Some(Plan { steps })
    }
}

fn field_head(path: &str) -> Option<String> {
    let (segments, _) = target_segments(path).ok()?;
    match segments.into_iter().next()? {
        Segment::Field(name) => Some(name),
        _ => None,
    }
}

fn collect_reads(vs: &ValueSource, root: bool, reads: &mut BTreeSet<Key>) -> Option<()> {
    match &vs.source {
        Some(Source::FromDestination(path)) => {
            if root {
                return None;
            }
            reads.insert(Key::Field(field_head(path)?));
        }
        Some(Source::FromLocalVar(path)) => {
            reads.insert(Key::Var(split_var_path(path).ok()?.0));
        }
        Some(Source::ProjectedValue(inner)) => collect_reads(inner, root, reads)?,
        _ => {}
    }
    for extra in &vs.additional_arg {
        collect_reads(extra, root, reads)?;
    }
    Some(())
}

/// Settles a version with its predecessor's value unless it was set.
struct Settle<'a> {
    ledger: &'a Versions,
    id: i64,
    promise: Arc<Promise<Value>>,
}

impl Drop for Settle<'_> {
    fn drop(&mut self) {
        if self.promise.is_set() {
            return;
        }
        if let Err(e) = self.ledger.skip_version(self.id) {
            tracing::warn!(version = self.id, error = %e, "failed to skip version");
        }
    }
}

#[derive(Debug, Default)]
struct Outcome {
    effects: Vec<Effect>,
    wrote: bool,
}

pub(crate) fn process(
    ctx: &mut Context,
    plan: &Plan,
    mappings: &[FieldMapping],
    projector: &str,
    args: &[Value],
    output: &mut Value,
) -> Result<(), EngineError> {
    let ledgers = build_ledgers(ctx, plan, output)?;
    tracing::debug!(
        projector,
        mappings = mappings.len(),
        ledgers = ledgers.len(),
        "evaluating mappings in parallel"
    );

    let shared: &Context = ctx;
    let initial: &Value = output;
    let results: Vec<thread::Result<Result<Outcome, EngineError>>> = thread::scope(|s| {
        let handles: Vec<_> = plan
            .steps
            .iter()
            .zip(mappings)
            .enumerate()
            .map(|(i, (step, m))| {
                let ledgers = &ledgers;
                s.spawn(move || run_step(shared, ledgers, initial, step, i, m, args))
            })
            .collect();
        handles.into_iter().map(|h| h.join()).collect()
    });

    let mut outcomes = Vec::with_capacity(results.len());
    for (i, joined) in results.into_iter().enumerate() {
        let outcome = joined
            .map_err(|_| EngineError::WorkerPanicked { index: i })?
            .map_err(|e| e.in_mapping(i, projector))?;
        outcomes.push(outcome);
    }

    let mut written = BTreeSet::new();
    for (step, outcome) in plan.steps.iter().zip(&mut outcomes) {
        ctx.effects.append(&mut outcome.effects);
        if let (Some(key), true) = (&step.write, outcome.wrote) {
            written.insert(key);
        }
    }
    for key in written {
        let Some(value) = ledgers.get(key).and_then(Versions::latest).map(Versioned::resolve) else {
            continue;
        };
        match key {
            Key::Field(name) => {
                if output.is_null() {
                    *output = Value::Container(BTreeMap::new());
                }
                if let Value::Container(fields) = output {
                    fields.insert(name.clone(), value);
                }
            }
            Key::Var(name) => ctx.set_var(name, value),
        }
    }
    Ok(())
}

/// One ledger per written key: the prior value as version 0, then a
/// pending version per writing mapping.
fn build_ledgers(
    ctx: &Context,
    plan: &Plan,
    output: &Value,
) -> Result<BTreeMap<Key, Versions>, EngineError> {
    let mut ledgers: BTreeMap<Key, Versions> = BTreeMap::new();
    for (i, step) in plan.steps.iter().enumerate() {
        let Some(key) = &step.write else { continue };
        let ledger = ledgers.entry(key.clone()).or_default();
        if !ledger.exist_version(0) {
            ledger.add_version(prior(ctx, key, output).unwrap_or_default(), 0)?;
        }
        let (pending, _) = Versioned::pending();
        ledger.add_version(pending, version_id(i))?;
    }
    for ledger in ledgers.values_mut() {
        ledger.lock();
    }
    Ok(ledgers)
}

fn version_id(index: usize) -> i64 {
    i64::try_from(index).map_or(i64::MAX, |i| i + 1)
}

/// The value of `key` before the body runs; `None` for an undefined var.
fn prior(ctx: &Context, key: &Key, output: &Value) -> Option<Value> {
    match key {
        Key::Field(name) => Some(
            output
                .as_container()
                .and_then(|fields| fields.get(name))
                .cloned()
                .unwrap_or_default(),
        ),
        Key::Var(name) => ctx.var(name).cloned(),
    }
}

fn run_step(
    ctx: &Context,
    ledgers: &BTreeMap<Key, Versions>,
    initial: &Value,
    step: &Step,
    index: usize,
    m: &FieldMapping,
    args: &[Value],
) -> Result<Outcome, EngineError> {
    let id = version_id(index);
    let settle = match &step.write {
        Some(key) => match ledgers.get(key).and_then(|l| Some((l, l.version(id)?))) {
            Some((ledger, Versioned::Pending(promise))) => Some(Settle {
                ledger,
                id,
                promise: Arc::clone(promise),
            }),
            _ => None,
        },
        None => None,
    };

    let read = |key: &Key| -> Option<Value> {
        match ledgers.get(key) {
            Some(ledger) => ledger.prev_version(id).map(Versioned::resolve),
            None => prior(ctx, key, initial),
        }
    };

    let mut fields = BTreeMap::new();
    let mut vars = BTreeMap::new();
    for key in &step.reads {
        match key {
            Key::Field(name) => {
                fields.insert(name.clone(), read(key).unwrap_or_default());
            }
            Key::Var(name) => {
                if let Some(value) = read(key) {
                    vars.insert(name.clone(), value);
                }
            }
        }
    }
    let snapshot = Value::Container(fields);

    let mut worker = ctx.fork(vars);
    let value = evaluate_mapping(&mut worker, m, args, &snapshot)?;
    let mut outcome = Outcome {
        effects: std::mem::take(&mut worker.effects),
        wrote: false,
    };
    let Some(value) = value else {
        return Ok(outcome);
    };
    let iterated = iterates(&m.value_source);

    match (&step.write, settle) {
        (Some(key), Some(settle)) => {
            let previous = settle
                .ledger
                .prev_version(id)
                .map(Versioned::resolve)
                .unwrap_or_default();
            let updated = apply(key, &m.target, previous, value, iterated)?;
            settle.promise.set(updated)?;
            outcome.wrote = true;
        }
        _ => outcome.effects.push(effect(&m.target, value, iterated)),
    }
    Ok(outcome)
}

/// The new value of `key` after writing `value` through `target`.
fn apply(
    key: &Key,
    target: &Target,
    previous: Value,
    value: Value,
    iterated: bool,
) -> Result<Value, EngineError> {
    match (key, target) {
        (Key::Field(name), Target::Field(path)) => {
            let mut scratch = Value::Container(BTreeMap::from([(name.clone(), previous)]));
            write_field(value, path, &mut scratch, iterated)?;
            Ok(match scratch {
                Value::Container(mut fields) => fields.remove(name).unwrap_or_default(),
                _ => Value::Null,
            })
        }
        (Key::Var(_), Target::LocalVar(path)) => {
            let (_, rest) = split_var_path(path)?;
            assign_var(Some(previous), &rest, value, iterated).map_err(|e| EngineError::Write {
                target: format!("var {:?}", path),
                cause: Box::new(e),
            })
        }
        _ => Ok(previous),
    }
}
