//! Whole-program evaluation: root mappings, top-level objects and
//! post-processing.

use std::collections::BTreeMap;

use whistle_ir::{MappingConfig, PostProcess};
use whistle_json::{merge, Value};

use crate::context::{Context, Effect};
use crate::error::EngineError;
use crate::mapping::{call, call_definition, process_mapping, write_field, Body};
use crate::parallel::{self, Plan};
use crate::registry::Registry;
use crate::EngineOptions;

/// Name reported for the root mappings in error messages.
pub const ROOT_PROJECTOR: &str = "$root";

/// A compiled program ready to transform documents.
#[derive(Debug, Clone)]
pub struct Transformer {
    config: MappingConfig,
    registry: Registry,
    options: EngineOptions,
}

impl Transformer {
    /// Registers every projector of `config` next to the built-ins.
    pub fn new(config: MappingConfig, options: EngineOptions) -> Result<Self, EngineError> {
        let mut registry = Registry::with_builtins();
        registry.register_all(config.projector.iter().cloned())?;
        tracing::debug!(
            projectors = config.projector.len(),
            root_mappings = config.root_mapping.len(),
            "loaded mapping program"
        );
        Ok(Transformer::with_registry(config, registry, options))
    }

    /// Uses a caller-built registry as is; `config.projector` is not registered.
    pub fn with_registry(config: MappingConfig, registry: Registry, options: EngineOptions) -> Self {
        Transformer {
            config,
            registry,
            options,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn options(&self) -> EngineOptions {
        self.options
    }

    pub fn config(&self) -> &MappingConfig {
        &self.config
    }

    /// Runs the root mappings with `input` as `$root`, merges in the
    /// top-level objects and applies the post-process projector.
    pub fn transform(&self, input: &Value) -> Result<Value, EngineError> {
        let mut ctx = Context::new(&self.registry, self.options);
        let args = [input.clone()];
        let mut outputs = Outputs::default();
        self.process_root(&mut ctx, &args, &mut outputs)?;

        let document = outputs.into_document()?;
        match &self.config.post_process {
            None => Ok(document),
            Some(PostProcess::ProjectorName(name)) => {
                let projector = self
                    .registry
                    .find(name)
                    .map_err(|_| EngineError::PostProcessNotFound { name: name.clone() })?;
                tracing::debug!(projector = %name, "post-processing");
                call(&mut ctx, name, &projector, vec![document])
            }
            Some(PostProcess::ProjectorDefinition(def)) => {
                tracing::debug!(projector = %def.name, "post-processing");
                call_definition(&mut ctx, def, &[document])
            }
        }
    }

    /// Calls the projector `name` directly with `args`.
    pub fn project(&self, name: &str, args: Vec<Value>) -> Result<Value, EngineError> {
        let mut ctx = Context::new(&self.registry, self.options);
        let projector = self.registry.find(name)?;
        call(&mut ctx, name, &projector, args)
    }

    fn process_root(
        &self,
        ctx: &mut Context,
        args: &[Value],
        outputs: &mut Outputs,
    ) -> Result<(), EngineError> {
        let mappings = &self.config.root_mapping;
        if self.options.parallel && mappings.len() > 1 {
            if let Some(plan) = Plan::build(mappings, true, &Value::Null) {
                let mut unused = Value::Null;
                parallel::process(ctx, &plan, mappings, ROOT_PROJECTOR, args, &mut unused)?;
                return outputs.apply(ctx.effects.drain(..));
            }
            tracing::debug!("falling back to sequential evaluation of root mappings");
        }
        for (i, m) in mappings.iter().enumerate() {
            process_mapping(ctx, m, args, Body::Root { output: &outputs.root })
                .map_err(|e| e.in_mapping(i, ROOT_PROJECTOR))?;
            outputs.apply(ctx.effects.drain(..))?;
        }
        Ok(())
    }
}

/// The root output and the top-level object lists being built.
#[derive(Debug, Default)]
struct Outputs {
    root: Value,
    objects: BTreeMap<String, Vec<Value>>,
}

impl Outputs {
    fn apply(&mut self, effects: impl IntoIterator<Item = Effect>) -> Result<(), EngineError> {
        for effect in effects {
            match effect {
                Effect::RootField {
                    path,
                    value,
                    iterated,
                } => write_field(value, &path, &mut self.root, iterated)?,
                Effect::Object { name, value } => {
                    flatten_into(value, self.objects.entry(name).or_default())
                }
            }
        }
        Ok(())
    }

    /// The root output with each object list merged in under its name.
    fn into_document(self) -> Result<Value, EngineError> {
        let mut document = match self.root {
            Value::Null => Value::Container(BTreeMap::new()),
            other => other,
        };
        if self.objects.is_empty() {
            return Ok(document);
        }
        let objects = self
            .objects
            .into_iter()
            .map(|(name, list)| (name, Value::Array(list)))
            .collect();
        merge(Value::Container(objects), &mut document, true, false)
            .map_err(EngineError::TopLevelMerge)?;
        Ok(document)
    }
}

fn flatten_into(value: Value, list: &mut Vec<Value>) {
    match value {
        Value::Array(items) => items.into_iter().for_each(|v| flatten_into(v, list)),
        other => list.push(other),
    }
}
