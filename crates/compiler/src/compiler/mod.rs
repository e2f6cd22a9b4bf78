//! Tree-to-IR compilation.
//!
//! One `compile_*` method per parse-tree node kind. Every method returns a
//! `Result`; the first error aborts the whole compilation.

mod expression;
mod mapping;
mod path;

use serde::{Deserialize, Serialize};
use whistle_ir::{MappingConfig, PostProcess, ProjectorDefinition, SourceSpan};

use crate::env::{ScopeId, Scopes};
use crate::error::{at, CompileError, CompileErrorKind};
use crate::stack::ValueStack;
use crate::tree::{BlockItem, PostProcessNode, ProjectorDef, Root, RootItem};

/// Name under which the root scope receives the input document.
pub const ROOT_INPUT_NAME: &str = "$root";

/// Parameter name of synthesized filter projectors.
pub(crate) const FILTER_ELEMENT_NAME: &str = "$";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompileOptions {
    /// Attach source spans to mappings, targets and projector definitions.
    pub include_source_positions: bool,
}

/// Compiles a whole program.
pub fn compile(root: &Root, options: &CompileOptions) -> Result<MappingConfig, CompileError> {
    Compiler::new(*options).compile_root(root)
}

pub(crate) struct Compiler {
    options: CompileOptions,
    scopes: Scopes,
    current: ScopeId,
    /// One condition stack per open scope.
    conditions: Vec<ValueStack>,
    projectors: Vec<ProjectorDefinition>,
    synthesized: Vec<ProjectorDefinition>,
}

impl Compiler {
    fn new(options: CompileOptions) -> Self {
        let scopes = Scopes::new("", &[ROOT_INPUT_NAME]);
        let current = scopes.root();
        Compiler {
            options,
            scopes,
            current,
            conditions: vec![ValueStack::default()],
            projectors: Vec::new(),
            synthesized: Vec::new(),
        }
    }

    fn meta(&self, span: SourceSpan) -> Option<SourceSpan> {
        self.options.include_source_positions.then_some(span)
    }

    fn in_root_scope(&self) -> bool {
        self.current == self.scopes.root()
    }

    fn condition_stack(&mut self) -> &mut ValueStack {
        if self.conditions.is_empty() {
            self.conditions.push(ValueStack::default());
        }
        let last = self.conditions.len() - 1;
        &mut self.conditions[last]
    }

    /// Opens a child scope of the current one and makes it current.
    fn enter(&mut self, name: &str, args: Vec<String>) -> Result<ScopeId, CompileErrorKind> {
        let child = self.scopes.new_child(self.current, name, args)?;
        self.current = child;
        self.conditions.push(ValueStack::default());
        Ok(child)
    }

    /// Discards the current scope and returns to its parent.
    fn leave(&mut self) {
        let parent = self.scopes.scope(self.current).parent;
        self.scopes.pop(self.current);
        self.conditions.pop();
        self.current = parent.unwrap_or_else(|| self.scopes.root());
    }

    /// The current scope's mappings as a projector definition.
    fn finish_projector(&mut self, span: SourceSpan) -> ProjectorDefinition {
        ProjectorDefinition {
            name: self.scopes.scope(self.current).name.clone(),
            mapping: self.scopes.take_mappings(self.current),
            meta: self.meta(span),
        }
    }

    // ──────────────────────────────────────────────
    // Root
    // ──────────────────────────────────────────────

    fn compile_root(mut self, root: &Root) -> Result<MappingConfig, CompileError> {
        for item in &root.items {
            match item {
                RootItem::Mapping(m) => self.compile_mapping(m)?,
                RootItem::Conditional(c) => self.compile_conditional(c)?,
                RootItem::ProjectorDef(def) => {
                    let def = self.compile_projector_def(def)?;
                    self.projectors.push(def);
                }
            }
        }

        let post_process = match &root.post_process {
            None => None,
            Some(PostProcessNode::Name { name, .. }) => {
                Some(PostProcess::ProjectorName(name.clone()))
            }
            Some(PostProcessNode::Inline(def)) => Some(PostProcess::ProjectorDefinition(
                self.compile_projector_def(def)?,
            )),
        };

        let root_mapping = self.scopes.take_mappings(self.scopes.root());
        let mut projector = self.projectors;
        projector.append(&mut self.synthesized);
        tracing::debug!(
            projectors = projector.len(),
            root_mappings = root_mapping.len(),
            "compiled mapping program"
        );
        Ok(MappingConfig {
            projector,
            root_mapping,
            post_process,
        })
    }

    // ──────────────────────────────────────────────
    // Projector definitions
    // ──────────────────────────────────────────────

    fn compile_projector_def(
        &mut self,
        def: &ProjectorDef,
    ) -> Result<ProjectorDefinition, CompileError> {
        let name = def
            .name
            .as_deref()
            .ok_or(CompileErrorKind::MissingNode("projector name"))
            .map_err(at(def.span))?;
        let block = def
            .block
            .as_ref()
            .ok_or(CompileErrorKind::MissingNode("projector body"))
            .map_err(at(def.span))?;

        self.enter(name, def.args.clone()).map_err(at(def.span))?;
        let body = self.compile_block_items(&block.items);
        let projector = body.map(|()| self.finish_projector(def.span));
        self.leave();
        projector
    }

    fn compile_block_items(&mut self, items: &[BlockItem]) -> Result<(), CompileError> {
        for item in items {
            match item {
                BlockItem::Mapping(m) => self.compile_mapping(m)?,
                BlockItem::Conditional(c) => self.compile_conditional(c)?,
            }
        }
        Ok(())
    }
}
