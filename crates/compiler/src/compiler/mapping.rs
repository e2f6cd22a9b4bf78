use whistle_ir::{FieldMapping, SourceSpan, Target};

use super::path::{join_target, path_spec, token_text};
use super::Compiler;
use crate::call::project;
use crate::error::{at, CompileError, CompileErrorKind};
use crate::tree::{ConditionBlock, Mapping, Path, TargetNode};

impl Compiler {
    /// Compiles `m` into the current scope.
    ///
    /// The value is compiled before the target so that `var x: x` reads the
    /// `x` visible before this declaration.
    pub(super) fn compile_mapping(&mut self, m: &Mapping) -> Result<(), CompileError> {
        let expression = m
            .expression
            .as_ref()
            .ok_or(CompileErrorKind::MissingNode("mapping value"))
            .map_err(at(m.span))?;
        let target_node = m
            .target
            .as_ref()
            .ok_or(CompileErrorKind::MissingNode("mapping target"))
            .map_err(at(m.span))?;

        let value_source = self.compile_expression(expression)?;
        let target = self.compile_target(target_node)?;
        let inline = match &m.condition {
            Some(c) => vec![self.compile_expression(c)?],
            None => Vec::new(),
        };
        let condition = self.condition_stack().and(&inline);

        let mapping = FieldMapping {
            value_source,
            target,
            condition,
            meta: self.meta(m.span),
            target_meta: self.meta(target_node.span()),
        };
        self.scopes.add_mapping(self.current, mapping);
        Ok(())
    }

    /// `if` pushes the condition for the duration of its block, `else`
    /// pushes its negation.
    pub(super) fn compile_conditional(&mut self, c: &ConditionBlock) -> Result<(), CompileError> {
        let expression = c
            .condition
            .as_ref()
            .ok_or(CompileErrorKind::MissingNode("condition"))
            .map_err(at(c.span))?;
        let then = c
            .then
            .as_ref()
            .ok_or(CompileErrorKind::MissingNode("condition body"))
            .map_err(at(c.span))?;
        let condition = self.compile_expression(expression)?;

        self.condition_stack().push(condition.clone());
        let result = self.compile_block_items(&then.items);
        self.condition_stack().pop();
        result?;

        if let Some(otherwise) = &c.otherwise {
            self.condition_stack().push(project("$Not", vec![condition]));
            let result = self.compile_block_items(&otherwise.items);
            self.condition_stack().pop();
            result?;
        }
        Ok(())
    }

    pub(super) fn compile_target(&mut self, target: &TargetNode) -> Result<Target, CompileError> {
        let span = target.span();
        match target {
            TargetNode::Var { path, .. } => {
                let p = path_spec(required_path(path, span)?).map_err(at(span))?;
                if p.arg.is_empty() {
                    return Err(CompileError::new(span, CompileErrorKind::MissingVarName));
                }
                self.scopes
                    .declare_var(self.current, &p.arg)
                    .map_err(at(span))?;
                Ok(Target::LocalVar(join_target([p.arg.as_str(), "", p.field.as_str()])))
            }
            TargetNode::Obj { name, .. } => Ok(Target::Object(token_text(name))),
            TargetNode::RootField { path, .. } => {
                if self.in_root_scope() {
                    return Err(CompileError::new(span, CompileErrorKind::RedundantRoot));
                }
                let p = path_spec(required_path(path, span)?).map_err(at(span))?;
                self.scopes
                    .declare_target(self.current, &format!("{}{}", p.arg, p.index));
                Ok(Target::RootField(join_target([p.arg.as_str(), p.index.as_str(), p.field.as_str()])))
            }
            TargetNode::This { .. } => Ok(Target::Field(".".to_string())),
            TargetNode::Field { path, .. } => {
                let p = path_spec(required_path(path, span)?).map_err(at(span))?;
                self.scopes
                    .declare_target(self.current, &format!("{}{}", p.arg, p.index));
                Ok(Target::Field(join_target([p.arg.as_str(), p.index.as_str(), p.field.as_str()])))
            }
        }
    }
}

fn required_path(path: &Option<Path>, span: SourceSpan) -> Result<&Path, CompileError> {
    path.as_ref()
        .ok_or(CompileErrorKind::MissingNode("target path"))
        .map_err(at(span))
}
