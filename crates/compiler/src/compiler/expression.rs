use whistle_ir::{FieldMapping, Source, SourceSpan, Target, ValueSource};

use super::path::path_spec;
use super::{Compiler, FILTER_ELEMENT_NAME};
use crate::call::project;
use crate::error::{at, CompileError, CompileErrorKind};
use crate::tree::{Block, Expression, InputNode, SourceNode};

// ──────────────────────────────────────────────
// Operator tables
// ──────────────────────────────────────────────

fn prefix_builtin(op: &str) -> Option<&'static str> {
    match op {
        "~" => Some("$Not"),
        _ => None,
    }
}

fn postfix_builtin(op: &str) -> Option<&'static str> {
    match op {
        "?" => Some("$IsNotNil"),
        _ => None,
    }
}

fn binary_builtin(op: &str) -> Option<&'static str> {
    Some(match op {
        "-" => "$Sub",
        "+" => "$Sum",
        "*" => "$Mul",
        "/" => "$Div",
        "=" => "$Eq",
        "~=" => "$NEq",
        ">" => "$Gt",
        ">=" => "$GtEq",
        "<" => "$Lt",
        "<=" => "$LtEq",
        "or" => "$Or",
        "and" => "$And",
        _ => return None,
    })
}

fn operand(e: &Option<Box<Expression>>, span: SourceSpan) -> Result<&Expression, CompileError> {
    e.as_deref()
        .ok_or(CompileErrorKind::MissingNode("operand"))
        .map_err(at(span))
}

impl Compiler {
    pub(super) fn compile_expression(&mut self, e: &Expression) -> Result<ValueSource, CompileError> {
        match e {
            Expression::PreOp { span, op, operand: x } => {
                let builtin = prefix_builtin(op)
                    .ok_or_else(|| CompileErrorKind::UnknownOperator {
                        position: "pre",
                        op: op.clone(),
                    })
                    .map_err(at(*span))?;
                let x = self.compile_expression(operand(x, *span)?)?;
                Ok(project(builtin, vec![x]))
            }
            Expression::PostOp { span, op, operand: x } => {
                let builtin = postfix_builtin(op)
                    .ok_or_else(|| CompileErrorKind::UnknownOperator {
                        position: "post",
                        op: op.clone(),
                    })
                    .map_err(at(*span))?;
                let x = self.compile_expression(operand(x, *span)?)?;
                Ok(project(builtin, vec![x]))
            }
            Expression::BiOp { span, op, lhs, rhs } => {
                let builtin = binary_builtin(op)
                    .ok_or_else(|| CompileErrorKind::UnknownOperator {
                        position: "binary",
                        op: op.clone(),
                    })
                    .map_err(at(*span))?;
                let lhs = self.compile_expression(operand(lhs, *span)?)?;
                let rhs = self.compile_expression(operand(rhs, *span)?)?;
                Ok(project(builtin, vec![lhs, rhs]))
            }
            Expression::Projection {
                name,
                array_mod,
                args,
                ..
            } => {
                let args = args
                    .iter()
                    .map(|a| self.compile_source(a))
                    .collect::<Result<Vec<_>, _>>()?;
                let projector = if *array_mod {
                    format!("{}[]", name)
                } else {
                    name.clone()
                };
                Ok(project(projector, args))
            }
            Expression::NoArg { name, .. } => Ok(ValueSource::call(name.clone())),
            Expression::AnonBlock { span, block } => {
                let block = block
                    .as_ref()
                    .ok_or(CompileErrorKind::MissingNode("block"))
                    .map_err(at(*span))?;
                self.compile_anon_block(*span, block)
            }
            Expression::Source(source) => self.compile_source(source),
        }
    }

    /// A block used as a value becomes a synthesized projector with no
    /// parameters, called in place.
    fn compile_anon_block(&mut self, span: SourceSpan, block: &Block) -> Result<ValueSource, CompileError> {
        let name = format!("$anonblock_{}_{}", span.start.line, span.start.column);
        let scope = self.enter(&name, Vec::new()).map_err(at(span))?;
        let body = self.compile_block_items(&block.items);
        let result = body.and_then(|()| {
            let def = self.finish_projector(span);
            self.synthesized.push(def);
            self.scopes
                .generate_callsite(scope, Vec::new())
                .map_err(at(span))
        });
        self.leave();
        result
    }

    pub(super) fn compile_source(&mut self, s: &SourceNode) -> Result<ValueSource, CompileError> {
        match s {
            SourceNode::ConstNum { span, text } => {
                let n: f64 = text
                    .trim()
                    .parse()
                    .map_err(|_| CompileError::new(*span, CompileErrorKind::InvalidNumber(text.clone())))?;
                Ok(ValueSource::from_source(Source::ConstNum(n)))
            }
            SourceNode::ConstStr { text, .. } => {
                Ok(ValueSource::from_source(Source::ConstString(unquote(text))))
            }
            SourceNode::ConstBool { value, .. } => {
                Ok(ValueSource::from_source(Source::ConstBool(*value)))
            }
            SourceNode::Input(input) => self.compile_input(input),
            SourceNode::Projection {
                span,
                expression,
                array_mod,
            } => {
                let inner = self.compile_expression(operand(expression, *span)?)?;
                let mut vs = ValueSource::from_source(Source::ProjectedValue(Box::new(inner)));
                if *array_mod {
                    vs.projector.push_str("[]");
                }
                Ok(vs)
            }
        }
    }

    fn compile_input(&mut self, input: &InputNode) -> Result<ValueSource, CompileError> {
        let span = input.span;
        let path = input
            .path
            .as_ref()
            .ok_or(CompileErrorKind::MissingNode("source path"))
            .map_err(at(span))?;
        let mut p = path_spec(path).map_err(at(span))?;

        if p.arg.is_empty() && self.in_root_scope() {
            return Err(CompileError::new(
                span,
                CompileErrorKind::RootSourceAccess {
                    field: format!("{}{}", p.index, p.field),
                },
            ));
        }
        if input.filter.is_some() || input.array_mod {
            // Iterate element-wise.
            p.field = format!("{}[]", p.field.strip_suffix("[]").unwrap_or(&p.field));
        }

        let name = format!("{}{}", p.arg, p.index);
        let source = if (p.arg.is_empty() && !p.index.is_empty()) || input.dest {
            // Index targets are never declared, so read them from the output directly.
            Source::FromDestination(format!("{}{}{}", p.index, p.arg, p.field))
        } else if input.var {
            self.scopes
                .read_var(self.current, &name, &p.field)
                .ok_or_else(|| CompileError::new(span, CompileErrorKind::UnknownVariable { name: p.arg.clone() }))?
        } else {
            self.scopes
                .read_input(self.current, &name, &p.field)
                .ok_or_else(|| CompileError::new(span, CompileErrorKind::UnknownInput { name: p.arg.clone() }))?
        };
        let value = ValueSource::from_source(source);

        match &input.filter {
            Some(predicate) => self.compile_filter(span, predicate, value, input.array_mod),
            None => Ok(value),
        }
    }

    /// `x[where pred]` becomes a one-parameter projector whose single
    /// mapping copies the element through when `pred` holds, called on
    /// every element of `x`.
    fn compile_filter(
        &mut self,
        span: SourceSpan,
        predicate: &Expression,
        elements: ValueSource,
        array_mod: bool,
    ) -> Result<ValueSource, CompileError> {
        let name = format!("$filter_{}_{}", span.start.line, span.start.column);
        let scope = self
            .enter(&name, vec![FILTER_ELEMENT_NAME.to_string()])
            .map_err(at(span))?;

        let body = self.compile_expression(predicate).and_then(|condition| {
            let element = self
                .scopes
                .read_input(scope, FILTER_ELEMENT_NAME, "")
                .ok_or_else(|| {
                    CompileError::new(
                        span,
                        CompileErrorKind::UnknownInput {
                            name: FILTER_ELEMENT_NAME.to_string(),
                        },
                    )
                })?;
            let mut mapping = FieldMapping::new(
                Target::Field(".".to_string()),
                ValueSource::from_source(element),
            );
            mapping.condition = Some(condition);
            mapping.meta = self.meta(span);
            self.scopes.add_mapping(scope, mapping);
            let def = self.finish_projector(span);
            self.synthesized.push(def);
            self.scopes
                .generate_callsite(scope, vec![elements])
                .map_err(at(span))
        });
        self.leave();

        let mut call = body?;
        if array_mod {
            call.projector.push_str("[]");
        }
        Ok(call)
    }
}

/// Strips the surrounding quotes and unescapes `\"` and `\\`.
fn unquote(text: &str) -> String {
    let inner = text
        .strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .filter(|_| text.len() >= 2)
        .unwrap_or(text);
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some(next @ ('"' | '\\')) => out.push(next),
                Some(other) => {
                    out.push('\\');
                    out.push(other);
                }
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}
