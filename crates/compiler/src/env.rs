//! Lexical scopes.
//!
//! Every projector body (user-defined, filter or anonymous block) compiles
//! in its own scope. Scopes live in an arena and refer to their parent by
//! [`ScopeId`]; a child is discarded with [`Scopes::pop`] once its body is
//! compiled. Names a child reads from an enclosing scope are forwarded to
//! it as extra trailing arguments at the callsite.

use std::collections::BTreeSet;

use whistle_ir::{FieldMapping, Source, ValueSource};
use whistle_json::join_path;

use crate::call::project;
use crate::error::CompileErrorKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ScopeId(usize);

#[derive(Debug, Clone, Default)]
pub struct Scope {
    /// Empty for the root scope.
    pub name: String,
    pub parent: Option<ScopeId>,
    vars: BTreeSet<String>,
    targets: BTreeSet<String>,
    /// Parameter names by position.
    args: Vec<String>,
    /// Names read from the parent, by forwarding slot.
    inputs_from_parent: Vec<String>,
    mappings: Vec<FieldMapping>,
}

impl Scope {
    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn inputs_from_parent(&self) -> &[String] {
        &self.inputs_from_parent
    }

    pub fn mappings(&self) -> &[FieldMapping] {
        &self.mappings
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

#[derive(Debug, Clone)]
pub struct Scopes {
    arena: Vec<Scope>,
}

impl Scopes {
    /// An arena holding just the root scope.
    pub fn new(root_name: &str, root_args: &[&str]) -> Scopes {
        Scopes {
            arena: vec![Scope {
                name: root_name.to_string(),
                args: root_args.iter().map(|a| a.to_string()).collect(),
                ..Scope::default()
            }],
        }
    }

    pub fn root(&self) -> ScopeId {
        ScopeId(0)
    }

    /// # Panics
    ///
    /// If `id` was discarded by [`Scopes::pop`].
    pub fn scope(&self, id: ScopeId) -> &Scope {
        &self.arena[id.0]
    }

    fn scope_mut(&mut self, id: ScopeId) -> &mut Scope {
        &mut self.arena[id.0]
    }

    pub fn new_child(
        &mut self,
        parent: ScopeId,
        name: &str,
        args: Vec<String>,
    ) -> Result<ScopeId, CompileErrorKind> {
        for (i, arg) in args.iter().enumerate() {
            if args[..i].contains(arg) {
                return Err(CompileErrorKind::DuplicateArg {
                    projector: name.to_string(),
                    name: arg.clone(),
                });
            }
        }
        let id = ScopeId(self.arena.len());
        tracing::trace!(scope = name, parent = parent.0, "entering scope");
        self.arena.push(Scope {
            name: name.to_string(),
            parent: Some(parent),
            args,
            ..Scope::default()
        });
        Ok(id)
    }

    /// Discards `id` (and anything opened after it) and returns its record.
    pub fn pop(&mut self, id: ScopeId) -> Option<Scope> {
        if id.0 == 0 || id.0 >= self.arena.len() {
            return None;
        }
        let mut removed = self.arena.split_off(id.0);
        tracing::trace!(scope = %removed[0].name, "leaving scope");
        Some(removed.swap_remove(0))
    }

    pub fn declare_var(&mut self, id: ScopeId, name: &str) -> Result<(), CompileErrorKind> {
        let scope = self.scope_mut(id);
        if scope.args.iter().any(|a| a == name) {
            return Err(CompileErrorKind::VarShadowsArg {
                name: name.to_string(),
            });
        }
        scope.vars.insert(name.to_string());
        Ok(())
    }

    pub fn declare_target(&mut self, id: ScopeId, name: &str) {
        self.scope_mut(id).targets.insert(name.to_string());
    }

    pub fn add_mapping(&mut self, id: ScopeId, mapping: FieldMapping) {
        self.scope_mut(id).mappings.push(mapping);
    }

    pub fn take_mappings(&mut self, id: ScopeId) -> Vec<FieldMapping> {
        std::mem::take(&mut self.scope_mut(id).mappings)
    }

    /// A read of local variable `name`, if declared in this very scope.
    pub fn read_var(&self, id: ScopeId, name: &str, field: &str) -> Option<Source> {
        self.scope(id)
            .vars
            .contains(name)
            .then(|| Source::FromLocalVar(join_path([name, field])))
    }

    /// Resolves `name` as a variable, parameter or declared target of this
    /// scope, then of its ancestors.
    ///
    /// A name found in an ancestor is assigned a forwarding slot the first
    /// time it is read and becomes argument `args + slot + 1`.
    pub fn read_input(&mut self, id: ScopeId, name: &str, field: &str) -> Option<Source> {
        if let Some(var) = self.read_var(id, name, field) {
            return Some(var);
        }
        let scope = self.scope(id);
        if let Some(i) = scope.args.iter().position(|a| a == name) {
            return Some(Source::from_input(i + 1, field));
        }
        if scope.targets.contains(name) {
            return Some(Source::FromDestination(join_path([name, field])));
        }
        let parent = scope.parent?;

        if !scope.inputs_from_parent.iter().any(|n| n == name)
            && self.read_input(parent, name, field).is_some()
        {
            tracing::trace!(input = name, scope = %self.scope(id).name, "forwarding input from parent");
            self.scope_mut(id).inputs_from_parent.push(name.to_string());
        }

        let scope = self.scope(id);
        let slot = scope.inputs_from_parent.iter().position(|n| n == name)?;
        Some(Source::from_input(scope.args.len() + slot + 1, field))
    }

    /// A call to scope `id` with `args`, followed by every input it
    /// forwards from its parent, resolved in the parent.
    pub fn generate_callsite(
        &mut self,
        id: ScopeId,
        args: Vec<ValueSource>,
    ) -> Result<ValueSource, CompileErrorKind> {
        let scope = self.scope(id);
        if args.len() != scope.args.len() {
            return Err(CompileErrorKind::WrongArgCount {
                projector: scope.name.clone(),
                expected: scope.args.len(),
                got: args.len(),
            });
        }
        let name = scope.name.clone();
        let forwarded = scope.inputs_from_parent.clone();
        let mut all = args;
        if let Some(parent) = scope.parent {
            for input in forwarded {
                let source = self
                    .read_input(parent, &input, "")
                    .ok_or(CompileErrorKind::UnknownInput { name: input })?;
                all.push(ValueSource::from_source(source));
            }
        }
        Ok(project(name, all))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scopes() -> Scopes {
        Scopes::new("", &["$root"])
    }

    #[test]
    fn var_may_not_shadow_argument() {
        let mut s = scopes();
        let f = s
            .new_child(s.root(), "f", vec!["a".into(), "b".into()])
            .unwrap();
        assert_eq!(
            s.declare_var(f, "b"),
            Err(CompileErrorKind::VarShadowsArg { name: "b".into() })
        );
        assert!(s.declare_var(f, "c").is_ok());
    }

    #[test]
    fn duplicate_parameter_names_rejected() {
        let mut s = scopes();
        assert!(matches!(
            s.new_child(s.root(), "f", vec!["a".into(), "a".into()]),
            Err(CompileErrorKind::DuplicateArg { .. })
        ));
    }

    #[test]
    fn resolution_order_var_arg_target() {
        let mut s = scopes();
        let f = s.new_child(s.root(), "f", vec!["x".into()]).unwrap();
        s.declare_target(f, "out");
        s.declare_var(f, "v").unwrap();

        assert_eq!(
            s.read_input(f, "v", "a"),
            Some(Source::FromLocalVar("v.a".into()))
        );
        assert_eq!(s.read_input(f, "x", "a[0]"), Some(Source::from_input(1, "a[0]")));
        assert_eq!(
            s.read_input(f, "out", ""),
            Some(Source::FromDestination("out".into()))
        );
    }

    #[test]
    fn unknown_name_is_not_found() {
        let mut s = scopes();
        let f = s.new_child(s.root(), "f", vec![]).unwrap();
        assert_eq!(s.read_input(f, "nope", ""), None);
        assert!(s.scope(f).inputs_from_parent().is_empty());
    }

    #[test]
    fn parent_inputs_are_forwarded_in_first_use_order() {
        let mut s = scopes();
        let outer = s
            .new_child(s.root(), "outer", vec!["p".into(), "q".into()])
            .unwrap();
        let inner = s.new_child(outer, "$anon", vec!["e".into()]).unwrap();

        assert_eq!(s.read_input(inner, "q", "f"), Some(Source::from_input(2, "f")));
        assert_eq!(s.read_input(inner, "p", ""), Some(Source::from_input(3, "")));
        // Re-reading keeps the slot.
        assert_eq!(s.read_input(inner, "q", ""), Some(Source::from_input(2, "")));
        assert_eq!(s.scope(inner).inputs_from_parent(), ["q", "p"]);

        let call = s
            .generate_callsite(inner, vec![ValueSource::from_source(Source::ConstBool(true))])
            .unwrap();
        assert_eq!(call.projector, "$anon");
        assert_eq!(call.source, Some(Source::ConstBool(true)));
        assert_eq!(
            call.additional_arg,
            vec![
                ValueSource::from_source(Source::from_input(2, "")),
                ValueSource::from_source(Source::from_input(1, "")),
            ]
        );
    }

    #[test]
    fn forwarding_chains_through_grandparents() {
        let mut s = scopes();
        let outer = s.new_child(s.root(), "outer", vec!["p".into()]).unwrap();
        let mid = s.new_child(outer, "mid", vec![]).unwrap();
        let inner = s.new_child(mid, "inner", vec![]).unwrap();

        assert_eq!(s.read_input(inner, "p", ""), Some(Source::from_input(1, "")));
        assert_eq!(s.scope(mid).inputs_from_parent(), ["p"]);

        let call = s.generate_callsite(inner, vec![]).unwrap();
        assert_eq!(call.source, Some(Source::from_input(1, "")));
    }

    #[test]
    fn callsite_checks_argument_count() {
        let mut s = scopes();
        let f = s.new_child(s.root(), "f", vec!["a".into()]).unwrap();
        assert_eq!(
            s.generate_callsite(f, vec![]),
            Err(CompileErrorKind::WrongArgCount {
                projector: "f".into(),
                expected: 1,
                got: 0
            })
        );
    }

    #[test]
    fn pop_discards_child_and_descendants() {
        let mut s = scopes();
        let a = s.new_child(s.root(), "a", vec![]).unwrap();
        let _b = s.new_child(a, "b", vec![]).unwrap();
        let popped = s.pop(a).unwrap();
        assert_eq!(popped.name, "a");
        let c = s.new_child(s.root(), "c", vec![]).unwrap();
        assert_eq!(c, a);
        assert!(s.pop(s.root()).is_none());
    }
}
