//! Polymorph records: one concrete instantiation of a generic function

use log::debug;

use crate::frontend::ast::Ast;
use crate::middle::{CompilationContext, FnId, ScopeId, VarId};
use crate::types::TypeId;
use crate::utils::{Error, Result, Span};

/// Unique identifier for a polymorph instantiation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PolymorphId(pub usize);

/// One instantiation of a generic function
#[derive(Debug, Clone)]
pub struct Polymorph {
    pub id: PolymorphId,
    pub fn_id: FnId,
    /// Concrete argument types that selected this instantiation
    pub arg_types: Vec<TypeId>,
    /// Private function scope holding the parameter bindings
    pub scope: ScopeId,
    /// `$T` bindings, in binding order; never rebound
    pub defs: Vec<(String, TypeId)>,
    /// Analyzed copy of the function body
    pub body: Option<Ast>,
    pub params: Vec<VarId>,
    pub ret: TypeId,
    pub ty: Option<TypeId>,
}

impl Polymorph {
    pub fn def(&self, name: &str) -> Option<TypeId> {
        self.defs.iter().find(|(n, _)| n == name).map(|(_, t)| *t)
    }
}

impl CompilationContext {
    pub fn polymorph(&self, id: PolymorphId) -> &Polymorph {
        &self.polymorphs[id.0]
    }

    pub fn polymorph_mut(&mut self, id: PolymorphId) -> &mut Polymorph {
        &mut self.polymorphs[id.0]
    }

    /// Create an empty instantiation of `fn_id` with its own function scope
    pub fn new_polymorph(&mut self, fn_id: FnId, parent: ScopeId, arg_types: Vec<TypeId>) -> PolymorphId {
        let id = PolymorphId(self.polymorphs.len());
        let scope = self.new_fn_scope(parent, Some(fn_id), None);
        self.scope_mut(scope).polymorph = Some(id);
        self.polymorphs.push(Polymorph {
            id,
            fn_id,
            arg_types,
            scope,
            defs: Vec::new(),
            body: None,
            params: Vec::new(),
            ret: crate::types::VOID,
            ty: None,
        });
        self.fns[fn_id.0].polymorphs.push(id);
        debug!(
            "polymorph {} of '{}' ({} so far)",
            id.0,
            self.fns[fn_id.0].name,
            self.fns[fn_id.0].polymorphs.len()
        );
        id
    }

    /// Nearest polymorph context active at `scope`
    pub fn active_polymorph(&self, scope: ScopeId) -> Option<PolymorphId> {
        let mut current = Some(scope);
        while let Some(id) = current {
            if let Some(p) = self.scope(id).polymorph {
                return Some(p);
            }
            current = self.scope(id).parent;
        }
        None
    }

    /// Bind `$name` to `ty` in the polymorph context active at `scope`
    pub fn define_polymorph(&mut self, scope: ScopeId, name: &str, ty: TypeId, span: Span) -> Result<()> {
        let Some(pid) = self.active_polymorph(scope) else {
            return Err(Error::semantic(
                format!("type parameter ${} outside of a polymorphic function", name),
                span,
            ));
        };
        let poly = self.polymorph_mut(pid);
        if poly.def(name).is_some() {
            return Err(Error::internal(format!("type parameter ${} bound twice", name)));
        }
        poly.defs.push((name.to_string(), ty));
        Ok(())
    }

    /// Existing instantiation of `fn_id` whose whole argument tuple equals `arg_types`
    pub fn check_for_existing_polymorph(&mut self, fn_id: FnId, arg_types: &[TypeId]) -> Option<PolymorphId> {
        let candidates = self.fns[fn_id.0].polymorphs.clone();
        for pid in candidates {
            let cached = self.polymorph(pid).arg_types.clone();
            if cached.len() != arg_types.len() {
                continue;
            }
            let all_equal = cached
                .iter()
                .zip(arg_types)
                .all(|(a, b)| self.check_type(*a, *b));
            if all_equal {
                return Some(pid);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::ast::FnDecl;
    use crate::middle::ScopeKind;
    use crate::types::{TypeKind, S64, STRING};

    fn dummy_fn(ctx: &mut CompilationContext) -> FnId {
        ctx.fns.push(FnDecl {
            name: "id".to_string(),
            params: Vec::new(),
            ret: None,
            body: None,
            ext: false,
            span: Span::dummy(),
            var: None,
            scope: None,
            ty: None,
            polymorphic: true,
            polymorphs: Vec::new(),
            param_vars: Vec::new(),
            method_of: None,
        });
        FnId(ctx.fns.len() - 1)
    }

    #[test]
    fn test_define_polymorph_requires_context() {
        let mut ctx = CompilationContext::new();
        let root = ctx.new_scope(None, ScopeKind::Root);
        assert!(ctx.define_polymorph(root, "T", S64, Span::dummy()).is_err());

        let f = dummy_fn(&mut ctx);
        let pid = ctx.new_polymorph(f, root, vec![S64]);
        let scope = ctx.polymorph(pid).scope;
        let inner = ctx.new_scope(Some(scope), ScopeKind::Simple);
        ctx.define_polymorph(inner, "T", S64, Span::dummy()).unwrap();
        assert_eq!(ctx.lookup_type(inner, "T"), Some(S64));
        assert_eq!(ctx.lookup_type(root, "T"), None);
    }

    #[test]
    fn test_existing_polymorph_compares_whole_tuple() {
        let mut ctx = CompilationContext::new();
        let root = ctx.new_scope(None, ScopeKind::Root);
        let f = dummy_fn(&mut ctx);
        let first = ctx.new_polymorph(f, root, vec![S64, STRING]);
        let ref_a = ctx.new_type(TypeKind::Ref { inner: S64, owned: false });
        let second = ctx.new_polymorph(f, root, vec![S64, ref_a]);

        let ref_b = ctx.new_type(TypeKind::Ref { inner: S64, owned: false });
        assert_eq!(ctx.check_for_existing_polymorph(f, &[S64, STRING]), Some(first));
        assert_eq!(ctx.check_for_existing_polymorph(f, &[S64, ref_b]), Some(second));
        assert_eq!(ctx.check_for_existing_polymorph(f, &[S64, S64]), None);
        assert_eq!(ctx.polymorph_count(f), 2);
    }
}
