//! Scopes, variables and the temp-variable table
//!
//! Scopes form a tree rooted at each compilation unit and are never
//! destroyed: the code generator walks the same tree after semantics.

use std::collections::HashMap;

use log::trace;

use crate::frontend::ast::{Ast, AstId, AstKind, UnOp};
use crate::middle::{CompilationContext, FnId, PackageId, PolymorphId};
use crate::types::{TypeId, TypeKind, ANY};
use crate::utils::{Error, Result, Span};

/// Unique identifier for a scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(pub usize);

/// Unique identifier for a variable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(pub usize);

/// Kind of scope
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    /// Top level of a file or package
    Root,
    /// Function body (or polymorph instantiation)
    Function,
    /// Loop body
    Loop,
    /// Conditional branch or anonymous block
    Simple,
}

/// Variables to release when a scope exits, in release order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReleasePlan {
    pub vars: Vec<VarId>,
}

/// A lexical scope
#[derive(Debug, Clone)]
pub struct Scope {
    pub id: ScopeId,
    pub kind: ScopeKind,
    pub parent: Option<ScopeId>,
    /// Declaration order, temps included
    pub vars: Vec<VarId>,
    names: HashMap<String, VarId>,
    types: HashMap<String, TypeId>,
    /// Temps allocated in this scope, keyed by originating node
    pub temps: HashMap<AstId, VarId>,
    /// Active polymorph instantiation (function scopes only)
    pub polymorph: Option<PolymorphId>,
    pub fn_id: Option<FnId>,
    pub return_type: Option<TypeId>,
    pub package: Option<PackageId>,
    pub release: ReleasePlan,
}

impl Scope {
    fn new(id: ScopeId, kind: ScopeKind, parent: Option<ScopeId>, package: Option<PackageId>) -> Self {
        Self {
            id,
            kind,
            parent,
            vars: Vec::new(),
            names: HashMap::new(),
            types: HashMap::new(),
            temps: HashMap::new(),
            polymorph: None,
            fn_id: None,
            return_type: None,
            package,
            release: ReleasePlan::default(),
        }
    }

    /// Local binding of a variable name
    pub fn local_var(&self, name: &str) -> Option<VarId> {
        self.names.get(name).copied()
    }

    /// Local binding of a type name
    pub fn local_type(&self, name: &str) -> Option<TypeId> {
        self.types.get(name).copied()
    }
}

/// Per-variable flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VarFlags {
    /// Anonymous spill slot for an intermediate value
    pub temp: bool,
    pub initialized: bool,
    /// `::` constants, functions and `use` proxies
    pub constant: bool,
    /// Bound to a C symbol by its own name
    pub ext: bool,
    /// Lives at the root of a unit
    pub global: bool,
    pub param: bool,
    /// Names a function declaration
    pub function: bool,
}

/// What a variable name stands for
#[derive(Debug, Clone)]
pub enum Binding {
    /// Has its own storage
    Storage,
    /// Stands for another expression (`use`, constants); has no storage
    Alias(Box<Ast>),
    /// An imported package
    Package(PackageId),
}

/// A declared binding
#[derive(Debug, Clone)]
pub struct Var {
    pub id: VarId,
    pub name: String,
    pub ty: TypeId,
    pub flags: VarFlags,
    pub binding: Binding,
    pub scope: ScopeId,
    pub fn_id: Option<FnId>,
    /// C symbol for external bindings
    pub c_name: Option<String>,
    pub span: Span,
}

impl Var {
    pub fn is_proxy(&self) -> bool {
        matches!(self.binding, Binding::Alias(_))
    }

    pub fn proxy(&self) -> Option<&Ast> {
        match &self.binding {
            Binding::Alias(ast) => Some(ast),
            _ => None,
        }
    }

    pub fn package(&self) -> Option<PackageId> {
        match self.binding {
            Binding::Package(p) => Some(p),
            _ => None,
        }
    }
}

// ==================== Scope Operations ====================

impl CompilationContext {
    pub fn scope(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.0]
    }

    pub fn scope_mut(&mut self, id: ScopeId) -> &mut Scope {
        &mut self.scopes[id.0]
    }

    pub fn var(&self, id: VarId) -> &Var {
        &self.vars[id.0]
    }

    pub fn var_mut(&mut self, id: VarId) -> &mut Var {
        &mut self.vars[id.0]
    }

    /// Create a child scope; packages are inherited from the parent
    pub fn new_scope(&mut self, parent: Option<ScopeId>, kind: ScopeKind) -> ScopeId {
        let id = ScopeId(self.scopes.len());
        let package = parent.and_then(|p| self.scopes[p.0].package);
        self.scopes.push(Scope::new(id, kind, parent, package));
        id
    }

    pub fn new_fn_scope(&mut self, parent: ScopeId, fn_id: Option<FnId>, ret: Option<TypeId>) -> ScopeId {
        let id = self.new_scope(Some(parent), ScopeKind::Function);
        let scope = self.scope_mut(id);
        scope.fn_id = fn_id;
        scope.return_type = ret;
        id
    }

    pub fn new_loop_scope(&mut self, parent: ScopeId) -> ScopeId {
        self.new_scope(Some(parent), ScopeKind::Loop)
    }

    /// Declare a variable in `scope`. Names must be unique per scope.
    pub fn add_var(
        &mut self,
        scope: ScopeId,
        name: &str,
        ty: TypeId,
        flags: VarFlags,
        span: Span,
    ) -> Result<VarId> {
        if self.scope(scope).names.contains_key(name) {
            return Err(Error::DuplicateDefinition { name: name.to_string(), span });
        }
        let id = self.push_var(scope, name, ty, flags, span);
        self.scope_mut(scope).names.insert(name.to_string(), id);
        Ok(id)
    }

    /// Declare a variable that is not reachable by name (methods, loop counters)
    pub fn add_hidden_var(&mut self, scope: ScopeId, name: &str, ty: TypeId, flags: VarFlags, span: Span) -> VarId {
        self.push_var(scope, name, ty, flags, span)
    }

    fn push_var(&mut self, scope: ScopeId, name: &str, ty: TypeId, mut flags: VarFlags, span: Span) -> VarId {
        let id = VarId(self.vars.len());
        flags.global = self.scope(scope).kind == ScopeKind::Root;
        self.vars.push(Var {
            id,
            name: name.to_string(),
            ty,
            flags,
            binding: Binding::Storage,
            scope,
            fn_id: None,
            c_name: None,
            span,
        });
        self.scope_mut(scope).vars.push(id);
        id
    }

    /// Walk up from `scope` looking for `name`.
    ///
    /// Once a `Function` boundary has been crossed only constants and globals
    /// are visible; finding an outer function's mutable local is an error.
    /// Unresolved names fall back to the builtin scope.
    pub fn lookup_var(&self, scope: ScopeId, name: &str, span: Span) -> Result<Option<VarId>> {
        let mut current = Some(scope);
        let mut crossed_function = false;
        while let Some(id) = current {
            let s = self.scope(id);
            if let Some(var) = s.local_var(name) {
                let v = self.var(var);
                if crossed_function && !v.flags.constant && !v.flags.global {
                    return Err(Error::CapturedLocal { name: name.to_string(), span });
                }
                return Ok(Some(var));
            }
            if s.kind == ScopeKind::Function {
                crossed_function = true;
            }
            current = s.parent;
        }
        Ok(self.scope(self.builtin_scope).local_var(name))
    }

    /// Look up a name in `scope` only
    pub fn lookup_local_var(&self, scope: ScopeId, name: &str) -> Option<VarId> {
        self.scope(scope).local_var(name)
    }

    /// Bind a type name in `scope`
    pub fn define_type(&mut self, scope: ScopeId, name: &str, ty: TypeId, span: Span) -> Result<()> {
        if self.scope(scope).types.contains_key(name) {
            return Err(Error::DuplicateDefinition { name: name.to_string(), span });
        }
        self.scope_mut(scope).types.insert(name.to_string(), ty);
        Ok(())
    }

    /// Search the type-definition chain; bound polymorph parameters shadow outer names
    pub fn lookup_type(&self, scope: ScopeId, name: &str) -> Option<TypeId> {
        let mut current = Some(scope);
        while let Some(id) = current {
            if let Some(ty) = self.lookup_local_type(id, name) {
                return Some(ty);
            }
            current = self.scope(id).parent;
        }
        self.scope(self.builtin_scope).local_type(name)
    }

    /// Type bound directly in `scope` (polymorph parameters first)
    pub fn lookup_local_type(&self, scope: ScopeId, name: &str) -> Option<TypeId> {
        let s = self.scope(scope);
        if let Some(pid) = s.polymorph {
            if let Some(ty) = self.polymorph(pid).def(name) {
                return Some(ty);
            }
        }
        s.local_type(name)
    }

    /// Innermost enclosing function scope, if any
    pub fn enclosing_fn_scope(&self, scope: ScopeId) -> Option<ScopeId> {
        let mut current = Some(scope);
        while let Some(id) = current {
            if self.scope(id).kind == ScopeKind::Function {
                return Some(id);
            }
            current = self.scope(id).parent;
        }
        None
    }

    /// Innermost enclosing loop scope that does not cross a function boundary
    pub fn enclosing_loop_scope(&self, scope: ScopeId) -> Option<ScopeId> {
        let mut current = Some(scope);
        while let Some(id) = current {
            match self.scope(id).kind {
                ScopeKind::Loop => return Some(id),
                ScopeKind::Function | ScopeKind::Root => return None,
                ScopeKind::Simple => current = self.scope(id).parent,
            }
        }
        None
    }

    /// Root scope of the unit `scope` belongs to
    pub fn root_of(&self, scope: ScopeId) -> ScopeId {
        let mut current = scope;
        while let Some(parent) = self.scope(current).parent {
            current = parent;
        }
        current
    }

    // ==================== Temp Variables ====================

    /// Allocate (once) the temp slot for the node `key`
    pub fn allocate_ast_temp_var(&mut self, scope: ScopeId, key: AstId, ty: TypeId, span: Span) -> VarId {
        if let Some(existing) = self.temp_index.get(&key) {
            return *existing;
        }
        let flags = VarFlags { temp: true, initialized: true, ..VarFlags::default() };
        let name = format!("<temp {}>", key.0);
        let id = self.push_var(scope, &name, ty, flags, span);
        self.vars[id.0].flags.global = false;
        self.scope_mut(scope).temps.insert(key, id);
        self.temp_index.insert(key, id);
        trace!("temp {:?} for node {} in scope {}", id, key.0, scope.0);
        id
    }

    /// The temp slot allocated for node `key`
    pub fn find_temp_var(&self, key: AstId) -> Option<VarId> {
        self.temp_index.get(&key).copied()
    }

    /// Temp holding the value `ast` evaluates to. A cast to `any` keeps the
    /// wrapped value in its temp, not the wrapper.
    pub fn value_temp(&self, ast: &Ast) -> Option<VarId> {
        if matches!(ast.kind, AstKind::Cast { .. }) && ast.ty == Some(ANY) {
            return None;
        }
        self.find_temp_var(ast.id)
    }

    /// Whether the emitted C can take the address of `ast`. Sequence
    /// `length`/`data` members, string characters and members of
    /// temporaries are values only.
    pub fn is_addressable(&self, ast: &Ast) -> bool {
        match &ast.kind {
            AstKind::Ident { var: Some(v), .. } => !self.var(*v).flags.function,
            AstKind::Ident { .. } => true,
            AstKind::Unop { op: UnOp::Deref, .. } => true,
            AstKind::Dot { object, .. } => match object.ty.map(|t| self.resolved_kind(t)) {
                Some(TypeKind::Ref { .. }) => true,
                Some(TypeKind::Struct(_)) => self.is_addressable(object),
                _ => false,
            },
            AstKind::Index { object, .. } => match object.ty.map(|t| self.resolved_kind(t)) {
                Some(TypeKind::StaticArray { .. }) => self.is_addressable(object),
                Some(TypeKind::Basic { .. }) | None => false,
                Some(_) => true,
            },
            _ => false,
        }
    }

    // ==================== Release Plans ====================

    /// Record which variables `scope` releases on exit: every variable with
    /// storage and a dynamic type, in reverse declaration order. Globals are
    /// never released and externs are not ours to free.
    pub fn compute_release_plan(&mut self, scope: ScopeId) {
        let s = self.scope(scope);
        let vars: Vec<VarId> = s
            .vars
            .iter()
            .rev()
            .copied()
            .filter(|v| {
                let var = self.var(*v);
                matches!(var.binding, Binding::Storage)
                    && !var.flags.ext
                    && !var.flags.function
                    && (!var.flags.global || var.flags.temp)
                    && self.is_dynamic(var.ty)
            })
            .collect();
        self.scope_mut(scope).release = ReleasePlan { vars };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{S64, STRING};

    #[test]
    fn test_lookup_stops_at_function_boundary() {
        let mut ctx = CompilationContext::new();
        let root = ctx.new_scope(None, ScopeKind::Root);
        let outer_fn = ctx.new_fn_scope(root, None, None);
        let local = VarFlags { initialized: true, ..VarFlags::default() };
        ctx.add_var(outer_fn, "x", S64, local, Span::dummy()).unwrap();
        let constant = VarFlags { constant: true, ..VarFlags::default() };
        ctx.add_var(outer_fn, "K", S64, constant, Span::dummy()).unwrap();
        let inner_fn = ctx.new_fn_scope(outer_fn, None, None);
        let block = ctx.new_scope(Some(inner_fn), ScopeKind::Simple);

        assert!(matches!(
            ctx.lookup_var(block, "x", Span::dummy()),
            Err(Error::CapturedLocal { .. })
        ));
        assert!(ctx.lookup_var(block, "K", Span::dummy()).unwrap().is_some());
        assert!(ctx.lookup_var(block, "missing", Span::dummy()).unwrap().is_none());
    }

    #[test]
    fn test_globals_are_visible_from_functions() {
        let mut ctx = CompilationContext::new();
        let root = ctx.new_scope(None, ScopeKind::Root);
        let g = ctx.add_var(root, "g", S64, VarFlags::default(), Span::dummy()).unwrap();
        assert!(ctx.var(g).flags.global);
        let f = ctx.new_fn_scope(root, None, None);
        assert_eq!(ctx.lookup_var(f, "g", Span::dummy()).unwrap(), Some(g));
    }

    #[test]
    fn test_builtins_resolve_last() {
        let mut ctx = CompilationContext::new();
        let root = ctx.new_scope(None, ScopeKind::Root);
        assert!(ctx.lookup_var(root, "println", Span::dummy()).unwrap().is_some());
        assert_eq!(ctx.lookup_type(root, "int"), Some(S64));
    }

    #[test]
    fn test_duplicate_definition() {
        let mut ctx = CompilationContext::new();
        let root = ctx.new_scope(None, ScopeKind::Root);
        ctx.add_var(root, "a", S64, VarFlags::default(), Span::dummy()).unwrap();
        assert!(matches!(
            ctx.add_var(root, "a", S64, VarFlags::default(), Span::dummy()),
            Err(Error::DuplicateDefinition { .. })
        ));
    }

    #[test]
    fn test_temps_keyed_by_node() {
        let mut ctx = CompilationContext::new();
        let root = ctx.new_scope(None, ScopeKind::Root);
        let f = ctx.new_fn_scope(root, None, None);
        let a = ctx.allocate_ast_temp_var(f, AstId(10), STRING, Span::dummy());
        let again = ctx.allocate_ast_temp_var(f, AstId(10), STRING, Span::dummy());
        let b = ctx.allocate_ast_temp_var(f, AstId(11), STRING, Span::dummy());
        assert_eq!(a, again);
        assert_ne!(a, b);
        assert_eq!(ctx.find_temp_var(AstId(11)), Some(b));
        assert_eq!(ctx.scope(f).vars, vec![a, b]);
    }

    #[test]
    fn test_release_plan_is_reverse_order_of_dynamic_locals() {
        let mut ctx = CompilationContext::new();
        let root = ctx.new_scope(None, ScopeKind::Root);
        let f = ctx.new_fn_scope(root, None, None);
        let s1 = ctx.add_var(f, "s1", STRING, VarFlags::default(), Span::dummy()).unwrap();
        ctx.add_var(f, "n", S64, VarFlags::default(), Span::dummy()).unwrap();
        let s2 = ctx.add_var(f, "s2", STRING, VarFlags::default(), Span::dummy()).unwrap();
        ctx.compute_release_plan(f);
        assert_eq!(ctx.scope(f).release.vars, vec![s2, s1]);
    }
}
