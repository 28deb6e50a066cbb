//! The compilation context
//!
//! Every registry a compilation needs (type arena, scopes, variables,
//! functions, polymorph instances, packages, the used-types list) lives here
//! and is threaded through the passes by `&mut` reference, so independent
//! compilations never share state.

use std::collections::HashMap;

use crate::frontend::ast::{Ast, AstId, AstIdGen, FnDecl};
use crate::middle::{Polymorph, ScopeId, ScopeKind, VarFlags, VarId};
use crate::stdlib::BuiltinRegistry;
use crate::types::{builtin_kinds, builtin_names, TypeId, TypeKind};
use crate::utils::{FileId, SourceMap, Span};

/// Index of a function declaration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FnId(pub usize);

/// Index of a loaded package
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PackageId(pub usize);

/// An imported package: one root scope shared by all of its files
#[derive(Debug, Clone)]
pub struct Package {
    pub id: PackageId,
    pub name: String,
    /// Resolved path the package was loaded from
    pub key: String,
    pub scope: ScopeId,
    /// Indices into `CompilationContext::units`
    pub units: Vec<usize>,
}

/// One parsed file and the root scope its top level lives in
#[derive(Debug, Clone)]
pub struct Unit {
    pub package: Option<PackageId>,
    pub file: FileId,
    pub scope: ScopeId,
    pub ast: Option<Ast>,
}

/// A function bound to a type by an `impl` block
#[derive(Debug, Clone)]
pub struct MethodEntry {
    pub target: TypeId,
    pub name: String,
    pub var: VarId,
}

/// A generic struct instantiation
#[derive(Debug, Clone)]
pub struct Reification {
    pub base: TypeId,
    pub args: Vec<TypeId>,
    pub result: TypeId,
}

/// All state of one compilation
#[derive(Debug)]
pub struct CompilationContext {
    pub types: Vec<TypeKind>,
    pub scopes: Vec<crate::middle::Scope>,
    pub vars: Vec<crate::middle::Var>,
    pub fns: Vec<FnDecl>,
    pub polymorphs: Vec<Polymorph>,
    pub packages: Vec<Package>,
    pub(crate) package_index: HashMap<String, PackageId>,
    /// Canonical types the code generator declares, in registration order
    pub used_types: Vec<TypeId>,
    /// Any registered type id -> its canonical entry in `used_types`
    pub(crate) used_index: HashMap<TypeId, TypeId>,
    pub(crate) reified: Vec<Reification>,
    /// `Params` node -> reified struct
    pub(crate) params_cache: HashMap<TypeId, TypeId>,
    pub(crate) temp_index: HashMap<AstId, VarId>,
    pub(crate) needs_temp_memo: HashMap<AstId, bool>,
    /// Files in load order; packages precede the units importing them
    pub units: Vec<Unit>,
    /// `#include` headers in first-seen order
    pub includes: Vec<String>,
    pub methods: Vec<MethodEntry>,
    pub builtin_scope: ScopeId,
    pub builtins: BuiltinRegistry,
    /// User `main` of the main unit
    pub main_fn: Option<VarId>,
    pub ast_ids: AstIdGen,
    pub files: SourceMap,
}

impl CompilationContext {
    pub fn new() -> Self {
        let mut ctx = Self {
            types: builtin_kinds(),
            scopes: Vec::new(),
            vars: Vec::new(),
            fns: Vec::new(),
            polymorphs: Vec::new(),
            packages: Vec::new(),
            package_index: HashMap::new(),
            used_types: Vec::new(),
            used_index: HashMap::new(),
            reified: Vec::new(),
            params_cache: HashMap::new(),
            temp_index: HashMap::new(),
            needs_temp_memo: HashMap::new(),
            units: Vec::new(),
            includes: Vec::new(),
            methods: Vec::new(),
            builtin_scope: ScopeId(0),
            builtins: BuiltinRegistry::new(),
            main_fn: None,
            ast_ids: AstIdGen::new(),
            files: SourceMap::new(),
        };
        ctx.builtin_scope = ctx.new_scope(None, ScopeKind::Root);
        ctx.register_builtins();
        ctx
    }

    /// Bind builtin type names and functions in the builtin scope
    fn register_builtins(&mut self) {
        let scope = self.builtin_scope;
        for (name, ty) in builtin_names() {
            // Names in the static table are unique
            let _ = self.define_type(scope, name, *ty, Span::dummy());
        }

        let funcs: Vec<_> = self.builtins.all().cloned().collect();
        for func in funcs {
            let args = func.params.iter().map(|(_, t)| *t).collect();
            let ty = self.new_type(TypeKind::Func { args, ret: func.ret_type, variadic: func.variadic });
            let flags = VarFlags {
                constant: true,
                ext: true,
                initialized: true,
                function: true,
                ..VarFlags::default()
            };
            if let Ok(var) = self.add_var(scope, &func.name, ty, flags, Span::dummy()) {
                self.var_mut(var).c_name = Some(func.c_name.clone());
            }
        }
    }

    pub fn fresh_ast_id(&mut self) -> AstId {
        self.ast_ids.fresh()
    }

    pub fn fn_decl(&self, id: FnId) -> &FnDecl {
        &self.fns[id.0]
    }

    pub fn fn_decl_mut(&mut self, id: FnId) -> &mut FnDecl {
        &mut self.fns[id.0]
    }

    pub fn package(&self, id: PackageId) -> &Package {
        &self.packages[id.0]
    }

    /// Package previously loaded from `key`
    pub fn find_package(&self, key: &str) -> Option<PackageId> {
        self.package_index.get(key).copied()
    }

    /// Register a package and its root scope before its files are processed
    pub fn new_package(&mut self, name: &str, key: &str) -> PackageId {
        let id = PackageId(self.packages.len());
        let scope = self.new_scope(None, ScopeKind::Root);
        self.scope_mut(scope).package = Some(id);
        self.packages.push(Package {
            id,
            name: name.to_string(),
            key: key.to_string(),
            scope,
            units: Vec::new(),
        });
        self.package_index.insert(key.to_string(), id);
        id
    }

    /// Exported root binding of a package: names starting with `_` stay private
    pub fn package_member(&self, package: PackageId, name: &str) -> Option<VarId> {
        if name.starts_with('_') {
            return None;
        }
        self.lookup_local_var(self.package(package).scope, name)
    }

    /// Record a `#include` once
    pub fn add_include(&mut self, header: &str) {
        if !self.includes.iter().any(|h| h == header) {
            self.includes.push(header.to_string());
        }
    }

    /// Method `name` bound to a type equal to `target`
    pub fn find_method(&mut self, target: TypeId, name: &str) -> Option<VarId> {
        let candidates: Vec<(TypeId, VarId)> = self
            .methods
            .iter()
            .filter(|m| m.name == name)
            .map(|m| (m.target, m.var))
            .collect();
        candidates
            .into_iter()
            .find(|(t, _)| self.check_type(*t, target))
            .map(|(_, v)| v)
    }

    /// Number of instantiations created for a function (tests and logging)
    pub fn polymorph_count(&self, fn_id: FnId) -> usize {
        self.fns[fn_id.0].polymorphs.len()
    }
}

impl Default for CompilationContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{S64, STRING};

    #[test]
    fn test_new_context_has_builtins() {
        let ctx = CompilationContext::new();
        let print = ctx.lookup_local_var(ctx.builtin_scope, "print");
        assert!(print.is_some());
        let var = ctx.var(print.unwrap_or(VarId(0)));
        assert!(var.flags.ext && var.flags.function);
        assert_eq!(var.c_name.as_deref(), Some("_verse_print"));
        assert_eq!(ctx.lookup_type(ctx.builtin_scope, "string"), Some(STRING));
    }

    #[test]
    fn test_independent_contexts() {
        let mut a = CompilationContext::new();
        let b = CompilationContext::new();
        a.new_type(TypeKind::Ref { inner: S64, owned: false });
        assert_eq!(a.types.len(), b.types.len() + 1);
    }

    #[test]
    fn test_package_members_hide_private_names() {
        let mut ctx = CompilationContext::new();
        let pkg = ctx.new_package("math", "/lib/math");
        let scope = ctx.package(pkg).scope;
        ctx.add_var(scope, "pi", S64, VarFlags::default(), Span::dummy()).unwrap();
        ctx.add_var(scope, "_cache", S64, VarFlags::default(), Span::dummy()).unwrap();
        assert!(ctx.package_member(pkg, "pi").is_some());
        assert!(ctx.package_member(pkg, "_cache").is_none());
        assert_eq!(ctx.find_package("/lib/math"), Some(pkg));
    }
}
