//! Semantic Analysis for Verse
//!
//! Two passes over every compilation unit:
//! - `first_pass` wires scopes and declarations (types, functions, globals,
//!   imports) without evaluating any expression;
//! - `parse_semantics` type-checks, folds constants, inserts coercions,
//!   allocates temps and instantiates polymorphic functions on demand.
//!
//! Every visit consumes a node and returns its (possibly rewritten)
//! replacement.

mod call;
mod coerce;
mod expr;
mod first_pass;
mod literal;
mod stmt;

use log::debug;

use crate::frontend::ast::{Ast, TypeExpr, TypeSlot};
use crate::frontend::package::{package_name, PackageLoader};
use crate::frontend::parser::parse_source;
use crate::middle::{Binding, CompilationContext, PackageId, ScopeId, ScopeKind, Unit, VarFlags};
use crate::types::{StructType, TypeId, TypeKind, VOID};
use crate::utils::{Error, Result, Span};

/// Semantic analyzer over one compilation context
pub struct Analyzer<'a> {
    pub(crate) ctx: &'a mut CompilationContext,
    loader: &'a mut dyn PackageLoader,
}

/// Parse and analyze `source` as the main unit, loading its imports through
/// `loader`. On success the context holds everything code generation needs.
pub fn analyze_program(
    ctx: &mut CompilationContext,
    loader: &mut dyn PackageLoader,
    source: &str,
    file_name: &str,
) -> Result<()> {
    let mut analyzer = Analyzer::new(ctx, loader);
    analyzer.load_main(source, file_name)?;
    analyzer.analyze_units()
}

impl<'a> Analyzer<'a> {
    pub fn new(ctx: &'a mut CompilationContext, loader: &'a mut dyn PackageLoader) -> Self {
        Self { ctx, loader }
    }

    /// Parse the main file and run the first pass over it (and, through its
    /// imports, over every package it pulls in)
    pub fn load_main(&mut self, source: &str, file_name: &str) -> Result<ScopeId> {
        let file = self.ctx.files.add(file_name);
        let mut ast = parse_source(source, file, &mut self.ctx.ast_ids)?;
        let root = self.ctx.new_scope(None, ScopeKind::Root);
        self.first_pass_block(&mut ast, root)?;

        if let Some(main) = self.ctx.lookup_local_var(root, "main") {
            if self.ctx.var(main).flags.function {
                self.ctx.main_fn = Some(main);
            }
        }
        self.ctx.units.push(Unit { package: None, file, scope: root, ast: Some(ast) });
        Ok(root)
    }

    /// Pass 2 over every unit: packages in load order, the main unit last
    pub fn analyze_units(&mut self) -> Result<()> {
        for index in 0..self.ctx.units.len() {
            let Some(ast) = self.ctx.units[index].ast.take() else {
                continue;
            };
            debug!("analyzing {}", self.ctx.files.name(self.ctx.units[index].file));
            let ast = self.analyze_block(ast)?;
            self.ctx.units[index].ast = Some(ast);
        }
        Ok(())
    }

    // ==================== Packages ====================

    /// Load (once) the package at `path` and bind its name in `scope`
    pub(crate) fn import_package(&mut self, path: &str, scope: ScopeId, span: Span) -> Result<PackageId> {
        let key = self.loader.resolve(path, span)?;
        let package = match self.ctx.find_package(&key) {
            Some(existing) => existing,
            None => {
                let name = package_name(path).to_string();
                let package = self.ctx.new_package(&name, &key);
                debug!("loading package '{}' from {}", name, key);
                let package_scope = self.ctx.package(package).scope;
                for source in self.loader.read(&key)? {
                    let file = self.ctx.files.add(&source.name);
                    let mut ast = parse_source(&source.text, file, &mut self.ctx.ast_ids)?;
                    self.first_pass_block(&mut ast, package_scope)?;
                    let unit = self.ctx.units.len();
                    self.ctx.units.push(Unit {
                        package: Some(package),
                        file,
                        scope: package_scope,
                        ast: Some(ast),
                    });
                    self.ctx.packages[package.0].units.push(unit);
                }
                package
            }
        };

        let name = self.ctx.package(package).name.clone();
        match self.ctx.lookup_local_var(scope, &name) {
            Some(var) if self.ctx.var(var).package() == Some(package) => {}
            _ => {
                let flags = VarFlags { constant: true, initialized: true, ..VarFlags::default() };
                let var = self.ctx.add_var(scope, &name, VOID, flags, span)?;
                self.ctx.var_mut(var).binding = Binding::Package(package);
            }
        }
        Ok(package)
    }

    // ==================== Type Expressions ====================

    /// Convert a syntactic type in `scope`. Names stay lazy (`Alias`), so
    /// declarations may refer to types declared later in the same block.
    pub(crate) fn type_from_expr(&mut self, expr: &TypeExpr, scope: ScopeId) -> Result<TypeId> {
        let kind = match expr {
            TypeExpr::Named(name, _) => TypeKind::Alias { name: name.clone(), scope },
            TypeExpr::Qualified { package, name, .. } => TypeKind::External {
                package: package.clone(),
                name: name.clone(),
                scope,
            },
            TypeExpr::Poly(name, _) => TypeKind::Polydef { name: name.clone(), scope },
            TypeExpr::Ref { inner, owned, .. } => {
                let inner = self.type_from_expr(inner, scope)?;
                TypeKind::Ref { inner, owned: *owned }
            }
            TypeExpr::Array { inner, owned, .. } => {
                let inner = self.type_from_expr(inner, scope)?;
                TypeKind::Array { inner, owned: *owned }
            }
            TypeExpr::StaticArray { inner, length, .. } => {
                let inner = self.type_from_expr(inner, scope)?;
                TypeKind::StaticArray { inner, length: *length }
            }
            TypeExpr::Func { args, ret, variadic, .. } => {
                let mut converted = Vec::with_capacity(args.len());
                for arg in args {
                    converted.push(self.type_from_expr(arg, scope)?);
                }
                let ret = match ret {
                    Some(r) => self.type_from_expr(r, scope)?,
                    None => VOID,
                };
                TypeKind::Func { args: converted, ret, variadic: *variadic }
            }
            TypeExpr::Struct { members, span } => {
                TypeKind::Struct(self.struct_from_members(None, Vec::new(), members, scope, *span)?)
            }
            TypeExpr::Params { base, args, .. } => {
                let base = self.type_from_expr(base, scope)?;
                let mut converted = Vec::with_capacity(args.len());
                for arg in args {
                    converted.push(self.type_from_expr(arg, scope)?);
                }
                TypeKind::Params { base, args: converted }
            }
            TypeExpr::Resolved(ty, _) => return Ok(*ty),
        };
        Ok(self.ctx.new_type(kind))
    }

    pub(crate) fn struct_from_members(
        &mut self,
        name: Option<String>,
        params: Vec<String>,
        members: &[(String, TypeExpr)],
        scope: ScopeId,
        span: Span,
    ) -> Result<StructType> {
        let mut converted: Vec<(String, TypeId)> = Vec::with_capacity(members.len());
        for (member, ty) in members {
            if converted.iter().any(|(m, _)| m == member) {
                return Err(Error::DuplicateDefinition { name: member.clone(), span });
            }
            converted.push((member.clone(), self.type_from_expr(ty, scope)?));
        }
        Ok(StructType {
            name,
            members: converted,
            generic: !params.is_empty(),
            params,
            generic_base: None,
        })
    }

    /// Convert a slot once; later visits reuse the stored type
    pub(crate) fn slot_type(&mut self, slot: &mut TypeSlot, scope: ScopeId) -> Result<TypeId> {
        if let Some(ty) = slot.ty {
            return Ok(ty);
        }
        let ty = self.type_from_expr(&slot.expr, scope)?;
        slot.ty = Some(ty);
        Ok(ty)
    }

    /// Convert, resolve and register a slot's type
    pub(crate) fn concrete_slot_type(&mut self, slot: &mut TypeSlot, scope: ScopeId) -> Result<TypeId> {
        let span = slot.expr.span();
        let ty = self.slot_type(slot, scope)?;
        let resolved = self.concrete(ty, span)?;
        slot.ty = Some(resolved);
        Ok(resolved)
    }

    /// Resolve a type that values will be stored in and register it;
    /// generic templates are not such a type
    pub(crate) fn concrete(&mut self, ty: TypeId, span: Span) -> Result<TypeId> {
        let resolved = self.ctx.resolve(ty, span)?;
        if let Some(s) = self.ctx.kind(resolved).as_struct() {
            if s.generic {
                let name = s.name.clone().unwrap_or_default();
                return Err(Error::UnreifiedGeneric { name, span });
            }
        }
        self.ctx.register_type(resolved, span)?;
        Ok(resolved)
    }

    /// Register a node's type for emission
    pub(crate) fn register(&mut self, ast: &Ast) -> Result<()> {
        if let Some(ty) = ast.ty {
            self.ctx.register_type(ty, ast.span)?;
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::frontend::ast::{AstKind, FuncRef, Literal};
    use crate::frontend::package::MemoryPackageLoader;
    use crate::middle::{FnId, VarId};
    use crate::types::{S64, STRING};

    pub(crate) fn analyze_with(src: &str, loader: &mut MemoryPackageLoader) -> Result<CompilationContext> {
        let mut ctx = CompilationContext::new();
        analyze_program(&mut ctx, loader, src, "main.vs")?;
        Ok(ctx)
    }

    pub(crate) fn analyze(src: &str) -> Result<CompilationContext> {
        analyze_with(src, &mut MemoryPackageLoader::new())
    }

    fn main_stmts(ctx: &CompilationContext) -> &[Ast] {
        let unit = ctx.units.last().unwrap();
        match &unit.ast.as_ref().unwrap().kind {
            AstKind::Block { stmts, .. } => stmts,
            _ => panic!("unit is not a block"),
        }
    }

    fn fn_named(ctx: &CompilationContext, name: &str) -> FnId {
        FnId(ctx.fns.iter().position(|f| f.name == name).unwrap())
    }

    fn fn_body_stmts<'c>(ctx: &'c CompilationContext, name: &str) -> &'c [Ast] {
        let f = ctx.fn_decl(fn_named(ctx, name));
        match &f.body.as_ref().unwrap().kind {
            AstKind::Block { stmts, .. } => stmts,
            _ => panic!("body is not a block"),
        }
    }

    #[test]
    fn test_constant_folding_in_global_initializer() {
        let ctx = analyze("x: int = 1 + 2;").unwrap();
        let stmts = main_stmts(&ctx);
        // Global initializers are split off into an init assignment
        assert!(matches!(&stmts[0].kind, AstKind::Decl(d) if d.init.is_none()));
        match &stmts[1].kind {
            AstKind::Assign { rhs, init: true, .. } => {
                assert!(matches!(rhs.kind, AstKind::Literal(Literal::Int(3))));
                assert_eq!(rhs.ty, Some(S64));
            }
            other => panic!("expected init assignment, got {:?}", other),
        }
    }

    #[test]
    fn test_polymorph_memoization() {
        let ctx = analyze(
            "fn id(x: $T) -> T { return x; }
             fn main() { a := id(1); b := id(\"s\"); c := id(2); }",
        )
        .unwrap();
        let id = fn_named(&ctx, "id");
        assert_eq!(ctx.polymorph_count(id), 2);
        let first = ctx.fn_decl(id).polymorphs[0];
        assert_eq!(ctx.polymorph(first).ret, S64);
        let second = ctx.fn_decl(id).polymorphs[1];
        assert_eq!(ctx.polymorph(second).ret, STRING);
    }

    #[test]
    fn test_generic_struct_instances_are_distinct() {
        let mut ctx = analyze(
            "type Box(T) struct { v: T; }
             fn main() { a := Box(int){v = 5}; b := Box(string){v = \"hi\"}; c := Box(int){v = 6}; }",
        )
        .unwrap();
        let boxes: Vec<TypeId> = ctx
            .used_types
            .iter()
            .copied()
            .filter(|t| matches!(ctx.kind(*t), TypeKind::Struct(s) if s.generic_base.is_some()))
            .collect();
        assert_eq!(boxes.len(), 2);
        assert!(!ctx.check_type(boxes[0], boxes[1]));
    }

    #[test]
    fn test_ownership_requires_new() {
        assert!(analyze("fn main() { r: &'int = new int; }").is_ok());
        let err = analyze("fn main() { x: int = 1; other := &x; r2: &'int = other; }").unwrap_err();
        assert!(matches!(err, Error::OwnershipViolation { .. }), "{:?}", err);
        let err = analyze("fn main() { r: &'int = new int; r = null; }").unwrap_err();
        assert!(matches!(err, Error::OwnershipViolation { .. }), "{:?}", err);
    }

    #[test]
    fn test_owned_inference_downgrades() {
        let ctx = analyze(
            "fn make() -> &'int { return new int; }
             fn main() { a := new int; b := make(); }",
        )
        .unwrap();
        let stmts = fn_body_stmts(&ctx, "main");
        let var_of = |ast: &Ast| match &ast.kind {
            AstKind::Decl(d) => d.var.unwrap_or(VarId(0)),
            _ => panic!("not a decl"),
        };
        assert!(ctx.is_owned(ctx.var(var_of(&stmts[0])).ty));
        assert!(!ctx.is_owned(ctx.var(var_of(&stmts[1])).ty));
    }

    #[test]
    fn test_string_concat_allocates_temp() {
        let ctx = analyze("fn main() { s: string = \"a\"; s = s + \"b\"; }").unwrap();
        let stmts = fn_body_stmts(&ctx, "main");
        match &stmts[1].kind {
            AstKind::Assign { rhs, .. } => {
                assert!(matches!(rhs.kind, AstKind::Binop { .. }));
                assert!(ctx.find_temp_var(rhs.id).is_some());
            }
            other => panic!("expected assignment, got {:?}", other),
        }
    }

    #[test]
    fn test_for_by_reference_binds_ref() {
        let ctx = analyze(
            "type P struct { name: string; }
             fn main() {
                 arr := [2]P{P{name = \"a\"}, P{name = \"b\"}};
                 for &x in arr { }
                 for y in arr { }
             }",
        )
        .unwrap();
        let stmts = fn_body_stmts(&ctx, "main");
        let item_ty = |ast: &Ast| match &ast.kind {
            AstKind::For(f) => ctx.var(f.item_var.unwrap_or(VarId(0))).ty,
            _ => panic!("not a for loop"),
        };
        assert!(matches!(ctx.resolved_kind(item_ty(&stmts[1])), TypeKind::Ref { owned: false, .. }));
        assert!(matches!(ctx.resolved_kind(item_ty(&stmts[2])), TypeKind::Struct(_)));
    }

    #[test]
    fn test_packages_load_once_and_bind_name() {
        let mut loader = MemoryPackageLoader::new();
        loader.add_file("lib/math", "math.vs", "pi :: 3; fn twice(x: int) -> int { return x * 2; } _hidden :: 1;");
        let ctx = analyze_with(
            "#import \"lib/math\";\n#import \"lib/math\";\nfn main() { y := math.twice(math.pi); }",
            &mut loader,
        )
        .unwrap();
        assert_eq!(ctx.packages.len(), 1);
        assert_eq!(ctx.units.len(), 2);
        assert_eq!(ctx.packages[0].name, "math");

        let err = analyze_with("#import \"lib/math\";\nfn main() { y := math._hidden; }", &mut loader).unwrap_err();
        assert!(matches!(err, Error::UndefinedVariable { .. }), "{:?}", err);
    }

    #[test]
    fn test_registered_functions_leave_the_tree() {
        let ctx = analyze("fn main() { }").unwrap();
        assert!(matches!(main_stmts(&ctx)[0].kind, AstKind::FuncDecl(FuncRef::Registered(_))));
        assert!(ctx.main_fn.is_some());
    }

    #[test]
    fn test_type_from_expr_is_lazy() {
        let mut ctx = CompilationContext::new();
        let mut loader = MemoryPackageLoader::new();
        let mut analyzer = Analyzer::new(&mut ctx, &mut loader);
        let root = analyzer.ctx.new_scope(None, ScopeKind::Root);
        let ty = analyzer
            .type_from_expr(&TypeExpr::Named("Later".to_string(), Span::dummy()), root)
            .unwrap();
        let target = analyzer.ctx.new_type(TypeKind::Alias { name: "int".to_string(), scope: root });
        analyzer.ctx.define_type(root, "Later", target, Span::dummy()).unwrap();
        assert_eq!(analyzer.ctx.resolve(ty, Span::dummy()).unwrap(), S64);
    }
}
