//! First pass: declarations
//!
//! Wires every block to its scope and binds the names a block declares
//! (imports, types, enums, functions, methods, globals) before any
//! expression is looked at, so uses may precede declarations.

use log::trace;

use crate::frontend::ast::{Ast, AstKind, Directive, FnDecl, FuncRef, TypeExpr};
use crate::middle::{FnId, MethodEntry, ScopeId, ScopeKind, VarFlags};
use crate::types::{EnumType, TypeId, TypeKind, S64, VOID};
use crate::utils::{Error, Result};

use super::Analyzer;

impl<'a> Analyzer<'a> {
    /// Declare everything `block` binds in `scope`, which becomes the block's scope
    pub(crate) fn first_pass_block(&mut self, block: &mut Ast, scope: ScopeId) -> Result<()> {
        let AstKind::Block { stmts, scope: block_scope } = &mut block.kind else {
            return Err(Error::internal("first pass over a non-block node"));
        };
        *block_scope = Some(scope);
        let root = self.ctx.scope(scope).kind == ScopeKind::Root;

        for stmt in stmts.iter_mut() {
            if let AstKind::Import { path, package } = &mut stmt.kind {
                if !root {
                    return Err(Error::semantic("#import is only allowed at file scope", stmt.span));
                }
                *package = Some(self.import_package(path, scope, stmt.span)?);
            }
        }
        for stmt in stmts.iter_mut() {
            match &mut stmt.kind {
                AstKind::TypeDecl { .. } => self.declare_type(stmt, scope)?,
                AstKind::EnumDecl(_) => self.declare_enum(stmt, scope)?,
                _ => {}
            }
        }
        for stmt in stmts.iter_mut() {
            self.first_pass_stmt(stmt, scope, root)?;
        }
        Ok(())
    }

    /// `type Name T;` binds a lazy alias; `type Name(A, B) struct {...}` a template
    fn declare_type(&mut self, stmt: &mut Ast, scope: ScopeId) -> Result<()> {
        let span = stmt.span;
        let AstKind::TypeDecl { name, params, target } = &mut stmt.kind else {
            return Ok(());
        };
        let ty = match &target.expr {
            TypeExpr::Struct { members, span } => {
                let members = members.clone();
                let s = self.struct_from_members(Some(name.clone()), params.clone(), &members, scope, *span)?;
                self.ctx.new_type(TypeKind::Struct(s))
            }
            _ if !params.is_empty() => {
                return Err(Error::semantic(format!("only structs can take type parameters ('{}')", name), span));
            }
            expr => {
                let expr = expr.clone();
                self.type_from_expr(&expr, scope)?
            }
        };
        target.ty = Some(ty);
        self.ctx.define_type(scope, name, ty, span)?;
        trace!("declared type '{}' as {}", name, ty.0);
        Ok(())
    }

    /// Create the enum's type with provisional values `0..n`; explicit
    /// values are evaluated by the second pass
    fn declare_enum(&mut self, stmt: &mut Ast, scope: ScopeId) -> Result<()> {
        let span = stmt.span;
        let AstKind::EnumDecl(decl) = &mut stmt.kind else {
            return Ok(());
        };
        let inner = match &mut decl.inner {
            Some(slot) => self.slot_type(slot, scope)?,
            None => S64,
        };
        let mut names: Vec<String> = Vec::with_capacity(decl.members.len());
        for (member, _) in &decl.members {
            if names.contains(member) {
                return Err(Error::DuplicateDefinition { name: format!("{}.{}", decl.name, member), span });
            }
            names.push(member.clone());
        }
        let values = (0..names.len() as i64).collect();
        let ty = self.ctx.new_type(TypeKind::Enum(EnumType { name: decl.name.clone(), inner, names, values }));
        decl.ty = Some(ty);
        self.ctx.define_type(scope, &decl.name, ty, span)
    }

    fn first_pass_stmt(&mut self, stmt: &mut Ast, scope: ScopeId, root: bool) -> Result<()> {
        let span = stmt.span;
        match &mut stmt.kind {
            AstKind::FuncDecl(FuncRef::Parsed(_)) => {
                let AstKind::FuncDecl(FuncRef::Parsed(decl)) = std::mem::replace(&mut stmt.kind, AstKind::Break)
                else {
                    return Err(Error::internal("function declaration vanished"));
                };
                let fid = self.register_function(*decl, scope, None)?;
                stmt.kind = AstKind::FuncDecl(FuncRef::Registered(fid));
            }
            AstKind::Impl { target, methods } => {
                let target_ty = self.slot_type(target, scope)?;
                for method in methods.iter_mut() {
                    let AstKind::FuncDecl(FuncRef::Parsed(_)) = &method.kind else {
                        continue;
                    };
                    let AstKind::FuncDecl(FuncRef::Parsed(decl)) =
                        std::mem::replace(&mut method.kind, AstKind::Break)
                    else {
                        return Err(Error::internal("method declaration vanished"));
                    };
                    let name = decl.name.clone();
                    if self.ctx.find_method(target_ty, &name).is_some() {
                        return Err(Error::DuplicateDefinition { name, span: method.span });
                    }
                    let fid = self.register_function(*decl, scope, Some(target_ty))?;
                    let var = self
                        .ctx
                        .fn_decl(fid)
                        .var
                        .ok_or_else(|| Error::internal("method registered without a binding"))?;
                    self.ctx.methods.push(MethodEntry { target: target_ty, name, var });
                    method.kind = AstKind::FuncDecl(FuncRef::Registered(fid));
                }
            }
            AstKind::Decl(decl) if root => {
                let ty = match &mut decl.ty {
                    Some(slot) => self.slot_type(slot, scope)?,
                    None => VOID,
                };
                let flags = VarFlags {
                    constant: decl.constant,
                    ext: decl.ext,
                    initialized: decl.ext,
                    ..VarFlags::default()
                };
                let var = self.ctx.add_var(scope, &decl.name, ty, flags, span)?;
                if decl.ext {
                    self.ctx.var_mut(var).c_name = Some(decl.name.clone());
                }
                decl.var = Some(var);
            }
            AstKind::Directive(Directive::Include(header)) => self.ctx.add_include(header),
            AstKind::Conditional { then, otherwise, .. } => {
                let then_scope = self.ctx.new_scope(Some(scope), ScopeKind::Simple);
                self.first_pass_block(then, then_scope)?;
                if let Some(otherwise) = otherwise {
                    let else_scope = self.ctx.new_scope(Some(scope), ScopeKind::Simple);
                    self.first_pass_block(otherwise, else_scope)?;
                }
            }
            AstKind::While { body, .. } => {
                let body_scope = self.ctx.new_loop_scope(scope);
                self.first_pass_block(body, body_scope)?;
            }
            AstKind::For(for_loop) => {
                let body_scope = self.ctx.new_loop_scope(scope);
                self.first_pass_block(&mut for_loop.body, body_scope)?;
            }
            AstKind::AnonScope { body } => {
                let body_scope = self.ctx.new_scope(Some(scope), ScopeKind::Simple);
                self.first_pass_block(body, body_scope)?;
            }
            _ => {}
        }
        Ok(())
    }

    /// Move a function declaration into the context and bind its name.
    ///
    /// Parameter and return types stay lazy until the second pass; bodies of
    /// polymorphic functions are left untouched as the template every
    /// instantiation clones.
    pub(crate) fn register_function(
        &mut self,
        mut decl: FnDecl,
        scope: ScopeId,
        method_of: Option<TypeId>,
    ) -> Result<FnId> {
        let polymorphic = decl.params.iter().any(|p| p.ty.expr.has_poly())
            || decl.ret.as_ref().map_or(false, |r| r.expr.has_poly());
        if polymorphic && decl.is_variadic() {
            return Err(Error::semantic(
                format!("polymorphic function '{}' cannot be variadic", decl.name),
                decl.span,
            ));
        }
        if polymorphic && decl.ext {
            return Err(Error::semantic(
                format!("external function '{}' cannot be polymorphic", decl.name),
                decl.span,
            ));
        }

        let fid = FnId(self.ctx.fns.len());
        let fn_scope = self.ctx.new_fn_scope(scope, Some(fid), None);
        let mut args = Vec::with_capacity(decl.params.len());
        for param in decl.params.iter_mut() {
            args.push(self.slot_type(&mut param.ty, fn_scope)?);
        }
        let ret = match &mut decl.ret {
            Some(slot) => self.slot_type(slot, fn_scope)?,
            None => VOID,
        };
        self.ctx.scope_mut(fn_scope).return_type = Some(ret);
        let variadic = decl.is_variadic();
        let ty = self.ctx.new_type(TypeKind::Func { args: args.clone(), ret, variadic });

        let flags = VarFlags {
            constant: true,
            function: true,
            initialized: true,
            ext: decl.ext,
            ..VarFlags::default()
        };
        let var = match method_of {
            Some(_) => self.ctx.add_hidden_var(scope, &decl.name, ty, flags, decl.span),
            None => self.ctx.add_var(scope, &decl.name, ty, flags, decl.span)?,
        };
        self.ctx.var_mut(var).fn_id = Some(fid);
        if decl.ext {
            self.ctx.var_mut(var).c_name = Some(decl.name.clone());
        }

        if !polymorphic && !decl.ext {
            for (param, arg) in decl.params.iter().zip(args) {
                let ty = if param.variadic { self.ctx.array_of(arg, false) } else { arg };
                let flags = VarFlags { param: true, initialized: true, ..VarFlags::default() };
                let pvar = self.ctx.add_var(fn_scope, &param.name, ty, flags, param.span)?;
                decl.param_vars.push(pvar);
            }
        }

        decl.var = Some(var);
        decl.scope = Some(fn_scope);
        decl.ty = Some(ty);
        decl.polymorphic = polymorphic;
        decl.method_of = method_of;
        let body = decl.body.take();
        trace!("registered function '{}' as {}", decl.name, fid.0);
        self.ctx.fns.push(decl);

        if let Some(mut body) = body {
            if !polymorphic {
                self.first_pass_block(&mut body, fn_scope)?;
            }
            self.ctx.fns[fid.0].body = Some(body);
        }
        Ok(fid)
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::analyze;
    use super::*;

    #[test]
    fn test_types_may_be_used_before_declaration() {
        assert!(analyze("fn main() { p := P{x = 1}; }\ntype P struct { x: Num; }\ntype Num s32;").is_ok());
    }

    #[test]
    fn test_duplicate_declarations() {
        let err = analyze("type A int;\ntype A float;").unwrap_err();
        assert!(matches!(err, Error::DuplicateDefinition { .. }));
        let err = analyze("enum E { X, Y, X }").unwrap_err();
        assert!(matches!(err, Error::DuplicateDefinition { ref name, .. } if name == "E.X"));
        let err = analyze("fn f() { }\nfn f() { }").unwrap_err();
        assert!(matches!(err, Error::DuplicateDefinition { .. }));
    }

    #[test]
    fn test_duplicate_method() {
        let err = analyze(
            "type P struct { x: int; }
             impl P { fn get(self: &P) -> int { return 1; } }
             impl P { fn get(self: &P) -> int { return 2; } }",
        )
        .unwrap_err();
        assert!(matches!(err, Error::DuplicateDefinition { ref name, .. } if name == "get"));
    }

    #[test]
    fn test_methods_are_not_visible_by_name() {
        let err = analyze("type P struct { x: int; }\nimpl P { fn get(self: &P) -> int { return 1; } }\nfn main() { g := get; }")
            .unwrap_err();
        assert!(matches!(err, Error::UndefinedVariable { .. }));
    }

    #[test]
    fn test_import_only_at_file_scope() {
        let err = analyze("fn main() { #import \"x\"; }").unwrap_err();
        assert!(matches!(err, Error::Semantic { .. }), "{:?}", err);
    }

    #[test]
    fn test_polymorphic_restrictions() {
        let err = analyze("fn f(xs: ...$T) { }").unwrap_err();
        assert!(matches!(err, Error::Semantic { .. }));
        let err = analyze("#extern fn g(x: $T) -> T;").unwrap_err();
        assert!(matches!(err, Error::Semantic { .. }));
    }

    #[test]
    fn test_registration_wires_scopes() {
        let ctx = analyze("fn f(a: int, rest: ...int) { if a > 0 { } while false { } }").unwrap();
        let f = ctx.fn_decl(FnId(0));
        assert_eq!(f.param_vars.len(), 2);
        assert!(matches!(ctx.kind(ctx.var(f.param_vars[1]).ty), TypeKind::Array { owned: false, .. }));
        let fn_scope = f.scope.unwrap();
        assert_eq!(ctx.scope(fn_scope).kind, ScopeKind::Function);
        let children: Vec<ScopeKind> = ctx
            .scopes
            .iter()
            .filter(|s| s.parent == Some(fn_scope))
            .map(|s| s.kind)
            .collect();
        assert_eq!(children, vec![ScopeKind::Simple, ScopeKind::Loop]);
    }

    #[test]
    fn test_includes_are_deduplicated() {
        let ctx = analyze("#include \"math.h\";\n#include \"stdio.h\";\n#include \"math.h\";").unwrap();
        assert_eq!(ctx.includes, vec!["math.h".to_string(), "stdio.h".to_string()]);
    }

    #[test]
    fn test_extern_bindings_keep_c_names() {
        let ctx = analyze("#extern fn puts(s: ptr) -> s32;\n#extern errno: s32;").unwrap();
        let names: Vec<_> = ctx.vars.iter().filter(|v| v.flags.ext && v.c_name.as_deref() == Some("errno")).collect();
        assert_eq!(names.len(), 1);
        assert!(ctx.fn_decl(FnId(0)).ext);
    }
}
