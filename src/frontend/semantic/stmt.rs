//! Statement analysis and block ordering

use log::{debug, trace};

use crate::frontend::ast::{Ast, AstId, AstKind, BinOp, Decl, ForLoop, FuncRef, Literal};
use crate::middle::{Binding, FnId, ScopeId, ScopeKind, VarFlags, VarId};
use crate::types::{BaseKind, TypeKind, BOOL, NULL, S64, U8, VOID};
use crate::utils::{Error, Result, Span};

use super::literal::int_misfit;
use super::Analyzer;

impl<'a> Analyzer<'a> {
    /// Analyze a block whose scope the first pass assigned.
    ///
    /// Enum values come first, then every function signature, then the
    /// remaining statements in source order, and function bodies last, so a
    /// body sees every global of its unit fully typed. Statement order in the
    /// output is the source order.
    pub(crate) fn analyze_block(&mut self, block: Ast) -> Result<Ast> {
        let Ast { id, span, ty, kind } = block;
        let AstKind::Block { stmts, scope: Some(scope) } = kind else {
            return Err(Error::internal("analysis of a block the first pass did not visit"));
        };
        let count = stmts.len();
        let mut slots: Vec<Option<Ast>> = stmts.into_iter().map(Some).collect();
        let mut results: Vec<Vec<Ast>> = (0..count).map(|_| Vec::new()).collect();

        for i in 0..count {
            if matches!(slots[i].as_ref().map(|s| &s.kind), Some(AstKind::EnumDecl(_))) {
                if let Some(stmt) = slots[i].take() {
                    self.analyze_stmt(stmt, scope, &mut results[i])?;
                }
            }
        }
        for slot in slots.iter().flatten() {
            for fid in registered_fns(slot) {
                self.register_signature(fid)?;
            }
        }
        for i in 0..count {
            let deferred = matches!(
                slots[i].as_ref().map(|s| &s.kind),
                Some(AstKind::FuncDecl(_) | AstKind::Impl { .. })
            );
            if deferred {
                continue;
            }
            if let Some(stmt) = slots[i].take() {
                self.analyze_stmt(stmt, scope, &mut results[i])?;
            }
        }
        for i in 0..count {
            if let Some(stmt) = slots[i].take() {
                for fid in registered_fns(&stmt) {
                    self.analyze_function(fid)?;
                }
                results[i].push(stmt);
            }
        }

        self.ctx.compute_release_plan(scope);
        let stmts = results.into_iter().flatten().collect();
        Ok(Ast { id, span, ty, kind: AstKind::Block { stmts, scope: Some(scope) } })
    }

    /// Make a function's parameter and return types concrete
    fn register_signature(&mut self, fid: FnId) -> Result<()> {
        let decl = self.ctx.fn_decl(fid);
        if decl.polymorphic {
            return Ok(());
        }
        let params: Vec<(Option<crate::types::TypeId>, Span)> = decl.params.iter().map(|p| (p.ty.ty, p.span)).collect();
        let ret = decl.ret.as_ref().map(|r| (r.ty, r.expr.span()));
        let (param_vars, fn_ty, var, span) = (decl.param_vars.clone(), decl.ty, decl.var, decl.span);

        for (ty, span) in params {
            let ty = ty.ok_or_else(|| Error::internal("parameter type not converted"))?;
            if self.concrete(ty, span)? == VOID {
                return Err(Error::semantic("parameters cannot have type void", span));
            }
        }
        if let Some((ty, span)) = ret {
            let ty = ty.ok_or_else(|| Error::internal("return type not converted"))?;
            self.concrete(ty, span)?;
        }
        for pvar in param_vars {
            let ty = self.ctx.var(pvar).ty;
            self.ctx.register_type(ty, span)?;
        }
        if let Some(ty) = fn_ty {
            self.ctx.register_type(ty, span)?;
        }
        if var.is_some() && var == self.ctx.main_fn && !self.ctx.fn_decl(fid).params.is_empty() {
            return Err(Error::semantic("'main' takes no parameters", span));
        }
        Ok(())
    }

    /// Second pass over a function body; polymorphic bodies are analyzed per
    /// instantiation instead
    fn analyze_function(&mut self, fid: FnId) -> Result<()> {
        let decl = self.ctx.fn_decl(fid);
        if decl.polymorphic || decl.ext {
            return Ok(());
        }
        debug!("analyzing function '{}'", decl.name);
        let Some(body) = self.ctx.fn_decl_mut(fid).body.take() else {
            return Ok(());
        };
        let body = self.analyze_block(body)?;
        self.ctx.fn_decl_mut(fid).body = Some(body);
        Ok(())
    }

    /// Analyze one statement, appending what it lowers to (possibly nothing)
    pub(crate) fn analyze_stmt(&mut self, stmt: Ast, scope: ScopeId, out: &mut Vec<Ast>) -> Result<()> {
        let Ast { id, span, ty, kind } = stmt;
        match kind {
            AstKind::Decl(decl) => self.analyze_decl(id, span, *decl, scope, out)?,
            AstKind::Assign { op, lhs, rhs, .. } => out.push(self.analyze_assign(id, span, op, *lhs, *rhs, scope)?),
            AstKind::Conditional { cond, then, otherwise } => {
                let cond = self.condition(*cond, scope)?;
                let then = self.analyze_block(*then)?;
                let otherwise = otherwise.map(|o| self.analyze_block(*o)).transpose()?;
                out.push(Ast::new(
                    id,
                    span,
                    AstKind::Conditional { cond: Box::new(cond), then: Box::new(then), otherwise: otherwise.map(Box::new) },
                ));
            }
            AstKind::While { cond, body } => {
                let cond = self.condition(*cond, scope)?;
                let body = self.analyze_block(*body)?;
                out.push(Ast::new(id, span, AstKind::While { cond: Box::new(cond), body: Box::new(body) }));
            }
            AstKind::For(for_loop) => out.push(self.analyze_for(id, span, *for_loop, scope)?),
            AstKind::Return { value } => out.push(self.analyze_return(id, span, value.map(|v| *v), scope)?),
            AstKind::Break | AstKind::Continue => {
                if self.ctx.enclosing_loop_scope(scope).is_none() {
                    let keyword = if matches!(kind, AstKind::Break) { "break" } else { "continue" };
                    return Err(Error::OutsideLoop { keyword: keyword.to_string(), span });
                }
                out.push(Ast { id, span, ty, kind });
            }
            AstKind::Defer { call } => {
                if self.ctx.scope(scope).kind == ScopeKind::Root {
                    return Err(Error::InvalidDefer { message: "not allowed at file scope".to_string(), span });
                }
                if !call.is_call() {
                    return Err(Error::InvalidDefer { message: "expected a call".to_string(), span: call.span });
                }
                let call = self.analyze_expr(*call, scope)?;
                out.push(Ast::new(id, span, AstKind::Defer { call: Box::new(call) }));
            }
            AstKind::AnonScope { body } => {
                let body = self.analyze_block(*body)?;
                out.push(Ast::new(id, span, AstKind::AnonScope { body: Box::new(body) }));
            }
            AstKind::Use { target } => self.analyze_use(*target, scope, span)?,
            AstKind::EnumDecl(decl) => {
                let decl = self.analyze_enum_values(*decl, scope, span)?;
                out.push(Ast { id, span, ty, kind: AstKind::EnumDecl(Box::new(decl)) });
            }
            AstKind::TypeDecl { name, params, target } => {
                if params.is_empty() {
                    if let Some(t) = target.ty {
                        self.ctx.resolve(t, span)?;
                    }
                }
                out.push(Ast { id, span, ty, kind: AstKind::TypeDecl { name, params, target } });
            }
            kind @ (AstKind::Directive(_) | AstKind::Import { .. } | AstKind::FuncDecl(_) | AstKind::Impl { .. }) => {
                out.push(Ast { id, span, ty, kind });
            }
            AstKind::Block { .. } => {
                let block = self.analyze_block(Ast { id, span, ty, kind })?;
                out.push(block);
            }
            kind => {
                let expr = self.analyze_expr(Ast { id, span, ty, kind }, scope)?;
                out.push(expr);
            }
        }
        Ok(())
    }

    fn condition(&mut self, cond: Ast, scope: ScopeId) -> Result<Ast> {
        let cond = self.analyze_expr(cond, scope)?;
        let t = self.resolve_ty(&cond)?;
        if t != BOOL {
            return Err(Error::TypeMismatch { expected: "bool".to_string(), got: self.ctx.type_name(t), span: cond.span });
        }
        Ok(cond)
    }

    // ==================== Declarations ====================

    fn analyze_decl(&mut self, id: AstId, span: Span, decl: Decl, scope: ScopeId, out: &mut Vec<Ast>) -> Result<()> {
        let Decl { name, ty: slot, init, constant, ext, var } = decl;
        let root = self.ctx.scope(scope).kind == ScopeKind::Root;

        if ext {
            let mut slot = slot.ok_or_else(|| Error::internal("external variable without a type"))?;
            let ty = self.concrete_slot_type(&mut slot, scope)?;
            let var = match var {
                Some(v) => v,
                None => {
                    let flags = VarFlags { ext: true, initialized: true, ..VarFlags::default() };
                    let v = self.ctx.add_var(scope, &name, ty, flags, span)?;
                    self.ctx.var_mut(v).c_name = Some(name.clone());
                    v
                }
            };
            self.ctx.var_mut(var).ty = ty;
            let decl = Decl { name, ty: Some(slot), init: None, constant, ext, var: Some(var) };
            out.push(Ast::new(id, span, AstKind::Decl(Box::new(decl))));
            return Ok(());
        }

        if constant {
            let init = init.ok_or_else(|| Error::internal("constant without a value"))?;
            let value = self.analyze_expr(init, scope)?;
            if !value.is_const_literal() {
                return Err(Error::semantic(format!("constant '{}' needs a compile-time value", name), span));
            }
            let ty = value.ty.unwrap_or(VOID);
            let var = match var {
                Some(v) => v,
                None => {
                    let flags = VarFlags { constant: true, initialized: true, ..VarFlags::default() };
                    self.ctx.add_var(scope, &name, ty, flags, span)?
                }
            };
            let v = self.ctx.var_mut(var);
            v.ty = ty;
            v.flags.initialized = true;
            v.binding = Binding::Alias(Box::new(value));
            trace!("constant '{}' bound", name);
            return Ok(());
        }

        let mut slot = slot;
        let declared = match &mut slot {
            Some(s) => Some(self.concrete_slot_type(s, scope)?),
            None => None,
        };
        let init = init.map(|e| self.analyze_with_expected(e, declared, scope)).transpose()?;
        let ty = match (declared, &init) {
            (Some(t), _) => t,
            (None, Some(value)) => self.infer_decl_type(&name, value)?,
            (None, None) => return Err(Error::internal("declaration without a type or a value")),
        };
        if self.ctx.resolve(ty, span)? == VOID {
            return Err(Error::semantic(format!("variable '{}' cannot have type void", name), span));
        }
        if let (Some(_), Some(value)) = (declared, &init) {
            if self.ctx.is_owned(ty) && !self.is_owned_source(value) {
                return Err(Error::OwnershipViolation {
                    ty: self.ctx.type_name(ty),
                    hint: " or a call returning an owned value".to_string(),
                    span: value.span,
                });
            }
        }
        let init = init.map(|e| self.coerce(e, ty, scope)).transpose()?;
        self.ctx.register_type(ty, span)?;

        let var = match var {
            Some(v) => {
                self.ctx.var_mut(v).ty = ty;
                v
            }
            None => {
                let flags = VarFlags { initialized: init.is_some(), ..VarFlags::default() };
                self.ctx.add_var(scope, &name, ty, flags, span)?
            }
        };

        match init {
            // global initializers run from the init function
            Some(value) if root => {
                let decl = Decl { name: name.clone(), ty: slot, init: None, constant, ext, var: Some(var) };
                out.push(Ast::new(id, span, AstKind::Decl(Box::new(decl))));
                let lhs_id = self.ctx.fresh_ast_id();
                let lhs = Ast::typed(lhs_id, span, ty, AstKind::Ident { name, var: Some(var) });
                let assign_id = self.ctx.fresh_ast_id();
                out.push(self.finish_assign(assign_id, span, lhs, value, true, scope)?);
                self.ctx.var_mut(var).flags.initialized = true;
            }
            init => {
                let decl = Decl { name, ty: slot, init, constant, ext, var: Some(var) };
                out.push(Ast::new(id, span, AstKind::Decl(Box::new(decl))));
            }
        }
        Ok(())
    }

    /// Type of `name := value`. Owned values only stay owned when freshly allocated.
    fn infer_decl_type(&mut self, name: &str, value: &Ast) -> Result<crate::types::TypeId> {
        let ty = self.resolve_ty(value)?;
        if ty == NULL {
            return Err(Error::CannotInfer { what: format!("'{}' from null", name), span: value.span });
        }
        if ty == VOID {
            return Err(Error::semantic(format!("'{}' is initialized from a value of type void", name), value.span));
        }
        if self.ctx.is_owned(ty) && !value.is_new() {
            return Ok(self.ctx.strip_ownership(ty));
        }
        Ok(ty)
    }

    fn is_owned_source(&self, value: &Ast) -> bool {
        value.is_new() || (matches!(value.kind, AstKind::Call(_)) && value.ty.map_or(false, |t| self.ctx.is_owned(t)))
    }

    // ==================== Assignment ====================

    fn analyze_assign(&mut self, id: AstId, span: Span, op: Option<BinOp>, lhs: Ast, rhs: Ast, scope: ScopeId) -> Result<Ast> {
        if let AstKind::Ident { name, var: None } = &lhs.kind {
            if let Some(v) = self.ctx.lookup_var(scope, name, lhs.span)? {
                if self.ctx.var(v).flags.constant {
                    return Err(Error::AssignToConstant { name: name.clone(), span: lhs.span });
                }
            }
        }
        // `a op= b` is `a = a op b`
        let rhs = match op {
            Some(op) => {
                let mut current = lhs.clone();
                current.renumber(&mut self.ctx.ast_ids);
                let binop_id = self.ctx.fresh_ast_id();
                Ast::new(binop_id, span, AstKind::Binop { op, lhs: Box::new(current), rhs: Box::new(rhs) })
            }
            None => rhs,
        };

        let lhs = self.analyze_expr(lhs, scope)?;
        self.check_assignable(&lhs)?;
        let lty = lhs.ty.unwrap_or(VOID);
        let rhs = self.analyze_with_expected(rhs, Some(lty), scope)?;
        if self.ctx.is_owned(lty) && !rhs.is_new() {
            return Err(Error::OwnershipViolation { ty: self.ctx.type_name(lty), hint: String::new(), span: rhs.span });
        }
        let rhs = self.coerce(rhs, lty, scope)?;
        self.finish_assign(id, span, lhs, rhs, false, scope)
    }

    /// Build the assignment node. A dynamic value without a temp of its own
    /// gets one keyed by the assignment, so the old value can be swapped out
    /// and released.
    fn finish_assign(&mut self, id: AstId, span: Span, lhs: Ast, rhs: Ast, init: bool, scope: ScopeId) -> Result<Ast> {
        let lty = lhs.ty.unwrap_or(VOID);
        if self.ctx.is_dynamic(lty) && self.ctx.value_temp(&rhs).is_none() {
            self.ctx.register_type(lty, span)?;
            self.ctx.allocate_ast_temp_var(scope, id, lty, span);
        }
        Ok(Ast::new(id, span, AstKind::Assign { op: None, lhs: Box::new(lhs), rhs: Box::new(rhs), init }))
    }

    fn check_assignable(&mut self, lhs: &Ast) -> Result<()> {
        match &lhs.kind {
            AstKind::Dot { object, member } if member == "length" || member == "data" => {
                let t = self.resolve_ty(object)?;
                let sequence = matches!(self.ctx.kind(t), TypeKind::Array { .. } | TypeKind::StaticArray { .. })
                    || self.ctx.is_base(t, BaseKind::String);
                if sequence {
                    return Err(Error::NotAssignable { span: lhs.span });
                }
            }
            AstKind::Index { object, .. } => {
                let t = self.resolve_ty(object)?;
                if self.ctx.is_base(t, BaseKind::String) {
                    return Err(Error::ImmutableString { span: lhs.span });
                }
            }
            AstKind::Ident { var: Some(v), name } if self.ctx.var(*v).flags.constant => {
                return Err(Error::AssignToConstant { name: name.clone(), span: lhs.span });
            }
            _ => {}
        }
        if !self.ctx.is_addressable(lhs) {
            return Err(Error::NotAssignable { span: lhs.span });
        }
        Ok(())
    }

    // ==================== Control Flow ====================

    fn analyze_for(&mut self, id: AstId, span: Span, for_loop: ForLoop, scope: ScopeId) -> Result<Ast> {
        let ForLoop { item, index, by_ref, iterable, body, .. } = for_loop;
        let iterable = self.analyze_expr(iterable, scope)?;
        let t = self.resolve_ty(&iterable)?;
        let elem = match self.ctx.kind(t).clone() {
            TypeKind::Array { inner, .. } => inner,
            TypeKind::StaticArray { inner, .. } => {
                if !self.ctx.is_addressable(&iterable) && self.ctx.value_temp(&iterable).is_none() {
                    return Err(Error::semantic("cannot iterate over a temporary fixed-size array", iterable.span));
                }
                inner
            }
            TypeKind::Basic { base: BaseKind::String, .. } => {
                if by_ref {
                    return Err(Error::semantic("strings cannot be iterated by reference", span));
                }
                U8
            }
            _ => return Err(Error::semantic(format!("cannot iterate over {}", self.ctx.type_name(t)), iterable.span)),
        };
        let AstKind::Block { scope: Some(body_scope), .. } = &body.kind else {
            return Err(Error::internal("loop body without a scope"));
        };
        let body_scope = *body_scope;

        let item_ty = if by_ref { self.ctx.ref_of(elem, false) } else { elem };
        self.ctx.register_type(item_ty, span)?;
        let flags = VarFlags { initialized: true, ..VarFlags::default() };
        let item_var = self.ctx.add_var(body_scope, &item, item_ty, flags, span)?;
        let index_var = match &index {
            Some(name) => self.ctx.add_var(body_scope, name, S64, flags, span)?,
            None => self.ctx.add_hidden_var(body_scope, "<index>", S64, flags, span),
        };
        let body = self.analyze_block(body)?;
        Ok(Ast::new(
            id,
            span,
            AstKind::For(Box::new(ForLoop {
                item,
                index,
                by_ref,
                iterable,
                body,
                item_var: Some(item_var),
                index_var: Some(index_var),
                elem: Some(elem),
            })),
        ))
    }

    fn analyze_return(&mut self, id: AstId, span: Span, value: Option<Ast>, scope: ScopeId) -> Result<Ast> {
        let fn_scope = self.ctx.enclosing_fn_scope(scope).ok_or(Error::ReturnOutsideFunction { span })?;
        let ret = self.ctx.scope(fn_scope).return_type.unwrap_or(VOID);
        let ret_r = self.ctx.resolve(ret, span)?;
        let value = match value {
            Some(value) => {
                let value = self.analyze_with_expected(value, Some(ret), scope)?;
                if ret_r == VOID {
                    return Err(Error::TypeMismatch {
                        expected: "void".to_string(),
                        got: self.ctx.type_name(value.ty.unwrap_or(VOID)),
                        span: value.span,
                    });
                }
                Some(Box::new(self.coerce(value, ret, scope)?))
            }
            None if ret_r != VOID => {
                return Err(Error::TypeMismatch { expected: self.ctx.type_name(ret), got: "void".to_string(), span });
            }
            None => None,
        };
        Ok(Ast::new(id, span, AstKind::Return { value }))
    }

    // ==================== Use ====================

    /// `use Enum`, `use pkg` or `use value`: bind every member as a proxy
    /// name in the current scope
    fn analyze_use(&mut self, target: Ast, scope: ScopeId, span: Span) -> Result<()> {
        if let AstKind::Ident { name, var: None } = &target.kind {
            match self.ctx.lookup_var(scope, name, target.span)? {
                Some(v) => {
                    if let Some(package) = self.ctx.var(v).package() {
                        let package_scope = self.ctx.package(package).scope;
                        let exports: Vec<VarId> = self
                            .ctx
                            .scope(package_scope)
                            .vars
                            .iter()
                            .copied()
                            .filter(|v| {
                                let var = self.ctx.var(*v);
                                !var.name.starts_with('_')
                                    && var.package().is_none()
                                    && self.ctx.lookup_local_var(package_scope, &var.name) == Some(*v)
                            })
                            .collect();
                        for export in exports {
                            let member = self.ctx.var(export).name.clone();
                            let ident_id = self.ctx.fresh_ast_id();
                            let proxy = Ast::new(ident_id, span, AstKind::Ident { name: member.clone(), var: Some(export) });
                            self.bind_proxy(scope, &member, proxy, true, span)?;
                        }
                        return Ok(());
                    }
                }
                None => {
                    if let Some(ty) = self.ctx.lookup_type(scope, name) {
                        let resolved = self.ctx.resolve(ty, span)?;
                        let TypeKind::Enum(e) = self.ctx.kind(resolved).clone() else {
                            return Err(Error::semantic(format!("cannot use type '{}'", name), span));
                        };
                        for (index, member) in e.names.iter().enumerate() {
                            let lit_id = self.ctx.fresh_ast_id();
                            let proxy = Ast::typed(
                                lit_id,
                                span,
                                resolved,
                                AstKind::Literal(Literal::Enum { ty: resolved, index }),
                            );
                            self.bind_proxy(scope, member, proxy, true, span)?;
                        }
                        return Ok(());
                    }
                }
            }
        }

        let target = self.analyze_expr(target, scope)?;
        if !self.ctx.is_addressable(&target) {
            return Err(Error::semantic("'use' needs an addressable value", target.span));
        }
        let t = self.resolve_ty(&target)?;
        let shape = match self.ctx.kind(t).clone() {
            TypeKind::Struct(s) => s,
            TypeKind::Ref { inner, .. } => {
                let inner = self.ctx.resolve(inner, span)?;
                self.ctx
                    .struct_of(inner)
                    .cloned()
                    .ok_or_else(|| Error::NotAStruct { ty: self.ctx.type_name(t), span })?
            }
            _ => return Err(Error::NotAStruct { ty: self.ctx.type_name(t), span }),
        };
        for (member, _) in &shape.members {
            let dot_id = self.ctx.fresh_ast_id();
            let proxy = Ast::new(dot_id, span, AstKind::Dot { object: Box::new(target.clone()), member: member.clone() });
            self.bind_proxy(scope, member, proxy, false, span)?;
        }
        Ok(())
    }

    fn bind_proxy(&mut self, scope: ScopeId, name: &str, expr: Ast, constant: bool, span: Span) -> Result<()> {
        let builtin = self.ctx.builtin_scope;
        if self.ctx.lookup_local_var(scope, name).is_some() || self.ctx.lookup_local_var(builtin, name).is_some() {
            return Err(Error::NameCollision { name: name.to_string(), span });
        }
        let flags = VarFlags { constant, initialized: true, ..VarFlags::default() };
        let ty = expr.ty.unwrap_or(VOID);
        let var = self.ctx.add_var(scope, name, ty, flags, span)?;
        self.ctx.var_mut(var).binding = Binding::Alias(Box::new(expr));
        Ok(())
    }

    // ==================== Enums ====================

    /// Evaluate explicit member values; the others continue from the previous one
    fn analyze_enum_values(&mut self, mut decl: crate::frontend::ast::EnumDecl, scope: ScopeId, span: Span) -> Result<crate::frontend::ast::EnumDecl> {
        let ty = decl.ty.ok_or_else(|| Error::internal("enum without a type"))?;
        let inner = match self.ctx.kind(ty) {
            TypeKind::Enum(e) => e.inner,
            _ => return Err(Error::internal("enum declaration bound to a non-enum type")),
        };
        let inner = self.ctx.resolve(inner, span)?;
        if !self.ctx.is_integer(inner) {
            return Err(Error::semantic(format!("enum '{}' needs an integer type", decl.name), span));
        }

        let mut values = Vec::with_capacity(decl.members.len());
        let mut next: i128 = 0;
        for (member, value) in decl.members.iter_mut() {
            let v = match value.take() {
                Some(expr) => {
                    let expr = self.analyze_expr(expr, scope)?;
                    let AstKind::Literal(Literal::Int(v)) = expr.kind else {
                        return Err(Error::semantic(
                            format!("value of '{}.{}' must be an integer constant", decl.name, member),
                            expr.span,
                        ));
                    };
                    *value = Some(expr);
                    v
                }
                None => next,
            };
            if let Some(reason) = int_misfit(v, self.ctx.kind(inner)) {
                return Err(Error::PrecisionLoss { value: v.to_string(), ty: self.ctx.type_name(inner), reason, span });
            }
            values.push(v as i64);
            next = v + 1;
        }
        if let TypeKind::Enum(e) = &mut self.ctx.types[ty.0] {
            e.values = values;
        }
        self.ctx.register_type(ty, span)?;
        Ok(decl)
    }
}

/// Functions a statement registered: a function declaration or an impl's methods
fn registered_fns(stmt: &Ast) -> Vec<FnId> {
    match &stmt.kind {
        AstKind::FuncDecl(FuncRef::Registered(fid)) => vec![*fid],
        AstKind::Impl { methods, .. } => methods
            .iter()
            .filter_map(|m| match &m.kind {
                AstKind::FuncDecl(FuncRef::Registered(fid)) => Some(*fid),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{analyze, analyze_with};
    use super::*;
    use crate::frontend::package::MemoryPackageLoader;
    use crate::types::STRING;

    fn body_of<'c>(ctx: &'c crate::middle::CompilationContext, name: &str) -> &'c [Ast] {
        let f = ctx.fns.iter().find(|f| f.name == name).unwrap();
        match &f.body.as_ref().unwrap().kind {
            AstKind::Block { stmts, .. } => stmts,
            _ => panic!("body is not a block"),
        }
    }

    #[test]
    fn test_conditions_must_be_bool() {
        let err = analyze("fn main() { if 1 { } }").unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { ref expected, .. } if expected == "bool"));
        let err = analyze("fn main() { while \"x\" { } }").unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));
    }

    #[test]
    fn test_loop_control_needs_a_loop() {
        let err = analyze("fn main() { break; }").unwrap_err();
        assert!(matches!(err, Error::OutsideLoop { ref keyword, .. } if keyword == "break"));
        assert!(analyze("fn main() { while true { if true { continue; } break; } }").is_ok());
        let err = analyze("fn main() { while true { fn inner() { break; } } }").unwrap_err();
        assert!(matches!(err, Error::OutsideLoop { .. }));
    }

    #[test]
    fn test_return_checks() {
        let err = analyze("return 1;").unwrap_err();
        assert!(matches!(err, Error::ReturnOutsideFunction { .. }));
        let err = analyze("fn f() { return 1; }").unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { ref expected, .. } if expected == "void"));
        let err = analyze("fn f() -> int { return; }").unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));
        let err = analyze("fn f() -> u8 { return 256; }").unwrap_err();
        assert!(matches!(err, Error::PrecisionLoss { .. }));
    }

    #[test]
    fn test_defer_placement() {
        assert!(analyze("fn main() { defer println(\"bye\"); }").is_ok());
        let err = analyze("defer println(\"bye\");").unwrap_err();
        assert!(matches!(err, Error::InvalidDefer { .. }));
        let err = analyze("fn main() { x := 1; defer x; }").unwrap_err();
        assert!(matches!(err, Error::InvalidDefer { .. }));
    }

    #[test]
    fn test_assignment_targets() {
        let err = analyze("K :: 1;\nfn main() { K = 2; }").unwrap_err();
        assert!(matches!(err, Error::AssignToConstant { .. }));
        let err = analyze("fn main() { s := \"abc\"; s[0] = 1; }").unwrap_err();
        assert!(matches!(err, Error::ImmutableString { .. }));
        let err = analyze("fn main() { a: [2]int; a.length = 3; }").unwrap_err();
        assert!(matches!(err, Error::NotAssignable { .. }));
        let err = analyze("fn f() { }\nfn main() { f = f; }").unwrap_err();
        assert!(matches!(err, Error::AssignToConstant { .. }));
    }

    #[test]
    fn test_compound_assignment_desugars() {
        let ctx = analyze("fn main() { x := 1; x += 2; }").unwrap();
        match &body_of(&ctx, "main")[1].kind {
            AstKind::Assign { op: None, rhs, .. } => {
                assert!(matches!(rhs.kind, AstKind::Binop { op: BinOp::Add, .. }));
            }
            other => panic!("expected assignment, got {:?}", other),
        }
    }

    #[test]
    fn test_assignment_of_borrowed_string_gets_a_swap_temp() {
        let ctx = analyze("fn main() { a := \"x\"; b := \"y\"; b = a; }").unwrap();
        let assign = &body_of(&ctx, "main")[2];
        let temp = ctx.find_temp_var(assign.id).unwrap();
        assert_eq!(ctx.var(temp).ty, STRING);
    }

    #[test]
    fn test_constants_fold_and_inline() {
        let ctx = analyze("K :: 2 * 3;\nfn main() { x := K; }").unwrap();
        match &body_of(&ctx, "main")[0].kind {
            AstKind::Decl(d) => assert!(matches!(d.init.as_ref().unwrap().kind, AstKind::Literal(Literal::Int(6)))),
            other => panic!("expected decl, got {:?}", other),
        }
        let err = analyze("fn main() { n := 1; K :: n; }").unwrap_err();
        assert!(matches!(err, Error::Semantic { .. }));
    }

    #[test]
    fn test_globals_and_declaration_order() {
        assert!(analyze("fn main() { y := g; }\ng := 3;").is_ok());
        let err = analyze("y := x;\nx := 1;").unwrap_err();
        assert!(matches!(err, Error::Semantic { .. }), "{:?}", err);
    }

    #[test]
    fn test_inference_rejects_null() {
        let err = analyze("fn main() { x := null; }").unwrap_err();
        assert!(matches!(err, Error::CannotInfer { .. }));
        let err = analyze("fn f() { }\nfn main() { x := f(); }").unwrap_err();
        assert!(matches!(err, Error::Semantic { .. }));
    }

    #[test]
    fn test_for_loops() {
        assert!(analyze("fn main() { s := \"abc\"; for c, i in s { n: u8 = c; j: int = i; } }").is_ok());
        let err = analyze("fn main() { s := \"abc\"; for &c in s { } }").unwrap_err();
        assert!(matches!(err, Error::Semantic { .. }));
        let err = analyze("fn main() { n := 3; for x in n { } }").unwrap_err();
        assert!(matches!(err, Error::Semantic { .. }));
    }

    #[test]
    fn test_use_binds_members() {
        assert!(analyze("enum Color { Red, Green }\nfn main() { use Color; c := Green; }").is_ok());
        assert!(analyze("type P struct { x: int; }\nfn main() { p := P{x = 1}; use p; x = 5; y := x; }").is_ok());
        let err = analyze("type P struct { x: int; }\nfn main() { x := 1; p := P{x = 2}; use p; }").unwrap_err();
        assert!(matches!(err, Error::NameCollision { .. }));
        let err = analyze("type Q struct { print: int; }\nfn main() { q := Q{print = 1}; use q; }").unwrap_err();
        assert!(matches!(err, Error::NameCollision { .. }));
    }

    #[test]
    fn test_use_package() {
        let mut loader = MemoryPackageLoader::new();
        loader.add_file("math", "math.vs", "PI :: 3; fn sq(x: int) -> int { return x * x; } _secret :: 1;");
        assert!(analyze_with("#import \"math\";\nfn main() { use math; n := sq(PI); }", &mut loader).is_ok());
        let err = analyze_with("#import \"math\";\nfn main() { use math; n := _secret; }", &mut loader).unwrap_err();
        assert!(matches!(err, Error::UndefinedVariable { .. }));
    }

    #[test]
    fn test_enum_values_must_fit() {
        let err = analyze("enum Small: u8 { A = 300 }").unwrap_err();
        assert!(matches!(err, Error::PrecisionLoss { .. }));
        let err = analyze("enum Bad: float { A }").unwrap_err();
        assert!(matches!(err, Error::Semantic { .. }));
    }

    #[test]
    fn test_release_plan_lists_dynamic_locals() {
        let ctx = analyze("fn main() { a := \"x\"; n := 1; b := a + \"y\"; }").unwrap();
        let main = ctx.fns.iter().find(|f| f.name == "main").unwrap();
        let plan = &ctx.scope(main.scope.unwrap()).release.vars;
        let names: Vec<&str> = plan.iter().map(|v| ctx.var(*v).name.as_str()).filter(|n| !n.starts_with('<')).collect();
        assert_eq!(names, vec!["b", "a"]);
        assert!(plan.iter().all(|v| ctx.var(*v).ty == STRING));
    }

    #[test]
    fn test_main_takes_no_parameters() {
        let err = analyze("fn main(x: int) { }").unwrap_err();
        assert!(matches!(err, Error::Semantic { .. }));
    }
}
