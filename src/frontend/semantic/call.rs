//! Calls, method calls and polymorph instantiation

use log::debug;

use crate::frontend::ast::{Ast, AstId, AstKind, Call, Param, UnOp};
use crate::middle::{FnId, PolymorphId, ScopeId, VarFlags};
use crate::types::{TypeId, TypeKind, NULL, VOID};
use crate::utils::{Error, Result, Span};

use super::Analyzer;

impl<'a> Analyzer<'a> {
    pub(crate) fn analyze_call(&mut self, id: AstId, span: Span, call: Call, scope: ScopeId) -> Result<Ast> {
        let Call { callee, args, spread, .. } = call;
        let callee = match callee.kind {
            AstKind::Ident { name, var } => self.analyze_ident(callee.id, callee.span, name, var, true, scope)?,
            kind => self.analyze_expr(Ast::new(callee.id, callee.span, kind), scope)?,
        };
        self.finish_call(id, span, callee, None, args, spread, scope)
    }

    /// Function declaration a callee names directly, if any
    fn callee_fn(&self, callee: &Ast) -> Option<FnId> {
        match &callee.kind {
            AstKind::Ident { var: Some(v), .. } => self.ctx.var(*v).fn_id,
            _ => None,
        }
    }

    /// Type-check a call against the callee's signature. `receiver` is an
    /// already analyzed first argument (method calls).
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn finish_call(
        &mut self,
        id: AstId,
        span: Span,
        callee: Ast,
        receiver: Option<Ast>,
        args: Vec<Ast>,
        spread: Option<Ast>,
        scope: ScopeId,
    ) -> Result<Ast> {
        if let Some(fid) = self.callee_fn(&callee) {
            if self.ctx.fn_decl(fid).polymorphic {
                return self.analyze_poly_call(id, span, callee, fid, receiver, args, spread, scope);
            }
        }
        let fty = self.resolve_ty(&callee)?;
        let TypeKind::Func { args: params, ret, variadic } = self.ctx.kind(fty).clone() else {
            return Err(Error::NotCallable { ty: self.ctx.type_name(fty), span });
        };

        let fixed = if variadic { params.len().saturating_sub(1) } else { params.len() };
        let given = args.len() + usize::from(receiver.is_some());
        if spread.is_some() && !variadic {
            return Err(Error::semantic("'...' needs a variadic callee", span));
        }
        let count_ok = match (variadic, spread.is_some()) {
            (true, true) => given == fixed,
            (true, false) => given >= fixed,
            (false, _) => given == fixed,
        };
        if !count_ok {
            return Err(Error::ArgCountMismatch { expected: fixed, got: given, span });
        }

        let mut analyzed = Vec::with_capacity(given);
        if let Some(receiver) = receiver {
            analyzed.push(self.coerce(receiver, params[0], scope)?);
        }
        let mut rest = args.into_iter();
        while analyzed.len() < fixed {
            let Some(arg) = rest.next() else { break };
            let param = params[analyzed.len()];
            let arg = self.analyze_with_expected(arg, Some(param), scope)?;
            analyzed.push(self.coerce(arg, param, scope)?);
        }

        let mut varargs = None;
        let mut spread_arg = None;
        if variadic {
            let elem = params[fixed];
            if let Some(spread) = spread {
                let spread = self.analyze_expr(spread, scope)?;
                let view = self.ctx.array_of(elem, false);
                spread_arg = Some(self.coerce(spread, view, scope)?);
            } else {
                let mut count = 0u64;
                for arg in rest {
                    let arg = self.analyze_with_expected(arg, Some(elem), scope)?;
                    analyzed.push(self.coerce(arg, elem, scope)?);
                    count += 1;
                }
                if count > 0 {
                    let key = self.ctx.fresh_ast_id();
                    let pack = self.ctx.static_array_of(elem, count);
                    self.ctx.register_type(pack, span)?;
                    varargs = Some(self.ctx.allocate_ast_temp_var(scope, key, pack, span));
                }
            }
        }

        self.ctx.register_type(ret, span)?;
        Ok(Ast::typed(
            id,
            span,
            ret,
            AstKind::Call(Box::new(Call {
                callee,
                args: analyzed,
                spread: spread_arg,
                poly: None,
                varargs,
                variadic,
            })),
        ))
    }

    // ==================== Methods ====================

    /// `receiver.name(args)`: a package function, a function-typed struct
    /// member, or a method bound by `impl` (with the receiver's address
    /// taken or dereferenced to match the method's first parameter)
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn analyze_method(
        &mut self,
        id: AstId,
        span: Span,
        receiver: Ast,
        name: String,
        args: Vec<Ast>,
        spread: Option<Ast>,
        scope: ScopeId,
    ) -> Result<Ast> {
        if let Some(package) = self.package_of(&receiver, scope)? {
            let var = self.package_member_var(package, &name, span)?;
            let callee_id = self.ctx.fresh_ast_id();
            let callee = self.analyze_ident(callee_id, span, name, Some(var), true, scope)?;
            return self.finish_call(id, span, callee, None, args, spread, scope);
        }

        let recv = self.analyze_expr(receiver, scope)?;
        let recv_ty = self.resolve_ty(&recv)?;
        let (base_ty, through_ref) = match self.ctx.kind(recv_ty).clone() {
            TypeKind::Ref { inner, .. } => (self.ctx.resolve(inner, span)?, true),
            _ => (recv_ty, false),
        };

        let member = self.ctx.struct_of(base_ty).and_then(|s| s.member(&name)).map(|(_, t)| t);
        if let Some(member_ty) = member {
            if matches!(self.ctx.resolved_kind(member_ty), TypeKind::Func { .. }) {
                let callee_id = self.ctx.fresh_ast_id();
                let callee = Ast::typed(
                    callee_id,
                    span,
                    member_ty,
                    AstKind::Dot { object: Box::new(recv), member: name },
                );
                return self.finish_call(id, span, callee, None, args, spread, scope);
            }
        }

        let Some(method) = self.ctx.find_method(base_ty, &name) else {
            return Err(Error::UnknownMember { member: name, ty: self.ctx.type_name(base_ty), span });
        };
        let first = match self.ctx.resolved_kind(self.ctx.var(method).ty) {
            TypeKind::Func { args, .. } => args.first().copied(),
            _ => None,
        };
        let Some(first) = first else {
            return Err(Error::semantic(format!("method '{}' takes no receiver", name), span));
        };
        let wants_ref = matches!(self.ctx.resolved_kind(first), TypeKind::Ref { .. });
        let recv = match (wants_ref, through_ref) {
            (true, false) => {
                if !self.ctx.is_addressable(&recv) {
                    return Err(Error::semantic(
                        format!("method '{}' needs an addressable receiver", name),
                        recv.span,
                    ));
                }
                let ty = self.ctx.ref_of(recv.ty.unwrap_or(base_ty), false);
                let addr_id = self.ctx.fresh_ast_id();
                Ast::typed(addr_id, recv.span, ty, AstKind::Unop { op: UnOp::AddrOf, operand: Box::new(recv) })
            }
            (false, true) => {
                let deref_id = self.ctx.fresh_ast_id();
                Ast::typed(deref_id, recv.span, base_ty, AstKind::Unop { op: UnOp::Deref, operand: Box::new(recv) })
            }
            _ => recv,
        };
        let callee_id = self.ctx.fresh_ast_id();
        let callee = self.analyze_ident(callee_id, span, name, Some(method), true, scope)?;
        self.finish_call(id, span, callee, Some(recv), args, spread, scope)
    }

    // ==================== Polymorphs ====================

    /// Call of a function with `$T` parameters: reuse the instantiation for
    /// these argument types or create one
    #[allow(clippy::too_many_arguments)]
    fn analyze_poly_call(
        &mut self,
        id: AstId,
        span: Span,
        mut callee: Ast,
        fid: FnId,
        receiver: Option<Ast>,
        args: Vec<Ast>,
        spread: Option<Ast>,
        scope: ScopeId,
    ) -> Result<Ast> {
        if spread.is_some() {
            return Err(Error::semantic("'...' needs a variadic callee", span));
        }
        let params: Vec<(Option<TypeId>, bool)> = self
            .ctx
            .fn_decl(fid)
            .params
            .iter()
            .map(|p| (p.ty.ty, p.ty.expr.has_poly()))
            .collect();
        let given = args.len() + usize::from(receiver.is_some());
        if given != params.len() {
            return Err(Error::ArgCountMismatch { expected: params.len(), got: given, span });
        }

        let mut analyzed: Vec<Ast> = receiver.into_iter().collect();
        for arg in args {
            let (param_ty, has_poly) = params[analyzed.len()];
            let expected = match param_ty {
                Some(t) if !has_poly && self.ctx.resolve(t, span).is_ok() => Some(t),
                _ => None,
            };
            analyzed.push(self.analyze_with_expected(arg, expected, scope)?);
        }

        let mut arg_types = Vec::with_capacity(analyzed.len());
        for arg in &analyzed {
            let t = self.resolve_ty(arg)?;
            let t = match self.ctx.kind(t).clone() {
                TypeKind::StaticArray { inner, .. } => self.ctx.array_of(inner, false),
                _ if t == NULL => {
                    return Err(Error::CannotInfer { what: "a type from a null argument".to_string(), span: arg.span })
                }
                _ => t,
            };
            arg_types.push(t);
        }

        let pid = match self.ctx.check_for_existing_polymorph(fid, &arg_types) {
            Some(existing) => existing,
            None => self.instantiate_polymorph(fid, arg_types, span)?,
        };
        let (param_vars, ret, fn_ty) = {
            let poly = self.ctx.polymorph(pid);
            (poly.params.clone(), poly.ret, poly.ty)
        };
        let mut coerced = Vec::with_capacity(analyzed.len());
        for (arg, var) in analyzed.into_iter().zip(param_vars) {
            let ty = self.ctx.var(var).ty;
            coerced.push(self.coerce(arg, ty, scope)?);
        }
        callee.ty = fn_ty;
        Ok(Ast::typed(
            id,
            span,
            ret,
            AstKind::Call(Box::new(Call {
                callee,
                args: coerced,
                spread: None,
                poly: Some(pid),
                varargs: None,
                variadic: false,
            })),
        ))
    }

    /// Bind `$T` parameters from the argument types, then run both passes
    /// over a fresh copy of the body in the instantiation's scope
    fn instantiate_polymorph(&mut self, fid: FnId, arg_types: Vec<TypeId>, span: Span) -> Result<PolymorphId> {
        let fn_scope = self
            .ctx
            .fn_decl(fid)
            .scope
            .ok_or_else(|| Error::internal("polymorphic function without a scope"))?;
        let parent = self
            .ctx
            .scope(fn_scope)
            .parent
            .ok_or_else(|| Error::internal("function scope without a parent"))?;
        let pid = self.ctx.new_polymorph(fid, parent, arg_types.clone());
        let pscope = self.ctx.polymorph(pid).scope;
        let params: Vec<Param> = self.ctx.fn_decl(fid).params.clone();

        // parameters mentioning `$T` bind first, so later ones can name `T`
        let mut order: Vec<usize> = (0..params.len()).collect();
        order.sort_by_key(|i| !params[*i].ty.expr.has_poly());
        let mut param_types = vec![VOID; params.len()];
        for i in order {
            let param = &params[i];
            let t = self.type_from_expr(&param.ty.expr, pscope)?;
            if param.ty.expr.has_poly() && !self.ctx.match_polymorph(t, arg_types[i], Some(pscope), param.span)? {
                return Err(Error::TypeMismatch {
                    expected: self.ctx.type_name(t),
                    got: self.ctx.type_name(arg_types[i]),
                    span,
                });
            }
            param_types[i] = self.concrete(t, param.span)?;
        }

        let ret_expr = self.ctx.fn_decl(fid).ret.as_ref().map(|slot| slot.expr.clone());
        let ret = match ret_expr {
            Some(expr) => {
                let t = self.type_from_expr(&expr, pscope)?;
                self.concrete(t, expr.span())?
            }
            None => VOID,
        };
        self.ctx.scope_mut(pscope).return_type = Some(ret);

        let mut vars = Vec::with_capacity(params.len());
        for (param, ty) in params.iter().zip(&param_types) {
            let flags = VarFlags { param: true, initialized: true, ..VarFlags::default() };
            vars.push(self.ctx.add_var(pscope, &param.name, *ty, flags, param.span)?);
        }
        let fn_ty = self.ctx.new_type(TypeKind::Func { args: param_types, ret, variadic: false });
        self.ctx.register_type(fn_ty, span)?;
        {
            let poly = self.ctx.polymorph_mut(pid);
            poly.ret = ret;
            poly.params = vars;
            poly.ty = Some(fn_ty);
        }

        let body = {
            let ctx = &mut *self.ctx;
            ctx.fns[fid.0].body.as_ref().map(|b| b.fresh_clone(&mut ctx.ast_ids))
        };
        let Some(mut body) = body else {
            return Err(Error::internal("polymorphic function without a body"));
        };
        self.first_pass_block(&mut body, pscope)?;
        let body = self.analyze_block(body)?;
        self.ctx.polymorph_mut(pid).body = Some(body);

        let names: Vec<String> = arg_types.iter().map(|t| self.ctx.type_name(*t)).collect();
        debug!("instantiated {}({}) as polymorph {}", self.ctx.fn_decl(fid).name, names.join(", "), pid.0);
        Ok(pid)
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{analyze, analyze_with};
    use super::*;
    use crate::frontend::package::MemoryPackageLoader;
    use crate::types::S64;

    #[test]
    fn test_argument_count() {
        let err = analyze("fn f(a: int, b: int) { }\nfn main() { f(1); }").unwrap_err();
        assert!(matches!(err, Error::ArgCountMismatch { expected: 2, got: 1, .. }));
        let err = analyze("fn main() { x := 1; x(); }").unwrap_err();
        assert!(matches!(err, Error::NotCallable { .. }));
    }

    #[test]
    fn test_variadic_arguments_collect_into_a_temp() {
        let ctx = analyze("fn sum(xs: ...int) -> int { return 0; }\nfn main() { a := sum(1, 2, 3); b := sum(); }").unwrap();
        let packs: Vec<_> = ctx
            .vars
            .iter()
            .filter(|v| v.flags.temp && matches!(ctx.kind(v.ty), TypeKind::StaticArray { length: 3, .. }))
            .collect();
        assert_eq!(packs.len(), 1);
    }

    #[test]
    fn test_spread_passes_an_array_through() {
        assert!(analyze("fn sum(xs: ...int) -> int { return 0; }\nfn main() { a: [2]int; n := sum(...a); }").is_ok());
        let err = analyze("fn f(x: int) { }\nfn main() { a: [1]int; f(...a); }").unwrap_err();
        assert!(matches!(err, Error::Semantic { .. }));
    }

    #[test]
    fn test_methods_take_the_receiver_address() {
        let src = "type P struct { x: int; }
                   impl P {
                       fn get(self: &P) -> int { return self.x; }
                       fn copy(self: P) -> int { return self.x; }
                   }
                   fn main() { p := P{x = 1}; r := &p; a := p.get(); b := r.get(); c := r.copy(); }";
        let ctx = analyze(src).unwrap();
        assert_eq!(ctx.methods.len(), 2);
        let err = analyze(
            "type P struct { x: int; }\nimpl P { fn get(self: &P) -> int { return self.x; } }\nfn main() { n := P{x = 1}.get(); }",
        )
        .unwrap_err();
        assert!(matches!(err, Error::Semantic { .. }));
    }

    #[test]
    fn test_function_typed_member_is_called_indirectly() {
        let src = "fn twice(x: int) -> int { return x * 2; }
                   type Op struct { run: fn(int) -> int; }
                   fn main() { o := Op{run = twice}; n := o.run(3); }";
        assert!(analyze(src).is_ok());
    }

    #[test]
    fn test_polymorph_binds_through_arrays() {
        let ctx = analyze(
            "fn first(xs: []$T) -> T { return xs[0]; }
             fn main() { a := [2]int{1, 2}; x := first(a); }",
        )
        .unwrap();
        let f = FnId(ctx.fns.iter().position(|f| f.name == "first").unwrap());
        assert_eq!(ctx.polymorph_count(f), 1);
        assert_eq!(ctx.polymorph(ctx.fn_decl(f).polymorphs[0]).ret, S64);
    }

    #[test]
    fn test_polymorph_rejects_mismatched_shapes() {
        let err = analyze("fn first(xs: []$T) -> T { return xs[0]; }\nfn main() { x := first(3); }").unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }), "{:?}", err);
    }

    #[test]
    fn test_package_function_call() {
        let mut loader = MemoryPackageLoader::new();
        loader.add_file("util", "util.vs", "fn inc(x: int) -> int { return x + 1; }");
        assert!(analyze_with("#import \"util\";\nfn main() { n := util.inc(1); }", &mut loader).is_ok());
        let err = analyze_with("#import \"util\";\nfn main() { n := util.dec(1); }", &mut loader).unwrap_err();
        assert!(matches!(err, Error::UndefinedVariable { .. }));
    }
}
