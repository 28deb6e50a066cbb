//! Expression analysis

use log::trace;

use crate::frontend::ast::{Ast, AstId, AstKind, BinOp, Literal, TypeSlot, UnOp};
use crate::middle::{Binding, PackageId, ScopeId, VarId};
use crate::types::{BaseKind, TypeId, TypeKind, ANY, BASEPTR, BOOL, NULL, S64, STRING, TYPE, U8, VOID};
use crate::utils::{Error, Result, Span};

use super::coerce::is_numeric_literal;
use super::Analyzer;

impl<'a> Analyzer<'a> {
    pub(crate) fn analyze_expr(&mut self, ast: Ast, scope: ScopeId) -> Result<Ast> {
        self.analyze_with_expected(ast, None, scope)
    }

    /// Analyze an expression; `expected` types untyped compound literals.
    /// The returned node is typed and, when its value needs a slot, owns a temp.
    pub(crate) fn analyze_with_expected(&mut self, ast: Ast, expected: Option<TypeId>, scope: ScopeId) -> Result<Ast> {
        let Ast { id, span, ty, kind } = ast;
        let node = match kind {
            AstKind::Literal(lit) => self.analyze_literal(id, span, ty, lit, expected, scope)?,
            AstKind::Ident { name, var } => self.analyze_ident(id, span, name, var, false, scope)?,
            AstKind::Dot { object, member } => self.analyze_dot(id, span, *object, member, scope)?,
            AstKind::Binop { op, lhs, rhs } => self.analyze_binop(id, span, op, *lhs, *rhs, scope)?,
            AstKind::Unop { op, operand } => self.analyze_unop(id, span, op, *operand, scope)?,
            AstKind::Call(call) => self.analyze_call(id, span, *call, scope)?,
            AstKind::Method { receiver, name, args, spread } => {
                self.analyze_method(id, span, *receiver, name, args, spread.map(|s| *s), scope)?
            }
            AstKind::Index { object, index } => self.analyze_index(id, span, *object, *index, scope)?,
            AstKind::Slice { object, start, end } => {
                self.analyze_slice(id, span, *object, start.map(|s| *s), end.map(|e| *e), scope)?
            }
            AstKind::Cast { expr, target, implicit } => self.analyze_cast(id, span, *expr, target, implicit, scope)?,
            AstKind::New { target, count } => self.analyze_new(id, span, target, count.map(|c| *c), scope)?,
            AstKind::Typeinfo { mut target } => {
                self.concrete_slot_type(&mut target, scope)?;
                Ast::typed(id, span, TYPE, AstKind::Typeinfo { target })
            }
            _ => return Err(Error::semantic("expected an expression", span)),
        };
        if let Some(ty) = node.ty {
            self.ctx.register_type(ty, span)?;
        }
        self.allocate_temp_if_needed(&node, scope)?;
        Ok(node)
    }

    // ==================== Names ====================

    /// A name in value position. Proxies expand to a fresh copy of the
    /// expression they stand for.
    pub(crate) fn analyze_ident(
        &mut self,
        id: AstId,
        span: Span,
        name: String,
        var: Option<VarId>,
        as_callee: bool,
        scope: ScopeId,
    ) -> Result<Ast> {
        let var = match var {
            Some(v) => v,
            None => self
                .ctx
                .lookup_var(scope, &name, span)?
                .ok_or(Error::UndefinedVariable { name: name.clone(), span })?,
        };
        match self.ctx.var(var).binding.clone() {
            Binding::Alias(target) => {
                let mut expr = *target;
                expr.renumber(&mut self.ctx.ast_ids);
                expr.span = span;
                trace!("expanding proxy '{}'", name);
                if let AstKind::Ident { name, var } = expr.kind {
                    return self.analyze_ident(expr.id, span, name, var, as_callee, scope);
                }
                return self.analyze_expr(expr, scope);
            }
            Binding::Package(_) => {
                return Err(Error::semantic(format!("package '{}' is not a value", name), span));
            }
            Binding::Storage => {}
        }
        let v = self.ctx.var(var);
        if v.flags.global && !v.flags.function && !v.flags.ext && v.ty == VOID {
            return Err(Error::semantic(format!("'{}' is used before its declaration", name), span));
        }
        if !as_callee {
            if let Some(fid) = v.fn_id {
                if self.ctx.fn_decl(fid).polymorphic {
                    return Err(Error::semantic(
                        format!("polymorphic function '{}' can only be called", name),
                        span,
                    ));
                }
            }
        }
        let ty = v.ty;
        Ok(Ast::typed(id, span, ty, AstKind::Ident { name, var: Some(var) }))
    }

    /// Package bound to an unresolved identifier node, if any
    pub(crate) fn package_of(&self, ast: &Ast, scope: ScopeId) -> Result<Option<PackageId>> {
        let AstKind::Ident { name, var: None } = &ast.kind else {
            return Ok(None);
        };
        Ok(self.ctx.lookup_var(scope, name, ast.span)?.and_then(|v| self.ctx.var(v).package()))
    }

    pub(crate) fn package_member_var(&self, package: PackageId, member: &str, span: Span) -> Result<VarId> {
        self.ctx.package_member(package, member).ok_or_else(|| Error::UndefinedVariable {
            name: format!("{}.{}", self.ctx.package(package).name, member),
            span,
        })
    }

    fn enum_member(&mut self, id: AstId, span: Span, ty: TypeId, member: &str) -> Result<Ast> {
        let resolved = self.ctx.resolve(ty, span)?;
        let TypeKind::Enum(e) = self.ctx.kind(resolved) else {
            return Err(Error::semantic(format!("type '{}' is not a value", self.ctx.type_name(ty)), span));
        };
        let index = e.names.iter().position(|n| n == member).ok_or_else(|| Error::UnknownMember {
            member: member.to_string(),
            ty: e.name.clone(),
            span,
        })?;
        Ok(Ast::typed(id, span, resolved, AstKind::Literal(Literal::Enum { ty: resolved, index })))
    }

    // ==================== Member Access ====================

    fn analyze_dot(&mut self, id: AstId, span: Span, object: Ast, member: String, scope: ScopeId) -> Result<Ast> {
        // `pkg.name` and `Enum.Member` are resolved by name
        if let AstKind::Ident { name, var: None } = &object.kind {
            match self.ctx.lookup_var(scope, name, object.span)? {
                Some(v) => {
                    if let Some(package) = self.ctx.var(v).package() {
                        let var = self.package_member_var(package, &member, span)?;
                        return self.analyze_ident(id, span, member, Some(var), false, scope);
                    }
                }
                None => {
                    if let Some(ty) = self.ctx.lookup_type(scope, name) {
                        return self.enum_member(id, span, ty, &member);
                    }
                }
            }
        }
        // `pkg.Enum.Member`
        if let AstKind::Dot { object: inner, member: type_name } = &object.kind {
            if let Some(package) = self.package_of(inner, scope)? {
                let package_scope = self.ctx.package(package).scope;
                if !type_name.starts_with('_') {
                    if let Some(ty) = self.ctx.lookup_local_type(package_scope, type_name) {
                        return self.enum_member(id, span, ty, &member);
                    }
                }
            }
        }

        let object = self.analyze_expr(object, scope)?;
        let object_ty = self.resolve_ty(&object)?;
        let member_ty = self.member_type(object_ty, &member, span)?;
        Ok(Ast::typed(id, span, member_ty, AstKind::Dot { object: Box::new(object), member }))
    }

    /// Type of `.member` on a value of (resolved) type `object_ty`. Struct
    /// references are dereferenced implicitly; sequences expose `length`
    /// and `data`.
    pub(crate) fn member_type(&mut self, object_ty: TypeId, member: &str, span: Span) -> Result<TypeId> {
        let kind = self.ctx.kind(object_ty).clone();
        let unknown = |ctx: &crate::middle::CompilationContext| Error::UnknownMember {
            member: member.to_string(),
            ty: ctx.type_name(object_ty),
            span,
        };
        match kind {
            TypeKind::Struct(s) => s.member(member).map(|(_, t)| t).ok_or_else(|| unknown(self.ctx)),
            TypeKind::Ref { inner, .. } => {
                let inner = self.ctx.resolve(inner, span)?;
                match self.ctx.kind(inner) {
                    TypeKind::Struct(s) => s.member(member).map(|(_, t)| t).ok_or_else(|| unknown(self.ctx)),
                    _ => Err(Error::NotAStruct { ty: self.ctx.type_name(object_ty), span }),
                }
            }
            TypeKind::Array { inner, .. } | TypeKind::StaticArray { inner, .. } => match member {
                "length" => Ok(S64),
                "data" => Ok(self.ctx.ref_of(inner, false)),
                _ => Err(unknown(self.ctx)),
            },
            TypeKind::Basic { base: BaseKind::String, .. } => match member {
                "length" => Ok(S64),
                "data" => Ok(BASEPTR),
                _ => Err(unknown(self.ctx)),
            },
            _ => Err(Error::NotAStruct { ty: self.ctx.type_name(object_ty), span }),
        }
    }

    // ==================== Operators ====================

    fn invalid_operands(&self, op: &str, left: TypeId, right: Option<TypeId>, span: Span) -> Error {
        Error::InvalidOperands {
            op: op.to_string(),
            left: self.ctx.type_name(left),
            right: right.map(|r| self.ctx.type_name(r)).unwrap_or_default(),
            span,
        }
    }

    fn analyze_binop(&mut self, id: AstId, span: Span, op: BinOp, lhs: Ast, rhs: Ast, scope: ScopeId) -> Result<Ast> {
        let lhs = self.analyze_expr(lhs, scope)?;
        let rhs = self.analyze_expr(rhs, scope)?;
        if lhs.is_const_literal() && rhs.is_const_literal() {
            if let Some((lit, ty)) = self.fold_binop(op, &lhs, &rhs, span)? {
                return Ok(Ast::typed(id, span, ty, AstKind::Literal(lit)));
            }
        }
        let lt = self.resolve_ty(&lhs)?;
        let rt = self.resolve_ty(&rhs)?;
        let lk = self.ctx.kind(lt).clone();
        let rk = self.ctx.kind(rt).clone();
        let invalid = |this: &Self| this.invalid_operands(op.symbol(), lt, Some(rt), span);

        let (lhs, rhs, ty) = if op.is_logical() {
            if lt != BOOL || rt != BOOL {
                return Err(invalid(self));
            }
            (lhs, rhs, BOOL)
        } else if lt == STRING || rt == STRING {
            match op {
                _ if lt != rt => return Err(invalid(self)),
                BinOp::Add => (lhs, rhs, STRING),
                BinOp::Eq | BinOp::Ne => (lhs, rhs, BOOL),
                _ => return Err(invalid(self)),
            }
        } else if lk.is_numeric() && rk.is_numeric() {
            let promoted = self.promote_number_type(&lhs, &rhs)?;
            if (op.is_bitwise() || op == BinOp::Mod) && !self.ctx.is_integer(promoted) {
                return Err(invalid(self));
            }
            let lhs = self.promote_operand(lhs, promoted, scope)?;
            let rhs = self.promote_operand(rhs, promoted, scope)?;
            (lhs, rhs, if op.is_comparison() { BOOL } else { promoted })
        } else if matches!(op, BinOp::Eq | BinOp::Ne) {
            let pointer_like = |k: &TypeKind| {
                matches!(k, TypeKind::Ref { .. } | TypeKind::Func { .. }) || k.is_basic(BaseKind::BasePtr)
            };
            if lt == NULL && pointer_like(&rk) {
                (self.coerce(lhs, rt, scope)?, rhs, BOOL)
            } else if rt == NULL && pointer_like(&lk) {
                let rhs = self.coerce(rhs, lt, scope)?;
                (lhs, rhs, BOOL)
            } else {
                let both_pointers = pointer_like(&lk) && pointer_like(&rk);
                let same_scalar = matches!(lk, TypeKind::Enum(_) | TypeKind::Basic { .. })
                    && lt != ANY
                    && self.ctx.check_type(lt, rt);
                if !(both_pointers || same_scalar) {
                    return Err(invalid(self));
                }
                (lhs, rhs, BOOL)
            }
        } else if op.is_comparison() && matches!(lk, TypeKind::Enum(_)) && self.ctx.check_type(lt, rt) {
            (lhs, rhs, BOOL)
        } else {
            return Err(invalid(self));
        };
        Ok(Ast::typed(id, span, ty, AstKind::Binop { op, lhs: Box::new(lhs), rhs: Box::new(rhs) }))
    }

    fn analyze_unop(&mut self, id: AstId, span: Span, op: UnOp, operand: Ast, scope: ScopeId) -> Result<Ast> {
        let operand = self.analyze_expr(operand, scope)?;
        let t = self.resolve_ty(&operand)?;
        let kind = self.ctx.kind(t).clone();
        let ty = operand.ty.unwrap_or(t);

        let folded = match (&op, &operand.kind) {
            (UnOp::Neg, AstKind::Literal(Literal::Int(v))) => Some(Literal::Int(-*v)),
            (UnOp::Neg, AstKind::Literal(Literal::Float(x))) => Some(Literal::Float(-*x)),
            (UnOp::Not, AstKind::Literal(Literal::Bool(b))) => Some(Literal::Bool(!*b)),
            (UnOp::BitNot, AstKind::Literal(Literal::Int(v))) if kind.is_integer() => {
                let bits = kind.basic_size().unwrap_or(8) * 8;
                if kind.is_signed() {
                    Some(Literal::Int(!*v))
                } else {
                    Some(Literal::Int(!*v & ((1i128 << bits) - 1)))
                }
            }
            _ => None,
        };
        if let Some(lit) = folded {
            return Ok(Ast::typed(id, span, ty, AstKind::Literal(lit)));
        }

        let result = match op {
            UnOp::Neg if kind.is_numeric() => ty,
            UnOp::Not if t == BOOL => BOOL,
            UnOp::BitNot if kind.is_integer() => ty,
            UnOp::AddrOf => {
                if !self.ctx.is_addressable(&operand) {
                    return Err(Error::semantic("cannot take the address of a temporary value", span));
                }
                self.ctx.ref_of(ty, false)
            }
            UnOp::Deref => match kind {
                TypeKind::Ref { inner, .. } => inner,
                _ => return Err(Error::CannotDeref { ty: self.ctx.type_name(t), span }),
            },
            _ => return Err(self.invalid_operands(op.symbol(), t, None, span)),
        };
        Ok(Ast::typed(id, span, result, AstKind::Unop { op, operand: Box::new(operand) }))
    }

    // ==================== Indexing ====================

    /// Integer operand used as an index or a length
    pub(crate) fn integer_operand(&mut self, expr: Ast, scope: ScopeId) -> Result<Ast> {
        let expr = self.analyze_expr(expr, scope)?;
        if is_numeric_literal(&expr) {
            return self.coerce(expr, S64, scope);
        }
        let t = self.resolve_ty(&expr)?;
        if self.ctx.is_integer(t) {
            Ok(expr)
        } else {
            Err(Error::TypeMismatch { expected: "integer".to_string(), got: self.ctx.type_name(t), span: expr.span })
        }
    }

    fn analyze_index(&mut self, id: AstId, span: Span, object: Ast, index: Ast, scope: ScopeId) -> Result<Ast> {
        let object = self.analyze_expr(object, scope)?;
        let index = self.integer_operand(index, scope)?;
        let t = self.resolve_ty(&object)?;
        let mut kind = self.ctx.kind(t).clone();
        if let TypeKind::Ref { inner, .. } = kind {
            let inner = self.ctx.resolve(inner, span)?;
            kind = self.ctx.kind(inner).clone();
        }
        let elem = match kind {
            TypeKind::Array { inner, .. } => inner,
            TypeKind::StaticArray { inner, length } => {
                if let AstKind::Literal(Literal::Int(i)) = index.kind {
                    if i < 0 || i as u64 >= length {
                        return Err(Error::semantic(
                            format!("index {} is out of bounds for {}", i, self.ctx.type_name(t)),
                            index.span,
                        ));
                    }
                }
                inner
            }
            TypeKind::Basic { base: BaseKind::String, .. } => U8,
            _ => return Err(Error::NotIndexable { ty: self.ctx.type_name(t), span }),
        };
        Ok(Ast::typed(id, span, elem, AstKind::Index { object: Box::new(object), index: Box::new(index) }))
    }

    fn analyze_slice(
        &mut self,
        id: AstId,
        span: Span,
        object: Ast,
        start: Option<Ast>,
        end: Option<Ast>,
        scope: ScopeId,
    ) -> Result<Ast> {
        let object = self.analyze_expr(object, scope)?;
        let start = start.map(|s| self.integer_operand(s, scope)).transpose()?;
        let end = end.map(|e| self.integer_operand(e, scope)).transpose()?;
        let t = self.resolve_ty(&object)?;
        let ty = match self.ctx.kind(t).clone() {
            TypeKind::Array { inner, .. } => self.ctx.array_of(inner, false),
            TypeKind::StaticArray { inner, .. } => {
                if !self.ctx.is_addressable(&object) && self.ctx.value_temp(&object).is_none() {
                    return Err(Error::semantic("cannot slice a temporary fixed-size array", span));
                }
                self.ctx.array_of(inner, false)
            }
            TypeKind::Basic { base: BaseKind::String, .. } => STRING,
            _ => return Err(Error::NotIndexable { ty: self.ctx.type_name(t), span }),
        };
        Ok(Ast::typed(
            id,
            span,
            ty,
            AstKind::Slice { object: Box::new(object), start: start.map(Box::new), end: end.map(Box::new) },
        ))
    }

    // ==================== Casts and Allocation ====================

    fn analyze_cast(
        &mut self,
        id: AstId,
        span: Span,
        expr: Ast,
        mut target: TypeSlot,
        implicit: bool,
        scope: ScopeId,
    ) -> Result<Ast> {
        if implicit {
            // inserted by an earlier visit; the target is already concrete
            let ty = target.ty.ok_or_else(|| Error::internal("implicit cast without a type"))?;
            let inner = self.analyze_expr(expr, scope)?;
            if ty == ANY {
                self.any_storage(id, &inner, scope);
            }
            return Ok(Ast::typed(id, span, ty, AstKind::Cast { expr: Box::new(inner), target, implicit }));
        }

        let to = self.concrete_slot_type(&mut target, scope)?;
        let compound = matches!(expr.kind, AstKind::Literal(Literal::Compound(_)));
        let inner = self.analyze_with_expected(expr, Some(to), scope)?;
        let from = inner.ty.unwrap_or(VOID);
        if !compound && !is_numeric_literal(&inner) && self.ctx.check_type(from, to) {
            return Err(Error::RedundantCast { ty: self.ctx.type_name(to), span });
        }
        if compound {
            return Ok(inner);
        }
        if let Some(kind) = self.coercion_kind(&inner, to) {
            return self.apply_coercion(inner, kind, to, scope);
        }
        if self.ctx.can_cast(from, to) {
            return Ok(Ast::typed(id, span, to, AstKind::Cast { expr: Box::new(inner), target, implicit: false }));
        }
        Err(Error::InvalidCast { from: self.ctx.type_name(from), to: self.ctx.type_name(to), span })
    }

    fn analyze_new(
        &mut self,
        id: AstId,
        span: Span,
        mut target: TypeSlot,
        count: Option<Ast>,
        scope: ScopeId,
    ) -> Result<Ast> {
        let elem = self.concrete_slot_type(&mut target, scope)?;
        if elem == VOID {
            return Err(Error::semantic("cannot allocate a void value", span));
        }
        let count = count.map(|c| self.integer_operand(c, scope)).transpose()?;
        let ty = if count.is_some() { self.ctx.array_of(elem, true) } else { self.ctx.ref_of(elem, true) };
        Ok(Ast::typed(id, span, ty, AstKind::New { target, count: count.map(Box::new) }))
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{analyze, analyze_with};
    use super::*;
    use crate::frontend::package::MemoryPackageLoader;

    #[test]
    fn test_undefined_names() {
        let err = analyze("fn main() { x := y; }").unwrap_err();
        assert!(matches!(err, Error::UndefinedVariable { ref name, .. } if name == "y"));
    }

    #[test]
    fn test_member_access() {
        let src = "type P struct { x: int; }
                   fn main() { p := P{x = 1}; r := &p; a := p.x; b := r.x; }";
        assert!(analyze(src).is_ok());
        let err = analyze("type P struct { x: int; }\nfn main() { p := P{x = 1}; a := p.y; }").unwrap_err();
        assert!(matches!(err, Error::UnknownMember { .. }));
        let err = analyze("fn main() { n := 1; a := n.x; }").unwrap_err();
        assert!(matches!(err, Error::NotAStruct { .. }));
    }

    #[test]
    fn test_sequence_length() {
        assert!(analyze("fn main() { s := \"abc\"; n: int = s.length; a: [3]int; m: int = a.length; }").is_ok());
    }

    #[test]
    fn test_enum_members_by_name() {
        let src = "enum Color { Red, Green = 5, Blue }
                   fn main() { c := Color.Blue; same := c == Color.Red; }";
        let ctx = analyze(src).unwrap();
        let color = ctx
            .types
            .iter()
            .find_map(|k| k.as_enum().filter(|e| e.name == "Color").cloned())
            .unwrap();
        assert_eq!(color.values, vec![0, 5, 6]);
    }

    #[test]
    fn test_qualified_enum_member() {
        let mut loader = MemoryPackageLoader::new();
        loader.add_file("gfx", "gfx.vs", "enum Mode { Fill, Line }");
        assert!(analyze_with("#import \"gfx\";\nfn main() { m := gfx.Mode.Line; }", &mut loader).is_ok());
    }

    #[test]
    fn test_operand_checks() {
        let err = analyze("fn main() { a := 1 && true; }").unwrap_err();
        assert!(matches!(err, Error::InvalidOperands { .. }));
        let err = analyze("fn main() { s := \"a\"; n := s - \"b\"; }").unwrap_err();
        assert!(matches!(err, Error::InvalidOperands { .. }));
        let err = analyze("fn main() { f: float = 1.5; g := f % 2.0; }").unwrap_err();
        assert!(matches!(err, Error::InvalidOperands { .. }));
        assert!(analyze("fn main() { p: &int = null; b := p == null; }").is_ok());
    }

    #[test]
    fn test_address_and_deref() {
        assert!(analyze("fn main() { x := 1; p := &x; y: int = *p; }").is_ok());
        let err = analyze("fn main() { p := &1; }").unwrap_err();
        assert!(matches!(err, Error::Semantic { .. }));
        let err = analyze("fn main() { x := 1; y := *x; }").unwrap_err();
        assert!(matches!(err, Error::CannotDeref { .. }));
    }

    #[test]
    fn test_indexing() {
        assert!(analyze("fn main() { a: [3]int; x := a[2]; s := \"hi\"; c: u8 = s[0]; }").is_ok());
        let err = analyze("fn main() { a: [3]int; x := a[3]; }").unwrap_err();
        assert!(matches!(err, Error::Semantic { .. }));
        let err = analyze("fn main() { n := 3; x := n[0]; }").unwrap_err();
        assert!(matches!(err, Error::NotIndexable { .. }));
    }

    #[test]
    fn test_slices() {
        let ctx = analyze("fn main() { a: [4]int; v := a[1:3]; s := \"hello\"; t := s[1:]; }").unwrap();
        let temps = ctx.vars.iter().filter(|v| v.flags.temp && v.ty == STRING).count();
        // the string literal and the string slice
        assert_eq!(temps, 2);
    }

    #[test]
    fn test_casts() {
        assert!(analyze("fn main() { x := 300; f := x as float; u: u32 = 7; w := u as int; }").is_ok());
        let lossy = [
            "fn main() { x := 300; y := x as u8; }",
            "fn main() { x := 300; b := x as bool; }",
            "fn main() { x: u64 = 300; y := x as u8; }",
            "fn main() { x: f64 = 2.5; y := x as s32; }",
            "fn main() { x := 3; y := x as f32; }",
            "fn main() { x: s32 = 3; y := x as u32; }",
        ];
        for src in lossy {
            let err = analyze(src).unwrap_err();
            assert!(matches!(err, Error::InvalidCast { .. }), "{}: {:?}", src, err);
        }
        let err = analyze("fn main() { x := 3; y := x as int; }").unwrap_err();
        assert!(matches!(err, Error::RedundantCast { .. }));
        let err = analyze("type P struct { x: int; }\nfn main() { p := P{x = 1}; n := p as int; }").unwrap_err();
        assert!(matches!(err, Error::InvalidCast { .. }));
    }

    #[test]
    fn test_new_gives_owned_types() {
        let ctx = analyze("fn main() { p := new int; a := new [4]int; }").unwrap();
        let owned = ctx
            .vars
            .iter()
            .filter(|v| !v.flags.temp && (v.name == "p" || v.name == "a"))
            .all(|v| ctx.is_owned(v.ty));
        assert!(owned);
    }

    #[test]
    fn test_typeinfo_is_type_valued() {
        let ctx = analyze("type P struct { x: int; }\nfn main() { t := typeinfo(P); }").unwrap();
        let t = ctx.vars.iter().find(|v| v.name == "t").unwrap();
        assert_eq!(t.ty, TYPE);
    }

    #[test]
    fn test_polymorphic_function_is_not_a_value() {
        let err = analyze("fn id(x: $T) -> T { return x; }\nfn main() { f := id; }").unwrap_err();
        assert!(matches!(err, Error::Semantic { .. }));
    }
}
