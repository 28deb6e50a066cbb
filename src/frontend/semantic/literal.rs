//! Literals: typing, compound literals, constant folding and precision checks

use crate::frontend::ast::{Ast, AstId, AstKind, BinOp, Literal, TypeSlot};
use crate::middle::ScopeId;
use crate::types::{TypeId, TypeKind, BOOL, F64, NULL, S64, STRING, U64};
use crate::utils::{Error, Result, Span};

use super::Analyzer;

/// Largest integer each float width represents exactly
const F32_MANTISSA_LIMIT: i128 = 1 << 24;
const F64_MANTISSA_LIMIT: i128 = 1 << 53;

/// Why the integer `value` does not fit `kind`, if it does not
pub(crate) fn int_misfit(value: i128, kind: &TypeKind) -> Option<String> {
    let size = kind.basic_size()? as u32;
    if kind.is_float() {
        let limit = if size == 4 { F32_MANTISSA_LIMIT } else { F64_MANTISSA_LIMIT };
        return (value.abs() > limit).then(|| format!("exceeds the {}-bit float mantissa", size * 8));
    }
    if !kind.is_integer() {
        return None;
    }
    let bits = size * 8;
    if kind.is_signed() {
        let max = (1i128 << (bits - 1)) - 1;
        let min = -(1i128 << (bits - 1));
        (value < min || value > max).then(|| "signed overflow".to_string())
    } else if value < 0 {
        Some("negative value for an unsigned type".to_string())
    } else {
        (value > (1i128 << bits) - 1).then(|| "unsigned overflow".to_string())
    }
}

impl<'a> Analyzer<'a> {
    pub(crate) fn analyze_literal(
        &mut self,
        id: AstId,
        span: Span,
        ty: Option<TypeId>,
        lit: Literal,
        expected: Option<TypeId>,
        scope: ScopeId,
    ) -> Result<Ast> {
        let lit = match lit {
            Literal::Struct { target, members } => {
                return self.analyze_struct_literal(id, span, target, members, scope)
            }
            Literal::Array { elem, length, items } => {
                return self.analyze_array_literal(id, span, elem, length, items, scope)
            }
            Literal::Compound(items) => return self.analyze_compound(id, span, items, expected, scope),
            scalar => scalar,
        };
        let default_ty = match &lit {
            Literal::Int(v) => {
                // representable as either s64 or u64
                let signed = int_misfit(*v, self.ctx.kind(S64));
                let unsigned = int_misfit(*v, self.ctx.kind(U64));
                if let (Some(reason), Some(_)) = (signed, unsigned) {
                    return Err(Error::PrecisionLoss { value: v.to_string(), ty: "int".to_string(), reason, span });
                }
                if *v > i64::MAX as i128 {
                    U64
                } else {
                    S64
                }
            }
            Literal::Float(_) => F64,
            Literal::Bool(_) => BOOL,
            Literal::Str(_) => STRING,
            Literal::Null => NULL,
            Literal::Enum { ty, .. } => *ty,
            _ => return Err(Error::internal("aggregate literal reached scalar typing")),
        };
        Ok(Ast::typed(id, span, ty.unwrap_or(default_ty), AstKind::Literal(lit)))
    }

    /// Give `{...}` the shape of the type it is expected to have
    fn analyze_compound(
        &mut self,
        id: AstId,
        span: Span,
        items: Vec<Ast>,
        expected: Option<TypeId>,
        scope: ScopeId,
    ) -> Result<Ast> {
        let Some(expected) = expected else {
            return Err(Error::CannotInfer { what: "the type of a compound literal".to_string(), span });
        };
        let target = self.ctx.resolve(expected, span)?;
        match self.ctx.kind(target).clone() {
            TypeKind::Struct(_) => {
                let members = items.into_iter().map(|item| (None, item)).collect();
                self.analyze_struct_literal(id, span, TypeSlot::resolved(target, span), members, scope)
            }
            TypeKind::StaticArray { inner, length } => {
                self.analyze_array_literal(id, span, TypeSlot::resolved(inner, span), Some(length), items, scope)
            }
            TypeKind::Array { inner, .. } => {
                self.analyze_array_literal(id, span, TypeSlot::resolved(inner, span), None, items, scope)
            }
            _ => Err(Error::TypeMismatch {
                expected: self.ctx.type_name(expected),
                got: "compound literal".to_string(),
                span,
            }),
        }
    }

    /// `Name{a = x}` or `Name{x, y}`; members are stored by name
    fn analyze_struct_literal(
        &mut self,
        id: AstId,
        span: Span,
        mut target: TypeSlot,
        members: Vec<(Option<String>, Ast)>,
        scope: ScopeId,
    ) -> Result<Ast> {
        let ty = self.concrete_slot_type(&mut target, scope)?;
        let Some(shape) = self.ctx.struct_of(ty).cloned() else {
            return Err(Error::NotAStruct { ty: self.ctx.type_name(ty), span });
        };
        let named = members.iter().filter(|(n, _)| n.is_some()).count();
        if named != 0 && named != members.len() {
            return Err(Error::MixedStructLiteral { span });
        }
        if members.len() > shape.members.len() {
            return Err(Error::ArgCountMismatch { expected: shape.members.len(), got: members.len(), span });
        }

        let mut analyzed: Vec<(Option<String>, Ast)> = Vec::with_capacity(members.len());
        for (position, (name, value)) in members.into_iter().enumerate() {
            let (member, member_ty) = match name {
                Some(name) => match shape.member(&name) {
                    Some((_, t)) => (name, t),
                    None => {
                        return Err(Error::UnknownMember { member: name, ty: self.ctx.type_name(ty), span: value.span })
                    }
                },
                None => shape.members[position].clone(),
            };
            if analyzed.iter().any(|(m, _)| m.as_deref() == Some(member.as_str())) {
                return Err(Error::DuplicateDefinition { name: member, span: value.span });
            }
            let value = self.analyze_with_expected(value, Some(member_ty), scope)?;
            let value = self.coerce(value, member_ty, scope)?;
            analyzed.push((Some(member), value));
        }
        Ok(Ast::typed(id, span, ty, AstKind::Literal(Literal::Struct { target, members: analyzed })))
    }

    /// `[N]T{...}` stays a fixed-size value. `[]T{...}` becomes a view over
    /// a fixed-size backing literal, which owns the storage (and its temp).
    fn analyze_array_literal(
        &mut self,
        id: AstId,
        span: Span,
        mut elem: TypeSlot,
        length: Option<u64>,
        items: Vec<Ast>,
        scope: ScopeId,
    ) -> Result<Ast> {
        let elem_ty = self.concrete_slot_type(&mut elem, scope)?;
        if let Some(n) = length {
            if items.len() as u64 > n {
                return Err(Error::ArgCountMismatch { expected: n as usize, got: items.len(), span });
            }
        }
        let mut analyzed = Vec::with_capacity(items.len());
        for item in items {
            let item = self.analyze_with_expected(item, Some(elem_ty), scope)?;
            analyzed.push(self.coerce(item, elem_ty, scope)?);
        }
        let n = length.unwrap_or(analyzed.len() as u64);
        let static_ty = self.ctx.static_array_of(elem_ty, n);
        self.ctx.register_type(static_ty, span)?;
        let literal = Ast::typed(
            id,
            span,
            static_ty,
            AstKind::Literal(Literal::Array { elem, length: Some(n), items: analyzed }),
        );
        if length.is_some() {
            return Ok(literal);
        }
        self.allocate_temp_if_needed(&literal, scope)?;
        let view = self.ctx.array_of(elem_ty, false);
        self.ctx.register_type(view, span)?;
        Ok(self.implicit_cast(literal, view))
    }

    // ==================== Precision ====================

    /// Why a numeric literal cannot take type `to` (already resolved)
    pub(crate) fn literal_misfit(&self, expr: &Ast, to: TypeId) -> Option<String> {
        let kind = self.ctx.kind(to);
        match &expr.kind {
            AstKind::Literal(Literal::Int(v)) => int_misfit(*v, kind),
            AstKind::Literal(Literal::Float(x)) => {
                if kind.is_float() {
                    let overflow = kind.basic_size() == Some(4) && x.is_finite() && x.abs() > f32::MAX as f64;
                    overflow.then(|| "f32 overflow".to_string())
                } else if kind.is_integer() {
                    if x.fract() != 0.0 || !x.is_finite() {
                        Some("fractional value".to_string())
                    } else {
                        int_misfit(*x as i128, kind)
                    }
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    /// A numeric literal that fits `to`, retyped (and converted) in place
    pub(crate) fn retype_literal(&mut self, mut expr: Ast, to: TypeId) -> Ast {
        let kind = self.ctx.kind(to).clone();
        let converted = match &expr.kind {
            AstKind::Literal(Literal::Int(v)) if kind.is_float() => Some(Literal::Float(*v as f64)),
            AstKind::Literal(Literal::Float(x)) if kind.is_integer() => Some(Literal::Int(*x as i128)),
            _ => None,
        };
        if let Some(lit) = converted {
            expr.kind = AstKind::Literal(lit);
        }
        expr.ty = Some(to);
        expr
    }

    // ==================== Folding ====================

    /// Evaluate `lhs op rhs` over two scalar literals. `None` leaves the
    /// operation to run time (or to the operand checks to reject).
    pub(crate) fn fold_binop(&mut self, op: BinOp, lhs: &Ast, rhs: &Ast, span: Span) -> Result<Option<(Literal, TypeId)>> {
        let (AstKind::Literal(l), AstKind::Literal(r)) = (&lhs.kind, &rhs.kind) else {
            return Ok(None);
        };
        let folded = match (l, r) {
            (Literal::Int(a), Literal::Int(b)) => {
                let ty = self.promote_number_type(lhs, rhs)?;
                self.fold_int(op, *a, *b, ty, span)?
            }
            (Literal::Int(_) | Literal::Float(_), Literal::Int(_) | Literal::Float(_)) => {
                let a = as_float(l);
                let b = as_float(r);
                let ty = self.promote_number_type(lhs, rhs)?;
                fold_float(op, a, b, ty)
            }
            (Literal::Bool(a), Literal::Bool(b)) => match op {
                BinOp::And => Some((Literal::Bool(*a && *b), BOOL)),
                BinOp::Or => Some((Literal::Bool(*a || *b), BOOL)),
                BinOp::Eq => Some((Literal::Bool(a == b), BOOL)),
                BinOp::Ne => Some((Literal::Bool(a != b), BOOL)),
                _ => None,
            },
            (Literal::Str(a), Literal::Str(b)) => match op {
                BinOp::Add => Some((Literal::Str(format!("{}{}", a, b)), STRING)),
                BinOp::Eq => Some((Literal::Bool(a == b), BOOL)),
                BinOp::Ne => Some((Literal::Bool(a != b), BOOL)),
                _ => None,
            },
            (Literal::Enum { ty: ta, index: ia }, Literal::Enum { ty: tb, index: ib })
                if self.ctx.check_type(*ta, *tb) =>
            {
                let values = self.ctx.resolved_kind(*ta).as_enum().map(|e| e.values.clone()).unwrap_or_default();
                let (a, b) = (values.get(*ia).copied(), values.get(*ib).copied());
                match op {
                    BinOp::Eq => Some((Literal::Bool(a == b), BOOL)),
                    BinOp::Ne => Some((Literal::Bool(a != b), BOOL)),
                    _ => None,
                }
            }
            (Literal::Null, Literal::Null) => match op {
                BinOp::Eq => Some((Literal::Bool(true), BOOL)),
                BinOp::Ne => Some((Literal::Bool(false), BOOL)),
                _ => None,
            },
            _ => None,
        };
        Ok(folded)
    }

    fn fold_int(&mut self, op: BinOp, a: i128, b: i128, ty: TypeId, span: Span) -> Result<Option<(Literal, TypeId)>> {
        let value = match op {
            BinOp::Add => a.checked_add(b),
            BinOp::Sub => a.checked_sub(b),
            BinOp::Mul => a.checked_mul(b),
            BinOp::Div | BinOp::Mod if b == 0 => return Err(Error::DivisionByZero { span }),
            BinOp::Div => a.checked_div(b),
            BinOp::Mod => a.checked_rem(b),
            BinOp::BitAnd => Some(a & b),
            BinOp::BitOr => Some(a | b),
            BinOp::BitXor => Some(a ^ b),
            BinOp::Shl | BinOp::Shr if !(0..64).contains(&b) => {
                return Err(Error::semantic(format!("shift by {} is out of range", b), span))
            }
            BinOp::Shl => a.checked_shl(b as u32),
            BinOp::Shr => Some(a >> b),
            BinOp::Eq => return Ok(Some((Literal::Bool(a == b), BOOL))),
            BinOp::Ne => return Ok(Some((Literal::Bool(a != b), BOOL))),
            BinOp::Lt => return Ok(Some((Literal::Bool(a < b), BOOL))),
            BinOp::Le => return Ok(Some((Literal::Bool(a <= b), BOOL))),
            BinOp::Gt => return Ok(Some((Literal::Bool(a > b), BOOL))),
            BinOp::Ge => return Ok(Some((Literal::Bool(a >= b), BOOL))),
            BinOp::And | BinOp::Or => return Ok(None),
        };
        let Some(value) = value else {
            return Err(Error::PrecisionLoss {
                value: format!("{} {} {}", a, op.symbol(), b),
                ty: self.ctx.type_name(ty),
                reason: "overflow while folding".to_string(),
                span,
            });
        };
        if let Some(reason) = int_misfit(value, self.ctx.resolved_kind(ty)) {
            return Err(Error::PrecisionLoss { value: value.to_string(), ty: self.ctx.type_name(ty), reason, span });
        }
        Ok(Some((Literal::Int(value), ty)))
    }
}

fn as_float(lit: &Literal) -> f64 {
    match lit {
        Literal::Int(v) => *v as f64,
        Literal::Float(x) => *x,
        _ => 0.0,
    }
}

fn fold_float(op: BinOp, a: f64, b: f64, ty: TypeId) -> Option<(Literal, TypeId)> {
    let value = match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::Div => a / b,
        BinOp::Eq => return Some((Literal::Bool(a == b), BOOL)),
        BinOp::Ne => return Some((Literal::Bool(a != b), BOOL)),
        BinOp::Lt => return Some((Literal::Bool(a < b), BOOL)),
        BinOp::Le => return Some((Literal::Bool(a <= b), BOOL)),
        BinOp::Gt => return Some((Literal::Bool(a > b), BOOL)),
        BinOp::Ge => return Some((Literal::Bool(a >= b), BOOL)),
        _ => return None,
    };
    Some((Literal::Float(value), ty))
}

#[cfg(test)]
mod tests {
    use super::super::tests::analyze;
    use super::*;
    use crate::types::{builtin_kinds, F32, S8, U8};

    #[test]
    fn test_int_misfit_bounds() {
        let kinds = builtin_kinds();
        assert!(int_misfit(127, &kinds[S8.0]).is_none());
        assert_eq!(int_misfit(128, &kinds[S8.0]).as_deref(), Some("signed overflow"));
        assert_eq!(int_misfit(-1, &kinds[U8.0]).as_deref(), Some("negative value for an unsigned type"));
        assert_eq!(int_misfit(256, &kinds[U8.0]).as_deref(), Some("unsigned overflow"));
        assert!(int_misfit(1 << 24, &kinds[F32.0]).is_none());
        assert!(int_misfit((1 << 24) + 1, &kinds[F32.0]).is_some());
    }

    #[test]
    fn test_precision_errors() {
        for src in [
            "x: u8 = 256;",
            "x: s8 = -129;",
            "x: u32 = -1;",
            "x: f32 = 16777217;",
            "x: int = 1.5;",
            "x: f32 = 1000000000000000000000000000000000000000.0;",
        ] {
            let err = analyze(src).unwrap_err();
            assert!(matches!(err, Error::PrecisionLoss { .. }), "{}: {:?}", src, err);
        }
        assert!(analyze("x: u8 = 255; y: f32 = 0.5; z: int = 2.0;").is_ok());
    }

    #[test]
    fn test_division_by_zero_is_rejected_when_folding() {
        let err = analyze("x := 1 / 0;").unwrap_err();
        assert!(matches!(err, Error::DivisionByZero { .. }));
    }

    #[test]
    fn test_folded_string_and_comparison() {
        let ctx = analyze("s := \"ab\" + \"cd\"; b := 2 < 3;").unwrap();
        let unit = ctx.units.last().unwrap();
        let AstKind::Block { stmts, .. } = &unit.ast.as_ref().unwrap().kind else { panic!() };
        let rhs = |i: usize| match &stmts[i].kind {
            AstKind::Assign { rhs, .. } => rhs.kind.clone(),
            other => panic!("{:?}", other),
        };
        assert!(matches!(rhs(1), AstKind::Literal(Literal::Str(s)) if s == "abcd"));
        assert!(matches!(rhs(3), AstKind::Literal(Literal::Bool(true))));
    }

    #[test]
    fn test_struct_literals() {
        let base = "type P struct { x: int; y: int; }\n";
        assert!(analyze(&format!("{}fn main() {{ p := P{{x = 1, y = 2}}; q := P{{1, 2}}; }}", base)).is_ok());
        let err = analyze(&format!("{}fn main() {{ p := P{{x = 1, 2}}; }}", base)).unwrap_err();
        assert!(matches!(err, Error::MixedStructLiteral { .. }));
        let err = analyze(&format!("{}fn main() {{ p := P{{z = 1}}; }}", base)).unwrap_err();
        assert!(matches!(err, Error::UnknownMember { .. }));
        let err = analyze(&format!("{}fn main() {{ p := P{{1, 2, 3}}; }}", base)).unwrap_err();
        assert!(matches!(err, Error::ArgCountMismatch { .. }));
    }

    #[test]
    fn test_compound_literal_needs_an_expected_type() {
        assert!(analyze("type P struct { x: int; }\nfn main() { p: P = {1}; a: [2]int = {1, 2}; }").is_ok());
        let err = analyze("fn main() { p := {1}; }").unwrap_err();
        assert!(matches!(err, Error::CannotInfer { .. }));
    }

    #[test]
    fn test_dynamic_array_literal_is_a_view_over_a_backing_temp() {
        let ctx = analyze("fn main() { a := []int{1, 2, 3}; }").unwrap();
        let f = ctx.fns.iter().find(|f| f.name == "main").unwrap();
        let AstKind::Block { stmts, .. } = &f.body.as_ref().unwrap().kind else { panic!() };
        let AstKind::Decl(decl) = &stmts[0].kind else { panic!() };
        let init = decl.init.as_ref().unwrap();
        let AstKind::Cast { expr, implicit: true, .. } = &init.kind else { panic!("{:?}", init.kind) };
        assert!(ctx.find_temp_var(expr.id).is_some());
        assert!(matches!(ctx.resolved_kind(init.ty.unwrap()), TypeKind::Array { owned: false, .. }));
    }
}
