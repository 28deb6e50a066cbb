//! Implicit coercions, numeric promotion and temp allocation

use crate::frontend::ast::{Ast, AstKind, Literal, TypeSlot};
use crate::middle::ScopeId;
use crate::types::{BaseKind, TypeId, TypeKind, ANY, F64, VOID};
use crate::utils::{Error, Result};

use super::Analyzer;

/// How a value of one type becomes a value of another without an explicit cast
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Coercion {
    /// Types already agree
    Same,
    /// Numeric literal retyped in place
    Literal,
    /// `null` given a pointer-like type
    NullLiteral,
    /// Value wrapped together with its typeinfo
    ToAny,
    /// Owned `Ref`/`Array` viewed as borrowed
    Borrow,
    /// `[N]T` viewed as `[]T`
    StaticToArray,
    /// Lossless numeric widening
    Numeric,
    /// Typed reference to `ptr`
    Pointer,
}

/// Widening that never loses information
fn is_widening(from: &TypeKind, to: &TypeKind) -> bool {
    let (Some(from_size), Some(to_size)) = (from.basic_size(), to.basic_size()) else {
        return false;
    };
    match (from.is_float(), to.is_float()) {
        (false, true) if from.is_signed() => to_size >= from_size,
        (false, true) => to_size > from_size,
        (true, true) => to_size > from_size,
        (true, false) => false,
        (false, false) if from.is_signed() == to.is_signed() => to_size > from_size,
        // unsigned into a strictly larger signed type
        (false, false) => !from.is_signed() && to_size > from_size,
    }
}

pub(crate) fn is_numeric_literal(ast: &Ast) -> bool {
    matches!(ast.kind, AstKind::Literal(Literal::Int(_) | Literal::Float(_)))
}

impl<'a> Analyzer<'a> {
    /// Resolved type of an analyzed node
    pub(crate) fn resolve_ty(&mut self, ast: &Ast) -> Result<TypeId> {
        let ty = ast
            .ty
            .ok_or_else(|| Error::internal(format!("node {} has no type after analysis", ast.id.0)))?;
        self.ctx.resolve(ty, ast.span)
    }

    /// The implicit coercion taking `expr` to `to`, if there is one
    pub(crate) fn coercion_kind(&mut self, expr: &Ast, to: TypeId) -> Option<Coercion> {
        let from = expr.ty?;
        if self.ctx.check_type(from, to) {
            return Some(Coercion::Same);
        }
        let to_r = self.ctx.resolve(to, expr.span).ok()?;
        let from_r = self.ctx.resolve(from, expr.span).ok()?;
        let to_kind = self.ctx.kind(to_r).clone();
        let from_kind = self.ctx.kind(from_r).clone();

        if is_numeric_literal(expr) && to_kind.is_numeric() {
            return self.literal_misfit(expr, to_r).is_none().then_some(Coercion::Literal);
        }
        if matches!(expr.kind, AstKind::Literal(Literal::Null))
            && (matches!(to_kind, TypeKind::Ref { .. } | TypeKind::Func { .. })
                || to_kind.is_basic(BaseKind::BasePtr))
        {
            return Some(Coercion::NullLiteral);
        }
        if to_r == ANY {
            return Some(Coercion::ToAny);
        }
        match (&from_kind, &to_kind) {
            (TypeKind::Ref { inner: a, owned: true }, TypeKind::Ref { inner: b, owned: false })
            | (TypeKind::Array { inner: a, owned: true }, TypeKind::Array { inner: b, owned: false })
                if self.ctx.check_type(*a, *b) =>
            {
                Some(Coercion::Borrow)
            }
            (TypeKind::StaticArray { inner: a, .. }, TypeKind::Array { inner: b, owned: false })
                if self.ctx.check_type(*a, *b) =>
            {
                Some(Coercion::StaticToArray)
            }
            (TypeKind::Ref { .. }, _) if to_kind.is_basic(BaseKind::BasePtr) => Some(Coercion::Pointer),
            _ if from_kind.is_numeric() && to_kind.is_numeric() && is_widening(&from_kind, &to_kind) => {
                Some(Coercion::Numeric)
            }
            _ => None,
        }
    }

    /// Coerce `expr` to `to` or fail; the result's type equals `to`
    pub(crate) fn coerce(&mut self, expr: Ast, to: TypeId, scope: ScopeId) -> Result<Ast> {
        if let Some(kind) = self.coercion_kind(&expr, to) {
            return self.apply_coercion(expr, kind, to, scope);
        }
        let to_r = self.ctx.resolve(to, expr.span)?;
        if is_numeric_literal(&expr) && self.ctx.is_numeric(to_r) {
            if let Some(reason) = self.literal_misfit(&expr, to_r) {
                return Err(Error::PrecisionLoss {
                    value: literal_text(&expr),
                    ty: self.ctx.type_name(to),
                    reason,
                    span: expr.span,
                });
            }
        }
        Err(Error::TypeMismatch {
            expected: self.ctx.type_name(to),
            got: self.ctx.type_name(expr.ty.unwrap_or(VOID)),
            span: expr.span,
        })
    }

    pub(crate) fn apply_coercion(&mut self, mut expr: Ast, kind: Coercion, to: TypeId, scope: ScopeId) -> Result<Ast> {
        match kind {
            Coercion::Same => Ok(expr),
            Coercion::Literal => {
                let to_r = self.ctx.resolve(to, expr.span)?;
                Ok(self.retype_literal(expr, to_r))
            }
            Coercion::NullLiteral => {
                expr.ty = Some(to);
                Ok(expr)
            }
            Coercion::ToAny => self.wrap_any(expr, scope),
            Coercion::Borrow | Coercion::StaticToArray | Coercion::Numeric | Coercion::Pointer => {
                Ok(self.implicit_cast(expr, to))
            }
        }
    }

    /// Compiler-inserted conversion node
    pub(crate) fn implicit_cast(&mut self, expr: Ast, to: TypeId) -> Ast {
        let id = self.ctx.fresh_ast_id();
        let span = expr.span;
        Ast::typed(
            id,
            span,
            to,
            AstKind::Cast { expr: Box::new(expr), target: TypeSlot::resolved(to, span), implicit: true },
        )
    }

    /// `any` wrapper; values without an address get a temp to point at
    fn wrap_any(&mut self, expr: Ast, scope: ScopeId) -> Result<Ast> {
        let inner_ty = expr.ty.unwrap_or(VOID);
        self.ctx.register_type(inner_ty, expr.span)?;
        let cast = self.implicit_cast(expr, ANY);
        if let AstKind::Cast { expr, .. } = &cast.kind {
            self.any_storage(cast.id, expr, scope);
        }
        Ok(cast)
    }

    pub(crate) fn any_storage(&mut self, cast_id: crate::frontend::ast::AstId, inner: &Ast, scope: ScopeId) {
        if !self.ctx.is_addressable(inner) && self.ctx.value_temp(inner).is_none() {
            let ty = inner.ty.unwrap_or(VOID);
            self.ctx.allocate_ast_temp_var(scope, cast_id, ty, inner.span);
        }
    }

    // ==================== Numeric Promotion ====================

    /// Operand type of a numeric binop. A literal adopts the other side's
    /// type, except that a float literal next to an integer promotes to
    /// `float`. Otherwise floats beat integers, wider beats narrower and, at
    /// equal width, signed beats unsigned.
    pub(crate) fn promote_number_type(&mut self, lhs: &Ast, rhs: &Ast) -> Result<TypeId> {
        let lt = self.resolve_ty(lhs)?;
        let rt = self.resolve_ty(rhs)?;
        let literal_side = |lit: &Ast, other: TypeId, ctx: &crate::middle::CompilationContext| {
            if matches!(lit.kind, AstKind::Literal(Literal::Float(_))) && ctx.is_integer(other) {
                F64
            } else {
                other
            }
        };
        Ok(match (is_numeric_literal(lhs), is_numeric_literal(rhs)) {
            (true, false) => literal_side(lhs, rt, self.ctx),
            (false, true) => literal_side(rhs, lt, self.ctx),
            _ => self.wider(lt, rt),
        })
    }

    fn wider(&self, a: TypeId, b: TypeId) -> TypeId {
        let ka = self.ctx.kind(a);
        let kb = self.ctx.kind(b);
        match (ka.is_float(), kb.is_float()) {
            (true, false) => return a,
            (false, true) => return b,
            _ => {}
        }
        let (sa, sb) = (ka.basic_size().unwrap_or(0), kb.basic_size().unwrap_or(0));
        if sa != sb {
            return if sa > sb { a } else { b };
        }
        if !ka.is_signed() && kb.is_signed() {
            b
        } else {
            a
        }
    }

    /// Bring a binop operand to the promoted type
    pub(crate) fn promote_operand(&mut self, expr: Ast, to: TypeId, scope: ScopeId) -> Result<Ast> {
        if is_numeric_literal(&expr) {
            return self.coerce(expr, to, scope);
        }
        let from = expr.ty.unwrap_or(VOID);
        if self.ctx.check_type(from, to) {
            Ok(expr)
        } else {
            Ok(self.implicit_cast(expr, to))
        }
    }

    // ==================== Temps ====================

    /// Whether a node's value must live in a temp slot: allocations and
    /// every dynamic value an expression creates. Memoized per node.
    pub(crate) fn needs_temp(&mut self, node: &Ast) -> bool {
        if let Some(known) = self.ctx.needs_temp_memo.get(&node.id) {
            return *known;
        }
        let ty = node.ty.unwrap_or(VOID);
        let needed = match &node.kind {
            AstKind::New { .. } => true,
            AstKind::Literal(Literal::Str(_)) => true,
            AstKind::Literal(Literal::Struct { .. }) => self.ctx.is_dynamic(ty),
            AstKind::Literal(Literal::Array { length: Some(_), .. }) => true,
            AstKind::Call(_) => {
                self.ctx.is_dynamic(ty) || matches!(self.ctx.resolved_kind(ty), TypeKind::StaticArray { .. })
            }
            AstKind::Slice { .. } => self.ctx.is_base(ty, BaseKind::String),
            AstKind::Binop { .. } => self.ctx.is_base(ty, BaseKind::String),
            _ => false,
        };
        self.ctx.needs_temp_memo.insert(node.id, needed);
        needed
    }

    pub(crate) fn allocate_temp_if_needed(&mut self, node: &Ast, scope: ScopeId) -> Result<()> {
        if !self.needs_temp(node) {
            return Ok(());
        }
        let ty = node
            .ty
            .ok_or_else(|| Error::internal("temp requested for an untyped node"))?;
        self.ctx.register_type(ty, node.span)?;
        self.ctx.allocate_ast_temp_var(scope, node.id, ty, node.span);
        Ok(())
    }
}

/// Source-like rendering of a numeric literal for diagnostics
pub(crate) fn literal_text(expr: &Ast) -> String {
    match &expr.kind {
        AstKind::Literal(Literal::Int(v)) => v.to_string(),
        AstKind::Literal(Literal::Float(x)) => x.to_string(),
        _ => "value".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::analyze;
    use super::*;
    use crate::types::{F32, S16, S32, S64, S8, U16, U32, U8};

    #[test]
    fn test_widening_table() {
        let kinds = crate::types::builtin_kinds();
        let k = |t: TypeId| &kinds[t.0];
        assert!(is_widening(k(S8), k(S32)));
        assert!(is_widening(k(U8), k(S16)));
        assert!(!is_widening(k(U32), k(S32)));
        assert!(!is_widening(k(S16), k(U32)));
        assert!(is_widening(k(S32), k(F32)));
        assert!(!is_widening(k(S64), k(F32)));
        assert!(!is_widening(k(U32), k(F32)));
        assert!(is_widening(k(U32), k(F64)));
        assert!(!is_widening(k(F64), k(F32)));
        assert!(!is_widening(k(U16), k(U8)));
    }

    #[test]
    fn test_literal_adopts_other_operand_type() {
        assert!(analyze("fn main() { a: u8 = 1; b := a + 2; c: u8 = b; }").is_ok());
        // float literal beside an integer promotes to float
        assert!(analyze("fn main() { a: int = 1; b := a * 1.5; c: float = b; }").is_ok());
        let err = analyze("fn main() { a: int = 1; b := a * 1.5; c: int = b; }").unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }), "{:?}", err);
    }

    #[test]
    fn test_mixed_width_promotion() {
        assert!(analyze("fn main() { a: s8 = 1; b: s32 = 2; c: s32 = a + b; }").is_ok());
        assert!(analyze("fn main() { a: u64 = 1; b: s64 = 2; c: s64 = a + b; }").is_ok());
        assert!(analyze("fn main() { a: f32 = 1; b: int = 2; c: f32 = a + b; }").is_ok());
    }

    #[test]
    fn test_null_coerces_to_references_only() {
        assert!(analyze("fn main() { p: &int = null; q: ptr = null; }").is_ok());
        let err = analyze("fn main() { n: int = null; }").unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }), "{:?}", err);
    }

    #[test]
    fn test_print_arguments_are_wrapped() {
        let ctx = analyze("fn main() { x := 3; println(x, 4, \"s\"); }").unwrap();
        // the literal 4 needs storage to be pointed at; `x` does not
        let any_temps = ctx.vars.iter().filter(|v| v.flags.temp && v.ty == crate::types::S64).count();
        assert_eq!(any_temps, 1);
    }
}
