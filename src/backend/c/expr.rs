//! Expression translation
//!
//! Every expression becomes a single C expression. Nodes that own a temp
//! evaluate into it with a comma expression, releasing the previous value
//! first, so the same code is correct inside loops.

use super::c_codegen::CCodeGen;
use crate::frontend::ast::{Ast, AstKind, BinOp, Call, Literal};
use crate::middle::VarId;
use crate::types::{BaseKind, TypeId, TypeKind, ANY};
use crate::utils::{Error, Result};

/// Quoted C string literal with every byte outside printable ASCII escaped
pub(super) fn c_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for b in s.bytes() {
        match b {
            b'\\' => out.push_str("\\\\"),
            b'"' => out.push_str("\\\""),
            b'\n' => out.push_str("\\n"),
            b'\t' => out.push_str("\\t"),
            b'\r' => out.push_str("\\r"),
            // trigraphs
            b'?' => out.push_str("\\?"),
            0x20..=0x7e => out.push(b as char),
            _ => out.push_str(&format!("\\{:03o}", b)),
        }
    }
    out.push('"');
    out
}

fn int_literal(v: i128, unsigned: bool) -> String {
    if unsigned {
        format!("{}ULL", v)
    } else if v == i64::MIN as i128 {
        "(-9223372036854775807LL - 1)".to_string()
    } else if v < 0 {
        format!("({}LL)", v)
    } else {
        format!("{}LL", v)
    }
}

fn float_literal(x: f64, single: bool) -> String {
    if x.is_nan() {
        return "(0.0 / 0.0)".to_string();
    }
    if x.is_infinite() {
        return if x > 0.0 { "(1.0 / 0.0)" } else { "(-1.0 / 0.0)" }.to_string();
    }
    let text = if single { format!("{:?}f", x as f32) } else { format!("{:?}", x) };
    if x < 0.0 {
        format!("({})", text)
    } else {
        text
    }
}

impl<'a> CCodeGen<'a> {
    pub(super) fn node_type(&self, ast: &Ast) -> Result<TypeId> {
        ast.ty
            .ok_or_else(|| Error::internal(format!("node {} reached code generation untyped", ast.id.0)))
    }

    /// `ast` as a C expression, evaluated into its temp when it has one
    pub(super) fn expr(&self, ast: &Ast) -> Result<String> {
        match self.ctx.value_temp(ast) {
            Some(temp) => Ok(format!("({}, {})", self.temp_setup(ast, temp)?, self.var_name(temp))),
            None => self.raw_expr(ast),
        }
    }

    /// Comma-expression part storing the value of `ast` into `temp`
    pub(super) fn temp_setup(&self, ast: &Ast, temp: VarId) -> Result<String> {
        let name = self.var_name(temp);
        let ty = self.ctx.var(temp).ty;
        let raw = self.raw_expr(ast)?;
        if self.ctx.is_dynamic(ty) {
            Ok(format!("_free_{}(&{}), {} = {}", self.canon(ty)?, name, name, raw))
        } else {
            Ok(format!("{} = {}", name, raw))
        }
    }

    fn raw_expr(&self, ast: &Ast) -> Result<String> {
        match &ast.kind {
            AstKind::Literal(lit) => self.literal(ast, lit),
            AstKind::Ident { var: Some(var), .. } => Ok(self.var_name(*var)),
            AstKind::Ident { name, var: None } => Err(Error::internal(format!("unbound identifier '{}'", name))),
            AstKind::Dot { object, member } => self.dot(object, member),
            AstKind::Binop { op, lhs, rhs } => self.binop(*op, lhs, rhs),
            AstKind::Unop { op, operand } => Ok(format!("({}{})", op.symbol(), self.expr(operand)?)),
            AstKind::Call(call) => self.call(call),
            AstKind::Index { object, index } => self.index(object, index),
            AstKind::Slice { object, start, end } => self.slice(object, start.as_deref(), end.as_deref()),
            AstKind::Cast { expr, .. } => self.cast(ast, expr),
            AstKind::New { count, .. } => self.new_expr(ast, count.as_deref()),
            AstKind::Typeinfo { target } => {
                let ty = target
                    .ty
                    .ok_or_else(|| Error::internal("typeinfo of an unresolved type"))?;
                self.typeinfo_ref(ty)
            }
            other => Err(Error::internal(format!("not an expression: {:?}", std::mem::discriminant(other)))),
        }
    }

    // ==================== Literals ====================

    fn literal(&self, ast: &Ast, lit: &Literal) -> Result<String> {
        let ty = self.node_type(ast)?;
        match lit {
            Literal::Int(v) => Ok(int_literal(*v, self.ctx.is_base(ty, BaseKind::Uint))),
            Literal::Float(x) => {
                let single = matches!(self.ctx.resolved_kind(ty), TypeKind::Basic { base: BaseKind::Float, size: 4 });
                Ok(float_literal(*x, single))
            }
            Literal::Bool(b) => Ok(b.to_string()),
            Literal::Null => Ok("NULL".to_string()),
            Literal::Str(s) => Ok(format!("_verse_string_copy({})", c_string(s))),
            Literal::Enum { ty: enum_ty, index } => match self.ctx.resolved_kind(*enum_ty) {
                TypeKind::Enum(e) => e
                    .values
                    .get(*index)
                    .map(|v| int_literal(*v as i128, false))
                    .ok_or_else(|| Error::internal(format!("enum '{}' has no member {}", e.name, index))),
                _ => Err(Error::internal("enum literal of a non-enum type")),
            },
            Literal::Struct { members, .. } => {
                let ct = self.c_type(ty)?;
                if members.is_empty() {
                    return Ok(format!("(({}){{0}})", ct));
                }
                let mut fields = Vec::with_capacity(members.len());
                for (name, value) in members {
                    let name = name
                        .as_deref()
                        .ok_or_else(|| Error::internal("positional member survived analysis"))?;
                    let member_ty = self.node_type(value)?;
                    fields.push(format!(".m_{} = {}", name, self.copy_expr(member_ty, &self.expr(value)?)?));
                }
                Ok(format!("(({}){{ {} }})", ct, fields.join(", ")))
            }
            Literal::Array { items, .. } => {
                let ct = self.c_type(ty)?;
                if items.is_empty() {
                    return Ok(format!("(({}){{0}})", ct));
                }
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.copy_expr(self.node_type(item)?, &self.expr(item)?)?);
                }
                Ok(format!("(({}){{ {{ {} }} }})", ct, values.join(", ")))
            }
            Literal::Compound(_) => Err(Error::internal("untyped compound literal reached code generation")),
        }
    }

    // ==================== Members and Indexing ====================

    fn dot(&self, object: &Ast, member: &str) -> Result<String> {
        let object_ty = self.node_type(object)?;
        match self.ctx.resolved_kind(object_ty).clone() {
            TypeKind::Struct(_) => Ok(format!("{}.m_{}", self.expr(object)?, member)),
            TypeKind::Ref { .. } => Ok(format!("{}->m_{}", self.expr(object)?, member)),
            TypeKind::Array { inner, .. } => {
                let e = self.expr(object)?;
                if member == "length" {
                    Ok(format!("{}.length", e))
                } else {
                    Ok(format!("(({}*){}.data)", self.c_type(inner)?, e))
                }
            }
            TypeKind::StaticArray { length, .. } => {
                if member == "length" {
                    Ok(format!("((int64_t){})", length))
                } else {
                    self.static_data(object)
                }
            }
            TypeKind::Basic { base: BaseKind::String, .. } => {
                let e = self.expr(object)?;
                if member == "length" {
                    Ok(format!("_verse_strlen({})", e))
                } else {
                    Ok(format!("((void*){})", e))
                }
            }
            _ => Err(Error::internal(format!("member '{}' of a non-aggregate", member))),
        }
    }

    /// Pointer to the first element of a fixed-size array expression
    pub(super) fn static_data(&self, object: &Ast) -> Result<String> {
        match self.ctx.value_temp(object) {
            Some(temp) => Ok(format!("({}, {}.data)", self.temp_setup(object, temp)?, self.var_name(temp))),
            None => Ok(format!("{}.data", self.raw_expr(object)?)),
        }
    }

    /// `object` with one level of reference removed
    fn sequence_operand(&self, object: &Ast) -> Result<(String, TypeKind)> {
        let ty = self.node_type(object)?;
        match self.ctx.resolved_kind(ty).clone() {
            TypeKind::Ref { inner, .. } => Ok((format!("(*{})", self.expr(object)?), self.ctx.resolved_kind(inner).clone())),
            kind => Ok((String::new(), kind)),
        }
    }

    fn index(&self, object: &Ast, index: &Ast) -> Result<String> {
        let i = self.expr(index)?;
        let (deref, kind) = self.sequence_operand(object)?;
        match kind {
            TypeKind::Array { inner, .. } => {
                let et = self.c_type(inner)?;
                let a = if deref.is_empty() { self.expr(object)? } else { deref };
                Ok(format!("(*({}*)_verse_elem({}, {}, sizeof({})))", et, a, i, et))
            }
            TypeKind::StaticArray { length, .. } => {
                let data = if deref.is_empty() { self.static_data(object)? } else { format!("{}.data", deref) };
                Ok(format!("{}[_verse_bounds({}, {})]", data, i, length))
            }
            TypeKind::Basic { base: BaseKind::String, .. } => {
                Ok(format!("_verse_string_at({}, {})", self.expr(object)?, i))
            }
            _ => Err(Error::internal("index into a non-sequence")),
        }
    }

    fn slice(&self, object: &Ast, start: Option<&Ast>, end: Option<&Ast>) -> Result<String> {
        let start = match start {
            Some(s) => self.expr(s)?,
            None => "0LL".to_string(),
        };
        let end = match end {
            Some(e) => self.expr(e)?,
            None => "INT64_MAX".to_string(),
        };
        let object_ty = self.node_type(object)?;
        match self.ctx.resolved_kind(object_ty).clone() {
            TypeKind::Basic { base: BaseKind::String, .. } => {
                Ok(format!("_verse_string_slice({}, {}, {})", self.expr(object)?, start, end))
            }
            TypeKind::Array { inner, .. } => Ok(format!(
                "_verse_array_slice({}, {}, {}, sizeof({}))",
                self.expr(object)?,
                start,
                end,
                self.c_type(inner)?
            )),
            TypeKind::StaticArray { inner, length } => Ok(format!(
                "_verse_array_slice(((_verse_array){{ {}, {} }}), {}, {}, sizeof({}))",
                length,
                self.static_data(object)?,
                start,
                end,
                self.c_type(inner)?
            )),
            _ => Err(Error::internal("slice of a non-sequence")),
        }
    }

    // ==================== Operators ====================

    fn binop(&self, op: BinOp, lhs: &Ast, rhs: &Ast) -> Result<String> {
        let l = self.expr(lhs)?;
        let r = self.expr(rhs)?;
        let lt = self.node_type(lhs)?;
        if self.ctx.is_base(lt, BaseKind::String) {
            match op {
                BinOp::Add => return Ok(format!("_verse_string_concat({}, {})", l, r)),
                BinOp::Eq => return Ok(format!("_verse_string_eq({}, {})", l, r)),
                BinOp::Ne => return Ok(format!("(!_verse_string_eq({}, {}))", l, r)),
                _ => {}
            }
        }
        Ok(format!("({} {} {})", l, op.symbol(), r))
    }

    fn cast(&self, ast: &Ast, inner: &Ast) -> Result<String> {
        let to = self.node_type(ast)?;
        if to == ANY {
            return self.any_wrap(ast, inner);
        }
        let from = self.node_type(inner)?;
        match (self.ctx.resolved_kind(from), self.ctx.resolved_kind(to)) {
            (TypeKind::StaticArray { length, .. }, TypeKind::Array { .. }) => {
                return Ok(format!("((_verse_array){{ {}, {} }})", length, self.static_data(inner)?));
            }
            (TypeKind::Array { .. }, TypeKind::Array { .. }) => return self.expr(inner),
            _ => {}
        }
        let ct = self.c_type(to)?;
        let e = self.expr(inner)?;
        if self.c_type(from)? == ct {
            Ok(e)
        } else {
            Ok(format!("(({})({}))", ct, e))
        }
    }

    /// `any` pairs a pointer to the value with its descriptor; values with
    /// no address of their own are stored in a temp first
    fn any_wrap(&self, cast: &Ast, inner: &Ast) -> Result<String> {
        let ty = self.node_type(inner)?;
        let ti = self.typeinfo_ref(ty)?;
        if self.ctx.is_addressable(inner) {
            return Ok(format!("((_verse_any){{ (void*)&({}), {} }})", self.raw_expr(inner)?, ti));
        }
        if let Some(temp) = self.ctx.value_temp(inner) {
            let name = self.var_name(temp);
            return Ok(format!(
                "({}, ((_verse_any){{ (void*)&{}, {} }}))",
                self.temp_setup(inner, temp)?,
                name,
                ti
            ));
        }
        let temp = self
            .ctx
            .find_temp_var(cast.id)
            .ok_or_else(|| Error::internal("value wrapped in any has no storage"))?;
        let name = self.var_name(temp);
        let mut parts = Vec::new();
        if self.ctx.is_dynamic(ty) {
            parts.push(format!("_free_{}(&{})", self.canon(ty)?, name));
        }
        parts.push(format!("{} = {}", name, self.copy_expr(ty, &self.expr(inner)?)?));
        parts.push(format!("((_verse_any){{ (void*)&{}, {} }})", name, ti));
        Ok(format!("({})", parts.join(", ")))
    }

    fn new_expr(&self, ast: &Ast, count: Option<&Ast>) -> Result<String> {
        let ty = self.node_type(ast)?;
        let elem = match self.ctx.resolved_kind(ty) {
            TypeKind::Ref { inner, .. } | TypeKind::Array { inner, .. } => *inner,
            _ => return Err(Error::internal("allocation of a non-reference type")),
        };
        let ct = self.c_type(elem)?;
        match count {
            Some(n) => Ok(format!("_verse_array_alloc({}, sizeof({}))", self.expr(n)?, ct)),
            None => Ok(format!("(({}*)_verse_alloc(sizeof({})))", ct, ct)),
        }
    }

    // ==================== Calls ====================

    fn call(&self, call: &Call) -> Result<String> {
        let callee = match (&call.callee.kind, call.poly) {
            (AstKind::Ident { var: Some(var), .. }, Some(pid)) => self.polymorph_name(*var, pid),
            (AstKind::Ident { var: Some(var), .. }, None) if self.ctx.var(*var).flags.function => self.var_name(*var),
            _ => format!("({})", self.expr(&call.callee)?),
        };

        if !call.variadic {
            let mut args = Vec::with_capacity(call.args.len());
            for arg in &call.args {
                args.push(self.expr(arg)?);
            }
            return Ok(format!("{}({})", callee, args.join(", ")));
        }

        let fixed = self.fixed_arity(call)?;
        let mut args = Vec::with_capacity(fixed + 1);
        for arg in call.args.iter().take(fixed) {
            args.push(self.expr(arg)?);
        }
        if let Some(spread) = &call.spread {
            args.push(self.expr(spread)?);
            return Ok(format!("{}({})", callee, args.join(", ")));
        }

        let trailing = &call.args[fixed.min(call.args.len())..];
        let Some(varargs) = call.varargs else {
            args.push("((_verse_array){ 0, NULL })".to_string());
            return Ok(format!("{}({})", callee, args.join(", ")));
        };
        let name = self.var_name(varargs);
        let varargs_ty = self.ctx.var(varargs).ty;
        let mut setup = Vec::with_capacity(trailing.len() + 2);
        if self.ctx.is_dynamic(varargs_ty) {
            setup.push(format!("_free_{}(&{})", self.canon(varargs_ty)?, name));
        }
        for (i, arg) in trailing.iter().enumerate() {
            let ty = self.node_type(arg)?;
            setup.push(format!("{}.data[{}] = {}", name, i, self.copy_expr(ty, &self.expr(arg)?)?));
        }
        args.push(format!("((_verse_array){{ {}, {}.data }})", trailing.len(), name));
        setup.push(format!("{}({})", callee, args.join(", ")));
        Ok(format!("({})", setup.join(", ")))
    }

    /// Number of parameters before the variadic one
    fn fixed_arity(&self, call: &Call) -> Result<usize> {
        let ty = self.node_type(&call.callee)?;
        match self.ctx.resolved_kind(ty) {
            TypeKind::Func { args, .. } => Ok(args.len().saturating_sub(1)),
            _ => Err(Error::internal("call through a non-function value")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::c::c_codegen::tests::generate_c;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_c_string_escapes() {
        assert_eq!(c_string("a\"b\\c\n"), "\"a\\\"b\\\\c\\n\"");
        assert_eq!(c_string("??="), "\"\\?\\?=\"");
        assert_eq!(c_string("\u{1}é"), "\"\\001\\303\\251\"");
    }

    #[test]
    fn test_numeric_literals() {
        assert_eq!(int_literal(3, false), "3LL");
        assert_eq!(int_literal(-3, false), "(-3LL)");
        assert_eq!(int_literal(i64::MIN as i128, false), "(-9223372036854775807LL - 1)");
        assert_eq!(int_literal(18446744073709551615, true), "18446744073709551615ULL");
        assert_eq!(float_literal(1.5, false), "1.5");
        assert_eq!(float_literal(2.0, true), "2.0f");
        assert_eq!(float_literal(-0.25, false), "(-0.25)");
        assert_eq!(float_literal(f64::INFINITY, false), "(1.0 / 0.0)");
    }

    #[test]
    fn test_constant_folding_reaches_output() {
        let c = generate_c("fn main() { x := 1 + 2; }");
        assert!(c.contains(" = 3LL;"));
        assert!(!c.contains("(1LL + 2LL)"));
    }

    #[test]
    fn test_string_concat_swaps_into_place() {
        let c = generate_c("fn main() { a := \"x\"; b := a + \"y\"; }");
        assert!(c.contains("_verse_string_concat("));
        assert!(c.contains("SWAP(char*, "));
    }

    #[test]
    fn test_string_comparison_uses_runtime() {
        let c = generate_c("fn main() { a := \"x\"; same := a == \"x\"; other := a != \"y\"; }");
        assert!(c.contains("_verse_string_eq("));
        assert!(c.contains("(!_verse_string_eq("));
    }

    #[test]
    fn test_print_packs_any_arguments() {
        let c = generate_c("fn main() { n := 5; println(\"n = \", n); }");
        assert!(c.contains("_verse_println(((_verse_array){ 2, "));
        assert!(c.contains("((_verse_any){ (void*)&("));
    }

    #[test]
    fn test_variadic_call_without_trailing_arguments() {
        let c = generate_c("fn main() { println(); }");
        assert!(c.contains("_verse_println(((_verse_array){ 0, NULL }));"));
    }

    #[test]
    fn test_array_indexing_is_bounds_checked() {
        let c = generate_c(
            "fn main() { fixed: [4]int; i := 2; a := fixed[i]; xs := new [3]int; b := xs[i]; s := \"abc\"; ch := s[i]; }",
        );
        assert!(c.contains("[_verse_bounds("));
        assert!(c.contains("_verse_elem("));
        assert!(c.contains("_verse_string_at("));
    }

    #[test]
    fn test_member_access_through_reference() {
        let c = generate_c("type P struct { x: int; }\nfn get(p: &P) -> int { return p.x; }\nfn main() { }");
        assert!(c.contains("->m_x"));
    }

    #[test]
    fn test_sequence_lengths() {
        let c = generate_c("fn main() { s := \"abc\"; n := s.length; a: [7]u8; m := a.length; }");
        assert!(c.contains("_verse_strlen("));
        assert!(c.contains("((int64_t)7)"));
    }

    #[test]
    fn test_explicit_numeric_cast() {
        let c = generate_c("fn main() { x: u16 = 7; n := x as int; }");
        assert!(c.contains("((int64_t)("));
    }

    #[test]
    fn test_allocation() {
        let c = generate_c("fn main() { p := new int; xs := new [4]u16; }");
        assert!(c.contains("((int64_t*)_verse_alloc(sizeof(int64_t)))"));
        assert!(c.contains("_verse_array_alloc(4LL, sizeof(uint16_t))"));
    }

    #[test]
    fn test_typeinfo_expression() {
        let c = generate_c("fn main() { t := typeinfo(int); }");
        assert!(c.contains(" = (&_ti_5);"));
    }
}
