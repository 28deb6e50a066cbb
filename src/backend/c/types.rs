//! C spellings of Verse types and the type declarations section

use log::debug;

use super::c_codegen::CCodeGen;
use crate::types::{BaseKind, TypeId, TypeKind, VOID};
use crate::utils::{Error, Result, Span};

#[derive(Clone, Copy, PartialEq)]
enum Mark {
    Visiting,
    Done,
}

impl<'a> CCodeGen<'a> {
    /// Canonical used-types entry; every type reaching codegen was registered
    pub(super) fn canon(&self, ty: TypeId) -> Result<usize> {
        self.ctx
            .canonical(ty)
            .map(|c| c.0)
            .ok_or_else(|| Error::internal(format!("type '{}' was never registered", self.ctx.type_name(ty))))
    }

    /// Map a Verse type to its C spelling
    pub(super) fn c_type(&self, ty: TypeId) -> Result<String> {
        let ty = self.ctx.resolve_existing(ty)?;
        let spelled = match self.ctx.kind(ty) {
            TypeKind::Basic { base, size } => basic_c_type(*base, *size).to_string(),
            TypeKind::Enum(e) => self.c_type(e.inner)?,
            TypeKind::Ref { inner, .. } => format!("{}*", self.c_type(*inner)?),
            TypeKind::Array { .. } => "_verse_array".to_string(),
            TypeKind::StaticArray { .. } => format!("struct _a{}", self.canon(ty)?),
            TypeKind::Struct(_) => format!("struct _s{}", self.canon(ty)?),
            TypeKind::Func { .. } => format!("_fn{}", self.canon(ty)?),
            _ => {
                return Err(Error::internal(format!(
                    "type '{}' has no C representation",
                    self.ctx.type_name(ty)
                )))
            }
        };
        Ok(spelled)
    }

    /// Initializer for a zeroed value of `ty`
    pub(super) fn zero_value(&self, ty: TypeId) -> Result<String> {
        let value = match self.ctx.resolved_kind(ty) {
            TypeKind::Struct(_) => format!("_init_{}()", self.canon(ty)?),
            TypeKind::Array { .. } | TypeKind::StaticArray { .. } => "{0}".to_string(),
            TypeKind::Basic { base: BaseKind::Any, .. } => "{0}".to_string(),
            _ => "0".to_string(),
        };
        Ok(value)
    }

    pub(super) fn is_void(&self, ty: TypeId) -> bool {
        self.ctx.resolve_existing(ty).map_or(false, |t| t == VOID)
    }

    // ==================== Declarations ====================

    /// Forward declarations, function pointer typedefs and the struct and
    /// static array definitions, dependencies first
    pub(super) fn generate_type_decls(&mut self) -> Result<()> {
        let used = self.ctx.used_types.clone();

        let mut forward = 0;
        for ty in &used {
            match self.ctx.kind(*ty) {
                TypeKind::Struct(_) => self.writeln(&format!("struct _s{};", ty.0)),
                TypeKind::StaticArray { .. } => self.writeln(&format!("struct _a{};", ty.0)),
                _ => continue,
            }
            forward += 1;
        }
        if forward > 0 {
            self.writeln("");
        }

        let mut marks = vec![None; self.ctx.types.len()];
        let mut typedefs = 0;
        for ty in &used {
            if matches!(self.ctx.kind(*ty), TypeKind::Func { .. }) {
                typedefs += self.emit_func_typedef(*ty, &mut marks)?;
            }
        }
        if typedefs > 0 {
            self.writeln("");
        }

        let mut marks = vec![None; self.ctx.types.len()];
        for ty in &used {
            self.emit_aggregate(*ty, &mut marks)?;
        }
        debug!("declared {} aggregate types", forward);
        Ok(())
    }

    /// `typedef R (*_fnN)(A...)`, after the typedefs of function types it
    /// mentions. Returns the number of typedefs written.
    fn emit_func_typedef(&mut self, ty: TypeId, marks: &mut [Option<Mark>]) -> Result<usize> {
        let canon = self.canon(ty)?;
        match marks[canon] {
            Some(Mark::Done) => return Ok(0),
            Some(Mark::Visiting) => return Err(self.cycle_error(ty)),
            None => {}
        }
        let TypeKind::Func { args, ret, variadic } = self.ctx.resolved_kind(ty).clone() else {
            return Ok(0);
        };
        marks[canon] = Some(Mark::Visiting);
        let mut written = 0;
        for dep in args.iter().chain(std::iter::once(&ret)) {
            if let Some(inner) = self.func_dependency(*dep) {
                written += self.emit_func_typedef(inner, marks)?;
            }
        }

        let mut params = Vec::with_capacity(args.len());
        for (i, arg) in args.iter().enumerate() {
            if variadic && i + 1 == args.len() {
                params.push("_verse_array".to_string());
            } else {
                params.push(self.c_type(*arg)?);
            }
        }
        let params = if params.is_empty() { "void".to_string() } else { params.join(", ") };
        let line = format!("typedef {} (*_fn{})({});", self.c_type(ret)?, canon, params);
        self.writeln(&line);
        marks[canon] = Some(Mark::Done);
        Ok(written + 1)
    }

    /// Function type spelled inside `ty`'s C type, through any references
    fn func_dependency(&self, ty: TypeId) -> Option<TypeId> {
        match self.ctx.resolved_kind(ty) {
            TypeKind::Func { .. } => Some(ty),
            TypeKind::Ref { inner, .. } => self.func_dependency(*inner),
            _ => None,
        }
    }

    /// Struct or static array definition, after everything it holds by value
    fn emit_aggregate(&mut self, ty: TypeId, marks: &mut [Option<Mark>]) -> Result<()> {
        let kind = self.ctx.resolved_kind(ty).clone();
        let by_value: Vec<TypeId> = match &kind {
            TypeKind::Struct(s) => s.members.iter().map(|(_, t)| *t).collect(),
            TypeKind::StaticArray { inner, .. } => vec![*inner],
            _ => return Ok(()),
        };
        let canon = self.canon(ty)?;
        match marks[canon] {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Visiting) => return Err(self.cycle_error(ty)),
            None => {}
        }
        marks[canon] = Some(Mark::Visiting);
        for dep in by_value {
            self.emit_aggregate(dep, marks)?;
        }

        match kind {
            TypeKind::Struct(s) => {
                self.writeln(&format!("struct _s{} {{", canon));
                self.indent();
                if s.members.is_empty() {
                    self.writeln("char _empty;");
                }
                for (name, member) in &s.members {
                    let line = format!("{} m_{};", self.c_type(*member)?, name);
                    self.writeln(&line);
                }
                self.dedent();
                self.writeln("};");
            }
            TypeKind::StaticArray { inner, length } => {
                let line = format!("struct _a{} {{ {} data[{}]; }};", canon, self.c_type(inner)?, length.max(1));
                self.writeln(&line);
            }
            _ => {}
        }
        self.writeln("");
        marks[canon] = Some(Mark::Done);
        Ok(())
    }

    fn cycle_error(&self, ty: TypeId) -> Error {
        Error::semantic(
            format!("type '{}' contains itself by value", self.ctx.type_name(ty)),
            Span::dummy(),
        )
    }
}

fn basic_c_type(base: BaseKind, size: u32) -> &'static str {
    match (base, size) {
        (BaseKind::Void, _) => "void",
        (BaseKind::Bool, _) => "bool",
        (BaseKind::Int, 1) => "int8_t",
        (BaseKind::Int, 2) => "int16_t",
        (BaseKind::Int, 4) => "int32_t",
        (BaseKind::Int, _) => "int64_t",
        (BaseKind::Uint, 1) => "uint8_t",
        (BaseKind::Uint, 2) => "uint16_t",
        (BaseKind::Uint, 4) => "uint32_t",
        (BaseKind::Uint, _) => "uint64_t",
        (BaseKind::Float, 4) => "float",
        (BaseKind::Float, _) => "double",
        (BaseKind::String, _) => "char*",
        (BaseKind::BasePtr, _) | (BaseKind::Null, _) => "void*",
        (BaseKind::Any, _) => "_verse_any",
        (BaseKind::TypeInfo, _) => "_verse_typeinfo*",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::c::c_codegen::tests::generate_c;
    use crate::middle::CompilationContext;
    use crate::types::{ANY, F32, S16, STRING, U8};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_basic_spellings() {
        let ctx = CompilationContext::new();
        let codegen = CCodeGen::new(&ctx);
        assert_eq!(codegen.c_type(S16).unwrap(), "int16_t");
        assert_eq!(codegen.c_type(U8).unwrap(), "uint8_t");
        assert_eq!(codegen.c_type(F32).unwrap(), "float");
        assert_eq!(codegen.c_type(STRING).unwrap(), "char*");
        assert_eq!(codegen.c_type(ANY).unwrap(), "_verse_any");
    }

    #[test]
    fn test_references_and_arrays() {
        let mut ctx = CompilationContext::new();
        let r = ctx.ref_of(S16, true);
        let rr = ctx.ref_of(r, false);
        let arr = ctx.array_of(STRING, true);
        let codegen = CCodeGen::new(&ctx);
        assert_eq!(codegen.c_type(rr).unwrap(), "int16_t**");
        assert_eq!(codegen.c_type(arr).unwrap(), "_verse_array");
    }

    #[test]
    fn test_unregistered_aggregate_is_internal_error() {
        let mut ctx = CompilationContext::new();
        let fixed = ctx.static_array_of(U8, 4);
        let codegen = CCodeGen::new(&ctx);
        assert!(matches!(codegen.c_type(fixed), Err(Error::Internal(_))));
    }

    #[test]
    fn test_members_declared_before_containers() {
        let c = generate_c(
            "type Outer struct { inner: Inner; n: int; }
             type Inner struct { x: int; }
             fn main() { o: Outer; }",
        );
        let inner = c.find("    int64_t m_x;").unwrap();
        let outer = c.find("    int64_t m_n;").unwrap();
        assert!(inner < outer);
    }

    #[test]
    fn test_static_array_wrapper() {
        let c = generate_c("fn main() { a: [3]int; e: [5]u8; }");
        assert!(c.contains(" { int64_t data[3]; };"));
        assert!(c.contains(" { uint8_t data[5]; };"));
    }

    #[test]
    fn test_function_pointer_typedefs() {
        let c = generate_c(
            "fn apply(f: fn(int) -> int, x: int) -> int { return f(x); }
             fn twice(x: int) -> int { return x * 2; }
             fn main() { n := apply(twice, 3); }",
        );
        assert!(c.lines().any(|l| l.starts_with("typedef int64_t (*_fn") && l.ends_with(")(int64_t);")));
    }

    #[test]
    fn test_empty_struct_gets_placeholder() {
        let c = generate_c("type E struct { }\nfn main() { e: E; }");
        assert!(c.contains("char _empty;"));
    }
}
