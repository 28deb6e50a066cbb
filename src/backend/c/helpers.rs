//! Per-type value helpers: zero initializers for structs, deep copy and
//! release for every type that owns heap memory

use super::c_codegen::CCodeGen;
use crate::types::{TypeId, TypeKind};
use crate::utils::Result;

impl<'a> CCodeGen<'a> {
    /// `e` as an independently owned value
    pub(super) fn copy_expr(&self, ty: TypeId, e: &str) -> Result<String> {
        if self.ctx.is_dynamic(ty) {
            Ok(format!("_copy_{}({})", self.canon(ty)?, e))
        } else {
            Ok(e.to_string())
        }
    }

    /// Statement releasing the value stored at `place`, leaving it zeroed
    pub(super) fn free_stmt(&self, ty: TypeId, place: &str) -> Result<String> {
        Ok(format!("_free_{}(&{});", self.canon(ty)?, place))
    }

    pub(super) fn generate_helpers(&mut self) -> Result<()> {
        let used = self.ctx.used_types.clone();
        let structs: Vec<TypeId> = used
            .iter()
            .copied()
            .filter(|t| matches!(self.ctx.kind(*t), TypeKind::Struct(_)))
            .collect();
        let dynamic: Vec<TypeId> = used.iter().copied().filter(|t| self.ctx.is_dynamic(*t)).collect();
        if structs.is_empty() && dynamic.is_empty() {
            return Ok(());
        }

        for ty in &structs {
            let line = format!("static {0} _init_{1}(void);", self.c_type(*ty)?, ty.0);
            self.writeln(&line);
        }
        for ty in &dynamic {
            let ct = self.c_type(*ty)?;
            self.writeln(&format!("static {0} _copy_{1}({0} v);", ct, ty.0));
            self.writeln(&format!("static void _free_{1}({0}* v);", ct, ty.0));
        }
        self.writeln("");

        for ty in &structs {
            let ct = self.c_type(*ty)?;
            self.writeln(&format!("static {} _init_{}(void) {{", ct, ty.0));
            self.indent();
            self.writeln(&format!("{} v;", ct));
            self.writeln("memset(&v, 0, sizeof(v));");
            self.writeln("return v;");
            self.dedent();
            self.writeln("}");
            self.writeln("");
        }
        for ty in &dynamic {
            self.emit_copy(*ty)?;
            self.emit_free(*ty)?;
        }
        Ok(())
    }

    fn emit_copy(&mut self, ty: TypeId) -> Result<()> {
        let ct = self.c_type(ty)?;
        let mut body = Vec::new();
        match self.ctx.resolved_kind(ty).clone() {
            TypeKind::Ref { inner, .. } => {
                let it = self.c_type(inner)?;
                body.push("if (!v) return NULL;".to_string());
                body.push(format!("{0}* r = ({0}*)_verse_alloc(sizeof({0}));", it));
                body.push(format!("*r = {};", self.copy_expr(inner, "*v")?));
                body.push("return r;".to_string());
            }
            TypeKind::Array { inner, .. } => {
                let it = self.c_type(inner)?;
                body.push(format!("_verse_array r = _verse_array_alloc(v.length, sizeof({}));", it));
                body.push(format!("{0}* src = ({0}*)v.data;", it));
                body.push(format!("{0}* dst = ({0}*)r.data;", it));
                body.push(format!(
                    "for (int64_t i = 0; i < v.length; i++) dst[i] = {};",
                    self.copy_expr(inner, "src[i]")?
                ));
                body.push("return r;".to_string());
            }
            TypeKind::StaticArray { inner, length } => {
                body.push(format!("{} r = v;", ct));
                body.push(format!(
                    "for (int64_t i = 0; i < {}; i++) r.data[i] = {};",
                    length,
                    self.copy_expr(inner, "v.data[i]")?
                ));
                body.push("return r;".to_string());
            }
            TypeKind::Struct(s) => {
                body.push(format!("{} r = v;", ct));
                for (name, member) in &s.members {
                    if self.ctx.is_dynamic(*member) {
                        body.push(format!("r.m_{0} = {1};", name, self.copy_expr(*member, &format!("v.m_{}", name))?));
                    }
                }
                body.push("return r;".to_string());
            }
            // strings
            _ => body.push("return _verse_string_copy(v);".to_string()),
        }
        self.emit_helper(&format!("static {0} _copy_{1}({0} v) {{", ct, ty.0), &body);
        Ok(())
    }

    fn emit_free(&mut self, ty: TypeId) -> Result<()> {
        let ct = self.c_type(ty)?;
        let mut body = Vec::new();
        match self.ctx.resolved_kind(ty).clone() {
            TypeKind::Ref { inner, .. } => {
                body.push("if (!*v) return;".to_string());
                if self.ctx.is_dynamic(inner) {
                    body.push(self.free_stmt(inner, "**v")?);
                }
                body.push("free(*v);".to_string());
                body.push("*v = NULL;".to_string());
            }
            TypeKind::Array { inner, .. } => {
                if self.ctx.is_dynamic(inner) {
                    let it = self.c_type(inner)?;
                    body.push(format!("{0}* d = ({0}*)v->data;", it));
                    body.push(format!(
                        "for (int64_t i = 0; i < v->length; i++) {}",
                        self.free_stmt(inner, "d[i]")?
                    ));
                }
                body.push("free(v->data);".to_string());
                body.push("v->data = NULL;".to_string());
                body.push("v->length = 0;".to_string());
            }
            TypeKind::StaticArray { inner, length } => {
                body.push(format!(
                    "for (int64_t i = 0; i < {}; i++) {}",
                    length,
                    self.free_stmt(inner, "v->data[i]")?
                ));
            }
            TypeKind::Struct(s) => {
                for (name, member) in &s.members {
                    if self.ctx.is_dynamic(*member) {
                        body.push(self.free_stmt(*member, &format!("v->m_{}", name))?);
                    }
                }
            }
            _ => {
                body.push("free(*v);".to_string());
                body.push("*v = NULL;".to_string());
            }
        }
        self.emit_helper(&format!("static void _free_{1}({0}* v) {{", ct, ty.0), &body);
        Ok(())
    }

    fn emit_helper(&mut self, header: &str, body: &[String]) {
        self.writeln(header);
        self.indent();
        for line in body {
            self.writeln(line);
        }
        self.dedent();
        self.writeln("}");
        self.writeln("");
    }
}

#[cfg(test)]
mod tests {
    use crate::backend::c::c_codegen::tests::generate_c;

    #[test]
    fn test_generic_instances_get_their_own_helpers() {
        let c = generate_c(
            "type Box(T) struct { value: T; }
             fn main() { a := Box(int){value = 1}; b := Box(string){value = \"x\"}; }",
        );
        let structs = c.lines().filter(|l| l.starts_with("struct _s") && l.ends_with(" {")).count();
        assert_eq!(structs, 2);
        let inits = c.lines().filter(|l| l.starts_with("static struct _s") && l.contains(" _init_") && l.ends_with(" {")).count();
        assert_eq!(inits, 2);
        // only the string instance owns memory
        let copies = c.lines().filter(|l| l.starts_with("static struct _s") && l.contains(" _copy_") && l.ends_with(" {")).count();
        assert_eq!(copies, 1);
    }

    #[test]
    fn test_string_helpers() {
        let c = generate_c("fn main() { s := \"hi\"; }");
        assert!(c.contains("return _verse_string_copy(v);"));
        assert!(c.lines().any(|l| l.starts_with("static void _free_") && l.contains("(char** v)")));
    }

    #[test]
    fn test_owned_array_frees_elements() {
        let c = generate_c("fn main() { names := new [4]string; }");
        assert!(c.contains("free(v->data);"));
        assert!(c.lines().any(|l| l.contains("for (int64_t i = 0; i < v->length; i++) _free_")));
    }

    #[test]
    fn test_owned_reference_copies_deeply() {
        let c = generate_c("type N struct { label: string; }\nfn main() { n := new N; }");
        assert!(c.contains("if (!v) return NULL;"));
        assert!(c.contains("_verse_alloc(sizeof(struct _s"));
    }
}
