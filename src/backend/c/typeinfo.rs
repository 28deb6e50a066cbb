//! Runtime type descriptors: one `_verse_typeinfo` per used type, filled in
//! by `_verse_init_typeinfo` before any user code runs

use log::debug;

use super::c_codegen::CCodeGen;
use super::expr::c_string;
use crate::types::{BaseKind, TypeId, TypeKind};
use crate::utils::Result;

fn kind_tag(kind: &TypeKind) -> &'static str {
    match kind {
        TypeKind::Basic { base, .. } => match base {
            BaseKind::Void => "_VERSE_VOID",
            BaseKind::Bool => "_VERSE_BOOL",
            BaseKind::Int | BaseKind::Uint => "_VERSE_INT",
            BaseKind::Float => "_VERSE_FLOAT",
            BaseKind::String => "_VERSE_STRING",
            BaseKind::BasePtr => "_VERSE_PTR",
            BaseKind::Any => "_VERSE_ANY",
            BaseKind::TypeInfo => "_VERSE_TYPE",
            BaseKind::Null => "_VERSE_NULL",
        },
        TypeKind::Ref { .. } => "_VERSE_REF",
        TypeKind::Array { .. } => "_VERSE_ARRAY",
        TypeKind::StaticArray { .. } => "_VERSE_STATIC_ARRAY",
        TypeKind::Struct(_) => "_VERSE_STRUCT",
        TypeKind::Enum(_) => "_VERSE_ENUM",
        TypeKind::Func { .. } => "_VERSE_FUNC",
        _ => "_VERSE_VOID",
    }
}

impl<'a> CCodeGen<'a> {
    /// Address of the descriptor for `ty`
    pub(super) fn typeinfo_ref(&self, ty: TypeId) -> Result<String> {
        Ok(format!("(&_ti_{})", self.canon(ty)?))
    }

    pub(super) fn generate_typeinfo_decls(&mut self) -> Result<()> {
        let used = self.ctx.used_types.clone();
        for ty in &used {
            self.writeln(&format!("static _verse_typeinfo _ti_{};", ty.0));
            match self.ctx.kind(*ty).clone() {
                TypeKind::Struct(s) if !s.members.is_empty() => {
                    self.writeln(&format!("static _verse_member _tim_{}[{}];", ty.0, s.members.len()));
                }
                TypeKind::Enum(e) if !e.names.is_empty() => {
                    let names: Vec<String> = e.names.iter().map(|n| c_string(n)).collect();
                    let values: Vec<String> = e.values.iter().map(|v| format!("{}LL", v)).collect();
                    self.writeln(&format!("static const char* _tien_{}[] = {{ {} }};", ty.0, names.join(", ")));
                    self.writeln(&format!("static int64_t _tiev_{}[] = {{ {} }};", ty.0, values.join(", ")));
                }
                _ => {}
            }
        }
        if !used.is_empty() {
            self.writeln("");
        }
        Ok(())
    }

    pub(super) fn generate_typeinfo_init(&mut self) -> Result<()> {
        let used = self.ctx.used_types.clone();
        debug!("emitting {} type descriptors", used.len());
        self.writeln("static void _verse_init_typeinfo(void) {");
        self.indent();
        for ty in used {
            let lines = self.typeinfo_lines(ty)?;
            for line in lines {
                self.writeln(&line);
            }
        }
        self.dedent();
        self.writeln("}");
        self.writeln("");
        Ok(())
    }

    fn typeinfo_lines(&self, ty: TypeId) -> Result<Vec<String>> {
        let n = ty.0;
        let kind = self.ctx.kind(ty);
        let size = match kind {
            TypeKind::Basic { base: BaseKind::Void, .. } => "0".to_string(),
            _ => format!("sizeof({})", self.c_type(ty)?),
        };
        let signed = match kind {
            TypeKind::Basic { base: BaseKind::Int, .. } => true,
            TypeKind::Enum(e) => matches!(self.ctx.resolved_kind(e.inner), TypeKind::Basic { base: BaseKind::Int, .. }),
            _ => false,
        };

        let mut fields = vec![
            format!(".kind = {}", kind_tag(kind)),
            format!(".name = {}", c_string(&self.ctx.type_name(ty))),
            format!(".size = {}", size),
            format!(".is_signed = {}", signed),
        ];
        let mut lines = Vec::new();
        match kind {
            TypeKind::Ref { inner, .. } | TypeKind::Array { inner, .. } => {
                fields.push(format!(".inner = {}", self.typeinfo_ref(*inner)?));
            }
            TypeKind::StaticArray { inner, length } => {
                fields.push(format!(".inner = {}", self.typeinfo_ref(*inner)?));
                fields.push(format!(".length = {}", length));
            }
            TypeKind::Enum(e) => {
                fields.push(format!(".inner = {}", self.typeinfo_ref(e.inner)?));
                if !e.names.is_empty() {
                    fields.push(format!(".enum_names = _tien_{}", n));
                    fields.push(format!(".enum_values = _tiev_{}", n));
                    fields.push(format!(".enum_count = {}", e.names.len()));
                }
            }
            TypeKind::Struct(s) if !s.members.is_empty() => {
                for (i, (name, member)) in s.members.iter().enumerate() {
                    lines.push(format!(
                        "_tim_{}[{}] = (_verse_member){{ {}, {}, offsetof(struct _s{}, m_{}) }};",
                        n,
                        i,
                        c_string(name),
                        self.typeinfo_ref(*member)?,
                        n,
                        name
                    ));
                }
                fields.push(format!(".members = _tim_{}", n));
                fields.push(format!(".member_count = {}", s.members.len()));
            }
            _ => {}
        }
        lines.push(format!("_ti_{} = (_verse_typeinfo){{ {} }};", n, fields.join(", ")));
        Ok(lines)
    }
}

#[cfg(test)]
mod tests {
    use crate::backend::c::c_codegen::tests::generate_c;

    #[test]
    fn test_struct_members_use_c_offsets() {
        let c = generate_c("type P struct { flag: bool; n: int; }\nfn main() { p := P{flag = true, n = 2}; println(p); }");
        assert!(c.contains("\"flag\", (&_ti_1), offsetof(struct _s"));
        assert!(c.contains(", m_n) };"));
        assert!(c.contains(".member_count = 2"));
    }

    #[test]
    fn test_enum_tables() {
        let c = generate_c("enum Color { Red, Green = 5 }\nfn main() { c := Color.Green; println(c); }");
        assert!(c.contains("[] = { \"Red\", \"Green\" };"));
        assert!(c.contains("[] = { 0LL, 5LL };"));
        assert!(c.contains(".enum_count = 2"));
    }

    #[test]
    fn test_descriptor_names_and_kinds() {
        let c = generate_c("fn main() { xs: [3]u8; println(xs); }");
        assert!(c.contains(".kind = _VERSE_STATIC_ARRAY, .name = \"[3]u8\""));
        assert!(c.contains(".length = 3"));
        assert!(c.contains(".kind = _VERSE_INT, .name = \"u8\", .size = sizeof(uint8_t), .is_signed = false"));
    }
}
