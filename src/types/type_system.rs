//! Type System for Verse
//!
//! Types live in an arena owned by the compilation context and are referred to
//! by [`TypeId`]. The first ids are the builtin basic types.

use crate::middle::ScopeId;

/// Index of a type in the context's type arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(pub usize);

/// Basic (primitive) type kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BaseKind {
    Void,
    Bool,
    /// Signed integer
    Int,
    /// Unsigned integer
    Uint,
    Float,
    String,
    /// Untyped pointer (`ptr`)
    BasePtr,
    /// Type-erased value with its typeinfo (`any`)
    Any,
    /// Handle to a typeinfo table entry (`Type`)
    TypeInfo,
    /// Type of the `null` literal
    Null,
}

/// A struct type, possibly a generic template or a reified instance of one
#[derive(Debug, Clone, PartialEq)]
pub struct StructType {
    /// Declared name, `None` for anonymous `struct { ... }` types
    pub name: Option<String>,
    pub members: Vec<(String, TypeId)>,
    /// Template with unbound parameters
    pub generic: bool,
    /// Parameter names of a template
    pub params: Vec<String>,
    /// Template and arguments this struct was reified from
    pub generic_base: Option<(TypeId, Vec<TypeId>)>,
}

impl StructType {
    pub fn member(&self, name: &str) -> Option<(usize, TypeId)> {
        self.members
            .iter()
            .position(|(n, _)| n == name)
            .map(|i| (i, self.members[i].1))
    }
}

/// Named integer constants over a backing numeric type
#[derive(Debug, Clone, PartialEq)]
pub struct EnumType {
    pub name: String,
    pub inner: TypeId,
    pub names: Vec<String>,
    pub values: Vec<i64>,
}

/// Type shapes
#[derive(Debug, Clone, PartialEq)]
pub enum TypeKind {
    /// Primitive with its size in bytes
    Basic { base: BaseKind, size: u32 },
    /// Named reference, looked up in `scope`
    Alias { name: String, scope: ScopeId },
    /// Unbound `$T` declared in a function signature
    Polydef { name: String, scope: ScopeId },
    /// Generic struct applied to arguments
    Params { base: TypeId, args: Vec<TypeId> },
    StaticArray { inner: TypeId, length: u64 },
    Array { inner: TypeId, owned: bool },
    Ref { inner: TypeId, owned: bool },
    /// For variadic functions the last argument is the element type
    Func { args: Vec<TypeId>, ret: TypeId, variadic: bool },
    Struct(StructType),
    Enum(EnumType),
    /// `pkg.Name`, looked up through the package binding visible from `scope`
    External { package: String, name: String, scope: ScopeId },
}

// ==================== Builtin Types ====================

pub const VOID: TypeId = TypeId(0);
pub const BOOL: TypeId = TypeId(1);
pub const S8: TypeId = TypeId(2);
pub const S16: TypeId = TypeId(3);
pub const S32: TypeId = TypeId(4);
pub const S64: TypeId = TypeId(5);
pub const U8: TypeId = TypeId(6);
pub const U16: TypeId = TypeId(7);
pub const U32: TypeId = TypeId(8);
pub const U64: TypeId = TypeId(9);
pub const F32: TypeId = TypeId(10);
pub const F64: TypeId = TypeId(11);
pub const STRING: TypeId = TypeId(12);
pub const BASEPTR: TypeId = TypeId(13);
pub const ANY: TypeId = TypeId(14);
pub const TYPE: TypeId = TypeId(15);
pub const NULL: TypeId = TypeId(16);

/// Number of builtin types at the start of the arena
pub const BUILTIN_COUNT: usize = 17;

/// Builtin type shapes in id order
pub fn builtin_kinds() -> Vec<TypeKind> {
    use BaseKind::*;
    let basic = |base, size| TypeKind::Basic { base, size };
    vec![
        basic(Void, 0),
        basic(Bool, 1),
        basic(Int, 1),
        basic(Int, 2),
        basic(Int, 4),
        basic(Int, 8),
        basic(Uint, 1),
        basic(Uint, 2),
        basic(Uint, 4),
        basic(Uint, 8),
        basic(Float, 4),
        basic(Float, 8),
        basic(String, 8),
        basic(BasePtr, 8),
        basic(Any, 16),
        basic(TypeInfo, 8),
        basic(Null, 8),
    ]
}

/// Names bound in the builtin scope
pub fn builtin_names() -> &'static [(&'static str, TypeId)] {
    &[
        ("void", VOID),
        ("bool", BOOL),
        ("s8", S8),
        ("s16", S16),
        ("s32", S32),
        ("s64", S64),
        ("int", S64),
        ("u8", U8),
        ("u16", U16),
        ("u32", U32),
        ("u64", U64),
        ("uint", U64),
        ("f32", F32),
        ("f64", F64),
        ("float", F64),
        ("string", STRING),
        ("ptr", BASEPTR),
        ("any", ANY),
        ("Type", TYPE),
    ]
}

/// Display name of a builtin id
pub fn builtin_display(id: TypeId) -> &'static str {
    match id.0 {
        0 => "void",
        1 => "bool",
        2 => "s8",
        3 => "s16",
        4 => "s32",
        5 => "int",
        6 => "u8",
        7 => "u16",
        8 => "u32",
        9 => "uint",
        10 => "f32",
        11 => "float",
        12 => "string",
        13 => "ptr",
        14 => "any",
        15 => "Type",
        16 => "null",
        _ => "?",
    }
}

/// Integer basic type for a signedness and byte size
pub fn int_type(signed: bool, size: u32) -> TypeId {
    match (signed, size) {
        (true, 1) => S8,
        (true, 2) => S16,
        (true, 4) => S32,
        (true, _) => S64,
        (false, 1) => U8,
        (false, 2) => U16,
        (false, 4) => U32,
        (false, _) => U64,
    }
}

impl TypeKind {
    pub fn is_basic(&self, wanted: BaseKind) -> bool {
        matches!(self, TypeKind::Basic { base, .. } if *base == wanted)
    }

    /// Numeric basic types (integers and floats)
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            TypeKind::Basic { base: BaseKind::Int | BaseKind::Uint | BaseKind::Float, .. }
        )
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, TypeKind::Basic { base: BaseKind::Int | BaseKind::Uint, .. })
    }

    pub fn is_float(&self) -> bool {
        self.is_basic(BaseKind::Float)
    }

    pub fn is_signed(&self) -> bool {
        matches!(self, TypeKind::Basic { base: BaseKind::Int | BaseKind::Float, .. })
    }

    /// Size of a basic type
    pub fn basic_size(&self) -> Option<u32> {
        match self {
            TypeKind::Basic { size, .. } => Some(*size),
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<&StructType> {
        match self {
            TypeKind::Struct(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_enum(&self) -> Option<&EnumType> {
        match self {
            TypeKind::Enum(e) => Some(e),
            _ => None,
        }
    }

    /// Element type of arrays, static arrays and refs
    pub fn inner(&self) -> Option<TypeId> {
        match self {
            TypeKind::StaticArray { inner, .. }
            | TypeKind::Array { inner, .. }
            | TypeKind::Ref { inner, .. } => Some(*inner),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_table_matches_ids() {
        let kinds = builtin_kinds();
        assert_eq!(kinds.len(), BUILTIN_COUNT);
        assert!(kinds[S64.0].is_integer() && kinds[S64.0].is_signed());
        assert!(kinds[U8.0].is_integer() && !kinds[U8.0].is_signed());
        assert!(kinds[F32.0].is_float());
        assert_eq!(kinds[ANY.0].basic_size(), Some(16));
        assert!(kinds[STRING.0].is_basic(BaseKind::String));
    }

    #[test]
    fn test_builtin_aliases() {
        let names = builtin_names();
        let find = |n: &str| names.iter().find(|(name, _)| *name == n).map(|(_, id)| *id);
        assert_eq!(find("int"), Some(S64));
        assert_eq!(find("uint"), Some(U64));
        assert_eq!(find("float"), Some(F64));
        assert_eq!(find("ptr"), Some(BASEPTR));
        assert_eq!(builtin_display(S64), "int");
    }

    #[test]
    fn test_int_type_lookup() {
        assert_eq!(int_type(true, 4), S32);
        assert_eq!(int_type(false, 2), U16);
        assert_eq!(int_type(false, 8), U64);
    }
}
