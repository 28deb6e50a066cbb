//! Built-in Functions Registry
//!
//! Defines the functions every Verse program can call without importing
//! anything, and the C runtime they are implemented in.

use crate::types::{ANY, BOOL, S64, STRING, TYPE, VOID};
use crate::types::TypeId;

/// Built-in function signature
#[derive(Debug, Clone)]
pub struct BuiltinFunc {
    pub name: String,
    pub params: Vec<(String, TypeId)>,
    pub ret_type: TypeId,
    /// C function name to generate
    pub c_name: String,
    /// Last parameter collects any number of trailing arguments
    pub variadic: bool,
}

/// Registry of all built-in functions, in registration order
#[derive(Debug)]
pub struct BuiltinRegistry {
    functions: Vec<BuiltinFunc>,
}

impl BuiltinRegistry {
    pub fn new() -> Self {
        let mut registry = Self { functions: Vec::new() };
        registry.register_all();
        registry
    }

    fn register_all(&mut self) {
        // I/O Functions
        self.register("print", &[("args", ANY)], VOID, "_verse_print", true);
        self.register("println", &[("args", ANY)], VOID, "_verse_println", true);

        // Strings
        self.register("itoa", &[("n", S64)], STRING, "_verse_itoa", false);

        // Reflection
        self.register("type_of", &[("value", ANY)], TYPE, "_verse_type_of", false);
        self.register("type_name", &[("t", TYPE)], STRING, "_verse_type_name", false);

        // Process control
        self.register("assert", &[("cond", BOOL)], VOID, "_verse_assert", false);
        self.register("exit", &[("code", S64)], VOID, "_verse_exit", false);
    }

    fn register(&mut self, name: &str, params: &[(&str, TypeId)], ret_type: TypeId, c_name: &str, variadic: bool) {
        self.functions.push(BuiltinFunc {
            name: name.to_string(),
            params: params.iter().map(|(n, t)| (n.to_string(), *t)).collect(),
            ret_type,
            c_name: c_name.to_string(),
            variadic,
        });
    }

    /// Check if a function is a built-in
    pub fn is_builtin(&self, name: &str) -> bool {
        self.functions.iter().any(|f| f.name == name)
    }

    /// Get a built-in function by name
    pub fn get(&self, name: &str) -> Option<&BuiltinFunc> {
        self.functions.iter().find(|f| f.name == name)
    }

    /// Get all built-in functions
    pub fn all(&self) -> impl Iterator<Item = &BuiltinFunc> {
        self.functions.iter()
    }
}

impl Default for BuiltinRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Generate C runtime support code.
///
/// Emitted first in every output file. Typeinfo kind codes used by
/// `_verse_print_value` must agree with the code generator's table.
pub fn generate_c_runtime() -> String {
    r#"/* Verse Runtime Support */
#include <stddef.h>
#include <stdint.h>
#include <stdbool.h>
#include <stdio.h>
#include <stdlib.h>
#include <string.h>

#define SWAP(T, a, b) do { T _swap_tmp = (a); (a) = (b); (b) = _swap_tmp; } while (0)

typedef struct _verse_array {
    int64_t length;
    void* data;
} _verse_array;

struct _verse_typeinfo;

typedef struct _verse_member {
    const char* name;
    struct _verse_typeinfo* type;
    int64_t offset;
} _verse_member;

typedef struct _verse_typeinfo {
    int64_t kind;
    const char* name;
    int64_t size;
    bool is_signed;
    struct _verse_typeinfo* inner;
    int64_t length;
    _verse_member* members;
    int64_t member_count;
    const char** enum_names;
    int64_t* enum_values;
    int64_t enum_count;
} _verse_typeinfo;

typedef struct _verse_any {
    void* value;
    _verse_typeinfo* type;
} _verse_any;

enum {
    _VERSE_VOID, _VERSE_BOOL, _VERSE_INT, _VERSE_FLOAT, _VERSE_STRING, _VERSE_PTR,
    _VERSE_ANY, _VERSE_TYPE, _VERSE_NULL, _VERSE_REF, _VERSE_ARRAY, _VERSE_STATIC_ARRAY,
    _VERSE_STRUCT, _VERSE_ENUM, _VERSE_FUNC
};

static void* _verse_alloc(int64_t size) {
    void* p = calloc(1, size > 0 ? (size_t)size : 1);
    if (!p) {
        fprintf(stderr, "out of memory\n");
        exit(1);
    }
    return p;
}

static int64_t _verse_strlen(const char* s) {
    return s ? (int64_t)strlen(s) : 0;
}

static char* _verse_string_copy(const char* s) {
    if (!s) return NULL;
    int64_t n = _verse_strlen(s);
    char* out = _verse_alloc(n + 1);
    memcpy(out, s, n);
    return out;
}

static char* _verse_string_concat(const char* a, const char* b) {
    int64_t la = _verse_strlen(a), lb = _verse_strlen(b);
    char* out = _verse_alloc(la + lb + 1);
    if (la) memcpy(out, a, la);
    if (lb) memcpy(out + la, b, lb);
    return out;
}

static bool _verse_string_eq(const char* a, const char* b) {
    return strcmp(a ? a : "", b ? b : "") == 0;
}

static char* _verse_string_slice(const char* s, int64_t start, int64_t end) {
    int64_t n = _verse_strlen(s);
    if (start < 0) start = 0;
    if (end > n) end = n;
    if (end < start) end = start;
    char* out = _verse_alloc(end - start + 1);
    if (end > start) memcpy(out, s + start, end - start);
    return out;
}

static _verse_array _verse_array_slice(_verse_array a, int64_t start, int64_t end, int64_t elem_size) {
    if (start < 0) start = 0;
    if (end > a.length) end = a.length;
    if (end < start) end = start;
    return (_verse_array){ end - start, (char*)a.data + start * elem_size };
}

static int64_t _verse_bounds(int64_t index, int64_t length) {
    if (index < 0 || index >= length) {
        fprintf(stderr, "index %lld out of bounds (length %lld)\n", (long long)index, (long long)length);
        exit(1);
    }
    return index;
}

static void* _verse_elem(_verse_array a, int64_t index, int64_t elem_size) {
    return (char*)a.data + _verse_bounds(index, a.length) * elem_size;
}

static uint8_t _verse_string_at(const char* s, int64_t index) {
    return (uint8_t)s[_verse_bounds(index, _verse_strlen(s))];
}

static _verse_array _verse_array_alloc(int64_t n, int64_t elem_size) {
    if (n < 0) n = 0;
    return (_verse_array){ n, _verse_alloc(n * elem_size) };
}

static char* _verse_itoa(int64_t n) {
    char buf[32];
    snprintf(buf, sizeof buf, "%lld", (long long)n);
    return _verse_string_copy(buf);
}

static _verse_typeinfo* _verse_type_of(_verse_any value) {
    return value.type;
}

static char* _verse_type_name(_verse_typeinfo* t) {
    return _verse_string_copy(t ? t->name : "null");
}

static void _verse_assert(bool cond) {
    if (!cond) {
        fprintf(stderr, "Assertion failed\n");
        exit(1);
    }
}

static void _verse_exit(int64_t code) {
    exit((int)code);
}

static int64_t _verse_read_int(void* p, int64_t size, bool is_signed) {
    switch (size) {
    case 1: return is_signed ? (int64_t)*(int8_t*)p : (int64_t)*(uint8_t*)p;
    case 2: return is_signed ? (int64_t)*(int16_t*)p : (int64_t)*(uint16_t*)p;
    case 4: return is_signed ? (int64_t)*(int32_t*)p : (int64_t)*(uint32_t*)p;
    default: return *(int64_t*)p;
    }
}

static void _verse_print_value(void* p, _verse_typeinfo* t) {
    if (!t) {
        printf("null");
        return;
    }
    switch (t->kind) {
    case _VERSE_BOOL:
        printf("%s", *(bool*)p ? "true" : "false");
        break;
    case _VERSE_INT:
        if (t->is_signed || t->size < 8) printf("%lld", (long long)_verse_read_int(p, t->size, t->is_signed));
        else printf("%llu", (unsigned long long)*(uint64_t*)p);
        break;
    case _VERSE_FLOAT:
        printf("%g", t->size == 4 ? (double)*(float*)p : *(double*)p);
        break;
    case _VERSE_STRING:
        printf("%s", *(char**)p ? *(char**)p : "");
        break;
    case _VERSE_PTR:
    case _VERSE_REF:
    case _VERSE_FUNC:
        printf("%p", *(void**)p);
        break;
    case _VERSE_ANY: {
        _verse_any* a = p;
        _verse_print_value(a->value, a->type);
        break;
    }
    case _VERSE_TYPE: {
        _verse_typeinfo* inner = *(_verse_typeinfo**)p;
        printf("%s", inner ? inner->name : "null");
        break;
    }
    case _VERSE_NULL:
        printf("null");
        break;
    case _VERSE_ARRAY:
    case _VERSE_STATIC_ARRAY: {
        int64_t n = t->kind == _VERSE_ARRAY ? ((_verse_array*)p)->length : t->length;
        char* data = t->kind == _VERSE_ARRAY ? ((_verse_array*)p)->data : p;
        printf("[");
        for (int64_t i = 0; i < n; i++) {
            if (i) printf(", ");
            _verse_print_value(data + i * t->inner->size, t->inner);
        }
        printf("]");
        break;
    }
    case _VERSE_STRUCT:
        printf("%s{", t->name);
        for (int64_t i = 0; i < t->member_count; i++) {
            if (i) printf(", ");
            printf("%s = ", t->members[i].name);
            _verse_print_value((char*)p + t->members[i].offset, t->members[i].type);
        }
        printf("}");
        break;
    case _VERSE_ENUM: {
        int64_t v = _verse_read_int(p, t->size, t->is_signed);
        for (int64_t i = 0; i < t->enum_count; i++) {
            if (t->enum_values[i] == v) {
                printf("%s.%s", t->name, t->enum_names[i]);
                return;
            }
        }
        printf("%s(%lld)", t->name, (long long)v);
        break;
    }
    default:
        break;
    }
}

static void _verse_print(_verse_array args) {
    _verse_any* items = args.data;
    for (int64_t i = 0; i < args.length; i++) {
        _verse_print_value(items[i].value, items[i].type);
    }
}

static void _verse_println(_verse_array args) {
    _verse_print(args);
    printf("\n");
}
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_order_is_stable() {
        let registry = BuiltinRegistry::new();
        let names: Vec<&str> = registry.all().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["print", "println", "itoa", "type_of", "type_name", "assert", "exit"]);
    }

    #[test]
    fn test_print_is_variadic_any() {
        let registry = BuiltinRegistry::new();
        let print = registry.get("print").unwrap();
        assert!(print.variadic);
        assert_eq!(print.params[0].1, ANY);
        assert!(registry.is_builtin("itoa"));
        assert!(!registry.is_builtin("malloc"));
    }

    #[test]
    fn test_runtime_defines_every_builtin() {
        let runtime = generate_c_runtime();
        for func in BuiltinRegistry::new().all() {
            assert!(runtime.contains(&format!("{}(", func.c_name)), "missing {}", func.c_name);
        }
        assert!(runtime.contains("#define SWAP"));
        assert!(runtime.contains("static int64_t _verse_bounds("));
        assert!(runtime.contains("_verse_array_alloc("));
    }
}
