//! Builtin functions and the C runtime they live in

pub mod builtins;

pub use builtins::{generate_c_runtime, BuiltinFunc, BuiltinRegistry};
