//! C Backend - Generate C code from the analyzed program
//!
//! The output is a single translation unit: the runtime prelude, the type
//! declarations and their copy/free helpers, typeinfo tables, globals, the
//! functions and the two init routines `main` runs before the user's `main`.

mod c_codegen;
mod expr;
mod helpers;
mod stmt;
mod typeinfo;
mod types;

pub use c_codegen::CCodeGen;
