//! Code Generation trait - Backend abstraction
//!
//! A backend turns a fully analyzed [`CompilationContext`] into target
//! source text. It makes no semantic decisions of its own: anything it
//! cannot lower is an internal error.
//!
//! [`CompilationContext`]: crate::middle::CompilationContext

use crate::utils::Result;

/// Code generation backend trait
pub trait CodeGen {
    /// Generate the complete output for the analyzed program
    fn generate(&mut self) -> Result<String>;

    /// Get the backend name
    fn name(&self) -> &str;

    /// File extension of the generated output
    fn extension(&self) -> &str;
}
