//! Utility module

mod span;
mod error;

pub use span::{FileId, SourceMap, Span};
pub use error::{Diagnostic, Error, Result};
