//! Error handling for Verse
//!
//! Every problem the compiler detects is fatal: passes return the first
//! [`Error`] they hit and the driver stops. `Internal` errors denote compiler
//! invariant violations rather than problems in the user's program.

use serde::Serialize;
use thiserror::Error;

use crate::utils::{SourceMap, Span};

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Compiler error
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    // ==================== Lexer Errors ====================

    #[error("Unexpected character '{ch}'")]
    UnexpectedChar { ch: char, span: Span },

    #[error("Unterminated string literal")]
    UnterminatedString { span: Span },

    #[error("Invalid number literal '{text}'")]
    InvalidNumber { text: String, span: Span },

    // ==================== Parser Errors ====================

    #[error("Unexpected token: expected {expected}, got {got}")]
    UnexpectedToken {
        expected: String,
        got: String,
        span: Span,
    },

    #[error("Expected {0}")]
    Expected(String, Span),

    #[error("Expected identifier")]
    ExpectedIdent { span: Span },

    #[error("Expected type")]
    ExpectedType { span: Span },

    #[error("Expected expression")]
    ExpectedExpr { span: Span },

    // ==================== Name Resolution Errors ====================

    #[error("Undefined variable: {name}")]
    UndefinedVariable { name: String, span: Span },

    #[error("Unknown type: {name}")]
    UndefinedType { name: String, span: Span },

    #[error("Duplicate definition: {name}")]
    DuplicateDefinition { name: String, span: Span },

    #[error("'{name}' collides with an existing binding")]
    NameCollision { name: String, span: Span },

    #[error("Cannot reference '{name}': it is a local of an enclosing function")]
    CapturedLocal { name: String, span: Span },

    #[error("Unknown member '{member}' of {ty}")]
    UnknownMember {
        member: String,
        ty: String,
        span: Span,
    },

    #[error("Cyclic type alias: {name}")]
    CyclicAlias { name: String, span: Span },

    // ==================== Type Errors ====================

    #[error("Type mismatch: expected {expected}, got {got}")]
    TypeMismatch {
        expected: String,
        got: String,
        span: Span,
    },

    #[error("Argument count mismatch: expected {expected}, got {got}")]
    ArgCountMismatch {
        expected: usize,
        got: usize,
        span: Span,
    },

    #[error("Expression of type {ty} is not callable")]
    NotCallable { ty: String, span: Span },

    #[error("Expression of type {ty} is not a struct")]
    NotAStruct { ty: String, span: Span },

    #[error("Cannot dereference {ty}")]
    CannotDeref { ty: String, span: Span },

    #[error("Expression of type {ty} is not indexable")]
    NotIndexable { ty: String, span: Span },

    #[error("Invalid operands for '{op}': {left} and {right}")]
    InvalidOperands {
        op: String,
        left: String,
        right: String,
        span: Span,
    },

    #[error("Cannot cast {from} to {to}")]
    InvalidCast { from: String, to: String, span: Span },

    #[error("Redundant cast: value already has type {ty}")]
    RedundantCast { ty: String, span: Span },

    #[error("Cannot infer type of {what}")]
    CannotInfer { what: String, span: Span },

    #[error("Generic type {name} expects {expected} parameter(s), got {got}")]
    GenericArity {
        name: String,
        expected: usize,
        got: usize,
        span: Span,
    },

    #[error("Generic type {name} used without parameters")]
    UnreifiedGeneric { name: String, span: Span },

    #[error("Struct literal mixes named and positional members")]
    MixedStructLiteral { span: Span },

    #[error("{message}")]
    Semantic { message: String, span: Span },

    // ==================== Ownership / Assignment Errors ====================

    #[error("Owned value of type {ty} may only be initialized from 'new'{hint}")]
    OwnershipViolation {
        ty: String,
        hint: String,
        span: Span,
    },

    #[error("Left-hand side is not assignable")]
    NotAssignable { span: Span },

    #[error("Cannot assign to constant '{name}'")]
    AssignToConstant { name: String, span: Span },

    #[error("Strings are immutable: cannot assign through an index")]
    ImmutableString { span: Span },

    // ==================== Literal Errors ====================

    #[error("Literal {value} does not fit in {ty}: {reason}")]
    PrecisionLoss {
        value: String,
        ty: String,
        reason: String,
        span: Span,
    },

    #[error("Division by zero in constant expression")]
    DivisionByZero { span: Span },

    // ==================== Control Flow Errors ====================

    #[error("'{keyword}' outside of a loop")]
    OutsideLoop { keyword: String, span: Span },

    #[error("'return' outside of a function")]
    ReturnOutsideFunction { span: Span },

    #[error("Invalid defer: {message}")]
    InvalidDefer { message: String, span: Span },

    // ==================== Package Errors ====================

    #[error("Package not found: {path}")]
    PackageNotFound { path: String, span: Span },

    #[error("IO error: {0}")]
    Io(String),

    // ==================== Internal Errors ====================

    #[error("internal compiler error: {0}")]
    Internal(String),
}

impl Error {
    /// Get the span associated with this error
    pub fn span(&self) -> Option<Span> {
        match self {
            Self::UnexpectedChar { span, .. }
            | Self::UnterminatedString { span }
            | Self::InvalidNumber { span, .. }
            | Self::UnexpectedToken { span, .. }
            | Self::Expected(_, span)
            | Self::ExpectedIdent { span }
            | Self::ExpectedType { span }
            | Self::ExpectedExpr { span }
            | Self::UndefinedVariable { span, .. }
            | Self::UndefinedType { span, .. }
            | Self::DuplicateDefinition { span, .. }
            | Self::NameCollision { span, .. }
            | Self::CapturedLocal { span, .. }
            | Self::UnknownMember { span, .. }
            | Self::CyclicAlias { span, .. }
            | Self::TypeMismatch { span, .. }
            | Self::ArgCountMismatch { span, .. }
            | Self::NotCallable { span, .. }
            | Self::NotAStruct { span, .. }
            | Self::CannotDeref { span, .. }
            | Self::NotIndexable { span, .. }
            | Self::InvalidOperands { span, .. }
            | Self::InvalidCast { span, .. }
            | Self::RedundantCast { span, .. }
            | Self::CannotInfer { span, .. }
            | Self::GenericArity { span, .. }
            | Self::UnreifiedGeneric { span, .. }
            | Self::MixedStructLiteral { span }
            | Self::Semantic { span, .. }
            | Self::OwnershipViolation { span, .. }
            | Self::NotAssignable { span }
            | Self::AssignToConstant { span, .. }
            | Self::ImmutableString { span }
            | Self::PrecisionLoss { span, .. }
            | Self::DivisionByZero { span }
            | Self::OutsideLoop { span, .. }
            | Self::ReturnOutsideFunction { span }
            | Self::InvalidDefer { span, .. }
            | Self::PackageNotFound { span, .. } => Some(*span),
            Self::Io(_) | Self::Internal(_) => None,
        }
    }

    /// Whether this error reports a compiler bug rather than a user mistake
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::Internal(_))
    }

    /// Shorthand for the catch-all semantic diagnostic
    pub fn semantic(message: impl Into<String>, span: Span) -> Self {
        Self::Semantic { message: message.into(), span }
    }

    /// Shorthand for an internal invariant violation
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}

/// A rendered diagnostic, ready for humans or for JSON output
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Diagnostic {
    pub file: String,
    pub line: u32,
    pub message: String,
    pub internal: bool,
}

impl Diagnostic {
    /// Attach file and line information to an error
    pub fn from_error(error: &Error, files: &SourceMap) -> Self {
        let internal = error.is_internal();
        let (file, line) = match error.span() {
            Some(span) if !internal => (files.name(span.file_id).to_string(), span.line),
            _ if internal => ("<internal>".to_string(), 0),
            _ => ("<input>".to_string(), 0),
        };
        Self {
            file,
            line,
            message: error.to_string(),
            internal,
        }
    }

    /// `file:line: error: message`
    pub fn render(&self) -> String {
        format!("{}:{}: error: {}", self.file, self.line, self.message)
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_user_error() {
        let mut files = SourceMap::new();
        let id = files.add("main.vs");
        let err = Error::UndefinedVariable {
            name: "y".to_string(),
            span: Span::new(4, 5, 7, id),
        };
        let diag = Diagnostic::from_error(&err, &files);
        assert_eq!(diag.render(), "main.vs:7: error: Undefined variable: y");
        assert!(!diag.internal);
    }

    #[test]
    fn test_render_internal_error() {
        let files = SourceMap::new();
        let err = Error::internal("unhandled node");
        let diag = Diagnostic::from_error(&err, &files);
        assert_eq!(diag.file, "<internal>");
        assert!(diag.internal);
        assert!(diag.to_json().contains("\"internal\":true"));
    }
}
