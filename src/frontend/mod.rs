//! Frontend module - Lexer, Parser, Package Loading, Semantic Analysis

pub mod token;
pub mod lexer;
pub mod ast;
pub mod parser;
pub mod package;
pub mod semantic;
