//! Monkey syntax crate - lexing and parsing.
//!
//! This crate provides the lexer, AST and parser for the Monkey
//! programming language, plus source-located error reporting.

pub mod ast;
pub mod errors;
pub mod lexer;
pub mod parser;

pub use ast::*;
pub use errors::{eprint_errors, offset_to_line_col, ErrorKind, SourceError};
pub use lexer::{lex, Token};
pub use parser::parse;
