//! Core data types shared by the lexer, parser and interpreter

pub mod ast;
pub mod span;
pub mod token;
