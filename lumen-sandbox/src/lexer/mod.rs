//! Lexer for the sandbox script language

pub mod scanner;
pub mod token;

pub use scanner::*;
pub use token::*;
