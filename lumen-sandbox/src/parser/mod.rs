//! Parser for the sandbox script language

pub mod ast;
pub mod parser;

pub use ast::*;
pub use parser::*;
