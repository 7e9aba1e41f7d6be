//! Lexer, parser, and AST for the accepted C++ subset.
pub mod ast;
pub mod lexer;
pub mod parser;
pub mod token;

pub use ast::*;
pub use lexer::{LexError, Lexer};
pub use parser::{ParseError, Parser, parse_translation_unit};
pub use token::{Token, TokenKind};
