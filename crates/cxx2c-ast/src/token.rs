//! Token definitions for the C++ subset lexer.

use cxx2c_core::Span;

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, span: Span) -> Self {
        Self { kind, span }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Eof,

    Ident(String),
    Int(i64),
    Str(String),

    /// `#include <...>` or `#include "..."`, carrying the header name.
    Include(String),

    // Keywords.
    KwClass,
    KwStruct,
    KwPublic,
    KwPrivate,
    KwTemplate,
    KwTypename,
    KwConstexpr,
    KwConst,
    KwReturn,
    KwIf,
    KwElse,
    KwWhile,
    KwFor,
    KwBreak,
    KwContinue,
    KwVoid,
    KwInt,
    KwBool,
    KwTrue,
    KwFalse,
    KwNullptr,
    KwAuto,

    // Punctuation.
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Semicolon,
    Colon,
    ColonColon,
    Dot,
    Arrow,
    Tilde,
    Amp,

    // Operators.
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    PlusPlus,
    MinusMinus,
    PlusEq,
    MinusEq,
    Assign,
    EqEq,
    NotEq,
    Lt,
    Gt,
    LtEq,
    GtEq,
    GtGt,
    Shl,
    AndAnd,
    OrOr,
    Not,
}

impl TokenKind {
    /// Human-readable description used in "expected X" diagnostics.
    pub fn describe(&self) -> String {
        match self {
            TokenKind::Eof => "end of input".to_string(),
            TokenKind::Ident(name) => format!("identifier `{name}`"),
            TokenKind::Int(value) => format!("integer `{value}`"),
            TokenKind::Str(_) => "string literal".to_string(),
            TokenKind::Include(header) => format!("#include <{header}>"),
            other => format!("`{}`", other.lexeme()),
        }
    }

    fn lexeme(&self) -> &'static str {
        match self {
            TokenKind::KwClass => "class",
            TokenKind::KwStruct => "struct",
            TokenKind::KwPublic => "public",
            TokenKind::KwPrivate => "private",
            TokenKind::KwTemplate => "template",
            TokenKind::KwTypename => "typename",
            TokenKind::KwConstexpr => "constexpr",
            TokenKind::KwConst => "const",
            TokenKind::KwReturn => "return",
            TokenKind::KwIf => "if",
            TokenKind::KwElse => "else",
            TokenKind::KwWhile => "while",
            TokenKind::KwFor => "for",
            TokenKind::KwBreak => "break",
            TokenKind::KwContinue => "continue",
            TokenKind::KwVoid => "void",
            TokenKind::KwInt => "int",
            TokenKind::KwBool => "bool",
            TokenKind::KwTrue => "true",
            TokenKind::KwFalse => "false",
            TokenKind::KwNullptr => "nullptr",
            TokenKind::KwAuto => "auto",
            TokenKind::LParen => "(",
            TokenKind::RParen => ")",
            TokenKind::LBrace => "{",
            TokenKind::RBrace => "}",
            TokenKind::LBracket => "[",
            TokenKind::RBracket => "]",
            TokenKind::Comma => ",",
            TokenKind::Semicolon => ";",
            TokenKind::Colon => ":",
            TokenKind::ColonColon => "::",
            TokenKind::Dot => ".",
            TokenKind::Arrow => "->",
            TokenKind::Tilde => "~",
            TokenKind::Amp => "&",
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Star => "*",
            TokenKind::Slash => "/",
            TokenKind::Percent => "%",
            TokenKind::PlusPlus => "++",
            TokenKind::MinusMinus => "--",
            TokenKind::PlusEq => "+=",
            TokenKind::MinusEq => "-=",
            TokenKind::Assign => "=",
            TokenKind::EqEq => "==",
            TokenKind::NotEq => "!=",
            TokenKind::Lt => "<",
            TokenKind::Gt => ">",
            TokenKind::LtEq => "<=",
            TokenKind::GtEq => ">=",
            TokenKind::GtGt => ">>",
            TokenKind::Shl => "<<",
            TokenKind::AndAnd => "&&",
            TokenKind::OrOr => "||",
            TokenKind::Not => "!",
            _ => unreachable!("literal tokens are described above"),
        }
    }
}

/// Map an identifier to its keyword token, if it is one.
pub fn lookup_keyword(ident: &str) -> Option<TokenKind> {
    let kind = match ident {
        "class" => TokenKind::KwClass,
        "struct" => TokenKind::KwStruct,
        "public" => TokenKind::KwPublic,
        "private" => TokenKind::KwPrivate,
        "template" => TokenKind::KwTemplate,
        "typename" => TokenKind::KwTypename,
        "constexpr" => TokenKind::KwConstexpr,
        "const" => TokenKind::KwConst,
        "return" => TokenKind::KwReturn,
        "if" => TokenKind::KwIf,
        "else" => TokenKind::KwElse,
        "while" => TokenKind::KwWhile,
        "for" => TokenKind::KwFor,
        "break" => TokenKind::KwBreak,
        "continue" => TokenKind::KwContinue,
        "void" => TokenKind::KwVoid,
        "int" => TokenKind::KwInt,
        "bool" => TokenKind::KwBool,
        "true" => TokenKind::KwTrue,
        "false" => TokenKind::KwFalse,
        "nullptr" => TokenKind::KwNullptr,
        "auto" => TokenKind::KwAuto,
        _ => return None,
    };
    Some(kind)
}
