//! Hand-written byte-oriented lexer for the C++ subset.
//!
//! `#include` directives are consumed here and surfaced as dedicated tokens;
//! every other preprocessor directive is rejected.

use crate::token::{Token, TokenKind, lookup_keyword};
use cxx2c_core::Span;
use derive_more::{Display, Error};

#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
#[display("{message}")]
pub struct LexError {
    pub message: String,
    #[error(not(source))]
    pub span: Span,
}

impl LexError {
    fn new(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
        }
    }
}

pub struct Lexer<'src> {
    source: &'src [u8],
    pos: usize,
}

impl<'src> Lexer<'src> {
    pub fn new(source: &'src str) -> Self {
        Self {
            source: source.as_bytes(),
            pos: 0,
        }
    }

    pub fn tokenize(&mut self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::with_capacity(self.source.len() / 4);
        loop {
            self.skip_whitespace_and_comments()?;
            if self.is_at_end() {
                tokens.push(Token::new(TokenKind::Eof, Span::new(self.pos, self.pos)));
                break;
            }
            tokens.push(self.scan_token()?);
        }
        Ok(tokens)
    }

    fn scan_token(&mut self) -> Result<Token, LexError> {
        let start = self.pos;
        let byte = self.advance();

        let kind = match byte {
            b'(' => TokenKind::LParen,
            b')' => TokenKind::RParen,
            b'{' => TokenKind::LBrace,
            b'}' => TokenKind::RBrace,
            b'[' => TokenKind::LBracket,
            b']' => TokenKind::RBracket,
            b',' => TokenKind::Comma,
            b';' => TokenKind::Semicolon,
            b'~' => TokenKind::Tilde,
            b'.' => TokenKind::Dot,
            b'#' => return self.scan_directive(start),
            b'"' => return self.scan_string(start),
            b':' => {
                if self.match_byte(b':') {
                    TokenKind::ColonColon
                } else {
                    TokenKind::Colon
                }
            }
            b'+' => {
                if self.match_byte(b'+') {
                    TokenKind::PlusPlus
                } else if self.match_byte(b'=') {
                    TokenKind::PlusEq
                } else {
                    TokenKind::Plus
                }
            }
            b'-' => {
                if self.match_byte(b'-') {
                    TokenKind::MinusMinus
                } else if self.match_byte(b'=') {
                    TokenKind::MinusEq
                } else if self.match_byte(b'>') {
                    TokenKind::Arrow
                } else {
                    TokenKind::Minus
                }
            }
            b'*' => TokenKind::Star,
            b'/' => TokenKind::Slash,
            b'%' => TokenKind::Percent,
            b'=' => {
                if self.match_byte(b'=') {
                    TokenKind::EqEq
                } else {
                    TokenKind::Assign
                }
            }
            b'!' => {
                if self.match_byte(b'=') {
                    TokenKind::NotEq
                } else {
                    TokenKind::Not
                }
            }
            b'<' => {
                if self.match_byte(b'<') {
                    TokenKind::Shl
                } else if self.match_byte(b'=') {
                    TokenKind::LtEq
                } else {
                    TokenKind::Lt
                }
            }
            b'>' => {
                if self.match_byte(b'>') {
                    TokenKind::GtGt
                } else if self.match_byte(b'=') {
                    TokenKind::GtEq
                } else {
                    TokenKind::Gt
                }
            }
            b'&' => {
                if self.match_byte(b'&') {
                    TokenKind::AndAnd
                } else {
                    TokenKind::Amp
                }
            }
            b'|' => {
                if self.match_byte(b'|') {
                    TokenKind::OrOr
                } else {
                    return Err(LexError::new(
                        "bitwise `|` is not supported",
                        Span::new(start, self.pos),
                    ));
                }
            }
            b'0'..=b'9' => return self.scan_number(start),
            b'a'..=b'z' | b'A'..=b'Z' | b'_' => return Ok(self.scan_identifier(start)),
            other => {
                return Err(LexError::new(
                    format!("unexpected character `{}`", other as char),
                    Span::new(start, self.pos),
                ));
            }
        };

        Ok(Token::new(kind, Span::new(start, self.pos)))
    }

    fn scan_directive(&mut self, start: usize) -> Result<Token, LexError> {
        self.skip_spaces();
        let word_start = self.pos;
        while !self.is_at_end() && self.peek().is_ascii_alphabetic() {
            self.pos += 1;
        }
        let word = &self.source[word_start..self.pos];
        if word != b"include" {
            return Err(LexError::new(
                format!(
                    "unsupported preprocessor directive `#{}`",
                    String::from_utf8_lossy(word)
                ),
                Span::new(start, self.pos),
            ));
        }
        self.skip_spaces();
        if self.is_at_end() {
            return Err(LexError::new(
                "expected `<header>` or `\"header\"` after #include",
                Span::new(start, self.pos),
            ));
        }
        let close = match self.peek() {
            b'<' => b'>',
            b'"' => b'"',
            _ => {
                return Err(LexError::new(
                    "expected `<header>` or `\"header\"` after #include",
                    Span::new(start, self.pos),
                ));
            }
        };
        self.pos += 1;
        let name_start = self.pos;
        while !self.is_at_end() && self.peek() != close && self.peek() != b'\n' {
            self.pos += 1;
        }
        if self.is_at_end() || self.peek() != close {
            return Err(LexError::new(
                "unterminated #include header name",
                Span::new(start, self.pos),
            ));
        }
        let header = String::from_utf8_lossy(&self.source[name_start..self.pos]).into_owned();
        self.pos += 1;
        Ok(Token::new(
            TokenKind::Include(header),
            Span::new(start, self.pos),
        ))
    }

    fn scan_string(&mut self, start: usize) -> Result<Token, LexError> {
        let mut value = String::new();
        loop {
            if self.is_at_end() {
                return Err(LexError::new(
                    "unterminated string literal",
                    Span::new(start, self.pos),
                ));
            }
            match self.advance() {
                b'"' => break,
                b'\\' => {
                    if self.is_at_end() {
                        return Err(LexError::new(
                            "unterminated string literal",
                            Span::new(start, self.pos),
                        ));
                    }
                    match self.advance() {
                        b'n' => value.push('\n'),
                        b't' => value.push('\t'),
                        b'r' => value.push('\r'),
                        b'0' => value.push('\0'),
                        b'\\' => value.push('\\'),
                        b'"' => value.push('"'),
                        other => {
                            return Err(LexError::new(
                                format!("unknown escape sequence `\\{}`", other as char),
                                Span::new(start, self.pos),
                            ));
                        }
                    }
                }
                b'\n' => {
                    return Err(LexError::new(
                        "unterminated string literal",
                        Span::new(start, self.pos),
                    ));
                }
                other => value.push(other as char),
            }
        }
        Ok(Token::new(TokenKind::Str(value), Span::new(start, self.pos)))
    }

    fn scan_number(&mut self, start: usize) -> Result<Token, LexError> {
        while !self.is_at_end() && self.peek().is_ascii_digit() {
            self.pos += 1;
        }
        if !self.is_at_end() && (self.peek() == b'.' || self.peek() == b'e' || self.peek() == b'E')
        {
            return Err(LexError::new(
                "floating-point literals are not supported",
                Span::new(start, self.pos),
            ));
        }
        let text = std::str::from_utf8(&self.source[start..self.pos]).expect("ascii digits");
        let value: i64 = text.parse().map_err(|_| {
            LexError::new(
                format!("integer literal `{text}` out of range"),
                Span::new(start, self.pos),
            )
        })?;
        Ok(Token::new(TokenKind::Int(value), Span::new(start, self.pos)))
    }

    fn scan_identifier(&mut self, start: usize) -> Token {
        while !self.is_at_end() {
            let byte = self.peek();
            if byte.is_ascii_alphanumeric() || byte == b'_' {
                self.pos += 1;
            } else {
                break;
            }
        }
        let text = std::str::from_utf8(&self.source[start..self.pos])
            .expect("identifier bytes are ascii")
            .to_string();
        let kind = lookup_keyword(&text).unwrap_or(TokenKind::Ident(text));
        Token::new(kind, Span::new(start, self.pos))
    }

    fn skip_whitespace_and_comments(&mut self) -> Result<(), LexError> {
        loop {
            if self.is_at_end() {
                return Ok(());
            }
            match self.peek() {
                b' ' | b'\t' | b'\r' | b'\n' => {
                    self.pos += 1;
                }
                b'/' if self.peek_at(1) == Some(b'/') => {
                    while !self.is_at_end() && self.peek() != b'\n' {
                        self.pos += 1;
                    }
                }
                b'/' if self.peek_at(1) == Some(b'*') => {
                    let start = self.pos;
                    self.pos += 2;
                    loop {
                        if self.is_at_end() {
                            return Err(LexError::new(
                                "unterminated block comment",
                                Span::new(start, self.pos),
                            ));
                        }
                        if self.peek() == b'*' && self.peek_at(1) == Some(b'/') {
                            self.pos += 2;
                            break;
                        }
                        self.pos += 1;
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn skip_spaces(&mut self) {
        while !self.is_at_end() && (self.peek() == b' ' || self.peek() == b'\t') {
            self.pos += 1;
        }
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.source.len()
    }

    fn peek(&self) -> u8 {
        self.source[self.pos]
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.source.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> u8 {
        let byte = self.source[self.pos];
        self.pos += 1;
        byte
    }

    fn match_byte(&mut self, expected: u8) -> bool {
        if !self.is_at_end() && self.peek() == expected {
            self.pos += 1;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        Lexer::new(source)
            .tokenize()
            .expect("lex failure")
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn lexes_include_directive() {
        assert_eq!(
            kinds("#include <iostream>\n"),
            vec![TokenKind::Include("iostream".to_string()), TokenKind::Eof]
        );
    }

    #[test]
    fn lexes_qualified_name() {
        assert_eq!(
            kinds("std::cout"),
            vec![
                TokenKind::Ident("std".to_string()),
                TokenKind::ColonColon,
                TokenKind::Ident("cout".to_string()),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn lexes_shift_and_comparison_operators() {
        assert_eq!(
            kinds("<< >> <= >= < >"),
            vec![
                TokenKind::Shl,
                TokenKind::GtGt,
                TokenKind::LtEq,
                TokenKind::GtEq,
                TokenKind::Lt,
                TokenKind::Gt,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn lexes_string_escapes() {
        assert_eq!(
            kinds(r#""a\n\"b\"""#),
            vec![TokenKind::Str("a\n\"b\"".to_string()), TokenKind::Eof]
        );
    }

    #[test]
    fn skips_comments() {
        let source = "// line\nint /* block */ x";
        assert_eq!(
            kinds(source),
            vec![
                TokenKind::KwInt,
                TokenKind::Ident("x".to_string()),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn rejects_unknown_directive() {
        let err = Lexer::new("#define X 1\n").tokenize().unwrap_err();
        assert!(err.message.contains("#define"));
    }

    #[test]
    fn rejects_float_literal() {
        let err = Lexer::new("1.5").tokenize().unwrap_err();
        assert!(err.message.contains("floating-point"));
    }
}
