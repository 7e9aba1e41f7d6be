//! Recursive descent parser for the C++ subset.
//!
//! Parsing is fail-fast: the first syntax error aborts the unit. The only
//! backtracking is local, for declaration-vs-expression statements and for
//! range-`for` headers, both of which are ambiguous on an identifier prefix.

use crate::ast::*;
use crate::lexer::{LexError, Lexer};
use crate::token::{Token, TokenKind};
use cxx2c_core::{CompilationPhase, Diagnostic, DiagnosticKind, SourceFile, Span};
use derive_more::{Display, Error};
use salsa::Accumulator;

#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
#[display("{message}")]
pub struct ParseError {
    pub message: String,
    #[error(not(source))]
    pub span: Span,
}

impl ParseError {
    fn new(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
        }
    }
}

impl From<LexError> for ParseError {
    fn from(err: LexError) -> Self {
        ParseError::new(err.message, err.span)
    }
}

type ParseResult<T> = Result<T, ParseError>;

/// Headers the subset knows how to model; anything else is an error rather
/// than a silently-dropped dependency.
const KNOWN_HEADERS: &[&str] = &["iostream", "string", "memory", "array", "cstddef"];

/// C++ keywords the subset deliberately rejects. They lex as identifiers, so
/// the parser names them explicitly to produce a useful message.
const REJECTED_KEYWORDS: &[&str] = &[
    "virtual", "throw", "try", "catch", "new", "delete", "switch", "do", "goto", "operator",
    "namespace", "using", "typedef", "union", "enum", "friend", "mutable", "static", "this",
];

/// Parse a source file into a [`TranslationUnit`], accumulating a diagnostic
/// and returning an empty unit on failure.
#[salsa::tracked]
pub fn parse_translation_unit<'db>(
    db: &'db dyn salsa::Database,
    source: SourceFile,
) -> TranslationUnit<'db> {
    match Parser::parse_source(source.text(db)) {
        Ok((includes, items)) => TranslationUnit::new(db, includes, items),
        Err(err) => {
            Diagnostic::error(
                DiagnosticKind::SyntaxError,
                CompilationPhase::Parsing,
                err.span,
                err.message,
            )
            .accumulate(db);
            TranslationUnit::new(db, Vec::new(), Vec::new())
        }
    }
}

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    pub fn parse_source(source: &str) -> ParseResult<(Vec<Include>, Vec<Item>)> {
        let tokens = Lexer::new(source).tokenize()?;
        let mut parser = Parser { tokens, pos: 0 };
        parser.parse_unit()
    }

    fn parse_unit(&mut self) -> ParseResult<(Vec<Include>, Vec<Item>)> {
        let mut includes = Vec::new();
        let mut items = Vec::new();
        while !self.check(&TokenKind::Eof) {
            if let TokenKind::Include(header) = self.peek_kind().clone() {
                let span = self.peek_span();
                self.advance();
                if !KNOWN_HEADERS.contains(&header.as_str()) {
                    return Err(ParseError::new(
                        format!("unsupported header `<{header}>`"),
                        span,
                    ));
                }
                includes.push(Include { header, span });
            } else {
                items.push(self.parse_item()?);
            }
        }
        Ok((includes, items))
    }

    // -------------------------------------------------------------------------
    // Items
    // -------------------------------------------------------------------------

    fn parse_item(&mut self) -> ParseResult<Item> {
        match self.peek_kind() {
            TokenKind::KwTemplate => self.parse_template_item(),
            TokenKind::KwClass | TokenKind::KwStruct => {
                Ok(Item::Class(self.parse_class(Vec::new())?))
            }
            _ => Ok(Item::Function(self.parse_function(Vec::new())?)),
        }
    }

    fn parse_template_item(&mut self) -> ParseResult<Item> {
        self.expect(&TokenKind::KwTemplate)?;
        self.expect(&TokenKind::Lt)?;
        let mut params = Vec::new();
        loop {
            let span = self.peek_span();
            let param = if self.eat(&TokenKind::KwTypename) {
                let name = self.expect_ident()?;
                TemplateParam {
                    name,
                    kind: TemplateParamKind::Type,
                    span,
                }
            } else {
                let ty = self.parse_type()?;
                let name = self.expect_ident()?;
                TemplateParam {
                    name,
                    kind: TemplateParamKind::Value(ty),
                    span,
                }
            };
            params.push(param);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect_template_close()?;
        match self.peek_kind() {
            TokenKind::KwClass | TokenKind::KwStruct => Ok(Item::Class(self.parse_class(params)?)),
            _ => Ok(Item::Function(self.parse_function(params)?)),
        }
    }

    fn parse_function(&mut self, template_params: Vec<TemplateParam>) -> ParseResult<FunctionDef> {
        let start = self.peek_span();
        let is_constexpr = self.eat(&TokenKind::KwConstexpr);
        let ret = self.parse_type()?;
        let name = self.expect_ident()?;
        let params = self.parse_param_list()?;
        let body = self.parse_block()?;
        let span = start.to(body.span);
        Ok(FunctionDef {
            name,
            template_params,
            is_constexpr,
            ret,
            params,
            body,
            span,
        })
    }

    fn parse_class(&mut self, template_params: Vec<TemplateParam>) -> ParseResult<ClassDef> {
        let start = self.peek_span();
        self.advance(); // class or struct
        let name = self.expect_ident()?;
        self.expect(&TokenKind::LBrace)?;

        let mut fields = Vec::new();
        let mut ctors = Vec::new();
        let mut dtor = None;
        let mut methods = Vec::new();

        while !self.check(&TokenKind::RBrace) {
            match self.peek_kind() {
                TokenKind::KwPublic | TokenKind::KwPrivate => {
                    self.advance();
                    self.expect(&TokenKind::Colon)?;
                }
                TokenKind::Tilde => {
                    let dtor_span = self.peek_span();
                    self.advance();
                    let dtor_name = self.expect_ident()?;
                    if dtor_name != name {
                        return Err(ParseError::new(
                            format!("destructor `~{dtor_name}` does not match class `{name}`"),
                            dtor_span,
                        ));
                    }
                    self.expect(&TokenKind::LParen)?;
                    self.expect(&TokenKind::RParen)?;
                    let body = self.parse_block()?;
                    if dtor.is_some() {
                        return Err(ParseError::new(
                            format!("class `{name}` already has a destructor"),
                            dtor_span,
                        ));
                    }
                    dtor = Some(Dtor {
                        span: dtor_span.to(body.span),
                        body,
                    });
                }
                _ => {
                    let member_start = self.peek_span();
                    let is_constexpr = self.eat(&TokenKind::KwConstexpr);
                    if self.at_ctor_head(&name) {
                        ctors.push(self.parse_ctor(is_constexpr, member_start)?);
                    } else {
                        let ty = self.parse_type()?;
                        let member_name = self.expect_ident()?;
                        if self.check(&TokenKind::LParen) {
                            methods.push(self.parse_method(
                                member_name,
                                ty,
                                is_constexpr,
                                member_start,
                            )?);
                        } else {
                            if is_constexpr {
                                return Err(ParseError::new(
                                    "constexpr data members are not supported",
                                    member_start,
                                ));
                            }
                            self.expect(&TokenKind::Semicolon)?;
                            fields.push(Field {
                                name: member_name,
                                ty,
                                span: member_start,
                            });
                        }
                    }
                }
            }
        }
        self.expect(&TokenKind::RBrace)?;
        self.expect(&TokenKind::Semicolon)?;
        let span = start.to(self.prev_span());
        Ok(ClassDef {
            name,
            template_params,
            fields,
            ctors,
            dtor,
            methods,
            span,
        })
    }

    /// True when the next tokens are `ClassName (`, i.e. a constructor head.
    fn at_ctor_head(&self, class_name: &str) -> bool {
        match self.peek_kind() {
            TokenKind::Ident(id) if id == class_name => {
                matches!(self.peek_kind_at(1), TokenKind::LParen)
            }
            _ => false,
        }
    }

    fn parse_ctor(&mut self, is_constexpr: bool, start: Span) -> ParseResult<Ctor> {
        self.advance(); // class name
        let params = self.parse_param_list()?;
        let mut inits = Vec::new();
        if self.eat(&TokenKind::Colon) {
            loop {
                let init_span = self.peek_span();
                let member = self.expect_ident()?;
                let args = if self.check(&TokenKind::LBrace) {
                    self.advance();
                    let args = self.parse_expr_list(&TokenKind::RBrace)?;
                    self.expect(&TokenKind::RBrace)?;
                    args
                } else {
                    self.parse_paren_args()?
                };
                inits.push(MemberInit {
                    member,
                    args,
                    span: init_span,
                });
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }
        let body = self.parse_block()?;
        Ok(Ctor {
            is_constexpr,
            params,
            inits,
            span: start.to(body.span),
            body,
        })
    }

    fn parse_method(
        &mut self,
        name: Identifier,
        ret: TypeExpr,
        is_constexpr: bool,
        start: Span,
    ) -> ParseResult<Method> {
        let params = self.parse_param_list()?;
        let is_const = self.eat(&TokenKind::KwConst);
        let body = self.parse_block()?;
        Ok(Method {
            name,
            is_const,
            is_constexpr,
            ret,
            params,
            span: start.to(body.span),
            body,
        })
    }

    fn parse_param_list(&mut self) -> ParseResult<Vec<Param>> {
        self.expect(&TokenKind::LParen)?;
        let mut params = Vec::new();
        if !self.check(&TokenKind::RParen) {
            loop {
                let span = self.peek_span();
                let ty = self.parse_type()?;
                let name = self.expect_ident()?;
                let default = if self.eat(&TokenKind::Assign) {
                    Some(self.parse_expr()?)
                } else {
                    None
                };
                params.push(Param {
                    name,
                    ty,
                    default,
                    span,
                });
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RParen)?;
        Ok(params)
    }

    // -------------------------------------------------------------------------
    // Types
    // -------------------------------------------------------------------------

    fn parse_type(&mut self) -> ParseResult<TypeExpr> {
        let is_const = self.eat(&TokenKind::KwConst);
        let mut ty = self.parse_type_base()?;
        loop {
            if self.check(&TokenKind::AndAnd) {
                return Err(ParseError::new(
                    "rvalue references are not supported",
                    self.peek_span(),
                ));
            }
            if self.eat(&TokenKind::Amp) {
                ty = if is_const {
                    TypeExpr::ConstRef(Box::new(ty))
                } else {
                    TypeExpr::Ref(Box::new(ty))
                };
                return Ok(ty);
            }
            if self.eat(&TokenKind::Star) {
                ty = TypeExpr::Ptr(Box::new(ty));
                continue;
            }
            // Top-level const on a value type has no effect on lowering.
            return Ok(ty);
        }
    }

    fn parse_type_base(&mut self) -> ParseResult<TypeExpr> {
        let span = self.peek_span();
        match self.peek_kind().clone() {
            TokenKind::KwVoid => {
                self.advance();
                Ok(TypeExpr::Void)
            }
            TokenKind::KwBool => {
                self.advance();
                Ok(TypeExpr::Bool)
            }
            TokenKind::KwInt => {
                self.advance();
                Ok(TypeExpr::Int)
            }
            TokenKind::KwAuto => {
                self.advance();
                Ok(TypeExpr::Auto)
            }
            TokenKind::Ident(_) => {
                let name = self.parse_qualified_name()?;
                if REJECTED_KEYWORDS.contains(&name.as_str()) {
                    return Err(ParseError::new(format!("`{name}` is not supported"), span));
                }
                match name.as_str() {
                    "size_t" | "std::size_t" => Ok(TypeExpr::SizeT),
                    "std::string" => Ok(TypeExpr::StdString),
                    "std::array" => {
                        self.expect(&TokenKind::Lt)?;
                        let elem = self.parse_type()?;
                        self.expect(&TokenKind::Comma)?;
                        let len = self.parse_shift_expr()?;
                        self.expect_template_close()?;
                        Ok(TypeExpr::StdArray(Box::new(elem), Box::new(len)))
                    }
                    "std::unique_ptr" => {
                        self.expect(&TokenKind::Lt)?;
                        let inner = self.parse_type()?;
                        self.expect_template_close()?;
                        Ok(TypeExpr::UniquePtr(Box::new(inner)))
                    }
                    _ if name.contains("::") => Err(ParseError::new(
                        format!("unsupported standard library type `{name}`"),
                        span,
                    )),
                    _ => {
                        if self.check(&TokenKind::Lt) {
                            self.advance();
                            let args = self.parse_template_args()?;
                            Ok(TypeExpr::Instantiation(name, args))
                        } else {
                            Ok(TypeExpr::Named(name))
                        }
                    }
                }
            }
            other => Err(ParseError::new(
                format!("expected type, found {}", other.describe()),
                span,
            )),
        }
    }

    /// Parse comma-separated template arguments up to and including the
    /// closing angle bracket.
    fn parse_template_args(&mut self) -> ParseResult<Vec<TemplateArg>> {
        let mut args = Vec::new();
        loop {
            let arg = match self.peek_kind() {
                TokenKind::Int(_) | TokenKind::Minus | TokenKind::LParen => {
                    TemplateArg::Value(self.parse_shift_expr()?)
                }
                _ => TemplateArg::Type(self.parse_type()?),
            };
            args.push(arg);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect_template_close()?;
        Ok(args)
    }

    /// Consume a closing `>`, splitting a `>>` token in two so that nested
    /// template argument lists like `unique_ptr<Node<T>>` close correctly.
    fn expect_template_close(&mut self) -> ParseResult<()> {
        match self.peek_kind() {
            TokenKind::Gt => {
                self.advance();
                Ok(())
            }
            TokenKind::GtGt => {
                let span = self.peek_span();
                self.tokens[self.pos] =
                    Token::new(TokenKind::Gt, Span::new(span.start + 1, span.end));
                Ok(())
            }
            other => Err(ParseError::new(
                format!("expected `>`, found {}", other.describe()),
                self.peek_span(),
            )),
        }
    }

    // -------------------------------------------------------------------------
    // Statements
    // -------------------------------------------------------------------------

    fn parse_block(&mut self) -> ParseResult<Block> {
        let start = self.peek_span();
        self.expect(&TokenKind::LBrace)?;
        let mut stmts = Vec::new();
        while !self.check(&TokenKind::RBrace) {
            if self.check(&TokenKind::Eof) {
                return Err(ParseError::new("unexpected end of input in block", start));
            }
            stmts.push(self.parse_stmt()?);
        }
        self.expect(&TokenKind::RBrace)?;
        Ok(Block {
            stmts,
            span: start.to(self.prev_span()),
        })
    }

    /// Parse a statement used as a loop or branch body: either a braced block
    /// or a single statement wrapped in one.
    fn parse_body(&mut self) -> ParseResult<Block> {
        if self.check(&TokenKind::LBrace) {
            self.parse_block()
        } else {
            let start = self.peek_span();
            let stmt = self.parse_stmt()?;
            Ok(Block {
                stmts: vec![stmt],
                span: start.to(self.prev_span()),
            })
        }
    }

    fn parse_stmt(&mut self) -> ParseResult<Stmt> {
        match self.peek_kind().clone() {
            TokenKind::LBrace => Ok(Stmt::Block(self.parse_block()?)),
            TokenKind::KwIf => self.parse_if_stmt(),
            TokenKind::KwWhile => {
                let span = self.peek_span();
                self.advance();
                self.expect(&TokenKind::LParen)?;
                let cond = self.parse_expr()?;
                self.expect(&TokenKind::RParen)?;
                let body = self.parse_body()?;
                Ok(Stmt::While { cond, body, span })
            }
            TokenKind::KwFor => self.parse_for_stmt(),
            TokenKind::KwReturn => {
                let span = self.peek_span();
                self.advance();
                let value = if self.check(&TokenKind::Semicolon) {
                    None
                } else {
                    Some(self.parse_expr()?)
                };
                self.expect(&TokenKind::Semicolon)?;
                Ok(Stmt::Return(value, span))
            }
            TokenKind::KwBreak => {
                let span = self.peek_span();
                self.advance();
                self.expect(&TokenKind::Semicolon)?;
                Ok(Stmt::Break(span))
            }
            TokenKind::KwContinue => {
                let span = self.peek_span();
                self.advance();
                self.expect(&TokenKind::Semicolon)?;
                Ok(Stmt::Continue(span))
            }
            TokenKind::KwConstexpr
            | TokenKind::KwVoid
            | TokenKind::KwBool
            | TokenKind::KwInt
            | TokenKind::KwAuto
            | TokenKind::KwConst => Ok(Stmt::Decl(self.parse_var_decl()?)),
            TokenKind::Ident(name) => {
                if REJECTED_KEYWORDS.contains(&name.as_str()) {
                    return Err(ParseError::new(
                        format!("`{name}` is not supported"),
                        self.peek_span(),
                    ));
                }
                // `Node<T>* current = ...;` and `list.pushBack(...);` both
                // start with an identifier; try a declaration first and fall
                // back to an expression statement.
                let saved = self.pos;
                match self.parse_var_decl() {
                    Ok(decl) => Ok(Stmt::Decl(decl)),
                    Err(_) => {
                        self.pos = saved;
                        self.parse_expr_stmt()
                    }
                }
            }
            _ => self.parse_expr_stmt(),
        }
    }

    fn parse_expr_stmt(&mut self) -> ParseResult<Stmt> {
        let expr = self.parse_expr()?;
        self.expect(&TokenKind::Semicolon)?;
        Ok(Stmt::Expr(expr))
    }

    fn parse_if_stmt(&mut self) -> ParseResult<Stmt> {
        let span = self.peek_span();
        self.expect(&TokenKind::KwIf)?;
        self.expect(&TokenKind::LParen)?;
        let cond = self.parse_expr()?;
        self.expect(&TokenKind::RParen)?;
        let then_block = self.parse_body()?;
        let else_block = if self.eat(&TokenKind::KwElse) {
            if self.check(&TokenKind::KwIf) {
                let nested_span = self.peek_span();
                let nested = self.parse_if_stmt()?;
                Some(Block {
                    stmts: vec![nested],
                    span: nested_span.to(self.prev_span()),
                })
            } else {
                Some(self.parse_body()?)
            }
        } else {
            None
        };
        Ok(Stmt::If {
            cond,
            then_block,
            else_block,
            span,
        })
    }

    fn parse_for_stmt(&mut self) -> ParseResult<Stmt> {
        let span = self.peek_span();
        self.expect(&TokenKind::KwFor)?;
        self.expect(&TokenKind::LParen)?;

        // Range-for: `for ([const] auto[&] name : iterable)`.
        let saved = self.pos;
        if let Some(var) = self.try_range_for_intro() {
            let iterable = self.parse_expr()?;
            self.expect(&TokenKind::RParen)?;
            let body = self.parse_body()?;
            return Ok(Stmt::RangeFor {
                var,
                iterable,
                body,
                span,
            });
        }
        self.pos = saved;

        let init = if self.eat(&TokenKind::Semicolon) {
            None
        } else {
            let decl_or_expr = match self.peek_kind() {
                TokenKind::KwConstexpr
                | TokenKind::KwVoid
                | TokenKind::KwBool
                | TokenKind::KwInt
                | TokenKind::KwAuto
                | TokenKind::KwConst => Stmt::Decl(self.parse_var_decl()?),
                TokenKind::Ident(_) => {
                    let saved = self.pos;
                    match self.parse_var_decl() {
                        Ok(decl) => Stmt::Decl(decl),
                        Err(_) => {
                            self.pos = saved;
                            self.parse_expr_stmt()?
                        }
                    }
                }
                _ => self.parse_expr_stmt()?,
            };
            Some(Box::new(decl_or_expr))
        };
        let cond = if self.check(&TokenKind::Semicolon) {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.expect(&TokenKind::Semicolon)?;
        let step = if self.check(&TokenKind::RParen) {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.expect(&TokenKind::RParen)?;
        let body = self.parse_body()?;
        Ok(Stmt::For {
            init,
            cond,
            step,
            body,
            span,
        })
    }

    /// Try to parse `[const] auto [&] name :`; returns the bound name and
    /// leaves the cursor after the colon on success.
    fn try_range_for_intro(&mut self) -> Option<Identifier> {
        self.eat(&TokenKind::KwConst);
        if !self.eat(&TokenKind::KwAuto) {
            return None;
        }
        self.eat(&TokenKind::Amp);
        let name = match self.peek_kind() {
            TokenKind::Ident(name) => name.clone(),
            _ => return None,
        };
        self.advance();
        if !self.eat(&TokenKind::Colon) {
            return None;
        }
        Some(name)
    }

    fn parse_var_decl(&mut self) -> ParseResult<VarDecl> {
        let span = self.peek_span();
        let is_constexpr = self.eat(&TokenKind::KwConstexpr);
        let ty = self.parse_type()?;
        let name = self.expect_ident()?;
        let init = if self.eat(&TokenKind::Assign) {
            VarInit::Assign(self.parse_expr()?)
        } else if self.check(&TokenKind::LParen) {
            VarInit::Construct(self.parse_paren_args()?)
        } else if self.check(&TokenKind::LBrace) {
            self.advance();
            let args = self.parse_expr_list(&TokenKind::RBrace)?;
            self.expect(&TokenKind::RBrace)?;
            VarInit::Brace(args)
        } else {
            VarInit::None
        };
        self.expect(&TokenKind::Semicolon)?;
        Ok(VarDecl {
            name,
            ty,
            is_constexpr,
            init,
            span: span.to(self.prev_span()),
        })
    }

    // -------------------------------------------------------------------------
    // Expressions
    // -------------------------------------------------------------------------

    fn parse_expr(&mut self) -> ParseResult<Expr> {
        self.parse_assign_expr()
    }

    fn parse_assign_expr(&mut self) -> ParseResult<Expr> {
        let lhs = self.parse_or_expr()?;
        let op = match self.peek_kind() {
            TokenKind::Assign => AssignOp::Assign,
            TokenKind::PlusEq => AssignOp::AddAssign,
            TokenKind::MinusEq => AssignOp::SubAssign,
            _ => return Ok(lhs),
        };
        self.advance();
        let value = self.parse_assign_expr()?;
        let span = lhs.span.to(value.span);
        Ok(Expr::new(
            ExprKind::Assign {
                op,
                target: Box::new(lhs),
                value: Box::new(value),
            },
            span,
        ))
    }

    fn parse_or_expr(&mut self) -> ParseResult<Expr> {
        let mut lhs = self.parse_and_expr()?;
        while self.eat(&TokenKind::OrOr) {
            let rhs = self.parse_and_expr()?;
            lhs = binary(BinOp::Or, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_and_expr(&mut self) -> ParseResult<Expr> {
        let mut lhs = self.parse_equality_expr()?;
        while self.eat(&TokenKind::AndAnd) {
            let rhs = self.parse_equality_expr()?;
            lhs = binary(BinOp::And, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_equality_expr(&mut self) -> ParseResult<Expr> {
        let mut lhs = self.parse_comparison_expr()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::EqEq => BinOp::Eq,
                TokenKind::NotEq => BinOp::Ne,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.parse_comparison_expr()?;
            lhs = binary(op, lhs, rhs);
        }
    }

    fn parse_comparison_expr(&mut self) -> ParseResult<Expr> {
        let mut lhs = self.parse_shift_expr()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Lt => BinOp::Lt,
                TokenKind::LtEq => BinOp::Le,
                TokenKind::Gt => BinOp::Gt,
                TokenKind::GtEq => BinOp::Ge,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.parse_shift_expr()?;
            lhs = binary(op, lhs, rhs);
        }
    }

    fn parse_shift_expr(&mut self) -> ParseResult<Expr> {
        let mut lhs = self.parse_term_expr()?;
        while self.eat(&TokenKind::Shl) {
            let rhs = self.parse_term_expr()?;
            lhs = binary(BinOp::Shl, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_term_expr(&mut self) -> ParseResult<Expr> {
        let mut lhs = self.parse_factor_expr()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Sub,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.parse_factor_expr()?;
            lhs = binary(op, lhs, rhs);
        }
    }

    fn parse_factor_expr(&mut self) -> ParseResult<Expr> {
        let mut lhs = self.parse_unary_expr()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Star => BinOp::Mul,
                TokenKind::Slash => BinOp::Div,
                TokenKind::Percent => BinOp::Rem,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.parse_unary_expr()?;
            lhs = binary(op, lhs, rhs);
        }
    }

    fn parse_unary_expr(&mut self) -> ParseResult<Expr> {
        let span = self.peek_span();
        let op = match self.peek_kind() {
            TokenKind::Minus => Some(UnaryOp::Neg),
            TokenKind::Not => Some(UnaryOp::Not),
            TokenKind::Star => Some(UnaryOp::Deref),
            TokenKind::Amp => Some(UnaryOp::AddrOf),
            TokenKind::PlusPlus | TokenKind::MinusMinus => {
                let op = if self.check(&TokenKind::PlusPlus) {
                    IncDecOp::Inc
                } else {
                    IncDecOp::Dec
                };
                self.advance();
                let expr = self.parse_unary_expr()?;
                let full = span.to(expr.span);
                return Ok(Expr::new(
                    ExprKind::IncDec {
                        op,
                        prefix: true,
                        expr: Box::new(expr),
                    },
                    full,
                ));
            }
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let expr = self.parse_unary_expr()?;
            let full = span.to(expr.span);
            return Ok(Expr::new(
                ExprKind::Unary {
                    op,
                    expr: Box::new(expr),
                },
                full,
            ));
        }
        self.parse_postfix_expr()
    }

    fn parse_postfix_expr(&mut self) -> ParseResult<Expr> {
        let mut expr = self.parse_primary_expr()?;
        loop {
            match self.peek_kind() {
                TokenKind::Dot | TokenKind::Arrow => {
                    let arrow = self.check(&TokenKind::Arrow);
                    self.advance();
                    let field = self.expect_ident()?;
                    if self.check(&TokenKind::LParen) {
                        let args = self.parse_paren_args()?;
                        let span = expr.span.to(self.prev_span());
                        expr = Expr::new(
                            ExprKind::MethodCall {
                                recv: Box::new(expr),
                                method: field,
                                args,
                                arrow,
                            },
                            span,
                        );
                    } else {
                        let span = expr.span.to(self.prev_span());
                        expr = Expr::new(
                            ExprKind::Member {
                                obj: Box::new(expr),
                                field,
                                arrow,
                            },
                            span,
                        );
                    }
                }
                TokenKind::LBracket => {
                    self.advance();
                    let index = self.parse_expr()?;
                    self.expect(&TokenKind::RBracket)?;
                    let span = expr.span.to(self.prev_span());
                    expr = Expr::new(
                        ExprKind::Index {
                            obj: Box::new(expr),
                            index: Box::new(index),
                        },
                        span,
                    );
                }
                TokenKind::LParen => {
                    let ExprKind::Ident(callee) = expr.kind.clone() else {
                        return Err(ParseError::new(
                            "only named functions can be called",
                            self.peek_span(),
                        ));
                    };
                    let args = self.parse_paren_args()?;
                    let span = expr.span.to(self.prev_span());
                    expr = Expr::new(
                        ExprKind::Call {
                            callee,
                            template_args: Vec::new(),
                            args,
                        },
                        span,
                    );
                }
                TokenKind::PlusPlus | TokenKind::MinusMinus => {
                    let op = if self.check(&TokenKind::PlusPlus) {
                        IncDecOp::Inc
                    } else {
                        IncDecOp::Dec
                    };
                    let end = self.peek_span();
                    self.advance();
                    let span = expr.span.to(end);
                    expr = Expr::new(
                        ExprKind::IncDec {
                            op,
                            prefix: false,
                            expr: Box::new(expr),
                        },
                        span,
                    );
                }
                _ => return Ok(expr),
            }
        }
    }

    fn parse_primary_expr(&mut self) -> ParseResult<Expr> {
        let span = self.peek_span();
        match self.peek_kind().clone() {
            TokenKind::Int(value) => {
                self.advance();
                Ok(Expr::new(ExprKind::IntLit(value), span))
            }
            TokenKind::Str(value) => {
                self.advance();
                Ok(Expr::new(ExprKind::StrLit(value), span))
            }
            TokenKind::KwTrue => {
                self.advance();
                Ok(Expr::new(ExprKind::BoolLit(true), span))
            }
            TokenKind::KwFalse => {
                self.advance();
                Ok(Expr::new(ExprKind::BoolLit(false), span))
            }
            TokenKind::KwNullptr => {
                self.advance();
                Ok(Expr::new(ExprKind::NullPtr, span))
            }
            TokenKind::LParen => {
                self.advance();
                let expr = self.parse_expr()?;
                self.expect(&TokenKind::RParen)?;
                Ok(expr)
            }
            TokenKind::Ident(_) => self.parse_name_expr(span),
            other => Err(ParseError::new(
                format!("expected expression, found {}", other.describe()),
                span,
            )),
        }
    }

    /// Parse an identifier-headed expression: plain/qualified names plus the
    /// recognized builtins (`std::move`, `std::make_unique`, `static_cast`)
    /// and calls with explicit template arguments.
    fn parse_name_expr(&mut self, span: Span) -> ParseResult<Expr> {
        let name = self.parse_qualified_name()?;
        if REJECTED_KEYWORDS.contains(&name.as_str()) {
            return Err(ParseError::new(format!("`{name}` is not supported"), span));
        }
        match name.as_str() {
            "std::move" => {
                self.expect(&TokenKind::LParen)?;
                let inner = self.parse_expr()?;
                self.expect(&TokenKind::RParen)?;
                Ok(Expr::new(
                    ExprKind::Move(Box::new(inner)),
                    span.to(self.prev_span()),
                ))
            }
            "std::make_unique" => {
                self.expect(&TokenKind::Lt)?;
                let ty = self.parse_type()?;
                self.expect_template_close()?;
                let args = self.parse_paren_args()?;
                Ok(Expr::new(
                    ExprKind::MakeUnique { ty, args },
                    span.to(self.prev_span()),
                ))
            }
            "static_cast" => {
                self.expect(&TokenKind::Lt)?;
                let ty = self.parse_type()?;
                self.expect_template_close()?;
                self.expect(&TokenKind::LParen)?;
                let inner = self.parse_expr()?;
                self.expect(&TokenKind::RParen)?;
                Ok(Expr::new(
                    ExprKind::StaticCast {
                        ty,
                        expr: Box::new(inner),
                    },
                    span.to(self.prev_span()),
                ))
            }
            _ => {
                // `name<args...>(...)` — explicit template arguments. A bare
                // `name <` is more likely a comparison, so backtrack freely.
                if self.check(&TokenKind::Lt) {
                    let saved = self.pos;
                    self.advance();
                    if let Ok(template_args) = self.parse_template_args() {
                        if self.check(&TokenKind::LParen) {
                            let args = self.parse_paren_args()?;
                            return Ok(Expr::new(
                                ExprKind::Call {
                                    callee: name,
                                    template_args,
                                    args,
                                },
                                span.to(self.prev_span()),
                            ));
                        }
                    }
                    self.pos = saved;
                }
                Ok(Expr::new(ExprKind::Ident(name), span))
            }
        }
    }

    fn parse_qualified_name(&mut self) -> ParseResult<Identifier> {
        let mut name = self.expect_ident()?;
        while self.eat(&TokenKind::ColonColon) {
            name.push_str("::");
            name.push_str(&self.expect_ident()?);
        }
        Ok(name)
    }

    fn parse_paren_args(&mut self) -> ParseResult<Vec<Expr>> {
        self.expect(&TokenKind::LParen)?;
        let args = self.parse_expr_list(&TokenKind::RParen)?;
        self.expect(&TokenKind::RParen)?;
        Ok(args)
    }

    fn parse_expr_list(&mut self, terminator: &TokenKind) -> ParseResult<Vec<Expr>> {
        let mut args = Vec::new();
        if !self.check(terminator) {
            loop {
                args.push(self.parse_expr()?);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }
        Ok(args)
    }

    // -------------------------------------------------------------------------
    // Token helpers
    // -------------------------------------------------------------------------

    fn peek_kind(&self) -> &TokenKind {
        &self.tokens[self.pos].kind
    }

    fn peek_kind_at(&self, offset: usize) -> &TokenKind {
        let idx = (self.pos + offset).min(self.tokens.len() - 1);
        &self.tokens[idx].kind
    }

    fn peek_span(&self) -> Span {
        self.tokens[self.pos].span
    }

    fn prev_span(&self) -> Span {
        self.tokens[self.pos.saturating_sub(1)].span
    }

    fn check(&self, kind: &TokenKind) -> bool {
        self.peek_kind() == kind
    }

    fn advance(&mut self) {
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind) -> ParseResult<()> {
        if self.eat(kind) {
            Ok(())
        } else {
            Err(ParseError::new(
                format!(
                    "expected {}, found {}",
                    kind.describe(),
                    self.peek_kind().describe()
                ),
                self.peek_span(),
            ))
        }
    }

    fn expect_ident(&mut self) -> ParseResult<Identifier> {
        match self.peek_kind().clone() {
            TokenKind::Ident(name) => {
                self.advance();
                Ok(name)
            }
            other => Err(ParseError::new(
                format!("expected identifier, found {}", other.describe()),
                self.peek_span(),
            )),
        }
    }
}

fn binary(op: BinOp, lhs: Expr, rhs: Expr) -> Expr {
    let span = lhs.span.to(rhs.span);
    Expr::new(
        ExprKind::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        },
        span,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> (Vec<Include>, Vec<Item>) {
        Parser::parse_source(source).expect("parse failure")
    }

    fn parse_err(source: &str) -> ParseError {
        Parser::parse_source(source).expect_err("expected parse failure")
    }

    #[test]
    fn parses_constexpr_template_function() {
        let (_, items) = parse(
            "template<typename T>\nconstexpr T fibonacci(T n) {\n    if (n <= 1) return n;\n    return fibonacci(n - 1) + fibonacci(n - 2);\n}\n",
        );
        assert_eq!(items.len(), 1);
        let Item::Function(func) = &items[0] else {
            panic!("expected function");
        };
        assert_eq!(func.name, "fibonacci");
        assert!(func.is_constexpr);
        assert_eq!(func.template_params.len(), 1);
        assert_eq!(func.body.stmts.len(), 2);
    }

    #[test]
    fn parses_class_with_ctor_dtor_and_default_param() {
        let source = r#"
class Greeter {
private:
    std::string name;

public:
    Greeter(const std::string& n) : name(n) {
        std::cout << "created" << std::endl;
    }

    ~Greeter() {
        std::cout << "destroyed" << std::endl;
    }

    void farewell(const std::string& message = "Goodbye") const {
        std::cout << message << std::endl;
    }
};
"#;
        let (_, items) = parse(source);
        let Item::Class(class) = &items[0] else {
            panic!("expected class");
        };
        assert_eq!(class.name, "Greeter");
        assert_eq!(class.fields.len(), 1);
        assert_eq!(class.ctors.len(), 1);
        assert!(class.dtor.is_some());
        assert_eq!(class.methods.len(), 1);
        assert!(class.methods[0].is_const);
        assert!(class.methods[0].params[0].default.is_some());
        assert_eq!(class.ctors[0].inits[0].member, "name");
    }

    #[test]
    fn splits_double_close_angle() {
        let source = "template<typename T>\nstruct Node {\n    T data;\n    std::unique_ptr<Node<T>> next;\n    Node(const T& value) : data(value), next(nullptr) {}\n};\n";
        let (_, items) = parse(source);
        let Item::Class(class) = &items[0] else {
            panic!("expected class");
        };
        let TypeExpr::UniquePtr(inner) = &class.fields[1].ty else {
            panic!("expected unique_ptr field, got {:?}", class.fields[1].ty);
        };
        assert_eq!(
            **inner,
            TypeExpr::Instantiation(
                "Node".to_string(),
                vec![TemplateArg::Type(TypeExpr::Named("T".to_string()))]
            )
        );
    }

    #[test]
    fn parses_decl_vs_expr_statements() {
        let source = "void f() {\n    Node<int>* current = head.get();\n    current = current->next.get();\n    list.pushBack(1);\n}\n";
        let (_, items) = parse(source);
        let Item::Function(func) = &items[0] else {
            panic!("expected function");
        };
        assert!(matches!(func.body.stmts[0], Stmt::Decl(_)));
        assert!(matches!(func.body.stmts[1], Stmt::Expr(_)));
        assert!(matches!(func.body.stmts[2], Stmt::Expr(_)));
    }

    #[test]
    fn parses_range_for_and_classic_for() {
        let source = "void f() {\n    for (const auto& num : seq) {\n        std::cout << num;\n    }\n    for (int i = 0; i < 10; ++i) {\n        total += i;\n    }\n}\n";
        let (_, items) = parse(source);
        let Item::Function(func) = &items[0] else {
            panic!("expected function");
        };
        assert!(matches!(func.body.stmts[0], Stmt::RangeFor { .. }));
        assert!(matches!(func.body.stmts[1], Stmt::For { .. }));
    }

    #[test]
    fn parses_output_chain_as_shl_tree() {
        let source = "void f() {\n    std::cout << \"x = \" << x << std::endl;\n}\n";
        let (_, items) = parse(source);
        let Item::Function(func) = &items[0] else {
            panic!("expected function");
        };
        let Stmt::Expr(expr) = &func.body.stmts[0] else {
            panic!("expected expression statement");
        };
        assert!(matches!(
            expr.kind,
            ExprKind::Binary {
                op: BinOp::Shl,
                ..
            }
        ));
    }

    #[test]
    fn parses_move_and_make_unique() {
        let source =
            "void f() {\n    auto n = std::make_unique<Node<int>>(5);\n    n->next = std::move(head);\n}\n";
        let (_, items) = parse(source);
        let Item::Function(func) = &items[0] else {
            panic!("expected function");
        };
        let Stmt::Decl(decl) = &func.body.stmts[0] else {
            panic!("expected declaration");
        };
        assert!(matches!(
            decl.init,
            VarInit::Assign(Expr {
                kind: ExprKind::MakeUnique { .. },
                ..
            })
        ));
    }

    #[test]
    fn rejects_unsupported_header() {
        let err = parse_err("#include <vector>\n");
        assert!(err.message.contains("vector"));
    }

    #[test]
    fn rejects_virtual() {
        let err = parse_err("class A {\npublic:\n    virtual void f() {}\n};\n");
        assert!(err.message.contains("not supported"));
    }

    #[test]
    fn reports_expected_token() {
        let err = parse_err("int main() {\n    return 0\n}\n");
        assert!(err.message.contains("expected `;`"), "{}", err.message);
    }
}
