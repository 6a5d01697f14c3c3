//! advint-parser : reconnaisseur du langage advint
//!
//! Le parser ne construit rien : chaque production reconnue est réduite via une
//! implémentation d'[`Actions`] (le compilateur, ou un enregistreur de test).
//!
//! Grammaire :
//! ```text
//! program     := function*
//! function    := type IDENT "(" params? ")" ( ";" | "{" block_item* "}" )
//! params      := "int" IDENT ("," "int" IDENT)*
//! type        := "int" | "void"
//! block_item  := declaration | statement
//! declaration := type declarator ("," declarator)* ";"
//! declarator  := IDENT ("=" expr)?
//! statement   := "{" block_item* "}"
//!              | "if" "(" expr ")" statement ("else" statement)?
//!              | "while" "(" expr ")" statement
//!              | "return" expr? ";"
//!              | "print" (STRING | expr) ";"
//!              | expr? ";"
//! expr        := IDENT "=" expr | binary
//! binary      := pratt over || && == != < <= > >= + - * / %
//! unary       := ("-" | "!" | "++" | "--") unary | postfix
//! postfix     := primary ("++" | "--")*
//! primary     := INT | IDENT | IDENT "(" (expr ("," expr)*)? ")" | "(" expr ")"
//! ```

#![deny(missing_docs)]

use core::fmt;

use advint_core::{SourceId, Span};
use advint_lexer::{Keyword, LexError, Lexer, LexerOptions, LineMap, Token, TokenKind};
use thiserror::Error;

/// Actions de grammaire et vocabulaire des opérateurs.
pub mod actions;

pub use actions::{Actions, BinaryOp, Param, TypeName, UnaryOp};

/* ─────────────────────────── Positions & erreurs ─────────────────────────── */

/// Ligne/colonne d'un token, base 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Loc {
    /// Ligne.
    pub line: u32,
    /// Colonne.
    pub column: u32,
}

impl Loc {
    /// Construit une position.
    pub const fn new(line: u32, column: u32) -> Self { Self { line, column } }
}

impl fmt::Display for Loc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}:{}", self.line, self.column) }
}

/// Erreur lexicale ou syntaxique.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{loc}: {message}")]
pub struct SyntaxError {
    /// Où.
    pub loc: Loc,
    /// Message lisible.
    pub message: String,
}

impl SyntaxError {
    fn new(loc: Loc, message: impl Into<String>) -> Self { Self { loc, message: message.into() } }

    fn from_lex(lines: &LineMap, e: &LexError) -> Self {
        let (line, column) = lines.line_col(e.span.start);
        Self::new(Loc::new(line, column), e.kind.to_string())
    }
}

/* ─────────────────────────── Points d'entrée ─────────────────────────── */

/// Parse une unité complète en la réduisant via `actions`.
pub fn parse<A: Actions>(src: &str, actions: &mut A) -> Result<(), A::Error> {
    Parser::new(src, SourceId(0), actions)?.parse_program()
}

/// Parser à descente récursive sur un vecteur de tokens.
pub struct Parser<'a, 'c, A: Actions> {
    toks: Vec<Token<'a>>,
    pos: usize,
    lines: LineMap,
    actions: &'c mut A,
}

impl<'a, 'c, A: Actions> Parser<'a, 'c, A> {
    /// Tokenise `src` ; les erreurs lexicales remontent tout de suite.
    pub fn new(src: &'a str, source: SourceId, actions: &'c mut A) -> Result<Self, A::Error> {
        let lexer = Lexer::with_options(src, source, LexerOptions::default());
        let lines = lexer.lines.clone();
        let toks = lexer.tokenize().map_err(|e| SyntaxError::from_lex(&lines, &e))?;
        Ok(Self { toks, pos: 0, lines, actions })
    }

    /// Parse chaque fonction, puis réduit l'unité.
    pub fn parse_program(&mut self) -> Result<(), A::Error> {
        while !self.check(&TokenKind::Eof) {
            self.parse_function()?;
        }
        let at = self.loc();
        self.actions.translation_unit(at)
    }

    /* ─────────── Fonctions ─────────── */

    fn parse_function(&mut self) -> Result<(), A::Error> {
        let at = self.loc();
        let ret = self.expect_type()?;
        let name = self.expect_ident()?;
        self.expect(&TokenKind::LParen)?;
        let mut params = Vec::new();
        if !self.check(&TokenKind::RParen) {
            loop {
                let ty = self.expect_type()?;
                let loc = self.loc();
                params.push(Param { ty, name: self.expect_ident()?, loc });
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RParen)?;
        self.actions.function_header(at, ret, name, &params)?;

        if self.eat(&TokenKind::Semi) {
            return self.actions.function_prototype(at);
        }
        self.expect(&TokenKind::LBrace)?;
        let items = self.parse_block_items()?;
        let end = self.loc();
        self.expect(&TokenKind::RBrace)?;
        self.actions.function_body(end, items)
    }

    /* ─────────── Instructions ─────────── */

    fn parse_block_items(&mut self) -> Result<Vec<A::Stmt>, A::Error> {
        let mut items = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.check(&TokenKind::Eof) {
            let item = if self.check_type() { self.parse_declaration()? } else { self.parse_statement()? };
            items.push(item);
        }
        Ok(items)
    }

    fn parse_declaration(&mut self) -> Result<A::Stmt, A::Error> {
        let at = self.loc();
        let ty = self.expect_type()?;
        let mut decls = Vec::new();
        loop {
            let loc = self.loc();
            let name = self.expect_ident()?;
            let init = if self.eat(&TokenKind::Eq) { Some(self.parse_expr()?) } else { None };
            decls.push(self.actions.declarator(loc, ty, name, init)?);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::Semi)?;
        self.actions.declaration(at, decls)
    }

    fn parse_statement(&mut self) -> Result<A::Stmt, A::Error> {
        let at = self.loc();
        match self.peek().clone() {
            TokenKind::LBrace => {
                self.bump();
                self.actions.enter_block(at)?;
                let items = self.parse_block_items()?;
                let end = self.loc();
                self.expect(&TokenKind::RBrace)?;
                self.actions.exit_block(end, items)
            }
            TokenKind::Kw(Keyword::If) => {
                self.bump();
                let cond = self.parse_condition()?;
                let then_branch = self.parse_statement()?;
                let else_branch = if self.eat_kw(Keyword::Else) { Some(self.parse_statement()?) } else { None };
                self.actions.if_statement(at, cond, then_branch, else_branch)
            }
            TokenKind::Kw(Keyword::While) => {
                self.bump();
                let cond = self.parse_condition()?;
                let body = self.parse_statement()?;
                self.actions.while_statement(at, cond, body)
            }
            TokenKind::Kw(Keyword::Return) => {
                self.bump();
                let value = if self.check(&TokenKind::Semi) { None } else { Some(self.parse_expr()?) };
                self.expect(&TokenKind::Semi)?;
                self.actions.return_statement(at, value)
            }
            TokenKind::Kw(Keyword::Print) => {
                self.bump();
                let stmt = if let TokenKind::Str(text) = self.peek().clone() {
                    self.bump();
                    self.actions.print_text(at, &text)?
                } else {
                    let value = self.parse_expr()?;
                    self.actions.print_value(at, value)?
                };
                self.expect(&TokenKind::Semi)?;
                Ok(stmt)
            }
            TokenKind::Semi => {
                self.bump();
                self.actions.empty_statement(at)
            }
            TokenKind::Kw(Keyword::Int | Keyword::Void) => {
                Err(self.error("declarations are only allowed directly inside a block").into())
            }
            _ => {
                let expr = self.parse_expr()?;
                self.expect(&TokenKind::Semi)?;
                self.actions.expression_statement(at, expr)
            }
        }
    }

    fn parse_condition(&mut self) -> Result<A::Expr, A::Error> {
        self.expect(&TokenKind::LParen)?;
        let cond = self.parse_expr()?;
        self.expect(&TokenKind::RParen)?;
        Ok(cond)
    }

    /* ─────────── Expressions (Pratt) ─────────── */

    fn parse_expr(&mut self) -> Result<A::Expr, A::Error> {
        let assigns = matches!(self.peek_at(1), Some(TokenKind::Eq));
        if let (true, &TokenKind::Ident(name)) = (assigns, self.peek()) {
            let at = self.loc();
            self.bump();
            self.bump();
            let value = self.parse_expr()?;
            return self.actions.assignment(at, name, value);
        }
        self.parse_prec(0)
    }

    fn parse_prec(&mut self, min_bp: u8) -> Result<A::Expr, A::Error> {
        let mut lhs = self.parse_unary()?;
        loop {
            let Some(op) = binary_op(self.peek()) else { break };
            let (lbp, rbp) = precedence(op);
            if lbp < min_bp {
                break;
            }
            let at = self.loc();
            self.bump();
            let rhs = self.parse_prec(rbp)?;
            lhs = self.actions.binary(at, op, lhs, rhs)?;
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<A::Expr, A::Error> {
        let at = self.loc();
        let op = match self.peek() {
            TokenKind::Minus => UnaryOp::Neg,
            TokenKind::Bang => UnaryOp::Not,
            TokenKind::PlusPlus => UnaryOp::PreInc,
            TokenKind::MinusMinus => UnaryOp::PreDec,
            _ => return self.parse_postfix(),
        };
        self.bump();
        let operand = self.parse_unary()?;
        self.actions.unary(at, op, operand)
    }

    fn parse_postfix(&mut self) -> Result<A::Expr, A::Error> {
        let mut e = self.parse_primary()?;
        loop {
            let at = self.loc();
            let op = match self.peek() {
                TokenKind::PlusPlus => UnaryOp::PostInc,
                TokenKind::MinusMinus => UnaryOp::PostDec,
                _ => break,
            };
            self.bump();
            e = self.actions.unary(at, op, e)?;
        }
        Ok(e)
    }

    fn parse_primary(&mut self) -> Result<A::Expr, A::Error> {
        let at = self.loc();
        match self.peek().clone() {
            TokenKind::Int(text) => {
                self.bump();
                self.actions.int_literal(at, text)
            }
            TokenKind::Ident(name) => {
                self.bump();
                if !self.eat(&TokenKind::LParen) {
                    return self.actions.variable(at, name);
                }
                let mut args = Vec::new();
                if !self.check(&TokenKind::RParen) {
                    loop {
                        args.push(self.parse_expr()?);
                        if !self.eat(&TokenKind::Comma) {
                            break;
                        }
                    }
                }
                self.expect(&TokenKind::RParen)?;
                self.actions.call(at, name, args)
            }
            TokenKind::LParen => {
                self.bump();
                let e = self.parse_expr()?;
                self.expect(&TokenKind::RParen)?;
                Ok(e)
            }
            TokenKind::Str(_) => Err(self.error("string literals are only allowed in print statements").into()),
            other => Err(self.error(format!("expected expression, found {}", describe(&other))).into()),
        }
    }

    /* ─────────── Utilitaires ─────────── */

    #[inline]
    fn peek(&self) -> &TokenKind<'a> { self.peek_at(0).unwrap_or(&TokenKind::Eof) }

    #[inline]
    fn peek_at(&self, n: usize) -> Option<&TokenKind<'a>> { self.toks.get(self.pos + n).map(|t| &t.value) }

    #[inline]
    fn bump(&mut self) {
        if self.pos + 1 < self.toks.len() {
            self.pos += 1;
        }
    }

    #[inline]
    fn check(&self, kind: &TokenKind<'_>) -> bool { self.peek() == kind }

    fn check_type(&self) -> bool { matches!(self.peek(), TokenKind::Kw(Keyword::Int | Keyword::Void)) }

    fn eat(&mut self, kind: &TokenKind<'_>) -> bool {
        let hit = self.check(kind);
        if hit {
            self.bump();
        }
        hit
    }

    fn eat_kw(&mut self, kw: Keyword) -> bool { self.eat(&TokenKind::Kw(kw)) }

    fn expect(&mut self, kind: &TokenKind<'_>) -> Result<(), SyntaxError> {
        if self.eat(kind) {
            return Ok(());
        }
        Err(self.error(format!("expected {}, found {}", describe(kind), describe(self.peek()))))
    }

    fn expect_ident(&mut self) -> Result<&'a str, SyntaxError> {
        if let TokenKind::Ident(s) = *self.peek() {
            self.bump();
            return Ok(s);
        }
        Err(self.error(format!("expected identifier, found {}", describe(self.peek()))))
    }

    fn expect_type(&mut self) -> Result<TypeName, SyntaxError> {
        let ty = match self.peek() {
            TokenKind::Kw(Keyword::Int) => TypeName::Int,
            TokenKind::Kw(Keyword::Void) => TypeName::Void,
            other => return Err(self.error(format!("expected type, found {}", describe(other)))),
        };
        self.bump();
        Ok(ty)
    }

    fn span(&self) -> Span { self.toks.get(self.pos).map(|t| t.span).unwrap_or_default() }

    fn loc(&self) -> Loc {
        let (line, column) = self.lines.line_col(self.span().start);
        Loc::new(line, column)
    }

    fn error(&self, message: impl Into<String>) -> SyntaxError { SyntaxError::new(self.loc(), message) }
}

/* ─────────────────────────── Opérateurs & aides ─────────────────────────── */

const fn binary_op(tok: &TokenKind<'_>) -> Option<BinaryOp> {
    Some(match tok {
        TokenKind::OrOr => BinaryOp::Or,
        TokenKind::AndAnd => BinaryOp::And,
        TokenKind::EqEq => BinaryOp::Eq,
        TokenKind::Ne => BinaryOp::Ne,
        TokenKind::Lt => BinaryOp::Lt,
        TokenKind::Le => BinaryOp::Le,
        TokenKind::Gt => BinaryOp::Gt,
        TokenKind::Ge => BinaryOp::Ge,
        TokenKind::Plus => BinaryOp::Add,
        TokenKind::Minus => BinaryOp::Sub,
        TokenKind::Star => BinaryOp::Mul,
        TokenKind::Slash => BinaryOp::Div,
        TokenKind::Percent => BinaryOp::Mod,
        _ => return None,
    })
}

// Puissances de liaison Pratt (associatives à gauche).
const fn precedence(op: BinaryOp) -> (u8, u8) {
    match op {
        BinaryOp::Or => (1, 2),
        BinaryOp::And => (3, 4),
        BinaryOp::Eq | BinaryOp::Ne => (5, 6),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => (7, 8),
        BinaryOp::Add | BinaryOp::Sub => (9, 10),
        BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => (11, 12),
    }
}

fn describe(tok: &TokenKind<'_>) -> String {
    match tok {
        TokenKind::Eof => "end of input".into(),
        TokenKind::Ident(s) => format!("identifier `{s}`"),
        TokenKind::Kw(kw) => format!("keyword `{}`", format!("{kw:?}").to_lowercase()),
        TokenKind::Int(s) => format!("integer `{s}`"),
        TokenKind::Str(_) => "string literal".into(),
        other => format!("`{}`", punct(other)),
    }
}

const fn punct(tok: &TokenKind<'_>) -> &'static str {
    match tok {
        TokenKind::LParen => "(",
        TokenKind::RParen => ")",
        TokenKind::LBrace => "{",
        TokenKind::RBrace => "}",
        TokenKind::Comma => ",",
        TokenKind::Semi => ";",
        TokenKind::PlusPlus => "++",
        TokenKind::MinusMinus => "--",
        TokenKind::Eq => "=",
        TokenKind::Bang => "!",
        other => match binary_op(other) {
            Some(op) => op.symbol(),
            None => "?",
        },
    }
}

/* ─────────────────────────── Tests ─────────────────────────── */
