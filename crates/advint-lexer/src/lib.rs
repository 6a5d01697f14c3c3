//! advint-lexer : analyse lexicale du langage advint
//!
//! Points clés :
//! - `Lexer` + `LexerOptions` : commentaires `//` et `/* */` (imbriqués en option),
//!   identifiants/mots-clés, entiers décimaux, chaînes avec échappements
//! - `LineMap` pour retrouver `(ligne, colonne)`
//! - `LexError` avec spans précis
//!
//! Exemple rapide :
//! ```
//! use advint_core::SourceId;
//! use advint_lexer::{Lexer, TokenKind};
//!
//! let toks = Lexer::new("int main() { return 1 + 2; }", SourceId(0)).tokenize().unwrap();
//! assert!(matches!(toks.last().map(|t| &t.value), Some(TokenKind::Eof)));
//! ```

#![deny(missing_docs)]

use advint_core::{Pos, SourceId, Span, Spanned};
use thiserror::Error;

/* ─────────────────────────── Options & LineMap ─────────────────────────── */

/// Options du lexer.
#[derive(Debug, Clone, Copy)]
pub struct LexerOptions {
    /// Autorise les commentaires bloc imbriqués `/* ... /* .. */ ... */`.
    pub nested_block_comments: bool,
}

impl Default for LexerOptions {
    fn default() -> Self { Self { nested_block_comments: true } }
}

/// Table de lignes : offset en octets → `(ligne, colonne)`.
#[derive(Debug, Clone)]
pub struct LineMap {
    /// Offsets des débuts de ligne (contient toujours 0).
    pub line_starts: Vec<u32>,
}

impl LineMap {
    /// Construit la table pour `src`.
    pub fn new(src: &str) -> Self {
        let mut ls = Vec::with_capacity(64);
        ls.push(0);
        for (i, b) in src.bytes().enumerate() {
            if b == b'\n' {
                ls.push(to_u32(i + 1));
            }
        }
        Self { line_starts: ls }
    }

    /// `(ligne, colonne)` d'une position, base 1.
    pub fn line_col(&self, pos: Pos) -> (u32, u32) {
        let off = pos.0;
        let idx = match self.line_starts.binary_search(&off) {
            Ok(i) => i,
            Err(i) => i.saturating_sub(1),
        };
        let line_start = self.line_starts[idx];
        (to_u32(idx + 1), off.saturating_sub(line_start) + 1)
    }

    /// Ligne d'une position, base 1.
    pub fn line(&self, pos: Pos) -> u32 { self.line_col(pos).0 }
}

/* ─────────────────────────── Tokens ─────────────────────────── */

/// Mots réservés.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    /// `int`
    Int,
    /// `void`
    Void,
    /// `if`
    If,
    /// `else`
    Else,
    /// `while`
    While,
    /// `return`
    Return,
    /// `print`
    Print,
}

/// Types de tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind<'a> {
    /// Fin d'entrée.
    Eof,
    /// Identifiant.
    Ident(&'a str),
    /// Mot-clé.
    Kw(Keyword),
    /// Entier décimal, tel qu'écrit (tient dans un `i64`).
    Int(&'a str),
    /// Chaîne littérale (échappements décodés).
    Str(String),
    /// `(`
    LParen,
    /// `)`
    RParen,
    /// `{`
    LBrace,
    /// `}`
    RBrace,
    /// `,`
    Comma,
    /// `;`
    Semi,
    /// `+`
    Plus,
    /// `++`
    PlusPlus,
    /// `-`
    Minus,
    /// `--`
    MinusMinus,
    /// `*`
    Star,
    /// `/`
    Slash,
    /// `%`
    Percent,
    /// `=`
    Eq,
    /// `==`
    EqEq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `&&`
    AndAnd,
    /// `||`
    OrOr,
    /// `!`
    Bang,
}

/// Token avec son span.
pub type Token<'a> = Spanned<TokenKind<'a>>;

/* ─────────────────────────── Erreurs ─────────────────────────── */

/// Type d'erreur lexicale.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LexErrorKind {
    /// Caractère inattendu.
    #[error("unexpected character: {0:?}")]
    UnexpectedChar(char),
    /// Commentaire bloc jamais fermé.
    #[error("unterminated block comment")]
    UnterminatedBlockComment,
    /// Chaîne jamais fermée.
    #[error("unterminated string literal")]
    UnterminatedString,
    /// Séquence d'échappement inconnue.
    #[error("invalid escape sequence")]
    InvalidEscape,
    /// Entier plus grand que `i64::MAX`.
    #[error("integer literal overflows i64")]
    IntOverflow,
}

/// Erreur lexicale avec sa position.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}")]
pub struct LexError {
    /// Position.
    pub span: Span,
    /// Ce qui a échoué.
    pub kind: LexErrorKind,
}

/* ─────────────────────────── Lexer ─────────────────────────── */

/// Lexer itératif.
pub struct Lexer<'a> {
    src: &'a str,
    bytes: &'a [u8],
    off: usize,
    source: SourceId,
    opts: LexerOptions,
    /// Table de lignes (exposée pour les diagnostics).
    pub lines: LineMap,
}

impl<'a> Lexer<'a> {
    /// Lexer avec options par défaut.
    pub fn new(src: &'a str, source: SourceId) -> Self { Self::with_options(src, source, LexerOptions::default()) }

    /// Lexer avec options explicites.
    pub fn with_options(src: &'a str, source: SourceId, opts: LexerOptions) -> Self {
        Self { src, bytes: src.as_bytes(), off: 0, source, opts, lines: LineMap::new(src) }
    }

    /// Token suivant ; `Eof` une fois l'entrée épuisée.
    pub fn next_token(&mut self) -> Result<Token<'a>, LexError> {
        self.skip_ws_and_comments()?;
        let start = self.off;
        let Some(c) = self.bump_char() else {
            return Ok(Spanned::new(TokenKind::Eof, self.span_from(start)));
        };

        let kind = match c {
            ch if is_ident_start(ch) => {
                self.consume_while(|b| is_ident_continue(b as char));
                let s = &self.src[start..self.off];
                keyword_of(s).map_or(TokenKind::Ident(s), TokenKind::Kw)
            }
            ch if ch.is_ascii_digit() => {
                self.consume_while(|b| b.is_ascii_digit());
                let s = &self.src[start..self.off];
                if s.parse::<i64>().is_err() {
                    return Err(self.err_from(start, LexErrorKind::IntOverflow));
                }
                TokenKind::Int(s)
            }
            '"' => TokenKind::Str(self.lex_string(start)?),

            '+' => if self.eat('+') { TokenKind::PlusPlus } else { TokenKind::Plus },
            '-' => if self.eat('-') { TokenKind::MinusMinus } else { TokenKind::Minus },
            '=' => if self.eat('=') { TokenKind::EqEq } else { TokenKind::Eq },
            '!' => if self.eat('=') { TokenKind::Ne } else { TokenKind::Bang },
            '<' => if self.eat('=') { TokenKind::Le } else { TokenKind::Lt },
            '>' => if self.eat('=') { TokenKind::Ge } else { TokenKind::Gt },
            '&' => if self.eat('&') { TokenKind::AndAnd } else { return Err(self.err_from(start, LexErrorKind::UnexpectedChar('&'))); },
            '|' => if self.eat('|') { TokenKind::OrOr } else { return Err(self.err_from(start, LexErrorKind::UnexpectedChar('|'))); },

            '*' => TokenKind::Star,
            '/' => TokenKind::Slash,
            '%' => TokenKind::Percent,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            ',' => TokenKind::Comma,
            ';' => TokenKind::Semi,

            other => return Err(self.err_from(start, LexErrorKind::UnexpectedChar(other))),
        };

        Ok(Spanned::new(kind, self.span_from(start)))
    }

    /// Tokenise toute la source (termine par `Eof`).
    pub fn tokenize(mut self) -> Result<Vec<Token<'a>>, LexError> {
        let mut out = Vec::new();
        loop {
            let t = self.next_token()?;
            let is_eof = matches!(t.value, TokenKind::Eof);
            out.push(t);
            if is_eof {
                break;
            }
        }
        Ok(out)
    }

    /* ────────── Primitives internes ────────── */

    #[inline] fn peek(&self) -> Option<u8> { self.bytes.get(self.off).copied() }
    #[inline] fn peek2(&self) -> Option<u8> { self.bytes.get(self.off + 1).copied() }
    #[inline] fn eat(&mut self, ch: char) -> bool { if self.peek() == Some(ch as u8) { self.off += 1; true } else { false } }

    fn bump_char(&mut self) -> Option<char> {
        let c = self.src[self.off..].chars().next()?;
        self.off += c.len_utf8();
        Some(c)
    }

    fn consume_while(&mut self, mut p: impl FnMut(u8) -> bool) {
        while let Some(b) = self.peek() {
            if p(b) { self.off += 1; } else { break; }
        }
    }

    fn skip_ws_and_comments(&mut self) -> Result<(), LexError> {
        loop {
            self.consume_while(|b| b.is_ascii_whitespace());
            match (self.peek(), self.peek2()) {
                (Some(b'/'), Some(b'/')) => {
                    self.consume_while(|b| b != b'\n');
                }
                (Some(b'/'), Some(b'*')) => {
                    let start = self.off;
                    self.off += 2;
                    let mut depth = 1u32;
                    while depth > 0 {
                        match (self.peek(), self.peek2()) {
                            (None, _) => return Err(self.err_from(start, LexErrorKind::UnterminatedBlockComment)),
                            (Some(b'/'), Some(b'*')) if self.opts.nested_block_comments => {
                                self.off += 2;
                                depth += 1;
                            }
                            (Some(b'*'), Some(b'/')) => {
                                self.off += 2;
                                depth -= 1;
                            }
                            _ => self.off += 1,
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn lex_string(&mut self, start_quote: usize) -> Result<String, LexError> {
        let mut out = String::new();
        loop {
            let c = self.bump_char().ok_or_else(|| self.err_from(start_quote, LexErrorKind::UnterminatedString))?;
            match c {
                '"' => break,
                '\n' => return Err(self.err_from(start_quote, LexErrorKind::UnterminatedString)),
                '\\' => {
                    let esc_at = self.off - 1;
                    let esc = self.bump_char().ok_or_else(|| self.err_from(start_quote, LexErrorKind::UnterminatedString))?;
                    out.push(match esc {
                        '"' => '"',
                        '\\' => '\\',
                        'n' => '\n',
                        'r' => '\r',
                        't' => '\t',
                        '0' => '\0',
                        _ => return Err(self.err_from(esc_at, LexErrorKind::InvalidEscape)),
                    });
                }
                other => out.push(other),
            }
        }
        Ok(out)
    }

    /* ────────── Spans / erreurs ────────── */

    #[inline] fn span_from(&self, start: usize) -> Span {
        Span::new(self.source, Pos(to_u32(start)), Pos(to_u32(self.off)))
    }
    #[inline] fn err_from(&self, start: usize, kind: LexErrorKind) -> LexError { LexError { span: self.span_from(start), kind } }
}

/* ─────────────────────────── Aides ─────────────────────────── */

#[inline]
fn to_u32(v: usize) -> u32 { u32::try_from(v).unwrap_or(u32::MAX) }

#[inline]
const fn is_ident_start(c: char) -> bool { c == '_' || c.is_ascii_alphabetic() }

#[inline]
const fn is_ident_continue(c: char) -> bool { c == '_' || c.is_ascii_alphanumeric() }

#[inline]
fn keyword_of(s: &str) -> Option<Keyword> {
    use Keyword::{Else, If, Int, Print, Return, Void, While};
    Some(match s {
        "int" => Int,
        "void" => Void,
        "if" => If,
        "else" => Else,
        "while" => While,
        "return" => Return,
        "print" => Print,
        _ => return None,
    })
}

/* ─────────────────────────── Tests ─────────────────────────── */
