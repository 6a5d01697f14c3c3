//! Actions de grammaire.
//!
//! Le parser ne fait que reconnaître les productions ; tout ce qu'il apprend est
//! remis à une implémentation d'[`Actions`], de bas en haut. Les valeurs d'une
//! action (`Expr`, `Stmt`, `Decl`) passent par valeur à une seule action parente.
//!
//! Les productions liées aux portées sont annoncées avant leurs enfants :
//! `enter_block` précède les éléments d'un `{ ... }`, `function_header` précède
//! le corps d'une fonction, et chaque `declarator` est réduit dès sa lecture
//! pour être visible des initialiseurs suivants.

use core::fmt;

use crate::{Loc, SyntaxError};

/// Opérateurs binaires, du moins au plus prioritaire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    /// `||`
    Or,
    /// `&&`
    And,
    /// `==`
    Eq,
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
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `%`
    Mod,
}

impl BinaryOp {
    /// Graphie source.
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Or => "||",
            Self::And => "&&",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Mod => "%",
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.symbol()) }
}

/// Opérateurs unaires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    /// `-x`
    Neg,
    /// `!x`
    Not,
    /// `++x`
    PreInc,
    /// `--x`
    PreDec,
    /// `x++`
    PostInc,
    /// `x--`
    PostDec,
}

impl UnaryOp {
    /// Graphie source.
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Neg => "-",
            Self::Not => "!",
            Self::PreInc | Self::PostInc => "++",
            Self::PreDec | Self::PostDec => "--",
        }
    }

    /// `+1` / `-1` pour incréments et décréments.
    pub const fn step(self) -> Option<i64> {
        match self {
            Self::PreInc | Self::PostInc => Some(1),
            Self::PreDec | Self::PostDec => Some(-1),
            Self::Neg | Self::Not => None,
        }
    }
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.symbol()) }
}

/// Noms de types acceptés par la grammaire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeName {
    /// `int`
    Int,
    /// `void`
    Void,
}

impl fmt::Display for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Int => "int",
            Self::Void => "void",
        })
    }
}

/// Paramètre de fonction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Param<'s> {
    /// Type déclaré.
    pub ty: TypeName,
    /// Nom.
    pub name: &'s str,
    /// Position du nom.
    pub loc: Loc,
}

/// Côté sémantique de la grammaire.
pub trait Actions {
    /// Expression réduite.
    type Expr;
    /// Instruction réduite.
    type Stmt;
    /// Déclarateur réduit.
    type Decl;
    /// Type d'erreur ; les erreurs de syntaxe y sont converties.
    type Error: From<SyntaxError>;

    /* ─────────── Expressions ─────────── */

    /// Entier littéral, tel qu'écrit.
    fn int_literal(&mut self, at: Loc, text: &str) -> Result<Self::Expr, Self::Error>;
    /// Référence de variable.
    fn variable(&mut self, at: Loc, name: &str) -> Result<Self::Expr, Self::Error>;
    /// `name = value`
    fn assignment(&mut self, at: Loc, name: &str, value: Self::Expr) -> Result<Self::Expr, Self::Error>;
    /// `lhs op rhs`
    fn binary(&mut self, at: Loc, op: BinaryOp, lhs: Self::Expr, rhs: Self::Expr) -> Result<Self::Expr, Self::Error>;
    /// Opérateur unaire préfixe ou postfixe.
    fn unary(&mut self, at: Loc, op: UnaryOp, operand: Self::Expr) -> Result<Self::Expr, Self::Error>;
    /// `name(args...)`
    fn call(&mut self, at: Loc, name: &str, args: Vec<Self::Expr>) -> Result<Self::Expr, Self::Error>;

    /* ─────────── Instructions ─────────── */

    /// `expr;`
    fn expression_statement(&mut self, at: Loc, expr: Self::Expr) -> Result<Self::Stmt, Self::Error>;
    /// `;`
    fn empty_statement(&mut self, at: Loc) -> Result<Self::Stmt, Self::Error>;
    /// `print "text";`
    fn print_text(&mut self, at: Loc, text: &str) -> Result<Self::Stmt, Self::Error>;
    /// `print expr;`
    fn print_value(&mut self, at: Loc, value: Self::Expr) -> Result<Self::Stmt, Self::Error>;
    /// Un `name (= init)?` d'une déclaration.
    fn declarator(&mut self, at: Loc, ty: TypeName, name: &str, init: Option<Self::Expr>) -> Result<Self::Decl, Self::Error>;
    /// Une déclaration complète.
    fn declaration(&mut self, at: Loc, decls: Vec<Self::Decl>) -> Result<Self::Stmt, Self::Error>;
    /// `if (cond) then (else otherwise)?`
    fn if_statement(
        &mut self,
        at: Loc,
        cond: Self::Expr,
        then_branch: Self::Stmt,
        else_branch: Option<Self::Stmt>,
    ) -> Result<Self::Stmt, Self::Error>;
    /// `while (cond) body`
    fn while_statement(&mut self, at: Loc, cond: Self::Expr, body: Self::Stmt) -> Result<Self::Stmt, Self::Error>;
    /// `return value?;`
    fn return_statement(&mut self, at: Loc, value: Option<Self::Expr>) -> Result<Self::Stmt, Self::Error>;
    /// `{` d'un bloc imbriqué.
    fn enter_block(&mut self, at: Loc) -> Result<(), Self::Error>;
    /// `}` d'un bloc imbriqué.
    fn exit_block(&mut self, at: Loc, items: Vec<Self::Stmt>) -> Result<Self::Stmt, Self::Error>;

    /* ─────────── Fonctions ─────────── */

    /// `type name(params)` ; ouvre la portée paramètres/corps.
    fn function_header(&mut self, at: Loc, ret: TypeName, name: &str, params: &[Param<'_>]) -> Result<(), Self::Error>;
    /// `;` après un en-tête.
    fn function_prototype(&mut self, at: Loc) -> Result<(), Self::Error>;
    /// `{ items }` après un en-tête.
    fn function_body(&mut self, at: Loc, items: Vec<Self::Stmt>) -> Result<(), Self::Error>;
    /// Fin d'entrée.
    fn translation_unit(&mut self, at: Loc) -> Result<(), Self::Error>;
}
