//! Instructions et déclarateurs.

use advint_core::CodeBuf;

use crate::arena::Handle;
use crate::symbols::Symbol;

/// Forme grossière d'une instruction, pour l'atteignabilité.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StmtKind {
    Plain,
    Conditional,
    Loop,
    /// Se termine par l'épilogue de fonction.
    Return,
}

/// Instruction réduite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub code: CodeBuf,
    pub kind: StmtKind,
    /// Profondeur de portée à la génération.
    pub depth: usize,
    pub line: u32,
}

impl Statement {
    pub const fn new(code: CodeBuf, kind: StmtKind, depth: usize, line: u32) -> Self { Self { code, kind, depth, line } }

    /// Vrai si le contrôle ne passe jamais à l'instruction suivante.
    pub const fn diverges(&self) -> bool { matches!(self.kind, StmtKind::Return) }
}

/// Un déclarateur : allocation du slot et initialiseur.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub symbol: Handle<Symbol>,
    pub code: CodeBuf,
    pub line: u32,
}
