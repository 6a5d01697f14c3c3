//! Diagnostics et types d'erreur.

use core::fmt;
use std::path::PathBuf;

use advint_core::CoreError;
use advint_parser::SyntaxError;
use thiserror::Error;

use crate::arena::ArenaError;
use crate::types::Type;

/// Sévérité d'un diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Information.
    Info,
    /// Suspect mais accepté.
    Warning,
    /// Bloquant.
    Error,
}

/// Message non fatal collecté pendant la compilation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Sévérité.
    pub severity: Severity,
    /// Message lisible.
    pub message: String,
    /// Ligne source.
    pub line: u32,
}

impl Diagnostic {
    /// Construit un avertissement.
    pub fn warn(line: u32, message: impl Into<String>) -> Self {
        Self { severity: Severity::Warning, message: message.into(), line }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        write!(f, "{tag}: line {}: {}", self.line, self.message)
    }
}

/// Erreurs sémantiques levées par les actions de grammaire.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SemanticError {
    #[error("Conflicting declaration of '{0}'")]
    ConflictingDeclaration(String),
    #[error("Redefinition of function '{0}'")]
    Redefinition(String),
    #[error("Undeclared identifier '{0}'")]
    UndeclaredIdentifier(String),
    #[error("Undeclared function '{0}'")]
    UndeclaredFunction(String),
    #[error("'{0}' is not a function")]
    NotAFunction(String),
    #[error("'{0}' is not a variable")]
    NotAVariable(String),
    #[error("Function '{name}' expects {expected} argument(s), got {found}")]
    ArgumentCount { name: String, expected: usize, found: usize },
    #[error("Operator '{0}' requires lvalue")]
    RequiresLvalue(&'static str),
    #[error("Division by zero")]
    DivisionByZero,
    #[error("Invalid operands to '{op}' (found {found})")]
    InvalidOperands { op: &'static str, found: Type },
    #[error("Void value used where a value is expected")]
    VoidValue,
    #[error("Variable '{0}' declared void")]
    VoidVariable(String),
    #[error("Parameter '{0}' declared void")]
    VoidParameter(String),
    #[error("Function '{0}' returns void but a value was returned")]
    ReturnValueInVoid(String),
    #[error("Return type mismatch: expected {expected}, found {found}")]
    ReturnTypeMismatch { expected: Type, found: Type },
    #[error("Statement outside of a function")]
    OutsideFunction,
}

/// Échec de compilation ; la première erreur interrompt l'unité.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error(transparent)]
    Syntax(#[from] SyntaxError),
    #[error("line {line}: {kind}")]
    Semantic { line: u32, kind: SemanticError },
    #[error("internal: {0}")]
    Arena(#[from] ArenaError),
    #[error("cannot read {}: {source}", path.display())]
    Io { path: PathBuf, source: std::io::Error },
    #[error("{count} warning(s) treated as errors")]
    DeniedWarnings { count: usize },
    #[error("input ended before the translation unit was reduced")]
    Incomplete,
}

impl CompileError {
    /// Erreur sémantique à la ligne `line`.
    pub const fn at(line: u32, kind: SemanticError) -> Self { Self::Semantic { line, kind } }

    /// L'erreur sémantique, le cas échéant.
    pub const fn semantic(&self) -> Option<&SemanticError> {
        match self {
            Self::Semantic { kind, .. } => Some(kind),
            _ => None,
        }
    }
}

/// Échec d'édition de liens.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("Unresolved external '{name}'")]
    UnresolvedExternal { name: String, sites: usize },
    #[error("No entry point: function '{0}' is not defined")]
    MissingEntryPoint(String),
    #[error("nothing to link: no translation unit was compiled")]
    NothingToLink,
    #[error("internal: {0}")]
    Arena(#[from] ArenaError),
    #[error(transparent)]
    Encode(#[from] CoreError),
}
