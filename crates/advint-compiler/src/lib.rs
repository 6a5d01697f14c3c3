//! advint-compiler : des actions de grammaire à l'image liée
//!
//! - Entrée : texte source (parsé par `advint-parser`, qui pilote [`Compiler`]
//!   via le trait `Actions`)
//! - Sortie : un [`Program`] (liste d'instructions, table des fonctions, pool de
//!   chaînes), puis une [`Image`] quand [`Compiler::link`] a patché chaque appel
//! - Diagnostics : avertissements collectés et loggés ; la première erreur arrête
//! - Les nœuds vivent dans une [`NodeArena`] générationnelle, vidée à chaque compilation
//!
//! API principale :
//! ```ignore
//! use advint_compiler::{Compiler, CompilerOptions};
//!
//! let mut c = Compiler::new(CompilerOptions::default());
//! c.compile_source("int main() { print 1 + 2; return 0; }")?;
//! let image = c.link()?;
//! ```

use std::fs;
use std::path::Path;

use advint_core::{CodeBuf, Image};
use tracing::{debug, instrument};

pub mod arena;
pub mod codegen;
pub mod diag;
pub mod expr;
pub mod linker;
pub mod stmt;
pub mod symbols;
pub mod types;

pub use arena::{ArenaError, GenArena, Handle, NodeArena};
pub use diag::{CompileError, Diagnostic, LinkError, SemanticError, Severity};
pub use expr::{Expression, Location};
pub use stmt::{Declaration, Statement, StmtKind};
pub use symbols::{FunctionSig, Scopes, Symbol, SymbolKind};
pub use types::Type;

/* ─────────────────────────── Options ─────────────────────────── */

/// Options du compilateur.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerOptions {
    /// Échoue si un avertissement a été émis.
    pub deny_warnings: bool,
    /// Logge chaque action de grammaire au niveau `debug`.
    pub trace_actions: bool,
    /// Nom de la fonction d'entrée.
    pub entry: String,
}

impl Default for CompilerOptions {
    fn default() -> Self { Self { deny_warnings: false, trace_actions: false, entry: "main".to_owned() } }
}

/* ─────────────────────────── Programme ─────────────────────────── */

/// Fonction placée dans le programme.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionEntry {
    pub name: String,
    /// Offset en octets du prologue.
    pub address: usize,
    pub symbol: Handle<Symbol>,
}

/// Unité compilée en attente du linker.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Program {
    /// Corps de fonctions, dans l'ordre de définition.
    pub code: CodeBuf,
    pub functions: Vec<FunctionEntry>,
    pub strings: Vec<String>,
}

/* ─────────────────────────── Compilateur ─────────────────────────── */

/// Contexte de compilation ; une unité à la fois, réutilisable en séquence.
#[derive(Debug)]
pub struct Compiler {
    pub(crate) opts: CompilerOptions,
    pub(crate) nodes: NodeArena,
    pub(crate) scopes: Scopes,
    pub(crate) strings: Vec<String>,
    /// Corps compilés, dans l'ordre de définition.
    pub(crate) bodies: Vec<(Handle<Symbol>, CodeBuf)>,
    /// Fonction dont l'en-tête a été vu en dernier.
    pub(crate) current: Option<Handle<Symbol>>,
    pub(crate) diagnostics: Vec<Diagnostic>,
    pub(crate) program: Option<Program>,
}

impl Default for Compiler {
    fn default() -> Self { Self::new(CompilerOptions::default()) }
}

impl Compiler {
    /// Contexte neuf.
    pub fn new(opts: CompilerOptions) -> Self {
        Self {
            opts,
            nodes: NodeArena::default(),
            scopes: Scopes::default(),
            strings: Vec::new(),
            bodies: Vec::new(),
            current: None,
            diagnostics: Vec::new(),
            program: None,
        }
    }

    /// Options en vigueur.
    pub const fn options(&self) -> &CompilerOptions { &self.opts }

    /// Compile une unité, en remplaçant la précédente.
    #[instrument(level = "debug", skip_all, fields(bytes = src.len()))]
    pub fn compile_source(&mut self, src: &str) -> Result<&Program, CompileError> {
        self.reset();
        advint_parser::parse(src, self)?;

        let warnings = self.diagnostics.iter().filter(|d| d.severity == Severity::Warning).count();
        if self.opts.deny_warnings && warnings > 0 {
            self.program = None;
            return Err(CompileError::DeniedWarnings { count: warnings });
        }
        self.program.as_ref().ok_or(CompileError::Incomplete)
    }

    /// Lit et compile un fichier source.
    pub fn compile_file(&mut self, path: &Path) -> Result<&Program, CompileError> {
        let src = fs::read_to_string(path).map_err(|source| CompileError::Io { path: path.to_path_buf(), source })?;
        debug!(path = %path.display(), "compiling");
        self.compile_source(&src)
    }

    /// Lie le dernier programme compilé en image exécutable.
    pub fn link(&mut self) -> Result<Image, LinkError> {
        let program = self.program.take().ok_or(LinkError::NothingToLink)?;
        linker::link(program, &mut self.nodes, &self.opts.entry)
    }

    /// Avertissements et notes de la dernière compilation.
    pub fn diagnostics(&self) -> &[Diagnostic] { &self.diagnostics }

    /// Programme compilé, pas encore lié.
    pub const fn program(&self) -> Option<&Program> { self.program.as_ref() }

    /// Arènes de nœuds.
    pub const fn nodes(&self) -> &NodeArena { &self.nodes }

    /// Résout un nom visible dans la portée courante.
    pub fn lookup(&self, name: &str) -> Option<&Symbol> {
        self.scopes.lookup(name).and_then(|h| self.nodes.symbols.get(h).ok())
    }

    fn reset(&mut self) {
        self.nodes.clear();
        self.scopes.reset();
        self.strings.clear();
        self.bodies.clear();
        self.current = None;
        self.diagnostics.clear();
        self.program = None;
    }
}
