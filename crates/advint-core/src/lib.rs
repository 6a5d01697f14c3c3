//! advint-core : primitives partagées de la chaîne advint
//!
//! Fournit :
//! - `SourceId`, `Pos`, `Span`, `Spanned<T>` pour la localisation
//! - le modèle machine : `Register`, `Opcode`, `Operand`, `Instr`
//! - `CodeBuf` (listes d'instructions structurées) et `ByteStream` (records encodés)
//! - `Image`, le programme lié remis à la VM
//! - un désassembleur texte
//! - `CoreError` + alias `CoreResult<T>`
//!
//! Features:
//! - `serde` : `Serialize` sur le modèle machine et les lignes de listing

#![deny(missing_docs)]

#[cfg(feature = "serde")]
use serde::Serialize;
use thiserror::Error;

/* ─────────────────────────── Modules publics ─────────────────────────── */

/// Primitives bytecode (opcodes, records, flux, images, désassemblage).
pub mod bytecode;

pub use bytecode::disasm;
pub use bytecode::image::Image;
pub use bytecode::instr::{CodeBuf, ExternRef, Instr, Operand, RECORD_SIZE};
pub use bytecode::op::{Opcode, OperandKind, Register, SPECIAL_LIMIT};
pub use bytecode::stream::{ByteStream, RawRecord};

/* ─────────────────────────── Résultat commun ─────────────────────────── */

/// Alias de résultat commun au core.
pub type CoreResult<T> = Result<T, CoreError>;

/* ─────────────────────────── Spans / Positions ─────────────────────────── */

/// Identifiant de source (fichier, buffer, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct SourceId(pub u32);

/// Offset en octets depuis le début d'une source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct Pos(pub u32);

impl Pos {
    /// Offset zéro.
    pub const ZERO: Self = Self(0);
    /// Addition saturante.
    #[must_use]
    pub const fn saturating_add(self, v: u32) -> Self { Self(self.0.saturating_add(v)) }
}

/// Intervalle semi-ouvert `[start, end)` dans une source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct Span {
    /// Source d'appartenance.
    pub source: SourceId,
    /// Début inclus.
    pub start: Pos,
    /// Fin exclue.
    pub end: Pos,
}

impl Span {
    /// Construit un span.
    pub const fn new(source: SourceId, start: Pos, end: Pos) -> Self { Self { source, start, end } }
    /// Longueur en octets.
    pub const fn len(&self) -> u32 { self.end.0.saturating_sub(self.start.0) }
    /// Vrai si le span est vide.
    pub const fn is_empty(&self) -> bool { self.start.0 >= self.end.0 }
}

/// Une valeur avec son span source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Spanned<T> {
    /// La valeur.
    pub value: T,
    /// Sa provenance.
    pub span: Span,
}

impl<T> Spanned<T> {
    /// Construit un `Spanned<T>`.
    pub const fn new(value: T, span: Span) -> Self { Self { value, span } }
    /// Transforme la valeur, garde le span.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Spanned<U> { Spanned { value: f(self.value), span: self.span } }
}

/* ─────────────────────────── Erreurs ─────────────────────────── */

/// Erreurs bas niveau d'encodage/décodage.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// Record demandé au-delà de la fin du flux.
    #[error("unexpected end of stream: need {needed} bytes at offset {at}")]
    UnexpectedEof {
        /// Octets requis.
        needed: usize,
        /// Offset de la lecture.
        at: usize,
    },
    /// Octet d'opcode sans instruction associée.
    #[error("invalid opcode 0x{byte:02X} at offset {at}")]
    InvalidOpcode {
        /// Octet brut.
        byte: u8,
        /// Offset du record.
        at: usize,
    },
    /// Opérande registre hors bornes.
    #[error("invalid register index {index}")]
    InvalidRegister {
        /// Valeur brute de l'opérande.
        index: i64,
    },
    /// Opérande chaîne hors du type d'index du pool.
    #[error("invalid string index {index}")]
    InvalidString {
        /// Valeur brute de l'opérande.
        index: i64,
    },
    /// Site d'appel encodé avant l'édition de liens.
    #[error("unresolved reference in `{mnemonic}` at record {record}")]
    Unlinked {
        /// Mnémonique de l'instruction.
        mnemonic: &'static str,
        /// Index du record dans le buffer.
        record: usize,
    },
    /// Saut dont la destination n'est pas une frontière de record du flux.
    #[error("jump at offset {at} targets {target}, outside the code or off a record boundary")]
    BadJumpTarget {
        /// Offset du saut.
        at: usize,
        /// Destination calculée.
        target: i64,
    },
    /// Remplacement en place avec des longueurs différentes.
    #[error("replacement must have the pattern's length ({pattern} bytes), got {replacement}")]
    PatternLength {
        /// Longueur du motif.
        pattern: usize,
        /// Longueur du remplacement.
        replacement: usize,
    },
}

/* ─────────────────────────── Prélude ─────────────────────────── */

/// Ré-exports pratiques.
pub mod prelude {
    pub use super::{
        ByteStream, CodeBuf, CoreError, CoreResult, ExternRef, Image, Instr, Opcode, Operand, Pos,
        RawRecord, Register, SourceId, Span, Spanned, RECORD_SIZE,
    };
}

/* ─────────────────────────── Tests ─────────────────────────── */
