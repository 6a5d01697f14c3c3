//! Instructions structurées et listes d'instructions.
//!
//! Génération et édition de liens travaillent sur [`CodeBuf`] (liste d'[`Instr`]) ;
//! l'encodage en records de taille fixe vient en dernier.
//!
//! Format d'un record (little-endian, sans padding) :
//!
//! ```text
//! +--------+------------------+------------------+
//! | opcode | operand a (i64)  | operand b (i64)  |
//! | 1 byte | 8 bytes          | 8 bytes          |
//! +--------+------------------+------------------+
//! ```

use core::fmt;

#[cfg(feature = "serde")]
use serde::Serialize;

use super::op::{Opcode, OperandKind, Register};
use super::stream::{ByteStream, RawRecord};
use crate::{CoreError, CoreResult};

/// Taille d'un record encodé.
pub const RECORD_SIZE: usize = 1 + 8 + 8;

/// Référence opaque vers une cible d'appel pas encore liée.
///
/// Le compilateur y encode un handle d'arène ; le core ne fait que la porter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct ExternRef(pub u64);

/// Un champ opérande d'instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize), serde(tag = "kind", content = "value", rename_all = "lowercase"))]
pub enum Operand {
    /// Inutilisé.
    None,
    /// Registre.
    Reg(Register),
    /// Immédiat.
    Imm(i64),
    /// Slot de frame `[fp + off]`.
    Slot(i64),
    /// Index dans le pool de chaînes.
    Str(u32),
    /// Déplacement relatif à l'instruction suivante.
    Disp(i64),
    /// Cible d'appel en attente du linker.
    Unresolved(ExternRef),
}

impl Operand {
    /// Type de l'opérande (`Unresolved` compte comme un déplacement).
    pub const fn kind(self) -> OperandKind {
        match self {
            Self::None => OperandKind::None,
            Self::Reg(_) => OperandKind::Reg,
            Self::Imm(_) => OperandKind::Imm,
            Self::Slot(_) => OperandKind::Slot,
            Self::Str(_) => OperandKind::Str,
            Self::Disp(_) | Self::Unresolved(_) => OperandKind::Disp,
        }
    }

    /// Valeur brute du champ, ou `None` pour une référence non liée.
    pub fn raw(self) -> Option<i64> {
        Some(match self {
            Self::None => 0,
            Self::Reg(r) => r.index() as i64,
            Self::Imm(v) | Self::Slot(v) | Self::Disp(v) => v,
            Self::Str(ix) => i64::from(ix),
            Self::Unresolved(_) => return None,
        })
    }

    /// Interprète un champ brut selon `kind`.
    pub fn decode(kind: OperandKind, raw: i64) -> CoreResult<Self> {
        Ok(match kind {
            OperandKind::None => Self::None,
            OperandKind::Reg => Self::Reg(Register::from_index(raw).ok_or(CoreError::InvalidRegister { index: raw })?),
            OperandKind::Imm => Self::Imm(raw),
            OperandKind::Slot => Self::Slot(raw),
            OperandKind::Str => Self::Str(u32::try_from(raw).map_err(|_| CoreError::InvalidString { index: raw })?),
            OperandKind::Disp => Self::Disp(raw),
        })
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::None => Ok(()),
            Self::Reg(r) => write!(f, "{r}"),
            Self::Imm(v) => write!(f, "#{v}"),
            Self::Slot(off) if off < 0 => write!(f, "[fp{off}]"),
            Self::Slot(off) => write!(f, "[fp+{off}]"),
            Self::Str(ix) => write!(f, "${ix}"),
            Self::Disp(d) => write!(f, "{d:+}"),
            Self::Unresolved(r) => write!(f, "<extern {:#x}>", r.0),
        }
    }
}

/// Une instruction : opcode et deux champs opérandes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct Instr {
    /// Opcode.
    pub op: Opcode,
    /// Premier opérande.
    pub a: Operand,
    /// Second opérande.
    pub b: Operand,
}

impl Instr {
    /// Construit une instruction ; les types d'opérandes suivent la signature de l'opcode.
    pub fn new(op: Opcode, a: Operand, b: Operand) -> Self {
        debug_assert_eq!(op.operands(), [a.kind(), b.kind()], "operand mismatch for {op}");
        Self { op, a, b }
    }

    /// Instruction à un opérande.
    pub fn unary(op: Opcode, a: Operand) -> Self { Self::new(op, a, Operand::None) }

    /// Déplacement porté par une instruction de saut.
    pub fn disp(&self) -> Option<i64> {
        let slot = if self.op.disp_slot()? == 0 { &self.a } else { &self.b };
        match slot {
            Operand::Disp(d) => Some(*d),
            _ => None,
        }
    }

    /// Vrai si une cible d'appel attend encore le linker.
    pub const fn is_unresolved(&self) -> bool {
        matches!(self.a, Operand::Unresolved(_)) || matches!(self.b, Operand::Unresolved(_))
    }

    /// Ajoute le record encodé à `out`. `record` ne sert qu'aux erreurs.
    pub fn encode_into(&self, out: &mut ByteStream, record: usize) -> CoreResult<()> {
        let unlinked = || CoreError::Unlinked { mnemonic: self.op.mnemonic(), record };
        let a = self.a.raw().ok_or_else(unlinked)?;
        let b = self.b.raw().ok_or_else(unlinked)?;
        out.push_u8(self.op.byte());
        out.push_i64(a);
        out.push_i64(b);
        Ok(())
    }

    /// Décode un record brut lu à l'offset `at`.
    pub fn decode(raw: RawRecord, at: usize) -> CoreResult<Self> {
        let op = Opcode::from_byte(raw.op).ok_or(CoreError::InvalidOpcode { byte: raw.op, at })?;
        let [ka, kb] = op.operands();
        Ok(Self { op, a: Operand::decode(ka, raw.a)?, b: Operand::decode(kb, raw.b)? })
    }
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.a, self.b) {
            (Operand::None, _) => write!(f, "{}", self.op),
            (a, Operand::None) => write!(f, "{:<8} {a}", self.op.mnemonic()),
            (a, b) => write!(f, "{:<8} {a}, {b}", self.op.mnemonic()),
        }
    }
}

/* ─────────────────────────── CodeBuf ─────────────────────────── */

/// Liste ordonnée d'instructions, possédée par une expression, une instruction ou une fonction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodeBuf {
    instrs: Vec<Instr>,
}

impl CodeBuf {
    /// Buffer vide.
    pub const fn new() -> Self { Self { instrs: Vec::new() } }

    /// Nombre d'instructions.
    pub fn len(&self) -> usize { self.instrs.len() }

    /// Vrai si rien n'a été émis.
    pub fn is_empty(&self) -> bool { self.instrs.is_empty() }

    /// Taille encodée en octets.
    pub fn byte_len(&self) -> usize { self.instrs.len() * RECORD_SIZE }

    /// Taille encodée, en déplacement.
    pub fn span(&self) -> i64 { i64::try_from(self.byte_len()).unwrap_or(i64::MAX) }

    /// Ajoute une instruction.
    pub fn push(&mut self, instr: Instr) { self.instrs.push(instr); }

    /// Ajoute `op a, b`.
    pub fn emit(&mut self, op: Opcode, a: Operand, b: Operand) { self.push(Instr::new(op, a, b)); }

    /// Ajoute `op a`.
    pub fn emit1(&mut self, op: Opcode, a: Operand) { self.push(Instr::unary(op, a)); }

    /// Déplace toutes les instructions de `other` à la fin de `self`.
    pub fn append(&mut self, mut other: Self) { self.instrs.append(&mut other.instrs); }

    /// Instructions en slice.
    pub fn as_slice(&self) -> &[Instr] { &self.instrs }

    /// Itération mutable (le linker y patche les opérandes).
    pub fn iter_mut(&mut self) -> core::slice::IterMut<'_, Instr> { self.instrs.iter_mut() }

    /// Itération partagée.
    pub fn iter(&self) -> core::slice::Iter<'_, Instr> { self.instrs.iter() }

    /// Nombre de sites d'appel en attente du linker.
    pub fn unresolved(&self) -> usize { self.instrs.iter().filter(|i| i.is_unresolved()).count() }

    /// Encode toutes les instructions dans un flux neuf.
    pub fn encode(&self) -> CoreResult<ByteStream> {
        let mut out = ByteStream::with_capacity(self.byte_len());
        for (record, instr) in self.instrs.iter().enumerate() {
            instr.encode_into(&mut out, record)?;
        }
        Ok(out)
    }
}

impl FromIterator<Instr> for CodeBuf {
    fn from_iter<I: IntoIterator<Item = Instr>>(iter: I) -> Self { Self { instrs: iter.into_iter().collect() } }
}

impl Extend<Instr> for CodeBuf {
    fn extend<I: IntoIterator<Item = Instr>>(&mut self, iter: I) { self.instrs.extend(iter); }
}

impl<'a> IntoIterator for &'a CodeBuf {
    type Item = &'a Instr;
    type IntoIter = core::slice::Iter<'a, Instr>;
    fn into_iter(self) -> Self::IntoIter { self.instrs.iter() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample() -> CodeBuf {
        let mut code = CodeBuf::new();
        code.emit1(Opcode::Push, Operand::Reg(Register::Fp));
        code.emit(Opcode::Mov, Operand::Reg(Register::Fp), Operand::Reg(Register::Sp));
        code.emit(Opcode::Load, Operand::Reg(Register::A), Operand::Slot(-8));
        code.emit(Opcode::Jz, Operand::Reg(Register::A), Operand::Disp(17));
        code.emit1(Opcode::PrintStr, Operand::Str(3));
        code
    }

    #[test]
    fn encode_layout() -> CoreResult<()> {
        let bytes = sample().encode()?;
        assert_eq!(bytes.len(), 5 * RECORD_SIZE);
        let load = &bytes.as_bytes()[2 * RECORD_SIZE..3 * RECORD_SIZE];
        assert_eq!(load[0], Opcode::Load.byte());
        assert_eq!(&load[1..9], &2i64.to_le_bytes());
        assert_eq!(&load[9..17], &(-8i64).to_le_bytes());
        Ok(())
    }

    #[test]
    fn decode_matches_encode() -> CoreResult<()> {
        let code = sample();
        let bytes = code.encode()?;
        for (i, instr) in code.iter().enumerate() {
            let at = i * RECORD_SIZE;
            assert_eq!(&Instr::decode(bytes.record(at)?, at)?, instr);
        }
        Ok(())
    }

    #[test]
    fn unresolved_refuses_to_encode() {
        let mut code = sample();
        code.emit1(Opcode::Jmp, Operand::Unresolved(ExternRef(7)));
        assert_eq!(code.unresolved(), 1);
        assert_eq!(code.encode(), Err(CoreError::Unlinked { mnemonic: "jmp", record: 5 }));
    }

    #[test]
    fn bad_register_is_rejected() {
        let raw = RawRecord { op: Opcode::Push.byte(), a: 42, b: 0 };
        assert_eq!(Instr::decode(raw, 0), Err(CoreError::InvalidRegister { index: 42 }));
    }

    #[test]
    fn display_forms() {
        let code = sample();
        let text: Vec<String> = code.iter().map(ToString::to_string).collect();
        assert_eq!(
            text,
            ["push     fp", "mov      fp, sp", "load     a, [fp-8]", "jz       a, +17", "prints   $3"]
        );
    }

    #[test]
    fn disp_reads_the_signature_slot() {
        let jz = Instr::new(Opcode::Jz, Operand::Reg(Register::A), Operand::Disp(-34));
        assert_eq!(jz.disp(), Some(-34));
        assert_eq!(Instr::unary(Opcode::Neg, Operand::Reg(Register::A)).disp(), None);
    }
}
