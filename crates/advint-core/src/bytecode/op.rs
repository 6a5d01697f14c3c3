//! Registres et opcodes.
//!
//! Les opcodes sous [`SPECIAL_LIMIT`] sont des instructions *spéciales* (sortie),
//! le reste des instructions *communes*. Chaque opcode porte une signature
//! d'opérandes statique, utilisée par l'encodeur, le décodeur et le désassembleur.

use core::fmt;

#[cfg(feature = "serde")]
use serde::Serialize;

/// Premier octet de la plage des instructions communes.
pub const SPECIAL_LIMIT: u8 = 0x20;

/* ─────────────────────────── Registres ─────────────────────────── */

/// Registres machine, dans l'ordre d'encodage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize), serde(rename_all = "lowercase"))]
#[repr(u8)]
pub enum Register {
    /// Frame pointer.
    Fp = 0,
    /// Pointeur de pile.
    Sp = 1,
    /// Accumulateur.
    A = 2,
    /// Registre de travail.
    B = 3,
    /// Usage général.
    C = 4,
    /// Usage général.
    D = 5,
    /// Compteur ordinal.
    Pc = 6,
}

impl Register {
    /// Nombre de registres.
    pub const COUNT: usize = 7;
    /// Tous les registres, indexés par encodage.
    pub const ALL: [Self; Self::COUNT] = [Self::Fp, Self::Sp, Self::A, Self::B, Self::C, Self::D, Self::Pc];

    /// Index dans le banc de registres.
    pub const fn index(self) -> usize { self as usize }

    /// Décode une valeur d'opérande.
    pub fn from_index(raw: i64) -> Option<Self> {
        usize::try_from(raw).ok().and_then(|i| Self::ALL.get(i).copied())
    }

    /// Nom en assembleur.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Fp => "fp",
            Self::Sp => "sp",
            Self::A => "a",
            Self::B => "b",
            Self::C => "c",
            Self::D => "d",
            Self::Pc => "pc",
        }
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.name()) }
}

/* ─────────────────────────── Types d'opérandes ─────────────────────────── */

/// Interprétation d'un champ opérande.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize), serde(rename_all = "lowercase"))]
pub enum OperandKind {
    /// Champ inutilisé (encodé à zéro).
    None,
    /// Index de registre.
    Reg,
    /// Immédiat 64 bits.
    Imm,
    /// Offset relatif au frame (`[fp + off]`).
    Slot,
    /// Index dans le pool de chaînes.
    Str,
    /// Déplacement en octets relatif à l'instruction suivante.
    Disp,
}

/* ─────────────────────────── Opcodes ─────────────────────────── */

macro_rules! opcodes {
    ($( $(#[$doc:meta])* $name:ident = $byte:literal, $mnemonic:literal, ($a:ident, $b:ident); )*) => {
        /// Opcodes (`#[repr(u8)]`, premier octet de chaque record).
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[cfg_attr(feature = "serde", derive(Serialize), serde(rename_all = "lowercase"))]
        #[repr(u8)]
        pub enum Opcode {
            $( $(#[$doc])* $name = $byte, )*
        }

        impl Opcode {
            /// Tous les opcodes, par octet croissant.
            pub const ALL: &'static [Self] = &[$(Self::$name),*];

            /// Décode un octet d'opcode.
            pub const fn from_byte(byte: u8) -> Option<Self> {
                match byte {
                    $( $byte => Some(Self::$name), )*
                    _ => None,
                }
            }

            /// Mnémonique assembleur.
            pub const fn mnemonic(self) -> &'static str {
                match self {
                    $( Self::$name => $mnemonic, )*
                }
            }

            /// Signature d'opérandes `[a, b]`.
            pub const fn operands(self) -> [OperandKind; 2] {
                match self {
                    $( Self::$name => [OperandKind::$a, OperandKind::$b], )*
                }
            }
        }
    };
}

opcodes! {
    /// Écrit la valeur d'un registre suivie d'un saut de ligne.
    PrintReg = 0x00, "printr", (Reg, None);
    /// Écrit une chaîne du pool.
    PrintStr = 0x01, "prints", (Str, None);

    /// Empile un registre.
    Push = 0x20, "push", (Reg, None);
    /// Empile un immédiat.
    PushImm = 0x21, "pushi", (Imm, None);
    /// Empile l'adresse de l'instruction suivante plus un déplacement.
    PushPc = 0x22, "pushpc", (Disp, None);
    /// Dépile dans un registre (`pop pc` fait le retour).
    Pop = 0x23, "pop", (Reg, None);
    /// Copie registre vers registre.
    Mov = 0x24, "mov", (Reg, Reg);
    /// Copie d'un immédiat dans un registre.
    MovImm = 0x25, "movi", (Reg, Imm);
    /// Charge un slot de frame dans un registre.
    Load = 0x26, "load", (Reg, Slot);
    /// Range un registre dans un slot de frame.
    Store = 0x27, "store", (Slot, Reg);

    /// `a = a + b`
    Add = 0x30, "add", (Reg, Reg);
    /// `a = a + imm`
    AddImm = 0x31, "addi", (Reg, Imm);
    /// `a = a - b`
    Sub = 0x32, "sub", (Reg, Reg);
    /// `a = a - imm`
    SubImm = 0x33, "subi", (Reg, Imm);
    /// `a = a * b`
    Mul = 0x34, "mul", (Reg, Reg);
    /// `a = a * imm`
    MulImm = 0x35, "muli", (Reg, Imm);
    /// `a = a / b`
    Div = 0x36, "div", (Reg, Reg);
    /// `a = a / imm`
    DivImm = 0x37, "divi", (Reg, Imm);
    /// `a = a % b`
    Mod = 0x38, "mod", (Reg, Reg);
    /// `a = a % imm`
    ModImm = 0x39, "modi", (Reg, Imm);

    /// `a = (a == b)`
    Eq = 0x40, "eq", (Reg, Reg);
    /// `a = (a == imm)`
    EqImm = 0x41, "eqi", (Reg, Imm);
    /// `a = (a != b)`
    Ne = 0x42, "ne", (Reg, Reg);
    /// `a = (a != imm)`
    NeImm = 0x43, "nei", (Reg, Imm);
    /// `a = (a < b)`
    Lt = 0x44, "lt", (Reg, Reg);
    /// `a = (a < imm)`
    LtImm = 0x45, "lti", (Reg, Imm);
    /// `a = (a <= b)`
    Le = 0x46, "le", (Reg, Reg);
    /// `a = (a <= imm)`
    LeImm = 0x47, "lei", (Reg, Imm);
    /// `a = (a > b)`
    Gt = 0x48, "gt", (Reg, Reg);
    /// `a = (a > imm)`
    GtImm = 0x49, "gti", (Reg, Imm);
    /// `a = (a >= b)`
    Ge = 0x4A, "ge", (Reg, Reg);
    /// `a = (a >= imm)`
    GeImm = 0x4B, "gei", (Reg, Imm);

    /// `a = (a != 0 && b != 0)`
    And = 0x50, "and", (Reg, Reg);
    /// `a = (a != 0 && imm != 0)`
    AndImm = 0x51, "andi", (Reg, Imm);
    /// `a = (a != 0 || b != 0)`
    Or = 0x52, "or", (Reg, Reg);
    /// `a = (a != 0 || imm != 0)`
    OrImm = 0x53, "ori", (Reg, Imm);

    /// Négation en complément à deux.
    Neg = 0x58, "neg", (Reg, None);
    /// Non logique (`0` ↔ `1`).
    Not = 0x59, "not", (Reg, None);

    /// Saut relatif inconditionnel.
    Jmp = 0x60, "jmp", (Disp, None);
    /// Saut relatif si le registre est nul.
    Jz = 0x61, "jz", (Reg, Disp);
}

impl Opcode {
    /// Vrai pour la plage spéciale (sortie).
    pub const fn is_special(self) -> bool { (self as u8) < SPECIAL_LIMIT }

    /// Octet brut.
    pub const fn byte(self) -> u8 { self as u8 }

    /// Index de l'opérande de déplacement, s'il existe.
    pub const fn disp_slot(self) -> Option<usize> {
        match self.operands() {
            [OperandKind::Disp, _] => Some(0),
            [_, OperandKind::Disp] => Some(1),
            _ => None,
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.mnemonic()) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_roundtrip() {
        for &op in Opcode::ALL {
            assert_eq!(Opcode::from_byte(op.byte()), Some(op));
        }
        assert_eq!(Opcode::from_byte(0x1F), None);
        assert_eq!(Opcode::from_byte(0xFF), None);
    }

    #[test]
    fn only_output_is_special() {
        let specials: Vec<_> = Opcode::ALL.iter().filter(|op| op.is_special()).collect();
        assert_eq!(specials, [&Opcode::PrintReg, &Opcode::PrintStr]);
    }

    #[test]
    fn mnemonics_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for op in Opcode::ALL {
            assert!(seen.insert(op.mnemonic()), "duplicate mnemonic {op}");
        }
    }

    #[test]
    fn registers_decode() {
        assert_eq!(Register::from_index(2), Some(Register::A));
        assert_eq!(Register::from_index(6), Some(Register::Pc));
        assert_eq!(Register::from_index(7), None);
        assert_eq!(Register::from_index(-1), None);
        assert_eq!(Register::B.to_string(), "b");
    }

    #[test]
    fn displacement_slots() {
        assert_eq!(Opcode::Jmp.disp_slot(), Some(0));
        assert_eq!(Opcode::Jz.disp_slot(), Some(1));
        assert_eq!(Opcode::PushPc.disp_slot(), Some(0));
        assert_eq!(Opcode::Add.disp_slot(), None);
    }
}
