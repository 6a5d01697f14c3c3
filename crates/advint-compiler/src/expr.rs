//! Expressions et repliement de constantes.

use advint_core::{CodeBuf, Opcode, Operand, Register};
use advint_parser::BinaryOp;

use crate::types::Type;

/// Où vit la valeur d'une expression une fois son code exécuté.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    /// Constante de compilation, gardée en texte littéral.
    Constant(String),
    /// Dans l'accumulateur.
    Register,
    /// Dans le slot de frame `[fp + offset]`.
    Stack(i64),
}

/// Expression réduite : son code et l'emplacement de sa valeur.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expression {
    pub code: CodeBuf,
    pub ty: Type,
    pub loc: Location,
}

impl Expression {
    /// Constante entière sans code.
    pub fn constant(value: i64) -> Self {
        Self { code: CodeBuf::new(), ty: Type::Int, loc: Location::Constant(value.to_string()) }
    }

    /// Valeur laissée dans l'accumulateur par `code`.
    pub const fn register(code: CodeBuf, ty: Type) -> Self { Self { code, ty, loc: Location::Register } }

    /// Variable dans un slot de frame.
    pub const fn stack(offset: i64, ty: Type) -> Self { Self { code: CodeBuf::new(), ty, loc: Location::Stack(offset) } }

    /// Valeur numérique d'une constante.
    pub fn const_value(&self) -> Option<i64> {
        match &self.loc {
            Location::Constant(text) => text.parse().ok(),
            Location::Register | Location::Stack(_) => None,
        }
    }

    /// Vrai si l'expression émet ses propres instructions.
    pub fn has_code(&self) -> bool { !self.code.is_empty() }

    /// Code qui laisse la valeur dans `a`.
    pub fn into_accumulator(self) -> CodeBuf {
        let a = Operand::Reg(Register::A);
        match self.loc {
            Location::Constant(_) => {
                let v = self.const_value().unwrap_or_default();
                let mut code = self.code;
                code.emit(Opcode::MovImm, a, Operand::Imm(v));
                code
            }
            Location::Register => self.code,
            Location::Stack(off) => {
                let mut code = self.code;
                code.emit(Opcode::Load, a, Operand::Slot(off));
                code
            }
        }
    }
}

/// Replie `l op r` en arithmétique 64 bits modulaire.
///
/// Retourne `None` pour un diviseur nul.
pub fn fold(op: BinaryOp, l: i64, r: i64) -> Option<i64> {
    let truth = |b: bool| i64::from(b);
    Some(match op {
        BinaryOp::Add => l.wrapping_add(r),
        BinaryOp::Sub => l.wrapping_sub(r),
        BinaryOp::Mul => l.wrapping_mul(r),
        BinaryOp::Div if r == 0 => return None,
        BinaryOp::Div => l.wrapping_div(r),
        BinaryOp::Mod if r == 0 => return None,
        BinaryOp::Mod => l.wrapping_rem(r),
        BinaryOp::Eq => truth(l == r),
        BinaryOp::Ne => truth(l != r),
        BinaryOp::Lt => truth(l < r),
        BinaryOp::Le => truth(l <= r),
        BinaryOp::Gt => truth(l > r),
        BinaryOp::Ge => truth(l >= r),
        BinaryOp::And => truth(l != 0 && r != 0),
        BinaryOp::Or => truth(l != 0 || r != 0),
    })
}

/// Opcodes registre/registre et registre/immédiat d'un opérateur binaire.
pub const fn opcodes(op: BinaryOp) -> (Opcode, Opcode) {
    match op {
        BinaryOp::Add => (Opcode::Add, Opcode::AddImm),
        BinaryOp::Sub => (Opcode::Sub, Opcode::SubImm),
        BinaryOp::Mul => (Opcode::Mul, Opcode::MulImm),
        BinaryOp::Div => (Opcode::Div, Opcode::DivImm),
        BinaryOp::Mod => (Opcode::Mod, Opcode::ModImm),
        BinaryOp::Eq => (Opcode::Eq, Opcode::EqImm),
        BinaryOp::Ne => (Opcode::Ne, Opcode::NeImm),
        BinaryOp::Lt => (Opcode::Lt, Opcode::LtImm),
        BinaryOp::Le => (Opcode::Le, Opcode::LeImm),
        BinaryOp::Gt => (Opcode::Gt, Opcode::GtImm),
        BinaryOp::Ge => (Opcode::Ge, Opcode::GeImm),
        BinaryOp::And => (Opcode::And, Opcode::AndImm),
        BinaryOp::Or => (Opcode::Or, Opcode::OrImm),
    }
}
