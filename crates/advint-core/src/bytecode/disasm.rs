//! Désassemblage des images liées.
//!
//! [`listing`] décode chaque record en [`Line`] (cibles de saut résolues),
//! [`disassemble`] rend le listing en texte, un record par ligne :
//!
//! ```text
//! ;; entry 0000, 4 records, 0 strings
//! main:
//!   0000 | push     fp
//!   0017 | mov      fp, sp
//! ```


#[cfg(feature = "serde")]
use serde::Serialize;

use super::image::Image;
use super::instr::{Instr, Operand, RECORD_SIZE};
use super::stream::ByteStream;
use crate::{CoreError, CoreResult};

/// Un record décodé.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct Line {
    /// Offset en octets du record.
    pub offset: usize,
    /// Instruction décodée.
    pub instr: Instr,
    /// Destination absolue d'une instruction de saut.
    pub target: Option<usize>,
    /// Fonction qui commence à cet offset.
    pub label: Option<String>,
}

/// Décode chaque record de `code` en `(offset, instr)`.
pub fn decode_stream(code: &ByteStream) -> CoreResult<Vec<(usize, Instr)>> {
    (0..code.len())
        .step_by(RECORD_SIZE)
        .map(|at| Ok((at, Instr::decode(code.record(at)?, at)?)))
        .collect()
}

/// Destination absolue de `disp` pour un record en `at`, vérifiée contre le flux.
pub fn jump_target(at: usize, disp: i64, code_len: usize) -> CoreResult<usize> {
    let next = at + RECORD_SIZE;
    let target = i64::try_from(next).ok().and_then(|n| n.checked_add(disp));
    match target.and_then(|t| usize::try_from(t).ok()) {
        Some(t) if t <= code_len && t % RECORD_SIZE == 0 => Ok(t),
        _ => Err(CoreError::BadJumpTarget { at, target: target.unwrap_or(i64::MAX) }),
    }
}

/// Listing structuré d'une image.
pub fn listing(image: &Image) -> CoreResult<Vec<Line>> {
    let len = image.code.len();
    decode_stream(&image.code)?
        .into_iter()
        .map(|(offset, instr)| {
            let target = instr.disp().map(|d| jump_target(offset, d, len)).transpose()?;
            let label = image.function_at(offset).map(str::to_owned);
            Ok(Line { offset, instr, target, label })
        })
        .collect()
}

/// Listing lisible.
pub fn disassemble(image: &Image) -> CoreResult<String> {
    let lines = listing(image)?;
    let mut out = String::new();
    out.push_str(&format!(
        ";; entry {:04}, {} records, {} strings\n",
        image.entry,
        image.records(),
        image.strings.len()
    ));
    for line in &lines {
        if let Some(label) = &line.label {
            out.push_str(&format!("{label}:\n"));
        }
        let text = line.instr.to_string();
        match (line.target, string_operand(&line.instr)) {
            (Some(t), _) => {
                out.push_str(&format!("  {:04} | {text:<24} ; -> {t:04}\n", line.offset));
            }
            (None, Some(ix)) => {
                let shown = image.strings.get(ix as usize).map_or_else(|| "?".to_owned(), |s| preview(s));
                out.push_str(&format!("  {:04} | {text:<24} ; {shown}\n", line.offset));
            }
            (None, None) => {
                out.push_str(&format!("  {:04} | {text}\n", line.offset));
            }
        }
    }
    Ok(out)
}

const fn string_operand(instr: &Instr) -> Option<u32> {
    match instr.a {
        Operand::Str(ix) => Some(ix),
        _ => None,
    }
}

fn preview(s: &str) -> String {
    let escaped = s.escape_debug().to_string();
    if escaped.chars().count() <= 40 {
        format!("\"{escaped}\"")
    } else {
        let cut: String = escaped.chars().take(40).collect();
        format!("\"{cut}...\"")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CodeBuf, Opcode, Register};
    use pretty_assertions::assert_eq;

    fn image() -> Image {
        let mut code = CodeBuf::new();
        code.emit1(Opcode::Push, Operand::Reg(Register::Fp));
        code.emit(Opcode::MovImm, Operand::Reg(Register::A), Operand::Imm(0));
        code.emit(Opcode::Jz, Operand::Reg(Register::A), Operand::Disp(17));
        code.emit1(Opcode::PrintStr, Operand::Str(0));
        code.emit1(Opcode::Jmp, Operand::Disp(-68));
        Image {
            code: code.encode().unwrap(),
            entry: 0,
            strings: vec!["hi\n".into()],
            functions: vec![("main".into(), 0)],
        }
    }

    #[test]
    fn text_listing() {
        let text = disassemble(&image()).unwrap();
        let expected = "\
;; entry 0000, 5 records, 1 strings
main:
  0000 | push     fp
  0017 | movi     a, #0
  0034 | jz       a, +17          ; -> 0068
  0051 | prints   $0              ; \"hi\\n\"
  0068 | jmp      -68             ; -> 0017
";
        assert_eq!(text, expected);
    }

    #[test]
    fn targets_are_record_boundaries() {
        let img = image();
        for line in listing(&img).unwrap() {
            if let Some(t) = line.target {
                assert_eq!(t % RECORD_SIZE, 0);
                assert!(t <= img.code.len());
            }
        }
    }

    #[test]
    fn misaligned_jump_is_reported() {
        let mut code = CodeBuf::new();
        code.emit1(Opcode::Jmp, Operand::Disp(5));
        let img = Image { code: code.encode().unwrap(), ..Image::default() };
        assert_eq!(listing(&img), Err(CoreError::BadJumpTarget { at: 0, target: 22 }));
    }

    #[test]
    fn jump_to_end_is_allowed() {
        assert_eq!(jump_target(0, 17, 34), Ok(34));
        assert!(jump_target(0, 34, 34).is_err());
        assert!(jump_target(17, -51, 34).is_err());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn listing_serializes() {
        let rows = listing(&image()).unwrap();
        let json = serde_json::to_string(&rows[0]).unwrap();
        assert!(json.contains("\"op\":\"push\""));
        assert!(json.contains("\"label\":\"main\""));
    }
}
