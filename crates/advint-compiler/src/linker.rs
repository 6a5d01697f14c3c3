//! Linker : patche les sites d'appel et encode l'image finale.
//!
//! Les appels sont émis en `jmp <unresolved>`, l'appelé n'étant pas forcément
//! encore placé. Une fois chaque corps doté d'une adresse, une passe avant
//! réécrit chaque site en déplacement relatif à l'instruction qui suit le saut.

use std::collections::HashSet;

use advint_core::{Image, Opcode, Operand, RECORD_SIZE};
use tracing::{debug, error, instrument};

use crate::arena::{ExternNode, Handle, NodeArena};
use crate::diag::LinkError;
use crate::Program;

/// Résout chaque site d'appel de `program` et l'encode.
///
/// `entry` doit nommer une fonction avec un corps.
#[instrument(level = "debug", skip_all, fields(entry = %entry))]
pub fn link(mut program: Program, nodes: &mut NodeArena, entry: &str) -> Result<Image, LinkError> {
    let entry_address = program
        .functions
        .iter()
        .find(|f| f.name == entry)
        .map(|f| f.address)
        .ok_or_else(|| LinkError::MissingEntryPoint(entry.to_owned()))?;

    let mut patched = HashSet::new();
    let mut unresolved: Vec<String> = Vec::new();
    for (index, instr) in program.code.iter_mut().enumerate() {
        let Operand::Unresolved(target) = instr.a else { continue };
        if instr.op != Opcode::Jmp {
            continue;
        }
        let node: ExternNode = nodes.externs.take(Handle::from_extern(target))?;
        let sym = nodes.symbols.get(node.function)?;
        let Some(address) = sym.signature().and_then(|sig| sig.address) else {
            error!(line = node.line, "Unresolved external '{}'", sym.name);
            unresolved.push(sym.name.clone());
            continue;
        };
        let next = (index + 1) * RECORD_SIZE;
        let disp = i64::try_from(address).unwrap_or(i64::MAX) - i64::try_from(next).unwrap_or(i64::MAX);
        instr.a = Operand::Disp(disp);
        patched.insert(node.function);
    }
    if let Some(name) = unresolved.first() {
        return Err(LinkError::UnresolvedExternal { name: name.clone(), sites: unresolved.len() });
    }

    for symbol in &patched {
        nodes.symbols.take(*symbol)?;
    }
    let code = program.code.encode()?;
    debug!(bytes = code.len(), functions = patched.len(), "linked");
    Ok(Image {
        code,
        entry: entry_address,
        strings: program.strings,
        functions: program.functions.into_iter().map(|f| (f.name, f.address)).collect(),
    })
}
