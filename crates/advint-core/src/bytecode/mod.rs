//! Bytecode : modèle machine, buffers de code, flux encodés et listings.

/// Désassemblage texte et structuré.
pub mod disasm;
/// Image de programme liée.
pub mod image;
/// Instructions, opérandes et `CodeBuf`.
pub mod instr;
/// Registres et opcodes.
pub mod op;
/// Flux d'octets encodés extensible.
pub mod stream;
