//! Image de programme liée.

use super::instr::RECORD_SIZE;
use super::stream::ByteStream;

/// Sortie du linker : code encodé et tables pour l'exécuter et le lister.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Image {
    /// Records d'instructions encodés.
    pub code: ByteStream,
    /// Offset de la fonction d'entrée.
    pub entry: usize,
    /// Pool de chaînes référencé par `prints`.
    pub strings: Vec<String>,
    /// `(nom, adresse)` de chaque fonction avec un corps, par adresse croissante.
    pub functions: Vec<(String, usize)>,
}

impl Image {
    /// Nombre de records.
    pub fn records(&self) -> usize { self.code.len() / RECORD_SIZE }

    /// Fonction qui commence exactement à `offset`.
    pub fn function_at(&self, offset: usize) -> Option<&str> {
        self.functions.iter().find(|(_, at)| *at == offset).map(|(name, _)| name.as_str())
    }

    /// Adresse d'une fonction par son nom.
    pub fn address_of(&self, name: &str) -> Option<usize> {
        self.functions.iter().find(|(n, _)| n == name).map(|(_, at)| *at)
    }
}
