//! Étiquettes de type des valeurs.

use core::fmt;

use advint_parser::TypeName;

/// Étiquette de type des symboles et expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Type {
    /// Pas de valeur.
    Void,
    /// Entier signé 64 bits.
    Int,
    /// Référence opaque à une chaîne.
    Str,
}

impl Type {
    /// Place en frame, en octets.
    pub const fn size(self) -> i64 {
        match self {
            Self::Void => 0,
            Self::Int => 8,
            #[allow(clippy::cast_possible_wrap)]
            Self::Str => core::mem::size_of::<usize>() as i64,
        }
    }

    /// Type résultat d'une opération binaire sur `self` et `other`.
    #[must_use]
    pub const fn wider(self, other: Self) -> Self {
        if other.size() > self.size() { other } else { self }
    }

    /// Vrai pour les types qui produisent une valeur.
    pub const fn has_value(self) -> bool { !matches!(self, Self::Void) }
}

impl From<TypeName> for Type {
    fn from(t: TypeName) -> Self {
        match t {
            TypeName::Int => Self::Int,
            TypeName::Void => Self::Void,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Void => "void",
            Self::Int => "int",
            Self::Str => "string",
        })
    }
}
