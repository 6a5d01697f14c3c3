//! Symboles et pile de portées.
//!
//! La portée 0 ne contient que des fonctions. Un en-tête de fonction ouvre la
//! portée 1, où les paramètres vivent en `fp+16`, `fp+24`, ... (au-dessus du
//! frame pointer sauvé et de l'adresse de retour). Les locales sont allouées
//! vers le bas depuis `fp-8` par un compteur par fonction ; quitter une portée
//! rend leurs octets.

use std::collections::HashMap;

use crate::arena::{ArenaError, GenArena, Handle};
use crate::diag::SemanticError;
use crate::types::Type;

/// Offset du premier paramètre par rapport au frame pointer.
pub const FIRST_PARAM_OFFSET: i64 = 16;

/// Signature et état de liaison d'une fonction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionSig {
    /// Types des paramètres, dans l'ordre de déclaration.
    pub params: Vec<Type>,
    /// Type de retour.
    pub ret: Type,
    /// Offset du corps une fois le programme placé.
    pub address: Option<usize>,
    /// Un corps a été compilé.
    pub defined: bool,
}

impl FunctionSig {
    /// Signature sans corps ni adresse.
    pub const fn new(params: Vec<Type>, ret: Type) -> Self { Self { params, ret, address: None, defined: false } }

    fn same_shape(&self, other: &Self) -> bool { self.params == other.params && self.ret == other.ret }
}

/// Ce que désigne un symbole.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SymbolKind {
    /// Slot de frame en `fp + offset`.
    Variable { offset: i64, param: bool },
    /// Fonction.
    Function(FunctionSig),
}

/// Nom déclaré.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub name: String,
    pub ty: Type,
    pub kind: SymbolKind,
    pub line: u32,
}

impl Symbol {
    /// Offset de frame d'une variable.
    pub const fn offset(&self) -> Option<i64> {
        match self.kind {
            SymbolKind::Variable { offset, .. } => Some(offset),
            SymbolKind::Function(_) => None,
        }
    }

    /// Signature d'une fonction.
    pub const fn signature(&self) -> Option<&FunctionSig> {
        match &self.kind {
            SymbolKind::Function(sig) => Some(sig),
            SymbolKind::Variable { .. } => None,
        }
    }

    /// Signature mutable d'une fonction.
    pub fn signature_mut(&mut self) -> Option<&mut FunctionSig> {
        match &mut self.kind {
            SymbolKind::Function(sig) => Some(sig),
            SymbolKind::Variable { .. } => None,
        }
    }
}

/// Pile de tables de noms, avec l'allocation de frame de la fonction courante.
#[derive(Debug)]
pub struct Scopes {
    levels: Vec<HashMap<String, Handle<Symbol>>>,
    allocated: i64,
}

impl Default for Scopes {
    fn default() -> Self { Self { levels: vec![HashMap::new()], allocated: 0 } }
}

impl Scopes {
    /// Retour à une portée 0 seule et vide.
    pub fn reset(&mut self) {
        self.levels.clear();
        self.levels.push(HashMap::new());
        self.allocated = 0;
    }

    /// Profondeur courante (0 = portée des fonctions).
    pub fn depth(&self) -> usize { self.levels.len() - 1 }

    /// Octets de locales actuellement alloués dans la fonction.
    pub const fn allocated(&self) -> i64 { self.allocated }

    /// Ouvre une portée.
    pub fn enter(&mut self) { self.levels.push(HashMap::new()); }

    /// Ferme la portée la plus interne et libère ses symboles.
    ///
    /// Retourne les octets de locales rendus (paramètres exclus).
    pub fn exit(&mut self, symbols: &mut GenArena<Symbol>) -> Result<i64, ArenaError> {
        if self.levels.len() == 1 {
            return Ok(0);
        }
        let level = self.levels.pop().unwrap_or_default();
        let mut freed = 0;
        for handle in level.into_values() {
            let sym = symbols.take(handle)?;
            if let SymbolKind::Variable { param: false, .. } = sym.kind {
                freed += sym.ty.size();
            }
        }
        self.allocated -= freed;
        Ok(freed)
    }

    /// Résout un nom de la portée interne vers l'extérieur.
    pub fn lookup(&self, name: &str) -> Option<Handle<Symbol>> {
        self.levels.iter().rev().find_map(|level| level.get(name).copied())
    }

    /// Déclare une locale dans la portée interne, au prochain slot de frame.
    pub fn declare_local(
        &mut self,
        symbols: &mut GenArena<Symbol>,
        name: &str,
        ty: Type,
        line: u32,
    ) -> Result<Handle<Symbol>, SemanticError> {
        self.check_free(name)?;
        self.allocated += ty.size();
        let kind = SymbolKind::Variable { offset: -self.allocated, param: false };
        Ok(self.bind(symbols, Symbol { name: name.to_owned(), ty, kind, line }))
    }

    /// Déclare le paramètre d'indice `index` de la fonction en cours.
    pub fn declare_param(
        &mut self,
        symbols: &mut GenArena<Symbol>,
        name: &str,
        ty: Type,
        index: usize,
        line: u32,
    ) -> Result<Handle<Symbol>, SemanticError> {
        self.check_free(name)?;
        let offset = FIRST_PARAM_OFFSET + 8 * i64::try_from(index).unwrap_or(i64::MAX / 16);
        let kind = SymbolKind::Variable { offset, param: true };
        Ok(self.bind(symbols, Symbol { name: name.to_owned(), ty, kind, line }))
    }

    /// Déclare (ou redéclare, pour les prototypes) une fonction en portée 0.
    pub fn declare_function(
        &mut self,
        symbols: &mut GenArena<Symbol>,
        name: &str,
        sig: FunctionSig,
        line: u32,
    ) -> Result<Handle<Symbol>, SemanticError> {
        if let Some(&existing) = self.levels[0].get(name) {
            let same = symbols
                .get(existing)
                .ok()
                .and_then(Symbol::signature)
                .is_some_and(|prev| prev.same_shape(&sig));
            return if same { Ok(existing) } else { Err(SemanticError::ConflictingDeclaration(name.to_owned())) };
        }
        let ty = sig.ret;
        let handle = symbols.insert(Symbol { name: name.to_owned(), ty, kind: SymbolKind::Function(sig), line });
        self.levels[0].insert(name.to_owned(), handle);
        Ok(handle)
    }

    /// Démarre l'allocation pour une nouvelle fonction.
    pub fn begin_function(&mut self) {
        self.allocated = 0;
        self.enter();
    }

    fn check_free(&self, name: &str) -> Result<(), SemanticError> {
        let current = self.levels.last().is_some_and(|level| level.contains_key(name));
        if current { Err(SemanticError::ConflictingDeclaration(name.to_owned())) } else { Ok(()) }
    }

    fn bind(&mut self, symbols: &mut GenArena<Symbol>, sym: Symbol) -> Handle<Symbol> {
        let name = sym.name.clone();
        let handle = symbols.insert(sym);
        if let Some(level) = self.levels.last_mut() {
            level.insert(name, handle);
        }
        handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (Scopes, GenArena<Symbol>) { (Scopes::default(), GenArena::new("symbol")) }

    #[test]
    fn locals_grow_downwards() {
        let (mut sc, mut syms) = setup();
        sc.begin_function();
        let a = sc.declare_local(&mut syms, "a", Type::Int, 1).unwrap();
        let b = sc.declare_local(&mut syms, "b", Type::Int, 1).unwrap();
        assert_eq!(syms.get(a).unwrap().offset(), Some(-8));
        assert_eq!(syms.get(b).unwrap().offset(), Some(-16));
        assert_eq!(sc.allocated(), 16);
    }

    #[test]
    fn params_sit_above_the_frame() {
        let (mut sc, mut syms) = setup();
        sc.begin_function();
        let p0 = sc.declare_param(&mut syms, "x", Type::Int, 0, 1).unwrap();
        let p1 = sc.declare_param(&mut syms, "y", Type::Int, 1, 1).unwrap();
        assert_eq!(syms.get(p0).unwrap().offset(), Some(16));
        assert_eq!(syms.get(p1).unwrap().offset(), Some(24));
        assert_eq!(sc.exit(&mut syms), Ok(0));
        assert!(syms.is_empty());
    }

    #[test]
    fn shadowing_and_conflicts() {
        let (mut sc, mut syms) = setup();
        sc.begin_function();
        let outer = sc.declare_local(&mut syms, "x", Type::Int, 1).unwrap();
        assert_eq!(
            sc.declare_local(&mut syms, "x", Type::Int, 2),
            Err(SemanticError::ConflictingDeclaration("x".into()))
        );
        sc.enter();
        let inner = sc.declare_local(&mut syms, "x", Type::Int, 3).unwrap();
        assert_eq!(sc.lookup("x"), Some(inner));
        assert_eq!(sc.exit(&mut syms), Ok(8));
        assert_eq!(sc.lookup("x"), Some(outer));
        assert!(!syms.contains(inner));
        assert_eq!(sc.allocated(), 8);
    }

    #[test]
    fn prototypes_must_agree() {
        let (mut sc, mut syms) = setup();
        let f = sc.declare_function(&mut syms, "f", FunctionSig::new(vec![Type::Int], Type::Int), 1).unwrap();
        let again = sc.declare_function(&mut syms, "f", FunctionSig::new(vec![Type::Int], Type::Int), 2).unwrap();
        assert_eq!(f, again);
        assert_eq!(
            sc.declare_function(&mut syms, "f", FunctionSig::new(vec![], Type::Int), 3),
            Err(SemanticError::ConflictingDeclaration("f".into()))
        );
        sc.begin_function();
        assert_eq!(sc.lookup("f"), Some(f));
        assert_eq!(sc.depth(), 1);
    }
}
