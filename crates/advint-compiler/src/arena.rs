//! Arènes générationnelles pour les nœuds du compilateur.
//!
//! Chaque nœud produit par les actions de la grammaire (symboles, expressions,
//! instructions, déclarations, cibles d'appel non résolues) vit dans une
//! [`GenArena`] et se désigne par un [`Handle`] typé. Retirer un nœud incrémente
//! la génération de son slot : un handle utilisé après libération, ou libéré
//! deux fois, donne [`ArenaError::Stale`] au lieu de viser un nœud plus récent.

use core::fmt;
use core::hash::{Hash, Hasher};
use core::marker::PhantomData;

use advint_core::ExternRef;
use thiserror::Error;

use crate::expr::Expression;
use crate::stmt::{Declaration, Statement};
use crate::symbols::Symbol;

/// Accès via un handle qui ne désigne plus de nœud vivant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("stale {kind} handle #{index} (generation {generation})")]
pub struct ArenaError {
    /// Type de nœud de l'arène.
    pub kind: &'static str,
    /// Index du slot.
    pub index: u32,
    /// Génération portée par le handle.
    pub generation: u32,
}

/* ───────────────────────── Handles ───────────────────────── */

/// Handle générationnel typé.
pub struct Handle<T> {
    idx: u32,
    gen: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    const fn new(idx: u32, gen: u32) -> Self { Self { idx, gen, _marker: PhantomData } }

    /// Index du slot.
    pub const fn index(self) -> u32 { self.idx }

    /// Génération.
    pub const fn generation(self) -> u32 { self.gen }

    /// Encode le handle dans un opérande d'instruction.
    pub fn to_extern(self) -> ExternRef { ExternRef((u64::from(self.gen) << 32) | u64::from(self.idx)) }

    /// Décode un handle encodé par [`Handle::to_extern`].
    #[allow(clippy::cast_possible_truncation)]
    pub const fn from_extern(r: ExternRef) -> Self { Self::new(r.0 as u32, (r.0 >> 32) as u32) }
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self { *self }
}
impl<T> Copy for Handle<T> {}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "Handle({}v{})", self.idx, self.gen) }
}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool { self.idx == other.idx && self.gen == other.gen }
}
impl<T> Eq for Handle<T> {}

impl<T> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.idx.hash(state);
        self.gen.hash(state);
    }
}

/* ───────────────────────── GenArena ───────────────────────── */

#[derive(Debug)]
struct Slot<T> {
    gen: u32,
    val: Option<T>,
}

/// Arène de `T` adressée par [`Handle<T>`].
#[derive(Debug)]
pub struct GenArena<T> {
    kind: &'static str,
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    len: usize,
}

impl<T> GenArena<T> {
    /// Arène vide ; `kind` nomme les nœuds dans les erreurs.
    pub const fn new(kind: &'static str) -> Self { Self { kind, slots: Vec::new(), free: Vec::new(), len: 0 } }

    /// Nœuds vivants.
    pub const fn len(&self) -> usize { self.len }

    /// Vrai si aucun nœud n'est vivant.
    pub const fn is_empty(&self) -> bool { self.len == 0 }

    /// Stocke un nœud.
    pub fn insert(&mut self, v: T) -> Handle<T> {
        self.len += 1;
        if let Some(idx) = self.free.pop() {
            let s = &mut self.slots[idx as usize];
            debug_assert!(s.val.is_none());
            s.val = Some(v);
            Handle::new(idx, s.gen)
        } else {
            let idx = u32::try_from(self.slots.len()).unwrap_or(u32::MAX);
            self.slots.push(Slot { gen: 0, val: Some(v) });
            Handle::new(idx, 0)
        }
    }

    /// Vrai tant que `h` désigne un nœud vivant.
    pub fn contains(&self, h: Handle<T>) -> bool { self.get(h).is_ok() }

    /// Accès partagé.
    pub fn get(&self, h: Handle<T>) -> Result<&T, ArenaError> {
        self.slots
            .get(h.idx as usize)
            .filter(|s| s.gen == h.gen)
            .and_then(|s| s.val.as_ref())
            .ok_or_else(|| self.stale(h))
    }

    /// Accès exclusif.
    pub fn get_mut(&mut self, h: Handle<T>) -> Result<&mut T, ArenaError> {
        let err = self.stale(h);
        self.slots
            .get_mut(h.idx as usize)
            .filter(|s| s.gen == h.gen)
            .and_then(|s| s.val.as_mut())
            .ok_or(err)
    }

    /// Retire un nœud et invalide toutes les copies de son handle.
    pub fn take(&mut self, h: Handle<T>) -> Result<T, ArenaError> {
        let err = self.stale(h);
        let slot = self.slots.get_mut(h.idx as usize).filter(|s| s.gen == h.gen).ok_or(err)?;
        let v = slot.val.take().ok_or(err)?;
        slot.gen = slot.gen.wrapping_add(1);
        self.free.push(h.idx);
        self.len -= 1;
        Ok(v)
    }

    /// Vide l'arène. Les générations avancent : les anciens handles restent invalides.
    pub fn clear(&mut self) {
        self.free.clear();
        for (idx, slot) in self.slots.iter_mut().enumerate() {
            if slot.val.take().is_some() {
                slot.gen = slot.gen.wrapping_add(1);
            }
            self.free.push(u32::try_from(idx).unwrap_or(u32::MAX));
        }
        self.free.reverse();
        self.len = 0;
    }

    /// Nœuds vivants avec leurs handles.
    pub fn iter(&self) -> impl Iterator<Item = (Handle<T>, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.val.as_ref().map(|v| (Handle::new(u32::try_from(i).unwrap_or(u32::MAX), s.gen), v)))
    }

    const fn stale(&self, h: Handle<T>) -> ArenaError {
        ArenaError { kind: self.kind, index: h.idx, generation: h.gen }
    }
}

/* ───────────────────────── NodeArena ───────────────────────── */

/// Site d'appel en attente du linker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExternNode {
    /// Fonction appelée.
    pub function: Handle<Symbol>,
    /// Ligne source de l'appel.
    pub line: u32,
}

/// Toutes les arènes d'un contexte de compilation.
#[derive(Debug)]
pub struct NodeArena {
    /// Variables et fonctions.
    pub symbols: GenArena<Symbol>,
    /// Expressions en attente de leur action parente.
    pub exprs: GenArena<Expression>,
    /// Instructions en attente de leur action parente.
    pub stmts: GenArena<Statement>,
    /// Déclarateurs en attente de leur déclaration.
    pub decls: GenArena<Declaration>,
    /// Cibles d'appel non résolues.
    pub externs: GenArena<ExternNode>,
}

impl Default for NodeArena {
    fn default() -> Self {
        Self {
            symbols: GenArena::new("symbol"),
            exprs: GenArena::new("expression"),
            stmts: GenArena::new("statement"),
            decls: GenArena::new("declaration"),
            externs: GenArena::new("unresolved reference"),
        }
    }
}

impl NodeArena {
    /// Vide toutes les arènes.
    pub fn clear(&mut self) {
        self.symbols.clear();
        self.exprs.clear();
        self.stmts.clear();
        self.decls.clear();
        self.externs.clear();
    }

    /// Total des nœuds vivants.
    pub const fn live(&self) -> usize {
        self.symbols.len() + self.exprs.len() + self.stmts.len() + self.decls.len() + self.externs.len()
    }
}
