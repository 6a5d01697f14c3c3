//! Flux d'octets extensible qui contient les records encodés.

use super::instr::RECORD_SIZE;
use crate::{CoreError, CoreResult};

/// Pas de croissance du flux.
pub const GROWTH: usize = 1024;

/// Un record relu depuis un flux.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawRecord {
    /// Octet d'opcode.
    pub op: u8,
    /// Opérande a.
    pub a: i64,
    /// Opérande b.
    pub b: i64,
}

/// Buffer d'octets en ajout seul ; la capacité ne fait que croître.
///
/// Un ajout simple le fait croître de [`GROWTH`] octets ; une concaténation
/// réserve la taille ajoutée arrondie au multiple de [`GROWTH`] supérieur.
/// `Clone` fait une copie profonde.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ByteStream {
    buf: Vec<u8>,
}

impl ByteStream {
    /// Flux vide.
    pub const fn new() -> Self { Self { buf: Vec::new() } }

    /// Flux vide avec de la place pour au moins `cap` octets.
    pub fn with_capacity(cap: usize) -> Self {
        let mut s = Self::new();
        s.reserve(cap);
        s
    }

    /// Octets écrits.
    pub fn len(&self) -> usize { self.buf.len() }

    /// Vrai si rien n'a été écrit.
    pub fn is_empty(&self) -> bool { self.buf.is_empty() }

    /// Taille allouée.
    pub fn capacity(&self) -> usize { self.buf.capacity() }

    /// Contenu.
    pub fn as_bytes(&self) -> &[u8] { &self.buf }

    /// Consomme le flux.
    pub fn into_vec(self) -> Vec<u8> { self.buf }

    fn reserve(&mut self, extra: usize) {
        let free = self.buf.capacity() - self.buf.len();
        if free < extra {
            self.buf.reserve_exact(extra.max(1).next_multiple_of(GROWTH));
        }
    }

    /// Ajoute un octet.
    pub fn push_u8(&mut self, v: u8) {
        self.reserve(1);
        self.buf.push(v);
    }

    /// Ajoute un `u64` little-endian.
    pub fn push_u64(&mut self, v: u64) {
        self.reserve(8);
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    /// Ajoute un `i64` little-endian.
    pub fn push_i64(&mut self, v: i64) {
        self.reserve(8);
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    /// Ajoute le contenu d'un autre flux.
    pub fn append(&mut self, other: &Self) {
        self.reserve(other.len());
        self.buf.extend_from_slice(&other.buf);
    }

    /// Remplace en place chaque occurrence disjointe de `pattern`.
    ///
    /// Les deux slices ont la même longueur. Retourne le nombre de remplacements.
    pub fn replace(&mut self, pattern: &[u8], replacement: &[u8]) -> CoreResult<usize> {
        if pattern.len() != replacement.len() {
            return Err(CoreError::PatternLength { pattern: pattern.len(), replacement: replacement.len() });
        }
        if pattern.is_empty() {
            return Ok(0);
        }
        let n = pattern.len();
        let mut count = 0;
        let mut i = 0;
        while i + n <= self.buf.len() {
            if &self.buf[i..i + n] == pattern {
                self.buf[i..i + n].copy_from_slice(replacement);
                count += 1;
                i += n;
            } else {
                i += 1;
            }
        }
        Ok(count)
    }

    /// Lit le record qui commence à l'octet `at`.
    pub fn record(&self, at: usize) -> CoreResult<RawRecord> {
        let bytes = at
            .checked_add(RECORD_SIZE)
            .and_then(|end| self.buf.get(at..end))
            .ok_or(CoreError::UnexpectedEof { needed: RECORD_SIZE, at })?;
        let field = |from: usize| {
            let mut le = [0u8; 8];
            le.copy_from_slice(&bytes[from..from + 8]);
            i64::from_le_bytes(le)
        };
        Ok(RawRecord { op: bytes[0], a: field(1), b: field(9) })
    }
}

impl AsRef<[u8]> for ByteStream {
    fn as_ref(&self) -> &[u8] { &self.buf }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn single_bytes_grow_in_steps() {
        let mut s = ByteStream::new();
        s.push_u8(1);
        assert!(s.capacity() >= GROWTH);
        for _ in 0..GROWTH {
            s.push_u8(0);
        }
        assert_eq!(s.len(), GROWTH + 1);
        assert!(s.capacity() >= 2 * GROWTH);
    }

    #[test]
    fn append_reserves_by_size() {
        let mut big = ByteStream::new();
        for i in 0..3000u32 {
            big.push_u8(i.to_le_bytes()[0]);
        }
        let mut s = ByteStream::new();
        s.push_u8(9);
        s.append(&big);
        assert_eq!(s.len(), 3001);
        assert_eq!(s.as_bytes()[1..], big.as_bytes()[..]);
    }

    #[test]
    fn clone_is_deep() {
        let mut a = ByteStream::new();
        a.push_u64(0xDEAD_BEEF);
        let mut b = a.clone();
        b.push_u8(1);
        assert_eq!(a.len(), 8);
        assert_eq!(b.len(), 9);
    }

    #[test]
    fn replace_in_place() -> CoreResult<()> {
        let mut s = ByteStream::new();
        for b in b"abcabcab" {
            s.push_u8(*b);
        }
        assert_eq!(s.replace(b"abc", b"xyz")?, 2);
        assert_eq!(s.as_bytes(), b"xyzxyzab");
        assert_eq!(s.replace(b"zz", b"q"), Err(CoreError::PatternLength { pattern: 2, replacement: 1 }));
        Ok(())
    }

    #[test]
    fn short_record_is_eof() {
        let mut s = ByteStream::new();
        s.push_u8(0x20);
        assert_eq!(s.record(0), Err(CoreError::UnexpectedEof { needed: RECORD_SIZE, at: 0 }));
    }

    proptest! {
        #[test]
        fn capacity_never_shrinks(chunks in proptest::collection::vec(proptest::collection::vec(any::<u8>(), 0..300), 0..20)) {
            let mut s = ByteStream::new();
            let mut last = 0;
            for chunk in &chunks {
                let mut other = ByteStream::new();
                for b in chunk {
                    other.push_u8(*b);
                }
                s.append(&other);
                prop_assert!(s.capacity() >= last);
                prop_assert!(s.capacity() >= s.len());
                last = s.capacity();
            }
            let total: usize = chunks.iter().map(Vec::len).sum();
            prop_assert_eq!(s.len(), total);
        }
    }
}
