//! Random material: identifiers, tokens and key bytes.
//!
//! None of this needs cryptographic strength. What matters is that ids and
//! header values are unguessable in practice and that generated identifiers
//! are valid, non-colliding names in the target runtime.

use std::collections::HashSet;

use rand::rngs::ThreadRng;
use rand::{Rng, RngCore};

/// Characters allowed as the first character of an identifier.
pub const IDENT_START: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ_";

/// Characters allowed after the first character of an identifier.
pub const IDENT_CONTINUE: &[u8] =
    b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ_0123456789";

/// Alphabet for stage ids and header values.
pub const TOKEN_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Words a generated identifier must never be: runtime keywords plus the
/// globals the generated loaders call.
pub const RESERVED: &[&str] = &[
    "and", "break", "do", "else", "elseif", "end", "false", "for", "function", "goto", "if",
    "in", "local", "nil", "not", "or", "repeat", "return", "then", "true", "until", "while",
    "continue", "bit32", "debug", "error", "game", "loadstring", "string", "table", "self",
    "_G", "_ENV", "_VERSION",
];

/// Source of random identifiers, tokens and key bytes.
pub struct RandomMaterial<R: RngCore> {
    rng: R,
}

impl RandomMaterial<ThreadRng> {
    /// Random material backed by the thread-local generator.
    pub fn thread_local() -> Self {
        Self::new(rand::thread_rng())
    }
}

impl<R: RngCore> RandomMaterial<R> {
    /// Wrap a random number generator.
    pub fn new(rng: R) -> Self {
        Self { rng }
    }

    /// A source-code-safe identifier of `length` characters.
    ///
    /// Returns an empty string for `length == 0`.
    pub fn identifier(&mut self, length: usize) -> String {
        let mut out = String::with_capacity(length);
        for i in 0..length {
            let alphabet = if i == 0 { IDENT_START } else { IDENT_CONTINUE };
            out.push(self.pick(alphabet));
        }
        out
    }

    /// A lowercase-alphanumeric token for stage ids and header values.
    pub fn token(&mut self, length: usize) -> String {
        (0..length).map(|_| self.pick(TOKEN_ALPHABET)).collect()
    }

    /// Key material drawn from the full identifier alphabet.
    pub fn key_bytes(&mut self, length: usize) -> String {
        (0..length).map(|_| self.pick(IDENT_CONTINUE)).collect()
    }

    /// Uniform index in `0..upper`. `upper` must be non-zero.
    pub fn index(&mut self, upper: usize) -> usize {
        self.rng.gen_range(0..upper)
    }

    fn pick(&mut self, alphabet: &[u8]) -> char {
        alphabet[self.rng.gen_range(0..alphabet.len())] as char
    }
}

/// Supplies fresh identifiers and template variant choices to the mutator.
///
/// Every name returned by one supply is distinct from every other name it
/// has returned.
pub trait NameSupply {
    /// A fresh identifier, nominally `length` characters long.
    fn fresh(&mut self, length: usize) -> String;

    /// Pick one of `count` equivalent template variants.
    fn variant(&mut self, count: usize) -> usize;
}

/// Random, collision-free name allocation for one chain build.
pub struct NameAllocator<'a, R: RngCore> {
    material: &'a mut RandomMaterial<R>,
    taken: HashSet<String>,
}

/// Attempts at a given length before the allocator lengthens the name.
const ATTEMPTS_PER_LENGTH: usize = 32;

impl<'a, R: RngCore> NameAllocator<'a, R> {
    /// Allocate names from `material`.
    pub fn new(material: &'a mut RandomMaterial<R>) -> Self {
        Self {
            material,
            taken: HashSet::new(),
        }
    }

    /// Every name handed out so far.
    pub fn taken(&self) -> &HashSet<String> {
        &self.taken
    }
}

impl<R: RngCore> NameSupply for NameAllocator<'_, R> {
    fn fresh(&mut self, length: usize) -> String {
        let mut length = length.max(1);
        loop {
            for _ in 0..ATTEMPTS_PER_LENGTH {
                let candidate = self.material.identifier(length);
                if RESERVED.contains(&candidate.as_str()) || self.taken.contains(&candidate) {
                    continue;
                }
                self.taken.insert(candidate.clone());
                return candidate;
            }
            // Short name spaces fill up quickly; grow instead of spinning.
            length += 1;
        }
    }

    fn variant(&mut self, count: usize) -> usize {
        if count <= 1 {
            0
        } else {
            self.material.index(count)
        }
    }
}

/// Deterministic name supply: `_v0`, `_v1`, ... and a fixed variant.
///
/// Useful for snapshotting generated code in tests.
#[derive(Debug, Default)]
pub struct SequentialNames {
    next: usize,
    variant: usize,
}

impl SequentialNames {
    /// Sequential names, always choosing variant 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sequential names, always choosing `variant` (modulo the choice count).
    pub fn with_variant(variant: usize) -> Self {
        Self { next: 0, variant }
    }
}

impl NameSupply for SequentialNames {
    fn fresh(&mut self, _length: usize) -> String {
        let name = format!("_v{}", self.next);
        self.next += 1;
        name
    }

    fn variant(&mut self, count: usize) -> usize {
        if count == 0 {
            0
        } else {
            self.variant % count
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn material(seed: u64) -> RandomMaterial<StdRng> {
        RandomMaterial::new(StdRng::seed_from_u64(seed))
    }

    #[test]
    fn test_identifier_alphabet() {
        let mut m = material(1);
        for len in 1..40 {
            let id = m.identifier(len);
            assert_eq!(id.len(), len);
            let bytes = id.as_bytes();
            assert!(IDENT_START.contains(&bytes[0]));
            assert!(bytes.iter().all(|b| IDENT_CONTINUE.contains(b)));
        }
    }

    #[test]
    fn test_token_alphabet() {
        let mut m = material(2);
        let token = m.token(64);
        assert_eq!(token.len(), 64);
        assert!(token.bytes().all(|b| TOKEN_ALPHABET.contains(&b)));
    }

    #[test]
    fn test_tokens_do_not_repeat() {
        let mut m = material(3);
        let tokens: HashSet<String> = (0..1000).map(|_| m.token(16)).collect();
        assert_eq!(tokens.len(), 1000);
    }

    #[test]
    fn test_same_seed_same_material() {
        let mut a = material(42);
        let mut b = material(42);
        assert_eq!(a.key_bytes(48), b.key_bytes(48));
        assert_eq!(a.token(16), b.token(16));
    }

    #[test]
    fn test_allocator_never_repeats_or_uses_reserved() {
        let mut m = material(4);
        let mut names = NameAllocator::new(&mut m);
        let mut seen = HashSet::new();
        // Far more one-character names than exist; the allocator must grow.
        for _ in 0..500 {
            let name = names.fresh(1);
            assert!(!RESERVED.contains(&name.as_str()));
            assert!(seen.insert(name));
        }
        assert_eq!(names.taken().len(), 500);
    }

    #[test]
    fn test_sequential_names() {
        let mut names = SequentialNames::with_variant(3);
        assert_eq!(names.fresh(8), "_v0");
        assert_eq!(names.fresh(2), "_v1");
        assert_eq!(names.variant(2), 1);
        assert_eq!(names.variant(5), 3);
    }
}
