//! Random paste key generation.
//!
//! Keys are short strings drawn from a fixed alphabet. The generator
//! remembers every key it has handed out and redraws on collision, so a
//! key is never issued twice within one process lifetime.

use std::collections::HashSet;

use rand::{rng, Rng};

/// Number of symbols in a paste key.
pub const KEY_LENGTH: usize = 6;

/// Symbols a key may be built from. Note there is no `0`, only `1`-`9`.
pub const KEY_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz123456789";

/// Issues unique paste keys.
///
/// Not internally synchronized; the store keeps it behind its own lock.
#[derive(Debug, Default)]
pub struct KeyGenerator {
    taken: HashSet<String>,
}

impl KeyGenerator {
    /// Create a generator with no keys issued yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Produce a key that has never been returned by this generator.
    pub fn generate(&mut self) -> String {
        loop {
            let key = random_key();
            if self.taken.insert(key.clone()) {
                return key;
            }
        }
    }

    /// Number of keys issued so far.
    pub fn issued(&self) -> usize {
        self.taken.len()
    }
}

fn random_key() -> String {
    let mut rng = rng();
    let mut key = String::with_capacity(KEY_LENGTH);
    for _ in 0..KEY_LENGTH {
        key.push(KEY_ALPHABET[rng.random_range(0..KEY_ALPHABET.len())] as char);
    }
    key
}
