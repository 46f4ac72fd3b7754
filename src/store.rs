//! In-memory paste storage.
//!
//! Provides a thread-safe store that:
//! - Assigns every paste a fresh random key on insert
//! - Returns paste bodies byte-for-byte as they were submitted
//! - Never expires or evicts; contents live until the process exits
//!
//! The key generator's issued-set and the paste map are guarded by one
//! mutex so an insert can claim a key and publish the paste atomically.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tracing::{info, trace};

use crate::keygen::KeyGenerator;

struct StoreInner {
    pastes: HashMap<String, Bytes>,
    keys: KeyGenerator,
}

/// Thread-safe in-memory paste store
pub struct PasteStore {
    inner: Mutex<StoreInner>,
}

impl PasteStore {
    /// Create a new empty store
    pub fn new() -> Arc<Self> {
        info!("Initializing paste store");
        Arc::new(Self {
            inner: Mutex::new(StoreInner {
                pastes: HashMap::new(),
                keys: KeyGenerator::new(),
            }),
        })
    }

    /// Store a paste and return the key it was filed under
    pub fn set(&self, data: Bytes) -> String {
        let mut inner = self.inner.lock().unwrap();
        let key = inner.keys.generate();
        inner.pastes.insert(key.clone(), data);

        trace!(key = %key, pastes = inner.pastes.len(), "Paste stored");
        key
    }

    /// Fetch a paste by key
    pub fn get(&self, key: &str) -> Option<Bytes> {
        let inner = self.inner.lock().ok()?;
        inner.pastes.get(key).cloned()
    }

    /// Number of pastes currently held
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().pastes.len()
    }

    /// Whether the store holds no pastes
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
