//! Sparse table of latches indexed by (key, relay) (C4).

use std::hash::Hash;

use hashbrown::HashMap;

use crate::latch::{Latch, LatchHandle};

/// For input `relay -> [keys]`, creates exactly one latch per (key, relay)
/// pair, such that a key's latches are exactly the relays carrying it.
pub struct LatchMatrix<K, R, T> {
    entries: HashMap<(K, R), (Latch<T>, LatchHandle<T>)>,
}

impl<K, R, T> LatchMatrix<K, R, T>
where
    K: Eq + Hash + Clone,
    R: Eq + Hash + Clone,
    T: Clone,
{
    pub fn build(relay_to_keys: &HashMap<R, Vec<K>>) -> Self {
        let mut entries = HashMap::new();
        for (relay, keys) in relay_to_keys {
            for key in keys {
                entries
                    .entry((key.clone(), relay.clone()))
                    .or_insert_with(Latch::new);
            }
        }
        Self { entries }
    }

    pub fn latch(&self, key: &K, relay: &R) -> Option<&Latch<T>> {
        self.entries.get(&(key.clone(), relay.clone())).map(|(l, _)| l)
    }

    /// All latch handles carrying `key`, one per relay that was given this
    /// key when the matrix was built.
    pub fn handles_for_key(&self, key: &K) -> Vec<LatchHandle<T>> {
        self.entries
            .iter()
            .filter(|((k, _), _)| k == key)
            .map(|(_, (_, handle))| handle.clone())
            .collect()
    }

    /// All (key, latch) pairs carried by `relay`, for resolving remaining
    /// latches on early termination (§4.7.4).
    pub fn entries_for_relay(&self, relay: &R) -> Vec<(K, Latch<T>)> {
        self.entries
            .iter()
            .filter(|((_, r), _)| r == relay)
            .map(|((k, _), (latch, _))| (k.clone(), latch.clone()))
            .collect()
    }
}
