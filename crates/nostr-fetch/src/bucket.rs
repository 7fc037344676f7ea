//! Per-key bounded event accumulator used by the per-author strategies (C3).

use std::hash::Hash;

use hashbrown::{HashMap, HashSet};

use crate::types::{Event, EventId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketState {
    Open,
    Fulfilled,
    Dropped,
}

pub struct BucketAddResult {
    pub state: BucketState,
    /// Populated only on the insert that reaches the cap.
    pub events: Option<Vec<Event>>,
}

struct Bucket {
    seen: HashSet<EventId>,
    events: Vec<Event>,
    fulfilled: bool,
}

/// Insertion-ordered, per-key capped accumulator. Created at the start of a
/// per-author fetch, destroyed when all keys are fulfilled or the fetch
/// ends.
pub struct EventBucketTable<K> {
    cap: usize,
    buckets: HashMap<K, Bucket>,
}

impl<K: Eq + Hash + Clone> EventBucketTable<K> {
    pub fn new(keys: impl IntoIterator<Item = K>, cap_per_key: usize) -> Self {
        let buckets = keys
            .into_iter()
            .map(|k| {
                (
                    k,
                    Bucket {
                        seen: HashSet::new(),
                        events: Vec::new(),
                        fulfilled: cap_per_key == 0,
                    },
                )
            })
            .collect();
        Self {
            cap: cap_per_key,
            buckets,
        }
    }

    /// Inserts `event` under `key`. Unknown keys and keys already at
    /// capacity are *dropped*; within-bucket duplicate ids are dropped
    /// without affecting the cap.
    pub fn add(&mut self, key: &K, event: Event) -> BucketAddResult {
        let Some(bucket) = self.buckets.get_mut(key) else {
            return BucketAddResult {
                state: BucketState::Dropped,
                events: None,
            };
        };

        if bucket.fulfilled {
            return BucketAddResult {
                state: BucketState::Dropped,
                events: None,
            };
        }

        if !bucket.seen.insert(event.id) {
            return BucketAddResult {
                state: BucketState::Open,
                events: None,
            };
        }

        bucket.events.push(event);

        if bucket.events.len() >= self.cap {
            bucket.fulfilled = true;
            BucketAddResult {
                state: BucketState::Fulfilled,
                events: Some(bucket.events.clone()),
            }
        } else {
            BucketAddResult {
                state: BucketState::Open,
                events: None,
            }
        }
    }

    pub fn get_bucket(&self, key: &K) -> Option<&[Event]> {
        self.buckets.get(key).map(|b| b.events.as_slice())
    }

    pub fn is_fulfilled(&self, key: &K) -> bool {
        self.buckets.get(key).is_some_and(|b| b.fulfilled)
    }

    pub fn all_fulfilled(&self) -> bool {
        self.buckets.values().all(|b| b.fulfilled)
    }

    /// `keys` = every not-yet-fulfilled key; `limit` = summed remaining
    /// capacity across them, for the next REQ's `limit` field (§4.3).
    pub fn calc_keys_and_limit_for_next_req(&self) -> (Vec<K>, usize) {
        let mut keys = Vec::new();
        let mut limit = 0;
        for (key, bucket) in &self.buckets {
            if !bucket.fulfilled {
                keys.push(key.clone());
                limit += self.cap - bucket.events.len();
            }
        }
        (keys, limit)
    }
}
