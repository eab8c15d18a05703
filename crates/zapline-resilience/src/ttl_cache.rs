// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bounded map whose entries expire a fixed time after their last write.
//!
//! Expired entries are invisible to lookups immediately and are physically
//! removed during later writes, so no background sweeper is needed. A
//! second index keeps keys ordered by expiry, which makes both the sweep and
//! capacity eviction proportional to what they drop rather than to the size
//! of the cache. The cache is not synchronized; owners wrap it in whatever
//! lock they already hold.

use std::borrow::Borrow;
use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use std::time::Duration;

use tokio::time::Instant;

/// Position of an entry in the expiry index. The sequence number breaks
/// ties between writes landing on the same instant.
type ExpiryKey = (Instant, u64);

#[derive(Debug)]
struct Slot<V> {
    value: V,
    expires_at: Instant,
    seq: u64,
}

impl<V> Slot<V> {
    fn expiry_key(&self) -> ExpiryKey {
        (self.expires_at, self.seq)
    }
}

/// A TTL-aware, capacity-bounded key/value cache.
#[derive(Debug)]
pub struct TtlCache<K, V> {
    ttl: Duration,
    capacity: usize,
    entries: HashMap<K, Slot<V>>,
    expiry: BTreeMap<ExpiryKey, K>,
    next_seq: u64,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
{
    /// Creates an unbounded cache (capacity `usize::MAX`).
    pub fn new(ttl: Duration) -> Self {
        Self::with_capacity(ttl, usize::MAX)
    }

    /// Creates a cache that evicts the soonest-expiring entry once `capacity`
    /// live entries are stored.
    pub fn with_capacity(ttl: Duration, capacity: usize) -> Self {
        Self {
            ttl,
            capacity: capacity.max(1),
            entries: HashMap::new(),
            expiry: BTreeMap::new(),
            next_seq: 0,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Inserts or replaces a value, restarting its TTL.
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        let now = Instant::now();
        self.purge_expired_at(now);
        self.make_room(&key);
        let slot = self.index(key.clone(), value, now);
        let old = self.entries.insert(key, slot)?;
        self.expiry.remove(&old.expiry_key());
        Some(old.value)
    }

    /// Returns a live value without refreshing its TTL.
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        let now = Instant::now();
        self.entries
            .get(key)
            .filter(|slot| slot.expires_at > now)
            .map(|slot| &slot.value)
    }

    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.get(key).is_some()
    }

    /// Returns the live value for `key`, inserting `init()` when absent or
    /// expired. Either way the entry's TTL restarts.
    pub fn get_or_insert_with<F>(&mut self, key: K, init: F) -> &mut V
    where
        F: FnOnce() -> V,
    {
        let now = Instant::now();
        self.purge_expired_at(now);
        if !self.entries.contains_key(&key) {
            self.make_room(&key);
        }

        let expires_at = now + self.ttl;
        let seq = self.bump_seq();
        self.expiry.insert((expires_at, seq), key.clone());
        let slot = self.entries.entry(key).or_insert_with(|| Slot {
            value: init(),
            expires_at,
            seq,
        });
        if slot.seq != seq {
            self.expiry.remove(&slot.expiry_key());
            slot.expires_at = expires_at;
            slot.seq = seq;
        }
        &mut slot.value
    }

    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        let slot = self.entries.remove(key)?;
        self.expiry.remove(&slot.expiry_key());
        (slot.expires_at > Instant::now()).then_some(slot.value)
    }

    /// Drops every entry matching `predicate`.
    pub fn remove_where<F>(&mut self, mut predicate: F) -> usize
    where
        F: FnMut(&K, &V) -> bool,
    {
        let before = self.entries.len();
        let expiry = &mut self.expiry;
        self.entries.retain(|k, slot| {
            let drop = predicate(k, &slot.value);
            if drop {
                expiry.remove(&slot.expiry_key());
            }
            !drop
        });
        before - self.entries.len()
    }

    /// Removes expired entries and returns how many were dropped.
    pub fn purge_expired(&mut self) -> usize {
        self.purge_expired_at(Instant::now())
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let expired = self.expiry.range(..=(Instant::now(), u64::MAX)).count();
        self.entries.len() - expired
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.expiry.clear();
    }

    /// Pops index entries from the front while they are expired.
    fn purge_expired_at(&mut self, now: Instant) -> usize {
        let mut dropped = 0;
        while let Some(entry) = self.expiry.first_entry() {
            if entry.key().0 > now {
                break;
            }
            let key = entry.remove();
            self.entries.remove(&key);
            dropped += 1;
        }
        dropped
    }

    fn make_room(&mut self, key: &K) {
        if self.entries.len() >= self.capacity
            && !self.entries.contains_key(key)
            && let Some((_, victim)) = self.expiry.pop_first()
        {
            tracing::trace!(capacity = self.capacity, "ttl cache full, evicting oldest entry");
            self.entries.remove(&victim);
        }
    }

    fn index(&mut self, key: K, value: V, now: Instant) -> Slot<V> {
        let expires_at = now + self.ttl;
        let seq = self.bump_seq();
        self.expiry.insert((expires_at, seq), key);
        Slot {
            value,
            expires_at,
            seq,
        }
    }

    fn bump_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);
        seq
    }
}
