// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! A per-worker cache of classification results.
//!
//! Results are keyed by [`PacketView::hash64`]. The high half of the
//! hash picks a bucket, the low half tells entries of a bucket apart.
//! Each entry remembers the snapshot epoch it was computed in; once the
//! flow table publishes a new snapshot every entry is stale, and the
//! first lookup to notice drops them all.
//!
//! [`PacketView::hash64`]: super::packet::PacketView::hash64

use super::hash::hash32_h;
use super::hash::hash32_l;
use crate::api::CacheStatsDump;
use crate::api::FlowId;
use std::collections::HashMap;
use std::collections::VecDeque;
use std::num::NonZeroUsize;

pub const CACHE_NODE_MAX_ENTRIES: usize = 4;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CacheEntry {
    hash64: u64,
    /// The winning flow, or `None` when no flow matched.
    flow: Option<FlowId>,
}

impl CacheEntry {
    pub fn flow(&self) -> Option<FlowId> {
        self.flow
    }
}

#[derive(Debug)]
pub struct FlowCache {
    buckets: HashMap<u32, VecDeque<CacheEntry>>,
    entries_per_bucket: NonZeroUsize,
    epoch: u64,
    entries: usize,
    hit: u64,
    miss: u64,
}

impl Default for FlowCache {
    fn default() -> Self {
        let per = NonZeroUsize::new(CACHE_NODE_MAX_ENTRIES)
            .unwrap_or(NonZeroUsize::MIN);
        Self::new(per)
    }
}

impl FlowCache {
    pub fn new(entries_per_bucket: NonZeroUsize) -> Self {
        Self {
            buckets: HashMap::new(),
            entries_per_bucket,
            epoch: 0,
            entries: 0,
            hit: 0,
            miss: 0,
        }
    }

    /// Find the result cached for `hash64`, as computed from the
    /// snapshot of `epoch`.
    pub fn lookup(&mut self, hash64: u64, epoch: u64) -> Option<&CacheEntry> {
        if epoch != self.epoch {
            self.flush(epoch);
        }

        let lo = hash32_l(hash64);
        let found = self
            .buckets
            .get(&hash32_h(hash64))
            .and_then(|b| b.iter().find(|e| hash32_l(e.hash64) == lo));

        match found {
            Some(e) => {
                self.hit += 1;
                Some(e)
            }

            None => {
                self.miss += 1;
                None
            }
        }
    }

    /// Remember the result for `hash64`, evicting the oldest entry of
    /// its bucket when full.
    pub fn register(&mut self, hash64: u64, epoch: u64, flow: Option<FlowId>) {
        if epoch != self.epoch {
            self.flush(epoch);
        }

        let per = self.entries_per_bucket.get();
        let bucket = self.buckets.entry(hash32_h(hash64)).or_default();
        let lo = hash32_l(hash64);

        if let Some(e) = bucket.iter_mut().find(|e| hash32_l(e.hash64) == lo) {
            e.flow = flow;
            return;
        }

        if bucket.len() >= per {
            bucket.pop_front();
            self.entries -= 1;
        }
        bucket.push_back(CacheEntry { hash64, flow });
        self.entries += 1;
    }

    fn flush(&mut self, epoch: u64) {
        self.buckets.clear();
        self.entries = 0;
        self.epoch = epoch;
    }

    /// Drop every entry and reset the counters.
    pub fn clear(&mut self) {
        self.buckets.clear();
        self.entries = 0;
        self.hit = 0;
        self.miss = 0;
    }

    pub fn len(&self) -> usize {
        self.entries
    }

    pub fn stats(&self) -> CacheStatsDump {
        CacheStatsDump {
            entries: self.entries as u64,
            hit: self.hit,
            miss: self.miss,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn cache(per: usize) -> FlowCache {
        FlowCache::new(NonZeroUsize::new(per).unwrap())
    }

    // Hashes sharing a bucket, told apart by their low half.
    fn key(bucket: u32, lo: u32) -> u64 {
        (u64::from(bucket) << 32) | u64::from(lo)
    }

    #[test]
    fn hit_and_miss() {
        let mut c = cache(4);
        assert!(c.lookup(key(1, 1), 0).is_none());
        c.register(key(1, 1), 0, Some(FlowId(7)));
        c.register(key(1, 2), 0, None);

        assert_eq!(c.lookup(key(1, 1), 0).unwrap().flow(), Some(FlowId(7)));
        // A negative result is still a hit.
        assert_eq!(c.lookup(key(1, 2), 0).unwrap().flow(), None);
        assert_eq!(c.stats(), CacheStatsDump { entries: 2, hit: 2, miss: 1 });
    }

    #[test]
    fn oldest_is_evicted() {
        let mut c = cache(2);
        for lo in 1..=3 {
            c.register(key(9, lo), 0, Some(FlowId(u64::from(lo))));
        }
        assert_eq!(c.len(), 2);
        assert!(c.lookup(key(9, 1), 0).is_none());
        assert!(c.lookup(key(9, 2), 0).is_some());
        assert!(c.lookup(key(9, 3), 0).is_some());

        // Other buckets are unaffected by a full one.
        c.register(key(10, 1), 0, None);
        assert_eq!(c.len(), 3);
    }

    #[test]
    fn register_replaces_same_key() {
        let mut c = cache(2);
        c.register(key(1, 1), 0, Some(FlowId(1)));
        c.register(key(1, 1), 0, Some(FlowId(2)));
        assert_eq!(c.len(), 1);
        assert_eq!(c.lookup(key(1, 1), 0).unwrap().flow(), Some(FlowId(2)));
    }

    #[test]
    fn new_epoch_flushes() {
        let mut c = cache(4);
        c.register(key(1, 1), 3, Some(FlowId(1)));
        assert!(c.lookup(key(1, 1), 4).is_none());
        assert_eq!(c.len(), 0);

        c.register(key(1, 1), 4, Some(FlowId(1)));
        assert!(c.lookup(key(1, 1), 4).is_some());
        assert_eq!(c.stats(), CacheStatsDump { entries: 1, hit: 1, miss: 1 });

        c.clear();
        assert_eq!(c.stats(), CacheStatsDump::default());
    }
}
