// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Counters bumped on the packet path.

use crate::api::FlowFlags;
use crate::api::TableStatsDump;
use core::sync::atomic::AtomicU64;
use core::sync::atomic::Ordering;

/// The packet and byte counts of one flow entry.
#[derive(Debug, Default)]
pub struct FlowCounter {
    pub packets: AtomicU64,
    pub bytes: AtomicU64,
}

impl FlowCounter {
    /// Record one packet of `pkt_size` bytes, unless `flags` suppress
    /// either count.
    #[inline]
    pub fn hit(&self, flags: FlowFlags, pkt_size: u64) {
        if !flags.contains(FlowFlags::NO_PKT_COUNTS) {
            self.packets.fetch_add(1, Ordering::Relaxed);
        }
        if !flags.contains(FlowFlags::NO_BYT_COUNTS) {
            self.bytes.fetch_add(pkt_size, Ordering::Relaxed);
        }
    }

    pub fn packets(&self) -> u64 {
        self.packets.load(Ordering::Relaxed)
    }

    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }
}

/// Lookup counts of a flow table.
#[derive(Debug, Default)]
pub struct TableStats {
    pub lookups: AtomicU64,
    pub matched: AtomicU64,
}

impl TableStats {
    #[inline]
    pub fn lookup(&self, matched: bool) {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        if matched {
            self.matched.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn dump(&self, flows: u64) -> TableStatsDump {
        TableStatsDump {
            flows,
            lookups: self.lookups.load(Ordering::Relaxed),
            matched: self.matched.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn suppression_flags() {
        let c = FlowCounter::default();
        c.hit(FlowFlags::empty(), 100);
        c.hit(FlowFlags::NO_PKT_COUNTS, 100);
        c.hit(FlowFlags::NO_BYT_COUNTS, 100);
        assert_eq!(c.packets(), 2);
        assert_eq!(c.bytes(), 200);

        let t = TableStats::default();
        t.lookup(true);
        t.lookup(false);
        let d = t.dump(3);
        assert_eq!((d.flows, d.lookups, d.matched), (3, 2, 1));
    }
}
