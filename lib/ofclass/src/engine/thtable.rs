// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! The table-hash classifier.
//!
//! Flows are grouped into one bucket per priority, highest first, and
//! within a bucket into one hash table per structural signature: the
//! fields a flow matches and the mask each is matched under. All flows
//! of a table hash the same bytes of a packet, so a packet needs one
//! key per table (one per candidate ethertype when the signature holds
//! `ETH_TYPE`). A hash hit is only a candidate; it is confirmed with
//! the flow's compiled match.
//!
//! Buckets, tables and key lists are shared between copies of a
//! classifier and copied on write, so changing a copy costs the bucket
//! and table it touches rather than the whole classifier.

use super::classifier::Classify;
use super::field::Placed;
use super::field::Placement;
use super::flow::FlowEntry;
use super::flow::FlowRef;
use super::flow::Rank;
use super::hash::hash_chain;
use super::packet::MAX_ETH_TYPES;
use super::packet::PacketView;
use crate::api::ClassifierError;
use crate::api::FlowId;
use crate::api::OxmField;
use crate::api::Result;
use itertools::Itertools;
use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;

/// The most distinct signatures one priority may use.
pub const HTLIST_MAX_TABLES: usize = 8;

type Keys = heapless::Vec<u64, MAX_ETH_TYPES>;

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
struct SigField {
    field: OxmField,
    at: Placement,
    mask: u128,
}

/// The shape of a flow's match, independent of its values.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
struct Signature {
    /// Placed fields in canonical field order.
    fields: Vec<SigField>,
    eth_type: bool,
}

/// The big-endian bytes a placed value occupies.
fn placed_bytes(value: u128, len: usize) -> [u8; 16] {
    let mut out = [0u8; 16];
    let be = value.to_be_bytes();
    out[..len].copy_from_slice(&be[16 - len..]);
    out
}

impl Signature {
    fn of(flow: &FlowEntry) -> Self {
        let mut fields = Vec::with_capacity(flow.field_bits().len());
        let mut eth_type = false;

        for pred in flow.field_bits().iter().filter_map(|f| flow.predicate(f)) {
            match Placed::new(pred, flow.l3()) {
                Some(p) => fields.push(SigField {
                    field: p.field,
                    at: p.at,
                    mask: p.mask,
                }),
                None => eth_type = true,
            }
        }

        Self { fields, eth_type }
    }

    /// The key a flow of this signature is stored under.
    fn flow_key(flow: &FlowEntry) -> u64 {
        let mut key = 0;
        let mut eth_type = None;

        for pred in flow.field_bits().iter().filter_map(|f| flow.predicate(f)) {
            match Placed::new(pred, flow.l3()) {
                Some(p) => {
                    let bytes = placed_bytes(p.value, p.at.len);
                    key = hash_chain(key, &bytes[..p.at.len]);
                }
                None => eth_type = Some(pred.value_u128() as u16),
            }
        }

        match eth_type {
            Some(ty) => hash_chain(key, &ty.to_be_bytes()),
            None => key,
        }
    }

    /// The keys of `pkt` under this signature; none when the packet
    /// lacks a field the signature reads.
    fn packet_keys(&self, pkt: &PacketView) -> Keys {
        let mut keys = Keys::new();
        let mut key = 0;

        for sf in &self.fields {
            let Some(v) = pkt.read(&sf.at) else {
                return keys;
            };
            let bytes = placed_bytes(v & sf.mask, sf.at.len);
            key = hash_chain(key, &bytes[..sf.at.len]);
        }

        if self.eth_type {
            for ty in pkt.eth_types() {
                let _ = keys.push(hash_chain(key, &ty.to_be_bytes()));
            }
        } else {
            let _ = keys.push(key);
        }
        keys
    }
}

#[derive(Clone)]
struct HashTable {
    sig: Signature,
    /// Flows of each key, in ascending id order.
    map: HashMap<u64, Arc<Vec<FlowRef>>>,
    count: usize,
}

impl HashTable {
    fn new(sig: Signature) -> Self {
        Self { sig, map: HashMap::new(), count: 0 }
    }

    /// Add `flow` under its key. Nothing changes on error.
    fn insert(&mut self, flow: &FlowRef) -> Result<()> {
        let key = Signature::flow_key(flow);
        match self.map.get_mut(&key) {
            Some(list) => {
                let list = Arc::make_mut(list);
                list.try_reserve(1)
                    .map_err(|_| ClassifierError::OutOfMemory)?;
                let at = list.partition_point(|f| f.id() < flow.id());
                list.insert(at, FlowRef::clone(flow));
            }

            None => {
                let mut list = Vec::new();
                list.try_reserve(1)
                    .map_err(|_| ClassifierError::OutOfMemory)?;
                self.map
                    .try_reserve(1)
                    .map_err(|_| ClassifierError::OutOfMemory)?;
                list.push(FlowRef::clone(flow));
                self.map.insert(key, Arc::new(list));
            }
        }
        self.count += 1;
        Ok(())
    }
}

#[derive(Clone)]
struct PriorityBucket {
    priority: u16,
    tables: heapless::Vec<Arc<HashTable>, HTLIST_MAX_TABLES>,
}

impl PriorityBucket {
    fn table_mut(&mut self, sig: &Signature) -> Option<&mut HashTable> {
        self.tables.iter_mut().find(|t| t.sig == *sig).map(Arc::make_mut)
    }

    /// Find the lowest-id flow of this bucket matching `pkt` which beats
    /// `floor`.
    fn lookup(
        &self,
        pkt: &PacketView,
        floor: Option<Rank>,
    ) -> Option<&FlowRef> {
        let mut best: Option<&FlowRef> = None;

        for table in &self.tables {
            for key in table.sig.packet_keys(pkt) {
                let Some(list) = table.map.get(&key) else {
                    continue;
                };

                // Lists are in id order, so the first confirmed hit is
                // the list's best.
                let hit = list.iter().find(|f| {
                    f.rank().beats(floor)
                        && best.is_none_or(|b| f.id() < b.id())
                        && f.is_match(pkt)
                });
                if let Some(hit) = hit {
                    best = Some(hit);
                }
            }
        }
        best
    }
}

/// Buckets in descending priority order.
#[derive(Clone, Default)]
pub struct ThTable {
    buckets: Vec<Arc<PriorityBucket>>,
    len: usize,
}

impl ThTable {
    /// Build a table-hash classifier holding `flows`.
    ///
    /// # Errors
    ///
    /// [`ClassifierError::TooManySignatures`] when one priority needs
    /// more than [`HTLIST_MAX_TABLES`] tables.
    pub fn rebuild<'a, I>(flows: I) -> Result<Self>
    where
        I: IntoIterator<Item = &'a FlowRef>,
    {
        let by_priority = flows.into_iter().into_group_map_by(|f| f.priority());
        let mut buckets = Vec::with_capacity(by_priority.len());
        let mut len = 0;

        for (priority, flows) in by_priority {
            let by_sig =
                flows.into_iter().into_group_map_by(|f| Signature::of(f));
            if by_sig.len() > HTLIST_MAX_TABLES {
                return Err(ClassifierError::TooManySignatures {
                    priority,
                    limit: HTLIST_MAX_TABLES,
                });
            }

            let mut bucket =
                PriorityBucket { priority, tables: heapless::Vec::new() };
            for (sig, flows) in by_sig {
                let mut table = HashTable::new(sig);
                for flow in flows {
                    table.insert(flow)?;
                    len += 1;
                }
                // Bounded by the signature check above.
                let _ = bucket.tables.push(Arc::new(table));
            }
            buckets.push(Arc::new(bucket));
        }

        buckets.sort_by(|a, b| b.priority.cmp(&a.priority));
        Ok(Self { buckets, len })
    }

    fn bucket_idx(&self, priority: u16) -> core::result::Result<usize, usize> {
        self.buckets.binary_search_by(|b| priority.cmp(&b.priority))
    }

    /// Verify every count and that each flow sits under its own key.
    pub fn check_invariants(&self) -> Result<()> {
        let mut seen: HashSet<FlowId> = HashSet::new();
        let mut total = 0;

        let sorted = self
            .buckets
            .windows(2)
            .all(|w| w[0].priority > w[1].priority);
        if !sorted {
            return Err(ClassifierError::StructuralInconsistency(
                "buckets out of priority order".into(),
            ));
        }

        for bucket in &self.buckets {
            if bucket.tables.is_empty() {
                return Err(ClassifierError::StructuralInconsistency(
                    format!("empty bucket at priority {}", bucket.priority),
                ));
            }

            for table in &bucket.tables {
                let mut n = 0;
                for (key, list) in &table.map {
                    if list.is_empty() {
                        return Err(ClassifierError::StructuralInconsistency(
                            format!("empty flow list under key {key:#x}"),
                        ));
                    }
                    for flow in list.iter() {
                        let misplaced = flow.priority() != bucket.priority
                            || Signature::of(flow) != table.sig
                            || Signature::flow_key(flow) != *key;
                        if misplaced || !seen.insert(flow.id()) {
                            return Err(
                                ClassifierError::StructuralInconsistency(
                                    format!("flow {} misplaced", flow.id()),
                                ),
                            );
                        }
                    }
                    n += list.len();
                }
                if n != table.count || n == 0 {
                    return Err(ClassifierError::StructuralInconsistency(
                        format!(
                            "table counts {} flows, holds {n}",
                            table.count
                        ),
                    ));
                }
                total += n;
            }
        }

        if total != self.len {
            return Err(ClassifierError::StructuralInconsistency(format!(
                "classifier counts {} flows, holds {total}",
                self.len
            )));
        }
        Ok(())
    }
}

impl Classify for ThTable {
    fn add(&mut self, flow: &FlowRef) -> Result<()> {
        let sig = Signature::of(flow);
        let priority = flow.priority();

        match self.bucket_idx(priority) {
            Ok(i) => {
                let bucket = Arc::make_mut(&mut self.buckets[i]);
                match bucket.table_mut(&sig) {
                    Some(table) => table.insert(flow)?,
                    None => {
                        let mut table = HashTable::new(sig);
                        table.insert(flow)?;
                        bucket.tables.push(Arc::new(table)).map_err(|_| {
                            ClassifierError::TooManySignatures {
                                priority,
                                limit: HTLIST_MAX_TABLES,
                            }
                        })?;
                    }
                }
            }

            Err(i) => {
                self.buckets
                    .try_reserve(1)
                    .map_err(|_| ClassifierError::OutOfMemory)?;
                let mut table = HashTable::new(sig);
                table.insert(flow)?;
                let mut bucket =
                    PriorityBucket { priority, tables: heapless::Vec::new() };
                let _ = bucket.tables.push(Arc::new(table));
                self.buckets.insert(i, Arc::new(bucket));
            }
        }

        self.len += 1;
        Ok(())
    }

    fn remove(&mut self, flow: &FlowEntry) -> Result<FlowRef> {
        let bi = self
            .bucket_idx(flow.priority())
            .map_err(|_| ClassifierError::NotFound)?;
        let sig = Signature::of(flow);
        let key = Signature::flow_key(flow);

        // Locate the flow before copying anything.
        let (ti, at) = {
            let tables = &self.buckets[bi].tables;
            let ti = tables
                .iter()
                .position(|t| t.sig == sig)
                .ok_or(ClassifierError::NotFound)?;
            let at = tables[ti]
                .map
                .get(&key)
                .and_then(|l| l.iter().position(|f| f.id() == flow.id()))
                .ok_or(ClassifierError::NotFound)?;
            (ti, at)
        };

        let bucket = Arc::make_mut(&mut self.buckets[bi]);
        let table = Arc::make_mut(&mut bucket.tables[ti]);
        let list = table.map.get_mut(&key).ok_or(ClassifierError::NotFound)?;
        let removed = Arc::make_mut(list).remove(at);
        if list.is_empty() {
            table.map.remove(&key);
        }
        table.count -= 1;
        if table.count == 0 {
            bucket.tables.remove(ti);
        }
        if bucket.tables.is_empty() {
            self.buckets.remove(bi);
        }

        self.len -= 1;
        Ok(removed)
    }

    fn lookup(
        &self,
        pkt: &PacketView,
        floor: Option<Rank>,
    ) -> Option<&FlowRef> {
        for bucket in &self.buckets {
            if floor.is_some_and(|f| bucket.priority < f.priority) {
                break;
            }

            // The first bucket with a confirmed hit holds the winner.
            if let Some(hit) = bucket.lookup(pkt, floor) {
                return Some(hit);
            }
        }
        None
    }

    fn find(&self, probe: &FlowEntry) -> Option<&FlowRef> {
        let bucket = &self.buckets[self.bucket_idx(probe.priority()).ok()?];
        let sig = Signature::of(probe);
        let table = bucket.tables.iter().find(|t| t.sig == sig)?;
        table
            .map
            .get(&Signature::flow_key(probe))?
            .iter()
            .find(|f| f.same_match(probe))
    }

    fn len(&self) -> usize {
        self.len
    }

    fn flows(&self) -> Vec<FlowRef> {
        self.buckets
            .iter()
            .flat_map(|b| b.tables.iter())
            .flat_map(|t| t.map.values().flat_map(|l| l.iter()))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::api::FlowSpec;
    use crate::api::MatchPredicate;
    use crate::engine::field::ETHER_TYPE_IPV4;
    use std::sync::Arc;

    fn flow(id: u64, spec: FlowSpec) -> FlowRef {
        Arc::new(FlowEntry::new(FlowId(id), spec).unwrap())
    }

    fn tcp4(dst: [u8; 4], dport: u16) -> Vec<u8> {
        let mut f = vec![0u8; 12];
        f.extend_from_slice(&ETHER_TYPE_IPV4.to_be_bytes());
        f.extend_from_slice(&[0x45, 0, 0, 40, 0, 0, 0, 0, 64, 6, 0, 0]);
        f.extend_from_slice(&[1, 1, 1, 1]);
        f.extend_from_slice(&dst);
        f.extend_from_slice(&[0, 99]);
        f.extend_from_slice(&dport.to_be_bytes());
        f.extend_from_slice(&[0; 16]);
        f
    }

    #[test]
    fn signature_limit() {
        // Nine distinct destination masks at one priority.
        let specs = (0..9u32).map(|i| {
            FlowSpec::new(1).with_match(MatchPredicate::ipv4_dst_masked(
                [10, 0, 0, 0].into(),
                (u32::MAX << i).into(),
            ))
        });
        let flows: Vec<_> =
            specs.enumerate().map(|(i, s)| flow(i as u64, s)).collect();

        let err = ThTable::rebuild(&flows).err().unwrap();
        assert_eq!(
            err,
            ClassifierError::TooManySignatures { priority: 1, limit: 8 }
        );

        let mut th = ThTable::rebuild(&flows[..8]).unwrap();
        assert_eq!(th.add(&flows[8]).unwrap_err(), err);
        assert_eq!(th.len(), 8);
        th.check_invariants().unwrap();
    }

    #[test]
    fn one_list_per_key() {
        let dst = |id, ip: [u8; 4]| {
            let m = MatchPredicate::ipv4_dst(ip.into());
            flow(id, FlowSpec::new(5).with_match(m))
        };
        let flows = [dst(1, [10, 0, 0, 1]), dst(2, [10, 0, 0, 2])];
        let mut th = ThTable::default();
        for f in &flows {
            th.add(f).unwrap();
        }
        th.add(&dst(3, [10, 0, 0, 1])).unwrap();
        th.check_invariants().unwrap();
        let keys = |th: &ThTable| th.buckets[0].tables[0].map.len();
        assert_eq!(keys(&th), 2);

        th.remove(&flows[1]).unwrap();
        assert_eq!(keys(&th), 1);
        th.check_invariants().unwrap();

        // A key left behind with no flows is a broken table.
        let bucket = Arc::make_mut(&mut th.buckets[0]);
        let table = Arc::make_mut(&mut bucket.tables[0]);
        table.map.insert(0x1234, Arc::new(Vec::new()));
        assert!(matches!(
            th.check_invariants(),
            Err(ClassifierError::StructuralInconsistency(_))
        ));
    }

    #[test]
    fn copies_share_untouched_buckets() {
        let port = |id, priority, p| {
            let m = MatchPredicate::in_port(p);
            flow(id, FlowSpec::new(priority).with_match(m))
        };
        let mut th = ThTable::default();
        th.add(&port(1, 9, 1)).unwrap();
        th.add(&port(2, 5, 1)).unwrap();

        let mut copy = th.clone();
        copy.add(&port(3, 5, 2)).unwrap();
        // Buckets are ordered by descending priority.
        assert!(Arc::ptr_eq(&th.buckets[0], &copy.buckets[0]));
        assert!(!Arc::ptr_eq(&th.buckets[1], &copy.buckets[1]));
        assert_eq!((th.len(), copy.len()), (2, 3));
        th.check_invariants().unwrap();
        copy.check_invariants().unwrap();
    }

    #[test]
    fn first_bucket_with_a_hit_wins() {
        let ip = MatchPredicate::eth_type(ETHER_TYPE_IPV4);
        let flows = [
            flow(1, FlowSpec::new(10).with_match(MatchPredicate::tcp_dst(80))),
            flow(
                2,
                FlowSpec::new(20)
                    .with_match(ip.clone())
                    .with_match(MatchPredicate::ipv4_dst([10, 0, 0, 1].into())),
            ),
            // Same priority and key shape as 2; the lower id wins ties.
            flow(
                3,
                FlowSpec::new(20)
                    .with_match(ip)
                    .with_match(MatchPredicate::ipv4_dst([10, 0, 0, 1].into())),
            ),
        ];
        let mut th = ThTable::rebuild(&flows).unwrap();
        th.check_invariants().unwrap();

        let hit = tcp4([10, 0, 0, 1], 80);
        let pkt = PacketView::parse(&hit, 1).unwrap();
        assert_eq!(th.lookup(&pkt, None).unwrap().id(), FlowId(2));

        let other = tcp4([10, 0, 0, 2], 80);
        let pkt = PacketView::parse(&other, 1).unwrap();
        assert_eq!(th.lookup(&pkt, None).unwrap().id(), FlowId(1));

        th.remove(&flows[1]).unwrap();
        let pkt = PacketView::parse(&hit, 1).unwrap();
        assert_eq!(th.lookup(&pkt, None).unwrap().id(), FlowId(3));

        th.remove(&flows[2]).unwrap();
        th.check_invariants().unwrap();
        assert_eq!(th.flows().len(), 1);
        let probe = FlowEntry::probe(FlowSpec::new(20)).unwrap();
        assert!(th.find(&probe).is_none());
    }
}
