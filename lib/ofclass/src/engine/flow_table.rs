// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! The flow table.
//!
//! The table owns its flow entries and a working classifier, both
//! behind a writer lock. Every mutation is applied to a private copy of
//! that state; only when the whole mutation succeeds is the copy kept
//! and published to the packet path as a new immutable snapshot. A
//! failed mutation leaves both the table and the packet path exactly as
//! they were.
//!
//! The copy is cheap: the flow map and the classifier are shared with
//! the published snapshot and copied on write, and the classifiers in
//! turn share every part of themselves a mutation does not touch.

use super::cache::FlowCache;
use super::classifier::Classifier;
use super::classifier::Classify;
use super::flow::FlowEntry;
use super::flow::FlowRef;
use super::packet::PacketView;
use super::stat::TableStats;
use crate::api::ClassifierError;
use crate::api::DumpFlowTableResp;
use crate::api::FlowFlags;
use crate::api::FlowId;
use crate::api::FlowMod;
use crate::api::FlowSpec;
use crate::api::Result;
use crate::api::Strategy;
use crate::api::TableStatsDump;
use crate::api::TreeRoot;
use crate::cfg::ClassifierConfig;
use crate::dynamic::Dynamic;
use crate::dynamic::Snapshot;
use crate::provider::LogLevel;
use crate::provider::Providers;
use crate::sync::KMutex;
use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::sync::Arc;

/// What the packet path sees of a flow table.
pub struct TableSnapshot {
    classifier: Arc<Classifier>,
    flows: Arc<BTreeMap<FlowId, FlowRef>>,
}

impl TableSnapshot {
    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    pub fn get(&self, id: FlowId) -> Option<&FlowRef> {
        self.flows.get(&id)
    }

    pub fn len(&self) -> usize {
        self.flows.len()
    }
}

#[derive(Clone)]
struct Inner {
    flows: Arc<BTreeMap<FlowId, FlowRef>>,
    working: Arc<Classifier>,
    tree_root: TreeRoot,
    next_id: u64,
}

impl Inner {
    fn snapshot(&self) -> TableSnapshot {
        TableSnapshot {
            classifier: self.working.clone(),
            flows: self.flows.clone(),
        }
    }

    fn add(&mut self, spec: FlowSpec, limit: u32) -> Result<FlowId> {
        let probe = FlowEntry::probe(spec.clone())?;

        if let Some(old) = self.working.find(&probe).cloned() {
            let flow = Arc::new(FlowEntry::new(old.id(), spec)?);
            if !flow.flags().contains(FlowFlags::RESET_COUNTS) {
                flow.inherit_counts(&old);
            }
            let working = Arc::make_mut(&mut self.working);
            working.remove(&old)?;
            working.add(&flow)?;
            Arc::make_mut(&mut self.flows).insert(flow.id(), flow);
            return Ok(old.id());
        }

        if self.flows.len() >= limit as usize {
            return Err(ClassifierError::MaxCapacity(u64::from(limit)));
        }

        if probe.flags().contains(FlowFlags::CHECK_OVERLAP) {
            let overlap = self.flows.values().find(|f| f.overlaps(&probe));
            if let Some(f) = overlap {
                return Err(ClassifierError::Overlap(f.id()));
            }
        }

        let id = FlowId(self.next_id);
        let flow = Arc::new(FlowEntry::new(id, spec)?);
        Arc::make_mut(&mut self.working).add(&flow)?;
        Arc::make_mut(&mut self.flows).insert(id, flow);
        self.next_id += 1;
        Ok(id)
    }

    fn remove(&mut self, id: FlowId) -> Result<FlowRef> {
        let flow = self.flows.get(&id).ok_or(ClassifierError::NotFound)?;
        let removed = Arc::make_mut(&mut self.working).remove(flow)?;
        Arc::make_mut(&mut self.flows).remove(&id);
        Ok(removed)
    }

    fn remove_matching(&mut self, spec: FlowSpec) -> Result<FlowRef> {
        let probe = FlowEntry::probe(spec)?;
        let id = self
            .working
            .find(&probe)
            .map(|f| f.id())
            .ok_or(ClassifierError::NotFound)?;
        self.remove(id)
    }

    fn rebuild(&mut self, strategy: Strategy, root: TreeRoot) -> Result<()> {
        let working = Classifier::build(strategy, root, self.flows.values())?;
        self.working = Arc::new(working);
        self.tree_root = root;
        Ok(())
    }
}

pub struct FlowTable {
    table_id: u8,
    cfg: ClassifierConfig,
    inner: KMutex<Inner>,
    snap: Dynamic<TableSnapshot>,
    stats: TableStats,
    providers: Providers,
}

impl FlowTable {
    pub fn new(
        table_id: u8,
        cfg: ClassifierConfig,
        providers: Providers,
    ) -> Self {
        let inner = Inner {
            flows: Arc::new(BTreeMap::new()),
            working: Arc::new(Classifier::new(cfg.strategy, cfg.tree_root)),
            tree_root: cfg.tree_root,
            next_id: 0,
        };
        let snap = Dynamic::from(inner.snapshot());

        Self {
            table_id,
            cfg,
            inner: KMutex::new(inner),
            snap,
            stats: TableStats::default(),
            providers,
        }
    }

    /// Apply `f` to a copy of the table state, keeping and publishing
    /// the copy only when `f` succeeds.
    fn mutate<T, F>(&self, op: &str, f: F) -> Result<T>
    where
        F: FnOnce(&mut Inner) -> Result<T>,
    {
        let mut inner = self.inner.lock();
        let mut stage = inner.clone();

        match f(&mut stage) {
            Ok(v) => {
                let snap = stage.snapshot();
                *inner = stage;
                self.snap.store(snap);
                Ok(v)
            }

            Err(e) => {
                self.log_err(op, &e);
                Err(e)
            }
        }
    }

    fn log_err(&self, op: &str, err: &ClassifierError) {
        let level = match err {
            ClassifierError::StructuralInconsistency(_) => LogLevel::Error,
            ClassifierError::TooManySignatures { .. }
            | ClassifierError::OutOfMemory => LogLevel::Warn,
            _ => return,
        };

        self.providers.log.log(
            level,
            &format!("table {}: {op} failed: {err}", self.table_id),
        );
    }

    /// Install a flow, returning its id.
    ///
    /// A flow whose priority and match are identical to an installed
    /// flow's replaces it and takes over its id; its counters carry
    /// over unless [`FlowFlags::RESET_COUNTS`] is set.
    ///
    /// # Errors
    ///
    /// * [`ClassifierError::MaxCapacity`]: the table is full.
    /// * [`ClassifierError::Overlap`]: `CHECK_OVERLAP` was requested
    ///   and an installed flow of the same priority could match the
    ///   same packets.
    /// * [`ClassifierError::DuplicateField`]: the match is invalid.
    pub fn add(&self, spec: FlowSpec) -> Result<FlowId> {
        let limit = self.cfg.max_flows;
        self.mutate("add", |inner| inner.add(spec, limit))
    }

    pub fn remove(&self, id: FlowId) -> Result<FlowRef> {
        self.mutate("remove", |inner| inner.remove(id))
    }

    /// Remove the flow whose priority and match are identical to
    /// those of `spec`.
    pub fn remove_matching(&self, spec: FlowSpec) -> Result<FlowRef> {
        self.mutate("remove", |inner| inner.remove_matching(spec))
    }

    /// Apply a batch of modifications as one: either every modification
    /// succeeds and a single new snapshot is published, or the table is
    /// left untouched.
    ///
    /// Returns the id of the flow each modification added or removed.
    pub fn apply(&self, mods: Vec<FlowMod>) -> Result<Vec<FlowId>> {
        let limit = self.cfg.max_flows;
        self.mutate("apply", |inner| {
            let mut ids = Vec::with_capacity(mods.len());
            for m in mods {
                let id = match m {
                    FlowMod::Add(spec) => inner.add(spec, limit)?,
                    FlowMod::Remove(id) => inner.remove(id)?.id(),
                    FlowMod::RemoveStrict(spec) => {
                        inner.remove_matching(spec)?.id()
                    }
                };
                ids.push(id);
            }
            Ok(ids)
        })
    }

    /// Find the installed flow whose priority and match are identical
    /// to those of `spec`.
    pub fn find(&self, spec: FlowSpec) -> Result<Option<FlowRef>> {
        let probe = FlowEntry::probe(spec)?;
        let snap = self.snap.load();
        Ok(snap.classifier.find(&probe).cloned())
    }

    pub fn get(&self, id: FlowId) -> Option<FlowRef> {
        self.snap.load().flows.get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.snap.load().flows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn strategy(&self) -> Strategy {
        self.snap.load().classifier.strategy()
    }

    /// Rebuild the classifier from the installed flows.
    pub fn rebuild(&self) -> Result<()> {
        self.mutate("rebuild", |inner| {
            let strategy = inner.working.strategy();
            let root = inner.tree_root;
            inner.rebuild(strategy, root)
        })
    }

    /// Switch the table to a different lookup strategy.
    pub fn set_strategy(
        &self,
        strategy: Strategy,
        root: TreeRoot,
    ) -> Result<()> {
        let res =
            self.mutate("set strategy", |inner| inner.rebuild(strategy, root));
        if res.is_ok() {
            self.providers.log.log(
                LogLevel::Note,
                &format!("table {}: strategy now {strategy}", self.table_id),
            );
        }
        res
    }

    /// The epoch of the current snapshot; it advances with every
    /// successful mutation.
    pub fn epoch(&self) -> u64 {
        self.snap.epoch()
    }

    pub fn snapshot(&self) -> Snapshot<TableSnapshot> {
        self.snap.load()
    }

    /// A result cache sized for this table, or `None` when the table is
    /// configured without one.
    pub fn new_cache(&self) -> Option<FlowCache> {
        if !self.cfg.cache.enabled {
            return None;
        }
        let per = NonZeroUsize::new(self.cfg.cache.entries_per_bucket)?;
        Some(FlowCache::new(per))
    }

    /// Find the flow `pkt` belongs to and count the packet against it.
    ///
    /// With a cache, a result computed from the current snapshot is
    /// reused; otherwise the snapshot's classifier is consulted and the
    /// result registered.
    pub fn classify(
        &self,
        pkt: &PacketView,
        cache: Option<&mut FlowCache>,
    ) -> Option<FlowRef> {
        let snap = self.snap.load();

        let winner = match cache {
            Some(cache) => {
                let hash = pkt.hash64();
                match cache.lookup(hash, snap.epoch).map(|e| e.flow()) {
                    Some(id) => {
                        let flow = id.and_then(|id| snap.flows.get(&id));
                        if let Some(flow) = flow {
                            flow.hit(pkt.len());
                        }
                        flow.cloned()
                    }

                    None => {
                        let flow = snap.classifier.classify(pkt).cloned();
                        cache.register(
                            hash,
                            snap.epoch,
                            flow.as_ref().map(|f| f.id()),
                        );
                        flow
                    }
                }
            }

            None => snap.classifier.classify(pkt).cloned(),
        };

        self.stats.lookup(winner.is_some());
        winner
    }

    pub fn stats(&self) -> TableStatsDump {
        self.stats.dump(self.len() as u64)
    }

    /// Dump every flow in the order they win lookups.
    pub fn dump(&self) -> DumpFlowTableResp {
        let snap = self.snap.load();
        let mut flows: Vec<_> = snap.flows.values().collect();
        flows.sort_by(|a, b| b.rank().cmp(&a.rank()));

        DumpFlowTableResp {
            table_id: self.table_id,
            strategy: snap.classifier.strategy(),
            epoch: snap.epoch,
            limit: u64::from(self.cfg.max_flows),
            stats: self.stats.dump(snap.flows.len() as u64),
            flows: flows.into_iter().map(|f| f.dump()).collect(),
        }
    }

    /// Verify that the arena, the working classifier and the published
    /// snapshot agree.
    #[cfg(any(test, feature = "test-help"))]
    pub fn check_invariants(&self) -> Result<()> {
        let inner = self.inner.lock();
        inner.working.check_invariants()?;

        let mut held: Vec<_> =
            inner.working.flows().iter().map(|f| f.id()).collect();
        held.sort();
        let owned: Vec<_> = inner.flows.keys().copied().collect();
        if held != owned {
            return Err(ClassifierError::StructuralInconsistency(format!(
                "classifier holds {held:?}, table owns {owned:?}"
            )));
        }

        let snap = self.snap.load();
        if snap.flows.len() != inner.flows.len()
            || snap.classifier.len() != inner.working.len()
        {
            return Err(ClassifierError::StructuralInconsistency(
                "snapshot differs from table".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::api::MatchPredicate;
    use crate::provider::NullLog;

    fn table(strategy: Strategy, max_flows: u32) -> FlowTable {
        let cfg =
            ClassifierConfig { strategy, max_flows, ..Default::default() };
        FlowTable::new(0, cfg, Providers { log: Box::new(NullLog) })
    }

    fn port_flow(priority: u16, port: u32) -> FlowSpec {
        FlowSpec::new(priority).with_match(MatchPredicate::in_port(port))
    }

    const FRAME: [u8; 14] = [0; 14];

    #[test]
    fn add_replace_and_remove() {
        let t = table(Strategy::Linear, 8);
        let a = t.add(port_flow(5, 1)).unwrap();
        assert_eq!(a, FlowId(0));

        let pkt = PacketView::parse(&FRAME, 1).unwrap();
        t.classify(&pkt, None).unwrap();

        // An identical flow replaces the original and keeps its id and
        // counts.
        let again = t.add(port_flow(5, 1).with_cookie(9)).unwrap();
        assert_eq!(again, a);
        assert_eq!(t.len(), 1);
        let f = t.get(a).unwrap();
        assert_eq!((f.cookie(), f.packets()), (9, 1));

        let reset = port_flow(5, 1).with_flags(FlowFlags::RESET_COUNTS);
        t.add(reset).unwrap();
        assert_eq!(t.get(a).unwrap().packets(), 0);

        assert_eq!(t.remove_matching(port_flow(5, 1)).unwrap().id(), a);
        assert!(t.is_empty());
        assert_eq!(t.remove(a).unwrap_err(), ClassifierError::NotFound);
        t.check_invariants().unwrap();
    }

    #[test]
    fn capacity_and_overlap() {
        let t = table(Strategy::Tree, 2);
        t.add(port_flow(5, 1)).unwrap();

        let wide = FlowSpec::new(5)
            .with_match(MatchPredicate::tcp_dst(22))
            .with_flags(FlowFlags::CHECK_OVERLAP);
        assert_eq!(
            t.add(wide).unwrap_err(),
            ClassifierError::Overlap(FlowId(0))
        );

        t.add(port_flow(5, 2)).unwrap();
        assert_eq!(
            t.add(port_flow(5, 3)).unwrap_err(),
            ClassifierError::MaxCapacity(2)
        );
        // Replacing is not limited by capacity.
        t.add(port_flow(5, 2)).unwrap();
        t.check_invariants().unwrap();
    }

    #[test]
    fn batch_is_all_or_nothing() {
        let t = table(Strategy::TableHash, 8);
        let epoch = t.epoch();
        let err = t
            .apply(vec![
                FlowMod::Add(port_flow(1, 1)),
                FlowMod::Remove(FlowId(42)),
            ])
            .unwrap_err();
        assert_eq!(err, ClassifierError::NotFound);
        assert!(t.is_empty());
        assert_eq!(t.epoch(), epoch);

        let ids = t
            .apply(vec![
                FlowMod::Add(port_flow(1, 1)),
                FlowMod::Add(port_flow(2, 1)),
                FlowMod::RemoveStrict(port_flow(1, 1)),
            ])
            .unwrap();
        // Ids used by a failed batch are not consumed.
        assert_eq!(ids, vec![FlowId(0), FlowId(1), FlowId(0)]);
        assert_eq!(t.len(), 1);
        assert_eq!(t.epoch(), epoch + 1);
        t.check_invariants().unwrap();
    }

    #[test]
    fn cache_follows_snapshots() {
        let t = table(Strategy::Tree, 8);
        let mut cache = t.new_cache().unwrap();
        let pkt = PacketView::parse(&FRAME, 1).unwrap();

        assert!(t.classify(&pkt, Some(&mut cache)).is_none());
        assert!(t.classify(&pkt, Some(&mut cache)).is_none());
        assert_eq!((cache.stats().hit, cache.stats().miss), (1, 1));

        let id = t.add(port_flow(1, 1)).unwrap();
        let hit = t.classify(&pkt, Some(&mut cache)).unwrap();
        assert_eq!(hit.id(), id);
        // Served from the cache, still counted.
        t.classify(&pkt, Some(&mut cache)).unwrap();
        assert_eq!(hit.packets(), 2);
        assert_eq!(cache.stats().hit, 2);

        let stats = t.stats();
        assert_eq!((stats.lookups, stats.matched, stats.flows), (4, 2, 1));
    }

    #[test]
    fn snapshots_are_isolated() {
        let t = table(Strategy::Tree, 8);
        let id = t.add(port_flow(1, 1)).unwrap();
        let before = t.snapshot();

        t.remove(id).unwrap();
        let pkt = PacketView::parse(&FRAME, 1).unwrap();
        assert!(before.classifier().lookup(&pkt, None).is_some());
        assert!(t.classify(&pkt, None).is_none());
    }

    #[test]
    fn published_state_is_shared() {
        let t = table(Strategy::Tree, 8);
        t.add(port_flow(1, 1)).unwrap();
        let snap = t.snapshot();
        {
            let inner = t.inner.lock();
            assert!(Arc::ptr_eq(&inner.working, &snap.classifier));
            assert!(Arc::ptr_eq(&inner.flows, &snap.flows));
        }

        // A failed mutation publishes nothing and copies nothing.
        let epoch = t.epoch();
        t.remove(FlowId(7)).unwrap_err();
        assert_eq!(t.epoch(), epoch);
        let inner = t.inner.lock();
        assert!(Arc::ptr_eq(&inner.working, &snap.classifier));
    }

    #[test]
    fn switch_strategy() {
        let t = table(Strategy::Linear, 8);
        t.add(port_flow(3, 1)).unwrap();
        t.add(port_flow(4, 1)).unwrap();

        for s in [Strategy::Tree, Strategy::TableHash, Strategy::Linear] {
            t.set_strategy(s, TreeRoot::InPort).unwrap();
            assert_eq!(t.strategy(), s);
            let pkt = PacketView::parse(&FRAME, 1).unwrap();
            assert_eq!(t.classify(&pkt, None).unwrap().id(), FlowId(1));
            t.check_invariants().unwrap();
        }

        let dump = t.dump();
        assert_eq!(dump.flows.len(), 2);
        assert_eq!(dump.flows[0].priority, 4);
        assert_eq!(dump.flows[0].packets, 3);
    }
}
