// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! The linear classifier: a ranked array scanned from the top.
//!
//! Entries are kept in [`Rank`] order, so the first entry to match a
//! packet is the best match of the array, and the scan may stop as soon
//! as the remaining entries can no longer beat the caller's floor.
//!
//! The same structure serves as the leaf of the tree classifier, where
//! the fields already decided by the path to the leaf are compiled out
//! of each entry's test.

use super::classifier::Classify;
use super::compile::CompiledMatch;
use super::flow::FlowEntry;
use super::flow::FlowRef;
use super::flow::Rank;
use super::packet::PacketView;
use crate::api::ClassifierError;
use crate::api::FieldSet;
use crate::api::Result;

#[derive(Clone)]
struct LinearEntry {
    flow: FlowRef,
    /// The flow's match less the fields the leaf position guarantees;
    /// `None` when nothing is guaranteed and the flow's own compiled
    /// match applies.
    compiled: Option<Box<CompiledMatch>>,
}

impl LinearEntry {
    #[inline]
    fn is_match(&self, pkt: &PacketView) -> bool {
        match &self.compiled {
            Some(c) => c.is_match(pkt),
            None => self.flow.is_match(pkt),
        }
    }
}

#[derive(Clone, Default)]
pub struct LinearClassifier {
    entries: Vec<LinearEntry>,
    except: FieldSet,
}

impl LinearClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// A classifier whose packets are known to satisfy every predicate
    /// on the fields in `except`.
    pub fn with_except(except: FieldSet) -> Self {
        Self { entries: Vec::new(), except }
    }

    pub fn except(&self) -> FieldSet {
        self.except
    }

    /// The flows in rank order.
    pub fn iter(&self) -> impl Iterator<Item = &FlowRef> {
        self.entries.iter().map(|e| &e.flow)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The index of the first entry `rank` does not lose to.
    fn insertion_point(&self, rank: Rank) -> usize {
        self.entries.partition_point(|e| e.flow.rank() > rank)
    }

    /// Verify the entries are in strictly descending rank order.
    pub fn check_order(&self) -> Result<()> {
        let sorted = self
            .entries
            .windows(2)
            .all(|w| w[0].flow.rank() > w[1].flow.rank());
        if !sorted {
            return Err(ClassifierError::StructuralInconsistency(
                "linear entries out of rank order".into(),
            ));
        }
        Ok(())
    }
}

impl Classify for LinearClassifier {
    fn add(&mut self, flow: &FlowRef) -> Result<()> {
        self.entries
            .try_reserve(1)
            .map_err(|_| ClassifierError::OutOfMemory)?;

        let compiled = if self.except.is_empty() {
            None
        } else {
            Some(Box::new(flow.compile_except(self.except)))
        };

        let idx = self.insertion_point(flow.rank());
        let entry = LinearEntry { flow: FlowRef::clone(flow), compiled };
        self.entries.insert(idx, entry);
        Ok(())
    }

    fn remove(&mut self, flow: &FlowEntry) -> Result<FlowRef> {
        let idx = self.insertion_point(flow.rank());
        match self.entries.get(idx) {
            Some(e) if e.flow.id() == flow.id() => {
                Ok(self.entries.remove(idx).flow)
            }
            _ => Err(ClassifierError::NotFound),
        }
    }

    fn lookup(
        &self,
        pkt: &PacketView,
        floor: Option<Rank>,
    ) -> Option<&FlowRef> {
        for e in &self.entries {
            if !e.flow.rank().beats(floor) {
                return None;
            }
            if e.is_match(pkt) {
                return Some(&e.flow);
            }
        }
        None
    }

    fn find(&self, probe: &FlowEntry) -> Option<&FlowRef> {
        self.iter().find(|f| f.same_match(probe))
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn flows(&self) -> Vec<FlowRef> {
        self.iter().cloned().collect()
    }
}
