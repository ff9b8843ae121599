// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! The contract every lookup strategy satisfies.

use super::flow::FlowEntry;
use super::flow::FlowRef;
use super::flow::Rank;
use super::linear::LinearClassifier;
use super::packet::PacketView;
use super::thtable::ThTable;
use super::tree::TreeClassifier;
use crate::api::Result;
use crate::api::Strategy;
use crate::api::TreeRoot;

/// A structure answering "which flow does this packet belong to".
///
/// Every implementation agrees on the winner: the matching flow of
/// highest priority, and among those the one with the lowest
/// [`FlowId`](crate::api::FlowId).
pub trait Classify {
    /// Insert `flow`.
    ///
    /// # Errors
    ///
    /// On error the classifier is left exactly as it was.
    fn add(&mut self, flow: &FlowRef) -> Result<()>;

    /// Remove the flow with the same id as `flow`.
    fn remove(&mut self, flow: &FlowEntry) -> Result<FlowRef>;

    /// Find the best flow matching `pkt` that strictly beats `floor`.
    fn lookup(&self, pkt: &PacketView, floor: Option<Rank>)
    -> Option<&FlowRef>;

    /// Find the installed flow structurally equal to `probe`.
    fn find(&self, probe: &FlowEntry) -> Option<&FlowRef>;

    fn len(&self) -> usize;

    /// Every installed flow, in no particular order.
    fn flows(&self) -> Vec<FlowRef>;
}

#[derive(Clone)]
pub enum Classifier {
    Linear(LinearClassifier),
    Tree(TreeClassifier),
    TableHash(ThTable),
}

impl Classifier {
    pub fn new(strategy: Strategy, root: TreeRoot) -> Self {
        match strategy {
            Strategy::Linear => Self::Linear(LinearClassifier::new()),
            Strategy::Tree => Self::Tree(TreeClassifier::new(root)),
            Strategy::TableHash => Self::TableHash(ThTable::default()),
        }
    }

    /// Build a classifier of `strategy` holding `flows`.
    pub fn build<'a, I>(
        strategy: Strategy,
        root: TreeRoot,
        flows: I,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = &'a FlowRef>,
    {
        if strategy == Strategy::TableHash {
            return ThTable::rebuild(flows).map(Self::TableHash);
        }

        let mut c = Self::new(strategy, root);
        for flow in flows {
            c.add(flow)?;
        }
        Ok(c)
    }

    pub fn strategy(&self) -> Strategy {
        match self {
            Self::Linear(_) => Strategy::Linear,
            Self::Tree(_) => Strategy::Tree,
            Self::TableHash(_) => Strategy::TableHash,
        }
    }

    /// Look up the winner for `pkt` and count the packet against it.
    pub fn classify(&self, pkt: &PacketView) -> Option<&FlowRef> {
        let winner = self.lookup(pkt, None)?;
        winner.hit(pkt.len());
        Some(winner)
    }

    /// Verify the internal bookkeeping of the classifier.
    pub fn check_invariants(&self) -> Result<()> {
        match self {
            Self::Linear(c) => c.check_order(),
            Self::Tree(c) => c.check_invariants(),
            Self::TableHash(c) => c.check_invariants(),
        }
    }
}

impl Classify for Classifier {
    fn add(&mut self, flow: &FlowRef) -> Result<()> {
        match self {
            Self::Linear(c) => c.add(flow),
            Self::Tree(c) => c.add(flow),
            Self::TableHash(c) => c.add(flow),
        }
    }

    fn remove(&mut self, flow: &FlowEntry) -> Result<FlowRef> {
        match self {
            Self::Linear(c) => c.remove(flow),
            Self::Tree(c) => c.remove(flow),
            Self::TableHash(c) => c.remove(flow),
        }
    }

    #[inline]
    fn lookup(
        &self,
        pkt: &PacketView,
        floor: Option<Rank>,
    ) -> Option<&FlowRef> {
        match self {
            Self::Linear(c) => c.lookup(pkt, floor),
            Self::Tree(c) => c.lookup(pkt, floor),
            Self::TableHash(c) => c.lookup(pkt, floor),
        }
    }

    fn find(&self, probe: &FlowEntry) -> Option<&FlowRef> {
        match self {
            Self::Linear(c) => c.find(probe),
            Self::Tree(c) => c.find(probe),
            Self::TableHash(c) => c.find(probe),
        }
    }

    fn len(&self) -> usize {
        match self {
            Self::Linear(c) => c.len(),
            Self::Tree(c) => c.len(),
            Self::TableHash(c) => c.len(),
        }
    }

    fn flows(&self) -> Vec<FlowRef> {
        match self {
            Self::Linear(c) => c.flows(),
            Self::Tree(c) => c.flows(),
            Self::TableHash(c) => c.flows(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::api::FlowId;
    use crate::api::FlowSpec;
    use crate::api::MatchPredicate;
    use std::sync::Arc;

    const STRATEGIES: [Strategy; 3] =
        [Strategy::Linear, Strategy::Tree, Strategy::TableHash];

    #[test]
    fn classify_counts_only_the_winner() {
        let lo = Arc::new(FlowEntry::new(FlowId(1), FlowSpec::new(1)).unwrap());
        let hi = Arc::new(
            FlowEntry::new(
                FlowId(2),
                FlowSpec::new(2).with_match(MatchPredicate::in_port(4)),
            )
            .unwrap(),
        );

        let frame = [0u8; 60];
        let pkt = PacketView::parse(&frame, 4).unwrap();
        for s in STRATEGIES {
            let c = Classifier::build(s, TreeRoot::default(), [&lo, &hi])
                .unwrap();
            assert_eq!(c.strategy(), s);
            assert_eq!(c.len(), 2);
            assert_eq!(c.classify(&pkt).unwrap().id(), FlowId(2));
            c.check_invariants().unwrap();
        }

        assert_eq!(hi.packets(), 3);
        assert_eq!(hi.bytes(), 180);
        assert_eq!(lo.packets(), 0);
    }
}
