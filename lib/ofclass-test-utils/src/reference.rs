// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! A brute-force matcher to hold the classifiers to.
//!
//! Every predicate of every flow is evaluated on its own, without any
//! compiled form, and the winner is picked by rank.

use ofclass::engine::FlowEntry;
use ofclass::engine::FlowRef;
use ofclass::engine::PacketView;
use ofclass::engine::compile::predicate_holds;

/// Does `pkt` satisfy every predicate of `flow`?
pub fn reference_match(flow: &FlowEntry, pkt: &PacketView) -> bool {
    flow.matches().iter().all(|p| predicate_holds(p, flow.l3(), pkt))
}

/// The flow of `flows` which `pkt` should classify to: the matching
/// flow of highest priority, the lowest id breaking ties.
pub fn reference_lookup<'a, I>(
    flows: I,
    pkt: &PacketView,
) -> Option<&'a FlowRef>
where
    I: IntoIterator<Item = &'a FlowRef>,
{
    flows
        .into_iter()
        .filter(|f| reference_match(f, pkt))
        .max_by_key(|f| f.rank())
}
