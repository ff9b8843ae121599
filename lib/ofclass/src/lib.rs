// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! OpenFlow flow classification.
//!
//! Given the parsed headers of a packet, find the highest-priority flow
//! entry of a flow table whose match it satisfies. Three lookup
//! strategies are provided behind one [`engine::classifier::Classify`]
//! contract, a flow table owning the flows and publishing immutable
//! snapshots of its classifier to the packet path, and an optional
//! per-worker result cache.

#![allow(clippy::len_without_is_empty)]
#![deny(unreachable_patterns)]
#![deny(unused_must_use)]

#[macro_use]
extern crate cfg_if;

pub use ofclass_api as api;

pub mod cfg;
pub mod dynamic;
pub mod engine;
pub mod provider;
pub mod sync;

cfg_if! {
    if #[cfg(any(feature = "std", test))] {
        pub mod print;
    }
}
