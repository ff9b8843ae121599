// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Common routines for integration tests and benches.

// This type of pedantry is more trouble than it's worth here.
#![allow(dead_code)]

pub mod flowgen;
pub mod frame;
pub mod reference;

// Let's make our lives easier and pub use a bunch of stuff.
pub use flowgen::GenFrame;
pub use flowgen::Generator;
pub use frame::DST_MAC;
pub use frame::FrameBuilder;
pub use frame::SRC_MAC;
pub use ofclass::api::ClassifierError;
pub use ofclass::api::FlowFlags;
pub use ofclass::api::FlowId;
pub use ofclass::api::FlowMod;
pub use ofclass::api::FlowSpec;
pub use ofclass::api::Instruction;
pub use ofclass::api::Ipv4Addr;
pub use ofclass::api::Ipv4Cidr;
pub use ofclass::api::Ipv6Addr;
pub use ofclass::api::Ipv6Cidr;
pub use ofclass::api::MacAddr;
pub use ofclass::api::MatchPredicate;
pub use ofclass::api::OxmField;
pub use ofclass::api::Strategy;
pub use ofclass::api::TreeRoot;
pub use ofclass::cfg::ClassifierConfig;
pub use ofclass::engine::Classifier;
pub use ofclass::engine::Classify;
pub use ofclass::engine::FlowCache;
pub use ofclass::engine::FlowEntry;
pub use ofclass::engine::FlowRef;
pub use ofclass::engine::FlowTable;
pub use ofclass::engine::PacketView;
pub use ofclass::provider::Providers;
pub use reference::reference_lookup;
pub use reference::reference_match;
pub use std::sync::Arc;

use ofclass::provider::SlogLog;
use slog::Drain;

/// The strategies every classifier test runs against.
pub const STRATEGIES: [Strategy; 3] =
    [Strategy::Linear, Strategy::Tree, Strategy::TableHash];

/// A terminal logger whose output is captured by the test harness.
/// `RUST_LOG` filters it.
pub fn test_logger() -> slog::Logger {
    let decorator =
        slog_term::PlainSyncDecorator::new(slog_term::TestStdoutWriter);
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_envlogger::new(drain).fuse();
    let drain = slog_async::Async::new(drain).build().fuse();
    slog::Logger::root(drain, slog::o!("component" => "ofclass-test"))
}

/// Providers which log through [`test_logger`].
pub fn test_providers() -> Providers {
    Providers { log: Box::new(SlogLog::new(test_logger())) }
}

/// A flow table for tests with the given strategy and flow limit.
pub fn test_table(strategy: Strategy, max_flows: u32) -> FlowTable {
    let cfg =
        ClassifierConfig { strategy, max_flows, ..Default::default() };
    FlowTable::new(0, cfg, test_providers())
}

/// Build an installed-looking flow entry with the given id.
pub fn flow(id: u64, spec: FlowSpec) -> FlowRef {
    Arc::new(FlowEntry::new(FlowId(id), spec).expect("valid flow spec"))
}
