// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! The classification engine.
pub mod cache;
pub mod classifier;
pub mod compile;
pub mod field;
pub mod flow;
pub mod flow_table;
pub mod hash;
pub mod headers;
pub mod linear;
pub mod packet;
pub mod stat;
pub mod thtable;
pub mod tree;

pub use cache::FlowCache;
pub use classifier::Classifier;
pub use classifier::Classify;
pub use compile::CompiledMatch;
pub use flow::FlowEntry;
pub use flow::FlowRef;
pub use flow::Rank;
pub use flow_table::FlowTable;
pub use flow_table::TableSnapshot;
pub use linear::LinearClassifier;
pub use packet::PacketView;
pub use packet::ParseError;
pub use thtable::ThTable;
pub use tree::TreeClassifier;
