// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Types shared between the control plane and the classification
//! engine: match fields, predicates, flow descriptions and the
//! responses used to dump a flow table.

#![no_std]
#![deny(unreachable_patterns)]
#![deny(unused_must_use)]

#[cfg(any(feature = "std", test))]
#[macro_use]
extern crate std;

#[macro_use]
extern crate alloc;

use alloc::string::String;
use core::fmt;
use core::fmt::Display;
use serde::Deserialize;
use serde::Serialize;

pub mod cmd;
pub mod flow;
pub mod ip;
pub mod mac;
pub mod oxm;

pub use cmd::*;
pub use flow::*;
pub use ip::*;
pub use mac::*;
pub use oxm::*;

/// The lowest OpenFlow flow priority.
pub const OFP_MIN_PRIORITY: u16 = 0;

/// The priority given to flows when the control plane does not
/// specify one.
pub const OFP_DEFAULT_PRIORITY: u16 = 0x8000;

/// The highest OpenFlow flow priority.
pub const OFP_MAX_PRIORITY: u16 = u16::MAX;

/// The lookup structure a flow table classifies packets with.
///
/// All strategies implement the same contract: the flow returned for a
/// packet is the matching flow with the highest priority, and among
/// equal priorities the one with the lowest [`FlowId`].
#[derive(
    Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// A priority-sorted array scanned top-down.
    Linear,

    /// A tree of discriminator-field indices with linear leaves.
    #[default]
    Tree,

    /// Per-priority buckets of hash tables, one table per structural
    /// signature.
    TableHash,
}

impl core::str::FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> core::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "linear" => Ok(Self::Linear),
            "tree" => Ok(Self::Tree),
            "table_hash" | "thtable" => Ok(Self::TableHash),
            _ => Err(format!("invalid strategy: {s}")),
        }
    }
}

impl Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Self::Linear => "linear",
            Self::Tree => "tree",
            Self::TableHash => "table_hash",
        };
        write!(f, "{s}")
    }
}

/// The outermost discriminator of a [`Strategy::Tree`] classifier.
#[derive(
    Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize,
)]
#[serde(rename_all = "snake_case")]
pub enum TreeRoot {
    #[default]
    Vlan,
    InPort,
    Metadata,
}

impl core::str::FromStr for TreeRoot {
    type Err = String;

    fn from_str(s: &str) -> core::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "vlan" => Ok(Self::Vlan),
            "in_port" => Ok(Self::InPort),
            "metadata" => Ok(Self::Metadata),
            _ => Err(format!("invalid tree root: {s}")),
        }
    }
}

impl Display for TreeRoot {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Self::Vlan => "vlan",
            Self::InPort => "in_port",
            Self::Metadata => "metadata",
        };
        write!(f, "{s}")
    }
}
