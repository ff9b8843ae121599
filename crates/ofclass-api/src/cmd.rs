// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Errors and dump responses of the flow table API.

use super::FlowFlags;
use super::FlowId;
use super::Instruction;
use super::MatchPredicate;
use super::OxmField;
use super::Strategy;
use alloc::string::String;
use alloc::vec::Vec;
use serde::Deserialize;
use serde::Serialize;

pub type Result<T> = core::result::Result<T, ClassifierError>;

/// The errors a classifier or flow table mutation may return.
///
/// The packet path never returns an error: a lookup either produces a
/// flow or it does not.
#[derive(
    Clone, Debug, Deserialize, Eq, PartialEq, Serialize, thiserror::Error,
)]
pub enum ClassifierError {
    /// An allocation failed while inserting a flow. Every structure is
    /// left as it was before the call.
    #[error("out of memory")]
    OutOfMemory,

    /// The flow is not present.
    #[error("flow not found")]
    NotFound,

    /// The OXM field id is not one of the OpenFlow basic-class fields.
    #[error("invalid match field: {0}")]
    InvalidField(u8),

    /// A mask was given for a field which does not support one.
    #[error("field {0} does not support a mask")]
    UnsupportedMask(OxmField),

    #[error("field {field} expects {expected} bytes, got {actual}")]
    InvalidLength { field: OxmField, expected: usize, actual: usize },

    /// The value has bits set that the field cannot carry, e.g. a VLAN
    /// PCP above 7.
    #[error("value out of range for field {0}")]
    ValueOutOfRange(OxmField),

    /// A masked value has bits outside its mask, or the mask covers
    /// every bit of the field.
    #[error("match on {0} is not normalized")]
    UnnormalizedMatch(OxmField),

    /// The flow matches the same field twice.
    #[error("duplicate match field {0}")]
    DuplicateField(OxmField),

    #[error("bad priority: {0}")]
    BadPriority(i64),

    /// `CHECK_OVERLAP` was requested and an existing flow of the same
    /// priority may match the same packets.
    #[error("flow overlaps {0}")]
    Overlap(FlowId),

    #[error("flow table is at capacity: {0}")]
    MaxCapacity(u64),

    /// A table-hash priority bucket ran out of hash table slots.
    #[error(
        "priority {priority} already uses {limit} distinct match signatures"
    )]
    TooManySignatures { priority: u16, limit: usize },

    /// An internal invariant of a classifier no longer holds.
    #[error("structural inconsistency: {0}")]
    StructuralInconsistency(String),
}

/// The counters of one flow entry along with its description.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct FlowEntryDump {
    pub id: FlowId,
    pub priority: u16,
    pub table_id: u8,
    pub cookie: u64,
    pub flags: FlowFlags,
    pub idle_timeout: u16,
    pub hard_timeout: u16,
    pub matches: Vec<MatchPredicate>,
    pub instructions: Vec<Instruction>,
    pub packets: u64,
    pub bytes: u64,
}

/// Lookup statistics of one flow table.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct TableStatsDump {
    pub flows: u64,
    pub lookups: u64,
    pub matched: u64,
}

/// Statistics of a result cache.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct CacheStatsDump {
    pub entries: u64,
    pub hit: u64,
    pub miss: u64,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct DumpFlowTableResp {
    pub table_id: u8,
    pub strategy: Strategy,
    /// The epoch of the snapshot the dump was taken from.
    pub epoch: u64,
    pub limit: u64,
    pub stats: TableStatsDump,
    pub flows: Vec<FlowEntryDump>,
}
