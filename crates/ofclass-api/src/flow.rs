// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Flow descriptions as handed to a flow table by the control plane.

use super::ClassifierError;
use super::MatchPredicate;
use super::OFP_DEFAULT_PRIORITY;
use super::Result;
use alloc::vec::Vec;
use core::fmt;
use core::fmt::Display;
use serde::Deserialize;
use serde::Serialize;

/// The stable identity of a flow entry within its flow table.
///
/// Ids are handed out in increasing order, so among flows of equal
/// priority the lower id is the one installed first.
#[derive(
    Clone,
    Copy,
    Debug,
    Deserialize,
    Eq,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
)]
pub struct FlowId(pub u64);

impl Display for FlowId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

bitflags::bitflags! {
    /// The `ofp_flow_mod_flags` of a flow entry.
    #[derive(
        Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq,
        Serialize,
    )]
    pub struct FlowFlags: u16 {
        const SEND_FLOW_REM = 1 << 0;
        const CHECK_OVERLAP = 1 << 1;
        const RESET_COUNTS = 1 << 2;
        const NO_PKT_COUNTS = 1 << 3;
        const NO_BYT_COUNTS = 1 << 4;
    }
}

/// A flow instruction. The classifier carries these for the pipeline
/// without interpreting them; action lists are kept in their encoded
/// form.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum Instruction {
    GotoTable(u8),
    WriteMetadata { metadata: u64, mask: u64 },
    WriteActions(Vec<u8>),
    ApplyActions(Vec<u8>),
    ClearActions,
    Meter(u32),
    Experimenter { id: u32, data: Vec<u8> },
}

impl Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::GotoTable(id) => write!(f, "goto_table:{id}"),
            Self::WriteMetadata { metadata, mask } => {
                write!(f, "write_metadata:0x{metadata:x}/0x{mask:x}")
            }
            Self::WriteActions(acts) => {
                write!(f, "write_actions({}B)", acts.len())
            }
            Self::ApplyActions(acts) => {
                write!(f, "apply_actions({}B)", acts.len())
            }
            Self::ClearActions => write!(f, "clear_actions"),
            Self::Meter(id) => write!(f, "meter:{id}"),
            Self::Experimenter { id, data } => {
                write!(f, "experimenter:{id}({}B)", data.len())
            }
        }
    }
}

/// Everything the control plane supplies for a new flow entry.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct FlowSpec {
    pub priority: u16,
    pub matches: Vec<MatchPredicate>,
    pub flags: FlowFlags,
    pub cookie: u64,
    pub table_id: u8,
    pub idle_timeout: u16,
    pub hard_timeout: u16,
    pub instructions: Vec<Instruction>,
}

impl Default for FlowSpec {
    fn default() -> Self {
        Self::new(OFP_DEFAULT_PRIORITY)
    }
}

impl FlowSpec {
    pub fn new(priority: u16) -> Self {
        Self {
            priority,
            matches: Vec::new(),
            flags: FlowFlags::empty(),
            cookie: 0,
            table_id: 0,
            idle_timeout: 0,
            hard_timeout: 0,
            instructions: Vec::new(),
        }
    }

    /// Create a spec from a priority as carried by a wider integer.
    ///
    /// # Errors
    ///
    /// [`ClassifierError::BadPriority`] when `priority` falls outside
    /// the OpenFlow range of 0 to 65535.
    pub fn try_new(priority: i64) -> Result<Self> {
        u16::try_from(priority)
            .map(Self::new)
            .map_err(|_| ClassifierError::BadPriority(priority))
    }

    pub fn with_match(mut self, pred: MatchPredicate) -> Self {
        self.matches.push(pred);
        self
    }

    pub fn with_matches<I>(mut self, preds: I) -> Self
    where
        I: IntoIterator<Item = MatchPredicate>,
    {
        self.matches.extend(preds);
        self
    }

    pub fn with_flags(mut self, flags: FlowFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_cookie(mut self, cookie: u64) -> Self {
        self.cookie = cookie;
        self
    }

    pub fn with_instruction(mut self, inst: Instruction) -> Self {
        self.instructions.push(inst);
        self
    }
}

/// One flow table modification, for use with a batch.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum FlowMod {
    /// Add a flow, replacing an existing flow with an identical match
    /// and priority.
    Add(FlowSpec),

    /// Remove the flow with the given id.
    Remove(FlowId),

    /// Remove the flow whose priority and match are identical to the
    /// spec's.
    RemoveStrict(FlowSpec),
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn priority_range() {
        assert_eq!(FlowSpec::try_new(65535).unwrap().priority, u16::MAX);
        assert_eq!(
            FlowSpec::try_new(-1),
            Err(ClassifierError::BadPriority(-1))
        );
        assert_eq!(
            FlowSpec::try_new(65536),
            Err(ClassifierError::BadPriority(65536))
        );
    }

    #[test]
    fn flag_values() {
        // These are the wire values of ofp_flow_mod_flags.
        assert_eq!(FlowFlags::NO_PKT_COUNTS.bits(), 8);
        assert_eq!(FlowFlags::NO_BYT_COUNTS.bits(), 16);
    }
}
