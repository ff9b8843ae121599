// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Flow entries as held by a flow table and its classifiers.

use super::compile::CompiledMatch;
use super::field::L3Kind;
use super::packet::PacketView;
use super::stat::FlowCounter;
use crate::api::ClassifierError;
use crate::api::FieldSet;
use crate::api::FlowEntryDump;
use crate::api::FlowFlags;
use crate::api::FlowId;
use crate::api::FlowSpec;
use crate::api::Instruction;
use crate::api::MatchPredicate;
use crate::api::OxmField;
use crate::api::Result;
use core::cmp::Ordering;
use core::fmt;
use std::sync::Arc;

/// A shared handle to a flow entry. The flow table's arena owns the
/// entries; classifiers and snapshots hold handles.
pub type FlowRef = Arc<FlowEntry>;

/// The id given to flows built only to be compared against installed
/// flows; it ranks behind every real flow of the same priority.
pub const PROBE_ID: FlowId = FlowId(u64::MAX);

/// The order in which flows win a lookup: higher priority first, then
/// the lower (earlier installed) id.
///
/// `a > b` means `a` wins over `b`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Rank {
    pub priority: u16,
    pub id: FlowId,
}

impl Rank {
    /// Does this rank strictly beat `floor`? Everything beats no floor.
    #[inline]
    pub fn beats(self, floor: Option<Rank>) -> bool {
        floor.is_none_or(|f| self > f)
    }
}

impl Ord for Rank {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.id.cmp(&self.id))
    }
}

impl PartialOrd for Rank {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

pub struct FlowEntry {
    id: FlowId,
    priority: u16,
    matches: Vec<MatchPredicate>,
    field_bits: FieldSet,
    l3: L3Kind,
    flags: FlowFlags,
    cookie: u64,
    table_id: u8,
    idle_timeout: u16,
    hard_timeout: u16,
    instructions: Vec<Instruction>,
    compiled: CompiledMatch,
    counter: FlowCounter,
}

impl FlowEntry {
    /// Build the entry for `spec` and compile its match.
    ///
    /// # Errors
    ///
    /// * [`ClassifierError::DuplicateField`] when the spec matches the
    ///   same field twice.
    /// * Any error of [`MatchPredicate::validate()`] for a predicate
    ///   that is malformed or not normalized.
    pub fn new(id: FlowId, spec: FlowSpec) -> Result<Self> {
        let mut field_bits = FieldSet::EMPTY;
        for pred in &spec.matches {
            pred.validate()?;
            if !field_bits.insert(pred.field()) {
                return Err(ClassifierError::DuplicateField(pred.field()));
            }
        }

        let l3 = L3Kind::of(&spec.matches);
        let compiled = CompiledMatch::new(&spec.matches, FieldSet::EMPTY);

        Ok(Self {
            id,
            priority: spec.priority,
            matches: spec.matches,
            field_bits,
            l3,
            flags: spec.flags,
            cookie: spec.cookie,
            table_id: spec.table_id,
            idle_timeout: spec.idle_timeout,
            hard_timeout: spec.hard_timeout,
            instructions: spec.instructions,
            compiled,
            counter: FlowCounter::default(),
        })
    }

    /// Build an entry for use with `find`.
    pub fn probe(spec: FlowSpec) -> Result<Self> {
        Self::new(PROBE_ID, spec)
    }

    pub fn id(&self) -> FlowId {
        self.id
    }

    pub fn priority(&self) -> u16 {
        self.priority
    }

    #[inline]
    pub fn rank(&self) -> Rank {
        Rank { priority: self.priority, id: self.id }
    }

    pub fn matches(&self) -> &[MatchPredicate] {
        &self.matches
    }

    pub fn field_bits(&self) -> FieldSet {
        self.field_bits
    }

    pub fn l3(&self) -> L3Kind {
        self.l3
    }

    pub fn flags(&self) -> FlowFlags {
        self.flags
    }

    pub fn cookie(&self) -> u64 {
        self.cookie
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn predicate(&self, field: OxmField) -> Option<&MatchPredicate> {
        if !self.field_bits.contains(field) {
            return None;
        }
        self.matches.iter().find(|p| p.field() == field)
    }

    /// The full compiled match of this flow.
    pub fn compiled(&self) -> &CompiledMatch {
        &self.compiled
    }

    /// Compile this flow's match without the fields in `except`.
    pub fn compile_except(&self, except: FieldSet) -> CompiledMatch {
        CompiledMatch::new(&self.matches, except)
    }

    #[inline]
    pub fn is_match(&self, pkt: &PacketView) -> bool {
        self.compiled.is_match(pkt)
    }

    /// Count a packet of `pkt_size` bytes routed to this flow.
    #[inline]
    pub fn hit(&self, pkt_size: usize) {
        self.counter.hit(self.flags, pkt_size as u64);
    }

    pub fn packets(&self) -> u64 {
        self.counter.packets()
    }

    pub fn bytes(&self) -> u64 {
        self.counter.bytes()
    }

    /// Carry the counts of a flow this one replaces.
    pub fn inherit_counts(&self, old: &FlowEntry) {
        use core::sync::atomic::Ordering::Relaxed;

        self.counter.packets.store(old.packets(), Relaxed);
        self.counter.bytes.store(old.bytes(), Relaxed);
    }

    /// Structural equality: same priority, same field set, and the same
    /// predicates in the same order.
    pub fn same_match(&self, other: &FlowEntry) -> bool {
        self.priority == other.priority
            && self.field_bits == other.field_bits
            && self.matches == other.matches
    }

    /// Could a single packet match both flows at the same priority?
    ///
    /// Two predicates on the same field conflict only when they
    /// disagree on a bit both masks select; a field matched by only one
    /// of the flows never rules out an overlap.
    pub fn overlaps(&self, other: &FlowEntry) -> bool {
        if self.priority != other.priority {
            return false;
        }

        let common = self.field_bits.bits() & other.field_bits.bits();
        self.matches
            .iter()
            .filter(|p| common & p.field().bit() != 0)
            .all(|p| match other.predicate(p.field()) {
                Some(q) => {
                    let both = p.mask_u128() & q.mask_u128();
                    (p.value_u128() ^ q.value_u128()) & both == 0
                }
                None => true,
            })
    }

    pub fn dump(&self) -> FlowEntryDump {
        FlowEntryDump {
            id: self.id,
            priority: self.priority,
            table_id: self.table_id,
            cookie: self.cookie,
            flags: self.flags,
            idle_timeout: self.idle_timeout,
            hard_timeout: self.hard_timeout,
            matches: self.matches.clone(),
            instructions: self.instructions.clone(),
            packets: self.packets(),
            bytes: self.bytes(),
        }
    }
}

impl fmt::Debug for FlowEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlowEntry")
            .field("id", &self.id)
            .field("priority", &self.priority)
            .field("matches", &self.matches)
            .field("flags", &self.flags)
            .field("packets", &self.packets())
            .field("bytes", &self.bytes())
            .finish_non_exhaustive()
    }
}

impl fmt::Display for FlowEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "id={} priority={}", self.id, self.priority)?;
        for m in &self.matches {
            write!(f, " {m}")?;
        }
        Ok(())
    }
}
