// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Flow matches lowered to byte-offset tests.
//!
//! A flow's predicate list is compiled once, when the flow is added,
//! into per-region value and mask bytes. Testing a packet is then a
//! walk over the 4-byte words of each region that any predicate
//! touches, with no per-field dispatch.

use super::field::L3Kind;
use super::field::Placed;
use super::field::REGION_LEN;
use super::field::Region;
use super::packet::PacketView;
use crate::api::FieldSet;
use crate::api::MatchPredicate;
use crate::api::OxmField;
use core::fmt;

/// The compiled test of one region.
#[derive(Clone)]
pub struct RegionMatch {
    region: Region,
    /// Bit `i` set when word `i` has a nonzero mask.
    bits: u64,
    /// One past the last byte with a nonzero mask; a shorter region
    /// cannot match.
    end: usize,
    bytes: [u8; REGION_LEN],
    masks: [u8; REGION_LEN],
}

impl RegionMatch {
    fn new(region: Region) -> Self {
        Self {
            region,
            bits: 0,
            end: 0,
            bytes: [0; REGION_LEN],
            masks: [0; REGION_LEN],
        }
    }

    fn add(&mut self, placed: &Placed) {
        placed.write(&mut self.bytes, &mut self.masks);
        let first = placed.at.offset;
        let last = placed.at.offset + placed.at.len;
        for word in first / 4..last.div_ceil(4) {
            self.bits |= 1 << word;
        }
        self.end = self.end.max(last);
    }

    fn test(&self, region: &[u8]) -> bool {
        if region.len() < self.end {
            return false;
        }

        let mut bits = self.bits;
        while bits != 0 {
            let word = bits.trailing_zeros() as usize;
            bits &= bits - 1;

            let off = word * 4;
            let mask = word_at(&self.masks, off);
            if word_at(region, off) & mask != word_at(&self.bytes, off) {
                return false;
            }
        }
        true
    }

    pub fn region(&self) -> Region {
        self.region
    }

    pub fn word_count(&self) -> u32 {
        self.bits.count_ones()
    }
}

/// Read the big-endian word at `off`, padding past the end of `bytes`
/// with zeros.
fn word_at(bytes: &[u8], off: usize) -> u32 {
    let mut w = [0u8; 4];
    let avail = bytes.get(off..).unwrap_or(&[]);
    let n = avail.len().min(4);
    w[..n].copy_from_slice(&avail[..n]);
    u32::from_be_bytes(w)
}

#[derive(Clone, Default)]
pub struct CompiledMatch {
    regions: Vec<RegionMatch>,
    eth_type: Option<u16>,
}

impl CompiledMatch {
    /// Compile `preds`, leaving out the fields in `except`.
    pub fn new(preds: &[MatchPredicate], except: FieldSet) -> Self {
        let l3 = L3Kind::of(preds);
        let mut regions: Vec<RegionMatch> = Vec::new();
        let mut eth_type = None;

        for pred in preds.iter().filter(|p| !except.contains(p.field())) {
            let Some(placed) = Placed::new(pred, l3) else {
                // Only ETH_TYPE lacks a placement.
                eth_type = Some(pred.value_u128() as u16);
                continue;
            };

            let region = placed.at.region;
            let rm = match regions.iter_mut().position(|r| r.region == region)
            {
                Some(i) => &mut regions[i],
                None => {
                    regions.push(RegionMatch::new(region));
                    let last = regions.len() - 1;
                    &mut regions[last]
                }
            };
            rm.add(&placed);
        }

        regions.sort_by_key(|r| r.region);
        Self { regions, eth_type }
    }

    /// Does `pkt` satisfy every compiled predicate?
    pub fn is_match(&self, pkt: &PacketView) -> bool {
        if let Some(ty) = self.eth_type {
            if !pkt.has_eth_type(ty) {
                return false;
            }
        }

        self.regions.iter().all(|rm| match pkt.bytes(rm.region) {
            Some(bytes) => rm.test(bytes),
            None => false,
        })
    }

    /// A compiled match with no tests matches every packet.
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty() && self.eth_type.is_none()
    }

    pub fn regions(&self) -> &[RegionMatch] {
        &self.regions
    }
}

impl fmt::Debug for CompiledMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let regions: Vec<_> = self
            .regions
            .iter()
            .map(|r| (r.region, r.word_count()))
            .collect();
        f.debug_struct("CompiledMatch")
            .field("regions", &regions)
            .field("eth_type", &self.eth_type)
            .finish()
    }
}

/// Evaluate one predicate against a packet, field by field, without
/// compiling it. `l3` selects where DSCP and ECN are read from.
pub fn predicate_holds(
    pred: &MatchPredicate,
    l3: L3Kind,
    pkt: &PacketView,
) -> bool {
    if pred.field() == OxmField::EthType {
        return pkt.has_eth_type(pred.value_u128() as u16);
    }

    match Placed::new(pred, l3) {
        Some(placed) => {
            let got = pkt.read(&placed.at);
            got.is_some_and(|v| v & placed.mask == placed.value)
        }
        None => false,
    }
}
