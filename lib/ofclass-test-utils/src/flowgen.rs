// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Seeded generation of flows and frames.
//!
//! Values are drawn from small pools shared by flows and frames, so a
//! good share of generated frames match several generated flows and
//! the priority pool is narrow enough to make ties common.

use crate::frame::FrameBuilder;
use crate::frame::DST_MAC;
use crate::frame::SRC_MAC;
use ofclass::api::FlowSpec;
use ofclass::api::Ipv4Addr;
use ofclass::api::Ipv4Cidr;
use ofclass::api::Ipv6Addr;
use ofclass::api::Ipv6Cidr;
use ofclass::api::MacAddr;
use ofclass::api::MatchPredicate;
use ofclass::engine::PacketView;
use ofclass::engine::field::ETHER_TYPE_ARP;
use ofclass::engine::field::ETHER_TYPE_IPV4;
use ofclass::engine::field::ETHER_TYPE_IPV6;
use ofclass::engine::field::ETHER_TYPE_MPLS;
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;

const PORTS: [u32; 3] = [1, 2, 3];
const VIDS: [u16; 2] = [10, 20];
const ETHER_TYPES: [u16; 4] =
    [ETHER_TYPE_IPV4, ETHER_TYPE_IPV6, ETHER_TYPE_ARP, ETHER_TYPE_MPLS];
const V4: [[u8; 4]; 4] =
    [[10, 0, 0, 1], [10, 0, 0, 2], [10, 0, 1, 1], [10, 1, 0, 1]];
const V4_PREFIXES: [u8; 5] = [0, 8, 16, 24, 32];
const V6: [Ipv6Addr; 3] = [
    Ipv6Addr::from_const([0xfd00, 0, 0, 0, 0, 0, 0, 1]),
    Ipv6Addr::from_const([0xfd00, 0, 0, 0, 0, 0, 0, 2]),
    Ipv6Addr::from_const([0xfd00, 1, 0, 0, 0, 0, 0, 1]),
];
const V6_PREFIXES: [u8; 3] = [32, 64, 128];
const L4_PORTS: [u16; 3] = [53, 80, 443];
const PROTOS: [u8; 2] = [6, 17];
const LABELS: [u32; 2] = [100, 200];
const DSCPS: [u8; 2] = [0, 10];
const MCAST_MAC: MacAddr = MacAddr::from_const([0x01, 0, 0x5e, 0, 0, 1]);
const MACS: [MacAddr; 3] = [DST_MAC, SRC_MAC, MCAST_MAC];
const FIELD_KINDS: usize = 15;

/// One generated frame along with its out-of-band fields.
#[derive(Clone, Debug)]
pub struct GenFrame {
    pub frame: Vec<u8>,
    pub in_port: u32,
    pub metadata: u64,
}

impl GenFrame {
    pub fn view(&self) -> PacketView<'_> {
        PacketView::parse(&self.frame, self.in_port)
            .expect("generated frames carry an Ethernet header")
            .with_metadata(self.metadata)
    }
}

pub struct Generator {
    rng: StdRng,
    max_fields: usize,
    max_priority: u16,
}

impl Generator {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            max_fields: 3,
            max_priority: 8,
        }
    }

    /// Generate flows with up to `n` match fields each.
    pub fn with_max_fields(mut self, n: usize) -> Self {
        self.max_fields = n;
        self
    }

    /// Draw priorities from `0..n`.
    pub fn with_max_priority(mut self, n: u16) -> Self {
        self.max_priority = n.max(1);
        self
    }

    fn pick<T: Copy>(&mut self, pool: &[T]) -> T {
        pool[self.rng.random_range(0..pool.len())]
    }

    fn v4_prefix(&mut self) -> Ipv4Cidr {
        let ip = Ipv4Addr::from(self.pick(&V4));
        let len = self.pick(&V4_PREFIXES);
        Ipv4Cidr::new(ip, len).expect("prefix lengths are at most 32")
    }

    fn predicate(&mut self, kind: usize) -> MatchPredicate {
        match kind {
            0 => MatchPredicate::in_port(self.pick(&PORTS)),
            1 => {
                if self.rng.random_bool(0.25) {
                    MatchPredicate::vlan_none()
                } else {
                    MatchPredicate::vlan_vid(self.pick(&VIDS))
                }
            }
            2 => MatchPredicate::eth_type(self.pick(&ETHER_TYPES)),
            3 => MatchPredicate::ipv4_src_prefix(self.v4_prefix()),
            4 => MatchPredicate::ipv4_dst_prefix(self.v4_prefix()),
            5 => MatchPredicate::ip_proto(self.pick(&PROTOS)),
            6 => MatchPredicate::tcp_dst(self.pick(&L4_PORTS)),
            7 => MatchPredicate::udp_src(self.pick(&L4_PORTS)),
            8 => {
                let md = self.rng.random_range(0..4u64);
                if self.rng.random_bool(0.5) {
                    MatchPredicate::metadata(md)
                } else {
                    MatchPredicate::metadata_masked(md, 0x1)
                }
            }
            9 => MatchPredicate::mpls_label(self.pick(&LABELS)),
            10 => {
                let ip = self.pick(&V6);
                let len = self.pick(&V6_PREFIXES);
                let cidr = Ipv6Cidr::new(ip, len)
                    .expect("prefix lengths are at most 128");
                MatchPredicate::ipv6_dst_prefix(cidr)
            }
            11 => {
                let mac = self.pick(&MACS);
                if self.rng.random_bool(0.5) {
                    MatchPredicate::eth_dst(mac)
                } else {
                    // Only the group bit.
                    let mask = MacAddr::from_const([1, 0, 0, 0, 0, 0]);
                    MatchPredicate::eth_dst_masked(mac, mask)
                }
            }
            12 => MatchPredicate::ip_dscp(self.pick(&DSCPS)),
            13 => MatchPredicate::arp_op(self.rng.random_range(1..=2)),
            _ => MatchPredicate::tcp_src(self.pick(&L4_PORTS)),
        }
    }

    /// A flow spec with a random priority and a random set of distinct
    /// match fields.
    pub fn spec(&mut self) -> FlowSpec {
        let priority = self.rng.random_range(0..self.max_priority);
        let n = self.rng.random_range(0..=self.max_fields);
        let mut kinds: Vec<usize> = Vec::with_capacity(n);
        while kinds.len() < n {
            let k = self.rng.random_range(0..FIELD_KINDS);
            if !kinds.contains(&k) {
                kinds.push(k);
            }
        }

        let preds: Vec<_> =
            kinds.into_iter().map(|k| self.predicate(k)).collect();
        FlowSpec::new(priority).with_matches(preds)
    }

    /// A frame drawn from the same pools as [`Self::spec`].
    pub fn frame(&mut self) -> GenFrame {
        let mut b = FrameBuilder::new().eth(self.pick(&MACS), SRC_MAC);
        if self.rng.random_bool(0.5) {
            let pcp = self.rng.random_range(0..8);
            b = b.vlan(self.pick(&VIDS), pcp);
        }

        let sport = self.pick(&L4_PORTS);
        let dport = self.pick(&L4_PORTS);
        let src4 = Ipv4Addr::from(self.pick(&V4));
        let dst4 = Ipv4Addr::from(self.pick(&V4));

        b = match self.rng.random_range(0..6) {
            0 => b.ipv4(src4, dst4).tcp(sport, dport),
            1 => b.ipv4(src4, dst4).udp(sport, dport),
            2 => {
                let b = b.ipv6(self.pick(&V6), self.pick(&V6));
                if self.rng.random_bool(0.5) {
                    b.tcp(sport, dport)
                } else {
                    b.udp(sport, dport)
                }
            }
            3 => {
                let op = self.rng.random_range(1..=2);
                b.arp(op, SRC_MAC, src4, DST_MAC, dst4)
            }
            4 => b
                .mpls(self.pick(&LABELS), 0)
                .ipv4(src4, dst4)
                .udp(sport, dport),
            _ => b,
        };
        b = b.dscp_ecn(self.pick(&DSCPS), 0);

        GenFrame {
            frame: b.build(),
            in_port: self.pick(&PORTS),
            metadata: self.rng.random_range(0..4),
        }
    }
}
