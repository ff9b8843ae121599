// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! A parsed view of one frame, as the classifiers see it.
//!
//! Parsing locates each header [`Region`] of the frame and synthesizes
//! the out-of-band region from the port the frame arrived on, its
//! outermost VLAN tag, and the IPv6 extension headers it carries. The
//! view borrows the frame; nothing is copied besides the OOB bytes.
//!
//! Headers past the Ethernet header which are truncated simply leave
//! their region absent, and every predicate on such a region fails.

use super::field::ETHER_TYPE_ARP;
use super::field::ETHER_TYPE_IPV4;
use super::field::ETHER_TYPE_IPV6;
use super::field::ETHER_TYPE_MPLS;
use super::field::ETHER_TYPE_MPLS_MCAST;
use super::field::ETHER_TYPE_PBB;
use super::field::ETHER_TYPE_QINQ;
use super::field::ETHER_TYPE_QINQ_OLD;
use super::field::ETHER_TYPE_VLAN;
use super::field::Placement;
use super::field::Region;
use super::field::oob;
use super::field::read_be;
use super::hash::Hash64;
use super::headers::*;
use crate::api::OFPVID_PRESENT;
use crate::api::ieh;
use zerocopy::FromBytes;

/// The most ethertypes a packet can present: the outer type, the
/// customer type of a PBB frame, and the guessed payload type of an
/// MPLS label stack.
pub const MAX_ETH_TYPES: usize = 3;

bitflags::bitflags! {
    /// Which encapsulations the parser walked through.
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct PacketFlags: u8 {
        const VLAN = 1 << 0;
        const PBB = 1 << 1;
        const MPLS = 1 << 2;
        /// A non-initial IP fragment; no L4 header is present.
        const FRAGMENT = 1 << 3;
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, thiserror::Error)]
pub enum ParseError {
    #[error("frame of {len} bytes is too short for an Ethernet header")]
    Truncated { len: usize },
}

#[derive(Clone, Debug)]
pub struct PacketView<'a> {
    oob: [u8; oob::LEN],
    regions: [Option<&'a [u8]>; Region::COUNT],
    eth_types: heapless::Vec<u16, MAX_ETH_TYPES>,
    flags: PacketFlags,
    len: usize,
}

impl<'a> PacketView<'a> {
    /// Parse `frame`, which arrived on `in_port`.
    ///
    /// The physical port defaults to `in_port`; metadata and tunnel id
    /// default to zero.
    ///
    /// # Errors
    ///
    /// [`ParseError::Truncated`] when the frame cannot hold an Ethernet
    /// header.
    pub fn parse(frame: &'a [u8], in_port: u32) -> Result<Self, ParseError> {
        let (eth, mut rest) = EtherHdrRaw::ref_from_prefix(frame)
            .map_err(|_| ParseError::Truncated { len: frame.len() })?;

        let mut pkt = Self {
            oob: [0; oob::LEN],
            regions: [None; Region::COUNT],
            eth_types: heapless::Vec::new(),
            flags: PacketFlags::empty(),
            len: frame.len(),
        };
        pkt.set_oob(oob::IN_PORT, &in_port.to_be_bytes());
        pkt.set_oob(oob::IN_PHY_PORT, &in_port.to_be_bytes());
        pkt.regions[Region::Eth.idx()] = Some(frame);

        let mut ether_type = eth.ether_type.get();
        while matches!(
            ether_type,
            ETHER_TYPE_VLAN | ETHER_TYPE_QINQ | ETHER_TYPE_QINQ_OLD
        ) {
            let Ok((tag, next)) = VlanTagRaw::ref_from_prefix(rest) else {
                pkt.push_eth_type(ether_type);
                return Ok(pkt);
            };

            // Only the outermost tag is visible to VLAN_VID/VLAN_PCP.
            if !pkt.flags.contains(PacketFlags::VLAN) {
                pkt.flags |= PacketFlags::VLAN;
                let tci = tag.tci.get() | OFPVID_PRESENT;
                pkt.set_oob(oob::VLAN_TCI, &tci.to_be_bytes());
            }
            ether_type = tag.ether_type.get();
            rest = next;
        }
        pkt.push_eth_type(ether_type);

        if ether_type == ETHER_TYPE_PBB {
            let Ok((itag, inner)) = PbbItagRaw::ref_from_prefix(rest) else {
                return Ok(pkt);
            };
            pkt.flags |= PacketFlags::PBB;
            pkt.regions[Region::Pbb.idx()] = Some(rest);
            ether_type = itag.c_ether_type.get();
            pkt.push_eth_type(ether_type);
            rest = inner;
        }

        if matches!(ether_type, ETHER_TYPE_MPLS | ETHER_TYPE_MPLS_MCAST) {
            match pkt.parse_mpls(rest) {
                Some((inner_type, payload)) => {
                    pkt.push_eth_type(inner_type);
                    ether_type = inner_type;
                    rest = payload;
                }
                None => return Ok(pkt),
            }
        }

        match ether_type {
            ETHER_TYPE_IPV4 => pkt.parse_ipv4(rest),
            ETHER_TYPE_IPV6 => pkt.parse_ipv6(rest),
            ETHER_TYPE_ARP => pkt.parse_arp(rest),
            _ => {}
        }

        Ok(pkt)
    }

    /// Walk the label stack to the bottom entry and guess the payload
    /// type from its first nibble.
    fn parse_mpls(&mut self, stack: &'a [u8]) -> Option<(u16, &'a [u8])> {
        let mut rest = stack;
        let mut outermost = true;

        loop {
            let (lse, next) = MplsLseRaw::ref_from_prefix(rest).ok()?;
            if outermost {
                self.flags |= PacketFlags::MPLS;
                self.regions[Region::Mpls.idx()] = Some(rest);
                outermost = false;
            }
            rest = next;
            if lse.bos() {
                break;
            }
        }

        let guess = match rest.first()? >> 4 {
            4 => ETHER_TYPE_IPV4,
            6 => ETHER_TYPE_IPV6,
            _ => return None,
        };
        Some((guess, rest))
    }

    fn parse_ipv4(&mut self, l3: &'a [u8]) {
        let Ok((ip, _)) = Ipv4HdrRaw::ref_from_prefix(l3) else {
            return;
        };
        let hdr_len = ip.hdr_len();
        if hdr_len < IPV4_HDR_SZ || hdr_len > l3.len() {
            return;
        }

        self.regions[Region::Ipv4.idx()] = Some(l3);
        self.regions[Region::IpProto.idx()] =
            Some(&l3[IPV4_PROTO_OFF..IPV4_PROTO_OFF + 1]);

        if ip.is_later_fragment() {
            self.flags |= PacketFlags::FRAGMENT;
            return;
        }
        self.parse_l4(ip.proto, &l3[hdr_len..]);
    }

    fn parse_ipv6(&mut self, l3: &'a [u8]) {
        let Ok((ip, mut rest)) = Ipv6HdrRaw::ref_from_prefix(l3) else {
            return;
        };
        self.regions[Region::Ipv6.idx()] = Some(l3);

        let mut proto_at = &l3[IPV6_NEXT_HDR_OFF..IPV6_NEXT_HDR_OFF + 1];
        let mut next = ip.next_hdr;
        let mut exthdr = 0u16;
        let mut l4_ok = true;

        loop {
            let flag = match next {
                IP_PROTO_HOPOPT => ieh::HOP,
                IP_PROTO_IPV6_ROUTE => ieh::ROUTER,
                IP_PROTO_IPV6_FRAG => ieh::FRAG,
                IP_PROTO_IPV6_OPTS => ieh::DEST,
                IP_PROTO_AH => ieh::AUTH,
                IP_PROTO_ESP => ieh::ESP,
                IP_PROTO_IPV6_NONXT => ieh::NONEXT,
                _ => break,
            };

            // Destination options may legitimately appear twice.
            if exthdr & flag != 0 && flag != ieh::DEST {
                exthdr |= ieh::UNREP;
            }
            exthdr |= flag;

            // Nothing past ESP is readable, and nothing follows NONXT.
            if matches!(next, IP_PROTO_ESP | IP_PROTO_IPV6_NONXT) {
                l4_ok = false;
                break;
            }

            let Ok((ext, _)) = Ipv6ExtHdrRaw::ref_from_prefix(rest) else {
                l4_ok = false;
                break;
            };
            let ext_len = match next {
                IP_PROTO_IPV6_FRAG => 8,
                IP_PROTO_AH => (usize::from(ext.len) + 2) * 4,
                _ => (usize::from(ext.len) + 1) * 8,
            };
            if rest.len() < ext_len {
                l4_ok = false;
                break;
            }

            if next == IP_PROTO_IPV6_FRAG {
                let offset = read_be(rest, 2, 2).unwrap_or(0) >> 3;
                if offset != 0 {
                    self.flags |= PacketFlags::FRAGMENT;
                    l4_ok = false;
                }
            }

            proto_at = &rest[..1];
            next = ext.next_hdr;
            rest = &rest[ext_len..];

            if !l4_ok {
                break;
            }
        }

        self.set_oob(oob::IPV6_EXTHDR, &exthdr.to_be_bytes());
        self.regions[Region::IpProto.idx()] = Some(proto_at);
        if l4_ok {
            self.parse_l4(next, rest);
        }
    }

    fn parse_arp(&mut self, l3: &'a [u8]) {
        let Ok((arp, _)) = ArpEthIpv4Raw::ref_from_prefix(l3) else {
            return;
        };
        // Only Ethernet/IPv4 ARP carries the addresses ARP_* describe.
        if arp.htype.get() == 1 && arp.ptype.get() == ETHER_TYPE_IPV4 {
            self.regions[Region::Arp.idx()] = Some(l3);
        }
    }

    fn parse_l4(&mut self, proto: u8, l4: &'a [u8]) {
        match proto {
            IP_PROTO_TCP | IP_PROTO_UDP | IP_PROTO_SCTP if l4.len() >= 4 => {
                self.regions[Region::L4.idx()] = Some(l4);
            }

            IP_PROTO_ICMP if l4.len() >= 2 => {
                self.regions[Region::L4.idx()] = Some(l4);
            }

            IP_PROTO_ICMPV6 if l4.len() >= 2 => {
                self.regions[Region::L4.idx()] = Some(l4);
                self.parse_nd(l4);
            }

            _ => {}
        }
    }

    fn parse_nd(&mut self, icmp: &'a [u8]) {
        let ty = icmp[0];
        let is_nd = matches!(ty, ICMPV6_ND_NS | ICMPV6_ND_NA);
        if !is_nd || icmp.len() < ND_OPTS_OFF {
            return;
        }
        self.regions[Region::NdTarget.idx()] =
            Some(&icmp[ND_TARGET_OFF..ND_OPTS_OFF]);

        let mut opts = &icmp[ND_OPTS_OFF..];
        while let Ok((opt, _)) = NdOptRaw::ref_from_prefix(opts) {
            let len = usize::from(opt.len) * 8;
            if len == 0 || len > opts.len() {
                break;
            }

            // The link-layer address follows the type and length.
            let addr = &opts[2..len];
            match (opt.kind, ty) {
                (ND_OPT_SLL, ICMPV6_ND_NS) => {
                    self.regions[Region::NdSll.idx()] = Some(addr);
                }
                (ND_OPT_TLL, ICMPV6_ND_NA) => {
                    self.regions[Region::NdTll.idx()] = Some(addr);
                }
                _ => {}
            }
            opts = &opts[len..];
        }
    }

    fn push_eth_type(&mut self, ether_type: u16) {
        if !self.eth_types.contains(&ether_type) {
            // Capacity covers every encapsulation the parser walks.
            let _ = self.eth_types.push(ether_type);
        }
    }

    fn set_oob(&mut self, offset: usize, bytes: &[u8]) {
        self.oob[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    pub fn with_in_phy_port(mut self, port: u32) -> Self {
        self.set_oob(oob::IN_PHY_PORT, &port.to_be_bytes());
        self
    }

    pub fn with_metadata(mut self, metadata: u64) -> Self {
        self.set_oob(oob::METADATA, &metadata.to_be_bytes());
        self
    }

    pub fn with_tunnel_id(mut self, tunnel_id: u64) -> Self {
        self.set_oob(oob::TUNNEL_ID, &tunnel_id.to_be_bytes());
        self
    }

    /// The bytes of `region`, starting at its first header byte.
    pub fn region(&self, region: Region) -> Option<&'a [u8]> {
        match region {
            // The OOB bytes are owned by the view, not the frame.
            Region::Oob => None,
            _ => self.regions[region.idx()],
        }
    }

    /// Like [`Self::region()`], including the OOB region.
    pub fn bytes(&self, region: Region) -> Option<&[u8]> {
        match region {
            Region::Oob => Some(&self.oob),
            _ => self.regions[region.idx()],
        }
    }

    /// The candidate ethertypes, outermost first.
    pub fn eth_types(&self) -> &[u16] {
        &self.eth_types
    }

    pub fn has_eth_type(&self, ether_type: u16) -> bool {
        self.eth_types.contains(&ether_type)
    }

    pub fn flags(&self) -> PacketFlags {
        self.flags
    }

    /// The length of the whole frame.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn in_port(&self) -> u32 {
        read_be(&self.oob, oob::IN_PORT, 4).unwrap_or(0) as u32
    }

    pub fn metadata(&self) -> u64 {
        read_be(&self.oob, oob::METADATA, 8).unwrap_or(0) as u64
    }

    /// The outermost TCI with [`OFPVID_PRESENT`] set, or zero for an
    /// untagged frame.
    pub fn vlan_tci(&self) -> u16 {
        read_be(&self.oob, oob::VLAN_TCI, 2).unwrap_or(0) as u16
    }

    pub fn ipv6_exthdr(&self) -> u16 {
        read_be(&self.oob, oob::IPV6_EXTHDR, 2).unwrap_or(0) as u16
    }

    /// Read the bits a field occupies at `at`; `None` when the region is
    /// absent or too short.
    pub fn read(&self, at: &Placement) -> Option<u128> {
        let region = self.bytes(at.region)?;
        read_be(region, at.offset, at.len).map(|v| v & at.bits)
    }

    /// The cache key of this packet: a hash over every byte any match
    /// field can read.
    pub fn hash64(&self) -> u64 {
        // (region, offset, len) of the hashed spans past the OOB bytes.
        const SPANS: [(Region, usize, usize); 13] = [
            (Region::Eth, 0, 12),
            (Region::Pbb, 1, 3),
            (Region::Mpls, 0, 3),
            (Region::Ipv4, 0, 2),
            (Region::Ipv4, 12, 8),
            (Region::Ipv6, 0, 4),
            (Region::Ipv6, 8, 32),
            (Region::Arp, 6, 22),
            (Region::IpProto, 0, 1),
            (Region::L4, 0, 4),
            (Region::NdTarget, 0, 16),
            (Region::NdSll, 0, 6),
            (Region::NdTll, 0, 6),
        ];

        let mut h = Hash64::with_seed(0);
        h.update(&self.oob);
        for ty in &self.eth_types {
            h.update(&ty.to_be_bytes());
        }

        for (region, off, len) in SPANS {
            let Some(bytes) = self.regions[region.idx()] else {
                continue;
            };
            let span = bytes.get(off..).unwrap_or(&[]);
            h.update(&[region as u8]);
            h.update(&span[..span.len().min(len)]);
        }
        h.finish()
    }
}
