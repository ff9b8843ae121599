// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Where each match field lives in a parsed packet.
//!
//! Every field except `ETH_TYPE` is found at a fixed byte offset from the
//! start of one packet [`Region`]. A [`Placement`] records that offset
//! along with the number of bytes read, the left shift applied to a
//! predicate value to line it up with those bytes, and the bits of the
//! bytes the field occupies. The same table drives the compiled
//! byte-offset matches, the discriminator keys of the tree classifier
//! and the hash keys of the table-hash classifier, so all three read a
//! field from a packet identically.

use crate::api::MatchPredicate;
use crate::api::OxmField;
use std::fmt;
use std::fmt::Display;

pub const ETHER_TYPE_IPV4: u16 = 0x0800;
pub const ETHER_TYPE_ARP: u16 = 0x0806;
pub const ETHER_TYPE_VLAN: u16 = 0x8100;
pub const ETHER_TYPE_IPV6: u16 = 0x86DD;
pub const ETHER_TYPE_MPLS: u16 = 0x8847;
pub const ETHER_TYPE_MPLS_MCAST: u16 = 0x8848;
pub const ETHER_TYPE_QINQ: u16 = 0x88A8;
pub const ETHER_TYPE_PBB: u16 = 0x88E7;
pub const ETHER_TYPE_QINQ_OLD: u16 = 0x9100;

/// The largest number of bytes of a region a compiled match inspects.
pub const REGION_LEN: usize = 64;

/// A contiguous part of a packet which match fields are read from.
#[repr(u8)]
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Region {
    /// Out-of-band data synthesized for the packet; see [`oob`].
    Oob,
    /// The outer Ethernet header.
    Eth,
    /// The PBB I-TAG.
    Pbb,
    /// The outermost MPLS label stack entry.
    Mpls,
    Ipv4,
    Ipv6,
    Arp,
    /// The single byte holding the IP protocol, or for IPv6 the next
    /// header value following the extension header chain.
    IpProto,
    L4,
    /// The target address of an IPv6 neighbor solicitation or
    /// advertisement.
    NdTarget,
    /// The link-layer address of an NDP source link-layer option.
    NdSll,
    /// The link-layer address of an NDP target link-layer option.
    NdTll,
}

impl Region {
    pub const COUNT: usize = 12;

    pub fn idx(self) -> usize {
        self as usize
    }
}

impl Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Self::Oob => "OOB",
            Self::Eth => "ETH",
            Self::Pbb => "PBB",
            Self::Mpls => "MPLS",
            Self::Ipv4 => "IPV4",
            Self::Ipv6 => "IPV6",
            Self::Arp => "ARP",
            Self::IpProto => "IPPROTO",
            Self::L4 => "L4",
            Self::NdTarget => "NDTARGET",
            Self::NdSll => "NDSLL",
            Self::NdTll => "NDTLL",
        };
        write!(f, "{s}")
    }
}

/// Offsets into the out-of-band region.
pub mod oob {
    pub const IN_PORT: usize = 0;
    pub const IN_PHY_PORT: usize = 4;
    pub const METADATA: usize = 8;
    pub const TUNNEL_ID: usize = 16;
    /// The TCI of the outermost VLAN tag, with the VID-present bit set
    /// when the packet is tagged; zero otherwise.
    pub const VLAN_TCI: usize = 24;
    pub const IPV6_EXTHDR: usize = 26;
    pub const LEN: usize = 28;
}

/// Which network header the IP DSCP and ECN fields are read from.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum L3Kind {
    V4,
    V6,
}

impl L3Kind {
    /// The kind implied by a flow's predicates: IPv6 when it matches
    /// the IPv6 ethertype, IPv4 otherwise.
    pub fn of(preds: &[MatchPredicate]) -> Self {
        let v6 = preds.iter().any(|p| {
            p.field() == OxmField::EthType
                && p.value_u128() == u128::from(ETHER_TYPE_IPV6)
        });
        if v6 { Self::V6 } else { Self::V4 }
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Placement {
    pub region: Region,
    pub offset: usize,
    /// Number of bytes read, at most 16.
    pub len: usize,
    /// Left shift applied to a predicate value.
    pub shift: u32,
    /// The bits of the `len` big-endian bytes the field occupies.
    pub bits: u128,
}

const fn place(
    region: Region,
    offset: usize,
    len: usize,
    shift: u32,
    bits: u128,
) -> Placement {
    Placement { region, offset, len, shift, bits }
}

const fn full(region: Region, offset: usize, len: usize) -> Placement {
    let bits = if len >= 16 { u128::MAX } else { (1u128 << (len * 8)) - 1 };
    place(region, offset, len, 0, bits)
}

/// Where `field` is read from, or `None` for `ETH_TYPE`, which packets
/// provide as a set of candidate values instead.
pub fn layout(field: OxmField, l3: L3Kind) -> Option<Placement> {
    use OxmField::*;

    let p = match field {
        InPort => full(Region::Oob, oob::IN_PORT, 4),
        InPhyPort => full(Region::Oob, oob::IN_PHY_PORT, 4),
        Metadata => full(Region::Oob, oob::METADATA, 8),
        TunnelId => full(Region::Oob, oob::TUNNEL_ID, 8),
        VlanVid => place(Region::Oob, oob::VLAN_TCI, 2, 0, 0x1fff),
        VlanPcp => place(Region::Oob, oob::VLAN_TCI, 1, 5, 0xe0),
        Ipv6Exthdr => place(Region::Oob, oob::IPV6_EXTHDR, 2, 0, 0x01ff),

        EthDst => full(Region::Eth, 0, 6),
        EthSrc => full(Region::Eth, 6, 6),
        EthType => return None,

        PbbIsid => full(Region::Pbb, 1, 3),

        // Label (20), TC (3), BOS (1) within the first three bytes of
        // the label stack entry.
        MplsLabel => place(Region::Mpls, 0, 3, 4, 0x00ff_fff0),
        MplsTc => place(Region::Mpls, 2, 1, 1, 0x0e),
        MplsBos => place(Region::Mpls, 2, 1, 0, 0x01),

        IpDscp => match l3 {
            L3Kind::V4 => place(Region::Ipv4, 1, 1, 2, 0xfc),
            L3Kind::V6 => place(Region::Ipv6, 0, 2, 6, 0x0fc0),
        },
        IpEcn => match l3 {
            L3Kind::V4 => place(Region::Ipv4, 1, 1, 0, 0x03),
            L3Kind::V6 => place(Region::Ipv6, 1, 1, 4, 0x30),
        },
        IpProto => full(Region::IpProto, 0, 1),

        Ipv4Src => full(Region::Ipv4, 12, 4),
        Ipv4Dst => full(Region::Ipv4, 16, 4),

        Ipv6Flabel => place(Region::Ipv6, 0, 4, 0, 0x000f_ffff),
        Ipv6Src => full(Region::Ipv6, 8, 16),
        Ipv6Dst => full(Region::Ipv6, 24, 16),

        ArpOp => full(Region::Arp, 6, 2),
        ArpSha => full(Region::Arp, 8, 6),
        ArpSpa => full(Region::Arp, 14, 4),
        ArpTha => full(Region::Arp, 18, 6),
        ArpTpa => full(Region::Arp, 24, 4),

        TcpSrc | UdpSrc | SctpSrc => full(Region::L4, 0, 2),
        TcpDst | UdpDst | SctpDst => full(Region::L4, 2, 2),
        Icmpv4Type | Icmpv6Type => full(Region::L4, 0, 1),
        Icmpv4Code | Icmpv6Code => full(Region::L4, 1, 1),

        Ipv6NdTarget => full(Region::NdTarget, 0, 16),
        Ipv6NdSll => full(Region::NdSll, 0, 6),
        Ipv6NdTll => full(Region::NdTll, 0, 6),
    };

    Some(p)
}

/// A predicate lowered onto its placement: a packet satisfies it when
/// the placement's bytes ANDed with `mask` equal `value`.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Placed {
    pub field: OxmField,
    pub at: Placement,
    pub value: u128,
    pub mask: u128,
}

impl Placed {
    pub fn new(pred: &MatchPredicate, l3: L3Kind) -> Option<Self> {
        let at = layout(pred.field(), l3)?;
        let mask = (pred.mask_u128() << at.shift) & at.bits;
        let value = (pred.value_u128() << at.shift) & mask;
        Some(Self { field: pred.field(), at, value, mask })
    }

    /// Write the value and mask into per-region byte arrays.
    pub fn write(&self, bytes: &mut [u8], masks: &mut [u8]) {
        let value = self.value.to_be_bytes();
        let mask = self.mask.to_be_bytes();
        let src = 16 - self.at.len;
        for i in 0..self.at.len {
            bytes[self.at.offset + i] |= value[src + i];
            masks[self.at.offset + i] |= mask[src + i];
        }
    }
}

/// Read `len` bytes at `offset` of `region` as a big-endian integer.
/// `None` when the region is shorter than that.
pub fn read_be(region: &[u8], offset: usize, len: usize) -> Option<u128> {
    let bytes = region.get(offset..offset + len)?;
    Some(bytes.iter().fold(0u128, |acc, b| (acc << 8) | u128::from(*b)))
}
