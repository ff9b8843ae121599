// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Raw, zerocopy views of the headers the packet parser walks.

use zerocopy::FromBytes;
use zerocopy::Immutable;
use zerocopy::KnownLayout;
use zerocopy::Unaligned;
use zerocopy::byteorder::network_endian::U16;
use zerocopy::byteorder::network_endian::U32;

pub const ETHER_HDR_SZ: usize = size_of::<EtherHdrRaw>();
pub const IPV4_HDR_SZ: usize = size_of::<Ipv4HdrRaw>();
pub const IPV6_HDR_SZ: usize = size_of::<Ipv6HdrRaw>();
pub const ARP_ETH_IPV4_SZ: usize = size_of::<ArpEthIpv4Raw>();

pub const IPV4_PROTO_OFF: usize = 9;
pub const IPV6_NEXT_HDR_OFF: usize = 6;

pub const IP_PROTO_HOPOPT: u8 = 0;
pub const IP_PROTO_ICMP: u8 = 1;
pub const IP_PROTO_TCP: u8 = 6;
pub const IP_PROTO_UDP: u8 = 17;
pub const IP_PROTO_IPV6_ROUTE: u8 = 43;
pub const IP_PROTO_IPV6_FRAG: u8 = 44;
pub const IP_PROTO_ESP: u8 = 50;
pub const IP_PROTO_AH: u8 = 51;
pub const IP_PROTO_ICMPV6: u8 = 58;
pub const IP_PROTO_IPV6_NONXT: u8 = 59;
pub const IP_PROTO_IPV6_OPTS: u8 = 60;
pub const IP_PROTO_SCTP: u8 = 132;

pub const ICMPV6_ND_NS: u8 = 135;
pub const ICMPV6_ND_NA: u8 = 136;
pub const ND_OPT_SLL: u8 = 1;
pub const ND_OPT_TLL: u8 = 2;

/// Offset of the target address in a neighbor solicitation or
/// advertisement.
pub const ND_TARGET_OFF: usize = 8;
pub const ND_OPTS_OFF: usize = 24;

#[repr(C)]
#[derive(Clone, Debug, FromBytes, Immutable, KnownLayout, Unaligned)]
pub struct EtherHdrRaw {
    pub dst: [u8; 6],
    pub src: [u8; 6],
    pub ether_type: U16,
}

/// An 802.1Q/802.1ad tag following the TPID.
#[repr(C)]
#[derive(Clone, Debug, FromBytes, Immutable, KnownLayout, Unaligned)]
pub struct VlanTagRaw {
    pub tci: U16,
    pub ether_type: U16,
}

/// The PBB I-TAG, followed by the customer Ethernet header.
#[repr(C)]
#[derive(Clone, Debug, FromBytes, Immutable, KnownLayout, Unaligned)]
pub struct PbbItagRaw {
    pub pcp_dei_uca: u8,
    pub isid: [u8; 3],
    pub c_dst: [u8; 6],
    pub c_src: [u8; 6],
    pub c_ether_type: U16,
}

#[repr(C)]
#[derive(Clone, Debug, FromBytes, Immutable, KnownLayout, Unaligned)]
pub struct MplsLseRaw {
    pub lse: U32,
}

impl MplsLseRaw {
    pub fn bos(&self) -> bool {
        self.lse.get() & 0x100 != 0
    }
}

#[repr(C)]
#[derive(Clone, Debug, FromBytes, Immutable, KnownLayout, Unaligned)]
pub struct Ipv4HdrRaw {
    pub ver_hdr_len: u8,
    pub dscp_ecn: u8,
    pub total_len: U16,
    pub ident: U16,
    pub frag_and_flags: U16,
    pub ttl: u8,
    pub proto: u8,
    pub csum: U16,
    pub src: [u8; 4],
    pub dst: [u8; 4],
}

impl Ipv4HdrRaw {
    pub fn hdr_len(&self) -> usize {
        usize::from(self.ver_hdr_len & 0x0f) * 4
    }

    /// Is this a non-initial fragment, which carries no L4 header?
    pub fn is_later_fragment(&self) -> bool {
        self.frag_and_flags.get() & 0x1fff != 0
    }
}

#[repr(C)]
#[derive(Clone, Debug, FromBytes, Immutable, KnownLayout, Unaligned)]
pub struct Ipv6HdrRaw {
    pub vsn_class_flow: U32,
    pub payload_len: U16,
    pub next_hdr: u8,
    pub hop_limit: u8,
    pub src: [u8; 16],
    pub dst: [u8; 16],
}

/// The common prefix of the hop-by-hop, routing, destination options
/// and fragment extension headers.
#[repr(C)]
#[derive(Clone, Debug, FromBytes, Immutable, KnownLayout, Unaligned)]
pub struct Ipv6ExtHdrRaw {
    pub next_hdr: u8,
    pub len: u8,
}

#[repr(C)]
#[derive(Clone, Debug, FromBytes, Immutable, KnownLayout, Unaligned)]
pub struct ArpEthIpv4Raw {
    pub htype: U16,
    pub ptype: U16,
    pub hlen: u8,
    pub plen: u8,
    pub op: U16,
    pub sha: [u8; 6],
    pub spa: [u8; 4],
    pub tha: [u8; 6],
    pub tpa: [u8; 4],
}

/// The type and length of an NDP option; the length is in units of 8
/// bytes and covers these two bytes.
#[repr(C)]
#[derive(Clone, Debug, FromBytes, Immutable, KnownLayout, Unaligned)]
pub struct NdOptRaw {
    pub kind: u8,
    pub len: u8,
}
