// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Build raw frames for tests and benches.
//!
//! Checksums and lengths the parser never reads are left zero.

use ofclass::api::Ipv4Addr;
use ofclass::api::Ipv6Addr;
use ofclass::api::MacAddr;
use ofclass::engine::field::ETHER_TYPE_ARP;
use ofclass::engine::field::ETHER_TYPE_IPV4;
use ofclass::engine::field::ETHER_TYPE_IPV6;
use ofclass::engine::field::ETHER_TYPE_MPLS;
use ofclass::engine::field::ETHER_TYPE_PBB;
use ofclass::engine::field::ETHER_TYPE_QINQ;
use ofclass::engine::field::ETHER_TYPE_VLAN;
use ofclass::engine::headers::*;

pub const SRC_MAC: MacAddr = MacAddr::from_const([0x02, 0, 0, 0, 0, 0x01]);
pub const DST_MAC: MacAddr = MacAddr::from_const([0x02, 0, 0, 0, 0, 0x02]);

/// An IP protocol number with no meaning to the parser.
pub const IP_PROTO_EXPERIMENTAL: u8 = 253;

#[derive(Clone, Debug)]
enum L3 {
    Raw(u16),
    Ipv4 { src: Ipv4Addr, dst: Ipv4Addr },
    Ipv6 { src: Ipv6Addr, dst: Ipv6Addr, flabel: u32, ext: Vec<u8> },
    Arp { op: u16, sha: MacAddr, spa: Ipv4Addr, tha: MacAddr, tpa: Ipv4Addr },
}

#[derive(Clone, Debug)]
enum L4 {
    None,
    Tcp { src: u16, dst: u16 },
    Udp { src: u16, dst: u16 },
    Sctp { src: u16, dst: u16 },
    Icmpv4 { ty: u8, code: u8 },
    Icmpv6 { ty: u8, code: u8 },
    NdNs { target: Ipv6Addr, sll: Option<MacAddr> },
    NdNa { target: Ipv6Addr, tll: Option<MacAddr> },
}

impl L4 {
    fn proto(&self) -> Option<u8> {
        match self {
            Self::None => None,
            Self::Tcp { .. } => Some(IP_PROTO_TCP),
            Self::Udp { .. } => Some(IP_PROTO_UDP),
            Self::Sctp { .. } => Some(IP_PROTO_SCTP),
            Self::Icmpv4 { .. } => Some(IP_PROTO_ICMP),
            Self::Icmpv6 { .. } | Self::NdNs { .. } | Self::NdNa { .. } => {
                Some(IP_PROTO_ICMPV6)
            }
        }
    }

    fn emit(&self, f: &mut Vec<u8>) {
        match self {
            Self::None => {}

            Self::Tcp { src, dst } => {
                ports(f, *src, *dst);
                // seq, ack, data offset 5, flags, window, csum, urg
                f.extend_from_slice(&[0; 8]);
                f.extend_from_slice(&[0x50, 0x02, 0xff, 0xff, 0, 0, 0, 0]);
            }

            Self::Udp { src, dst } => {
                ports(f, *src, *dst);
                f.extend_from_slice(&8u16.to_be_bytes());
                f.extend_from_slice(&[0, 0]);
            }

            Self::Sctp { src, dst } => {
                ports(f, *src, *dst);
                f.extend_from_slice(&[0; 8]);
            }

            Self::Icmpv4 { ty, code } | Self::Icmpv6 { ty, code } => {
                f.extend_from_slice(&[*ty, *code, 0, 0, 0, 0, 0, 0]);
            }

            Self::NdNs { target, sll } => {
                nd(f, ICMPV6_ND_NS, target, sll.map(|m| (ND_OPT_SLL, m)));
            }

            Self::NdNa { target, tll } => {
                nd(f, ICMPV6_ND_NA, target, tll.map(|m| (ND_OPT_TLL, m)));
            }
        }
    }
}

fn ports(f: &mut Vec<u8>, src: u16, dst: u16) {
    f.extend_from_slice(&src.to_be_bytes());
    f.extend_from_slice(&dst.to_be_bytes());
}

fn nd(f: &mut Vec<u8>, ty: u8, target: &Ipv6Addr, opt: Option<(u8, MacAddr)>) {
    f.extend_from_slice(&[ty, 0, 0, 0, 0, 0, 0, 0]);
    f.extend_from_slice(&target.bytes());
    if let Some((kind, mac)) = opt {
        f.extend_from_slice(&[kind, 1]);
        f.extend_from_slice(&mac.bytes());
    }
}

#[derive(Clone, Debug)]
pub struct FrameBuilder {
    dst: MacAddr,
    src: MacAddr,
    /// (TPID, TCI) of each tag, outermost first.
    vlans: Vec<(u16, u16)>,
    pbb_isid: Option<u32>,
    /// (label, TC) of each entry, outermost first.
    mpls: Vec<(u32, u8)>,
    l3: L3,
    dscp: u8,
    ecn: u8,
    ip_proto: Option<u8>,
    later_fragment: bool,
    l4: L4,
}

impl Default for FrameBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameBuilder {
    /// An Ethernet frame with the experimental ethertype and no payload.
    pub fn new() -> Self {
        Self {
            dst: DST_MAC,
            src: SRC_MAC,
            vlans: Vec::new(),
            pbb_isid: None,
            mpls: Vec::new(),
            l3: L3::Raw(0x88b5),
            dscp: 0,
            ecn: 0,
            ip_proto: None,
            later_fragment: false,
            l4: L4::None,
        }
    }

    pub fn eth(mut self, dst: MacAddr, src: MacAddr) -> Self {
        self.dst = dst;
        self.src = src;
        self
    }

    pub fn ether_type(mut self, ether_type: u16) -> Self {
        self.l3 = L3::Raw(ether_type);
        self
    }

    /// Push a customer VLAN tag inside any tags already added.
    pub fn vlan(mut self, vid: u16, pcp: u8) -> Self {
        let tci = (u16::from(pcp) << 13) | (vid & 0x0fff);
        self.vlans.push((ETHER_TYPE_VLAN, tci));
        self
    }

    /// Push a service tag inside any tags already added.
    pub fn qinq(mut self, vid: u16) -> Self {
        self.vlans.push((ETHER_TYPE_QINQ, vid & 0x0fff));
        self
    }

    pub fn pbb(mut self, isid: u32) -> Self {
        self.pbb_isid = Some(isid);
        self
    }

    /// Push a label stack entry below any already added.
    pub fn mpls(mut self, label: u32, tc: u8) -> Self {
        self.mpls.push((label, tc));
        self
    }

    pub fn ipv4(mut self, src: Ipv4Addr, dst: Ipv4Addr) -> Self {
        self.l3 = L3::Ipv4 { src, dst };
        self
    }

    pub fn ipv6(mut self, src: Ipv6Addr, dst: Ipv6Addr) -> Self {
        self.l3 = L3::Ipv6 { src, dst, flabel: 0, ext: Vec::new() };
        self
    }

    pub fn arp(
        mut self,
        op: u16,
        sha: MacAddr,
        spa: Ipv4Addr,
        tha: MacAddr,
        tpa: Ipv4Addr,
    ) -> Self {
        self.l3 = L3::Arp { op, sha, spa, tha, tpa };
        self
    }

    pub fn dscp_ecn(mut self, dscp: u8, ecn: u8) -> Self {
        self.dscp = dscp & 0x3f;
        self.ecn = ecn & 0x3;
        self
    }

    /// Set the IPv6 flow label; no effect on other frames.
    pub fn flabel(mut self, label: u32) -> Self {
        if let L3::Ipv6 { flabel, .. } = &mut self.l3 {
            *flabel = label & 0x000f_ffff;
        }
        self
    }

    /// Append an IPv6 extension header; no effect on other frames.
    pub fn ipv6_ext(mut self, next_hdr: u8) -> Self {
        if let L3::Ipv6 { ext, .. } = &mut self.l3 {
            ext.push(next_hdr);
        }
        self
    }

    /// Override the IP protocol implied by the transport header.
    pub fn ip_proto(mut self, proto: u8) -> Self {
        self.ip_proto = Some(proto);
        self
    }

    /// Mark the packet as a non-initial fragment.
    pub fn later_fragment(mut self) -> Self {
        self.later_fragment = true;
        self
    }

    pub fn tcp(mut self, src: u16, dst: u16) -> Self {
        self.l4 = L4::Tcp { src, dst };
        self
    }

    pub fn udp(mut self, src: u16, dst: u16) -> Self {
        self.l4 = L4::Udp { src, dst };
        self
    }

    pub fn sctp(mut self, src: u16, dst: u16) -> Self {
        self.l4 = L4::Sctp { src, dst };
        self
    }

    pub fn icmpv4(mut self, ty: u8, code: u8) -> Self {
        self.l4 = L4::Icmpv4 { ty, code };
        self
    }

    pub fn icmpv6(mut self, ty: u8, code: u8) -> Self {
        self.l4 = L4::Icmpv6 { ty, code };
        self
    }

    pub fn nd_ns(mut self, target: Ipv6Addr, sll: Option<MacAddr>) -> Self {
        self.l4 = L4::NdNs { target, sll };
        self
    }

    pub fn nd_na(mut self, target: Ipv6Addr, tll: Option<MacAddr>) -> Self {
        self.l4 = L4::NdNa { target, tll };
        self
    }

    fn l3_type(&self) -> u16 {
        match &self.l3 {
            L3::Raw(ty) => *ty,
            L3::Ipv4 { .. } => ETHER_TYPE_IPV4,
            L3::Ipv6 { .. } => ETHER_TYPE_IPV6,
            L3::Arp { .. } => ETHER_TYPE_ARP,
        }
    }

    fn proto(&self) -> u8 {
        self.ip_proto
            .or(self.l4.proto())
            .unwrap_or(IP_PROTO_EXPERIMENTAL)
    }

    pub fn build(&self) -> Vec<u8> {
        let mut f = Vec::with_capacity(128);
        f.extend_from_slice(&self.dst.bytes());
        f.extend_from_slice(&self.src.bytes());

        let below_pbb =
            if self.mpls.is_empty() { self.l3_type() } else { ETHER_TYPE_MPLS };
        let below_vlan =
            if self.pbb_isid.is_some() { ETHER_TYPE_PBB } else { below_pbb };

        let mut types: Vec<u16> = self.vlans.iter().map(|v| v.0).collect();
        types.push(below_vlan);
        f.extend_from_slice(&types[0].to_be_bytes());
        for (i, (_, tci)) in self.vlans.iter().enumerate() {
            f.extend_from_slice(&tci.to_be_bytes());
            f.extend_from_slice(&types[i + 1].to_be_bytes());
        }

        if let Some(isid) = self.pbb_isid {
            f.push(0);
            f.extend_from_slice(&isid.to_be_bytes()[1..]);
            f.extend_from_slice(&DST_MAC.bytes());
            f.extend_from_slice(&SRC_MAC.bytes());
            f.extend_from_slice(&below_pbb.to_be_bytes());
        }

        for (i, (label, tc)) in self.mpls.iter().enumerate() {
            let bos = u32::from(i == self.mpls.len() - 1);
            let lse = ((label & 0x000f_ffff) << 12)
                | (u32::from(tc & 0x7) << 9)
                | (bos << 8)
                | 64;
            f.extend_from_slice(&lse.to_be_bytes());
        }

        let mut l4 = Vec::new();
        self.l4.emit(&mut l4);
        self.emit_l3(&mut f, &l4);
        f
    }

    fn emit_l3(&self, f: &mut Vec<u8>, l4: &[u8]) {
        let tos = (self.dscp << 2) | self.ecn;

        match &self.l3 {
            L3::Raw(_) => {}

            L3::Ipv4 { src, dst } => {
                let total = (IPV4_HDR_SZ + l4.len()) as u16;
                // A fragment offset of one 8-byte unit.
                let frag: u16 = if self.later_fragment { 1 } else { 0 };
                f.extend_from_slice(&[0x45, tos]);
                f.extend_from_slice(&total.to_be_bytes());
                f.extend_from_slice(&[0, 0]);
                f.extend_from_slice(&frag.to_be_bytes());
                f.extend_from_slice(&[64, self.proto(), 0, 0]);
                f.extend_from_slice(&src.bytes());
                f.extend_from_slice(&dst.bytes());
                if !self.later_fragment {
                    f.extend_from_slice(l4);
                }
            }

            L3::Ipv6 { src, dst, flabel, ext } => {
                let vcf = (6u32 << 28) | (u32::from(tos) << 20) | flabel;
                let mut chain = ext.clone();
                if self.later_fragment && !chain.contains(&IP_PROTO_IPV6_FRAG)
                {
                    chain.push(IP_PROTO_IPV6_FRAG);
                }

                let proto = self.proto();
                let mut body = Vec::new();
                for (i, hdr) in chain.iter().enumerate() {
                    let next = chain.get(i + 1).copied().unwrap_or(proto);
                    match *hdr {
                        IP_PROTO_ESP | IP_PROTO_IPV6_NONXT => break,
                        IP_PROTO_IPV6_FRAG => {
                            let off: u16 =
                                if self.later_fragment { 1 << 3 } else { 0 };
                            body.extend_from_slice(&[next, 0]);
                            body.extend_from_slice(&off.to_be_bytes());
                            body.extend_from_slice(&[0; 4]);
                        }
                        // Eight bytes for every other extension header
                        // with a zero length field, AH included.
                        _ => {
                            body.extend_from_slice(&[next, 0]);
                            body.extend_from_slice(&[0; 6]);
                        }
                    }
                }
                if !self.later_fragment {
                    body.extend_from_slice(l4);
                }

                let first = chain.first().copied().unwrap_or(proto);
                f.extend_from_slice(&vcf.to_be_bytes());
                f.extend_from_slice(&(body.len() as u16).to_be_bytes());
                f.extend_from_slice(&[first, 64]);
                f.extend_from_slice(&src.bytes());
                f.extend_from_slice(&dst.bytes());
                f.extend_from_slice(&body);
            }

            L3::Arp { op, sha, spa, tha, tpa } => {
                f.extend_from_slice(&1u16.to_be_bytes());
                f.extend_from_slice(&ETHER_TYPE_IPV4.to_be_bytes());
                f.extend_from_slice(&[6, 4]);
                f.extend_from_slice(&op.to_be_bytes());
                f.extend_from_slice(&sha.bytes());
                f.extend_from_slice(&spa.bytes());
                f.extend_from_slice(&tha.bytes());
                f.extend_from_slice(&tpa.bytes());
            }
        }
    }
}
