// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! OpenFlow Extensible Match (OXM) fields and match predicates.

use super::ClassifierError;
use super::Ipv4Addr;
use super::Ipv4Cidr;
use super::Ipv6Addr;
use super::Ipv6Cidr;
use super::MacAddr;
use super::Result;
use core::fmt;
use core::fmt::Display;
use serde::Deserialize;
use serde::Serialize;

/// The longest value (or mask) of any OXM field: an IPv6 address.
pub const OXM_MAX_LEN: usize = 16;

/// The VID-present bit of the `VLAN_VID` field.
pub const OFPVID_PRESENT: u16 = 0x1000;

/// The `VLAN_VID` value matching packets without an 802.1Q tag.
pub const OFPVID_NONE: u16 = 0x0000;

/// IPv6 extension header pseudo-field flags, as carried by
/// [`OxmField::Ipv6Exthdr`].
pub mod ieh {
    pub const NONEXT: u16 = 1 << 0;
    pub const ESP: u16 = 1 << 1;
    pub const AUTH: u16 = 1 << 2;
    pub const DEST: u16 = 1 << 3;
    pub const FRAG: u16 = 1 << 4;
    pub const ROUTER: u16 = 1 << 5;
    pub const HOP: u16 = 1 << 6;
    pub const UNREP: u16 = 1 << 7;
    pub const UNSEQ: u16 = 1 << 8;
}

/// The OpenFlow basic-class OXM match fields, numbered as on the wire.
#[repr(u8)]
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
#[serde(rename_all = "snake_case")]
pub enum OxmField {
    InPort = 0,
    InPhyPort = 1,
    Metadata = 2,
    EthDst = 3,
    EthSrc = 4,
    EthType = 5,
    VlanVid = 6,
    VlanPcp = 7,
    IpDscp = 8,
    IpEcn = 9,
    IpProto = 10,
    Ipv4Src = 11,
    Ipv4Dst = 12,
    TcpSrc = 13,
    TcpDst = 14,
    UdpSrc = 15,
    UdpDst = 16,
    SctpSrc = 17,
    SctpDst = 18,
    Icmpv4Type = 19,
    Icmpv4Code = 20,
    ArpOp = 21,
    ArpSpa = 22,
    ArpTpa = 23,
    ArpSha = 24,
    ArpTha = 25,
    Ipv6Src = 26,
    Ipv6Dst = 27,
    Ipv6Flabel = 28,
    Icmpv6Type = 29,
    Icmpv6Code = 30,
    Ipv6NdTarget = 31,
    Ipv6NdSll = 32,
    Ipv6NdTll = 33,
    MplsLabel = 34,
    MplsTc = 35,
    MplsBos = 36,
    PbbIsid = 37,
    TunnelId = 38,
    Ipv6Exthdr = 39,
}

impl OxmField {
    pub const COUNT: usize = 40;

    pub const ALL: [OxmField; Self::COUNT] = {
        use OxmField::*;
        [
            InPort, InPhyPort, Metadata, EthDst, EthSrc, EthType, VlanVid,
            VlanPcp, IpDscp, IpEcn, IpProto, Ipv4Src, Ipv4Dst, TcpSrc, TcpDst,
            UdpSrc, UdpDst, SctpSrc, SctpDst, Icmpv4Type, Icmpv4Code, ArpOp,
            ArpSpa, ArpTpa, ArpSha, ArpTha, Ipv6Src, Ipv6Dst, Ipv6Flabel,
            Icmpv6Type, Icmpv6Code, Ipv6NdTarget, Ipv6NdSll, Ipv6NdTll,
            MplsLabel, MplsTc, MplsBos, PbbIsid, TunnelId, Ipv6Exthdr,
        ]
    };

    /// The canonical width of the field's value (and mask) in bytes.
    pub const fn width(self) -> usize {
        use OxmField::*;

        match self {
            VlanPcp | IpDscp | IpEcn | IpProto | Icmpv4Type | Icmpv4Code
            | Icmpv6Type | Icmpv6Code | MplsTc | MplsBos => 1,

            EthType | VlanVid | TcpSrc | TcpDst | UdpSrc | UdpDst
            | SctpSrc | SctpDst | ArpOp | Ipv6Exthdr => 2,

            PbbIsid => 3,

            InPort | InPhyPort | Ipv4Src | Ipv4Dst | ArpSpa | ArpTpa
            | Ipv6Flabel | MplsLabel => 4,

            EthDst | EthSrc | ArpSha | ArpTha | Ipv6NdSll | Ipv6NdTll => 6,

            Metadata | TunnelId => 8,

            Ipv6Src | Ipv6Dst | Ipv6NdTarget => 16,
        }
    }

    /// Whether OpenFlow allows a mask for this field.
    pub const fn maskable(self) -> bool {
        use OxmField::*;

        matches!(
            self,
            Metadata
                | EthDst
                | EthSrc
                | VlanVid
                | Ipv4Src
                | Ipv4Dst
                | ArpSpa
                | ArpTpa
                | ArpSha
                | ArpTha
                | Ipv6Src
                | Ipv6Dst
                | Ipv6Flabel
                | PbbIsid
                | TunnelId
                | Ipv6Exthdr
        )
    }

    /// The bits of the big-endian value that the field can carry.
    pub const fn value_bits(self) -> u128 {
        use OxmField::*;

        match self {
            VlanVid => 0x1fff,
            VlanPcp | MplsTc => 0x07,
            IpDscp => 0x3f,
            IpEcn => 0x03,
            MplsBos => 0x01,
            Ipv6Flabel | MplsLabel => 0x000f_ffff,
            Ipv6Exthdr => 0x01ff,
            _ => width_bits(self.width()),
        }
    }

    /// This field's bit in a [`FieldSet`].
    pub const fn bit(self) -> u64 {
        1 << self as u8
    }

    pub const fn name(self) -> &'static str {
        use OxmField::*;

        match self {
            InPort => "in_port",
            InPhyPort => "in_phy_port",
            Metadata => "metadata",
            EthDst => "eth_dst",
            EthSrc => "eth_src",
            EthType => "eth_type",
            VlanVid => "vlan_vid",
            VlanPcp => "vlan_pcp",
            IpDscp => "ip_dscp",
            IpEcn => "ip_ecn",
            IpProto => "ip_proto",
            Ipv4Src => "ipv4_src",
            Ipv4Dst => "ipv4_dst",
            TcpSrc => "tcp_src",
            TcpDst => "tcp_dst",
            UdpSrc => "udp_src",
            UdpDst => "udp_dst",
            SctpSrc => "sctp_src",
            SctpDst => "sctp_dst",
            Icmpv4Type => "icmpv4_type",
            Icmpv4Code => "icmpv4_code",
            ArpOp => "arp_op",
            ArpSpa => "arp_spa",
            ArpTpa => "arp_tpa",
            ArpSha => "arp_sha",
            ArpTha => "arp_tha",
            Ipv6Src => "ipv6_src",
            Ipv6Dst => "ipv6_dst",
            Ipv6Flabel => "ipv6_flabel",
            Icmpv6Type => "icmpv6_type",
            Icmpv6Code => "icmpv6_code",
            Ipv6NdTarget => "ipv6_nd_target",
            Ipv6NdSll => "ipv6_nd_sll",
            Ipv6NdTll => "ipv6_nd_tll",
            MplsLabel => "mpls_label",
            MplsTc => "mpls_tc",
            MplsBos => "mpls_bos",
            PbbIsid => "pbb_isid",
            TunnelId => "tunnel_id",
            Ipv6Exthdr => "ipv6_exthdr",
        }
    }
}

impl TryFrom<u8> for OxmField {
    type Error = ClassifierError;

    fn try_from(raw: u8) -> Result<Self> {
        Self::ALL
            .get(usize::from(raw))
            .copied()
            .ok_or(ClassifierError::InvalidField(raw))
    }
}

impl Display for OxmField {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

const fn width_bits(width: usize) -> u128 {
    if width >= OXM_MAX_LEN {
        u128::MAX
    } else {
        (1u128 << (width * 8)) - 1
    }
}

/// A set of [`OxmField`]s, one bit per field.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Deserialize,
    Eq,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
)]
pub struct FieldSet(u64);

impl FieldSet {
    pub const EMPTY: Self = Self(0);

    pub const fn bits(self) -> u64 {
        self.0
    }

    pub const fn contains(self, field: OxmField) -> bool {
        self.0 & field.bit() != 0
    }

    pub const fn with(self, field: OxmField) -> Self {
        Self(self.0 | field.bit())
    }

    pub fn insert(&mut self, field: OxmField) -> bool {
        let present = self.contains(field);
        self.0 |= field.bit();
        !present
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    /// Iterate the fields in canonical (wire id) order.
    pub fn iter(self) -> impl Iterator<Item = OxmField> {
        OxmField::ALL.into_iter().filter(move |f| self.contains(*f))
    }
}

impl FromIterator<OxmField> for FieldSet {
    fn from_iter<I: IntoIterator<Item = OxmField>>(iter: I) -> Self {
        let mut set = Self::EMPTY;
        for f in iter {
            set.insert(f);
        }
        set
    }
}

type OxmBytes = heapless::Vec<u8, OXM_MAX_LEN>;

/// A single field constraint of a flow: the packet's value of `field`,
/// ANDed with `mask` when one is present, must equal `value`.
///
/// Predicates are normalized on construction: value bits outside the
/// mask are cleared, and a mask covering every bit of the field is
/// dropped in favor of an exact match. Two predicates matching the same
/// packets therefore compare equal. Deserialization runs the same
/// checks as [`MatchPredicate::from_raw()`].
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(try_from = "RawPredicate")]
pub struct MatchPredicate {
    field: OxmField,
    value: OxmBytes,
    mask: Option<OxmBytes>,
}

impl MatchPredicate {
    /// Create an exact match of `field` on `value`.
    ///
    /// # Errors
    ///
    /// * [`ClassifierError::InvalidLength`]: `value` is not the
    ///   field's canonical width.
    /// * [`ClassifierError::ValueOutOfRange`]: `value` sets bits the
    ///   field cannot carry.
    pub fn new(field: OxmField, value: &[u8]) -> Result<Self> {
        let value = Self::check_len(field, value)?;
        if value & !field.value_bits() != 0 {
            return Err(ClassifierError::ValueOutOfRange(field));
        }

        Ok(Self { field, value: to_bytes(value, field.width()), mask: None })
    }

    /// Create a masked match of `field`.
    ///
    /// # Errors
    ///
    /// As [`MatchPredicate::new()`], plus
    /// [`ClassifierError::UnsupportedMask`] when the field takes no
    /// mask.
    pub fn new_masked(
        field: OxmField,
        value: &[u8],
        mask: &[u8],
    ) -> Result<Self> {
        if !field.maskable() {
            return Err(ClassifierError::UnsupportedMask(field));
        }

        let value = Self::check_len(field, value)?;
        let mask = Self::check_len(field, mask)? & field.value_bits();
        if value & !field.value_bits() != 0 {
            return Err(ClassifierError::ValueOutOfRange(field));
        }

        let width = field.width();
        if mask == field.value_bits() {
            return Ok(Self {
                field,
                value: to_bytes(value, width),
                mask: None,
            });
        }

        Ok(Self {
            field,
            value: to_bytes(value & mask, width),
            mask: Some(to_bytes(mask, width)),
        })
    }

    /// Create a predicate from a raw OXM field id, as decoded from a
    /// flow-mod.
    pub fn from_raw(
        field: u8,
        value: &[u8],
        mask: Option<&[u8]>,
    ) -> Result<Self> {
        let field = OxmField::try_from(field)?;
        match mask {
            Some(mask) => Self::new_masked(field, value, mask),
            None => Self::new(field, value),
        }
    }

    fn check_len(field: OxmField, bytes: &[u8]) -> Result<u128> {
        if bytes.len() != field.width() {
            return Err(ClassifierError::InvalidLength {
                field,
                expected: field.width(),
                actual: bytes.len(),
            });
        }

        Ok(bytes.iter().fold(0u128, |acc, b| (acc << 8) | u128::from(*b)))
    }

    /// Check that the predicate is one the constructors could have
    /// produced.
    ///
    /// # Errors
    ///
    /// As [`MatchPredicate::new_masked()`], plus
    /// [`ClassifierError::UnnormalizedMatch`] when the value has bits
    /// outside its mask or the mask covers the whole field.
    pub fn validate(&self) -> Result<()> {
        let canonical = match &self.mask {
            Some(mask) => Self::new_masked(self.field, &self.value, mask)?,
            None => Self::new(self.field, &self.value)?,
        };
        if canonical != *self {
            return Err(ClassifierError::UnnormalizedMatch(self.field));
        }
        Ok(())
    }

    pub fn field(&self) -> OxmField {
        self.field
    }

    pub fn value(&self) -> &[u8] {
        &self.value
    }

    pub fn mask(&self) -> Option<&[u8]> {
        self.mask.as_deref()
    }

    pub fn is_masked(&self) -> bool {
        self.mask.is_some()
    }

    /// The value as a big-endian integer.
    pub fn value_u128(&self) -> u128 {
        from_bytes(&self.value)
    }

    /// The mask as a big-endian integer; exact matches report every
    /// bit the field carries.
    pub fn mask_u128(&self) -> u128 {
        match &self.mask {
            Some(m) => from_bytes(m),
            None => self.field.value_bits(),
        }
    }

    /// Does a field value taken from a packet satisfy the predicate?
    pub fn accepts(&self, packet_value: u128) -> bool {
        packet_value & self.mask_u128() == self.value_u128()
    }

    fn exact(field: OxmField, value: u128) -> Self {
        debug_assert!(
            value & !field.value_bits() == 0,
            "value {value:#x} out of range for {field}"
        );
        Self {
            field,
            value: to_bytes(value & field.value_bits(), field.width()),
            mask: None,
        }
    }

    fn masked(field: OxmField, value: u128, mask: u128) -> Self {
        debug_assert!(
            value & !field.value_bits() == 0,
            "value {value:#x} out of range for {field}"
        );
        let mask = mask & field.value_bits();
        if mask == field.value_bits() {
            return Self::exact(field, value);
        }
        let width = field.width();
        Self {
            field,
            value: to_bytes(value & mask, width),
            mask: Some(to_bytes(mask, width)),
        }
    }
}

/// The serialized form of a [`MatchPredicate`], validated on its way
/// in.
#[derive(Deserialize)]
struct RawPredicate {
    field: OxmField,
    value: OxmBytes,
    mask: Option<OxmBytes>,
}

impl TryFrom<RawPredicate> for MatchPredicate {
    type Error = ClassifierError;

    fn try_from(raw: RawPredicate) -> Result<Self> {
        match raw.mask {
            Some(mask) => Self::new_masked(raw.field, &raw.value, &mask),
            None => Self::new(raw.field, &raw.value),
        }
    }
}

// Typed constructors. A value out of the field's range is a caller bug:
// debug builds panic, release builds keep only the bits the field
// carries. Values from the wire go through `from_raw`.
impl MatchPredicate {
    pub fn in_port(port: u32) -> Self {
        Self::exact(OxmField::InPort, port.into())
    }

    pub fn in_phy_port(port: u32) -> Self {
        Self::exact(OxmField::InPhyPort, port.into())
    }

    pub fn metadata(val: u64) -> Self {
        Self::exact(OxmField::Metadata, val.into())
    }

    pub fn metadata_masked(val: u64, mask: u64) -> Self {
        Self::masked(OxmField::Metadata, val.into(), mask.into())
    }

    pub fn eth_dst(mac: MacAddr) -> Self {
        Self::exact(OxmField::EthDst, mac_u128(mac))
    }

    pub fn eth_dst_masked(mac: MacAddr, mask: MacAddr) -> Self {
        Self::masked(OxmField::EthDst, mac_u128(mac), mac_u128(mask))
    }

    pub fn eth_src(mac: MacAddr) -> Self {
        Self::exact(OxmField::EthSrc, mac_u128(mac))
    }

    pub fn eth_src_masked(mac: MacAddr, mask: MacAddr) -> Self {
        Self::masked(OxmField::EthSrc, mac_u128(mac), mac_u128(mask))
    }

    pub fn eth_type(ether_type: u16) -> Self {
        Self::exact(OxmField::EthType, ether_type.into())
    }

    /// Match packets tagged with VLAN `vid`.
    pub fn vlan_vid(vid: u16) -> Self {
        debug_assert!(vid < OFPVID_PRESENT, "VLAN id {vid} out of range");
        Self::exact(OxmField::VlanVid, u128::from(vid | OFPVID_PRESENT))
    }

    /// Match packets carrying no VLAN tag.
    pub fn vlan_none() -> Self {
        Self::exact(OxmField::VlanVid, u128::from(OFPVID_NONE))
    }

    /// Match `VLAN_VID` with an explicit value and mask, both including
    /// the [`OFPVID_PRESENT`] bit as the control plane sent them.
    pub fn vlan_vid_masked(val: u16, mask: u16) -> Self {
        Self::masked(OxmField::VlanVid, val.into(), mask.into())
    }

    pub fn vlan_pcp(pcp: u8) -> Self {
        Self::exact(OxmField::VlanPcp, pcp.into())
    }

    pub fn ip_dscp(dscp: u8) -> Self {
        Self::exact(OxmField::IpDscp, dscp.into())
    }

    pub fn ip_ecn(ecn: u8) -> Self {
        Self::exact(OxmField::IpEcn, ecn.into())
    }

    pub fn ip_proto(proto: u8) -> Self {
        Self::exact(OxmField::IpProto, proto.into())
    }

    pub fn ipv4_src(ip: Ipv4Addr) -> Self {
        Self::exact(OxmField::Ipv4Src, u32::from(ip).into())
    }

    pub fn ipv4_src_masked(ip: Ipv4Addr, mask: Ipv4Addr) -> Self {
        let (ip, mask) = (u32::from(ip).into(), u32::from(mask).into());
        Self::masked(OxmField::Ipv4Src, ip, mask)
    }

    pub fn ipv4_src_prefix(cidr: Ipv4Cidr) -> Self {
        Self::ipv4_src_masked(cidr.ip(), cidr.netmask())
    }

    pub fn ipv4_dst(ip: Ipv4Addr) -> Self {
        Self::exact(OxmField::Ipv4Dst, u32::from(ip).into())
    }

    pub fn ipv4_dst_masked(ip: Ipv4Addr, mask: Ipv4Addr) -> Self {
        let (ip, mask) = (u32::from(ip).into(), u32::from(mask).into());
        Self::masked(OxmField::Ipv4Dst, ip, mask)
    }

    pub fn ipv4_dst_prefix(cidr: Ipv4Cidr) -> Self {
        Self::ipv4_dst_masked(cidr.ip(), cidr.netmask())
    }

    pub fn tcp_src(port: u16) -> Self {
        Self::exact(OxmField::TcpSrc, port.into())
    }

    pub fn tcp_dst(port: u16) -> Self {
        Self::exact(OxmField::TcpDst, port.into())
    }

    pub fn udp_src(port: u16) -> Self {
        Self::exact(OxmField::UdpSrc, port.into())
    }

    pub fn udp_dst(port: u16) -> Self {
        Self::exact(OxmField::UdpDst, port.into())
    }

    pub fn sctp_src(port: u16) -> Self {
        Self::exact(OxmField::SctpSrc, port.into())
    }

    pub fn sctp_dst(port: u16) -> Self {
        Self::exact(OxmField::SctpDst, port.into())
    }

    pub fn icmpv4_type(ty: u8) -> Self {
        Self::exact(OxmField::Icmpv4Type, ty.into())
    }

    pub fn icmpv4_code(code: u8) -> Self {
        Self::exact(OxmField::Icmpv4Code, code.into())
    }

    pub fn arp_op(op: u16) -> Self {
        Self::exact(OxmField::ArpOp, op.into())
    }

    pub fn arp_spa(ip: Ipv4Addr) -> Self {
        Self::exact(OxmField::ArpSpa, u32::from(ip).into())
    }

    pub fn arp_spa_prefix(cidr: Ipv4Cidr) -> Self {
        let (ip, mask) = (cidr.ip(), cidr.netmask());
        Self::masked(
            OxmField::ArpSpa,
            u32::from(ip).into(),
            u32::from(mask).into(),
        )
    }

    pub fn arp_tpa(ip: Ipv4Addr) -> Self {
        Self::exact(OxmField::ArpTpa, u32::from(ip).into())
    }

    pub fn arp_tpa_prefix(cidr: Ipv4Cidr) -> Self {
        let (ip, mask) = (cidr.ip(), cidr.netmask());
        Self::masked(
            OxmField::ArpTpa,
            u32::from(ip).into(),
            u32::from(mask).into(),
        )
    }

    pub fn arp_sha(mac: MacAddr) -> Self {
        Self::exact(OxmField::ArpSha, mac_u128(mac))
    }

    pub fn arp_tha(mac: MacAddr) -> Self {
        Self::exact(OxmField::ArpTha, mac_u128(mac))
    }

    pub fn ipv6_src(ip: Ipv6Addr) -> Self {
        Self::exact(OxmField::Ipv6Src, u128::from_be_bytes(ip.bytes()))
    }

    pub fn ipv6_src_prefix(cidr: Ipv6Cidr) -> Self {
        let ip = u128::from_be_bytes(cidr.ip().bytes());
        let mask = u128::from_be_bytes(cidr.netmask().bytes());
        Self::masked(OxmField::Ipv6Src, ip, mask)
    }

    pub fn ipv6_dst(ip: Ipv6Addr) -> Self {
        Self::exact(OxmField::Ipv6Dst, u128::from_be_bytes(ip.bytes()))
    }

    pub fn ipv6_dst_prefix(cidr: Ipv6Cidr) -> Self {
        let ip = u128::from_be_bytes(cidr.ip().bytes());
        let mask = u128::from_be_bytes(cidr.netmask().bytes());
        Self::masked(OxmField::Ipv6Dst, ip, mask)
    }

    pub fn ipv6_flabel(label: u32) -> Self {
        Self::exact(OxmField::Ipv6Flabel, label.into())
    }

    pub fn ipv6_flabel_masked(label: u32, mask: u32) -> Self {
        Self::masked(OxmField::Ipv6Flabel, label.into(), mask.into())
    }

    pub fn icmpv6_type(ty: u8) -> Self {
        Self::exact(OxmField::Icmpv6Type, ty.into())
    }

    pub fn icmpv6_code(code: u8) -> Self {
        Self::exact(OxmField::Icmpv6Code, code.into())
    }

    pub fn ipv6_nd_target(ip: Ipv6Addr) -> Self {
        Self::exact(OxmField::Ipv6NdTarget, u128::from_be_bytes(ip.bytes()))
    }

    pub fn ipv6_nd_sll(mac: MacAddr) -> Self {
        Self::exact(OxmField::Ipv6NdSll, mac_u128(mac))
    }

    pub fn ipv6_nd_tll(mac: MacAddr) -> Self {
        Self::exact(OxmField::Ipv6NdTll, mac_u128(mac))
    }

    pub fn mpls_label(label: u32) -> Self {
        Self::exact(OxmField::MplsLabel, label.into())
    }

    pub fn mpls_tc(tc: u8) -> Self {
        Self::exact(OxmField::MplsTc, tc.into())
    }

    pub fn mpls_bos(bos: bool) -> Self {
        Self::exact(OxmField::MplsBos, u128::from(bos))
    }

    pub fn pbb_isid(isid: u32) -> Self {
        Self::exact(OxmField::PbbIsid, isid.into())
    }

    pub fn pbb_isid_masked(isid: u32, mask: u32) -> Self {
        Self::masked(OxmField::PbbIsid, isid.into(), mask.into())
    }

    pub fn tunnel_id(id: u64) -> Self {
        Self::exact(OxmField::TunnelId, id.into())
    }

    pub fn tunnel_id_masked(id: u64, mask: u64) -> Self {
        Self::masked(OxmField::TunnelId, id.into(), mask.into())
    }

    pub fn ipv6_exthdr(flags: u16) -> Self {
        Self::exact(OxmField::Ipv6Exthdr, flags.into())
    }

    pub fn ipv6_exthdr_masked(flags: u16, mask: u16) -> Self {
        Self::masked(OxmField::Ipv6Exthdr, flags.into(), mask.into())
    }
}

fn mac_u128(mac: MacAddr) -> u128 {
    from_bytes(&mac.bytes())
}

fn from_bytes(bytes: &[u8]) -> u128 {
    bytes.iter().fold(0u128, |acc, b| (acc << 8) | u128::from(*b))
}

fn to_bytes(val: u128, width: usize) -> OxmBytes {
    let be = val.to_be_bytes();
    let mut out = OxmBytes::new();
    // The width never exceeds the capacity, so no push can fail.
    for b in &be[OXM_MAX_LEN - width.min(OXM_MAX_LEN)..] {
        let _ = out.push(*b);
    }
    out
}

fn fmt_value(
    f: &mut fmt::Formatter,
    field: OxmField,
    bytes: &[u8],
) -> fmt::Result {
    use OxmField::*;

    match field {
        EthDst | EthSrc | ArpSha | ArpTha | Ipv6NdSll | Ipv6NdTll => {
            match MacAddr::try_from(bytes) {
                Ok(mac) => write!(f, "{mac}"),
                Err(_) => write!(f, "{bytes:02x?}"),
            }
        }

        Ipv4Src | Ipv4Dst | ArpSpa | ArpTpa => {
            write!(f, "{}", Ipv4Addr::from(from_bytes(bytes) as u32))
        }

        Ipv6Src | Ipv6Dst | Ipv6NdTarget => {
            write!(f, "{}", Ipv6Addr::from(from_bytes(bytes).to_be_bytes()))
        }

        EthType | VlanVid | Metadata | TunnelId | Ipv6Exthdr => {
            write!(f, "0x{:0w$x}", from_bytes(bytes), w = field.width() * 2)
        }

        _ => write!(f, "{}", from_bytes(bytes)),
    }
}

impl Display for MatchPredicate {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}=", self.field)?;
        fmt_value(f, self.field, &self.value)?;
        if let Some(mask) = &self.mask {
            write!(f, "/")?;
            fmt_value(f, self.field, mask)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::string::ToString;

    #[test]
    fn field_ids_are_wire_ids() {
        for (i, f) in OxmField::ALL.iter().enumerate() {
            assert_eq!(*f as usize, i);
            assert_eq!(OxmField::try_from(i as u8).unwrap(), *f);
        }
        assert_eq!(
            OxmField::try_from(40),
            Err(ClassifierError::InvalidField(40))
        );
    }

    #[test]
    fn construction_is_validated() {
        assert_eq!(
            MatchPredicate::new(OxmField::Ipv4Dst, &[10, 0, 0]),
            Err(ClassifierError::InvalidLength {
                field: OxmField::Ipv4Dst,
                expected: 4,
                actual: 3,
            })
        );
        assert_eq!(
            MatchPredicate::new_masked(OxmField::IpProto, &[6], &[0xff]),
            Err(ClassifierError::UnsupportedMask(OxmField::IpProto))
        );
        assert_eq!(
            MatchPredicate::new(OxmField::VlanPcp, &[8]),
            Err(ClassifierError::ValueOutOfRange(OxmField::VlanPcp))
        );
        assert!(MatchPredicate::from_raw(34, &[0, 0x0f, 0xff, 0xff], None)
            .is_ok());
        assert_eq!(
            MatchPredicate::from_raw(34, &[0, 0x1f, 0xff, 0xff], None),
            Err(ClassifierError::ValueOutOfRange(OxmField::MplsLabel))
        );
    }

    #[test]
    fn masks_are_normalized() {
        let p = MatchPredicate::new_masked(
            OxmField::Ipv4Dst,
            &[10, 0, 0, 77],
            &[255, 255, 255, 0],
        )
        .unwrap();
        assert_eq!(p.value(), &[10, 0, 0, 0]);
        let net = "10.0.0.0/24".parse().unwrap();
        assert_eq!(p, MatchPredicate::ipv4_dst_prefix(net));

        // A full mask is an exact match.
        let p = MatchPredicate::new_masked(
            OxmField::Ipv4Dst,
            &[10, 0, 0, 77],
            &[255; 4],
        )
        .unwrap();
        assert!(!p.is_masked());
        assert_eq!(p, MatchPredicate::ipv4_dst("10.0.0.77".parse().unwrap()));

        // The VID-present bit alone matches any tagged packet.
        let p = MatchPredicate::vlan_vid_masked(OFPVID_PRESENT, OFPVID_PRESENT);
        assert!(p.accepts(u128::from(100 | OFPVID_PRESENT)));
        assert!(!p.accepts(0));
    }

    #[test]
    fn deserialization_is_validated() {
        let json = concat!(
            r#"{"field":"ipv4_dst","value":[10,0,0,5],"#,
            r#""mask":[255,255,255,0]}"#,
        );
        let p: MatchPredicate = serde_json::from_str(json).unwrap();
        assert_eq!(p.value(), &[10, 0, 0, 0]);
        let net = "10.0.0.0/24".parse().unwrap();
        assert_eq!(p, MatchPredicate::ipv4_dst_prefix(net));

        let bad = [
            r#"{"field":"in_port","value":[0,0,0,7],"mask":[0,0,0,0]}"#,
            r#"{"field":"ipv4_dst","value":[10,0,0],"mask":null}"#,
            r#"{"field":"vlan_pcp","value":[9],"mask":null}"#,
        ];
        for json in bad {
            assert!(serde_json::from_str::<MatchPredicate>(json).is_err());
        }

        let json = serde_json::to_string(&p).unwrap();
        assert_eq!(serde_json::from_str::<MatchPredicate>(&json).unwrap(), p);
    }

    #[test]
    fn validate_catches_unnormalized_state() {
        let p = MatchPredicate {
            field: OxmField::Ipv4Dst,
            value: to_bytes(0x0a00_0005, 4),
            mask: Some(to_bytes(0xffff_ff00, 4)),
        };
        assert_eq!(
            p.validate(),
            Err(ClassifierError::UnnormalizedMatch(OxmField::Ipv4Dst))
        );

        let p = MatchPredicate {
            field: OxmField::InPort,
            value: to_bytes(7, 4),
            mask: Some(to_bytes(0, 4)),
        };
        assert_eq!(
            p.validate(),
            Err(ClassifierError::UnsupportedMask(OxmField::InPort))
        );

        assert!(MatchPredicate::vlan_vid(100).validate().is_ok());
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "out of range")]
    fn vlan_id_out_of_range() {
        let _ = MatchPredicate::vlan_vid(5000);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "out of range")]
    fn pcp_out_of_range() {
        let _ = MatchPredicate::vlan_pcp(8);
    }

    #[test]
    fn display() {
        let p = MatchPredicate::ipv4_dst_prefix("10.0.0.0/24".parse().unwrap());
        assert_eq!(p.to_string(), "ipv4_dst=10.0.0.0/255.255.255.0");
        assert_eq!(
            MatchPredicate::eth_type(0x0800).to_string(),
            "eth_type=0x0800"
        );
        let vid = MatchPredicate::vlan_vid(100);
        assert_eq!(vid.to_string(), "vlan_vid=0x1064");
        assert_eq!(MatchPredicate::tcp_dst(443).to_string(), "tcp_dst=443");
    }

    #[test]
    fn field_set() {
        let set: FieldSet =
            [OxmField::Ipv4Dst, OxmField::EthType, OxmField::InPort]
                .into_iter()
                .collect();
        assert_eq!(set.len(), 3);
        assert!(set.contains(OxmField::EthType));
        assert!(!set.contains(OxmField::Ipv4Src));
        let order: std::vec::Vec<_> = set.iter().collect();
        assert_eq!(
            order,
            [OxmField::InPort, OxmField::EthType, OxmField::Ipv4Dst]
        );
        let name = OxmField::Ipv6NdTarget.to_string();
        assert_eq!(name, "ipv6_nd_target");
    }
}
