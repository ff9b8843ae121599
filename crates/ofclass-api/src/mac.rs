// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

use alloc::str::FromStr;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;
use core::fmt::Debug;
use core::fmt::Display;
use serde::Deserialize;
use serde::Serialize;

pub const ETHER_ADDR_LEN: usize = 6;

/// A MAC address, as found in the Ethernet, ARP and NDP match fields.
#[derive(
    Clone,
    Copy,
    Default,
    Deserialize,
    Eq,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
    Hash,
)]
pub struct MacAddr {
    inner: [u8; ETHER_ADDR_LEN],
}

impl MacAddr {
    pub const BROADCAST: Self = Self { inner: [0xFF; ETHER_ADDR_LEN] };
    pub const ZERO: Self = Self { inner: [0x00; ETHER_ADDR_LEN] };

    /// Return the bytes of the MAC address.
    #[inline]
    pub fn bytes(&self) -> [u8; ETHER_ADDR_LEN] {
        self.inner
    }

    pub const fn from_const(bytes: [u8; ETHER_ADDR_LEN]) -> Self {
        Self { inner: bytes }
    }

    /// Is the group (multicast) bit set?
    pub fn is_multicast(&self) -> bool {
        self.inner[0] & 0x01 != 0
    }
}

impl From<[u8; ETHER_ADDR_LEN]> for MacAddr {
    fn from(bytes: [u8; ETHER_ADDR_LEN]) -> Self {
        Self { inner: bytes }
    }
}

impl TryFrom<&[u8]> for MacAddr {
    type Error = String;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let inner: [u8; ETHER_ADDR_LEN] = bytes
            .try_into()
            .map_err(|_| {
                format!("incorrect number of bytes: {}", bytes.len())
            })?;
        Ok(Self { inner })
    }
}

impl AsRef<[u8]> for MacAddr {
    fn as_ref(&self) -> &[u8] {
        &self.inner
    }
}

impl FromStr for MacAddr {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let octets: Vec<u8> = s
            .split(':')
            .map(|s| {
                u8::from_str_radix(s, 16).map_err(|_| format!("bad octet: {s}"))
            })
            .collect::<Result<Vec<u8>, _>>()?;

        Self::try_from(&octets[..])
    }
}

impl Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let b = &self.inner;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

impl Debug for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "MacAddr({self})")
    }
}
