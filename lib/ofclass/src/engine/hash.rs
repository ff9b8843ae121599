// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! The 64-bit hash used for packet cache keys and table-hash keys.
//!
//! The two 32-bit halves are CRC32 sums over the same input with
//! different initial values, so a key can be split into a bucket
//! selector (`hash32_h`) and an in-bucket discriminator (`hash32_l`).
//! Hashes chain: the result of one call seeds the next, letting a key
//! be built field by field.

use crc32fast::Hasher;

const SEED_H: u32 = 0x9e37_79b9;
const SEED_L: u32 = 0x85eb_ca6b;

pub struct Hash64 {
    hi: Hasher,
    lo: Hasher,
}

impl Hash64 {
    pub fn with_seed(seed: u64) -> Self {
        let hi = Hasher::new_with_initial((seed >> 32) as u32 ^ SEED_H);
        let lo = Hasher::new_with_initial(seed as u32 ^ SEED_L);
        Self { hi, lo }
    }

    pub fn update(&mut self, bytes: &[u8]) {
        self.hi.update(bytes);
        self.lo.update(bytes);
    }

    pub fn finish(self) -> u64 {
        (u64::from(self.hi.finalize()) << 32) | u64::from(self.lo.finalize())
    }
}

/// Hash `bytes`, seeded with a previous hash.
pub fn hash_chain(seed: u64, bytes: &[u8]) -> u64 {
    let mut h = Hash64::with_seed(seed);
    h.update(bytes);
    h.finish()
}

/// The bucket selector half of a 64-bit hash.
pub fn hash32_h(hash64: u64) -> u32 {
    (hash64 >> 32) as u32
}

/// The in-bucket discriminator half of a 64-bit hash.
pub fn hash32_l(hash64: u64) -> u32 {
    hash64 as u32
}
