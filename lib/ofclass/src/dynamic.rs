// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! A lock-wrapped pointer to an immutable value which may be replaced
//! wholesale, along with the epoch of the current value.
//!
//! Readers hold the lock only long enough to clone the `Arc`; they then
//! walk their [`Snapshot`] without any lock while a writer builds and
//! stores the next value.

// TODO: may want to look into arc-swap, which would let readers skip
// the lock entirely.

use crate::sync::KRwLock;
use std::fmt::Debug;
use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

pub struct Dynamic<T>(Arc<InnerDynamic<T>>);

// A derived `Clone` would require `T: Clone`.
impl<T> Clone for Dynamic<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

struct InnerDynamic<T> {
    inner: KRwLock<Arc<T>>,
    epoch: AtomicU64,
}

#[derive(Debug)]
pub struct Snapshot<T> {
    pub value: Arc<T>,
    pub epoch: u64,
}

impl<T> Clone for Snapshot<T> {
    fn clone(&self) -> Self {
        Self { value: Arc::clone(&self.value), epoch: self.epoch }
    }
}

impl<T> From<T> for Dynamic<T> {
    fn from(value: T) -> Self {
        let inner = KRwLock::new(value.into());

        Self(InnerDynamic { inner, epoch: AtomicU64::default() }.into())
    }
}

impl<T> Dynamic<T> {
    /// Replace the current value, returning the new epoch.
    pub fn store(&self, value: T) -> u64 {
        let mut inner = self.0.inner.write();
        *inner = value.into();
        self.0.epoch.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn load(&self) -> Snapshot<T> {
        let value_locked = self.0.inner.read();
        let value = Arc::clone(&*value_locked);
        let epoch = self.0.epoch.load(Ordering::Relaxed);

        Snapshot { epoch, value }
    }

    pub fn epoch(&self) -> u64 {
        self.0.epoch.load(Ordering::Relaxed)
    }
}

impl<T: Debug> Debug for Dynamic<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let current_val = self.load();
        write!(f, "{current_val:?}")
    }
}

impl<T> Deref for Snapshot<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.value
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn snapshots_outlive_stores() {
        let d = Dynamic::from(vec![1, 2, 3]);
        let before = d.load();
        assert_eq!(before.epoch, 0);

        assert_eq!(d.store(vec![4]), 1);
        let after = d.load();

        // The old snapshot is untouched by the store.
        assert_eq!(*before, vec![1, 2, 3]);
        assert_eq!(*after, vec![4]);
        assert_eq!(after.epoch, 1);
        assert_eq!(d.epoch(), 1);
    }
}
