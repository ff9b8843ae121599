// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! A counting allocator, exposed to `criterion` as measurements of the
//! number of allocations and the bytes allocated by a benchmark case.
//!
//! A lookup on the packet path should allocate nothing; these
//! measurements make a regression visible.

use super::MeasurementInfo;
use criterion::Criterion;
use criterion::Throughput;
use criterion::measurement::Measurement;
use criterion::measurement::ValueFormatter;
use std::alloc::GlobalAlloc;
use std::alloc::Layout;
use std::alloc::System;
use std::marker::PhantomData;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;

#[global_allocator]
static COUNTING: CountingAlloc = CountingAlloc {
    allocs: AtomicU64::new(0),
    bytes: AtomicU64::new(0),
};

// Criterion runs one case at a time, so process-wide counts are good
// enough.
struct CountingAlloc {
    allocs: AtomicU64,
    bytes: AtomicU64,
}

unsafe impl GlobalAlloc for CountingAlloc {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        self.allocs.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(layout.size() as u64, Ordering::Relaxed);
        unsafe { System.alloc(layout) }
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        unsafe { System.dealloc(ptr, layout) }
    }
}

/// One of the allocator's counters.
pub trait AllocCounter {
    const LABEL: &'static str;
    const UNIT: &'static str;

    fn read() -> u64;
}

pub struct Allocs;
pub struct AllocBytes;

impl AllocCounter for Allocs {
    const LABEL: &'static str = "alloc_ct";
    const UNIT: &'static str = "";

    fn read() -> u64 {
        COUNTING.allocs.load(Ordering::Relaxed)
    }
}

impl AllocCounter for AllocBytes {
    const LABEL: &'static str = "alloc_sz";
    const UNIT: &'static str = "B";

    fn read() -> u64 {
        COUNTING.bytes.load(Ordering::Relaxed)
    }
}

/// Counts are small enough per case that they are never scaled.
struct Unscaled(&'static str);

impl ValueFormatter for Unscaled {
    fn scale_values(&self, _typical: f64, _values: &mut [f64]) -> &'static str {
        self.0
    }

    fn scale_throughputs(
        &self,
        _typical: f64,
        _throughput: &Throughput,
        _values: &mut [f64],
    ) -> &'static str {
        self.0
    }

    fn scale_for_machines(&self, _values: &mut [f64]) -> &'static str {
        self.0
    }
}

/// A [`Measurement`] reading the allocator counter `C`.
pub struct Counted<C> {
    fmt: Unscaled,
    _counter: PhantomData<C>,
}

impl<C: AllocCounter> Default for Counted<C> {
    fn default() -> Self {
        Self { fmt: Unscaled(C::UNIT), _counter: PhantomData }
    }
}

impl<C: AllocCounter> Measurement for Counted<C> {
    type Intermediate = u64;
    type Value = u64;

    fn start(&self) -> u64 {
        C::read()
    }

    fn end(&self, start: u64) -> u64 {
        C::read() - start
    }

    fn add(&self, v1: &u64, v2: &u64) -> u64 {
        v1 + v2
    }

    fn zero(&self) -> u64 {
        0
    }

    fn to_f64(&self, value: &u64) -> f64 {
        *value as f64
    }

    fn formatter(&self) -> &dyn ValueFormatter {
        &self.fmt
    }
}

impl<C: AllocCounter> MeasurementInfo for Counted<C> {
    fn label() -> &'static str {
        C::LABEL
    }
}

/// A [`Criterion`] instance counting allocations rather than time.
pub fn new_crit<C: AllocCounter>() -> Criterion<Counted<C>> {
    Criterion::default()
        .with_measurement(Counted::default())
        .sample_size(10)
        .warm_up_time(Duration::from_nanos(1))
        .measurement_time(Duration::from_micros(10))
        .nresamples(1)
        // The analysis trips over samples which are all equal, as they
        // are when nothing allocates.
        .without_plots()
}
