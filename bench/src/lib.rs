// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

use criterion::measurement::Measurement;
use criterion::measurement::WallTime;
use ofclass_test_utils::ClassifierError;
use ofclass_test_utils::FlowTable;
use ofclass_test_utils::GenFrame;
use ofclass_test_utils::Generator;
use ofclass_test_utils::Strategy;
use ofclass_test_utils::test_table;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

#[cfg(feature = "alloc")]
pub mod alloc;

/// Additional labelling information for [`Measurement`]s for
/// pretty-printing and grouping.
pub trait MeasurementInfo: Measurement {
    fn label() -> &'static str;
}

impl MeasurementInfo for WallTime {
    fn label() -> &'static str {
        "wallclock"
    }
}

/// Table sizes every benchmark is run at.
pub const TABLE_SIZES: [usize; 3] = [16, 256, 4096];

/// How often each distinct frame recurs in a workload's trace.
pub const FRAME_REPEAT: usize = 8;

/// A flow table of `strategy` and a trace of frames to classify against
/// it.
pub struct Workload {
    pub table: FlowTable,
    pub frames: Vec<GenFrame>,
    /// Indices into `frames`, each one [`FRAME_REPEAT`] times, in
    /// random order.
    pub trace: Vec<usize>,
}

impl Workload {
    /// Install up to `n_flows` random flows and draw `n_frames` distinct
    /// frames from the same value pools. Flows the table-hash strategy
    /// cannot place are dropped for every strategy alike, so that all
    /// of them are measured on the same flows.
    pub fn new(
        strategy: Strategy,
        n_flows: usize,
        n_frames: usize,
        seed: u64,
    ) -> Self {
        // Leave room for flows a benchmark installs on top.
        let limit = (2 * n_flows) as u32;
        let table = test_table(strategy, limit);
        let probe = test_table(Strategy::TableHash, limit);
        let max_priority = (n_flows / 4).clamp(1, 1000) as u16;
        let mut g = Generator::new(seed).with_max_priority(max_priority);

        for _ in 0..n_flows {
            let spec = g.spec();
            match probe.add(spec.clone()) {
                Ok(_) => {}
                Err(ClassifierError::TooManySignatures { .. }) => continue,
                Err(e) => panic!("failed to install bench flow: {e}"),
            }
            table.add(spec).expect("the probe table accepted the flow");
        }

        let frames: Vec<_> = (0..n_frames).map(|_| g.frame()).collect();
        let mut trace: Vec<_> = (0..n_frames)
            .flat_map(|i| std::iter::repeat_n(i, FRAME_REPEAT))
            .collect();
        trace.shuffle(&mut StdRng::seed_from_u64(seed));
        Self { table, frames, trace }
    }
}
