// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

use criterion::BatchSize;
use criterion::BenchmarkId;
use criterion::Criterion;
use criterion::Throughput;
use criterion::criterion_group;
use criterion::criterion_main;
use ofclass_bench::MeasurementInfo;
use ofclass_bench::TABLE_SIZES;
use ofclass_bench::Workload;
use ofclass_bench::alloc::*;
use ofclass_test_utils::*;
use std::hint::black_box;

const FRAMES: usize = 512;
const SEED: u64 = 0x0f10_c1a5;

/// Classify the whole trace against the table's snapshot, without and
/// with a result cache.
pub fn classify<M: MeasurementInfo + 'static>(c: &mut Criterion<M>) {
    let mut group = c.benchmark_group(format!("{}/classify", M::label()));

    for n in TABLE_SIZES {
        for strategy in STRATEGIES {
            let w = Workload::new(strategy, n, FRAMES, SEED);
            let views: Vec<_> = w.frames.iter().map(|f| f.view()).collect();
            group.throughput(Throughput::Elements(w.trace.len() as u64));

            let id = BenchmarkId::new(format!("{strategy}"), n);
            group.bench_with_input(id, &w, |b, w| {
                b.iter(|| {
                    for i in &w.trace {
                        black_box(w.table.classify(&views[*i], None));
                    }
                })
            });

            let Some(mut cache) = w.table.new_cache() else {
                continue;
            };
            let id = BenchmarkId::new(format!("{strategy}+cache"), n);
            group.bench_with_input(id, &w, |b, w| {
                b.iter(|| {
                    for i in &w.trace {
                        let pkt = &views[*i];
                        black_box(w.table.classify(pkt, Some(&mut cache)));
                    }
                })
            });
        }
    }
}

/// Install a flow into a loaded table and take it out again; each half
/// publishes a new snapshot.
pub fn churn<M: MeasurementInfo + 'static>(c: &mut Criterion<M>) {
    let mut group = c.benchmark_group(format!("{}/churn", M::label()));

    for n in TABLE_SIZES {
        for strategy in STRATEGIES {
            let w = Workload::new(strategy, n, 0, SEED);
            let extra = FlowSpec::new(u16::MAX)
                .with_match(MatchPredicate::in_port(0xffff))
                .with_match(MatchPredicate::tcp_dst(0xffff));
            let id = BenchmarkId::new(format!("{strategy}"), n);
            group.bench_function(id, |b| {
                b.iter(|| {
                    let id = w.table.add(black_box(extra.clone())).unwrap();
                    w.table.remove(id).unwrap();
                })
            });
        }
    }
}

/// Fill an empty table one flow at a time. Each add publishes a new
/// snapshot, so the cost per add must not grow with the table.
pub fn install<M: MeasurementInfo + 'static>(c: &mut Criterion<M>) {
    let mut group = c.benchmark_group(format!("{}/install", M::label()));

    for n in TABLE_SIZES {
        let specs: Vec<_> = (0..n as u32)
            .map(|i| {
                FlowSpec::new((i % 64) as u16)
                    .with_match(MatchPredicate::eth_type(0x0800))
                    .with_match(MatchPredicate::ipv4_dst(Ipv4Addr::from(
                        0x0a00_0000 | i,
                    )))
            })
            .collect();
        group.throughput(Throughput::Elements(n as u64));

        for strategy in STRATEGIES {
            let id = BenchmarkId::new(format!("{strategy}"), n);
            group.bench_function(id, |b| {
                b.iter_batched(
                    || test_table(strategy, n as u32),
                    |t| {
                        for spec in &specs {
                            t.add(spec.clone()).unwrap();
                        }
                        t
                    },
                    BatchSize::LargeInput,
                )
            });
        }
    }
}

/// Build a fresh classifier from every flow of a loaded table.
pub fn rebuild<M: MeasurementInfo + 'static>(c: &mut Criterion<M>) {
    let mut group = c.benchmark_group(format!("{}/rebuild", M::label()));

    for n in TABLE_SIZES {
        for strategy in STRATEGIES {
            let w = Workload::new(strategy, n, 0, SEED);
            let flows = w.table.snapshot().classifier().flows();
            let id = BenchmarkId::new(format!("{strategy}"), n);
            group.bench_function(id, |b| {
                b.iter_batched(
                    || flows.clone(),
                    |flows| {
                        Classifier::build(strategy, TreeRoot::Vlan, &flows)
                            .unwrap()
                    },
                    BatchSize::SmallInput,
                )
            });
        }
    }
}

criterion_group!(wallclock, classify, churn, install, rebuild);
criterion_group!(
    name = alloc_count;
    config = new_crit::<Allocs>();
    targets = classify
);
criterion_group!(
    name = alloc_bytes;
    config = new_crit::<AllocBytes>();
    targets = classify
);
criterion_main!(wallclock, alloc_count, alloc_bytes);
