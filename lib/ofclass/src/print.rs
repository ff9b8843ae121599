// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Print dump responses in a human-friendly manner.
//!
//! This is mostly just a place to hang printing routines so that they
//! can be used by both a switch's admin tooling and integration tests.

use crate::api::CacheStatsDump;
use crate::api::DumpFlowTableResp;
use crate::api::FlowEntryDump;
use std::collections::VecDeque;
use std::io::Write;
use std::string::String;
use std::string::ToString;
use tabwriter::TabWriter;

/// Print a [`DumpFlowTableResp`].
pub fn print_flow_table(resp: &DumpFlowTableResp) -> std::io::Result<()> {
    print_flow_table_into(&mut std::io::stdout(), resp)
}

/// Print a [`DumpFlowTableResp`] into a given writer.
pub fn print_flow_table_into(
    writer: &mut impl Write,
    resp: &DumpFlowTableResp,
) -> std::io::Result<()> {
    let mut t = TabWriter::new(writer);

    writeln!(
        t,
        "Table {} ({}): {}/{} flows, epoch {}",
        resp.table_id,
        resp.strategy,
        resp.flows.len(),
        resp.limit,
        resp.epoch,
    )?;
    writeln!(
        t,
        "Lookups: {}, matched: {}",
        resp.stats.lookups, resp.stats.matched
    )?;
    write_hrb(&mut t)?;
    print_flow_header(&mut t)?;
    for flow in &resp.flows {
        print_flow(&mut t, flow)?;
    }
    t.flush()
}

/// Print the header for the [`print_flow()`] output.
pub fn print_flow_header(t: &mut impl Write) -> std::io::Result<()> {
    writeln!(t, "ID\tPRI\tPACKETS\tBYTES\tMATCH\tINSTRUCTIONS")
}

/// Print a [`FlowEntryDump`].
///
/// The first predicate and instruction share the flow's row; the rest
/// follow on their own rows.
pub fn print_flow(
    t: &mut impl Write,
    flow: &FlowEntryDump,
) -> std::io::Result<()> {
    let mut preds = flow
        .matches
        .iter()
        .map(ToString::to_string)
        .collect::<VecDeque<String>>();
    let mut insts = flow
        .instructions
        .iter()
        .map(ToString::to_string)
        .collect::<VecDeque<String>>();

    let first_pred = preds.pop_front().unwrap_or_else(|| "*".to_string());
    let first_inst = insts.pop_front().unwrap_or_else(|| "--".to_string());

    writeln!(
        t,
        "{}\t{}\t{}\t{}\t{first_pred}\t{first_inst}",
        flow.id, flow.priority, flow.packets, flow.bytes,
    )?;

    let mut multi = false;
    while !preds.is_empty() || !insts.is_empty() {
        let pred = preds.pop_front().unwrap_or_default();
        let inst = insts.pop_front().unwrap_or_default();
        writeln!(t, "\t\t\t\t{pred}\t{inst}")?;
        multi = true;
    }

    // Separate multi-row flows from the next one.
    if multi {
        writeln!(t, "\t\t\t\t\t")?;
    }

    Ok(())
}

/// Print a [`CacheStatsDump`].
pub fn print_cache_stats(stats: &CacheStatsDump) -> std::io::Result<()> {
    print_cache_stats_into(&mut std::io::stdout(), stats)
}

/// Print a [`CacheStatsDump`] into a given writer.
pub fn print_cache_stats_into(
    writer: &mut impl Write,
    stats: &CacheStatsDump,
) -> std::io::Result<()> {
    let mut t = TabWriter::new(writer);
    writeln!(t, "ENTRIES\tHIT\tMISS")?;
    writeln!(t, "{}\t{}\t{}", stats.entries, stats.hit, stats.miss)?;
    t.flush()
}

/// Output a horizontal rule in bold to the given writer.
pub fn write_hrb(t: &mut impl Write) -> std::io::Result<()> {
    writeln!(t, "{:=<70}", "=")
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::api::FlowFlags;
    use crate::api::FlowId;
    use crate::api::Instruction;
    use crate::api::MatchPredicate;
    use crate::api::Strategy;
    use crate::api::TableStatsDump;

    fn flow(id: u64, matches: Vec<MatchPredicate>) -> FlowEntryDump {
        FlowEntryDump {
            id: FlowId(id),
            priority: 10,
            table_id: 0,
            cookie: 0,
            flags: FlowFlags::empty(),
            idle_timeout: 0,
            hard_timeout: 0,
            matches,
            instructions: vec![Instruction::GotoTable(1)],
            packets: 3,
            bytes: 180,
        }
    }

    #[test]
    fn flow_table_rows() {
        let resp = DumpFlowTableResp {
            table_id: 0,
            strategy: Strategy::Tree,
            epoch: 2,
            limit: 8192,
            stats: TableStatsDump { flows: 2, lookups: 5, matched: 3 },
            flows: vec![
                flow(0, vec![]),
                flow(
                    1,
                    vec![
                        MatchPredicate::in_port(1),
                        MatchPredicate::ip_proto(6),
                    ],
                ),
            ],
        };

        let mut out = Vec::new();
        print_flow_table_into(&mut out, &resp).unwrap();
        let out = String::from_utf8(out).unwrap();
        let lines: Vec<_> = out.lines().collect();

        assert!(lines[0].starts_with("Table 0 (tree): 2/8192 flows"));
        assert!(lines[3].starts_with("ID"));
        assert!(lines[4].contains('*'));
        assert!(lines[4].contains("goto_table:1"));
        // The second predicate sits on a continuation row.
        assert_eq!(lines.len(), 8);
    }

    #[test]
    fn cache_stats() {
        let mut out = Vec::new();
        let stats = CacheStatsDump { entries: 1, hit: 2, miss: 3 };
        print_cache_stats_into(&mut out, &stats).unwrap();
        let out = String::from_utf8(out).unwrap();
        assert_eq!(out.lines().nth(1).unwrap().split_whitespace().count(), 3);
    }
}
