#![no_main]

use cull_core::metrics::{export_csv, parse_csv};
use libfuzzer_sys::fuzz_target;
use std::collections::BTreeSet;

fuzz_target!(|data: &[u8]| {
    let Ok(raw) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(table) = parse_csv(raw) else {
        return;
    };

    // An unmarked export parses back to the same keys.
    let plain = export_csv(&table, &BTreeSet::new());
    let reparsed = parse_csv(&plain).expect("export of a parsed table parses");
    assert!(reparsed.rows.keys().eq(table.rows.keys()));

    // Marking every key only ever adds the marker.
    let all: BTreeSet<String> = table.rows.keys().cloned().collect();
    let marked = export_csv(&table, &all);
    assert!(marked.len() >= plain.len());
});
