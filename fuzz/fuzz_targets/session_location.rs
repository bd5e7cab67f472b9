#![no_main]

use cull_core::location::SessionLocation;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(query) = std::str::from_utf8(data) else {
        return;
    };
    let location = SessionLocation::from_query(query);
    let reparsed = SessionLocation::from_query(&location.to_query());
    assert_eq!(location, reparsed);

    // Merging never loses the location.
    let merged = location.merge_into(query);
    assert_eq!(SessionLocation::from_query(&merged), location);
});
