//! Feeds arbitrary bytes to the point CSV row parser and patch filter.

#![no_main]

use annopack::ir::io_point_csv::fuzz_parse_point_rows;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.len() > 10 * 1024 * 1024 {
        return;
    }
    let _ = fuzz_parse_point_rows(data);
});
