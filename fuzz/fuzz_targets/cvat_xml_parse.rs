//! Feeds arbitrary bytes to the CVAT XML parser. Every image name resolves to
//! itself, so only document handling is exercised.

#![no_main]

use annopack::ir::io_cvat_xml::fuzz_parse_cvat_xml;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.len() > 10 * 1024 * 1024 {
        return;
    }
    let _ = fuzz_parse_cvat_xml(data);
});
