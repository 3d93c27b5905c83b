//! Reads arbitrary bytes as a TFRecord stream of Examples.

#![no_main]

use std::io::Cursor;

use annopack::package::TfRecordReader;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut reader = TfRecordReader::new(Cursor::new(data), "<fuzz>");
    let _ = reader.read_all_examples();
});
