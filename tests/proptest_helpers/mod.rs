#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use proptest::prelude::*;
use proptest::test_runner::{Config as ProptestConfig, FileFailurePersistence};

/// Records store f32, so pixel coordinates recovered from fractions drift a little.
pub const EPS_PIXELS: f64 = 1e-3;

pub fn proptest_config() -> ProptestConfig {
    let cases = std::env::var("PROPTEST_CASES")
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(64);

    let mut config = ProptestConfig::with_failure_persistence(FileFailurePersistence::WithSource(
        "proptest-regressions",
    ));
    config.cases = cases;
    config.max_shrink_iters = 1024;
    config
}

pub const FIXTURE_WIDTH: u32 = 120;
pub const FIXTURE_HEIGHT: u32 = 80;

/// Directory holding `IMG_0.jpg` .. `IMG_3.jpg`, all 120x80, shared by every
/// case of a test binary.
pub fn fixture_images() -> &'static Path {
    static DIR: OnceLock<tempfile::TempDir> = OnceLock::new();
    DIR.get_or_init(|| {
        let dir = tempfile::tempdir().expect("tempdir");
        for idx in 0..4 {
            let path: PathBuf = dir.path().join(format!("IMG_{idx}.jpg"));
            image::RgbImage::new(FIXTURE_WIDTH, FIXTURE_HEIGHT)
                .save(&path)
                .expect("write fixture image");
        }
        dir
    })
    .path()
}

/// Labels drawn from a small vocabulary so repeats are common.
pub fn arb_label() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("fish".to_string()),
        Just("coral".to_string()),
        Just("sand".to_string()),
        "[a-z]{1,6}",
    ]
}

/// A pixel box inside a `width` x `height` image with at least one pixel of
/// extent on each axis.
pub fn arb_box(width: u32, height: u32) -> impl Strategy<Value = (f64, f64, f64, f64)> {
    (0..width - 1, 0..height - 1)
        .prop_flat_map(move |(xmin, ymin)| {
            (Just(xmin), xmin + 1..width, Just(ymin), ymin + 1..height)
        })
        .prop_map(|(xmin, xmax, ymin, ymax)| {
            (
                f64::from(xmin),
                f64::from(xmax),
                f64::from(ymin),
                f64::from(ymax),
            )
        })
}
