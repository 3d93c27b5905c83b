//! Criterion microbenches for the annotation parsers and the record codec.
//!
//! Run with: `cargo bench`
//!
//! These benchmarks measure the performance of:
//! - CVAT XML parsing (parse_str with a no-op listener)
//! - point CSV grouping and patch filtering
//! - TFRecord framing of a small Example

use std::collections::HashMap;
use std::hint::black_box;
use std::path::PathBuf;

use criterion::{criterion_group, criterion_main, Criterion, Throughput};

use annopack::ir::io_cvat_xml::CvatAnnotationParser;
use annopack::ir::io_point_csv::PointCsvParser;
use annopack::ir::{ImageAnnotation, ObjectAnnotation};
use annopack::package::example::Feature;
use annopack::package::{Example, TfRecordWriter};
use annopack::pipeline::{shared, AnnotationListener};
use annopack::AnnopackError;

struct Discard;

impl AnnotationListener for Discard {
    fn on_annotation_available(
        &mut self,
        image: &ImageAnnotation,
        objects: &[ObjectAnnotation],
    ) -> Result<(), AnnopackError> {
        black_box((image, objects));
        Ok(())
    }
}

fn cvat_fixture(images: usize, boxes: usize) -> String {
    let mut xml = String::from("<annotations>\n");
    for i in 0..images {
        xml.push_str(&format!(
            "  <image id=\"{i}\" name=\"frame_{i}.jpg\" width=\"640\" height=\"480\">\n"
        ));
        for b in 0..boxes {
            let x = (b * 37) % 600;
            xml.push_str(&format!(
                "    <box label=\"class_{}\" xtl=\"{x}\" ytl=\"10\" xbr=\"{}\" ybr=\"90\"/>\n",
                b % 5,
                x + 30
            ));
        }
        xml.push_str("  </image>\n");
    }
    xml.push_str("</annotations>\n");
    xml
}

fn identity_lookup(count: usize, prefix: &str, ext: &str) -> HashMap<String, PathBuf> {
    (0..count)
        .map(|i| {
            let name = format!("{prefix}{i}.{ext}");
            (name.clone(), PathBuf::from(name))
        })
        .collect()
}

fn bench_cvat_parse(c: &mut Criterion) {
    let xml = cvat_fixture(200, 8);
    let lookup = identity_lookup(200, "frame_", "jpg");

    let mut group = c.benchmark_group("cvat_parse");
    group.throughput(Throughput::Bytes(xml.len() as u64));
    group.bench_function("parse_str", |b| {
        b.iter(|| {
            let mut parser = CvatAnnotationParser::new(vec![shared(Discard)], lookup.clone());
            parser.parse_str(black_box(&xml)).unwrap();
        })
    });
    group.finish();
}

/// Point CSV parsing reads image sizes from disk, so the bench writes a few
/// real images once, outside the timed region.
fn bench_point_csv_parse(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let mut lookup = HashMap::new();
    for i in 0..10 {
        let name = format!("IMG_{i}.jpg");
        let path = dir.path().join(&name);
        image::RgbImage::new(640, 480).save(&path).unwrap();
        lookup.insert(name, path);
    }
    let mut csv = String::new();
    for row in 0..5_000 {
        let key = row % 10;
        let x = (row * 13) % 640;
        let y = (row * 7) % 480;
        csv.push_str(&format!("IMG_{key},{y},{x},Name,label_{},group,u,train\n", row % 4));
    }

    let mut group = c.benchmark_group("point_csv_parse");
    group.throughput(Throughput::Elements(5_000));
    group.bench_function("buffered", |b| {
        b.iter(|| {
            let mut parser = PointCsvParser::new(vec![shared(Discard)], lookup.clone(), 64, 64);
            parser.parse_str(black_box(&csv)).unwrap();
        })
    });
    group.finish();
}

fn bench_tfrecord_write(c: &mut Criterion) {
    let mut feature = HashMap::new();
    feature.insert("image/encoded".to_string(), Feature::bytes([vec![7u8; 16 * 1024]]));
    feature.insert("image/object/bbox/xmin".to_string(), Feature::floats(vec![0.1; 32]));
    feature.insert("image/object/class/label".to_string(), Feature::int64s(vec![3; 32]));
    let example = Example::from_features(feature);

    let mut group = c.benchmark_group("tfrecord_write");
    group.throughput(Throughput::Elements(1));
    group.bench_function("write_example", |b| {
        b.iter(|| {
            let mut writer = TfRecordWriter::new(Vec::with_capacity(20 * 1024));
            writer.write_example(black_box(&example)).unwrap();
            black_box(writer.into_inner())
        })
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_cvat_parse,
    bench_point_csv_parse,
    bench_tfrecord_write
);
criterion_main!(benches);
