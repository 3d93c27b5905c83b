mod common;

use std::fs;
use std::path::Path;

use annopack::ir::io_cvat_xml::CvatAnnotationParser;
use annopack::ir::{ImageIndex, LabelMapWriter, LabelRegistry};
use annopack::package::{feature_keys, read_examples, StoreByLabel, TfRecordPackager};
use annopack::pipeline::{shared, ImageLoader, ParseOnStart, Pipeline, PipelineState};
use annopack::process::CropStage;
use annopack::AnnopackError;

use common::{assert_close, write_image, write_text, Units};

const REEF_XML: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<annotations>
  <version>1.1</version>
  <image id="0" name="survey/reef.jpg" width="100" height="50">
    <box label="fish" occluded="0" xtl="10" ytl="5" xbr="20" ybr="15"/>
    <box label="coral" occluded="0" xtl="50" ytl="10" xbr="90" ybr="40"/>
  </image>
  <image id="1" name="empty.jpg" width="100" height="50">
  </image>
</annotations>
"#;

fn fixture(dir: &Path) -> (std::path::PathBuf, ImageIndex) {
    write_image(&dir.join("images/nested/reef.jpg"), 100, 50);
    write_image(&dir.join("images/empty.jpg"), 100, 50);
    let xml = dir.join("annotations.xml");
    write_text(&xml, REEF_XML);
    let index = ImageIndex::build(&dir.join("images")).expect("index images");
    (xml, index)
}

#[test]
fn normalized_records_match_the_reference_scenario() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (xml, index) = fixture(dir.path());
    let record = dir.path().join("out/train.record");
    let label_map = dir.path().join("out/labels.pbtxt");

    let labels = shared(LabelRegistry::new());
    let packager = shared(
        TfRecordPackager::new(&record)
            .expect("record file")
            .with_shared_labels(labels.clone()),
    );
    let loader = shared(ImageLoader::new(vec![packager.clone()]));
    let parser = shared(CvatAnnotationParser::new(
        vec![labels.clone(), loader.clone()],
        index,
    ));

    let mut pipeline = Pipeline::new();
    pipeline
        .register(shared(ParseOnStart::new(parser.clone(), &xml)))
        .register(packager.clone())
        .register(shared(
            LabelMapWriter::new(labels.clone(), &label_map).expect("label map"),
        ));
    pipeline.run().expect("run");
    assert_eq!(pipeline.state(), PipelineState::Stopped);

    // The image without boxes is parsed but never loaded.
    let stats = annopack::ir::AnnotationFileParser::stats(&*parser.borrow());
    assert_eq!(stats.images, 2);
    assert_eq!(loader.borrow().loaded(), 1);

    let examples = read_examples(&record).expect("read records");
    assert_eq!(examples.len(), 1);
    let example = &examples[0];
    assert_close(example.float_list(feature_keys::XMIN).unwrap(), &[0.10, 0.50]);
    assert_close(example.float_list(feature_keys::XMAX).unwrap(), &[0.20, 0.90]);
    assert_close(example.float_list(feature_keys::YMIN).unwrap(), &[0.10, 0.20]);
    assert_close(example.float_list(feature_keys::YMAX).unwrap(), &[0.30, 0.80]);
    assert_eq!(
        example.string_list(feature_keys::CLASS_TEXT).unwrap(),
        vec!["fish", "coral"]
    );
    assert_eq!(example.int64_list(feature_keys::CLASS_LABEL).unwrap(), &[1, 2]);
    assert_eq!(example.int64_list(feature_keys::WIDTH).unwrap(), &[100]);
    assert_eq!(example.int64_list(feature_keys::HEIGHT).unwrap(), &[50]);

    let filename = &example.string_list(feature_keys::FILENAME).unwrap()[0];
    assert!(filename.ends_with("reef.jpg"), "{filename}");
    assert_eq!(
        example.string_list(feature_keys::SOURCE_ID).unwrap()[0],
        *filename
    );
    let encoded = &example.bytes_list(feature_keys::ENCODED).unwrap()[0];
    let decoded = image::load_from_memory(encoded).expect("encoded jpeg");
    assert_eq!((decoded.width(), decoded.height()), (100, 50));

    assert_eq!(
        fs::read_to_string(&label_map).expect("label map"),
        "item {\nid: 1\nname: 'fish'\n}\nitem {\nid: 2\nname: 'coral'\n}\n"
    );
}

#[test]
fn every_image_is_emitted_in_document_order() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (_, index) = fixture(dir.path());
    let units = shared(Units::default());
    let mut parser = CvatAnnotationParser::new(vec![units.clone()], index);
    parser.parse_str(REEF_XML).expect("parse");

    let units = units.borrow();
    assert_eq!(units.units.len(), 2);
    assert_eq!(units.units[0].1.len(), 2);
    assert_eq!(units.units[0].1[1].xmax(), 90.0);
    assert!(units.units[1].1.is_empty());
    assert!(units.units[1].0.path().ends_with("empty.jpg"));
}

#[test]
fn crops_land_in_label_directories() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (xml, index) = fixture(dir.path());
    let out = dir.path().join("crops");

    let packager = shared(StoreByLabel::new(&out).expect("output root"));
    let crop = shared(CropStage::new(vec![packager.clone()]));
    let loader = shared(ImageLoader::new(vec![crop.clone()]));
    let parser = shared(CvatAnnotationParser::new(vec![loader], index));

    let mut pipeline = Pipeline::new();
    pipeline
        .register(shared(ParseOnStart::new(parser, &xml)))
        .register(packager.clone());
    pipeline.run().expect("run");

    assert_eq!(crop.borrow().crops(), 2);
    let fish = image::open(out.join("fish/reef_0.jpg")).expect("fish crop");
    assert_eq!((fish.width(), fish.height()), (10, 10));
    let coral = image::open(out.join("coral/reef_1.jpg")).expect("coral crop");
    assert_eq!((coral.width(), coral.height()), (40, 30));
}

#[test]
fn unknown_image_aborts_but_outputs_are_closed() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_image(&dir.path().join("images/other.jpg"), 10, 10);
    let xml = dir.path().join("annotations.xml");
    write_text(&xml, REEF_XML);
    let index = ImageIndex::build(&dir.path().join("images")).expect("index");
    let record = dir.path().join("train.record");

    let packager = shared(TfRecordPackager::new(&record).expect("record file"));
    let loader = shared(ImageLoader::new(vec![packager.clone()]));
    let parser = shared(CvatAnnotationParser::new(vec![loader], index));
    let mut pipeline = Pipeline::with_listeners(vec![
        shared(ParseOnStart::new(parser, &xml)),
        packager.clone(),
    ]);

    let err = pipeline.run().expect_err("lookup must fail");
    assert!(matches!(err, AnnopackError::ImageLookup { ref name } if name == "reef.jpg"));
    assert_eq!(pipeline.state(), PipelineState::Stopped);
    assert!(read_examples(&record).expect("closed file").is_empty());
}
