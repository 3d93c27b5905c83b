//! Record packager: one `tf.train.Example` per unit in a TFRecord file.

use std::collections::HashMap;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use image::DynamicImage;
use log::{debug, info};

use super::example::{Example, Feature, TfRecordWriter};
use super::{encode_image, DatasetPackager};
use crate::error::AnnopackError;
use crate::ir::{ensure_parent_dir, ImageAnnotation, LabelId, LabelRegistry, ObjectAnnotation};
use crate::pipeline::Shared;

/// Feature keys written into every record, following the TensorFlow Object
/// Detection API naming.
pub mod feature_keys {
    pub const HEIGHT: &str = "image/height";
    pub const WIDTH: &str = "image/width";
    pub const FILENAME: &str = "image/filename";
    pub const SOURCE_ID: &str = "image/source_id";
    pub const ENCODED: &str = "image/encoded";
    pub const FORMAT: &str = "image/format";
    pub const XMIN: &str = "image/object/bbox/xmin";
    pub const XMAX: &str = "image/object/bbox/xmax";
    pub const YMIN: &str = "image/object/bbox/ymin";
    pub const YMAX: &str = "image/object/bbox/ymax";
    pub const CLASS_TEXT: &str = "image/object/class/text";
    pub const CLASS_LABEL: &str = "image/object/class/label";
}

enum LabelSource {
    /// Ids assigned by the packager as labels show up.
    Owned(LabelRegistry),
    /// Ids assigned upstream; a label without an id is an error.
    Shared(Shared<LabelRegistry>),
}

impl LabelSource {
    fn id_for(&mut self, label: &str) -> Result<LabelId, AnnopackError> {
        match self {
            LabelSource::Owned(registry) => Ok(registry.register(label)),
            LabelSource::Shared(registry) => {
                registry
                    .borrow()
                    .find(label)
                    .ok_or_else(|| AnnopackError::UnknownLabel {
                        label: label.to_string(),
                    })
            }
        }
    }

    fn count(&self) -> usize {
        match self {
            LabelSource::Owned(registry) => registry.count(),
            LabelSource::Shared(registry) => registry.borrow().count(),
        }
    }

    fn write_label_map(&self, path: &Path) -> Result<(), AnnopackError> {
        match self {
            LabelSource::Owned(registry) => registry.write_label_map(path),
            LabelSource::Shared(registry) => registry.borrow().write_label_map(path),
        }
    }
}

/// Writes one record per unit: image size, encoded pixels, box coordinates
/// (normalised by default) and label text and ids.
///
/// The output file is created at construction, so a bad location is reported
/// before any parsing starts.
pub struct TfRecordPackager {
    path: PathBuf,
    writer: Option<TfRecordWriter<BufWriter<File>>>,
    labels: LabelSource,
    normalize: bool,
    label_map: Option<PathBuf>,
    written: usize,
}

impl TfRecordPackager {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, AnnopackError> {
        let path = path.into();
        ensure_parent_dir(&path)?;
        let file = File::create(&path).map_err(|source| AnnopackError::OutputCreate {
            path: path.clone(),
            source,
        })?;
        debug!("writing records to {}", path.display());
        Ok(Self {
            path,
            writer: Some(TfRecordWriter::new(BufWriter::new(file))),
            labels: LabelSource::Owned(LabelRegistry::new()),
            normalize: true,
            label_map: None,
            written: 0,
        })
    }

    /// Resolves ids through a registry filled upstream instead of assigning
    /// them here.
    pub fn with_shared_labels(mut self, labels: Shared<LabelRegistry>) -> Self {
        self.labels = LabelSource::Shared(labels);
        self
    }

    /// Stores box coordinates as fractions of the image size (the default)
    /// or as raw pixels.
    pub fn with_normalize(mut self, normalize: bool) -> Self {
        self.normalize = normalize;
        self
    }

    /// Writes the label map next to the records on `close`.
    pub fn with_label_map(mut self, path: impl Into<PathBuf>) -> Self {
        self.label_map = Some(path.into());
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn label_count(&self) -> usize {
        self.labels.count()
    }

    fn build_example(
        &mut self,
        pixels: &DynamicImage,
        image: &ImageAnnotation,
        objects: &[ObjectAnnotation],
    ) -> Result<Example, AnnopackError> {
        let encoded = encode_image(pixels, image.format(), Path::new(image.path()))?;

        let mut xmins = Vec::with_capacity(objects.len());
        let mut xmaxs = Vec::with_capacity(objects.len());
        let mut ymins = Vec::with_capacity(objects.len());
        let mut ymaxs = Vec::with_capacity(objects.len());
        let mut texts = Vec::with_capacity(objects.len());
        let mut ids = Vec::with_capacity(objects.len());
        for object in objects {
            let (xmin, xmax, ymin, ymax) = if self.normalize {
                let bbox = object.bbox().to_normalized(image.width(), image.height());
                (bbox.xmin(), bbox.xmax(), bbox.ymin(), bbox.ymax())
            } else {
                (object.xmin(), object.xmax(), object.ymin(), object.ymax())
            };
            xmins.push(xmin as f32);
            xmaxs.push(xmax as f32);
            ymins.push(ymin as f32);
            ymaxs.push(ymax as f32);
            texts.push(object.label().as_bytes().to_vec());
            ids.push(self.labels.id_for(object.label())?.as_i64());
        }

        let mut feature = HashMap::new();
        feature.insert(
            feature_keys::HEIGHT.to_string(),
            Feature::int64s(vec![i64::from(image.height())]),
        );
        feature.insert(
            feature_keys::WIDTH.to_string(),
            Feature::int64s(vec![i64::from(image.width())]),
        );
        feature.insert(feature_keys::FILENAME.to_string(), Feature::bytes([image.path()]));
        feature.insert(feature_keys::SOURCE_ID.to_string(), Feature::bytes([image.path()]));
        feature.insert(feature_keys::ENCODED.to_string(), Feature::bytes([encoded]));
        feature.insert(
            feature_keys::FORMAT.to_string(),
            Feature::bytes([image.format().as_str()]),
        );
        feature.insert(feature_keys::XMIN.to_string(), Feature::floats(xmins));
        feature.insert(feature_keys::XMAX.to_string(), Feature::floats(xmaxs));
        feature.insert(feature_keys::YMIN.to_string(), Feature::floats(ymins));
        feature.insert(feature_keys::YMAX.to_string(), Feature::floats(ymaxs));
        feature.insert(feature_keys::CLASS_TEXT.to_string(), Feature::bytes(texts));
        feature.insert(feature_keys::CLASS_LABEL.to_string(), Feature::int64s(ids));
        Ok(Example::from_features(feature))
    }

    fn write_err(&self, source: std::io::Error) -> AnnopackError {
        AnnopackError::TfRecordWrite {
            path: self.path.clone(),
            source,
        }
    }
}

impl DatasetPackager for TfRecordPackager {
    fn append(
        &mut self,
        pixels: &DynamicImage,
        image: &ImageAnnotation,
        objects: &[ObjectAnnotation],
    ) -> Result<(), AnnopackError> {
        if self.writer.is_none() {
            return Err(self.write_err(std::io::Error::other("record file already closed")));
        }
        let example = self.build_example(pixels, image, objects)?;
        if let Some(writer) = self.writer.as_mut() {
            writer
                .write_example(&example)
                .map_err(|source| AnnopackError::TfRecordWrite {
                    path: self.path.clone(),
                    source,
                })?;
        }
        self.written += 1;
        debug!("record {} <- {} ({} objects)", self.written, image.path(), objects.len());
        Ok(())
    }

    fn close(&mut self) -> Result<(), AnnopackError> {
        let Some(mut writer) = self.writer.take() else {
            return Ok(());
        };
        writer.flush().map_err(|source| self.write_err(source))?;
        info!("{} records written to {}", self.written, self.path.display());
        if let Some(label_map) = &self.label_map {
            self.labels.write_label_map(label_map)?;
        }
        Ok(())
    }

    fn packaged(&self) -> usize {
        self.written
    }
}
