//! Packagers: the terminal stages that persist annotation units.
//!
//! Every packager implements [`DatasetPackager`]. The blanket impls below make
//! any packager usable both as an image listener (units go to `append`) and as
//! a lifecycle listener (`stop` goes to `close`), so a packager is wired into
//! a pipeline by registering the same [`Shared`](crate::pipeline::Shared)
//! handle twice.

mod copy;
pub mod example;
mod tfrecord;

use std::io::Cursor;
use std::path::Path;

use image::DynamicImage;

use crate::error::AnnopackError;
use crate::ir::{ImageAnnotation, ImageFormat, ObjectAnnotation};
use crate::pipeline::{AnnotatedImageListener, PipelineStateListener};

pub use copy::{StoreByFullPath, StoreByLabel, StoreByShortName};
pub use example::{read_examples, Example, TfRecordReader, TfRecordWriter};
pub use tfrecord::{feature_keys, TfRecordPackager};

/// Terminal sink for annotation units.
pub trait DatasetPackager {
    fn append(
        &mut self,
        pixels: &DynamicImage,
        image: &ImageAnnotation,
        objects: &[ObjectAnnotation],
    ) -> Result<(), AnnopackError>;

    /// Flushes and releases outputs. Calling it again is a no-op.
    fn close(&mut self) -> Result<(), AnnopackError>;

    /// Number of units persisted so far.
    fn packaged(&self) -> usize;
}

impl<P: DatasetPackager> AnnotatedImageListener for P {
    fn on_annotated_image_available(
        &mut self,
        pixels: &mut DynamicImage,
        image: &ImageAnnotation,
        objects: &[ObjectAnnotation],
    ) -> Result<(), AnnopackError> {
        self.append(pixels, image, objects)
    }
}

impl<P: DatasetPackager> PipelineStateListener for P {
    fn on_pipeline_stop(&mut self) -> Result<(), AnnopackError> {
        self.close()
    }
}

/// Encodes `pixels` in `format`. JPEG has no alpha channel, so buffers are
/// converted to 8-bit RGB first.
pub(crate) fn encode_image(
    pixels: &DynamicImage,
    format: ImageFormat,
    path: &Path,
) -> Result<Vec<u8>, AnnopackError> {
    let mut out = Cursor::new(Vec::new());
    let encoded = match format {
        ImageFormat::Jpeg => {
            DynamicImage::ImageRgb8(pixels.to_rgb8()).write_to(&mut out, format.codec())
        }
        ImageFormat::Png => pixels.write_to(&mut out, format.codec()),
    };
    encoded.map_err(|source| AnnopackError::ImageEncode {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(out.into_inner())
}
