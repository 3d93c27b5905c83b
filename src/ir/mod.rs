//! Annotation model, label registry and source-format parsers.
//!
//! Every parser turns its source format into the same unit: one
//! [`ImageAnnotation`] plus the ordered [`ObjectAnnotation`]s drawn on it.
//! Parsers do not return anything. They push each unit to their registered
//! [`AnnotationListener`](crate::pipeline::AnnotationListener)s as soon as the
//! unit is complete.
//!
//! # Example
//!
//! ```
//! use annopack::ir::{ImageAnnotation, ImageFormat, ObjectAnnotation};
//!
//! let image = ImageAnnotation::new("survey/reef_001.png", 100, 50);
//! assert_eq!(image.format(), ImageFormat::Png);
//!
//! let fish = ObjectAnnotation::new("fish", 10.0, 20.0, 5.0, 15.0);
//! assert!(fish.bbox().is_ordered());
//! ```

mod bbox;
mod image_index;
pub mod io_cvat_xml;
pub mod io_point_csv;
mod labels;
mod model;
mod space;

use std::path::Path;

use serde::Serialize;

use crate::error::AnnopackError;

pub use bbox::BBox;
pub use image_index::{short_name, ImageIndex, ImageLookup};
pub use labels::{LabelId, LabelMapWriter, LabelRegistry};
pub use model::{ImageAnnotation, ImageFormat, ObjectAnnotation};
pub use space::{Normalized, Pixel};

pub(crate) use labels::ensure_parent_dir;

/// Reads an annotation file and pushes its units downstream.
pub trait AnnotationFileParser {
    fn parse(&mut self, path: &Path) -> Result<(), AnnopackError>;

    /// Counters accumulated over every `parse` call so far.
    fn stats(&self) -> ParseStats;
}

/// Counters kept by a parser.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ParseStats {
    /// Records read from the source (image elements or CSV rows).
    pub records: usize,
    /// Distinct images seen.
    pub images: usize,
    /// Units pushed to listeners.
    pub units_emitted: usize,
    pub boxes_accepted: usize,
    /// Boxes dropped by the patch-fit filter.
    pub boxes_rejected: usize,
}
