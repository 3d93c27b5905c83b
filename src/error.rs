use std::path::PathBuf;
use thiserror::Error;

use crate::pipeline::PipelineState;

/// The main error type for annopack operations.
#[derive(Debug, Error)]
pub enum AnnopackError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to create output location {path}: {source}")]
    OutputCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Failed to traverse image directory {path}: {source}")]
    ImageIndex {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("Image '{name}' is not available in the image lookup")]
    ImageLookup { name: String },

    #[error("Failed to read annotation file {path}: {source}")]
    AnnotationRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse CVAT XML from {path}: {message}")]
    CvatXmlParse { path: PathBuf, message: String },

    #[error("Failed to read point CSV from {path}: {source}")]
    PointCsvRead {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Invalid point CSV record in {path} at line {line}: {message}")]
    PointCsvParse {
        path: PathBuf,
        line: u64,
        message: String,
    },

    #[error("Failed to read image dimensions from {path}: {source}")]
    ImageDimensionRead {
        path: PathBuf,
        #[source]
        source: imagesize::ImageError,
    },

    #[error("Failed to load image {path}: {source}")]
    ImageLoad {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Failed to save image {path}: {source}")]
    ImageSave {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Failed to encode image {path}: {source}")]
    ImageEncode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Failed to load font {path}: {message}")]
    FontLoad { path: PathBuf, message: String },

    #[error("Failed to write TFRecord to {path}: {source}")]
    TfRecordWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt TFRecord in {path}: {message}")]
    TfRecordRead { path: PathBuf, message: String },

    #[error("Failed to write label map to {path}: {source}")]
    LabelMapWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Label '{label}' has no id in the label registry")]
    UnknownLabel { label: String },

    #[error("Pipeline cannot {action} while {state}")]
    PipelineState {
        action: &'static str,
        state: PipelineState,
    },

    #[error("Failed to serialize run report: {0}")]
    ReportSerialize(#[from] serde_json::Error),
}
