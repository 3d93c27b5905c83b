//! Point-record CSV reader (Catlin Seaview Survey layout).
//!
//! Each row marks a single point on an image. Columns, by position:
//!
//! | index | content |
//! |---|---|
//! | 0 | image key; the image file is `<key>.jpg` |
//! | 1 | y (integer pixels) |
//! | 2 | x (integer pixels) |
//! | 3 | descriptive label name (unused) |
//! | 4 | label |
//! | 5 | functional group (unused) |
//! | 7 | dataset tag |
//!
//! Every point becomes a fixed-size patch centred on it. A patch is kept only
//! when it lies strictly inside the image (see
//! [`BBox::fits_strictly_within`]); rejected patches are dropped silently.
//! A unit is emitted for an image only when at least one patch survived.
//!
//! Image sizes come from the image file header, not from the CSV.
//!
//! # Grouping
//!
//! - [`GroupingMode::Buffered`] reads the whole file first and groups rows by
//!   image key, so rows of one image need not be contiguous. Units follow the
//!   order in which keys first appear. No header row is skipped.
//! - [`GroupingMode::Streaming`] skips the first row as a header and emits an
//!   image's unit as soon as the key changes (and at the end of the input).
//!   Rows of one image must be contiguous: a key that comes back after its
//!   unit was emitted aborts the parse.

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use log::{debug, trace};

use super::{
    AnnotationFileParser, BBox, ImageAnnotation, ImageLookup, LabelRegistry, ObjectAnnotation,
    ParseStats,
};
use crate::error::AnnopackError;
use crate::pipeline::{notify_annotation, AnnotationListener, AnnotationListeners, Shared};

const IMAGE_SUFFIX: &str = ".jpg";
const MIN_COLUMNS: usize = 8;
const PROGRESS_EVERY: u64 = 1000;
const MIN_PATCH_SIZE: u32 = 2;

/// How rows are grouped into per-image units.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum GroupingMode {
    #[default]
    Buffered,
    Streaming,
}

/// One parsed CSV row. Descriptive columns are kept for logging only.
#[derive(Clone, Debug)]
struct PointRow {
    key: String,
    x: i64,
    y: i64,
    label_name: String,
    label: String,
    func_group: String,
}

/// An image whose rows are still being collected.
struct PendingImage {
    image: ImageAnnotation,
    objects: Vec<ObjectAnnotation>,
}

pub struct PointCsvParser<L> {
    listeners: AnnotationListeners,
    images: L,
    patch_width: u32,
    patch_height: u32,
    dataset_filter: Option<String>,
    mode: GroupingMode,
    labels: Option<Shared<LabelRegistry>>,
    fresh_labels: bool,
    stats: ParseStats,
}

impl<L: ImageLookup> PointCsvParser<L> {
    pub fn new(
        listeners: AnnotationListeners,
        images: L,
        patch_width: u32,
        patch_height: u32,
    ) -> Self {
        debug!("Available images: {}", images.len());
        debug!("image_patch_width: {patch_width}");
        debug!("image_patch_height: {patch_height}");
        Self {
            listeners,
            images,
            patch_width,
            patch_height,
            dataset_filter: None,
            mode: GroupingMode::default(),
            labels: None,
            fresh_labels: false,
            stats: ParseStats::default(),
        }
    }

    /// Only rows whose dataset tag equals `dataset` are considered.
    pub fn with_dataset_filter(mut self, dataset: impl Into<String>) -> Self {
        let dataset = dataset.into();
        debug!("dataset_filter: {dataset}");
        self.dataset_filter = Some(dataset);
        self
    }

    pub fn with_mode(mut self, mode: GroupingMode) -> Self {
        self.mode = mode;
        self
    }

    /// Registers every accepted label with `labels`. With `fresh` set, the
    /// registry is cleared at the start of each parse.
    pub fn with_labels(mut self, labels: Shared<LabelRegistry>, fresh: bool) -> Self {
        self.labels = Some(labels);
        self.fresh_labels = fresh;
        self
    }

    pub fn register(&mut self, listener: Shared<dyn AnnotationListener>) {
        self.listeners.push(listener);
    }

    /// Patch sides are halved with floor division, so anything below 2 gives
    /// a box with no area.
    pub fn check_patch_size(patch_width: u32, patch_height: u32) -> Result<(), AnnopackError> {
        if patch_width < MIN_PATCH_SIZE || patch_height < MIN_PATCH_SIZE {
            return Err(AnnopackError::InvalidArgument(format!(
                "patch size {patch_width}x{patch_height} is too small; \
                 width and height must be at least {MIN_PATCH_SIZE}"
            )));
        }
        Ok(())
    }

    /// Parses CSV held in memory.
    pub fn parse_str(&mut self, csv: &str) -> Result<(), AnnopackError> {
        self.parse_reader(csv.as_bytes(), Path::new("<string>"))
    }

    fn parse_reader<R: Read>(&mut self, reader: R, path: &Path) -> Result<(), AnnopackError> {
        Self::check_patch_size(self.patch_width, self.patch_height)?;
        if self.fresh_labels {
            if let Some(labels) = &self.labels {
                labels.borrow_mut().clear();
            }
        }

        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(reader);

        match self.mode {
            GroupingMode::Buffered => self.parse_buffered(&mut csv_reader, path),
            GroupingMode::Streaming => self.parse_streaming(&mut csv_reader, path),
        }
    }

    fn parse_buffered<R: Read>(
        &mut self,
        csv_reader: &mut csv::Reader<R>,
        path: &Path,
    ) -> Result<(), AnnopackError> {
        let mut groups: Vec<(String, Vec<PointRow>)> = Vec::new();
        let mut group_index: HashMap<String, usize> = HashMap::new();

        for (row_count, record) in csv_reader.records().enumerate() {
            log_progress(row_count as u64);
            let record = read_record(record, path)?;
            self.stats.records += 1;
            let Some(row) = self.filtered_row(&record, path)? else {
                continue;
            };
            let idx = *group_index.entry(row.key.clone()).or_insert_with(|| {
                groups.push((row.key.clone(), Vec::new()));
                groups.len() - 1
            });
            groups[idx].1.push(row);
        }

        let image_count = groups.len();
        for (key, rows) in groups {
            let mut pending = self.open_image(&key)?;
            for row in &rows {
                self.accept_point(&mut pending, row);
            }
            self.flush(pending)?;
        }
        debug!("{image_count} images parsed.");
        Ok(())
    }

    fn parse_streaming<R: Read>(
        &mut self,
        csv_reader: &mut csv::Reader<R>,
        path: &Path,
    ) -> Result<(), AnnopackError> {
        let mut current: Option<(String, PendingImage)> = None;
        let mut flushed: HashSet<String> = HashSet::new();
        let mut image_count = 0;

        for (row_count, record) in csv_reader.records().enumerate() {
            log_progress(row_count as u64);
            let record = read_record(record, path)?;
            if row_count == 0 {
                // header
                continue;
            }
            self.stats.records += 1;
            let Some(row) = self.filtered_row(&record, path)? else {
                continue;
            };

            let same_image = matches!(&current, Some((key, _)) if *key == row.key);
            if !same_image {
                if let Some((key, pending)) = current.take() {
                    self.flush(pending)?;
                    flushed.insert(key);
                }
                if flushed.contains(&row.key) {
                    return Err(AnnopackError::PointCsvParse {
                        path: path.to_path_buf(),
                        line: record.position().map(|p| p.line()).unwrap_or(0),
                        message: format!(
                            "rows for image {} are not contiguous; use buffered grouping",
                            row.key
                        ),
                    });
                }
                image_count += 1;
                current = Some((row.key.clone(), self.open_image(&row.key)?));
            }
            if let Some((_, pending)) = current.as_mut() {
                self.accept_point(pending, &row);
            }
        }

        if let Some((_, pending)) = current.take() {
            self.flush(pending)?;
        }
        debug!("{image_count} images parsed.");
        Ok(())
    }

    /// Parses a record, or returns `None` when the dataset filter rejects it.
    /// Numeric columns are only checked for rows that pass the filter.
    fn filtered_row(
        &self,
        record: &csv::StringRecord,
        path: &Path,
    ) -> Result<Option<PointRow>, AnnopackError> {
        let line = record.position().map(|p| p.line()).unwrap_or(0);
        if record.len() < MIN_COLUMNS {
            return Err(AnnopackError::PointCsvParse {
                path: path.to_path_buf(),
                line,
                message: format!(
                    "expected at least {MIN_COLUMNS} columns, found {}",
                    record.len()
                ),
            });
        }

        let dataset = record[7].trim();
        if let Some(filter) = &self.dataset_filter {
            if filter != dataset {
                return Ok(None);
            }
        }

        Ok(Some(PointRow {
            key: record[0].trim().to_string(),
            y: parse_i64_field(&record[1], "y", path, line)?,
            x: parse_i64_field(&record[2], "x", path, line)?,
            label_name: record[3].to_string(),
            label: record[4].trim().to_string(),
            func_group: record[5].to_string(),
        }))
    }

    fn open_image(&mut self, key: &str) -> Result<PendingImage, AnnopackError> {
        let image_path = self.images.lookup(&format!("{key}{IMAGE_SUFFIX}"))?;
        let (width, height) = read_image_dimensions(&image_path)?;
        self.stats.images += 1;
        Ok(PendingImage {
            image: ImageAnnotation::new(image_path.to_string_lossy(), width, height),
            objects: Vec::new(),
        })
    }

    fn accept_point(&mut self, pending: &mut PendingImage, row: &PointRow) {
        let patch = BBox::centered_patch(row.x, row.y, self.patch_width, self.patch_height);
        if !patch.fits_strictly_within(pending.image.width(), pending.image.height()) {
            trace!(
                "rejecting {} ({}, {}) '{}' in {}",
                row.label,
                row.x,
                row.y,
                row.label_name,
                row.key
            );
            self.stats.boxes_rejected += 1;
            return;
        }
        trace!(
            "accepting {} ({}) at ({}, {}) in {}",
            row.label,
            row.func_group,
            row.x,
            row.y,
            row.key
        );
        if let Some(labels) = &self.labels {
            labels.borrow_mut().register(&row.label);
        }
        self.stats.boxes_accepted += 1;
        pending
            .objects
            .push(ObjectAnnotation::from_bbox(row.label.clone(), patch));
    }

    fn flush(&mut self, pending: PendingImage) -> Result<(), AnnopackError> {
        if pending.objects.is_empty() {
            return Ok(());
        }
        self.stats.units_emitted += 1;
        notify_annotation(&self.listeners, &pending.image, &pending.objects)
    }
}

impl<L: ImageLookup> AnnotationFileParser for PointCsvParser<L> {
    fn parse(&mut self, path: &Path) -> Result<(), AnnopackError> {
        debug!("annotation_filename: {}", path.display());
        let file = File::open(path).map_err(|source| AnnopackError::AnnotationRead {
            path: path.to_path_buf(),
            source,
        })?;
        self.parse_reader(BufReader::new(file), path)
    }

    fn stats(&self) -> ParseStats {
        self.stats
    }
}

fn read_record(
    record: Result<csv::StringRecord, csv::Error>,
    path: &Path,
) -> Result<csv::StringRecord, AnnopackError> {
    record.map_err(|source| AnnopackError::PointCsvRead {
        path: path.to_path_buf(),
        source,
    })
}

fn parse_i64_field(
    raw: &str,
    field: &str,
    path: &Path,
    line: u64,
) -> Result<i64, AnnopackError> {
    raw.trim()
        .parse::<i64>()
        .map_err(|_| AnnopackError::PointCsvParse {
            path: path.to_path_buf(),
            line,
            message: format!("invalid {field} '{raw}'; expected an integer"),
        })
}

fn read_image_dimensions(path: &Path) -> Result<(u32, u32), AnnopackError> {
    let size = imagesize::size(path).map_err(|source| AnnopackError::ImageDimensionRead {
        path: path.to_path_buf(),
        source,
    })?;
    let width = u32::try_from(size.width).map_err(|_| {
        AnnopackError::InvalidArgument(format!(
            "image width {} of {} does not fit in u32",
            size.width,
            path.display()
        ))
    })?;
    let height = u32::try_from(size.height).map_err(|_| {
        AnnopackError::InvalidArgument(format!(
            "image height {} of {} does not fit in u32",
            size.height,
            path.display()
        ))
    })?;
    Ok((width, height))
}

fn log_progress(row_count: u64) {
    if row_count % PROGRESS_EVERY == 0 {
        debug!("rows processed: {row_count}");
    }
}

/// Fuzz-only entrypoint: runs the row parser and patch filter over arbitrary
/// bytes without touching any image file. Returns the number of patches that
/// would fit a 4000x3000 image.
#[cfg(feature = "fuzzing")]
pub fn fuzz_parse_point_rows(bytes: &[u8]) -> Result<usize, AnnopackError> {
    let parser = PointCsvParser::new(
        Vec::new(),
        HashMap::<String, std::path::PathBuf>::new(),
        20,
        20,
    );
    let path = Path::new("<bytes>");
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes);
    let mut fitting = 0;
    for record in csv_reader.records() {
        let record = read_record(record, path)?;
        if let Some(row) = parser.filtered_row(&record, path)? {
            let patch =
                BBox::centered_patch(row.x, row.y, parser.patch_width, parser.patch_height);
            if patch.fits_strictly_within(4000, 3000) {
                fitting += 1;
            }
        }
    }
    Ok(fitting)
}
