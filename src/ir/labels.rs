//! Label registry: a stable mapping from label text to a dense 1-based id.
//!
//! Ids are handed out in first-registration order and never change for the
//! lifetime of a registry (short of [`LabelRegistry::clear`]). The same order
//! is used when the registry is persisted as a label map, so a label map
//! written after a run always matches the ids stored in the packaged records.
//!
//! The registry is shared between stages through a [`Shared`] handle: a parser
//! or a registered collector writes to it, the record packager reads from it,
//! and a [`LabelMapWriter`] persists it when the pipeline stops.

use std::collections::HashMap;
use std::fmt;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use log::{debug, info};
use serde::Serialize;

use super::{ImageAnnotation, ObjectAnnotation};
use crate::error::AnnopackError;
use crate::pipeline::{AnnotationListener, PipelineStateListener, Shared};

/// Numeric id of a label, starting at 1.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct LabelId(u32);

impl LabelId {
    #[inline]
    pub fn as_u32(self) -> u32 {
        self.0
    }

    #[inline]
    pub fn as_i64(self) -> i64 {
        i64::from(self.0)
    }
}

impl fmt::Debug for LabelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LabelId({})", self.0)
    }
}

impl fmt::Display for LabelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug, Default)]
pub struct LabelRegistry {
    ids: HashMap<String, LabelId>,
    order: Vec<String>,
}

impl LabelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assigns the next id to `label` on first sight; later calls are no-ops.
    pub fn register(&mut self, label: &str) -> LabelId {
        if let Some(id) = self.ids.get(label) {
            return *id;
        }
        let id = LabelId(self.order.len() as u32 + 1);
        debug!("Adding \"{label}\" as {id}");
        self.ids.insert(label.to_string(), id);
        self.order.push(label.to_string());
        id
    }

    /// Looks up an id without assigning one.
    pub fn find(&self, label: &str) -> Option<LabelId> {
        self.ids.get(label).copied()
    }

    pub fn clear(&mut self) {
        self.ids.clear();
        self.order.clear();
    }

    pub fn count(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Labels with their ids, in id order.
    pub fn iter(&self) -> impl Iterator<Item = (LabelId, &str)> + '_ {
        self.order
            .iter()
            .enumerate()
            .map(|(idx, label)| (LabelId(idx as u32 + 1), label.as_str()))
    }

    /// Renders the label map text, one `item { .. }` block per label.
    pub fn to_label_map_string(&self) -> String {
        let mut out = String::new();
        for (id, label) in self.iter() {
            out.push_str("item {\n");
            out.push_str(&format!("id: {id}\n"));
            out.push_str(&format!("name: '{label}'\n"));
            out.push_str("}\n");
        }
        out
    }

    /// Writes the label map to `path`, creating parent directories as needed.
    pub fn write_label_map(&self, path: &Path) -> Result<(), AnnopackError> {
        let write_err = |source| AnnopackError::LabelMapWrite {
            path: path.to_path_buf(),
            source,
        };
        ensure_parent_dir(path)?;
        let mut writer = BufWriter::new(File::create(path).map_err(write_err)?);
        writer
            .write_all(self.to_label_map_string().as_bytes())
            .map_err(write_err)?;
        writer.flush().map_err(write_err)?;
        info!("{} labels written to {}", self.count(), path.display());
        Ok(())
    }
}

/// Registering the registry as an annotation listener turns it into a label
/// collector: every label of every unit it sees gets an id.
impl AnnotationListener for LabelRegistry {
    fn on_annotation_available(
        &mut self,
        _image: &ImageAnnotation,
        objects: &[ObjectAnnotation],
    ) -> Result<(), AnnopackError> {
        for object in objects {
            self.register(object.label());
        }
        Ok(())
    }
}

/// Persists a shared registry as a label map file when the pipeline stops.
pub struct LabelMapWriter {
    labels: Shared<LabelRegistry>,
    path: PathBuf,
}

impl LabelMapWriter {
    /// Creates the label map's parent directory up front so a bad location
    /// fails before any parsing happens.
    pub fn new(labels: Shared<LabelRegistry>, path: impl Into<PathBuf>) -> Result<Self, AnnopackError> {
        let path = path.into();
        ensure_parent_dir(&path)?;
        Ok(Self { labels, path })
    }
}

impl PipelineStateListener for LabelMapWriter {
    fn on_pipeline_stop(&mut self) -> Result<(), AnnopackError> {
        self.labels.borrow().write_label_map(&self.path)
    }
}

pub(crate) fn ensure_parent_dir(path: &Path) -> Result<(), AnnopackError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent).map_err(|source| AnnopackError::OutputCreate {
                path: parent.to_path_buf(),
                source,
            })
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::shared;

    #[test]
    fn ids_are_dense_and_follow_first_sight() {
        let mut labels = LabelRegistry::new();
        assert_eq!(labels.register("fish").as_u32(), 1);
        assert_eq!(labels.register("coral").as_u32(), 2);
        assert_eq!(labels.register("fish").as_u32(), 1);
        assert_eq!(labels.register("sand").as_u32(), 3);
        assert_eq!(labels.count(), 3);

        let order: Vec<_> = labels.iter().map(|(id, l)| (id.as_u32(), l)).collect();
        assert_eq!(order, vec![(1, "fish"), (2, "coral"), (3, "sand")]);
    }

    #[test]
    fn find_never_fabricates_ids() {
        let mut labels = LabelRegistry::new();
        labels.register("fish");
        assert_eq!(labels.find("fish").map(LabelId::as_u32), Some(1));
        assert_eq!(labels.find("whale"), None);
        assert_eq!(labels.count(), 1);
    }

    #[test]
    fn clear_restarts_numbering() {
        let mut labels = LabelRegistry::new();
        labels.register("a");
        labels.register("b");
        labels.clear();
        assert!(labels.is_empty());
        assert_eq!(labels.find("a"), None);
        assert_eq!(labels.register("b").as_u32(), 1);
    }

    #[test]
    fn collector_registers_labels_of_every_unit() {
        let mut labels = LabelRegistry::new();
        let image = ImageAnnotation::new("a.jpg", 10, 10);
        labels
            .on_annotation_available(
                &image,
                &[
                    ObjectAnnotation::new("coral", 0.0, 1.0, 0.0, 1.0),
                    ObjectAnnotation::new("fish", 0.0, 1.0, 0.0, 1.0),
                    ObjectAnnotation::new("coral", 0.0, 1.0, 0.0, 1.0),
                ],
            )
            .expect("collect");
        assert_eq!(labels.find("coral").map(LabelId::as_u32), Some(1));
        assert_eq!(labels.find("fish").map(LabelId::as_u32), Some(2));
    }

    #[test]
    fn label_map_text_format() {
        let mut labels = LabelRegistry::new();
        labels.register("fish");
        labels.register("coral");
        assert_eq!(
            labels.to_label_map_string(),
            "item {\nid: 1\nname: 'fish'\n}\nitem {\nid: 2\nname: 'coral'\n}\n"
        );
    }

    #[test]
    fn writer_persists_on_stop_into_new_directory() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("nested").join("label_map.pbtxt");
        let labels = shared(LabelRegistry::new());
        let mut writer = LabelMapWriter::new(labels.clone(), &path).expect("writer");

        labels.borrow_mut().register("fish");
        writer.on_pipeline_stop().expect("persist");

        let text = fs::read_to_string(&path).expect("read label map");
        assert_eq!(text, "item {\nid: 1\nname: 'fish'\n}\n");
    }
}
