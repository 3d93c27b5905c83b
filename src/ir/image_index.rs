//! Resolving image names found in annotation files to files on disk.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use walkdir::WalkDir;

use crate::error::AnnopackError;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// Maps an image name from an annotation file to the image's full path.
pub trait ImageLookup {
    /// Resolves `name`, which may carry a directory prefix.
    ///
    /// # Errors
    /// Returns [`AnnopackError::ImageLookup`] if the name is unknown.
    fn lookup(&self, name: &str) -> Result<PathBuf, AnnopackError>;

    /// Number of images available for lookup.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Last path component of `name`, accepting both `/` and `\` separators.
pub fn short_name(name: &str) -> &str {
    name.rsplit(['/', '\\']).next().unwrap_or(name)
}

impl ImageLookup for HashMap<String, PathBuf> {
    fn lookup(&self, name: &str) -> Result<PathBuf, AnnopackError> {
        let short = short_name(name);
        self.get(short)
            .cloned()
            .ok_or_else(|| AnnopackError::ImageLookup {
                name: short.to_string(),
            })
    }

    fn len(&self) -> usize {
        HashMap::len(self)
    }
}

/// Every `.jpg`, `.jpeg` and `.png` file below a root directory, keyed by
/// file name. File names are assumed to be unique across the tree; when they
/// are not, the file visited last wins.
#[derive(Clone, Debug, Default)]
pub struct ImageIndex {
    by_name: HashMap<String, PathBuf>,
}

impl ImageIndex {
    /// Walks `root` recursively, following symlinks.
    pub fn build(root: &Path) -> Result<Self, AnnopackError> {
        let mut by_name = HashMap::new();
        for entry in WalkDir::new(root).follow_links(true) {
            let entry = entry.map_err(|source| AnnopackError::ImageIndex {
                path: root.to_path_buf(),
                source,
            })?;
            if !entry.file_type().is_file() || !has_image_extension(entry.path()) {
                continue;
            }
            let Some(name) = entry.file_name().to_str() else {
                warn!("skipping non UTF-8 file name {}", entry.path().display());
                continue;
            };
            by_name.insert(name.to_string(), entry.path().to_path_buf());
        }
        debug!("{} images indexed below {}", by_name.len(), root.display());
        Ok(Self { by_name })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(short_name(name))
    }
}

impl ImageLookup for ImageIndex {
    fn lookup(&self, name: &str) -> Result<PathBuf, AnnopackError> {
        self.by_name.lookup(name)
    }

    fn len(&self) -> usize {
        self.by_name.len()
    }
}

fn has_image_extension(path: &Path) -> bool {
    let Some(ext) = path.extension().and_then(|ext| ext.to_str()) else {
        return false;
    };
    IMAGE_EXTENSIONS
        .iter()
        .any(|allowed| ext.eq_ignore_ascii_case(allowed))
}
