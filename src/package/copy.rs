//! Packagers that write the unit's pixels as image files under an output root.

use std::fs;
use std::path::{Component, Path, PathBuf};

use image::DynamicImage;
use log::{debug, info, trace};

use super::{encode_image, DatasetPackager};
use crate::error::AnnopackError;
use crate::ir::{ensure_parent_dir, short_name, ImageAnnotation, ObjectAnnotation};

fn create_root(root: PathBuf) -> Result<PathBuf, AnnopackError> {
    fs::create_dir_all(&root).map_err(|source| AnnopackError::OutputCreate {
        path: root.clone(),
        source,
    })?;
    Ok(root)
}

fn store(
    pixels: &DynamicImage,
    image: &ImageAnnotation,
    destination: &Path,
) -> Result<(), AnnopackError> {
    let bytes = encode_image(pixels, image.format(), destination)?;
    ensure_parent_dir(destination)?;
    fs::write(destination, bytes).map_err(|source| AnnopackError::ImageSave {
        path: destination.to_path_buf(),
        source: image::ImageError::IoError(source),
    })?;
    trace!("stored {}", destination.display());
    Ok(())
}

/// Keeps only the normal components of `path`, so absolute paths and `..`
/// stay under the output root.
fn relative_components(path: &str) -> PathBuf {
    Path::new(path)
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part),
            _ => None,
        })
        .collect()
}

/// Mirrors the image's full path under the output root.
pub struct StoreByFullPath {
    root: PathBuf,
    stored: usize,
}

impl StoreByFullPath {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, AnnopackError> {
        let root = create_root(root.into())?;
        debug!("storing images by full path under {}", root.display());
        Ok(Self { root, stored: 0 })
    }

    pub fn destination(&self, image: &ImageAnnotation) -> PathBuf {
        self.root.join(relative_components(image.path()))
    }
}

impl DatasetPackager for StoreByFullPath {
    fn append(
        &mut self,
        pixels: &DynamicImage,
        image: &ImageAnnotation,
        _objects: &[ObjectAnnotation],
    ) -> Result<(), AnnopackError> {
        store(pixels, image, &self.destination(image))?;
        self.stored += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<(), AnnopackError> {
        info!("{} images stored under {}", self.stored, self.root.display());
        Ok(())
    }

    fn packaged(&self) -> usize {
        self.stored
    }
}

/// Stores every image directly in the output root under its file name.
/// Images with the same file name overwrite each other.
pub struct StoreByShortName {
    root: PathBuf,
    stored: usize,
}

impl StoreByShortName {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, AnnopackError> {
        let root = create_root(root.into())?;
        debug!("storing images by file name under {}", root.display());
        Ok(Self { root, stored: 0 })
    }

    pub fn destination(&self, image: &ImageAnnotation) -> PathBuf {
        self.root.join(short_name(image.path()))
    }
}

impl DatasetPackager for StoreByShortName {
    fn append(
        &mut self,
        pixels: &DynamicImage,
        image: &ImageAnnotation,
        _objects: &[ObjectAnnotation],
    ) -> Result<(), AnnopackError> {
        store(pixels, image, &self.destination(image))?;
        self.stored += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<(), AnnopackError> {
        info!("{} images stored under {}", self.stored, self.root.display());
        Ok(())
    }

    fn packaged(&self) -> usize {
        self.stored
    }
}

/// Stores each image in a subdirectory named after its first object's label.
///
/// Only the first label decides the directory, so this suits units with a
/// single object each, such as the output of the crop stage. Units without
/// objects are skipped.
pub struct StoreByLabel {
    root: PathBuf,
    stored: usize,
    skipped: usize,
}

impl StoreByLabel {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, AnnopackError> {
        let root = create_root(root.into())?;
        debug!("storing images by label under {}", root.display());
        Ok(Self {
            root,
            stored: 0,
            skipped: 0,
        })
    }

    pub fn destination(
        &self,
        image: &ImageAnnotation,
        objects: &[ObjectAnnotation],
    ) -> Option<PathBuf> {
        let label = objects.first()?.label();
        Some(
            self.root
                .join(relative_components(label))
                .join(short_name(image.path())),
        )
    }
}

impl DatasetPackager for StoreByLabel {
    fn append(
        &mut self,
        pixels: &DynamicImage,
        image: &ImageAnnotation,
        objects: &[ObjectAnnotation],
    ) -> Result<(), AnnopackError> {
        let Some(destination) = self.destination(image, objects) else {
            self.skipped += 1;
            return Ok(());
        };
        store(pixels, image, &destination)?;
        self.stored += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<(), AnnopackError> {
        info!(
            "{} images stored by label under {} ({} without objects skipped)",
            self.stored,
            self.root.display(),
            self.skipped
        );
        Ok(())
    }

    fn packaged(&self) -> usize {
        self.stored
    }
}
