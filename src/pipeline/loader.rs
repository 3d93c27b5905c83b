use std::path::Path;

use log::{debug, trace};

use super::{notify_annotated_image, AnnotatedImageListeners, AnnotationListener, Shared};
use crate::error::AnnopackError;
use crate::ir::{ImageAnnotation, ObjectAnnotation};
use crate::pipeline::AnnotatedImageListener;

/// Loads the pixels of every annotated image and hands them to the chain.
///
/// Units without object annotations are dropped here, before any decode.
pub struct ImageLoader {
    listeners: AnnotatedImageListeners,
    loaded: usize,
}

impl ImageLoader {
    pub fn new(listeners: AnnotatedImageListeners) -> Self {
        Self {
            listeners,
            loaded: 0,
        }
    }

    pub fn register(&mut self, listener: Shared<dyn AnnotatedImageListener>) {
        self.listeners.push(listener);
    }

    /// Number of images decoded so far.
    pub fn loaded(&self) -> usize {
        self.loaded
    }
}

impl AnnotationListener for ImageLoader {
    fn on_annotation_available(
        &mut self,
        image: &ImageAnnotation,
        objects: &[ObjectAnnotation],
    ) -> Result<(), AnnopackError> {
        debug!("{} -> {}", image.path(), objects.len());
        if objects.is_empty() {
            return Ok(());
        }

        let path = Path::new(image.path());
        let mut pixels = image::open(path).map_err(|source| AnnopackError::ImageLoad {
            path: path.to_path_buf(),
            source,
        })?;
        self.loaded += 1;
        trace!(
            "decoded {} ({}x{})",
            image.path(),
            pixels.width(),
            pixels.height()
        );

        notify_annotated_image(&self.listeners, &mut pixels, image, objects)
    }
}
