//! Cropping annotated objects out into images of their own.

use image::{DynamicImage, GenericImageView};
use log::{debug, trace};

use crate::error::AnnopackError;
use crate::ir::{BBox, ImageAnnotation, ObjectAnnotation, Pixel};
use crate::pipeline::{
    notify_annotated_image, AnnotatedImageListener, AnnotatedImageListeners, Shared,
};

/// Which region is cut out around each object.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CropPolicy {
    /// Exactly the object's box. Every object yields a crop.
    #[default]
    ObjectBounds,
    /// The object's box grown by half a patch on every side. Objects whose
    /// grown region would not lie strictly inside the image are skipped.
    Margin { patch_width: u32, patch_height: u32 },
}

/// Width and height recorded on a cropped image's annotation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DeclaredSize {
    /// Keep the source image's width and height, even though the pixel
    /// buffer is smaller. Record packagers then normalise against the source
    /// size. This matches datasets produced by earlier versions of the tool.
    #[default]
    Source,
    /// Use the cropped buffer's real width and height.
    Actual,
}

/// Turns one unit with K objects into K single-object units.
///
/// The derived image path is the source path with `_<index>` inserted before
/// the extension, where `index` is the object's position in the input list.
/// The derived object is rebased so the crop's top-left corner is `(0, 0)`.
pub struct CropStage {
    listeners: AnnotatedImageListeners,
    policy: CropPolicy,
    declared_size: DeclaredSize,
    crops: usize,
}

impl CropStage {
    pub fn new(listeners: AnnotatedImageListeners) -> Self {
        Self {
            listeners,
            policy: CropPolicy::default(),
            declared_size: DeclaredSize::default(),
            crops: 0,
        }
    }

    pub fn with_policy(mut self, policy: CropPolicy) -> Self {
        debug!("crop policy: {policy:?}");
        self.policy = policy;
        self
    }

    pub fn with_declared_size(mut self, declared_size: DeclaredSize) -> Self {
        self.declared_size = declared_size;
        self
    }

    pub fn register(&mut self, listener: Shared<dyn AnnotatedImageListener>) {
        self.listeners.push(listener);
    }

    /// Number of crops forwarded so far.
    pub fn crops(&self) -> usize {
        self.crops
    }

    /// Crop region in source pixels and the object's box inside that region.
    fn plan(
        &self,
        image: &ImageAnnotation,
        object: &ObjectAnnotation,
    ) -> Option<(BBox<Pixel>, BBox<Pixel>)> {
        let bbox = object.bbox();
        match self.policy {
            CropPolicy::ObjectBounds => Some((*bbox, bbox.rebased_to_origin())),
            CropPolicy::Margin {
                patch_width,
                patch_height,
            } => {
                let half_w = f64::from(patch_width / 2);
                let half_h = f64::from(patch_height / 2);
                let fits = bbox.xmin() > half_w
                    && bbox.ymin() > half_h
                    && bbox.xmax() + half_w < f64::from(image.width())
                    && bbox.ymax() + half_h < f64::from(image.height());
                if !fits {
                    return None;
                }
                let region = BBox::new(
                    bbox.xmin() - half_w,
                    bbox.xmax() + half_w,
                    bbox.ymin() - half_h,
                    bbox.ymax() + half_h,
                );
                let inner = BBox::new(
                    half_w,
                    half_w + bbox.width(),
                    half_h,
                    half_h + bbox.height(),
                );
                Some((region, inner))
            }
        }
    }
}

impl AnnotatedImageListener for CropStage {
    fn on_annotated_image_available(
        &mut self,
        pixels: &mut DynamicImage,
        image: &ImageAnnotation,
        objects: &[ObjectAnnotation],
    ) -> Result<(), AnnopackError> {
        for (index, object) in objects.iter().enumerate() {
            let Some((region, inner)) = self.plan(image, object) else {
                trace!(
                    "{} object {index} ({}) does not fit its crop margin",
                    image.path(),
                    object.label()
                );
                continue;
            };

            let mut cropped = crop_region(pixels, &region);
            let (width, height) = match self.declared_size {
                DeclaredSize::Source => (image.width(), image.height()),
                DeclaredSize::Actual => cropped.dimensions(),
            };
            let derived_image =
                ImageAnnotation::new(indexed_path(image.path(), index), width, height);
            let derived_object = ObjectAnnotation::from_bbox(object.label(), inner);

            self.crops += 1;
            notify_annotated_image(
                &self.listeners,
                &mut cropped,
                &derived_image,
                std::slice::from_ref(&derived_object),
            )?;
        }
        Ok(())
    }
}

/// Cuts `region` out of `pixels`. Coordinates are rounded to whole pixels;
/// the right and bottom edges are exclusive and the region is clamped to the
/// buffer.
fn crop_region(pixels: &DynamicImage, region: &BBox<Pixel>) -> DynamicImage {
    let x0 = to_pixel(region.xmin());
    let y0 = to_pixel(region.ymin());
    let x1 = to_pixel(region.xmax());
    let y1 = to_pixel(region.ymax());
    pixels.crop_imm(x0, y0, x1.saturating_sub(x0), y1.saturating_sub(y0))
}

fn to_pixel(value: f64) -> u32 {
    value.round().max(0.0) as u32
}

/// Inserts `_<index>` before the extension of the last path component.
///
/// `reef/IMG_7.jpg` becomes `reef/IMG_7_0.jpg`; a name without extension
/// gets the suffix appended.
pub fn indexed_path(path: &str, index: usize) -> String {
    let name_start = path.rfind(['/', '\\']).map_or(0, |i| i + 1);
    match path[name_start..].rfind('.') {
        Some(dot) if dot > 0 => {
            let dot = name_start + dot;
            format!("{}_{index}{}", &path[..dot], &path[dot..])
        }
        _ => format!("{path}_{index}"),
    }
}
