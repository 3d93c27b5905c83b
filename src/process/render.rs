//! Drawing annotations onto the pixels, for eyeballing a dataset.

use std::fs;
use std::path::Path;

use ab_glyph::{FontArc, PxScale};
use image::{DynamicImage, Rgba};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;

use crate::error::AnnopackError;
use crate::ir::{ImageAnnotation, ObjectAnnotation};
use crate::pipeline::{
    notify_annotated_image, AnnotatedImageListener, AnnotatedImageListeners, Shared,
};

const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);
const DEFAULT_TEXT_SIZE: f32 = 14.0;

/// Draws each object's box (one pixel wide) with its label text, then
/// forwards the unit unchanged.
///
/// Drawing happens in place on the shared buffer, so listeners registered on
/// the same producer after this stage also see the boxes.
pub struct RenderStage {
    listeners: AnnotatedImageListeners,
    color: Rgba<u8>,
    font: FontArc,
    scale: PxScale,
}

impl RenderStage {
    pub fn new(listeners: AnnotatedImageListeners, font: FontArc) -> Self {
        Self {
            listeners,
            color: WHITE,
            font,
            scale: PxScale::from(DEFAULT_TEXT_SIZE),
        }
    }

    pub fn from_font_file(
        listeners: AnnotatedImageListeners,
        path: &Path,
    ) -> Result<Self, AnnopackError> {
        Ok(Self::new(listeners, load_font(path)?))
    }

    pub fn with_color(mut self, color: Rgba<u8>) -> Self {
        self.color = color;
        self
    }

    /// Label text height in pixels.
    pub fn with_text_size(mut self, size: f32) -> Self {
        self.scale = PxScale::from(size);
        self
    }

    pub fn register(&mut self, listener: Shared<dyn AnnotatedImageListener>) {
        self.listeners.push(listener);
    }

    fn draw(&self, pixels: &mut DynamicImage, object: &ObjectAnnotation) {
        let x = object.xmin().round() as i32;
        let y = object.ymin().round() as i32;
        let width = (object.xmax() - object.xmin()).round();
        let height = (object.ymax() - object.ymin()).round();
        if width < 1.0 || height < 1.0 {
            return;
        }
        let (width, height) = (width as u32, height as u32);
        draw_hollow_rect_mut(pixels, Rect::at(x, y).of_size(width, height), self.color);

        let (_, text_height) = text_size(self.scale, &self.font, object.label());
        let text_height = text_height as i32;
        // Above the box when there is room, otherwise just below it.
        let text_y = if y >= text_height {
            y - text_height
        } else {
            y + height as i32
        };
        draw_text_mut(
            pixels,
            self.color,
            x,
            text_y,
            self.scale,
            &self.font,
            object.label(),
        );
    }
}

/// Loads a TrueType/OpenType font for label text.
pub fn load_font(path: &Path) -> Result<FontArc, AnnopackError> {
    let font_err = |message: String| AnnopackError::FontLoad {
        path: path.to_path_buf(),
        message,
    };
    let bytes = fs::read(path).map_err(|err| font_err(err.to_string()))?;
    FontArc::try_from_vec(bytes).map_err(|err| font_err(err.to_string()))
}

impl AnnotatedImageListener for RenderStage {
    fn on_annotated_image_available(
        &mut self,
        pixels: &mut DynamicImage,
        image: &ImageAnnotation,
        objects: &[ObjectAnnotation],
    ) -> Result<(), AnnopackError> {
        for object in objects {
            self.draw(pixels, object);
        }
        notify_annotated_image(&self.listeners, pixels, image, objects)
    }
}
