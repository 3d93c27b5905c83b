//! Value types for one annotated image and its object boxes.
//!
//! An [`ImageAnnotation`] paired with a slice of [`ObjectAnnotation`]s is the
//! unit that flows through every pipeline stage. Both types are immutable once
//! built; stages that derive new images (crops) build new values instead of
//! editing the ones they were given.

use std::fmt;
use std::path::Path;

use super::bbox::BBox;
use super::space::Pixel;

/// Encoding recorded for an image, derived from its path.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ImageFormat {
    Jpeg,
    Png,
}

impl ImageFormat {
    /// `Png` if the path has a `.png` extension, `Jpeg` otherwise.
    pub fn from_path(path: &str) -> Self {
        let is_png = Path::new(path)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("png"))
            .unwrap_or(false);
        if is_png {
            ImageFormat::Png
        } else {
            ImageFormat::Jpeg
        }
    }

    /// Short name stored in packaged records (`"png"` or `"jpg"`).
    pub fn as_str(self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "jpg",
            ImageFormat::Png => "png",
        }
    }

    pub(crate) fn codec(self) -> image::ImageFormat {
        match self {
            ImageFormat::Jpeg => image::ImageFormat::Jpeg,
            ImageFormat::Png => image::ImageFormat::Png,
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies one image: where it lives and its declared size in pixels.
#[derive(Clone, Debug, PartialEq)]
pub struct ImageAnnotation {
    path: String,
    format: ImageFormat,
    width: u32,
    height: u32,
}

impl ImageAnnotation {
    pub fn new(path: impl Into<String>, width: u32, height: u32) -> Self {
        let path = path.into();
        let format = ImageFormat::from_path(&path);
        Self {
            path,
            format,
            width,
            height,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Path without directories, e.g. `IMG_01.jpg` for `/data/a/IMG_01.jpg`.
    pub fn file_name(&self) -> &str {
        Path::new(&self.path)
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(&self.path)
    }
}

/// One labelled box inside an image, in that image's pixel space.
#[derive(Clone, Debug, PartialEq)]
pub struct ObjectAnnotation {
    label: String,
    bbox: BBox<Pixel>,
}

impl ObjectAnnotation {
    pub fn new(label: impl Into<String>, xmin: f64, xmax: f64, ymin: f64, ymax: f64) -> Self {
        Self::from_bbox(label, BBox::new(xmin, xmax, ymin, ymax))
    }

    pub fn from_bbox(label: impl Into<String>, bbox: BBox<Pixel>) -> Self {
        Self {
            label: label.into(),
            bbox,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn bbox(&self) -> &BBox<Pixel> {
        &self.bbox
    }

    pub fn xmin(&self) -> f64 {
        self.bbox.xmin()
    }

    pub fn xmax(&self) -> f64 {
        self.bbox.xmax()
    }

    pub fn ymin(&self) -> f64 {
        self.bbox.ymin()
    }

    pub fn ymax(&self) -> f64 {
        self.bbox.ymax()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_follows_extension() {
        assert_eq!(ImageAnnotation::new("a/b.png", 1, 1).format(), ImageFormat::Png);
        assert_eq!(ImageAnnotation::new("a/b.PNG", 1, 1).format(), ImageFormat::Png);
        assert_eq!(ImageAnnotation::new("a/b.jpg", 1, 1).format(), ImageFormat::Jpeg);
        assert_eq!(ImageAnnotation::new("a/b.jpeg", 1, 1).format(), ImageFormat::Jpeg);
        assert_eq!(ImageAnnotation::new("noext", 1, 1).format(), ImageFormat::Jpeg);
    }

    #[test]
    fn file_name_strips_directories() {
        let image = ImageAnnotation::new("/data/survey/IMG_01.jpg", 640, 480);
        assert_eq!(image.file_name(), "IMG_01.jpg");
        assert_eq!(ImageAnnotation::new("x.png", 1, 1).file_name(), "x.png");
    }

    #[test]
    fn object_accessors_follow_bbox() {
        let obj = ObjectAnnotation::new("fish", 10.0, 20.0, 5.0, 15.0);
        assert_eq!(obj.label(), "fish");
        assert_eq!(obj.xmin(), 10.0);
        assert_eq!(obj.xmax(), 20.0);
        assert_eq!(obj.ymin(), 5.0);
        assert_eq!(obj.ymax(), 15.0);
    }
}
