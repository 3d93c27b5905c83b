#![allow(dead_code)]

use std::fs;
use std::path::Path;

use annopack::ir::{ImageAnnotation, ObjectAnnotation};
use annopack::pipeline::{AnnotatedImageListener, AnnotationListener};
use annopack::AnnopackError;
use image::{DynamicImage, Rgb, RgbImage};

/// Writes a solid grey image; the format follows the extension.
pub fn write_image(path: &Path, width: u32, height: u32) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent dir");
    }
    RgbImage::from_pixel(width, height, Rgb([90, 90, 90]))
        .save(path)
        .expect("write image file");
}

pub fn write_text(path: &Path, contents: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent dir");
    }
    fs::write(path, contents).expect("write text file");
}

pub type Unit = (ImageAnnotation, Vec<ObjectAnnotation>);

/// Records every unit it is handed, with or without pixels.
#[derive(Default)]
pub struct Units {
    pub units: Vec<Unit>,
    pub sizes: Vec<(u32, u32)>,
}

impl AnnotationListener for Units {
    fn on_annotation_available(
        &mut self,
        image: &ImageAnnotation,
        objects: &[ObjectAnnotation],
    ) -> Result<(), AnnopackError> {
        self.units.push((image.clone(), objects.to_vec()));
        Ok(())
    }
}

impl AnnotatedImageListener for Units {
    fn on_annotated_image_available(
        &mut self,
        pixels: &mut DynamicImage,
        image: &ImageAnnotation,
        objects: &[ObjectAnnotation],
    ) -> Result<(), AnnopackError> {
        self.units.push((image.clone(), objects.to_vec()));
        self.sizes.push((pixels.width(), pixels.height()));
        Ok(())
    }
}

pub fn assert_close(actual: &[f32], expected: &[f32]) {
    assert_eq!(actual.len(), expected.len(), "{actual:?} vs {expected:?}");
    for (a, e) in actual.iter().zip(expected) {
        assert!((a - e).abs() < 1e-6, "{actual:?} vs {expected:?}");
    }
}

/// Builds a TrueType font with one glyph, a filled 500x700 square on a
/// 1000-unit em. There is no `cmap`, so every character maps to it.
pub fn square_font() -> Vec<u8> {
    fn u16s(values: &[u16]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_be_bytes()).collect()
    }
    fn i16s(values: &[i16]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_be_bytes()).collect()
    }

    let mut glyf = Vec::new();
    glyf.extend(i16s(&[1, 0, 0, 500, 700])); // one contour and its bounds
    glyf.extend(u16s(&[3, 0])); // last point index, no instructions
    glyf.extend([1u8; 4]); // on-curve, 16-bit deltas
    glyf.extend(i16s(&[0, 0, 500, 0])); // x deltas
    glyf.extend(i16s(&[0, 700, 0, -700])); // y deltas
    glyf.extend([0u8; 2]);

    let mut head = Vec::new();
    head.extend(u16s(&[1, 0, 1, 0, 0, 0, 0x5F0F, 0x3CF5, 0, 1000]));
    head.extend([0u8; 16]); // created, modified
    head.extend(i16s(&[0, 0, 500, 700, 0, 3, 2, 0, 0]));

    let mut hhea = Vec::new();
    hhea.extend(u16s(&[1, 0]));
    hhea.extend(i16s(&[800, -200, 0, 600, 0, 0, 500, 1, 0, 0, 0, 0, 0, 0, 0]));
    hhea.extend(u16s(&[1]));

    let hmtx = u16s(&[600, 0]);
    let loca = u16s(&[0, (glyf.len() / 2) as u16]);
    let maxp = u16s(&[0, 0x5000, 1]);

    let tables: [(&[u8; 4], Vec<u8>); 6] = [
        (b"glyf", glyf),
        (b"head", head),
        (b"hhea", hhea),
        (b"hmtx", hmtx),
        (b"loca", loca),
        (b"maxp", maxp),
    ];

    let mut font = u16s(&[1, 0, tables.len() as u16, 64, 2, 32]);
    let mut offset = 12 + 16 * tables.len();
    let mut data = Vec::new();
    for (tag, table) in &tables {
        font.extend_from_slice(*tag);
        font.extend([0u8; 4]); // checksum
        font.extend((offset as u32).to_be_bytes());
        font.extend((table.len() as u32).to_be_bytes());
        data.extend_from_slice(table);
        while data.len() % 4 != 0 {
            data.push(0);
        }
        offset = 12 + 16 * tables.len() + data.len();
    }
    font.extend(data);
    font
}
