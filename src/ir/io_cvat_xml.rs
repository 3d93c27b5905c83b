//! CVAT XML reader.
//!
//! Reads CVAT "for images" exports: a root element holding `<image>` entries,
//! each with `name`, `width` and `height` attributes and zero or more `<box>`
//! children carrying `label`, `xtl`, `xbr`, `ytl` and `ybr`.
//!
//! Boxes are passed through unfiltered, and every image becomes a unit, even
//! one without boxes. Other annotation shapes (`<polygon>`, `<points>`, ...)
//! are ignored.

use std::fs;
use std::path::Path;

use log::{debug, trace};
use roxmltree::{Document, Node};

use super::{
    AnnotationFileParser, ImageAnnotation, ImageLookup, ObjectAnnotation, ParseStats,
};
use crate::error::AnnopackError;
use crate::pipeline::{notify_annotation, AnnotationListener, AnnotationListeners, Shared};

/// Parses CVAT XML and emits one unit per `<image>`, in document order.
pub struct CvatAnnotationParser<L> {
    listeners: AnnotationListeners,
    images: L,
    stats: ParseStats,
}

impl<L: ImageLookup> CvatAnnotationParser<L> {
    pub fn new(listeners: AnnotationListeners, images: L) -> Self {
        debug!("Available images: {}", images.len());
        Self {
            listeners,
            images,
            stats: ParseStats::default(),
        }
    }

    pub fn register(&mut self, listener: Shared<dyn AnnotationListener>) {
        self.listeners.push(listener);
    }

    /// Parses CVAT XML held in memory.
    pub fn parse_str(&mut self, xml: &str) -> Result<(), AnnopackError> {
        self.parse_document(xml, Path::new("<string>"))
    }

    fn parse_document(&mut self, xml: &str, path: &Path) -> Result<(), AnnopackError> {
        let Self {
            listeners,
            images,
            stats,
        } = self;
        let parsed = for_each_image(xml, path, &*images, |image, objects| {
            stats.units_emitted += 1;
            stats.boxes_accepted += objects.len();
            notify_annotation(listeners, &image, &objects)
        })?;
        stats.records += parsed;
        stats.images += parsed;
        debug!("{parsed} images parsed.");
        Ok(())
    }
}

impl<L: ImageLookup> AnnotationFileParser for CvatAnnotationParser<L> {
    fn parse(&mut self, path: &Path) -> Result<(), AnnopackError> {
        debug!("annotation_filename: {}", path.display());
        let xml = fs::read_to_string(path).map_err(|source| AnnopackError::AnnotationRead {
            path: path.to_path_buf(),
            source,
        })?;
        self.parse_document(&xml, path)
    }

    fn stats(&self) -> ParseStats {
        self.stats
    }
}

/// Walks every `<image>` of the document, resolving names through `images`.
/// Returns the number of images visited.
fn for_each_image<F>(
    xml: &str,
    path: &Path,
    images: &dyn ImageLookup,
    mut emit: F,
) -> Result<usize, AnnopackError>
where
    F: FnMut(ImageAnnotation, Vec<ObjectAnnotation>) -> Result<(), AnnopackError>,
{
    let document = Document::parse(xml).map_err(|source| AnnopackError::CvatXmlParse {
        path: path.to_path_buf(),
        message: source.to_string(),
    })?;

    let mut count = 0;
    for image_node in document
        .root_element()
        .children()
        .filter(|n| n.is_element() && n.tag_name().name() == "image")
    {
        let name = required_attr(image_node, "name", path, "<image>")?;
        let width = parse_required_u32_attr(image_node, "width", path)?;
        let height = parse_required_u32_attr(image_node, "height", path)?;
        let image_path = images.lookup(name)?;
        let image = ImageAnnotation::new(image_path.to_string_lossy(), width, height);

        let mut objects = Vec::new();
        for child in image_node.children().filter(|n| n.is_element()) {
            if child.tag_name().name() != "box" {
                trace!(
                    "ignoring <{}> in image '{name}'",
                    child.tag_name().name()
                );
                continue;
            }
            objects.push(parse_box_element(child, path, name)?);
        }

        count += 1;
        emit(image, objects)?;
    }
    Ok(count)
}

fn parse_box_element(
    node: Node<'_, '_>,
    path: &Path,
    image_name: &str,
) -> Result<ObjectAnnotation, AnnopackError> {
    let label = required_attr(node, "label", path, "<box>")?;
    let xtl = parse_required_f64_attr(node, "xtl", path, image_name)?;
    let xbr = parse_required_f64_attr(node, "xbr", path, image_name)?;
    let ytl = parse_required_f64_attr(node, "ytl", path, image_name)?;
    let ybr = parse_required_f64_attr(node, "ybr", path, image_name)?;
    Ok(ObjectAnnotation::new(label, xtl, xbr, ytl, ybr))
}

fn required_attr<'a>(
    node: Node<'a, '_>,
    attr: &str,
    path: &Path,
    element: &str,
) -> Result<&'a str, AnnopackError> {
    node.attribute(attr)
        .ok_or_else(|| AnnopackError::CvatXmlParse {
            path: path.to_path_buf(),
            message: format!("{element} is missing required attribute '{attr}'"),
        })
}

fn parse_required_u32_attr(
    node: Node<'_, '_>,
    attr: &str,
    path: &Path,
) -> Result<u32, AnnopackError> {
    let raw = required_attr(node, attr, path, "<image>")?;
    raw.trim()
        .parse::<u32>()
        .map_err(|_| AnnopackError::CvatXmlParse {
            path: path.to_path_buf(),
            message: format!("invalid <image {attr}> value '{raw}'; expected u32"),
        })
}

fn parse_required_f64_attr(
    node: Node<'_, '_>,
    attr: &str,
    path: &Path,
    image_name: &str,
) -> Result<f64, AnnopackError> {
    let raw = required_attr(node, attr, path, "<box>")?;
    raw.trim()
        .parse::<f64>()
        .map_err(|_| AnnopackError::CvatXmlParse {
            path: path.to_path_buf(),
            message: format!(
                "<box> in image '{image_name}' has invalid {attr}='{raw}'; expected a number"
            ),
        })
}

/// Fuzz-only entrypoint: parses arbitrary bytes, resolving every image name
/// to itself.
#[cfg(feature = "fuzzing")]
pub fn fuzz_parse_cvat_xml(bytes: &[u8]) -> Result<usize, AnnopackError> {
    use std::path::PathBuf;

    struct Identity;

    impl ImageLookup for Identity {
        fn lookup(&self, name: &str) -> Result<PathBuf, AnnopackError> {
            Ok(PathBuf::from(name))
        }

        fn len(&self) -> usize {
            0
        }
    }

    let xml = std::str::from_utf8(bytes).map_err(|source| AnnopackError::CvatXmlParse {
        path: PathBuf::from("<bytes>"),
        message: format!("input is not valid UTF-8: {source}"),
    })?;
    for_each_image(xml, Path::new("<bytes>"), &Identity, |_, _| Ok(()))
}
