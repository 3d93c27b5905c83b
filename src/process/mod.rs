//! Processing stages that sit between the image loader and the packagers.

mod crop;
mod render;

pub use crop::{indexed_path, CropPolicy, CropStage, DeclaredSize};
pub use render::{load_font, RenderStage};
