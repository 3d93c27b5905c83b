use std::path::PathBuf;

use log::info;

use super::{PipelineStateListener, Shared};
use crate::error::AnnopackError;
use crate::ir::AnnotationFileParser;

/// Runs a parser over one annotation file when the pipeline starts.
///
/// Parsing is synchronous and produces every downstream effect, so the whole
/// dataset has gone through the chain by the time `start` returns.
pub struct ParseOnStart {
    parser: Shared<dyn AnnotationFileParser>,
    source: PathBuf,
}

impl ParseOnStart {
    pub fn new(parser: Shared<dyn AnnotationFileParser>, source: impl Into<PathBuf>) -> Self {
        Self {
            parser,
            source: source.into(),
        }
    }
}

impl PipelineStateListener for ParseOnStart {
    fn on_pipeline_start(&mut self) -> Result<(), AnnopackError> {
        let mut parser = self.parser.borrow_mut();
        parser.parse(&self.source)?;
        let stats = parser.stats();
        info!(
            "{}: {} images, {} units, {} boxes kept, {} rejected",
            self.source.display(),
            stats.images,
            stats.units_emitted,
            stats.boxes_accepted,
            stats.boxes_rejected
        );
        Ok(())
    }
}
