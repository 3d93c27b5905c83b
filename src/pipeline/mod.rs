//! Stage wiring and lifecycle control.
//!
//! Stages never know about each other's implementation. Each stage holds an
//! ordered list of downstream listeners and pushes every unit it produces to
//! all of them, in registration order, before handling its next input. The
//! three listener traits below are the only seams:
//!
//! - [`AnnotationListener`]: receives `(ImageAnnotation, [ObjectAnnotation])`
//!   units from a parser (image loader, label collector).
//! - [`AnnotatedImageListener`]: receives units together with their pixels
//!   (processing stages, packagers).
//! - [`PipelineStateListener`]: receives `start`/`stop` from [`Pipeline`].
//!
//! Stages that sit in more than one list (a packager is both an image listener
//! and a lifecycle listener) are held through [`Shared`] handles. Handles are
//! `Rc`-based, so a pipeline cannot be moved across threads.

mod loader;
mod source;

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use image::DynamicImage;
use log::{debug, error};

use crate::error::AnnopackError;
use crate::ir::{ImageAnnotation, ObjectAnnotation};

pub use loader::ImageLoader;
pub use source::ParseOnStart;

/// Shared, single-threaded handle to a pipeline stage.
pub type Shared<T> = Rc<RefCell<T>>;

/// Wraps a stage in a [`Shared`] handle.
pub fn shared<T>(stage: T) -> Shared<T> {
    Rc::new(RefCell::new(stage))
}

/// Notified with every complete annotation unit a parser produces.
pub trait AnnotationListener {
    fn on_annotation_available(
        &mut self,
        image: &ImageAnnotation,
        objects: &[ObjectAnnotation],
    ) -> Result<(), AnnopackError>;
}

/// Notified with an annotation unit and the pixels it describes.
///
/// The pixel buffer is shared by every listener of the same producer; a stage
/// that draws on it changes what later listeners see.
pub trait AnnotatedImageListener {
    fn on_annotated_image_available(
        &mut self,
        pixels: &mut DynamicImage,
        image: &ImageAnnotation,
        objects: &[ObjectAnnotation],
    ) -> Result<(), AnnopackError>;
}

/// Notified when the [`Pipeline`] starts and stops.
pub trait PipelineStateListener {
    fn on_pipeline_start(&mut self) -> Result<(), AnnopackError> {
        Ok(())
    }

    fn on_pipeline_stop(&mut self) -> Result<(), AnnopackError> {
        Ok(())
    }
}

/// Ordered downstream list of a parser.
pub type AnnotationListeners = Vec<Shared<dyn AnnotationListener>>;

/// Ordered downstream list of the image loader or a processing stage.
pub type AnnotatedImageListeners = Vec<Shared<dyn AnnotatedImageListener>>;

pub(crate) fn notify_annotation(
    listeners: &[Shared<dyn AnnotationListener>],
    image: &ImageAnnotation,
    objects: &[ObjectAnnotation],
) -> Result<(), AnnopackError> {
    for listener in listeners {
        listener
            .borrow_mut()
            .on_annotation_available(image, objects)?;
    }
    Ok(())
}

pub(crate) fn notify_annotated_image(
    listeners: &[Shared<dyn AnnotatedImageListener>],
    pixels: &mut DynamicImage,
    image: &ImageAnnotation,
    objects: &[ObjectAnnotation],
) -> Result<(), AnnopackError> {
    for listener in listeners {
        listener
            .borrow_mut()
            .on_annotated_image_available(pixels, image, objects)?;
    }
    Ok(())
}

/// Lifecycle of a [`Pipeline`]. `Stopped` is terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Running,
    Stopped,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PipelineState::Idle => "idle",
            PipelineState::Running => "running",
            PipelineState::Stopped => "stopped",
        })
    }
}

/// Delivers `start` and `stop` to lifecycle listeners in registration order.
///
/// Parsers do all of their work inside `start`, so by the time it returns
/// every unit has been pushed through the whole chain. `stop` lets packagers
/// flush and close and lets label maps get written.
pub struct Pipeline {
    listeners: Vec<Shared<dyn PipelineStateListener>>,
    state: PipelineState,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Pipeline {
    pub fn new() -> Self {
        Self {
            listeners: Vec::new(),
            state: PipelineState::Idle,
        }
    }

    pub fn with_listeners(listeners: Vec<Shared<dyn PipelineStateListener>>) -> Self {
        Self {
            listeners,
            state: PipelineState::Idle,
        }
    }

    pub fn register(&mut self, listener: Shared<dyn PipelineStateListener>) -> &mut Self {
        self.listeners.push(listener);
        self
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Notifies every listener of the start, stopping at the first error.
    ///
    /// The pipeline is `Running` even when a listener fails, so [`stop`]
    /// can still close whatever was opened.
    ///
    /// [`stop`]: Pipeline::stop
    pub fn start(&mut self) -> Result<(), AnnopackError> {
        self.expect_state(PipelineState::Idle, "start")?;
        self.state = PipelineState::Running;
        debug!("Starting.");
        for listener in &self.listeners {
            listener.borrow_mut().on_pipeline_start()?;
        }
        Ok(())
    }

    /// Notifies every listener of the stop.
    ///
    /// All listeners are called even if one fails; the first error is returned.
    pub fn stop(&mut self) -> Result<(), AnnopackError> {
        self.expect_state(PipelineState::Running, "stop")?;
        self.state = PipelineState::Stopped;
        debug!("Stopping.");
        let mut first_error = None;
        for listener in &self.listeners {
            if let Err(err) = listener.borrow_mut().on_pipeline_stop() {
                error!("stop listener failed: {err}");
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Starts and then always stops the pipeline, returning the first error.
    pub fn run(&mut self) -> Result<(), AnnopackError> {
        self.expect_state(PipelineState::Idle, "start")?;
        let started = self.start();
        let stopped = self.stop();
        started.and(stopped)
    }

    fn expect_state(
        &self,
        expected: PipelineState,
        action: &'static str,
    ) -> Result<(), AnnopackError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(AnnopackError::PipelineState {
                action,
                state: self.state,
            })
        }
    }
}
