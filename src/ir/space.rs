//! Coordinate space markers for [`BBox`](super::BBox).
//!
//! Boxes come out of the parsers in pixel space and only the record packager
//! moves them into normalized space, so the two never get mixed up by accident.

use std::fmt;

/// Absolute pixel coordinates, origin at the top-left corner of the owning image.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pixel {}

/// Coordinates divided by the owning image's width (x) or height (y).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub enum Normalized {}

impl fmt::Debug for Pixel {
    fn fmt(&self, _: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {}
    }
}

impl fmt::Debug for Normalized {
    fn fmt(&self, _: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {}
    }
}
