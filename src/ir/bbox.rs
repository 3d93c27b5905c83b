//! Axis-aligned boxes and the point-patch fit rule.

use std::marker::PhantomData;

use super::space::{Normalized, Pixel};

/// An axis-aligned box stored as `(xmin, xmax, ymin, ymax)`.
///
/// Construction does not check `xmin < xmax` / `ymin < ymax`. The parsers only
/// emit boxes that passed their filters; the CVAT reader passes source boxes
/// through untouched.
#[derive(Clone, Copy, PartialEq)]
pub struct BBox<TSpace> {
    xmin: f64,
    xmax: f64,
    ymin: f64,
    ymax: f64,
    _space: PhantomData<TSpace>,
}

impl<TSpace> BBox<TSpace> {
    #[inline]
    pub fn new(xmin: f64, xmax: f64, ymin: f64, ymax: f64) -> Self {
        Self {
            xmin,
            xmax,
            ymin,
            ymax,
            _space: PhantomData,
        }
    }

    #[inline]
    pub fn xmin(&self) -> f64 {
        self.xmin
    }

    #[inline]
    pub fn xmax(&self) -> f64 {
        self.xmax
    }

    #[inline]
    pub fn ymin(&self) -> f64 {
        self.ymin
    }

    #[inline]
    pub fn ymax(&self) -> f64 {
        self.ymax
    }

    /// May be negative for a malformed box.
    #[inline]
    pub fn width(&self) -> f64 {
        self.xmax - self.xmin
    }

    /// May be negative for a malformed box.
    #[inline]
    pub fn height(&self) -> f64 {
        self.ymax - self.ymin
    }

    /// Returns true if both axes are strictly ordered (min < max).
    #[inline]
    pub fn is_ordered(&self) -> bool {
        self.xmin < self.xmax && self.ymin < self.ymax
    }
}

impl BBox<Pixel> {
    /// Builds the fixed-size patch centred on a point.
    ///
    /// Half sizes use integer division, so an odd patch width of 5 yields a
    /// box 4 pixels wide.
    pub fn centered_patch(x: i64, y: i64, patch_width: u32, patch_height: u32) -> Self {
        let half_w = i64::from(patch_width / 2);
        let half_h = i64::from(patch_height / 2);
        Self::new(
            x.saturating_sub(half_w) as f64,
            x.saturating_add(half_w) as f64,
            y.saturating_sub(half_h) as f64,
            y.saturating_add(half_h) as f64,
        )
    }

    /// Patch-fit rule for point records: every edge must lie strictly inside
    /// the image. A box touching an edge is rejected.
    pub fn fits_strictly_within(&self, image_width: u32, image_height: u32) -> bool {
        self.xmin > 0.0
            && self.xmax < f64::from(image_width)
            && self.ymin > 0.0
            && self.ymax < f64::from(image_height)
    }

    /// The same box with its top-left corner moved to `(0, 0)`.
    pub fn rebased_to_origin(&self) -> Self {
        Self::new(0.0, self.width(), 0.0, self.height())
    }

    /// Divides x by `width` and y by `height`.
    pub fn to_normalized(&self, width: u32, height: u32) -> BBox<Normalized> {
        let w = f64::from(width);
        let h = f64::from(height);
        BBox::new(self.xmin / w, self.xmax / w, self.ymin / h, self.ymax / h)
    }
}

impl<TSpace> std::fmt::Debug for BBox<TSpace> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BBox")
            .field("xmin", &self.xmin)
            .field("xmax", &self.xmax)
            .field("ymin", &self.ymin)
            .field("ymax", &self.ymax)
            .finish()
    }
}
