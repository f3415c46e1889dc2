//! Crop window computation.
//!
//! The output image is a fixed `clip.width x clip.height` window over the page.
//! The window is pushed down and right just far enough that the element's
//! bottom-right corner is inside it. An element larger than the window keeps
//! its bottom-right edge and loses part of its top-left.

use crate::types::{ClipRectangle, ElementRect};
use crate::Viewport;

pub fn clip_rectangle(element: &ElementRect, clip: Viewport) -> ClipRectangle {
    let width = f64::from(clip.width);
    let height = f64::from(clip.height);

    ClipRectangle {
        top: (element.bottom() - height).max(0.0),
        left: (element.right() - width).max(0.0),
        width,
        height,
    }
}
