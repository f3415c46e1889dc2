//! Rectangles reported by the page and applied to screenshots.

use serde::{Deserialize, Serialize};

/// Bounding rectangle of an element, in page coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementRect {
    pub top: f64,
    pub left: f64,
    pub width: f64,
    pub height: f64,
}

impl ElementRect {
    pub fn new(top: f64, left: f64, width: f64, height: f64) -> Self {
        Self {
            top,
            left,
            width,
            height,
        }
    }

    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }

    pub fn right(&self) -> f64 {
        self.left + self.width
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    /// Smallest rectangle covering both.
    pub fn union(&self, other: &ElementRect) -> ElementRect {
        let top = self.top.min(other.top);
        let left = self.left.min(other.left);
        ElementRect {
            top,
            left,
            width: self.right().max(other.right()) - left,
            height: self.bottom().max(other.bottom()) - top,
        }
    }
}

/// Crop window applied to the page screenshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClipRectangle {
    pub top: f64,
    pub left: f64,
    pub width: f64,
    pub height: f64,
}

impl ClipRectangle {
    pub fn contains(&self, rect: &ElementRect) -> bool {
        rect.top >= self.top
            && rect.left >= self.left
            && rect.bottom() <= self.top + self.height
            && rect.right() <= self.left + self.width
    }
}
