use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

use crate::types::ElementRect;

/// Pixel dimensions used both for the browser window and the output clip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1024,
            height: 768,
        }
    }
}

impl Viewport {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Whether an element of this size fits inside the window without cropping.
    pub fn fits(&self, rect: &ElementRect) -> bool {
        rect.width <= f64::from(self.width) && rect.height <= f64::from(self.height)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ViewportParseError {
    #[error("Invalid dimensions '{0}': expected WIDTHxHEIGHT (e.g., 1024x768)")]
    InvalidFormat(String),
    #[error("Invalid {axis}: '{value}'")]
    InvalidNumber { axis: &'static str, value: String },
    #[error("Dimensions must be positive")]
    Zero,
}

impl FromStr for Viewport {
    type Err = ViewportParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (w, h) = s
            .trim()
            .split_once(['x', 'X'])
            .ok_or_else(|| ViewportParseError::InvalidFormat(s.to_string()))?;

        let parse = |axis: &'static str, value: &str| {
            value
                .trim()
                .parse::<u32>()
                .map_err(|_| ViewportParseError::InvalidNumber {
                    axis,
                    value: value.trim().to_string(),
                })
        };
        let width = parse("width", w)?;
        let height = parse("height", h)?;

        if width == 0 || height == 0 {
            return Err(ViewportParseError::Zero);
        }

        Ok(Viewport { width, height })
    }
}

impl std::fmt::Display for Viewport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_dimensions() {
        let vp: Viewport = "1024x768".parse().unwrap();
        assert_eq!(vp, Viewport::new(1024, 768));
        let vp: Viewport = " 300 X 250 ".parse().unwrap();
        assert_eq!(vp, Viewport::new(300, 250));
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(matches!(
            "1024".parse::<Viewport>(),
            Err(ViewportParseError::InvalidFormat(_))
        ));
        assert!(matches!(
            "1024x7x1".parse::<Viewport>(),
            Err(ViewportParseError::InvalidNumber { axis: "height", .. })
        ));
        assert_eq!("0x768".parse::<Viewport>(), Err(ViewportParseError::Zero));
    }

    #[test]
    fn default_matches_output_window() {
        assert_eq!(Viewport::default().to_string(), "1024x768");
    }

    #[test]
    fn fits_compares_both_axes() {
        let vp = Viewport::new(300, 250);
        assert!(vp.fits(&ElementRect::new(500.0, 500.0, 300.0, 250.0)));
        assert!(!vp.fits(&ElementRect::new(0.0, 0.0, 301.0, 10.0)));
    }
}
