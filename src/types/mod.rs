//! Core data types for the capture pipeline.
//!
//! - [`request`] - inbound capture messages and accepted requests
//! - [`geometry`] - element and clip rectangles
//! - [`record`] - capture results and persisted screenshot records

pub mod geometry;
pub mod record;
pub mod request;

pub use geometry::{ClipRectangle, ElementRect};
pub use record::{CaptureResult, PlacementMetadata, ResolvedPlacement, ScreenshotRecord};
pub use request::{CaptureMessage, CaptureRequest, LocateTarget, MessageParseError, PlacementKind};

pub use crate::viewport::Viewport;
