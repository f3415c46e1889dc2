use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::ParseError;

/// Which poll phase of the element locator gave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LocatePhase {
    Iframe,
    NativeImages,
    PaneWrapper,
    PaneLink,
    PaneImages,
}

impl std::fmt::Display for LocatePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LocatePhase::Iframe => "iframe tag",
            LocatePhase::NativeImages => "native ad images",
            LocatePhase::PaneWrapper => "multi-pane wrapper",
            LocatePhase::PaneLink => "multi-pane link",
            LocatePhase::PaneImages => "multi-pane images",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("Screenshot for placement {placement_id} / creative group {creative_group_id} was created recently")]
    Throttled {
        placement_id: String,
        creative_group_id: String,
    },

    #[error("Resolution failed: {0}")]
    ResolutionFailed(String),

    #[error("Navigation failed: {0}")]
    NavigationFailed(String),

    #[error("Unable to find {phase}: {detail}")]
    ElementNotFound { phase: LocatePhase, detail: String },

    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Persisting screenshot metadata failed: {0}")]
    PersistFailed(String),

    #[error("Browser launch failed: {0}")]
    SessionLaunch(String),

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Request deadline elapsed during {0}")]
    Cancelled(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] ParseError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl CaptureError {
    pub fn not_found(phase: LocatePhase, detail: impl Into<String>) -> Self {
        CaptureError::ElementNotFound {
            phase,
            detail: detail.into(),
        }
    }

    pub fn browser(message: impl std::fmt::Display) -> Self {
        CaptureError::Browser(message.to_string())
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            CaptureError::Throttled { .. } => ErrorCategory::Throttled,
            CaptureError::ResolutionFailed(_) => ErrorCategory::Resolution,
            CaptureError::NavigationFailed(_) | CaptureError::InvalidUrl(_) => {
                ErrorCategory::Navigation
            }
            CaptureError::ElementNotFound { .. } => ErrorCategory::Locate,
            CaptureError::Cancelled(_) => ErrorCategory::Navigation,
            CaptureError::UploadFailed(_) => ErrorCategory::Upload,
            CaptureError::PersistFailed(_) => ErrorCategory::Persist,
            CaptureError::SessionLaunch(_) | CaptureError::Browser(_) => ErrorCategory::Browser,
            CaptureError::Io(_) | CaptureError::Serialization(_) => ErrorCategory::Io,
            CaptureError::Config(_) => ErrorCategory::Config,
        }
    }

    /// Expected outcomes are logged at warn, everything else at error.
    pub fn is_expected(&self) -> bool {
        matches!(self, CaptureError::Throttled { .. })
    }

    pub fn to_payload(&self) -> ErrorPayload {
        ErrorPayload {
            category: self.category(),
            message: self.to_string(),
            expected: self.is_expected(),
        }
    }
}

impl From<crate::config::ConfigError> for CaptureError {
    fn from(err: crate::config::ConfigError) -> Self {
        CaptureError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CaptureError>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    Throttled,
    Resolution,
    Navigation,
    Locate,
    Upload,
    Persist,
    Browser,
    Config,
    Io,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    pub category: ErrorCategory,
    pub message: String,
    pub expected: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn throttled_is_the_only_expected_outcome() {
        let throttled = CaptureError::Throttled {
            placement_id: "p1".to_string(),
            creative_group_id: "c1".to_string(),
        };
        assert!(throttled.is_expected());
        assert_eq!(throttled.category(), ErrorCategory::Throttled);

        let not_found = CaptureError::not_found(LocatePhase::Iframe, "pid p1");
        assert!(!not_found.is_expected());
        assert_eq!(not_found.category(), ErrorCategory::Locate);
    }

    #[test]
    fn not_found_message_names_the_phase() {
        let err = CaptureError::not_found(LocatePhase::PaneLink, "pid=p1 crgid=c1");
        assert_eq!(
            err.to_string(),
            "Unable to find multi-pane link: pid=p1 crgid=c1"
        );
    }

    #[test]
    fn cancellation_counts_as_navigation_failure() {
        let err = CaptureError::Cancelled("element polling".to_string());
        assert_eq!(err.category(), ErrorCategory::Navigation);
        assert!(err.to_string().contains("element polling"));
    }

    #[test]
    fn payload_serializes_lowercase_category() {
        let payload = CaptureError::UploadFailed("503".to_string()).to_payload();
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["category"], "upload");
        assert_eq!(json["expected"], false);
    }
}
