use adshot_lib::{CaptureError, ConfigError, ErrorCategory, LocatePhase};

#[test]
fn config_error_display_includes_message() {
    let err = CaptureError::Config("missing upload endpoint".to_string());

    assert_eq!(
        format!("{}", err),
        "Configuration error: missing upload endpoint"
    );
}

#[test]
fn io_error_display_wraps_source() {
    let io_err = std::io::Error::other("disk full");
    let err: CaptureError = io_err.into();
    let rendered = format!("{}", err);

    assert!(rendered.starts_with("IO error: "));
    assert!(rendered.contains("disk full"));
}

#[test]
fn throttled_names_both_ids() {
    let err = CaptureError::Throttled {
        placement_id: "p-17".to_string(),
        creative_group_id: "crg-4".to_string(),
    };

    assert_eq!(
        format!("{}", err),
        "Screenshot for placement p-17 / creative group crg-4 was created recently"
    );
}

#[test]
fn not_found_helper_names_phase_and_detail() {
    let err = CaptureError::not_found(LocatePhase::NativeImages, "2 images after 20 attempts");

    assert_eq!(
        format!("{}", err),
        "Unable to find native ad images: 2 images after 20 attempts"
    );
    assert_eq!(err.category(), ErrorCategory::Locate);
}

#[test]
fn config_errors_convert_with_their_message() {
    let err: CaptureError = ConfigError::Invalid("clip must be non-zero".to_string()).into();

    assert_eq!(
        format!("{}", err),
        "Configuration error: Invalid config: clip must be non-zero"
    );
}

#[test]
fn url_parse_errors_are_navigation_failures() {
    let err: CaptureError = url::Url::parse("http://").unwrap_err().into();

    assert!(format!("{}", err).starts_with("Invalid URL: "));
    assert_eq!(err.category(), ErrorCategory::Navigation);
}
