use std::path::Path;
use std::time::Duration;

use adshot_lib::{CaptureError, Config};

use crate::cli::ConfigOverrides;

/// Load config, then layer environment variables and CLI flags on top.
/// Priority: CLI flags > ADSHOT_* env > config file > defaults
pub fn load_config(path: Option<&Path>, overrides: &ConfigOverrides) -> Result<Config, CaptureError> {
    let mut cfg = Config::load(path)?;
    cfg.apply_env()?;
    apply_cli_overrides(&mut cfg, overrides);

    cfg.validate().map_err(|e| {
        let msg = path
            .map(|p| format!("{} ({})", e, p.display()))
            .unwrap_or_else(|| e.to_string());
        CaptureError::Config(msg)
    })?;
    Ok(cfg)
}

pub fn apply_cli_overrides(cfg: &mut Config, overrides: &ConfigOverrides) {
    if let Some(max) = overrides.max_concurrent {
        cfg.max_concurrent_sessions = max;
    }
    if let Some(viewport) = overrides.viewport {
        cfg.viewport = viewport;
    }
    if let Some(clip) = overrides.clip {
        cfg.clip = clip;
    }
    if let Some(ms) = overrides.nav_timeout_ms {
        cfg.navigation_timeout = Duration::from_millis(ms);
    }
    if let Some(secs) = overrides.max_lifetime_secs {
        cfg.session_max_lifetime = Duration::from_secs(secs);
    }
    if let Some(agent) = &overrides.user_agent {
        cfg.user_agent = agent.clone();
    }
    if let Some(retries) = overrides.poll_retries {
        cfg.poll_retry_count = retries;
    }
    if let Some(ms) = overrides.poll_interval_ms {
        cfg.poll_interval = Duration::from_millis(ms);
    }
    if let Some(dir) = &overrides.screenshot_dir {
        cfg.screenshot_dir = dir.clone();
    }
    if let Some(chrome) = &overrides.chrome {
        cfg.browser.chrome_path = Some(chrome.clone());
    }
    if overrides.headful {
        cfg.browser.headless = false;
    }
}

/// Single-line summary of the settings that shape a capture.
pub fn format_effective_config(cfg: &Config, config_source: Option<&Path>) -> String {
    let source = config_source
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "defaults".to_string());
    format!(
        "Effective config [{source}]: sessions={}, lifetime={}s, nav={}ms, viewport={}, clip={}, poll={}x{}ms, expiration={}h, headless={}",
        cfg.max_concurrent_sessions,
        cfg.session_max_lifetime.as_secs(),
        cfg.navigation_timeout.as_millis(),
        cfg.viewport,
        cfg.clip,
        cfg.poll_retry_count,
        cfg.poll_interval.as_millis(),
        cfg.screenshot_expiration_hours,
        cfg.browser.headless,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use adshot_lib::Viewport;
    use std::path::PathBuf;

    #[test]
    fn cli_flags_win_over_config() {
        let mut cfg = Config::default();
        let overrides = ConfigOverrides {
            max_concurrent: Some(2),
            clip: Some(Viewport::new(300, 250)),
            nav_timeout_ms: Some(1500),
            poll_retries: Some(3),
            screenshot_dir: Some(PathBuf::from("/tmp/shots")),
            headful: true,
            ..ConfigOverrides::default()
        };

        apply_cli_overrides(&mut cfg, &overrides);

        assert_eq!(cfg.max_concurrent_sessions, 2);
        assert_eq!(cfg.clip, Viewport::new(300, 250));
        assert_eq!(cfg.viewport, Viewport::default());
        assert_eq!(cfg.navigation_timeout, Duration::from_millis(1500));
        assert_eq!(cfg.poll_retry_count, 3);
        assert_eq!(cfg.screenshot_dir, PathBuf::from("/tmp/shots"));
        assert!(!cfg.browser.headless);
    }

    #[test]
    fn absent_flags_keep_config() {
        let mut cfg = Config {
            max_concurrent_sessions: 9,
            ..Config::default()
        };
        apply_cli_overrides(&mut cfg, &ConfigOverrides::default());
        assert_eq!(cfg.max_concurrent_sessions, 9);
        assert!(cfg.browser.headless);
    }

    #[test]
    fn invalid_result_is_a_config_error() {
        let overrides = ConfigOverrides {
            max_concurrent: Some(0),
            ..ConfigOverrides::default()
        };
        let err = load_config(None, &overrides).unwrap_err();
        assert!(matches!(err, CaptureError::Config(_)));
        assert!(err.to_string().contains("max_concurrent_sessions"));
    }

    #[test]
    fn format_effective_config_includes_key_fields() {
        let summary = format_effective_config(&Config::default(), Some(Path::new("adshot.toml")));
        assert!(summary.contains("sessions=5"));
        assert!(summary.contains("clip=1024x768"));
        assert!(summary.contains("poll=20x500ms"));
        assert!(summary.contains("adshot.toml"));
    }
}
