//! Engine configuration.

use std::time::Duration;

/// Interval between background refresh ticks.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

/// Refresh fires once the ticks remaining until expiry fall to this value.
pub const DEFAULT_REFRESH_THRESHOLD_TICKS: i64 = 3;

/// Margin before expiry within which `get_session` refreshes eagerly.
/// Doubles as the fixed clock-skew tolerance.
pub const DEFAULT_EXPIRY_MARGIN: Duration = Duration::from_secs(10);

/// Main engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// API base URL, e.g. `https://api.latchkey.dev`.
    pub base_url: String,
    /// Application id, part of every endpoint path.
    pub app_id: String,
    /// Publishable API key (public, safe to expose).
    pub publishable_key: String,
    /// Background ticker interval.
    pub refresh_interval: Duration,
    /// Ticks-remaining threshold at which the ticker refreshes.
    pub refresh_threshold_ticks: i64,
    /// Eager-refresh margin before access expiry.
    pub expiry_margin: Duration,
    /// Persist session state; when off the engine runs on a no-op store.
    pub persistence: bool,
    /// Post failure telemetry for server errors.
    pub telemetry: bool,
    /// Run the background proactive-refresh ticker.
    pub proactive_refresh: bool,
    /// Re-fetch the session from the server when the host becomes visible.
    pub refetch_on_wake: bool,
}

impl EngineConfig {
    pub fn new(
        base_url: impl Into<String>,
        app_id: impl Into<String>,
        publishable_key: impl Into<String>,
    ) -> Self {
        let mut config = Self {
            base_url: base_url.into(),
            app_id: app_id.into(),
            publishable_key: publishable_key.into(),
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            refresh_threshold_ticks: DEFAULT_REFRESH_THRESHOLD_TICKS,
            expiry_margin: DEFAULT_EXPIRY_MARGIN,
            persistence: true,
            telemetry: false,
            proactive_refresh: true,
            refetch_on_wake: false,
        };
        config.load_from_env();
        config
    }

    /// Override toggles from the environment.
    fn load_from_env(&mut self) {
        if let Ok(url) = std::env::var("LATCHKEY_BASE_URL") {
            self.base_url = url;
        }
        if let Ok(v) = std::env::var("LATCHKEY_PERSISTENCE") {
            self.persistence = v != "0" && v.to_lowercase() != "false";
        }
        if let Ok(v) = std::env::var("LATCHKEY_TELEMETRY") {
            self.telemetry = v == "1" || v.to_lowercase() == "true";
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::new("https://api.test", "app-1", "pk_test");
        assert_eq!(config.refresh_interval, Duration::from_secs(30));
        assert_eq!(config.refresh_threshold_ticks, 3);
        assert_eq!(config.expiry_margin, Duration::from_secs(10));
        assert!(config.persistence);
        assert!(config.proactive_refresh);
        assert!(!config.telemetry);
    }
}
