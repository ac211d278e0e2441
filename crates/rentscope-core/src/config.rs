use std::time::Duration;

use serde::Deserialize;

use crate::fetch::FetchPolicy;
use crate::geo::{DEFAULT_CENTER, DEFAULT_RADIUS_MILES};
use crate::models::{CoreError, LatLng, MAX_RADIUS_MILES, MIN_RADIUS_MILES, Operation};

/// Where saved searches and history live.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LibraryBackend {
    /// Host storage (SQLite).
    #[default]
    Local,
    /// The remote `/saved-searches` and `/search-history` endpoints.
    Remote,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub base_url: String,
    /// Bearer token obtained by the host; sent verbatim when present.
    pub auth_token: Option<String>,
    pub request_timeout_ms: u64,
    pub suggestion_debounce_ms: u64,
    pub suggestion_min_chars: usize,
    pub max_suggestions: usize,
    pub history_limit: usize,
    pub default_center: LatLng,
    pub default_radius_miles: f64,
    pub list_stale_after_ms: u64,
    pub dashboard_stale_after_ms: u64,
    pub library_backend: LibraryBackend,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000/api".to_string(),
            auth_token: None,
            request_timeout_ms: 10_000,
            suggestion_debounce_ms: 300,
            suggestion_min_chars: 2,
            max_suggestions: 8,
            history_limit: 50,
            default_center: DEFAULT_CENTER,
            default_radius_miles: DEFAULT_RADIUS_MILES,
            list_stale_after_ms: 0,
            dashboard_stale_after_ms: 60_000,
            library_backend: LibraryBackend::Local,
        }
    }
}

impl EngineConfig {
    pub fn from_json(raw: &str) -> Result<Self, CoreError> {
        let config: Self = serde_json::from_str(raw)
            .map_err(|error| invalid(format!("invalid engine config: {error}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.base_url.trim().is_empty() {
            return Err(invalid("base_url must not be empty"));
        }
        if self.request_timeout_ms == 0 {
            return Err(invalid("request_timeout_ms must be positive"));
        }
        if self.suggestion_min_chars == 0 {
            return Err(invalid("suggestion_min_chars must be at least 1"));
        }
        if self.max_suggestions == 0 {
            return Err(invalid("max_suggestions must be at least 1"));
        }
        if self.history_limit == 0 {
            return Err(invalid("history_limit must be at least 1"));
        }
        if !self.default_center.is_valid() {
            return Err(invalid("default_center is not a valid coordinate"));
        }
        if !(MIN_RADIUS_MILES..=MAX_RADIUS_MILES).contains(&self.default_radius_miles) {
            return Err(invalid(format!(
                "default_radius_miles must be within [{MIN_RADIUS_MILES}, {MAX_RADIUS_MILES}]"
            )));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn suggestion_debounce(&self) -> Duration {
        Duration::from_millis(self.suggestion_debounce_ms)
    }

    /// Policy for the list and map views.
    pub fn list_policy(&self) -> FetchPolicy {
        FetchPolicy::tolerant(Duration::from_millis(self.list_stale_after_ms))
    }

    /// Policy for dashboard-style views that tolerate older data.
    pub fn dashboard_policy(&self) -> FetchPolicy {
        FetchPolicy::tolerant(Duration::from_millis(self.dashboard_stale_after_ms))
    }
}

fn invalid(message: impl Into<String>) -> CoreError {
    CoreError::invalid_input(Operation::Configure, message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CoreErrorKind;

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config =
            EngineConfig::from_json(r#"{"base_url":"https://rent.example/api","history_limit":20}"#)
                .unwrap();
        assert_eq!(config.base_url, "https://rent.example/api");
        assert_eq!(config.history_limit, 20);
        assert_eq!(config.suggestion_debounce_ms, 300);
        assert_eq!(config.max_suggestions, 8);
        assert_eq!(config.library_backend, LibraryBackend::Local);
    }

    #[test]
    fn out_of_range_default_radius_is_rejected() {
        let error = EngineConfig::from_json(r#"{"default_radius_miles":80}"#).unwrap_err();
        assert_eq!(error.kind, CoreErrorKind::InvalidInput);
        assert_eq!(error.operation, Some(Operation::Configure));
    }

    #[test]
    fn malformed_json_is_invalid_input() {
        let error = EngineConfig::from_json("{not json").unwrap_err();
        assert_eq!(error.kind, CoreErrorKind::InvalidInput);
    }
}
