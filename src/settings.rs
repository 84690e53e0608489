use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};
use tracing::{debug, info};

use crate::{
    consts::{
        APP_DIR_NAME, DEFAULT_AUTHORIZATION_ENDPOINT, DEFAULT_CLIENT_ID, DEFAULT_REDIRECT_URI,
        DEFAULT_SCOPES, DEFAULT_SERVER, MAX_BACKOFF_SECS, MAX_RECONNECT_ATTEMPTS,
        POLL_CHECK_INTERVAL_MS, RECONNECT_LINE_THRESHOLD, SETTINGS_FILE_NAME,
    },
    error::{Error, Result},
    util::write_private_file,
};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub server: String,
    pub authorization_endpoint: String,
    pub redirect_uri: String,
    pub client_id: String,
    pub scopes: String,
    pub poll_check_interval_ms: u64,
    pub reconnect_line_threshold: usize,
    pub max_reconnect_attempts: u32,
    pub max_backoff_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: DEFAULT_SERVER.to_string(),
            authorization_endpoint: DEFAULT_AUTHORIZATION_ENDPOINT.to_string(),
            redirect_uri: DEFAULT_REDIRECT_URI.to_string(),
            client_id: DEFAULT_CLIENT_ID.to_string(),
            scopes: DEFAULT_SCOPES.to_string(),
            poll_check_interval_ms: POLL_CHECK_INTERVAL_MS,
            reconnect_line_threshold: RECONNECT_LINE_THRESHOLD,
            max_reconnect_attempts: MAX_RECONNECT_ATTEMPTS,
            max_backoff_secs: MAX_BACKOFF_SECS,
        }
    }
}

impl Settings {
    /// Validates URLs and clamps poll tuning to usable values.
    pub fn normalized(mut self) -> Result<Self> {
        self.server = normalize_base_url(&self.server)?;
        self.authorization_endpoint = normalize_endpoint(&self.authorization_endpoint)?;
        self.redirect_uri = normalize_endpoint(&self.redirect_uri)?;
        if self.client_id.trim().is_empty() {
            return Err(Error::Config("client_id is required".to_string()));
        }
        self.client_id = self.client_id.trim().to_string();
        self.scopes = self.scopes.split_whitespace().collect::<Vec<_>>().join(" ");
        self.poll_check_interval_ms = self.poll_check_interval_ms.max(10);
        self.reconnect_line_threshold = self.reconnect_line_threshold.max(1);
        self.max_backoff_secs = self.max_backoff_secs.max(1);
        Ok(self)
    }

    pub fn poll_check_interval(&self) -> Duration {
        Duration::from_millis(self.poll_check_interval_ms)
    }
}

pub fn default_config_dir() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|dir| dir.join(APP_DIR_NAME))
        .ok_or_else(|| Error::Config("Failed to resolve config directory".to_string()))
}

pub fn default_settings_path() -> Result<PathBuf> {
    Ok(default_config_dir()?.join(SETTINGS_FILE_NAME))
}

pub fn read_settings(path: &Path) -> Result<Settings> {
    if !path.exists() {
        debug!("read_settings: {path:?} not found, using defaults");
        return Settings::default().normalized();
    }

    let content = fs::read_to_string(path)?;
    let settings = serde_json::from_str::<Settings>(&content)?;
    debug!("read_settings: loaded {path:?} server={:?}", settings.server);
    settings.normalized()
}

/// Reads `path`, writing the defaults there first if it does not exist yet.
pub fn load_or_init_settings(path: &Path) -> Result<Settings> {
    if path.exists() {
        return read_settings(path);
    }
    let settings = Settings::default().normalized()?;
    save_settings(path, &settings)?;
    info!("wrote default settings to {path:?}");
    Ok(settings)
}

pub fn save_settings(path: &Path, settings: &Settings) -> Result<()> {
    let content = serde_json::to_string_pretty(settings)?;
    write_private_file(path, &content)?;
    Ok(())
}

pub fn normalize_base_url(input: &str) -> Result<String> {
    let trimmed = input.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(Error::Config("Server URL is required".to_string()));
    }
    check_http_url(trimmed)?;
    Ok(trimmed.to_string())
}

fn normalize_endpoint(input: &str) -> Result<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(Error::Config("Endpoint URL is required".to_string()));
    }
    check_http_url(trimmed)?;
    Ok(trimmed.to_string())
}

fn check_http_url(input: &str) -> Result<()> {
    let url = reqwest::Url::parse(input)
        .map_err(|error| Error::Config(format!("Invalid URL {input:?}: {error}")))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        _ => Err(Error::Config(format!(
            "URL must start with http:// or https://: {input}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_trailing_slash() {
        assert_eq!(
            normalize_base_url(" https://api.test/ ").unwrap(),
            "https://api.test"
        );
    }

    #[test]
    fn normalize_rejects_other_schemes() {
        assert!(matches!(
            normalize_base_url("ftp://api.test"),
            Err(Error::Config(_))
        ));
        assert!(matches!(normalize_base_url("   "), Err(Error::Config(_))));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = read_settings(&dir.path().join("settings.json")).unwrap();
        assert_eq!(settings.server, DEFAULT_SERVER);
        assert_eq!(settings.reconnect_line_threshold, 100);
        assert_eq!(settings.poll_check_interval(), Duration::from_secs(1));
    }

    #[test]
    fn partial_file_keeps_defaults_for_missing_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(
            &path,
            r#"{"server":"https://crest.test/","scopes":"  a   b "}"#,
        )
        .unwrap();

        let settings = read_settings(&path).unwrap();
        assert_eq!(settings.server, "https://crest.test");
        assert_eq!(settings.scopes, "a b");
        assert_eq!(settings.client_id, DEFAULT_CLIENT_ID);
    }

    #[test]
    fn first_load_writes_defaults_then_keeps_edits() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app").join("settings.json");

        let first = load_or_init_settings(&path).unwrap();
        assert_eq!(first, Settings::default().normalized().unwrap());
        assert!(path.exists());

        fs::write(&path, r#"{"client_id":"other"}"#).unwrap();
        let second = load_or_init_settings(&path).unwrap();
        assert_eq!(second.client_id, "other");
    }

    #[test]
    fn save_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let settings = Settings {
            max_reconnect_attempts: 3,
            ..Settings::default()
        };
        save_settings(&path, &settings).unwrap();
        assert_eq!(read_settings(&path).unwrap().max_reconnect_attempts, 3);
    }
}
