//! Map and telemetry settings.
//!
//! Defaults live in code. An optional TOML file in the platform config
//! directory overrides them, and `FLEETMAP_API_URL` / `FLEETMAP_STREAM_URL`
//! override the endpoints last:
//! - macOS: ~/Library/Application Support/fleetmap/settings.toml
//! - Linux: ~/.config/fleetmap/settings.toml
//! - Windows: %APPDATA%\fleetmap\config\settings.toml

use anyhow::Context;
use bevy::prelude::*;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::map::effects::DEFAULT_PARTICLE_LIFETIME_MS;
use crate::map::input::DEFAULT_ZOOM_STEP;
use crate::map::motion::Easing;
use crate::map::trail::{DEFAULT_OLDER_CAPACITY, DEFAULT_RECENT_CAPACITY, TrailLimits};

pub const API_URL_ENV: &str = "FLEETMAP_API_URL";
pub const STREAM_URL_ENV: &str = "FLEETMAP_STREAM_URL";
const SETTINGS_FILE: &str = "settings.toml";

#[derive(Resource, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapSettings {
    pub api: ApiSettings,
    pub map: MapOptions,
    pub stream: StreamSettings,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    /// Base URL for the REST endpoints (`/waypoints`, `/health`).
    pub base_url: String,
    /// Websocket URL of the journey stream.
    pub stream_url: String,
    pub request_timeout_secs: u64,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8001".to_string(),
            stream_url: "ws://127.0.0.1:8001/ws/fleet".to_string(),
            request_timeout_secs: 10,
        }
    }
}

impl ApiSettings {
    pub fn waypoints_url(&self) -> String {
        format!("{}/waypoints", self.base_url.trim_end_matches('/'))
    }

    pub fn health_url(&self) -> String {
        format!("{}/health", self.base_url.trim_end_matches('/'))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

/// Camera, trail and animation tuning.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapOptions {
    /// Pixels kept free around the fitted bounds.
    pub padding_px: f64,
    pub min_scale: f64,
    pub max_scale: f64,
    /// Zoom factor per wheel notch.
    pub zoom_step: f64,
    pub recent_capacity: usize,
    pub older_capacity: usize,
    pub easing: Easing,
    pub particles: bool,
    pub particle_lifetime_ms: i64,
    pub hover_radius_px: f64,
    pub show_labels: bool,
}

impl Default for MapOptions {
    fn default() -> Self {
        Self {
            padding_px: 40.0,
            min_scale: 0.05,
            max_scale: 200.0,
            zoom_step: DEFAULT_ZOOM_STEP,
            recent_capacity: DEFAULT_RECENT_CAPACITY,
            older_capacity: DEFAULT_OLDER_CAPACITY,
            easing: Easing::default(),
            particles: true,
            particle_lifetime_ms: DEFAULT_PARTICLE_LIFETIME_MS,
            hover_radius_px: 14.0,
            show_labels: true,
        }
    }
}

impl MapOptions {
    pub fn trail_limits(&self) -> TrailLimits {
        TrailLimits {
            recent: self.recent_capacity.max(1),
            older: self.older_capacity,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamSettings {
    pub reconnect_initial_ms: u64,
    pub reconnect_max_ms: u64,
    /// Probe `/health` before opening the stream.
    pub health_check: bool,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            reconnect_initial_ms: 500,
            reconnect_max_ms: 30_000,
            health_check: true,
        }
    }
}

impl MapSettings {
    /// Load from the platform config directory and the environment.
    /// A missing file is not an error; an unreadable or invalid one is.
    pub fn load() -> anyhow::Result<Self> {
        let path = settings_path();
        Self::load_from(path.as_deref(), |key| std::env::var(key).ok())
    }

    pub fn load_from<F>(path: Option<&Path>, env: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = match path {
            Some(path) if path.exists() => {
                let contents = fs::read_to_string(path)
                    .with_context(|| format!("read settings {}", path.display()))?;
                toml::from_str::<MapSettings>(&contents)
                    .with_context(|| format!("parse settings {}", path.display()))?
            }
            _ => MapSettings::default(),
        };

        if let Some(url) = env(API_URL_ENV).filter(|v| !v.trim().is_empty()) {
            settings.api.base_url = url.trim().to_string();
        }
        if let Some(url) = env(STREAM_URL_ENV).filter(|v| !v.trim().is_empty()) {
            settings.api.stream_url = url.trim().to_string();
        }
        Ok(settings)
    }
}

pub fn settings_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "fleetmap").map(|dirs| dirs.config_dir().join(SETTINGS_FILE))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn unique_temp_dir(test_name: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let dir = std::env::temp_dir().join(format!(
            "fleetmap-config-{}-{}-{}",
            test_name,
            std::process::id(),
            nanos
        ));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = unique_temp_dir("missing");
        let settings = MapSettings::load_from(Some(&dir.join("nope.toml")), no_env).unwrap();
        assert_eq!(settings, MapSettings::default());
        assert_eq!(settings.map.recent_capacity, 5);
        assert_eq!(settings.map.min_scale, 0.05);
        assert_eq!(settings.map.max_scale, 200.0);
    }

    #[test]
    fn partial_file_overrides_only_given_keys() {
        let dir = unique_temp_dir("partial");
        let path = dir.join(SETTINGS_FILE);
        fs::write(
            &path,
            r#"
[api]
base_url = "http://fleet.local:9000/"

[map]
easing = "linear"
older_capacity = 50
"#,
        )
        .unwrap();

        let settings = MapSettings::load_from(Some(&path), no_env).unwrap();
        assert_eq!(settings.api.waypoints_url(), "http://fleet.local:9000/waypoints");
        assert_eq!(settings.api.health_url(), "http://fleet.local:9000/health");
        assert_eq!(settings.map.easing, Easing::Linear);
        assert_eq!(settings.map.older_capacity, 50);
        assert_eq!(settings.map.padding_px, 40.0);
        assert_eq!(settings.stream, StreamSettings::default());
    }

    #[test]
    fn invalid_file_is_an_error() {
        let dir = unique_temp_dir("invalid");
        let path = dir.join(SETTINGS_FILE);
        fs::write(&path, "[map]\neasing = 12\n").unwrap();
        assert!(MapSettings::load_from(Some(&path), no_env).is_err());
    }

    #[test]
    fn environment_overrides_endpoints() {
        let settings = MapSettings::load_from(None, |key| match key {
            API_URL_ENV => Some(" http://api:1 ".to_string()),
            STREAM_URL_ENV => Some("ws://api:1/ws/fleet".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(settings.api.base_url, "http://api:1");
        assert_eq!(settings.api.stream_url, "ws://api:1/ws/fleet");
    }

    #[test]
    fn blank_environment_is_ignored() {
        let settings =
            MapSettings::load_from(None, |_| Some("   ".to_string())).unwrap();
        assert_eq!(settings.api, ApiSettings::default());
    }

    #[test]
    fn trail_limits_never_zero_recent() {
        let options = MapOptions {
            recent_capacity: 0,
            ..MapOptions::default()
        };
        assert_eq!(options.trail_limits().recent, 1);
    }
}
