//! Persistent settings: server connection, session credentials, and UI
//! preferences. YAML file under the platform config dir; unknown or
//! missing fields fall back to defaults so old files keep loading.

use std::fs;
use std::path::{Path, PathBuf};

use log::{error, info};
use serde::{Deserialize, Serialize};

pub const CURRENT_VERSION: u32 = 1;
const SETTINGS_FILENAME: &str = "config.yaml";
const APP_NAME: &str = "templot";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default = "default_server_url")]
    pub server_url: String,

    /// Django session cookie value; without it every probe redirects to
    /// login.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_cookie: Option<String>,

    /// CSRF token attached to every mutating request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub csrf_token: Option<String>,

    #[serde(default = "default_scale")]
    pub default_scale: f64,

    #[serde(default = "default_theme")]
    pub theme: String,

    #[serde(default = "default_true")]
    pub show_overlays: bool,
}

fn default_version() -> u32 {
    CURRENT_VERSION
}

fn default_server_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_scale() -> f64 {
    1.0
}

fn default_theme() -> String {
    "Oceanic Next".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            server_url: default_server_url(),
            session_cookie: None,
            csrf_token: None,
            default_scale: default_scale(),
            theme: default_theme(),
            show_overlays: true,
        }
    }
}

impl Settings {
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_NAME).join(SETTINGS_FILENAME))
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        let settings: Settings = serde_yaml::from_str(&content)?;
        Ok(settings)
    }

    /// Load from the given path, or the default location, or fall back
    /// to defaults. A broken file is logged and ignored, never fatal.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let path = match path {
            Some(p) => Some(p.to_path_buf()),
            None => Self::default_path(),
        };
        let Some(path) = path else {
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }
        match Self::load_from(&path) {
            Ok(settings) => {
                info!("loaded settings from {}", path.display());
                settings
            }
            Err(e) => {
                error!("failed to load settings from {}: {e}", path.display());
                Self::default()
            }
        }
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_yaml::to_string(self)?;
        fs::write(path, content)?;
        Ok(())
    }
}
