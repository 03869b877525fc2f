// SPDX-License-Identifier: GPL-3.0-only

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::constants::{app_info, defaults, rtsp};
use crate::errors::ConfigError;
use crate::pipelines::photo::ImageSettings;
use crate::pipelines::video::VideoSettings;

/// Streaming server and stream graph settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RtspConfig {
    /// Address the server binds to
    pub host: String,
    pub port: u16,
    /// H.264 encoder element
    pub encoder: String,
    /// Stream size; unset lets clients or the device decide
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl Default for RtspConfig {
    fn default() -> Self {
        Self {
            host: rtsp::DEFAULT_HOST.to_string(),
            port: rtsp::DEFAULT_PORT,
            encoder: rtsp::DEFAULT_ENCODER.to_string(),
            width: None,
            height: None,
        }
    }
}

impl RtspConfig {
    /// Configured stream size when both dimensions are set
    pub fn resolution(&self) -> Option<(u32, u32)> {
        self.width.zip(self.height)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub rtsp: RtspConfig,
    /// Still capture settings
    pub image: ImageSettings,
    /// Recording settings
    pub video: VideoSettings,
    pub image_location: PathBuf,
    pub video_location: PathBuf,
    /// Filesystem reported by storage queries
    pub storage_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rtsp: RtspConfig::default(),
            image: ImageSettings::default(),
            video: VideoSettings::default(),
            image_location: PathBuf::from(defaults::CAPTURE_LOCATION),
            video_location: PathBuf::from(defaults::CAPTURE_LOCATION),
            storage_path: PathBuf::from(defaults::STORAGE_PATH),
        }
    }
}

impl Config {
    /// `<config_dir>/camera-manager/config.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(app_info::CONFIG_DIR).join(app_info::CONFIG_FILE))
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&text)?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Load `path`, falling back to defaults when the file does not exist
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        match Self::load(path) {
            Err(ConfigError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No configuration file, using defaults");
                Ok(Self::default())
            }
            other => other,
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}
