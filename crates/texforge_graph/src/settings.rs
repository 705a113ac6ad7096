// SPDX-License-Identifier: MIT OR Apache-2.0
//! Engine settings stored as RON.

use crate::device::ImageFormat;
use crate::error::SettingsError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Current settings format version
pub const SETTINGS_FORMAT_VERSION: u32 = 1;

/// Default settings file name
pub const SETTINGS_FILE_NAME: &str = "texforge.ron";

/// Settings that shape device resources and waits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Settings format version
    pub version: u32,
    /// Width and height of image node outputs
    #[serde(default = "default_output_size")]
    pub output_size: u32,
    /// Format for kernels without a native format
    #[serde(default)]
    pub default_format: ImageFormat,
    /// Upper bound on blocking fence waits
    #[serde(default = "default_fence_timeout_ms")]
    pub fence_timeout_ms: u64,
}

fn default_output_size() -> u32 {
    1024
}

fn default_fence_timeout_ms() -> u64 {
    5_000
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            version: SETTINGS_FORMAT_VERSION,
            output_size: default_output_size(),
            default_format: ImageFormat::default(),
            fence_timeout_ms: default_fence_timeout_ms(),
        }
    }
}

impl EngineSettings {
    /// Fence timeout as a duration
    pub fn fence_timeout(&self) -> Duration {
        Duration::from_millis(self.fence_timeout_ms)
    }

    /// Load settings from a file
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let content = std::fs::read_to_string(path)?;
        let settings: EngineSettings = ron::from_str(&content)?;

        if settings.version > SETTINGS_FORMAT_VERSION {
            return Err(SettingsError::UnsupportedVersion {
                found: settings.version,
                supported: SETTINGS_FORMAT_VERSION,
            });
        }

        tracing::info!(path = %path.display(), "Loaded engine settings");
        Ok(settings)
    }

    /// Save settings to a file
    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        let config = ron::ser::PrettyConfig::default()
            .struct_names(true)
            .enumerate_arrays(false);
        let content = ron::ser::to_string_pretty(self, config)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Settings file path inside a directory
    pub fn file_path(dir: &Path) -> PathBuf {
        dir.join(SETTINGS_FILE_NAME)
    }
}
