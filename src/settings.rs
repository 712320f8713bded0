//! Persistent settings for the console.

use crate::api::DEFAULT_API_BASE;
use crate::lineage::layout::{HORIZONTAL_COMPRESSION_FACTOR, VERTICAL_SPACING_FACTOR};
use crate::lineage::{ChildOrder, LineageConfig, ModelGroupId, TreeLayout};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};

/// All persistable console settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    // Service
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    // Layout
    #[serde(default = "default_vertical_spacing")]
    pub vertical_spacing: f32,
    #[serde(default = "default_horizontal_compression")]
    pub horizontal_compression: f32,
    #[serde(default)]
    pub child_order: ChildOrder,

    // Display
    #[serde(default = "default_node_radius")]
    pub node_radius: f32,

    // Continue to train
    #[serde(default)]
    pub default_task: i64,

    // Data selection
    #[serde(default)]
    pub last_model_group: Option<ModelGroupId>,
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE.to_string()
}

fn default_vertical_spacing() -> f32 {
    VERTICAL_SPACING_FACTOR
}

fn default_horizontal_compression() -> f32 {
    HORIZONTAL_COMPRESSION_FACTOR
}

fn default_node_radius() -> f32 {
    14.0
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            vertical_spacing: VERTICAL_SPACING_FACTOR,
            horizontal_compression: HORIZONTAL_COMPRESSION_FACTOR,
            child_order: ChildOrder::default(),
            node_radius: default_node_radius(),
            default_task: 0,
            last_model_group: None,
        }
    }
}

impl Settings {
    /// Builder and layout parameters derived from these settings.
    pub fn lineage_config(&self) -> LineageConfig {
        LineageConfig {
            child_order: self.child_order,
            layout: TreeLayout::new(self.vertical_spacing, self.horizontal_compression),
        }
    }

    /// Get the path to the settings file
    fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|mut p| {
            p.push("lineage-console");
            p.push("settings.json");
            p
        })
    }

    /// Load settings from disk, returning defaults if the file doesn't exist or is invalid
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            tracing::warn!("could not determine config directory, using defaults");
            return Self::default();
        };
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(settings) => {
                    tracing::info!(path = %path.display(), "loaded settings");
                    settings
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "failed to parse settings file, using defaults");
                    Self::default()
                }
            },
            // File doesn't exist yet, that's fine
            Err(_) => Self::default(),
        }
    }

    /// Save settings to disk
    pub fn save(&self) {
        let Some(path) = Self::config_path() else {
            tracing::warn!("could not determine config directory, settings not saved");
            return;
        };
        match self.save_to(&path) {
            Ok(()) => tracing::debug!(path = %path.display(), "saved settings"),
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "failed to save settings"),
        }
    }

    pub fn save_to(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(io::Error::other)?;
        std::fs::write(path, json)
    }
}
