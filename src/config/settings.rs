//! Application settings loaded from config.toml.
//!
//! The file is optional in every section: allocation settings fall back to
//! their defaults and the necessity list may be empty.
//!
//! ```toml
//! [allocation]
//! delivery_window_days = 30
//!
//! [[necessities]]
//! name = "Tents"
//! unit_price = "100.00"
//! target_count = 3
//! owner_id = "admin"
//! ```

use crate::errors::{Error, Result};
use serde::Deserialize;
use std::path::Path;

/// Days an accepted contribution may wait for delivery before it expires
pub const DEFAULT_DELIVERY_WINDOW_DAYS: i64 = 30;

/// Configuration structure representing the entire config.toml file
#[derive(Debug, Default, Deserialize)]
pub struct Settings {
    /// Allocation and lifecycle tuning
    #[serde(default)]
    pub allocation: AllocationSettings,
    /// Necessities to create on startup if missing
    #[serde(default)]
    pub necessities: Vec<NecessitySeed>,
}

/// Lifecycle tuning for accepted contributions
#[derive(Debug, Clone, Deserialize)]
pub struct AllocationSettings {
    /// Days after acceptance before an undelivered contribution expires
    #[serde(default = "default_delivery_window_days")]
    pub delivery_window_days: i64,
}

impl Default for AllocationSettings {
    fn default() -> Self {
        Self {
            delivery_window_days: DEFAULT_DELIVERY_WINDOW_DAYS,
        }
    }
}

const fn default_delivery_window_days() -> i64 {
    DEFAULT_DELIVERY_WINDOW_DAYS
}

/// Configuration for a single necessity
#[derive(Debug, Deserialize, Clone)]
pub struct NecessitySeed {
    /// Name of the necessity
    pub name: String,
    /// Unit price as decimal text, e.g. `"100.00"`
    pub unit_price: String,
    /// Number of units needed
    pub target_count: u32,
    /// Administrator owning the necessity
    pub owner_id: String,
}

/// Loads settings from a TOML file
///
/// # Errors
/// Returns an error if:
/// - The file cannot be read
/// - The TOML syntax is invalid
/// - Required fields are missing
/// - The delivery window is negative
pub fn load_settings<P: AsRef<Path>>(path: P) -> Result<Settings> {
    let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| Error::Config {
        message: format!("Failed to read config file {}: {e}", path.as_ref().display()),
    })?;
    parse_settings(&contents)
}

/// Parses settings from TOML text.
pub fn parse_settings(contents: &str) -> Result<Settings> {
    let settings: Settings = toml::from_str(contents).map_err(|e| Error::Config {
        message: format!("Failed to parse config.toml: {e}"),
    })?;

    if settings.allocation.delivery_window_days < 0 {
        return Err(Error::Config {
            message: format!(
                "delivery_window_days must not be negative, got {}",
                settings.allocation.delivery_window_days
            ),
        });
    }
    Ok(settings)
}

/// Loads settings from `path` if it exists, defaults otherwise.
pub fn load_settings_or_default<P: AsRef<Path>>(path: P) -> Result<Settings> {
    if path.as_ref().exists() {
        load_settings(path)
    } else {
        tracing::warn!(
            "Config file {} not found, using defaults",
            path.as_ref().display()
        );
        Ok(Settings::default())
    }
}
