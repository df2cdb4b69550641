//! Application settings loading from config.toml
//!
//! Everything in the file is optional: a missing file or a missing key falls back to
//! the defaults below, which reproduce the bot's standard modmail timings.

use crate::core::modmail::ModmailConfig;
use crate::errors::{Error, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Environment variable that overrides the config file location.
pub const CONFIG_PATH_VAR: &str = "HERALD_CONFIG";

/// Config file location used when [`CONFIG_PATH_VAR`] is not set.
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Longest accepted value for any modmail timing: one week.
pub const MAX_TIMING_SECS: u64 = 7 * 24 * 60 * 60;

/// Configuration structure representing the entire config.toml file
#[derive(Debug, Default, Deserialize)]
pub struct AppConfig {
    /// Modmail timings and naming
    #[serde(default)]
    pub modmail: ModmailSettings,
}

/// The `[modmail]` table of config.toml
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModmailSettings {
    /// Name of the category created for modmail channels when none is configured
    pub category_name: String,
    /// Idle seconds before the first warning
    pub warning_after_secs: u64,
    /// Idle seconds before the final warning
    pub final_warning_after_secs: u64,
    /// Idle seconds before the thread is closed
    pub close_after_secs: u64,
    /// Seconds a closed channel stays visible before deletion
    pub delete_grace_secs: u64,
    /// Seconds a server selection prompt stays answerable
    pub selection_timeout_secs: u64,
}

impl Default for ModmailSettings {
    fn default() -> Self {
        Self {
            category_name: "Modmail".to_string(),
            warning_after_secs: 30,
            final_warning_after_secs: 50,
            close_after_secs: 60,
            delete_grace_secs: 10,
            selection_timeout_secs: 300,
        }
    }
}

impl ModmailSettings {
    /// Validates the settings and converts them into the modmail core's configuration.
    ///
    /// # Errors
    /// Returns `Error::Config` if the idle stages are not strictly increasing, a timing
    /// exceeds [`MAX_TIMING_SECS`] or the category name is blank.
    pub fn to_modmail_config(&self) -> Result<ModmailConfig> {
        if self.category_name.trim().is_empty() {
            return Err(Error::Config {
                message: "modmail.category_name cannot be empty".to_string(),
            });
        }

        if !(0 < self.warning_after_secs
            && self.warning_after_secs < self.final_warning_after_secs
            && self.final_warning_after_secs < self.close_after_secs)
        {
            return Err(Error::Config {
                message: format!(
                    "modmail timings must satisfy 0 < warning ({}) < final warning ({}) < close ({})",
                    self.warning_after_secs, self.final_warning_after_secs, self.close_after_secs
                ),
            });
        }

        let timings = [
            ("close_after_secs", self.close_after_secs),
            ("delete_grace_secs", self.delete_grace_secs),
            ("selection_timeout_secs", self.selection_timeout_secs),
        ];
        if let Some((key, value)) = timings.iter().find(|(_, value)| *value > MAX_TIMING_SECS) {
            return Err(Error::Config {
                message: format!("modmail.{key} ({value}) exceeds the maximum of {MAX_TIMING_SECS}"),
            });
        }

        Ok(ModmailConfig {
            category_name: self.category_name.trim().to_string(),
            warning_after: Duration::from_secs(self.warning_after_secs),
            final_warning_after: Duration::from_secs(self.final_warning_after_secs),
            close_after: Duration::from_secs(self.close_after_secs),
            delete_grace: Duration::from_secs(self.delete_grace_secs),
            selection_timeout: Duration::from_secs(self.selection_timeout_secs),
        })
    }
}

/// Loads the application configuration from a TOML file.
///
/// # Errors
/// Returns an error if the file cannot be read or is not valid TOML.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<AppConfig> {
    let path = path.as_ref();
    debug!("Loading configuration from {:?}", path);

    let contents = std::fs::read_to_string(path).map_err(|e| Error::Config {
        message: format!("Failed to read config file {}: {e}", path.display()),
    })?;

    parse_config(&contents)
}

/// Parses configuration from TOML text.
pub fn parse_config(contents: &str) -> Result<AppConfig> {
    toml::from_str(contents).map_err(|e| Error::Config {
        message: format!("Failed to parse config.toml: {e}"),
    })
}

/// Loads the configuration from `HERALD_CONFIG` or `./config.toml`.
///
/// A missing file is not an error; the defaults are used instead.
pub fn load_app_configuration() -> Result<AppConfig> {
    let path = std::env::var(CONFIG_PATH_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

    if Path::new(&path).exists() {
        load_config(&path)
    } else {
        info!("No configuration file at {path}, using defaults.");
        Ok(AppConfig::default())
    }
}
