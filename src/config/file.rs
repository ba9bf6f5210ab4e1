//! TOML configuration file support
//!
//! Every field is optional; present values overlay the built-in defaults
//! before environment variables are applied.

use std::path::Path;

use serde::Deserialize;

use crate::Result;

/// Partial configuration as read from disk
#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    /// Backend origin, e.g. `https://chat.example.com`
    pub backend_url: Option<String>,

    /// Owner/unlock credential forwarded with every turn
    pub owner_key: Option<String>,

    /// Artificial delay before dispatching a text turn, in milliseconds
    pub send_delay_ms: Option<u64>,

    /// Ask the backend for spoken replies to text turns
    pub want_voice: Option<bool>,

    /// Hard cap on a single voice recording, in milliseconds
    pub max_record_ms: Option<u64>,

    /// Override for the client state directory
    pub data_dir: Option<String>,
}

impl FileConfig {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Load from the default location if it exists
    ///
    /// # Errors
    ///
    /// Returns error if a file exists but cannot be read or parsed
    pub fn load_default() -> Result<Option<Self>> {
        let Some(path) = Self::default_path() else {
            return Ok(None);
        };

        if path.exists() {
            Ok(Some(Self::load(&path)?))
        } else {
            Ok(None)
        }
    }

    /// Default configuration file location (`~/.config/saathi/config.toml`)
    #[must_use]
    pub fn default_path() -> Option<std::path::PathBuf> {
        directories::ProjectDirs::from("", "", "saathi")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }
}
