//! Client configuration
//!
//! Precedence: environment variables > configuration file > defaults.

mod file;

use std::path::PathBuf;
use std::time::Duration;

use crate::{Error, Result};

pub use file::FileConfig;

const DEFAULT_BACKEND_URL: &str = "http://localhost:3000";
const DEFAULT_SEND_DELAY_MS: u64 = 0;
const DEFAULT_MAX_RECORD_MS: u64 = 5000;

/// Resolved client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Backend origin
    pub backend_url: String,

    /// Owner/unlock credential, forwarded with every turn when set
    pub owner_key: Option<String>,

    /// Artificial delay before dispatching a text turn
    pub send_delay_ms: u64,

    /// Ask the backend for spoken replies to text turns
    pub want_voice: bool,

    /// Hard cap on a single voice recording
    pub max_record_ms: u64,

    /// Directory holding persisted client state
    pub data_dir: PathBuf,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            owner_key: None,
            send_delay_ms: DEFAULT_SEND_DELAY_MS,
            want_voice: false,
            max_record_ms: DEFAULT_MAX_RECORD_MS,
            data_dir: default_data_dir(),
        }
    }
}

impl ClientConfig {
    /// Load configuration, applying file then environment overrides
    ///
    /// # Errors
    ///
    /// Returns error if the configuration file or an environment variable
    /// is malformed
    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        if let Some(file) = FileConfig::load_default()? {
            config.apply_file(file);
        }
        config.apply_env()?;

        Ok(config)
    }

    fn apply_file(&mut self, file: FileConfig) {
        if let Some(url) = file.backend_url {
            self.backend_url = url;
        }
        if file.owner_key.is_some() {
            self.owner_key = file.owner_key;
        }
        if let Some(delay) = file.send_delay_ms {
            self.send_delay_ms = delay;
        }
        if let Some(voice) = file.want_voice {
            self.want_voice = voice;
        }
        if let Some(cap) = file.max_record_ms {
            self.max_record_ms = cap;
        }
        if let Some(dir) = file.data_dir {
            self.data_dir = PathBuf::from(dir);
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var("SAATHI_BACKEND_URL") {
            self.backend_url = url;
        }
        if let Ok(key) = std::env::var("SAATHI_OWNER_KEY") {
            self.owner_key = Some(key);
        }
        if let Ok(delay) = std::env::var("SAATHI_SEND_DELAY_MS") {
            self.send_delay_ms = delay
                .parse()
                .map_err(|_| Error::Config(format!("invalid SAATHI_SEND_DELAY_MS: {delay}")))?;
        }
        if let Ok(voice) = std::env::var("SAATHI_WANT_VOICE") {
            self.want_voice = matches!(voice.as_str(), "1" | "true" | "yes");
        }
        if let Ok(cap) = std::env::var("SAATHI_MAX_RECORD_MS") {
            self.max_record_ms = cap
                .parse()
                .map_err(|_| Error::Config(format!("invalid SAATHI_MAX_RECORD_MS: {cap}")))?;
        }
        if let Ok(dir) = std::env::var("SAATHI_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        Ok(())
    }

    /// Path of the persisted client state file
    #[must_use]
    pub fn state_path(&self) -> PathBuf {
        self.data_dir.join("client.json")
    }

    /// Send delay as a [`Duration`]
    #[must_use]
    pub const fn send_delay(&self) -> Duration {
        Duration::from_millis(self.send_delay_ms)
    }

    /// Recording cap as a [`Duration`]
    #[must_use]
    pub const fn max_record(&self) -> Duration {
        Duration::from_millis(self.max_record_ms)
    }
}

/// Default state directory (`~/.local/share/saathi` on Linux)
fn default_data_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", "saathi")
        .map_or_else(|| PathBuf::from(".saathi"), |dirs| dirs.data_dir().to_path_buf())
}
