//! Device identity and role persistence
//!
//! Each installation has a stable opaque device id, generated once and never
//! regenerated. The backend-facing session key combines the device id with a
//! role-derived suffix so conversational context never bleeds across roles.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

/// Session-key suffix used for the default, unauthenticated persona
const STRANGER_SUFFIX: &str = "stranger";

/// Conversation role mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleMode {
    /// Default, unauthenticated persona
    #[default]
    Stranger,

    /// Named roleplay persona
    Roleplay,
}

impl std::fmt::Display for RoleMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stranger => write!(f, "stranger"),
            Self::Roleplay => write!(f, "roleplay"),
        }
    }
}

/// Named roleplay persona adopted by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersonaType {
    Wife,
    Girlfriend,
    Bhabhi,
    Cousin,
}

impl PersonaType {
    /// Wire/session-key representation
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Wife => "wife",
            Self::Girlfriend => "girlfriend",
            Self::Bhabhi => "bhabhi",
            Self::Cousin => "cousin",
        }
    }

    /// Parse from string representation
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "wife" => Some(Self::Wife),
            "girlfriend" => Some(Self::Girlfriend),
            "bhabhi" => Some(Self::Bhabhi),
            "cousin" => Some(Self::Cousin),
            _ => None,
        }
    }
}

impl std::fmt::Display for PersonaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Selected role: mode plus (for roleplay) the persona type
///
/// The persona is meaningful only in roleplay mode; the constructors keep the
/// pair normalized so a stranger selector never carries a stale persona.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RoleSelector {
    pub mode: RoleMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persona: Option<PersonaType>,
}

impl RoleSelector {
    /// The default stranger role
    #[must_use]
    pub const fn stranger() -> Self {
        Self {
            mode: RoleMode::Stranger,
            persona: None,
        }
    }

    /// A roleplay role with the given persona
    #[must_use]
    pub const fn roleplay(persona: PersonaType) -> Self {
        Self {
            mode: RoleMode::Roleplay,
            persona: Some(persona),
        }
    }

    /// Session-key suffix for this role
    ///
    /// Two different personas on the same device map to different suffixes;
    /// stranger is a fixed, stable suffix regardless of any prior persona.
    #[must_use]
    pub const fn suffix(&self) -> &'static str {
        match (self.mode, self.persona) {
            (RoleMode::Roleplay, Some(persona)) => persona.as_str(),
            _ => STRANGER_SUFFIX,
        }
    }
}

/// Stable per-device identity plus the currently selected role
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionIdentity {
    /// Opaque device identifier, generated once and persisted
    pub device_id: String,

    /// Currently selected role
    pub role: RoleSelector,
}

impl SessionIdentity {
    /// The backend-facing session key: `device_id` + role-derived suffix
    #[must_use]
    pub fn session_key(&self) -> String {
        format!("{}:{}", self.device_id, self.role.suffix())
    }
}

/// Persisted client state: plain key/value pairs, no schema versioning
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoredState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    device_id: Option<String>,

    #[serde(default)]
    role: RoleSelector,

    /// Locally cached build version, used to detect new deployments
    #[serde(default, skip_serializing_if = "Option::is_none")]
    build_version: Option<String>,
}

/// File-backed store for device id, last role selection, and build marker
#[derive(Debug)]
pub struct IdentityStore {
    path: PathBuf,
    state: StoredState,
}

impl IdentityStore {
    /// Open the store at `path`, loading existing state if present
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or parsed
    pub fn open(path: &Path) -> Result<Self> {
        let state = if path.exists() {
            let content = fs::read_to_string(path)?;
            serde_json::from_str(&content)
                .map_err(|e| Error::Storage(format!("invalid client state: {e}")))?
        } else {
            StoredState::default()
        };

        Ok(Self {
            path: path.to_path_buf(),
            state,
        })
    }

    /// Get the default state file path
    ///
    /// Returns `~/.local/share/saathi/client.json`
    #[must_use]
    pub fn default_path() -> PathBuf {
        directories::BaseDirs::new().map_or_else(
            || PathBuf::from(".local/share/saathi/client.json"),
            |d| d.data_dir().join("saathi").join("client.json"),
        )
    }

    /// Load the session identity, generating and persisting a device id on
    /// first use
    ///
    /// Idempotent: repeated calls never regenerate an existing device id.
    ///
    /// # Errors
    ///
    /// Returns error if the state file cannot be written
    pub fn load_or_create_identity(&mut self) -> Result<SessionIdentity> {
        let device_id = match &self.state.device_id {
            Some(id) => id.clone(),
            None => {
                let id = format!("dev_{}", Uuid::new_v4().simple());
                self.state.device_id = Some(id.clone());
                self.save()?;
                tracing::info!(device_id = %id, "created new device identity");
                id
            }
        };

        Ok(SessionIdentity {
            device_id,
            role: self.state.role,
        })
    }

    /// The last persisted role selection
    #[must_use]
    pub const fn role(&self) -> RoleSelector {
        self.state.role
    }

    /// Persist a new role selection
    ///
    /// # Errors
    ///
    /// Returns error if the state file cannot be written
    pub fn set_role(&mut self, role: RoleSelector) -> Result<()> {
        self.state.role = role;
        self.save()?;
        tracing::debug!(mode = %role.mode, persona = ?role.persona, "role persisted");
        Ok(())
    }

    /// The cached build version marker, if any
    #[must_use]
    pub fn build_version(&self) -> Option<&str> {
        self.state.build_version.as_deref()
    }

    /// Update the cached build version marker
    ///
    /// # Errors
    ///
    /// Returns error if the state file cannot be written
    pub fn set_build_version(&mut self, version: &str) -> Result<()> {
        self.state.build_version = Some(version.to_string());
        self.save()
    }

    fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(&self.state)
            .map_err(|e| Error::Storage(format!("failed to serialize client state: {e}")))?;
        fs::write(&self.path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> (tempfile::TempDir, IdentityStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = IdentityStore::open(&dir.path().join("client.json")).unwrap();
        (dir, store)
    }

    #[test]
    fn test_device_id_idempotent() {
        let (dir, mut store) = temp_store();

        let first = store.load_or_create_identity().unwrap();
        let second = store.load_or_create_identity().unwrap();
        assert_eq!(first.device_id, second.device_id);

        // Survives reopening the store
        let mut reopened = IdentityStore::open(&dir.path().join("client.json")).unwrap();
        let third = reopened.load_or_create_identity().unwrap();
        assert_eq!(first.device_id, third.device_id);
    }

    #[test]
    fn test_role_persists_across_restart() {
        let (dir, mut store) = temp_store();
        store.load_or_create_identity().unwrap();
        store
            .set_role(RoleSelector::roleplay(PersonaType::Wife))
            .unwrap();

        let reopened = IdentityStore::open(&dir.path().join("client.json")).unwrap();
        assert_eq!(reopened.role(), RoleSelector::roleplay(PersonaType::Wife));
    }

    #[test]
    fn test_session_key_changes_with_role() {
        let identity = SessionIdentity {
            device_id: "dev_abc".to_string(),
            role: RoleSelector::stranger(),
        };
        assert_eq!(identity.session_key(), "dev_abc:stranger");

        let wife = SessionIdentity {
            role: RoleSelector::roleplay(PersonaType::Wife),
            ..identity.clone()
        };
        let cousin = SessionIdentity {
            role: RoleSelector::roleplay(PersonaType::Cousin),
            ..identity.clone()
        };
        assert_eq!(wife.session_key(), "dev_abc:wife");
        assert_eq!(cousin.session_key(), "dev_abc:cousin");
        assert_ne!(wife.session_key(), cousin.session_key());
    }

    #[test]
    fn test_stranger_suffix_fixed() {
        // Stranger maps to the same suffix no matter what persona came before
        assert_eq!(RoleSelector::stranger().suffix(), "stranger");
        let stale = RoleSelector {
            mode: RoleMode::Stranger,
            persona: Some(PersonaType::Bhabhi),
        };
        assert_eq!(stale.suffix(), "stranger");
    }

    #[test]
    fn test_persona_parse() {
        assert_eq!(PersonaType::parse("wife"), Some(PersonaType::Wife));
        assert_eq!(PersonaType::parse("Bhabhi"), Some(PersonaType::Bhabhi));
        assert_eq!(PersonaType::parse("robot"), None);
    }

    #[test]
    fn test_build_version_marker() {
        let (_dir, mut store) = temp_store();
        assert!(store.build_version().is_none());

        store.set_build_version("0.1.0").unwrap();
        assert_eq!(store.build_version(), Some("0.1.0"));
    }
}
