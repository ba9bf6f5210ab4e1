//! Transport adapter for the chat backend
//!
//! Serializes outgoing turns (JSON for text, multipart for voice) with the
//! session context the backend expects, and interprets the response variants
//! (`reply` / `audioUrl` / `locked` / `pause` / `reset`), which are not
//! mutually exclusive at the wire level.

use async_trait::async_trait;
use reqwest::Client;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::identity::RoleSelector;
use crate::{Error, Result};

/// One history entry as sent over the wire, roles normalized to
/// `user` / `assistant`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireMessage {
    pub role: String,
    pub content: String,
}

impl WireMessage {
    /// A user-authored entry
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    /// A persona-authored entry
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Startup configuration served by the backend
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct RemoteConfig {
    /// Whether switching into roleplay requires a premium/owner state
    #[serde(rename = "roleplayNeedsPremium", default)]
    pub roleplay_needs_premium: bool,
}

/// Response to a chat turn; any subset of fields may be present
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatResponse {
    /// Plain text reply
    #[serde(default)]
    pub reply: Option<String>,

    /// Reference to server-hosted reply audio (absolute or relative)
    #[serde(rename = "audioUrl", default)]
    pub audio_url: Option<String>,

    /// Usage quota reached; client must lock until externally cleared
    #[serde(default)]
    pub locked: bool,

    /// Temporary cool-down requested
    #[serde(default)]
    pub pause: bool,

    /// Backend asks the client to clear local history (delayed)
    #[serde(default)]
    pub reset: bool,
}

/// Primary classification of a response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    Reply,
    VoiceReply,
    Locked,
    Paused,
}

impl ChatResponse {
    /// The primary kind of this response
    ///
    /// A lock or pause flag dominates; a reply field alongside a lock is
    /// still appended to history before the gate prompt (handled by the
    /// session, which reads the fields directly).
    #[must_use]
    pub const fn kind(&self) -> ResponseKind {
        if self.locked {
            ResponseKind::Locked
        } else if self.pause {
            ResponseKind::Paused
        } else if self.audio_url.is_some() {
            ResponseKind::VoiceReply
        } else {
            ResponseKind::Reply
        }
    }
}

/// Payload variant of an outbound turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnPayload {
    /// Text turn; `want_voice` asks the backend for a spoken reply
    Text { want_voice: bool },
    /// Voice turn carrying a WAV-encoded note
    Audio { wav: Vec<u8> },
}

/// One outbound request, fully assembled by the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outbound {
    pub payload: TurnPayload,
    /// Trimmed history window, newest last, including the current turn's
    /// user message (text turns)
    pub history: Vec<WireMessage>,
    pub session_key: String,
    pub role: RoleSelector,
    /// One-shot server-side context reset request
    pub reset: bool,
    /// Optional owner/unlock credential
    pub owner_key: Option<String>,
}

/// Chat backend boundary
///
/// Exactly one response is awaited per logical submission; the driver never
/// issues a second concurrent request for the same submission.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Fetch startup configuration (`GET /config`)
    async fn fetch_config(&self) -> Result<RemoteConfig>;

    /// Send one turn (`POST /chat`) and await its response
    async fn send(&self, outbound: Outbound) -> Result<ChatResponse>;
}

/// JSON body of a text turn
#[derive(Debug, Serialize)]
struct TextTurnBody<'a> {
    messages: &'a [WireMessage],
    #[serde(rename = "clientTime")]
    client_time: String,
    #[serde(rename = "clientDate")]
    client_date: String,
    session_id: &'a str,
    #[serde(rename = "roleMode")]
    role_mode: String,
    #[serde(rename = "roleType", skip_serializing_if = "Option::is_none")]
    role_type: Option<&'static str>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    reset: bool,
    #[serde(rename = "wantVoice", skip_serializing_if = "std::ops::Not::not")]
    want_voice: bool,
    #[serde(rename = "ownerKey", skip_serializing_if = "Option::is_none")]
    owner_key: Option<&'a str>,
}

/// HTTP implementation of [`ChatBackend`]
pub struct HttpBackend {
    client: Client,
    base: Url,
}

impl HttpBackend {
    /// Create a backend adapter for the given origin
    ///
    /// # Errors
    ///
    /// Returns error if `base_url` is not a valid URL
    pub fn new(base_url: &str) -> Result<Self> {
        let base: Url = base_url
            .parse()
            .map_err(|e| Error::Config(format!("invalid backend url: {e}")))?;

        Ok(Self {
            client: Client::new(),
            base,
        })
    }

    /// Resolve a possibly-relative audio reference against the backend origin
    ///
    /// # Errors
    ///
    /// Returns error if the reference cannot be resolved
    pub fn resolve_audio_url(&self, reference: &str) -> Result<String> {
        self.base
            .join(reference)
            .map(Into::into)
            .map_err(|e| Error::Transport(format!("unresolvable audio reference: {e}")))
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base
            .join(path)
            .map_err(|e| Error::Config(format!("invalid endpoint {path}: {e}")))
    }

    /// Client-local time/date strings sent with every turn
    fn local_clock() -> (String, String) {
        let now = chrono::Local::now();
        (
            now.format("%H:%M:%S").to_string(),
            now.format("%Y-%m-%d").to_string(),
        )
    }

    async fn send_text(&self, outbound: &Outbound, want_voice: bool) -> Result<ChatResponse> {
        let (client_time, client_date) = Self::local_clock();
        let body = TextTurnBody {
            messages: &outbound.history,
            client_time,
            client_date,
            session_id: &outbound.session_key,
            role_mode: outbound.role.mode.to_string(),
            role_type: outbound.role.persona.map(|p| p.as_str()),
            reset: outbound.reset,
            want_voice,
            owner_key: outbound.owner_key.as_deref(),
        };

        let response = self
            .client
            .post(self.endpoint("/chat")?)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Transport(format!("chat request failed: {e}")))?;

        Self::parse_response(response).await
    }

    async fn send_audio(&self, outbound: &Outbound, wav: Vec<u8>) -> Result<ChatResponse> {
        let (client_time, client_date) = Self::local_clock();

        let audio_part = Part::bytes(wav)
            .file_name("voice.wav")
            .mime_str("audio/wav")
            .map_err(|e| Error::Transport(format!("invalid audio part: {e}")))?;

        let mut form = Form::new()
            .part("audio", audio_part)
            .text("messages", serde_json::to_string(&outbound.history)?)
            .text("clientTime", client_time)
            .text("clientDate", client_date)
            .text("session_id", outbound.session_key.clone())
            .text("roleMode", outbound.role.mode.to_string());

        if let Some(persona) = outbound.role.persona {
            form = form.text("roleType", persona.as_str());
        }
        if outbound.reset {
            form = form.text("reset", "true");
        }
        if let Some(key) = &outbound.owner_key {
            form = form.text("ownerKey", key.clone());
        }

        let response = self
            .client
            .post(self.endpoint("/chat")?)
            .multipart(form)
            .send()
            .await
            .map_err(|e| Error::Transport(format!("voice request failed: {e}")))?;

        Self::parse_response(response).await
    }

    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Transport(format!("backend error: {status} - {body}")));
        }

        response
            .json()
            .await
            .map_err(|e| Error::Transport(format!("unparseable response: {e}")))
    }
}

#[async_trait]
impl ChatBackend for HttpBackend {
    async fn fetch_config(&self) -> Result<RemoteConfig> {
        let response = self
            .client
            .get(self.endpoint("/config")?)
            .send()
            .await
            .map_err(|e| Error::Transport(format!("config request failed: {e}")))?;

        Self::parse_response(response).await
    }

    async fn send(&self, outbound: Outbound) -> Result<ChatResponse> {
        let mut response = match &outbound.payload {
            TurnPayload::Text { want_voice } => self.send_text(&outbound, *want_voice).await?,
            TurnPayload::Audio { wav } => {
                let wav = wav.clone();
                self.send_audio(&outbound, wav).await?
            }
        };

        // Relative audio references resolve against the backend origin
        if let Some(reference) = response.audio_url.take() {
            response.audio_url = Some(self.resolve_audio_url(&reference)?);
        }

        Ok(response)
    }
}
