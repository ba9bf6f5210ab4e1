//! Conversational session state machine
//!
//! Owns the message log, the session mode (active / paused / locked), the
//! one-shot reset flag, and the timers that drive auto-unpause and delayed
//! history clearing. All transitions run on the driver task; timers signal
//! back through an event channel so only one transition applies at a time.

mod timers;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::gate::GateCoordinator;
use crate::identity::{IdentityStore, PersonaType, RoleMode, RoleSelector, SessionIdentity};
use crate::transport::{ChatBackend, ChatResponse, Outbound, TurnPayload, WireMessage};
use crate::voice::VoicePayload;
use crate::Result;

pub use timers::TimerSlot;

/// History entries sent per turn in stranger mode
pub const STRANGER_HISTORY_WINDOW: usize = 20;

/// History entries sent per turn in roleplay mode
pub const ROLEPLAY_HISTORY_WINDOW: usize = 12;

/// How long a backend-requested pause lasts before auto-unpause
pub const PAUSE_DURATION: Duration = Duration::from_secs(5 * 60);

/// Delay between a reset-flagged response and the local history clear
pub const RESET_CLEAR_DELAY: Duration = Duration::from_millis(1500);

/// Shown in place of a reply when the backend cannot be reached
const FALLBACK_REPLY: &str = "Sorry, I'm having trouble connecting right now. Say that again?";

/// Who authored a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sender {
    User,
    Persona,
}

/// Reference to the audio behind a voice message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioRef {
    /// A note recorded on this device; the audio itself is not kept
    LocalNote,
    /// Server-hosted reply audio, resolved to an absolute URL
    Remote(String),
}

/// Message body
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Content {
    Text(String),
    Voice(AudioRef),
}

/// One entry in the session's message log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub content: Content,
    pub sender: Sender,
    pub timestamp: DateTime<Utc>,
    pub seen: bool,
}

impl Message {
    fn user_text(text: impl Into<String>) -> Self {
        Self {
            content: Content::Text(text.into()),
            sender: Sender::User,
            timestamp: Utc::now(),
            seen: true,
        }
    }

    fn persona_text(text: impl Into<String>) -> Self {
        Self {
            content: Content::Text(text.into()),
            sender: Sender::Persona,
            timestamp: Utc::now(),
            seen: false,
        }
    }

    fn user_voice() -> Self {
        Self {
            content: Content::Voice(AudioRef::LocalNote),
            sender: Sender::User,
            timestamp: Utc::now(),
            seen: true,
        }
    }

    fn persona_voice(url: String) -> Self {
        Self {
            content: Content::Voice(AudioRef::Remote(url)),
            sender: Sender::Persona,
            timestamp: Utc::now(),
            seen: false,
        }
    }
}

/// Session mode governing whether submissions reach the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Normal operation
    Active,
    /// Temporary cool-down; auto-unpauses at `until`
    Paused { until: DateTime<Utc> },
    /// Quota reached; cleared only by an explicit unlock
    Locked,
}

/// Timer-driven events delivered back to the session driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// Pause window elapsed
    Unpause,
    /// Delayed history clear requested by a reset-flagged response
    ClearHistory,
}

/// Outcome of a submission, for the caller's presentation layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Turn dispatched and response applied
    Sent,
    /// Handled locally without any network traffic
    Local,
    /// Dropped: blank input, or session paused/locked
    Suppressed,
}

/// The chat session, generic over backend and gate for testability
pub struct ChatSession<B, G> {
    identity: SessionIdentity,
    store: IdentityStore,
    backend: B,
    gate: Arc<G>,

    messages: Vec<Message>,
    mode: Mode,
    pending_reset: bool,
    awaiting_reply: bool,
    roleplay_needs_premium: bool,

    owner_key: Option<String>,
    send_delay: Duration,
    want_voice: bool,

    unpause_timer: TimerSlot,
    reset_timer: TimerSlot,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
}

impl<B: ChatBackend, G: GateCoordinator> ChatSession<B, G> {
    /// Create a session from persisted identity and configuration
    ///
    /// Returns the session plus the receiver for timer events; the caller's
    /// driver loop must feed received events back into [`Self::handle_event`].
    ///
    /// # Errors
    ///
    /// Returns error if the identity store cannot be read or written
    pub fn new(
        mut store: IdentityStore,
        backend: B,
        gate: Arc<G>,
        config: &ClientConfig,
    ) -> Result<(Self, mpsc::UnboundedReceiver<SessionEvent>)> {
        let identity = store.load_or_create_identity()?;
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let session = Self {
            identity,
            store,
            backend,
            gate,
            messages: Vec::new(),
            mode: Mode::Active,
            pending_reset: false,
            awaiting_reply: false,
            roleplay_needs_premium: false,
            owner_key: config.owner_key.clone(),
            send_delay: config.send_delay(),
            want_voice: config.want_voice,
            unpause_timer: TimerSlot::new("unpause"),
            reset_timer: TimerSlot::new("reset_clear"),
            events_tx,
        };

        Ok((session, events_rx))
    }

    /// Fetch backend configuration and seed the opening line
    ///
    /// A failed config fetch is tolerated; the session starts with the
    /// permissive defaults and the conversation still opens.
    pub async fn start(&mut self) {
        match self.backend.fetch_config().await {
            Ok(remote) => {
                self.roleplay_needs_premium = remote.roleplay_needs_premium;
                debug!(
                    roleplay_needs_premium = remote.roleplay_needs_premium,
                    "backend config loaded"
                );
            }
            Err(e) => {
                warn!(error = %e, "config fetch failed, using defaults");
            }
        }

        self.messages
            .push(Message::persona_text(opening_line(self.identity.role)));
        info!(
            session_key = %self.identity.session_key(),
            mode = %self.identity.role.mode,
            "session started"
        );
    }

    /// Submit a text turn
    ///
    /// Blank input and submissions while paused or locked are dropped.
    /// `/stranger` and `/clear` are handled locally and never reach the
    /// backend. Transport failures surface as a fallback persona message,
    /// never as an error; no automatic retry is attempted.
    ///
    /// # Errors
    ///
    /// Returns error only if a local role switch cannot be persisted
    pub async fn submit_text(&mut self, input: &str) -> Result<SubmitOutcome> {
        let text = input.trim();
        if text.is_empty() {
            return Ok(SubmitOutcome::Suppressed);
        }
        if !self.accepts_submissions() {
            debug!(mode = ?self.mode, "submission suppressed");
            return Ok(SubmitOutcome::Suppressed);
        }

        match text {
            "/stranger" => {
                self.switch_role_local(RoleSelector::stranger())?;
                return Ok(SubmitOutcome::Local);
            }
            "/clear" => {
                self.messages.clear();
                self.messages
                    .push(Message::persona_text(opening_line(self.identity.role)));
                self.pending_reset = true;
                info!("history cleared locally");
                return Ok(SubmitOutcome::Local);
            }
            _ => {}
        }

        self.messages.push(Message::user_text(text));

        if !self.send_delay.is_zero() {
            tokio::time::sleep(self.send_delay).await;
        }

        self.dispatch(TurnPayload::Text {
            want_voice: self.want_voice,
        })
        .await;
        Ok(SubmitOutcome::Sent)
    }

    /// Submit a recorded voice turn
    ///
    /// Unlike text, an empty recording is still a valid turn; only the
    /// session mode gates it.
    pub async fn submit_audio(&mut self, payload: VoicePayload) -> SubmitOutcome {
        if !self.accepts_submissions() {
            debug!(mode = ?self.mode, "voice submission suppressed");
            return SubmitOutcome::Suppressed;
        }

        self.messages.push(Message::user_voice());
        debug!(
            duration_ms = payload.duration.as_millis() as u64,
            bytes = payload.wav.len(),
            "voice turn submitted"
        );

        self.dispatch(TurnPayload::Audio { wav: payload.wav }).await;
        SubmitOutcome::Sent
    }

    /// Switch roles, honoring the premium gate and user confirmation
    ///
    /// Switching into roleplay while the backend requires premium and no
    /// owner key is configured surfaces the premium prompt and changes
    /// nothing. Any switch attempted while locked does the same, so a fresh
    /// conversation can never bypass the quota. A declined confirmation
    /// also changes nothing.
    ///
    /// # Errors
    ///
    /// Returns error if the new role cannot be persisted
    pub async fn request_role_change(&mut self, role: RoleSelector) -> Result<bool> {
        if role == self.identity.role {
            return Ok(false);
        }

        // A lock is cleared by entitlement, never by starting over
        if self.mode == Mode::Locked {
            info!("role switch while locked, gating");
            self.gate.request_premium_gate();
            return Ok(false);
        }

        if role.mode == RoleMode::Roleplay
            && self.roleplay_needs_premium
            && self.owner_key.is_none()
        {
            info!(persona = ?role.persona, "roleplay requires premium, gating");
            self.gate.request_premium_gate();
            return Ok(false);
        }

        let prompt = match role.persona {
            Some(persona) => format!("Switch to {persona}? This starts a fresh conversation"),
            None => "Switch back to stranger? This starts a fresh conversation".to_string(),
        };
        if !self.gate.confirm(&prompt).await {
            debug!("role switch declined");
            return Ok(false);
        }

        self.switch_role_local(role)?;
        Ok(true)
    }

    /// Apply a role switch locally: persist, reseed history, flag reset
    fn switch_role_local(&mut self, role: RoleSelector) -> Result<()> {
        self.store.set_role(role)?;
        self.identity.role = role;

        self.messages.clear();
        self.messages.push(Message::persona_text(opening_line(role)));
        self.pending_reset = true;

        self.mode = Mode::Active;
        self.unpause_timer.cancel();
        self.reset_timer.cancel();

        info!(session_key = %self.identity.session_key(), "role switched");
        Ok(())
    }

    /// Apply a timer event produced by this session
    pub fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Unpause => {
                if matches!(self.mode, Mode::Paused { .. }) {
                    self.mode = Mode::Active;
                    self.messages
                        .push(Message::persona_text("I'm back! Missed you. What were we talking about?"));
                    info!("pause elapsed, session active");
                }
            }
            SessionEvent::ClearHistory => {
                self.messages.clear();
                self.messages
                    .push(Message::persona_text(opening_line(self.identity.role)));
                info!("history cleared after reset");
            }
        }
    }

    /// Clear a lock after the owner key situation changed
    pub fn unlock(&mut self) {
        if self.mode == Mode::Locked {
            self.mode = Mode::Active;
            info!("session unlocked");
        }
    }

    async fn dispatch(&mut self, payload: TurnPayload) {
        // The flag is consumed whether or not the send succeeds
        let reset = std::mem::take(&mut self.pending_reset);

        let outbound = Outbound {
            payload,
            history: self.trimmed_history(),
            session_key: self.identity.session_key(),
            role: self.identity.role,
            reset,
            owner_key: self.owner_key.clone(),
        };

        self.awaiting_reply = true;
        let result = self.backend.send(outbound).await;
        self.awaiting_reply = false;
        self.on_backend_response(result);
    }

    fn on_backend_response(&mut self, result: Result<ChatResponse>) {
        let response = match result {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "turn failed, showing fallback");
                self.messages.push(Message::persona_text(FALLBACK_REPLY));
                return;
            }
        };

        let ChatResponse {
            reply,
            audio_url,
            locked,
            pause,
            reset,
        } = response;

        if let Some(reply) = reply {
            self.messages.push(Message::persona_text(reply));
        }
        if let Some(url) = audio_url {
            self.messages.push(Message::persona_voice(url));
        }

        if locked {
            // Reply (if any) lands first, then the gate closes
            self.mode = Mode::Locked;
            info!("backend locked the session");
            self.gate.request_premium_gate();
        } else if pause && self.mode == Mode::Active {
            let until = Utc::now()
                + chrono::Duration::from_std(PAUSE_DURATION).unwrap_or(chrono::Duration::zero());
            self.mode = Mode::Paused { until };
            info!(until = %until, "backend paused the session");

            let tx = self.events_tx.clone();
            self.unpause_timer.schedule(PAUSE_DURATION, async move {
                let _ = tx.send(SessionEvent::Unpause);
            });
        }

        if reset {
            let tx = self.events_tx.clone();
            self.reset_timer.schedule(RESET_CLEAR_DELAY, async move {
                let _ = tx.send(SessionEvent::ClearHistory);
            });
        }
    }

    /// The history window sent with a turn, sized by role mode
    #[must_use]
    pub fn trimmed_history(&self) -> Vec<WireMessage> {
        let window = match self.identity.role.mode {
            RoleMode::Stranger => STRANGER_HISTORY_WINDOW,
            RoleMode::Roleplay => ROLEPLAY_HISTORY_WINDOW,
        };

        let start = self.messages.len().saturating_sub(window);
        self.messages[start..]
            .iter()
            .map(|message| {
                let content = match &message.content {
                    Content::Text(text) => text.clone(),
                    Content::Voice(AudioRef::LocalNote) => "[voice note]".to_string(),
                    Content::Voice(AudioRef::Remote(_)) => "[voice reply]".to_string(),
                };
                match message.sender {
                    Sender::User => WireMessage::user(content),
                    Sender::Persona => WireMessage::assistant(content),
                }
            })
            .collect()
    }

    /// Mark every persona message as seen
    pub fn mark_all_seen(&mut self) {
        for message in &mut self.messages {
            message.seen = true;
        }
    }

    const fn accepts_submissions(&self) -> bool {
        matches!(self.mode, Mode::Active)
    }

    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    #[must_use]
    pub const fn mode(&self) -> Mode {
        self.mode
    }

    #[must_use]
    pub const fn role(&self) -> RoleSelector {
        self.identity.role
    }

    #[must_use]
    pub fn session_key(&self) -> String {
        self.identity.session_key()
    }

    #[must_use]
    pub const fn pending_reset(&self) -> bool {
        self.pending_reset
    }

    #[must_use]
    pub const fn is_awaiting_reply(&self) -> bool {
        self.awaiting_reply
    }

    #[must_use]
    pub const fn roleplay_needs_premium(&self) -> bool {
        self.roleplay_needs_premium
    }
}

/// First persona message for a fresh conversation in the given role
#[must_use]
pub fn opening_line(role: RoleSelector) -> String {
    match (role.mode, role.persona) {
        (RoleMode::Roleplay, Some(PersonaType::Wife)) => {
            "Welcome home! How was your day?".to_string()
        }
        (RoleMode::Roleplay, Some(PersonaType::Girlfriend)) => {
            "Hey you! I was just thinking about you.".to_string()
        }
        (RoleMode::Roleplay, Some(PersonaType::Bhabhi)) => {
            "Arre, you're here! Come, sit. Chai?".to_string()
        }
        (RoleMode::Roleplay, Some(PersonaType::Cousin)) => {
            "Heyy, long time! What's going on with you?".to_string()
        }
        _ => "Hi! I don't think we've met. I'm Saathi. What's your name?".to_string(),
    }
}
