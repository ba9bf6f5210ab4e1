//! Saathi client - terminal client for the Saathi persona chat service
//!
//! This library provides the client-side conversational session manager:
//! - Identity store (stable device id + selected role persona)
//! - Audio capture pipeline (bounded-duration voice notes)
//! - Conversation state machine (history, pause/lock/reset semantics)
//! - Transport adapter (text and voice turns against the chat backend)
//! - Confirmation/gate coordinator (role-switch confirmation, premium gate)
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                  Terminal driver                      │
//! │   stdin lines  │  /record  │  /role  │  ctrl-c      │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │             Conversation session                     │
//! │   History  │  Mode (active/paused/locked)  │ Timers │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │              Chat backend (HTTP)                     │
//! │   /config  │  /chat (JSON)  │  /chat (multipart)    │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod gate;
pub mod identity;
pub mod session;
pub mod transport;
pub mod voice;

pub use config::ClientConfig;
pub use error::{Error, Result};
pub use gate::{GateCoordinator, TerminalGate};
pub use identity::{IdentityStore, PersonaType, RoleMode, RoleSelector, SessionIdentity};
pub use session::{
    AudioRef, ChatSession, Content, Message, Mode, Sender, SessionEvent, SubmitOutcome, TimerSlot,
};
pub use transport::{
    ChatBackend, ChatResponse, HttpBackend, Outbound, RemoteConfig, ResponseKind, TurnPayload,
    WireMessage,
};
pub use voice::{
    AudioPlayback, CapturePipeline, CaptureState, MicRecorder, Recorder, SAMPLE_RATE, StopReason,
    VoicePayload, samples_to_wav,
};
