//! Shared test doubles for session and voice tests
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use saathi_client::{
    ChatBackend, ChatResponse, ChatSession, ClientConfig, Error, GateCoordinator, IdentityStore,
    Outbound, Recorder, RemoteConfig, Result, SessionEvent,
};

/// Backend double that replays scripted responses and records every send
pub struct MockBackend {
    replies: Mutex<VecDeque<Result<ChatResponse>>>,
    sent: Mutex<Vec<Outbound>>,
    remote_config: Mutex<Result<RemoteConfig>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            sent: Mutex::new(Vec::new()),
            remote_config: Mutex::new(Ok(RemoteConfig::default())),
        }
    }

    pub fn with_premium_required() -> Self {
        let backend = Self::new();
        *backend.remote_config.lock().unwrap() = Ok(RemoteConfig {
            roleplay_needs_premium: true,
        });
        backend
    }

    pub fn with_failing_config() -> Self {
        let backend = Self::new();
        *backend.remote_config.lock().unwrap() =
            Err(Error::Transport("config unreachable".to_string()));
        backend
    }

    /// Queue a reply for the next send
    pub fn push_reply(&self, response: ChatResponse) {
        self.replies.lock().unwrap().push_back(Ok(response));
    }

    /// Queue a transport failure for the next send
    pub fn push_failure(&self) {
        self.replies
            .lock()
            .unwrap()
            .push_back(Err(Error::Transport("connection refused".to_string())));
    }

    /// Everything sent so far, oldest first
    pub fn sent(&self) -> Vec<Outbound> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

/// Backend handle handed to the session; tests keep the other [`Arc`]
/// to script replies and inspect traffic
pub struct SharedBackend(Arc<MockBackend>);

#[async_trait]
impl ChatBackend for SharedBackend {
    async fn fetch_config(&self) -> Result<RemoteConfig> {
        std::mem::replace(
            &mut *self.0.remote_config.lock().unwrap(),
            Ok(RemoteConfig::default()),
        )
    }

    async fn send(&self, outbound: Outbound) -> Result<ChatResponse> {
        self.0.sent.lock().unwrap().push(outbound);
        self.0
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(ChatResponse::default()))
    }
}

/// Gate double with scripted confirmation answers
#[derive(Default)]
pub struct ScriptedGate {
    answers: Mutex<VecDeque<bool>>,
    confirms_asked: AtomicUsize,
    premium_prompts: AtomicUsize,
}

impl ScriptedGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn answering(answers: &[bool]) -> Self {
        Self {
            answers: Mutex::new(answers.iter().copied().collect()),
            ..Self::default()
        }
    }

    pub fn confirms_asked(&self) -> usize {
        self.confirms_asked.load(Ordering::SeqCst)
    }

    pub fn premium_prompts(&self) -> usize {
        self.premium_prompts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GateCoordinator for ScriptedGate {
    async fn confirm(&self, _intent: &str) -> bool {
        self.confirms_asked.fetch_add(1, Ordering::SeqCst);
        self.answers.lock().unwrap().pop_front().unwrap_or(false)
    }

    fn request_premium_gate(&self) {
        self.premium_prompts.fetch_add(1, Ordering::SeqCst);
    }
}

/// Recorder double returning scripted samples
pub struct FakeRecorder {
    samples: Vec<f32>,
    fail_begin: bool,
    recording: bool,
}

impl FakeRecorder {
    pub fn with_samples(samples: Vec<f32>) -> Self {
        Self {
            samples,
            fail_begin: false,
            recording: false,
        }
    }

    pub fn unavailable() -> Self {
        Self {
            samples: Vec::new(),
            fail_begin: true,
            recording: false,
        }
    }
}

impl Recorder for FakeRecorder {
    fn begin(&mut self) -> Result<()> {
        if self.fail_begin {
            return Err(Error::PermissionDenied("microphone denied".to_string()));
        }
        self.recording = true;
        Ok(())
    }

    fn stop(&mut self) -> Vec<f32> {
        if !self.recording {
            return Vec::new();
        }
        self.recording = false;
        self.samples.clone()
    }

    fn is_recording(&self) -> bool {
        self.recording
    }
}

pub struct TestSession {
    pub session: ChatSession<SharedBackend, ScriptedGate>,
    pub events: tokio::sync::mpsc::UnboundedReceiver<SessionEvent>,
    pub backend: Arc<MockBackend>,
    pub gate: Arc<ScriptedGate>,
    // Held so the state file outlives the session
    pub _dir: tempfile::TempDir,
}

/// Build a session over temp state with the given doubles
pub fn session_with(backend: MockBackend, gate: ScriptedGate) -> TestSession {
    session_with_config(backend, gate, |_| {})
}

/// Like [`session_with`], with a hook to adjust the configuration
pub fn session_with_config(
    backend: MockBackend,
    gate: ScriptedGate,
    adjust: impl FnOnce(&mut ClientConfig),
) -> TestSession {
    let dir = tempfile::tempdir().unwrap();
    let store = IdentityStore::open(&dir.path().join("client.json")).unwrap();

    let backend = Arc::new(backend);
    let gate = Arc::new(gate);
    let mut config = ClientConfig {
        data_dir: dir.path().to_path_buf(),
        ..ClientConfig::default()
    };
    adjust(&mut config);

    let (session, events) = ChatSession::new(
        store,
        SharedBackend(Arc::clone(&backend)),
        Arc::clone(&gate),
        &config,
    )
    .unwrap();

    TestSession {
        session,
        events,
        backend,
        gate,
        _dir: dir,
    }
}

/// Build a started session with default doubles
pub async fn started_session() -> TestSession {
    let mut t = session_with(MockBackend::new(), ScriptedGate::new());
    t.session.start().await;
    t
}
