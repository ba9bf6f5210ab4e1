//! Session behavior tests: history, mode transitions, role switching

mod common;

use std::time::Duration;

use saathi_client::session::{
    PAUSE_DURATION, RESET_CLEAR_DELAY, ROLEPLAY_HISTORY_WINDOW, STRANGER_HISTORY_WINDOW,
};
use saathi_client::{
    ChatResponse, Content, Mode, PersonaType, RoleSelector, Sender, SessionEvent, SubmitOutcome,
    TurnPayload, VoicePayload,
};

use common::{MockBackend, ScriptedGate, session_with, session_with_config, started_session};

fn text_reply(text: &str) -> ChatResponse {
    ChatResponse {
        reply: Some(text.to_string()),
        ..Default::default()
    }
}

#[tokio::test]
async fn reply_appends_one_persona_message() {
    let mut t = started_session().await;
    let before = t.session.messages().len();

    t.backend.push_reply(text_reply("hello!"));
    let outcome = t.session.submit_text("hi").await.unwrap();

    assert_eq!(outcome, SubmitOutcome::Sent);
    assert_eq!(t.session.mode(), Mode::Active);
    // One user message plus one persona reply
    assert_eq!(t.session.messages().len(), before + 2);

    let last = t.session.messages().last().unwrap();
    assert_eq!(last.sender, Sender::Persona);
    assert_eq!(last.content, Content::Text("hello!".to_string()));
    assert!(!last.seen);
}

#[tokio::test]
async fn blank_input_is_dropped() {
    let mut t = started_session().await;

    assert_eq!(
        t.session.submit_text("   ").await.unwrap(),
        SubmitOutcome::Suppressed
    );
    assert_eq!(t.backend.sent_count(), 0);
}

#[tokio::test]
async fn transport_failure_shows_fallback_without_retry() {
    let mut t = started_session().await;
    t.backend.push_failure();

    t.session.submit_text("hi").await.unwrap();

    // Exactly one attempt, and the last message is a persona-side notice
    assert_eq!(t.backend.sent_count(), 1);
    let last = t.session.messages().last().unwrap();
    assert_eq!(last.sender, Sender::Persona);
    assert!(matches!(&last.content, Content::Text(_)));
    assert_eq!(t.session.mode(), Mode::Active);
}

#[tokio::test]
async fn locked_reply_lands_before_gate() {
    let mut t = started_session().await;
    t.backend.push_reply(ChatResponse {
        reply: Some("upgrade to keep chatting".to_string()),
        locked: true,
        ..Default::default()
    });

    t.session.submit_text("hi").await.unwrap();

    // The farewell reply is kept, then the session locks and gates
    let last = t.session.messages().last().unwrap();
    assert_eq!(
        last.content,
        Content::Text("upgrade to keep chatting".to_string())
    );
    assert_eq!(t.session.mode(), Mode::Locked);
    assert_eq!(t.gate.premium_prompts(), 1);

    // Further submissions never reach the network
    let sent_before = t.backend.sent_count();
    assert_eq!(
        t.session.submit_text("hello?").await.unwrap(),
        SubmitOutcome::Suppressed
    );
    assert_eq!(t.backend.sent_count(), sent_before);
}

#[tokio::test]
async fn role_switch_cannot_clear_a_lock() {
    let mut t = session_with(MockBackend::new(), ScriptedGate::answering(&[true]));
    t.session.start().await;
    t.backend.push_reply(ChatResponse {
        locked: true,
        ..Default::default()
    });
    t.session.submit_text("hi").await.unwrap();
    assert_eq!(t.session.mode(), Mode::Locked);
    let prompts_before = t.gate.premium_prompts();

    let switched = t
        .session
        .request_role_change(RoleSelector::roleplay(PersonaType::Wife))
        .await
        .unwrap();

    // Gated instead of confirmed; nothing mutates and the lock holds
    assert!(!switched);
    assert_eq!(t.session.mode(), Mode::Locked);
    assert_eq!(t.session.role(), RoleSelector::stranger());
    assert_eq!(t.gate.confirms_asked(), 0);
    assert_eq!(t.gate.premium_prompts(), prompts_before + 1);

    // Submissions still never reach the network
    let sent_before = t.backend.sent_count();
    t.session.submit_text("hello?").await.unwrap();
    assert_eq!(t.backend.sent_count(), sent_before);
}

#[tokio::test]
async fn unlock_restores_active() {
    let mut t = started_session().await;
    t.backend.push_reply(ChatResponse {
        locked: true,
        ..Default::default()
    });
    t.session.submit_text("hi").await.unwrap();
    assert_eq!(t.session.mode(), Mode::Locked);

    t.session.unlock();
    assert_eq!(t.session.mode(), Mode::Active);

    t.backend.push_reply(text_reply("welcome back"));
    assert_eq!(
        t.session.submit_text("hi again").await.unwrap(),
        SubmitOutcome::Sent
    );
}

#[tokio::test(start_paused = true)]
async fn pause_schedules_exactly_one_unpause() {
    let mut t = started_session().await;
    t.backend.push_reply(ChatResponse {
        pause: true,
        ..Default::default()
    });

    t.session.submit_text("hi").await.unwrap();
    assert!(matches!(t.session.mode(), Mode::Paused { .. }));

    // Submissions are dropped while paused
    assert_eq!(
        t.session.submit_text("you there?").await.unwrap(),
        SubmitOutcome::Suppressed
    );

    let event = t.events.recv().await.unwrap();
    assert_eq!(event, SessionEvent::Unpause);
    let before = t.session.messages().len();
    t.session.handle_event(event);

    // Exactly one re-engagement message, session active again
    assert_eq!(t.session.mode(), Mode::Active);
    assert_eq!(t.session.messages().len(), before + 1);
    assert_eq!(t.session.messages().last().unwrap().sender, Sender::Persona);

    // No second unpause is pending
    let extra = tokio::time::timeout(PAUSE_DURATION * 2, t.events.recv()).await;
    assert!(extra.is_err());
}

#[tokio::test(start_paused = true)]
async fn second_pause_replaces_the_first() {
    let mut t = started_session().await;

    t.backend.push_reply(ChatResponse {
        pause: true,
        ..Default::default()
    });
    t.session.submit_text("hi").await.unwrap();

    // A pause reply racing in while already paused: unpause, then pause again
    let event = t.events.recv().await.unwrap();
    t.session.handle_event(event);
    t.backend.push_reply(ChatResponse {
        pause: true,
        ..Default::default()
    });
    t.session.submit_text("hi again").await.unwrap();

    // Only one pending unpause fires for the second pause
    assert_eq!(t.events.recv().await.unwrap(), SessionEvent::Unpause);
    let extra = tokio::time::timeout(PAUSE_DURATION * 2, t.events.recv()).await;
    assert!(extra.is_err());
}

#[tokio::test(start_paused = true)]
async fn reset_flag_clears_history_after_delay() {
    let mut t = started_session().await;
    t.backend.push_reply(ChatResponse {
        reply: Some("bye for now".to_string()),
        reset: true,
        ..Default::default()
    });

    t.session.submit_text("hi").await.unwrap();
    assert!(t.session.messages().len() > 1);

    let deadline = tokio::time::Instant::now() + RESET_CLEAR_DELAY + Duration::from_millis(100);
    let event = tokio::time::timeout_at(deadline, t.events.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event, SessionEvent::ClearHistory);
    t.session.handle_event(event);

    // Only the opening line remains
    assert_eq!(t.session.messages().len(), 1);
    assert_eq!(t.session.messages()[0].sender, Sender::Persona);
}

#[tokio::test]
async fn pending_reset_is_consumed_once() {
    let mut t = started_session().await;

    t.session.submit_text("/clear").await.unwrap();
    assert!(t.session.pending_reset());
    assert_eq!(t.backend.sent_count(), 0);

    t.backend.push_reply(text_reply("fresh start"));
    t.session.submit_text("hi").await.unwrap();

    let sent = t.backend.sent();
    assert!(sent[0].reset);
    assert!(!t.session.pending_reset());

    t.backend.push_reply(text_reply("again"));
    t.session.submit_text("more").await.unwrap();
    assert!(!t.backend.sent()[1].reset);
}

#[tokio::test]
async fn pending_reset_consumed_even_when_send_fails() {
    let mut t = started_session().await;
    t.session.submit_text("/clear").await.unwrap();

    t.backend.push_failure();
    t.session.submit_text("hi").await.unwrap();
    assert!(t.backend.sent()[0].reset);
    assert!(!t.session.pending_reset());

    t.backend.push_reply(text_reply("ok"));
    t.session.submit_text("hello").await.unwrap();
    assert!(!t.backend.sent()[1].reset);
}

#[tokio::test]
async fn local_commands_never_reach_backend() {
    let mut t = started_session().await;

    assert_eq!(
        t.session.submit_text("/clear").await.unwrap(),
        SubmitOutcome::Local
    );
    assert_eq!(
        t.session.submit_text("/stranger").await.unwrap(),
        SubmitOutcome::Local
    );
    assert_eq!(t.backend.sent_count(), 0);
}

#[tokio::test]
async fn confirmed_role_switch_reseeds_history() {
    let mut t = session_with(MockBackend::new(), ScriptedGate::answering(&[true]));
    t.session.start().await;
    t.backend.push_reply(text_reply("hello"));
    t.session.submit_text("hi").await.unwrap();
    let old_key = t.session.session_key();

    let switched = t
        .session
        .request_role_change(RoleSelector::roleplay(PersonaType::Wife))
        .await
        .unwrap();

    assert!(switched);
    assert_eq!(t.gate.confirms_asked(), 1);
    assert_eq!(t.session.role(), RoleSelector::roleplay(PersonaType::Wife));
    assert_ne!(t.session.session_key(), old_key);
    // History reseeded to just the new opening line, reset flagged
    assert_eq!(t.session.messages().len(), 1);
    assert!(t.session.pending_reset());
}

#[tokio::test]
async fn declined_role_switch_changes_nothing() {
    let mut t = session_with(MockBackend::new(), ScriptedGate::answering(&[false]));
    t.session.start().await;
    t.backend.push_reply(text_reply("hello"));
    t.session.submit_text("hi").await.unwrap();
    let messages_before = t.session.messages().len();

    let switched = t
        .session
        .request_role_change(RoleSelector::roleplay(PersonaType::Girlfriend))
        .await
        .unwrap();

    assert!(!switched);
    assert_eq!(t.session.role(), RoleSelector::stranger());
    assert_eq!(t.session.messages().len(), messages_before);
    assert!(!t.session.pending_reset());
}

#[tokio::test]
async fn premium_gate_blocks_roleplay_without_owner_key() {
    let mut t = session_with(
        MockBackend::with_premium_required(),
        ScriptedGate::answering(&[true]),
    );
    t.session.start().await;
    assert!(t.session.roleplay_needs_premium());

    let switched = t
        .session
        .request_role_change(RoleSelector::roleplay(PersonaType::Bhabhi))
        .await
        .unwrap();

    assert!(!switched);
    assert_eq!(t.session.role(), RoleSelector::stranger());
    // Premium prompt shown instead of the confirmation dialog
    assert_eq!(t.gate.premium_prompts(), 1);
    assert_eq!(t.gate.confirms_asked(), 0);
}

#[tokio::test]
async fn owner_key_bypasses_premium_gate() {
    let mut t = session_with_config(
        MockBackend::with_premium_required(),
        ScriptedGate::answering(&[true]),
        |config| config.owner_key = Some("owner-123".to_string()),
    );
    t.session.start().await;

    let switched = t
        .session
        .request_role_change(RoleSelector::roleplay(PersonaType::Wife))
        .await
        .unwrap();

    assert!(switched);
    assert_eq!(t.gate.premium_prompts(), 0);

    // The key rides along on every turn
    t.backend.push_reply(text_reply("hi jaan"));
    t.session.submit_text("hi").await.unwrap();
    assert_eq!(t.backend.sent()[0].owner_key.as_deref(), Some("owner-123"));
}

#[tokio::test]
async fn failed_config_fetch_defaults_to_open_roleplay() {
    let mut t = session_with(
        MockBackend::with_failing_config(),
        ScriptedGate::answering(&[true]),
    );
    t.session.start().await;

    assert!(!t.session.roleplay_needs_premium());
    // Conversation still opens
    assert_eq!(t.session.messages().len(), 1);

    let switched = t
        .session
        .request_role_change(RoleSelector::roleplay(PersonaType::Cousin))
        .await
        .unwrap();
    assert!(switched);
}

#[tokio::test]
async fn history_window_depends_on_role_mode() {
    let mut t = session_with(MockBackend::new(), ScriptedGate::answering(&[true]));
    t.session.start().await;

    for i in 0..30 {
        t.backend.push_reply(text_reply(&format!("reply {i}")));
        t.session.submit_text(&format!("message {i}")).await.unwrap();
    }

    let sent = t.backend.sent();
    assert_eq!(sent.last().unwrap().history.len(), STRANGER_HISTORY_WINDOW);
    // Newest entries win
    assert_eq!(
        sent.last().unwrap().history.last().unwrap().content,
        "message 29"
    );

    t.session
        .request_role_change(RoleSelector::roleplay(PersonaType::Wife))
        .await
        .unwrap();
    for i in 0..20 {
        t.backend.push_reply(text_reply(&format!("rp reply {i}")));
        t.session.submit_text(&format!("rp message {i}")).await.unwrap();
    }
    assert_eq!(
        t.backend.sent().last().unwrap().history.len(),
        ROLEPLAY_HISTORY_WINDOW
    );
}

#[tokio::test]
async fn voice_turn_carries_wav_and_local_note() {
    let mut t = started_session().await;
    t.backend.push_reply(ChatResponse {
        audio_url: Some("https://cdn.example.com/reply.mp3".to_string()),
        ..Default::default()
    });

    let payload = VoicePayload {
        wav: vec![0x52, 0x49, 0x46, 0x46],
        duration: Duration::from_millis(1200),
    };
    let outcome = t.session.submit_audio(payload).await;
    assert_eq!(outcome, SubmitOutcome::Sent);

    let sent = t.backend.sent();
    assert!(matches!(&sent[0].payload, TurnPayload::Audio { wav } if !wav.is_empty()));

    // Local note in history, remote voice reply appended
    let messages = t.session.messages();
    let note = &messages[messages.len() - 2];
    assert_eq!(note.sender, Sender::User);
    assert!(matches!(note.content, Content::Voice(_)));
    let reply = messages.last().unwrap();
    assert_eq!(reply.sender, Sender::Persona);
    assert!(matches!(reply.content, Content::Voice(_)));
}

#[tokio::test]
async fn voice_turn_suppressed_while_locked() {
    let mut t = started_session().await;
    t.backend.push_reply(ChatResponse {
        locked: true,
        ..Default::default()
    });
    t.session.submit_text("hi").await.unwrap();

    let payload = VoicePayload {
        wav: Vec::new(),
        duration: Duration::ZERO,
    };
    assert_eq!(
        t.session.submit_audio(payload).await,
        SubmitOutcome::Suppressed
    );
    assert_eq!(t.backend.sent_count(), 1);
}

#[tokio::test]
async fn session_key_rides_on_every_turn() {
    let mut t = started_session().await;
    t.backend.push_reply(text_reply("hello"));
    t.session.submit_text("hi").await.unwrap();

    let sent = t.backend.sent();
    assert_eq!(sent[0].session_key, t.session.session_key());
    assert!(sent[0].session_key.ends_with(":stranger"));
}

#[tokio::test]
async fn mark_all_seen_flags_every_message() {
    let mut t = started_session().await;
    t.backend.push_reply(text_reply("hello"));
    t.session.submit_text("hi").await.unwrap();
    assert!(t.session.messages().iter().any(|m| !m.seen));

    t.session.mark_all_seen();
    assert!(t.session.messages().iter().all(|m| m.seen));
}
