//! User confirmation and premium gating
//!
//! The session asks the gate before destructive role switches and surfaces
//! the premium prompt when the backend locks the conversation. Keeping this
//! behind a trait lets tests script the user's answers.

use async_trait::async_trait;
use dialoguer::Confirm;
use tracing::warn;

/// Boundary for interactive confirmation prompts
#[async_trait]
pub trait GateCoordinator: Send + Sync {
    /// Ask the user to confirm an intent; `false` on decline or dismissal
    async fn confirm(&self, intent: &str) -> bool;

    /// Surface the premium/unlock prompt after the backend locks the session
    fn request_premium_gate(&self);
}

/// Terminal-backed gate using interactive prompts
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalGate;

#[async_trait]
impl GateCoordinator for TerminalGate {
    async fn confirm(&self, intent: &str) -> bool {
        let prompt = intent.to_string();

        // dialoguer blocks on the terminal; keep it off the runtime threads
        let answer = tokio::task::spawn_blocking(move || {
            Confirm::new()
                .with_prompt(prompt)
                .default(false)
                .interact()
        })
        .await;

        match answer {
            Ok(Ok(confirmed)) => confirmed,
            Ok(Err(e)) => {
                warn!(error = %e, "confirmation prompt failed, treating as decline");
                false
            }
            Err(e) => {
                warn!(error = %e, "confirmation task failed, treating as decline");
                false
            }
        }
    }

    fn request_premium_gate(&self) {
        println!();
        println!("This conversation is locked. Unlock with an owner key to continue.");
        println!("Set SAATHI_OWNER_KEY (or owner_key in config.toml), then /unlock.");
        println!();
    }
}
