//! Structured logging for launch steps

use solana_sdk::pubkey::Pubkey;
use uuid::Uuid;

/// Stamps every launch-step event with one per-run context id
#[derive(Debug, Clone)]
pub struct LaunchLogger {
    context_id: String,
}

impl LaunchLogger {
    pub fn new(context_id: String) -> Self {
        Self { context_id }
    }

    /// Logger with a fresh random context id
    pub fn fresh() -> Self {
        Self::new(Uuid::new_v4().to_string())
    }

    pub fn context_id(&self) -> &str {
        &self.context_id
    }

    pub fn step_started(&self, step: &str) {
        tracing::info!(context_id = %self.context_id, step = %step, "Launch step started");
    }

    pub fn step_finished(&self, step: &str, elapsed_ms: u64) {
        tracing::info!(
            context_id = %self.context_id,
            step = %step,
            elapsed_ms = %elapsed_ms,
            "Launch step finished"
        );
    }

    pub fn step_failed(&self, step: &str, error: &str) {
        tracing::error!(
            context_id = %self.context_id,
            step = %step,
            error = %error,
            "Launch step failed"
        );
    }

    pub fn wallet_skipped(&self, step: &str, wallet: &Pubkey, reason: &str) {
        tracing::warn!(
            context_id = %self.context_id,
            step = %step,
            wallet = %wallet,
            reason = %reason,
            "Wallet skipped"
        );
    }

    pub fn bundle_submitted(&self, bundle_id: &str, tx_count: usize, tip_lamports: u64) {
        tracing::info!(
            context_id = %self.context_id,
            bundle_id = %bundle_id,
            tx_count = %tx_count,
            tip_lamports = %tip_lamports,
            "Bundle submitted"
        );
    }

    pub fn warn(&self, message: &str) {
        tracing::warn!(context_id = %self.context_id, message = %message, "Warning");
    }
}

impl Default for LaunchLogger {
    fn default() -> Self {
        Self::fresh()
    }
}
