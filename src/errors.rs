//! Error types for the launch orchestrator
//!
//! Every step of a launch reports failures through [`LaunchError`]. The
//! taxonomy separates launch-critical failures (distribution, registry,
//! bundle) from per-wallet and per-account failures, which the sweep and
//! composer catch locally and log.

use thiserror::Error;

use crate::rpc_manager::RpcManagerError;

/// Result alias used across the orchestration core
pub type LaunchResult<T> = std::result::Result<T, LaunchError>;

/// Error type for all launch and sweep operations
#[derive(Error, Debug)]
pub enum LaunchError {
    /// Treasury (or another funding source) cannot cover a planned step
    ///
    /// Aborts the owning step. For the distribution step this aborts the
    /// whole launch before anything is submitted.
    #[error("Insufficient funds in {account}: have {available} lamports, need {required}")]
    InsufficientFunds {
        account: String,
        available: u64,
        required: u64,
    },

    /// A single buyer wallet cannot cover its buy
    ///
    /// The composer drops that wallet's instructions and keeps going.
    #[error("Insufficient wallet funds ({wallet}): have {available} lamports, need {required}")]
    InsufficientWalletFunds {
        wallet: String,
        available: u64,
        required: u64,
    },

    /// The lookup registry could not be created within the attempt ceiling
    #[error("Lookup registry creation failed after {attempts} attempts: {reason}")]
    RegistryCreationFailed { attempts: u32, reason: String },

    /// An extend operation exhausted its attempt ceiling
    #[error("Lookup registry extension failed (class={class}, attempts={attempts}): {reason}")]
    RegistryExtensionFailed {
        class: &'static str,
        attempts: u32,
        reason: String,
    },

    /// The block-builder declined the bundle or it never landed
    ///
    /// `safe_to_retry` is only true once the ledger confirmed that the
    /// creation transaction did not land.
    #[error("Bundle rejected (safe_to_retry={safe_to_retry}): {reason}")]
    BundleRejected { reason: String, safe_to_retry: bool },

    /// The aggregator returned no route for this mint
    #[error("No aggregator route for {mint}: {reason}")]
    QuoteUnavailable { mint: String, reason: String },

    /// An account observed earlier no longer exists
    #[error("Account vanished: {account}")]
    AccountVanished { account: String },

    /// Ledger RPC failure
    #[error("RPC error: {0}")]
    Rpc(#[from] RpcManagerError),

    /// Failed to build an instruction for a specific program
    #[error("Instruction build error (program={program}): {reason}")]
    InstructionBuild { program: String, reason: String },

    /// Message compilation failed (too many accounts, bad lookup table)
    #[error("Transaction compile error: {0}")]
    Compile(String),

    #[error("Signing failed: {0}")]
    Signing(String),

    /// Aggregator HTTP transport or decode failure
    #[error("Aggregator error: {0}")]
    Aggregator(String),

    /// Metadata publication failed
    #[error("Upload failed: {0}")]
    Upload(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    /// External volume tool could not be configured or launched
    #[error("Handoff error: {0}")]
    Handoff(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Internal invariant violation
    #[error("Internal error: {0}")]
    Internal(String),
}

impl LaunchError {
    /// Check if this error is potentially retryable
    ///
    /// Returns `true` if repeating the same operation might succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Rpc(e) => e.is_retryable(),
            Self::QuoteUnavailable { .. } => true,
            Self::Aggregator(_) => true,
            Self::Upload(_) => true,

            Self::InsufficientFunds { .. } => false,
            Self::InsufficientWalletFunds { .. } => false,
            Self::RegistryCreationFailed { .. } => false,
            Self::RegistryExtensionFailed { .. } => false,
            // Blind resubmission risks duplicate buys and tips
            Self::BundleRejected { .. } => false,
            Self::AccountVanished { .. } => false,
            Self::InstructionBuild { .. } => false,
            Self::Compile(_) => false,
            Self::Signing(_) => false,
            Self::Persistence(_) => false,
            Self::Handoff(_) => false,
            Self::Configuration(_) => false,
            Self::Internal(_) => false,
        }
    }

    /// Get the error category for metrics and observability
    pub fn category(&self) -> &'static str {
        match self {
            Self::InsufficientFunds { .. } => "funds",
            Self::InsufficientWalletFunds { .. } => "wallet_funds",
            Self::RegistryCreationFailed { .. } => "registry",
            Self::RegistryExtensionFailed { .. } => "registry",
            Self::BundleRejected { .. } => "bundle",
            Self::QuoteUnavailable { .. } => "quote",
            Self::AccountVanished { .. } => "vanished",
            Self::Rpc(_) => "rpc",
            Self::InstructionBuild { .. } => "instruction",
            Self::Compile(_) => "compile",
            Self::Signing(_) => "signing",
            Self::Aggregator(_) => "aggregator",
            Self::Upload(_) => "upload",
            Self::Persistence(_) => "persistence",
            Self::Handoff(_) => "handoff",
            Self::Configuration(_) => "config",
            Self::Internal(_) => "internal",
        }
    }

    /// True for an account that was observed and then disappeared.
    ///
    /// A ledger "account not found" answer counts too.
    pub fn is_vanished(&self) -> bool {
        match self {
            Self::AccountVanished { .. } => true,
            Self::Rpc(e) => e.is_not_found(),
            _ => false,
        }
    }
}

// Convenience constructors for common error scenarios
impl LaunchError {
    pub fn insufficient_funds(account: impl ToString, available: u64, required: u64) -> Self {
        Self::InsufficientFunds {
            account: account.to_string(),
            available,
            required,
        }
    }

    pub fn instruction_failed(program: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InstructionBuild {
            program: program.into(),
            reason: reason.into(),
        }
    }

    pub fn bundle_rejected(reason: impl Into<String>, safe_to_retry: bool) -> Self {
        Self::BundleRejected {
            reason: reason.into(),
            safe_to_retry,
        }
    }

    pub fn no_route(mint: impl ToString, reason: impl Into<String>) -> Self {
        Self::QuoteUnavailable {
            mint: mint.to_string(),
            reason: reason.into(),
        }
    }

    pub fn vanished(account: impl ToString) -> Self {
        Self::AccountVanished {
            account: account.to_string(),
        }
    }
}

impl From<solana_sdk::message::CompileError> for LaunchError {
    fn from(err: solana_sdk::message::CompileError) -> Self {
        Self::Compile(err.to_string())
    }
}

impl From<solana_sdk::signer::SignerError> for LaunchError {
    fn from(err: solana_sdk::signer::SignerError) -> Self {
        Self::Signing(err.to_string())
    }
}
