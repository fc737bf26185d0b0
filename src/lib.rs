//! Launch Bundler - atomic multi-wallet token launches on Solana
//!
//! A launch funds a fleet of fresh buyer wallets through single-use
//! intermediaries, packs their addresses into a lookup table, and submits
//! token creation plus every first-block buy as one all-or-nothing bundle.
//! The same wallets are later liquidated and closed by the recovery sweep.

pub mod config;
pub mod errors;
pub mod launch;
pub mod launchpad;
pub mod metrics;
pub mod observability;
pub mod persistence;
pub mod retry;
pub mod structured_logging;
pub mod types;
pub mod wallet;

// Component modules with non-standard paths (directories with spaces)
#[path = "rpc manager/mod.rs"]
pub mod rpc_manager;

pub mod test_utils;

// Re-export commonly used types
pub use config::Config;
pub use errors::{LaunchError, LaunchResult};
pub use launch::{LaunchContext, LaunchOrchestrator};
pub use solana_sdk::{pubkey::Pubkey, signature::Signature};

#[cfg(test)]
mod tests {
    mod bundle_ordering_tests;
    mod distribution_scenario_tests;
    mod launch_flow_tests;
    mod property_tests;
    mod registry_failure_tests;
    mod sweep_scenario_tests;
    mod test_helpers;
}
