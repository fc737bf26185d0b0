//! Launch orchestration core
//!
//! One module per pipeline stage: distribution, registry, composer,
//! creation, bundle submission and the recovery sweep. The orchestrator
//! threads a single [`orchestrator::LaunchContext`] through all of them.

use solana_sdk::{
    address_lookup_table::AddressLookupTableAccount,
    hash::Hash,
    instruction::Instruction,
    message::{v0::Message as MessageV0, VersionedMessage},
    packet::PACKET_DATA_SIZE,
    pubkey::Pubkey,
    signature::{Keypair, Signer},
    transaction::VersionedTransaction,
};
use tracing::warn;

use crate::errors::{LaunchError, LaunchResult};

pub mod aggregator;
pub mod bundle;
pub mod composer;
pub mod creation;
pub mod distribution;
pub mod executor;
pub mod handoff;
pub mod metadata;
pub mod orchestrator;
pub mod registry;
pub mod sweep;

pub use aggregator::{JupiterAggregator, SwapAggregator};
pub use bundle::{assemble_bundle, select_tip_account, Bundler, JitoBundler, LaunchBundle};
pub use composer::Composer;
pub use distribution::CapitalDistributor;
pub use executor::LegacyExecutor;
pub use handoff::{ExternalProcess, TokioProcessRunner, VolumeBotHandoff};
pub use metadata::{HttpMetadataUploader, MetadataUploader};
pub use orchestrator::{LaunchContext, LaunchOrchestrator};
pub use registry::{RegistryBuilder, RegistryPlan};
pub use sweep::{RecoverySweep, SweepMode};

/// Compile a v0 message and sign it
///
/// Signers are de-duplicated by public key, so a wallet that is both payer
/// and instruction signer can be passed twice.
pub fn build_v0_transaction(
    payer: &Pubkey,
    instructions: &[Instruction],
    lookup_tables: &[AddressLookupTableAccount],
    blockhash: Hash,
    signers: &[&Keypair],
) -> LaunchResult<VersionedTransaction> {
    let message = MessageV0::try_compile(payer, instructions, lookup_tables, blockhash)?;

    let mut unique: Vec<&Keypair> = Vec::with_capacity(signers.len());
    for signer in signers {
        if !unique.iter().any(|s| s.pubkey() == signer.pubkey()) {
            unique.push(*signer);
        }
    }

    Ok(VersionedTransaction::try_new(
        VersionedMessage::V0(message),
        &unique,
    )?)
}

/// Serialized size; logs a warning above the packet limit
pub fn check_packet_size(tx: &VersionedTransaction, label: &str) -> LaunchResult<usize> {
    let size = bincode::serialized_size(tx)
        .map_err(|e| LaunchError::Compile(format!("{}: {}", label, e)))? as usize;
    if size > PACKET_DATA_SIZE {
        warn!(
            tx = label,
            size,
            limit = PACKET_DATA_SIZE,
            "Transaction exceeds packet size limit"
        );
    }
    Ok(size)
}

/// First signature of a signed transaction
pub fn first_signature(tx: &VersionedTransaction) -> LaunchResult<solana_sdk::signature::Signature> {
    tx.signatures
        .first()
        .copied()
        .ok_or_else(|| LaunchError::Internal("transaction has no signatures".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_sdk::system_instruction;

    #[test]
    fn test_duplicate_signers_are_collapsed() {
        let payer = Keypair::new();
        let ix = system_instruction::transfer(&payer.pubkey(), &Pubkey::new_unique(), 1);
        let tx = build_v0_transaction(
            &payer.pubkey(),
            &[ix],
            &[],
            Hash::new_unique(),
            &[&payer, &payer],
        )
        .unwrap();
        assert_eq!(tx.signatures.len(), 1);
        assert!(tx.verify_with_results().iter().all(|ok| *ok));
    }

    #[test]
    fn test_missing_signer_is_an_error() {
        let payer = Keypair::new();
        let other = Keypair::new();
        let ix = system_instruction::transfer(&other.pubkey(), &Pubkey::new_unique(), 1);
        let result = build_v0_transaction(
            &payer.pubkey(),
            &[ix],
            &[],
            Hash::new_unique(),
            &[&payer],
        );
        assert!(matches!(result, Err(LaunchError::Signing(_))));
    }

    #[test]
    fn test_packet_size_reported() {
        let payer = Keypair::new();
        let ix = system_instruction::transfer(&payer.pubkey(), &Pubkey::new_unique(), 1);
        let tx =
            build_v0_transaction(&payer.pubkey(), &[ix], &[], Hash::new_unique(), &[&payer])
                .unwrap();
        let size = check_packet_size(&tx, "transfer").unwrap();
        assert!(size > 0 && size < PACKET_DATA_SIZE);
        assert_eq!(first_signature(&tx).unwrap(), tx.signatures[0]);
    }
}
