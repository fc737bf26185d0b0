//! Single-transaction executor for steps that need no bundle atomicity
//!
//! Registry creation/extension and the distribution transaction go through
//! here. Sends are retried on transient RPC errors only.

use solana_sdk::{
    address_lookup_table::AddressLookupTableAccount,
    instruction::Instruction,
    signature::{Keypair, Signature, Signer},
    transaction::VersionedTransaction,
};
use std::sync::Arc;
use tracing::{debug, info};

use super::{build_v0_transaction, check_packet_size};
use crate::errors::{LaunchError, LaunchResult};
use crate::retry::{retry_with_backoff, RetryConfig, RetryOn};
use crate::rpc_manager::LedgerRpc;

pub struct LegacyExecutor {
    rpc: Arc<dyn LedgerRpc>,
    retry: RetryConfig,
}

impl LegacyExecutor {
    pub fn new(rpc: Arc<dyn LedgerRpc>, max_attempts: u32) -> Self {
        Self {
            rpc,
            retry: RetryConfig {
                max_attempts,
                ..RetryConfig::default()
            }
            .with_retry_on(RetryOn::Transient),
        }
    }

    pub fn rpc(&self) -> &Arc<dyn LedgerRpc> {
        &self.rpc
    }

    /// Send and confirm an already-signed transaction
    pub async fn execute(&self, tx: &VersionedTransaction) -> LaunchResult<Signature> {
        let rpc = &self.rpc;
        let signature = retry_with_backoff("send_and_confirm", &self.retry, |_| async move {
            rpc.send_and_confirm_transaction(tx)
                .await
                .map_err(LaunchError::from)
        })
        .await
        .map_err(|exhausted| exhausted.last_error)?;

        info!(signature = %signature, "Transaction confirmed");
        Ok(signature)
    }

    /// Fetch a blockhash, compile, sign with `payer` plus `co_signers`, execute
    pub async fn send_instructions(
        &self,
        instructions: &[Instruction],
        payer: &Keypair,
        co_signers: &[&Keypair],
        lookup_tables: &[AddressLookupTableAccount],
    ) -> LaunchResult<Signature> {
        let blockhash = self.rpc.get_latest_blockhash().await?;

        let mut signers: Vec<&Keypair> = Vec::with_capacity(co_signers.len() + 1);
        signers.push(payer);
        signers.extend_from_slice(co_signers);

        let tx = build_v0_transaction(
            &payer.pubkey(),
            instructions,
            lookup_tables,
            blockhash,
            &signers,
        )?;
        let size = check_packet_size(&tx, "legacy")?;
        debug!(
            payer = %payer.pubkey(),
            instructions = instructions.len(),
            size,
            "Sending transaction"
        );
        self.execute(&tx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc_manager::RpcManagerError;
    use crate::test_utils::MockLedger;
    use solana_sdk::{pubkey::Pubkey, system_instruction};

    #[tokio::test(start_paused = true)]
    async fn test_transient_send_errors_are_retried() {
        let ledger = Arc::new(MockLedger::new());
        ledger.fail_next_sends(
            2,
            RpcManagerError::Timeout {
                endpoint: "mock".to_string(),
                timeout_ms: 10,
            },
        );
        let executor = LegacyExecutor::new(ledger.clone(), 3);
        let payer = Keypair::new();
        let ix = system_instruction::transfer(&payer.pubkey(), &Pubkey::new_unique(), 5);

        executor.send_instructions(&[ix], &payer, &[], &[]).await.unwrap();
        assert_eq!(ledger.send_attempts(), 3);
        assert_eq!(ledger.sent_transactions().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_send_error_is_returned_once() {
        let ledger = Arc::new(MockLedger::new());
        ledger.fail_next_sends(5, RpcManagerError::TransactionFailed("custom 0x1".to_string()));
        let executor = LegacyExecutor::new(ledger.clone(), 3);
        let payer = Keypair::new();
        let ix = system_instruction::transfer(&payer.pubkey(), &Pubkey::new_unique(), 5);

        let err = executor
            .send_instructions(&[ix], &payer, &[], &[])
            .await
            .unwrap_err();
        assert!(matches!(err, LaunchError::Rpc(RpcManagerError::TransactionFailed(_))));
        assert_eq!(ledger.send_attempts(), 1);
    }
}
