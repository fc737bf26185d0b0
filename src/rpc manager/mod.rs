//! RPC Manager Module
//!
//! The ledger boundary used by every launch component. Components only see
//! the [`LedgerRpc`] trait, so tests swap in an in-memory ledger.

use async_trait::async_trait;
use solana_sdk::{
    address_lookup_table::AddressLookupTableAccount, hash::Hash, pubkey::Pubkey,
    signature::Signature, transaction::VersionedTransaction,
};

use crate::types::{TokenAmount, WalletTokenPosition};

// Submodules
pub mod rpc_client;
pub mod rpc_errors;

// Re-exports for convenience
pub use rpc_client::SolanaRpc;
pub use rpc_errors::RpcManagerError;

pub type RpcResult<T> = std::result::Result<T, RpcManagerError>;

/// Ledger queries and submission used by the orchestrator
#[async_trait]
pub trait LedgerRpc: Send + Sync {
    /// Endpoint label for logs
    fn endpoint(&self) -> &str;

    async fn get_balance(&self, pubkey: &Pubkey) -> RpcResult<u64>;

    async fn get_slot(&self) -> RpcResult<u64>;

    async fn get_latest_blockhash(&self) -> RpcResult<Hash>;

    async fn get_minimum_balance_for_rent_exemption(&self, data_len: usize) -> RpcResult<u64>;

    /// Every SPL token account owned by `owner`
    async fn get_token_accounts_by_owner(
        &self,
        owner: &Pubkey,
    ) -> RpcResult<Vec<WalletTokenPosition>>;

    /// Fails with `AccountNotFound` once the account is closed
    async fn get_token_account_balance(&self, token_account: &Pubkey) -> RpcResult<TokenAmount>;

    async fn get_address_lookup_table(
        &self,
        address: &Pubkey,
    ) -> RpcResult<AddressLookupTableAccount>;

    /// Returns the runtime error when simulation fails
    async fn simulate_transaction(&self, tx: &VersionedTransaction) -> RpcResult<Option<String>>;

    async fn send_and_confirm_transaction(&self, tx: &VersionedTransaction)
        -> RpcResult<Signature>;

    /// True once `signature` executed successfully on the ledger
    async fn signature_landed(&self, signature: &Signature) -> RpcResult<bool>;
}
