//! `LedgerRpc` over the nonblocking Solana RPC client

use async_trait::async_trait;
use solana_account_decoder::UiAccountData;
use solana_client::{client_error::ClientError, nonblocking::rpc_client::RpcClient};
use solana_rpc_client_api::{request::TokenAccountsFilter, response::RpcKeyedAccount};
use solana_sdk::{
    address_lookup_table::{state::AddressLookupTable, AddressLookupTableAccount},
    commitment_config::CommitmentConfig,
    hash::Hash,
    pubkey::Pubkey,
    signature::Signature,
    transaction::VersionedTransaction,
};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::{LedgerRpc, RpcManagerError, RpcResult};
use crate::types::{TokenAmount, WalletTokenPosition};

/// Single-endpoint ledger client at `confirmed` commitment
#[derive(Clone)]
pub struct SolanaRpc {
    client: Arc<RpcClient>,
    endpoint: String,
}

impl SolanaRpc {
    pub fn new(url: &str, timeout: Duration) -> Self {
        Self {
            client: Arc::new(RpcClient::new_with_timeout_and_commitment(
                url.to_string(),
                timeout,
                CommitmentConfig::confirmed(),
            )),
            endpoint: url.to_string(),
        }
    }

    fn map_err(&self, err: ClientError, account: Option<&Pubkey>) -> RpcManagerError {
        if let Some(tx_err) = err.get_transaction_error() {
            return RpcManagerError::TransactionFailed(tx_err.to_string());
        }
        let account = account.map(|a| a.to_string());
        RpcManagerError::from_client_error(err, &self.endpoint, account.as_deref())
    }
}

impl std::fmt::Debug for SolanaRpc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SolanaRpc")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

#[async_trait]
impl LedgerRpc for SolanaRpc {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn get_balance(&self, pubkey: &Pubkey) -> RpcResult<u64> {
        self.client
            .get_balance(pubkey)
            .await
            .map_err(|e| self.map_err(e, Some(pubkey)))
    }

    async fn get_slot(&self) -> RpcResult<u64> {
        self.client.get_slot().await.map_err(|e| self.map_err(e, None))
    }

    async fn get_latest_blockhash(&self) -> RpcResult<Hash> {
        self.client
            .get_latest_blockhash()
            .await
            .map_err(|e| self.map_err(e, None))
    }

    async fn get_minimum_balance_for_rent_exemption(&self, data_len: usize) -> RpcResult<u64> {
        self.client
            .get_minimum_balance_for_rent_exemption(data_len)
            .await
            .map_err(|e| self.map_err(e, None))
    }

    async fn get_token_accounts_by_owner(
        &self,
        owner: &Pubkey,
    ) -> RpcResult<Vec<WalletTokenPosition>> {
        let accounts = self
            .client
            .get_token_accounts_by_owner(owner, TokenAccountsFilter::ProgramId(spl_token::id()))
            .await
            .map_err(|e| self.map_err(e, Some(owner)))?;

        let mut positions = Vec::with_capacity(accounts.len());
        for keyed in accounts {
            match parse_position(owner, &keyed) {
                Ok(p) => positions.push(p),
                Err(e) => debug!(account = %keyed.pubkey, error = %e, "Skipping unparsable token account"),
            }
        }
        Ok(positions)
    }

    async fn get_token_account_balance(&self, token_account: &Pubkey) -> RpcResult<TokenAmount> {
        let ui = self
            .client
            .get_token_account_balance(token_account)
            .await
            .map_err(|e| self.map_err(e, Some(token_account)))?;
        let amount = ui
            .amount
            .parse::<u64>()
            .map_err(|e| RpcManagerError::Decode(format!("token amount '{}': {}", ui.amount, e)))?;
        Ok(TokenAmount {
            amount,
            decimals: ui.decimals,
        })
    }

    async fn get_address_lookup_table(
        &self,
        address: &Pubkey,
    ) -> RpcResult<AddressLookupTableAccount> {
        let account = self
            .client
            .get_account(address)
            .await
            .map_err(|e| self.map_err(e, Some(address)))?;
        let table = AddressLookupTable::deserialize(&account.data)
            .map_err(|e| RpcManagerError::Decode(format!("lookup table {}: {}", address, e)))?;
        Ok(AddressLookupTableAccount {
            key: *address,
            addresses: table.addresses.to_vec(),
        })
    }

    async fn simulate_transaction(&self, tx: &VersionedTransaction) -> RpcResult<Option<String>> {
        let response = self
            .client
            .simulate_transaction(tx)
            .await
            .map_err(|e| self.map_err(e, None))?;
        Ok(response.value.err.map(|e| e.to_string()))
    }

    async fn send_and_confirm_transaction(
        &self,
        tx: &VersionedTransaction,
    ) -> RpcResult<Signature> {
        self.client
            .send_and_confirm_transaction(tx)
            .await
            .map_err(|e| self.map_err(e, None))
    }

    async fn signature_landed(&self, signature: &Signature) -> RpcResult<bool> {
        let status = self
            .client
            .get_signature_status(signature)
            .await
            .map_err(|e| self.map_err(e, None))?;
        Ok(matches!(status, Some(Ok(()))))
    }
}

/// Read a jsonParsed SPL token account
fn parse_position(owner: &Pubkey, keyed: &RpcKeyedAccount) -> Result<WalletTokenPosition, String> {
    let parsed = match &keyed.account.data {
        UiAccountData::Json(parsed) => &parsed.parsed,
        _ => return Err("account data is not jsonParsed".to_string()),
    };
    let info = &parsed["info"];
    let mint = info["mint"]
        .as_str()
        .ok_or("missing mint")
        .and_then(|s| Pubkey::from_str(s).map_err(|_| "bad mint"))?;
    let amount = info["tokenAmount"]["amount"]
        .as_str()
        .ok_or("missing amount")
        .and_then(|s| s.parse::<u64>().map_err(|_| "bad amount"))?;
    let decimals = info["tokenAmount"]["decimals"]
        .as_u64()
        .ok_or("missing decimals")? as u8;
    let token_account = Pubkey::from_str(&keyed.pubkey).map_err(|e| e.to_string())?;

    Ok(WalletTokenPosition {
        owner: *owner,
        token_account,
        mint,
        amount,
        decimals,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_account_decoder::{parse_account_data::ParsedAccount, UiAccount};

    fn keyed(pubkey: &Pubkey, parsed: serde_json::Value) -> RpcKeyedAccount {
        RpcKeyedAccount {
            pubkey: pubkey.to_string(),
            account: UiAccount {
                lamports: 2_039_280,
                data: UiAccountData::Json(ParsedAccount {
                    program: "spl-token".to_string(),
                    parsed,
                    space: 165,
                }),
                owner: spl_token::id().to_string(),
                executable: false,
                rent_epoch: 0,
                space: Some(165),
            },
        }
    }

    #[test]
    fn test_parse_json_token_account() {
        let owner = Pubkey::new_unique();
        let account = Pubkey::new_unique();
        let mint = Pubkey::new_unique();
        let value = serde_json::json!({
            "type": "account",
            "info": {
                "mint": mint.to_string(),
                "owner": owner.to_string(),
                "tokenAmount": {"amount": "123456", "decimals": 6, "uiAmount": 0.123456}
            }
        });
        let position = parse_position(&owner, &keyed(&account, value)).unwrap();
        assert_eq!(position.mint, mint);
        assert_eq!(position.token_account, account);
        assert_eq!(position.amount, 123_456);
        assert_eq!(position.decimals, 6);
    }

    #[test]
    fn test_parse_rejects_missing_fields() {
        let owner = Pubkey::new_unique();
        let value = serde_json::json!({"info": {"mint": "x"}});
        assert!(parse_position(&owner, &keyed(&Pubkey::new_unique(), value)).is_err());
    }
}
