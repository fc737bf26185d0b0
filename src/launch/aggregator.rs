//! DEX aggregator client used by the sweep to sell residual tokens
//!
//! Quote, then ask the aggregator to build the swap; the returned
//! transaction is decoded and signed locally by the selling wallet.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use solana_sdk::{
    pubkey::Pubkey,
    signature::{Keypair, Signer},
    transaction::VersionedTransaction,
};
use std::time::Duration;
use tracing::debug;

use crate::config::AggregatorConfig;
use crate::errors::{LaunchError, LaunchResult};

#[async_trait]
pub trait SwapAggregator: Send + Sync {
    /// Signed transaction selling `amount` raw units of `mint` for native
    ///
    /// `QuoteUnavailable` when the aggregator has no route.
    async fn sell_transaction(
        &self,
        wallet: &Keypair,
        mint: &Pubkey,
        amount: u64,
    ) -> LaunchResult<VersionedTransaction>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SwapRequest<'a> {
    quote_response: &'a Value,
    user_public_key: String,
    wrap_and_unwrap_sol: bool,
    dynamic_compute_unit_limit: bool,
    prioritization_fee_lamports: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SwapResponse {
    #[serde(default)]
    swap_transaction: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

pub struct JupiterAggregator {
    http: Client,
    base_url: String,
    slippage_bps: u16,
    priority_fee_lamports: u64,
}

impl JupiterAggregator {
    pub fn new(config: &AggregatorConfig) -> LaunchResult<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LaunchError::Aggregator(e.to_string()))?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            slippage_bps: config.slippage_bps,
            priority_fee_lamports: config.priority_fee_lamports,
        })
    }

    async fn quote(&self, mint: &Pubkey, amount: u64) -> LaunchResult<Value> {
        let url = format!("{}/quote", self.base_url);
        let quote: Value = self
            .http
            .get(&url)
            .query(&[
                ("inputMint", mint.to_string()),
                ("outputMint", spl_token::native_mint::id().to_string()),
                ("amount", amount.to_string()),
                ("slippageBps", self.slippage_bps.to_string()),
            ])
            .send()
            .await
            .map_err(|e| LaunchError::Aggregator(format!("quote: {}", e)))?
            .json()
            .await
            .map_err(|e| LaunchError::no_route(mint, format!("unreadable quote: {}", e)))?;

        if let Some(err) = quote.get("error") {
            return Err(LaunchError::no_route(mint, err.to_string()));
        }
        if quote.get("outAmount").is_none() {
            return Err(LaunchError::no_route(mint, "quote has no outAmount"));
        }
        Ok(quote)
    }

    async fn swap(&self, wallet: &Pubkey, mint: &Pubkey, quote: &Value) -> LaunchResult<Vec<u8>> {
        let url = format!("{}/swap", self.base_url);
        let request = SwapRequest {
            quote_response: quote,
            user_public_key: wallet.to_string(),
            wrap_and_unwrap_sol: true,
            dynamic_compute_unit_limit: true,
            prioritization_fee_lamports: self.priority_fee_lamports,
        };
        let response: SwapResponse = self
            .http
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| LaunchError::Aggregator(format!("swap: {}", e)))?
            .json()
            .await
            .map_err(|e| LaunchError::Aggregator(format!("unreadable swap response: {}", e)))?;

        match (response.swap_transaction, response.error) {
            (Some(encoded), _) => BASE64
                .decode(encoded)
                .map_err(|e| LaunchError::Aggregator(format!("swap transaction encoding: {}", e))),
            (None, Some(err)) => Err(LaunchError::no_route(mint, err)),
            (None, None) => Err(LaunchError::no_route(mint, "swap response missing swapTransaction")),
        }
    }
}

#[async_trait]
impl SwapAggregator for JupiterAggregator {
    async fn sell_transaction(
        &self,
        wallet: &Keypair,
        mint: &Pubkey,
        amount: u64,
    ) -> LaunchResult<VersionedTransaction> {
        let quote = self.quote(mint, amount).await?;
        debug!(mint = %mint, amount, out_amount = %quote["outAmount"], "Quote received");

        let bytes = self.swap(&wallet.pubkey(), mint, &quote).await?;
        let unsigned: VersionedTransaction = bincode::deserialize(&bytes)
            .map_err(|e| LaunchError::Aggregator(format!("swap transaction decode: {}", e)))?;
        Ok(VersionedTransaction::try_new(unsigned.message, &[wallet])?)
    }
}
