//! Bundle assembly and block-builder submission
//!
//! A launch bundle is fixed in order: creation first, buy batches next, the
//! creator's buy last. The tip rides inside the creation transaction, so the
//! builder only gets paid when the whole bundle lands.
//!
//! [`JitoBundler`] speaks the block engine's JSON-RPC: `sendBundle` with
//! base64 transactions, then `getInflightBundleStatuses` until the bundle
//! lands, fails, or the landing window closes.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use rand::seq::SliceRandom;
use rand::Rng;
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use solana_sdk::{
    instruction::Instruction, pubkey::Pubkey, signature::Signature, system_instruction,
    transaction::VersionedTransaction,
};
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use super::first_signature;
use crate::config::JitoConfig;
use crate::errors::{LaunchError, LaunchResult};
use crate::metrics::{metrics, Timer};
use crate::observability::TraceContext;

/// Block-builder limit on transactions per bundle
pub const MAX_BUNDLE_TRANSACTIONS: usize = 5;

/// Pick one tip account uniformly at random
pub fn select_tip_account<R: Rng + ?Sized>(accounts: &[Pubkey], rng: &mut R) -> LaunchResult<Pubkey> {
    accounts
        .choose(rng)
        .copied()
        .ok_or_else(|| LaunchError::Configuration("tip account pool is empty".to_string()))
}

pub fn tip_instruction(payer: &Pubkey, tip_account: &Pubkey, lamports: u64) -> Instruction {
    system_instruction::transfer(payer, tip_account, lamports)
}

/// Ordered, fully-signed transactions ready for submission
#[derive(Debug, Clone)]
pub struct LaunchBundle {
    transactions: Vec<VersionedTransaction>,
    tip_lamports: u64,
}

impl LaunchBundle {
    pub fn transactions(&self) -> &[VersionedTransaction] {
        &self.transactions
    }

    pub fn tip_lamports(&self) -> u64 {
        self.tip_lamports
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    /// Signature of the creation transaction, used for the landing check
    pub fn creation_signature(&self) -> LaunchResult<Signature> {
        let creation = self
            .transactions
            .first()
            .ok_or_else(|| LaunchError::Internal("bundle is empty".to_string()))?;
        first_signature(creation)
    }
}

/// Order the launch transactions and enforce the bundle size cap
pub fn assemble_bundle(
    creation: VersionedTransaction,
    buy_batches: Vec<VersionedTransaction>,
    creator_buy: Option<VersionedTransaction>,
    tip_lamports: u64,
) -> LaunchResult<LaunchBundle> {
    let mut transactions = Vec::with_capacity(buy_batches.len() + 2);
    transactions.push(creation);
    transactions.extend(buy_batches);
    transactions.extend(creator_buy);

    if transactions.len() > MAX_BUNDLE_TRANSACTIONS {
        return Err(LaunchError::bundle_rejected(
            format!(
                "{} transactions exceed the bundle limit of {}",
                transactions.len(),
                MAX_BUNDLE_TRANSACTIONS
            ),
            true,
        ));
    }

    Ok(LaunchBundle {
        transactions,
        tip_lamports,
    })
}

/// Builder acknowledgement for a landed bundle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleReceipt {
    pub bundle_id: String,
    pub landed_slot: Option<u64>,
}

#[async_trait]
pub trait Bundler: Send + Sync {
    /// Submit and wait until the bundle lands or is given up on
    async fn submit_bundle(
        &self,
        bundle: &LaunchBundle,
        trace_ctx: &TraceContext,
    ) -> LaunchResult<BundleReceipt>;

    fn is_available(&self) -> bool;
}

#[derive(Serialize)]
struct JsonRpcRequest<'a, P> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: P,
}

#[derive(Deserialize)]
struct JsonRpcResponse<R> {
    result: Option<R>,
    error: Option<JsonRpcError>,
}

#[derive(Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

#[derive(Serialize)]
struct EncodingOptions {
    encoding: &'static str,
}

#[derive(Deserialize)]
struct InflightStatuses {
    value: Vec<InflightStatus>,
}

#[derive(Deserialize)]
struct InflightStatus {
    status: String,
    #[serde(default)]
    landed_slot: Option<u64>,
}

pub struct JitoBundler {
    http: Client,
    bundles_url: String,
    status_url: String,
    landing_timeout: Duration,
    poll_interval: Duration,
}

impl JitoBundler {
    pub fn new(config: &JitoConfig, request_timeout: Duration) -> LaunchResult<Self> {
        let http = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| LaunchError::Configuration(format!("block engine client: {}", e)))?;
        let bundles_url = config.block_engine_url.trim_end_matches('/').to_string();
        let status_url = match bundles_url.strip_suffix("/bundles") {
            Some(base) => format!("{}/getInflightBundleStatuses", base),
            None => bundles_url.clone(),
        };
        Ok(Self {
            http,
            bundles_url,
            status_url,
            landing_timeout: Duration::from_secs(config.landing_timeout_secs),
            poll_interval: Duration::from_millis(config.poll_interval_ms.max(1)),
        })
    }

    async fn rpc_call<P: Serialize, R: DeserializeOwned>(
        &self,
        url: &str,
        method: &str,
        params: P,
    ) -> LaunchResult<R> {
        let body = JsonRpcRequest {
            jsonrpc: "2.0",
            id: 1,
            method,
            params,
        };
        let response = self
            .http
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| LaunchError::bundle_rejected(format!("{}: {}", method, e), false))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(LaunchError::bundle_rejected(
                format!("{} returned {}: {}", method, status, text),
                false,
            ));
        }

        let out: JsonRpcResponse<R> = response
            .json()
            .await
            .map_err(|e| LaunchError::bundle_rejected(format!("{} response: {}", method, e), false))?;
        if let Some(err) = out.error {
            return Err(LaunchError::bundle_rejected(
                format!("{} error {}: {}", method, err.code, err.message),
                false,
            ));
        }
        out.result
            .ok_or_else(|| LaunchError::bundle_rejected(format!("{}: empty result", method), false))
    }

    fn encode(bundle: &LaunchBundle) -> LaunchResult<Vec<String>> {
        bundle
            .transactions()
            .iter()
            .map(|tx| {
                bincode::serialize(tx)
                    .map(|bytes| BASE64.encode(bytes))
                    .map_err(|e| LaunchError::Compile(format!("bundle encoding: {}", e)))
            })
            .collect()
    }

    async fn send(&self, bundle: &LaunchBundle) -> LaunchResult<String> {
        let encoded = Self::encode(bundle)?;
        self.rpc_call(
            &self.bundles_url,
            "sendBundle",
            (encoded, EncodingOptions { encoding: "base64" }),
        )
        .await
    }

    async fn wait_for_landing(&self, bundle_id: &str) -> LaunchResult<Option<u64>> {
        let deadline = Instant::now() + self.landing_timeout;
        loop {
            let statuses: InflightStatuses = self
                .rpc_call(&self.status_url, "getInflightBundleStatuses", [[bundle_id]])
                .await?;

            match statuses.value.first() {
                Some(s) if s.status == "Landed" => return Ok(s.landed_slot),
                Some(s) if s.status == "Failed" => {
                    return Err(LaunchError::bundle_rejected(
                        format!("bundle {} failed", bundle_id),
                        false,
                    ))
                }
                Some(s) => debug!(bundle_id, status = %s.status, "Bundle in flight"),
                None => debug!(bundle_id, "Bundle status not yet known"),
            }

            if Instant::now() >= deadline {
                return Err(LaunchError::bundle_rejected(
                    format!(
                        "bundle {} did not land within {}s",
                        bundle_id,
                        self.landing_timeout.as_secs()
                    ),
                    false,
                ));
            }
            sleep(self.poll_interval).await;
        }
    }
}

#[async_trait]
impl Bundler for JitoBundler {
    async fn submit_bundle(
        &self,
        bundle: &LaunchBundle,
        trace_ctx: &TraceContext,
    ) -> LaunchResult<BundleReceipt> {
        let timer = Timer::new();
        metrics().bundles_submitted.inc();

        let result: LaunchResult<BundleReceipt> = async {
            let bundle_id = self.send(bundle).await?;
            info!(
                bundle_id = %bundle_id,
                transactions = bundle.len(),
                tip_lamports = bundle.tip_lamports(),
                correlation_id = %trace_ctx.correlation_id(),
                trace_id = %trace_ctx.trace_id,
                span_id = %trace_ctx.span_id,
                parent_span_id = trace_ctx.parent(),
                operation = %trace_ctx.operation,
                "Bundle accepted by block engine"
            );
            let landed_slot = self.wait_for_landing(&bundle_id).await?;
            Ok(BundleReceipt {
                bundle_id,
                landed_slot,
            })
        }
        .await;

        match &result {
            Ok(receipt) => {
                metrics().bundles_landed.inc();
                timer.observe_duration(&metrics().bundle_latency);
                info!(
                    bundle_id = %receipt.bundle_id,
                    slot = ?receipt.landed_slot,
                    trace_id = %trace_ctx.trace_id,
                    span_id = %trace_ctx.span_id,
                    "Bundle landed"
                );
            }
            Err(e) => {
                metrics().bundles_rejected.inc();
                warn!(
                    error = %e,
                    correlation_id = %trace_ctx.correlation_id(),
                    trace_id = %trace_ctx.trace_id,
                    span_id = %trace_ctx.span_id,
                    "Bundle submission failed"
                );
            }
        }
        result
    }

    fn is_available(&self) -> bool {
        !self.bundles_url.is_empty()
    }
}
