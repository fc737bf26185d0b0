//! Configuration module for the launch bundler
//!
//! This module handles all configuration loading from TOML files,
//! environment variables, and provides structured configuration types.
//! Secret key material never lives in the TOML file; only the names of the
//! environment variables holding it do.

use serde::{Deserialize, Serialize};
use solana_sdk::native_token::sol_to_lamports;
use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;

use crate::errors::{LaunchError, LaunchResult};
use crate::launch::bundle::MAX_BUNDLE_TRANSACTIONS;
use crate::types::ComputeBudget;

/// Builder-designated tip accounts
pub const DEFAULT_TIP_ACCOUNTS: [&str; 8] = [
    "Cw8CFyM9FkoMi7K7Crf6HNQqf4uEMzpKw6QNghXLvLkY",
    "DttWaMuVvTiduZRnguLF7jNxTgiMBZ1hyAumKUiL2KRL",
    "96gYZGLnJYVFmbjzopPSU6QiEV5fGqZNyN9nmNhvrZU5",
    "3AVi9Tg9Uo68tJfuvoKvqKNWKkC5wPdSSdeBnizKZ6jT",
    "HFqU5x63VTqvQss8hp11i4wVV8bD44PvwucfZ2bU7gRe",
    "ADaUMid9yfUytqMBgopwjb2DTLSokTSzL1zt6iGPaS49",
    "ADuUkR4vqLUMWXxW9gh6D6L8pMSawimctcNZ5pGwDcEt",
    "DfXygSm4jCyNCybVYYK6DwvWqjKee8pbDmJGcLWNDXjh",
];

/// Upper bound imposed by the block-builder and the per-transaction signer
/// budget
pub const MAX_WALLETS_PER_BATCH: usize = 5;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// RPC endpoint configuration
    #[serde(default)]
    pub rpc: RpcConfig,

    /// Names of the environment variables holding secrets
    #[serde(default)]
    pub wallet: WalletConfig,

    /// Launch sizing and amounts
    #[serde(default)]
    pub launch: LaunchConfig,

    /// Token metadata and bonding curve parameters
    #[serde(default)]
    pub token: TokenConfig,

    /// Launchpad program addressing
    #[serde(default)]
    pub launchpad: LaunchpadConfig,

    #[serde(default)]
    pub registry: RegistryConfig,

    /// Block-builder relay
    #[serde(default)]
    pub jito: JitoConfig,

    /// DEX aggregator used by the sweep
    #[serde(default)]
    pub aggregator: AggregatorConfig,

    /// Metadata upload endpoints
    #[serde(default)]
    pub metadata: MetadataConfig,

    #[serde(default)]
    pub sweep: SweepConfig,

    /// Compute budgets per transaction kind
    #[serde(default)]
    pub budgets: BudgetConfig,

    /// External volume tool started after the launch
    #[serde(default)]
    pub volume_bot: VolumeBotConfig,

    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    /// HTTP RPC endpoint
    #[serde(default = "default_rpc_url")]
    pub url: String,

    /// Request timeout in seconds
    #[serde(default = "default_rpc_timeout")]
    pub timeout_secs: u64,

    /// Max attempts per send through the legacy executor
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletConfig {
    /// Treasury secret (base58)
    #[serde(default = "default_treasury_env")]
    pub treasury_env: String,

    /// Creator secret (base58)
    #[serde(default = "default_creator_env")]
    pub creator_env: String,

    /// Extra wallet included in the gather sweep
    #[serde(default = "default_extra_wallet_env")]
    pub extra_wallet_env: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchConfig {
    /// Number of buyer wallets
    #[serde(default = "default_wallet_count")]
    pub wallet_count: usize,

    /// Per-buyer swap amount in SOL
    #[serde(default = "default_swap_amount")]
    pub swap_amount_sol: f64,

    /// Random margin added per buyer, drawn from [min, max)
    #[serde(default = "default_margin_min")]
    pub margin_min_sol: f64,

    #[serde(default = "default_margin_max")]
    pub margin_max_sol: f64,

    /// Fixed overhead reserved on the treasury (fees, registry rent)
    #[serde(default = "default_overhead")]
    pub overhead_sol: f64,

    /// Creator's own buy in SOL
    #[serde(default = "default_creator_buy")]
    pub creator_buy_sol: f64,

    #[serde(default = "default_wallets_per_batch")]
    pub wallets_per_batch: usize,

    /// Grind the mint address until it ends with this suffix
    #[serde(default)]
    pub vanity_suffix: Option<String>,

    #[serde(default = "default_vanity_attempts")]
    pub vanity_max_attempts: u64,

    /// Wait after the bundle before the creator sweep
    #[serde(default = "default_post_bundle_wait")]
    pub post_bundle_wait_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenConfig {
    #[serde(default = "default_token_name")]
    pub name: String,

    #[serde(default = "default_token_symbol")]
    pub symbol: String,

    #[serde(default)]
    pub description: String,

    /// Path to the token image
    #[serde(default = "default_image_path")]
    pub image_path: String,

    #[serde(default)]
    pub twitter: Option<String>,

    #[serde(default)]
    pub telegram: Option<String>,

    #[serde(default)]
    pub website: Option<String>,

    #[serde(default = "default_decimals")]
    pub decimals: u8,

    /// Total supply in raw units
    #[serde(default = "default_supply")]
    pub supply: u64,

    /// Raw units sold on the curve
    #[serde(default = "default_total_base_sell")]
    pub total_base_sell: u64,

    /// Lamports raised before migration
    #[serde(default = "default_fund_raising")]
    pub total_quote_fund_raising: u64,

    /// 0 = AMM, 1 = CPMM
    #[serde(default)]
    pub migrate_type: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchpadConfig {
    #[serde(default = "default_launchpad_program")]
    pub program_id: String,

    #[serde(default = "default_platform_config")]
    pub platform_config: String,

    #[serde(default = "default_metadata_program")]
    pub metadata_program: String,

    /// Curve type used in the global config seed
    #[serde(default)]
    pub curve_type: u8,

    /// Global config index
    #[serde(default)]
    pub config_index: u16,

    #[serde(default = "default_share_fee_rate")]
    pub share_fee_rate: u64,

    #[serde(default = "default_min_amount_out")]
    pub min_amount_out: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Attempts per create/extend operation, first try included
    #[serde(default = "default_registry_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_registry_retry_delay")]
    pub retry_delay_ms: u64,

    /// Wait after the registry is created
    #[serde(default = "default_create_wait")]
    pub create_wait_secs: u64,

    /// Wait after each address class
    #[serde(default = "default_class_wait")]
    pub class_wait_secs: u64,

    #[serde(default = "default_addresses_per_extend")]
    pub max_addresses_per_extend: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JitoConfig {
    #[serde(default = "default_block_engine")]
    pub block_engine_url: String,

    /// Tip in SOL
    #[serde(default = "default_tip")]
    pub tip_sol: f64,

    #[serde(default = "default_tip_accounts")]
    pub tip_accounts: Vec<String>,

    /// How long to wait for the bundle to land
    #[serde(default = "default_landing_timeout")]
    pub landing_timeout_secs: u64,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatorConfig {
    #[serde(default = "default_aggregator_url")]
    pub base_url: String,

    #[serde(default = "default_slippage")]
    pub slippage_bps: u16,

    #[serde(default = "default_priority_fee")]
    pub priority_fee_lamports: u64,

    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataConfig {
    #[serde(default = "default_image_endpoint")]
    pub image_endpoint: String,

    #[serde(default = "default_metadata_endpoint")]
    pub metadata_endpoint: String,

    #[serde(default = "default_created_on")]
    pub created_on: String,

    #[serde(default = "default_platform_id")]
    pub platform_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepConfig {
    #[serde(default = "default_sell_attempts")]
    pub sell_attempts: u32,

    /// Delay between sell attempts
    #[serde(default = "default_sell_retry_delay")]
    pub sell_retry_delay_ms: u64,

    /// Wait after the sell loop before re-reading the balance
    #[serde(default = "default_settle")]
    pub settle_ms: u64,

    /// Delay before each wallet
    #[serde(default = "default_stagger")]
    pub stagger_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetConfig {
    #[serde(default = "default_distribution_budget")]
    pub distribution: ComputeBudget,

    #[serde(default = "default_registry_budget")]
    pub registry: ComputeBudget,

    #[serde(default = "default_creation_budget")]
    pub creation: ComputeBudget,

    #[serde(default = "default_batch_budget")]
    pub buy_batch: ComputeBudget,

    #[serde(default = "default_creator_buy_budget")]
    pub creator_buy: ComputeBudget,

    #[serde(default = "default_sweep_budget")]
    pub sweep: ComputeBudget,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeBotConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Directory the tool runs in
    #[serde(default = "default_volume_dir")]
    pub working_dir: String,

    /// Env file rewritten with the new mint, relative to `working_dir`
    #[serde(default = "default_volume_env")]
    pub env_file: String,

    #[serde(default = "default_volume_program")]
    pub program: String,

    #[serde(default = "default_volume_args")]
    pub args: Vec<String>,

    /// Arguments for the tool's own gather command
    #[serde(default = "default_volume_gather_args")]
    pub gather_args: Vec<String>,

    /// Forced termination after this many seconds
    #[serde(default = "default_volume_lifetime")]
    pub lifetime_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding the persisted key files
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

// Default value functions
fn default_rpc_url() -> String { "https://api.mainnet-beta.solana.com".to_string() }
fn default_rpc_timeout() -> u64 { 30 }
fn default_max_retries() -> u32 { 3 }
fn default_treasury_env() -> String { "PRIVATE_KEY".to_string() }
fn default_creator_env() -> String { "CREATION_KEY".to_string() }
fn default_extra_wallet_env() -> String { "BUYER_WALLET".to_string() }
fn default_wallet_count() -> usize { 10 }
fn default_swap_amount() -> f64 { 0.01 }
fn default_margin_min() -> f64 { 0.01 }
fn default_margin_max() -> f64 { 0.014 }
fn default_overhead() -> f64 { 0.05 }
fn default_creator_buy() -> f64 { 0.0151 }
fn default_wallets_per_batch() -> usize { MAX_WALLETS_PER_BATCH }
fn default_vanity_attempts() -> u64 { 50_000_000 }
fn default_post_bundle_wait() -> u64 { 10 }
fn default_token_name() -> String { "Launch Token".to_string() }
fn default_token_symbol() -> String { "LAUNCH".to_string() }
fn default_image_path() -> String { "image.png".to_string() }
fn default_decimals() -> u8 { 6 }
fn default_supply() -> u64 { 1_000_000_000_000_000 }
fn default_total_base_sell() -> u64 { 793_100_000_000_000 }
fn default_fund_raising() -> u64 { 85_000_000_000 }
fn default_launchpad_program() -> String { "LanMV9sAd7wArD4vJFi2qDdfnVhFxYSUg6eADduJ3uj".to_string() }
fn default_platform_config() -> String { "FfYek5vEz23cMkWsdJwG2oa6EphsvXSHrGpdALN4g6W1".to_string() }
fn default_metadata_program() -> String { "metaqbxxUerdq28cj1RbAWkYQm3ybzjb6a8bt518x1s".to_string() }
fn default_share_fee_rate() -> u64 { 10_000 }
fn default_min_amount_out() -> u64 { 1 }
fn default_registry_attempts() -> u32 { 6 }
fn default_registry_retry_delay() -> u64 { 1_000 }
fn default_create_wait() -> u64 { 15 }
fn default_class_wait() -> u64 { 10 }
fn default_addresses_per_extend() -> usize { 30 }
fn default_block_engine() -> String { "https://mainnet.block-engine.jito.wtf/api/v1/bundles".to_string() }
fn default_tip() -> f64 { 0.001 }
fn default_tip_accounts() -> Vec<String> { DEFAULT_TIP_ACCOUNTS.iter().map(|s| s.to_string()).collect() }
fn default_landing_timeout() -> u64 { 60 }
fn default_poll_interval() -> u64 { 2_000 }
fn default_aggregator_url() -> String { "https://quote-api.jup.ag/v6".to_string() }
fn default_slippage() -> u16 { 100 }
fn default_priority_fee() -> u64 { 600_000 }
fn default_http_timeout() -> u64 { 15 }
fn default_image_endpoint() -> String { "https://storage.letsbonk.fun/upload/img".to_string() }
fn default_metadata_endpoint() -> String { "https://storage.letsbonk.fun/upload/meta".to_string() }
fn default_created_on() -> String { "https://bonk.fun".to_string() }
fn default_platform_id() -> String { "platformId".to_string() }
fn default_sell_attempts() -> u32 { 10 }
fn default_sell_retry_delay() -> u64 { 1_000 }
fn default_settle() -> u64 { 1_000 }
fn default_stagger() -> u64 { 50 }
fn default_distribution_budget() -> ComputeBudget { ComputeBudget::new(1_000_000, 250_000) }
fn default_registry_budget() -> ComputeBudget { ComputeBudget::new(50_000, 500_000) }
fn default_creation_budget() -> ComputeBudget { ComputeBudget::new(1_200_000, 100_000) }
fn default_batch_budget() -> ComputeBudget { ComputeBudget::new(1_000_000, 200_000) }
fn default_creator_buy_budget() -> ComputeBudget { ComputeBudget::new(1_000_000, 250_000) }
fn default_sweep_budget() -> ComputeBudget { ComputeBudget::new(350_000, 220_000) }
fn default_true() -> bool { true }
fn default_volume_dir() -> String { "../raydium-volume-bot-latest".to_string() }
fn default_volume_env() -> String { ".env".to_string() }
fn default_volume_program() -> String { "npx".to_string() }
fn default_volume_args() -> Vec<String> { vec!["ts-node".to_string(), "index.ts".to_string()] }
fn default_volume_gather_args() -> Vec<String> { vec!["ts-node".to_string(), "gather.ts".to_string()] }
fn default_volume_lifetime() -> u64 { 600 }
fn default_data_dir() -> String { "data".to_string() }

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            url: default_rpc_url(),
            timeout_secs: default_rpc_timeout(),
            max_retries: default_max_retries(),
        }
    }
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            treasury_env: default_treasury_env(),
            creator_env: default_creator_env(),
            extra_wallet_env: default_extra_wallet_env(),
        }
    }
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            wallet_count: default_wallet_count(),
            swap_amount_sol: default_swap_amount(),
            margin_min_sol: default_margin_min(),
            margin_max_sol: default_margin_max(),
            overhead_sol: default_overhead(),
            creator_buy_sol: default_creator_buy(),
            wallets_per_batch: default_wallets_per_batch(),
            vanity_suffix: None,
            vanity_max_attempts: default_vanity_attempts(),
            post_bundle_wait_secs: default_post_bundle_wait(),
        }
    }
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            name: default_token_name(),
            symbol: default_token_symbol(),
            description: String::new(),
            image_path: default_image_path(),
            twitter: None,
            telegram: None,
            website: None,
            decimals: default_decimals(),
            supply: default_supply(),
            total_base_sell: default_total_base_sell(),
            total_quote_fund_raising: default_fund_raising(),
            migrate_type: 0,
        }
    }
}

impl Default for LaunchpadConfig {
    fn default() -> Self {
        Self {
            program_id: default_launchpad_program(),
            platform_config: default_platform_config(),
            metadata_program: default_metadata_program(),
            curve_type: 0,
            config_index: 0,
            share_fee_rate: default_share_fee_rate(),
            min_amount_out: default_min_amount_out(),
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_registry_attempts(),
            retry_delay_ms: default_registry_retry_delay(),
            create_wait_secs: default_create_wait(),
            class_wait_secs: default_class_wait(),
            max_addresses_per_extend: default_addresses_per_extend(),
        }
    }
}

impl Default for JitoConfig {
    fn default() -> Self {
        Self {
            block_engine_url: default_block_engine(),
            tip_sol: default_tip(),
            tip_accounts: default_tip_accounts(),
            landing_timeout_secs: default_landing_timeout(),
            poll_interval_ms: default_poll_interval(),
        }
    }
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            base_url: default_aggregator_url(),
            slippage_bps: default_slippage(),
            priority_fee_lamports: default_priority_fee(),
            timeout_secs: default_http_timeout(),
        }
    }
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            image_endpoint: default_image_endpoint(),
            metadata_endpoint: default_metadata_endpoint(),
            created_on: default_created_on(),
            platform_id: default_platform_id(),
        }
    }
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            sell_attempts: default_sell_attempts(),
            sell_retry_delay_ms: default_sell_retry_delay(),
            settle_ms: default_settle(),
            stagger_ms: default_stagger(),
        }
    }
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            distribution: default_distribution_budget(),
            registry: default_registry_budget(),
            creation: default_creation_budget(),
            buy_batch: default_batch_budget(),
            creator_buy: default_creator_buy_budget(),
            sweep: default_sweep_budget(),
        }
    }
}

impl Default for VolumeBotConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            working_dir: default_volume_dir(),
            env_file: default_volume_env(),
            program: default_volume_program(),
            args: default_volume_args(),
            gather_args: default_volume_gather_args(),
            lifetime_secs: default_volume_lifetime(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl Config {
    /// Load configuration from TOML file
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration after pulling `.env` into the process environment
    pub fn from_file_with_env(path: &str) -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_file(path)
    }

    /// Reject values the orchestrator cannot work with
    pub fn validate(&self) -> LaunchResult<()> {
        let launch = &self.launch;
        if launch.wallet_count == 0 {
            return Err(config_err("launch.wallet_count must be at least 1"));
        }
        if launch.wallets_per_batch == 0 || launch.wallets_per_batch > MAX_WALLETS_PER_BATCH {
            return Err(config_err(format!(
                "launch.wallets_per_batch must be in 1..={}",
                MAX_WALLETS_PER_BATCH
            )));
        }
        let batches = launch.wallet_count.div_ceil(launch.wallets_per_batch);
        if batches + 2 > MAX_BUNDLE_TRANSACTIONS {
            return Err(config_err(format!(
                "{} wallets in batches of {} plus creation and creator buy exceed {} bundle transactions",
                launch.wallet_count, launch.wallets_per_batch, MAX_BUNDLE_TRANSACTIONS
            )));
        }
        if launch.swap_amount_sol <= 0.0 {
            return Err(config_err("launch.swap_amount_sol must be positive"));
        }
        if launch.margin_min_sol < 0.0 || launch.margin_max_sol <= launch.margin_min_sol {
            return Err(config_err(
                "launch.margin_min_sol must be >= 0 and below launch.margin_max_sol",
            ));
        }
        if self.registry.max_attempts == 0 {
            return Err(config_err("registry.max_attempts must be at least 1"));
        }
        if self.registry.max_addresses_per_extend == 0 {
            return Err(config_err("registry.max_addresses_per_extend must be at least 1"));
        }
        if self.sweep.sell_attempts == 0 {
            return Err(config_err("sweep.sell_attempts must be at least 1"));
        }
        if self.jito.tip_accounts.is_empty() {
            return Err(config_err("jito.tip_accounts must not be empty"));
        }
        self.tip_accounts()?;
        parse_pubkey("launchpad.program_id", &self.launchpad.program_id)?;
        parse_pubkey("launchpad.platform_config", &self.launchpad.platform_config)?;
        parse_pubkey("launchpad.metadata_program", &self.launchpad.metadata_program)?;
        if self.token.total_base_sell > self.token.supply {
            return Err(config_err("token.total_base_sell exceeds token.supply"));
        }
        Ok(())
    }

    pub fn tip_accounts(&self) -> LaunchResult<Vec<Pubkey>> {
        self.jito
            .tip_accounts
            .iter()
            .map(|s| parse_pubkey("jito.tip_accounts", s))
            .collect()
    }

    pub fn swap_lamports(&self) -> u64 {
        sol_to_lamports(self.launch.swap_amount_sol)
    }

    pub fn creator_buy_lamports(&self) -> u64 {
        sol_to_lamports(self.launch.creator_buy_sol)
    }

    pub fn tip_lamports(&self) -> u64 {
        sol_to_lamports(self.jito.tip_sol)
    }
}

/// Parse a base58 address from a config field
pub fn parse_pubkey(field: &str, value: &str) -> LaunchResult<Pubkey> {
    Pubkey::from_str(value.trim())
        .map_err(|e| config_err(format!("{}: invalid address '{}': {}", field, value, e)))
}

fn config_err(msg: impl Into<String>) -> LaunchError {
    LaunchError::Configuration(msg.into())
}
