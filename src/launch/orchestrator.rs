//! Launch pipeline
//!
//! Every collaborator lives in one [`LaunchContext`] built at process start,
//! so tests swap any of them for in-memory doubles. The pipeline order is
//! fixed: funds checks, mint and metadata, distribution, registry,
//! composition, simulation, bundle, creator sweep, volume tool handoff.

use rand::rngs::StdRng;
use rand::{CryptoRng, RngCore, SeedableRng};
use solana_sdk::{
    native_token::sol_to_lamports,
    signature::{Keypair, Signer},
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::bundle::{assemble_bundle, select_tip_account, tip_instruction, Bundler, LaunchBundle};
use super::composer::{Composer, ComposerSettings};
use super::creation::{build_creation_transaction, TokenLaunch};
use super::distribution::{CapitalDistributor, DistributionParams};
use super::handoff::{ExternalProcess, ProcessHandle, VolumeBotHandoff};
use super::metadata::{publish_metadata, HttpMetadataUploader, MetadataUploader};
use super::registry::{RegistryBuilder, RegistryPlan};
use super::sweep::{RecoverySweep, SweepMode};
use super::{JitoBundler, JupiterAggregator, LegacyExecutor, SwapAggregator};
use crate::config::Config;
use crate::errors::{LaunchError, LaunchResult};
use crate::launchpad::LaunchpadProgram;
use crate::observability::TraceContext;
use crate::persistence::{JsonKeyStore, KeyFile, KeyStore};
use crate::rpc_manager::{LedgerRpc, SolanaRpc};
use crate::structured_logging::LaunchLogger;
use crate::types::{LaunchReport, SweepReport};
use crate::wallet::{decode_base58_keypair, grind_vanity, keypair_from_rng, secret_base58};

/// Everything the pipeline talks to
pub struct LaunchContext {
    pub config: Config,
    pub rpc: Arc<dyn LedgerRpc>,
    pub executor: Arc<LegacyExecutor>,
    pub bundler: Arc<dyn Bundler>,
    pub aggregator: Arc<dyn SwapAggregator>,
    pub uploader: Arc<dyn MetadataUploader>,
    pub store: Arc<dyn KeyStore>,
    pub processes: Arc<dyn ExternalProcess>,
    pub launchpad: LaunchpadProgram,
}

impl LaunchContext {
    pub fn new(
        config: Config,
        rpc: Arc<dyn LedgerRpc>,
        bundler: Arc<dyn Bundler>,
        aggregator: Arc<dyn SwapAggregator>,
        uploader: Arc<dyn MetadataUploader>,
        store: Arc<dyn KeyStore>,
        processes: Arc<dyn ExternalProcess>,
    ) -> LaunchResult<Self> {
        let launchpad = LaunchpadProgram::from_config(&config.launchpad)?;
        let executor = Arc::new(LegacyExecutor::new(rpc.clone(), config.rpc.max_retries));
        Ok(Self {
            config,
            rpc,
            executor,
            bundler,
            aggregator,
            uploader,
            store,
            processes,
            launchpad,
        })
    }

    /// Context wired to the real network services
    ///
    /// `processes` is passed in so the caller can keep the runner and wait
    /// on the volume tool after the pipeline returns.
    pub fn production(config: Config, processes: Arc<dyn ExternalProcess>) -> LaunchResult<Self> {
        let timeout = Duration::from_secs(config.rpc.timeout_secs);
        let rpc = Arc::new(SolanaRpc::new(&config.rpc.url, timeout));
        let bundler = Arc::new(JitoBundler::new(&config.jito, timeout)?);
        let aggregator = Arc::new(JupiterAggregator::new(&config.aggregator)?);
        let uploader = Arc::new(HttpMetadataUploader::new(&config.metadata, timeout)?);
        let store = Arc::new(JsonKeyStore::new(&config.storage.data_dir));
        Self::new(config, rpc, bundler, aggregator, uploader, store, processes)
    }

    fn sweeper(&self) -> RecoverySweep {
        RecoverySweep::new(
            self.executor.clone(),
            self.aggregator.clone(),
            self.config.sweep.clone(),
            self.config.budgets.sweep,
        )
    }

    fn handoff(&self) -> VolumeBotHandoff {
        VolumeBotHandoff::new(self.processes.clone(), self.config.volume_bot.clone())
    }
}

pub struct LaunchOrchestrator {
    ctx: LaunchContext,
    logger: LaunchLogger,
    trace: TraceContext,
}

impl LaunchOrchestrator {
    pub fn new(ctx: LaunchContext) -> Self {
        Self {
            ctx,
            logger: LaunchLogger::fresh(),
            trace: TraceContext::new("launch"),
        }
    }

    pub fn context(&self) -> &LaunchContext {
        &self.ctx
    }

    pub fn logger(&self) -> &LaunchLogger {
        &self.logger
    }

    /// Full launch: fund buyers, build the registry, bundle creation and buys
    pub async fn launch<R: RngCore + CryptoRng>(
        &self,
        treasury: &Keypair,
        creator: &Keypair,
        rng: &mut R,
    ) -> LaunchResult<LaunchReport> {
        let ctx = &self.ctx;
        let config = &ctx.config;
        config.validate()?;
        if !ctx.bundler.is_available() {
            return Err(LaunchError::bundle_rejected(
                "block engine is not available; nothing was sent",
                true,
            ));
        }

        let composer = Composer::new(
            ctx.rpc.clone(),
            ctx.launchpad.clone(),
            ComposerSettings::from_config(config),
        );
        // Before distribution spends anything
        composer
            .check_creator_funds(&creator.pubkey(), config.creator_buy_lamports())
            .await?;

        let mint = self.step("mint", self.mint_keypair(rng)).await?;
        let mint_secret = secret_base58(&mint);
        ctx.store.append(KeyFile::MintSecret, &[mint_secret.as_str()]).await?;
        ctx.store
            .append(KeyFile::MintAddress, &[mint.pubkey().to_string().as_str()])
            .await?;

        let uri = self
            .step(
                "metadata",
                publish_metadata(ctx.uploader.as_ref(), &config.token, &config.metadata),
            )
            .await?;

        let distributor = CapitalDistributor::new(
            ctx.executor.clone(),
            ctx.store.clone(),
            config.budgets.distribution,
        );
        let params = DistributionParams {
            swap_lamports: config.swap_lamports(),
            margin_min: sol_to_lamports(config.launch.margin_min_sol),
            margin_max: sol_to_lamports(config.launch.margin_max_sol),
            overhead_lamports: sol_to_lamports(config.launch.overhead_sol),
        };
        let distribution = self
            .step(
                "distribution",
                distributor.distribute(treasury, config.launch.wallet_count, &params, rng),
            )
            .await?;

        let plan = RegistryPlan::build(
            &distribution.accounts.buyer_pubkeys(),
            &mint.pubkey(),
            &treasury.pubkey(),
            &ctx.launchpad,
        );
        let builder = RegistryBuilder::new(
            ctx.executor.clone(),
            config.registry.clone(),
            config.budgets.registry,
        );
        let registry = self.step("registry", builder.build(treasury, &plan)).await?;
        ctx.store
            .append(KeyFile::Registry, &[registry.to_string().as_str()])
            .await?;
        let registry_account = ctx.rpc.get_address_lookup_table(&registry).await?;

        let blockhash = ctx.rpc.get_latest_blockhash().await?;
        let buys = self
            .step(
                "compose",
                composer.compose(
                    &distribution.accounts.buyers,
                    &mint.pubkey(),
                    &registry_account,
                    blockhash,
                    &self.logger,
                ),
            )
            .await?;
        let creator_buy = composer
            .creator_buy(
                creator,
                &mint.pubkey(),
                config.creator_buy_lamports(),
                &registry_account,
                blockhash,
            )
            .await?;

        let tip_account = select_tip_account(&config.tip_accounts()?, rng)?;
        let tip_lamports = config.tip_lamports();
        let creation = build_creation_transaction(
            &ctx.launchpad,
            creator,
            &mint,
            &TokenLaunch::from_config(&config.token, uri),
            &config.budgets.creation,
            Some(tip_instruction(&creator.pubkey(), &tip_account, tip_lamports)),
            blockhash,
        )?;

        let bundle = assemble_bundle(creation, buys.transactions, Some(creator_buy), tip_lamports)?;
        self.simulate(&bundle).await;
        let bundle_id = self.step("bundle", self.submit(&bundle)).await?;
        self.logger
            .bundle_submitted(&bundle_id, bundle.len(), bundle.tip_lamports());

        let report = LaunchReport {
            mint: mint.pubkey(),
            registry,
            distribution_signature: distribution.signature,
            bundle_id,
            wallets_bundled: buys.wallets_bundled,
            wallets_skipped: buys.wallets_skipped,
            lamports_distributed: distribution.plan.total_transfer(),
        };

        sleep(Duration::from_secs(config.launch.post_bundle_wait_secs)).await;
        let creator_sweep = ctx
            .sweeper()
            .sweep_wallets(std::slice::from_ref(creator), SweepMode::SellOnly)
            .await;
        info!(
            swaps = creator_sweep.swaps_landed,
            closed = creator_sweep.accounts_closed,
            "Creator position sold"
        );

        // The runner owns the tool's lifetime from here on
        if let Err(e) = ctx.handoff().run(&mint.pubkey()).await {
            self.logger.warn(&format!("volume tool handoff failed: {}", e));
        }

        info!(
            mint = %report.mint,
            bundle_id = %report.bundle_id,
            wallets = report.wallets_bundled,
            skipped = report.wallets_skipped,
            "Launch complete"
        );
        Ok(report)
    }

    /// Sweep every persisted wallet (plus `extra`) into the treasury
    pub async fn gather(&self, treasury: &Keypair, extra: Option<Keypair>) -> LaunchResult<SweepReport> {
        let mut wallets = Vec::new();
        for secret in self.ctx.store.load(KeyFile::Wallets).await? {
            match decode_base58_keypair(&secret) {
                Ok(kp) => wallets.push(kp),
                Err(e) => warn!(error = %e, "Skipping unreadable persisted wallet"),
            }
        }
        wallets.extend(extra);
        info!(wallets = wallets.len(), "Gathering from persisted wallets");

        let report = self
            .ctx
            .sweeper()
            .sweep_wallets(&wallets, SweepMode::Gather { treasury })
            .await;

        if let Err(e) = self.ctx.handoff().run_gather().await {
            self.logger.warn(&format!("volume tool gather failed: {}", e));
        }
        Ok(report)
    }

    /// Start the volume tool on the most recently launched mint
    pub async fn volume(&self) -> LaunchResult<Option<ProcessHandle>> {
        self.ctx.handoff().run_latest(self.ctx.store.as_ref()).await
    }

    /// Sell one wallet's positions without moving its lamports
    pub async fn sell(&self, wallet: &Keypair) -> SweepReport {
        self.ctx
            .sweeper()
            .sweep_wallets(std::slice::from_ref(wallet), SweepMode::SellOnly)
            .await
    }

    async fn step<T>(
        &self,
        name: &str,
        fut: impl std::future::Future<Output = LaunchResult<T>>,
    ) -> LaunchResult<T> {
        let started = Instant::now();
        self.logger.step_started(name);
        match fut.await {
            Ok(value) => {
                self.logger
                    .step_finished(name, started.elapsed().as_millis() as u64);
                Ok(value)
            }
            Err(e) => {
                self.logger.step_failed(name, &e.to_string());
                Err(e)
            }
        }
    }

    async fn mint_keypair<R: RngCore + CryptoRng>(&self, rng: &mut R) -> LaunchResult<Keypair> {
        let launch = &self.ctx.config.launch;
        let Some(suffix) = launch.vanity_suffix.clone().filter(|s| !s.is_empty()) else {
            return keypair_from_rng(rng);
        };

        let mut grind_rng = StdRng::from_rng(&mut *rng)
            .map_err(|e| LaunchError::Internal(format!("seeding vanity grinder: {}", e)))?;
        let max_attempts = launch.vanity_max_attempts;
        let ground = tokio::task::spawn_blocking(move || {
            grind_vanity(&suffix, max_attempts, &mut grind_rng)
        })
        .await
        .map_err(|e| LaunchError::Internal(format!("vanity grinder panicked: {}", e)))??;

        match ground {
            Some(kp) => {
                info!(mint = %kp.pubkey(), "Vanity mint found");
                Ok(kp)
            }
            None => {
                warn!(max_attempts, "No vanity mint found, using a random one");
                keypair_from_rng(rng)
            }
        }
    }

    /// Simulate every bundle transaction and log the ones that fail
    ///
    /// Buys depend on the pool the creation transaction makes, so failures
    /// here are expected for them and never stop the launch.
    async fn simulate(&self, bundle: &LaunchBundle) {
        for (index, tx) in bundle.transactions().iter().enumerate() {
            let size = bincode::serialized_size(tx).unwrap_or_default();
            match self.ctx.rpc.simulate_transaction(tx).await {
                Ok(None) => debug!(index, size, "Bundle transaction simulated"),
                Ok(Some(err)) => warn!(index, size, error = %err, "Bundle transaction simulation failed"),
                Err(e) => warn!(index, error = %e, "Bundle transaction could not be simulated"),
            }
        }
    }

    /// Submit, and on failure ask the ledger whether creation landed anyway
    async fn submit(&self, bundle: &LaunchBundle) -> LaunchResult<String> {
        let trace = self.trace.child_span("launch_bundle");
        let err = match self.ctx.bundler.submit_bundle(bundle, &trace).await {
            Ok(receipt) => return Ok(receipt.bundle_id),
            Err(e) => e,
        };

        let creation = bundle.creation_signature()?;
        match self.ctx.rpc.signature_landed(&creation).await {
            Ok(true) => {
                self.logger.warn(&format!(
                    "builder reported failure ({}) but creation {} landed; continuing",
                    err, creation
                ));
                Ok(creation.to_string())
            }
            Ok(false) => Err(LaunchError::bundle_rejected(err.to_string(), true)),
            Err(status_err) => Err(LaunchError::bundle_rejected(
                format!("{} (landing status unknown: {})", err, status_err),
                false,
            )),
        }
    }
}
