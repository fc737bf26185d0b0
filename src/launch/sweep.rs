//! Liquidation and recovery sweep
//!
//! Wallets are processed one at a time with a short stagger. For every token
//! account: sell any balance through the aggregator (bounded attempts), let
//! the ledger settle, re-read, then close. Accounts that vanish between
//! observation and action are skipped. A wallet that fails is logged and
//! counted; the sweep always moves on to the next one.

use solana_sdk::{
    instruction::Instruction,
    pubkey::Pubkey,
    signature::{Keypair, Signer},
    system_instruction,
};
use spl_associated_token_account::{
    get_associated_token_address, instruction::create_associated_token_account_idempotent,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::{LegacyExecutor, SwapAggregator};
use crate::config::SweepConfig;
use crate::errors::{LaunchError, LaunchResult};
use crate::metrics::metrics;
use crate::retry::{retry_with_backoff, RetryConfig};
use crate::types::{ComputeBudget, SweepReport, WalletTokenPosition};

/// Where swept value goes and who pays for the sweep
#[derive(Clone, Copy)]
pub enum SweepMode<'a> {
    /// Treasury pays fees and receives residual tokens, rent and lamports
    Gather { treasury: &'a Keypair },
    /// The wallet pays its own fees; only emptied accounts are closed
    SellOnly,
}

impl SweepMode<'_> {
    fn label(&self) -> &'static str {
        match self {
            SweepMode::Gather { .. } => "gather",
            SweepMode::SellOnly => "sell_only",
        }
    }
}

impl std::fmt::Debug for SweepMode<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SweepMode::Gather { treasury } => f
                .debug_struct("Gather")
                .field("treasury", &treasury.pubkey())
                .finish(),
            SweepMode::SellOnly => f.write_str("SellOnly"),
        }
    }
}

pub struct RecoverySweep {
    executor: Arc<LegacyExecutor>,
    aggregator: Arc<dyn SwapAggregator>,
    config: SweepConfig,
    budget: ComputeBudget,
}

impl RecoverySweep {
    pub fn new(
        executor: Arc<LegacyExecutor>,
        aggregator: Arc<dyn SwapAggregator>,
        config: SweepConfig,
        budget: ComputeBudget,
    ) -> Self {
        Self {
            executor,
            aggregator,
            config,
            budget,
        }
    }

    /// Sweep every wallet in order; never fails as a whole
    pub async fn sweep_wallets(&self, wallets: &[Keypair], mode: SweepMode<'_>) -> SweepReport {
        let mut report = SweepReport::default();
        for wallet in wallets {
            sleep(Duration::from_millis(self.config.stagger_ms)).await;
            report.wallets_processed += 1;

            match self.sweep_wallet(wallet, mode).await {
                Ok(wallet_report) => {
                    metrics().wallets_swept.inc();
                    report.merge(&wallet_report);
                }
                Err(e) => {
                    metrics().wallets_failed.inc();
                    report.wallets_failed += 1;
                    warn!(
                        wallet = %wallet.pubkey(),
                        mode = mode.label(),
                        error = %e,
                        category = e.category(),
                        "Wallet sweep failed, continuing"
                    );
                }
            }
        }
        info!(
            mode = mode.label(),
            processed = report.wallets_processed,
            failed = report.wallets_failed,
            swaps = report.swaps_landed,
            closed = report.accounts_closed,
            lamports = report.lamports_forwarded,
            "Sweep finished"
        );
        report
    }

    /// Liquidate and close one wallet's token accounts
    pub async fn sweep_wallet(&self, wallet: &Keypair, mode: SweepMode<'_>) -> LaunchResult<SweepReport> {
        let rpc = self.executor.rpc();
        let positions = rpc.get_token_accounts_by_owner(&wallet.pubkey()).await?;
        let mut report = SweepReport::default();
        let mut instructions = Vec::new();
        let mut closed = 0;

        for position in &positions {
            if !position.is_wrapped_native() && !position.is_empty() {
                if self.sell_position(wallet, position).await {
                    report.swaps_landed += 1;
                }
                sleep(Duration::from_millis(self.config.settle_ms)).await;
            }

            let residual = match rpc.get_token_account_balance(&position.token_account).await {
                Ok(balance) => balance,
                Err(e) if e.is_not_found() => {
                    debug!(
                        account = %LaunchError::vanished(position.token_account),
                        "Token account already closed, skipping"
                    );
                    continue;
                }
                Err(e) => {
                    warn!(
                        wallet = %wallet.pubkey(),
                        account = %position.token_account,
                        error = %e,
                        "Balance re-read failed, leaving account open"
                    );
                    continue;
                }
            };

            let account_ixs = close_instructions(wallet, position, residual.amount, residual.decimals, mode)?;
            if !account_ixs.is_empty() {
                closed += 1;
                instructions.extend(account_ixs);
            }
        }

        if let SweepMode::Gather { treasury } = mode {
            let lamports = rpc.get_balance(&wallet.pubkey()).await?;
            if lamports > 0 {
                instructions.push(system_instruction::transfer(
                    &wallet.pubkey(),
                    &treasury.pubkey(),
                    lamports,
                ));
                report.lamports_forwarded = lamports;
            }
        }

        if instructions.is_empty() {
            debug!(wallet = %wallet.pubkey(), "Nothing to sweep");
            return Ok(report);
        }

        let mut ixs = self.budget.instructions().to_vec();
        ixs.extend(instructions);
        let signature = match mode {
            SweepMode::Gather { treasury } => {
                self.executor
                    .send_instructions(&ixs, treasury, &[wallet], &[])
                    .await?
            }
            SweepMode::SellOnly => self.executor.send_instructions(&ixs, wallet, &[], &[]).await?,
        };

        report.accounts_closed = closed;
        info!(
            wallet = %wallet.pubkey(),
            signature = %signature,
            closed,
            lamports = report.lamports_forwarded,
            "Wallet swept"
        );
        Ok(report)
    }

    /// Bounded sell loop; true once a swap landed
    ///
    /// Exhaustion is logged, never returned.
    async fn sell_position(&self, wallet: &Keypair, position: &WalletTokenPosition) -> bool {
        let policy = RetryConfig::fixed(
            self.config.sell_attempts,
            Duration::from_millis(self.config.sell_retry_delay_ms),
        );
        let rpc = self.executor.rpc();

        let result = retry_with_backoff("sell", &policy, |attempt| async move {
            metrics().sell_attempts.inc();
            let amount = if attempt == 0 {
                position.amount
            } else {
                match rpc.get_token_account_balance(&position.token_account).await {
                    Ok(balance) => balance.amount,
                    Err(e) if e.is_not_found() => 0,
                    Err(e) => return Err(LaunchError::from(e)),
                }
            };
            if amount == 0 {
                return Ok::<_, LaunchError>(false);
            }

            let tx = self
                .aggregator
                .sell_transaction(wallet, &position.mint, amount)
                .await?;
            let signature = self.executor.execute(&tx).await?;
            info!(
                wallet = %wallet.pubkey(),
                mint = %position.mint,
                amount,
                signature = %signature,
                "Sold residual tokens"
            );
            Ok(true)
        })
        .await;

        match result {
            Ok(landed) => landed,
            Err(exhausted) => {
                metrics().sell_failures.inc();
                warn!(
                    wallet = %wallet.pubkey(),
                    mint = %position.mint,
                    attempts = exhausted.attempts,
                    error = %exhausted.last_error,
                    "Giving up on selling, account left for the close step"
                );
                false
            }
        }
    }
}

/// Instructions settling one token account after the sell loop
///
/// Gather forwards any residual to the treasury's associated account and
/// closes to the treasury. SellOnly closes back to the wallet, and only
/// once the account holds nothing. Wrapped-native accounts always close.
pub fn close_instructions(
    wallet: &Keypair,
    position: &WalletTokenPosition,
    residual: u64,
    decimals: u8,
    mode: SweepMode<'_>,
) -> LaunchResult<Vec<Instruction>> {
    let owner = wallet.pubkey();
    let wrapped = position.is_wrapped_native();
    let mut instructions = Vec::new();

    let destination = match mode {
        SweepMode::Gather { treasury } => {
            let treasury_key = treasury.pubkey();
            if residual > 0 && !wrapped {
                let treasury_account = get_associated_token_address(&treasury_key, &position.mint);
                instructions.push(create_associated_token_account_idempotent(
                    &treasury_key,
                    &treasury_key,
                    &position.mint,
                    &spl_token::id(),
                ));
                instructions.push(
                    spl_token::instruction::transfer_checked(
                        &spl_token::id(),
                        &position.token_account,
                        &position.mint,
                        &treasury_account,
                        &owner,
                        &[],
                        residual,
                        decimals,
                    )
                    .map_err(|e| LaunchError::instruction_failed("spl-token", e.to_string()))?,
                );
            }
            treasury_key
        }
        SweepMode::SellOnly => {
            if residual > 0 && !wrapped {
                return Ok(instructions);
            }
            owner
        }
    };

    instructions.push(
        spl_token::instruction::close_account(
            &spl_token::id(),
            &position.token_account,
            &destination,
            &owner,
            &[],
        )
        .map_err(|e| LaunchError::instruction_failed("spl-token", e.to_string()))?,
    );
    Ok(instructions)
}
