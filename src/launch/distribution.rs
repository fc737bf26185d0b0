//! Capital distribution: treasury -> intermediary -> buyer in one transaction
//!
//! Either every hop lands or none does. Secrets are persisted before the
//! transaction is submitted so a half-finished launch stays recoverable.

use rand::{CryptoRng, Rng, RngCore};
use solana_sdk::{
    instruction::Instruction,
    pubkey::Pubkey,
    signature::{Keypair, Signature, Signer},
    system_instruction,
};
use std::sync::Arc;
use tracing::info;

use super::LegacyExecutor;
use crate::errors::{LaunchError, LaunchResult};
use crate::metrics::metrics;
use crate::persistence::{KeyFile, KeyStore};
use crate::types::{ComputeBudget, DistributionPlan, FundingLeg};
use crate::wallet::AccountSet;

/// Lamport amounts a distribution is planned with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DistributionParams {
    pub swap_lamports: u64,
    /// Per-buyer margin drawn from [margin_min, margin_max)
    pub margin_min: u64,
    pub margin_max: u64,
    pub overhead_lamports: u64,
}

/// Plan one leg per intermediary/buyer pair, in index order
pub fn plan_distribution<R: Rng + ?Sized>(
    accounts: &AccountSet,
    params: &DistributionParams,
    rng: &mut R,
) -> DistributionPlan {
    let legs = accounts
        .intermediaries
        .iter()
        .zip(accounts.buyers.iter())
        .map(|(intermediary, buyer)| {
            let margin = if params.margin_max > params.margin_min {
                rng.gen_range(params.margin_min..params.margin_max)
            } else {
                params.margin_min
            };
            FundingLeg {
                intermediary: intermediary.pubkey(),
                buyer: buyer.pubkey(),
                lamports: params.swap_lamports + margin,
            }
        })
        .collect();

    DistributionPlan {
        legs,
        overhead_lamports: params.overhead_lamports,
    }
}

/// Compute budget, then two transfers per leg
pub fn distribution_instructions(
    treasury: &Pubkey,
    plan: &DistributionPlan,
    budget: &ComputeBudget,
) -> Vec<Instruction> {
    let mut instructions = Vec::with_capacity(2 + plan.len() * 2);
    instructions.extend(budget.instructions());
    for leg in &plan.legs {
        instructions.push(system_instruction::transfer(
            treasury,
            &leg.intermediary,
            leg.lamports,
        ));
        instructions.push(system_instruction::transfer(
            &leg.intermediary,
            &leg.buyer,
            leg.lamports,
        ));
    }
    instructions
}

/// A funded buyer set
#[derive(Debug)]
pub struct Distribution {
    pub accounts: AccountSet,
    pub plan: DistributionPlan,
    pub signature: Signature,
}

pub struct CapitalDistributor {
    executor: Arc<LegacyExecutor>,
    store: Arc<dyn KeyStore>,
    budget: ComputeBudget,
}

impl CapitalDistributor {
    pub fn new(executor: Arc<LegacyExecutor>, store: Arc<dyn KeyStore>, budget: ComputeBudget) -> Self {
        Self {
            executor,
            store,
            budget,
        }
    }

    /// Generate `count` buyers and fund them from `treasury`
    ///
    /// Fails with `InsufficientFunds` before anything is persisted or sent
    /// when the treasury cannot cover the plan.
    pub async fn distribute<R: RngCore + CryptoRng>(
        &self,
        treasury: &Keypair,
        count: usize,
        params: &DistributionParams,
        rng: &mut R,
    ) -> LaunchResult<Distribution> {
        let accounts = AccountSet::generate(count, rng)?;
        let plan = plan_distribution(&accounts, params, rng);

        let balance = self.executor.rpc().get_balance(&treasury.pubkey()).await?;
        let required = plan.required_balance();
        if balance < required {
            return Err(LaunchError::insufficient_funds(
                treasury.pubkey(),
                balance,
                required,
            ));
        }

        let secrets = accounts.secrets();
        let refs: Vec<&str> = secrets.iter().map(|s| s.as_str()).collect();
        self.store.append(KeyFile::Wallets, &refs).await?;

        let instructions = distribution_instructions(&treasury.pubkey(), &plan, &self.budget);
        let co_signers: Vec<&Keypair> = accounts.intermediaries.iter().collect();
        let signature = self
            .executor
            .send_instructions(&instructions, treasury, &co_signers, &[])
            .await?;

        metrics().lamports_distributed.inc_by(plan.total_transfer());
        info!(
            signature = %signature,
            wallets = plan.len(),
            lamports = plan.total_transfer(),
            "Distributed capital to buyer wallets"
        );

        Ok(Distribution {
            accounts,
            plan,
            signature,
        })
    }
}
