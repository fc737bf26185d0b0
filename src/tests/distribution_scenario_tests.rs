//! Ten-wallet distribution and batching

use std::sync::Arc;

use solana_sdk::native_token::{sol_to_lamports, LAMPORTS_PER_SOL};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signer};

use super::test_helpers::{fast_config, seeded_rng};
use crate::errors::LaunchError;
use crate::launch::composer::{ComposerSettings, INSTRUCTIONS_PER_WALLET};
use crate::launch::distribution::DistributionParams;
use crate::launch::{CapitalDistributor, Composer, LegacyExecutor};
use crate::launchpad::LaunchpadProgram;
use crate::persistence::KeyFile;
use crate::test_utils::{MemoryKeyStore, MockLedger};

fn scenario_params() -> DistributionParams {
    DistributionParams {
        swap_lamports: sol_to_lamports(0.01),
        margin_min: sol_to_lamports(0.001),
        margin_max: sol_to_lamports(0.005),
        overhead_lamports: sol_to_lamports(0.05),
    }
}

fn distributor(ledger: Arc<MockLedger>, store: Arc<MemoryKeyStore>) -> CapitalDistributor {
    let config = fast_config(std::env::temp_dir().as_path());
    CapitalDistributor::new(
        Arc::new(LegacyExecutor::new(ledger, 1)),
        store,
        config.budgets.distribution,
    )
}

#[tokio::test]
async fn test_ten_wallets_funded_in_band_and_packed_into_two_batches() {
    let ledger = Arc::new(MockLedger::new());
    let store = Arc::new(MemoryKeyStore::default());
    let treasury = Keypair::new();
    ledger.set_balance(&treasury.pubkey(), 2 * LAMPORTS_PER_SOL);

    let distribution = distributor(ledger.clone(), store.clone())
        .distribute(&treasury, 10, &scenario_params(), &mut seeded_rng(10))
        .await
        .unwrap();

    let total = distribution.plan.total_transfer();
    assert!(total >= 10 * 11_000_000, "total {total} below band");
    assert!(total <= 10 * 15_000_000, "total {total} above band");
    assert_eq!(distribution.plan.required_balance(), total + 50_000_000);
    assert_eq!(ledger.send_attempts(), 1);
    assert_eq!(store.entries(KeyFile::Wallets).len(), 20);

    // Every buyer holds exactly its leg and intermediaries end empty
    for leg in &distribution.plan.legs {
        assert_eq!(ledger.balance(&leg.buyer), leg.lamports);
        assert_eq!(ledger.balance(&leg.intermediary), 0);
    }

    let config = fast_config(std::env::temp_dir().as_path());
    let composer = Composer::new(
        ledger.clone(),
        LaunchpadProgram::from_config(&config.launchpad).unwrap(),
        ComposerSettings::from_config(&config),
    );
    let batches = composer
        .plan_batches(&distribution.accounts.buyer_pubkeys(), &Pubkey::new_unique())
        .unwrap();
    assert_eq!(batches.len(), 2);
    for batch in &batches {
        assert_eq!(batch.wallet_count(), 5);
        assert_eq!(batch.instructions.len(), INSTRUCTIONS_PER_WALLET * 5 + 2);
    }
}

#[tokio::test]
async fn test_short_treasury_never_submits() {
    let ledger = Arc::new(MockLedger::new());
    let store = Arc::new(MemoryKeyStore::default());
    let treasury = Keypair::new();
    ledger.set_balance(&treasury.pubkey(), 100_000_000);

    let err = distributor(ledger.clone(), store.clone())
        .distribute(&treasury, 10, &scenario_params(), &mut seeded_rng(10))
        .await
        .unwrap_err();

    match err {
        LaunchError::InsufficientFunds {
            available, required, ..
        } => {
            assert_eq!(available, 100_000_000);
            assert!(required > available);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(ledger.send_attempts(), 0);
    assert!(store.entries(KeyFile::Wallets).is_empty());
}
