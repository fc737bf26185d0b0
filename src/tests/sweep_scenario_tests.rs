//! Recovery sweep behavior under vanished accounts, empty wallets and no route

use std::sync::Arc;

use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signer};

use super::test_helpers::position;
use crate::config::SweepConfig;
use crate::launch::{LegacyExecutor, RecoverySweep, SweepMode};
use crate::test_utils::{MockAggregator, MockLedger};
use crate::types::ComputeBudget;

fn sweeper(ledger: Arc<MockLedger>, aggregator: Arc<MockAggregator>) -> RecoverySweep {
    RecoverySweep::new(
        Arc::new(LegacyExecutor::new(ledger, 1)),
        aggregator,
        SweepConfig {
            sell_retry_delay_ms: 0,
            settle_ms: 0,
            stagger_ms: 0,
            ..SweepConfig::default()
        },
        ComputeBudget::new(350_000, 220_000),
    )
}

#[tokio::test]
async fn test_missing_wallet_accounts_do_not_stop_the_sweep() {
    let ledger = Arc::new(MockLedger::new());
    let aggregator = Arc::new(MockAggregator::new());
    let treasury = Keypair::new();
    let wallets: Vec<Keypair> = (0..3).map(|_| Keypair::new()).collect();
    let mint = Pubkey::new_unique();

    ledger.fail_owner_lookup(&wallets[0].pubkey());
    for wallet in &wallets[1..] {
        ledger.set_balance(&wallet.pubkey(), 1_000_000);
        ledger.add_token_account(position(&wallet.pubkey(), mint, 250));
    }

    let report = sweeper(ledger.clone(), aggregator.clone())
        .sweep_wallets(&wallets, SweepMode::Gather { treasury: &treasury })
        .await;

    assert_eq!(report.wallets_processed, 3);
    assert_eq!(report.wallets_failed, 1);
    assert_eq!(report.swaps_landed, 2);
    assert_eq!(report.lamports_forwarded, 2_000_000);
    assert_eq!(ledger.balance(&treasury.pubkey()), 2_000_000);
}

#[tokio::test]
async fn test_account_closed_during_sell_is_skipped() {
    let ledger = Arc::new(MockLedger::new());
    let aggregator = Arc::new(MockAggregator::new());
    let wallet = Keypair::new();
    let held = position(&wallet.pubkey(), Pubkey::new_unique(), 900);
    let empty = position(&wallet.pubkey(), Pubkey::new_unique(), 0);
    ledger.add_token_account(held.clone());
    ledger.add_token_account(empty);
    // The swap transaction closes the account it sold from
    ledger.close_on_next_send(&held.token_account);

    let report = sweeper(ledger.clone(), aggregator.clone())
        .sweep_wallet(&wallet, SweepMode::SellOnly)
        .await
        .unwrap();

    assert_eq!(report.swaps_landed, 1);
    // only the empty account is closed; the vanished one is left alone
    assert_eq!(report.accounts_closed, 1);
    assert_eq!(ledger.sent_transactions().len(), 2);
}

#[tokio::test]
async fn test_empty_wallets_never_swap_on_repeated_sweeps() {
    let ledger = Arc::new(MockLedger::new());
    let aggregator = Arc::new(MockAggregator::new());
    let wallets: Vec<Keypair> = (0..4).map(|_| Keypair::new()).collect();
    for wallet in &wallets {
        ledger.add_token_account(position(&wallet.pubkey(), Pubkey::new_unique(), 0));
    }
    let sweep = sweeper(ledger.clone(), aggregator.clone());

    for _ in 0..2 {
        let report = sweep.sweep_wallets(&wallets, SweepMode::SellOnly).await;
        assert_eq!(report.wallets_failed, 0);
        assert_eq!(report.swaps_landed, 0);
    }
    assert!(aggregator.calls().is_empty());
}

#[tokio::test]
async fn test_wallet_without_accounts_sends_nothing() {
    let ledger = Arc::new(MockLedger::new());
    let aggregator = Arc::new(MockAggregator::new());
    let wallet = Keypair::new();

    let report = sweeper(ledger.clone(), aggregator)
        .sweep_wallet(&wallet, SweepMode::SellOnly)
        .await
        .unwrap();

    assert_eq!(report, Default::default());
    assert_eq!(ledger.send_attempts(), 0);
}

#[tokio::test]
async fn test_no_route_is_bounded_then_residual_forwarded() {
    let ledger = Arc::new(MockLedger::new());
    let aggregator = Arc::new(MockAggregator::without_route());
    let treasury = Keypair::new();
    let wallet = Keypair::new();
    let mint = Pubkey::new_unique();
    ledger.add_token_account(position(&wallet.pubkey(), mint, 42));

    let report = sweeper(ledger.clone(), aggregator.clone())
        .sweep_wallet(&wallet, SweepMode::Gather { treasury: &treasury })
        .await
        .unwrap();

    assert_eq!(aggregator.calls().len(), SweepConfig::default().sell_attempts as usize);
    assert_eq!(report.swaps_landed, 0);
    assert_eq!(report.accounts_closed, 1);
    // fee payer is the treasury, the wallet co-signs
    let sent = ledger.sent_transactions();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].message.static_account_keys()[0], treasury.pubkey());
    assert_eq!(sent[0].signatures.len(), 2);
}

#[tokio::test]
async fn test_wrapped_native_is_never_sold() {
    let ledger = Arc::new(MockLedger::new());
    let aggregator = Arc::new(MockAggregator::new());
    let wallet = Keypair::new();
    ledger.add_token_account(position(
        &wallet.pubkey(),
        spl_token::native_mint::id(),
        3_000_000,
    ));

    let report = sweeper(ledger.clone(), aggregator.clone())
        .sweep_wallet(&wallet, SweepMode::SellOnly)
        .await
        .unwrap();

    assert!(aggregator.calls().is_empty());
    assert_eq!(report.accounts_closed, 1);
}
