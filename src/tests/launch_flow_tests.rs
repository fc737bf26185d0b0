//! End-to-end launch, gather and sell runs against the in-memory doubles

use std::time::Duration;

use solana_sdk::native_token::LAMPORTS_PER_SOL;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signer};

use super::test_helpers::{position, seeded_rng, Harness};
use crate::errors::LaunchError;
use crate::persistence::{KeyFile, KeyStore};
use crate::rpc_manager::RpcManagerError;
use crate::test_utils::{MockBundler, MockUploader};
use crate::wallet::secret_base58;

#[tokio::test]
async fn test_full_launch_submits_one_ordered_bundle() {
    let harness = Harness::new(MockBundler::new_success());
    let (treasury, creator) = harness.funded_signers();
    let mut rng = seeded_rng(7);

    let report = harness
        .orchestrator()
        .launch(&treasury, &creator, &mut rng)
        .await
        .unwrap();

    assert_eq!(report.wallets_bundled, 10);
    assert_eq!(report.wallets_skipped, 0);
    assert!(report.lamports_distributed >= 10 * 11_000_000);
    assert!(report.lamports_distributed < 10 * 15_000_000);

    // creation, two batches of five, creator buy
    let submissions = harness.bundler.submissions();
    assert_eq!(submissions.len(), 1);
    assert_eq!(submissions[0].len(), 4);
    // every bundle transaction is simulated before submission
    assert_eq!(harness.ledger.simulations(), 4);

    assert_eq!(harness.store.entries(KeyFile::Wallets).len(), 20);
    assert_eq!(
        harness.store.entries(KeyFile::MintAddress),
        vec![report.mint.to_string()]
    );
    assert_eq!(
        harness.store.entries(KeyFile::Registry),
        vec![report.registry.to_string()]
    );

    let documents = harness.uploader.documents();
    assert_eq!(documents.len(), 1);
    assert_eq!(documents[0].image, MockUploader::IMAGE_URI);

    let launched = harness.runner.launched();
    assert_eq!(launched.len(), 1);
    assert_eq!(
        launched[0].lifetime,
        Duration::from_secs(harness.config.volume_bot.lifetime_secs)
    );
    // the tool outlives the launch; the runner stops it
    assert!(harness.runner.terminated().is_empty());
    let env = std::fs::read_to_string(harness.workdir.path().join(".env")).unwrap();
    assert!(env.contains(&report.mint.to_string()));
}

#[tokio::test]
async fn test_failed_simulation_does_not_stop_the_bundle() {
    let harness = Harness::new(MockBundler::new_success());
    harness.ledger.fail_simulations("pool account does not exist");
    let (treasury, creator) = harness.funded_signers();

    harness
        .orchestrator()
        .launch(&treasury, &creator, &mut seeded_rng(11))
        .await
        .unwrap();

    assert_eq!(harness.ledger.simulations(), 4);
    assert_eq!(harness.bundler.submissions().len(), 1);
}

#[tokio::test]
async fn test_unavailable_block_engine_aborts_before_any_send() {
    let harness = Harness::new(MockBundler::unavailable());
    let (treasury, creator) = harness.funded_signers();

    let err = harness
        .orchestrator()
        .launch(&treasury, &creator, &mut seeded_rng(12))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        LaunchError::BundleRejected {
            safe_to_retry: true,
            ..
        }
    ));
    assert_eq!(harness.ledger.send_attempts(), 0);
    assert!(harness.store.entries(KeyFile::Wallets).is_empty());
}

#[tokio::test]
async fn test_volume_command_targets_latest_mint() {
    let harness = Harness::new(MockBundler::new_success());
    let (treasury, creator) = harness.funded_signers();
    let orchestrator = harness.orchestrator();
    let report = orchestrator
        .launch(&treasury, &creator, &mut seeded_rng(13))
        .await
        .unwrap();
    std::fs::remove_file(harness.workdir.path().join(".env")).unwrap();

    let handle = orchestrator.volume().await.unwrap();

    assert!(handle.is_some());
    assert_eq!(harness.runner.launched().len(), 2);
    let env = std::fs::read_to_string(harness.workdir.path().join(".env")).unwrap();
    assert_eq!(env, format!("TOKEN_MINT={}", report.mint));
}

#[tokio::test]
async fn test_same_seed_yields_same_mint() {
    let first = Harness::new(MockBundler::new_success());
    let second = Harness::new(MockBundler::new_success());
    let (t1, c1) = first.funded_signers();
    let (t2, c2) = second.funded_signers();

    let a = first
        .orchestrator()
        .launch(&t1, &c1, &mut seeded_rng(99))
        .await
        .unwrap();
    let b = second
        .orchestrator()
        .launch(&t2, &c2, &mut seeded_rng(99))
        .await
        .unwrap();
    assert_eq!(a.mint, b.mint);
}

#[tokio::test]
async fn test_underfunded_treasury_aborts_before_any_send() {
    let harness = Harness::new(MockBundler::new_success());
    let treasury = Keypair::new();
    let creator = Keypair::new();
    harness.ledger.set_balance(&treasury.pubkey(), LAMPORTS_PER_SOL / 100);
    harness.ledger.set_balance(&creator.pubkey(), LAMPORTS_PER_SOL);

    let err = harness
        .orchestrator()
        .launch(&treasury, &creator, &mut seeded_rng(1))
        .await
        .unwrap_err();

    match err {
        LaunchError::InsufficientFunds { account, .. } => {
            assert_eq!(account, treasury.pubkey().to_string())
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(harness.ledger.send_attempts(), 0);
    assert!(harness.store.entries(KeyFile::Wallets).is_empty());
    assert!(harness.bundler.submissions().is_empty());
}

#[tokio::test]
async fn test_underfunded_creator_aborts_before_any_send() {
    let harness = Harness::new(MockBundler::new_success());
    let treasury = Keypair::new();
    let creator = Keypair::new();
    harness.ledger.set_balance(&treasury.pubkey(), 10 * LAMPORTS_PER_SOL);

    let err = harness
        .orchestrator()
        .launch(&treasury, &creator, &mut seeded_rng(2))
        .await
        .unwrap_err();

    match err {
        LaunchError::InsufficientFunds { account, .. } => {
            assert_eq!(account, creator.pubkey().to_string())
        }
        other => panic!("unexpected error: {other}"),
    }
    // nothing distributed, no registry, no upload
    assert_eq!(harness.ledger.send_attempts(), 0);
    assert_eq!(harness.ledger.balance(&treasury.pubkey()), 10 * LAMPORTS_PER_SOL);
    assert!(harness.uploader.documents().is_empty());
    assert!(harness.bundler.submissions().is_empty());
    assert!(harness.runner.launched().is_empty());
}

#[tokio::test]
async fn test_rejected_bundle_with_landed_creation_continues() {
    let harness = Harness::new(MockBundler::new_failure());
    harness.ledger.set_signature_landed(Ok(true));
    let (treasury, creator) = harness.funded_signers();

    let report = harness
        .orchestrator()
        .launch(&treasury, &creator, &mut seeded_rng(3))
        .await
        .unwrap();

    let creation = harness.bundler.submissions()[0][0];
    assert_eq!(report.bundle_id, creation.to_string());
}

#[tokio::test]
async fn test_rejected_bundle_not_landed_is_safe_to_retry() {
    let harness = Harness::new(MockBundler::new_failure());
    harness.ledger.set_signature_landed(Ok(false));
    let (treasury, creator) = harness.funded_signers();

    let err = harness
        .orchestrator()
        .launch(&treasury, &creator, &mut seeded_rng(4))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        LaunchError::BundleRejected {
            safe_to_retry: true,
            ..
        }
    ));
    assert!(harness.runner.launched().is_empty());
}

#[tokio::test]
async fn test_rejected_bundle_with_unknown_status_is_not_safe() {
    let harness = Harness::new(MockBundler::new_failure());
    harness.ledger.set_signature_landed(Err(RpcManagerError::Timeout {
        endpoint: "mock".to_string(),
        timeout_ms: 30_000,
    }));
    let (treasury, creator) = harness.funded_signers();

    let err = harness
        .orchestrator()
        .launch(&treasury, &creator, &mut seeded_rng(5))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        LaunchError::BundleRejected {
            safe_to_retry: false,
            ..
        }
    ));
}

#[tokio::test]
async fn test_gather_forwards_persisted_wallets_to_treasury() {
    let harness = Harness::new(MockBundler::new_success());
    let treasury = Keypair::new();
    let wallets: Vec<Keypair> = (0..3).map(|_| Keypair::new()).collect();
    let mint = Pubkey::new_unique();

    let secrets: Vec<_> = wallets.iter().map(secret_base58).collect();
    let refs: Vec<&str> = secrets.iter().map(|s| s.as_str()).collect();
    harness.store.append(KeyFile::Wallets, &refs).await.unwrap();
    harness.store.append(KeyFile::Wallets, &["not-a-key"]).await.unwrap();

    for wallet in &wallets {
        harness.ledger.set_balance(&wallet.pubkey(), 5_000_000);
        harness.ledger.add_token_account(position(&wallet.pubkey(), mint, 1_000));
    }

    let report = harness
        .orchestrator()
        .gather(&treasury, None)
        .await
        .unwrap();

    assert_eq!(report.wallets_processed, 3);
    assert_eq!(report.wallets_failed, 0);
    assert_eq!(report.swaps_landed, 3);
    assert_eq!(report.accounts_closed, 3);
    assert_eq!(report.lamports_forwarded, 15_000_000);
    assert_eq!(harness.aggregator.calls().len(), 3);
    // the tool's own gather command runs afterwards
    assert_eq!(
        harness.runner.launched()[0].args,
        harness.config.volume_bot.gather_args
    );
}

#[tokio::test]
async fn test_sell_never_moves_lamports() {
    let harness = Harness::new(MockBundler::new_success());
    let wallet = Keypair::new();
    harness.ledger.set_balance(&wallet.pubkey(), 5_000_000);
    harness
        .ledger
        .add_token_account(position(&wallet.pubkey(), Pubkey::new_unique(), 0));

    let report = harness.orchestrator().sell(&wallet).await;

    assert_eq!(report.wallets_processed, 1);
    assert_eq!(report.swaps_landed, 0);
    assert_eq!(report.accounts_closed, 1);
    assert_eq!(report.lamports_forwarded, 0);
    assert!(harness.aggregator.calls().is_empty());
}
