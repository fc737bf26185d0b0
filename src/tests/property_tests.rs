//! Properties that must hold for every wallet count and seed

use std::collections::HashSet;
use std::sync::Arc;

use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use solana_sdk::hash::Hash;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signer};
use solana_sdk::system_instruction;
use solana_sdk::transaction::VersionedTransaction;

use crate::config::LaunchpadConfig;
use crate::launch::bundle::MAX_BUNDLE_TRANSACTIONS;
use crate::launch::composer::{ComposerSettings, INSTRUCTIONS_PER_WALLET};
use crate::launch::distribution::{plan_distribution, DistributionParams};
use crate::launch::{assemble_bundle, build_v0_transaction, Composer, RegistryPlan};
use crate::launchpad::LaunchpadProgram;
use crate::test_utils::MockLedger;
use crate::types::ComputeBudget;
use crate::wallet::AccountSet;

fn launchpad() -> LaunchpadProgram {
    LaunchpadProgram::from_config(&LaunchpadConfig::default()).unwrap()
}

fn marker_tx(lamports: u64) -> VersionedTransaction {
    let payer = Keypair::new();
    let ix = system_instruction::transfer(&payer.pubkey(), &Pubkey::new_unique(), lamports);
    build_v0_transaction(&payer.pubkey(), &[ix], &[], Hash::new_unique(), &[&payer]).unwrap()
}

fn distribution_params() -> impl Strategy<Value = DistributionParams> {
    (1_000_000u64..100_000_000, 0u64..5_000_000, 1u64..5_000_000, 0u64..100_000_000).prop_map(
        |(swap, min, spread, overhead)| DistributionParams {
            swap_lamports: swap,
            margin_min: min,
            margin_max: min + spread,
            overhead_lamports: overhead,
        },
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_distribution_total_matches_legs(
        n in 1usize..30,
        seed in any::<u64>(),
        params in distribution_params(),
    ) {
        let mut rng = StdRng::seed_from_u64(seed);
        let accounts = AccountSet::generate(n, &mut rng).unwrap();
        let plan = plan_distribution(&accounts, &params, &mut rng);

        prop_assert_eq!(plan.len(), n);
        let mut sum = 0u64;
        for leg in &plan.legs {
            prop_assert!(leg.lamports >= params.swap_lamports + params.margin_min);
            prop_assert!(leg.lamports < params.swap_lamports + params.margin_max);
            sum += leg.lamports;
        }
        prop_assert_eq!(plan.total_transfer(), sum);
        prop_assert_eq!(plan.required_balance(), sum + params.overhead_lamports);
    }

    #[test]
    fn prop_batches_hold_at_most_five_wallets(
        n in 1usize..26,
        per_batch in 1usize..=5,
    ) {
        let settings = ComposerSettings {
            swap_lamports: 10_000_000,
            min_amount_out: 1,
            share_fee_rate: 10_000,
            wallets_per_batch: per_batch,
            batch_budget: ComputeBudget::new(1_000_000, 200_000),
            creator_budget: ComputeBudget::new(1_000_000, 250_000),
        };
        let composer = Composer::new(Arc::new(MockLedger::new()), launchpad(), settings);
        let wallets: Vec<Pubkey> = (0..n).map(|_| Pubkey::new_unique()).collect();
        let batches = composer.plan_batches(&wallets, &Pubkey::new_unique()).unwrap();

        prop_assert_eq!(batches.len(), n.div_ceil(per_batch));
        let mut seen = Vec::new();
        for batch in &batches {
            prop_assert!(batch.wallet_count() <= per_batch);
            prop_assert_eq!(
                batch.instructions.len(),
                INSTRUCTIONS_PER_WALLET * batch.wallet_count() + 2
            );
            prop_assert_eq!(batch.payer, batch.signers[0]);
            seen.extend(batch.signers.iter().copied());
        }
        prop_assert_eq!(seen, wallets);
    }

    #[test]
    fn prop_registry_never_repeats_an_address(
        picks in proptest::collection::vec(0usize..8, 1..24),
        treasury_is_buyer in any::<bool>(),
    ) {
        let pool: Vec<Pubkey> = (0..8).map(|_| Pubkey::new_unique()).collect();
        let buyers: Vec<Pubkey> = picks.iter().map(|i| pool[*i]).collect();
        let treasury = if treasury_is_buyer { buyers[0] } else { Pubkey::new_unique() };
        let plan = RegistryPlan::build(&buyers, &Pubkey::new_unique(), &treasury, &launchpad());

        let all = plan.all_addresses();
        let unique: HashSet<Pubkey> = all.iter().copied().collect();
        prop_assert_eq!(unique.len(), all.len());
        for buyer in &buyers {
            prop_assert!(unique.contains(buyer));
        }
    }

    #[test]
    fn prop_creation_always_first(batches in 0usize..6, with_creator in any::<bool>()) {
        let creation = marker_tx(1);
        let creation_sig = creation.signatures[0];
        let buys: Vec<VersionedTransaction> = (0..batches).map(|i| marker_tx(10 + i as u64)).collect();
        let buy_sigs: Vec<_> = buys.iter().map(|tx| tx.signatures[0]).collect();
        let creator = with_creator.then(|| marker_tx(2));
        let total = 1 + batches + usize::from(with_creator);

        match assemble_bundle(creation, buys, creator, 1_000) {
            Ok(bundle) => {
                prop_assert!(total <= MAX_BUNDLE_TRANSACTIONS);
                let txs = bundle.transactions();
                prop_assert_eq!(txs[0].signatures[0], creation_sig);
                for (tx, sig) in txs[1..=batches].iter().zip(&buy_sigs) {
                    prop_assert_eq!(tx.signatures[0], *sig);
                }
            }
            Err(_) => prop_assert!(total > MAX_BUNDLE_TRANSACTIONS),
        }
    }
}
