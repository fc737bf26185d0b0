//! Buy instruction composition and batching
//!
//! Each buyer contributes five instructions: idempotent creation of its
//! asset and wrapped-native token accounts, a lamport transfer into the
//! wrapped account, a sync, and the launchpad buy. Funded wallets are packed
//! into batches of at most [`MAX_WALLETS_PER_BATCH`] in index order; the
//! first wallet of a batch pays for it. The composer never submits.

use solana_sdk::{
    address_lookup_table::AddressLookupTableAccount,
    hash::Hash,
    instruction::Instruction,
    program_pack::Pack,
    pubkey::Pubkey,
    signature::{Keypair, Signer},
    system_instruction,
    transaction::VersionedTransaction,
};
use spl_associated_token_account::{
    get_associated_token_address, instruction::create_associated_token_account_idempotent,
};
use std::sync::Arc;
use tracing::{debug, info};

use super::{build_v0_transaction, check_packet_size};
use crate::config::{Config, MAX_WALLETS_PER_BATCH};
use crate::errors::{LaunchError, LaunchResult};
use crate::launchpad::LaunchpadProgram;
use crate::rpc_manager::LedgerRpc;
use crate::structured_logging::LaunchLogger;
use crate::types::{ComputeBudget, InstructionBatch};

/// Instructions contributed by one wallet
pub const INSTRUCTIONS_PER_WALLET: usize = 5;

/// Knobs the composer is built with
#[derive(Debug, Clone)]
pub struct ComposerSettings {
    pub swap_lamports: u64,
    pub min_amount_out: u64,
    pub share_fee_rate: u64,
    pub wallets_per_batch: usize,
    pub batch_budget: ComputeBudget,
    pub creator_budget: ComputeBudget,
}

impl ComposerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            swap_lamports: config.swap_lamports(),
            min_amount_out: config.launchpad.min_amount_out,
            share_fee_rate: config.launchpad.share_fee_rate,
            wallets_per_batch: config.launch.wallets_per_batch,
            batch_budget: config.budgets.buy_batch,
            creator_budget: config.budgets.creator_buy,
        }
    }
}

/// Signed buy batches plus what the funds check dropped
#[derive(Debug)]
pub struct ComposedBuys {
    pub transactions: Vec<VersionedTransaction>,
    pub wallets_bundled: usize,
    pub wallets_skipped: usize,
}

pub struct Composer {
    rpc: Arc<dyn LedgerRpc>,
    launchpad: LaunchpadProgram,
    settings: ComposerSettings,
}

impl Composer {
    pub fn new(rpc: Arc<dyn LedgerRpc>, launchpad: LaunchpadProgram, settings: ComposerSettings) -> Self {
        Self {
            rpc,
            launchpad,
            settings,
        }
    }

    fn batch_size(&self) -> usize {
        self.settings.wallets_per_batch.clamp(1, MAX_WALLETS_PER_BATCH)
    }

    /// Token account creation, wrap, sync and buy for one wallet
    pub fn wallet_instructions(
        &self,
        wallet: &Pubkey,
        mint: &Pubkey,
        amount_in: u64,
    ) -> LaunchResult<Vec<Instruction>> {
        let quote_mint = self.launchpad.quote_mint;
        let wrapped = get_associated_token_address(wallet, &quote_mint);
        let sync = spl_token::instruction::sync_native(&spl_token::id(), &wrapped)
            .map_err(|e| LaunchError::instruction_failed("spl-token", e.to_string()))?;

        Ok(vec![
            create_associated_token_account_idempotent(wallet, wallet, mint, &spl_token::id()),
            create_associated_token_account_idempotent(
                wallet,
                wallet,
                &quote_mint,
                &spl_token::id(),
            ),
            system_instruction::transfer(wallet, &wrapped, amount_in),
            sync,
            self.launchpad.buy_exact_in(
                wallet,
                mint,
                amount_in,
                self.settings.min_amount_out,
                self.settings.share_fee_rate,
            )?,
        ])
    }

    /// Two token-account rents plus the trade amount
    pub async fn required_lamports(&self, amount_in: u64) -> LaunchResult<u64> {
        let rent = self
            .rpc
            .get_minimum_balance_for_rent_exemption(spl_token::state::Account::LEN)
            .await?;
        Ok(rent.saturating_mul(2).saturating_add(amount_in))
    }

    /// Check one wallet can pay for `amount_in` plus its account rents
    pub async fn check_wallet_funds(&self, wallet: &Pubkey, required: u64) -> LaunchResult<()> {
        let available = self.rpc.get_balance(wallet).await?;
        if available < required {
            return Err(LaunchError::InsufficientWalletFunds {
                wallet: wallet.to_string(),
                available,
                required,
            });
        }
        Ok(())
    }

    /// Wallets that pass the funds check, in their original order
    ///
    /// A failing wallet is logged and left out; it never fails the others.
    pub async fn funded_wallets<'a>(
        &self,
        wallets: &'a [Keypair],
        logger: &LaunchLogger,
    ) -> LaunchResult<Vec<&'a Keypair>> {
        let required = self.required_lamports(self.settings.swap_lamports).await?;
        let mut funded = Vec::with_capacity(wallets.len());
        for wallet in wallets {
            match self.check_wallet_funds(&wallet.pubkey(), required).await {
                Ok(()) => funded.push(wallet),
                Err(e) => logger.wallet_skipped("compose", &wallet.pubkey(), &e.to_string()),
            }
        }
        Ok(funded)
    }

    /// Pack wallets into batches in index order
    pub fn plan_batches(&self, wallets: &[Pubkey], mint: &Pubkey) -> LaunchResult<Vec<InstructionBatch>> {
        wallets
            .chunks(self.batch_size())
            .map(|chunk| self.batch(chunk, mint))
            .collect()
    }

    fn batch(&self, wallets: &[Pubkey], mint: &Pubkey) -> LaunchResult<InstructionBatch> {
        let payer = *wallets
            .first()
            .ok_or_else(|| LaunchError::Internal("empty instruction batch".to_string()))?;
        let mut instructions = self.settings.batch_budget.instructions().to_vec();
        for wallet in wallets {
            instructions.extend(self.wallet_instructions(wallet, mint, self.settings.swap_lamports)?);
        }
        Ok(InstructionBatch {
            payer,
            signers: wallets.to_vec(),
            instructions,
        })
    }

    /// Funds-check, batch and sign every buyer's buy
    pub async fn compose(
        &self,
        buyers: &[Keypair],
        mint: &Pubkey,
        registry: &AddressLookupTableAccount,
        blockhash: Hash,
        logger: &LaunchLogger,
    ) -> LaunchResult<ComposedBuys> {
        let funded = self.funded_wallets(buyers, logger).await?;
        let wallets_skipped = buyers.len() - funded.len();
        let lookup_tables = std::slice::from_ref(registry);

        let mut transactions = Vec::new();
        for (index, chunk) in funded.chunks(self.batch_size()).enumerate() {
            let pubkeys: Vec<Pubkey> = chunk.iter().map(|k| k.pubkey()).collect();
            let batch = self.batch(&pubkeys, mint)?;
            let tx = build_v0_transaction(
                &batch.payer,
                &batch.instructions,
                lookup_tables,
                blockhash,
                chunk,
            )?;
            let size = check_packet_size(&tx, "buy_batch")?;
            debug!(batch = index, wallets = batch.wallet_count(), size, "Composed buy batch");
            transactions.push(tx);
        }

        info!(
            batches = transactions.len(),
            wallets = funded.len(),
            skipped = wallets_skipped,
            "Buy batches composed"
        );
        Ok(ComposedBuys {
            transactions,
            wallets_bundled: funded.len(),
            wallets_skipped,
        })
    }

    /// The creator must cover its own buy; unlike a buyer this aborts the launch
    pub async fn check_creator_funds(&self, creator: &Pubkey, amount_in: u64) -> LaunchResult<()> {
        let required = self.required_lamports(amount_in).await?;
        let available = self.rpc.get_balance(creator).await?;
        if available < required {
            return Err(LaunchError::insufficient_funds(creator, available, required));
        }
        Ok(())
    }

    /// The creator's own buy as a standalone transaction
    ///
    /// Unlike buyer wallets an underfunded creator is an error for the
    /// caller, since the launch plan depends on this buy.
    pub async fn creator_buy(
        &self,
        creator: &Keypair,
        mint: &Pubkey,
        amount_in: u64,
        registry: &AddressLookupTableAccount,
        blockhash: Hash,
    ) -> LaunchResult<VersionedTransaction> {
        self.check_creator_funds(&creator.pubkey(), amount_in).await?;

        let mut instructions = self.settings.creator_budget.instructions().to_vec();
        instructions.extend(self.wallet_instructions(&creator.pubkey(), mint, amount_in)?);
        let tx = build_v0_transaction(
            &creator.pubkey(),
            &instructions,
            std::slice::from_ref(registry),
            blockhash,
            &[creator],
        )?;
        check_packet_size(&tx, "creator_buy")?;
        Ok(tx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LaunchpadConfig;
    use crate::test_utils::MockLedger;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use solana_sdk::native_token::LAMPORTS_PER_SOL;

    fn settings() -> ComposerSettings {
        ComposerSettings {
            swap_lamports: LAMPORTS_PER_SOL / 100,
            min_amount_out: 1,
            share_fee_rate: 10_000,
            wallets_per_batch: 5,
            batch_budget: ComputeBudget::new(1_000_000, 200_000),
            creator_budget: ComputeBudget::new(1_000_000, 250_000),
        }
    }

    fn composer(ledger: Arc<MockLedger>) -> Composer {
        Composer::new(
            ledger,
            LaunchpadProgram::from_config(&LaunchpadConfig::default()).unwrap(),
            settings(),
        )
    }

    fn empty_registry() -> AddressLookupTableAccount {
        AddressLookupTableAccount {
            key: Pubkey::new_unique(),
            addresses: vec![],
        }
    }

    #[test]
    fn test_wallet_instruction_order() {
        let c = composer(Arc::new(MockLedger::new()));
        let wallet = Pubkey::new_unique();
        let mint = Pubkey::new_unique();
        let ixs = c.wallet_instructions(&wallet, &mint, 42).unwrap();

        assert_eq!(ixs.len(), INSTRUCTIONS_PER_WALLET);
        assert_eq!(ixs[0].program_id, spl_associated_token_account::id());
        assert_eq!(ixs[1].program_id, spl_associated_token_account::id());
        let wrapped = get_associated_token_address(&wallet, &spl_token::native_mint::id());
        assert_eq!(ixs[2], system_instruction::transfer(&wallet, &wrapped, 42));
        assert_eq!(ixs[3].program_id, spl_token::id());
        assert_eq!(ixs[4].program_id, c.launchpad.program_id);
    }

    #[test]
    fn test_twelve_wallets_make_three_batches() {
        let c = composer(Arc::new(MockLedger::new()));
        let wallets: Vec<Pubkey> = (0..12).map(|_| Pubkey::new_unique()).collect();
        let batches = c.plan_batches(&wallets, &Pubkey::new_unique()).unwrap();

        let sizes: Vec<usize> = batches.iter().map(|b| b.wallet_count()).collect();
        assert_eq!(sizes, vec![5, 5, 2]);
        for batch in &batches {
            assert_eq!(batch.payer, batch.signers[0]);
            assert_eq!(
                batch.instructions.len(),
                INSTRUCTIONS_PER_WALLET * batch.wallet_count() + 2
            );
        }
        assert_eq!(batches[2].signers, wallets[10..].to_vec());
    }

    #[tokio::test]
    async fn test_underfunded_wallet_is_skipped_not_fatal() {
        let ledger = Arc::new(MockLedger::new());
        let buyers = crate::wallet::AccountSet::generate(6, &mut StdRng::seed_from_u64(3))
            .unwrap()
            .buyers;
        for buyer in &buyers {
            ledger.set_balance(&buyer.pubkey(), LAMPORTS_PER_SOL);
        }
        ledger.set_balance(&buyers[2].pubkey(), 1_000);

        let composed = composer(ledger)
            .compose(
                &buyers,
                &Pubkey::new_unique(),
                &empty_registry(),
                Hash::new_unique(),
                &LaunchLogger::fresh(),
            )
            .await
            .unwrap();

        assert_eq!(composed.wallets_skipped, 1);
        assert_eq!(composed.wallets_bundled, 5);
        assert_eq!(composed.transactions.len(), 1);
        let tx = &composed.transactions[0];
        assert_eq!(tx.signatures.len(), 5);
        assert_eq!(tx.message.static_account_keys()[0], buyers[0].pubkey());
        assert!(!tx.message.static_account_keys().contains(&buyers[2].pubkey()));
    }

    #[tokio::test]
    async fn test_creator_buy_rejects_underfunded_creator() {
        let ledger = Arc::new(MockLedger::new());
        let creator = Keypair::new();
        ledger.set_balance(&creator.pubkey(), 10);

        let err = composer(ledger)
            .creator_buy(
                &creator,
                &Pubkey::new_unique(),
                LAMPORTS_PER_SOL / 100,
                &empty_registry(),
                Hash::new_unique(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, LaunchError::InsufficientFunds { .. }));
    }

    #[tokio::test]
    async fn test_creator_buy_is_signed_by_creator_only() {
        let ledger = Arc::new(MockLedger::new());
        let creator = Keypair::new();
        ledger.set_balance(&creator.pubkey(), LAMPORTS_PER_SOL);

        let tx = composer(ledger)
            .creator_buy(
                &creator,
                &Pubkey::new_unique(),
                LAMPORTS_PER_SOL / 100,
                &empty_registry(),
                Hash::new_unique(),
            )
            .await
            .unwrap();
        assert_eq!(tx.signatures.len(), 1);
        assert_eq!(tx.message.static_account_keys()[0], creator.pubkey());
    }
}
