//! Shared address registry (address lookup table) construction
//!
//! The registry is created fresh per launch, then extended class by class:
//! buyer wallets, their asset token accounts, their wrapped-native token
//! accounts, and finally the static program/pool addresses. Each
//! create/extend operation has its own attempt ceiling; a class is followed
//! by a confirmation wait before the next one starts.
//!
//! A send that errors may still have landed (confirmation timeout, expiry
//! after inclusion), so every retry first reads the ledger: an existing table
//! from the previous attempt is reused and addresses already registered are
//! not sent again.

use solana_sdk::{
    address_lookup_table::instruction::{create_lookup_table, extend_lookup_table},
    pubkey::Pubkey,
    signature::{Keypair, Signer},
};
use spl_associated_token_account::get_associated_token_address;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

use super::LegacyExecutor;
use crate::config::RegistryConfig;
use crate::errors::{LaunchError, LaunchResult};
use crate::launchpad::LaunchpadProgram;
use crate::metrics::metrics;
use crate::retry::{retry_with_backoff, RetryConfig};
use crate::types::{AddressClass, ComputeBudget};

/// Addresses to register, grouped by class in registration order
///
/// No address appears twice across classes; the first occurrence wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryPlan {
    pub classes: Vec<(AddressClass, Vec<Pubkey>)>,
}

impl RegistryPlan {
    pub fn build(
        buyers: &[Pubkey],
        mint: &Pubkey,
        treasury: &Pubkey,
        launchpad: &LaunchpadProgram,
    ) -> Self {
        let base_accounts: Vec<Pubkey> = buyers
            .iter()
            .map(|b| get_associated_token_address(b, mint))
            .collect();
        let quote_accounts: Vec<Pubkey> = buyers
            .iter()
            .map(|b| get_associated_token_address(b, &launchpad.quote_mint))
            .collect();

        Self::from_classes(vec![
            (AddressClass::Wallets, buyers.to_vec()),
            (AddressClass::BaseTokenAccounts, base_accounts),
            (AddressClass::WrappedNativeAccounts, quote_accounts),
            (
                AddressClass::StaticAddresses,
                launchpad.static_addresses(mint, treasury),
            ),
        ])
    }

    /// De-duplicate across classes, keeping the first occurrence
    pub fn from_classes(classes: Vec<(AddressClass, Vec<Pubkey>)>) -> Self {
        let mut seen = HashSet::new();
        let classes = classes
            .into_iter()
            .map(|(class, addresses)| {
                let unique = addresses.into_iter().filter(|a| seen.insert(*a)).collect();
                (class, unique)
            })
            .collect();
        Self { classes }
    }

    pub fn all_addresses(&self) -> Vec<Pubkey> {
        self.classes
            .iter()
            .flat_map(|(_, addresses)| addresses.iter().copied())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.classes.iter().map(|(_, a)| a.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct RegistryBuilder {
    executor: Arc<LegacyExecutor>,
    config: RegistryConfig,
    budget: ComputeBudget,
}

impl RegistryBuilder {
    pub fn new(executor: Arc<LegacyExecutor>, config: RegistryConfig, budget: ComputeBudget) -> Self {
        Self {
            executor,
            config,
            budget,
        }
    }

    fn retry_policy(&self) -> RetryConfig {
        RetryConfig::fixed(
            self.config.max_attempts,
            Duration::from_millis(self.config.retry_delay_ms),
        )
    }

    /// Create an empty registry owned and paid for by `authority`
    pub async fn create(&self, authority: &Keypair) -> LaunchResult<Pubkey> {
        let rpc = self.executor.rpc();
        let previous: Mutex<Option<Pubkey>> = Mutex::new(None);
        let previous = &previous;
        let result = retry_with_backoff("registry_create", &self.retry_policy(), |attempt| {
            async move {
                metrics().registry_extend_attempts.inc();
                let prior = *previous.lock();
                if let Some(address) = prior {
                    match rpc.get_address_lookup_table(&address).await {
                        Ok(_) => {
                            info!(registry = %address, "Lookup registry from an earlier attempt exists");
                            return Ok(address);
                        }
                        Err(e) if e.is_not_found() => {}
                        Err(e) => return Err(e.into()),
                    }
                }

                let slot = rpc.get_slot().await?;
                let (create_ix, address) =
                    create_lookup_table(authority.pubkey(), authority.pubkey(), slot);
                *previous.lock() = Some(address);
                let mut ixs = self.budget.instructions().to_vec();
                ixs.push(create_ix);
                self.executor
                    .send_instructions(&ixs, authority, &[], &[])
                    .await?;
                info!(registry = %address, slot, attempt = attempt + 1, "Lookup registry created");
                Ok::<_, LaunchError>(address)
            }
        })
        .await;

        let address = result.map_err(|exhausted| LaunchError::RegistryCreationFailed {
            attempts: exhausted.attempts,
            reason: exhausted.last_error.to_string(),
        })?;

        sleep(Duration::from_secs(self.config.create_wait_secs)).await;
        Ok(address)
    }

    /// Register every class of `plan` in order
    pub async fn extend(
        &self,
        registry: &Pubkey,
        authority: &Keypair,
        plan: &RegistryPlan,
    ) -> LaunchResult<()> {
        let chunk_size = self.config.max_addresses_per_extend.max(1);

        for (class, addresses) in &plan.classes {
            if addresses.is_empty() {
                continue;
            }
            for chunk in addresses.chunks(chunk_size) {
                self.extend_chunk(registry, authority, *class, chunk).await?;
            }
            info!(
                registry = %registry,
                class = %class,
                addresses = addresses.len(),
                "Registry class extended"
            );
            sleep(Duration::from_secs(self.config.class_wait_secs)).await;
        }
        Ok(())
    }

    async fn extend_chunk(
        &self,
        registry: &Pubkey,
        authority: &Keypair,
        class: AddressClass,
        chunk: &[Pubkey],
    ) -> LaunchResult<()> {
        retry_with_backoff(class.as_str(), &self.retry_policy(), |attempt| async move {
            metrics().registry_extend_attempts.inc();
            let pending = if attempt == 0 {
                chunk.to_vec()
            } else {
                warn!(class = %class, attempt = attempt + 1, "Retrying registry extension");
                self.unregistered(registry, chunk).await?
            };
            if pending.is_empty() {
                info!(class = %class, "Chunk already registered by an earlier attempt");
                return Ok(());
            }

            let mut ixs = self.budget.instructions().to_vec();
            ixs.push(extend_lookup_table(
                *registry,
                authority.pubkey(),
                Some(authority.pubkey()),
                pending,
            ));
            self.executor
                .send_instructions(&ixs, authority, &[], &[])
                .await
                .map(|_| ())
        })
        .await
        .map_err(|exhausted| LaunchError::RegistryExtensionFailed {
            class: class.as_str(),
            attempts: exhausted.attempts,
            reason: exhausted.last_error.to_string(),
        })
    }

    /// Addresses of `chunk` the ledger does not hold in `registry` yet
    async fn unregistered(&self, registry: &Pubkey, chunk: &[Pubkey]) -> LaunchResult<Vec<Pubkey>> {
        match self.executor.rpc().get_address_lookup_table(registry).await {
            Ok(table) => {
                let present: HashSet<&Pubkey> = table.addresses.iter().collect();
                Ok(chunk.iter().filter(|a| !present.contains(a)).copied().collect())
            }
            // Extending a missing table fails on send and uses up the attempt
            Err(e) if e.is_not_found() => Ok(chunk.to_vec()),
            Err(e) => Err(e.into()),
        }
    }

    /// Create a registry and register everything in `plan`
    pub async fn build(&self, authority: &Keypair, plan: &RegistryPlan) -> LaunchResult<Pubkey> {
        let registry = self.create(authority).await?;
        self.extend(&registry, authority, plan).await?;
        Ok(registry)
    }
}
