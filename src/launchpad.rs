//! Launchpad program addressing and instruction encoding
//!
//! Pool, vault and authority addresses are all program-derived from the
//! asset mint, so every component can compute them without a ledger read.
//! Instruction data follows the Anchor layout: an 8-byte discriminator
//! (`sha256("global:<name>")[..8]`) followed by borsh-encoded arguments.

use borsh::BorshSerialize;
use sha2::{Digest, Sha256};
use solana_sdk::{
    instruction::{AccountMeta, Instruction},
    pubkey::Pubkey,
    system_program, sysvar,
};
use spl_associated_token_account::get_associated_token_address;

use crate::config::{parse_pubkey, LaunchpadConfig};
use crate::errors::{LaunchError, LaunchResult};

const GLOBAL_CONFIG_SEED: &[u8] = b"global_config";
const POOL_SEED: &[u8] = b"pool";
const POOL_VAULT_SEED: &[u8] = b"pool_vault";
const AUTH_SEED: &[u8] = b"vault_auth_seed";
const EVENT_AUTHORITY_SEED: &[u8] = b"__event_authority";
const METADATA_SEED: &[u8] = b"metadata";

/// Token metadata for the new mint
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize)]
pub struct MintParams {
    pub decimals: u8,
    pub name: String,
    pub symbol: String,
    pub uri: String,
}

/// Constant-product bonding curve parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, BorshSerialize)]
pub struct ConstantCurve {
    pub supply: u64,
    pub total_base_sell: u64,
    pub total_quote_fund_raising: u64,
    pub migrate_type: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, BorshSerialize)]
pub enum CurveParams {
    Constant { data: ConstantCurve },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, BorshSerialize)]
pub struct VestingParams {
    pub total_locked_amount: u64,
    pub cliff_period: u64,
    pub unlock_period: u64,
}

#[derive(BorshSerialize)]
struct InitializeArgs<'a> {
    base_mint_param: &'a MintParams,
    curve_param: CurveParams,
    vesting_param: VestingParams,
}

#[derive(BorshSerialize)]
struct BuyExactInArgs {
    amount_in: u64,
    minimum_amount_out: u64,
    share_fee_rate: u64,
}

/// Anchor instruction discriminator
pub fn discriminator(name: &str) -> [u8; 8] {
    let digest = Sha256::digest(format!("global:{}", name).as_bytes());
    let mut out = [0u8; 8];
    out.copy_from_slice(&digest[..8]);
    out
}

/// Addresses and instruction builders for one launchpad deployment
#[derive(Debug, Clone)]
pub struct LaunchpadProgram {
    pub program_id: Pubkey,
    pub platform_config: Pubkey,
    pub metadata_program: Pubkey,
    /// Quote side of every pool (wrapped native)
    pub quote_mint: Pubkey,
    pub curve_type: u8,
    pub config_index: u16,
}

impl LaunchpadProgram {
    pub fn from_config(config: &LaunchpadConfig) -> LaunchResult<Self> {
        Ok(Self {
            program_id: parse_pubkey("launchpad.program_id", &config.program_id)?,
            platform_config: parse_pubkey("launchpad.platform_config", &config.platform_config)?,
            metadata_program: parse_pubkey(
                "launchpad.metadata_program",
                &config.metadata_program,
            )?,
            quote_mint: spl_token::native_mint::id(),
            curve_type: config.curve_type,
            config_index: config.config_index,
        })
    }

    pub fn global_config(&self) -> Pubkey {
        Pubkey::find_program_address(
            &[
                GLOBAL_CONFIG_SEED,
                self.quote_mint.as_ref(),
                &[self.curve_type],
                &self.config_index.to_be_bytes(),
            ],
            &self.program_id,
        )
        .0
    }

    pub fn pool(&self, mint: &Pubkey) -> Pubkey {
        Pubkey::find_program_address(
            &[POOL_SEED, mint.as_ref(), self.quote_mint.as_ref()],
            &self.program_id,
        )
        .0
    }

    pub fn vault(&self, pool: &Pubkey, mint: &Pubkey) -> Pubkey {
        Pubkey::find_program_address(
            &[POOL_VAULT_SEED, pool.as_ref(), mint.as_ref()],
            &self.program_id,
        )
        .0
    }

    pub fn authority(&self) -> Pubkey {
        Pubkey::find_program_address(&[AUTH_SEED], &self.program_id).0
    }

    pub fn event_authority(&self) -> Pubkey {
        Pubkey::find_program_address(&[EVENT_AUTHORITY_SEED], &self.program_id).0
    }

    pub fn metadata_account(&self, mint: &Pubkey) -> Pubkey {
        Pubkey::find_program_address(
            &[METADATA_SEED, self.metadata_program.as_ref(), mint.as_ref()],
            &self.metadata_program,
        )
        .0
    }

    /// Spend exactly `amount_in` wrapped lamports on `mint`
    ///
    /// The buyer's own wrapped-native account receives the share fee.
    pub fn buy_exact_in(
        &self,
        buyer: &Pubkey,
        mint: &Pubkey,
        amount_in: u64,
        minimum_amount_out: u64,
        share_fee_rate: u64,
    ) -> LaunchResult<Instruction> {
        let pool = self.pool(mint);
        let user_base = get_associated_token_address(buyer, mint);
        let user_quote = get_associated_token_address(buyer, &self.quote_mint);

        let accounts = vec![
            AccountMeta::new(*buyer, true),
            AccountMeta::new_readonly(self.authority(), false),
            AccountMeta::new_readonly(self.global_config(), false),
            AccountMeta::new_readonly(self.platform_config, false),
            AccountMeta::new(pool, false),
            AccountMeta::new(user_base, false),
            AccountMeta::new(user_quote, false),
            AccountMeta::new(self.vault(&pool, mint), false),
            AccountMeta::new(self.vault(&pool, &self.quote_mint), false),
            AccountMeta::new_readonly(*mint, false),
            AccountMeta::new_readonly(self.quote_mint, false),
            AccountMeta::new_readonly(spl_token::id(), false),
            AccountMeta::new_readonly(spl_token::id(), false),
            AccountMeta::new_readonly(self.event_authority(), false),
            AccountMeta::new_readonly(self.program_id, false),
            AccountMeta::new(user_quote, false),
        ];

        let data = self.encode(
            "buy_exact_in",
            &BuyExactInArgs {
                amount_in,
                minimum_amount_out,
                share_fee_rate,
            },
        )?;
        Ok(Instruction {
            program_id: self.program_id,
            accounts,
            data,
        })
    }

    /// Create the mint, its metadata and the bonding-curve pool
    pub fn initialize(
        &self,
        creator: &Pubkey,
        mint: &Pubkey,
        mint_params: &MintParams,
        curve: ConstantCurve,
        vesting: VestingParams,
    ) -> LaunchResult<Instruction> {
        let pool = self.pool(mint);
        let accounts = vec![
            AccountMeta::new(*creator, true),
            AccountMeta::new_readonly(*creator, true),
            AccountMeta::new_readonly(self.global_config(), false),
            AccountMeta::new_readonly(self.platform_config, false),
            AccountMeta::new_readonly(self.authority(), false),
            AccountMeta::new(pool, false),
            AccountMeta::new(*mint, true),
            AccountMeta::new_readonly(self.quote_mint, false),
            AccountMeta::new(self.vault(&pool, mint), false),
            AccountMeta::new(self.vault(&pool, &self.quote_mint), false),
            AccountMeta::new(self.metadata_account(mint), false),
            AccountMeta::new_readonly(spl_token::id(), false),
            AccountMeta::new_readonly(spl_token::id(), false),
            AccountMeta::new_readonly(self.metadata_program, false),
            AccountMeta::new_readonly(system_program::id(), false),
            AccountMeta::new_readonly(sysvar::rent::id(), false),
            AccountMeta::new_readonly(self.event_authority(), false),
            AccountMeta::new_readonly(self.program_id, false),
        ];

        let data = self.encode(
            "initialize",
            &InitializeArgs {
                base_mint_param: mint_params,
                curve_param: CurveParams::Constant { data: curve },
                vesting_param: vesting,
            },
        )?;
        Ok(Instruction {
            program_id: self.program_id,
            accounts,
            data,
        })
    }

    /// Program, pool and treasury addresses shared by every buy of `mint`
    pub fn static_addresses(&self, mint: &Pubkey, treasury: &Pubkey) -> Vec<Pubkey> {
        let pool = self.pool(mint);
        let treasury_quote = get_associated_token_address(treasury, &self.quote_mint);
        vec![
            spl_token::id(),
            system_program::id(),
            sysvar::rent::id(),
            spl_associated_token_account::id(),
            solana_sdk::compute_budget::id(),
            *treasury,
            *mint,
            self.quote_mint,
            self.program_id,
            self.global_config(),
            self.platform_config,
            pool,
            self.vault(&pool, mint),
            self.vault(&pool, &self.quote_mint),
            treasury_quote,
            self.authority(),
            self.event_authority(),
        ]
    }

    fn encode<T: BorshSerialize>(&self, name: &str, args: &T) -> LaunchResult<Vec<u8>> {
        let mut data = discriminator(name).to_vec();
        args.serialize(&mut data)
            .map_err(|e| LaunchError::instruction_failed(self.program_id.to_string(), e.to_string()))?;
        Ok(data)
    }
}
