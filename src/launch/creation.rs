//! Token creation transaction
//!
//! Budget, the launchpad `initialize` call and the bundle tip, paid by the
//! creator and co-signed by the new mint keypair.

use solana_sdk::{
    hash::Hash,
    instruction::Instruction,
    pubkey::Pubkey,
    signature::{Keypair, Signer},
    transaction::VersionedTransaction,
};

use super::{build_v0_transaction, check_packet_size};
use crate::config::TokenConfig;
use crate::errors::LaunchResult;
use crate::launchpad::{ConstantCurve, LaunchpadProgram, MintParams, VestingParams};
use crate::types::ComputeBudget;

/// What the new token is created with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenLaunch {
    pub mint_params: MintParams,
    pub curve: ConstantCurve,
}

impl TokenLaunch {
    pub fn from_config(token: &TokenConfig, uri: String) -> Self {
        Self {
            mint_params: MintParams {
                decimals: token.decimals,
                name: token.name.clone(),
                symbol: token.symbol.clone(),
                uri,
            },
            curve: ConstantCurve {
                supply: token.supply,
                total_base_sell: token.total_base_sell,
                total_quote_fund_raising: token.total_quote_fund_raising,
                migrate_type: token.migrate_type,
            },
        }
    }
}

pub fn creation_instructions(
    launchpad: &LaunchpadProgram,
    creator: &Pubkey,
    mint: &Pubkey,
    launch: &TokenLaunch,
    budget: &ComputeBudget,
    tip: Option<Instruction>,
) -> LaunchResult<Vec<Instruction>> {
    let mut instructions = budget.instructions().to_vec();
    instructions.push(launchpad.initialize(
        creator,
        mint,
        &launch.mint_params,
        launch.curve,
        VestingParams::default(),
    )?);
    instructions.extend(tip);
    Ok(instructions)
}

/// Signed creation transaction; `tip` is appended last when given
pub fn build_creation_transaction(
    launchpad: &LaunchpadProgram,
    creator: &Keypair,
    mint: &Keypair,
    launch: &TokenLaunch,
    budget: &ComputeBudget,
    tip: Option<Instruction>,
    blockhash: Hash,
) -> LaunchResult<VersionedTransaction> {
    let instructions = creation_instructions(
        launchpad,
        &creator.pubkey(),
        &mint.pubkey(),
        launch,
        budget,
        tip,
    )?;
    let tx = build_v0_transaction(&creator.pubkey(), &instructions, &[], blockhash, &[creator, mint])?;
    check_packet_size(&tx, "creation")?;
    Ok(tx)
}
