//! Common types used throughout the application

use serde::{Deserialize, Serialize};
use solana_sdk::{
    compute_budget::ComputeBudgetInstruction, instruction::Instruction, pubkey::Pubkey,
    signature::Signature,
};

/// Compute unit limit and price attached to a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputeBudget {
    pub units: u32,
    pub micro_lamports: u64,
}

impl ComputeBudget {
    pub const fn new(units: u32, micro_lamports: u64) -> Self {
        Self {
            units,
            micro_lamports,
        }
    }

    /// Limit first, then price
    pub fn instructions(&self) -> [Instruction; 2] {
        [
            ComputeBudgetInstruction::set_compute_unit_limit(self.units),
            ComputeBudgetInstruction::set_compute_unit_price(self.micro_lamports),
        ]
    }
}

/// One treasury -> intermediary -> buyer hop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FundingLeg {
    pub intermediary: Pubkey,
    pub buyer: Pubkey,
    /// Swap amount plus this buyer's margin
    pub lamports: u64,
}

/// Ordered funding plan for a launch
///
/// Built once before the distribution transaction and never touched after
/// it is submitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistributionPlan {
    pub legs: Vec<FundingLeg>,
    /// Reserved on the treasury for fees and registry rent
    pub overhead_lamports: u64,
}

impl DistributionPlan {
    /// Sum of lamports leaving the treasury through the hops
    pub fn total_transfer(&self) -> u64 {
        self.legs.iter().map(|l| l.lamports).sum()
    }

    /// Treasury balance needed before anything is submitted
    pub fn required_balance(&self) -> u64 {
        self.total_transfer().saturating_add(self.overhead_lamports)
    }

    pub fn len(&self) -> usize {
        self.legs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.legs.is_empty()
    }
}

/// Snapshot of one token account taken at query time
///
/// May be stale by the time it is acted on; re-read before mutating.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletTokenPosition {
    pub owner: Pubkey,
    pub token_account: Pubkey,
    pub mint: Pubkey,
    /// Raw balance
    pub amount: u64,
    pub decimals: u8,
}

impl WalletTokenPosition {
    pub fn is_empty(&self) -> bool {
        self.amount == 0
    }

    pub fn is_wrapped_native(&self) -> bool {
        self.mint == spl_token::native_mint::id()
    }
}

/// Raw token balance plus decimals
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenAmount {
    pub amount: u64,
    pub decimals: u8,
}

/// Instructions destined for one transaction plus who pays and who signs
#[derive(Debug, Clone)]
pub struct InstructionBatch {
    pub payer: Pubkey,
    /// Wallets whose instructions are in this batch, in order
    pub signers: Vec<Pubkey>,
    pub instructions: Vec<Instruction>,
}

impl InstructionBatch {
    pub fn wallet_count(&self) -> usize {
        self.signers.len()
    }
}

/// Address classes registered in the lookup registry, in registration order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressClass {
    Wallets,
    BaseTokenAccounts,
    WrappedNativeAccounts,
    StaticAddresses,
}

impl AddressClass {
    pub const ORDER: [AddressClass; 4] = [
        AddressClass::Wallets,
        AddressClass::BaseTokenAccounts,
        AddressClass::WrappedNativeAccounts,
        AddressClass::StaticAddresses,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AddressClass::Wallets => "wallets",
            AddressClass::BaseTokenAccounts => "base_token_accounts",
            AddressClass::WrappedNativeAccounts => "wrapped_native_accounts",
            AddressClass::StaticAddresses => "static_addresses",
        }
    }
}

impl std::fmt::Display for AddressClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a full launch
#[derive(Debug, Clone)]
pub struct LaunchReport {
    pub mint: Pubkey,
    pub registry: Pubkey,
    pub distribution_signature: Signature,
    pub bundle_id: String,
    /// Buyer wallets whose instructions made it into the bundle
    pub wallets_bundled: usize,
    /// Buyer wallets dropped by the funds check
    pub wallets_skipped: usize,
    pub lamports_distributed: u64,
}

/// Aggregate of a recovery sweep
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub wallets_processed: usize,
    pub wallets_failed: usize,
    pub swaps_landed: usize,
    pub accounts_closed: usize,
    pub lamports_forwarded: u64,
}

impl SweepReport {
    pub fn merge(&mut self, other: &SweepReport) {
        self.wallets_processed += other.wallets_processed;
        self.wallets_failed += other.wallets_failed;
        self.swaps_landed += other.swaps_landed;
        self.accounts_closed += other.accounts_closed;
        self.lamports_forwarded += other.lamports_forwarded;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_budget_order() {
        let ixs = ComputeBudget::new(1_000_000, 200_000).instructions();
        assert_eq!(
            ixs[0],
            ComputeBudgetInstruction::set_compute_unit_limit(1_000_000)
        );
        assert_eq!(
            ixs[1],
            ComputeBudgetInstruction::set_compute_unit_price(200_000)
        );
    }

    #[test]
    fn test_plan_totals() {
        let leg = |lamports| FundingLeg {
            intermediary: Pubkey::new_unique(),
            buyer: Pubkey::new_unique(),
            lamports,
        };
        let plan = DistributionPlan {
            legs: vec![leg(11), leg(12), leg(13)],
            overhead_lamports: 100,
        };
        assert_eq!(plan.total_transfer(), 36);
        assert_eq!(plan.required_balance(), 136);
        assert_eq!(plan.len(), 3);
    }

    #[test]
    fn test_sweep_report_merge() {
        let mut total = SweepReport::default();
        total.merge(&SweepReport {
            wallets_processed: 1,
            swaps_landed: 2,
            accounts_closed: 1,
            lamports_forwarded: 500,
            ..Default::default()
        });
        total.merge(&SweepReport {
            wallets_processed: 1,
            wallets_failed: 1,
            ..Default::default()
        });
        assert_eq!(total.wallets_processed, 2);
        assert_eq!(total.wallets_failed, 1);
        assert_eq!(total.lamports_forwarded, 500);
    }

    #[test]
    fn test_class_order() {
        let names: Vec<_> = AddressClass::ORDER.iter().map(|c| c.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "wallets",
                "base_token_accounts",
                "wrapped_native_accounts",
                "static_addresses"
            ]
        );
    }
}
