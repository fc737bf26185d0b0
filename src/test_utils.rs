//! Test Utilities Module
//!
//! In-memory doubles for every external seam of the launch pipeline: the
//! ledger RPC, the block-builder, the swap aggregator, metadata uploads, key
//! persistence and child processes. All of them are deterministic and record
//! what they were asked to do.
//!
//! These utilities are only compiled when running tests or when the
//! `test_utils` feature is enabled.

#![cfg(any(test, feature = "test_utils"))]

use async_trait::async_trait;
use parking_lot::Mutex;
use solana_sdk::{
    address_lookup_table::{
        self as lookup_table_program, instruction::ProgramInstruction, AddressLookupTableAccount,
    },
    hash::Hash,
    message::{v0::Message as MessageV0, VersionedMessage},
    pubkey::Pubkey,
    signature::{Keypair, Signature, Signer},
    system_instruction::{self, SystemInstruction},
    system_program,
    transaction::VersionedTransaction,
};
use std::collections::{HashMap, HashSet, VecDeque};

use crate::errors::{LaunchError, LaunchResult};
use crate::launch::bundle::{BundleReceipt, Bundler, LaunchBundle};
use crate::launch::handoff::{ExternalProcess, ProcessHandle, ProcessSpec};
use crate::launch::metadata::{MetadataUploader, TokenMetadata};
use crate::launch::SwapAggregator;
use crate::observability::TraceContext;
use crate::persistence::{KeyFile, KeyStore};
use crate::rpc_manager::{LedgerRpc, RpcManagerError, RpcResult};
use crate::types::{TokenAmount, WalletTokenPosition};

const MOCK_ENDPOINT: &str = "mock";

/// Rent of a 165-byte token account on mainnet
pub const MOCK_TOKEN_ACCOUNT_RENT: u64 = 2_039_280;

fn not_found(account: &Pubkey) -> RpcManagerError {
    RpcManagerError::AccountNotFound {
        account: account.to_string(),
        endpoint: MOCK_ENDPOINT.to_string(),
    }
}

struct LedgerState {
    balances: HashMap<Pubkey, u64>,
    rent: u64,
    slot: u64,
    positions: HashMap<Pubkey, Vec<WalletTokenPosition>>,
    token_balances: HashMap<Pubkey, TokenAmount>,
    missing_owners: HashSet<Pubkey>,
    lookup_tables: HashMap<Pubkey, AddressLookupTableAccount>,
    send_failures: VecDeque<RpcManagerError>,
    landed_failures: VecDeque<RpcManagerError>,
    send_attempts: usize,
    simulations: usize,
    simulation_error: Option<String>,
    sent: Vec<VersionedTransaction>,
    close_on_send: Vec<Pubkey>,
    landed: RpcResult<bool>,
}

impl Default for LedgerState {
    fn default() -> Self {
        Self {
            balances: HashMap::new(),
            rent: MOCK_TOKEN_ACCOUNT_RENT,
            slot: 1_000,
            positions: HashMap::new(),
            token_balances: HashMap::new(),
            missing_owners: HashSet::new(),
            lookup_tables: HashMap::new(),
            send_failures: VecDeque::new(),
            landed_failures: VecDeque::new(),
            send_attempts: 0,
            simulations: 0,
            simulation_error: None,
            sent: Vec::new(),
            close_on_send: Vec::new(),
            landed: Ok(false),
        }
    }
}

/// In-memory ledger
///
/// Unknown balances read as zero and confirmed system transfers move
/// lamports. Lookup tables exist once a create or extend lands. Token accounts must be registered with
/// [`MockLedger::add_token_account`]; anything else is `AccountNotFound`.
#[derive(Default)]
pub struct MockLedger {
    state: Mutex<LedgerState>,
}

impl MockLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_balance(&self, pubkey: &Pubkey, lamports: u64) {
        self.state.lock().balances.insert(*pubkey, lamports);
    }

    pub fn balance(&self, pubkey: &Pubkey) -> u64 {
        self.state.lock().balances.get(pubkey).copied().unwrap_or(0)
    }

    pub fn set_rent(&self, lamports: u64) {
        self.state.lock().rent = lamports;
    }

    /// Register a token account under its owner
    pub fn add_token_account(&self, position: WalletTokenPosition) {
        let mut state = self.state.lock();
        state.token_balances.insert(
            position.token_account,
            TokenAmount {
                amount: position.amount,
                decimals: position.decimals,
            },
        );
        state.positions.entry(position.owner).or_default().push(position);
    }

    /// Remove a token account, as if it had been closed
    pub fn close_token_account(&self, token_account: &Pubkey) {
        let mut state = self.state.lock();
        close_account(&mut state, token_account);
    }

    /// Close `token_account` when the next transaction confirms
    pub fn close_on_next_send(&self, token_account: &Pubkey) {
        self.state.lock().close_on_send.push(*token_account);
    }

    /// Token account enumeration for `owner` fails with `AccountNotFound`
    pub fn fail_owner_lookup(&self, owner: &Pubkey) {
        self.state.lock().missing_owners.insert(*owner);
    }

    /// Lookup table as the ledger sees it, if it was created
    pub fn lookup_table(&self, address: &Pubkey) -> Option<AddressLookupTableAccount> {
        self.state.lock().lookup_tables.get(address).cloned()
    }

    /// The next `count` sends fail with `error`
    pub fn fail_next_sends(&self, count: usize, error: RpcManagerError) {
        let mut state = self.state.lock();
        for _ in 0..count {
            state.send_failures.push_back(error.clone());
        }
    }

    /// The next `count` sends land on the ledger but still report `error`,
    /// as when confirmation times out after inclusion
    pub fn land_then_fail_next_sends(&self, count: usize, error: RpcManagerError) {
        let mut state = self.state.lock();
        for _ in 0..count {
            state.landed_failures.push_back(error.clone());
        }
    }

    /// Every simulation reports `error` as the transaction's failure
    pub fn fail_simulations(&self, error: &str) {
        self.state.lock().simulation_error = Some(error.to_string());
    }

    pub fn simulations(&self) -> usize {
        self.state.lock().simulations
    }

    pub fn set_signature_landed(&self, landed: RpcResult<bool>) {
        self.state.lock().landed = landed;
    }

    /// Every send call, failed ones included
    pub fn send_attempts(&self) -> usize {
        self.state.lock().send_attempts
    }

    /// Transactions that landed, in order
    pub fn sent_transactions(&self) -> Vec<VersionedTransaction> {
        self.state.lock().sent.clone()
    }
}

fn close_account(state: &mut LedgerState, token_account: &Pubkey) {
    state.token_balances.remove(token_account);
    for positions in state.positions.values_mut() {
        positions.retain(|p| p.token_account != *token_account);
    }
}

/// Create and extend lookup tables addressed by static keys
fn apply_lookup_table_ops(state: &mut LedgerState, tx: &VersionedTransaction) {
    let keys = tx.message.static_account_keys();
    for ix in tx.message.instructions() {
        if keys.get(ix.program_id_index as usize) != Some(&lookup_table_program::program::id()) {
            continue;
        }
        let Some(table) = ix.accounts.first().and_then(|i| keys.get(*i as usize)) else {
            continue;
        };
        let entry = state
            .lookup_tables
            .entry(*table)
            .or_insert_with(|| AddressLookupTableAccount {
                key: *table,
                addresses: vec![],
            });
        if let Ok(ProgramInstruction::ExtendLookupTable { new_addresses }) =
            bincode::deserialize(&ix.data)
        {
            entry.addresses.extend(new_addresses);
        }
    }
}

/// Move lamports for every system transfer with statically addressed accounts
fn apply_transfers(state: &mut LedgerState, tx: &VersionedTransaction) {
    let keys = tx.message.static_account_keys();
    for ix in tx.message.instructions() {
        if keys.get(ix.program_id_index as usize) != Some(&system_program::id()) {
            continue;
        }
        let Ok(SystemInstruction::Transfer { lamports }) = bincode::deserialize(&ix.data) else {
            continue;
        };
        let (Some(from), Some(to)) = (
            ix.accounts.first().and_then(|i| keys.get(*i as usize)),
            ix.accounts.get(1).and_then(|i| keys.get(*i as usize)),
        ) else {
            continue;
        };
        let from_balance = state.balances.entry(*from).or_insert(0);
        *from_balance = from_balance.saturating_sub(lamports);
        *state.balances.entry(*to).or_insert(0) += lamports;
    }
}

#[async_trait]
impl LedgerRpc for MockLedger {
    fn endpoint(&self) -> &str {
        MOCK_ENDPOINT
    }

    async fn get_balance(&self, pubkey: &Pubkey) -> RpcResult<u64> {
        Ok(self.balance(pubkey))
    }

    async fn get_slot(&self) -> RpcResult<u64> {
        let mut state = self.state.lock();
        state.slot += 1;
        Ok(state.slot)
    }

    async fn get_latest_blockhash(&self) -> RpcResult<Hash> {
        Ok(Hash::new_unique())
    }

    async fn get_minimum_balance_for_rent_exemption(&self, _data_len: usize) -> RpcResult<u64> {
        Ok(self.state.lock().rent)
    }

    async fn get_token_accounts_by_owner(
        &self,
        owner: &Pubkey,
    ) -> RpcResult<Vec<WalletTokenPosition>> {
        let state = self.state.lock();
        if state.missing_owners.contains(owner) {
            return Err(not_found(owner));
        }
        Ok(state.positions.get(owner).cloned().unwrap_or_default())
    }

    async fn get_token_account_balance(&self, token_account: &Pubkey) -> RpcResult<TokenAmount> {
        self.state
            .lock()
            .token_balances
            .get(token_account)
            .copied()
            .ok_or_else(|| not_found(token_account))
    }

    async fn get_address_lookup_table(
        &self,
        address: &Pubkey,
    ) -> RpcResult<AddressLookupTableAccount> {
        self.lookup_table(address).ok_or_else(|| not_found(address))
    }

    async fn simulate_transaction(&self, _tx: &VersionedTransaction) -> RpcResult<Option<String>> {
        let mut state = self.state.lock();
        state.simulations += 1;
        Ok(state.simulation_error.clone())
    }

    async fn send_and_confirm_transaction(
        &self,
        tx: &VersionedTransaction,
    ) -> RpcResult<Signature> {
        let mut state = self.state.lock();
        state.send_attempts += 1;
        if let Some(err) = state.send_failures.pop_front() {
            return Err(err);
        }
        for account in std::mem::take(&mut state.close_on_send) {
            close_account(&mut state, &account);
        }
        apply_lookup_table_ops(&mut state, tx);
        apply_transfers(&mut state, tx);
        state.sent.push(tx.clone());
        if let Some(err) = state.landed_failures.pop_front() {
            return Err(err);
        }
        Ok(tx.signatures.first().copied().unwrap_or_default())
    }

    async fn signature_landed(&self, _signature: &Signature) -> RpcResult<bool> {
        self.state.lock().landed.clone()
    }
}

/// Key store that keeps entries in memory
#[derive(Default)]
pub struct MemoryKeyStore {
    files: Mutex<HashMap<KeyFile, Vec<String>>>,
}

impl MemoryKeyStore {
    pub fn entries(&self, file: KeyFile) -> Vec<String> {
        self.files.lock().get(&file).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl KeyStore for MemoryKeyStore {
    async fn append(&self, file: KeyFile, entries: &[&str]) -> LaunchResult<()> {
        self.files
            .lock()
            .entry(file)
            .or_default()
            .extend(entries.iter().map(|e| e.to_string()));
        Ok(())
    }

    async fn load(&self, file: KeyFile) -> LaunchResult<Vec<String>> {
        Ok(self.entries(file))
    }
}

/// Block-builder double
pub struct MockBundler {
    succeed: bool,
    available: bool,
    submissions: Mutex<Vec<Vec<Signature>>>,
}

impl MockBundler {
    fn with(succeed: bool, available: bool) -> Self {
        Self {
            succeed,
            available,
            submissions: Mutex::new(Vec::new()),
        }
    }

    pub fn new_success() -> Self {
        Self::with(true, true)
    }

    /// Accepts submissions but every bundle is declined
    pub fn new_failure() -> Self {
        Self::with(false, true)
    }

    /// Reports itself unreachable before anything is submitted
    pub fn unavailable() -> Self {
        Self::with(false, false)
    }

    /// First signature of every transaction, per submitted bundle
    pub fn submissions(&self) -> Vec<Vec<Signature>> {
        self.submissions.lock().clone()
    }
}

#[async_trait]
impl Bundler for MockBundler {
    async fn submit_bundle(
        &self,
        bundle: &LaunchBundle,
        _trace_ctx: &TraceContext,
    ) -> LaunchResult<BundleReceipt> {
        self.submissions.lock().push(
            bundle
                .transactions()
                .iter()
                .map(|tx| tx.signatures[0])
                .collect(),
        );
        if !self.succeed {
            return Err(LaunchError::bundle_rejected("mock block engine declined", false));
        }
        Ok(BundleReceipt {
            bundle_id: format!("mock-bundle-{}", self.submissions.lock().len()),
            landed_slot: Some(1),
        })
    }

    fn is_available(&self) -> bool {
        self.available
    }
}

/// Aggregator double returning a tiny self-transfer signed by the seller
#[derive(Default)]
pub struct MockAggregator {
    no_route: bool,
    calls: Mutex<Vec<(Pubkey, Pubkey, u64)>>,
}

impl MockAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every quote comes back without a route
    pub fn without_route() -> Self {
        Self {
            no_route: true,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// (wallet, mint, amount) per sell request
    pub fn calls(&self) -> Vec<(Pubkey, Pubkey, u64)> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl SwapAggregator for MockAggregator {
    async fn sell_transaction(
        &self,
        wallet: &Keypair,
        mint: &Pubkey,
        amount: u64,
    ) -> LaunchResult<VersionedTransaction> {
        self.calls.lock().push((wallet.pubkey(), *mint, amount));
        if self.no_route {
            return Err(LaunchError::no_route(mint, "mock has no route"));
        }
        let ix = system_instruction::transfer(&wallet.pubkey(), &wallet.pubkey(), 1);
        let message = MessageV0::try_compile(&wallet.pubkey(), &[ix], &[], Hash::new_unique())
            .map_err(LaunchError::from)?;
        Ok(VersionedTransaction::try_new(
            VersionedMessage::V0(message),
            &[wallet],
        )?)
    }
}

/// Upload double with fixed URIs
#[derive(Default)]
pub struct MockUploader {
    documents: Mutex<Vec<TokenMetadata>>,
}

impl MockUploader {
    pub const IMAGE_URI: &'static str = "https://mock.storage/image";
    pub const METADATA_URI: &'static str = "https://mock.storage/meta";

    pub fn documents(&self) -> Vec<TokenMetadata> {
        self.documents.lock().clone()
    }
}

#[async_trait]
impl MetadataUploader for MockUploader {
    async fn upload_image(&self, _file_name: &str, _bytes: Vec<u8>) -> LaunchResult<String> {
        Ok(Self::IMAGE_URI.to_string())
    }

    async fn upload_metadata(&self, metadata: &TokenMetadata) -> LaunchResult<String> {
        self.documents.lock().push(metadata.clone());
        Ok(Self::METADATA_URI.to_string())
    }
}

/// Child-process double that records launches and terminations
#[derive(Default)]
pub struct MockProcessRunner {
    launched: Mutex<Vec<ProcessSpec>>,
    terminated: Mutex<Vec<ProcessHandle>>,
}

impl MockProcessRunner {
    pub fn launched(&self) -> Vec<ProcessSpec> {
        self.launched.lock().clone()
    }

    pub fn terminated(&self) -> Vec<ProcessHandle> {
        self.terminated.lock().clone()
    }
}

#[async_trait]
impl ExternalProcess for MockProcessRunner {
    async fn launch(&self, spec: &ProcessSpec) -> LaunchResult<ProcessHandle> {
        let mut launched = self.launched.lock();
        launched.push(spec.clone());
        Ok(ProcessHandle(launched.len() as u64))
    }

    async fn terminate(&self, handle: ProcessHandle) -> LaunchResult<()> {
        self.terminated.lock().push(handle);
        Ok(())
    }
}
