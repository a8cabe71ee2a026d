#![allow(dead_code)]

use async_trait::async_trait;
use solana_sdk::hash::Hash;
use solana_sdk::instruction::{AccountMeta, CompiledInstruction, Instruction};
use solana_sdk::message::{Message, VersionedMessage};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signature};
use solana_sdk::transaction::{Transaction, VersionedTransaction};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use vault_swap_lib::constants::{
    CBBTC_MINT, JUPITER_V6_PROGRAM_ID, NATIVE_MINT, VAULT_PROGRAM_ID,
};
use vault_swap_lib::{find_vault_address, VaultCall};
use vault_swap_relay::aggregator::{slippage_floor, Aggregator, Quote, QuoteRequest};
use vault_swap_relay::client::{AccountSnapshot, ChainRpc, RpcFailure, SignatureState};
use vault_swap_relay::pipeline::{PipelineSettings, SubmitPolicy, SwapPipeline};
use vault_swap_relay::RelayError;

pub const ADMIN: Pubkey = Pubkey::new_from_array([7u8; 32]);
pub const FEE_RECIPIENT: Pubkey = Pubkey::new_from_array([8u8; 32]);

/// In-memory chain. Every unknown account exists unless marked missing.
pub struct MockRpc {
    pub default_balance: Mutex<u64>,
    pub balances: Mutex<HashMap<Pubkey, u64>>,
    pub accounts: Mutex<HashMap<Pubkey, AccountSnapshot>>,
    pub missing: Mutex<HashSet<Pubkey>>,
    /// Network fee quote; `None` makes pricing fail.
    pub fee: Mutex<Option<u64>>,
    /// Consumed one per broadcast; an empty script accepts.
    pub send_script: Mutex<VecDeque<RpcFailure>>,
    pub status: Mutex<SignatureState>,
    pub send_delay: Mutex<Duration>,
    pub sent: Mutex<Vec<Transaction>>,
    pub balance_calls: AtomicUsize,
    pub checkpoint_calls: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl Default for MockRpc {
    fn default() -> Self {
        Self {
            default_balance: Mutex::new(1_000_000),
            balances: Mutex::new(HashMap::new()),
            accounts: Mutex::new(HashMap::new()),
            missing: Mutex::new(HashSet::new()),
            fee: Mutex::new(Some(5_000)),
            send_script: Mutex::new(VecDeque::new()),
            status: Mutex::new(SignatureState::Confirmed),
            send_delay: Mutex::new(Duration::ZERO),
            sent: Mutex::new(Vec::new()),
            balance_calls: AtomicUsize::new(0),
            checkpoint_calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }
}

impl MockRpc {
    pub fn set_balance(&self, address: Pubkey, lamports: u64) {
        self.balances.lock().unwrap().insert(address, lamports);
    }

    pub fn script_sends(&self, failures: impl IntoIterator<Item = RpcFailure>) {
        self.send_script.lock().unwrap().extend(failures);
    }

    pub fn set_status(&self, status: SignatureState) {
        *self.status.lock().unwrap() = status;
    }

    pub fn sent(&self) -> Vec<Transaction> {
        self.sent.lock().unwrap().clone()
    }

    pub fn send_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl ChainRpc for MockRpc {
    async fn latest_checkpoint(&self) -> Result<Hash, RpcFailure> {
        self.checkpoint_calls.fetch_add(1, Ordering::SeqCst);
        Ok(Hash::new_unique())
    }

    async fn fee_for_message(&self, _message: &Message) -> Result<u64, RpcFailure> {
        let fee = *self.fee.lock().unwrap();
        fee.ok_or_else(|| RpcFailure::Transient("fee pricing unavailable".into()))
    }

    async fn balance(&self, address: &Pubkey) -> Result<u64, RpcFailure> {
        self.balance_calls.fetch_add(1, Ordering::SeqCst);
        let default = *self.default_balance.lock().unwrap();
        Ok(self
            .balances
            .lock()
            .unwrap()
            .get(address)
            .copied()
            .unwrap_or(default))
    }

    async fn account(&self, address: &Pubkey) -> Result<Option<AccountSnapshot>, RpcFailure> {
        if let Some(account) = self.accounts.lock().unwrap().get(address) {
            return Ok(Some(account.clone()));
        }
        if self.missing.lock().unwrap().contains(address) {
            return Ok(None);
        }
        Ok(Some(AccountSnapshot {
            owner: vault_swap_lib::constants::TOKEN_PROGRAM_ID,
            lamports: 2_039_280,
            data: vec![0; 165],
        }))
    }

    async fn send_transaction(&self, transaction: &Transaction) -> Result<Signature, RpcFailure> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let delay = *self.send_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        self.sent.lock().unwrap().push(transaction.clone());
        match self.send_script.lock().unwrap().pop_front() {
            Some(failure) => Err(failure),
            None => Ok(transaction.signatures[0]),
        }
    }

    async fn signature_status(&self, _signature: &Signature) -> Result<SignatureState, RpcFailure> {
        Ok(self.status.lock().unwrap().clone())
    }
}

/// Quotes every pair and answers with a legacy route transaction.
pub struct MockAggregator {
    pub program: Pubkey,
    pub no_route_inputs: Mutex<HashSet<Pubkey>>,
    pub no_route_outputs: Mutex<HashSet<Pubkey>>,
    pub quotes: Mutex<Vec<QuoteRequest>>,
    pub swap_calls: AtomicUsize,
}

impl Default for MockAggregator {
    fn default() -> Self {
        Self {
            program: JUPITER_V6_PROGRAM_ID,
            no_route_inputs: Mutex::new(HashSet::new()),
            no_route_outputs: Mutex::new(HashSet::new()),
            quotes: Mutex::new(Vec::new()),
            swap_calls: AtomicUsize::new(0),
        }
    }
}

impl MockAggregator {
    pub fn quote_requests(&self) -> Vec<QuoteRequest> {
        self.quotes.lock().unwrap().clone()
    }
}

#[async_trait]
impl Aggregator for MockAggregator {
    async fn quote(&self, request: &QuoteRequest) -> Result<Quote, RelayError> {
        self.quotes.lock().unwrap().push(request.clone());
        if self.no_route_inputs.lock().unwrap().contains(&request.input_mint)
            || self.no_route_outputs.lock().unwrap().contains(&request.output_mint)
        {
            return Err(RelayError::NoRoute {
                input: request.input_mint,
                output: request.output_mint,
            });
        }
        let amount_out = request.amount / 1_000 + 1;
        Ok(Quote {
            input_mint: request.input_mint,
            output_mint: request.output_mint,
            amount_in: request.amount,
            amount_out,
            min_amount_out: slippage_floor(amount_out, request.slippage_bps),
            slippage_bps: request.slippage_bps,
            route: serde_json::json!({ "inAmount": request.amount.to_string() }),
            fetched_at: Instant::now(),
        })
    }

    async fn swap_transaction(
        &self,
        quote: &Quote,
        signer: &Pubkey,
        _wrap_native: bool,
    ) -> Result<Vec<u8>, RelayError> {
        self.swap_calls.fetch_add(1, Ordering::SeqCst);
        Ok(route_container(&self.program, signer, quote.amount_in))
    }
}

/// Bincode `VersionedTransaction` with a setup instruction and one route
/// instruction for `program`, signed by nobody.
pub fn route_container(program: &Pubkey, signer: &Pubkey, amount: u64) -> Vec<u8> {
    let mut data = vec![0xe5, 0x17, 0xcb, 0x97, 0x7a, 0xe3, 0xad, 0x2a];
    data.extend_from_slice(&amount.to_le_bytes());
    let setup = Instruction::new_with_bytes(Pubkey::new_unique(), &[2], vec![]);
    let route = Instruction::new_with_bytes(
        *program,
        &data,
        vec![
            AccountMeta::new(*signer, true),
            AccountMeta::new(Pubkey::new_unique(), false),
            AccountMeta::new_readonly(Pubkey::new_unique(), false),
        ],
    );
    let message = Message::new_with_blockhash(&[setup, route], Some(signer), &Hash::default());
    let transaction = VersionedTransaction {
        signatures: vec![Signature::default(); usize::from(message.header.num_required_signatures)],
        message: VersionedMessage::Legacy(message),
    };
    bincode::serialize(&transaction).unwrap()
}

pub fn settings(dry_run: bool) -> PipelineSettings {
    PipelineSettings {
        vault_program: VAULT_PROGRAM_ID,
        aggregator_program: JUPITER_V6_PROGRAM_ID,
        settlement_mint: CBBTC_MINT,
        admin_recipient: ADMIN,
        fee_recipient: FEE_RECIPIENT,
        min_vault_balance: 100_000,
        slippage_bps: 50,
        fee_margin_lamports: 5_000,
        fallback_fee_lamports: 10_000,
        stage_timeout: Duration::from_secs(2),
        quote_ttl: Duration::from_secs(20),
        wrap_native_fee_leg: true,
        dry_run,
    }
}

pub fn fast_policy() -> SubmitPolicy {
    SubmitPolicy {
        broadcast_attempts: 3,
        initial_backoff: Duration::from_millis(1),
        confirm_timeout: Duration::from_millis(200),
        poll_interval: Duration::from_millis(5),
        checkpoint_timeout: Duration::from_secs(1),
    }
}

pub struct Harness {
    pub rpc: Arc<MockRpc>,
    pub aggregator: Arc<MockAggregator>,
    pub signer: Arc<Keypair>,
    pub pipeline: Arc<SwapPipeline>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_settings(settings(false))
    }

    pub fn with_settings(settings: PipelineSettings) -> Self {
        Self::with_policy(settings, fast_policy())
    }

    pub fn with_policy(settings: PipelineSettings, policy: SubmitPolicy) -> Self {
        let rpc = Arc::new(MockRpc::default());
        let aggregator = Arc::new(MockAggregator::default());
        let signer = Arc::new(Keypair::new());
        let pipeline = Arc::new(SwapPipeline::new(
            rpc.clone(),
            aggregator.clone(),
            signer.clone(),
            settings,
            policy,
        ));
        Self {
            rpc,
            aggregator,
            signer,
            pipeline,
        }
    }
}

pub fn vault_of(owner: &Pubkey) -> Pubkey {
    find_vault_address(owner, &VAULT_PROGRAM_ID).0
}

/// Decoded vault-program calls of a sent transaction, in order.
pub fn vault_calls(transaction: &Transaction) -> Vec<VaultCall> {
    let keys = &transaction.message.account_keys;
    transaction
        .message
        .instructions
        .iter()
        .filter(|ix| keys[usize::from(ix.program_id_index)] == VAULT_PROGRAM_ID)
        .map(|ix: &CompiledInstruction| VaultCall::decode(&ix.data).unwrap())
        .collect()
}

pub fn is_native_output(request: &QuoteRequest) -> bool {
    request.output_mint == NATIVE_MINT
}
