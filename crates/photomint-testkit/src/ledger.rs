//! Scripted ledger reads.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use parking_lot::Mutex;

use photomint_chain::{LedgerReads, PublicTokensPage};
use photomint_core::{
    Address, OperationKind, PrivateCollectionRecord, PublicCollectionRecord, Result, TokenRecord,
    B256, U256,
};

use crate::CallLog;

struct LedgerState {
    scalars: HashMap<OperationKind, U256>,
    scripts: HashMap<OperationKind, VecDeque<Result<U256>>>,
    token_balance: U256,
    price: U256,
    predicted: Address,
    public_collections: Vec<PublicCollectionRecord>,
    public_tokens: Vec<TokenRecord>,
    private_collections: Vec<PrivateCollectionRecord>,
    private_tokens: Vec<TokenRecord>,
    page_size: u64,
}

/// Ledger whose reads come from per-kind scripts with steady fallbacks.
///
/// Each confirmation metric pops its script queue first and falls back
/// to the base scalar once the queue drains, so a test can stage an
/// exact sequence of poll readings (including errors) without timing
/// coordination. Galleries are served from fixed record fixtures, paged
/// the same way the production reader pages.
pub struct ScriptedLedger {
    state: Mutex<LedgerState>,
    log: CallLog,
}

impl ScriptedLedger {
    /// A ledger where every read succeeds with zero.
    pub fn new() -> Self {
        Self::with_log(CallLog::new())
    }

    /// A ledger recording into a shared `log`.
    pub fn with_log(log: CallLog) -> Self {
        Self {
            state: Mutex::new(LedgerState {
                scalars: HashMap::new(),
                scripts: HashMap::new(),
                token_balance: U256::ZERO,
                price: U256::ZERO,
                predicted: Address::repeat_byte(0xcc),
                public_collections: Vec::new(),
                public_tokens: Vec::new(),
                private_collections: Vec::new(),
                private_tokens: Vec::new(),
                page_size: 10,
            }),
            log,
        }
    }

    /// Base value of the confirmation metric for `kind`.
    pub fn set_scalar(&self, kind: OperationKind, value: U256) {
        self.state.lock().scalars.insert(kind, value);
    }

    /// Queue one scripted reading (or read failure) for `kind`; queued
    /// entries are served before the base value.
    pub fn push_scalar(&self, kind: OperationKind, result: Result<U256>) {
        self.state
            .lock()
            .scripts
            .entry(kind)
            .or_default()
            .push_back(result);
    }

    /// Utility-token balance served to refreshes.
    pub fn set_token_balance(&self, value: U256) {
        self.state.lock().token_balance = value;
    }

    /// Collection price served to refreshes and approve dispatches.
    pub fn set_price(&self, value: U256) {
        self.state.lock().price = value;
    }

    /// Address every deployment prediction resolves to.
    pub fn set_predicted(&self, address: Address) {
        self.state.lock().predicted = address;
    }

    /// Fixture served through the public-tokens pages.
    pub fn set_public_fixture(
        &self,
        collections: Vec<PublicCollectionRecord>,
        tokens: Vec<TokenRecord>,
    ) {
        let mut state = self.state.lock();
        state.public_collections = collections;
        state.public_tokens = tokens;
    }

    /// Fixture served through the private-collection pages.
    pub fn set_private_fixture(
        &self,
        collections: Vec<PrivateCollectionRecord>,
        tokens: Vec<TokenRecord>,
    ) {
        let mut state = self.state.lock();
        state.private_collections = collections;
        state.private_tokens = tokens;
    }

    /// Page size the gallery assembly will use.
    pub fn set_page_size(&self, size: u64) {
        self.state.lock().page_size = size;
    }

    fn scalar(&self, method: &'static str, kind: OperationKind) -> Result<U256> {
        self.log.record(method);
        let mut state = self.state.lock();
        if let Some(scripted) = state.scripts.get_mut(&kind).and_then(VecDeque::pop_front) {
            return scripted;
        }
        Ok(state.scalars.get(&kind).copied().unwrap_or(U256::ZERO))
    }
}

impl Default for ScriptedLedger {
    fn default() -> Self {
        Self::new()
    }
}

fn page_of<T: Clone>(items: &[T], page: u64, size: u64) -> Vec<T> {
    let start = (page * size) as usize;
    let end = start.saturating_add(size as usize).min(items.len());
    if start >= items.len() {
        return Vec::new();
    }
    items[start..end].to_vec()
}

#[async_trait]
impl LedgerReads for ScriptedLedger {
    async fn public_token_total(&self, _account: Address) -> Result<U256> {
        self.scalar("public_token_total", OperationKind::PublicMint)
    }

    async fn private_token_total(&self, _account: Address) -> Result<U256> {
        self.scalar("private_token_total", OperationKind::PrivateMint)
    }

    async fn private_collection_count(&self, _account: Address) -> Result<U256> {
        self.scalar("private_collection_count", OperationKind::PurchaseCollection)
    }

    async fn native_balance(&self, _account: Address) -> Result<U256> {
        self.scalar("native_balance", OperationKind::FaucetClaim)
    }

    async fn token_balance(&self, _account: Address) -> Result<U256> {
        self.log.record("token_balance");
        Ok(self.state.lock().token_balance)
    }

    async fn allowance(&self, _owner: Address) -> Result<U256> {
        self.scalar("allowance", OperationKind::Approve)
    }

    async fn collection_price(&self) -> Result<U256> {
        self.log.record("collection_price");
        Ok(self.state.lock().price)
    }

    async fn predict_collection_address(&self, _salt: B256) -> Result<Address> {
        self.log.record("predict_collection_address");
        Ok(self.state.lock().predicted)
    }

    async fn public_tokens_page(
        &self,
        _account: Address,
        page: u64,
        size: u64,
    ) -> Result<PublicTokensPage> {
        self.log.record("public_tokens_page");
        let state = self.state.lock();
        Ok(PublicTokensPage {
            collections: state.public_collections.clone(),
            tokens: page_of(&state.public_tokens, page, size),
            total: U256::from(state.public_tokens.len()),
        })
    }

    async fn private_collections_page(
        &self,
        _account: Address,
        page: u64,
        size: u64,
    ) -> Result<Vec<PrivateCollectionRecord>> {
        self.log.record("private_collections_page");
        let state = self.state.lock();
        Ok(page_of(&state.private_collections, page, size))
    }

    async fn private_tokens(
        &self,
        _account: Address,
        _collections: &[PrivateCollectionRecord],
    ) -> Result<Vec<TokenRecord>> {
        self.log.record("private_tokens");
        Ok(self.state.lock().private_tokens.clone())
    }

    fn page_size(&self) -> u64 {
        self.state.lock().page_size
    }
}
