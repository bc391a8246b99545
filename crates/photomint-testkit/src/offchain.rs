//! Scripted off-chain service.

use std::collections::VecDeque;

use async_trait::async_trait;
use parking_lot::Mutex;

use photomint_core::{Address, Result};
use photomint_engine::{FaucetStatus, OffchainApi, RemoteContracts};

use crate::CallLog;

struct OffchainState {
    grants: VecDeque<Result<String>>,
    claimed: bool,
    status: FaucetStatus,
    contracts: Option<RemoteContracts>,
}

/// Off-chain service with scripted answers.
pub struct ScriptedOffchain {
    state: Mutex<OffchainState>,
    log: CallLog,
}

impl ScriptedOffchain {
    /// Grant id served when no grant script is queued.
    pub fn default_grant_id() -> String {
        format!("0x{}", "5a".repeat(32))
    }

    /// A service with an open faucet and no prior claim.
    pub fn new() -> Self {
        Self::with_log(CallLog::new())
    }

    /// A service recording into a shared `log`.
    pub fn with_log(log: CallLog) -> Self {
        Self {
            state: Mutex::new(OffchainState {
                grants: VecDeque::new(),
                claimed: false,
                status: FaucetStatus {
                    open: true,
                    spent: 0,
                    limit: 100,
                },
                contracts: None,
            }),
            log,
        }
    }

    /// Queue the answer for the next faucet claim.
    pub fn script_grant(&self, result: Result<String>) {
        self.state.lock().grants.push_back(result);
    }

    /// Whether the account already used its grant.
    pub fn set_claimed(&self, claimed: bool) {
        self.state.lock().claimed = claimed;
    }

    /// Faucet accounting served to status queries.
    pub fn set_status(&self, status: FaucetStatus) {
        self.state.lock().status = status;
    }

    /// Contract addresses served to config fetches.
    pub fn set_contracts(&self, contracts: RemoteContracts) {
        self.state.lock().contracts = Some(contracts);
    }
}

impl Default for ScriptedOffchain {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OffchainApi for ScriptedOffchain {
    async fn claim_faucet(&self, _account: Address) -> Result<String> {
        self.log.record("claim_faucet");
        let mut state = self.state.lock();
        match state.grants.pop_front() {
            Some(result) => result,
            None => Ok(Self::default_grant_id()),
        }
    }

    async fn already_claimed(&self, _account: Address) -> Result<bool> {
        self.log.record("already_claimed");
        Ok(self.state.lock().claimed)
    }

    async fn faucet_status(&self) -> Result<FaucetStatus> {
        self.log.record("faucet_status");
        Ok(self.state.lock().status)
    }

    async fn contracts(&self) -> Result<RemoteContracts> {
        self.log.record("contracts");
        self.state
            .lock()
            .contracts
            .ok_or_else(|| photomint_core::EngineError::offchain(404, "no contracts configured"))
    }
}
