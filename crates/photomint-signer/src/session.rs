//! Session state machine.
//!
//! Pure state, no I/O: the engine actor owns one [`SignerSession`] and
//! feeds it bridge events; every mutation happens on that single owner, so
//! a reported state can never interleave with a transition. The epoch
//! advances on approval, restore, disconnect and any account or chain
//! switch; anything derived from an older epoch is stale and must be
//! discarded by its holder.

use photomint_core::{Address, ChainId, EngineError, Result, SessionEpoch};

/// Where the session currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No session and no attempt in flight
    Disconnected,
    /// Relay transport is being opened
    BridgeConnecting,
    /// Proposal published; waiting for the signer to approve or reject
    AwaitingApproval,
    /// Approved session
    Connected {
        /// Account the signer exposed
        account: Address,
        /// Chain the signer is on
        chain: ChainId,
    },
    /// Transport dropped under an approved session; resume in progress
    Reconnecting {
        /// Account before the drop
        account: Address,
        /// Chain before the drop
        chain: ChainId,
    },
}

/// Outcome of applying a signer-initiated session update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionUpdate {
    /// Nothing the engine cares about changed
    Unchanged,
    /// Same account, different chain
    ChainChanged {
        /// Chain the session moved to
        chain: ChainId,
    },
    /// The signer switched accounts; everything derived from the previous
    /// account is now stale
    AccountChanged {
        /// Account before the switch
        previous: Address,
        /// Account after the switch
        current: Address,
    },
    /// The signer ended the session
    Ended,
}

/// The session state machine.
#[derive(Debug, Clone)]
pub struct SignerSession {
    required_chain: ChainId,
    state: SessionState,
    epoch: SessionEpoch,
}

impl SignerSession {
    /// A disconnected session that will require `required_chain` for writes.
    pub fn new(required_chain: ChainId) -> Self {
        Self {
            required_chain,
            state: SessionState::Disconnected,
            epoch: SessionEpoch::default(),
        }
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Epoch of the current session incarnation.
    pub fn epoch(&self) -> SessionEpoch {
        self.epoch
    }

    /// Chain writes are gated on.
    pub fn required_chain(&self) -> ChainId {
        self.required_chain
    }

    /// Connected account, if any.
    pub fn account(&self) -> Option<Address> {
        match self.state {
            SessionState::Connected { account, .. } | SessionState::Reconnecting { account, .. } => {
                Some(account)
            }
            _ => None,
        }
    }

    /// Chain of the current session, if any.
    pub fn chain(&self) -> Option<ChainId> {
        match self.state {
            SessionState::Connected { chain, .. } | SessionState::Reconnecting { chain, .. } => {
                Some(chain)
            }
            _ => None,
        }
    }

    /// True when a session exists but sits on the wrong chain. Such a
    /// session stays alive for reads and events; writes are refused.
    pub fn wrong_chain(&self) -> bool {
        matches!(self.chain(), Some(chain) if chain != self.required_chain)
    }

    /// The account, provided the session is approved and on the required
    /// chain.
    pub fn ready(&self) -> Result<Address> {
        match self.state {
            SessionState::Connected { account, chain } => {
                if chain != self.required_chain {
                    Err(EngineError::wrong_chain(self.required_chain, chain))
                } else {
                    Ok(account)
                }
            }
            _ => Err(EngineError::NotConnected),
        }
    }

    /// Start a connect attempt. Refused while any attempt or session
    /// exists.
    pub fn begin_connect(&mut self) -> Result<()> {
        match self.state {
            SessionState::Disconnected => {
                self.state = SessionState::BridgeConnecting;
                Ok(())
            }
            _ => Err(EngineError::already_pending("connect")),
        }
    }

    /// The relay subscription is live and the connect link can be shown.
    pub fn link_ready(&mut self) {
        if self.state == SessionState::BridgeConnecting {
            self.state = SessionState::AwaitingApproval;
        }
    }

    /// The signer approved the proposal.
    pub fn approved(&mut self, account: Address, chain: ChainId) {
        self.state = SessionState::Connected { account, chain };
        self.epoch = self.epoch.next();
    }

    /// A persisted session is being brought back up at startup.
    pub fn begin_restore(&mut self, account: Address, chain: ChainId) {
        if self.state == SessionState::Disconnected {
            self.state = SessionState::Reconnecting { account, chain };
        }
    }

    /// A persisted session came back up without a new hand-off.
    pub fn restored(&mut self, account: Address, chain: ChainId) {
        self.state = SessionState::Connected { account, chain };
        self.epoch = self.epoch.next();
    }

    /// Transport dropped under an approved session.
    pub fn begin_resume(&mut self) {
        if let SessionState::Connected { account, chain } = self.state {
            self.state = SessionState::Reconnecting { account, chain };
        }
    }

    /// Resume succeeded; the session continues under the same epoch, so
    /// observations running across the drop stay valid.
    pub fn resumed(&mut self) {
        if let SessionState::Reconnecting { account, chain } = self.state {
            self.state = SessionState::Connected { account, chain };
        }
    }

    /// Apply a signer-initiated update. Account changes dominate chain
    /// changes since they invalidate strictly more.
    pub fn apply_update(
        &mut self,
        approved: bool,
        account: Option<Address>,
        chain: Option<ChainId>,
    ) -> SessionUpdate {
        let SessionState::Connected {
            account: current_account,
            chain: current_chain,
        } = self.state
        else {
            return SessionUpdate::Unchanged;
        };

        if !approved {
            self.state = SessionState::Disconnected;
            self.epoch = self.epoch.next();
            return SessionUpdate::Ended;
        }

        let next_account = account.unwrap_or(current_account);
        let next_chain = chain.unwrap_or(current_chain);
        self.state = SessionState::Connected {
            account: next_account,
            chain: next_chain,
        };

        if next_account != current_account {
            self.epoch = self.epoch.next();
            SessionUpdate::AccountChanged {
                previous: current_account,
                current: next_account,
            }
        } else if next_chain != current_chain {
            self.epoch = self.epoch.next();
            SessionUpdate::ChainChanged { chain: next_chain }
        } else {
            SessionUpdate::Unchanged
        }
    }

    /// Drop to `Disconnected`. Returns true when there was a session or an
    /// attempt to tear down.
    pub fn disconnected(&mut self) -> bool {
        let had_anything = self.state != SessionState::Disconnected;
        if had_anything {
            self.state = SessionState::Disconnected;
            self.epoch = self.epoch.next();
        }
        had_anything
    }
}
