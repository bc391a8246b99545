//! Operation dispatch.
//!
//! One dispatch worker runs per submitted operation. It captures the
//! confirmation baseline, builds the call payload, and routes it either
//! through the signer bridge (under a send keep-alive guard) or, for
//! faucet claims, through the companion service. The worker never touches
//! engine state; it reports back with a single [`DispatchOutcome`] command
//! and lets the engine decide whether the result is still current.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::RngCore;
use sha2::{Digest, Sha256};
use tokio::sync::mpsc;

use photomint_chain::{calls, LedgerReads};
use photomint_core::{
    Address, ChainProfile, CollectionPayload, EngineError, OperationKind, Result, TokenPayload,
    TxHash, TxRequest, B256, U256,
};
use photomint_signer::{GuardPurpose, GuardRegistry, SignerBridge};

use crate::engine::EngineCommand;
use crate::offchain::OffchainApi;

/// One write operation as the caller states it.
#[derive(Debug, Clone, PartialEq)]
pub enum OperationRequest {
    /// Mint into a public collection behind the router
    PublicMint {
        /// Router implementation version to mint under
        version: u64,
        /// Pre-fetched token id; the router assigns one when absent
        token_id: Option<U256>,
        /// Metadata URI of the new token
        meta_uri: String,
        /// Opaque token payload stored on chain
        payload: TokenPayload,
    },
    /// Mint into one of the account's private collection clones
    PrivateMint {
        /// Deployed collection clone to mint into
        collection: Address,
        /// Metadata URI of the new token
        meta_uri: String,
        /// Opaque token payload stored on chain
        payload: TokenPayload,
    },
    /// Let the collection factory spend utility tokens
    Approve {
        /// Exact allowance to grant; `None` approves the shortfall
        /// against the current collection price
        amount: Option<U256>,
    },
    /// Deploy a new private collection clone
    PurchaseCollection {
        /// Collection name
        name: String,
        /// Collection symbol
        symbol: String,
        /// Metadata URI of the collection
        collection_meta: String,
        /// Metadata URI of its access token
        access_token_meta: String,
        /// Opaque collection payload stored on chain
        payload: CollectionPayload,
    },
    /// Ask the off-chain faucet for the one-time native-gas grant
    FaucetClaim,
}

impl OperationRequest {
    /// The kind slot this request occupies while in flight.
    pub fn kind(&self) -> OperationKind {
        match self {
            OperationRequest::PublicMint { .. } => OperationKind::PublicMint,
            OperationRequest::PrivateMint { .. } => OperationKind::PrivateMint,
            OperationRequest::Approve { .. } => OperationKind::Approve,
            OperationRequest::PurchaseCollection { .. } => OperationKind::PurchaseCollection,
            OperationRequest::FaucetClaim => OperationKind::FaucetClaim,
        }
    }
}

/// What a successful dispatch hands the engine.
#[derive(Debug)]
pub(crate) struct DispatchSuccess {
    /// Acknowledgement hash from the signer, or the grant transaction
    pub tx_hash: TxHash,
    /// Metric reading captured before the hand-off
    pub baseline: U256,
    /// Reading the confirmation predicate must reach, where one applies
    pub target: Option<U256>,
    /// Deterministic address of the collection a purchase will deploy
    pub predicted: Option<Address>,
    /// Raw grant id, present for faucet claims only
    pub grant_id: Option<String>,
}

/// Terminal report of one dispatch worker.
#[derive(Debug)]
pub(crate) struct DispatchOutcome {
    pub ticket: u64,
    pub kind: OperationKind,
    pub account: Address,
    pub result: Result<DispatchSuccess>,
}

/// Everything a dispatch worker needs, captured at submit time.
pub(crate) struct DispatchContext {
    pub ledger: Arc<dyn LedgerReads>,
    pub bridge: Arc<dyn SignerBridge>,
    pub offchain: Arc<dyn OffchainApi>,
    pub guards: Arc<GuardRegistry>,
    pub profile: ChainProfile,
    pub account: Address,
    pub request: OperationRequest,
    pub ticket: u64,
    pub commands: mpsc::Sender<EngineCommand>,
}

enum Prepared {
    Transaction {
        tx: TxRequest,
        target: Option<U256>,
        predicted: Option<Address>,
    },
    Grant,
}

/// Run one dispatch to completion and report the outcome.
pub(crate) async fn run(ctx: DispatchContext) {
    let kind = ctx.request.kind();
    tracing::debug!(kind = kind.as_str(), ticket = ctx.ticket, "dispatch started");
    let result = execute(&ctx).await;
    let outcome = DispatchOutcome {
        ticket: ctx.ticket,
        kind,
        account: ctx.account,
        result,
    };
    if ctx
        .commands
        .send(EngineCommand::DispatchDone(outcome))
        .await
        .is_err()
    {
        tracing::debug!(kind = kind.as_str(), "engine gone before dispatch outcome delivery");
    }
}

async fn execute(ctx: &DispatchContext) -> Result<DispatchSuccess> {
    let kind = ctx.request.kind();
    // The baseline must exist before anything leaves this process.
    let baseline = ctx.ledger.metric(ctx.account, kind).await?;

    match prepare(ctx, baseline).await? {
        Prepared::Grant => {
            let grant_id = ctx.offchain.claim_faucet(ctx.account).await?;
            let tx_hash = parse_grant_id(&grant_id)?;
            Ok(DispatchSuccess {
                tx_hash,
                baseline,
                target: None,
                predicted: None,
                grant_id: Some(grant_id),
            })
        }
        Prepared::Transaction {
            tx,
            target,
            predicted,
        } => {
            let guard = ctx.guards.acquire(GuardPurpose::Send)?;
            if ctx
                .commands
                .send(EngineCommand::SendStarted {
                    kind,
                    ticket: ctx.ticket,
                })
                .await
                .is_err()
            {
                return Err(EngineError::connection("engine stopped"));
            }
            let tx_hash = ctx.bridge.send_transaction(ctx.account, &tx).await?;
            guard.release();
            Ok(DispatchSuccess {
                tx_hash,
                baseline,
                target,
                predicted,
                grant_id: None,
            })
        }
    }
}

async fn prepare(ctx: &DispatchContext, baseline: U256) -> Result<Prepared> {
    match &ctx.request {
        OperationRequest::PublicMint {
            version,
            token_id,
            meta_uri,
            payload,
        } => {
            let tx = calls::public_mint(&ctx.profile, *version, *token_id, meta_uri, payload)?;
            Ok(Prepared::Transaction {
                tx,
                target: None,
                predicted: None,
            })
        }
        OperationRequest::PrivateMint {
            collection,
            meta_uri,
            payload,
        } => {
            let tx = calls::private_mint(*collection, ctx.account, meta_uri, payload)?;
            Ok(Prepared::Transaction {
                tx,
                target: None,
                predicted: None,
            })
        }
        OperationRequest::Approve { amount } => {
            let price = ctx.ledger.collection_price().await?;
            let (amount, required) = approve_terms(*amount, price, baseline);
            Ok(Prepared::Transaction {
                tx: calls::approve(&ctx.profile, amount),
                target: Some(required),
                predicted: None,
            })
        }
        OperationRequest::PurchaseCollection {
            name,
            symbol,
            collection_meta,
            access_token_meta,
            payload,
        } => {
            let salt = purchase_salt(ctx.account);
            let predicted = ctx.ledger.predict_collection_address(salt).await?;
            let tx = calls::purchase_collection(
                &ctx.profile,
                salt,
                name,
                symbol,
                collection_meta,
                access_token_meta,
                payload,
            )?;
            Ok(Prepared::Transaction {
                tx,
                target: None,
                predicted: Some(predicted),
            })
        }
        OperationRequest::FaucetClaim => Ok(Prepared::Grant),
    }
}

/// The amount handed to the signer and the reading that counts as
/// confirmed. A default approve asks for the shortfall only, but is
/// confirmed when the allowance covers the full price.
fn approve_terms(requested: Option<U256>, price: U256, current: U256) -> (U256, U256) {
    match requested {
        Some(amount) => (amount, amount),
        None => (price.saturating_sub(current), price),
    }
}

fn parse_grant_id(id: &str) -> Result<TxHash> {
    id.parse::<TxHash>()
        .map_err(|_| EngineError::offchain(200, format!("malformed grant id: {id}")))
}

/// Single-use salt for a deterministic collection deployment.
pub(crate) fn purchase_salt(account: Address) -> B256 {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos())
        .unwrap_or_default();
    let mut entropy = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut entropy);

    let mut hasher = Sha256::new();
    hasher.update(account.as_slice());
    hasher.update(nanos.to_be_bytes());
    hasher.update(entropy);
    B256::from_slice(&hasher.finalize())
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn default_approve_asks_for_the_shortfall_but_requires_the_price() {
        let price = U256::from(10u64);
        let (amount, required) = approve_terms(None, price, U256::from(4u64));
        assert_eq!(amount, U256::from(6u64));
        assert_eq!(required, price);

        // Nothing missing: a zero approve, confirmed immediately.
        let (amount, required) = approve_terms(None, price, U256::from(12u64));
        assert_eq!(amount, U256::ZERO);
        assert_eq!(required, price);
    }

    #[test]
    fn explicit_approve_amount_is_both_grant_and_requirement() {
        let (amount, required) =
            approve_terms(Some(U256::from(7u64)), U256::from(10u64), U256::ZERO);
        assert_eq!(amount, U256::from(7u64));
        assert_eq!(required, U256::from(7u64));
    }

    #[test]
    fn salts_never_repeat() {
        let account = Address::repeat_byte(0x11);
        assert_ne!(purchase_salt(account), purchase_salt(account));
    }

    #[test]
    fn grant_ids_parse_as_transaction_hashes() {
        let id = format!("0x{}", "7e".repeat(32));
        assert_eq!(parse_grant_id(&id).unwrap(), TxHash::repeat_byte(0x7e));
        assert_matches!(
            parse_grant_id("not-a-hash"),
            Err(EngineError::Offchain { .. })
        );
    }

    #[test]
    fn requests_occupy_their_kind_slot() {
        assert_eq!(OperationRequest::FaucetClaim.kind(), OperationKind::FaucetClaim);
        assert_eq!(
            OperationRequest::Approve { amount: None }.kind(),
            OperationKind::Approve
        );
    }
}
