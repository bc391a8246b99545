//! Snapshot refresh.
//!
//! Reads run off the engine task and come back as a batch of ready
//! events. A failed read is logged and skipped so one flaky endpoint
//! never blanks snapshots that did load; the engine drops the whole
//! batch when the session epoch moved while the reads were in flight.

use std::sync::Arc;

use tokio::sync::mpsc;

use photomint_chain::LedgerReads;
use photomint_core::{Address, EngineEvent, OperationKind, SessionEpoch};

use crate::engine::EngineCommand;

/// Which snapshots a refresh pass rebuilds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RefreshPlan {
    /// Everything an account view needs; runs at session establishment
    /// and on demand
    Full,
    /// Only the snapshots an operation of this kind can have moved
    AfterConfirm(OperationKind),
}

/// Everything one refresh pass needs.
pub(crate) struct RefreshContext {
    pub ledger: Arc<dyn LedgerReads>,
    pub plan: RefreshPlan,
    pub account: Address,
    pub epoch: SessionEpoch,
    pub commands: mpsc::Sender<EngineCommand>,
}

/// Run the plan's reads and report the batch.
pub(crate) async fn run(ctx: RefreshContext) {
    let events = collect(&ctx).await;
    let finished = EngineCommand::RefreshFinished {
        epoch: ctx.epoch,
        events,
    };
    if ctx.commands.send(finished).await.is_err() {
        tracing::debug!("engine gone before refresh delivery");
    }
}

async fn collect(ctx: &RefreshContext) -> Vec<EngineEvent> {
    let mut events = Vec::new();
    match ctx.plan {
        RefreshPlan::Full => {
            native_balance(ctx, &mut events).await;
            token_balance(ctx, &mut events).await;
            allowance(ctx, &mut events).await;
            price(ctx, &mut events).await;
            public_gallery(ctx, &mut events).await;
            private_gallery(ctx, &mut events).await;
        }
        RefreshPlan::AfterConfirm(OperationKind::PublicMint) => {
            public_gallery(ctx, &mut events).await;
        }
        RefreshPlan::AfterConfirm(OperationKind::PrivateMint) => {
            private_gallery(ctx, &mut events).await;
        }
        RefreshPlan::AfterConfirm(OperationKind::Approve) => {
            allowance(ctx, &mut events).await;
        }
        RefreshPlan::AfterConfirm(OperationKind::PurchaseCollection) => {
            private_gallery(ctx, &mut events).await;
            allowance(ctx, &mut events).await;
            token_balance(ctx, &mut events).await;
        }
        RefreshPlan::AfterConfirm(OperationKind::FaucetClaim) => {
            native_balance(ctx, &mut events).await;
        }
    }
    events
}

async fn native_balance(ctx: &RefreshContext, events: &mut Vec<EngineEvent>) {
    match ctx.ledger.native_balance(ctx.account).await {
        Ok(balance) => events.push(EngineEvent::BalanceUpdated { balance }),
        Err(error) => tracing::warn!(%error, "native balance refresh failed; snapshot kept"),
    }
}

async fn token_balance(ctx: &RefreshContext, events: &mut Vec<EngineEvent>) {
    match ctx.ledger.token_balance(ctx.account).await {
        Ok(balance) => events.push(EngineEvent::TokenBalanceUpdated { balance }),
        Err(error) => tracing::warn!(%error, "token balance refresh failed; snapshot kept"),
    }
}

async fn allowance(ctx: &RefreshContext, events: &mut Vec<EngineEvent>) {
    match ctx.ledger.allowance(ctx.account).await {
        Ok(allowance) => events.push(EngineEvent::AllowanceUpdated { allowance }),
        Err(error) => tracing::warn!(%error, "allowance refresh failed; snapshot kept"),
    }
}

async fn price(ctx: &RefreshContext, events: &mut Vec<EngineEvent>) {
    match ctx.ledger.collection_price().await {
        Ok(price) => events.push(EngineEvent::PriceUpdated { price }),
        Err(error) => tracing::warn!(%error, "collection price refresh failed; snapshot kept"),
    }
}

async fn public_gallery(ctx: &RefreshContext, events: &mut Vec<EngineEvent>) {
    match ctx.ledger.public_gallery(ctx.account).await {
        Ok(gallery) => events.push(EngineEvent::PublicGalleryUpdated {
            gallery: Arc::new(gallery),
        }),
        Err(error) => tracing::warn!(%error, "public gallery refresh failed; snapshot kept"),
    }
}

async fn private_gallery(ctx: &RefreshContext, events: &mut Vec<EngineEvent>) {
    match ctx.ledger.private_gallery(ctx.account).await {
        Ok(gallery) => events.push(EngineEvent::PrivateGalleryUpdated {
            gallery: Arc::new(gallery),
        }),
        Err(error) => tracing::warn!(%error, "private gallery refresh failed; snapshot kept"),
    }
}
