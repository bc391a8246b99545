//! Confirmation polling.
//!
//! An externally signed write has no local receipt; the only proof it
//! landed is a per-kind metric moving past the baseline captured before
//! the hand-off. One poller task runs per acknowledged operation. Read
//! errors and readings below the baseline burn an attempt and are
//! otherwise ignored, so the attempt bound is a hard ceiling on the whole
//! observation. The poller never decides staleness; the engine matches
//! the reported ticket against its live table and drops anything stale.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::sleep;

use photomint_chain::LedgerReads;
use photomint_core::{Address, ObserverConfig, OperationKind, U256};

use crate::engine::EngineCommand;

/// How one observation ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ObservationOutcome {
    /// The predicate held
    Confirmed { reading: U256, attempts: u32 },
    /// The attempt bound ran out first
    Expired { attempts: u32 },
}

/// Everything one poller needs, captured at acknowledgement time.
pub(crate) struct ObservationContext {
    pub ledger: Arc<dyn LedgerReads>,
    pub config: ObserverConfig,
    pub kind: OperationKind,
    pub account: Address,
    pub baseline: U256,
    pub target: Option<U256>,
    pub ticket: u64,
    pub commands: mpsc::Sender<EngineCommand>,
}

/// Poll until the predicate holds or the bound runs out, then report.
pub(crate) async fn run(ctx: ObservationContext) {
    let outcome = poll(&ctx).await;
    let finished = EngineCommand::ObservationFinished {
        ticket: ctx.ticket,
        kind: ctx.kind,
        outcome,
    };
    if ctx.commands.send(finished).await.is_err() {
        tracing::debug!(
            kind = ctx.kind.as_str(),
            "engine gone before observation outcome delivery"
        );
    }
}

async fn poll(ctx: &ObservationContext) -> ObservationOutcome {
    let interval = ctx.config.poll_interval();
    for attempt in 1..=ctx.config.max_attempts {
        sleep(interval).await;
        let latest = match ctx.ledger.metric(ctx.account, ctx.kind).await {
            Ok(latest) => latest,
            Err(error) => {
                tracing::warn!(
                    kind = ctx.kind.as_str(),
                    attempt,
                    %error,
                    "poll tick failed; ignoring"
                );
                continue;
            }
        };
        if latest < ctx.baseline {
            tracing::warn!(
                kind = ctx.kind.as_str(),
                attempt,
                %latest,
                baseline = %ctx.baseline,
                "reading below the baseline; ignoring tick"
            );
            continue;
        }
        if predicate_holds(ctx.kind, ctx.baseline, ctx.target, latest) {
            tracing::info!(
                kind = ctx.kind.as_str(),
                attempt,
                %latest,
                "operation confirmed"
            );
            return ObservationOutcome::Confirmed {
                reading: latest,
                attempts: attempt,
            };
        }
        tracing::debug!(kind = ctx.kind.as_str(), attempt, %latest, "no movement yet");
    }
    ObservationOutcome::Expired {
        attempts: ctx.config.max_attempts,
    }
}

/// Whether `latest` proves the operation of `kind` took effect. Counts
/// and balances must strictly exceed the baseline; an approve must reach
/// its required reading. A reading below the baseline never confirms.
pub(crate) fn predicate_holds(
    kind: OperationKind,
    baseline: U256,
    target: Option<U256>,
    latest: U256,
) -> bool {
    if latest < baseline {
        return false;
    }
    match (kind, target) {
        (OperationKind::Approve, Some(required)) => latest >= required,
        _ => latest > baseline,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_confirm_only_on_a_strict_increase() {
        let baseline = U256::from(3u64);
        assert!(!predicate_holds(OperationKind::PublicMint, baseline, None, baseline));
        assert!(predicate_holds(
            OperationKind::PublicMint,
            baseline,
            None,
            baseline + U256::from(1u64),
        ));
        assert!(predicate_holds(
            OperationKind::FaucetClaim,
            U256::ZERO,
            None,
            U256::from(1u64),
        ));
    }

    #[test]
    fn approve_confirms_at_the_required_reading() {
        let required = Some(U256::from(10u64));
        assert!(!predicate_holds(OperationKind::Approve, U256::ZERO, required, U256::from(6u64)));
        assert!(predicate_holds(OperationKind::Approve, U256::ZERO, required, U256::from(10u64)));
        // Movement alone is not enough for an approve.
        assert!(!predicate_holds(OperationKind::Approve, U256::ZERO, required, U256::from(1u64)));
    }

    #[test]
    fn readings_below_the_baseline_never_confirm() {
        let baseline = U256::from(5u64);
        assert!(!predicate_holds(OperationKind::PurchaseCollection, baseline, None, U256::from(4u64)));
        assert!(!predicate_holds(
            OperationKind::Approve,
            baseline,
            Some(U256::from(3u64)),
            U256::from(4u64),
        ));
    }
}
