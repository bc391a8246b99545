//! Session lifecycle against scripted transports: hand-off, restore,
//! resume, and teardown.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use assert_matches::assert_matches;

use photomint_core::{
    Address, ChainId, DisconnectReason, EngineConfig, EngineError, EngineEvent,
};
use photomint_engine::OperationRequest;
use photomint_signer::{BridgeEvent, GuardPurpose, Handshake, PersistedSession, SessionState};
use photomint_testkit::EngineHarness;

fn persisted(account: Address) -> PersistedSession {
    PersistedSession {
        handshake: Handshake::generate("ws://127.0.0.1:18546"),
        peer_id: "signer-peer".into(),
        account,
        chain: ChainId::POLYGON_TESTNET,
    }
}

#[tokio::test(start_paused = true)]
async fn approval_establishes_and_persists_the_session() {
    let mut h = EngineHarness::spawn();

    h.handle.connect(None).await.unwrap();
    let link = h
        .wait_for(|e| matches!(e, EngineEvent::ConnectLinkReady { .. }))
        .await;
    assert_matches!(link, EngineEvent::ConnectLinkReady { connect_uri, wallet_link } => {
        assert!(connect_uri.starts_with("wc:"));
        assert!(wallet_link.is_none());
    });

    let account = EngineHarness::test_account();
    h.bridge
        .emit(BridgeEvent::SessionApproved {
            account,
            chain: ChainId::POLYGON_TESTNET,
            peer_id: Some("signer-peer".into()),
        })
        .await;

    let established = h
        .wait_for(|e| matches!(e, EngineEvent::SessionEstablished { .. }))
        .await;
    assert_eq!(
        established,
        EngineEvent::SessionEstablished {
            account,
            chain: ChainId::POLYGON_TESTNET,
            wrong_chain: false,
        }
    );

    // The approved session is on record for the next start.
    let saved = h.store.stored().expect("session persisted");
    assert_eq!(saved.account, account);
    assert_eq!(saved.peer_id, "signer-peer");

    // Approval kicks off a full snapshot refresh.
    h.wait_for(|e| matches!(e, EngineEvent::PrivateGalleryUpdated { .. }))
        .await;

    let snapshot = h.handle.session().await.unwrap();
    assert_matches!(snapshot.state, SessionState::Connected { .. });
    assert!(!snapshot.wrong_chain);

    // The hand-off suspension window opened and closed exactly once.
    assert_eq!(
        h.host.windows(),
        vec![
            ("begin", GuardPurpose::Connect),
            ("end", GuardPurpose::Connect),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn wallet_choice_launches_the_wallet_app() {
    let mut h = EngineHarness::spawn();

    h.handle.connect(Some("metamask")).await.unwrap();
    let link = h
        .wait_for(|e| matches!(e, EngineEvent::ConnectLinkReady { .. }))
        .await;
    assert_matches!(link, EngineEvent::ConnectLinkReady { wallet_link: Some(link), .. } => {
        assert!(link.starts_with("https://metamask.app.link/wc?uri="));
    });

    // The launch itself happens after the configured delay.
    h.wait_until("the wallet launch", || h.launcher.launched().len() == 1)
        .await;
    assert!(h.launcher.launched()[0].starts_with("https://metamask.app.link/"));
}

#[tokio::test(start_paused = true)]
async fn unknown_wallet_ids_are_refused_before_anything_opens() {
    let h = EngineHarness::spawn();

    let err = h.handle.connect(Some("nonesuch")).await.unwrap_err();
    assert_matches!(err, EngineError::Config { .. });
    assert_eq!(h.log.count("open"), 0);
    assert!(h.launcher.launched().is_empty());
}

#[tokio::test(start_paused = true)]
async fn second_connect_is_refused_while_one_is_in_flight() {
    let mut h = EngineHarness::spawn();

    h.handle.connect(None).await.unwrap();
    h.wait_for(|e| matches!(e, EngineEvent::ConnectLinkReady { .. }))
        .await;

    let err = h.handle.connect(None).await.unwrap_err();
    assert_matches!(err, EngineError::AlreadyPending { .. });
}

#[tokio::test(start_paused = true)]
async fn rejection_tears_the_attempt_down() {
    let mut h = EngineHarness::spawn();

    h.handle.connect(None).await.unwrap();
    h.wait_for(|e| matches!(e, EngineEvent::ConnectLinkReady { .. }))
        .await;

    h.bridge.emit(BridgeEvent::SessionRejected).await;
    let down = h
        .wait_for(|e| matches!(e, EngineEvent::Disconnected { .. }))
        .await;
    assert_eq!(
        down,
        EngineEvent::Disconnected {
            reason: DisconnectReason::PeerEnded,
        }
    );

    assert!(h.store.stored().is_none());
    let snapshot = h.handle.session().await.unwrap();
    assert_matches!(snapshot.state, SessionState::Disconnected);

    // The guard was returned, so a fresh attempt goes straight through.
    h.handle.connect(None).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn failed_relay_open_fails_the_connect_call_only() {
    let mut h = EngineHarness::spawn();
    h.bridge
        .fail_next_open(EngineError::connection("relay refused"));

    let err = h.handle.connect(None).await.unwrap_err();
    assert_matches!(err, EngineError::Connection { .. });

    // No session ever existed, so no disconnect is published; the next
    // attempt proves the machine was reset.
    h.handle.connect(None).await.unwrap();
    let link = h
        .wait_for(|e| matches!(e, EngineEvent::ConnectLinkReady { .. }))
        .await;
    assert_matches!(link, EngineEvent::ConnectLinkReady { .. });
}

#[tokio::test(start_paused = true)]
async fn wrong_chain_session_gates_writes_but_not_reads() {
    let mut h = EngineHarness::spawn();

    h.handle.connect(None).await.unwrap();
    h.bridge
        .emit(BridgeEvent::SessionApproved {
            account: EngineHarness::test_account(),
            chain: ChainId::POLYGON,
            peer_id: None,
        })
        .await;

    let established = h
        .wait_for(|e| matches!(e, EngineEvent::SessionEstablished { .. }))
        .await;
    assert_matches!(established, EngineEvent::SessionEstablished { wrong_chain: true, .. });

    let err = h
        .handle
        .submit(OperationRequest::Approve { amount: None })
        .await
        .unwrap_err();
    assert_matches!(
        err,
        EngineError::WrongChain { expected, actual }
            if expected == ChainId::POLYGON_TESTNET && actual == ChainId::POLYGON
    );

    // No initial load fired for the wrong-chain session.
    while let Ok(event) = h.events.try_recv() {
        assert!(
            !matches!(event, EngineEvent::BalanceUpdated { .. }),
            "initial load must wait for the required chain"
        );
    }

    // An explicit refresh still serves while the chain is wrong.
    h.handle.refresh().await.unwrap();
    h.wait_for(|e| matches!(e, EngineEvent::BalanceUpdated { .. }))
        .await;

    // The signer moving to the required chain lifts the gate and runs
    // the full load.
    h.bridge
        .emit(BridgeEvent::SessionUpdated {
            approved: true,
            account: None,
            chain: Some(ChainId::POLYGON_TESTNET),
        })
        .await;
    let updated = h
        .wait_for(|e| matches!(e, EngineEvent::SessionUpdated { .. }))
        .await;
    assert_matches!(updated, EngineEvent::SessionUpdated { wrong_chain: false, .. });
    h.wait_for(|e| matches!(e, EngineEvent::PrivateGalleryUpdated { .. }))
        .await;
}

#[tokio::test(start_paused = true)]
async fn persisted_session_restores_at_startup() {
    let account = EngineHarness::test_account();
    let mut h = EngineHarness::spawn_with(EngineConfig::for_testing(), Some(persisted(account)));

    let restored = h
        .wait_for(|e| matches!(e, EngineEvent::SessionRestored { .. }))
        .await;
    assert_eq!(
        restored,
        EngineEvent::SessionRestored {
            account,
            chain: ChainId::POLYGON_TESTNET,
            wrong_chain: false,
        }
    );

    // Restore resumes the saved hand-off instead of opening a new one.
    assert_eq!(h.log.count("resume"), 1);
    assert_eq!(h.log.count("open"), 0);

    // The usual full refresh follows.
    h.wait_for(|e| matches!(e, EngineEvent::BalanceUpdated { .. }))
        .await;

    let snapshot = h.handle.session().await.unwrap();
    assert_matches!(snapshot.state, SessionState::Connected { .. });
}

#[tokio::test(start_paused = true)]
async fn failed_restore_clears_the_stored_session() {
    let account = EngineHarness::test_account();
    let mut h = EngineHarness::spawn_with(EngineConfig::for_testing(), Some(persisted(account)));
    h.bridge
        .fail_next_resume(EngineError::connection("relay refused"));

    let down = h
        .wait_for(|e| matches!(e, EngineEvent::Disconnected { .. }))
        .await;
    assert_eq!(
        down,
        EngineEvent::Disconnected {
            reason: DisconnectReason::RestoreFailed,
        }
    );

    // The stale record is gone; the next start will not retry it.
    assert!(h.store.stored().is_none());

    // A fresh connect still works after the failed restore.
    h.handle.connect(None).await.unwrap();
    h.bridge
        .emit(BridgeEvent::SessionApproved {
            account,
            chain: ChainId::POLYGON_TESTNET,
            peer_id: None,
        })
        .await;
    h.wait_for(|e| matches!(e, EngineEvent::SessionEstablished { .. }))
        .await;
}

#[tokio::test(start_paused = true)]
async fn unreadable_store_degrades_to_a_clean_start() {
    let mut h = EngineHarness::spawn();
    // fail_next_load is armed before the engine's first poll runs.
    h.store.fail_next_load(EngineError::store("corrupt record"));

    // The engine comes up disconnected and fully usable.
    h.handle.connect(None).await.unwrap();
    h.wait_for(|e| matches!(e, EngineEvent::ConnectLinkReady { .. }))
        .await;
}

#[tokio::test(start_paused = true)]
async fn transport_drop_resumes_under_the_session() {
    let mut h = EngineHarness::spawn();
    h.establish().await;

    h.bridge
        .emit(BridgeEvent::Closed {
            reason: DisconnectReason::BridgeClosed,
        })
        .await;

    h.wait_until("the bridge resume", || h.log.count("resume") == 1)
        .await;
    // The session settles back to connected without consumer-visible churn.
    let mut settled = false;
    for _ in 0..100 {
        let snapshot = h.handle.session().await.unwrap();
        if matches!(snapshot.state, SessionState::Connected { .. }) {
            settled = true;
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(1)).await;
    }
    assert!(settled, "session did not settle after resume");

    while let Ok(event) = h.events.try_recv() {
        assert!(
            !matches!(event, EngineEvent::Disconnected { .. }),
            "a successful resume must stay silent"
        );
    }
}

#[tokio::test(start_paused = true)]
async fn failed_resume_ends_the_session_but_keeps_the_record() {
    let mut h = EngineHarness::spawn();
    h.establish().await;
    h.bridge
        .fail_next_resume(EngineError::connection("relay gone"));

    h.bridge
        .emit(BridgeEvent::Closed {
            reason: DisconnectReason::BridgeClosed,
        })
        .await;
    let down = h
        .wait_for(|e| matches!(e, EngineEvent::Disconnected { .. }))
        .await;
    assert_eq!(
        down,
        EngineEvent::Disconnected {
            reason: DisconnectReason::BridgeClosed,
        }
    );

    // A mid-run drop keeps the record; the next startup retries the
    // restore from it.
    assert!(h.store.stored().is_some());
    let snapshot = h.handle.session().await.unwrap();
    assert_matches!(snapshot.state, SessionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn peer_end_clears_the_session_and_record() {
    let mut h = EngineHarness::spawn();
    h.establish().await;

    h.bridge
        .emit(BridgeEvent::SessionUpdated {
            approved: false,
            account: None,
            chain: None,
        })
        .await;
    let down = h
        .wait_for(|e| matches!(e, EngineEvent::Disconnected { .. }))
        .await;
    assert_eq!(
        down,
        EngineEvent::Disconnected {
            reason: DisconnectReason::PeerEnded,
        }
    );
    assert!(h.store.stored().is_none());
}

#[tokio::test(start_paused = true)]
async fn disconnect_clears_session_record_and_transport() {
    let mut h = EngineHarness::spawn();
    h.establish().await;

    h.handle.disconnect().await.unwrap();
    let down = h
        .wait_for(|e| matches!(e, EngineEvent::Disconnected { .. }))
        .await;
    assert_eq!(
        down,
        EngineEvent::Disconnected {
            reason: DisconnectReason::Requested,
        }
    );
    assert!(h.store.stored().is_none());
    h.wait_until("the bridge close", || h.log.count("close") == 1)
        .await;

    // A second disconnect is a quiet no-op.
    h.handle.disconnect().await.unwrap();
    let snapshot = h.handle.session().await.unwrap();
    assert_matches!(snapshot.state, SessionState::Disconnected);
}
