//! End-to-end hold protocol tests
//!
//! Drives the hold reducer through a real store with a scripted gateway and
//! a deterministic clock, under paused tokio time so countdown ticks run
//! instantly.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use aperture_booking::gateway::mock::{GatewayCall, MockGateway};
use aperture_booking::gateway::{
    AvailabilityResponse, FinalizeResponse, GatewayError, HoldSlotResponse,
};
use aperture_booking::{
    BookingId, HoldPhase, HoldSupport, OwnerRef, SlotHoldAction, SlotHoldEnvironment,
    SlotHoldReducer, SlotHoldState, SlotId, TimeSelection, WizardStep,
};
use aperture_core::environment::Clock;
use aperture_runtime::Store;
use aperture_testing::{TestClock, test_clock};
use chrono::{NaiveDate, NaiveTime};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

type HoldStore = Store<SlotHoldState, SlotHoldAction, SlotHoldEnvironment, SlotHoldReducer>;

fn setup(gateway: &MockGateway) -> (HoldStore, TestClock) {
    let clock = test_clock();
    let environment =
        SlotHoldEnvironment::new(Arc::new(clock.clone()), Arc::new(gateway.clone()), 10);
    let store = Store::with_broadcast_capacity(
        SlotHoldState::new(),
        SlotHoldReducer,
        environment,
        256,
    );
    (store, clock)
}

fn selection() -> TimeSelection {
    TimeSelection::new(
        NaiveDate::from_ymd_opt(2025, 6, 15).unwrap(),
        NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
        NaiveTime::from_hms_opt(12, 0, 0).unwrap(),
    )
}

fn guest() -> OwnerRef {
    OwnerRef::Guest {
        token: aperture_booking::GuestToken::new(),
    }
}

fn granted_hold(slot_id: SlotId, clock: &TestClock, seconds: i64) -> HoldSlotResponse {
    HoldSlotResponse {
        success: true,
        slot_id: Some(slot_id),
        expires_at: Some(clock.now() + chrono::Duration::seconds(seconds)),
        message: None,
    }
}

async fn wait_for<F>(
    rx: &mut broadcast::Receiver<SlotHoldAction>,
    predicate: F,
) -> SlotHoldAction
where
    F: Fn(&SlotHoldAction) -> bool,
{
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            match rx.recv().await {
                Ok(action) if predicate(&action) => return action,
                Ok(_) => {},
                Err(broadcast::error::RecvError::Lagged(_)) => {},
                Err(broadcast::error::RecvError::Closed) => panic!("action broadcast closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for action")
}

/// Let feedback actions work through the reduce path
async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

async fn acquire(store: &HoldStore) {
    store
        .send_and_wait_for(
            SlotHoldAction::RequestHold {
                selection: selection(),
                owner: guest(),
            },
            |a| matches!(a, SlotHoldAction::HoldAcquired { .. }),
            Duration::from_secs(10),
        )
        .await
        .expect("hold should be granted");
    settle().await;
}

#[tokio::test(start_paused = true)]
async fn happy_path_acquire_countdown_finalize() {
    let gateway = MockGateway::new();
    let (store, clock) = setup(&gateway);
    let slot_id = SlotId::new();
    gateway.push_hold(Ok(granted_hold(slot_id, &clock, 600)));
    gateway.push_finalize(Ok(FinalizeResponse {
        success: true,
        message: None,
    }));

    acquire(&store).await;

    let (phase_held, countdown, step) = store
        .state(|s| {
            (
                matches!(s.phase, HoldPhase::Held { .. }),
                s.countdown.map(|c| c.to_string()),
                s.wizard_step,
            )
        })
        .await;
    assert!(phase_held);
    assert_eq!(countdown.as_deref(), Some("10:00"));
    assert_eq!(step, WizardStep::Details);

    let booking_id = BookingId::new();
    store
        .send_and_wait_for(
            SlotHoldAction::Finalize { booking_id },
            |a| matches!(a, SlotHoldAction::HoldFinalized),
            Duration::from_secs(10),
        )
        .await
        .expect("finalization should succeed");
    settle().await;

    assert_eq!(store.state(|s| s.phase).await, HoldPhase::Finalized);

    let calls = gateway.calls();
    assert!(matches!(calls[0], GatewayCall::Check { .. }));
    assert!(matches!(calls[1], GatewayCall::Hold { .. }));
    assert!(calls
        .iter()
        .any(|c| matches!(c, GatewayCall::Finalize { booking_id: id, .. } if *id == booking_id)));
}

#[tokio::test(start_paused = true)]
async fn explicit_unavailability_blocks_the_wizard() {
    let gateway = MockGateway::new();
    let (store, _clock) = setup(&gateway);
    gateway.push_availability(Ok(AvailabilityResponse {
        available: false,
        message: Some("This time slot is currently being booked".to_string()),
    }));

    store
        .send_and_wait_for(
            SlotHoldAction::RequestHold {
                selection: selection(),
                owner: guest(),
            },
            |a| matches!(a, SlotHoldAction::HoldRejected { .. }),
            Duration::from_secs(10),
        )
        .await
        .expect("rejection expected");
    settle().await;

    assert_eq!(store.state(|s| s.phase).await, HoldPhase::Idle);
    assert_eq!(store.state(|s| s.wizard_step).await, WizardStep::Schedule);
    let error = store.state(|s| s.last_error.clone()).await.unwrap();
    assert!(error.contains("currently being booked"));

    // The hold RPC was never attempted
    assert!(!gateway
        .calls()
        .iter()
        .any(|c| matches!(c, GatewayCall::Hold { .. })));
}

#[tokio::test(start_paused = true)]
async fn availability_outage_is_assumed_free() {
    let gateway = MockGateway::new();
    let (store, clock) = setup(&gateway);
    gateway.push_availability(Err(GatewayError::Transport {
        message: "connection refused".to_string(),
    }));
    gateway.push_hold(Ok(granted_hold(SlotId::new(), &clock, 600)));

    acquire(&store).await;

    assert!(store.state(SlotHoldState::can_advance).await);
}

#[tokio::test(start_paused = true)]
async fn missing_hold_subsystem_degrades_and_is_cached() {
    let gateway = MockGateway::new();
    let (store, _clock) = setup(&gateway);
    // Unscripted hold answers MissingProcedure

    store
        .send_and_wait_for(
            SlotHoldAction::RequestHold {
                selection: selection(),
                owner: guest(),
            },
            |a| matches!(a, SlotHoldAction::HoldDegraded { .. }),
            Duration::from_secs(10),
        )
        .await
        .expect("degraded operation expected");
    settle().await;

    assert_eq!(store.state(|s| s.phase).await, HoldPhase::HeldDegraded);
    assert!(store.state(SlotHoldState::can_advance).await);
    assert_eq!(
        store.state(|s| s.hold_support).await,
        HoldSupport::Unsupported
    );
    assert!(store.state(|s| s.countdown).await.is_none());

    // A second request skips the probe entirely
    let _ = store
        .send(SlotHoldAction::RequestHold {
            selection: selection(),
            owner: guest(),
        })
        .await
        .unwrap();
    settle().await;

    assert_eq!(store.state(|s| s.phase).await, HoldPhase::HeldDegraded);
    let checks = gateway
        .calls()
        .iter()
        .filter(|c| matches!(c, GatewayCall::Check { .. }))
        .count();
    assert_eq!(checks, 1);
}

#[tokio::test(start_paused = true)]
async fn transient_hold_outage_keeps_conflict_detection() {
    let gateway = MockGateway::new();
    let (store, _clock) = setup(&gateway);
    gateway.push_hold(Err(GatewayError::Http {
        status: 500,
        body: "internal error".to_string(),
    }));

    store
        .send_and_wait_for(
            SlotHoldAction::RequestHold {
                selection: selection(),
                owner: guest(),
            },
            |a| matches!(a, SlotHoldAction::HoldDegraded { .. }),
            Duration::from_secs(10),
        )
        .await
        .expect("degraded operation expected");
    settle().await;

    // A present-but-failing backend is not a missing subsystem
    assert_eq!(store.state(|s| s.hold_support).await, HoldSupport::Unknown);

    // The next attempt still consults the backend and honors a conflict
    gateway.push_availability(Ok(AvailabilityResponse {
        available: false,
        message: Some("Slot already booked".to_string()),
    }));
    store
        .send_and_wait_for(
            SlotHoldAction::RequestHold {
                selection: selection(),
                owner: guest(),
            },
            |a| matches!(a, SlotHoldAction::HoldRejected { .. }),
            Duration::from_secs(10),
        )
        .await
        .expect("conflict expected");
    settle().await;

    assert_eq!(store.state(|s| s.phase).await, HoldPhase::Idle);
    let checks = gateway
        .calls()
        .iter()
        .filter(|c| matches!(c, GatewayCall::Check { .. }))
        .count();
    assert_eq!(checks, 2);
}

#[tokio::test(start_paused = true)]
async fn hold_expiry_resets_the_wizard() {
    let gateway = MockGateway::new();
    let (store, clock) = setup(&gateway);
    gateway.push_hold(Ok(granted_hold(SlotId::new(), &clock, 300)));

    acquire(&store).await;
    let mut rx = store.subscribe_actions();

    // Jump past the expiry; the next countdown tick notices
    clock.advance(chrono::Duration::seconds(301));
    wait_for(&mut rx, |a| matches!(a, SlotHoldAction::HoldExpired)).await;
    settle().await;

    assert_eq!(store.state(|s| s.phase).await, HoldPhase::Expired);
    assert_eq!(store.state(|s| s.wizard_step).await, WizardStep::Schedule);
    assert!(store.state(|s| s.countdown).await.is_none());
    assert!(store.state(|s| s.last_error.clone()).await.is_some());
}

#[tokio::test(start_paused = true)]
async fn low_time_warning_fires_exactly_once() {
    let gateway = MockGateway::new();
    let (store, clock) = setup(&gateway);
    gateway.push_hold(Ok(granted_hold(SlotId::new(), &clock, 125)));

    acquire(&store).await;
    let mut rx = store.subscribe_actions();

    // Cross the two-minute threshold
    clock.advance(chrono::Duration::seconds(6));
    let warning = wait_for(&mut rx, |a| {
        matches!(a, SlotHoldAction::LowTimeWarning { .. })
    })
    .await;
    assert!(matches!(
        warning,
        SlotHoldAction::LowTimeWarning { seconds_left } if seconds_left <= 120
    ));

    // Several more ticks below the threshold: no repeat warning
    tokio::time::sleep(Duration::from_secs(4)).await;
    let mut repeats = 0;
    while let Ok(action) = rx.try_recv() {
        if matches!(action, SlotHoldAction::LowTimeWarning { .. }) {
            repeats += 1;
        }
    }
    assert_eq!(repeats, 0);
}

#[tokio::test(start_paused = true)]
async fn release_gives_the_hold_back() {
    let gateway = MockGateway::new();
    let (store, clock) = setup(&gateway);
    let slot_id = SlotId::new();
    gateway.push_hold(Ok(granted_hold(slot_id, &clock, 600)));

    acquire(&store).await;

    let mut handle = store.send(SlotHoldAction::Release).await.unwrap();
    handle
        .wait_with_timeout(Duration::from_secs(5))
        .await
        .expect("release effects should finish");
    settle().await;

    assert_eq!(store.state(|s| s.phase).await, HoldPhase::Released);
    assert!(store.state(|s| s.countdown).await.is_none());
    assert!(gateway
        .calls()
        .iter()
        .any(|c| matches!(c, GatewayCall::Release { slot_id: id, .. } if *id == slot_id)));
}

#[tokio::test(start_paused = true)]
async fn release_failure_is_swallowed() {
    let gateway = MockGateway::new();
    let (store, clock) = setup(&gateway);
    gateway.push_hold(Ok(granted_hold(SlotId::new(), &clock, 600)));
    gateway.push_release(Err(GatewayError::Transport {
        message: "connection reset".to_string(),
    }));

    acquire(&store).await;

    let mut handle = store.send(SlotHoldAction::Release).await.unwrap();
    handle
        .wait_with_timeout(Duration::from_secs(5))
        .await
        .expect("release effects should finish");
    settle().await;

    // Local state clears regardless; the backend sweep reclaims the row
    assert_eq!(store.state(|s| s.phase).await, HoldPhase::Released);
}

#[tokio::test(start_paused = true)]
async fn finalize_conflict_reports_but_keeps_the_booking() {
    let gateway = MockGateway::new();
    let (store, clock) = setup(&gateway);
    gateway.push_hold(Ok(granted_hold(SlotId::new(), &clock, 600)));
    gateway.push_finalize(Ok(FinalizeResponse {
        success: false,
        message: Some("Slot already booked by another session".to_string()),
    }));

    acquire(&store).await;

    store
        .send_and_wait_for(
            SlotHoldAction::Finalize {
                booking_id: BookingId::new(),
            },
            |a| matches!(a, SlotHoldAction::FinalizeFailed { .. }),
            Duration::from_secs(10),
        )
        .await
        .expect("conflict report expected");
    settle().await;

    assert_eq!(store.state(|s| s.phase).await, HoldPhase::Finalized);
    let error = store.state(|s| s.last_error.clone()).await.unwrap();
    assert!(error.contains("already booked"));
}

#[tokio::test(start_paused = true)]
async fn finalize_outage_counts_as_success() {
    let gateway = MockGateway::new();
    let (store, clock) = setup(&gateway);
    gateway.push_hold(Ok(granted_hold(SlotId::new(), &clock, 600)));
    gateway.push_finalize(Err(GatewayError::Transport {
        message: "connection refused".to_string(),
    }));

    acquire(&store).await;

    store
        .send_and_wait_for(
            SlotHoldAction::Finalize {
                booking_id: BookingId::new(),
            },
            |a| matches!(a, SlotHoldAction::HoldFinalized),
            Duration::from_secs(10),
        )
        .await
        .expect("booking should be kept");
    settle().await;

    assert_eq!(store.state(|s| s.phase).await, HoldPhase::Finalized);
}
