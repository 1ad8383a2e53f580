//! Time-slot hold negotiation
//!
//! When a visitor picks a time range, the client asks the backend to hold
//! that slot for a short window so nobody else books it while the wizard is
//! being filled in. This module owns the whole protocol: acquisition, the
//! once-per-second countdown with low-time warnings, expiry, best-effort
//! release, and conversion into a permanent booking.
//!
//! The protocol degrades rather than blocks. A backend without the hold
//! subsystem (missing RPCs, unreachable) lets the visitor continue without
//! a hold; only an explicit "slot taken" answer or an invalid time range
//! stops them.

use aperture_core::effect::{Effect, EffectId};
use aperture_core::environment::Clock;
use aperture_core::reducer::Reducer;
use aperture_core::{SmallVec, smallvec};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::gateway::{BookingGateway, FinalizeSlotRequest, GatewayError, HoldSlotRequest};
use crate::types::{
    BookingId, HoldCountdown, OwnerRef, ReservationCandidate, SlotHold, TimeSelection, WizardStep,
};

/// Registration id for the countdown timer; one timer per session
pub const HOLD_COUNTDOWN: EffectId = EffectId::new("slot-hold-countdown");

/// Countdown resolution
const TICK_INTERVAL: Duration = Duration::from_secs(1);

const TWO_MINUTE_WARNING_SECS: i64 = 120;
const ONE_MINUTE_WARNING_SECS: i64 = 60;

const EXPIRED_MESSAGE: &str =
    "Your time slot hold has expired. Please select a new time slot.";

/// What the session knows about the backend's hold subsystem
///
/// Learned from acquisition attempts and cached for the rest of the
/// session. Only a hold RPC that does not exist proves the subsystem is
/// absent; a transient failure degrades one attempt without being cached,
/// so later attempts probe the backend again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HoldSupport {
    Unknown,
    Supported,
    Unsupported,
}

/// Where the session stands in the hold lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HoldPhase {
    /// No hold activity
    Idle,
    /// Availability check and hold acquisition in flight
    Checking,
    /// A hold is in place and counting down
    Held { hold: SlotHold },
    /// Proceeding without a hold; the backend has no hold subsystem
    HeldDegraded,
    /// The hold ran out before the wizard finished
    Expired,
    /// The visitor walked away and the hold was given back
    Released,
    /// The hold was converted into a permanent booking
    Finalized,
}

/// Session state for the hold protocol
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotHoldState {
    pub phase: HoldPhase,
    pub candidate: Option<ReservationCandidate>,
    pub owner: Option<OwnerRef>,
    pub countdown: Option<HoldCountdown>,
    pub wizard_step: WizardStep,
    pub last_error: Option<String>,
    pub hold_support: HoldSupport,
    warned_two_minutes: bool,
    warned_one_minute: bool,
    finalize_in_flight: bool,
}

impl SlotHoldState {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            phase: HoldPhase::Idle,
            candidate: None,
            owner: None,
            countdown: None,
            wizard_step: WizardStep::Schedule,
            last_error: None,
            hold_support: HoldSupport::Unknown,
            warned_two_minutes: false,
            warned_one_minute: false,
            finalize_in_flight: false,
        }
    }

    /// Whether the wizard may move past the schedule step
    #[must_use]
    pub const fn can_advance(&self) -> bool {
        matches!(self.phase, HoldPhase::Held { .. } | HoldPhase::HeldDegraded)
    }

    /// The hold currently in place, if any
    #[must_use]
    pub const fn active_hold(&self) -> Option<&SlotHold> {
        match &self.phase {
            HoldPhase::Held { hold } => Some(hold),
            _ => None,
        }
    }
}

impl Default for SlotHoldState {
    fn default() -> Self {
        Self::new()
    }
}

/// Inputs to the hold reducer
///
/// Commands come from the UI; events come back from effects and are also
/// what observers see on the store's action broadcast.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SlotHoldAction {
    // === Commands ===
    /// Validate the selection and negotiate a hold for it
    RequestHold {
        selection: TimeSelection,
        owner: OwnerRef,
    },
    /// One countdown step; self-reschedules while the hold is live
    Tick,
    /// Give the hold back; the visitor navigated away
    Release,
    /// Convert the hold into the given permanent booking
    Finalize { booking_id: BookingId },
    /// Clear the session back to idle, keeping what we learned about the backend
    Reset,

    // === Events ===
    /// The backend granted a hold
    HoldAcquired { hold: SlotHold },
    /// Proceeding without a hold; `subsystem_missing` marks a backend
    /// whose hold RPC does not exist, which is cached for the session
    HoldDegraded {
        reason: String,
        subsystem_missing: bool,
    },
    /// The backend explicitly refused the slot
    HoldRejected { message: String },
    /// The countdown crossed a warning threshold
    LowTimeWarning { seconds_left: i64 },
    /// The hold ran out
    HoldExpired,
    /// The hold was given back
    HoldReleased,
    /// The booking is permanent
    HoldFinalized,
    /// The backend reported a finalization conflict; the booking stands
    FinalizeFailed { message: String },
    /// The time selection never made it to the backend
    ValidationFailed { error: String },
}

/// Dependencies for the hold reducer
#[derive(Clone)]
pub struct SlotHoldEnvironment {
    pub clock: Arc<dyn Clock>,
    pub gateway: Arc<dyn BookingGateway>,
    /// How long the backend is asked to hold a slot
    pub hold_minutes: u32,
}

impl SlotHoldEnvironment {
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, gateway: Arc<dyn BookingGateway>, hold_minutes: u32) -> Self {
        Self {
            clock,
            gateway,
            hold_minutes,
        }
    }
}

/// Reducer implementing the hold negotiation protocol
#[derive(Debug, Clone)]
pub struct SlotHoldReducer;

type Effects = SmallVec<[Effect<SlotHoldAction>; 4]>;

impl Reducer for SlotHoldReducer {
    type State = SlotHoldState;
    type Action = SlotHoldAction;
    type Environment = SlotHoldEnvironment;

    #[allow(clippy::too_many_lines)]
    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> Effects {
        match action {
            SlotHoldAction::RequestHold { selection, owner } => {
                Self::handle_request_hold(state, env, &selection, owner)
            },

            SlotHoldAction::Tick => Self::handle_tick(state, env),

            SlotHoldAction::Release => Self::handle_release(state, env),

            SlotHoldAction::Finalize { booking_id } => {
                Self::handle_finalize(state, env, booking_id)
            },

            SlotHoldAction::Reset => {
                let hold_support = state.hold_support;
                *state = SlotHoldState {
                    hold_support,
                    ..SlotHoldState::new()
                };
                smallvec![Effect::Cancel(HOLD_COUNTDOWN)]
            },

            SlotHoldAction::HoldAcquired { hold } => {
                if !matches!(state.phase, HoldPhase::Checking) {
                    // Grant arrived after the visitor moved on; give it back
                    tracing::debug!(
                        slot_id = %hold.slot_id,
                        "Hold granted for an abandoned request, releasing it"
                    );
                    return Self::release_effect(env, hold, state.owner);
                }

                let event = SlotHoldAction::HoldAcquired { hold };
                Self::apply_event(state, &event, env.clock.now());
                tracing::info!(
                    slot_id = %hold.slot_id,
                    expires_at = %hold.expires_at,
                    "Time slot held"
                );
                smallvec![Effect::timer(
                    HOLD_COUNTDOWN,
                    TICK_INTERVAL,
                    SlotHoldAction::Tick
                )]
            },

            event @ SlotHoldAction::HoldDegraded { .. } => {
                if let SlotHoldAction::HoldDegraded { reason, .. } = &event {
                    tracing::warn!(%reason, "Proceeding without a hold");
                }
                Self::apply_event(state, &event, env.clock.now());
                smallvec![]
            },

            event @ SlotHoldAction::HoldRejected { .. } => {
                Self::apply_event(state, &event, env.clock.now());
                smallvec![]
            },

            SlotHoldAction::LowTimeWarning { seconds_left } => {
                tracing::info!(seconds_left, "Hold is running out");
                smallvec![]
            },

            SlotHoldAction::HoldExpired => {
                // A finalize in flight, or a release that already landed,
                // outranks a late expiry
                if state.finalize_in_flight || !matches!(state.phase, HoldPhase::Held { .. }) {
                    tracing::debug!("Stale hold expiry, ignoring");
                    return smallvec![];
                }
                Self::apply_event(state, &SlotHoldAction::HoldExpired, env.clock.now());
                smallvec![Effect::Cancel(HOLD_COUNTDOWN)]
            },

            event @ (SlotHoldAction::HoldReleased | SlotHoldAction::HoldFinalized) => {
                Self::apply_event(state, &event, env.clock.now());
                smallvec![Effect::Cancel(HOLD_COUNTDOWN)]
            },

            event @ SlotHoldAction::FinalizeFailed { .. } => {
                if let SlotHoldAction::FinalizeFailed { message } = &event {
                    tracing::warn!(%message, "Slot finalization refused, booking kept");
                }
                Self::apply_event(state, &event, env.clock.now());
                smallvec![Effect::Cancel(HOLD_COUNTDOWN)]
            },

            event @ SlotHoldAction::ValidationFailed { .. } => {
                Self::apply_event(state, &event, env.clock.now());
                smallvec![]
            },
        }
    }
}

impl SlotHoldReducer {
    fn handle_request_hold(
        state: &mut SlotHoldState,
        env: &SlotHoldEnvironment,
        selection: &TimeSelection,
        owner: OwnerRef,
    ) -> Effects {
        if matches!(state.phase, HoldPhase::Checking) {
            tracing::debug!("Hold request already in flight, ignoring");
            return smallvec![];
        }

        let candidate = match selection.candidate() {
            Ok(candidate) => candidate,
            Err(error) => {
                let event = SlotHoldAction::ValidationFailed {
                    error: error.to_string(),
                };
                Self::apply_event(state, &event, env.clock.now());
                return smallvec![];
            },
        };

        // Changing the selection gives any previous hold back first
        let previous = match state.phase {
            HoldPhase::Held { hold } => Some((hold, state.owner)),
            _ => None,
        };

        state.phase = HoldPhase::Checking;
        state.candidate = Some(candidate);
        state.owner = Some(owner);
        state.countdown = None;
        state.last_error = None;
        state.warned_two_minutes = false;
        state.warned_one_minute = false;
        state.finalize_in_flight = false;

        let mut effects: Effects = smallvec![Effect::Cancel(HOLD_COUNTDOWN)];
        if let Some((hold, previous_owner)) = previous {
            effects.extend(Self::release_effect(env, hold, previous_owner));
        }

        if matches!(state.hold_support, HoldSupport::Unsupported) {
            // Known-absent subsystem, skip the probe
            let event = SlotHoldAction::HoldDegraded {
                reason: "hold subsystem previously unavailable".to_string(),
                subsystem_missing: true,
            };
            Self::apply_event(state, &event, env.clock.now());
            return effects;
        }

        effects.push(Self::negotiate_effect(env, candidate, owner));
        effects
    }

    /// Availability probe plus hold acquisition, as one async effect
    fn negotiate_effect(
        env: &SlotHoldEnvironment,
        candidate: ReservationCandidate,
        owner: OwnerRef,
    ) -> Effect<SlotHoldAction> {
        let gateway = Arc::clone(&env.gateway);
        let hold_minutes = env.hold_minutes;

        Effect::future(async move {
            // An explicit "not available" blocks; a failed probe does not.
            match gateway.check_availability(&candidate).await {
                Ok(response) if !response.available => {
                    let taken = crate::error::HoldError::SlotTaken {
                        message: response
                            .message
                            .unwrap_or_else(|| "Time slot not available".to_string()),
                    };
                    return Some(SlotHoldAction::HoldRejected {
                        message: taken.to_string(),
                    });
                },
                Ok(_) => {},
                Err(error) => {
                    tracing::warn!(%error, "Availability check failed, assuming slot is free");
                },
            }

            let request = HoldSlotRequest {
                candidate,
                owner,
                hold_minutes,
            };
            match gateway.hold_slot(&request).await {
                Ok(response) => match response.into_hold() {
                    Ok(hold) => Some(SlotHoldAction::HoldAcquired { hold }),
                    Err(message) => Some(SlotHoldAction::HoldRejected { message }),
                },
                Err(error) => {
                    let subsystem_missing =
                        matches!(error, GatewayError::MissingProcedure { .. });
                    let classified = crate::error::HoldError::from_acquire_failure(error);
                    Some(SlotHoldAction::HoldDegraded {
                        reason: classified.to_string(),
                        subsystem_missing,
                    })
                },
            }
        })
    }

    fn handle_tick(state: &mut SlotHoldState, env: &SlotHoldEnvironment) -> Effects {
        let HoldPhase::Held { hold } = state.phase else {
            // Stale tick from a hold that is already gone
            return smallvec![];
        };

        let seconds_left = (hold.expires_at - env.clock.now()).num_seconds();

        if seconds_left <= 0 {
            if state.finalize_in_flight {
                tracing::debug!("Hold expired while finalization is in flight, ignoring");
                return smallvec![];
            }
            tracing::info!(slot_id = %hold.slot_id, "Slot hold expired");
            state.countdown = None;
            // Expiry goes through the feedback loop so observers see it
            return smallvec![
                Effect::future(async { Some(SlotHoldAction::HoldExpired) }),
                Effect::Cancel(HOLD_COUNTDOWN),
            ];
        }

        state.countdown = Some(HoldCountdown::from_seconds(seconds_left));

        let mut effects: Effects = smallvec![];
        if seconds_left <= TWO_MINUTE_WARNING_SECS && !state.warned_two_minutes {
            state.warned_two_minutes = true;
            effects.push(Effect::future(async move {
                Some(SlotHoldAction::LowTimeWarning { seconds_left })
            }));
        }
        if seconds_left <= ONE_MINUTE_WARNING_SECS && !state.warned_one_minute {
            state.warned_one_minute = true;
            effects.push(Effect::future(async move {
                Some(SlotHoldAction::LowTimeWarning { seconds_left })
            }));
        }

        effects.push(Effect::timer(
            HOLD_COUNTDOWN,
            TICK_INTERVAL,
            SlotHoldAction::Tick,
        ));
        effects
    }

    fn handle_release(state: &mut SlotHoldState, env: &SlotHoldEnvironment) -> Effects {
        match state.phase {
            HoldPhase::Held { hold } => {
                let owner = state.owner;
                Self::apply_event(state, &SlotHoldAction::HoldReleased, env.clock.now());
                let mut effects = Self::release_effect(env, hold, owner);
                effects.push(Effect::Cancel(HOLD_COUNTDOWN));
                effects
            },
            HoldPhase::Checking | HoldPhase::HeldDegraded => {
                Self::apply_event(state, &SlotHoldAction::HoldReleased, env.clock.now());
                smallvec![Effect::Cancel(HOLD_COUNTDOWN)]
            },
            _ => smallvec![Effect::Cancel(HOLD_COUNTDOWN)],
        }
    }

    /// Fire-and-forget release; failures are logged and the hold left to expire
    fn release_effect(
        env: &SlotHoldEnvironment,
        hold: SlotHold,
        owner: Option<OwnerRef>,
    ) -> Effects {
        let gateway = Arc::clone(&env.gateway);
        smallvec![Effect::future(async move {
            if let Some(owner) = owner {
                if let Err(error) = gateway.release_hold(hold.slot_id, &owner).await {
                    tracing::warn!(
                        %error,
                        slot_id = %hold.slot_id,
                        "Failed to release slot hold, leaving it to expire"
                    );
                }
            }
            None
        })]
    }

    fn handle_finalize(
        state: &mut SlotHoldState,
        env: &SlotHoldEnvironment,
        booking_id: BookingId,
    ) -> Effects {
        if state.finalize_in_flight {
            tracing::debug!(%booking_id, "Finalization already in flight, ignoring");
            return smallvec![];
        }
        if !state.can_advance() {
            tracing::debug!(%booking_id, phase = ?state.phase, "No hold to finalize");
            return smallvec![];
        }

        let (Some(candidate), Some(owner)) = (state.candidate, state.owner) else {
            Self::apply_event(state, &SlotHoldAction::HoldFinalized, env.clock.now());
            return smallvec![Effect::Cancel(HOLD_COUNTDOWN)];
        };

        if matches!(state.hold_support, HoldSupport::Unsupported) {
            // Nothing to convert on a backend without the subsystem
            Self::apply_event(state, &SlotHoldAction::HoldFinalized, env.clock.now());
            return smallvec![Effect::Cancel(HOLD_COUNTDOWN)];
        }

        state.finalize_in_flight = true;

        let gateway = Arc::clone(&env.gateway);
        smallvec![Effect::future(async move {
            let request = FinalizeSlotRequest {
                booking_id,
                candidate,
                owner,
            };
            match gateway.finalize_slot(&request).await {
                Ok(response) if response.success => Some(SlotHoldAction::HoldFinalized),
                Ok(response) => Some(SlotHoldAction::FinalizeFailed {
                    message: response
                        .message
                        .unwrap_or_else(|| "Failed to finalize time slot".to_string()),
                }),
                Err(error) => {
                    // The booking record already exists; an unreachable or
                    // unprovisioned finalize RPC must not undo it.
                    tracing::warn!(%error, %booking_id, "Slot finalization unavailable, booking kept");
                    Some(SlotHoldAction::HoldFinalized)
                },
            }
        })]
    }

    /// Apply an event to state; pure, idempotent where it matters
    fn apply_event(state: &mut SlotHoldState, event: &SlotHoldAction, now: DateTime<Utc>) {
        match event {
            SlotHoldAction::HoldAcquired { hold } => {
                state.phase = HoldPhase::Held { hold: *hold };
                state.hold_support = HoldSupport::Supported;
                state.countdown = Some(HoldCountdown::remaining(hold.expires_at, now));
                state.wizard_step = WizardStep::Details;
                state.last_error = None;
                state.warned_two_minutes = false;
                state.warned_one_minute = false;
            },
            SlotHoldAction::HoldDegraded {
                subsystem_missing, ..
            } => {
                state.phase = HoldPhase::HeldDegraded;
                if *subsystem_missing {
                    state.hold_support = HoldSupport::Unsupported;
                }
                state.countdown = None;
                state.wizard_step = WizardStep::Details;
                state.last_error = None;
            },
            SlotHoldAction::HoldRejected { message } => {
                state.phase = HoldPhase::Idle;
                state.countdown = None;
                state.wizard_step = WizardStep::Schedule;
                state.last_error = Some(message.clone());
            },
            SlotHoldAction::HoldExpired => {
                state.phase = HoldPhase::Expired;
                state.countdown = None;
                state.wizard_step = WizardStep::Schedule;
                state.last_error = Some(EXPIRED_MESSAGE.to_string());
            },
            SlotHoldAction::HoldReleased => {
                state.phase = HoldPhase::Released;
                state.countdown = None;
                state.wizard_step = WizardStep::Schedule;
            },
            SlotHoldAction::HoldFinalized => {
                state.phase = HoldPhase::Finalized;
                state.countdown = None;
                state.finalize_in_flight = false;
            },
            SlotHoldAction::FinalizeFailed { message } => {
                state.phase = HoldPhase::Finalized;
                state.countdown = None;
                state.finalize_in_flight = false;
                state.last_error = Some(message.clone());
            },
            SlotHoldAction::ValidationFailed { error } => {
                state.last_error = Some(error.clone());
            },
            // Commands never reach apply_event
            _ => {},
        }
    }
}
