//! Backend gateway abstraction
//!
//! The reducer never talks to the network directly; it goes through
//! [`BookingGateway`], which covers the five remote procedures the hold
//! protocol needs. Production code uses the Supabase-backed implementation
//! in [`crate::supabase`]; tests script a [`mock::MockGateway`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;

use crate::types::{BookingId, OwnerRef, ReservationCandidate, SlotHold, SlotId};

/// Failures talking to the backend
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The request never completed (DNS, connect, timeout)
    #[error("transport failure: {message}")]
    Transport { message: String },

    /// The remote procedure does not exist on this backend
    #[error("remote procedure not provisioned: {procedure}")]
    MissingProcedure { procedure: &'static str },

    /// The backend answered with a non-success status
    #[error("unexpected response status {status}: {body}")]
    Http { status: u16, body: String },

    /// The response body did not match the expected shape
    #[error("failed to decode response: {message}")]
    Decode { message: String },
}

impl GatewayError {
    /// Whether the failure means the subsystem is absent or unreachable,
    /// as opposed to present but unhappy
    #[must_use]
    pub const fn is_unavailable(&self) -> bool {
        matches!(
            self,
            Self::Transport { .. } | Self::MissingProcedure { .. }
        )
    }
}

/// Availability verdict for a candidate time range
#[derive(Debug, Clone, Deserialize)]
pub struct AvailabilityResponse {
    pub available: bool,
    #[serde(default)]
    pub message: Option<String>,
}

/// Request to place a temporary hold on a time slot
#[derive(Debug, Clone)]
pub struct HoldSlotRequest {
    pub candidate: ReservationCandidate,
    pub owner: OwnerRef,
    pub hold_minutes: u32,
}

/// Backend answer to a hold request
#[derive(Debug, Clone, Deserialize)]
pub struct HoldSlotResponse {
    pub success: bool,
    #[serde(default)]
    pub slot_id: Option<SlotId>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub message: Option<String>,
}

impl HoldSlotResponse {
    /// Interpret the response as either an acquired hold or a rejection
    ///
    /// A success without a slot id or expiry is malformed and treated as a
    /// rejection.
    ///
    /// # Errors
    ///
    /// Returns the backend's rejection message, or a generic one when the
    /// backend gave none.
    pub fn into_hold(self) -> Result<SlotHold, String> {
        if self.success {
            if let (Some(slot_id), Some(expires_at)) = (self.slot_id, self.expires_at) {
                return Ok(SlotHold { slot_id, expires_at });
            }
        }
        Err(self
            .message
            .unwrap_or_else(|| "Failed to hold time slot".to_string()))
    }
}

/// Request to convert a hold into a permanent booking
#[derive(Debug, Clone)]
pub struct FinalizeSlotRequest {
    pub booking_id: BookingId,
    pub candidate: ReservationCandidate,
    pub owner: OwnerRef,
}

/// Backend answer to a finalize request
#[derive(Debug, Clone, Deserialize)]
pub struct FinalizeResponse {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
}

/// The remote procedures the hold protocol is built on
#[async_trait]
pub trait BookingGateway: Send + Sync {
    /// Ask whether a candidate time range is free
    async fn check_availability(
        &self,
        candidate: &ReservationCandidate,
    ) -> Result<AvailabilityResponse, GatewayError>;

    /// Place a temporary hold on a time slot
    async fn hold_slot(&self, request: &HoldSlotRequest) -> Result<HoldSlotResponse, GatewayError>;

    /// Release a hold the owner no longer needs
    async fn release_hold(&self, slot_id: SlotId, owner: &OwnerRef) -> Result<(), GatewayError>;

    /// Convert a hold into a permanent booking record
    async fn finalize_slot(
        &self,
        request: &FinalizeSlotRequest,
    ) -> Result<FinalizeResponse, GatewayError>;

    /// Sweep holds whose expiry has passed
    async fn cleanup_expired_holds(&self) -> Result<(), GatewayError>;
}

/// Scriptable in-memory gateway for tests
pub mod mock {
    #![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity

    use super::{
        AvailabilityResponse, BookingGateway, FinalizeResponse, FinalizeSlotRequest, GatewayError,
        HoldSlotRequest, HoldSlotResponse,
    };
    use crate::types::{BookingId, OwnerRef, ReservationCandidate, SlotId};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// A recorded call, in arrival order
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum GatewayCall {
        Check { candidate: ReservationCandidate },
        Hold { candidate: ReservationCandidate, owner: OwnerRef },
        Release { slot_id: SlotId, owner: OwnerRef },
        Finalize { booking_id: BookingId, owner: OwnerRef },
        Cleanup,
    }

    #[derive(Default)]
    struct Scripted {
        availability: VecDeque<Result<AvailabilityResponse, GatewayError>>,
        holds: VecDeque<Result<HoldSlotResponse, GatewayError>>,
        releases: VecDeque<Result<(), GatewayError>>,
        finalizes: VecDeque<Result<FinalizeResponse, GatewayError>>,
        cleanups: VecDeque<Result<(), GatewayError>>,
    }

    /// Gateway that replays scripted responses and records every call
    ///
    /// Unscripted availability checks answer "available"; unscripted
    /// releases and cleanups answer `Ok(())`. Unscripted holds and
    /// finalizes report a missing procedure, matching a backend where the
    /// hold subsystem was never provisioned.
    #[derive(Clone, Default)]
    pub struct MockGateway {
        scripted: Arc<Mutex<Scripted>>,
        calls: Arc<Mutex<Vec<GatewayCall>>>,
    }

    impl MockGateway {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        pub fn push_availability(&self, response: Result<AvailabilityResponse, GatewayError>) {
            self.scripted.lock().unwrap().availability.push_back(response);
        }

        pub fn push_hold(&self, response: Result<HoldSlotResponse, GatewayError>) {
            self.scripted.lock().unwrap().holds.push_back(response);
        }

        pub fn push_release(&self, response: Result<(), GatewayError>) {
            self.scripted.lock().unwrap().releases.push_back(response);
        }

        pub fn push_finalize(&self, response: Result<FinalizeResponse, GatewayError>) {
            self.scripted.lock().unwrap().finalizes.push_back(response);
        }

        pub fn push_cleanup(&self, response: Result<(), GatewayError>) {
            self.scripted.lock().unwrap().cleanups.push_back(response);
        }

        /// All calls recorded so far
        #[must_use]
        pub fn calls(&self) -> Vec<GatewayCall> {
            self.calls.lock().unwrap().clone()
        }

        /// Number of cleanup sweeps requested
        #[must_use]
        pub fn cleanup_count(&self) -> usize {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|call| matches!(call, GatewayCall::Cleanup))
                .count()
        }

        fn record(&self, call: GatewayCall) {
            self.calls.lock().unwrap().push(call);
        }
    }

    #[async_trait]
    impl BookingGateway for MockGateway {
        async fn check_availability(
            &self,
            candidate: &ReservationCandidate,
        ) -> Result<AvailabilityResponse, GatewayError> {
            self.record(GatewayCall::Check { candidate: *candidate });
            self.scripted
                .lock()
                .unwrap()
                .availability
                .pop_front()
                .unwrap_or_else(|| {
                    Ok(AvailabilityResponse {
                        available: true,
                        message: None,
                    })
                })
        }

        async fn hold_slot(
            &self,
            request: &HoldSlotRequest,
        ) -> Result<HoldSlotResponse, GatewayError> {
            self.record(GatewayCall::Hold {
                candidate: request.candidate,
                owner: request.owner,
            });
            self.scripted
                .lock()
                .unwrap()
                .holds
                .pop_front()
                .unwrap_or_else(|| {
                    Err(GatewayError::MissingProcedure {
                        procedure: "hold_time_slot",
                    })
                })
        }

        async fn release_hold(
            &self,
            slot_id: SlotId,
            owner: &OwnerRef,
        ) -> Result<(), GatewayError> {
            self.record(GatewayCall::Release {
                slot_id,
                owner: *owner,
            });
            self.scripted
                .lock()
                .unwrap()
                .releases
                .pop_front()
                .unwrap_or_else(|| Ok(()))
        }

        async fn finalize_slot(
            &self,
            request: &FinalizeSlotRequest,
        ) -> Result<FinalizeResponse, GatewayError> {
            self.record(GatewayCall::Finalize {
                booking_id: request.booking_id,
                owner: request.owner,
            });
            self.scripted
                .lock()
                .unwrap()
                .finalizes
                .pop_front()
                .unwrap_or_else(|| {
                    Err(GatewayError::MissingProcedure {
                        procedure: "book_custom_time_slot",
                    })
                })
        }

        async fn cleanup_expired_holds(&self) -> Result<(), GatewayError> {
            self.record(GatewayCall::Cleanup);
            self.scripted
                .lock()
                .unwrap()
                .cleanups
                .pop_front()
                .unwrap_or_else(|| Ok(()))
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use chrono::TimeZone;

    #[test]
    fn hold_response_with_slot_and_expiry_becomes_a_hold() {
        let expires = Utc.with_ymd_and_hms(2025, 6, 1, 12, 10, 0).unwrap();
        let response = HoldSlotResponse {
            success: true,
            slot_id: Some(SlotId::new()),
            expires_at: Some(expires),
            message: None,
        };
        assert_eq!(response.into_hold().unwrap().expires_at, expires);
    }

    #[test]
    fn hold_response_success_without_expiry_is_a_rejection() {
        let response = HoldSlotResponse {
            success: true,
            slot_id: Some(SlotId::new()),
            expires_at: None,
            message: None,
        };
        assert_eq!(response.into_hold().unwrap_err(), "Failed to hold time slot");
    }

    #[test]
    fn hold_response_failure_carries_backend_message() {
        let response = HoldSlotResponse {
            success: false,
            slot_id: None,
            expires_at: None,
            message: Some("This time slot is currently being booked".to_string()),
        };
        assert_eq!(
            response.into_hold().unwrap_err(),
            "This time slot is currently being booked"
        );
    }

    #[test]
    fn transport_and_missing_procedure_are_unavailable() {
        assert!(GatewayError::Transport {
            message: "timed out".to_string()
        }
        .is_unavailable());
        assert!(GatewayError::MissingProcedure {
            procedure: "hold_time_slot"
        }
        .is_unavailable());
        assert!(!GatewayError::Http {
            status: 500,
            body: String::new()
        }
        .is_unavailable());
    }
}
