//! Supabase-backed gateway
//!
//! The hold protocol maps onto five PostgREST RPC endpoints
//! (`POST {base}/rest/v1/rpc/{function}`). Requests carry the project's
//! anon key plus a bearer token: the user's access token when signed in,
//! the anon key otherwise.
//!
//! A 404 status, or a `PGRST202` code in an error body, means the function
//! was never provisioned; callers treat that as the hold subsystem being
//! absent rather than as a failure.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::time::Duration;

use crate::config::BookingConfig;
use crate::gateway::{
    AvailabilityResponse, BookingGateway, FinalizeResponse, FinalizeSlotRequest, GatewayError,
    HoldSlotRequest, HoldSlotResponse,
};
use crate::types::{OwnerRef, ReservationCandidate, SlotId};

const RPC_CHECK_AVAILABILITY: &str = "check_time_slot_availability";
const RPC_HOLD_SLOT: &str = "hold_time_slot";
const RPC_RELEASE_HOLD: &str = "release_time_slot_hold";
const RPC_FINALIZE_SLOT: &str = "book_custom_time_slot";
const RPC_CLEANUP_HOLDS: &str = "cleanup_expired_slot_holds";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// PostgREST code for a function that does not exist
const MISSING_FUNCTION_CODE: &str = "PGRST202";

/// Gateway speaking to a Supabase project's RPC endpoints
#[derive(Debug, Clone)]
pub struct SupabaseGateway {
    http: reqwest::Client,
    base_url: String,
    anon_key: String,
    access_token: Option<String>,
}

impl SupabaseGateway {
    /// Build a gateway for an anonymous session
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Transport`] when the HTTP client cannot be
    /// constructed.
    pub fn new(config: &BookingConfig) -> Result<Self, GatewayError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|error| GatewayError::Transport {
                message: error.to_string(),
            })?;

        Ok(Self {
            http,
            base_url: config.supabase_url.trim_end_matches('/').to_string(),
            anon_key: config.supabase_anon_key.clone(),
            access_token: None,
        })
    }

    /// Use a signed-in user's access token for subsequent calls
    #[must_use]
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    fn rpc_url(&self, function: &str) -> String {
        format!("{}/rest/v1/rpc/{function}", self.base_url)
    }

    async fn rpc<T: DeserializeOwned>(
        &self,
        function: &'static str,
        params: Value,
    ) -> Result<T, GatewayError> {
        let bearer = self.access_token.as_deref().unwrap_or(&self.anon_key);

        let response = self
            .http
            .post(self.rpc_url(function))
            .header("apikey", &self.anon_key)
            .bearer_auth(bearer)
            .json(&params)
            .send()
            .await
            .map_err(|error| GatewayError::Transport {
                message: error.to_string(),
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(GatewayError::MissingProcedure {
                procedure: function,
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if body.contains(MISSING_FUNCTION_CODE) {
                return Err(GatewayError::MissingProcedure {
                    procedure: function,
                });
            }
            return Err(GatewayError::Http {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|error| GatewayError::Decode {
                message: error.to_string(),
            })
    }
}

fn time_param(time: chrono::NaiveTime) -> String {
    time.format("%H:%M:%S").to_string()
}

fn guest_token_param(owner: &OwnerRef) -> Value {
    owner
        .guest_token()
        .map_or(Value::Null, |token| json!(token))
}

// PostgREST resolves functions by their named-argument set; the
// availability function takes exactly these three.
fn availability_params(candidate: &ReservationCandidate) -> Value {
    json!({
        "check_date": candidate.date(),
        "start_time": time_param(candidate.start_time()),
        "end_time": time_param(candidate.end_time()),
    })
}

fn hold_params(request: &HoldSlotRequest) -> Value {
    json!({
        "slot_date": request.candidate.date(),
        "start_time": time_param(request.candidate.start_time()),
        "end_time": time_param(request.candidate.end_time()),
        "is_whole_day": request.candidate.whole_day(),
        "guest_token": guest_token_param(&request.owner),
        "hold_duration_minutes": request.hold_minutes,
    })
}

fn release_params(slot_id: SlotId, owner: &OwnerRef) -> Value {
    json!({
        "slot_id": slot_id,
        "guest_token": guest_token_param(owner),
    })
}

fn finalize_params(request: &FinalizeSlotRequest) -> Value {
    json!({
        "slot_date": request.candidate.date(),
        "start_time": time_param(request.candidate.start_time()),
        "end_time": time_param(request.candidate.end_time()),
        "is_whole_day": request.candidate.whole_day(),
        "guest_token": guest_token_param(&request.owner),
        "booking_uuid": request.booking_id,
    })
}

#[async_trait]
impl BookingGateway for SupabaseGateway {
    async fn check_availability(
        &self,
        candidate: &ReservationCandidate,
    ) -> Result<AvailabilityResponse, GatewayError> {
        self.rpc(RPC_CHECK_AVAILABILITY, availability_params(candidate))
            .await
    }

    async fn hold_slot(&self, request: &HoldSlotRequest) -> Result<HoldSlotResponse, GatewayError> {
        self.rpc(RPC_HOLD_SLOT, hold_params(request)).await
    }

    async fn release_hold(&self, slot_id: SlotId, owner: &OwnerRef) -> Result<(), GatewayError> {
        self.rpc::<Value>(RPC_RELEASE_HOLD, release_params(slot_id, owner))
            .await?;
        Ok(())
    }

    async fn finalize_slot(
        &self,
        request: &FinalizeSlotRequest,
    ) -> Result<FinalizeResponse, GatewayError> {
        self.rpc(RPC_FINALIZE_SLOT, finalize_params(request)).await
    }

    async fn cleanup_expired_holds(&self) -> Result<(), GatewayError> {
        self.rpc::<Value>(RPC_CLEANUP_HOLDS, json!({})).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::types::{BookingId, GuestToken, TimeSelection, UserId};
    use chrono::{NaiveDate, NaiveTime};

    fn candidate() -> ReservationCandidate {
        TimeSelection::new(
            NaiveDate::from_ymd_opt(2025, 6, 15).unwrap(),
            NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(12, 30, 0).unwrap(),
        )
        .candidate()
        .unwrap()
    }

    fn config() -> BookingConfig {
        BookingConfig {
            supabase_url: "https://example.supabase.co/".to_string(),
            supabase_anon_key: "anon-key".to_string(),
            hold_duration_minutes: 10,
            cleanup_interval: Duration::from_secs(60),
        }
    }

    #[test]
    fn rpc_url_has_no_double_slash() {
        let gateway = SupabaseGateway::new(&config()).unwrap();
        assert_eq!(
            gateway.rpc_url("hold_time_slot"),
            "https://example.supabase.co/rest/v1/rpc/hold_time_slot"
        );
    }

    #[test]
    fn hold_params_carry_the_guest_token() {
        let token = GuestToken::new();
        let request = HoldSlotRequest {
            candidate: candidate(),
            owner: OwnerRef::Guest { token },
            hold_minutes: 10,
        };
        let params = hold_params(&request);

        assert_eq!(params["slot_date"], json!("2025-06-15"));
        assert_eq!(params["start_time"], json!("10:00:00"));
        assert_eq!(params["end_time"], json!("12:30:00"));
        assert_eq!(params["is_whole_day"], json!(false));
        assert_eq!(params["guest_token"], json!(token));
        assert_eq!(params["hold_duration_minutes"], json!(10));
    }

    #[test]
    fn authenticated_owner_sends_null_guest_token() {
        let request = HoldSlotRequest {
            candidate: candidate(),
            owner: OwnerRef::Authenticated { id: UserId::new() },
            hold_minutes: 10,
        };
        assert_eq!(hold_params(&request)["guest_token"], Value::Null);
    }

    #[test]
    fn finalize_params_carry_the_booking_uuid() {
        let booking_id = BookingId::new();
        let request = FinalizeSlotRequest {
            booking_id,
            candidate: candidate(),
            owner: OwnerRef::Authenticated { id: UserId::new() },
        };
        let params = finalize_params(&request);

        assert_eq!(params["booking_uuid"], json!(booking_id));
        assert_eq!(params["slot_date"], json!("2025-06-15"));
    }

    #[test]
    fn availability_params_carry_exactly_the_three_arguments() {
        let params = availability_params(&candidate());
        assert_eq!(params["check_date"], json!("2025-06-15"));
        assert_eq!(params["start_time"], json!("10:00:00"));
        assert_eq!(params["end_time"], json!("12:30:00"));
        // Any extra key makes the function unresolvable
        assert_eq!(params.as_object().unwrap().len(), 3);
    }

    #[test]
    fn finalize_targets_the_custom_slot_procedure() {
        let gateway = SupabaseGateway::new(&config()).unwrap();
        assert_eq!(
            gateway.rpc_url(RPC_FINALIZE_SLOT),
            "https://example.supabase.co/rest/v1/rpc/book_custom_time_slot"
        );
    }
}
