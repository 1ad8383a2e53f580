//! Error types for the hold negotiation protocol

use thiserror::Error;

use crate::gateway::GatewayError;

/// Failures surfaced by the hold protocol
///
/// Only [`HoldError::InvalidRange`] and [`HoldError::SlotTaken`] block the
/// visitor; the remaining variants degrade to hold-less operation so a
/// backend without the hold subsystem never blocks a booking.
#[derive(Debug, Error)]
pub enum HoldError {
    /// The selected time range is incomplete or inverted
    #[error("{reason}")]
    InvalidRange { reason: String },

    /// The backend reported the slot as already taken or held
    #[error("{message}")]
    SlotTaken { message: String },

    /// The hold subsystem is not provisioned or not reachable
    #[error("slot holding is unavailable: {0}")]
    AcquireUnavailable(#[source] GatewayError),

    /// A backend call failed for a reason other than availability
    #[error("backend call failed: {0}")]
    Transport(#[from] GatewayError),
}

impl HoldError {
    /// Classify a gateway failure during hold acquisition
    ///
    /// Missing procedures and transport failures mean the hold subsystem is
    /// absent or unreachable; both degrade rather than block.
    #[must_use]
    pub fn from_acquire_failure(error: GatewayError) -> Self {
        if error.is_unavailable() {
            Self::AcquireUnavailable(error)
        } else {
            Self::Transport(error)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_procedure_classifies_as_unavailable() {
        let error = HoldError::from_acquire_failure(GatewayError::MissingProcedure {
            procedure: "hold_time_slot",
        });
        assert!(matches!(error, HoldError::AcquireUnavailable(_)));
    }

    #[test]
    fn http_failure_classifies_as_transport() {
        let error = HoldError::from_acquire_failure(GatewayError::Http {
            status: 500,
            body: "boom".to_string(),
        });
        assert!(matches!(error, HoldError::Transport(_)));
    }
}
