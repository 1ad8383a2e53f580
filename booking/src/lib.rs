//! # Aperture Booking
//!
//! Client-side booking flow for the Aperture photography studio, built on
//! the reducer/effect architecture from `aperture-core` and driven by the
//! store runtime in `aperture-runtime`.
//!
//! The centerpiece is the time-slot hold protocol in [`hold`]: when a
//! visitor picks a time range, the client negotiates a short-lived hold
//! with the backend, counts it down second by second with low-time
//! warnings, and either converts it into a permanent booking or gives it
//! back. Backends without the hold subsystem degrade to hold-less
//! operation instead of blocking the visitor.
//!
//! ## Modules
//!
//! - [`hold`]: the hold negotiation reducer (the protocol itself)
//! - [`types`]: identifiers, time selections, countdowns
//! - [`gateway`]: the backend abstraction plus a scriptable mock
//! - [`supabase`]: the production Supabase RPC gateway
//! - [`session`]: visitor identity (signed-in user or guest token)
//! - [`config`]: environment-driven configuration
//! - [`maintenance`]: the periodic expired-hold sweep
//! - [`error`]: the protocol's error taxonomy

/// Environment-driven configuration
pub mod config;

/// Error taxonomy for the hold protocol
pub mod error;

/// Backend gateway abstraction and test mock
pub mod gateway;

/// The hold negotiation reducer
pub mod hold;

/// Periodic expired-hold sweep
pub mod maintenance;

/// Visitor identity
pub mod session;

/// Supabase RPC gateway
pub mod supabase;

/// Domain types
pub mod types;

pub use config::BookingConfig;
pub use error::HoldError;
pub use gateway::{BookingGateway, GatewayError};
pub use hold::{
    HOLD_COUNTDOWN, HoldPhase, HoldSupport, SlotHoldAction, SlotHoldEnvironment, SlotHoldReducer,
    SlotHoldState,
};
pub use session::SessionContext;
pub use supabase::SupabaseGateway;
pub use types::{
    BookingId, GuestToken, HoldCountdown, OwnerRef, ReservationCandidate, SlotHold, SlotId,
    TimeSelection, UserId, WizardStep,
};
