//! Core domain types for the booking client
//!
//! Strongly-typed identifiers plus the time-selection and hold types the
//! reducer operates on. Identifiers are UUID newtypes so a slot id can never
//! be confused with a booking id at a call site.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::HoldError;

/// Unique identifier for a held time slot row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SlotId(Uuid);

impl SlotId {
    /// Generate a new random slot ID
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create from an existing UUID
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for SlotId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a confirmed booking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BookingId(Uuid);

impl BookingId {
    /// Generate a new random booking ID
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create from an existing UUID
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for BookingId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BookingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for an authenticated user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(Uuid);

impl UserId {
    /// Generate a new random user ID
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create from an existing UUID
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque token identifying an anonymous visitor
///
/// Minted once per session and reused for every hold the visitor takes, so
/// the backend can tie a hold back to the visitor that owns it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GuestToken(Uuid);

impl GuestToken {
    /// Mint a new random guest token
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create from an existing UUID
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for GuestToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for GuestToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The identity a hold is taken under
///
/// Authenticated users are identified by their account; anonymous visitors
/// by a per-session [`GuestToken`]. Exactly one of the two applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OwnerRef {
    /// A signed-in user, identified via their account
    Authenticated { id: UserId },
    /// An anonymous visitor, identified via a session-scoped token
    Guest { token: GuestToken },
}

impl OwnerRef {
    /// The guest token, when the owner is anonymous
    #[must_use]
    pub const fn guest_token(&self) -> Option<GuestToken> {
        match self {
            Self::Authenticated { .. } => None,
            Self::Guest { token } => Some(*token),
        }
    }

    /// Whether this owner is a signed-in user
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated { .. })
    }
}

/// The (possibly incomplete) time selection the wizard has collected so far
///
/// Fields fill in as the visitor works through the schedule step; a hold can
/// only be requested once all three are present and ordered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSelection {
    pub date: Option<NaiveDate>,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    /// Whether the visitor booked the whole day rather than a range
    pub whole_day: bool,
}

impl TimeSelection {
    /// Build a complete selection
    #[must_use]
    pub const fn new(date: NaiveDate, start_time: NaiveTime, end_time: NaiveTime) -> Self {
        Self {
            date: Some(date),
            start_time: Some(start_time),
            end_time: Some(end_time),
            whole_day: false,
        }
    }

    /// Validate the selection into a candidate the backend can be asked about
    ///
    /// # Errors
    ///
    /// Returns [`HoldError::InvalidRange`] when the date or either time is
    /// missing, or when the start does not strictly precede the end.
    pub fn candidate(&self) -> Result<ReservationCandidate, HoldError> {
        let date = self.date.ok_or_else(|| HoldError::InvalidRange {
            reason: "Please select a date".to_string(),
        })?;

        let (Some(start_time), Some(end_time)) = (self.start_time, self.end_time) else {
            return Err(HoldError::InvalidRange {
                reason: "Please select both start and end times".to_string(),
            });
        };

        let mut candidate = ReservationCandidate::new(date, start_time, end_time)?;
        candidate.whole_day = self.whole_day;
        Ok(candidate)
    }
}

/// A validated date plus time range, ready to be checked and held
///
/// Construction enforces `start_time < end_time`, so any candidate in flight
/// is known to describe a non-empty window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationCandidate {
    date: NaiveDate,
    start_time: NaiveTime,
    end_time: NaiveTime,
    whole_day: bool,
}

impl ReservationCandidate {
    /// Validate a date and time range into a candidate
    ///
    /// # Errors
    ///
    /// Returns [`HoldError::InvalidRange`] when the start does not strictly
    /// precede the end.
    pub fn new(
        date: NaiveDate,
        start_time: NaiveTime,
        end_time: NaiveTime,
    ) -> Result<Self, HoldError> {
        if start_time >= end_time {
            return Err(HoldError::InvalidRange {
                reason: "End time must be after start time".to_string(),
            });
        }

        Ok(Self {
            date,
            start_time,
            end_time,
            whole_day: false,
        })
    }

    #[must_use]
    pub const fn date(&self) -> NaiveDate {
        self.date
    }

    #[must_use]
    pub const fn start_time(&self) -> NaiveTime {
        self.start_time
    }

    #[must_use]
    pub const fn end_time(&self) -> NaiveTime {
        self.end_time
    }

    #[must_use]
    pub const fn whole_day(&self) -> bool {
        self.whole_day
    }
}

/// An acquired hold on a time slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotHold {
    pub slot_id: SlotId,
    pub expires_at: DateTime<Utc>,
}

/// Remaining hold time, ready for display
///
/// Renders as `M:SS` with zero-padded seconds and is clamped so it never
/// shows a negative value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HoldCountdown {
    minutes: i64,
    seconds: i64,
}

impl HoldCountdown {
    /// Build a countdown from a whole number of remaining seconds
    ///
    /// Negative inputs clamp to zero.
    #[must_use]
    pub const fn from_seconds(total_seconds: i64) -> Self {
        let clamped = if total_seconds > 0 { total_seconds } else { 0 };
        Self {
            minutes: clamped / 60,
            seconds: clamped % 60,
        }
    }

    /// Countdown from now until the hold expires
    #[must_use]
    pub fn remaining(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        Self::from_seconds((expires_at - now).num_seconds())
    }

    /// Total remaining seconds
    #[must_use]
    pub const fn total_seconds(&self) -> i64 {
        self.minutes * 60 + self.seconds
    }
}

impl fmt::Display for HoldCountdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{:02}", self.minutes, self.seconds)
    }
}

/// Steps of the booking wizard
///
/// The hold protocol gates the transition out of [`WizardStep::Schedule`]:
/// the details step is only reachable while a hold (or a degraded
/// hold-less session) is in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WizardStep {
    /// Picking a date and time range
    Schedule,
    /// Entering contact and shoot details
    Details,
    /// Reviewing and confirming the booking
    Confirm,
}
