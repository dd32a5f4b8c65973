//! Move validation for the authority.
//!
//! Two checks gate every remote move:
//! - Plausibility: throttle and steering inside `[-1, 1]` (NaN fails).
//! - Running-ahead: the session's accumulated simulated time plus the move's
//!   duration must not exceed the authority's own elapsed time, so a client
//!   cannot simulate faster than real time.
//!
//! A rejection mutates nothing and publishes nothing. It is silent at the
//! protocol level: the result goes back to the transport, the sender's state
//! simply stops advancing until its next accepted snapshot corrects it.

use slipstream_sim::{MoveCommand, Seconds, VehicleId};

/// Result of validating one remote move.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ValidationResult {
    /// Move accepted and applied.
    Accepted,
    /// Dropped: throttle or steering outside the valid range.
    RejectedInvalidInput { throttle: f64, steering_throw: f64 },
    /// Dropped: accepting would put the client ahead of real time.
    RejectedTimeAhead { proposed: Seconds, elapsed: Seconds },
    /// Dropped: the session's vehicle is not registered (spawn ordering or
    /// despawn race); the step is a no-op until the handle resolves.
    RejectedUnknownVehicle { vehicle: VehicleId },
    /// Dropped: no such session.
    RejectedUnknownSession,
}

impl ValidationResult {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }
}

/// Validate a remote move against a session's time budget.
///
/// `simulated_time` is the session's running total of previously accepted
/// move durations; `elapsed` is the authority's own clock.
pub fn validate_move(
    mv: &MoveCommand,
    simulated_time: Seconds,
    elapsed: Seconds,
) -> ValidationResult {
    if !mv.is_valid() {
        return ValidationResult::RejectedInvalidInput {
            throttle: mv.throttle,
            steering_throw: mv.steering_throw,
        };
    }

    let proposed = simulated_time + mv.delta_time;
    if proposed > elapsed {
        return ValidationResult::RejectedTimeAhead { proposed, elapsed };
    }

    ValidationResult::Accepted
}
