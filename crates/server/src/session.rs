//! Session bookkeeping for remotely-driven vehicles.

use slipstream_sim::{Seconds, VehicleId};

/// Session identifier (authority-internal).
pub type SessionId = u64;

/// One connected client driving one vehicle.
#[derive(Debug, Clone, Copy)]
pub struct Session {
    pub id: SessionId,
    /// Registry handle of the driven vehicle; resolved on every use.
    pub vehicle: VehicleId,
    /// Running total of accepted move durations; the running-ahead check
    /// compares this against the authority clock.
    pub simulated_time: Seconds,
}

impl Session {
    pub fn new(id: SessionId, vehicle: VehicleId) -> Self {
        Self {
            id,
            vehicle,
            simulated_time: 0.0,
        }
    }
}
