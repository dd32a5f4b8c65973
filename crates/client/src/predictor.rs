//! The input-owning client role: predict locally, reconcile on snapshots.

use slipstream_sim::{
    MoveCommand, Seconds, ServerSnapshot, SweepQuery, VehicleParameters, VehicleState,
    simulate_move,
};
use slipstream_wire::{WireError, decode_snapshot};
use tracing::{debug, warn};

use crate::pending::PendingMoves;

/// Pending-queue depth past which the predictor starts warning that the
/// authority has gone quiet (~10 s of 60 Hz stepping).
const STALLED_AUTHORITY_THRESHOLD: usize = 600;

/// A locally-controlled vehicle predicting ahead of its authority.
///
/// Every step simulates the new move immediately — the player never waits on
/// a round-trip — and queues it until a snapshot acknowledges it. Snapshot
/// arrival is a hard correction: local state is overwritten wholesale, then
/// the still-unacknowledged moves are replayed on top. No blending happens
/// here; the owner must agree with the authority exactly before replaying,
/// or the replayed moves would compound a stale error.
#[derive(Debug)]
pub struct OwnedVehicle {
    state: VehicleState,
    params: VehicleParameters,
    pending: PendingMoves,
    /// Input captured by `apply_input`, folded into the next move.
    throttle: f64,
    steering_throw: f64,
    /// Local simulation clock; the timestamp source for produced moves.
    clock: Seconds,
}

impl OwnedVehicle {
    pub fn new(initial: VehicleState, params: VehicleParameters) -> Self {
        Self {
            state: initial,
            params,
            pending: PendingMoves::new(),
            throttle: 0.0,
            steering_throw: 0.0,
            clock: 0.0,
        }
    }

    /// Record the current input-device state for the next move.
    ///
    /// Values are clamped to the valid range here so every move this client
    /// produces passes the authority's plausibility check.
    pub fn apply_input(&mut self, throttle: f64, steering_throw: f64) {
        self.throttle = throttle.clamp(-1.0, 1.0);
        self.steering_throw = steering_throw.clamp(-1.0, 1.0);
    }

    /// Advance the local simulation by one tick.
    ///
    /// Builds the move, applies it immediately, queues it, and returns it for
    /// the embedding to send to the authority. The local apply and the send
    /// are independent; nothing here waits on the network.
    pub fn step(&mut self, delta_time: Seconds, collision: &impl SweepQuery) -> MoveCommand {
        self.clock += delta_time;
        let mv = MoveCommand {
            throttle: self.throttle,
            steering_throw: self.steering_throw,
            delta_time,
            timestamp: self.clock,
        };

        self.state = simulate_move(&self.state, &mv, &self.params, collision);
        self.pending.push(mv);

        if self.pending.len() == STALLED_AUTHORITY_THRESHOLD {
            warn!(
                pending = self.pending.len(),
                "no snapshot acknowledged recent moves; authority may be stalled"
            );
        }

        mv
    }

    /// Reconcile against an authoritative snapshot.
    ///
    /// Snap to the snapshot's state, discard every acknowledged move, then
    /// replay the remainder in timestamp order to rebuild the predicted
    /// present. With an empty queue this leaves exactly the snapshot state.
    pub fn on_snapshot(&mut self, snapshot: &ServerSnapshot, collision: &impl SweepQuery) {
        self.state = snapshot.state;
        let acknowledged = self.pending.clear_acknowledged(&snapshot.last_move);

        for mv in self.pending.iter() {
            self.state = simulate_move(&self.state, mv, &self.params, collision);
        }

        debug!(
            acknowledged,
            replayed = self.pending.len(),
            last_move_timestamp = snapshot.last_move.timestamp,
            "reconciled against snapshot"
        );
    }

    /// Reconcile straight from a replication-channel payload.
    pub fn on_snapshot_bytes(
        &mut self,
        bytes: &[u8],
        collision: &impl SweepQuery,
    ) -> Result<(), WireError> {
        let snapshot = decode_snapshot(bytes)?;
        self.on_snapshot(&snapshot, collision);
        Ok(())
    }

    /// The predicted present: snapshot state plus all unacknowledged moves.
    pub fn state(&self) -> &VehicleState {
        &self.state
    }

    pub fn pending_moves(&self) -> usize {
        self.pending.len()
    }

    /// Local simulation clock, seconds since construction.
    pub fn clock(&self) -> Seconds {
        self.clock
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::DVec3;
    use slipstream_sim::NoObstacles;

    fn frictionless() -> VehicleParameters {
        VehicleParameters {
            drag_coefficient: 0.0,
            rolling_resistance_coefficient: 0.0,
            ..VehicleParameters::default()
        }
    }

    fn snapshot_at_rest(last_timestamp: Seconds) -> ServerSnapshot {
        ServerSnapshot {
            state: VehicleState::AT_REST,
            last_move: MoveCommand {
                throttle: 1.0,
                steering_throw: 0.0,
                delta_time: 0.5,
                timestamp: last_timestamp,
            },
        }
    }

    #[test]
    fn test_stepping_simulates_immediately_and_queues() {
        let mut owner = OwnedVehicle::new(VehicleState::AT_REST, frictionless());
        owner.apply_input(1.0, 0.0);

        let mv = owner.step(0.1, &NoObstacles);

        // Zero perceived latency: the state moved before any acknowledgement.
        assert_eq!(owner.state().velocity, DVec3::X * 1.0);
        assert_eq!(owner.pending_moves(), 1);
        assert_eq!(mv.timestamp, 0.1);
        assert_eq!(mv.throttle, 1.0);
    }

    #[test]
    fn test_input_is_clamped_to_the_valid_range() {
        let mut owner = OwnedVehicle::new(VehicleState::AT_REST, frictionless());
        owner.apply_input(3.0, -2.0);

        let mv = owner.step(0.1, &NoObstacles);

        assert!(mv.is_valid());
        assert_eq!(mv.throttle, 1.0);
        assert_eq!(mv.steering_throw, -1.0);
    }

    #[test]
    fn test_reconciliation_with_empty_queue_is_exactly_the_snapshot() {
        let mut owner = OwnedVehicle::new(VehicleState::AT_REST, frictionless());
        owner.apply_input(1.0, 0.0);
        owner.step(1.0, &NoObstacles);

        // The snapshot acknowledges everything sent so far.
        let snapshot = snapshot_at_rest(owner.clock());
        owner.on_snapshot(&snapshot, &NoObstacles);

        assert_eq!(owner.pending_moves(), 0);
        assert_eq!(*owner.state(), snapshot.state);
    }

    #[test]
    fn test_reconciliation_replays_only_unacknowledged_moves() {
        let mut owner = OwnedVehicle::new(VehicleState::AT_REST, frictionless());
        owner.apply_input(1.0, 0.0);

        // Moves stamped 1.0, 1.5, 2.0.
        let _m1 = owner.step(1.0, &NoObstacles);
        let _m2 = owner.step(0.5, &NoObstacles);
        let m3 = owner.step(0.5, &NoObstacles);

        // Authority has processed through timestamp 1.5.
        let snapshot = snapshot_at_rest(1.5);
        owner.on_snapshot(&snapshot, &NoObstacles);

        assert_eq!(owner.pending_moves(), 1);

        // The reconciled state must equal the snapshot state advanced by m3
        // alone.
        let expected = simulate_move(&snapshot.state, &m3, &frictionless(), &NoObstacles);
        assert_eq!(*owner.state(), expected);
    }

    #[test]
    fn test_reconciliation_is_deterministic_against_a_fresh_replay() {
        let params = VehicleParameters::default();
        let mut owner = OwnedVehicle::new(VehicleState::AT_REST, params);
        owner.apply_input(0.8, 0.3);

        let moves: Vec<MoveCommand> = (0..30).map(|_| owner.step(1.0 / 60.0, &NoObstacles)).collect();

        // Snapshot acknowledging the first 10 moves, with the state the
        // authority reached by applying them itself.
        let mut server_state = VehicleState::AT_REST;
        for mv in &moves[..10] {
            server_state = simulate_move(&server_state, mv, &params, &NoObstacles);
        }
        let snapshot = ServerSnapshot {
            state: server_state,
            last_move: moves[9],
        };

        owner.on_snapshot(&snapshot, &NoObstacles);

        // Authority and owner ran identical move sequences, so the owner's
        // reconciled present equals the full 30-move simulation.
        let mut expected = VehicleState::AT_REST;
        for mv in &moves {
            expected = simulate_move(&expected, mv, &params, &NoObstacles);
        }
        assert_eq!(*owner.state(), expected);
        assert_eq!(owner.pending_moves(), 20);
    }

    #[test]
    fn test_snapshot_bytes_roundtrip_through_the_wire() {
        let mut owner = OwnedVehicle::new(VehicleState::AT_REST, frictionless());
        owner.apply_input(1.0, 0.0);
        owner.step(1.0, &NoObstacles);

        let snapshot = snapshot_at_rest(owner.clock());
        let bytes = slipstream_wire::encode_snapshot(&snapshot);
        owner.on_snapshot_bytes(&bytes, &NoObstacles).unwrap();

        assert_eq!(owner.pending_moves(), 0);
        assert_eq!(owner.state().velocity, snapshot.state.velocity);
    }
}
