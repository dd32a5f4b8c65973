//! Slipstream Authority
//!
//! The authority owns the only state that counts. It hosts a registry of
//! vehicles, each either locally driven (the listen-server case: the
//! authority generates and applies its own moves) or remotely driven (moves
//! arrive over the reliable per-sender-ordered channel and are validated
//! before application). Every accepted move refreshes that vehicle's pending
//! snapshot; the replication channel ships the newest value at a configurable
//! cadence, decoupled from the step rate.
//!
//! The authority clock is accumulated from `step` calls rather than read from
//! a wall clock, so the whole role stays deterministic and drivable from a
//! test harness or any fixed-timestep loop.

#![deny(unsafe_code)]

pub mod session;
pub mod validation;

use std::collections::HashMap;

use slipstream_replay::MoveRecorder;
use slipstream_sim::{
    MoveCommand, Seconds, ServerSnapshot, SweepQuery, VehicleId, VehicleParameters, VehicleState,
    simulate_move, state_digest,
};
use slipstream_wire::{ReplayArtifactProto, encode_snapshot};
use tracing::{debug, warn};

use session::{Session, SessionId};
use validation::{ValidationResult, validate_move};

/// Default replication interval: ~1 Hz of authoritative signal against
/// per-frame local simulation. Interpolation and reconciliation are built to
/// tolerate exactly this sparsity.
pub const DEFAULT_SNAPSHOT_INTERVAL: Seconds = 1.0;

/// Authority configuration.
#[derive(Debug, Clone)]
pub struct AuthorityConfig {
    /// Tuning shared by every hosted vehicle.
    pub parameters: VehicleParameters,
    /// Seconds between snapshot publications per vehicle.
    pub snapshot_interval: Seconds,
    /// Record applied moves for post-session replay verification.
    pub record_replay: bool,
}

impl Default for AuthorityConfig {
    fn default() -> Self {
        Self {
            parameters: VehicleParameters::default(),
            snapshot_interval: DEFAULT_SNAPSHOT_INTERVAL,
            record_replay: false,
        }
    }
}

/// Who produces moves for a hosted vehicle. Fixed at spawn.
#[derive(Debug, Clone, Copy)]
enum Control {
    /// The authority itself drives; input arrives via `apply_input`.
    Local { throttle: f64, steering_throw: f64 },
    /// A connected client drives via the move channel.
    Remote { session: SessionId },
}

/// Registry entry for one simulated vehicle.
#[derive(Debug)]
struct HostedVehicle {
    state: VehicleState,
    control: Control,
    /// Newest authoritative value for the replication channel. Refreshed on
    /// every applied move, shipped at the replication cadence.
    snapshot: Option<ServerSnapshot>,
    /// Time since this vehicle's snapshot last went out.
    since_publish: Seconds,
    recorder: Option<MoveRecorder>,
}

/// The server role: validates, simulates, and republishes.
pub struct Authority {
    config: AuthorityConfig,
    vehicles: HashMap<VehicleId, HostedVehicle>,
    sessions: HashMap<SessionId, Session>,
    next_vehicle_id: VehicleId,
    next_session_id: SessionId,
    /// Authority clock, accumulated from `step`; the running-ahead bound.
    elapsed: Seconds,
}

impl Authority {
    pub fn new(config: AuthorityConfig) -> Self {
        Self {
            config,
            vehicles: HashMap::new(),
            sessions: HashMap::new(),
            next_vehicle_id: 1,
            next_session_id: 1,
            elapsed: 0.0,
        }
    }

    /// Authority clock, seconds since construction.
    pub fn elapsed(&self) -> Seconds {
        self.elapsed
    }

    /// Host a vehicle the authority itself drives.
    pub fn spawn_local(&mut self, initial: VehicleState) -> VehicleId {
        self.spawn(
            initial,
            Control::Local {
                throttle: 0.0,
                steering_throw: 0.0,
            },
        )
    }

    /// Host a vehicle driven by a remote client; returns the registry handle
    /// and the session the client's moves must arrive on.
    pub fn spawn_remote(&mut self, initial: VehicleState) -> (VehicleId, SessionId) {
        let session_id = self.next_session_id;
        self.next_session_id += 1;

        let vehicle_id = self.spawn(
            initial,
            Control::Remote {
                session: session_id,
            },
        );
        self.sessions
            .insert(session_id, Session::new(session_id, vehicle_id));

        (vehicle_id, session_id)
    }

    fn spawn(&mut self, initial: VehicleState, control: Control) -> VehicleId {
        let vehicle_id = self.next_vehicle_id;
        self.next_vehicle_id += 1;

        let recorder = self
            .config
            .record_replay
            .then(|| MoveRecorder::new(self.config.parameters, initial));

        self.vehicles.insert(
            vehicle_id,
            HostedVehicle {
                state: initial,
                control,
                snapshot: None,
                since_publish: 0.0,
                recorder,
            },
        );

        vehicle_id
    }

    /// Update the drive inputs of a locally-controlled vehicle.
    ///
    /// Unknown handles and remotely-controlled vehicles make this a no-op;
    /// the caller may be racing a despawn and that is not fatal.
    pub fn apply_input(&mut self, vehicle: VehicleId, throttle: f64, steering_throw: f64) {
        match self.vehicles.get_mut(&vehicle) {
            Some(hosted) => match &mut hosted.control {
                Control::Local {
                    throttle: t,
                    steering_throw: s,
                } => {
                    *t = throttle.clamp(-1.0, 1.0);
                    *s = steering_throw.clamp(-1.0, 1.0);
                }
                Control::Remote { .. } => {
                    debug!(vehicle, "apply_input ignored for remotely-driven vehicle");
                }
            },
            None => debug!(vehicle, "apply_input ignored for unknown vehicle"),
        }
    }

    /// Handle a move arriving on the reliable channel.
    ///
    /// On acceptance: simulate, extend the session's time budget, refresh the
    /// vehicle's pending snapshot. On rejection: nothing changes and the
    /// result is returned for the transport to report; the client will
    /// self-correct on its next accepted snapshot.
    pub fn on_move_received(
        &mut self,
        session_id: SessionId,
        mv: MoveCommand,
        collision: &impl SweepQuery,
    ) -> ValidationResult {
        let Some(&Session {
            vehicle: vehicle_id,
            simulated_time,
            ..
        }) = self.sessions.get(&session_id)
        else {
            warn!(session_id, "move from unknown session");
            return ValidationResult::RejectedUnknownSession;
        };

        let Some(vehicle) = self.vehicles.get_mut(&vehicle_id) else {
            warn!(session_id, vehicle = vehicle_id, "session's vehicle not in registry");
            return ValidationResult::RejectedUnknownVehicle {
                vehicle: vehicle_id,
            };
        };

        let verdict = validate_move(&mv, simulated_time, self.elapsed);
        if !verdict.is_accepted() {
            debug!(session_id, ?verdict, "rejected move");
            return verdict;
        }

        vehicle.state = simulate_move(&vehicle.state, &mv, &self.config.parameters, collision);
        vehicle.snapshot = Some(ServerSnapshot {
            state: vehicle.state,
            last_move: mv,
        });
        if let Some(recorder) = vehicle.recorder.as_mut() {
            recorder.record_move(mv);
        }
        if let Some(session) = self.sessions.get_mut(&session_id) {
            session.simulated_time += mv.delta_time;
        }

        ValidationResult::Accepted
    }

    /// Advance the authority by one tick.
    ///
    /// Locally-driven vehicles generate and apply their own move. Every
    /// vehicle whose replication interval has elapsed emits its newest
    /// snapshot as pre-encoded bytes, identical for every receiver. Sends are
    /// fire-and-forget: the caller hands the payloads to the replication
    /// channel and nothing here waits on delivery.
    pub fn step(
        &mut self,
        delta_time: Seconds,
        collision: &impl SweepQuery,
    ) -> Vec<(VehicleId, Vec<u8>)> {
        self.elapsed += delta_time;

        let mut due = Vec::new();
        for (&vehicle_id, vehicle) in self.vehicles.iter_mut() {
            if let Control::Local {
                throttle,
                steering_throw,
            } = vehicle.control
            {
                let mv = MoveCommand {
                    throttle,
                    steering_throw,
                    delta_time,
                    timestamp: self.elapsed,
                };
                vehicle.state =
                    simulate_move(&vehicle.state, &mv, &self.config.parameters, collision);
                vehicle.snapshot = Some(ServerSnapshot {
                    state: vehicle.state,
                    last_move: mv,
                });
                if let Some(recorder) = vehicle.recorder.as_mut() {
                    recorder.record_move(mv);
                }
            }

            vehicle.since_publish += delta_time;
            if vehicle.since_publish >= self.config.snapshot_interval {
                if let Some(snapshot) = &vehicle.snapshot {
                    due.push((vehicle_id, encode_snapshot(snapshot)));
                    vehicle.since_publish = 0.0;
                }
                // No move applied yet: keep accumulating until there is an
                // authoritative value to ship.
            }
        }

        // Registry iteration order is arbitrary; emit in handle order.
        due.sort_by_key(|(vehicle_id, _)| *vehicle_id);
        due
    }

    /// Newest authoritative snapshot for a vehicle, if any move was applied.
    pub fn latest_snapshot(&self, vehicle: VehicleId) -> Option<&ServerSnapshot> {
        self.vehicles.get(&vehicle)?.snapshot.as_ref()
    }

    /// Current authoritative state of a hosted vehicle.
    pub fn vehicle_state(&self, vehicle: VehicleId) -> Option<&VehicleState> {
        Some(&self.vehicles.get(&vehicle)?.state)
    }

    /// Remove a vehicle from the registry, along with its session when it
    /// was remotely driven. Outstanding handles simply stop resolving.
    pub fn despawn(&mut self, vehicle: VehicleId) {
        if let Some(hosted) = self.vehicles.remove(&vehicle) {
            if let Control::Remote { session } = hosted.control {
                self.sessions.remove(&session);
            }
        }
    }

    /// Re-anchor a session's time budget to the authority clock.
    ///
    /// Long sessions accumulate slack between a client's accepted simulated
    /// time and real time (a lagging client never catches the budget up).
    /// Calling this on reconnect or periodically collapses that slack so the
    /// running-ahead check stays meaningful.
    pub fn rebase_session(&mut self, session_id: SessionId) {
        if let Some(session) = self.sessions.get_mut(&session_id) {
            debug!(
                session_id,
                old = session.simulated_time,
                new = self.elapsed,
                "rebased session time budget"
            );
            session.simulated_time = self.elapsed;
        }
    }

    /// Close out a vehicle's replay recording, producing the artifact.
    ///
    /// Returns `None` when recording was disabled or the handle is unknown.
    pub fn finalize_replay(&mut self, vehicle: VehicleId) -> Option<ReplayArtifactProto> {
        let hosted = self.vehicles.get_mut(&vehicle)?;
        let recorder = hosted.recorder.take()?;
        Some(recorder.finalize(state_digest(&hosted.state)))
    }
}

// ============================================================================
// Tests
// ============================================================================
