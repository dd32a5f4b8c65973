//! Slipstream Simulation Core
//!
//! This crate contains the deterministic vehicle motion model shared by every
//! participant role: the authority applies it to accepted moves, the owning
//! client applies it for prediction and replay, and observers consult it only
//! to turn spline derivatives back into velocity estimates.
//!
//! # Architecture Constraints
//!
//! The Simulation Core MUST NOT:
//! - Perform I/O operations (file, network, etc.)
//! - Read wall-clock time
//! - Use ambient/unseeded randomness
//! - Make system calls
//!
//! Time only enters through the `delta_time` carried by each move. All
//! external communication occurs through explicit, serializable message
//! boundaries owned by the server and client crates. Prediction and replay
//! are only sound if `simulate_move` is bit-for-bit deterministic for
//! identical inputs; nothing in this crate may break that.

#![deny(unsafe_code)]

use glam::{DQuat, DVec3};

// ============================================================================
// Type Aliases
// ============================================================================

/// Simulation-clock time, in seconds. Durations and timestamps share the
/// same unit; a producer's timestamps are monotonically non-decreasing.
pub type Seconds = f64;

/// Handle for a vehicle hosted in an authority's registry.
///
/// This is a lookup key, never a lifetime-controlling reference. Components
/// that need to reach "their" vehicle hold a `VehicleId` and resolve it
/// against the registry on every use; a stale handle makes the operation a
/// no-op rejection rather than a dangling pointer.
pub type VehicleId = u64;

// ============================================================================
// Move Commands
// ============================================================================

/// One timestamped unit of player input plus the duration it covers.
///
/// Immutable once created. The owning client builds one per simulation step,
/// applies it locally, and sends it to the authority; the authority replays
/// the identical struct. `timestamp` is the producer's simulation clock at
/// creation time and doubles as the acknowledgement cursor: a move is spent
/// once a snapshot's `last_move.timestamp` reaches it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MoveCommand {
    /// Forward drive input, in `[-1, 1]`.
    pub throttle: f64,
    /// Steering input, in `[-1, 1]`.
    pub steering_throw: f64,
    /// Simulated duration covered by this move, > 0.
    pub delta_time: Seconds,
    /// Producer simulation clock at creation.
    pub timestamp: Seconds,
}

impl MoveCommand {
    /// Plausibility predicate checked by the authority before applying a
    /// remote move. `delta_time` and `timestamp` are trusted transport inputs
    /// bounded separately by the authority's running-ahead check.
    ///
    /// NaN inputs fail both comparisons and are therefore invalid.
    pub fn is_valid(&self) -> bool {
        self.throttle.abs() <= 1.0 && self.steering_throw.abs() <= 1.0
    }
}

// ============================================================================
// Vehicle State
// ============================================================================

/// Position and orientation of a vehicle, in world space.
///
/// Positions are metres; orientation is a unit quaternion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VehicleTransform {
    pub position: DVec3,
    pub orientation: DQuat,
}

impl VehicleTransform {
    pub const IDENTITY: Self = Self {
        position: DVec3::ZERO,
        orientation: DQuat::IDENTITY,
    };

    /// World-space forward axis (local +X).
    pub fn forward(&self) -> DVec3 {
        self.orientation * DVec3::X
    }

    /// World-space up axis (local +Z); the steering rotation axis.
    pub fn up(&self) -> DVec3 {
        self.orientation * DVec3::Z
    }
}

/// Full dynamic state of one vehicle.
///
/// Exclusively owned by whichever role is currently simulating it. The owner
/// overwrites it wholesale on snapshot receipt; observers never mutate it
/// directly and instead derive a render pose from it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VehicleState {
    pub transform: VehicleTransform,
    /// World-space velocity, m/s.
    pub velocity: DVec3,
}

impl VehicleState {
    /// A vehicle at rest at the world origin.
    pub const AT_REST: Self = Self {
        transform: VehicleTransform::IDENTITY,
        velocity: DVec3::ZERO,
    };
}

/// Static tuning for one vehicle instance; constant for its lifetime.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VehicleParameters {
    /// Vehicle mass, kg.
    pub mass: f64,
    /// Force applied at full throttle, N.
    pub max_driving_force: f64,
    /// Turning-circle radius at full steering lock, m.
    pub min_turning_radius: f64,
    /// Quadratic air-drag coefficient; higher means more drag.
    pub drag_coefficient: f64,
    /// Rolling-resistance coefficient against the normal force.
    pub rolling_resistance_coefficient: f64,
    /// Gravity magnitude used for the normal force, m/s².
    pub gravity: f64,
}

impl Default for VehicleParameters {
    fn default() -> Self {
        Self {
            mass: 1000.0,
            max_driving_force: 10_000.0,
            min_turning_radius: 10.0,
            drag_coefficient: 16.0,
            rolling_resistance_coefficient: 0.015,
            gravity: 9.81,
        }
    }
}

// ============================================================================
// Snapshots
// ============================================================================

/// Authoritative state broadcast from the server; the sole cross-role source
/// of truth.
///
/// `last_move.timestamp` is monotonically non-decreasing across successive
/// snapshots from one authority. The replication channel carries these with
/// latest-value-wins semantics, so receivers only ever need the newest one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ServerSnapshot {
    pub state: VehicleState,
    /// The most recent move folded into `state`.
    pub last_move: MoveCommand,
}

// ============================================================================
// Collision Seam
// ============================================================================

/// Result of a blocking sweep: the furthest reachable position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SweepHit {
    pub position: DVec3,
}

/// Swept collision test consumed by the motion model.
///
/// The embedding environment supplies the real geometry query; the core only
/// needs a single blocking-hit answer per translation. Implementations must
/// be deterministic for identical arguments or replay breaks.
pub trait SweepQuery {
    /// Sweep from `from` to `to`; `Some` truncates the step at the hit.
    fn sweep(&self, from: DVec3, to: DVec3) -> Option<SweepHit>;
}

/// Collision-free world; every sweep passes.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoObstacles;

impl SweepQuery for NoObstacles {
    fn sweep(&self, _from: DVec3, _to: DVec3) -> Option<SweepHit> {
        None
    }
}

// ============================================================================
// Motion Model
// ============================================================================

/// Advance one vehicle by one move. Pure: identical inputs give bit-for-bit
/// identical outputs, which is the precondition for prediction and replay.
///
/// Force model, in order: driving force along the forward axis, quadratic
/// air resistance, rolling resistance against the normal force. Steering is
/// a bicycle-model approximation; the turn rate scales with forward speed
/// rather than a fixed angular rate, so a stationary vehicle cannot pivot.
/// Translation is swept through `collision`; a blocking hit truncates the
/// step at the hit point and zeroes velocity (hard stop, no bounce or slide).
pub fn simulate_move(
    state: &VehicleState,
    mv: &MoveCommand,
    params: &VehicleParameters,
    collision: &impl SweepQuery,
) -> VehicleState {
    let mut next = *state;

    let mut force = next.transform.forward() * params.max_driving_force * mv.throttle;
    force += air_resistance(next.velocity, params);
    force += rolling_resistance(next.velocity, params);

    let acceleration = force / params.mass;
    next.velocity += acceleration * mv.delta_time;

    apply_rotation(&mut next, mv.delta_time, mv.steering_throw, params);
    translate(&mut next, mv.delta_time, collision);

    next
}

/// `-v̂ · |v|² · drag`. Zero at rest.
fn air_resistance(velocity: DVec3, params: &VehicleParameters) -> DVec3 {
    -velocity.normalize_or_zero() * velocity.length_squared() * params.drag_coefficient
}

/// `-v̂ · coefficient · (m·g)`. Zero at rest.
fn rolling_resistance(velocity: DVec3, params: &VehicleParameters) -> DVec3 {
    let normal_force = params.mass * params.gravity;
    -velocity.normalize_or_zero() * params.rolling_resistance_coefficient * normal_force
}

/// Rotate both the orientation and the velocity about the up axis.
///
/// The turn angle is the forward distance covered this step divided by the
/// turning radius, scaled by the steering throw.
fn apply_rotation(
    state: &mut VehicleState,
    dt: Seconds,
    steering_throw: f64,
    params: &VehicleParameters,
) {
    let forward_distance = state.transform.forward().dot(state.velocity) * dt;
    let angle = forward_distance / params.min_turning_radius * steering_throw;
    let delta = DQuat::from_axis_angle(state.transform.up(), angle);

    state.velocity = delta * state.velocity;
    // World-space rotation composes on the left; renormalize to keep the
    // quaternion unit-length across long move chains.
    state.transform.orientation = (delta * state.transform.orientation).normalize();
}

/// Move along the velocity for `dt`, stopping dead at a blocking hit.
fn translate(state: &mut VehicleState, dt: Seconds, collision: &impl SweepQuery) {
    let from = state.transform.position;
    let to = from + state.velocity * dt;

    match collision.sweep(from, to) {
        Some(hit) => {
            state.transform.position = hit.position;
            state.velocity = DVec3::ZERO;
        }
        None => state.transform.position = to,
    }
}

// ============================================================================
// State Digest
// ============================================================================

/// State digest algorithm identifier, recorded in replay artifacts.
pub const STATE_DIGEST_ALGO: &str = "fnv1a64-le-f64canon-pos-quat-vel";

/// FNV-1a 64-bit offset basis.
const FNV1A_OFFSET_BASIS: u64 = 0xcbf29ce484222325;

/// FNV-1a 64-bit prime.
const FNV1A_PRIME: u64 = 0x100000001b3;

#[derive(Debug, Clone)]
struct Fnv1a64 {
    state: u64,
}

impl Fnv1a64 {
    fn new() -> Self {
        Self {
            state: FNV1A_OFFSET_BASIS,
        }
    }

    fn update(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.state ^= u64::from(byte);
            self.state = self.state.wrapping_mul(FNV1A_PRIME);
        }
    }

    fn finish(self) -> u64 {
        self.state
    }
}

/// Canonicalize an f64 value for deterministic hashing.
///
/// Rules:
/// - `-0.0` → `+0.0`
/// - Any NaN → quiet NaN bit pattern `0x7ff8000000000000`
fn canonicalize_f64(value: f64) -> u64 {
    const QUIET_NAN_BITS: u64 = 0x7ff8000000000000;

    if value.is_nan() {
        QUIET_NAN_BITS
    } else if value == 0.0 {
        0u64
    } else {
        value.to_bits()
    }
}

/// Hash a vehicle state: position, orientation (x, y, z, w), velocity, each
/// component canonicalized and fed little-endian.
pub fn state_digest(state: &VehicleState) -> u64 {
    let mut hasher = Fnv1a64::new();

    let components = [
        state.transform.position.x,
        state.transform.position.y,
        state.transform.position.z,
        state.transform.orientation.x,
        state.transform.orientation.y,
        state.transform.orientation.z,
        state.transform.orientation.w,
        state.velocity.x,
        state.velocity.y,
        state.velocity.z,
    ];
    for component in components {
        hasher.update(&canonicalize_f64(component).to_le_bytes());
    }

    hasher.finish()
}

// ============================================================================
// Tests
// ============================================================================
