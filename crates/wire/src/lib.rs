//! Slipstream Wire Protocol Types
//!
//! This crate defines the shared Protobuf message types used between the
//! participant roles. Both the client and server crates depend on it, so a
//! move encoded by one end always decodes on the other.
//!
//! # Message Categories
//!
//! - **Move Channel** (reliable, per-sender ordered): `MoveProto`,
//!   client → authority.
//! - **Replication Channel** (latest-value-wins): `SnapshotProto`,
//!   authority → everyone. A newer snapshot overwrites an unprocessed older
//!   one; receivers only retain the newest value.
//! - **Replay artifacts**: `ReplayArtifactProto` and its parts, written and
//!   verified by the replay crate.
//!
//! Vector and quaternion fields travel as repeated doubles and are validated
//! on decode; a malformed payload surfaces as a [`WireError`] instead of a
//! panic.

#![deny(unsafe_code)]

use glam::{DQuat, DVec3};
use prost::Message;
use slipstream_sim::{
    MoveCommand, ServerSnapshot, VehicleParameters, VehicleState, VehicleTransform,
};
use thiserror::Error;

// ============================================================================
// Errors
// ============================================================================

/// Failure to turn wire bytes back into simulation types.
#[derive(Debug, Error, PartialEq)]
pub enum WireError {
    #[error("{field} must have exactly {expected} components, got {actual}")]
    ComponentCount {
        field: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("message is missing required field `{0}`")]
    MissingField(&'static str),

    #[error("orientation quaternion is degenerate and cannot be normalized")]
    DegenerateOrientation,

    #[error("protobuf decode failed: {0}")]
    Decode(#[from] prost::DecodeError),
}

// ============================================================================
// Move Channel
// ============================================================================

/// A move command on the wire.
#[derive(Clone, PartialEq, Message)]
pub struct MoveProto {
    #[prost(double, tag = "1")]
    pub throttle: f64,

    #[prost(double, tag = "2")]
    pub steering_throw: f64,

    /// Simulated duration covered by this move, seconds.
    #[prost(double, tag = "3")]
    pub delta_time: f64,

    /// Producer simulation clock at creation, seconds.
    #[prost(double, tag = "4")]
    pub timestamp: f64,
}

// ============================================================================
// Replication Channel
// ============================================================================

/// A vehicle's dynamic state on the wire.
///
/// `position`/`velocity` are `[x, y, z]`, `orientation` is `[x, y, z, w]`.
#[derive(Clone, PartialEq, Message)]
pub struct VehicleStateProto {
    #[prost(double, repeated, tag = "1")]
    pub position: Vec<f64>,

    #[prost(double, repeated, tag = "2")]
    pub orientation: Vec<f64>,

    #[prost(double, repeated, tag = "3")]
    pub velocity: Vec<f64>,
}

/// Authoritative snapshot broadcast.
#[derive(Clone, PartialEq, Message)]
pub struct SnapshotProto {
    #[prost(message, optional, tag = "1")]
    pub state: Option<VehicleStateProto>,

    /// The most recent move folded into `state`; acknowledgement cursor for
    /// the owning client.
    #[prost(message, optional, tag = "2")]
    pub last_move: Option<MoveProto>,
}

// ============================================================================
// Replay Artifact Messages
// ============================================================================

/// Static vehicle tuning recorded alongside a replay.
#[derive(Clone, PartialEq, Message)]
pub struct VehicleParametersProto {
    #[prost(double, tag = "1")]
    pub mass: f64,

    #[prost(double, tag = "2")]
    pub max_driving_force: f64,

    #[prost(double, tag = "3")]
    pub min_turning_radius: f64,

    #[prost(double, tag = "4")]
    pub drag_coefficient: f64,

    #[prost(double, tag = "5")]
    pub rolling_resistance_coefficient: f64,

    #[prost(double, tag = "6")]
    pub gravity: f64,
}

/// Complete record of one vehicle's simulated session: enough to re-run the
/// motion model from scratch and compare outcomes.
#[derive(Clone, PartialEq, Message)]
pub struct ReplayArtifactProto {
    /// Schema version, starts at 1.
    #[prost(uint32, tag = "1")]
    pub format_version: u32,

    #[prost(message, optional, tag = "2")]
    pub parameters: Option<VehicleParametersProto>,

    #[prost(message, optional, tag = "3")]
    pub initial_state: Option<VehicleStateProto>,

    /// Applied moves in application order.
    #[prost(message, repeated, tag = "4")]
    pub moves: Vec<MoveProto>,

    /// State digest algorithm identifier.
    #[prost(string, tag = "5")]
    pub digest_algo: String,

    /// Digest of the final state after all moves.
    #[prost(uint64, tag = "6")]
    pub final_digest: u64,
}

// ============================================================================
// Conversions
// ============================================================================

impl From<MoveCommand> for MoveProto {
    fn from(mv: MoveCommand) -> Self {
        Self {
            throttle: mv.throttle,
            steering_throw: mv.steering_throw,
            delta_time: mv.delta_time,
            timestamp: mv.timestamp,
        }
    }
}

impl From<MoveProto> for MoveCommand {
    fn from(proto: MoveProto) -> Self {
        // Field-complete by construction; plausibility is the authority's
        // concern, not the codec's.
        Self {
            throttle: proto.throttle,
            steering_throw: proto.steering_throw,
            delta_time: proto.delta_time,
            timestamp: proto.timestamp,
        }
    }
}

impl From<VehicleState> for VehicleStateProto {
    fn from(state: VehicleState) -> Self {
        let p = state.transform.position;
        let q = state.transform.orientation;
        let v = state.velocity;
        Self {
            position: vec![p.x, p.y, p.z],
            orientation: vec![q.x, q.y, q.z, q.w],
            velocity: vec![v.x, v.y, v.z],
        }
    }
}

impl TryFrom<VehicleStateProto> for VehicleState {
    type Error = WireError;

    fn try_from(proto: VehicleStateProto) -> Result<Self, Self::Error> {
        let position = vec3_field("position", &proto.position)?;
        let velocity = vec3_field("velocity", &proto.velocity)?;

        if proto.orientation.len() != 4 {
            return Err(WireError::ComponentCount {
                field: "orientation",
                expected: 4,
                actual: proto.orientation.len(),
            });
        }
        let raw = DQuat::from_xyzw(
            proto.orientation[0],
            proto.orientation[1],
            proto.orientation[2],
            proto.orientation[3],
        );
        // Quantization drift is renormalized away; an all-zero or non-finite
        // quaternion has no direction to recover.
        let len_sq = raw.length_squared();
        if !len_sq.is_finite() || len_sq < f64::EPSILON {
            return Err(WireError::DegenerateOrientation);
        }
        let orientation = raw.normalize();

        Ok(Self {
            transform: VehicleTransform {
                position,
                orientation,
            },
            velocity,
        })
    }
}

impl From<ServerSnapshot> for SnapshotProto {
    fn from(snapshot: ServerSnapshot) -> Self {
        Self {
            state: Some(snapshot.state.into()),
            last_move: Some(snapshot.last_move.into()),
        }
    }
}

impl TryFrom<SnapshotProto> for ServerSnapshot {
    type Error = WireError;

    fn try_from(proto: SnapshotProto) -> Result<Self, Self::Error> {
        let state = proto.state.ok_or(WireError::MissingField("state"))?;
        let last_move = proto.last_move.ok_or(WireError::MissingField("last_move"))?;
        Ok(Self {
            state: state.try_into()?,
            last_move: last_move.into(),
        })
    }
}

impl From<VehicleParameters> for VehicleParametersProto {
    fn from(params: VehicleParameters) -> Self {
        Self {
            mass: params.mass,
            max_driving_force: params.max_driving_force,
            min_turning_radius: params.min_turning_radius,
            drag_coefficient: params.drag_coefficient,
            rolling_resistance_coefficient: params.rolling_resistance_coefficient,
            gravity: params.gravity,
        }
    }
}

impl From<VehicleParametersProto> for VehicleParameters {
    fn from(proto: VehicleParametersProto) -> Self {
        Self {
            mass: proto.mass,
            max_driving_force: proto.max_driving_force,
            min_turning_radius: proto.min_turning_radius,
            drag_coefficient: proto.drag_coefficient,
            rolling_resistance_coefficient: proto.rolling_resistance_coefficient,
            gravity: proto.gravity,
        }
    }
}

fn vec3_field(field: &'static str, components: &[f64]) -> Result<DVec3, WireError> {
    if components.len() != 3 {
        return Err(WireError::ComponentCount {
            field,
            expected: 3,
            actual: components.len(),
        });
    }
    Ok(DVec3::new(components[0], components[1], components[2]))
}

// ============================================================================
// Encode/Decode Helpers
// ============================================================================

/// Serialize a snapshot for the replication channel. The bytes are identical
/// for every receiver.
pub fn encode_snapshot(snapshot: &ServerSnapshot) -> Vec<u8> {
    SnapshotProto::from(*snapshot).encode_to_vec()
}

/// Decode a replication-channel payload.
pub fn decode_snapshot(bytes: &[u8]) -> Result<ServerSnapshot, WireError> {
    SnapshotProto::decode(bytes)?.try_into()
}

/// Serialize a move for the client → authority channel.
pub fn encode_move(mv: &MoveCommand) -> Vec<u8> {
    MoveProto::from(*mv).encode_to_vec()
}

/// Decode a move-channel payload.
pub fn decode_move(bytes: &[u8]) -> Result<MoveCommand, WireError> {
    Ok(MoveProto::decode(bytes)?.into())
}

// ============================================================================
// Tests
// ============================================================================
