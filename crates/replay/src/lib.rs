//! Slipstream Replay System
//!
//! Replay is the checkable face of determinism: if the motion model is pure,
//! a recorded move log re-simulated from the recorded initial state must land
//! on exactly the recorded final digest. The authority records every applied
//! move; this crate packages the log into an artifact, verifies artifacts,
//! and moves them through files with a content hash.
//!
//! # Architecture
//!
//! - [`MoveRecorder`]: collects parameters, initial state, and applied moves
//!   during a session.
//! - [`verify`]: re-runs the motion model over an artifact and compares state
//!   digests.
//! - [`save_artifact`] / [`load_artifact`]: protobuf bytes on disk plus a
//!   SHA-256 content hash for integrity tracking.
//!
//! Verification re-simulates against a caller-supplied collision world; the
//! artifact records moves, not geometry, so the verifier must be given the
//! same world the session ran in.

#![deny(unsafe_code)]

use std::fs;
use std::path::Path;

use prost::Message;
use sha2::{Digest, Sha256};
use slipstream_sim::{
    MoveCommand, STATE_DIGEST_ALGO, SweepQuery, VehicleParameters, VehicleState, simulate_move,
    state_digest,
};
use slipstream_wire::{ReplayArtifactProto, WireError};
use thiserror::Error;

/// Artifact schema version; bumped on any incompatible layout change.
pub const REPLAY_FORMAT_VERSION: u32 = 1;

// ============================================================================
// Recorder
// ============================================================================

/// Collects one vehicle's session for later verification.
#[derive(Debug)]
pub struct MoveRecorder {
    parameters: VehicleParameters,
    initial_state: VehicleState,
    moves: Vec<MoveCommand>,
}

impl MoveRecorder {
    pub fn new(parameters: VehicleParameters, initial_state: VehicleState) -> Self {
        Self {
            parameters,
            initial_state,
            moves: Vec::new(),
        }
    }

    /// Record a move the authority actually applied. Rejected moves never
    /// reach the recorder.
    pub fn record_move(&mut self, mv: MoveCommand) {
        self.moves.push(mv);
    }

    pub fn move_count(&self) -> usize {
        self.moves.len()
    }

    /// Package the log. `final_digest` is the digest of the state the
    /// session actually ended in; verification re-derives it independently.
    pub fn finalize(self, final_digest: u64) -> ReplayArtifactProto {
        ReplayArtifactProto {
            format_version: REPLAY_FORMAT_VERSION,
            parameters: Some(self.parameters.into()),
            initial_state: Some(self.initial_state.into()),
            moves: self.moves.into_iter().map(Into::into).collect(),
            digest_algo: STATE_DIGEST_ALGO.to_string(),
            final_digest,
        }
    }
}

// ============================================================================
// Verification
// ============================================================================

/// Why an artifact failed verification.
#[derive(Debug, Error, PartialEq)]
pub enum VerifyError {
    #[error("artifact format version {0} is not supported")]
    UnsupportedVersion(u32),

    #[error("artifact digest algorithm is `{actual}`, this build verifies `{expected}`")]
    DigestAlgoMismatch { expected: String, actual: String },

    #[error("artifact is missing its vehicle parameters")]
    MissingParameters,

    #[error("artifact is missing its initial state")]
    MissingInitialState,

    #[error("artifact state is malformed: {0}")]
    State(#[from] WireError),

    #[error("re-simulated digest {actual:#018x} does not match recorded {expected:#018x}")]
    DigestMismatch { expected: u64, actual: u64 },
}

/// Re-simulate an artifact and compare final digests.
///
/// Success means the move log, re-run through the current build's motion
/// model in the given collision world, reproduces the recorded outcome
/// bit-for-bit.
pub fn verify(
    artifact: &ReplayArtifactProto,
    collision: &impl SweepQuery,
) -> Result<(), VerifyError> {
    if artifact.format_version != REPLAY_FORMAT_VERSION {
        return Err(VerifyError::UnsupportedVersion(artifact.format_version));
    }
    if artifact.digest_algo != STATE_DIGEST_ALGO {
        return Err(VerifyError::DigestAlgoMismatch {
            expected: STATE_DIGEST_ALGO.to_string(),
            actual: artifact.digest_algo.clone(),
        });
    }

    let parameters: VehicleParameters = artifact
        .parameters
        .clone()
        .ok_or(VerifyError::MissingParameters)?
        .into();
    let mut state: VehicleState = artifact
        .initial_state
        .clone()
        .ok_or(VerifyError::MissingInitialState)?
        .try_into()?;

    for proto in &artifact.moves {
        let mv: MoveCommand = proto.clone().into();
        state = simulate_move(&state, &mv, &parameters, collision);
    }

    let actual = state_digest(&state);
    if actual != artifact.final_digest {
        return Err(VerifyError::DigestMismatch {
            expected: artifact.final_digest,
            actual,
        });
    }

    Ok(())
}

// ============================================================================
// Artifact Files
// ============================================================================

/// Failure to move an artifact through the filesystem.
#[derive(Debug, Error)]
pub enum ArtifactIoError {
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("artifact bytes did not decode: {0}")]
    Decode(#[from] prost::DecodeError),
}

/// Write an artifact; returns the SHA-256 of the written bytes as lowercase
/// hex, for external integrity tracking.
pub fn save_artifact(
    artifact: &ReplayArtifactProto,
    path: &Path,
) -> Result<String, ArtifactIoError> {
    let bytes = artifact.encode_to_vec();
    fs::write(path, &bytes)?;
    Ok(hex_sha256(&bytes))
}

/// Read an artifact back; returns it with the SHA-256 of the on-disk bytes
/// so callers can compare against the hash recorded at save time.
pub fn load_artifact(path: &Path) -> Result<(ReplayArtifactProto, String), ArtifactIoError> {
    let bytes = fs::read(path)?;
    let artifact = ReplayArtifactProto::decode(bytes.as_slice())?;
    Ok((artifact, hex_sha256(&bytes)))
}

fn hex_sha256(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use slipstream_sim::NoObstacles;

    /// Drive a session through the recorder and return its artifact.
    fn recorded_session() -> ReplayArtifactProto {
        let parameters = VehicleParameters::default();
        let initial = VehicleState::AT_REST;
        let mut recorder = MoveRecorder::new(parameters, initial);

        let mut state = initial;
        let mut clock = 0.0;
        for i in 0..50 {
            clock += 1.0 / 60.0;
            let mv = MoveCommand {
                throttle: 1.0,
                steering_throw: if i % 2 == 0 { 0.25 } else { -0.25 },
                delta_time: 1.0 / 60.0,
                timestamp: clock,
            };
            state = simulate_move(&state, &mv, &parameters, &NoObstacles);
            recorder.record_move(mv);
        }

        assert_eq!(recorder.move_count(), 50);
        recorder.finalize(state_digest(&state))
    }

    #[test]
    fn test_faithful_artifact_verifies() {
        let artifact = recorded_session();
        verify(&artifact, &NoObstacles).unwrap();
    }

    #[test]
    fn test_tampered_move_fails_the_digest() {
        let mut artifact = recorded_session();
        artifact.moves[20].throttle = 0.5;

        assert!(matches!(
            verify(&artifact, &NoObstacles),
            Err(VerifyError::DigestMismatch { .. })
        ));
    }

    #[test]
    fn test_tampered_final_digest_is_caught() {
        let mut artifact = recorded_session();
        artifact.final_digest ^= 1;

        assert!(matches!(
            verify(&artifact, &NoObstacles),
            Err(VerifyError::DigestMismatch { .. })
        ));
    }

    #[test]
    fn test_unknown_format_version_is_refused() {
        let mut artifact = recorded_session();
        artifact.format_version = 99;

        assert_eq!(
            verify(&artifact, &NoObstacles),
            Err(VerifyError::UnsupportedVersion(99))
        );
    }

    #[test]
    fn test_foreign_digest_algorithm_is_refused() {
        let mut artifact = recorded_session();
        artifact.digest_algo = "xxhash-of-someone-else".to_string();

        assert!(matches!(
            verify(&artifact, &NoObstacles),
            Err(VerifyError::DigestAlgoMismatch { .. })
        ));
    }

    #[test]
    fn test_artifact_without_initial_state_is_refused() {
        let mut artifact = recorded_session();
        artifact.initial_state = None;

        assert_eq!(
            verify(&artifact, &NoObstacles),
            Err(VerifyError::MissingInitialState)
        );
    }

    #[test]
    fn test_artifact_roundtrips_through_a_file_with_a_stable_hash() {
        let artifact = recorded_session();
        let path = std::env::temp_dir().join(format!(
            "slipstream-replay-test-{}.bin",
            std::process::id()
        ));

        let saved_hash = save_artifact(&artifact, &path).unwrap();
        let (loaded, loaded_hash) = load_artifact(&path).unwrap();
        fs::remove_file(&path).unwrap();

        assert_eq!(saved_hash, loaded_hash);
        assert_eq!(loaded, artifact);
        verify(&loaded, &NoObstacles).unwrap();
    }
}
