//! The observer role: smooth a remote vehicle's pose between snapshots.
//!
//! Observers neither own input nor hold authority. The replication channel
//! hands them a sparse stream of authoritative states (roughly one per
//! second against per-frame rendering), so the rendered pose is interpolated
//! along a Hermite spline whose endpoints and derivatives come from the last
//! rendered pose and the newest snapshot. Orientation is slerped separately
//! with the same parameter.

use glam::DQuat;
use slipstream_sim::{Seconds, ServerSnapshot, VehicleState};
use slipstream_wire::{WireError, decode_snapshot};
use tracing::trace;

use crate::spline::HermiteSpline;

/// Snapshot intervals shorter than this are treated as degenerate: the pose
/// holds instead of dividing by a near-zero duration.
const MIN_SNAPSHOT_INTERVAL: Seconds = 1e-4;

/// A remotely-driven vehicle rendered by interpolation only.
///
/// Tracks two clocks: time since the newest snapshot arrived, and the
/// duration of the interval between the two previous snapshots. The ratio of
/// the two is the spline parameter; when a snapshot is late the ratio runs
/// past 1 and the spline extrapolates until the next arrival corrects it.
#[derive(Debug)]
pub struct RemoteVehicle {
    /// The rendered pose and the velocity estimate derived from the spline.
    /// Never the authoritative state itself.
    render_state: VehicleState,
    spline: HermiteSpline,
    start_orientation: DQuat,
    target_orientation: DQuat,
    time_since_snapshot: Seconds,
    time_between_snapshots: Seconds,
}

impl RemoteVehicle {
    /// Start rendering from a spawn state; the pose holds until two
    /// snapshots have established an interval.
    pub fn new(initial: VehicleState) -> Self {
        Self {
            render_state: initial,
            spline: HermiteSpline::stationary(initial.transform.position),
            start_orientation: initial.transform.orientation,
            target_orientation: initial.transform.orientation,
            time_since_snapshot: 0.0,
            time_between_snapshots: 0.0,
        }
    }

    /// Capture a new interpolation segment from an arriving snapshot.
    ///
    /// The segment starts where the observer is currently rendering — not at
    /// the previous snapshot — so a late or lossy stream never causes a
    /// visible teleport; the spline bends from the shown pose toward the new
    /// authoritative one. Velocities become derivatives by scaling with the
    /// interval duration (positions and velocities share SI units).
    pub fn on_snapshot(&mut self, snapshot: &ServerSnapshot) {
        self.time_between_snapshots = self.time_since_snapshot;
        self.time_since_snapshot = 0.0;

        let derivative_scale = self.time_between_snapshots;
        self.spline = HermiteSpline {
            start_position: self.render_state.transform.position,
            start_derivative: self.render_state.velocity * derivative_scale,
            target_position: snapshot.state.transform.position,
            target_derivative: snapshot.state.velocity * derivative_scale,
        };
        self.start_orientation = self.render_state.transform.orientation;
        self.target_orientation = snapshot.state.transform.orientation;

        trace!(
            interval = self.time_between_snapshots,
            "captured interpolation segment"
        );
    }

    /// Decode and capture straight from a replication-channel payload.
    pub fn on_snapshot_bytes(&mut self, bytes: &[u8]) -> Result<(), WireError> {
        let snapshot = decode_snapshot(bytes)?;
        self.on_snapshot(&snapshot);
        Ok(())
    }

    /// Advance the render clock and re-evaluate the interpolated pose.
    ///
    /// With a degenerate (near-zero) snapshot interval the pose holds at its
    /// last value; there is nothing meaningful to interpolate across.
    pub fn step(&mut self, delta_time: Seconds) {
        self.time_since_snapshot += delta_time;

        if self.time_between_snapshots < MIN_SNAPSHOT_INTERVAL {
            return;
        }

        let t = self.time_since_snapshot / self.time_between_snapshots;

        self.render_state.transform.position = self.spline.position_at(t);
        self.render_state.velocity = self.spline.derivative_at(t) / self.time_between_snapshots;
        self.render_state.transform.orientation =
            self.start_orientation.slerp(self.target_orientation, t);
    }

    /// The pose to draw this frame.
    pub fn state(&self) -> &VehicleState {
        &self.render_state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{DQuat, DVec3};
    use slipstream_sim::{MoveCommand, VehicleTransform};

    fn snapshot(position: DVec3, velocity: DVec3, orientation: DQuat) -> ServerSnapshot {
        ServerSnapshot {
            state: VehicleState {
                transform: VehicleTransform {
                    position,
                    orientation,
                },
                velocity,
            },
            last_move: MoveCommand {
                throttle: 0.0,
                steering_throw: 0.0,
                delta_time: 0.1,
                timestamp: 0.0,
            },
        }
    }

    /// Observer that has received one snapshot and rendered for one second,
    /// so the next snapshot establishes a 1.0 s interval.
    fn observer_with_interval(start: VehicleState, target: ServerSnapshot) -> RemoteVehicle {
        let mut observer = RemoteVehicle::new(start);
        observer.step(1.0);
        observer.on_snapshot(&target);
        observer
    }

    #[test]
    fn test_pose_holds_until_an_interval_exists() {
        let start = VehicleState {
            transform: VehicleTransform {
                position: DVec3::new(3.0, 0.0, 0.0),
                orientation: DQuat::IDENTITY,
            },
            velocity: DVec3::X,
        };
        let mut observer = RemoteVehicle::new(start);

        observer.step(0.25);
        observer.step(0.25);

        assert_eq!(observer.state().transform.position, DVec3::new(3.0, 0.0, 0.0));
    }

    #[test]
    fn test_halfway_through_the_interval_evaluates_the_spline_at_half() {
        let start = VehicleState {
            transform: VehicleTransform {
                position: DVec3::ZERO,
                orientation: DQuat::IDENTITY,
            },
            velocity: DVec3::new(2.0, 0.0, 0.0),
        };
        let target = snapshot(DVec3::new(10.0, 0.0, 0.0), DVec3::new(4.0, 0.0, 0.0), DQuat::IDENTITY);
        let mut observer = observer_with_interval(start, target);

        observer.step(0.5);

        // Interval 1.0 s, derivatives are velocity × interval.
        let spline = HermiteSpline {
            start_position: DVec3::ZERO,
            start_derivative: DVec3::new(2.0, 0.0, 0.0),
            target_position: DVec3::new(10.0, 0.0, 0.0),
            target_derivative: DVec3::new(4.0, 0.0, 0.0),
        };
        let expected = spline.position_at(0.5);
        assert!((observer.state().transform.position - expected).length() < 1e-12);
    }

    #[test]
    fn test_reaching_the_interval_end_lands_on_the_snapshot() {
        let start = VehicleState {
            transform: VehicleTransform {
                position: DVec3::ZERO,
                orientation: DQuat::IDENTITY,
            },
            velocity: DVec3::new(2.0, 0.0, 0.0),
        };
        let target_position = DVec3::new(10.0, 5.0, 0.0);
        let target_velocity = DVec3::new(3.0, 0.0, 0.0);
        let target = snapshot(target_position, target_velocity, DQuat::IDENTITY);
        let mut observer = observer_with_interval(start, target);

        for _ in 0..10 {
            observer.step(0.1);
        }

        assert!((observer.state().transform.position - target_position).length() < 1e-9);
        // The analytic derivative at t = 1, scaled back to m/s, recovers the
        // snapshot velocity.
        assert!((observer.state().velocity - target_velocity).length() < 1e-9);
    }

    #[test]
    fn test_orientation_slerps_with_the_same_parameter() {
        let start = VehicleState::AT_REST;
        let quarter_turn = DQuat::from_axis_angle(DVec3::Z, std::f64::consts::FRAC_PI_2);
        let target = snapshot(DVec3::ZERO, DVec3::ZERO, quarter_turn);
        let mut observer = observer_with_interval(start, target);

        observer.step(0.5);

        let expected = DQuat::from_axis_angle(DVec3::Z, std::f64::consts::FRAC_PI_4);
        let rendered = observer.state().transform.orientation;
        assert!(rendered.dot(expected).abs() > 1.0 - 1e-9);
    }

    #[test]
    fn test_late_snapshot_extrapolates_past_the_target() {
        let start = VehicleState {
            transform: VehicleTransform {
                position: DVec3::ZERO,
                orientation: DQuat::IDENTITY,
            },
            velocity: DVec3::new(2.0, 0.0, 0.0),
        };
        let target = snapshot(DVec3::new(10.0, 0.0, 0.0), DVec3::new(4.0, 0.0, 0.0), DQuat::IDENTITY);
        let mut observer = observer_with_interval(start, target);

        // 1.25 s into a 1.0 s interval: t = 1.25.
        for _ in 0..5 {
            observer.step(0.25);
        }

        let position = observer.state().transform.position;
        assert!(position.is_finite());
        assert!(position.x > 10.0, "should keep moving along the derivative");
    }

    #[test]
    fn test_back_to_back_snapshots_hold_the_pose() {
        let start = VehicleState::AT_REST;
        let mut observer = RemoteVehicle::new(start);

        // Two snapshots with no render time between them: degenerate
        // interval, no division, pose unchanged.
        observer.on_snapshot(&snapshot(DVec3::new(5.0, 0.0, 0.0), DVec3::ZERO, DQuat::IDENTITY));
        observer.on_snapshot(&snapshot(DVec3::new(9.0, 0.0, 0.0), DVec3::ZERO, DQuat::IDENTITY));
        observer.step(0.1);

        let position = observer.state().transform.position;
        assert!(position.is_finite());
        assert_eq!(position, DVec3::ZERO);
    }

    #[test]
    fn test_snapshot_bytes_feed_the_interpolator() {
        let start = VehicleState::AT_REST;
        let mut observer = RemoteVehicle::new(start);
        observer.step(1.0);

        let target = snapshot(DVec3::new(4.0, 0.0, 0.0), DVec3::ZERO, DQuat::IDENTITY);
        let bytes = slipstream_wire::encode_snapshot(&target);
        observer.on_snapshot_bytes(&bytes).unwrap();

        observer.step(1.0);
        assert!((observer.state().transform.position.x - 4.0).abs() < 1e-9);
    }
}
