//! Cubic Hermite spline over a normalized parameter.
//!
//! Built fresh on every snapshot arrival and consumed until the next one.
//! Derivatives are expressed in position units per unit of `t`; callers scale
//! velocities by the snapshot interval when constructing the spline and scale
//! back when reading a velocity estimate out of [`HermiteSpline::derivative_at`].

use glam::DVec3;

/// One interpolation segment between the last rendered pose and the newest
/// authoritative position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HermiteSpline {
    pub start_position: DVec3,
    pub target_position: DVec3,
    pub start_derivative: DVec3,
    pub target_derivative: DVec3,
}

impl HermiteSpline {
    /// A segment pinned to a single point; evaluates to `position`
    /// everywhere.
    pub fn stationary(position: DVec3) -> Self {
        Self {
            start_position: position,
            target_position: position,
            start_derivative: DVec3::ZERO,
            target_derivative: DVec3::ZERO,
        }
    }

    /// Evaluate the position at `t`.
    ///
    /// `t` normally lies in `[0, 1]`; values past 1 extrapolate along the
    /// same cubic when the next snapshot is late.
    pub fn position_at(&self, t: f64) -> DVec3 {
        let t2 = t * t;
        let t3 = t2 * t;

        let h00 = 2.0 * t3 - 3.0 * t2 + 1.0;
        let h10 = t3 - 2.0 * t2 + t;
        let h01 = -2.0 * t3 + 3.0 * t2;
        let h11 = t3 - t2;

        h00 * self.start_position
            + h10 * self.start_derivative
            + h01 * self.target_position
            + h11 * self.target_derivative
    }

    /// Analytic derivative of [`Self::position_at`] with respect to `t`.
    pub fn derivative_at(&self, t: f64) -> DVec3 {
        let t2 = t * t;

        let h00 = 6.0 * t2 - 6.0 * t;
        let h10 = 3.0 * t2 - 4.0 * t + 1.0;
        let h01 = -6.0 * t2 + 6.0 * t;
        let h11 = 3.0 * t2 - 2.0 * t;

        h00 * self.start_position
            + h10 * self.start_derivative
            + h01 * self.target_position
            + h11 * self.target_derivative
    }
}
