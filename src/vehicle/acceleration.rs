#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The acceleration exponent of the intelligent driver model.
const DELTA: i32 = 4;

/// Net gaps are never taken to be smaller than this, in m.
const MIN_GAP_EPSILON: f64 = 0.01; // m

/// The deceleration applied to frozen vehicles, in m/s^2.
pub(crate) const MAX_DECEL: f64 = -9.0; // m/s^2

/// The acceleration model of a vehicle.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AccelerationModel {
    headway: f64,
    max_acc: f64,
    comf_dec: f64,
    vel_adj: f64,
}

/// The parameters of the acceleration model.
pub struct ModelParams {
    /// The desired gap between this and the vehicle ahead in seconds.
    pub time_headway: f64,
    /// The vehicle's maximum acceleration in m/s<sup>2</sup>.
    pub max_acceleration: f64,
    /// The comfortable decelleration in m/s<sup>2</sup>.
    pub comf_deceleration: f64,
}

/// What lies ahead of a vehicle, as seen by the acceleration model.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Gap {
    /// The bumper-to-bumper distance to the obstacle, in m.
    pub net_dist: f64,
    /// How much faster this vehicle travels than the obstacle, in m/s.
    pub approach: f64,
    /// The spacing to keep even when stationary, in m.
    pub min_spacing: f64,
}

impl Gap {
    /// An empty road of the given length.
    pub fn free(dist: f64) -> Self {
        Self {
            net_dist: dist,
            approach: 0.0,
            min_spacing: 0.0,
        }
    }

    /// A stationary obstacle, such as a stop line.
    pub fn stop(net_dist: f64, vel: f64, min_spacing: f64) -> Self {
        Self {
            net_dist,
            approach: vel,
            min_spacing,
        }
    }

    /// Picks whichever of the two gaps is nearer.
    pub fn nearest(self, other: Self) -> Self {
        if other.net_dist < self.net_dist {
            other
        } else {
            self
        }
    }
}

impl AccelerationModel {
    /// Creates a new acceleration model.
    pub fn new(params: &ModelParams) -> Self {
        AccelerationModel {
            headway: params.time_headway,
            max_acc: params.max_acceleration,
            comf_dec: params.comf_deceleration,
            vel_adj: 1.0,
        }
    }

    /// Set the desired velocity adjustment factor.
    pub fn set_velocity_adjust(&mut self, factor: f64) {
        self.vel_adj = factor;
    }

    /// The desired velocity adjustment factor.
    pub fn velocity_adjust(&self) -> f64 {
        self.vel_adj
    }

    /// The velocity the vehicle wants to travel at, given its own
    /// maximum velocity and the speed limit.
    pub fn desired_velocity(&self, max_vel: f64, speed_limit: f64) -> f64 {
        self.vel_adj * f64::min(max_vel, speed_limit)
    }

    /// The gap the vehicle wants to keep to the obstacle ahead.
    pub fn desired_gap(&self, vel: f64, gap: &Gap) -> f64 {
        let factor = 1. / (2. * (self.max_acc * self.comf_dec).sqrt());
        let dynamic = vel * self.headway + vel * gap.approach * factor;
        gap.min_spacing + f64::max(0.0, dynamic)
    }

    /// Computes an acceleration using the intelligent driver model.
    ///
    /// # Arguments
    /// * `vel` - The velocity of the simulated vehicle (m/s).
    /// * `desired_vel` - The velocity the vehicle wants to travel at (m/s).
    /// * `gap` - The obstacle ahead.
    pub fn acceleration(&self, vel: f64, desired_vel: f64, gap: &Gap) -> f64 {
        let free = if desired_vel <= 0.0 {
            1.0
        } else if vel >= desired_vel {
            vel / desired_vel
        } else {
            (vel / desired_vel).powi(DELTA)
        };
        let term = self.desired_gap(vel, gap) / f64::max(gap.net_dist, MIN_GAP_EPSILON);
        self.max_acc * (1. - free - term * term)
    }
}

/// Integrates a velocity update over one recompute interval.
///
/// The new velocity is the one reached after `interval` seconds of constant
/// acceleration. Returns it with the displacement to apply this tick. A vehicle
/// that would come to a halt within the interval stops at exactly the point
/// where its velocity reaches zero.
pub fn ballistic_update(vel: f64, acc: f64, interval: f64, dt: f64) -> (f64, f64) {
    let new_vel = vel + acc * interval;
    if new_vel < 0.0 {
        let dist = if acc < 0.0 { -0.5 * vel * vel / acc } else { 0.0 };
        (0.0, dist)
    } else {
        let dist = vel * dt + 0.5 * acc * dt * dt;
        (new_vel, f64::max(dist, 0.0))
    }
}
