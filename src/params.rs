#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Tunable constants of a [Simulation](crate::Simulation).
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SimulationParams {
    /// Interval between velocity recomputations in s.
    pub velocity_update_interval: f64,
    /// Distance to an intersection below which a car checks lights,
    /// right-of-way and occupancy, and adopts the next speed limit, in m.
    pub intersection_check_distance: f64,
    /// A car further than this from the intersection never claims right-of-way, in m.
    pub right_of_way_distance: f64,
    /// Minimum spacing kept before a stop line or occupied intersection, in m.
    pub intersection_min_spacing: f64,
    /// Minimum bumper-to-bumper spacing behind a leader, as a fraction of own length.
    pub car_min_spacing_factor: f64,
    /// Cars that would reach the stop line within this time go through on yellow, in s.
    pub max_safe_stopping_time: f64,
    /// Gap assumed when nothing limits a car, in m.
    pub free_road_gap: f64,
    /// Speed of walking steps in m/s.
    pub walking_speed: f64,
}

impl Default for SimulationParams {
    fn default() -> Self {
        Self {
            velocity_update_interval: 0.4,
            intersection_check_distance: 35.0,
            right_of_way_distance: 10.0,
            intersection_min_spacing: 3.5,
            car_min_spacing_factor: 0.25,
            max_safe_stopping_time: 1.5,
            free_road_gap: 1000.0,
            walking_speed: 1.4,
        }
    }
}
