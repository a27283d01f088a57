#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The state of a traffic light.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum LightState {
    Green,
    Yellow,
    Red,
}

impl LightState {
    /// The state that follows this one.
    pub fn next(self) -> Self {
        match self {
            LightState::Green => LightState::Yellow,
            LightState::Yellow => LightState::Red,
            LightState::Red => LightState::Green,
        }
    }
}

/// The duration of each light state, in s.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PhaseSchedule {
    pub green: f64,
    pub yellow: f64,
    pub red: f64,
}

impl PhaseSchedule {
    /// The default green time of a signalized intersection.
    pub const DEFAULT_GREEN: f64 = 10.0; // s
    /// The default yellow time of a signalized intersection.
    pub const DEFAULT_YELLOW: f64 = 2.0; // s

    /// A schedule where each of `count` lights takes its turn at green and yellow,
    /// and is red while the others have theirs.
    pub fn round_robin(count: usize, green: f64, yellow: f64) -> Self {
        Self {
            green,
            yellow,
            red: count.saturating_sub(1) as f64 * (green + yellow),
        }
    }

    /// The duration of a state.
    pub fn duration(&self, state: LightState) -> f64 {
        match state {
            LightState::Green => self.green,
            LightState::Yellow => self.yellow,
            LightState::Red => self.red,
        }
    }

    /// The length of a full cycle.
    pub fn cycle_length(&self) -> f64 {
        self.green + self.yellow + self.red
    }
}

/// A fixed-time traffic light cycling through green, yellow and red.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TrafficLight {
    /// The state durations.
    schedule: PhaseSchedule,
    /// The current state.
    state: LightState,
    /// The time until the next state change in s.
    time_to_switch: f64,
}

impl TrafficLight {
    /// Creates a light at the beginning of the given state.
    pub fn new(schedule: PhaseSchedule, state: LightState) -> Self {
        Self {
            schedule,
            state,
            time_to_switch: schedule.duration(state),
        }
    }

    /// Creates the `index`th of `count` lights sharing an intersection.
    /// Only the first light starts green; the others start red and take
    /// their turn in order.
    pub fn cycle(count: usize, index: usize, green: f64, yellow: f64) -> Self {
        let schedule = PhaseSchedule::round_robin(count, green, yellow);
        if index == 0 {
            Self::new(schedule, LightState::Green)
        } else {
            Self {
                schedule,
                state: LightState::Red,
                time_to_switch: index as f64 * (green + yellow),
            }
        }
    }

    /// Advances the light by `dt` seconds, carrying any overshoot into the next state.
    pub fn step(&mut self, dt: f64) {
        self.time_to_switch -= dt;
        if self.schedule.cycle_length() <= 0.0 {
            self.time_to_switch = self.time_to_switch.max(0.0);
            return;
        }
        while self.time_to_switch <= 0.0 {
            self.state = self.state.next();
            self.time_to_switch += self.schedule.duration(self.state);
        }
    }

    /// The current state.
    pub fn state(&self) -> LightState {
        self.state
    }

    /// The time until the next state change in s.
    pub fn time_to_switch(&self) -> f64 {
        self.time_to_switch
    }

    /// The schedule of the light.
    pub fn schedule(&self) -> &PhaseSchedule {
        &self.schedule
    }

    /// Whether a vehicle `distance` metres short of the stop line, travelling at
    /// `velocity`, must stop. Vehicles too close to stop safely may go through on yellow.
    pub fn must_stop(&self, distance: f64, velocity: f64, max_safe_stopping_time: f64) -> bool {
        match self.state {
            LightState::Green => false,
            LightState::Red => true,
            LightState::Yellow => velocity <= 0.0 || distance / velocity >= max_safe_stopping_time,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn cycles_through_states() {
        let schedule = PhaseSchedule::round_robin(2, 10.0, 2.0);
        let mut light = TrafficLight::new(schedule, LightState::Green);
        light.step(9.0);
        assert_eq!(light.state(), LightState::Green);
        light.step(1.5);
        assert_eq!(light.state(), LightState::Yellow);
        assert_approx_eq!(light.time_to_switch(), 1.5);
        light.step(2.0);
        assert_eq!(light.state(), LightState::Red);
        assert_approx_eq!(light.time_to_switch(), 11.5);
        light.step(12.0);
        assert_eq!(light.state(), LightState::Green);
        assert_approx_eq!(light.time_to_switch(), 9.5);
    }

    #[test]
    fn large_step_skips_states() {
        let schedule = PhaseSchedule::round_robin(2, 10.0, 2.0);
        let mut light = TrafficLight::new(schedule, LightState::Green);
        light.step(13.0);
        assert_eq!(light.state(), LightState::Red);
        assert_approx_eq!(light.time_to_switch(), 11.0);
    }

    #[test]
    fn intersection_takes_turns() {
        let mut lights: Vec<_> = (0..4).map(|i| TrafficLight::cycle(4, i, 10.0, 2.0)).collect();
        for t in 0..480 {
            // Sample half way between the whole seconds where states change
            if t % 10 == 5 {
                let green = lights
                    .iter()
                    .filter(|l| l.state() != LightState::Red)
                    .count();
                assert_eq!(green, 1, "at step {}", t);
                // Light k is green during [12k, 12k + 10) of each 48 s cycle
                let phase = (t as f64 * 0.1) % 48.0;
                let active = (phase / 12.0) as usize;
                let state = lights[active].state();
                if phase % 12.0 < 10.0 {
                    assert_eq!(state, LightState::Green);
                } else {
                    assert_eq!(state, LightState::Yellow);
                }
            }
            lights.iter_mut().for_each(|l| l.step(0.1));
        }
    }

    #[test]
    fn single_light_never_red() {
        let mut light = TrafficLight::cycle(1, 0, 5.0, 1.0);
        for _ in 0..100 {
            assert_ne!(light.state(), LightState::Red);
            light.step(0.25);
        }
    }

    #[test]
    fn yellow_dilemma_zone() {
        let schedule = PhaseSchedule::round_robin(2, 10.0, 2.0);
        let mut light = TrafficLight::new(schedule, LightState::Yellow);
        assert!(!light.must_stop(10.0, 10.0, 1.5));
        assert!(light.must_stop(30.0, 10.0, 1.5));
        assert!(light.must_stop(1.0, 0.0, 1.5));
        light.step(2.0);
        assert!(light.must_stop(1.0, 20.0, 1.5));
    }
}
