#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Tolerance when comparing accumulated time against the update interval.
const TIME_EPSILON: f64 = 1e-9; // s

/// The work a simulation tick has to do, in the order it must be done.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Callback {
    /// Recompute the acceleration and velocity of every car.
    RecomputeVelocities,
    /// Move every vehicle along its route.
    AdvancePositions,
}

/// Drives the two timescales of the simulation: positions advance every tick,
/// while velocities are only recomputed at a fixed interval.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Clock {
    /// The velocity update interval in s.
    interval: f64,
    /// The time since velocities were last recomputed in s.
    since_update: f64,
    /// The simulated time in s.
    time: f64,
    /// The number of ticks so far.
    frame: usize,
}

impl Clock {
    /// Creates a clock whose first tick recomputes velocities.
    pub fn new(interval: f64) -> Self {
        Self {
            interval,
            since_update: interval,
            time: 0.0,
            frame: 0,
        }
    }

    /// Advances the clock by `dt` seconds and returns the callbacks due this tick.
    pub fn tick(&mut self, dt: f64) -> SmallVec<[Callback; 2]> {
        let mut callbacks = SmallVec::new();
        self.since_update += dt;
        if self.since_update + TIME_EPSILON >= self.interval {
            self.since_update = 0.0;
            callbacks.push(Callback::RecomputeVelocities);
        }
        callbacks.push(Callback::AdvancePositions);
        self.time += dt;
        self.frame += 1;
        callbacks
    }

    /// The velocity update interval in s.
    pub fn interval(&self) -> f64 {
        self.interval
    }

    /// The simulated time in s.
    pub fn time(&self) -> f64 {
        self.time
    }

    /// The number of ticks so far.
    pub fn frame(&self) -> usize {
        self.frame
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn first_tick_recomputes() {
        let mut clock = Clock::new(0.4);
        assert_eq!(
            clock.tick(0.1).as_slice(),
            &[Callback::RecomputeVelocities, Callback::AdvancePositions]
        );
        assert_eq!(clock.tick(0.1).as_slice(), &[Callback::AdvancePositions]);
    }

    #[test]
    fn recomputes_every_interval() {
        let mut clock = Clock::new(0.4);
        let recomputes: Vec<usize> = (0..13)
            .filter(|_| clock.tick(0.1).contains(&Callback::RecomputeVelocities))
            .collect();
        assert_eq!(recomputes, vec![0, 4, 8, 12]);
        assert_eq!(clock.frame(), 13);
        assert!((clock.time() - 1.3).abs() < 1e-9);
    }

    #[test]
    fn long_ticks_always_recompute() {
        let mut clock = Clock::new(0.4);
        for _ in 0..5 {
            assert_eq!(clock.tick(1.0)[0], Callback::RecomputeVelocities);
        }
    }
}
