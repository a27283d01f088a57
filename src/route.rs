use crate::math::Point2d;
use crate::network::Direction;
use crate::{IntersectionId, SegmentId};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A single step of a vehicle's route.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum PathStep {
    /// Drive the full length of a segment.
    Drive {
        segment: SegmentId,
        direction: Direction,
        /// The lane to use, or the segment's default lane for the direction.
        lane: Option<u8>,
    },
    /// Drive part of a segment, between two distances from the entry stop line.
    PartialDrive {
        segment: SegmentId,
        direction: Direction,
        lane: Option<u8>,
        start: f64,
        end: f64,
    },
    /// Cross an intersection from one segment to another.
    Turn {
        intersection: IntersectionId,
        from: SegmentId,
        to: SegmentId,
    },
    /// Stay put for a while.
    Wait { duration: f64 },
    /// Walk in a straight line.
    Walk { from: Point2d, to: Point2d },
    /// Ride public transport for a while.
    PublicTransit { duration: f64 },
}

impl PathStep {
    /// Whether the step is driven in a car.
    pub fn is_driving(&self) -> bool {
        matches!(
            self,
            PathStep::Drive { .. } | PathStep::PartialDrive { .. } | PathStep::Turn { .. }
        )
    }

    /// The segment, direction and lane hint of a drive step.
    pub(crate) fn drive_target(&self) -> Option<(SegmentId, Direction, Option<u8>)> {
        match *self {
            PathStep::Drive {
                segment,
                direction,
                lane,
            }
            | PathStep::PartialDrive {
                segment,
                direction,
                lane,
                ..
            } => Some((segment, direction, lane)),
            _ => None,
        }
    }
}

/// A vehicle's progress along its route.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RouteCursor {
    /// The steps of the route.
    steps: Vec<PathStep>,
    /// The index of the current step.
    index: usize,
    /// The fraction of the current step completed, between 0 and 1.
    progress: f64,
}

impl RouteCursor {
    /// Creates a cursor at the start of the route.
    pub fn new(steps: Vec<PathStep>) -> Self {
        Self {
            steps,
            index: 0,
            progress: 0.0,
        }
    }

    /// The steps of the route.
    pub fn steps(&self) -> &[PathStep] {
        &self.steps
    }

    /// The index of the current step.
    pub fn index(&self) -> usize {
        self.index
    }

    /// The fraction of the current step completed.
    pub fn progress(&self) -> f64 {
        self.progress
    }

    /// The current step, or `None` once the route is complete.
    pub fn current(&self) -> Option<&PathStep> {
        self.steps.get(self.index)
    }

    /// The step `offset` places after the current one.
    pub fn peek(&self, offset: usize) -> Option<&PathStep> {
        self.steps.get(self.index + offset)
    }

    /// Whether every step has been completed.
    pub fn is_finished(&self) -> bool {
        self.index >= self.steps.len()
    }

    /// Moves on to the next step.
    pub(crate) fn advance(&mut self) {
        self.index = usize::min(self.index + 1, self.steps.len());
        self.progress = 0.0;
    }

    pub(crate) fn set_progress(&mut self, progress: f64) {
        self.progress = progress.clamp(0.0, 1.0);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn cursor_advances_to_end() {
        let mut cursor = RouteCursor::new(vec![
            PathStep::Wait { duration: 1.0 },
            PathStep::PublicTransit { duration: 2.0 },
        ]);
        assert_eq!(cursor.current(), Some(&PathStep::Wait { duration: 1.0 }));
        assert_eq!(cursor.peek(1), Some(&PathStep::PublicTransit { duration: 2.0 }));
        cursor.set_progress(1.7);
        assert_eq!(cursor.progress(), 1.0);
        cursor.advance();
        assert_eq!(cursor.index(), 1);
        assert_eq!(cursor.progress(), 0.0);
        cursor.advance();
        cursor.advance();
        assert!(cursor.is_finished());
        assert_eq!(cursor.index(), 2);
        assert_eq!(cursor.current(), None);
    }

    #[test]
    fn driving_steps() {
        assert!(!PathStep::Wait { duration: 1.0 }.is_driving());
        assert!(!PathStep::Walk {
            from: Point2d::new(0.0, 0.0),
            to: Point2d::new(1.0, 0.0)
        }
        .is_driving());
        let drive = PathStep::Drive {
            segment: SegmentId::default(),
            direction: Direction::Forward,
            lane: Some(1),
        };
        assert!(drive.is_driving());
        assert_eq!(
            drive.drive_target(),
            Some((SegmentId::default(), Direction::Forward, Some(1)))
        );
    }
}
