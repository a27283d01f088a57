//! Turn classification and the right-of-way geometry of intersections.

use crate::network::{Intersection, LaneId};
use crate::{CarId, SegmentId};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The manoeuvre a vehicle makes through an intersection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum TurnType {
    Straight,
    UTurn,
    RightTurn,
    LeftTurn,
    /// The intersection has too many arms to classify the turn.
    /// Always treated as conflicting.
    Unclassified,
}

impl TurnType {
    /// All turn types, in table order.
    pub const ALL: [TurnType; 5] = [
        TurnType::Straight,
        TurnType::UTurn,
        TurnType::RightTurn,
        TurnType::LeftTurn,
        TurnType::Unclassified,
    ];

    fn index(self) -> usize {
        match self {
            TurnType::Straight => 0,
            TurnType::UTurn => 1,
            TurnType::RightTurn => 2,
            TurnType::LeftTurn => 3,
            TurnType::Unclassified => 4,
        }
    }
}

/// Classifies the turn from segment `from` to segment `to` at the intersection.
pub fn classify_turn(intersection: &Intersection, from: SegmentId, to: SegmentId) -> TurnType {
    let count = intersection.intersecting_street_count();
    if count == 1 || from == to {
        return TurnType::UTurn;
    }
    if count == 2 {
        return TurnType::Straight;
    }
    if count > 4 {
        return TurnType::Unclassified;
    }

    let (Some(from_pos), Some(to_pos)) = (
        intersection.relative_position(from),
        intersection.relative_position(to),
    ) else {
        debug_assert!(false, "turning via a segment that is not part of the intersection");
        log::error!("cannot classify turn through {:?}", intersection.id());
        return TurnType::Unclassified;
    };

    match to_pos as isize - from_pos as isize {
        1 | -3 => TurnType::RightTurn,
        -1 | 3 => TurnType::LeftTurn,
        delta => {
            debug_assert!(delta.abs() == 2, "turning from {} to {}", from_pos, to_pos);
            TurnType::Straight
        }
    }
}

const X: bool = true;
const O: bool = false;

/// Whether two turns conflict, indexed by angular distance between the approaches,
/// then by the two turn types in [TurnType::ALL] order.
#[rustfmt::skip]
static CONFLICTS: [[[bool; 5]; 5]; 4] = [
    // Same approach: vehicles queue behind each other instead.
    [
        [O, O, O, O, O],
        [O, O, O, O, O],
        [O, O, O, O, O],
        [O, O, O, O, O],
        [O, O, O, O, O],
    ],
    // Adjacent approach.
    //   S  U  R  L  ?
    [
        [X, X, X, X, X], // S
        [X, X, X, X, X], // U
        [X, X, O, X, X], // R
        [X, X, X, X, X], // L
        [X, X, X, X, X], // ?
    ],
    // Opposite approach.
    //   S  U  R  L  ?
    [
        [O, X, O, X, X], // S
        [X, X, O, X, X], // U
        [O, O, O, X, X], // R
        [X, X, X, X, X], // L
        [X, X, X, X, X], // ?
    ],
    // Adjacent approach, the other way around.
    //   S  U  R  L  ?
    [
        [X, X, X, X, X], // S
        [X, X, X, X, X], // U
        [X, X, O, X, X], // R
        [X, X, X, X, X], // L
        [X, X, X, X, X], // ?
    ],
];

/// Determines whether a vehicle approaching from slot `pos_a` and making `turn_a`
/// may cross at the same time as one from slot `pos_b` making `turn_b`.
pub fn conflicts(pos_a: usize, pos_b: usize, turn_a: TurnType, turn_b: TurnType) -> bool {
    match CONFLICTS.get(pos_a.abs_diff(pos_b)) {
        Some(table) => table[turn_a.index()][turn_b.index()],
        None => true,
    }
}

/// A vehicle currently crossing an intersection.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Crossing {
    /// The crossing car.
    pub car: CarId,
    /// The lane the car came from.
    pub from: LaneId,
    /// The lane the car is heading to.
    pub to: LaneId,
    /// The slot of the segment the car came from.
    pub slot: usize,
    /// The turn the car is making.
    pub turn: TurnType,
}

/// The vehicles crossing one intersection, in the order they entered it.
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CrossingSet {
    entries: Vec<Crossing>,
}

impl CrossingSet {
    /// Registers a car as crossing.
    pub(crate) fn enter(&mut self, crossing: Crossing) {
        debug_assert!(!self.contains(crossing.car), "car is already crossing");
        self.entries.push(crossing);
    }

    /// Deregisters a crossing car.
    pub(crate) fn exit(&mut self, car: CarId) -> Option<Crossing> {
        let idx = self.entries.iter().position(|c| c.car == car)?;
        Some(self.entries.remove(idx))
    }

    /// Checks whether the car is crossing.
    pub fn contains(&self, car: CarId) -> bool {
        self.entries.iter().any(|c| c.car == car)
    }

    /// The number of crossing cars.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no car is crossing.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns an iterator over the crossing cars in entry order.
    pub fn iter(&self) -> impl Iterator<Item = &Crossing> {
        self.entries.iter()
    }

    /// The most recently entered car on the movement from `from` to `to`,
    /// optionally only considering cars that entered before `before`.
    pub(crate) fn last_on_movement(
        &self,
        from: SegmentId,
        to: LaneId,
        before: Option<CarId>,
    ) -> Option<&Crossing> {
        let end = before
            .and_then(|car| self.entries.iter().position(|c| c.car == car))
            .unwrap_or(self.entries.len());
        self.entries[..end]
            .iter()
            .rev()
            .find(|c| c.from.segment == from && c.to == to)
    }
}
