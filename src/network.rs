//! The street graph the simulation drives on. It is built up front and
//! only read while the simulation runs.

use crate::math::{
    equidistant_points_along_curve, heading, rot90, sample_polyline, Point2d,
    QuadraticBezier2d, Vector2d,
};
use crate::{IntersectionId, SegmentId};
use cgmath::prelude::*;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use slotmap::SlotMap;
use smallvec::SmallVec;

/// The lateral distance between lane centre lines, in m.
const LANE_WIDTH: f64 = 3.0; // m

/// The spacing of the points sampled along intersection crossing paths, in m.
const CROSSING_SAMPLE_STEP: f64 = 0.5; // m

/// The direction of travel along a segment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Direction {
    /// From the start intersection towards the end intersection.
    Forward,
    /// From the end intersection towards the start intersection.
    Backward,
}

/// One of the two ends of a segment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SegmentEnd {
    Start,
    End,
}

/// Identifies a single lane of a segment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LaneId {
    /// The segment the lane belongs to.
    pub segment: SegmentId,
    /// The lane index, counted left to right looking along the segment's forward direction.
    pub index: u8,
}

impl LaneId {
    /// Creates a new lane ID.
    pub const fn new(segment: SegmentId, index: u8) -> Self {
        Self { segment, index }
    }
}

/// The attributes of an intersection.
#[derive(Clone, Copy, Debug)]
pub struct IntersectionAttributes {
    /// The centre of the intersection.
    pub position: Point2d,
    /// The distance from the centre to the stop lines of the adjoining segments, in m.
    pub radius: f64,
}

/// The attributes of a segment.
#[derive(Clone, Copy, Debug)]
pub struct SegmentAttributes {
    /// The intersection at the start of the segment.
    pub start: IntersectionId,
    /// The intersection at the end of the segment.
    pub end: IntersectionId,
    /// The number of lanes.
    pub lanes: u8,
    /// Whether traffic may only travel forward.
    pub one_way: bool,
    /// The speed limit in m/s.
    pub speed_limit: f64,
}

/// A point where one or more segments meet.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Intersection {
    id: IntersectionId,
    position: Point2d,
    radius: f64,
    /// The intersecting segments in anti-clockwise order.
    slots: SmallVec<[SegmentId; 4]>,
}

/// A section of road between two intersections.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Segment {
    id: SegmentId,
    start: IntersectionId,
    end: IntersectionId,
    lanes: u8,
    one_way: bool,
    speed_limit: f64,
    /// The centre line end points.
    ends: [Point2d; 2],
    /// The distance of the stop line from each end, in m.
    stop_lines: [f64; 2],
}

/// A precomputed path across an intersection, from the stop line of one lane
/// to the start of another.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CrossingPath {
    points: Vec<Point2d>,
    length: f64,
}

/// The street graph.
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Network {
    segments: SlotMap<SegmentId, Segment>,
    intersections: SlotMap<IntersectionId, Intersection>,
}

impl Network {
    /// Creates an empty network.
    pub fn new() -> Self {
        Default::default()
    }

    /// Adds an intersection to the network.
    pub fn add_intersection(&mut self, attributes: &IntersectionAttributes) -> IntersectionId {
        self.intersections.insert_with_key(|id| Intersection {
            id,
            position: attributes.position,
            radius: f64::max(attributes.radius, 0.0),
            slots: SmallVec::new(),
        })
    }

    /// Adds a segment between two existing intersections.
    ///
    /// Two-way segments get at least two lanes, one-way segments at least one.
    pub fn add_segment(&mut self, attributes: &SegmentAttributes) -> Option<SegmentId> {
        debug_assert_ne!(attributes.start, attributes.end, "segment must not be a loop");
        if attributes.start == attributes.end {
            return None;
        }
        let start = self.intersections.get(attributes.start)?;
        let end = self.intersections.get(attributes.end)?;
        let ends = [start.position, end.position];
        let stop_lines = [start.radius, end.radius];
        let min_lanes = if attributes.one_way { 1 } else { 2 };

        let id = self.segments.insert_with_key(|id| Segment {
            id,
            start: attributes.start,
            end: attributes.end,
            lanes: u8::max(attributes.lanes, min_lanes),
            one_way: attributes.one_way,
            speed_limit: attributes.speed_limit,
            ends,
            stop_lines,
        });

        for intersection_id in [attributes.start, attributes.end] {
            self.intersections[intersection_id].slots.push(id);
            self.sort_slots(intersection_id);
        }

        Some(id)
    }

    /// Gets the segment with the given ID.
    pub fn segment(&self, id: SegmentId) -> Option<&Segment> {
        self.segments.get(id)
    }

    /// Gets the intersection with the given ID.
    pub fn intersection(&self, id: IntersectionId) -> Option<&Intersection> {
        self.intersections.get(id)
    }

    /// Returns an iterator over all the segments.
    pub fn iter_segments(&self) -> impl Iterator<Item = &Segment> {
        self.segments.values()
    }

    /// Returns an iterator over all the intersections.
    pub fn iter_intersections(&self) -> impl Iterator<Item = &Intersection> {
        self.intersections.values()
    }

    /// Gets the world coordinates of a point on a lane.
    pub fn lane_point(&self, lane: LaneId, distance: f64) -> Option<Point2d> {
        self.segment(lane.segment)?.lane_point(lane.index, distance)
    }

    /// Computes the path a vehicle follows to cross an intersection
    /// from the end of the `from` lane to the start of the `to` lane.
    pub fn crossing_path(&self, from: LaneId, to: LaneId) -> Option<CrossingPath> {
        let from_seg = self.segment(from.segment)?;
        let to_seg = self.segment(to.segment)?;

        let start = from_seg.lane_point(from.index, from_seg.lane_length())?;
        let end = to_seg.lane_point(to.index, 0.0)?;
        let start_dir = from_seg.lane_tangent(from.index)?;
        let end_dir = to_seg.lane_tangent(to.index)?;

        // The control point is where the two lanes' centre lines meet
        let midpoint = start + 0.5 * (end - start);
        let denom = start_dir.perp_dot(end_dir);
        let control = if denom.abs() < 1e-6 {
            midpoint
        } else {
            let t = (end - start).perp_dot(end_dir) / denom;
            if t > 0.0 {
                start + t * start_dir
            } else {
                midpoint
            }
        };

        let curve = QuadraticBezier2d::new(&[start, control, end]);
        let (points, length) = equidistant_points_along_curve(&curve, CROSSING_SAMPLE_STEP);
        Some(CrossingPath { points, length })
    }

    /// Orders the segments of an intersection anti-clockwise,
    /// starting from the first segment attached to it.
    fn sort_slots(&mut self, id: IntersectionId) {
        let intersection = &self.intersections[id];
        let centre = intersection.position;
        let angle_of = |seg_id: &SegmentId| {
            let seg = &self.segments[*seg_id];
            let far_end = if seg.start == id { seg.ends[1] } else { seg.ends[0] };
            heading(far_end - centre)
        };

        let mut slots = intersection.slots.clone();
        let Some(base) = slots.first().map(|seg_id| angle_of(seg_id)) else {
            return;
        };
        let relative = |seg_id: &SegmentId| {
            let angle = angle_of(seg_id) - base;
            if angle < 0.0 {
                angle + std::f64::consts::TAU
            } else {
                angle
            }
        };
        slots[1..].sort_by(|a, b| relative(a).total_cmp(&relative(b)));
        self.intersections[id].slots = slots;
    }
}

impl Intersection {
    /// Gets the intersection's ID.
    pub fn id(&self) -> IntersectionId {
        self.id
    }

    /// Gets the centre of the intersection.
    pub fn position(&self) -> Point2d {
        self.position
    }

    /// Gets the distance from the centre to the stop lines, in m.
    pub fn radius(&self) -> f64 {
        self.radius
    }

    /// The number of segments meeting at this intersection.
    pub fn intersecting_street_count(&self) -> usize {
        self.slots.len()
    }

    /// The cyclic slot index of a segment at this intersection.
    /// Slot `p + 1` lies to the right of a vehicle arriving from slot `p`.
    pub fn relative_position(&self, segment: SegmentId) -> Option<usize> {
        self.slots.iter().position(|id| *id == segment)
    }

    /// The segment at the given slot, wrapping around.
    pub fn street_at_slot(&self, slot: usize) -> Option<SegmentId> {
        if self.slots.is_empty() {
            None
        } else {
            Some(self.slots[slot % self.slots.len()])
        }
    }

    /// The intersecting segments in slot order.
    pub fn streets(&self) -> &[SegmentId] {
        &self.slots
    }
}

impl Segment {
    /// Gets the segment's ID.
    pub fn id(&self) -> SegmentId {
        self.id
    }

    /// The intersection at the start of the segment.
    pub fn start(&self) -> IntersectionId {
        self.start
    }

    /// The intersection at the end of the segment.
    pub fn end(&self) -> IntersectionId {
        self.end
    }

    /// The number of lanes.
    pub fn lanes(&self) -> u8 {
        self.lanes
    }

    /// Whether traffic may only travel forward.
    pub fn is_one_way(&self) -> bool {
        self.one_way
    }

    /// The speed limit in m/s.
    pub fn speed_limit(&self) -> f64 {
        self.speed_limit
    }

    /// The length of the centre line between the two intersections, in m.
    pub fn length(&self) -> f64 {
        self.ends[0].distance(self.ends[1])
    }

    /// The distance of the stop line from the given end, in m.
    pub fn stop_line_offset(&self, end: SegmentEnd) -> f64 {
        match end {
            SegmentEnd::Start => self.stop_lines[0],
            SegmentEnd::End => self.stop_lines[1],
        }
    }

    /// The drivable length of each lane, between the two stop lines.
    pub fn lane_length(&self) -> f64 {
        f64::max(self.length() - self.stop_lines[0] - self.stop_lines[1], 0.0)
    }

    /// The direction of travel of a lane.
    pub fn lane_direction(&self, lane: u8) -> Option<Direction> {
        if lane >= self.lanes {
            None
        } else if self.one_way || lane >= self.lanes / 2 {
            Some(Direction::Forward)
        } else {
            Some(Direction::Backward)
        }
    }

    /// Returns an iterator over the lanes that carry traffic in the given direction.
    pub fn lanes_towards(&self, direction: Direction) -> impl Iterator<Item = u8> + '_ {
        (0..self.lanes).filter(move |lane| self.lane_direction(*lane) == Some(direction))
    }

    /// Whether traffic may travel in the given direction.
    pub fn allows(&self, direction: Direction) -> bool {
        direction == Direction::Forward || !self.one_way
    }

    /// The lane a vehicle uses when the path does not specify one:
    /// the leftmost lane when driving backward on a two-way segment,
    /// otherwise the rightmost lane.
    pub fn default_lane(&self, direction: Direction) -> u8 {
        if direction == Direction::Backward && !self.one_way {
            0
        } else {
            self.lanes - 1
        }
    }

    /// The intersection a vehicle travelling in `direction` heads towards.
    pub fn destination(&self, direction: Direction) -> IntersectionId {
        match direction {
            Direction::Forward => self.end,
            Direction::Backward => self.start,
        }
    }

    /// The direction of travel that leads towards the given intersection, if traffic may use it.
    pub fn direction_towards(&self, intersection: IntersectionId) -> Option<Direction> {
        let direction = if self.end == intersection {
            Direction::Forward
        } else if self.start == intersection {
            Direction::Backward
        } else {
            return None;
        };
        Some(direction).filter(|dir| self.allows(*dir))
    }

    /// The direction of travel that leads away from the given intersection, if traffic may use it.
    pub fn direction_from(&self, intersection: IntersectionId) -> Option<Direction> {
        let direction = if self.start == intersection {
            Direction::Forward
        } else if self.end == intersection {
            Direction::Backward
        } else {
            return None;
        };
        Some(direction).filter(|dir| self.allows(*dir))
    }

    /// A unit vector along the lane's direction of travel.
    pub fn lane_tangent(&self, lane: u8) -> Option<Vector2d> {
        let forward = (self.ends[1] - self.ends[0]).normalize();
        match self.lane_direction(lane)? {
            Direction::Forward => Some(forward),
            Direction::Backward => Some(-forward),
        }
    }

    /// The world coordinates of the point `distance` along the lane,
    /// measured from the entry stop line in the lane's direction of travel.
    pub fn lane_point(&self, lane: u8, distance: f64) -> Option<Point2d> {
        let direction = self.lane_direction(lane)?;
        let forward = (self.ends[1] - self.ends[0]).normalize();
        let right = -rot90(forward);
        let offset = (lane as f64 - 0.5 * (self.lanes as f64 - 1.0)) * LANE_WIDTH;
        let along = match direction {
            Direction::Forward => self.stop_lines[0] + distance,
            Direction::Backward => self.length() - self.stop_lines[1] - distance,
        };
        Some(self.ends[0] + along * forward + offset * right)
    }
}

impl CrossingPath {
    /// The arc length of the path in m.
    pub fn length(&self) -> f64 {
        self.length
    }

    /// The world coordinates of the point `distance` along the path.
    pub fn sample(&self, distance: f64) -> Option<Point2d> {
        sample_polyline(&self.points, CROSSING_SAMPLE_STEP, distance)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    /// A four way intersection at the origin with arms of length 100.
    fn four_way() -> (Network, IntersectionId, [SegmentId; 4]) {
        let mut net = Network::new();
        let centre = net.add_intersection(&IntersectionAttributes {
            position: Point2d::new(0.0, 0.0),
            radius: 5.0,
        });
        let arms = [(0.0, -100.0), (100.0, 0.0), (0.0, 100.0), (-100.0, 0.0)].map(|(x, y)| {
            let far = net.add_intersection(&IntersectionAttributes {
                position: Point2d::new(x, y),
                radius: 0.0,
            });
            net.add_segment(&SegmentAttributes {
                start: far,
                end: centre,
                lanes: 2,
                one_way: false,
                speed_limit: 13.9,
            })
            .unwrap()
        });
        (net, centre, arms)
    }

    #[test]
    fn slots_are_anticlockwise() {
        let (net, centre, [south, east, north, west]) = four_way();
        let int = net.intersection(centre).unwrap();
        assert_eq!(int.intersecting_street_count(), 4);
        assert_eq!(int.relative_position(south), Some(0));
        assert_eq!(int.relative_position(east), Some(1));
        assert_eq!(int.relative_position(north), Some(2));
        assert_eq!(int.relative_position(west), Some(3));
        assert_eq!(int.street_at_slot(5), Some(east));
    }

    #[test]
    fn lane_directions() {
        let (net, centre, [south, ..]) = four_way();
        let seg = net.segment(south).unwrap();
        assert_eq!(seg.lane_direction(0), Some(Direction::Backward));
        assert_eq!(seg.lane_direction(1), Some(Direction::Forward));
        assert_eq!(seg.lane_direction(2), None);
        assert_eq!(seg.default_lane(Direction::Forward), 1);
        assert_eq!(seg.default_lane(Direction::Backward), 0);
        assert_eq!(seg.direction_towards(centre), Some(Direction::Forward));
        assert_eq!(seg.direction_from(centre), Some(Direction::Backward));
    }

    #[test]
    fn lane_geometry() {
        let (net, _, [south, ..]) = four_way();
        let seg = net.segment(south).unwrap();
        assert_approx_eq!(seg.length(), 100.0);
        assert_approx_eq!(seg.lane_length(), 95.0);

        // Forward lane drives north on the east side of the centre line
        let p = seg.lane_point(1, 0.0).unwrap();
        assert_approx_eq!(p.x, 1.5);
        assert_approx_eq!(p.y, -100.0);
        let p = seg.lane_point(1, 95.0).unwrap();
        assert_approx_eq!(p.y, -5.0);

        // Backward lane drives south on the west side
        let p = seg.lane_point(0, 0.0).unwrap();
        assert_approx_eq!(p.x, -1.5);
        assert_approx_eq!(p.y, -5.0);
    }

    #[test]
    fn crossing_paths() {
        let (net, _, [south, east, north, _]) = four_way();
        let straight = net
            .crossing_path(LaneId::new(south, 1), LaneId::new(north, 0))
            .unwrap();
        assert_approx_eq!(straight.length(), 10.0, 0.05);

        let right = net
            .crossing_path(LaneId::new(south, 1), LaneId::new(east, 0))
            .unwrap();
        assert!(right.length() > 5.0 && right.length() < 10.0);
        let end = right.sample(right.length()).unwrap();
        assert_approx_eq!(end.x, 5.0, 0.01);
        assert_approx_eq!(end.y, -1.5, 0.01);
    }

    #[test]
    fn unknown_intersection_is_rejected() {
        let mut net = Network::new();
        let a = net.add_intersection(&IntersectionAttributes {
            position: Point2d::new(0.0, 0.0),
            radius: 0.0,
        });
        let missing = IntersectionId::default();
        assert!(net
            .add_segment(&SegmentAttributes {
                start: a,
                end: missing,
                lanes: 1,
                one_way: true,
                speed_limit: 10.0,
            })
            .is_none());
    }
}
