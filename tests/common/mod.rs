#![allow(dead_code)]

use street_sim::math::Point2d;
use street_sim::{
    Direction, IntersectionAttributes, IntersectionId, Network, PathStep, SegmentAttributes,
    SegmentId, Simulation,
};

/// A single one-way lane of the given length.
pub fn straight_road(length: f64) -> (Simulation, SegmentId) {
    let mut net = Network::new();
    let a = net.add_intersection(&IntersectionAttributes {
        position: Point2d::new(0.0, 0.0),
        radius: 0.0,
    });
    let b = net.add_intersection(&IntersectionAttributes {
        position: Point2d::new(length, 0.0),
        radius: 0.0,
    });
    let seg = net
        .add_segment(&SegmentAttributes {
            start: a,
            end: b,
            lanes: 1,
            one_way: true,
            speed_limit: 16.66,
        })
        .unwrap();
    (Simulation::new(net), seg)
}

/// The arms of a four way intersection, in anti-clockwise order.
pub struct FourWay {
    pub centre: IntersectionId,
    pub south: SegmentId,
    pub east: SegmentId,
    pub north: SegmentId,
    pub west: SegmentId,
}

impl FourWay {
    pub fn arms(&self) -> [SegmentId; 4] {
        [self.south, self.east, self.north, self.west]
    }
}

/// A four way intersection at the origin with two-way arms 100 m long,
/// each running from its far end towards the centre.
pub fn four_way() -> (Simulation, FourWay) {
    let mut net = Network::new();
    let centre = net.add_intersection(&IntersectionAttributes {
        position: Point2d::new(0.0, 0.0),
        radius: 5.0,
    });
    let [south, east, north, west] =
        [(0.0, -100.0), (100.0, 0.0), (0.0, 100.0), (-100.0, 0.0)].map(|(x, y)| {
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
    let arms = FourWay {
        centre,
        south,
        east,
        north,
        west,
    };
    (Simulation::new(net), arms)
}

/// Drive in along one arm and out along another.
pub fn through(centre: IntersectionId, from: SegmentId, to: SegmentId) -> Vec<PathStep> {
    vec![
        PathStep::Drive {
            segment: from,
            direction: Direction::Forward,
            lane: None,
        },
        PathStep::Turn {
            intersection: centre,
            from,
            to,
        },
        PathStep::Drive {
            segment: to,
            direction: Direction::Backward,
            lane: None,
        },
    ]
}

/// Runs the simulation for `ticks` steps of 0.1 s.
pub fn run(sim: &mut Simulation, ticks: usize) {
    for _ in 0..ticks {
        sim.step(0.1);
    }
}
