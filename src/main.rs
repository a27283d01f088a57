use std::time::Instant;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use street_sim::math::Point2d;
use street_sim::{
    Activity, Direction, IntersectionAttributes, Network, PathStep, PhaseSchedule, Planner,
    SegmentAttributes, SegmentId, ShortestPathPlanner, Simulation, VehicleAttributes,
};

const GRID_SIZE: usize = 8;
const BLOCK_LENGTH: f64 = 120.0; // m
const NUM_VEHICLES: usize = 400;
const NUM_FRAMES: u32 = 1000;
const NUM_BATCHES: usize = 10;
const DT: f64 = 0.05; // s

/// A square grid of two-way streets, signalized wherever four streets meet.
fn build_grid() -> (Network, Vec<SegmentId>) {
    let mut net = Network::new();
    let mut ints = vec![];
    for y in 0..GRID_SIZE {
        for x in 0..GRID_SIZE {
            ints.push(net.add_intersection(&IntersectionAttributes {
                position: Point2d::new(x as f64 * BLOCK_LENGTH, y as f64 * BLOCK_LENGTH),
                radius: 6.0,
            }));
        }
    }

    let mut segments = vec![];
    for y in 0..GRID_SIZE {
        for x in 0..GRID_SIZE {
            let here = ints[y * GRID_SIZE + x];
            let neighbours = [(x + 1, y), (x, y + 1)];
            for (nx, ny) in neighbours {
                if nx < GRID_SIZE && ny < GRID_SIZE {
                    let seg = net.add_segment(&SegmentAttributes {
                        start: here,
                        end: ints[ny * GRID_SIZE + nx],
                        lanes: 2,
                        one_way: false,
                        speed_limit: 13.9,
                    });
                    segments.extend(seg);
                }
            }
        }
    }
    (net, segments)
}

/// Plans a random trip for an idle vehicle.
fn random_trip(
    sim: &Simulation,
    segments: &[SegmentId],
    rng: &mut StdRng,
) -> Option<Vec<PathStep>> {
    let from = segments[rng.gen_range(0..segments.len())];
    let to = segments[rng.gen_range(0..segments.len())];
    let direction = if rng.gen_bool(0.5) {
        Direction::Forward
    } else {
        Direction::Backward
    };
    let mut steps = ShortestPathPlanner.plan(sim.network(), from, direction, to)?;
    // Spread vehicles out along their first segment
    if let Some(PathStep::Drive {
        segment,
        direction,
        lane,
    }) = steps.first().cloned()
    {
        steps[0] = PathStep::PartialDrive {
            segment,
            direction,
            lane,
            start: rng.gen_range(0.0..BLOCK_LENGTH),
            end: f64::INFINITY,
        };
    }
    Some(steps)
}

fn main() {
    env_logger::init();

    let (network, segments) = build_grid();
    let junctions: Vec<_> = network
        .iter_intersections()
        .filter(|int| int.intersecting_street_count() == 4)
        .map(|int| int.id())
        .collect();
    let mut sim = Simulation::new(network);
    for id in junctions {
        sim.signalize_intersection(id, PhaseSchedule::DEFAULT_GREEN, PhaseSchedule::DEFAULT_YELLOW);
    }

    let mut rng = StdRng::seed_from_u64(42);
    let vehicles: Vec<_> = (0..NUM_VEHICLES)
        .map(|_| sim.add_vehicle(&VehicleAttributes::default()))
        .collect();
    sim.randomise_velocity_adjusts(0.1, 42);

    println!("Simulating...");
    for _ in 0..NUM_BATCHES {
        let start = Instant::now();
        for _ in 0..NUM_FRAMES {
            for id in &vehicles {
                if sim.vehicle(*id).map(|veh| *veh.activity()) == Some(Activity::Idle) {
                    if let Some(steps) = random_trip(&sim, &segments, &mut rng) {
                        if let Err(err) = sim.follow_path(*id, steps) {
                            log::warn!("could not start trip: {}", err);
                        }
                    }
                }
            }
            sim.step(DT);
        }
        let frame = start.elapsed() / NUM_FRAMES;
        let completed: usize = sim.iter_vehicles().map(|veh| veh.completed_routes()).sum();
        println!(
            "Avg. frame: {:?} --> {:.0}x speedup ({} cars, {} trips completed)",
            frame,
            DT / frame.as_secs_f64(),
            sim.iter_cars().count(),
            completed,
        );
    }
}
