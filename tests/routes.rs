//! Tests of vehicles following multi-step routes.

mod common;

use assert_approx_eq::assert_approx_eq;
use common::{four_way, run, straight_road, through};
use street_sim::math::Point2d;
use street_sim::{
    Activity, Direction, LaneId, PathStep, Planner, ShortestPathPlanner, SimError,
    TurnType, VehicleAttributes,
};

/// Test that waiting, walking and riding steps each run their course.
#[test]
fn off_road_steps() {
    let (mut sim, _) = straight_road(100.0);
    let veh = sim.add_vehicle(&VehicleAttributes::default());
    sim.follow_path(
        veh,
        vec![
            PathStep::Wait { duration: 1.0 },
            PathStep::Walk {
                from: Point2d::new(0.0, 0.0),
                to: Point2d::new(2.8, 0.0),
            },
            PathStep::PublicTransit { duration: 1.0 },
        ],
    )
    .unwrap();
    assert_eq!(
        sim.vehicle(veh).unwrap().activity(),
        &Activity::Waiting { remaining: 1.0 }
    );
    assert!(sim.vehicle_position(veh).is_none());

    run(&mut sim, 5);
    let route = sim.vehicle(veh).unwrap().route().unwrap();
    assert_eq!(route.index(), 0);
    assert_approx_eq!(route.progress(), 0.5, 1e-6);

    let mut walked = false;
    let mut rode = false;
    for _ in 0..100 {
        sim.step(0.1);
        match *sim.vehicle(veh).unwrap().activity() {
            Activity::Waiting { .. } => assert!(!walked),
            Activity::Walking { .. } => {
                walked = true;
                let pos = sim.vehicle_position(veh).unwrap();
                assert_approx_eq!(pos.y, 0.0);
                assert!(pos.x >= 0.0 && pos.x <= 2.8);
                assert_eq!(sim.vehicle(veh).unwrap().route().unwrap().index(), 1);
            }
            Activity::Riding { .. } => {
                assert!(walked);
                rode = true;
            }
            Activity::Idle => break,
            activity => panic!("unexpected activity {:?}", activity),
        }
    }

    assert!(walked && rode);
    let vehicle = sim.vehicle(veh).unwrap();
    assert_eq!(vehicle.activity(), &Activity::Idle);
    assert!(vehicle.route().is_none());
    assert_eq!(vehicle.completed_routes(), 1);
}

/// Test that a step that cannot be performed is skipped.
#[test]
fn invalid_step_is_skipped() {
    let (mut sim, seg) = straight_road(100.0);
    let veh = sim.add_vehicle(&VehicleAttributes::default());
    sim.follow_path(
        veh,
        vec![
            PathStep::Drive {
                segment: seg,
                direction: Direction::Forward,
                lane: Some(7),
            },
            PathStep::Drive {
                segment: seg,
                direction: Direction::Backward,
                lane: None,
            },
            PathStep::Wait { duration: 1.0 },
        ],
    )
    .unwrap();

    let vehicle = sim.vehicle(veh).unwrap();
    assert_eq!(vehicle.route().unwrap().index(), 2);
    assert!(matches!(vehicle.activity(), Activity::Waiting { .. }));
    assert_eq!(sim.iter_cars().count(), 0);

    run(&mut sim, 20);
    assert_eq!(sim.vehicle(veh).unwrap().completed_routes(), 1);
}

/// Test that a route whose only step is invalid still completes.
#[test]
fn route_of_invalid_steps() {
    let (mut sim, seg) = straight_road(100.0);
    let veh = sim.add_vehicle(&VehicleAttributes::default());
    sim.follow_path(
        veh,
        vec![PathStep::Drive {
            segment: seg,
            direction: Direction::Forward,
            lane: Some(1),
        }],
    )
    .unwrap();
    let vehicle = sim.vehicle(veh).unwrap();
    assert_eq!(vehicle.activity(), &Activity::Idle);
    assert_eq!(vehicle.completed_routes(), 1);
}

#[test]
fn follow_path_errors() {
    let (mut sim, seg) = straight_road(100.0);
    let veh = sim.add_vehicle(&VehicleAttributes::default());
    assert_eq!(sim.follow_path(veh, vec![]), Err(SimError::EmptyPath));

    sim.follow_path(veh, vec![PathStep::Wait { duration: 10.0 }])
        .unwrap();
    assert_eq!(
        sim.follow_path(veh, vec![PathStep::Wait { duration: 1.0 }]),
        Err(SimError::VehicleBusy(veh))
    );
    assert_eq!(
        sim.enter_segment(veh, seg, 0, 0.0),
        Err(SimError::VehicleBusy(veh))
    );

    sim.remove_vehicle(veh).unwrap();
    assert_eq!(
        sim.follow_path(veh, vec![PathStep::Wait { duration: 1.0 }]),
        Err(SimError::UnknownVehicle(veh))
    );
    assert_eq!(sim.abort(veh), Err(SimError::UnknownVehicle(veh)));
}

/// Test that removing a driving vehicle clears it from its lane.
#[test]
fn remove_driving_vehicle() {
    let (mut sim, seg) = straight_road(100.0);
    let veh = sim.add_vehicle(&VehicleAttributes::default());
    sim.follow_path(
        veh,
        vec![PathStep::Drive {
            segment: seg,
            direction: Direction::Forward,
            lane: None,
        }],
    )
    .unwrap();
    run(&mut sim, 10);
    let car = sim.vehicle(veh).unwrap().car().unwrap();

    sim.remove_vehicle(veh).unwrap();
    assert!(sim.vehicle(veh).is_none());
    assert!(sim.car(car).is_none());
    assert!(sim.lane_cars(LaneId::new(seg, 0)).unwrap().is_empty());
    run(&mut sim, 10);
}

/// Test that a turn which does not follow on from the drive before it is skipped.
#[test]
fn disconnected_turn_is_skipped() {
    let (mut sim, arms) = four_way();
    let veh = sim.add_vehicle(&VehicleAttributes::default());
    sim.follow_path(
        veh,
        vec![
            PathStep::Turn {
                intersection: arms.centre,
                from: arms.south,
                to: arms.north,
            },
            PathStep::Drive {
                segment: arms.north,
                direction: Direction::Backward,
                lane: None,
            },
        ],
    )
    .unwrap();

    let vehicle = sim.vehicle(veh).unwrap();
    assert_eq!(vehicle.route().unwrap().index(), 1);
    let car = vehicle.car().unwrap();
    assert!(sim
        .lane_cars(LaneId::new(arms.north, 0))
        .unwrap()
        .contains(car));

    run(&mut sim, 300);
    assert_eq!(sim.vehicle(veh).unwrap().completed_routes(), 1);
}

/// Test that a drive whose turn leads elsewhere ends at the stop line,
/// and the route carries on from its next valid step.
#[test]
fn mismatched_turn_ends_drive() {
    let (mut sim, arms) = four_way();
    let veh = sim.add_vehicle(&VehicleAttributes::default());
    sim.follow_path(
        veh,
        vec![
            PathStep::Drive {
                segment: arms.south,
                direction: Direction::Forward,
                lane: None,
            },
            PathStep::Turn {
                intersection: arms.centre,
                from: arms.east,
                to: arms.north,
            },
            PathStep::Drive {
                segment: arms.north,
                direction: Direction::Backward,
                lane: None,
            },
        ],
    )
    .unwrap();
    let car = sim.vehicle(veh).unwrap().car().unwrap();
    assert!(sim.car(car).unwrap().next_turn().is_none());

    let out_lane = LaneId::new(arms.north, 0);
    let mut reached = false;
    for _ in 0..600 {
        sim.step(0.1);
        assert!(!sim.crossing(arms.centre).unwrap().contains(car));
        reached |= sim.lane_cars(out_lane).unwrap().contains(car);
    }
    assert!(reached);
    assert_eq!(sim.vehicle(veh).unwrap().completed_routes(), 1);
}

/// Test that a vehicle leaves the road when its route continues on foot.
#[test]
fn drive_then_walk() {
    let (mut sim, seg) = straight_road(50.0);
    let veh = sim.add_vehicle(&VehicleAttributes::default());
    sim.follow_path(
        veh,
        vec![
            PathStep::Drive {
                segment: seg,
                direction: Direction::Forward,
                lane: None,
            },
            PathStep::Walk {
                from: Point2d::new(50.0, 0.0),
                to: Point2d::new(60.0, 0.0),
            },
        ],
    )
    .unwrap();

    let lane = LaneId::new(seg, 0);
    let mut walked = false;
    for _ in 0..300 {
        sim.step(0.1);
        if let Activity::Walking { .. } = sim.vehicle(veh).unwrap().activity() {
            walked = true;
            assert!(sim.lane_cars(lane).unwrap().is_empty());
            assert_eq!(sim.iter_cars().count(), 0);
        }
    }
    assert!(walked);
    assert_eq!(sim.vehicle(veh).unwrap().completed_routes(), 1);
}

/// Test that a planned route can be followed to its end.
#[test]
fn planned_route_completes() {
    let (mut sim, arms) = four_way();
    let steps = ShortestPathPlanner
        .plan(sim.network(), arms.south, Direction::Forward, arms.west)
        .unwrap();
    assert_eq!(steps, through(arms.centre, arms.south, arms.west));

    let veh = sim.add_vehicle(&VehicleAttributes::default());
    sim.follow_path(veh, steps).unwrap();
    let car = sim.vehicle(veh).unwrap().car().unwrap();
    assert_eq!(
        sim.car(car).unwrap().next_turn().unwrap().turn,
        TurnType::LeftTurn
    );

    run(&mut sim, 600);
    let vehicle = sim.vehicle(veh).unwrap();
    assert_eq!(vehicle.completed_routes(), 1);
    assert_eq!(vehicle.activity(), &Activity::Idle);
}

/// Test that a partial drive starts and ends where it is told to.
#[test]
fn partial_drive() {
    let (mut sim, seg) = straight_road(200.0);
    let veh = sim.add_vehicle(&VehicleAttributes::default());
    sim.follow_path(
        veh,
        vec![PathStep::PartialDrive {
            segment: seg,
            direction: Direction::Forward,
            lane: None,
            start: 50.0,
            end: 80.0,
        }],
    )
    .unwrap();
    let car = sim.vehicle(veh).unwrap().car().unwrap();
    assert_approx_eq!(sim.car(car).unwrap().dist(), 50.0);

    let mut last = 50.0;
    for _ in 0..300 {
        sim.step(0.1);
        let Some(car) = sim.car(car) else {
            break;
        };
        assert!(car.dist() >= last);
        assert!(car.dist() < 80.0);
        last = car.dist();
    }
    assert!(sim.car(car).is_none());
    assert_eq!(sim.vehicle(veh).unwrap().completed_routes(), 1);
}
