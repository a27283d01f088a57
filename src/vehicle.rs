pub(crate) use self::acceleration::{ballistic_update, Gap, MAX_DECEL};
use self::acceleration::{AccelerationModel, ModelParams};
use crate::conflict::TurnType;
use crate::math::Point2d;
use crate::network::{CrossingPath, LaneId};
use crate::route::RouteCursor;
use crate::{CarId, IntersectionId, SegmentId, TrafficLightId, VehicleId};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

mod acceleration;

/// The attributes of a simulated vehicle.
#[derive(Clone, Copy, Debug)]
pub struct VehicleAttributes {
    /// The vehicle length in m.
    pub length: f64,
    /// The fastest the vehicle will ever travel, in m/s.
    pub max_vel: f64,
    /// The maximum acceleration of the vehicle, in m/s^2.
    pub max_acc: f64,
    /// The comfortable deceleration of the vehicle, a positive number in m/s^2.
    pub comf_dec: f64,
    /// The desired time gap to the vehicle ahead, in s.
    pub time_headway: f64,
}

impl Default for VehicleAttributes {
    fn default() -> Self {
        Self {
            length: 4.5,
            max_vel: 33.3,
            max_acc: 1.5,
            comf_dec: 2.0,
            time_headway: 1.5,
        }
    }
}

/// A simulated vehicle. It persists across routes; while it is on the road
/// it is represented by a [DrivingCar].
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Vehicle {
    /// The vehicle's ID
    pub(crate) id: VehicleId,
    /// The vehicle length in m.
    length: f64,
    /// The fastest the vehicle will ever travel, in m/s.
    max_vel: f64,
    /// The acceleration model
    pub(crate) acc: AccelerationModel,
    /// What the vehicle is currently doing.
    pub(crate) activity: Activity,
    /// The route being followed, if any.
    pub(crate) route: Option<RouteCursor>,
    /// Whether the vehicle is held in place.
    pub(crate) frozen: bool,
    /// The number of routes completed.
    pub(crate) completed_routes: usize,
}

/// What a vehicle is doing.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Activity {
    /// Not following a route and not on the road.
    Idle,
    /// On the road, as the given car.
    Driving(CarId),
    /// Waiting in place.
    Waiting { remaining: f64 },
    /// Walking along a straight line.
    Walking {
        from: Point2d,
        to: Point2d,
        /// The distance walked so far in m.
        travelled: f64,
    },
    /// Riding public transport.
    Riding { remaining: f64 },
}

/// Where a car is on the network.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum CarLocation {
    /// On a lane, registered in its lane chain.
    Lane(LaneId),
    /// Crossing an intersection, registered in its crossing set.
    Crossing {
        intersection: IntersectionId,
        from: LaneId,
        to: LaneId,
        path: CrossingPath,
    },
}

/// The turn a car will make at the end of its current lane.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct NextTurn {
    /// The intersection to cross.
    pub intersection: IntersectionId,
    /// The lane the car will continue on.
    pub lane: LaneId,
    /// The kind of turn.
    pub turn: TurnType,
    /// The slot of the car's current segment at the intersection.
    pub slot: usize,
    /// The path across the intersection.
    pub path: CrossingPath,
}

/// The live state of a vehicle on the road.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DrivingCar {
    /// The car's ID.
    pub(crate) id: CarId,
    /// The vehicle being driven.
    pub(crate) vehicle: VehicleId,
    /// Half the vehicle's length in m.
    pub(crate) half_len: f64,
    /// Where the car is.
    pub(crate) location: CarLocation,
    /// The distance travelled along the current lane or crossing path, in m.
    pub(crate) dist: f64,
    /// The velocity in m/s.
    pub(crate) vel: f64,
    /// The distance along the lane at which the current drive ends, in m.
    pub(crate) end: f64,
    /// The turn at the end of the lane, if the route continues through an intersection.
    pub(crate) next: Option<NextTurn>,
    /// The traffic light the car is stopping for.
    pub(crate) light: Option<TrafficLightId>,
    /// Whether the car may not cross its stop line.
    pub(crate) must_wait: bool,
    /// The displacement to apply on the next tick, set when velocities are recomputed.
    pub(crate) pending: Option<f64>,
}

impl Vehicle {
    /// Creates a new vehicle.
    pub(crate) fn new(id: VehicleId, attributes: &VehicleAttributes) -> Self {
        Self {
            id,
            length: attributes.length,
            max_vel: attributes.max_vel,
            acc: AccelerationModel::new(&ModelParams {
                time_headway: attributes.time_headway,
                max_acceleration: attributes.max_acc,
                comf_deceleration: attributes.comf_dec,
            }),
            activity: Activity::Idle,
            route: None,
            frozen: false,
            completed_routes: 0,
        }
    }

    /// Gets the vehicle's ID.
    pub fn id(&self) -> VehicleId {
        self.id
    }

    /// The vehicle's length in m.
    pub fn length(&self) -> f64 {
        self.length
    }

    /// The fastest the vehicle will ever travel, in m/s.
    pub fn max_vel(&self) -> f64 {
        self.max_vel
    }

    /// What the vehicle is currently doing.
    pub fn activity(&self) -> &Activity {
        &self.activity
    }

    /// The car representing this vehicle on the road, if it is driving.
    pub fn car(&self) -> Option<CarId> {
        match self.activity {
            Activity::Driving(car) => Some(car),
            _ => None,
        }
    }

    /// The route being followed, if any.
    pub fn route(&self) -> Option<&RouteCursor> {
        self.route.as_ref()
    }

    /// Whether the vehicle is held in place.
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// The number of routes the vehicle has completed.
    pub fn completed_routes(&self) -> usize {
        self.completed_routes
    }

    /// The desired velocity adjustment factor.
    pub fn velocity_adjust(&self) -> f64 {
        self.acc.velocity_adjust()
    }

    /// Set the desired velocity adjustment factor.
    pub fn set_velocity_adjust(&mut self, factor: f64) {
        self.acc.set_velocity_adjust(factor);
    }

    /// Computes the acceleration of the vehicle.
    pub(crate) fn acceleration(&self, vel: f64, speed_limit: f64, gap: &Gap) -> f64 {
        let desired_vel = self.acc.desired_velocity(self.max_vel, speed_limit);
        self.acc.acceleration(vel, desired_vel, gap)
    }
}

impl DrivingCar {
    /// Creates a car for a vehicle, on a lane and at rest.
    pub(crate) fn new(id: CarId, vehicle: &Vehicle, lane: LaneId, dist: f64, end: f64) -> Self {
        Self {
            id,
            vehicle: vehicle.id,
            half_len: 0.5 * vehicle.length,
            location: CarLocation::Lane(lane),
            dist,
            vel: 0.0,
            end,
            next: None,
            light: None,
            must_wait: false,
            pending: None,
        }
    }

    /// Gets the car's ID.
    pub fn id(&self) -> CarId {
        self.id
    }

    /// The vehicle being driven.
    pub fn vehicle(&self) -> VehicleId {
        self.vehicle
    }

    /// The car's length in m.
    pub fn length(&self) -> f64 {
        2.0 * self.half_len
    }

    /// Where the car is.
    pub fn location(&self) -> &CarLocation {
        &self.location
    }

    /// The lane the car is on, unless it is crossing an intersection.
    pub fn lane(&self) -> Option<LaneId> {
        match self.location {
            CarLocation::Lane(lane) => Some(lane),
            CarLocation::Crossing { .. } => None,
        }
    }

    /// The segment the car is on, unless it is crossing an intersection.
    pub fn segment(&self) -> Option<SegmentId> {
        self.lane().map(|lane| lane.segment)
    }

    /// Whether the car is crossing an intersection.
    pub fn is_crossing(&self) -> bool {
        matches!(self.location, CarLocation::Crossing { .. })
    }

    /// The distance travelled along the current lane or crossing path, in m.
    pub fn dist(&self) -> f64 {
        self.dist
    }

    /// The velocity in m/s.
    pub fn vel(&self) -> f64 {
        self.vel
    }

    /// The turn at the end of the current lane, if any.
    pub fn next_turn(&self) -> Option<&NextTurn> {
        self.next.as_ref()
    }

    /// Whether the car may not cross its stop line.
    pub fn must_wait(&self) -> bool {
        self.must_wait
    }

    /// The traffic light the car is stopping for.
    pub fn light(&self) -> Option<TrafficLightId> {
        self.light
    }

    /// The remaining distance to the end of the current lane drive, in m.
    pub(crate) fn dist_to_end(&self) -> f64 {
        self.end - self.dist
    }
}
