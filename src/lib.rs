pub use cgmath;
pub use clock::{Callback, Clock};
pub use conflict::{classify_turn, conflicts, Crossing, CrossingSet, TurnType};
pub use error::{SimError, SimResult};
pub use lane::LaneChain;
pub use light::{LightState, PhaseSchedule, TrafficLight};
pub use network::{
    CrossingPath, Direction, Intersection, IntersectionAttributes, LaneId, Network, Segment,
    SegmentAttributes, SegmentEnd,
};
pub use params::SimulationParams;
pub use planner::{Planner, ShortestPathPlanner};
pub use route::{PathStep, RouteCursor};
pub use simulation::Simulation;
use slotmap::{new_key_type, SlotMap};
pub use slotmap::{Key, KeyData};
pub use util::Interval;
pub use vehicle::{Activity, CarLocation, DrivingCar, NextTurn, Vehicle, VehicleAttributes};

mod clock;
mod conflict;
mod error;
mod lane;
mod light;
pub mod math;
mod network;
mod params;
mod planner;
mod route;
mod simulation;
mod util;
mod vehicle;

new_key_type! {
    /// Unique ID of a [Segment].
    pub struct SegmentId;
    /// Unique ID of an [Intersection].
    pub struct IntersectionId;
    /// Unique ID of a [Vehicle].
    pub struct VehicleId;
    /// Unique ID of a [DrivingCar], the live state of a vehicle on the road.
    pub struct CarId;
    /// Unique ID of a [TrafficLight].
    pub struct TrafficLightId;
}

type VehicleSet = SlotMap<VehicleId, Vehicle>;
type CarSet = SlotMap<CarId, DrivingCar>;
