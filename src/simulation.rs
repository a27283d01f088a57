use crate::clock::{Callback, Clock};
use crate::conflict::{classify_turn, conflicts, Crossing, CrossingSet};
use crate::error::{SimError, SimResult};
use crate::lane::{LaneChain, LaneRegistry};
use crate::light::{LightState, TrafficLight};
use crate::math::Point2d;
use crate::network::{Direction, Intersection, LaneId, Network, SegmentEnd};
use crate::params::SimulationParams;
use crate::route::{PathStep, RouteCursor};
use crate::util::Interval;
use crate::vehicle::{
    ballistic_update, Activity, CarLocation, DrivingCar, Gap, NextTurn, Vehicle,
    VehicleAttributes, MAX_DECEL,
};
use crate::{CarId, CarSet, IntersectionId, SegmentId, TrafficLightId, VehicleId, VehicleSet};
use cgmath::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::Distribution;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use slotmap::{SecondaryMap, SlotMap};

/// A traffic simulation.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Simulation {
    /// The street graph.
    network: Network,
    /// The tunable constants.
    params: SimulationParams,
    /// Schedules velocity updates and keeps simulated time.
    clock: Clock,
    /// The vehicles being simulated.
    vehicles: VehicleSet,
    /// The vehicles currently on the road.
    cars: CarSet,
    /// The cars on each lane.
    lanes: LaneRegistry,
    /// The cars crossing each intersection.
    crossings: SecondaryMap<IntersectionId, CrossingSet>,
    /// The traffic lights.
    lights: SlotMap<TrafficLightId, TrafficLight>,
    /// The lights controlling the start and end of each segment.
    signals: SecondaryMap<SegmentId, [Option<TrafficLightId>; 2]>,
}

/// The outcome of a velocity recomputation for one car.
struct Decision {
    acc: f64,
    wait: Option<WaitReason>,
}

/// Why a car may not cross its stop line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum WaitReason {
    Light(TrafficLightId),
    RightOfWay,
    Occupied,
}

impl Simulation {
    /// Creates a new simulation on the given network.
    pub fn new(network: Network) -> Self {
        Self::with_params(network, Default::default())
    }

    /// Creates a new simulation with custom constants.
    pub fn with_params(network: Network, params: SimulationParams) -> Self {
        let lanes = LaneRegistry::new(&network);
        let mut crossings = SecondaryMap::new();
        for intersection in network.iter_intersections() {
            crossings.insert(intersection.id(), CrossingSet::default());
        }
        Self {
            network,
            params,
            clock: Clock::new(params.velocity_update_interval),
            vehicles: Default::default(),
            cars: Default::default(),
            lanes,
            crossings,
            lights: Default::default(),
            signals: Default::default(),
        }
    }

    /// The street graph.
    pub fn network(&self) -> &Network {
        &self.network
    }

    /// The tunable constants.
    pub fn params(&self) -> &SimulationParams {
        &self.params
    }

    /// Adds a traffic light to the simulation.
    pub fn add_traffic_light(&mut self, light: TrafficLight) -> TrafficLightId {
        self.lights.insert(light)
    }

    /// Places a traffic light at one end of a segment, or removes it.
    pub fn set_segment_light(
        &mut self,
        segment: SegmentId,
        end: SegmentEnd,
        light: Option<TrafficLightId>,
    ) -> SimResult<()> {
        self.network
            .segment(segment)
            .ok_or(SimError::UnknownSegment(segment))?;
        let Some(ends) = self.signals.entry(segment).map(|e| e.or_default()) else {
            return Err(SimError::UnknownSegment(segment));
        };
        ends[end_index(end)] = light;
        Ok(())
    }

    /// Installs one light on every segment leading into the intersection,
    /// each taking its turn at green in slot order.
    pub fn signalize_intersection(
        &mut self,
        id: IntersectionId,
        green: f64,
        yellow: f64,
    ) -> Vec<TrafficLightId> {
        let Some(intersection) = self.network.intersection(id) else {
            return vec![];
        };
        let incoming: Vec<(SegmentId, SegmentEnd)> = intersection
            .streets()
            .iter()
            .filter_map(|seg_id| {
                let seg = self.network.segment(*seg_id)?;
                seg.direction_towards(id)?;
                let end = if seg.end() == id {
                    SegmentEnd::End
                } else {
                    SegmentEnd::Start
                };
                Some((*seg_id, end))
            })
            .collect();

        let count = incoming.len();
        incoming
            .into_iter()
            .enumerate()
            .map(|(idx, (seg_id, end))| {
                let light = self.add_traffic_light(TrafficLight::cycle(count, idx, green, yellow));
                if let Some(entry) = self.signals.entry(seg_id) {
                    entry.or_default()[end_index(end)] = Some(light);
                }
                light
            })
            .collect()
    }

    /// Adds a vehicle to the simulation. It starts idle, off the road.
    pub fn add_vehicle(&mut self, attributes: &VehicleAttributes) -> VehicleId {
        self.vehicles
            .insert_with_key(|id| Vehicle::new(id, attributes))
    }

    /// Removes a vehicle from the simulation, wherever it is.
    pub fn remove_vehicle(&mut self, id: VehicleId) -> SimResult<()> {
        let vehicle = self.vehicles.get(id).ok_or(SimError::UnknownVehicle(id))?;
        if let Some(car) = vehicle.car() {
            self.remove_car(car);
        }
        self.vehicles.remove(id);
        Ok(())
    }

    /// Places an idle vehicle on a lane, at rest `dist` metres from its entry stop line.
    /// The vehicle leaves the network when it reaches the end of the lane.
    pub fn enter_segment(
        &mut self,
        vehicle_id: VehicleId,
        segment: SegmentId,
        lane: u8,
        dist: f64,
    ) -> SimResult<CarId> {
        let vehicle = self
            .vehicles
            .get(vehicle_id)
            .ok_or(SimError::UnknownVehicle(vehicle_id))?;
        if vehicle.activity != Activity::Idle {
            return Err(SimError::VehicleBusy(vehicle_id));
        }
        let seg = self
            .network
            .segment(segment)
            .ok_or(SimError::UnknownSegment(segment))?;
        if lane >= seg.lanes() {
            return Err(SimError::InvalidLane { segment, lane });
        }

        let end = seg.lane_length();
        let lane = LaneId::new(segment, lane);
        let dist = dist.clamp(0.0, end);
        let car_id = self
            .cars
            .insert_with_key(|id| DrivingCar::new(id, vehicle, lane, dist, end));
        self.lanes.enter(lane, &self.cars, car_id);

        let vehicle = &mut self.vehicles[vehicle_id];
        vehicle.activity = Activity::Driving(car_id);
        vehicle.route = None;
        log::debug!("car {:?} entering segment {:?}", car_id, segment);
        Ok(car_id)
    }

    /// Takes a car off a segment, leaving its vehicle idle.
    pub fn exit_segment(&mut self, segment: SegmentId, car_id: CarId) -> SimResult<()> {
        let car = self.cars.get(car_id).ok_or(SimError::UnknownCar(car_id))?;
        if car.segment() != Some(segment) {
            return Err(SimError::NotOnSegment(car_id, segment));
        }
        let vehicle_id = car.vehicle;
        self.remove_car(car_id);
        if let Some(vehicle) = self.vehicles.get_mut(vehicle_id) {
            vehicle.activity = Activity::Idle;
            vehicle.route = None;
        }
        log::debug!("car {:?} exiting segment {:?}", car_id, segment);
        Ok(())
    }

    /// Starts an idle vehicle on a route.
    pub fn follow_path(&mut self, vehicle_id: VehicleId, steps: Vec<PathStep>) -> SimResult<()> {
        if steps.is_empty() {
            return Err(SimError::EmptyPath);
        }
        let vehicle = self
            .vehicles
            .get_mut(vehicle_id)
            .ok_or(SimError::UnknownVehicle(vehicle_id))?;
        if vehicle.activity != Activity::Idle {
            return Err(SimError::VehicleBusy(vehicle_id));
        }
        vehicle.route = Some(RouteCursor::new(steps));
        self.start_step(vehicle_id, 0.0);
        Ok(())
    }

    /// Abandons a vehicle's route and takes it off the road.
    /// Fails while the vehicle is crossing an intersection.
    pub fn abort(&mut self, vehicle_id: VehicleId) -> SimResult<()> {
        let vehicle = self
            .vehicles
            .get(vehicle_id)
            .ok_or(SimError::UnknownVehicle(vehicle_id))?;
        if let Some(car_id) = vehicle.car() {
            if self.cars.get(car_id).map_or(false, |car| car.is_crossing()) {
                return Err(SimError::StillTurning(vehicle_id));
            }
            self.remove_car(car_id);
        }
        let vehicle = &mut self.vehicles[vehicle_id];
        vehicle.activity = Activity::Idle;
        vehicle.route = None;
        log::debug!("vehicle {:?} aborted its route", vehicle_id);
        Ok(())
    }

    /// Sets a random desired velocity adjustment factor on every vehicle,
    /// drawn from a normal distribution around 1.
    pub fn randomise_velocity_adjusts(&mut self, stddev: f64, seed: u64) {
        let mut rand = StdRng::seed_from_u64(seed);
        let distr = match rand_distr::Normal::new(1.0, stddev) {
            Ok(distr) => distr,
            Err(err) => {
                log::warn!("invalid velocity adjust deviation {}: {}", stddev, err);
                return;
            }
        };
        for (_, vehicle) in &mut self.vehicles {
            let factor = distr.sample(&mut rand).clamp(0.75, 1.25);
            vehicle.set_velocity_adjust(factor);
        }
    }

    /// Freezes or unfreezes a vehicle. Frozen vehicles brake as hard as they can.
    pub fn set_vehicle_frozen(&mut self, vehicle_id: VehicleId, frozen: bool) -> SimResult<()> {
        let vehicle = self
            .vehicles
            .get_mut(vehicle_id)
            .ok_or(SimError::UnknownVehicle(vehicle_id))?;
        vehicle.frozen = frozen;
        Ok(())
    }

    /// Advances the simulation by `dt` seconds.
    pub fn step(&mut self, dt: f64) {
        self.update_lights(dt);
        for callback in self.clock.tick(dt) {
            match callback {
                Callback::RecomputeVelocities => self.recompute_velocities(dt),
                Callback::AdvancePositions => {
                    let ids: Vec<VehicleId> = self.vehicles.keys().collect();
                    for id in ids {
                        self.advance(id, dt);
                    }
                }
            }
        }
    }

    /// Moves a single vehicle along its route by `dt` seconds,
    /// using its most recently computed velocity.
    pub fn advance_vehicle(&mut self, vehicle_id: VehicleId, dt: f64) -> SimResult<()> {
        if !self.vehicles.contains_key(vehicle_id) {
            return Err(SimError::UnknownVehicle(vehicle_id));
        }
        self.advance(vehicle_id, dt);
        Ok(())
    }

    /// The simulated time in s.
    pub fn time(&self) -> f64 {
        self.clock.time()
    }

    /// The number of frames simulated so far.
    pub fn frame(&self) -> usize {
        self.clock.frame()
    }

    /// Gets a vehicle.
    pub fn vehicle(&self, vehicle_id: VehicleId) -> Option<&Vehicle> {
        self.vehicles.get(vehicle_id)
    }

    /// Returns an iterator over all the vehicles.
    pub fn iter_vehicles(&self) -> impl Iterator<Item = &Vehicle> {
        self.vehicles.values()
    }

    /// Gets a car on the road.
    pub fn car(&self, car_id: CarId) -> Option<&DrivingCar> {
        self.cars.get(car_id)
    }

    /// Returns an iterator over all the cars on the road.
    pub fn iter_cars(&self) -> impl Iterator<Item = &DrivingCar> {
        self.cars.values()
    }

    /// The velocity of a car in m/s.
    pub fn velocity(&self, car_id: CarId) -> Option<f64> {
        self.cars.get(car_id).map(|car| car.vel)
    }

    /// Whether a car may not cross its stop line.
    pub fn must_wait(&self, car_id: CarId) -> Option<bool> {
        self.cars.get(car_id).map(|car| car.must_wait)
    }

    /// The cars on a lane, from rearmost to frontmost.
    pub fn lane_cars(&self, lane: LaneId) -> Option<&LaneChain> {
        self.lanes.chain(lane)
    }

    /// The cars crossing an intersection, in the order they entered it.
    pub fn crossing(&self, id: IntersectionId) -> Option<&CrossingSet> {
        self.crossings.get(id)
    }

    /// Gets a traffic light.
    pub fn traffic_light(&self, id: TrafficLightId) -> Option<&TrafficLight> {
        self.lights.get(id)
    }

    /// Returns an iterator over all the traffic lights.
    pub fn iter_lights(&self) -> impl Iterator<Item = (TrafficLightId, &TrafficLight)> {
        self.lights.iter()
    }

    /// The state of the light at one end of a segment, if there is one.
    pub fn light_state(&self, segment: SegmentId, end: SegmentEnd) -> Option<LightState> {
        let light = self.signals.get(segment)?[end_index(end)]?;
        self.lights.get(light).map(|light| light.state())
    }

    /// The world coordinates of a vehicle, if it is driving or walking.
    pub fn vehicle_position(&self, vehicle_id: VehicleId) -> Option<Point2d> {
        match self.vehicles.get(vehicle_id)?.activity {
            Activity::Driving(car_id) => {
                let car = self.cars.get(car_id)?;
                match &car.location {
                    CarLocation::Lane(lane) => self.network.lane_point(*lane, car.dist),
                    CarLocation::Crossing { path, .. } => path.sample(car.dist),
                }
            }
            Activity::Walking { from, to, travelled } => {
                let length = from.distance(to);
                if length <= 0.0 {
                    Some(to)
                } else {
                    Some(from + (to - from) * f64::min(travelled / length, 1.0))
                }
            }
            _ => None,
        }
    }

    fn update_lights(&mut self, dt: f64) {
        for light in self.lights.values_mut() {
            light.step(dt);
        }
    }

    /// Recomputes the velocity of every car. Decisions are made against
    /// a consistent snapshot and only then applied.
    fn recompute_velocities(&mut self, dt: f64) {
        let decisions: Vec<(CarId, Decision)> = self
            .cars
            .iter()
            .map(|(id, car)| (id, self.decide(car)))
            .collect();

        let interval = self.params.velocity_update_interval;
        for (id, decision) in decisions {
            let car = &mut self.cars[id];
            let (vel, disp) = ballistic_update(car.vel, decision.acc, interval, dt);
            car.vel = vel;
            car.pending = Some(disp);
            car.must_wait = decision.wait.is_some();
            car.light = match decision.wait {
                Some(WaitReason::Light(light)) => Some(light),
                _ => None,
            };
        }
    }

    fn decide(&self, car: &DrivingCar) -> Decision {
        let wait = self.wait_reason(car);
        let Some(vehicle) = self.vehicles.get(car.vehicle) else {
            return Decision {
                acc: MAX_DECEL,
                wait,
            };
        };
        if vehicle.frozen {
            return Decision {
                acc: MAX_DECEL,
                wait,
            };
        }

        let mut gap = Gap::free(self.params.free_road_gap);
        if wait.is_some() {
            gap = Gap::stop(
                car.dist_to_end() - car.half_len,
                car.vel,
                self.params.intersection_min_spacing,
            );
        }
        if let Some((leader, ahead)) = self.leader(car) {
            gap = gap.nearest(Gap {
                net_dist: ahead - car.half_len - leader.half_len,
                approach: car.vel - leader.vel,
                min_spacing: self.params.car_min_spacing_factor * car.length(),
            });
        }

        Decision {
            acc: vehicle.acceleration(car.vel, self.speed_limit(car), &gap),
            wait,
        }
    }

    /// The speed limit a car obeys. Approaching an intersection,
    /// cars adopt the limit of the segment they turn into.
    fn speed_limit(&self, car: &DrivingCar) -> f64 {
        let segment = match (&car.location, &car.next) {
            (CarLocation::Lane(_), Some(next))
                if car.dist_to_end() <= self.params.intersection_check_distance =>
            {
                next.lane.segment
            }
            (CarLocation::Lane(lane), _) => lane.segment,
            (CarLocation::Crossing { to, .. }, _) => to.segment,
        };
        self.network
            .segment(segment)
            .map_or(0.0, |seg| seg.speed_limit())
    }

    /// Finds the car ahead, and how far ahead its centre is.
    fn leader(&self, car: &DrivingCar) -> Option<(&DrivingCar, f64)> {
        match &car.location {
            CarLocation::Lane(lane) => {
                if let Some(id) = self.lanes.next_ahead(*lane, car.id) {
                    let leader = &self.cars[id];
                    return Some((leader, leader.dist - car.dist));
                }
                let next = car.next.as_ref()?;
                let to_end = car.dist_to_end();
                if to_end > self.params.intersection_check_distance {
                    return None;
                }
                let crossing = self
                    .crossings
                    .get(next.intersection)
                    .and_then(|set| set.last_on_movement(lane.segment, next.lane, None));
                if let Some(crossing) = crossing {
                    let leader = &self.cars[crossing.car];
                    return Some((leader, to_end + leader.dist));
                }
                let leader = &self.cars[self.lanes.chain(next.lane)?.first()?];
                Some((leader, to_end + next.path.length() + leader.dist))
            }
            CarLocation::Crossing {
                intersection,
                from,
                to,
                path,
            } => {
                let crossing = self
                    .crossings
                    .get(*intersection)
                    .and_then(|set| set.last_on_movement(from.segment, *to, Some(car.id)));
                if let Some(crossing) = crossing {
                    let leader = &self.cars[crossing.car];
                    return Some((leader, leader.dist - car.dist));
                }
                let leader = &self.cars[self.lanes.chain(*to)?.first()?];
                Some((leader, path.length() - car.dist + leader.dist))
            }
        }
    }

    /// Determines whether a car approaching an intersection must stop at its stop line.
    fn wait_reason(&self, car: &DrivingCar) -> Option<WaitReason> {
        let CarLocation::Lane(lane) = car.location else {
            return None;
        };
        let next = car.next.as_ref()?;
        let to_end = car.dist_to_end();
        if to_end > self.params.intersection_check_distance {
            return None;
        }
        let intersection = self.network.intersection(next.intersection)?;

        if let Some(light_id) = self.approach_light(lane.segment, next.intersection) {
            let light = &self.lights[light_id];
            if light.must_stop(to_end, car.vel, self.params.max_safe_stopping_time) {
                return Some(WaitReason::Light(light_id));
            }
        } else if !self.has_right_of_way(next, intersection) {
            return Some(WaitReason::RightOfWay);
        }

        if self.is_occupied(lane.segment, next) {
            return Some(WaitReason::Occupied);
        }
        None
    }

    /// The light facing traffic on a segment heading into an intersection.
    fn approach_light(
        &self,
        segment: SegmentId,
        intersection: IntersectionId,
    ) -> Option<TrafficLightId> {
        let seg = self.network.segment(segment)?;
        let ends = self.signals.get(segment)?;
        let light = if seg.end() == intersection {
            ends[end_index(SegmentEnd::End)]
        } else if seg.start() == intersection {
            ends[end_index(SegmentEnd::Start)]
        } else {
            None
        };
        light.filter(|id| self.lights.contains_key(*id))
    }

    /// Checks that no car approaching from the right has priority.
    /// When every approach holds a car, the one in the lowest slot goes first.
    fn has_right_of_way(&self, next: &NextTurn, intersection: &Intersection) -> bool {
        let count = intersection.intersecting_street_count();
        let right = (next.slot + 1) % count.max(1);
        if right == next.slot {
            return true;
        }
        let other_turn = match self.approaching_car(intersection, right) {
            Some(other) => match &other.next {
                Some(other_next) => other_next.turn,
                None => return true,
            },
            None => return true,
        };
        if !conflicts(next.slot, right, next.turn, other_turn) {
            return true;
        }
        next.slot == 0
            && (0..count).all(|slot| self.approaching_car(intersection, slot).is_some())
    }

    /// The car nearest the intersection on the segment in the given slot,
    /// if it is about to cross.
    fn approaching_car(&self, intersection: &Intersection, slot: usize) -> Option<&DrivingCar> {
        let seg_id = intersection.street_at_slot(slot)?;
        let seg = self.network.segment(seg_id)?;
        let dir = seg.direction_towards(intersection.id())?;
        seg.lanes_towards(dir)
            .filter_map(|lane| self.lanes.chain(LaneId::new(seg_id, lane))?.last())
            .map(|id| &self.cars[id])
            .filter(|car| {
                car.next
                    .as_ref()
                    .map_or(false, |next| next.intersection == intersection.id())
            })
            .filter(|car| car.dist_to_end() <= self.params.right_of_way_distance)
            .min_by(|a, b| a.dist_to_end().total_cmp(&b.dist_to_end()))
    }

    /// Checks whether a car from another approach is crossing on a conflicting path.
    fn is_occupied(&self, from: SegmentId, next: &NextTurn) -> bool {
        self.crossings.get(next.intersection).map_or(false, |set| {
            set.iter().any(|other| {
                other.from.segment != from
                    && conflicts(next.slot, other.slot, next.turn, other.turn)
            })
        })
    }

    fn advance(&mut self, vehicle_id: VehicleId, dt: f64) {
        let walking_speed = self.params.walking_speed;
        let Some(vehicle) = self.vehicles.get_mut(vehicle_id) else {
            return;
        };

        let activity = vehicle.activity;
        let done = match activity {
            Activity::Idle => false,
            Activity::Driving(car_id) => return self.advance_car(vehicle_id, car_id, dt),
            Activity::Waiting { remaining } | Activity::Riding { remaining } => {
                let remaining = remaining - dt;
                vehicle.activity = match vehicle.activity {
                    Activity::Waiting { .. } => Activity::Waiting { remaining },
                    _ => Activity::Riding { remaining },
                };
                if let Some(route) = &mut vehicle.route {
                    let duration = match route.current() {
                        Some(PathStep::Wait { duration }) => *duration,
                        Some(PathStep::PublicTransit { duration }) => *duration,
                        _ => 0.0,
                    };
                    if duration > 0.0 {
                        route.set_progress(1.0 - remaining / duration);
                    }
                }
                remaining <= 0.0
            }
            Activity::Walking { from, to, travelled } => {
                let travelled = travelled + walking_speed * dt;
                let length = from.distance(to);
                vehicle.activity = Activity::Walking { from, to, travelled };
                if let Some(route) = &mut vehicle.route {
                    if length > 0.0 {
                        route.set_progress(travelled / length);
                    }
                }
                travelled >= length
            }
        };

        if done {
            self.complete_step(vehicle_id, 0.0);
        }
    }

    fn advance_car(&mut self, vehicle_id: VehicleId, car_id: CarId, dt: f64) {
        let Some(car) = self.cars.get_mut(car_id) else {
            log::error!("vehicle {:?} drives missing car {:?}", vehicle_id, car_id);
            self.vehicles[vehicle_id].activity = Activity::Idle;
            return;
        };
        let mut disp = car.pending.take().unwrap_or(car.vel * dt);

        let car = &self.cars[car_id];
        // Never drive into or past the car ahead
        if let Some((_, ahead)) = self.leader(car) {
            if disp >= ahead {
                disp = 0.0;
            }
        }
        // Never cross a stop line while obliged to wait
        if car.must_wait && car.next.is_some() && disp >= car.dist_to_end() {
            disp = 0.0;
        }

        let car = &mut self.cars[car_id];
        car.dist += disp;
        let (progress, finished) = match &car.location {
            CarLocation::Lane(_) => (car.dist / car.end, car.dist >= car.end),
            CarLocation::Crossing { path, .. } => {
                (car.dist / path.length(), car.dist >= path.length())
            }
        };
        if let Some(route) = &mut self.vehicles[vehicle_id].route {
            if progress.is_finite() {
                route.set_progress(progress);
            }
        }

        if finished {
            if car.is_crossing() {
                self.finish_crossing(vehicle_id, car_id);
            } else {
                self.finish_lane(vehicle_id, car_id);
            }
        }
    }

    /// Handles a car reaching the end of its drive along a lane.
    fn finish_lane(&mut self, vehicle_id: VehicleId, car_id: CarId) {
        let car = &self.cars[car_id];
        let CarLocation::Lane(lane) = car.location else {
            return;
        };
        let Some(next) = car.next.clone() else {
            return self.complete_step(vehicle_id, 0.0);
        };

        // Check again against the latest state before committing to the crossing
        if let Some(reason) = self.wait_reason(car) {
            let car = &mut self.cars[car_id];
            car.dist = car.end;
            car.vel = 0.0;
            car.must_wait = true;
            car.light = match reason {
                WaitReason::Light(light) => Some(light),
                _ => None,
            };
            return;
        }

        let overflow = f64::max(car.dist - car.end, 0.0);
        self.lanes.exit(lane, car_id);
        match self.crossings.get_mut(next.intersection) {
            Some(set) => set.enter(Crossing {
                car: car_id,
                from: lane,
                to: next.lane,
                slot: next.slot,
                turn: next.turn,
            }),
            None => log::error!("car {:?} turning at missing {:?}", car_id, next.intersection),
        }

        let path_length = next.path.length();
        let car = &mut self.cars[car_id];
        car.location = CarLocation::Crossing {
            intersection: next.intersection,
            from: lane,
            to: next.lane,
            path: next.path,
        };
        car.dist = overflow;
        car.next = None;
        car.must_wait = false;
        car.light = None;
        if let Some(route) = &mut self.vehicles[vehicle_id].route {
            route.advance();
        }
        log::debug!(
            "car {:?} entering intersection {:?} ({:?})",
            car_id,
            next.intersection,
            next.turn
        );

        if overflow >= path_length {
            self.finish_crossing(vehicle_id, car_id);
        }
    }

    /// Handles a car reaching the end of its path across an intersection.
    fn finish_crossing(&mut self, vehicle_id: VehicleId, car_id: CarId) {
        let car = &self.cars[car_id];
        let CarLocation::Crossing {
            intersection, path, ..
        } = &car.location
        else {
            return;
        };
        let overflow = f64::max(car.dist - path.length(), 0.0);
        log::debug!("car {:?} exiting intersection {:?}", car_id, intersection);
        self.complete_step(vehicle_id, overflow);
    }

    /// Moves a vehicle on to the next step of its route, carrying `carry` metres
    /// of travel into it. Vehicles without a route leave the network.
    fn complete_step(&mut self, vehicle_id: VehicleId, carry: f64) {
        let Some(route) = self
            .vehicles
            .get_mut(vehicle_id)
            .and_then(|vehicle| vehicle.route.as_mut())
        else {
            return self.finish_route(vehicle_id);
        };
        route.advance();
        self.start_step(vehicle_id, carry);
    }

    /// Begins the current step of a vehicle's route, skipping any that cannot be performed.
    fn start_step(&mut self, vehicle_id: VehicleId, mut carry: f64) {
        loop {
            let Some(vehicle) = self.vehicles.get(vehicle_id) else {
                return;
            };
            let Some(route) = &vehicle.route else {
                return self.finish_route(vehicle_id);
            };
            let index = route.index();
            let Some(step) = route.current().cloned() else {
                return self.finish_route(vehicle_id);
            };

            let result = match step {
                PathStep::Drive { .. } | PathStep::PartialDrive { .. } => {
                    self.begin_drive(vehicle_id, &step, carry)
                }
                PathStep::Turn { intersection, .. } => {
                    Err(SimError::DisconnectedTurn(intersection))
                }
                PathStep::Wait { duration } => {
                    self.leave_road(vehicle_id, Activity::Waiting { remaining: duration });
                    Ok(())
                }
                PathStep::Walk { from, to } => {
                    let activity = Activity::Walking {
                        from,
                        to,
                        travelled: 0.0,
                    };
                    self.leave_road(vehicle_id, activity);
                    Ok(())
                }
                PathStep::PublicTransit { duration } => {
                    self.leave_road(vehicle_id, Activity::Riding { remaining: duration });
                    Ok(())
                }
            };

            match result {
                Ok(()) => return,
                Err(err) => {
                    log::warn!("vehicle {:?} skipping step {}: {}", vehicle_id, index, err);
                    if let Some(route) = &mut self.vehicles[vehicle_id].route {
                        route.advance();
                    }
                    carry = 0.0;
                }
            }
        }
    }

    /// Puts a vehicle on the lane of a drive step, reusing its car if it is already on the road.
    fn begin_drive(&mut self, vehicle_id: VehicleId, step: &PathStep, carry: f64) -> SimResult<()> {
        let Some((segment, direction, hint)) = step.drive_target() else {
            return Ok(());
        };
        let seg = self
            .network
            .segment(segment)
            .ok_or(SimError::UnknownSegment(segment))?;
        let index = hint.unwrap_or_else(|| seg.default_lane(direction));
        if seg.lane_direction(index) != Some(direction) {
            return Err(SimError::InvalidLane {
                segment,
                lane: index,
            });
        }

        let lane_length = seg.lane_length();
        let (start, end) = match *step {
            PathStep::PartialDrive { start, end, .. } => {
                let start = Interval::new(0.0, lane_length).clamp(start);
                (start, Interval::new(start, lane_length).clamp(end))
            }
            _ => (0.0, lane_length),
        };
        let dist = f64::min(start + carry, end);
        let lane = LaneId::new(segment, index);
        let next = if end >= lane_length {
            self.plan_turn(vehicle_id, lane, direction)
        } else {
            None
        };

        let existing = self.vehicles[vehicle_id].car();
        let car_id = match existing {
            Some(car_id) => {
                self.detach_car(car_id);
                car_id
            }
            None => {
                let vehicle = &self.vehicles[vehicle_id];
                self.cars
                    .insert_with_key(|id| DrivingCar::new(id, vehicle, lane, dist, end))
            }
        };

        let car = &mut self.cars[car_id];
        car.location = CarLocation::Lane(lane);
        car.dist = dist;
        car.end = end;
        car.next = next;
        car.must_wait = false;
        car.light = None;
        self.lanes.enter(lane, &self.cars, car_id);
        self.vehicles[vehicle_id].activity = Activity::Driving(car_id);
        log::debug!("car {:?} entering segment {:?}", car_id, segment);
        Ok(())
    }

    /// Works out the turn at the end of the current drive, if the route continues
    /// through the intersection at the end of the lane.
    fn plan_turn(
        &self,
        vehicle_id: VehicleId,
        lane: LaneId,
        direction: Direction,
    ) -> Option<NextTurn> {
        let route = self.vehicles.get(vehicle_id)?.route.as_ref()?;
        let PathStep::Turn {
            intersection,
            from,
            to,
        } = *route.peek(1)?
        else {
            return None;
        };
        let seg = self.network.segment(lane.segment)?;
        if from != lane.segment || seg.destination(direction) != intersection {
            return None;
        }

        let (out_segment, out_dir, hint) = route.peek(2)?.drive_target()?;
        let out_seg = self.network.segment(to)?;
        if out_segment != to || out_seg.direction_from(intersection) != Some(out_dir) {
            return None;
        }
        let out_index = hint.unwrap_or_else(|| out_seg.default_lane(out_dir));
        if out_seg.lane_direction(out_index) != Some(out_dir) {
            return None;
        }

        let int = self.network.intersection(intersection)?;
        let out_lane = LaneId::new(to, out_index);
        Some(NextTurn {
            intersection,
            lane: out_lane,
            turn: classify_turn(int, from, to),
            slot: int.relative_position(from)?,
            path: self.network.crossing_path(lane, out_lane)?,
        })
    }

    /// Takes a vehicle's car off the road, if it has one, and starts a new activity.
    fn leave_road(&mut self, vehicle_id: VehicleId, activity: Activity) {
        if let Some(car_id) = self.vehicles[vehicle_id].car() {
            self.remove_car(car_id);
        }
        self.vehicles[vehicle_id].activity = activity;
    }

    /// Ends a vehicle's route, taking it off the road.
    fn finish_route(&mut self, vehicle_id: VehicleId) {
        let Some(vehicle) = self.vehicles.get_mut(vehicle_id) else {
            return;
        };
        let car = vehicle.car();
        if vehicle.route.take().is_some() {
            vehicle.completed_routes += 1;
            log::debug!("vehicle {:?} completed its route", vehicle_id);
        }
        vehicle.activity = Activity::Idle;
        if let Some(car_id) = car {
            self.remove_car(car_id);
        }
    }

    /// Deregisters a car from its lane or intersection.
    fn detach_car(&mut self, car_id: CarId) {
        let Some(car) = self.cars.get(car_id) else {
            return;
        };
        match &car.location {
            CarLocation::Lane(lane) => {
                self.lanes.exit(*lane, car_id);
            }
            CarLocation::Crossing { intersection, .. } => {
                let exited = self
                    .crossings
                    .get_mut(*intersection)
                    .and_then(|set| set.exit(car_id));
                debug_assert!(exited.is_some(), "car {:?} is not crossing", car_id);
            }
        }
    }

    fn remove_car(&mut self, car_id: CarId) {
        self.detach_car(car_id);
        self.cars.remove(car_id);
    }
}

fn end_index(end: SegmentEnd) -> usize {
    match end {
        SegmentEnd::Start => 0,
        SegmentEnd::End => 1,
    }
}
