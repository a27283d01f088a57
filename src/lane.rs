//! Tracks which cars occupy each lane, ordered along the direction of travel.

use crate::network::{LaneId, Network};
use crate::{CarId, CarSet, SegmentId};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use slotmap::SecondaryMap;

/// The cars on a single lane, ordered from the rearmost to the frontmost.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LaneChain {
    cars: Vec<CarId>,
}

/// The lane chains of every lane in the network.
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LaneRegistry {
    lanes: SecondaryMap<SegmentId, Vec<LaneChain>>,
}

impl LaneChain {
    /// Inserts a car before the first car that is further along the lane.
    pub(crate) fn enter(&mut self, cars: &CarSet, car: CarId) {
        debug_assert!(!self.contains(car), "car is already on the lane");
        let dist = cars[car].dist;
        let idx = self
            .cars
            .iter()
            .position(|id| cars[*id].dist > dist)
            .unwrap_or(self.cars.len());
        self.cars.insert(idx, car);
    }

    /// Removes a car, returning whether it was on the lane.
    pub(crate) fn exit(&mut self, car: CarId) -> bool {
        match self.cars.iter().position(|id| *id == car) {
            Some(idx) => {
                self.cars.remove(idx);
                true
            }
            None => false,
        }
    }

    /// Checks whether the car is on the lane.
    pub fn contains(&self, car: CarId) -> bool {
        self.cars.contains(&car)
    }

    /// The car directly ahead of the given one.
    pub fn next_ahead(&self, car: CarId) -> Option<CarId> {
        let idx = self.cars.iter().position(|id| *id == car)?;
        self.cars.get(idx + 1).copied()
    }

    /// The rearmost car, the one nearest the entry stop line.
    pub fn first(&self) -> Option<CarId> {
        self.cars.first().copied()
    }

    /// The frontmost car, the one nearest the exit stop line.
    pub fn last(&self) -> Option<CarId> {
        self.cars.last().copied()
    }

    /// Returns an iterator over the cars from rearmost to frontmost.
    pub fn iter(&self) -> impl Iterator<Item = CarId> + '_ {
        self.cars.iter().copied()
    }

    /// The number of cars on the lane.
    pub fn len(&self) -> usize {
        self.cars.len()
    }

    /// Whether the lane is empty.
    pub fn is_empty(&self) -> bool {
        self.cars.is_empty()
    }
}

impl LaneRegistry {
    /// Creates an empty chain for every lane of the network.
    pub fn new(network: &Network) -> Self {
        let mut lanes = SecondaryMap::new();
        for segment in network.iter_segments() {
            lanes.insert(
                segment.id(),
                vec![LaneChain::default(); segment.lanes() as usize],
            );
        }
        Self { lanes }
    }

    /// Gets the chain of a lane.
    pub fn chain(&self, lane: LaneId) -> Option<&LaneChain> {
        self.lanes.get(lane.segment)?.get(lane.index as usize)
    }

    /// Inserts a car into the chain of a lane, returning false if there is no such lane.
    pub(crate) fn enter(&mut self, lane: LaneId, cars: &CarSet, car: CarId) -> bool {
        match self.chain_mut(lane) {
            Some(chain) => {
                chain.enter(cars, car);
                true
            }
            None => false,
        }
    }

    /// Removes a car from the chain of a lane.
    pub(crate) fn exit(&mut self, lane: LaneId, car: CarId) -> bool {
        let removed = self.chain_mut(lane).map_or(false, |chain| chain.exit(car));
        debug_assert!(removed, "car {:?} is not on lane {:?}", car, lane);
        if !removed {
            log::error!("car {:?} is not on lane {:?}", car, lane);
        }
        removed
    }

    /// The car directly ahead of the given one on a lane.
    pub fn next_ahead(&self, lane: LaneId, car: CarId) -> Option<CarId> {
        self.chain(lane)?.next_ahead(car)
    }

    fn chain_mut(&mut self, lane: LaneId) -> Option<&mut LaneChain> {
        self.lanes.get_mut(lane.segment)?.get_mut(lane.index as usize)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::math::Point2d;
    use crate::network::{IntersectionAttributes, SegmentAttributes};
    use crate::vehicle::{DrivingCar, Vehicle, VehicleAttributes};
    use crate::VehicleId;
    use slotmap::SlotMap;

    fn setup() -> (Network, LaneId, CarSet, Vehicle) {
        let mut net = Network::new();
        let a = net.add_intersection(&IntersectionAttributes {
            position: Point2d::new(0.0, 0.0),
            radius: 0.0,
        });
        let b = net.add_intersection(&IntersectionAttributes {
            position: Point2d::new(100.0, 0.0),
            radius: 0.0,
        });
        let seg = net
            .add_segment(&SegmentAttributes {
                start: a,
                end: b,
                lanes: 1,
                one_way: true,
                speed_limit: 10.0,
            })
            .unwrap();
        let vehicle = Vehicle::new(VehicleId::default(), &VehicleAttributes::default());
        (net, LaneId::new(seg, 0), SlotMap::with_key(), vehicle)
    }

    fn add_car(cars: &mut CarSet, vehicle: &Vehicle, lane: LaneId, dist: f64) -> CarId {
        cars.insert_with_key(|id| DrivingCar::new(id, vehicle, lane, dist, 100.0))
    }

    #[test]
    fn ordered_by_distance() {
        let (net, lane, mut cars, veh) = setup();
        let mut registry = LaneRegistry::new(&net);
        let mid = add_car(&mut cars, &veh, lane, 50.0);
        let front = add_car(&mut cars, &veh, lane, 80.0);
        let rear = add_car(&mut cars, &veh, lane, 10.0);
        for car in [mid, front, rear] {
            assert!(registry.enter(lane, &cars, car));
        }

        let chain = registry.chain(lane).unwrap();
        assert_eq!(chain.iter().collect::<Vec<_>>(), vec![rear, mid, front]);
        assert_eq!(chain.first(), Some(rear));
        assert_eq!(chain.last(), Some(front));
        assert_eq!(registry.next_ahead(lane, rear), Some(mid));
        assert_eq!(registry.next_ahead(lane, front), None);
    }

    #[test]
    fn equal_distance_goes_ahead() {
        let (net, lane, mut cars, veh) = setup();
        let mut registry = LaneRegistry::new(&net);
        let a = add_car(&mut cars, &veh, lane, 20.0);
        let b = add_car(&mut cars, &veh, lane, 20.0);
        registry.enter(lane, &cars, a);
        registry.enter(lane, &cars, b);
        assert_eq!(registry.next_ahead(lane, a), Some(b));
        assert_eq!(registry.next_ahead(lane, b), None);
    }

    #[test]
    fn enter_then_exit_restores_chain() {
        let (net, lane, mut cars, veh) = setup();
        let mut registry = LaneRegistry::new(&net);
        let a = add_car(&mut cars, &veh, lane, 20.0);
        let b = add_car(&mut cars, &veh, lane, 60.0);
        registry.enter(lane, &cars, a);
        registry.enter(lane, &cars, b);
        let before = registry.chain(lane).unwrap().clone();

        let c = add_car(&mut cars, &veh, lane, 40.0);
        registry.enter(lane, &cars, c);
        assert_eq!(registry.chain(lane).unwrap().len(), 3);
        assert!(registry.exit(lane, c));
        assert_eq!(registry.chain(lane).unwrap(), &before);
    }

    #[test]
    fn unknown_lane() {
        let (net, lane, mut cars, veh) = setup();
        let mut registry = LaneRegistry::new(&net);
        let car = add_car(&mut cars, &veh, lane, 0.0);
        assert!(!registry.enter(LaneId::new(lane.segment, 3), &cars, car));
        assert!(registry.chain(LaneId::new(lane.segment, 3)).is_none());
    }
}
