use crate::{CarId, IntersectionId, SegmentId, VehicleId};
use thiserror::Error;

/// Errors reported to callers of the [Simulation](crate::Simulation).
///
/// Anomalies that only concern a single vehicle mid-route are recovered from
/// locally and never surface here.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SimError {
    #[error("vehicle {0:?} does not exist")]
    UnknownVehicle(VehicleId),

    #[error("car {0:?} does not exist")]
    UnknownCar(CarId),

    #[error("segment {0:?} does not exist")]
    UnknownSegment(SegmentId),

    #[error("segment {segment:?} has no lane {lane}")]
    InvalidLane { segment: SegmentId, lane: u8 },

    #[error("car {0:?} is not on segment {1:?}")]
    NotOnSegment(CarId, SegmentId),

    #[error("path has no steps")]
    EmptyPath,

    #[error("vehicle {0:?} is already active")]
    VehicleBusy(VehicleId),

    #[error("vehicle {0:?} is crossing an intersection")]
    StillTurning(VehicleId),

    #[error("turn at {0:?} does not continue the preceding drive")]
    DisconnectedTurn(IntersectionId),
}

/// Shorthand result type for fallible simulation calls.
pub type SimResult<T> = Result<T, SimError>;
