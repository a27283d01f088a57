//! Route planning over the street graph.

use crate::network::{Direction, Network};
use crate::route::PathStep;
use crate::SegmentId;
use itertools::Itertools;
use pathfinding::directed::dijkstra::dijkstra;

/// Produces the steps a vehicle follows to drive between two segments.
pub trait Planner {
    /// Plans a route that starts by driving along `from` in `direction`
    /// and ends by driving along `to`. Returns `None` if `to` is unreachable.
    fn plan(
        &self,
        network: &Network,
        from: SegmentId,
        direction: Direction,
        to: SegmentId,
    ) -> Option<Vec<PathStep>>;
}

/// Plans the quickest route assuming every segment is driven at its speed limit.
#[derive(Clone, Copy, Debug, Default)]
pub struct ShortestPathPlanner;

impl Planner for ShortestPathPlanner {
    fn plan(
        &self,
        network: &Network,
        from: SegmentId,
        direction: Direction,
        to: SegmentId,
    ) -> Option<Vec<PathStep>> {
        if !network.segment(from)?.allows(direction) {
            return None;
        }
        network.segment(to)?;

        let (path, _) = dijkstra(
            &(from, direction),
            |&(seg, dir)| successors(network, seg, dir),
            |&(seg, _)| seg == to,
        )?;

        let mut steps = Vec::with_capacity(2 * path.len());
        for ((seg, dir), (next, _)) in path.iter().copied().tuple_windows() {
            steps.push(drive(seg, dir));
            steps.push(PathStep::Turn {
                intersection: network.segment(seg)?.destination(dir),
                from: seg,
                to: next,
            });
        }
        let (seg, dir) = *path.last()?;
        steps.push(drive(seg, dir));
        Some(steps)
    }
}

fn drive(segment: SegmentId, direction: Direction) -> PathStep {
    PathStep::Drive {
        segment,
        direction,
        lane: None,
    }
}

/// The (segment, direction) pairs reachable by crossing the intersection at the
/// end of a segment, with the time in tenths of a second to drive them.
/// U-turns are only made at dead ends.
fn successors(
    network: &Network,
    seg_id: SegmentId,
    dir: Direction,
) -> Vec<((SegmentId, Direction), usize)> {
    let Some(intersection) = network
        .segment(seg_id)
        .and_then(|seg| network.intersection(seg.destination(dir)))
    else {
        return vec![];
    };
    let dead_end = intersection.intersecting_street_count() == 1;

    intersection
        .streets()
        .iter()
        .filter(|id| dead_end || **id != seg_id)
        .flat_map(|id| {
            let seg = network.segment(*id)?;
            let out_dir = seg.direction_from(intersection.id())?;
            let cost = (10. * seg.length() / f64::max(seg.speed_limit(), 0.1)) as usize;
            Some(((*id, out_dir), cost))
        })
        .collect()
}
