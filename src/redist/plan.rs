//! Route planning between distribution pairs.
//!
//! Every valid pair is a node of a small graph whose edges are the specialized redistribution
//! steps. The cheapest route is found with Dijkstra's algorithm, breaking ties by the position of
//! the pairs in [`DistPair::ALL`]. The search only depends on the two pairs, so every process
//! computes the same route and enters the same collectives.

use crate::dist::{Axis, Dist, DistPair};
use smallvec::SmallVec;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum StepKind {
    /// `X -> STAR` along the axis, an all-gather over the communicator of `X`.
    AllGather(Axis),

    /// `STAR -> X` along the axis. Local.
    Filter(Axis),

    /// `VC -> MC` or `VR -> MR` along the axis.
    PartialGather(Axis),

    /// `MC -> VC` or `MR -> VR` along the axis. Local.
    PartialFilter(Axis),

    /// `[MC,MR] -> [VC,STAR]` and its relatives. The axis is the one that becomes a vector
    /// distribution.
    Promote(Axis),

    /// Inverse of [`StepKind::Promote`].
    Demote(Axis),

    /// `VC <-> VR` along the axis, a single point-to-point exchange.
    Exchange(Axis),

    GatherToCirc,
    ScatterFromCirc,
    BroadcastCirc,
    LocalToCirc,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Step {
    pub kind: StepKind,
    pub from: DistPair,
    pub to: DistPair,
}

impl Step {
    pub fn cost(&self) -> usize {
        use StepKind::*;

        match self.kind {
            AllGather(axis) if self.from.dist(axis) == Dist::Md => 5,
            AllGather(_) => 4,
            Filter(_) => 1,
            PartialGather(_) => 3,
            PartialFilter(_) => 1,
            Promote(_) | Demote(_) => 3,
            Exchange(_) => 2,
            GatherToCirc | ScatterFromCirc => 6,
            BroadcastCirc => 4,
            LocalToCirc => 1,
        }
    }
}

pub type Route = SmallVec<[Step; 4]>;

// Pairs connected by a promotion, and the axis that becomes a vector distribution.
const PROMOTIONS: [(DistPair, DistPair, Axis); 4] = [
    (DistPair::MC_MR, DistPair::VC_STAR, Axis::Col),
    (DistPair::MR_MC, DistPair::VR_STAR, Axis::Col),
    (DistPair::MC_MR, DistPair::STAR_VR, Axis::Row),
    (DistPair::MR_MC, DistPair::STAR_VC, Axis::Row),
];

const FILTER_TARGETS: [Dist; 5] = [Dist::Mc, Dist::Mr, Dist::Vc, Dist::Vr, Dist::Md];

fn push(out: &mut SmallVec<[Step; 16]>, kind: StepKind, from: DistPair, to: Option<DistPair>) {
    if let Some(to) = to {
        out.push(Step { kind, from, to });
    }
}

/// Every step that starts at `from`, in a fixed order.
pub fn edges(from: DistPair) -> SmallVec<[Step; 16]> {
    use StepKind::*;
    let mut out = SmallVec::new();

    if from == DistPair::CIRC_CIRC {
        push(&mut out, BroadcastCirc, from, Some(DistPair::STAR_STAR));

        for &to in &DistPair::ALL {
            if to != DistPair::CIRC_CIRC && to != DistPair::STAR_STAR {
                push(&mut out, ScatterFromCirc, from, Some(to));
            }
        }

        return out;
    }

    for &axis in &[Axis::Col, Axis::Row] {
        match from.dist(axis) {
            Dist::Star => {
                for &dist in &FILTER_TARGETS {
                    push(&mut out, Filter(axis), from, from.with(axis, dist));
                }
            }
            dist => {
                push(&mut out, AllGather(axis), from, from.with(axis, Dist::Star));

                let (partial, exchange) = match dist {
                    Dist::Vc => (Some((PartialGather(axis), Dist::Mc)), Some(Dist::Vr)),
                    Dist::Vr => (Some((PartialGather(axis), Dist::Mr)), Some(Dist::Vc)),
                    Dist::Mc => (Some((PartialFilter(axis), Dist::Vc)), None),
                    Dist::Mr => (Some((PartialFilter(axis), Dist::Vr)), None),
                    _ => (None, None),
                };

                if let Some((kind, to)) = partial {
                    push(&mut out, kind, from, from.with(axis, to));
                }

                if let Some(to) = exchange {
                    push(&mut out, Exchange(axis), from, from.with(axis, to));
                }
            }
        }
    }

    for &(matrix, vector, axis) in &PROMOTIONS {
        if from == matrix {
            push(&mut out, Promote(axis), from, Some(vector));
        }

        if from == vector {
            push(&mut out, Demote(axis), from, Some(matrix));
        }
    }

    if from == DistPair::STAR_STAR {
        push(&mut out, LocalToCirc, from, Some(DistPair::CIRC_CIRC));
    } else {
        push(&mut out, GatherToCirc, from, Some(DistPair::CIRC_CIRC));
    }

    out
}

/// Cheapest sequence of steps from `from` to `to`. The route is empty if both are equal and `None`
/// if `to` cannot be reached.
pub fn route(from: DistPair, to: DistPair) -> Option<Route> {
    const N: usize = DistPair::ALL.len();
    let mut cost = [usize::MAX; N];
    let mut prev: [Option<Step>; N] = [None; N];
    let mut done = [false; N];

    cost[from.index()] = 0;

    loop {
        let current = (0..N)
            .filter(|&k| !done[k] && cost[k] != usize::MAX)
            .min_by_key(|&k| (cost[k], k))?;

        if current == to.index() {
            break;
        }

        done[current] = true;

        for step in edges(DistPair::ALL[current]) {
            let next = step.to.index();
            let c = cost[current] + step.cost();

            if c < cost[next] {
                cost[next] = c;
                prev[next] = Some(step);
            }
        }
    }

    let mut route = Route::new();
    let mut at = to.index();
    while at != from.index() {
        let step = prev[at]?;
        route.push(step);
        at = step.from.index();
    }

    route.reverse();
    Some(route)
}

pub fn route_cost(route: &[Step]) -> usize {
    route.iter().map(Step::cost).sum()
}
