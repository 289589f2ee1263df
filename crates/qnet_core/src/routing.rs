//! Paths through the grid.
//!
//! A [`Route`] is a traffic entry resolved against a [`NetworkGraph`]: the
//! node sequence, the link used by every hop and the memory positions each
//! station reserves. Alice reserves the position bound to her outgoing link,
//! Bob the one bound to his incoming link, and every repeater reserves both.
//! Validation happens once, before the simulation starts.

use crate::SimError;
use crate::graph::{LinkId, NetworkGraph, NodeIndex};
use qnet_common::{Coord, defaults};
use rand::Rng;
use std::collections::HashMap;

/// Index of a route in the traffic list.
pub type PathId = usize;

/// One node of a route together with the positions it reserves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Station {
    pub node: NodeIndex,
    pub coord: Coord,
    /// Position receiving qubits from the previous node (towards Alice).
    pub left_slot: Option<usize>,
    /// Position receiving qubits from the next node (towards Bob).
    pub right_slot: Option<usize>,
}

impl Station {
    /// Reserved positions of this station.
    pub fn slots(&self) -> impl Iterator<Item = usize> + use<> {
        self.left_slot.into_iter().chain(self.right_slot)
    }
}

/// A validated path.
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    pub id: PathId,
    stations: Vec<Station>,
    /// `hops[i]` joins `stations[i]` and `stations[i + 1]`.
    hops: Vec<LinkId>,
}

impl Route {
    /// Resolves `coords` against `graph`.
    ///
    /// # Returns
    ///
    /// The route, or an error if the path is shorter than two nodes, names a
    /// node outside the graph, repeats a node, or steps between nodes that
    /// share no link.
    pub fn new(graph: &NetworkGraph, id: PathId, coords: &[Coord]) -> Result<Self, SimError> {
        if coords.len() < 2 {
            return Err(SimError::PathTooShort(coords.len()));
        }
        let nodes = coords
            .iter()
            .map(|&c| graph.node_index(c))
            .collect::<Result<Vec<_>, _>>()?;
        for (i, c) in coords.iter().enumerate() {
            if coords[..i].contains(c) {
                return Err(SimError::RepeatedNode(*c));
            }
        }

        let mut hops = Vec::with_capacity(nodes.len() - 1);
        for (pair, cpair) in nodes.windows(2).zip(coords.windows(2)) {
            let link = graph
                .link_between(pair[0], pair[1])
                .ok_or(SimError::NotAdjacent(cpair[0], cpair[1]))?;
            hops.push(link.id);
        }

        let stations = nodes
            .iter()
            .enumerate()
            .map(|(i, &node)| {
                let left_slot = i
                    .checked_sub(1)
                    .and_then(|prev| graph.link(hops[prev]).slot_at(node));
                let right_slot = hops.get(i).and_then(|&l| graph.link(l).slot_at(node));
                Station {
                    node,
                    coord: coords[i],
                    left_slot,
                    right_slot,
                }
            })
            .collect();

        Ok(Self { id, stations, hops })
    }

    /// Number of nodes on the route, end nodes included.
    pub fn num_nodes(&self) -> usize {
        self.stations.len()
    }

    /// Number of repeaters, which is also the number of Bell outcomes Bob
    /// collects per round.
    pub fn num_repeaters(&self) -> usize {
        self.stations.len() - 2
    }

    /// Stations from Alice to Bob.
    pub fn stations(&self) -> &[Station] {
        &self.stations
    }

    /// Station at `index`, counted from Alice.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not below [`Route::num_nodes`].
    pub fn station(&self, index: usize) -> &Station {
        &self.stations[index]
    }

    /// Links of the route, one per hop, starting at Alice.
    pub fn hops(&self) -> &[LinkId] {
        &self.hops
    }

    /// First station, which keeps one half of every end-to-end pair.
    pub fn alice(&self) -> &Station {
        &self.stations[0]
    }

    /// Last station, which collects the Bell outcomes and corrects.
    pub fn bob(&self) -> &Station {
        &self.stations[self.stations.len() - 1]
    }

    /// Index of Bob in [`Route::stations`].
    pub fn bob_index(&self) -> usize {
        self.stations.len() - 1
    }

    /// Alice's position, holding her half of the end-to-end pair.
    pub fn alice_slot(&self) -> usize {
        self.alice().right_slot.unwrap_or_default()
    }

    /// Bob's position, holding his half of the end-to-end pair.
    pub fn bob_slot(&self) -> usize {
        self.bob().left_slot.unwrap_or_default()
    }

    /// Coordinates of the route in order.
    pub fn coords(&self) -> Vec<Coord> {
        self.stations.iter().map(|s| s.coord).collect()
    }

    /// Estimated time for one round to propagate across the route, in ns.
    pub fn estimated_runtime_ns(&self, node_distance_km: f64) -> f64 {
        (self.num_nodes() as f64 - 0.5) * node_distance_km * defaults::FIBRE_DELAY_NS_PER_KM
    }
}

/// Checks that no memory position is reserved by more than one route.
pub fn check_reservations(graph: &NetworkGraph, routes: &[Route]) -> Result<(), SimError> {
    let mut owners: HashMap<(NodeIndex, usize), PathId> = HashMap::new();
    for route in routes {
        for station in route.stations() {
            for slot in station.slots() {
                if owners.insert((station.node, slot), route.id).is_some() {
                    return Err(SimError::SlotConflict {
                        node: graph.coord(station.node),
                        slot,
                    });
                }
            }
        }
    }
    Ok(())
}

fn step_towards(from: u16, to: u16) -> u16 {
    match from.cmp(&to) {
        std::cmp::Ordering::Less => from + 1,
        std::cmp::Ordering::Greater => from - 1,
        std::cmp::Ordering::Equal => from,
    }
}

/// Staircase path from `from` to `to`.
///
/// Alternates one row step and one column step until the target is
/// reached; once one axis is aligned only the other keeps moving.
pub fn manhattan_route(from: Coord, to: Coord) -> Vec<Coord> {
    let mut route = vec![from];
    let mut at = from;
    while at != to {
        if at.row != to.row {
            at.row = step_towards(at.row, to.row);
            route.push(at);
        }
        if at.col != to.col {
            at.col = step_towards(at.col, to.col);
            route.push(at);
        }
    }
    route
}

/// Staircase path between two distinct random nodes of an `n` x `n` grid.
///
/// Returns `None` if the grid has fewer than two nodes.
pub fn random_route<R: Rng + ?Sized>(n: u16, rng: &mut R) -> Option<Vec<Coord>> {
    if n < 2 {
        return None;
    }
    let mut pick = || Coord::new(rng.gen_range(0..n), rng.gen_range(0..n));
    let a = pick();
    let mut b = pick();
    while a == b {
        b = pick();
    }
    Some(manhattan_route(a, b))
}
