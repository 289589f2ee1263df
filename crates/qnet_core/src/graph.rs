//! Network graph for the grid quantum network.
//!
//! Nodes are grid coordinates, each owning a quantum memory with a fixed
//! number of positions. Every link joins two neighbouring nodes with an
//! entangling connection (a pair source at the midpoint feeding two noisy
//! half-length fibres) and a classical connection of full length. Building a
//! link binds one free memory position at each end; the binding is what the
//! protocols later use to find the qubits a link delivers.

use crate::SimError;
use crate::noise::check_length;
use bitvec::prelude::*;
use qnet_common::{Coord, defaults};
use std::collections::HashMap;

/// Dense index of a node inside a [`NetworkGraph`].
pub type NodeIndex = usize;

/// Dense index of a link inside a [`NetworkGraph`].
pub type LinkId = usize;

/// A point-to-point connection between two nodes.
///
/// Stores both endpoints together with the memory position each endpoint
/// dedicated to this link. Links are undirected: `a` is simply the endpoint
/// that was visited first while building the graph.
#[derive(Debug, Clone, PartialEq)]
pub struct Link {
    pub id: LinkId,
    pub a: NodeIndex,
    pub b: NodeIndex,
    /// Memory position of `a` receiving this link's qubits.
    pub slot_a: usize,
    /// Memory position of `b` receiving this link's qubits.
    pub slot_b: usize,
    /// Full node-to-node length in km.
    pub length_km: f64,
}

impl Link {
    /// Memory position bound to this link at `node`, if `node` is an endpoint.
    pub fn slot_at(&self, node: NodeIndex) -> Option<usize> {
        if node == self.a {
            Some(self.slot_a)
        } else if node == self.b {
            Some(self.slot_b)
        } else {
            None
        }
    }

    /// Length of each fibre half between the midpoint source and a node.
    pub fn half_length_km(&self) -> f64 {
        self.length_km / 2.0
    }

    /// Time for a photon to travel from the midpoint source to a node.
    pub fn quantum_delay_ns(&self) -> f64 {
        self.half_length_km() * defaults::FIBRE_DELAY_NS_PER_KM
    }

    /// Time for a classical message to cross the full link.
    pub fn classical_delay_ns(&self) -> f64 {
        self.length_km * defaults::FIBRE_DELAY_NS_PER_KM
    }
}

/// Connectivity of the network and memory position bindings.
///
/// The graph is built once before the simulation starts and is read-only
/// afterwards. Construction fails loudly instead of dropping links: a link
/// that could not be bound would otherwise leave a protocol waiting forever
/// for a qubit that never arrives.
#[derive(Debug, Clone)]
pub struct NetworkGraph {
    coords: Vec<Coord>,
    index: HashMap<Coord, NodeIndex>,
    links: Vec<Link>,
    adjacency: HashMap<(NodeIndex, NodeIndex), LinkId>,

    /// Positions already bound to a link, one bit vector per node.
    used_positions: Vec<BitVec>,
    num_positions: usize,
}

impl NetworkGraph {
    /// Creates an empty graph whose nodes have `num_positions` memory
    /// positions each.
    pub fn new(num_positions: usize) -> Self {
        Self {
            coords: Vec::new(),
            index: HashMap::new(),
            links: Vec::new(),
            adjacency: HashMap::new(),
            used_positions: Vec::new(),
            num_positions,
        }
    }

    /// Builds an `n` x `n` grid with links between horizontal and vertical
    /// neighbours.
    ///
    /// Nodes are added row by row. Each node then connects to its neighbours
    /// in [`Coord::neighbours`] order, skipping neighbours it is already
    /// linked to, so every undirected edge is built exactly once and memory
    /// positions are bound in a reproducible order.
    ///
    /// # Arguments
    ///
    /// * `n` - Grid side length
    /// * `node_distance_km` - Length of every link
    /// * `num_positions` - Memory positions per node
    ///
    /// # Returns
    ///
    /// The graph, or an error if a distance is invalid or a node runs out of
    /// memory positions.
    pub fn grid(n: u16, node_distance_km: f64, num_positions: usize) -> Result<Self, SimError> {
        check_length(node_distance_km)?;
        let mut graph = Self::new(num_positions);
        for row in 0..n {
            for col in 0..n {
                graph.add_node(Coord::new(row, col));
            }
        }
        for row in 0..n {
            for col in 0..n {
                let here = Coord::new(row, col);
                for near in here.neighbours(n) {
                    let (u, v) = (graph.node_index(here)?, graph.node_index(near)?);
                    if graph.link_between(u, v).is_none() {
                        graph.add_link(u, v, node_distance_km)?;
                    }
                }
            }
        }
        Ok(graph)
    }

    /// Adds a node, returning its index. Adding an existing coordinate
    /// returns the existing index.
    pub fn add_node(&mut self, coord: Coord) -> NodeIndex {
        if let Some(&idx) = self.index.get(&coord) {
            return idx;
        }
        let idx = self.coords.len();
        self.coords.push(coord);
        self.index.insert(coord, idx);
        self.used_positions.push(bitvec![0; self.num_positions]);
        idx
    }

    fn bind_free_position(&mut self, node: NodeIndex) -> Result<usize, SimError> {
        let used = &mut self.used_positions[node];
        let slot = used
            .first_zero()
            .ok_or(SimError::SlotExhausted(self.coords[node]))?;
        used.set(slot, true);
        Ok(slot)
    }

    /// Connects `u` and `v`, binding the first free memory position at each.
    pub fn add_link(&mut self, u: NodeIndex, v: NodeIndex, length_km: f64) -> Result<LinkId, SimError> {
        let length_km = check_length(length_km)?;
        if u >= self.coords.len() || v >= self.coords.len() {
            return Err(SimError::InvalidConfig(format!(
                "link endpoints {u} and {v} must both be existing nodes"
            )));
        }
        if u == v {
            return Err(SimError::NotAdjacent(self.coords[u], self.coords[v]));
        }
        // Check both ends before binding either, so a failure leaves no
        // half-bound link behind.
        for node in [u, v] {
            if self.used_positions[node].all() {
                return Err(SimError::SlotExhausted(self.coords[node]));
            }
        }
        let slot_a = self.bind_free_position(u)?;
        let slot_b = self.bind_free_position(v)?;

        let id = self.links.len();
        self.links.push(Link {
            id,
            a: u,
            b: v,
            slot_a,
            slot_b,
            length_km,
        });
        self.adjacency.insert((u, v), id);
        self.adjacency.insert((v, u), id);
        Ok(id)
    }

    /// Number of nodes added so far.
    pub fn num_nodes(&self) -> usize {
        self.coords.len()
    }

    /// Memory positions every node carries.
    ///
    /// Node memories are sized from this, so link bindings can never address
    /// a position the memory lacks.
    pub fn num_positions(&self) -> usize {
        self.num_positions
    }

    /// All links, indexed by [`LinkId`].
    pub fn links(&self) -> &[Link] {
        &self.links
    }

    /// Link with the given id.
    ///
    /// # Panics
    ///
    /// Panics if `id` was not returned by [`NetworkGraph::add_link`] on this
    /// graph.
    pub fn link(&self, id: LinkId) -> &Link {
        &self.links[id]
    }

    /// Grid coordinate of `node`.
    pub fn coord(&self, node: NodeIndex) -> Coord {
        self.coords[node]
    }

    /// Looks up the node at `coord`.
    ///
    /// Fails with [`SimError::UnknownNode`] for coordinates outside the
    /// graph.
    pub fn node_index(&self, coord: Coord) -> Result<NodeIndex, SimError> {
        self.index
            .get(&coord)
            .copied()
            .ok_or(SimError::UnknownNode(coord))
    }

    /// Link joining `u` and `v`, in either direction.
    pub fn link_between(&self, u: NodeIndex, v: NodeIndex) -> Option<&Link> {
        self.adjacency.get(&(u, v)).map(|&id| &self.links[id])
    }

    /// Memory position bindings of `node`: which position receives qubits
    /// from which neighbour, ordered by position.
    pub fn slot_bindings(&self, node: NodeIndex) -> Vec<(usize, Coord)> {
        let mut out: Vec<(usize, Coord)> = self
            .links
            .iter()
            .filter_map(|l| {
                let slot = l.slot_at(node)?;
                let other = if l.a == node { l.b } else { l.a };
                Some((slot, self.coords[other]))
            })
            .collect();
        out.sort_by_key(|(slot, _)| *slot);
        out
    }
}
