//! An arena of tensors connected by edges.
//!
//! Nodes live in a [`Network`] and are addressed by integer [`Id`]s, which are
//! never reused. Each axis of a node is an [`Edge`]; an edge is either
//! dangling or connected to exactly one other edge, possibly on the same node
//! (a self-loop). Connections record contractions to be performed later by
//! [`Network::contract_nodes`].
//!
//! Copying a set of nodes (optionally conjugating them) is a remapping of
//! handles into a target arena, so a network never has to be walked as a
//! graph of shared pointers.

use std::{
    collections::VecDeque,
    ops::{ Deref, DerefMut },
};
use itertools::Itertools;
use log::{ debug, trace };
use ndarray::{ self as nd, Dimension };
use num_complex::Complex64 as C64;
use num_traits::{ One, Zero };
use rustc_hash::{ FxHashMap as HashMap, FxHashSet as HashSet };
use thiserror::Error;
use crate::tensor::{ self, Idx, Tensor };

#[derive(Debug, Error)]
pub enum NetworkError {
    /// Returned when a node ID doesn't exist in the network.
    #[error("error in Network: missing node {0}")]
    MissingNode(usize),

    /// Returned when an axis index is out of range for its node.
    #[error("error in Network: node {0} has no axis {1}")]
    MissingAxis(usize, usize),

    /// Returned when attempting to connect an edge that is already connected.
    #[error("error in Network::connect: edge {0:?} is already connected")]
    AlreadyConnected(Edge),

    /// Returned when attempting to connect an edge to itself.
    #[error("error in Network::connect: cannot connect edge {0:?} to itself")]
    SelfConnection(Edge),

    /// Returned when attempting to connect two edges of unequal dimension.
    #[error("error in Network::connect: dimension mismatch ({0} != {1})")]
    DimMismatch(usize, usize),

    /// Returned when attempting to contract an empty set of nodes.
    #[error("error in Network::contract_nodes: empty node set")]
    EmptyContraction,

    /// Returned when a requested output ordering does not contain exactly the
    /// open edges of a contracted node set.
    #[error("error in Network::contract_nodes: output order does not match the open edges")]
    OrderMismatch,

    /// Returned by anything involving an operation on the level of individual
    /// tensors.
    #[error("tensor error: {0}")]
    TensorError(#[from] tensor::TensorError),
}
use NetworkError::*;
pub type NetworkResult<T> = Result<T, NetworkError>;

macro_rules! isomorphism {
    (
        $docstring:literal,
        $name:ident ($iso_to:ident),
        derive: { $($derive:ident),* $(,)? } $(,)?
    ) => {
        #[doc = $docstring]
        #[derive($($derive),*)]
        pub struct $name(pub $iso_to);

        impl From<$iso_to> for $name {
            fn from(x: $iso_to) -> Self { Self(x) }
        }

        impl From<$name> for $iso_to {
            fn from(x: $name) -> Self { x.0 }
        }

        impl Deref for $name {
            type Target = $iso_to;

            fn deref(&self) -> &Self::Target { &self.0 }
        }

        impl DerefMut for $name {
            fn deref_mut(&mut self) -> &mut Self::Target { &mut self.0 }
        }
    }
}

isomorphism!(
    "Sugared `usize` representing the ID of a single node.",
    Id (usize),
    derive: { Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash },
);

/// A single axis of a node.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Edge {
    /// Owning node.
    pub node: Id,
    /// Axis of the owning node's tensor.
    pub axis: usize,
}

impl Edge {
    pub fn new(node: Id, axis: usize) -> Self { Self { node, axis } }
}

/// The state of an [`Edge`] within its network.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Wire {
    Dangling(Edge),
    Bond(Edge, Edge),
}

/// Distinguishes generic dense tensors from copy tensors, which are 1 where
/// all indices are equal and 0 elsewhere.
///
/// Rank-2 copy nodes act as identities and can be removed from a network
/// without contracting anything.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum NodeKind {
    Dense,
    Copy,
}

/// A tensor in a [`Network`].
#[derive(Clone, Debug)]
pub struct Node {
    name: String,
    kind: NodeKind,
    tensor: nd::ArrayD<C64>,
    links: Vec<Option<Edge>>,
}

impl Node {
    pub fn name(&self) -> &str { &self.name }

    pub fn kind(&self) -> NodeKind { self.kind }

    pub fn is_copy(&self) -> bool { self.kind == NodeKind::Copy }

    pub fn tensor(&self) -> &nd::ArrayD<C64> { &self.tensor }

    pub fn rank(&self) -> usize { self.tensor.ndim() }

    pub fn shape(&self) -> &[usize] { self.tensor.shape() }

    /// Return the edge connected to axis `axis`, if there is one.
    pub fn link(&self, axis: usize) -> Option<Edge> {
        self.links.get(axis).copied().flatten()
    }
}

/// Label used internally to contract a node set.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
struct Bond {
    id: usize,
    dim: usize,
}

impl Idx for Bond {
    fn dim(&self) -> usize { self.dim }

    fn label(&self) -> String { format!("b{}", self.id) }
}

/// An arena of [`Node`]s.
#[derive(Clone, Debug, Default)]
pub struct Network {
    nodes: HashMap<Id, Node>,
    node_id: usize,
}

impl Network {
    /// Create a new, empty network.
    pub fn new() -> Self {
        Self { nodes: HashMap::default(), node_id: 0 }
    }

    /// Return the number of nodes in the network.
    pub fn count_nodes(&self) -> usize { self.nodes.len() }

    /// Return `true` if the node exists.
    pub fn contains(&self, id: Id) -> bool { self.nodes.contains_key(&id) }

    /// Return the IDs of all nodes, in ascending order.
    pub fn ids(&self) -> Vec<Id> {
        self.nodes.keys().copied().sorted().collect()
    }

    /// Return a reference to a node.
    pub fn node(&self, id: Id) -> NetworkResult<&Node> {
        self.nodes.get(&id).ok_or(MissingNode(id.0))
    }

    fn node_mut(&mut self, id: Id) -> NetworkResult<&mut Node> {
        self.nodes.get_mut(&id).ok_or(MissingNode(id.0))
    }

    fn insert(&mut self, name: String, kind: NodeKind, tensor: nd::ArrayD<C64>)
        -> Id
    {
        let id = Id(self.node_id);
        let links = vec![None; tensor.ndim()];
        self.nodes.insert(id, Node { name, kind, tensor, links });
        self.node_id += 1;
        id
    }

    /// Add a dense tensor to the network and return its ID. All of its edges
    /// are initially dangling.
    pub fn push<S>(&mut self, tensor: nd::ArrayD<C64>, name: S) -> Id
    where S: Into<String>
    {
        self.insert(name.into(), NodeKind::Dense, tensor)
    }

    /// Add a rank-0 tensor to the network.
    pub fn push_scalar<S>(&mut self, val: C64, name: S) -> Id
    where S: Into<String>
    {
        self.push(nd::arr0(val).into_dyn(), name)
    }

    /// Add a copy tensor of the given rank, with every axis of dimension
    /// `dim`.
    pub fn push_copy<S>(&mut self, rank: usize, dim: usize, name: S) -> Id
    where S: Into<String>
    {
        let tensor: nd::ArrayD<C64>
            = nd::ArrayD::from_shape_fn(
                vec![dim; rank],
                |ix| {
                    if ix.slice().iter().all_equal() {
                        C64::one()
                    } else {
                        C64::zero()
                    }
                },
            );
        self.insert(name.into(), NodeKind::Copy, tensor)
    }

    /// Return the edge for axis `axis` of node `id`.
    pub fn edge(&self, id: Id, axis: usize) -> NetworkResult<Edge> {
        let node = self.node(id)?;
        (axis < node.rank()).then_some(Edge::new(id, axis))
            .ok_or(MissingAxis(id.0, axis))
    }

    /// Return all edges of a node in axis order.
    pub fn edges(&self, id: Id) -> NetworkResult<Vec<Edge>> {
        let node = self.node(id)?;
        Ok((0..node.rank()).map(|axis| Edge::new(id, axis)).collect())
    }

    fn check(&self, edge: Edge) -> NetworkResult<&Node> {
        let node = self.node(edge.node)?;
        (edge.axis < node.rank()).then_some(node)
            .ok_or(MissingAxis(edge.node.0, edge.axis))
    }

    /// Return the dimension of an edge.
    pub fn dim(&self, edge: Edge) -> NetworkResult<usize> {
        self.check(edge).map(|node| node.shape()[edge.axis])
    }

    /// Return the edge connected to `edge`, if any.
    pub fn partner(&self, edge: Edge) -> NetworkResult<Option<Edge>> {
        self.check(edge).map(|node| node.link(edge.axis))
    }

    /// Return `true` if `edge` is not connected to anything.
    pub fn is_dangling(&self, edge: Edge) -> NetworkResult<bool> {
        self.partner(edge).map(|p| p.is_none())
    }

    /// Return the [`Wire`] containing `edge`.
    pub fn wire(&self, edge: Edge) -> NetworkResult<Wire> {
        Ok(
            self.partner(edge)?
                .map(|p| Wire::Bond(edge, p))
                .unwrap_or(Wire::Dangling(edge))
        )
    }

    /// Connect two dangling edges of equal dimension.
    ///
    /// The edges may belong to the same node, but must be distinct.
    pub fn connect(&mut self, a: Edge, b: Edge) -> NetworkResult<()> {
        if a == b { return Err(SelfConnection(a)); }
        let dim_a = self.dim(a)?;
        let dim_b = self.dim(b)?;
        if dim_a != dim_b { return Err(DimMismatch(dim_a, dim_b)); }
        if !self.is_dangling(a)? { return Err(AlreadyConnected(a)); }
        if !self.is_dangling(b)? { return Err(AlreadyConnected(b)); }
        self.node_mut(a.node)?.links[a.axis] = Some(b);
        self.node_mut(b.node)?.links[b.axis] = Some(a);
        Ok(())
    }

    /// Remove a node from the network, returning it along with the edges it
    /// was connected to on other nodes, keyed by its own axis.
    ///
    /// The returned edges are left dangling. Self-loops are dropped with the
    /// node.
    pub fn remove(&mut self, id: Id) -> NetworkResult<(Node, Vec<(usize, Edge)>)> {
        let node = self.nodes.remove(&id).ok_or(MissingNode(id.0))?;
        let mut freed: Vec<(usize, Edge)> = Vec::new();
        for (axis, link) in node.links.iter().enumerate() {
            if let Some(p) = link {
                if p.node == id { continue; }
                if let Some(other) = self.nodes.get_mut(&p.node) {
                    other.links[p.axis] = None;
                    freed.push((axis, *p));
                }
            }
        }
        Ok((node, freed))
    }

    /// Return the set of all nodes reachable from `anchors` through connected
    /// edges, including the anchors themselves.
    ///
    /// Anchors that don't exist in the network are skipped.
    pub fn reachable<I>(&self, anchors: I) -> HashSet<Id>
    where I: IntoIterator<Item = Id>
    {
        let mut seen: HashSet<Id> = HashSet::default();
        let mut queue: VecDeque<Id> = VecDeque::new();
        for id in anchors.into_iter() {
            if self.contains(id) && seen.insert(id) { queue.push_back(id); }
        }
        while let Some(id) = queue.pop_front() {
            let Some(node) = self.nodes.get(&id) else { continue; };
            for p in node.links.iter().flatten() {
                if seen.insert(p.node) { queue.push_back(p.node); }
            }
        }
        seen
    }

    /// Return every edge of the given nodes that is either dangling or
    /// connected to a node outside the set, in ascending order.
    pub fn dangling(&self, nodes: &HashSet<Id>) -> NetworkResult<Vec<Edge>> {
        let mut edges: Vec<Edge> = Vec::new();
        for id in nodes.iter() {
            let node = self.node(*id)?;
            for (axis, link) in node.links.iter().enumerate() {
                match link {
                    Some(p) if nodes.contains(&p.node) => { },
                    _ => { edges.push(Edge::new(*id, axis)); },
                }
            }
        }
        edges.sort();
        Ok(edges)
    }

    /// Copy a set of nodes into `target`, optionally conjugating every tensor.
    ///
    /// Connections between copied nodes are recreated in `target`; edges
    /// leading out of the set are left dangling. Returns maps from old to new
    /// node IDs and old to new edges.
    pub fn copy_into(
        &self,
        nodes: &HashSet<Id>,
        conj: bool,
        target: &mut Network,
    ) -> NetworkResult<(HashMap<Id, Id>, HashMap<Edge, Edge>)>
    {
        let mut node_map: HashMap<Id, Id> = HashMap::default();
        let mut edge_map: HashMap<Edge, Edge> = HashMap::default();
        for id in nodes.iter().copied().sorted() {
            let node = self.node(id)?;
            let tensor
                = if conj {
                    node.tensor.mapv(|z| z.conj())
                } else {
                    node.tensor.clone()
                };
            let new = target.insert(node.name.clone(), node.kind, tensor);
            node_map.insert(id, new);
            for axis in 0..node.rank() {
                edge_map.insert(Edge::new(id, axis), Edge::new(new, axis));
            }
        }
        for (old, new) in node_map.iter() {
            let links: Vec<Option<Edge>>
                = self.node(*old)?.links.iter()
                .map(|link| link.and_then(|p| edge_map.get(&p).copied()))
                .collect();
            target.node_mut(*new)?.links = links;
        }
        Ok((node_map, edge_map))
    }

    /// Simple greedy search for the next pair to contract among `work`,
    /// optimized over only a single contraction. Only pairs sharing at least
    /// one bond are considered.
    fn find_contraction(work: &[Tensor<Bond>]) -> Option<(usize, usize)> {
        fn costf(a: &Tensor<Bond>, b: &Tensor<Bond>) -> usize {
            a.indices().iter()
                .filter(|idx| !b.has_index(idx))
                .chain(b.indices().iter().filter(|idx| !a.has_index(idx)))
                .map(|idx| idx.dim())
                .product()
        }

        (0..work.len()).tuple_combinations::<(usize, usize)>()
            .filter(|(i, j)| {
                work[*i].indices().iter().any(|idx| work[*j].has_index(idx))
            })
            .min_by_key(|(i, j)| costf(&work[*i], &work[*j]))
    }

    /// Contract a set of nodes into a single new node.
    ///
    /// Every edge of the set that is dangling or leads out of the set becomes
    /// an axis of the new node, in the order given by `order` if provided (it
    /// must list each such edge exactly once) or in ascending edge order
    /// otherwise. Edges leading out of the set are reconnected to the new
    /// node. Connected components of the set that share no edges are joined
    /// by outer products.
    ///
    /// Returns the ID of the new node along with the original edges matching
    /// each of its axes.
    pub fn contract_nodes(&mut self, nodes: &HashSet<Id>, order: Option<&[Edge]>)
        -> NetworkResult<(Id, Vec<Edge>)>
    {
        if nodes.is_empty() { return Err(EmptyContraction); }
        let ids: Vec<Id> = nodes.iter().copied().sorted().collect();
        let mut bonds: HashMap<Edge, Bond> = HashMap::default();
        let mut open: Vec<Edge> = Vec::new();
        let mut external: HashMap<Edge, Edge> = HashMap::default();
        let mut bond_id: usize = 0;
        for id in ids.iter() {
            let node = self.node(*id)?;
            for (axis, link) in node.links.iter().enumerate() {
                let edge = Edge::new(*id, axis);
                if bonds.contains_key(&edge) { continue; }
                let bond = Bond { id: bond_id, dim: node.shape()[axis] };
                bond_id += 1;
                bonds.insert(edge, bond);
                match link {
                    Some(p) if nodes.contains(&p.node) => {
                        bonds.insert(*p, bond);
                    },
                    Some(p) => {
                        open.push(edge);
                        external.insert(edge, *p);
                    },
                    None => { open.push(edge); },
                }
            }
        }
        let order: Vec<Edge>
            = match order {
                Some(order) => {
                    let given: HashSet<&Edge> = order.iter().collect();
                    let expected: HashSet<&Edge> = open.iter().collect();
                    if order.len() != open.len() || given != expected {
                        return Err(OrderMismatch);
                    }
                    order.to_vec()
                },
                None => open,
            };

        let mut work: Vec<Tensor<Bond>> = Vec::with_capacity(ids.len());
        for id in ids.iter() {
            let node = self.node(*id)?;
            let labels: Vec<Bond>
                = (0..node.rank())
                .map(|axis| bonds[&Edge::new(*id, axis)])
                .collect();
            work.push(Tensor::from_array(labels, node.tensor.clone())?);
        }
        while let Some((i, j)) = Self::find_contraction(&work) {
            trace!("contracting pair ({}, {}) of {}", i, j, work.len());
            let b = work.swap_remove(j);
            let a = work.swap_remove(i);
            work.push(a.contract(b)?);
        }
        let mut remaining = work.into_iter();
        let acc = remaining.next().ok_or(EmptyContraction)?;
        let result = remaining.try_fold(acc, |a, t| a.contract(t))?;
        let out_labels: Vec<Bond>
            = order.iter().map(|edge| bonds[edge]).collect();
        let array = result.into_array_ordered(&out_labels)?;

        for id in ids.iter() { self.nodes.remove(id); }
        let new = self.push(array, "contracted");
        for (axis, edge) in order.iter().enumerate() {
            if let Some(p) = external.get(edge) {
                self.node_mut(new)?.links[axis] = Some(*p);
                if let Some(other) = self.nodes.get_mut(&p.node) {
                    other.links[p.axis] = Some(Edge::new(new, axis));
                }
            }
        }
        debug!(
            "contracted {} nodes into one of rank {}",
            ids.len(),
            order.len(),
        );
        Ok((new, order))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(re: f64) -> C64 { C64::new(re, 0.0) }

    fn mat(rows: &[[f64; 2]; 2]) -> nd::ArrayD<C64> {
        nd::Array2::from_shape_fn((2, 2), |(i, j)| c(rows[i][j])).into_dyn()
    }

    #[test]
    fn connect_rules() {
        let mut net = Network::new();
        let a = net.push(mat(&[[1.0, 0.0], [0.0, 1.0]]), "a");
        let b = net.push(nd::ArrayD::zeros(vec![3]), "b");
        let a0 = net.edge(a, 0).unwrap();
        let a1 = net.edge(a, 1).unwrap();
        let b0 = net.edge(b, 0).unwrap();
        assert!(matches!(net.connect(a0, b0), Err(DimMismatch(2, 3))));
        assert!(matches!(net.connect(a0, a0), Err(SelfConnection(_))));
        net.connect(a0, a1).unwrap();
        assert!(matches!(net.connect(a0, a1), Err(AlreadyConnected(_))));
        assert_eq!(net.wire(a0).unwrap(), Wire::Bond(a0, a1));
        assert!(net.edge(a, 2).is_err());
    }

    #[test]
    fn copy_node_is_identity() {
        let mut net = Network::new();
        let id = net.push_copy(2, 3, "id");
        let t = net.node(id).unwrap().tensor();
        assert_eq!(t[[1, 1]], c(1.0));
        assert_eq!(t[[0, 2]], c(0.0));
        assert!(net.node(id).unwrap().is_copy());
    }

    #[test]
    fn reachable_and_dangling() {
        let mut net = Network::new();
        let a = net.push(mat(&[[1.0, 2.0], [3.0, 4.0]]), "a");
        let b = net.push(mat(&[[1.0, 2.0], [3.0, 4.0]]), "b");
        let lone = net.push_scalar(c(2.0), "lone");
        net.connect(Edge::new(a, 1), Edge::new(b, 0)).unwrap();
        let reach = net.reachable([a]);
        assert!(reach.contains(&b) && !reach.contains(&lone));
        let dangling = net.dangling(&reach).unwrap();
        assert_eq!(dangling, vec![Edge::new(a, 0), Edge::new(b, 1)]);
        let only_a: HashSet<Id> = [a].into_iter().collect();
        assert_eq!(net.dangling(&only_a).unwrap().len(), 2);
    }

    #[test]
    fn contract_matrix_chain() {
        let mut net = Network::new();
        let a = net.push(mat(&[[1.0, 2.0], [3.0, 4.0]]), "a");
        let b = net.push(mat(&[[0.0, 1.0], [1.0, 0.0]]), "b");
        net.connect(Edge::new(a, 1), Edge::new(b, 0)).unwrap();
        let set = net.reachable([a]);
        let order = [Edge::new(b, 1), Edge::new(a, 0)];
        let (new, legs) = net.contract_nodes(&set, Some(&order)).unwrap();
        assert_eq!(legs, order.to_vec());
        assert_eq!(net.count_nodes(), 1);
        // (A.B)^T with A.B = [[2 1] [4 3]]
        let t = net.node(new).unwrap().tensor();
        assert_eq!(t[[0, 0]], c(2.0));
        assert_eq!(t[[0, 1]], c(4.0));
        assert_eq!(t[[1, 0]], c(1.0));
        assert_eq!(t[[1, 1]], c(3.0));
    }

    #[test]
    fn contract_relinks_outside_edges() {
        let mut net = Network::new();
        let a = net.push(mat(&[[1.0, 2.0], [3.0, 4.0]]), "a");
        let b = net.push(mat(&[[1.0, 0.0], [0.0, 1.0]]), "b");
        let c_ = net.push(mat(&[[5.0, 6.0], [7.0, 8.0]]), "c");
        net.connect(Edge::new(a, 1), Edge::new(b, 0)).unwrap();
        net.connect(Edge::new(b, 1), Edge::new(c_, 0)).unwrap();
        let set: HashSet<Id> = [a, b].into_iter().collect();
        let (new, legs) = net.contract_nodes(&set, None).unwrap();
        assert_eq!(legs, vec![Edge::new(a, 0), Edge::new(b, 1)]);
        assert_eq!(
            net.partner(Edge::new(c_, 0)).unwrap(),
            Some(Edge::new(new, 1)),
        );
        assert_eq!(
            net.partner(Edge::new(new, 1)).unwrap(),
            Some(Edge::new(c_, 0)),
        );
    }

    #[test]
    fn contract_disconnected_and_loops() {
        let mut net = Network::new();
        let a = net.push(mat(&[[1.0, 2.0], [3.0, 4.0]]), "a");
        let s = net.push_scalar(c(3.0), "s");
        net.connect(Edge::new(a, 0), Edge::new(a, 1)).unwrap();
        let set: HashSet<Id> = [a, s].into_iter().collect();
        let (new, legs) = net.contract_nodes(&set, None).unwrap();
        assert!(legs.is_empty());
        let t = net.node(new).unwrap().tensor();
        assert_eq!(t.iter().next().copied(), Some(c(15.0)));
    }

    #[test]
    fn copy_and_remove() {
        let mut net = Network::new();
        let a = net.push(mat(&[[0.0, 1.0], [0.0, 0.0]]), "a");
        let b = net.push(mat(&[[1.0, 0.0], [0.0, 1.0]]), "b");
        net.connect(Edge::new(a, 1), Edge::new(b, 0)).unwrap();
        let mut target = Network::new();
        let only_a: HashSet<Id> = [a].into_iter().collect();
        let (nodes, edges) = net.copy_into(&only_a, true, &mut target).unwrap();
        assert_eq!(nodes.len(), 1);
        assert!(target.is_dangling(edges[&Edge::new(a, 1)]).unwrap());

        let (_, freed) = net.remove(b).unwrap();
        assert_eq!(freed, vec![(0, Edge::new(a, 1))]);
        assert!(net.is_dangling(Edge::new(a, 1)).unwrap());
        assert!(matches!(net.remove(b), Err(MissingNode(_))));
    }
}
