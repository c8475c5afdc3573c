//! Linear operators represented as tensor networks.
//!
//! A [`QuOperator`] is a network of tensors with two ordered lists of dangling
//! edges: the *output* edges, indexing rows, and the *input* edges, indexing
//! columns. Operators are combined lazily -- composition, tensor products,
//! adjoints and partial traces only rearrange edges and copy nodes -- and
//! contracted to a dense tensor only when [evaluated][QuOperator::eval].
//!
//! Each operator owns its network. Every structural operation copies the
//! reachable part of its operands into a fresh [`Network`] by remapping node
//! handles, so an operator can be composed with itself without aliasing, and
//! the operands of a composition are never modified. The only methods that
//! mutate an operator in place are [`QuOperator::contract`] and the
//! evaluation methods built on it.
//!
//! Operators are classified structurally by which edge lists are empty:
//! vectors have no input edges, adjoint vectors have no output edges, and
//! scalars have neither. Operations return a [`QuObject`], which holds the
//! tightest of these classifications and dereferences to the underlying
//! [`QuOperator`].
//!
//! ```
//! use ndarray as nd;
//! use num_complex::Complex64 as C64;
//! use qtensor_net::quantum::QuOperator;
//!
//! let x = nd::array![
//!     [C64::new(0.0, 0.0), C64::new(1.0, 0.0)],
//!     [C64::new(1.0, 0.0), C64::new(0.0, 0.0)],
//! ].into_dyn();
//! let x = QuOperator::from_tensor(x, None, None).unwrap();
//! let xx = x.matmul(&x).unwrap();
//! let m = xx.to_matrix().unwrap();
//! assert_eq!(m[[0, 0]], C64::new(1.0, 0.0));
//! assert_eq!(m[[0, 1]], C64::new(0.0, 0.0));
//! ```

use std::ops::{ BitOr, Deref, DerefMut, Mul };
use itertools::Itertools;
use log::debug;
use ndarray as nd;
use num_complex::Complex64 as C64;
use num_traits::One;
use rustc_hash::{ FxHashMap as HashMap, FxHashSet as HashSet };
use thiserror::Error;
use crate::network::{ Edge, Id, Network, NetworkError };

#[derive(Debug, Error)]
pub enum QuantumError {
    /// Returned when two lists of subsystems to be joined differ in length.
    #[error("Hilbert-space mismatch: cannot connect {0} subsystems with {1} subsystems")]
    SpaceCount(usize, usize),

    /// Returned when two subsystems to be joined differ in dimension.
    #[error("Hilbert-space mismatch on subsystem {0}: dimension {1} != {2}")]
    SpaceDim(usize, usize, usize),

    /// Returned when an output, input, or ignored edge is connected.
    #[error("edge {0:?} is not dangling")]
    NotDangling(Edge),

    /// Returned when the network contains dangling edges that aren't tracked
    /// by the operator.
    #[error("the network includes unexpected dangling edges: {0:?}")]
    UntrackedEdges(Vec<Edge>),

    /// Returned when an operator has no edges and no reference nodes.
    #[error("an operator without edges requires reference nodes")]
    EmptyScalar,

    /// Returned when attempting to multiply two non-scalar operators.
    #[error("elementwise multiplication is only defined when one operand is a scalar")]
    NonScalarProduct,

    /// Returned when attempting to multiply by a tensor that isn't rank 0.
    #[error("only rank-0 tensors can multiply an operator (got rank {0})")]
    NonScalarTensor(usize),

    /// Returned when more than one node remains after a full contraction.
    #[error("contraction left {0} disconnected components")]
    MultipleComponents(usize),

    /// Returned when a subsystem index is out of range.
    #[error("subsystem index {0} out of range for {1} subsystems")]
    IndexOutOfRange(usize, usize),

    /// Returned when axes given to split a tensor into output and input edges
    /// are out of range, repeated, or incomplete.
    #[error("invalid output/input axis split for a tensor of rank {0}")]
    BadAxes(usize),

    /// Returned when an operator doesn't have the structure required by a
    /// specialized type.
    #[error("expected a {0}")]
    WrongKind(&'static str),

    /// Returned by anything involving the underlying network.
    #[error("network error: {0}")]
    NetworkError(#[from] NetworkError),

    /// Returned by failed reshapes.
    #[error("shape error: {0}")]
    ShapeError(#[from] nd::ShapeError),
}
use QuantumError::*;
pub type QuantumResult<T> = Result<T, QuantumError>;

/// Check that two lists of subsystem dimensions can be joined pairwise.
pub fn check_spaces(dims_1: &[usize], dims_2: &[usize]) -> QuantumResult<()> {
    if dims_1.len() != dims_2.len() {
        return Err(SpaceCount(dims_1.len(), dims_2.len()));
    }
    dims_1.iter().zip(dims_2).enumerate()
        .try_for_each(|(k, (d1, d2))| {
            (d1 == d2).then_some(()).ok_or(SpaceDim(k, *d1, *d2))
        })
}

/// Split the axes of a rank-`nlegs` tensor into output and input groups.
///
/// With neither group given, the first half of the axes are outputs and the
/// rest are inputs. With one group given, the other is its complement.
fn split_axes(
    nlegs: usize,
    out_axes: Option<&[usize]>,
    in_axes: Option<&[usize]>,
) -> QuantumResult<(Vec<usize>, Vec<usize>)>
{
    let complement = |axes: &[usize]| -> Vec<usize> {
        (0..nlegs).filter(|k| !axes.contains(k)).collect()
    };
    let (out_axes, in_axes)
        = match (out_axes, in_axes) {
            (None, None) => ((0..nlegs / 2).collect(), (nlegs / 2..nlegs).collect()),
            (None, Some(ins)) => (complement(ins), ins.to_vec()),
            (Some(outs), None) => (outs.to_vec(), complement(outs)),
            (Some(outs), Some(ins)) => (outs.to_vec(), ins.to_vec()),
        };
    let all: Vec<usize>
        = out_axes.iter().chain(in_axes.iter()).copied().sorted().collect();
    if all != (0..nlegs).collect::<Vec<usize>>() {
        return Err(BadAxes(nlegs));
    }
    Ok((out_axes, in_axes))
}

/// Follow a chain of edge redirections left by identity elimination.
fn resolve(redirect: &HashMap<Edge, Edge>, edge: Edge) -> Edge {
    let mut edge = edge;
    for _ in 0..=redirect.len() {
        match redirect.get(&edge) {
            Some(next) => { edge = *next; },
            None => break,
        }
    }
    edge
}

/// Remove every rank-2 copy node among `nodes` that is connected to
/// something, joining its neighbors directly.
///
/// An identity whose two edges close on each other becomes a scalar node
/// equal to its dimension. Returns a map from surviving (or replaced) nodes to
/// their new IDs and a map redirecting dangling edges of removed nodes to the
/// edges that replace them; chains of redirections are followed by
/// [`resolve`].
fn eliminate_identities(net: &mut Network, nodes: &HashSet<Id>)
    -> QuantumResult<(HashMap<Id, Id>, HashMap<Edge, Edge>)>
{
    let mut node_map: HashMap<Id, Id> = HashMap::default();
    let mut redirect: HashMap<Edge, Edge> = HashMap::default();
    let mut removed: usize = 0;
    for id in nodes.iter().copied().sorted() {
        let node = net.node(id)?;
        let dim = node.shape().first().copied().unwrap_or(1);
        if !node.is_copy() || node.rank() != 2 {
            node_map.insert(id, id);
            continue;
        }
        let e0 = Edge::new(id, 0);
        let e1 = Edge::new(id, 1);
        if net.is_dangling(e0)? && net.is_dangling(e1)? {
            node_map.insert(id, id);
            continue;
        }
        let (_, freed) = net.remove(id)?;
        removed += 1;
        let p0 = freed.iter().find(|(axis, _)| *axis == 0).map(|(_, p)| *p);
        let p1 = freed.iter().find(|(axis, _)| *axis == 1).map(|(_, p)| *p);
        match (p0, p1) {
            (Some(a), Some(b)) => { net.connect(a, b)?; },
            (Some(a), None) => { redirect.insert(e1, a); },
            (None, Some(b)) => { redirect.insert(e0, b); },
            (None, None) => {
                let s = net.push_scalar(C64::from(dim as f64), "identity-trace");
                node_map.insert(id, s);
            },
        }
    }
    debug!("eliminated {} identities", removed);
    Ok((node_map, redirect))
}

/// Edge lists and nodes of an operator after copying it into a new network.
struct Copied {
    out_edges: Vec<Edge>,
    in_edges: Vec<Edge>,
    ignore_edges: Vec<Edge>,
    ref_nodes: HashSet<Id>,
    nodes: HashSet<Id>,
}

/// A linear operator represented as a tensor network with designated output
/// and input edges.
///
/// Invariants, checked on construction:
/// - every output, input and ignored edge is dangling;
/// - the dangling edges reachable from the operator's edges and reference
///   nodes are exactly its output, input and ignored edges;
/// - an operator with no output or input edges has at least one reference
///   node.
#[derive(Clone, Debug)]
pub struct QuOperator {
    net: Network,
    out_edges: Vec<Edge>,
    in_edges: Vec<Edge>,
    ref_nodes: HashSet<Id>,
    ignore_edges: Vec<Edge>,
}

impl QuOperator {
    /// Wrap edges of an existing network as an operator.
    ///
    /// `ref_nodes` anchor subnetworks that aren't reachable from any edge
    /// (e.g. scalar factors); `ignore_edges` are dangling edges that belong to
    /// neither the output nor the input space.
    pub fn new<R, I>(
        net: Network,
        out_edges: Vec<Edge>,
        in_edges: Vec<Edge>,
        ref_nodes: R,
        ignore_edges: I,
    ) -> QuantumResult<Self>
    where
        R: IntoIterator<Item = Id>,
        I: IntoIterator<Item = Edge>,
    {
        let ignore_edges: Vec<Edge>
            = ignore_edges.into_iter().unique().collect();
        let op = Self {
            net,
            out_edges,
            in_edges,
            ref_nodes: ref_nodes.into_iter().collect(),
            ignore_edges,
        };
        op.check_network()?;
        Ok(op)
    }

    /// Construct an operator from a single tensor.
    ///
    /// `out_axes` and `in_axes` select the axes to use as output and input
    /// edges. If neither is given, the first half of the axes are outputs and
    /// the rest are inputs; if only one is given, the other is its complement.
    pub fn from_tensor(
        tensor: nd::ArrayD<C64>,
        out_axes: Option<&[usize]>,
        in_axes: Option<&[usize]>,
    ) -> QuantumResult<QuObject>
    {
        let (out_axes, in_axes) = split_axes(tensor.ndim(), out_axes, in_axes)?;
        let mut net = Network::new();
        let n = net.push(tensor, "tensor");
        let out_edges = out_axes.iter().map(|k| Edge::new(n, *k)).collect();
        let in_edges = in_axes.iter().map(|k| Edge::new(n, *k)).collect();
        quantum_constructor(net, out_edges, in_edges, [n], [])
    }

    /// Construct an operator on the space `space` that acts as `tensor` on the
    /// subsystems `loc` and as the identity everywhere else.
    ///
    /// The `k`-th output/input axis of `tensor` is placed at subsystem
    /// `loc[k]`; axes are split as in [`from_tensor`][Self::from_tensor].
    pub fn from_local_tensor(
        tensor: nd::ArrayD<C64>,
        space: &[usize],
        loc: &[usize],
        out_axes: Option<&[usize]>,
        in_axes: Option<&[usize]>,
    ) -> QuantumResult<QuObject>
    {
        let nlegs = tensor.ndim();
        let (out_axes, in_axes) = split_axes(nlegs, out_axes, in_axes)?;
        if out_axes.len() != loc.len() || in_axes.len() != loc.len() {
            return Err(BadAxes(nlegs));
        }
        if let Some(site) = loc.iter().find(|site| **site >= space.len()) {
            return Err(IndexOutOfRange(*site, space.len()));
        }
        let local_dims: Vec<usize>
            = out_axes.iter().map(|k| tensor.shape()[*k]).collect();
        let site_dims: Vec<usize> = loc.iter().map(|site| space[*site]).collect();
        check_spaces(&local_dims, &site_dims)?;
        let in_dims: Vec<usize>
            = in_axes.iter().map(|k| tensor.shape()[*k]).collect();
        check_spaces(&in_dims, &site_dims)?;

        let mut net = Network::new();
        let local = net.push(tensor, "local");
        let mut out_edges: Vec<Edge> = Vec::with_capacity(space.len());
        let mut in_edges: Vec<Edge> = Vec::with_capacity(space.len());
        for (site, dim) in space.iter().enumerate() {
            if let Some(k) = loc.iter().position(|l| *l == site) {
                out_edges.push(Edge::new(local, out_axes[k]));
                in_edges.push(Edge::new(local, in_axes[k]));
            } else {
                let id = net.push_copy(2, *dim, "identity");
                out_edges.push(Edge::new(id, 0));
                in_edges.push(Edge::new(id, 1));
            }
        }
        quantum_constructor(net, out_edges, in_edges, [local], [])
    }

    /// Construct the identity operator on the space `space`, using rank-2 copy
    /// nodes.
    ///
    /// The identity on an empty space is the scalar 1.
    pub fn identity(space: &[usize]) -> QuantumResult<QuObject> {
        let mut net = Network::new();
        if space.is_empty() {
            let s = net.push_scalar(C64::one(), "one");
            return quantum_constructor(net, vec![], vec![], [s], []);
        }
        let mut out_edges: Vec<Edge> = Vec::with_capacity(space.len());
        let mut in_edges: Vec<Edge> = Vec::with_capacity(space.len());
        for dim in space.iter() {
            let id = net.push_copy(2, *dim, "identity");
            out_edges.push(Edge::new(id, 0));
            in_edges.push(Edge::new(id, 1));
        }
        quantum_constructor(net, out_edges, in_edges, [], [])
    }

    /// Return the underlying network.
    ///
    /// The network may hold nodes that are no longer reachable from the
    /// operator; see [`nodes`][Self::nodes].
    pub fn network(&self) -> &Network { &self.net }

    pub fn out_edges(&self) -> &[Edge] { &self.out_edges }

    pub fn in_edges(&self) -> &[Edge] { &self.in_edges }

    pub fn ignore_edges(&self) -> &[Edge] { &self.ignore_edges }

    pub fn ref_nodes(&self) -> &HashSet<Id> { &self.ref_nodes }

    /// Return all nodes involved in the operator.
    pub fn nodes(&self) -> HashSet<Id> {
        let anchors: Vec<Id>
            = self.out_edges.iter()
            .chain(self.in_edges.iter())
            .chain(self.ignore_edges.iter())
            .map(|e| e.node)
            .chain(self.ref_nodes.iter().copied())
            .collect();
        self.net.reachable(anchors)
    }

    fn space(&self, edges: &[Edge]) -> Vec<usize> {
        edges.iter().filter_map(|e| self.net.dim(*e).ok()).collect()
    }

    /// Return the dimensions of the input edges.
    pub fn in_space(&self) -> Vec<usize> { self.space(&self.in_edges) }

    /// Return the dimensions of the output edges.
    pub fn out_space(&self) -> Vec<usize> { self.space(&self.out_edges) }

    /// Return `true` if `self` has neither output nor input edges.
    pub fn is_scalar(&self) -> bool {
        self.out_edges.is_empty() && self.in_edges.is_empty()
    }

    /// Return `true` if `self` has no input edges.
    pub fn is_vector(&self) -> bool { self.in_edges.is_empty() }

    /// Return `true` if `self` has no output edges.
    pub fn is_adjoint_vector(&self) -> bool { self.out_edges.is_empty() }

    /// Check the structural invariants of the operator.
    pub fn check_network(&self) -> QuantumResult<()> {
        let tracked: Vec<Edge>
            = self.out_edges.iter()
            .chain(self.in_edges.iter())
            .chain(self.ignore_edges.iter())
            .copied()
            .collect();
        for e in tracked.iter() {
            if !self.net.is_dangling(*e)? { return Err(NotDangling(*e)); }
        }
        if self.is_scalar() && self.ref_nodes.is_empty() {
            return Err(EmptyScalar);
        }
        let known: HashSet<Edge> = tracked.into_iter().collect();
        let untracked: Vec<Edge>
            = self.net.dangling(&self.nodes())?
            .into_iter()
            .filter(|e| !known.contains(e))
            .collect();
        if untracked.is_empty() { Ok(()) } else { Err(UntrackedEdges(untracked)) }
    }

    fn duplicate(&self, conj: bool, target: &mut Network) -> QuantumResult<Copied> {
        let nodes = self.nodes();
        let (node_map, edge_map) = self.net.copy_into(&nodes, conj, target)?;
        let remap = |edges: &[Edge]| -> QuantumResult<Vec<Edge>> {
            edges.iter()
                .map(|e| {
                    edge_map.get(e).copied()
                        .ok_or(QuantumError::from(NetworkError::MissingNode(e.node.0)))
                })
                .collect()
        };
        Ok(Copied {
            out_edges: remap(&self.out_edges)?,
            in_edges: remap(&self.in_edges)?,
            ignore_edges: remap(&self.ignore_edges)?,
            ref_nodes:
                self.ref_nodes.iter()
                .filter_map(|n| node_map.get(n).copied())
                .collect(),
            nodes: node_map.values().copied().collect(),
        })
    }

    /// Return a deep copy of `self`, with only the reachable part of its
    /// network.
    pub fn copy(&self) -> QuantumResult<QuObject> {
        let mut net = Network::new();
        let c = self.duplicate(false, &mut net)?;
        quantum_constructor(
            net, c.out_edges, c.in_edges, c.ref_nodes, c.ignore_edges)
    }

    /// Return the adjoint of `self`: a conjugated copy with output and input
    /// edges swapped.
    pub fn adjoint(&self) -> QuantumResult<QuObject> {
        let mut net = Network::new();
        let c = self.duplicate(true, &mut net)?;
        quantum_constructor(
            net, c.in_edges, c.out_edges, c.ref_nodes, c.ignore_edges)
    }

    /// Trace out the given subsystems, connecting output edge `k` to input
    /// edge `k` for each `k` in `subsystems`.
    ///
    /// The remaining edges keep their relative order.
    pub fn partial_trace(&self, subsystems: &[usize]) -> QuantumResult<QuObject> {
        let n = self.out_edges.len().min(self.in_edges.len());
        if let Some(k) = subsystems.iter().find(|k| **k >= n) {
            return Err(IndexOutOfRange(*k, n));
        }
        let out_dims: Vec<usize>
            = subsystems.iter()
            .map(|k| self.net.dim(self.out_edges[*k]))
            .collect::<Result<_, _>>()?;
        let in_dims: Vec<usize>
            = subsystems.iter()
            .map(|k| self.net.dim(self.in_edges[*k]))
            .collect::<Result<_, _>>()?;
        check_spaces(&in_dims, &out_dims)?;

        let mut net = Network::new();
        let c = self.duplicate(false, &mut net)?;
        for k in subsystems.iter() {
            net.connect(c.out_edges[*k], c.in_edges[*k])?;
        }
        let keep = |edges: Vec<Edge>| -> Vec<Edge> {
            edges.into_iter().enumerate()
                .filter(|(k, _)| !subsystems.contains(k))
                .map(|(_, e)| e)
                .collect()
        };
        quantum_constructor(
            net, keep(c.out_edges), keep(c.in_edges), c.nodes, c.ignore_edges)
    }

    /// Trace over all subsystems.
    pub fn trace(&self) -> QuantumResult<QuObject> {
        let all: Vec<usize> = (0..self.in_edges.len()).collect();
        self.partial_trace(&all)
    }

    /// Return the squared Frobenius norm `Tr(A† A)` as a scalar operator.
    pub fn norm(&self) -> QuantumResult<QuObject> {
        self.adjoint()?.matmul(self)?.trace()
    }

    /// Compose `self` with `other`, with `other` acting first.
    ///
    /// Input edge `k` of `self` is connected to output edge `k` of `other`.
    pub fn matmul(&self, other: &QuOperator) -> QuantumResult<QuObject> {
        check_spaces(&self.in_space(), &other.out_space())?;
        let mut net = Network::new();
        let a = self.duplicate(false, &mut net)?;
        let b = other.duplicate(false, &mut net)?;
        for (ea, eb) in a.in_edges.iter().zip(b.out_edges.iter()) {
            net.connect(*ea, *eb)?;
        }
        quantum_constructor(
            net,
            a.out_edges,
            b.in_edges,
            a.nodes.union(&b.nodes).copied().collect::<Vec<Id>>(),
            a.ignore_edges.into_iter().chain(b.ignore_edges),
        )
    }

    /// Compose `self` with a raw tensor acting first, wrapping the tensor via
    /// [`from_tensor`][Self::from_tensor].
    pub fn matmul_tensor(&self, tensor: nd::ArrayD<C64>)
        -> QuantumResult<QuObject>
    {
        self.matmul(&*Self::from_tensor(tensor, None, None)?)
    }

    /// Compose a raw tensor with `self` acting first.
    pub fn rmatmul_tensor(&self, tensor: nd::ArrayD<C64>)
        -> QuantumResult<QuObject>
    {
        Self::from_tensor(tensor, None, None)?.matmul(self)
    }

    /// Tensor product of `self` with `other`.
    ///
    /// The output (input) edges of the result are those of `self` followed by
    /// those of `other`; nothing is contracted.
    pub fn tensor_product(&self, other: &QuOperator) -> QuantumResult<QuObject> {
        let mut net = Network::new();
        let a = self.duplicate(false, &mut net)?;
        let b = other.duplicate(false, &mut net)?;
        quantum_constructor(
            net,
            a.out_edges.into_iter().chain(b.out_edges).collect(),
            a.in_edges.into_iter().chain(b.in_edges).collect(),
            a.nodes.union(&b.nodes).copied().collect::<Vec<Id>>(),
            a.ignore_edges.into_iter().chain(b.ignore_edges),
        )
    }

    /// Multiply two operators, at least one of which must be a scalar.
    ///
    /// Elementwise products of general operators are not defined here.
    pub fn mul(&self, other: &QuOperator) -> QuantumResult<QuObject> {
        if self.is_scalar() || other.is_scalar() {
            self.tensor_product(other)
        } else {
            Err(NonScalarProduct)
        }
    }

    /// Multiply by a number.
    pub fn mul_scalar(&self, val: C64) -> QuantumResult<QuObject> {
        self.tensor_product(&QuScalar::new(val))
    }

    /// Multiply by a rank-0 tensor.
    pub fn mul_tensor(&self, tensor: nd::ArrayD<C64>) -> QuantumResult<QuObject> {
        if tensor.ndim() != 0 { return Err(NonScalarTensor(tensor.ndim())); }
        let val = tensor.iter().next().copied().unwrap_or_default();
        self.mul_scalar(val)
    }

    /// Contract the operator's network into a single node, in place.
    ///
    /// Identity nodes are eliminated first, and all tracked edges are remapped
    /// onto the axes of the result. If `final_edge_order` is given, it must
    /// list every dangling edge of the operator and fixes the axis order of
    /// the result.
    pub fn contract(&mut self, final_edge_order: Option<&[Edge]>)
        -> QuantumResult<&mut Self>
    {
        let nodes = self.nodes();
        let (node_map, redirect)
            = eliminate_identities(&mut self.net, &nodes)?;
        let fix = |edges: &[Edge]| -> Vec<Edge> {
            edges.iter().map(|e| resolve(&redirect, *e)).collect()
        };
        self.out_edges = fix(&self.out_edges);
        self.in_edges = fix(&self.in_edges);
        self.ignore_edges = fix(&self.ignore_edges);
        self.ref_nodes
            = self.ref_nodes.iter()
            .filter_map(|n| node_map.get(n).copied())
            .collect();
        self.check_network()?;
        let order: Option<Vec<Edge>> = final_edge_order.map(fix);

        let nodes = self.nodes();
        let (new, legs) = self.net.contract_nodes(&nodes, order.as_deref())?;
        let axes: HashMap<Edge, Edge>
            = legs.iter().enumerate()
            .map(|(axis, e)| (*e, Edge::new(new, axis)))
            .collect();
        let remap = |edges: &[Edge]| -> QuantumResult<Vec<Edge>> {
            edges.iter()
                .map(|e| axes.get(e).copied().ok_or(NotDangling(*e)))
                .collect()
        };
        self.out_edges = remap(&self.out_edges)?;
        self.in_edges = remap(&self.in_edges)?;
        self.ignore_edges = remap(&self.ignore_edges)?;
        self.ref_nodes = [new].into_iter().collect();
        Ok(self)
    }

    /// Contract the operator and return the resulting dense tensor, in place.
    ///
    /// The default axis order is ignored edges, then output edges, then input
    /// edges.
    pub fn eval(&mut self, final_edge_order: Option<&[Edge]>)
        -> QuantumResult<nd::ArrayD<C64>>
    {
        let order: Vec<Edge>
            = match final_edge_order {
                Some(order) => order.to_vec(),
                None => {
                    self.ignore_edges.iter()
                        .chain(self.out_edges.iter())
                        .chain(self.in_edges.iter())
                        .copied()
                        .collect()
                },
            };
        self.contract(Some(order.as_slice()))?;
        let nodes = self.nodes();
        if nodes.len() != 1 { return Err(MultipleComponents(nodes.len())); }
        let id = nodes.into_iter().next().ok_or(MultipleComponents(0))?;
        Ok(self.net.node(id)?.tensor().clone())
    }

    /// Like [`eval`][Self::eval], but reshape the result into a matrix whose
    /// rows index the output space and whose columns index the input space.
    pub fn eval_matrix(&mut self, final_edge_order: Option<&[Edge]>)
        -> QuantumResult<nd::Array2<C64>>
    {
        let t = self.eval(final_edge_order)?;
        let rows: usize = self.out_space().iter().product();
        let cols: usize = self.in_space().iter().product();
        let data: Vec<C64> = t.iter().copied().collect();
        Ok(nd::Array2::from_shape_vec((rows, cols), data)?)
    }

    /// Evaluate a copy of `self` as a dense tensor, leaving `self` untouched.
    pub fn to_dense(&self) -> QuantumResult<nd::ArrayD<C64>> {
        self.copy()?.eval(None)
    }

    /// Evaluate a copy of `self` as a matrix, leaving `self` untouched.
    pub fn to_matrix(&self) -> QuantumResult<nd::Array2<C64>> {
        self.copy()?.eval_matrix(None)
    }
}

/// Construct the most specific operator type for the given edges.
///
/// See [`QuOperator::new`].
pub fn quantum_constructor<R, I>(
    net: Network,
    out_edges: Vec<Edge>,
    in_edges: Vec<Edge>,
    ref_nodes: R,
    ignore_edges: I,
) -> QuantumResult<QuObject>
where
    R: IntoIterator<Item = Id>,
    I: IntoIterator<Item = Edge>,
{
    QuOperator::new(net, out_edges, in_edges, ref_nodes, ignore_edges)
        .map(QuObject::from)
}

impl<'a> BitOr<&'a QuOperator> for &'a QuOperator {
    type Output = QuantumResult<QuObject>;

    fn bitor(self, rhs: &'a QuOperator) -> Self::Output {
        self.tensor_product(rhs)
    }
}

impl Mul<C64> for &QuOperator {
    type Output = QuantumResult<QuObject>;

    fn mul(self, rhs: C64) -> Self::Output { self.mul_scalar(rhs) }
}

impl Mul<&QuOperator> for C64 {
    type Output = QuantumResult<QuObject>;

    fn mul(self, rhs: &QuOperator) -> Self::Output {
        QuScalar::new(self).tensor_product(rhs)
    }
}

macro_rules! specialization {
    (
        $docstring:literal,
        $name:ident,
        $check:ident,
        $what:literal $(,)?
    ) => {
        #[doc = $docstring]
        #[derive(Clone, Debug)]
        pub struct $name(QuOperator);

        impl $name {
            /// Wrap an operator, checking that it has the required structure.
            pub fn new_checked(op: QuOperator) -> QuantumResult<Self> {
                op.$check().then_some(Self(op)).ok_or(WrongKind($what))
            }

            /// Unwrap the underlying operator.
            pub fn into_operator(self) -> QuOperator { self.0 }
        }

        impl Deref for $name {
            type Target = QuOperator;

            fn deref(&self) -> &Self::Target { &self.0 }
        }

        impl DerefMut for $name {
            fn deref_mut(&mut self) -> &mut Self::Target { &mut self.0 }
        }

        impl AsRef<QuOperator> for $name {
            fn as_ref(&self) -> &QuOperator { &self.0 }
        }

        impl From<$name> for QuOperator {
            fn from(x: $name) -> Self { x.0 }
        }
    }
}

specialization!(
    "A [`QuOperator`] with no input edges, representing a column vector.",
    QuVector, is_vector, "vector",
);

specialization!(
    "A [`QuOperator`] with no output edges, representing a row vector.",
    QuAdjointVector, is_adjoint_vector, "adjoint vector",
);

specialization!(
    "A [`QuOperator`] with no edges at all, representing a number.",
    QuScalar, is_scalar, "scalar",
);

impl QuVector {
    /// Construct a vector from a single tensor, using the axes in
    /// `subsystem_axes` (all axes by default) as output edges.
    pub fn from_tensor(tensor: nd::ArrayD<C64>, subsystem_axes: Option<&[usize]>)
        -> QuantumResult<Self>
    {
        let axes: Vec<usize>
            = subsystem_axes.map(|axes| axes.to_vec())
            .unwrap_or_else(|| (0..tensor.ndim()).collect());
        let mut net = Network::new();
        let n = net.push(tensor, "vector");
        let out_edges = axes.iter().map(|k| Edge::new(n, *k)).collect();
        Self::new_checked(QuOperator::new(net, out_edges, vec![], [n], [])?)
    }

    /// Return the edges of the vector's subsystems.
    pub fn subsystem_edges(&self) -> &[Edge] { self.out_edges() }

    /// Return the dimensions of the vector's subsystems.
    pub fn space(&self) -> Vec<usize> { self.out_space() }

    /// Return the projector `|v⟩⟨v|`.
    pub fn projector(&self) -> QuantumResult<QuObject> {
        self.matmul(&*self.adjoint()?)
    }

    /// Return the projector with the given subsystems traced out.
    pub fn reduced_density(&self, subsystems: &[usize])
        -> QuantumResult<QuObject>
    {
        self.projector()?.partial_trace(subsystems)
    }
}

impl QuAdjointVector {
    /// Construct an adjoint vector from a single tensor, using the axes in
    /// `subsystem_axes` (all axes by default) as input edges.
    pub fn from_tensor(tensor: nd::ArrayD<C64>, subsystem_axes: Option<&[usize]>)
        -> QuantumResult<Self>
    {
        let axes: Vec<usize>
            = subsystem_axes.map(|axes| axes.to_vec())
            .unwrap_or_else(|| (0..tensor.ndim()).collect());
        let mut net = Network::new();
        let n = net.push(tensor, "adjoint-vector");
        let in_edges = axes.iter().map(|k| Edge::new(n, *k)).collect();
        Self::new_checked(QuOperator::new(net, vec![], in_edges, [n], [])?)
    }

    /// Return the edges of the vector's subsystems.
    pub fn subsystem_edges(&self) -> &[Edge] { self.in_edges() }

    /// Return the dimensions of the vector's subsystems.
    pub fn space(&self) -> Vec<usize> { self.in_space() }

    /// Return the projector `|v⟩⟨v|`, where `self` is `⟨v|`.
    pub fn projector(&self) -> QuantumResult<QuObject> {
        self.adjoint()?.matmul(self)
    }

    /// Return the projector with the given subsystems traced out.
    pub fn reduced_density(&self, subsystems: &[usize])
        -> QuantumResult<QuObject>
    {
        self.projector()?.partial_trace(subsystems)
    }
}

impl QuScalar {
    /// Wrap a number.
    pub fn new(val: C64) -> Self {
        let mut net = Network::new();
        let n = net.push_scalar(val, "scalar");
        let ref_nodes: HashSet<Id> = [n].into_iter().collect();
        Self(QuOperator {
            net,
            out_edges: vec![],
            in_edges: vec![],
            ref_nodes,
            ignore_edges: vec![],
        })
    }

    /// Wrap a rank-0 tensor.
    pub fn from_tensor(tensor: nd::ArrayD<C64>) -> QuantumResult<Self> {
        if tensor.ndim() != 0 { return Err(NonScalarTensor(tensor.ndim())); }
        Ok(Self::new(tensor.iter().next().copied().unwrap_or_default()))
    }

    /// Evaluate a copy of `self` to a number.
    pub fn value(&self) -> QuantumResult<C64> {
        let t = self.to_dense()?;
        Ok(t.iter().next().copied().unwrap_or_default())
    }
}

/// A [`QuOperator`] classified by its structure.
///
/// Dereferences to the underlying operator, so all operator methods can be
/// called on it directly.
#[derive(Clone, Debug)]
pub enum QuObject {
    Operator(QuOperator),
    Vector(QuVector),
    AdjointVector(QuAdjointVector),
    Scalar(QuScalar),
}

impl From<QuOperator> for QuObject {
    fn from(op: QuOperator) -> Self {
        match (op.out_edges.is_empty(), op.in_edges.is_empty()) {
            (true, true) => Self::Scalar(QuScalar(op)),
            (false, true) => Self::Vector(QuVector(op)),
            (true, false) => Self::AdjointVector(QuAdjointVector(op)),
            (false, false) => Self::Operator(op),
        }
    }
}

impl From<QuObject> for QuOperator {
    fn from(obj: QuObject) -> Self { obj.into_operator() }
}

impl Deref for QuObject {
    type Target = QuOperator;

    fn deref(&self) -> &Self::Target {
        match self {
            Self::Operator(op) => op,
            Self::Vector(v) => v,
            Self::AdjointVector(v) => v,
            Self::Scalar(s) => s,
        }
    }
}

impl DerefMut for QuObject {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match self {
            Self::Operator(op) => op,
            Self::Vector(v) => v,
            Self::AdjointVector(v) => v,
            Self::Scalar(s) => s,
        }
    }
}

impl QuObject {
    /// Unwrap the underlying operator.
    pub fn into_operator(self) -> QuOperator {
        match self {
            Self::Operator(op) => op,
            Self::Vector(v) => v.0,
            Self::AdjointVector(v) => v.0,
            Self::Scalar(s) => s.0,
        }
    }

    pub fn into_vector(self) -> Option<QuVector> {
        match self {
            Self::Vector(v) => Some(v),
            _ => None,
        }
    }

    pub fn into_adjoint_vector(self) -> Option<QuAdjointVector> {
        match self {
            Self::AdjointVector(v) => Some(v),
            _ => None,
        }
    }

    pub fn into_scalar(self) -> Option<QuScalar> {
        match self {
            Self::Scalar(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_vector(&self) -> Option<&QuVector> {
        match self {
            Self::Vector(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_adjoint_vector(&self) -> Option<&QuAdjointVector> {
        match self {
            Self::AdjointVector(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_scalar(&self) -> Option<&QuScalar> {
        match self {
            Self::Scalar(s) => Some(s),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::assert_approx_eq;
    use rand::{ Rng, SeedableRng, rngs::StdRng };

    fn random_tensor(shape: &[usize], rng: &mut StdRng) -> nd::ArrayD<C64> {
        nd::ArrayD::from_shape_simple_fn(
            shape.to_vec(),
            || C64::new(rng.gen::<f64>() - 0.5, rng.gen::<f64>() - 0.5),
        )
    }

    fn assert_close(a: &nd::Array2<C64>, b: &nd::Array2<C64>) {
        assert_eq!(a.shape(), b.shape());
        a.iter().zip(b.iter())
            .for_each(|(x, y)| assert!((x - y).norm() < 1e-10, "{} != {}", x, y));
    }

    fn kron(a: &nd::Array2<C64>, b: &nd::Array2<C64>) -> nd::Array2<C64> {
        let (ra, ca) = a.dim();
        let (rb, cb) = b.dim();
        nd::Array2::from_shape_fn(
            (ra * rb, ca * cb),
            |(i, j)| a[[i / rb, j / cb]] * b[[i % rb, j % cb]],
        )
    }

    fn x_mat() -> nd::Array2<C64> {
        nd::array![
            [C64::new(0.0, 0.0), C64::new(1.0, 0.0)],
            [C64::new(1.0, 0.0), C64::new(0.0, 0.0)],
        ]
    }

    #[test]
    fn classification() {
        let mut rng = StdRng::seed_from_u64(10546);
        let op = QuOperator::from_tensor(random_tensor(&[2, 2], &mut rng), None, None)
            .unwrap();
        assert!(matches!(op, QuObject::Operator(_)));
        let v = QuOperator::from_tensor(
            random_tensor(&[2, 3], &mut rng), Some(&[0, 1]), None).unwrap();
        assert!(matches!(v, QuObject::Vector(_)));
        let w = QuOperator::from_tensor(
            random_tensor(&[2, 3], &mut rng), None, Some(&[0, 1])).unwrap();
        assert!(matches!(w, QuObject::AdjointVector(_)));
        assert!(matches!(v.adjoint().unwrap(), QuObject::AdjointVector(_)));
        let s = w.matmul(&v.adjoint().unwrap().adjoint().unwrap()).unwrap();
        assert!(matches!(s, QuObject::Scalar(_)));
        assert!(s.is_scalar() && s.is_vector() && s.is_adjoint_vector());
    }

    #[test]
    fn adjoint_round_trip() {
        let mut rng = StdRng::seed_from_u64(10546);
        let a = QuOperator::from_tensor(
            random_tensor(&[2, 2, 2, 2], &mut rng), None, None).unwrap();
        let aa = a.adjoint().unwrap().adjoint().unwrap();
        assert_close(&a.to_matrix().unwrap(), &aa.to_matrix().unwrap());
        let m = a.to_matrix().unwrap();
        let mh = a.adjoint().unwrap().to_matrix().unwrap();
        assert_close(&mh, &m.t().mapv(|z| z.conj()));
    }

    #[test]
    fn associativity_and_identity() {
        let mut rng = StdRng::seed_from_u64(10546);
        let a = QuOperator::from_tensor(
            random_tensor(&[2, 3, 2, 2], &mut rng), None, None).unwrap();
        let b = QuOperator::from_tensor(
            random_tensor(&[2, 2, 3, 2], &mut rng), None, None).unwrap();
        let c = QuOperator::from_tensor(
            random_tensor(&[3, 2, 2, 2], &mut rng), None, None).unwrap();
        let left = a.matmul(&b).unwrap().matmul(&c).unwrap();
        let right = a.matmul(&b.matmul(&c).unwrap()).unwrap();
        assert_close(&left.to_matrix().unwrap(), &right.to_matrix().unwrap());
        let dense = a.to_matrix().unwrap()
            .dot(&b.to_matrix().unwrap())
            .dot(&c.to_matrix().unwrap());
        assert_close(&left.to_matrix().unwrap(), &dense);

        let id = QuOperator::identity(&a.in_space()).unwrap();
        let aid = a.matmul(&id).unwrap();
        assert_close(&aid.to_matrix().unwrap(), &a.to_matrix().unwrap());
        let ida = QuOperator::identity(&a.out_space()).unwrap().matmul(&a).unwrap();
        assert_close(&ida.to_matrix().unwrap(), &a.to_matrix().unwrap());
    }

    #[test]
    fn self_composition_does_not_alias() {
        let mut rng = StdRng::seed_from_u64(10546);
        let a = QuOperator::from_tensor(
            random_tensor(&[2, 2], &mut rng), None, None).unwrap();
        let before = a.to_matrix().unwrap();
        let aa = a.matmul(&a).unwrap();
        assert_close(&aa.to_matrix().unwrap(), &before.dot(&before));
        assert_close(&a.to_matrix().unwrap(), &before);
        assert_eq!(a.network().count_nodes(), 1);
    }

    #[test]
    fn identity_trace() {
        for k in 1..=4 {
            let id = QuOperator::identity(&vec![2; k]).unwrap();
            let tr = id.trace().unwrap().into_scalar().unwrap();
            assert_approx_eq!(f64, tr.value().unwrap().re, 2.0_f64.powi(k as i32));
        }
        let id = QuOperator::identity(&[2, 3]).unwrap();
        let mut idid = id.matmul(&id).unwrap();
        let m = idid.eval_matrix(None).unwrap();
        assert_close(&m, &nd::Array2::<f64>::eye(6).mapv(C64::from));
        assert_eq!(idid.nodes().len(), 1);
    }

    #[test]
    fn partial_trace_keeps_order() {
        let mut rng = StdRng::seed_from_u64(10546);
        let a = random_tensor(&[2, 2], &mut rng).into_dimensionality::<nd::Ix2>()
            .unwrap();
        let b = random_tensor(&[3, 3], &mut rng).into_dimensionality::<nd::Ix2>()
            .unwrap();
        let qa = QuOperator::from_tensor(a.clone().into_dyn(), None, None).unwrap();
        let qb = QuOperator::from_tensor(b.clone().into_dyn(), None, None).unwrap();
        let ab = (&*qa | &*qb).unwrap();
        assert_close(&ab.to_matrix().unwrap(), &kron(&a, &b));
        let tr_a = a[[0, 0]] + a[[1, 1]];
        let rb = ab.partial_trace(&[0]).unwrap();
        assert_eq!(rb.out_space(), vec![3]);
        assert_close(&rb.to_matrix().unwrap(), &b.mapv(|z| z * tr_a));
    }

    #[test]
    fn partial_trace_errors() {
        let t = nd::ArrayD::<C64>::zeros(vec![2, 3]);
        let op = QuOperator::from_tensor(t, None, None).unwrap();
        assert!(matches!(op.partial_trace(&[0]), Err(SpaceDim(0, 3, 2))));
        assert!(matches!(op.partial_trace(&[1]), Err(IndexOutOfRange(1, 1))));

        // every traced pair is looked up, so the mismatch is reported at the
        // right position rather than as a short dimension list
        let t = nd::ArrayD::<C64>::zeros(vec![2, 3, 2, 2]);
        let op = QuOperator::from_tensor(t, None, None).unwrap();
        assert!(matches!(op.partial_trace(&[0, 1]), Err(SpaceDim(1, 2, 3))));
        let rest = op.partial_trace(&[0]).unwrap();
        assert_eq!(rest.out_space(), vec![3]);
        assert_eq!(rest.in_space(), vec![2]);
    }

    #[test]
    fn scalar_products() {
        let x = QuOperator::from_tensor(x_mat().into_dyn(), None, None).unwrap();
        assert!(matches!(x.mul(&x), Err(NonScalarProduct)));
        let two = QuScalar::new(C64::new(2.0, 0.0));
        let x2 = x.mul(&two).unwrap();
        assert_close(&x2.to_matrix().unwrap(), &x_mat().mapv(|z| z * 2.0));
        let x3 = (C64::new(0.0, 3.0) * &*x).unwrap();
        assert_close(
            &x3.to_matrix().unwrap(),
            &x_mat().mapv(|z| z * C64::new(0.0, 3.0)),
        );
        assert!(matches!(
            x.mul_tensor(nd::ArrayD::zeros(vec![2])),
            Err(NonScalarTensor(1)),
        ));
        let x4 = x.mul_tensor(nd::arr0(C64::new(4.0, 0.0)).into_dyn()).unwrap();
        assert_close(&x4.to_matrix().unwrap(), &x_mat().mapv(|z| z * 4.0));
    }

    #[test]
    fn local_tensor_embedding() {
        let op = QuOperator::from_local_tensor(
            x_mat().into_dyn(), &[2, 2], &[1], None, None).unwrap();
        let eye = nd::Array2::<f64>::eye(2).mapv(C64::from);
        assert_close(&op.to_matrix().unwrap(), &kron(&eye, &x_mat()));
        assert!(matches!(
            QuOperator::from_local_tensor(
                x_mat().into_dyn(), &[2, 2], &[2], None, None),
            Err(IndexOutOfRange(2, 2)),
        ));
    }

    #[test]
    fn vector_projector_and_norm() {
        let psi = nd::array![C64::new(0.6, 0.0), C64::new(0.0, 0.8)].into_dyn();
        let v = QuVector::from_tensor(psi, None).unwrap();
        let p = v.projector().unwrap().to_matrix().unwrap();
        assert_approx_eq!(f64, p[[0, 0]].re, 0.36, epsilon = 1e-12);
        assert_approx_eq!(f64, p[[1, 1]].re, 0.64, epsilon = 1e-12);
        assert_approx_eq!(f64, p[[1, 0]].im, 0.48, epsilon = 1e-12);
        let n = v.norm().unwrap().into_scalar().unwrap().value().unwrap();
        assert_approx_eq!(f64, n.re, 1.0, epsilon = 1e-12);

        let w = QuAdjointVector::from_tensor(
            nd::array![C64::new(0.6, 0.0), C64::new(0.0, 0.8)].into_dyn(),
            None,
        ).unwrap();
        let q = w.projector().unwrap().to_matrix().unwrap();
        assert_approx_eq!(f64, q[[1, 0]].im, -0.48, epsilon = 1e-12);
    }

    #[test]
    fn invariants_are_checked() {
        let mut net = Network::new();
        let a = net.push(x_mat().into_dyn(), "a");
        let b = net.push(x_mat().into_dyn(), "b");
        net.connect(Edge::new(a, 1), Edge::new(b, 0)).unwrap();
        let bad = QuOperator::new(
            net.clone(), vec![Edge::new(a, 0)], vec![Edge::new(a, 1)], [], []);
        assert!(matches!(bad, Err(NotDangling(_))));
        let bad = QuOperator::new(
            net.clone(), vec![Edge::new(a, 0)], vec![], [], []);
        assert!(matches!(bad, Err(UntrackedEdges(_))));
        let ok = QuOperator::new(
            net.clone(), vec![Edge::new(a, 0)], vec![], [], [Edge::new(b, 1)]);
        assert!(ok.is_ok());
        let bad = QuOperator::new(Network::new(), vec![], vec![], [], []);
        assert!(matches!(bad, Err(EmptyScalar)));
    }

    #[test]
    fn eval_with_ignored_edges() {
        let mut rng = StdRng::seed_from_u64(10546);
        let t = random_tensor(&[3, 2, 2], &mut rng);
        let mut net = Network::new();
        let n = net.push(t.clone(), "batched");
        let mut op = QuOperator::new(
            net, vec![Edge::new(n, 1)], vec![Edge::new(n, 2)], [], [Edge::new(n, 0)])
            .unwrap();
        let res = op.eval(None).unwrap();
        assert_eq!(res.shape(), &[3, 2, 2]);
        assert_eq!(res, t);
    }
}
