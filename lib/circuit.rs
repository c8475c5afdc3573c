//! Tensor-network simulation of qubit circuits.
//!
//! A [`Circuit`] holds a [`Network`] in which every qubit starts as a
//! single-leg `∣0⟩` node (or all qubits share one input-state node), and keeps
//! a *front*: the dangling edge currently carrying each qubit. Applying a gate
//! adds its node(s), connects their input legs to the front and moves the
//! front to their output legs. Nothing is contracted until an observable is
//! requested.

use std::collections::BTreeMap;
use ndarray as nd;
use num_complex::Complex64 as C64;
use rand::Rng;
use crate::{
    backend::{ Backend, DenseBackend },
    gate::{ XMAT, YMAT, ZMAT, matrix_to_tensor },
    ir::{
        AbstractCircuit,
        Absorb,
        CircuitParams,
        GateOperand,
        IrError,
        IrRecord,
        IrResult,
        SplitConfig,
        check_index,
    },
    network::{ Edge, Network, NetworkError },
    quantum::{ QuOperator, QuVector, QuantumError },
};

/// Number of singular values to keep under a split policy.
///
/// Values that aren't normal or fall below machine epsilon are always dropped;
/// at least one value is kept.
pub fn truncation_rank(s: &[f64], split: &SplitConfig) -> usize {
    let eps = f64::EPSILON;
    let mut rank
        = s.iter()
        .take_while(|sj| sj.is_normal() && **sj > eps)
        .count()
        .max(1);
    if let Some(max) = split.max_singular_values {
        rank = rank.min(max.max(1));
    }
    if let Some(err) = split.max_truncation_err {
        let bound
            = if split.relative {
                err.abs() * s.first().copied().unwrap_or(0.0)
            } else {
                err.abs()
            };
        let mut discarded: f64 = 0.0;
        while rank > 1 {
            let next = discarded + s[rank - 1].powi(2);
            if next.sqrt() > bound { break; }
            discarded = next;
            rank -= 1;
        }
    }
    rank
}

/// A qubit circuit built as a tensor network.
#[derive(Clone, Debug)]
pub struct Circuit {
    net: Network,
    nqubits: usize,
    front: Vec<Edge>,
    inputs: Option<nd::Array1<C64>>,
    qir: Vec<IrRecord>,
    backend: DenseBackend,
}

impl Circuit {
    /// Create a new circuit of `nqubits` qubits in `∣0…0⟩`.
    pub fn new(nqubits: usize) -> Self {
        let mut net = Network::new();
        let zero = nd::array![C64::new(1.0, 0.0), C64::new(0.0, 0.0)].into_dyn();
        let front: Vec<Edge>
            = (0..nqubits)
            .map(|k| Edge::new(net.push(zero.clone(), format!("qb-{}", k)), 0))
            .collect();
        Self {
            net,
            nqubits,
            front,
            inputs: None,
            qir: Vec::new(),
            backend: DenseBackend::default(),
        }
    }

    /// Create a new circuit starting in the state `inputs`, whose length must
    /// be a power of two.
    pub fn from_inputs(inputs: nd::Array1<C64>) -> IrResult<Self> {
        let len = inputs.len();
        if !len.is_power_of_two() { return Err(IrError::BadInputs(len, 0)); }
        let nqubits = len.trailing_zeros() as usize;
        let mut net = Network::new();
        let data: Vec<C64> = inputs.iter().copied().collect();
        let state = nd::ArrayD::from_shape_vec(vec![2; nqubits], data)?;
        let id = net.push(state, "inputs");
        let front: Vec<Edge> = (0..nqubits).map(|k| Edge::new(id, k)).collect();
        Ok(Self {
            net,
            nqubits,
            front,
            inputs: Some(inputs),
            qir: Vec::new(),
            backend: DenseBackend::default(),
        })
    }

    /// Return the input state, if one was given.
    pub fn inputs(&self) -> Option<&nd::Array1<C64>> { self.inputs.as_ref() }

    /// Return the underlying network.
    pub fn network(&self) -> &Network { &self.net }

    /// Return the dangling edge carrying each qubit.
    pub fn front(&self) -> &[Edge] { &self.front }

    /// Return the number of nodes in the network.
    pub fn count_nodes(&self) -> usize { self.net.count_nodes() }

    fn apply_tensor(&mut self, tensor: nd::ArrayD<C64>, index: &[usize], name: &str)
        -> IrResult<()>
    {
        let k = index.len();
        if tensor.ndim() != 2 * k || tensor.shape().iter().any(|d| *d != 2) {
            return Err(IrError::BadOperand(k));
        }
        let id = self.net.push(tensor, name);
        for (j, q) in index.iter().enumerate() {
            self.net.connect(Edge::new(id, k + j), self.front[*q])?;
            self.front[*q] = Edge::new(id, j);
        }
        Ok(())
    }

    // two-qubit gate as two nodes joined by a truncated bond
    fn apply_split(
        &mut self,
        tensor: nd::ArrayD<C64>,
        index: &[usize],
        name: &str,
        split: &SplitConfig,
    ) -> IrResult<()>
    {
        if tensor.shape() != [2, 2, 2, 2] { return Err(IrError::BadOperand(2)); }
        // rows (o0, i0), cols (o1, i1)
        let data: Vec<C64>
            = tensor.permuted_axes(vec![0, 2, 1, 3]).iter().copied().collect();
        let m = nd::Array2::from_shape_vec((4, 4), data)?;
        let (u, s, vh) = self.backend.svd(&m)?;
        let s = s.to_vec();
        let rank = truncation_rank(&s, split);
        let (wl, wr): (Vec<f64>, Vec<f64>)
            = match split.fixed_choice {
                Some(Absorb::Left) => (s[..rank].to_vec(), vec![1.0; rank]),
                Some(Absorb::Right) => (vec![1.0; rank], s[..rank].to_vec()),
                None => {
                    let sq: Vec<f64> = s[..rank].iter().map(|x| x.sqrt()).collect();
                    (sq.clone(), sq)
                },
            };
        let left: nd::ArrayD<C64>
            = nd::Array3::from_shape_fn(
                (2, 2, rank), |(o, i, b)| u[[2 * o + i, b]] * wl[b])
            .into_dyn();
        let right: nd::ArrayD<C64>
            = nd::Array3::from_shape_fn(
                (rank, 2, 2), |(b, o, i)| vh[[b, 2 * o + i]] * wr[b])
            .into_dyn();
        let l = self.net.push(left, format!("{}-l", name));
        let r = self.net.push(right, format!("{}-r", name));
        self.net.connect(Edge::new(l, 2), Edge::new(r, 0))?;
        self.net.connect(Edge::new(l, 1), self.front[index[0]])?;
        self.front[index[0]] = Edge::new(l, 0);
        self.net.connect(Edge::new(r, 2), self.front[index[1]])?;
        self.front[index[1]] = Edge::new(r, 1);
        Ok(())
    }

    // graft a copy of the operator's network onto the front
    fn apply_operator(&mut self, op: &QuOperator, index: &[usize]) -> IrResult<()> {
        let k = index.len();
        if op.out_edges().len() != k || op.in_edges().len() != k {
            return Err(IrError::BadOperand(k));
        }
        let (_, edge_map)
            = op.network().copy_into(&op.nodes(), false, &mut self.net)?;
        let map = |e: &Edge| -> IrResult<Edge> {
            edge_map.get(e).copied()
                .ok_or(NetworkError::MissingAxis(e.node.0, e.axis).into())
        };
        for (j, q) in index.iter().enumerate() {
            let e_in = map(&op.in_edges()[j])?;
            let e_out = map(&op.out_edges()[j])?;
            self.net.connect(e_in, self.front[*q])?;
            self.front[*q] = e_out;
        }
        Ok(())
    }

    /// Return the output state as a vector operator, leaving `self`
    /// untouched.
    pub fn quvector(&self) -> IrResult<QuVector> {
        let op = QuOperator::new(
            self.net.clone(), self.front.clone(), vec![], self.net.ids(), [])?;
        Ok(QuVector::new_checked(op)?)
    }

    /// Contract the network and return the output state.
    ///
    /// Qubit 0 is the most significant bit of the basis index.
    pub fn state(&self) -> IrResult<nd::Array1<C64>> {
        let mut psi = self.quvector()?.into_operator();
        let t = psi.eval(None)?;
        Ok(t.iter().copied().collect())
    }

    /// Return the probabilities of all computational basis states.
    pub fn probability(&self) -> IrResult<nd::Array1<f64>> {
        Ok(self.state()?.mapv(|a| a.norm_sqr()))
    }

    /// Return the circuit's unitary as an operator, by replaying the gate log
    /// on identity inputs.
    ///
    /// The input state of `self` is not included.
    pub fn quoperator(&self) -> IrResult<QuOperator> {
        let mut net = Network::new();
        let ins: Vec<Edge>
            = (0..self.nqubits)
            .map(|k| Edge::new(net.push_copy(2, 2, format!("in-{}", k)), 1))
            .collect();
        let front: Vec<Edge> = ins.iter().map(|e| Edge::new(e.node, 0)).collect();
        let mut replay = Self {
            net,
            nqubits: self.nqubits,
            front,
            inputs: None,
            qir: Vec::new(),
            backend: self.backend,
        };
        replay.append_from_qir(&self.qir)?;
        let Self { net, front, .. } = replay;
        Ok(QuOperator::new(net, front, ins, [], [])?)
    }

    /// Return the circuit's unitary as a dense matrix.
    pub fn matrix(&self) -> IrResult<nd::Array2<C64>> {
        Ok(self.quoperator()?.to_matrix()?)
    }

    /// Compute `⟨ψ∣ O_m ⋯ O_1 ∣ψ⟩` for the output state `∣ψ⟩`, where each
    /// `O_j` is a matrix applied to the listed qubits.
    pub fn expectation(&self, ops: &[(nd::Array2<C64>, Vec<usize>)]) -> IrResult<C64> {
        let space = vec![2; self.nqubits];
        let psi = self.quvector()?.into_operator();
        let mut obs = QuOperator::identity(&space)?.into_operator();
        for (mat, sites) in ops.iter() {
            check_index(sites, self.nqubits)?;
            let local = QuOperator::from_local_tensor(
                matrix_to_tensor(mat)?, &space, sites, None, None)?;
            obs = local.matmul(&obs)?.into_operator();
        }
        let ket = obs.matmul(&psi)?;
        let bra = psi.adjoint()?;
        let val = bra.matmul(&ket)?
            .into_scalar()
            .ok_or(QuantumError::WrongKind("scalar"))?
            .value()?;
        Ok(val)
    }

    /// Expectation value of a Pauli string with X, Y and Z on the given
    /// qubits.
    pub fn expectation_ps(&self, x: &[usize], y: &[usize], z: &[usize])
        -> IrResult<C64>
    {
        let ops: Vec<(nd::Array2<C64>, Vec<usize>)>
            = x.iter().map(|k| (XMAT.clone(), vec![*k]))
            .chain(y.iter().map(|k| (YMAT.clone(), vec![*k])))
            .chain(z.iter().map(|k| (ZMAT.clone(), vec![*k])))
            .collect();
        self.expectation(&ops)
    }

    /// Sample `shots` measurements of all qubits in the computational basis,
    /// returning counts keyed by bit string with qubit 0 leftmost.
    pub fn sample<R>(&self, shots: usize, rng: &mut R) -> IrResult<BTreeMap<String, u64>>
    where R: Rng + ?Sized
    {
        let probs = self.probability()?.to_vec();
        let mut counts: BTreeMap<String, u64> = BTreeMap::new();
        self.backend.sample_categorical(&probs, shots, rng)?
            .into_iter()
            .for_each(|k| {
                let key = format!("{:0w$b}", k, w = self.nqubits);
                *counts.entry(key).or_insert(0) += 1;
            });
        Ok(counts)
    }
}

impl AbstractCircuit for Circuit {
    fn from_params(params: &CircuitParams) -> IrResult<Self> {
        match (params.nqubits, &params.inputs) {
            (Some(n), None) => Ok(Self::new(n)),
            (n, Some(inputs)) => {
                let circuit = Self::from_inputs(inputs.clone())?;
                match n {
                    Some(n) if n != circuit.nqubits
                        => Err(IrError::BadInputs(inputs.len(), n)),
                    _ => Ok(circuit),
                }
            },
            (None, None) => Err(IrError::UnknownSize),
        }
    }

    fn nqubits(&self) -> usize { self.nqubits }

    fn qir(&self) -> &[IrRecord] { &self.qir }

    fn circuit_params(&self) -> CircuitParams {
        CircuitParams { nqubits: Some(self.nqubits), inputs: self.inputs.clone() }
    }

    fn apply_general_gate(
        &mut self,
        gate: GateOperand,
        index: &[usize],
        name: &str,
        split: Option<&SplitConfig>,
        _mpo: bool,
        record: IrRecord,
    ) -> IrResult<()>
    {
        check_index(index, self.nqubits)?;
        match (gate, split) {
            (GateOperand::Tensor(t), Some(split)) if index.len() == 2
                => self.apply_split(t, index, name, split)?,
            (GateOperand::Tensor(t), _) => self.apply_tensor(t, index, name)?,
            (GateOperand::Operator(op), _) => self.apply_operator(&op, index)?,
        }
        self.qir.push(record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::assert_approx_eq;
    use rand::{ SeedableRng, rngs::StdRng };
    use crate::gate::{ HMAT, TOFFOLIMAT, haar };

    fn assert_vec_close(a: &nd::Array1<C64>, b: &nd::Array1<C64>, eps: f64) {
        assert_eq!(a.len(), b.len());
        a.iter().zip(b.iter())
            .for_each(|(x, y)| assert!((x - y).norm() < eps, "{} != {}", x, y));
    }

    fn c(re: f64, im: f64) -> C64 { C64::new(re, im) }

    #[test]
    fn bell_state() {
        let mut circ = Circuit::new(2);
        circ.h(0).unwrap();
        circ.cnot(0, 1).unwrap();
        let r = std::f64::consts::FRAC_1_SQRT_2;
        let expect = nd::array![c(r, 0.0), c(0.0, 0.0), c(0.0, 0.0), c(r, 0.0)];
        assert_vec_close(&circ.state().unwrap(), &expect, 1e-12);
        let p = circ.probability().unwrap();
        assert_approx_eq!(f64, p[0], 0.5, epsilon = 1e-12);
        assert_approx_eq!(f64, p[1], 0.0, epsilon = 1e-12);
        // observables leave the network in place
        assert_eq!(circ.count_nodes(), 4);
    }

    #[test]
    fn untouched_qubits() {
        let mut circ = Circuit::new(3);
        circ.x(1).unwrap();
        let psi = circ.state().unwrap();
        assert_approx_eq!(f64, psi[0b010].re, 1.0, epsilon = 1e-12);
        assert_approx_eq!(f64, circ.expectation_ps(&[], &[], &[0]).unwrap().re, 1.0,
            epsilon = 1e-12);
        assert_approx_eq!(f64, circ.expectation_ps(&[], &[], &[1]).unwrap().re, -1.0,
            epsilon = 1e-12);
    }

    #[test]
    fn split_gates() {
        let mut rng = StdRng::seed_from_u64(10546);
        let u = haar(2, &mut rng);
        let mut whole = Circuit::new(2);
        whole.h(0).unwrap();
        whole.any(&[0, 1], u.clone()).unwrap();
        for choice in [None, Some(Absorb::Left), Some(Absorb::Right)] {
            let split = SplitConfig { fixed_choice: choice, ..Default::default() };
            let mut parts = Circuit::new(2);
            parts.h(0).unwrap();
            parts.apply_with("any", &[0, 1], Some(crate::params!{ "unitary" => u.clone() }),
                Some(split)).unwrap();
            assert_eq!(parts.count_nodes(), 5);
            assert_vec_close(&parts.state().unwrap(), &whole.state().unwrap(), 1e-10);
        }

        // cnot has operator-Schmidt rank 2; keeping one value changes it
        let mut trunc = Circuit::new(2);
        trunc.h(0).unwrap();
        trunc.apply_with("cnot", &[0, 1], None,
            Some(SplitConfig { max_singular_values: Some(1), ..Default::default() }))
            .unwrap();
        let psi = trunc.state().unwrap();
        // a rank-1 operator keeps a product state a product state
        assert!((psi[0] * psi[3] - psi[1] * psi[2]).norm() < 1e-10);
    }

    #[test]
    fn truncation_policy() {
        let s = [4.0, 2.0, 0.5, 0.1, 0.0];
        assert_eq!(truncation_rank(&s, &SplitConfig::default()), 4);
        let cfg = SplitConfig { max_singular_values: Some(2), ..Default::default() };
        assert_eq!(truncation_rank(&s, &cfg), 2);
        let cfg = SplitConfig { max_truncation_err: Some(0.6), ..Default::default() };
        assert_eq!(truncation_rank(&s, &cfg), 2);
        let cfg = SplitConfig {
            max_truncation_err: Some(0.1), relative: true, ..Default::default()
        };
        assert_eq!(truncation_rank(&s, &cfg), 3);
    }

    #[test]
    fn mpo_gates() {
        let mut a = Circuit::new(3);
        let mut b = Circuit::new(3);
        for circ in [&mut a, &mut b] {
            circ.h(0).unwrap();
            circ.h(1).unwrap();
        }
        a.multicontrol(&[0, 1, 2], vec![1, 1], XMAT.clone()).unwrap();
        b.toffoli(0, 1, 2).unwrap();
        assert!(a.qir()[2].mpo);
        assert_vec_close(&a.state().unwrap(), &b.state().unwrap(), 1e-10);
        let mut m = Circuit::new(3);
        m.mpo(&[0, 1, 2], TOFFOLIMAT.clone()).unwrap();
        let mat = m.matrix().unwrap();
        mat.iter().zip(TOFFOLIMAT.iter())
            .for_each(|(x, y)| assert!((x - y).norm() < 1e-10));
    }

    #[test]
    fn unitary_matrix() {
        let mut circ = Circuit::new(2);
        circ.h(0).unwrap();
        circ.cnot(0, 1).unwrap();
        let mat = circ.matrix().unwrap();
        let h_i: nd::Array2<C64>
            = nd::Array2::from_shape_fn((4, 4), |(i, j)| {
                if i % 2 == j % 2 { HMAT[[i / 2, j / 2]] } else { c(0.0, 0.0) }
            });
        let expect = crate::gate::CXMAT.dot(&h_i);
        mat.iter().zip(expect.iter())
            .for_each(|(x, y)| assert!((x - y).norm() < 1e-10));
        // a qubit with no gates contributes an identity factor
        let mut lone = Circuit::new(2);
        lone.x(0).unwrap();
        let mat = lone.matrix().unwrap();
        assert_approx_eq!(f64, mat[[2, 0]].re, 1.0, epsilon = 1e-12);
        assert_approx_eq!(f64, mat[[3, 1]].re, 1.0, epsilon = 1e-12);
        assert_approx_eq!(f64, mat[[0, 0]].norm(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn input_states() {
        let r = std::f64::consts::FRAC_1_SQRT_2;
        let inputs = nd::array![c(r, 0.0), c(0.0, 0.0), c(0.0, 0.0), c(0.0, r)];
        let mut circ
            = Circuit::from_params(&CircuitParams::with_inputs(inputs.clone())).unwrap();
        assert_eq!(circ.nqubits(), 2);
        circ.cnot(0, 1).unwrap();
        circ.h(0).unwrap();
        let psi = circ.state().unwrap();
        // H on qubit 0 after (|00> + i|10>)/sqrt2
        assert_approx_eq!(f64, psi[0].re, 0.5, epsilon = 1e-12);
        assert_approx_eq!(f64, psi[2].re, 0.5, epsilon = 1e-12);
        assert_approx_eq!(f64, psi[0].im, 0.5, epsilon = 1e-12);
        assert_approx_eq!(f64, psi[2].im, -0.5, epsilon = 1e-12);
        assert!(matches!(
            Circuit::from_params(&CircuitParams { nqubits: Some(3), inputs: Some(inputs) }),
            Err(IrError::BadInputs(4, 3)),
        ));
        assert!(matches!(
            Circuit::from_params(&CircuitParams::default()),
            Err(IrError::UnknownSize),
        ));
    }

    #[test]
    fn sampling() {
        let mut rng = StdRng::seed_from_u64(10546);
        let mut circ = Circuit::new(3);
        circ.x(0).unwrap();
        circ.h(2).unwrap();
        let counts = circ.sample(2000, &mut rng).unwrap();
        assert_eq!(counts.len(), 2);
        assert_eq!(counts.values().sum::<u64>(), 2000);
        assert!(counts["100"] > 800 && counts["101"] > 800);
    }
}
