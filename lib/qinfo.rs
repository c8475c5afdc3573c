//! Quantum-information quantities computed from states and operators.
//!
//! Functions accept either dense arrays or [`QuOperator`]s through
//! [`Operand`]. Operators are materialized through a copy before any numerics
//! happen, so no argument is ever contracted in place. Linear algebra is
//! delegated to a [`Backend`] passed by the caller.
//!
//! Qubit registers follow the usual big-endian convention: for a state over `n`
//! qubits, qubit 0 is the most significant bit of a basis-state index.

use std::collections::BTreeMap;
use ndarray as nd;
use num_complex::Complex64 as C64;
use num_traits::One;
use rand::Rng;
use thiserror::Error;
use crate::{
    backend::{ Backend, BackendError },
    quantum::{ QuObject, QuOperator, QuantumError },
};

#[derive(Debug, Error)]
pub enum QInfoError {
    /// Returned when an operation is undefined for the given representation.
    #[error("error in qinfo: unsupported: {0}")]
    Unsupported(&'static str),

    /// Returned when a square matrix is required.
    #[error("error in qinfo: expected a square matrix, got {0}x{1}")]
    NotSquare(usize, usize),

    /// Returned when matrices in a product have incompatible shapes.
    #[error("error in qinfo: cannot multiply {0} columns into {1} rows")]
    ShapeMismatch(usize, usize),

    /// Returned when a dimension is not a power of two.
    #[error("error in qinfo: dimension {0} does not describe a register of qubits")]
    NotQubits(usize),

    /// Returned when a cut names a qubit outside the register.
    #[error("error in qinfo: qubit {0} out of range for {1} qubits")]
    BadCut(usize, usize),

    /// Returned when a cut names the same qubit more than once.
    #[error("error in qinfo: qubit {0} listed more than once in a cut")]
    DuplicateCut(usize),

    /// Returned when ensemble weights don't match the traced-out dimension.
    #[error("error in qinfo: expected {0} ensemble weights, got {1}")]
    WeightCount(usize, usize),

    /// Returned for Rényi entropies of order below 2.
    #[error("error in qinfo: Rényi order must be at least 2, got {0}")]
    RenyiOrder(usize),

    /// Returned when a nonempty list of arguments is required.
    #[error("error in qinfo: empty argument list")]
    Empty,

    #[error("backend error: {0}")]
    BackendError(#[from] BackendError),

    #[error("quantum error: {0}")]
    QuantumError(#[from] QuantumError),

    #[error("shape error: {0}")]
    ShapeError(#[from] nd::ShapeError),
}
use QInfoError::*;
pub type QInfoResult<T> = Result<T, QInfoError>;

/// Default regularization for logarithms of eigenvalues.
pub const DEFAULT_EPS: f64 = 1e-12;

/// A dense array or a [`QuOperator`].
#[derive(Clone, Debug)]
pub enum Operand<'a> {
    Dense(nd::ArrayViewD<'a, C64>),
    Operator(&'a QuOperator),
}

impl<'a> From<&'a QuOperator> for Operand<'a> {
    fn from(op: &'a QuOperator) -> Self { Self::Operator(op) }
}

impl<'a> From<&'a QuObject> for Operand<'a> {
    fn from(op: &'a QuObject) -> Self { Self::Operator(op) }
}

impl<'a> From<&'a nd::ArrayD<C64>> for Operand<'a> {
    fn from(a: &'a nd::ArrayD<C64>) -> Self { Self::Dense(a.view()) }
}

impl<'a> From<&'a nd::Array2<C64>> for Operand<'a> {
    fn from(a: &'a nd::Array2<C64>) -> Self { Self::Dense(a.view().into_dyn()) }
}

impl<'a> From<&'a nd::Array1<C64>> for Operand<'a> {
    fn from(a: &'a nd::Array1<C64>) -> Self { Self::Dense(a.view().into_dyn()) }
}

impl<'a> From<nd::ArrayViewD<'a, C64>> for Operand<'a> {
    fn from(a: nd::ArrayViewD<'a, C64>) -> Self { Self::Dense(a) }
}

impl<'a> Operand<'a> {
    pub fn is_operator(&self) -> bool { matches!(self, Self::Operator(..)) }

    /// Materialize as a matrix.
    ///
    /// Operators are evaluated on a copy with rows indexing the output space.
    /// Dense arrays of rank other than 2 are reshaped to a square matrix if
    /// their size allows it.
    pub fn to_matrix(&self) -> QInfoResult<nd::Array2<C64>> {
        match self {
            Self::Operator(op) => Ok(op.to_matrix()?),
            Self::Dense(a) if a.ndim() == 2 => {
                Ok(a.to_owned().into_dimensionality::<nd::Ix2>()?)
            },
            Self::Dense(a) => {
                let size = a.len();
                let d = (size as f64).sqrt().round() as usize;
                if d * d != size { return Err(NotSquare(size, 1)); }
                let data: Vec<C64> = a.iter().copied().collect();
                Ok(nd::Array2::from_shape_vec((d, d), data)?)
            },
        }
    }

    /// Materialize as an array, evaluating operators as matrices.
    pub fn to_array(&self) -> QInfoResult<nd::ArrayD<C64>> {
        match self {
            Self::Operator(op) => Ok(op.to_matrix()?.into_dyn()),
            Self::Dense(a) => Ok(a.to_owned()),
        }
    }
}

/// Qubits to trace out of a register.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Cut {
    /// The first `k` qubits.
    Prefix(usize),
    /// An explicit list of qubits.
    Indices(Vec<usize>),
}

impl Cut {
    /// Return the traced-out qubits.
    pub fn traced(&self) -> Vec<usize> {
        match self {
            Self::Prefix(k) => (0..*k).collect(),
            Self::Indices(idx) => idx.clone(),
        }
    }
}

impl From<usize> for Cut {
    fn from(k: usize) -> Self { Self::Prefix(k) }
}

impl From<Vec<usize>> for Cut {
    fn from(idx: Vec<usize>) -> Self { Self::Indices(idx) }
}

impl From<&[usize]> for Cut {
    fn from(idx: &[usize]) -> Self { Self::Indices(idx.to_vec()) }
}

fn qubits_of(dim: usize) -> QInfoResult<usize> {
    dim.is_power_of_two().then_some(dim.trailing_zeros() as usize)
        .ok_or(NotQubits(dim))
}

fn check_cut(traced: &[usize], n: usize) -> QInfoResult<()> {
    for (j, k) in traced.iter().enumerate() {
        if *k >= n { return Err(BadCut(*k, n)); }
        if traced[..j].contains(k) { return Err(DuplicateCut(*k)); }
    }
    Ok(())
}

fn is_density(shape: &[usize]) -> bool {
    shape.len() == 2 && shape[0] == shape[1]
}

fn trace(m: &nd::Array2<C64>) -> C64 { m.diag().sum() }

fn dagger(m: &nd::Array2<C64>) -> nd::Array2<C64> {
    m.t().mapv(|z| z.conj())
}

// reshape a flat array into `nlegs` qubit axes and permute them
fn permute_qubits(state: &nd::ArrayD<C64>, nlegs: usize, perm: &[usize])
    -> QInfoResult<nd::ArrayD<C64>>
{
    let data: Vec<C64> = state.iter().copied().collect();
    let t = nd::ArrayD::from_shape_vec(vec![2; nlegs], data)?
        .permuted_axes(perm.to_vec());
    Ok(t.as_standard_layout().into_owned())
}

/// Von Neumann entropy `-Σ λ ln(λ + eps)` of a density matrix, with negative
/// eigenvalues clipped to zero.
pub fn entropy<'a, B, O>(be: &B, rho: O, eps: f64) -> QInfoResult<f64>
where
    B: Backend,
    O: Into<Operand<'a>>,
{
    let rho = rho.into().to_matrix()?;
    let lbd = be.eigvalsh(&rho)?;
    Ok(
        -lbd.iter()
            .map(|l| l.max(0.0))
            .map(|l| l * (l + eps).ln())
            .sum::<f64>()
    )
}

/// Trace of the product `O₁ O₂ ⋯ Oₙ`.
///
/// If any argument is an operator, the product is formed by composition of
/// operators and only the final scalar is evaluated.
pub fn trace_product(ops: &[Operand<'_>]) -> QInfoResult<C64> {
    let (first, rest) = ops.split_first().ok_or(Empty)?;
    if ops.iter().any(|op| op.is_operator()) {
        let to_op = |op: &Operand<'_>| -> QInfoResult<QuObject> {
            match op {
                Operand::Operator(op) => Ok(op.copy()?),
                Operand::Dense(a) => {
                    Ok(QuOperator::from_tensor(a.to_owned(), None, None)?)
                },
            }
        };
        let mut prod = to_op(first)?;
        for op in rest.iter() {
            prod = prod.matmul(&*to_op(op)?)?;
        }
        let tr = prod.trace()?;
        if !tr.is_scalar() { return Err(Unsupported("trace of a non-square product")); }
        Ok(tr.to_dense()?.iter().next().copied().unwrap_or_default())
    } else {
        let mut prod = first.to_matrix()?;
        for op in rest.iter() {
            let m = op.to_matrix()?;
            if prod.ncols() != m.nrows() {
                return Err(ShapeMismatch(prod.ncols(), m.nrows()));
            }
            prod = prod.dot(&m);
        }
        let (r, c) = prod.dim();
        if r != c { return Err(NotSquare(r, c)); }
        Ok(trace(&prod))
    }
}

/// Result of [`reduced_density_matrix`], matching the representation of the
/// input state.
#[derive(Clone, Debug)]
pub enum Reduced {
    Matrix(nd::Array2<C64>),
    Operator(QuObject),
}

impl Reduced {
    /// Return the density matrix, evaluating a copy if needed.
    pub fn into_matrix(self) -> QInfoResult<nd::Array2<C64>> {
        match self {
            Self::Matrix(m) => Ok(m),
            Self::Operator(op) => Ok(op.to_matrix()?),
        }
    }
}

/// Reduced density matrix of a qubit register with the qubits named by `cut`
/// traced out.
///
/// `state` may be a density matrix, a pure state vector, or an operator (in
/// which case the result is its partial trace). Optional ensemble weights `p`
/// over the traced-out basis states mix the reduced states; they are not
/// supported for operator inputs.
pub fn reduced_density_matrix<'a, O>(state: O, cut: &Cut, p: Option<&[f64]>)
    -> QInfoResult<Reduced>
where O: Into<Operand<'a>>
{
    let traced = cut.traced();
    match state.into() {
        Operand::Operator(op) => {
            if p.is_some() {
                return Err(Unsupported("ensemble weights with an operator state"));
            }
            check_cut(&traced, op.out_edges().len().min(op.in_edges().len()))?;
            Ok(Reduced::Operator(op.partial_trace(&traced)?))
        },
        Operand::Dense(a) => {
            reduced_dense(&a.to_owned(), &traced, p).map(Reduced::Matrix)
        },
    }
}

fn reduced_dense(state: &nd::ArrayD<C64>, traced: &[usize], p: Option<&[f64]>)
    -> QInfoResult<nd::Array2<C64>>
{
    let n
        = if is_density(state.shape()) {
            qubits_of(state.shape()[0])?
        } else {
            qubits_of(state.len())?
        };
    check_cut(traced, n)?;
    let rest: Vec<usize> = (0..n).filter(|k| !traced.contains(k)).collect();
    let tdim: usize = 1 << traced.len();
    let kdim: usize = 1 << rest.len();
    let weights: Vec<f64>
        = match p {
            Some(p) if p.len() != tdim => { return Err(WeightCount(tdim, p.len())); },
            Some(p) => p.to_vec(),
            None => vec![1.0; tdim],
        };

    if is_density(state.shape()) {
        let left: Vec<usize>
            = traced.iter().chain(rest.iter()).copied().collect();
        let perm: Vec<usize>
            = left.iter().copied().chain(left.iter().map(|k| k + n)).collect();
        let rho = permute_qubits(state, 2 * n, &perm)?
            .into_shape((tdim, kdim, tdim, kdim))?;
        let mut red: nd::Array2<C64> = nd::Array2::zeros((kdim, kdim));
        weights.iter().enumerate()
            .for_each(|(a, w)| {
                red.scaled_add(C64::from(*w), &rho.slice(nd::s![a, .., a, ..]));
            });
        let tr = trace(&red);
        Ok(red.mapv(|z| z / tr))
    } else {
        let norm: f64 = state.iter().map(|z| z.norm_sqr()).sum::<f64>().sqrt();
        let perm: Vec<usize> = rest.iter().chain(traced.iter()).copied().collect();
        let w = permute_qubits(state, n, &perm)?
            .into_shape((kdim, tdim))?
            .mapv(|z| z / norm);
        let wh = dagger(&w);
        match p {
            None => Ok(w.dot(&wh)),
            Some(_) => {
                let wp: nd::Array2<C64>
                    = nd::Array2::from_shape_fn(
                        w.dim(), |(i, a)| w[[i, a]] * weights[a]);
                let red = wp.dot(&wh);
                let tr = trace(&red);
                Ok(red.mapv(|z| z / tr))
            },
        }
    }
}

/// Free energy `Tr(ρ H) - S(ρ) / β`.
pub fn free_energy<'a, B, O, P>(be: &B, rho: O, h: P, beta: f64, eps: f64)
    -> QInfoResult<f64>
where
    B: Backend,
    O: Into<Operand<'a>>,
    P: Into<Operand<'a>>,
{
    let rho = rho.into();
    let energy = trace_product(&[rho.clone(), h.into()])?.re;
    let s = entropy(be, rho, eps)?;
    Ok(energy - s / beta)
}

/// Rényi entropy `ln Tr(ρᵏ) / (1 - k)` for `k ≥ 2`.
pub fn renyi_entropy<'a, O>(rho: O, k: usize) -> QInfoResult<f64>
where O: Into<Operand<'a>>
{
    if k < 2 { return Err(RenyiOrder(k)); }
    let rho = rho.into();
    let ops: Vec<Operand<'_>> = vec![rho; k];
    let tr = trace_product(&ops)?;
    Ok(tr.ln().re / (1.0 - k as f64))
}

/// Rényi free energy `Tr(ρ H) - S_k(ρ) / β`.
pub fn renyi_free_energy<'a, O, P>(rho: O, h: P, beta: f64, k: usize)
    -> QInfoResult<f64>
where
    O: Into<Operand<'a>>,
    P: Into<Operand<'a>>,
{
    let rho = rho.into();
    let energy = trace_product(&[rho.clone(), h.into()])?.re;
    let s = renyi_entropy(rho, k)?;
    Ok(energy - s / beta)
}

/// Order-`k` Taylor expansion of `ln(1 + x)` for a square matrix `x`,
/// evaluated with Horner's scheme. Order 0 is the zero matrix.
pub fn taylorlnm(x: &nd::Array2<C64>, k: usize) -> nd::Array2<C64> {
    let s = x.nrows();
    let eye: nd::Array2<C64> = nd::Array2::eye(s);
    let coeff = |i: usize| -> C64 {
        let sign = if i % 2 == 1 { 1.0 } else { -1.0 };
        C64::from(sign / i as f64)
    };
    if k == 0 { return nd::Array2::zeros((s, s)); }
    let mut y: nd::Array2<C64> = eye.mapv(|z| z * coeff(k));
    for i in (0..k).rev() {
        y = y.dot(x);
        if i > 0 { y = y + eye.mapv(|z| z * coeff(i)); }
    }
    y
}

/// Free energy with the entropy replaced by the order-`k` Taylor approximation
/// `-Tr(ρ ln ρ) ≈ -Tr(ρ T_{k-1}(ρ - 1))`.
///
/// This avoids diagonalizing `ρ` at the cost of a truncation error that grows
/// as the spectrum of `ρ` moves away from 1; no bound on it is computed.
pub fn truncated_free_energy<'a, O, P>(rho: O, h: P, beta: f64, k: usize)
    -> QInfoResult<f64>
where
    O: Into<Operand<'a>>,
    P: Into<Operand<'a>>,
{
    let rho = rho.into();
    let h = h.into();
    let rho_m = rho.to_matrix()?;
    let (r, c) = rho_m.dim();
    if r != c { return Err(NotSquare(r, c)); }
    let shifted = &rho_m - &nd::Array2::<C64>::eye(r);
    let expanded = rho_m.dot(&taylorlnm(&shifted, k.saturating_sub(1)));
    let renyi = -trace(&expanded).re;
    let energy = trace_product(&[rho, h])?.re;
    Ok(energy - renyi / beta)
}

/// Trace distance `½ Σ √(λ + eps)`, where `λ` are the (clipped) eigenvalues of
/// `(ρ - ρ₀)† (ρ - ρ₀)`.
pub fn trace_distance<'a, 'b, B, O, P>(be: &B, rho: O, rho0: P, eps: f64)
    -> QInfoResult<f64>
where
    B: Backend,
    O: Into<Operand<'a>>,
    P: Into<Operand<'b>>,
{
    let d = rho.into().to_matrix()? - rho0.into().to_matrix()?;
    let d2 = dagger(&d).dot(&d);
    let lbd = be.eigvalsh(&d2)?;
    Ok(0.5 * lbd.iter().map(|l| (l.max(0.0) + eps).sqrt()).sum::<f64>())
}

/// Fidelity `(Tr √(√ρ ρ₀ √ρ))²`.
pub fn fidelity<'a, 'b, B, O, P>(be: &B, rho: O, rho0: P) -> QInfoResult<f64>
where
    B: Backend,
    O: Into<Operand<'a>>,
    P: Into<Operand<'b>>,
{
    let rho = rho.into().to_matrix()?;
    let rho0 = rho0.into().to_matrix()?;
    let rhosqrt = be.sqrtmh(&rho)?;
    let inner = rhosqrt.dot(&rho0).dot(&rhosqrt);
    let tr = trace(&be.sqrtmh(&inner)?);
    Ok((tr * tr).re)
}

/// Thermal state `exp(-β H) / Tr exp(-β H)` for a Hermitian `H`.
pub fn gibbs_state<'a, B, O>(be: &B, h: O, beta: f64)
    -> QInfoResult<nd::Array2<C64>>
where
    B: Backend,
    O: Into<Operand<'a>>,
{
    let rho = be.expmh(&h.into().to_matrix()?, -beta)?;
    let tr = trace(&rho);
    Ok(rho.mapv(|z| z / tr))
}

/// Thermal double state: `exp(-β H / 2)` flattened and normalized.
pub fn double_state<'a, B, O>(be: &B, h: O, beta: f64)
    -> QInfoResult<nd::Array1<C64>>
where
    B: Backend,
    O: Into<Operand<'a>>,
{
    let rho = be.expmh(&h.into().to_matrix()?, -beta / 2.0)?;
    let norm: f64 = rho.iter().map(|z| z.norm_sqr()).sum::<f64>().sqrt();
    Ok(rho.iter().map(|z| z / norm).collect())
}

/// Mutual information `S(A) + S(B) - S(AB)` across `cut`, where `A` is the
/// subsystem remaining after tracing out the qubits in `cut`.
///
/// Pure states (anything that isn't a square matrix) have `S(AB) = 0` and
/// `S(B) = S(A)`.
pub fn mutual_information<'a, B, O>(be: &B, s: O, cut: &Cut) -> QInfoResult<f64>
where
    B: Backend,
    O: Into<Operand<'a>>,
{
    let s = s.into().to_array()?;
    let traced = cut.traced();
    if is_density(s.shape()) {
        let n = qubits_of(s.shape()[0])?;
        let hab = entropy(be, &s, DEFAULT_EPS)?;
        let rhoa = reduced_dense(&s, &traced, None)?;
        let ha = entropy(be, &rhoa, DEFAULT_EPS)?;
        let other: Vec<usize> = (0..n).filter(|k| !traced.contains(k)).collect();
        let rhob = reduced_dense(&s, &other, None)?;
        let hb = entropy(be, &rhob, DEFAULT_EPS)?;
        Ok(ha + hb - hab)
    } else {
        let rhoa = reduced_dense(&s, &traced, None)?;
        let ha = entropy(be, &rhoa, DEFAULT_EPS)?;
        Ok(2.0 * ha)
    }
}

/// Outcome of [`measurement_counts`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MeasurementCounts {
    /// Observed basis-state indices in ascending order, with their counts.
    Sparse { values: Vec<usize>, counts: Vec<usize> },
    /// Counts for every basis state.
    Dense(Vec<usize>),
}

/// Sample `counts` computational-basis measurements of every qubit.
///
/// Probabilities are read from the diagonal of a density matrix or the squared
/// amplitudes of a state vector, normalized either way. Any rank-2 dense array
/// is taken as a density matrix and must be square; other ranks are read as
/// state amplitudes.
pub fn measurement_counts<'a, B, O, R>(
    be: &B,
    state: O,
    counts: usize,
    sparse: bool,
    rng: &mut R,
) -> QInfoResult<MeasurementCounts>
where
    B: Backend,
    O: Into<Operand<'a>>,
    R: Rng + ?Sized,
{
    fn from_amplitudes<'b, I>(amps: I) -> Vec<f64>
    where I: Iterator<Item = &'b C64>
    {
        let p: Vec<f64> = amps.map(|a| a.norm_sqr()).collect();
        let norm: f64 = p.iter().sum();
        p.into_iter().map(|pk| pk / norm).collect()
    }

    fn from_density(rho: &nd::Array2<C64>) -> Vec<f64> {
        let tr = trace(rho).re;
        rho.diag().iter().map(|z| z.re / tr).collect()
    }

    let probs: Vec<f64>
        = match state.into() {
            Operand::Operator(op) if op.is_vector() => {
                from_amplitudes(op.to_dense()?.iter())
            },
            Operand::Operator(op) => from_density(&op.to_matrix()?),
            Operand::Dense(a) if a.ndim() == 2 => {
                let rho = a.to_owned().into_dimensionality::<nd::Ix2>()?;
                let (r, c) = rho.dim();
                if r != c { return Err(NotSquare(r, c)); }
                from_density(&rho)
            },
            Operand::Dense(a) => from_amplitudes(a.iter()),
        };
    let samples = be.sample_categorical(&probs, counts, rng)?;
    if sparse {
        let mut hist: BTreeMap<usize, usize> = BTreeMap::new();
        samples.into_iter()
            .for_each(|k| { *hist.entry(k).or_insert(0) += 1; });
        let (values, tallies) = hist.into_iter().unzip();
        Ok(MeasurementCounts::Sparse { values, counts: tallies })
    } else {
        let mut dense: Vec<usize> = vec![0; probs.len()];
        samples.into_iter().for_each(|k| { dense[k] += 1; });
        Ok(MeasurementCounts::Dense(dense))
    }
}

/// Value of qubit `m`'s spin in each basis state of an `n`-qubit register:
/// `elements.0` where the qubit is 0 and `elements.1` where it is 1.
pub fn spin_by_basis(n: usize, m: usize, elements: (i64, i64))
    -> QInfoResult<Vec<i64>>
{
    if m >= n { return Err(BadCut(m, n)); }
    let shift = n - m - 1;
    Ok(
        (0..1_usize << n)
        .map(|i| if (i >> shift) & 1 == 0 { elements.0 } else { elements.1 })
        .collect()
    )
}

/// Expectation of `Π Z_i` over the qubits in `index`, given a probability (or
/// count) vector over basis states.
pub fn correlation_from_counts(index: &[usize], results: &[f64])
    -> QInfoResult<f64>
{
    let n = qubits_of(results.len())?;
    let mut weighted: Vec<f64> = results.to_vec();
    for i in index.iter() {
        let spins = spin_by_basis(n, *i, (1, -1))?;
        weighted.iter_mut().zip(spins)
            .for_each(|(w, s)| { *w *= s as f64; });
    }
    Ok(weighted.into_iter().sum())
}

/// Output of [`generate_local_hamiltonian`].
#[derive(Clone, Debug)]
pub enum Hamiltonian {
    Matrix(nd::Array2<C64>),
    Operator(QuObject),
}

/// Tensor product of local operator tensors over consecutive subsystems.
///
/// With `matrix_form`, the product is evaluated to a dense matrix.
pub fn generate_local_hamiltonian(hlist: &[nd::ArrayD<C64>], matrix_form: bool)
    -> QInfoResult<Hamiltonian>
{
    let (first, rest) = hlist.split_first().ok_or(Empty)?;
    let mut hop = QuOperator::from_tensor(first.clone(), None, None)?;
    for h in rest.iter() {
        let op = QuOperator::from_tensor(h.clone(), None, None)?;
        hop = hop.tensor_product(&op)?;
    }
    if matrix_form {
        Ok(Hamiltonian::Matrix(hop.eval_matrix(None)?))
    } else {
        Ok(Hamiltonian::Operator(hop))
    }
}

/// Construct the matrix `|ψ⟩⟨ψ|` of a state vector.
pub fn pure_density(psi: &nd::Array1<C64>) -> nd::Array2<C64> {
    nd::Array2::from_shape_fn(
        (psi.len(), psi.len()), |(i, j)| psi[i] * psi[j].conj())
}

/// Maximally mixed state over `n` qubits.
pub fn maximally_mixed(n: usize) -> nd::Array2<C64> {
    let d: usize = 1 << n;
    nd::Array2::from_diag_elem(d, C64::one() / d as f64)
}
