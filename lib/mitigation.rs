//! Readout-error mitigation from calibration circuits.
//!
//! A [`ReadoutMit`] runs calibration circuits through a caller-supplied
//! executor, builds a calibration (confusion) matrix whose columns are
//! prepared basis states and whose rows are measured ones, and uses it to
//! correct raw measurement counts.
//!
//! Bit strings always have qubit 0 leftmost.

use std::{ collections::BTreeMap, str::FromStr };
use itertools::Itertools;
use ndarray as nd;
use serde::{ Deserialize, Serialize };
use thiserror::Error;
use crate::{
    backend::{ Backend, BackendError, DenseBackend },
    circuit::Circuit,
    ir::{ AbstractCircuit, IrError },
};

#[derive(Debug, Error)]
pub enum MitigationError {
    #[error("error in mitigation: no calibration data")]
    NotCalibrated,

    #[error("error in mitigation: qubit {0} is not among the calibrated qubits")]
    NotCalibratedQubit(usize),

    #[error("error in mitigation: unknown method '{0}'")]
    BadMethod(String),

    #[error("error in mitigation: bad bit string '{0}' for {1} qubit(s)")]
    BadBitString(String, usize),

    #[error("error in mitigation: executor returned {1} result(s) for {0} circuit(s)")]
    ExecuteCount(usize, usize),

    #[error("error in mitigation: counts are empty")]
    EmptyCounts,

    #[error("error in mitigation: no qubits given")]
    NoQubits,

    #[error("backend error: {0}")]
    BackendError(#[from] BackendError),

    #[error("ir error: {0}")]
    IrError(#[from] IrError),
}
use MitigationError::*;
pub type MitigationResult<T> = Result<T, MitigationError>;

/// Measurement counts keyed by bit string.
pub type Counts = BTreeMap<String, u64>;

/// Mitigated (quasi-)counts keyed by bit string. Values may be negative.
pub type QuasiCounts = BTreeMap<String, f64>;

/// How the calibration matrix is measured.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CalibrationMethod {
    /// Two circuits; errors are assumed independent across qubits.
    #[default]
    Local,
    /// One circuit per basis state of the calibrated qubits.
    Global,
}

impl FromStr for CalibrationMethod {
    type Err = MitigationError;

    fn from_str(s: &str) -> MitigationResult<Self> {
        match s {
            "local" => Ok(Self::Local),
            "global" => Ok(Self::Global),
            _ => Err(BadMethod(s.to_string())),
        }
    }
}

/// How the calibration matrix is inverted.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    /// Apply the matrix inverse.
    #[default]
    Inverse,
    /// Least squares restricted to probability distributions.
    Square,
}

impl FromStr for Method {
    type Err = MitigationError;

    fn from_str(s: &str) -> MitigationResult<Self> {
        match s {
            "inverse" => Ok(Self::Inverse),
            "square" => Ok(Self::Square),
            _ => Err(BadMethod(s.to_string())),
        }
    }
}

#[derive(Clone, Debug)]
enum Calibration {
    // indexed by qubit; `None` for uncalibrated qubits
    Local(Vec<Option<nd::Array2<f64>>>),
    // raw counts for each prepared basis state of the calibrated qubits
    Global(Vec<Counts>),
}

/// Parse a bit string of length `n` into a basis index.
fn bits_to_index(bits: &str, n: usize) -> MitigationResult<usize> {
    if bits.len() != n {
        return Err(BadBitString(bits.to_string(), n));
    }
    if n == 0 { return Ok(0); }
    usize::from_str_radix(bits, 2)
        .map_err(|_| BadBitString(bits.to_string(), n))
}

/// Convert counts on `n` qubits to a normalized probability vector.
pub fn count_to_vec(counts: &Counts, n: usize) -> MitigationResult<nd::Array1<f64>> {
    let total: u64 = counts.values().sum();
    if total == 0 { return Err(EmptyCounts); }
    let mut probs: nd::Array1<f64> = nd::Array1::zeros(1 << n);
    for (bits, count) in counts.iter() {
        probs[bits_to_index(bits, n)?] += *count as f64 / total as f64;
    }
    Ok(probs)
}

/// Convert a vector over the `2^n` basis states of `n` qubits to
/// quasi-counts, skipping exact zeros.
pub fn vec_to_count(vec: &nd::Array1<f64>, n: usize) -> QuasiCounts {
    vec.iter().enumerate()
        .filter(|(_, v)| **v != 0.0)
        .map(|(k, v)| (format!("{:0w$b}", k, w = n), *v))
        .collect()
}

/// Marginalize counts onto the bit positions `keep`, in the order given.
pub fn marginal_count(counts: &Counts, keep: &[usize]) -> MitigationResult<Counts> {
    let mut marginal = Counts::new();
    for (bits, count) in counts.iter() {
        let chars: Vec<char> = bits.chars().collect();
        let key: String
            = keep.iter()
            .map(|k| {
                chars.get(*k).copied()
                    .ok_or_else(|| BadBitString(bits.clone(), k + 1))
            })
            .collect::<MitigationResult<String>>()?;
        *marginal.entry(key).or_insert(0) += *count;
    }
    Ok(marginal)
}

fn kron_real(a: &nd::Array2<f64>, b: &nd::Array2<f64>) -> nd::Array2<f64> {
    let (ra, ca) = a.dim();
    let (rb, cb) = b.dim();
    nd::Array2::from_shape_fn(
        (ra * rb, ca * cb),
        |(i, j)| a[[i / rb, j / cb]] * b[[i % rb, j % cb]],
    )
}

// Euclidean projection onto the probability simplex
fn project_simplex(x: &nd::Array1<f64>) -> nd::Array1<f64> {
    let sorted: Vec<f64>
        = x.iter().copied().sorted_by(|a, b| b.total_cmp(a)).collect();
    let mut cumsum: f64 = 0.0;
    let mut theta: f64 = 0.0;
    for (k, u) in sorted.iter().enumerate() {
        cumsum += u;
        let t = (cumsum - 1.0) / (k + 1) as f64;
        if *u - t > 0.0 { theta = t; }
    }
    x.mapv(|xk| (xk - theta).max(0.0))
}

// largest eigenvalue of AᵀA by power iteration
fn gram_norm(a: &nd::Array2<f64>) -> f64 {
    let n = a.ncols();
    let mut v: nd::Array1<f64> = nd::Array1::from_elem(n, 1.0 / (n as f64).sqrt());
    let mut lambda: f64 = 0.0;
    for _ in 0..100 {
        let w = a.t().dot(&a.dot(&v));
        let norm = w.dot(&w).sqrt();
        if norm == 0.0 { return 0.0; }
        lambda = norm;
        v = w / norm;
    }
    lambda
}

/// Readout-error mitigation driven by an executor that runs circuits for a
/// number of shots and returns their counts.
pub struct ReadoutMit<F>
where F: FnMut(&[Circuit], usize) -> Vec<Counts>
{
    execute: F,
    cal_qubits: Vec<usize>,
    use_qubits: Vec<usize>,
    cal_shots: usize,
    cals: Option<Calibration>,
    backend: DenseBackend,
    max_iter: usize,
    tol: f64,
}

impl<F> ReadoutMit<F>
where F: FnMut(&[Circuit], usize) -> Vec<Counts>
{
    /// Create a new, uncalibrated mitigator.
    pub fn new(execute: F) -> Self {
        Self {
            execute,
            cal_qubits: Vec::new(),
            use_qubits: Vec::new(),
            cal_shots: 0,
            cals: None,
            backend: DenseBackend::default(),
            max_iter: 10_000,
            tol: 1e-12,
        }
    }

    /// Set the iteration limit and step tolerance of [`Method::Square`].
    pub fn with_square_options(mut self, max_iter: usize, tol: f64) -> Self {
        self.max_iter = max_iter;
        self.tol = tol.abs();
        self
    }

    /// Return the calibrated qubits, in ascending order.
    pub fn cal_qubits(&self) -> &[usize] { &self.cal_qubits }

    /// Return the qubits of the last correction.
    pub fn use_qubits(&self) -> &[usize] { &self.use_qubits }

    /// Return the 2×2 calibration matrix of a single qubit, if calibrated
    /// locally.
    pub fn single_qubit_cal(&self, qubit: usize) -> Option<&nd::Array2<f64>> {
        match &self.cals {
            Some(Calibration::Local(cals)) => cals.get(qubit)?.as_ref(),
            _ => None,
        }
    }

    fn run(&mut self, circuits: &[Circuit]) -> MitigationResult<Vec<Counts>> {
        let results = (self.execute)(circuits, self.cal_shots);
        if results.len() != circuits.len() {
            return Err(ExecuteCount(circuits.len(), results.len()));
        }
        Ok(results)
    }

    /// Measure calibration data for `qubits` with `shots` shots per circuit.
    pub fn cals_from_system(
        &mut self,
        qubits: &[usize],
        shots: usize,
        method: CalibrationMethod,
    ) -> MitigationResult<()>
    {
        let qubits: Vec<usize> = qubits.iter().copied().sorted().dedup().collect();
        let nqubits = qubits.last().map(|q| q + 1).ok_or(NoQubits)?;
        self.cal_qubits = qubits;
        self.use_qubits = self.cal_qubits.clone();
        self.cal_shots = shots;
        let ncal = self.cal_qubits.len();
        match method {
            CalibrationMethod::Local => {
                let zeros = Circuit::new(nqubits);
                let mut ones = Circuit::new(nqubits);
                for q in self.cal_qubits.iter() { ones.x(*q)?; }
                log::debug!("local readout calibration on {} qubit(s)", ncal);
                let results = self.run(&[zeros, ones])?;
                let marginals: Vec<Counts>
                    = results.iter()
                    .map(|counts| marginal_count(counts, &self.cal_qubits))
                    .collect::<MitigationResult<_>>()?;
                let mut cals: Vec<Option<nd::Array2<f64>>> = vec![None; nqubits];
                for (k, q) in self.cal_qubits.iter().enumerate() {
                    let zero_frac = |counts: &Counts| -> f64 {
                        counts.iter()
                            .filter(|(bits, _)| bits.as_bytes()[k] == b'0')
                            .map(|(_, n)| *n as f64 / shots as f64)
                            .sum()
                    };
                    let e00 = zero_frac(&marginals[0]);
                    let e10 = zero_frac(&marginals[1]);
                    cals[*q] = Some(nd::array![[e00, e10], [1.0 - e00, 1.0 - e10]]);
                }
                self.cals = Some(Calibration::Local(cals));
            },
            CalibrationMethod::Global => {
                let circuits: Vec<Circuit>
                    = (0..1_usize << ncal)
                    .map(|i| -> Result<Circuit, IrError> {
                        let mut circ = Circuit::new(nqubits);
                        for (k, q) in self.cal_qubits.iter().enumerate() {
                            if (i >> (ncal - 1 - k)) & 1 == 1 { circ.x(*q)?; }
                        }
                        Ok(circ)
                    })
                    .collect::<Result<_, IrError>>()?;
                log::debug!(
                    "global readout calibration on {} qubit(s): {} circuits",
                    ncal, circuits.len(),
                );
                let results = self.run(&circuits)?;
                self.cals = Some(Calibration::Global(results));
            },
        }
        Ok(())
    }

    /// Build the calibration matrix for `qubits` (default: the qubits of the
    /// last correction).
    pub fn get_matrix(&self, qubits: Option<&[usize]>) -> MitigationResult<nd::Array2<f64>> {
        let qubits = qubits.unwrap_or(self.use_qubits.as_slice());
        if qubits.is_empty() { return Err(NoQubits); }
        match self.cals.as_ref().ok_or(NotCalibrated)? {
            Calibration::Local(cals) => {
                let mut mat: nd::Array2<f64> = nd::array![[1.0]];
                for q in qubits.iter() {
                    let cal = cals.get(*q)
                        .and_then(|c| c.as_ref())
                        .ok_or(NotCalibratedQubit(*q))?;
                    mat = kron_real(&mat, cal);
                }
                Ok(mat)
            },
            Calibration::Global(results) => {
                if let Some(q) = qubits.iter().find(|q| !self.cal_qubits.contains(*q)) {
                    return Err(NotCalibratedQubit(*q));
                }
                let ncal = self.cal_qubits.len();
                let nuse = qubits.len();
                let unused: Vec<usize>
                    = self.cal_qubits.iter().enumerate()
                    .filter(|(_, q)| !qubits.contains(*q))
                    .map(|(k, _)| k)
                    .collect();
                // position of each used qubit among the calibration bits
                let positions: Vec<usize>
                    = qubits.iter()
                    .map(|q| self.cal_qubits.iter().position(|c| c == q).unwrap_or(0))
                    .collect();
                let mut mat: nd::Array2<f64> = nd::Array2::zeros((1 << nuse, 1 << nuse));
                for (i, counts) in results.iter().enumerate() {
                    let bit = |k: usize| (i >> (ncal - 1 - k)) & 1;
                    if unused.iter().any(|k| bit(*k) == 1) { continue; }
                    let col: usize
                        = positions.iter()
                        .fold(0, |acc, k| (acc << 1) | bit(*k));
                    for (bits, n) in marginal_count(counts, qubits)?.iter() {
                        let row = bits_to_index(bits, nuse)?;
                        mat[[row, col]] += *n as f64 / self.cal_shots as f64;
                    }
                }
                Ok(mat)
            },
        }
    }

    /// Correct a probability vector over the qubits of the last correction.
    pub fn mitigate_probability(&self, probs: &nd::Array1<f64>, method: Method)
        -> MitigationResult<nd::Array1<f64>>
    {
        let cal = self.get_matrix(None)?;
        match method {
            Method::Inverse => Ok(self.backend.inv_real(&cal)?.dot(probs)),
            Method::Square => {
                let lipschitz = 2.0 * gram_norm(&cal);
                if lipschitz == 0.0 { return Err(BackendError::Singular.into()); }
                let step = 1.0 / lipschitz;
                let n = probs.len();
                let mut x: nd::Array1<f64> = nd::Array1::from_elem(n, 1.0 / n as f64);
                for _ in 0..self.max_iter {
                    let grad = cal.t().dot(&(cal.dot(&x) - probs)) * 2.0;
                    let next = project_simplex(&(&x - &(grad * step)));
                    let change
                        = (&next - &x).iter().map(|d| d.abs()).fold(0.0, f64::max);
                    x = next;
                    if change < self.tol { break; }
                }
                Ok(x)
            },
        }
    }

    /// Mitigate counts already marginalized onto the qubits of the last
    /// correction.
    pub fn apply_readout_mitigation(&self, counts: &Counts, method: Method)
        -> MitigationResult<QuasiCounts>
    {
        let n = self.use_qubits.len();
        let shots: u64 = counts.values().sum();
        let probs = count_to_vec(counts, n)?;
        let mitigated = self.mitigate_probability(&probs, method)? * shots as f64;
        Ok(vec_to_count(&mitigated, n))
    }

    /// Mitigate full-register counts on the subset `qubits` of the calibrated
    /// qubits.
    ///
    /// The result is keyed by bit strings over `qubits` in ascending order.
    pub fn apply_correction(&mut self, counts: &Counts, qubits: &[usize], method: Method)
        -> MitigationResult<QuasiCounts>
    {
        let qubits: Vec<usize> = qubits.iter().copied().sorted().dedup().collect();
        if qubits.is_empty() { return Err(NoQubits); }
        if self.cals.is_none() { return Err(NotCalibrated); }
        if let Some(q) = qubits.iter().find(|q| !self.cal_qubits.contains(*q)) {
            return Err(NotCalibratedQubit(*q));
        }
        let marginal = marginal_count(counts, &qubits)?;
        self.use_qubits = qubits;
        self.apply_readout_mitigation(&marginal, method)
    }
}
