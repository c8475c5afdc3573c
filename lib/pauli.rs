//! Matrices of weighted sums of Pauli strings.
//!
//! A Pauli string over `n` qubits is a row of codes `0 = I`, `1 = X`, `2 = Y`,
//! `3 = Z`. Its matrix has exactly one nonzero entry per row, which is computed
//! directly from bitmasks of the X, Y and Z positions instead of forming
//! Kronecker products: for row `r`,
//! ```text
//! col = r ^ x ^ y
//! val = (-1)^parity(r & (y | z)) * (-i)^(popcount(y) mod 4) * w
//! ```
//! where qubit 0 is the most significant bit.
//!
//! Sparse output (`nalgebra-sparse` COO/CSR) requires the `sparse` feature;
//! dense output is always available.

use ndarray as nd;
use num_complex::Complex64 as C64;
use thiserror::Error;
#[cfg(feature = "sparse")]
use nalgebra_sparse::{ CooMatrix, CsrMatrix };

#[derive(Debug, Error)]
pub enum PauliError {
    /// Returned when a Pauli code is not one of 0, 1, 2, 3.
    #[error("error in pauli: invalid Pauli code {0}")]
    BadCode(u8),

    /// Returned when Pauli strings have unequal lengths.
    #[error("error in pauli: expected strings of length {0}, got {1}")]
    Ragged(usize, usize),

    /// Returned when the number of weights doesn't match the number of strings.
    #[error("error in pauli: expected {0} weights, got {1}")]
    WeightCount(usize, usize),

    /// Returned when a site index is out of range.
    #[error("error in pauli: site {0} out of range for {1} qubits")]
    BadSite(usize, usize),

    /// Returned when no strings are given and the register size is unknown.
    #[error("error in pauli: empty list of Pauli strings")]
    Empty,

    /// Returned when a sparse matrix can't be assembled.
    #[cfg(feature = "sparse")]
    #[error("error in pauli: sparse format error: {0}")]
    Sparse(String),
}
use PauliError::*;
pub type PauliResult<T> = Result<T, PauliError>;

// X, Y, Z bitmasks of a single string
fn masks(l: &[u8]) -> PauliResult<(usize, usize, usize)> {
    let n = l.len();
    let mut x: usize = 0;
    let mut y: usize = 0;
    let mut z: usize = 0;
    for (i, code) in l.iter().enumerate() {
        let bit: usize = 1 << (n - i - 1);
        match code {
            0 => { },
            1 => { x |= bit; },
            2 => { y |= bit; },
            3 => { z |= bit; },
            c => { return Err(BadCode(*c)); },
        }
    }
    Ok((x, y, z))
}

/// Return the nonzero `(row, col, value)` entries of a single weighted Pauli
/// string, in row order.
pub fn pauli_string_entries(l: &[u8], weight: C64)
    -> PauliResult<Vec<(usize, usize, C64)>>
{
    let (x, y, z) = masks(l)?;
    let phase
        = match y.count_ones() % 4 {
            0 => C64::new(1.0, 0.0),
            1 => C64::new(0.0, -1.0),
            2 => C64::new(-1.0, 0.0),
            _ => C64::new(0.0, 1.0),
        };
    let val = phase * weight;
    Ok(
        (0..1_usize << l.len())
        .map(|row| {
            let col = row ^ x ^ y;
            let sign = if (row & (y | z)).count_ones() % 2 == 0 { 1.0 } else { -1.0 };
            (row, col, val * sign)
        })
        .collect()
    )
}

// validate shapes and collect all entries of a sum over `n` qubits
fn sum_entries(n: usize, ls: &[Vec<u8>], weights: Option<&[f64]>)
    -> PauliResult<Vec<(usize, usize, C64)>>
{
    if let Some(w) = weights {
        if w.len() != ls.len() { return Err(WeightCount(ls.len(), w.len())); }
    }
    let mut entries: Vec<(usize, usize, C64)> = Vec::new();
    for (k, l) in ls.iter().enumerate() {
        if l.len() != n { return Err(Ragged(n, l.len())); }
        let w = weights.map(|w| w[k]).unwrap_or(1.0);
        entries.append(&mut pauli_string_entries(l, C64::from(w))?);
    }
    Ok(entries)
}

fn register_size(ls: &[Vec<u8>]) -> PauliResult<usize> {
    ls.first().map(|l| l.len()).ok_or(Empty)
}

fn dense_from_entries(n: usize, entries: &[(usize, usize, C64)]) -> nd::Array2<C64> {
    let d: usize = 1 << n;
    let mut mat: nd::Array2<C64> = nd::Array2::zeros((d, d));
    entries.iter()
        .for_each(|(r, c, v)| { mat[[*r, *c]] += v; });
    mat
}

#[cfg(feature = "sparse")]
fn coo_from_entries(n: usize, entries: Vec<(usize, usize, C64)>)
    -> PauliResult<CooMatrix<C64>>
{
    let d: usize = 1 << n;
    let mut rows: Vec<usize> = Vec::with_capacity(entries.len());
    let mut cols: Vec<usize> = Vec::with_capacity(entries.len());
    let mut vals: Vec<C64> = Vec::with_capacity(entries.len());
    for (r, c, v) in entries.into_iter() {
        rows.push(r);
        cols.push(c);
        vals.push(v);
    }
    CooMatrix::try_from_triplets(d, d, rows, cols, vals)
        .map_err(|err| Sparse(err.to_string()))
}

/// Dense matrix of `Σ_k w_k P_k`. Weights default to 1.
pub fn pauli_string_sum_dense(ls: &[Vec<u8>], weights: Option<&[f64]>)
    -> PauliResult<nd::Array2<C64>>
{
    let n = register_size(ls)?;
    Ok(dense_from_entries(n, &sum_entries(n, ls, weights)?))
}

/// COO matrix of a single weighted Pauli string.
#[cfg(feature = "sparse")]
pub fn pauli_string_to_coo(l: &[u8], weight: C64) -> PauliResult<CooMatrix<C64>> {
    coo_from_entries(l.len(), pauli_string_entries(l, weight)?)
}

/// COO matrix of `Σ_k w_k P_k`. Weights default to 1.
///
/// Entries of different strings landing on the same position are stored as
/// duplicates, which sum on conversion to other formats.
#[cfg(feature = "sparse")]
pub fn pauli_string_sum_coo(ls: &[Vec<u8>], weights: Option<&[f64]>)
    -> PauliResult<CooMatrix<C64>>
{
    let n = register_size(ls)?;
    coo_from_entries(n, sum_entries(n, ls, weights)?)
}

/// CSR matrix of `Σ_k w_k P_k`, with duplicate entries summed.
#[cfg(feature = "sparse")]
pub fn pauli_string_sum_csr(ls: &[Vec<u8>], weights: Option<&[f64]>)
    -> PauliResult<CsrMatrix<C64>>
{
    pauli_string_sum_coo(ls, weights).map(|coo| CsrMatrix::from(&coo))
}

/// Couplings of a Heisenberg model.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct HeisenbergCoefficients {
    pub hzz: f64,
    pub hxx: f64,
    pub hyy: f64,
    pub hz: f64,
    pub hx: f64,
    pub hy: f64,
}

impl Default for HeisenbergCoefficients {
    fn default() -> Self {
        Self { hzz: 1.0, hxx: 1.0, hyy: 1.0, hz: 0.0, hx: 0.0, hy: 0.0 }
    }
}

/// A Pauli-sum matrix in either storage format.
#[derive(Clone, Debug)]
pub enum PauliMatrix {
    #[cfg(feature = "sparse")]
    Sparse(CooMatrix<C64>),
    Dense(nd::Array2<C64>),
}

impl PauliMatrix {
    /// Convert to a dense matrix.
    pub fn into_dense(self) -> nd::Array2<C64> {
        match self {
            #[cfg(feature = "sparse")]
            Self::Sparse(coo) => {
                let mut mat: nd::Array2<C64>
                    = nd::Array2::zeros((coo.nrows(), coo.ncols()));
                coo.triplet_iter()
                    .for_each(|(r, c, v)| { mat[[r, c]] += v; });
                mat
            },
            Self::Dense(mat) => mat,
        }
    }
}

/// Pauli strings and weights of a Heisenberg model on the graph with `n` nodes
/// and edges `edges`: all two-site terms (ZZ, XX, YY per edge) followed by all
/// one-site terms (Z, X, Y per node). Terms with zero coupling are skipped.
pub fn heisenberg_terms(
    n: usize,
    edges: &[(usize, usize)],
    coeffs: &HeisenbergCoefficients,
) -> PauliResult<(Vec<Vec<u8>>, Vec<f64>)>
{
    let mut ls: Vec<Vec<u8>> = Vec::new();
    let mut weights: Vec<f64> = Vec::new();
    for (a, b) in edges.iter() {
        if let Some(bad) = [*a, *b].into_iter().find(|k| *k >= n) {
            return Err(BadSite(bad, n));
        }
        for (code, h) in [(3, coeffs.hzz), (1, coeffs.hxx), (2, coeffs.hyy)] {
            if h == 0.0 { continue; }
            let mut r = vec![0_u8; n];
            r[*a] = code;
            r[*b] = code;
            ls.push(r);
            weights.push(h);
        }
    }
    for node in 0..n {
        for (code, h) in [(3, coeffs.hz), (1, coeffs.hx), (2, coeffs.hy)] {
            if h == 0.0 { continue; }
            let mut r = vec![0_u8; n];
            r[node] = code;
            ls.push(r);
            weights.push(h);
        }
    }
    Ok((ls, weights))
}

/// Matrix of a Heisenberg model; see [`heisenberg_terms`].
///
/// A sparse result requires the `sparse` feature; without it a dense matrix is
/// returned instead.
pub fn heisenberg_hamiltonian(
    n: usize,
    edges: &[(usize, usize)],
    coeffs: &HeisenbergCoefficients,
    sparse: bool,
) -> PauliResult<PauliMatrix>
{
    let (ls, weights) = heisenberg_terms(n, edges, coeffs)?;
    let entries = sum_entries(n, &ls, Some(&weights))?;
    if sparse {
        #[cfg(feature = "sparse")]
        return coo_from_entries(n, entries).map(PauliMatrix::Sparse);
        #[cfg(not(feature = "sparse"))]
        log::warn!("sparse Pauli matrices require the `sparse` feature; returning a dense matrix");
    }
    Ok(PauliMatrix::Dense(dense_from_entries(n, &entries)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(re: f64, im: f64) -> C64 { C64::new(re, im) }

    fn pauli(code: u8) -> nd::Array2<C64> {
        match code {
            1 => nd::array![[c(0.0, 0.0), c(1.0, 0.0)], [c(1.0, 0.0), c(0.0, 0.0)]],
            2 => nd::array![[c(0.0, 0.0), c(0.0, -1.0)], [c(0.0, 1.0), c(0.0, 0.0)]],
            3 => nd::array![[c(1.0, 0.0), c(0.0, 0.0)], [c(0.0, 0.0), c(-1.0, 0.0)]],
            _ => nd::Array2::eye(2),
        }
    }

    fn kron(a: &nd::Array2<C64>, b: &nd::Array2<C64>) -> nd::Array2<C64> {
        let (ra, ca) = a.dim();
        let (rb, cb) = b.dim();
        nd::Array2::from_shape_fn(
            (ra * rb, ca * cb),
            |(i, j)| a[[i / rb, j / cb]] * b[[i % rb, j % cb]],
        )
    }

    fn kron_string(l: &[u8]) -> nd::Array2<C64> {
        l.iter().skip(1)
            .fold(pauli(l[0]), |acc, code| kron(&acc, &pauli(*code)))
    }

    fn assert_close(a: &nd::Array2<C64>, b: &nd::Array2<C64>) {
        assert_eq!(a.dim(), b.dim());
        a.iter().zip(b.iter())
            .for_each(|(x, y)| assert!((x - y).norm() < 1e-12, "{} != {}", x, y));
    }

    #[test]
    fn single_strings_match_kronecker() {
        for l in [vec![2], vec![1, 2], vec![2, 2], vec![3, 0, 2], vec![2, 1, 3]] {
            let mat = pauli_string_sum_dense(&[l.clone()], None).unwrap();
            assert_close(&mat, &kron_string(&l));
        }
        assert!(matches!(pauli_string_entries(&[4], c(1.0, 0.0)), Err(BadCode(4))));
    }

    #[test]
    fn weighted_sum() {
        let ls = vec![vec![3, 3], vec![1, 1]];
        let mat = pauli_string_sum_dense(&ls, Some(&[0.5, -2.0])).unwrap();
        let expected
            = kron_string(&ls[0]).mapv(|z| z * 0.5)
            + kron_string(&ls[1]).mapv(|z| z * -2.0);
        assert_close(&mat, &expected);
        assert!(matches!(
            pauli_string_sum_dense(&[vec![1], vec![1, 1]], None),
            Err(Ragged(1, 2)),
        ));
        assert!(matches!(
            pauli_string_sum_dense(&ls, Some(&[1.0])),
            Err(WeightCount(2, 1)),
        ));
    }

    #[cfg(feature = "sparse")]
    #[test]
    fn coo_matches_dense() {
        let ls = vec![vec![3, 3], vec![1, 1]];
        let coo = pauli_string_sum_coo(&ls, None).unwrap();
        let dense = PauliMatrix::Sparse(coo).into_dense();
        let expected = kron_string(&ls[0]) + kron_string(&ls[1]);
        assert_close(&dense, &expected);
        let csr = pauli_string_sum_csr(&ls, None).unwrap();
        // ZZ and XX never overlap, so nothing cancels
        assert_eq!(csr.nnz(), 8);
        let single = pauli_string_to_coo(&[2], c(1.0, 0.0)).unwrap();
        assert_eq!(single.nnz(), 2);
    }

    #[test]
    fn heisenberg_two_sites() {
        let coeffs = HeisenbergCoefficients { hz: 0.3, ..Default::default() };
        let (ls, weights) = heisenberg_terms(2, &[(0, 1)], &coeffs).unwrap();
        assert_eq!(ls, vec![vec![3, 3], vec![1, 1], vec![2, 2], vec![3, 0], vec![0, 3]]);
        assert_eq!(weights, vec![1.0, 1.0, 1.0, 0.3, 0.3]);
        let h = heisenberg_hamiltonian(2, &[(0, 1)], &coeffs, true).unwrap()
            .into_dense();
        let expected
            = kron_string(&[3, 3]) + kron_string(&[1, 1]) + kron_string(&[2, 2])
            + kron_string(&[3, 0]).mapv(|z| z * 0.3)
            + kron_string(&[0, 3]).mapv(|z| z * 0.3);
        assert_close(&h, &expected);
        let h = heisenberg_hamiltonian(2, &[(0, 1)], &coeffs, false).unwrap();
        assert!(matches!(h, PauliMatrix::Dense(_)));
        assert!(matches!(
            heisenberg_terms(2, &[(0, 2)], &coeffs),
            Err(BadSite(2, 2)),
        ));
    }
}
