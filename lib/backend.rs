//! Dense linear algebra and sampling primitives behind the quantum-information
//! functions.
//!
//! The functions in [`qinfo`][crate::qinfo] take any implementor of
//! [`Backend`] as an explicit argument. [`DenseBackend`] implements it on top
//! of `nalgebra` decompositions, with `ndarray` arrays at the interface.

use nalgebra as na;
use ndarray as nd;
use num_complex::Complex64 as C64;
use rand::{ Rng, distributions::Distribution };
use statrs::distribution::Categorical;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackendError {
    /// Returned when a square matrix is required.
    #[error("error in backend: expected a square matrix, got {0}x{1}")]
    NotSquare(usize, usize),

    /// Returned when attempting to invert a singular matrix.
    #[error("error in backend: matrix is singular")]
    Singular,

    /// Returned when a decomposition fails to produce its factors.
    #[error("error in backend: singular value decomposition failed")]
    SvdFailed,

    /// Returned when probabilities can't define a categorical distribution.
    #[error("error in backend: invalid distribution: {0}")]
    Distribution(String),
}
use BackendError::*;
pub type BackendResult<T> = Result<T, BackendError>;

/// Convert an `ndarray` matrix to an `nalgebra` matrix.
pub fn to_na<T>(a: &nd::Array2<T>) -> na::DMatrix<T>
where T: na::Scalar
{
    let (r, c) = a.dim();
    na::DMatrix::from_fn(r, c, |i, j| a[[i, j]].clone())
}

/// Convert an `nalgebra` matrix to an `ndarray` matrix.
pub fn from_na<T>(m: &na::DMatrix<T>) -> nd::Array2<T>
where T: na::Scalar
{
    nd::Array2::from_shape_fn((m.nrows(), m.ncols()), |(i, j)| m[(i, j)].clone())
}

fn check_square<T>(a: &nd::Array2<T>) -> BackendResult<usize> {
    let (r, c) = a.dim();
    (r == c).then_some(r).ok_or(NotSquare(r, c))
}

/// Numeric operations required by the quantum-information functions.
pub trait Backend {
    /// Eigenvalues (ascending) and eigenvectors (as columns) of a Hermitian
    /// matrix.
    fn eigh(&self, a: &nd::Array2<C64>)
        -> BackendResult<(nd::Array1<f64>, nd::Array2<C64>)>;

    /// `exp(t A)` for Hermitian `A`.
    fn expmh(&self, a: &nd::Array2<C64>, t: f64) -> BackendResult<nd::Array2<C64>>;

    /// Square root of a Hermitian positive-semidefinite matrix. Negative
    /// eigenvalues are clipped to zero.
    fn sqrtmh(&self, a: &nd::Array2<C64>) -> BackendResult<nd::Array2<C64>>;

    /// Singular value decomposition `A = U diag(s) V†`, with singular values in
    /// descending order. Returns `(U, s, V†)`.
    fn svd(&self, a: &nd::Array2<C64>)
        -> BackendResult<(nd::Array2<C64>, nd::Array1<f64>, nd::Array2<C64>)>;

    /// Inverse of a real matrix.
    fn inv_real(&self, a: &nd::Array2<f64>) -> BackendResult<nd::Array2<f64>>;

    /// Draw `shots` samples from the categorical distribution over
    /// `0..probs.len()` with (unnormalized) weights `probs`.
    fn sample_categorical<R>(&self, probs: &[f64], shots: usize, rng: &mut R)
        -> BackendResult<Vec<usize>>
    where R: Rng + ?Sized;

    /// Eigenvalues (ascending) of a Hermitian matrix.
    fn eigvalsh(&self, a: &nd::Array2<C64>) -> BackendResult<nd::Array1<f64>> {
        self.eigh(a).map(|(vals, _)| vals)
    }
}

/// [`Backend`] implemented with `nalgebra` decompositions.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct DenseBackend {
    /// Eigenvalues with magnitude below this threshold are treated as zero in
    /// matrix functions.
    pub eig_eps: f64,
}

impl Default for DenseBackend {
    fn default() -> Self { Self { eig_eps: 1e-14 } }
}

impl DenseBackend {
    pub fn new(eig_eps: f64) -> Self { Self { eig_eps: eig_eps.abs() } }

    // apply a real function to the eigenvalues of a Hermitian matrix
    fn map_eigenvalues<F>(&self, a: &nd::Array2<C64>, f: F)
        -> BackendResult<nd::Array2<C64>>
    where F: Fn(f64) -> f64
    {
        let (vals, vecs) = self.eigh(a)?;
        let weights: Vec<C64>
            = vals.iter()
            .map(|l| if l.abs() < self.eig_eps { 0.0 } else { *l })
            .map(|l| C64::from(f(l)))
            .collect();
        let scaled: nd::Array2<C64>
            = nd::Array2::from_shape_fn(
                vecs.dim(), |(i, j)| vecs[[i, j]] * weights[j]);
        let vh = vecs.t().mapv(|z| z.conj());
        Ok(scaled.dot(&vh))
    }
}

impl Backend for DenseBackend {
    fn eigh(&self, a: &nd::Array2<C64>)
        -> BackendResult<(nd::Array1<f64>, nd::Array2<C64>)>
    {
        let n = check_square(a)?;
        let eig = to_na(a).symmetric_eigen();
        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|i, j| {
            eig.eigenvalues[*i].total_cmp(&eig.eigenvalues[*j])
        });
        let vals: nd::Array1<f64>
            = order.iter().map(|k| eig.eigenvalues[*k]).collect();
        let vecs: nd::Array2<C64>
            = nd::Array2::from_shape_fn(
                (n, n), |(i, j)| eig.eigenvectors[(i, order[j])]);
        Ok((vals, vecs))
    }

    fn expmh(&self, a: &nd::Array2<C64>, t: f64) -> BackendResult<nd::Array2<C64>> {
        self.map_eigenvalues(a, |l| (t * l).exp())
    }

    fn sqrtmh(&self, a: &nd::Array2<C64>) -> BackendResult<nd::Array2<C64>> {
        self.map_eigenvalues(a, |l| l.max(0.0).sqrt())
    }

    fn svd(&self, a: &nd::Array2<C64>)
        -> BackendResult<(nd::Array2<C64>, nd::Array1<f64>, nd::Array2<C64>)>
    {
        let svd = to_na(a).svd(true, true);
        let u = svd.u.ok_or(SvdFailed)?;
        let v_t = svd.v_t.ok_or(SvdFailed)?;
        let s = svd.singular_values;
        let mut order: Vec<usize> = (0..s.len()).collect();
        order.sort_by(|i, j| s[*j].total_cmp(&s[*i]));
        let u_sorted: nd::Array2<C64>
            = nd::Array2::from_shape_fn(
                (u.nrows(), order.len()), |(i, j)| u[(i, order[j])]);
        let s_sorted: nd::Array1<f64> = order.iter().map(|k| s[*k]).collect();
        let v_t_sorted: nd::Array2<C64>
            = nd::Array2::from_shape_fn(
                (order.len(), v_t.ncols()), |(i, j)| v_t[(order[i], j)]);
        Ok((u_sorted, s_sorted, v_t_sorted))
    }

    fn inv_real(&self, a: &nd::Array2<f64>) -> BackendResult<nd::Array2<f64>> {
        check_square(a)?;
        to_na(a).try_inverse()
            .map(|inv| from_na(&inv))
            .ok_or(Singular)
    }

    fn sample_categorical<R>(&self, probs: &[f64], shots: usize, rng: &mut R)
        -> BackendResult<Vec<usize>>
    where R: Rng + ?Sized
    {
        let dist = Categorical::new(probs)
            .map_err(|err| Distribution(err.to_string()))?;
        Ok(
            (0..shots)
            .map(|_| {
                let k: f64 = dist.sample(rng);
                k as usize
            })
            .collect()
        )
    }
}
