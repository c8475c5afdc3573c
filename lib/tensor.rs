//! Dense, index-labeled tensors over [`Complex64`][C64].
//!
//! A [`Tensor`] pairs an [`ndarray::ArrayD`] with one label per axis. Labels
//! implement [`Idx`] and are used only to decide which axes are summed over in
//! a contraction: two tensors contract over every label they share, and a
//! label repeated within a single tensor is traced out when the tensor is
//! built.
//!
//! ```
//! use ndarray as nd;
//! use num_complex::Complex64 as C64;
//! use qtensor_net::tensor::{ Idx, Tensor };
//!
//! #[derive(Clone, Debug, PartialEq, Eq)]
//! struct Leg(char);
//!
//! impl Idx for Leg {
//!     fn dim(&self) -> usize { 2 }
//! }
//!
//! let x = nd::array![
//!     [C64::new(0.0, 0.0), C64::new(1.0, 0.0)],
//!     [C64::new(1.0, 0.0), C64::new(0.0, 0.0)],
//! ].into_dyn();
//! let a = Tensor::from_array(vec![Leg('i'), Leg('j')], x.clone()).unwrap();
//! let b = Tensor::from_array(vec![Leg('j'), Leg('k')], x).unwrap();
//! let xx = a.contract(b).unwrap();
//! let arr = xx.into_array_ordered(&[Leg('i'), Leg('k')]).unwrap();
//! assert_eq!(arr[[0, 0]], C64::new(1.0, 0.0));
//! assert_eq!(arr[[0, 1]], C64::new(0.0, 0.0));
//! ```

use std::{ fmt, ops::Range };
use itertools::Itertools;
use ndarray as nd;
use num_complex::Complex64 as C64;
use num_traits::Zero;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TensorError {
    /// Returned when the number of labels doesn't match the rank of the array
    /// they're attached to.
    #[error("error in tensor creation: got {0} indices for an array of rank {1}")]
    IndexCount(usize, usize),

    /// Returned when a label's dimension doesn't match the length of its axis.
    #[error("error in tensor creation: index {0} has dimension {1}, but its axis has length {2}")]
    IndexDim(String, usize, usize),

    /// Returned when a label appears more than twice in a single tensor.
    #[error("error in tensor creation: index {0} appears more than twice")]
    RepeatedIndex(String),

    /// Returned when a requested axis ordering is not a permutation of a
    /// tensor's labels.
    #[error("error in tensor reordering: order does not match the tensor's indices")]
    OrderMismatch,

    /// Returned by failed reshapes.
    #[error("shape error: {0}")]
    ShapeError(#[from] nd::ShapeError),
}
use TensorError::*;
pub type TensorResult<T> = Result<T, TensorError>;

/// Describes a tensor index.
///
/// Indices are compared by equality only; two axes (on the same or different
/// tensors) carrying equal indices are summed over when contracted.
pub trait Idx: Clone + Eq + fmt::Debug {
    /// Return the number of values the index can take.
    fn dim(&self) -> usize;

    /// Return an identifying label for the index. This method is used only for
    /// printing purposes.
    fn label(&self) -> String { format!("{:?}", self) }

    /// Return an iterator over all possible index values. The default
    /// implementation returns `0..self.dim()`.
    fn iter(&self) -> Range<usize> { 0..self.dim() }
}

/// A dense tensor with labeled axes.
///
/// Rank-0 tensors are stored as bare scalars.
#[derive(Clone, PartialEq)]
pub struct Tensor<T>(TensorData<T>);

#[derive(Clone, PartialEq)]
enum TensorData<T> {
    Scalar(C64),
    Tensor(Vec<T>, nd::ArrayD<C64>),
}

impl<T> fmt::Debug for Tensor<T>
where T: fmt::Debug
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tensor(")?;
        match &self.0 {
            TensorData::Scalar(a) => {
                a.fmt(f)?;
                write!(f, ", type=scalar, rank=0, indices=[]")?;
            },
            TensorData::Tensor(idxs, a) => {
                writeln!(f)?;
                a.fmt(f)?;
                write!(
                    f,
                    ",\ntype=tensor, rank={}, indices={:?}\n",
                    idxs.len(),
                    idxs,
                )?;
            },
        }
        write!(f, ")")
    }
}

impl<T> fmt::Display for Tensor<T>
where T: Idx
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            TensorData::Scalar(a) => write!(f, "{} {{ }}", a),
            TensorData::Tensor(idxs, a) => {
                a.fmt(f)?;
                write!(
                    f,
                    " {{ {} }}",
                    idxs.iter().map(|idx| idx.label()).join(", "),
                )
            },
        }
    }
}

/// Collect the elements of `a` into a matrix after permuting its axes.
fn to_matrix(a: nd::ArrayD<C64>, perm: Vec<usize>, rows: usize, cols: usize)
    -> TensorResult<nd::Array2<C64>>
{
    let data: Vec<C64> = a.permuted_axes(perm).iter().copied().collect();
    Ok(nd::Array2::from_shape_vec((rows, cols), data)?)
}

/// Sum over the diagonal of axes `i` and `j`, which must have equal lengths.
pub(crate) fn trace_axes(a: nd::ArrayD<C64>, i: usize, j: usize)
    -> TensorResult<nd::ArrayD<C64>>
{
    let d = a.shape()[i];
    let rest: Vec<usize>
        = (0..a.ndim()).filter(|k| *k != i && *k != j).collect();
    let shape: Vec<usize> = rest.iter().map(|k| a.shape()[*k]).collect();
    let n: usize = shape.iter().product();
    let perm: Vec<usize> = rest.iter().copied().chain([i, j]).collect();
    let flat = to_matrix(a, perm, n, d * d)?;
    let data: Vec<C64>
        = flat.rows().into_iter()
        .map(|row| (0..d).map(|k| row[k * d + k]).sum())
        .collect();
    Ok(nd::ArrayD::from_shape_vec(shape, data)?)
}

impl<T> Tensor<T>
where T: Idx
{
    /// Create a new rank-0 (scalar) tensor.
    pub fn new_scalar(val: C64) -> Self { Self(TensorData::Scalar(val)) }

    /// Wrap an array, attaching one index to each axis.
    ///
    /// Any index that appears twice is traced over immediately. Fails if the
    /// number of indices doesn't match the rank of the array, an index's
    /// dimension doesn't match its axis, or an index appears more than twice.
    pub fn from_array(indices: Vec<T>, array: nd::ArrayD<C64>)
        -> TensorResult<Self>
    {
        if indices.len() != array.ndim() {
            return Err(IndexCount(indices.len(), array.ndim()));
        }
        for (idx, len) in indices.iter().zip(array.shape()) {
            if idx.dim() != *len {
                return Err(IndexDim(idx.label(), idx.dim(), *len));
            }
        }
        let mut indices = indices;
        let mut array = array;
        loop {
            let repeated
                = indices.iter().enumerate()
                .find_map(|(i, idx)| {
                    indices.iter().enumerate().skip(i + 1)
                        .filter(|(_, other)| *other == idx)
                        .map(|(j, _)| j)
                        .collect::<Vec<usize>>()
                        .split_first()
                        .map(|(j, more)| (i, *j, !more.is_empty()))
                });
            match repeated {
                None => break,
                Some((i, _, true)) => {
                    return Err(RepeatedIndex(indices[i].label()));
                },
                Some((i, j, false)) => {
                    array = trace_axes(array, i, j)?;
                    indices.remove(j);
                    indices.remove(i);
                },
            }
        }
        if indices.is_empty() {
            let val = array.iter().next().copied().unwrap_or_else(C64::zero);
            Ok(Self::new_scalar(val))
        } else {
            Ok(Self(TensorData::Tensor(indices, array)))
        }
    }

    /// Return `true` if `self` has rank 0.
    pub fn is_scalar(&self) -> bool {
        matches!(self.0, TensorData::Scalar(_))
    }

    /// Return `true` if `self` has the given index.
    pub fn has_index(&self, index: &T) -> bool {
        match &self.0 {
            TensorData::Scalar(_) => false,
            TensorData::Tensor(idxs, _) => idxs.contains(index),
        }
    }

    /// Return the rank of `self`.
    pub fn rank(&self) -> usize { self.indices().len() }

    /// Return the shape (dimensions of each index) of `self`.
    pub fn shape(&self) -> Vec<usize> {
        self.indices().iter().map(|idx| idx.dim()).collect()
    }

    /// Return the indices of `self` in axis order.
    ///
    /// If `self` is a scalar, the slice is empty.
    pub fn indices(&self) -> &[T] {
        match &self.0 {
            TensorData::Scalar(_) => &[],
            TensorData::Tensor(idxs, _) => idxs.as_slice(),
        }
    }

    /// Contract `self` with `other` over all common indices, consuming both.
    ///
    /// The result carries the non-common indices of `self` followed by those
    /// of `other`. Tensors without common indices produce their outer product.
    pub fn contract(self, other: Self) -> TensorResult<Self> {
        match (self.0, other.0) {
            (TensorData::Scalar(a), TensorData::Scalar(b)) => {
                Ok(Self::new_scalar(a * b))
            },
            (TensorData::Scalar(a), TensorData::Tensor(idxs, b))
            | (TensorData::Tensor(idxs, b), TensorData::Scalar(a)) => {
                Ok(Self(TensorData::Tensor(idxs, b.mapv(|bk| a * bk))))
            },
            (TensorData::Tensor(idxs_a, a), TensorData::Tensor(idxs_b, b)) => {
                let common_a: Vec<usize>
                    = (0..idxs_a.len())
                    .filter(|k| idxs_b.contains(&idxs_a[*k]))
                    .collect();
                let common_b: Vec<usize>
                    = common_a.iter()
                    .filter_map(|ka| {
                        idxs_b.iter().position(|idx| *idx == idxs_a[*ka])
                    })
                    .collect();
                let free_a: Vec<usize>
                    = (0..idxs_a.len()).filter(|k| !common_a.contains(k))
                    .collect();
                let free_b: Vec<usize>
                    = (0..idxs_b.len()).filter(|k| !common_b.contains(k))
                    .collect();
                let m: usize = free_a.iter().map(|k| a.shape()[*k]).product();
                let n: usize = free_b.iter().map(|k| b.shape()[*k]).product();
                let s: usize
                    = common_a.iter().map(|k| a.shape()[*k]).product();
                let new_shape: Vec<usize>
                    = free_a.iter().map(|k| a.shape()[*k])
                    .chain(free_b.iter().map(|k| b.shape()[*k]))
                    .collect();
                let new_idxs: Vec<T>
                    = free_a.iter().map(|k| idxs_a[*k].clone())
                    .chain(free_b.iter().map(|k| idxs_b[*k].clone()))
                    .collect();
                let perm_a: Vec<usize>
                    = free_a.iter().chain(common_a.iter()).copied().collect();
                let perm_b: Vec<usize>
                    = common_b.iter().chain(free_b.iter()).copied().collect();
                let amat = to_matrix(a, perm_a, m, s)?;
                let bmat = to_matrix(b, perm_b, s, n)?;
                let c = amat.dot(&bmat);
                if new_idxs.is_empty() {
                    Ok(Self::new_scalar(c[[0, 0]]))
                } else {
                    let data: Vec<C64> = c.iter().copied().collect();
                    let arr = nd::ArrayD::from_shape_vec(new_shape, data)?;
                    Ok(Self(TensorData::Tensor(new_idxs, arr)))
                }
            },
        }
    }

    /// Return a new tensor containing the element-wise conjugation of `self`.
    pub fn conj(&self) -> Self {
        match &self.0 {
            TensorData::Scalar(z) => Self::new_scalar(z.conj()),
            TensorData::Tensor(idxs, z) => {
                Self(TensorData::Tensor(idxs.clone(), z.mapv(|zk| zk.conj())))
            },
        }
    }

    /// Unwrap the underlying array, with axes in their current order.
    pub fn into_array(self) -> nd::ArrayD<C64> {
        match self.0 {
            TensorData::Scalar(z) => nd::arr0(z).into_dyn(),
            TensorData::Tensor(_, a) => a,
        }
    }

    /// Unwrap the underlying array with its axes permuted into the order of
    /// `order`, which must contain each index of `self` exactly once.
    pub fn into_array_ordered(self, order: &[T]) -> TensorResult<nd::ArrayD<C64>> {
        match self.0 {
            TensorData::Scalar(z) => {
                if order.is_empty() {
                    Ok(nd::arr0(z).into_dyn())
                } else {
                    Err(OrderMismatch)
                }
            },
            TensorData::Tensor(idxs, a) => {
                if order.len() != idxs.len() { return Err(OrderMismatch); }
                let perm: Vec<usize>
                    = order.iter()
                    .map(|idx| idxs.iter().position(|k| k == idx))
                    .collect::<Option<Vec<usize>>>()
                    .ok_or(OrderMismatch)?;
                if !perm.iter().all_unique() { return Err(OrderMismatch); }
                Ok(a.permuted_axes(perm).as_standard_layout().into_owned())
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, PartialEq, Eq)]
    struct L(usize, usize);

    impl Idx for L {
        fn dim(&self) -> usize { self.1 }
    }

    fn c(re: f64) -> C64 { C64::new(re, 0.0) }

    fn counting(shape: &[usize]) -> nd::ArrayD<C64> {
        let n: usize = shape.iter().product();
        nd::ArrayD::from_shape_vec(
            shape.to_vec(),
            (0..n).map(|k| c(k as f64)).collect(),
        ).unwrap()
    }

    #[test]
    fn matrix_product() {
        let a = Tensor::from_array(vec![L(0, 2), L(1, 3)], counting(&[2, 3]))
            .unwrap();
        let b = Tensor::from_array(vec![L(1, 3), L(2, 2)], counting(&[3, 2]))
            .unwrap();
        let ab = a.contract(b).unwrap()
            .into_array_ordered(&[L(0, 2), L(2, 2)]).unwrap();
        // [[0 1 2] [3 4 5]] . [[0 1] [2 3] [4 5]]
        assert_eq!(ab[[0, 0]], c(10.0));
        assert_eq!(ab[[0, 1]], c(13.0));
        assert_eq!(ab[[1, 0]], c(28.0));
        assert_eq!(ab[[1, 1]], c(40.0));
    }

    #[test]
    fn repeated_index_is_traced() {
        let t = Tensor::from_array(vec![L(0, 3), L(0, 3)], counting(&[3, 3]))
            .unwrap();
        assert!(t.is_scalar());
        assert_eq!(t.into_array().into_iter().next().unwrap(), c(12.0));

        let t = Tensor::from_array(
            vec![L(0, 2), L(1, 3), L(0, 2)],
            counting(&[2, 3, 2]),
        ).unwrap();
        assert_eq!(t.indices(), &[L(1, 3)]);
        let arr = t.into_array();
        // element (i, j, k) = 6i + 2j + k; sum over i = k
        assert_eq!(arr[[0]], c(7.0));
        assert_eq!(arr[[2]], c(15.0));
    }

    #[test]
    fn outer_product_without_common_indices() {
        let a = Tensor::from_array(vec![L(0, 2)], counting(&[2])).unwrap();
        let b = Tensor::from_array(vec![L(1, 2)], counting(&[2])).unwrap();
        let ab = a.contract(b).unwrap();
        assert_eq!(ab.shape(), vec![2, 2]);
        let arr = ab.into_array_ordered(&[L(1, 2), L(0, 2)]).unwrap();
        assert_eq!(arr[[1, 1]], c(1.0));
        assert_eq!(arr[[0, 1]], c(0.0));
    }

    #[test]
    fn bad_construction() {
        assert!(matches!(
            Tensor::from_array(vec![L(0, 2)], counting(&[2, 2])),
            Err(IndexCount(1, 2)),
        ));
        assert!(matches!(
            Tensor::from_array(vec![L(0, 3)], counting(&[2])),
            Err(IndexDim(..)),
        ));
        assert!(matches!(
            Tensor::from_array(
                vec![L(0, 2), L(0, 2), L(0, 2)],
                counting(&[2, 2, 2]),
            ),
            Err(RepeatedIndex(..)),
        ));
    }
}
