//! Quantum operators, circuits and quantum-information tools built on a small
//! tensor-network core.
//!
//! - [`tensor`] and [`network`] hold labeled dense tensors and the graph of
//!   nodes and edges they live in.
//! - [`quantum`] wraps sub-networks as operators, vectors and scalars over
//!   tensor-product spaces.
//! - [`qinfo`] computes entropies, fidelities and related quantities from
//!   those objects through a numeric [`backend`].
//! - [`gate`], [`ir`] and [`circuit`] describe gates, record circuits as a
//!   replayable log, and simulate them as networks.
//! - [`pauli`] builds Pauli-string sums and Heisenberg Hamiltonians, and
//!   [`mitigation`] corrects measurement counts for readout errors.

use num_complex::{ ComplexFloat, Complex };
use num_traits::{ Float, Zero };

pub mod tensor;
pub mod network;
pub mod quantum;
pub mod backend;
pub mod qinfo;

pub mod pauli;
pub mod gate;
pub mod ir;
pub mod circuit;
pub mod mitigation;

/// Extension trait for [`ComplexFloat`].
pub trait ComplexFloatExt: ComplexFloat {
    /// Return the imaginary unit, *i*.
    fn i() -> Self;

    /// Convert from `Self::Real`.
    ///
    /// Should adhere to the usual relationship between ordinary complex and
    /// real numbers, i.e. the result should have imaginary part equal to zero.
    fn from_re(x: Self::Real) -> Self;

    /// Construct from real and imaginary components.
    fn from_components(re: Self::Real, im: Self::Real) -> Self;

    /// Create a new value of unit magnitude with a given phase angle.
    fn cis(angle: Self::Real) -> Self;
}

impl<T> ComplexFloatExt for Complex<T>
where
    Complex<T>: ComplexFloat<Real = T>,
    T: Zero + Float,
{
    fn i() -> Self { Complex::i() }

    fn from_re(x: Self::Real) -> Self {
        Self { re: x, im: <Self::Real as Zero>::zero() }
    }

    fn from_components(re: Self::Real, im: Self::Real) -> Self {
        Self { re, im }
    }

    fn cis(angle: Self::Real) -> Self { Complex::cis(angle) }
}
