//! Definitions of the gates that can be applied to an
//! [`AbstractCircuit`][crate::ir::AbstractCircuit].
//!
//! Gates are identified by a [`GateKind`]: either a [`FixedGate`], whose
//! matrix is constant, or a [`VariableGate`], whose matrix is built from named
//! [`Params`]. Adjoints are represented explicitly so that a circuit can be
//! inverted by rebuilding each gate from its stored parameters.
//!
//! A gate on `k` qubits is a `2^k × 2^k` unitary, with qubit 0 as the most
//! significant bit of the basis index. Its tensor form has shape `[2; 2k]`,
//! with the `k` output legs first.

use std::collections::BTreeMap;
use itertools::Itertools;
use ndarray as nd;
use num_complex::{ ComplexFloat, Complex64 as C64 };
use num_traits::{ One, Zero };
use once_cell::sync::Lazy;
use rand::{
    Rng,
    distributions::Distribution,
};
use rustc_hash::FxHashMap as HashMap;
use serde::{ Deserialize, Serialize };
use statrs::distribution::Normal;
use thiserror::Error;
use crate::{
    ComplexFloatExt,
    backend::{ Backend, BackendError, DenseBackend, to_na, from_na },
    network::{ Edge, Network, NetworkError },
    quantum::{ QuOperator, QuantumError, quantum_constructor },
};

#[derive(Debug, Error)]
pub enum GateError {
    /// Returned when a gate name isn't in the gate table.
    #[error("error in gate: unknown gate '{0}'")]
    UnknownGate(String),

    /// Returned when a required parameter is missing.
    #[error("error in gate: missing parameter '{0}'")]
    MissingParam(String),

    /// Returned when a parameter has the wrong type.
    #[error("error in gate: parameter '{0}' must be {1}")]
    ParamType(String, &'static str),

    /// Returned when a gate is applied to the wrong number of qubits.
    #[error("error in gate: '{0}' acts on {1} qubit(s), got {2}")]
    QubitCount(String, usize, usize),

    /// Returned when a user-supplied unitary is not a square matrix of
    /// power-of-two size.
    #[error("error in gate: expected a 2^k x 2^k matrix, got {0}x{1}")]
    BadUnitary(usize, usize),

    /// Returned when a control value is neither 0 nor 1.
    #[error("error in gate: control values must be 0 or 1, got {0}")]
    BadControl(usize),

    #[error("error in gate: {0}")]
    BackendError(#[from] BackendError),

    #[error("error in gate: {0}")]
    NetworkError(#[from] NetworkError),

    #[error("error in gate: {0}")]
    QuantumError(#[from] QuantumError),

    #[error("error in gate: {0}")]
    ShapeError(#[from] nd::ShapeError),
}
use GateError::*;
pub type GateResult<T> = Result<T, GateError>;

/// A single named gate parameter.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ParamRepr", into = "ParamRepr")]
pub enum Param {
    /// A rotation angle or other real number.
    Real(f64),
    /// A list of integers, e.g. control values.
    Ints(Vec<usize>),
    /// A complex matrix, e.g. a user-supplied unitary.
    Matrix(nd::Array2<C64>),
}

impl From<f64> for Param {
    fn from(x: f64) -> Self { Self::Real(x) }
}

impl From<Vec<usize>> for Param {
    fn from(ints: Vec<usize>) -> Self { Self::Ints(ints) }
}

impl From<nd::Array2<C64>> for Param {
    fn from(mat: nd::Array2<C64>) -> Self { Self::Matrix(mat) }
}

// serialized form: complex matrices are stored as separate real and imaginary
// row lists
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum ParamRepr {
    Real(f64),
    Ints(Vec<usize>),
    Matrix { re: Vec<Vec<f64>>, im: Vec<Vec<f64>> },
}

impl From<Param> for ParamRepr {
    fn from(param: Param) -> Self {
        match param {
            Param::Real(x) => Self::Real(x),
            Param::Ints(ints) => Self::Ints(ints),
            Param::Matrix(mat) => {
                let re = mat.rows().into_iter()
                    .map(|row| row.iter().map(|z| z.re).collect())
                    .collect();
                let im = mat.rows().into_iter()
                    .map(|row| row.iter().map(|z| z.im).collect())
                    .collect();
                Self::Matrix { re, im }
            },
        }
    }
}

impl TryFrom<ParamRepr> for Param {
    type Error = String;

    fn try_from(repr: ParamRepr) -> Result<Self, Self::Error> {
        match repr {
            ParamRepr::Real(x) => Ok(Self::Real(x)),
            ParamRepr::Ints(ints) => Ok(Self::Ints(ints)),
            ParamRepr::Matrix { re, im } => {
                let nrows = re.len();
                let ncols = re.first().map(|row| row.len()).unwrap_or(0);
                let ragged
                    = im.len() != nrows
                    || re.iter().chain(im.iter()).any(|row| row.len() != ncols);
                if ragged {
                    return Err("ragged matrix parameter".to_string());
                }
                let data: Vec<C64>
                    = re.iter().flatten().zip(im.iter().flatten())
                    .map(|(r, i)| C64::new(*r, *i))
                    .collect();
                nd::Array2::from_shape_vec((nrows, ncols), data)
                    .map(Self::Matrix)
                    .map_err(|err| err.to_string())
            },
        }
    }
}

/// Named parameters of a [`VariableGate`].
pub type Params = BTreeMap<String, Param>;

/// Build a [`Params`] from `key => value` pairs.
///
/// ```
/// use qtensor_net::params;
/// let p = params!{ "theta" => 0.5, "ctrl" => vec![1_usize, 0] };
/// assert_eq!(p.len(), 2);
/// ```
#[macro_export]
macro_rules! params {
    ( $( $key:expr => $val:expr ),* $(,)? ) => {
        {
            #[allow(unused_mut)]
            let mut p = $crate::gate::Params::new();
            $( p.insert(String::from($key), $crate::gate::Param::from($val)); )*
            p
        }
    }
}

fn get_param<'a>(params: Option<&'a Params>, key: &str) -> GateResult<&'a Param> {
    params.and_then(|p| p.get(key)).ok_or_else(|| MissingParam(key.to_string()))
}

fn get_real(params: Option<&Params>, key: &str) -> GateResult<f64> {
    match get_param(params, key)? {
        Param::Real(x) => Ok(*x),
        _ => Err(ParamType(key.to_string(), "a real number")),
    }
}

fn get_real_or(params: Option<&Params>, key: &str, default: f64)
    -> GateResult<f64>
{
    match get_param(params, key) {
        Err(MissingParam(_)) => Ok(default),
        Err(err) => Err(err),
        Ok(Param::Real(x)) => Ok(*x),
        Ok(_) => Err(ParamType(key.to_string(), "a real number")),
    }
}

fn get_ints<'a>(params: Option<&'a Params>, key: &str) -> GateResult<&'a [usize]> {
    match get_param(params, key)? {
        Param::Ints(ints) => Ok(ints),
        _ => Err(ParamType(key.to_string(), "a list of integers")),
    }
}

fn get_matrix<'a>(params: Option<&'a Params>, key: &str)
    -> GateResult<&'a nd::Array2<C64>>
{
    match get_param(params, key)? {
        Param::Matrix(mat) => Ok(mat),
        _ => Err(ParamType(key.to_string(), "a complex matrix")),
    }
}

/// Return the number of qubits a `2^k × 2^k` matrix acts on.
pub fn unitary_qubits(mat: &nd::Array2<C64>) -> GateResult<usize> {
    let (r, c) = mat.dim();
    if r != c || !r.is_power_of_two() { return Err(BadUnitary(r, c)); }
    Ok(r.trailing_zeros() as usize)
}

/// Gates whose matrices take no parameters.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FixedGate {
    /// Identity.
    I,
    /// π rotation about X.
    X,
    /// π rotation about Y.
    Y,
    /// π rotation about Z.
    Z,
    /// Hadamard.
    H,
    /// π/4 phase.
    T,
    /// π/2 phase.
    S,
    /// –π/4 phase.
    Td,
    /// –π/2 phase.
    Sd,
    /// Square root of `(X + Y)/√2`.
    Wroot,
    /// Z-controlled X.
    Cnot,
    /// Z-controlled Z.
    Cz,
    /// Swap.
    Swap,
    /// Z-controlled Y.
    Cy,
    /// X applied when the control is `∣0⟩`.
    Ox,
    /// Y applied when the control is `∣0⟩`.
    Oy,
    /// Z applied when the control is `∣0⟩`.
    Oz,
    /// Doubly controlled X.
    Toffoli,
    /// Controlled swap.
    Fredkin,
}

impl FixedGate {
    pub const ALL: [Self; 19] = [
        Self::I, Self::X, Self::Y, Self::Z, Self::H, Self::T, Self::S,
        Self::Td, Self::Sd, Self::Wroot, Self::Cnot, Self::Cz, Self::Swap,
        Self::Cy, Self::Ox, Self::Oy, Self::Oz, Self::Toffoli, Self::Fredkin,
    ];

    /// Return the canonical name of the gate.
    pub fn name(&self) -> &'static str {
        match self {
            Self::I => "i",
            Self::X => "x",
            Self::Y => "y",
            Self::Z => "z",
            Self::H => "h",
            Self::T => "t",
            Self::S => "s",
            Self::Td => "td",
            Self::Sd => "sd",
            Self::Wroot => "wroot",
            Self::Cnot => "cnot",
            Self::Cz => "cz",
            Self::Swap => "swap",
            Self::Cy => "cy",
            Self::Ox => "ox",
            Self::Oy => "oy",
            Self::Oz => "oz",
            Self::Toffoli => "toffoli",
            Self::Fredkin => "fredkin",
        }
    }

    /// Return the number of qubits the gate acts on.
    pub fn nqubits(&self) -> usize {
        match self {
            Self::Toffoli | Self::Fredkin => 3,
            Self::Cnot | Self::Cz | Self::Swap | Self::Cy
                | Self::Ox | Self::Oy | Self::Oz => 2,
            _ => 1,
        }
    }

    /// Return `true` if the gate is its own adjoint.
    pub fn is_hermitian(&self) -> bool {
        !matches!(self, Self::T | Self::S | Self::Td | Self::Sd | Self::Wroot)
    }

    /// Return the gate matrix.
    pub fn matrix(&self) -> &'static nd::Array2<C64> {
        match self {
            Self::I => Lazy::force(&IMAT),
            Self::X => Lazy::force(&XMAT),
            Self::Y => Lazy::force(&YMAT),
            Self::Z => Lazy::force(&ZMAT),
            Self::H => Lazy::force(&HMAT),
            Self::T => Lazy::force(&TMAT),
            Self::S => Lazy::force(&SMAT),
            Self::Td => Lazy::force(&TDMAT),
            Self::Sd => Lazy::force(&SDMAT),
            Self::Wroot => Lazy::force(&WROOTMAT),
            Self::Cnot => Lazy::force(&CXMAT),
            Self::Cz => Lazy::force(&CZMAT),
            Self::Swap => Lazy::force(&SWAPMAT),
            Self::Cy => Lazy::force(&CYMAT),
            Self::Ox => Lazy::force(&OXMAT),
            Self::Oy => Lazy::force(&OYMAT),
            Self::Oz => Lazy::force(&OZMAT),
            Self::Toffoli => Lazy::force(&TOFFOLIMAT),
            Self::Fredkin => Lazy::force(&FREDKINMAT),
        }
    }
}

/// Gates whose matrices are built from [`Params`].
///
/// Parameter names: `theta`, `alpha`, `phi`, `lbd` (real), `unitary` (complex
/// matrix) and `ctrl` (control values).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableGate {
    /// General rotation `cos θ I - i sin θ n·σ`, with the axis `n` at polar
    /// angle `alpha` and azimuth `phi`.
    R,
    /// Controlled `R`.
    Cr,
    /// Euler-angle unitary with `theta`, `phi`, `lbd`.
    U,
    /// Controlled `U`.
    Cu,
    /// `exp(-i θ X / 2)`.
    Rx,
    /// `exp(-i θ Y / 2)`.
    Ry,
    /// `exp(-i θ Z / 2)`.
    Rz,
    /// `diag(1, e^{iθ})`.
    Phase,
    /// `exp(-i θ XX / 2)`.
    Rxx,
    /// `exp(-i θ YY / 2)`.
    Ryy,
    /// `exp(-i θ ZZ / 2)`.
    Rzz,
    /// Controlled `Phase`.
    Cphase,
    /// Controlled `Rx`.
    Crx,
    /// Controlled `Ry`.
    Cry,
    /// Controlled `Rz`.
    Crz,
    /// `Rx` applied when the control is `∣0⟩`.
    Orx,
    /// `Ry` applied when the control is `∣0⟩`.
    Ory,
    /// `Rz` applied when the control is `∣0⟩`.
    Orz,
    /// Partial iSWAP, `theta = 1` (default) giving the full gate.
    Iswap,
    /// An arbitrary unitary.
    Any,
    /// `exp(-i θ U)` for a Hermitian `unitary`.
    Exp,
    /// `cos θ I - i sin θ U` for a `unitary` squaring to the identity.
    Exp1,
    /// `unitary` controlled on the values `ctrl` of the leading qubits.
    Multicontrol,
    /// An arbitrary `unitary` applied as a matrix product operator.
    Mpo,
}

impl VariableGate {
    pub const ALL: [Self; 24] = [
        Self::R, Self::Cr, Self::U, Self::Cu, Self::Rx, Self::Ry, Self::Rz,
        Self::Phase, Self::Rxx, Self::Ryy, Self::Rzz, Self::Cphase, Self::Crx,
        Self::Cry, Self::Crz, Self::Orx, Self::Ory, Self::Orz, Self::Iswap,
        Self::Any, Self::Exp, Self::Exp1, Self::Multicontrol, Self::Mpo,
    ];

    /// Return the canonical name of the gate.
    pub fn name(&self) -> &'static str {
        match self {
            Self::R => "r",
            Self::Cr => "cr",
            Self::U => "u",
            Self::Cu => "cu",
            Self::Rx => "rx",
            Self::Ry => "ry",
            Self::Rz => "rz",
            Self::Phase => "phase",
            Self::Rxx => "rxx",
            Self::Ryy => "ryy",
            Self::Rzz => "rzz",
            Self::Cphase => "cphase",
            Self::Crx => "crx",
            Self::Cry => "cry",
            Self::Crz => "crz",
            Self::Orx => "orx",
            Self::Ory => "ory",
            Self::Orz => "orz",
            Self::Iswap => "iswap",
            Self::Any => "any",
            Self::Exp => "exp",
            Self::Exp1 => "exp1",
            Self::Multicontrol => "multicontrol",
            Self::Mpo => "mpo",
        }
    }

    /// Return `true` if the gate is applied as an operator network rather
    /// than a single tensor.
    pub fn is_mpo(&self) -> bool { matches!(self, Self::Multicontrol | Self::Mpo) }

    /// Return the number of qubits the gate acts on, given its parameters.
    pub fn nqubits(&self, params: Option<&Params>) -> GateResult<usize> {
        match self {
            Self::R | Self::U | Self::Rx | Self::Ry | Self::Rz | Self::Phase
                => Ok(1),
            Self::Any | Self::Exp | Self::Exp1 | Self::Mpo
                => unitary_qubits(get_matrix(params, "unitary")?),
            Self::Multicontrol => {
                let ctrl = get_ints(params, "ctrl")?;
                Ok(ctrl.len() + unitary_qubits(get_matrix(params, "unitary")?)?)
            },
            _ => Ok(2),
        }
    }

    /// Build the gate matrix.
    pub fn matrix(&self, params: Option<&Params>) -> GateResult<nd::Array2<C64>> {
        let theta = || get_real(params, "theta");
        let mat
            = match self {
                Self::R => make_r(
                    theta()?,
                    get_real(params, "alpha")?,
                    get_real(params, "phi")?,
                ),
                Self::Cr => controlled(
                    &make_r(
                        theta()?,
                        get_real(params, "alpha")?,
                        get_real(params, "phi")?,
                    ),
                    &[1],
                )?,
                Self::U => make_u(
                    theta()?,
                    get_real(params, "phi")?,
                    get_real(params, "lbd")?,
                ),
                Self::Cu => controlled(
                    &make_u(
                        theta()?,
                        get_real(params, "phi")?,
                        get_real(params, "lbd")?,
                    ),
                    &[1],
                )?,
                Self::Rx => make_rx(theta()?),
                Self::Ry => make_ry(theta()?),
                Self::Rz => make_rz(theta()?),
                Self::Phase => make_phase(theta()?),
                Self::Rxx => make_exp1(Lazy::force(&XXMAT), theta()? / 2.0)?,
                Self::Ryy => make_exp1(Lazy::force(&YYMAT), theta()? / 2.0)?,
                Self::Rzz => make_exp1(Lazy::force(&ZZMAT), theta()? / 2.0)?,
                Self::Cphase => controlled(&make_phase(theta()?), &[1])?,
                Self::Crx => controlled(&make_rx(theta()?), &[1])?,
                Self::Cry => controlled(&make_ry(theta()?), &[1])?,
                Self::Crz => controlled(&make_rz(theta()?), &[1])?,
                Self::Orx => controlled(&make_rx(theta()?), &[0])?,
                Self::Ory => controlled(&make_ry(theta()?), &[0])?,
                Self::Orz => controlled(&make_rz(theta()?), &[0])?,
                Self::Iswap => make_iswap(get_real_or(params, "theta", 1.0)?),
                Self::Any | Self::Mpo => {
                    let u = get_matrix(params, "unitary")?;
                    unitary_qubits(u)?;
                    u.clone()
                },
                Self::Exp => make_exp(get_matrix(params, "unitary")?, theta()?)?,
                Self::Exp1 => make_exp1(get_matrix(params, "unitary")?, theta()?)?,
                Self::Multicontrol => controlled(
                    get_matrix(params, "unitary")?,
                    get_ints(params, "ctrl")?,
                )?,
            };
        Ok(mat)
    }
}

/// Identifier for a gate, possibly taken as an adjoint.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GateKind {
    Fixed(FixedGate),
    Variable(VariableGate),
    /// Conjugate transpose of the inner gate, built with the same parameters.
    Adjoint(Box<GateKind>),
}

impl From<FixedGate> for GateKind {
    fn from(g: FixedGate) -> Self { Self::Fixed(g) }
}

impl From<VariableGate> for GateKind {
    fn from(g: VariableGate) -> Self { Self::Variable(g) }
}

impl GateKind {
    /// Look up a gate by name, after [standardizing][standardize_gate] it.
    pub fn from_name(name: &str) -> GateResult<Self> {
        let name = standardize_gate(name);
        GATE_TABLE.get(name.as_str()).cloned().ok_or(UnknownGate(name))
    }

    /// Return `true` if `self` is `Fixed`.
    pub fn is_fixed(&self) -> bool { matches!(self, Self::Fixed(..)) }

    /// Return `true` if `self` is `Variable`.
    pub fn is_variable(&self) -> bool { matches!(self, Self::Variable(..)) }

    /// Return `true` if `self` is `Adjoint`.
    pub fn is_adjoint(&self) -> bool { matches!(self, Self::Adjoint(..)) }

    /// Return the canonical name of the underlying gate.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Fixed(g) => g.name(),
            Self::Variable(g) => g.name(),
            Self::Adjoint(g) => g.name(),
        }
    }

    /// Return `true` if the gate is applied as an operator network.
    pub fn is_mpo(&self) -> bool {
        match self {
            Self::Fixed(_) => false,
            Self::Variable(g) => g.is_mpo(),
            Self::Adjoint(g) => g.is_mpo(),
        }
    }

    /// Return the adjoint kind.
    ///
    /// Phase gates map onto their inverses and Hermitian fixed gates onto
    /// themselves; an adjoint of an adjoint is unwrapped. Everything else is
    /// wrapped in `Adjoint`.
    pub fn adjoint(&self) -> Self {
        match self {
            Self::Fixed(FixedGate::T) => Self::Fixed(FixedGate::Td),
            Self::Fixed(FixedGate::Td) => Self::Fixed(FixedGate::T),
            Self::Fixed(FixedGate::S) => Self::Fixed(FixedGate::Sd),
            Self::Fixed(FixedGate::Sd) => Self::Fixed(FixedGate::S),
            Self::Fixed(g) if g.is_hermitian() => Self::Fixed(*g),
            Self::Adjoint(g) => g.as_ref().clone(),
            g => Self::Adjoint(Box::new(g.clone())),
        }
    }

    /// Return the number of qubits the gate acts on.
    pub fn nqubits(&self, params: Option<&Params>) -> GateResult<usize> {
        match self {
            Self::Fixed(g) => Ok(g.nqubits()),
            Self::Variable(g) => g.nqubits(params),
            Self::Adjoint(g) => g.nqubits(params),
        }
    }

    /// Build the gate matrix.
    pub fn matrix(&self, params: Option<&Params>) -> GateResult<nd::Array2<C64>> {
        match self {
            Self::Fixed(g) => Ok(g.matrix().clone()),
            Self::Variable(g) => g.matrix(params),
            Self::Adjoint(g) => g.matrix(params).map(|m| dagger(&m)),
        }
    }

    /// Build the gate as a tensor of shape `[2; 2k]`, output legs first.
    pub fn tensor(&self, params: Option<&Params>) -> GateResult<nd::ArrayD<C64>> {
        matrix_to_tensor(&self.matrix(params)?)
    }

    /// Build the gate as a matrix product operator, one node per qubit.
    ///
    /// Output and input edges are ordered by qubit.
    pub fn operator(&self, params: Option<&Params>) -> GateResult<QuOperator> {
        mpo_from_matrix(&self.matrix(params)?)
    }
}

/// Canonical gate names mapped to their kinds.
pub static GATE_TABLE: Lazy<HashMap<&'static str, GateKind>>
    = Lazy::new(|| {
        FixedGate::ALL.iter()
            .map(|g| (g.name(), GateKind::Fixed(*g)))
            .chain(
                VariableGate::ALL.iter()
                .map(|g| (g.name(), GateKind::Variable(*g)))
            )
            .collect()
    });

/// Alternative gate names mapped to canonical ones.
pub static GATE_ALIASES: Lazy<HashMap<&'static str, &'static str>>
    = Lazy::new(|| {
        [
            ("cx", "cnot"),
            ("cswap", "fredkin"),
            ("ccnot", "toffoli"),
            ("ccx", "toffoli"),
            ("unitary", "any"),
            ("sdg", "sd"),
            ("tdg", "td"),
        ]
        .into_iter()
        .collect()
    });

/// Lowercase a gate name and replace aliases with canonical names.
///
/// Names outside the gate table are returned as-is (lowercased) with a
/// warning.
pub fn standardize_gate(name: &str) -> String {
    let lower = name.to_lowercase();
    let name
        = GATE_ALIASES.get(lower.as_str())
        .map(|canon| canon.to_string())
        .unwrap_or(lower);
    if !GATE_TABLE.contains_key(name.as_str()) {
        log::warn!("gate name '{}' is not in the common gate set", name);
    }
    name
}

/// Conjugate transpose of a matrix.
pub fn dagger(mat: &nd::Array2<C64>) -> nd::Array2<C64> {
    let (r, c) = mat.dim();
    nd::Array2::from_shape_fn((c, r), |(i, j)| mat[[j, i]].conj())
}

/// Reshape a `2^k × 2^k` matrix into a tensor of shape `[2; 2k]`.
pub fn matrix_to_tensor(mat: &nd::Array2<C64>) -> GateResult<nd::ArrayD<C64>> {
    let k = unitary_qubits(mat)?;
    let data: Vec<C64> = mat.iter().copied().collect();
    Ok(nd::ArrayD::from_shape_vec(vec![2; 2 * k], data)?)
}

/// Embed a unitary `u` as the target block of a controlled gate.
///
/// `ctrl[k]` is the value (0 or 1) that the `k`-th leading qubit must hold for
/// `u` to act on the remaining qubits.
pub fn controlled(u: &nd::Array2<C64>, ctrl: &[usize]) -> GateResult<nd::Array2<C64>> {
    unitary_qubits(u)?;
    if let Some(c) = ctrl.iter().find(|c| **c > 1) { return Err(BadControl(*c)); }
    let du = u.nrows();
    let pattern: usize = ctrl.iter().fold(0, |acc, c| (acc << 1) | c);
    let d = du << ctrl.len();
    Ok(
        nd::Array2::from_shape_fn(
            (d, d),
            |(i, j)| {
                let (ci, ti) = (i / du, i % du);
                let (cj, tj) = (j / du, j % du);
                if ci != cj {
                    C64::zero()
                } else if ci == pattern {
                    u[[ti, tj]]
                } else if ti == tj {
                    C64::one()
                } else {
                    C64::zero()
                }
            },
        )
    )
}

/// Split a `2^k × 2^k` matrix into a chain of `k` nodes by successive singular
/// value decompositions, dropping zero singular values.
///
/// Node `s` has axes `[left bond, out, in, right bond]`, with the bond axes
/// omitted at the ends of the chain.
pub fn mpo_from_matrix(mat: &nd::Array2<C64>) -> GateResult<QuOperator> {
    const ZERO_SV: f64 = 1e-12;
    let k = unitary_qubits(mat)?;
    let backend = DenseBackend::default();
    // interleave as (o0, i0, o1, i1, ...)
    let perm: Vec<usize>
        = (0..k).flat_map(|s| [s, k + s]).collect();
    let interleaved: Vec<C64>
        = matrix_to_tensor(mat)?
        .permuted_axes(perm)
        .iter().copied()
        .collect();

    let mut net = Network::new();
    let mut out_edges: Vec<Edge> = Vec::with_capacity(k);
    let mut in_edges: Vec<Edge> = Vec::with_capacity(k);
    let mut left: Option<Edge> = None;
    let mut bond: usize = 1;
    let mut rest = interleaved;
    for s in 0..k {
        let has_left = s > 0;
        let off = usize::from(has_left);
        if s + 1 == k {
            let mut shape: Vec<usize> = Vec::with_capacity(3);
            if has_left { shape.push(bond); }
            shape.extend([2, 2]);
            let tens = nd::ArrayD::from_shape_vec(shape, rest)?;
            let id = net.push(tens, format!("mpo{}", s));
            out_edges.push(Edge::new(id, off));
            in_edges.push(Edge::new(id, off + 1));
            if let Some(l) = left { net.connect(l, Edge::new(id, 0))?; }
            break;
        }
        let nrows = bond * 4;
        let ncols = rest.len() / nrows;
        let m = nd::Array2::from_shape_vec((nrows, ncols), rest)?;
        let (u, sv, vh) = backend.svd(&m)?;
        let rank = sv.iter().filter(|x| **x > ZERO_SV).count().max(1);
        let mut shape: Vec<usize> = Vec::with_capacity(4);
        if has_left { shape.push(bond); }
        shape.extend([2, 2, rank]);
        let udata: Vec<C64>
            = (0..nrows).cartesian_product(0..rank)
            .map(|(i, j)| u[[i, j]])
            .collect();
        let tens = nd::ArrayD::from_shape_vec(shape, udata)?;
        let id = net.push(tens, format!("mpo{}", s));
        out_edges.push(Edge::new(id, off));
        in_edges.push(Edge::new(id, off + 1));
        if let Some(l) = left { net.connect(l, Edge::new(id, 0))?; }
        left = Some(Edge::new(id, off + 2));
        rest
            = (0..rank).cartesian_product(0..ncols)
            .map(|(i, j)| vh[[i, j]] * sv[i])
            .collect();
        bond = rank;
    }
    Ok(quantum_constructor(net, out_edges, in_edges, [], [])?.into_operator())
}

/// Make an identity gate.
pub fn make_i<A>() -> nd::Array2<A>
where
    A: ComplexFloat + ComplexFloatExt,
    <A as ComplexFloat>::Real: std::fmt::Debug,
{
    nd::array![
        [A::one(),  A::zero()],
        [A::zero(), A::one() ],
    ]
}

/// Lazy-static version of [`make_i`] for a [`Complex64`][C64] element type.
pub static IMAT: Lazy<nd::Array2<C64>> = Lazy::new(make_i);

/// Make an X gate.
///
/// Since this gate takes no arguments, consider using the lazily-constructed,
/// [`Complex64`][C64]-valued [`XMAT`] instead.
pub fn make_x<A>() -> nd::Array2<A>
where
    A: ComplexFloat + ComplexFloatExt,
    <A as ComplexFloat>::Real: std::fmt::Debug,
{
    nd::array![
        [A::zero(), A::one() ],
        [A::one(),  A::zero()],
    ]
}

/// Lazy-static version of [`make_x`] for a [`Complex64`][C64] element type.
pub static XMAT: Lazy<nd::Array2<C64>> = Lazy::new(make_x);

/// Make a Y gate.
pub fn make_y<A>() -> nd::Array2<A>
where
    A: ComplexFloat + ComplexFloatExt,
    <A as ComplexFloat>::Real: std::fmt::Debug,
{
    nd::array![
        [A::zero(), -A::i()   ],
        [A::i(),     A::zero()],
    ]
}

/// Lazy-static version of [`make_y`] for a [`Complex64`][C64] element type.
pub static YMAT: Lazy<nd::Array2<C64>> = Lazy::new(make_y);

/// Make a Z gate.
///
/// Since this gate takes no arguments, consider using the lazily-constructed,
/// [`Complex64`][C64]-valued [`ZMAT`] instead.
pub fn make_z<A>() -> nd::Array2<A>
where
    A: ComplexFloat + ComplexFloatExt,
    <A as ComplexFloat>::Real: std::fmt::Debug,
{
    nd::array![
        [A::one(),   A::zero()],
        [A::zero(), -A::one() ],
    ]
}

/// Lazy-static version of [`make_z`] for a [`Complex64`][C64] element type.
pub static ZMAT: Lazy<nd::Array2<C64>> = Lazy::new(make_z);

/// Make a Hadamard gate.
///
/// Since this gate takes no arguments, consider using the lazily-constructed,
/// [`Complex64`][C64]-valued [`HMAT`] instead.
pub fn make_h<A>() -> nd::Array2<A>
where
    A: ComplexFloat + ComplexFloatExt,
    <A as ComplexFloat>::Real: std::fmt::Debug,
{
    let h = A::from_re((A::Real::one() + A::Real::one()).recip().sqrt());
    nd::array![
        [h,  h],
        [h, -h],
    ]
}

/// Lazy-static version of [`make_h`] for a [`Complex64`][C64] element type.
pub static HMAT: Lazy<nd::Array2<C64>> = Lazy::new(make_h);

/// Make an S gate.
///
/// Since this gate takes no arguments, consider using the lazily-constructed,
/// [`Complex64`][C64]-valued [`SMAT`] instead.
pub fn make_s<A>() -> nd::Array2<A>
where
    A: ComplexFloat + ComplexFloatExt,
    <A as ComplexFloat>::Real: std::fmt::Debug,
{
    nd::array![
        [A::one(),  A::zero()],
        [A::zero(), A::i()   ],
    ]
}

/// Lazy-static version of [`make_s`] for a [`Complex64`][C64] element type.
pub static SMAT: Lazy<nd::Array2<C64>> = Lazy::new(make_s);

/// Make an S<sup>†</sup> gate.
///
/// Since this gate takes no arguments, consider using the lazily-constructed,
/// [`Complex64`][C64]-valued [`SDMAT`] instead.
pub fn make_sd<A>() -> nd::Array2<A>
where
    A: ComplexFloat + ComplexFloatExt,
    <A as ComplexFloat>::Real: std::fmt::Debug,
{
    nd::array![
        [A::one(),   A::zero()],
        [A::zero(), -A::i()   ],
    ]
}

/// Lazy-static version of [`make_sd`] for a [`Complex64`][C64] element type.
pub static SDMAT: Lazy<nd::Array2<C64>> = Lazy::new(make_sd);

/// Lazily-constructed T gate, `diag(1, e^{iπ/4})`.
pub static TMAT: Lazy<nd::Array2<C64>>
    = Lazy::new(|| make_phase(std::f64::consts::FRAC_PI_4));

/// Lazily-constructed T<sup>†</sup> gate.
pub static TDMAT: Lazy<nd::Array2<C64>>
    = Lazy::new(|| make_phase(-std::f64::consts::FRAC_PI_4));

/// Lazily-constructed square root of `W = (X + Y)/√2`.
pub static WROOTMAT: Lazy<nd::Array2<C64>>
    = Lazy::new(|| {
        let r = std::f64::consts::FRAC_1_SQRT_2;
        nd::array![
            [C64::new(r, 0.0),      C64::new(-0.5, -0.5)],
            [C64::new(0.5, -0.5),   C64::new(r, 0.0)    ],
        ]
    });

/// Make a swap gate.
pub fn make_swap<A>() -> nd::Array2<A>
where
    A: ComplexFloat + ComplexFloatExt,
    <A as ComplexFloat>::Real: std::fmt::Debug,
{
    nd::array![
        [A::one(),  A::zero(), A::zero(), A::zero()],
        [A::zero(), A::zero(), A::one(),  A::zero()],
        [A::zero(), A::one(),  A::zero(), A::zero()],
        [A::zero(), A::zero(), A::zero(), A::one() ],
    ]
}

/// Lazy-static version of [`make_swap`] for a [`Complex64`][C64] element type.
pub static SWAPMAT: Lazy<nd::Array2<C64>> = Lazy::new(make_swap);

/// Make a CX gate.
///
/// Since this gate takes no arguments, consider using the lazily-constructed,
/// [`Complex64`][C64]-valued [`CXMAT`] instead.
pub fn make_cx<A>() -> nd::Array2<A>
where
    A: ComplexFloat + ComplexFloatExt,
    <A as ComplexFloat>::Real: std::fmt::Debug,
{
    nd::array![
        [A::one(),  A::zero(), A::zero(), A::zero()],
        [A::zero(), A::one(),  A::zero(), A::zero()],
        [A::zero(), A::zero(), A::zero(), A::one() ],
        [A::zero(), A::zero(), A::one(),  A::zero()],
    ]
}

/// Lazy-static version of [`make_cx`] for a [`Complex64`][C64] element type.
pub static CXMAT: Lazy<nd::Array2<C64>> = Lazy::new(make_cx);

/// Make a CZ gate.
///
/// Since this gate takes no arguments, consider using the lazily-constructed,
/// [`Complex64`][C64]-valued [`CZMAT`] instead.
pub fn make_cz<A>() -> nd::Array2<A>
where
    A: ComplexFloat + ComplexFloatExt,
    <A as ComplexFloat>::Real: std::fmt::Debug,
{
    nd::array![
        [A::one(),  A::zero(), A::zero(),  A::zero()],
        [A::zero(), A::one(),  A::zero(),  A::zero()],
        [A::zero(), A::zero(), A::one(),   A::zero()],
        [A::zero(), A::zero(), A::zero(), -A::one() ],
    ]
}

/// Lazy-static version of [`make_cz`] for a [`Complex64`][C64] element type.
pub static CZMAT: Lazy<nd::Array2<C64>> = Lazy::new(make_cz);

// controlled versions of constant gates; control values are always valid here
fn fixed_controlled(u: &nd::Array2<C64>, ctrl: &[usize]) -> nd::Array2<C64> {
    controlled(u, ctrl).unwrap_or_else(|_| nd::Array2::eye(u.nrows() << ctrl.len()))
}

/// Lazily-constructed CY gate.
pub static CYMAT: Lazy<nd::Array2<C64>>
    = Lazy::new(|| fixed_controlled(&YMAT, &[1]));

/// Lazily-constructed X gate controlled on `∣0⟩`.
pub static OXMAT: Lazy<nd::Array2<C64>>
    = Lazy::new(|| fixed_controlled(&XMAT, &[0]));

/// Lazily-constructed Y gate controlled on `∣0⟩`.
pub static OYMAT: Lazy<nd::Array2<C64>>
    = Lazy::new(|| fixed_controlled(&YMAT, &[0]));

/// Lazily-constructed Z gate controlled on `∣0⟩`.
pub static OZMAT: Lazy<nd::Array2<C64>>
    = Lazy::new(|| fixed_controlled(&ZMAT, &[0]));

/// Lazily-constructed Toffoli gate.
pub static TOFFOLIMAT: Lazy<nd::Array2<C64>>
    = Lazy::new(|| fixed_controlled(&XMAT, &[1, 1]));

/// Lazily-constructed Fredkin gate.
pub static FREDKINMAT: Lazy<nd::Array2<C64>>
    = Lazy::new(|| fixed_controlled(&SWAPMAT, &[1]));

fn kron2(a: &nd::Array2<C64>, b: &nd::Array2<C64>) -> nd::Array2<C64> {
    let (ra, ca) = a.dim();
    let (rb, cb) = b.dim();
    nd::Array2::from_shape_fn(
        (ra * rb, ca * cb),
        |(i, j)| a[[i / rb, j / cb]] * b[[i % rb, j % cb]],
    )
}

static XXMAT: Lazy<nd::Array2<C64>> = Lazy::new(|| kron2(&XMAT, &XMAT));
static YYMAT: Lazy<nd::Array2<C64>> = Lazy::new(|| kron2(&YMAT, &YMAT));
static ZZMAT: Lazy<nd::Array2<C64>> = Lazy::new(|| kron2(&ZMAT, &ZMAT));

/// Make a single-qubit unitary from its Euler angles.
///
/// ```text
/// U(θ, φ, λ) = [ cos(θ/2)          -e^{iλ} sin(θ/2)     ]
///              [ e^{iφ} sin(θ/2)    e^{i(φ+λ)} cos(θ/2) ]
/// ```
pub fn make_u<A>(theta: A::Real, phi: A::Real, lbd: A::Real)
    -> nd::Array2<A>
where
    A: ComplexFloat + ComplexFloatExt,
    <A as ComplexFloat>::Real: std::fmt::Debug,
{
    let t2 = theta / (A::Real::one() + A::Real::one());
    let c = A::from_re(t2.cos());
    let s = A::from_re(t2.sin());
    nd::array![
        [c,                -A::cis(lbd) * s     ],
        [A::cis(phi) * s,   A::cis(phi + lbd) * c],
    ]
}

/// Make an X-rotation gate.
pub fn make_rx<A>(angle: A::Real) -> nd::Array2<A>
where
    A: ComplexFloat + ComplexFloatExt,
    <A as ComplexFloat>::Real: std::fmt::Debug,
{
    let ang2 = angle / (A::Real::one() + A::Real::one());
    let ondiag = A::from_re(ang2.cos());
    let offdiag = -A::i() * A::from_re(ang2.sin());
    nd::array![
        [ondiag,  offdiag],
        [offdiag, ondiag ],
    ]
}

/// Make a Y-rotation gate.
pub fn make_ry<A>(angle: A::Real) -> nd::Array2<A>
where
    A: ComplexFloat + ComplexFloatExt,
    <A as ComplexFloat>::Real: std::fmt::Debug,
{
    let ang2 = angle / (A::Real::one() + A::Real::one());
    let c = A::from_re(ang2.cos());
    let s = A::from_re(ang2.sin());
    nd::array![
        [c, -s],
        [s,  c],
    ]
}

/// Make a Z-rotation gate.
pub fn make_rz<A>(angle: A::Real) -> nd::Array2<A>
where
    A: ComplexFloat + ComplexFloatExt,
    <A as ComplexFloat>::Real: std::fmt::Debug,
{
    let ang2 = angle / (A::Real::one() + A::Real::one());
    nd::array![
        [A::cis(-ang2), A::zero()    ],
        [A::zero(),     A::cis(ang2) ],
    ]
}

/// Make a phase gate.
pub fn make_phase<A>(angle: A::Real) -> nd::Array2<A>
where
    A: ComplexFloat + ComplexFloatExt,
    <A as ComplexFloat>::Real: std::fmt::Debug,
{
    nd::array![
        [A::one(),  A::zero()     ],
        [A::zero(), A::cis(angle) ],
    ]
}

/// Make a general rotation by `theta` about the axis with polar angle `alpha`
/// and azimuth `phi`.
pub fn make_r(theta: f64, alpha: f64, phi: f64) -> nd::Array2<C64> {
    let (nx, ny, nz)
        = (alpha.sin() * phi.cos(), alpha.sin() * phi.sin(), alpha.cos());
    let c = C64::from(theta.cos());
    let s = C64::new(0.0, -theta.sin());
    nd::array![
        [c + s * nz,                   s * C64::new(nx, -ny)],
        [s * C64::new(nx, ny),         c - s * nz           ],
    ]
}

/// Make a partial iSWAP gate; `theta = 1` gives the full iSWAP.
pub fn make_iswap(theta: f64) -> nd::Array2<C64> {
    let a = std::f64::consts::FRAC_PI_2 * theta;
    let c = C64::from(a.cos());
    let s = C64::new(0.0, a.sin());
    let o = C64::zero();
    let l = C64::one();
    nd::array![
        [l, o, o, o],
        [o, c, s, o],
        [o, s, c, o],
        [o, o, o, l],
    ]
}

/// Make `cos θ I - i sin θ U`, which equals `exp(-i θ U)` when `U² = I`.
pub fn make_exp1(u: &nd::Array2<C64>, theta: f64) -> GateResult<nd::Array2<C64>> {
    unitary_qubits(u)?;
    let c = C64::from(theta.cos());
    let s = C64::new(0.0, -theta.sin());
    Ok(
        nd::Array2::from_shape_fn(
            u.dim(),
            |(i, j)| if i == j { c + s * u[[i, j]] } else { s * u[[i, j]] },
        )
    )
}

/// Make `exp(-i θ U)` for a general `U`.
pub fn make_exp(u: &nd::Array2<C64>, theta: f64) -> GateResult<nd::Array2<C64>> {
    unitary_qubits(u)?;
    let gen = to_na(u) * C64::new(0.0, -theta);
    Ok(from_na(&gen.exp()))
}

/// Generate an `n`-qubit Haar-random unitary matrix.
pub fn haar<R>(n: usize, rng: &mut R) -> nd::Array2<C64>
where R: Rng + ?Sized
{
    let normal = Normal::standard();
    let d = 1_usize << n;
    let z: nd::Array2<C64>
        = nd::Array2::from_shape_simple_fn(
            (d, d),
            || C64::from_components(normal.sample(rng), normal.sample(rng)),
        );
    let qr = to_na(&z).qr();
    let (q, r) = (qr.q(), qr.r());
    nd::Array2::from_shape_fn(
        (d, d),
        |(i, j)| {
            let rjj = r[(j, j)];
            let renorm
                = if rjj.norm() > 0.0 { rjj / rjj.norm() } else { C64::one() };
            q[(i, j)] * renorm
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::assert_approx_eq;
    use rand::{ SeedableRng, rngs::StdRng };
    use std::f64::consts::PI;

    fn assert_mat_close(a: &nd::Array2<C64>, b: &nd::Array2<C64>, eps: f64) {
        assert_eq!(a.dim(), b.dim());
        a.iter().zip(b.iter())
            .for_each(|(x, y)| assert!((x - y).norm() < eps, "{} != {}", x, y));
    }

    fn is_unitary(u: &nd::Array2<C64>) -> bool {
        let prod = dagger(u).dot(u);
        let id: nd::Array2<C64> = nd::Array2::eye(u.nrows());
        prod.iter().zip(id.iter()).all(|(a, b)| (a - b).norm() < 1e-10)
    }

    #[test]
    fn fixed_gates_unitary() {
        for g in FixedGate::ALL {
            let m = g.matrix();
            assert_eq!(m.nrows(), 1 << g.nqubits(), "{}", g.name());
            assert!(is_unitary(m), "{}", g.name());
            if g.is_hermitian() {
                assert_mat_close(m, &dagger(m), 1e-12);
            }
        }
        // wroot² = -i W
        let w = (&*XMAT + &*YMAT)
            .mapv(|z| z * C64::new(0.0, -std::f64::consts::FRAC_1_SQRT_2));
        assert_mat_close(&WROOTMAT.dot(&*WROOTMAT), &w, 1e-12);
    }

    #[test]
    fn variable_gates() {
        let p = params!{ "theta" => PI };
        let rx = GateKind::from_name("rx").unwrap().matrix(Some(&p)).unwrap();
        assert_mat_close(&rx, &XMAT.mapv(|z| z * C64::new(0.0, -1.0)), 1e-12);
        let phase = VariableGate::Phase.matrix(Some(&params!{ "theta" => PI / 2.0 }))
            .unwrap();
        assert_mat_close(&phase, &SMAT, 1e-12);
        let u = VariableGate::U.matrix(
            Some(&params!{ "theta" => PI / 2.0, "phi" => 0.0, "lbd" => PI }))
            .unwrap();
        assert_mat_close(&u, &HMAT, 1e-12);
        let r = VariableGate::R.matrix(
            Some(&params!{ "theta" => 0.3, "alpha" => 0.0, "phi" => 0.0 }))
            .unwrap();
        let rz = make_rz::<C64>(0.6);
        assert_mat_close(&r, &rz, 1e-12);
        let rzz = VariableGate::Rzz.matrix(Some(&params!{ "theta" => 0.4 })).unwrap();
        let expect = make_exp(&ZZMAT, 0.2).unwrap();
        assert_mat_close(&rzz, &expect, 1e-10);
        let iswap = VariableGate::Iswap.matrix(None).unwrap();
        assert_approx_eq!(f64, iswap[[1, 2]].im, 1.0, epsilon = 1e-12);
        assert!(matches!(VariableGate::Rx.matrix(None), Err(MissingParam(_))));
    }

    #[test]
    fn multicontrol_and_mpo() {
        let p = params!{ "ctrl" => vec![1_usize, 1], "unitary" => XMAT.clone() };
        let kind = GateKind::from_name("multicontrol").unwrap();
        assert!(kind.is_mpo());
        assert_eq!(kind.nqubits(Some(&p)).unwrap(), 3);
        let m = kind.matrix(Some(&p)).unwrap();
        assert_mat_close(&m, &TOFFOLIMAT, 1e-12);
        let op = kind.operator(Some(&p)).unwrap();
        assert_eq!(op.out_edges().len(), 3);
        assert_mat_close(&op.to_matrix().unwrap(), &TOFFOLIMAT, 1e-10);
        let bad = params!{ "ctrl" => vec![2_usize], "unitary" => XMAT.clone() };
        assert!(matches!(kind.matrix(Some(&bad)), Err(BadControl(2))));
    }

    #[test]
    fn adjoint_kinds() {
        let t = GateKind::Fixed(FixedGate::T);
        assert_eq!(t.adjoint(), GateKind::Fixed(FixedGate::Td));
        assert_eq!(GateKind::Fixed(FixedGate::Sd).adjoint(), FixedGate::S.into());
        assert_eq!(GateKind::Fixed(FixedGate::H).adjoint(), FixedGate::H.into());
        let rx: GateKind = VariableGate::Rx.into();
        let rxd = rx.adjoint();
        assert!(rxd.is_adjoint());
        assert_eq!(rxd.adjoint(), rx);
        let p = params!{ "theta" => 0.7 };
        let prod = rxd.matrix(Some(&p)).unwrap().dot(&rx.matrix(Some(&p)).unwrap());
        assert_mat_close(&prod, &nd::Array2::eye(2), 1e-12);
        let w: GateKind = FixedGate::Wroot.into();
        let prod = w.adjoint().matrix(None).unwrap().dot(&w.matrix(None).unwrap());
        assert_mat_close(&prod, &nd::Array2::eye(2), 1e-12);
    }

    #[test]
    fn names_and_aliases() {
        assert_eq!(standardize_gate("CX"), "cnot");
        assert_eq!(standardize_gate("ccx"), "toffoli");
        assert_eq!(standardize_gate("Unitary"), "any");
        assert_eq!(standardize_gate("tdg"), "td");
        assert_eq!(standardize_gate("rX"), "rx");
        assert_eq!(standardize_gate("foo"), "foo");
        assert!(matches!(GateKind::from_name("foo"), Err(UnknownGate(_))));
        assert_eq!(GateKind::from_name("cswap").unwrap(), FixedGate::Fredkin.into());
    }

    #[test]
    fn tensor_shape() {
        let t = GateKind::Fixed(FixedGate::Cnot).tensor(None).unwrap();
        assert_eq!(t.shape(), &[2, 2, 2, 2]);
        // out (1, 1) <- in (1, 0)
        assert_eq!(t[[1, 1, 1, 0]], C64::one());
        assert_eq!(t[[1, 0, 1, 0]], C64::zero());
    }

    #[test]
    fn param_serde() {
        let p = params!{
            "theta" => 0.25,
            "ctrl" => vec![0_usize, 1],
            "unitary" => YMAT.clone(),
        };
        let s = serde_json::to_string(&p).unwrap();
        let q: Params = serde_json::from_str(&s).unwrap();
        assert_eq!(p, q);
        let kind = GateKind::Adjoint(Box::new(VariableGate::Rx.into()));
        let s = serde_json::to_string(&kind).unwrap();
        let back: GateKind = serde_json::from_str(&s).unwrap();
        assert_eq!(kind, back);
    }

    #[test]
    fn haar_unitary() {
        let mut rng = StdRng::seed_from_u64(10546);
        for n in 1..=3 {
            let u = haar(n, &mut rng);
            assert_eq!(u.dim(), (1 << n, 1 << n));
            assert!(is_unitary(&u));
        }
    }
}
