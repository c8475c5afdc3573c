//! Circuit intermediate representation.
//!
//! Every gate applied to a circuit is logged as an [`IrRecord`]. The log holds
//! enough information to rebuild the circuit from scratch: replaying it in
//! order against a fresh circuit with the same qubit count gives an
//! equivalent network. [`AbstractCircuit`] builds everything else on top of
//! the log and a single hook that applies one gate to a concrete network:
//! inverse circuits, concatenation, gate counting, and conversion to and from
//! JSON and the qsim text format.

use std::{
    collections::BTreeMap,
    f64::consts::{ FRAC_PI_2, FRAC_PI_4 },
    fs,
    path::Path,
};
use log::{ debug, warn };
use ndarray as nd;
use num_complex::Complex64 as C64;
use serde::{ Deserialize, Serialize };
use thiserror::Error;
use crate::{
    backend::BackendError,
    gate::{ GateError, GateKind, Params, standardize_gate },
    network::NetworkError,
    params,
    quantum::{ QuOperator, QuantumError },
};

#[derive(Debug, Error)]
pub enum IrError {
    /// Returned when a line of a qsim circuit can't be parsed or names an
    /// unsupported gate.
    #[error("error in ir: qsim line {0}: {1}")]
    Parse(usize, String),

    /// Returned when a circuit can't be built without knowing its size.
    #[error("error in ir: number of qubits is unknown")]
    UnknownSize,

    /// Returned when a gate targets a qubit outside the register.
    #[error("error in ir: qubit {0} out of range for {1} qubits")]
    QubitOutOfRange(usize, usize),

    /// Returned when a gate targets the same qubit twice.
    #[error("error in ir: repeated qubit {0} in gate index")]
    DuplicateQubit(usize),

    /// Returned when an input state doesn't match the register size.
    #[error("error in ir: input state of length {0} does not match {1} qubits")]
    BadInputs(usize, usize),

    /// Returned when a gate tensor or operator has the wrong shape for its
    /// index.
    #[error("error in ir: gate operand does not match {0} target qubit(s)")]
    BadOperand(usize),

    #[error("error in ir: json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("error in ir: io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("error in ir: {0}")]
    GateError(#[from] GateError),

    #[error("error in ir: {0}")]
    NetworkError(#[from] NetworkError),

    #[error("error in ir: {0}")]
    QuantumError(#[from] QuantumError),

    #[error("error in ir: {0}")]
    BackendError(#[from] BackendError),

    #[error("error in ir: {0}")]
    ShapeError(#[from] nd::ShapeError),
}
use IrError::*;
pub type IrResult<T> = Result<T, IrError>;

/// Factor that absorbs the singular values when a gate is split.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Absorb {
    Left,
    Right,
}

/// Truncation policy for splitting a two-qubit gate into two nodes by a
/// singular value decomposition.
///
/// With no fields set, only numerically zero singular values are dropped.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SplitConfig {
    /// Keep at most this many singular values.
    #[serde(default)]
    pub max_singular_values: Option<usize>,
    /// Drop the smallest singular values while the norm of the dropped ones
    /// stays within this bound.
    #[serde(default)]
    pub max_truncation_err: Option<f64>,
    /// Interpret `max_truncation_err` relative to the largest singular value.
    #[serde(default)]
    pub relative: bool,
    /// Absorb the singular values into one side; if unset, each side takes
    /// their square roots.
    #[serde(default)]
    pub fixed_choice: Option<Absorb>,
}

/// Parameters for constructing a fresh circuit.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CircuitParams {
    /// Number of qubits. If unset, it is inferred from `inputs` or from the
    /// gates being replayed.
    pub nqubits: Option<usize>,
    /// Initial state vector; defaults to `∣0…0⟩`.
    pub inputs: Option<nd::Array1<C64>>,
}

impl CircuitParams {
    pub fn new(nqubits: usize) -> Self {
        Self { nqubits: Some(nqubits), inputs: None }
    }

    pub fn with_inputs(inputs: nd::Array1<C64>) -> Self {
        Self { nqubits: None, inputs: Some(inputs) }
    }
}

/// A gate as handed to [`AbstractCircuit::apply_general_gate`].
#[derive(Clone, Debug)]
pub enum GateOperand {
    /// A single tensor of shape `[2; 2k]`, output legs first.
    Tensor(nd::ArrayD<C64>),
    /// An operator network with `k` output and `k` input edges.
    Operator(QuOperator),
}

/// A single logged gate application.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IrRecord {
    /// Gate to build.
    pub gate: GateKind,
    /// Target qubits.
    pub index: Vec<usize>,
    /// Display name, used for counting.
    pub name: String,
    /// Split policy for two-qubit gates.
    #[serde(default)]
    pub split: Option<SplitConfig>,
    /// Whether the gate is applied as an operator network.
    #[serde(default)]
    pub mpo: bool,
    /// Parameters of a variable gate; `None` for fixed gates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Params>,
}

impl IrRecord {
    /// Create a record named after its gate.
    pub fn new(
        gate: GateKind,
        index: Vec<usize>,
        parameters: Option<Params>,
        split: Option<SplitConfig>,
    ) -> Self
    {
        let name = gate.name().to_string();
        let mpo = gate.is_mpo();
        let parameters
            = if gate.is_fixed() { None } else { Some(parameters.unwrap_or_default()) };
        Self { gate, index, name, split, mpo, parameters }
    }

    /// Build the gate operand for this record.
    pub fn operand(&self) -> IrResult<GateOperand> {
        let params = self.parameters.as_ref();
        if self.mpo {
            Ok(GateOperand::Operator(self.gate.operator(params)?))
        } else {
            Ok(GateOperand::Tensor(self.gate.tensor(params)?))
        }
    }

    /// Return a record applying the adjoint gate to the same qubits, keeping
    /// the display name.
    pub fn adjoint(&self) -> Self {
        Self { gate: self.gate.adjoint(), ..self.clone() }
    }
}

fn is_false(b: &bool) -> bool { !*b }

// compact JSON form; gates are rebuilt by name
#[derive(Clone, Debug, Serialize, Deserialize)]
struct SimpleRecord {
    name: String,
    index: Vec<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    parameters: Option<Params>,
    #[serde(default, skip_serializing_if = "is_false")]
    dagger: bool,
}

impl From<&IrRecord> for SimpleRecord {
    fn from(rec: &IrRecord) -> Self {
        Self {
            name: rec.gate.name().to_string(),
            index: rec.index.clone(),
            parameters: rec.parameters.clone(),
            dagger: rec.gate.is_adjoint(),
        }
    }
}

impl TryFrom<SimpleRecord> for IrRecord {
    type Error = IrError;

    fn try_from(rec: SimpleRecord) -> IrResult<Self> {
        let SimpleRecord { name, index, parameters, dagger } = rec;
        let kind = GateKind::from_name(&name)?;
        let kind = if dagger { kind.adjoint() } else { kind };
        let mut record = IrRecord::new(kind, index, parameters, None);
        record.name = standardize_gate(&name);
        Ok(record)
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
enum JsonRecord {
    Full(IrRecord),
    Simple(SimpleRecord),
}

/// Serialize a record log to JSON.
///
/// The full encoding keeps everything needed for exact reconstruction; the
/// simplified one keeps only gate names, indices, parameters and an adjoint
/// flag.
pub fn qir_to_json(qir: &[IrRecord], simplified: bool) -> IrResult<String> {
    warn!("JSON circuit serialization is experimental and its format may change");
    if simplified {
        let simple: Vec<SimpleRecord> = qir.iter().map(SimpleRecord::from).collect();
        Ok(serde_json::to_string(&simple)?)
    } else {
        Ok(serde_json::to_string(qir)?)
    }
}

/// Deserialize a record log from either JSON encoding.
pub fn json_to_qir(json: &str) -> IrResult<Vec<IrRecord>> {
    let records: Vec<JsonRecord> = serde_json::from_str(json)?;
    records.into_iter()
        .map(|rec| {
            match rec {
                JsonRecord::Full(rec) => Ok(rec),
                JsonRecord::Simple(rec) => IrRecord::try_from(rec),
            }
        })
        .collect()
}

fn parse_token<T>(tokens: &[&str], k: usize, lineno: usize) -> IrResult<T>
where T: std::str::FromStr
{
    let tok = tokens.get(k)
        .ok_or_else(|| Parse(lineno, format!("missing argument {}", k)))?;
    tok.parse::<T>()
        .map_err(|_| Parse(lineno, format!("invalid argument '{}'", tok)))
}

pub(crate) fn check_index(index: &[usize], nqubits: usize) -> IrResult<()> {
    for (k, q) in index.iter().enumerate() {
        if *q >= nqubits { return Err(QubitOutOfRange(*q, nqubits)); }
        if index[..k].contains(q) { return Err(DuplicateQubit(*q)); }
    }
    Ok(())
}

// generates `fn $method(&mut self, q...)` for gates without parameters
macro_rules! fixed_gate_methods {
    ( $( $method:ident => $name:literal ( $( $q:ident ),+ ) );* $(;)? ) => {
        $(
            #[doc = concat!("Apply a `", $name, "` gate.")]
            fn $method(&mut self, $( $q: usize ),+) -> IrResult<()> {
                self.apply($name, &[$( $q ),+], None)
            }
        )*
    }
}

// generates `fn $method(&mut self, q..., theta)` for single-angle gates
macro_rules! rotation_gate_methods {
    ( $( $method:ident => $name:literal ( $( $q:ident ),+ ) );* $(;)? ) => {
        $(
            #[doc = concat!("Apply a `", $name, "` gate with angle `theta`.")]
            fn $method(&mut self, $( $q: usize, )+ theta: f64) -> IrResult<()> {
                self.apply($name, &[$( $q ),+], Some(params!{ "theta" => theta }))
            }
        )*
    }
}

/// A circuit that logs every gate it applies and can be rebuilt from that
/// log.
///
/// Implementors provide construction, access to the log, and
/// [`apply_general_gate`][Self::apply_general_gate], which must apply a gate
/// to the concrete network and push the given record onto the log.
pub trait AbstractCircuit: Sized {
    /// Create a fresh circuit.
    fn from_params(params: &CircuitParams) -> IrResult<Self>;

    /// Return the number of qubits.
    fn nqubits(&self) -> usize;

    /// Return the record log.
    fn qir(&self) -> &[IrRecord];

    /// Return the parameters needed to construct an empty copy of `self`.
    fn circuit_params(&self) -> CircuitParams;

    /// Apply a gate to `index` and append `record` to the log.
    ///
    /// `index` has already been checked against the register.
    fn apply_general_gate(
        &mut self,
        gate: GateOperand,
        index: &[usize],
        name: &str,
        split: Option<&SplitConfig>,
        mpo: bool,
        record: IrRecord,
    ) -> IrResult<()>;

    /// Build and apply the gate described by a record.
    fn apply_record(&mut self, record: IrRecord) -> IrResult<()> {
        let nq = record.gate.nqubits(record.parameters.as_ref())?;
        if nq != record.index.len() {
            return Err(GateError::QubitCount(
                record.name.clone(), nq, record.index.len()).into());
        }
        check_index(&record.index, self.nqubits())?;
        let operand = record.operand()?;
        let index = record.index.clone();
        let name = record.name.clone();
        let split = record.split;
        let mpo = record.mpo;
        self.apply_general_gate(operand, &index, &name, split.as_ref(), mpo, record)
    }

    /// Apply a gate by name.
    ///
    /// The name is [standardized][standardize_gate] before lookup; `params`
    /// is ignored for fixed gates.
    fn apply(&mut self, name: &str, index: &[usize], params: Option<Params>)
        -> IrResult<()>
    {
        self.apply_with(name, index, params, None)
    }

    /// Like [`apply`][Self::apply], with a split policy.
    fn apply_with(
        &mut self,
        name: &str,
        index: &[usize],
        params: Option<Params>,
        split: Option<SplitConfig>,
    ) -> IrResult<()>
    {
        let kind = GateKind::from_name(name)?;
        self.apply_record(IrRecord::new(kind, index.to_vec(), params, split))
    }

    fixed_gate_methods!(
        i => "i"(q);
        x => "x"(q);
        y => "y"(q);
        z => "z"(q);
        h => "h"(q);
        t => "t"(q);
        s => "s"(q);
        td => "td"(q);
        sd => "sd"(q);
        wroot => "wroot"(q);
        cnot => "cnot"(c, q);
        cx => "cx"(c, q);
        cz => "cz"(c, q);
        cy => "cy"(c, q);
        swap => "swap"(a, b);
        ox => "ox"(c, q);
        oy => "oy"(c, q);
        oz => "oz"(c, q);
        toffoli => "toffoli"(c0, c1, q);
        fredkin => "fredkin"(c, a, b);
    );

    rotation_gate_methods!(
        rx => "rx"(q);
        ry => "ry"(q);
        rz => "rz"(q);
        phase => "phase"(q);
        rxx => "rxx"(a, b);
        ryy => "ryy"(a, b);
        rzz => "rzz"(a, b);
        cphase => "cphase"(c, q);
        crx => "crx"(c, q);
        cry => "cry"(c, q);
        crz => "crz"(c, q);
        orx => "orx"(c, q);
        ory => "ory"(c, q);
        orz => "orz"(c, q);
        iswap => "iswap"(a, b);
    );

    /// Apply an Euler-angle unitary.
    fn u(&mut self, q: usize, theta: f64, phi: f64, lbd: f64) -> IrResult<()> {
        self.apply("u", &[q], Some(params!{ "theta" => theta, "phi" => phi, "lbd" => lbd }))
    }

    /// Apply a rotation by `theta` about the axis at polar angle `alpha` and
    /// azimuth `phi`.
    fn r(&mut self, q: usize, theta: f64, alpha: f64, phi: f64) -> IrResult<()> {
        self.apply("r", &[q], Some(params!{ "theta" => theta, "alpha" => alpha, "phi" => phi }))
    }

    /// Apply an arbitrary unitary.
    fn any(&mut self, index: &[usize], unitary: nd::Array2<C64>) -> IrResult<()> {
        self.apply("any", index, Some(params!{ "unitary" => unitary }))
    }

    /// Apply `cos θ I - i sin θ U` for `U² = I`.
    fn exp1(&mut self, index: &[usize], unitary: nd::Array2<C64>, theta: f64)
        -> IrResult<()>
    {
        self.apply("exp1", index, Some(params!{ "unitary" => unitary, "theta" => theta }))
    }

    /// Apply `exp(-i θ U)`.
    fn exp(&mut self, index: &[usize], unitary: nd::Array2<C64>, theta: f64)
        -> IrResult<()>
    {
        self.apply("exp", index, Some(params!{ "unitary" => unitary, "theta" => theta }))
    }

    /// Apply `unitary` to the trailing qubits of `index`, controlled on the
    /// leading ones holding the values `ctrl`.
    fn multicontrol(
        &mut self,
        index: &[usize],
        ctrl: Vec<usize>,
        unitary: nd::Array2<C64>,
    ) -> IrResult<()>
    {
        self.apply("multicontrol", index, Some(params!{ "ctrl" => ctrl, "unitary" => unitary }))
    }

    /// Apply an arbitrary unitary as a matrix product operator.
    fn mpo(&mut self, index: &[usize], unitary: nd::Array2<C64>) -> IrResult<()> {
        self.apply("mpo", index, Some(params!{ "unitary" => unitary }))
    }

    /// Return a copy of the record log.
    fn to_qir(&self) -> Vec<IrRecord> { self.qir().to_vec() }

    /// Build a circuit by replaying a record log.
    ///
    /// If `params` doesn't fix the number of qubits (directly or through an
    /// input state), it is one more than the largest index in the log.
    fn from_qir(qir: &[IrRecord], params: Option<CircuitParams>) -> IrResult<Self> {
        let mut params = params.unwrap_or_default();
        if params.nqubits.is_none() && params.inputs.is_none() {
            let max
                = qir.iter()
                .flat_map(|rec| rec.index.iter().copied())
                .max()
                .unwrap_or(0);
            params.nqubits = Some(max + 1);
        }
        let mut circuit = Self::from_params(&params)?;
        circuit.append_from_qir(qir)?;
        Ok(circuit)
    }

    /// Replay a record log on top of `self`.
    fn append_from_qir(&mut self, qir: &[IrRecord]) -> IrResult<()> {
        debug!("replaying {} records", qir.len());
        qir.iter().cloned().try_for_each(|rec| self.apply_record(rec))
    }

    /// Build the inverse circuit: the log in reverse order with every gate
    /// replaced by its adjoint.
    ///
    /// The new circuit starts from `∣0…0⟩` unless `params` says otherwise.
    fn inverse(&self, params: Option<CircuitParams>) -> IrResult<Self> {
        let mut params = params.unwrap_or_default();
        if params.nqubits.is_none() { params.nqubits = Some(self.nqubits()); }
        let mut circuit = Self::from_params(&params)?;
        self.qir().iter().rev()
            .try_for_each(|rec| circuit.apply_record(rec.adjoint()))?;
        Ok(circuit)
    }

    /// Return a new circuit applying the gates of `self` followed by those of
    /// `other`, starting from the same input as `self`.
    fn append(&self, other: &Self) -> IrResult<Self> {
        let qir: Vec<IrRecord>
            = self.qir().iter().chain(other.qir().iter()).cloned().collect();
        Self::from_qir(&qir, Some(self.circuit_params()))
    }

    /// Return a new circuit applying the gates of `other` followed by those of
    /// `self`, starting from the same input as `self`.
    fn prepend(&self, other: &Self) -> IrResult<Self> {
        let qir: Vec<IrRecord>
            = other.qir().iter().chain(self.qir().iter()).cloned().collect();
        Self::from_qir(&qir, Some(self.circuit_params()))
    }

    /// Count the gates in the circuit, or only those whose names appear in
    /// `names` (after standardization).
    fn gate_count(&self, names: Option<&[&str]>) -> usize {
        match names {
            None => self.qir().len(),
            Some(names) => {
                let names: Vec<String>
                    = names.iter().map(|name| standardize_gate(name)).collect();
                self.qir().iter()
                    .filter(|rec| names.contains(&rec.name))
                    .count()
            },
        }
    }

    /// Count the gates in the circuit by name.
    fn gate_summary(&self) -> BTreeMap<String, usize> {
        let mut summary: BTreeMap<String, usize> = BTreeMap::new();
        self.qir().iter()
            .for_each(|rec| { *summary.entry(rec.name.clone()).or_insert(0) += 1; });
        summary
    }

    /// Serialize the record log to JSON; see [`qir_to_json`].
    fn to_json(&self, simplified: bool) -> IrResult<String> {
        qir_to_json(self.qir(), simplified)
    }

    /// Serialize the record log to a JSON file.
    fn to_json_file<P>(&self, path: P, simplified: bool) -> IrResult<()>
    where P: AsRef<Path>
    {
        Ok(fs::write(path, self.to_json(simplified)?)?)
    }

    /// Build a circuit from either JSON encoding of a record log.
    fn from_json(json: &str, params: Option<CircuitParams>) -> IrResult<Self> {
        Self::from_qir(&json_to_qir(json)?, params)
    }

    /// Build a circuit from a JSON file.
    fn from_json_file<P>(path: P, params: Option<CircuitParams>) -> IrResult<Self>
    where P: AsRef<Path>
    {
        Self::from_json(&fs::read_to_string(path)?, params)
    }

    /// Build a circuit from the qsim text format.
    ///
    /// The first line gives the number of qubits (used unless `params` sets
    /// it); every other non-empty line is `<time> <gate> <args...>`. Unknown
    /// gates are an error.
    fn from_qsim_str(qsim: &str, params: Option<CircuitParams>) -> IrResult<Self> {
        let mut lines
            = qsim.lines().enumerate()
            .map(|(k, line)| (k + 1, line.trim()))
            .filter(|(_, line)| !line.is_empty());
        let (lineno, first) = lines.next().ok_or(Parse(1, "empty input".to_string()))?;
        let mut params = params.unwrap_or_default();
        if params.nqubits.is_none() {
            params.nqubits = Some(
                first.parse::<usize>()
                    .map_err(|_| Parse(lineno, format!("invalid qubit count '{}'", first)))?
            );
        }
        let mut circuit = Self::from_params(&params)?;
        for (lineno, line) in lines {
            let tokens: Vec<&str> = line.split_whitespace().collect();
            apply_qsim_line(&mut circuit, &tokens, lineno)?;
        }
        Ok(circuit)
    }

    /// Build a circuit from a qsim file.
    fn from_qsim_file<P>(path: P, params: Option<CircuitParams>) -> IrResult<Self>
    where P: AsRef<Path>
    {
        Self::from_qsim_str(&fs::read_to_string(path)?, params)
    }
}

fn apply_qsim_line<C>(circuit: &mut C, tokens: &[&str], lineno: usize)
    -> IrResult<()>
where C: AbstractCircuit
{
    let gate = tokens.get(1)
        .ok_or_else(|| Parse(lineno, "missing gate".to_string()))?
        .to_lowercase();
    let q = |k: usize| parse_token::<usize>(tokens, k, lineno);
    let a = |k: usize| parse_token::<f64>(tokens, k, lineno);
    match gate.as_str() {
        "h" => circuit.h(q(2)?),
        "x" => circuit.x(q(2)?),
        "y" => circuit.y(q(2)?),
        "z" => circuit.z(q(2)?),
        "s" => circuit.phase(q(2)?, FRAC_PI_2),
        "t" => circuit.phase(q(2)?, FRAC_PI_4),
        "x_1_2" => circuit.rx(q(2)?, FRAC_PI_2),
        "y_1_2" => circuit.ry(q(2)?, FRAC_PI_2),
        "z_1_2" => circuit.rz(q(2)?, FRAC_PI_2),
        "w_1_2" => circuit.u(q(2)?, FRAC_PI_2, -FRAC_PI_4, FRAC_PI_4),
        "hz_1_2" => circuit.wroot(q(2)?),
        "cnot" => circuit.cnot(q(2)?, q(3)?),
        "cx" => circuit.cx(q(2)?, q(3)?),
        "cy" => circuit.cy(q(2)?, q(3)?),
        "cz" => circuit.cz(q(2)?, q(3)?),
        "is" | "iswap" => circuit.iswap(q(2)?, q(3)?, 1.0),
        "rx" => circuit.rx(q(2)?, a(3)?),
        "ry" => circuit.ry(q(2)?, a(3)?),
        "rz" => circuit.rz(q(2)?, a(3)?),
        "fs" | "fsim" => {
            let (i, j) = (q(2)?, q(3)?);
            let (theta, phi) = (a(4)?, a(5)?);
            circuit.iswap(i, j, -theta)?;
            circuit.cphase(i, j, -phi)
        },
        other => Err(Parse(lineno, format!("unsupported gate '{}'", other))),
    }
}
