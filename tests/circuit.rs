use std::f64::consts::{ FRAC_1_SQRT_2, LN_2 };
use float_cmp::assert_approx_eq;
use ndarray as nd;
use num_complex::Complex64 as C64;
use rand::{ Rng, SeedableRng, rngs::StdRng, seq::index };
use qtensor_net::{
    backend::DenseBackend,
    circuit::Circuit,
    gate::XMAT,
    ir::{ AbstractCircuit, CircuitParams },
    mitigation::{ CalibrationMethod, Counts, Method, ReadoutMit },
    qinfo::{ self, Cut, MeasurementCounts },
};

fn assert_states_close(a: &nd::Array1<C64>, b: &nd::Array1<C64>) {
    assert_eq!(a.len(), b.len());
    a.iter().zip(b.iter())
        .for_each(|(x, y)| assert!((x - y).norm() < 1e-10, "{} != {}", x, y));
}

fn sample_circuit() -> Circuit {
    let mut c = Circuit::new(3);
    c.h(0).unwrap();
    c.cnot(0, 1).unwrap();
    c.rx(2, 0.7).unwrap();
    c.t(1).unwrap();
    c.rzz(1, 2, 0.3).unwrap();
    c.toffoli(0, 2, 1).unwrap();
    c.u(0, 0.2, 0.4, -0.9).unwrap();
    c.multicontrol(&[2, 0], vec![1], XMAT.clone()).unwrap();
    c
}

fn random_circuit<R: Rng>(n: usize, depth: usize, rng: &mut R) -> Circuit {
    let mut c = Circuit::new(n);
    for _ in 0..depth {
        let q = index::sample(&mut *rng, n, 3.min(n)).into_vec();
        let theta: f64 = rng.gen_range(-3.0..3.0);
        let applied = match rng.gen_range(0..6) {
            0 => match rng.gen_range(0..4) {
                0 => c.h(q[0]),
                1 => c.t(q[0]),
                2 => c.s(q[0]),
                _ => c.y(q[0]),
            },
            1 => match rng.gen_range(0..3) {
                0 => c.rx(q[0], theta),
                1 => c.ry(q[0], theta),
                _ => c.rz(q[0], theta),
            },
            2 => match rng.gen_range(0..3) {
                0 => c.cnot(q[0], q[1]),
                1 => c.cz(q[0], q[1]),
                _ => c.swap(q[0], q[1]),
            },
            3 => match rng.gen_range(0..3) {
                0 => c.rzz(q[0], q[1], theta),
                1 => c.rxx(q[0], q[1], theta),
                _ => c.cphase(q[0], q[1], theta),
            },
            4 => c.u(q[0], theta, rng.gen_range(-3.0..3.0), rng.gen_range(-3.0..3.0)),
            _ => c.toffoli(q[0], q[1], q[2]),
        };
        applied.unwrap();
    }
    c
}

#[test]
fn bell_pair() {
    let mut c = Circuit::new(2);
    c.h(0).unwrap();
    c.cnot(0, 1).unwrap();
    let psi = c.state().unwrap();
    assert_approx_eq!(f64, psi[0].re, FRAC_1_SQRT_2, epsilon = 1e-12);
    assert_approx_eq!(f64, psi[3].re, FRAC_1_SQRT_2, epsilon = 1e-12);

    let be = DenseBackend::default();
    let rho = qinfo::reduced_density_matrix(&psi, &Cut::Prefix(1), None)
        .unwrap()
        .into_matrix()
        .unwrap();
    assert_approx_eq!(f64, qinfo::entropy(&be, &rho, 1e-12).unwrap(), LN_2, epsilon = 1e-8);
    let full = qinfo::pure_density(&psi);
    assert_approx_eq!(f64, qinfo::fidelity(&be, &full, &full).unwrap(), 1.0, epsilon = 1e-6);
    assert_approx_eq!(f64, c.expectation_ps(&[], &[], &[0, 1]).unwrap().re, 1.0,
        epsilon = 1e-12);
    assert_approx_eq!(f64, c.expectation_ps(&[0, 1], &[], &[]).unwrap().re, 1.0,
        epsilon = 1e-12);
    assert_approx_eq!(f64, c.expectation_ps(&[], &[0, 1], &[]).unwrap().re, -1.0,
        epsilon = 1e-12);
}

#[test]
fn replay_and_counts() {
    let c = sample_circuit();
    assert_eq!(c.gate_count(None), c.qir().len());
    assert_eq!(c.gate_count(Some(&["ccnot"][..])), 1);
    assert_eq!(c.gate_count(Some(&["cx"][..])), 1);
    let replayed = Circuit::from_qir(&c.to_qir(), None).unwrap();
    assert_eq!(replayed.nqubits(), 3);
    assert_states_close(&replayed.state().unwrap(), &c.state().unwrap());
}

#[test]
fn inverse_undoes() {
    let c = sample_circuit();
    let id = c.append(&c.inverse(None).unwrap()).unwrap();
    let psi = id.state().unwrap();
    assert_approx_eq!(f64, psi[0].norm(), 1.0, epsilon = 1e-10);
    let mat = c.inverse(None).unwrap().matrix().unwrap().dot(&c.matrix().unwrap());
    for ((i, j), z) in mat.indexed_iter() {
        let expect = if i == j { 1.0 } else { 0.0 };
        assert!((z - C64::new(expect, 0.0)).norm() < 1e-10);
    }
}

#[test]
fn random_sequences_replay_and_invert() {
    let mut rng = StdRng::seed_from_u64(10546);
    for n in 3..=5_usize {
        for _ in 0..4 {
            let c = random_circuit(n, 6 * n, &mut rng);
            let replayed
                = Circuit::from_qir(&c.to_qir(), Some(CircuitParams::new(n))).unwrap();
            assert_eq!(replayed.gate_count(None), c.gate_count(None));
            assert_states_close(&replayed.state().unwrap(), &c.state().unwrap());

            let id = c.append(&c.inverse(None).unwrap()).unwrap();
            let psi = id.state().unwrap();
            assert_approx_eq!(f64, psi[0].norm(), 1.0, epsilon = 1e-10);
            let mat = id.matrix().unwrap();
            let phase = mat[[0, 0]];
            assert_approx_eq!(f64, phase.norm(), 1.0, epsilon = 1e-10);
            for ((i, j), z) in mat.indexed_iter() {
                let expect = if i == j { phase } else { C64::new(0.0, 0.0) };
                assert!((z - expect).norm() < 1e-10);
            }
        }
    }
}

#[test]
fn append_prepend() {
    let mut c = Circuit::new(2);
    c.cnot(0, 1).unwrap();
    let mut x = Circuit::new(2);
    x.x(0).unwrap();
    let after = c.append(&x).unwrap();
    assert_approx_eq!(f64, after.expectation_ps(&[], &[], &[1]).unwrap().re, 1.0,
        epsilon = 1e-12);
    let before = c.prepend(&x).unwrap();
    assert_approx_eq!(f64, before.expectation_ps(&[], &[], &[1]).unwrap().re, -1.0,
        epsilon = 1e-12);
    assert_eq!(after.gate_count(None), 2);
}

#[test]
fn json_round_trips() {
    let c = sample_circuit();
    for simplified in [false, true] {
        let json = c.to_json(simplified).unwrap();
        let back = Circuit::from_json(&json, Some(CircuitParams::new(3))).unwrap();
        assert_states_close(&back.state().unwrap(), &c.state().unwrap());
    }
    let dagger = c.inverse(None).unwrap();
    let json = dagger.to_json(true).unwrap();
    let back = Circuit::from_json(&json, None).unwrap();
    assert_states_close(&back.state().unwrap(), &dagger.state().unwrap());
}

#[test]
fn qsim_matches_builder() {
    let qsim = "2\n0 h 0\n1 cnot 0 1\n2 rz 1 0.25\n";
    let parsed = Circuit::from_qsim_str(qsim, None).unwrap();
    let mut built = Circuit::new(2);
    built.h(0).unwrap();
    built.cnot(0, 1).unwrap();
    built.rz(1, 0.25).unwrap();
    assert_states_close(&parsed.state().unwrap(), &built.state().unwrap());
    assert!(Circuit::from_qsim_str("2\n0 frobnicate 0\n", None).is_err());
}

#[test]
fn input_state_carries_through_composition() {
    let inputs = nd::array![
        C64::new(0.0, 0.0), C64::new(1.0, 0.0),
        C64::new(0.0, 0.0), C64::new(0.0, 0.0),
    ];
    let mut c = Circuit::from_inputs(inputs).unwrap();
    c.cnot(1, 0).unwrap();
    let twice = c.append(&c).unwrap();
    assert_approx_eq!(f64, c.state().unwrap()[3].re, 1.0, epsilon = 1e-12);
    assert_approx_eq!(f64, twice.state().unwrap()[1].re, 1.0, epsilon = 1e-12);
}

#[test]
fn measurement_statistics() {
    let mut rng = StdRng::seed_from_u64(10546);
    let be = DenseBackend::default();
    let mut c = Circuit::new(2);
    c.h(0).unwrap();
    c.cnot(0, 1).unwrap();
    let psi = c.state().unwrap();
    match qinfo::measurement_counts(&be, &psi, 4000, false, &mut rng).unwrap() {
        MeasurementCounts::Dense(counts) => {
            assert_eq!(counts[1] + counts[2], 0);
            assert!(counts[0] > 1800 && counts[3] > 1800);
        },
        other => panic!("unexpected sparse counts {:?}", other),
    }
    let sampled = c.sample(4000, &mut rng).unwrap();
    assert_eq!(sampled.keys().cloned().collect::<Vec<_>>(), vec!["00", "11"]);
}

#[test]
fn sampled_readout_mitigation() {
    let flips: [(f64, f64); 2] = [(0.05, 0.1), (0.08, 0.04)];
    let mut rng = StdRng::seed_from_u64(10546);
    let mut noisy = |circuits: &[Circuit], shots: usize| -> Vec<Counts> {
        circuits.iter()
            .map(|c| {
                let ideal = c.sample(shots, &mut rng).unwrap();
                let mut counts = Counts::new();
                for (bits, n) in ideal.into_iter() {
                    for _ in 0..n {
                        let key: String
                            = bits.chars().enumerate()
                            .map(|(q, b)| {
                                let (p01, p10) = flips.get(q).copied().unwrap_or((0.0, 0.0));
                                let p = if b == '0' { p01 } else { p10 };
                                if rng.gen::<f64>() < p {
                                    if b == '0' { '1' } else { '0' }
                                } else {
                                    b
                                }
                            })
                            .collect();
                        *counts.entry(key).or_insert(0) += 1;
                    }
                }
                counts
            })
            .collect()
    };

    let mut c = Circuit::new(2);
    c.x(0).unwrap();
    let raw = noisy(&[c], 20_000).pop().unwrap();
    assert!(raw.len() > 1);

    let mut mit = ReadoutMit::new(noisy);
    mit.cals_from_system(&[0, 1], 20_000, CalibrationMethod::Local).unwrap();
    for method in [Method::Inverse, Method::Square] {
        let fixed = mit.apply_correction(&raw, &[0, 1], method).unwrap();
        let p10 = fixed.get("10").copied().unwrap_or(0.0) / 20_000.0;
        assert!((p10 - 1.0).abs() < 0.03, "{:?}", fixed);
    }
}
