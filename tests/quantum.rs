use float_cmp::assert_approx_eq;
use ndarray as nd;
use num_complex::Complex64 as C64;
use rand::{ Rng, SeedableRng, rngs::StdRng };
use qtensor_net::{
    gate::{ XMAT, YMAT, ZMAT },
    pauli::{ self, HeisenbergCoefficients },
    qinfo::{ self, Cut },
    quantum::{ QuOperator, QuVector },
};

fn random_tensor<R: Rng>(shape: &[usize], rng: &mut R) -> nd::ArrayD<C64> {
    nd::ArrayD::from_shape_simple_fn(
        shape.to_vec(), || C64::new(rng.gen::<f64>() - 0.5, rng.gen::<f64>() - 0.5))
}

fn assert_matrix_close(a: &nd::Array2<C64>, b: &nd::Array2<C64>, eps: f64) {
    assert_eq!(a.dim(), b.dim());
    a.iter().zip(b.iter())
        .for_each(|(x, y)| assert!((x - y).norm() < eps, "{} != {}", x, y));
}

fn kron(a: &nd::Array2<C64>, b: &nd::Array2<C64>) -> nd::Array2<C64> {
    let (ra, ca) = a.dim();
    let (rb, cb) = b.dim();
    nd::Array2::from_shape_fn(
        (ra * rb, ca * cb), |(i, j)| a[[i / rb, j / cb]] * b[[i % rb, j % cb]])
}

#[test]
fn adjoint_and_identity() {
    let mut rng = StdRng::seed_from_u64(10546);
    let a = QuOperator::from_tensor(random_tensor(&[2, 3, 2, 3], &mut rng), None, None)
        .unwrap();
    let dense = a.to_matrix().unwrap();
    assert_eq!(dense.dim(), (6, 6));
    let back = a.adjoint().unwrap().adjoint().unwrap().to_matrix().unwrap();
    assert_matrix_close(&back, &dense, 1e-12);
    let dag = a.adjoint().unwrap().to_matrix().unwrap();
    assert_matrix_close(&dag, &dense.t().mapv(|z| z.conj()), 1e-12);

    let id = QuOperator::identity(&[2, 3]).unwrap();
    let left = id.matmul(&a).unwrap().to_matrix().unwrap();
    let right = a.matmul(&id).unwrap().to_matrix().unwrap();
    assert_matrix_close(&left, &dense, 1e-12);
    assert_matrix_close(&right, &dense, 1e-12);
    let tr = id.trace().unwrap().into_scalar().unwrap().value().unwrap();
    assert_approx_eq!(f64, tr.re, 6.0, epsilon = 1e-12);
}

#[test]
fn composition_is_associative() {
    let mut rng = StdRng::seed_from_u64(10546);
    let ops: Vec<_>
        = (0..3)
        .map(|_| {
            QuOperator::from_tensor(random_tensor(&[2, 2, 2, 2], &mut rng), None, None)
                .unwrap()
        })
        .collect();
    let ab_c = ops[0].matmul(&ops[1]).unwrap().matmul(&ops[2]).unwrap();
    let a_bc = ops[0].matmul(&ops[1].matmul(&ops[2]).unwrap()).unwrap();
    let dense = ops[0].to_matrix().unwrap()
        .dot(&ops[1].to_matrix().unwrap())
        .dot(&ops[2].to_matrix().unwrap());
    assert_matrix_close(&ab_c.to_matrix().unwrap(), &dense, 1e-10);
    assert_matrix_close(&a_bc.to_matrix().unwrap(), &dense, 1e-10);

    let prod = ops[0].tensor_product(&ops[1]).unwrap();
    assert_eq!(prod.out_space(), vec![2, 2, 2, 2]);
    let expect = kron(&ops[0].to_matrix().unwrap(), &ops[1].to_matrix().unwrap());
    assert_matrix_close(&prod.to_matrix().unwrap(), &expect, 1e-10);
}

#[test]
fn projector_partial_trace() {
    let mut rng = StdRng::seed_from_u64(10546);
    for n in 2..=4_usize {
        let raw = random_tensor(&vec![2; n], &mut rng);
        let norm = raw.iter().map(|z| z.norm_sqr()).sum::<f64>().sqrt();
        let psi = raw.mapv(|z| z / norm);
        let v = QuVector::from_tensor(psi.clone(), None).unwrap();
        let flat: nd::Array1<C64> = psi.iter().copied().collect();
        for mask in 1..(1_usize << n) - 1 {
            let traced: Vec<usize> = (0..n).filter(|k| mask & (1 << k) != 0).collect();
            let rho = v.reduced_density(&traced).unwrap().to_matrix().unwrap();
            let dense
                = qinfo::reduced_density_matrix(&flat, &Cut::Indices(traced.clone()), None)
                .unwrap()
                .into_matrix()
                .unwrap();
            assert_eq!(rho.dim(), (1 << (n - traced.len()), 1 << (n - traced.len())));
            assert_matrix_close(&rho, &dense, 1e-12);
            let tr = rho.diag().sum();
            assert_approx_eq!(f64, tr.re, 1.0, epsilon = 1e-12);
        }
    }
}

#[test]
fn pauli_sums() {
    let ls = vec![vec![3_u8, 3], vec![1, 1]];
    let dense = pauli::pauli_string_sum_dense(&ls, Some(&[0.5, -1.5])).unwrap();
    let expect
        = kron(&ZMAT, &ZMAT).mapv(|z| z * 0.5) + kron(&XMAT, &XMAT).mapv(|z| z * -1.5);
    assert_matrix_close(&dense, &expect, 1e-12);

    let coeffs = HeisenbergCoefficients { hz: 0.3, ..Default::default() };
    let h = pauli::heisenberg_hamiltonian(2, &[(0, 1)], &coeffs, true)
        .unwrap()
        .into_dense();
    let eye = nd::Array2::from_diag_elem(2, C64::new(1.0, 0.0));
    let expect
        = kron(&ZMAT, &ZMAT) + kron(&XMAT, &XMAT) + kron(&YMAT, &YMAT)
        + (kron(&ZMAT, &eye) + kron(&eye, &ZMAT)).mapv(|z| z * 0.3);
    assert_matrix_close(&h, &expect, 1e-12);
}

#[cfg(feature = "sparse")]
#[test]
fn pauli_coo_matches_dense() {
    let ls = vec![vec![3_u8, 3], vec![1, 1]];
    let coo = pauli::pauli_string_sum_coo(&ls, None).unwrap();
    let dense = pauli::PauliMatrix::Sparse(coo).into_dense();
    let expect = kron(&ZMAT, &ZMAT) + kron(&XMAT, &XMAT);
    assert_matrix_close(&dense, &expect, 1e-12);
    let csr = pauli::pauli_string_sum_csr(&ls, None).unwrap();
    assert_eq!(csr.nnz(), 8);
}
