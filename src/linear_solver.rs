use nalgebra::DVector;
use ndarray::Array3;
use rsparse::data::{Sprs, Trpl};
use rsparse::lusol;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::SolverError;
use crate::numerical::assembly::LinearSystem;

/// Threshold below which inner products are treated as a breakdown.
const BREAKDOWN: f64 = 1e-300;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum KrylovMethod {
    #[default]
    #[serde(rename = "bicgstab")]
    BiCgStab,
    #[serde(rename = "cgs")]
    Cgs,
    /// Symmetric systems only (pressure, pure diffusion).
    #[serde(rename = "cg")]
    Cg,
    /// Sparse LU from rsparse, mostly a reference for the iterative methods.
    #[serde(rename = "direct_lu")]
    DirectLu,
}

/// What to do when an iterative solve stops before reaching the tolerance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NonConvergence {
    /// Log a warning and continue with the last iterate.
    #[default]
    Warn,
    Fail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Convergence threshold on `||b - Ax|| / ||b||`.
    pub tolerance: f64,
    pub max_iterations: usize,
    pub method: KrylovMethod,
    pub on_nonconvergence: NonConvergence,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            tolerance: 1e-8,
            max_iterations: 1000,
            method: KrylovMethod::BiCgStab,
            on_nonconvergence: NonConvergence::Warn,
        }
    }
}

impl SolverConfig {
    pub fn new(tolerance: f64, max_iterations: usize) -> Self {
        Self {
            tolerance,
            max_iterations,
            ..Default::default()
        }
    }

    pub fn with_method(mut self, method: KrylovMethod) -> Self {
        self.method = method;
        self
    }

    pub fn failing(mut self) -> Self {
        self.on_nonconvergence = NonConvergence::Fail;
        self
    }

    pub fn validate(&self) -> Result<(), SolverError> {
        if !(self.tolerance > 0.0 && self.tolerance < 1.0) {
            return Err(SolverError::InvalidParameter(format!(
                "solver tolerance must lie in (0, 1), got {}",
                self.tolerance
            )));
        }
        if self.max_iterations == 0 {
            return Err(SolverError::InvalidParameter(
                "solver needs at least one iteration".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SolverStatus {
    Converged,
    MaxIterationsReached,
    Breakdown,
}

#[derive(Debug, Clone, Serialize)]
pub struct SolverReport {
    pub status: SolverStatus,
    pub iterations: usize,
    pub residual_norm: f64,
    pub relative_residual: f64,
}

impl SolverReport {
    pub fn is_converged(&self) -> bool {
        self.status == SolverStatus::Converged
    }
}

/// Builds a square CSC matrix from `(row, col, value)` triplets.
///
/// Duplicate entries are kept and add up in products.
pub fn sparse_from_triplets(
    n: usize,
    triplets: &[(usize, usize, f64)],
) -> Result<Sprs<f64>, String> {
    if n == 0 {
        return Ok(Sprs::<f64> { m: 0, n: 0, nzmax: 0, p: vec![0], i: vec![], x: vec![] });
    }
    if let Some(&(r, c, _)) = triplets.iter().find(|&&(r, c, _)| r >= n || c >= n) {
        return Err(format!("triplet ({}, {}) outside a {}x{} matrix", r, c, n, n));
    }

    let mut trpl = Trpl::<f64> {
        m: n,
        n,
        p: Vec::with_capacity(triplets.len()),
        i: Vec::with_capacity(triplets.len()),
        x: Vec::with_capacity(triplets.len()),
    };
    for &(row, col, value) in triplets {
        trpl.i.push(row);
        trpl.p.push(col as isize);
        trpl.x.push(value);
    }

    let mut sprs = Sprs::<f64>::new();
    sprs.from_trpl(&trpl);

    if sprs.m != n || sprs.n != n || sprs.p.len() != n + 1 {
        return Err(format!(
            "sparse conversion produced a {}x{} matrix, expected {}x{}",
            sprs.m, sprs.n, n, n
        ));
    }
    Ok(sprs)
}

/// `y = A x` for a CSC matrix.
pub fn matvec(a: &Sprs<f64>, x: &DVector<f64>) -> DVector<f64> {
    let mut y = DVector::zeros(a.m);
    for col in 0..a.n {
        let xc = x[col];
        if xc == 0.0 {
            continue;
        }
        let start = a.p[col] as usize;
        let end = a.p[col + 1] as usize;
        for idx in start..end {
            y[a.i[idx]] += a.x[idx] * xc;
        }
    }
    y
}

fn residual(a: &Sprs<f64>, b: &DVector<f64>, x: &DVector<f64>) -> DVector<f64> {
    b - matvec(a, x)
}

fn report(status: SolverStatus, iterations: usize, r_norm: f64, b_norm: f64) -> SolverReport {
    SolverReport {
        status,
        iterations,
        residual_norm: r_norm,
        relative_residual: r_norm / b_norm,
    }
}

/// Stabilised bi-conjugate gradients.
pub fn bicgstab(
    a: &Sprs<f64>,
    b: &DVector<f64>,
    x: &mut DVector<f64>,
    tol: f64,
    max_iter: usize,
) -> SolverReport {
    let b_norm = b.norm();
    let target = tol * b_norm;

    let mut r = residual(a, b, x);
    if r.norm() <= target {
        return report(SolverStatus::Converged, 0, r.norm(), b_norm);
    }
    let r_hat = r.clone();
    let mut p = DVector::zeros(b.len());
    let mut v = DVector::zeros(b.len());
    let (mut rho_old, mut alpha, mut omega) = (1.0, 1.0, 1.0);

    for iter in 1..=max_iter {
        let rho = r_hat.dot(&r);
        if rho.abs() < BREAKDOWN {
            return report(SolverStatus::Breakdown, iter, r.norm(), b_norm);
        }
        if iter == 1 {
            p.copy_from(&r);
        } else {
            let beta = (rho / rho_old) * (alpha / omega);
            p.axpy(-omega, &v, 1.0);
            p = &r + p * beta;
        }

        v = matvec(a, &p);
        let r_hat_v = r_hat.dot(&v);
        if r_hat_v.abs() < BREAKDOWN {
            return report(SolverStatus::Breakdown, iter, r.norm(), b_norm);
        }
        alpha = rho / r_hat_v;

        let s = &r - &v * alpha;
        if s.norm() <= target {
            x.axpy(alpha, &p, 1.0);
            return report(SolverStatus::Converged, iter, s.norm(), b_norm);
        }

        let t = matvec(a, &s);
        let tt = t.dot(&t);
        omega = if tt == 0.0 { 0.0 } else { t.dot(&s) / tt };

        x.axpy(alpha, &p, 1.0);
        x.axpy(omega, &s, 1.0);
        r = &s - &t * omega;

        let r_norm = r.norm();
        if r_norm <= target {
            return report(SolverStatus::Converged, iter, r_norm, b_norm);
        }
        if omega == 0.0 {
            return report(SolverStatus::Breakdown, iter, r_norm, b_norm);
        }
        rho_old = rho;
    }

    let r_norm = residual(a, b, x).norm();
    report(SolverStatus::MaxIterationsReached, max_iter, r_norm, b_norm)
}

/// Conjugate gradients squared.
pub fn cgs(
    a: &Sprs<f64>,
    b: &DVector<f64>,
    x: &mut DVector<f64>,
    tol: f64,
    max_iter: usize,
) -> SolverReport {
    let b_norm = b.norm();
    let target = tol * b_norm;

    let mut r = residual(a, b, x);
    if r.norm() <= target {
        return report(SolverStatus::Converged, 0, r.norm(), b_norm);
    }
    let r_hat = r.clone();
    let n = b.len();
    let mut u = DVector::zeros(n);
    let mut p = DVector::zeros(n);
    let mut q = DVector::zeros(n);
    let mut rho_old = 1.0;

    for iter in 1..=max_iter {
        let rho = r_hat.dot(&r);
        if rho.abs() < BREAKDOWN {
            return report(SolverStatus::Breakdown, iter, r.norm(), b_norm);
        }
        if iter == 1 {
            u.copy_from(&r);
            p.copy_from(&u);
        } else {
            let beta = rho / rho_old;
            u = &r + &q * beta;
            p = &u + (&q + &p * beta) * beta;
        }

        let v = matvec(a, &p);
        let sigma = r_hat.dot(&v);
        if sigma.abs() < BREAKDOWN {
            return report(SolverStatus::Breakdown, iter, r.norm(), b_norm);
        }
        let alpha = rho / sigma;
        q = &u - &v * alpha;

        let uq = &u + &q;
        x.axpy(alpha, &uq, 1.0);
        r.axpy(-alpha, &matvec(a, &uq), 1.0);

        let r_norm = r.norm();
        if r_norm <= target {
            return report(SolverStatus::Converged, iter, r_norm, b_norm);
        }
        rho_old = rho;
    }

    let r_norm = residual(a, b, x).norm();
    report(SolverStatus::MaxIterationsReached, max_iter, r_norm, b_norm)
}

/// Conjugate gradients, for symmetric positive (semi-)definite operators.
pub fn cg(
    a: &Sprs<f64>,
    b: &DVector<f64>,
    x: &mut DVector<f64>,
    tol: f64,
    max_iter: usize,
) -> SolverReport {
    let b_norm = b.norm();
    let target = tol * b_norm;

    let mut r = residual(a, b, x);
    let mut rr = r.dot(&r);
    if rr.sqrt() <= target {
        return report(SolverStatus::Converged, 0, rr.sqrt(), b_norm);
    }
    let mut p = r.clone();

    for iter in 1..=max_iter {
        let ap = matvec(a, &p);
        let p_ap = p.dot(&ap);
        if p_ap.abs() < BREAKDOWN {
            return report(SolverStatus::Breakdown, iter, rr.sqrt(), b_norm);
        }
        let alpha = rr / p_ap;
        x.axpy(alpha, &p, 1.0);
        r.axpy(-alpha, &ap, 1.0);

        let rr_new = r.dot(&r);
        if rr_new.sqrt() <= target {
            return report(SolverStatus::Converged, iter, rr_new.sqrt(), b_norm);
        }
        p = &r + p * (rr_new / rr);
        rr = rr_new;
    }

    report(SolverStatus::MaxIterationsReached, max_iter, rr.sqrt(), b_norm)
}

fn direct_lu(
    a: &Sprs<f64>,
    b: &DVector<f64>,
    x: &mut DVector<f64>,
) -> Result<SolverReport, SolverError> {
    let mut f: Vec<f64> = b.iter().copied().collect();
    lusol(a, &mut f, 1, 1e-10)
        .map_err(|e| SolverError::LinearSolver(format!("sparse LU failed: {}", e)))?;
    *x = DVector::from_vec(f);
    let r_norm = residual(a, b, x).norm();
    Ok(report(SolverStatus::Converged, 1, r_norm, b.norm()))
}

/// Solves `system` for the unknown called `name`, starting from `guess`.
///
/// A zero right-hand side returns zeros without iterating. An unconverged
/// solve is handled according to `config.on_nonconvergence`, a non-finite
/// result is always an error.
pub fn solve(
    system: &LinearSystem,
    guess: &Array3<f64>,
    config: &SolverConfig,
    name: &str,
) -> Result<(Array3<f64>, SolverReport), SolverError> {
    let res = system.resolution();
    if guess.dim() != res {
        return Err(SolverError::InvalidParameter(format!(
            "initial guess for {} has shape {:?}, expected {:?}",
            name,
            guess.dim(),
            res
        )));
    }

    let b = DVector::from_iterator(system.rhs.len(), system.rhs.iter().copied());
    if b.norm() == 0.0 {
        let zeros = SolverReport {
            status: SolverStatus::Converged,
            iterations: 0,
            residual_norm: 0.0,
            relative_residual: 0.0,
        };
        return Ok((Array3::zeros(res), zeros));
    }

    let mut x = DVector::from_iterator(guess.len(), guess.iter().copied());
    let (tol, max_iter) = (config.tolerance, config.max_iterations);
    let rep = match config.method {
        KrylovMethod::BiCgStab => bicgstab(&system.matrix, &b, &mut x, tol, max_iter),
        KrylovMethod::Cgs => cgs(&system.matrix, &b, &mut x, tol, max_iter),
        KrylovMethod::Cg => cg(&system.matrix, &b, &mut x, tol, max_iter),
        KrylovMethod::DirectLu => direct_lu(&system.matrix, &b, &mut x)?,
    };

    if x.iter().any(|v| !v.is_finite()) {
        return Err(SolverError::LinearSolver(format!(
            "solution for {} contains non-finite values",
            name
        )));
    }

    debug!(
        unknown = name,
        iterations = rep.iterations,
        relative_residual = rep.relative_residual,
        "linear solve finished"
    );

    if !rep.is_converged() {
        match config.on_nonconvergence {
            NonConvergence::Warn => warn!(
                unknown = name,
                status = ?rep.status,
                iterations = rep.iterations,
                relative_residual = rep.relative_residual,
                "linear solver did not converge, continuing with last iterate"
            ),
            NonConvergence::Fail => {
                return Err(SolverError::NotConverged {
                    name: name.to_string(),
                    iterations: rep.iterations,
                    relative_residual: rep.relative_residual,
                })
            }
        }
    }

    let sol = Array3::from_shape_vec(res, x.iter().copied().collect())?;
    Ok((sol, rep))
}

/// Dense copy of one matrix row.
#[cfg(test)]
pub(crate) fn dense_row(a: &Sprs<f64>, row: usize) -> Vec<f64> {
    let mut out = vec![0.0; a.n];
    for col in 0..a.n {
        for idx in a.p[col] as usize..a.p[col + 1] as usize {
            if a.i[idx] == row {
                out[col] += a.x[idx];
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// 1D Laplacian with Dirichlet ends, plus a small shift to keep it
    /// well conditioned.
    fn laplacian(n: usize, shift: f64) -> Sprs<f64> {
        let mut t = Vec::new();
        for i in 0..n {
            t.push((i, i, 2.0 + shift));
            if i > 0 {
                t.push((i, i - 1, -1.0));
            }
            if i + 1 < n {
                t.push((i, i + 1, -1.0));
            }
        }
        sparse_from_triplets(n, &t).unwrap()
    }

    /// Upwinded convection-diffusion, not symmetric.
    fn convection(n: usize) -> Sprs<f64> {
        let mut t = Vec::new();
        for i in 0..n {
            t.push((i, i, 3.5));
            if i > 0 {
                t.push((i, i - 1, -2.0));
            }
            if i + 1 < n {
                t.push((i, i + 1, -1.0));
            }
        }
        sparse_from_triplets(n, &t).unwrap()
    }

    fn check(a: &Sprs<f64>, b: &DVector<f64>, x: &DVector<f64>, tol: f64) {
        let r = b - matvec(a, x);
        assert!(r.norm() <= 10.0 * tol * b.norm(), "residual {}", r.norm());
    }

    #[test]
    fn test_sparse_from_triplets_sums_duplicates() {
        let triplets = [(0, 0, 1.0), (0, 0, 2.0), (1, 0, -1.0), (1, 1, 4.0)];
        let a = sparse_from_triplets(2, &triplets).unwrap();
        assert_eq!(dense_row(&a, 0), vec![3.0, 0.0]);
        assert_eq!(dense_row(&a, 1), vec![-1.0, 4.0]);
        assert!(sparse_from_triplets(2, &[(2, 0, 1.0)]).is_err());
    }

    #[test]
    fn test_matvec() {
        let a = laplacian(3, 0.0);
        let y = matvec(&a, &DVector::from_vec(vec![1.0, 2.0, 3.0]));
        assert_relative_eq!(y[0], 0.0);
        assert_relative_eq!(y[1], 0.0);
        assert_relative_eq!(y[2], 4.0);
    }

    #[test]
    fn test_bicgstab_nonsymmetric() {
        let a = convection(40);
        let b = DVector::from_fn(40, |i, _| (i as f64 * 0.3).sin() + 1.0);
        let mut x = DVector::zeros(40);
        let rep = bicgstab(&a, &b, &mut x, 1e-10, 500);
        assert!(rep.is_converged());
        check(&a, &b, &x, 1e-10);
    }

    #[test]
    fn test_cgs_nonsymmetric() {
        let a = convection(30);
        let b = DVector::from_element(30, 1.0);
        let mut x = DVector::zeros(30);
        let rep = cgs(&a, &b, &mut x, 1e-10, 500);
        assert!(rep.is_converged());
        check(&a, &b, &x, 1e-10);
    }

    #[test]
    fn test_cg_symmetric() {
        let a = laplacian(50, 0.01);
        let b = DVector::from_fn(50, |i, _| i as f64);
        let mut x = DVector::zeros(50);
        let rep = cg(&a, &b, &mut x, 1e-10, 500);
        assert!(rep.is_converged());
        assert!(rep.iterations <= 50);
        check(&a, &b, &x, 1e-10);
    }

    #[test]
    fn test_converged_initial_guess_takes_no_iterations() {
        let a = laplacian(5, 1.0);
        let exact = DVector::from_element(5, 2.0);
        let b = matvec(&a, &exact);
        let mut x = exact.clone();
        let rep = bicgstab(&a, &b, &mut x, 1e-8, 10);
        assert_eq!(rep.iterations, 0);
        assert_eq!(x, exact);
    }

    fn system(n: usize) -> LinearSystem {
        LinearSystem {
            matrix: convection(n * 4),
            rhs: Array3::from_shape_fn((n, 2, 2), |(i, j, k)| 1.0 + (i + j + k) as f64),
        }
    }

    #[test]
    fn test_solve_zero_rhs_returns_zeros() {
        let sys = LinearSystem {
            matrix: laplacian(8, 0.0),
            rhs: Array3::zeros((2, 2, 2)),
        };
        let guess = Array3::from_elem((2, 2, 2), 5.0);
        let (x, rep) = solve(&sys, &guess, &SolverConfig::default(), "p").unwrap();
        assert!(x.iter().all(|&v| v == 0.0));
        assert_eq!(rep.iterations, 0);
    }

    #[test]
    fn test_solve_methods_agree() {
        let sys = system(3);
        let guess = Array3::zeros((3, 2, 2));
        let lu = SolverConfig::default().with_method(KrylovMethod::DirectLu);
        let (reference, _) = solve(&sys, &guess, &lu, "t").unwrap();
        for method in [KrylovMethod::BiCgStab, KrylovMethod::Cgs] {
            let cfg = SolverConfig::new(1e-12, 200).with_method(method);
            let (x, rep) = solve(&sys, &guess, &cfg, "t").unwrap();
            assert!(rep.is_converged());
            for (a, b) in x.iter().zip(reference.iter()) {
                assert_relative_eq!(*a, *b, epsilon = 1e-8);
            }
        }
    }

    #[test]
    fn test_nonconvergence_policy() {
        let sys = system(4);
        let guess = Array3::zeros((4, 2, 2));
        let warn_cfg = SolverConfig::new(1e-14, 1);
        let (_, rep) = solve(&sys, &guess, &warn_cfg, "u").unwrap();
        assert!(!rep.is_converged());
        assert_eq!(rep.status, SolverStatus::MaxIterationsReached);

        let fail_cfg = SolverConfig::new(1e-14, 1).failing();
        match solve(&sys, &guess, &fail_cfg, "u") {
            Err(SolverError::NotConverged { name, iterations, .. }) => {
                assert_eq!(name, "u");
                assert_eq!(iterations, 1);
            }
            other => panic!("expected NotConverged, got {:?}", other.map(|(_, r)| r)),
        }
    }

    #[test]
    fn test_config_validation_and_serde() {
        assert!(SolverConfig::default().validate().is_ok());
        assert!(SolverConfig::new(0.0, 10).validate().is_err());
        assert!(SolverConfig::new(1e-6, 0).validate().is_err());

        let cfg: SolverConfig =
            serde_json::from_str(r#"{"method": "cgs", "on_nonconvergence": "fail"}"#).unwrap();
        assert_eq!(cfg.method, KrylovMethod::Cgs);
        assert_eq!(cfg.on_nonconvergence, NonConvergence::Fail);
        assert_relative_eq!(cfg.tolerance, 1e-8);
        assert_eq!(cfg.max_iterations, 1000);
    }
}
