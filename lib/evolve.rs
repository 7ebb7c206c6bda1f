//! Numerical integration of the Lindblad master equation.
//!
//! The Hamiltonian may be a static matrix or a sum of `(operator, envelope)`
//! terms; all operators and decay rates are in units of angular frequency.
//! Integration is via fourth-order Runge-Kutta with step-doubling error
//! control between grid points.

use std::{ fmt, rc::Rc };
use ndarray::{ self as nd };
use num_complex::Complex64 as C64;
use crate::{
    config::SimConfig,
    error::{ RegisterError, RegisterResult },
};

/// Heap-allocated [`Fn`] trait object giving the time dependence of a single
/// Hamiltonian term.
pub type Envelope<'a> = Rc<dyn Fn(f64) -> C64 + 'a>;

/// A single `(structural operator, time envelope)` Hamiltonian term.
///
/// The full driven Hamiltonian is `H(t) = Σ_k f_k(t) O_k`; Hermiticity is
/// the builder's responsibility (coupling terms come in conjugate pairs).
#[derive(Clone)]
pub struct DrivenTerm<'a> {
    pub op: nd::Array2<C64>,
    pub envelope: Envelope<'a>,
}

impl<'a> DrivenTerm<'a> {
    /// Create a new term with a constant unit envelope (always on).
    pub fn always_on(op: nd::Array2<C64>) -> Self {
        Self { op, envelope: Rc::new(|_| C64::new(1.0, 0.0)) }
    }
}

impl<'a> fmt::Debug for DrivenTerm<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DrivenTerm {{ op: {:?}, envelope: Rc<...> }}", self.op)
    }
}

/// A Hamiltonian in either time-independent ("free") or time-dependent
/// ("control") representation.
#[derive(Clone, Debug)]
pub enum Hamiltonian<'a> {
    /// A fixed matrix.
    Static(nd::Array2<C64>),
    /// A sum of `(operator, envelope)` terms.
    Driven(Vec<DrivenTerm<'a>>),
}

impl<'a> Hamiltonian<'a> {
    /// Matrix dimension, if determinable.
    pub fn dim(&self) -> Option<usize> {
        match self {
            Self::Static(h) => Some(h.shape()[0]),
            Self::Driven(terms) => terms.first().map(|t| t.op.shape()[0]),
        }
    }

    /// Evaluate the Hamiltonian at a given time as a 2D array of dimension
    /// `n`.
    pub fn at(&self, n: usize, t: f64) -> nd::Array2<C64> {
        match self {
            Self::Static(h) => h.clone(),
            Self::Driven(terms) => {
                let mut acc: nd::Array2<C64> = nd::Array2::zeros((n, n));
                for term in terms.iter() {
                    acc = acc + &term.op * (term.envelope)(t);
                }
                acc
            },
        }
    }
}

/// Compute the commutator `[A, B] = A B - B A`.
pub fn commutator<SA, SB>(
    A: &nd::ArrayBase<SA, nd::Ix2>,
    B: &nd::ArrayBase<SB, nd::Ix2>,
) -> nd::Array2<C64>
where
    SA: nd::Data<Elem = C64>,
    SB: nd::Data<Elem = C64>,
{
    A.dot(B) - B.dot(A)
}

/// Compute the anti-commutator `{A, B} = A B + B A`.
pub fn anti_commutator<SA, SB>(
    A: &nd::ArrayBase<SA, nd::Ix2>,
    B: &nd::ArrayBase<SB, nd::Ix2>,
) -> nd::Array2<C64>
where
    SA: nd::Data<Elem = C64>,
    SB: nd::Data<Elem = C64>,
{
    A.dot(B) + B.dot(A)
}

/// Compute the expectation value `Tr(O ρ)`, discarding the residual
/// imaginary part.
pub fn expect_value(op: &nd::Array2<C64>, rho: &nd::Array2<C64>) -> f64 {
    op.dot(rho).diag().iter().sum::<C64>().re
}

/// Output of a single evolution run.
///
/// `expect[k]` is the trajectory of the `k`-th observable, sampled at every
/// grid time; `states` holds the density matrix at every grid time when
/// requested via [`SimConfig::store_states`].
#[derive(Clone, Debug)]
pub struct Evolution {
    pub expect: Vec<nd::Array1<f64>>,
    pub states: Option<Vec<nd::Array2<C64>>>,
}

// Lindblad operator with its adjoint products precomputed.
struct Dissipator {
    l: nd::Array2<C64>,
    l_dag: nd::Array2<C64>,
    ldag_l: nd::Array2<C64>,
}

impl Dissipator {
    fn new(l: nd::Array2<C64>) -> Self {
        let l_dag: nd::Array2<C64> = l.t().mapv(|a| a.conj());
        let ldag_l = l_dag.dot(&l);
        Self { l, l_dag, ldag_l }
    }
}

// RHS of the Lindblad master equation:
// dρ/dt = -i [H, ρ] + Σ_k (L_k ρ L_k† - ½{L_k†L_k, ρ})
fn lindblad_rhs(
    h: &nd::Array2<C64>,
    dissipators: &[Dissipator],
    rho: &nd::Array2<C64>,
) -> nd::Array2<C64>
{
    let mut drho: nd::Array2<C64> = -C64::i() * commutator(h, rho);
    for d in dissipators.iter() {
        drho
            = drho
            + d.l.dot(rho).dot(&d.l_dag)
            - anti_commutator(&d.ldag_l, rho) * 0.5;
    }
    drho
}

// classical RK4 update with the Hamiltonian sampled at the step endpoints
// and midpoint
fn rk4_core(
    h1: &nd::Array2<C64>,
    h2: &nd::Array2<C64>,
    h3: &nd::Array2<C64>,
    dissipators: &[Dissipator],
    rho: &nd::Array2<C64>,
    dt: f64,
) -> nd::Array2<C64>
{
    let k1 = lindblad_rhs(h1, dissipators, rho);
    let k2 = lindblad_rhs(h2, dissipators, &(rho + &(&k1 * (dt / 2.0))));
    let k3 = lindblad_rhs(h2, dissipators, &(rho + &(&k2 * (dt / 2.0))));
    let k4 = lindblad_rhs(h3, dissipators, &(rho + &(&k3 * dt)));
    rho + &((k1 + k2 * 2.0 + k3 * 2.0 + k4) * (dt / 6.0))
}

fn rk4_step(
    H: &Hamiltonian,
    n: usize,
    dissipators: &[Dissipator],
    rho: &nd::Array2<C64>,
    t: f64,
    dt: f64,
) -> nd::Array2<C64>
{
    match H {
        Hamiltonian::Static(h) => rk4_core(h, h, h, dissipators, rho, dt),
        Hamiltonian::Driven(_) => {
            let h1 = H.at(n, t);
            let h2 = H.at(n, t + dt / 2.0);
            let h3 = H.at(n, t + dt);
            rk4_core(&h1, &h2, &h3, dissipators, rho, dt)
        },
    }
}

/// Numerically integrate the Lindblad master equation over a monotonically
/// increasing time grid.
///
/// `rho0` must be a square density matrix matching the dimension of `H` and
/// of every Lindblad and observable operator. Step size is adapted between
/// grid points by step doubling against `config.rtol`, capped at
/// `config.max_step`; exhausting `config.max_steps` before the final grid
/// time fails with [`RegisterError::NumericalInstability`] and the partial
/// trajectory is discarded.
pub fn evolve(
    rho0: &nd::Array2<C64>,
    H: &Hamiltonian,
    lindblads: &[nd::Array2<C64>],
    observables: &[nd::Array2<C64>],
    time: &nd::Array1<f64>,
    config: &SimConfig,
) -> RegisterResult<Evolution>
{
    let n = rho0.shape()[0];
    if !rho0.is_square() {
        return Err(RegisterError::DimensionMismatch {
            expected: n, found: rho0.shape()[1] });
    }
    if let Some(nh) = H.dim() {
        if nh != n {
            return Err(RegisterError::DimensionMismatch {
                expected: n, found: nh });
        }
    }
    for op in lindblads.iter().chain(observables.iter()) {
        if !op.is_square() || op.shape()[0] != n {
            return Err(RegisterError::DimensionMismatch {
                expected: n, found: op.shape()[0] });
        }
    }

    let dissipators: Vec<Dissipator>
        = lindblads.iter().cloned().map(Dissipator::new).collect();
    let nt = time.len();
    let mut expect: Vec<Vec<f64>>
        = vec![Vec::with_capacity(nt); observables.len()];
    let mut states: Option<Vec<nd::Array2<C64>>>
        = config.store_states.then(|| Vec::with_capacity(nt));

    let mut rho: nd::Array2<C64> = rho0.clone();
    let mut record = |rho: &nd::Array2<C64>,
                      expect: &mut Vec<Vec<f64>>,
                      states: &mut Option<Vec<nd::Array2<C64>>>|
    {
        observables.iter().zip(expect.iter_mut())
            .for_each(|(op, traj)| traj.push(expect_value(op, rho)));
        if let Some(st) = states.as_mut() { st.push(rho.clone()); }
    };
    record(&rho, &mut expect, &mut states);

    let mut steps: usize = 0;
    let mut h_try: f64 = config.max_step;
    let iter = time.iter().zip(time.iter().skip(1));
    for (&tk, &tkp1) in iter {
        let mut t = tk;
        while tkp1 - t > f64::EPSILON * tkp1.abs().max(1.0) {
            let dt = h_try.min(tkp1 - t).min(config.max_step);
            if dt < 1e-14 * tkp1.abs().max(1.0) {
                return Err(RegisterError::NumericalInstability { t, steps });
            }
            steps += 3;
            if steps > config.max_steps {
                return Err(RegisterError::NumericalInstability { t, steps });
            }
            let full = rk4_step(H, n, &dissipators, &rho, t, dt);
            let half = rk4_step(H, n, &dissipators, &rho, t, dt / 2.0);
            let half
                = rk4_step(H, n, &dissipators, &half, t + dt / 2.0, dt / 2.0);
            let scale: f64
                = half.iter().map(|a| a.norm()).fold(1.0, f64::max);
            let err: f64
                = full.iter().zip(half.iter())
                .map(|(f, h)| (*f - *h).norm())
                .fold(0.0, f64::max)
                / scale;
            if err <= config.rtol {
                rho = half;
                t += dt;
                h_try = (dt * 1.5).min(config.max_step);
            } else {
                h_try = dt / 2.0;
            }
        }
        // renormalize to counter accumulated trace drift
        let tr: C64 = rho.diag().iter().sum();
        if tr.norm() > f64::EPSILON { rho /= tr; }
        record(&rho, &mut expect, &mut states);
    }

    Ok(Evolution {
        expect: expect.into_iter().map(nd::Array1::from).collect(),
        states,
    })
}
