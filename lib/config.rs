//! Immutable parameter bundles passed into constructors.
//!
//! There is no process-wide mutable state; every model or register holds its
//! own copy of these at construction time.

use crate::basis::Coord;

/// Tunable parameters for the master-equation integrator.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SimConfig {
    /// Maximum number of integrator sub-steps over the whole time grid.
    pub max_steps: usize,
    /// Relative tolerance for the step-doubling error estimate.
    pub rtol: f64,
    /// Maximum integrator step size, in the same units as the time grid.
    pub max_step: f64,
    /// Retain the full density-matrix trajectory alongside expectation
    /// values.
    pub store_states: bool,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            max_steps: 120_000,
            rtol: 1e-6,
            max_step: 1e-5,
            store_states: false,
        }
    }
}

impl SimConfig {
    pub fn new(max_steps: usize, rtol: f64, max_step: f64) -> Self {
        Self { max_steps, rtol, max_step, store_states: false }
    }

    pub fn with_states(mut self) -> Self {
        self.store_states = true;
        self
    }
}

/// Atomic-structure defaults for register construction.
#[derive(Clone, Debug, PartialEq)]
pub struct AtomDefaults {
    /// Number of internal levels per atom.
    pub nrlevels: usize,
    /// Local Rydberg level indices with their orbital angular momentum `l`.
    pub rydberg_levels: Vec<(usize, u32)>,
    /// Van der Waals interaction constant, in units of angular frequency
    /// times length^6.
    pub c6: f64,
    /// Dipole-dipole interaction constant, in units of angular frequency
    /// times length^3.
    pub c3: f64,
    /// Reference inter-atom spacing.
    pub spacing: f64,
    /// Default spatial layout, one coordinate per atom.
    pub layout: Vec<Coord>,
}

impl Default for AtomDefaults {
    fn default() -> Self {
        Self {
            nrlevels: 2,
            rydberg_levels: vec![(1, 0)],
            c6: 1.0,
            c3: 1.0,
            spacing: 1.0,
            layout: vec![Coord::xy(0.0, 0.0), Coord::xy(0.0, 1.0)],
        }
    }
}
