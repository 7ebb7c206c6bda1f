//! Construction of the pairwise Rydberg interaction operator over a register
//! of atoms.
//!
//! Pairs of Rydberg states with equal orbital angular momentum couple through
//! a van der Waals shift scaling as `C6/d^6`; pairs with unequal angular
//! momentum couple through a resonant dipole-dipole exchange scaling as
//! `C3/d^3`. All operators are built in the full register space with atom 0
//! as the outermost tensor factor.

use itertools::Itertools;
use ndarray::{ self as nd };
use num_complex::Complex64 as C64;
use rustc_hash::FxHashSet as HashSet;
use crate::{
    basis::{ projector, multi_kron, Coord },
    error::{ RegisterError, RegisterResult },
};

/// Classification of a resolved pair of interacting Rydberg states.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum InteractionKind {
    /// Equal orbital angular momentum; diagonal `C6/d^6` shift.
    VanDerWaals,
    /// Unequal orbital angular momentum; off-diagonal `C3/d^3` exchange.
    DipoleDipole,
    /// Both states live on the same atom; recorded but carries no pairwise
    /// energy.
    SelfInteraction,
}

/// A resolved pair of global Rydberg states and its classification.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct InteractionPair {
    /// Owning atom of the first state.
    pub atom_a: usize,
    /// Local level index of the first state within its atom.
    pub state_a: usize,
    /// Owning atom of the second state.
    pub atom_b: usize,
    /// Local level index of the second state within its atom.
    pub state_b: usize,
    pub kind: InteractionKind,
    /// Euclidean distance between the owning atoms; zero for
    /// self-interactions.
    pub distance: f64,
}

/// Builder for the always-on interaction operator of a register.
///
/// Inputs are the per-atom Hilbert dimensions, the declared local Rydberg
/// levels of each atom with their `l` quantum numbers, the spatial layout,
/// and the interacting pairs as edges over *global* Rydberg state indices
/// (each atom's local level indices offset by the cumulative dimension of all
/// preceding atoms).
#[derive(Clone, Debug)]
pub struct RydbergInteractionBuilder {
    dims: Vec<usize>,
    rydberg: Vec<Vec<(usize, u32)>>,
    layout: Vec<Coord>,
    edges: Vec<(usize, usize)>,
}

impl RydbergInteractionBuilder {
    /// Create a new builder.
    ///
    /// Fails with [`RegisterError::DimensionMismatch`] if the per-atom data
    /// disagree in length, and with
    /// [`RegisterError::UnsupportedInteractionTopology`] if any declared
    /// Rydberg level is outside its atom's dimension.
    pub fn new(
        dims: Vec<usize>,
        rydberg: Vec<Vec<(usize, u32)>>,
        layout: Vec<Coord>,
        edges: Vec<(usize, usize)>,
    ) -> RegisterResult<Self>
    {
        if rydberg.len() != dims.len() {
            return Err(RegisterError::DimensionMismatch {
                expected: dims.len(), found: rydberg.len() });
        }
        if layout.len() != dims.len() {
            return Err(RegisterError::DimensionMismatch {
                expected: dims.len(), found: layout.len() });
        }
        for (atom, (levels, dim)) in
            rydberg.iter().zip(dims.iter()).enumerate()
        {
            for (index, _) in levels.iter() {
                if *index >= *dim {
                    return Err(RegisterError::UnsupportedInteractionTopology(
                        format!(
                            "rydberg level {} out of range for atom {} \
                            of dimension {}",
                            index, atom, dim,
                        )
                    ));
                }
            }
        }
        Ok(Self { dims, rydberg, layout, edges })
    }

    /// Number of atoms in the register.
    pub fn natoms(&self) -> usize { self.dims.len() }

    /// Total register dimension.
    pub fn dim(&self) -> usize { self.dims.iter().product() }

    // locate the owning atom and local index of a global state index
    fn locate(&self, global: usize) -> Option<(usize, usize)> {
        let mut offset: usize = 0;
        for (atom, dim) in self.dims.iter().enumerate() {
            if global < offset + dim {
                return Some((atom, global - offset));
            }
            offset += dim;
        }
        None
    }

    // look up the l quantum number of a declared Rydberg level
    fn angular(&self, atom: usize, local: usize) -> Option<u32> {
        self.rydberg[atom].iter()
            .find(|(index, _)| *index == local)
            .map(|(_, l)| *l)
    }

    /// Resolve the global state-index edges into classified, deduplicated
    /// [`InteractionPair`]s.
    ///
    /// Edges from a symmetric traversal that name the same unordered pair of
    /// states are collapsed to one. Fails with
    /// [`RegisterError::UnsupportedInteractionTopology`] if an edge endpoint
    /// is not a declared Rydberg state or two distinct atoms coincide in
    /// space.
    pub fn resolve_pairs(&self) -> RegisterResult<Vec<InteractionPair>> {
        let mut visited: HashSet<[(usize, usize); 2]> = HashSet::default();
        let mut pairs: Vec<InteractionPair> = Vec::new();
        for &(ga, gb) in self.edges.iter() {
            let (atom_a, state_a) = self.locate(ga)
                .ok_or_else(|| RegisterError::UnsupportedInteractionTopology(
                    format!("global state index {} out of range", ga)))?;
            let (atom_b, state_b) = self.locate(gb)
                .ok_or_else(|| RegisterError::UnsupportedInteractionTopology(
                    format!("global state index {} out of range", gb)))?;
            let la = self.angular(atom_a, state_a)
                .ok_or_else(|| RegisterError::UnsupportedInteractionTopology(
                    format!(
                        "state {} of atom {} is not a rydberg level",
                        state_a, atom_a,
                    )))?;
            let lb = self.angular(atom_b, state_b)
                .ok_or_else(|| RegisterError::UnsupportedInteractionTopology(
                    format!(
                        "state {} of atom {} is not a rydberg level",
                        state_b, atom_b,
                    )))?;
            let mut key = [(atom_a, state_a), (atom_b, state_b)];
            key.sort();
            if !visited.insert(key) { continue; }
            if atom_a == atom_b {
                pairs.push(InteractionPair {
                    atom_a, state_a, atom_b, state_b,
                    kind: InteractionKind::SelfInteraction,
                    distance: 0.0,
                });
                continue;
            }
            let distance = self.layout[atom_a].dist(&self.layout[atom_b]);
            if distance <= f64::EPSILON {
                return Err(RegisterError::UnsupportedInteractionTopology(
                    format!(
                        "atoms {} and {} coincide in space",
                        atom_a, atom_b,
                    )
                ));
            }
            let kind
                = if la == lb { InteractionKind::VanDerWaals }
                else { InteractionKind::DipoleDipole };
            if kind == InteractionKind::DipoleDipole {
                // the exchange moves each atom into the other's state, so
                // both local indices must fit both atoms
                if state_b >= self.dims[atom_a] {
                    return Err(RegisterError::UnsupportedInteractionTopology(
                        format!(
                            "exchange state {} not representable on atom {}",
                            state_b, atom_a,
                        )
                    ));
                }
                if state_a >= self.dims[atom_b] {
                    return Err(RegisterError::UnsupportedInteractionTopology(
                        format!(
                            "exchange state {} not representable on atom {}",
                            state_a, atom_b,
                        )
                    ));
                }
            }
            pairs.push(InteractionPair {
                atom_a, state_a, atom_b, state_b, kind, distance });
        }
        Ok(pairs)
    }

    // diagonal joint projector |i i⟩⟨i i| over atoms (a, b), identity on all
    // spectators
    fn vdw_operator(&self, pair: &InteractionPair) -> nd::Array2<C64> {
        let ops: Vec<nd::Array2<C64>>
            = self.dims.iter().enumerate()
            .map(|(atom, &dim)| {
                if atom == pair.atom_a {
                    projector(dim, pair.state_a, pair.state_a)
                } else if atom == pair.atom_b {
                    projector(dim, pair.state_b, pair.state_b)
                } else {
                    nd::Array2::eye(dim)
                }
            })
            .collect();
        multi_kron(ops.iter().map(|op| op.view()))
    }

    /// Enumerate the spectator-expanded exchange terms of a single
    /// dipole-dipole pair.
    ///
    /// One term per assignment of a basis state to every spectator atom,
    /// each `|b⟩_A⟨a| ⊗ |a⟩_B⟨b| ⊗ Π_spect |s⟩⟨s|`. The Hermitian conjugate
    /// is *not* included.
    pub fn exchange_terms(&self, pair: &InteractionPair)
        -> Vec<nd::Array2<C64>>
    {
        let spectators: Vec<usize>
            = (0..self.dims.len())
            .filter(|atom| *atom != pair.atom_a && *atom != pair.atom_b)
            .collect();
        let assignments: Vec<Vec<usize>>
            = if spectators.is_empty() {
                vec![Vec::new()]
            } else {
                spectators.iter()
                    .map(|&atom| 0..self.dims[atom])
                    .multi_cartesian_product()
                    .collect()
            };
        assignments.iter()
            .map(|assignment| {
                let ops: Vec<nd::Array2<C64>>
                    = self.dims.iter().enumerate()
                    .map(|(atom, &dim)| {
                        if atom == pair.atom_a {
                            projector(dim, pair.state_b, pair.state_a)
                        } else if atom == pair.atom_b {
                            projector(dim, pair.state_a, pair.state_b)
                        } else {
                            let pos
                                = spectators.iter()
                                .position(|&s| s == atom)
                                .unwrap();
                            let s = assignment[pos];
                            projector(dim, s, s)
                        }
                    })
                    .collect();
                multi_kron(ops.iter().map(|op| op.view()))
            })
            .collect()
    }

    /// Build the total interaction operator.
    ///
    /// Van der Waals pairs contribute `C6/d^6` times the joint diagonal
    /// projector; dipole-dipole pairs contribute `C3/d^3` times the sum of
    /// their spectator-expanded exchange terms plus the Hermitian conjugate.
    /// Self-interaction pairs are resolved but carry no energy. An edge list
    /// producing no terms yields the zero operator.
    pub fn build(&self, c6: f64, c3: f64) -> RegisterResult<nd::Array2<C64>> {
        let pairs = self.resolve_pairs()?;
        let n = self.dim();
        let mut vint: nd::Array2<C64> = nd::Array2::zeros((n, n));
        for pair in pairs.iter() {
            match pair.kind {
                InteractionKind::SelfInteraction => { },
                InteractionKind::VanDerWaals => {
                    let shift = c6 / pair.distance.powi(6);
                    vint = vint + self.vdw_operator(pair) * shift;
                },
                InteractionKind::DipoleDipole => {
                    let coupling = c3 / pair.distance.powi(3);
                    for term in self.exchange_terms(pair).into_iter() {
                        let dag: nd::Array2<C64>
                            = term.t().mapv(|a| a.conj());
                        vint = vint + (term + dag) * coupling;
                    }
                },
            }
        }
        Ok(vint)
    }
}
