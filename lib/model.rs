//! Single atomic species under coherent drive, detuning, and dissipation.
//!
//! An [`AtomicModel`] owns its level structure, a shared time grid, typed
//! term lists, and the operators built from them. Hamiltonians follow the
//! rotating-frame convention `H = 0.5 (HD + HoffD)` where `HD` collects the
//! coupling ladders and `HoffD` the detuning projectors; all scales are in
//! units of angular frequency.

use std::{ fmt, rc::Rc, time::SystemTime };
use ndarray::{ self as nd, s };
use ndarray_linalg::{ EighInto, UPLO };
use num_complex::Complex64 as C64;
use crate::{
    basis::{
        basis_vector, embed_at, identity, outer_prod, projector,
        Basis, Coord,
    },
    config::{ AtomDefaults, SimConfig },
    error::{ RegisterError, RegisterResult },
    evolve::{ evolve, DrivenTerm, Envelope, Evolution, Hamiltonian },
};

/// Initial condition of a single model.
#[derive(Clone, Debug, PartialEq)]
pub enum ModelState {
    /// A single eigenbasis level.
    Level(usize),
    /// An arbitrary pure state.
    Vector(nd::Array1<C64>),
    /// An arbitrary mixed state.
    Density(nd::Array2<C64>),
}

/// A coherent coupling between two levels with Rabi frequency `rabi` and a
/// time envelope.
#[derive(Clone)]
pub struct CouplingTerm<'a> {
    pub levels: (usize, usize),
    pub rabi: f64,
    pub envelope: Envelope<'a>,
}

impl<'a> fmt::Debug for CouplingTerm<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CouplingTerm {{ levels: {:?}, rabi: {:?}, envelope: Rc<...> }}",
            self.levels, self.rabi,
        )
    }
}

/// An energy shift on the projector `|i⟩⟨j|` with a time envelope.
///
/// For the usual diagonal detuning, `levels.0 == levels.1`.
#[derive(Clone)]
pub struct DetuningTerm<'a> {
    pub levels: (usize, usize),
    pub shift: f64,
    pub envelope: Envelope<'a>,
}

impl<'a> fmt::Debug for DetuningTerm<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DetuningTerm {{ levels: {:?}, shift: {:?}, envelope: Rc<...> }}",
            self.levels, self.shift,
        )
    }
}

/// An incoherent decay channel `|i⟩⟨j|` (population moves `j → i`) at a
/// fixed rate.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct DissipatorTerm {
    pub levels: (usize, usize),
    pub rate: f64,
}

/// A homogeneous collection of identical atoms sharing one set of term
/// lists, for on-site blockade physics.
#[derive(Clone, Debug, PartialEq)]
pub struct Ensemble {
    /// Number of member atoms.
    pub atoms: usize,
    /// Spatial position of each member.
    pub positions: Vec<Coord>,
}

/// Choice between the time-independent and time-dependent Hamiltonian
/// representations at simulation time.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Mode {
    /// Use the static Hamiltonian from `build_hamiltonian`.
    Free,
    /// Use the driven term list from `build_t_hamiltonian`.
    Control,
}

/// Choice of state representation at simulation time.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Repr {
    /// Unitary evolution; built Lindbladians are ignored.
    StateVector,
    /// Full master-equation evolution.
    DensityMatrix,
}

/// Output of a single simulation run, retained in the model's history.
#[derive(Clone, Debug)]
pub struct SimResult {
    pub timestamp: SystemTime,
    /// One trajectory per observable, sampled on the shared time grid.
    pub expect: Vec<nd::Array1<f64>>,
    /// Full density-matrix trajectory, when requested.
    pub states: Option<Vec<nd::Array2<C64>>>,
}

/// A single atomic model: level structure, term lists, built operators, and
/// simulation history.
#[derive(Clone, Debug)]
pub struct AtomicModel<'a> {
    pub name: String,
    nrlevels: usize,
    basis: Basis,
    times: nd::Array1<f64>,
    state: ModelState,
    couplings: Vec<CouplingTerm<'a>>,
    detunings: Vec<DetuningTerm<'a>>,
    dissipators: Vec<DissipatorTerm>,
    ensemble: Option<Ensemble>,
    config: SimConfig,
    hamiltonian: Option<nd::Array2<C64>>,
    t_hamiltonian: Option<Vec<DrivenTerm<'a>>>,
    lindbladians: Option<Vec<nd::Array2<C64>>>,
    observables: Option<Vec<nd::Array2<C64>>>,
    onsite: Option<nd::Array2<C64>>,
    pub history: Vec<SimResult>,
}

impl<'a> AtomicModel<'a> {
    /// Create a new model with no terms and no built operators.
    ///
    /// `rydberg` names the local levels carrying long-range interactions,
    /// with their orbital angular momentum quantum numbers. Fails with
    /// [`RegisterError::InvalidLevelIndex`] if any named level or the
    /// initial state is out of range, and with
    /// [`RegisterError::DimensionMismatch`] if an explicit initial state has
    /// the wrong size.
    pub fn new(
        name: &str,
        nrlevels: usize,
        rydberg: &[(usize, u32)],
        state: ModelState,
        times: nd::Array1<f64>,
        config: SimConfig,
    ) -> RegisterResult<Self>
    {
        let basis = Basis::nlvl(nrlevels, rydberg)?;
        match &state {
            ModelState::Level(index) => {
                if *index >= nrlevels {
                    return Err(RegisterError::InvalidLevelIndex {
                        index: *index, nrlevels });
                }
            },
            ModelState::Vector(psi) => {
                if psi.len() != nrlevels {
                    return Err(RegisterError::DimensionMismatch {
                        expected: nrlevels, found: psi.len() });
                }
            },
            ModelState::Density(rho) => {
                if !rho.is_square() || rho.shape()[0] != nrlevels {
                    return Err(RegisterError::DimensionMismatch {
                        expected: nrlevels, found: rho.shape()[0] });
                }
            },
        }
        Ok(Self {
            name: name.to_string(),
            nrlevels,
            basis,
            times,
            state,
            couplings: Vec::new(),
            detunings: Vec::new(),
            dissipators: Vec::new(),
            ensemble: None,
            config,
            hamiltonian: None,
            t_hamiltonian: None,
            lindbladians: None,
            observables: None,
            onsite: None,
            history: Vec::new(),
        })
    }

    /// Create a new model from atomic-structure defaults.
    pub fn from_defaults(
        name: &str,
        defaults: &AtomDefaults,
        state: ModelState,
        times: nd::Array1<f64>,
        config: SimConfig,
    ) -> RegisterResult<Self>
    {
        Self::new(
            name,
            defaults.nrlevels,
            &defaults.rydberg_levels,
            state,
            times,
            config,
        )
    }

    /// Number of internal levels of a single atom.
    pub fn nrlevels(&self) -> usize { self.nrlevels }

    /// Level basis of a single atom.
    pub fn basis(&self) -> &Basis { &self.basis }

    /// Shared time grid.
    pub fn times(&self) -> &nd::Array1<f64> { &self.times }

    /// Initial condition.
    pub fn state(&self) -> &ModelState { &self.state }

    /// Integrator configuration.
    pub fn config(&self) -> &SimConfig { &self.config }

    /// Local Rydberg levels with their `l` values.
    pub fn rydberg_levels(&self) -> Vec<(usize, u32)> {
        self.basis.rydberg_levels().collect()
    }

    /// Full Hilbert dimension, accounting for ensemble members.
    pub fn dim(&self) -> usize {
        match &self.ensemble {
            Some(ens) => self.nrlevels.pow(ens.atoms as u32),
            None => self.nrlevels,
        }
    }

    /// Add a coherent coupling term.
    pub fn add_coupling(
        &mut self,
        levels: (usize, usize),
        rabi: f64,
        envelope: Envelope<'a>,
    ) {
        self.couplings.push(CouplingTerm { levels, rabi, envelope });
    }

    /// Add a detuning term.
    pub fn add_detuning(
        &mut self,
        levels: (usize, usize),
        shift: f64,
        envelope: Envelope<'a>,
    ) {
        self.detunings.push(DetuningTerm { levels, shift, envelope });
    }

    /// Add a decay channel.
    pub fn add_dissipator(&mut self, levels: (usize, usize), rate: f64) {
        self.dissipators.push(DissipatorTerm { levels, rate });
    }

    /// Promote the model to a homogeneous ensemble of `positions.len()`
    /// members.
    ///
    /// All previously built operators are invalidated.
    pub fn make_ensemble(&mut self, positions: Vec<Coord>) {
        self.ensemble
            = Some(Ensemble { atoms: positions.len(), positions });
        self.hamiltonian = None;
        self.t_hamiltonian = None;
        self.lindbladians = None;
        self.observables = None;
        self.onsite = None;
    }

    /// Add static shifts to the detuning scales, one per term in order.
    ///
    /// Built Hamiltonians are invalidated and must be rebuilt. Fails with
    /// [`RegisterError::DimensionMismatch`] if the shift count disagrees
    /// with the number of detuning terms.
    pub fn shift_detunings(&mut self, shifts: &[f64]) -> RegisterResult<()> {
        if shifts.len() != self.detunings.len() {
            return Err(RegisterError::DimensionMismatch {
                expected: self.detunings.len(), found: shifts.len() });
        }
        self.detunings.iter_mut().zip(shifts.iter())
            .for_each(|(term, shift)| { term.shift += shift; });
        self.hamiltonian = None;
        self.t_hamiltonian = None;
        Ok(())
    }

    // every level index named by any term must be in range; checked before
    // any matrix is allocated
    fn check_levels(&self) -> RegisterResult<()> {
        let n = self.nrlevels;
        let named
            = self.couplings.iter().map(|term| term.levels)
            .chain(self.detunings.iter().map(|term| term.levels))
            .chain(self.dissipators.iter().map(|term| term.levels));
        for (i, j) in named {
            if i >= n {
                return Err(RegisterError::InvalidLevelIndex {
                    index: i, nrlevels: n });
            }
            if j >= n {
                return Err(RegisterError::InvalidLevelIndex {
                    index: j, nrlevels: n });
            }
        }
        Ok(())
    }

    // embed a single-atom operator at every ensemble slot and sum; identity
    // if the model is not an ensemble
    fn embed_members(&self, op: &nd::Array2<C64>)
        -> RegisterResult<nd::Array2<C64>>
    {
        match &self.ensemble {
            None => Ok(op.clone()),
            Some(ens) => {
                let dims: Vec<usize> = vec![self.nrlevels; ens.atoms];
                let mut acc: nd::Array2<C64>
                    = nd::Array2::zeros((self.dim(), self.dim()));
                for slot in 0..ens.atoms {
                    acc = acc + embed_at(&dims, slot, op)?;
                }
                Ok(acc)
            },
        }
    }

    /// Build the time-independent Hamiltonian.
    ///
    /// `H = 0.5 (HD + HoffD)` with `HD = Σ_k Ω_k (|i_k⟩⟨j_k| + |j_k⟩⟨i_k|)`
    /// over couplings and `HoffD = Σ_k δ_k |i_k⟩⟨j_k|` over detunings.
    /// Ensembles embed the single-atom operator once per member and add the
    /// on-site interaction if built.
    pub fn build_hamiltonian(&mut self) -> RegisterResult<()> {
        self.check_levels()?;
        let n = self.nrlevels;
        let mut HD: nd::Array2<C64> = nd::Array2::zeros((n, n));
        for term in self.couplings.iter() {
            let (i, j) = term.levels;
            HD = HD + (projector(n, i, j) + projector(n, j, i)) * term.rabi;
        }
        let mut HoffD: nd::Array2<C64> = nd::Array2::zeros((n, n));
        for term in self.detunings.iter() {
            let (i, j) = term.levels;
            HoffD = HoffD + projector(n, i, j) * term.shift;
        }
        let single = (HD + HoffD) * 0.5;
        let mut H = self.embed_members(&single)?;
        if let Some(vint) = &self.onsite { H = H + vint; }
        self.hamiltonian = Some(H);
        Ok(())
    }

    /// Build the time-dependent Hamiltonian as an ordered list of
    /// `(operator, envelope)` terms.
    ///
    /// Each coupling contributes a ladder term with its envelope and the
    /// adjoint ladder with the conjugated envelope; each detuning
    /// contributes its projector with its envelope. The on-site interaction,
    /// if built, leads the list as an always-on term.
    pub fn build_t_hamiltonian(&mut self) -> RegisterResult<()> {
        self.check_levels()?;
        let n = self.nrlevels;
        let mut terms: Vec<DrivenTerm<'a>> = Vec::new();
        if let Some(vint) = &self.onsite {
            terms.push(DrivenTerm::always_on(vint.clone()));
        }
        for term in self.couplings.iter() {
            let (i, j) = term.levels;
            let ladder = projector(n, i, j) * (0.5 * term.rabi);
            let ladder_dag = projector(n, j, i) * (0.5 * term.rabi);
            let f = Rc::clone(&term.envelope);
            let f_conj = Rc::clone(&term.envelope);
            terms.push(DrivenTerm {
                op: self.embed_members(&ladder)?,
                envelope: f,
            });
            terms.push(DrivenTerm {
                op: self.embed_members(&ladder_dag)?,
                envelope: Rc::new(move |t| (f_conj)(t).conj()),
            });
        }
        for term in self.detunings.iter() {
            let (i, j) = term.levels;
            let proj = projector(n, i, j) * (0.5 * term.shift);
            terms.push(DrivenTerm {
                op: self.embed_members(&proj)?,
                envelope: Rc::clone(&term.envelope),
            });
        }
        self.t_hamiltonian = Some(terms);
        Ok(())
    }

    /// Build the Lindblad jump operators, `sqrt(rate) |i⟩⟨j|` per decay
    /// channel.
    ///
    /// Ensembles embed each channel at every member slot individually; the
    /// built list then holds one operator per channel per member.
    pub fn build_lindbladians(&mut self) -> RegisterResult<()> {
        self.check_levels()?;
        let n = self.nrlevels;
        let mut lops: Vec<nd::Array2<C64>> = Vec::new();
        for term in self.dissipators.iter() {
            let (i, j) = term.levels;
            let l = projector(n, i, j) * term.rate.sqrt();
            match &self.ensemble {
                None => { lops.push(l); },
                Some(ens) => {
                    let dims: Vec<usize> = vec![n; ens.atoms];
                    for slot in 0..ens.atoms {
                        lops.push(embed_at(&dims, slot, &l)?);
                    }
                },
            }
        }
        self.lindbladians = Some(lops);
        Ok(())
    }

    /// Build the measured observables.
    ///
    /// `None` selects the default set: one diagonal projector per (joint)
    /// basis state. An explicit list may be empty; every member must match
    /// the full dimension.
    pub fn build_observables(
        &mut self,
        observables: Option<Vec<nd::Array2<C64>>>,
    ) -> RegisterResult<()>
    {
        let dim = self.dim();
        let obs = match observables {
            None => (0..dim).map(|k| projector(dim, k, k)).collect(),
            Some(obs) => {
                for op in obs.iter() {
                    if !op.is_square() || op.shape()[0] != dim {
                        return Err(RegisterError::DimensionMismatch {
                            expected: dim, found: op.shape()[0] });
                    }
                }
                obs
            },
        };
        self.observables = Some(obs);
        Ok(())
    }

    /// Build the intra-ensemble blockade operator
    /// `Σ_{i<j} c6 / d_ij^6 · P_rr^(i) P_rr^(j)`, with `rr` the topmost
    /// level.
    ///
    /// Stored as an always-on Hamiltonian addition picked up by the next
    /// `build_hamiltonian` or `build_t_hamiltonian` call. Fails with
    /// [`RegisterError::UnsupportedInteractionTopology`] if the model is not
    /// an ensemble or two members coincide in space.
    pub fn build_onsite_interaction(&mut self, c6: f64) -> RegisterResult<()> {
        let ens
            = self.ensemble.as_ref()
            .ok_or_else(|| RegisterError::UnsupportedInteractionTopology(
                "on-site interaction requires an ensemble".to_string()))?;
        let n = self.nrlevels;
        let rr = n - 1;
        let dims: Vec<usize> = vec![n; ens.atoms];
        let dim = self.dim();
        let p_rr = projector(n, rr, rr);
        let mut vint: nd::Array2<C64> = nd::Array2::zeros((dim, dim));
        for i in 0..ens.atoms {
            for j in i + 1..ens.atoms {
                let d = ens.positions[i].dist(&ens.positions[j]);
                if d <= f64::EPSILON {
                    return Err(
                        RegisterError::UnsupportedInteractionTopology(
                            format!(
                                "ensemble members {} and {} coincide \
                                in space",
                                i, j,
                            )
                        )
                    );
                }
                let pi = embed_at(&dims, i, &p_rr)?;
                let pj = embed_at(&dims, j, &p_rr)?;
                vint = vint + pi.dot(&pj) * (c6 / d.powi(6));
            }
        }
        self.onsite = Some(vint);
        Ok(())
    }

    /// Built static Hamiltonian, if any.
    pub fn hamiltonian(&self) -> Option<&nd::Array2<C64>> {
        self.hamiltonian.as_ref()
    }

    /// Built driven term list, if any.
    pub fn t_hamiltonian(&self) -> Option<&Vec<DrivenTerm<'a>>> {
        self.t_hamiltonian.as_ref()
    }

    /// Built Lindblad operators, if any.
    pub fn lindbladians(&self) -> Option<&Vec<nd::Array2<C64>>> {
        self.lindbladians.as_ref()
    }

    /// Built observables, if any.
    pub fn observables(&self) -> Option<&Vec<nd::Array2<C64>>> {
        self.observables.as_ref()
    }

    /// The initial condition as a density matrix over the full dimension.
    ///
    /// Ensembles take every member in the same single-atom state.
    pub fn initial_density(&self) -> RegisterResult<nd::Array2<C64>> {
        let n = self.nrlevels;
        let single: nd::Array2<C64> = match &self.state {
            ModelState::Level(index) => {
                let ket = basis_vector(n, *index);
                outer_prod(&ket, &ket)
            },
            ModelState::Vector(psi) => outer_prod(psi, psi),
            ModelState::Density(rho) => rho.clone(),
        };
        match &self.ensemble {
            None => Ok(single),
            Some(ens) => {
                let mut acc: nd::Array2<C64> = identity(1);
                for _ in 0..ens.atoms {
                    acc = nd::linalg::kron(&acc, &single);
                }
                Ok(acc)
            },
        }
    }

    /// Diagonalize the built static Hamiltonian.
    ///
    /// Returns `None` if `build_hamiltonian` has not been called.
    pub fn diagonalize(&self) -> Option<(nd::Array1<f64>, nd::Array2<C64>)> {
        match self.hamiltonian.as_ref()?.clone().eigh_into(UPLO::Lower) {
            Ok((E, V)) => Some((E, V)),
            Err(err) => panic!("unexpected diagonalization error: {}", err),
        }
    }

    /// Diagonalize the built static Hamiltonian and return a ground state.
    ///
    /// In general more than one state may minimize the energy; no guarantee
    /// is made about which is returned.
    pub fn ground_state(&self) -> Option<(f64, nd::Array1<C64>)> {
        let (E, V) = self.diagonalize()?;
        let e: f64 = E[0];
        let v: nd::Array1<C64> = V.slice(s![.., 0]).to_owned();
        Some((e, v))
    }

    /// Integrate the master equation over the shared time grid and append
    /// the result to the history.
    ///
    /// Fails with [`RegisterError::NotBuilt`] if the Hamiltonian selected by
    /// `mode` is absent. Unbuilt observables fall back to the default
    /// diagonal projectors; unbuilt Lindbladians to none.
    /// [`Repr::StateVector`] ignores built Lindbladians.
    pub fn simulate(&mut self, mode: Mode, repr: Repr)
        -> RegisterResult<&SimResult>
    {
        let H: Hamiltonian = match mode {
            Mode::Free => {
                let h = self.hamiltonian.as_ref()
                    .ok_or(RegisterError::NotBuilt("hamiltonian"))?;
                Hamiltonian::Static(h.clone())
            },
            Mode::Control => {
                let terms = self.t_hamiltonian.as_ref()
                    .ok_or(RegisterError::NotBuilt("t_hamiltonian"))?;
                Hamiltonian::Driven(terms.clone())
            },
        };
        let lindblads: Vec<nd::Array2<C64>> = match repr {
            Repr::StateVector => Vec::new(),
            Repr::DensityMatrix
                => self.lindbladians.clone().unwrap_or_default(),
        };
        let dim = self.dim();
        let observables: Vec<nd::Array2<C64>>
            = self.observables.clone()
            .unwrap_or_else(|| {
                (0..dim).map(|k| projector(dim, k, k)).collect()
            });
        let rho0 = self.initial_density()?;
        let Evolution { expect, states } = evolve(
            &rho0, &H, &lindblads, &observables, &self.times, &self.config,
        )?;
        self.history.push(SimResult {
            timestamp: SystemTime::now(),
            expect,
            states,
        });
        Ok(self.history.last().unwrap())
    }
}
