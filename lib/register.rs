//! A register of atomic models arranged in space, with pairwise Rydberg
//! interactions.
//!
//! The register aggregates the operators built by its member models into the
//! joint Hilbert space by identity-padded embedding, with atom 0 as the
//! outermost tensor factor throughout. Connectivity is declared over
//! *global* Rydberg state indices: each atom's local level indices offset by
//! the cumulative dimension of all preceding atoms.

use std::time::SystemTime;
use itertools::Itertools;
use ndarray::{ self as nd };
use num_complex::Complex64 as C64;
use rustc_hash::FxHashSet as HashSet;
use crate::{
    basis::{ basis_vector, embed_at, outer_prod, projector, Coord },
    config::{ AtomDefaults, SimConfig },
    error::{ RegisterError, RegisterResult },
    evolve::{ evolve, DrivenTerm, Evolution, Hamiltonian },
    interaction::RydbergInteractionBuilder,
    model::{ AtomicModel, Mode, ModelState, Repr, SimResult },
};

/// Interaction connectivity, declared over global Rydberg state indices.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Connectivity {
    /// Every pair of distinct global Rydberg states interacts.
    All,
    /// Only the given edges, taken as-is.
    Directed(Vec<(usize, usize)>),
    /// The given edges plus their reverses.
    Bidirected(Vec<(usize, usize)>),
}

/// Initial condition of the register.
#[derive(Clone, Debug, PartialEq)]
pub enum RegisterInit {
    /// Tensor product of the member models' own initial states, in atom
    /// order.
    FromModels,
    /// A single joint basis state by its index in the full space.
    JointIndex(usize),
    /// A single joint basis state as a digit string, one digit per atom,
    /// atom 0 first.
    Digits(String),
}

/// An ordered register of atomic models with spatial layout and Rydberg
/// connectivity.
#[derive(Clone, Debug)]
pub struct AtomicQRegister<'a> {
    pub name: String,
    models: Vec<AtomicModel<'a>>,
    layout: Vec<Coord>,
    connectivity: Connectivity,
    init: RegisterInit,
    times: nd::Array1<f64>,
    config: SimConfig,
    initial_state: Option<nd::Array2<C64>>,
    hamiltonian: Option<nd::Array2<C64>>,
    t_hamiltonian: Option<Vec<DrivenTerm<'a>>>,
    lindbladians: Option<Vec<nd::Array2<C64>>>,
    observables: Option<Vec<nd::Array2<C64>>>,
    vint: Option<nd::Array2<C64>>,
    pub history: Vec<SimResult>,
}

impl<'a> AtomicQRegister<'a> {
    /// Create a new register with no built operators.
    ///
    /// Fails with [`RegisterError::DimensionMismatch`] if the layout length
    /// disagrees with the number of models.
    pub fn new(
        name: &str,
        models: Vec<AtomicModel<'a>>,
        layout: Vec<Coord>,
        connectivity: Connectivity,
        init: RegisterInit,
        times: nd::Array1<f64>,
        config: SimConfig,
    ) -> RegisterResult<Self>
    {
        if layout.len() != models.len() {
            return Err(RegisterError::DimensionMismatch {
                expected: models.len(), found: layout.len() });
        }
        Ok(Self {
            name: name.to_string(),
            models,
            layout,
            connectivity,
            init,
            times,
            config,
            initial_state: None,
            hamiltonian: None,
            t_hamiltonian: None,
            lindbladians: None,
            observables: None,
            vint: None,
            history: Vec::new(),
        })
    }

    /// Create a homogeneous register from atomic-structure defaults, one
    /// identical model per layout coordinate.
    pub fn uniform(
        name: &str,
        defaults: &AtomDefaults,
        state: ModelState,
        connectivity: Connectivity,
        init: RegisterInit,
        times: nd::Array1<f64>,
        config: SimConfig,
    ) -> RegisterResult<Self>
    {
        let models: Vec<AtomicModel<'a>>
            = (0..defaults.layout.len())
            .map(|k| {
                AtomicModel::from_defaults(
                    &format!("{}[{}]", name, k),
                    defaults,
                    state.clone(),
                    times.clone(),
                    config,
                )
            })
            .collect::<RegisterResult<_>>()?;
        Self::new(
            name,
            models,
            defaults.layout.clone(),
            connectivity,
            init,
            times,
            config,
        )
    }

    /// Number of atoms.
    pub fn natoms(&self) -> usize { self.models.len() }

    /// Member models, in atom order.
    pub fn models(&self) -> &[AtomicModel<'a>] { &self.models }

    /// Mutable access to the member models, e.g. for building their
    /// operators in place.
    pub fn models_mut(&mut self) -> &mut [AtomicModel<'a>] {
        &mut self.models
    }

    /// Spatial layout, one coordinate per atom.
    pub fn layout(&self) -> &[Coord] { &self.layout }

    /// Shared time grid.
    pub fn times(&self) -> &nd::Array1<f64> { &self.times }

    /// Per-atom Hilbert dimensions.
    pub fn dims(&self) -> Vec<usize> {
        self.models.iter().map(|model| model.dim()).collect()
    }

    /// Full register dimension, the product of all per-atom dimensions.
    pub fn dim(&self) -> usize {
        self.models.iter().map(|model| model.dim()).product()
    }

    // cumulative dimension preceding each atom; the offset of its global
    // state indices
    fn offsets(&self) -> Vec<usize> {
        let mut acc: usize = 0;
        self.models.iter()
            .map(|model| {
                let offset = acc;
                acc += model.dim();
                offset
            })
            .collect()
    }

    /// Global Rydberg state indices of all atoms, in atom order.
    pub fn rydberg_globals(&self) -> Vec<usize> {
        let offsets = self.offsets();
        self.models.iter().zip(offsets)
            .flat_map(|(model, offset)| {
                model.rydberg_levels().into_iter()
                    .map(move |(index, _)| offset + index)
            })
            .collect()
    }

    /// Resolve the declared connectivity into state-level edges over global
    /// Rydberg state indices.
    pub fn resolve_state_edges(&self) -> Vec<(usize, usize)> {
        match &self.connectivity {
            Connectivity::All => {
                let globals = self.rydberg_globals();
                globals.iter().enumerate()
                    .cartesian_product(globals.iter().enumerate())
                    .filter(|((i, _), (j, _))| i < j)
                    .map(|((_, ga), (_, gb))| (*ga, *gb))
                    .collect()
            },
            Connectivity::Directed(edges) => edges.clone(),
            Connectivity::Bidirected(edges) => {
                edges.iter()
                    .flat_map(|&(a, b)| [(a, b), (b, a)])
                    .collect()
            },
        }
    }

    /// Resolve the declared connectivity into a deduplicated atom-level
    /// topology graph, with self-loops dropped.
    ///
    /// Fails with [`RegisterError::UnsupportedInteractionTopology`] if an
    /// edge endpoint falls outside the global state index space.
    pub fn resolve_connectivity(&self)
        -> RegisterResult<Vec<(usize, usize)>>
    {
        let dims = self.dims();
        let offsets = self.offsets();
        let total: usize = dims.iter().sum();
        let locate = |global: usize| -> RegisterResult<usize> {
            if global >= total {
                return Err(RegisterError::UnsupportedInteractionTopology(
                    format!("global state index {} out of range", global)));
            }
            Ok(
                offsets.iter()
                    .rposition(|offset| *offset <= global)
                    .unwrap()
            )
        };
        let mut visited: HashSet<(usize, usize)> = HashSet::default();
        let mut graph: Vec<(usize, usize)> = Vec::new();
        for (ga, gb) in self.resolve_state_edges() {
            let atom_a = locate(ga)?;
            let atom_b = locate(gb)?;
            if atom_a == atom_b { continue; }
            let key
                = (atom_a.min(atom_b), atom_a.max(atom_b));
            if visited.insert(key) { graph.push(key); }
        }
        Ok(graph)
    }

    // decode the initial condition into a joint density matrix
    fn initial_density(&self) -> RegisterResult<nd::Array2<C64>> {
        let dims = self.dims();
        let dim = self.dim();
        match &self.init {
            RegisterInit::FromModels => {
                let mut acc: nd::Array2<C64> = nd::Array2::eye(1);
                for model in self.models.iter() {
                    acc = nd::linalg::kron(&acc, &model.initial_density()?);
                }
                Ok(acc)
            },
            RegisterInit::JointIndex(index) => {
                if *index >= dim {
                    return Err(RegisterError::InvalidLevelIndex {
                        index: *index, nrlevels: dim });
                }
                let ket = basis_vector(dim, *index);
                Ok(outer_prod(&ket, &ket))
            },
            RegisterInit::Digits(digits) => {
                if digits.len() != dims.len() {
                    return Err(RegisterError::DimensionMismatch {
                        expected: dims.len(), found: digits.len() });
                }
                let mut index: usize = 0;
                for (ch, &d) in digits.chars().zip(dims.iter()) {
                    let k
                        = ch.to_digit(10)
                        .map(|k| k as usize)
                        .ok_or(RegisterError::InvalidLevelIndex {
                            index: ch as usize, nrlevels: d })?;
                    if k >= d {
                        return Err(RegisterError::InvalidLevelIndex {
                            index: k, nrlevels: d });
                    }
                    index = index * d + k;
                }
                let ket = basis_vector(dim, index);
                Ok(outer_prod(&ket, &ket))
            },
        }
    }

    /// Build the joint initial state as a density matrix.
    pub fn build_initial_state(&mut self) -> RegisterResult<()> {
        self.initial_state = Some(self.initial_density()?);
        Ok(())
    }

    /// Build the register's static Hamiltonian, the sum over atoms of the
    /// identity-padded embedding of each member's built Hamiltonian, plus
    /// the interaction operator if added.
    ///
    /// Fails with [`RegisterError::NotBuilt`] if any member has not built
    /// its static Hamiltonian.
    pub fn build_hamiltonian(&mut self) -> RegisterResult<()> {
        let dims = self.dims();
        let dim = self.dim();
        let mut H: nd::Array2<C64> = nd::Array2::zeros((dim, dim));
        for (slot, model) in self.models.iter().enumerate() {
            let h = model.hamiltonian()
                .ok_or(RegisterError::NotBuilt("member hamiltonian"))?;
            H = H + embed_at(&dims, slot, h)?;
        }
        if let Some(vint) = &self.vint { H = H + vint; }
        self.hamiltonian = Some(H);
        Ok(())
    }

    /// Build the register's driven term list by embedding every member's
    /// `(operator, envelope)` pair into the joint space.
    ///
    /// The interaction operator, if added, leads the list as an always-on
    /// term. Fails with [`RegisterError::NotBuilt`] if any member has not
    /// built its driven terms.
    pub fn build_t_hamiltonian(&mut self) -> RegisterResult<()> {
        let dims = self.dims();
        let mut terms: Vec<DrivenTerm<'a>> = Vec::new();
        if let Some(vint) = &self.vint {
            terms.push(DrivenTerm::always_on(vint.clone()));
        }
        for (slot, model) in self.models.iter().enumerate() {
            let member_terms = model.t_hamiltonian()
                .ok_or(RegisterError::NotBuilt("member t_hamiltonian"))?;
            for term in member_terms.iter() {
                terms.push(DrivenTerm {
                    op: embed_at(&dims, slot, &term.op)?,
                    envelope: term.envelope.clone(),
                });
            }
        }
        self.t_hamiltonian = Some(terms);
        Ok(())
    }

    /// Build the register's Lindblad operators by individually embedding
    /// every member's jump operators into the joint space.
    ///
    /// Members that never built Lindbladians contribute none.
    pub fn build_lindbladians(&mut self) -> RegisterResult<()> {
        let dims = self.dims();
        let mut lops: Vec<nd::Array2<C64>> = Vec::new();
        for (slot, model) in self.models.iter().enumerate() {
            let Some(member_lops) = model.lindbladians() else { continue };
            for l in member_lops.iter() {
                lops.push(embed_at(&dims, slot, l)?);
            }
        }
        self.lindbladians = Some(lops);
        Ok(())
    }

    /// Digit-string labels of the joint basis, one digit per atom, atom 0
    /// first, in joint index order.
    pub fn basis_labels(&self) -> Vec<String> {
        self.dims().iter()
            .map(|&d| 0..d)
            .multi_cartesian_product()
            .map(|digits| {
                digits.iter().map(|k| k.to_string()).collect::<String>()
            })
            .collect()
    }

    /// Build the measured observables.
    ///
    /// `None` selects the default set: one diagonal projector per joint
    /// basis state, ordered as [`Self::basis_labels`]. An explicit list may
    /// be empty; every member must match the full dimension.
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

    /// Resolve the connectivity and build the pairwise interaction operator
    /// with the given constants, folding it into already-built Hamiltonians.
    ///
    /// If the driven term list is built, the operator is inserted at its
    /// head as an always-on term; if the static Hamiltonian is built, the
    /// operator is added to it directly. Subsequent `build_hamiltonian` or
    /// `build_t_hamiltonian` calls pick the operator up automatically, so
    /// this should be called once per register.
    pub fn add_interactions(&mut self, c6: f64, c3: f64)
        -> RegisterResult<()>
    {
        let rydberg: Vec<Vec<(usize, u32)>>
            = self.models.iter()
            .map(|model| model.rydberg_levels())
            .collect();
        let builder = RydbergInteractionBuilder::new(
            self.dims(),
            rydberg,
            self.layout.clone(),
            self.resolve_state_edges(),
        )?;
        let vint = builder.build(c6, c3)?;
        if let Some(terms) = self.t_hamiltonian.as_mut() {
            terms.insert(0, DrivenTerm::always_on(vint.clone()));
        }
        if let Some(h) = self.hamiltonian.as_mut() {
            *h = &*h + &vint;
        }
        self.vint = Some(vint);
        Ok(())
    }

    /// Built interaction operator, if any.
    pub fn interaction(&self) -> Option<&nd::Array2<C64>> {
        self.vint.as_ref()
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

    /// Integrate the joint master equation over the shared time grid and
    /// append the result to the history.
    ///
    /// Fails with [`RegisterError::NotBuilt`] if the Hamiltonian selected
    /// by `mode` is absent. An unbuilt initial state is derived on the fly;
    /// unbuilt observables fall back to the default diagonal projectors;
    /// unbuilt Lindbladians to none. [`Repr::StateVector`] ignores built
    /// Lindbladians.
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
        let rho0 = match &self.initial_state {
            Some(rho0) => rho0.clone(),
            None => self.initial_density()?,
        };
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;
    use crate::{
        evolve::Envelope,
        model::ModelState,
    };

    fn grid() -> nd::Array1<f64> {
        nd::Array1::linspace(0.0, 1.0, 11)
    }

    fn config() -> SimConfig {
        SimConfig::new(200_000, 1e-8, 1e-2)
    }

    fn unit_envelope<'a>() -> Envelope<'a> {
        Rc::new(|_| C64::new(1.0, 0.0))
    }

    fn qubit<'a>(name: &str) -> AtomicModel<'a> {
        AtomicModel::new(
            name, 2, &[(1, 0)], ModelState::Level(0), grid(), config(),
        )
        .unwrap()
    }

    fn two_qubit_register<'a>(
        connectivity: Connectivity,
        init: RegisterInit,
    ) -> AtomicQRegister<'a>
    {
        AtomicQRegister::new(
            "pair",
            vec![qubit("a"), qubit("b")],
            vec![Coord::xy(0.0, 0.0), Coord::xy(2.0, 0.0)],
            connectivity,
            init,
            grid(),
            config(),
        )
        .unwrap()
    }

    #[test]
    fn dim_is_product_of_member_dims() {
        let models = vec![
            qubit("a"),
            AtomicModel::new(
                "b", 3, &[(2, 0)], ModelState::Level(0), grid(), config(),
            ).unwrap(),
        ];
        let reg = AtomicQRegister::new(
            "mixed",
            models,
            vec![Coord::xy(0.0, 0.0), Coord::xy(1.0, 0.0)],
            Connectivity::All,
            RegisterInit::FromModels,
            grid(),
            config(),
        ).unwrap();
        assert_eq!(reg.dims(), vec![2, 3]);
        assert_eq!(reg.dim(), 6);
        assert_eq!(reg.rydberg_globals(), vec![1, 4]);
    }

    #[test]
    fn all_connectivity_pairs_global_rydberg_states() {
        let reg = two_qubit_register(
            Connectivity::All, RegisterInit::FromModels,
        );
        assert_eq!(reg.resolve_state_edges(), vec![(1, 3)]);
        assert_eq!(reg.resolve_connectivity().unwrap(), vec![(0, 1)]);
    }

    #[test]
    fn bidirected_edges_collapse_to_one_atom_pair() {
        let reg = two_qubit_register(
            Connectivity::Bidirected(vec![(1, 3)]),
            RegisterInit::FromModels,
        );
        assert_eq!(reg.resolve_state_edges(), vec![(1, 3), (3, 1)]);
        assert_eq!(reg.resolve_connectivity().unwrap(), vec![(0, 1)]);
    }

    #[test]
    fn joint_index_and_digits_agree() {
        let mut reg_index = two_qubit_register(
            Connectivity::All, RegisterInit::JointIndex(2),
        );
        let mut reg_digits = two_qubit_register(
            Connectivity::All, RegisterInit::Digits("10".to_string()),
        );
        reg_index.build_initial_state().unwrap();
        reg_digits.build_initial_state().unwrap();
        assert_eq!(reg_index.initial_state, reg_digits.initial_state);
        let rho = reg_index.initial_state.unwrap();
        assert_eq!(rho[[2, 2]], C64::new(1.0, 0.0));
    }

    #[test]
    fn joint_index_overflow_is_rejected() {
        let mut reg = two_qubit_register(
            Connectivity::All, RegisterInit::JointIndex(4),
        );
        assert_eq!(
            reg.build_initial_state(),
            Err(RegisterError::InvalidLevelIndex { index: 4, nrlevels: 4 }),
        );
    }

    #[test]
    fn digit_overflow_is_rejected() {
        let mut reg = two_qubit_register(
            Connectivity::All, RegisterInit::Digits("20".to_string()),
        );
        assert_eq!(
            reg.build_initial_state(),
            Err(RegisterError::InvalidLevelIndex { index: 2, nrlevels: 2 }),
        );
    }

    #[test]
    fn basis_labels_enumerate_joint_states() {
        let models = vec![
            qubit("a"),
            AtomicModel::new(
                "b", 3, &[(2, 0)], ModelState::Level(0), grid(), config(),
            ).unwrap(),
        ];
        let reg = AtomicQRegister::new(
            "mixed",
            models,
            vec![Coord::xy(0.0, 0.0), Coord::xy(1.0, 0.0)],
            Connectivity::All,
            RegisterInit::FromModels,
            grid(),
            config(),
        ).unwrap();
        assert_eq!(
            reg.basis_labels(),
            vec!["00", "01", "02", "10", "11", "12"],
        );
    }

    #[test]
    fn register_hamiltonian_embeds_members() {
        let mut reg = two_qubit_register(
            Connectivity::All, RegisterInit::FromModels,
        );
        for model in reg.models_mut().iter_mut() {
            model.add_coupling((0, 1), 1.0, unit_envelope());
            model.build_hamiltonian().unwrap();
        }
        reg.build_hamiltonian().unwrap();
        let h = reg.hamiltonian().unwrap();
        assert_eq!(h.shape(), &[4, 4]);
        let h_dag: nd::Array2<C64> = h.t().mapv(|a| a.conj());
        assert_eq!(h, &h_dag);
        // ⟨00|H|01⟩ and ⟨00|H|10⟩ both carry the single-atom 0.5 Ω
        assert!((h[[0, 1]].re - 0.5).abs() < 1e-15);
        assert!((h[[0, 2]].re - 0.5).abs() < 1e-15);
        assert_eq!(h[[0, 3]], C64::new(0.0, 0.0));
    }

    #[test]
    fn interaction_leads_driven_term_list() {
        let mut reg = two_qubit_register(
            Connectivity::All, RegisterInit::FromModels,
        );
        for model in reg.models_mut().iter_mut() {
            model.add_coupling((0, 1), 1.0, unit_envelope());
            model.build_t_hamiltonian().unwrap();
        }
        reg.build_t_hamiltonian().unwrap();
        let before = reg.t_hamiltonian().unwrap().len();
        reg.add_interactions(64.0, 0.0).unwrap();
        let terms = reg.t_hamiltonian().unwrap();
        assert_eq!(terms.len(), before + 1);
        // leading term is the interaction, nonzero only at |rr⟩⟨rr|
        let vint = &terms[0].op;
        assert!((vint[[3, 3]].re - 1.0).abs() < 1e-15);
        assert_eq!(vint[[0, 0]], C64::new(0.0, 0.0));
    }

    #[test]
    fn interaction_adds_to_static_hamiltonian() {
        let mut reg = two_qubit_register(
            Connectivity::All, RegisterInit::FromModels,
        );
        for model in reg.models_mut().iter_mut() {
            model.build_hamiltonian().unwrap();
        }
        reg.build_hamiltonian().unwrap();
        reg.add_interactions(64.0, 0.0).unwrap();
        let h = reg.hamiltonian().unwrap();
        assert!((h[[3, 3]].re - 1.0).abs() < 1e-15);
    }

    #[test]
    fn uniform_register_follows_defaults() {
        let defaults = AtomDefaults::default();
        let reg = AtomicQRegister::uniform(
            "pair",
            &defaults,
            ModelState::Level(0),
            Connectivity::All,
            RegisterInit::FromModels,
            grid(),
            config(),
        ).unwrap();
        assert_eq!(reg.natoms(), defaults.layout.len());
        assert_eq!(reg.dim(), defaults.nrlevels.pow(2));
        assert_eq!(reg.rydberg_globals(), vec![1, 3]);
    }

    #[test]
    fn simulate_requires_built_hamiltonian() {
        let mut reg = two_qubit_register(
            Connectivity::All, RegisterInit::FromModels,
        );
        let res = reg.simulate(Mode::Free, Repr::DensityMatrix);
        assert!(matches!(res, Err(RegisterError::NotBuilt(_))));
    }
}
