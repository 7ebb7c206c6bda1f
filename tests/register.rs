//! End-to-end checks of model and register construction and evolution.

use std::rc::Rc;
use ndarray::{ self as nd };
use num_complex::Complex64 as C64;
use rydberg_register::{
    basis::{ embed_at, identity, projector, Coord },
    config::SimConfig,
    error::RegisterError,
    evolve::{ expect_value, Envelope },
    model::{ AtomicModel, Mode, ModelState, Repr },
    register::{ AtomicQRegister, Connectivity, RegisterInit },
};

fn config() -> SimConfig {
    SimConfig::new(200_000, 1e-8, 1e-2)
}

fn unit_envelope<'a>() -> Envelope<'a> {
    Rc::new(|_| C64::new(1.0, 0.0))
}

fn qubit<'a>(name: &str, times: nd::Array1<f64>) -> AtomicModel<'a> {
    AtomicModel::new(
        name, 2, &[(1, 0)], ModelState::Level(0), times, config(),
    )
    .unwrap()
}

#[test]
fn pi_pulse_inverts_a_qubit() {
    let W = 2.0;
    let times = nd::Array1::linspace(0.0, std::f64::consts::PI / W, 201);
    let mut atom = qubit("atom", times.clone());
    atom.add_coupling((0, 1), W, unit_envelope());
    atom.build_hamiltonian().unwrap();
    atom.build_observables(None).unwrap();
    let res = atom.simulate(Mode::Free, Repr::DensityMatrix).unwrap();
    let nt = times.len();
    assert!((res.expect[1][nt - 1] - 1.0).abs() < 1e-6);
    assert!(res.expect[0][nt - 1].abs() < 1e-6);
}

#[test]
fn free_and_control_modes_agree_for_constant_drive() {
    let W = 1.0;
    let times = nd::Array1::linspace(0.0, 2.0, 101);
    let mut atom = qubit("atom", times.clone());
    atom.add_coupling((0, 1), W, unit_envelope());
    atom.add_detuning((1, 1), 0.5, unit_envelope());
    atom.build_hamiltonian().unwrap();
    atom.build_t_hamiltonian().unwrap();
    atom.build_observables(None).unwrap();
    let free
        = atom.simulate(Mode::Free, Repr::DensityMatrix)
        .unwrap().expect.clone();
    let control
        = atom.simulate(Mode::Control, Repr::DensityMatrix)
        .unwrap().expect.clone();
    let nt = times.len();
    for k in 0..2 {
        for t in 0..nt {
            assert!((free[k][t] - control[k][t]).abs() < 1e-6);
        }
    }
}

#[test]
fn no_drive_population_is_conserved() {
    let times = nd::Array1::linspace(0.0, 3.0, 61);
    let mut atom = qubit("atom", times.clone());
    atom.build_hamiltonian().unwrap();
    atom.build_observables(None).unwrap();
    let res = atom.simulate(Mode::Free, Repr::DensityMatrix).unwrap();
    for t in 0..times.len() {
        let total = res.expect[0][t] + res.expect[1][t];
        assert!((total - 1.0).abs() < 1e-9);
        assert!((res.expect[0][t] - 1.0).abs() < 1e-9);
    }
}

#[test]
fn decay_drains_the_excited_state() {
    let y = 1.0;
    let times = nd::Array1::linspace(0.0, 4.0, 81);
    let mut atom = AtomicModel::new(
        "atom", 2, &[(1, 0)], ModelState::Level(1), times.clone(), config(),
    ).unwrap();
    atom.add_dissipator((0, 1), y);
    atom.build_hamiltonian().unwrap();
    atom.build_lindbladians().unwrap();
    atom.build_observables(None).unwrap();
    let res = atom.simulate(Mode::Free, Repr::DensityMatrix).unwrap();
    let nt = times.len();
    let expected = (-y * 4.0).exp();
    assert!((res.expect[1][nt - 1] - expected).abs() < 1e-4);
}

#[test]
fn state_vector_repr_ignores_dissipation() {
    let times = nd::Array1::linspace(0.0, 2.0, 41);
    let mut atom = AtomicModel::new(
        "atom", 2, &[(1, 0)], ModelState::Level(1), times.clone(), config(),
    ).unwrap();
    atom.add_dissipator((0, 1), 1.0);
    atom.build_hamiltonian().unwrap();
    atom.build_lindbladians().unwrap();
    atom.build_observables(None).unwrap();
    let res = atom.simulate(Mode::Free, Repr::StateVector).unwrap();
    let nt = times.len();
    assert!((res.expect[1][nt - 1] - 1.0).abs() < 1e-9);
}

#[test]
fn invalid_level_is_reported_before_any_operator_exists() {
    let times = nd::Array1::linspace(0.0, 1.0, 11);
    let mut atom = qubit("atom", times);
    atom.add_coupling((0, 5), 1.0, unit_envelope());
    assert_eq!(
        atom.build_hamiltonian(),
        Err(RegisterError::InvalidLevelIndex { index: 5, nrlevels: 2 }),
    );
    assert!(atom.hamiltonian().is_none());
    assert_eq!(
        atom.build_t_hamiltonian(),
        Err(RegisterError::InvalidLevelIndex { index: 5, nrlevels: 2 }),
    );
    assert!(atom.t_hamiltonian().is_none());
}

#[test]
fn register_dimension_is_the_member_product() {
    let times = nd::Array1::linspace(0.0, 1.0, 11);
    let models = vec![
        qubit("a", times.clone()),
        AtomicModel::new(
            "b", 3, &[(2, 0)], ModelState::Level(0), times.clone(), config(),
        ).unwrap(),
        qubit("c", times.clone()),
    ];
    let reg = AtomicQRegister::new(
        "triple",
        models,
        vec![
            Coord::xy(0.0, 0.0),
            Coord::xy(1.0, 0.0),
            Coord::xy(2.0, 0.0),
        ],
        Connectivity::All,
        RegisterInit::FromModels,
        times,
        config(),
    ).unwrap();
    assert_eq!(reg.dim(), 12);
    assert_eq!(reg.basis_labels().len(), 12);
}

#[test]
fn embedding_identities_reproduces_the_joint_identity() {
    let dims = [2, 3, 2];
    let full: usize = dims.iter().product();
    let mut acc = identity(full);
    for (slot, &d) in dims.iter().enumerate() {
        let emb = embed_at(&dims, slot, &identity(d)).unwrap();
        acc = acc.dot(&emb);
    }
    assert_eq!(acc, identity(full));
}

#[test]
fn register_hamiltonian_is_hermitian() {
    let times = nd::Array1::linspace(0.0, 1.0, 11);
    let mut models = vec![
        qubit("a", times.clone()),
        qubit("b", times.clone()),
    ];
    for model in models.iter_mut() {
        model.add_coupling((0, 1), 1.3, unit_envelope());
        model.add_detuning((1, 1), -0.4, unit_envelope());
        model.build_hamiltonian().unwrap();
    }
    let mut reg = AtomicQRegister::new(
        "pair",
        models,
        vec![Coord::xy(0.0, 0.0), Coord::xy(1.5, 0.0)],
        Connectivity::All,
        RegisterInit::FromModels,
        times,
        config(),
    ).unwrap();
    reg.build_hamiltonian().unwrap();
    reg.add_interactions(10.0, 0.0).unwrap();
    let h = reg.hamiltonian().unwrap();
    let h_dag: nd::Array2<C64> = h.t().mapv(|a| a.conj());
    assert_eq!(h, &h_dag);
}

#[test]
fn blockade_shift_matches_c6_over_r6() {
    let c6 = 1.0;
    let r = 2.0;
    let times = nd::Array1::linspace(0.0, 1.0, 11);
    let models = vec![qubit("a", times.clone()), qubit("b", times.clone())];
    let mut reg = AtomicQRegister::new(
        "pair",
        models,
        vec![Coord::xy(0.0, 0.0), Coord::xy(r, 0.0)],
        Connectivity::All,
        // both atoms in the Rydberg state
        RegisterInit::Digits("11".to_string()),
        times,
        config(),
    ).unwrap();
    reg.build_initial_state().unwrap();
    reg.add_interactions(c6, 0.0).unwrap();
    let vint = reg.interaction().unwrap();
    // ⟨rr|Vint|rr⟩ over the prepared |11⟩ state
    let rr = projector(4, 3, 3);
    let shift = expect_value(vint, &rr);
    assert!((shift - c6 / r.powi(6)).abs() < 1e-12);
}

#[test]
fn blockade_shift_grows_64x_at_half_distance() {
    let c6 = 1.0;
    let times = nd::Array1::linspace(0.0, 1.0, 11);
    let shift_at = |r: f64| -> f64 {
        let models
            = vec![qubit("a", times.clone()), qubit("b", times.clone())];
        let mut reg = AtomicQRegister::new(
            "pair",
            models,
            vec![Coord::xy(0.0, 0.0), Coord::xy(r, 0.0)],
            Connectivity::All,
            RegisterInit::FromModels,
            times.clone(),
            config(),
        ).unwrap();
        reg.add_interactions(c6, 0.0).unwrap();
        reg.interaction().unwrap()[[3, 3]].re
    };
    let far = shift_at(2.0);
    let near = shift_at(1.0);
    assert!((near / far - 64.0).abs() < 1e-10);
}

#[test]
fn three_atom_exchange_expands_over_the_spectator() {
    // dipole-dipole pair on the outer atoms of a 3-atom chain; the middle
    // atom is a spectator with 2 states, so the exchange sums 2 terms per
    // direction
    let times = nd::Array1::linspace(0.0, 1.0, 11);
    let models = vec![
        AtomicModel::new(
            "a", 3, &[(1, 0)], ModelState::Level(0), times.clone(), config(),
        ).unwrap(),
        AtomicModel::new(
            "b", 2, &[], ModelState::Level(0), times.clone(), config(),
        ).unwrap(),
        AtomicModel::new(
            "c", 3, &[(2, 1)], ModelState::Level(0), times.clone(), config(),
        ).unwrap(),
    ];
    let mut reg = AtomicQRegister::new(
        "chain",
        models,
        vec![
            Coord::xy(0.0, 0.0),
            Coord::xy(1.0, 0.0),
            Coord::xy(2.0, 0.0),
        ],
        Connectivity::All,
        RegisterInit::FromModels,
        times,
        config(),
    ).unwrap();
    assert_eq!(reg.resolve_state_edges(), vec![(1, 7)]);
    reg.add_interactions(0.0, 8.0).unwrap();
    let vint = reg.interaction().unwrap();
    // c3/d^3 = 1 at d = 2; exchange couples |1s2⟩ ↔ |2s1⟩ for both
    // spectator states s; joint index of |isj⟩ is 6i + 3s + j
    assert!((vint[[13, 8]].re - 1.0).abs() < 1e-12);
    assert!((vint[[8, 13]].re - 1.0).abs() < 1e-12);
    assert!((vint[[16, 11]].re - 1.0).abs() < 1e-12);
    assert!((vint[[11, 16]].re - 1.0).abs() < 1e-12);
    // no coupling between different spectator states
    assert_eq!(vint[[13, 11]], C64::new(0.0, 0.0));
    assert_eq!(vint[[16, 8]], C64::new(0.0, 0.0));
}

#[test]
fn blockade_suppresses_double_excitation() {
    // strong interaction relative to the drive keeps |rr⟩ unpopulated
    let W = 1.0;
    let times = nd::Array1::linspace(0.0, 1.0, 51);
    let mut models
        = vec![qubit("a", times.clone()), qubit("b", times.clone())];
    for model in models.iter_mut() {
        model.add_coupling((0, 1), W, unit_envelope());
        model.build_hamiltonian().unwrap();
    }
    let mut reg = AtomicQRegister::new(
        "pair",
        models,
        vec![Coord::xy(0.0, 0.0), Coord::xy(1.0, 0.0)],
        Connectivity::All,
        RegisterInit::FromModels,
        times.clone(),
        SimConfig::new(200_000, 1e-6, 1e-2),
    ).unwrap();
    reg.build_hamiltonian().unwrap();
    reg.add_interactions(200.0, 0.0).unwrap();
    reg.build_observables(None).unwrap();
    let res = reg.simulate(Mode::Free, Repr::DensityMatrix).unwrap();
    let p_rr: f64
        = res.expect[3].iter().cloned().fold(0.0, f64::max);
    assert!(p_rr < 0.01);
}

#[test]
fn simulation_history_accumulates() {
    let times = nd::Array1::linspace(0.0, 0.5, 11);
    let mut models
        = vec![qubit("a", times.clone()), qubit("b", times.clone())];
    for model in models.iter_mut() {
        model.build_hamiltonian().unwrap();
    }
    let mut reg = AtomicQRegister::new(
        "pair",
        models,
        vec![Coord::xy(0.0, 0.0), Coord::xy(1.0, 0.0)],
        Connectivity::All,
        RegisterInit::FromModels,
        times,
        config(),
    ).unwrap();
    reg.build_hamiltonian().unwrap();
    reg.simulate(Mode::Free, Repr::DensityMatrix).unwrap();
    reg.simulate(Mode::Free, Repr::DensityMatrix).unwrap();
    assert_eq!(reg.history.len(), 2);
    assert!(reg.history[0].timestamp <= reg.history[1].timestamp);
}

#[test]
fn integrator_budget_exhaustion_is_numerical_instability() {
    let starved = SimConfig::new(10, 1e-10, 1e-4);
    let mut atom = AtomicModel::new(
        "atom",
        2,
        &[(1, 0)],
        ModelState::Level(0),
        nd::Array1::linspace(0.0, 10.0, 11),
        starved,
    ).unwrap();
    atom.add_coupling((0, 1), 1.0, unit_envelope());
    atom.build_hamiltonian().unwrap();
    let res = atom.simulate(Mode::Free, Repr::DensityMatrix);
    assert!(matches!(
        res,
        Err(RegisterError::NumericalInstability { .. }),
    ));
    assert!(atom.history.is_empty());
}

#[test]
fn time_dependent_pulse_shapes_the_transfer() {
    // a half-area pulse leaves the atom in an equal superposition
    let W = 1.0;
    let t1 = std::f64::consts::PI / W;
    let times = nd::Array1::linspace(0.0, t1, 201);
    let mut atom = qubit("atom", times.clone());
    // drive on for only the first half of the window
    let gate: Envelope = Rc::new(move |t| {
        if t <= t1 / 2.0 { C64::new(1.0, 0.0) } else { C64::new(0.0, 0.0) }
    });
    atom.add_coupling((0, 1), W, gate);
    atom.build_t_hamiltonian().unwrap();
    atom.build_observables(None).unwrap();
    let res = atom.simulate(Mode::Control, Repr::DensityMatrix).unwrap();
    let nt = times.len();
    assert!((res.expect[1][nt - 1] - 0.5).abs() < 1e-3);
}
