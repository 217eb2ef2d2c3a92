mod common;

use bioelectric_engine::{Phase, RunKind, SimulationError, Simulator};
use common::{run_init, short_config};
use tempdir::TempDir;

#[test]
fn initialization_is_idempotent() {
    let mut config = short_config(20);
    config.noise.static_level = 2.0;
    let mut sim = Simulator::new(config.get_sim_params()).unwrap();
    sim.initialize().unwrap();
    let first = sim.state().clone();
    sim.run_loop(RunKind::Init).unwrap();
    sim.initialize().unwrap();
    assert_eq!(sim.state(), &first);
    assert_eq!(sim.phase(), Phase::TissueInitialized);
}

#[test]
fn operations_are_gated_by_phase() {
    let mut sim = Simulator::new(short_config(5).get_sim_params()).unwrap();
    let err = sim.run_loop(RunKind::Init).unwrap_err();
    assert!(matches!(err.downcast_ref::<SimulationError>(), Some(SimulationError::InvalidPhase { .. })));

    sim.initialize().unwrap();
    sim.run_loop(RunKind::Init).unwrap();
    assert_eq!(sim.phase(), Phase::Finalized);
    let err = sim.run_loop(RunKind::Init).unwrap_err();
    assert!(err.to_string().contains("finalized"));
}

#[test]
fn sim_phase_resumes_from_the_cached_init_phase() {
    let dir = TempDir::new("bioelectric-lifecycle").unwrap();
    let mut config = short_config(30);
    config.timing.sim_tsteps = 20;

    let init = run_init(&config);
    init.save(dir.path(), RunKind::Init).unwrap();
    let init_state = init.state().clone();

    let mut sim = Simulator::new(config.get_sim_params()).unwrap();
    sim.load_init(dir.path()).unwrap();
    assert_eq!(sim.state(), &init_state);
    assert_eq!(sim.phase(), Phase::TissueInitialized);

    sim.run_loop(RunKind::Sim).unwrap();
    let dt = config.timing.dt;
    assert!((sim.series().time()[0] - 30.0 * dt).abs() < 1e-9);
    assert!((sim.state().time - 50.0 * dt).abs() < 1e-9);
    assert_eq!(sim.series().len(), 2);

    let path = sim.save(dir.path(), RunKind::Sim).unwrap();
    assert!(path.ends_with("savedSim.bin"));
}

#[test]
fn loading_a_cache_from_another_cluster_fails() {
    let dir = TempDir::new("bioelectric-mismatch").unwrap();
    let init = run_init(&short_config(5));
    init.save(dir.path(), RunKind::Init).unwrap();

    let mut config = short_config(5);
    config.cluster.cluster_radius = 0.0;
    let mut sim = Simulator::new(config.get_sim_params()).unwrap();
    assert!(sim.load_init(dir.path()).is_err());
    assert_eq!(sim.phase(), Phase::Uninitialized);
}

#[test]
fn missing_cache_is_reported() {
    let dir = TempDir::new("bioelectric-empty").unwrap();
    let mut sim = Simulator::new(short_config(5).get_sim_params()).unwrap();
    let err = sim.load_init(dir.path()).unwrap_err();
    assert!(format!("{:#}", err).contains("savedInit.bin"));
}

#[test]
fn shipped_configuration_loads() {
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("config.toml");
    let config = bioelectric_common::SimulationConfig::load(path).unwrap();
    let params = config.get_sim_params();
    assert_eq!(params.n_ions(), 4);
    assert_eq!(params.dynamics.scheduled.len(), 1);
    assert!(Simulator::new(params).is_ok());
}
