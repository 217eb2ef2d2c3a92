mod common;

use bioelectric_common::IonName;
use common::{run_init, short_config, total_moles};

#[test]
fn closed_grid_conserves_every_ion() {
    let mut config = short_config(0);
    config.features.sim_ecm = true;
    config.ecm.closed_bound = true;
    let mut sim = bioelectric_engine::Simulator::new(config.get_sim_params()).unwrap();
    sim.initialize().unwrap();
    let n_ions = sim.params().n_ions();
    let before: Vec<f64> = (0..n_ions).map(|i| total_moles(&sim, i)).collect();

    config.timing.init_tsteps = 40;
    let sim = run_init(&config);
    for (i, b) in before.iter().enumerate() {
        let after = total_moles(&sim, i);
        assert!(((after - b) / b).abs() < 1e-9, "ion slot {}: {} -> {}", i, b, after);
    }
}

#[test]
fn grid_run_sizes_environment_and_membrane_arrays() {
    let mut config = short_config(10);
    config.features.sim_ecm = true;
    let sim = run_init(&config);
    let cells = sim.cells();
    let n_grid = cells.env_grid.as_ref().unwrap().len();
    assert_eq!(sim.state().cc_env[0].len(), n_grid);
    assert_eq!(sim.state().v_env.len(), n_grid);
    assert_eq!(sim.state().vm.len(), cells.n_mems());
    assert!(sim.state().vm.iter().all(|v| v.is_finite()));
    let sample = &sim.series().vm_time()[0];
    assert_eq!(sample.len(), cells.n_mems());
}

#[test]
fn open_grid_holds_the_boundary_at_bath_concentration() {
    let mut config = short_config(10);
    config.features.sim_ecm = true;
    config.ecm.closed_bound = false;
    let sim = run_init(&config);
    let grid = sim.cells().env_grid.as_ref().unwrap();
    let p = sim.params();
    let k = p.ion_table.index(IonName::K).unwrap();
    let bath = p.ions[k].env_conc;
    for e in (0..grid.len()).filter(|&e| grid.is_boundary(e)) {
        assert!((sim.state().cc_env[k][e] - bath).abs() < 1e-9);
    }
}
