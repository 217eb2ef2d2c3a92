#![allow(dead_code)]

use bioelectric_common::{IonConfig, IonName, SimulationConfig};
use bioelectric_engine::{RunKind, Simulator};

/// Default configuration with a short init phase.
pub fn short_config(init_tsteps: u32) -> SimulationConfig {
    let mut config = SimulationConfig::default();
    config.timing.init_tsteps = init_tsteps;
    config
}

pub fn with_ions(config: &mut SimulationConfig, names: &[IonName]) {
    config.ions = names.iter().copied().map(IonConfig::named).collect();
}

/// Builds, initializes and runs the init phase.
pub fn run_init(config: &SimulationConfig) -> Simulator {
    let mut sim = Simulator::new(config.get_sim_params()).expect("simulator");
    sim.initialize().expect("initialize");
    sim.run_loop(RunKind::Init).expect("init phase");
    sim
}

/// Total moles of ion slot `i` held by cells and environment.
pub fn total_moles(sim: &Simulator, i: usize) -> f64 {
    let state = sim.state();
    let cells = sim.cells();
    let in_cells: f64 = state.cc_cells[i].iter().zip(&cells.cell_vol).map(|(c, v)| c * v).sum();
    let env_vol = cells.env_grid.as_ref().map(|g| g.env_vol).expect("grid");
    in_cells + state.cc_env[i].iter().sum::<f64>() * env_vol
}
