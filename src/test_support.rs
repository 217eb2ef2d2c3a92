use bioelectric_common::{SimParams, SimulationConfig};

/// Parameters of the default seven-cell cluster.
pub fn default_params() -> SimParams {
    SimulationConfig::default().get_sim_params()
}
