//! Tracked signalling species that ride on the ion transport machinery but carry
//! no charge in the voltage calculation.

use crate::cells::Cells;
use crate::environment::{EnvSpecies, EnvironmentModel};
use crate::flux::electroflux;
use crate::gap_junction::update_gj;
use crate::state::SimState;
use bioelectric_common::{MorphogenSpec, SimParams};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MorphogenState {
    pub spec: MorphogenSpec,
    /// Per cell (mol/m^3).
    pub cc_cells: Vec<f64>,
    /// Per environmental compartment (mol/m^3).
    pub cc_env: Vec<f64>,
    /// Membrane diffusion constant per site.
    pub dm: Vec<f64>,
    /// Last membrane flux per site, positive inward.
    pub fluxes_mem: Vec<f64>,
}

impl MorphogenState {
    pub fn new(spec: MorphogenSpec, cells: &Cells) -> Self {
        MorphogenState {
            cc_cells: vec![spec.cell_conc; cells.n_cells()],
            cc_env: vec![spec.env_conc; cells.n_env()],
            dm: vec![spec.mem_perm; cells.n_sites()],
            fluxes_mem: vec![0.0; cells.n_sites()],
            spec,
        }
    }
}

/// One transport step: membrane electrodiffusion, junction coupling, environmental
/// transport, then first-order decay and constant production.
pub fn update_morphogen(
    m: &mut MorphogenState,
    state: &SimState,
    env: &dyn EnvironmentModel,
    cells: &Cells,
    p: &SimParams,
) {
    let z = m.spec.z;
    let c_in: Vec<f64> = cells.sites.site_to_cell.iter().map(|&c| m.cc_cells[c]).collect();
    let c_out = env.env_at_sites(&m.cc_env, cells);
    let flux = electroflux(&c_out, &c_in, &m.dm, p.tm, z, &state.vm, p, None);
    env.apply_membrane_flux(&flux, &mut m.cc_cells, &mut m.cc_env, cells, p);
    m.fluxes_mem = flux;

    if p.gj_enabled {
        update_gj(&mut m.cc_cells, z, m.spec.free_diff, &state.v_cell, &state.gjopen, &state.u_gj, cells, p);
    }

    let species = EnvSpecies {
        z,
        free_diff: m.spec.free_diff,
        c_bound: m.spec.env_conc,
        v_env: &state.v_env,
        u_env_x: &state.u_env_x,
        u_env_y: &state.u_env_y,
    };
    env.env_transport(&species, &mut m.cc_env, cells, p);

    let keep = (1.0 - m.spec.decay_rate * p.dt).max(0.0);
    for c in m.cc_cells.iter_mut() {
        *c = (*c * keep + m.spec.production_rate * p.dt).max(0.0);
    }
    for c in m.cc_env.iter_mut() {
        *c *= keep;
    }
}

/// Voltage-sensitive dye.
pub fn update_dye(state: &mut SimState, env: &dyn EnvironmentModel, cells: &Cells, p: &SimParams) {
    if let Some(mut dye) = state.dye.take() {
        update_morphogen(&mut dye, state, env, cells, p);
        state.dye = Some(dye);
    }
}

/// Second messenger IP3, which also gates ER calcium release.
pub fn update_ip3(state: &mut SimState, env: &dyn EnvironmentModel, cells: &Cells, p: &SimParams) {
    if let Some(mut ip3) = state.ip3.take() {
        update_morphogen(&mut ip3, state, env, cells, p);
        state.ip3 = Some(ip3);
    }
}
