//! Extracellular environment strategies.
//!
//! The time loop is written once against [`EnvironmentModel`]; the two
//! implementations differ in where environmental concentrations live, how the
//! membrane voltage is derived from charge, and whether the environment itself
//! transports anything.

use crate::cells::Cells;
use crate::charge::{get_charge_density, lumped_vm};
use crate::ecm::{update_ecm, GridSpecies};
use crate::error::SimulationError;
use crate::state::SimState;
use anyhow::Result;
use bioelectric_common::SimParams;
use nalgebra::DVector;

/// Per-species inputs for transport inside the environment.
pub struct EnvSpecies<'a> {
    pub z: f64,
    pub free_diff: f64,
    /// Concentration held at open boundaries.
    pub c_bound: f64,
    pub v_env: &'a [f64],
    pub u_env_x: &'a [f64],
    pub u_env_y: &'a [f64],
}

pub trait EnvironmentModel {
    fn name(&self) -> &'static str;

    /// Recomputes `rho_cells`, `rho_env`, `vm`, `v_cell` and `v_env` from the
    /// current concentrations. Must follow every concentration change.
    fn update_voltage(&self, state: &mut SimState, cells: &Cells, p: &SimParams);

    /// Environmental concentration facing each membrane site.
    fn env_at_sites(&self, cc_env: &[f64], cells: &Cells) -> Vec<f64> {
        cells.sites.site_to_env.iter().map(|&e| cc_env[e]).collect()
    }

    /// Moves one species across the membrane. `flux` is per site, positive into the cell.
    fn apply_membrane_flux(
        &self,
        flux: &[f64],
        cc_cells: &mut [f64],
        cc_env: &mut [f64],
        cells: &Cells,
        p: &SimParams,
    );

    /// Transport within the environment itself.
    fn env_transport(&self, species: &EnvSpecies<'_>, cc_env: &mut [f64], cells: &Cells, p: &SimParams);

    /// Environmental electric field into `e_env_x/y`.
    fn env_field(&self, state: &mut SimState, cells: &Cells);

    /// Environmental fluid velocity into `u_env_x/y`.
    fn env_flow(&self, state: &mut SimState, cells: &Cells, p: &SimParams);

    /// Environmental concentration seen from each cell centre.
    fn env_conc_at_cells(&self, cc_env: &[f64], cells: &Cells) -> Vec<f64>;
}

/// Builds the strategy matching the cluster: a grid when it carries one.
pub fn environment_for(cells: &Cells, p: &SimParams) -> Result<Box<dyn EnvironmentModel>> {
    if p.sim_ecm {
        Ok(Box::new(GridEnvironment::new(cells)?))
    } else {
        Ok(Box::new(LumpedEnvironment::new(cells, p)))
    }
}

/// No extracellular space: each cell faces a well-mixed pool of
/// `env_volume_factor x cell_vol`, and all pools are mixed after every exchange.
#[derive(Debug, Clone)]
pub struct LumpedEnvironment {
    env_vol: Vec<f64>,
}

impl LumpedEnvironment {
    pub fn new(cells: &Cells, p: &SimParams) -> Self {
        LumpedEnvironment {
            env_vol: cells.cell_vol.iter().map(|v| v * p.env_volume_factor).collect(),
        }
    }

    fn mix(&self, cc_env: &mut [f64]) {
        let total_vol: f64 = self.env_vol.iter().sum();
        if total_vol <= 0.0 {
            return;
        }
        let mean = cc_env.iter().zip(&self.env_vol).map(|(c, v)| c * v).sum::<f64>() / total_vol;
        cc_env.iter_mut().for_each(|c| *c = mean);
    }
}

impl EnvironmentModel for LumpedEnvironment {
    fn name(&self) -> &'static str {
        "lumped"
    }

    fn update_voltage(&self, state: &mut SimState, cells: &Cells, p: &SimParams) {
        state.rho_cells = get_charge_density(&state.cc_cells, &state.z, p);
        state.rho_env = get_charge_density(&state.cc_env, &state.z, p);
        state.vm = lumped_vm(&state.rho_cells, &cells.cell_vol, &cells.sites.site_sa, p);
        state.v_cell = state.vm.iter().map(|v| 0.5 * v).collect();
        state.v_env = state.vm.iter().map(|v| -0.5 * v).collect();
    }

    fn apply_membrane_flux(
        &self,
        flux: &[f64],
        cc_cells: &mut [f64],
        cc_env: &mut [f64],
        cells: &Cells,
        p: &SimParams,
    ) {
        for (s, f) in flux.iter().enumerate() {
            let c = cells.sites.site_to_cell[s];
            let moved = f * cells.sites.site_sa[s] * p.dt;
            cc_cells[c] += moved / cells.cell_vol[c];
            cc_env[c] -= moved / self.env_vol[c];
        }
        self.mix(cc_env);
    }

    fn env_transport(&self, _species: &EnvSpecies<'_>, _cc_env: &mut [f64], _cells: &Cells, _p: &SimParams) {}

    fn env_field(&self, state: &mut SimState, cells: &Cells) {
        state.e_env_x = vec![0.0; cells.n_cells()];
        state.e_env_y = vec![0.0; cells.n_cells()];
    }

    fn env_flow(&self, _state: &mut SimState, _cells: &Cells, _p: &SimParams) {}

    fn env_conc_at_cells(&self, cc_env: &[f64], _cells: &Cells) -> Vec<f64> {
        cc_env.to_vec()
    }
}

/// Resolved extracellular space on the cluster's [`crate::grid::EnvGrid`].
#[derive(Debug, Clone, Default)]
pub struct GridEnvironment;

impl GridEnvironment {
    pub fn new(cells: &Cells) -> Result<Self> {
        if cells.env_grid.is_none() || cells.cap_inv.is_none() {
            return Err(SimulationError::Config(
                "extracellular transport requested but the cluster has no environmental grid".into(),
            )
            .into());
        }
        Ok(GridEnvironment)
    }
}

impl EnvironmentModel for GridEnvironment {
    fn name(&self) -> &'static str {
        "grid"
    }

    fn update_voltage(&self, state: &mut SimState, cells: &Cells, p: &SimParams) {
        let (Some(grid), Some(cap_inv)) = (cells.env_grid.as_ref(), cells.cap_inv.as_ref()) else {
            return;
        };
        let n_cells = cells.n_cells();
        state.rho_cells = get_charge_density(&state.cc_cells, &state.z, p);
        state.rho_env = get_charge_density(&state.cc_env, &state.z, p);

        let q = DVector::from_iterator(
            n_cells + grid.len(),
            state
                .rho_cells
                .iter()
                .zip(&cells.cell_vol)
                .map(|(rho, vol)| rho * vol)
                .chain(state.rho_env.iter().map(|rho| rho * grid.env_vol)),
        );
        let v = cap_inv * q;
        let v_env_raw = &v.as_slice()[n_cells..];

        state.v_cell = v.as_slice()[..n_cells].to_vec();
        state.vm = cells
            .sites
            .site_to_cell
            .iter()
            .zip(&cells.sites.site_to_env)
            .map(|(&c, &e)| state.v_cell[c] - v_env_raw[e])
            .collect();
        state.v_env = grid.gaussian_smooth(v_env_raw, p.smoothing_sigma);
    }

    fn apply_membrane_flux(
        &self,
        flux: &[f64],
        cc_cells: &mut [f64],
        cc_env: &mut [f64],
        cells: &Cells,
        p: &SimParams,
    ) {
        let Some(grid) = cells.env_grid.as_ref() else {
            return;
        };
        for (s, f) in flux.iter().enumerate() {
            let c = cells.sites.site_to_cell[s];
            let e = cells.sites.site_to_env[s];
            let moved = f * cells.sites.site_sa[s] * p.dt;
            cc_cells[c] += moved / cells.cell_vol[c];
            cc_env[e] -= moved / grid.env_vol;
        }
    }

    fn env_transport(&self, species: &EnvSpecies<'_>, cc_env: &mut [f64], cells: &Cells, p: &SimParams) {
        if let Some(grid) = cells.env_grid.as_ref() {
            let grid_species = GridSpecies {
                z: species.z,
                diff: species.free_diff * p.env_tortuosity,
                c_bound: species.c_bound,
                v_env: species.v_env,
                ux: species.u_env_x,
                uy: species.u_env_y,
            };
            update_ecm(cc_env, &grid_species, grid, p);
        }
    }

    fn env_field(&self, state: &mut SimState, cells: &Cells) {
        if let Some(grid) = cells.env_grid.as_ref() {
            let (gx, gy) = grid.gradient(&state.v_env);
            state.e_env_x = gx.iter().map(|g| -g).collect();
            state.e_env_y = gy.iter().map(|g| -g).collect();
        }
    }

    fn env_flow(&self, state: &mut SimState, cells: &Cells, p: &SimParams) {
        let Some(grid) = cells.env_grid.as_ref() else {
            return;
        };
        let mobility = p.flow_permeability / p.viscosity;
        let ux: Vec<f64> = state.rho_env.iter().zip(&state.e_env_x).map(|(r, e)| mobility * r * e).collect();
        let uy: Vec<f64> = state.rho_env.iter().zip(&state.e_env_y).map(|(r, e)| mobility * r * e).collect();
        let (ux, uy) = grid.project(&ux, &uy);
        state.u_env_x = ux;
        state.u_env_y = uy;
    }

    fn env_conc_at_cells(&self, cc_env: &[f64], cells: &Cells) -> Vec<f64> {
        match cells.env_grid.as_ref() {
            Some(grid) => cells.centres.iter().map(|c| cc_env[grid.cell_at(*c)]).collect(),
            None => Vec::new(),
        }
    }
}
