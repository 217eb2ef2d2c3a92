use crate::morphogen::MorphogenState;
use serde::{Deserialize, Serialize};

/// Every array the time loop advances, struct-of-arrays.
///
/// Ion-resolved arrays are indexed `[ion slot][point]`, where the point is a cell
/// (`cc_cells`), an environmental compartment (`cc_env`) or a membrane site
/// (`dm_*`, `fluxes_mem`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimState {
    pub time: f64,
    pub z: Vec<f64>,

    // Concentrations (mol/m^3)
    pub cc_cells: Vec<Vec<f64>>,
    pub cc_env: Vec<Vec<f64>>,
    /// Boundary value of each ion for open grid boundaries.
    pub cc_env_bound: Vec<f64>,

    // Membrane diffusion constants (m^2/s), additive decomposition
    pub dm_base: Vec<Vec<f64>>,
    pub dm_scheduled: Vec<Vec<f64>>,
    pub dm_vg: Vec<Vec<f64>>,
    pub dm_cag: Vec<Vec<f64>>,
    pub dm_cells: Vec<Vec<f64>>,

    // Charge and voltage
    pub rho_cells: Vec<f64>,
    pub rho_env: Vec<f64>,
    pub vm: Vec<f64>,
    pub vm_prev: Vec<f64>,
    pub dvm: Vec<f64>,
    pub v_cell: Vec<f64>,
    pub v_env: Vec<f64>,

    // Per-step flux accumulators (mol/m^2/s, positive into the cell)
    pub fluxes_mem: Vec<Vec<f64>>,
    pub fluxes_gj: Vec<Vec<f64>>,

    // Gap junctions and scheduled blocks
    pub gjopen: Vec<f64>,
    pub block_gj: f64,
    pub block_nak: f64,

    // Buffer
    pub ph_cells: Vec<f64>,
    pub ph_env: Vec<f64>,

    // Fields and mechanics, cell-centred unless noted
    pub e_gj: Vec<f64>,
    pub e_cell_x: Vec<f64>,
    pub e_cell_y: Vec<f64>,
    pub e_env_x: Vec<f64>,
    pub e_env_y: Vec<f64>,
    pub p_cells: Vec<f64>,
    pub f_hydro_x: Vec<f64>,
    pub f_hydro_y: Vec<f64>,
    pub f_electro_x: Vec<f64>,
    pub f_electro_y: Vec<f64>,
    pub u_gj: Vec<f64>,
    pub u_cells_x: Vec<f64>,
    pub u_cells_y: Vec<f64>,
    pub u_env_x: Vec<f64>,
    pub u_env_y: Vec<f64>,
    pub d_cells_x: Vec<f64>,
    pub d_cells_y: Vec<f64>,
    pub d_prev_x: Vec<f64>,
    pub d_prev_y: Vec<f64>,

    // Membrane protein densities, per site, mean 1
    pub rho_pump: Vec<f64>,
    pub rho_channel: Vec<f64>,

    // ER calcium store, per cell
    pub cc_er: Vec<f64>,
    pub cc_er_m: Vec<f64>,
    pub cc_er_prev: Vec<f64>,
    pub dcc_er: Vec<f64>,
    pub v_er: Vec<f64>,

    pub dye: Option<MorphogenState>,
    pub ip3: Option<MorphogenState>,
}

impl SimState {
    pub fn n_ions(&self) -> usize {
        self.cc_cells.len()
    }

    pub fn n_cells(&self) -> usize {
        self.cc_cells.first().map_or(0, |c| c.len())
    }

    /// Re-sums the membrane diffusion constants of ion `i` from their contributions.
    pub fn sum_dm(&mut self, i: usize) {
        for (s, dm) in self.dm_cells[i].iter_mut().enumerate() {
            *dm = self.dm_base[i][s] + self.dm_scheduled[i][s] + self.dm_vg[i][s] + self.dm_cag[i][s];
        }
    }

    /// Clears the per-step membrane and junction flux accumulators.
    pub fn zero_fluxes(&mut self) {
        for f in self.fluxes_mem.iter_mut().chain(self.fluxes_gj.iter_mut()) {
            f.iter_mut().for_each(|v| *v = 0.0);
        }
    }

    /// Transmembrane current density per site, `sum_i z_i F flux_i` (A/m^2).
    pub fn membrane_current(&self, faraday: f64) -> Vec<f64> {
        accumulate_current(&self.fluxes_mem, &self.z, faraday)
    }

    /// Gap-junction current density per junction (A/m^2).
    pub fn junction_current(&self, faraday: f64) -> Vec<f64> {
        accumulate_current(&self.fluxes_gj, &self.z, faraday)
    }

    /// Smallest concentration held anywhere, with the ion slot it belongs to.
    pub fn min_concentration(&self) -> Option<(usize, f64)> {
        self.cc_cells
            .iter()
            .zip(&self.cc_env)
            .enumerate()
            .map(|(i, (cells, env))| {
                let m = cells.iter().chain(env).copied().fold(f64::INFINITY, f64::min);
                (i, m)
            })
            .min_by(|a, b| a.1.total_cmp(&b.1))
    }
}

fn accumulate_current(fluxes: &[Vec<f64>], z: &[f64], faraday: f64) -> Vec<f64> {
    let n = fluxes.first().map_or(0, |f| f.len());
    let mut current = vec![0.0; n];
    for (flux, &zi) in fluxes.iter().zip(z) {
        for (c, f) in current.iter_mut().zip(flux) {
            *c += zi * faraday * f;
        }
    }
    current
}
