//! Fields, pressures, flow and deformation on the cell network, plus
//! electroosmotic redistribution of membrane proteins.
//!
//! Cell-centred vector fields are carried as separate x/y arrays. Every solve
//! uses the cached network operators of [`Cells`] and ends with a projection onto
//! the divergence-free part of the field.

use crate::cells::Cells;
use crate::environment::EnvironmentModel;
use crate::error::SimulationError;
use crate::flux::nernst_planck_flux;
use crate::state::SimState;
use anyhow::Result;
use bioelectric_common::SimParams;
use nalgebra::DVector;

/// Largest `c dt / length` the explicit wave update tolerates.
const WAVE_COURANT_LIMIT: f64 = 0.5;

/// Intracellular electric field, on junctions (`e_gj`) and averaged onto cells.
pub fn get_efield(state: &mut SimState, cells: &Cells) {
    state.e_gj = cells.gradient_gj(&state.v_cell).iter().map(|g| -g).collect();
    let (ex, ey) = cells.gj_to_cells(&state.e_gj);
    state.e_cell_x = ex;
    state.e_cell_y = ey;
}

/// Osmotic pressure of each cell against the environment it faces:
/// `P = RT (sum_i c_cell - sum_i c_env)`.
pub fn osmotic_p(state: &mut SimState, env: &dyn EnvironmentModel, cells: &Cells, p: &SimParams) {
    let mut total = vec![0.0; cells.n_cells()];
    for (cc, ce) in state.cc_cells.iter().zip(&state.cc_env) {
        let outside = env.env_conc_at_cells(ce, cells);
        for ((t, c_in), c_out) in total.iter_mut().zip(cc).zip(&outside) {
            *t += c_in - c_out;
        }
    }
    let rt = p.r * p.t;
    state.p_cells = total.iter().map(|dc| rt * dc).collect();
}

/// Body force of the pressure field, `F = -grad P`.
pub fn get_hydro_f(state: &mut SimState, cells: &Cells) {
    let grad = cells.gradient_gj(&state.p_cells);
    let (gx, gy) = cells.gj_to_cells(&grad);
    state.f_hydro_x = gx.iter().map(|g| -g).collect();
    state.f_hydro_y = gy.iter().map(|g| -g).collect();
}

/// Electrostatic body force on the net cytosolic charge, `F = rho E`.
pub fn electro_p(state: &mut SimState) {
    state.f_electro_x = state.rho_cells.iter().zip(&state.e_cell_x).map(|(r, e)| r * e).collect();
    state.f_electro_y = state.rho_cells.iter().zip(&state.e_cell_y).map(|(r, e)| r * e).collect();
}

fn total_force(state: &SimState) -> (Vec<f64>, Vec<f64>) {
    let sum = |a: &[f64], b: &[f64]| -> Vec<f64> {
        (0..a.len().max(b.len()))
            .map(|c| a.get(c).copied().unwrap_or(0.0) + b.get(c).copied().unwrap_or(0.0))
            .collect()
    };
    (sum(&state.f_hydro_x, &state.f_electro_x), sum(&state.f_hydro_y, &state.f_electro_y))
}

/// Darcy flow through the cluster, `u = (k / mu) F`, made incompressible.
pub fn get_flow(state: &mut SimState, cells: &Cells, p: &SimParams) {
    let mobility = p.flow_permeability / p.viscosity;
    let (fx, fy) = total_force(state);
    let ux: Vec<f64> = fx.iter().map(|f| mobility * f).collect();
    let uy: Vec<f64> = fy.iter().map(|f| mobility * f).collect();
    let (u_gj, ux, uy) = cells.project_divergence_free(&ux, &uy);
    state.u_gj = u_gj;
    state.u_cells_x = ux;
    state.u_cells_y = uy;
}

/// Quasi-static elastic displacement: solves `E lap d = -F` per component.
pub fn get_deformation(state: &mut SimState, cells: &Cells, p: &SimParams) {
    let (fx, fy) = total_force(state);
    let solve = |f: &[f64]| -> Vec<f64> {
        let rhs = DVector::from_iterator(f.len(), f.iter().map(|f| -f / p.youngs_modulus));
        (&cells.lap_gj_inv * rhs).as_slice().to_vec()
    };
    let (_, dx, dy) = cells.project_divergence_free(&solve(&fx), &solve(&fy));
    state.d_prev_x = std::mem::replace(&mut state.d_cells_x, dx);
    state.d_prev_y = std::mem::replace(&mut state.d_cells_y, dy);
}

/// Rejects time steps too long for the elastic wave speed `c = sqrt(E / rho)`.
pub fn check_wave_stability(cells: &Cells, p: &SimParams) -> Result<()> {
    let speed = (p.youngs_modulus / p.mass_density).sqrt();
    let length = cells.min_length();
    let courant = speed * p.dt / length;
    if courant > WAVE_COURANT_LIMIT {
        return Err(SimulationError::Config(format!(
            "elastic waves are unstable (c*dt/dx = {:.3e} > {}); reduce timing.dt to at most {:.3e} s \
             or lower mechanics.youngs_modulus",
            courant,
            WAVE_COURANT_LIMIT,
            WAVE_COURANT_LIMIT * length / speed
        ))
        .into());
    }
    Ok(())
}

/// Time-dependent deformation: one damped explicit step of the elastic wave equation,
/// `d' = d + (1 - damping)(d - d_prev) + dt^2 (c^2 lap d + F / rho)`.
pub fn time_deform(state: &mut SimState, cells: &Cells, p: &SimParams) -> Result<()> {
    check_wave_stability(cells, p)?;
    let c2 = p.youngs_modulus / p.mass_density;
    let dt2 = p.dt * p.dt;
    let keep = 1.0 - p.deform_damping;
    let (fx, fy) = total_force(state);

    let advance = |d: &[f64], d_prev: &[f64], f: &[f64]| -> Vec<f64> {
        let lap_d = &cells.lap_cells * DVector::from_column_slice(d);
        (0..d.len())
            .map(|c| d[c] + keep * (d[c] - d_prev[c]) + dt2 * (c2 * lap_d[c] + f[c] / p.mass_density))
            .collect()
    };
    let nx = advance(&state.d_cells_x, &state.d_prev_x, &fx);
    let ny = advance(&state.d_cells_y, &state.d_prev_y, &fy);
    let (_, dx, dy) = cells.project_divergence_free(&nx, &ny);
    state.d_prev_x = std::mem::replace(&mut state.d_cells_x, dx);
    state.d_prev_y = std::mem::replace(&mut state.d_cells_y, dy);
    Ok(())
}

/// Lateral drift of membrane pumps and channels around each cell under the
/// environmental field and flow. Needs per-membrane sites, so it is a no-op
/// without the environmental grid.
pub fn eosmosis(state: &mut SimState, cells: &Cells, p: &SimParams) {
    if cells.env_grid.is_none() || state.e_env_x.is_empty() {
        return;
    }
    let rho_pump = std::mem::take(&mut state.rho_pump);
    state.rho_pump = drift_density(rho_pump, p.z_pump, state, cells, p);
    let rho_channel = std::mem::take(&mut state.rho_channel);
    state.rho_channel = drift_density(rho_channel, p.z_channel, state, cells, p);
}

fn drift_density(mut rho: Vec<f64>, z: f64, state: &SimState, cells: &Cells, p: &SimParams) -> Vec<f64> {
    let env = &cells.sites.site_to_env;
    let at = |field: &[f64], m: usize| field.get(env[m]).copied().unwrap_or(0.0);
    let mut delta = vec![0.0; rho.len()];

    for c in 0..cells.n_cells() {
        let ring = cells.cell_mems(c);
        let n = ring.len();
        for k in 0..n {
            let a = ring.start + k;
            let b = ring.start + (k + 1) % n;
            let along = cells.mem_mids[b] - cells.mem_mids[a];
            let len = along.length();
            if len <= 0.0 {
                continue;
            }
            let t = along / len;
            let grad = (rho[b] - rho[a]) / len;
            let ex = 0.5 * (at(&state.e_env_x, a) + at(&state.e_env_x, b));
            let ey = 0.5 * (at(&state.e_env_y, a) + at(&state.e_env_y, b));
            let ux = 0.5 * (at(&state.u_env_x, a) + at(&state.u_env_x, b));
            let uy = 0.5 * (at(&state.u_env_y, a) + at(&state.u_env_y, b));
            let (fx, fy) = nernst_planck_flux(
                0.5 * (rho[a] + rho[b]),
                grad * t.x,
                grad * t.y,
                -ex,
                -ey,
                ux,
                uy,
                p.d_membrane,
                z,
                p,
            );
            let moved = (fx * t.x + fy * t.y) * p.dt / len;
            delta[a] -= moved;
            delta[b] += moved;
        }
    }
    for (r, d) in rho.iter_mut().zip(&delta) {
        *r = (*r + d).max(0.0);
    }
    rho
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::LumpedEnvironment;
    use crate::init::base_init;
    use crate::test_support::default_params;
    use bioelectric_common::{DeformStyle, IonName};

    #[test]
    fn field_points_down_the_voltage_gradient() {
        let p = default_params();
        let cells = Cells::new(&p).unwrap();
        let mut state = base_init(&cells, &p);
        state.v_cell = cells.centres.iter().map(|c| 1.0e3 * c.x).collect();
        get_efield(&mut state, &cells);
        assert!(state.e_cell_x.iter().all(|e| *e < 0.0));
        for (j, e) in state.e_gj.iter().enumerate() {
            assert!((e + 1.0e3 * cells.gj_tangent[j].x).abs() < 1e-9);
        }
    }

    #[test]
    fn pressure_gradient_pushes_towards_low_pressure() {
        let p = default_params();
        let cells = Cells::new(&p).unwrap();
        let mut state = base_init(&cells, &p);
        state.p_cells = cells.centres.iter().map(|c| 1.0e6 * c.x).collect();
        get_hydro_f(&mut state, &cells);
        assert!(state.f_hydro_x.iter().all(|f| *f < 0.0));
    }

    #[test]
    fn osmotic_pressure_tracks_excess_solute() {
        let p = default_params();
        let cells = Cells::new(&p).unwrap();
        let env = LumpedEnvironment::new(&cells, &p);
        let mut state = base_init(&cells, &p);
        let na = p.ion_table.index(IonName::Na).unwrap();
        state.cc_cells[na][0] += 10.0;
        osmotic_p(&mut state, &env, &cells, &p);
        let rt = p.r * p.t;
        assert!((state.p_cells[0] - state.p_cells[1] - 10.0 * rt).abs() < 1e-6 * rt);
    }

    #[test]
    fn flow_and_steady_deformation_are_divergence_free() {
        let p = default_params();
        let cells = Cells::new(&p).unwrap();
        let mut state = base_init(&cells, &p);
        state.f_electro_x = cells.centres.iter().map(|c| 1.0e9 * c.x).collect();
        state.f_electro_y = cells.centres.iter().map(|c| 1.0e9 * c.y).collect();

        get_flow(&mut state, &cells, &p);
        let div = cells.divergence_gj(&state.u_gj);
        let scale = cells
            .divergence_gj(&cells.cells_to_gj(&state.f_electro_x, &state.f_electro_y))
            .iter()
            .map(|d| d.abs() * p.flow_permeability / p.viscosity)
            .fold(0.0, f64::max);
        assert!(div.iter().all(|d| d.abs() < 1e-8 * scale));

        get_deformation(&mut state, &cells, &p);
        assert!(state.d_cells_x.iter().chain(&state.d_cells_y).all(|d| d.is_finite()));
        assert!(state.d_prev_x.iter().all(|d| *d == 0.0));
    }

    #[test]
    fn wave_step_needs_a_stable_time_step() {
        let mut p = default_params();
        p.deform_style = DeformStyle::Wave;
        let cells = Cells::new(&p).unwrap();
        let mut state = base_init(&cells, &p);
        assert!(time_deform(&mut state, &cells, &p).is_err());

        p.youngs_modulus = 1.0e-8;
        time_deform(&mut state, &cells, &p).unwrap();
        // No force, no motion
        assert!(state.d_cells_x.iter().all(|d| *d == 0.0));

        // Rotational force survives the projection
        state.f_electro_x = cells.centres.iter().map(|c| -1.0e3 * c.y).collect();
        state.f_electro_y = cells.centres.iter().map(|c| 1.0e3 * c.x).collect();
        for _ in 0..5 {
            time_deform(&mut state, &cells, &p).unwrap();
        }
        assert!(state.d_cells_x.iter().all(|d| d.is_finite()));
        assert!(state.d_cells_x.iter().any(|d| *d != 0.0));
    }

    #[test]
    fn eosmosis_drifts_pumps_along_the_field_and_conserves_them() {
        let mut p = default_params();
        p.sim_ecm = true;
        let cells = Cells::new(&p).unwrap();
        let mut state = base_init(&cells, &p);
        state.e_env_x.iter_mut().for_each(|e| *e = 1.0e4);
        let total_before: f64 = state.rho_pump.iter().sum();
        eosmosis(&mut state, &cells, &p);

        let ring = cells.cell_mems(0);
        let facing_field = ring.start;
        let facing_away = ring.start + 3;
        // Positive pumps collect on the +x face, negative channels on the -x face
        assert!(state.rho_pump[facing_field] > 1.0);
        assert!(state.rho_pump[facing_away] < 1.0);
        assert!(state.rho_channel[facing_away] > 1.0);
        let total_after: f64 = state.rho_pump.iter().sum();
        assert!((total_after - total_before).abs() < 1e-9);
    }

    #[test]
    fn eosmosis_needs_the_grid() {
        let p = default_params();
        let cells = Cells::new(&p).unwrap();
        let mut state = base_init(&cells, &p);
        state.e_env_x.iter_mut().for_each(|e| *e = 1.0e4);
        let before = state.rho_pump.clone();
        eosmosis(&mut state, &cells, &p);
        assert_eq!(state.rho_pump, before);
    }
}
