//! State allocation and tissue initialization.

use crate::buffer::{ph_from_proton, rebuffer};
use crate::cells::Cells;
use crate::charge::get_charge_density;
use crate::error::SimulationError;
use crate::mechanics::check_wave_stability;
use crate::morphogen::MorphogenState;
use crate::state::SimState;
use anyhow::Result;
use bioelectric_common::{DeformStyle, IonName, SimParams};
use log::debug;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};

/// Allocates and fills every array of a fresh simulation from the parameters.
///
/// Deterministic: two calls with the same cluster and parameters give equal states.
/// Voltages are left at zero; the environment strategy derives them from charge.
pub fn base_init(cells: &Cells, p: &SimParams) -> SimState {
    let n_ions = p.n_ions();
    let n_cells = cells.n_cells();
    let n_sites = cells.n_sites();
    let n_gj = cells.n_gj();

    let mut state = SimState {
        z: p.valences(),
        cc_cells: p.ions.iter().map(|ion| vec![ion.cell_conc; n_cells]).collect(),
        dm_base: p.ions.iter().map(|ion| vec![ion.mem_perm; n_sites]).collect(),
        dm_scheduled: vec![vec![0.0; n_sites]; n_ions],
        dm_vg: vec![vec![0.0; n_sites]; n_ions],
        dm_cag: vec![vec![0.0; n_sites]; n_ions],
        vm: vec![0.0; n_sites],
        vm_prev: vec![0.0; n_sites],
        dvm: vec![0.0; n_sites],
        v_cell: vec![0.0; n_cells],
        fluxes_mem: vec![vec![0.0; n_sites]; n_ions],
        fluxes_gj: vec![vec![0.0; n_gj]; n_ions],
        gjopen: vec![1.0; n_gj],
        block_gj: 1.0,
        block_nak: 1.0,
        ph_cells: vec![0.0; n_cells],
        e_gj: vec![0.0; n_gj],
        e_cell_x: vec![0.0; n_cells],
        e_cell_y: vec![0.0; n_cells],
        p_cells: vec![0.0; n_cells],
        f_hydro_x: vec![0.0; n_cells],
        f_hydro_y: vec![0.0; n_cells],
        f_electro_x: vec![0.0; n_cells],
        f_electro_y: vec![0.0; n_cells],
        u_gj: vec![0.0; n_gj],
        u_cells_x: vec![0.0; n_cells],
        u_cells_y: vec![0.0; n_cells],
        d_cells_x: vec![0.0; n_cells],
        d_cells_y: vec![0.0; n_cells],
        d_prev_x: vec![0.0; n_cells],
        d_prev_y: vec![0.0; n_cells],
        rho_pump: vec![1.0; n_sites],
        rho_channel: vec![1.0; n_sites],
        ..SimState::default()
    };
    state.dm_cells = state.dm_base.clone();

    base_init_ecm(&mut state, cells, p);

    init_buffer(&mut state, p);
    state.rho_cells = get_charge_density(&state.cc_cells, &state.z, p);
    state.rho_env = get_charge_density(&state.cc_env, &state.z, p);

    if p.ca_dyn && p.ion_table.contains(IonName::Ca) {
        state.cc_er = vec![p.er.ca_init; n_cells];
        // Fixed counter-anion makes the resting store neutral
        state.cc_er_m = vec![2.0 * p.er.ca_init; n_cells];
        state.cc_er_prev = state.cc_er.clone();
        state.dcc_er = vec![0.0; n_cells];
        state.v_er = vec![0.0; n_cells];
    }

    if p.voltage_dye {
        state.dye = Some(MorphogenState::new(p.dye.clone(), cells));
    }
    if p.ip3 {
        state.ip3 = Some(MorphogenState::new(p.ip3_spec.clone(), cells));
    }

    debug!(
        "Allocated state: {} ions, {} cells, {} sites, {} junctions, {} environmental points.",
        n_ions,
        n_cells,
        n_sites,
        n_gj,
        cells.n_env()
    );
    state
}

/// Environment-indexed arrays: one entry per grid point with the ECM, one
/// lumped pool per cell without it.
pub fn base_init_ecm(state: &mut SimState, cells: &Cells, p: &SimParams) {
    let n_env = cells.n_env();
    state.cc_env = p.ions.iter().map(|ion| vec![ion.env_conc; n_env]).collect();
    state.cc_env_bound = p.ions.iter().map(|ion| ion.env_conc).collect();
    state.v_env = vec![0.0; n_env];
    state.ph_env = vec![0.0; n_env];
    state.e_env_x = vec![0.0; n_env];
    state.e_env_y = vec![0.0; n_env];
    state.u_env_x = vec![0.0; n_env];
    state.u_env_y = vec![0.0; n_env];
}

/// Sets pH everywhere. With both H and M tracked the buffer fixes [H+]; otherwise
/// pH follows the (tracked or default) proton concentration.
fn init_buffer(state: &mut SimState, p: &SimParams) {
    let slots = (p.ion_table.index(IonName::H), p.ion_table.index(IonName::M));
    match slots {
        (Some(i_h), Some(i_m)) => {
            let (c_m, c_h) = pair_mut(&mut state.cc_cells, i_m, i_h);
            rebuffer(c_m, p.c_hm, c_h, &mut state.ph_cells);
            let (c_m, c_h) = pair_mut(&mut state.cc_env, i_m, i_h);
            rebuffer(c_m, p.c_hm, c_h, &mut state.ph_env);
        }
        (Some(i_h), None) => {
            for (ph, c) in state.ph_cells.iter_mut().zip(&state.cc_cells[i_h]) {
                *ph = ph_from_proton(*c);
            }
            for (ph, c) in state.ph_env.iter_mut().zip(&state.cc_env[i_h]) {
                *ph = ph_from_proton(*c);
            }
        }
        _ => {
            state.ph_cells.fill(ph_from_proton(IonName::H.default_cell_conc()));
            state.ph_env.fill(ph_from_proton(IonName::H.default_env_conc()));
        }
    }
}

/// Shared view of row `a` and mutable view of row `b` (`a != b`).
pub(crate) fn pair_mut(rows: &mut [Vec<f64>], a: usize, b: usize) -> (&[f64], &mut [f64]) {
    if a < b {
        let (lo, hi) = rows.split_at_mut(b);
        (&lo[a], &mut hi[0])
    } else {
        let (lo, hi) = rows.split_at_mut(a);
        (&hi[0], &mut lo[b])
    }
}

/// Tissue-level setup applied after [`base_init`]: seeded protein noise and
/// checks that depend on the cluster geometry.
pub fn tissue_init(state: &mut SimState, cells: &Cells, p: &SimParams, rng: &mut StdRng) -> Result<()> {
    if p.static_noise > 0.0 {
        apply_protein_noise(state, p, p.static_noise, rng)?;
    }
    if p.deformation && p.deform_style == DeformStyle::Wave {
        check_wave_stability(cells, p)?;
    }
    state.rho_cells = get_charge_density(&state.cc_cells, &state.z, p);
    Ok(())
}

/// Gaussian perturbation of the cytosolic protein, one draw per cell.
///
/// Protein stays non-negative; when M is tracked it absorbs the charge change so
/// each cell stays neutral, and is itself kept non-negative.
pub fn apply_protein_noise(state: &mut SimState, p: &SimParams, level: f64, rng: &mut StdRng) -> Result<()> {
    let Some(i_p) = p.ion_table.index(IonName::P) else {
        return Ok(());
    };
    let normal = Normal::new(0.0, level)
        .map_err(|e| SimulationError::Config(format!("invalid noise level {}: {}", level, e)))?;
    let i_m = p.ion_table.index(IonName::M);
    let z_p = state.z[i_p];

    for c in 0..state.cc_cells[i_p].len() {
        let c_p = state.cc_cells[i_p][c];
        let mut dp = normal.sample(rng).max(-c_p);
        if let Some(i_m) = i_m {
            let z_m = state.z[i_m];
            let c_m = state.cc_cells[i_m][c];
            let mut dm = -z_p * dp / z_m;
            if c_m + dm < 0.0 {
                dm = -c_m;
                dp = -z_m * dm / z_p;
            }
            state.cc_cells[i_m][c] = c_m + dm;
        }
        state.cc_cells[i_p][c] = (c_p + dp).max(0.0);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::bicarbonate_ph;
    use crate::test_support::default_params;
    use bioelectric_common::{IonConfig, SimulationConfig};
    use rand::SeedableRng;

    #[test]
    fn arrays_match_the_cluster() {
        let p = default_params();
        let cells = Cells::new(&p).unwrap();
        let state = base_init(&cells, &p);
        assert_eq!(state.n_ions(), 4);
        assert_eq!(state.n_cells(), 7);
        assert_eq!(state.vm.len(), cells.n_sites());
        assert_eq!(state.fluxes_gj[0].len(), cells.n_gj());
        assert_eq!(state.cc_env[0].len(), cells.n_cells());
        assert!(state.cc_er.is_empty());
        assert!(state.dye.is_none());
        // The default ion set is electroneutral on both sides
        assert!(state.rho_cells.iter().all(|r| r.abs() < 1e-6));
        assert!(state.rho_env.iter().all(|r| r.abs() < 1e-6));
    }

    #[test]
    fn ecm_arrays_are_sized_to_the_grid() {
        let mut p = default_params();
        p.sim_ecm = true;
        let cells = Cells::new(&p).unwrap();
        let state = base_init(&cells, &p);
        let n_grid = cells.env_grid.as_ref().unwrap().len();
        assert_eq!(state.cc_env[0].len(), n_grid);
        assert_eq!(state.v_env.len(), n_grid);
        assert_eq!(state.dm_base[0].len(), cells.n_mems());
        assert_eq!(state.cc_cells[0].len(), cells.n_cells());
    }

    #[test]
    fn re_initialisation_is_bit_identical() {
        let mut p = default_params();
        p.voltage_dye = true;
        let cells = Cells::new(&p).unwrap();
        assert_eq!(base_init(&cells, &p), base_init(&cells, &p));
    }

    #[test]
    fn tracked_protons_follow_the_buffer() {
        let mut config = SimulationConfig::default();
        config.ions = [IonName::Na, IonName::K, IonName::H, IonName::M, IonName::P]
            .into_iter()
            .map(IonConfig::named)
            .collect();
        let p = config.get_sim_params();
        let cells = Cells::new(&p).unwrap();
        let state = base_init(&cells, &p);
        let i_h = p.ion_table.index(IonName::H).unwrap();
        let i_m = p.ion_table.index(IonName::M).unwrap();
        let expected = bicarbonate_ph(state.cc_cells[i_m][0], p.c_hm);
        assert!((state.ph_cells[0] - expected).abs() < 1e-12);
        assert!((ph_from_proton(state.cc_cells[i_h][0]) - expected).abs() < 1e-9);
    }

    #[test]
    fn seeded_noise_is_reproducible_and_charge_neutral() {
        let mut p = default_params();
        p.static_noise = 5.0;
        let cells = Cells::new(&p).unwrap();
        let run = || {
            let mut state = base_init(&cells, &p);
            let mut rng = StdRng::seed_from_u64(7);
            tissue_init(&mut state, &cells, &p, &mut rng).unwrap();
            state
        };
        let a = run();
        let b = run();
        assert_eq!(a, b);
        let i_p = p.ion_table.index(IonName::P).unwrap();
        assert!(a.cc_cells[i_p].iter().any(|c| (c - 80.0).abs() > 1e-9));
        assert!(a.cc_cells.iter().flatten().all(|c| *c >= 0.0));
        assert!(a.rho_cells.iter().all(|r| r.abs() < 1e-6));
    }

    #[test]
    fn wave_deformation_with_a_stiff_tissue_is_rejected() {
        let mut p = default_params();
        p.deformation = true;
        p.deform_style = DeformStyle::Wave;
        let cells = Cells::new(&p).unwrap();
        let mut state = base_init(&cells, &p);
        let mut rng = StdRng::seed_from_u64(0);
        let err = tissue_init(&mut state, &cells, &p, &mut rng).unwrap_err();
        assert!(err.to_string().contains("timing.dt"));
    }
}
