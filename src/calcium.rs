//! Endoplasmic-reticulum calcium store with calcium-induced calcium release.

use crate::cells::Cells;
use crate::charge::get_volt;
use crate::flux::electroflux_scalar;
use crate::pumps::pump_ca_er;
use crate::state::SimState;
use bioelectric_common::{hill, IonName, SimParams};

/// ER volume and membrane area of each cell.
pub fn er_geometry(cells: &Cells, p: &SimParams) -> (Vec<f64>, Vec<f64>) {
    let vol = cells.cell_vol.iter().map(|v| v * p.er.vol_frac).collect();
    let sa = cells.cell_sa.iter().map(|s| s * p.er.sa_frac).collect();
    (vol, sa)
}

/// ER membrane voltage from the charge of ER calcium and its fixed counter-anion.
pub fn er_voltage(state: &SimState, cells: &Cells, p: &SimParams) -> Vec<f64> {
    let (er_vol, er_sa) = er_geometry(cells, p);
    let q: Vec<f64> = state
        .cc_er
        .iter()
        .zip(&state.cc_er_m)
        .zip(&er_vol)
        .map(|((ca, m), vol)| p.f * (2.0 * ca - m) * vol)
        .collect();
    get_volt(&q, &er_sa, p)
}

/// One exchange step between cytosol and ER: SERCA-type uptake against
/// release through a calcium-activated (optionally IP3-gated) channel.
pub fn update_er(state: &mut SimState, cells: &Cells, p: &SimParams) {
    let Some(i_ca) = p.ion_table.index(IonName::Ca) else {
        return;
    };
    if state.cc_er.is_empty() {
        return;
    }
    let (er_vol, er_sa) = er_geometry(cells, p);
    state.v_er = er_voltage(state, cells, p);

    for c in 0..cells.n_cells() {
        let ca_cyto = state.cc_cells[i_ca][c];
        let ca_er = state.cc_er[c];
        let v_er = state.v_er[c];

        let uptake = pump_ca_er(ca_cyto, ca_er, v_er, p, 1.0);

        let mut gating = hill(ca_cyto, p.er.ca_act_k, p.er.ca_act_n);
        if let Some(ip3) = state.ip3.as_ref() {
            gating *= hill(ip3.cc_cells[c], p.er.ip3_k, 1.0);
        }
        let dm_er = p.er.dm_base + p.er.dm_max * gating;
        // Positive from ER into the cytosol; the cytosol is the voltage reference
        let release = electroflux_scalar(ca_er, ca_cyto, dm_er, p.tm, 2.0, -v_er, p, 1.0);

        let into_er = (uptake - release) * er_sa[c] * p.dt;
        state.cc_er[c] += into_er / er_vol[c];
        state.cc_cells[i_ca][c] -= into_er / cells.cell_vol[c];
    }
    state.v_er = er_voltage(state, cells, p);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::init::base_init;
    use crate::test_support::default_params;
    use bioelectric_common::{IonConfig, SimulationConfig};

    fn calcium_params() -> SimParams {
        let mut config = SimulationConfig::default();
        config.ions = [IonName::Na, IonName::K, IonName::Ca, IonName::M, IonName::P]
            .into_iter()
            .map(IonConfig::named)
            .collect();
        config.features.ca_dyn = true;
        config.get_sim_params()
    }

    #[test]
    fn resting_store_starts_neutral() {
        let p = calcium_params();
        let cells = Cells::new(&p).unwrap();
        let state = base_init(&cells, &p);
        assert!(er_voltage(&state, &cells, &p).iter().all(|v| v.abs() < 1e-15));
    }

    #[test]
    fn exchange_conserves_total_calcium() {
        let p = calcium_params();
        let cells = Cells::new(&p).unwrap();
        let mut state = base_init(&cells, &p);
        let i_ca = p.ion_table.index(IonName::Ca).unwrap();
        let (er_vol, _) = er_geometry(&cells, &p);
        let total = |s: &SimState| -> f64 {
            (0..cells.n_cells())
                .map(|c| s.cc_cells[i_ca][c] * cells.cell_vol[c] + s.cc_er[c] * er_vol[c])
                .sum()
        };
        let before = total(&state);
        for _ in 0..20 {
            update_er(&mut state, &cells, &p);
        }
        assert!(((total(&state) - before) / before).abs() < 1e-12);
        assert!(state.v_er.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn store_is_skipped_without_calcium() {
        let p = default_params();
        let cells = Cells::new(&p).unwrap();
        let mut state = base_init(&cells, &p);
        let before = state.clone();
        update_er(&mut state, &cells, &p);
        assert_eq!(state, before);
    }
}
