//! Gap-junction coupling between neighbouring cells.

use crate::cells::Cells;
use crate::flux::nernst_planck_flux;
use bioelectric_common::{step, SimParams};

/// Open fraction of every junction.
///
/// Voltage-sensitive junctions close as `|v_b - v_a|` rises past `gj_vthresh`
/// (soft step of width `gj_vgrad`), never below `gj_min`. `block` scales the result.
pub fn gj_open(v_cell: &[f64], cells: &Cells, p: &SimParams, block: f64) -> Vec<f64> {
    cells
        .gj_pairs
        .iter()
        .map(|&(a, b)| {
            if p.gj_voltage_sensitive {
                let dv = (v_cell[b] - v_cell[a]).abs();
                let closing = step(dv, p.gj_vthresh, p.gj_vgrad);
                block * (p.gj_min + (1.0 - p.gj_min) * (1.0 - closing))
            } else {
                block
            }
        })
        .collect()
}

/// Moves one species through the junctions for one time step.
///
/// `u_gj` is the fluid velocity along each junction tangent. Returns the junction
/// flux (mol/m^2/s, positive from the first cell of the pair to the second).
#[allow(clippy::too_many_arguments)]
pub fn update_gj(
    cc: &mut [f64],
    z: f64,
    free_diff: f64,
    v_cell: &[f64],
    gjopen: &[f64],
    u_gj: &[f64],
    cells: &Cells,
    p: &SimParams,
) -> Vec<f64> {
    let fluxes: Vec<f64> = cells
        .gj_pairs
        .iter()
        .enumerate()
        .map(|(j, &(a, b))| {
            let t = cells.gj_tangent[j];
            let len = cells.gj_len[j];
            let grad_c = (cc[b] - cc[a]) / len;
            let grad_v = (v_cell[b] - v_cell[a]) / len;
            let c_mid = 0.5 * (cc[a] + cc[b]);
            let u = u_gj.get(j).copied().unwrap_or(0.0);
            let (fx, fy) = nernst_planck_flux(
                c_mid,
                grad_c * t.x,
                grad_c * t.y,
                grad_v * t.x,
                grad_v * t.y,
                u * t.x,
                u * t.y,
                free_diff * gjopen[j],
                z,
                p,
            );
            fx * t.x + fy * t.y
        })
        .collect();

    // Scatter: what leaves one cell enters its partner
    for (j, &(a, b)) in cells.gj_pairs.iter().enumerate() {
        let moved = fluxes[j] * cells.gj_sa[j] * p.dt;
        cc[a] -= moved / cells.cell_vol[a];
        cc[b] += moved / cells.cell_vol[b];
    }
    fluxes
}
