//! Electrodiffusive flux laws.
//!
//! Two laws are used: the Goldman-Hodgkin-Katz expression across membranes, where the
//! potential drop over the distance `d` is large, and the linearised Nernst-Planck flux
//! for gap junctions and the extracellular grid, where neighbouring points differ by a
//! small potential. Fluxes are in mol/(m^2 s).

use bioelectric_common::SimParams;

/// GHK flux from compartment A (outside) into compartment B (inside).
///
/// `v_ba` is V_B - V_A. `rho` scales the diffusion constant (local channel density).
/// At exactly zero driving force the expression degenerates to 0/0 and Fick's law is
/// used instead.
#[allow(clippy::too_many_arguments)]
pub fn electroflux_scalar(
    c_a: f64,
    c_b: f64,
    dc: f64,
    d: f64,
    zc: f64,
    v_ba: f64,
    p: &SimParams,
    rho: f64,
) -> f64 {
    let dc = rho * dc;
    let alpha = zc * v_ba * p.f / (p.r * p.t);
    // 1 - exp(-alpha), exact near zero
    let denom = -(-alpha).exp_m1();
    if denom == 0.0 {
        -(dc / d) * (c_b - c_a)
    } else {
        let exp_alpha = (-alpha).exp();
        -(dc * alpha / d) * (c_b - c_a * exp_alpha) / denom
    }
}

/// Element-wise GHK flux over all sites. Each element takes its own branch.
#[allow(clippy::too_many_arguments)]
pub fn electroflux(
    c_a: &[f64],
    c_b: &[f64],
    dc: &[f64],
    d: f64,
    zc: f64,
    v_ba: &[f64],
    p: &SimParams,
    rho: Option<&[f64]>,
) -> Vec<f64> {
    (0..c_b.len())
        .map(|i| {
            let rho_i = rho.map_or(1.0, |r| r[i]);
            electroflux_scalar(c_a[i], c_b[i], dc[i], d, zc, v_ba[i], p, rho_i)
        })
        .collect()
}

/// Linearised Nernst-Planck flux: diffusion, electromigration and advection.
///
/// Returns the (x, y) flux for concentration `c` with concentration gradient
/// `(gcx, gcy)`, potential gradient `(gvx, gvy)` and fluid velocity `(ux, uy)`.
#[allow(clippy::too_many_arguments)]
pub fn nernst_planck_flux(
    c: f64,
    gcx: f64,
    gcy: f64,
    gvx: f64,
    gvy: f64,
    ux: f64,
    uy: f64,
    diff: f64,
    z: f64,
    p: &SimParams,
) -> (f64, f64) {
    let alpha = diff * z * p.q / (p.kb * p.t);
    let fx = -diff * gcx - alpha * gvx * c + ux * c;
    let fy = -diff * gcy - alpha * gvy * c + uy * c;
    (fx, fy)
}

/// Nernst-Planck flux on staggered faces: x and y faces carry their own
/// concentration and diffusion constant.
#[allow(clippy::too_many_arguments)]
pub fn np_flux_special(
    cx: f64,
    cy: f64,
    gcx: f64,
    gcy: f64,
    gvx: f64,
    gvy: f64,
    ux: f64,
    uy: f64,
    dx: f64,
    dy: f64,
    z: f64,
    p: &SimParams,
) -> (f64, f64) {
    let beta = z * p.q / (p.kb * p.t);
    let fx = -dx * gcx - dx * beta * gvx * cx + ux * cx;
    let fy = -dy * gcy - dy * beta * gvy * cy + uy * cy;
    (fx, fy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::default_params;

    #[test]
    fn zero_voltage_is_pure_fick() {
        let p = default_params();
        let (c_a, c_b, dc, d) = (145.0, 8.66, 1.0e-18, 7.5e-9);
        let flux = electroflux_scalar(c_a, c_b, dc, d, 1.0, 0.0, &p, 1.0);
        assert_eq!(flux, -(dc / d) * (c_b - c_a));
        assert!(flux > 0.0, "inward gradient gives inward flux");
    }

    #[test]
    fn no_jump_at_the_zero_voltage_branch() {
        let p = default_params();
        let (c_a, c_b, dc, d) = (5.0, 125.0, 15.0e-18, 7.5e-9);
        let fick = electroflux_scalar(c_a, c_b, dc, d, 1.0, 0.0, &p, 1.0);
        for v in [1e-9, -1e-9] {
            let near = electroflux_scalar(c_a, c_b, dc, d, 1.0, v, &p, 1.0);
            assert!(((near - fick) / fick).abs() < 1e-6, "v = {v}: {near} vs {fick}");
        }
    }

    #[test]
    fn vector_form_bifurcates_per_element() {
        let p = default_params();
        let c_a = [145.0, 145.0, 145.0];
        let c_b = [10.0, 10.0, 10.0];
        let dc = [1.0e-18; 3];
        let v = [0.0, -0.07, 0.03];
        let flux = electroflux(&c_a, &c_b, &dc, 7.5e-9, 1.0, &v, &p, None);
        for i in 0..3 {
            let expected = electroflux_scalar(c_a[i], c_b[i], dc[i], 7.5e-9, 1.0, v[i], &p, 1.0);
            assert_eq!(flux[i], expected);
            assert!(flux[i].is_finite());
        }
        // A negative interior pulls cations in harder than no voltage does
        assert!(flux[1] > flux[0]);
        assert!(flux[2] < flux[0]);
    }

    #[test]
    fn ghk_flux_vanishes_at_nernst_potential() {
        let p = default_params();
        let (c_out, c_in) = (5.0_f64, 125.0_f64);
        // V_in - V_out at equilibrium for a cation
        let e_k = p.thermal_voltage() * (c_out / c_in).ln();
        let flux = electroflux_scalar(c_out, c_in, 1.0e-17, 7.5e-9, 1.0, e_k, &p, 1.0);
        assert!(flux.abs() < 1e-18);
    }

    #[test]
    fn rho_scales_flux_linearly() {
        let p = default_params();
        let base = electroflux_scalar(100.0, 10.0, 1e-18, 7.5e-9, 1.0, -0.05, &p, 1.0);
        let doubled = electroflux_scalar(100.0, 10.0, 1e-18, 7.5e-9, 1.0, -0.05, &p, 2.0);
        assert!((doubled - 2.0 * base).abs() < 1e-12 * base.abs());
    }

    #[test]
    fn nernst_planck_terms_add() {
        let p = default_params();
        let (fx, fy) = nernst_planck_flux(10.0, 1.0, 0.0, 0.0, 0.0, 0.0, 2.0e-6, 1.0e-9, 1.0, &p);
        assert!((fx + 1.0e-9).abs() < 1e-20);
        assert!((fy - 2.0e-5).abs() < 1e-18);

        // Electromigration pushes cations down the potential
        let (fx, _) = nernst_planck_flux(10.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0e-9, 1.0, &p);
        assert!(fx < 0.0);
        let (fx_special, _) =
            np_flux_special(10.0, 10.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0e-9, 1.0e-9, 1.0, &p);
        assert!((fx - fx_special).abs() < 1e-15);
    }
}
