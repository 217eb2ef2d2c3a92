//! ATP-driven pump kinetics.
//!
//! Each pump balances the free energy of ATP hydrolysis against the electrochemical work
//! of moving its substrates. Plasma-membrane pumps are linear in the free-energy surplus
//! `(dG_pump - halfmax)` and scaled by stoichiometric powers of their substrate
//! concentrations. Returned fluxes are positive into the cell (mol/m^2/s); `block` in
//! [0, 1] is the remaining pump activity.

use bioelectric_common::{step, SimParams};

// Floor for concentrations inside logarithms
const C_FLOOR: f64 = 1.0e-15;

fn rt_ln(p: &SimParams, num: f64, den: f64) -> f64 {
    p.r * p.t * (num.max(C_FLOOR) / den.max(C_FLOOR)).ln()
}

/// Free-energy surplus of the Na/K-ATPase (kJ/mol) for 3 Na out, 2 K in.
pub fn nak_free_energy(c_na_in: f64, c_na_out: f64, c_k_in: f64, c_k_out: f64, vm: f64, p: &SimParams) -> f64 {
    let dg_na = rt_ln(p, c_na_out, c_na_in) - p.f * vm;
    let dg_k = rt_ln(p, c_k_in, c_k_out) + p.f * vm;
    (p.delta_g_atp - (3.0 * dg_na + 2.0 * dg_k)) / 1000.0
}

/// Na/K-ATPase. Returns `(f_na, f_k)`.
pub fn pump_nak_atp(
    c_na_in: f64,
    c_na_out: f64,
    c_k_in: f64,
    c_k_out: f64,
    vm: f64,
    p: &SimParams,
    block: f64,
) -> (f64, f64) {
    let dg_pump = nak_free_energy(c_na_in, c_na_out, c_k_in, c_k_out, vm, p);
    let alpha = block * p.alpha_nak * (dg_pump - p.halfmax_nak);
    let f_na = -alpha * c_na_in.max(0.0).powf(p.nak_na_exp) * c_k_out.max(0.0).powf(p.nak_k_exp);
    let f_k = -(2.0 / 3.0) * f_na;
    (f_na, f_k)
}

/// Plasma-membrane Ca-ATPase, one Ca out per ATP. Returns `f_ca`.
pub fn pump_ca_atp(c_ca_in: f64, c_ca_out: f64, vm: f64, p: &SimParams, block: f64) -> f64 {
    let dg_ca = rt_ln(p, c_ca_out, c_ca_in) - 2.0 * p.f * vm;
    let dg_pump = (p.delta_g_atp - dg_ca) / 1000.0;
    let alpha = block * p.alpha_ca * (dg_pump - p.halfmax_ca);
    -alpha * c_ca_in.max(0.0).powf(p.ca_exp)
}

/// Electroneutral H/K-ATPase, H out and K in. Returns `(f_h, f_k)`.
pub fn pump_hk_atp(
    c_h_in: f64,
    c_h_out: f64,
    c_k_in: f64,
    c_k_out: f64,
    vm: f64,
    p: &SimParams,
    block: f64,
) -> (f64, f64) {
    let dg_h = rt_ln(p, c_h_out, c_h_in) - p.f * vm;
    let dg_k = rt_ln(p, c_k_in, c_k_out) + p.f * vm;
    let dg_pump = (p.delta_g_atp - (dg_h + dg_k)) / 1000.0;
    let alpha = block * p.alpha_hk * (dg_pump - p.halfmax_hk);
    let f_h = -alpha * c_h_in.max(0.0).powf(p.hk_h_exp) * c_k_out.max(0.0).powf(p.hk_k_exp);
    (f_h, -f_h)
}

/// Electrogenic V-ATPase, H out. Returns `f_h`.
pub fn pump_v_atp(c_h_in: f64, c_h_out: f64, vm: f64, p: &SimParams, block: f64) -> f64 {
    let dg_h = rt_ln(p, c_h_out, c_h_in) - p.f * vm;
    let dg_pump = (p.delta_g_atp - dg_h) / 1000.0;
    let alpha = block * p.alpha_v * (dg_pump - p.halfmax_v);
    -alpha * c_h_in.max(0.0).powf(p.v_h_exp)
}

/// SERCA-type ER uptake, cytosol to ER. Positive is into the ER.
///
/// Unlike the plasma-membrane pumps this one saturates: activity follows a logistic
/// step of the free-energy surplus around `halfmax_er` with width `slope_er`.
pub fn pump_ca_er(c_ca_cyto: f64, c_ca_er: f64, v_er: f64, p: &SimParams, block: f64) -> f64 {
    let dg_ca = rt_ln(p, c_ca_er, c_ca_cyto) + 2.0 * p.f * v_er;
    let dg_pump = (p.delta_g_atp - dg_ca) / 1000.0;
    let alpha = block * p.er.alpha_er * step(dg_pump, p.er.halfmax_er, p.er.slope_er);
    alpha * c_ca_cyto.max(0.0)
}
