//! Charge and voltage accounting for the lumped-capacitor membrane model.

use bioelectric_common::SimParams;

/// Net charge density `sum_i F z_i c_i` (C/m^3) at every spatial point.
///
/// `concentrations` is indexed `[ion][point]`; `zs` holds one valence per ion.
pub fn get_charge_density(concentrations: &[Vec<f64>], zs: &[f64], p: &SimParams) -> Vec<f64> {
    let n = concentrations.first().map_or(0, |c| c.len());
    let mut rho = vec![0.0; n];
    for (cc, &z) in concentrations.iter().zip(zs) {
        for (r, &c) in rho.iter_mut().zip(cc) {
            *r += p.f * z * c;
        }
    }
    rho
}

/// Net charge (C) in every compartment of volume `vol`.
pub fn get_charge(concentrations: &[Vec<f64>], zs: &[f64], vol: &[f64], p: &SimParams) -> Vec<f64> {
    get_charge_density(concentrations, zs, p)
        .iter()
        .zip(vol)
        .map(|(rho, v)| rho * v)
        .collect()
}

/// Voltage of a charged capacitor plate of area `sa`: `V = q / (sa * cm)`.
pub fn get_volt(q: &[f64], sa: &[f64], p: &SimParams) -> Vec<f64> {
    q.iter().zip(sa).map(|(q, sa)| q / (sa * p.cm)).collect()
}

/// Concentric-plate membrane voltage from charge density: `rho * vol / (cm * sa)`.
pub fn lumped_vm(rho: &[f64], vol: &[f64], sa: &[f64], p: &SimParams) -> Vec<f64> {
    rho.iter()
        .zip(vol)
        .zip(sa)
        .map(|((rho, vol), sa)| rho * vol / (p.cm * sa))
        .collect()
}
