//! Bicarbonate buffer: the lumped anion `M` stands in for HCO3-, and a fixed
//! carbonic-acid proxy `c_hm` closes the Henderson-Hasselbalch relation.

use bioelectric_common::PKA_BICARBONATE;

/// `pH = 6.1 + log10([HCO3-] / [H2CO3])`.
pub fn bicarbonate_ph(c_m: f64, c_hm: f64) -> f64 {
    PKA_BICARBONATE + (c_m / c_hm).log10()
}

/// Free proton concentration for a given pH.
pub fn proton_conc(ph: f64) -> f64 {
    10f64.powf(-ph)
}

pub fn ph_from_proton(c_h: f64) -> f64 {
    -c_h.log10()
}

/// Re-equilibrates `c_h` and `ph` from the buffer anion, element-wise.
pub fn rebuffer(c_m: &[f64], c_hm: f64, c_h: &mut [f64], ph: &mut [f64]) {
    for ((m, h), ph) in c_m.iter().zip(c_h.iter_mut()).zip(ph.iter_mut()) {
        *ph = bicarbonate_ph(*m, c_hm);
        *h = proton_conc(*ph);
    }
}
