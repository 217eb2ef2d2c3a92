use crate::config::DynamicsConfig;
use crate::ions::{IonName, IonTable};
use serde::{Deserialize, Serialize};

pub const FARADAY: f64 = 96485.3329; // C/mol
pub const GAS_CONSTANT: f64 = 8.314462618; // J/(mol K)
pub const ELEMENTARY_CHARGE: f64 = 1.602176634e-19; // C
pub const BOLTZMANN: f64 = 1.380649e-23; // J/K
/// pKa of the bicarbonate buffer.
pub const PKA_BICARBONATE: f64 = 6.1;

/// How mechanical deformation is solved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeformStyle {
    /// Quasi-static Poisson solve every step.
    Steady,
    /// Damped elastic wave equation, explicit in time.
    Wave,
}

/// Resolved per-ion physical properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IonSpec {
    pub name: IonName,
    pub z: f64,
    pub free_diff: f64,
    pub cell_conc: f64,
    pub env_conc: f64,
    pub mem_perm: f64,
}

/// A tracked signalling species (voltage dye, IP3) that does not contribute to charge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MorphogenSpec {
    pub name: String,
    pub z: f64,
    pub mem_perm: f64,
    pub free_diff: f64,
    pub cell_conc: f64,
    pub env_conc: f64,
    /// First-order decay (1/s).
    pub decay_rate: f64,
    /// Constant cytosolic production (mol/m^3/s).
    pub production_rate: f64,
}

/// Endoplasmic-reticulum calcium store parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErParams {
    pub vol_frac: f64,
    pub sa_frac: f64,
    pub ca_init: f64,
    pub alpha_er: f64,
    pub halfmax_er: f64,
    pub slope_er: f64,
    pub dm_base: f64,
    pub dm_max: f64,
    pub ca_act_k: f64,
    pub ca_act_n: f64,
    pub ip3_k: f64,
}

/// Runtime parameters derived from the configuration, read by every numeric routine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimParams {
    // Physical constants
    pub f: f64,
    pub r: f64,
    pub t: f64,
    pub q: f64,
    pub kb: f64,
    pub cm: f64, // Membrane capacitance (F/m^2)
    pub tm: f64, // Membrane thickness (m)

    // Time
    pub dt: f64,
    pub init_tsteps: u32,
    pub sim_tsteps: u32,
    pub t_resample: u32,

    // Cluster geometry
    pub cell_radius: f64,
    pub cell_height: f64,
    pub cell_spacing: f64,
    pub cluster_radius: f64,
    pub mems_per_cell: usize,

    // Ions
    pub ions: Vec<IonSpec>,
    pub ion_table: IonTable,
    pub env_volume_factor: f64,
    pub c_hm: f64, // Carbonic-acid proxy for the bicarbonate buffer (mol/m^3)

    // Gap junctions
    pub gj_enabled: bool,
    pub gj_voltage_sensitive: bool,
    pub gj_vthresh: f64,
    pub gj_vgrad: f64,
    pub gj_surface: f64,
    pub gj_min: f64,

    // Pumps
    pub delta_g_atp: f64,
    pub alpha_nak: f64,
    pub halfmax_nak: f64,
    pub nak_na_exp: f64,
    pub nak_k_exp: f64,
    pub alpha_ca: f64,
    pub halfmax_ca: f64,
    pub ca_exp: f64,
    pub alpha_hk: f64,
    pub halfmax_hk: f64,
    pub hk_h_exp: f64,
    pub hk_k_exp: f64,
    pub alpha_v: f64,
    pub halfmax_v: f64,
    pub v_h_exp: f64,

    // Feature toggles
    pub sim_ecm: bool,
    pub fluid_flow: bool,
    pub deformation: bool,
    pub deform_style: DeformStyle,
    pub sim_eosmosis: bool,
    pub ca_dyn: bool,
    pub voltage_dye: bool,
    pub ip3: bool,
    pub hk_atpase: bool,
    pub v_atpase: bool,
    pub dynamic_noise: bool,
    pub osmotic_pressure: bool,
    pub electrostatic_pressure: bool,

    // Extracellular grid
    pub grid_size: f64,
    pub grid_margin: f64,
    pub closed_bound: bool,
    pub env_tortuosity: f64,
    pub env_capacitance: f64,
    pub smoothing_sigma: f64,

    // Mechanics
    pub viscosity: f64,
    pub flow_permeability: f64,
    pub youngs_modulus: f64,
    pub mass_density: f64,
    pub deform_damping: f64,

    // Electroosmosis
    pub d_membrane: f64,
    pub z_pump: f64,
    pub z_channel: f64,

    pub er: ErParams,
    pub dye: MorphogenSpec,
    pub ip3_spec: MorphogenSpec,

    // Noise
    pub seed: u64,
    pub static_noise: f64,
    pub dynamic_noise_level: f64,

    pub dynamics: DynamicsConfig,
}

impl SimParams {
    pub fn ion(&self, name: IonName) -> Option<&IonSpec> {
        self.ion_table.index(name).map(|i| &self.ions[i])
    }

    pub fn n_ions(&self) -> usize {
        self.ions.len()
    }

    /// Valences of all tracked ions in slot order.
    pub fn valences(&self) -> Vec<f64> {
        self.ions.iter().map(|ion| ion.z).collect()
    }

    /// Thermal voltage RT/F (V).
    pub fn thermal_voltage(&self) -> f64 {
        self.r * self.t / self.f
    }

    /// Largest diffusion constant that moves on the environmental grid.
    pub fn max_env_diffusion(&self) -> f64 {
        let mut d_max = self.ions.iter().map(|ion| ion.free_diff).fold(0.0, f64::max);
        if self.voltage_dye {
            d_max = d_max.max(self.dye.free_diff);
        }
        if self.ip3 {
            d_max = d_max.max(self.ip3_spec.free_diff);
        }
        d_max * self.env_tortuosity
    }
}
