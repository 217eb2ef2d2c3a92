use crate::ions::{IonName, IonTable};
use crate::sim_params::{
    DeformStyle, ErParams, IonSpec, MorphogenSpec, SimParams, BOLTZMANN, ELEMENTARY_CHARGE,
    FARADAY, GAS_CONSTANT,
};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

// Physical environment of the simulation
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct PhysicsConfig {
    #[serde(default = "default_temperature")]
    pub temperature_k: f64,
    #[serde(default = "default_membrane_capacitance")]
    pub membrane_capacitance: f64, // F/m^2
    #[serde(default = "default_membrane_thickness")]
    pub membrane_thickness: f64, // m
    #[serde(default = "default_env_volume_factor")]
    pub env_volume_factor: f64, // Lumped environment volume per cell volume (no ECM)
    #[serde(default = "default_c_hm")]
    pub carbonic_acid: f64, // mol/m^3
}

// Configuration for timing
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct TimingConfig {
    pub dt: f64, // s
    pub init_tsteps: u32,
    #[serde(default)]
    pub sim_tsteps: u32,
    #[serde(default = "default_t_resample")]
    pub t_resample: u32, // Steps between recorded samples
}

// Geometry of the cell cluster
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ClusterConfig {
    #[serde(default = "default_cell_radius")]
    pub cell_radius: f64,
    #[serde(default = "default_cell_height")]
    pub cell_height: f64,
    #[serde(default = "default_cell_spacing")]
    pub cell_spacing: f64,
    #[serde(default = "default_cluster_radius")]
    pub cluster_radius: f64,
    #[serde(default = "default_mems_per_cell")]
    pub mems_per_cell: usize,
}

// One tracked ion; unset values fall back to the species defaults
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct IonConfig {
    pub name: IonName,
    #[serde(default)]
    pub cell_conc: Option<f64>,
    #[serde(default)]
    pub env_conc: Option<f64>,
    #[serde(default)]
    pub mem_perm: Option<f64>,
    #[serde(default)]
    pub free_diff: Option<f64>,
}

impl IonConfig {
    pub fn named(name: IonName) -> Self {
        IonConfig { name, cell_conc: None, env_conc: None, mem_perm: None, free_diff: None }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct GapJunctionConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub voltage_sensitive: bool,
    #[serde(default = "default_gj_vthresh")]
    pub vthresh: f64, // V
    #[serde(default = "default_gj_vgrad")]
    pub vgrad: f64, // V
    #[serde(default = "default_gj_surface")]
    pub surface_fraction: f64,
    #[serde(default)]
    pub min_open: f64,
}

// Pump calibration; free energies in J/mol, halfmax values in kJ/mol
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct PumpConfig {
    #[serde(default = "default_delta_g_atp")]
    pub delta_g_atp: f64,
    #[serde(default = "default_alpha_nak")]
    pub alpha_nak: f64,
    #[serde(default)]
    pub halfmax_nak: f64,
    #[serde(default = "default_half")]
    pub nak_na_exp: f64,
    #[serde(default = "default_half")]
    pub nak_k_exp: f64,
    #[serde(default = "default_alpha_ca")]
    pub alpha_ca: f64,
    #[serde(default)]
    pub halfmax_ca: f64,
    #[serde(default = "default_one")]
    pub ca_exp: f64,
    #[serde(default = "default_alpha_hk")]
    pub alpha_hk: f64,
    #[serde(default)]
    pub halfmax_hk: f64,
    #[serde(default = "default_one")]
    pub hk_h_exp: f64,
    #[serde(default = "default_half")]
    pub hk_k_exp: f64,
    #[serde(default = "default_alpha_v")]
    pub alpha_v: f64,
    #[serde(default)]
    pub halfmax_v: f64,
    #[serde(default = "default_one")]
    pub v_h_exp: f64,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct FeatureConfig {
    #[serde(default)]
    pub sim_ecm: bool,
    #[serde(default)]
    pub fluid_flow: bool,
    #[serde(default)]
    pub deformation: bool,
    #[serde(default = "default_deform_style")]
    pub deform_style: String, // "steady" or "wave"
    #[serde(default)]
    pub sim_eosmosis: bool,
    #[serde(default)]
    pub ca_dyn: bool,
    #[serde(default)]
    pub voltage_dye: bool,
    #[serde(default)]
    pub ip3: bool,
    #[serde(default)]
    pub hk_atpase: bool,
    #[serde(default)]
    pub v_atpase: bool,
    #[serde(default)]
    pub dynamic_noise: bool,
    #[serde(default)]
    pub osmotic_pressure: bool,
    #[serde(default)]
    pub electrostatic_pressure: bool,
}

// Extracellular grid settings (used when features.sim_ecm is set)
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct EcmConfig {
    #[serde(default = "default_grid_size")]
    pub grid_size: f64,
    #[serde(default = "default_grid_margin")]
    pub margin: f64,
    #[serde(default = "default_true")]
    pub closed_bound: bool,
    #[serde(default = "default_half")]
    pub env_tortuosity: f64,
    #[serde(default = "default_env_capacitance")]
    pub env_capacitance: f64, // F/m^2 of grid face, coupling to ground
    #[serde(default = "default_one")]
    pub smoothing_sigma: f64, // In grid cells; 0 disables smoothing
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct MechanicsConfig {
    #[serde(default = "default_viscosity")]
    pub viscosity: f64,
    #[serde(default = "default_flow_permeability")]
    pub flow_permeability: f64,
    #[serde(default = "default_youngs_modulus")]
    pub youngs_modulus: f64,
    #[serde(default = "default_mass_density")]
    pub mass_density: f64,
    #[serde(default = "default_deform_damping")]
    pub damping: f64,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct EosmosisConfig {
    #[serde(default = "default_d_membrane")]
    pub d_membrane: f64,
    #[serde(default = "default_one")]
    pub z_pump: f64,
    #[serde(default = "default_minus_one")]
    pub z_channel: f64,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct CalciumErConfig {
    #[serde(default = "default_er_vol_frac")]
    pub vol_frac: f64,
    #[serde(default = "default_half")]
    pub sa_frac: f64,
    #[serde(default = "default_half")]
    pub ca_init: f64,
    #[serde(default = "default_alpha_er")]
    pub alpha_er: f64,
    #[serde(default = "default_halfmax_er")]
    pub halfmax_er: f64,
    #[serde(default = "default_slope_er")]
    pub slope_er: f64,
    #[serde(default = "default_dm_er_base")]
    pub dm_base: f64,
    #[serde(default = "default_dm_er_max")]
    pub dm_max: f64,
    #[serde(default = "default_ca_act_k")]
    pub ca_act_k: f64,
    #[serde(default = "default_ca_act_n")]
    pub ca_act_n: f64,
    #[serde(default = "default_ip3_k")]
    pub ip3_k: f64,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct MorphogenConfig {
    pub z: f64,
    #[serde(default)]
    pub mem_perm: f64,
    pub free_diff: f64,
    #[serde(default)]
    pub cell_conc: f64,
    #[serde(default)]
    pub env_conc: f64,
    #[serde(default)]
    pub decay_rate: f64,
    #[serde(default)]
    pub production_rate: f64,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct MorphogensConfig {
    #[serde(default = "default_dye")]
    pub dye: MorphogenConfig,
    #[serde(default = "default_ip3")]
    pub ip3: MorphogenConfig,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct NoiseConfig {
    #[serde(default)]
    pub seed: u64,
    #[serde(default)]
    pub static_level: f64, // Std-dev of initial protein perturbation (mol/m^3)
    #[serde(default)]
    pub dynamic_level: f64, // Std-dev of per-step protein perturbation (mol/m^3)
}

/// Time window shared by scheduled interventions.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct TimeWindow {
    pub t_on: f64,
    pub t_off: f64,
    #[serde(default = "default_t_change")]
    pub t_change: f64,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct ScheduledChannelConfig {
    pub ion: IonName,
    pub multiplier: f64,
    #[serde(flatten)]
    pub window: TimeWindow,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct VoltageGatedConfig {
    pub ion: IonName,
    pub max_multiplier: f64,
    pub v_half: f64,
    pub v_width: f64,
    // Channel only opens while the membrane depolarises faster than this (V/s)
    #[serde(default)]
    pub dvm_threshold: Option<f64>,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct CalciumActivatedConfig {
    pub ion: IonName,
    pub max_multiplier: f64,
    pub ca_half: f64,
    #[serde(default = "default_ca_act_n")]
    pub hill_n: f64,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockTarget {
    NaKATPase,
    GapJunction,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct ScheduledBlockConfig {
    pub target: BlockTarget,
    pub amount: f64, // Fraction blocked at full effect, 0-1
    #[serde(flatten)]
    pub window: TimeWindow,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub struct DynamicsConfig {
    #[serde(default)]
    pub scheduled: Vec<ScheduledChannelConfig>,
    #[serde(default)]
    pub voltage_gated: Vec<VoltageGatedConfig>,
    #[serde(default)]
    pub calcium_activated: Vec<CalciumActivatedConfig>,
    #[serde(default)]
    pub blocks: Vec<ScheduledBlockConfig>,
}

impl DynamicsConfig {
    pub fn is_empty(&self) -> bool {
        self.scheduled.is_empty()
            && self.voltage_gated.is_empty()
            && self.calcium_activated.is_empty()
            && self.blocks.is_empty()
    }
}

// Configuration for output settings
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct OutputConfig {
    #[serde(default = "default_base_filename")]
    pub base_filename: String,
    #[serde(default = "default_cache_dir")]
    pub cache_dir: String,
    pub format: Option<String>, // Output format: "json", "bincode", "messagepack"
    #[serde(default)]
    pub save_vm_csv: bool,
}

// Main simulation configuration structure, loaded from config.toml.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct SimulationConfig {
    #[serde(default)]
    pub physics: PhysicsConfig,
    pub timing: TimingConfig,
    #[serde(default)]
    pub cluster: ClusterConfig,
    #[serde(default = "default_ions")]
    pub ions: Vec<IonConfig>,
    #[serde(default)]
    pub gap_junctions: GapJunctionConfig,
    #[serde(default)]
    pub pumps: PumpConfig,
    #[serde(default)]
    pub features: FeatureConfig,
    #[serde(default)]
    pub ecm: EcmConfig,
    #[serde(default)]
    pub mechanics: MechanicsConfig,
    #[serde(default)]
    pub eosmosis: EosmosisConfig,
    #[serde(default)]
    pub calcium_er: CalciumErConfig,
    #[serde(default)]
    pub morphogens: MorphogensConfig,
    #[serde(default)]
    pub noise: NoiseConfig,
    #[serde(default)]
    pub dynamics: DynamicsConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

impl SimulationConfig {
    /// Loads the simulation configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();

        let config_str = std::fs::read_to_string(path_ref)
            .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path_ref.display(), e))?;
        let config = Self::from_toml_str(&config_str)
            .map_err(|e| anyhow::anyhow!("Invalid configuration in '{}': {}", path_ref.display(), e))?;
        Ok(config)
    }

    /// Parses and validates a configuration held in memory.
    pub fn from_toml_str(config_str: &str) -> Result<Self> {
        let config: SimulationConfig = toml::from_str(config_str)
            .map_err(|e| anyhow::anyhow!("Failed to parse TOML: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the contract the solver relies on; every message names the key to change.
    pub fn validate(&self) -> Result<()> {
        if self.timing.dt <= 0.0 {
            anyhow::bail!("timing.dt must be positive.");
        }
        if self.timing.t_resample == 0 {
            anyhow::bail!("timing.t_resample must be at least 1.");
        }
        if self.cluster.cell_radius <= 0.0 || self.cluster.cell_height <= 0.0 {
            anyhow::bail!("cluster.cell_radius and cluster.cell_height must be positive.");
        }
        if self.cluster.mems_per_cell < 3 {
            anyhow::bail!("cluster.mems_per_cell must be at least 3.");
        }
        if self.cluster.cluster_radius < 0.0 {
            anyhow::bail!("cluster.cluster_radius must not be negative.");
        }
        if !self.ions.iter().any(|ion| ion.name.is_mobile()) {
            anyhow::bail!("At least one mobile ion (anything but P) must be listed in [[ions]].");
        }
        for ion in &self.ions {
            let negative = [ion.cell_conc, ion.env_conc, ion.mem_perm, ion.free_diff]
                .iter()
                .flatten()
                .any(|v| *v < 0.0);
            if negative {
                anyhow::bail!("Ion {} has a negative concentration or diffusion constant.", ion.name);
            }
        }
        let (cell_m, env_m) = self.anion_balance();
        let tracks_m = self.ions.iter().any(|ion| ion.name == IonName::M);
        if tracks_m && (cell_m < 0.0 || env_m < 0.0) {
            anyhow::bail!(
                "Cannot balance charge with the M anion (cell {:.3}, env {:.3} mol/m^3); add M or lower the anion concentrations.",
                cell_m, env_m
            );
        }
        if !(0.0..=1.0).contains(&self.gap_junctions.min_open) {
            anyhow::bail!("gap_junctions.min_open must lie in [0, 1].");
        }
        match self.features.deform_style.as_str() {
            "steady" | "wave" => {}
            other => anyhow::bail!(
                "Unsupported deformation style '{}'; use \"steady\" or \"wave\".",
                other
            ),
        }
        for block in &self.dynamics.blocks {
            if !(0.0..=1.0).contains(&block.amount) {
                anyhow::bail!("dynamics.blocks amount must lie in [0, 1].");
            }
        }
        for channel in &self.dynamics.scheduled {
            if channel.multiplier < 0.0 {
                anyhow::bail!("dynamics.scheduled multiplier for {} must not be negative.", channel.ion);
            }
        }
        if self.features.sim_ecm {
            if self.ecm.grid_size <= 0.0 {
                anyhow::bail!("ecm.grid_size must be positive.");
            }
            let params = self.get_sim_params();
            let d_max = params.max_env_diffusion();
            let courant = d_max * params.dt / (params.grid_size * params.grid_size);
            if courant > 0.25 {
                let dt_max = 0.25 * params.grid_size * params.grid_size / d_max;
                anyhow::bail!(
                    "Environmental diffusion is unstable (D*dt/dx^2 = {:.3} > 0.25); reduce timing.dt to at most {:.3e} s or increase ecm.grid_size.",
                    courant, dt_max
                );
            }
        }
        Ok(())
    }

    /// Concentrations of M that make cell and environment electroneutral.
    fn anion_balance(&self) -> (f64, f64) {
        let mut cell = 0.0;
        let mut env = 0.0;
        for ion in self.ions.iter().filter(|ion| ion.name != IonName::M) {
            let z = ion.name.valence();
            cell += z * ion.cell_conc.unwrap_or_else(|| ion.name.default_cell_conc());
            env += z * ion.env_conc.unwrap_or_else(|| ion.name.default_env_conc());
        }
        (cell, env)
    }

    /// Converts the configuration into simulation parameters used at runtime.
    pub fn get_sim_params(&self) -> SimParams {
        let (cell_m, env_m) = self.anion_balance();
        let ions: Vec<IonSpec> = self
            .ions
            .iter()
            .map(|ion| {
                let (default_cell, default_env) = if ion.name == IonName::M {
                    (cell_m.max(0.0), env_m.max(0.0))
                } else {
                    (ion.name.default_cell_conc(), ion.name.default_env_conc())
                };
                IonSpec {
                    name: ion.name,
                    z: ion.name.valence(),
                    free_diff: ion.free_diff.unwrap_or_else(|| ion.name.free_diffusion()),
                    cell_conc: ion.cell_conc.unwrap_or(default_cell),
                    env_conc: ion.env_conc.unwrap_or(default_env),
                    mem_perm: ion.mem_perm.unwrap_or_else(|| ion.name.default_mem_perm()),
                }
            })
            .collect();
        let names: Vec<IonName> = self.ions.iter().map(|ion| ion.name).collect();
        let ion_table = IonTable::new(&names);
        // Duplicated entries keep their first definition
        let ions = ion_table
            .names()
            .iter()
            .filter_map(|name| ions.iter().find(|spec| spec.name == *name).cloned())
            .collect();

        let deform_style = match self.features.deform_style.as_str() {
            "wave" => DeformStyle::Wave,
            _ => DeformStyle::Steady,
        };

        SimParams {
            f: FARADAY,
            r: GAS_CONSTANT,
            t: self.physics.temperature_k,
            q: ELEMENTARY_CHARGE,
            kb: BOLTZMANN,
            cm: self.physics.membrane_capacitance,
            tm: self.physics.membrane_thickness,
            dt: self.timing.dt,
            init_tsteps: self.timing.init_tsteps,
            sim_tsteps: self.timing.sim_tsteps,
            t_resample: self.timing.t_resample.max(1),
            cell_radius: self.cluster.cell_radius,
            cell_height: self.cluster.cell_height,
            cell_spacing: self.cluster.cell_spacing,
            cluster_radius: self.cluster.cluster_radius,
            mems_per_cell: self.cluster.mems_per_cell,
            ions,
            ion_table,
            env_volume_factor: self.physics.env_volume_factor,
            c_hm: self.physics.carbonic_acid,
            gj_enabled: self.gap_junctions.enabled,
            gj_voltage_sensitive: self.gap_junctions.voltage_sensitive,
            gj_vthresh: self.gap_junctions.vthresh,
            gj_vgrad: self.gap_junctions.vgrad,
            gj_surface: self.gap_junctions.surface_fraction,
            gj_min: self.gap_junctions.min_open,
            delta_g_atp: self.pumps.delta_g_atp,
            alpha_nak: self.pumps.alpha_nak,
            halfmax_nak: self.pumps.halfmax_nak,
            nak_na_exp: self.pumps.nak_na_exp,
            nak_k_exp: self.pumps.nak_k_exp,
            alpha_ca: self.pumps.alpha_ca,
            halfmax_ca: self.pumps.halfmax_ca,
            ca_exp: self.pumps.ca_exp,
            alpha_hk: self.pumps.alpha_hk,
            halfmax_hk: self.pumps.halfmax_hk,
            hk_h_exp: self.pumps.hk_h_exp,
            hk_k_exp: self.pumps.hk_k_exp,
            alpha_v: self.pumps.alpha_v,
            halfmax_v: self.pumps.halfmax_v,
            v_h_exp: self.pumps.v_h_exp,
            sim_ecm: self.features.sim_ecm,
            fluid_flow: self.features.fluid_flow,
            deformation: self.features.deformation,
            deform_style,
            sim_eosmosis: self.features.sim_eosmosis,
            ca_dyn: self.features.ca_dyn,
            voltage_dye: self.features.voltage_dye,
            ip3: self.features.ip3,
            hk_atpase: self.features.hk_atpase,
            v_atpase: self.features.v_atpase,
            dynamic_noise: self.features.dynamic_noise,
            osmotic_pressure: self.features.osmotic_pressure,
            electrostatic_pressure: self.features.electrostatic_pressure,
            grid_size: self.ecm.grid_size,
            grid_margin: self.ecm.margin,
            closed_bound: self.ecm.closed_bound,
            env_tortuosity: self.ecm.env_tortuosity,
            env_capacitance: self.ecm.env_capacitance,
            smoothing_sigma: self.ecm.smoothing_sigma,
            viscosity: self.mechanics.viscosity,
            flow_permeability: self.mechanics.flow_permeability,
            youngs_modulus: self.mechanics.youngs_modulus,
            mass_density: self.mechanics.mass_density,
            deform_damping: self.mechanics.damping,
            d_membrane: self.eosmosis.d_membrane,
            z_pump: self.eosmosis.z_pump,
            z_channel: self.eosmosis.z_channel,
            er: ErParams {
                vol_frac: self.calcium_er.vol_frac,
                sa_frac: self.calcium_er.sa_frac,
                ca_init: self.calcium_er.ca_init,
                alpha_er: self.calcium_er.alpha_er,
                halfmax_er: self.calcium_er.halfmax_er,
                slope_er: self.calcium_er.slope_er,
                dm_base: self.calcium_er.dm_base,
                dm_max: self.calcium_er.dm_max,
                ca_act_k: self.calcium_er.ca_act_k,
                ca_act_n: self.calcium_er.ca_act_n,
                ip3_k: self.calcium_er.ip3_k,
            },
            dye: self.morphogens.dye.to_spec("dye"),
            ip3_spec: self.morphogens.ip3.to_spec("ip3"),
            seed: self.noise.seed,
            static_noise: self.noise.static_level,
            dynamic_noise_level: self.noise.dynamic_level,
            dynamics: self.dynamics.clone(),
        }
    }
}

impl MorphogenConfig {
    fn to_spec(&self, name: &str) -> MorphogenSpec {
        MorphogenSpec {
            name: name.to_string(),
            z: self.z,
            mem_perm: self.mem_perm,
            free_diff: self.free_diff,
            cell_conc: self.cell_conc,
            env_conc: self.env_conc,
            decay_rate: self.decay_rate,
            production_rate: self.production_rate,
        }
    }
}

// Default functions for optional parameters
fn default_true() -> bool {
    true
}
fn default_one() -> f64 {
    1.0
}
fn default_half() -> f64 {
    0.5
}
fn default_minus_one() -> f64 {
    -1.0
}
fn default_temperature() -> f64 {
    310.0
}
fn default_membrane_capacitance() -> f64 {
    0.022
}
fn default_membrane_thickness() -> f64 {
    7.5e-9
}
fn default_env_volume_factor() -> f64 {
    1000.0
}
fn default_c_hm() -> f64 {
    1.2
}
fn default_t_resample() -> u32 {
    10
}
fn default_cell_radius() -> f64 {
    5.0e-6
}
fn default_cell_height() -> f64 {
    5.0e-6
}
fn default_cell_spacing() -> f64 {
    26.0e-9
}
fn default_cluster_radius() -> f64 {
    10.0e-6
}
fn default_mems_per_cell() -> usize {
    6
}
fn default_ions() -> Vec<IonConfig> {
    [IonName::Na, IonName::K, IonName::M, IonName::P]
        .into_iter()
        .map(IonConfig::named)
        .collect()
}
fn default_gj_vthresh() -> f64 {
    0.02
}
fn default_gj_vgrad() -> f64 {
    0.005
}
fn default_gj_surface() -> f64 {
    1.0e-4
}
fn default_delta_g_atp() -> f64 {
    50.0e3
}
fn default_alpha_nak() -> f64 {
    1.0e-8
}
fn default_alpha_ca() -> f64 {
    5.0e-7
}
fn default_alpha_hk() -> f64 {
    1.0e-9
}
fn default_alpha_v() -> f64 {
    1.0e-9
}
fn default_deform_style() -> String {
    "steady".to_string()
}
fn default_grid_size() -> f64 {
    10.0e-6
}
fn default_grid_margin() -> f64 {
    10.0e-6
}
fn default_env_capacitance() -> f64 {
    1000.0
}
fn default_viscosity() -> f64 {
    1.0e-3
}
fn default_flow_permeability() -> f64 {
    1.0e-18
}
fn default_youngs_modulus() -> f64 {
    1.0e3
}
fn default_mass_density() -> f64 {
    1050.0
}
fn default_deform_damping() -> f64 {
    0.1
}
fn default_d_membrane() -> f64 {
    1.0e-16
}
fn default_er_vol_frac() -> f64 {
    0.1
}
fn default_alpha_er() -> f64 {
    5.0e-10
}
fn default_halfmax_er() -> f64 {
    20.0
}
fn default_slope_er() -> f64 {
    2.0
}
fn default_dm_er_base() -> f64 {
    1.0e-21
}
fn default_dm_er_max() -> f64 {
    1.0e-19
}
fn default_ca_act_k() -> f64 {
    3.0e-4
}
fn default_ca_act_n() -> f64 {
    3.0
}
fn default_ip3_k() -> f64 {
    1.0e-3
}
fn default_t_change() -> f64 {
    0.1
}
fn default_dye() -> MorphogenConfig {
    MorphogenConfig {
        z: -1.0,
        mem_perm: 1.0e-18,
        free_diff: 1.0e-9,
        cell_conc: 0.0,
        env_conc: 1.0e-3,
        decay_rate: 0.0,
        production_rate: 0.0,
    }
}
fn default_ip3() -> MorphogenConfig {
    MorphogenConfig {
        z: -3.0,
        mem_perm: 0.0,
        free_diff: 1.0e-11,
        cell_conc: 1.0e-3,
        env_conc: 0.0,
        decay_rate: 0.0,
        production_rate: 0.0,
    }
}
fn default_base_filename() -> String {
    "bioelectric".to_string()
}
fn default_cache_dir() -> String {
    "cache".to_string()
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        PhysicsConfig {
            temperature_k: default_temperature(),
            membrane_capacitance: default_membrane_capacitance(),
            membrane_thickness: default_membrane_thickness(),
            env_volume_factor: default_env_volume_factor(),
            carbonic_acid: default_c_hm(),
        }
    }
}

impl Default for ClusterConfig {
    fn default() -> Self {
        ClusterConfig {
            cell_radius: default_cell_radius(),
            cell_height: default_cell_height(),
            cell_spacing: default_cell_spacing(),
            cluster_radius: default_cluster_radius(),
            mems_per_cell: default_mems_per_cell(),
        }
    }
}

impl Default for GapJunctionConfig {
    fn default() -> Self {
        GapJunctionConfig {
            enabled: true,
            voltage_sensitive: false,
            vthresh: default_gj_vthresh(),
            vgrad: default_gj_vgrad(),
            surface_fraction: default_gj_surface(),
            min_open: 0.0,
        }
    }
}

impl Default for PumpConfig {
    fn default() -> Self {
        PumpConfig {
            delta_g_atp: default_delta_g_atp(),
            alpha_nak: default_alpha_nak(),
            halfmax_nak: 0.0,
            nak_na_exp: default_half(),
            nak_k_exp: default_half(),
            alpha_ca: default_alpha_ca(),
            halfmax_ca: 0.0,
            ca_exp: default_one(),
            alpha_hk: default_alpha_hk(),
            halfmax_hk: 0.0,
            hk_h_exp: default_one(),
            hk_k_exp: default_half(),
            alpha_v: default_alpha_v(),
            halfmax_v: 0.0,
            v_h_exp: default_one(),
        }
    }
}

impl Default for FeatureConfig {
    fn default() -> Self {
        FeatureConfig {
            sim_ecm: false,
            fluid_flow: false,
            deformation: false,
            deform_style: default_deform_style(),
            sim_eosmosis: false,
            ca_dyn: false,
            voltage_dye: false,
            ip3: false,
            hk_atpase: false,
            v_atpase: false,
            dynamic_noise: false,
            osmotic_pressure: false,
            electrostatic_pressure: false,
        }
    }
}

impl Default for EcmConfig {
    fn default() -> Self {
        EcmConfig {
            grid_size: default_grid_size(),
            margin: default_grid_margin(),
            closed_bound: true,
            env_tortuosity: default_half(),
            env_capacitance: default_env_capacitance(),
            smoothing_sigma: default_one(),
        }
    }
}

impl Default for MechanicsConfig {
    fn default() -> Self {
        MechanicsConfig {
            viscosity: default_viscosity(),
            flow_permeability: default_flow_permeability(),
            youngs_modulus: default_youngs_modulus(),
            mass_density: default_mass_density(),
            damping: default_deform_damping(),
        }
    }
}

impl Default for EosmosisConfig {
    fn default() -> Self {
        EosmosisConfig {
            d_membrane: default_d_membrane(),
            z_pump: default_one(),
            z_channel: default_minus_one(),
        }
    }
}

impl Default for CalciumErConfig {
    fn default() -> Self {
        CalciumErConfig {
            vol_frac: default_er_vol_frac(),
            sa_frac: default_half(),
            ca_init: default_half(),
            alpha_er: default_alpha_er(),
            halfmax_er: default_halfmax_er(),
            slope_er: default_slope_er(),
            dm_base: default_dm_er_base(),
            dm_max: default_dm_er_max(),
            ca_act_k: default_ca_act_k(),
            ca_act_n: default_ca_act_n(),
            ip3_k: default_ip3_k(),
        }
    }
}

impl Default for MorphogensConfig {
    fn default() -> Self {
        MorphogensConfig { dye: default_dye(), ip3: default_ip3() }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig {
            base_filename: default_base_filename(),
            cache_dir: default_cache_dir(),
            format: None,
            save_vm_csv: false,
        }
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            physics: PhysicsConfig::default(),
            timing: TimingConfig { dt: 1.0e-2, init_tsteps: 1000, sim_tsteps: 0, t_resample: default_t_resample() },
            cluster: ClusterConfig::default(),
            ions: default_ions(),
            gap_junctions: GapJunctionConfig::default(),
            pumps: PumpConfig::default(),
            features: FeatureConfig::default(),
            ecm: EcmConfig::default(),
            mechanics: MechanicsConfig::default(),
            eosmosis: EosmosisConfig::default(),
            calcium_er: CalciumErConfig::default(),
            morphogens: MorphogensConfig::default(),
            noise: NoiseConfig::default(),
            dynamics: DynamicsConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [timing]
        dt = 0.01
        init_tsteps = 100

        [[ions]]
        name = "Na"

        [[ions]]
        name = "K"

        [[ions]]
        name = "M"
    "#;

    #[test]
    fn minimal_file_fills_defaults_and_balances_charge() {
        let config = SimulationConfig::from_toml_str(MINIMAL).unwrap();
        let params = config.get_sim_params();
        assert_eq!(params.n_ions(), 3);
        assert_eq!(params.t_resample, 10);
        let m = params.ion(IonName::M).unwrap();
        assert!((m.cell_conc - (8.66 + 125.0)).abs() < 1e-12);
        assert!((m.env_conc - (145.0 + 5.0)).abs() < 1e-12);
        let net: f64 = params.ions.iter().map(|ion| ion.z * ion.cell_conc).sum();
        assert!(net.abs() < 1e-12);
    }

    #[test]
    fn unsupported_deform_style_is_rejected() {
        let text = format!("{}\n[features]\ndeformation = true\ndeform_style = \"plastic\"\n", MINIMAL);
        let err = SimulationConfig::from_toml_str(&text).unwrap_err();
        assert!(err.to_string().contains("Unsupported deformation style"));
    }

    #[test]
    fn unstable_grid_diffusion_suggests_a_time_step() {
        let text = format!("{}\n[features]\nsim_ecm = true\n\n[ecm]\ngrid_size = 1.0e-6\n", MINIMAL);
        let err = SimulationConfig::from_toml_str(&text).unwrap_err();
        assert!(err.to_string().contains("reduce timing.dt"));
    }

    #[test]
    fn unbalanced_anions_are_rejected() {
        let text = r#"
            [timing]
            dt = 0.01
            init_tsteps = 10

            [[ions]]
            name = "Na"
            cell_conc = 1.0

            [[ions]]
            name = "Cl"
            cell_conc = 50.0

            [[ions]]
            name = "M"
        "#;
        assert!(SimulationConfig::from_toml_str(text).is_err());
    }

    #[test]
    fn scheduled_blocks_parse_with_flattened_window() {
        let text = format!(
            "{}\n[[dynamics.blocks]]\ntarget = \"nakatpase\"\namount = 0.5\nt_on = 1.0\nt_off = 2.0\n",
            MINIMAL
        );
        let config = SimulationConfig::from_toml_str(&text).unwrap();
        assert_eq!(config.dynamics.blocks.len(), 1);
        assert_eq!(config.dynamics.blocks[0].target, BlockTarget::NaKATPase);
        assert!((config.dynamics.blocks[0].window.t_change - 0.1).abs() < 1e-12);
    }
}
