use crate::buffer::{ph_from_proton, rebuffer};
use crate::calcium::update_er;
use crate::cells::Cells;
use crate::dynamics::{ChannelDynamics, NoDynamics, TissueDynamics};
use crate::environment::{environment_for, EnvSpecies, EnvironmentModel};
use crate::error::SimulationError;
use crate::flux::electroflux;
use crate::gap_junction::{gj_open, update_gj};
use crate::init::{apply_protein_noise, base_init, pair_mut, tissue_init};
use crate::mechanics::{
    eosmosis, electro_p, get_deformation, get_efield, get_flow, get_hydro_f, osmotic_p, time_deform,
};
use crate::morphogen::{update_dye, update_ip3};
use crate::persist::{load_cache, save_cache};
use crate::pumps::{pump_ca_atp, pump_hk_atp, pump_nak_atp, pump_v_atp};
use crate::state::SimState;
use anyhow::Result;
use bioelectric_common::{DeformStyle, IonName, Sample, SimParams, TimeSeries};
use log::{debug, info, trace, warn};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Lifecycle of a [`Simulator`]. Gates which operations are legal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Uninitialized,
    TissueInitialized,
    /// Inside the time loop; holds the index of the step being taken.
    Stepping(usize),
    Finalized,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Uninitialized => write!(f, "uninitialized"),
            Phase::TissueInitialized => write!(f, "initialized"),
            Phase::Stepping(i) => write!(f, "stepping (step {})", i),
            Phase::Finalized => write!(f, "finalized"),
        }
    }
}

/// Which configured run the time loop performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunKind {
    /// Equilibration from a fresh initialization, `init_tsteps` long.
    Init,
    /// Continuation from the saved init phase, `sim_tsteps` long.
    Sim,
}

impl RunKind {
    pub fn steps(self, p: &SimParams) -> usize {
        match self {
            RunKind::Init => p.init_tsteps as usize,
            RunKind::Sim => p.sim_tsteps as usize,
        }
    }

    pub fn cache_file(self) -> &'static str {
        match self {
            RunKind::Init => "savedInit.bin",
            RunKind::Sim => "savedSim.bin",
        }
    }
}

impl fmt::Display for RunKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunKind::Init => write!(f, "init"),
            RunKind::Sim => write!(f, "sim"),
        }
    }
}

/// Fatal if any membrane voltage is NaN.
pub fn check_v(vm: &[f64], step: usize, time: f64) -> Result<(), SimulationError> {
    if vm.iter().any(|v| v.is_nan()) {
        return Err(SimulationError::Unstable { step, time });
    }
    Ok(())
}

/// Drives the bioelectric time loop over one cell cluster.
pub struct Simulator {
    params: SimParams,
    cells: Cells,
    state: SimState,
    series: TimeSeries,
    phase: Phase,
    env: Box<dyn EnvironmentModel>,
    dynamics: Box<dyn ChannelDynamics>,
    rng: StdRng,
}

impl Simulator {
    /// Builds the cluster and the environment strategy. Call [`Simulator::initialize`]
    /// or [`Simulator::load_init`] before running.
    pub fn new(params: SimParams) -> Result<Self> {
        let cells = Cells::new(&params)?;
        let env = environment_for(&cells, &params)?;
        let dynamics: Box<dyn ChannelDynamics> = if params.dynamics.is_empty() {
            Box::new(NoDynamics)
        } else {
            Box::new(TissueDynamics::from_params(&params))
        };
        info!("Using {} environment.", env.name());
        if params.deformation && !params.fluid_flow {
            warn!("Deformation is enabled without fluid flow; cells deform under body forces only.");
        }
        Ok(Simulator {
            rng: StdRng::seed_from_u64(params.seed),
            params,
            cells,
            state: SimState::default(),
            series: TimeSeries::new(),
            phase: Phase::Uninitialized,
            env,
            dynamics,
        })
    }

    /// Replaces the channel-dynamics collaborator.
    pub fn with_dynamics(mut self, dynamics: Box<dyn ChannelDynamics>) -> Self {
        self.dynamics = dynamics;
        self
    }

    /// Fresh state from the parameters. Legal in any phase; re-seeds the RNG and
    /// restores the undeformed geometry, so repeated calls start identically.
    pub fn initialize(&mut self) -> Result<()> {
        if self.cells.geometry_revision != 0 {
            let zeros = vec![0.0; self.cells.n_cells()];
            self.cells.deform_world(&zeros, &zeros, &self.params)?;
        }
        self.rng = StdRng::seed_from_u64(self.params.seed);
        let mut state = base_init(&self.cells, &self.params);
        tissue_init(&mut state, &self.cells, &self.params, &mut self.rng)?;
        self.env.update_voltage(&mut state, &self.cells, &self.params);
        state.vm_prev = state.vm.clone();
        self.state = state;
        self.series = TimeSeries::new();
        self.phase = Phase::TissueInitialized;
        info!("Tissue initialized ({} sites).", self.cells.n_sites());
        Ok(())
    }

    /// Resumes from the cached init phase in `cache_dir`.
    pub fn load_init(&mut self, cache_dir: &Path) -> Result<()> {
        let run = load_cache(cache_dir, RunKind::Init)?;
        let state = run.state;
        if state.n_cells() != self.cells.n_cells() || state.vm.len() != self.cells.n_sites() {
            return Err(SimulationError::Config(format!(
                "cached state has {} cells and {} sites but the configured cluster has {} and {}",
                state.n_cells(),
                state.vm.len(),
                self.cells.n_cells(),
                self.cells.n_sites()
            ))
            .into());
        }
        if state.d_cells_x.iter().chain(&state.d_cells_y).any(|d| *d != 0.0) {
            self.cells.deform_world(&state.d_cells_x, &state.d_cells_y, &self.params)?;
        }
        self.state = state;
        self.series = TimeSeries::new();
        self.rng = StdRng::seed_from_u64(self.params.seed.wrapping_add(1));
        self.phase = Phase::TissueInitialized;
        Ok(())
    }

    /// Writes the finished phase to `cache_dir`.
    pub fn save(&self, cache_dir: &Path, kind: RunKind) -> Result<PathBuf> {
        if self.phase != Phase::Finalized {
            return Err(SimulationError::InvalidPhase { operation: "save", phase: self.phase.to_string() }.into());
        }
        save_cache(cache_dir, kind, &self.state, &self.series)
    }

    /// Runs the configured number of steps for `kind`, sampling every
    /// `t_resample` steps. A failure leaves the simulator unusable until it is
    /// initialized again.
    pub fn run_loop(&mut self, kind: RunKind) -> Result<()> {
        if self.phase != Phase::TissueInitialized {
            return Err(SimulationError::InvalidPhase {
                operation: "run the time loop",
                phase: self.phase.to_string(),
            }
            .into());
        }
        let n_steps = kind.steps(&self.params);
        let resample = self.params.t_resample.max(1) as usize;
        info!(
            "Starting {} phase: {} steps of {:.3e} s, {} samples.",
            kind,
            n_steps,
            self.params.dt,
            n_steps.div_ceil(resample)
        );

        let start_time = Instant::now();
        for i in 0..n_steps {
            self.phase = Phase::Stepping(i);
            let step_start = Instant::now();
            self.step(i)?;
            let step_duration = step_start.elapsed();

            if i == 0 {
                info!(
                    "Estimated total run time: {:.2} s.",
                    step_duration.as_secs_f64() * n_steps as f64
                );
            }
            trace!("Step [{}/{}] completed in {:.3} ms", i + 1, n_steps, step_duration.as_secs_f64() * 1000.0);

            if i % resample == 0 {
                self.record_sample(i)?;
            }
            self.state.time += self.params.dt;
        }

        self.phase = Phase::Finalized;
        info!(
            "{} phase finished in {:.3} s ({} samples).",
            kind,
            start_time.elapsed().as_secs_f64(),
            self.series.len()
        );
        Ok(())
    }

    /// One integration step of length `dt`, starting at `state.time`.
    fn step(&mut self, i: usize) -> Result<()> {
        let Simulator { params, cells, state, env, dynamics, rng, .. } = self;
        let p: &SimParams = params;
        let cells: &Cells = cells;
        let env: &dyn EnvironmentModel = &**env;
        let table = &p.ion_table;

        state.zero_fluxes();

        for ((d, v), v_prev) in state.dvm.iter_mut().zip(&state.vm).zip(state.vm_prev.iter_mut()) {
            *d = (v - *v_prev) / p.dt;
            *v_prev = *v;
        }
        for ((d, c), c_prev) in state.dcc_er.iter_mut().zip(&state.cc_er).zip(state.cc_er_prev.iter_mut()) {
            *d = (c - *c_prev) / p.dt;
            *c_prev = *c;
        }

        let t = state.time;
        dynamics.run_all_dynamics(state, cells, p, t);

        // Na/K-ATPase
        if let (Some(i_na), Some(i_k)) = (table.index(IonName::Na), table.index(IonName::K)) {
            let (na_in, na_out) = site_conc(state, env, cells, i_na);
            let (k_in, k_out) = site_conc(state, env, cells, i_k);
            let (f_na, f_k): (Vec<f64>, Vec<f64>) = (0..cells.n_sites())
                .map(|s| {
                    let block = state.block_nak * state.rho_pump[s];
                    pump_nak_atp(na_in[s], na_out[s], k_in[s], k_out[s], state.vm[s], p, block)
                })
                .unzip();
            apply_flux(state, env, cells, p, i_na, &f_na);
            apply_flux(state, env, cells, p, i_k, &f_k);
            env.update_voltage(state, cells, p);
        }

        // Plasma-membrane Ca-ATPase, then the ER store
        if let Some(i_ca) = table.index(IonName::Ca) {
            let (ca_in, ca_out) = site_conc(state, env, cells, i_ca);
            let f_ca: Vec<f64> = (0..cells.n_sites())
                .map(|s| pump_ca_atp(ca_in[s], ca_out[s], state.vm[s], p, state.rho_pump[s]))
                .collect();
            apply_flux(state, env, cells, p, i_ca, &f_ca);
            env.update_voltage(state, cells, p);
            if p.ca_dyn {
                update_er(state, cells, p);
                env.update_voltage(state, cells, p);
            }
        }

        // Buffered protons
        if let Some(i_h) = table.index(IonName::H) {
            let i_m = table.index(IonName::M);
            state.sum_dm(i_h);
            let (h_in, h_out) = site_conc(state, env, cells, i_h);
            let f_h = electroflux(&h_out, &h_in, &state.dm_cells[i_h], p.tm, state.z[i_h], &state.vm, p, Some(state.rho_channel.as_slice()));
            move_protons(state, env, cells, p, i_h, i_m, &f_h);
            env.update_voltage(state, cells, p);

            if p.hk_atpase {
                if let Some(i_k) = table.index(IonName::K) {
                    let (h_in, h_out) = site_conc(state, env, cells, i_h);
                    let (k_in, k_out) = site_conc(state, env, cells, i_k);
                    let (f_h, f_k): (Vec<f64>, Vec<f64>) = (0..cells.n_sites())
                        .map(|s| pump_hk_atp(h_in[s], h_out[s], k_in[s], k_out[s], state.vm[s], p, state.rho_pump[s]))
                        .unzip();
                    move_protons(state, env, cells, p, i_h, i_m, &f_h);
                    apply_flux(state, env, cells, p, i_k, &f_k);
                    env.update_voltage(state, cells, p);
                }
            }
            if p.v_atpase {
                let (h_in, h_out) = site_conc(state, env, cells, i_h);
                let f_h: Vec<f64> = (0..cells.n_sites())
                    .map(|s| pump_v_atp(h_in[s], h_out[s], state.vm[s], p, state.rho_pump[s]))
                    .collect();
                move_protons(state, env, cells, p, i_h, i_m, &f_h);
                env.update_voltage(state, cells, p);
            }
        }

        // Electrodiffusion of every other mobile ion, in a fresh random order
        if p.gj_enabled {
            state.gjopen = gj_open(&state.v_cell, cells, p, state.block_gj);
        }
        let mut order: Vec<usize> = p
            .ions
            .iter()
            .enumerate()
            .filter(|(_, ion)| ion.name.is_mobile() && ion.name != IonName::H)
            .map(|(i, _)| i)
            .collect();
        order.shuffle(rng);

        for &i in &order {
            state.sum_dm(i);
            let (c_in, c_out) = site_conc(state, env, cells, i);
            let flux = electroflux(&c_out, &c_in, &state.dm_cells[i], p.tm, state.z[i], &state.vm, p, Some(state.rho_channel.as_slice()));
            apply_flux(state, env, cells, p, i, &flux);
            env.update_voltage(state, cells, p);

            if p.gj_enabled {
                junction_transport(state, cells, p, i);
                env.update_voltage(state, cells, p);
            }

            if p.sim_ecm {
                let species = EnvSpecies {
                    z: state.z[i],
                    free_diff: p.ions[i].free_diff,
                    c_bound: state.cc_env_bound[i],
                    v_env: &state.v_env,
                    u_env_x: &state.u_env_x,
                    u_env_y: &state.u_env_y,
                };
                env.env_transport(&species, &mut state.cc_env[i], cells, p);
                env.update_voltage(state, cells, p);
            }
        }

        // Fields and mechanics
        get_efield(state, cells);
        env.env_field(state, cells);

        let mechanics = p.fluid_flow || p.deformation || p.osmotic_pressure || p.electrostatic_pressure;
        if mechanics {
            if p.osmotic_pressure {
                osmotic_p(state, env, cells, p);
            }
            get_hydro_f(state, cells);
            if p.electrostatic_pressure {
                electro_p(state);
            }
        }
        if p.fluid_flow {
            get_flow(state, cells, p);
            env.env_flow(state, cells, p);
        }
        if p.sim_eosmosis {
            eosmosis(state, cells, p);
        }
        if p.deformation {
            match p.deform_style {
                DeformStyle::Steady => get_deformation(state, cells, p),
                DeformStyle::Wave => time_deform(state, cells, p)?,
            }
        }

        if p.ip3 {
            update_ip3(state, env, cells, p);
        }
        if p.voltage_dye {
            update_dye(state, env, cells, p);
        }

        if p.dynamic_noise && p.dynamic_noise_level > 0.0 {
            apply_protein_noise(state, p, p.dynamic_noise_level, rng)?;
            env.update_voltage(state, cells, p);
        }

        check_v(&state.vm, i, state.time)?;
        Ok(())
    }

    fn record_sample(&mut self, i: usize) -> Result<()> {
        let state = &self.state;
        let p = &self.params;
        let morphogens = [state.dye.as_ref(), state.ip3.as_ref()]
            .into_iter()
            .flatten()
            .map(|m| m.cc_cells.clone())
            .collect();
        self.series.push(Sample {
            time: state.time,
            cc_cells: state.cc_cells.clone(),
            cc_env: state.cc_env.clone(),
            vm: state.vm.clone(),
            v_cell: state.v_cell.clone(),
            fluxes_mem: state.fluxes_mem.clone(),
            i_mem: state.membrane_current(p.f),
            i_gj: state.junction_current(p.f),
            gjopen: state.gjopen.clone(),
            ph_cells: state.ph_cells.clone(),
            p_cells: state.p_cells.clone(),
            d_cells_x: state.d_cells_x.clone(),
            d_cells_y: state.d_cells_y.clone(),
            cc_er: state.cc_er.clone(),
            morphogens,
            rho_pump: state.rho_pump.clone(),
            rho_channel: state.rho_channel.clone(),
        });

        if let Some((slot, c_min)) = state.min_concentration() {
            if c_min < 0.0 {
                warn!(
                    "Negative {} concentration ({:.3e} mol/m^3) at t = {:.3} s.",
                    p.ions[slot].name, c_min, state.time
                );
            }
        }
        let mean_vm = state.vm.iter().sum::<f64>() / state.vm.len().max(1) as f64;
        debug!("Sample at step {} (t = {:.3} s): mean Vmem {:.2} mV", i, state.time, mean_vm * 1000.0);

        if p.deformation {
            self.cells.deform_world(&self.state.d_cells_x, &self.state.d_cells_y, &self.params)?;
        }
        Ok(())
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn series(&self) -> &TimeSeries {
        &self.series
    }

    pub fn state(&self) -> &SimState {
        &self.state
    }

    pub fn cells(&self) -> &Cells {
        &self.cells
    }

    pub fn params(&self) -> &SimParams {
        &self.params
    }
}

/// Cytosolic and facing environmental concentration of ion `i` at every site.
fn site_conc(state: &SimState, env: &dyn EnvironmentModel, cells: &Cells, i: usize) -> (Vec<f64>, Vec<f64>) {
    let c_in = cells.sites.site_to_cell.iter().map(|&c| state.cc_cells[i][c]).collect();
    let c_out = env.env_at_sites(&state.cc_env[i], cells);
    (c_in, c_out)
}

/// Moves ion `i` across the membrane and records the flux.
fn apply_flux(state: &mut SimState, env: &dyn EnvironmentModel, cells: &Cells, p: &SimParams, i: usize, flux: &[f64]) {
    env.apply_membrane_flux(flux, &mut state.cc_cells[i], &mut state.cc_env[i], cells, p);
    for (acc, f) in state.fluxes_mem[i].iter_mut().zip(flux) {
        *acc += f;
    }
}

/// Gates the junctions on the current cell voltages, then moves ion `i` through them.
fn junction_transport(state: &mut SimState, cells: &Cells, p: &SimParams, i: usize) {
    state.gjopen = gj_open(&state.v_cell, cells, p, state.block_gj);
    state.fluxes_gj[i] = update_gj(
        &mut state.cc_cells[i],
        state.z[i],
        p.ions[i].free_diff,
        &state.v_cell,
        &state.gjopen,
        &state.u_gj,
        cells,
        p,
    );
}

/// Proton transfer against the bicarbonate buffer: each proton taken up consumes
/// one buffer anion, then [H+] and pH are re-derived on both sides.
fn move_protons(
    state: &mut SimState,
    env: &dyn EnvironmentModel,
    cells: &Cells,
    p: &SimParams,
    i_h: usize,
    i_m: Option<usize>,
    f_h: &[f64],
) {
    apply_flux(state, env, cells, p, i_h, f_h);
    match i_m {
        Some(i_m) => {
            let consumed: Vec<f64> = f_h.iter().map(|f| -f).collect();
            env.apply_membrane_flux(&consumed, &mut state.cc_cells[i_m], &mut state.cc_env[i_m], cells, p);
            let (c_m, c_h) = pair_mut(&mut state.cc_cells, i_m, i_h);
            rebuffer(c_m, p.c_hm, c_h, &mut state.ph_cells);
            let (c_m, c_h) = pair_mut(&mut state.cc_env, i_m, i_h);
            rebuffer(c_m, p.c_hm, c_h, &mut state.ph_env);
        }
        None => {
            for (ph, &c) in state.ph_cells.iter_mut().zip(&state.cc_cells[i_h]) {
                *ph = ph_from_proton(c.max(f64::MIN_POSITIVE));
            }
            for (ph, &c) in state.ph_env.iter_mut().zip(&state.cc_env[i_h]) {
                *ph = ph_from_proton(c.max(f64::MIN_POSITIVE));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::default_params;

    fn short_params() -> SimParams {
        let mut p = default_params();
        p.init_tsteps = 25;
        p.sim_tsteps = 10;
        p.t_resample = 10;
        p
    }

    #[test]
    fn check_v_rejects_nan_only() {
        assert!(check_v(&[-0.05, 0.01], 3, 0.03).is_ok());
        let err = check_v(&[-0.05, f64::NAN], 3, 0.03).unwrap_err();
        assert!(matches!(err, SimulationError::Unstable { step: 3, .. }));
        assert!(err.to_string().contains("Reduce the time step"));
    }

    #[test]
    fn loop_requires_initialization() {
        let mut sim = Simulator::new(short_params()).unwrap();
        assert_eq!(sim.phase(), Phase::Uninitialized);
        let err = sim.run_loop(RunKind::Init).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SimulationError>(),
            Some(SimulationError::InvalidPhase { .. })
        ));
    }

    #[test]
    fn loop_samples_every_resample_interval_and_finalizes() {
        let mut sim = Simulator::new(short_params()).unwrap();
        sim.initialize().unwrap();
        sim.run_loop(RunKind::Init).unwrap();
        assert_eq!(sim.phase(), Phase::Finalized);
        // Steps 0, 10 and 20
        assert_eq!(sim.series().len(), 3);
        assert!((sim.state().time - 25.0 * sim.params().dt).abs() < 1e-9);
        // A finished run must be re-initialized before running again
        assert!(sim.run_loop(RunKind::Sim).is_err());
        sim.initialize().unwrap();
        assert_eq!(sim.phase(), Phase::TissueInitialized);
        assert!(sim.series().is_empty());
    }

    #[test]
    fn saving_needs_a_finished_run() {
        let mut sim = Simulator::new(short_params()).unwrap();
        sim.initialize().unwrap();
        let err = sim.save(Path::new("unused-cache"), RunKind::Init).unwrap_err();
        assert!(err.to_string().contains("save"));
    }

    #[test]
    fn same_seed_gives_the_same_trajectory() {
        let run = || {
            let mut sim = Simulator::new(short_params()).unwrap();
            sim.initialize().unwrap();
            sim.run_loop(RunKind::Init).unwrap();
            sim.state().clone()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn junction_gating_follows_the_latest_cell_voltages() {
        let mut p = short_params();
        p.gj_enabled = true;
        p.gj_voltage_sensitive = true;
        p.gj_min = 0.1;
        let mut sim = Simulator::new(p).unwrap();
        sim.initialize().unwrap();
        let Simulator { params, cells, state, .. } = &mut sim;
        state.gjopen = vec![1.0; cells.n_gj()];
        let (_, b) = cells.gj_pairs[0];
        state.v_cell[b] += 0.1;
        let expected = gj_open(&state.v_cell, cells, params, state.block_gj);
        junction_transport(state, cells, params, 0);
        assert_eq!(state.gjopen, expected);
        assert!(state.gjopen[0] < 0.2);
    }

    #[test]
    fn injected_dynamics_replace_the_configured_ones() {
        let mut p = short_params();
        p.dynamics.scheduled = vec![bioelectric_common::ScheduledChannelConfig {
            ion: IonName::K,
            multiplier: 1.0,
            window: bioelectric_common::TimeWindow { t_on: -1.0, t_off: 1.0e9, t_change: 0.01 },
        }];
        let mut sim = Simulator::new(p).unwrap().with_dynamics(Box::new(NoDynamics));
        sim.initialize().unwrap();
        sim.run_loop(RunKind::Init).unwrap();
        assert!(sim.state().dm_scheduled.iter().flatten().all(|d| *d == 0.0));
    }

    #[test]
    fn tracked_protons_keep_a_physiological_ph() {
        let mut config = bioelectric_common::SimulationConfig::default();
        config.ions = [IonName::Na, IonName::K, IonName::H, IonName::M, IonName::P]
            .into_iter()
            .map(bioelectric_common::IonConfig::named)
            .collect();
        config.features.v_atpase = true;
        config.timing.init_tsteps = 5;
        let mut sim = Simulator::new(config.get_sim_params()).unwrap();
        sim.initialize().unwrap();
        sim.run_loop(RunKind::Init).unwrap();
        let state = sim.state();
        assert!(state.ph_cells.iter().all(|ph| (5.0..9.0).contains(ph)));
        assert!(state.ph_env.iter().all(|ph| (5.0..9.0).contains(ph)));
        assert!(state.vm.iter().all(|v| v.is_finite()));
    }
}
