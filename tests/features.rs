mod common;

use bioelectric_common::{
    BlockTarget, IonName, ScheduledBlockConfig, ScheduledChannelConfig, SimulationConfig, TimeWindow,
};
use bioelectric_engine::{RunKind, Simulator};
use common::{run_init, short_config, with_ions};

fn always() -> TimeWindow {
    TimeWindow { t_on: -1.0, t_off: 1.0e9, t_change: 0.01 }
}

fn mean(v: &[f64]) -> f64 {
    v.iter().sum::<f64>() / v.len() as f64
}

#[test]
fn er_store_tracks_calcium() {
    let mut config = short_config(20);
    with_ions(&mut config, &[IonName::Na, IonName::K, IonName::Ca, IonName::M, IonName::P]);
    config.features.ca_dyn = true;
    let sim = run_init(&config);
    let state = sim.state();
    assert_eq!(state.cc_er.len(), state.n_cells());
    assert!(state.cc_er.iter().all(|c| c.is_finite() && *c >= 0.0));
    assert_eq!(sim.series().cc_er_time().len(), sim.series().len());
    assert!(state.vm.iter().all(|v| v.is_finite()));
}

#[test]
fn dye_and_ip3_are_sampled() {
    let mut config = short_config(20);
    config.features.voltage_dye = true;
    config.features.ip3 = true;
    let sim = run_init(&config);
    let last = sim.series().morphogen_time().last().unwrap();
    assert_eq!(last.len(), 2);
    assert!(last.iter().flatten().all(|c| c.is_finite()));
}

#[test]
fn scheduled_potassium_channel_hyperpolarizes() {
    let baseline = run_init(&short_config(10));
    let mut config = short_config(10);
    config.dynamics.scheduled =
        vec![ScheduledChannelConfig { ion: IonName::K, multiplier: 1.0, window: always() }];
    let opened = run_init(&config);
    let k = opened.params().ion_table.index(IonName::K).unwrap();
    let state = opened.state();
    for (extra, base) in state.dm_scheduled[k].iter().zip(&state.dm_base[k]) {
        assert!((extra - base).abs() <= 1e-9 * base);
    }
    assert!(mean(&state.vm) < mean(&baseline.state().vm) - 0.002);
}

#[test]
fn junction_block_closes_every_junction() {
    let mut config = short_config(20);
    config.dynamics.blocks =
        vec![ScheduledBlockConfig { target: BlockTarget::GapJunction, amount: 1.0, window: always() }];
    let sim = run_init(&config);
    assert!(sim.state().block_gj < 1.0e-6);
    assert!(sim.state().gjopen.iter().all(|g| *g < 1.0e-6));
}

#[test]
fn steady_mechanics_with_grid_stays_finite() {
    let mut config = short_config(15);
    config.features.sim_ecm = true;
    config.features.fluid_flow = true;
    config.features.deformation = true;
    config.features.osmotic_pressure = true;
    config.features.electrostatic_pressure = true;
    config.features.sim_eosmosis = true;
    let sim = run_init(&config);
    let state = sim.state();
    assert!(state.vm.iter().all(|v| v.is_finite()));
    assert!(state.d_cells_x.iter().chain(&state.d_cells_y).all(|d| d.is_finite()));
    assert!(state.rho_pump.iter().chain(&state.rho_channel).all(|r| *r >= 0.0));
    assert!(sim.cells().geometry_revision > 0);
}

#[test]
fn wave_deformation_needs_a_stable_time_step() {
    let mut config: SimulationConfig = short_config(10);
    config.features.deformation = true;
    config.features.deform_style = "wave".to_string();
    let mut sim = Simulator::new(config.get_sim_params()).unwrap();
    let err = sim.initialize().unwrap_err();
    assert!(err.to_string().contains("timing.dt"));

    config.mechanics.youngs_modulus = 1.0e-8;
    let mut sim = Simulator::new(config.get_sim_params()).unwrap();
    sim.initialize().unwrap();
    sim.run_loop(RunKind::Init).unwrap();
    assert!(sim.state().d_cells_x.iter().all(|d| d.is_finite()));
}

#[test]
fn dynamic_noise_is_seeded() {
    let mut config = short_config(20);
    config.features.dynamic_noise = true;
    config.noise.dynamic_level = 0.5;
    let a = run_init(&config);
    let b = run_init(&config);
    assert_eq!(a.state(), b.state());
    config.noise.seed += 1;
    let c = run_init(&config);
    assert_ne!(a.state(), c.state());
}
