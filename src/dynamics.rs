use crate::cells::Cells;
use crate::state::SimState;
use bioelectric_common::{
    hill, step, BlockTarget, CalciumActivatedConfig, IonName, ScheduledBlockConfig,
    ScheduledChannelConfig, SimParams, TimeWindow, VoltageGatedConfig,
};
use log::{debug, warn};

/// Tissue and channel-dynamics collaborator of the time loop.
///
/// Called once per step before any transport. Implementations write the
/// `dm_scheduled`, `dm_vg` and `dm_cag` contributions and the block factors;
/// they must keep every contribution non-negative.
pub trait ChannelDynamics {
    fn run_all_dynamics(&mut self, state: &mut SimState, cells: &Cells, p: &SimParams, t: f64);
}

/// Leaves every contribution at zero and every block open.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDynamics;

impl ChannelDynamics for NoDynamics {
    fn run_all_dynamics(&mut self, _state: &mut SimState, _cells: &Cells, _p: &SimParams, _t: f64) {}
}

/// Smooth on/off window: rises at `t_on`, falls at `t_off`, both over `t_change`.
pub fn window(t: f64, w: &TimeWindow) -> f64 {
    step(t, w.t_on, w.t_change) * (1.0 - step(t, w.t_off, w.t_change))
}

/// Scheduled, voltage-gated and calcium-activated channels plus scheduled blocks,
/// applied uniformly over the cluster.
#[derive(Debug, Clone, Default)]
pub struct TissueDynamics {
    scheduled: Vec<(usize, ScheduledChannelConfig)>,
    voltage_gated: Vec<(usize, VoltageGatedConfig)>,
    calcium_activated: Vec<(usize, CalciumActivatedConfig)>,
    ca_slot: Option<usize>,
    blocks: Vec<ScheduledBlockConfig>,
}

impl TissueDynamics {
    /// Resolves every entry of `p.dynamics` to an ion slot. Entries naming an
    /// untracked ion are dropped with a warning.
    pub fn from_params(p: &SimParams) -> Self {
        let cfg = &p.dynamics;
        let slot = |ion: IonName, kind: &str| {
            let slot = p.ion_table.index(ion);
            if slot.is_none() {
                warn!("Ignoring {} channel for untracked ion {}.", kind, ion);
            }
            slot
        };
        let ca_slot = p.ion_table.index(IonName::Ca);
        if ca_slot.is_none() && !cfg.calcium_activated.is_empty() {
            warn!("Calcium-activated channels configured but Ca is not tracked; they stay closed.");
        }
        let dynamics = TissueDynamics {
            scheduled: cfg
                .scheduled
                .iter()
                .filter_map(|c| slot(c.ion, "scheduled").map(|i| (i, c.clone())))
                .collect(),
            voltage_gated: cfg
                .voltage_gated
                .iter()
                .filter_map(|c| slot(c.ion, "voltage-gated").map(|i| (i, c.clone())))
                .collect(),
            calcium_activated: cfg
                .calcium_activated
                .iter()
                .filter_map(|c| slot(c.ion, "calcium-activated").map(|i| (i, c.clone())))
                .collect(),
            ca_slot,
            blocks: cfg.blocks.clone(),
        };
        debug!(
            "Channel dynamics: {} scheduled, {} voltage-gated, {} calcium-activated, {} blocks.",
            dynamics.scheduled.len(),
            dynamics.voltage_gated.len(),
            dynamics.calcium_activated.len(),
            dynamics.blocks.len()
        );
        dynamics
    }
}

impl ChannelDynamics for TissueDynamics {
    fn run_all_dynamics(&mut self, state: &mut SimState, cells: &Cells, _p: &SimParams, t: f64) {
        for contrib in [&mut state.dm_scheduled, &mut state.dm_vg, &mut state.dm_cag] {
            contrib.iter_mut().flatten().for_each(|d| *d = 0.0);
        }

        for (i, ch) in &self.scheduled {
            let mult = ch.multiplier.max(0.0) * window(t, &ch.window);
            for (d, base) in state.dm_scheduled[*i].iter_mut().zip(&state.dm_base[*i]) {
                *d += base * mult;
            }
        }

        for (i, ch) in &self.voltage_gated {
            for s in 0..cells.n_sites() {
                let rising = ch.dvm_threshold.map_or(true, |th| state.dvm[s] > th);
                if rising {
                    let open = step(state.vm[s], ch.v_half, ch.v_width);
                    state.dm_vg[*i][s] += state.dm_base[*i][s] * ch.max_multiplier.max(0.0) * open;
                }
            }
        }

        if let Some(i_ca) = self.ca_slot {
            for (i, ch) in &self.calcium_activated {
                for s in 0..cells.n_sites() {
                    let ca = state.cc_cells[i_ca][cells.sites.site_to_cell[s]];
                    let open = hill(ca, ch.ca_half, ch.hill_n);
                    state.dm_cag[*i][s] += state.dm_base[*i][s] * ch.max_multiplier.max(0.0) * open;
                }
            }
        }

        state.block_nak = 1.0;
        state.block_gj = 1.0;
        for block in &self.blocks {
            let factor = 1.0 - block.amount.clamp(0.0, 1.0) * window(t, &block.window);
            match block.target {
                BlockTarget::NaKATPase => state.block_nak *= factor,
                BlockTarget::GapJunction => state.block_gj *= factor,
            }
        }
    }
}
