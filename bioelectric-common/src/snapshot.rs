use serde::{Deserialize, Serialize};

/// All tracked quantities at one sampled time step.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Sample {
    /// Simulation time (s).
    pub time: f64,
    /// `[ion][cell]` cytosolic concentrations (mol/m^3).
    pub cc_cells: Vec<Vec<f64>>,
    /// `[ion][env point]` environmental concentrations (mol/m^3).
    pub cc_env: Vec<Vec<f64>>,
    /// Transmembrane voltage per membrane site (V).
    pub vm: Vec<f64>,
    /// Intracellular voltage per cell (V).
    pub v_cell: Vec<f64>,
    /// `[ion][site]` membrane flux accumulated over the last step (mol/m^2/s, positive inward).
    pub fluxes_mem: Vec<Vec<f64>>,
    /// Transmembrane current density per site (A/m^2).
    pub i_mem: Vec<f64>,
    /// Gap-junction current density per junction (A/m^2).
    pub i_gj: Vec<f64>,
    pub gjopen: Vec<f64>,
    pub ph_cells: Vec<f64>,
    pub p_cells: Vec<f64>,
    pub d_cells_x: Vec<f64>,
    pub d_cells_y: Vec<f64>,
    pub cc_er: Vec<f64>,
    /// `[morphogen][cell]` concentrations of tracked morphogens (dye, IP3).
    pub morphogens: Vec<Vec<f64>>,
    pub rho_pump: Vec<f64>,
    pub rho_channel: Vec<f64>,
}

/// Append-only sampled time series. Each `*_time` list gains exactly one entry per sample.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimeSeries {
    time: Vec<f64>,
    cc_time: Vec<Vec<Vec<f64>>>,
    cc_env_time: Vec<Vec<Vec<f64>>>,
    vm_time: Vec<Vec<f64>>,
    v_cell_time: Vec<Vec<f64>>,
    fluxes_mem_time: Vec<Vec<Vec<f64>>>,
    i_mem_time: Vec<Vec<f64>>,
    i_gj_time: Vec<Vec<f64>>,
    gjopen_time: Vec<Vec<f64>>,
    ph_time: Vec<Vec<f64>>,
    p_cells_time: Vec<Vec<f64>>,
    d_cells_x_time: Vec<Vec<f64>>,
    d_cells_y_time: Vec<Vec<f64>>,
    cc_er_time: Vec<Vec<f64>>,
    morphogen_time: Vec<Vec<Vec<f64>>>,
    rho_pump_time: Vec<Vec<f64>>,
    rho_channel_time: Vec<Vec<f64>>,
}

impl TimeSeries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one sample to every list.
    pub fn push(&mut self, sample: Sample) {
        self.time.push(sample.time);
        self.cc_time.push(sample.cc_cells);
        self.cc_env_time.push(sample.cc_env);
        self.vm_time.push(sample.vm);
        self.v_cell_time.push(sample.v_cell);
        self.fluxes_mem_time.push(sample.fluxes_mem);
        self.i_mem_time.push(sample.i_mem);
        self.i_gj_time.push(sample.i_gj);
        self.gjopen_time.push(sample.gjopen);
        self.ph_time.push(sample.ph_cells);
        self.p_cells_time.push(sample.p_cells);
        self.d_cells_x_time.push(sample.d_cells_x);
        self.d_cells_y_time.push(sample.d_cells_y);
        self.cc_er_time.push(sample.cc_er);
        self.morphogen_time.push(sample.morphogens);
        self.rho_pump_time.push(sample.rho_pump);
        self.rho_channel_time.push(sample.rho_channel);
    }

    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    pub fn time(&self) -> &[f64] {
        &self.time
    }

    pub fn cc_time(&self) -> &[Vec<Vec<f64>>] {
        &self.cc_time
    }

    pub fn cc_env_time(&self) -> &[Vec<Vec<f64>>] {
        &self.cc_env_time
    }

    pub fn vm_time(&self) -> &[Vec<f64>] {
        &self.vm_time
    }

    pub fn v_cell_time(&self) -> &[Vec<f64>] {
        &self.v_cell_time
    }

    pub fn fluxes_mem_time(&self) -> &[Vec<Vec<f64>>] {
        &self.fluxes_mem_time
    }

    pub fn i_mem_time(&self) -> &[Vec<f64>] {
        &self.i_mem_time
    }

    pub fn i_gj_time(&self) -> &[Vec<f64>] {
        &self.i_gj_time
    }

    pub fn gjopen_time(&self) -> &[Vec<f64>] {
        &self.gjopen_time
    }

    pub fn ph_time(&self) -> &[Vec<f64>] {
        &self.ph_time
    }

    pub fn p_cells_time(&self) -> &[Vec<f64>] {
        &self.p_cells_time
    }

    pub fn d_cells_x_time(&self) -> &[Vec<f64>] {
        &self.d_cells_x_time
    }

    pub fn d_cells_y_time(&self) -> &[Vec<f64>] {
        &self.d_cells_y_time
    }

    pub fn cc_er_time(&self) -> &[Vec<f64>] {
        &self.cc_er_time
    }

    pub fn morphogen_time(&self) -> &[Vec<Vec<f64>>] {
        &self.morphogen_time
    }

    pub fn rho_pump_time(&self) -> &[Vec<f64>] {
        &self.rho_pump_time
    }

    pub fn rho_channel_time(&self) -> &[Vec<f64>] {
        &self.rho_channel_time
    }

    /// Vmem of one site over all samples.
    pub fn vm_trace(&self, site: usize) -> Vec<f64> {
        self.vm_time.iter().filter_map(|vm| vm.get(site).copied()).collect()
    }
}
