pub mod config;
pub mod ions;
pub mod sim_params;
pub mod snapshot;
pub mod vecmath;

// Re-export key types for easier use by dependent crates
pub use config::{
    BlockTarget, CalciumActivatedConfig, ClusterConfig, DynamicsConfig, IonConfig,
    OutputConfig, ScheduledBlockConfig, ScheduledChannelConfig, SimulationConfig, TimeWindow,
    VoltageGatedConfig,
};
pub use ions::{IonName, IonTable};
pub use sim_params::{DeformStyle, ErParams, IonSpec, MorphogenSpec, SimParams, PKA_BICARBONATE};
pub use snapshot::{Sample, TimeSeries};
pub use vecmath::{hill, step, Vec2};
