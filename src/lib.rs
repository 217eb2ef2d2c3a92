//! Bioelectric simulation of a 2D cluster of cells: ion electrodiffusion across
//! membranes and gap junctions, membrane voltage, pumps, an optional
//! extracellular grid, and optional mechanics.

pub mod buffer;
pub mod calcium;
pub mod cells;
pub mod charge;
pub mod dynamics;
pub mod ecm;
pub mod environment;
pub mod error;
pub mod flux;
pub mod gap_junction;
pub mod grid;
pub mod init;
pub mod mechanics;
pub mod morphogen;
pub mod persist;
pub mod pumps;
pub mod simulation;
pub mod state;

#[cfg(test)]
mod test_support;

pub use cells::Cells;
pub use dynamics::{ChannelDynamics, NoDynamics, TissueDynamics};
pub use environment::{EnvironmentModel, GridEnvironment, LumpedEnvironment};
pub use error::SimulationError;
pub use persist::{export_series, export_vm_csv, ExportFormat};
pub use simulation::{check_v, Phase, RunKind, Simulator};
pub use state::SimState;
