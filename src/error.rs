use thiserror::Error;

/// Errors raised by the numeric core. Wrapped into `anyhow::Error` at the API boundary.
#[derive(Debug, Error)]
pub enum SimulationError {
    #[error(
        "Simulation has become unstable at step {step} (t = {time:.4} s): NaN in Vmem. \
         Reduce the time step, gap-junction surface fraction and/or pump rate coefficients."
    )]
    Unstable { step: usize, time: f64 },

    #[error("Cannot {operation} while the simulator is {phase}.")]
    InvalidPhase { operation: &'static str, phase: String },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Failed to build linear operator: {0}")]
    Operator(String),
}
