//! Error types for the forecasting pipeline

use thiserror::Error;

/// Errors raised by the training pipeline. Each variant carries enough
/// context (time step, dataset) to diagnose a failed run from the log
/// alone.
#[derive(Debug, Error)]
pub enum ForecastError {
    /// The training window cannot be formed: fewer than `window_size`
    /// snapshots precede the evaluation step.
    #[error(
        "insufficient history at time step {time_step}: need {window_size} prior snapshots, have {have}"
    )]
    InsufficientHistory {
        time_step: usize,
        window_size: usize,
        have: usize,
    },

    /// The encoding cache has no bundle for the requested time step.
    /// Fatal for that time step's run: predictions without the structural
    /// encodings are meaningless.
    #[error("no structural encoding cached for time step {time_step}")]
    MissingEncoding { time_step: usize },

    /// Train/val/test edge construction failed.
    #[error("evaluation data for '{dataset}' at time step {time_step}: {reason}")]
    EvaluationData {
        time_step: usize,
        dataset: String,
        reason: String,
    },

    /// The validation score never improved during a run, so there is no
    /// best model to finalize.
    #[error("validation never improved during run at time step {time_step}")]
    NoImprovement { time_step: usize },

    /// A configured code path that is recognized but not implemented.
    #[error("{what} is not implemented")]
    Unimplemented { what: String },
}
