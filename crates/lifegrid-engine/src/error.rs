//! Error types for the engine binary.
//!
//! [`EngineError`] is the top-level error type that wraps all possible
//! failure modes during engine startup and the run itself.

/// Top-level error for the engine binary.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: lifegrid_core::config::ConfigError,
    },

    /// The run failed.
    #[error("run error: {source}")]
    Run {
        /// The underlying run error.
        #[from]
        source: lifegrid_core::runner::RunError,
    },

    /// The event printer task panicked.
    #[error("event printer failed: {source}")]
    Printer {
        /// The underlying join error.
        source: tokio::task::JoinError,
    },
}
