//! Error types for the arena engine binary.

/// Top-level error for the arena engine binary.
///
/// Every startup failure funnels into this type so `main` can propagate
/// with `?`.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: arena_core::ConfigError,
    },

    /// A startup command was rejected.
    #[error("command error: {source}")]
    Command {
        /// The underlying command error.
        #[from]
        source: arena_core::CommandError,
    },

    /// The simulation section of the config could not be read.
    #[error("simulation config error: {message}")]
    Simulation {
        /// Description of the failure.
        message: String,
    },
}
