pub mod config;
pub mod logging;

pub use tracing;

/// Lifecycle signal broadcast to long running tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// Stop scheduling new work and wind down.
    Shutdown,
}
