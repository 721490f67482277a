use std::fmt::Display;

use tracing::{debug, info};

/// Progress output for one launch.
///
/// Carried by value through the orchestrator and the [`crate::Network`], so two launches in the
/// same process can have different verbosity.
#[derive(Debug, Clone, Copy, Default)]
pub struct Reporter {
    silent: bool,
}

impl Reporter {
    pub fn new(silent: bool) -> Self {
        Self { silent }
    }

    pub fn is_silent(&self) -> bool {
        self.silent
    }

    /// Report a launch step; demoted to debug level when silent.
    pub fn step(&self, namespace: &str, message: impl Display) {
        if self.silent {
            debug!(%namespace, "{message}");
        } else {
            info!(%namespace, "{message}");
        }
    }
}
