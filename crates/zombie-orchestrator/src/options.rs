//! Options recognized by [`crate::start`].

use std::fmt;
use std::io::{BufRead as _, Write as _};
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;

use crate::network::{Network, Scope};

/// Maximum number of nodes spawned in parallel when the caller does not say otherwise.
pub const DEFAULT_SPAWN_CONCURRENCY: NonZeroUsize = match NonZeroUsize::new(4) {
    Some(n) => n,
    None => unreachable!(),
};

/// Callback receiving the [`Network`] as soon as it is constructed.
pub type NetworkHook = Box<dyn FnOnce(Network) + Send>;

/// Answers yes/no questions asked during a launch.
pub trait Confirm: Send + Sync {
    fn confirm(&self, question: &str) -> bool;
}

/// Asks on the terminal; anything but `y` is a no.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdinConfirm;

impl Confirm for StdinConfirm {
    fn confirm(&self, question: &str) -> bool {
        let mut stderr = std::io::stderr();
        let _ = write!(stderr, "{question} (y/N) ");
        let _ = stderr.flush();

        let mut answer = String::new();
        if std::io::stdin().lock().read_line(&mut answer).is_err() {
            return false;
        }
        answer.trim().eq_ignore_ascii_case("y")
    }
}

/// Options for one launch.
pub struct LaunchOptions {
    /// Keep watching the nodes after the launch.
    pub monitor: bool,
    /// Upper bound on nodes provisioned at the same time.
    pub spawn_concurrency: NonZeroUsize,
    /// Running non-interactively: never prompt, an existing workspace without `force` is an error.
    pub in_ci: bool,
    /// Workspace directory; an ephemeral one is created when unset.
    pub dir: Option<PathBuf>,
    /// Reuse an existing workspace directory without asking.
    pub force: bool,
    /// Demote progress output to debug level.
    pub silent: bool,
    /// Invoked with the network before any fallible step that follows its construction.
    pub set_global_network: Option<NetworkHook>,
    /// Asks whether an existing workspace may be reused.
    pub prompt: Arc<dyn Confirm>,
    /// Who owns the network; [`crate::test`] launches with [`Scope::Test`].
    pub scope: Scope,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            monitor: false,
            spawn_concurrency: DEFAULT_SPAWN_CONCURRENCY,
            in_ci: false,
            dir: None,
            force: false,
            silent: false,
            set_global_network: None,
            prompt: Arc::new(StdinConfirm),
            scope: Scope::Standalone,
        }
    }
}

impl LaunchOptions {
    /// Set the callback that receives the network handle as soon as it exists.
    pub fn on_network(mut self, hook: impl FnOnce(Network) + Send + 'static) -> Self {
        self.set_global_network = Some(Box::new(hook));
        self
    }
}

impl fmt::Debug for LaunchOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LaunchOptions")
            .field("monitor", &self.monitor)
            .field("spawn_concurrency", &self.spawn_concurrency)
            .field("in_ci", &self.in_ci)
            .field("dir", &self.dir)
            .field("force", &self.force)
            .field("silent", &self.silent)
            .field("set_global_network", &self.set_global_network.is_some())
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}
