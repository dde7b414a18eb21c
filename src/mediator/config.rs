//! Mediator configuration.

use tokio::runtime::Handle;

// ---------------------------------------------------------------------------
// MediatorConfig
// ---------------------------------------------------------------------------

/// Configuration for a [`Mediator`](super::Mediator).
#[derive(Debug, Clone)]
pub struct MediatorConfig {
    /// Name recorded on log events.
    pub name: String,
    /// Sweep reclaimed handlers after each dispatch pass.
    pub prune_after_dispatch: bool,
    /// Runtime whose blocking pool runs asynchronous dispatch.
    ///
    /// When `None`, the runtime current at the call site is used, falling
    /// back to a dedicated thread outside any runtime.
    pub runtime: Option<Handle>,
}

impl Default for MediatorConfig {
    fn default() -> Self {
        Self {
            name: "mediator".to_string(),
            prune_after_dispatch: true,
            runtime: None,
        }
    }
}

impl MediatorConfig {
    /// Create a new default config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the name (builder).
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Enable or disable post-dispatch pruning (builder).
    pub fn with_prune_after_dispatch(mut self, prune: bool) -> Self {
        self.prune_after_dispatch = prune;
        self
    }

    /// Set the runtime for asynchronous dispatch (builder).
    pub fn with_runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }
}

// ===========================================================================
// Tests
// ===========================================================================
