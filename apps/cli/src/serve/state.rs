//! Application state shared across request handlers.

use std::sync::Arc;

use meshctx_core::TopologyConnector;
use meshctx_shared::AppConfig;
use meshctx_storage::TopologyStore;

/// Read-only after startup; every handler gets an `Arc<AppState>`.
pub(crate) struct AppState {
    /// Loaded configuration.
    pub(crate) config: Arc<AppConfig>,
    /// Source of adjacency lists.
    pub(crate) connector: Arc<dyn TopologyConnector>,
    /// Snapshot store.
    pub(crate) store: Arc<dyn TopologyStore>,
}
