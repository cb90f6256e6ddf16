pub mod nodes;
pub mod sites;

// Re-export command functions for convenience
pub use nodes::{delete_node, eligible, node_sites};
pub use sites::{create, init, list, show, tabs, update, CreateParams, UpdateParams};

use anyhow::{Context, Result};
use std::sync::Arc;

use sitegrid::config::Config;
use sitegrid::scheduler::{InMemoryNodeCatalog, NodeEventBus};
use sitegrid::site::SiteRegistry;
use sitegrid::storage::{self, SharedSiteRepository, SqliteSiteRepository};

/// Handles opened for a single command run
///
/// The store is opened here and closed by [`Runtime::close`]; nothing else
/// holds a connection.
pub struct Runtime {
    pub config: Config,
    pub store: Arc<SqliteSiteRepository>,
    pub registry: Arc<SiteRegistry>,
    pub nodes: Arc<InMemoryNodeCatalog>,
    pub events: NodeEventBus,
}

impl Runtime {
    pub fn open(config: Config) -> Result<Self> {
        let store = Arc::new(storage::open(&config.database).with_context(|| {
            format!(
                "Failed to open site store: {}",
                config.database.sqlite_path.display()
            )
        })?);

        let events = NodeEventBus::new(config.events.channel_capacity);
        let nodes = Arc::new(
            InMemoryNodeCatalog::with_nodes(config.nodes.clone()).with_events(events.clone()),
        );

        let repo: SharedSiteRepository = store.clone();
        let registry = Arc::new(SiteRegistry::new(repo).with_node_catalog(nodes.clone()));

        tracing::debug!(nodes = nodes.len(), "Runtime opened");

        Ok(Self {
            config,
            store,
            registry,
            nodes,
            events,
        })
    }

    /// Drop every handle and close the store
    pub fn close(self) -> Result<()> {
        let Self {
            store, registry, ..
        } = self;
        drop(registry);

        match Arc::try_unwrap(store) {
            Ok(store) => store.close().context("Failed to close site store")?,
            Err(_) => tracing::warn!("Site store still shared at shutdown, leaving it to drop"),
        }

        Ok(())
    }
}
