//! sitegrid - Site-to-node assignment and configuration consistency
//!
//! Keeps a registry of periodic collection targets ("sites") and decides
//! which worker nodes each one routes to.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`config`] - Configuration management and settings
//! - [`models`] - Core data structures and types
//! - [`scheduler`] - Cron validation, node catalog and assignment resolution
//! - [`site`] - Site registry, reconciliation and snapshot export
//! - [`storage`] - Site store (SQLite, in-memory mock)
//! - [`error`] - Unified error type
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use sitegrid::prelude::*;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let repo: SharedSiteRepository = Arc::new(sitegrid::storage::open(&config.database)?);
//!     let registry = SiteRegistry::new(repo);
//!
//!     let id = registry.create(NewSite::new("v2ex", "V2EX", "https://www.v2ex.com"))?;
//!     println!("{}", serde_json::to_string(&export(&registry.get(id)?)?)?);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod models;
pub mod scheduler;
pub mod site;
pub mod storage;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{Error, ErrorCategory, Result, SiteGridErrorTrait};
    pub use crate::models::{
        ContentType, NewSite, Node, NodeCategory, NodeId, NodeOption, Site, SiteFilter, SiteId,
        SitePatch, SiteSnapshot, Status, Tag,
    };
    pub use crate::scheduler::{
        eligible_nodes, AssignmentResolver, InMemoryNodeCatalog, NodeCatalog, NodeEvent,
        NodeEventBus,
    };
    pub use crate::site::{export, Reconciler, SiteDefinition, SiteRegistry};
    pub use crate::storage::{SharedSiteRepository, SiteRepository};
}

// Direct re-exports for convenience
pub use models::{NewSite, Site, SitePatch, SiteSnapshot};
