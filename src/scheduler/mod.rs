//! Scheduling metadata and node routing
//!
//! # Modules
//!
//! - [`cron`] - Shape check for the 5-field cron expression of a site
//! - [`assignment`] - Which nodes are eligible to run a site
//! - [`nodes`] - Node catalog provider and node lifecycle events
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use sitegrid::scheduler::{AssignmentResolver, InMemoryNodeCatalog};
//!
//! let catalog = Arc::new(InMemoryNodeCatalog::with_nodes(config.nodes.clone()));
//! let resolver = AssignmentResolver::new(catalog);
//!
//! let eligibility = resolver.resolve(&site)?;
//! if eligibility.is_empty() {
//!     // no worker yet, try again on the next tick
//! }
//! ```

pub mod assignment;
pub mod cron;
pub mod nodes;

pub use assignment::{
    eligible_nodes, parse_host_list, serialize_host_list, AssignmentResolver, Eligibility,
    SiteAssignment,
};
pub use cron::{CronFields, DEFAULT_CRON};
pub use nodes::{InMemoryNodeCatalog, NodeCatalog, NodeEvent, NodeEventBus};
