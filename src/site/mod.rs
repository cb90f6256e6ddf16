//! Site registry, reconciliation and export
//!
//! - [`tags`]: tag list normalization and encoding
//! - [`registry`]: validated create/update/lookup over the site store
//! - [`reconcile`]: node-deletion cascade and catalog reconciliation
//! - [`export`]: wire snapshots and front-end tabs
//! - [`catalog`]: the external site-definition file

pub mod catalog;
pub mod export;
pub mod reconcile;
pub mod registry;
pub mod tags;

pub use catalog::{load_catalog, parse_catalog, SiteDefinition, TagDefinition};
pub use export::{export, export_all, site_tabs};
pub use reconcile::{CascadeReport, ReconcileReport, Reconciler, WatchSummary};
pub use registry::SiteRegistry;
