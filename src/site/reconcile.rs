//! Consistency reconciler
//!
//! Keeps site records aligned with two outside sources of truth:
//!
//! - the node catalog: when a node is deleted, its id is trimmed from every
//!   stored explicit host list ([`Reconciler::on_node_deleted`]), and a
//!   full sweep removes any id the catalog no longer knows
//!   ([`Reconciler::sweep_dangling`]);
//! - the site-definition catalog: every definition is created or refreshed
//!   in the registry ([`Reconciler::reconcile_from_catalog`]).
//!
//! Every pass is idempotent. Each site is written with one store call, so a
//! pass interrupted by a store failure leaves valid records behind and can
//! simply be run again.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast::{self, error::RecvError};

use super::catalog::SiteDefinition;
use super::registry::SiteRegistry;
use crate::config::SiteDefaults;
use crate::error::{Result, SiteGridErrorTrait};
use crate::models::{NewSite, NodeId, SiteId, SitePatch};
use crate::scheduler::assignment::parse_host_list;
use crate::scheduler::nodes::{NodeCatalog, NodeEvent};

// ============================================================================
// Reports
// ============================================================================

/// Outcome of a host-list cleanup pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CascadeReport {
    /// Sites examined
    pub scanned: usize,
    /// Sites whose host list was rewritten
    pub updated: Vec<SiteId>,
    /// Sites left alone because their stored host list is corrupt
    pub skipped: Vec<SiteId>,
}

/// Outcome of a catalog reconciliation run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub created: Vec<SiteId>,
    pub updated: Vec<SiteId>,
    pub finished_at: DateTime<Utc>,
}

/// Totals for one node-event consumer run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WatchSummary {
    /// Events received
    pub events: usize,
    /// Full sweeps run after the receiver lagged
    pub sweeps: usize,
    /// Events or sweeps that ended in an error
    pub failures: usize,
}

// ============================================================================
// Reconciler
// ============================================================================

pub struct Reconciler {
    registry: Arc<SiteRegistry>,
    nodes: Arc<dyn NodeCatalog>,
    defaults: SiteDefaults,
}

impl Reconciler {
    pub fn new(
        registry: Arc<SiteRegistry>,
        nodes: Arc<dyn NodeCatalog>,
        defaults: SiteDefaults,
    ) -> Self {
        Self {
            registry,
            nodes,
            defaults,
        }
    }

    pub fn registry(&self) -> &Arc<SiteRegistry> {
        &self.registry
    }

    /// Remove a deleted node from every stored host list
    pub fn on_node_deleted(&self, node_id: NodeId) -> Result<CascadeReport> {
        let report = self.trim_hosts(|id| id == node_id)?;
        tracing::info!(
            node_id,
            scanned = report.scanned,
            updated = report.updated.len(),
            skipped = report.skipped.len(),
            "Node deletion cascade finished"
        );
        Ok(report)
    }

    /// Remove every host id the node catalog no longer contains
    pub fn sweep_dangling(&self) -> Result<CascadeReport> {
        let existing: HashSet<NodeId> = self.nodes.nodes()?.iter().map(|n| n.id).collect();
        let report = self.trim_hosts(|id| !existing.contains(&id))?;
        tracing::info!(
            nodes = existing.len(),
            scanned = report.scanned,
            updated = report.updated.len(),
            skipped = report.skipped.len(),
            "Dangling host sweep finished"
        );
        Ok(report)
    }

    fn trim_hosts(&self, remove: impl Fn(NodeId) -> bool) -> Result<CascadeReport> {
        let sites = self.registry.all()?;
        let mut report = CascadeReport {
            scanned: sites.len(),
            ..Default::default()
        };

        for site in &sites {
            let hosts = match parse_host_list(&site.node_hosts) {
                Ok(hosts) => hosts,
                Err(e) => {
                    tracing::warn!(
                        site_id = site.id,
                        key = %site.key,
                        error = %e,
                        "Skipping site with corrupt host list"
                    );
                    report.skipped.push(site.id);
                    continue;
                }
            };

            let kept: Vec<NodeId> = hosts.iter().copied().filter(|&id| !remove(id)).collect();
            if kept.len() == hosts.len() {
                continue;
            }

            let removed = hosts.len() - kept.len();
            self.registry.write_node_hosts(site.id, kept)?;
            tracing::debug!(site_id = site.id, removed, "Trimmed host list");
            report.updated.push(site.id);
        }

        Ok(report)
    }

    /// Consume node events until the channel closes or `shutdown` resolves
    ///
    /// Events already buffered when `shutdown` fires are still handled.
    /// A lagged receiver has lost events, so it falls back to a full sweep.
    pub async fn run<F>(
        &self,
        mut events: broadcast::Receiver<NodeEvent>,
        shutdown: F,
    ) -> WatchSummary
    where
        F: Future<Output = ()>,
    {
        let mut summary = WatchSummary::default();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;

                received = events.recv() => match received {
                    Ok(NodeEvent::Deleted { node_id, at }) => {
                        summary.events += 1;
                        tracing::debug!(node_id, %at, "Node deleted event");
                        if let Err(e) = self.on_node_deleted(node_id) {
                            summary.failures += 1;
                            tracing::error!(
                                node_id,
                                category = e.category().label(),
                                error = %e,
                                "Node deletion cascade failed"
                            );
                        }
                    }
                    Err(RecvError::Lagged(missed)) => {
                        summary.sweeps += 1;
                        tracing::warn!(missed, "Node events lagged, sweeping dangling hosts");
                        if let Err(e) = self.sweep_dangling() {
                            summary.failures += 1;
                            tracing::error!(
                                category = e.category().label(),
                                error = %e,
                                "Dangling host sweep failed"
                            );
                        }
                    }
                    Err(RecvError::Closed) => break,
                },

                _ = &mut shutdown => break,
            }
        }

        tracing::info!(
            events = summary.events,
            sweeps = summary.sweeps,
            failures = summary.failures,
            "Node event consumer stopped"
        );
        summary
    }

    /// Create or refresh one site per definition
    ///
    /// Existing sites get name, root, tags and content type refreshed; their
    /// schedule, enablement, description and assignment stay as they are.
    /// The first failure aborts the run.
    pub fn reconcile_from_catalog(&self, definitions: &[SiteDefinition]) -> Result<ReconcileReport> {
        let mut created = Vec::new();
        let mut updated = Vec::new();

        for def in definitions {
            let tags = def.tag_list();

            match self.registry.find_by_key(&def.key)? {
                Some(existing) => {
                    let patch = SitePatch {
                        name: Some(def.name.clone()),
                        root: Some(def.root.clone()),
                        tags: Some(tags),
                        content_type: Some(def.content_type),
                        ..Default::default()
                    };
                    self.registry.update(existing.id, patch).inspect_err(|e| {
                        tracing::error!(
                            key = %def.key,
                            category = e.category().label(),
                            error = %e,
                            "Catalog update failed"
                        );
                    })?;
                    updated.push(existing.id);
                }
                None => {
                    let site = NewSite::new(&def.key, &def.name, &def.root)
                        .with_desc(&def.desc)
                        .with_content_type(def.content_type)
                        .with_tags(tags)
                        .with_cron(&self.defaults.cron)
                        .with_enable(self.defaults.enabled.into())
                        .by_category(self.defaults.node_type);
                    let id = self.registry.create(site).inspect_err(|e| {
                        tracing::error!(
                            key = %def.key,
                            category = e.category().label(),
                            error = %e,
                            "Catalog create failed"
                        );
                    })?;
                    created.push(id);
                }
            }
        }

        let report = ReconcileReport {
            created,
            updated,
            finished_at: Utc::now(),
        };
        tracing::info!(
            definitions = definitions.len(),
            created = report.created.len(),
            updated = report.updated.len(),
            "Catalog reconciliation finished"
        );
        Ok(report)
    }
}
