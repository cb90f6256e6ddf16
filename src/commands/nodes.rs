use anyhow::{Context, Result};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::oneshot;

use sitegrid::models::{NodeId, SiteFilter, SiteId};
use sitegrid::scheduler::{AssignmentResolver, NodeEvent};
use sitegrid::site::Reconciler;

use super::Runtime;

#[derive(Serialize)]
struct EligibleOutput {
    site_id: SiteId,
    key: String,
    nodes: Vec<NodeId>,
}

/// Resolve the nodes that may run a site
pub fn eligible(rt: &Runtime, id: SiteId) -> Result<()> {
    let site = rt.registry.get(id)?;
    let resolver = AssignmentResolver::new(rt.nodes.clone());
    let eligibility = resolver.resolve(&site)?;

    if let Some(err) = &eligibility.corrupt {
        eprintln!("warning: site {id}: {err}");
    }
    if eligibility.is_empty() {
        tracing::info!(site_id = id, "No eligible node yet");
    }

    let output = EligibleOutput {
        site_id: site.id,
        key: site.key,
        nodes: eligibility.nodes.into_iter().collect(),
    };
    println!("{}", serde_json::to_string(&output)?);
    Ok(())
}

/// List the enabled sites a node should run
pub fn node_sites(rt: &Runtime, node_id: NodeId) -> Result<()> {
    let sites = rt.registry.find(&SiteFilter::Enabled)?;
    let resolver = AssignmentResolver::new(rt.nodes.clone());

    let ids = resolver.sites_for_node(node_id, &sites)?;
    println!("{}", serde_json::to_string(&ids)?);
    Ok(())
}

/// Delete a node and cascade the removal through the node-event path
///
/// The configured node list is not rewritten; only the site store changes.
pub async fn delete_node(rt: &Runtime, node_id: NodeId) -> Result<()> {
    let reconciler = Arc::new(Reconciler::new(
        rt.registry.clone(),
        rt.nodes.clone(),
        rt.config.sites.clone(),
    ));

    let events = rt.events.subscribe();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();

    let watcher = tokio::spawn({
        let reconciler = reconciler.clone();
        async move {
            reconciler
                .run(events, async {
                    let _ = stop_rx.await;
                })
                .await
        }
    });

    match rt.nodes.delete(node_id)? {
        Some(node) => tracing::debug!(node_id, category = %node.category, "Configured node removed"),
        None => {
            // Not in the configured list; still announce it so stale host
            // references are cleaned up
            tracing::warn!(node_id, "Node not in configured catalog");
            rt.events.publish(NodeEvent::deleted(node_id));
        }
    }

    let _ = stop_tx.send(());
    let summary = watcher.await.context("Node event consumer panicked")?;

    if summary.failures > 0 {
        anyhow::bail!(
            "{} of {} node events failed to reconcile",
            summary.failures,
            summary.events + summary.sweeps
        );
    }

    println!("Node {node_id} removed from all site host lists");
    Ok(())
}
