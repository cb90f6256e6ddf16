//! Node catalog and node lifecycle events
//!
//! Node management lives outside this crate. The resolver only needs to
//! know which nodes exist and what category each belongs to, which is what
//! [`NodeCatalog`] exposes. Deletions are announced as [`NodeEvent`]s on a
//! [`NodeEventBus`] so site cleanup is driven by a message instead of a
//! direct call from node code.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::RwLock;
use tokio::sync::broadcast;

use crate::error::{Error, Result};
use crate::models::{Node, NodeId};

// ============================================================================
// Node Catalog
// ============================================================================

/// Source of the current node set
pub trait NodeCatalog: Send + Sync {
    /// Every node that currently exists, alive or not
    fn nodes(&self) -> Result<Vec<Node>>;

    /// Nodes currently able to take work
    fn live_nodes(&self) -> Result<Vec<Node>> {
        Ok(self.nodes()?.into_iter().filter(|n| n.alive).collect())
    }

    /// Check whether a node id exists
    fn contains(&self, id: NodeId) -> Result<bool> {
        Ok(self.nodes()?.iter().any(|n| n.id == id))
    }
}

/// In-memory node catalog
///
/// Used by the CLI (seeded from config) and by tests. When an event bus is
/// attached, [`InMemoryNodeCatalog::delete`] publishes a deletion event.
#[derive(Default)]
pub struct InMemoryNodeCatalog {
    nodes: RwLock<BTreeMap<NodeId, Node>>,
    events: Option<NodeEventBus>,
}

impl InMemoryNodeCatalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a catalog seeded with nodes
    pub fn with_nodes(nodes: impl IntoIterator<Item = Node>) -> Self {
        let nodes = nodes.into_iter().map(|n| (n.id, n)).collect();
        Self {
            nodes: RwLock::new(nodes),
            events: None,
        }
    }

    /// Attach an event bus for deletion announcements
    pub fn with_events(mut self, events: NodeEventBus) -> Self {
        self.events = Some(events);
        self
    }

    /// Insert or replace a node
    pub fn upsert(&self, node: Node) -> Result<()> {
        let mut nodes = self.nodes.write().map_err(|_| poisoned())?;
        tracing::debug!(node_id = node.id, category = %node.category, "Node upserted");
        nodes.insert(node.id, node);
        Ok(())
    }

    /// Remove a node and announce the deletion
    ///
    /// Returns the removed node, or `None` if the id was unknown (no event
    /// is published in that case).
    pub fn delete(&self, id: NodeId) -> Result<Option<Node>> {
        let removed = {
            let mut nodes = self.nodes.write().map_err(|_| poisoned())?;
            nodes.remove(&id)
        };

        if removed.is_some() {
            tracing::info!(node_id = id, "Node deleted");
            if let Some(events) = &self.events {
                events.publish(NodeEvent::deleted(id));
            }
        }

        Ok(removed)
    }

    /// Number of nodes in the catalog
    pub fn len(&self) -> usize {
        self.nodes.read().map(|n| n.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl NodeCatalog for InMemoryNodeCatalog {
    fn nodes(&self) -> Result<Vec<Node>> {
        let nodes = self.nodes.read().map_err(|_| poisoned())?;
        Ok(nodes.values().cloned().collect())
    }

    fn contains(&self, id: NodeId) -> Result<bool> {
        let nodes = self.nodes.read().map_err(|_| poisoned())?;
        Ok(nodes.contains_key(&id))
    }
}

fn poisoned() -> Error {
    Error::NodeCatalog("node table lock poisoned".to_string())
}

// ============================================================================
// Node Events
// ============================================================================

/// Node lifecycle events consumed by the reconciler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeEvent {
    /// A node was removed from the catalog
    Deleted {
        node_id: NodeId,
        at: DateTime<Utc>,
    },
}

impl NodeEvent {
    pub fn deleted(node_id: NodeId) -> Self {
        Self::Deleted {
            node_id,
            at: Utc::now(),
        }
    }
}

/// Broadcast channel for node events
#[derive(Debug, Clone)]
pub struct NodeEventBus {
    tx: broadcast::Sender<NodeEvent>,
}

impl NodeEventBus {
    /// Create a bus buffering up to `capacity` undelivered events per
    /// subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Subscribe to events published after this call
    pub fn subscribe(&self) -> broadcast::Receiver<NodeEvent> {
        self.tx.subscribe()
    }

    /// Publish an event, returning how many subscribers received it
    pub fn publish(&self, event: NodeEvent) -> usize {
        match self.tx.send(event) {
            Ok(receivers) => receivers,
            Err(broadcast::error::SendError(event)) => {
                tracing::debug!(?event, "No node event subscribers");
                0
            }
        }
    }
}

impl Default for NodeEventBus {
    fn default() -> Self {
        Self::new(64)
    }
}
