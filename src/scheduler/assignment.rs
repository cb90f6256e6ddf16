//! Site-to-node assignment
//!
//! Decides which worker nodes may execute a site. A site either routes by
//! node category (every live node in the selected category) or to an
//! explicit host list, which is filtered against the live catalog at read
//! time. Stale ids in a stored host list are dropped from the result here
//! but only removed from storage by the reconciler.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use super::nodes::NodeCatalog;
use crate::error::{Error, Result};
use crate::models::{Node, NodeId, NodeOption, Site, SiteId};

// ============================================================================
// Host List Encoding
// ============================================================================

/// Decode a stored `node_hosts` value
///
/// An empty value is the empty list. Anything else, including a blank
/// string, must be a JSON array of integers.
pub fn parse_host_list(raw: &str) -> Result<Vec<NodeId>> {
    if raw.is_empty() {
        return Ok(Vec::new());
    }

    serde_json::from_str(raw).map_err(|e| Error::HostListCorrupt {
        reason: e.to_string(),
    })
}

/// Encode a host list for storage
pub fn serialize_host_list(hosts: &[NodeId]) -> String {
    let ids: Vec<String> = hosts.iter().map(ToString::to_string).collect();
    format!("[{}]", ids.join(","))
}

/// Drop repeated ids, keeping first occurrences in order
pub fn dedup_hosts(hosts: &[NodeId]) -> Vec<NodeId> {
    let mut seen = HashSet::with_capacity(hosts.len());
    hosts.iter().copied().filter(|id| seen.insert(*id)).collect()
}

// ============================================================================
// Eligibility
// ============================================================================

/// Result of resolving a site against the live node set
///
/// `corrupt` is set when the stored host list could not be decoded; `nodes`
/// is then empty so routing degrades to "nobody runs it" instead of failing.
#[derive(Debug, Default)]
pub struct Eligibility {
    pub nodes: BTreeSet<NodeId>,
    pub corrupt: Option<Error>,
}

impl Eligibility {
    /// No node may currently run the site
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains(&id)
    }

    /// Surface a corrupt host list as an error
    pub fn into_result(self) -> Result<BTreeSet<NodeId>> {
        match self.corrupt {
            Some(err) => Err(err),
            None => Ok(self.nodes),
        }
    }
}

/// Compute the nodes eligible to run `site` given the live node set
pub fn eligible_nodes(site: &Site, live: &[Node]) -> Eligibility {
    match site.node_option {
        NodeOption::ByCategory => Eligibility {
            nodes: live
                .iter()
                .filter(|n| n.category == site.node_type)
                .map(|n| n.id)
                .collect(),
            corrupt: None,
        },
        NodeOption::ByExplicitHosts => match parse_host_list(&site.node_hosts) {
            Ok(hosts) => {
                let live_ids: HashSet<NodeId> = live.iter().map(|n| n.id).collect();
                Eligibility {
                    nodes: hosts.into_iter().filter(|id| live_ids.contains(id)).collect(),
                    corrupt: None,
                }
            }
            Err(err) => {
                tracing::warn!(
                    site_id = site.id,
                    key = %site.key,
                    error = %err,
                    "Stored host list is corrupt, routing to no nodes"
                );
                Eligibility {
                    nodes: BTreeSet::new(),
                    corrupt: Some(err),
                }
            }
        },
    }
}

// ============================================================================
// Assignment Resolver
// ============================================================================

/// One site's resolved assignment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteAssignment {
    pub site_id: SiteId,
    pub key: String,
    pub nodes: Vec<NodeId>,
}

/// Resolves assignments against a node catalog
pub struct AssignmentResolver {
    catalog: Arc<dyn NodeCatalog>,
}

impl AssignmentResolver {
    pub fn new(catalog: Arc<dyn NodeCatalog>) -> Self {
        Self { catalog }
    }

    /// Resolve one site against the current live nodes
    pub fn resolve(&self, site: &Site) -> Result<Eligibility> {
        let live = self.catalog.live_nodes()?;
        Ok(eligible_nodes(site, &live))
    }

    /// Resolve every site, reading the node catalog once
    ///
    /// Sites with a corrupt host list resolve to no nodes.
    pub fn plan(&self, sites: &[Site]) -> Result<Vec<SiteAssignment>> {
        let live = self.catalog.live_nodes()?;

        Ok(sites
            .iter()
            .map(|site| SiteAssignment {
                site_id: site.id,
                key: site.key.clone(),
                nodes: eligible_nodes(site, &live).nodes.into_iter().collect(),
            })
            .collect())
    }

    /// Enabled sites the given node should execute
    ///
    /// A node that is not live gets nothing.
    pub fn sites_for_node(&self, node_id: NodeId, sites: &[Site]) -> Result<Vec<SiteId>> {
        let live = self.catalog.live_nodes()?;
        if !live.iter().any(|n| n.id == node_id) {
            tracing::debug!(node_id, "Node is not live, no sites assigned");
            return Ok(Vec::new());
        }

        Ok(sites
            .iter()
            .filter(|site| site.enable.is_enabled())
            .filter(|site| eligible_nodes(site, &live).contains(node_id))
            .map(|site| site.id)
            .collect())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ContentType, NodeCategory, Status};
    use crate::scheduler::nodes::InMemoryNodeCatalog;

    fn site(id: SiteId, option: NodeOption, node_type: i8, hosts: &str) -> Site {
        Site {
            id,
            name: format!("site-{id}"),
            key: format!("site-{id}"),
            root: format!("https://site-{id}.example.com"),
            desc: String::new(),
            content_type: ContentType::Html,
            tags: String::new(),
            cron: "*/30 * * * *".to_string(),
            enable: Status::Enabled,
            node_option: option,
            node_type: NodeCategory(node_type),
            node_hosts: hosts.to_string(),
        }
    }

    fn live() -> Vec<Node> {
        vec![
            Node::new(3, NodeCategory(1)),
            Node::new(5, NodeCategory(2)),
            Node::new(9, NodeCategory(1)),
        ]
    }

    #[test]
    fn test_host_list_encoding() {
        assert_eq!(parse_host_list("").unwrap(), Vec::<NodeId>::new());
        assert_eq!(parse_host_list("[3,7,9]").unwrap(), vec![3, 7, 9]);
        assert_eq!(serialize_host_list(&[3, 7, 9]), "[3,7,9]");
        assert_eq!(serialize_host_list(&[]), "[]");
        assert!(matches!(
            parse_host_list("not-json"),
            Err(Error::HostListCorrupt { .. })
        ));
    }

    #[test]
    fn test_blank_host_list_is_corrupt() {
        assert!(matches!(
            parse_host_list(" \n "),
            Err(Error::HostListCorrupt { .. })
        ));
    }

    #[test]
    fn test_dedup_hosts_keeps_order() {
        assert_eq!(dedup_hosts(&[4, 2, 4, 1, 2]), vec![4, 2, 1]);
    }

    #[test]
    fn test_by_category() {
        let s = site(1, NodeOption::ByCategory, 1, "");
        let result = eligible_nodes(&s, &live());
        assert_eq!(result.nodes.into_iter().collect::<Vec<_>>(), vec![3, 9]);
    }

    #[test]
    fn test_by_category_empty_is_not_error() {
        let s = site(1, NodeOption::ByCategory, 7, "");
        let result = eligible_nodes(&s, &live());
        assert!(result.is_empty());
        assert!(result.corrupt.is_none());
    }

    #[test]
    fn test_by_hosts_intersects_live() {
        let s = site(1, NodeOption::ByExplicitHosts, 1, "[3,7,9]");
        let result = eligible_nodes(&s, &live());
        assert_eq!(result.into_result().unwrap(), BTreeSet::from([3, 9]));
    }

    #[test]
    fn test_by_hosts_ignores_category() {
        let s = site(1, NodeOption::ByExplicitHosts, 1, "[5]");
        assert!(eligible_nodes(&s, &live()).contains(5));
    }

    #[test]
    fn test_corrupt_hosts_degrade_to_empty() {
        let s = site(1, NodeOption::ByExplicitHosts, 1, "not-json");
        let result = eligible_nodes(&s, &live());
        assert!(result.is_empty());
        assert!(matches!(result.corrupt, Some(Error::HostListCorrupt { .. })));
    }

    #[test]
    fn test_category_mode_ignores_corrupt_hosts() {
        let s = site(1, NodeOption::ByCategory, 2, "not-json");
        let result = eligible_nodes(&s, &live());
        assert!(result.corrupt.is_none());
        assert!(result.contains(5));
    }

    #[test]
    fn test_resolver_uses_live_nodes_only() {
        let catalog = InMemoryNodeCatalog::with_nodes([
            Node::new(1, NodeCategory(1)),
            Node::new(2, NodeCategory(1)).with_alive(false),
        ]);
        let resolver = AssignmentResolver::new(Arc::new(catalog));

        let s = site(1, NodeOption::ByCategory, 1, "");
        let result = resolver.resolve(&s).unwrap();
        assert_eq!(result.nodes, BTreeSet::from([1]));
    }

    #[test]
    fn test_sites_for_node() {
        let catalog = InMemoryNodeCatalog::with_nodes(live());
        let resolver = AssignmentResolver::new(Arc::new(catalog));

        let mut disabled = site(4, NodeOption::ByCategory, 1, "");
        disabled.enable = Status::Disabled;
        let sites = vec![
            site(1, NodeOption::ByCategory, 1, ""),
            site(2, NodeOption::ByExplicitHosts, 1, "[5,9]"),
            site(3, NodeOption::ByExplicitHosts, 1, "[5]"),
            disabled,
        ];

        assert_eq!(resolver.sites_for_node(9, &sites).unwrap(), vec![1, 2]);
        assert_eq!(resolver.sites_for_node(5, &sites).unwrap(), vec![2, 3]);
        assert!(resolver.sites_for_node(42, &sites).unwrap().is_empty());
    }

    #[test]
    fn test_plan() {
        let catalog = InMemoryNodeCatalog::with_nodes(live());
        let resolver = AssignmentResolver::new(Arc::new(catalog));
        let sites = vec![
            site(1, NodeOption::ByCategory, 2, ""),
            site(2, NodeOption::ByExplicitHosts, 1, "garbage"),
        ];

        let plan = resolver.plan(&sites).unwrap();
        assert_eq!(plan[0].nodes, vec![5]);
        assert!(plan[1].nodes.is_empty());
    }
}
