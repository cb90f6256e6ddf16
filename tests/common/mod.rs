//! Common test utilities

use std::sync::Arc;

use sitegrid::config::SiteDefaults;
use sitegrid::models::{
    ContentType, NewSite, Node, NodeCategory, NodeId, NodeOption, Site, SiteId, Status,
};
use sitegrid::scheduler::InMemoryNodeCatalog;
use sitegrid::site::{Reconciler, SiteRegistry};
use sitegrid::storage::{MockSiteRepository, SharedSiteRepository, SqliteSiteRepository};

/// One registry per store implementation
#[allow(dead_code)]
pub fn create_test_registries() -> Vec<Arc<SiteRegistry>> {
    let repos: Vec<SharedSiteRepository> = vec![
        Arc::new(SqliteSiteRepository::in_memory().unwrap()),
        Arc::new(MockSiteRepository::new()),
    ];
    repos
        .into_iter()
        .map(|repo| Arc::new(SiteRegistry::new(repo)))
        .collect()
}

/// Node catalog with live domestic nodes 3, 5 and 9
#[allow(dead_code)]
pub fn create_node_catalog() -> Arc<InMemoryNodeCatalog> {
    Arc::new(InMemoryNodeCatalog::with_nodes([
        Node::new(3, NodeCategory::DOMESTIC),
        Node::new(5, NodeCategory::DOMESTIC),
        Node::new(9, NodeCategory::DOMESTIC),
    ]))
}

/// Reconciler over a fresh registry for each store implementation
#[allow(dead_code)]
pub fn create_test_reconcilers() -> Vec<Reconciler> {
    create_test_registries()
        .into_iter()
        .map(|registry| Reconciler::new(registry, create_node_catalog(), SiteDefaults::default()))
        .collect()
}

/// A site routed to an explicit host list
#[allow(dead_code)]
pub fn hosted_site(key: &str, hosts: Vec<NodeId>) -> NewSite {
    NewSite::new(key, key.to_uppercase(), format!("https://{key}.example.com")).by_hosts(hosts)
}

/// A stored record with raw tag and host columns
#[allow(dead_code)]
pub fn raw_site(id: SiteId, key: &str, tags: &str, node_hosts: &str) -> Site {
    Site {
        id,
        name: key.to_uppercase(),
        key: key.to_string(),
        root: format!("https://{key}.example.com"),
        desc: String::new(),
        content_type: ContentType::Html,
        tags: tags.to_string(),
        cron: "*/30 * * * *".to_string(),
        enable: Status::Enabled,
        node_option: NodeOption::ByExplicitHosts,
        node_type: NodeCategory::DOMESTIC,
        node_hosts: node_hosts.to_string(),
    }
}
