use anyhow::{Context, Result};
use std::path::PathBuf;

use sitegrid::models::{
    ContentType, NewSite, NodeCategory, NodeId, NodeOption, SiteFilter, SiteId, SitePatch, Tag,
};
use sitegrid::site::{self, load_catalog, Reconciler};

use super::Runtime;

/// Reconcile the registry from the site-definition catalog
pub fn init(rt: &Runtime, catalog: Option<PathBuf>) -> Result<()> {
    let path = catalog.unwrap_or_else(|| rt.config.sites.catalog_path.clone());
    let definitions = load_catalog(&path)
        .with_context(|| format!("Failed to load site catalog: {}", path.display()))?;

    let reconciler = Reconciler::new(
        rt.registry.clone(),
        rt.nodes.clone(),
        rt.config.sites.clone(),
    );
    let report = reconciler
        .reconcile_from_catalog(&definitions)
        .context("Catalog reconciliation failed")?;

    println!("Catalog reconciled from {}", path.display());
    println!("  Created: {}", report.created.len());
    println!("  Updated: {}", report.updated.len());
    println!("  Finished at: {}", report.finished_at.to_rfc3339());
    Ok(())
}

/// Print snapshots, one JSON object per line
pub fn list(rt: &Runtime, enabled_only: bool) -> Result<()> {
    let filter = if enabled_only {
        SiteFilter::Enabled
    } else {
        SiteFilter::All
    };

    let sites = rt.registry.find(&filter)?;
    for snapshot in site::export_all(&sites)? {
        println!("{}", serde_json::to_string(&snapshot)?);
    }
    Ok(())
}

pub fn show(rt: &Runtime, id: SiteId) -> Result<()> {
    let site = rt.registry.get(id)?;
    let snapshot = site::export(&site)?;
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}

/// Print the front-end tab configuration
pub fn tabs(rt: &Runtime) -> Result<()> {
    let sites = rt.registry.find(&SiteFilter::Enabled)?;
    let tabs = site::site_tabs(&sites)?;
    println!("{}", serde_json::to_string_pretty(&tabs)?);
    Ok(())
}

/// Parameters for the create command
pub struct CreateParams {
    pub key: String,
    pub name: String,
    pub root: String,
    pub desc: Option<String>,
    pub content_type: Option<ContentType>,
    pub cron: Option<String>,
    pub enable: bool,
    pub tags: Vec<Tag>,
    pub node_type: Option<NodeCategory>,
    pub hosts: Option<Vec<NodeId>>,
}

pub fn create(rt: &Runtime, params: CreateParams) -> Result<()> {
    let defaults = &rt.config.sites;

    let mut site = NewSite::new(params.key, params.name, params.root)
        .with_desc(params.desc.unwrap_or_default())
        .with_content_type(params.content_type.unwrap_or_default())
        .with_tags(params.tags)
        .with_cron(params.cron.unwrap_or_else(|| defaults.cron.clone()))
        .with_enable(params.enable.into())
        .by_category(params.node_type.unwrap_or(defaults.node_type));

    if let Some(hosts) = params.hosts {
        site = site.by_hosts(hosts);
    }

    let id = rt.registry.create(site)?;
    println!("Created site {id}");
    Ok(())
}

/// Parameters for the update command
#[derive(Default)]
pub struct UpdateParams {
    pub name: Option<String>,
    pub root: Option<String>,
    pub desc: Option<String>,
    pub content_type: Option<ContentType>,
    pub cron: Option<String>,
    pub enable: Option<bool>,
    pub tags: Option<Vec<Tag>>,
    pub node_type: Option<NodeCategory>,
    pub hosts: Option<Vec<NodeId>>,
}

impl UpdateParams {
    fn into_patch(self) -> SitePatch {
        let node_option = match (&self.hosts, self.node_type) {
            (Some(_), _) => Some(NodeOption::ByExplicitHosts),
            (None, Some(_)) => Some(NodeOption::ByCategory),
            (None, None) => None,
        };

        SitePatch {
            name: self.name,
            root: self.root,
            desc: self.desc,
            content_type: self.content_type,
            tags: self.tags,
            cron: self.cron,
            enable: self.enable.map(Into::into),
            node_option,
            node_type: self.node_type,
            node_hosts: self.hosts,
        }
    }
}

pub fn update(rt: &Runtime, id: SiteId, params: UpdateParams) -> Result<()> {
    let patch = params.into_patch();
    if patch.is_empty() {
        tracing::info!(site_id = id, "No fields given, checking the site exists");
    }

    rt.registry.update(id, patch)?;
    println!("Updated site {id}");
    Ok(())
}
