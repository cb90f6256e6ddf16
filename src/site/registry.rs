//! Site registry
//!
//! The registry is the write gate for site records. Everything a caller
//! supplies is validated here before it reaches the store; fields left out
//! of a patch are assumed to be valid already and are not re-checked.

use std::sync::Arc;

use url::Url;

use super::tags;
use crate::error::{Error, Result};
use crate::models::{NewSite, NodeId, Site, SiteFilter, SiteId, SitePatch};
use crate::scheduler::assignment::dedup_hosts;
use crate::scheduler::cron;
use crate::scheduler::nodes::NodeCatalog;
use crate::storage::SharedSiteRepository;

/// Validating front end over a [`SiteRepository`](crate::storage::SiteRepository)
pub struct SiteRegistry {
    repo: SharedSiteRepository,
    nodes: Option<Arc<dyn NodeCatalog>>,
}

impl SiteRegistry {
    pub fn new(repo: SharedSiteRepository) -> Self {
        Self { repo, nodes: None }
    }

    /// Check explicit host ids against a node catalog on every write
    pub fn with_node_catalog(mut self, nodes: Arc<dyn NodeCatalog>) -> Self {
        self.nodes = Some(nodes);
        self
    }

    /// Underlying store handle
    pub fn repository(&self) -> &SharedSiteRepository {
        &self.repo
    }

    /// Validate and store a new site
    ///
    /// A site sharing either the key or the root with an existing record is
    /// rejected with [`Error::DuplicateKeyOrRoot`] and nothing is written.
    pub fn create(&self, site: NewSite) -> Result<SiteId> {
        let site = self.prepare_new(site)?;

        let existing = self.repo.find(&SiteFilter::KeyOrRoot {
            key: site.key.clone(),
            root: site.root.clone(),
        })?;
        if let Some(other) = existing.first() {
            tracing::warn!(
                key = %site.key,
                root = %site.root,
                existing_id = other.id,
                "Rejected duplicate site"
            );
            return Err(Error::DuplicateKeyOrRoot {
                key: site.key,
                root: site.root,
            });
        }

        let id = self.repo.insert(&site)?;
        tracing::info!(site_id = id, key = %site.key, "Site created");
        Ok(id)
    }

    /// Validate and apply a partial update
    pub fn update(&self, id: SiteId, patch: SitePatch) -> Result<()> {
        let patch = self.prepare_patch(patch)?;

        if patch.is_empty() {
            tracing::debug!(site_id = id, "Empty site patch");
        }

        self.repo.update(id, &patch)?;
        tracing::info!(site_id = id, "Site updated");
        Ok(())
    }

    /// Replace a stored host list without checking ids against the catalog
    ///
    /// Used by reconciliation, which only ever shrinks a list and must be
    /// able to write it back while other ids in it are themselves stale.
    pub(crate) fn write_node_hosts(&self, id: SiteId, hosts: Vec<NodeId>) -> Result<()> {
        let patch = SitePatch {
            node_hosts: Some(dedup_hosts(&hosts)),
            ..Default::default()
        };
        self.repo.update(id, &patch)
    }

    pub fn get(&self, id: SiteId) -> Result<Site> {
        self.repo.get(id)?.ok_or(Error::NotFound { id })
    }

    pub fn find(&self, filter: &SiteFilter) -> Result<Vec<Site>> {
        self.repo.find(filter)
    }

    pub fn find_by_key(&self, key: &str) -> Result<Option<Site>> {
        Ok(self
            .repo
            .find(&SiteFilter::Key(key.to_string()))?
            .into_iter()
            .next())
    }

    pub fn all(&self) -> Result<Vec<Site>> {
        self.repo.find(&SiteFilter::All)
    }

    // ========================================================================
    // Validation
    // ========================================================================

    fn prepare_new(&self, mut site: NewSite) -> Result<NewSite> {
        site.key = site.key.trim().to_string();
        site.name = site.name.trim().to_string();
        site.root = site.root.trim().to_string();

        validate_key(&site.key)?;
        validate_name(&site.name)?;
        validate_root(&site.root)?;
        cron::validate(&site.cron)?;

        site.tags = tags::normalize(site.tags);
        site.node_hosts = self.check_hosts(&site.node_hosts)?;
        Ok(site)
    }

    fn prepare_patch(&self, mut patch: SitePatch) -> Result<SitePatch> {
        if let Some(name) = patch.name.as_mut() {
            *name = name.trim().to_string();
            validate_name(name)?;
        }
        if let Some(root) = patch.root.as_mut() {
            *root = root.trim().to_string();
            validate_root(root)?;
        }
        if let Some(expr) = &patch.cron {
            cron::validate(expr)?;
        }
        if let Some(tag_list) = patch.tags.take() {
            patch.tags = Some(tags::normalize(tag_list));
        }
        if let Some(hosts) = patch.node_hosts.take() {
            patch.node_hosts = Some(self.check_hosts(&hosts)?);
        }
        Ok(patch)
    }

    fn check_hosts(&self, hosts: &[NodeId]) -> Result<Vec<NodeId>> {
        let hosts = dedup_hosts(hosts);

        if let Some(catalog) = &self.nodes {
            for &id in &hosts {
                if !catalog.contains(id)? {
                    return Err(Error::validation(
                        "node_hosts",
                        format!("node {id} does not exist"),
                    ));
                }
            }
        }

        Ok(hosts)
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::validation("name", "must not be empty"));
    }
    Ok(())
}

fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(Error::validation("key", "must not be empty"));
    }
    if key.chars().any(char::is_whitespace) {
        return Err(Error::validation(
            "key",
            format!("'{key}' must not contain whitespace"),
        ));
    }
    Ok(())
}

fn validate_root(root: &str) -> Result<()> {
    let url = Url::parse(root).map_err(|e| Error::validation("root", format!("'{root}': {e}")))?;

    match url.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(Error::validation(
            "root",
            format!("unsupported scheme '{scheme}' in '{root}'"),
        )),
    }
}
