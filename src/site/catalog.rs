//! Site-definition catalog
//!
//! The catalog lists the sites this deployment knows how to crawl. It is
//! read once at startup and reconciled into the registry. On disk it is a
//! TOML file with one `[[site]]` table per definition:
//!
//! ```toml
//! [[site]]
//! key = "v2ex"
//! name = "V2EX"
//! root = "https://www.v2ex.com"
//! desc = "Hot topics"
//! type = 1
//! tags = [{ key = "hot", name = "Hot" }]
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

use super::tags;
use crate::error::{Error, Result};
use crate::models::{ContentType, Tag};

/// A sub-feed as listed in the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagDefinition {
    pub key: String,
    pub name: String,
}

/// One externally defined site
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteDefinition {
    pub key: String,
    pub name: String,
    pub root: String,
    #[serde(default)]
    pub desc: String,
    #[serde(default, rename = "type")]
    pub content_type: ContentType,
    #[serde(default)]
    pub tags: Vec<TagDefinition>,
}

impl SiteDefinition {
    pub fn new(key: impl Into<String>, name: impl Into<String>, root: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
            root: root.into(),
            desc: String::new(),
            content_type: ContentType::Html,
            tags: Vec::new(),
        }
    }

    pub fn with_desc(mut self, desc: impl Into<String>) -> Self {
        self.desc = desc.into();
        self
    }

    pub fn with_content_type(mut self, content_type: ContentType) -> Self {
        self.content_type = content_type;
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, name: impl Into<String>) -> Self {
        self.tags.push(TagDefinition {
            key: key.into(),
            name: name.into(),
        });
        self
    }

    /// Normalized tag list; every catalog tag starts enabled
    pub fn tag_list(&self) -> Vec<Tag> {
        tags::normalize(self.tags.iter().map(|t| Tag::new(&t.key, &t.name)))
    }
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default, rename = "site")]
    sites: Vec<SiteDefinition>,
}

/// Parse catalog TOML, keeping file order
pub fn parse_catalog(content: &str) -> std::result::Result<Vec<SiteDefinition>, toml::de::Error> {
    let file: CatalogFile = toml::from_str(content)?;
    Ok(file.sites)
}

/// Load the catalog file
pub fn load_catalog(path: impl AsRef<Path>) -> Result<Vec<SiteDefinition>> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| Error::Catalog {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let definitions = parse_catalog(&content).map_err(|e| Error::Catalog {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    tracing::debug!(path = %path.display(), count = definitions.len(), "Site catalog loaded");
    Ok(definitions)
}
