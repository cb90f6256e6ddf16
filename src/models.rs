// Core data structures for sitegrid

use serde::{Deserialize, Serialize};
use std::fmt;

/// Registry-assigned site identifier
pub type SiteId = i64;

/// Worker node identifier
pub type NodeId = i64;

/// Error returned when an integer code does not name a known variant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownCode {
    pub kind: &'static str,
    pub code: u8,
}

impl fmt::Display for UnknownCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown {} code {}", self.kind, self.code)
    }
}

impl std::error::Error for UnknownCode {}

/// Enablement flag, encoded as 0/1 on the wire and in the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Status {
    #[default]
    Disabled = 0,
    Enabled = 1,
}

impl Status {
    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::Enabled)
    }
}

impl From<bool> for Status {
    fn from(enabled: bool) -> Self {
        if enabled {
            Self::Enabled
        } else {
            Self::Disabled
        }
    }
}

impl From<Status> for u8 {
    fn from(status: Status) -> Self {
        status as u8
    }
}

impl TryFrom<u8> for Status {
    type Error = UnknownCode;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Self::Disabled),
            1 => Ok(Self::Enabled),
            _ => Err(UnknownCode {
                kind: "status",
                code,
            }),
        }
    }
}

/// How the remote site is read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum ContentType {
    /// An HTML page that needs scraping
    #[default]
    Html = 1,
    /// A structured JSON API response
    Api = 2,
}

impl From<ContentType> for u8 {
    fn from(content_type: ContentType) -> Self {
        content_type as u8
    }
}

impl TryFrom<u8> for ContentType {
    type Error = UnknownCode;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(Self::Html),
            2 => Ok(Self::Api),
            _ => Err(UnknownCode {
                kind: "content type",
                code,
            }),
        }
    }
}

/// Assignment mode deciding which nodes a site routes to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum NodeOption {
    /// Every live node whose category matches `node_type`
    #[default]
    ByCategory = 1,
    /// The explicit `node_hosts` list, filtered to existing nodes
    ByExplicitHosts = 2,
}

impl From<NodeOption> for u8 {
    fn from(option: NodeOption) -> Self {
        option as u8
    }
}

impl TryFrom<u8> for NodeOption {
    type Error = UnknownCode;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(Self::ByCategory),
            2 => Ok(Self::ByExplicitHosts),
            _ => Err(UnknownCode {
                kind: "node option",
                code,
            }),
        }
    }
}

/// Node category selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeCategory(pub i8);

impl NodeCategory {
    /// Machines hosted in the home region
    pub const DOMESTIC: Self = Self(1);
}

impl Default for NodeCategory {
    fn default() -> Self {
        Self::DOMESTIC
    }
}

impl fmt::Display for NodeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A labeled sub-feed of a site
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tag {
    pub key: String,
    pub name: String,
    pub enable: Status,
}

impl Tag {
    /// Create an enabled tag
    pub fn new(key: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
            enable: Status::Enabled,
        }
    }

    /// Set the enablement flag
    pub fn with_enable(mut self, enable: Status) -> Self {
        self.enable = enable;
        self
    }
}

/// A stored site record
///
/// `tags` and `node_hosts` hold the serialized form exactly as persisted;
/// decode them with [`crate::site::tags::parse`] and
/// [`crate::scheduler::assignment::parse_host_list`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Site {
    pub id: SiteId,
    pub name: String,
    pub key: String,
    pub root: String,
    pub desc: String,
    pub content_type: ContentType,
    pub tags: String,
    pub cron: String,
    pub enable: Status,
    pub node_option: NodeOption,
    pub node_type: NodeCategory,
    pub node_hosts: String,
}

/// Input for creating a site
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSite {
    pub name: String,
    pub key: String,
    pub root: String,
    pub desc: String,
    pub content_type: ContentType,
    pub tags: Vec<Tag>,
    pub cron: String,
    pub enable: Status,
    pub node_option: NodeOption,
    pub node_type: NodeCategory,
    pub node_hosts: Vec<NodeId>,
}

impl NewSite {
    /// Create with required identity fields and default scheduling
    pub fn new(key: impl Into<String>, name: impl Into<String>, root: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key: key.into(),
            root: root.into(),
            desc: String::new(),
            content_type: ContentType::Html,
            tags: Vec::new(),
            cron: crate::scheduler::cron::DEFAULT_CRON.to_string(),
            enable: Status::Disabled,
            node_option: NodeOption::ByCategory,
            node_type: NodeCategory::DOMESTIC,
            node_hosts: Vec::new(),
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

    pub fn with_tags(mut self, tags: Vec<Tag>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_cron(mut self, cron: impl Into<String>) -> Self {
        self.cron = cron.into();
        self
    }

    pub fn with_enable(mut self, enable: Status) -> Self {
        self.enable = enable;
        self
    }

    /// Route by node category
    pub fn by_category(mut self, category: NodeCategory) -> Self {
        self.node_option = NodeOption::ByCategory;
        self.node_type = category;
        self
    }

    /// Route to an explicit host list
    pub fn by_hosts(mut self, hosts: Vec<NodeId>) -> Self {
        self.node_option = NodeOption::ByExplicitHosts;
        self.node_hosts = hosts;
        self
    }
}

/// Partial update of a site; `None` leaves the stored column untouched
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SitePatch {
    pub name: Option<String>,
    pub root: Option<String>,
    pub desc: Option<String>,
    pub content_type: Option<ContentType>,
    pub tags: Option<Vec<Tag>>,
    pub cron: Option<String>,
    pub enable: Option<Status>,
    pub node_option: Option<NodeOption>,
    pub node_type: Option<NodeCategory>,
    pub node_hosts: Option<Vec<NodeId>>,
}

impl SitePatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Predicates supported by the site store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SiteFilter {
    All,
    Key(String),
    /// Sites sharing either the key or the root
    KeyOrRoot { key: String, root: String },
    Enabled,
    Mode(NodeOption),
}

impl SiteFilter {
    /// Evaluate the predicate against an in-memory record
    pub fn matches(&self, site: &Site) -> bool {
        match self {
            Self::All => true,
            Self::Key(key) => site.key == *key,
            Self::KeyOrRoot { key, root } => site.key == *key || site.root == *root,
            Self::Enabled => site.enable.is_enabled(),
            Self::Mode(option) => site.node_option == *option,
        }
    }
}

/// A worker node as reported by the node catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub category: NodeCategory,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default = "default_alive")]
    pub alive: bool,
}

fn default_alive() -> bool {
    true
}

impl Node {
    pub fn new(id: NodeId, category: NodeCategory) -> Self {
        Self {
            id,
            category,
            region: None,
            alive: true,
        }
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn with_alive(mut self, alive: bool) -> Self {
        self.alive = alive;
        self
    }
}

/// Wire representation of a site consumed by workers and the admin UI
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteSnapshot {
    pub id: SiteId,
    pub name: String,
    pub key: String,
    pub root: String,
    pub desc: String,
    pub tags: Vec<Tag>,
    #[serde(rename = "type")]
    pub content_type: ContentType,
    pub cron: String,
    pub node_option: NodeOption,
    pub node_type: NodeCategory,
    pub node_hosts: Vec<NodeId>,
    pub enable: Status,
}

/// Front-end tab entry: a site and its enabled sub-feeds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteTab {
    pub name: String,
    pub key: String,
    pub tags: Vec<TabTag>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabTag {
    pub name: String,
    pub key: String,
}
