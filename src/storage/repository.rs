//! Repository Pattern for Site Storage
//!
//! The registry talks to storage only through [`SiteRepository`], so the
//! same registry logic runs against SQLite in production and an in-memory
//! store in tests.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │            SiteRegistry / Reconciler / Exporter             │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 SiteRepository (trait)                      │
//! └─────────────────────────────────────────────────────────────┘
//!                   │                         │
//!                   ▼                         ▼
//!          ┌─────────────────┐       ┌─────────────────┐
//!          │     SQLite      │       │      Mock       │
//!          └─────────────────┘       └─────────────────┘
//! ```
//!
//! Every method is a single statement against the store, so each create or
//! update is atomic for its record. Uniqueness of `key` and `root` is
//! enforced by the store itself and reported as
//! [`Error::DuplicateKeyOrRoot`]; it is the final arbiter when two creates
//! race past the registry's duplicate check.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, OptionalExtension, Row, ToSql};

use crate::error::{is_unique_violation, Error, Result};
use crate::models::{
    ContentType, NewSite, NodeCategory, NodeOption, Site, SiteFilter, SiteId, SitePatch, Status,
};
use crate::scheduler::assignment::serialize_host_list;
use crate::site::tags;

// ============================================================================
// Repository Trait
// ============================================================================

/// Keyed storage for site records
pub trait SiteRepository: Send + Sync {
    /// Insert a new site and return its id
    fn insert(&self, site: &NewSite) -> Result<SiteId>;

    /// Apply a partial update; fields absent from the patch are untouched
    fn update(&self, id: SiteId, patch: &SitePatch) -> Result<()>;

    /// Get a site by id
    fn get(&self, id: SiteId) -> Result<Option<Site>>;

    /// All sites matching a predicate, ordered by id
    ///
    /// Records that cannot be decoded at all are skipped with a warning.
    fn find(&self, filter: &SiteFilter) -> Result<Vec<Site>>;
}

// ============================================================================
// Column Codecs
// ============================================================================

fn code_column<T: TryFrom<u8>>(value: ValueRef<'_>) -> FromSqlResult<T> {
    let raw = i64::column_result(value)?;
    u8::try_from(raw)
        .ok()
        .and_then(|code| T::try_from(code).ok())
        .ok_or(FromSqlError::OutOfRange(raw))
}

impl FromSql for Status {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        code_column(value)
    }
}

impl ToSql for Status {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(i64::from(u8::from(*self))))
    }
}

impl FromSql for ContentType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        code_column(value)
    }
}

impl ToSql for ContentType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(i64::from(u8::from(*self))))
    }
}

impl FromSql for NodeOption {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        code_column(value)
    }
}

impl ToSql for NodeOption {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(i64::from(u8::from(*self))))
    }
}

impl FromSql for NodeCategory {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let raw = i64::column_result(value)?;
        i8::try_from(raw)
            .map(NodeCategory)
            .map_err(|_| FromSqlError::OutOfRange(raw))
    }
}

impl ToSql for NodeCategory {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(i64::from(self.0)))
    }
}

// ============================================================================
// SQLite Implementation
// ============================================================================

const SITE_COLUMNS: &str = r#"id, name, "key", root, "desc", type, tags, cron, enable, node_option, node_type, node_hosts"#;

fn site_from_row(row: &Row<'_>) -> rusqlite::Result<Site> {
    Ok(Site {
        id: row.get(0)?,
        name: row.get(1)?,
        key: row.get(2)?,
        root: row.get(3)?,
        desc: row.get(4)?,
        content_type: row.get(5)?,
        tags: row.get(6)?,
        cron: row.get(7)?,
        enable: row.get(8)?,
        node_option: row.get(9)?,
        node_type: row.get(10)?,
        node_hosts: row.get(11)?,
    })
}

// A row with an unknown enable/type/node_option code is left out of scans
// so one bad record does not block every multi-site pass; `get` still
// reports it.
fn scanned_site(row: &Row<'_>) -> rusqlite::Result<Option<Site>> {
    match site_from_row(row) {
        Ok(site) => Ok(Some(site)),
        Err(rusqlite::Error::IntegralValueOutOfRange(column, code)) => {
            let id: SiteId = row.get(0)?;
            tracing::warn!(site_id = id, column, code, "Skipping site with unknown code");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// SQLite implementation of SiteRepository
///
/// Opened once at process start with [`SqliteSiteRepository::open`] and
/// released with [`SqliteSiteRepository::close`]. A `Mutex` serializes
/// access to the single connection.
pub struct SqliteSiteRepository {
    conn: Mutex<Connection>,
}

impl SqliteSiteRepository {
    /// Open (or create) the database file
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path).map_err(|e| Error::persistence("open", e))?;

        // Enable WAL mode for better concurrency
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|e| Error::persistence("open", e))?;

        let repo = Self {
            conn: Mutex::new(conn),
        };
        repo.create_schema()?;

        tracing::info!(path = %path.display(), "Site store opened");
        Ok(repo)
    }

    /// Create in-memory repository (for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| Error::persistence("open", e))?;
        let repo = Self {
            conn: Mutex::new(conn),
        };
        repo.create_schema()?;
        Ok(repo)
    }

    /// Close the underlying connection
    pub fn close(self) -> Result<()> {
        let conn = self
            .conn
            .into_inner()
            .map_err(|_| Error::persistence("close", lock_poisoned()))?;
        conn.close().map_err(|(_, e)| Error::persistence("close", e))?;
        tracing::info!("Site store closed");
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::persistence("lock", lock_poisoned()))
    }

    fn create_schema(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute_batch(
            r#"
                CREATE TABLE IF NOT EXISTS site (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    "key" TEXT NOT NULL UNIQUE,
                    root TEXT NOT NULL UNIQUE,
                    "desc" TEXT NOT NULL DEFAULT '',
                    type INTEGER NOT NULL DEFAULT 1,
                    tags TEXT NOT NULL DEFAULT '',
                    cron TEXT NOT NULL,
                    enable INTEGER NOT NULL DEFAULT 0,
                    node_option INTEGER NOT NULL DEFAULT 1,
                    node_type INTEGER NOT NULL DEFAULT 1,
                    node_hosts TEXT NOT NULL DEFAULT ''
                );

                CREATE INDEX IF NOT EXISTS idx_site_enable
                    ON site(enable);
                "#,
        )
        .map_err(|e| Error::persistence("create schema", e))?;

        Ok(())
    }

    fn exists(conn: &Connection, id: SiteId) -> Result<bool> {
        conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM site WHERE id = ?1)",
            params![id],
            |row| row.get(0),
        )
        .map_err(|e| Error::persistence("get", e))
    }
}

fn lock_poisoned() -> std::io::Error {
    std::io::Error::other("site store lock poisoned")
}

impl SiteRepository for SqliteSiteRepository {
    fn insert(&self, site: &NewSite) -> Result<SiteId> {
        let tags = tags::serialize(&site.tags)?;
        let hosts = serialize_host_list(&site.node_hosts);

        let conn = self.conn()?;
        conn.execute(
            r#"
                INSERT INTO site (name, "key", root, "desc", type, tags, cron, enable, node_option, node_type, node_hosts)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                "#,
            params![
                site.name,
                site.key,
                site.root,
                site.desc,
                site.content_type,
                tags,
                site.cron,
                site.enable,
                site.node_option,
                site.node_type,
                hosts,
            ],
        )
        .map_err(|e| {
            if is_unique_violation(&e) {
                Error::DuplicateKeyOrRoot {
                    key: site.key.clone(),
                    root: site.root.clone(),
                }
            } else {
                Error::persistence("insert", e)
            }
        })?;

        Ok(conn.last_insert_rowid())
    }

    fn update(&self, id: SiteId, patch: &SitePatch) -> Result<()> {
        let mut columns: Vec<(&'static str, Box<dyn ToSql>)> = Vec::new();

        if let Some(name) = &patch.name {
            columns.push(("name", Box::new(name.clone())));
        }
        if let Some(root) = &patch.root {
            columns.push(("root", Box::new(root.clone())));
        }
        if let Some(desc) = &patch.desc {
            columns.push((r#""desc""#, Box::new(desc.clone())));
        }
        if let Some(content_type) = patch.content_type {
            columns.push(("type", Box::new(content_type)));
        }
        if let Some(tag_list) = &patch.tags {
            columns.push(("tags", Box::new(tags::serialize(tag_list)?)));
        }
        if let Some(cron) = &patch.cron {
            columns.push(("cron", Box::new(cron.clone())));
        }
        if let Some(enable) = patch.enable {
            columns.push(("enable", Box::new(enable)));
        }
        if let Some(node_option) = patch.node_option {
            columns.push(("node_option", Box::new(node_option)));
        }
        if let Some(node_type) = patch.node_type {
            columns.push(("node_type", Box::new(node_type)));
        }
        if let Some(hosts) = &patch.node_hosts {
            columns.push(("node_hosts", Box::new(serialize_host_list(hosts))));
        }

        let conn = self.conn()?;

        if columns.is_empty() {
            return if Self::exists(&conn, id)? {
                Ok(())
            } else {
                Err(Error::NotFound { id })
            };
        }

        let assignments: Vec<String> = columns
            .iter()
            .enumerate()
            .map(|(i, (column, _))| format!("{column} = ?{}", i + 1))
            .collect();
        let sql = format!(
            "UPDATE site SET {} WHERE id = ?{}",
            assignments.join(", "),
            columns.len() + 1
        );

        let mut values: Vec<&dyn ToSql> = columns.iter().map(|(_, v)| v.as_ref()).collect();
        values.push(&id);

        let changed = conn.execute(&sql, values.as_slice()).map_err(|e| {
            if is_unique_violation(&e) {
                let key = conn
                    .query_row(r#"SELECT "key" FROM site WHERE id = ?1"#, params![id], |row| {
                        row.get(0)
                    })
                    .unwrap_or_default();
                Error::DuplicateKeyOrRoot {
                    key,
                    root: patch.root.clone().unwrap_or_default(),
                }
            } else {
                Error::persistence("update", e)
            }
        })?;

        if changed == 0 {
            return Err(Error::NotFound { id });
        }

        Ok(())
    }

    fn get(&self, id: SiteId) -> Result<Option<Site>> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {SITE_COLUMNS} FROM site WHERE id = ?1"),
            params![id],
            site_from_row,
        )
        .optional()
        .map_err(|e| Error::persistence("get", e))
    }

    fn find(&self, filter: &SiteFilter) -> Result<Vec<Site>> {
        let (clause, values): (&str, Vec<Box<dyn ToSql>>) = match filter {
            SiteFilter::All => ("", Vec::new()),
            SiteFilter::Key(key) => (
                r#"WHERE "key" = ?1"#,
                vec![Box::new(key.clone()) as Box<dyn ToSql>],
            ),
            SiteFilter::KeyOrRoot { key, root } => (
                r#"WHERE "key" = ?1 OR root = ?2"#,
                vec![
                    Box::new(key.clone()) as Box<dyn ToSql>,
                    Box::new(root.clone()),
                ],
            ),
            SiteFilter::Enabled => ("WHERE enable = 1", Vec::new()),
            SiteFilter::Mode(option) => (
                "WHERE node_option = ?1",
                vec![Box::new(*option) as Box<dyn ToSql>],
            ),
        };

        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!("SELECT {SITE_COLUMNS} FROM site {clause} ORDER BY id"))
            .map_err(|e| Error::persistence("find", e))?;

        let params: Vec<&dyn ToSql> = values.iter().map(|v| v.as_ref()).collect();
        let rows = stmt
            .query_map(params.as_slice(), scanned_site)
            .and_then(|rows| rows.collect::<rusqlite::Result<Vec<_>>>())
            .map_err(|e| Error::persistence("find", e))?;

        Ok(rows.into_iter().flatten().collect())
    }
}

// ============================================================================
// Mock Implementation (for testing)
// ============================================================================

/// In-memory mock implementation of SiteRepository
///
/// Enforces the same key/root uniqueness as the SQLite schema and can be
/// told to start failing updates to exercise partial-failure paths.
pub struct MockSiteRepository {
    sites: RwLock<BTreeMap<SiteId, Site>>,
    next_id: AtomicI64,
    updates: AtomicUsize,
    fail_updates_after: Mutex<Option<usize>>,
}

impl MockSiteRepository {
    /// Create a new mock repository
    pub fn new() -> Self {
        Self {
            sites: RwLock::new(BTreeMap::new()),
            next_id: AtomicI64::new(1),
            updates: AtomicUsize::new(0),
            fail_updates_after: Mutex::new(None),
        }
    }

    /// Get the number of records
    pub fn len(&self) -> usize {
        self.sites.read().map(|s| s.len()).unwrap_or(0)
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clear all records
    pub fn clear(&self) {
        if let Ok(mut sites) = self.sites.write() {
            sites.clear();
        }
    }

    /// Store a record verbatim, bypassing encoding (to plant corrupt data)
    pub fn insert_raw(&self, site: Site) {
        self.next_id.fetch_max(site.id + 1, Ordering::SeqCst);
        if let Ok(mut sites) = self.sites.write() {
            sites.insert(site.id, site);
        }
    }

    /// Let `n` more updates succeed, then fail every later one
    pub fn fail_updates_after(&self, n: usize) {
        self.updates.store(0, Ordering::SeqCst);
        if let Ok(mut limit) = self.fail_updates_after.lock() {
            *limit = Some(n);
        }
    }

    /// Number of successful updates applied
    pub fn update_count(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, BTreeMap<SiteId, Site>>> {
        self.sites
            .read()
            .map_err(|_| Error::persistence("lock", lock_poisoned()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, BTreeMap<SiteId, Site>>> {
        self.sites
            .write()
            .map_err(|_| Error::persistence("lock", lock_poisoned()))
    }
}

impl Default for MockSiteRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl SiteRepository for MockSiteRepository {
    fn insert(&self, site: &NewSite) -> Result<SiteId> {
        let tags = tags::serialize(&site.tags)?;
        let mut sites = self.write()?;

        if sites
            .values()
            .any(|s| s.key == site.key || s.root == site.root)
        {
            return Err(Error::DuplicateKeyOrRoot {
                key: site.key.clone(),
                root: site.root.clone(),
            });
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        sites.insert(
            id,
            Site {
                id,
                name: site.name.clone(),
                key: site.key.clone(),
                root: site.root.clone(),
                desc: site.desc.clone(),
                content_type: site.content_type,
                tags,
                cron: site.cron.clone(),
                enable: site.enable,
                node_option: site.node_option,
                node_type: site.node_type,
                node_hosts: serialize_host_list(&site.node_hosts),
            },
        );

        Ok(id)
    }

    fn update(&self, id: SiteId, patch: &SitePatch) -> Result<()> {
        let limit = *self
            .fail_updates_after
            .lock()
            .map_err(|_| Error::persistence("lock", lock_poisoned()))?;
        if let Some(limit) = limit {
            if self.updates.load(Ordering::SeqCst) >= limit {
                return Err(Error::persistence(
                    "update",
                    std::io::Error::other("injected update failure"),
                ));
            }
        }

        let tags = patch.tags.as_deref().map(tags::serialize).transpose()?;
        let mut sites = self.write()?;

        if let Some(root) = &patch.root {
            if let Some(other) = sites.values().find(|s| s.id != id && s.root == *root) {
                return Err(Error::DuplicateKeyOrRoot {
                    key: other.key.clone(),
                    root: root.clone(),
                });
            }
        }

        let site = sites.get_mut(&id).ok_or(Error::NotFound { id })?;

        if let Some(name) = &patch.name {
            site.name = name.clone();
        }
        if let Some(root) = &patch.root {
            site.root = root.clone();
        }
        if let Some(desc) = &patch.desc {
            site.desc = desc.clone();
        }
        if let Some(content_type) = patch.content_type {
            site.content_type = content_type;
        }
        if let Some(tags) = tags {
            site.tags = tags;
        }
        if let Some(cron) = &patch.cron {
            site.cron = cron.clone();
        }
        if let Some(enable) = patch.enable {
            site.enable = enable;
        }
        if let Some(node_option) = patch.node_option {
            site.node_option = node_option;
        }
        if let Some(node_type) = patch.node_type {
            site.node_type = node_type;
        }
        if let Some(hosts) = &patch.node_hosts {
            site.node_hosts = serialize_host_list(hosts);
        }

        self.updates.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn get(&self, id: SiteId) -> Result<Option<Site>> {
        Ok(self.read()?.get(&id).cloned())
    }

    fn find(&self, filter: &SiteFilter) -> Result<Vec<Site>> {
        Ok(self
            .read()?
            .values()
            .filter(|s| filter.matches(s))
            .cloned()
            .collect())
    }
}

// ============================================================================
// Shared Repository Types
// ============================================================================

/// Thread-safe shared repository handle
pub type SharedSiteRepository = Arc<dyn SiteRepository>;

/// Create a shared SQLite repository
pub fn create_sqlite_repository(path: impl AsRef<Path>) -> Result<SharedSiteRepository> {
    let repo = SqliteSiteRepository::open(path)?;
    Ok(Arc::new(repo))
}

/// Create a shared mock repository
pub fn create_mock_repository() -> SharedSiteRepository {
    Arc::new(MockSiteRepository::new())
}

// ============================================================================
// Tests
// ============================================================================
