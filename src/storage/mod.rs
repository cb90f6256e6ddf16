//! Site persistence
//!
//! The store is an explicit handle: [`open`] it at process start, pass it
//! to the registry, and close it at shutdown. There is no global connection.

pub mod repository;

use crate::config::DatabaseConfig;
use crate::error::Result;

pub use repository::{
    create_mock_repository, create_sqlite_repository, MockSiteRepository, SharedSiteRepository,
    SiteRepository, SqliteSiteRepository,
};

/// Open the configured SQLite site store
pub fn open(config: &DatabaseConfig) -> Result<SqliteSiteRepository> {
    SqliteSiteRepository::open(&config.sqlite_path)
}
