//! Unified error handling for the sitegrid crate
//!
//! Every operation in the registry, resolver, reconciler and exporter reports
//! failures through the single [`Error`] enum below. Callers that need to
//! decide on a handling strategy use [`ErrorCategory`] and
//! [`SiteGridErrorTrait::is_recoverable`].
//!
//! # Usage
//!
//! ```rust,ignore
//! use sitegrid::error::{Error, SiteGridErrorTrait};
//!
//! fn handle_error(err: Error) {
//!     if err.is_recoverable() {
//!         println!("Retrying: {err}");
//!     } else {
//!         eprintln!("Fatal error: {err}");
//!     }
//! }
//! ```

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::models::SiteId;

/// Common trait for sitegrid error types
pub trait SiteGridErrorTrait: std::error::Error {
    /// Check if this error is recoverable (the caller may retry)
    fn is_recoverable(&self) -> bool;

    /// Get the error category for handling strategies
    fn category(&self) -> ErrorCategory;
}

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Rejected input (bad name, malformed cron, unknown node)
    Validation,
    /// Uniqueness conflict on key or root
    Conflict,
    /// Record does not exist
    NotFound,
    /// Stored data failed to decode
    Corruption,
    /// Store or I/O failure
    Storage,
    /// Configuration or catalog errors
    Config,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    /// Short label attached to error log lines
    pub fn label(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Conflict => "conflict",
            Self::NotFound => "not-found",
            Self::Corruption => "corruption",
            Self::Storage => "storage",
            Self::Config => "config",
            Self::Other => "other",
        }
    }
}

/// Unified error type for the sitegrid crate
#[derive(Error, Debug)]
pub enum Error {
    /// A field failed write-side validation
    #[error("invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    /// Another site already uses this key or root
    #[error("a site with key '{key}' or root '{root}' already exists")]
    DuplicateKeyOrRoot { key: String, root: String },

    /// No site with this id
    #[error("site {id} not found")]
    NotFound { id: SiteId },

    /// A non-empty stored tag list failed to parse
    #[error("tag list parse failed: {reason}")]
    TagParse { reason: String },

    /// A non-empty stored node host list failed to parse
    #[error("node host list corrupt: {reason}")]
    HostListCorrupt { reason: String },

    /// The store rejected or failed an operation
    #[error("persistence failed during {operation}: {source}")]
    Persistence {
        operation: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A site record could not be rendered as a snapshot
    #[error("export of site {site_id} failed: {source}")]
    Export {
        site_id: SiteId,
        #[source]
        source: Box<Error>,
    },

    /// The site-definition catalog could not be loaded
    #[error("catalog {path} invalid: {reason}")]
    Catalog { path: PathBuf, reason: String },

    /// The node catalog provider failed
    #[error("node catalog unavailable: {0}")]
    NodeCatalog(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl SiteGridErrorTrait for Error {
    fn is_recoverable(&self) -> bool {
        match self {
            Self::Persistence { .. } | Self::NodeCatalog(_) | Self::Io(_) => true,
            Self::Export { source, .. } => source.is_recoverable(),
            _ => false,
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Validation { .. } => ErrorCategory::Validation,
            Self::DuplicateKeyOrRoot { .. } => ErrorCategory::Conflict,
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::TagParse { .. } | Self::HostListCorrupt { .. } | Self::Export { .. } => {
                ErrorCategory::Corruption
            }
            Self::Persistence { .. } | Self::Io(_) => ErrorCategory::Storage,
            Self::Catalog { .. } => ErrorCategory::Config,
            Self::NodeCatalog(_) => ErrorCategory::Other,
        }
    }
}

impl Error {
    /// Create a validation error for a field
    pub fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field,
            reason: reason.into(),
        }
    }

    /// Create a persistence error wrapping a store failure
    pub fn persistence(
        operation: &'static str,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Persistence {
            operation,
            source: Box::new(source),
        }
    }

    /// Wrap a decode failure for a site as an export error
    pub fn export(site_id: SiteId, source: Error) -> Self {
        Self::Export {
            site_id,
            source: Box::new(source),
        }
    }
}

// SQLite constraint violations are the store's uniqueness backstop; the key
// and root are filled in by the repository, which knows what it was writing.
pub(crate) fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;
