//! Tag list normalization and encoding
//!
//! A site's tags are stored as one JSON string. The list keeps input order
//! and keys are unique within a site.

use std::collections::HashSet;

use crate::error::{Error, Result};
use crate::models::Tag;

/// Clean up a raw tag list
///
/// Keys and names are trimmed, tags with an empty key are dropped, and for a
/// repeated key the first occurrence wins. Order is otherwise preserved.
pub fn normalize(raw: impl IntoIterator<Item = Tag>) -> Vec<Tag> {
    let mut seen = HashSet::new();
    let mut tags = Vec::new();

    for tag in raw {
        let key = tag.key.trim();
        if key.is_empty() {
            tracing::debug!(name = %tag.name, "Dropping tag with empty key");
            continue;
        }
        if !seen.insert(key.to_string()) {
            tracing::debug!(key, "Dropping duplicate tag key");
            continue;
        }

        tags.push(Tag {
            key: key.to_string(),
            name: tag.name.trim().to_string(),
            enable: tag.enable,
        });
    }

    tags
}

/// Decode a stored tag list; an empty string is the empty list
pub fn parse(serialized: &str) -> Result<Vec<Tag>> {
    if serialized.is_empty() {
        return Ok(Vec::new());
    }

    serde_json::from_str(serialized).map_err(|e| Error::TagParse {
        reason: e.to_string(),
    })
}

/// Encode a tag list for storage
pub fn serialize(tags: &[Tag]) -> Result<String> {
    serde_json::to_string(tags).map_err(|e| Error::TagParse {
        reason: e.to_string(),
    })
}
