//! Hash-linked commit history for documents

use crate::diff::diff;
use crate::errors::{DataError, Result};
use crate::semver::{Bump, SchemaVersion};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionInfo {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    pub timestamp: DateTime<Utc>,
    /// SHA-256 over the data and the version fields, hex encoded
    pub hash: String,
}

impl VersionInfo {
    pub fn semver(&self) -> SchemaVersion {
        SchemaVersion::new(self.major, self.minor, self.patch)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionedData {
    pub version: VersionInfo,
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
}

/// Append-only commit store with a movable head.
///
/// Each commit's parent is whatever was head when it was made, so the
/// history seen from any head is a single chain back to the root.
#[derive(Debug, Default)]
pub struct VersionControl {
    nodes: HashMap<String, VersionedData>,
    head: Option<String>,
    base: SchemaVersion,
}

impl VersionControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start numbering from `base` instead of `0.0.0`
    pub fn with_base(base: SchemaVersion) -> Self {
        Self {
            base,
            ..Self::default()
        }
    }

    pub fn commit(&mut self, data: Value, bump: Bump) -> Result<&VersionedData> {
        let current = self
            .head()
            .map(|node| node.version.semver())
            .unwrap_or(self.base);
        let next = current.bump(bump)?;
        let timestamp = Utc::now();

        let content = serde_json::to_vec(&json!({
            "data": &data,
            "version": {
                "major": next.major,
                "minor": next.minor,
                "patch": next.patch,
                "timestamp": timestamp,
            },
        }))?;
        let hash = hex::encode(Sha256::digest(&content));

        let node = VersionedData {
            version: VersionInfo {
                major: next.major,
                minor: next.minor,
                patch: next.patch,
                timestamp,
                hash: hash.clone(),
            },
            data,
            parent: self.head.take(),
        };

        info!(version = %next, hash = %hash, "Committed version");
        self.head = Some(hash.clone());
        Ok(self.nodes.entry(hash).or_insert(node))
    }

    /// Move head to `hash` and return its data
    pub fn checkout(&mut self, hash: &str) -> Result<&Value> {
        let node = self
            .nodes
            .get(hash)
            .ok_or_else(|| DataError::VersionNotFound(hash.to_string()))?;

        info!(version = %node.version.semver(), hash = %hash, "Checked out version");
        self.head = Some(hash.to_string());
        Ok(&node.data)
    }

    /// Walk from head back to the root commit
    pub fn get_history(&self) -> impl Iterator<Item = &VersionedData> + '_ {
        std::iter::successors(self.head(), move |node| {
            node.parent.as_deref().and_then(|parent| self.nodes.get(parent))
        })
    }

    pub fn head(&self) -> Option<&VersionedData> {
        self.head.as_deref().and_then(|hash| self.nodes.get(hash))
    }

    pub fn get(&self, hash: &str) -> Option<&VersionedData> {
        self.nodes.get(hash)
    }

    /// Sparse patch between two commits
    pub fn diff(&self, from: &str, to: &str) -> Result<Value> {
        let lookup = |hash: &str| {
            self.get(hash)
                .ok_or_else(|| DataError::VersionNotFound(hash.to_string()))
        };
        Ok(diff(&lookup(from)?.data, &lookup(to)?.data))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_commit_bumps_from_head() {
        let mut vc = VersionControl::new();
        vc.commit(json!({ "v": 1 }), Bump::Major).unwrap();
        vc.commit(json!({ "v": 2 }), Bump::Patch).unwrap();
        let minor = vc.commit(json!({ "v": 3 }), Bump::Minor).unwrap();

        assert_eq!(minor.version.semver(), SchemaVersion::new(1, 1, 0));
        assert_eq!(vc.len(), 3);
    }

    #[test]
    fn test_overflowing_bump_commits_nothing() {
        let mut vc = VersionControl::with_base(SchemaVersion::new(0, 0, u32::MAX));
        assert!(matches!(
            vc.commit(json!(1), Bump::Patch),
            Err(DataError::InvalidVersion(_))
        ));
        assert!(vc.is_empty());
        assert!(vc.head().is_none());
    }

    #[test]
    fn test_checkout_round_trips_data() {
        let mut vc = VersionControl::new();
        let data = json!({ "doc": { "title": "Draft", "tags": ["a", "b"] } });
        let hash = vc.commit(data.clone(), Bump::Minor).unwrap().version.hash.clone();
        vc.commit(json!({ "doc": null }), Bump::Patch).unwrap();

        assert_eq!(vc.checkout(&hash).unwrap(), &data);
        assert_eq!(vc.head().map(|n| n.version.hash.as_str()), Some(hash.as_str()));
    }

    #[test]
    fn test_checkout_unknown_hash() {
        let mut vc = VersionControl::new();
        assert!(matches!(
            vc.checkout("deadbeef"),
            Err(DataError::VersionNotFound(h)) if h == "deadbeef"
        ));
    }

    #[test]
    fn test_history_walks_parents_from_head() {
        let mut vc = VersionControl::with_base(SchemaVersion::new(1, 0, 0));
        for n in 0..3 {
            vc.commit(json!(n), Bump::Patch).unwrap();
        }

        let versions: Vec<String> = vc
            .get_history()
            .map(|node| node.version.semver().to_string())
            .collect();
        assert_eq!(versions, vec!["1.0.3", "1.0.2", "1.0.1"]);
        assert!(vc.get_history().last().unwrap().parent.is_none());
    }

    #[test]
    fn test_commit_after_checkout_branches_from_new_head() {
        let mut vc = VersionControl::new();
        let first = vc.commit(json!("a"), Bump::Patch).unwrap().version.hash.clone();
        vc.commit(json!("b"), Bump::Patch).unwrap();

        vc.checkout(&first).unwrap();
        let c = vc.commit(json!("c"), Bump::Patch).unwrap();
        assert_eq!(c.parent.as_deref(), Some(first.as_str()));
        assert_eq!(vc.get_history().count(), 2);
    }

    #[test]
    fn test_diff_between_commits() {
        let mut vc = VersionControl::new();
        let a = vc.commit(json!({ "n": 1 }), Bump::Patch).unwrap().version.hash.clone();
        let b = vc.commit(json!({ "n": 2 }), Bump::Patch).unwrap().version.hash.clone();

        assert_eq!(vc.diff(&a, &b).unwrap(), json!({ "n": { "from": 1, "to": 2 } }));
        assert!(vc.diff(&a, "nope").is_err());
    }
}
