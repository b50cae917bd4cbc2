//! Lineage metadata: which datasets and operations produced a table.
//!
//! Every wrapped frame owns exactly one [`Lineage`]. Producing a new frame
//! copies the parent's sources and operations before appending, so two
//! frames never share lineage state.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::manifest::{LineageRecord, ManifestEntry};

/// Provenance carried by a wrapped frame.
#[derive(Debug, Clone, Default)]
pub struct Lineage {
    /// Contributing source datasets, insertion-ordered, deduplicated by
    /// dataset identity (slug + location).
    pub sources: Vec<ManifestEntry>,

    /// Descriptions of applied operations, append-only. Repeated identical
    /// operations are legitimate and kept.
    pub operations: Vec<String>,

    /// Fingerprint of the table content, computed at write time.
    pub content_hash: Option<String>,

    /// Set when a content-changing write occurs.
    pub created_at: Option<DateTime<Utc>>,

    /// Project directory containing `datasets.yaml`.
    pub project_path: Option<PathBuf>,
}

impl Lineage {
    pub fn new(project_path: impl AsRef<Path>) -> Self {
        Self {
            project_path: Some(project_path.as_ref().to_path_buf()),
            ..Self::default()
        }
    }

    /// Add a source dataset unless it is already present.
    pub fn add_source(&mut self, entry: ManifestEntry) {
        if !self.sources.iter().any(|s| s.same_dataset(&entry)) {
            self.sources.push(entry);
        }
    }

    /// Record an applied operation.
    pub fn add_operation(&mut self, description: impl Into<String>) {
        self.operations.push(description.into());
    }

    /// Combine with the lineage of another frame.
    ///
    /// The result holds this lineage's sources followed by any of
    /// `other`'s sources not already present, each side's internal order
    /// preserved. The operation list starts empty: the caller appends one
    /// summary operation describing the combination. Per-step history
    /// survives only through `sources`.
    pub fn merge(&self, other: &Self) -> Self {
        let mut merged = Self {
            sources: self.sources.clone(),
            operations: Vec::new(),
            content_hash: None,
            created_at: None,
            project_path: self
                .project_path
                .clone()
                .or_else(|| other.project_path.clone()),
        };

        for source in &other.sources {
            merged.add_source(source.clone());
        }

        merged
    }

    /// Distinct license identifiers across all attributed sources, sorted.
    pub fn licenses(&self) -> Vec<String> {
        let set: BTreeSet<String> = self
            .sources
            .iter()
            .filter_map(|entry| entry.source.as_ref())
            .map(|source| source.license.clone())
            .collect();
        set.into_iter().collect()
    }

    /// JSON summary of the lineage, for display and export.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "sources": self
                .sources
                .iter()
                .map(|s| serde_json::json!({
                    "slug": s.slug,
                    "name": s.name,
                    "location": s.location,
                }))
                .collect::<Vec<_>>(),
            "operations": self.operations,
            "licenses": self.licenses(),
            "created_at": self.created_at.map(|t| t.to_rfc3339()),
        })
    }

    /// Build the block persisted on an output entry after a write.
    pub fn record(&self, content_hash: String, created_at: DateTime<Utc>) -> LineageRecord {
        LineageRecord {
            content_hash,
            created_at,
            sources: self.sources.iter().map(ManifestEntry::source_ref).collect(),
            licenses: self.licenses(),
        }
    }
}
