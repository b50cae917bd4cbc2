//! Data structures for `datasets.yaml` manifest entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which manifest list an entry belongs to.
///
/// Input and output slugs are separate namespaces; an input and an output
/// may legitimately share a slug.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DatasetKind {
    #[default]
    Input,
    Output,
}

impl DatasetKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Output => "output",
        }
    }
}

/// Field data type recorded in the manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Integer,
    Number,
    Boolean,
    Datetime,
}

impl FieldType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Datetime => "datetime",
        }
    }
}

/// Schema definition for one dataset field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSchema {
    pub name: String,

    #[serde(rename = "type")]
    pub kind: FieldType,

    /// Opaque constraints (e.g. enum values), carried through verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraints: Option<serde_yaml::Value>,
}

impl FieldSchema {
    pub fn new(name: impl Into<String>, kind: FieldType) -> Self {
        Self {
            name: name.into(),
            kind,
            constraints: None,
        }
    }
}

/// URLs describing where a source dataset lives.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SourceLocation {
    /// URL to the data file itself.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,

    /// URL to metadata about the data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<String>,

    /// URL to a page describing the data source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub about: Option<String>,
}

/// Source attribution for an input dataset. Immutable once parsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub name: String,

    pub location: SourceLocation,

    /// Organization or individual to attribute the data to.
    #[serde(rename = "attributedTo")]
    pub attributed_to: String,

    /// Date the data was acquired (YYYY-MM-DD).
    #[serde(rename = "acquiredAt")]
    pub acquired_at: String,

    /// How the data was acquired (e.g. "manual-download", "api").
    #[serde(rename = "acquisitionMethod")]
    pub acquisition_method: String,

    /// SPDX license identifier.
    pub license: String,

    /// Optional description of update frequency.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<String>,
}

/// Compact reference to a contributing source, persisted in an output's
/// lineage block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    pub slug: String,
    pub name: String,
    pub location: String,
}

/// Provenance block persisted on an output entry after a successful write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineageRecord {
    /// SHA-256 fingerprint of the written table content.
    pub content_hash: String,

    /// Last time the content actually changed. Rewriting identical
    /// content does not bump this.
    pub created_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<SourceRef>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub licenses: Vec<String>,
}

/// One registered dataset from `datasets.yaml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub name: String,

    /// Kebab-case identifier, unique within the entry's kind.
    pub slug: String,

    /// File path (relative to the project root, or absolute) or URL.
    pub location: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldSchema>,

    /// Attribution, meaningful for inputs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Source>,

    /// Whether this output should be published.
    #[serde(default, skip_serializing_if = "is_false")]
    pub publish: bool,

    /// Written only after at least one successful write of this output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lineage: Option<LineageRecord>,

    /// Derived from the list the entry was parsed out of; not serialized.
    #[serde(skip)]
    pub kind: DatasetKind,
}

impl ManifestEntry {
    /// Whether two entries refer to the same dataset.
    ///
    /// Identity is (slug, location), not full structural equality, so a
    /// re-parsed entry still deduplicates against one held in memory.
    pub fn same_dataset(&self, other: &Self) -> bool {
        self.slug == other.slug && self.location == other.location
    }

    /// Compact reference for persistence in a lineage block.
    pub fn source_ref(&self) -> SourceRef {
        SourceRef {
            slug: self.slug.clone(),
            name: self.name.clone(),
            location: self.location.clone(),
        }
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Full manifest document: ordered input and output lists.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct ManifestDoc {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<ManifestEntry>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<ManifestEntry>,
}
