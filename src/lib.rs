//! # Stemma - Dataset Registry & Lineage Tracking
//!
//! Stemma is a Rust library that wraps a tabular engine (Polars) with
//! provenance tracking. Every read and write of a named dataset is checked
//! against the project's `datasets.yaml` registry, and every frame carries
//! lineage metadata: which registered datasets contributed to it and which
//! operations were applied along the way.
//!
//! ## Quick Start
//!
//! ```no_run
//! use stemma::{Frame, FrameConfig, WriteOptions};
//!
//! # fn example() -> stemma::error::Result<()> {
//! // Read a registered dataset (must be in datasets.yaml)
//! let config = FrameConfig::new("/path/to/project");
//! let members = Frame::read_csv("inputs/members.csv", config)?;
//!
//! // Operations are tracked in lineage
//! let top = members.head(50);
//!
//! // Write an output (auto-registers in relaxed mode)
//! let mut top = top;
//! top.to_csv(
//!     "outputs/top_members.csv",
//!     &WriteOptions::named("top-members", "Top Members"),
//! )?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Core Modules
//!
//! - [`manifest`]: the `datasets.yaml` registry: parsing, lookup with
//!   path-drift tolerance, and output registration
//! - [`frame`]: the lineage-tracked frame wrapper and its enumerated
//!   operation surface
//! - [`lineage`]: provenance metadata and merge semantics
//! - [`net`]: SSRF-guarded fetching of remote datasets
//! - [`fingerprint`]: content hashes for change detection
//! - [`policy`]: strict/relaxed registration policy
//! - [`error`]: error types and handling utilities
//!
//! ## Key Concepts
//!
//! ### Strict vs. relaxed mode
//!
//! In strict mode every read and write location must be pre-registered in
//! `datasets.yaml`. In relaxed mode, writing to an unregistered location
//! registers a new output entry automatically (a `slug` and `name` must be
//! supplied). The mode is fixed per frame at construction time, from an
//! explicit flag or the `STEMMA_STRICT` environment variable.
//!
//! ### Lineage
//!
//! A frame's lineage lists its contributing source datasets (deduplicated,
//! insertion-ordered) and the operations applied. Combining frames via
//! merge or concat unions the source sets and records a single summary
//! operation. Lineage is never shared between frames; producing a new
//! frame always deep-copies it.
//!
//! ### Remote fetching
//!
//! Datasets with a declared source URL can be downloaded through a gate
//! that blocks non-HTTP schemes and private, loopback, and link-local
//! addresses. Redirects are followed manually so every hop is re-checked.

#![warn(clippy::all, rust_2018_idioms)]

pub mod error;
pub mod fingerprint;
pub mod frame;
pub mod lineage;
pub mod logging;
pub mod manifest;
pub mod net;
pub mod policy;

pub use error::{Result, StemmaError};
pub use frame::{DataFormat, Frame, JoinKind, WriteOptions};
pub use lineage::Lineage;
pub use manifest::{
    DatasetKind, FieldSchema, FieldType, LineageRecord, ManifestEntry, ManifestStore, Source,
    SourceLocation,
};
pub use net::{FetchOptions, fetch_dataset, is_public_url};
pub use policy::{FrameConfig, Mode};
