//! Dataset manifest: the project-level registry of known datasets.
//!
//! Every stemma project carries a `datasets.yaml` at its root listing the
//! datasets the project is allowed to read (`inputs`) and produce
//! (`outputs`). This module owns parsing and rewriting that file, slug and
//! location lookup, and output registration.
//!
//! Location lookup tolerates the path drift that happens over a project's
//! life (files moved between subdirectories, `./`-prefixed paths, absolute
//! vs. relative spellings) by falling back from string equality to
//! filesystem identity. See [`ManifestStore::find_by_location`].

pub mod model;
pub mod store;

pub use model::{
    DatasetKind, FieldSchema, FieldType, LineageRecord, ManifestEntry, Source, SourceLocation,
    SourceRef,
};
pub use store::{MANIFEST_FILE, ManifestStore};
