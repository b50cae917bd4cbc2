//! Loading, querying, and rewriting the `datasets.yaml` manifest.

use std::fs;
use std::io::Write as _;
use std::path::{Component, Path, PathBuf};

use tracing::debug;

use crate::error::{Result, ResultExt as _, StemmaError};

use super::model::{DatasetKind, FieldSchema, LineageRecord, ManifestDoc, ManifestEntry};

/// Name of the manifest file at the project root.
pub const MANIFEST_FILE: &str = "datasets.yaml";

/// Conventional subdirectories probed when a registered location has gone
/// stale but the file name still matches (datasets get moved around over a
/// project's life).
const KNOWN_SUBDIRS: [&str; 3] = ["inputs", "outputs", "data"];

/// Single source of truth for the datasets registered in a project.
///
/// Every mutating call rewrites the manifest file in full, atomically.
/// Concurrent writers to the same manifest are unsupported; the store
/// assumes a single process and a single writer.
#[derive(Debug)]
pub struct ManifestStore {
    project_path: PathBuf,
    manifest_path: PathBuf,
    doc: ManifestDoc,
}

impl ManifestStore {
    /// Load the manifest from `<project_path>/datasets.yaml`.
    pub fn load(project_path: impl AsRef<Path>) -> Result<Self> {
        let project_path = fs::canonicalize(project_path.as_ref())
            .unwrap_or_else(|_| project_path.as_ref().to_path_buf());
        let manifest_path = project_path.join(MANIFEST_FILE);

        if !manifest_path.exists() {
            return Err(StemmaError::ManifestMissing(project_path));
        }

        let content = fs::read_to_string(&manifest_path)
            .with_context(|| format!("Failed to read {}", manifest_path.display()))?;

        // An empty or comments-only manifest parses to null; treat both
        // the same as missing inputs/outputs keys.
        let mut doc: ManifestDoc = if content.trim().is_empty() {
            ManifestDoc::default()
        } else {
            serde_yaml::from_str::<Option<ManifestDoc>>(&content)?.unwrap_or_default()
        };

        // The kind is implied by the list an entry sits in.
        for entry in &mut doc.inputs {
            entry.kind = DatasetKind::Input;
        }
        for entry in &mut doc.outputs {
            entry.kind = DatasetKind::Output;
        }

        Ok(Self {
            project_path,
            manifest_path,
            doc,
        })
    }

    pub fn project_path(&self) -> &Path {
        &self.project_path
    }

    pub fn manifest_path(&self) -> &Path {
        &self.manifest_path
    }

    /// All registered input datasets, in manifest order.
    pub fn inputs(&self) -> &[ManifestEntry] {
        &self.doc.inputs
    }

    /// All registered output datasets, in manifest order.
    pub fn outputs(&self) -> &[ManifestEntry] {
        &self.doc.outputs
    }

    /// Find a dataset by slug. Searches inputs then outputs when `kind`
    /// is unspecified.
    pub fn find_by_slug(&self, slug: &str, kind: Option<DatasetKind>) -> Option<ManifestEntry> {
        for k in search_kinds(kind) {
            let found = self.entries(k).iter().find(|e| e.slug == slug);
            if let Some(entry) = found {
                return Some(entry.clone());
            }
        }
        None
    }

    /// Find a dataset by its file location, tolerating path representation
    /// differences.
    ///
    /// Strategies, tried per entry in order, first match wins:
    /// 1. exact string match after normalizing the request against the
    ///    project root;
    /// 2. equal absolute, normalized paths;
    /// 3. both paths exist and are the same physical file;
    /// 4. the requested file exists, the registered one does not, the file
    ///    names match, and a same-physical-file candidate is found at the
    ///    project root or in a conventional subdirectory.
    pub fn find_by_location(
        &self,
        location: &str,
        kind: Option<DatasetKind>,
    ) -> Option<ManifestEntry> {
        let request = self.normalize_request(location);
        let request_abs = self.absolute_path(&request);
        let request_name = Path::new(&request).file_name();

        for k in search_kinds(kind) {
            for entry in self.entries(k) {
                if entry.location == request {
                    return Some(entry.clone());
                }

                let entry_abs = self.absolute_path(&entry.location);
                if entry_abs == request_abs {
                    return Some(entry.clone());
                }

                if request_abs.exists()
                    && entry_abs.exists()
                    && same_file(&request_abs, &entry_abs)
                {
                    return Some(entry.clone());
                }

                // The registered path has gone stale but the file name
                // still matches: probe the usual places for the file.
                if request_abs.exists()
                    && !entry_abs.exists()
                    && let Some(entry_name) = Path::new(&entry.location).file_name()
                    && request_name == Some(entry_name)
                {
                    let mut candidates = vec![self.project_path.join(entry_name)];
                    for subdir in KNOWN_SUBDIRS {
                        candidates.push(self.project_path.join(subdir).join(entry_name));
                    }

                    if candidates
                        .iter()
                        .any(|c| c.exists() && same_file(&request_abs, c))
                    {
                        debug!(
                            entry = %entry.slug,
                            requested = %request,
                            "resolved relocated dataset by file identity"
                        );
                        return Some(entry.clone());
                    }
                }
            }
        }

        None
    }

    /// Register a new output dataset and persist the manifest.
    pub fn add_output(
        &mut self,
        name: impl Into<String>,
        slug: impl Into<String>,
        location: impl Into<String>,
        fields: Vec<FieldSchema>,
        publish: bool,
    ) -> Result<ManifestEntry> {
        let slug = slug.into();
        if self.find_by_slug(&slug, Some(DatasetKind::Output)).is_some() {
            return Err(StemmaError::DuplicateSlug(slug));
        }

        let entry = ManifestEntry {
            name: name.into(),
            slug,
            location: location.into(),
            fields,
            source: None,
            publish,
            lineage: None,
            kind: DatasetKind::Output,
        };

        self.doc.outputs.push(entry.clone());
        self.persist()?;

        Ok(entry)
    }

    /// Update an existing output dataset. Only the supplied parts are
    /// changed; the manifest is persisted afterwards.
    pub fn update_output(
        &mut self,
        slug: &str,
        fields: Option<Vec<FieldSchema>>,
        location: Option<String>,
        lineage: Option<LineageRecord>,
    ) -> Result<ManifestEntry> {
        let entry = self
            .doc
            .outputs
            .iter_mut()
            .find(|e| e.slug == slug)
            .ok_or_else(|| StemmaError::EntryNotFound(slug.to_owned()))?;

        if let Some(fields) = fields {
            entry.fields = fields;
        }
        if let Some(location) = location {
            entry.location = location;
        }
        if let Some(lineage) = lineage {
            entry.lineage = Some(lineage);
        }

        let updated = entry.clone();
        self.persist()?;

        Ok(updated)
    }

    /// Rewrite the manifest file in full, preserving list order.
    ///
    /// The new content is written to a temporary file in the project
    /// directory and atomically renamed over the manifest, so a failed
    /// write never leaves a truncated file behind.
    pub fn persist(&self) -> Result<()> {
        let yaml = serde_yaml::to_string(&self.doc)?;

        let mut tmp = tempfile::NamedTempFile::new_in(&self.project_path)
            .context("Failed to create temporary manifest file")?;
        tmp.write_all(yaml.as_bytes())
            .context("Failed to write manifest")?;
        tmp.persist(&self.manifest_path)
            .map_err(|e| StemmaError::Io(e.error))?;

        Ok(())
    }

    /// Absolute path for a dataset location, resolving relative locations
    /// against the project root.
    pub fn absolute_path(&self, location: &str) -> PathBuf {
        let path = Path::new(location);
        if path.is_absolute() {
            lexical_normalize(path)
        } else {
            lexical_normalize(&self.project_path.join(path))
        }
    }

    fn entries(&self, kind: DatasetKind) -> &[ManifestEntry] {
        match kind {
            DatasetKind::Input => &self.doc.inputs,
            DatasetKind::Output => &self.doc.outputs,
        }
    }

    /// Normalize a requested location: absolute paths inside the project
    /// are rewritten relative to the root, and `./`-style prefixes drop
    /// out.
    fn normalize_request(&self, location: &str) -> String {
        let path = Path::new(location);
        let normalized = if path.is_absolute() {
            match path.strip_prefix(&self.project_path) {
                Ok(relative) => relative.to_path_buf(),
                Err(_) => lexical_normalize(path),
            }
        } else {
            lexical_normalize(path)
        };
        normalized.display().to_string()
    }
}

fn search_kinds(kind: Option<DatasetKind>) -> Vec<DatasetKind> {
    match kind {
        Some(k) => vec![k],
        None => vec![DatasetKind::Input, DatasetKind::Output],
    }
}

/// Purely lexical path normalization: drops `.` components and resolves
/// `..` against preceding components without touching the filesystem.
fn lexical_normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    normalized.push(Component::ParentDir);
                }
            }
            other => normalized.push(other),
        }
    }
    normalized
}

/// Whether two existing paths refer to the same physical file.
#[cfg(unix)]
fn same_file(a: &Path, b: &Path) -> bool {
    use std::os::unix::fs::MetadataExt as _;

    match (fs::metadata(a), fs::metadata(b)) {
        (Ok(ma), Ok(mb)) => ma.dev() == mb.dev() && ma.ino() == mb.ino(),
        _ => false,
    }
}

#[cfg(not(unix))]
fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(ca), Ok(cb)) => ca == cb,
        _ => false,
    }
}
