//! Lineage-tracked wrapper around the tabular engine.
//!
//! A [`Frame`] pairs a polars `DataFrame` with the [`Lineage`] describing
//! where its content came from, and routes every read and write through
//! the project manifest. The forwarded operation surface is a closed,
//! enumerated set, and each operation has an explicit lineage policy:
//!
//! - **Tracked** operations (`head`, `tail`, `sort`, `select`, `drop`,
//!   `filter`, `group_by_agg`, `apply`) return a new frame with a deep
//!   copy of the parent lineage plus one appended operation.
//! - **Combining** operations (`merge`, `concat`) merge the lineages of
//!   all participants (deduplicating sources) and append a single summary
//!   operation.
//! - **In-place** column assignment (`set_column`) mutates this frame's
//!   own lineage by appending an operation.
//! - **Untracked structural** operations (`rename`, `cast`, `Clone`) copy
//!   the lineage verbatim without recording anything.

pub mod io;

use polars::prelude::*;
use tracing::info;

use crate::error::{Result, StemmaError};
use crate::fingerprint;
use crate::lineage::Lineage;
use crate::manifest::{DatasetKind, FieldSchema, FieldType, ManifestEntry, ManifestStore};
use crate::policy::{self, FrameConfig, Mode};

pub use io::DataFormat;

/// How two frames are matched up in [`Frame::merge`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
    Full,
}

impl From<JoinKind> for JoinType {
    fn from(kind: JoinKind) -> Self {
        match kind {
            JoinKind::Inner => Self::Inner,
            JoinKind::Left => Self::Left,
            JoinKind::Full => Self::Full,
        }
    }
}

/// Options for [`Frame::to_csv`].
///
/// `slug` and `name` are required only when writing to a location that is
/// not yet registered (relaxed mode auto-registration).
#[derive(Debug, Clone, Default)]
pub struct WriteOptions {
    pub slug: Option<String>,
    pub name: Option<String>,
    pub publish: bool,
}

impl WriteOptions {
    /// Options carrying the registration fields for a new output.
    pub fn named(slug: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            slug: Some(slug.into()),
            name: Some(name.into()),
            publish: false,
        }
    }
}

/// A tabular frame with provenance metadata.
#[derive(Debug, Clone)]
pub struct Frame {
    df: DataFrame,
    lineage: Lineage,
    config: FrameConfig,
}

impl Frame {
    /// Wrap an in-memory frame. The lineage starts empty.
    pub fn new(df: DataFrame, config: FrameConfig) -> Self {
        let lineage = Lineage::new(&config.project_path);
        Self {
            df,
            lineage,
            config,
        }
    }

    /// Read a registered CSV dataset by location.
    ///
    /// The location must resolve to a manifest entry. When the argument is
    /// not a known location but matches a registered slug, the call
    /// delegates to [`Frame::read_dataset`].
    pub fn read_csv(location: &str, config: FrameConfig) -> Result<Self> {
        let store = ManifestStore::load(&config.project_path)?;

        if let Some(entry) = store.find_by_location(location, None) {
            // Read the requested location, not the registered one: the two
            // may differ when files have moved between subdirectories.
            let df = io::read_table(&store.absolute_path(location), DataFormat::Csv)?;

            let mut lineage = Lineage::new(store.project_path());
            let slug = entry.slug.clone();
            lineage.add_source(entry);
            lineage.add_operation(format!("read_csv({slug})"));

            return Ok(Self {
                df,
                lineage,
                config,
            });
        }

        if store.find_by_slug(location, None).is_some() {
            return Self::read_dataset(location, config, None);
        }

        Err(policy::unknown_read_location(location, config.mode))
    }

    /// Read a registered dataset by slug, detecting the file format from
    /// the registered location unless one is given explicitly.
    pub fn read_dataset(
        slug: &str,
        config: FrameConfig,
        format: Option<DataFormat>,
    ) -> Result<Self> {
        let store = ManifestStore::load(&config.project_path)?;

        let entry = store
            .find_by_slug(slug, None)
            .ok_or_else(|| policy::unknown_read_location(slug, config.mode))?;

        let format = match format {
            Some(format) => format,
            None => DataFormat::detect(&entry.location)?,
        };

        let df = io::read_table(&store.absolute_path(&entry.location), format)?;

        let mut lineage = Lineage::new(store.project_path());
        lineage.add_source(entry);
        lineage.add_operation(format!("read_dataset({slug}, format={format})"));

        Ok(Self {
            df,
            lineage,
            config,
        })
    }

    /// The underlying engine frame.
    pub fn data(&self) -> &DataFrame {
        &self.df
    }

    pub fn lineage(&self) -> &Lineage {
        &self.lineage
    }

    pub fn config(&self) -> &FrameConfig {
        &self.config
    }

    pub fn mode(&self) -> Mode {
        self.config.mode
    }

    pub fn height(&self) -> usize {
        self.df.height()
    }

    pub fn width(&self) -> usize {
        self.df.width()
    }

    // ------------------------------------------------------------------
    // Tracked operations
    // ------------------------------------------------------------------

    pub fn head(&self, n: usize) -> Self {
        self.derive(self.df.head(Some(n)), format!("head({n})"))
    }

    pub fn tail(&self, n: usize) -> Self {
        self.derive(self.df.tail(Some(n)), format!("tail({n})"))
    }

    pub fn sort(&self, by: &str, descending: bool) -> Result<Self> {
        let df = self.df.sort(
            [by],
            SortMultipleOptions::default().with_order_descending(descending),
        )?;
        Ok(self.derive(df, format!("sort({by})")))
    }

    pub fn select(&self, columns: &[&str]) -> Result<Self> {
        let df = self.df.select(columns.iter().copied())?;
        Ok(self.derive(df, format!("select({})", columns.join(", "))))
    }

    pub fn drop(&self, columns: &[&str]) -> Result<Self> {
        let df = self.df.drop_many(columns.iter().copied());
        Ok(self.derive(df, format!("drop({})", columns.join(", "))))
    }

    /// Keep the rows selected by `mask`. The description ends up in the
    /// operation record, so say what the mask means.
    pub fn filter(&self, mask: &BooleanChunked, description: &str) -> Result<Self> {
        let df = self.df.filter(mask)?;
        Ok(self.derive(df, format!("filter({description})")))
    }

    /// Group by `keys` and apply the given aggregation expressions.
    pub fn group_by_agg(&self, keys: &[&str], aggs: Vec<Expr>) -> Result<Self> {
        let key_exprs: Vec<Expr> = keys.iter().map(|k| col(*k)).collect();
        let df = self
            .df
            .clone()
            .lazy()
            .group_by(key_exprs)
            .agg(aggs)
            .collect()?;
        Ok(self.derive(df, format!("group_by({})", keys.join(", "))))
    }

    /// Apply an arbitrary engine transformation, recorded under the given
    /// description.
    pub fn apply<F>(&self, description: &str, f: F) -> Result<Self>
    where
        F: FnOnce(&DataFrame) -> PolarsResult<DataFrame>,
    {
        let df = f(&self.df)?;
        Ok(self.derive(df, description))
    }

    // ------------------------------------------------------------------
    // Combining operations
    // ------------------------------------------------------------------

    /// Join with another frame, combining lineage from both sides.
    pub fn merge(
        &self,
        other: &Self,
        left_on: &[&str],
        right_on: &[&str],
        kind: JoinKind,
    ) -> Result<Self> {
        let left_exprs: Vec<Expr> = left_on.iter().map(|c| col(*c)).collect();
        let right_exprs: Vec<Expr> = right_on.iter().map(|c| col(*c)).collect();

        let df = self
            .df
            .clone()
            .lazy()
            .join(
                other.df.clone().lazy(),
                left_exprs,
                right_exprs,
                JoinArgs::new(kind.into()),
            )
            .collect()?;

        let mut lineage = self.lineage.merge(&other.lineage);
        lineage.add_operation(format!(
            "merge(left={} sources, right={} sources)",
            self.lineage.sources.len(),
            other.lineage.sources.len()
        ));

        Ok(Self {
            df,
            lineage,
            config: self.config.clone(),
        })
    }

    /// Stack other frames below this one, combining lineage from all of
    /// them.
    pub fn concat(&self, others: &[Self]) -> Result<Self> {
        let mut df = self.df.clone();
        for other in others {
            df.vstack_mut(&other.df)?;
        }

        let mut lineage = self.lineage.clone();
        for other in others {
            lineage = lineage.merge(&other.lineage);
        }

        let total_sources: usize = std::iter::once(self)
            .chain(others.iter())
            .map(|frame| frame.lineage.sources.len())
            .sum();
        lineage.add_operation(format!(
            "concat({} frames, {} total sources)",
            others.len() + 1,
            total_sources
        ));

        Ok(Self {
            df,
            lineage,
            config: self.config.clone(),
        })
    }

    // ------------------------------------------------------------------
    // In-place and untracked operations
    // ------------------------------------------------------------------

    /// Assign a column in place, replacing any column of the same name.
    pub fn set_column(&mut self, series: Series) -> Result<()> {
        let name = series.name().to_string();
        self.df.with_column(series)?;
        self.lineage.add_operation(format!("set_column({name})"));
        Ok(())
    }

    /// Rename a column. Structural only; not recorded in lineage.
    pub fn rename(&self, from: &str, to: &str) -> Result<Self> {
        let mut df = self.df.clone();
        df.rename(from, to.into())?;
        Ok(self.derive_untracked(df))
    }

    /// Cast a column to another type. Structural only; not recorded in
    /// lineage.
    pub fn cast(&self, column: &str, dtype: &DataType) -> Result<Self> {
        let mut df = self.df.clone();
        let casted = df.column(column)?.cast(dtype)?;
        df.with_column(casted)?;
        Ok(self.derive_untracked(df))
    }

    // ------------------------------------------------------------------
    // Writing
    // ------------------------------------------------------------------

    /// Write the frame to a CSV output location.
    ///
    /// The location must be registered as an output. In strict mode an
    /// unregistered location is an error; in relaxed mode it is
    /// auto-registered using the `slug` and `name` from `options`, with
    /// the field schema inferred from the frame. After the physical write,
    /// the entry's lineage block (content hash, change timestamp, sources,
    /// licenses) is updated in the manifest. Rewriting unchanged content
    /// leaves the recorded timestamp alone.
    pub fn to_csv(&mut self, location: &str, options: &WriteOptions) -> Result<()> {
        let mut store = ManifestStore::load(&self.config.project_path)?;

        let entry = match store.find_by_location(location, Some(DatasetKind::Output)) {
            Some(entry) => entry,
            None => {
                if self.config.mode.is_strict() {
                    return Err(StemmaError::UnregisteredOutput(location.to_owned()));
                }
                self.register_output(&mut store, location, options)?
            }
        };

        let absolute = store.absolute_path(&entry.location);
        io::write_csv(&self.df, &absolute)?;
        self.lineage.add_operation(format!("to_csv({})", entry.slug));

        // Bump the change timestamp only when the content fingerprint
        // actually moved; a byte-identical rewrite is not a change.
        let content_hash = fingerprint::compute(&self.df)?;
        let created_at = match entry.lineage.as_ref() {
            Some(prior) if prior.content_hash == content_hash => prior.created_at,
            _ => chrono::Utc::now(),
        };

        self.lineage.content_hash = Some(content_hash.clone());
        self.lineage.created_at = Some(created_at);

        let record = self.lineage.record(content_hash, created_at);
        store.update_output(&entry.slug, None, None, Some(record))?;

        Ok(())
    }

    fn register_output(
        &self,
        store: &mut ManifestStore,
        location: &str,
        options: &WriteOptions,
    ) -> Result<ManifestEntry> {
        let (Some(slug), Some(name)) = (options.slug.as_ref(), options.name.as_ref()) else {
            return Err(StemmaError::MissingRegistrationFields);
        };

        let fields = infer_fields(&self.df);
        let entry = store.add_output(
            name.as_str(),
            slug.as_str(),
            location,
            fields,
            options.publish,
        )?;

        info!(slug = %entry.slug, location, "auto-registered output dataset");
        Ok(entry)
    }

    fn derive(&self, df: DataFrame, operation: impl Into<String>) -> Self {
        let mut lineage = self.lineage.clone();
        lineage.add_operation(operation);
        Self {
            df,
            lineage,
            config: self.config.clone(),
        }
    }

    fn derive_untracked(&self, df: DataFrame) -> Self {
        Self {
            df,
            lineage: self.lineage.clone(),
            config: self.config.clone(),
        }
    }
}

/// Infer the manifest field schema from the frame's column types.
pub fn infer_fields(df: &DataFrame) -> Vec<FieldSchema> {
    df.get_columns()
        .iter()
        .map(|column| {
            let kind = match column.dtype() {
                dtype if dtype.is_integer() => FieldType::Integer,
                dtype if dtype.is_float() => FieldType::Number,
                DataType::Boolean => FieldType::Boolean,
                DataType::Date | DataType::Datetime(_, _) => FieldType::Datetime,
                _ => FieldType::String,
            };
            FieldSchema::new(column.name().as_str(), kind)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const MANIFEST: &str = "\
inputs:
- name: Official UN Member States
  slug: official-un-member-states
  location: inputs/members.csv
  fields:
  - name: Member State
    type: string
  - name: ISO Code
    type: string
  source:
    name: UN Data Portal
    location:
      data: https://example.com/members.csv
    attributedTo: United Nations
    acquiredAt: \"2024-03-01\"
    acquisitionMethod: manual-download
    license: CC-BY-4.0
- name: Country Populations
  slug: country-populations
  location: inputs/populations.csv
  fields:
  - name: ISO Code
    type: string
  - name: Population
    type: integer
  source:
    name: Population Portal
    location:
      data: https://example.com/populations.csv
    attributedTo: Example Census Bureau
    acquiredAt: \"2024-04-01\"
    acquisitionMethod: api
    license: ODbL-1.0
";

    fn fixture_project() -> TempDir {
        let temp = TempDir::new().expect("temp dir");
        fs::write(temp.path().join(crate::manifest::MANIFEST_FILE), MANIFEST)
            .expect("write manifest");
        fs::create_dir_all(temp.path().join("inputs")).expect("inputs dir");
        fs::write(
            temp.path().join("inputs/members.csv"),
            "Member State,ISO Code\nFrance,FR\nGhana,GH\nJapan,JP\n",
        )
        .expect("members csv");
        fs::write(
            temp.path().join("inputs/populations.csv"),
            "ISO Code,Population\nFR,68000000\nGH,33000000\nJP,125000000\n",
        )
        .expect("populations csv");
        temp
    }

    fn relaxed(temp: &TempDir) -> FrameConfig {
        FrameConfig::relaxed(temp.path())
    }

    #[test]
    fn test_read_csv_seeds_lineage() {
        let temp = fixture_project();
        let frame = Frame::read_csv("inputs/members.csv", relaxed(&temp)).expect("read");

        assert_eq!(frame.height(), 3);
        assert_eq!(frame.lineage().sources.len(), 1);
        assert_eq!(frame.lineage().sources[0].slug, "official-un-member-states");
        assert!(
            frame
                .lineage()
                .operations
                .iter()
                .any(|op| op.contains("official-un-member-states"))
        );
    }

    #[test]
    fn test_read_csv_unknown_location_fails_in_both_modes() {
        let temp = fixture_project();

        let strict = Frame::read_csv("inputs/unknown.csv", FrameConfig::strict(temp.path()));
        let relaxed = Frame::read_csv("inputs/unknown.csv", relaxed(&temp));

        assert!(matches!(strict.unwrap_err(), StemmaError::DatasetNotFound(_)));
        assert!(matches!(relaxed.unwrap_err(), StemmaError::DatasetNotFound(_)));
    }

    #[test]
    fn test_read_dataset_by_slug_detects_format() {
        let temp = fixture_project();
        let frame =
            Frame::read_dataset("official-un-member-states", relaxed(&temp), None).expect("read");

        assert_eq!(frame.height(), 3);
        assert!(
            frame
                .lineage()
                .operations
                .iter()
                .any(|op| op.contains("format=csv"))
        );
    }

    #[test]
    fn test_read_dataset_unknown_slug() {
        let temp = fixture_project();
        let err = Frame::read_dataset("nonexistent-dataset", relaxed(&temp), None).unwrap_err();
        assert!(matches!(err, StemmaError::DatasetNotFound(_)));
    }

    #[test]
    fn test_read_csv_with_slug_delegates_to_read_dataset() {
        let temp = fixture_project();
        let frame =
            Frame::read_csv("official-un-member-states", relaxed(&temp)).expect("read");

        assert!(
            frame
                .lineage()
                .operations
                .iter()
                .any(|op| op.contains("read_dataset"))
        );
    }

    #[test]
    fn test_tracked_operations_copy_lineage() {
        let temp = fixture_project();
        let frame = Frame::read_csv("inputs/members.csv", relaxed(&temp)).expect("read");
        let ops_before = frame.lineage().operations.len();

        let top = frame.head(2);

        assert_eq!(top.height(), 2);
        assert_eq!(top.lineage().operations.len(), ops_before + 1);
        assert_eq!(top.lineage().sources.len(), 1);
        // The parent is untouched.
        assert_eq!(frame.lineage().operations.len(), ops_before);
    }

    #[test]
    fn test_repeated_operations_are_kept() {
        let temp = fixture_project();
        let frame = Frame::read_csv("inputs/members.csv", relaxed(&temp)).expect("read");

        let twice = frame.head(2).head(2);
        let heads = twice
            .lineage()
            .operations
            .iter()
            .filter(|op| op.as_str() == "head(2)")
            .count();
        assert_eq!(heads, 2);
    }

    #[test]
    fn test_sort_select_drop_record_operations() {
        let temp = fixture_project();
        let frame = Frame::read_csv("inputs/members.csv", relaxed(&temp)).expect("read");

        let sorted = frame.sort("Member State", false).expect("sort");
        assert!(sorted.lineage().operations.iter().any(|op| op.contains("sort")));

        let selected = frame.select(&["Member State"]).expect("select");
        assert_eq!(selected.width(), 1);
        assert!(
            selected
                .lineage()
                .operations
                .iter()
                .any(|op| op.contains("select"))
        );

        let dropped = frame.drop(&["ISO Code"]).expect("drop");
        assert_eq!(dropped.width(), 1);
    }

    #[test]
    fn test_merge_combines_sources_with_one_summary_operation() {
        let temp = fixture_project();
        let members = Frame::read_csv("inputs/members.csv", relaxed(&temp)).expect("members");
        let populations =
            Frame::read_csv("inputs/populations.csv", relaxed(&temp)).expect("populations");

        let merged = members
            .merge(&populations, &["ISO Code"], &["ISO Code"], JoinKind::Inner)
            .expect("merge");

        assert_eq!(merged.lineage().sources.len(), 2);
        assert_eq!(merged.lineage().operations.len(), 1);
        assert!(merged.lineage().operations[0].starts_with("merge("));
        assert_eq!(
            merged.lineage().licenses(),
            vec!["CC-BY-4.0", "ODbL-1.0"]
        );
    }

    #[test]
    fn test_merge_with_same_source_does_not_duplicate() {
        let temp = fixture_project();
        let a = Frame::read_csv("inputs/members.csv", relaxed(&temp)).expect("a");
        let b = Frame::read_csv("inputs/members.csv", relaxed(&temp)).expect("b");

        let merged = a
            .merge(&b, &["ISO Code"], &["ISO Code"], JoinKind::Inner)
            .expect("merge");

        assert_eq!(merged.lineage().sources.len(), 1);
    }

    #[test]
    fn test_concat_combines_all_lineages() {
        let temp = fixture_project();
        let members = Frame::read_csv("inputs/members.csv", relaxed(&temp)).expect("members");
        let more = members.head(2);

        let combined = members.concat(std::slice::from_ref(&more)).expect("concat");

        assert_eq!(combined.height(), 5);
        assert_eq!(combined.lineage().sources.len(), 1);
        assert!(
            combined
                .lineage()
                .operations
                .last()
                .expect("summary op")
                .starts_with("concat(2 frames")
        );
    }

    #[test]
    fn test_set_column_tracks_in_place() {
        let temp = fixture_project();
        let mut frame = Frame::read_csv("inputs/members.csv", relaxed(&temp)).expect("read");
        let ops_before = frame.lineage().operations.len();

        let flags = Series::new("un_member".into(), [true, true, true]);
        frame.set_column(flags).expect("set column");

        assert_eq!(frame.width(), 3);
        assert_eq!(frame.lineage().operations.len(), ops_before + 1);
        assert_eq!(frame.lineage().sources.len(), 1);
    }

    #[test]
    fn test_structural_operations_are_untracked() {
        let temp = fixture_project();
        let frame = Frame::read_csv("inputs/members.csv", relaxed(&temp)).expect("read");
        let ops_before = frame.lineage().operations.len();

        let renamed = frame.rename("ISO Code", "iso_code").expect("rename");
        assert_eq!(renamed.lineage().operations.len(), ops_before);

        let cloned = frame.clone();
        assert_eq!(cloned.lineage().operations.len(), ops_before);
    }

    #[test]
    fn test_infer_fields_maps_dtypes() {
        let df = df!(
            "label" => ["a", "b"],
            "count" => [1i64, 2],
            "ratio" => [0.5f64, 0.7],
            "flag" => [true, false],
        )
        .expect("frame");

        let fields = infer_fields(&df);
        let kinds: Vec<FieldType> = fields.iter().map(|f| f.kind).collect();

        assert_eq!(
            kinds,
            vec![
                FieldType::String,
                FieldType::Integer,
                FieldType::Number,
                FieldType::Boolean,
            ]
        );
    }

    #[test]
    fn test_to_csv_strict_rejects_unregistered_output() {
        let temp = fixture_project();
        let mut frame =
            Frame::read_csv("inputs/members.csv", FrameConfig::strict(temp.path()))
                .expect("read");

        let err = frame
            .to_csv("outputs/members_copy.csv", &WriteOptions::default())
            .unwrap_err();
        assert!(matches!(err, StemmaError::UnregisteredOutput(_)));
    }

    #[test]
    fn test_to_csv_relaxed_requires_registration_fields() {
        let temp = fixture_project();
        let mut frame = Frame::read_csv("inputs/members.csv", relaxed(&temp)).expect("read");

        let err = frame
            .to_csv("outputs/members_copy.csv", &WriteOptions::default())
            .unwrap_err();
        assert!(matches!(err, StemmaError::MissingRegistrationFields));
    }

    #[test]
    fn test_to_csv_relaxed_auto_registers() {
        let temp = fixture_project();
        let mut frame = Frame::read_csv("inputs/members.csv", relaxed(&temp)).expect("read");

        frame
            .to_csv(
                "outputs/members_copy.csv",
                &WriteOptions::named("members-copy", "Members Copy"),
            )
            .expect("write");

        assert!(temp.path().join("outputs/members_copy.csv").exists());

        let store = ManifestStore::load(temp.path()).expect("reload");
        let entry = store
            .find_by_slug("members-copy", Some(DatasetKind::Output))
            .expect("registered");
        assert_eq!(entry.location, "outputs/members_copy.csv");
        assert_eq!(entry.fields.len(), 2);
        let lineage = entry.lineage.expect("lineage block");
        assert_eq!(lineage.content_hash.len(), 64);
        assert_eq!(lineage.sources.len(), 1);
        assert_eq!(lineage.sources[0].slug, "official-un-member-states");
        assert_eq!(lineage.licenses, vec!["CC-BY-4.0"]);
    }
}
