//! Centralized error handling for the stemma library.
//!
//! Errors are modelled as one enum so callers can match on the failure
//! kind instead of parsing message strings:
//!
//! ```
//! use stemma::error::StemmaError;
//!
//! fn handle_error(err: StemmaError) {
//!     match err {
//!         StemmaError::DatasetNotFound(msg) => eprintln!("unknown dataset: {msg}"),
//!         StemmaError::UrlNotAllowed(url) => eprintln!("blocked fetch: {url}"),
//!         _ => eprintln!("other error: {}", err),
//!     }
//! }
//! ```
//!
//! The `From` impls let the `?` operator convert I/O, engine, and parse
//! errors automatically, and [`ResultExt`] adds `.context()` /
//! `.with_context()` for attaching call-site information.

use std::fmt;
use std::path::PathBuf;

/// Main error type for stemma operations.
#[derive(Debug)]
pub enum StemmaError {
    /// I/O errors (file operations, directory creation, etc.)
    Io(std::io::Error),

    /// Errors raised by the underlying tabular engine.
    Engine(polars::error::PolarsError),

    /// No `datasets.yaml` manifest exists at the project root.
    ManifestMissing(PathBuf),

    /// The manifest file exists but could not be parsed.
    ManifestParse(String),

    /// An output dataset with this slug is already registered.
    DuplicateSlug(String),

    /// No registered output carries this slug.
    EntryNotFound(String),

    /// A read location (or slug) is not registered in the manifest.
    DatasetNotFound(String),

    /// Strict mode: a write targeted an unregistered output location.
    UnregisteredOutput(String),

    /// Relaxed-mode auto-registration needs both `slug` and `name`.
    MissingRegistrationFields,

    /// The dataset entry carries no source data URL to fetch from.
    NoSourceUrl(String),

    /// A fetch URL (initial or redirect target) failed the public-address check.
    UrlNotAllowed(String),

    /// A redirect response arrived without a `Location` header.
    MissingLocationHeader,

    /// The redirect chain exceeded the configured maximum.
    TooManyRedirects(usize),

    /// A network request timed out.
    FetchTimeout { url: String, seconds: u64 },

    /// A network request failed (transport error or non-success status).
    FetchError(String),

    /// The dataset location names a format the engine cannot read.
    UnsupportedFormat(String),

    /// The dataset location has no extension to detect a format from.
    FormatDetectionFailed(String),

    /// Generic error with context.
    Other(String),
}

impl fmt::Display for StemmaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::Engine(e) => write!(f, "Engine error: {e}"),
            Self::ManifestMissing(path) => {
                write!(f, "datasets.yaml not found in {}", path.display())
            }
            Self::ManifestParse(msg) => write!(f, "Failed to parse datasets.yaml: {msg}"),
            Self::DuplicateSlug(slug) => {
                write!(f, "Output dataset with slug '{slug}' already exists")
            }
            Self::EntryNotFound(slug) => {
                write!(f, "Output dataset with slug '{slug}' not found")
            }
            Self::DatasetNotFound(msg) => write!(f, "{msg}"),
            Self::UnregisteredOutput(location) => write!(
                f,
                "Output dataset at '{location}' not registered in datasets.yaml. \
                 In strict mode, outputs must be pre-registered."
            ),
            Self::MissingRegistrationFields => write!(
                f,
                "In relaxed mode, 'slug' and 'name' are required when writing to \
                 an unregistered output location."
            ),
            Self::NoSourceUrl(slug) => write!(f, "Dataset '{slug}' has no source URL"),
            Self::UrlNotAllowed(url) => write!(
                f,
                "URL '{url}' is not allowed. Only HTTP/HTTPS URLs pointing to \
                 public internet addresses are permitted."
            ),
            Self::MissingLocationHeader => {
                write!(f, "Redirect response without Location header")
            }
            Self::TooManyRedirects(max) => write!(f, "Too many redirects (max: {max})"),
            Self::FetchTimeout { url, seconds } => {
                write!(f, "Request to '{url}' timed out after {seconds} seconds")
            }
            Self::FetchError(msg) => write!(f, "Fetch failed: {msg}"),
            Self::UnsupportedFormat(ext) => write!(f, "Unsupported dataset format: {ext}"),
            Self::FormatDetectionFailed(location) => {
                write!(f, "Cannot detect format of '{location}' (no file extension)")
            }
            Self::Other(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for StemmaError {}

impl From<std::io::Error> for StemmaError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<polars::error::PolarsError> for StemmaError {
    fn from(err: polars::error::PolarsError) -> Self {
        Self::Engine(err)
    }
}

impl From<serde_yaml::Error> for StemmaError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::ManifestParse(err.to_string())
    }
}

impl From<anyhow::Error> for StemmaError {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

/// Result type alias for stemma operations.
pub type Result<T> = std::result::Result<T, StemmaError>;

/// Extension trait to add context to results.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn context(self, msg: impl Into<String>) -> Result<T>;

    /// Add context using a closure (lazy evaluation).
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<StemmaError>,
{
    fn context(self, msg: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let err: StemmaError = e.into();
            StemmaError::Other(format!("{}: {}", msg.into(), err))
        })
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| {
            let err: StemmaError = e.into();
            StemmaError::Other(format!("{}: {}", f(), err))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StemmaError::DuplicateSlug("filtered-schools".to_owned());
        assert_eq!(
            err.to_string(),
            "Output dataset with slug 'filtered-schools' already exists"
        );
    }

    #[test]
    fn test_url_not_allowed_does_not_leak_addresses() {
        let err = StemmaError::UrlNotAllowed("http://internal.example.com/data".to_owned());
        let msg = err.to_string();
        assert!(msg.contains("internal.example.com"));
        assert!(!msg.contains("10."), "message must not echo resolved IPs");
    }

    #[test]
    fn test_result_context() {
        let result: std::result::Result<(), std::io::Error> = Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "datasets.yaml",
        ));

        let result: Result<()> = result.context("Failed to read manifest");
        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Failed to read manifest")
        );
    }
}
