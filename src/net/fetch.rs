//! Fetching remote datasets with manual redirect handling.
//!
//! Automatic redirect following is disabled on the HTTP client: a
//! legitimate public URL may redirect to an internal address, so every hop
//! is validated through the safety gate before the next request is issued.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use tracing::info;
use url::Url;

use crate::error::{Result, StemmaError};
use crate::manifest::{ManifestEntry, ManifestStore};

use super::guard::{ResolveHost, SystemResolver, is_public_url_with};

/// Minimal view of an HTTP response: status, redirect target, body.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub location: Option<String>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_redirect(&self) -> bool {
        matches!(self.status, 301 | 302 | 303 | 307 | 308)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Blocking HTTP GET capability with explicit timeout and no automatic
/// redirect following.
pub trait HttpTransport {
    fn get(&self, url: &Url, timeout: Duration) -> Result<HttpResponse>;
}

/// Production transport backed by a blocking reqwest client.
pub struct ReqwestTransport {
    client: reqwest::blocking::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| StemmaError::FetchError(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

impl HttpTransport for ReqwestTransport {
    fn get(&self, url: &Url, timeout: Duration) -> Result<HttpResponse> {
        let response = self
            .client
            .get(url.clone())
            .timeout(timeout)
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    StemmaError::FetchTimeout {
                        url: url.to_string(),
                        seconds: timeout.as_secs(),
                    }
                } else {
                    StemmaError::FetchError(format!("request to '{url}' failed: {e}"))
                }
            })?;

        let status = response.status().as_u16();
        let location = response
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        let body = response
            .bytes()
            .map_err(|e| {
                StemmaError::FetchError(format!("failed to read body from '{url}': {e}"))
            })?
            .to_vec();

        Ok(HttpResponse {
            status,
            location,
            body,
        })
    }
}

/// Options for [`fetch_dataset`].
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Per-request timeout.
    pub timeout: Duration,

    /// Fetch even when a local copy already exists.
    pub force: bool,

    /// Maximum number of redirects to follow.
    pub max_redirects: usize,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            force: false,
            max_redirects: 10,
        }
    }
}

/// Download a dataset from its declared source URL.
///
/// Returns the local path (freshly downloaded, or the existing file when
/// it is already present and `force` is off; presence, not staleness, is
/// what short-circuits).
pub fn fetch_dataset(
    store: &ManifestStore,
    entry: &ManifestEntry,
    options: &FetchOptions,
) -> Result<PathBuf> {
    let transport = ReqwestTransport::new()?;
    fetch_dataset_with(store, entry, options, &transport, &SystemResolver)
}

/// [`fetch_dataset`] with explicit transport and resolver capabilities.
pub fn fetch_dataset_with(
    store: &ManifestStore,
    entry: &ManifestEntry,
    options: &FetchOptions,
    transport: &dyn HttpTransport,
    resolver: &dyn ResolveHost,
) -> Result<PathBuf> {
    let url = entry
        .source
        .as_ref()
        .and_then(|source| source.location.data.as_deref())
        .ok_or_else(|| StemmaError::NoSourceUrl(entry.slug.clone()))?;

    let local_path = store.absolute_path(&entry.location);
    if local_path.exists() && !options.force {
        info!(path = %local_path.display(), "using existing local file");
        return Ok(local_path);
    }

    if !is_public_url_with(url, resolver) {
        return Err(StemmaError::UrlNotAllowed(url.to_owned()));
    }

    info!(url, slug = %entry.slug, "fetching dataset");

    let mut current = Url::parse(url)
        .map_err(|e| StemmaError::FetchError(format!("invalid source URL '{url}': {e}")))?;
    let mut response = transport.get(&current, options.timeout)?;
    let mut redirects = 0usize;

    while response.is_redirect() {
        if redirects >= options.max_redirects {
            return Err(StemmaError::TooManyRedirects(options.max_redirects));
        }

        let target = response
            .location
            .as_deref()
            .ok_or(StemmaError::MissingLocationHeader)?;

        // Relative targets resolve against the URL that issued them.
        let next = current.join(target).map_err(|e| {
            StemmaError::FetchError(format!("invalid redirect target '{target}': {e}"))
        })?;

        if !is_public_url_with(next.as_str(), resolver) {
            return Err(StemmaError::UrlNotAllowed(next.to_string()));
        }

        info!(target = %next, "following redirect");
        current = next;
        response = transport.get(&current, options.timeout)?;
        redirects += 1;
    }

    if !response.is_success() {
        return Err(StemmaError::FetchError(format!(
            "request to '{current}' returned status {}",
            response.status
        )));
    }

    if let Some(parent) = local_path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&local_path, &response.body)?;

    info!(
        path = %local_path.display(),
        bytes = response.body.len(),
        "saved fetched dataset"
    );

    Ok(local_path)
}
