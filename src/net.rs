//! Network layer: URL safety validation and guarded dataset fetching.

pub mod fetch;
pub mod guard;

pub use fetch::{
    FetchOptions, HttpResponse, HttpTransport, ReqwestTransport, fetch_dataset, fetch_dataset_with,
};
pub use guard::{ResolveHost, SystemResolver, is_public_url, is_public_url_with};
