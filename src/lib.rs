//! Validating client for the U.S. Census data API.
//!
//! Requests are checked against a bundled DuckDB/SQLite reference catalog
//! (dataset URL templates, published years, per-year variables) before a
//! single retried GET is issued, so malformed requests fail locally.

pub mod catalog;
pub mod config;
pub mod error;
pub mod fetch;
pub mod geo;
pub mod query;
pub mod table;
pub mod workspace;

pub use catalog::{Catalog, CatalogFormat, CatalogResolver};
pub use config::Config;
pub use error::{CensusError, FetchError, Result, TransportError};
pub use fetch::{Backoff, Fetcher, HttpFetcher, RetryPolicy};
pub use geo::GeoPuller;
pub use query::{build_url, QueryEngine, QueryRequest};
pub use table::Table;
pub use workspace::Workspace;

/// Build an engine over the configured catalog and the live HTTP fetcher.
pub fn engine_from_config(cfg: &Config) -> Result<QueryEngine<Catalog, HttpFetcher>> {
    let catalog = Catalog::open_as(&cfg.catalog_path, cfg.catalog_format)?;
    let fetcher = HttpFetcher::new(cfg.request_timeout())
        .map_err(|e| CensusError::Config(format!("building HTTP client: {e}")))?;
    Ok(QueryEngine::new(catalog, fetcher)
        .with_retry(cfg.retry.policy())
        .with_base_url(cfg.base_url.clone()))
}
