// src/error.rs

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CensusError>;

/// Everything a query, catalog lookup or geography pull can fail with.
///
/// Validation variants are raised locally before any network access and are
/// never retried. Only [`CensusError::Fetch`] comes out of the retry policy.
#[derive(Debug, Error)]
pub enum CensusError {
    #[error("dataset `{0}` is not in the catalog")]
    UnknownDataset(String),

    #[error("{year} is not available for the dataset `{dataset}`")]
    UnsupportedYear { dataset: String, year: i32 },

    #[error("the variable `{variable}` is not available for the year {year} and dataset `{dataset}`")]
    UnknownVariable {
        dataset: String,
        variable: String,
        year: i32,
    },

    #[error("no variables requested for dataset `{0}`")]
    NoVariables(String),

    #[error("geography `{0}` is not in the catalog")]
    UnknownGeography(String),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("catalog query failed: {0}")]
    Catalog(#[from] duckdb::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("bad geography archive: {0}")]
    Archive(#[from] zip::result::ZipError),
}

/// A remote call that did not produce a result, after `attempts` tries.
#[derive(Debug, Error)]
#[error("GET {url} failed after {attempts} attempt(s): {source}")]
pub struct FetchError {
    pub url: String,
    pub attempts: u32,
    #[source]
    pub source: TransportError,
}

/// One failed attempt at the transport or decoding layer.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("non-success status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("could not decode response body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("unexpected response shape: {0}")]
    Shape(String),
}

impl TransportError {
    /// Timeouts, dropped connections, 429 and 5xx are worth another try.
    /// Client errors and undecodable bodies are not.
    pub fn is_transient(&self) -> bool {
        match self {
            TransportError::Http(e) => {
                if let Some(status) = e.status() {
                    return status.as_u16() == 429 || status.is_server_error();
                }
                e.is_timeout() || e.is_connect() || e.is_request() || e.is_body()
            }
            TransportError::Status { status, .. } => *status == 429 || *status >= 500,
            TransportError::Decode(_) | TransportError::Shape(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        let s = |status| TransportError::Status {
            status,
            body: String::new(),
        };
        assert!(s(500).is_transient());
        assert!(s(503).is_transient());
        assert!(s(429).is_transient());
        assert!(!s(400).is_transient());
        assert!(!s(404).is_transient());
        assert!(!TransportError::Shape("x".into()).is_transient());
    }

    #[test]
    fn fetch_error_names_url_and_attempts() {
        let err = FetchError {
            url: "https://example.test/data".into(),
            attempts: 3,
            source: TransportError::Status {
                status: 502,
                body: "bad gateway".into(),
            },
        };
        let msg = err.to_string();
        assert!(msg.contains("https://example.test/data"));
        assert!(msg.contains("3 attempt"));
    }
}
