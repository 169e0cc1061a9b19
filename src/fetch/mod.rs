// src/fetch/mod.rs

pub mod retry;

use reqwest::Client;
use serde_json::Value;
use std::{future::Future, time::Duration};
use tracing::debug;

use crate::error::TransportError;
use crate::table::Table;

pub use retry::{Backoff, RetryPolicy};

/// A single GET against the remote data API. Implementations make one
/// attempt per call; retries belong to [`RetryPolicy`].
pub trait Fetcher {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<Table, TransportError>> + Send;
}

impl<F: Fetcher + ?Sized> Fetcher for &F {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<Table, TransportError>> + Send {
        (**self).fetch(url)
    }
}

/// Fetcher backed by a shared `reqwest::Client`.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("censusforge/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }

    async fn get_json(&self, url: &str) -> Result<Value, TransportError> {
        debug!("GET {}", url);
        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                body: body.chars().take(512).collect(),
            });
        }
        let bytes = resp.bytes().await?;
        if bytes.is_empty() {
            // the API answers 204 with no body when nothing matches
            return Err(TransportError::Shape(format!(
                "empty body (status {})",
                status.as_u16()
            )));
        }
        Ok(serde_json::from_slice(&bytes)?)
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<Table, TransportError>> + Send {
        let url = url.to_string();
        async move {
            let body = self.get_json(&url).await?;
            Table::from_json(body)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Answer every connection with the same canned response.
    async fn serve(status: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((mut sock, _)) = listener.accept().await else {
                    return;
                };
                let mut buf = [0u8; 4096];
                let _ = sock.read(&mut buf).await;
                let resp = format!(
                    "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = sock.write_all(resp.as_bytes()).await;
                let _ = sock.shutdown().await;
            }
        });
        format!("http://{addr}/data/2019/acs/acs1?get=NAME")
    }

    fn fetcher() -> HttpFetcher {
        HttpFetcher::new(Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn parses_array_of_arrays() {
        let url = serve("200 OK", r#"[["NAME","state"],["Ohio","39"]]"#).await;
        let t = fetcher().fetch(&url).await.unwrap();
        assert_eq!(t.header, vec!["NAME", "state"]);
        assert_eq!(t.rows, vec![vec![Value::from("Ohio"), Value::from("39")]]);
    }

    #[tokio::test]
    async fn server_errors_are_transient() {
        let url = serve("503 Service Unavailable", "busy").await;
        let err = fetcher().fetch(&url).await.unwrap_err();
        assert!(matches!(err, TransportError::Status { status: 503, ref body } if body == "busy"));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn client_errors_are_not() {
        let url = serve("400 Bad Request", "error: unknown variable 'XYZ'").await;
        let err = fetcher().fetch(&url).await.unwrap_err();
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn empty_and_malformed_bodies() {
        let url = serve("204 No Content", "").await;
        assert!(matches!(
            fetcher().fetch(&url).await,
            Err(TransportError::Shape(_))
        ));
        let url = serve("200 OK", "<html>oops</html>").await;
        let err = fetcher().fetch(&url).await.unwrap_err();
        assert!(matches!(err, TransportError::Decode(_)));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn refused_connection_is_transient() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let err = fetcher().fetch(&format!("http://{addr}/x")).await.unwrap_err();
        assert!(err.is_transient());
    }
}
