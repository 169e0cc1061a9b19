// src/query.rs

use tracing::{debug, info, instrument};

use crate::catalog::CatalogResolver;
use crate::error::{CensusError, Result};
use crate::fetch::{Fetcher, RetryPolicy};
use crate::table::Table;

pub const DEFAULT_BASE_URL: &str = "https://api.census.gov/data";

/// One request against the remote API. Variable order is kept as given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRequest {
    pub dataset: String,
    pub year: i32,
    pub variables: Vec<String>,
    /// Appended verbatim to the URL, e.g. `&for=state:*`.
    pub extra: String,
}

impl QueryRequest {
    pub fn new<S: AsRef<str>>(dataset: &str, variables: &[S], year: i32) -> Self {
        Self {
            dataset: dataset.to_string(),
            year,
            variables: variables.iter().map(|v| v.as_ref().to_string()).collect(),
            extra: String::new(),
        }
    }

    pub fn extra(mut self, extra: impl Into<String>) -> Self {
        self.extra = extra.into();
        self
    }
}

/// `<base>/<year>/<template without trailing '/'>?get=<v1,v2,...><extra>`
pub fn build_url(base: &str, year: i32, template: &str, variables: &[String], extra: &str) -> String {
    let base = base.strip_suffix('/').unwrap_or(base);
    let path = template.strip_suffix('/').unwrap_or(template);
    format!("{base}/{year}/{path}?get={}{extra}", variables.join(","))
}

/// Validates requests against the catalog and runs the retried fetch.
pub struct QueryEngine<R, F> {
    catalog: R,
    fetcher: F,
    retry: RetryPolicy,
    base_url: String,
    last_url: Option<String>,
}

impl<R: CatalogResolver, F: Fetcher> QueryEngine<R, F> {
    pub fn new(catalog: R, fetcher: F) -> Self {
        Self {
            catalog,
            fetcher,
            retry: RetryPolicy::default(),
            base_url: DEFAULT_BASE_URL.to_string(),
            last_url: None,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn catalog(&self) -> &R {
        &self.catalog
    }

    /// URL built by the most recent `query`, kept even when validation failed
    /// after construction.
    pub fn last_url(&self) -> Option<&str> {
        self.last_url.as_deref()
    }

    pub async fn query<S: AsRef<str>>(
        &mut self,
        dataset: &str,
        variables: &[S],
        year: i32,
        extra: &str,
    ) -> Result<Table> {
        self.execute(&QueryRequest::new(dataset, variables, year).extra(extra))
            .await
    }

    #[instrument(level = "info", skip(self, req), fields(dataset = %req.dataset, year = req.year))]
    pub async fn execute(&mut self, req: &QueryRequest) -> Result<Table> {
        let template = self.catalog.resolve_dataset_url(&req.dataset)?;
        let url = build_url(&self.base_url, req.year, &template, &req.variables, &req.extra);
        self.last_url = Some(url.clone());

        self.validate(req)?;

        info!(%url, "fetching");
        let table = self.retry.run(&url, |_| self.fetcher.fetch(&url)).await?;
        debug!(rows = table.len(), "fetched");
        Ok(table)
    }

    fn validate(&self, req: &QueryRequest) -> Result<()> {
        if !self.catalog.available_years(&req.dataset)?.contains(&req.year) {
            return Err(CensusError::UnsupportedYear {
                dataset: req.dataset.clone(),
                year: req.year,
            });
        }

        if req.variables.is_empty() {
            return Err(CensusError::NoVariables(req.dataset.clone()));
        }

        // first bad variable wins
        for variable in &req.variables {
            if !self
                .catalog
                .variable_exists(&req.dataset, variable, req.year)?
            {
                return Err(CensusError::UnknownVariable {
                    dataset: req.dataset.clone(),
                    variable: variable.clone(),
                    year: req.year,
                });
            }
        }
        Ok(())
    }
}
