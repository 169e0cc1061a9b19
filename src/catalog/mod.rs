// src/catalog/mod.rs

pub mod duck;

use std::collections::BTreeSet;

use crate::error::Result;
use crate::table::Table;

pub use duck::{Catalog, CatalogFormat};

/// Read-only metadata questions answered before anything goes over the wire.
///
/// Name matching is exact and case-sensitive: `"acs/acs1"` and `"ACS/ACS1"`
/// are different datasets, and no trimming is applied.
pub trait CatalogResolver {
    /// URL template for `dataset`, e.g. `acs/acs1/`.
    /// Fails with `UnknownDataset` when no row matches.
    fn resolve_dataset_url(&self, dataset: &str) -> Result<String>;

    /// Every year `dataset` is published for. A known dataset with no
    /// recorded years yields an empty set, not an error.
    fn available_years(&self, dataset: &str) -> Result<BTreeSet<i32>>;

    /// Existence predicate; `Ok(false)` is a normal outcome.
    fn variable_exists(&self, dataset: &str, variable: &str, year: i32) -> Result<bool>;

    /// Full dump of the dataset catalog, unfiltered.
    fn list_all_datasets(&self) -> Result<Table>;
}

impl<R: CatalogResolver + ?Sized> CatalogResolver for &R {
    fn resolve_dataset_url(&self, dataset: &str) -> Result<String> {
        (**self).resolve_dataset_url(dataset)
    }

    fn available_years(&self, dataset: &str) -> Result<BTreeSet<i32>> {
        (**self).available_years(dataset)
    }

    fn variable_exists(&self, dataset: &str, variable: &str, year: i32) -> Result<bool> {
        (**self).variable_exists(dataset, variable, year)
    }

    fn list_all_datasets(&self) -> Result<Table> {
        (**self).list_all_datasets()
    }
}
