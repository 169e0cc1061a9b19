// src/catalog/duck.rs

use chrono::{DateTime, NaiveTime};
use duckdb::types::Value as DuckValue;
use duckdb::{params, AccessMode, Config, Connection};
use serde::Deserialize;
use serde_json::{Number, Value};
use std::{collections::BTreeSet, path::Path};
use tracing::{debug, info};

use super::CatalogResolver;
use crate::error::{CensusError, Result};
use crate::table::Table;

/// On-disk layout of the reference catalog.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CatalogFormat {
    /// A native DuckDB database file.
    #[default]
    Duckdb,
    /// A SQLite file, attached through DuckDB's `sqlite` extension.
    Sqlite,
}

/// The bundled reference catalog: `dataset_table`, `variable_table` and
/// `geo_table`, all read-only.
pub struct Catalog {
    conn: Connection,
    schema: String,
}

impl Catalog {
    /// Open a DuckDB catalog file read-only.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        ensure_exists(path)?;
        let config = Config::default().access_mode(AccessMode::ReadOnly)?;
        let conn = Connection::open_with_flags(path, config)?;
        info!(path = %path.display(), "opened duckdb catalog");
        Ok(Self::from_connection(conn, "main"))
    }

    /// Attach a SQLite catalog file read-only as `sqlite_db`.
    ///
    /// Needs DuckDB's `sqlite` extension to be installed already. Nothing is
    /// downloaded here; run `INSTALL sqlite;` once in a DuckDB shell, or
    /// convert the catalog to a DuckDB file, when it is missing.
    pub fn attach_sqlite(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        ensure_exists(path)?;
        let conn = Connection::open_in_memory()?;
        load_sqlite_extension(&conn)?;
        let escaped = path.to_string_lossy().replace('\'', "''");
        conn.execute_batch(&format!(
            "ATTACH '{escaped}' AS sqlite_db (TYPE sqlite, READ_ONLY);"
        ))?;
        info!(path = %path.display(), "attached sqlite catalog");
        Ok(Self::from_connection(conn, "sqlite_db"))
    }

    /// Open `path` according to `format`.
    pub fn open_as(path: impl AsRef<Path>, format: CatalogFormat) -> Result<Self> {
        match format {
            CatalogFormat::Duckdb => Self::open(path),
            CatalogFormat::Sqlite => Self::attach_sqlite(path),
        }
    }

    /// Wrap an existing connection whose catalog tables live in `schema`.
    pub fn from_connection(conn: Connection, schema: impl Into<String>) -> Self {
        Self {
            conn,
            schema: schema.into(),
        }
    }

    fn table(&self, name: &str) -> String {
        format!("\"{}\".{}", self.schema.replace('"', "\"\""), name)
    }

    /// Primary key of `dataset` in `dataset_table`.
    pub fn dataset_id(&self, dataset: &str) -> Result<i64> {
        let sql = format!(
            "SELECT CAST(id AS BIGINT) FROM {} WHERE dataset = ? ORDER BY id LIMIT 1;",
            self.table("dataset_table")
        );
        match self.conn.query_row(&sql, [dataset], |r| r.get(0)) {
            Ok(id) => Ok(id),
            Err(duckdb::Error::QueryReturnedNoRows) => {
                Err(CensusError::UnknownDataset(dataset.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Full dump of `geo_table`.
    pub fn list_geographies(&self) -> Result<Table> {
        self.dump(&self.table("geo_table"))
    }

    /// Download URL of the geography called `name`.
    pub fn geography_url(&self, name: &str) -> Result<String> {
        let sql = format!(
            "SELECT CAST(url AS VARCHAR) FROM {} WHERE name = ? ORDER BY id LIMIT 1;",
            self.table("geo_table")
        );
        match self.conn.query_row(&sql, [name], |r| r.get(0)) {
            Ok(url) => Ok(url),
            Err(duckdb::Error::QueryReturnedNoRows) => {
                Err(CensusError::UnknownGeography(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn dump(&self, table: &str) -> Result<Table> {
        let mut stmt = self.conn.prepare(&format!("SELECT * FROM {table};"))?;
        let mut rows = stmt.query([])?;
        let header = rows.as_ref().map(|s| s.column_names()).unwrap_or_default();

        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut record = Vec::with_capacity(header.len());
            for i in 0..header.len() {
                record.push(to_json(row.get::<_, DuckValue>(i)?));
            }
            out.push(record);
        }
        debug!(table, rows = out.len(), "dumped catalog table");
        Ok(Table::new(header, out))
    }
}

impl CatalogResolver for Catalog {
    fn resolve_dataset_url(&self, dataset: &str) -> Result<String> {
        let sql = format!(
            "SELECT CAST(url AS VARCHAR) FROM {} WHERE dataset = ? ORDER BY id LIMIT 1;",
            self.table("dataset_table")
        );
        match self.conn.query_row(&sql, [dataset], |r| r.get(0)) {
            Ok(url) => Ok(url),
            Err(duckdb::Error::QueryReturnedNoRows) => {
                Err(CensusError::UnknownDataset(dataset.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn available_years(&self, dataset: &str) -> Result<BTreeSet<i32>> {
        // distinguishes "unknown dataset" from "known, but no years"
        self.dataset_id(dataset)?;

        let sql = format!(
            "SELECT DISTINCT CAST(year AS INTEGER) FROM {} WHERE dataset = ? AND year IS NOT NULL;",
            self.table("variable_table")
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let years = stmt
            .query_map([dataset], |r| r.get::<_, i32>(0))?
            .collect::<std::result::Result<BTreeSet<_>, _>>()?;
        Ok(years)
    }

    fn variable_exists(&self, dataset: &str, variable: &str, year: i32) -> Result<bool> {
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE dataset = ? AND variable = ? AND year = ?;",
            self.table("variable_table")
        );
        let count: i64 = self
            .conn
            .query_row(&sql, params![dataset, variable, year], |r| r.get(0))?;
        Ok(count > 0)
    }

    fn list_all_datasets(&self) -> Result<Table> {
        self.dump(&self.table("dataset_table"))
    }
}

fn ensure_exists(path: &Path) -> Result<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(CensusError::Config(format!(
            "catalog file `{}` does not exist",
            path.display()
        )))
    }
}

fn load_sqlite_extension(conn: &Connection) -> Result<()> {
    conn.execute_batch("SET autoinstall_known_extensions = false; LOAD sqlite;")
        .map_err(|e| {
            CensusError::Config(format!(
                "duckdb sqlite extension is not available ({e}); \
                 run `INSTALL sqlite;` in duckdb or use catalog_format: duckdb"
            ))
        })
}

fn to_json(v: DuckValue) -> Value {
    match v {
        DuckValue::Null => Value::Null,
        DuckValue::Boolean(b) => Value::Bool(b),
        DuckValue::TinyInt(n) => n.into(),
        DuckValue::SmallInt(n) => n.into(),
        DuckValue::Int(n) => n.into(),
        DuckValue::BigInt(n) => n.into(),
        DuckValue::UTinyInt(n) => n.into(),
        DuckValue::USmallInt(n) => n.into(),
        DuckValue::UInt(n) => n.into(),
        DuckValue::UBigInt(n) => n.into(),
        DuckValue::HugeInt(n) => Value::String(n.to_string()),
        DuckValue::Float(f) => Number::from_f64(f as f64).map_or(Value::Null, Value::Number),
        DuckValue::Double(f) => Number::from_f64(f).map_or(Value::Null, Value::Number),
        DuckValue::UHugeInt(n) => Value::String(n.to_string()),
        DuckValue::Decimal(d) => Value::String(d.to_string()),
        DuckValue::Text(s) | DuckValue::Enum(s) => Value::String(s),
        DuckValue::Date32(days) => DateTime::from_timestamp(i64::from(days) * 86_400, 0)
            .map_or(Value::Null, |dt| Value::String(dt.date_naive().to_string())),
        DuckValue::Timestamp(unit, v) => DateTime::from_timestamp_micros(unit.to_micros(v))
            .map_or(Value::Null, |dt| {
                Value::String(dt.naive_utc().format("%Y-%m-%dT%H:%M:%S%.f").to_string())
            }),
        DuckValue::Time64(unit, v) => {
            let micros = unit.to_micros(v);
            NaiveTime::from_num_seconds_from_midnight_opt(
                u32::try_from(micros.div_euclid(1_000_000)).unwrap_or(u32::MAX),
                u32::try_from(micros.rem_euclid(1_000_000) * 1_000).unwrap_or(0),
            )
            .map_or(Value::Null, |t| Value::String(t.format("%H:%M:%S%.f").to_string()))
        }
        DuckValue::Interval {
            months,
            days,
            nanos,
        } => Value::String(format!(
            "P{months}M{days}DT{}S",
            nanos as f64 / 1_000_000_000.0
        )),
        DuckValue::List(items) | DuckValue::Array(items) => {
            Value::Array(items.into_iter().map(to_json).collect())
        }
        DuckValue::Struct(fields) => Value::Object(
            fields
                .iter()
                .map(|(k, v)| (k.clone(), to_json(v.clone())))
                .collect(),
        ),
        DuckValue::Union(inner) => to_json(*inner),
        // binary columns have no JSON text form
        DuckValue::Blob(_) => Value::Null,
        other => {
            debug!(value = ?other, "no JSON mapping for catalog value");
            Value::Null
        }
    }
}

#[cfg(test)]
pub(crate) fn test_catalog() -> Catalog {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch(
        "CREATE TABLE dataset_table (id INTEGER, dataset VARCHAR, url VARCHAR, title VARCHAR);
         CREATE TABLE variable_table (id INTEGER, dataset VARCHAR, variable VARCHAR, year INTEGER);
         CREATE TABLE geo_table (id INTEGER, name VARCHAR, url VARCHAR);
         INSERT INTO dataset_table VALUES
            (1, 'acs/acs1', 'acs/acs1pr/', 'ACS 1-Year PUMS Puerto Rico'),
            (2, 'dec/pl', 'dec/pl/', 'Decennial Redistricting'),
            (3, 'dec/empty', 'dec/empty/', 'No variables yet'),
            (4, 'dec/pl', 'dec/pl/', 'Decennial Redistricting (dup)');
         INSERT INTO variable_table VALUES
            (1, 'acs/acs1', 'AGEP', 2019),
            (2, 'acs/acs1', 'PWGTP', 2019),
            (3, 'acs/acs1', 'AGEP', 2021),
            (4, 'dec/pl', 'P1_001N', 2020),
            (5, 'acs/acs1', 'AGEP', 2019);
         INSERT INTO geo_table VALUES
            (1, 'state', 'https://www2.census.gov/geo/tiger/TIGER2023/STATE/tl_2023_us_state.zip');",
    )
    .unwrap();
    Catalog::from_connection(conn, "main")
}
