// src/geo.rs

use reqwest::Client;
use std::{
    ffi::OsStr,
    fs,
    io::{self, Cursor},
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument};
use zip::ZipArchive;

use crate::error::{CensusError, Result, TransportError};
use crate::fetch::RetryPolicy;

/// Downloads geography archives once and serves them from disk afterwards.
pub struct GeoPuller {
    client: Client,
    dir: PathBuf,
    retry: RetryPolicy,
}

impl GeoPuller {
    pub fn new(client: Client, dir: impl Into<PathBuf>, retry: RetryPolicy) -> Self {
        Self {
            client,
            dir: dir.into(),
            retry,
        }
    }

    /// Location `name` is (or will be) extracted to.
    pub fn cached_path(&self, name: &str) -> Result<PathBuf> {
        if name.is_empty() || Path::new(name).file_name() != Some(OsStr::new(name)) {
            return Err(CensusError::Config(format!(
                "geography name `{name}` must be a plain file name"
            )));
        }
        Ok(self.dir.join(name))
    }

    /// Return the extracted directory for `name`, downloading `url` first
    /// when nothing is cached yet.
    #[instrument(level = "info", skip(self))]
    pub async fn pull(&self, url: &str, name: &str) -> Result<PathBuf> {
        let target = self.cached_path(name)?;
        if target.exists() {
            debug!(path = %target.display(), "cache hit");
            return Ok(target);
        }

        let bytes = self
            .retry
            .run(url, |_| download(&self.client, url))
            .await?;
        info!(bytes = bytes.len(), "downloaded archive");

        let dir = self.dir.clone();
        let dest = target.clone();
        tokio::task::spawn_blocking(move || unpack_archive(&bytes, &dir, &dest))
            .await
            .map_err(io::Error::other)??;
        info!(path = %target.display(), "extracted");
        Ok(target)
    }
}

async fn download(client: &Client, url: &str) -> std::result::Result<Vec<u8>, TransportError> {
    let resp = client.get(url).send().await?;
    let status = resp.status();
    if !status.is_success() {
        return Err(TransportError::Status {
            status: status.as_u16(),
            body: String::new(),
        });
    }
    Ok(resp.bytes().await?.to_vec())
}

/// Extract a zip held in memory into `target`, going through a scratch
/// directory inside `dir` so a half-written extraction is never visible.
pub fn unpack_archive(bytes: &[u8], dir: &Path, target: &Path) -> Result<()> {
    fs::create_dir_all(dir)?;
    let scratch = tempfile::Builder::new().prefix(".geo-").tempdir_in(dir)?;
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    archive.extract(scratch.path())?;
    fs::rename(scratch.path(), target)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;
    use tempfile::tempdir;
    use zip::write::SimpleFileOptions;

    fn shapefile_zip() -> Vec<u8> {
        let mut w = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, body) in [
            ("tl_2023_us_state.shp", b"shp".as_slice()),
            ("tl_2023_us_state.dbf", b"dbf".as_slice()),
        ] {
            w.start_file(name, SimpleFileOptions::default()).unwrap();
            w.write_all(body).unwrap();
        }
        w.finish().unwrap().into_inner()
    }

    fn puller(dir: &Path) -> GeoPuller {
        GeoPuller::new(
            Client::new(),
            dir,
            RetryPolicy::new(1, crate::fetch::Backoff::Fixed(Duration::ZERO)),
        )
    }

    #[test]
    fn unpacks_into_target() {
        let tmp = tempdir().unwrap();
        let target = tmp.path().join("states");
        unpack_archive(&shapefile_zip(), tmp.path(), &target).unwrap();
        assert_eq!(fs::read(target.join("tl_2023_us_state.shp")).unwrap(), b"shp");
        assert!(target.join("tl_2023_us_state.dbf").is_file());
        // scratch dir is gone
        let leftovers = fs::read_dir(tmp.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(".geo-"))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn garbage_is_an_archive_error() {
        let tmp = tempdir().unwrap();
        let res = unpack_archive(b"not a zip", tmp.path(), &tmp.path().join("x"));
        assert!(matches!(res, Err(CensusError::Archive(_))));
        assert!(!tmp.path().join("x").exists());
    }

    #[tokio::test]
    async fn cached_pull_skips_network() {
        let tmp = tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("states")).unwrap();
        // nothing listens here; a request would fail
        let path = puller(tmp.path())
            .pull("http://127.0.0.1:9/never.zip", "states")
            .await
            .unwrap();
        assert_eq!(path, tmp.path().join("states"));
    }

    #[test]
    fn rejects_names_with_separators() {
        let tmp = tempdir().unwrap();
        let p = puller(tmp.path());
        assert!(p.cached_path("../escape").is_err());
        assert!(p.cached_path("a/b").is_err());
        assert!(p.cached_path("").is_err());
        assert_eq!(p.cached_path("states").unwrap(), tmp.path().join("states"));
    }
}
