//! Mirroring of record attachments to local storage.
//!
//! A thin file-I/O collaborator: it downloads the KML attachment and the
//! zipped shapefile archive referenced by a land-plot record, extracts the
//! archive, and keeps the core engine free of filesystem concerns.

use std::{
    fs::{self, File},
    io,
    path::{Path, PathBuf},
};

use thiserror::Error;

use verdant_core::{AdapterError, Value};

use crate::airtable::{TableStore, TransportError};

/// Errors produced while mirroring attachments.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AttachmentError {
    /// Downloading the attachment body failed.
    #[error("failed to download attachment {url}: {source}")]
    Download {
        /// Attachment URL.
        url: String,
        /// Transport failure.
        source: TransportError,
    },
    /// A filesystem operation failed.
    #[error("failed to prepare {path:?}: {source}")]
    Io {
        /// Offending path.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },
}

impl From<AttachmentError> for AdapterError {
    fn from(error: AttachmentError) -> Self {
        Self::Attachment {
            message: error.to_string(),
        }
    }
}

/// First download URL of an attachment field.
///
/// Attachment fields hold a list of descriptor objects; the original data
/// only ever carries one attachment per field, so the first descriptor wins.
#[must_use]
pub fn attachment_url(value: &Value) -> Option<&str> {
    value
        .as_list()?
        .first()?
        .as_object()?
        .get("url")?
        .as_str()
}

/// Recreate a mirror directory from scratch.
///
/// Stale files from a previous run must not survive: the directory is
/// removed when present and recreated empty.
pub fn reset_dir(dir: &Path) -> Result<(), AttachmentError> {
    if dir.exists() {
        fs::remove_dir_all(dir).map_err(|source| AttachmentError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }
    fs::create_dir_all(dir).map_err(|source| AttachmentError::Io {
        path: dir.to_path_buf(),
        source,
    })
}

/// Mirror a plot's KML attachment to `{dir}/{plot_id}.kml`.
///
/// # Errors
///
/// Returns an error when the download or the file write fails.
pub async fn mirror_kml<S: TableStore + ?Sized>(
    store: &S,
    url: &str,
    dir: &Path,
    plot_id: &str,
) -> Result<PathBuf, AttachmentError> {
    let target = dir.join(format!("{plot_id}.kml"));
    download_to(store, url, &target).await?;
    Ok(target)
}

/// Mirror and extract a plot's zipped shapefile archive under
/// `{dir}/{plot_id}/`.
///
/// A corrupt archive is logged and reported as `Ok(None)`; the caller skips
/// the record, matching the tolerant treatment of write-phase failures. The
/// archive file is deleted after a successful extraction and kept on disk
/// otherwise, for inspection.
///
/// # Errors
///
/// Returns an error when the download or a filesystem operation fails.
pub async fn mirror_shapefile<S: TableStore + ?Sized>(
    store: &S,
    url: &str,
    dir: &Path,
    plot_id: &str,
) -> Result<Option<PathBuf>, AttachmentError> {
    let plot_dir = dir.join(plot_id);
    fs::create_dir_all(&plot_dir).map_err(|source| AttachmentError::Io {
        path: plot_dir.clone(),
        source,
    })?;
    let archive_path = plot_dir.join(format!("{plot_id}.zip"));
    download_to(store, url, &archive_path).await?;

    if let Err(err) = extract_archive(&archive_path, &plot_dir) {
        log::warn!("invalid shapefile archive for plot {plot_id}: {err}");
        return Ok(None);
    }
    fs::remove_file(&archive_path).map_err(|source| AttachmentError::Io {
        path: archive_path,
        source,
    })?;
    Ok(Some(plot_dir))
}

async fn download_to<S: TableStore + ?Sized>(
    store: &S,
    url: &str,
    target: &Path,
) -> Result<(), AttachmentError> {
    let mut file = File::create(target).map_err(|source| AttachmentError::Io {
        path: target.to_path_buf(),
        source,
    })?;
    store
        .download_attachment(url, &mut file)
        .await
        .map_err(|source| AttachmentError::Download {
            url: url.to_owned(),
            source,
        })?;
    Ok(())
}

fn extract_archive(archive_path: &Path, target_dir: &Path) -> Result<(), zip::result::ZipError> {
    let file = File::open(archive_path)?;
    let mut archive = zip::ZipArchive::new(file)?;
    archive.extract(target_dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::airtable::test_support::{StubStore, block_on_for_tests};
    use rstest::{fixture, rstest};
    use std::collections::BTreeMap;
    use std::io::Write as _;
    use tempfile::TempDir;

    #[fixture]
    fn store() -> StubStore {
        StubStore::new()
    }

    fn zipped_shapefile() -> Vec<u8> {
        let mut buffer = Vec::new();
        {
            let mut writer = zip::ZipWriter::new(std::io::Cursor::new(&mut buffer));
            let options = zip::write::FileOptions::default();
            writer
                .start_file("007.shp", options)
                .expect("zip entry should start");
            writer
                .write_all(b"shapefile bytes")
                .expect("zip entry should write");
            writer.finish().expect("zip should finish");
        }
        buffer
    }

    #[rstest]
    fn extracts_attachment_urls_from_descriptors() {
        let descriptor = Value::List(vec![Value::Object(BTreeMap::from([(
            "url".to_owned(),
            Value::Text("https://files.example/plot.kml".to_owned()),
        )]))]);
        assert_eq!(
            attachment_url(&descriptor),
            Some("https://files.example/plot.kml")
        );
        assert!(attachment_url(&Value::Null).is_none());
        assert!(attachment_url(&Value::List(Vec::new())).is_none());
    }

    #[rstest]
    fn reset_dir_discards_previous_contents() {
        let temp = TempDir::new().expect("temp dir should create");
        let dir = temp.path().join("KML");
        fs::create_dir_all(&dir).expect("dir should create");
        fs::write(dir.join("stale.kml"), b"old").expect("stale file should write");

        reset_dir(&dir).expect("reset should succeed");

        assert!(dir.exists());
        assert!(!dir.join("stale.kml").exists());
    }

    #[rstest]
    fn mirrors_kml_to_plot_file(store: StubStore) {
        let temp = TempDir::new().expect("temp dir should create");
        store.set_attachment("https://files.example/a.kml", b"<kml/>".to_vec());

        let path = block_on_for_tests(mirror_kml(
            &store,
            "https://files.example/a.kml",
            temp.path(),
            "007",
        ))
        .expect("mirror should succeed");

        assert_eq!(path, temp.path().join("007.kml"));
        assert_eq!(fs::read(path).expect("file should read"), b"<kml/>");
    }

    #[rstest]
    fn extracts_shapefile_archives_and_removes_zip(store: StubStore) {
        let temp = TempDir::new().expect("temp dir should create");
        store.set_attachment("https://files.example/a.zip", zipped_shapefile());

        let extracted = block_on_for_tests(mirror_shapefile(
            &store,
            "https://files.example/a.zip",
            temp.path(),
            "007",
        ))
        .expect("mirror should succeed");

        let plot_dir = temp.path().join("007");
        assert_eq!(extracted, Some(plot_dir.clone()));
        assert!(plot_dir.join("007.shp").exists());
        assert!(!plot_dir.join("007.zip").exists());
    }

    #[rstest]
    fn corrupt_archives_are_skipped_not_fatal(store: StubStore) {
        let temp = TempDir::new().expect("temp dir should create");
        store.set_attachment("https://files.example/bad.zip", b"not a zip".to_vec());

        let extracted = block_on_for_tests(mirror_shapefile(
            &store,
            "https://files.example/bad.zip",
            temp.path(),
            "008",
        ))
        .expect("mirror should tolerate the corrupt archive");

        assert_eq!(extracted, None);
        assert!(temp.path().join("008").join("008.zip").exists());
    }

    #[rstest]
    fn missing_attachment_is_a_download_error(store: StubStore) {
        let temp = TempDir::new().expect("temp dir should create");

        let outcome = block_on_for_tests(mirror_kml(
            &store,
            "https://files.example/absent.kml",
            temp.path(),
            "009",
        ));

        assert!(matches!(outcome, Err(AttachmentError::Download { .. })));
    }
}
