//! Release archive download and extraction
//!
//! The response body is streamed straight into the gzip/tar reader on a
//! blocking worker. The wanted member is staged in a temp file next to its
//! final location and only renamed into place once the whole archive has been
//! read without error.

use crate::error::{FetchError, Result};
use flate2::read::GzDecoder;
use futures_util::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use std::error::Error as StdError;
use std::fmt;
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};
use tar::Archive;
use tempfile::NamedTempFile;
use tokio_util::io::{StreamReader, SyncIoBridge};
use url::Url;

/// The binary left in place after a successful install
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledArtifact {
    pub path: PathBuf,
    pub size_bytes: u64,
}

/// A failure of the download itself, carried through the archive readers as
/// the payload of an `io::Error`
#[derive(Debug)]
struct TransportError(Box<dyn StdError + Send + Sync>);

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl StdError for TransportError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(&*self.0)
    }
}

/// Classify a read failure: transport errors stay network errors, anything
/// else is a problem with the archive contents
fn read_error(context: &str, e: io::Error) -> FetchError {
    let mut cause = e.get_ref().map(|inner| inner as &(dyn StdError + 'static));
    while let Some(err) = cause {
        if let Some(transport) = err.downcast_ref::<TransportError>() {
            return FetchError::Network(format!("Download interrupted: {transport}"));
        }
        cause = match err.downcast_ref::<io::Error>() {
            Some(io_err) => io_err.get_ref().map(|inner| inner as &(dyn StdError + 'static)),
            None => err.source(),
        };
    }
    FetchError::Extract(format!("{context}: {e}"))
}

/// Download the archive at `url` and install `member` as `install_dir/install_name`.
///
/// `member` includes the archive's top-level directory (`kelda/kelda_linux`),
/// which is stripped from every entry before matching.
pub async fn fetch_and_install(
    client: &reqwest::Client,
    url: &Url,
    member: &str,
    install_dir: &Path,
    install_name: &str,
) -> Result<InstalledArtifact> {
    println!("Downloading {url}");

    let response = client
        .get(url.clone())
        .send()
        .await
        .map_err(|e| FetchError::Network(format!("Failed to download {url}: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Network(format!("{url} returned {status}")));
    }

    let progress = download_progress(response.content_length());
    let counter = progress.clone();
    let body = response.bytes_stream().map(move |chunk| {
        chunk
            .inspect(|bytes| counter.inc(bytes.len() as u64))
            .map_err(|e| io::Error::other(TransportError(Box::new(e))))
    });
    let reader = SyncIoBridge::new(StreamReader::new(Box::pin(body)));

    let member = member.to_string();
    let install_dir = install_dir.to_path_buf();
    let install_name = install_name.to_string();

    let result = tokio::task::spawn_blocking(move || {
        extract_member(reader, &member, &install_dir, &install_name)
    })
    .await
    .map_err(|e| FetchError::Extract(format!("Extraction task failed: {e}")))?;

    progress.finish_and_clear();

    let installed = result?;
    tracing::info!(
        "Installed {} ({})",
        installed.path.display(),
        format_bytes(installed.size_bytes)
    );
    Ok(installed)
}

/// Extract `member` from a gzip'd tarball read from `reader`.
///
/// Reads the archive to the end before installing so a corrupt tail fails
/// the whole extraction. On error nothing is written at the install path.
pub fn extract_member<R: Read>(
    reader: R,
    member: &str,
    install_dir: &Path,
    install_name: &str,
) -> Result<InstalledArtifact> {
    let wanted = strip_first_component(Path::new(member))?.ok_or_else(|| {
        FetchError::Extract(format!(
            "Archive member '{member}' has no path below the top-level directory"
        ))
    })?;

    let mut archive = Archive::new(GzDecoder::new(reader));
    let mut staged: Option<(NamedTempFile, u64)> = None;

    let entries = archive
        .entries()
        .map_err(|e| read_error("Failed to read archive", e))?;

    for entry in entries {
        let mut entry = entry
            .map_err(|e| read_error("Failed to read archive entry", e))?;

        let path = entry
            .path()
            .map_err(|e| FetchError::Extract(format!("Invalid path in archive: {e}")))?
            .into_owned();

        let Some(stripped) = strip_first_component(&path)? else {
            continue;
        };
        if stripped != wanted {
            continue;
        }

        if !entry.header().entry_type().is_file() {
            return Err(FetchError::Extract(format!(
                "{} in archive is not a regular file",
                path.display()
            )));
        }

        let mut file = tempfile::Builder::new()
            .prefix(&format!(".{install_name}."))
            .tempfile_in(install_dir)
            .map_err(|e| {
                FetchError::Extract(format!(
                    "Failed to create temp file in {}: {e}",
                    install_dir.display()
                ))
            })?;

        let size = io::copy(&mut entry, file.as_file_mut())
            .map_err(|e| read_error(&format!("Failed to extract {}", path.display()), e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = entry.header().mode().unwrap_or(0o755) & 0o7777;
            std::fs::set_permissions(file.path(), std::fs::Permissions::from_mode(mode))?;
        }

        tracing::debug!("Staged {} ({size} bytes) at {}", path.display(), file.path().display());
        if staged.replace((file, size)).is_some() {
            tracing::warn!("Archive contains {} more than once, keeping the last copy", path.display());
        }
    }

    // Tar stops at the end-of-archive marker; drain the rest so the gzip
    // checksum and the end of the download are verified too.
    io::copy(&mut archive.into_inner(), &mut io::sink())
        .map_err(|e| read_error("Failed to read archive", e))?;

    let (file, size_bytes) = staged
        .ok_or_else(|| FetchError::Extract(format!("Archive does not contain {member}")))?;

    let path = install_dir.join(install_name);
    file.persist(&path).map_err(|e| {
        FetchError::Extract(format!("Failed to install {}: {}", path.display(), e.error))
    })?;

    Ok(InstalledArtifact { path, size_bytes })
}

/// Drop the archive's top-level directory from `path`.
///
/// Returns `None` for the top-level directory itself and rejects paths that
/// could escape the install directory.
fn strip_first_component(path: &Path) -> Result<Option<PathBuf>> {
    let mut parts = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::Normal(part) => parts.push(part),
            _ => {
                return Err(FetchError::Extract(format!(
                    "Unsafe path in archive: {}",
                    path.display()
                )))
            }
        }
    }

    if parts.len() < 2 {
        return Ok(None);
    }
    Ok(Some(parts[1..].iter().collect()))
}

fn download_progress(total: Option<u64>) -> ProgressBar {
    let Some(total) = total else {
        return ProgressBar::hidden();
    };

    let style = ProgressStyle::with_template(
        "{spinner} [{bar:40}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})",
    )
    .map(|s| s.progress_chars("=> "))
    .unwrap_or_else(|_| ProgressStyle::default_bar());

    ProgressBar::new(total).with_style(style)
}

/// Format bytes as human-readable string
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;

    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}
