//! Release index scraping
//!
//! The index root serves a plain directory listing whose anchors point at
//! `<version>.tar.gz` archives. A `dev.tar.gz` archive tracks the development
//! branch and is ignored.

use crate::error::{FetchError, Result};
use crate::release::{ReleaseEntry, ReleaseIndex, ARCHIVE_SUFFIX, DEV_VERSION};
use scraper::{Html, Selector};
use semver::Version;
use std::collections::BTreeMap;
use url::Url;

/// Parse an index page into a version → download URL mapping.
///
/// Fails on the first archive whose name is not a valid semantic version and
/// on any version listed twice. Versions that differ only in build metadata
/// have equal precedence and count as the same version. Relative links are
/// resolved against `root`.
pub fn parse_index(html: &str, root: &Url) -> Result<ReleaseIndex> {
    let document = Html::parse_document(html);
    let anchors = Selector::parse("a[href]").map_err(|e| {
        FetchError::Config(format!("Failed to build anchor selector: {e}"))
    })?;

    let mut seen: BTreeMap<Version, Url> = BTreeMap::new();

    for href in document
        .select(&anchors)
        .filter_map(|a| a.value().attr("href"))
    {
        let Some(candidate) = version_candidate(href) else {
            continue;
        };

        if candidate == DEV_VERSION {
            tracing::debug!("Skipping development archive {href}");
            continue;
        }

        let version = parse_version(candidate)?;

        let url = root.join(href).map_err(|e| FetchError::InvalidUrl {
            url: href.to_string(),
            reason: e.to_string(),
        })?;

        if let Some((listed, previous)) = seen
            .iter()
            .find(|(listed, _)| listed.cmp_precedence(&version).is_eq())
        {
            return Err(FetchError::DuplicateVersion {
                version: if *listed == version {
                    version.to_string()
                } else {
                    format!("{listed} / {version}")
                },
                first: previous.to_string(),
                second: url.to_string(),
            });
        }

        tracing::debug!("Found release {version} at {url}");
        seen.insert(version, url);
    }

    Ok(seen
        .into_iter()
        .map(|(version, url)| ReleaseEntry { version, url })
        .collect())
}

/// Parse an archive version, accepting the `v1.2.3` and `=1.2.3` spellings
fn parse_version(candidate: &str) -> Result<Version> {
    let trimmed = candidate.trim();
    let normalized = trimmed
        .strip_prefix(['v', '='])
        .unwrap_or(trimmed)
        .trim_start();

    Version::parse(normalized).map_err(|e| FetchError::InvalidVersion {
        version: candidate.to_string(),
        reason: e.to_string(),
    })
}

/// Version string encoded in an archive link, or `None` if the link is not an archive
fn version_candidate(href: &str) -> Option<&str> {
    let path = href.split(['?', '#']).next().unwrap_or(href);
    let file_name = path.rsplit('/').next().unwrap_or(path);
    file_name.strip_suffix(ARCHIVE_SUFFIX)
}

/// Download the index page at `root` and parse it
pub async fn fetch_index(client: &reqwest::Client, root: &Url) -> Result<ReleaseIndex> {
    tracing::info!("Fetching release index from {root}");

    let response = client
        .get(root.clone())
        .send()
        .await
        .map_err(|e| FetchError::Network(format!("Failed to fetch {root}: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Network(format!(
            "Release index {root} returned {status}"
        )));
    }

    let body = response
        .text()
        .await
        .map_err(|e| FetchError::Network(format!("Failed to read {root}: {e}")))?;

    let index = parse_index(&body, root)?;
    tracing::info!("Release index lists {} versions", index.len());
    Ok(index)
}
