pub mod archive;
pub mod index;
pub mod select;

use semver::Version;
use std::collections::BTreeMap;
use url::Url;

pub use archive::{fetch_and_install, InstalledArtifact};
pub use index::{fetch_index, parse_index};
pub use select::{select_best, VersionConstraint};

/// Suffix every release archive carries
pub const ARCHIVE_SUFFIX: &str = ".tar.gz";

/// Version that tracks the development branch rather than a release
pub const DEV_VERSION: &str = "dev";

/// A release version and where to download it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseEntry {
    pub version: Version,
    pub url: Url,
}

/// Available releases keyed by version
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReleaseIndex {
    entries: BTreeMap<Version, Url>,
}

impl ReleaseIndex {
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn get(&self, version: &Version) -> Option<&Url> {
        self.entries.get(version)
    }

    /// Versions in ascending order
    pub fn versions(&self) -> impl DoubleEndedIterator<Item = &Version> {
        self.entries.keys()
    }

    /// Entries in ascending version order
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = ReleaseEntry> + '_ {
        self.entries.iter().map(|(version, url)| ReleaseEntry {
            version: version.clone(),
            url: url.clone(),
        })
    }
}

impl FromIterator<ReleaseEntry> for ReleaseIndex {
    /// Later entries replace earlier ones with the same version; the parser
    /// rejects duplicates before getting here
    fn from_iter<T: IntoIterator<Item = ReleaseEntry>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().map(|e| (e.version, e.url)).collect(),
        }
    }
}
