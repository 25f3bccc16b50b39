use crate::error::{FetchError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use url::Url;

/// Main configuration structure
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq, Default)]
pub struct Config {
    #[serde(default)]
    pub release: ReleaseConfig,
    #[serde(default)]
    pub manifest: ManifestConfig,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct ReleaseConfig {
    /// Root page listing `<version>.tar.gz` archives
    #[serde(default = "default_index_url")]
    pub index_url: String,
    /// Path of the binary inside the archive, including the top-level directory
    #[serde(default = "default_archive_member")]
    pub archive_member: String,
    /// File name the binary is installed under
    #[serde(default = "default_install_name")]
    pub install_name: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct ManifestConfig {
    #[serde(default = "default_manifest_path")]
    pub path: PathBuf,
    /// Dependency whose constraint selects the release
    #[serde(default = "default_dependency")]
    pub dependency: String,
}

// Default value functions
fn default_index_url() -> String {
    "http://jenkins.kelda.io".to_string()
}
fn default_archive_member() -> String {
    "kelda/kelda_linux".to_string()
}
fn default_install_name() -> String {
    "kelda".to_string()
}
fn default_manifest_path() -> PathBuf {
    PathBuf::from("package.json")
}
fn default_dependency() -> String {
    "kelda".to_string()
}

impl Default for ReleaseConfig {
    fn default() -> Self {
        Self {
            index_url: default_index_url(),
            archive_member: default_archive_member(),
            install_name: default_install_name(),
        }
    }
}

impl Default for ManifestConfig {
    fn default() -> Self {
        Self {
            path: default_manifest_path(),
            dependency: default_dependency(),
        }
    }
}

impl Config {
    /// Load from the user config file, falling back to defaults if it doesn't exist
    pub fn load() -> Result<Self> {
        match default_config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Load from an explicit file. A missing file is an error here.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            FetchError::Config(format!("Failed to read {}: {e}", path.display()))
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| {
            FetchError::Config(format!("Failed to parse {}: {e}", path.display()))
        })?;

        tracing::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Check values that serde can't
    pub fn validate(&self) -> Result<()> {
        Url::parse(&self.release.index_url).map_err(|e| {
            FetchError::Config(format!(
                "index_url '{}' is not a valid URL: {e}",
                self.release.index_url
            ))
        })?;

        let name = &self.release.install_name;
        if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
            return Err(FetchError::Config(format!(
                "install_name '{name}' must be a plain file name"
            )));
        }

        let member_parts = self
            .release
            .archive_member
            .split('/')
            .filter(|p| !p.is_empty())
            .count();
        if member_parts < 2 {
            return Err(FetchError::Config(format!(
                "archive_member '{}' must include the archive's top-level directory, e.g. kelda/kelda_linux",
                self.release.archive_member
            )));
        }

        if self.manifest.dependency.is_empty() {
            return Err(FetchError::Config(
                "manifest dependency name must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}

/// `$XDG_CONFIG_HOME/kelda-fetch/config.toml`
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("kelda-fetch").join("config.toml"))
}
