//! Release installation pipeline
//!
//! `ReadConstraint -> FetchIndex -> SelectVersion -> Install`. Each stage
//! returns early on error; a manifest that doesn't ask for the release ends
//! the run before any network access.

use crate::config::Config;
use crate::error::{FetchError, Result};
use crate::manifest::{read_constraint, ConstraintLookup};
use crate::release::{
    fetch_and_install, fetch_index, select_best, ReleaseEntry, ReleaseIndex, VersionConstraint,
};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

/// Pipeline stage, used to label progress and failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    ReadConstraint,
    FetchIndex,
    SelectVersion,
    Install,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ReadConstraint => "read constraint",
            Self::FetchIndex => "fetch index",
            Self::SelectVersion => "select version",
            Self::Install => "install",
        };
        f.write_str(name)
    }
}

/// How a run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    NothingToDo(String),
    Resolved(ReleaseEntry),
    Installed {
        release: ReleaseEntry,
        path: PathBuf,
    },
}

/// Error tagged with the stage it came from
#[derive(Error, Debug)]
#[error("{stage} failed: {source}")]
pub struct StageError {
    pub stage: Stage,
    pub source: FetchError,
}

trait AtStage<T> {
    fn at(self, stage: Stage) -> std::result::Result<T, StageError>;
}

impl<T> AtStage<T> for Result<T> {
    fn at(self, stage: Stage) -> std::result::Result<T, StageError> {
        self.map_err(|source| {
            tracing::debug!("{stage} failed: {source:?}");
            StageError { stage, source }
        })
    }
}

/// Drives a single install run
pub struct Installer {
    config: Config,
    index_url: Url,
    install_dir: PathBuf,
    client: reqwest::Client,
}

impl Installer {
    /// Create installer from config, installing into `install_dir`
    pub fn new(config: Config, install_dir: impl Into<PathBuf>) -> Result<Self> {
        config.validate()?;

        let index_url = Url::parse(&config.release.index_url).map_err(|e| {
            FetchError::InvalidUrl {
                url: config.release.index_url.clone(),
                reason: e.to_string(),
            }
        })?;

        let client = reqwest::Client::builder()
            .user_agent(concat!("kelda-fetch/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::Network(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            config,
            index_url,
            install_dir: install_dir.into(),
            client,
        })
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub fn install_dir(&self) -> &Path {
        &self.install_dir
    }

    /// Full pipeline: resolve the constraint and install the selected release
    pub async fn run(&self) -> std::result::Result<Outcome, StageError> {
        let release = match self.resolve().await? {
            Outcome::Resolved(release) => release,
            other => return Ok(other),
        };

        tracing::info!("Installing {} from {}", release.version, release.url);
        let installed = fetch_and_install(
            &self.client,
            &release.url,
            &self.config.release.archive_member,
            &self.install_dir,
            &self.config.release.install_name,
        )
        .await
        .at(Stage::Install)?;

        Ok(Outcome::Installed {
            release,
            path: installed.path,
        })
    }

    /// Everything up to selecting a release, without downloading it
    pub async fn resolve(&self) -> std::result::Result<Outcome, StageError> {
        let manifest = self.manifest_path();
        let dependency = &self.config.manifest.dependency;

        let constraint = match read_constraint(&manifest, dependency).at(Stage::ReadConstraint)? {
            ConstraintLookup::Required(raw) => {
                tracing::info!("{} requires {dependency} {raw}", manifest.display());
                VersionConstraint::parse(&raw).at(Stage::ReadConstraint)?
            }
            lookup => {
                let name = manifest
                    .file_name()
                    .map_or_else(|| "manifest".into(), |n| n.to_string_lossy());
                let reason = lookup
                    .skip_reason(&name, dependency)
                    .unwrap_or_else(|| "Nothing to do.".to_string());
                return Ok(Outcome::NothingToDo(reason));
            }
        };

        let index = self.available().await?;

        let release = select_best(&index, &constraint).at(Stage::SelectVersion)?;
        tracing::info!("Selected {} for {constraint}", release.version);
        Ok(Outcome::Resolved(release))
    }

    /// Fetch and parse the release index
    pub async fn available(&self) -> std::result::Result<ReleaseIndex, StageError> {
        fetch_index(&self.client, &self.index_url)
            .await
            .at(Stage::FetchIndex)
    }

    /// Relative manifest paths are taken from the install directory
    fn manifest_path(&self) -> PathBuf {
        let path = &self.config.manifest.path;
        if path.is_absolute() {
            path.clone()
        } else {
            self.install_dir.join(path)
        }
    }
}
