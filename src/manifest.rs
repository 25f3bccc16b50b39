use crate::error::{FetchError, Result};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

/// The parts of `package.json` kelda-fetch cares about
#[derive(Debug, Clone, Deserialize, Default)]
pub struct PackageManifest {
    #[serde(default)]
    pub dependencies: Option<BTreeMap<String, Value>>,
}

/// Result of looking up the release constraint in the manifest
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConstraintLookup {
    Required(String),
    MissingManifest,
    NoDependencies,
    NotRequired,
}

impl ConstraintLookup {
    /// Human readable "nothing to do" reason, `None` when a constraint was found
    #[must_use]
    pub fn skip_reason(&self, manifest_name: &str, dependency: &str) -> Option<String> {
        match self {
            Self::Required(_) => None,
            Self::MissingManifest => Some(format!("{manifest_name} not found. Nothing to do.")),
            Self::NoDependencies => {
                Some(format!("{manifest_name} has no dependencies. Nothing to do."))
            }
            Self::NotRequired => Some(format!(
                "{manifest_name} does not require {dependency}. Nothing to do."
            )),
        }
    }
}

impl PackageManifest {
    /// Parse manifest text
    pub fn parse(content: &str) -> Result<Self> {
        serde_json::from_str(content)
            .map_err(|e| FetchError::Manifest(format!("Failed to parse manifest: {e}")))
    }

    /// Version constraint declared for `dependency`
    pub fn constraint_for(&self, dependency: &str) -> Result<ConstraintLookup> {
        let Some(dependencies) = &self.dependencies else {
            return Ok(ConstraintLookup::NoDependencies);
        };

        match dependencies.get(dependency) {
            None => Ok(ConstraintLookup::NotRequired),
            Some(Value::String(constraint)) => Ok(ConstraintLookup::Required(constraint.clone())),
            Some(other) => Err(FetchError::Manifest(format!(
                "dependency '{dependency}' must map to a version string, found {other}"
            ))),
        }
    }
}

/// Read the manifest at `path` once and look up `dependency`.
///
/// A missing file is not an error; an unreadable or malformed one is.
pub fn read_constraint(path: &Path, dependency: &str) -> Result<ConstraintLookup> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            tracing::debug!("No manifest at {}", path.display());
            return Ok(ConstraintLookup::MissingManifest);
        }
        Err(e) => {
            return Err(FetchError::Manifest(format!(
                "Failed to read {}: {e}",
                path.display()
            )))
        }
    };

    PackageManifest::parse(&content)?.constraint_for(dependency)
}
