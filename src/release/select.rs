use crate::error::{FetchError, Result};
use crate::release::{ReleaseEntry, ReleaseIndex};
use semver::{Version, VersionReq};
use std::fmt;
use std::str::FromStr;

/// A version range as written in `package.json`.
///
/// Accepts npm range syntax and translates it to one `VersionReq` per `||`
/// alternative:
/// - `>=1.0.0 <2.0.0` (space separated comparators)
/// - `1.0.0 - 1.4.0` (hyphen ranges, inclusive)
/// - `1.2.0` (bare version, exact match) and `1.2` (any 1.2.x)
/// - `*`, `latest` or empty (any release)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionConstraint {
    raw: String,
    alternatives: Vec<VersionReq>,
}

impl VersionConstraint {
    pub fn parse(raw: &str) -> Result<Self> {
        let invalid = |reason: String| FetchError::InvalidConstraint {
            constraint: raw.to_string(),
            reason,
        };

        let alternatives = raw
            .split("||")
            .map(|alt| {
                let translated = translate_range(alt.trim()).map_err(&invalid)?;
                tracing::debug!("Constraint '{}' -> '{translated}'", alt.trim());
                VersionReq::parse(&translated).map_err(|e| invalid(e.to_string()))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            raw: raw.to_string(),
            alternatives,
        })
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    #[must_use]
    pub fn matches(&self, version: &Version) -> bool {
        self.alternatives.iter().any(|req| req.matches(version))
    }
}

impl FromStr for VersionConstraint {
    type Err = FetchError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Rewrite one npm comparator set into `semver` crate syntax
fn translate_range(range: &str) -> std::result::Result<String, String> {
    if range.is_empty() || range == "latest" {
        return Ok("*".to_string());
    }

    let tokens: Vec<&str> = range.split_whitespace().collect();

    if let Some(dash) = tokens.iter().position(|t| *t == "-") {
        if dash != 1 || tokens.len() != 3 {
            return Err(format!("malformed hyphen range '{range}'"));
        }
        return Ok(format!(
            ">={}, <={}",
            strip_v(tokens[0]),
            strip_v(tokens[2])
        ));
    }

    let mut comparators = Vec::with_capacity(tokens.len());
    let mut pending_op: Option<&str> = None;

    for token in tokens {
        if is_operator(token) {
            if pending_op.replace(token).is_some() {
                return Err(format!("operator without version in '{range}'"));
            }
            continue;
        }

        let comparator = match pending_op.take() {
            // ">= 1.2.0" is the same as ">=1.2.0"
            Some(op) => format!("{op}{}", strip_v(token)),
            None => bare_comparator(token),
        };
        comparators.push(comparator);
    }

    if pending_op.is_some() {
        return Err(format!("operator without version in '{range}'"));
    }

    Ok(comparators.join(", "))
}

const OPERATORS: [&str; 7] = [">=", "<=", "=", ">", "<", "~", "^"];

fn is_operator(token: &str) -> bool {
    OPERATORS.contains(&token)
}

/// Split a leading operator off a token, so `>=v1.2.0` becomes `(">=", "v1.2.0")`
fn split_operator(token: &str) -> Option<(&str, &str)> {
    OPERATORS
        .iter()
        .find_map(|op| token.strip_prefix(op).map(|rest| (*op, rest)))
}

fn strip_v(token: &str) -> &str {
    token
        .strip_prefix('v')
        .filter(|rest| rest.starts_with(|c: char| c.is_ascii_digit()))
        .unwrap_or(token)
}

/// A comparator with no operator: full versions match exactly, partial ones
/// match the whole minor or major line
fn bare_comparator(token: &str) -> String {
    if let Some((op, rest)) = split_operator(token) {
        return format!("{op}{}", strip_v(rest));
    }

    let version = strip_v(token);
    if !version.starts_with(|c: char| c.is_ascii_digit()) {
        return token.to_string();
    }

    if Version::parse(version).is_ok() {
        return format!("={version}");
    }

    let numeric_parts = version.split('.').collect::<Vec<_>>();
    if numeric_parts.len() < 3
        && numeric_parts
            .iter()
            .all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()))
    {
        return format!("{version}.*");
    }

    version.to_string()
}

/// Pick the highest version in `index` satisfying `constraint`
pub fn select_best(index: &ReleaseIndex, constraint: &VersionConstraint) -> Result<ReleaseEntry> {
    index
        .iter()
        .rev()
        .find(|entry| constraint.matches(&entry.version))
        .ok_or_else(|| FetchError::NoSatisfyingVersion {
            constraint: constraint.to_string(),
            available: index.versions().map(ToString::to_string).collect(),
        })
}
