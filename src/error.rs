use thiserror::Error;

/// Main error type for kelda-fetch
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Manifest error: {0}\n\nTroubleshooting:\n- Check that package.json is valid JSON\n- Dependency versions must be strings, e.g. \"kelda\": \"^0.6.0\"")]
    Manifest(String),

    #[error("Invalid version constraint '{constraint}': {reason}")]
    InvalidConstraint { constraint: String, reason: String },

    #[error("Release index lists invalid version '{version}': {reason}")]
    InvalidVersion { version: String, reason: String },

    #[error("Release index lists version {version} twice: {first} and {second}")]
    DuplicateVersion {
        version: String,
        first: String,
        second: String,
    },

    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("No satisfying version for {constraint}: [{}]", .available.join(", "))]
    NoSatisfyingVersion {
        constraint: String,
        available: Vec<String>,
    },

    #[error("Network error: {0}\n\nTroubleshooting:\n- Check internet connection\n- Verify the release index URL (index_url in config or --index-url)\n- Use an external timeout if the server hangs")]
    Network(String),

    #[error("Extraction error: {0}")]
    Extract(String),

    #[error("Config error: {0}\n\nTroubleshooting:\n- Check config file: ~/.config/kelda-fetch/config.toml\n- Run with RUST_LOG=debug for more details")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FetchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_satisfying_version_lists_available() {
        let err = FetchError::NoSatisfyingVersion {
            constraint: "^2.0.0".to_string(),
            available: vec!["1.0.0".to_string(), "1.2.0".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "No satisfying version for ^2.0.0: [1.0.0, 1.2.0]"
        );
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: FetchError = io.into();
        assert!(matches!(err, FetchError::Io(_)));
    }
}
