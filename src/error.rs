//! Error types for blockreaper

use std::fmt;

/// Result type alias for blockreaper operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for blockreaper
///
/// The scheduling path itself never fails; these cover the ambient edges
/// (configuration, telemetry bootstrap, summary serialization).
#[derive(Debug)]
pub enum Error {
    /// IO errors
    Io(std::io::Error),
    /// Serialization errors
    Serialization(String),
    /// Configuration errors
    Config(String),
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "IO error: {}", e),
            Error::Serialization(msg) => write!(f, "Serialization error: {}", msg),
            Error::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_context() {
        let err = Error::Config("BLOCKREAPER_INVALIDATE_LIMIT must be positive".to_string());
        assert_eq!(
            err.to_string(),
            "Configuration error: BLOCKREAPER_INVALIDATE_LIMIT must be positive"
        );

        let err: Error = serde_json::from_str::<u64>("dn-7").unwrap_err().into();
        assert!(err.to_string().starts_with("Serialization error:"));
    }

    #[test]
    fn test_io_error_has_source() {
        let err: Error = std::io::Error::new(std::io::ErrorKind::Other, "disk gone").into();
        assert!(std::error::Error::source(&err).is_some());
    }
}
