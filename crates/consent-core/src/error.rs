//! Error types for the consent engine.

/// Consent engine errors.
#[derive(Debug, thiserror::Error)]
pub enum ConsentError {
    /// Configuration source, field registry or grant storage could not be reached.
    #[error("source unavailable: {source_name} - {message}")]
    SourceUnavailable {
        source_name: &'static str,
        message: String,
    },

    /// A single consent definition or grant entry could not be decoded.
    #[error("malformed record {id}: {reason}")]
    MalformedRecord { id: String, reason: String },

    /// Consent id is not part of the catalog.
    #[error("unknown consent id: {id}")]
    UnknownConsent { id: String },

    /// Subject has no record in grant storage.
    #[error("unknown subject: {subject}")]
    UnknownSubject { subject: String },

    /// Writing a subject's grants failed.
    #[error("could not persist grants for {subject}: {message}")]
    Persistence { subject: String, message: String },

    /// Configuration error.
    #[error("configuration error: {message}")]
    Config { message: String },

    /// Filesystem error from a file-backed collaborator.
    #[error("io error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl ConsentError {
    /// Exit code for CLI: 1 for rejections, 2 for anything that stops the engine.
    pub fn exit_code(&self) -> i32 {
        match self {
            // Rejections
            Self::UnknownConsent { .. } => 1,
            Self::UnknownSubject { .. } => 1,

            // Config issues and collaborator failures
            Self::Config { .. } => 2,
            Self::SourceUnavailable { .. } => 2,
            Self::Io { .. } => 2,
            Self::MalformedRecord { .. } => 2,
            Self::Persistence { .. } => 2,
        }
    }

    /// Shorthand for a [`ConsentError::SourceUnavailable`].
    pub fn unavailable(source_name: &'static str, message: impl Into<String>) -> Self {
        Self::SourceUnavailable {
            source_name,
            message: message.into(),
        }
    }

    pub(crate) fn io(path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().display().to_string(),
            source,
        }
    }
}

/// Result type for consent engine operations.
pub type ConsentResult<T> = Result<T, ConsentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(
            ConsentError::UnknownConsent {
                id: "x".to_string()
            }
            .exit_code(),
            1
        );
        assert_eq!(
            ConsentError::Config {
                message: "bad".to_string()
            }
            .exit_code(),
            2
        );
        assert_eq!(ConsentError::unavailable("registry", "down").exit_code(), 2);
        assert_eq!(
            ConsentError::Persistence {
                subject: "p1".to_string(),
                message: "disk full".to_string()
            }
            .exit_code(),
            2
        );
    }

    #[test]
    fn test_display() {
        let err = ConsentError::unavailable("configuration", "timed out");
        assert_eq!(
            err.to_string(),
            "source unavailable: configuration - timed out"
        );
    }
}
