//! Errors raised by the reconciliation engine

use crate::lists::ListError;
use crate::patch::PatchError;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors the engine raises itself
///
/// Remote-call failures stay in the client's error type and reach the
/// controller through `anyhow`; these are the failures decided here.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A resource the operation presupposes is missing.
    #[error("{0} does not exist")]
    NotFound(String),

    /// Policy check rejected the desired state before any mutation.
    #[error("policy check failed for {resource}: {}", failures.join("; "))]
    ValidationFailed {
        /// Resource identifier.
        resource: String,
        /// One message per failed rule.
        failures: Vec<String>,
    },

    /// Remote entity changed since the caller last saw it.
    #[error("version conflict on {resource}: expected {expected}, found {found}")]
    VersionConflict {
        resource: String,
        expected: u64,
        found: u64,
    },

    /// Create reported a conflict, yet the entity could not be fetched.
    #[error("{0} reported as existing but could not be fetched")]
    ConflictUnresolved(String),

    #[error(transparent)]
    List(#[from] ListError),

    #[error(transparent)]
    Patch(#[from] PatchError),
}

impl Error {
    /// Missing required parent, e.g. the flag of a flag environment
    pub fn missing(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_message() {
        let err = Error::missing("Flag: search in Project: web");
        assert_eq!(err.to_string(), "Flag: search in Project: web does not exist");
    }

    #[test]
    fn test_validation_failed_lists_failures() {
        let err = Error::ValidationFailed {
            resource: "flag.search".into(),
            failures: vec!["tags required".into(), "name too long".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("tags required; name too long"));
    }

    #[test]
    fn test_list_error_is_transparent() {
        let err: Error = ListError::TargetsNotFound {
            variation: 0,
            missing: vec!["x".into()],
        }
        .into();
        assert!(err.to_string().starts_with("targets not found"));
    }
}
