//! Declared remote resources
//!
//! Every entity flagops manages is a [`declarative::Resource`] backed by the
//! shared [`flagapi::Client`]:
//! - Fetch (a missing entity is `None`, a missing parent is an error)
//! - Create with the creation-time fields, then patch the rest
//! - Patch plan computed from the declaration against the fetched entity

use anyhow::Result;
use declarative::{CreateOutcome, DeleteOutcome};
use flagapi::{Client, OptionalExt};
use serde_json::Value;
use std::rc::Rc;

/// Client shared by every resource of one run
pub type SharedClient = Rc<Client>;

/// Map a fetch to `None` when the entity does not exist
pub(crate) fn fetched(result: flagapi::Result<Value>) -> Result<Option<Value>> {
    Ok(result.optional()?)
}

/// Map a create call, turning a key conflict into [`CreateOutcome::Conflict`]
pub(crate) fn created(result: flagapi::Result<Value>) -> Result<CreateOutcome> {
    match result {
        Ok(entity) => Ok(CreateOutcome::Created(entity)),
        Err(flagapi::Error::Conflict { message }) => {
            log::debug!("create conflict: {}", message);
            Ok(CreateOutcome::Conflict)
        }
        Err(e) => Err(e.into()),
    }
}

/// Map a delete call; a missing entity is already absent
pub(crate) fn deleted(result: flagapi::Result<()>) -> Result<DeleteOutcome> {
    match result {
        Ok(()) => Ok(DeleteOutcome::Deleted),
        Err(e) if e.is_ignorable() => Ok(DeleteOutcome::AlreadyAbsent),
        Err(e) => Err(e.into()),
    }
}

/// Declared tags, or an empty list when creating without any
pub(crate) fn tags_or_empty(tags: Option<&Vec<String>>) -> Value {
    Value::from(tags.cloned().unwrap_or_default())
}

pub mod custom_role;
pub mod environment;
pub mod feature_flag;
pub mod flag_environment;
pub mod project;
pub mod segment;
pub mod webhook;

pub use custom_role::CustomRole;
pub use environment::Environment;
pub use feature_flag::FeatureFlag;
pub use flag_environment::FlagEnvironment;
pub use project::Project;
pub use segment::Segment;
pub use webhook::Webhook;

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use flagapi::backend::MockBackend;
    use flagapi::retry::Clock;
    use std::time::Duration;

    /// Clock that never sleeps
    #[derive(Debug)]
    pub(crate) struct NoSleep;

    impl Clock for NoSleep {
        fn now_millis(&self) -> i64 {
            0
        }

        fn sleep(&self, _duration: Duration) {}
    }

    /// Client over an in-memory backend
    pub(crate) fn mock_client(mock: &MockBackend) -> SharedClient {
        Rc::new(Client::with_backend(Box::new(mock.clone())).with_clock(Box::new(NoSleep)))
    }

    #[test]
    fn test_created_maps_conflict() {
        let outcome = created(Err(flagapi::Error::Conflict {
            message: "key_exists".into(),
        }))
        .unwrap();
        assert_eq!(outcome, CreateOutcome::Conflict);
    }

    #[test]
    fn test_deleted_tolerates_not_found() {
        let outcome = deleted(Err(flagapi::Error::NotFound {
            path: "/roles/ops".into(),
        }))
        .unwrap();
        assert_eq!(outcome, DeleteOutcome::AlreadyAbsent);

        let err = deleted(Err(flagapi::Error::Unauthorized {
            message: "bad token".into(),
        }));
        assert!(err.is_err());
    }
}
