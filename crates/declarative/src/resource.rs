//! Resource trait for remote state reconciliation
//!
//! A Resource is one declared remote entity (a project, a flag, a flag's
//! environment config, ...). It knows how to fetch, create, patch and delete
//! its entity and how to turn its declaration into patches against a fetched
//! copy. The controller drives these primitives.

use crate::patch::{PatchOperation, PatchRequest};
use crate::types::{DesiredStatus, ReconcileOptions};
use anyhow::Result;
use serde_json::Value;
use std::fmt;

/// Outcome of a create call
#[derive(Debug, Clone, PartialEq)]
pub enum CreateOutcome {
    /// Server's representation of the new entity
    Created(Value),
    /// The entity already exists (HTTP 409)
    Conflict,
}

/// Outcome of a delete call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// Nothing to delete
    AlreadyAbsent,
}

/// Core trait for declared remote resources
///
/// # Example
///
/// ```ignore
/// use declarative::{Resource, DesiredState, FieldSpec, diff};
///
/// #[derive(Debug)]
/// struct Role { key: String, name: Option<String>, client: Rc<Client> }
///
/// impl Resource for Role {
///     fn id(&self) -> String { format!("custom_role.{}", self.key) }
///     fn description(&self) -> String { format!("Custom role {}", self.key) }
///     fn resource_type(&self) -> &'static str { "custom_role" }
///     fn desired_status(&self) -> DesiredStatus { DesiredStatus::Present }
///
///     fn fetch(&self) -> Result<Option<Value>> {
///         Ok(self.client.get_role(&self.key).optional()?)
///     }
///
///     fn plan_update(&self, remote: &Value, _opts: &ReconcileOptions) -> Result<Vec<PatchOperation>> {
///         let desired = DesiredState::new().with("name", self.name.clone());
///         Ok(diff(&desired, remote, &[FieldSpec::scalar("name")]).patches)
///     }
///     // create, submit_patch, delete, policy_input ...
/// }
/// ```
pub trait Resource: fmt::Debug {
    /// Unique identifier, `<type>.<key>` (e.g. "feature_flag.search")
    fn id(&self) -> String;

    /// Human-readable description
    fn description(&self) -> String;

    /// Resource type category, used for grouping and filtering
    fn resource_type(&self) -> &'static str;

    /// Requested state
    fn desired_status(&self) -> DesiredStatus;

    /// Fetch the remote entity; `None` when it does not exist
    ///
    /// A missing required parent is an error, not `None`.
    fn fetch(&self) -> Result<Option<Value>>;

    /// Create the entity with its creation-time fields
    fn create(&self) -> Result<CreateOutcome>;

    /// Ordered patches that bring `remote` to the declared state
    ///
    /// Must be empty when nothing differs.
    fn plan_update(&self, remote: &Value, opts: &ReconcileOptions) -> Result<Vec<PatchOperation>>;

    /// Submit a patch batch, returning the server's new representation
    fn submit_patch(&self, request: &PatchRequest) -> Result<Value>;

    /// Remove the entity
    fn delete(&self) -> Result<DeleteOutcome>;

    /// Normalized desired parameters handed to the policy check
    fn policy_input(&self) -> Value;

    /// Whether an existing entity still needs removing
    ///
    /// Resources whose removal is a reset rather than a delete override this.
    fn needs_removal(&self, remote: &Value) -> bool {
        let _ = remote;
        true
    }
}

/// A boxed resource for type-erased storage
pub type BoxedResource = Box<dyn Resource>;
