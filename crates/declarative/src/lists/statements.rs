//! Policy statements (custom roles, webhook filters)

use super::{ListError, ListItem, trim_tail, whole_list};
use crate::diff::values_equal;
use crate::normalize::{StatementSpec, normalize_remote_statement};
use crate::patch::{PatchOperation, PatchPath};
use crate::types::{ReconcileOptions, RemovalOrder};
use serde_json::Value;

impl ListItem for StatementSpec {
    /// Equal lists emit nothing. A declared list that is a prefix of the
    /// remote one trims the tail, highest index first. Anything else replaces
    /// the whole list.
    fn reconcile(
        desired: &[Self],
        remote: Option<&Value>,
        prefix: &PatchPath,
        _opts: &ReconcileOptions,
    ) -> Result<Vec<PatchOperation>, ListError> {
        let current: Vec<Value> = super::items(remote)
            .iter()
            .map(normalize_remote_statement)
            .collect();
        let wanted: Vec<Value> = desired.iter().map(StatementSpec::to_value).collect();

        let common = wanted
            .iter()
            .zip(&current)
            .take_while(|(w, c)| values_equal(w, c))
            .count();

        if common == wanted.len() && common == current.len() {
            return Ok(Vec::new());
        }
        if common == wanted.len() && !wanted.is_empty() {
            return Ok(trim_tail(prefix, common, current.len(), RemovalOrder::Descending));
        }

        Ok(vec![whole_list(prefix, remote, wanted)])
    }
}
