// Manifest-driven commands
pub mod declarative;

// Direct API commands
pub mod copy;
pub mod show;
pub mod snapshot;
pub mod sync;
pub mod testdata;

use anyhow::Result;
use serde_json::Value;

use crate::Context;
use crate::config;
use crate::resource::SharedClient;

/// Client for commands that only need API settings
fn api_client(ctx: &Context) -> Result<SharedClient> {
    let settings = config::api_settings(ctx.manifest.as_deref())?;
    config::client(&settings)
}

/// Drop server-assigned `_id` keys at any depth
fn without_ids(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(k, _)| k.as_str() != "_id")
                .map(|(k, v)| (k.clone(), without_ids(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(without_ids).collect()),
        other => other.clone(),
    }
}
