//! Flag data files for SDK test and offline modes
//!
//! The data of one environment is fetched with its SDK key. Each override
//! pins a flag to one of its variation values: the flag moves from `flags`
//! to `flagValues`, which SDKs serve as-is.

use anyhow::{Context as _, Result};
use serde_json::{Map, Value};
use std::fs;

use crate::Context;
use crate::cli::TestDataArgs;
use crate::config;
use crate::ui;

pub fn generate(ctx: &Context, args: &TestDataArgs) -> Result<()> {
    let client = config::sdk_client(&args.sdk_key_env)?;
    let mut data = client
        .get_sdk_flag_data()
        .context("Could not fetch flag data for the SDK key")?;
    apply_overrides(&mut data, &args.overrides)?;

    let content = serde_json::to_string_pretty(&data)?;
    match &args.output {
        Some(path) => {
            fs::write(path, content)
                .with_context(|| format!("Could not write {}", path.display()))?;
            if !ctx.quiet {
                ui::success(&format!(
                    "Flag data written to {} ({} override(s))",
                    path.display(),
                    args.overrides.len()
                ));
            }
        }
        None => println!("{content}"),
    }
    Ok(())
}

/// Pin each overridden flag to a fixed value
///
/// The value must be one of the flag's variation values.
pub fn apply_overrides(data: &mut Value, overrides: &[(String, Value)]) -> Result<()> {
    for (flag, value) in overrides {
        let variations = data
            .get("flags")
            .and_then(|flags| flags.get(flag))
            .with_context(|| format!("Flag {flag} is not in the flag data"))?
            .get("variations")
            .and_then(Value::as_array);
        if !variations.is_some_and(|v| v.contains(value)) {
            anyhow::bail!("Override {value} for {flag} is not one of its variations");
        }

        if let Some(flags) = data.get_mut("flags").and_then(Value::as_object_mut) {
            flags.remove(flag);
        }
        let Some(root) = data.as_object_mut() else {
            anyhow::bail!("Flag data is not an object");
        };
        let values = root
            .entry("flagValues")
            .or_insert_with(|| Value::Object(Map::new()));
        if let Some(values) = values.as_object_mut() {
            values.insert(flag.clone(), value.clone());
        }
    }
    Ok(())
}

/// Parse `FLAG=VALUE`; the value is JSON, or a plain string when it is not
pub fn parse_override(raw: &str) -> Result<(String, Value), String> {
    let (flag, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected FLAG=VALUE, got '{raw}'"))?;
    if flag.is_empty() {
        return Err(format!("missing flag key in '{raw}'"));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((flag.to_string(), value))
}
