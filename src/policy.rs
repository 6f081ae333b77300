//! Policy-as-code checks through conftest
//!
//! Each resource's desired parameters are piped to
//! `conftest test --parser json --output json -` with the configured policy
//! directory and namespace. Any `failures` entry rejects the resource.

use anyhow::{Context, Result};
use declarative::{PolicyCheck, PolicyOutcome};
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};

use crate::runner;
use crate::schema::PolicySettings;

const CONFTEST: &str = "conftest";

#[derive(Debug, Deserialize)]
struct CheckResult {
    #[serde(default)]
    failures: Vec<Message>,
}

#[derive(Debug, Deserialize)]
struct Message {
    msg: String,
}

/// [`PolicyCheck`] running the `conftest` binary
#[derive(Debug, Clone)]
pub struct Conftest {
    program: String,
    dir: PathBuf,
    namespace: String,
}

impl Conftest {
    pub fn new(dir: impl Into<PathBuf>, namespace: impl Into<String>) -> Self {
        Self {
            program: CONFTEST.to_string(),
            dir: dir.into(),
            namespace: namespace.into(),
        }
    }

    /// Check from manifest settings; `None` when policies are disabled
    ///
    /// A relative policy directory is taken relative to `base`, the
    /// manifest's directory.
    pub fn from_settings(settings: &PolicySettings, base: &Path) -> Option<Self> {
        if !settings.enabled {
            return None;
        }
        let dir = crate::paths::expand(&settings.dir);
        let dir = if dir.is_relative() { base.join(dir) } else { dir };
        Some(Self::new(dir, &settings.namespace))
    }

    #[cfg(test)]
    fn with_program(mut self, program: &str) -> Self {
        self.program = program.to_string();
        self
    }

    /// Version line reported by the binary
    pub fn version(&self) -> Result<String> {
        runner::run_capture(&self.program, &["--version"])
    }

    fn args(&self) -> Vec<String> {
        vec![
            "test".into(),
            "--policy".into(),
            self.dir.display().to_string(),
            "--namespace".into(),
            self.namespace.clone(),
            "--parser".into(),
            "json".into(),
            "--output".into(),
            "json".into(),
            "-".into(),
        ]
    }
}

/// Wrap the resource parameters with the resource type
fn document(resource_type: &str, input: &Value) -> Value {
    let mut doc = input.clone();
    if let Some(obj) = doc.as_object_mut() {
        obj.insert("resourceType".into(), resource_type.into());
    }
    doc
}

/// Collect failure messages from conftest's JSON report
fn parse_report(report: &str) -> Result<PolicyOutcome> {
    let results: Vec<CheckResult> =
        serde_json::from_str(report).context("Failed to parse conftest output")?;
    Ok(PolicyOutcome {
        failures: results
            .into_iter()
            .flat_map(|r| r.failures)
            .map(|m| m.msg)
            .collect(),
    })
}

impl PolicyCheck for Conftest {
    fn check(&self, resource_type: &str, input: &Value) -> Result<PolicyOutcome> {
        if !runner::command_exists(&self.program) {
            anyhow::bail!(
                "{} not found; install it or set [policy] enabled = false",
                self.program
            );
        }

        let args = self.args();
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        let doc = serde_json::to_string(&document(resource_type, input))?;
        log::debug!("{} {} <<< {}", self.program, args.join(" "), doc);

        let output = runner::run_with_input(&self.program, &args, &doc)?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        if stdout.trim().is_empty() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("{} produced no report: {}", self.program, stderr.trim());
        }
        parse_report(&stdout)
    }
}
