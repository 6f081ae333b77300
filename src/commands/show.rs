//! Fetch and print remote entities

use anyhow::Result;
use colored::Colorize;
use serde_json::Value;

use super::api_client;
use crate::Context;
use crate::resource::SharedClient;
use crate::ui;

pub fn project(ctx: &Context, project: &str) -> Result<()> {
    let client = api_client(ctx)?;
    let entity = found(client.get_project(project), &format!("Project {project}"))?;
    render(ctx, &format!("Project {project}"), &entity, &["name", "tags"]);
    Ok(())
}

pub fn environment(ctx: &Context, project: &str, env: &str) -> Result<()> {
    let client = api_client(ctx)?;
    let entity = found(
        client.get_environment(project, env),
        &format!("Environment {env} in project {project}"),
    )?;
    render(
        ctx,
        &format!("Environment {project}/{env}"),
        &entity,
        &["name", "color", "defaultTtl", "secureMode", "requireComments"],
    );
    Ok(())
}

pub fn flag(ctx: &Context, project: &str, flag: &str, env: Option<&str>) -> Result<()> {
    let client = api_client(ctx)?;
    let entity = fetch_flag(&client, project, flag, env)?;
    render(
        ctx,
        &format!("Flag {project}/{flag}"),
        &entity,
        &["name", "kind", "temporary", "tags"],
    );
    Ok(())
}

/// List a flag's variations and where each one is served by default
pub fn variations(ctx: &Context, project: &str, flag: &str) -> Result<()> {
    let client = api_client(ctx)?;
    let entity = fetch_flag(&client, project, flag, None)?;
    let rows = variation_rows(&entity);

    if ctx.quiet {
        let values = rows.iter().map(|row| row.value.clone()).collect();
        println!("{}", ui::pretty(&Value::Array(values)));
        return Ok(());
    }

    ui::header(&format!("Variations of {project}/{flag}"));
    for row in &rows {
        let label = row.name.as_deref().unwrap_or("");
        println!(
            "  {} {:<20} {}",
            format!("[{}]", row.index).cyan(),
            label.bold(),
            ui::compact(&row.value, 60)
        );
        if !row.served.is_empty() {
            println!("      {}", row.served.join(", ").dimmed());
        }
    }
    Ok(())
}

#[derive(Debug, PartialEq)]
struct VariationRow {
    index: usize,
    name: Option<String>,
    value: Value,
    /// `<env> fallthrough` / `<env> off` wherever this variation is the default
    served: Vec<String>,
}

fn variation_rows(flag: &Value) -> Vec<VariationRow> {
    let variations = flag.get("variations").and_then(Value::as_array);
    let environments = flag.get("environments").and_then(Value::as_object);

    variations
        .into_iter()
        .flatten()
        .enumerate()
        .map(|(index, variation)| {
            let mut served = Vec::new();
            for (env, config) in environments.into_iter().flatten() {
                let fallthrough = config
                    .get("fallthrough")
                    .and_then(|f| f.get("variation"))
                    .and_then(Value::as_u64);
                if fallthrough == Some(index as u64) {
                    served.push(format!("{env} fallthrough"));
                }
                if config.get("offVariation").and_then(Value::as_u64) == Some(index as u64) {
                    served.push(format!("{env} off"));
                }
            }
            VariationRow {
                index,
                name: variation.get("name").and_then(Value::as_str).map(str::to_string),
                value: variation.get("value").cloned().unwrap_or(Value::Null),
                served,
            }
        })
        .collect()
}

fn fetch_flag(client: &SharedClient, project: &str, flag: &str, env: Option<&str>) -> Result<Value> {
    found(
        client.get_flag(project, flag, env),
        &format!("Flag {flag} in project {project}"),
    )
}

pub fn segment(ctx: &Context, project: &str, env: &str, segment: &str) -> Result<()> {
    let client = api_client(ctx)?;
    let entity = found(
        client.get_segment(project, env, segment),
        &format!("Segment {segment} in {project}/{env}"),
    )?;
    render(
        ctx,
        &format!("Segment {project}/{env}/{segment}"),
        &entity,
        &["name", "description", "tags"],
    );
    Ok(())
}

pub fn role(ctx: &Context, role: &str) -> Result<()> {
    let client = api_client(ctx)?;
    let entity = found(client.get_role(role), &format!("Custom role {role}"))?;
    render(ctx, &format!("Custom role {role}"), &entity, &["name", "description"]);
    Ok(())
}

pub fn webhook(ctx: &Context, id: &str) -> Result<()> {
    let client = api_client(ctx)?;
    let entity = found(client.get_webhook(id), &format!("Webhook {id}"))?;
    render(ctx, &format!("Webhook {id}"), &entity, &["name", "url", "on", "sign"]);
    Ok(())
}

/// Name the entity in a not-found error
fn found(result: flagapi::Result<Value>, what: &str) -> Result<Value> {
    match result {
        Ok(entity) => Ok(entity),
        Err(flagapi::Error::NotFound { .. }) => Err(declarative::Error::missing(what).into()),
        Err(e) => Err(e.into()),
    }
}

/// Summary fields, then the whole entity; only the JSON when quiet
fn render(ctx: &Context, title: &str, entity: &Value, fields: &[&str]) {
    if ctx.quiet {
        println!("{}", ui::pretty(entity));
        return;
    }

    ui::header(title);
    for (key, value) in summary(entity, fields) {
        ui::kv(key, &value);
    }
    println!();
    println!("{}", ui::pretty(entity));
}

fn summary<'a>(entity: &Value, fields: &[&'a str]) -> Vec<(&'a str, String)> {
    fields
        .iter()
        .filter_map(|field| {
            let value = entity.get(*field)?;
            let text = match value {
                Value::Null => return None,
                Value::String(s) => s.clone(),
                other => ui::compact(other, 60),
            };
            Some((*field, text))
        })
        .collect()
}
