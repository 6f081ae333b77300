//! Request paths, relative to the API base URL.
//!
//! Keys are validated before they reach the client, so they are joined
//! without escaping.

pub fn projects() -> String {
    "/projects".to_string()
}

pub fn project(project: &str) -> String {
    format!("/projects/{project}")
}

pub fn environments(project: &str) -> String {
    format!("/projects/{project}/environments")
}

pub fn environment(project: &str, env: &str) -> String {
    format!("/projects/{project}/environments/{env}")
}

pub fn flags(project: &str) -> String {
    format!("/flags/{project}")
}

pub fn flag(project: &str, flag: &str) -> String {
    format!("/flags/{project}/{flag}")
}

/// Flag path limited to one environment's configuration
pub fn flag_in_env(project: &str, flag: &str, env: &str) -> String {
    format!("/flags/{project}/{flag}?env={env}")
}

pub fn flag_copy(project: &str, flag: &str) -> String {
    format!("/flags/{project}/{flag}/copy")
}

pub fn segments(project: &str, env: &str) -> String {
    format!("/segments/{project}/{env}")
}

pub fn segment(project: &str, env: &str, segment: &str) -> String {
    format!("/segments/{project}/{env}/{segment}")
}

pub fn roles() -> String {
    "/roles".to_string()
}

pub fn role(role: &str) -> String {
    format!("/roles/{role}")
}

pub fn webhooks() -> String {
    "/webhooks".to_string()
}

pub fn webhook(id: &str) -> String {
    format!("/webhooks/{id}")
}

/// Every flag and segment of the environment an SDK key belongs to
pub fn sdk_flag_data() -> String {
    "/sdk/latest-all".to_string()
}

/// Path without its query string
pub fn strip_query(path: &str) -> &str {
    path.split_once('?').map_or(path, |(p, _)| p)
}
