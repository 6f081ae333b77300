use colored::{ColoredString, Colorize};
use declarative::{ApplyResult, PlannedAction};
use serde_json::Value;

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print a dim/muted message
pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

/// Print a section header
pub fn section(title: &str) {
    println!();
    println!("{}", title.cyan().bold());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

// ============================================================================
// Plan and apply symbols
// ============================================================================

pub fn action_symbol(action: &PlannedAction) -> ColoredString {
    match action {
        PlannedAction::NoChange => "○".dimmed(),
        PlannedAction::Create => "+".green(),
        PlannedAction::Update(_) => "~".yellow(),
        PlannedAction::Delete => "-".red(),
    }
}

pub fn result_symbol(result: &ApplyResult) -> ColoredString {
    match result {
        ApplyResult::NoChange => "○".dimmed(),
        ApplyResult::Created | ApplyResult::Modified | ApplyResult::Removed => "✓".green(),
        ApplyResult::Skipped { .. } => "⊘".yellow(),
        ApplyResult::Failed { .. } => "✗".red(),
    }
}

/// One-line rendering of a JSON value, cut to `max_len` characters
pub fn compact(value: &Value, max_len: usize) -> String {
    let text = match value {
        Value::String(s) => format!("{s:?}"),
        other => other.to_string(),
    };
    truncate(&text, max_len)
}

/// Truncate a string for display, keeping the start
pub fn truncate(text: &str, max_len: usize) -> String {
    if text.chars().count() <= max_len {
        return text.to_string();
    }
    if max_len <= 3 {
        return "...".to_string();
    }
    let kept: String = text.chars().take(max_len - 3).collect();
    format!("{kept}...")
}

/// Pretty JSON for `show` output
pub fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_truncate_short_and_long() {
        assert_eq!(truncate("flag", 10), "flag");
        assert_eq!(truncate("production-east", 10), "product...");
        assert_eq!(truncate("abcdef", 3), "...");
    }

    #[test]
    fn test_truncate_counts_chars() {
        assert_eq!(truncate("ééééé", 5), "ééééé");
    }

    #[test]
    fn test_compact_quotes_strings() {
        assert_eq!(compact(&json!("dark"), 20), "\"dark\"");
        assert_eq!(compact(&json!({"variation": 0}), 40), "{\"variation\":0}");
        assert_eq!(compact(&json!([1, 2, 3, 4, 5, 6]), 8), "[1,2,...");
    }

    #[test]
    fn test_symbols() {
        colored::control::set_override(false);
        assert_eq!(action_symbol(&PlannedAction::Create).to_string(), "+");
        assert_eq!(action_symbol(&PlannedAction::Delete).to_string(), "-");
        assert_eq!(
            result_symbol(&ApplyResult::Failed { error: "x".into() }).to_string(),
            "✗"
        );
    }
}
