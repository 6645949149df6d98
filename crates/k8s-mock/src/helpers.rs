//! Helper functions for mock Kubernetes testing.

use serde_json::{json, Map, Value};
use wiremock::ResponseTemplate;

/// A `Status` failure response.
pub fn status(code: u16, reason: &str, message: &str) -> ResponseTemplate {
	ResponseTemplate::new(code).set_body_json(json!({
		"kind": "Status",
		"apiVersion": "v1",
		"metadata": {},
		"status": "Failure",
		"message": message,
		"reason": reason,
		"code": code
	}))
}

/// Whether `labels` satisfy a comma-separated selector of `key`, `key=value`
/// and `key!=value` terms.
pub fn selector_matches(labels: Option<&Map<String, Value>>, selector: &str) -> bool {
	let value_of = |key: &str| labels.and_then(|l| l.get(key)).and_then(Value::as_str);

	selector
		.split(',')
		.map(str::trim)
		.filter(|term| !term.is_empty())
		.all(|term| {
			if let Some((key, want)) = term.split_once("!=") {
				value_of(key.trim()) != Some(want.trim())
			} else if let Some((key, want)) = term.split_once('=') {
				let key = key.trim();
				let want = want.trim_start_matches('=').trim();
				value_of(key) == Some(want)
			} else {
				value_of(term).is_some()
			}
		})
}

/// The last `n` lines of `text`.
pub fn tail(text: &str, n: usize) -> String {
	let lines: Vec<&str> = text.lines().collect();
	let start = lines.len().saturating_sub(n);
	let mut out = lines[start..].join("\n");
	if !out.is_empty() && text.ends_with('\n') {
		out.push('\n');
	}
	out
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_selector_matches() {
		let labels = json!({"app": "api", "tier": "web"});
		let labels = labels.as_object();

		assert!(selector_matches(labels, "app=api"));
		assert!(selector_matches(labels, "app==api,tier"));
		assert!(selector_matches(labels, "app!=worker"));
		assert!(!selector_matches(labels, "app=worker"));
		assert!(!selector_matches(labels, "release"));
		assert!(!selector_matches(None, "app"));
		assert!(selector_matches(None, ""));
	}

	#[test]
	fn test_tail() {
		assert_eq!(tail("a\nb\nc\n", 2), "b\nc\n");
		assert_eq!(tail("a\nb", 5), "a\nb");
		assert_eq!(tail("a\nb\n", 0), "");
	}
}
