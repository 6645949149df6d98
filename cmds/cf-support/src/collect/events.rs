//! Tabular view of namespace events.

use std::cmp::Ordering;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;

pub const EVENT_TABLE_HEADER: &str = "LAST SEEN\tTYPE\tREASON\tOBJECT\tMESSAGE";

fn created_at(event: &Value) -> Option<DateTime<Utc>> {
	let raw = event.pointer("/metadata/creationTimestamp")?.as_str()?;
	DateTime::parse_from_rfc3339(raw)
		.ok()
		.map(|t| t.with_timezone(&Utc))
}

fn field<'a>(event: &'a Value, pointer: &str) -> Option<&'a str> {
	event.pointer(pointer).and_then(Value::as_str)
}

/// Render events oldest first; events without a timestamp go last.
pub fn render_event_table(events: &[Value]) -> String {
	let mut sorted: Vec<(Option<DateTime<Utc>>, &Value)> =
		events.iter().map(|e| (created_at(e), e)).collect();
	sorted.sort_by(|(a, _), (b, _)| match (a, b) {
		(Some(a), Some(b)) => a.cmp(b),
		(Some(_), None) => Ordering::Less,
		(None, Some(_)) => Ordering::Greater,
		(None, None) => Ordering::Equal,
	});

	let mut out = String::from(EVENT_TABLE_HEADER);
	for (created, event) in sorted {
		let last_seen = created.map_or_else(
			|| "Unknown".to_string(),
			|t| t.to_rfc3339_opts(SecondsFormat::Secs, true),
		);
		let object = format!(
			"{}/{}",
			field(event, "/involvedObject/kind").unwrap_or("Unknown"),
			field(event, "/involvedObject/name").unwrap_or("Unknown"),
		);
		out.push('\n');
		out.push_str(&last_seen);
		out.push('\t');
		out.push_str(field(event, "/type").unwrap_or("Unknown"));
		out.push('\t');
		out.push_str(field(event, "/reason").unwrap_or("Unknown"));
		out.push('\t');
		out.push_str(&object);
		out.push('\t');
		// Keep one event per line
		out.push_str(
			&field(event, "/message")
				.unwrap_or("No message")
				.replace(['\n', '\t'], " "),
		);
	}
	out.push('\n');
	out
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	fn event(name: &str, created: Option<&str>, message: &str) -> Value {
		let mut metadata = json!({"name": name});
		if let Some(created) = created {
			metadata["creationTimestamp"] = json!(created);
		}
		json!({
			"metadata": metadata,
			"type": "Warning",
			"reason": "BackOff",
			"involvedObject": {"kind": "Pod", "name": "api-0"},
			"message": message,
		})
	}

	#[test]
	fn test_events_sorted_oldest_first_missing_last() {
		let events = vec![
			event("late", Some("2024-05-01T10:00:00Z"), "late"),
			event("undated", None, "undated"),
			event("early", Some("2024-05-01T09:00:00Z"), "early"),
		];
		let table = render_event_table(&events);
		let lines: Vec<_> = table.lines().collect();

		assert_eq!(lines[0], EVENT_TABLE_HEADER);
		assert_eq!(
			lines[1],
			"2024-05-01T09:00:00Z\tWarning\tBackOff\tPod/api-0\tearly"
		);
		assert!(lines[2].ends_with("\tlate"));
		assert_eq!(lines[3], "Unknown\tWarning\tBackOff\tPod/api-0\tundated");
	}

	#[test]
	fn test_event_placeholders() {
		let table = render_event_table(&[json!({"metadata": {"name": "bare"}})]);
		assert_eq!(
			table.lines().nth(1),
			Some("Unknown\tUnknown\tUnknown\tUnknown/Unknown\tNo message")
		);
	}

	#[test]
	fn test_multiline_message_flattened() {
		let table = render_event_table(&[event("e", None, "line one\nline two")]);
		assert_eq!(table.lines().count(), 2);
		assert!(table.contains("line one line two"));
	}

	#[test]
	fn test_empty_event_list() {
		assert_eq!(render_event_table(&[]), format!("{EVENT_TABLE_HEADER}\n"));
	}
}
