//! Canonical YAML rendering of collected objects.
//!
//! Output must be byte-stable across runs against an unchanged cluster, so
//! keys are sorted recursively before serialization.

use serde_json::Value;

pub type YamlError = serde_yaml_with_quirks::Error;

/// Sort all JSON object keys recursively.
pub fn sort_json_keys(value: Value) -> Value {
	match value {
		Value::Object(map) => {
			let mut entries: Vec<(String, Value)> = map.into_iter().collect();
			entries.sort_by(|(a, _), (b, _)| a.cmp(b));
			Value::Object(
				entries
					.into_iter()
					.map(|(k, v)| (k, sort_json_keys(v)))
					.collect(),
			)
		}
		Value::Array(arr) => Value::Array(arr.into_iter().map(sort_json_keys).collect()),
		other => other,
	}
}

/// Remove the value addressed by a JSON pointer, if present.
///
/// Returns whether something was removed.
pub fn remove_pointer(value: &mut Value, pointer: &str) -> bool {
	let Some((parent, last)) = pointer.rsplit_once('/') else {
		return false;
	};
	let key = last.replace("~1", "/").replace("~0", "~");
	match value.pointer_mut(parent) {
		Some(Value::Object(map)) => map.remove(&key).is_some(),
		Some(Value::Array(arr)) => match key.parse::<usize>() {
			Ok(index) if index < arr.len() => {
				arr.remove(index);
				true
			}
			_ => false,
		},
		_ => false,
	}
}

/// Serialize a JSON value to YAML with sorted keys.
pub fn to_yaml(value: &Value) -> Result<String, YamlError> {
	serde_yaml_with_quirks::to_string(&sort_json_keys(value.clone()))
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[test]
	fn test_to_yaml_sorts_nested_keys() {
		let value = json!({
			"metadata": {"name": "web", "labels": {"b": "2", "a": "1"}},
			"apiVersion": "v1",
			"kind": "ConfigMap",
		});
		let yaml = to_yaml(&value).unwrap();

		let position = |needle: &str| yaml.find(needle).unwrap();
		assert!(position("apiVersion:") < position("kind:"));
		assert!(position("kind:") < position("metadata:"));
		assert!(position("labels:") < position("name: web"));
		assert!(position("a: ") < position("b: "));

		let parsed: Value = serde_yaml_with_quirks::from_str(&yaml).unwrap();
		assert_eq!(parsed, value);
	}

	#[test]
	fn test_to_yaml_is_stable() {
		let value = json!({"z": [{"y": 1, "x": 2}], "a": null});
		assert_eq!(to_yaml(&value).unwrap(), to_yaml(&value).unwrap());
	}

	#[test]
	fn test_remove_pointer() {
		let mut value = json!({
			"metadata": {
				"name": "web",
				"managedFields": [{"manager": "kubectl"}],
				"annotations": {"kubectl.kubernetes.io/last-applied-configuration": "{}"}
			}
		});
		assert!(remove_pointer(&mut value, "/metadata/managedFields"));
		assert!(remove_pointer(
			&mut value,
			"/metadata/annotations/kubectl.kubernetes.io~1last-applied-configuration"
		));
		assert!(!remove_pointer(&mut value, "/metadata/managedFields"));
		assert!(!remove_pointer(&mut value, "/status/phase"));
		assert_eq!(value, json!({"metadata": {"name": "web", "annotations": {}}}));
	}

	#[test]
	fn test_remove_pointer_array_index() {
		let mut value = json!({"items": [1, 2, 3]});
		assert!(remove_pointer(&mut value, "/items/1"));
		assert!(!remove_pointer(&mut value, "/items/7"));
		assert_eq!(value, json!({"items": [1, 3]}));
	}
}
