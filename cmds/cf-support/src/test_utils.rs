//! Common test utilities.

use std::{
	collections::{BTreeMap, HashMap},
	path::Path,
	sync::atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::k8s::source::{ClusterSource, ListRequest, SourceError};

/// An in-memory cluster.
///
/// Kinds never registered with [`FakeSource::with_objects`] or
/// [`FakeSource::with_list_error`] behave as if the cluster did not serve them.
#[derive(Default)]
pub struct FakeSource {
	objects: HashMap<String, Vec<Value>>,
	list_errors: HashMap<String, SourceError>,
	logs: HashMap<(String, String, String), Result<String, SourceError>>,
	namespaces: Vec<String>,
	list_calls: AtomicUsize,
}

impl FakeSource {
	pub fn with_objects(mut self, kind: &str, objects: impl IntoIterator<Item = Value>) -> Self {
		self.objects
			.entry(kind.to_string())
			.or_default()
			.extend(objects);
		self
	}

	pub fn with_list_error(mut self, kind: &str, error: SourceError) -> Self {
		self.list_errors.insert(kind.to_string(), error);
		self
	}

	pub fn with_logs(mut self, namespace: &str, pod: &str, container: &str, text: &str) -> Self {
		self.logs.insert(
			(namespace.to_string(), pod.to_string(), container.to_string()),
			Ok(text.to_string()),
		);
		self
	}

	pub fn with_log_error(
		mut self,
		namespace: &str,
		pod: &str,
		container: &str,
		error: SourceError,
	) -> Self {
		self.logs.insert(
			(namespace.to_string(), pod.to_string(), container.to_string()),
			Err(error),
		);
		self
	}

	pub fn with_namespaces(mut self, namespaces: &[&str]) -> Self {
		self.namespaces = namespaces.iter().map(|ns| (*ns).to_string()).collect();
		self
	}

	/// Number of list requests served so far.
	pub fn list_calls(&self) -> usize {
		self.list_calls.load(Ordering::SeqCst)
	}
}

fn matches_selector(object: &Value, selector: &str) -> bool {
	let labels = object.pointer("/metadata/labels").and_then(Value::as_object);
	selector.split(',').all(|term| {
		let (key, value) = match term.split_once('=') {
			Some((key, value)) => (key, Some(value)),
			None => (term, None),
		};
		match (labels.and_then(|l| l.get(key)), value) {
			(Some(actual), Some(expected)) => actual.as_str() == Some(expected),
			(Some(_), None) => true,
			(None, _) => false,
		}
	})
}

#[async_trait]
impl ClusterSource for FakeSource {
	async fn list(&self, request: ListRequest<'_>) -> Result<Option<Vec<Value>>, SourceError> {
		self.list_calls.fetch_add(1, Ordering::SeqCst);
		if let Some(error) = self.list_errors.get(request.kind) {
			return Err(error.clone());
		}
		let Some(objects) = self.objects.get(request.kind) else {
			return Ok(None);
		};
		Ok(Some(
			objects
				.iter()
				.filter(|o| match request.namespace {
					Some(ns) => o.pointer("/metadata/namespace").and_then(Value::as_str) == Some(ns),
					None => true,
				})
				.filter(|o| request.label_selector.map_or(true, |s| matches_selector(o, s)))
				.cloned()
				.collect(),
		))
	}

	async fn container_logs(
		&self,
		namespace: &str,
		pod: &str,
		container: &str,
		tail_lines: Option<i64>,
	) -> Result<String, SourceError> {
		let key = (namespace.to_string(), pod.to_string(), container.to_string());
		let text = match self.logs.get(&key) {
			Some(result) => result.clone()?,
			None => return Err(SourceError::NotFound(format!("container {container} not found"))),
		};
		let Some(tail) = tail_lines.and_then(|n| usize::try_from(n).ok()) else {
			return Ok(text);
		};
		let lines: Vec<&str> = text.lines().collect();
		let mut tailed = lines[lines.len().saturating_sub(tail)..].join("\n");
		if !tailed.is_empty() && text.ends_with('\n') {
			tailed.push('\n');
		}
		Ok(tailed)
	}

	async fn namespaces(&self) -> Result<Vec<String>, SourceError> {
		Ok(self.namespaces.clone())
	}
}

/// A ConfigMap carrying fields that collection strips.
pub fn configmap(namespace: &str, name: &str) -> Value {
	json!({
		"apiVersion": "v1",
		"kind": "ConfigMap",
		"metadata": {
			"name": name,
			"namespace": namespace,
			"managedFields": [{"manager": "kubectl", "operation": "Apply"}],
			"annotations": {
				"kubectl.kubernetes.io/last-applied-configuration": "{\"data\":{}}",
			},
		},
		"data": {"mode": "production"},
	})
}

pub fn pod(namespace: &str, name: &str, containers: &[&str]) -> Value {
	let containers: Vec<_> = containers
		.iter()
		.map(|c| json!({"name": c, "image": format!("quay.io/codefresh/{c}:1.0")}))
		.collect();
	json!({
		"apiVersion": "v1",
		"kind": "Pod",
		"metadata": {"name": name, "namespace": namespace},
		"spec": {"containers": containers},
		"status": {"phase": "Running"},
	})
}

/// Every file under `root`, keyed by `/`-separated relative path.
pub fn read_tree(root: &Path) -> BTreeMap<String, String> {
	walkdir::WalkDir::new(root)
		.into_iter()
		.filter_map(Result::ok)
		.filter(|e| e.file_type().is_file())
		.map(|e| {
			let relative = e.path().strip_prefix(root).unwrap();
			let key = relative
				.components()
				.map(|c| c.as_os_str().to_string_lossy().into_owned())
				.collect::<Vec<_>>()
				.join("/");
			(key, std::fs::read_to_string(e.path()).unwrap())
		})
		.collect()
}
