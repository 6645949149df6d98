//! Fetch every live instance of one resource kind.

use std::path::PathBuf;

use serde_json::Value;
use thiserror::Error;
use tracing::instrument;

use super::{
	catalog::{ResourceDescriptor, Summary},
	events::render_event_table,
};
use crate::{
	k8s::{
		source::{ClusterSource, ListRequest, SourceError},
		ResourceScope,
	},
	yaml::to_yaml,
};

/// Why a manifest or a log could not be collected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
	#[error(transparent)]
	Source(#[from] SourceError),

	#[error("object has no metadata.name")]
	Unnamed,

	#[error("failed to render YAML: {0}")]
	Serialize(String),

	#[error("failed to write {}: {message}", path.display())]
	Write { path: PathBuf, message: String },

	#[error("container `{container}`: {reason}")]
	ContainerLogs {
		container: String,
		reason: Box<FetchError>,
	},

	#[error("cancelled before completion")]
	Cancelled,

	#[error("fetch task failed: {0}")]
	Internal(String),
}

impl FetchError {
	/// Access was denied, possibly through a container log failure.
	pub fn is_forbidden(&self) -> bool {
		match self {
			Self::Source(SourceError::Forbidden(_)) => true,
			Self::ContainerLogs { reason, .. } => reason.is_forbidden(),
			_ => false,
		}
	}
}

/// Outcome of collecting one instance of a kind.
///
/// A failure affecting the whole kind (listing denied, API error) is a single
/// result with no `name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionResult {
	pub kind: &'static str,
	pub name: Option<String>,
	/// `None` for cluster-scoped objects.
	pub namespace: Option<String>,
	/// Rendered YAML manifest.
	pub manifest: Result<String, FetchError>,
	/// Log text, possibly partial when `log_error` is also set.
	pub logs: Option<String>,
	pub log_error: Option<FetchError>,
}

impl CollectionResult {
	pub fn kind_failure(kind: &'static str, error: FetchError) -> Self {
		Self {
			kind,
			name: None,
			namespace: None,
			manifest: Err(error),
			logs: None,
			log_error: None,
		}
	}

	/// The whole kind failed, as opposed to one object that has no name.
	pub fn is_kind_failure(&self) -> bool {
		self.name.is_none()
			&& matches!(&self.manifest, Err(e) if *e != FetchError::Unnamed)
	}

	/// `kind/namespace/name` for messages; unnamed objects show as `<unnamed>`.
	pub fn subject(&self) -> String {
		let name = match (&self.name, &self.manifest) {
			(Some(name), _) => name.as_str(),
			(None, Err(FetchError::Unnamed)) => "<unnamed>",
			(None, _) => return self.kind.to_string(),
		};
		match &self.namespace {
			Some(ns) => format!("{}/{ns}/{name}", self.kind),
			None => format!("{}/{name}", self.kind),
		}
	}
}

/// Everything fetched for one kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KindFetch {
	pub results: Vec<CollectionResult>,
	/// Extra rendering requested by the descriptor, e.g. the events table.
	pub summary: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchOpts {
	/// Only fetch the last N log lines of each container.
	pub log_tail_lines: Option<i64>,
}

/// List all instances of a kind and render them.
///
/// Never fails as a whole: an unserved kind yields no results, every other
/// failure is recorded on the returned results.
#[instrument(skip_all, fields(kind = descriptor.kind))]
pub async fn fetch(
	source: &dyn ClusterSource,
	descriptor: &ResourceDescriptor,
	namespace: &str,
	opts: FetchOpts,
) -> KindFetch {
	let request = ListRequest {
		kind: descriptor.kind,
		namespace: match descriptor.scope {
			ResourceScope::Namespaced => Some(namespace),
			ResourceScope::ClusterWide => None,
		},
		label_selector: descriptor.label_selector,
	};

	let mut items = match source.list(request).await {
		Ok(Some(items)) => items,
		Ok(None) | Err(SourceError::NotFound(_)) => {
			tracing::debug!("kind not served, nothing to collect");
			return KindFetch::default();
		}
		Err(e) => {
			tracing::warn!(error = %e, "failed to list");
			return KindFetch {
				results: vec![CollectionResult::kind_failure(descriptor.kind, e.into())],
				summary: None,
			};
		}
	};

	items.sort_by(|a, b| identity(a).cmp(&identity(b)));

	let summary = descriptor.summary.map(|summary| match summary {
		Summary::EventTable => render_event_table(&items),
	});

	let mut results = Vec::with_capacity(items.len());
	for item in items {
		results.push(fetch_instance(source, descriptor, item, opts).await);
	}

	tracing::debug!(count = results.len(), "fetched instances");
	KindFetch { results, summary }
}

fn identity(object: &Value) -> (Option<&str>, Option<&str>) {
	(
		object.pointer("/metadata/namespace").and_then(Value::as_str),
		object.pointer("/metadata/name").and_then(Value::as_str),
	)
}

async fn fetch_instance(
	source: &dyn ClusterSource,
	descriptor: &ResourceDescriptor,
	mut object: Value,
	opts: FetchOpts,
) -> CollectionResult {
	let (namespace, name) = identity(&object);
	let namespace = namespace.map(str::to_string);
	let Some(name) = name.map(str::to_string) else {
		return CollectionResult {
			namespace,
			..CollectionResult::kind_failure(descriptor.kind, FetchError::Unnamed)
		};
	};

	let containers = container_names(&object);

	for pointer in descriptor.redactions() {
		crate::yaml::remove_pointer(&mut object, pointer);
	}
	let manifest = to_yaml(&object).map_err(|e| FetchError::Serialize(e.to_string()));

	let (logs, log_error) = match (&namespace, descriptor.supports_logs && manifest.is_ok()) {
		(Some(ns), true) => pod_logs(source, ns, &name, &containers, opts).await,
		_ => (None, None),
	};

	CollectionResult {
		kind: descriptor.kind,
		name: Some(name),
		namespace,
		manifest,
		logs,
		log_error,
	}
}

fn container_names(object: &Value) -> Vec<String> {
	object
		.pointer("/spec/containers")
		.and_then(Value::as_array)
		.map(|containers| {
			containers
				.iter()
				.filter_map(|c| c.get("name").and_then(Value::as_str))
				.map(str::to_string)
				.collect()
		})
		.unwrap_or_default()
}

/// Fetch the logs of every container of a pod.
///
/// One container yields its raw log. Several yield one `==> name <==`
/// section each; failed containers are left out and the first failure is
/// reported.
async fn pod_logs(
	source: &dyn ClusterSource,
	namespace: &str,
	pod: &str,
	containers: &[String],
	opts: FetchOpts,
) -> (Option<String>, Option<FetchError>) {
	let mut sections = Vec::with_capacity(containers.len());
	let mut first_error = None;

	for container in containers {
		match source
			.container_logs(namespace, pod, container, opts.log_tail_lines)
			.await
		{
			Ok(text) => sections.push((container.as_str(), text)),
			Err(e) => {
				tracing::warn!(pod, container = %container, error = %e, "failed to fetch container logs");
				first_error.get_or_insert_with(|| FetchError::ContainerLogs {
					container: container.clone(),
					reason: Box::new(e.into()),
				});
			}
		}
	}

	let logs = match (containers.len(), sections.as_slice()) {
		(_, []) => None,
		(1, [(_, text)]) => Some(text.clone()),
		_ => {
			let mut out = String::new();
			for (container, text) in &sections {
				if !out.is_empty() {
					out.push('\n');
				}
				out.push_str("==> ");
				out.push_str(container);
				out.push_str(" <==\n");
				out.push_str(text);
				if !text.ends_with('\n') {
					out.push('\n');
				}
			}
			Some(out)
		}
	};

	(logs, first_error)
}

#[cfg(test)]
mod tests {
	use assert_matches::assert_matches;
	use serde_json::json;

	use super::*;
	use crate::{
		collect::catalog::Catalog,
		test_utils::{configmap, pod, FakeSource},
	};

	fn descriptor(kind: &str) -> ResourceDescriptor {
		Catalog::general().get(kind).cloned().unwrap()
	}

	#[tokio::test]
	async fn test_fetch_renders_sorted_manifests_without_managed_fields() {
		let source = FakeSource::default()
			.with_objects("configmaps", [configmap("prod", "zeta"), configmap("prod", "alpha")]);

		let fetched = fetch(&source, &descriptor("configmaps"), "prod", FetchOpts::default()).await;

		let names: Vec<_> = fetched
			.results
			.iter()
			.map(|r| r.name.as_deref().unwrap())
			.collect();
		assert_eq!(names, ["alpha", "zeta"]);
		let manifest = fetched.results[0].manifest.as_ref().unwrap();
		assert!(manifest.contains("name: alpha"));
		assert!(!manifest.contains("managedFields"));
		assert!(!manifest.contains("last-applied-configuration"));
		assert_eq!(fetched.summary, None);
	}

	#[tokio::test]
	async fn test_fetch_unserved_kind_is_empty() {
		let source = FakeSource::default();
		let fetched = fetch(
			&source,
			&descriptor("deployments.apps"),
			"prod",
			FetchOpts::default(),
		)
		.await;
		assert_eq!(fetched, KindFetch::default());
	}

	#[tokio::test]
	async fn test_fetch_forbidden_kind_is_single_failure() {
		let source = FakeSource::default().with_list_error(
			"services",
			SourceError::Forbidden("services is forbidden".to_string()),
		);

		let fetched = fetch(&source, &descriptor("services"), "prod", FetchOpts::default()).await;

		assert_eq!(fetched.results.len(), 1);
		let result = &fetched.results[0];
		assert!(result.is_kind_failure());
		assert_eq!(result.subject(), "services");
		assert_matches!(&result.manifest, Err(e) if e.is_forbidden());
	}

	#[tokio::test]
	async fn test_fetch_single_container_logs_are_raw() {
		let source = FakeSource::default()
			.with_objects("pods", [pod("prod", "api-0", &["api"])])
			.with_logs("prod", "api-0", "api", "2024-05-01T09:00:00Z started\n");

		let fetched = fetch(&source, &descriptor("pods"), "prod", FetchOpts::default()).await;

		let result = &fetched.results[0];
		assert_eq!(
			result.logs.as_deref(),
			Some("2024-05-01T09:00:00Z started\n")
		);
		assert_eq!(result.log_error, None);
	}

	#[tokio::test]
	async fn test_fetch_multi_container_logs_keep_successful_sections() {
		let source = FakeSource::default()
			.with_objects("pods", [pod("prod", "api-0", &["api", "sidecar", "proxy"])])
			.with_logs("prod", "api-0", "api", "api line")
			.with_log_error(
				"prod",
				"api-0",
				"sidecar",
				SourceError::Forbidden("denied".to_string()),
			)
			.with_logs("prod", "api-0", "proxy", "proxy line\n");

		let fetched = fetch(&source, &descriptor("pods"), "prod", FetchOpts::default()).await;

		let result = &fetched.results[0];
		assert!(result.manifest.is_ok());
		assert_eq!(
			result.logs.as_deref(),
			Some("==> api <==\napi line\n\n==> proxy <==\nproxy line\n")
		);
		assert_matches!(
			&result.log_error,
			Some(FetchError::ContainerLogs { container, .. }) if container == "sidecar"
		);
		assert!(result.log_error.as_ref().unwrap().is_forbidden());
	}

	#[tokio::test]
	async fn test_fetch_passes_tail_lines() {
		let source = FakeSource::default()
			.with_objects("pods", [pod("prod", "api-0", &["api"])])
			.with_logs("prod", "api-0", "api", "a\nb\nc\n");

		let fetched = fetch(
			&source,
			&descriptor("pods"),
			"prod",
			FetchOpts {
				log_tail_lines: Some(2),
			},
		)
		.await;

		assert_eq!(fetched.results[0].logs.as_deref(), Some("b\nc\n"));
	}

	#[tokio::test]
	async fn test_fetch_unnamed_object() {
		let source =
			FakeSource::default().with_objects("configmaps", [json!({"metadata": {"namespace": "prod"}})]);

		let fetched = fetch(&source, &descriptor("configmaps"), "prod", FetchOpts::default()).await;

		let result = &fetched.results[0];
		assert_matches!(result.manifest, Err(FetchError::Unnamed));
		assert!(!result.is_kind_failure());
		assert_eq!(result.subject(), "configmaps/prod/<unnamed>");
	}

	#[tokio::test]
	async fn test_fetch_events_renders_table() {
		let source = FakeSource::default().with_objects(
			"events",
			[json!({
				"metadata": {"name": "api-0.1", "namespace": "prod", "creationTimestamp": "2024-05-01T09:00:00Z"},
				"type": "Normal",
				"reason": "Pulled",
				"involvedObject": {"kind": "Pod", "name": "api-0"},
				"message": "image pulled",
			})],
		);

		let fetched = fetch(&source, &descriptor("events"), "prod", FetchOpts::default()).await;

		assert_eq!(fetched.results.len(), 1);
		let table = fetched.summary.unwrap();
		assert!(table.contains("2024-05-01T09:00:00Z\tNormal\tPulled\tPod/api-0\timage pulled"));
	}

	#[tokio::test]
	async fn test_fetch_cluster_wide_kind_ignores_namespace() {
		let source = FakeSource::default().with_objects(
			"nodes",
			[json!({"apiVersion": "v1", "kind": "Node", "metadata": {"name": "node-a"}})],
		);

		let fetched = fetch(&source, &descriptor("nodes"), "prod", FetchOpts::default()).await;

		let result = &fetched.results[0];
		assert_eq!(result.name.as_deref(), Some("node-a"));
		assert_eq!(result.namespace, None);
	}
}
