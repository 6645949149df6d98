//! HTTP-based mock Kubernetes server using wiremock.
//!
//! A real HTTP server, so clients built from a kubeconfig talk to it the same
//! way they talk to a cluster. Only reads are served: discovery, `get`,
//! `list` with label selectors, and pod logs.

use std::{collections::HashMap, sync::Arc};

use bon::Builder;
use kube::config::{
	AuthInfo, Cluster, Context, Kubeconfig, NamedAuthInfo, NamedCluster, NamedContext,
};
use serde_json::{json, Value};
use tracing::{debug, trace};
use wiremock::{
	matchers::{header_regex, method, path, path_regex},
	Mock, MockServer, Request, ResponseTemplate,
};

use super::{
	discovery::{DiscoveryMode, MockDiscovery},
	helpers::{selector_matches, status, tail},
};

/// Log text of one container.
#[derive(Debug, Clone)]
pub struct PodLog {
	pub namespace: String,
	pub pod: String,
	pub container: String,
	pub text: String,
}

impl PodLog {
	pub fn new(namespace: &str, pod: &str, container: &str, text: &str) -> Self {
		Self {
			namespace: namespace.to_string(),
			pod: pod.to_string(),
			container: container.to_string(),
			text: text.to_string(),
		}
	}
}

/// A mock Kubernetes server exposed over HTTP.
#[derive(Builder)]
pub struct HttpMockK8sServer {
	#[builder(default)]
	discovery_mode: DiscoveryMode,
	/// Resources to serve as raw manifests. The server derives API paths from
	/// apiVersion/kind using the discovery data.
	#[builder(default)]
	resources: Vec<Value>,
	#[builder(default)]
	logs: Vec<PodLog>,
	/// Resource keys (`secrets`, `applications.argoproj.io`) answered with 403.
	#[builder(default)]
	forbidden: Vec<String>,
}

/// A running HTTP mock server instance.
pub struct RunningHttpMockK8sServer {
	server: MockServer,
}

/// A stored object and where it lives.
struct Stored {
	group_version: String,
	plural: String,
	namespace: Option<String>,
	name: String,
	manifest: Value,
}

struct State {
	objects: Vec<Stored>,
	logs: HashMap<(String, String, String), String>,
	forbidden: Vec<String>,
}

impl HttpMockK8sServer {
	/// Start the mock server with all configured resources.
	pub async fn start(self) -> RunningHttpMockK8sServer {
		let server = MockServer::start().await;
		let discovery = MockDiscovery::default();

		debug!(uri = %server.uri(), "Started mock K8s server");

		let mut objects: Vec<Stored> = self
			.resources
			.into_iter()
			.filter_map(|manifest| store(manifest, &discovery))
			.collect();

		// Every namespace a resource lives in exists, as does `default`
		let mut namespaces: Vec<String> = objects
			.iter()
			.filter_map(|o| o.namespace.clone())
			.chain(["default".to_string()])
			.collect();
		namespaces.sort();
		namespaces.dedup();
		for ns in namespaces {
			let exists = objects
				.iter()
				.any(|o| o.plural == "namespaces" && o.group_version == "v1" && o.name == ns);
			if !exists {
				objects.extend(store(
					json!({"apiVersion": "v1", "kind": "Namespace", "metadata": {"name": ns}}),
					&discovery,
				));
			}
		}

		let state = State {
			objects,
			logs: self
				.logs
				.into_iter()
				.map(|l| ((l.namespace, l.pod, l.container), l.text))
				.collect(),
			forbidden: self.forbidden,
		};

		mount_version(&server).await;
		mount_discovery(&server, &discovery, self.discovery_mode).await;
		mount_resources(&server, Arc::new(state), Arc::new(discovery)).await;

		RunningHttpMockK8sServer { server }
	}
}

/// Place a manifest using discovery data; unknown kinds are dropped.
fn store(manifest: Value, discovery: &MockDiscovery) -> Option<Stored> {
	let api_version = manifest.get("apiVersion")?.as_str()?.to_string();
	let kind = manifest.get("kind")?.as_str()?;
	let name = manifest.pointer("/metadata/name")?.as_str()?.to_string();
	let resource = discovery.by_kind(&api_version, kind)?;

	let namespace = resource.namespaced.then(|| {
		manifest
			.pointer("/metadata/namespace")
			.and_then(Value::as_str)
			.unwrap_or("default")
			.to_string()
	});

	trace!(api_version = %api_version, kind, name = %name, "Registered resource");
	Some(Stored {
		group_version: api_version,
		plural: resource.name.clone(),
		namespace,
		name,
		manifest,
	})
}

impl RunningHttpMockK8sServer {
	/// Get the server's URI (e.g., "http://127.0.0.1:12345").
	pub fn uri(&self) -> String {
		self.server.uri()
	}

	/// Create a Kubeconfig pointing to this mock server.
	pub fn kubeconfig(&self) -> Kubeconfig {
		self.kubeconfig_with_context("mock-context")
	}

	/// Create a Kubeconfig pointing to this mock server with a custom context name.
	pub fn kubeconfig_with_context(&self, context_name: &str) -> Kubeconfig {
		let cluster_name = "mock-cluster";
		let user_name = "mock-user";

		Kubeconfig {
			clusters: vec![NamedCluster {
				name: cluster_name.to_string(),
				cluster: Some(Cluster {
					server: Some(self.uri()),
					insecure_skip_tls_verify: Some(true),
					..Default::default()
				}),
			}],
			contexts: vec![NamedContext {
				name: context_name.to_string(),
				context: Some(Context {
					cluster: cluster_name.to_string(),
					user: Some(user_name.to_string()),
					namespace: Some("default".to_string()),
					..Default::default()
				}),
			}],
			auth_infos: vec![NamedAuthInfo {
				name: user_name.to_string(),
				auth_info: Some(AuthInfo::default()),
			}],
			current_context: Some(context_name.to_string()),
			..Default::default()
		}
	}
}

async fn mount_version(server: &MockServer) {
	Mock::given(method("GET"))
		.and(path("/version"))
		.respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
			"major": "1",
			"minor": "31",
			"gitVersion": "v1.31.0",
			"gitCommit": "fake",
			"gitTreeState": "clean",
			"buildDate": "2025-01-01T00:00:00Z",
			"goVersion": "go1.23.0",
			"compiler": "gc",
			"platform": "linux/amd64"
		})))
		.mount(server)
		.await;
}

async fn mount_discovery(server: &MockServer, discovery: &MockDiscovery, mode: DiscoveryMode) {
	// Build aggregated discovery responses
	let core_aggregated_resources: Vec<_> = discovery
		.core_resources
		.iter()
		.map(|r| {
			serde_json::json!({
				"resource": r.name,
				"responseKind": {
					"group": "",
					"version": "v1",
					"kind": r.kind
				},
				"scope": if r.namespaced { "Namespaced" } else { "Cluster" },
				"verbs": r.verbs,
			})
		})
		.collect();

	let aggregated_core_body = serde_json::json!({
		"kind": "APIGroupDiscoveryList",
		"apiVersion": "apidiscovery.k8s.io/v2",
		"items": [{
			"metadata": {
				"name": ""
			},
			"versions": [{
				"version": "v1",
				"resources": core_aggregated_resources,
				"freshness": "Current"
			}]
		}]
	});

	let aggregated_groups: Vec<_> = discovery
		.group_resources
		.iter()
		.map(|(gv, rs)| {
			let (group, version) = gv.split_once('/').unwrap_or(("", gv));
			let resources: Vec<_> = rs
				.iter()
				.map(|r| {
					serde_json::json!({
						"resource": r.name,
						"responseKind": {
							"group": group,
							"version": version,
							"kind": r.kind
						},
						"scope": if r.namespaced { "Namespaced" } else { "Cluster" },
						"verbs": r.verbs,
					})
				})
				.collect();

			serde_json::json!({
				"metadata": {
					"name": group
				},
				"versions": [{
					"version": version,
					"resources": resources,
					"freshness": "Current"
				}]
			})
		})
		.collect();

	let aggregated_apis_body = serde_json::json!({
		"kind": "APIGroupDiscoveryList",
		"apiVersion": "apidiscovery.k8s.io/v2",
		"items": aggregated_groups
	});

	// Matched before the legacy endpoints when Accept asks for apidiscovery.
	// kube only parses the body when Content-Type names the aggregated format.
	const AGGREGATED_DISCOVERY_CONTENT_TYPE: &str =
		"application/json;g=apidiscovery.k8s.io;v=v2;as=APIGroupDiscoveryList";

	match mode {
		DiscoveryMode::Aggregated => {
			// set_body_json would overwrite the Content-Type
			let core_body = aggregated_core_body.to_string().into_bytes();
			let apis_body = aggregated_apis_body.to_string().into_bytes();

			Mock::given(method("GET"))
				.and(path("/api"))
				.and(header_regex("accept", "apidiscovery"))
				.respond_with(
					ResponseTemplate::new(200)
						.set_body_raw(core_body, AGGREGATED_DISCOVERY_CONTENT_TYPE),
				)
				.mount(server)
				.await;

			Mock::given(method("GET"))
				.and(path("/apis"))
				.and(header_regex("accept", "apidiscovery"))
				.respond_with(
					ResponseTemplate::new(200)
						.set_body_raw(apis_body, AGGREGATED_DISCOVERY_CONTENT_TYPE),
				)
				.mount(server)
				.await;
		}
		DiscoveryMode::Legacy => {
			Mock::given(method("GET"))
				.and(path("/api"))
				.and(header_regex("accept", "apidiscovery"))
				.respond_with(ResponseTemplate::new(406))
				.mount(server)
				.await;

			Mock::given(method("GET"))
				.and(path("/apis"))
				.and(header_regex("accept", "apidiscovery"))
				.respond_with(ResponseTemplate::new(406))
				.mount(server)
				.await;
		}
	}

	// Legacy discovery
	Mock::given(method("GET"))
		.and(path("/api"))
		.respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
			"kind": "APIVersions",
			"versions": ["v1"],
			"serverAddressByClientCIDRs": []
		})))
		.mount(server)
		.await;

	let groups: Vec<_> = discovery
		.group_resources
		.keys()
		.map(|gv| {
			let (group, version) = gv.split_once('/').unwrap_or(("", gv));
			serde_json::json!({
				"name": group,
				"versions": [{"groupVersion": gv, "version": version}],
				"preferredVersion": {"groupVersion": gv, "version": version}
			})
		})
		.collect();

	Mock::given(method("GET"))
		.and(path("/apis"))
		.respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
			"kind": "APIGroupList",
			"apiVersion": "v1",
			"groups": groups
		})))
		.mount(server)
		.await;

	let core_resources: Vec<_> = discovery
		.core_resources
		.iter()
		.map(|r| {
			serde_json::json!({
				"name": r.name,
				"singularName": "",
				"namespaced": r.namespaced,
				"kind": r.kind,
				"verbs": r.verbs,
			})
		})
		.collect();

	Mock::given(method("GET"))
		.and(path("/api/v1"))
		.respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
			"kind": "APIResourceList",
			"apiVersion": "v1",
			"groupVersion": "v1",
			"resources": core_resources
		})))
		.mount(server)
		.await;

	for (gv, rs) in &discovery.group_resources {
		let resources: Vec<_> = rs
			.iter()
			.map(|r| {
				serde_json::json!({
					"name": r.name,
					"singularName": "",
					"namespaced": r.namespaced,
					"kind": r.kind,
					"verbs": r.verbs,
				})
			})
			.collect();

		Mock::given(method("GET"))
			.and(path(format!("/apis/{}", gv)))
			.respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
				"kind": "APIResourceList",
				"apiVersion": "v1",
				"groupVersion": gv,
				"resources": resources
			})))
			.mount(server)
			.await;
	}
}

async fn mount_resources(server: &MockServer, state: Arc<State>, discovery: Arc<MockDiscovery>) {
	Mock::given(method("GET"))
		.and(path_regex(r"^/apis?/.+"))
		.respond_with(move |req: &Request| {
			let Some(target) = ResourcePath::parse(req.url.path()) else {
				return status(404, "NotFound", "the server could not find the requested resource");
			};
			let Some(resource) = discovery.by_name(&target.group_version, &target.plural) else {
				return status(404, "NotFound", "the server could not find the requested resource");
			};

			let group = target.group_version.split_once('/').map_or("", |(g, _)| g);
			let key = if group.is_empty() {
				target.plural.clone()
			} else {
				format!("{}.{group}", target.plural)
			};
			if state.forbidden.contains(&key) {
				return status(
					403,
					"Forbidden",
					&format!("{key} is forbidden: User \"mock-user\" cannot list resource \"{}\"", target.plural),
				);
			}

			let query: HashMap<String, String> = req.url.query_pairs().into_owned().collect();

			match (&target.name, target.subresource.as_deref()) {
				(Some(pod), Some("log")) if target.plural == "pods" => {
					let namespace = target.namespace.clone().unwrap_or_default();
					let container = query.get("container").cloned().unwrap_or_default();
					match state.logs.get(&(namespace, pod.clone(), container)) {
						Some(text) => {
							let text = match query.get("tailLines").and_then(|n| n.parse().ok()) {
								Some(n) => tail(text, n),
								None => text.clone(),
							};
							ResponseTemplate::new(200).set_body_raw(text.into_bytes(), "text/plain")
						}
						None => status(404, "NotFound", &format!("container logs for pod {pod} not found")),
					}
				}
				(Some(_), Some(_)) => status(404, "NotFound", "subresource not served"),
				(Some(name), None) => state
					.objects
					.iter()
					.find(|o| target.selects(o) && &o.name == name)
					.map_or_else(
						|| status(404, "NotFound", &format!("{} \"{name}\" not found", target.plural)),
						|o| ResponseTemplate::new(200).set_body_json(&o.manifest),
					),
				(None, _) => {
					let selector = query.get("labelSelector").map_or("", String::as_str);
					let mut items: Vec<&Stored> = state
						.objects
						.iter()
						.filter(|o| target.selects(o))
						.filter(|o| {
							selector_matches(
								o.manifest.pointer("/metadata/labels").and_then(Value::as_object),
								selector,
							)
						})
						.collect();
					items.sort_by(|a, b| (&a.namespace, &a.name).cmp(&(&b.namespace, &b.name)));

					ResponseTemplate::new(200).set_body_json(json!({
						"kind": format!("{}List", resource.kind),
						"apiVersion": target.group_version,
						"metadata": {"resourceVersion": "1"},
						"items": items.iter().map(|o| &o.manifest).collect::<Vec<_>>()
					}))
				}
			}
		})
		.mount(server)
		.await;
}

/// A resource request path, split into its parts.
#[derive(Debug, PartialEq)]
struct ResourcePath {
	group_version: String,
	namespace: Option<String>,
	plural: String,
	name: Option<String>,
	subresource: Option<String>,
}

impl ResourcePath {
	/// Parse `/api/v1[/namespaces/<ns>]/<plural>[/<name>[/<sub>]]` and the
	/// `/apis/<group>/<version>/...` equivalent.
	fn parse(path: &str) -> Option<Self> {
		let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
		let (group_version, rest) = match segments.as_slice() {
			["api", version, rest @ ..] => ((*version).to_string(), rest),
			["apis", group, version, rest @ ..] => (format!("{group}/{version}"), rest),
			_ => return None,
		};

		let owned = |s: Option<&&str>| s.map(|s| (*s).to_string());
		match rest {
			["namespaces", namespace, plural, tail @ ..] if tail.len() <= 2 => Some(Self {
				group_version,
				namespace: Some((*namespace).to_string()),
				plural: (*plural).to_string(),
				name: owned(tail.first()),
				subresource: owned(tail.get(1)),
			}),
			[plural, tail @ ..] if tail.len() <= 2 => Some(Self {
				group_version,
				namespace: None,
				plural: (*plural).to_string(),
				name: owned(tail.first()),
				subresource: owned(tail.get(1)),
			}),
			_ => None,
		}
	}

	/// Whether a stored object is under this path, ignoring its name.
	fn selects(&self, object: &Stored) -> bool {
		object.group_version == self.group_version
			&& object.plural == self.plural
			&& (self.namespace.is_none() || object.namespace == self.namespace)
	}
}
