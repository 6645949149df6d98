//! Read-only access to live cluster objects.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Namespace, Pod};
use kube::{
	api::{Api, DynamicObject, ListParams, LogParams},
	Client,
};
use serde_json::Value;
use thiserror::Error;
use tracing::instrument;

use super::{
	discovery::{DiscoveryError, ResourceIndex},
	ResourceScope,
};

/// Page size used when listing objects.
const LIST_PAGE_SIZE: u32 = 500;

/// Failure reported by the orchestration API.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
	/// 401 or 403.
	#[error("access denied: {0}")]
	Forbidden(String),

	#[error("not found: {0}")]
	NotFound(String),

	#[error("API error ({code}): {message}")]
	Api { code: u16, message: String },

	/// Timeouts, connection resets and similar.
	#[error("request failed: {0}")]
	Transport(String),

	#[error("unexpected response: {0}")]
	Decode(String),
}

impl From<kube::Error> for SourceError {
	fn from(error: kube::Error) -> Self {
		match error {
			kube::Error::Api(ref status) => match status.code {
				401 | 403 => Self::Forbidden(status.message.clone()),
				404 => Self::NotFound(status.message.clone()),
				code => Self::Api {
					code,
					message: status.message.clone(),
				},
			},
			kube::Error::SerdeError(e) => Self::Decode(e.to_string()),
			other => Self::Transport(other.to_string()),
		}
	}
}

/// One list query.
#[derive(Debug, Clone, Copy)]
pub struct ListRequest<'a> {
	/// kubectl-style resource key, e.g. `deployments.apps`.
	pub kind: &'a str,
	/// `None` lists cluster-wide.
	pub namespace: Option<&'a str>,
	pub label_selector: Option<&'a str>,
}

/// What the collection pipeline needs from the cluster.
#[async_trait]
pub trait ClusterSource: Send + Sync {
	/// List every live object of a kind as raw JSON.
	///
	/// `Ok(None)` means the cluster does not serve the kind at all.
	async fn list(&self, request: ListRequest<'_>) -> Result<Option<Vec<Value>>, SourceError>;

	/// Fetch the log of one container.
	async fn container_logs(
		&self,
		namespace: &str,
		pod: &str,
		container: &str,
		tail_lines: Option<i64>,
	) -> Result<String, SourceError>;

	/// Names of every namespace in the cluster.
	async fn namespaces(&self) -> Result<Vec<String>, SourceError>;
}

/// [`ClusterSource`] backed by a kube client and the cluster's discovery data.
#[derive(Clone)]
pub struct KubeSource {
	client: Client,
	index: ResourceIndex,
}

impl KubeSource {
	/// Discover served resources and wrap the client.
	pub async fn connect(client: Client) -> Result<Self, DiscoveryError> {
		let index = ResourceIndex::build(&client).await?;
		Ok(Self { client, index })
	}
}

#[async_trait]
impl ClusterSource for KubeSource {
	#[instrument(skip(self), fields(kind = request.kind, namespace = ?request.namespace))]
	async fn list(&self, request: ListRequest<'_>) -> Result<Option<Vec<Value>>, SourceError> {
		let Some(discovered) = self.index.lookup(request.kind) else {
			tracing::debug!("kind is not served by this cluster");
			return Ok(None);
		};
		let ar = &discovered.api_resource;

		let api: Api<DynamicObject> = match (discovered.scope, request.namespace) {
			(ResourceScope::Namespaced, Some(ns)) => {
				Api::namespaced_with(self.client.clone(), ns, ar)
			}
			_ => Api::all_with(self.client.clone(), ar),
		};

		let mut params = ListParams::default().limit(LIST_PAGE_SIZE);
		if let Some(selector) = request.label_selector {
			params = params.labels(selector);
		}

		let mut items = Vec::new();
		loop {
			let page = match api.list(&params).await {
				Ok(page) => page,
				// CRD removed between discovery and listing
				Err(kube::Error::Api(ref status)) if status.code == 404 => return Ok(None),
				Err(e) => return Err(e.into()),
			};

			for object in page.items {
				let mut value =
					serde_json::to_value(object).map_err(|e| SourceError::Decode(e.to_string()))?;
				// List items come back without type information
				if let Value::Object(map) = &mut value {
					map.entry("apiVersion")
						.or_insert_with(|| Value::String(ar.api_version.clone()));
					map.entry("kind")
						.or_insert_with(|| Value::String(ar.kind.clone()));
				}
				items.push(value);
			}

			match page.metadata.continue_ {
				Some(token) if !token.is_empty() => params = params.continue_token(&token),
				_ => break,
			}
		}

		tracing::debug!(count = items.len(), "listed objects");
		Ok(Some(items))
	}

	#[instrument(skip(self))]
	async fn container_logs(
		&self,
		namespace: &str,
		pod: &str,
		container: &str,
		tail_lines: Option<i64>,
	) -> Result<String, SourceError> {
		let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
		let params = LogParams {
			container: Some(container.to_string()),
			timestamps: true,
			tail_lines,
			..LogParams::default()
		};
		Ok(pods.logs(pod, &params).await?)
	}

	#[instrument(skip(self))]
	async fn namespaces(&self) -> Result<Vec<String>, SourceError> {
		let api: Api<Namespace> = Api::all(self.client.clone());
		let list = api.list(&ListParams::default()).await?;
		Ok(list
			.items
			.into_iter()
			.filter_map(|ns| ns.metadata.name)
			.collect())
	}
}

