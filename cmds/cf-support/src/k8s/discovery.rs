//! Kubernetes API resource discovery.
//!
//! Catalog entries name resources the way kubectl does (`pods`,
//! `deployments.apps`, `applications.argoproj.io`). This module asks the
//! cluster which of those it actually serves and remembers how to reach them.

use std::collections::HashMap;

use kube::{
	discovery::{verbs, ApiCapabilities, ApiResource, Scope},
	Client, Discovery,
};
use thiserror::Error;
use tracing::instrument;

use super::ResourceScope;

/// Errors that can occur during API resource discovery.
#[derive(Debug, Error)]
pub enum DiscoveryError {
	#[error("full API discovery failed")]
	FullDiscovery(#[source] kube::Error),
}

/// kubectl-style resource key: `<plural>` for the core group, `<plural>.<group>` otherwise.
pub fn resource_key(plural: &str, group: &str) -> String {
	if group.is_empty() {
		plural.to_string()
	} else {
		format!("{plural}.{group}")
	}
}

/// A listable resource served by the cluster.
#[derive(Debug, Clone)]
pub struct DiscoveredResource {
	/// The kube ApiResource for making API calls.
	pub api_resource: ApiResource,
	/// Whether this resource is namespaced or cluster-wide.
	pub scope: ResourceScope,
}

/// Index of listable resources keyed by kubectl-style resource name.
#[derive(Debug, Clone, Default)]
pub struct ResourceIndex {
	resources: HashMap<String, DiscoveredResource>,
}

impl ResourceIndex {
	/// Build the index from the cluster's discovery API.
	///
	/// Tries the aggregated discovery endpoints first (K8s 1.26+, two
	/// requests) and falls back to walking every group otherwise.
	#[instrument(skip(client))]
	pub async fn build(client: &Client) -> Result<Self, DiscoveryError> {
		let discovery = match Discovery::new(client.clone()).run_aggregated().await {
			Ok(discovery) => {
				tracing::debug!("using aggregated discovery");
				discovery
			}
			Err(e) => {
				tracing::debug!(error = %e, "aggregated discovery not available, using full discovery");
				Discovery::new(client.clone())
					.run()
					.await
					.map_err(DiscoveryError::FullDiscovery)?
			}
		};
		Ok(Self::from_discovery(&discovery))
	}

	fn from_discovery(discovery: &Discovery) -> Self {
		let mut index = Self::default();
		for group in discovery.groups() {
			for (ar, caps) in group.recommended_resources() {
				index.insert(ar, &caps);
			}
		}
		tracing::debug!(resources = index.resources.len(), "indexed API resources");
		index
	}

	fn insert(&mut self, api_resource: ApiResource, caps: &ApiCapabilities) {
		// Only listable kinds are useful for collection
		if !caps.supports_operation(verbs::LIST) {
			return;
		}
		let scope = match caps.scope {
			Scope::Namespaced => ResourceScope::Namespaced,
			Scope::Cluster => ResourceScope::ClusterWide,
		};
		let key = resource_key(&api_resource.plural, &api_resource.group);
		self.resources.insert(
			key,
			DiscoveredResource {
				api_resource,
				scope,
			},
		);
	}

	/// Look up a resource by its kubectl-style key.
	pub fn lookup(&self, key: &str) -> Option<&DiscoveredResource> {
		self.resources.get(key)
	}

	pub fn len(&self) -> usize {
		self.resources.len()
	}

	pub fn is_empty(&self) -> bool {
		self.resources.is_empty()
	}
}

#[cfg(test)]
mod tests {
	use kube::core::GroupVersionKind;

	use super::*;

	fn caps(scope: Scope, operations: &[&str]) -> ApiCapabilities {
		ApiCapabilities {
			scope,
			subresources: Vec::new(),
			operations: operations.iter().map(|op| (*op).to_string()).collect(),
		}
	}

	#[test]
	fn test_resource_key() {
		assert_eq!(resource_key("pods", ""), "pods");
		assert_eq!(resource_key("deployments", "apps"), "deployments.apps");
		assert_eq!(
			resource_key("applications", "argoproj.io"),
			"applications.argoproj.io"
		);
	}

	#[test]
	fn test_insert_tracks_scope() {
		let mut index = ResourceIndex::default();
		let pods = ApiResource::from_gvk_with_plural(&GroupVersionKind::gvk("", "v1", "Pod"), "pods");
		let nodes =
			ApiResource::from_gvk_with_plural(&GroupVersionKind::gvk("", "v1", "Node"), "nodes");
		index.insert(pods, &caps(Scope::Namespaced, &[verbs::LIST, verbs::GET]));
		index.insert(nodes, &caps(Scope::Cluster, &[verbs::LIST]));

		assert_eq!(index.len(), 2);
		assert_eq!(index.lookup("pods").unwrap().scope, ResourceScope::Namespaced);
		assert_eq!(index.lookup("nodes").unwrap().scope, ResourceScope::ClusterWide);
		assert!(index.lookup("services").is_none());
	}

	#[test]
	fn test_insert_skips_unlistable() {
		let mut index = ResourceIndex::default();
		let reviews = ApiResource::from_gvk_with_plural(
			&GroupVersionKind::gvk("authorization.k8s.io", "v1", "SelfSubjectAccessReview"),
			"selfsubjectaccessreviews",
		);
		index.insert(reviews, &caps(Scope::Cluster, &[verbs::CREATE]));
		assert!(index.is_empty());
	}
}
