//! Declarative catalogs of the resource kinds a support package collects.
//!
//! A descriptor says how to list a kind and where its files go. Catalogs are
//! plain ordered lists; their order is the order kinds are scheduled in.

use thiserror::Error;

use crate::k8s::ResourceScope;

/// Always stripped: server-side bookkeeping that bloats every manifest.
pub const MANAGED_FIELDS: &str = "/metadata/managedFields";

/// Label carried by every volume the pipelines runtime provisions.
const CODEFRESH_ACCOUNT_LABEL: &str = "io.codefresh.accountName";

const LAST_APPLIED: &str = "/metadata/annotations/kubectl.kubernetes.io~1last-applied-configuration";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CatalogError {
	#[error("resource kind `{0}` appears more than once in the catalog")]
	DuplicateKind(String),
}

/// Extra rendering produced from a kind's complete listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Summary {
	/// `kubectl get events`-style table, oldest first.
	EventTable,
}

/// How to collect one resource kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceDescriptor {
	/// kubectl-style resource key (`pods`, `deployments.apps`, ...). Unique within a catalog.
	pub kind: &'static str,
	pub scope: ResourceScope,
	/// Fetch container logs for every instance.
	pub supports_logs: bool,
	/// Top-level directory in the staging tree.
	pub display_group: &'static str,
	pub label_selector: Option<&'static str>,
	/// JSON pointers removed from each object before it is written.
	pub redact: &'static [&'static str],
	pub summary: Option<Summary>,
}

impl ResourceDescriptor {
	pub const fn namespaced(display_group: &'static str, kind: &'static str) -> Self {
		Self {
			kind,
			scope: ResourceScope::Namespaced,
			supports_logs: false,
			display_group,
			label_selector: None,
			redact: &[],
			summary: None,
		}
	}

	pub const fn cluster_wide(display_group: &'static str, kind: &'static str) -> Self {
		Self {
			scope: ResourceScope::ClusterWide,
			..Self::namespaced(display_group, kind)
		}
	}

	pub const fn with_logs(self) -> Self {
		Self {
			supports_logs: true,
			..self
		}
	}

	pub const fn with_label_selector(self, selector: &'static str) -> Self {
		Self {
			label_selector: Some(selector),
			..self
		}
	}

	pub const fn with_redactions(self, redact: &'static [&'static str]) -> Self {
		Self { redact, ..self }
	}

	pub const fn with_summary(self, summary: Summary) -> Self {
		Self {
			summary: Some(summary),
			..self
		}
	}

	/// Every pointer to strip from an instance, managedFields first.
	pub fn redactions(&self) -> impl Iterator<Item = &'static str> + '_ {
		std::iter::once(MANAGED_FIELDS).chain(self.redact.iter().copied())
	}
}

const GENERAL: &str = "general";
const ARGO: &str = "argo";
const CODEFRESH: &str = "codefresh";

const GENERAL_KINDS: &[ResourceDescriptor] = &[
	ResourceDescriptor::namespaced(GENERAL, "configmaps").with_redactions(&[LAST_APPLIED]),
	ResourceDescriptor::namespaced(GENERAL, "cronjobs.batch"),
	ResourceDescriptor::namespaced(GENERAL, "daemonsets.apps"),
	ResourceDescriptor::namespaced(GENERAL, "deployments.apps"),
	ResourceDescriptor::namespaced(GENERAL, "events").with_summary(Summary::EventTable),
	ResourceDescriptor::namespaced(GENERAL, "jobs.batch"),
	ResourceDescriptor::cluster_wide(GENERAL, "nodes"),
	ResourceDescriptor::namespaced(GENERAL, "pods").with_logs(),
	ResourceDescriptor::namespaced(GENERAL, "serviceaccounts"),
	ResourceDescriptor::namespaced(GENERAL, "services"),
	ResourceDescriptor::namespaced(GENERAL, "statefulsets.apps"),
	ResourceDescriptor::namespaced(GENERAL, "persistentvolumeclaims")
		.with_label_selector(CODEFRESH_ACCOUNT_LABEL),
	ResourceDescriptor::cluster_wide(GENERAL, "persistentvolumes")
		.with_label_selector(CODEFRESH_ACCOUNT_LABEL),
	ResourceDescriptor::cluster_wide(GENERAL, "storageclasses.storage.k8s.io"),
];

const ARGO_KINDS: &[ResourceDescriptor] = &[
	ResourceDescriptor::namespaced(ARGO, "analysisruns.argoproj.io"),
	ResourceDescriptor::namespaced(ARGO, "analysistemplates.argoproj.io"),
	ResourceDescriptor::namespaced(ARGO, "applications.argoproj.io"),
	ResourceDescriptor::namespaced(ARGO, "applicationsets.argoproj.io"),
	ResourceDescriptor::namespaced(ARGO, "appprojects.argoproj.io"),
	ResourceDescriptor::namespaced(ARGO, "eventbus.argoproj.io"),
	ResourceDescriptor::namespaced(ARGO, "eventsources.argoproj.io"),
	ResourceDescriptor::namespaced(ARGO, "experiments.argoproj.io"),
	ResourceDescriptor::namespaced(ARGO, "rollouts.argoproj.io"),
	ResourceDescriptor::namespaced(ARGO, "sensors.argoproj.io"),
];

const CODEFRESH_KINDS: &[ResourceDescriptor] = &[
	ResourceDescriptor::namespaced(CODEFRESH, "products.codefresh.io"),
	ResourceDescriptor::namespaced(CODEFRESH, "promotionflows.codefresh.io"),
	ResourceDescriptor::namespaced(CODEFRESH, "promotionpolicies.codefresh.io"),
	ResourceDescriptor::namespaced(CODEFRESH, "promotiontemplates.codefresh.io"),
	ResourceDescriptor::namespaced(CODEFRESH, "restrictedgitsources.codefresh.io"),
];

/// An ordered set of descriptors with unique kinds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
	descriptors: Vec<ResourceDescriptor>,
}

impl Catalog {
	pub fn new(
		descriptors: impl IntoIterator<Item = ResourceDescriptor>,
	) -> Result<Self, CatalogError> {
		Self::default().extend(descriptors)
	}

	/// Core Kubernetes workloads, config, storage and events.
	pub fn general() -> Self {
		Self {
			descriptors: GENERAL_KINDS.to_vec(),
		}
	}

	/// Argo CD, Argo Rollouts and Argo Events custom resources.
	pub fn argo() -> Self {
		Self {
			descriptors: ARGO_KINDS.to_vec(),
		}
	}

	/// Codefresh GitOps promotion custom resources.
	pub fn codefresh() -> Self {
		Self {
			descriptors: CODEFRESH_KINDS.to_vec(),
		}
	}

	/// Append another catalog, keeping declared order.
	pub fn union(self, other: Catalog) -> Result<Self, CatalogError> {
		self.extend(other.descriptors)
	}

	fn extend(
		mut self,
		descriptors: impl IntoIterator<Item = ResourceDescriptor>,
	) -> Result<Self, CatalogError> {
		for descriptor in descriptors {
			if self.get(descriptor.kind).is_some() {
				return Err(CatalogError::DuplicateKind(descriptor.kind.to_string()));
			}
			self.descriptors.push(descriptor);
		}
		Ok(self)
	}

	pub fn get(&self, kind: &str) -> Option<&ResourceDescriptor> {
		self.descriptors.iter().find(|d| d.kind == kind)
	}

	pub fn iter(&self) -> impl Iterator<Item = &ResourceDescriptor> {
		self.descriptors.iter()
	}

	pub fn len(&self) -> usize {
		self.descriptors.len()
	}

	pub fn is_empty(&self) -> bool {
		self.descriptors.is_empty()
	}
}

impl<'a> IntoIterator for &'a Catalog {
	type Item = &'a ResourceDescriptor;
	type IntoIter = std::slice::Iter<'a, ResourceDescriptor>;

	fn into_iter(self) -> Self::IntoIter {
		self.descriptors.iter()
	}
}

#[cfg(test)]
mod tests {
	use std::collections::HashSet;

	use assert_matches::assert_matches;

	use super::*;

	#[test]
	fn test_builtin_catalogs_union_cleanly() {
		let all = Catalog::general()
			.union(Catalog::argo())
			.and_then(|c| c.union(Catalog::codefresh()))
			.unwrap();
		assert_eq!(
			all.len(),
			GENERAL_KINDS.len() + ARGO_KINDS.len() + CODEFRESH_KINDS.len()
		);

		let kinds: HashSet<_> = all.iter().map(|d| d.kind).collect();
		assert_eq!(kinds.len(), all.len());
	}

	#[test]
	fn test_union_keeps_declared_order() {
		let all = Catalog::general().union(Catalog::argo()).unwrap();
		let kinds: Vec<_> = all.iter().map(|d| d.kind).collect();
		assert_eq!(kinds.first(), Some(&"configmaps"));
		assert_eq!(kinds[GENERAL_KINDS.len()], "analysisruns.argoproj.io");
		assert_eq!(kinds.last(), Some(&"sensors.argoproj.io"));
	}

	#[test]
	fn test_union_rejects_duplicate_kind() {
		let extra =
			Catalog::new([ResourceDescriptor::namespaced("extra", "pods").with_logs()]).unwrap();
		assert_matches!(
			Catalog::general().union(extra),
			Err(CatalogError::DuplicateKind(kind)) if kind == "pods"
		);
	}

	#[test]
	fn test_new_rejects_duplicate_kind() {
		let result = Catalog::new([
			ResourceDescriptor::namespaced(GENERAL, "services"),
			ResourceDescriptor::cluster_wide(GENERAL, "services"),
		]);
		assert_matches!(result, Err(CatalogError::DuplicateKind(_)));
	}

	#[test]
	fn test_descriptor_builders() {
		let pods = Catalog::general().get("pods").cloned().unwrap();
		assert!(pods.supports_logs);
		assert_eq!(pods.scope, ResourceScope::Namespaced);

		let pvs = Catalog::general().get("persistentvolumes").cloned().unwrap();
		assert_eq!(pvs.scope, ResourceScope::ClusterWide);
		assert_eq!(pvs.label_selector, Some(CODEFRESH_ACCOUNT_LABEL));

		let configmaps = Catalog::general().get("configmaps").cloned().unwrap();
		let redactions: Vec<_> = configmaps.redactions().collect();
		assert_eq!(redactions, vec![MANAGED_FIELDS, LAST_APPLIED]);
	}
}
