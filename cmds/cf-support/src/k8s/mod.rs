//! Kubernetes access for the collection pipeline.
//!
//! The pipeline only sees the [`source::ClusterSource`] capability; the
//! kube-rs backed implementation lives next to it so tests can swap it out.

pub mod client;
pub mod discovery;
pub mod source;

/// Kubernetes API resource scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceScope {
	/// Resource is namespaced (e.g., Pod, ConfigMap).
	Namespaced,

	/// Resource is cluster-wide (e.g., Node, StorageClass).
	ClusterWide,
}
