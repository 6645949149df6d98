//! Mock Kubernetes API server for testing.
//!
//! Serves discovery, read-only listing and pod logs over HTTP so that
//! kubeconfig-based clients can be pointed at it.

pub mod discovery;
mod helpers;
pub mod http;

pub use discovery::{DiscoveryMode, MockApiResource, MockDiscovery};
pub use http::{HttpMockK8sServer, PodLog, RunningHttpMockK8sServer};
