//! Client for the Codefresh runtime-environment API.

use reqwest::{header::AUTHORIZATION, Client, Url};
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};
use thiserror::Error;
use tracing::instrument;

use crate::config::Credentials;

/// A runtime-environment record. The API does not promise a schema, so the
/// record is kept as an open set of fields.
pub type RuntimeEnvironment = Map<String, Value>;

#[derive(Debug, Error)]
pub enum RuntimeDirectoryError {
	#[error("invalid Codefresh API URL `{0}`")]
	InvalidUrl(String),

	#[error("request to {url} failed")]
	Request {
		url: String,
		#[source]
		source: reqwest::Error,
	},

	#[error("{url} returned {status}")]
	Status { url: String, status: String },

	#[error("unexpected response from {url}")]
	Decode {
		url: String,
		#[source]
		source: reqwest::Error,
	},
}

/// Read-only view of the runtimes registered with a Codefresh account.
#[derive(Debug, Clone)]
pub struct RuntimeDirectory {
	client: Client,
	base_url: Url,
	token: String,
}

impl RuntimeDirectory {
	pub fn new(credentials: &Credentials) -> Result<Self, RuntimeDirectoryError> {
		let base_url = Url::parse(&credentials.base_url)
			.ok()
			.filter(|url| !url.cannot_be_a_base())
			.ok_or_else(|| RuntimeDirectoryError::InvalidUrl(credentials.base_url.clone()))?;
		let client = Client::builder()
			.user_agent(concat!("cf-support/", env!("CF_SUPPORT_VERSION")))
			.build()
			.map_err(|source| RuntimeDirectoryError::Request {
				url: credentials.base_url.clone(),
				source,
			})?;
		Ok(Self {
			client,
			base_url,
			token: credentials.token.clone(),
		})
	}

	/// `{base}/a/b`, each segment percent-encoded.
	fn url(&self, segments: &[&str]) -> Url {
		let mut url = self.base_url.clone();
		if let Ok(mut path) = url.path_segments_mut() {
			path.pop_if_empty().extend(segments);
		}
		url
	}

	async fn get<T: DeserializeOwned>(&self, url: Url) -> Result<T, RuntimeDirectoryError> {
		let display = url.to_string();
		let response = self
			.client
			.get(url)
			.header(AUTHORIZATION, &self.token)
			.send()
			.await
			.map_err(|source| RuntimeDirectoryError::Request {
				url: display.clone(),
				source,
			})?;

		let status = response.status();
		if status != reqwest::StatusCode::OK {
			return Err(RuntimeDirectoryError::Status {
				url: display,
				status: status.to_string(),
			});
		}

		response
			.json()
			.await
			.map_err(|source| RuntimeDirectoryError::Decode {
				url: display,
				source,
			})
	}

	/// Every runtime environment of the account.
	#[instrument(skip(self))]
	pub async fn runtime_environments(&self) -> Result<Vec<RuntimeEnvironment>, RuntimeDirectoryError> {
		self.get(self.url(&["runtime-environments"])).await
	}

	/// One runtime environment by name.
	#[instrument(skip(self))]
	pub async fn runtime_environment(&self, name: &str) -> Result<RuntimeEnvironment, RuntimeDirectoryError> {
		self.get(self.url(&["runtime-environments", name])).await
	}

	/// All accounts of an on-premises installation.
	#[instrument(skip(self))]
	pub async fn system_accounts(&self) -> Result<Value, RuntimeDirectoryError> {
		self.get(self.url(&["admin", "accounts"])).await
	}

	/// All runtime environments of an on-premises installation.
	#[instrument(skip(self))]
	pub async fn system_runtime_environments(&self) -> Result<Value, RuntimeDirectoryError> {
		self.get(self.url(&["admin", "runtime-environments"])).await
	}

	#[instrument(skip(self))]
	pub async fn system_feature_flags(&self) -> Result<Value, RuntimeDirectoryError> {
		self.get(self.url(&["admin", "features"])).await
	}

	/// `{totalUsers: n}` for an on-premises installation.
	#[instrument(skip(self))]
	pub async fn system_total_users(&self) -> Result<Value, RuntimeDirectoryError> {
		let mut url = self.url(&["admin", "user"]);
		url.query_pairs_mut()
			.append_pair("limit", "1")
			.append_pair("page", "1");
		let users: Value = self.get(url).await?;
		Ok(json!({ "totalUsers": users.get("total").cloned().unwrap_or(Value::Null) }))
	}
}

/// Display name of a runtime-environment record.
pub fn runtime_name(runtime: &RuntimeEnvironment) -> Option<&str> {
	runtime
		.get("metadata")
		.and_then(|m| m.get("name"))
		.and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	fn directory(base_url: &str) -> RuntimeDirectory {
		RuntimeDirectory::new(&Credentials::new(base_url, "token", "test")).unwrap()
	}

	#[test]
	fn test_url_encodes_segments() {
		let dir = directory("https://cf.example.com/");
		assert_eq!(
			dir.url(&["runtime-environments", "prod/runtime 1"]).as_str(),
			"https://cf.example.com/api/runtime-environments/prod%2Fruntime%201"
		);
	}

	#[test]
	fn test_invalid_url() {
		let result = RuntimeDirectory::new(&Credentials::new("not a url", "token", "test"));
		assert!(matches!(result, Err(RuntimeDirectoryError::InvalidUrl(_))));
	}

	#[test]
	fn test_runtime_name() {
		let runtime = json!({"metadata": {"name": "codefresh-hosted"}});
		assert_eq!(
			runtime_name(runtime.as_object().unwrap()),
			Some("codefresh-hosted")
		);
		assert_eq!(runtime_name(&RuntimeEnvironment::new()), None);
	}
}
