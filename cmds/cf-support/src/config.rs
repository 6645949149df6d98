//! Codefresh API credentials.
//!
//! Credentials come from `CF_API_KEY` and `CF_URL` when both are set, and
//! from the current context of `~/.cfconfig` otherwise. Having none is not an
//! error; callers skip the API-backed steps.

use std::{
	collections::HashMap,
	path::{Path, PathBuf},
};

use serde::Deserialize;
use thiserror::Error;

pub const API_KEY_ENV: &str = "CF_API_KEY";
pub const URL_ENV: &str = "CF_URL";
pub const CFCONFIG_FILE: &str = ".cfconfig";

/// API base of the hosted Codefresh platform.
pub const SAAS_API_URL: &str = "https://g.codefresh.io/api";

#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("failed to read {}", path.display())]
	Read {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("failed to parse {}", path.display())]
	Parse {
		path: PathBuf,
		#[source]
		source: serde_yaml_with_quirks::Error,
	},

	#[error("current context `{0}` is not defined in the Codefresh config")]
	UnknownContext(String),
}

/// Where and how to reach the Codefresh API.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
	/// API base, always ending in `/api`.
	pub base_url: String,
	/// Sent verbatim as the `Authorization` header.
	pub token: String,
	/// Context name, or `env` when taken from the environment.
	pub source: String,
}

impl std::fmt::Debug for Credentials {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Credentials")
			.field("base_url", &self.base_url)
			.field("source", &self.source)
			.finish_non_exhaustive()
	}
}

impl Credentials {
	pub fn new(url: &str, token: impl Into<String>, source: impl Into<String>) -> Self {
		Self {
			base_url: api_base(url),
			token: token.into(),
			source: source.into(),
		}
	}

	pub fn is_saas(&self) -> bool {
		self.base_url == SAAS_API_URL
	}
}

/// `https://host/` becomes `https://host/api`.
pub fn api_base(url: &str) -> String {
	format!("{}/api", url.trim().trim_end_matches('/'))
}

#[derive(Debug, Deserialize)]
struct CfConfig {
	#[serde(default)]
	contexts: HashMap<String, CfContext>,
	#[serde(rename = "current-context")]
	current_context: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CfContext {
	url: String,
	token: String,
}

/// Load credentials from the environment, then `~/.cfconfig`.
pub fn load() -> Result<Option<Credentials>, ConfigError> {
	if let Some(credentials) = from_env(
		std::env::var(API_KEY_ENV).ok(),
		std::env::var(URL_ENV).ok(),
	) {
		tracing::debug!("using Codefresh credentials from the environment");
		return Ok(Some(credentials));
	}

	let Some(path) = dirs::home_dir().map(|home| home.join(CFCONFIG_FILE)) else {
		tracing::debug!("no home directory, skipping Codefresh config");
		return Ok(None);
	};
	from_cfconfig(&path)
}

/// Credentials from an API key and URL pair; both must be non-empty.
pub fn from_env(api_key: Option<String>, url: Option<String>) -> Option<Credentials> {
	match (api_key, url) {
		(Some(key), Some(url)) if !key.is_empty() && !url.is_empty() => {
			Some(Credentials::new(&url, key, "env"))
		}
		_ => None,
	}
}

/// Credentials from the current context of a Codefresh config file.
///
/// A missing file or a file without a current context yields `None`.
pub fn from_cfconfig(path: &Path) -> Result<Option<Credentials>, ConfigError> {
	let contents = match std::fs::read_to_string(path) {
		Ok(contents) => contents,
		Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
			tracing::debug!(path = %path.display(), "no Codefresh config file");
			return Ok(None);
		}
		Err(source) => {
			return Err(ConfigError::Read {
				path: path.to_path_buf(),
				source,
			})
		}
	};

	let config: CfConfig =
		serde_yaml_with_quirks::from_str(&contents).map_err(|source| ConfigError::Parse {
			path: path.to_path_buf(),
			source,
		})?;

	let Some(current) = config.current_context else {
		return Ok(None);
	};
	let context = config
		.contexts
		.get(&current)
		.ok_or_else(|| ConfigError::UnknownContext(current.clone()))?;

	tracing::debug!(context = %current, "using Codefresh config context");
	Ok(Some(Credentials::new(&context.url, &context.token, current)))
}
