//! The on-disk tree a run writes into before it is archived.
//!
//! Layout: `<display_group>/<kind>/[<namespace>/]<name>.{yaml,log}`. The
//! namespace segment only appears for instances living outside the run's
//! namespace, so two same-named objects from different namespaces never
//! share a path.

use std::{
	io,
	path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;

use super::{
	catalog::ResourceDescriptor,
	fetch::{CollectionResult, FetchError, KindFetch},
};
use crate::yaml::to_yaml;

pub const MANIFEST_EXTENSION: &str = "yaml";
pub const LOG_EXTENSION: &str = "log";
pub const EVENT_TABLE_FILE: &str = "_events.tsv";
pub const ARCHIVE_EXTENSION: &str = "tar.zst";

const STAMP_FORMAT: &str = "%Y-%m-%dT%H-%M-%SZ";

/// Identity of one collection run; names the staging tree and the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunId {
	runtime_slug: String,
	namespace: String,
	started_at: DateTime<Utc>,
}

impl RunId {
	pub fn new(runtime_slug: &str, namespace: &str, started_at: DateTime<Utc>) -> Self {
		Self {
			runtime_slug: runtime_slug.to_string(),
			namespace: namespace.to_string(),
			started_at,
		}
	}

	pub fn stamp(&self) -> String {
		self.started_at.format(STAMP_FORMAT).to_string()
	}

	/// `cf-support-<runtime>-<namespace>-<stamp>`
	pub fn staging_name(&self) -> String {
		format!(
			"cf-support-{}-{}-{}",
			self.runtime_slug,
			sanitize_segment(&self.namespace),
			self.stamp()
		)
	}

	/// Create a fresh staging root under `output_dir`.
	///
	/// The name is reserved by `create_dir` itself: when another run (or an
	/// archive left from one) already holds it, `-2`, `-3`, … is tried next.
	pub async fn create_staging(&self, output_dir: &Path) -> Result<StagingDir, StagingError> {
		tokio::fs::create_dir_all(output_dir)
			.await
			.map_err(|source| StagingError {
				path: output_dir.to_path_buf(),
				source,
			})?;

		let base = self.staging_name();
		let mut attempt = 1;
		loop {
			let candidate = match attempt {
				1 => output_dir.join(&base),
				n => output_dir.join(format!("{base}-{n}")),
			};
			attempt += 1;

			if tokio::fs::try_exists(archive_path_for(&candidate))
				.await
				.unwrap_or(false)
			{
				continue;
			}
			match tokio::fs::create_dir(&candidate).await {
				Ok(()) => return Ok(StagingDir::open(candidate, &self.namespace)),
				Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
				Err(source) => {
					return Err(StagingError {
						path: candidate,
						source,
					})
				}
			}
		}
	}
}

/// The staging root could not be created; nothing was fetched.
#[derive(Debug, Error)]
#[error("failed to create staging directory {}", path.display())]
pub struct StagingError {
	pub path: PathBuf,
	#[source]
	pub source: io::Error,
}

/// `<staging_root>.tar.zst`, next to the staging root.
pub fn archive_path_for(staging_root: &Path) -> PathBuf {
	let mut name = staging_root
		.file_name()
		.map(|n| n.to_os_string())
		.unwrap_or_default();
	name.push(".");
	name.push(ARCHIVE_EXTENSION);
	staging_root.with_file_name(name)
}

/// Make an object name safe to use as a single path component.
pub fn sanitize_segment(name: &str) -> String {
	match name {
		"" => "_".to_string(),
		"." => "_.".to_string(),
		".." => "_..".to_string(),
		_ => name.replace(['/', '\\'], "_"),
	}
}

/// A created staging tree.
#[derive(Debug, Clone)]
pub struct StagingDir {
	root: PathBuf,
	namespace: String,
}

impl StagingDir {
	/// Wrap an existing staging root.
	pub fn open(root: PathBuf, namespace: &str) -> Self {
		Self {
			root,
			namespace: namespace.to_string(),
		}
	}

	pub fn root(&self) -> &Path {
		&self.root
	}

	/// Directory owned by one kind.
	pub fn kind_dir(&self, descriptor: &ResourceDescriptor) -> PathBuf {
		Path::new(descriptor.display_group).join(sanitize_segment(descriptor.kind))
	}

	/// Relative path of one instance file.
	pub fn instance_path(
		&self,
		descriptor: &ResourceDescriptor,
		namespace: Option<&str>,
		name: &str,
		extension: &str,
	) -> PathBuf {
		let mut path = self.kind_dir(descriptor);
		if let Some(ns) = namespace.filter(|ns| *ns != self.namespace) {
			path.push(sanitize_segment(ns));
		}
		path.push(format!("{}.{extension}", sanitize_segment(name)));
		path
	}

	/// Write a file below the root, creating parent directories.
	pub async fn write(&self, relative: &Path, contents: &str) -> Result<(), FetchError> {
		let path = self.root.join(relative);
		let result = async {
			if let Some(parent) = path.parent() {
				tokio::fs::create_dir_all(parent).await?;
			}
			tokio::fs::write(&path, contents).await
		}
		.await;
		result.map_err(|e| FetchError::Write {
			path: relative.to_path_buf(),
			message: e.to_string(),
		})
	}

	/// Write a YAML document at the root, e.g. `cluster-version.yaml`.
	pub async fn write_document(&self, file_name: &str, value: &Value) -> Result<(), FetchError> {
		let yaml = to_yaml(value).map_err(|e| FetchError::Serialize(e.to_string()))?;
		self.write(Path::new(&sanitize_segment(file_name)), &yaml).await
	}

	/// Persist a kind's results; write failures replace the affected result.
	pub async fn write_kind(
		&self,
		descriptor: &ResourceDescriptor,
		fetched: KindFetch,
	) -> Vec<CollectionResult> {
		let mut results = fetched.results;

		for result in &mut results {
			let (Some(name), Ok(manifest)) = (&result.name, &result.manifest) else {
				continue;
			};
			let namespace = result.namespace.as_deref();

			let manifest_path =
				self.instance_path(descriptor, namespace, name, MANIFEST_EXTENSION);
			if let Err(e) = self.write(&manifest_path, manifest).await {
				tracing::warn!(error = %e, "failed to write manifest");
				result.manifest = Err(e);
				result.logs = None;
				continue;
			}

			if let Some(logs) = &result.logs {
				let log_path = self.instance_path(descriptor, namespace, name, LOG_EXTENSION);
				if let Err(e) = self.write(&log_path, logs).await {
					tracing::warn!(error = %e, "failed to write logs");
					result.log_error.get_or_insert(e);
				}
			}
		}

		if let Some(summary) = fetched.summary {
			let path = self.kind_dir(descriptor).join(EVENT_TABLE_FILE);
			if let Err(e) = self.write(&path, &summary).await {
				tracing::warn!(error = %e, "failed to write event table");
				results.push(CollectionResult::kind_failure(descriptor.kind, e));
			}
		}

		results
	}
}
