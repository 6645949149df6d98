//! The collection and packaging pipeline.
//!
//! A run resolves a namespace, fetches every kind of the runtime's catalog
//! into a fresh staging tree, adds any extra documents, and archives the
//! tree. Individual fetch or write failures are reported, never fatal; only
//! resolving the namespace, creating the staging tree and writing the
//! archive can fail a run.

pub mod catalog;
pub mod events;
pub mod fetch;
pub mod orchestrator;
pub mod package;
pub mod report;
pub mod staging;

use std::{path::PathBuf, sync::Arc};

use bon::Builder;
use chrono::Utc;
use serde_json::Value;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use self::{
	catalog::CatalogError,
	fetch::FetchOpts,
	orchestrator::{Orchestrator, DEFAULT_CONCURRENCY},
	package::PackageError,
	report::CollectionReport,
	staging::{archive_path_for, RunId, StagingError},
};
use crate::{
	k8s::source::ClusterSource,
	prompt::{NamespaceResolver, ResolveError},
	runtime::RuntimeType,
};

#[derive(Debug, Error)]
pub enum PipelineError {
	#[error("could not determine the namespace to collect from")]
	Resolve(#[from] ResolveError),

	#[error(transparent)]
	Catalog(#[from] CatalogError),

	#[error(transparent)]
	Staging(#[from] StagingError),

	#[error("failed to package {}; the collected data was kept there", staging.display())]
	Package {
		staging: PathBuf,
		#[source]
		source: PackageError,
	},
}

/// A YAML document written at the staging root after collection.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtraDocument {
	pub file_name: String,
	pub value: Value,
}

impl ExtraDocument {
	pub fn new(file_name: impl Into<String>, value: Value) -> Self {
		Self {
			file_name: file_name.into(),
			value,
		}
	}
}

/// What a finished run produced.
#[derive(Debug)]
pub struct Bundle {
	pub namespace: String,
	pub staging_root: PathBuf,
	pub report: CollectionReport,
	/// `None` when the run was cancelled; the staging tree is kept instead.
	pub archive: Option<PathBuf>,
}

#[derive(Builder)]
pub struct Pipeline {
	source: Arc<dyn ClusterSource>,
	/// Where staging trees and archives are created.
	#[builder(into)]
	output_dir: PathBuf,
	#[builder(default = DEFAULT_CONCURRENCY)]
	concurrency: usize,
	#[builder(default)]
	fetch_opts: FetchOpts,
	#[builder(default)]
	cancel: CancellationToken,
}

impl Pipeline {
	#[instrument(skip_all, fields(runtime = %runtime))]
	pub async fn run(
		&self,
		runtime: RuntimeType,
		resolver: &dyn NamespaceResolver,
		extras: Vec<ExtraDocument>,
	) -> Result<Bundle, PipelineError> {
		let namespace = resolver.resolve(runtime).await?;
		let catalog = runtime.catalog()?;

		let staging = RunId::new(&runtime.slug(), &namespace, Utc::now())
			.create_staging(&self.output_dir)
			.await?;
		let staging_root = staging.root().to_path_buf();

		tracing::info!(namespace = %namespace, "gathering data for the {runtime}");
		let report = Orchestrator::builder()
			.source(Arc::clone(&self.source))
			.concurrency(self.concurrency)
			.fetch_opts(self.fetch_opts)
			.cancel(self.cancel.clone())
			.build()
			.run(&catalog, &namespace, staging.clone())
			.await;

		for extra in &extras {
			if let Err(e) = staging.write_document(&extra.file_name, &extra.value).await {
				tracing::warn!(file = %extra.file_name, error = %e, "failed to write extra document");
			}
		}

		if report.was_cancelled() {
			tracing::warn!(staging = %staging_root.display(), "run cancelled, staging directory kept");
			return Ok(Bundle {
				namespace,
				staging_root,
				report,
				archive: None,
			});
		}

		tracing::info!("preparing the support package");
		let destination = archive_path_for(&staging_root);
		let root = staging_root.clone();
		let archive = tokio::task::spawn_blocking(move || package::pack(&root, &destination))
			.await
			.unwrap_or_else(|e| Err(PackageError::Task(e)))
			.map_err(|source| PipelineError::Package {
				staging: staging_root.clone(),
				source,
			})?;

		Ok(Bundle {
			namespace,
			staging_root,
			report,
			archive: Some(archive),
		})
	}
}
