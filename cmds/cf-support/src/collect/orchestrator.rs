//! Drives the fetcher over a whole catalog.

use std::{collections::HashMap, sync::Arc};

use bon::Builder;
use tokio::{sync::Semaphore, task::JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use super::{
	catalog::{Catalog, ResourceDescriptor},
	fetch::{fetch, CollectionResult, FetchError, FetchOpts},
	report::{CollectionReport, ReportBuilder},
	staging::StagingDir,
};
use crate::k8s::source::ClusterSource;

/// Kinds fetched at the same time.
pub const DEFAULT_CONCURRENCY: usize = 4;

#[derive(Builder)]
pub struct Orchestrator {
	source: Arc<dyn ClusterSource>,
	#[builder(default = DEFAULT_CONCURRENCY)]
	concurrency: usize,
	#[builder(default)]
	fetch_opts: FetchOpts,
	#[builder(default)]
	cancel: CancellationToken,
}

impl Orchestrator {
	/// Collect every kind of `catalog` into the freshly created `staging` tree.
	///
	/// Per-kind and per-object failures end up in the report.
	#[instrument(skip(self, catalog, staging), fields(kinds = catalog.len(), staging = %staging.root().display()))]
	pub async fn run(
		&self,
		catalog: &Catalog,
		namespace: &str,
		staging: StagingDir,
	) -> CollectionReport {
		let staging = Arc::new(staging);

		let semaphore = Arc::new(Semaphore::new(self.concurrency.max(1)));
		let mut join_set = JoinSet::new();
		let mut slots = HashMap::new();

		for (index, descriptor) in catalog.iter().enumerate() {
			let task = KindTask {
				source: Arc::clone(&self.source),
				staging: Arc::clone(&staging),
				descriptor: descriptor.clone(),
				namespace: namespace.to_string(),
				opts: self.fetch_opts,
				cancel: self.cancel.clone(),
			};
			let sem = Arc::clone(&semaphore);

			let handle = join_set.spawn(async move {
				let _permit = tokio::select! {
					biased;
					() = task.cancel.cancelled() => return task.cancelled(),
					permit = sem.acquire_owned() => match permit {
						Ok(permit) => permit,
						Err(_) => return task.cancelled(),
					},
				};
				task.run().await
			});
			slots.insert(handle.id(), (index, descriptor.kind));
		}

		let mut report = ReportBuilder::new(catalog);
		while let Some(joined) = join_set.join_next_with_id().await {
			match joined {
				Ok((id, results)) => {
					if let Some((index, _)) = slots.get(&id) {
						report.record(*index, results);
					}
				}
				Err(e) => {
					let Some(&(index, kind)) = slots.get(&e.id()) else {
						continue;
					};
					tracing::error!(kind, error = %e, "collection task failed");
					report.record(
						index,
						vec![CollectionResult::kind_failure(
							kind,
							FetchError::Internal(e.to_string()),
						)],
					);
				}
			}
		}

		let report = report.finish();
		tracing::info!(
			succeeded = report.succeeded(),
			failed = report.failed(),
			log_failures = report.log_failures(),
			"collection finished"
		);
		report
	}
}

/// Everything one kind's worker owns.
struct KindTask {
	source: Arc<dyn ClusterSource>,
	staging: Arc<StagingDir>,
	descriptor: ResourceDescriptor,
	namespace: String,
	opts: FetchOpts,
	cancel: CancellationToken,
}

impl KindTask {
	async fn run(self) -> Vec<CollectionResult> {
		tracing::info!(kind = self.descriptor.kind, "collecting");
		let fetched = tokio::select! {
			biased;
			() = self.cancel.cancelled() => None,
			fetched = fetch(self.source.as_ref(), &self.descriptor, &self.namespace, self.opts) => Some(fetched),
		};
		let Some(fetched) = fetched else {
			return self.cancelled();
		};
		// Once fetched, the data is written out even if cancellation arrives
		self.staging.write_kind(&self.descriptor, fetched).await
	}

	fn cancelled(&self) -> Vec<CollectionResult> {
		tracing::debug!(kind = self.descriptor.kind, "skipped after cancellation");
		vec![CollectionResult::kind_failure(
			self.descriptor.kind,
			FetchError::Cancelled,
		)]
	}
}
