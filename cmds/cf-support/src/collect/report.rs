//! Aggregated outcome of a collection run.

use std::io::{self, Write};

use tabwriter::TabWriter;

use super::{
	catalog::Catalog,
	fetch::{CollectionResult, FetchError},
};

/// Per-kind counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KindSummary {
	pub kind: &'static str,
	pub display_group: &'static str,
	/// Named objects found, whether or not they were collected.
	pub instances: usize,
	pub manifests_ok: usize,
	pub manifest_failures: usize,
	pub log_failures: usize,
}

/// Immutable report handed back once every kind is done.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionReport {
	results: Vec<CollectionResult>,
	kinds: Vec<KindSummary>,
}

impl CollectionReport {
	/// Every result, in catalog order.
	pub fn results(&self) -> &[CollectionResult] {
		&self.results
	}

	pub fn kinds(&self) -> &[KindSummary] {
		&self.kinds
	}

	pub fn kind(&self, kind: &str) -> Option<&KindSummary> {
		self.kinds.iter().find(|k| k.kind == kind)
	}

	pub fn succeeded(&self) -> usize {
		self.kinds.iter().map(|k| k.manifests_ok).sum()
	}

	pub fn failed(&self) -> usize {
		self.kinds.iter().map(|k| k.manifest_failures).sum()
	}

	pub fn log_failures(&self) -> usize {
		self.kinds.iter().map(|k| k.log_failures).sum()
	}

	pub fn attempted(&self) -> usize {
		self.succeeded() + self.failed()
	}

	/// Whether any kind was skipped or interrupted by cancellation.
	pub fn was_cancelled(&self) -> bool {
		self.results
			.iter()
			.any(|r| matches!(r.manifest, Err(FetchError::Cancelled)))
	}

	pub fn failures(&self) -> impl Iterator<Item = &CollectionResult> {
		self.results
			.iter()
			.filter(|r| r.manifest.is_err() || r.log_error.is_some())
	}

	/// Render the per-kind table followed by totals.
	pub fn write_table<W: Write>(&self, writer: W) -> io::Result<()> {
		let mut tw = TabWriter::new(writer).padding(2);
		writeln!(tw, "KIND\tINSTANCES\tMANIFESTS\tFAILED\tLOG FAILURES")?;
		for kind in &self.kinds {
			writeln!(
				tw,
				"{}\t{}\t{}\t{}\t{}",
				kind.kind,
				kind.instances,
				kind.manifests_ok,
				kind.manifest_failures,
				kind.log_failures
			)?;
		}
		writeln!(
			tw,
			"TOTAL\t{}\t{}\t{}\t{}",
			self.kinds.iter().map(|k| k.instances).sum::<usize>(),
			self.succeeded(),
			self.failed(),
			self.log_failures()
		)?;
		tw.flush()
	}
}

/// Accumulates results per catalog slot; the only writer to the report.
#[derive(Debug)]
pub struct ReportBuilder {
	slots: Vec<(KindSummary, Vec<CollectionResult>)>,
}

impl ReportBuilder {
	pub fn new(catalog: &Catalog) -> Self {
		Self {
			slots: catalog
				.iter()
				.map(|d| {
					(
						KindSummary {
							kind: d.kind,
							display_group: d.display_group,
							..KindSummary::default()
						},
						Vec::new(),
					)
				})
				.collect(),
		}
	}

	/// Record the results of the kind at `index` in the catalog.
	pub fn record(&mut self, index: usize, results: Vec<CollectionResult>) {
		let Some((summary, slot)) = self.slots.get_mut(index) else {
			tracing::warn!(index, "result for unknown catalog slot dropped");
			return;
		};
		for result in &results {
			if !result.is_kind_failure() {
				summary.instances += 1;
			}
			match result.manifest {
				Ok(_) => summary.manifests_ok += 1,
				Err(_) => summary.manifest_failures += 1,
			}
			if result.log_error.is_some() {
				summary.log_failures += 1;
			}
		}
		slot.extend(results);
	}

	pub fn finish(self) -> CollectionReport {
		let mut report = CollectionReport::default();
		for (summary, results) in self.slots {
			report.kinds.push(summary);
			report.results.extend(results);
		}
		report
	}
}
