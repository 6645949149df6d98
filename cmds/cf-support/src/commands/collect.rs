//! The collection flow shared by every subcommand.

use std::{io::Write, path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::{builder::TypedValueParser, Args};
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::{
	collect::{
		fetch::FetchOpts, orchestrator::DEFAULT_CONCURRENCY, Bundle, ExtraDocument, Pipeline,
		PipelineError,
	},
	config::{self, Credentials},
	k8s::{client::ClusterConnection, source::KubeSource},
	prompt::{FixedNamespace, InteractiveNamespace, NamespaceResolver},
	runtime::RuntimeType,
};

#[derive(Args, Debug, Clone)]
pub struct CollectArgs {
	/// Namespace the runtime is installed in. Asked interactively when omitted
	#[arg(short = 'n', long)]
	pub namespace: Option<String>,

	/// Directory the support package is written to
	#[arg(long, default_value = ".")]
	pub output_dir: PathBuf,

	/// Number of resource kinds fetched at the same time
	#[arg(long, default_value_t = DEFAULT_CONCURRENCY, value_parser = clap::value_parser!(u16).range(1..=64).map(usize::from))]
	pub concurrency: usize,

	/// Only keep the last N lines of each container log
	#[arg(long, value_parser = clap::value_parser!(i64).range(1..))]
	pub log_tail_lines: Option<i64>,

	/// Kubeconfig context to use instead of the current one
	#[arg(long)]
	pub context: Option<String>,
}

/// Connection to the cluster a package is collected from.
pub struct Session {
	connection: ClusterConnection,
	source: Arc<KubeSource>,
}

impl Session {
	#[instrument(skip_all)]
	pub async fn connect(context: Option<&str>) -> Result<Self> {
		let connection = ClusterConnection::infer(context)
			.await
			.context("connecting to the cluster")?;
		let source = KubeSource::connect(connection.client().clone())
			.await
			.context("discovering cluster resources")?;
		tracing::info!(cluster = %connection.cluster_identifier(), "connected");
		Ok(Self {
			connection,
			source: Arc::new(source),
		})
	}

	fn cluster_version(&self) -> Option<ExtraDocument> {
		match serde_json::to_value(self.connection.server_version()) {
			Ok(value) => Some(ExtraDocument::new("cluster-version.yaml", value)),
			Err(e) => {
				tracing::warn!(error = %e, "failed to record cluster version");
				None
			}
		}
	}
}

/// Codefresh credentials, if any are configured and usable.
pub fn credentials() -> Option<Credentials> {
	match config::load() {
		Ok(Some(credentials)) => {
			tracing::info!(source = %credentials.source, "using Codefresh credentials");
			Some(credentials)
		}
		Ok(None) => {
			tracing::info!("no Codefresh credentials found, skipping Codefresh API data");
			None
		}
		Err(e) => {
			tracing::warn!(error = %e, "failed to load Codefresh credentials, skipping Codefresh API data");
			None
		}
	}
}

/// `--namespace` when given, otherwise a prompt over the cluster's namespaces.
pub fn namespace_resolver(session: &Session, args: &CollectArgs) -> Box<dyn NamespaceResolver> {
	match &args.namespace {
		Some(namespace) => Box::new(FixedNamespace(namespace.clone())),
		None => Box::new(InteractiveNamespace::new(session.source.clone())),
	}
}

/// Cancel `token` on the first Ctrl-C; exit on the second.
fn watch_interrupt(token: CancellationToken) -> tokio::task::JoinHandle<()> {
	tokio::spawn(async move {
		if tokio::signal::ctrl_c().await.is_err() {
			return;
		}
		tracing::warn!("interrupted, finishing requests already in flight (press Ctrl-C again to quit)");
		token.cancel();
		if tokio::signal::ctrl_c().await.is_ok() {
			std::process::exit(130);
		}
	})
}

/// Collect, package and report.
pub async fn collect<W: Write>(
	session: &Session,
	runtime: RuntimeType,
	args: &CollectArgs,
	mut extras: Vec<ExtraDocument>,
	mut writer: W,
) -> Result<()> {
	extras.extend(session.cluster_version());

	let resolver = namespace_resolver(session, args);

	let cancel = CancellationToken::new();
	let pipeline = Pipeline::builder()
		.source(session.source.clone())
		.output_dir(args.output_dir.clone())
		.concurrency(args.concurrency)
		.fetch_opts(FetchOpts {
			log_tail_lines: args.log_tail_lines,
		})
		.cancel(cancel.clone())
		.build();

	let watcher = watch_interrupt(cancel);
	let result = pipeline.run(runtime, resolver.as_ref(), extras).await;
	watcher.abort();

	match result {
		Ok(bundle) => write_outcome(&bundle, &mut writer),
		Err(PipelineError::Package { staging, source }) => {
			writeln!(
				writer,
				"\nPlease manually compress the directory {} and attach it to the support ticket.",
				staging.display()
			)?;
			Err(anyhow::Error::new(source).context("creating the support package"))
		}
		Err(e) => Err(e.into()),
	}
}

fn write_outcome<W: Write>(bundle: &Bundle, writer: &mut W) -> Result<()> {
	let report = &bundle.report;
	writeln!(writer)?;
	report.write_table(&mut *writer)?;

	for failure in report.failures() {
		let subject = failure.subject();
		if let Err(e) = &failure.manifest {
			writeln!(writer, "failed: {subject}: {e}")?;
		}
		if let Some(e) = &failure.log_error {
			writeln!(writer, "failed logs: {subject}: {e}")?;
		}
	}

	writeln!(
		writer,
		"\nCollected {} of {} objects from namespace '{}'.",
		report.succeeded(),
		report.attempted(),
		bundle.namespace
	)?;
	match &bundle.archive {
		Some(archive) => writeln!(
			writer,
			"Please attach {} to your support ticket.",
			archive.display()
		)?,
		None => writeln!(
			writer,
			"Collection was interrupted. The partial data is in {}.",
			bundle.staging_root.display()
		)?,
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use clap::Parser;
	use rstest::rstest;

	use super::*;
	use crate::collect::{
		catalog::Catalog,
		fetch::{CollectionResult, FetchError},
		report::ReportBuilder,
	};

	#[derive(Parser)]
	struct TestCli {
		#[command(flatten)]
		args: CollectArgs,
	}

	#[test]
	fn test_collect_args_defaults() {
		let cli = TestCli::parse_from(["cf-support"]);
		assert_eq!(cli.args.namespace, None);
		assert_eq!(cli.args.output_dir, PathBuf::from("."));
		assert_eq!(cli.args.concurrency, DEFAULT_CONCURRENCY);
		assert_eq!(cli.args.log_tail_lines, None);
	}

	#[test]
	fn test_collect_args_rejects_zero_concurrency() {
		assert!(TestCli::try_parse_from(["cf-support", "--concurrency", "0"]).is_err());
		let cli = TestCli::parse_from(["cf-support", "-n", "codefresh", "--concurrency", "8"]);
		assert_eq!(cli.args.namespace.as_deref(), Some("codefresh"));
		assert_eq!(cli.args.concurrency, 8);
	}

	#[rstest]
	#[case("0")]
	#[case("-5")]
	fn test_collect_args_rejects_non_positive_tail(#[case] lines: &str) {
		let arg = format!("--log-tail-lines={lines}");
		assert!(TestCli::try_parse_from(["cf-support", arg.as_str()]).is_err());
	}

	#[test]
	fn test_collect_args_tail_lines() {
		let cli = TestCli::parse_from(["cf-support", "--log-tail-lines", "200"]);
		assert_eq!(cli.args.log_tail_lines, Some(200));
	}

	#[test]
	fn test_write_outcome_lists_failures() {
		let catalog = Catalog::general();
		let mut builder = ReportBuilder::new(&catalog);
		builder.record(
			0,
			vec![CollectionResult::kind_failure(
				"configmaps",
				crate::k8s::source::SourceError::Forbidden("denied".to_string()).into(),
			)],
		);
		builder.record(
			catalog.iter().position(|d| d.kind == "pods").unwrap(),
			vec![CollectionResult {
				namespace: Some("codefresh".to_string()),
				..CollectionResult::kind_failure("pods", FetchError::Unnamed)
			}],
		);
		let bundle = Bundle {
			namespace: "codefresh".to_string(),
			staging_root: PathBuf::from("/tmp/cf-support-x"),
			report: builder.finish(),
			archive: Some(PathBuf::from("/tmp/cf-support-x.tar.zst")),
		};

		let mut out = Vec::new();
		write_outcome(&bundle, &mut out).unwrap();
		let out = String::from_utf8(out).unwrap();

		assert!(out.contains("failed: configmaps: access denied: denied"));
		assert!(out.contains("failed: pods/codefresh/<unnamed>: object has no metadata.name"));
		assert!(out.contains("Collected 0 of 2 objects from namespace 'codefresh'."));
		assert!(out.ends_with("Please attach /tmp/cf-support-x.tar.zst to your support ticket.\n"));
	}
}
