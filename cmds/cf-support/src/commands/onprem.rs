//! Support package for a Codefresh on-premises installation.

use std::io::Write;

use anyhow::Result;
use clap::Args;

use super::{
	collect::{collect, credentials, namespace_resolver, CollectArgs, Session},
	util,
};
use crate::{
	codefresh::RuntimeDirectory,
	collect::ExtraDocument,
	config::SAAS_API_URL,
	runtime::RuntimeType,
};

#[derive(Args, Debug)]
pub struct OnpremArgs {
	#[command(flatten)]
	pub collect: CollectArgs,
}

/// Run the onprem command.
pub fn run<W: Write>(args: OnpremArgs, writer: W) -> Result<()> {
	let credentials = credentials();
	if credentials.as_ref().is_some_and(|c| c.is_saas()) {
		anyhow::bail!(
			"cannot gather on-premises data from Codefresh SaaS ({SAAS_API_URL}); \
			point the current ~/.cfconfig context or CF_URL at the on-premises instance, \
			or use the `pipelines` or `gitops` command"
		);
	}

	util::runtime()?.block_on(async {
		let session = Session::connect(args.collect.context.as_deref()).await?;

		let mut collect_args = args.collect;
		let namespace = namespace_resolver(&session, &collect_args)
			.resolve(RuntimeType::OnPrem)
			.await?;
		collect_args.namespace = Some(namespace);

		let extras = match credentials.map(|c| RuntimeDirectory::new(&c)) {
			Some(Ok(directory)) => system_documents(&directory).await,
			Some(Err(e)) => {
				tracing::warn!(error = %e, "skipping on-premises data");
				Vec::new()
			}
			None => Vec::new(),
		};

		collect(&session, RuntimeType::OnPrem, &collect_args, extras, writer).await
	})
}

/// Installation-wide documents; each one that fails is skipped.
async fn system_documents(directory: &RuntimeDirectory) -> Vec<ExtraDocument> {
	let fetched = [
		("onprem-accounts.yaml", directory.system_accounts().await),
		("onprem-runtimes.yaml", directory.system_runtime_environments().await),
		("onprem-feature-flags.yaml", directory.system_feature_flags().await),
		("onprem-total-users.yaml", directory.system_total_users().await),
	];

	fetched
		.into_iter()
		.filter_map(|(file_name, result)| match result {
			Ok(value) => Some(ExtraDocument::new(file_name, value)),
			Err(e) => {
				tracing::warn!(file = file_name, error = %e, "failed to fetch on-premises data");
				None
			}
		})
		.collect()
}
