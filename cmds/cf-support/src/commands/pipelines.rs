//! Support package for a Codefresh pipelines runtime.

use std::io::Write;

use anyhow::Result;
use clap::Args;
use serde_json::Value;

use super::{
	collect::{collect, credentials, namespace_resolver, CollectArgs, Session},
	util,
};
use crate::{
	codefresh::{runtime_name, RuntimeDirectory, RuntimeEnvironment},
	collect::ExtraDocument,
	config::Credentials,
	prompt::{select_on_terminal, NamespaceResolver},
	runtime::RuntimeType,
};

#[derive(Args, Debug)]
pub struct PipelinesArgs {
	#[command(flatten)]
	pub collect: CollectArgs,

	/// Name of the runtime environment. Chosen from the account's runtimes when omitted
	#[arg(short = 'r', long)]
	pub runtime: Option<String>,
}

/// Run the pipelines command.
pub fn run<W: Write>(args: PipelinesArgs, writer: W) -> Result<()> {
	util::runtime()?.block_on(async {
		let session = Session::connect(args.collect.context.as_deref()).await?;

		let mut collect_args = args.collect;
		let resolver = namespace_resolver(&session, &collect_args);
		let (namespace, extras) =
			prepare(resolver.as_ref(), credentials(), args.runtime.as_deref()).await?;
		collect_args.namespace = Some(namespace);

		collect(&session, RuntimeType::Pipelines, &collect_args, extras, writer).await
	})
}

/// Settle the namespace first, then look up the runtime spec.
async fn prepare(
	resolver: &dyn NamespaceResolver,
	credentials: Option<Credentials>,
	runtime: Option<&str>,
) -> Result<(String, Vec<ExtraDocument>)> {
	let namespace = resolver.resolve(RuntimeType::Pipelines).await?;

	let mut extras = Vec::new();
	if let Some(credentials) = credentials {
		match runtime_spec(&credentials, runtime).await {
			Ok(Some(spec)) => extras.push(ExtraDocument::new("runtime-spec.yaml", Value::Object(spec))),
			Ok(None) => {}
			Err(e) => tracing::warn!(error = %format!("{e:#}"), "failed to fetch the runtime spec"),
		}
	}
	Ok((namespace, extras))
}

/// The named runtime, or one picked from the account's runtimes.
async fn runtime_spec(
	credentials: &Credentials,
	name: Option<&str>,
) -> Result<Option<RuntimeEnvironment>> {
	let directory = RuntimeDirectory::new(credentials)?;
	if let Some(name) = name {
		return Ok(Some(directory.runtime_environment(name).await?));
	}

	let mut runtimes = directory.runtime_environments().await?;
	if runtimes.is_empty() {
		tracing::info!("the account has no runtime environments");
		return Ok(None);
	}

	let names = runtimes
		.iter()
		.enumerate()
		.map(|(i, re)| runtime_name(re).map_or_else(|| format!("<unnamed #{}>", i + 1), str::to_string))
		.collect();
	let index = select_on_terminal(names, "Which Pipelines Runtime are we working with?".to_string()).await?;
	Ok(Some(runtimes.swap_remove(index)))
}

#[cfg(test)]
mod tests {
	use assert_matches::assert_matches;
	use serde_json::json;
	use wiremock::{
		matchers::{method, path},
		Mock, MockServer, ResponseTemplate,
	};

	use super::*;
	use crate::prompt::{FixedNamespace, ResolveError};

	#[tokio::test]
	async fn test_prepare_resolves_namespace_before_runtime_lookup() {
		let server = MockServer::start().await;
		Mock::given(method("GET"))
			.respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
			.expect(0)
			.mount(&server)
			.await;
		let credentials = Credentials::new(&server.uri(), "token", "test");

		let result = prepare(&FixedNamespace(" ".to_string()), Some(credentials), None).await;

		let err = result.unwrap_err();
		assert_matches!(err.downcast_ref::<ResolveError>(), Some(ResolveError::EmptyNamespace));
		server.verify().await;
	}

	#[tokio::test]
	async fn test_prepare_adds_named_runtime_spec() {
		let server = MockServer::start().await;
		Mock::given(method("GET"))
			.and(path("/api/runtime-environments/hybrid"))
			.respond_with(ResponseTemplate::new(200).set_body_json(json!({
				"metadata": {"name": "hybrid"}
			})))
			.expect(1)
			.mount(&server)
			.await;
		let credentials = Credentials::new(&server.uri(), "token", "test");

		let (namespace, extras) = prepare(
			&FixedNamespace("codefresh".to_string()),
			Some(credentials),
			Some("hybrid"),
		)
		.await
		.unwrap();

		assert_eq!(namespace, "codefresh");
		assert_eq!(
			extras,
			[ExtraDocument::new("runtime-spec.yaml", json!({"metadata": {"name": "hybrid"}}))]
		);
	}

	#[tokio::test]
	async fn test_prepare_skips_failed_runtime_lookup() {
		let server = MockServer::start().await;
		Mock::given(method("GET"))
			.respond_with(ResponseTemplate::new(500))
			.mount(&server)
			.await;
		let credentials = Credentials::new(&server.uri(), "token", "test");

		let (_, extras) = prepare(
			&FixedNamespace("codefresh".to_string()),
			Some(credentials),
			Some("hybrid"),
		)
		.await
		.unwrap();

		assert!(extras.is_empty());
	}
}
