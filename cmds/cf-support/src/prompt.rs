//! Numbered-list prompts and namespace resolution.

use std::{
	io::{self, BufRead, Write},
	sync::Arc,
};

use async_trait::async_trait;
use thiserror::Error;

use crate::{
	k8s::source::{ClusterSource, SourceError},
	runtime::RuntimeType,
};

#[derive(Debug, Error)]
pub enum PromptError {
	#[error("there is nothing to choose from")]
	NoChoices,

	#[error("input ended before a choice was made")]
	EndOfInput,

	#[error("prompt was interrupted")]
	Interrupted(#[source] tokio::task::JoinError),

	#[error(transparent)]
	Io(#[from] io::Error),
}

/// Print `items` as a numbered list and read a 1-based choice.
///
/// Re-asks until the answer names an item. Returns the 0-based index.
pub fn select_from<R: BufRead, W: Write>(
	items: &[String],
	question: &str,
	mut input: R,
	mut output: W,
) -> Result<usize, PromptError> {
	if items.is_empty() {
		return Err(PromptError::NoChoices);
	}

	for (i, item) in items.iter().enumerate() {
		writeln!(output, "{}. {item}", i + 1)?;
	}

	let mut line = String::new();
	loop {
		write!(output, "\n{question} (Number): ")?;
		output.flush()?;

		line.clear();
		if input.read_line(&mut line)? == 0 {
			return Err(PromptError::EndOfInput);
		}
		match line.trim().parse::<usize>() {
			Ok(n) if (1..=items.len()).contains(&n) => return Ok(n - 1),
			_ => writeln!(
				output,
				"Invalid selection. Please enter a number between 1 and {}.",
				items.len()
			)?,
		}
	}
}

/// [`select_from`] on the process's stdin and stdout, off the async runtime.
pub async fn select_on_terminal(items: Vec<String>, question: String) -> Result<usize, PromptError> {
	tokio::task::spawn_blocking(move || {
		select_from(&items, &question, io::stdin().lock(), io::stdout().lock())
	})
	.await
	.map_err(PromptError::Interrupted)?
}

#[derive(Debug, Error)]
pub enum ResolveError {
	#[error("namespace must not be empty")]
	EmptyNamespace,

	#[error("failed to list namespaces")]
	ListNamespaces(#[source] SourceError),

	#[error(transparent)]
	Prompt(#[from] PromptError),
}

/// Decides which namespace a run collects from.
#[async_trait]
pub trait NamespaceResolver: Send + Sync {
	async fn resolve(&self, runtime: RuntimeType) -> Result<String, ResolveError>;
}

/// A namespace known up front, e.g. from `--namespace`.
#[derive(Debug, Clone)]
pub struct FixedNamespace(pub String);

#[async_trait]
impl NamespaceResolver for FixedNamespace {
	async fn resolve(&self, _runtime: RuntimeType) -> Result<String, ResolveError> {
		let namespace = self.0.trim();
		if namespace.is_empty() {
			return Err(ResolveError::EmptyNamespace);
		}
		Ok(namespace.to_string())
	}
}

/// Ask the user to pick one of the cluster's namespaces.
pub struct InteractiveNamespace {
	source: Arc<dyn ClusterSource>,
}

impl InteractiveNamespace {
	pub fn new(source: Arc<dyn ClusterSource>) -> Self {
		Self { source }
	}
}

#[async_trait]
impl NamespaceResolver for InteractiveNamespace {
	async fn resolve(&self, runtime: RuntimeType) -> Result<String, ResolveError> {
		let mut namespaces = self
			.source
			.namespaces()
			.await
			.map_err(ResolveError::ListNamespaces)?;
		namespaces.sort();

		let question = format!("Which namespace is the {runtime} installed in?");
		let index = select_on_terminal(namespaces.clone(), question).await?;
		let namespace = namespaces.swap_remove(index);
		tracing::info!(namespace = %namespace, "namespace selected");
		Ok(namespace)
	}
}
