//! The kinds of Codefresh installation a support package can be built for.

use std::fmt;

use crate::collect::catalog::{Catalog, CatalogError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuntimeType {
	GitOps,
	Pipelines,
	OnPrem,
	Oss,
}

impl RuntimeType {
	pub fn label(self) -> &'static str {
		match self {
			Self::GitOps => "GitOps Runtime",
			Self::Pipelines => "Pipelines Runtime",
			Self::OnPrem => "OnPrem",
			Self::Oss => "OSS ArgoCD",
		}
	}

	/// Lower-cased, hyphenated label used in file names.
	pub fn slug(self) -> String {
		self.label()
			.split_whitespace()
			.map(str::to_lowercase)
			.collect::<Vec<_>>()
			.join("-")
	}

	/// Resource kinds collected for this runtime type.
	pub fn catalog(self) -> Result<Catalog, CatalogError> {
		let general = Catalog::general();
		match self {
			Self::GitOps => general
				.union(Catalog::argo())?
				.union(Catalog::codefresh()),
			Self::Oss => general.union(Catalog::argo()),
			Self::Pipelines | Self::OnPrem => Ok(general),
		}
	}
}

impl fmt::Display for RuntimeType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.label())
	}
}
