use anyhow::Result;
use cf_support::{
	commands::{self, util::BrokenPipeGuard},
	telemetry,
};
use clap::{Parser, Subcommand};

#[cfg(all(
	target_os = "linux",
	feature = "mimalloc",
	not(feature = "system-alloc")
))]
#[global_allocator]
static GLOBAL: mimallocator::Mimalloc = mimallocator::Mimalloc;

#[derive(Parser)]
#[command(name = "cf-support")]
#[command(about = "Collect Codefresh runtime diagnostics into a support package", long_about = None)]
#[command(version = env!("CF_SUPPORT_VERSION"))]
struct Cli {
	/// Log level (overrides RUST_LOG)
	#[arg(long, global = true)]
	log_level: Option<tracing::Level>,

	#[command(subcommand)]
	command: Commands,
}

#[derive(Subcommand)]
enum Commands {
	/// Support package for a GitOps runtime
	Gitops(commands::gitops::GitopsArgs),

	/// Support package for a pipelines runtime
	Pipelines(commands::pipelines::PipelinesArgs),

	/// Support package for an on-premises installation
	Onprem(commands::onprem::OnpremArgs),

	/// Support package for an open-source Argo CD installation
	Oss(commands::oss::OssArgs),
}

fn main() -> Result<()> {
	let cli = Cli::parse();

	telemetry::init(cli.log_level);

	let stdout = BrokenPipeGuard::new(std::io::stdout());

	match cli.command {
		Commands::Gitops(args) => commands::gitops::run(args, stdout),
		Commands::Pipelines(args) => commands::pipelines::run(args, stdout),
		Commands::Onprem(args) => commands::onprem::run(args, stdout),
		Commands::Oss(args) => commands::oss::run(args, stdout),
	}
}

#[cfg(test)]
mod tests {
	use clap::CommandFactory;

	use super::*;

	#[test]
	fn test_cli_is_valid() {
		Cli::command().debug_assert();
	}

	#[test]
	fn test_pipelines_runtime_flag() {
		let cli = Cli::parse_from(["cf-support", "--log-level", "debug", "pipelines", "-r", "hybrid", "-n", "cf"]);
		assert_eq!(cli.log_level, Some(tracing::Level::DEBUG));
		let Commands::Pipelines(args) = cli.command else {
			panic!("expected pipelines");
		};
		assert_eq!(args.runtime.as_deref(), Some("hybrid"));
		assert_eq!(args.collect.namespace.as_deref(), Some("cf"));
	}
}
