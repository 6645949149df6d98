//! Support package for a Codefresh GitOps runtime.

use std::io::Write;

use anyhow::Result;
use clap::Args;

use super::{
	collect::{collect, CollectArgs, Session},
	util,
};
use crate::runtime::RuntimeType;

#[derive(Args, Debug)]
pub struct GitopsArgs {
	#[command(flatten)]
	pub collect: CollectArgs,
}

/// Run the gitops command.
pub fn run<W: Write>(args: GitopsArgs, writer: W) -> Result<()> {
	util::runtime()?.block_on(async {
		let session = Session::connect(args.collect.context.as_deref()).await?;
		collect(&session, RuntimeType::GitOps, &args.collect, Vec::new(), writer).await
	})
}
