//! Support package for an open source Argo CD installation.

use std::io::Write;

use anyhow::Result;
use clap::Args;

use super::{
	collect::{collect, CollectArgs, Session},
	util,
};
use crate::runtime::RuntimeType;

#[derive(Args, Debug)]
pub struct OssArgs {
	#[command(flatten)]
	pub collect: CollectArgs,
}

/// Run the oss command.
pub fn run<W: Write>(args: OssArgs, writer: W) -> Result<()> {
	util::runtime()?.block_on(async {
		let session = Session::connect(args.collect.context.as_deref()).await?;
		collect(&session, RuntimeType::Oss, &args.collect, Vec::new(), writer).await
	})
}
