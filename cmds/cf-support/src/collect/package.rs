//! Turn a staging tree into a single `.tar.zst` archive.

use std::{
	fs::File,
	io::{self, BufWriter, Write},
	path::{Path, PathBuf},
};

use tar::{Builder, HeaderMode};
use thiserror::Error;
use tracing::instrument;
use walkdir::WalkDir;

const ZSTD_LEVEL: i32 = 3;

#[derive(Debug, Error)]
pub enum PackageError {
	#[error("archive {} already exists", .0.display())]
	DestinationExists(PathBuf),

	#[error("failed to read staging tree")]
	Walk(#[from] walkdir::Error),

	#[error("packaging task failed")]
	Task(#[source] tokio::task::JoinError),

	#[error("failed to write archive {}", path.display())]
	Io {
		path: PathBuf,
		#[source]
		source: io::Error,
	},
}

/// Archive `staging_root` into `destination` and remove the staging tree.
///
/// Entries are stored under the staging directory's own name, in sorted
/// order, without ownership or timestamps. The archive is written to a
/// `.partial` sibling first; on any failure that file is removed and the
/// staging tree is left untouched.
#[instrument(skip_all, fields(staging = %staging_root.display(), destination = %destination.display()))]
pub fn pack(staging_root: &Path, destination: &Path) -> Result<PathBuf, PackageError> {
	if destination.exists() {
		return Err(PackageError::DestinationExists(destination.to_path_buf()));
	}

	let mut partial = destination.as_os_str().to_os_string();
	partial.push(".partial");
	let partial = PathBuf::from(partial);

	if let Err(e) = write_archive(staging_root, &partial) {
		if let Err(cleanup) = std::fs::remove_file(&partial) {
			if cleanup.kind() != io::ErrorKind::NotFound {
				tracing::warn!(path = %partial.display(), error = %cleanup, "failed to remove partial archive");
			}
		}
		return Err(e);
	}

	std::fs::rename(&partial, destination).map_err(|source| PackageError::Io {
		path: destination.to_path_buf(),
		source,
	})?;
	tracing::info!("archive written");

	if let Err(e) = std::fs::remove_dir_all(staging_root) {
		tracing::warn!(error = %e, "archive written but staging directory could not be removed");
	}

	Ok(destination.to_path_buf())
}

fn write_archive(staging_root: &Path, archive: &Path) -> Result<(), PackageError> {
	let io_err = |source| PackageError::Io {
		path: archive.to_path_buf(),
		source,
	};

	let prefix = staging_root
		.file_name()
		.map_or_else(|| PathBuf::from("cf-support"), PathBuf::from);

	let file = File::create(archive).map_err(io_err)?;
	let encoder = zstd::Encoder::new(BufWriter::new(file), ZSTD_LEVEL).map_err(io_err)?;
	let mut builder = Builder::new(encoder);
	builder.mode(HeaderMode::Deterministic);
	builder.follow_symlinks(false);

	for entry in WalkDir::new(staging_root).sort_by_file_name() {
		let entry = entry?;
		let relative = entry
			.path()
			.strip_prefix(staging_root)
			.unwrap_or(entry.path());
		let name = prefix.join(relative);

		if entry.file_type().is_dir() {
			builder.append_dir(&name, entry.path()).map_err(io_err)?;
		} else {
			builder
				.append_path_with_name(entry.path(), &name)
				.map_err(io_err)?;
		}
	}

	let encoder = builder.into_inner().map_err(io_err)?;
	let mut writer = encoder.finish().map_err(io_err)?;
	writer.flush().map_err(io_err)?;
	writer
		.into_inner()
		.map_err(|e| io_err(e.into_error()))?
		.sync_all()
		.map_err(io_err)
}
