//! Tar archive construction for staging host files into a container.
//!
//! Each [`FileCopy`] becomes one regular-file entry whose archive path is the
//! container path relative to `/`. The archive is extracted at the container
//! root, so intermediate directories are created by the engine.

use std::io;
use std::path::PathBuf;

use camino::Utf8Path;
use cap_std::ambient_authority;
use cap_std::fs::Metadata;
use cap_std::fs_utf8::Dir;
use tar::{Builder, EntryType, Header};

use crate::error::FilesystemError;
use crate::spec::FileCopy;

const DEFAULT_FILE_MODE: u32 = 0o644;
const ARCHIVE_LABEL: &str = "<copy archive>";

/// Build a tar archive holding every file in `files`.
///
/// # Errors
///
/// Returns `FilesystemError::NotFound` when a host file has vanished since
/// the spec was validated, or `FilesystemError::IoError` when it cannot be
/// read.
pub(crate) fn build_copy_archive(files: &[FileCopy]) -> Result<Vec<u8>, FilesystemError> {
    let mut builder = Builder::new(vec![]);

    for file in files {
        append_host_file(&mut builder, file)
            .map_err(|error| map_io_error(file.host_path(), &error))?;
    }

    builder.finish().map_err(|error| archive_error(&error))?;
    builder.into_inner().map_err(|error| archive_error(&error))
}

fn archive_error(error: &io::Error) -> FilesystemError {
    FilesystemError::IoError {
        path: PathBuf::from(ARCHIVE_LABEL),
        message: error.to_string(),
    }
}

fn append_host_file(builder: &mut Builder<Vec<u8>>, file: &FileCopy) -> io::Result<()> {
    let host_path = file.host_path();
    let (parent, file_name) = split_host_path(host_path)?;
    let parent_dir = Dir::open_ambient_dir(parent, ambient_authority())?;

    let metadata = parent_dir.metadata(file_name)?;
    let mut handle = parent_dir.open(file_name)?;

    let mut header = Header::new_gnu();
    header.set_entry_type(EntryType::Regular);
    header.set_size(metadata.len());
    header.set_mode(metadata_mode(&metadata, DEFAULT_FILE_MODE));
    header.set_cksum();

    builder.append_data(&mut header, archive_path(file.container_path()), &mut handle)
}

fn split_host_path(path: &Utf8Path) -> io::Result<(&Utf8Path, &str)> {
    let file_name = path.file_name().ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, "host path has no file name")
    })?;
    let parent = path
        .parent()
        .filter(|parent| !parent.as_str().is_empty())
        .unwrap_or_else(|| Utf8Path::new("."));

    Ok((parent, file_name))
}

/// Archive entry path for an absolute container path.
pub(crate) fn archive_path(container_path: &str) -> String {
    container_path.trim_start_matches('/').replace('\\', "/")
}

fn map_io_error(path: &Utf8Path, error: &io::Error) -> FilesystemError {
    if error.kind() == io::ErrorKind::NotFound {
        return FilesystemError::NotFound {
            path: path.as_std_path().to_path_buf(),
        };
    }

    FilesystemError::IoError {
        path: path.as_std_path().to_path_buf(),
        message: error.to_string(),
    }
}

#[cfg(unix)]
fn metadata_mode(metadata: &Metadata, _fallback: u32) -> u32 {
    use cap_std::fs::PermissionsExt;

    metadata.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn metadata_mode(_metadata: &Metadata, fallback: u32) -> u32 {
    fallback
}
