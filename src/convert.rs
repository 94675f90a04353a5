//! Path-level conversion: binary plist in, XML plist out.
//!
//! The XML is rendered fully in memory before the destination is touched, and
//! then swapped in through a temporary file in the same directory, so a failed
//! decode or encode never modifies anything and an interrupted write never
//! leaves a half-written plist behind.
//!
//! There is no locking: two conversions of the same path at once are not
//! supported.

use crate::error::Error;
use crate::plist::Plist;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Decodes a binary plist and returns its XML rendering.
pub fn convert_bytes(data: &[u8]) -> Result<Vec<u8>, Error> {
    let value = Plist::from_binary(data)?;
    let mut xml = Vec::with_capacity(data.len() * 2);
    value.write_xml(&mut xml)?;
    Ok(xml)
}

/// Converts `path` in place, replacing the binary plist with its XML form.
pub fn convert_file(path: impl AsRef<Path>) -> Result<(), Error> {
    let path = path.as_ref();
    convert_file_to(path, path)
}

/// Reads the binary plist at `source` and writes the XML form to `destination`.
pub fn convert_file_to(source: impl AsRef<Path>, destination: impl AsRef<Path>) -> Result<(), Error> {
    let (source, destination) = (source.as_ref(), destination.as_ref());
    if !source.exists() {
        return Err(Error::PathNotFound(source.to_path_buf()));
    }
    let data = fs::read(source).map_err(|e| Error::Read {
        path: source.to_path_buf(),
        source: e,
    })?;
    debug!(path = %source.display(), bytes = data.len(), "read binary plist");
    let xml = convert_bytes(&data)?;
    write_atomic(destination, &xml)?;
    info!(
        source = %source.display(),
        destination = %destination.display(),
        bytes = xml.len(),
        "converted to XML plist"
    );
    Ok(())
}

/// Follows symlinks so the link target is replaced and the link itself kept.
fn resolve_destination(destination: &Path) -> Result<PathBuf, Error> {
    match fs::canonicalize(destination) {
        Ok(resolved) => Ok(resolved),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(destination.to_path_buf()),
        Err(e) => Err(Error::Write(e)),
    }
}

fn write_atomic(destination: &Path, contents: &[u8]) -> Result<(), Error> {
    let resolved = resolve_destination(destination)?;
    let destination = resolved.as_path();
    let dir = destination
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(contents)?;
    temp.as_file().sync_all()?;
    // keep the mode of the file being replaced
    if let Ok(metadata) = fs::metadata(destination) {
        temp.as_file().set_permissions(metadata.permissions())?;
    }
    temp.persist(destination).map_err(|e| Error::Write(e.error))?;
    Ok(())
}
