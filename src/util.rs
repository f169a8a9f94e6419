//! Miscellaneous utilities for zonewright.

use std::{fs, io, io::Write};

use camino::Utf8Path;

/// Atomically replace a file's contents.
///
/// The data is written to a temporary sibling file which is then renamed over
/// the target, so readers (and a crash) see either the old contents or the
/// new, never a partial write.  An existing file's permission bits are kept;
/// a new file gets mode 0644.
pub fn write_file(path: &Utf8Path, contents: &[u8]) -> io::Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_str().is_empty() => dir,
        _ => Utf8Path::new("."),
    };

    let permissions = fs::metadata(path).map(|meta| meta.permissions()).ok();

    let mut tmp_file = tempfile::Builder::new()
        .prefix(&format!("{}.tmp-", path.file_name().unwrap_or("zone")))
        .tempfile_in(dir)?;

    match permissions {
        Some(permissions) => tmp_file.as_file().set_permissions(permissions)?,
        None => {
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                tmp_file
                    .as_file()
                    .set_permissions(fs::Permissions::from_mode(0o644))?;
            }
        }
    }
    tmp_file.as_file_mut().write_all(contents)?;
    tmp_file.as_file_mut().flush()?;

    // The temporary file is removed on drop, so an error anywhere above
    // leaves no droppings and the target untouched.
    tmp_file.persist(path).map_err(|err| err.error)?;

    Ok(())
}
