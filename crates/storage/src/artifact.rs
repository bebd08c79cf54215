//! Atomic artifact writes and the overwrite guard.

use crate::error::{StorageError, StorageResult};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

/// Refuse to write over an existing artifact unless explicitly allowed.
pub fn ensure_writable(path: &Path, overwrite: bool) -> StorageResult<()> {
    if path.exists() {
        if overwrite {
            tracing::warn!("overwriting existing artifact {}", path.display());
        } else {
            return Err(StorageError::OutputExists(path.to_path_buf()));
        }
    }
    Ok(())
}

/// Write `bytes` to `path` atomically.
pub fn write_atomic(path: &Path, bytes: &[u8], overwrite: bool) -> StorageResult<()> {
    write_atomic_with(path, overwrite, |writer| {
        writer.write_all(bytes)?;
        Ok(())
    })
}

/// Stream an artifact to `path` atomically.
///
/// The payload is produced by `write` into a buffered writer over a `.tmp`
/// sibling; only after a successful flush is the file renamed into place.
/// An aborted run leaves the destination untouched.
pub fn write_atomic_with<F>(path: &Path, overwrite: bool, write: F) -> StorageResult<()>
where
    F: FnOnce(&mut BufWriter<File>) -> StorageResult<()>,
{
    ensure_writable(path, overwrite)?;

    let tmp_path = path.with_extension("tmp");
    let result = (|| {
        let file = File::create(&tmp_path)?;
        let mut writer = BufWriter::new(file);
        write(&mut writer)?;
        writer.flush()?;
        Ok(())
    })();

    if let Err(err) = result {
        let _ = fs::remove_file(&tmp_path);
        return Err(err);
    }

    fs::rename(&tmp_path, path)?;
    tracing::info!("wrote {}", path.display());
    Ok(())
}
