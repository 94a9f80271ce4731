use crate::BrerError;
use fs2::FileExt;
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Moves engine checkpoints between working directories.
pub trait CheckpointRelocator {
    fn copy(&self, src: &Path, dst: &Path) -> Result<(), BrerError>;

    /// Move `path` aside so a phase can start over; returns the backup location.
    fn backup(&self, path: &Path) -> Result<PathBuf, BrerError>;
}

/// Creates working directories.
pub trait DirectoryMaterializer {
    fn mkdir_all(&self, path: &Path) -> Result<(), BrerError>;
}

/// Local filesystem implementation of both collaborators.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFs;

impl CheckpointRelocator for LocalFs {
    fn copy(&self, src: &Path, dst: &Path) -> Result<(), BrerError> {
        if !src.exists() {
            return Err(BrerError::MissingCheckpoint(src.to_path_buf()));
        }
        fs::copy(src, dst).map_err(BrerError::Io)?;
        Ok(())
    }

    fn backup(&self, path: &Path) -> Result<PathBuf, BrerError> {
        let mut name = path.as_os_str().to_owned();
        name.push(".bak");
        let backup = PathBuf::from(name);
        fs::rename(path, &backup).map_err(BrerError::Io)?;
        Ok(backup)
    }
}

impl DirectoryMaterializer for LocalFs {
    fn mkdir_all(&self, path: &Path) -> Result<(), BrerError> {
        fs::create_dir_all(path).map_err(BrerError::Io)
    }
}

/// Serialize `value` into a fresh temp file next to `path` and rename it into
/// place, so readers only ever see the previous or the new document.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), BrerError> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let tmp = tempfile::NamedTempFile::new_in(parent).map_err(BrerError::Io)?;
    {
        let mut w = BufWriter::new(&tmp);
        serde_json::to_writer(&mut w, value)?;
        w.flush().map_err(BrerError::Io)?;
    }
    tmp.persist(path).map_err(|e| BrerError::Io(e.error))?;
    Ok(())
}

/// Exclusive advisory lock on `<path>.lock`, released on drop.
#[derive(Debug)]
pub struct FileLock {
    file: File,
    path: PathBuf,
}

impl FileLock {
    /// Block until the lock guarding `path` is held.
    pub fn acquire(path: &Path) -> Result<Self, BrerError> {
        let mut name = path.as_os_str().to_owned();
        name.push(".lock");
        let lock_path = PathBuf::from(name);

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .map_err(BrerError::Io)?;
        FileExt::lock_exclusive(&file).map_err(BrerError::Io)?;
        Ok(Self { file, path: lock_path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_missing_source_is_missing_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("state.cpt");
        let dst = dir.path().join("copy.cpt");
        assert!(matches!(LocalFs.copy(&src, &dst), Err(BrerError::MissingCheckpoint(p)) if p == src));
        assert!(!dst.exists());
    }

    #[test]
    fn test_copy_and_backup() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("a.cpt");
        let dst = dir.path().join("b.cpt");
        fs::write(&src, b"checkpoint").unwrap();

        LocalFs.copy(&src, &dst).unwrap();
        assert_eq!(fs::read(&dst).unwrap(), b"checkpoint");

        let backup = LocalFs.backup(&dst).unwrap();
        assert_eq!(backup, dir.path().join("b.cpt.bak"));
        assert!(!dst.exists());
        assert!(backup.exists());
    }

    #[test]
    fn test_mkdir_all_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b").join("c");
        LocalFs.mkdir_all(&nested).unwrap();
        LocalFs.mkdir_all(&nested).unwrap();
        assert!(nested.is_dir());
    }

    #[test]
    fn test_write_json_atomic_replaces_and_leaves_no_temp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.json");
        write_json_atomic(&path, &vec![1, 2]).unwrap();
        write_json_atomic(&path, &vec![3]).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "[3]");

        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("doc.json")]);
    }

    #[test]
    fn test_file_lock_is_exclusive_and_released_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        let lock = FileLock::acquire(&path).unwrap();
        assert_eq!(lock.path(), dir.path().join("history.json.lock"));

        let other = File::open(lock.path()).unwrap();
        assert!(FileExt::try_lock_exclusive(&other).is_err());
        drop(lock);
        assert!(FileExt::try_lock_exclusive(&other).is_ok());
    }
}
