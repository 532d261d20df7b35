use std::{
    fs::{self, File},
    io::{self, Read},
    path::{Path, PathBuf},
};

use thiserror::Error;

/// Upload constraints enforced before any byte is written
pub struct UploadLimits {
    pub max_file_size_bytes: u64,
    pub allowed_content_types: &'static [&'static str],
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            max_file_size_bytes: 20 * 1024 * 1024, // 20 MiB
            allowed_content_types: &[
                "image/jpeg",
                "image/png",
                "image/webp",
                "image/gif",
                "application/pdf",
                "text/plain",
                "text/markdown",
                "application/zip",
                "application/octet-stream",
            ],
        }
    }
}

impl UploadLimits {
    pub fn allows_content_type(&self, content_type: &str) -> bool {
        self.allowed_content_types
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(content_type))
    }
}

#[derive(Error, Debug)]
pub enum FileStoreError {
    #[error("Failed to save file at '{path}': {source}")]
    SaveFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to open file at '{path}': {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to delete file at '{path}': {source}")]
    DeleteFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Path '{0}' escapes the file store root")]
    PathEscapesRoot(String),
}

/// Blob collaborator. Callers only ever hand over a relative path key; the
/// contents are opaque.
pub trait FileStore {
    fn save(&self, content: &mut dyn Read, relative_path: &str) -> Result<(), FileStoreError>;
    fn open_read(&self, relative_path: &str) -> Result<Box<dyn Read>, FileStoreError>;
    fn delete(&self, relative_path: &str) -> Result<(), FileStoreError>;
}

/// Flat directory tree under a single root
pub struct LocalFileStore {
    root: PathBuf,
}

impl LocalFileStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Resolve a relative key, rejecting anything that would step above root
    fn resolve(&self, relative_path: &str) -> Result<PathBuf, FileStoreError> {
        let relative = Path::new(relative_path);
        let escapes = relative.is_absolute()
            || relative
                .components()
                .any(|c| matches!(c, std::path::Component::ParentDir));
        if escapes {
            return Err(FileStoreError::PathEscapesRoot(relative_path.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

impl FileStore for LocalFileStore {
    fn save(&self, content: &mut dyn Read, relative_path: &str) -> Result<(), FileStoreError> {
        let full = self.resolve(relative_path)?;

        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).map_err(|e| FileStoreError::SaveFailed {
                path: full.clone(),
                source: e,
            })?;
        }

        let mut file = File::create(&full).map_err(|e| FileStoreError::SaveFailed {
            path: full.clone(),
            source: e,
        })?;
        io::copy(content, &mut file).map_err(|e| FileStoreError::SaveFailed {
            path: full,
            source: e,
        })?;

        Ok(())
    }

    fn open_read(&self, relative_path: &str) -> Result<Box<dyn Read>, FileStoreError> {
        let full = self.resolve(relative_path)?;
        let file = File::open(&full).map_err(|e| FileStoreError::OpenFailed {
            path: full,
            source: e,
        })?;
        Ok(Box::new(file))
    }

    fn delete(&self, relative_path: &str) -> Result<(), FileStoreError> {
        let full = self.resolve(relative_path)?;
        match fs::remove_file(&full) {
            Ok(()) => Ok(()),
            // Already gone is not a failure for a best-effort cleanup path
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(FileStoreError::DeleteFailed {
                path: full,
                source: e,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store(name: &str) -> LocalFileStore {
        let root = PathBuf::from(format!("/tmp/kanbo_files_{name}"));
        let _ = fs::remove_dir_all(&root);
        fs::create_dir_all(&root).unwrap();
        LocalFileStore::new(root)
    }

    #[test]
    fn test_save_open_delete_round_trip() {
        let store = test_store("round_trip");

        let mut content: &[u8] = b"attachment bytes";
        store.save(&mut content, "uploads/p1/t1/file.txt").unwrap();

        let mut read_back = String::new();
        store
            .open_read("uploads/p1/t1/file.txt")
            .unwrap()
            .read_to_string(&mut read_back)
            .unwrap();
        assert_eq!(read_back, "attachment bytes");

        store.delete("uploads/p1/t1/file.txt").unwrap();
        assert!(store.open_read("uploads/p1/t1/file.txt").is_err());
    }

    #[test]
    fn test_delete_missing_file_is_ok() {
        let store = test_store("delete_missing");
        assert!(store.delete("uploads/never/was/here.bin").is_ok());
    }

    #[test]
    fn test_traversal_paths_are_rejected() {
        let store = test_store("traversal");
        let mut content: &[u8] = b"x";
        assert!(matches!(
            store.save(&mut content, "../outside.txt"),
            Err(FileStoreError::PathEscapesRoot(_))
        ));
        assert!(matches!(
            store.open_read("/etc/passwd"),
            Err(FileStoreError::PathEscapesRoot(_))
        ));
    }

    #[test]
    fn test_default_limits() {
        let limits = UploadLimits::default();
        assert!(limits.allows_content_type("image/png"));
        assert!(limits.allows_content_type("IMAGE/PNG"));
        assert!(!limits.allows_content_type("application/x-msdownload"));
        assert_eq!(limits.max_file_size_bytes, 20 * 1024 * 1024);
    }
}
