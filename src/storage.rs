use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Failures from the file storage layer. These map to opaque 500s at the route
/// boundary.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("io failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage unavailable")]
    Unavailable,
}

// 1. StorageService Contract
/// StorageService
///
/// Defines the abstract contract for the image file store. This trait allows
/// us to swap the concrete implementation (the disk-backed store in
/// production, the in-memory double during testing) without affecting the
/// calling handlers. The database owns image *metadata*; this service owns the
/// bytes, keyed by the image name.
#[async_trait]
pub trait StorageService: Send + Sync {
    /// Ensures the storage root exists. Called once at startup.
    async fn ensure_root_exists(&self) -> Result<(), StorageError>;

    /// Persists the file bytes under `name`, overwriting any previous content.
    async fn store(&self, name: &str, bytes: &[u8]) -> Result<(), StorageError>;

    /// Removes the file for `name`. Removing a file that is already gone is
    /// not an error; metadata deletion must stay possible even if the bytes
    /// were lost.
    async fn remove(&self, name: &str) -> Result<(), StorageError>;
}

/// StorageState
///
/// The concrete type used to share the storage service across the application
/// state.
pub type StorageState = Arc<dyn StorageService>;

/// sanitize_name
///
/// Utility function to prevent path traversal attacks by removing directory
/// navigation components (e.g. `..`, `.`, separators) from a user-provided
/// file name. The result is always a bare file name.
pub fn sanitize_name(name: &str) -> String {
    name.split(['/', '\\'])
        .filter(|segment| !segment.is_empty() && *segment != ".." && *segment != ".")
        .next_back()
        .unwrap_or_default()
        .to_string()
}

// 2. The Real Implementation (local disk)
/// DiskStorage
///
/// Writes image files under a single upload directory. Names are sanitized
/// again at this boundary so no caller can escape the root.
#[derive(Clone)]
pub struct DiskStorage {
    root: PathBuf,
}

impl DiskStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.root.join(sanitize_name(name))
    }
}

#[async_trait]
impl StorageService for DiskStorage {
    async fn ensure_root_exists(&self) -> Result<(), StorageError> {
        tokio::fs::create_dir_all(&self.root).await?;
        Ok(())
    }

    async fn store(&self, name: &str, bytes: &[u8]) -> Result<(), StorageError> {
        tokio::fs::write(self.path_for(name), bytes).await?;
        Ok(())
    }

    async fn remove(&self, name: &str) -> Result<(), StorageError> {
        match tokio::fs::remove_file(self.path_for(name)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

// 3. The Mock Implementation (For Unit Tests)
/// MemoryStorage
///
/// An in-memory implementation of `StorageService` used exclusively for unit
/// and integration testing. Keeps stored bytes in a map so tests can assert
/// what was written and removed without touching the filesystem.
#[derive(Default)]
pub struct MemoryStorage {
    files: Mutex<HashMap<String, Vec<u8>>>,
    /// When true, all operations return a simulated failure.
    pub should_fail: bool,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_failing() -> Self {
        Self {
            files: Mutex::new(HashMap::new()),
            should_fail: true,
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.files.lock().unwrap().contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.files.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl StorageService for MemoryStorage {
    async fn ensure_root_exists(&self) -> Result<(), StorageError> {
        Ok(())
    }

    async fn store(&self, name: &str, bytes: &[u8]) -> Result<(), StorageError> {
        if self.should_fail {
            return Err(StorageError::Unavailable);
        }
        self.files
            .lock()
            .unwrap()
            .insert(name.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn remove(&self, name: &str) -> Result<(), StorageError> {
        if self.should_fail {
            return Err(StorageError::Unavailable);
        }
        self.files.lock().unwrap().remove(name);
        Ok(())
    }
}
