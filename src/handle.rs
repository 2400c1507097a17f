//! Addressable resource handles with explicit release semantics
//!
//! A [`ResourceHandle`] is an opaque reference to binary image data that the
//! presentation layer can display or download. Handles are issued by a
//! [`ResourceStore`] and stay valid until released. Resolving or releasing a
//! handle that was already released is reported as a usage error.

use crate::error::{Result, StudioError};
use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};
use uuid::Uuid;

/// Opaque reference to stored binary data
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceHandle {
    id: Uuid,
}

impl ResourceHandle {
    /// Issue a fresh, unique handle
    #[must_use]
    pub fn new() -> Self {
        Self { id: Uuid::new_v4() }
    }

    /// Address of the handle, in the form `blob:bgremove/<uuid>`
    #[must_use]
    pub fn url(&self) -> String {
        format!("blob:bgremove/{}", self.id)
    }
}

impl Default for ResourceHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ResourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "blob:bgremove/{}", self.id)
    }
}

/// Binary data addressed by a handle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    pub bytes: Arc<[u8]>,
    pub media_type: String,
}

impl Blob {
    pub fn new<B: Into<Arc<[u8]>>, S: Into<String>>(bytes: B, media_type: S) -> Self {
        Self {
            bytes: bytes.into(),
            media_type: media_type.into(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Store issuing and releasing addressable handles
pub trait ResourceStore: Send + Sync {
    /// Register a blob and return a handle addressing it
    fn create(&self, blob: Blob) -> ResourceHandle;

    /// Look up the blob behind a live handle
    ///
    /// # Errors
    /// - Usage error if the handle was released or never issued by this store
    fn resolve(&self, handle: &ResourceHandle) -> Result<Blob>;

    /// Release a handle; the blob is dropped and the handle becomes invalid
    ///
    /// # Errors
    /// - Usage error if the handle was already released
    fn release(&self, handle: &ResourceHandle) -> Result<()>;

    /// Number of handles currently alive
    fn live_count(&self) -> usize;
}

/// Counters describing store activity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResourceStoreStats {
    pub created: u64,
    pub released: u64,
    pub live: usize,
    /// Rejected release or resolve attempts on dead handles
    pub invalid_accesses: u64,
}

#[derive(Default)]
struct StoreInner {
    blobs: HashMap<ResourceHandle, Blob>,
    created: u64,
    released: u64,
    invalid_accesses: u64,
}

/// Default in-memory store backing handles with a hash map
#[derive(Default)]
pub struct InMemoryResourceStore {
    inner: Mutex<StoreInner>,
}

impl InMemoryResourceStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the store counters
    #[must_use]
    pub fn stats(&self) -> ResourceStoreStats {
        let inner = self.lock();
        ResourceStoreStats {
            created: inner.created,
            released: inner.released,
            live: inner.blobs.len(),
            invalid_accesses: inner.invalid_accesses,
        }
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ResourceStore for InMemoryResourceStore {
    fn create(&self, blob: Blob) -> ResourceHandle {
        let handle = ResourceHandle::new();
        let mut inner = self.lock();
        inner.created += 1;
        log::trace!("Created {} ({} bytes, {})", handle, blob.len(), blob.media_type);
        inner.blobs.insert(handle.clone(), blob);
        handle
    }

    fn resolve(&self, handle: &ResourceHandle) -> Result<Blob> {
        let mut inner = self.lock();
        if let Some(blob) = inner.blobs.get(handle) {
            return Ok(blob.clone());
        }
        inner.invalid_accesses += 1;
        Err(StudioError::usage(format!(
            "{} is not a live resource handle",
            handle
        )))
    }

    fn release(&self, handle: &ResourceHandle) -> Result<()> {
        let mut inner = self.lock();
        if inner.blobs.remove(handle).is_some() {
            inner.released += 1;
            log::trace!("Released {}", handle);
            return Ok(());
        }
        inner.invalid_accesses += 1;
        Err(StudioError::usage(format!(
            "{} was already released",
            handle
        )))
    }

    fn live_count(&self) -> usize {
        self.lock().blobs.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_url_format() {
        let handle = ResourceHandle::new();
        assert!(handle.url().starts_with("blob:bgremove/"));
        assert_eq!(handle.url(), handle.to_string());
        assert_ne!(handle, ResourceHandle::new());
    }

    #[test]
    fn test_create_resolve_release() {
        let store = InMemoryResourceStore::new();
        let handle = store.create(Blob::new(vec![1u8, 2, 3], "image/png"));

        let blob = store.resolve(&handle).unwrap();
        assert_eq!(&*blob.bytes, &[1, 2, 3]);
        assert_eq!(blob.media_type, "image/png");
        assert_eq!(store.live_count(), 1);

        store.release(&handle).unwrap();
        assert_eq!(store.live_count(), 0);

        let stats = store.stats();
        assert_eq!(stats.created, 1);
        assert_eq!(stats.released, 1);
        assert_eq!(stats.invalid_accesses, 0);
    }

    #[test]
    fn test_released_handle_is_rejected() {
        let store = InMemoryResourceStore::new();
        let handle = store.create(Blob::new(vec![0u8; 4], "image/png"));
        store.release(&handle).unwrap();

        let err = store.release(&handle).unwrap_err();
        assert!(err.is_usage());
        assert!(store.resolve(&handle).unwrap_err().is_usage());

        let stats = store.stats();
        assert_eq!(stats.released, 1);
        assert_eq!(stats.invalid_accesses, 2);
    }

    #[test]
    fn test_unknown_handle_is_rejected() {
        let store = InMemoryResourceStore::new();
        assert!(store.resolve(&ResourceHandle::new()).is_err());
        assert!(store.release(&ResourceHandle::new()).is_err());
    }
}
