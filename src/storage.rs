use std::path::Path;

use bytes::Bytes;
use zarrs::{
    filesystem::FilesystemStore,
    storage::{ReadableStorageTraits, StoreKey, byte_range::ByteRange},
};

/// Resolves relative file URIs to objects in an underlying store.
///
/// URIs are used as store keys, so the store must be rooted at the array's
/// base path.
pub struct ReferenceStore<R> {
    inner: R,
}

impl<R> ReferenceStore<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }
}

impl ReferenceStore<FilesystemStore> {
    /// Open a filesystem store rooted at `basepath`.
    ///
    /// The directory must already exist; nothing is created.
    pub fn open(basepath: &Path) -> crate::Result<Self> {
        if !basepath.is_dir() {
            return Err(crate::Error::source_unavailable(
                basepath.display().to_string(),
                "base path is not a directory",
            ));
        }
        let store = FilesystemStore::new(basepath).map_err(|e| {
            crate::Error::source_unavailable(basepath.display().to_string(), e)
        })?;
        Ok(Self::new(store))
    }
}

impl<R: ReadableStorageTraits> ReferenceStore<R> {
    /// Look up the object at `uri`.
    ///
    /// # Errors
    /// [`Error::SourceUnavailable`](crate::Error::SourceUnavailable) if the
    /// object does not exist or cannot be queried.
    pub fn object<'a>(&'a self, uri: &'a str) -> crate::Result<StoredObject<'a, R>> {
        let key = StoreKey::new(uri).map_err(|e| crate::Error::source_unavailable(uri, e))?;
        let size = self
            .inner
            .size_key(&key)
            .map_err(|e| crate::Error::source_unavailable(uri, e))?
            .ok_or_else(|| crate::Error::source_unavailable(uri, "file does not exist"))?;
        Ok(StoredObject {
            store: self,
            key,
            uri,
            size,
        })
    }
}

/// One existing object of a [`ReferenceStore`], read by byte range.
pub struct StoredObject<'a, R> {
    store: &'a ReferenceStore<R>,
    key: StoreKey,
    uri: &'a str,
    size: u64,
}

impl<R: ReadableStorageTraits> StoredObject<'_, R> {
    pub fn uri(&self) -> &str {
        self.uri
    }

    /// Size in bytes, as found when the object was looked up.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Read `len` bytes starting at `offset`.
    ///
    /// A range extending past the end of the object is a
    /// [`Error::General`](crate::Error::General) error, since it says
    /// something about the object's contents; failures of the store itself
    /// are [`Error::SourceUnavailable`](crate::Error::SourceUnavailable).
    pub fn read(&self, offset: u64, len: u64) -> crate::Result<Bytes> {
        if offset.checked_add(len).is_none_or(|end| end > self.size) {
            return Err(crate::Error::general(format!(
                "{} is truncated: {len} bytes at offset {offset} requested, file has {} bytes",
                self.uri, self.size
            )));
        }
        if len == 0 {
            return Ok(Bytes::new());
        }
        self.store
            .inner
            .get_partial(&self.key, ByteRange::FromStart(offset, Some(len)))
            .map_err(|e| crate::Error::source_unavailable(self.uri, e))?
            .ok_or_else(|| crate::Error::source_unavailable(self.uri, "file disappeared"))
    }
}
