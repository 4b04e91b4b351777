//! Scratch store abstraction.

use super::error::KvResult;

/// Opens the scratch store.
pub trait KvBackend: Send + Sync {
    /// Open a handle for one operation.
    fn open(&self) -> KvResult<Box<dyn KvStore>>;
}

/// An open scratch store.
pub trait KvStore: Send {
    /// Read one key.
    fn get(&self, key: &str) -> KvResult<Option<String>>;

    /// Write one key.
    fn set(&mut self, key: &str, value: &str) -> KvResult<()>;

    /// Delete one key. Deleting a missing key is not an error.
    fn delete(&mut self, key: &str) -> KvResult<()>;

    /// Call `visitor` for every entry whose key starts with `prefix`, in
    /// store order.
    fn iterate(&self, prefix: &str, visitor: &mut dyn FnMut(&str, &str)) -> KvResult<()>;

    /// Release the handle.
    fn close(self: Box<Self>) -> KvResult<()>;
}
