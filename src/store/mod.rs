//! Byte-store abstraction the engine runs on.
//!
//! A [`ByteStore`] is one seekable, sized resource; a [`SessionStorage`] is the place
//! those resources live and hands them out under an exclusive lock.

use std::fmt;
use std::io;
use std::sync::Arc;

mod file;
mod memory;

pub use file::{DirStorage, FileStore};
pub use memory::{MemoryStorage, MemoryStore};

/// Positional I/O over one locked resource.
///
/// Methods take `&self` so an export can keep pulling from a shared handle while
/// the worker keeps appending.
pub trait ByteStore: Send + Sync + fmt::Debug {
    /// Current size in bytes.
    fn size(&self) -> io::Result<u64>;

    /// Reads into `buf` at `offset`, returning how many bytes were filled. Fewer than
    /// `buf.len()` means end of resource.
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize>;

    /// Writes all of `buf` at `offset`.
    fn write_at(&self, buf: &[u8], offset: u64) -> io::Result<()>;

    fn flush(&self) -> io::Result<()>;
}

/// A collection of named session resources with exclusive locking.
pub trait SessionStorage: Send + Sync {
    /// Names of every resource currently stored.
    fn list(&self) -> io::Result<Vec<String>>;

    /// Opens `name` (creating it when `create` is set) and takes its exclusive lock.
    /// The lock lives as long as the returned store.
    ///
    /// A resource held by someone else fails with a [`busy`](is_busy) error.
    fn try_lock(&self, name: &str, create: bool) -> io::Result<Arc<dyn ByteStore>>;

    /// Deletes `name`.
    fn remove(&self, name: &str) -> io::Result<()>;
}

/// Error returned by [`SessionStorage::try_lock`] when the resource is held elsewhere.
pub fn busy_error(name: &str) -> io::Error {
    io::Error::new(io::ErrorKind::WouldBlock, format!("{name} is locked"))
}

/// True for the "resource busy" failure class that the lock retry waits out.
pub fn is_busy(err: &io::Error) -> bool {
    if err.kind() == io::ErrorKind::WouldBlock {
        return true;
    }
    let contended = fs2::lock_contended_error();
    err.raw_os_error().is_some() && err.raw_os_error() == contended.raw_os_error()
}
