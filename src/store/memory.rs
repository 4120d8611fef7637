//! In-process stores, for embedding without a filesystem and for tests.

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{busy_error, ByteStore, SessionStorage};

#[derive(Debug, Default)]
struct Resource {
    data: Mutex<Vec<u8>>,
    locked: AtomicBool,
}

/// A locked view of one in-memory resource. Dropping it releases the lock.
#[derive(Debug)]
pub struct MemoryStore {
    resource: Arc<Resource>,
}

impl MemoryStore {
    fn data(&self) -> MutexGuard<'_, Vec<u8>> {
        self.resource
            .data
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl ByteStore for MemoryStore {
    fn size(&self) -> io::Result<u64> {
        Ok(self.data().len() as u64)
    }

    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        let data = self.data();
        let start = (offset as usize).min(data.len());
        let n = buf.len().min(data.len() - start);
        buf[..n].copy_from_slice(&data[start..start + n]);
        Ok(n)
    }

    fn write_at(&self, buf: &[u8], offset: u64) -> io::Result<()> {
        let mut data = self.data();
        let start = offset as usize;
        let end = start + buf.len();
        if data.len() < end {
            data.resize(end, 0);
        }
        data[start..end].copy_from_slice(buf);
        Ok(())
    }

    fn flush(&self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for MemoryStore {
    fn drop(&mut self) {
        self.resource.locked.store(false, Ordering::Release);
    }
}

/// Named in-memory resources. Clones share the same resources.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    resources: Arc<Mutex<HashMap<String, Arc<Resource>>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates (or replaces) an unlocked resource holding `contents`.
    pub fn insert(&self, name: &str, contents: impl Into<Vec<u8>>) {
        let resource = Resource {
            data: Mutex::new(contents.into()),
            locked: AtomicBool::new(false),
        };
        self.resources().insert(name.to_string(), Arc::new(resource));
    }

    /// Copy of a resource's bytes, if it exists.
    pub fn contents(&self, name: &str) -> Option<Vec<u8>> {
        let resources = self.resources();
        let resource = resources.get(name)?;
        let data = resource.data.lock().unwrap_or_else(PoisonError::into_inner);
        Some(data.clone())
    }

    fn resources(&self) -> MutexGuard<'_, HashMap<String, Arc<Resource>>> {
        self.resources
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl SessionStorage for MemoryStorage {
    fn list(&self) -> io::Result<Vec<String>> {
        Ok(self.resources().keys().cloned().collect())
    }

    fn try_lock(&self, name: &str, create: bool) -> io::Result<Arc<dyn ByteStore>> {
        let resource = {
            let mut resources = self.resources();
            match resources.get(name) {
                Some(resource) => Arc::clone(resource),
                None if create => {
                    let resource = Arc::new(Resource::default());
                    resources.insert(name.to_string(), Arc::clone(&resource));
                    resource
                }
                None => {
                    return Err(io::Error::new(
                        io::ErrorKind::NotFound,
                        format!("{name} does not exist"),
                    ))
                }
            }
        };

        if resource.locked.swap(true, Ordering::AcqRel) {
            return Err(busy_error(name));
        }
        Ok(Arc::new(MemoryStore { resource }))
    }

    fn remove(&self, name: &str) -> io::Result<()> {
        self.resources()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("{name} does not exist")))
    }
}
