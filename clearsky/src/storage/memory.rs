//! In-memory object store.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use futures::FutureExt;
use parking_lot::RwLock;
use sha2::{Digest, Sha256};

use super::{hex_digest, ObjectInfo, ObjectLocation, ObjectStore, ObjectWriter, StorageError};
use crate::source::BoxFuture;

type Objects = Arc<RwLock<HashMap<ObjectLocation, Bytes>>>;

/// Keeps committed objects in a map; uncommitted writes are invisible.
#[derive(Debug, Default, Clone)]
pub struct MemoryObjectStore {
    objects: Objects,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Locations of all committed objects, sorted.
    pub fn locations(&self) -> Vec<ObjectLocation> {
        let mut locations: Vec<_> = self.objects.read().keys().cloned().collect();
        locations.sort_by_key(|l| l.to_string());
        locations
    }
}

impl ObjectStore for MemoryObjectStore {
    fn name(&self) -> &str {
        "memory"
    }

    fn create<'a>(
        &'a self,
        location: &'a ObjectLocation,
    ) -> BoxFuture<'a, Result<Box<dyn ObjectWriter>, StorageError>> {
        async move {
            Ok(Box::new(MemoryObjectWriter {
                location: location.clone(),
                buffer: Vec::new(),
                objects: Arc::clone(&self.objects),
            }) as Box<dyn ObjectWriter>)
        }
        .boxed()
    }

    fn get<'a>(&'a self, location: &'a ObjectLocation) -> BoxFuture<'a, Result<Bytes, StorageError>> {
        async move {
            self.objects
                .read()
                .get(location)
                .cloned()
                .ok_or_else(|| StorageError::NotFound(location.clone()))
        }
        .boxed()
    }
}

struct MemoryObjectWriter {
    location: ObjectLocation,
    buffer: Vec<u8>,
    objects: Objects,
}

impl ObjectWriter for MemoryObjectWriter {
    fn write<'a>(&'a mut self, chunk: &'a [u8]) -> BoxFuture<'a, Result<(), StorageError>> {
        self.buffer.extend_from_slice(chunk);
        futures::future::ready(Ok(())).boxed()
    }

    fn commit(self: Box<Self>) -> BoxFuture<'static, Result<ObjectInfo, StorageError>> {
        let MemoryObjectWriter {
            location,
            buffer,
            objects,
        } = *self;
        let info = ObjectInfo {
            location: location.clone(),
            size: buffer.len() as u64,
            sha256: hex_digest(&Sha256::digest(&buffer)),
        };
        objects.write().insert(location, Bytes::from(buffer));
        futures::future::ready(Ok(info)).boxed()
    }

    fn abort(self: Box<Self>) -> BoxFuture<'static, Result<(), StorageError>> {
        futures::future::ready(Ok(())).boxed()
    }
}
