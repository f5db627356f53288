//! An in-process [`ObjectStorage`] for tests.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use urlfs_core::{Bytes, ChunkSource, Error, OnceSource};

use crate::storage::{ObjectStat, ObjectStorage};

type Containers = BTreeMap<String, BTreeMap<String, (Bytes, DateTime<Utc>)>>;

/// Containers and objects held in memory.
#[derive(Default)]
pub struct MemoryObjectStorage {
    containers: Mutex<Containers>,
    fail_puts: AtomicBool,
}

impl MemoryObjectStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Containers> {
        self.containers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store `data` as `container/object`.
    pub fn insert(&self, container: &str, object: &str, data: impl Into<Bytes>) {
        self.lock()
            .entry(container.to_string())
            .or_default()
            .insert(object.to_string(), (data.into(), Utc::now()));
    }

    pub fn object(&self, container: &str, object: &str) -> Option<Bytes> {
        self.lock()
            .get(container)?
            .get(object)
            .map(|(data, _)| data.clone())
    }

    /// Make every upload fail with a backend error until switched off.
    pub fn fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }
}

fn missing(container: &str, object: Option<&str>) -> Error {
    match object {
        Some(object) => Error::not_found(format!("{}/{}", container, object)),
        None => Error::not_found(container),
    }
}

impl ObjectStorage for MemoryObjectStorage {
    fn list_objects(&self, container: &str) -> Result<Vec<String>, Error> {
        let containers = self.lock();
        if container.is_empty() {
            return Ok(containers.keys().cloned().collect());
        }
        let objects = containers
            .get(container)
            .ok_or_else(|| missing(container, None))?;
        Ok(objects.keys().cloned().collect())
    }

    fn stat_object(&self, container: &str, object: Option<&str>) -> Result<ObjectStat, Error> {
        let containers = self.lock();
        let objects = containers
            .get(container)
            .ok_or_else(|| missing(container, None))?;
        match object {
            None => {
                let bytes: usize = objects.values().map(|(data, _)| data.len()).sum();
                Ok(ObjectStat::new()
                    .with("Container", container)
                    .with("Objects", objects.len())
                    .with("Bytes", bytes))
            }
            Some(name) => {
                let (data, modified) = objects.get(name).ok_or_else(|| missing(container, object))?;
                Ok(ObjectStat::new()
                    .with("Container", container)
                    .with("Object", name)
                    .with("Content Length", data.len())
                    .with("Last Modified", modified.to_rfc2822()))
            }
        }
    }

    fn get_object_body(
        &self,
        container: &str,
        object: &str,
    ) -> Result<Box<dyn ChunkSource>, Error> {
        let data = self
            .object(container, object)
            .ok_or_else(|| missing(container, Some(object)))?;
        Ok(Box::new(OnceSource::new(data)))
    }

    fn put_object(&self, container: &str, object: &str, local: &Path) -> Result<(), Error> {
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(Error::BackendCommandFailure {
                command: "upload".to_string(),
                status: Some(2),
                message: "storage unavailable".to_string(),
            });
        }
        let data = fs::read(local).map_err(|e| Error::from_io(e, local.display()))?;
        self.insert(container, object, data);
        Ok(())
    }

    fn delete_object(&self, container: &str, object: Option<&str>) -> Result<bool, Error> {
        let mut containers = self.lock();
        Ok(match object {
            None => containers.remove(container).is_some(),
            Some(object) => containers
                .get_mut(container)
                .map(|objects| objects.remove(object).is_some())
                .unwrap_or(false),
        })
    }

    fn create_container(&self, container: &str) -> Result<(), Error> {
        self.lock().entry(container.to_string()).or_default();
        Ok(())
    }
}
