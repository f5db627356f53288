//! File and directory resources over an [`ObjectStorage`].
//!
//! URLs read `swift://<location>/<container>/<object-key>`. A single segment
//! (or a trailing `/`) names a container or pseudo-directory; no segment at
//! all names the account, whose children are its containers.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use urlfs_core::transfer::{check_local_conflicts, check_local_target, scan_local_dir};
use urlfs_core::{
    ChunkSource, DirectoryCapability, Error, FileCapability, FileStream, ReadView, Resource,
    ResourceCapability, ResourceFactory, ResourceUrl, StageBuffer, StreamMode, COPY_CHUNK_SIZE,
};

use crate::cli::{SwiftCli, SwiftProfile};
use crate::location::{StagedObject, SwiftLocation};
use crate::storage::{ObjectStat, ObjectStorage};

pub const SWIFT_SCHEME: &str = "swift";

/// Factory for `swift://` resources, keyed by registered location name.
///
/// Clones share the same set of locations.
#[derive(Clone, Default, Debug)]
pub struct SwiftBackend {
    locations: Arc<Mutex<BTreeMap<String, Arc<SwiftLocation>>>>,
}

impl SwiftBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, Arc<SwiftLocation>>> {
        self.locations.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make `storage` reachable as `swift://<name>/...`.
    pub fn register_location(
        &self,
        name: &str,
        storage: Arc<dyn ObjectStorage>,
    ) -> Result<Arc<SwiftLocation>, Error> {
        let mut locations = self.lock();
        if locations.contains_key(name) {
            return Err(Error::already_exists(name, "swift locations"));
        }
        log::debug!("registered swift location {}", name);
        let location = Arc::new(SwiftLocation::new(name, storage));
        locations.insert(name.to_string(), Arc::clone(&location));
        Ok(location)
    }

    /// Register a location driven by the `swift` command line client.
    pub fn register_profile(
        &self,
        name: &str,
        profile: SwiftProfile,
    ) -> Result<Arc<SwiftLocation>, Error> {
        self.register_location(name, Arc::new(SwiftCli::new(profile)))
    }

    pub fn location(&self, name: &str) -> Option<Arc<SwiftLocation>> {
        self.lock().get(name).cloned()
    }

    pub fn location_names(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    /// Close and unregister a location. Resources still holding it fail
    /// with [`Error::NotActive`] from now on.
    pub fn close_location(&self, name: &str) -> bool {
        match self.lock().remove(name) {
            Some(location) => {
                location.close();
                true
            }
            None => false,
        }
    }

    /// Close every location.
    pub fn close_all(&self) {
        for (_, location) in std::mem::take(&mut *self.lock()) {
            location.close();
        }
    }

    /// Open `url` as a file, keeping the concrete type for [`SwiftFile::close`].
    pub fn open_file(&self, url: &ResourceUrl) -> Result<SwiftFile, Error> {
        match split(self.registered(url)?, url) {
            Split::File(file) => Ok(file),
            Split::Directory(_) => Err(Error::InvalidPathShape {
                location: url.location().to_string(),
                path: url.path().to_string(),
                message: "names a container or pseudo-directory".to_string(),
            }),
        }
    }

    fn registered(&self, url: &ResourceUrl) -> Result<Arc<SwiftLocation>, Error> {
        self.location(url.location())
            .ok_or_else(|| Error::InvalidUrl {
                url: url.to_string(),
                message: format!("swift location '{}' is not registered", url.location()),
            })
    }
}

impl ResourceFactory for SwiftBackend {
    fn open(&self, url: &ResourceUrl) -> Result<Resource, Error> {
        Ok(open(self.registered(url)?, url))
    }
}

enum Split {
    File(SwiftFile),
    Directory(SwiftDirectory),
}

fn split(location: Arc<SwiftLocation>, url: &ResourceUrl) -> Split {
    let trimmed = url.path().trim_matches('/');
    let (container, key) = match trimmed.split_once('/') {
        Some((container, key)) => (container, Some(key)),
        None => (trimmed, None),
    };
    let target = Target {
        location,
        url: url.clone(),
        container: container.to_string(),
    };
    match key {
        Some(key) if !url.is_dir_path() => Split::File(SwiftFile {
            stream: FileStream::new(url.to_string()),
            key: key.to_string(),
            target,
        }),
        prefix => Split::Directory(SwiftDirectory {
            prefix: prefix.map(str::to_string),
            target,
        }),
    }
}

fn open(location: Arc<SwiftLocation>, url: &ResourceUrl) -> Resource {
    match split(location, url) {
        Split::File(file) => Resource::File(Box::new(file)),
        Split::Directory(dir) => Resource::Directory(Box::new(dir)),
    }
}

/// The location and container a resource lives in.
struct Target {
    location: Arc<SwiftLocation>,
    url: ResourceUrl,
    container: String,
}

impl Target {
    fn storage(&self) -> Result<Arc<dyn ObjectStorage>, Error> {
        self.location.storage()
    }

    fn require_active(&self) -> Result<(), Error> {
        self.storage().map(|_| ())
    }

    /// Report storage-level NotFound errors against this resource's URL.
    fn on_url<T>(&self, result: Result<T, Error>) -> Result<T, Error> {
        result.map_err(|e| {
            if e.is_not_found() {
                Error::not_found(&self.url)
            } else {
                e
            }
        })
    }

    fn stat(&self, key: Option<&str>) -> Result<ObjectStat, Error> {
        let storage = self.storage()?;
        self.on_url(storage.stat_object(&self.container, key))
    }

    /// Upload an empty object as `key`.
    fn put_empty(&self, key: &str) -> Result<(), Error> {
        let mut staged = self.location.stage()?;
        staged.sync()?;
        self.storage()?.put_object(&self.container, key, staged.path())
    }

    fn unexpected_stat(&self, field: &str) -> Error {
        Error::BackendCommandFailure {
            command: "stat".to_string(),
            status: Some(0),
            message: format!("no '{}' field for {}", field, self.url),
        }
    }
}

fn found<T>(result: Result<T, Error>) -> Result<Option<T>, Error> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

/// Copy the whole body of `key` into `staged`.
fn seed(
    storage: &dyn ObjectStorage,
    container: &str,
    key: &str,
    staged: &mut StagedObject,
) -> Result<(), Error> {
    let mut body = storage.get_object_body(container, key)?;
    while let Some(chunk) = body.next_chunk(COPY_CHUNK_SIZE)? {
        staged.extend_from(&chunk)?;
    }
    Ok(())
}

/// Object names that would land outside the download directory.
fn escapes(relative: &str) -> bool {
    relative.starts_with('/') || relative.split('/').any(|s| s == ".." || s == ".")
}

/// Stream an object body into the local file `local`.
fn download(
    storage: &dyn ObjectStorage,
    container: &str,
    key: &str,
    local: &Path,
) -> Result<(), Error> {
    let mut body = storage.get_object_body(container, key)?;
    if let Some(parent) = local.parent() {
        fs::create_dir_all(parent)?;
    }
    log::debug!("download {}/{} -> {}", container, key, local.display());
    let mut out = fs::File::create(local)?;
    while let Some(chunk) = body.next_chunk(COPY_CHUNK_SIZE)? {
        out.write_all(&chunk)?;
    }
    Ok(())
}

/// An object in a container.
///
/// Pending writes are staged in the location's staging directory and
/// uploaded on flush.
pub struct SwiftFile {
    target: Target,
    key: String,
    stream: FileStream<StagedObject>,
}

impl SwiftFile {
    pub fn container(&self) -> &str {
        &self.target.container
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Drop any pending write without uploading it, removing its staged file.
    pub fn close(&mut self) {
        if self.stream.mode() != StreamMode::Idle {
            log::debug!("discarding unflushed write to {}", self.target.url);
        }
        self.stream.reset();
    }

    fn modified(&self) -> Result<DateTime<Utc>, Error> {
        Ok(self
            .target
            .stat(Some(&self.key))?
            .last_modified()
            .unwrap_or_else(Utc::now))
    }
}

impl ResourceCapability for SwiftFile {
    fn url(&self) -> &ResourceUrl {
        &self.target.url
    }

    fn exists(&self) -> Result<bool, Error> {
        Ok(found(self.target.stat(Some(&self.key)))?.is_some())
    }

    fn size(&self) -> Result<u64, Error> {
        self.target
            .stat(Some(&self.key))?
            .content_length()
            .ok_or_else(|| self.target.unexpected_stat("Content Length"))
    }

    /// Object stores keep a single timestamp; all three times report it.
    fn ctime(&self) -> Result<DateTime<Utc>, Error> {
        self.modified()
    }

    fn mtime(&self) -> Result<DateTime<Utc>, Error> {
        self.modified()
    }

    fn atime(&self) -> Result<DateTime<Utc>, Error> {
        self.modified()
    }

    fn create(&mut self) -> Result<bool, Error> {
        if self.exists()? {
            return Ok(false);
        }
        self.target.put_empty(&self.key)?;
        Ok(true)
    }

    fn delete(&mut self) -> Result<bool, Error> {
        self.stream.rewind();
        self.target
            .storage()?
            .delete_object(&self.target.container, Some(&self.key))
    }

    fn get(&mut self, local: &Path, overwrite: bool) -> Result<PathBuf, Error> {
        if !self.exists()? {
            return Err(Error::not_found(&self.target.url));
        }
        check_local_target(local, overwrite)?;
        let storage = self.target.storage()?;
        self.target.on_url(download(
            storage.as_ref(),
            &self.target.container,
            &self.key,
            local,
        ))?;
        Ok(local.to_path_buf())
    }

    fn put(&mut self, local: &Path, overwrite: bool) -> Result<(), Error> {
        if !local.is_file() {
            return Err(Error::not_found(local.display()));
        }
        if !overwrite && self.exists()? {
            return Err(Error::already_exists(self.name(), &self.target.url));
        }
        self.target
            .storage()?
            .put_object(&self.target.container, &self.key, local)?;
        self.stream.rewind();
        Ok(())
    }
}

impl FileCapability for SwiftFile {
    fn mode(&self) -> StreamMode {
        self.stream.mode()
    }

    fn read(&mut self, max: Option<usize>) -> Result<Vec<u8>, Error> {
        let Self {
            target,
            key,
            stream,
        } = self;
        target.require_active()?;
        stream.read(max, || {
            let storage = target.storage()?;
            let body = target.on_url(storage.get_object_body(&target.container, key.as_str()))?;
            Ok(ReadView::boxed(body))
        })
    }

    fn write(&mut self, data: &[u8]) -> Result<(), Error> {
        self.target.require_active()?;
        let location = &self.target.location;
        self.stream.write(data, || location.stage())
    }

    fn append(&mut self, data: &[u8]) -> Result<(), Error> {
        let Self {
            target,
            key,
            stream,
        } = self;
        target.require_active()?;
        stream.append(data, || {
            let storage = target.storage()?;
            let mut staged = target.location.stage()?;
            // A missing object may only show up once its body is drained.
            match seed(storage.as_ref(), &target.container, key.as_str(), &mut staged) {
                Ok(()) => Ok(staged),
                Err(e) if e.is_not_found() => target.location.stage(),
                Err(e) => Err(e),
            }
        })
    }

    fn flush(&mut self) -> Result<(), Error> {
        let Self {
            target,
            key,
            stream,
        } = self;
        stream.flush(|staged| {
            let storage = target.storage()?;
            staged.sync()?;
            log::debug!("upload {} from {}", target.url, staged.path().display());
            storage.put_object(&target.container, key.as_str(), staged.path())
        })?;
        Ok(())
    }

    fn reset(&mut self) -> Result<(), Error> {
        self.stream.reset();
        self.target.require_active()
    }

    fn rewind(&mut self) {
        self.stream.rewind();
    }
}

/// The account root, a container, or a pseudo-directory inside one.
///
/// Pseudo-directories exist while some object name starts with
/// `<prefix>/`; [`create`](ResourceCapability::create) writes an empty
/// `<prefix>/` marker object, which listings hide.
pub struct SwiftDirectory {
    target: Target,
    prefix: Option<String>,
}

impl SwiftDirectory {
    fn is_root(&self) -> bool {
        self.target.container.is_empty()
    }

    fn unsupported(&self, operation: &'static str) -> Error {
        Error::Unsupported {
            url: self.target.url.to_string(),
            operation,
        }
    }

    /// Object names start with this; empty for a whole container.
    fn key_prefix(&self) -> String {
        self.prefix
            .as_deref()
            .map(|prefix| format!("{}/", prefix))
            .unwrap_or_default()
    }

    /// Full names of every object below this directory, markers included;
    /// `None` if the container does not exist.
    fn keys(&self) -> Result<Option<Vec<String>>, Error> {
        let storage = self.target.storage()?;
        let prefix = self.key_prefix();
        Ok(found(storage.list_objects(&self.target.container))?.map(|names| {
            names
                .into_iter()
                .filter(|name| name.starts_with(&prefix))
                .collect()
        }))
    }

    /// Names below this directory, relative to it, without its own marker.
    fn relative_keys(&self) -> Result<Vec<String>, Error> {
        let prefix_len = self.key_prefix().len();
        Ok(self
            .keys()?
            .unwrap_or_default()
            .into_iter()
            .map(|name| name[prefix_len..].to_string())
            .filter(|rest| !rest.is_empty())
            .collect())
    }

    fn require(&self) -> Result<(), Error> {
        if self.exists()? {
            Ok(())
        } else {
            Err(Error::not_found(&self.target.url))
        }
    }

    fn modified(&self) -> Result<DateTime<Utc>, Error> {
        if self.is_root() || self.prefix.is_some() {
            self.require()?;
            return Ok(Utc::now());
        }
        Ok(self
            .target
            .stat(None)?
            .last_modified()
            .unwrap_or_else(Utc::now))
    }
}

impl ResourceCapability for SwiftDirectory {
    fn url(&self) -> &ResourceUrl {
        &self.target.url
    }

    fn exists(&self) -> Result<bool, Error> {
        if self.is_root() {
            self.target.storage()?;
            return Ok(true);
        }
        match self.prefix {
            None => Ok(found(self.target.stat(None))?.is_some()),
            Some(_) => Ok(self.keys()?.is_some_and(|keys| !keys.is_empty())),
        }
    }

    /// Container `Bytes`, or the summed object sizes below a pseudo-directory.
    fn size(&self) -> Result<u64, Error> {
        let storage = self.target.storage()?;
        if self.is_root() {
            let mut total = 0;
            for container in storage.list_objects("")? {
                total += storage
                    .stat_object(&container, None)?
                    .bytes()
                    .unwrap_or(0);
            }
            return Ok(total);
        }
        if self.prefix.is_none() {
            return self
                .target
                .stat(None)?
                .bytes()
                .ok_or_else(|| self.target.unexpected_stat("Bytes"));
        }

        self.require()?;
        let mut total = 0;
        for key in self.keys()?.unwrap_or_default() {
            total += self
                .target
                .on_url(storage.stat_object(&self.target.container, Some(&key)))?
                .content_length()
                .unwrap_or(0);
        }
        Ok(total)
    }

    fn ctime(&self) -> Result<DateTime<Utc>, Error> {
        self.modified()
    }

    fn mtime(&self) -> Result<DateTime<Utc>, Error> {
        self.modified()
    }

    fn atime(&self) -> Result<DateTime<Utc>, Error> {
        self.modified()
    }

    fn create(&mut self) -> Result<bool, Error> {
        if self.is_root() {
            return Err(self.unsupported("create"));
        }
        if self.exists()? {
            return Ok(false);
        }
        match &self.prefix {
            None => self.target.storage()?.create_container(&self.target.container)?,
            Some(_) => self.target.put_empty(&self.key_prefix())?,
        }
        Ok(true)
    }

    fn delete(&mut self) -> Result<bool, Error> {
        if self.is_root() {
            return Err(self.unsupported("delete"));
        }
        let storage = self.target.storage()?;
        if self.prefix.is_none() {
            return storage.delete_object(&self.target.container, None);
        }
        let keys = self.keys()?.unwrap_or_default();
        for key in &keys {
            storage.delete_object(&self.target.container, Some(key))?;
        }
        Ok(!keys.is_empty())
    }

    fn get(&mut self, local: &Path, overwrite: bool) -> Result<PathBuf, Error> {
        if self.is_root() {
            return Err(self.unsupported("get"));
        }
        self.require()?;
        let relatives: Vec<String> = self
            .relative_keys()?
            .into_iter()
            .filter(|relative| {
                let skip = escapes(relative);
                if skip {
                    log::warn!(
                        "skipping {}/{}: outside {}",
                        self.target.container,
                        relative,
                        local.display()
                    );
                }
                !skip
            })
            .collect();
        check_local_conflicts(
            local,
            relatives
                .iter()
                .filter(|rel| !rel.ends_with('/'))
                .map(String::as_str),
            overwrite,
        )?;

        let storage = self.target.storage()?;
        let prefix = self.key_prefix();
        fs::create_dir_all(local)?;
        for relative in &relatives {
            let target = local.join(relative);
            if relative.ends_with('/') {
                fs::create_dir_all(&target)?;
            } else {
                let key = format!("{}{}", prefix, relative);
                download(storage.as_ref(), &self.target.container, &key, &target)?;
            }
        }
        Ok(local.to_path_buf())
    }

    fn put(&mut self, local: &Path, overwrite: bool) -> Result<(), Error> {
        if self.is_root() {
            return Err(self.unsupported("put"));
        }
        let entries = scan_local_dir(local)?;
        if !overwrite {
            let existing: BTreeSet<String> = self.relative_keys()?.into_iter().collect();
            if let Some(clash) = entries
                .iter()
                .find(|e| !e.is_dir && existing.contains(&e.relative))
            {
                return Err(Error::already_exists(&clash.relative, &self.target.url));
            }
        }

        self.create()?;
        let storage = self.target.storage()?;
        let prefix = self.key_prefix();
        for entry in &entries {
            if !entry.is_dir {
                let key = format!("{}{}", prefix, entry.relative);
                log::debug!("upload {} -> {}/{}", entry.path.display(), self.target.container, key);
                storage.put_object(&self.target.container, &key, &entry.path)?;
            } else if fs::read_dir(&entry.path)?.next().is_none() {
                self.target
                    .put_empty(&format!("{}{}/", prefix, entry.relative))?;
            }
        }
        Ok(())
    }
}

impl DirectoryCapability for SwiftDirectory {
    /// Objects by name; pseudo-directories with a trailing `/`.
    fn list(&self) -> Result<BTreeSet<String>, Error> {
        self.require()?;
        if self.is_root() {
            return Ok(self.target.storage()?.list_objects("")?.into_iter().collect());
        }
        Ok(self
            .relative_keys()?
            .into_iter()
            .map(|rest| match rest.split_once('/') {
                Some((first, _)) => format!("{}/", first),
                None => rest,
            })
            .collect())
    }

    fn child(&self, name: &str) -> Result<Resource, Error> {
        Ok(open(Arc::clone(&self.target.location), &self.join(name)))
    }
}
