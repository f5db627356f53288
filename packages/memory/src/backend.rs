//! File and directory resources over the shared [`PathTree`].

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use urlfs_core::transfer::{
    check_local_conflicts, check_local_target, read_local_file, scan_local_dir, write_local_file,
};
use urlfs_core::{
    DirectoryCapability, Error, FileCapability, FileStream, OnceSource, ReadView, Resource,
    ResourceCapability, ResourceFactory, ResourceUrl, StreamMode,
};

use crate::tree::{Node, PathTree, Resolve};

/// Default scheme served by [`MemoryBackend`].
pub const MEM_SCHEME: &str = "mem";

/// Factory for `mem://` resources.
///
/// Clones share one tree; every handle goes back to it on each operation.
///
/// # Example
///
/// ```rust
/// use urlfs_core::{Registry, ResourceFactory};
/// use urlfs_memory::MemoryBackend;
///
/// let backend = MemoryBackend::new();
/// let mut registry = Registry::new();
/// registry.register("mem", backend.clone()).unwrap();
///
/// let mut file = registry.resolve("mem://scratch/notes.txt").unwrap().into_file().unwrap();
/// file.write(b"hello").unwrap();
/// file.flush().unwrap();
///
/// let mut again = registry.resolve("mem://scratch/notes.txt").unwrap().into_file().unwrap();
/// assert_eq!(again.read(None).unwrap(), b"hello");
/// ```
#[derive(Clone, Debug)]
pub struct MemoryBackend {
    tree: Arc<Mutex<PathTree>>,
    scheme: String,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::with_scheme(MEM_SCHEME)
    }

    /// A backend whose roots are keyed under `scheme`, so several in-memory
    /// schemes can share one process without seeing each other's data.
    pub fn with_scheme(scheme: &str) -> Self {
        Self {
            tree: Arc::new(Mutex::new(PathTree::new())),
            scheme: scheme.to_ascii_lowercase(),
        }
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, PathTree> {
        self.tree.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store `content` as the file at `path` under `location`, creating parents.
    pub fn seed(&self, location: &str, path: &str, content: impl Into<Bytes>) -> Result<(), Error> {
        self.lock()
            .set(&self.scheme, location, path, Node::Leaf(content.into()))
    }
}

impl ResourceFactory for MemoryBackend {
    fn open(&self, url: &ResourceUrl) -> Result<Resource, Error> {
        let is_dir = self
            .lock()
            .get(&self.scheme, url.location(), url.path())?
            .map(Node::is_dir);

        match is_dir {
            Some(true) => Ok(self.directory(url)),
            None if url.is_dir_path() || url.path().is_empty() => Ok(self.directory(url)),
            Some(false) if url.is_dir_path() => Err(Error::InvalidPathShape {
                location: url.location().to_string(),
                path: url.path().to_string(),
                message: format!("{} is a file", url.path().trim_end_matches('/')),
            }),
            _ => Ok(Resource::File(Box::new(MemFile {
                backend: self.clone(),
                stream: FileStream::new(url.to_string()),
                url: url.clone(),
            }))),
        }
    }
}

impl MemoryBackend {
    fn directory(&self, url: &ResourceUrl) -> Resource {
        Resource::Directory(Box::new(MemDirectory {
            backend: self.clone(),
            url: url.clone(),
        }))
    }

    /// Current content of the leaf at `url`; `None` if absent.
    fn leaf(&self, url: &ResourceUrl) -> Result<Option<Bytes>, Error> {
        match self.lock().get(&self.scheme, url.location(), url.path())? {
            Some(Node::Leaf(data)) => Ok(Some(data.clone())),
            Some(Node::Dir(_)) => Err(Error::InvalidPathShape {
                location: url.location().to_string(),
                path: url.path().to_string(),
                message: "is a directory".to_string(),
            }),
            None => Ok(None),
        }
    }

    /// Store `content` at `url` unless a directory is already there.
    fn set_leaf(&self, url: &ResourceUrl, content: Bytes) -> Result<(), Error> {
        let mut tree = self.lock();
        if let Some(Node::Dir(_)) = tree.get(&self.scheme, url.location(), url.path())? {
            return Err(Error::InvalidPathShape {
                location: url.location().to_string(),
                path: url.path().to_string(),
                message: "is a directory".to_string(),
            });
        }
        tree.set(&self.scheme, url.location(), url.path(), Node::Leaf(content))
    }

    fn node(&self, url: &ResourceUrl) -> Result<Option<Node>, Error> {
        Ok(self
            .lock()
            .get(&self.scheme, url.location(), url.path())?
            .cloned())
    }
}

/// A file in the tree. Holds only its URL and stream state.
pub struct MemFile {
    backend: MemoryBackend,
    url: ResourceUrl,
    stream: FileStream,
}

impl MemFile {
    fn require(&self) -> Result<Bytes, Error> {
        self.backend
            .leaf(&self.url)?
            .ok_or_else(|| Error::not_found(&self.url))
    }

    fn now_if_exists(&self) -> Result<DateTime<Utc>, Error> {
        self.require()?;
        Ok(Utc::now())
    }
}

impl ResourceCapability for MemFile {
    fn url(&self) -> &ResourceUrl {
        &self.url
    }

    fn exists(&self) -> Result<bool, Error> {
        Ok(matches!(self.backend.node(&self.url)?, Some(Node::Leaf(_))))
    }

    fn size(&self) -> Result<u64, Error> {
        Ok(self.require()?.len() as u64)
    }

    fn ctime(&self) -> Result<DateTime<Utc>, Error> {
        self.now_if_exists()
    }

    fn mtime(&self) -> Result<DateTime<Utc>, Error> {
        self.now_if_exists()
    }

    fn atime(&self) -> Result<DateTime<Utc>, Error> {
        self.now_if_exists()
    }

    fn create(&mut self) -> Result<bool, Error> {
        if self.backend.leaf(&self.url)?.is_some() {
            return Ok(false);
        }
        let backend = &self.backend;
        backend.lock().resolve(
            &backend.scheme,
            self.url.location(),
            self.url.path(),
            Resolve::create(),
        )?;
        Ok(true)
    }

    fn delete(&mut self) -> Result<bool, Error> {
        let backend = &self.backend;
        let removed = backend
            .lock()
            .delete(&backend.scheme, self.url.location(), self.url.path())?;
        self.stream.rewind();
        Ok(removed.is_some())
    }

    fn get(&mut self, local: &Path, overwrite: bool) -> Result<PathBuf, Error> {
        let content = self.require()?;
        check_local_target(local, overwrite)?;
        write_local_file(local, &content)?;
        Ok(local.to_path_buf())
    }

    fn put(&mut self, local: &Path, overwrite: bool) -> Result<(), Error> {
        if self.backend.leaf(&self.url)?.is_some() && !overwrite {
            return Err(Error::already_exists(self.name(), &self.url));
        }
        let content = read_local_file(local)?;
        self.backend.set_leaf(&self.url, content.into())?;
        self.stream.rewind();
        Ok(())
    }
}

impl FileCapability for MemFile {
    fn mode(&self) -> StreamMode {
        self.stream.mode()
    }

    fn read(&mut self, max: Option<usize>) -> Result<Vec<u8>, Error> {
        let (backend, url) = (&self.backend, &self.url);
        self.stream.read(max, || {
            let content = backend.leaf(url)?.ok_or_else(|| Error::not_found(url))?;
            Ok(ReadView::boxed(OnceSource::new(content)))
        })
    }

    fn write(&mut self, data: &[u8]) -> Result<(), Error> {
        self.stream.write(data, || Ok(Vec::new()))
    }

    fn append(&mut self, data: &[u8]) -> Result<(), Error> {
        let (backend, url) = (&self.backend, &self.url);
        self.stream.append(data, || {
            Ok(backend.leaf(url)?.map(Vec::from).unwrap_or_default())
        })
    }

    fn flush(&mut self) -> Result<(), Error> {
        let (backend, url) = (&self.backend, &self.url);
        self.stream.flush(|buf| {
            log::debug!("flush {} ({} bytes)", url, buf.len());
            backend.set_leaf(url, Bytes::copy_from_slice(buf))
        })?;
        Ok(())
    }

    fn reset(&mut self) -> Result<(), Error> {
        self.stream.reset();
        Ok(())
    }

    fn rewind(&mut self) {
        self.stream.rewind();
    }
}

/// A directory (interior node) in the tree.
pub struct MemDirectory {
    backend: MemoryBackend,
    url: ResourceUrl,
}

impl MemDirectory {
    fn require(&self) -> Result<BTreeMap<String, Node>, Error> {
        match self.backend.node(&self.url)? {
            Some(Node::Dir(children)) => Ok(children),
            Some(Node::Leaf(_)) => Err(Error::InvalidPathShape {
                location: self.url.location().to_string(),
                path: self.url.path().to_string(),
                message: "is a file".to_string(),
            }),
            None => Err(Error::not_found(&self.url)),
        }
    }

    fn now_if_exists(&self) -> Result<DateTime<Utc>, Error> {
        self.require()?;
        Ok(Utc::now())
    }

    /// Materialize this directory if nothing is at its path yet.
    fn ensure(&self, tree: &mut PathTree) -> Result<bool, Error> {
        let (scheme, location, path) = (&self.backend.scheme, self.url.location(), self.url.path());
        if tree.get(scheme, location, path)?.is_some() {
            return Ok(false);
        }
        if path.trim_matches('/').is_empty() {
            tree.ensure_location(scheme, location);
        } else {
            tree.set(scheme, location, path, Node::empty_dir())?;
        }
        Ok(true)
    }
}

impl ResourceCapability for MemDirectory {
    fn url(&self) -> &ResourceUrl {
        &self.url
    }

    fn exists(&self) -> Result<bool, Error> {
        Ok(matches!(self.backend.node(&self.url)?, Some(Node::Dir(_))))
    }

    fn size(&self) -> Result<u64, Error> {
        Ok(self.require()?.values().map(Node::size).sum())
    }

    fn ctime(&self) -> Result<DateTime<Utc>, Error> {
        self.now_if_exists()
    }

    fn mtime(&self) -> Result<DateTime<Utc>, Error> {
        self.now_if_exists()
    }

    fn atime(&self) -> Result<DateTime<Utc>, Error> {
        self.now_if_exists()
    }

    fn create(&mut self) -> Result<bool, Error> {
        let mut tree = self.backend.lock();
        self.ensure(&mut tree)
    }

    fn delete(&mut self) -> Result<bool, Error> {
        let backend = &self.backend;
        let removed = backend
            .lock()
            .delete(&backend.scheme, self.url.location(), self.url.path())?;
        Ok(removed.is_some())
    }

    fn get(&mut self, local: &Path, overwrite: bool) -> Result<PathBuf, Error> {
        let node = Node::Dir(self.require()?);
        let leaves = node.leaves();
        check_local_conflicts(local, leaves.iter().map(|(p, _)| p.as_str()), overwrite)?;

        std::fs::create_dir_all(local)?;
        for dir in node.dirs() {
            std::fs::create_dir_all(local.join(dir))?;
        }
        for (relative, content) in leaves {
            write_local_file(&local.join(relative), &content)?;
        }
        Ok(local.to_path_buf())
    }

    fn put(&mut self, local: &Path, overwrite: bool) -> Result<(), Error> {
        let entries = scan_local_dir(local)?;
        let scheme = &self.backend.scheme;
        let (location, base) = (self.url.location(), self.url.path().trim_end_matches('/'));

        let mut tree = self.backend.lock();
        if !overwrite {
            for entry in entries.iter().filter(|e| !e.is_dir) {
                let path = format!("{}/{}", base, entry.relative);
                if tree.get(scheme, location, &path)?.is_some() {
                    return Err(Error::already_exists(entry.relative.clone(), &self.url));
                }
            }
        }

        self.ensure(&mut tree)?;
        for entry in entries {
            let path = format!("{}/{}", base, entry.relative);
            if entry.is_dir {
                if tree.get(scheme, location, &path)?.is_none() {
                    tree.set(scheme, location, &path, Node::empty_dir())?;
                }
            } else {
                let content = read_local_file(&entry.path)?;
                tree.set(scheme, location, &path, Node::Leaf(content.into()))?;
            }
        }
        log::debug!("put {} into {}", local.display(), self.url);
        Ok(())
    }
}

impl DirectoryCapability for MemDirectory {
    fn list(&self) -> Result<BTreeSet<String>, Error> {
        Ok(self.require()?.into_keys().collect())
    }

    fn child(&self, name: &str) -> Result<Resource, Error> {
        self.backend.open(&self.join(name))
    }
}
