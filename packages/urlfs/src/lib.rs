//! urlfs: one URL-addressed file API over local disk, memory, ssh and swift.
//!
//! [`Urlfs`] wires a [`Registry`] with every backend:
//! - `file://` and bare paths: [`LocalBackend`]
//! - `mem://<location>/...`: an in-process [`MemoryBackend`]
//! - `ssh://[user@]host/...`: [`SshBackend`] over the configured `ssh`/`scp`
//! - `swift://<profile>/container/key`: [`SwiftBackend`], one location per
//!   profile in the [`Config`]
//!
//! # Example
//!
//! ```rust
//! use urlfs::{Config, Urlfs};
//!
//! let fs = Urlfs::from_config(&Config::default()).unwrap();
//! let mut file = fs.open_file("mem://scratch/notes.txt").unwrap();
//! file.write(b"hello").unwrap();
//! file.flush().unwrap();
//!
//! let dir = fs.open_directory("mem://scratch/").unwrap();
//! assert!(dir.list().unwrap().contains("notes.txt"));
//! ```

mod config;

use std::sync::Arc;

pub use config::{Config, CONFIG_ENV};
pub use urlfs_core::{
    Bytes, DirectoryCapability, Error, FileCapability, Lines, Registry, Resource,
    ResourceCapability, ResourceFactory, ResourceUrl, StreamMode, COPY_CHUNK_SIZE, LOCAL_SCHEME,
};
pub use urlfs_local::LocalBackend;
pub use urlfs_memory::{MemoryBackend, MEM_SCHEME};
pub use urlfs_ssh::{OpenSsh, RemoteShell, SshBackend, SSH_SCHEME};
pub use urlfs_swift::{ObjectStorage, SwiftBackend, SwiftLocation, SwiftProfile, SWIFT_SCHEME};

/// A registry wired with all four backends.
///
/// Dropping it closes every swift location, removing their staging
/// directories.
#[derive(Debug)]
pub struct Urlfs {
    registry: Registry,
    memory: MemoryBackend,
    swift: SwiftBackend,
}

impl Urlfs {
    pub fn from_config(config: &Config) -> Result<Self, Error> {
        Self::with_shell(config, config.ssh.clone())
    }

    /// Like [`Urlfs::from_config`], but reach ssh hosts through `shell`.
    pub fn with_shell(config: &Config, shell: impl RemoteShell + 'static) -> Result<Self, Error> {
        let memory = MemoryBackend::new();
        let swift = SwiftBackend::new();

        let mut registry = Registry::new();
        registry.register(LOCAL_SCHEME, LocalBackend::new())?;
        registry.register(MEM_SCHEME, memory.clone())?;
        registry.register(SSH_SCHEME, SshBackend::new(shell))?;
        registry.register(SWIFT_SCHEME, swift.clone())?;

        for (name, profile) in &config.swift {
            swift.register_profile(name, profile.clone())?;
        }
        log::debug!(
            "urlfs ready: {} swift location(s)",
            swift.location_names().len()
        );

        Ok(Self {
            registry,
            memory,
            swift,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// For registering extra schemes.
    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    pub fn memory(&self) -> &MemoryBackend {
        &self.memory
    }

    pub fn swift(&self) -> &SwiftBackend {
        &self.swift
    }

    /// Make `storage` reachable as `swift://<name>/...`.
    pub fn register_swift(
        &self,
        name: &str,
        storage: Arc<dyn ObjectStorage>,
    ) -> Result<Arc<SwiftLocation>, Error> {
        self.swift.register_location(name, storage)
    }

    pub fn resolve(&self, url: &str) -> Result<Resource, Error> {
        self.registry.resolve(url)
    }

    pub fn open_file(&self, url: &str) -> Result<Box<dyn FileCapability>, Error> {
        self.resolve(url)?.into_file()
    }

    pub fn open_directory(&self, url: &str) -> Result<Box<dyn DirectoryCapability>, Error> {
        self.resolve(url)?.into_directory()
    }

    /// Copy the file at `src` to `dest`.
    ///
    /// A directory `dest` receives the file under its own name; otherwise
    /// `dest` is the target file. Without `overwrite`, an existing target
    /// is an [`Error::AlreadyExists`].
    pub fn copy(&self, src: &str, dest: &str, overwrite: bool) -> Result<ResourceUrl, Error> {
        let mut source = self.open_file(src)?;
        match self.resolve(dest)? {
            Resource::Directory(mut dir) => {
                dir.add(source.as_mut(), overwrite)?;
                Ok(dir.join(source.name()))
            }
            Resource::File(mut target) => {
                if !overwrite && target.exists()? {
                    return Err(Error::already_exists(target.name(), parent(target.url())));
                }
                source.copy(target.as_mut())?;
                Ok(target.url().clone())
            }
        }
    }

    /// Close every swift location. Later swift access fails.
    pub fn close(&self) {
        self.swift.close_all();
    }
}

fn parent(url: &ResourceUrl) -> ResourceUrl {
    let path = url.path().trim_end_matches('/');
    let parent = &path[..path.len() - url.name().len()];
    ResourceUrl::new(url.scheme(), url.location(), parent)
}

impl Drop for Urlfs {
    fn drop(&mut self) {
        self.close();
    }
}
