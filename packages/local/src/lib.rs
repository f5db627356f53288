//! Local filesystem backend.
//!
//! Serves `file://` URLs and bare paths. Reads stream straight from disk;
//! writes and appends are buffered and land atomically on flush (a temp file
//! next to the target, persisted over it).

use std::collections::BTreeSet;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use tempfile::NamedTempFile;
use urlfs_core::transfer::{
    check_local_conflicts, check_local_target, copy_local_entries, scan_local_dir,
};
use urlfs_core::{
    DirectoryCapability, Error, FileCapability, FileStream, ReadSource, ReadView, Resource,
    ResourceCapability, ResourceFactory, ResourceUrl, StreamMode,
};

/// Factory for local resources.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalBackend;

impl LocalBackend {
    pub fn new() -> Self {
        Self
    }
}

impl ResourceFactory for LocalBackend {
    fn open(&self, url: &ResourceUrl) -> Result<Resource, Error> {
        if !matches!(url.location(), "" | "localhost") {
            return Err(Error::InvalidUrl {
                url: url.to_string(),
                message: "file URLs cannot name a remote host".to_string(),
            });
        }
        let path = local_path(url);

        match fs::metadata(&path) {
            Ok(meta) if meta.is_dir() => Ok(directory(url, path)),
            Ok(_) if url.is_dir_path() => Err(Error::InvalidPathShape {
                location: url.location().to_string(),
                path: url.path().to_string(),
                message: format!("{} is a file", path.display()),
            }),
            Err(_) if url.is_dir_path() => Ok(directory(url, path)),
            _ => Ok(Resource::File(Box::new(LocalFile {
                url: url.clone(),
                stream: FileStream::new(url.to_string()),
                path,
            }))),
        }
    }
}

fn local_path(url: &ResourceUrl) -> PathBuf {
    let trimmed = url.path().trim_end_matches('/');
    if trimmed.is_empty() {
        PathBuf::from("/")
    } else {
        PathBuf::from(trimmed)
    }
}

fn directory(url: &ResourceUrl, path: PathBuf) -> Resource {
    Resource::Directory(Box::new(LocalDirectory {
        url: url.clone(),
        path,
    }))
}

fn metadata(path: &Path, url: &ResourceUrl) -> Result<fs::Metadata, Error> {
    fs::metadata(path).map_err(|e| Error::from_io(e, url))
}

fn to_utc(time: io::Result<SystemTime>) -> Result<DateTime<Utc>, Error> {
    Ok(DateTime::<Utc>::from(time?))
}

#[cfg(unix)]
fn status_change_time(meta: &fs::Metadata) -> Result<DateTime<Utc>, Error> {
    use std::os::unix::fs::MetadataExt;

    DateTime::from_timestamp(meta.ctime(), meta.ctime_nsec() as u32).ok_or_else(|| {
        Error::Io(io::Error::other(format!(
            "ctime out of range: {}",
            meta.ctime()
        )))
    })
}

#[cfg(not(unix))]
fn status_change_time(meta: &fs::Metadata) -> Result<DateTime<Utc>, Error> {
    to_utc(meta.created())
}

/// A local file.
pub struct LocalFile {
    url: ResourceUrl,
    path: PathBuf,
    stream: FileStream,
}

impl LocalFile {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn ensure_parent(path: &Path) -> Result<&Path, Error> {
    let parent = path.parent().unwrap_or(Path::new("/"));
    fs::create_dir_all(parent)?;
    Ok(parent)
}

impl ResourceCapability for LocalFile {
    fn url(&self) -> &ResourceUrl {
        &self.url
    }

    fn exists(&self) -> Result<bool, Error> {
        Ok(self.path.is_file())
    }

    fn size(&self) -> Result<u64, Error> {
        Ok(metadata(&self.path, &self.url)?.len())
    }

    fn ctime(&self) -> Result<DateTime<Utc>, Error> {
        status_change_time(&metadata(&self.path, &self.url)?)
    }

    fn mtime(&self) -> Result<DateTime<Utc>, Error> {
        to_utc(metadata(&self.path, &self.url)?.modified())
    }

    fn atime(&self) -> Result<DateTime<Utc>, Error> {
        to_utc(metadata(&self.path, &self.url)?.accessed())
    }

    fn create(&mut self) -> Result<bool, Error> {
        ensure_parent(&self.path)?;
        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)
        {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(Error::Io(e)),
        }
    }

    fn delete(&mut self) -> Result<bool, Error> {
        self.stream.rewind();
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Error::Io(e)),
        }
    }

    fn get(&mut self, local: &Path, overwrite: bool) -> Result<PathBuf, Error> {
        if !self.exists()? {
            return Err(Error::not_found(&self.url));
        }
        check_local_target(local, overwrite)?;
        if let Some(parent) = local.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(&self.path, local).map_err(|e| Error::from_io(e, &self.url))?;
        Ok(local.to_path_buf())
    }

    fn put(&mut self, local: &Path, overwrite: bool) -> Result<(), Error> {
        if !overwrite && self.exists()? {
            return Err(Error::already_exists(self.name(), &self.url));
        }
        ensure_parent(&self.path)?;
        fs::copy(local, &self.path).map_err(|e| Error::from_io(e, local.display()))?;
        self.stream.rewind();
        Ok(())
    }
}

impl FileCapability for LocalFile {
    fn mode(&self) -> StreamMode {
        self.stream.mode()
    }

    fn read(&mut self, max: Option<usize>) -> Result<Vec<u8>, Error> {
        let (path, url) = (&self.path, &self.url);
        self.stream.read(max, || {
            let file = fs::File::open(path).map_err(|e| Error::from_io(e, url))?;
            Ok(ReadView::boxed(ReadSource::new(file)))
        })
    }

    fn write(&mut self, data: &[u8]) -> Result<(), Error> {
        self.stream.write(data, || Ok(Vec::new()))
    }

    fn append(&mut self, data: &[u8]) -> Result<(), Error> {
        let path = &self.path;
        self.stream.append(data, || match fs::read(path) {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(Error::Io(e)),
        })
    }

    fn flush(&mut self) -> Result<(), Error> {
        let (path, url) = (&self.path, &self.url);
        self.stream.flush(|buf| {
            log::debug!("flush {} ({} bytes)", url, buf.len());
            let mut staged = NamedTempFile::new_in(ensure_parent(path)?)?;
            staged.write_all(buf)?;
            staged.persist(path).map_err(|e| Error::Io(e.error))?;
            Ok(())
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

/// A local directory.
pub struct LocalDirectory {
    url: ResourceUrl,
    path: PathBuf,
}

impl LocalDirectory {
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn require(&self) -> Result<(), Error> {
        if self.path.is_dir() {
            Ok(())
        } else {
            Err(Error::not_found(&self.url))
        }
    }
}

impl ResourceCapability for LocalDirectory {
    fn url(&self) -> &ResourceUrl {
        &self.url
    }

    fn exists(&self) -> Result<bool, Error> {
        Ok(self.path.is_dir())
    }

    fn size(&self) -> Result<u64, Error> {
        self.require()?;
        let mut total = 0;
        for entry in scan_local_dir(&self.path)? {
            if !entry.is_dir {
                total += fs::metadata(&entry.path)?.len();
            }
        }
        Ok(total)
    }

    fn ctime(&self) -> Result<DateTime<Utc>, Error> {
        status_change_time(&metadata(&self.path, &self.url)?)
    }

    fn mtime(&self) -> Result<DateTime<Utc>, Error> {
        to_utc(metadata(&self.path, &self.url)?.modified())
    }

    fn atime(&self) -> Result<DateTime<Utc>, Error> {
        to_utc(metadata(&self.path, &self.url)?.accessed())
    }

    fn create(&mut self) -> Result<bool, Error> {
        if self.path.is_dir() {
            return Ok(false);
        }
        fs::create_dir_all(&self.path).map_err(|e| Error::from_io(e, &self.url))?;
        Ok(true)
    }

    fn delete(&mut self) -> Result<bool, Error> {
        match fs::remove_dir_all(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Error::Io(e)),
        }
    }

    fn get(&mut self, local: &Path, overwrite: bool) -> Result<PathBuf, Error> {
        self.require()?;
        let entries = scan_local_dir(&self.path)?;
        check_local_conflicts(
            local,
            entries
                .iter()
                .filter(|e| !e.is_dir)
                .map(|e| e.relative.as_str()),
            overwrite,
        )?;
        copy_local_entries(&entries, local)?;
        Ok(local.to_path_buf())
    }

    fn put(&mut self, local: &Path, overwrite: bool) -> Result<(), Error> {
        let entries = scan_local_dir(local)?;
        check_local_conflicts(
            &self.path,
            entries
                .iter()
                .filter(|e| !e.is_dir)
                .map(|e| e.relative.as_str()),
            overwrite,
        )?;
        copy_local_entries(&entries, &self.path)
    }
}

impl DirectoryCapability for LocalDirectory {
    fn list(&self) -> Result<BTreeSet<String>, Error> {
        let mut names = BTreeSet::new();
        for entry in fs::read_dir(&self.path).map_err(|e| Error::from_io(e, &self.url))? {
            names.insert(entry?.file_name().to_string_lossy().into_owned());
        }
        Ok(names)
    }

    fn child(&self, name: &str) -> Result<Resource, Error> {
        LocalBackend.open(&self.join(name))
    }
}
