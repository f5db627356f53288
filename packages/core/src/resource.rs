//! Capability contracts every backend implements.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::{Error, ResourceUrl, StreamMode};

/// Read size used when streaming one file into another.
pub const COPY_CHUNK_SIZE: usize = 1024 * 1024;

/// Operations shared by files and directories.
///
/// Handles hold no cached payload: every query goes to the backend, so two
/// handles on the same URL always agree.
///
/// # Object Safety
///
/// This trait is object-safe: resources are passed around as trait objects
/// inside [`Resource`].
pub trait ResourceCapability: Send {
    fn url(&self) -> &ResourceUrl;

    /// Last path segment of the URL.
    fn name(&self) -> &str {
        self.url().name()
    }

    fn exists(&self) -> Result<bool, Error>;

    /// Size in bytes; for directories, the total size of their contents.
    fn size(&self) -> Result<u64, Error>;

    fn ctime(&self) -> Result<DateTime<Utc>, Error>;

    fn mtime(&self) -> Result<DateTime<Utc>, Error>;

    fn atime(&self) -> Result<DateTime<Utc>, Error>;

    /// Create the resource empty. Returns false if it already existed.
    fn create(&mut self) -> Result<bool, Error>;

    /// Delete the resource. Returns false if it did not exist.
    fn delete(&mut self) -> Result<bool, Error>;

    /// Copy the resource to `local`, returning the path written.
    ///
    /// Fails with [`Error::AlreadyExists`] if `local` exists and `overwrite`
    /// is false. Directories merge into an existing local directory.
    fn get(&mut self, local: &Path, overwrite: bool) -> Result<PathBuf, Error>;

    /// Replace the resource with the content at `local`, creating it if needed.
    fn put(&mut self, local: &Path, overwrite: bool) -> Result<(), Error>;
}

/// A file: a byte sequence with buffered write/append and a read cursor.
///
/// Writes and appends accumulate in a pending buffer that only becomes
/// visible on [`flush`](FileCapability::flush). Reads require that no buffer
/// is open.
pub trait FileCapability: ResourceCapability {
    fn mode(&self) -> StreamMode;

    /// Read up to `max` bytes from the read cursor; `None` reads everything left.
    ///
    /// A short read means end of data.
    fn read(&mut self, max: Option<usize>) -> Result<Vec<u8>, Error>;

    /// Read the whole persisted content from the start.
    fn read_to_end(&mut self) -> Result<Vec<u8>, Error> {
        self.rewind();
        let data = self.read(None)?;
        self.rewind();
        Ok(data)
    }

    fn write(&mut self, data: &[u8]) -> Result<(), Error>;

    fn append(&mut self, data: &[u8]) -> Result<(), Error>;

    /// Commit the pending buffer, creating the file if needed.
    fn flush(&mut self) -> Result<(), Error>;

    /// Discard the pending buffer and read cursor.
    fn reset(&mut self) -> Result<(), Error>;

    /// Restart reads from the beginning of the persisted content.
    fn rewind(&mut self);

    /// Truncate to empty and commit.
    fn empty(&mut self) -> Result<(), Error> {
        self.reset()?;
        self.write(&[])?;
        self.flush()
    }

    /// Stream this file's content into `dest`, replacing what it held.
    fn copy(&mut self, dest: &mut dyn FileCapability) -> Result<(), Error> {
        if !self.exists()? {
            return Err(Error::not_found(self.url()));
        }
        log::debug!("copy {} -> {}", self.url(), dest.url());

        self.rewind();
        dest.write(&[])?;
        loop {
            let chunk = self.read(Some(COPY_CHUNK_SIZE))?;
            dest.write(&chunk)?;
            if chunk.len() < COPY_CHUNK_SIZE {
                break;
            }
        }
        self.rewind();
        dest.flush()
    }
}

/// A directory: a set of named children.
pub trait DirectoryCapability: ResourceCapability {
    /// Names of the direct children.
    fn list(&self) -> Result<BTreeSet<String>, Error>;

    /// URL of the child `name`.
    fn join(&self, name: &str) -> ResourceUrl {
        self.url().join(name)
    }

    /// Open the child `name`, which need not exist.
    fn child(&self, name: &str) -> Result<Resource, Error>;

    fn contains(&self, name: &str) -> Result<bool, Error> {
        Ok(self.exists()? && self.list()?.contains(name))
    }

    /// Copy `file` into this directory under its own name, creating the
    /// directory if needed.
    fn add(&mut self, file: &mut dyn FileCapability, overwrite: bool) -> Result<(), Error> {
        let name = file.name().to_string();
        if !overwrite && self.contains(&name)? {
            return Err(Error::already_exists(name, self.url()));
        }
        self.create()?;
        let mut target = self.child(&name)?.into_file()?;
        file.copy(target.as_mut())
    }

    /// Delete the child `name`.
    fn remove(&mut self, name: &str) -> Result<(), Error> {
        if !self.exists()? {
            return Err(Error::not_found(self.url()));
        }
        if !self.child(name)?.delete()? {
            return Err(Error::not_found(self.join(name)));
        }
        Ok(())
    }
}

/// A resolved resource: either a file or a directory.
pub enum Resource {
    File(Box<dyn FileCapability>),
    Directory(Box<dyn DirectoryCapability>),
}

macro_rules! each {
    ($resource:expr, $inner:ident => $body:expr) => {
        match $resource {
            Resource::File($inner) => $body,
            Resource::Directory($inner) => $body,
        }
    };
}

impl Resource {
    pub fn url(&self) -> &ResourceUrl {
        each!(self, r => r.url())
    }

    pub fn name(&self) -> &str {
        each!(self, r => r.name())
    }

    pub fn is_file(&self) -> bool {
        matches!(self, Resource::File(_))
    }

    pub fn is_directory(&self) -> bool {
        matches!(self, Resource::Directory(_))
    }

    pub fn exists(&self) -> Result<bool, Error> {
        each!(self, r => r.exists())
    }

    pub fn size(&self) -> Result<u64, Error> {
        each!(self, r => r.size())
    }

    pub fn ctime(&self) -> Result<DateTime<Utc>, Error> {
        each!(self, r => r.ctime())
    }

    pub fn mtime(&self) -> Result<DateTime<Utc>, Error> {
        each!(self, r => r.mtime())
    }

    pub fn atime(&self) -> Result<DateTime<Utc>, Error> {
        each!(self, r => r.atime())
    }

    pub fn create(&mut self) -> Result<bool, Error> {
        each!(self, r => r.create())
    }

    pub fn delete(&mut self) -> Result<bool, Error> {
        each!(self, r => r.delete())
    }

    pub fn get(&mut self, local: &Path, overwrite: bool) -> Result<PathBuf, Error> {
        each!(self, r => r.get(local, overwrite))
    }

    pub fn put(&mut self, local: &Path, overwrite: bool) -> Result<(), Error> {
        each!(self, r => r.put(local, overwrite))
    }

    pub fn into_file(self) -> Result<Box<dyn FileCapability>, Error> {
        match self {
            Resource::File(file) => Ok(file),
            Resource::Directory(dir) => Err(wrong_kind(dir.url(), "is a directory")),
        }
    }

    pub fn into_directory(self) -> Result<Box<dyn DirectoryCapability>, Error> {
        match self {
            Resource::Directory(dir) => Ok(dir),
            Resource::File(file) => Err(wrong_kind(file.url(), "is a file")),
        }
    }

    pub fn as_file_mut(&mut self) -> Option<&mut (dyn FileCapability + 'static)> {
        match self {
            Resource::File(file) => Some(file.as_mut()),
            Resource::Directory(_) => None,
        }
    }

    pub fn as_directory_mut(&mut self) -> Option<&mut (dyn DirectoryCapability + 'static)> {
        match self {
            Resource::Directory(dir) => Some(dir.as_mut()),
            Resource::File(_) => None,
        }
    }
}

fn wrong_kind(url: &ResourceUrl, message: &str) -> Error {
    Error::InvalidPathShape {
        location: url.location().to_string(),
        path: url.path().to_string(),
        message: message.to_string(),
    }
}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::File(file) => write!(f, "File({})", file.url()),
            Resource::Directory(dir) => write!(f, "Directory({})", dir.url()),
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.url())
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::Lines;

    fn seeded(path: &str, content: &[u8]) -> (Files, MapFile) {
        let files = Files::default();
        files
            .lock()
            .unwrap()
            .insert(path.to_string(), content.to_vec());
        let file = MapFile::new(&files, path);
        (files, file)
    }

    fn dir(files: &Files, path: &str) -> MapDir {
        MapDir {
            url: ResourceUrl::new("map", "test", path),
            files: files.clone(),
            created: false,
        }
    }

    #[test]
    fn empty_truncates_and_commits() {
        let (files, mut file) = seeded("/a", b"content");
        file.empty().unwrap();
        assert_eq!(files.lock().unwrap()["/a"], b"");
        assert_eq!(file.mode(), StreamMode::Idle);
    }

    #[test]
    fn empty_discards_pending_append() {
        let (files, mut file) = seeded("/a", b"content");
        file.append(b"more").unwrap();
        file.empty().unwrap();
        assert!(files.lock().unwrap()["/a"].is_empty());
    }

    #[test]
    fn copy_replaces_destination() {
        let (files, mut src) = seeded("/src", b"payload");
        files
            .lock()
            .unwrap()
            .insert("/dst".to_string(), b"old content".to_vec());
        let mut dst = MapFile::new(&files, "/dst");

        src.copy(&mut dst).unwrap();
        assert_eq!(files.lock().unwrap()["/dst"], b"payload");
        // Source cursor is rewound afterwards.
        assert_eq!(src.read(None).unwrap(), b"payload");
    }

    #[test]
    fn copy_of_missing_source_fails() {
        let files = Files::default();
        let mut src = MapFile::new(&files, "/missing");
        let mut dst = MapFile::new(&files, "/dst");
        assert!(src.copy(&mut dst).unwrap_err().is_not_found());
        assert!(!dst.exists().unwrap());
    }

    #[test]
    fn read_to_end_ignores_cursor() {
        let (_files, mut file) = seeded("/a", b"abcdef");
        assert_eq!(file.read(Some(3)).unwrap(), b"abc");
        assert_eq!(file.read_to_end().unwrap(), b"abcdef");
    }

    #[test]
    fn add_creates_directory_and_copies() {
        let (files, mut file) = seeded("/src/a", b"data");
        let mut root = dir(&files, "/root/");

        root.add(&mut file, false).unwrap();
        assert!(root.exists().unwrap());
        assert_eq!(root.list().unwrap().into_iter().collect::<Vec<_>>(), vec!["a"]);
        assert!(root.contains("a").unwrap());
    }

    #[test]
    fn add_without_overwrite_rejects_existing_child() {
        let (files, mut file) = seeded("/src/a", b"data");
        let mut root = dir(&files, "/root/");
        root.add(&mut file, false).unwrap();

        let err = root.add(&mut file, false).unwrap_err();
        assert!(matches!(err, Error::AlreadyExists { ref name, .. } if name == "a"));
        root.add(&mut file, true).unwrap();
    }

    #[test]
    fn remove_missing_child_is_not_found() {
        let (files, mut file) = seeded("/src/a", b"data");
        let mut root = dir(&files, "/root/");
        assert!(root.remove("a").unwrap_err().is_not_found());

        root.add(&mut file, true).unwrap();
        root.remove("a").unwrap();
        assert!(!root.contains("a").unwrap());
        assert!(root.remove("a").unwrap_err().is_not_found());
    }

    #[test]
    fn resource_kind_conversions() {
        let files = Files::default();
        let file = Resource::File(Box::new(MapFile::new(&files, "/f")));
        assert!(file.is_file());
        assert_eq!(file.name(), "f");
        assert!(matches!(
            file.into_directory(),
            Err(Error::InvalidPathShape { .. })
        ));

        let mut directory = Resource::Directory(Box::new(dir(&files, "/d/")));
        assert!(directory.as_file_mut().is_none());
        assert!(directory.as_directory_mut().is_some());
        assert_eq!(format!("{:?}", directory), "Directory(map://test/d/)");
        assert!(directory.into_directory().is_ok());
    }

    #[test]
    fn lines_split_on_newline() {
        let (_files, mut file) = seeded("/f", b"line1\nline2\n");
        let lines: Vec<_> = Lines::new(&mut file).map(Result::unwrap).collect();
        assert_eq!(lines, vec![b"line1\n".to_vec(), b"line2\n".to_vec()]);
    }

    #[test]
    fn lines_keep_trailing_partial_line() {
        let (_files, mut file) = seeded("/f", b"a\n\nb");
        let lines: Vec<_> = Lines::new(&mut file).map(Result::unwrap).collect();
        assert_eq!(lines, vec![b"a\n".to_vec(), b"\n".to_vec(), b"b".to_vec()]);
    }

    #[test]
    fn lines_of_empty_file() {
        let (_files, mut file) = seeded("/f", b"");
        assert_eq!(Lines::new(&mut file).count(), 0);
    }

    #[test]
    fn lines_span_read_chunks() {
        let long = vec![b'x'; 20_000];
        let mut content = long.clone();
        content.extend_from_slice(b"\nshort\n");
        let (_files, file) = seeded("/f", &content);
        let mut boxed: Box<dyn FileCapability> = Box::new(file);

        let lines: Vec<_> = boxed.lines().map(Result::unwrap).collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(&lines[0][..20_000], &long[..]);
        assert_eq!(lines[1], b"short\n");
    }

    #[test]
    fn lines_yield_read_error_once() {
        let files = Files::default();
        let mut file = MapFile::new(&files, "/missing");
        let mut lines = Lines::new(&mut file);
        assert!(lines.next().unwrap().unwrap_err().is_not_found());
        assert!(lines.next().is_none());
    }
}
