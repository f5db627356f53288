//! File and directory resources on a remote host.
//!
//! Every operation is one remote command through the [`RemoteShell`]; no
//! state is cached between calls apart from the file stream.

use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tempfile::{NamedTempFile, TempDir};
use urlfs_core::transfer::{
    check_local_conflicts, check_local_target, copy_local_entries, scan_local_dir,
};
use urlfs_core::{
    DirectoryCapability, Error, FileCapability, FileStream, OnceSource, ReadView, Resource,
    ResourceCapability, ResourceFactory, ResourceUrl, StreamMode,
};

use crate::shell::{quote, CommandOutput, OpenSsh, RemoteShell};

pub const SSH_SCHEME: &str = "ssh";

/// Host used when the URL names none.
pub const DEFAULT_LOCATION: &str = "localhost";

/// Factory for `ssh://` resources.
#[derive(Clone)]
pub struct SshBackend {
    shell: Arc<dyn RemoteShell>,
}

impl Default for SshBackend {
    fn default() -> Self {
        Self::new(OpenSsh::default())
    }
}

impl fmt::Debug for SshBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SshBackend").finish_non_exhaustive()
    }
}

impl SshBackend {
    pub fn new(shell: impl RemoteShell + 'static) -> Self {
        Self::with_shell(Arc::new(shell))
    }

    pub fn with_shell(shell: Arc<dyn RemoteShell>) -> Self {
        Self { shell }
    }
}

impl ResourceFactory for SshBackend {
    fn open(&self, url: &ResourceUrl) -> Result<Resource, Error> {
        open(&self.shell, url)
    }
}

fn open(shell: &Arc<dyn RemoteShell>, url: &ResourceUrl) -> Result<Resource, Error> {
    let remote = Remote::new(shell, url);
    let kind = remote.run(&format!("stat --format=%F {}", remote.quoted()))?;
    let is_directory = kind.success() && kind.stdout_str().trim() == "directory";

    if is_directory || (!kind.success() && url.is_dir_path()) {
        return Ok(Resource::Directory(Box::new(SshDirectory { remote })));
    }
    if url.is_dir_path() {
        return Err(Error::InvalidPathShape {
            location: remote.location.clone(),
            path: remote.path.clone(),
            message: format!("{} is not a directory", remote.path),
        });
    }
    Ok(Resource::File(Box::new(SshFile {
        stream: FileStream::new(url.to_string()),
        remote,
    })))
}

/// Where a resource lives and how to reach it.
struct Remote {
    shell: Arc<dyn RemoteShell>,
    url: ResourceUrl,
    location: String,
    path: String,
}

impl Remote {
    fn new(shell: &Arc<dyn RemoteShell>, url: &ResourceUrl) -> Self {
        let location = match url.location() {
            "" => DEFAULT_LOCATION,
            location => location,
        };
        let path = match url.path().trim_end_matches('/') {
            "" => "/",
            path => path,
        };
        Self {
            shell: Arc::clone(shell),
            url: url.clone(),
            location: location.to_string(),
            path: path.to_string(),
        }
    }

    fn quoted(&self) -> String {
        quote(&self.path)
    }

    fn parent(&self) -> String {
        match self.path.rsplit_once('/') {
            Some(("", _)) | None => "/".to_string(),
            Some((parent, _)) => parent.to_string(),
        }
    }

    fn run(&self, line: &str) -> Result<CommandOutput, Error> {
        log::debug!("{}: {}", self.location, line);
        self.shell.run_command(&self.location, line)
    }

    fn check(&self, line: &str) -> Result<CommandOutput, Error> {
        self.run(line)?.check(line)
    }

    /// `test -<flag>` on the path.
    fn test(&self, flag: char) -> Result<bool, Error> {
        Ok(self
            .run(&format!("test -{} {}", flag, self.quoted()))?
            .success())
    }

    /// Run `line`; on failure report NotFound if the `test -<flag>` check
    /// fails too, otherwise the command failure.
    fn query(&self, line: &str, flag: char) -> Result<CommandOutput, Error> {
        let output = self.run(line)?;
        if output.success() {
            return Ok(output);
        }
        if !self.test(flag)? {
            return Err(Error::not_found(&self.url));
        }
        output.check(line)
    }

    fn times(&self, flag: char) -> Result<RemoteTimes, Error> {
        let line = format!("stat --format='%X %Y %Z' {}", self.quoted());
        let stdout = self.query(&line, flag)?.stdout_str();
        let fields: Vec<i64> = stdout
            .split_whitespace()
            .map(|field| field.parse::<i64>())
            .collect::<Result<_, _>>()
            .map_err(|_| unexpected(&line, &stdout))?;
        match fields[..] {
            [atime, mtime, ctime] => Ok(RemoteTimes {
                atime: timestamp(atime, &line)?,
                mtime: timestamp(mtime, &line)?,
                ctime: timestamp(ctime, &line)?,
            }),
            _ => Err(unexpected(&line, &stdout)),
        }
    }

    /// First whitespace-separated field of `line`'s output as a number.
    fn number(&self, line: &str, flag: char) -> Result<u64, Error> {
        let stdout = self.query(line, flag)?.stdout_str();
        stdout
            .split_whitespace()
            .next()
            .and_then(|field| field.parse().ok())
            .ok_or_else(|| unexpected(line, &stdout))
    }

    fn mkdir_parent(&self) -> Result<(), Error> {
        self.check(&format!("mkdir -p {}", quote(&self.parent())))?;
        Ok(())
    }
}

struct RemoteTimes {
    atime: DateTime<Utc>,
    mtime: DateTime<Utc>,
    ctime: DateTime<Utc>,
}

fn timestamp(secs: i64, line: &str) -> Result<DateTime<Utc>, Error> {
    DateTime::from_timestamp(secs, 0).ok_or_else(|| unexpected(line, &secs.to_string()))
}

fn unexpected(line: &str, stdout: &str) -> Error {
    Error::BackendCommandFailure {
        command: line.to_string(),
        status: Some(0),
        message: format!("unexpected output {:?}", stdout.trim()),
    }
}

/// A file on a remote host.
pub struct SshFile {
    remote: Remote,
    stream: FileStream,
}

impl SshFile {
    pub fn location(&self) -> &str {
        &self.remote.location
    }

    /// Current remote content, `None` if there is no such file.
    fn content(&self) -> Result<Option<Vec<u8>>, Error> {
        let line = format!("cat {}", self.remote.quoted());
        match self.remote.query(&line, 'f') {
            Ok(output) => Ok(Some(output.stdout)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }
}

impl ResourceCapability for SshFile {
    fn url(&self) -> &ResourceUrl {
        &self.remote.url
    }

    fn exists(&self) -> Result<bool, Error> {
        self.remote.test('f')
    }

    fn size(&self) -> Result<u64, Error> {
        self.remote
            .number(&format!("stat --format=%s {}", self.remote.quoted()), 'f')
    }

    fn ctime(&self) -> Result<DateTime<Utc>, Error> {
        Ok(self.remote.times('f')?.ctime)
    }

    fn mtime(&self) -> Result<DateTime<Utc>, Error> {
        Ok(self.remote.times('f')?.mtime)
    }

    fn atime(&self) -> Result<DateTime<Utc>, Error> {
        Ok(self.remote.times('f')?.atime)
    }

    fn create(&mut self) -> Result<bool, Error> {
        if self.remote.test('e')? {
            return Ok(false);
        }
        self.remote.mkdir_parent()?;
        self.remote
            .check(&format!("touch {}", self.remote.quoted()))?;
        Ok(true)
    }

    fn delete(&mut self) -> Result<bool, Error> {
        self.stream.rewind();
        if !self.exists()? {
            return Ok(false);
        }
        self.remote.check(&format!("rm -f {}", self.remote.quoted()))?;
        Ok(true)
    }

    fn get(&mut self, local: &Path, overwrite: bool) -> Result<PathBuf, Error> {
        if !self.exists()? {
            return Err(Error::not_found(&self.remote.url));
        }
        check_local_target(local, overwrite)?;
        if let Some(parent) = local.parent() {
            fs::create_dir_all(parent)?;
        }
        self.remote
            .shell
            .copy_from(&self.remote.location, &self.remote.path, local, false)?;
        Ok(local.to_path_buf())
    }

    fn put(&mut self, local: &Path, overwrite: bool) -> Result<(), Error> {
        if !local.is_file() {
            return Err(Error::not_found(local.display()));
        }
        if !overwrite && self.exists()? {
            return Err(Error::already_exists(self.name(), &self.remote.url));
        }
        self.remote.mkdir_parent()?;
        self.remote
            .shell
            .copy_to(local, &self.remote.location, &self.remote.path, false)?;
        self.stream.rewind();
        Ok(())
    }
}

impl FileCapability for SshFile {
    fn mode(&self) -> StreamMode {
        self.stream.mode()
    }

    fn read(&mut self, max: Option<usize>) -> Result<Vec<u8>, Error> {
        let Self { remote, stream } = self;
        stream.read(max, || {
            let line = format!("cat {}", remote.quoted());
            let output = remote.query(&line, 'f')?;
            Ok(ReadView::boxed(OnceSource::new(output.stdout)))
        })
    }

    fn write(&mut self, data: &[u8]) -> Result<(), Error> {
        self.stream.write(data, || Ok(Vec::new()))
    }

    fn append(&mut self, data: &[u8]) -> Result<(), Error> {
        let seed = match self.stream.mode() {
            StreamMode::Idle => self.content()?.unwrap_or_default(),
            _ => Vec::new(),
        };
        self.stream.append(data, || Ok(seed))
    }

    fn flush(&mut self) -> Result<(), Error> {
        let Self { remote, stream } = self;
        stream.flush(|buf| {
            log::debug!("flush {} ({} bytes)", remote.url, buf.len());
            let mut staged = NamedTempFile::new()?;
            staged.write_all(buf)?;
            staged.flush()?;
            remote.mkdir_parent()?;
            remote
                .shell
                .copy_to(staged.path(), &remote.location, &remote.path, false)
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

/// A directory on a remote host.
pub struct SshDirectory {
    remote: Remote,
}

impl SshDirectory {
    pub fn location(&self) -> &str {
        &self.remote.location
    }

    fn require(&self) -> Result<(), Error> {
        if self.exists()? {
            Ok(())
        } else {
            Err(Error::not_found(&self.remote.url))
        }
    }

    /// Relative paths of every file below this directory.
    fn remote_files(&self) -> Result<BTreeSet<String>, Error> {
        let line = format!("find {} -type f", self.remote.quoted());
        let output = match self.remote.query(&line, 'd') {
            Ok(output) => output,
            Err(e) if e.is_not_found() => return Ok(BTreeSet::new()),
            Err(e) => return Err(e),
        };
        let prefix = format!("{}/", self.remote.path.trim_end_matches('/'));
        Ok(output
            .stdout_str()
            .lines()
            .filter_map(|line| line.strip_prefix(&prefix))
            .map(str::to_string)
            .collect())
    }
}

impl ResourceCapability for SshDirectory {
    fn url(&self) -> &ResourceUrl {
        &self.remote.url
    }

    fn exists(&self) -> Result<bool, Error> {
        self.remote.test('d')
    }

    /// Apparent size as reported by `du`, directory entries included.
    fn size(&self) -> Result<u64, Error> {
        self.remote
            .number(&format!("du -bs {}", self.remote.quoted()), 'd')
    }

    fn ctime(&self) -> Result<DateTime<Utc>, Error> {
        Ok(self.remote.times('d')?.ctime)
    }

    fn mtime(&self) -> Result<DateTime<Utc>, Error> {
        Ok(self.remote.times('d')?.mtime)
    }

    fn atime(&self) -> Result<DateTime<Utc>, Error> {
        Ok(self.remote.times('d')?.atime)
    }

    fn create(&mut self) -> Result<bool, Error> {
        if self.exists()? {
            return Ok(false);
        }
        self.remote
            .check(&format!("mkdir -p {}", self.remote.quoted()))?;
        Ok(true)
    }

    fn delete(&mut self) -> Result<bool, Error> {
        if !self.exists()? {
            return Ok(false);
        }
        self.remote
            .check(&format!("rm -rf {}", self.remote.quoted()))?;
        Ok(true)
    }

    fn get(&mut self, local: &Path, overwrite: bool) -> Result<PathBuf, Error> {
        self.require()?;
        let staging = TempDir::new()?;
        let landed = staging.path().join("tree");
        self.remote
            .shell
            .copy_from(&self.remote.location, &self.remote.path, &landed, true)?;

        let entries = scan_local_dir(&landed)?;
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
        if !overwrite {
            let existing = self.remote_files()?;
            if let Some(clash) = entries
                .iter()
                .find(|e| !e.is_dir && existing.contains(&e.relative))
            {
                return Err(Error::already_exists(&clash.relative, &self.remote.url));
            }
        }

        let base = self.remote.path.trim_end_matches('/').to_string();
        let dirs: Vec<String> = std::iter::once(self.remote.quoted())
            .chain(
                entries
                    .iter()
                    .filter(|e| e.is_dir)
                    .map(|e| quote(&format!("{}/{}", base, e.relative))),
            )
            .collect();
        self.remote.check(&format!("mkdir -p {}", dirs.join(" ")))?;

        for entry in entries.iter().filter(|e| !e.is_dir) {
            let target = format!("{}/{}", base, entry.relative);
            self.remote
                .shell
                .copy_to(&entry.path, &self.remote.location, &target, false)?;
        }
        Ok(())
    }
}

impl DirectoryCapability for SshDirectory {
    fn list(&self) -> Result<BTreeSet<String>, Error> {
        let line = format!("ls -1A {}", self.remote.quoted());
        Ok(self
            .remote
            .query(&line, 'd')?
            .stdout_str()
            .lines()
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect())
    }

    fn child(&self, name: &str) -> Result<Resource, Error> {
        open(&self.remote.shell, &self.join(name))
    }
}
