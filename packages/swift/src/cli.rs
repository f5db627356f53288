//! [`ObjectStorage`] over the `swift` command line client.

use std::fmt;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::process::{Child, ChildStdout, Command, Output, Stdio};

use serde::{Deserialize, Serialize};
use urlfs_core::{Bytes, ChunkSource, Error};

use crate::storage::{ObjectStat, ObjectStorage};

/// Credentials for one swift account.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwiftProfile {
    pub user_name: String,
    pub tenant_name: String,
    pub auth_url: String,
    pub password: String,
}

impl fmt::Debug for SwiftProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SwiftProfile")
            .field("user_name", &self.user_name)
            .field("tenant_name", &self.tenant_name)
            .field("auth_url", &self.auth_url)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Runs `swift` with the profile's `OS_*` environment.
///
/// The client exits with status 1 when a container or object is missing.
#[derive(Debug, Clone)]
pub struct SwiftCli {
    program: String,
    profile: SwiftProfile,
}

const NOT_FOUND_STATUS: i32 = 1;

impl SwiftCli {
    pub fn new(profile: SwiftProfile) -> Self {
        Self::with_program("swift", profile)
    }

    pub fn with_program(program: impl Into<String>, profile: SwiftProfile) -> Self {
        Self {
            program: program.into(),
            profile,
        }
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(args.iter().filter(|arg| !arg.is_empty()))
            .env("OS_USERNAME", &self.profile.user_name)
            .env("OS_TENANT_NAME", &self.profile.tenant_name)
            .env("OS_AUTH_URL", &self.profile.auth_url)
            .env("OS_PASSWORD", &self.profile.password)
            .stdin(Stdio::null());
        command
    }

    fn output(&self, args: &[&str]) -> Result<Output, Error> {
        log::debug!("{} {}", self.program, args.join(" "));
        Ok(self.command(args).output()?)
    }

    /// Run and require success, mapping status 1 to NotFound on `what`.
    fn run(&self, args: &[&str], what: &str) -> Result<Output, Error> {
        let output = self.output(args)?;
        match output.status.code() {
            Some(0) => Ok(output),
            Some(NOT_FOUND_STATUS) => Err(Error::not_found(what)),
            status => Err(failure(&self.program, args, status, &output.stderr)),
        }
    }
}

fn failure(program: &str, args: &[&str], status: Option<i32>, stderr: &[u8]) -> Error {
    Error::BackendCommandFailure {
        command: format!("{} {}", program, args.first().copied().unwrap_or_default()),
        status,
        message: String::from_utf8_lossy(stderr).trim().to_string(),
    }
}

fn describe(container: &str, object: Option<&str>) -> String {
    match object {
        Some(object) => format!("{}/{}", container, object),
        None => container.to_string(),
    }
}

impl ObjectStorage for SwiftCli {
    fn list_objects(&self, container: &str) -> Result<Vec<String>, Error> {
        let output = self.run(&["list", container], container)?;
        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect())
    }

    fn stat_object(&self, container: &str, object: Option<&str>) -> Result<ObjectStat, Error> {
        let what = describe(container, object);
        let output = self.run(&["stat", container, object.unwrap_or("")], &what)?;
        Ok(ObjectStat::parse(&String::from_utf8_lossy(&output.stdout)))
    }

    fn get_object_body(
        &self,
        container: &str,
        object: &str,
    ) -> Result<Box<dyn ChunkSource>, Error> {
        // A missing object would otherwise only surface once the body is drained.
        self.stat_object(container, Some(object))?;

        let args = ["download", container, object, "-o", "-"];
        log::debug!("{} {}", self.program, args.join(" "));
        let stderr = tempfile::tempfile()?;
        let mut child = self
            .command(&args)
            .stdout(Stdio::piped())
            .stderr(stderr.try_clone()?)
            .spawn()?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Io(std::io::Error::other("download stdout not captured")))?;
        Ok(Box::new(DownloadSource {
            child,
            stdout,
            stderr,
            program: self.program.clone(),
            what: describe(container, Some(object)),
            done: false,
        }))
    }

    fn put_object(&self, container: &str, object: &str, local: &Path) -> Result<(), Error> {
        let local = local.to_string_lossy();
        self.run(
            &["upload", container, &local, "--object-name", object],
            container,
        )?;
        Ok(())
    }

    fn delete_object(&self, container: &str, object: Option<&str>) -> Result<bool, Error> {
        match self.run(&["delete", container, object.unwrap_or("")], container) {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn create_container(&self, container: &str) -> Result<(), Error> {
        self.run(&["post", container], container)?;
        Ok(())
    }
}

/// Streams the stdout of `swift download -o -`; the exit status is checked
/// once the output is exhausted. Stderr goes to a temp file so a chatty
/// client never blocks on a full pipe.
struct DownloadSource {
    child: Child,
    stdout: ChildStdout,
    stderr: File,
    program: String,
    what: String,
    done: bool,
}

impl DownloadSource {
    fn finish(&mut self) -> Result<(), Error> {
        self.done = true;
        let status = self.child.wait()?;
        let mut stderr = Vec::new();
        self.stderr.seek(SeekFrom::Start(0))?;
        self.stderr.read_to_end(&mut stderr)?;
        match status.code() {
            Some(0) => Ok(()),
            Some(NOT_FOUND_STATUS) => Err(Error::not_found(&self.what)),
            code => Err(failure(&self.program, &["download"], code, &stderr)),
        }
    }
}

impl ChunkSource for DownloadSource {
    fn next_chunk(&mut self, size_hint: usize) -> Result<Option<Bytes>, Error> {
        if self.done {
            return Ok(None);
        }
        let mut buf = vec![0u8; size_hint.max(1)];
        loop {
            match self.stdout.read(&mut buf) {
                Ok(0) => {
                    self.finish()?;
                    return Ok(None);
                }
                Ok(n) => {
                    buf.truncate(n);
                    return Ok(Some(Bytes::from(buf)));
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(Error::Io(e)),
            }
        }
    }
}

impl Drop for DownloadSource {
    fn drop(&mut self) {
        if !self.done {
            if let Err(e) = self.child.kill() {
                log::warn!("could not stop download of {}: {}", self.what, e);
            }
            let _ = self.child.wait();
        }
    }
}
