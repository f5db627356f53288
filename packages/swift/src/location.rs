//! Registered swift locations and their write staging.

use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tempfile::{NamedTempFile, TempDir};
use urlfs_core::{Error, StageBuffer};

use crate::storage::ObjectStorage;

/// One named connection to an object store.
///
/// Owns the staging directory that pending writes of every file under this
/// location go to. The directory is created on first use and removed only
/// by [`close`](SwiftLocation::close), after which every resource of the
/// location fails with [`Error::NotActive`].
pub struct SwiftLocation {
    name: String,
    state: Mutex<State>,
}

struct State {
    storage: Option<Arc<dyn ObjectStorage>>,
    staging: Option<TempDir>,
}

impl SwiftLocation {
    pub fn new(name: impl Into<String>, storage: Arc<dyn ObjectStorage>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(State {
                storage: Some(storage),
                staging: None,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_active(&self) -> bool {
        self.lock().storage.is_some()
    }

    /// The storage handle, or [`Error::NotActive`] once closed.
    pub fn storage(&self) -> Result<Arc<dyn ObjectStorage>, Error> {
        self.lock().storage.clone().ok_or_else(|| self.not_active())
    }

    /// Open a new, empty staged object in the staging directory.
    pub fn stage(&self) -> Result<StagedObject, Error> {
        let mut state = self.lock();
        if state.storage.is_none() {
            return Err(self.not_active());
        }
        let dir = match state.staging.take() {
            Some(dir) => dir,
            None => {
                let dir = tempfile::Builder::new()
                    .prefix(&format!("urlfs-swift-{}-", self.name))
                    .tempdir()?;
                log::debug!("staging {} in {}", self.name, dir.path().display());
                dir
            }
        };
        let staging = state.staging.insert(dir);
        Ok(StagedObject {
            file: NamedTempFile::new_in(staging.path())?,
        })
    }

    pub fn staging_dir(&self) -> Option<PathBuf> {
        self.lock().staging.as_ref().map(|dir| dir.path().to_path_buf())
    }

    /// Close the location: remove the staging directory and refuse any
    /// further use. Closing twice is a no-op.
    pub fn close(&self) {
        let mut state = self.lock();
        if state.storage.take().is_none() {
            return;
        }
        log::debug!("closing swift location {}", self.name);
        if let Some(dir) = state.staging.take() {
            let path = dir.path().to_path_buf();
            if let Err(e) = dir.close() {
                log::warn!("could not remove staging dir {}: {}", path.display(), e);
            }
        }
    }

    fn not_active(&self) -> Error {
        Error::NotActive {
            location: self.name.clone(),
        }
    }
}

impl fmt::Debug for SwiftLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SwiftLocation")
            .field("name", &self.name)
            .field("active", &self.is_active())
            .finish()
    }
}

/// A pending upload, staged in a temp file; removed when dropped.
#[derive(Debug)]
pub struct StagedObject {
    file: NamedTempFile,
}

impl StagedObject {
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Flush buffered bytes so the staged file can be uploaded.
    pub fn sync(&mut self) -> Result<(), Error> {
        self.file.flush()?;
        Ok(())
    }
}

impl StageBuffer for StagedObject {
    fn extend_from(&mut self, data: &[u8]) -> Result<(), Error> {
        self.file.write_all(data)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryObjectStorage;
    use std::fs;

    fn location() -> SwiftLocation {
        SwiftLocation::new("archive", Arc::new(MemoryObjectStorage::new()))
    }

    #[test]
    fn staging_dir_is_lazy_and_shared() {
        let loc = location();
        assert!(loc.staging_dir().is_none());

        let mut a = loc.stage().unwrap();
        let b = loc.stage().unwrap();
        let dir = loc.staging_dir().unwrap();
        assert_eq!(a.path().parent().unwrap(), dir);
        assert_eq!(b.path().parent().unwrap(), dir);

        a.extend_from(b"abc").unwrap();
        a.sync().unwrap();
        assert_eq!(fs::read(a.path()).unwrap(), b"abc");

        let staged = a.path().to_path_buf();
        drop(a);
        assert!(!staged.exists());
        assert!(dir.is_dir());
    }

    #[test]
    fn close_removes_staging_and_deactivates() {
        let loc = location();
        let _staged = loc.stage().unwrap();
        let dir = loc.staging_dir().unwrap();

        loc.close();
        assert!(!dir.exists());
        assert!(!loc.is_active());
        assert!(matches!(loc.storage(), Err(Error::NotActive { .. })));
        assert!(matches!(loc.stage(), Err(Error::NotActive { .. })));
        loc.close();
    }
}
