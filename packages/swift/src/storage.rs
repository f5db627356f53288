//! The object-storage collaborator.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use urlfs_core::{ChunkSource, Error};

/// Metadata of a container or object, as `Key: Value` fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectStat {
    fields: BTreeMap<String, String>,
}

impl ObjectStat {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `swift stat` style output, one `Key: Value` per line.
    pub fn parse(text: &str) -> Self {
        let fields = text
            .lines()
            .filter_map(|line| line.split_once(':'))
            .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
            .collect();
        Self { fields }
    }

    pub fn with(mut self, key: &str, value: impl ToString) -> Self {
        self.fields.insert(key.to_string(), value.to_string());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    /// Object size.
    pub fn content_length(&self) -> Option<u64> {
        self.get("Content Length")?.parse().ok()
    }

    /// Total size of a container's objects.
    pub fn bytes(&self) -> Option<u64> {
        self.get("Bytes")?.parse().ok()
    }

    pub fn last_modified(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc2822(self.get("Last Modified")?)
            .ok()
            .map(|time| time.with_timezone(&Utc))
    }
}

/// Object-storage primitives used by the swift backend.
///
/// Containers hold flat object names; `/` inside names is only a convention
/// for pseudo-directories. Missing containers and objects are reported as
/// [`Error::NotFound`].
pub trait ObjectStorage: Send + Sync {
    /// Object names in `container`, or container names if `container` is empty.
    fn list_objects(&self, container: &str) -> Result<Vec<String>, Error>;

    /// Stat an object, or the container itself when `object` is `None`.
    fn stat_object(&self, container: &str, object: Option<&str>) -> Result<ObjectStat, Error>;

    fn get_object_body(&self, container: &str, object: &str)
        -> Result<Box<dyn ChunkSource>, Error>;

    /// Upload the file at `local` as `object`, creating the container if needed.
    fn put_object(&self, container: &str, object: &str, local: &Path) -> Result<(), Error>;

    /// Delete an object, or the container and everything in it when `object`
    /// is `None`. Returns false if there was nothing to delete.
    fn delete_object(&self, container: &str, object: Option<&str>) -> Result<bool, Error>;

    /// Create `container`; succeeds if it already exists.
    fn create_container(&self, container: &str) -> Result<(), Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_stat_output() {
        let stat = ObjectStat::parse(
            "       Account: AUTH_test\n\
             Container: logs\n\
             Object: 2024/app.log\n\
             Content Type: text/plain\n\
             Content Length: 1234\n\
             Last Modified: Tue, 05 Mar 2024 10:15:00 GMT\n",
        );
        assert_eq!(stat.get("Container"), Some("logs"));
        assert_eq!(stat.content_length(), Some(1234));
        assert_eq!(stat.bytes(), None);
        assert_eq!(
            stat.last_modified().unwrap().to_rfc3339(),
            "2024-03-05T10:15:00+00:00"
        );
    }

    #[test]
    fn values_keep_inner_colons() {
        let stat = ObjectStat::parse("X-Trans-Id: tx:abc:def\n");
        assert_eq!(stat.get("X-Trans-Id"), Some("tx:abc:def"));
    }

    #[test]
    fn builder_and_bad_numbers() {
        let stat = ObjectStat::new().with("Bytes", 42).with("Content Length", "n/a");
        assert_eq!(stat.bytes(), Some(42));
        assert_eq!(stat.content_length(), None);
        assert_eq!(stat.last_modified(), None);
    }
}
