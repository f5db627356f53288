//! Resource URLs: `scheme://[user@]location/path`.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use lazy_static::lazy_static;
use regex::Regex;

use crate::{Error, LOCAL_SCHEME};

lazy_static! {
    static ref URL_PATTERN: Regex =
        Regex::new(r"^([A-Za-z][A-Za-z0-9+.\-]*)://([^/]*)(.*)$").unwrap();
}

/// A parsed resource URL.
///
/// The path keeps a leading `/` whenever it is non-empty, and a trailing `/`
/// is preserved: backends read it as "this names a directory".
///
/// # Examples
///
/// ```rust
/// use urlfs_core::ResourceUrl;
///
/// let url = ResourceUrl::parse("ssh://deploy@build01/var/log/").unwrap();
/// assert_eq!(url.scheme(), "ssh");
/// assert_eq!(url.location(), "deploy@build01");
/// assert_eq!(url.user(), Some("deploy"));
/// assert_eq!(url.host(), "build01");
/// assert_eq!(url.path(), "/var/log/");
/// assert!(url.is_dir_path());
/// ```
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct ResourceUrl {
    scheme: String,
    location: String,
    path: String,
}

impl ResourceUrl {
    pub fn new(
        scheme: impl Into<String>,
        location: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        let mut path = path.into();
        if !path.is_empty() && !path.starts_with('/') {
            path.insert(0, '/');
        }
        Self {
            scheme: scheme.into().to_ascii_lowercase(),
            location: location.into(),
            path,
        }
    }

    /// Parse a URL string.
    ///
    /// Input without a `scheme://` prefix is a local path, made absolute
    /// against the current working directory and given the `file` scheme.
    pub fn parse(raw: &str) -> Result<Self, Error> {
        if raw.is_empty() {
            return Err(Error::InvalidUrl {
                url: raw.to_string(),
                message: "empty url".to_string(),
            });
        }

        if let Some(caps) = URL_PATTERN.captures(raw) {
            return Ok(Self::new(&caps[1], &caps[2], &caps[3]));
        }

        if raw.contains("://") {
            return Err(Error::InvalidUrl {
                url: raw.to_string(),
                message: "malformed scheme".to_string(),
            });
        }

        Self::from_local_path(Path::new(raw))
    }

    /// Build a `file` URL for a local path, resolving relative paths against
    /// the current working directory.
    pub fn from_local_path(path: &Path) -> Result<Self, Error> {
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()?.join(path)
        };
        Ok(Self::new(
            LOCAL_SCHEME,
            "",
            absolute.to_string_lossy().into_owned(),
        ))
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// The user part of `user@host` locations.
    pub fn user(&self) -> Option<&str> {
        self.location.split_once('@').map(|(user, _)| user)
    }

    /// The location without any `user@` prefix.
    pub fn host(&self) -> &str {
        match self.location.split_once('@') {
            Some((_, host)) => host,
            None => &self.location,
        }
    }

    /// Last non-empty path segment, or `""` for the location root.
    pub fn name(&self) -> &str {
        self.path.rsplit('/').find(|s| !s.is_empty()).unwrap_or("")
    }

    /// Non-empty path segments, in order.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.path.split('/').filter(|s| !s.is_empty())
    }

    /// Whether the path ends with a separator.
    pub fn is_dir_path(&self) -> bool {
        self.path.ends_with('/')
    }

    /// URL of the child `name` under this one.
    ///
    /// A trailing `/` on `name` carries over, so `join("sub/")` names a directory.
    pub fn join(&self, name: &str) -> Self {
        let base = self.path.trim_end_matches('/');
        let name = name.trim_start_matches('/');
        Self {
            scheme: self.scheme.clone(),
            location: self.location.clone(),
            path: format!("{}/{}", base, name),
        }
    }

    /// The same URL with a trailing separator.
    pub fn as_dir(&self) -> Self {
        let mut url = self.clone();
        if !url.path.ends_with('/') {
            url.path.push('/');
        }
        url
    }

    /// The path as a local filesystem path (meaningful for `file` URLs).
    pub fn to_local_path(&self) -> PathBuf {
        PathBuf::from(&self.path)
    }
}

impl fmt::Display for ResourceUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}{}", self.scheme, self.location, self.path)
    }
}

impl FromStr for ResourceUrl {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_mem_url() {
        let url = ResourceUrl::parse("mem://testloc/root/file1").unwrap();
        assert_eq!(url.scheme(), "mem");
        assert_eq!(url.location(), "testloc");
        assert_eq!(url.path(), "/root/file1");
        assert_eq!(url.name(), "file1");
        assert!(!url.is_dir_path());
    }

    #[test]
    fn parse_swift_container_url() {
        let url = ResourceUrl::parse("swift://profile/container").unwrap();
        assert_eq!(url.location(), "profile");
        assert_eq!(url.segments().collect::<Vec<_>>(), vec!["container"]);
    }

    #[test]
    fn parse_file_url_with_empty_location() {
        let url = ResourceUrl::parse("file:///tmp/data.txt").unwrap();
        assert_eq!(url.scheme(), "file");
        assert_eq!(url.location(), "");
        assert_eq!(url.path(), "/tmp/data.txt");
        assert_eq!(url.to_local_path(), PathBuf::from("/tmp/data.txt"));
    }

    #[test]
    fn scheme_is_case_insensitive() {
        let url = ResourceUrl::parse("MEM://loc/a").unwrap();
        assert_eq!(url.scheme(), "mem");
    }

    #[test]
    fn location_without_path() {
        let url = ResourceUrl::parse("mem://loc").unwrap();
        assert_eq!(url.path(), "");
        assert_eq!(url.name(), "");
        assert_eq!(url.to_string(), "mem://loc");
    }

    #[test]
    fn host_without_user() {
        let url = ResourceUrl::parse("ssh://build01/tmp").unwrap();
        assert_eq!(url.user(), None);
        assert_eq!(url.host(), "build01");
    }

    #[test]
    fn bare_relative_path_is_local_and_absolute() {
        let url = ResourceUrl::parse("some/relative/file.txt").unwrap();
        assert_eq!(url.scheme(), LOCAL_SCHEME);
        let expected = std::env::current_dir()
            .unwrap()
            .join("some/relative/file.txt");
        assert_eq!(url.to_local_path(), expected);
    }

    #[test]
    fn bare_absolute_path_is_kept() {
        let url = ResourceUrl::parse("/var/tmp/x").unwrap();
        assert_eq!(url.scheme(), "file");
        assert_eq!(url.path(), "/var/tmp/x");
    }

    #[test]
    fn reject_empty() {
        assert!(matches!(
            ResourceUrl::parse(""),
            Err(Error::InvalidUrl { .. })
        ));
    }

    #[test]
    fn reject_malformed_scheme() {
        assert!(matches!(
            ResourceUrl::parse("1bad://loc/x"),
            Err(Error::InvalidUrl { .. })
        ));
    }

    #[test]
    fn display_round_trips() {
        for raw in [
            "mem://loc/root/file1",
            "mem://loc/root/",
            "ssh://user@host/tmp/a",
            "file:///etc/hosts",
        ] {
            let url = ResourceUrl::parse(raw).unwrap();
            assert_eq!(url.to_string(), raw);
            assert_eq!(raw.parse::<ResourceUrl>().unwrap(), url);
        }
    }

    #[test]
    fn join_handles_separators() {
        let dir = ResourceUrl::parse("mem://loc/root/").unwrap();
        assert_eq!(dir.join("a").to_string(), "mem://loc/root/a");
        let dir = ResourceUrl::parse("mem://loc/root").unwrap();
        assert_eq!(dir.join("/a").to_string(), "mem://loc/root/a");
        assert!(dir.join("sub/").is_dir_path());
    }

    #[test]
    fn join_from_location_root() {
        let root = ResourceUrl::parse("mem://loc").unwrap();
        assert_eq!(root.join("a").path(), "/a");
    }

    #[test]
    fn as_dir_adds_one_separator() {
        let url = ResourceUrl::parse("mem://loc/root").unwrap();
        assert_eq!(url.as_dir().path(), "/root/");
        assert_eq!(url.as_dir().as_dir().path(), "/root/");
    }

    #[test]
    fn name_ignores_trailing_separator() {
        let url = ResourceUrl::parse("swift://p/container/dir1/").unwrap();
        assert_eq!(url.name(), "dir1");
    }
}
