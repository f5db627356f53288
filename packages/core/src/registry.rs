//! Scheme registry: maps URL schemes to resource factories.

use std::collections::BTreeMap;
use std::fmt;

use crate::{Error, Resource, ResourceUrl};

/// Builds a resource for a URL of one scheme.
///
/// Any `Fn(&ResourceUrl) -> Result<Resource, Error>` closure is a factory.
pub trait ResourceFactory: Send + Sync {
    fn open(&self, url: &ResourceUrl) -> Result<Resource, Error>;
}

impl<F> ResourceFactory for F
where
    F: Fn(&ResourceUrl) -> Result<Resource, Error> + Send + Sync,
{
    fn open(&self, url: &ResourceUrl) -> Result<Resource, Error> {
        self(url)
    }
}

/// Scheme → factory dispatch.
///
/// Built once at startup and shared by reference afterwards; registration
/// needs `&mut self`.
#[derive(Default)]
pub struct Registry {
    factories: BTreeMap<String, Box<dyn ResourceFactory>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `factory` for `scheme` (case-insensitive).
    ///
    /// Registering the same scheme twice is an error.
    pub fn register(
        &mut self,
        scheme: &str,
        factory: impl ResourceFactory + 'static,
    ) -> Result<(), Error> {
        let scheme = scheme.to_ascii_lowercase();
        if self.factories.contains_key(&scheme) {
            return Err(Error::DuplicateScheme { scheme });
        }
        log::debug!("registered scheme {}", scheme);
        self.factories.insert(scheme, Box::new(factory));
        Ok(())
    }

    pub fn is_registered(&self, scheme: &str) -> bool {
        self.factories.contains_key(&scheme.to_ascii_lowercase())
    }

    pub fn schemes(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Parse `url` and open the resource it names.
    pub fn resolve(&self, url: &str) -> Result<Resource, Error> {
        self.resolve_url(&ResourceUrl::parse(url)?)
    }

    pub fn resolve_url(&self, url: &ResourceUrl) -> Result<Resource, Error> {
        let factory = self
            .factories
            .get(url.scheme())
            .ok_or_else(|| Error::UnknownScheme {
                scheme: url.scheme().to_string(),
            })?;
        log::debug!("resolving {}", url);
        factory.open(url)
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("schemes", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}
