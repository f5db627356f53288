//! urlfs core: the resource abstraction layer
//!
//! Every storage backend (local disk, the in-process `mem` tree, a host
//! reached over ssh, an object store) is addressed by URL and exposed
//! through the same two capability traits:
//! - `ResourceUrl`: parsed `scheme://location/path`
//! - `Registry`: scheme → `ResourceFactory` dispatch
//! - `FileCapability` / `DirectoryCapability`: the operation sets every backend implements
//! - `FileStream`: the Idle/Writing/Appending discipline behind read/write/append/flush/reset
//! - `ChunkedReader`: exact-size reads over a "next chunk" primitive
//!
//! Backends live in their own crates and only depend on this one.
//!
//! # Example
//!
//! ```rust
//! use urlfs_core::{Error, Registry, Resource, ResourceUrl};
//!
//! fn open(registry: &Registry, url: &str) -> Result<Resource, Error> {
//!     registry.resolve(url)
//! }
//!
//! let registry = Registry::new();
//! assert!(matches!(open(&registry, "nope://x/y"), Err(Error::UnknownScheme { .. })));
//! assert_eq!(ResourceUrl::parse("mem://loc/a/b").unwrap().name(), "b");
//! ```

pub use bytes::Bytes;

mod chunked;
mod error;
mod lines;
mod registry;
mod resource;
mod stream;
pub mod transfer;
mod url;

pub use chunked::{
    ChunkSource, ChunkTransform, ChunkedReader, GzipTransform, Identity, IterSource, OnceSource, ReadSource,
    ReadView, MIN_CHUNK_SIZE,
};
pub use error::Error;
pub use lines::Lines;
pub use registry::{Registry, ResourceFactory};
pub use resource::{
    DirectoryCapability, FileCapability, Resource, ResourceCapability, COPY_CHUNK_SIZE,
};
pub use stream::{FileStream, StageBuffer, StreamMode, StreamOp};
pub use url::ResourceUrl;

/// Default scheme for URLs given as bare local paths.
pub const LOCAL_SCHEME: &str = "file";
