//! In-memory backend for `mem://` URLs.
//!
//! Data lives in a [`PathTree`] shared by every clone of a [`MemoryBackend`]:
//! - `mem://<location>/<path>` addresses a node below the location's root
//! - interior nodes are directories, leaves are files
//! - nothing is persisted beyond the process
//!
//! Handles hold no cached content, so changes flushed through one handle are
//! visible to every other handle on the same URL.

mod backend;
pub mod tree;

pub use backend::{MemDirectory, MemFile, MemoryBackend, MEM_SCHEME};
pub use tree::{Node, PathTree, Resolve};
