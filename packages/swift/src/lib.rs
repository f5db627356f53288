//! Object-storage backend for `swift://<location>/<container>/<key>` URLs.
//!
//! A location is a named connection registered on the [`SwiftBackend`];
//! the transport behind it is any [`ObjectStorage`], normally the
//! [`SwiftCli`] adapter around the `swift` command line client.
//!
//! # Example
//!
//! ```rust,no_run
//! use urlfs_core::Registry;
//! use urlfs_swift::{SwiftBackend, SwiftProfile};
//!
//! let backend = SwiftBackend::new();
//! backend
//!     .register_profile(
//!         "archive",
//!         SwiftProfile {
//!             user_name: "alice".to_string(),
//!             tenant_name: "research".to_string(),
//!             auth_url: "https://keystone.example.com/v2.0".to_string(),
//!             password: "secret".to_string(),
//!         },
//!     )
//!     .unwrap();
//!
//! let mut registry = Registry::new();
//! registry.register("swift", backend.clone()).unwrap();
//!
//! let mut report = registry.resolve("swift://archive/reports/q1.csv").unwrap().into_file().unwrap();
//! report.write(b"region,total\n").unwrap();
//! report.flush().unwrap();
//!
//! let reports = registry.resolve("swift://archive/reports").unwrap().into_directory().unwrap();
//! assert!(reports.contains("q1.csv").unwrap());
//!
//! // Removes the staging directory of every location.
//! backend.close_all();
//! ```

mod backend;
mod cli;
mod location;
mod storage;
#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use backend::{SwiftBackend, SwiftDirectory, SwiftFile, SWIFT_SCHEME};
pub use cli::{SwiftCli, SwiftProfile};
pub use location::{StagedObject, SwiftLocation};
pub use storage::{ObjectStat, ObjectStorage};
