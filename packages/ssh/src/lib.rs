//! Remote host backend for `ssh://[user@]host/path` URLs.
//!
//! The `ssh` and `scp` command line tools do the work, one process per
//! operation. Configure keys and connection multiplexing in `ssh_config`;
//! the tools are run non-interactively and fail rather than prompt.
//!
//! # Example
//!
//! ```rust,no_run
//! use urlfs_core::Registry;
//! use urlfs_ssh::SshBackend;
//!
//! let mut registry = Registry::new();
//! registry.register("ssh", SshBackend::default()).unwrap();
//!
//! let logs = registry.resolve("ssh://deploy@build01/var/log/").unwrap();
//! for name in logs.into_directory().unwrap().list().unwrap() {
//!     println!("{}", name);
//! }
//! ```

mod backend;
pub mod shell;

pub use backend::{SshBackend, SshDirectory, SshFile, DEFAULT_LOCATION, SSH_SCHEME};
pub use shell::{quote, CommandOutput, OpenSsh, RemoteShell};
