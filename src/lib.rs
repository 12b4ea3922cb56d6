//! This library is a simple wrapper around the [`ssh2`] crate
//! to copy a single file to or from a "mass" of hosts in parallel over SFTP.
//!
//! The `masscp` *library* is mainly intended to support the `masscp` *binary*:
//! a parallel, one-file `scp` for fleets of machines.
//!
//! The entry point is [`Transfer`], which runs a [`TransferRequest`] in three steps:
//!
//! 1. Check the local side: a fetch needs a local directory (created if missing),
//!    a send needs a regular local file. Recursive transfers are rejected.
//! 2. Connect to every host, one after the other. Any failure aborts the run.
//! 3. Copy the file on one thread per host and wait for all of them. A failing host
//!    only removes itself from the [`ResultStore`].
//!
//! Fetched files are named `<stem>-<peer-ip-with-dashes>.<ext>` so the same file
//! fetched from several hosts never collides.
//!
//! Host keys are not verified: see [`MasscpConfig::insecure_host_key_accept`].
//!
//! [`ssh2`]: https://docs.rs/ssh2

mod config;
mod copier;
mod error;
mod pool;
mod result_store;
mod ssh_client;
mod transfer;

pub use config::{Auth, AuthProvider, MasscpConfig, DEFAULT_MAX_TRANSFER_SIZE, DEFAULT_TIMEOUT_MS};
pub use copier::{CopyStats, StreamCopier, BUFFER_SIZE};
pub use error::{Result, TransferError};
pub use pool::{normalize_host, ConnectionPool, Connector, RemoteSession, RemoteStat};
pub use result_store::{Host, ResultStore, TransferOutcome};
pub use ssh_client::{SshConnector, SshSession};
pub use transfer::{fetch_file_name, Direction, Transfer, TransferReport, TransferRequest};
