use crate::error::Result;
use std::io::{Read, Write};
use std::net::SocketAddr;
use std::path::Path;

/// Metadata of a remote path.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RemoteStat {
    /// Whether the path is a directory.
    pub is_dir: bool,
    /// Size in bytes, if the server reported it.
    pub size: Option<u64>,
}

/// An authenticated file-protocol session with a single host.
pub trait RemoteSession: Send {
    /// Readable remote file.
    type Reader: Read;
    /// Writable remote file.
    type Writer: Write;

    /// Returns the address of the peer, as seen on the wire.
    fn peer_addr(&self) -> SocketAddr;

    /// Returns the metadata of a remote path.
    fn stat(&mut self, path: &Path) -> Result<RemoteStat>;

    /// Opens a remote file for reading.
    fn open(&mut self, path: &Path) -> Result<Self::Reader>;

    /// Opens a remote file for writing, creating or truncating it.
    fn create(&mut self, path: &Path) -> Result<Self::Writer>;

    /// Closes the file-protocol session and the underlying channel.
    fn close(&mut self) -> Result<()>;
}

/// Dials a host and negotiates a [`RemoteSession`] with it.
pub trait Connector {
    type Session: RemoteSession;

    /// Connects to a normalized `host:port` address.
    fn connect(&self, addr: &str) -> Result<Self::Session>;
}

/// Appends `default_port` to a host specified without a port.
pub fn normalize_host(host: &str, default_port: u16) -> String {
    if host.contains(':') {
        host.to_owned()
    } else {
        format!("{}:{}", host, default_port)
    }
}

/// Set of live sessions, one per target host.
///
/// Every session is closed exactly once: either by [`ConnectionPool::close`] or when the
/// pool is dropped.
pub struct ConnectionPool<S: RemoteSession> {
    sessions: Vec<(String, S)>,
}

impl<S: RemoteSession> ConnectionPool<S> {
    /// Connects to every host in turn.
    ///
    /// Hosts equal after normalization share a single session.
    ///
    /// The first failure aborts the whole operation: the sessions opened so far are
    /// closed and the error is returned.
    pub fn connect<C>(connector: &C, hosts: &[String], default_port: u16) -> Result<Self>
    where
        C: Connector<Session = S>,
    {
        let mut pool = ConnectionPool {
            sessions: Vec::with_capacity(hosts.len()),
        };
        for host in hosts {
            let addr = normalize_host(host, default_port);
            if pool.sessions.iter().any(|(pooled, _)| *pooled == addr) {
                tracing::debug!(host = %host, addr = %addr, "duplicate host skipped");
                continue;
            }
            tracing::debug!(host = %host, addr = %addr, "dialing");
            // On error, `pool` is dropped here and releases the open sessions.
            let session = connector.connect(&addr)?;
            tracing::info!(addr = %addr, peer = %session.peer_addr(), "connected");
            pool.sessions.push((addr, session));
        }
        Ok(pool)
    }

    /// Returns the number of sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Returns whether the pool holds no session.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Returns the normalized addresses of the pooled hosts.
    pub fn hosts(&self) -> impl Iterator<Item = &str> {
        self.sessions.iter().map(|(addr, _)| addr.as_str())
    }

    /// Returns exclusive access to every session, for fanning out one task per host.
    pub(crate) fn sessions_mut(&mut self) -> impl Iterator<Item = &mut S> {
        self.sessions.iter_mut().map(|(_, session)| session)
    }

    /// Closes every session.
    pub fn close(mut self) {
        self.release();
    }

    fn release(&mut self) {
        for (addr, mut session) in self.sessions.drain(..) {
            if let Err(error) = session.close() {
                tracing::warn!(addr = %addr, %error, "failed to close session");
            }
        }
    }
}

impl<S: RemoteSession> Drop for ConnectionPool<S> {
    fn drop(&mut self) {
        self.release();
    }
}
