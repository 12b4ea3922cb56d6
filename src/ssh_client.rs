use crate::config::Auth;
use crate::error::{Result, TransferError};
use crate::pool::{Connector, RemoteSession, RemoteStat};
use ssh2::{HashType, OpenFlags, OpenType, Session, Sftp};
use std::convert::TryFrom;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::path::Path;
use std::time::Duration;

/// Permissions of the files created on remote hosts.
const REMOTE_FILE_MODE: i32 = 0o644;

/// Dials hosts over TCP and negotiates authenticated SSH/SFTP sessions with them.
///
/// ## Example
///
/// ```no_run
/// use masscp::{Auth, Connector, SshConnector};
///
/// let connector = SshConnector::new("deploy", vec![Auth::Agent]).insecure_host_key_accept(true);
/// let session = connector.connect("10.0.0.1:22").unwrap();
/// ```
pub struct SshConnector {
    user: String,
    auth: Vec<Auth>,
    timeout: u64,
    insecure_host_key_accept: bool,
}

impl SshConnector {
    /// Constructs a new `SshConnector` trying the specified authentication methods in order.
    ///
    /// By default, the connector uses a 30 seconds timeout and refuses to connect until
    /// host key acceptance is enabled with [`SshConnector::insecure_host_key_accept`].
    pub fn new(user: impl Into<String>, auth: Vec<Auth>) -> Self {
        Self {
            user: user.into(),
            auth,
            timeout: crate::config::DEFAULT_TIMEOUT_MS,
            insecure_host_key_accept: false,
        }
    }

    /// Sets the timeout, in milliseconds, for dialing and authenticating.
    ///
    /// A timeout of zero signifies no timeout. Established sessions never time out.
    pub fn timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout = timeout_ms;
        self
    }

    /// Accepts any host key without verification.
    ///
    /// Host keys are never checked against a known hosts file: connecting requires this
    /// to be enabled.
    pub fn insecure_host_key_accept(mut self, accept: bool) -> Self {
        self.insecure_host_key_accept = accept;
        self
    }

    fn authenticate(&self, session: &Session) -> std::result::Result<(), String> {
        let mut failures = Vec::new();
        for auth in &self.auth {
            let result = match auth {
                Auth::Agent => session.userauth_agent(&self.user),
                Auth::Password(password) => session.userauth_password(&self.user, password),
                Auth::PasswordEnv(var) => match std::env::var(var) {
                    Ok(password) => session.userauth_password(&self.user, &password),
                    Err(_) => {
                        failures.push(format!("password: {} is not set", var));
                        continue;
                    }
                },
                Auth::Pubkey(path) => session.userauth_pubkey_file(&self.user, None, path, None),
            };
            match result {
                Ok(()) if session.authenticated() => return Ok(()),
                Ok(()) => failures.push(format!("{}: not authenticated", auth_kind(auth))),
                Err(error) => failures.push(format!("{}: {}", auth_kind(auth), error)),
            }
        }
        if failures.is_empty() {
            failures.push("no authentication method".to_owned());
        }
        Err(format!("Authentication failed ({})", failures.join("; ")))
    }
}

fn auth_kind(auth: &Auth) -> &'static str {
    match auth {
        Auth::Agent => "agent",
        Auth::Password(_) | Auth::PasswordEnv(_) => "password",
        Auth::Pubkey(_) => "pubkey",
    }
}

impl Connector for SshConnector {
    type Session = SshSession;

    fn connect(&self, addr: &str) -> Result<SshSession> {
        if !self.insecure_host_key_accept {
            return Err(TransferError::HostKeyPolicy);
        }
        let fail = |message: &dyn ToString| TransferError::connect(addr, message.to_string());

        let socket = addr
            .to_socket_addrs()
            .map_err(|error| fail(&error))?
            .next()
            .ok_or_else(|| fail(&"Socket address conversion failed"))?;

        // Initialize new SSH session.
        let mut session = Session::new().map_err(|error| fail(&error))?;

        // Open a TCP connection to the host and attach it to the SSH session.
        let tcp_stream = if self.timeout == 0 {
            TcpStream::connect(socket)
        } else {
            session.set_timeout(u32::try_from(self.timeout).unwrap_or(u32::MAX));
            TcpStream::connect_timeout(&socket, Duration::from_millis(self.timeout))
        }
        .map_err(|error| fail(&error))?;
        let peer = tcp_stream.peer_addr().map_err(|error| fail(&error))?;
        session.set_tcp_stream(tcp_stream);

        // Perform SSH handshake. The host key is accepted as is.
        session.handshake().map_err(|error| fail(&error))?;
        if let Some(hash) = session.host_key_hash(HashType::Sha256) {
            let fingerprint: String = hash.iter().map(|b| format!("{:02x}", b)).collect();
            tracing::warn!(addr = %addr, %fingerprint, "accepting unverified host key");
        }

        self.authenticate(&session).map_err(|error| fail(&error))?;

        let sftp = session.sftp().map_err(|error| fail(&error))?;

        // Only dialing and authentication are bounded, transfers run without timeout.
        session.set_timeout(0);

        Ok(SshSession {
            peer,
            session,
            sftp: Some(sftp),
        })
    }
}

/// Authenticated SSH session and its SFTP channel with a single host.
pub struct SshSession {
    peer: SocketAddr,
    session: Session,
    sftp: Option<Sftp>,
}

impl SshSession {
    fn sftp(&self) -> Result<&Sftp> {
        self.sftp
            .as_ref()
            .ok_or_else(|| TransferError::Config("SFTP session already closed".into()))
    }
}

impl RemoteSession for SshSession {
    type Reader = ssh2::File;
    type Writer = ssh2::File;

    fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    fn stat(&mut self, path: &Path) -> Result<RemoteStat> {
        let stat = self.sftp()?.stat(path)?;
        Ok(RemoteStat {
            is_dir: stat.is_dir(),
            size: stat.size,
        })
    }

    fn open(&mut self, path: &Path) -> Result<ssh2::File> {
        Ok(self.sftp()?.open(path)?)
    }

    fn create(&mut self, path: &Path) -> Result<ssh2::File> {
        let flags = OpenFlags::WRITE | OpenFlags::CREATE | OpenFlags::TRUNCATE;
        Ok(self
            .sftp()?
            .open_mode(path, flags, REMOTE_FILE_MODE, OpenType::File)?)
    }

    fn close(&mut self) -> Result<()> {
        // Dropping the SFTP handle closes its channel.
        if self.sftp.take().is_some() {
            self.session.disconnect(None, "masscp done", None)?;
        }
        Ok(())
    }
}
