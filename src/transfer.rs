use crate::config::{AuthProvider, MasscpConfig, DEFAULT_MAX_TRANSFER_SIZE};
use crate::copier::StreamCopier;
use crate::error::{Result, TransferError};
use crate::pool::{ConnectionPool, Connector, RemoteSession};
use crate::result_store::{Host, ResultStore, TransferOutcome};
use crate::ssh_client::SshConnector;
use std::fs::OpenOptions;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::mpsc;

/// Direction of a transfer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Remote hosts to local directory.
    Fetch,
    /// Local file to remote hosts.
    Send,
}

/// Immutable description of a run.
#[derive(Clone, Debug)]
pub struct TransferRequest {
    pub direction: Direction,
    /// Destination directory on fetch, source file on send.
    pub local_path: PathBuf,
    /// Source file on fetch, destination file (or directory if it ends with `/`) on send.
    pub remote_path: String,
    /// Target hosts, as `host` or `host:port`.
    pub hosts: Vec<String>,
    /// Replace existing remote files on send.
    pub overwrite: bool,
    /// Recursive transfers are not supported, setting this fails the run.
    pub recursive: bool,
}

impl TransferRequest {
    /// Constructs a request to fetch `remote_path` from every host into `local_dir`.
    pub fn fetch(
        remote_path: impl Into<String>,
        local_dir: impl Into<PathBuf>,
        hosts: Vec<String>,
    ) -> Self {
        Self {
            direction: Direction::Fetch,
            local_path: local_dir.into(),
            remote_path: remote_path.into(),
            hosts,
            overwrite: false,
            recursive: false,
        }
    }

    /// Constructs a request to send `local_path` to `remote_path` on every host.
    pub fn send(
        local_path: impl Into<PathBuf>,
        remote_path: impl Into<String>,
        hosts: Vec<String>,
    ) -> Self {
        Self {
            direction: Direction::Send,
            local_path: local_path.into(),
            remote_path: remote_path.into(),
            hosts,
            overwrite: false,
            recursive: false,
        }
    }

    /// Sets whether existing remote files are replaced on send.
    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }
}

/// Results of a completed run.
#[derive(Debug, Default)]
pub struct TransferReport {
    /// Outcome of every host that completed its transfer.
    pub results: ResultStore,
    /// Error of every host that failed, in completion order.
    pub failures: Vec<(Host, TransferError)>,
}

impl TransferReport {
    /// Returns whether every host completed its transfer.
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Copies a single file to or from many hosts in parallel.
///
/// ## Public API Overview
///
/// Construct a new `Transfer`:
/// - [`Transfer::from_config`]
/// - [`Transfer::new`]
///
/// Run a transfer:
/// - [`Transfer::run`]
///
/// ## Example
///
/// ```no_run
/// use masscp::{MasscpConfig, Transfer, TransferRequest};
///
/// let yaml = std::fs::read_to_string("masscp.yaml").unwrap();
/// let config = MasscpConfig::from_yaml(&yaml).unwrap();
/// let transfer = Transfer::from_config(&config).unwrap();
///
/// let request = TransferRequest::fetch("/etc/hosts", "collected", config.hosts.clone());
/// let report = transfer.run(&request).unwrap();
///
/// report.results.pretty_print(&mut std::io::stdout()).unwrap();
/// for (host, error) in &report.failures {
///     eprintln!("{}: {}", host, error);
/// }
/// ```
pub struct Transfer<C> {
    connector: C,
    default_port: u16,
    max_transfer_size: u64,
}

impl Transfer<SshConnector> {
    /// Constructs a new SSH `Transfer` from the specified configuration.
    ///
    /// Fails if the authentication methods cannot be resolved.
    pub fn from_config(config: &MasscpConfig) -> Result<Self> {
        let connector = SshConnector::new(&config.user, config.auth_methods()?)
            .timeout(config.timeout)
            .insecure_host_key_accept(config.insecure_host_key_accept);
        Ok(Transfer::new(connector)
            .default_port(config.default_port)
            .max_transfer_size(config.max_transfer_size))
    }
}

impl<C: Connector> Transfer<C> {
    /// Constructs a new `Transfer` dialing hosts with the specified connector.
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            default_port: 22,
            max_transfer_size: DEFAULT_MAX_TRANSFER_SIZE,
        }
    }

    /// Sets the port used for hosts specified without one.
    pub fn default_port(mut self, port: u16) -> Self {
        self.default_port = port;
        self
    }

    /// Sets the maximum size, in bytes, of a fetched file.
    pub fn max_transfer_size(mut self, size: u64) -> Self {
        self.max_transfer_size = size;
        self
    }

    /// Runs the request against every host and waits for all of them.
    ///
    /// Local preconditions are checked before any connection is made. Failing to connect
    /// to any host fails the whole run. Once connected, a host's failure is recorded in
    /// the report and never affects the other hosts.
    pub fn run(&self, request: &TransferRequest) -> Result<TransferReport> {
        let job = self.validate(request)?;

        let mut pool = ConnectionPool::connect(&self.connector, &request.hosts, self.default_port)?;
        let report = fan_out(&mut pool, &job);
        pool.close();

        Ok(report)
    }

    fn validate(&self, request: &TransferRequest) -> Result<Job> {
        if request.recursive {
            return Err(TransferError::RecursiveUnsupported(request.local_path.clone()));
        }
        let local = &request.local_path;
        match request.direction {
            Direction::Fetch => {
                match std::fs::metadata(local) {
                    Ok(metadata) if metadata.is_dir() => {}
                    Ok(_) => return Err(TransferError::LocalNotDirectory(local.clone())),
                    Err(_) => std::fs::create_dir_all(local)
                        .map_err(|error| TransferError::local_path(local, error))?,
                }
                Ok(Job::Fetch {
                    remote_path: request.remote_path.clone(),
                    local_dir: local.clone(),
                    max_transfer_size: self.max_transfer_size,
                })
            }
            Direction::Send => {
                let metadata = std::fs::metadata(local)
                    .map_err(|error| TransferError::local_path(local, error))?;
                if metadata.is_dir() {
                    return Err(TransferError::RecursiveUnsupported(local.clone()));
                }
                if !metadata.is_file() {
                    return Err(TransferError::Config(format!("{:?} is not a regular file", local)));
                }
                let remote_path = if request.remote_path.ends_with('/') {
                    let name = local
                        .file_name()
                        .map(|name| name.to_string_lossy())
                        .unwrap_or_default();
                    format!("{}/{}", request.remote_path.trim_end_matches('/'), name)
                } else {
                    request.remote_path.clone()
                };
                Ok(Job::Send {
                    local_path: local.clone(),
                    remote_path,
                    overwrite: request.overwrite,
                })
            }
        }
    }
}

/// Validated per-host work.
#[derive(Debug)]
enum Job {
    Fetch {
        remote_path: String,
        local_dir: PathBuf,
        max_transfer_size: u64,
    },
    Send {
        local_path: PathBuf,
        remote_path: String,
        overwrite: bool,
    },
}

/// Runs one task per pooled session, waits for every task, then merges their results.
fn fan_out<S: RemoteSession>(pool: &mut ConnectionPool<S>, job: &Job) -> TransferReport {
    // Create a multi-producer, single-consumer channel.
    let (tx, rx) = mpsc::channel();

    std::thread::scope(|scope| {
        for session in pool.sessions_mut() {
            let tx = tx.clone();
            scope.spawn(move || {
                let host = session.peer_addr().to_string();
                tracing::debug!(host = %host, "transfer started");
                let result = match job {
                    Job::Fetch {
                        remote_path,
                        local_dir,
                        max_transfer_size,
                    } => fetch(session, remote_path, local_dir, *max_transfer_size),
                    Job::Send {
                        local_path,
                        remote_path,
                        overwrite,
                    } => send(session, local_path, remote_path, *overwrite),
                };
                let _ = tx.send((host, result));
            });
        }
    });
    drop(tx);

    // Every task has joined, merge on this thread.
    let mut report = TransferReport::default();
    for (host, result) in rx {
        match result {
            Ok(outcome) => {
                tracing::info!(
                    host = %host,
                    source = %outcome.source,
                    target = %outcome.target,
                    bytes = outcome.size,
                    "transfer completed"
                );
                report.results.insert(host, outcome);
            }
            Err(error) => {
                tracing::error!(host = %host, %error, "transfer failed");
                report.failures.push((host, error));
            }
        }
    }
    report
}

fn fetch<S: RemoteSession>(
    session: &mut S,
    remote_path: &str,
    local_dir: &Path,
    max_transfer_size: u64,
) -> Result<TransferOutcome> {
    let stat = session.stat(Path::new(remote_path))?;
    if stat.is_dir {
        return Err(TransferError::RemoteIsDirectory(remote_path.to_owned()));
    }
    let size = stat
        .size
        .ok_or_else(|| TransferError::UnknownSize(remote_path.to_owned()))?;
    if size > max_transfer_size {
        return Err(TransferError::TooLarge {
            size,
            max: max_transfer_size,
        });
    }

    let mut src = session.open(Path::new(remote_path))?;
    let name = fetch_file_name(remote_basename(remote_path), session.peer_addr().ip());
    let target = local_dir.join(name);
    let mut dst = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&target)?;

    let stats = StreamCopier::new().copy(&mut src, &mut dst)?;
    Ok(TransferOutcome {
        source: remote_path.to_owned(),
        target: target.display().to_string(),
        size: stats.bytes,
        elapsed: stats.elapsed,
    })
}

fn send<S: RemoteSession>(
    session: &mut S,
    local_path: &Path,
    remote_path: &str,
    overwrite: bool,
) -> Result<TransferOutcome> {
    // Any stat failure is taken as "does not exist".
    if session.stat(Path::new(remote_path)).is_ok() && !overwrite {
        return Err(TransferError::RemoteExists(remote_path.to_owned()));
    }

    let mut src = std::fs::File::open(local_path)?;
    let mut dst = session.create(Path::new(remote_path))?;

    let stats = StreamCopier::new().copy(&mut src, &mut dst)?;
    Ok(TransferOutcome {
        source: local_path.display().to_string(),
        target: remote_path.to_owned(),
        size: stats.bytes,
        elapsed: stats.elapsed,
    })
}

/// Returns the last element of a `/` separated remote path.
fn remote_basename(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return if path.is_empty() { "." } else { "/" };
    }
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}

/// Returns the local name of a file fetched from `peer`: `<stem>-<ip-with-dashes>.<ext>`.
///
/// The extension follows the last `.` of `basename`. Without one, the stem is the whole
/// name and the extension is empty, leaving a trailing `.`.
pub fn fetch_file_name(basename: &str, peer: IpAddr) -> String {
    let (stem, ext) = basename.rsplit_once('.').unwrap_or((basename, ""));
    format!("{}-{}.{}", stem, peer.to_string().replace('.', "-"), ext)
}
