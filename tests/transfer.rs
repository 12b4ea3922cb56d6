//! End-to-end tests of the transfer orchestrator.
//!
//! Every "remote host" is a temporary directory served by an in-process connector,
//! so no SSH server is needed.

use masscp::{
    Connector, RemoteSession, RemoteStat, Result, Transfer, TransferError, TransferRequest,
};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

struct LocalSession {
    peer: SocketAddr,
    root: PathBuf,
    closed: Arc<AtomicUsize>,
}

impl LocalSession {
    fn resolve(&self, path: &Path) -> PathBuf {
        self.root.join(path.strip_prefix("/").unwrap_or(path))
    }
}

impl RemoteSession for LocalSession {
    type Reader = File;
    type Writer = File;

    fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    fn stat(&mut self, path: &Path) -> Result<RemoteStat> {
        let metadata = fs::metadata(self.resolve(path))?;
        Ok(RemoteStat {
            is_dir: metadata.is_dir(),
            size: Some(metadata.len()),
        })
    }

    fn open(&mut self, path: &Path) -> Result<File> {
        Ok(File::open(self.resolve(path))?)
    }

    fn create(&mut self, path: &Path) -> Result<File> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(self.resolve(path))?;
        Ok(file)
    }

    fn close(&mut self) -> Result<()> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Fleet of fake hosts, each backed by its own temporary directory.
struct Fleet {
    hosts: HashMap<String, (SocketAddr, TempDir)>,
    unreachable: Vec<String>,
    dials: AtomicUsize,
    closed: Arc<AtomicUsize>,
}

impl Fleet {
    fn new(count: u8) -> Self {
        let hosts = (1..=count)
            .map(|i| {
                let peer: SocketAddr = format!("10.0.0.{}:22", i).parse().unwrap();
                (format!("10.0.0.{}", i), (peer, tempfile::tempdir().unwrap()))
            })
            .collect();
        Fleet {
            hosts,
            unreachable: Vec::new(),
            dials: AtomicUsize::new(0),
            closed: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn host_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.hosts.keys().cloned().collect();
        names.sort();
        names.extend(self.unreachable.iter().cloned());
        names
    }

    /// Returns the path of a remote file on the specified host.
    fn path(&self, host: &str, remote_path: &str) -> PathBuf {
        self.hosts[host].1.path().join(remote_path.trim_start_matches('/'))
    }

    fn write(&self, host: &str, remote_path: &str, contents: &[u8]) {
        let path = self.path(host, remote_path);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn dials(&self) -> usize {
        self.dials.load(Ordering::SeqCst)
    }
}

impl Connector for &Fleet {
    type Session = LocalSession;

    fn connect(&self, addr: &str) -> Result<LocalSession> {
        self.dials.fetch_add(1, Ordering::SeqCst);
        let host = addr.trim_end_matches(":22");
        match self.hosts.get(host) {
            Some((peer, dir)) => Ok(LocalSession {
                peer: *peer,
                root: dir.path().to_owned(),
                closed: self.closed.clone(),
            }),
            None => Err(TransferError::connect(addr, "connection refused")),
        }
    }
}

#[test]
fn test_fetch_from_every_host() {
    let fleet = Fleet::new(3);
    fleet.write("10.0.0.1", "/etc/app.conf", b"one");
    fleet.write("10.0.0.2", "/etc/app.conf", b"second");
    fleet.write("10.0.0.3", "/etc/app.conf", b"third host");
    let local = tempfile::tempdir().unwrap();

    let request = TransferRequest::fetch("/etc/app.conf", local.path(), fleet.host_names());
    let report = Transfer::new(&fleet).run(&request).unwrap();

    assert!(report.is_success());
    assert_eq!(report.results.len(), 3);
    let expected = [
        ("10.0.0.1", "one"),
        ("10.0.0.2", "second"),
        ("10.0.0.3", "third host"),
    ];
    for (host, contents) in expected {
        let name = format!("app-{}.conf", host.replace('.', "-"));
        let path = local.path().join(&name);
        assert_eq!(fs::read_to_string(&path).unwrap(), contents);

        let outcome = report.results.get(&format!("{}:22", host)).unwrap();
        assert_eq!(outcome.size, contents.len() as u64);
        assert_eq!(outcome.source, "/etc/app.conf");
        assert_eq!(outcome.target, path.display().to_string());
    }
    assert_eq!(fleet.closed.load(Ordering::SeqCst), 3);
}

#[test]
fn test_fetch_same_basename_never_collides() {
    let fleet = Fleet::new(2);
    fleet.write("10.0.0.1", "/var/log/syslog", b"from host one");
    fleet.write("10.0.0.2", "/var/log/syslog", b"from host two");
    let local = tempfile::tempdir().unwrap();

    let request = TransferRequest::fetch("/var/log/syslog", local.path(), fleet.host_names());
    let report = Transfer::new(&fleet).run(&request).unwrap();
    assert_eq!(report.results.len(), 2);

    let one = local.path().join("syslog-10-0-0-1.");
    let two = local.path().join("syslog-10-0-0-2.");
    assert_eq!(fs::read(one).unwrap(), b"from host one");
    assert_eq!(fs::read(two).unwrap(), b"from host two");
    assert_eq!(fs::read_dir(local.path()).unwrap().count(), 2);
}

#[test]
fn test_fetch_isolates_host_failures() {
    let fleet = Fleet::new(5);
    fleet.write("10.0.0.1", "/data/blob.bin", &[7u8; 3000]);
    fleet.write("10.0.0.2", "/data/blob.bin", &[7u8; 4096]);
    fs::create_dir_all(fleet.path("10.0.0.3", "/data/blob.bin")).unwrap();
    fleet.write("10.0.0.4", "/data/blob.bin", &[9u8; 3500]);
    // 10.0.0.5 has no such file.
    let local = tempfile::tempdir().unwrap();

    let request = TransferRequest::fetch("/data/blob.bin", local.path(), fleet.host_names());
    let report = Transfer::new(&fleet)
        .max_transfer_size(3500)
        .run(&request)
        .unwrap();

    let results = report.results.into_inner();
    assert_eq!(results.len(), 2);
    assert_eq!(results["10.0.0.1:22"].size, 3000);
    assert_eq!(results["10.0.0.4:22"].size, 3500);
    assert_eq!(fs::read(local.path().join("blob-10-0-0-4.bin")).unwrap(), vec![9u8; 3500]);
    assert!(!local.path().join("blob-10-0-0-2.bin").exists());

    let mut failures = report.failures;
    failures.sort_by(|a, b| a.0.cmp(&b.0));
    let hosts: Vec<_> = failures.iter().map(|(host, _)| host.as_str()).collect();
    assert_eq!(hosts, vec!["10.0.0.2:22", "10.0.0.3:22", "10.0.0.5:22"]);
    assert!(matches!(failures[0].1, TransferError::TooLarge { size: 4096, max: 3500 }));
    assert!(matches!(failures[1].1, TransferError::RemoteIsDirectory(_)));
    assert!(matches!(failures[2].1, TransferError::Io(_)));
    assert!(failures.iter().all(|(_, error)| !error.is_fatal()));
}

#[test]
fn test_duplicate_hosts_share_one_session() {
    let fleet = Fleet::new(1);
    fleet.write("10.0.0.1", "/etc/app.conf", b"only once");
    let local = tempfile::tempdir().unwrap();

    let hosts = vec!["10.0.0.1".to_string(), "10.0.0.1:22".to_string()];
    let request = TransferRequest::fetch("/etc/app.conf", local.path(), hosts);
    let report = Transfer::new(&fleet).run(&request).unwrap();

    assert_eq!(fleet.dials(), 1);
    assert_eq!(fleet.closed.load(Ordering::SeqCst), 1);
    assert!(report.is_success());
    assert_eq!(report.results.len(), 1);
    assert_eq!(report.results.get("10.0.0.1:22").unwrap().size, 9);
}

#[test]
fn test_fetch_into_local_file_never_connects() {
    let fleet = Fleet::new(2);
    let local = tempfile::NamedTempFile::new().unwrap();

    let request = TransferRequest::fetch("/etc/hosts", local.path(), fleet.host_names());
    let err = Transfer::new(&fleet).run(&request).unwrap_err();

    assert!(matches!(err, TransferError::LocalNotDirectory(_)));
    assert!(err.is_fatal());
    assert_eq!(fleet.dials(), 0);
}

#[test]
fn test_unreachable_host_fails_whole_batch() {
    let mut fleet = Fleet::new(3);
    fleet.unreachable.push("10.0.0.99".into());
    fleet.write("10.0.0.1", "/etc/app.conf", b"x");
    let local = tempfile::tempdir().unwrap();

    let request = TransferRequest::fetch("/etc/app.conf", local.path(), fleet.host_names());
    let err = Transfer::new(&fleet).run(&request).unwrap_err();

    assert!(matches!(err, TransferError::Connect { .. }));
    assert_eq!(fleet.dials(), 4);
    // The three sessions opened before the failure are released, and nothing was copied.
    assert_eq!(fleet.closed.load(Ordering::SeqCst), 3);
    assert_eq!(fs::read_dir(local.path()).unwrap().count(), 0);
}

#[test]
fn test_send_to_every_host() {
    let fleet = Fleet::new(3);
    for host in fleet.host_names() {
        fs::create_dir_all(fleet.path(&host, "/opt/app")).unwrap();
    }
    let local = tempfile::tempdir().unwrap();
    let source = local.path().join("release.tar");
    fs::write(&source, vec![42u8; 5000]).unwrap();

    let request = TransferRequest::send(&source, "/opt/app/", fleet.host_names());
    let report = Transfer::new(&fleet).run(&request).unwrap();

    assert!(report.is_success());
    assert_eq!(report.results.len(), 3);
    for host in fleet.host_names() {
        let remote = fleet.path(&host, "/opt/app/release.tar");
        assert_eq!(fs::read(remote).unwrap(), vec![42u8; 5000]);

        let outcome = report.results.get(&format!("{}:22", host)).unwrap();
        assert_eq!(outcome.size, 5000);
        assert_eq!(outcome.target, "/opt/app/release.tar");
    }
}

#[test]
fn test_send_without_overwrite_keeps_remote_file() {
    let fleet = Fleet::new(1);
    fs::create_dir_all(fleet.path("10.0.0.1", "/etc")).unwrap();
    let local = tempfile::tempdir().unwrap();
    let source = local.path().join("motd");
    fs::write(&source, "first").unwrap();
    let request = TransferRequest::send(&source, "/etc/motd", fleet.host_names());

    let report = Transfer::new(&fleet).run(&request).unwrap();
    assert_eq!(report.results.len(), 1);

    fs::write(&source, "second").unwrap();
    let report = Transfer::new(&fleet).run(&request).unwrap();
    assert!(report.results.is_empty());
    assert_eq!(report.failures.len(), 1);
    assert!(matches!(report.failures[0].1, TransferError::RemoteExists(_)));
    assert_eq!(fs::read_to_string(fleet.path("10.0.0.1", "/etc/motd")).unwrap(), "first");

    let report = Transfer::new(&fleet).run(&request.overwrite(true)).unwrap();
    assert_eq!(report.results.get("10.0.0.1:22").unwrap().size, 6);
    assert_eq!(fs::read_to_string(fleet.path("10.0.0.1", "/etc/motd")).unwrap(), "second");
}

#[test]
fn test_send_directory_is_rejected() {
    let fleet = Fleet::new(2);
    let local = tempfile::tempdir().unwrap();

    let request = TransferRequest::send(local.path(), "/tmp/", fleet.host_names());
    let err = Transfer::new(&fleet).run(&request).unwrap_err();

    assert!(matches!(err, TransferError::RecursiveUnsupported(_)));
    assert!(err.to_string().contains("recursive transfer not supported"));
    assert_eq!(fleet.dials(), 0);
}

#[test]
fn test_send_missing_source_aborts_run() {
    let fleet = Fleet::new(2);
    let local = tempfile::tempdir().unwrap();

    let request = TransferRequest::send(local.path().join("gone.tar"), "/tmp/", fleet.host_names());
    let err = Transfer::new(&fleet).run(&request).unwrap_err();

    assert!(matches!(err, TransferError::LocalPath { .. }));
    assert!(err.is_fatal());
    assert_eq!(fleet.dials(), 0);
}

#[test]
fn test_no_hosts() {
    let fleet = Fleet::new(0);
    let local = tempfile::tempdir().unwrap();

    let request = TransferRequest::fetch("/etc/hosts", local.path(), Vec::new());
    let report = Transfer::new(&fleet).run(&request).unwrap();

    assert!(report.results.is_empty());
    assert!(report.is_success());
}
