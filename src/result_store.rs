use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::io::Write;
use std::time::Duration;

/// Unique string identifier (`ip_address:port` of the peer) of a transfer's host.
pub type Host = String;

/// Result of one successful per-host transfer.
#[derive(Clone, Debug, PartialEq)]
pub struct TransferOutcome {
    /// Path the bytes were read from.
    pub source: String,
    /// Path the bytes were written to.
    pub target: String,
    /// Number of bytes transferred.
    pub size: u64,
    /// Time spent copying.
    pub elapsed: Duration,
}

impl fmt::Display for TransferOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} => {} {}Byte {:.2} seconds",
            self.source,
            self.target,
            self.size,
            self.elapsed.as_secs_f64()
        )
    }
}

/// Mapping from host to transfer outcome, safe to update from many threads.
///
/// The guard is only held across the map mutation itself.
#[derive(Debug, Default)]
pub struct ResultStore {
    outcomes: Mutex<HashMap<Host, TransferOutcome>>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces the outcome of a host.
    pub fn insert(&self, host: impl Into<Host>, outcome: TransferOutcome) {
        self.outcomes.lock().insert(host.into(), outcome);
    }

    /// Returns a copy of the outcome of a host.
    pub fn get(&self, host: &str) -> Option<TransferOutcome> {
        self.outcomes.lock().get(host).cloned()
    }

    /// Returns the number of recorded outcomes.
    pub fn len(&self) -> usize {
        self.outcomes.lock().len()
    }

    /// Returns whether no outcome was recorded.
    pub fn is_empty(&self) -> bool {
        self.outcomes.lock().is_empty()
    }

    /// Consumes the store and returns its outcomes, in no particular order.
    pub fn into_inner(self) -> HashMap<Host, TransferOutcome> {
        self.outcomes.into_inner()
    }

    /// Returns a snapshot of every outcome, sorted by host.
    pub fn sorted(&self) -> Vec<(Host, TransferOutcome)> {
        let mut outcomes: Vec<_> = self
            .outcomes
            .lock()
            .iter()
            .map(|(host, outcome)| (host.clone(), outcome.clone()))
            .collect();
        outcomes.sort_by(|a, b| a.0.cmp(&b.0));
        outcomes
    }

    /// Writes one line per host: `<host>: <source> => <target> <size>Byte <secs> seconds`.
    pub fn pretty_print<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        for (host, outcome) in self.sorted() {
            writeln!(out, "{:>21}: {}", host, outcome)?;
        }
        Ok(())
    }
}
