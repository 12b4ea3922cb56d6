use crate::error::{Result, TransferError};
use serde::Deserialize;
use std::path::PathBuf;

/// Default maximum size, in bytes, of a single fetched file.
pub const DEFAULT_MAX_TRANSFER_SIZE: u64 = 1_099_511_627_776;

/// Default timeout, in milliseconds, for dialing and authenticating a host.
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Authentication method.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub enum Auth {
    /// Agent authentication using the public keys found in an SSH agent.
    #[serde(rename = "agent")]
    Agent,
    /// Basic password authentication.
    #[serde(rename = "password")]
    Password(String),
    /// Basic password authentication, reading the password from an environment variable.
    #[serde(rename = "password_env")]
    PasswordEnv(String),
    /// Public key authentication using a PEM encoded private key file stored on disk.
    #[serde(rename = "pubkey")]
    Pubkey(PathBuf),
}

/// Source of the authentication methods used for a run.
///
/// The returned list is ordered: each method is tried in turn until the session is
/// authenticated.
pub trait AuthProvider {
    /// Resolves the authentication methods, or fails the whole run.
    fn auth_methods(&self) -> Result<Vec<Auth>>;
}

/// Configuration file to build a [`Transfer`](crate::Transfer).
#[derive(Debug, Deserialize)]
pub struct MasscpConfig {
    /// Username used on every host.
    pub user: String,
    /// Ordered list of authentication methods.
    pub auth: Vec<Auth>,
    /// Port appended to hosts specified without one.
    #[serde(default = "default_port")]
    pub default_port: u16,
    /// Timeout, in milliseconds, for dialing and authenticating a host.
    ///
    /// Transfers themselves never time out.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    /// Maximum size, in bytes, of a fetched file.
    #[serde(default = "default_max_transfer_size")]
    pub max_transfer_size: u64,
    /// Accept any host key without verification.
    ///
    /// This is the only supported mode, it has to stay enabled to connect.
    #[serde(default = "default_insecure_host_key_accept")]
    pub insecure_host_key_accept: bool,
    /// List of target hosts, as `host` or `host:port`.
    #[serde(default)]
    pub hosts: Vec<String>,
}

impl MasscpConfig {
    /// Attempts to construct a new `MasscpConfig` from a JSON string.
    ///
    /// ## Example
    ///
    /// ```json
    /// {
    ///   "user": "deploy",
    ///   "auth": [
    ///     "agent",
    ///     { "pubkey": "/home/deploy/.ssh/id_rsa" },
    ///     { "password_env": "MASSCP_PASSWORD" }
    ///   ],
    ///   "default_port": 22,
    ///   "max_transfer_size": 104857600,
    ///   "hosts": [
    ///     "10.0.0.1",
    ///     "10.0.0.2:20022"
    ///   ]
    /// }
    /// ```
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|error| TransferError::Config(error.to_string()))
    }

    /// Attempts to construct a new `MasscpConfig` from a YAML string.
    ///
    /// ## Example
    ///
    /// ```yaml
    /// ---
    /// user: deploy
    /// auth:
    ///   - agent
    ///   - pubkey: /home/deploy/.ssh/id_rsa
    /// timeout: 5000
    /// hosts:
    ///   - 10.0.0.1
    ///   - 10.0.0.2:20022
    /// ```
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|error| TransferError::Config(error.to_string()))
    }
}

impl AuthProvider for MasscpConfig {
    fn auth_methods(&self) -> Result<Vec<Auth>> {
        if self.auth.is_empty() {
            return Err(TransferError::Auth("no authentication method configured".into()));
        }
        self.auth
            .iter()
            .map(|auth| match auth {
                Auth::PasswordEnv(var) => std::env::var(var)
                    .map(Auth::Password)
                    .map_err(|_| TransferError::Auth(format!("{} is not set", var))),
                Auth::Pubkey(path) if !path.is_file() => Err(TransferError::Auth(format!(
                    "private key {:?} not found",
                    path
                ))),
                auth => Ok(auth.clone()),
            })
            .collect()
    }
}

fn default_port() -> u16 {
    22
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_MS
}

fn default_max_transfer_size() -> u64 {
    DEFAULT_MAX_TRANSFER_SIZE
}

fn default_insecure_host_key_accept() -> bool {
    true
}
