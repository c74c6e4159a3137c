//! Configuration types for windns
//!
//! [`ClientConfig`] carries the connection parameters of one provider session. It is
//! built once, validated, and then passed read-only into every reconciliation call.

use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};

/// Connection and session parameters for one remote DNS server
#[derive(Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Account used to connect to the server
    pub username: String,

    /// Password for `username`; may be omitted for SSH key authentication
    #[serde(default)]
    pub password: Option<String>,

    /// Host the remote session is opened against
    pub server: String,

    /// Server the DNS cmdlets address when routing through a jump host.
    /// Falls back to the record's zone name when unset.
    #[serde(default)]
    pub domain_controller: Option<String>,

    /// Remote session transport
    #[serde(default)]
    pub transport: Transport,

    /// Treat `server` as an intermediate host and route cmdlets onward with `-ComputerName`
    #[serde(default)]
    pub use_jump_host: bool,

    /// Ask the server to maintain the reverse PTR record when adding an A record
    #[serde(default)]
    pub auto_create_ptr: bool,

    /// Lock marker settings
    #[serde(default)]
    pub lock: LockSettings,
}

// Custom Debug implementation that hides the password
impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<REDACTED>"))
            .field("server", &self.server)
            .field("domain_controller", &self.domain_controller)
            .field("transport", &self.transport)
            .field("use_jump_host", &self.use_jump_host)
            .field("auto_create_ptr", &self.auto_create_ptr)
            .field("lock", &self.lock)
            .finish()
    }
}

impl ClientConfig {
    /// Create a configuration for `server` with default transport and lock settings.
    ///
    /// The lock marker path is derived from the server name here, once, so every
    /// session configured for the same server shares one marker.
    pub fn new(username: impl Into<String>, server: impl Into<String>) -> Self {
        let server = server.into();
        Self {
            username: username.into(),
            password: None,
            lock: LockSettings::for_server(&server),
            server,
            domain_controller: None,
            transport: Transport::default(),
            use_jump_host: false,
            auto_create_ptr: false,
        }
    }

    /// Set the password
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Set the transport
    pub fn with_transport(mut self, transport: Transport) -> Self {
        self.transport = transport;
        self
    }

    /// Enable jump-host routing, optionally naming the domain controller to route to
    pub fn with_jump_host(mut self, domain_controller: Option<String>) -> Self {
        self.use_jump_host = true;
        self.domain_controller = domain_controller;
        self
    }

    /// Enable or disable automatic PTR creation for A records
    pub fn with_auto_create_ptr(mut self, enabled: bool) -> Self {
        self.auto_create_ptr = enabled;
        self
    }

    /// Replace the lock settings
    pub fn with_lock(mut self, lock: LockSettings) -> Self {
        self.lock = lock;
        self
    }

    /// Load configuration from `WINDNS_*` environment variables
    ///
    /// # Variables
    ///
    /// - `WINDNS_USERNAME`, `WINDNS_PASSWORD`, `WINDNS_SERVER`, `WINDNS_DOMAIN_CONTROLLER`
    /// - `WINDNS_USESSL`, `WINDNS_USESSH`, `WINDNS_USEJUMPHOST`, `WINDNS_AUTOCREATEPTR` (flags)
    /// - `WINDNS_LOCK_FILE`: override the derived lock marker path
    ///
    /// The result is not validated; call [`validate`](Self::validate).
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|name| env::var(name).ok())
    }

    // Builds the configuration from any `WINDNS_*` variable source.
    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let text = |name: &str| var(name).filter(|v| !v.is_empty());
        let flag = |name: &str| match var(name) {
            Some(value) => parse_flag(name, &value),
            None => Ok(false),
        };

        let transport = Transport::from_flags(flag("WINDNS_USESSL")?, flag("WINDNS_USESSH")?)?;

        let mut config = Self::new(
            var("WINDNS_USERNAME").unwrap_or_default(),
            var("WINDNS_SERVER").unwrap_or_default(),
        )
        .with_transport(transport);
        config.password = text("WINDNS_PASSWORD");
        config.domain_controller = text("WINDNS_DOMAIN_CONTROLLER");
        config.use_jump_host = flag("WINDNS_USEJUMPHOST")?;
        config.auto_create_ptr = flag("WINDNS_AUTOCREATEPTR")?;

        if let Some(path) = text("WINDNS_LOCK_FILE") {
            config.lock.path = PathBuf::from(path);
        }

        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.username.trim().is_empty() {
            return Err(Error::config("The 'username' property was not specified"));
        }

        if self.server.trim().is_empty() {
            return Err(Error::config("The 'server' property was not specified"));
        }

        let has_password = self.password.as_deref().is_some_and(|p| !p.is_empty());
        if !has_password && self.transport != Transport::Ssh {
            return Err(Error::config(
                "The 'password' property was not specified and SSH transport is not in use",
            ));
        }

        self.lock.validate()
    }

    /// The `-ComputerName` value cmdlets route to, or `None` when addressing the
    /// connection directly.
    pub fn routing_target<'a>(&'a self, zone_name: &'a str) -> Option<&'a str> {
        if !self.use_jump_host {
            return None;
        }
        Some(self.domain_controller.as_deref().unwrap_or(zone_name))
    }
}

/// Remote session transport
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transport {
    /// WinRM over HTTP
    #[default]
    WinRm,
    /// WinRM over HTTPS
    WinRmHttps,
    /// PowerShell remoting over SSH
    Ssh,
}

impl Transport {
    /// Map the legacy `usessl` / `usessh` flag pair onto a transport
    pub fn from_flags(use_ssl: bool, use_ssh: bool) -> Result<Self> {
        match (use_ssl, use_ssh) {
            (false, false) => Ok(Transport::WinRm),
            (true, false) => Ok(Transport::WinRmHttps),
            (false, true) => Ok(Transport::Ssh),
            (true, true) => Err(Error::config(
                "usessl and usessh are mutually exclusive",
            )),
        }
    }
}

/// Lock marker settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockSettings {
    /// Marker file path
    pub path: PathBuf,

    /// Upper bound of the random delay before the first poll (in milliseconds)
    #[serde(default = "default_max_jitter_ms")]
    pub max_jitter_ms: u64,

    /// Delay between polls while the marker is held (in milliseconds)
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Pause after observing the marker absent (in milliseconds)
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,

    /// Age after which a held marker is considered abandoned (in seconds).
    ///
    /// `None` disables lease expiry: a crashed holder then blocks the target until the
    /// marker is removed by hand.
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: Option<u64>,

    /// Give up waiting after this long (in seconds). `None` waits forever.
    #[serde(default)]
    pub max_wait_secs: Option<u64>,
}

impl LockSettings {
    /// Default settings with the marker placed at `path`
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            max_jitter_ms: default_max_jitter_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            settle_ms: default_settle_ms(),
            stale_after_secs: default_stale_after_secs(),
            max_wait_secs: None,
        }
    }

    /// Default settings with the marker in the temp directory, keyed by server name
    pub fn for_server(server: &str) -> Self {
        Self::at(default_lock_path(server))
    }

    /// Drop the jitter and settle delays and poll fast, keeping the marker path (for tests)
    pub fn without_delays(mut self) -> Self {
        self.max_jitter_ms = 0;
        self.poll_interval_ms = 5;
        self.settle_ms = 0;
        self
    }

    /// Validate the lock settings
    pub fn validate(&self) -> Result<()> {
        if self.path.as_os_str().is_empty() {
            return Err(Error::config("Lock file path cannot be empty"));
        }
        if self.poll_interval_ms == 0 {
            return Err(Error::config("Lock poll interval must be > 0"));
        }
        Ok(())
    }

    pub fn max_jitter(&self) -> Duration {
        Duration::from_millis(self.max_jitter_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn stale_after(&self) -> Option<Duration> {
        self.stale_after_secs.map(Duration::from_secs)
    }

    pub fn max_wait(&self) -> Option<Duration> {
        self.max_wait_secs.map(Duration::from_secs)
    }
}

impl Default for LockSettings {
    fn default() -> Self {
        Self::for_server("default")
    }
}

fn default_lock_path(server: &str) -> PathBuf {
    let key: String = server
        .trim()
        .to_ascii_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
        .collect();
    let key = if key.is_empty() { "default".to_string() } else { key };
    env::temp_dir().join(format!("windns-{}.lock", key))
}

fn default_max_jitter_ms() -> u64 {
    100
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_settle_ms() -> u64 {
    1000
}

fn default_stale_after_secs() -> Option<u64> {
    Some(600)
}

/// Parse a boolean-like flag value
pub fn parse_flag(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "" | "0" | "false" | "no" | "off" => Ok(false),
        "1" | "true" | "yes" | "on" => Ok(true),
        other => Err(Error::config(format!(
            "{} must be a boolean flag (1/0, true/false), got '{}'",
            name, other
        ))),
    }
}
