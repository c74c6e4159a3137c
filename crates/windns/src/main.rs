// # windns - Windows DNS record reconciler
//
// Thin integration layer over windns-core. All reconciliation logic lives in the core;
// this binary only reads configuration, wires the executor and identity store, runs one
// operation and maps the result to an exit code.
//
// ## Usage
//
// ```bash
// windns [apply|create|read|delete]      # default: apply
// ```
//
// ## Configuration
//
// All configuration is done via environment variables.
//
// ### Connection
// - `WINDNS_USERNAME`, `WINDNS_PASSWORD`, `WINDNS_SERVER`
// - `WINDNS_USESSL`, `WINDNS_USESSH`: transport selection (mutually exclusive)
// - `WINDNS_USEJUMPHOST`, `WINDNS_DOMAIN_CONTROLLER`: route cmdlets through `WINDNS_SERVER`
// - `WINDNS_AUTOCREATEPTR`: maintain reverse records for added A records
// - `WINDNS_LOCK_FILE`: lock marker path (default derived from the server name)
//
// ### Record
// - `WINDNS_ZONE_NAME`, `WINDNS_RECORD_NAME`, `WINDNS_RECORD_TYPE` (A, CNAME, PTR)
// - `WINDNS_IPV4ADDRESS`, `WINDNS_HOSTNAMEALIAS`, `WINDNS_PTRDOMAINNAME`
//
// ### State
// - `WINDNS_STATE_PATH`: identity state file (in-memory when unset)
// - `WINDNS_RESOURCE`: address the record is tracked under (default: its identity)
//
// ### Logging
// - `WINDNS_LOG_LEVEL`: trace, debug, info, warn, error (default: info)
//
// ## Example
//
// ```bash
// export WINDNS_USERNAME='CORP\dnsadmin'
// export WINDNS_PASSWORD=...
// export WINDNS_SERVER=dc01.corp.local
// export WINDNS_ZONE_NAME=corp.local
// export WINDNS_RECORD_NAME=svc1
// export WINDNS_RECORD_TYPE=A
// export WINDNS_IPV4ADDRESS=10.0.0.5
// export WINDNS_STATE_PATH=/var/lib/windns/state.json
//
// windns apply
// ```

use anyhow::{Context, Result};
use std::env;
use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{Level, error, info};
use tracing_subscriber::FmtSubscriber;

use windns_core::{
    ClientConfig, DnsRecord, FileIdentityStore, IdentityStore, MemoryIdentityStore, Presence,
    RecordType, RemoteExecutor, ResourceReconciler, StoredIdentity, TrackedRecord,
};

/// Exit codes for different termination scenarios
///
/// - 0: Operation succeeded
/// - 1: Configuration error
/// - 2: Runtime error (remote call, lock, state file)
#[derive(Debug, Clone, Copy)]
enum WindnsExitCode {
    Success = 0,
    ConfigError = 1,
    RuntimeError = 2,
}

impl From<WindnsExitCode> for ExitCode {
    fn from(code: WindnsExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Operation selected on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Apply,
    Create,
    Read,
    Delete,
}

impl FromStr for Command {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "apply" => Ok(Command::Apply),
            "create" => Ok(Command::Create),
            "read" => Ok(Command::Read),
            "delete" => Ok(Command::Delete),
            other => anyhow::bail!(
                "Unknown operation '{}'. Valid operations: apply, create, read, delete",
                other
            ),
        }
    }
}

/// Application configuration
struct Config {
    command: Command,
    client: ClientConfig,
    record: DnsRecord,
    state_path: Option<String>,
    resource: String,
    log_level: String,
}

impl Config {
    /// Load configuration from the command line and environment variables
    fn load() -> Result<Self> {
        let command = match env::args().nth(1) {
            Some(arg) => arg.parse()?,
            None => Command::Apply,
        };

        let client = ClientConfig::from_env()?;

        let record_type = env::var("WINDNS_RECORD_TYPE").unwrap_or_default();
        let record_type = RecordType::from_str(&record_type)?;
        let mut record = DnsRecord::new(
            env::var("WINDNS_ZONE_NAME").unwrap_or_default(),
            env::var("WINDNS_RECORD_NAME").unwrap_or_default(),
            record_type,
        );
        record.ipv4address = non_empty_var("WINDNS_IPV4ADDRESS");
        record.hostnamealias = non_empty_var("WINDNS_HOSTNAMEALIAS");
        record.ptrdomainname = non_empty_var("WINDNS_PTRDOMAINNAME");

        let resource = non_empty_var("WINDNS_RESOURCE").unwrap_or_else(|| record.identity());

        Ok(Self {
            command,
            client,
            record,
            state_path: non_empty_var("WINDNS_STATE_PATH"),
            resource,
            log_level: env::var("WINDNS_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }

    /// Validate the configuration
    ///
    /// Record data is left to the reconciler, which reports the type-specific
    /// requirements itself and only for the operations that need them.
    fn validate(&self) -> Result<()> {
        self.client.validate()?;
        self.record.validate_key()?;

        if let Some(ref path) = self.state_path
            && let Some(parent) = std::path::Path::new(path).parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            anyhow::bail!(
                "WINDNS_STATE_PATH parent directory does not exist: {}. \
                Create it first: mkdir -p {}",
                parent.display(),
                parent.display()
            );
        }

        self.level()?;
        Ok(())
    }

    fn level(&self) -> Result<Level> {
        match self.log_level.to_lowercase().as_str() {
            "trace" => Ok(Level::TRACE),
            "debug" => Ok(Level::DEBUG),
            "info" => Ok(Level::INFO),
            "warn" => Ok(Level::WARN),
            "error" => Ok(Level::ERROR),
            _ => anyhow::bail!(
                "WINDNS_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

fn main() -> ExitCode {
    let config = match Config::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return WindnsExitCode::ConfigError.into();
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {}", e);
        return WindnsExitCode::ConfigError.into();
    }

    let log_level = config.level().unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return WindnsExitCode::ConfigError.into();
    }

    info!(
        operation = ?config.command,
        server = %config.client.server,
        resource = %config.resource,
        "Starting windns"
    );

    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return WindnsExitCode::RuntimeError.into();
        }
    };

    rt.block_on(async {
        match run(config).await {
            Ok(summary) => {
                println!("{}", summary);
                WindnsExitCode::Success
            }
            Err(e) => {
                error!("{:#}", e);
                eprintln!("Error: {:#}", e);
                WindnsExitCode::RuntimeError
            }
        }
    })
    .into()
}

/// Run one operation; returns the line printed on success
async fn run(config: Config) -> Result<String> {
    let executor = build_executor()?;
    let reconciler = ResourceReconciler::new(executor);

    let store: Arc<dyn IdentityStore> = match &config.state_path {
        Some(path) => {
            let store = FileIdentityStore::open(path)
                .await
                .with_context(|| format!("failed to open state file {}", path))?;
            info!(path = %store.path().display(), "Tracking identities in state file");
            Arc::new(store)
        }
        None => Arc::new(MemoryIdentityStore::new()),
    };

    let mut resource = match store.get(&config.resource).await? {
        Some(stored) => TrackedRecord::with_id(config.record.clone(), stored.id),
        None => TrackedRecord::new(config.record.clone()),
    };

    let summary = match config.command {
        Command::Apply => {
            let outcome = reconciler.apply(&mut resource, &config.client).await?;
            track(store.as_ref(), &config.resource, &resource).await?;
            format!("{:?}", outcome).to_lowercase()
        }
        Command::Create => {
            let outcome = reconciler.create(&mut resource, &config.client).await?;
            track(store.as_ref(), &config.resource, &resource).await?;
            format!("{:?}", outcome).to_lowercase()
        }
        Command::Read => {
            let presence = reconciler.read(&mut resource, &config.client).await?;
            track(store.as_ref(), &config.resource, &resource).await?;
            match presence {
                Presence::Present => "present".to_string(),
                Presence::Absent => "absent".to_string(),
            }
        }
        Command::Delete => {
            reconciler.delete(&mut resource, &config.client).await?;
            track(store.as_ref(), &config.resource, &resource).await?;
            "deleted".to_string()
        }
    };

    store.flush().await?;
    Ok(summary)
}

// Mirror the resource's identity into the store: tracked while set, forgotten once cleared.
async fn track(store: &dyn IdentityStore, address: &str, resource: &TrackedRecord) -> Result<()> {
    match resource.id() {
        Some(id) => {
            store
                .set(address, &StoredIdentity::new(id, resource.record.clone()))
                .await?
        }
        None => store.remove(address).await?,
    }
    Ok(())
}

#[cfg(feature = "pwsh")]
fn build_executor() -> Result<Arc<dyn RemoteExecutor>> {
    let executor = windns_executor_pwsh::PowerShellExecutor::new();
    info!(program = executor.program(), "Using PowerShell remoting executor");
    Ok(Arc::new(executor))
}

#[cfg(not(feature = "pwsh"))]
fn build_executor() -> Result<Arc<dyn RemoteExecutor>> {
    anyhow::bail!("windns was built without a remote executor; enable the 'pwsh' feature")
}
