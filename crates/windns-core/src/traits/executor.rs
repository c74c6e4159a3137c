// # Remote Executor Trait
//
// Defines the channel through which rendered scripts reach the DNS server.
//
// ## Implementations
//
// - PowerShell remoting: `windns-executor-pwsh` crate
//
// ## Usage
//
// ```rust,ignore
// use windns_core::{ClientConfig, CommandBuilder, DnsRecord, RemoteExecutor};
//
// async fn probe(
//     executor: &dyn RemoteExecutor,
//     config: &ClientConfig,
// ) -> windns_core::Result<String> {
//     let record = DnsRecord::a("corp.local", "svc1", "10.0.0.5");
//     let script = CommandBuilder::new(config).probe(&record)?;
//     executor.execute(config, &script).await
// }
// ```

use async_trait::async_trait;

use crate::command::Script;
use crate::config::ClientConfig;

/// Trait for remote script execution
///
/// An executor takes a rendered [`Script`] and runs it on the server described by the
/// [`ClientConfig`] (host, credentials, transport, routing). It is a single blocking
/// round trip: no retries, no internal timeout, no caching of remote state.
///
/// # Result contract
///
/// - `Ok(output)`: the remote interpreter completed; `output` is its textual output with
///   trailing line breaks removed and may carry a success sentinel.
/// - `Err(Error::NotFound)`: the remote tool reported that the addressed object does not
///   exist. Executors that only see error text classify it with
///   [`Error::from_remote_stderr`](crate::Error::from_remote_stderr).
/// - `Err(Error::Execution)`: anything else, carrying the remote text verbatim.
///
/// # Thread Safety
///
/// Implementations must be usable from concurrent reconciliations.
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    /// Run `script` against the server in `config`
    async fn execute(
        &self,
        config: &ClientConfig,
        script: &Script,
    ) -> Result<String, crate::Error>;

    /// Get the executor name (for logging/debugging)
    fn executor_name(&self) -> &'static str;
}
