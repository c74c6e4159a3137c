// # windns-core
//
// Reconciliation core for DNS records held by a Windows DNS server.
//
// ## Architecture Overview
//
// - **RemoteExecutor**: Trait for running a PowerShell script against the configured server
// - **CommandBuilder**: Renders probe / upsert / remove scripts for a declared record
// - **FileLock**: Advisory lock marker that serializes mutating calls per target
// - **ResourceReconciler**: Create / Read / Delete state machine over a declared record
// - **IdentityStore**: Persistent tracking of the identities of managed records
//
// ## Design Principles
//
// 1. **Separation of Concerns**: Transport lives behind `RemoteExecutor`, outside this crate
// 2. **Idempotency**: Create is an upsert, so re-running it converges instead of failing
// 3. **Serialized Mutation**: Create and Delete hold the target's lock for exactly one remote call
// 4. **Library-First**: The CLI is a thin layer over this crate

pub mod command;
pub mod config;
pub mod error;
pub mod lock;
pub mod reconciler;
pub mod record;
pub mod state;
pub mod traits;

// Re-export core types for convenience
pub use command::{CommandBuilder, Operation, Script};
pub use config::{ClientConfig, LockSettings, Transport};
pub use error::{Error, Result};
pub use lock::{FileLock, LockGuard};
pub use reconciler::{ApplyOutcome, Presence, ResourceReconciler, TrackedRecord, UpsertOutcome};
pub use record::{DnsRecord, RecordType};
pub use state::{FileIdentityStore, MemoryIdentityStore};
pub use traits::{IdentityStore, RemoteExecutor, StoredIdentity};
