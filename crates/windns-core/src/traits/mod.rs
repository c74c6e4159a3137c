//! Core traits for windns
//!
//! This module defines the abstract interfaces the reconciler depends on.
//!
//! - [`RemoteExecutor`]: Run a rendered script against the configured server
//! - [`IdentityStore`]: Persistent tracking of managed record identities

pub mod executor;
pub mod identity_store;

pub use executor::RemoteExecutor;
pub use identity_store::{IdentityStore, StoredIdentity};
