// # Identity Store Implementations
//
// This module provides implementations of the IdentityStore trait for
// different persistence strategies.

pub mod file;
pub mod memory;

pub use file::FileIdentityStore;
pub use memory::MemoryIdentityStore;
