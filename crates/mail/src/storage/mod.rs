//! Credential storage
//!
//! The trait-based design allows swapping the on-disk token file for an
//! in-memory store in tests.

mod file;
mod memory;
mod traits;

pub use file::FileCredentialStore;
pub use memory::InMemoryCredentialStore;
pub use traits::CredentialStore;
