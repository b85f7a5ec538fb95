//! Storage trait definitions

use crate::error::Result;
use crate::models::Credential;

/// Persistence for the user's OAuth credential
pub trait CredentialStore: Send + Sync {
    /// Load the stored credential, `Ok(None)` when nothing is stored yet
    fn load(&self) -> Result<Option<Credential>>;

    /// Replace the stored credential
    fn save(&self, credential: &Credential) -> Result<()>;

    /// Remove the stored credential (logout)
    fn clear(&self) -> Result<()>;
}

/// Shared stores, so a caller can keep a handle to the store it hands over
impl<T: CredentialStore + ?Sized> CredentialStore for std::sync::Arc<T> {
    fn load(&self) -> Result<Option<Credential>> {
        (**self).load()
    }

    fn save(&self, credential: &Credential) -> Result<()> {
        (**self).save(credential)
    }

    fn clear(&self) -> Result<()> {
        (**self).clear()
    }
}
