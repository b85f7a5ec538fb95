//! In-memory credential store, used by tests and embedders that manage
//! tokens themselves

use std::sync::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::CredentialStore;
use crate::error::{DigestError, Result};
use crate::models::Credential;

pub struct InMemoryCredentialStore {
    credential: RwLock<Option<Credential>>,
    saves: AtomicUsize,
}

impl InMemoryCredentialStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            credential: RwLock::new(None),
            saves: AtomicUsize::new(0),
        }
    }

    /// Create a store that already holds a credential
    pub fn with_credential(credential: Credential) -> Self {
        Self {
            credential: RwLock::new(Some(credential)),
            saves: AtomicUsize::new(0),
        }
    }

    /// Number of successful `save` calls so far
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

impl Default for InMemoryCredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned() -> DigestError {
    DigestError::Configuration("credential store lock poisoned".to_string())
}

impl CredentialStore for InMemoryCredentialStore {
    fn load(&self) -> Result<Option<Credential>> {
        Ok(self.credential.read().map_err(|_| poisoned())?.clone())
    }

    fn save(&self, credential: &Credential) -> Result<()> {
        *self.credential.write().map_err(|_| poisoned())? = Some(credential.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.credential.write().map_err(|_| poisoned())? = None;
        Ok(())
    }
}
