use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use once_cell::sync::Lazy;
use tracing::info;

use ra_core::{RaError, Result};

use crate::config::ReferenceTextConfig;
use crate::reference_text::{ReferenceText, ReferenceTextId};

static GLOBAL: Lazy<ReferenceTextRegistry> = Lazy::new(ReferenceTextRegistry::new);

// ---------------------------------------------------------------------------
// ReferenceTextRegistry
// ---------------------------------------------------------------------------

/// Memo of open reference texts, so every request for the same id shares one
/// instance (and one book cache).
#[derive(Debug, Default)]
pub struct ReferenceTextRegistry {
    texts: Mutex<HashMap<ReferenceTextId, Arc<ReferenceText>>>,
}

impl ReferenceTextRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry.
    pub fn global() -> &'static ReferenceTextRegistry {
        &GLOBAL
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<ReferenceTextId, Arc<ReferenceText>>>> {
        self.texts
            .lock()
            .map_err(|_| RaError::Internal("reference text registry lock poisoned".to_string()))
    }

    /// The registered text for `id`, creating and registering it with
    /// `create` if there is none.
    pub fn get_or_insert_with<F>(&self, id: &ReferenceTextId, create: F) -> Result<Arc<ReferenceText>>
    where
        F: FnOnce() -> Result<ReferenceText>,
    {
        let mut texts = self.lock()?;
        if let Some(text) = texts.get(id) {
            return Ok(Arc::clone(text));
        }
        let text = create()?;
        if text.id() != id {
            return Err(RaError::InvalidInput(format!(
                "reference text {} registered under {id}",
                text.id()
            )));
        }
        let text = Arc::new(text);
        texts.insert(id.clone(), Arc::clone(&text));
        info!(%id, "registered reference text");
        Ok(text)
    }

    /// The registered text for `config.id`, opening it from `config` if
    /// there is none.
    pub fn open(&self, config: &ReferenceTextConfig) -> Result<Arc<ReferenceText>> {
        self.get_or_insert_with(&config.id, || ReferenceText::open(config))
    }

    pub fn get(&self, id: &ReferenceTextId) -> Result<Option<Arc<ReferenceText>>> {
        Ok(self.lock()?.get(id).cloned())
    }

    /// Drop the registered text for `id`, e.g. after its project data was
    /// deleted. Returns whether one was registered.
    pub fn forget(&self, id: &ReferenceTextId) -> Result<bool> {
        let removed = self.lock()?.remove(id).is_some();
        if removed {
            info!(%id, "forgot reference text");
        }
        Ok(removed)
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.lock()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.lock()?.is_empty())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
