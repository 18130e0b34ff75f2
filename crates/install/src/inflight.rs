//! Single-flight table
//!
//! One table per install manager, guarded by a single lock. Claims are
//! RAII guards so an identifier leaves the table on every exit path,
//! including panics and cancellation.

use plugget_errors::{Error, InstallError};
use plugget_types::PluginId;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Default)]
pub(crate) struct InFlightTable {
    ids: Arc<Mutex<HashSet<PluginId>>>,
}

impl InFlightTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Claim an identifier, failing if an operation on it is already
    /// running
    pub(crate) fn try_claim(&self, id: &PluginId) -> Result<InFlightGuard, Error> {
        let mut ids = self.ids.lock().expect("in-flight table lock poisoned");
        if !ids.insert(id.clone()) {
            return Err(InstallError::AlreadyInProgress { id: id.to_string() }.into());
        }

        Ok(InFlightGuard {
            id: id.clone(),
            ids: self.ids.clone(),
        })
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, id: &PluginId) -> bool {
        self.ids
            .lock()
            .expect("in-flight table lock poisoned")
            .contains(id)
    }
}

#[derive(Debug)]
pub(crate) struct InFlightGuard {
    id: PluginId,
    ids: Arc<Mutex<HashSet<PluginId>>>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if let Ok(mut ids) = self.ids.lock() {
            ids.remove(&self.id);
        }
    }
}
