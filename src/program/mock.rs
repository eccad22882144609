use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use super::ProgramRecord;

/// Substitute implementation of a remote program: takes the input record, returns the output.
pub type ProgramHandler = Arc<dyn Fn(&ProgramRecord) -> ProgramRecord + Send + Sync>;

/// Program name to substitute handler, shared by every clone of one client.
///
/// Meant to be filled during test setup. Lookups happen on every call, so a mock registered
/// after a program was defined still applies to it.
#[derive(Clone, Default)]
pub(crate) struct MockRegistry {
    handlers: Arc<RwLock<HashMap<String, ProgramHandler>>>,
}

impl MockRegistry {
    /// Register `handler` for `name`, replacing any earlier one.
    pub(crate) fn register(&self, name: &str, handler: ProgramHandler) {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_owned(), handler);
    }

    pub(crate) fn remove(&self, name: &str) -> bool {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
            .is_some()
    }

    pub(crate) fn clear(&self) {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub(crate) fn lookup(&self, name: &str) -> Option<ProgramHandler> {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }
}

impl std::fmt::Debug for MockRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let handlers = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<&String> = handlers.keys().collect();
        names.sort();
        f.debug_struct("MockRegistry").field("programs", &names).finish()
    }
}
