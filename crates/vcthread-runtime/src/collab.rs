//! Collaborator registration
//!
//! The runtime calls into subsystems it does not implement: a TLS
//! region allocator, per-thread dynamic storage, a blocking-call
//! forwarder and an alarm service. Applications register them once,
//! before `vcore_lib_init`. Every slot is optional.

use std::sync::OnceLock;
use vcthread_core::error::{VcoreError, VcoreResult};
use vcthread_core::traits::{AlarmService, BlockingForwarder, DynamicStorage, TlsAllocator};

/// The set of installed collaborators
#[derive(Clone, Copy, Default)]
pub struct Collaborators {
    pub tls: Option<&'static dyn TlsAllocator>,
    pub storage: Option<&'static dyn DynamicStorage>,
    pub forwarder: Option<&'static dyn BlockingForwarder>,
    pub alarms: Option<&'static dyn AlarmService>,
}

impl Collaborators {
    pub const fn none() -> Self {
        Self {
            tls: None,
            storage: None,
            forwarder: None,
            alarms: None,
        }
    }

    pub fn tls(mut self, tls: &'static dyn TlsAllocator) -> Self {
        self.tls = Some(tls);
        self
    }

    pub fn storage(mut self, storage: &'static dyn DynamicStorage) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn forwarder(mut self, forwarder: &'static dyn BlockingForwarder) -> Self {
        self.forwarder = Some(forwarder);
        self
    }

    pub fn alarms(mut self, alarms: &'static dyn AlarmService) -> Self {
        self.alarms = Some(alarms);
        self
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators")
            .field("tls", &self.tls.is_some())
            .field("storage", &self.storage.is_some())
            .field("forwarder", &self.forwarder.is_some())
            .field("alarms", &self.alarms.is_some())
            .finish()
    }
}

static COLLABORATORS: OnceLock<Collaborators> = OnceLock::new();
static NONE: Collaborators = Collaborators::none();

/// Install collaborators; only the first call wins
pub fn set_collaborators(collab: Collaborators) -> VcoreResult<()> {
    if crate::vcore::is_initialized() {
        return Err(VcoreError::AlreadyInitialized);
    }
    COLLABORATORS
        .set(collab)
        .map_err(|_| VcoreError::AlreadyInitialized)
}

/// Installed collaborators, or the empty set
#[inline]
pub fn collaborators() -> &'static Collaborators {
    COLLABORATORS.get().unwrap_or(&NONE)
}

#[inline]
pub(crate) fn tls_allocator() -> Option<&'static dyn TlsAllocator> {
    collaborators().tls
}

#[inline]
pub(crate) fn dynamic_storage() -> Option<&'static dyn DynamicStorage> {
    collaborators().storage
}

#[inline]
pub(crate) fn forwarder() -> Option<&'static dyn BlockingForwarder> {
    collaborators().forwarder
}

#[inline]
pub(crate) fn alarm_service() -> Option<&'static dyn AlarmService> {
    collaborators().alarms
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_set() {
        let c = Collaborators::none();
        assert!(c.tls.is_none());
        assert!(c.alarms.is_none());
        let shown = format!("{:?}", c);
        assert!(shown.contains("tls: false"));
    }
}
