//! Generation lifecycle: installing → waiting → active → redundant.

use std::sync::atomic::{AtomicU64, Ordering};

use tracing::info;

use crate::{Result, ServiceWorkerError};

/// Unique identifier for one agent generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GenerationId(u64);

impl GenerationId {
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for GenerationId {
    fn default() -> Self {
        Self::new()
    }
}

/// Service worker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ServiceWorkerState {
    /// Created, install not started.
    #[default]
    Parsed,
    /// Installing (install event).
    Installing,
    /// Installed but waiting for activation.
    Installed,
    /// Activating (activate event).
    Activating,
    /// Active and controlling pages.
    Activated,
    /// Redundant (replaced or install failed).
    Redundant,
}

/// One cache generation as tracked by the registration.
#[derive(Debug, Clone)]
pub struct Generation {
    pub id: GenerationId,

    /// Cache store name, e.g. `rakla-pwa-v1.5.0`.
    pub cache_name: String,

    pub state: ServiceWorkerState,
}

impl Generation {
    pub fn new(id: GenerationId, cache_name: impl Into<String>) -> Self {
        Self {
            id,
            cache_name: cache_name.into(),
            state: ServiceWorkerState::Parsed,
        }
    }

    fn set_state(&mut self, state: ServiceWorkerState) {
        self.state = state;
    }
}

/// A service worker registration for one scope.
///
/// Holds at most one installing, one waiting and one active generation.
/// Generations that leave the registration are redundant.
#[derive(Debug, Default)]
pub struct Registration {
    pub installing: Option<Generation>,
    pub waiting: Option<Generation>,
    pub active: Option<Generation>,
}

impl Registration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state of a generation; `Redundant` once it has left the registration.
    pub fn state_of(&self, id: GenerationId) -> ServiceWorkerState {
        [&self.installing, &self.waiting, &self.active]
            .into_iter()
            .flatten()
            .find(|generation| generation.id == id)
            .map(|generation| generation.state)
            .unwrap_or(ServiceWorkerState::Redundant)
    }

    /// Begin installing a generation. A previous installing generation is dropped.
    pub fn start_install(&mut self, id: GenerationId, cache_name: &str) {
        let mut generation = Generation::new(id, cache_name);
        generation.set_state(ServiceWorkerState::Installing);
        self.installing = Some(generation);
    }

    /// Transition installing to waiting. A previously waiting generation becomes redundant.
    pub fn install_complete(&mut self, id: GenerationId) -> Result<()> {
        let mut generation = self.take_installing(id)?;
        generation.set_state(ServiceWorkerState::Installed);
        if let Some(old) = self.waiting.replace(generation) {
            info!(generation = old.id.raw(), "Waiting generation replaced");
        }
        Ok(())
    }

    /// Discard a generation whose install failed.
    pub fn install_failed(&mut self, id: GenerationId) {
        if self.take_installing(id).is_ok() {
            info!(generation = id.raw(), "Install failed, generation is redundant");
        }
    }

    /// Promote the waiting generation. The old active generation becomes redundant.
    ///
    /// Returns the cache name of the replaced generation, if any.
    pub fn start_activate(&mut self, id: GenerationId) -> Result<Option<String>> {
        match self.waiting.take() {
            Some(mut generation) if generation.id == id => {
                generation.set_state(ServiceWorkerState::Activating);
                let replaced = self.active.replace(generation);
                Ok(replaced.map(|old| old.cache_name))
            }
            other => {
                self.waiting = other;
                Err(ServiceWorkerError::State(format!(
                    "generation {} is not waiting",
                    id.raw()
                )))
            }
        }
    }

    /// Finish activation.
    pub fn activate_complete(&mut self, id: GenerationId) -> Result<()> {
        match self.active.as_mut() {
            Some(generation) if generation.id == id => {
                generation.set_state(ServiceWorkerState::Activated);
                Ok(())
            }
            _ => Err(ServiceWorkerError::State(format!(
                "generation {} is not activating",
                id.raw()
            ))),
        }
    }

    fn take_installing(&mut self, id: GenerationId) -> Result<Generation> {
        match self.installing.take() {
            Some(generation) if generation.id == id => Ok(generation),
            other => {
                self.installing = other;
                Err(ServiceWorkerError::State(format!(
                    "generation {} is not installing",
                    id.raw()
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registration_lifecycle() {
        let mut registration = Registration::new();
        let id = GenerationId::new();

        assert_eq!(registration.state_of(id), ServiceWorkerState::Redundant);

        registration.start_install(id, "rakla-pwa-v1");
        assert_eq!(registration.state_of(id), ServiceWorkerState::Installing);

        // Installing -> Installed
        registration.install_complete(id).unwrap();
        assert!(registration.installing.is_none());
        assert_eq!(registration.state_of(id), ServiceWorkerState::Installed);

        // Installed -> Active
        assert_eq!(registration.start_activate(id).unwrap(), None);
        assert_eq!(registration.state_of(id), ServiceWorkerState::Activating);
        registration.activate_complete(id).unwrap();
        assert_eq!(registration.state_of(id), ServiceWorkerState::Activated);
        assert!(registration.waiting.is_none());
    }

    #[test]
    fn test_new_generation_replaces_active() {
        let mut registration = Registration::new();
        let old = GenerationId::new();
        let new = GenerationId::new();

        registration.start_install(old, "rakla-pwa-v1");
        registration.install_complete(old).unwrap();
        registration.start_activate(old).unwrap();
        registration.activate_complete(old).unwrap();

        registration.start_install(new, "rakla-pwa-v2");
        registration.install_complete(new).unwrap();
        assert_eq!(registration.state_of(old), ServiceWorkerState::Activated);
        assert_eq!(registration.state_of(new), ServiceWorkerState::Installed);

        let replaced = registration.start_activate(new).unwrap();
        assert_eq!(replaced.as_deref(), Some("rakla-pwa-v1"));
        assert_eq!(registration.state_of(old), ServiceWorkerState::Redundant);
    }

    #[test]
    fn test_activate_requires_waiting() {
        let mut registration = Registration::new();
        let id = GenerationId::new();
        let other = GenerationId::new();

        assert!(registration.start_activate(id).is_err());

        registration.start_install(other, "rakla-pwa-v2");
        registration.install_complete(other).unwrap();
        assert!(matches!(
            registration.start_activate(id),
            Err(ServiceWorkerError::State(_))
        ));
        // The other generation is still waiting.
        assert_eq!(registration.state_of(other), ServiceWorkerState::Installed);
    }

    #[test]
    fn test_install_failed() {
        let mut registration = Registration::new();
        let id = GenerationId::new();

        registration.start_install(id, "rakla-pwa-v1");
        registration.install_failed(id);
        assert!(registration.installing.is_none());
        assert_eq!(registration.state_of(id), ServiceWorkerState::Redundant);
        assert!(registration.install_complete(id).is_err());
    }
}
