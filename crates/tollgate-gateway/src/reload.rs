//! # Reload Coordinator
//!
//! Owns the active [`Dispatcher`] generation. Readers call
//! [`ReloadCoordinator::snapshot`] once per request and keep the returned
//! `Arc` for the request's lifetime, so a concurrent reload can never change
//! the routes a request is being served with.
//!
//! Writers are serialised by a mutex: each reload builds a complete registry
//! and route table from scratch and publishes it with a single atomic store.
//! A failed build leaves the active generation untouched.

use std::sync::Arc;

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tollgate_core::{ApiDefinition, GatewayError};

use crate::registry::{ApiRegistry, RegistryError};
use crate::table::{RouteMatch, RouteTable};

/// One immutable generation of registry and routes.
#[derive(Debug)]
pub struct Dispatcher {
    generation: u64,
    registry: ApiRegistry,
    table: RouteTable,
    loaded_at: DateTime<Utc>,
}

impl Dispatcher {
    /// Build generation `generation` from `definitions`.
    pub fn build(generation: u64, definitions: Vec<ApiDefinition>) -> Result<Self, RegistryError> {
        let registry = ApiRegistry::load(definitions)?;
        let table = RouteTable::build(&registry);
        Ok(Self {
            generation,
            registry,
            table,
            loaded_at: Utc::now(),
        })
    }

    /// Generation zero: no APIs.
    pub fn empty() -> Self {
        Self {
            generation: 0,
            registry: ApiRegistry::default(),
            table: RouteTable::default(),
            loaded_at: Utc::now(),
        }
    }

    /// Monotonic generation number.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The registry of this generation.
    pub fn registry(&self) -> &ApiRegistry {
        &self.registry
    }

    /// The route table of this generation.
    pub fn table(&self) -> &RouteTable {
        &self.table
    }

    /// When this generation was built.
    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    /// See [`RouteTable::dispatch`].
    pub fn dispatch(&self, path: &str) -> Result<RouteMatch, GatewayError> {
        self.table.dispatch(path)
    }
}

/// Publishes dispatcher generations.
#[derive(Debug)]
pub struct ReloadCoordinator {
    current: ArcSwap<Dispatcher>,
    write_lock: Mutex<()>,
}

impl Default for ReloadCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl ReloadCoordinator {
    /// Start at the empty generation zero.
    pub fn new() -> Self {
        Self {
            current: ArcSwap::from_pointee(Dispatcher::empty()),
            write_lock: Mutex::new(()),
        }
    }

    /// The active generation.
    pub fn snapshot(&self) -> Arc<Dispatcher> {
        self.current.load_full()
    }

    /// Replace the whole definition set.
    pub fn reload(&self, definitions: Vec<ApiDefinition>) -> Result<Arc<Dispatcher>, RegistryError> {
        let _guard = self.write_lock.lock();
        self.install(definitions)
    }

    /// Edit the active definition set and reload it.
    ///
    /// `edit` receives a copy of the current definitions. Returning `None`
    /// abandons the edit without a reload; `Some(r)` installs the edited set
    /// and yields the new generation alongside `r`.
    pub fn update<R>(
        &self,
        edit: impl FnOnce(&mut Vec<ApiDefinition>) -> Option<R>,
    ) -> Result<Option<(Arc<Dispatcher>, R)>, RegistryError> {
        let _guard = self.write_lock.lock();
        let mut definitions = self.current.load().registry.definitions();
        let Some(result) = edit(&mut definitions) else {
            return Ok(None);
        };
        let dispatcher = self.install(definitions)?;
        Ok(Some((dispatcher, result)))
    }

    // Caller holds `write_lock`.
    fn install(&self, definitions: Vec<ApiDefinition>) -> Result<Arc<Dispatcher>, RegistryError> {
        let next_generation = self.current.load().generation + 1;
        let dispatcher = match Dispatcher::build(next_generation, definitions) {
            Ok(d) => Arc::new(d),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    active_generation = next_generation - 1,
                    "API definition reload rejected"
                );
                return Err(e);
            }
        };
        self.current.store(Arc::clone(&dispatcher));
        tracing::info!(
            generation = dispatcher.generation,
            apis = dispatcher.registry.len(),
            "installed API definitions"
        );
        Ok(dispatcher)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::fixtures::definition;

    #[test]
    fn starts_empty_at_generation_zero() {
        let coordinator = ReloadCoordinator::new();
        let snapshot = coordinator.snapshot();
        assert_eq!(snapshot.generation(), 0);
        assert!(snapshot.registry().is_empty());
    }

    #[test]
    fn reload_bumps_generation() {
        let coordinator = ReloadCoordinator::new();
        let first = coordinator.reload(vec![definition("1", "/v1")]).unwrap();
        let second = coordinator.reload(vec![definition("2", "/v2")]).unwrap();
        assert_eq!(first.generation(), 1);
        assert_eq!(second.generation(), 2);
        assert_eq!(coordinator.snapshot().generation(), 2);
    }

    #[test]
    fn held_snapshot_survives_reload() {
        let coordinator = ReloadCoordinator::new();
        coordinator.reload(vec![definition("1", "/v1")]).unwrap();
        let held = coordinator.snapshot();

        coordinator.reload(vec![definition("2", "/v2")]).unwrap();

        assert_eq!(held.generation(), 1);
        assert!(held.dispatch("/v1/x").is_ok());
        assert!(held.dispatch("/v2/x").is_err());

        let fresh = coordinator.snapshot();
        assert!(fresh.dispatch("/v1/x").is_err());
        assert!(fresh.dispatch("/v2/x").is_ok());
    }

    #[test]
    fn failed_reload_keeps_active_generation() {
        let coordinator = ReloadCoordinator::new();
        coordinator.reload(vec![definition("1", "/v1")]).unwrap();

        let err = coordinator
            .reload(vec![definition("1", "/a"), definition("1", "/b")])
            .unwrap_err();
        assert_eq!(err, RegistryError::DuplicateApiId("1".into()));

        let active = coordinator.snapshot();
        assert_eq!(active.generation(), 1);
        assert!(active.dispatch("/v1").is_ok());

        // The next successful reload continues the sequence.
        let next = coordinator.reload(vec![definition("2", "/v2")]).unwrap();
        assert_eq!(next.generation(), 2);
    }

    #[test]
    fn update_edits_current_set() {
        let coordinator = ReloadCoordinator::new();
        coordinator.reload(vec![definition("1", "/v1")]).unwrap();

        let (dispatcher, added) = coordinator
            .update(|defs| {
                defs.push(definition("2", "/v2"));
                Some("added")
            })
            .unwrap()
            .unwrap();
        assert_eq!(added, "added");
        assert_eq!(dispatcher.registry().len(), 2);

        let skipped = coordinator.update(|_| None::<()>).unwrap();
        assert!(skipped.is_none());
        assert_eq!(coordinator.snapshot().generation(), 2);
    }

    #[test]
    fn concurrent_reloads_yield_distinct_generations() {
        let coordinator = Arc::new(ReloadCoordinator::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let coordinator = Arc::clone(&coordinator);
                std::thread::spawn(move || {
                    coordinator
                        .reload(vec![definition(&i.to_string(), "/v1")])
                        .unwrap()
                        .generation()
                })
            })
            .collect();
        let mut generations: Vec<u64> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        generations.sort_unstable();
        assert_eq!(generations, (1..=8).collect::<Vec<_>>());
    }
}
