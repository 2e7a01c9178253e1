//! Function registry: one cached handle per custom function slot.
//!
//! Slots live in a `DashMap`, so a cache hit is a sharded read plus an
//! `Arc` clone and never waits on another slot's load. The first resolver of
//! a slot takes the slot's build lock and loads; concurrent resolvers of the
//! same slot wait on that lock and reuse the result.
//!
//! ```text
//! resolve(ref) ──► slots[ref.id] ──hit──► Arc<FunctionHandle>
//!                       │ miss / stale / unhealthy
//!                       ▼
//!                 build lock ──► Adapters::load ──► slot.handle
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use lamina_ir::{Contract, FunctionId, FunctionReference, RuntimeName};
use parking_lot::Mutex;

use crate::adapter::Adapters;
use crate::{BridgeConfig, BridgeError, FunctionHandle};


/// One registry entry.
struct Slot {
    reference: FunctionReference,
    contract: Contract,
    handle: OnceLock<Arc<FunctionHandle>>,
    /// Held while loading and while releasing.
    build: Mutex<()>,
}

impl Slot {
    fn new(reference: &FunctionReference, contract: &Contract) -> Self {
        Slot {
            reference: reference.clone(),
            contract: *contract,
            handle: OnceLock::new(),
            build: Mutex::new(()),
        }
    }

    fn matches(&self, reference: &FunctionReference, contract: &Contract) -> bool {
        self.reference.same_target(reference) && self.contract == *contract
    }
}

/// Counters for tests and diagnostics.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct RegistryStats {
    /// Successful adapter loads.
    pub loads: u64,
    /// Resolves answered from the cache.
    pub hits: u64,
    /// Handles released by invalidation, eviction or teardown.
    pub releases: u64,
    /// External runtime processes started.
    pub sessions_started: u64,
    /// Native modules currently open.
    pub open_modules: usize,
}

/// Maps function slots to loaded handles and owns their lifecycle.
///
/// Dropping the registry releases every cached handle.
pub struct FunctionRegistry {
    adapters: Adapters,
    slots: DashMap<FunctionId, Arc<Slot>>,
    loads: AtomicU64,
    hits: AtomicU64,
    releases: AtomicU64,
}

impl FunctionRegistry {
    pub fn new(config: Arc<BridgeConfig>) -> Self {
        FunctionRegistry {
            adapters: Adapters::new(&config),
            slots: DashMap::new(),
            loads: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            releases: AtomicU64::new(0),
        }
    }

    /// The handle for `reference`, loading it on first use.
    ///
    /// A slot cached under a different reference or contract is evicted
    /// and released first; so is a handle whose session went bad. A failed
    /// load leaves no entry behind, so the next resolve retries.
    pub fn resolve(
        &self,
        reference: &FunctionReference,
        contract: &Contract,
    ) -> Result<Arc<FunctionHandle>, BridgeError> {
        if let Some(handle) = self.cached_for(reference, contract) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(function = %reference.id, handle = %handle.id(), "registry hit");
            return Ok(handle);
        }

        let _span = tracing::debug_span!(
            "resolve",
            function = %reference.id,
            language = %reference.language
        )
        .entered();
        loop {
            let slot = self.slot_for(reference, contract);
            let build = slot.build.lock();
            if !self.is_current(reference.id, &slot) {
                // Evicted while we waited.
                continue;
            }
            if let Some(handle) = slot.handle.get() {
                if handle.is_healthy() {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Ok(Arc::clone(handle));
                }
                drop(build);
                tracing::debug!(function = %reference.id, handle = %handle.id(), "evicting unhealthy handle");
                self.evict(reference.id, &slot);
                continue;
            }

            let loaded = {
                let _load = tracing::debug_span!("load").entered();
                self.adapters.load(reference, contract)
            };
            return match loaded {
                Ok(handle) => {
                    let handle = Arc::new(handle);
                    // Only the holder of the build lock sets the cell.
                    let _ = slot.handle.set(Arc::clone(&handle));
                    self.loads.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(function = %reference.id, handle = %handle.id(), backend = handle.backend(), "loaded");
                    Ok(handle)
                }
                Err(err) => {
                    self.slots
                        .remove_if(&reference.id, |_, current| Arc::ptr_eq(current, &slot));
                    tracing::debug!(function = %reference.id, %err, "load failed");
                    Err(err)
                }
            };
        }
    }

    /// Release and forget the handle cached for `id`.
    ///
    /// Returns whether anything was cached. Waits for an in-flight load of
    /// the slot to finish, then releases its result.
    pub fn invalidate(&self, id: FunctionId) -> bool {
        let Some((_, slot)) = self.slots.remove(&id) else {
            return false;
        };
        tracing::debug!(function = %id, "invalidating");
        self.release_slot(&slot);
        true
    }

    /// Invalidate every slot; returns how many there were.
    pub fn clear(&self) -> usize {
        let ids: Vec<FunctionId> = self.slots.iter().map(|entry| *entry.key()).collect();
        ids.into_iter().filter(|&id| self.invalidate(id)).count()
    }

    /// The handle currently cached for `id`, without loading.
    pub fn cached(&self, id: FunctionId) -> Option<Arc<FunctionHandle>> {
        let slot = self.slots.get(&id).map(|entry| Arc::clone(entry.value()))?;
        slot.handle.get().cloned()
    }

    /// Start the session for an external runtime ahead of the first load.
    pub fn prewarm(&self, runtime: &RuntimeName) {
        self.adapters.prewarm(runtime);
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            loads: self.loads.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            releases: self.releases.load(Ordering::Relaxed),
            sessions_started: self.adapters.external.sessions_started(),
            open_modules: self.adapters.native.open_modules(),
        }
    }

    /// Lock-free lookup for the steady state.
    fn cached_for(
        &self,
        reference: &FunctionReference,
        contract: &Contract,
    ) -> Option<Arc<FunctionHandle>> {
        let slot = self.slots.get(&reference.id).map(|entry| Arc::clone(entry.value()))?;
        if !slot.matches(reference, contract) {
            return None;
        }
        slot.handle.get().filter(|handle| handle.is_healthy()).cloned()
    }

    /// The slot for `reference`, replacing one cached for another target.
    fn slot_for(&self, reference: &FunctionReference, contract: &Contract) -> Arc<Slot> {
        let mut entry = self
            .slots
            .entry(reference.id)
            .or_insert_with(|| Arc::new(Slot::new(reference, contract)));
        if entry.matches(reference, contract) {
            return Arc::clone(&entry);
        }
        let fresh = Arc::new(Slot::new(reference, contract));
        let stale = std::mem::replace(&mut *entry, Arc::clone(&fresh));
        drop(entry);
        tracing::debug!(
            function = %reference.id,
            old = %stale.reference.locator,
            new = %reference.locator,
            "reference changed, evicting"
        );
        self.release_slot(&stale);
        fresh
    }

    fn is_current(&self, id: FunctionId, slot: &Arc<Slot>) -> bool {
        self.slots
            .get(&id)
            .is_some_and(|entry| Arc::ptr_eq(entry.value(), slot))
    }

    fn evict(&self, id: FunctionId, slot: &Arc<Slot>) {
        if self
            .slots
            .remove_if(&id, |_, current| Arc::ptr_eq(current, slot))
            .is_some()
        {
            self.release_slot(slot);
        }
    }

    fn release_slot(&self, slot: &Slot) {
        let _build = slot.build.lock();
        if let Some(handle) = slot.handle.get() {
            if handle.release() {
                self.releases.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

impl Drop for FunctionRegistry {
    fn drop(&mut self) {
        let released = self.clear();
        if released > 0 {
            tracing::debug!(released, "registry dropped");
        }
    }
}

impl std::fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionRegistry")
            .field("slots", &self.slots.len())
            .field("stats", &self.stats())
            .finish()
    }
}
