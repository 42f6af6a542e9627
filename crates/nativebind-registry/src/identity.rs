//! Weak identity table from native handles to live wrappers.
//!
//! Entries never keep a wrapper alive. An entry whose wrapper has been
//! finalized is stale and treated as absent; stale entries are removed when
//! the wrapper drops or when a lookup runs into them.

use std::sync::{Mutex, MutexGuard, PoisonError, Weak};

use nativebind_core::NativeHandle;
use rustc_hash::FxHashMap;

use crate::wrapper::{ManagedWrapper, WrapperInner};

#[derive(Default)]
pub struct IdentityTable {
    entries: Mutex<FxHashMap<NativeHandle, Weak<WrapperInner>>>,
}

impl IdentityTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, FxHashMap<NativeHandle, Weak<WrapperInner>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record `wrapper` as the managed object for its handle.
    ///
    /// A later registration for the same handle replaces the earlier one.
    pub fn register(&self, wrapper: &ManagedWrapper) {
        self.entries().insert(wrapper.handle(), wrapper.downgrade());
    }

    /// Live wrapper for `handle`.
    pub fn lookup(&self, handle: NativeHandle) -> Option<ManagedWrapper> {
        let mut entries = self.entries();
        let weak = entries.get(&handle)?;
        match weak.upgrade() {
            Some(inner) => Some(ManagedWrapper::from_inner(inner)),
            None => {
                entries.remove(&handle);
                None
            }
        }
    }

    /// Remove the entry for `handle` if its wrapper is gone.
    pub(crate) fn forget(&self, handle: NativeHandle) {
        let mut entries = self.entries();
        if entries.get(&handle).is_some_and(|w| w.strong_count() == 0) {
            entries.remove(&handle);
        }
    }

    /// Number of entries, stale ones included.
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of entries whose wrapper is still alive.
    pub fn live_count(&self) -> usize {
        self.entries().values().filter(|w| w.strong_count() > 0).count()
    }

    /// Drop every stale entry, returning how many were removed.
    pub fn purge(&self) -> usize {
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|_, w| w.strong_count() > 0);
        before - entries.len()
    }
}

impl std::fmt::Debug for IdentityTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityTable").field("entries", &self.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class_registry::NativeClass;
    use nativebind_core::ObjectKind;
    use std::sync::Arc;

    fn wrapper(table: &Arc<IdentityTable>, addr: usize) -> ManagedWrapper {
        let class = Arc::new(NativeClass::new("GObject", ObjectKind::Gobject));
        ManagedWrapper::new(NativeHandle::from_addr(addr), class, false, None, Arc::downgrade(table))
    }

    #[test]
    fn lookup_returns_registered_wrapper() {
        let table = Arc::new(IdentityTable::new());
        let w = wrapper(&table, 0x10);
        table.register(&w);
        assert_eq!(table.lookup(w.handle()), Some(w.clone()));
        assert_eq!(table.lookup(NativeHandle::from_addr(0x20)), None);
    }

    #[test]
    fn dropped_wrapper_removes_its_entry() {
        let table = Arc::new(IdentityTable::new());
        let w = wrapper(&table, 0x10);
        table.register(&w);
        drop(w);
        assert!(table.is_empty());
        assert_eq!(table.lookup(NativeHandle::from_addr(0x10)), None);
    }

    #[test]
    fn replacement_survives_drop_of_previous_wrapper() {
        let table = Arc::new(IdentityTable::new());
        let first = wrapper(&table, 0x10);
        table.register(&first);
        let second = wrapper(&table, 0x10);
        table.register(&second);
        drop(first);
        assert_eq!(table.lookup(NativeHandle::from_addr(0x10)), Some(second));
    }

    #[test]
    fn entries_do_not_keep_wrappers_alive() {
        let table = Arc::new(IdentityTable::new());
        let w = wrapper(&table, 0x10);
        table.register(&w);
        assert_eq!(w.strong_count(), 1);
        assert_eq!(table.live_count(), 1);
    }

    #[test]
    fn purge_drops_stale_entries() {
        let table = Arc::new(IdentityTable::new());
        // Not linked to the table, so the entry is left behind on drop.
        let class = Arc::new(NativeClass::new("GObject", ObjectKind::Gobject));
        let w = ManagedWrapper::new(NativeHandle::from_addr(0x30), class, false, None, Weak::new());
        table.register(&w);
        drop(w);
        assert_eq!(table.len(), 1);
        assert_eq!(table.live_count(), 0);
        assert_eq!(table.purge(), 1);
        assert!(table.is_empty());
    }
}
