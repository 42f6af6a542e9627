//! Managed wrappers around native handles.
//!
//! A [`ManagedWrapper`] is a cheap clone of a shared wrapper. When the last
//! clone drops, the wrapper removes its identity entry and, if it owns a
//! native reference, hands the handle to the [`NativeReleaser`].

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use log::trace;
use nativebind_core::{NativeHandle, ObjectKind};

use crate::class_registry::{NativeClass, WrapperPayload};
use crate::identity::IdentityTable;

/// Releases native references held by wrappers.
pub trait NativeReleaser: Send + Sync {
    /// Drop one reference to (or free) the instance behind `handle`.
    fn release(&self, handle: NativeHandle, class: &NativeClass);
}

pub(crate) struct WrapperInner {
    handle: NativeHandle,
    class: Arc<NativeClass>,
    owned: AtomicBool,
    payload: Option<WrapperPayload>,
    releaser: Option<Arc<dyn NativeReleaser>>,
    identities: Weak<IdentityTable>,
}

impl Drop for WrapperInner {
    fn drop(&mut self) {
        if let Some(table) = self.identities.upgrade() {
            table.forget(self.handle);
        }
        if self.owned.load(Ordering::Acquire) {
            match &self.releaser {
                Some(releaser) => releaser.release(self.handle, &self.class),
                None => trace!("no releaser for owned {} {}", self.class.type_name, self.handle),
            }
        }
    }
}

/// A managed object standing for one native instance.
///
/// Equality is identity: two wrappers are equal only if they are clones of
/// the same wrapper.
#[derive(Clone)]
pub struct ManagedWrapper(Arc<WrapperInner>);

impl ManagedWrapper {
    pub(crate) fn new(
        handle: NativeHandle,
        class: Arc<NativeClass>,
        owned: bool,
        releaser: Option<Arc<dyn NativeReleaser>>,
        identities: Weak<IdentityTable>,
    ) -> Self {
        let payload = class.make_payload(handle);
        Self(Arc::new(WrapperInner {
            handle,
            class,
            owned: AtomicBool::new(owned),
            payload,
            releaser,
            identities,
        }))
    }

    pub fn handle(&self) -> NativeHandle {
        self.0.handle
    }

    /// The registered class this wrapper was created for.
    pub fn class(&self) -> &Arc<NativeClass> {
        &self.0.class
    }

    pub fn kind(&self) -> ObjectKind {
        self.0.class.kind
    }

    pub fn type_name(&self) -> &str {
        &self.0.class.type_name
    }

    /// Whether dropping the wrapper releases a native reference.
    pub fn is_owned(&self) -> bool {
        self.0.owned.load(Ordering::Acquire)
    }

    /// Take ownership of one native reference.
    ///
    /// Returns `false` if the wrapper already owned one.
    pub(crate) fn adopt_reference(&self) -> bool {
        !self.0.owned.swap(true, Ordering::AcqRel)
    }

    /// Managed state created by the class's payload factory.
    pub fn payload<T: Any>(&self) -> Option<&T> {
        self.0.payload.as_ref()?.downcast_ref::<T>()
    }

    /// Whether both wrappers are the same managed object.
    pub fn same_as(&self, other: &ManagedWrapper) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Number of live clones of this wrapper.
    pub fn strong_count(&self) -> usize {
        Arc::strong_count(&self.0)
    }

    pub(crate) fn downgrade(&self) -> Weak<WrapperInner> {
        Arc::downgrade(&self.0)
    }

    pub(crate) fn from_inner(inner: Arc<WrapperInner>) -> Self {
        Self(inner)
    }
}

impl PartialEq for ManagedWrapper {
    fn eq(&self, other: &Self) -> bool {
        self.same_as(other)
    }
}

impl Eq for ManagedWrapper {}

impl fmt::Debug for ManagedWrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagedWrapper")
            .field("type_name", &self.type_name())
            .field("handle", &self.handle())
            .field("owned", &self.is_owned())
            .finish()
    }
}
