//! Handle-to-wrapper resolution.
//!
//! ## Architecture
//!
//! ```text
//! wrap(handle, target, ownership)
//!   ├── null            → None
//!   ├── identity table  → existing wrapper (ownership reconciled)
//!   ├── target class    → explicit, or runtime type + parent walk
//!   └── new wrapper     → registered in the table unless a plain struct
//! ```
//!
//! Wrapping the same live identity-bearing instance twice yields the same
//! [`ManagedWrapper`]. Plain structs are value copies and always wrap fresh.

use std::sync::Arc;

use log::{debug, trace};
use nativebind_core::{IdentityError, NativeHandle, Ownership, RegistrationError};

use crate::class_registry::{ClassRegistry, NativeClass};
use crate::identity::IdentityTable;
use crate::introspect::TypeIntrospector;
use crate::wrapper::{ManagedWrapper, NativeReleaser};

/// Class table, identity table and the runtime type queries that tie them together.
pub struct ObjectRegistry {
    classes: ClassRegistry,
    identities: Arc<IdentityTable>,
    introspector: Arc<dyn TypeIntrospector>,
    releaser: Option<Arc<dyn NativeReleaser>>,
}

impl ObjectRegistry {
    pub fn new(introspector: Arc<dyn TypeIntrospector>) -> Self {
        Self {
            classes: ClassRegistry::new(),
            identities: Arc::new(IdentityTable::new()),
            introspector,
            releaser: None,
        }
    }

    /// Release owned references through `releaser` when wrappers are finalized.
    pub fn with_releaser(mut self, releaser: Arc<dyn NativeReleaser>) -> Self {
        self.releaser = Some(releaser);
        self
    }

    pub fn classes(&self) -> &ClassRegistry {
        &self.classes
    }

    pub fn identities(&self) -> &IdentityTable {
        &self.identities
    }

    pub fn introspector(&self) -> &dyn TypeIntrospector {
        self.introspector.as_ref()
    }

    // ==========================================================================
    // Class table
    // ==========================================================================

    /// Register the wrapper class for one native type name.
    pub fn register_class(&self, class: NativeClass) -> Result<Arc<NativeClass>, RegistrationError> {
        self.classes.register(class)
    }

    /// Class registered under exactly `type_name`.
    pub fn get_class(&self, type_name: &str) -> Option<Arc<NativeClass>> {
        self.classes.get(type_name)
    }

    /// Class for `type_name`, walking ancestors when `walk_parents` is set.
    pub fn find_class(&self, type_name: &str, walk_parents: bool) -> Option<Arc<NativeClass>> {
        self.classes.find(type_name, walk_parents, self.introspector.as_ref())
    }

    // ==========================================================================
    // Identity table
    // ==========================================================================

    /// Record `wrapper` as the managed object for its handle.
    pub fn register_object(&self, wrapper: &ManagedWrapper) {
        self.identities.register(wrapper);
    }

    /// Live wrapper for `handle`.
    pub fn find_object(&self, handle: NativeHandle) -> Option<ManagedWrapper> {
        self.identities.lookup(handle)
    }

    // ==========================================================================
    // Wrapping
    // ==========================================================================

    /// Managed wrapper for `handle`.
    ///
    /// With `target` set, the named class is used as is; otherwise the class
    /// is resolved from the handle's runtime type and its ancestors. A
    /// full-transfer handle hands one native reference to the wrapper: a
    /// borrowed existing wrapper adopts it, an owning one releases the
    /// duplicate immediately.
    pub fn wrap(
        &self,
        handle: NativeHandle,
        target: Option<&str>,
        ownership: Ownership,
    ) -> Result<Option<ManagedWrapper>, IdentityError> {
        if handle.is_null() {
            return Ok(None);
        }

        let target = target
            .map(|name| {
                self.classes
                    .get(name)
                    .ok_or_else(|| IdentityError::UnknownClass(name.to_string()))
            })
            .transpose()?;

        let keeps_identity = target
            .as_ref()
            .is_none_or(|class| class.kind.uses_identity_table());
        if keeps_identity {
            if let Some(existing) = self.identities.lookup(handle) {
                self.reconcile(&existing, ownership);
                trace!("reused wrapper for {} {handle}", existing.type_name());
                return Ok(Some(existing));
            }
        }

        let class = match target {
            Some(class) => class,
            None => self.class_of(handle)?,
        };

        let wrapper = ManagedWrapper::new(
            handle,
            Arc::clone(&class),
            ownership == Ownership::Full,
            self.releaser.clone(),
            Arc::downgrade(&self.identities),
        );
        if class.kind.uses_identity_table() {
            self.identities.register(&wrapper);
        }
        trace!("wrapped {handle} as {} ({})", class.type_name, class.kind);
        Ok(Some(wrapper))
    }

    fn class_of(&self, handle: NativeHandle) -> Result<Arc<NativeClass>, IdentityError> {
        let type_name = self
            .introspector
            .runtime_type_of(handle)
            .ok_or(IdentityError::UnknownRuntimeType(handle))?;
        self.classes.resolve(&type_name, self.introspector.as_ref())
    }

    fn reconcile(&self, existing: &ManagedWrapper, ownership: Ownership) {
        if ownership != Ownership::Full || existing.adopt_reference() {
            return;
        }
        match &self.releaser {
            Some(releaser) => {
                debug!(
                    "releasing duplicate reference to {} {}",
                    existing.type_name(),
                    existing.handle()
                );
                releaser.release(existing.handle(), existing.class());
            }
            None => trace!("no releaser for duplicate reference to {}", existing.handle()),
        }
    }
}

impl std::fmt::Debug for ObjectRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectRegistry")
            .field("classes", &self.classes.len())
            .field("identities", &self.identities)
            .field("has_releaser", &self.releaser.is_some())
            .finish()
    }
}
