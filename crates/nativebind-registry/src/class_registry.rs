//! Table of registered wrapper classes, keyed by the [`TypeHash`] of their native type name.

use std::any::Any;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use log::{trace, warn};
use nativebind_core::{
    IdentityError, NativeHandle, ObjectKind, RefHooks, RegistrationError, TypeHash,
};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::introspect::ParentLookup;

/// Managed state attached to each wrapper of a class.
pub type WrapperPayload = Box<dyn Any + Send + Sync>;

/// Builds the payload for a freshly wrapped handle.
pub type PayloadFactory = Arc<dyn Fn(NativeHandle) -> WrapperPayload + Send + Sync>;

/// A wrapper class registered for one native type.
#[derive(Clone)]
pub struct NativeClass {
    /// Native runtime type name.
    pub type_name: String,
    /// Key of the class in the class table.
    pub type_hash: TypeHash,
    pub kind: ObjectKind,
    /// Shared library that implements the type.
    pub library: Option<String>,
    /// Ref/unref hooks for fundamental types.
    pub hooks: Option<RefHooks>,
    /// Symbol of the type-id getter.
    pub get_type: Option<String>,
    /// Instance size for plain structs.
    pub size: Option<usize>,
    payload: Option<PayloadFactory>,
}

impl NativeClass {
    pub fn new(type_name: impl Into<String>, kind: ObjectKind) -> Self {
        let type_name = type_name.into();
        Self {
            type_hash: TypeHash::from_name(&type_name),
            type_name,
            kind,
            library: None,
            hooks: None,
            get_type: None,
            size: None,
            payload: None,
        }
    }

    pub fn with_library(mut self, library: impl Into<String>) -> Self {
        self.library = Some(library.into());
        self
    }

    pub fn with_hooks(mut self, hooks: RefHooks) -> Self {
        self.hooks = Some(hooks);
        self
    }

    pub fn with_get_type(mut self, get_type: impl Into<String>) -> Self {
        self.get_type = Some(get_type.into());
        self
    }

    pub fn with_size(mut self, size: usize) -> Self {
        self.size = Some(size);
        self
    }

    /// Attach managed state to every wrapper created for this class.
    pub fn with_payload<F>(mut self, factory: F) -> Self
    where
        F: Fn(NativeHandle) -> WrapperPayload + Send + Sync + 'static,
    {
        self.payload = Some(Arc::new(factory));
        self
    }

    /// Build the payload for `handle`, if the class has a factory.
    pub fn make_payload(&self, handle: NativeHandle) -> Option<WrapperPayload> {
        self.payload.as_ref().map(|factory| factory(handle))
    }
}

impl fmt::Debug for NativeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeClass")
            .field("type_name", &self.type_name)
            .field("kind", &self.kind)
            .field("library", &self.library)
            .field("hooks", &self.hooks)
            .field("has_payload", &self.payload.is_some())
            .finish()
    }
}

/// Registered wrapper classes.
///
/// Registration is rare and lookups are frequent, so the table sits behind
/// a read-write lock.
#[derive(Debug, Default)]
pub struct ClassRegistry {
    classes: RwLock<FxHashMap<TypeHash, Arc<NativeClass>>>,
}

impl ClassRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a wrapper class under its type name.
    pub fn register(&self, class: NativeClass) -> Result<Arc<NativeClass>, RegistrationError> {
        if class.type_name.is_empty() {
            return Err(RegistrationError::EmptyTypeName);
        }
        let mut classes = self.classes.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = classes.get(&class.type_hash) {
            if existing.type_name != class.type_name {
                warn!(
                    "type hash {} of '{}' collides with '{}'",
                    class.type_hash, class.type_name, existing.type_name
                );
            }
            return Err(RegistrationError::DuplicateClass(class.type_name));
        }
        trace!(
            "registered {} class '{}' as {}",
            class.kind, class.type_name, class.type_hash
        );
        let class = Arc::new(class);
        classes.insert(class.type_hash, Arc::clone(&class));
        Ok(class)
    }

    /// Class registered under exactly `type_name`.
    pub fn get(&self, type_name: &str) -> Option<Arc<NativeClass>> {
        self.get_by_hash(TypeHash::from_name(type_name))
    }

    /// Class registered under `hash`.
    pub fn get_by_hash(&self, hash: TypeHash) -> Option<Arc<NativeClass>> {
        self.classes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&hash)
            .cloned()
    }

    /// Class for `type_name`, optionally walking up the parent chain to the
    /// closest registered ancestor.
    pub fn find(
        &self,
        type_name: &str,
        walk_parents: bool,
        parents: &dyn ParentLookup,
    ) -> Option<Arc<NativeClass>> {
        if walk_parents {
            self.resolve(type_name, parents).ok()
        } else {
            self.get(type_name)
        }
    }

    /// Closest registered class for `type_name` or one of its ancestors.
    ///
    /// A cyclic parent chain ends the walk and is reported like a chain
    /// with no registered ancestor.
    pub fn resolve(
        &self,
        type_name: &str,
        parents: &dyn ParentLookup,
    ) -> Result<Arc<NativeClass>, IdentityError> {
        let mut searched = Vec::new();
        let mut visited = FxHashSet::default();
        let mut current = Some(type_name.to_string());

        while let Some(name) = current {
            if !visited.insert(name.clone()) {
                warn!("type hierarchy cycle at '{name}' while resolving '{type_name}'");
                break;
            }
            if let Some(class) = self.get(&name) {
                if name != type_name {
                    trace!("'{type_name}' wrapped as registered ancestor '{name}'");
                }
                return Ok(class);
            }
            current = parents.parent_of(&name);
            searched.push(name);
        }

        Err(IdentityError::UnregisteredType {
            type_name: type_name.to_string(),
            searched,
        })
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.classes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&TypeHash::from_name(type_name))
    }

    pub fn len(&self) -> usize {
        self.classes.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registered type names, sorted.
    pub fn type_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self
            .classes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(|class| class.type_name.clone())
            .collect();
        names.sort_unstable();
        names
    }
}
