//! Object identity registry.
//!
//! Maps native handles to managed wrappers so that the same live native
//! instance is always represented by the same managed object, and resolves
//! which registered wrapper class to use for a handle whose runtime type
//! has no wrapper of its own.
//!
//! ## Architecture
//!
//! ```text
//! ObjectRegistry
//! ├── ClassRegistry      type name → NativeClass (RwLock)
//! ├── IdentityTable      handle → Weak<wrapper> (Mutex)
//! ├── TypeIntrospector   runtime type and parent queries
//! └── NativeReleaser     drops owned references on finalization
//! ```
//!
//! [`TypeHierarchy`] is a schema-derived [`ParentLookup`] for runtimes that
//! cannot answer parent queries on their own.

mod class_registry;
mod hierarchy;
mod identity;
mod introspect;
mod object_registry;
mod wrapper;

pub use class_registry::{ClassRegistry, NativeClass, PayloadFactory, WrapperPayload};
pub use hierarchy::{HierarchyEdge, TypeHierarchy};
pub use identity::IdentityTable;
pub use introspect::{NoIntrospection, ParentLookup, TypeIntrospector};
pub use object_registry::ObjectRegistry;
pub use wrapper::{ManagedWrapper, NativeReleaser};
