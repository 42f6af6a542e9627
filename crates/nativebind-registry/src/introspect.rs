//! Runtime type queries used to resolve wrappers.
//!
//! The identity registry never inspects native memory itself. It asks a
//! [`TypeIntrospector`] for the runtime type name behind a handle and walks
//! parent names through a [`ParentLookup`] until a registered class is found.

use nativebind_core::NativeHandle;

/// Parent lookup over runtime type names.
pub trait ParentLookup {
    /// Direct parent of `type_name`, or `None` at a root or for unknown types.
    fn parent_of(&self, type_name: &str) -> Option<String>;
}

impl<F> ParentLookup for F
where
    F: Fn(&str) -> Option<String>,
{
    fn parent_of(&self, type_name: &str) -> Option<String> {
        self(type_name)
    }
}

/// Query the native type system for the runtime type of a live instance.
pub trait TypeIntrospector: ParentLookup + Send + Sync {
    /// Runtime type name of the instance behind `handle`.
    fn runtime_type_of(&self, handle: NativeHandle) -> Option<String>;
}

/// Introspector that knows no runtime types.
///
/// Wrapping then only succeeds with an explicit target class.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoIntrospection;

impl ParentLookup for NoIntrospection {
    fn parent_of(&self, _type_name: &str) -> Option<String> {
        None
    }
}

impl TypeIntrospector for NoIntrospection {
    fn runtime_type_of(&self, _handle: NativeHandle) -> Option<String> {
        None
    }
}
