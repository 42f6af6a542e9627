//! The native call dispatcher contract.
//!
//! The runtime never performs calling-convention mechanics or touches native
//! memory itself. Everything crosses through a [`NativeDispatcher`]:
//!
//! ```text
//! call(library, symbol, args, returns)   blocking native call
//! read(handle, descriptor, offset)       load one value
//! write(handle, descriptor, offset, v)   store one value
//! alloc(size, type_name?, library?)      zeroed allocation
//! release(handle, kind, hooks)           drop one reference / free
//! ```
//!
//! Offsets passed to `read` and `write` come from the layout calculator.

use nativebind_core::{DispatchError, FfiDescriptor, NativeHandle, ObjectKind, RefHooks};
use nativebind_registry::TypeIntrospector;

use crate::value::Value;

/// Library exporting the GLib helpers the runtime calls itself.
pub const GLIB_LIBRARY: &str = "libglib-2.0.so.0";

/// One argument of a native call.
#[derive(Debug, Clone, PartialEq)]
pub struct NativeArg {
    pub descriptor: FfiDescriptor,
    pub value: Value,
    /// The caller may have omitted the value; a null/zero default is passed.
    pub optional: bool,
}

impl NativeArg {
    pub fn new(descriptor: FfiDescriptor, value: Value) -> Self {
        Self {
            descriptor,
            value,
            optional: false,
        }
    }

    pub fn optional(mut self, optional: bool) -> Self {
        self.optional = optional;
        self
    }
}

/// Executes native calls and accesses native memory.
///
/// The dispatcher is also the runtime type system: it reports the runtime
/// type name of live instances and the parent of each type name.
pub trait NativeDispatcher: TypeIntrospector {
    /// Call `symbol` from `library`. Blocks until the native returns.
    fn call(
        &self,
        library: &str,
        symbol: &str,
        args: &[NativeArg],
        returns: &FfiDescriptor,
    ) -> Result<Value, DispatchError>;

    /// Read the value described by `descriptor` at `handle + offset`.
    fn read(
        &self,
        handle: NativeHandle,
        descriptor: &FfiDescriptor,
        offset: usize,
    ) -> Result<Value, DispatchError>;

    /// Write `value` as described by `descriptor` at `handle + offset`.
    fn write(
        &self,
        handle: NativeHandle,
        descriptor: &FfiDescriptor,
        offset: usize,
        value: &Value,
    ) -> Result<(), DispatchError>;

    /// Allocate `size` zeroed bytes.
    ///
    /// With a type name, the allocation is registered as an instance of that
    /// runtime type so later type queries on the handle succeed.
    fn alloc(
        &self,
        size: usize,
        type_name: Option<&str>,
        library: Option<&str>,
    ) -> Result<NativeHandle, DispatchError>;

    /// Drop one native reference to `handle`, freeing it at zero.
    ///
    /// Fundamental types release through their custom hooks.
    fn release(
        &self,
        handle: NativeHandle,
        kind: ObjectKind,
        hooks: Option<&RefHooks>,
    ) -> Result<(), DispatchError>;

    /// Width of native pointers in bytes.
    fn pointer_size(&self) -> usize {
        size_of::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nativebind_core::Ownership;

    #[test]
    fn native_args_default_to_required() {
        let arg = NativeArg::new(FfiDescriptor::object(Ownership::None), Value::Null);
        assert!(!arg.optional);
        assert!(arg.optional(true).optional);
    }
}
