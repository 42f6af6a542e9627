//! Binding core for GObject-style native object systems.
//!
//! Compiles a normalized interface schema into FFI call descriptors and
//! struct layouts, and marshals managed values through them at runtime while
//! preserving native object identity.
//!
//! ## Architecture
//!
//! ```text
//! Repository (schema)
//!      │
//!      ▼
//! nativebind-compiler ──► CompiledNamespace (CallPlan, AsyncPlan, layouts, skip report)
//!      │
//!      ▼
//! Runtime ──► NativeDispatcher (call / read / write / alloc / release)
//!      │
//!      ▼
//! nativebind-registry ──► ManagedWrapper (identity-preserving)
//! ```
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use nativebind::{InProcessDispatcher, Runtime, Value};
//! use nativebind::model::Repository;
//!
//! let repo = Repository::from_json(r#"{ "namespaces": [{
//!     "name": "Demo", "shared_libraries": ["libdemo.so"],
//!     "functions": [{
//!         "name": "add", "c_symbol": "demo_add",
//!         "params": [
//!             { "name": "a", "type": { "name": "gint" } },
//!             { "name": "b", "type": { "name": "gint" } }
//!         ],
//!         "return_type": { "name": "gint" }
//!     }]
//! }] }"#).unwrap();
//!
//! let natives = Arc::new(InProcessDispatcher::new());
//! natives.define_symbol("libdemo.so", "demo_add", |call| {
//!     Ok(Value::Int(call.int(0)? + call.int(1)?))
//! });
//!
//! let runtime = Runtime::new(Arc::new(repo), natives);
//! let sum = runtime.call_function("Demo", "add", &[2.into(), 3.into()]).unwrap();
//! assert_eq!(sum.value, Value::Int(5));
//! ```

pub mod dispatcher;
pub mod in_process;
pub mod runtime;
pub mod value;

pub use dispatcher::{GLIB_LIBRARY, NativeArg, NativeDispatcher};
pub use in_process::{InProcessDispatcher, NativeCall};
pub use runtime::{CallResult, ClosureTable, Runtime};
pub use value::{Callback, Value};

pub use nativebind_compiler::{
    AsyncPlan, BindingCompiler, CallPlan, CompiledNamespace, FieldLayout, LayoutCalculator,
};
pub use nativebind_core::{
    AsyncError, BindError, BindResult, BindingOptions, DispatchError, FfiDescriptor,
    IdentityError, MarshalError, NativeCallError, NativeHandle, ObjectKind, Ownership,
    PrimitiveKind, model,
};
pub use nativebind_registry::{ManagedWrapper, NativeClass, ObjectRegistry};
