//! Interface-schema-to-FFI compiler.
//!
//! Turns the normalized interface model into the descriptors and layouts the
//! runtime marshals against.
//!
//! ## Architecture
//!
//! ```text
//! TypeRef ──► TypeMapper ──► FfiDescriptor
//!                │
//! FieldInfo ──► LayoutCalculator ──► FieldLayout / RecordShape
//!                │
//! CallableInfo ──► CallDescriptorBuilder ──► CallPlan ──► AsyncPlan
//!                │
//! Namespace ──► BindingCompiler ──► CompiledNamespace (+ skip report)
//! ```
//!
//! ## Modules
//!
//! - [`mapper`]: type & ownership mapping
//! - [`layout`]: struct layout calculation with a shared size cache
//! - [`call_builder`]: call plans for functions, methods, constructors and signals
//! - [`async_pairing`]: start/finish method pairing
//! - [`passes`]: namespace compilation

pub mod async_pairing;
pub mod call_builder;
pub mod layout;
pub mod mapper;
pub mod passes;

pub use async_pairing::{AsyncPairing, AsyncPlan, find_async_pairs};
pub use call_builder::{
    ArgSource, CallArg, CallDescriptorBuilder, CallPlan, Owner, SignalPlan, VisibleParam,
};
pub use layout::{FieldLayout, LayoutCalculator, RecordShape, TypeLayout, align_up};
pub use mapper::{ERROR_TYPE, Import, MappedType, RUNTIME_MODULE, TypeMapper, UseContext};
pub use passes::{
    BindingCompiler, CompiledClass, CompiledField, CompiledNamespace, CompiledRecord, SkipReason,
    SkippedItem, runtime_type_name,
};

// Re-export MappingError from core for convenience
pub use nativebind_core::MappingError;
