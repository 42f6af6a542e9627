//! Core types for nativebind.
//!
//! This crate holds everything the compiler, the identity registry and the
//! runtime share:
//!
//! - [`model`]: the normalized interface model (input, produced externally)
//! - [`FfiDescriptor`]: how one value crosses the native boundary
//! - [`PrimitiveKind`]: primitive kinds and the fixed size table
//! - [`ObjectKind`] and [`Ownership`]: wrapper kinds and transfer annotations
//! - [`TypeHash`]: deterministic keys for native type names
//! - [`BindingOptions`]: compile/runtime options
//! - the error taxonomy, unified by [`BindError`]

mod descriptor;
mod error;
mod flags;
mod handle;
pub mod model;
mod object_kind;
mod options;
mod ownership;
mod primitive_kind;
mod type_hash;

pub use descriptor::{ArrayLength, FfiDescriptor, RefHooks, Trampoline};
pub use error::{
    AsyncError, BindError, DispatchError, IdentityError, MappingError, MarshalError,
    NativeCallError, RegistrationError,
};
pub use flags::ArgFlags;
pub use handle::NativeHandle;
pub use object_kind::ObjectKind;
pub use options::BindingOptions;
pub use ownership::Ownership;
pub use primitive_kind::{PrimitiveKind, is_string_type};
pub use type_hash::TypeHash;

/// Result alias for operations that fail with [`BindError`].
pub type BindResult<T> = Result<T, BindError>;
