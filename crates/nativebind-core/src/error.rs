//! Unified error types for nativebind.
//!
//! One error type per phase, unified by [`BindError`]:
//!
//! ```text
//! BindError (top-level wrapper)
//! ├── MappingError      - unsupported schema shapes (compile time, recovered by skipping)
//! ├── RegistrationError - class table registration errors
//! ├── IdentityError     - wrapping a handle whose runtime type cannot be resolved
//! ├── DispatchError     - failures inside the native call dispatcher
//! ├── MarshalError      - managed values that do not fit a descriptor or layout
//! ├── NativeCallError   - a throwing native reported failure
//! └── AsyncError        - async operation completed without a result
//! ```

use thiserror::Error;

use crate::NativeHandle;

// ============================================================================
// Mapping Errors
// ============================================================================

/// A schema element the type mapper cannot represent.
///
/// Never surfaced at runtime: the compile pass records the enclosing
/// callable, field or signal as skipped and continues.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MappingError {
    /// A type name does not resolve to any declaration.
    #[error("unresolved type '{name}'")]
    UnresolvedType { name: String },

    /// The callable takes C varargs or a `va_list`.
    #[error("callable '{symbol}' is variadic")]
    VariadicCallable { symbol: String },

    /// A callback type with a variadic signature.
    #[error("callback '{name}' has a variadic signature")]
    VariadicCallback { name: String },

    /// A container type the binding contract has no descriptor for.
    #[error("unsupported container type '{name}'")]
    UnsupportedContainer { name: String },

    /// Arrays whose elements are arrays.
    #[error("nested arrays are not supported")]
    NestedArray,

    /// An output reference to a type that cannot be passed by reference.
    #[error("unsupported reference to {inner}")]
    UnsupportedReference { inner: String },

    /// A type used in a position where it has no representation.
    #[error("type '{type_name}' cannot be used as {context}")]
    UnsupportedInContext {
        type_name: String,
        context: &'static str,
    },

    /// A closure, destroy or length index points outside the parameter list.
    #[error("parameter index {index} out of range ({count} parameters)")]
    InvalidParamIndex { index: usize, count: usize },

    /// The namespace to compile is not part of the repository.
    #[error("unknown namespace '{0}'")]
    UnknownNamespace(String),
}

// ============================================================================
// Registration Errors
// ============================================================================

/// Errors raised while populating the class table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistrationError {
    /// A wrapper class with this native type name is already registered.
    #[error("duplicate registration: class '{0}' is already registered")]
    DuplicateClass(String),

    /// A class was registered without a native type name.
    #[error("class registered with an empty type name")]
    EmptyTypeName,
}

// ============================================================================
// Identity Errors
// ============================================================================

/// Errors raised while resolving a wrapper for a native handle.
///
/// These indicate the binding surface is incomplete, not a user error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    /// The native type system does not know the handle's runtime type.
    #[error("cannot determine the runtime type of {0}")]
    UnknownRuntimeType(NativeHandle),

    /// Neither the runtime type nor any ancestor has a registered wrapper.
    #[error("no wrapper registered for '{type_name}' or any ancestor (searched: {})", searched.join(" -> "))]
    UnregisteredType {
        type_name: String,
        searched: Vec<String>,
    },

    /// An explicitly requested target class is not registered.
    #[error("target class '{0}' is not registered")]
    UnknownClass(String),
}

// ============================================================================
// Dispatch Errors
// ============================================================================

/// Errors raised by a native call dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// The library could not be found or loaded.
    #[error("library not found: '{0}'")]
    LibraryNotFound(String),

    /// The symbol does not exist in the library.
    #[error("symbol '{symbol}' not found in '{library}'")]
    SymbolNotFound { library: String, symbol: String },

    /// The handle does not point into any live allocation.
    #[error("invalid handle {0}")]
    InvalidHandle(NativeHandle),

    /// An access would cross the end of its allocation.
    #[error("access of {size} bytes at offset {offset} is out of bounds for {handle}")]
    OutOfBounds {
        handle: NativeHandle,
        offset: usize,
        size: usize,
    },

    /// A value does not match its descriptor.
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    /// The argument list does not match the native signature.
    #[error("'{symbol}' expects {expected} arguments, got {actual}")]
    ArgumentCount {
        symbol: String,
        expected: usize,
        actual: usize,
    },

    /// The dispatcher cannot handle this descriptor.
    #[error("unsupported descriptor: {0}")]
    Unsupported(String),
}

// ============================================================================
// Marshal Errors
// ============================================================================

/// Errors converting managed values through call plans and record layouts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MarshalError {
    /// A required caller argument was not supplied.
    #[error("missing argument '{0}'")]
    MissingArgument(String),

    /// Too many caller arguments were supplied.
    #[error("'{callable}' takes {expected} arguments, got {actual}")]
    TooManyArguments {
        callable: String,
        expected: usize,
        actual: usize,
    },

    /// The record type is not part of the repository.
    #[error("unknown record '{0}'")]
    UnknownRecord(String),

    /// The record has no field with this name.
    #[error("record '{record}' has no field '{field}'")]
    UnknownField { record: String, field: String },

    /// The record exposes no field-addressable layout.
    #[error("record '{0}' is opaque")]
    OpaqueRecord(String),

    /// The field cannot be accessed in this direction.
    #[error("field '{record}.{field}' is not {access}")]
    FieldAccess {
        record: String,
        field: String,
        access: &'static str,
    },

    /// The instance argument was missing or not a native value.
    #[error("method '{0}' requires an instance")]
    MissingInstance(String),

    /// No compiled callable with this name.
    #[error("unknown callable '{0}'")]
    UnknownCallable(String),

    /// The qualified name is not a registered class or record.
    #[error("unknown type '{0}'")]
    UnknownType(String),

    /// A managed value that cannot be converted to the expected descriptor.
    #[error("expected {expected} for '{name}', got {actual}")]
    InvalidValue {
        name: String,
        expected: &'static str,
        actual: &'static str,
    },
}

// ============================================================================
// Native Call Errors
// ============================================================================

/// Failure reported by a throwing native through its error output parameter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{domain} ({code}): {message}")]
pub struct NativeCallError {
    /// Error domain name.
    pub domain: String,
    /// Domain-specific error code.
    pub code: i32,
    /// Native message.
    pub message: String,
}

impl NativeCallError {
    /// Create a native call error.
    pub fn new(domain: impl Into<String>, code: i32, message: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            code,
            message: message.into(),
        }
    }
}

// ============================================================================
// Async Errors
// ============================================================================

/// Errors completing an adapted start/finish operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AsyncError {
    /// The native side released the ready callback without invoking it.
    #[error("async operation '{0}' was dropped before completion")]
    CompletionDropped(String),

    /// The ready callback delivered no result token.
    #[error("async operation '{0}' completed without a result token")]
    MissingResultToken(String),
}

// ============================================================================
// Unified Error Type
// ============================================================================

/// The unified error type for nativebind operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BindError {
    #[error(transparent)]
    Mapping(#[from] MappingError),

    #[error(transparent)]
    Registration(#[from] RegistrationError),

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Marshal(#[from] MarshalError),

    #[error(transparent)]
    Native(#[from] NativeCallError),

    #[error(transparent)]
    Async(#[from] AsyncError),
}

impl BindError {
    /// Check if this is an identity-resolution error.
    pub fn is_identity(&self) -> bool {
        matches!(self, BindError::Identity(_))
    }

    /// Check if this is an error reported by a throwing native.
    pub fn is_native(&self) -> bool {
        matches!(self, BindError::Native(_))
    }

    /// Check if this is a dispatcher error.
    pub fn is_dispatch(&self) -> bool {
        matches!(self, BindError::Dispatch(_))
    }

    /// Check if this is an async completion error.
    pub fn is_async(&self) -> bool {
        matches!(self, BindError::Async(_))
    }

    /// The native error, when this is one.
    pub fn as_native(&self) -> Option<&NativeCallError> {
        match self {
            BindError::Native(e) => Some(e),
            _ => None,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
