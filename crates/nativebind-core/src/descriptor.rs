//! FFI call descriptors.
//!
//! An [`FfiDescriptor`] tells the dispatcher how one value crosses the native
//! boundary: its representation, its size, and who owns it afterwards. The
//! serialized form is the binding contract other components honor:
//!
//! ```json
//! { "type": "object", "ownership": "full" }
//! { "type": "primitive", "kind": "int32", "size": 4 }
//! { "type": "reference", "inner": { "type": "string", "ownership": "full" } }
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::{ArrayKind, CallbackScope};
use crate::{Ownership, PrimitiveKind};

/// Custom reference-counting hooks of a fundamental type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RefHooks {
    pub ref_fn: String,
    pub unref_fn: String,
}

/// Native calling convention used to invoke a managed callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trampoline {
    /// Generic closure trampoline with trailing user data.
    Closure,
    /// Completion callback of a start/finish async pair.
    AsyncReady,
    /// Destroy notification releasing a closure.
    DestroyNotify,
}

/// How the element count of an array is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArrayLength {
    /// Fixed number of elements.
    Fixed(usize),
    /// Terminated by a zero element.
    ZeroTerminated,
    /// Count carried in the native argument at this index.
    Param(usize),
    /// Count is stored in the container itself (`GArray` and friends).
    Container,
}

/// Descriptor of one value crossing the native boundary.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FfiDescriptor {
    /// Numeric, boolean or raw pointer value.
    Primitive { kind: PrimitiveKind, size: usize },

    /// NUL-terminated string.
    String { ownership: Ownership },

    /// Record with a registered identity type.
    Boxed {
        inner_type: String,
        library: String,
        ownership: Ownership,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        get_type_fn: Option<String>,
    },

    /// Plain fixed-size record without identity.
    Struct {
        inner_type: String,
        library: String,
        size: usize,
        /// Stored by value rather than through a pointer.
        #[serde(default)]
        inline: bool,
        ownership: Ownership,
    },

    /// Class or interface instance.
    Object {
        ownership: Ownership,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        hooks: Option<RefHooks>,
    },

    /// Managed function exposed to native code.
    Callback {
        trampoline: Trampoline,
        params: Vec<FfiDescriptor>,
        result: Box<FfiDescriptor>,
        scope: CallbackScope,
        /// Native argument index of the user-data slot, if any.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user_data_index: Option<usize>,
        /// Native argument index of the destroy-notify slot, if any.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        destroy_index: Option<usize>,
    },

    /// Sequence of elements.
    Array {
        element: Box<FfiDescriptor>,
        ownership: Ownership,
        length: ArrayLength,
        kind: ArrayKind,
        /// Byte stride between consecutive elements.
        element_size: usize,
    },

    /// Output or in-out slot holding the inner value.
    Reference { inner: Box<FfiDescriptor> },

    /// No value (void return).
    Null,
}

impl FfiDescriptor {
    /// A primitive descriptor sized from the fixed size table.
    pub fn primitive(kind: PrimitiveKind, pointer_size: usize) -> Self {
        if kind == PrimitiveKind::Void {
            return FfiDescriptor::Null;
        }
        FfiDescriptor::Primitive {
            kind,
            size: kind.size(pointer_size),
        }
    }

    /// An object descriptor without custom hooks.
    pub fn object(ownership: Ownership) -> Self {
        FfiDescriptor::Object {
            ownership,
            hooks: None,
        }
    }

    /// A reference slot around `inner`.
    pub fn reference(inner: FfiDescriptor) -> Self {
        FfiDescriptor::Reference {
            inner: Box::new(inner),
        }
    }

    /// The ownership carried by this descriptor, if it carries one.
    ///
    /// References report the ownership of their inner value.
    pub fn ownership(&self) -> Option<Ownership> {
        match self {
            FfiDescriptor::String { ownership }
            | FfiDescriptor::Boxed { ownership, .. }
            | FfiDescriptor::Struct { ownership, .. }
            | FfiDescriptor::Object { ownership, .. }
            | FfiDescriptor::Array { ownership, .. } => Some(*ownership),
            FfiDescriptor::Reference { inner } => inner.ownership(),
            FfiDescriptor::Primitive { .. } | FfiDescriptor::Callback { .. } | FfiDescriptor::Null => {
                None
            }
        }
    }

    /// Get the contract tag of this descriptor.
    pub fn kind_name(&self) -> &'static str {
        match self {
            FfiDescriptor::Primitive { .. } => "primitive",
            FfiDescriptor::String { .. } => "string",
            FfiDescriptor::Boxed { .. } => "boxed",
            FfiDescriptor::Struct { .. } => "struct",
            FfiDescriptor::Object { .. } => "object",
            FfiDescriptor::Callback { .. } => "callback",
            FfiDescriptor::Array { .. } => "array",
            FfiDescriptor::Reference { .. } => "reference",
            FfiDescriptor::Null => "null",
        }
    }

    /// Bytes this value occupies when stored in a native slot.
    ///
    /// Everything except primitives and inline structs is pointer-sized.
    pub fn slot_size(&self, pointer_size: usize) -> usize {
        match self {
            FfiDescriptor::Primitive { size, .. } => *size,
            FfiDescriptor::Struct {
                size, inline: true, ..
            } => *size,
            FfiDescriptor::Null => 0,
            _ => pointer_size,
        }
    }

    /// Whether this is the void descriptor.
    pub fn is_null(&self) -> bool {
        matches!(self, FfiDescriptor::Null)
    }

    /// Whether values of this descriptor are wrapped through the identity registry.
    pub fn is_wrapped(&self) -> bool {
        matches!(
            self,
            FfiDescriptor::Object { .. } | FfiDescriptor::Boxed { .. } | FfiDescriptor::Struct { .. }
        )
    }
}

impl fmt::Display for FfiDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FfiDescriptor::Primitive { kind, .. } => write!(f, "{kind}"),
            FfiDescriptor::String { ownership } => write!(f, "string[{ownership}]"),
            FfiDescriptor::Boxed {
                inner_type,
                ownership,
                ..
            } => write!(f, "boxed<{inner_type}>[{ownership}]"),
            FfiDescriptor::Struct {
                inner_type,
                ownership,
                ..
            } => write!(f, "struct<{inner_type}>[{ownership}]"),
            FfiDescriptor::Object { ownership, .. } => write!(f, "object[{ownership}]"),
            FfiDescriptor::Callback { params, result, .. } => {
                write!(f, "callback(")?;
                for (i, p) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{p}")?;
                }
                write!(f, ") -> {result}")
            }
            FfiDescriptor::Array {
                element, ownership, ..
            } => write!(f, "array<{element}>[{ownership}]"),
            FfiDescriptor::Reference { inner } => write!(f, "&{inner}"),
            FfiDescriptor::Null => write!(f, "null"),
        }
    }
}
