//! Wrapper kinds for registered native classes.

use std::fmt;

use serde::{Deserialize, Serialize};

/// How a registered native type is wrapped on the managed side.
///
/// The kind is stored per registered class and switched on explicitly when
/// wrapping handles, rather than being inferred from the handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    /// Reference-counted class instance of the standard object system.
    Gobject,
    /// Record with a registered identity type name, copied via the type system.
    Boxed,
    /// Identity-bearing type with custom ref/unref hooks.
    Fundamental,
    /// Plain fixed-size record without identity.
    Struct,
    /// Interface implemented by some class instance.
    Interface,
}

impl ObjectKind {
    /// Whether wrapping the same pointer twice must return the same wrapper.
    pub const fn preserves_identity(self) -> bool {
        matches!(self, ObjectKind::Gobject | ObjectKind::Fundamental | ObjectKind::Interface)
    }

    /// Whether wrappers of this kind are looked up in the identity table at all.
    ///
    /// Plain structs are value copies and are always wrapped fresh.
    pub const fn uses_identity_table(self) -> bool {
        !matches!(self, ObjectKind::Struct)
    }

    /// Whether the kind is reference counted by the native side.
    pub const fn is_reference_counted(self) -> bool {
        matches!(self, ObjectKind::Gobject | ObjectKind::Fundamental | ObjectKind::Interface)
    }

    /// Get a human-readable name for this kind.
    pub const fn name(self) -> &'static str {
        match self {
            ObjectKind::Gobject => "gobject",
            ObjectKind::Boxed => "boxed",
            ObjectKind::Fundamental => "fundamental",
            ObjectKind::Struct => "struct",
            ObjectKind::Interface => "interface",
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
