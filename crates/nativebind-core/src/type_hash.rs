//! Deterministic hash-based identity for native type names.
//!
//! [`TypeHash`] is a 64-bit hash computed from a native runtime type name
//! (`GtkWidget`, `GObject`). Hashes are computed before registration, so the
//! class table is keyed without registration-order dependencies and callers
//! holding only a hash can still look a class up.
//!
//! # Examples
//!
//! ```
//! use nativebind_core::TypeHash;
//!
//! let widget = TypeHash::from_name("GtkWidget");
//! assert_eq!(widget, TypeHash::from_name("GtkWidget"));
//! assert_ne!(widget, TypeHash::from_name("GtkButton"));
//! ```

use std::fmt;
use xxhash_rust::xxh64::xxh64;

/// Domain marker mixed into every type hash.
const TYPE_DOMAIN: u64 = 0x2fac10b63a6cc57c;

/// A deterministic 64-bit hash identifying a native type.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct TypeHash(pub u64);

impl TypeHash {
    /// Empty/invalid hash constant.
    pub const EMPTY: TypeHash = TypeHash(0);

    /// Create a type hash from a native type name.
    #[inline]
    pub fn from_name(name: &str) -> Self {
        TypeHash(TYPE_DOMAIN ^ xxh64(name.as_bytes(), 0))
    }

    /// Check if this is an empty/invalid hash.
    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Get the underlying u64 value.
    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for TypeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeHash({:#018x})", self.0)
    }
}

impl fmt::Display for TypeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_hash_determinism() {
        assert_eq!(
            TypeHash::from_name("GObject.Object"),
            TypeHash::from_name("GObject.Object")
        );
    }

    #[test]
    fn type_hash_uniqueness() {
        let names = ["Gtk.Widget", "Gtk.Button", "GObject.Object", "Gio.File"];
        for (i, a) in names.iter().enumerate() {
            for b in &names[i + 1..] {
                assert_ne!(TypeHash::from_name(a), TypeHash::from_name(b));
            }
        }
    }

    #[test]
    fn empty_hash() {
        assert!(TypeHash::EMPTY.is_empty());
        assert!(!TypeHash::from_name("x").is_empty());
    }

    #[test]
    fn hash_display() {
        let display = format!("{}", TypeHash(0x1234));
        assert_eq!(display, "0x0000000000001234");
        assert_eq!(format!("{:?}", TypeHash(0x1234)), "TypeHash(0x0000000000001234)");
    }
}
