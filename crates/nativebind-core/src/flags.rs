//! Per-argument flags of a compiled call.

use bitflags::bitflags;

bitflags! {
    /// Flags attached to one native call argument.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ArgFlags: u8 {
        /// The caller may omit the value; a default (null/zero) is passed.
        const OPTIONAL = 1 << 0;
        /// `NULL` is an accepted value.
        const NULLABLE = 1 << 1;
        /// The value is synthesized by the binding, not supplied by the caller.
        const HIDDEN = 1 << 2;
        /// The slot receives a value from the native side.
        const OUTPUT = 1 << 3;
        /// For output slots: the caller allocates the storage.
        const CALLER_ALLOCATES = 1 << 4;
    }
}

impl ArgFlags {
    /// Whether the caller supplies this argument.
    pub fn is_caller_visible(self) -> bool {
        !self.contains(ArgFlags::HIDDEN)
    }
}
