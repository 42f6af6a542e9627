//! Opaque native pointer values.

use std::fmt;

/// An opaque native pointer.
///
/// Never dereferenced by the mapper or layout code; only the dispatcher
/// touches the memory behind it, at offsets computed by the layout calculator.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[repr(transparent)]
pub struct NativeHandle(usize);

impl NativeHandle {
    /// The null pointer.
    pub const NULL: NativeHandle = NativeHandle(0);

    /// Create a handle from a raw address.
    #[inline]
    pub const fn from_addr(addr: usize) -> Self {
        Self(addr)
    }

    /// The raw address.
    #[inline]
    pub const fn addr(self) -> usize {
        self.0
    }

    /// Whether this is the null pointer.
    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    /// A handle `bytes` past this one, or `None` on overflow.
    #[inline]
    pub fn offset(self, bytes: usize) -> Option<Self> {
        self.0.checked_add(bytes).map(Self)
    }
}

impl fmt::Debug for NativeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeHandle({:#x})", self.0)
    }
}

impl fmt::Display for NativeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_handle() {
        assert!(NativeHandle::NULL.is_null());
        assert!(!NativeHandle::from_addr(0x10).is_null());
    }

    #[test]
    fn offsets() {
        let base = NativeHandle::from_addr(0x1000);
        assert_eq!(base.offset(8), Some(NativeHandle::from_addr(0x1008)));
        assert_eq!(NativeHandle::from_addr(usize::MAX).offset(1), None);
    }
}
