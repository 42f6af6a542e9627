//! Options controlling binding compilation and runtime marshaling.

/// Binding options.
///
/// ```
/// use nativebind_core::BindingOptions;
///
/// let options = BindingOptions::default().with_pointer_size(4).skip_deprecated();
/// assert_eq!(options.pointer_size, 4);
/// assert!(options.skip_deprecated);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingOptions {
    /// Pointer width in bytes of the native target.
    pub pointer_size: usize,
    /// Exclude callables marked deprecated.
    pub skip_deprecated: bool,
    /// Compile callables marked as not introspectable.
    pub include_unintrospectable: bool,
}

impl Default for BindingOptions {
    fn default() -> Self {
        Self {
            pointer_size: std::mem::size_of::<usize>(),
            skip_deprecated: false,
            include_unintrospectable: false,
        }
    }
}

impl BindingOptions {
    /// Set the pointer width.
    pub fn with_pointer_size(mut self, pointer_size: usize) -> Self {
        self.pointer_size = pointer_size;
        self
    }

    /// Exclude deprecated callables.
    pub fn skip_deprecated(mut self) -> Self {
        self.skip_deprecated = true;
        self
    }

    /// Compile callables marked as not introspectable.
    pub fn include_unintrospectable(mut self) -> Self {
        self.include_unintrospectable = true;
        self
    }
}
