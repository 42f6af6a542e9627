//! Type references as they appear in the interface model.

use serde::{Deserialize, Serialize};

use crate::Ownership;

/// A reference to a schema type from a parameter, return value or field.
///
/// Immutable once produced by the interface model. `name` is either a local
/// name (resolved against the namespace under compilation), a qualified name
/// (`Gio.File`), or a fundamental spelling (`gint`, `utf8`, `none`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeRef {
    /// Schema type name.
    pub name: String,
    /// C-level spelling, e.g. `GtkWidget*` or `const gchar*`.
    #[serde(default)]
    pub c_type: Option<String>,
    /// Array shape, when this reference denotes an array.
    #[serde(default)]
    pub array: Option<ArrayShape>,
    /// Whether `NULL` is an accepted/possible value.
    #[serde(default)]
    pub nullable: bool,
    /// Ownership transfer annotation.
    #[serde(default)]
    pub transfer: Ownership,
}

impl TypeRef {
    /// A reference to a named type with no modifiers.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            c_type: None,
            array: None,
            nullable: false,
            transfer: Ownership::None,
        }
    }

    /// The `none` (void) type.
    pub fn void() -> Self {
        Self::named("none")
    }

    /// A C array of `element` with the given shape parameters.
    pub fn array_of(element: TypeRef, shape: ArrayShape) -> Self {
        Self {
            name: "array".to_string(),
            c_type: None,
            array: Some(ArrayShape {
                element: Box::new(element),
                ..shape
            }),
            nullable: false,
            transfer: Ownership::None,
        }
    }

    /// Set the C-level spelling.
    pub fn with_c_type(mut self, c_type: impl Into<String>) -> Self {
        self.c_type = Some(c_type.into());
        self
    }

    /// Set the ownership transfer.
    pub fn with_transfer(mut self, transfer: Ownership) -> Self {
        self.transfer = transfer;
        self
    }

    /// Mark as nullable.
    pub fn as_nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Whether this is the void type.
    pub fn is_void(&self) -> bool {
        self.array.is_none() && matches!(self.name.as_str(), "none" | "void")
    }

    /// Whether this reference denotes an array.
    pub fn is_array(&self) -> bool {
        self.array.is_some()
    }

    /// Whether the C spelling says this is held through a pointer.
    ///
    /// References without a C spelling are treated as pointers unless they
    /// are resolved as inline by the caller (records default to pointer use).
    pub fn is_pointer(&self) -> bool {
        self.c_type.as_deref().is_none_or(|c| c.contains('*'))
    }

    /// Whether the C spelling explicitly contains a pointer.
    pub fn is_pointer_spelled(&self) -> bool {
        self.c_type.as_deref().is_some_and(|c| c.contains('*'))
    }

    /// Whether the C spelling explicitly marks an inline (by-value) use.
    pub fn is_inline(&self) -> bool {
        self.c_type.as_deref().is_some_and(|c| !c.contains('*'))
    }

    /// Split a qualified name into `(namespace, local_name)`.
    pub fn split_qualified(&self) -> (Option<&str>, &str) {
        split_qualified(&self.name)
    }
}

/// Split `Ns.Name` into `(Some("Ns"), "Name")`; unqualified names yield `(None, name)`.
pub fn split_qualified(name: &str) -> (Option<&str>, &str) {
    match name.split_once('.') {
        Some((ns, local)) if !ns.is_empty() && !local.is_empty() => (Some(ns), local),
        _ => (None, name),
    }
}

/// Container flavour of an array type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArrayKind {
    /// Plain C array.
    #[default]
    C,
    /// `GArray`.
    Array,
    /// `GPtrArray`.
    PtrArray,
    /// `GByteArray`.
    ByteArray,
}

/// Shape of an array type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArrayShape {
    /// Element type.
    pub element: Box<TypeRef>,
    /// Container flavour.
    #[serde(default)]
    pub kind: ArrayKind,
    /// Number of elements for fixed-size arrays.
    #[serde(default)]
    pub fixed_size: Option<usize>,
    /// Index of the parameter carrying the element count.
    #[serde(default)]
    pub length_param: Option<usize>,
    /// Whether the array is terminated by a zero element.
    #[serde(default)]
    pub zero_terminated: bool,
}

impl ArrayShape {
    /// A zero-terminated C array of `element`.
    pub fn zero_terminated(element: TypeRef) -> Self {
        Self {
            element: Box::new(element),
            kind: ArrayKind::C,
            fixed_size: None,
            length_param: None,
            zero_terminated: true,
        }
    }

    /// A fixed-size C array of `element`.
    pub fn fixed(element: TypeRef, size: usize) -> Self {
        Self {
            element: Box::new(element),
            kind: ArrayKind::C,
            fixed_size: Some(size),
            length_param: None,
            zero_terminated: false,
        }
    }

    /// A C array of `element` whose length travels in parameter `index`.
    pub fn with_length_param(element: TypeRef, index: usize) -> Self {
        Self {
            element: Box::new(element),
            kind: ArrayKind::C,
            fixed_size: None,
            length_param: Some(index),
            zero_terminated: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn void_detection() {
        assert!(TypeRef::void().is_void());
        assert!(TypeRef::named("void").is_void());
        assert!(!TypeRef::named("gint").is_void());
    }

    #[test]
    fn pointer_detection() {
        assert!(TypeRef::named("Gdk.Rectangle").is_pointer());
        assert!(TypeRef::named("Gdk.Rectangle").with_c_type("GdkRectangle*").is_pointer());
        assert!(!TypeRef::named("Gdk.Rectangle").with_c_type("GdkRectangle").is_pointer());
        assert!(TypeRef::named("Gdk.Rectangle").with_c_type("GdkRectangle").is_inline());
    }

    #[test]
    fn qualified_names() {
        assert_eq!(split_qualified("Gio.File"), (Some("Gio"), "File"));
        assert_eq!(split_qualified("File"), (None, "File"));
        assert_eq!(split_qualified(".File"), (None, ".File"));
    }

    #[test]
    fn array_constructor_moves_element() {
        let array = TypeRef::array_of(
            TypeRef::named("utf8"),
            ArrayShape::zero_terminated(TypeRef::void()),
        );
        let shape = array.array.as_ref().unwrap();
        assert_eq!(shape.element.name, "utf8");
        assert!(shape.zero_terminated);
        assert!(array.is_array());
        assert!(!array.is_void());
    }

    #[test]
    fn deserializes_with_defaults() {
        let json = r#"{ "name": "gint" }"#;
        let ty: TypeRef = serde_json::from_str(json).unwrap();
        assert_eq!(ty, TypeRef::named("gint"));
    }
}
