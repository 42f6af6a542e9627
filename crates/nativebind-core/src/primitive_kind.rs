//! Primitive kinds and the fixed size table used by the mapper and layout calculator.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Primitive native value kinds.
///
/// Every fundamental scalar spelling in the interface model (`gint`,
/// `guint64`, `gboolean`, `GType`, ...) collapses to one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrimitiveKind {
    Void,
    /// Native boolean, stored as a 32-bit integer.
    Bool,
    Int8,
    Uint8,
    Int16,
    Uint16,
    Int32,
    Uint32,
    Int64,
    Uint64,
    Float,
    Double,
    /// Runtime type identifier (pointer-sized unsigned integer).
    GType,
    /// Unicode scalar value (32-bit).
    Unichar,
    /// Untyped pointer.
    Pointer,
}

impl PrimitiveKind {
    /// Resolve a schema type name to a primitive kind.
    ///
    /// Returns `None` for anything that is not a fundamental scalar spelling,
    /// including strings (`utf8`, `filename`) which have their own descriptor.
    pub fn from_type_name(name: &str) -> Option<Self> {
        let kind = match name {
            "none" | "void" => PrimitiveKind::Void,
            "gboolean" | "bool" => PrimitiveKind::Bool,
            "gint8" | "gchar" | "int8" => PrimitiveKind::Int8,
            "guint8" | "guchar" | "uint8" => PrimitiveKind::Uint8,
            "gint16" | "gshort" | "int16" => PrimitiveKind::Int16,
            "guint16" | "gushort" | "uint16" => PrimitiveKind::Uint16,
            "gint" | "gint32" | "int" | "int32" => PrimitiveKind::Int32,
            "guint" | "guint32" | "uint" | "uint32" => PrimitiveKind::Uint32,
            "gint64" | "glong" | "gssize" | "goffset" | "gintptr" | "time_t" | "int64" => {
                PrimitiveKind::Int64
            }
            "guint64" | "gulong" | "gsize" | "guintptr" | "uint64" => PrimitiveKind::Uint64,
            "gfloat" | "float" => PrimitiveKind::Float,
            "gdouble" | "double" => PrimitiveKind::Double,
            "GType" => PrimitiveKind::GType,
            "gunichar" => PrimitiveKind::Unichar,
            "gpointer" | "gconstpointer" => PrimitiveKind::Pointer,
            _ => return None,
        };
        Some(kind)
    }

    /// Size in bytes of a value of this kind.
    ///
    /// `pointer_size` applies to pointer-width kinds (`Pointer`, `GType`).
    pub const fn size(self, pointer_size: usize) -> usize {
        match self {
            PrimitiveKind::Void => 0,
            PrimitiveKind::Int8 | PrimitiveKind::Uint8 => 1,
            PrimitiveKind::Int16 | PrimitiveKind::Uint16 => 2,
            PrimitiveKind::Bool
            | PrimitiveKind::Int32
            | PrimitiveKind::Uint32
            | PrimitiveKind::Float
            | PrimitiveKind::Unichar => 4,
            PrimitiveKind::Int64 | PrimitiveKind::Uint64 | PrimitiveKind::Double => 8,
            PrimitiveKind::GType | PrimitiveKind::Pointer => pointer_size,
        }
    }

    /// Alignment of this kind. Primitives are naturally aligned.
    pub const fn alignment(self, pointer_size: usize) -> usize {
        match self {
            PrimitiveKind::Void => 1,
            other => other.size(pointer_size),
        }
    }

    /// Whether values of this kind are signed integers.
    pub const fn is_signed(self) -> bool {
        matches!(
            self,
            PrimitiveKind::Int8 | PrimitiveKind::Int16 | PrimitiveKind::Int32 | PrimitiveKind::Int64
        )
    }

    /// Whether values of this kind are floating point.
    pub const fn is_float(self) -> bool {
        matches!(self, PrimitiveKind::Float | PrimitiveKind::Double)
    }

    /// Get the canonical name of this kind.
    pub const fn name(self) -> &'static str {
        match self {
            PrimitiveKind::Void => "void",
            PrimitiveKind::Bool => "bool",
            PrimitiveKind::Int8 => "int8",
            PrimitiveKind::Uint8 => "uint8",
            PrimitiveKind::Int16 => "int16",
            PrimitiveKind::Uint16 => "uint16",
            PrimitiveKind::Int32 => "int32",
            PrimitiveKind::Uint32 => "uint32",
            PrimitiveKind::Int64 => "int64",
            PrimitiveKind::Uint64 => "uint64",
            PrimitiveKind::Float => "float",
            PrimitiveKind::Double => "double",
            PrimitiveKind::GType => "gtype",
            PrimitiveKind::Unichar => "unichar",
            PrimitiveKind::Pointer => "pointer",
        }
    }
}

impl fmt::Display for PrimitiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Whether a schema type name is a string spelling.
pub fn is_string_type(name: &str) -> bool {
    matches!(name, "utf8" | "filename")
}
