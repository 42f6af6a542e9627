//! Struct layout calculation.
//!
//! Computes per-field byte offsets, alignment and total size of records using
//! standard C layout rules: each field is placed at the running offset rounded
//! up to its alignment, and the total size is padded to a multiple of the
//! largest field alignment. Unions place every member at offset 0.
//!
//! Nested inline records are computed recursively and memoized by qualified
//! type name. A record that is already being computed further up the
//! recursion gets a provisional pointer-width size and alignment instead of
//! recursing forever; real schemas are not expected to contain by-value
//! cycles, so this is a safety net. Layouts that relied on a provisional
//! size are never memoized, so every query of such a type starts from the
//! same root and yields the same result.
//!
//! Types whose size cannot be determined (unresolvable names) fall back to
//! pointer width and are logged as layout gaps.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use nativebind_compiler::LayoutCalculator;
//! use nativebind_core::model::{FieldInfo, Repository, TypeRef};
//!
//! let layouts = LayoutCalculator::new(Arc::new(Repository::default()), 8);
//! let fields = [
//!     FieldInfo::new("a", TypeRef::named("gint64")),
//!     FieldInfo::new("b", TypeRef::named("gint32")),
//! ];
//! assert_eq!(layouts.calculate_struct_size("Test", &fields), 16);
//! ```

use std::sync::{Arc, PoisonError, RwLock};

use log::warn;
use nativebind_core::model::{FieldInfo, RecordInfo, RecordKind, Repository, TypeDecl, TypeRef};
use nativebind_core::{PrimitiveKind, is_string_type};
use rustc_hash::{FxHashMap, FxHashSet};

/// Placement of one field inside a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldLayout {
    /// Field name.
    pub field: String,
    /// Byte offset from the start of the record.
    pub offset: usize,
    /// Size in bytes.
    pub size: usize,
    /// Alignment in bytes.
    pub alignment: usize,
}

/// Size and alignment of a type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeLayout {
    pub size: usize,
    pub alignment: usize,
}

impl TypeLayout {
    /// A pointer-sized slot.
    pub const fn pointer(pointer_size: usize) -> Self {
        Self {
            size: pointer_size,
            alignment: pointer_size,
        }
    }

    /// Distance between consecutive array elements of this type.
    pub const fn stride(&self) -> usize {
        align_up(self.size, self.alignment)
    }

    /// Byte offset of element `index` in an array of this type, `None` on
    /// overflow.
    pub const fn element_offset(&self, index: usize) -> Option<usize> {
        self.stride().checked_mul(index)
    }
}

/// Layout of a whole record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordShape {
    /// Field-addressable record. Only public fields are listed, but offsets
    /// and size account for private fields too.
    Fields {
        fields: Vec<FieldLayout>,
        size: usize,
        alignment: usize,
    },
    /// Record without a public layout; only its size is known.
    Opaque { size: usize, alignment: usize },
}

impl RecordShape {
    /// Total size including tail padding.
    pub fn size(&self) -> usize {
        match self {
            RecordShape::Fields { size, .. } | RecordShape::Opaque { size, .. } => *size,
        }
    }

    /// Alignment of the record.
    pub fn alignment(&self) -> usize {
        match self {
            RecordShape::Fields { alignment, .. } | RecordShape::Opaque { alignment, .. } => {
                *alignment
            }
        }
    }

    /// Public field layouts; empty for opaque records.
    pub fn fields(&self) -> &[FieldLayout] {
        match self {
            RecordShape::Fields { fields, .. } => fields,
            RecordShape::Opaque { .. } => &[],
        }
    }

    /// Find a public field layout by name.
    pub fn field(&self, name: &str) -> Option<&FieldLayout> {
        self.fields().iter().find(|f| f.field == name)
    }

    /// Whether the record has no public layout.
    pub fn is_opaque(&self) -> bool {
        matches!(self, RecordShape::Opaque { .. })
    }
}

/// Round `offset` up to a multiple of `alignment`.
pub const fn align_up(offset: usize, alignment: usize) -> usize {
    if alignment <= 1 {
        return offset;
    }
    offset.div_ceil(alignment) * alignment
}

/// Computes and caches record layouts.
///
/// The cache is keyed by qualified type name and is safe for concurrent
/// read/populate. Two threads computing the same type race harmlessly since
/// both produce identical results.
#[derive(Debug)]
pub struct LayoutCalculator {
    repository: Arc<Repository>,
    pointer_size: usize,
    cache: RwLock<FxHashMap<String, TypeLayout>>,
}

impl LayoutCalculator {
    /// Create a calculator over `repository` for a target with `pointer_size`-byte pointers.
    pub fn new(repository: Arc<Repository>, pointer_size: usize) -> Self {
        Self {
            repository,
            pointer_size,
            cache: RwLock::new(FxHashMap::default()),
        }
    }

    /// The repository layouts are computed against.
    pub fn repository(&self) -> &Arc<Repository> {
        &self.repository
    }

    /// Pointer width in bytes.
    pub fn pointer_size(&self) -> usize {
        self.pointer_size
    }

    /// Number of memoized type layouts.
    pub fn cached_types(&self) -> usize {
        self.cache.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    // ==========================================================================
    // Field lists
    // ==========================================================================

    /// Compute sequential field layouts for `fields` declared in `namespace`.
    ///
    /// Private fields are omitted from the result unless `include_private` is
    /// set, but they always take part in offset accumulation so the offsets of
    /// public fields match the native layout.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn calculate_layout(
        &self,
        namespace: &str,
        fields: &[FieldInfo],
        include_private: bool,
    ) -> Vec<FieldLayout> {
        let mut walk = Walk::default();
        let (layouts, _) = self.place_sequential(namespace, fields, &mut walk);
        filter_private(layouts, fields, include_private)
    }

    /// Total size of a struct with `fields`, including private fields and tail padding.
    pub fn calculate_struct_size(&self, namespace: &str, fields: &[FieldInfo]) -> usize {
        let mut walk = Walk::default();
        self.place_sequential(namespace, fields, &mut walk).1.size
    }

    /// Compute overlapping (union) field layouts: every member at offset 0.
    pub fn calculate_union_layout(
        &self,
        namespace: &str,
        fields: &[FieldInfo],
        include_private: bool,
    ) -> Vec<FieldLayout> {
        let mut walk = Walk::default();
        let (layouts, _) = self.place_overlapping(namespace, fields, &mut walk);
        filter_private(layouts, fields, include_private)
    }

    /// Total size of a union with `fields`.
    pub fn calculate_union_size(&self, namespace: &str, fields: &[FieldInfo]) -> usize {
        let mut walk = Walk::default();
        self.place_overlapping(namespace, fields, &mut walk).1.size
    }

    /// Compute field layouts for a record, honoring its struct/union kind.
    pub fn calculate_record_layout(
        &self,
        namespace: &str,
        record: &RecordInfo,
        include_private: bool,
    ) -> Vec<FieldLayout> {
        match record.kind {
            RecordKind::Struct => self.calculate_layout(namespace, &record.fields, include_private),
            RecordKind::Union => {
                self.calculate_union_layout(namespace, &record.fields, include_private)
            }
        }
    }

    // ==========================================================================
    // Named types
    // ==========================================================================

    /// Size and alignment of a named record, union or class instance struct.
    ///
    /// Returns `None` when the name does not resolve to a type with fields.
    pub fn type_layout(&self, qualified: &str) -> Option<TypeLayout> {
        let mut walk = Walk::default();
        self.compute_type(qualified, &mut walk)
    }

    /// Byte size of a named record, union or class instance struct.
    ///
    /// Names that cannot be sized are logged as layout gaps and take pointer
    /// width.
    pub fn type_size(&self, qualified: &str) -> usize {
        match self.type_layout(qualified) {
            Some(layout) => layout.size,
            None => {
                warn!("layout gap: cannot size '{qualified}'; using pointer width");
                self.pointer_size
            }
        }
    }

    /// Whole-record shape for a named record, union or class.
    pub fn record_shape(&self, qualified: &str) -> Option<RecordShape> {
        let resolved = self.repository.resolve_qualified(qualified)?;
        let ns = resolved.namespace.name.as_str();
        let (fields, kind, opaque) = match resolved.decl {
            TypeDecl::Record(r) | TypeDecl::Union(r) => (&r.fields, r.kind, r.is_opaque()),
            TypeDecl::Class(c) => (&c.fields, RecordKind::Struct, false),
            _ => return None,
        };

        let mut walk = Walk::default();
        walk.in_progress.insert(qualified.to_string());
        let (layouts, total) = match kind {
            RecordKind::Struct => self.place_sequential(ns, fields, &mut walk),
            RecordKind::Union => self.place_overlapping(ns, fields, &mut walk),
        };
        if !walk.provisional {
            self.remember(qualified, total);
        }

        if opaque {
            return Some(RecordShape::Opaque {
                size: total.size,
                alignment: total.alignment,
            });
        }
        Some(RecordShape::Fields {
            fields: filter_private(layouts, fields, false),
            size: total.size,
            alignment: total.alignment,
        })
    }

    /// Size and alignment of a value of type `ty` stored in a field.
    pub fn field_type_layout(&self, namespace: &str, ty: &TypeRef) -> TypeLayout {
        let mut walk = Walk::default();
        self.slot_layout(namespace, ty, false, &mut walk)
    }

    /// Size and alignment of one element of an array of `element`.
    ///
    /// Record elements are stored inline unless the C spelling says pointer.
    pub fn element_layout(&self, namespace: &str, element: &TypeRef) -> TypeLayout {
        let mut walk = Walk::default();
        self.slot_layout(namespace, element, true, &mut walk)
    }

    // ==========================================================================
    // Internals
    // ==========================================================================

    fn place_sequential(
        &self,
        namespace: &str,
        fields: &[FieldInfo],
        walk: &mut Walk,
    ) -> (Vec<FieldLayout>, TypeLayout) {
        let mut layouts = Vec::with_capacity(fields.len());
        let mut offset = 0;
        let mut max_alignment = 1;

        for field in fields {
            let slot = self.slot_layout(namespace, &field.type_ref, false, walk);
            offset = align_up(offset, slot.alignment);
            layouts.push(FieldLayout {
                field: field.name.clone(),
                offset,
                size: slot.size,
                alignment: slot.alignment,
            });
            offset += slot.size;
            max_alignment = max_alignment.max(slot.alignment);
        }

        let size = if fields.is_empty() {
            0
        } else {
            align_up(offset, max_alignment)
        };
        (
            layouts,
            TypeLayout {
                size,
                alignment: max_alignment,
            },
        )
    }

    fn place_overlapping(
        &self,
        namespace: &str,
        fields: &[FieldInfo],
        walk: &mut Walk,
    ) -> (Vec<FieldLayout>, TypeLayout) {
        let mut layouts = Vec::with_capacity(fields.len());
        let mut largest = 0;
        let mut max_alignment = 1;

        for field in fields {
            let slot = self.slot_layout(namespace, &field.type_ref, false, walk);
            layouts.push(FieldLayout {
                field: field.name.clone(),
                offset: 0,
                size: slot.size,
                alignment: slot.alignment,
            });
            largest = largest.max(slot.size);
            max_alignment = max_alignment.max(slot.alignment);
        }

        (
            layouts,
            TypeLayout {
                size: align_up(largest, max_alignment),
                alignment: max_alignment,
            },
        )
    }

    fn compute_type(
        &self,
        qualified: &str,
        walk: &mut Walk,
    ) -> Option<TypeLayout> {
        if let Some(hit) = self
            .cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(qualified)
        {
            return Some(*hit);
        }

        if walk.in_progress.contains(qualified) {
            warn!(
                "record '{qualified}' contains itself by value; using provisional pointer-width layout"
            );
            walk.provisional = true;
            return Some(TypeLayout::pointer(self.pointer_size));
        }

        let resolved = self.repository.resolve_qualified(qualified)?;
        let ns = resolved.namespace.name.as_str();
        let (fields, kind) = match resolved.decl {
            TypeDecl::Record(r) | TypeDecl::Union(r) => (&r.fields, r.kind),
            TypeDecl::Class(c) => (&c.fields, RecordKind::Struct),
            _ => return None,
        };

        let outer_provisional = std::mem::take(&mut walk.provisional);
        walk.in_progress.insert(qualified.to_string());
        let (_, layout) = match kind {
            RecordKind::Struct => self.place_sequential(ns, fields, walk),
            RecordKind::Union => self.place_overlapping(ns, fields, walk),
        };
        walk.in_progress.remove(qualified);

        // Layouts that saw a provisional size depend on where the walk
        // started, so they are recomputed on every query.
        let provisional = walk.provisional;
        walk.provisional |= outer_provisional;
        if provisional {
            return Some(layout);
        }
        Some(self.remember(qualified, layout))
    }

    fn remember(&self, qualified: &str, layout: TypeLayout) -> TypeLayout {
        *self
            .cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(qualified.to_string())
            .or_insert(layout)
    }

    fn slot_layout(
        &self,
        namespace: &str,
        ty: &TypeRef,
        records_inline: bool,
        walk: &mut Walk,
    ) -> TypeLayout {
        let pointer = TypeLayout::pointer(self.pointer_size);

        if let Some(shape) = &ty.array {
            let explicit_pointer = ty.c_type.as_deref().is_some_and(|c| c.contains('*'));
            return match shape.fixed_size {
                Some(count) if !explicit_pointer => {
                    let element = self.slot_layout(namespace, &shape.element, true, walk);
                    TypeLayout {
                        size: element.stride() * count,
                        alignment: element.alignment,
                    }
                }
                _ => pointer,
            };
        }

        if ty.is_void() || is_string_type(&ty.name) {
            return pointer;
        }

        if let Some(kind) = PrimitiveKind::from_type_name(&ty.name) {
            return TypeLayout {
                size: kind.size(self.pointer_size),
                alignment: kind.alignment(self.pointer_size),
            };
        }

        let qualified = self.repository.qualify(namespace, &ty.name);
        let Some(resolved) = self.repository.resolve_qualified(&qualified) else {
            warn!("layout gap: type '{qualified}' is unresolved; using pointer width");
            return pointer;
        };

        let inline = if records_inline {
            !ty.c_type.as_deref().is_some_and(|c| c.contains('*'))
        } else {
            ty.is_inline()
        };

        match resolved.decl {
            TypeDecl::Enum(_) | TypeDecl::Flags(_) => TypeLayout {
                size: 4,
                alignment: 4,
            },
            TypeDecl::Record(_) | TypeDecl::Union(_) | TypeDecl::Class(_) if inline => self
                .compute_type(&qualified, walk)
                .unwrap_or_else(|| {
                    warn!("layout gap: cannot size '{qualified}'; using pointer width");
                    pointer
                }),
            _ => pointer,
        }
    }
}

/// State of one recursive layout walk.
#[derive(Debug, Default)]
struct Walk {
    /// Records currently being computed further up the recursion.
    in_progress: FxHashSet<String>,
    /// Whether a provisional size was used since the innermost record started.
    provisional: bool,
}

fn filter_private(
    layouts: Vec<FieldLayout>,
    fields: &[FieldInfo],
    include_private: bool,
) -> Vec<FieldLayout> {
    layouts
        .into_iter()
        .zip(fields)
        .filter(|(_, field)| include_private || !field.private)
        .map(|(layout, _)| layout)
        .collect()
}
