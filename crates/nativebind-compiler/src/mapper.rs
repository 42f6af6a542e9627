//! Type & ownership mapping.
//!
//! Converts one schema [`TypeRef`] in a given [`UseContext`] into the
//! [`FfiDescriptor`] the dispatcher consumes, plus the list of symbols the
//! consuming code has to import.
//!
//! ## Rules
//!
//! | Schema type | Descriptor |
//! |-------------|------------|
//! | `gint`, `gdouble`, `gboolean`, ... | `primitive` from the fixed size table |
//! | `utf8`, `filename` | `string` |
//! | enum / flags | `primitive(int32)` / `primitive(uint32)` |
//! | class, interface | `object`, with ref hooks for fundamentals |
//! | record with `get_type` | `boxed` (pointer use) |
//! | other records | `struct` (fixed size, no identity) |
//! | callback parameter | `callback` with nested descriptors |
//! | array | `array` with element descriptor and length strategy |
//! | out / inout parameter | `reference` around the referenced type |
//!
//! Ownership is copied from the transfer annotation, so a `full` return is
//! always described as `full`.
//!
//! Shapes that cannot be represented yield a [`MappingError`]; the compile
//! pass skips the enclosing item instead of emitting a wrong descriptor.

use nativebind_core::model::{
    ArrayKind, ArrayShape, CallbackInfo, CallbackScope, ClassInfo, Namespace, ParamInfo, RecordInfo,
    Repository, TypeDecl, TypeRef,
};
use nativebind_core::{
    ArrayLength, BindingOptions, FfiDescriptor, MappingError, Ownership, PrimitiveKind, RefHooks,
    Trampoline, is_string_type,
};

use crate::layout::LayoutCalculator;

/// Module name of runtime helper imports.
pub const RUNTIME_MODULE: &str = "nativebind";

/// Qualified name of the native error record.
pub const ERROR_TYPE: &str = "GLib.Error";

/// Container types with no descriptor in the binding contract.
const UNSUPPORTED_CONTAINERS: &[&str] = &["GLib.List", "GLib.SList", "GLib.HashTable"];

/// Where a mapped type is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UseContext {
    Parameter,
    Return,
    Field,
    /// Element of an array.
    Element,
}

impl UseContext {
    /// Description used in error messages.
    pub const fn describe(self) -> &'static str {
        match self {
            UseContext::Parameter => "a parameter",
            UseContext::Return => "a return value",
            UseContext::Field => "a field",
            UseContext::Element => "an array element",
        }
    }
}

/// A symbol the consuming code must import.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Import {
    /// Schema namespace or [`RUNTIME_MODULE`].
    pub module: String,
    pub symbol: String,
}

impl Import {
    /// Import `symbol` from `module`.
    pub fn new(module: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            symbol: symbol.into(),
        }
    }

    /// Import a runtime helper.
    pub fn runtime(symbol: impl Into<String>) -> Self {
        Self::new(RUNTIME_MODULE, symbol)
    }
}

/// Result of mapping one type.
#[derive(Debug, Clone, PartialEq)]
pub struct MappedType {
    pub descriptor: FfiDescriptor,
    /// Sorted, deduplicated imports.
    pub imports: Vec<Import>,
}

/// Maps schema types of one namespace to call descriptors.
#[derive(Debug, Clone, Copy)]
pub struct TypeMapper<'a> {
    layouts: &'a LayoutCalculator,
    options: &'a BindingOptions,
    namespace: &'a str,
}

impl<'a> TypeMapper<'a> {
    /// Create a mapper resolving local names against `namespace`.
    pub fn new(layouts: &'a LayoutCalculator, options: &'a BindingOptions, namespace: &'a str) -> Self {
        Self {
            layouts,
            options,
            namespace,
        }
    }

    /// Namespace local names are resolved against.
    pub fn namespace(&self) -> &'a str {
        self.namespace
    }

    /// Layout calculator used for struct sizes.
    pub fn layouts(&self) -> &'a LayoutCalculator {
        self.layouts
    }

    /// Map a type used in `context`.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn map(&self, ty: &TypeRef, context: UseContext) -> Result<MappedType, MappingError> {
        let mut imports = Vec::new();
        let descriptor = self.map_into(ty, context, None, &mut imports)?;
        Ok(finish(descriptor, imports))
    }

    /// Map a callable parameter, honoring its direction and callback slots.
    ///
    /// Callback indices in the result are schema parameter indices; the call
    /// builder rewrites them to native argument positions.
    pub fn map_param(&self, param: &ParamInfo) -> Result<MappedType, MappingError> {
        let mut imports = Vec::new();
        let descriptor = self.map_param_into(param, &mut imports)?;
        Ok(finish(descriptor, imports))
    }

    /// The trailing error-output slot of throwing callables.
    pub fn error_slot(&self) -> FfiDescriptor {
        let library = self
            .layouts
            .repository()
            .resolve_qualified(ERROR_TYPE)
            .map(|r| r.namespace.library().to_string())
            .unwrap_or_default();
        FfiDescriptor::reference(FfiDescriptor::Boxed {
            inner_type: ERROR_TYPE.to_string(),
            library,
            ownership: Ownership::Full,
            get_type_fn: Some("g_error_get_type".to_string()),
        })
    }

    fn map_param_into(
        &self,
        param: &ParamInfo,
        imports: &mut Vec<Import>,
    ) -> Result<FfiDescriptor, MappingError> {
        let inner = self.map_into(&param.type_ref, UseContext::Parameter, Some(param), imports)?;
        if !param.direction.is_by_reference() {
            return Ok(inner);
        }
        if matches!(inner, FfiDescriptor::Callback { .. }) {
            return Err(MappingError::UnsupportedReference {
                inner: param.type_ref.name.clone(),
            });
        }
        Ok(FfiDescriptor::reference(inner))
    }

    fn map_into(
        &self,
        ty: &TypeRef,
        context: UseContext,
        param: Option<&ParamInfo>,
        imports: &mut Vec<Import>,
    ) -> Result<FfiDescriptor, MappingError> {
        if let Some(shape) = &ty.array {
            return self.map_array(ty, shape, imports);
        }
        if ty.is_void() {
            return Ok(FfiDescriptor::Null);
        }
        if is_string_type(&ty.name) {
            return Ok(FfiDescriptor::String {
                ownership: ty.transfer,
            });
        }
        if let Some(kind) = PrimitiveKind::from_type_name(&ty.name) {
            return Ok(FfiDescriptor::primitive(kind, self.options.pointer_size));
        }
        if matches!(ty.name.as_str(), "va_list" | "...") {
            return Err(MappingError::UnsupportedInContext {
                type_name: ty.name.clone(),
                context: context.describe(),
            });
        }

        let repository: &'a Repository = self.layouts.repository();
        let qualified = repository.qualify(self.namespace, &ty.name);
        if UNSUPPORTED_CONTAINERS.contains(&qualified.as_str()) {
            return Err(MappingError::UnsupportedContainer { name: qualified });
        }

        let resolved = repository
            .resolve_qualified(&qualified)
            .ok_or_else(|| MappingError::UnresolvedType {
                name: qualified.clone(),
            })?;
        imports.push(Import::new(&resolved.namespace.name, resolved.local_name()));

        match resolved.decl {
            TypeDecl::Class(class) => {
                imports.push(Import::runtime("wrap"));
                Ok(FfiDescriptor::Object {
                    ownership: ty.transfer,
                    hooks: class_hooks(class),
                })
            }
            TypeDecl::Interface(_) => {
                imports.push(Import::runtime("wrap"));
                Ok(FfiDescriptor::object(ty.transfer))
            }
            TypeDecl::Record(record) | TypeDecl::Union(record) => {
                self.map_record(ty, &qualified, resolved.namespace, record, context, imports)
            }
            TypeDecl::Enum(_) => Ok(FfiDescriptor::primitive(
                PrimitiveKind::Int32,
                self.options.pointer_size,
            )),
            TypeDecl::Flags(_) => Ok(FfiDescriptor::primitive(
                PrimitiveKind::Uint32,
                self.options.pointer_size,
            )),
            TypeDecl::Callback(callback) => match context {
                UseContext::Parameter => {
                    let owner = TypeMapper {
                        namespace: &resolved.namespace.name,
                        ..*self
                    };
                    owner.map_callback(&qualified, callback, param, imports)
                }
                UseContext::Field | UseContext::Element => Ok(FfiDescriptor::primitive(
                    PrimitiveKind::Pointer,
                    self.options.pointer_size,
                )),
                UseContext::Return => Err(MappingError::UnsupportedInContext {
                    type_name: qualified,
                    context: context.describe(),
                }),
            },
        }
    }

    fn map_record(
        &self,
        ty: &TypeRef,
        qualified: &str,
        namespace: &Namespace,
        record: &RecordInfo,
        context: UseContext,
        imports: &mut Vec<Import>,
    ) -> Result<FfiDescriptor, MappingError> {
        let inline = match context {
            UseContext::Field => ty.is_inline(),
            UseContext::Element => !ty.c_type.as_deref().is_some_and(|c| c.contains('*')),
            UseContext::Parameter | UseContext::Return => false,
        };

        imports.push(Import::runtime("wrap"));
        if record.is_boxed() && !inline {
            return Ok(FfiDescriptor::Boxed {
                inner_type: qualified.to_string(),
                library: namespace.library().to_string(),
                ownership: ty.transfer,
                get_type_fn: record.get_type.clone(),
            });
        }

        Ok(FfiDescriptor::Struct {
            inner_type: qualified.to_string(),
            library: namespace.library().to_string(),
            size: self.layouts.type_size(qualified),
            inline,
            ownership: ty.transfer,
        })
    }

    fn map_callback(
        &self,
        qualified: &str,
        callback: &CallbackInfo,
        param: Option<&ParamInfo>,
        imports: &mut Vec<Import>,
    ) -> Result<FfiDescriptor, MappingError> {
        if callback.is_variadic() {
            return Err(MappingError::VariadicCallback {
                name: qualified.to_string(),
            });
        }

        let mut params = callback
            .params
            .iter()
            .map(|p| self.map_param_into(p, imports))
            .collect::<Result<Vec<_>, _>>()?;
        if callback.throws {
            params.push(self.error_slot());
        }
        let result = self.map_into(&callback.return_type, UseContext::Return, None, imports)?;

        let user_data_index = param.and_then(|p| p.closure_index);
        let destroy_index = param.and_then(|p| p.destroy_index);
        let scope = param.and_then(|p| p.scope).unwrap_or(if destroy_index.is_some() {
            CallbackScope::Notified
        } else {
            CallbackScope::Call
        });

        imports.push(Import::runtime("closure"));
        Ok(FfiDescriptor::Callback {
            trampoline: trampoline_for(qualified),
            params,
            result: Box::new(result),
            scope,
            user_data_index,
            destroy_index,
        })
    }

    fn map_array(
        &self,
        ty: &TypeRef,
        shape: &ArrayShape,
        imports: &mut Vec<Import>,
    ) -> Result<FfiDescriptor, MappingError> {
        if shape.element.is_array() {
            return Err(MappingError::NestedArray);
        }
        let element = self.map_into(&shape.element, UseContext::Element, None, imports)?;
        if element.is_null() {
            return Err(MappingError::UnsupportedInContext {
                type_name: shape.element.name.clone(),
                context: UseContext::Element.describe(),
            });
        }

        let length = if shape.kind != ArrayKind::C {
            ArrayLength::Container
        } else if let Some(index) = shape.length_param {
            ArrayLength::Param(index)
        } else if let Some(count) = shape.fixed_size {
            ArrayLength::Fixed(count)
        } else {
            ArrayLength::ZeroTerminated
        };

        // Inline struct elements use their padded size as stride.
        let element_size = element.slot_size(self.options.pointer_size);
        Ok(FfiDescriptor::Array {
            element: Box::new(element),
            ownership: ty.transfer,
            length,
            kind: shape.kind,
            element_size,
        })
    }
}

/// Ref/unref hooks of a fundamental class.
pub fn class_hooks(class: &ClassInfo) -> Option<RefHooks> {
    match (class.fundamental, &class.ref_func, &class.unref_func) {
        (true, Some(ref_fn), Some(unref_fn)) => Some(RefHooks {
            ref_fn: ref_fn.clone(),
            unref_fn: unref_fn.clone(),
        }),
        _ => None,
    }
}

/// Pick the native trampoline for a callback type.
pub fn trampoline_for(callback_type: &str) -> Trampoline {
    if callback_type.ends_with("AsyncReadyCallback") {
        Trampoline::AsyncReady
    } else if callback_type.ends_with("DestroyNotify") {
        Trampoline::DestroyNotify
    } else {
        Trampoline::Closure
    }
}

fn finish(descriptor: FfiDescriptor, mut imports: Vec<Import>) -> MappedType {
    imports.sort();
    imports.dedup();
    MappedType {
        descriptor,
        imports,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nativebind_core::model::{
        ClassInfo, EnumInfo, FieldInfo, InterfaceInfo, ParamDirection, RecordInfo,
    };
    use std::sync::Arc;

    fn layouts() -> LayoutCalculator {
        let repo = Repository::new(vec![
            Namespace::new("GLib", "libglib-2.0.so.0")
                .with_record(RecordInfo::new("Error").boxed("GError", "g_error_get_type"))
                .with_record(RecordInfo::new("List"))
                .with_callback(CallbackInfo::new("DestroyNotify").with_param(ParamInfo::new(
                    "data",
                    TypeRef::named("gpointer"),
                ))),
            Namespace::new("GObject", "libgobject-2.0.so.0")
                .with_class(ClassInfo::new("Object").with_type_name("GObject"))
                .with_class(
                    ClassInfo::new("ParamSpec")
                        .fundamental("g_param_spec_ref", "g_param_spec_unref"),
                ),
            Namespace::new("Gio", "libgio-2.0.so.0")
                .with_interface(InterfaceInfo::new("File"))
                .with_class(ClassInfo::new("Cancellable").with_parent("GObject.Object"))
                .with_callback(
                    CallbackInfo::new("AsyncReadyCallback")
                        .with_param(ParamInfo::new("source_object", TypeRef::named("GObject.Object")))
                        .with_param(ParamInfo::new("res", TypeRef::named("AsyncResult")))
                        .with_param(ParamInfo::new("data", TypeRef::named("gpointer"))),
                )
                .with_interface(InterfaceInfo::new("AsyncResult")),
            Namespace::new("Gdk", "libgtk-4.so.1")
                .with_record(RecordInfo::new("RGBA").boxed("GdkRGBA", "gdk_rgba_get_type"))
                .with_record(
                    RecordInfo::new("Rectangle")
                        .with_field(FieldInfo::new("x", TypeRef::named("gint")))
                        .with_field(FieldInfo::new("y", TypeRef::named("gint")))
                        .with_field(FieldInfo::new("width", TypeRef::named("gint")))
                        .with_field(FieldInfo::new("height", TypeRef::named("gint"))),
                )
                .with_enum(EnumInfo::new("Gravity"))
                .with_flags(EnumInfo::new("ModifierType"))
                .with_callback(
                    CallbackInfo::new("Printf")
                        .with_param(ParamInfo::new("format", TypeRef::named("utf8")))
                        .with_param(ParamInfo::new("...", TypeRef::named("va_list"))),
                ),
        ]);
        LayoutCalculator::new(Arc::new(repo), 8)
    }

    fn map(ns: &str, ty: TypeRef, context: UseContext) -> Result<MappedType, MappingError> {
        let layouts = layouts();
        let options = BindingOptions::default().with_pointer_size(8);
        TypeMapper::new(&layouts, &options, ns).map(&ty, context)
    }

    fn map_param(ns: &str, param: ParamInfo) -> Result<MappedType, MappingError> {
        let layouts = layouts();
        let options = BindingOptions::default().with_pointer_size(8);
        TypeMapper::new(&layouts, &options, ns).map_param(&param)
    }

    #[test]
    fn primitives_use_size_table() {
        let mapped = map("Gdk", TypeRef::named("guint16"), UseContext::Parameter).unwrap();
        assert_eq!(
            mapped.descriptor,
            FfiDescriptor::Primitive {
                kind: PrimitiveKind::Uint16,
                size: 2
            }
        );
        assert!(mapped.imports.is_empty());

        let mapped = map("Gdk", TypeRef::named("gboolean"), UseContext::Return).unwrap();
        assert_eq!(mapped.descriptor.slot_size(8), 4);
    }

    #[test]
    fn void_return_is_null() {
        let mapped = map("Gdk", TypeRef::void(), UseContext::Return).unwrap();
        assert!(mapped.descriptor.is_null());
    }

    #[test]
    fn strings_carry_transfer() {
        let ty = TypeRef::named("utf8").with_transfer(Ownership::Full);
        let mapped = map("Gdk", ty, UseContext::Return).unwrap();
        assert_eq!(
            mapped.descriptor,
            FfiDescriptor::String {
                ownership: Ownership::Full
            }
        );
    }

    #[test]
    fn classes_and_interfaces_are_objects() {
        let ty = TypeRef::named("Cancellable").with_transfer(Ownership::Full);
        let mapped = map("Gio", ty, UseContext::Return).unwrap();
        assert_eq!(mapped.descriptor, FfiDescriptor::object(Ownership::Full));
        assert!(mapped.imports.contains(&Import::new("Gio", "Cancellable")));
        assert!(mapped.imports.contains(&Import::runtime("wrap")));

        let mapped = map("Gio", TypeRef::named("File"), UseContext::Parameter).unwrap();
        assert_eq!(mapped.descriptor, FfiDescriptor::object(Ownership::None));
    }

    #[test]
    fn fundamental_classes_carry_hooks() {
        let mapped = map("Gio", TypeRef::named("GObject.ParamSpec"), UseContext::Return).unwrap();
        match mapped.descriptor {
            FfiDescriptor::Object {
                hooks: Some(hooks), ..
            } => {
                assert_eq!(hooks.ref_fn, "g_param_spec_ref");
                assert_eq!(hooks.unref_fn, "g_param_spec_unref");
            }
            other => panic!("expected object with hooks, got {other:?}"),
        }
        assert!(mapped.imports.contains(&Import::new("GObject", "ParamSpec")));
    }

    #[test]
    fn boxed_records_keep_get_type() {
        let ty = TypeRef::named("RGBA").with_transfer(Ownership::Full);
        let mapped = map("Gdk", ty, UseContext::Return).unwrap();
        assert_eq!(
            mapped.descriptor,
            FfiDescriptor::Boxed {
                inner_type: "Gdk.RGBA".into(),
                library: "libgtk-4.so.1".into(),
                ownership: Ownership::Full,
                get_type_fn: Some("gdk_rgba_get_type".into()),
            }
        );
    }

    #[test]
    fn plain_records_are_structs_with_size() {
        let mapped = map("Gdk", TypeRef::named("Rectangle"), UseContext::Parameter).unwrap();
        assert_eq!(
            mapped.descriptor,
            FfiDescriptor::Struct {
                inner_type: "Gdk.Rectangle".into(),
                library: "libgtk-4.so.1".into(),
                size: 16,
                inline: false,
                ownership: Ownership::None,
            }
        );

        let field = TypeRef::named("Rectangle").with_c_type("GdkRectangle");
        let mapped = map("Gdk", field, UseContext::Field).unwrap();
        assert_eq!(mapped.descriptor.slot_size(8), 16);
    }

    #[test]
    fn boxed_record_inline_in_field_is_struct() {
        let field = TypeRef::named("RGBA").with_c_type("GdkRGBA");
        let mapped = map("Gdk", field, UseContext::Field).unwrap();
        assert!(matches!(
            mapped.descriptor,
            FfiDescriptor::Struct { inline: true, .. }
        ));
    }

    #[test]
    fn enums_and_flags_are_32_bit() {
        let mapped = map("Gdk", TypeRef::named("Gravity"), UseContext::Parameter).unwrap();
        assert_eq!(
            mapped.descriptor,
            FfiDescriptor::primitive(PrimitiveKind::Int32, 8)
        );
        let mapped = map("Gdk", TypeRef::named("ModifierType"), UseContext::Parameter).unwrap();
        assert_eq!(
            mapped.descriptor,
            FfiDescriptor::primitive(PrimitiveKind::Uint32, 8)
        );
    }

    #[test]
    fn callback_parameters_carry_nested_descriptors() {
        let param = ParamInfo::new("callback", TypeRef::named("AsyncReadyCallback"))
            .with_callback_slots(Some(3), None, CallbackScope::Async);
        let mapped = map_param("Gio", param).unwrap();
        match mapped.descriptor {
            FfiDescriptor::Callback {
                trampoline,
                params,
                result,
                scope,
                user_data_index,
                destroy_index,
            } => {
                assert_eq!(trampoline, Trampoline::AsyncReady);
                assert_eq!(params.len(), 3);
                assert_eq!(params[0], FfiDescriptor::object(Ownership::None));
                assert!(result.is_null());
                assert_eq!(scope, CallbackScope::Async);
                assert_eq!(user_data_index, Some(3));
                assert_eq!(destroy_index, None);
            }
            other => panic!("expected callback, got {other:?}"),
        }
        assert!(mapped.imports.contains(&Import::runtime("closure")));
    }

    #[test]
    fn callback_scope_defaults_from_destroy_slot() {
        let param = ParamInfo::new("notify", TypeRef::named("GLib.DestroyNotify"));
        let mapped = map_param("Gio", param.clone()).unwrap();
        assert!(matches!(
            mapped.descriptor,
            FfiDescriptor::Callback {
                trampoline: Trampoline::DestroyNotify,
                scope: CallbackScope::Call,
                ..
            }
        ));

        let param = ParamInfo::new("func", TypeRef::named("AsyncReadyCallback"));
        let param = ParamInfo {
            destroy_index: Some(4),
            ..param
        };
        let mapped = map_param("Gio", param).unwrap();
        assert!(matches!(
            mapped.descriptor,
            FfiDescriptor::Callback {
                scope: CallbackScope::Notified,
                ..
            }
        ));
    }

    #[test]
    fn variadic_callback_is_unsupported() {
        let param = ParamInfo::new("fmt", TypeRef::named("Printf"));
        assert_eq!(
            map_param("Gdk", param),
            Err(MappingError::VariadicCallback {
                name: "Gdk.Printf".into()
            })
        );
    }

    #[test]
    fn callback_return_is_unsupported() {
        let err = map("Gio", TypeRef::named("AsyncReadyCallback"), UseContext::Return).unwrap_err();
        assert!(matches!(err, MappingError::UnsupportedInContext { .. }));
    }

    #[test]
    fn callback_field_is_pointer() {
        let mapped = map("Gio", TypeRef::named("AsyncReadyCallback"), UseContext::Field).unwrap();
        assert_eq!(
            mapped.descriptor,
            FfiDescriptor::primitive(PrimitiveKind::Pointer, 8)
        );
    }

    #[test]
    fn out_parameters_become_references() {
        let param = ParamInfo::out("width", TypeRef::named("gint"));
        let mapped = map_param("Gdk", param).unwrap();
        assert_eq!(
            mapped.descriptor,
            FfiDescriptor::reference(FfiDescriptor::primitive(PrimitiveKind::Int32, 8))
        );

        let param = ParamInfo::new("file", TypeRef::named("Gio.File").with_transfer(Ownership::Full))
            .with_direction(ParamDirection::InOut);
        let mapped = map_param("Gdk", param).unwrap();
        assert_eq!(mapped.descriptor.ownership(), Some(Ownership::Full));
        assert_eq!(mapped.descriptor.kind_name(), "reference");
    }

    #[test]
    fn reference_to_callback_is_unsupported() {
        let param = ParamInfo::out("cb", TypeRef::named("AsyncReadyCallback"));
        assert!(matches!(
            map_param("Gio", param),
            Err(MappingError::UnsupportedReference { .. })
        ));
    }

    #[test]
    fn arrays_pick_length_strategy() {
        let zero = TypeRef::array_of(
            TypeRef::named("utf8"),
            ArrayShape::zero_terminated(TypeRef::void()),
        );
        let mapped = map("Gdk", zero, UseContext::Return).unwrap();
        assert!(matches!(
            mapped.descriptor,
            FfiDescriptor::Array {
                length: ArrayLength::ZeroTerminated,
                element_size: 8,
                ..
            }
        ));

        let counted = TypeRef::array_of(
            TypeRef::named("Rectangle"),
            ArrayShape::with_length_param(TypeRef::void(), 1),
        );
        let mapped = map("Gdk", counted, UseContext::Parameter).unwrap();
        match mapped.descriptor {
            FfiDescriptor::Array {
                element,
                length,
                element_size,
                ..
            } => {
                assert_eq!(length, ArrayLength::Param(1));
                assert_eq!(element_size, 16);
                assert!(matches!(*element, FfiDescriptor::Struct { inline: true, .. }));
            }
            other => panic!("expected array, got {other:?}"),
        }

        let fixed = TypeRef::array_of(TypeRef::named("guint8"), ArrayShape::fixed(TypeRef::void(), 4));
        let mapped = map("Gdk", fixed, UseContext::Field).unwrap();
        assert!(matches!(
            mapped.descriptor,
            FfiDescriptor::Array {
                length: ArrayLength::Fixed(4),
                element_size: 1,
                ..
            }
        ));
    }

    #[test]
    fn container_arrays_carry_their_own_length() {
        let mut shape = ArrayShape::zero_terminated(TypeRef::void());
        shape.kind = ArrayKind::PtrArray;
        shape.zero_terminated = false;
        let ty = TypeRef::array_of(TypeRef::named("GObject.Object"), shape);
        let mapped = map("Gio", ty, UseContext::Return).unwrap();
        assert!(matches!(
            mapped.descriptor,
            FfiDescriptor::Array {
                length: ArrayLength::Container,
                kind: ArrayKind::PtrArray,
                ..
            }
        ));
    }

    #[test]
    fn nested_arrays_are_unsupported() {
        let inner = TypeRef::array_of(
            TypeRef::named("gint"),
            ArrayShape::zero_terminated(TypeRef::void()),
        );
        let outer = TypeRef::array_of(inner, ArrayShape::zero_terminated(TypeRef::void()));
        assert_eq!(
            map("Gdk", outer, UseContext::Parameter),
            Err(MappingError::NestedArray)
        );
    }

    #[test]
    fn lists_and_hash_tables_are_unsupported() {
        for name in ["GLib.List", "GLib.SList", "GLib.HashTable"] {
            assert!(matches!(
                map("Gdk", TypeRef::named(name), UseContext::Return),
                Err(MappingError::UnsupportedContainer { .. })
            ));
        }
        // Local spelling inside GLib resolves the same way.
        assert!(matches!(
            map("GLib", TypeRef::named("List"), UseContext::Return),
            Err(MappingError::UnsupportedContainer { .. })
        ));
    }

    #[test]
    fn va_list_is_unsupported() {
        assert!(matches!(
            map("Gdk", TypeRef::named("va_list"), UseContext::Parameter),
            Err(MappingError::UnsupportedInContext { .. })
        ));
    }

    #[test]
    fn unresolved_names_fail() {
        assert_eq!(
            map("Gdk", TypeRef::named("Nope"), UseContext::Parameter),
            Err(MappingError::UnresolvedType {
                name: "Gdk.Nope".into()
            })
        );
    }

    #[test]
    fn error_slot_is_full_boxed_reference() {
        let layouts = layouts();
        let options = BindingOptions::default();
        let slot = TypeMapper::new(&layouts, &options, "Gio").error_slot();
        match slot {
            FfiDescriptor::Reference { inner } => match *inner {
                FfiDescriptor::Boxed {
                    inner_type,
                    library,
                    ownership,
                    ..
                } => {
                    assert_eq!(inner_type, "GLib.Error");
                    assert_eq!(library, "libglib-2.0.so.0");
                    assert_eq!(ownership, Ownership::Full);
                }
                other => panic!("expected boxed, got {other:?}"),
            },
            other => panic!("expected reference, got {other:?}"),
        }
    }

    #[test]
    fn ownership_is_preserved_for_every_annotation() {
        let types = ["utf8", "Gio.Cancellable", "Gdk.RGBA", "Gdk.Rectangle", "Gio.File"];
        for ownership in Ownership::ALL {
            for name in types {
                let ty = TypeRef::named(name).with_transfer(ownership);
                let mapped = map("Gdk", ty, UseContext::Return).unwrap();
                assert_eq!(
                    mapped.descriptor.ownership(),
                    Some(ownership),
                    "{name} with {ownership}"
                );
            }
            let array = TypeRef::array_of(
                TypeRef::named("utf8"),
                ArrayShape::zero_terminated(TypeRef::void()),
            )
            .with_transfer(ownership);
            let mapped = map("Gdk", array, UseContext::Return).unwrap();
            assert_eq!(mapped.descriptor.ownership(), Some(ownership));
        }
    }

    #[test]
    fn mapping_is_deterministic() {
        let ty = TypeRef::named("RGBA").with_transfer(Ownership::Borrowed);
        let first = map("Gdk", ty.clone(), UseContext::Parameter).unwrap();
        let second = map("Gdk", ty, UseContext::Parameter).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn trampoline_names() {
        assert_eq!(trampoline_for("Gio.AsyncReadyCallback"), Trampoline::AsyncReady);
        assert_eq!(trampoline_for("GLib.DestroyNotify"), Trampoline::DestroyNotify);
        assert_eq!(trampoline_for("Gtk.Callback"), Trampoline::Closure);
    }
}
