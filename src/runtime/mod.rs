//! The binding runtime.
//!
//! Ties the compiler, the identity registry and a dispatcher together:
//!
//! ```text
//!                 ┌──────────────────────────────┐
//!  register_namespace ──► BindingCompiler ──► CompiledNamespace
//!                 │            │                    │
//!                 │            ▼                    ▼
//!                 │     LayoutCalculator      NativeClass per class/record
//!                 │            │                    │
//!  invoke(plan) ──┼─► lower ──► NativeDispatcher::call ──► lift ──► Value
//!                 │                                   │
//!                 │                          ObjectRegistry::wrap
//!                 └──────────────────────────────┘
//! ```
//!
//! Namespaces are compiled on first use. Registering one registers a wrapper
//! class for each class, interface and record it declares and records their
//! parent and interface edges, so wrapping works for handles whose runtime
//! type is only known to the schema.

mod async_adapter;
mod call;
mod closures;

use std::sync::{Arc, PoisonError, RwLock};

use log::{debug, warn};
use nativebind_compiler::{
    BindingCompiler, CallPlan, CompiledField, CompiledNamespace, FieldLayout, runtime_type_name,
};
use nativebind_core::model::{FieldInfo, Repository, TypeDecl, TypeRef, split_qualified};
use nativebind_core::{
    ArrayLength, BindError, BindResult, BindingOptions, FfiDescriptor, MarshalError, NativeHandle,
    Ownership, RegistrationError,
};
use nativebind_registry::{
    ManagedWrapper, NativeClass, NativeReleaser, ObjectRegistry, ParentLookup, TypeHierarchy,
    TypeIntrospector,
};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::dispatcher::NativeDispatcher;
use crate::value::Value;

pub use call::CallResult;
pub use closures::ClosureTable;

/// Qualified name of the native error record.
const ERROR_RECORD: &str = "GLib.Error";

// ============================================================================
// Type system view
// ============================================================================

/// Runtime type queries: the dispatcher first, the schema hierarchy second.
struct RuntimeTypes<D> {
    dispatcher: Arc<D>,
    hierarchy: RwLock<TypeHierarchy>,
}

impl<D: NativeDispatcher> ParentLookup for RuntimeTypes<D> {
    fn parent_of(&self, type_name: &str) -> Option<String> {
        self.dispatcher.parent_of(type_name).or_else(|| {
            self.hierarchy
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .parent(type_name)
                .map(str::to_string)
        })
    }
}

impl<D: NativeDispatcher> TypeIntrospector for RuntimeTypes<D> {
    fn runtime_type_of(&self, handle: NativeHandle) -> Option<String> {
        self.dispatcher.runtime_type_of(handle)
    }
}

/// Releases wrapper references through the dispatcher.
struct DispatchReleaser<D> {
    dispatcher: Arc<D>,
}

impl<D: NativeDispatcher> NativeReleaser for DispatchReleaser<D> {
    fn release(&self, handle: NativeHandle, class: &NativeClass) {
        if let Err(err) = self.dispatcher.release(handle, class.kind, class.hooks.as_ref()) {
            warn!("failed to release {} {handle}: {err}", class.type_name);
        }
    }
}

// ============================================================================
// Runtime
// ============================================================================

/// Marshals managed values through compiled bindings and a dispatcher.
pub struct Runtime<D: NativeDispatcher + 'static> {
    dispatcher: Arc<D>,
    compiler: BindingCompiler,
    objects: Arc<ObjectRegistry>,
    types: Arc<RuntimeTypes<D>>,
    namespaces: RwLock<FxHashMap<String, Arc<CompiledNamespace>>>,
    closures: Arc<ClosureTable>,
    /// Layout of the native error record: domain, code, message.
    error_layout: Vec<FieldLayout>,
}

impl<D: NativeDispatcher + 'static> Runtime<D> {
    /// Create a runtime with default options.
    pub fn new(repository: Arc<Repository>, dispatcher: Arc<D>) -> Self {
        Self::with_options(repository, dispatcher, BindingOptions::default())
    }

    /// Create a runtime. The pointer size always follows the dispatcher.
    pub fn with_options(
        repository: Arc<Repository>,
        dispatcher: Arc<D>,
        options: BindingOptions,
    ) -> Self {
        let options = options.with_pointer_size(dispatcher.pointer_size());
        let compiler = BindingCompiler::for_repository(repository, options);

        let types = Arc::new(RuntimeTypes {
            dispatcher: Arc::clone(&dispatcher),
            hierarchy: RwLock::new(TypeHierarchy::new()),
        });
        let releaser = Arc::new(DispatchReleaser {
            dispatcher: Arc::clone(&dispatcher),
        });
        let introspector: Arc<dyn TypeIntrospector> = types.clone();
        let objects = Arc::new(ObjectRegistry::new(introspector).with_releaser(releaser));

        let error_fields = [
            FieldInfo::new("domain", TypeRef::named("guint32")),
            FieldInfo::new("code", TypeRef::named("gint")),
            FieldInfo::new("message", TypeRef::named("utf8")),
        ];
        let error_layout = compiler.layouts().calculate_layout("GLib", &error_fields, true);

        Self {
            dispatcher,
            compiler,
            objects,
            types,
            namespaces: RwLock::new(FxHashMap::default()),
            closures: Arc::new(ClosureTable::new()),
            error_layout,
        }
    }

    pub fn dispatcher(&self) -> &Arc<D> {
        &self.dispatcher
    }

    pub fn compiler(&self) -> &BindingCompiler {
        &self.compiler
    }

    pub fn objects(&self) -> &ObjectRegistry {
        &self.objects
    }

    pub fn closures(&self) -> &ClosureTable {
        &self.closures
    }

    /// Whether runtime type `type_name` is `ancestor` or derives from it.
    pub fn is_a(&self, type_name: &str, ancestor: &str) -> bool {
        let mut seen = FxHashSet::default();
        let mut current = Some(type_name.to_string());
        while let Some(name) = current {
            if name == ancestor {
                return true;
            }
            if !seen.insert(name.clone()) {
                return false;
            }
            current = self.types.parent_of(&name);
        }
        false
    }

    // ==========================================================================
    // Namespaces
    // ==========================================================================

    /// Compile `name` and register its wrapper classes and type edges.
    ///
    /// Namespaces holding the parents of its classes are registered too.
    /// Registering a namespace again returns the cached bindings.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn register_namespace(&self, name: &str) -> BindResult<Arc<CompiledNamespace>> {
        if let Some(existing) = self.namespace(name) {
            return Ok(existing);
        }

        let compiled = Arc::new(self.compiler.compile_namespace(name)?);
        let library = compiled.library.clone();
        let mut dependencies = Vec::new();

        {
            let mut hierarchy = self
                .types
                .hierarchy
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            for class in &compiled.classes {
                let mut native = NativeClass::new(&class.type_name, class.kind)
                    .with_library(&library);
                if let Some(hooks) = &class.hooks {
                    native = native.with_hooks(hooks.clone());
                }
                if let Some(get_type) = &class.get_type {
                    native = native.with_get_type(get_type);
                }
                if let Some(shape) = &class.shape {
                    native = native.with_size(shape.size());
                }
                self.register_class(native)?;

                hierarchy.add_type(&class.type_name);
                if let Some(parent) = &class.parent {
                    hierarchy.set_parent(&class.type_name, &self.schema_type_name(parent));
                    dependencies.push(parent.clone());
                }
                for interface in &class.interfaces {
                    hierarchy.add_interface(&class.type_name, &self.schema_type_name(interface));
                }
            }
        }

        for record in &compiled.records {
            let mut native = NativeClass::new(&record.type_name, record.kind)
                .with_library(&library)
                .with_size(record.shape.size());
            if let Some(get_type) = &record.get_type {
                native = native.with_get_type(get_type);
            }
            self.register_class(native)?;
        }

        let compiled = {
            let mut namespaces = self.namespaces.write().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(
                namespaces
                    .entry(compiled.name.clone())
                    .or_insert_with(|| Arc::clone(&compiled)),
            )
        };
        debug!(
            "registered namespace '{}': {} classes, {} records, {} skipped",
            compiled.name,
            compiled.classes.len(),
            compiled.records.len(),
            compiled.skipped.len()
        );

        for parent in dependencies {
            if let (Some(namespace), _) = split_qualified(&parent) {
                if namespace != compiled.name {
                    self.register_namespace(namespace)?;
                }
            }
        }
        Ok(compiled)
    }

    /// Bindings of an already registered namespace.
    pub fn namespace(&self, name: &str) -> Option<Arc<CompiledNamespace>> {
        self.namespaces
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    fn register_class(&self, class: NativeClass) -> BindResult<()> {
        match self.objects.register_class(class) {
            Ok(_) => Ok(()),
            Err(RegistrationError::DuplicateClass(name)) => {
                debug!("class '{name}' already registered; keeping the existing wrapper");
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Bindings of the namespace owning qualified type `qualified`, registering it if needed.
    fn namespace_of(&self, qualified: &str) -> BindResult<Arc<CompiledNamespace>> {
        match split_qualified(qualified) {
            (Some(namespace), _) => self.register_namespace(namespace),
            (None, _) => Err(MarshalError::UnknownType(qualified.to_string()).into()),
        }
    }

    /// Runtime type name of a schema type, without compiling its namespace.
    pub fn schema_type_name(&self, qualified: &str) -> String {
        let Some(resolved) = self.compiler.repository().resolve_qualified(qualified) else {
            return qualified.to_string();
        };
        match resolved.decl {
            TypeDecl::Class(c) => {
                runtime_type_name(c.type_name.as_deref(), c.c_type.as_deref(), qualified)
            }
            TypeDecl::Interface(i) => {
                runtime_type_name(i.type_name.as_deref(), i.c_type.as_deref(), qualified)
            }
            TypeDecl::Record(r) | TypeDecl::Union(r) => {
                runtime_type_name(r.type_name.as_deref(), r.c_type.as_deref(), qualified)
            }
            _ => qualified.to_string(),
        }
    }

    // ==========================================================================
    // Calls
    // ==========================================================================

    /// Call the namespace-level function `name`.
    pub fn call_function(
        &self,
        namespace: &str,
        name: &str,
        args: &[Value],
    ) -> BindResult<CallResult> {
        let compiled = self.register_namespace(namespace)?;
        let plan = compiled
            .function(name)
            .ok_or_else(|| MarshalError::UnknownCallable(format!("{namespace}.{name}")))?;
        self.invoke(plan, None, args)
    }

    /// Call method or static function `name` of class or record `owner`.
    pub fn call_method(
        &self,
        owner: &str,
        name: &str,
        instance: Option<&Value>,
        args: &[Value],
    ) -> BindResult<CallResult> {
        let plan = self.callable(owner, name, false)?;
        self.invoke(&plan, instance, args)
    }

    /// Call constructor `name` of `owner` and return the new instance.
    pub fn construct(&self, owner: &str, name: &str, args: &[Value]) -> BindResult<Value> {
        let plan = self.callable(owner, name, true)?;
        Ok(self.invoke(&plan, None, args)?.value)
    }

    fn callable(&self, owner: &str, name: &str, constructor: bool) -> BindResult<CallPlan> {
        let compiled = self.namespace_of(owner)?;
        let (constructors, methods, functions) = if let Some(class) = compiled.class(owner) {
            (&class.constructors, &class.methods, &class.functions)
        } else if let Some(record) = compiled.record(owner) {
            (&record.constructors, &record.methods, &record.functions)
        } else {
            return Err(MarshalError::UnknownType(owner.to_string()).into());
        };

        let find = |plans: &[CallPlan]| plans.iter().find(|p| p.name == name).cloned();
        let plan = if constructor {
            find(&constructors[..])
        } else {
            find(&methods[..]).or_else(|| find(&functions[..]))
        };
        plan.ok_or_else(|| MarshalError::UnknownCallable(format!("{owner}.{name}")).into())
    }

    // ==========================================================================
    // Wrapping
    // ==========================================================================

    /// Wrap an object handle, resolving its class from its runtime type.
    pub fn wrap(&self, handle: NativeHandle, ownership: Ownership) -> BindResult<Value> {
        Ok(self
            .objects
            .wrap(handle, None, ownership)?
            .map_or(Value::Null, Value::Object))
    }

    /// Wrap a handle as an instance of schema type `qualified`.
    pub fn wrap_as(
        &self,
        handle: NativeHandle,
        qualified: &str,
        ownership: Ownership,
    ) -> BindResult<Value> {
        self.namespace_of(qualified)?;
        let target = self.schema_type_name(qualified);
        Ok(self
            .objects
            .wrap(handle, Some(&target), ownership)?
            .map_or(Value::Null, Value::Object))
    }

    // ==========================================================================
    // Records
    // ==========================================================================

    /// Allocate a zeroed instance of record `qualified`, owned by the returned wrapper.
    pub fn alloc_record(&self, qualified: &str) -> BindResult<ManagedWrapper> {
        let compiled = self.namespace_of(qualified)?;
        let record = compiled
            .record(qualified)
            .ok_or_else(|| MarshalError::UnknownRecord(qualified.to_string()))?;
        let handle = self.dispatcher.alloc(
            record.shape.size(),
            Some(&record.type_name),
            Some(&compiled.library),
        )?;
        self.objects
            .wrap(handle, Some(&record.type_name), Ownership::Full)?
            .ok_or_else(|| MarshalError::UnknownRecord(qualified.to_string()).into())
    }

    /// Address of element `index` in a C array of inline `qualified` records.
    pub fn element(&self, base: &Value, qualified: &str, index: usize) -> BindResult<Value> {
        let layout = self
            .compiler
            .layouts()
            .type_layout(qualified)
            .ok_or_else(|| MarshalError::UnknownRecord(qualified.to_string()))?;
        let base = non_null(base, qualified)?;
        let handle = layout
            .element_offset(index)
            .and_then(|offset| base.offset(offset))
            .ok_or_else(|| MarshalError::InvalidValue {
            name: qualified.to_string(),
            expected: "addressable array",
            actual: "overflowing offset",
        })?;
        self.wrap_as(handle, qualified, Ownership::None)
    }

    /// Read field `field` of `instance`, an instance of class or record `owner`.
    pub fn read_field(&self, instance: &Value, owner: &str, field: &str) -> BindResult<Value> {
        let compiled = self.field(owner, field)?;
        if !compiled.readable {
            return Err(field_access(owner, field, "readable"));
        }
        let base = non_null(instance, owner)?;
        let offset = compiled.layout.offset;

        if let Some((element, element_size, count)) = inline_array(&compiled) {
            let mut items = Vec::with_capacity(count);
            for i in 0..count {
                let raw = self.dispatcher.read(base, element, offset + i * element_size)?;
                items.push(self.lift_borrowed(element, raw)?);
            }
            return Ok(Value::Array(items));
        }

        let raw = self.dispatcher.read(base, &compiled.descriptor, offset)?;
        self.lift_borrowed(&compiled.descriptor, raw)
    }

    /// Write `value` into field `field` of `instance`.
    pub fn write_field(
        &self,
        instance: &Value,
        owner: &str,
        field: &str,
        value: &Value,
    ) -> BindResult<()> {
        let compiled = self.field(owner, field)?;
        if !compiled.writable {
            return Err(field_access(owner, field, "writable"));
        }
        let base = non_null(instance, owner)?;
        let offset = compiled.layout.offset;

        if let Some((element, element_size, count)) = inline_array(&compiled) {
            let items = value.as_array().ok_or_else(|| MarshalError::InvalidValue {
                name: format!("{owner}.{field}"),
                expected: "array",
                actual: value.type_name(),
            })?;
            if items.len() > count {
                return Err(MarshalError::InvalidValue {
                    name: format!("{owner}.{field}"),
                    expected: "array within the fixed length",
                    actual: "longer array",
                }
                .into());
            }
            for (i, item) in items.iter().enumerate() {
                let lowered = self.lower_stored(element, item)?;
                self.dispatcher
                    .write(base, element, offset + i * element_size, &lowered)?;
            }
            return Ok(());
        }

        let lowered = self.lower_stored(&compiled.descriptor, value)?;
        self.dispatcher
            .write(base, &compiled.descriptor, offset, &lowered)?;
        Ok(())
    }

    fn field(&self, owner: &str, name: &str) -> BindResult<CompiledField> {
        let compiled = self.namespace_of(owner)?;
        let fields = if let Some(record) = compiled.record(owner) {
            if record.shape.is_opaque() {
                return Err(MarshalError::OpaqueRecord(owner.to_string()).into());
            }
            &record.fields
        } else if let Some(class) = compiled.class(owner) {
            &class.fields
        } else {
            return Err(MarshalError::UnknownRecord(owner.to_string()).into());
        };
        fields
            .iter()
            .find(|f| f.name() == name)
            .cloned()
            .ok_or_else(|| {
                MarshalError::UnknownField {
                    record: owner.to_string(),
                    field: name.to_string(),
                }
                .into()
            })
    }

    /// Lift a value read out of native memory the runtime does not own.
    fn lift_borrowed(&self, descriptor: &FfiDescriptor, raw: Value) -> BindResult<Value> {
        let Some(handle) = raw.as_handle() else {
            return Ok(raw);
        };
        if handle.is_null() {
            return Ok(Value::Null);
        }
        match descriptor {
            FfiDescriptor::Object { .. } => self.wrap(handle, Ownership::None),
            FfiDescriptor::Boxed { inner_type, .. } | FfiDescriptor::Struct { inner_type, .. } => {
                self.wrap_as(handle, inner_type, Ownership::None)
            }
            _ => Ok(raw),
        }
    }

    /// Lower a value stored into native memory that outlives the call.
    fn lower_stored(&self, descriptor: &FfiDescriptor, value: &Value) -> BindResult<Value> {
        match (descriptor, value) {
            (
                FfiDescriptor::Array {
                    element,
                    element_size,
                    length,
                    ..
                },
                Value::Array(items),
            ) => {
                let count = items.len() + usize::from(*length == ArrayLength::ZeroTerminated);
                let handle = self.dispatcher.alloc(count * element_size, None, None)?;
                for (i, item) in items.iter().enumerate() {
                    let lowered = self.lower_stored(element, item)?;
                    self.dispatcher
                        .write(handle, element, i * element_size, &lowered)?;
                }
                Ok(Value::Pointer(handle))
            }
            (_, Value::Object(wrapper)) => Ok(Value::Pointer(wrapper.handle())),
            _ => Ok(value.clone()),
        }
    }
}

impl<D: NativeDispatcher + 'static> std::fmt::Debug for Runtime<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let namespaces = self
            .namespaces
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect::<Vec<_>>();
        f.debug_struct("Runtime")
            .field("namespaces", &namespaces)
            .field("objects", &self.objects)
            .field("closures", &self.closures.len())
            .finish_non_exhaustive()
    }
}

/// Element descriptor, stride and count of a field stored as an inline array.
fn inline_array(field: &CompiledField) -> Option<(&FfiDescriptor, usize, usize)> {
    match &field.descriptor {
        FfiDescriptor::Array {
            element,
            element_size,
            length: ArrayLength::Fixed(count),
            ..
        } if field.inline => Some((element, *element_size, *count)),
        _ => None,
    }
}

fn non_null(instance: &Value, owner: &str) -> BindResult<NativeHandle> {
    instance
        .as_handle()
        .filter(|h| !h.is_null())
        .ok_or_else(|| MarshalError::MissingInstance(owner.to_string()).into())
}

fn field_access(owner: &str, field: &str, access: &'static str) -> BindError {
    MarshalError::FieldAccess {
        record: owner.to_string(),
        field: field.to_string(),
        access,
    }
    .into()
}
