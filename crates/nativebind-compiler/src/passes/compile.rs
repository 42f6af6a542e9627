//! Namespace compilation pass.
//!
//! Walks one namespace of the interface model and compiles every class,
//! interface, record, union and function into call plans and layouts.
//!
//! ## Responsibilities
//!
//! - Build call plans for functions, methods and constructors
//! - Pair start/finish methods into async operations
//! - Compile signal handler contracts
//! - Compute record shapes and public field descriptors
//! - Record every unsupported item as skipped instead of failing
//!
//! Mapping failures never abort the pass: the enclosing callable, field or
//! signal is left out and listed in [`CompiledNamespace::skipped`].

use std::sync::Arc;

use log::debug;
use nativebind_core::model::{
    CallableInfo, ClassInfo, FieldInfo, InterfaceInfo, Namespace, RecordInfo, Repository,
    SignalInfo, TypeRef,
};
use nativebind_core::{BindingOptions, FfiDescriptor, MappingError, ObjectKind};

use crate::async_pairing::{AsyncPlan, find_async_pairs};
use crate::call_builder::{CallDescriptorBuilder, CallPlan, Owner, SignalPlan};
use crate::layout::{LayoutCalculator, RecordShape};
use crate::mapper::{TypeMapper, UseContext, class_hooks};

use super::output::{
    CompiledClass, CompiledField, CompiledNamespace, CompiledRecord, SkipReason, SkippedItem,
};

/// Compiles namespaces of a repository into bindings.
#[derive(Debug, Clone)]
pub struct BindingCompiler {
    layouts: Arc<LayoutCalculator>,
    options: BindingOptions,
}

impl BindingCompiler {
    /// Create a compiler sharing `layouts` (and its repository).
    pub fn new(layouts: Arc<LayoutCalculator>, options: BindingOptions) -> Self {
        Self { layouts, options }
    }

    /// Convenience constructor building a fresh layout calculator.
    pub fn for_repository(repository: Arc<Repository>, options: BindingOptions) -> Self {
        let layouts = Arc::new(LayoutCalculator::new(repository, options.pointer_size));
        Self::new(layouts, options)
    }

    /// The repository being compiled.
    pub fn repository(&self) -> &Arc<Repository> {
        self.layouts.repository()
    }

    /// The shared layout calculator.
    pub fn layouts(&self) -> &Arc<LayoutCalculator> {
        &self.layouts
    }

    /// Compilation options.
    pub fn options(&self) -> &BindingOptions {
        &self.options
    }

    /// Compile the namespace called `name`.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn compile_namespace(&self, name: &str) -> Result<CompiledNamespace, MappingError> {
        let namespace = self
            .repository()
            .namespace(name)
            .ok_or_else(|| MappingError::UnknownNamespace(name.to_string()))?;

        let mapper = TypeMapper::new(&self.layouts, &self.options, &namespace.name);
        let builder =
            CallDescriptorBuilder::new(mapper, namespace.library(), self.options.pointer_size);
        let mut pass = NamespacePass {
            namespace,
            builder,
            layouts: &self.layouts,
            options: &self.options,
            skipped: Vec::new(),
        };
        let compiled = pass.run();

        debug!(
            "compiled namespace '{}': {} classes, {} records, {} functions, {} skipped",
            compiled.name,
            compiled.classes.len(),
            compiled.records.len(),
            compiled.functions.len(),
            compiled.skipped.len()
        );
        Ok(compiled)
    }

    /// Compile every namespace of the repository, in load order.
    pub fn compile_all(&self) -> Vec<CompiledNamespace> {
        self.repository()
            .namespaces()
            .iter()
            .filter_map(|ns| self.compile_namespace(&ns.name).ok())
            .collect()
    }
}

/// State of one namespace compilation.
struct NamespacePass<'a> {
    namespace: &'a Namespace,
    builder: CallDescriptorBuilder<'a>,
    layouts: &'a LayoutCalculator,
    options: &'a BindingOptions,
    skipped: Vec<SkippedItem>,
}

impl<'a> NamespacePass<'a> {
    fn run(&mut self) -> CompiledNamespace {
        let namespace = self.namespace;
        let functions = self.compile_callables(None, &namespace.functions);

        let mut classes =
            Vec::with_capacity(namespace.classes.len() + namespace.interfaces.len());
        for class in &namespace.classes {
            classes.push(self.compile_class(class));
        }
        for interface in &namespace.interfaces {
            classes.push(self.compile_interface(interface));
        }

        let records = namespace
            .records
            .iter()
            .chain(&namespace.unions)
            .filter_map(|record| self.compile_record(record))
            .collect();

        CompiledNamespace {
            name: namespace.name.clone(),
            library: namespace.library().to_string(),
            functions,
            classes,
            records,
            skipped: std::mem::take(&mut self.skipped),
        }
    }

    fn compile_class(&mut self, class: &ClassInfo) -> CompiledClass {
        let qualified = self.namespace.qualify(&class.name);
        let owner = self.builder.owner(&qualified);
        let hooks = class_hooks(class);
        let kind = owner.as_ref().map_or(ObjectKind::Gobject, |o| o.kind);

        let shape = if class.fields.is_empty() {
            None
        } else {
            self.layouts.record_shape(&qualified)
        };
        let fields = match &shape {
            Some(shape) => self.compile_fields(&qualified, &class.fields, shape),
            None => Vec::new(),
        };

        let methods = self.compile_callables(owner.as_ref(), &class.methods);
        let async_methods = self.compile_async(&qualified, &class.methods, &methods);

        CompiledClass {
            type_name: runtime_type_name(
                class.type_name.as_deref(),
                class.c_type.as_deref(),
                &qualified,
            ),
            kind,
            parent: class
                .parent
                .as_deref()
                .map(|p| self.repository().qualify(&self.namespace.name, p)),
            interfaces: self.qualify_all(&class.interfaces),
            hooks,
            get_type: class.get_type.clone(),
            is_abstract: class.is_abstract,
            shape,
            fields,
            constructors: self.compile_callables(owner.as_ref(), &class.constructors),
            functions: self.compile_callables(owner.as_ref(), &class.functions),
            signals: self.compile_signals(owner.as_ref(), &qualified, &class.signals),
            methods,
            async_methods,
            name: qualified,
        }
    }

    fn compile_interface(&mut self, interface: &InterfaceInfo) -> CompiledClass {
        let qualified = self.namespace.qualify(&interface.name);
        let owner = self.builder.owner(&qualified);
        let methods = self.compile_callables(owner.as_ref(), &interface.methods);
        let async_methods = self.compile_async(&qualified, &interface.methods, &methods);

        CompiledClass {
            type_name: runtime_type_name(
                interface.type_name.as_deref(),
                interface.c_type.as_deref(),
                &qualified,
            ),
            kind: ObjectKind::Interface,
            parent: None,
            interfaces: self.qualify_all(&interface.prerequisites),
            hooks: None,
            get_type: interface.get_type.clone(),
            is_abstract: true,
            shape: None,
            fields: Vec::new(),
            constructors: Vec::new(),
            functions: self.compile_callables(owner.as_ref(), &interface.functions),
            signals: self.compile_signals(owner.as_ref(), &qualified, &interface.signals),
            methods,
            async_methods,
            name: qualified,
        }
    }

    fn compile_record(&mut self, record: &RecordInfo) -> Option<CompiledRecord> {
        let qualified = self.namespace.qualify(&record.name);
        let shape = self.layouts.record_shape(&qualified)?;
        let owner = self.builder.owner(&qualified);

        Some(CompiledRecord {
            type_name: runtime_type_name(
                record.type_name.as_deref(),
                record.c_type.as_deref(),
                &qualified,
            ),
            kind: if record.is_boxed() {
                ObjectKind::Boxed
            } else {
                ObjectKind::Struct
            },
            get_type: record.get_type.clone(),
            fields: self.compile_fields(&qualified, &record.fields, &shape),
            methods: self.compile_callables(owner.as_ref(), &record.methods),
            constructors: self.compile_callables(owner.as_ref(), &record.constructors),
            functions: self.compile_callables(owner.as_ref(), &record.functions),
            shape,
            name: qualified,
        })
    }

    fn compile_fields(
        &mut self,
        owner: &str,
        fields: &[FieldInfo],
        shape: &RecordShape,
    ) -> Vec<CompiledField> {
        let mut compiled = Vec::new();
        for layout in shape.fields() {
            let Some(field) = fields.iter().find(|f| f.name == layout.field) else {
                continue;
            };
            match self.builder.mapper().map(&field.type_ref, UseContext::Field) {
                Ok(mapped) => compiled.push(CompiledField {
                    layout: layout.clone(),
                    inline: is_inline_field(&field.type_ref, &mapped.descriptor),
                    descriptor: mapped.descriptor,
                    readable: field.readable,
                    writable: field.writable,
                }),
                Err(err) => self.skip(Some(owner), &field.name, err.into()),
            }
        }
        compiled
    }

    fn compile_callables(
        &mut self,
        owner: Option<&Owner>,
        callables: &[CallableInfo],
    ) -> Vec<CallPlan> {
        let mut plans = Vec::with_capacity(callables.len());
        for callable in callables {
            if callable.deprecated && self.options.skip_deprecated {
                self.skip(owner.map(|o| o.qualified.as_str()), &callable.name, SkipReason::Deprecated);
                continue;
            }
            if !callable.introspectable && !self.options.include_unintrospectable {
                self.skip(
                    owner.map(|o| o.qualified.as_str()),
                    &callable.name,
                    SkipReason::NotIntrospectable,
                );
                continue;
            }
            match self.builder.build(callable, owner) {
                Ok(plan) => plans.push(plan),
                Err(err) => self.skip(owner.map(|o| o.qualified.as_str()), &callable.name, err.into()),
            }
        }
        plans
    }

    fn compile_async(
        &self,
        owner: &str,
        methods: &[CallableInfo],
        compiled: &[CallPlan],
    ) -> Vec<AsyncPlan> {
        let find = |name: &str| compiled.iter().find(|p| p.name == name);
        let mut plans = Vec::new();
        for pair in find_async_pairs(methods) {
            let (Some(start), Some(finish)) = (find(&pair.start.name), find(&pair.finish.name))
            else {
                continue;
            };
            match AsyncPlan::new(pair.name(), start.clone(), finish.clone()) {
                Some(plan) => plans.push(plan),
                None => debug!(
                    "'{owner}.{}' and '{}' do not form an async pair",
                    pair.start.name, pair.finish.name
                ),
            }
        }
        plans
    }

    fn compile_signals(
        &mut self,
        owner: Option<&Owner>,
        qualified: &str,
        signals: &[SignalInfo],
    ) -> Vec<SignalPlan> {
        let Some(owner) = owner else {
            return Vec::new();
        };
        let mut plans = Vec::with_capacity(signals.len());
        for signal in signals {
            match self.builder.build_signal(signal, owner) {
                Ok(plan) => plans.push(plan),
                Err(err) => self.skip(Some(qualified), &signal.name, err.into()),
            }
        }
        plans
    }

    fn skip(&mut self, owner: Option<&str>, name: &str, reason: SkipReason) {
        let item = SkippedItem {
            owner: owner.map(str::to_string),
            name: name.to_string(),
            reason,
        };
        debug!("skipping '{}': {}", item.path(), item.reason);
        self.skipped.push(item);
    }

    fn repository(&self) -> &'a Repository {
        self.layouts.repository()
    }

    fn qualify_all(&self, names: &[String]) -> Vec<String> {
        names
            .iter()
            .map(|n| self.repository().qualify(&self.namespace.name, n))
            .collect()
    }
}

/// Runtime type name: registered name, else the C spelling, else the schema name.
/// Whether a field's value lives in the record itself rather than behind a pointer.
fn is_inline_field(type_ref: &TypeRef, descriptor: &FfiDescriptor) -> bool {
    match &type_ref.array {
        Some(shape) => shape.fixed_size.is_some() && !type_ref.is_pointer_spelled(),
        None => matches!(descriptor, FfiDescriptor::Struct { inline: true, .. }),
    }
}

pub fn runtime_type_name(type_name: Option<&str>, c_type: Option<&str>, qualified: &str) -> String {
    type_name.or(c_type).unwrap_or(qualified).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use nativebind_core::model::{ArrayShape, CallbackInfo, CallbackScope, ParamInfo};
    use nativebind_core::Ownership;

    fn repository() -> Arc<Repository> {
        Arc::new(Repository::new(vec![
            Namespace::new("GObject", "libgobject-2.0.so.0").with_class(
                ClassInfo::new("Object")
                    .with_type_name("GObject")
                    .with_field(FieldInfo::private("g_type_instance", TypeRef::named("gpointer")))
                    .with_field(FieldInfo::private("ref_count", TypeRef::named("guint")))
                    .with_field(FieldInfo::private("qdata", TypeRef::named("gpointer"))),
            ),
            Namespace::new("Demo", "libdemo.so.1")
                .with_class(
                    ClassInfo::new("Counter")
                        .with_type_name("DemoCounter")
                        .with_parent("GObject.Object")
                        .with_interface("Resettable")
                        .with_field(FieldInfo::private(
                            "parent_instance",
                            TypeRef::named("GObject.Object").with_c_type("GObject"),
                        ))
                        .with_field(FieldInfo::new("count", TypeRef::named("gint")))
                        .with_constructor(
                            CallableInfo::constructor("new", "demo_counter_new")
                                .returning(TypeRef::named("Counter").with_transfer(Ownership::Full)),
                        )
                        .with_method(
                            CallableInfo::method("increment", "demo_counter_increment")
                                .returning(TypeRef::named("gint")),
                        )
                        .with_method(
                            CallableInfo::method("log", "demo_counter_log")
                                .with_param(ParamInfo::new("format", TypeRef::named("utf8")))
                                .with_param(ParamInfo::new("...", TypeRef::named("va_list"))),
                        )
                        .with_method(
                            CallableInfo::method("old_reset", "demo_counter_old_reset")
                                .as_deprecated(),
                        )
                        .with_method(
                            CallableInfo::method("fetch_async", "demo_counter_fetch_async")
                                .with_param(
                                    ParamInfo::new("callback", TypeRef::named("AsyncReadyCallback"))
                                        .with_callback_slots(Some(1), None, CallbackScope::Async),
                                )
                                .with_param(ParamInfo::new("user_data", TypeRef::named("gpointer"))),
                        )
                        .with_method(
                            CallableInfo::method("fetch_finish", "demo_counter_fetch_finish")
                                .with_param(ParamInfo::new("result", TypeRef::named("AsyncResult")))
                                .returning(TypeRef::named("gint"))
                                .throwing(),
                        )
                        .with_signal(
                            SignalInfo::new("changed")
                                .with_param(ParamInfo::new("value", TypeRef::named("gint"))),
                        )
                        .with_signal(
                            SignalInfo::new("items")
                                .with_param(ParamInfo::new("list", TypeRef::named("GLib.List"))),
                        ),
                )
                .with_interface({
                    let mut iface = InterfaceInfo::new("Resettable")
                        .with_method(CallableInfo::method("reset", "demo_resettable_reset"));
                    iface.prerequisites.push("GObject.Object".into());
                    iface
                })
                .with_interface(InterfaceInfo::new("AsyncResult"))
                .with_callback(
                    CallbackInfo::new("AsyncReadyCallback")
                        .with_param(ParamInfo::new("source", TypeRef::named("GObject.Object")))
                        .with_param(ParamInfo::new("res", TypeRef::named("AsyncResult")))
                        .with_param(ParamInfo::new("data", TypeRef::named("gpointer"))),
                )
                .with_record(
                    RecordInfo::new("Point")
                        .with_field(FieldInfo::new("x", TypeRef::named("gdouble")))
                        .with_field(FieldInfo::new("y", TypeRef::named("gdouble")))
                        .with_method(
                            CallableInfo::method("distance", "demo_point_distance")
                                .with_param(ParamInfo::new("other", TypeRef::named("Point")))
                                .returning(TypeRef::named("gdouble")),
                        ),
                )
                .with_record(
                    RecordInfo::new("Color")
                        .boxed("DemoColor", "demo_color_get_type")
                        .with_field(FieldInfo::new("red", TypeRef::named("gfloat")))
                        .with_field(FieldInfo::new("names", TypeRef::named("GLib.HashTable"))),
                )
                .with_union(
                    RecordInfo::union("Value")
                        .with_field(FieldInfo::new("i", TypeRef::named("gint")))
                        .with_field(FieldInfo::new("d", TypeRef::named("gdouble"))),
                )
                .with_function(
                    CallableInfo::function("sum", "demo_sum")
                        .with_param(ParamInfo::new(
                            "values",
                            TypeRef::array_of(
                                TypeRef::named("gint"),
                                ArrayShape::with_length_param(TypeRef::void(), 1),
                            ),
                        ))
                        .with_param(ParamInfo::new("n_values", TypeRef::named("gsize")))
                        .returning(TypeRef::named("gint64")),
                )
                .with_function({
                    let mut hidden = CallableInfo::function("internal", "demo_internal");
                    hidden.introspectable = false;
                    hidden
                }),
        ]))
    }

    fn compile(options: BindingOptions) -> CompiledNamespace {
        BindingCompiler::for_repository(repository(), options.with_pointer_size(8))
            .compile_namespace("Demo")
            .unwrap()
    }

    #[test]
    fn unknown_namespace_is_an_error() {
        let compiler = BindingCompiler::for_repository(repository(), BindingOptions::default());
        assert_eq!(
            compiler.compile_namespace("Nope"),
            Err(MappingError::UnknownNamespace("Nope".into()))
        );
    }

    #[test]
    fn compiles_classes_with_hierarchy() {
        let ns = compile(BindingOptions::default());
        let counter = ns.class("Counter").unwrap();
        assert_eq!(counter.type_name, "DemoCounter");
        assert_eq!(counter.kind, ObjectKind::Gobject);
        assert_eq!(counter.parent.as_deref(), Some("GObject.Object"));
        assert_eq!(counter.interfaces, vec!["Demo.Resettable".to_string()]);
        assert!(counter.constructor("new").is_some());
        assert!(counter.method("increment").is_some());
    }

    #[test]
    fn class_fields_are_laid_out_after_parent() {
        let ns = compile(BindingOptions::default());
        let counter = ns.class("Counter").unwrap();
        let count = counter.fields.iter().find(|f| f.name() == "count").unwrap();
        assert_eq!(count.layout.offset, 24);
        assert_eq!(counter.shape.as_ref().unwrap().size(), 32);
    }

    #[test]
    fn unsupported_items_are_skipped_not_fatal() {
        let ns = compile(BindingOptions::default());
        assert!(ns.is_skipped("Demo.Counter.log"));
        assert!(ns.is_skipped("Demo.Counter.items"));
        assert!(ns.is_skipped("Demo.Color.names"));
        assert!(ns.is_skipped("internal"));

        let counter = ns.class("Counter").unwrap();
        assert!(counter.method("log").is_none());
        assert!(counter.signal("changed").is_some());

        let color = ns.record("Color").unwrap();
        assert!(color.field("red").is_some());
        assert!(color.field("names").is_none());
    }

    #[test]
    fn deprecated_callables_follow_options() {
        let ns = compile(BindingOptions::default());
        assert!(ns.class("Counter").unwrap().method("old_reset").is_some());

        let ns = compile(BindingOptions::default().skip_deprecated());
        assert!(ns.class("Counter").unwrap().method("old_reset").is_none());
        let skipped = ns
            .skipped
            .iter()
            .find(|s| s.name == "old_reset")
            .unwrap();
        assert_eq!(skipped.reason, SkipReason::Deprecated);
    }

    #[test]
    fn unintrospectable_callables_can_be_included() {
        let ns = compile(BindingOptions::default().include_unintrospectable());
        assert!(ns.function("internal").is_some());
    }

    #[test]
    fn async_pairs_are_compiled() {
        let ns = compile(BindingOptions::default());
        let counter = ns.class("Counter").unwrap();
        let fetch = counter.async_method("fetch").unwrap();
        assert_eq!(fetch.arity(), 0);
        assert!(fetch.finish.throws);
        // Both halves stay callable on their own.
        assert!(counter.method("fetch_async").is_some());
        assert!(counter.method("fetch_finish").is_some());
    }

    #[test]
    fn records_and_unions() {
        let ns = compile(BindingOptions::default());
        let point = ns.record("Point").unwrap();
        assert_eq!(point.kind, ObjectKind::Struct);
        assert_eq!(point.shape.size(), 16);
        assert_eq!(point.field("y").unwrap().layout.offset, 8);
        assert_eq!(point.methods.len(), 1);

        let color = ns.record("Color").unwrap();
        assert_eq!(color.kind, ObjectKind::Boxed);
        assert_eq!(color.type_name, "DemoColor");

        let value = ns.record("Value").unwrap();
        assert_eq!(value.shape.size(), 8);
        assert!(value.fields.iter().all(|f| f.layout.offset == 0));
    }

    #[test]
    fn fixed_arrays_and_embedded_records_are_inline_fields() {
        let repo = Arc::new(Repository::new(vec![
            Namespace::new("Demo", "libdemo.so.1")
                .with_record(
                    RecordInfo::new("Point")
                        .with_field(FieldInfo::new("x", TypeRef::named("gdouble"))),
                )
                .with_record(
                    RecordInfo::new("Path")
                        .with_field(FieldInfo::new(
                            "weights",
                            TypeRef::array_of(
                                TypeRef::named("gint"),
                                ArrayShape::fixed(TypeRef::named("gint"), 4),
                            ),
                        ))
                        .with_field(FieldInfo::new(
                            "origin",
                            TypeRef::named("Point").with_c_type("DemoPoint"),
                        ))
                        .with_field(FieldInfo::new(
                            "next",
                            TypeRef::named("Point").with_c_type("DemoPoint*"),
                        )),
                ),
        ]));
        let ns = BindingCompiler::for_repository(repo, BindingOptions::default().with_pointer_size(8))
            .compile_namespace("Demo")
            .unwrap();
        let path = ns.record("Path").unwrap();
        assert!(path.field("weights").unwrap().inline);
        assert_eq!(path.field("weights").unwrap().layout.size, 16);
        assert!(path.field("origin").unwrap().inline);
        assert!(!path.field("next").unwrap().inline);
    }

    #[test]
    fn interfaces_compile_as_interface_kind() {
        let ns = compile(BindingOptions::default());
        let resettable = ns.class("Resettable").unwrap();
        assert_eq!(resettable.kind, ObjectKind::Interface);
        assert_eq!(resettable.interfaces, vec!["GObject.Object".to_string()]);
        assert!(resettable.method("reset").is_some());
    }

    #[test]
    fn functions_hide_length_companions() {
        let ns = compile(BindingOptions::default());
        let sum = ns.function("sum").unwrap();
        assert_eq!(sum.arity(), 1);
        assert_eq!(sum.args.len(), 2);
    }

    #[test]
    fn compile_all_covers_every_namespace() {
        let compiler = BindingCompiler::for_repository(repository(), BindingOptions::default());
        let all = compiler.compile_all();
        assert_eq!(
            all.iter().map(|ns| ns.name.as_str()).collect::<Vec<_>>(),
            vec!["GObject", "Demo"]
        );
    }
}
