//! Output of the namespace compilation pass.

use nativebind_core::{FfiDescriptor, MappingError, ObjectKind, RefHooks};
use thiserror::Error;

use crate::async_pairing::AsyncPlan;
use crate::call_builder::{CallPlan, SignalPlan};
use crate::layout::{FieldLayout, RecordShape};

/// Why an item was left out of the bindings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SkipReason {
    /// The item uses a shape the mapper cannot represent.
    #[error(transparent)]
    Unsupported(#[from] MappingError),

    /// Deprecated, and the options exclude deprecated callables.
    #[error("deprecated")]
    Deprecated,

    /// Marked as not introspectable.
    #[error("not introspectable")]
    NotIntrospectable,
}

/// An item excluded from generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedItem {
    /// Qualified name of the enclosing type; `None` for namespace functions.
    pub owner: Option<String>,
    /// Callable, field or signal name.
    pub name: String,
    pub reason: SkipReason,
}

impl SkippedItem {
    /// Qualified display path of the skipped item.
    pub fn path(&self) -> String {
        match &self.owner {
            Some(owner) => format!("{owner}.{}", self.name),
            None => self.name.clone(),
        }
    }
}

/// A public field with its placement and descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledField {
    pub layout: FieldLayout,
    /// Descriptor used to read and write the field in place.
    pub descriptor: FfiDescriptor,
    /// Stored in place: fixed-size arrays and by-value records.
    pub inline: bool,
    pub readable: bool,
    pub writable: bool,
}

impl CompiledField {
    /// Field name.
    pub fn name(&self) -> &str {
        &self.layout.field
    }
}

/// A compiled record or union.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledRecord {
    /// Qualified schema name.
    pub name: String,
    /// Runtime type name.
    pub type_name: String,
    /// [`ObjectKind::Boxed`] or [`ObjectKind::Struct`].
    pub kind: ObjectKind,
    pub get_type: Option<String>,
    pub shape: RecordShape,
    pub fields: Vec<CompiledField>,
    pub methods: Vec<CallPlan>,
    pub constructors: Vec<CallPlan>,
    pub functions: Vec<CallPlan>,
}

impl CompiledRecord {
    /// Find a compiled field by name.
    pub fn field(&self, name: &str) -> Option<&CompiledField> {
        self.fields.iter().find(|f| f.name() == name)
    }
}

/// A compiled class or interface.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledClass {
    /// Qualified schema name.
    pub name: String,
    /// Runtime type name.
    pub type_name: String,
    /// [`ObjectKind::Gobject`], [`ObjectKind::Fundamental`] or [`ObjectKind::Interface`].
    pub kind: ObjectKind,
    /// Qualified parent class.
    pub parent: Option<String>,
    /// Qualified implemented interfaces (prerequisites for interfaces).
    pub interfaces: Vec<String>,
    pub hooks: Option<RefHooks>,
    pub get_type: Option<String>,
    pub is_abstract: bool,
    /// Instance struct layout, for classes that declare fields.
    pub shape: Option<RecordShape>,
    pub fields: Vec<CompiledField>,
    pub methods: Vec<CallPlan>,
    pub constructors: Vec<CallPlan>,
    pub functions: Vec<CallPlan>,
    pub async_methods: Vec<AsyncPlan>,
    pub signals: Vec<SignalPlan>,
}

impl CompiledClass {
    /// Find a compiled method by name.
    pub fn method(&self, name: &str) -> Option<&CallPlan> {
        self.methods.iter().find(|m| m.name == name)
    }

    /// Find a compiled constructor by name.
    pub fn constructor(&self, name: &str) -> Option<&CallPlan> {
        self.constructors.iter().find(|m| m.name == name)
    }

    /// Find a compiled async operation by name.
    pub fn async_method(&self, name: &str) -> Option<&AsyncPlan> {
        self.async_methods.iter().find(|m| m.name == name)
    }

    /// Find a compiled signal by name.
    pub fn signal(&self, name: &str) -> Option<&SignalPlan> {
        self.signals.iter().find(|s| s.name == name)
    }
}

/// Bindings for one namespace.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CompiledNamespace {
    pub name: String,
    /// Primary shared library.
    pub library: String,
    pub functions: Vec<CallPlan>,
    pub classes: Vec<CompiledClass>,
    pub records: Vec<CompiledRecord>,
    /// Items excluded from generation, in discovery order.
    pub skipped: Vec<SkippedItem>,
}

impl CompiledNamespace {
    /// Find a class or interface by qualified or local name.
    pub fn class(&self, name: &str) -> Option<&CompiledClass> {
        let qualified = self.qualify(name);
        self.classes.iter().find(|c| c.name == qualified)
    }

    /// Find a record by qualified or local name.
    pub fn record(&self, name: &str) -> Option<&CompiledRecord> {
        let qualified = self.qualify(name);
        self.records.iter().find(|r| r.name == qualified)
    }

    /// Find a namespace-level function by name.
    pub fn function(&self, name: &str) -> Option<&CallPlan> {
        self.functions.iter().find(|f| f.name == name)
    }

    /// Whether the item at `path` (`Owner.name` or a function name) was skipped.
    pub fn is_skipped(&self, path: &str) -> bool {
        self.skipped.iter().any(|s| s.path() == path)
    }

    fn qualify(&self, name: &str) -> String {
        if name.contains('.') {
            name.to_string()
        } else {
            format!("{}.{}", self.name, name)
        }
    }
}
