//! Namespaces and the repository of all loaded namespaces.
//!
//! The repository is the normalized interface model handed over by the
//! external schema parser. It is immutable after construction; the name index
//! is built once in [`Repository::new`].

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use super::{
    CallableInfo, CallbackInfo, ClassInfo, EnumInfo, InterfaceInfo, RecordInfo, split_qualified,
};

/// One namespace of the interface model (one native library surface).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Namespace {
    pub name: String,
    #[serde(default)]
    pub version: String,
    /// Shared libraries providing this namespace's symbols.
    #[serde(default)]
    pub shared_libraries: Vec<String>,
    #[serde(default)]
    pub classes: Vec<ClassInfo>,
    #[serde(default)]
    pub interfaces: Vec<InterfaceInfo>,
    #[serde(default)]
    pub records: Vec<RecordInfo>,
    #[serde(default)]
    pub unions: Vec<RecordInfo>,
    #[serde(default)]
    pub enums: Vec<EnumInfo>,
    #[serde(default)]
    pub flags: Vec<EnumInfo>,
    #[serde(default)]
    pub callbacks: Vec<CallbackInfo>,
    #[serde(default)]
    pub functions: Vec<CallableInfo>,
}

impl Namespace {
    /// An empty namespace backed by `library`.
    pub fn new(name: impl Into<String>, library: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            shared_libraries: vec![library.into()],
            ..Self::default()
        }
    }

    /// The primary shared library, or an empty string for header-only namespaces.
    pub fn library(&self) -> &str {
        self.shared_libraries.first().map(String::as_str).unwrap_or("")
    }

    /// Qualify a local name with this namespace.
    pub fn qualify(&self, local: &str) -> String {
        format!("{}.{}", self.name, local)
    }

    /// Add a class.
    pub fn with_class(mut self, class: ClassInfo) -> Self {
        self.classes.push(class);
        self
    }

    /// Add an interface.
    pub fn with_interface(mut self, interface: InterfaceInfo) -> Self {
        self.interfaces.push(interface);
        self
    }

    /// Add a record.
    pub fn with_record(mut self, record: RecordInfo) -> Self {
        self.records.push(record);
        self
    }

    /// Add a union.
    pub fn with_union(mut self, union: RecordInfo) -> Self {
        self.unions.push(union);
        self
    }

    /// Add an enumeration.
    pub fn with_enum(mut self, e: EnumInfo) -> Self {
        self.enums.push(e);
        self
    }

    /// Add a flags type.
    pub fn with_flags(mut self, flags: EnumInfo) -> Self {
        self.flags.push(flags);
        self
    }

    /// Add a callback type.
    pub fn with_callback(mut self, callback: CallbackInfo) -> Self {
        self.callbacks.push(callback);
        self
    }

    /// Add a free function.
    pub fn with_function(mut self, function: CallableInfo) -> Self {
        self.functions.push(function);
        self
    }
}

/// Location of a declaration inside a namespace's collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeclSlot {
    Class(usize),
    Interface(usize),
    Record(usize),
    Union(usize),
    Enum(usize),
    Flags(usize),
    Callback(usize),
}

/// A resolved declaration.
#[derive(Debug, Clone, Copy)]
pub enum TypeDecl<'a> {
    Class(&'a ClassInfo),
    Interface(&'a InterfaceInfo),
    Record(&'a RecordInfo),
    Union(&'a RecordInfo),
    Enum(&'a EnumInfo),
    Flags(&'a EnumInfo),
    Callback(&'a CallbackInfo),
}

impl TypeDecl<'_> {
    /// Get a human-readable name for this declaration's kind.
    pub fn kind_name(&self) -> &'static str {
        match self {
            TypeDecl::Class(_) => "class",
            TypeDecl::Interface(_) => "interface",
            TypeDecl::Record(_) => "record",
            TypeDecl::Union(_) => "union",
            TypeDecl::Enum(_) => "enum",
            TypeDecl::Flags(_) => "flags",
            TypeDecl::Callback(_) => "callback",
        }
    }
}

/// A declaration together with the namespace that owns it.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedType<'a> {
    pub namespace: &'a Namespace,
    pub decl: TypeDecl<'a>,
    local_name: &'a str,
}

impl<'a> ResolvedType<'a> {
    /// Fully qualified schema name (`Ns.Name`).
    pub fn qualified_name(&self) -> String {
        self.namespace.qualify(self.local_name)
    }

    /// Local name within the owning namespace.
    pub fn local_name(&self) -> &'a str {
        self.local_name
    }

    /// The record declaration, for records and unions.
    pub fn as_record(&self) -> Option<&'a RecordInfo> {
        match self.decl {
            TypeDecl::Record(r) | TypeDecl::Union(r) => Some(r),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RepositoryFile {
    namespaces: Vec<Namespace>,
}

/// All loaded namespaces with a qualified-name index.
#[derive(Debug, Clone, Default)]
pub struct Repository {
    namespaces: Vec<Namespace>,
    /// Qualified name -> (namespace index, slot).
    index: FxHashMap<String, (usize, DeclSlot)>,
}

impl Repository {
    /// Build a repository and its name index.
    pub fn new(namespaces: Vec<Namespace>) -> Self {
        let mut index = FxHashMap::default();
        for (ns_idx, ns) in namespaces.iter().enumerate() {
            let mut insert = |name: &str, slot: DeclSlot| {
                index.insert(ns.qualify(name), (ns_idx, slot));
            };
            for (i, c) in ns.classes.iter().enumerate() {
                insert(&c.name, DeclSlot::Class(i));
            }
            for (i, c) in ns.interfaces.iter().enumerate() {
                insert(&c.name, DeclSlot::Interface(i));
            }
            for (i, r) in ns.records.iter().enumerate() {
                insert(&r.name, DeclSlot::Record(i));
            }
            for (i, r) in ns.unions.iter().enumerate() {
                insert(&r.name, DeclSlot::Union(i));
            }
            for (i, e) in ns.enums.iter().enumerate() {
                insert(&e.name, DeclSlot::Enum(i));
            }
            for (i, e) in ns.flags.iter().enumerate() {
                insert(&e.name, DeclSlot::Flags(i));
            }
            for (i, c) in ns.callbacks.iter().enumerate() {
                insert(&c.name, DeclSlot::Callback(i));
            }
        }
        Self { namespaces, index }
    }

    /// Parse a repository from the interface model's JSON form.
    ///
    /// The document has the shape `{ "namespaces": [ ... ] }`.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let file: RepositoryFile = serde_json::from_str(json)?;
        Ok(Self::new(file.namespaces))
    }

    /// All namespaces in load order.
    pub fn namespaces(&self) -> &[Namespace] {
        &self.namespaces
    }

    /// Find a namespace by name.
    pub fn namespace(&self, name: &str) -> Option<&Namespace> {
        self.namespaces.iter().find(|ns| ns.name == name)
    }

    /// Qualify `name` relative to `current_namespace` when it is unqualified.
    pub fn qualify(&self, current_namespace: &str, name: &str) -> String {
        match split_qualified(name) {
            (Some(_), _) => name.to_string(),
            (None, local) => format!("{current_namespace}.{local}"),
        }
    }

    /// Resolve a type name, qualified or local to `current_namespace`.
    pub fn resolve(&self, current_namespace: &str, name: &str) -> Option<ResolvedType<'_>> {
        let qualified = self.qualify(current_namespace, name);
        self.resolve_qualified(&qualified)
    }

    /// Resolve a fully qualified type name.
    pub fn resolve_qualified(&self, qualified: &str) -> Option<ResolvedType<'_>> {
        let &(ns_idx, slot) = self.index.get(qualified)?;
        let namespace = &self.namespaces[ns_idx];
        let (decl, local_name) = match slot {
            DeclSlot::Class(i) => {
                let c = &namespace.classes[i];
                (TypeDecl::Class(c), c.name.as_str())
            }
            DeclSlot::Interface(i) => {
                let c = &namespace.interfaces[i];
                (TypeDecl::Interface(c), c.name.as_str())
            }
            DeclSlot::Record(i) => {
                let r = &namespace.records[i];
                (TypeDecl::Record(r), r.name.as_str())
            }
            DeclSlot::Union(i) => {
                let r = &namespace.unions[i];
                (TypeDecl::Union(r), r.name.as_str())
            }
            DeclSlot::Enum(i) => {
                let e = &namespace.enums[i];
                (TypeDecl::Enum(e), e.name.as_str())
            }
            DeclSlot::Flags(i) => {
                let e = &namespace.flags[i];
                (TypeDecl::Flags(e), e.name.as_str())
            }
            DeclSlot::Callback(i) => {
                let c = &namespace.callbacks[i];
                (TypeDecl::Callback(c), c.name.as_str())
            }
        };
        Some(ResolvedType {
            namespace,
            decl,
            local_name,
        })
    }

    /// Number of indexed declarations.
    pub fn type_count(&self) -> usize {
        self.index.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ClassInfo, RecordInfo};

    fn repo() -> Repository {
        Repository::new(vec![
            Namespace::new("GObject", "libgobject-2.0.so.0")
                .with_class(ClassInfo::new("Object").with_type_name("GObject")),
            Namespace::new("Gtk", "libgtk-4.so.1")
                .with_class(ClassInfo::new("Widget").with_parent("GObject.Object"))
                .with_record(RecordInfo::new("Border")),
        ])
    }

    #[test]
    fn resolves_local_and_qualified_names() {
        let repo = repo();
        let widget = repo.resolve("Gtk", "Widget").unwrap();
        assert_eq!(widget.qualified_name(), "Gtk.Widget");
        assert_eq!(widget.decl.kind_name(), "class");

        let object = repo.resolve("Gtk", "GObject.Object").unwrap();
        assert_eq!(object.namespace.name, "GObject");

        assert!(repo.resolve("Gtk", "Missing").is_none());
        assert!(repo.resolve("GObject", "Widget").is_none());
    }

    #[test]
    fn records_expose_record_info() {
        let repo = repo();
        let border = repo.resolve("Gtk", "Border").unwrap();
        assert!(border.as_record().is_some());
        assert_eq!(repo.type_count(), 3);
    }

    #[test]
    fn namespace_library() {
        let repo = repo();
        assert_eq!(repo.namespace("Gtk").unwrap().library(), "libgtk-4.so.1");
        assert_eq!(Namespace::default().library(), "");
    }

    #[test]
    fn loads_from_json() {
        let json = r#"{
            "namespaces": [{
                "name": "Gdk",
                "shared_libraries": ["libgtk-4.so.1"],
                "records": [{
                    "name": "Rectangle",
                    "fields": [
                        { "name": "x", "type": { "name": "gint" } },
                        { "name": "y", "type": { "name": "gint" } }
                    ]
                }]
            }]
        }"#;
        let repo = Repository::from_json(json).unwrap();
        let rect = repo.resolve_qualified("Gdk.Rectangle").unwrap();
        assert_eq!(rect.as_record().unwrap().fields.len(), 2);
    }
}
