//! Type declarations: records, unions, classes, interfaces and enums.

use serde::{Deserialize, Serialize};

use super::{CallableInfo, SignalInfo, TypeRef};

fn default_true() -> bool {
    true
}

/// A record or class field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub type_ref: TypeRef,
    /// Internal/reserved field. Still consumes space in the native layout.
    #[serde(default)]
    pub private: bool,
    #[serde(default = "default_true")]
    pub readable: bool,
    #[serde(default)]
    pub writable: bool,
}

impl FieldInfo {
    /// A public, readable and writable field.
    pub fn new(name: impl Into<String>, type_ref: TypeRef) -> Self {
        Self {
            name: name.into(),
            type_ref,
            private: false,
            readable: true,
            writable: true,
        }
    }

    /// A private field.
    pub fn private(name: impl Into<String>, type_ref: TypeRef) -> Self {
        Self {
            private: true,
            readable: false,
            writable: false,
            ..Self::new(name, type_ref)
        }
    }
}

/// Whether a record lays its members out sequentially or overlapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    #[default]
    Struct,
    Union,
}

/// A record (struct) or union declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordInfo {
    pub name: String,
    #[serde(default)]
    pub c_type: Option<String>,
    #[serde(default)]
    pub kind: RecordKind,
    /// Function returning the registered identity type; present for boxed records.
    #[serde(default)]
    pub get_type: Option<String>,
    /// Registered runtime type name of a boxed record.
    #[serde(default)]
    pub type_name: Option<String>,
    /// Opaque to bindings: no public layout is exposed.
    #[serde(default)]
    pub disguised: bool,
    #[serde(default)]
    pub fields: Vec<FieldInfo>,
    #[serde(default)]
    pub methods: Vec<CallableInfo>,
    #[serde(default)]
    pub constructors: Vec<CallableInfo>,
    #[serde(default)]
    pub functions: Vec<CallableInfo>,
}

impl RecordInfo {
    /// A plain record with no members.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            c_type: None,
            kind: RecordKind::Struct,
            get_type: None,
            type_name: None,
            disguised: false,
            fields: Vec::new(),
            methods: Vec::new(),
            constructors: Vec::new(),
            functions: Vec::new(),
        }
    }

    /// A union with no members.
    pub fn union(name: impl Into<String>) -> Self {
        Self {
            kind: RecordKind::Union,
            ..Self::new(name)
        }
    }

    /// Make this a boxed record with the given identity type name and accessor.
    pub fn boxed(mut self, type_name: impl Into<String>, get_type: impl Into<String>) -> Self {
        self.type_name = Some(type_name.into());
        self.get_type = Some(get_type.into());
        self
    }

    /// Add a field.
    pub fn with_field(mut self, field: FieldInfo) -> Self {
        self.fields.push(field);
        self
    }

    /// Add a method.
    pub fn with_method(mut self, method: CallableInfo) -> Self {
        self.methods.push(method);
        self
    }

    /// Add a constructor.
    pub fn with_constructor(mut self, constructor: CallableInfo) -> Self {
        self.constructors.push(constructor);
        self
    }

    /// Mark as disguised (opaque).
    pub fn as_disguised(mut self) -> Self {
        self.disguised = true;
        self
    }

    /// Whether the record has a registered identity type.
    pub fn is_boxed(&self) -> bool {
        self.get_type.is_some()
    }

    /// Whether the record exposes no field-addressable layout.
    ///
    /// Disguised records and records whose fields are all private are opaque.
    pub fn is_opaque(&self) -> bool {
        self.disguised || (!self.fields.is_empty() && self.fields.iter().all(|f| f.private))
    }

    /// Find a field by name.
    pub fn find_field(&self, name: &str) -> Option<&FieldInfo> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// A class declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassInfo {
    pub name: String,
    #[serde(default)]
    pub c_type: Option<String>,
    /// Parent class (single inheritance).
    #[serde(default)]
    pub parent: Option<String>,
    /// Implemented interfaces.
    #[serde(default)]
    pub interfaces: Vec<String>,
    /// Runtime type name registered with the native type system.
    #[serde(default)]
    pub type_name: Option<String>,
    /// Function returning the runtime type identifier.
    #[serde(default)]
    pub get_type: Option<String>,
    /// Fundamental type with custom ref-counting hooks.
    #[serde(default)]
    pub fundamental: bool,
    #[serde(default)]
    pub ref_func: Option<String>,
    #[serde(default)]
    pub unref_func: Option<String>,
    #[serde(default, rename = "abstract")]
    pub is_abstract: bool,
    #[serde(default)]
    pub fields: Vec<FieldInfo>,
    #[serde(default)]
    pub methods: Vec<CallableInfo>,
    #[serde(default)]
    pub constructors: Vec<CallableInfo>,
    #[serde(default)]
    pub functions: Vec<CallableInfo>,
    #[serde(default)]
    pub signals: Vec<SignalInfo>,
}

impl ClassInfo {
    /// A class with no members.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            c_type: None,
            parent: None,
            interfaces: Vec::new(),
            type_name: None,
            get_type: None,
            fundamental: false,
            ref_func: None,
            unref_func: None,
            is_abstract: false,
            fields: Vec::new(),
            methods: Vec::new(),
            constructors: Vec::new(),
            functions: Vec::new(),
            signals: Vec::new(),
        }
    }

    /// Set the parent class.
    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    /// Add an implemented interface.
    pub fn with_interface(mut self, interface: impl Into<String>) -> Self {
        self.interfaces.push(interface.into());
        self
    }

    /// Set the runtime type name.
    pub fn with_type_name(mut self, type_name: impl Into<String>) -> Self {
        self.type_name = Some(type_name.into());
        self
    }

    /// Mark as fundamental with the given ref/unref hooks.
    pub fn fundamental(mut self, ref_func: impl Into<String>, unref_func: impl Into<String>) -> Self {
        self.fundamental = true;
        self.ref_func = Some(ref_func.into());
        self.unref_func = Some(unref_func.into());
        self
    }

    /// Add a field.
    pub fn with_field(mut self, field: FieldInfo) -> Self {
        self.fields.push(field);
        self
    }

    /// Add a method.
    pub fn with_method(mut self, method: CallableInfo) -> Self {
        self.methods.push(method);
        self
    }

    /// Add a constructor.
    pub fn with_constructor(mut self, constructor: CallableInfo) -> Self {
        self.constructors.push(constructor);
        self
    }

    /// Add a signal.
    pub fn with_signal(mut self, signal: SignalInfo) -> Self {
        self.signals.push(signal);
        self
    }

    /// Find a method by name.
    pub fn find_method(&self, name: &str) -> Option<&CallableInfo> {
        self.methods.iter().find(|m| m.name == name)
    }
}

/// An interface declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterfaceInfo {
    pub name: String,
    #[serde(default)]
    pub c_type: Option<String>,
    #[serde(default)]
    pub type_name: Option<String>,
    #[serde(default)]
    pub get_type: Option<String>,
    /// Types an implementor must also be.
    #[serde(default)]
    pub prerequisites: Vec<String>,
    #[serde(default)]
    pub methods: Vec<CallableInfo>,
    #[serde(default)]
    pub functions: Vec<CallableInfo>,
    #[serde(default)]
    pub signals: Vec<SignalInfo>,
}

impl InterfaceInfo {
    /// An interface with no members.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            c_type: None,
            type_name: None,
            get_type: None,
            prerequisites: Vec::new(),
            methods: Vec::new(),
            functions: Vec::new(),
            signals: Vec::new(),
        }
    }

    /// Add a method.
    pub fn with_method(mut self, method: CallableInfo) -> Self {
        self.methods.push(method);
        self
    }
}

/// A member of an enumeration or flags type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumMember {
    pub name: String,
    pub value: i64,
}

/// An enumeration or bit-flags declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumInfo {
    pub name: String,
    #[serde(default)]
    pub c_type: Option<String>,
    #[serde(default)]
    pub members: Vec<EnumMember>,
}

impl EnumInfo {
    /// An enumeration with no members.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            c_type: None,
            members: Vec::new(),
        }
    }

    /// Add a member.
    pub fn with_member(mut self, name: impl Into<String>, value: i64) -> Self {
        self.members.push(EnumMember {
            name: name.into(),
            value,
        });
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opaque_records() {
        let all_private = RecordInfo::new("Priv")
            .with_field(FieldInfo::private("a", TypeRef::named("gint")));
        assert!(all_private.is_opaque());

        let disguised = RecordInfo::new("Hidden").as_disguised();
        assert!(disguised.is_opaque());

        let empty = RecordInfo::new("Empty");
        assert!(!empty.is_opaque());

        let mixed = RecordInfo::new("Mixed")
            .with_field(FieldInfo::new("x", TypeRef::named("gint")))
            .with_field(FieldInfo::private("reserved", TypeRef::named("gpointer")));
        assert!(!mixed.is_opaque());
    }

    #[test]
    fn boxed_records() {
        let record = RecordInfo::new("RGBA").boxed("GdkRGBA", "gdk_rgba_get_type");
        assert!(record.is_boxed());
        assert_eq!(record.type_name.as_deref(), Some("GdkRGBA"));
    }

    #[test]
    fn class_deserializes_abstract_keyword() {
        let json = r#"{ "name": "Widget", "parent": "GObject.InitiallyUnowned", "abstract": true }"#;
        let class: ClassInfo = serde_json::from_str(json).unwrap();
        assert!(class.is_abstract);
        assert_eq!(class.parent.as_deref(), Some("GObject.InitiallyUnowned"));
    }
}
