//! Functions, methods, constructors, callbacks and signals.

use serde::{Deserialize, Serialize};

use super::TypeRef;

fn default_true() -> bool {
    true
}

/// Direction of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamDirection {
    #[default]
    In,
    Out,
    InOut,
}

impl ParamDirection {
    /// Whether the parameter is passed by reference.
    pub const fn is_by_reference(self) -> bool {
        matches!(self, ParamDirection::Out | ParamDirection::InOut)
    }
}

/// Lifetime of a callback passed to a native call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallbackScope {
    /// Valid only for the duration of the call.
    #[default]
    Call,
    /// Invoked exactly once, later.
    Async,
    /// Released through a destroy-notify parameter.
    Notified,
    /// Never released.
    Forever,
}

/// A callable parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub type_ref: TypeRef,
    #[serde(default)]
    pub direction: ParamDirection,
    /// For out parameters: the caller allocates the storage.
    #[serde(default)]
    pub caller_allocates: bool,
    /// May be omitted by the caller.
    #[serde(default)]
    pub optional: bool,
    /// Index of the user-data parameter belonging to this callback parameter.
    #[serde(default)]
    pub closure_index: Option<usize>,
    /// Index of the destroy-notify parameter belonging to this callback parameter.
    #[serde(default)]
    pub destroy_index: Option<usize>,
    /// Lifetime of this callback parameter.
    #[serde(default)]
    pub scope: Option<CallbackScope>,
}

impl ParamInfo {
    /// An input parameter.
    pub fn new(name: impl Into<String>, type_ref: TypeRef) -> Self {
        Self {
            name: name.into(),
            type_ref,
            direction: ParamDirection::In,
            caller_allocates: false,
            optional: false,
            closure_index: None,
            destroy_index: None,
            scope: None,
        }
    }

    /// An output parameter.
    pub fn out(name: impl Into<String>, type_ref: TypeRef) -> Self {
        Self {
            direction: ParamDirection::Out,
            ..Self::new(name, type_ref)
        }
    }

    /// Set the direction.
    pub fn with_direction(mut self, direction: ParamDirection) -> Self {
        self.direction = direction;
        self
    }

    /// Mark as caller-allocated.
    pub fn caller_allocated(mut self) -> Self {
        self.caller_allocates = true;
        self
    }

    /// Mark as optional.
    pub fn as_optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Attach closure/destroy indices and scope to a callback parameter.
    pub fn with_callback_slots(
        mut self,
        closure_index: Option<usize>,
        destroy_index: Option<usize>,
        scope: CallbackScope,
    ) -> Self {
        self.closure_index = closure_index;
        self.destroy_index = destroy_index;
        self.scope = Some(scope);
        self
    }

    /// Whether the parameter is a C varargs or `va_list` slot.
    pub fn is_variadic(&self) -> bool {
        self.name == "..." || matches!(self.type_ref.name.as_str(), "va_list" | "...")
    }
}

/// Role of a callable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallableKind {
    /// Free function (or static function of a type).
    #[default]
    Function,
    /// Instance method; the native receives the instance first.
    Method,
    /// Constructor returning a new instance.
    Constructor,
}

/// A function, method or constructor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallableInfo {
    /// Managed-facing name.
    pub name: String,
    /// Native symbol.
    pub c_symbol: String,
    #[serde(default)]
    pub kind: CallableKind,
    #[serde(default)]
    pub params: Vec<ParamInfo>,
    #[serde(default = "TypeRef::void")]
    pub return_type: TypeRef,
    /// Reports failure through a trailing error output parameter.
    #[serde(default)]
    pub throws: bool,
    #[serde(default)]
    pub deprecated: bool,
    #[serde(default = "default_true")]
    pub introspectable: bool,
}

impl CallableInfo {
    fn with_kind(kind: CallableKind, name: impl Into<String>, c_symbol: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            c_symbol: c_symbol.into(),
            kind,
            params: Vec::new(),
            return_type: TypeRef::void(),
            throws: false,
            deprecated: false,
            introspectable: true,
        }
    }

    /// A free function.
    pub fn function(name: impl Into<String>, c_symbol: impl Into<String>) -> Self {
        Self::with_kind(CallableKind::Function, name, c_symbol)
    }

    /// An instance method.
    pub fn method(name: impl Into<String>, c_symbol: impl Into<String>) -> Self {
        Self::with_kind(CallableKind::Method, name, c_symbol)
    }

    /// A constructor.
    pub fn constructor(name: impl Into<String>, c_symbol: impl Into<String>) -> Self {
        Self::with_kind(CallableKind::Constructor, name, c_symbol)
    }

    /// Add a parameter.
    pub fn with_param(mut self, param: ParamInfo) -> Self {
        self.params.push(param);
        self
    }

    /// Set the return type.
    pub fn returning(mut self, return_type: TypeRef) -> Self {
        self.return_type = return_type;
        self
    }

    /// Mark as throwing.
    pub fn throwing(mut self) -> Self {
        self.throws = true;
        self
    }

    /// Mark as deprecated.
    pub fn as_deprecated(mut self) -> Self {
        self.deprecated = true;
        self
    }

    /// Whether the native takes an instance as its first argument.
    pub fn is_method(&self) -> bool {
        self.kind == CallableKind::Method
    }

    /// Whether any parameter is variadic.
    pub fn is_variadic(&self) -> bool {
        self.params.iter().any(ParamInfo::is_variadic)
    }
}

/// A callback type declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallbackInfo {
    pub name: String,
    #[serde(default)]
    pub c_type: Option<String>,
    #[serde(default)]
    pub params: Vec<ParamInfo>,
    #[serde(default = "TypeRef::void")]
    pub return_type: TypeRef,
    #[serde(default)]
    pub throws: bool,
}

impl CallbackInfo {
    /// A callback type with no parameters returning void.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            c_type: None,
            params: Vec::new(),
            return_type: TypeRef::void(),
            throws: false,
        }
    }

    /// Add a parameter.
    pub fn with_param(mut self, param: ParamInfo) -> Self {
        self.params.push(param);
        self
    }

    /// Set the return type.
    pub fn returning(mut self, return_type: TypeRef) -> Self {
        self.return_type = return_type;
        self
    }

    /// Whether the callback signature is variadic.
    pub fn is_variadic(&self) -> bool {
        self.params.iter().any(ParamInfo::is_variadic)
    }
}

/// A signal declared on a class or interface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalInfo {
    pub name: String,
    #[serde(default)]
    pub params: Vec<ParamInfo>,
    #[serde(default = "TypeRef::void")]
    pub return_type: TypeRef,
}

impl SignalInfo {
    /// A signal with no parameters returning void.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            return_type: TypeRef::void(),
        }
    }

    /// Add a parameter.
    pub fn with_param(mut self, param: ParamInfo) -> Self {
        self.params.push(param);
        self
    }

    /// Set the return type.
    pub fn returning(mut self, return_type: TypeRef) -> Self {
        self.return_type = return_type;
        self
    }
}
