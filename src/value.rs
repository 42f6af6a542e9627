//! Managed values crossing the runtime boundary.

use std::fmt;
use std::sync::Arc;

use nativebind_core::NativeHandle;
use nativebind_registry::ManagedWrapper;

/// A managed function the native side may invoke.
///
/// Cloning shares the underlying closure; equality is identity.
#[derive(Clone)]
pub struct Callback(Arc<dyn Fn(&[Value]) -> Value + Send + Sync>);

impl Callback {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&[Value]) -> Value + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Invoke the callback.
    pub fn invoke(&self, args: &[Value]) -> Value {
        (self.0)(args)
    }

    pub fn same_as(&self, other: &Callback) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl PartialEq for Callback {
    fn eq(&self, other: &Self) -> bool {
        self.same_as(other)
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callback").finish_non_exhaustive()
    }
}

/// A value passed to or returned from a native call.
///
/// Integers are widened to 64 bits and floats to `f64`; the descriptor a
/// value travels with decides its native width.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// Void, absent, or the null pointer.
    #[default]
    Null,
    Bool(bool),
    /// Signed integer of any width.
    Int(i64),
    /// Unsigned integer of any width, including type ids.
    UInt(u64),
    /// Floating point value of either width.
    Float(f64),
    String(String),
    /// Raw native pointer.
    Pointer(NativeHandle),
    /// Wrapped native instance.
    Object(ManagedWrapper),
    Array(Vec<Value>),
    Callback(Callback),
}

impl Value {
    /// Get a human-readable name for this value's type.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::UInt(_) => "uint",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Pointer(_) => "pointer",
            Value::Object(_) => "object",
            Value::Array(_) => "array",
            Value::Callback(_) => "callback",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null) || self.as_handle().is_some_and(NativeHandle::is_null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Int(i) => Some(*i != 0),
            Value::UInt(u) => Some(*u != 0),
            _ => None,
        }
    }

    /// Integer view, accepting unsigned values that fit and booleans.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::UInt(u) => i64::try_from(*u).ok(),
            Value::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    /// Unsigned view, accepting non-negative signed values, booleans and pointers.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::UInt(u) => Some(*u),
            Value::Int(i) => u64::try_from(*i).ok(),
            Value::Bool(b) => Some(u64::from(*b)),
            Value::Pointer(h) => Some(h.addr() as u64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            Value::UInt(u) => Some(*u as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Native pointer carried by this value; `Null` counts as the null pointer.
    pub fn as_handle(&self) -> Option<NativeHandle> {
        match self {
            Value::Null => Some(NativeHandle::NULL),
            Value::Pointer(h) => Some(*h),
            Value::Object(w) => Some(w.handle()),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ManagedWrapper> {
        match self {
            Value::Object(w) => Some(w),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_callback(&self) -> Option<&Callback> {
        match self {
            Value::Callback(cb) => Some(cb),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::UInt(u64::from(v))
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::UInt(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<NativeHandle> for Value {
    fn from(h: NativeHandle) -> Self {
        Value::Pointer(h)
    }
}

impl From<ManagedWrapper> for Value {
    fn from(w: ManagedWrapper) -> Self {
        Value::Object(w)
    }
}

impl From<Callback> for Value {
    fn from(cb: Callback) -> Self {
        Value::Callback(cb)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_type_names() {
        assert_eq!(Value::Null.type_name(), "null");
        assert_eq!(Value::from(1).type_name(), "int");
        assert_eq!(Value::from(1u32).type_name(), "uint");
        assert_eq!(Value::from("x").type_name(), "string");
        assert_eq!(Value::Array(vec![]).type_name(), "array");
    }

    #[test]
    fn null_pointer_is_null() {
        assert!(Value::Null.is_null());
        assert!(Value::Pointer(NativeHandle::NULL).is_null());
        assert!(!Value::Pointer(NativeHandle::from_addr(0x10)).is_null());
        assert!(!Value::Int(0).is_null());
    }

    #[test]
    fn numeric_views() {
        assert_eq!(Value::UInt(7).as_i64(), Some(7));
        assert_eq!(Value::Int(-1).as_u64(), None);
        assert_eq!(Value::Bool(true).as_i64(), Some(1));
        assert_eq!(Value::Int(3).as_f64(), Some(3.0));
        assert_eq!(Value::UInt(u64::MAX).as_i64(), None);
    }

    #[test]
    fn option_converts_to_null() {
        assert_eq!(Value::from(None::<i32>), Value::Null);
        assert_eq!(Value::from(Some("a")), Value::String("a".into()));
    }

    #[test]
    fn callbacks_compare_by_identity() {
        let a = Callback::new(|args| args.first().cloned().unwrap_or_default());
        let b = Callback::new(|_| Value::Null);
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
        assert_eq!(a.invoke(&[Value::Int(5)]), Value::Int(5));
    }
}
