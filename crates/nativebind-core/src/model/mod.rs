//! The normalized interface model consumed by the compiler.
//!
//! These types are produced by an external schema parser and are treated as
//! correct input. They deserialize from the parser's JSON form.

mod callable;
mod repository;
mod type_ref;
mod types;

pub use callable::{
    CallableInfo, CallableKind, CallbackInfo, CallbackScope, ParamDirection, ParamInfo, SignalInfo,
};
pub use repository::{Namespace, Repository, ResolvedType, TypeDecl};
pub use type_ref::{ArrayKind, ArrayShape, TypeRef, split_qualified};
pub use types::{
    ClassInfo, EnumInfo, EnumMember, FieldInfo, InterfaceInfo, RecordInfo, RecordKind,
};
