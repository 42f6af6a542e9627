//! Compiler passes.
//!
//! - [`compile`]: compile one namespace into call plans, layouts and a skip report
//! - [`output`]: the compiled bindings

pub mod compile;
pub mod output;

pub use compile::{BindingCompiler, runtime_type_name};
pub use output::{
    CompiledClass, CompiledField, CompiledNamespace, CompiledRecord, SkipReason, SkippedItem,
};
