//! Start/finish async method pairing.
//!
//! Native toolkits express long-running operations as two calls: a start
//! method taking a ready callback, and a finish method that receives the
//! result token handed to that callback. This module detects such pairs by
//! naming convention and parameter shape and compiles them into one
//! [`AsyncPlan`].
//!
//! ```text
//! load_contents_async(file, cancellable, callback, user_data)
//!         │  ready callback(source, result, user_data)
//!         ▼
//! load_contents_finish(file, result, &error) -> contents
//! ```

use nativebind_core::model::{CallableInfo, ParamInfo};
use nativebind_core::{FfiDescriptor, Trampoline};

use crate::call_builder::{ArgSource, CallPlan, VisibleParam};

const READY_CALLBACK_SUFFIX: &str = "AsyncReadyCallback";
const RESULT_TOKEN_SUFFIX: &str = "AsyncResult";

/// A start method matched with its finish method.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AsyncPairing<'a> {
    pub start: &'a CallableInfo,
    pub finish: &'a CallableInfo,
}

impl AsyncPairing<'_> {
    /// Name of the combined operation: the start name without `_async`.
    pub fn name(&self) -> &str {
        operation_name(&self.start.name)
    }
}

/// Find every start/finish pair among `callables`.
pub fn find_async_pairs(callables: &[CallableInfo]) -> Vec<AsyncPairing<'_>> {
    callables
        .iter()
        .filter(|c| c.params.iter().any(is_ready_callback))
        .filter_map(|start| {
            let finish = finish_candidates(&start.name)
                .into_iter()
                .find_map(|name| callables.iter().find(|c| c.name == name))?;
            let compatible = finish.kind == start.kind
                && !std::ptr::eq(finish, start)
                && finish.params.iter().any(is_result_token);
            compatible.then_some(AsyncPairing { start, finish })
        })
        .collect()
}

/// Whether a parameter is the ready callback of a start method.
pub fn is_ready_callback(param: &ParamInfo) -> bool {
    param.type_ref.name.ends_with(READY_CALLBACK_SUFFIX)
}

/// Whether a parameter is the result token of a finish method.
pub fn is_result_token(param: &ParamInfo) -> bool {
    param.type_ref.name.ends_with(RESULT_TOKEN_SUFFIX)
}

fn operation_name(start: &str) -> &str {
    start.strip_suffix("_async").unwrap_or(start)
}

fn finish_candidates(start: &str) -> Vec<String> {
    let base = operation_name(start);
    let mut names = vec![format!("{base}_finish")];
    if base != start {
        names.push(format!("{start}_finish"));
    }
    names
}

/// A compiled async operation.
#[derive(Debug, Clone, PartialEq)]
pub struct AsyncPlan {
    /// Name of the combined operation.
    pub name: String,
    pub start: CallPlan,
    pub finish: CallPlan,
    /// Native index of the ready callback in the start call.
    pub callback_arg: usize,
    /// Visible index of the ready callback in the start call's parameters.
    pub callback_param: usize,
    /// Native index of the result token in the finish call.
    pub result_arg: usize,
    /// Caller-visible parameters: the start parameters minus the ready callback.
    pub params: Vec<VisibleParam>,
}

impl AsyncPlan {
    /// Combine compiled start and finish plans.
    ///
    /// Returns `None` when the shapes do not fit the convention: the start
    /// call must take a caller-visible ready callback, and the finish call
    /// must take exactly one caller-visible parameter, the result token.
    pub fn new(name: impl Into<String>, start: CallPlan, finish: CallPlan) -> Option<Self> {
        let (callback_arg, callback_param) =
            start.args.iter().enumerate().find_map(|(i, arg)| match (&arg.descriptor, arg.source) {
                (
                    FfiDescriptor::Callback {
                        trampoline: Trampoline::AsyncReady,
                        ..
                    },
                    ArgSource::Caller(visible),
                ) => Some((i, visible)),
                _ => None,
            })?;

        if finish.arity() != 1 {
            return None;
        }
        let result_arg = finish
            .args
            .iter()
            .position(|arg| arg.source == ArgSource::Caller(0))?;

        let params = start
            .params
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != callback_param)
            .map(|(_, p)| p.clone())
            .collect();

        Some(Self {
            name: name.into(),
            start,
            finish,
            callback_arg,
            callback_param,
            result_arg,
            params,
        })
    }

    /// Number of caller-visible parameters.
    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// Whether the operation resolves to no value.
    pub fn returns_void(&self) -> bool {
        self.finish.returns.is_null()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call_builder::CallDescriptorBuilder;
    use crate::layout::LayoutCalculator;
    use crate::mapper::TypeMapper;
    use nativebind_core::model::{
        CallbackInfo, CallbackScope, ClassInfo, InterfaceInfo, Namespace, Repository, TypeRef,
    };
    use nativebind_core::{BindingOptions, Ownership};
    use std::sync::Arc;

    fn start(name: &str) -> CallableInfo {
        CallableInfo::method(name, format!("g_file_{name}"))
            .with_param(ParamInfo::new("cancellable", TypeRef::named("Cancellable").as_nullable()))
            .with_param(
                ParamInfo::new("callback", TypeRef::named("AsyncReadyCallback"))
                    .with_callback_slots(Some(2), None, CallbackScope::Async),
            )
            .with_param(ParamInfo::new("user_data", TypeRef::named("gpointer")))
    }

    fn finish(name: &str) -> CallableInfo {
        CallableInfo::method(name, format!("g_file_{name}"))
            .with_param(ParamInfo::new("res", TypeRef::named("AsyncResult")))
            .returning(TypeRef::named("utf8").with_transfer(Ownership::Full))
            .throwing()
    }

    fn layouts() -> LayoutCalculator {
        let repo = Repository::new(vec![
            Namespace::new("GObject", "libgobject-2.0.so.0").with_class(ClassInfo::new("Object")),
            Namespace::new("Gio", "libgio-2.0.so.0")
                .with_interface(InterfaceInfo::new("File"))
                .with_interface(InterfaceInfo::new("AsyncResult"))
                .with_class(ClassInfo::new("Cancellable"))
                .with_callback(
                    CallbackInfo::new("AsyncReadyCallback")
                        .with_param(ParamInfo::new("source", TypeRef::named("GObject.Object")))
                        .with_param(ParamInfo::new("res", TypeRef::named("AsyncResult")))
                        .with_param(ParamInfo::new("data", TypeRef::named("gpointer"))),
                ),
        ]);
        LayoutCalculator::new(Arc::new(repo), 8)
    }

    #[test]
    fn pairs_by_async_suffix() {
        let methods = vec![
            start("load_contents_async"),
            finish("load_contents_finish"),
            CallableInfo::method("get_path", "g_file_get_path"),
        ];
        let pairs = find_async_pairs(&methods);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].name(), "load_contents");
        assert_eq!(pairs[0].finish.name, "load_contents_finish");
    }

    #[test]
    fn pairs_without_async_suffix() {
        let methods = vec![start("read"), finish("read_finish")];
        let pairs = find_async_pairs(&methods);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].name(), "read");
    }

    #[test]
    fn finish_must_take_result_token() {
        let methods = vec![
            start("copy_async"),
            CallableInfo::method("copy_finish", "g_file_copy_finish"),
        ];
        assert!(find_async_pairs(&methods).is_empty());
    }

    #[test]
    fn kinds_must_match() {
        let mut finish = finish("query_finish");
        finish.kind = nativebind_core::model::CallableKind::Function;
        let methods = vec![start("query_async"), finish];
        assert!(find_async_pairs(&methods).is_empty());
    }

    #[test]
    fn unpaired_start_is_ignored() {
        let methods = vec![start("mount_async")];
        assert!(find_async_pairs(&methods).is_empty());
    }

    #[test]
    fn plan_hides_ready_callback() {
        let layouts = layouts();
        let options = BindingOptions::default().with_pointer_size(8);
        let builder =
            CallDescriptorBuilder::new(TypeMapper::new(&layouts, &options, "Gio"), "libgio-2.0.so.0", 8);
        let owner = builder.owner("Gio.File").unwrap();

        let start_plan = builder.build(&start("load_async"), Some(&owner)).unwrap();
        let finish_plan = builder.build(&finish("load_finish"), Some(&owner)).unwrap();
        let plan = AsyncPlan::new("load", start_plan, finish_plan).unwrap();

        assert_eq!(plan.arity(), 1);
        assert_eq!(plan.params[0].name, "cancellable");
        assert_eq!(plan.callback_arg, 2);
        assert_eq!(plan.callback_param, 1);
        assert_eq!(plan.result_arg, 1);
        assert!(!plan.returns_void());
        assert!(plan.finish.throws);
    }

    #[test]
    fn plan_rejects_start_without_ready_callback() {
        let layouts = layouts();
        let options = BindingOptions::default().with_pointer_size(8);
        let builder =
            CallDescriptorBuilder::new(TypeMapper::new(&layouts, &options, "Gio"), "libgio-2.0.so.0", 8);
        let owner = builder.owner("Gio.File").unwrap();

        let start_plan = builder
            .build(&CallableInfo::method("load_async", "g_file_load_async"), Some(&owner))
            .unwrap();
        let finish_plan = builder.build(&finish("load_finish"), Some(&owner)).unwrap();
        assert!(AsyncPlan::new("load", start_plan, finish_plan).is_none());
    }
}
