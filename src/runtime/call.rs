//! Call lowering and result lifting.
//!
//! One call runs in three steps:
//!
//! 1. **Lower**: every native argument of the plan gets a value. Caller
//!    values are converted (arrays copied into native memory, wrappers
//!    replaced by their handles), hidden arguments are synthesized: array
//!    lengths, closure tokens, destroy-notify trampolines, output slots and
//!    the error slot.
//! 2. **Call** through the dispatcher.
//! 3. **Lift**: the error slot is checked first; then the return value and
//!    every output are converted back, wrapping handles through the identity
//!    registry with the ownership the plan declares.
//!
//! Scratch memory allocated in step 1 is released after step 3, whatever the
//! outcome.

use std::sync::Arc;

use log::{trace, warn};
use nativebind_compiler::{ArgSource, CallArg, CallPlan};
use nativebind_core::model::CallbackScope;
use nativebind_core::{
    ArgFlags, ArrayLength, BindResult, DispatchError, FfiDescriptor, MarshalError, NativeCallError,
    NativeHandle, ObjectKind, Ownership, PrimitiveKind, Trampoline,
};
use nativebind_registry::ObjectRegistry;
use rustc_hash::FxHashMap;

use super::{ERROR_RECORD, Runtime};
use crate::dispatcher::{GLIB_LIBRARY, NativeArg, NativeDispatcher};
use crate::value::{Callback, Value};

/// Outcome of one native call.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CallResult {
    /// Lifted return value; `Null` for void.
    pub value: Value,
    /// Output and in-out parameters, in native argument order.
    pub outputs: Vec<Value>,
}

impl CallResult {
    pub fn into_value(self) -> Value {
        self.value
    }

    /// The output at position `index`.
    pub fn output(&self, index: usize) -> Option<&Value> {
        self.outputs.get(index)
    }
}

/// Native arguments of one call plus the resources they hold.
#[derive(Debug, Default)]
struct CallFrame {
    args: Vec<NativeArg>,
    /// Runtime-owned allocations released after the call.
    scratch: Vec<NativeHandle>,
    /// Records the caller allocates for the native to fill, by argument index.
    caller_allocated: FxHashMap<usize, NativeHandle>,
    /// Closure tokens released when the call returns.
    call_tokens: Vec<usize>,
    /// Closure tokens released only if the call never reaches native code.
    retained_tokens: Vec<usize>,
    /// Lowered callbacks and their tokens, by argument index.
    callbacks: FxHashMap<usize, (Value, usize)>,
}

impl<D: NativeDispatcher + 'static> Runtime<D> {
    /// Run `plan` with caller values `args` and, for methods, `instance`.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn invoke(
        &self,
        plan: &CallPlan,
        instance: Option<&Value>,
        args: &[Value],
    ) -> BindResult<CallResult> {
        check_arity(plan, args)?;

        let mut frame = CallFrame::default();
        let outcome = self
            .lower(plan, instance, args, &mut frame)
            .and_then(|()| {
                trace!("invoke {}::{}", plan.library, plan.symbol);
                self.dispatcher
                    .call(&plan.library, &plan.symbol, &frame.args, &plan.returns)
                    .map_err(Into::into)
            });

        let result = match outcome {
            Ok(raw) => self.complete(plan, &frame, raw),
            Err(err) => {
                for token in &frame.retained_tokens {
                    self.closures.remove(*token);
                }
                self.discard_caller_allocated(&frame);
                Err(err)
            }
        };
        self.release_frame(frame);
        result
    }

    // ==========================================================================
    // Lowering
    // ==========================================================================

    fn lower(
        &self,
        plan: &CallPlan,
        instance: Option<&Value>,
        args: &[Value],
        frame: &mut CallFrame,
    ) -> BindResult<()> {
        self.prepare_callbacks(plan, args, frame);

        for (index, arg) in plan.args.iter().enumerate() {
            let value = match arg.source {
                ArgSource::Instance => {
                    let handle = instance
                        .and_then(Value::as_handle)
                        .filter(|h| !h.is_null())
                        .ok_or_else(|| MarshalError::MissingInstance(plan.name.clone()))?;
                    Value::Pointer(handle)
                }
                ArgSource::Caller(visible) => {
                    let prepared = frame.callbacks.get(&index).map(|(cb, _)| cb.clone());
                    match (prepared, args.get(visible)) {
                        (Some(callback), _) => callback,
                        (None, Some(value)) => self.lower_caller(arg, value, frame)?,
                        (None, None) => Value::Null,
                    }
                }
                ArgSource::ArrayLength { array } => {
                    let count = array_len(plan, args, array);
                    if arg.flags.contains(ArgFlags::OUTPUT) {
                        let slot = self.slot(&arg.descriptor, frame)?;
                        if let FfiDescriptor::Reference { inner } = &arg.descriptor {
                            self.dispatcher.write(slot, inner, 0, &count_value(inner, count))?;
                        }
                        Value::Pointer(slot)
                    } else {
                        count_value(&arg.descriptor, count)
                    }
                }
                ArgSource::ReturnLength | ArgSource::ErrorSlot => {
                    Value::Pointer(self.slot(&arg.descriptor, frame)?)
                }
                ArgSource::OutSlot => match self.caller_allocated_record(arg) {
                    Some((size, type_name, library)) => {
                        let record = self.dispatcher.alloc(size, Some(&type_name), Some(&library))?;
                        frame.caller_allocated.insert(index, record);
                        Value::Pointer(record)
                    }
                    None => Value::Pointer(self.slot(&arg.descriptor, frame)?),
                },
                ArgSource::ClosureData { callback } => frame
                    .callbacks
                    .get(&callback)
                    .map_or(Value::Null, |(_, token)| {
                        Value::Pointer(NativeHandle::from_addr(*token))
                    }),
                ArgSource::DestroyNotify { callback } => frame
                    .callbacks
                    .get(&callback)
                    .map_or(Value::Null, |(_, token)| {
                        Value::Callback(self.closures.destroy_notify(*token))
                    }),
            };
            let optional = arg.flags.contains(ArgFlags::OPTIONAL);
            frame
                .args
                .push(NativeArg::new(arg.descriptor.clone(), value).optional(optional));
        }
        Ok(())
    }

    /// Register the caller's callbacks with the closure table.
    fn prepare_callbacks(&self, plan: &CallPlan, args: &[Value], frame: &mut CallFrame) {
        for (index, arg) in plan.args.iter().enumerate() {
            let (FfiDescriptor::Callback { trampoline, scope, .. }, ArgSource::Caller(visible)) =
                (&arg.descriptor, arg.source)
            else {
                continue;
            };
            let Some(Value::Callback(callback)) = args.get(visible) else {
                continue;
            };

            let callback = match trampoline {
                Trampoline::Closure => lifting_callback(&arg.descriptor, callback, &self.objects),
                Trampoline::AsyncReady | Trampoline::DestroyNotify => callback.clone(),
            };
            let token = self.closures.register(&callback, *scope);
            match scope {
                CallbackScope::Call => frame.call_tokens.push(token),
                CallbackScope::Notified | CallbackScope::Forever => {
                    frame.retained_tokens.push(token)
                }
                CallbackScope::Async => {}
            }
            frame.callbacks.insert(index, (Value::Callback(callback), token));
        }
    }

    fn lower_caller(&self, arg: &CallArg, value: &Value, frame: &mut CallFrame) -> BindResult<Value> {
        match &arg.descriptor {
            FfiDescriptor::Reference { inner } if arg.flags.contains(ArgFlags::OUTPUT) => {
                let slot = self.slot(&arg.descriptor, frame)?;
                let lowered = self.lower_value(inner, value, frame)?;
                self.dispatcher.write(slot, inner, 0, &lowered)?;
                Ok(Value::Pointer(slot))
            }
            descriptor => self.lower_value(descriptor, value, frame),
        }
    }

    fn lower_value(
        &self,
        descriptor: &FfiDescriptor,
        value: &Value,
        frame: &mut CallFrame,
    ) -> BindResult<Value> {
        match (descriptor, value) {
            (
                FfiDescriptor::Array {
                    element,
                    element_size,
                    length,
                    ownership,
                    ..
                },
                Value::Array(items),
            ) => {
                if items.is_empty() && *length != ArrayLength::ZeroTerminated {
                    return Ok(Value::Pointer(NativeHandle::NULL));
                }
                let count = items.len() + usize::from(*length == ArrayLength::ZeroTerminated);
                let handle = self.dispatcher.alloc(count * element_size, None, None)?;
                if *ownership != Ownership::Full {
                    frame.scratch.push(handle);
                }
                for (i, item) in items.iter().enumerate() {
                    let lowered = self.lower_value(element, item, frame)?;
                    self.dispatcher.write(handle, element, i * element_size, &lowered)?;
                }
                Ok(Value::Pointer(handle))
            }
            (FfiDescriptor::Array { .. }, other) if !other.is_null() => {
                Err(MarshalError::InvalidValue {
                    name: descriptor.kind_name().to_string(),
                    expected: "array",
                    actual: other.type_name(),
                }
                .into())
            }
            (_, Value::Object(wrapper)) => Ok(Value::Pointer(wrapper.handle())),
            _ => Ok(value.clone()),
        }
    }

    /// Allocate storage for the value an output argument points at.
    fn slot(&self, descriptor: &FfiDescriptor, frame: &mut CallFrame) -> BindResult<NativeHandle> {
        let pointer_size = self.dispatcher.pointer_size();
        let size = match descriptor {
            FfiDescriptor::Reference { inner } => inner.slot_size(pointer_size),
            other => other.slot_size(pointer_size),
        };
        let slot = self.dispatcher.alloc(size.max(pointer_size), None, None)?;
        frame.scratch.push(slot);
        Ok(slot)
    }

    /// Size, runtime type and library of a record the caller must allocate.
    fn caller_allocated_record(&self, arg: &CallArg) -> Option<(usize, String, String)> {
        if !arg.flags.contains(ArgFlags::CALLER_ALLOCATES) {
            return None;
        }
        let FfiDescriptor::Reference { inner } = &arg.descriptor else {
            return None;
        };
        match inner.as_ref() {
            FfiDescriptor::Boxed {
                inner_type,
                library,
                ..
            }
            | FfiDescriptor::Struct {
                inner_type,
                library,
                ..
            } => {
                let size = self.compiler.layouts().type_layout(inner_type)?.size;
                Some((size, self.schema_type_name(inner_type), library.clone()))
            }
            _ => None,
        }
    }

    // ==========================================================================
    // Lifting
    // ==========================================================================

    fn complete(&self, plan: &CallPlan, frame: &CallFrame, raw: Value) -> BindResult<CallResult> {
        if let Some(index) = plan.error_index() {
            if let Some(error) = self.pending_error(plan, frame, index)? {
                self.discard_caller_allocated(frame);
                return Err(error.into());
            }
        }

        let value = if plan.returns.is_null() {
            Value::Null
        } else {
            self.lift(&plan.returns, raw, frame)?
        };

        let mut outputs = Vec::new();
        for index in plan.outputs() {
            outputs.push(self.lift_output(plan, frame, index)?);
        }
        Ok(CallResult { value, outputs })
    }

    fn lift_output(&self, plan: &CallPlan, frame: &CallFrame, index: usize) -> BindResult<Value> {
        let arg = &plan.args[index];
        if let Some(record) = frame.caller_allocated.get(&index) {
            let FfiDescriptor::Reference { inner } = &arg.descriptor else {
                return Ok(Value::Pointer(*record));
            };
            return self.lift_record(inner, *record, Ownership::Full);
        }

        let native = &frame.args[index];
        match &arg.descriptor {
            FfiDescriptor::Reference { inner } => {
                let slot = native.value.as_handle().unwrap_or(NativeHandle::NULL);
                if slot.is_null() {
                    return Ok(Value::Null);
                }
                let raw = self.dispatcher.read(slot, inner, 0)?;
                self.lift(inner, raw, frame)
            }
            other => self.lift(other, native.value.clone(), frame),
        }
    }

    fn lift(&self, descriptor: &FfiDescriptor, raw: Value, frame: &CallFrame) -> BindResult<Value> {
        match descriptor {
            FfiDescriptor::Null => Ok(Value::Null),
            FfiDescriptor::Object { ownership, .. } => match raw.as_handle() {
                Some(handle) => self.wrap(handle, *ownership),
                None => Ok(raw),
            },
            FfiDescriptor::Boxed { ownership, .. } | FfiDescriptor::Struct { ownership, .. } => {
                match raw.as_handle() {
                    Some(handle) => self.lift_record(descriptor, handle, *ownership),
                    None => Ok(raw),
                }
            }
            FfiDescriptor::Array { .. } => self.lift_array(descriptor, raw, frame),
            FfiDescriptor::Reference { inner } => match raw.as_handle() {
                Some(slot) if !slot.is_null() => {
                    let value = self.dispatcher.read(slot, inner, 0)?;
                    self.lift(inner, value, frame)
                }
                _ => Ok(Value::Null),
            },
            FfiDescriptor::Primitive { .. }
            | FfiDescriptor::String { .. }
            | FfiDescriptor::Callback { .. } => Ok(raw),
        }
    }

    fn lift_record(
        &self,
        descriptor: &FfiDescriptor,
        handle: NativeHandle,
        ownership: Ownership,
    ) -> BindResult<Value> {
        match descriptor {
            FfiDescriptor::Boxed { inner_type, .. } | FfiDescriptor::Struct { inner_type, .. } => {
                self.wrap_as(handle, inner_type, ownership)
            }
            _ => Ok(Value::Pointer(handle)),
        }
    }

    fn lift_array(&self, descriptor: &FfiDescriptor, raw: Value, frame: &CallFrame) -> BindResult<Value> {
        let FfiDescriptor::Array {
            element,
            ownership,
            length,
            element_size,
            ..
        } = descriptor
        else {
            return Ok(raw);
        };
        let Some(base) = raw.as_handle().filter(|h| !h.is_null()) else {
            return Ok(Value::Null);
        };

        let count = match length {
            ArrayLength::Fixed(count) => *count,
            ArrayLength::Param(index) => self.length_at(frame, *index)?,
            ArrayLength::ZeroTerminated => self.terminated_len(base, element, *element_size)?,
            ArrayLength::Container => {
                return Err(DispatchError::Unsupported("container-managed arrays".into()).into());
            }
        };

        let mut items = Vec::with_capacity(count);
        for i in 0..count {
            let offset = i * element_size;
            let item = match element.as_ref() {
                FfiDescriptor::Struct {
                    size,
                    inline: true,
                    ..
                } => {
                    let source = base.offset(offset).ok_or(DispatchError::InvalidHandle(base))?;
                    self.copy_record(element, source, *size)?
                }
                _ => {
                    let raw = self.dispatcher.read(base, element, offset)?;
                    self.lift(element, raw, frame)?
                }
            };
            items.push(item);
        }

        if *ownership == Ownership::Full {
            if let Err(err) = self.dispatcher.release(base, ObjectKind::Struct, None) {
                warn!("failed to free returned array {base}: {err}");
            }
        }
        Ok(Value::Array(items))
    }

    /// Copy an inline record element out of a container the runtime frees.
    fn copy_record(
        &self,
        descriptor: &FfiDescriptor,
        source: NativeHandle,
        size: usize,
    ) -> BindResult<Value> {
        let FfiDescriptor::Struct { inner_type, .. } = descriptor else {
            return Ok(Value::Pointer(source));
        };
        let type_name = self.schema_type_name(inner_type);
        let copy = self.dispatcher.alloc(size, Some(&type_name), None)?;
        self.dispatcher.write(copy, descriptor, 0, &Value::Pointer(source))?;
        self.wrap_as(copy, inner_type, Ownership::Full)
    }

    /// Element count carried by native argument `index`.
    fn length_at(&self, frame: &CallFrame, index: usize) -> BindResult<usize> {
        let Some(arg) = frame.args.get(index) else {
            return Err(DispatchError::ArgumentCount {
                symbol: "array length".into(),
                expected: index + 1,
                actual: frame.args.len(),
            }
            .into());
        };
        let value = match &arg.descriptor {
            FfiDescriptor::Reference { inner } => match arg.value.as_handle() {
                Some(slot) if !slot.is_null() => self.dispatcher.read(slot, inner, 0)?,
                _ => Value::UInt(0),
            },
            _ => arg.value.clone(),
        };
        Ok(value
            .as_i64()
            .map(|n| n.max(0) as usize)
            .or_else(|| value.as_u64().map(|n| n as usize))
            .unwrap_or(0))
    }

    fn terminated_len(
        &self,
        base: NativeHandle,
        element: &FfiDescriptor,
        element_size: usize,
    ) -> BindResult<usize> {
        if matches!(element, FfiDescriptor::Struct { inline: true, .. }) || element_size == 0 {
            return Err(
                DispatchError::Unsupported("zero-terminated arrays of inline records".into())
                    .into(),
            );
        }
        let mut count = 0;
        loop {
            let value = self.dispatcher.read(base, element, count * element_size)?;
            if is_zero(&value) {
                return Ok(count);
            }
            count += 1;
        }
    }

    // ==========================================================================
    // Native errors
    // ==========================================================================

    /// The error a throwing native stored in its error slot, if any.
    fn pending_error(
        &self,
        plan: &CallPlan,
        frame: &CallFrame,
        index: usize,
    ) -> BindResult<Option<NativeCallError>> {
        let Some(slot) = frame.args[index].value.as_handle().filter(|h| !h.is_null()) else {
            return Ok(None);
        };
        let FfiDescriptor::Reference { inner } = &plan.args[index].descriptor else {
            return Ok(None);
        };
        let error = self.dispatcher.read(slot, inner, 0)?;
        match error.as_handle().filter(|h| !h.is_null()) {
            Some(error) => self.read_native_error(error).map(Some),
            None => Ok(None),
        }
    }

    fn read_native_error(&self, error: NativeHandle) -> BindResult<NativeCallError> {
        let pointer_size = self.dispatcher.pointer_size();
        let offset = |name: &str| {
            self.error_layout
                .iter()
                .find(|f| f.field == name)
                .map(|f| f.offset)
                .unwrap_or_default()
        };

        let quark = self.dispatcher.read(
            error,
            &FfiDescriptor::primitive(PrimitiveKind::Uint32, pointer_size),
            offset("domain"),
        )?;
        let code = self.dispatcher.read(
            error,
            &FfiDescriptor::primitive(PrimitiveKind::Int32, pointer_size),
            offset("code"),
        )?;
        let message = self.dispatcher.read(
            error,
            &FfiDescriptor::String {
                ownership: Ownership::None,
            },
            offset("message"),
        )?;

        let domain = self.quark_name(&quark);
        if let Err(err) = self.dispatcher.release(error, ObjectKind::Boxed, None) {
            warn!("failed to free native error {error}: {err}");
        }
        Ok(NativeCallError::new(
            domain,
            code.as_i64().and_then(|c| i32::try_from(c).ok()).unwrap_or_default(),
            message.as_str().unwrap_or_default(),
        ))
    }

    /// Resolve an error domain quark to its name.
    fn quark_name(&self, quark: &Value) -> String {
        let fallback = || format!("quark-{}", quark.as_u64().unwrap_or_default());
        let library = self
            .compiler
            .repository()
            .resolve_qualified(ERROR_RECORD)
            .map_or_else(|| GLIB_LIBRARY.to_string(), |r| r.namespace.library().to_string());
        let args = [NativeArg::new(
            FfiDescriptor::primitive(PrimitiveKind::Uint32, self.dispatcher.pointer_size()),
            quark.clone(),
        )];
        let returns = FfiDescriptor::String {
            ownership: Ownership::None,
        };
        match self
            .dispatcher
            .call(&library, "g_quark_to_string", &args, &returns)
        {
            Ok(Value::String(name)) => name,
            Ok(_) => fallback(),
            Err(err) => {
                warn!("cannot resolve error domain: {err}");
                fallback()
            }
        }
    }

    // ==========================================================================
    // Cleanup
    // ==========================================================================

    fn discard_caller_allocated(&self, frame: &CallFrame) {
        for record in frame.caller_allocated.values() {
            if let Err(err) = self.dispatcher.release(*record, ObjectKind::Struct, None) {
                warn!("failed to free caller-allocated record {record}: {err}");
            }
        }
    }

    fn release_frame(&self, frame: CallFrame) {
        for token in frame.call_tokens {
            self.closures.remove(token);
        }
        for handle in frame.scratch {
            if let Err(err) = self.dispatcher.release(handle, ObjectKind::Struct, None) {
                warn!("failed to free call scratch {handle}: {err}");
            }
        }
    }
}

fn check_arity(plan: &CallPlan, args: &[Value]) -> Result<(), MarshalError> {
    if args.len() > plan.arity() {
        return Err(MarshalError::TooManyArguments {
            callable: plan.name.clone(),
            expected: plan.arity(),
            actual: args.len(),
        });
    }
    match plan.params.iter().skip(args.len()).find(|p| !p.optional) {
        Some(missing) => Err(MarshalError::MissingArgument(missing.name.clone())),
        None => Ok(()),
    }
}

/// Element count of the caller array passed at native argument `array`.
fn array_len(plan: &CallPlan, args: &[Value], array: usize) -> usize {
    match plan.args.get(array).map(|a| a.source) {
        Some(ArgSource::Caller(visible)) => args
            .get(visible)
            .and_then(Value::as_array)
            .map_or(0, <[Value]>::len),
        _ => 0,
    }
}

fn count_value(descriptor: &FfiDescriptor, count: usize) -> Value {
    match descriptor {
        FfiDescriptor::Primitive { kind, .. } if kind.is_signed() => Value::Int(count as i64),
        _ => Value::UInt(count as u64),
    }
}

fn is_zero(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Int(i) => *i == 0,
        Value::UInt(u) => *u == 0,
        Value::Float(f) => *f == 0.0,
        Value::Pointer(h) => h.is_null(),
        _ => false,
    }
}

/// Wrap a managed callback so object arguments arrive as wrappers.
fn lifting_callback(
    descriptor: &FfiDescriptor,
    callback: &Callback,
    objects: &Arc<ObjectRegistry>,
) -> Callback {
    let FfiDescriptor::Callback { params, .. } = descriptor else {
        return callback.clone();
    };
    let params = params.clone();
    let callback = callback.clone();
    let objects = Arc::clone(objects);
    Callback::new(move |args| {
        let lifted: Vec<Value> = args
            .iter()
            .enumerate()
            .map(|(i, value)| match (params.get(i), value) {
                (Some(FfiDescriptor::Object { ownership, .. }), Value::Pointer(handle)) => {
                    match objects.wrap(*handle, None, *ownership) {
                        Ok(Some(wrapper)) => Value::Object(wrapper),
                        Ok(None) => Value::Null,
                        Err(err) => {
                            trace!("passing callback argument {i} unwrapped: {err}");
                            value.clone()
                        }
                    }
                }
                _ => value.clone(),
            })
            .collect();
        match callback.invoke(&lifted) {
            Value::Object(wrapper) => Value::Pointer(wrapper.handle()),
            other => other,
        }
    })
}
