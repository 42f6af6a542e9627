//! Integration tests for the binding runtime.
//!
//! Every test runs real call plans compiled from the `Demo` fixture model
//! against in-process natives.


use nativebind::model::FieldInfo;
use nativebind::model::TypeRef;
use nativebind::{BindError, Callback, IdentityError, MarshalError, NativeDispatcher, Value};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use test_harness::{FANCY_BUTTON, Fixture};

// =============================================================================
// Struct layout through the runtime
// =============================================================================

#[test]
fn struct_sizes_follow_c_rules() {
    let fx = Fixture::new();
    let layouts = fx.runtime.compiler().layouts();
    let ints = [
        FieldInfo::new("a", TypeRef::named("gint32")),
        FieldInfo::new("b", TypeRef::named("gint32")),
    ];
    let mixed = [
        FieldInfo::new("a", TypeRef::named("gint64")),
        FieldInfo::new("b", TypeRef::named("gint32")),
    ];
    assert_eq!(layouts.calculate_struct_size("Demo", &ints), 8);
    assert_eq!(layouts.calculate_struct_size("Demo", &mixed), 16);
}

#[test]
fn every_primitive_field_round_trips() {
    let fx = Fixture::new();
    let sample = Value::Object(fx.runtime.alloc_record("Demo.Sample").unwrap());

    let cases = [
        ("flag", Value::Bool(true)),
        ("i8", Value::Int(-100)),
        ("u8", Value::UInt(250)),
        ("i16", Value::Int(-32_000)),
        ("u16", Value::UInt(65_000)),
        ("i32", Value::Int(-2_000_000)),
        ("u32", Value::UInt(4_000_000_000)),
        ("i64", Value::Int(-9_000_000_000)),
        ("u64", Value::UInt(18_000_000_000)),
        ("f32", Value::Float(0.5)),
        ("f64", Value::Float(-1234.125)),
        ("ch", Value::UInt('λ' as u64)),
        ("name", Value::from("sample")),
    ];
    for (field, value) in &cases {
        fx.runtime
            .write_field(&sample, "Demo.Sample", field, value)
            .unwrap();
    }
    for (field, value) in &cases {
        let read = fx.runtime.read_field(&sample, "Demo.Sample", field).unwrap();
        assert_eq!(&read, value, "field {field}");
    }
}

#[test]
fn nested_inline_struct_fields_share_storage() {
    let fx = Fixture::new();
    let rect = Value::Object(fx.runtime.alloc_record("Demo.Rect").unwrap());

    let origin = fx.runtime.read_field(&rect, "Demo.Rect", "origin").unwrap();
    fx.runtime
        .write_field(&origin, "Demo.Point", "y", &Value::Float(7.0))
        .unwrap();

    let size = fx.runtime.read_field(&rect, "Demo.Rect", "size").unwrap();
    fx.runtime
        .write_field(&size, "Demo.Point", "x", &Value::Float(3.0))
        .unwrap();

    let origin = fx.runtime.read_field(&rect, "Demo.Rect", "origin").unwrap();
    assert_eq!(
        fx.runtime.read_field(&origin, "Demo.Point", "y").unwrap(),
        Value::Float(7.0)
    );
    let size_offset = fx.field_offset("Rect", "size");
    assert_eq!(size_offset, 16);
    assert_eq!(
        size.as_handle().unwrap().addr(),
        rect.as_handle().unwrap().addr() + size_offset
    );
}

#[test]
fn copying_a_record_into_an_inline_field() {
    let fx = Fixture::new();
    let rect = Value::Object(fx.runtime.alloc_record("Demo.Rect").unwrap());
    let point = Value::Object(fx.runtime.alloc_record("Demo.Point").unwrap());
    fx.runtime
        .write_field(&point, "Demo.Point", "x", &Value::Float(2.5))
        .unwrap();

    fx.runtime
        .write_field(&rect, "Demo.Rect", "origin", &point)
        .unwrap();

    let origin = fx.runtime.read_field(&rect, "Demo.Rect", "origin").unwrap();
    assert_eq!(
        fx.runtime.read_field(&origin, "Demo.Point", "x").unwrap(),
        Value::Float(2.5)
    );
}

#[test]
fn fixed_arrays_are_stored_inline() {
    let fx = Fixture::new();
    let path = Value::Object(fx.runtime.alloc_record("Demo.Path").unwrap());
    assert_eq!(fx.field_offset("Path", "length"), 16);

    let weights = Value::Array(vec![1.into(), 2.into(), 3.into()]);
    fx.runtime
        .write_field(&path, "Demo.Path", "weights", &weights)
        .unwrap();

    assert_eq!(
        fx.runtime.read_field(&path, "Demo.Path", "weights").unwrap(),
        Value::Array(vec![
            Value::Int(1),
            Value::Int(2),
            Value::Int(3),
            Value::Int(0)
        ])
    );
}

#[test]
fn overlong_fixed_array_is_rejected() {
    let fx = Fixture::new();
    let path = Value::Object(fx.runtime.alloc_record("Demo.Path").unwrap());
    let weights = Value::Array((0..5).map(Value::from).collect());
    let err = fx
        .runtime
        .write_field(&path, "Demo.Path", "weights", &weights)
        .unwrap_err();
    assert!(matches!(
        err,
        BindError::Marshal(MarshalError::InvalidValue { .. })
    ));
}

#[test]
fn array_elements_are_addressed_by_stride() {
    let fx = Fixture::new();
    let stride = fx.runtime.compiler().layouts().type_layout("Demo.Point").unwrap().size;
    assert_eq!(stride, 16);

    let block = fx.natives.alloc(stride * 3, None, None).unwrap();
    let base = Value::Pointer(block);
    for i in 0..3 {
        let point = fx.runtime.element(&base, "Demo.Point", i).unwrap();
        fx.runtime
            .write_field(&point, "Demo.Point", "x", &Value::Float(i as f64))
            .unwrap();
    }

    let third = fx.runtime.element(&base, "Demo.Point", 2).unwrap();
    assert_eq!(third.as_handle().unwrap().addr(), block.addr() + 32);
    assert_eq!(
        fx.runtime.read_field(&third, "Demo.Point", "x").unwrap(),
        Value::Float(2.0)
    );
}

#[test]
fn cyclic_by_value_record_still_gets_a_layout() {
    let fx = Fixture::new();
    let node = fx.runtime.compiler().layouts().type_layout("Demo.Node").unwrap();
    assert!(node.size > 0);
    assert_eq!(node.size % node.alignment, 0);
    assert!(fx.runtime.alloc_record("Demo.Node").is_ok());
}

#[test]
fn field_access_rules_are_enforced() {
    let fx = Fixture::new();
    let widget = fx.widget("ok");

    let err = fx
        .runtime
        .write_field(&widget, "Demo.Widget", "label", &"other".into())
        .unwrap_err();
    assert!(matches!(
        err,
        BindError::Marshal(MarshalError::FieldAccess { .. })
    ));

    let err = fx
        .runtime
        .read_field(&widget, "Demo.Widget", "nope")
        .unwrap_err();
    assert!(matches!(
        err,
        BindError::Marshal(MarshalError::UnknownField { .. })
    ));

    let err = fx
        .runtime
        .read_field(&Value::Null, "Demo.Widget", "width")
        .unwrap_err();
    assert!(matches!(err, BindError::Marshal(_)));
}

// =============================================================================
// Identity
// =============================================================================

#[test]
fn constructed_objects_are_owned_wrappers() {
    let fx = Fixture::new();
    let widget = fx.widget("hello");
    let wrapper = widget.as_object().unwrap();
    assert_eq!(wrapper.type_name(), "DemoWidget");
    assert!(wrapper.is_owned());

    let label = fx
        .runtime
        .call_method("Demo.Widget", "get_label", Some(&widget), &[])
        .unwrap();
    assert_eq!(label.value, Value::from("hello"));
}

#[test]
fn wrapping_the_same_handle_returns_the_same_wrapper() {
    let fx = Fixture::new();
    let widget = fx.widget("same");

    let peeked = fx
        .runtime
        .call_method("Demo.Widget", "peek", Some(&widget), &[])
        .unwrap()
        .value;
    assert_eq!(peeked, widget);

    let handle = widget.as_handle().unwrap();
    let rewrapped = fx.runtime.wrap(handle, nativebind::Ownership::None).unwrap();
    assert!(rewrapped.as_object().unwrap().same_as(widget.as_object().unwrap()));
}

#[test]
fn full_transfer_of_a_wrapped_object_drops_the_extra_reference() {
    let fx = Fixture::new();
    let widget = fx.widget("refs");
    let handle = widget.as_handle().unwrap();
    assert_eq!(fx.natives.ref_count(handle), Some(1));

    let again = fx
        .runtime
        .call_method("Demo.Widget", "ref_self", Some(&widget), &[])
        .unwrap()
        .value;
    assert_eq!(again, widget);
    assert_eq!(fx.natives.ref_count(handle), Some(1));
}

#[test]
fn dropping_the_last_owned_wrapper_releases_the_native() {
    let fx = Fixture::new();
    let widget = fx.widget("bye");
    let handle = widget.as_handle().unwrap();
    assert!(fx.natives.is_live(handle));

    drop(widget);
    assert!(!fx.natives.is_live(handle));
}

#[test]
fn unknown_subclass_resolves_to_nearest_registered_ancestor() {
    let fx = Fixture::new();
    let fancy = fx.runtime.call_function("Demo", "make_fancy", &[]).unwrap().value;
    let wrapper = fancy.as_object().unwrap();
    assert_eq!(wrapper.type_name(), "DemoButton");
    assert!(fx.runtime.is_a(FANCY_BUTTON, "DemoWidget"));
    assert!(fx.runtime.is_a(FANCY_BUTTON, "GObject"));
    assert!(!fx.runtime.is_a("DemoWidget", "DemoButton"));
}

#[test]
fn handle_without_registered_ancestor_fails_to_wrap() {
    let fx = Fixture::new();
    let err = fx
        .runtime
        .call_function("Demo", "make_orphan", &[])
        .unwrap_err();
    assert!(err.is_identity());
    assert!(matches!(
        err,
        BindError::Identity(IdentityError::UnregisteredType { .. })
    ));
}

#[test]
fn boxed_returns_wrap_as_their_record_type() {
    let fx = Fixture::new();
    let color = fx
        .runtime
        .call_function("Demo", "color_new", &[Value::Float(0.25)])
        .unwrap()
        .value;
    let wrapper = color.as_object().unwrap();
    assert_eq!(wrapper.type_name(), "DemoColor");
    assert!(wrapper.is_owned());
    assert_eq!(
        fx.runtime.read_field(&color, "Demo.Color", "red").unwrap(),
        Value::Float(0.25)
    );
}

// =============================================================================
// Calls
// =============================================================================

#[test]
fn array_lengths_are_synthesized() {
    let fx = Fixture::new();
    let values = Value::Array(vec![4.into(), 5.into(), 6.into()]);
    let result = fx.runtime.call_function("Demo", "sum", &[values]).unwrap();
    assert_eq!(result.value, Value::Int(15));
    assert!(result.outputs.is_empty());
}

#[test]
fn too_many_or_missing_arguments_are_rejected() {
    let fx = Fixture::new();
    let err = fx
        .runtime
        .call_function("Demo", "sum", &[Value::Array(vec![]), 3.into()])
        .unwrap_err();
    assert!(matches!(
        err,
        BindError::Marshal(MarshalError::TooManyArguments { .. })
    ));

    let err = fx.runtime.call_function("Demo", "parse_int", &[]).unwrap_err();
    assert_eq!(
        err,
        BindError::Marshal(MarshalError::MissingArgument("text".into()))
    );

    let err = fx.runtime.call_function("Demo", "nope", &[]).unwrap_err();
    assert!(matches!(
        err,
        BindError::Marshal(MarshalError::UnknownCallable(_))
    ));
}

#[test]
fn methods_require_an_instance() {
    let fx = Fixture::new();
    let err = fx
        .runtime
        .call_method("Demo.Widget", "get_label", None, &[])
        .unwrap_err();
    assert!(matches!(
        err,
        BindError::Marshal(MarshalError::MissingInstance(_))
    ));
}

#[test]
fn out_parameters_are_returned_after_the_value() {
    let fx = Fixture::new();
    let result = fx
        .runtime
        .call_function("Demo", "parse_int", &["42".into()])
        .unwrap();
    assert_eq!(result.value, Value::Bool(true));
    assert_eq!(result.outputs, vec![Value::Int(42)]);
}

#[test]
fn throwing_native_surfaces_a_native_error() {
    let fx = Fixture::new();
    let err = fx
        .runtime
        .call_function("Demo", "parse_int", &["forty-two".into()])
        .unwrap_err();
    let native = err.as_native().expect("native error");
    assert_eq!(native.domain, "demo-parse-error");
    assert_eq!(native.code, 3);
    assert_eq!(native.message, "'forty-two' is not a number");
}

#[test]
fn in_out_parameters_carry_the_caller_value_in() {
    let fx = Fixture::new();
    let result = fx
        .runtime
        .call_function("Demo", "double_in_place", &[21.into()])
        .unwrap();
    assert_eq!(result.value, Value::Null);
    assert_eq!(result.output(0), Some(&Value::Int(42)));
}

#[test]
fn caller_allocated_records_are_returned_owned() {
    let fx = Fixture::new();
    let result = fx.runtime.call_function("Demo", "get_origin", &[]).unwrap();
    let origin = &result.outputs[0];
    assert!(origin.as_object().unwrap().is_owned());
    assert_eq!(
        fx.runtime.read_field(origin, "Demo.Point", "x").unwrap(),
        Value::Float(1.5)
    );
    assert_eq!(
        fx.runtime.read_field(origin, "Demo.Point", "y").unwrap(),
        Value::Float(-2.5)
    );
}

#[test]
fn zero_terminated_return_arrays_are_read_to_the_terminator() {
    let fx = Fixture::new();
    let names = fx.runtime.call_function("Demo", "list_names", &[]).unwrap().value;
    assert_eq!(
        names,
        Value::Array(vec!["alpha".into(), "beta".into(), "gamma".into()])
    );
}

#[test]
fn return_array_length_comes_from_a_hidden_output() {
    let fx = Fixture::new();
    let allocations = fx.natives.allocation_count();
    let result = fx.runtime.call_function("Demo", "range", &[3.into()]).unwrap();
    assert_eq!(
        result.value,
        Value::Array(vec![Value::Int(0), Value::Int(10), Value::Int(20)])
    );
    assert!(result.outputs.is_empty());
    assert_eq!(fx.natives.allocation_count(), allocations);
}

// =============================================================================
// Callbacks
// =============================================================================

#[test]
fn call_scoped_callbacks_run_during_the_call_only() {
    let fx = Fixture::new();
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&seen);
    let even = Callback::new(move |args| {
        counter.fetch_add(1, Ordering::SeqCst);
        Value::Bool(args[0].as_i64().is_some_and(|i| i % 2 == 0))
    });

    let result = fx
        .runtime
        .call_function("Demo", "count_matching", &[5.into(), even.into()])
        .unwrap();
    assert_eq!(result.value, Value::Int(3));
    assert_eq!(seen.load(Ordering::SeqCst), 5);
    assert!(fx.runtime.closures().is_empty());
}

#[test]
fn object_arguments_reach_callbacks_as_wrappers() {
    let fx = Fixture::new();
    let widget = fx.widget("visited");
    let received = Arc::new(std::sync::Mutex::new(None));
    let slot = Arc::clone(&received);
    let visit = Callback::new(move |args| {
        *slot.lock().unwrap() = Some(args[0].clone());
        Value::Null
    });

    fx.runtime
        .call_function("Demo", "visit_widget", &[widget.clone(), visit.into()])
        .unwrap();
    assert_eq!(received.lock().unwrap().take(), Some(widget));
}

#[test]
fn notified_callbacks_live_until_destroy_notify() {
    let fx = Fixture::new();
    let handler = Callback::new(|args| Value::Bool(args[0].as_i64() == Some(7)));

    fx.runtime
        .call_function("Demo", "set_handler", &[handler.into()])
        .unwrap();
    assert_eq!(fx.runtime.closures().len(), 1);

    let fired = fx
        .runtime
        .call_function("Demo", "fire_handler", &[7.into()])
        .unwrap();
    assert_eq!(fired.value, Value::Bool(true));

    fx.runtime.call_function("Demo", "clear_handler", &[]).unwrap();
    assert!(fx.runtime.closures().is_empty());
}

// =============================================================================
// Async
// =============================================================================

async fn fetch(fx: &Fixture, widget: &Value, key: &str) -> Result<Value, BindError> {
    fx.runtime
        .call_async_method("Demo.Widget", "fetch", Some(widget), &[key.into()])
        .await
        .map(|r| r.value)
}

#[tokio::test]
async fn async_pair_resolves_with_the_finish_value() {
    let fx = Fixture::new();
    let widget = fx.widget("async");
    assert_eq!(
        fetch(&fx, &widget, "colour").await.unwrap(),
        Value::from("value of colour")
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn async_pair_completed_from_another_thread() {
    let fx = Fixture::new();
    let widget = fx.widget("async");
    assert_eq!(
        fetch(&fx, &widget, "later").await.unwrap(),
        Value::from("value of later")
    );
}

#[tokio::test]
async fn finish_failure_completes_with_the_native_error() {
    let fx = Fixture::new();
    let widget = fx.widget("async");
    let err = fetch(&fx, &widget, "missing").await.unwrap_err();
    let native = err.as_native().expect("native error");
    assert_eq!(native.domain, "demo-fetch-error");
    assert_eq!(native.code, 4);
}

#[tokio::test]
async fn repeated_completion_is_ignored() {
    let fx = Fixture::new();
    let widget = fx.widget("async");
    assert_eq!(
        fetch(&fx, &widget, "twice").await.unwrap(),
        Value::from("value of twice")
    );
}

#[tokio::test]
async fn dropped_ready_callback_fails_the_operation() {
    let fx = Fixture::new();
    let widget = fx.widget("async");
    let err = fetch(&fx, &widget, "drop").await.unwrap_err();
    assert!(err.is_async());
}

#[tokio::test]
async fn async_arguments_are_checked_before_starting() {
    let fx = Fixture::new();
    let widget = fx.widget("async");
    let err = fx
        .runtime
        .call_async_method("Demo.Widget", "fetch", Some(&widget), &["a".into(), "b".into()])
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        BindError::Marshal(MarshalError::TooManyArguments { .. })
    ));
}
