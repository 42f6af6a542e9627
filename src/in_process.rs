//! In-process reference dispatcher.
//!
//! Implements [`NativeDispatcher`] without a native toolkit:
//!
//! - **Heap**: address-keyed byte blocks with reference counts. Addresses
//!   start at `0x1000` and are 16-aligned with a guard gap between blocks,
//!   so interior pointers resolve to exactly one containing block.
//! - **Symbols**: per-library tables of Rust closures standing in for native
//!   functions. Each receives a [`NativeCall`] with the lowered arguments.
//! - **Type system**: runtime type names attached to allocations plus a
//!   type-parent table.
//!
//! Values are stored little-endian at native pointer width.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use log::trace;
use nativebind_compiler::align_up;
use nativebind_core::{
    ArrayLength, DispatchError, FfiDescriptor, NativeHandle, ObjectKind, Ownership, PrimitiveKind,
    RefHooks,
};
use nativebind_registry::{ParentLookup, TypeIntrospector};
use rustc_hash::FxHashMap;

use crate::dispatcher::{GLIB_LIBRARY, NativeArg, NativeDispatcher};
use crate::value::{Callback, Value};

const HEAP_BASE: usize = 0x1000;
const HEAP_ALIGN: usize = 16;
const POINTER_SIZE: usize = size_of::<usize>();

// ============================================================================
// Native functions
// ============================================================================

type NativeImpl = dyn Fn(&mut NativeCall<'_>) -> Result<Value, DispatchError> + Send + Sync;

/// A Rust closure registered as a native symbol.
#[derive(Clone)]
pub struct NativeFn {
    symbol: String,
    inner: Arc<NativeImpl>,
}

impl NativeFn {
    fn call(&self, call: &mut NativeCall<'_>) -> Result<Value, DispatchError> {
        (self.inner)(call)
    }
}

impl fmt::Debug for NativeFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFn").field("symbol", &self.symbol).finish_non_exhaustive()
    }
}

/// Arguments and heap access for one in-process native call.
pub struct NativeCall<'a> {
    dispatcher: &'a InProcessDispatcher,
    symbol: &'a str,
    args: &'a [NativeArg],
    returns: &'a FfiDescriptor,
}

impl<'a> NativeCall<'a> {
    pub fn symbol(&self) -> &str {
        self.symbol
    }

    pub fn dispatcher(&self) -> &'a InProcessDispatcher {
        self.dispatcher
    }

    pub fn arg_count(&self) -> usize {
        self.args.len()
    }

    pub fn args(&self) -> &[NativeArg] {
        self.args
    }

    /// Value of the argument at `index`.
    pub fn arg(&self, index: usize) -> Result<&Value, DispatchError> {
        self.args
            .get(index)
            .map(|a| &a.value)
            .ok_or_else(|| DispatchError::ArgumentCount {
                symbol: self.symbol.to_string(),
                expected: index + 1,
                actual: self.args.len(),
            })
    }

    pub fn int(&self, index: usize) -> Result<i64, DispatchError> {
        let value = self.arg(index)?;
        value.as_i64().ok_or_else(|| mismatch("int", value))
    }

    pub fn uint(&self, index: usize) -> Result<u64, DispatchError> {
        let value = self.arg(index)?;
        value.as_u64().ok_or_else(|| mismatch("uint", value))
    }

    pub fn float(&self, index: usize) -> Result<f64, DispatchError> {
        let value = self.arg(index)?;
        value.as_f64().ok_or_else(|| mismatch("float", value))
    }

    pub fn bool(&self, index: usize) -> Result<bool, DispatchError> {
        let value = self.arg(index)?;
        value.as_bool().ok_or_else(|| mismatch("bool", value))
    }

    /// String argument; `None` for a null string.
    pub fn string(&self, index: usize) -> Result<Option<String>, DispatchError> {
        match self.arg(index)? {
            Value::Null => Ok(None),
            Value::String(s) => Ok(Some(s.clone())),
            Value::Pointer(h) if h.is_null() => Ok(None),
            Value::Pointer(h) => self.dispatcher.heap().read_cstring(*h).map(Some),
            other => Err(mismatch("string", other)),
        }
    }

    /// Pointer argument; null for `Null`.
    pub fn handle(&self, index: usize) -> Result<NativeHandle, DispatchError> {
        let value = self.arg(index)?;
        value.as_handle().ok_or_else(|| mismatch("pointer", value))
    }

    /// Callback argument; `None` when the caller passed null.
    pub fn callback(&self, index: usize) -> Result<Option<Callback>, DispatchError> {
        match self.arg(index)? {
            Value::Callback(cb) => Ok(Some(cb.clone())),
            Value::Null => Ok(None),
            other => Err(mismatch("callback", other)),
        }
    }

    /// Elements of the array argument at `index`.
    pub fn array(&self, index: usize, len: usize) -> Result<Vec<Value>, DispatchError> {
        let handle = self.handle(index)?;
        match &self.args[index].descriptor {
            FfiDescriptor::Array {
                element,
                element_size,
                ..
            } => (0..len)
                .map(|i| self.dispatcher.read(handle, element, i * element_size))
                .collect(),
            other => Err(DispatchError::TypeMismatch {
                expected: "array".into(),
                actual: other.kind_name().into(),
            }),
        }
    }

    /// Store `value` through the output argument at `index`.
    ///
    /// A null output pointer means the caller is not interested; the value
    /// is dropped.
    pub fn set_out(&self, index: usize, value: &Value) -> Result<(), DispatchError> {
        let slot = self.handle(index)?;
        if slot.is_null() {
            return Ok(());
        }
        match &self.args[index].descriptor {
            FfiDescriptor::Reference { inner } => self.dispatcher.write(slot, inner, 0, value),
            other => Err(DispatchError::TypeMismatch {
                expected: "reference".into(),
                actual: other.kind_name().into(),
            }),
        }
    }

    /// Allocate an instance of a runtime type.
    pub fn new_instance(
        &self,
        type_name: &str,
        size: usize,
    ) -> Result<NativeHandle, DispatchError> {
        self.dispatcher.alloc(size, Some(type_name), None)
    }

    /// Build the array this call returns, following the return descriptor.
    pub fn return_array(&self, values: &[Value]) -> Result<Value, DispatchError> {
        match self.returns {
            FfiDescriptor::Array {
                element,
                element_size,
                length,
                ..
            } => {
                let terminated = *length == ArrayLength::ZeroTerminated;
                let count = values.len() + usize::from(terminated);
                let handle = self.dispatcher.alloc(count * element_size, None, None)?;
                for (i, value) in values.iter().enumerate() {
                    self.dispatcher.write(handle, element, i * element_size, value)?;
                }
                Ok(Value::Pointer(handle))
            }
            other => Err(DispatchError::TypeMismatch {
                expected: "array".into(),
                actual: other.kind_name().into(),
            }),
        }
    }

    /// Report failure through the trailing error output of a throwing native.
    ///
    /// Builds the error record (`domain` quark, `code`, `message`) as a C
    /// compiler lays it out and stores it in the error slot. Returns the
    /// null value the native returns alongside an error.
    pub fn throw(&self, domain: &str, code: i32, message: &str) -> Result<Value, DispatchError> {
        let index = self
            .args
            .iter()
            .rposition(|a| is_error_slot(&a.descriptor))
            .ok_or_else(|| {
                DispatchError::Unsupported(format!("'{}' does not throw", self.symbol))
            })?;
        let slot = self.handle(index)?;
        if slot.is_null() {
            return Ok(Value::Null);
        }

        let message_offset = align_up(8, POINTER_SIZE);
        let error = self
            .dispatcher
            .alloc(message_offset + POINTER_SIZE, Some("GError"), Some(GLIB_LIBRARY))?;
        let quark = self.dispatcher.quark_from_string(domain);
        let d = self.dispatcher;
        d.write(error, &pointer_width(PrimitiveKind::Uint32), 0, &Value::from(quark))?;
        d.write(error, &pointer_width(PrimitiveKind::Int32), 4, &Value::from(code))?;
        let string = FfiDescriptor::String {
            ownership: Ownership::Full,
        };
        d.write(error, &string, message_offset, &Value::from(message))?;
        d.write(slot, &pointer_width(PrimitiveKind::Pointer), 0, &Value::Pointer(error))?;
        Ok(Value::Null)
    }
}

fn is_error_slot(descriptor: &FfiDescriptor) -> bool {
    let FfiDescriptor::Reference { inner } = descriptor else {
        return false;
    };
    matches!(inner.as_ref(), FfiDescriptor::Boxed { inner_type, .. } if inner_type == "GLib.Error")
}

fn pointer_width(kind: PrimitiveKind) -> FfiDescriptor {
    FfiDescriptor::primitive(kind, POINTER_SIZE)
}

fn mismatch(expected: &str, actual: &Value) -> DispatchError {
    DispatchError::TypeMismatch {
        expected: expected.to_string(),
        actual: actual.type_name().to_string(),
    }
}

// ============================================================================
// Heap
// ============================================================================

#[derive(Debug)]
struct Block {
    bytes: Vec<u8>,
    type_name: Option<String>,
    refs: u32,
}

#[derive(Debug)]
struct Heap {
    blocks: BTreeMap<usize, Block>,
    next: usize,
}

impl Heap {
    fn new() -> Self {
        Self {
            blocks: BTreeMap::new(),
            next: HEAP_BASE,
        }
    }

    fn alloc(&mut self, size: usize, type_name: Option<&str>) -> NativeHandle {
        let addr = self.next;
        let len = size.max(1);
        self.next = align_up(addr + len + HEAP_ALIGN, HEAP_ALIGN);
        self.blocks.insert(
            addr,
            Block {
                bytes: vec![0; len],
                type_name: type_name.map(str::to_string),
                refs: 1,
            },
        );
        NativeHandle::from_addr(addr)
    }

    /// Base address and block containing `addr`.
    fn locate(&self, addr: usize) -> Option<(usize, &Block)> {
        let (&base, block) = self.blocks.range(..=addr).next_back()?;
        (addr < base + block.bytes.len()).then_some((base, block))
    }

    fn span(
        &self,
        handle: NativeHandle,
        offset: usize,
        size: usize,
    ) -> Result<(usize, usize), DispatchError> {
        let (base, block) = self
            .locate(handle.addr())
            .ok_or(DispatchError::InvalidHandle(handle))?;
        let start = (handle.addr() - base).checked_add(offset);
        let end = start.and_then(|start| start.checked_add(size));
        match (start, end) {
            (Some(start), Some(end)) if end <= block.bytes.len() => Ok((base, start)),
            _ => Err(DispatchError::OutOfBounds {
                handle,
                offset,
                size,
            }),
        }
    }

    fn bytes(
        &self,
        handle: NativeHandle,
        offset: usize,
        size: usize,
    ) -> Result<&[u8], DispatchError> {
        let (base, start) = self.span(handle, offset, size)?;
        Ok(&self.blocks[&base].bytes[start..start + size])
    }

    fn bytes_mut(
        &mut self,
        handle: NativeHandle,
        offset: usize,
        size: usize,
    ) -> Result<&mut [u8], DispatchError> {
        let (base, start) = self.span(handle, offset, size)?;
        let block = self
            .blocks
            .get_mut(&base)
            .ok_or(DispatchError::InvalidHandle(handle))?;
        Ok(&mut block.bytes[start..start + size])
    }

    fn read_pointer(
        &self,
        handle: NativeHandle,
        offset: usize,
    ) -> Result<NativeHandle, DispatchError> {
        let raw = read_unsigned(self.bytes(handle, offset, POINTER_SIZE)?);
        Ok(NativeHandle::from_addr(raw as usize))
    }

    fn write_pointer(
        &mut self,
        handle: NativeHandle,
        offset: usize,
        target: NativeHandle,
    ) -> Result<(), DispatchError> {
        let bytes = (target.addr() as u64).to_le_bytes();
        self.bytes_mut(handle, offset, POINTER_SIZE)?
            .copy_from_slice(&bytes[..POINTER_SIZE]);
        Ok(())
    }

    fn alloc_cstring(&mut self, s: &str) -> NativeHandle {
        let handle = self.alloc(s.len() + 1, None);
        if let Some(block) = self.blocks.get_mut(&handle.addr()) {
            block.bytes[..s.len()].copy_from_slice(s.as_bytes());
        }
        handle
    }

    fn read_cstring(&self, handle: NativeHandle) -> Result<String, DispatchError> {
        let (base, block) = self
            .locate(handle.addr())
            .ok_or(DispatchError::InvalidHandle(handle))?;
        let tail = &block.bytes[handle.addr() - base..];
        let end = tail.iter().position(|&b| b == 0).ok_or(DispatchError::OutOfBounds {
            handle,
            offset: 0,
            size: tail.len() + 1,
        })?;
        Ok(String::from_utf8_lossy(&tail[..end]).into_owned())
    }
}

fn read_unsigned(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf[..bytes.len()].copy_from_slice(bytes);
    u64::from_le_bytes(buf)
}

fn read_signed(bytes: &[u8]) -> i64 {
    let shift = 64 - 8 * bytes.len() as u32;
    ((read_unsigned(bytes) << shift) as i64) >> shift
}

fn decode(kind: PrimitiveKind, bytes: &[u8]) -> Value {
    match kind {
        PrimitiveKind::Void => Value::Null,
        PrimitiveKind::Bool => Value::Bool(read_unsigned(bytes) != 0),
        PrimitiveKind::Int8
        | PrimitiveKind::Int16
        | PrimitiveKind::Int32
        | PrimitiveKind::Int64 => {
            Value::Int(read_signed(bytes))
        }
        PrimitiveKind::Uint8
        | PrimitiveKind::Uint16
        | PrimitiveKind::Uint32
        | PrimitiveKind::Uint64
        | PrimitiveKind::Unichar
        | PrimitiveKind::GType => Value::UInt(read_unsigned(bytes)),
        PrimitiveKind::Float => {
            let mut buf = [0u8; 4];
            buf.copy_from_slice(bytes);
            Value::Float(f64::from(f32::from_le_bytes(buf)))
        }
        PrimitiveKind::Double => {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(bytes);
            Value::Float(f64::from_le_bytes(buf))
        }
        PrimitiveKind::Pointer => match read_unsigned(bytes) {
            0 => Value::Null,
            addr => Value::Pointer(NativeHandle::from_addr(addr as usize)),
        },
    }
}

fn encode(kind: PrimitiveKind, size: usize, value: &Value) -> Result<Vec<u8>, DispatchError> {
    let fail = || DispatchError::TypeMismatch {
        expected: kind.name().to_string(),
        actual: value.type_name().to_string(),
    };
    let bits = 8 * size as u32;
    let raw: u64 = match kind {
        PrimitiveKind::Void => return Ok(Vec::new()),
        PrimitiveKind::Bool => u64::from(value.as_bool().ok_or_else(fail)?),
        PrimitiveKind::Int8
        | PrimitiveKind::Int16
        | PrimitiveKind::Int32
        | PrimitiveKind::Int64 => {
            let v = value.as_i64().ok_or_else(fail)?;
            let fits = bits >= 64 || (v >= -(1i64 << (bits - 1)) && v < (1i64 << (bits - 1)));
            if !fits {
                return Err(fail());
            }
            v as u64
        }
        PrimitiveKind::Float => {
            let v = value.as_f64().ok_or_else(fail)?;
            return Ok((v as f32).to_le_bytes().to_vec());
        }
        PrimitiveKind::Double => {
            let v = value.as_f64().ok_or_else(fail)?;
            return Ok(v.to_le_bytes().to_vec());
        }
        PrimitiveKind::Pointer => value.as_handle().ok_or_else(fail)?.addr() as u64,
        PrimitiveKind::Uint8
        | PrimitiveKind::Uint16
        | PrimitiveKind::Uint32
        | PrimitiveKind::Uint64
        | PrimitiveKind::Unichar
        | PrimitiveKind::GType => {
            let v = value.as_u64().ok_or_else(fail)?;
            if bits < 64 && v >> bits != 0 {
                return Err(fail());
            }
            v
        }
    };
    Ok(raw.to_le_bytes()[..size].to_vec())
}

// ============================================================================
// Dispatcher
// ============================================================================

/// Reference dispatcher backed by an in-process heap and Rust closures.
pub struct InProcessDispatcher {
    heap: Mutex<Heap>,
    symbols: RwLock<FxHashMap<String, FxHashMap<String, NativeFn>>>,
    types: RwLock<FxHashMap<String, Option<String>>>,
    quarks: Mutex<Vec<String>>,
}

impl InProcessDispatcher {
    /// Create a dispatcher with the built-in GLib quark helpers.
    pub fn new() -> Self {
        let dispatcher = Self {
            heap: Mutex::new(Heap::new()),
            symbols: RwLock::new(FxHashMap::default()),
            types: RwLock::new(FxHashMap::default()),
            quarks: Mutex::new(Vec::new()),
        };
        dispatcher.define_symbol(GLIB_LIBRARY, "g_quark_to_string", |call| {
            let quark = call.uint(0)?;
            let name = call.dispatcher().quark_to_string(quark as u32);
            Ok(name.map_or(Value::Null, Value::String))
        });
        dispatcher.define_symbol(GLIB_LIBRARY, "g_quark_from_string", |call| {
            let name = call.string(0)?.unwrap_or_default();
            Ok(Value::from(call.dispatcher().quark_from_string(&name)))
        });
        dispatcher
    }

    fn heap(&self) -> MutexGuard<'_, Heap> {
        self.heap.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ==========================================================================
    // Symbols
    // ==========================================================================

    /// Register `f` as `symbol` in `library`, replacing any previous definition.
    pub fn define_symbol<F>(&self, library: &str, symbol: &str, f: F)
    where
        F: Fn(&mut NativeCall<'_>) -> Result<Value, DispatchError> + Send + Sync + 'static,
    {
        let native = NativeFn {
            symbol: format!("{library}::{symbol}"),
            inner: Arc::new(f),
        };
        self.symbols
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(library.to_string())
            .or_default()
            .insert(symbol.to_string(), native);
    }

    pub fn has_symbol(&self, library: &str, symbol: &str) -> bool {
        self.lookup(library, symbol).is_ok()
    }

    fn lookup(&self, library: &str, symbol: &str) -> Result<NativeFn, DispatchError> {
        let symbols = self.symbols.read().unwrap_or_else(PoisonError::into_inner);
        let table = symbols
            .get(library)
            .ok_or_else(|| DispatchError::LibraryNotFound(library.to_string()))?;
        table
            .get(symbol)
            .cloned()
            .ok_or_else(|| DispatchError::SymbolNotFound {
                library: library.to_string(),
                symbol: symbol.to_string(),
            })
    }

    fn find_any(&self, symbol: &str) -> Option<(String, NativeFn)> {
        let symbols = self.symbols.read().unwrap_or_else(PoisonError::into_inner);
        symbols
            .iter()
            .find_map(|(lib, table)| table.get(symbol).map(|f| (lib.clone(), f.clone())))
    }

    // ==========================================================================
    // Type system
    // ==========================================================================

    /// Declare a runtime type and its parent.
    pub fn define_type(&self, type_name: &str, parent: Option<&str>) {
        self.types
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(type_name.to_string(), parent.map(str::to_string));
    }

    /// Interned id of `name`; ids start at 1.
    pub fn quark_from_string(&self, name: &str) -> u32 {
        let mut quarks = self.quarks.lock().unwrap_or_else(PoisonError::into_inner);
        let index = match quarks.iter().position(|q| q == name) {
            Some(index) => index,
            None => {
                quarks.push(name.to_string());
                quarks.len() - 1
            }
        };
        index as u32 + 1
    }

    pub fn quark_to_string(&self, quark: u32) -> Option<String> {
        let quarks = self.quarks.lock().unwrap_or_else(PoisonError::into_inner);
        quark
            .checked_sub(1)
            .and_then(|i| quarks.get(i as usize))
            .cloned()
    }

    // ==========================================================================
    // Heap inspection
    // ==========================================================================

    /// Add one reference to a live allocation.
    pub fn add_ref(&self, handle: NativeHandle) -> Result<u32, DispatchError> {
        let mut heap = self.heap();
        let block = heap
            .blocks
            .get_mut(&handle.addr())
            .ok_or(DispatchError::InvalidHandle(handle))?;
        block.refs += 1;
        Ok(block.refs)
    }

    /// Reference count of the allocation starting at `handle`.
    pub fn ref_count(&self, handle: NativeHandle) -> Option<u32> {
        self.heap().blocks.get(&handle.addr()).map(|b| b.refs)
    }

    /// Whether `handle` points into a live allocation.
    pub fn is_live(&self, handle: NativeHandle) -> bool {
        self.heap().locate(handle.addr()).is_some()
    }

    /// Number of live allocations.
    pub fn allocation_count(&self) -> usize {
        self.heap().blocks.len()
    }

    fn unref(&self, handle: NativeHandle) -> Result<(), DispatchError> {
        let mut heap = self.heap();
        let block = heap
            .blocks
            .get_mut(&handle.addr())
            .ok_or(DispatchError::InvalidHandle(handle))?;
        block.refs = block.refs.saturating_sub(1);
        if block.refs == 0 {
            heap.blocks.remove(&handle.addr());
            trace!("freed {handle}");
        }
        Ok(())
    }
}

impl Default for InProcessDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for InProcessDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InProcessDispatcher")
            .field("allocations", &self.allocation_count())
            .finish_non_exhaustive()
    }
}

impl ParentLookup for InProcessDispatcher {
    fn parent_of(&self, type_name: &str) -> Option<String> {
        self.types
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(type_name)
            .cloned()
            .flatten()
    }
}

impl TypeIntrospector for InProcessDispatcher {
    fn runtime_type_of(&self, handle: NativeHandle) -> Option<String> {
        self.heap()
            .blocks
            .get(&handle.addr())
            .and_then(|b| b.type_name.clone())
    }
}

impl NativeDispatcher for InProcessDispatcher {
    fn call(
        &self,
        library: &str,
        symbol: &str,
        args: &[NativeArg],
        returns: &FfiDescriptor,
    ) -> Result<Value, DispatchError> {
        let native = self.lookup(library, symbol)?;
        trace!("call {library}::{symbol} with {} args", args.len());
        let mut call = NativeCall {
            dispatcher: self,
            symbol,
            args,
            returns,
        };
        let value = native.call(&mut call)?;
        Ok(if returns.is_null() { Value::Null } else { value })
    }

    fn read(
        &self,
        handle: NativeHandle,
        descriptor: &FfiDescriptor,
        offset: usize,
    ) -> Result<Value, DispatchError> {
        if handle.is_null() {
            return Err(DispatchError::InvalidHandle(handle));
        }
        let heap = self.heap();
        match descriptor {
            FfiDescriptor::Null => Ok(Value::Null),
            FfiDescriptor::Primitive { kind, size } => {
                Ok(decode(*kind, heap.bytes(handle, offset, *size)?))
            }
            FfiDescriptor::Struct {
                size, inline: true, ..
            } => {
                heap.span(handle, offset, *size)?;
                let inner = handle.offset(offset).ok_or(DispatchError::InvalidHandle(handle))?;
                Ok(Value::Pointer(inner))
            }
            FfiDescriptor::String { .. } => {
                let target = heap.read_pointer(handle, offset)?;
                if target.is_null() {
                    Ok(Value::Null)
                } else {
                    heap.read_cstring(target).map(Value::String)
                }
            }
            _ => {
                let target = heap.read_pointer(handle, offset)?;
                Ok(if target.is_null() {
                    Value::Null
                } else {
                    Value::Pointer(target)
                })
            }
        }
    }

    fn write(
        &self,
        handle: NativeHandle,
        descriptor: &FfiDescriptor,
        offset: usize,
        value: &Value,
    ) -> Result<(), DispatchError> {
        if handle.is_null() {
            return Err(DispatchError::InvalidHandle(handle));
        }
        let mut heap = self.heap();
        match descriptor {
            FfiDescriptor::Null => Ok(()),
            FfiDescriptor::Primitive { kind, size } => {
                let bytes = encode(*kind, *size, value)?;
                heap.bytes_mut(handle, offset, *size)?.copy_from_slice(&bytes);
                Ok(())
            }
            FfiDescriptor::Struct {
                size, inline: true, ..
            } => {
                let source = value.as_handle().ok_or_else(|| mismatch("struct", value))?;
                let bytes = if source.is_null() {
                    vec![0; *size]
                } else {
                    heap.bytes(source, 0, *size)?.to_vec()
                };
                heap.bytes_mut(handle, offset, *size)?.copy_from_slice(&bytes);
                Ok(())
            }
            FfiDescriptor::String { .. } => {
                let target = match value {
                    Value::String(s) => heap.alloc_cstring(s),
                    other => other.as_handle().ok_or_else(|| mismatch("string", other))?,
                };
                heap.write_pointer(handle, offset, target)
            }
            FfiDescriptor::Callback { .. } if matches!(value, Value::Callback(_)) => Err(
                DispatchError::Unsupported("storing a managed callback in native memory".into()),
            ),
            _ => {
                let target = value
                    .as_handle()
                    .ok_or_else(|| mismatch(descriptor.kind_name(), value))?;
                heap.write_pointer(handle, offset, target)
            }
        }
    }

    fn alloc(
        &self,
        size: usize,
        type_name: Option<&str>,
        library: Option<&str>,
    ) -> Result<NativeHandle, DispatchError> {
        if let Some(library) = library {
            let loaded = self
                .symbols
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .contains_key(library);
            if !loaded {
                return Err(DispatchError::LibraryNotFound(library.to_string()));
            }
        }
        let handle = self.heap().alloc(size, type_name);
        trace!("alloc {size} bytes at {handle} ({})", type_name.unwrap_or("untyped"));
        Ok(handle)
    }

    fn release(
        &self,
        handle: NativeHandle,
        kind: ObjectKind,
        hooks: Option<&RefHooks>,
    ) -> Result<(), DispatchError> {
        if let Some(hooks) = hooks {
            if let Some((library, native)) = self.find_any(&hooks.unref_fn) {
                trace!("release {kind} {handle} via {library}::{}", hooks.unref_fn);
                let args = [NativeArg::new(
                    pointer_width(PrimitiveKind::Pointer),
                    Value::Pointer(handle),
                )];
                let mut call = NativeCall {
                    dispatcher: self,
                    symbol: &hooks.unref_fn,
                    args: &args,
                    returns: &FfiDescriptor::Null,
                };
                return native.call(&mut call).map(drop);
            }
        }
        trace!("release {kind} {handle}");
        self.unref(handle)
    }
}
