//! Call descriptor building.
//!
//! Turns a function, method or constructor into a [`CallPlan`]: the ordered
//! native argument list (descriptor plus where each value comes from), the
//! caller-visible parameter list, and the return descriptor.
//!
//! Parameters that only exist because of the native calling convention are
//! hidden from callers and synthesized at call time:
//!
//! - array length companions (computed from the array value, or read back
//!   for output arrays)
//! - callback user-data slots (filled with a closure token)
//! - destroy-notify slots (filled with the runtime's release trampoline)
//! - pure output parameters (storage allocated by the runtime)
//! - the trailing error slot of throwing callables
//!
//! Methods receive a dedicated `self` argument first, so every schema
//! parameter index is shifted by one when converted to a native position.

use nativebind_core::model::{
    CallableInfo, CallableKind, CallbackScope, ParamDirection, SignalInfo, TypeDecl, TypeRef,
};
use nativebind_core::{
    ArgFlags, ArrayLength, FfiDescriptor, MappingError, ObjectKind, Ownership, PrimitiveKind,
    Trampoline,
};

use crate::mapper::{Import, TypeMapper, UseContext, class_hooks};

/// Where the value of one native argument comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArgSource {
    /// The receiver of a method call.
    Instance,
    /// The caller-visible parameter at this index.
    Caller(usize),
    /// Element count of the array passed at this native argument index.
    ArrayLength { array: usize },
    /// Element count of the returned array, written by the native.
    ReturnLength,
    /// User-data token of the callback at this native argument index.
    ClosureData { callback: usize },
    /// Release trampoline for the callback at this native argument index.
    DestroyNotify { callback: usize },
    /// Runtime-allocated storage for an output parameter.
    OutSlot,
    /// Error output of a throwing callable.
    ErrorSlot,
}

/// One native argument of a compiled call.
#[derive(Debug, Clone, PartialEq)]
pub struct CallArg {
    pub name: String,
    pub descriptor: FfiDescriptor,
    pub source: ArgSource,
    pub flags: ArgFlags,
}

impl CallArg {
    /// Whether the caller supplies this argument.
    pub fn is_visible(&self) -> bool {
        self.flags.is_caller_visible()
    }

    /// Whether this argument is a value returned to the caller.
    ///
    /// Output slots and in-out parameters qualify; hidden length and error
    /// slots do not.
    pub fn is_result(&self) -> bool {
        self.flags.contains(ArgFlags::OUTPUT)
            && matches!(self.source, ArgSource::OutSlot | ArgSource::Caller(_))
    }
}

/// A parameter the caller supplies.
#[derive(Debug, Clone, PartialEq)]
pub struct VisibleParam {
    pub name: String,
    pub descriptor: FfiDescriptor,
    /// May be omitted; a null/zero default is passed.
    pub optional: bool,
    pub nullable: bool,
}

/// A fully compiled callable.
#[derive(Debug, Clone, PartialEq)]
pub struct CallPlan {
    /// Managed-facing name.
    pub name: String,
    /// Native symbol.
    pub symbol: String,
    /// Library exporting the symbol.
    pub library: String,
    pub kind: CallableKind,
    /// Native arguments in calling order.
    pub args: Vec<CallArg>,
    /// Caller-visible parameters in declaration order.
    pub params: Vec<VisibleParam>,
    /// Return descriptor, honoring the declared ownership.
    pub returns: FfiDescriptor,
    /// The native may return `NULL`.
    pub return_nullable: bool,
    pub throws: bool,
    /// Imports needed by all descriptors of this call.
    pub imports: Vec<Import>,
}

impl CallPlan {
    /// Whether the first native argument is the instance.
    pub fn is_method(&self) -> bool {
        self.kind == CallableKind::Method
    }

    /// Native index of the error slot, for throwing callables.
    pub fn error_index(&self) -> Option<usize> {
        self.args
            .iter()
            .position(|a| a.source == ArgSource::ErrorSlot)
    }

    /// Native indices of arguments returned to the caller after the call.
    pub fn outputs(&self) -> impl Iterator<Item = usize> + '_ {
        self.args
            .iter()
            .enumerate()
            .filter(|(_, a)| a.is_result())
            .map(|(i, _)| i)
    }

    /// Number of caller-visible parameters.
    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// Number of parameters the caller must supply.
    pub fn required_arity(&self) -> usize {
        self.params
            .iter()
            .rposition(|p| !p.optional)
            .map_or(0, |i| i + 1)
    }
}

/// Compiled handler contract of a signal.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalPlan {
    pub name: String,
    /// Callback descriptor: emitting instance, declared params, user data.
    pub handler: FfiDescriptor,
    /// Declared parameters, as the handler sees them.
    pub params: Vec<VisibleParam>,
    pub returns: FfiDescriptor,
    pub imports: Vec<Import>,
}

/// The type owning a method, with its dedicated `self` descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct Owner {
    /// Qualified schema name.
    pub qualified: String,
    pub kind: ObjectKind,
    /// Descriptor of the instance argument. Never transfers ownership.
    pub descriptor: FfiDescriptor,
}

/// Why a schema parameter is hidden from callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Hidden {
    Length { array: Option<usize> },
    Closure { callback: usize },
    Destroy { callback: usize },
}

/// Builds call plans for callables of one namespace.
#[derive(Debug, Clone, Copy)]
pub struct CallDescriptorBuilder<'a> {
    mapper: TypeMapper<'a>,
    library: &'a str,
    pointer_size: usize,
}

impl<'a> CallDescriptorBuilder<'a> {
    /// Create a builder emitting calls into `library`.
    pub fn new(mapper: TypeMapper<'a>, library: &'a str, pointer_size: usize) -> Self {
        Self {
            mapper,
            library,
            pointer_size,
        }
    }

    /// The mapper used for parameter and return types.
    pub fn mapper(&self) -> &TypeMapper<'a> {
        &self.mapper
    }

    /// Describe the owner of methods declared on `qualified`.
    ///
    /// Returns `None` for names that are not classes, interfaces or records.
    pub fn owner(&self, qualified: &str) -> Option<Owner> {
        let layouts = self.mapper.layouts();
        let resolved = layouts.repository().resolve_qualified(qualified)?;
        let library = resolved.namespace.library().to_string();
        let (kind, descriptor) = match resolved.decl {
            TypeDecl::Class(class) => {
                let hooks = class_hooks(class);
                let kind = if hooks.is_some() {
                    ObjectKind::Fundamental
                } else {
                    ObjectKind::Gobject
                };
                (
                    kind,
                    FfiDescriptor::Object {
                        ownership: Ownership::None,
                        hooks,
                    },
                )
            }
            TypeDecl::Interface(_) => (ObjectKind::Interface, FfiDescriptor::object(Ownership::None)),
            TypeDecl::Record(record) | TypeDecl::Union(record) if record.is_boxed() => (
                ObjectKind::Boxed,
                FfiDescriptor::Boxed {
                    inner_type: qualified.to_string(),
                    library,
                    ownership: Ownership::None,
                    get_type_fn: record.get_type.clone(),
                },
            ),
            TypeDecl::Record(_) | TypeDecl::Union(_) => (
                ObjectKind::Struct,
                FfiDescriptor::Struct {
                    inner_type: qualified.to_string(),
                    library,
                    size: layouts.type_size(qualified),
                    inline: false,
                    ownership: Ownership::None,
                },
            ),
            _ => return None,
        };
        Some(Owner {
            qualified: qualified.to_string(),
            kind,
            descriptor,
        })
    }

    /// Build the call plan of `callable`, declared on `owner` if it has one.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn build(
        &self,
        callable: &CallableInfo,
        owner: Option<&Owner>,
    ) -> Result<CallPlan, MappingError> {
        if callable.is_variadic() {
            return Err(MappingError::VariadicCallable {
                symbol: callable.c_symbol.clone(),
            });
        }

        let instance = match (callable.kind, owner) {
            (CallableKind::Method, Some(owner)) => Some(owner),
            (CallableKind::Method, None) => {
                return Err(MappingError::UnsupportedInContext {
                    type_name: callable.c_symbol.clone(),
                    context: "a method without an instance type",
                });
            }
            _ => None,
        };
        let offset = usize::from(instance.is_some());
        let count = callable.params.len();

        let mut imports = Vec::new();
        let mapped = callable
            .params
            .iter()
            .map(|p| {
                self.mapper.map_param(p).map(|m| {
                    imports.extend(m.imports);
                    m.descriptor
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let hidden = hidden_params(callable, &mapped)?;

        let mut args = Vec::with_capacity(count + offset + usize::from(callable.throws));
        let mut params = Vec::new();

        if let Some(owner) = instance {
            args.push(CallArg {
                name: "self".to_string(),
                descriptor: owner.descriptor.clone(),
                source: ArgSource::Instance,
                flags: ArgFlags::empty(),
            });
        }

        for (index, (param, descriptor)) in callable.params.iter().zip(mapped).enumerate() {
            let descriptor = shift_indices(descriptor, offset);
            let nullable = param.type_ref.nullable;

            let (source, mut flags) = match hidden[index] {
                Some(Hidden::Length { array }) => {
                    let source = match array {
                        Some(array) => ArgSource::ArrayLength {
                            array: array + offset,
                        },
                        None => ArgSource::ReturnLength,
                    };
                    (source, ArgFlags::HIDDEN)
                }
                Some(Hidden::Closure { callback }) => {
                    args.push(CallArg {
                        name: param.name.clone(),
                        descriptor: FfiDescriptor::primitive(
                            PrimitiveKind::Pointer,
                            self.pointer_size,
                        ),
                        source: ArgSource::ClosureData {
                            callback: callback + offset,
                        },
                        flags: ArgFlags::HIDDEN | ArgFlags::NULLABLE,
                    });
                    continue;
                }
                Some(Hidden::Destroy { callback }) => {
                    args.push(CallArg {
                        name: param.name.clone(),
                        descriptor: self.destroy_notify(),
                        source: ArgSource::DestroyNotify {
                            callback: callback + offset,
                        },
                        flags: ArgFlags::HIDDEN | ArgFlags::NULLABLE,
                    });
                    continue;
                }
                None if param.direction == ParamDirection::Out => {
                    (ArgSource::OutSlot, ArgFlags::HIDDEN)
                }
                None => {
                    params.push(VisibleParam {
                        name: param.name.clone(),
                        descriptor: descriptor.clone(),
                        optional: param.optional || nullable,
                        nullable,
                    });
                    (ArgSource::Caller(params.len() - 1), ArgFlags::empty())
                }
            };

            if param.direction.is_by_reference() {
                flags |= ArgFlags::OUTPUT;
            }
            if param.caller_allocates {
                flags |= ArgFlags::CALLER_ALLOCATES;
            }
            if param.optional || nullable {
                flags |= ArgFlags::OPTIONAL;
            }
            if nullable {
                flags |= ArgFlags::NULLABLE;
            }

            args.push(CallArg {
                name: param.name.clone(),
                descriptor,
                source,
                flags,
            });
        }

        if callable.throws {
            args.push(CallArg {
                name: "error".to_string(),
                descriptor: self.mapper.error_slot(),
                source: ArgSource::ErrorSlot,
                flags: ArgFlags::HIDDEN | ArgFlags::OUTPUT | ArgFlags::NULLABLE,
            });
        }

        let returns = self.mapper.map(&callable.return_type, UseContext::Return)?;
        imports.extend(returns.imports);
        imports.sort();
        imports.dedup();

        Ok(CallPlan {
            name: callable.name.clone(),
            symbol: callable.c_symbol.clone(),
            library: self.library.to_string(),
            kind: callable.kind,
            args,
            params,
            returns: shift_indices(returns.descriptor, offset),
            return_nullable: callable.return_type.nullable,
            throws: callable.throws,
            imports,
        })
    }

    /// Build the handler contract of a signal emitted by `owner`.
    pub fn build_signal(
        &self,
        signal: &SignalInfo,
        owner: &Owner,
    ) -> Result<SignalPlan, MappingError> {
        let mut imports = Vec::new();
        let mut handler_params = vec![owner.descriptor.clone()];
        let mut params = Vec::with_capacity(signal.params.len());

        for param in &signal.params {
            let mapped = self.mapper.map_param(param)?;
            imports.extend(mapped.imports);
            handler_params.push(mapped.descriptor.clone());
            params.push(VisibleParam {
                name: param.name.clone(),
                descriptor: mapped.descriptor,
                optional: param.optional,
                nullable: param.type_ref.nullable,
            });
        }
        handler_params.push(FfiDescriptor::primitive(
            PrimitiveKind::Pointer,
            self.pointer_size,
        ));

        let returns = self.mapper.map(&signal.return_type, UseContext::Return)?;
        imports.extend(returns.imports);
        imports.push(Import::runtime("closure"));
        imports.sort();
        imports.dedup();

        let user_data_index = handler_params.len() - 1;
        Ok(SignalPlan {
            name: signal.name.clone(),
            handler: FfiDescriptor::Callback {
                trampoline: Trampoline::Closure,
                params: handler_params,
                result: Box::new(returns.descriptor.clone()),
                scope: CallbackScope::Notified,
                user_data_index: Some(user_data_index),
                destroy_index: None,
            },
            params,
            returns: returns.descriptor,
            imports,
        })
    }

    fn destroy_notify(&self) -> FfiDescriptor {
        FfiDescriptor::Callback {
            trampoline: Trampoline::DestroyNotify,
            params: vec![FfiDescriptor::primitive(
                PrimitiveKind::Pointer,
                self.pointer_size,
            )],
            result: Box::new(FfiDescriptor::Null),
            scope: CallbackScope::Forever,
            user_data_index: None,
            destroy_index: None,
        }
    }
}

/// Work out which schema parameters are convention artifacts.
fn hidden_params(
    callable: &CallableInfo,
    mapped: &[FfiDescriptor],
) -> Result<Vec<Option<Hidden>>, MappingError> {
    let count = callable.params.len();
    let mut hidden = vec![None; count];
    let mut mark = |index: usize, owner: usize, why: Hidden| {
        if index >= count {
            return Err(MappingError::InvalidParamIndex { index, count });
        }
        if index != owner {
            hidden[index] = Some(why);
        }
        Ok(())
    };

    if let Some(length) = array_length_param(&callable.return_type) {
        mark(length, usize::MAX, Hidden::Length { array: None })?;
    }

    for (index, (param, descriptor)) in callable.params.iter().zip(mapped).enumerate() {
        if let Some(length) = array_length_param(&param.type_ref) {
            mark(length, index, Hidden::Length { array: Some(index) })?;
        }
        if matches!(descriptor, FfiDescriptor::Callback { .. }) {
            if let Some(closure) = param.closure_index {
                mark(closure, index, Hidden::Closure { callback: index })?;
            }
            if let Some(destroy) = param.destroy_index {
                mark(destroy, index, Hidden::Destroy { callback: index })?;
            }
        }
    }
    Ok(hidden)
}

fn array_length_param(ty: &TypeRef) -> Option<usize> {
    ty.array.as_ref().and_then(|shape| shape.length_param)
}

/// Rewrite schema parameter indices inside a descriptor to native positions.
fn shift_indices(descriptor: FfiDescriptor, offset: usize) -> FfiDescriptor {
    if offset == 0 {
        return descriptor;
    }
    match descriptor {
        FfiDescriptor::Reference { inner } => {
            FfiDescriptor::reference(shift_indices(*inner, offset))
        }
        FfiDescriptor::Array {
            element,
            ownership,
            length: ArrayLength::Param(index),
            kind,
            element_size,
        } => FfiDescriptor::Array {
            element,
            ownership,
            length: ArrayLength::Param(index + offset),
            kind,
            element_size,
        },
        FfiDescriptor::Callback {
            trampoline,
            params,
            result,
            scope,
            user_data_index,
            destroy_index,
        } => FfiDescriptor::Callback {
            trampoline,
            params,
            result,
            scope,
            user_data_index: user_data_index.map(|i| i + offset),
            destroy_index: destroy_index.map(|i| i + offset),
        },
        other => other,
    }
}
