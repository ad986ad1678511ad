//! Value type resolution.
//!
//! SSA values do not carry their types explicitly; the back end asks this
//! module for them. Most results are handles into the module's type arena,
//! but a few operations (pointers into vectors, comparisons) synthesize
//! types that have no arena entry, hence [`TypeResolution`].

use crate::{
    AddressSpace, Bytes, Function, FunctionOrigin, Handle, Module, ScalarKind, Type, TypeInner,
    Value, VectorSize,
};
use thiserror::Error;

/// The type of a value, either stored in the module or synthesized.
#[derive(Clone, Debug, PartialEq)]
pub enum TypeResolution {
    /// A type tracked in the module's arena.
    Handle(Handle<Type>),
    Scalar {
        kind: ScalarKind,
        width: Bytes,
    },
    Vector {
        size: VectorSize,
        kind: ScalarKind,
        width: Bytes,
    },
    /// Pointer to an arena-tracked type.
    Pointer {
        base: Handle<Type>,
        space: AddressSpace,
    },
    /// Pointer to a scalar that has no arena entry (e.g. a vector lane).
    ScalarPointer {
        kind: ScalarKind,
        width: Bytes,
        space: AddressSpace,
    },
}

#[derive(Clone, Debug, Error, PartialEq)]
pub enum ResolveError {
    #[error("value {0:?} yields no result")]
    NoResult(Handle<Value>),
    #[error("accessing a non-composite type")]
    InvalidAccess,
    #[error("expected a pointer operand")]
    NotAPointer,
    #[error("struct access requires a constant index")]
    NonConstantStructIndex,
    #[error("argument index {0} is out of bounds")]
    BadArgumentIndex(u32),
    #[error("builtin '{0}' has no known result type")]
    UnknownExternal(String),
}

fn scalar_of(module: &Module, resolution: &TypeResolution) -> Result<(ScalarKind, Bytes), ResolveError> {
    match *resolution {
        TypeResolution::Scalar { kind, width } | TypeResolution::Vector { kind, width, .. } => {
            Ok((kind, width))
        }
        TypeResolution::Handle(handle) => match module.types[handle].inner {
            TypeInner::Scalar { kind, width } | TypeInner::Vector { kind, width, .. } => {
                Ok((kind, width))
            }
            _ => Err(ResolveError::InvalidAccess),
        },
        _ => Err(ResolveError::InvalidAccess),
    }
}

fn vector_size_of(module: &Module, resolution: &TypeResolution) -> Option<VectorSize> {
    match *resolution {
        TypeResolution::Vector { size, .. } => Some(size),
        TypeResolution::Handle(handle) => match module.types[handle].inner {
            TypeInner::Vector { size, .. } => Some(size),
            _ => None,
        },
        _ => None,
    }
}

/// Walk one composite level down from an arena type.
fn access_member(
    module: &Module,
    base: Handle<Type>,
    index: Option<u32>,
) -> Result<TypeResolution, ResolveError> {
    match module.types[base].inner {
        TypeInner::Array { base, .. } => Ok(TypeResolution::Handle(base)),
        TypeInner::Struct { ref members } => {
            let index = index.ok_or(ResolveError::NonConstantStructIndex)?;
            members
                .get(index as usize)
                .map(|&member| TypeResolution::Handle(member))
                .ok_or(ResolveError::InvalidAccess)
        }
        TypeInner::Vector { kind, width, .. } => Ok(TypeResolution::Scalar { kind, width }),
        _ => Err(ResolveError::InvalidAccess),
    }
}

/// View a resolution as a pointer, returning the pointee and address space.
fn pointer_of(
    module: &Module,
    resolution: TypeResolution,
) -> Result<(TypeResolution, AddressSpace), ResolveError> {
    match resolution {
        TypeResolution::Pointer { base, space } => Ok((TypeResolution::Handle(base), space)),
        TypeResolution::ScalarPointer { kind, width, space } => {
            Ok((TypeResolution::Scalar { kind, width }, space))
        }
        TypeResolution::Handle(handle) => match module.types[handle].inner {
            TypeInner::Pointer { base, space } => Ok((TypeResolution::Handle(base), space)),
            _ => Err(ResolveError::NotAPointer),
        },
        _ => Err(ResolveError::NotAPointer),
    }
}

fn constant_index(fun: &Function, module: &Module, value: Handle<Value>) -> Option<u32> {
    match fun.values[value] {
        Value::Constant(handle) => match module.constants[handle].inner {
            crate::ConstantInner::Sint(v) => Some(v as u32),
            crate::ConstantInner::Uint(v) => Some(v as u32),
            _ => None,
        },
        _ => None,
    }
}

/// Resolve the result type of an external builtin call.
fn external_result(
    module: &Module,
    fun: &Function,
    name: &str,
    arguments: &[Handle<Value>],
) -> Result<TypeResolution, ResolveError> {
    let first = || {
        arguments
            .first()
            .copied()
            .ok_or(ResolveError::InvalidAccess)
            .and_then(|argument| resolve_value(module, fun, argument))
    };
    match name {
        "read_imagef" => Ok(TypeResolution::Vector {
            size: VectorSize::Quad,
            kind: ScalarKind::Float,
            width: 4,
        }),
        "get_image_width" | "get_image_height" | "get_image_depth" | "get_local_size" => {
            Ok(TypeResolution::Scalar {
                kind: ScalarKind::Uint,
                width: 4,
            })
        }
        "isinf" | "isnan" => {
            let arg = first()?;
            Ok(match vector_size_of(module, &arg) {
                Some(size) => TypeResolution::Vector {
                    size,
                    kind: ScalarKind::Bool,
                    width: 1,
                },
                None => TypeResolution::Scalar {
                    kind: ScalarKind::Bool,
                    width: 1,
                },
            })
        }
        "any" | "all" => Ok(TypeResolution::Scalar {
            kind: ScalarKind::Bool,
            width: 1,
        }),
        "dot" => {
            let (kind, width) = scalar_of(module, &first()?)?;
            Ok(TypeResolution::Scalar { kind, width })
        }
        // The math builtins are shape-preserving.
        _ => first().map_err(|_| ResolveError::UnknownExternal(name.to_string())),
    }
}

/// Resolve the type of an SSA value.
pub fn resolve_value(
    module: &Module,
    fun: &Function,
    value: Handle<Value>,
) -> Result<TypeResolution, ResolveError> {
    match fun.values[value] {
        Value::Argument(index) => fun
            .arguments
            .get(index as usize)
            .map(|argument| TypeResolution::Handle(argument.ty))
            .ok_or(ResolveError::BadArgumentIndex(index)),
        Value::Global(handle) => {
            let var = &module.global_variables[handle];
            Ok(TypeResolution::Pointer {
                base: var.ty,
                space: var.space,
            })
        }
        Value::Constant(handle) => Ok(TypeResolution::Handle(module.constants[handle].ty)),
        Value::Alloca { ty } => Ok(TypeResolution::Pointer {
            base: ty,
            space: AddressSpace::Function,
        }),
        Value::Binary { left, .. } => resolve_value(module, fun, left),
        Value::Compare { left, .. } => {
            let operand = resolve_value(module, fun, left)?;
            Ok(match vector_size_of(module, &operand) {
                Some(size) => TypeResolution::Vector {
                    size,
                    kind: ScalarKind::Bool,
                    width: 1,
                },
                None => TypeResolution::Scalar {
                    kind: ScalarKind::Bool,
                    width: 1,
                },
            })
        }
        Value::Cast { to, .. } => Ok(TypeResolution::Handle(to)),
        Value::Select { accept, .. } => resolve_value(module, fun, accept),
        Value::Compose { ty, .. } => Ok(TypeResolution::Handle(ty)),
        Value::GetPtr { base, ref indices } => {
            let resolution = resolve_value(module, fun, base)?;
            let (mut pointee, space) = pointer_of(module, resolution)?;
            // The first index steps over the pointer itself.
            for &index in indices.iter().skip(1) {
                pointee = match pointee {
                    TypeResolution::Handle(handle) => {
                        access_member(module, handle, constant_index(fun, module, index))?
                    }
                    _ => return Err(ResolveError::InvalidAccess),
                };
            }
            Ok(match pointee {
                TypeResolution::Handle(base) => TypeResolution::Pointer { base, space },
                TypeResolution::Scalar { kind, width } => {
                    TypeResolution::ScalarPointer { kind, width, space }
                }
                _ => return Err(ResolveError::InvalidAccess),
            })
        }
        Value::Load { pointer } => {
            let resolution = resolve_value(module, fun, pointer)?;
            pointer_of(module, resolution).map(|(pointee, _)| pointee)
        }
        Value::Store { .. } => Err(ResolveError::NoResult(value)),
        Value::ExtractElement { vector, .. } => {
            let (kind, width) = scalar_of(module, &resolve_value(module, fun, vector)?)?;
            Ok(TypeResolution::Scalar { kind, width })
        }
        Value::InsertElement { vector, .. } => resolve_value(module, fun, vector),
        Value::Shuffle {
            first, ref pattern, ..
        } => {
            let (kind, width) = scalar_of(module, &resolve_value(module, fun, first)?)?;
            let size = match pattern.len() {
                2 => VectorSize::Bi,
                3 => VectorSize::Tri,
                4 => VectorSize::Quad,
                _ => return Err(ResolveError::InvalidAccess),
            };
            Ok(TypeResolution::Vector { size, kind, width })
        }
        Value::ExtractValue {
            composite,
            ref indices,
        } => {
            let mut resolution = resolve_value(module, fun, composite)?;
            for &index in indices {
                resolution = match resolution {
                    TypeResolution::Handle(handle) => access_member(module, handle, Some(index))?,
                    _ => return Err(ResolveError::InvalidAccess),
                };
            }
            Ok(resolution)
        }
        Value::InsertValue { composite, .. } => resolve_value(module, fun, composite),
        Value::Atomic { pointer, .. } => {
            let resolution = resolve_value(module, fun, pointer)?;
            pointer_of(module, resolution).map(|(pointee, _)| pointee)
        }
        Value::Phi { ty, .. } => Ok(TypeResolution::Handle(ty)),
        Value::Call {
            ref origin,
            ref arguments,
        } => match *origin {
            FunctionOrigin::Local(handle) => module.functions[handle]
                .result
                .map(TypeResolution::Handle)
                .ok_or(ResolveError::NoResult(value)),
            FunctionOrigin::External(ref name) => external_result(module, fun, name, arguments),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::{resolve_value, TypeResolution};
    use crate::{
        AddressSpace, Arena, Comparison, Function, Handle, Module, ScalarKind, Type, TypeInner,
        Value, VectorSize,
    };

    fn empty_function() -> Function {
        Function {
            name: "f".to_string(),
            arguments: Vec::new(),
            result: None,
            kernel: None,
            values: Arena::new(),
            blocks: Vec::new(),
        }
    }

    fn scalar(module: &mut Module, kind: ScalarKind, width: u8) -> Handle<Type> {
        module.types.fetch_or_append(Type {
            name: None,
            inner: TypeInner::Scalar { kind, width },
        })
    }

    #[test]
    fn compare_of_vector_is_bool_vector() {
        let mut module = Module::new();
        let float = scalar(&mut module, ScalarKind::Float, 4);
        let vec4 = module.types.append(Type {
            name: None,
            inner: TypeInner::Vector {
                size: VectorSize::Quad,
                kind: ScalarKind::Float,
                width: 4,
            },
        });
        let constant = module.constants.append(crate::Constant {
            name: None,
            ty: vec4,
            inner: crate::ConstantInner::Null,
        });
        let _ = float;
        let mut fun = empty_function();
        let left = fun.values.append(Value::Constant(constant));
        let cmp = fun.values.append(Value::Compare {
            op: Comparison::FloatOrdLess,
            left,
            right: left,
        });
        assert_eq!(
            resolve_value(&module, &fun, cmp),
            Ok(TypeResolution::Vector {
                size: VectorSize::Quad,
                kind: ScalarKind::Bool,
                width: 1,
            })
        );
    }

    #[test]
    fn getptr_into_struct() {
        let mut module = Module::new();
        let uint = scalar(&mut module, ScalarKind::Uint, 4);
        let st = module.types.append(Type {
            name: None,
            inner: TypeInner::Struct {
                members: vec![uint, uint],
            },
        });
        let ptr = module.types.append(Type {
            name: None,
            inner: TypeInner::Pointer {
                base: st,
                space: AddressSpace::Global,
            },
        });
        let uint_ty = uint;
        let zero = module.constants.append(crate::Constant {
            name: None,
            ty: uint_ty,
            inner: crate::ConstantInner::Uint(0),
        });
        let one = module.constants.append(crate::Constant {
            name: None,
            ty: uint_ty,
            inner: crate::ConstantInner::Uint(1),
        });
        let mut fun = empty_function();
        fun.arguments.push(crate::FunctionArgument {
            name: "p".to_string(),
            ty: ptr,
            spec_id: None,
        });
        let base = fun.values.append(Value::Argument(0));
        let zero = fun.values.append(Value::Constant(zero));
        let one = fun.values.append(Value::Constant(one));
        let access = fun.values.append(Value::GetPtr {
            base,
            indices: vec![zero, one],
        });
        assert_eq!(
            resolve_value(&module, &fun, access),
            Ok(TypeResolution::Pointer {
                base: uint_ty,
                space: AddressSpace::Global,
            })
        );
    }
}
