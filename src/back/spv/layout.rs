//! Byte layout rules for types crossing the shader interface.
//!
//! These follow the OpenCL C sizes: a scalar is its width, a 3-vector takes
//! the room of a 4-vector, arrays are padded to their element alignment, and
//! structs use C-like member placement.

use crate::{Constant, ConstantInner, Handle, Module, Type, TypeInner};

#[derive(Clone, Copy, Debug, PartialEq)]
pub(super) struct TypeLayout {
    pub size: u32,
    pub alignment: u32,
}

fn round_up(value: u32, alignment: u32) -> u32 {
    (value + alignment - 1) / alignment * alignment
}

pub(super) fn inner_layout(module: &Module, inner: &TypeInner) -> TypeLayout {
    match *inner {
        TypeInner::Scalar { width, .. } => TypeLayout {
            size: width as u32,
            alignment: width as u32,
        },
        TypeInner::Vector { size, width, .. } => {
            let count = match size {
                crate::VectorSize::Bi => 2,
                // A 3-vector occupies the room of a 4-vector.
                crate::VectorSize::Tri | crate::VectorSize::Quad => 4,
            };
            TypeLayout {
                size: count * width as u32,
                alignment: count * width as u32,
            }
        }
        TypeInner::Array { base, length } => {
            let stride = array_stride(module, base);
            TypeLayout {
                size: stride * length,
                alignment: layout_of(module, base).alignment,
            }
        }
        TypeInner::Struct { ref members } => {
            let (_, size, alignment) = struct_layout(module, members);
            TypeLayout { size, alignment }
        }
        // Opaque and pointer types have no interface layout; give them a
        // word so accidental queries stay finite.
        TypeInner::Pointer { .. } | TypeInner::Image { .. } | TypeInner::Sampler => TypeLayout {
            size: 4,
            alignment: 4,
        },
    }
}

pub(super) fn layout_of(module: &Module, ty: Handle<Type>) -> TypeLayout {
    inner_layout(module, &module.types[ty].inner)
}

/// Distance between consecutive array elements of the given base type.
pub(super) fn array_stride(module: &Module, base: Handle<Type>) -> u32 {
    let layout = layout_of(module, base);
    round_up(layout.size, layout.alignment)
}

/// Member offsets, total size and alignment of a struct.
pub(super) fn struct_layout(module: &Module, members: &[Handle<Type>]) -> (Vec<u32>, u32, u32) {
    let mut offsets = Vec::with_capacity(members.len());
    let mut offset = 0;
    let mut alignment = 1;
    for &member in members {
        let layout = layout_of(module, member);
        offset = round_up(offset, layout.alignment);
        offsets.push(offset);
        offset += layout.size;
        alignment = alignment.max(layout.alignment);
    }
    (offsets, round_up(offset.max(1), alignment), alignment)
}

fn write_scalar_bytes(value: u64, width: u32, out: &mut [u8]) {
    for (index, byte) in out.iter_mut().enumerate().take(width as usize) {
        *byte = (value >> (index * 8)) as u8;
    }
}

fn fill_constant_bytes(module: &Module, constant: &Constant, out: &mut [u8]) {
    match constant.inner {
        ConstantInner::Bool(value) => out[0] = value as u8,
        ConstantInner::Sint(value) => {
            let width = layout_of(module, constant.ty).size;
            write_scalar_bytes(value as u64, width, out);
        }
        ConstantInner::Uint(value) => {
            let width = layout_of(module, constant.ty).size;
            write_scalar_bytes(value, width, out);
        }
        ConstantInner::Float(value) => match layout_of(module, constant.ty).size {
            8 => write_scalar_bytes(value.to_bits(), 8, out),
            _ => write_scalar_bytes((value as f32).to_bits() as u64, 4, out),
        },
        // All-zero and undefined data serialize as zeroes.
        ConstantInner::Null | ConstantInner::Undef => {}
        ConstantInner::Composite(ref components) => match module.types[constant.ty].inner {
            TypeInner::Vector { width, .. } => {
                for (index, &component) in components.iter().enumerate() {
                    let offset = index * width as usize;
                    fill_constant_bytes(module, &module.constants[component], &mut out[offset..]);
                }
            }
            TypeInner::Array { base, .. } => {
                let stride = array_stride(module, base) as usize;
                for (index, &component) in components.iter().enumerate() {
                    let offset = index * stride;
                    fill_constant_bytes(module, &module.constants[component], &mut out[offset..]);
                }
            }
            TypeInner::Struct { ref members } => {
                let (offsets, _, _) = struct_layout(module, members);
                for (&component, &offset) in components.iter().zip(offsets.iter()) {
                    fill_constant_bytes(
                        module,
                        &module.constants[component],
                        &mut out[offset as usize..],
                    );
                }
            }
            _ => {}
        },
    }
}

/// Flatten a constant into its interface byte representation.
pub(super) fn constant_bytes(module: &Module, constant: Handle<Constant>) -> Vec<u8> {
    let constant = &module.constants[constant];
    let mut bytes = vec![0u8; layout_of(module, constant.ty).size as usize];
    fill_constant_bytes(module, constant, &mut bytes);
    bytes
}

#[cfg(test)]
mod tests {
    use crate::{Constant, ConstantInner, Module, ScalarKind, Type, TypeInner, VectorSize};

    #[test]
    fn vec3_rounds_up() {
        let mut module = Module::new();
        let _ = module.types.append(Type {
            name: None,
            inner: TypeInner::Scalar {
                kind: ScalarKind::Float,
                width: 4,
            },
        });
        let layout = super::inner_layout(
            &module,
            &TypeInner::Vector {
                size: VectorSize::Tri,
                kind: ScalarKind::Float,
                width: 4,
            },
        );
        assert_eq!(layout.size, 16);
        assert_eq!(layout.alignment, 16);
    }

    #[test]
    fn array_of_uint_bytes() {
        let mut module = Module::new();
        let uint = module.types.append(Type {
            name: None,
            inner: TypeInner::Scalar {
                kind: ScalarKind::Uint,
                width: 4,
            },
        });
        let array = module.types.append(Type {
            name: None,
            inner: TypeInner::Array {
                base: uint,
                length: 2,
            },
        });
        let one = module.constants.append(Constant {
            name: None,
            ty: uint,
            inner: ConstantInner::Uint(0x01020304),
        });
        let two = module.constants.append(Constant {
            name: None,
            ty: uint,
            inner: ConstantInner::Uint(5),
        });
        let composite = module.constants.append(Constant {
            name: None,
            ty: array,
            inner: ConstantInner::Composite(vec![one, two]),
        });
        assert_eq!(
            super::constant_bytes(&module, composite),
            vec![0x04, 0x03, 0x02, 0x01, 5, 0, 0, 0]
        );
    }

    #[test]
    fn struct_member_offsets() {
        let mut module = Module::new();
        let ushort = module.types.append(Type {
            name: None,
            inner: TypeInner::Scalar {
                kind: ScalarKind::Uint,
                width: 2,
            },
        });
        let uint = module.types.append(Type {
            name: None,
            inner: TypeInner::Scalar {
                kind: ScalarKind::Uint,
                width: 4,
            },
        });
        let (offsets, size, alignment) = super::struct_layout(&module, &[ushort, uint]);
        assert_eq!(offsets, vec![0, 4]);
        assert_eq!(size, 8);
        assert_eq!(alignment, 4);
    }
}
