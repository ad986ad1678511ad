//! Vulkan resource binding for kernel arguments.
//!
//! OpenCL kernels receive their arguments directly; Vulkan compute shaders
//! receive descriptor-bound resources. This module classifies every kernel
//! argument, assigns it a (descriptor set, binding) address, and models the
//! descriptor-map sidecar that tells the runtime how to feed the kernel.

use crate::{AddressSpace, Handle, ImageAccess, Module, Type, TypeInner};
use std::fmt;
use std::io::{Error as IoError, Write};

/// How a kernel argument reaches the shader.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArgKind {
    /// `global` or `constant` pointer: a storage buffer.
    Buffer,
    /// Plain-old-data argument wrapped in a storage buffer.
    Pod,
    /// Plain-old-data argument wrapped in a uniform buffer.
    PodUniform,
    /// `read_only` image.
    ReadOnlyImage,
    /// `write_only` image.
    WriteOnlyImage,
    /// Sampler argument.
    Sampler,
    /// `local` pointer, backed by a spec-constant-sized workgroup array
    /// rather than a descriptor.
    Local,
}

impl ArgKind {
    pub fn as_str(&self) -> &'static str {
        match *self {
            ArgKind::Buffer => "buffer",
            ArgKind::Pod => "pod",
            ArgKind::PodUniform => "pod_ubo",
            ArgKind::ReadOnlyImage => "ro_image",
            ArgKind::WriteOnlyImage => "wo_image",
            ArgKind::Sampler => "sampler",
            ArgKind::Local => "local",
        }
    }

    /// Returns `true` if the argument consumes a descriptor binding.
    pub fn has_binding(&self) -> bool {
        !matches!(*self, ArgKind::Local)
    }
}

/// Classify a kernel argument type.
pub(super) fn classify_argument(module: &Module, ty: Handle<Type>, pod_ubo: bool) -> ArgKind {
    match module.types[ty].inner {
        TypeInner::Pointer { space, .. } => match space {
            AddressSpace::Local => ArgKind::Local,
            _ => ArgKind::Buffer,
        },
        TypeInner::Image { access, .. } => match access {
            ImageAccess::ReadOnly => ArgKind::ReadOnlyImage,
            ImageAccess::WriteOnly => ArgKind::WriteOnlyImage,
        },
        TypeInner::Sampler => ArgKind::Sampler,
        _ if pod_ubo => ArgKind::PodUniform,
        _ => ArgKind::Pod,
    }
}

/// The storage class backing each argument kind.
pub(super) fn storage_class(kind: ArgKind) -> spirv::StorageClass {
    match kind {
        ArgKind::Buffer | ArgKind::Pod => spirv::StorageClass::StorageBuffer,
        ArgKind::PodUniform => spirv::StorageClass::Uniform,
        ArgKind::ReadOnlyImage | ArgKind::WriteOnlyImage | ArgKind::Sampler => {
            spirv::StorageClass::UniformConstant
        }
        ArgKind::Local => spirv::StorageClass::Workgroup,
    }
}

/// A literal sampler provided through the sampler map option.
#[derive(Clone, Debug, PartialEq)]
pub struct SamplerMapEntry {
    /// The literal bitmask value of the sampler expression.
    pub value: u32,
    /// The source text of the expression, echoed into the descriptor map.
    pub expr: String,
}

/// One record of the descriptor-map sidecar.
#[derive(Clone, Debug, PartialEq)]
pub enum DescriptorMapEntry {
    KernelArg {
        kernel: String,
        arg: String,
        ordinal: u32,
        descriptor_set: u32,
        binding: u32,
        offset: u32,
        kind: ArgKind,
    },
    LocalArg {
        kernel: String,
        arg: String,
        ordinal: u32,
        element_size: u32,
        spec_id: u32,
    },
    Sampler {
        value: u32,
        expr: String,
        descriptor_set: u32,
        binding: u32,
    },
    Constant {
        descriptor_set: u32,
        hex_bytes: String,
    },
}

impl fmt::Display for DescriptorMapEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            DescriptorMapEntry::KernelArg {
                ref kernel,
                ref arg,
                ordinal,
                descriptor_set,
                binding,
                offset,
                kind,
            } => write!(
                f,
                "kernel,{},arg,{},argOrdinal,{},descriptorSet,{},binding,{},offset,{},argKind,{}",
                kernel,
                arg,
                ordinal,
                descriptor_set,
                binding,
                offset,
                kind.as_str(),
            ),
            DescriptorMapEntry::LocalArg {
                ref kernel,
                ref arg,
                ordinal,
                element_size,
                spec_id,
            } => write!(
                f,
                "kernel,{},arg,{},argOrdinal,{},argKind,local,arrayElemSize,{},arrayNumElemSpecId,{}",
                kernel, arg, ordinal, element_size, spec_id,
            ),
            DescriptorMapEntry::Sampler {
                value,
                ref expr,
                descriptor_set,
                binding,
            } => write!(
                f,
                "sampler,{},samplerExpr,\"{}\",descriptorSet,{},binding,{}",
                value, expr, descriptor_set, binding,
            ),
            DescriptorMapEntry::Constant {
                descriptor_set,
                ref hex_bytes,
            } => write!(
                f,
                "constant,descriptorSet,{},binding,0,kind,buffer,hexbytes,{}",
                descriptor_set, hex_bytes,
            ),
        }
    }
}

/// The descriptor-map sidecar: one record per bound resource, in binding
/// order of discovery.
#[derive(Debug, Default, PartialEq)]
pub struct DescriptorMap {
    pub entries: Vec<DescriptorMapEntry>,
}

impl DescriptorMap {
    /// Render the map as newline-terminated CSV records.
    pub fn to_csv(&self) -> String {
        let mut out = String::new();
        for entry in self.entries.iter() {
            out.push_str(&entry.to_string());
            out.push('\n');
        }
        out
    }

    /// Write the CSV records to a stream.
    pub fn write<W: Write>(&self, out: &mut W) -> Result<(), IoError> {
        out.write_all(self.to_csv().as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::{ArgKind, DescriptorMap, DescriptorMapEntry};

    #[test]
    fn kernel_arg_record() {
        let entry = DescriptorMapEntry::KernelArg {
            kernel: "foo".to_string(),
            arg: "a".to_string(),
            ordinal: 0,
            descriptor_set: 0,
            binding: 0,
            offset: 0,
            kind: ArgKind::ReadOnlyImage,
        };
        assert_eq!(
            entry.to_string(),
            "kernel,foo,arg,a,argOrdinal,0,descriptorSet,0,binding,0,offset,0,argKind,ro_image"
        );
    }

    #[test]
    fn local_arg_record() {
        let entry = DescriptorMapEntry::LocalArg {
            kernel: "k".to_string(),
            arg: "l".to_string(),
            ordinal: 0,
            element_size: 4,
            spec_id: 3,
        };
        assert_eq!(
            entry.to_string(),
            "kernel,k,arg,l,argOrdinal,0,argKind,local,arrayElemSize,4,arrayNumElemSpecId,3"
        );
    }

    #[test]
    fn sampler_record() {
        let entry = DescriptorMapEntry::Sampler {
            value: 0x12,
            expr: "CLK_ADDRESS_NONE|CLK_FILTER_NEAREST".to_string(),
            descriptor_set: 0,
            binding: 0,
        };
        assert_eq!(
            entry.to_string(),
            "sampler,18,samplerExpr,\"CLK_ADDRESS_NONE|CLK_FILTER_NEAREST\",descriptorSet,0,binding,0"
        );
    }

    #[test]
    fn csv_is_newline_terminated() {
        let map = DescriptorMap {
            entries: vec![DescriptorMapEntry::Constant {
                descriptor_set: 1,
                hex_bytes: "2a000000".to_string(),
            }],
        };
        assert_eq!(
            map.to_csv(),
            "constant,descriptorSet,1,binding,0,kind,buffer,hexbytes,2a000000\n"
        );
    }
}
