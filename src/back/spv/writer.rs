//! The lowering pass from the kernel IR to SPIR-V.
//!
//! Lowering runs in phases over one module: a discovery walk interns every
//! type and constant the output will need, argument lowering assigns
//! descriptor bindings, the type/constant/variable emitters drain the interned
//! tables in discovery order, the instruction lowerer translates each function
//! body, and a deferred-fixup walk resolves forward references (branches,
//! phis, calls) and inserts the structured control-flow merges. The module
//! preamble is assembled last, when the full capability set is known.

use super::{
    instructions::{self, Instruction},
    layout, resources, ArgBinding, ConstantKey, DeferredItem, Error, FunctionInfo, LocalArgInfo,
    LocalType, LookupFunctionType, LookupType, Options, Writer, WriterFlags,
};
use crate::proc::{resolve_value, FlowInfo, ResolveError, TypeResolution};
use crate::{
    AddressSpace, AtomicOperator, BinaryOperator, Bytes, CastKind, Comparison, ConstantInner,
    FunctionOrigin, Handle, ImageAccess, ImageDimension, Module, ScalarKind, Terminator, TypeInner,
    Value, VectorSize,
};
use spirv::{Op, Word};

const EXT_INST_SET: &str = "GLSL.std.450";
/// 1/pi, used by the *pi inverse trigonometry builtins.
const INV_PI: f64 = 0.318_309_886_183_790_671_538;
/// Device scope for atomics.
const SCOPE_DEVICE: u32 = spirv::Scope::Device as u32;
/// Workgroup scope for barriers.
const SCOPE_WORKGROUP: u32 = spirv::Scope::Workgroup as u32;
const SEMANTICS_ATOMIC: u32 = spirv::MemorySemantics::UNIFORM_MEMORY.bits()
    | spirv::MemorySemantics::SEQUENTIALLY_CONSISTENT.bits();

/// Follow-up operation of an "indirect" extended instruction.
#[derive(Clone, Copy, Debug)]
enum Indirect {
    /// `clz(x)` is `31 - FindUMsb(x)`.
    SubFrom31,
    /// The *pi family divides the plain result by pi.
    MulInvPi,
}

/// What a recognized builtin call lowers to.
#[derive(Clone, Copy, Debug)]
enum Builtin {
    ExtInst(spirv::GLOp),
    ExtInstIndirect(spirv::GLOp, Indirect),
    ReadImage,
    WriteImage,
    ImageSize { component: u32 },
    Dot,
    FMod,
    PopCount,
    Any,
    All,
    IsInf,
    IsNan,
    Barrier,
    MemFence,
    SamplerInit,
    WorkGroupSize,
}

/// Builtin dispatch table. Sorted by name for binary search.
const BUILTIN_TABLE: &[(&str, Builtin)] = &[
    ("__translate_sampler_initializer", Builtin::SamplerInit),
    ("acos", Builtin::ExtInst(spirv::GLOp::Acos)),
    (
        "acospi",
        Builtin::ExtInstIndirect(spirv::GLOp::Acos, Indirect::MulInvPi),
    ),
    ("all", Builtin::All),
    ("any", Builtin::Any),
    ("asin", Builtin::ExtInst(spirv::GLOp::Asin)),
    (
        "asinpi",
        Builtin::ExtInstIndirect(spirv::GLOp::Asin, Indirect::MulInvPi),
    ),
    ("atan", Builtin::ExtInst(spirv::GLOp::Atan)),
    ("atan2", Builtin::ExtInst(spirv::GLOp::Atan2)),
    (
        "atan2pi",
        Builtin::ExtInstIndirect(spirv::GLOp::Atan2, Indirect::MulInvPi),
    ),
    ("barrier", Builtin::Barrier),
    ("ceil", Builtin::ExtInst(spirv::GLOp::Ceil)),
    ("clamp", Builtin::ExtInst(spirv::GLOp::FClamp)),
    (
        "clz",
        Builtin::ExtInstIndirect(spirv::GLOp::FindUMsb, Indirect::SubFrom31),
    ),
    ("cos", Builtin::ExtInst(spirv::GLOp::Cos)),
    ("dot", Builtin::Dot),
    ("exp", Builtin::ExtInst(spirv::GLOp::Exp)),
    ("exp2", Builtin::ExtInst(spirv::GLOp::Exp2)),
    ("fabs", Builtin::ExtInst(spirv::GLOp::FAbs)),
    ("floor", Builtin::ExtInst(spirv::GLOp::Floor)),
    ("fma", Builtin::ExtInst(spirv::GLOp::Fma)),
    ("fmax", Builtin::ExtInst(spirv::GLOp::FMax)),
    ("fmin", Builtin::ExtInst(spirv::GLOp::FMin)),
    ("fmod", Builtin::FMod),
    ("get_image_depth", Builtin::ImageSize { component: 2 }),
    ("get_image_height", Builtin::ImageSize { component: 1 }),
    ("get_image_width", Builtin::ImageSize { component: 0 }),
    ("get_local_size", Builtin::WorkGroupSize),
    ("isinf", Builtin::IsInf),
    ("isnan", Builtin::IsNan),
    ("log", Builtin::ExtInst(spirv::GLOp::Log)),
    ("log2", Builtin::ExtInst(spirv::GLOp::Log2)),
    ("mad", Builtin::ExtInst(spirv::GLOp::Fma)),
    ("mem_fence", Builtin::MemFence),
    ("mix", Builtin::ExtInst(spirv::GLOp::FMix)),
    ("popcount", Builtin::PopCount),
    ("pow", Builtin::ExtInst(spirv::GLOp::Pow)),
    ("read_imagef", Builtin::ReadImage),
    ("rint", Builtin::ExtInst(spirv::GLOp::RoundEven)),
    ("round", Builtin::ExtInst(spirv::GLOp::Round)),
    ("rsqrt", Builtin::ExtInst(spirv::GLOp::InverseSqrt)),
    ("sin", Builtin::ExtInst(spirv::GLOp::Sin)),
    ("sqrt", Builtin::ExtInst(spirv::GLOp::Sqrt)),
    ("tan", Builtin::ExtInst(spirv::GLOp::Tan)),
    ("trunc", Builtin::ExtInst(spirv::GLOp::Trunc)),
    ("write_imagef", Builtin::WriteImage),
];

fn find_builtin(name: &str) -> Option<Builtin> {
    BUILTIN_TABLE
        .binary_search_by_key(&name, |&(entry, _)| entry)
        .ok()
        .map(|index| BUILTIN_TABLE[index].1)
}

fn map_address_space(space: AddressSpace) -> spirv::StorageClass {
    match space {
        AddressSpace::Function => spirv::StorageClass::Function,
        AddressSpace::Private => spirv::StorageClass::Private,
        // The two OpenCL data address spaces conflate into one class.
        AddressSpace::Global | AddressSpace::Constant => spirv::StorageClass::StorageBuffer,
        AddressSpace::Local => spirv::StorageClass::Workgroup,
    }
}

/// Apply the integer aliasing rules to a scalar or vector shape.
fn canonical_value(
    vector_size: Option<VectorSize>,
    kind: ScalarKind,
    width: Bytes,
) -> Result<LocalType, Error> {
    Ok(match kind {
        ScalarKind::Bool => match vector_size {
            None => LocalType::Bool,
            Some(size) => LocalType::Value {
                vector_size: Some(size),
                kind: ScalarKind::Bool,
                width: 1,
            },
        },
        ScalarKind::Sint | ScalarKind::Uint => match (vector_size, width) {
            // 8-bit integers widen to 32 bits.
            (None, 1) => LocalType::Value {
                vector_size: None,
                kind: ScalarKind::Uint,
                width: 4,
            },
            // `<4 x i8>` is an i32.
            (Some(VectorSize::Quad), 1) => LocalType::Value {
                vector_size: None,
                kind: ScalarKind::Uint,
                width: 4,
            },
            (Some(_), 1) => return Err(Error::Unsupported("8-bit vector other than <4 x i8>")),
            (size, width) => LocalType::Value {
                vector_size: size,
                kind: ScalarKind::Uint,
                width,
            },
        },
        ScalarKind::Float => LocalType::Value {
            vector_size,
            kind: ScalarKind::Float,
            width,
        },
    })
}

fn comparison_op(comparison: Comparison) -> Op {
    match comparison {
        Comparison::Equal => Op::IEqual,
        Comparison::NotEqual => Op::INotEqual,
        Comparison::UnsignedGreater => Op::UGreaterThan,
        Comparison::UnsignedGreaterEqual => Op::UGreaterThanEqual,
        Comparison::UnsignedLess => Op::ULessThan,
        Comparison::UnsignedLessEqual => Op::ULessThanEqual,
        Comparison::SignedGreater => Op::SGreaterThan,
        Comparison::SignedGreaterEqual => Op::SGreaterThanEqual,
        Comparison::SignedLess => Op::SLessThan,
        Comparison::SignedLessEqual => Op::SLessThanEqual,
        Comparison::FloatOrdEqual => Op::FOrdEqual,
        Comparison::FloatOrdNotEqual => Op::FOrdNotEqual,
        Comparison::FloatOrdGreater => Op::FOrdGreaterThan,
        Comparison::FloatOrdGreaterEqual => Op::FOrdGreaterThanEqual,
        Comparison::FloatOrdLess => Op::FOrdLessThan,
        Comparison::FloatOrdLessEqual => Op::FOrdLessThanEqual,
        Comparison::FloatUnordEqual => Op::FUnordEqual,
        Comparison::FloatUnordNotEqual => Op::FUnordNotEqual,
        Comparison::FloatUnordGreater => Op::FUnordGreaterThan,
        Comparison::FloatUnordGreaterEqual => Op::FUnordGreaterThanEqual,
        Comparison::FloatUnordLess => Op::FUnordLessThan,
        Comparison::FloatUnordLessEqual => Op::FUnordLessThanEqual,
    }
}

fn binary_op(op: BinaryOperator, kind: ScalarKind) -> Op {
    let float = kind == ScalarKind::Float;
    match op {
        BinaryOperator::Add => {
            if float {
                Op::FAdd
            } else {
                Op::IAdd
            }
        }
        BinaryOperator::Subtract => {
            if float {
                Op::FSub
            } else {
                Op::ISub
            }
        }
        BinaryOperator::Multiply => {
            if float {
                Op::FMul
            } else {
                Op::IMul
            }
        }
        BinaryOperator::Divide => match kind {
            ScalarKind::Float => Op::FDiv,
            ScalarKind::Sint => Op::SDiv,
            _ => Op::UDiv,
        },
        BinaryOperator::Modulo => match kind {
            ScalarKind::Float => Op::FRem,
            ScalarKind::Sint => Op::SRem,
            _ => Op::UMod,
        },
        BinaryOperator::And => Op::BitwiseAnd,
        BinaryOperator::InclusiveOr => Op::BitwiseOr,
        BinaryOperator::ExclusiveOr => Op::BitwiseXor,
        BinaryOperator::ShiftLeft => Op::ShiftLeftLogical,
        BinaryOperator::ShiftRightLogical => Op::ShiftRightLogical,
        BinaryOperator::ShiftRightArithmetic => Op::ShiftRightArithmetic,
    }
}

fn atomic_op(op: AtomicOperator) -> Op {
    match op {
        AtomicOperator::Add => Op::AtomicIAdd,
        AtomicOperator::Subtract => Op::AtomicISub,
        AtomicOperator::Exchange => Op::AtomicExchange,
        AtomicOperator::UnsignedMin => Op::AtomicUMin,
        AtomicOperator::UnsignedMax => Op::AtomicUMax,
        AtomicOperator::SignedMin => Op::AtomicSMin,
        AtomicOperator::SignedMax => Op::AtomicSMax,
        AtomicOperator::And => Op::AtomicAnd,
        AtomicOperator::InclusiveOr => Op::AtomicOr,
        AtomicOperator::ExclusiveOr => Op::AtomicXor,
        AtomicOperator::Increment => Op::AtomicIIncrement,
        AtomicOperator::Decrement => Op::AtomicIDecrement,
    }
}

/// Operand handles of an instruction, in operand order. Used by discovery to
/// find leaf constants that never appear in a block body.
fn value_operands(value: &Value) -> Vec<Handle<Value>> {
    match *value {
        Value::Argument(_) | Value::Global(_) | Value::Constant(_) | Value::Alloca { .. } => {
            Vec::new()
        }
        Value::Binary { left, right, .. } | Value::Compare { left, right, .. } => {
            vec![left, right]
        }
        Value::Cast { value, .. } => vec![value],
        Value::Select {
            condition,
            accept,
            reject,
        } => vec![condition, accept, reject],
        Value::Compose { ref components, .. } => components.clone(),
        Value::GetPtr { base, ref indices } => {
            let mut operands = vec![base];
            operands.extend_from_slice(indices);
            operands
        }
        Value::Load { pointer } => vec![pointer],
        Value::Store { pointer, value } => vec![pointer, value],
        Value::ExtractElement { vector, index } => vec![vector, index],
        Value::InsertElement {
            vector,
            component,
            index,
        } => vec![vector, component, index],
        Value::Shuffle { first, second, .. } => vec![first, second],
        Value::ExtractValue { composite, .. } => vec![composite],
        Value::InsertValue {
            composite, object, ..
        } => vec![composite, object],
        Value::Atomic { pointer, value, .. } => {
            let mut operands = vec![pointer];
            operands.extend(value);
            operands
        }
        Value::Phi { ref sources, .. } => sources.iter().map(|&(value, _)| value).collect(),
        Value::Call { ref arguments, .. } => arguments.clone(),
    }
}

/// Scalar shape of a numeric value: (vector size, kind, width).
type NumericShape = (Option<VectorSize>, ScalarKind, Bytes);

impl Writer {
    pub(super) fn new(options: &Options) -> Result<Self, Error> {
        let (major, minor) = options.lang_version;
        if (major, minor) != (1, 0) {
            return Err(Error::UnsupportedVersion(major, minor));
        }
        Ok(Writer {
            physical_layout: super::PhysicalLayout::new(major, minor),
            logical_layout: super::LogicalLayout::default(),
            id_gen: super::IdGenerator::default(),
            capabilities: crate::FastHashSet::default(),
            flags: options.flags,
            sampler_map: options.sampler_map.clone(),
            lookup_type: crate::FastHashMap::default(),
            type_order: Vec::new(),
            sampled_image_order: Vec::new(),
            lookup_function: crate::FastHashMap::default(),
            lookup_function_type: crate::FastHashMap::default(),
            constant_order: Vec::new(),
            known_constants: crate::FastHashSet::default(),
            cached_constants: crate::FastHashMap::default(),
            argument_bindings: crate::FastHashMap::default(),
            variable_reuse: crate::FastHashMap::default(),
            argument_variables: crate::FastHashMap::default(),
            local_args: crate::FastHashMap::default(),
            local_spec_constants: crate::FastHashMap::default(),
            sampler_variables: Vec::new(),
            global_variable_ids: Vec::new(),
            needs_array_stride: Vec::new(),
            strided_ids: crate::FastHashSet::default(),
            constant_func_types: crate::FastHashMap::default(),
            work_group_size: None,
            uses_work_group_size: false,
            work_group_size_value_id: 0,
            work_group_size_var_id: 0,
            work_group_size_spec_ids: None,
            gl450_ext_inst_id: 0,
            uses_image_query: false,
            deferred: Vec::new(),
            functions: Vec::new(),
            function_infos: Vec::new(),
            flows: Vec::new(),
            descriptor_map: resources::DescriptorMap::default(),
        })
    }

    pub(super) fn take_descriptor_map(&mut self) -> resources::DescriptorMap {
        std::mem::take(&mut self.descriptor_map)
    }

    // ------------------------------------------------------------------
    // interning
    // ------------------------------------------------------------------

    /// Register a type key for emission, preserving first-discovery order.
    fn register_type(&mut self, lookup: LookupType) {
        if self.lookup_type.contains_key(&lookup) {
            return;
        }
        self.lookup_type.insert(lookup, 0);
        match lookup {
            LookupType::Local(local @ LocalType::SampledImage { .. }) => {
                self.sampled_image_order.push(local)
            }
            _ => self.type_order.push(lookup),
        }
    }

    /// The id of an already-emitted type. A miss here is a lowering bug, not
    /// bad input.
    fn get_type_id(&self, lookup: LookupType) -> Word {
        match self.lookup_type.get(&lookup) {
            Some(&id) if id != 0 => id,
            _ => unreachable!("Type {:?} is not emitted!", lookup),
        }
    }

    fn localize(&self, module: &Module, ty: Handle<crate::Type>) -> Result<LookupType, Error> {
        Ok(match module.types[ty].inner {
            TypeInner::Scalar { kind, width } => {
                LookupType::Local(canonical_value(None, kind, width)?)
            }
            TypeInner::Vector { size, kind, width } => {
                LookupType::Local(canonical_value(Some(size), kind, width)?)
            }
            TypeInner::Array { .. } | TypeInner::Struct { .. } => LookupType::Handle(ty),
            TypeInner::Pointer { base, space } => {
                self.pointer_key(module, base, map_address_space(space))?
            }
            TypeInner::Image { dim, access } => {
                LookupType::Local(LocalType::Image { dim, access })
            }
            TypeInner::Sampler => LookupType::Local(LocalType::Sampler),
        })
    }

    /// The canonical key of a pointer to `base` in the given class.
    fn pointer_key(
        &self,
        module: &Module,
        base: Handle<crate::Type>,
        class: spirv::StorageClass,
    ) -> Result<LookupType, Error> {
        Ok(match module.types[base].inner {
            TypeInner::Scalar { kind, width } => match canonical_value(None, kind, width)? {
                LocalType::Bool => LookupType::Local(LocalType::ValuePointer {
                    vector_size: None,
                    kind: ScalarKind::Bool,
                    width: 1,
                    class,
                }),
                LocalType::Value {
                    vector_size,
                    kind,
                    width,
                } => LookupType::Local(LocalType::ValuePointer {
                    vector_size,
                    kind,
                    width,
                    class,
                }),
                _ => unreachable!(),
            },
            TypeInner::Vector { size, kind, width } => {
                match canonical_value(Some(size), kind, width)? {
                    LocalType::Value {
                        vector_size,
                        kind,
                        width,
                    } => LookupType::Local(LocalType::ValuePointer {
                        vector_size,
                        kind,
                        width,
                        class,
                    }),
                    _ => unreachable!(),
                }
            }
            TypeInner::Image { dim, access } => {
                LookupType::Local(LocalType::ImagePointer { dim, access })
            }
            TypeInner::Sampler => LookupType::Local(LocalType::SamplerPointer),
            _ => LookupType::Local(LocalType::Pointer { base, class }),
        })
    }

    /// The canonical key of a pointer to a scalar or vector shape.
    fn value_pointer_key(
        &self,
        vector_size: Option<VectorSize>,
        kind: ScalarKind,
        width: Bytes,
        class: spirv::StorageClass,
    ) -> Result<LookupType, Error> {
        Ok(match canonical_value(vector_size, kind, width)? {
            LocalType::Bool => LookupType::Local(LocalType::ValuePointer {
                vector_size: None,
                kind: ScalarKind::Bool,
                width: 1,
                class,
            }),
            LocalType::Value {
                vector_size,
                kind,
                width,
            } => LookupType::Local(LocalType::ValuePointer {
                vector_size,
                kind,
                width,
                class,
            }),
            _ => unreachable!(),
        })
    }

    /// Register a type and, recursively, everything it depends on.
    fn discover_type(&mut self, module: &Module, ty: Handle<crate::Type>) -> Result<(), Error> {
        match module.types[ty].inner {
            TypeInner::Scalar { kind, width } => {
                self.register_type(LookupType::Local(canonical_value(None, kind, width)?));
            }
            TypeInner::Vector { size, kind, width } => {
                // The component type is referenced by the vector declaration.
                if kind != ScalarKind::Bool || width != 1 {
                    self.register_type(LookupType::Local(canonical_value(None, kind, width)?));
                } else {
                    self.register_type(LookupType::Local(LocalType::Bool));
                }
                self.register_type(LookupType::Local(canonical_value(Some(size), kind, width)?));
            }
            TypeInner::Array { base, length } => {
                self.discover_type(module, base)?;
                // The length operand is an i32 constant.
                self.register_uint_constant(length as u64, 4);
                self.register_type(LookupType::Handle(ty));
            }
            TypeInner::Struct { ref members } => {
                for &member in members.iter() {
                    self.discover_type(module, member)?;
                }
                self.register_type(LookupType::Handle(ty));
            }
            TypeInner::Pointer { base, space } => {
                self.discover_type(module, base)?;
                let key = self.pointer_key(module, base, map_address_space(space))?;
                self.register_type(key);
            }
            TypeInner::Image { dim, access } => {
                // Images sample 32-bit floats.
                self.register_type(LookupType::Local(LocalType::Value {
                    vector_size: None,
                    kind: ScalarKind::Float,
                    width: 4,
                }));
                self.register_type(LookupType::Local(LocalType::Image { dim, access }));
            }
            TypeInner::Sampler => {
                self.register_type(LookupType::Local(LocalType::Sampler));
            }
        }
        Ok(())
    }

    /// Register a constant key (and its components) for emission.
    fn register_constant_key(&mut self, key: ConstantKey) {
        if self.known_constants.contains(&key) {
            return;
        }
        if let ConstantKey::Composite { ref components, .. } = key {
            for component in components.clone() {
                self.register_constant_key(component);
            }
        }
        self.known_constants.insert(key.clone());
        self.constant_order.push(key);
    }

    fn register_uint_constant(&mut self, value: u64, width: Bytes) {
        self.register_type(LookupType::Local(LocalType::Value {
            vector_size: None,
            kind: ScalarKind::Uint,
            width,
        }));
        self.register_constant_key(ConstantKey::Uint { value, width });
    }

    fn register_float_constant(&mut self, value: f32) {
        self.register_type(LookupType::Local(LocalType::Value {
            vector_size: None,
            kind: ScalarKind::Float,
            width: 4,
        }));
        self.register_constant_key(ConstantKey::Float {
            bits: value.to_bits() as u64,
            width: 4,
        });
    }

    /// Key of a scalar constant splatted to the given shape.
    fn splat_key(
        &self,
        vector_size: Option<VectorSize>,
        kind: ScalarKind,
        width: Bytes,
        scalar: ConstantKey,
    ) -> ConstantKey {
        match vector_size {
            None => scalar,
            Some(size) => ConstantKey::Composite {
                ty: match canonical_value(Some(size), kind, width) {
                    Ok(local) => LookupType::Local(local),
                    Err(_) => unreachable!("splats are never 8-bit vectors"),
                },
                components: vec![scalar; size as usize],
            },
        }
    }

    /// The canonical key of an IR constant, with the `<4 x i8>` folding and
    /// the undef rewrite applied.
    fn constant_key(
        &self,
        module: &Module,
        handle: Handle<crate::Constant>,
    ) -> Result<ConstantKey, Error> {
        let constant = &module.constants[handle];
        let inner = &module.types[constant.ty].inner;
        Ok(match constant.inner {
            ConstantInner::Bool(value) => ConstantKey::Bool(value),
            ConstantInner::Sint(value) => match *inner {
                TypeInner::Scalar { width: 1, .. } => ConstantKey::Uint {
                    value: value as u64 & 0xFF,
                    width: 4,
                },
                TypeInner::Scalar { width: 2, .. } => ConstantKey::Uint {
                    value: value as u16 as u64,
                    width: 2,
                },
                TypeInner::Scalar { width: 8, .. } => ConstantKey::Uint {
                    value: value as u64,
                    width: 8,
                },
                _ => ConstantKey::Uint {
                    value: value as i32 as u32 as u64,
                    width: 4,
                },
            },
            ConstantInner::Uint(value) => match *inner {
                TypeInner::Scalar { width: 1, .. } => ConstantKey::Uint {
                    value: value & 0xFF,
                    width: 4,
                },
                TypeInner::Scalar { width: 2, .. } => ConstantKey::Uint {
                    value: value & 0xFFFF,
                    width: 2,
                },
                TypeInner::Scalar { width: 8, .. } => ConstantKey::Uint { value, width: 8 },
                _ => ConstantKey::Uint {
                    value: value as u32 as u64,
                    width: 4,
                },
            },
            ConstantInner::Float(value) => match *inner {
                TypeInner::Scalar { width: 8, .. } => ConstantKey::Float {
                    bits: value.to_bits(),
                    width: 8,
                },
                _ => ConstantKey::Float {
                    bits: (value as f32).to_bits() as u64,
                    width: 4,
                },
            },
            ConstantInner::Null => match *inner {
                TypeInner::Vector {
                    kind: ScalarKind::Sint,
                    width: 1,
                    ..
                }
                | TypeInner::Vector {
                    kind: ScalarKind::Uint,
                    width: 1,
                    ..
                } => ConstantKey::Uint { value: 0, width: 4 },
                _ => ConstantKey::Null(self.localize(module, constant.ty)?),
            },
            ConstantInner::Undef => {
                let numeric = matches!(
                    *inner,
                    TypeInner::Scalar { .. } | TypeInner::Vector { .. }
                );
                if numeric && self.flags.contains(WriterFlags::HACK_UNDEF) {
                    ConstantKey::Null(self.localize(module, constant.ty)?)
                } else {
                    ConstantKey::Undef(self.localize(module, constant.ty)?)
                }
            }
            ConstantInner::Composite(ref components) => match *inner {
                // Fold `<4 x i8>` immediates into one integer, element 0 in
                // the most significant byte.
                TypeInner::Vector {
                    kind: ScalarKind::Sint,
                    width: 1,
                    ..
                }
                | TypeInner::Vector {
                    kind: ScalarKind::Uint,
                    width: 1,
                    ..
                } => {
                    let mut folded: u64 = 0;
                    for &component in components.iter() {
                        let byte = match module.constants[component].inner {
                            ConstantInner::Sint(value) => value as u64,
                            ConstantInner::Uint(value) => value,
                            ConstantInner::Null | ConstantInner::Undef => 0,
                            _ => return Err(Error::Validation("bad <4 x i8> element")),
                        };
                        folded = folded << 8 | (byte & 0xFF);
                    }
                    ConstantKey::Uint {
                        value: folded,
                        width: 4,
                    }
                }
                _ => {
                    let mut keys = Vec::with_capacity(components.len());
                    for &component in components.iter() {
                        keys.push(self.constant_key(module, component)?);
                    }
                    ConstantKey::Composite {
                        ty: self.localize(module, constant.ty)?,
                        components: keys,
                    }
                }
            },
        })
    }

    fn discover_constant(
        &mut self,
        module: &Module,
        handle: Handle<crate::Constant>,
    ) -> Result<(), Error> {
        self.discover_type(module, module.constants[handle].ty)?;
        let key = self.constant_key(module, handle)?;
        self.register_constant_key(key);
        Ok(())
    }

    /// The id of an already-emitted constant. A miss is a lowering bug.
    fn get_constant_id(&self, key: &ConstantKey) -> Word {
        match self.cached_constants.get(key) {
            Some(&id) => id,
            None => unreachable!("Constant {:?} is not emitted!", key),
        }
    }

    fn lookup_constant(
        &self,
        module: &Module,
        handle: Handle<crate::Constant>,
    ) -> Result<Word, Error> {
        let key = self.constant_key(module, handle)?;
        Ok(self.get_constant_id(&key))
    }

    /// Value of an integer immediate, if the handle is one.
    fn constant_scalar(
        &self,
        module: &Module,
        fun: &crate::Function,
        value: Handle<Value>,
    ) -> Option<u64> {
        match fun.values[value] {
            Value::Constant(handle) => match module.constants[handle].inner {
                ConstantInner::Sint(v) => Some(v as u64),
                ConstantInner::Uint(v) => Some(v),
                _ => None,
            },
            _ => None,
        }
    }

    // ------------------------------------------------------------------
    // resolution helpers
    // ------------------------------------------------------------------

    /// Numeric shape of a value, or `None` for pointers and opaque types.
    fn numeric_shape(
        &self,
        module: &Module,
        fun: &crate::Function,
        value: Handle<Value>,
    ) -> Result<Option<NumericShape>, Error> {
        let resolution = resolve_value(module, fun, value)?;
        Ok(self.resolution_shape(module, &resolution))
    }

    fn resolution_shape(
        &self,
        module: &Module,
        resolution: &TypeResolution,
    ) -> Option<NumericShape> {
        match *resolution {
            TypeResolution::Scalar { kind, width } => Some((None, kind, width)),
            TypeResolution::Vector { size, kind, width } => Some((Some(size), kind, width)),
            TypeResolution::Handle(handle) => match module.types[handle].inner {
                TypeInner::Scalar { kind, width } => Some((None, kind, width)),
                TypeInner::Vector { size, kind, width } => Some((Some(size), kind, width)),
                _ => None,
            },
            _ => None,
        }
    }

    /// Type key of a resolution that is not a pointer.
    fn resolution_key(
        &self,
        module: &Module,
        resolution: &TypeResolution,
    ) -> Result<LookupType, Error> {
        match *resolution {
            TypeResolution::Handle(handle) => self.localize(module, handle),
            TypeResolution::Scalar { kind, width } => {
                Ok(LookupType::Local(canonical_value(None, kind, width)?))
            }
            TypeResolution::Vector { size, kind, width } => {
                Ok(LookupType::Local(canonical_value(Some(size), kind, width)?))
            }
            TypeResolution::Pointer { base, space } => {
                self.pointer_key(module, base, map_address_space(space))
            }
            TypeResolution::ScalarPointer { kind, width, space } => {
                self.value_pointer_key(None, kind, width, map_address_space(space))
            }
        }
    }

    /// Whether a value is an 8-bit integer vector (an `i32` after aliasing).
    fn is_char_vector(
        &self,
        module: &Module,
        fun: &crate::Function,
        value: Handle<Value>,
    ) -> Result<bool, Error> {
        Ok(matches!(
            self.numeric_shape(module, fun, value)?,
            Some((Some(_), ScalarKind::Sint, 1)) | Some((Some(_), ScalarKind::Uint, 1))
        ))
    }

    fn is_pointer(
        &self,
        module: &Module,
        fun: &crate::Function,
        value: Handle<Value>,
    ) -> Result<bool, Error> {
        Ok(match resolve_value(module, fun, value)? {
            TypeResolution::Pointer { .. } | TypeResolution::ScalarPointer { .. } => true,
            TypeResolution::Handle(handle) => {
                matches!(module.types[handle].inner, TypeInner::Pointer { .. })
            }
            _ => false,
        })
    }

    /// Storage class a pointer value ultimately addresses, walking access
    /// chains back to their root.
    fn pointer_class(
        &self,
        module: &Module,
        handle: Handle<crate::Function>,
        fun: &crate::Function,
        fun_idx: usize,
        value: Handle<Value>,
    ) -> Result<spirv::StorageClass, Error> {
        match fun.values[value] {
            Value::Argument(index) => {
                if fun.is_kernel() {
                    let kind = resources::classify_argument(
                        module,
                        fun.arguments[index as usize].ty,
                        self.flags.contains(WriterFlags::POD_UNIFORM_BUFFER),
                    );
                    Ok(resources::storage_class(kind))
                } else if self.constant_func_types.get(&handle) == Some(&index) {
                    Ok(spirv::StorageClass::Private)
                } else {
                    match module.types[fun.arguments[index as usize].ty].inner {
                        TypeInner::Pointer { space, .. } => Ok(map_address_space(space)),
                        _ => Err(Error::Validation("non-pointer argument as pointer")),
                    }
                }
            }
            Value::Global(global) => {
                let var = &module.global_variables[global];
                Ok(match var.space {
                    AddressSpace::Constant => {
                        if self.flags.contains(WriterFlags::CONSTANTS_IN_STORAGE_BUFFER) {
                            spirv::StorageClass::StorageBuffer
                        } else {
                            spirv::StorageClass::Private
                        }
                    }
                    space => map_address_space(space),
                })
            }
            Value::Alloca { .. } => Ok(spirv::StorageClass::Function),
            Value::GetPtr { base, .. } => self.pointer_class(module, handle, fun, fun_idx, base),
            Value::Select { accept, .. } => {
                self.pointer_class(module, handle, fun, fun_idx, accept)
            }
            Value::Phi { ref sources, .. } => match sources.first() {
                Some(&(source, _)) => self.pointer_class(module, handle, fun, fun_idx, source),
                None => Err(Error::Validation("empty phi")),
            },
            _ => Err(Error::Unsupported("pointer with no traceable origin")),
        }
    }

    /// The argument kind of a kernel-argument pointer base, if the value is
    /// a direct argument reference.
    fn argument_kind(
        &self,
        fun: &crate::Function,
        fun_idx: usize,
        value: Handle<Value>,
    ) -> Option<(u32, resources::ArgKind)> {
        if !fun.is_kernel() {
            return None;
        }
        match fun.values[value] {
            Value::Argument(index) => self
                .argument_bindings
                .get(&(fun_idx, index))
                .map(|binding| (index, binding.kind))
                .or_else(|| {
                    self.local_args
                        .get(&(fun_idx, index))
                        .map(|_| (index, resources::ArgKind::Local))
                }),
            _ => None,
        }
    }

    /// Whether a value refers to a module `constant` global that was wrapped
    /// into a storage buffer.
    fn is_wrapped_global(&self, module: &Module, fun: &crate::Function, value: Handle<Value>) -> bool {
        if !self.flags.contains(WriterFlags::CONSTANTS_IN_STORAGE_BUFFER) {
            return false;
        }
        match fun.values[value] {
            Value::Global(global) => {
                module.global_variables[global].space == AddressSpace::Constant
            }
            _ => false,
        }
    }

    // ------------------------------------------------------------------
    // phase drivers
    // ------------------------------------------------------------------

    pub(super) fn write(&mut self, module: &Module) -> Result<(), Error> {
        self.flows = module
            .functions
            .iter()
            .map(|(_, fun)| FlowInfo::new(fun))
            .collect();
        self.plan_sampler_map();
        self.plan_module_globals(module)?;
        self.discover(module)?;
        self.plan_work_group_size(module)?;
        self.emit_types(module)?;
        self.emit_constants(module)?;
        self.emit_work_group_size(module)?;
        self.emit_global_variables(module)?;
        self.emit_functions(module)?;
        self.apply_deferred(module)?;
        self.emit_decorations(module)?;
        self.write_preamble(module)?;
        let functions = std::mem::take(&mut self.functions);
        for function in functions.iter() {
            function.collect(&mut self.logical_layout.function_definitions);
        }
        self.functions = functions;
        self.physical_layout.bound = self.id_gen.0 + 1;
        Ok(())
    }

    /// Stream the module as little-endian words, patching the bound last.
    pub(super) fn serialize(&self, sink: &mut Vec<Word>) {
        let base = sink.len();
        self.physical_layout.in_words(sink);
        for instruction in self.logical_layout.iter() {
            instruction.to_words(sink);
        }
        // The bound is known only after everything is emitted; overwrite the
        // placeholder in the header.
        sink[base + 3] = self.id_gen.0 + 1;
    }

    fn plan_sampler_map(&mut self) {
        if self.sampler_map.is_empty() {
            return;
        }
        self.register_type(LookupType::Local(LocalType::Sampler));
        self.register_type(LookupType::Local(LocalType::SamplerPointer));
        for (index, entry) in self.sampler_map.clone().into_iter().enumerate() {
            self.descriptor_map
                .entries
                .push(resources::DescriptorMapEntry::Sampler {
                    value: entry.value,
                    expr: entry.expr,
                    descriptor_set: 0,
                    binding: index as u32,
                });
        }
    }

    fn plan_module_globals(&mut self, module: &Module) -> Result<(), Error> {
        let buffer_mode = self.flags.contains(WriterFlags::CONSTANTS_IN_STORAGE_BUFFER);
        let mut constant_bytes_total = 0u32;
        for (_, var) in module.global_variables.iter() {
            self.discover_type(module, var.ty)?;
            match var.space {
                AddressSpace::Constant if buffer_mode => {
                    constant_bytes_total += layout::layout_of(module, var.ty).size;
                    self.register_type(LookupType::Local(LocalType::PodWrapper { base: var.ty }));
                    self.register_type(LookupType::Local(LocalType::PodWrapperPointer {
                        base: var.ty,
                        class: spirv::StorageClass::StorageBuffer,
                    }));
                }
                AddressSpace::Constant | AddressSpace::Private => {
                    // In the default mode, `constant` data moves into the
                    // private address space with an initializer.
                    let key = self.pointer_key(module, var.ty, spirv::StorageClass::Private)?;
                    self.register_type(key);
                    if let Some(init) = var.init {
                        self.discover_constant(module, init)?;
                    }
                }
                AddressSpace::Local => {
                    let key = self.pointer_key(module, var.ty, spirv::StorageClass::Workgroup)?;
                    self.register_type(key);
                }
                _ => return Err(Error::Validation("global variable address space")),
            }
        }
        if buffer_mode && constant_bytes_total > 65536 {
            return Err(Error::ConstantBufferTooLarge(constant_bytes_total));
        }
        Ok(())
    }

    /// The discovery walker: two symmetric passes, kernels first.
    fn discover(&mut self, module: &Module) -> Result<(), Error> {
        let mut kernel_ordinal = 0;
        for kernel_pass in [true, false].iter().cloned() {
            for (fun_idx, (handle, fun)) in module.functions.iter().enumerate() {
                if fun.is_kernel() != kernel_pass {
                    continue;
                }
                if kernel_pass {
                    self.discover_kernel_arguments(module, fun_idx, fun, kernel_ordinal)?;
                    kernel_ordinal += 1;
                } else {
                    for argument in fun.arguments.iter() {
                        self.discover_type(module, argument.ty)?;
                    }
                }
                match fun.result {
                    Some(ty) => self.discover_type(module, ty)?,
                    None => self.register_type(LookupType::Local(LocalType::Void)),
                }
                for block in fun.blocks.iter() {
                    for &value in block.body.iter() {
                        self.discover_value(module, handle, fun, fun_idx, value)?;
                    }
                    match block.terminator {
                        Terminator::BranchConditional { condition, .. } => {
                            self.discover_leaf(module, fun, condition)?
                        }
                        Terminator::Return { value: Some(value) } => {
                            self.discover_leaf(module, fun, value)?
                        }
                        _ => {}
                    }
                }
            }
        }
        // Tracked constant-pointer parameters move into the private address
        // space; their rewritten pointer types must be interned as well.
        let mut tracked: Vec<(Handle<crate::Function>, u32)> = self
            .constant_func_types
            .iter()
            .map(|(&callee, &index)| (callee, index))
            .collect();
        tracked.sort_unstable();
        for (callee, index) in tracked {
            let fun = &module.functions[callee];
            if let Some(argument) = fun.arguments.get(index as usize) {
                if let TypeInner::Pointer { base, .. } = module.types[argument.ty].inner {
                    let key = self.pointer_key(module, base, spirv::StorageClass::Private)?;
                    self.register_type(key);
                }
            }
        }
        Ok(())
    }

    /// Classify and bind every argument of one kernel (§ argument lowering),
    /// registering the synthetic interface types along the way.
    fn discover_kernel_arguments(
        &mut self,
        module: &Module,
        fun_idx: usize,
        fun: &crate::Function,
        kernel_ordinal: u32,
    ) -> Result<(), Error> {
        let distinct = self.flags.contains(WriterFlags::DISTINCT_DESCRIPTOR_SETS);
        let pod_ubo = self.flags.contains(WriterFlags::POD_UNIFORM_BUFFER);
        let descriptor_set = if distinct { kernel_ordinal } else { 0 };
        // Sampler-map entries occupy the first bindings of set 0.
        let mut binding = if descriptor_set == 0 {
            self.sampler_map.len() as u32
        } else {
            0
        };
        for (arg_idx, argument) in fun.arguments.iter().enumerate() {
            let kind = resources::classify_argument(module, argument.ty, pod_ubo);
            let class = resources::storage_class(kind);
            match kind {
                resources::ArgKind::Buffer => {
                    let base = match module.types[argument.ty].inner {
                        TypeInner::Pointer { base, .. } => base,
                        _ => unreachable!(),
                    };
                    self.discover_type(module, base)?;
                    self.register_type(LookupType::Local(LocalType::RuntimeArray { base }));
                    self.register_type(LookupType::Local(LocalType::BufferWrapper { base }));
                    self.register_type(LookupType::Local(LocalType::BufferWrapperPointer {
                        base,
                        class,
                    }));
                    let element = self.pointer_key(module, base, class)?;
                    self.register_type(element);
                    self.register_uint_constant(0, 4);
                }
                resources::ArgKind::Pod | resources::ArgKind::PodUniform => {
                    self.discover_type(module, argument.ty)?;
                    self.register_type(LookupType::Local(LocalType::PodWrapper {
                        base: argument.ty,
                    }));
                    self.register_type(LookupType::Local(LocalType::PodWrapperPointer {
                        base: argument.ty,
                        class,
                    }));
                    let element = self.pointer_key(module, argument.ty, class)?;
                    self.register_type(element);
                    self.register_uint_constant(0, 4);
                }
                resources::ArgKind::ReadOnlyImage | resources::ArgKind::WriteOnlyImage => {
                    self.discover_type(module, argument.ty)?;
                    match module.types[argument.ty].inner {
                        TypeInner::Image { dim, access } => {
                            self.register_type(LookupType::Local(LocalType::ImagePointer {
                                dim,
                                access,
                            }));
                        }
                        _ => unreachable!(),
                    }
                }
                resources::ArgKind::Sampler => {
                    self.discover_type(module, argument.ty)?;
                    self.register_type(LookupType::Local(LocalType::SamplerPointer));
                }
                resources::ArgKind::Local => {
                    let base = match module.types[argument.ty].inner {
                        TypeInner::Pointer { base, .. } => base,
                        _ => unreachable!(),
                    };
                    self.discover_type(module, base)?;
                    let spec_id = argument
                        .spec_id
                        .ok_or(Error::Validation("local argument without a spec id"))?;
                    // The array length is a spec constant of type i32; that
                    // type must precede the array in emission order.
                    self.register_uint_constant(0, 4);
                    self.register_type(LookupType::Local(LocalType::LocalArray { base, spec_id }));
                    self.register_type(LookupType::Local(LocalType::LocalArrayPointer {
                        base,
                        spec_id,
                    }));
                    let element = self.pointer_key(module, base, class)?;
                    self.register_type(element);
                    self.register_uint_constant(0, 4);
                    self.local_args.insert(
                        (fun_idx, arg_idx as u32),
                        LocalArgInfo {
                            spec_id,
                            spec_constant_id: 0,
                            variable_id: 0,
                            elem_type: base,
                        },
                    );
                    self.descriptor_map
                        .entries
                        .push(resources::DescriptorMapEntry::LocalArg {
                            kernel: fun.name.clone(),
                            arg: argument.name.clone(),
                            ordinal: arg_idx as u32,
                            element_size: layout::layout_of(module, base).size,
                            spec_id,
                        });
                }
            }
            if kind.has_binding() {
                self.argument_bindings.insert(
                    (fun_idx, arg_idx as u32),
                    ArgBinding {
                        kind,
                        descriptor_set,
                        binding,
                    },
                );
                self.descriptor_map
                    .entries
                    .push(resources::DescriptorMapEntry::KernelArg {
                        kernel: fun.name.clone(),
                        arg: argument.name.clone(),
                        ordinal: arg_idx as u32,
                        descriptor_set,
                        binding,
                        offset: 0,
                        kind,
                    });
                binding += 1;
            }
        }
        Ok(())
    }

    /// Register the constant behind a leaf operand, if it is one.
    fn discover_leaf(
        &mut self,
        module: &Module,
        fun: &crate::Function,
        value: Handle<Value>,
    ) -> Result<(), Error> {
        if let Value::Constant(constant) = fun.values[value] {
            self.discover_constant(module, constant)?;
        }
        Ok(())
    }

    fn discover_value(
        &mut self,
        module: &Module,
        handle: Handle<crate::Function>,
        fun: &crate::Function,
        fun_idx: usize,
        value: Handle<Value>,
    ) -> Result<(), Error> {
        for operand in value_operands(&fun.values[value]) {
            self.discover_leaf(module, fun, operand)?;
        }

        // Every result type is referenced by its instruction.
        match fun.values[value] {
            Value::GetPtr { .. } | Value::Store { .. } => {}
            _ => match resolve_value(module, fun, value) {
                Ok(resolution) => {
                    let key = self.register_resolution(module, &resolution)?;
                    let _ = key;
                }
                Err(ResolveError::NoResult(_)) => {}
                Err(ResolveError::UnknownExternal(name)) => {
                    return Err(Error::UnknownBuiltin(name))
                }
                Err(other) => return Err(other.into()),
            },
        }

        match fun.values[value] {
            Value::GetPtr { base, .. } => {
                let class = self.pointer_class(module, handle, fun, fun_idx, base)?;
                let key = match resolve_value(module, fun, value)? {
                    TypeResolution::Pointer { base: pointee, .. } => {
                        self.discover_type(module, pointee)?;
                        self.pointer_key(module, pointee, class)?
                    }
                    TypeResolution::ScalarPointer { kind, width, .. } => {
                        self.register_type(LookupType::Local(canonical_value(None, kind, width)?));
                        self.value_pointer_key(None, kind, width, class)?
                    }
                    _ => return Err(Error::Validation("access chain over a non-pointer")),
                };
                self.register_type(key);
            }
            Value::Cast { kind, value: source, to } => {
                let source_shape = self.numeric_shape(module, fun, source)?;
                let target_shape = match module.types[to].inner {
                    TypeInner::Scalar { kind, width } => (None, kind, width),
                    TypeInner::Vector { size, kind, width } => (Some(size), kind, width),
                    _ => return Err(Error::Unsupported("cast to a non-numeric type")),
                };
                if let Some((_, ScalarKind::Bool, _)) = source_shape {
                    // Predicate widening selects between two registered
                    // constants of the target shape.
                    let (size, target_kind, target_width) = target_shape;
                    let (accept, reject) =
                        self.bool_widen_keys(kind, size, target_kind, target_width);
                    let scalar = self.scalar_key(target_kind, target_width);
                    self.register_type(scalar);
                    self.register_constant_key(accept);
                    self.register_constant_key(reject);
                } else if kind == CastKind::Trunc && target_shape.2 == 1 {
                    if target_shape.0.is_some() {
                        return Err(Error::Unsupported("vector truncation to 8 bits"));
                    }
                    // i32 -> i8 becomes a mask.
                    self.register_uint_constant(0xFF, 4);
                }
            }
            Value::ExtractElement { vector, index } => {
                if self.is_char_vector(module, fun, vector)? {
                    self.register_uint_constant(0xFF, 4);
                    match self.constant_scalar(module, fun, index) {
                        Some(lane) => self.register_uint_constant(lane * 8, 4),
                        None => self.register_uint_constant(8, 4),
                    }
                }
            }
            Value::InsertElement { vector, index, .. } => {
                if self.is_char_vector(module, fun, vector)? {
                    self.register_uint_constant(0xFF, 4);
                    match self.constant_scalar(module, fun, index) {
                        Some(lane) => self.register_uint_constant(lane * 8, 4),
                        None => self.register_uint_constant(8, 4),
                    }
                }
            }
            Value::Atomic { .. } => {
                self.register_uint_constant(SCOPE_DEVICE as u64, 4);
                self.register_uint_constant(SEMANTICS_ATOMIC as u64, 4);
            }
            Value::Call {
                origin: FunctionOrigin::Local(callee),
                ref arguments,
            } => {
                // Track `constant` globals flowing into callee parameters,
                // forcing their signatures into the private address space.
                if !self.flags.contains(WriterFlags::CONSTANTS_IN_STORAGE_BUFFER) {
                    for (index, &argument) in arguments.iter().enumerate() {
                        if let Value::Global(global) = fun.values[argument] {
                            if module.global_variables[global].space == AddressSpace::Constant {
                                self.constant_func_types.insert(callee, index as u32);
                            }
                        }
                    }
                }
            }
            Value::Call {
                origin: FunctionOrigin::External(ref name),
                ref arguments,
            } => {
                let builtin =
                    find_builtin(name).ok_or_else(|| Error::UnknownBuiltin(name.clone()))?;
                match builtin {
                    Builtin::ExtInst(_) => self.require_ext_inst(),
                    Builtin::ExtInstIndirect(_, indirect) => {
                        self.require_ext_inst();
                        let shape = self
                            .numeric_shape(module, fun, arguments[0])?
                            .ok_or(Error::Validation("non-numeric extended operand"))?;
                        match indirect {
                            Indirect::SubFrom31 => {
                                let key = self.splat_key(
                                    shape.0,
                                    ScalarKind::Uint,
                                    4,
                                    ConstantKey::Uint {
                                        value: 31,
                                        width: 4,
                                    },
                                );
                                self.register_uint_constant(31, 4);
                                self.register_constant_key(key);
                            }
                            Indirect::MulInvPi => {
                                let scalar = ConstantKey::Float {
                                    bits: (INV_PI as f32).to_bits() as u64,
                                    width: 4,
                                };
                                let key =
                                    self.splat_key(shape.0, ScalarKind::Float, 4, scalar.clone());
                                self.register_float_constant(INV_PI as f32);
                                self.register_constant_key(key);
                            }
                        }
                    }
                    Builtin::ReadImage => {
                        self.register_float_constant(0.0);
                        self.register_type(LookupType::Local(LocalType::Value {
                            vector_size: Some(VectorSize::Quad),
                            kind: ScalarKind::Float,
                            width: 4,
                        }));
                        let dim = self.image_operand_dim(module, fun, arguments[0])?;
                        self.register_type(LookupType::Local(LocalType::SampledImage { dim }));
                    }
                    Builtin::WriteImage => {}
                    Builtin::ImageSize { .. } => {
                        self.uses_image_query = true;
                        let dim = self.image_operand_dim(module, fun, arguments[0])?;
                        self.register_type(LookupType::Local(LocalType::Value {
                            vector_size: None,
                            kind: ScalarKind::Uint,
                            width: 4,
                        }));
                        let size = match dim {
                            ImageDimension::D2 => VectorSize::Bi,
                            ImageDimension::D3 => VectorSize::Tri,
                        };
                        self.register_type(LookupType::Local(LocalType::Value {
                            vector_size: Some(size),
                            kind: ScalarKind::Uint,
                            width: 4,
                        }));
                    }
                    Builtin::WorkGroupSize => {
                        self.uses_work_group_size = true;
                        self.register_type(LookupType::Local(LocalType::Value {
                            vector_size: None,
                            kind: ScalarKind::Uint,
                            width: 4,
                        }));
                        self.register_type(LookupType::Local(LocalType::Value {
                            vector_size: Some(VectorSize::Tri),
                            kind: ScalarKind::Uint,
                            width: 4,
                        }));
                    }
                    Builtin::Barrier | Builtin::MemFence => {
                        self.register_uint_constant(SCOPE_WORKGROUP as u64, 4);
                        let semantics = self.barrier_semantics(module, fun, arguments.first())?;
                        self.register_uint_constant(semantics as u64, 4);
                    }
                    Builtin::SamplerInit => {
                        let literal = self
                            .constant_scalar(module, fun, arguments[0])
                            .ok_or(Error::Validation("non-constant sampler literal"))?
                            as u32;
                        if !self.sampler_map.iter().any(|entry| entry.value == literal) {
                            return Err(Error::MissingSamplerMapEntry(literal));
                        }
                    }
                    Builtin::Dot
                    | Builtin::FMod
                    | Builtin::PopCount
                    | Builtin::Any
                    | Builtin::All
                    | Builtin::IsInf
                    | Builtin::IsNan => {}
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn require_ext_inst(&mut self) {
        if self.gl450_ext_inst_id == 0 {
            self.gl450_ext_inst_id = self.id_gen.next();
            if self.flags.contains(WriterFlags::SHOW_IDS) {
                log::debug!("%{} = ext inst import {}", self.gl450_ext_inst_id, EXT_INST_SET);
            }
        }
    }

    fn image_operand_dim(
        &self,
        module: &Module,
        fun: &crate::Function,
        value: Handle<Value>,
    ) -> Result<ImageDimension, Error> {
        match resolve_value(module, fun, value)? {
            TypeResolution::Handle(handle) => match module.types[handle].inner {
                TypeInner::Image { dim, .. } => Ok(dim),
                _ => Err(Error::Validation("image operand is not an image")),
            },
            _ => Err(Error::Validation("image operand is not an image")),
        }
    }

    fn barrier_semantics(
        &self,
        module: &Module,
        fun: &crate::Function,
        flags: Option<&Handle<Value>>,
    ) -> Result<u32, Error> {
        let flags = match flags {
            Some(&value) => self
                .constant_scalar(module, fun, value)
                .ok_or(Error::Validation("non-constant barrier flags"))? as u32,
            None => 1,
        };
        let mut semantics = spirv::MemorySemantics::SEQUENTIALLY_CONSISTENT.bits();
        if flags & 0x1 != 0 {
            // CLK_LOCAL_MEM_FENCE
            semantics |= spirv::MemorySemantics::WORKGROUP_MEMORY.bits();
        }
        if flags & 0x2 != 0 {
            // CLK_GLOBAL_MEM_FENCE
            semantics |= spirv::MemorySemantics::UNIFORM_MEMORY.bits();
        }
        Ok(semantics)
    }

    fn register_resolution(
        &mut self,
        module: &Module,
        resolution: &TypeResolution,
    ) -> Result<LookupType, Error> {
        match *resolution {
            TypeResolution::Handle(handle) => {
                self.discover_type(module, handle)?;
                self.localize(module, handle)
            }
            TypeResolution::Scalar { kind, width } => {
                let key = LookupType::Local(canonical_value(None, kind, width)?);
                self.register_type(key);
                Ok(key)
            }
            TypeResolution::Vector { size, kind, width } => {
                let scalar = canonical_value(None, kind, width)?;
                self.register_type(LookupType::Local(scalar));
                let key = LookupType::Local(canonical_value(Some(size), kind, width)?);
                self.register_type(key);
                Ok(key)
            }
            TypeResolution::Pointer { base, space } => {
                self.discover_type(module, base)?;
                let key = self.pointer_key(module, base, map_address_space(space))?;
                self.register_type(key);
                Ok(key)
            }
            TypeResolution::ScalarPointer { kind, width, space } => {
                self.register_type(LookupType::Local(canonical_value(None, kind, width)?));
                let key = self.value_pointer_key(None, kind, width, map_address_space(space))?;
                self.register_type(key);
                Ok(key)
            }
        }
    }

    fn plan_work_group_size(&mut self, module: &Module) -> Result<(), Error> {
        if !self.uses_work_group_size {
            return Ok(());
        }
        let mut common: Option<[u32; 3]> = None;
        for (_, fun) in module.functions.iter() {
            if let Some(ref kernel) = fun.kernel {
                if let Some(size) = kernel.work_group_size {
                    match common {
                        Some(current) if current != size => {
                            return Err(Error::WorkGroupSizeMismatch)
                        }
                        _ => common = Some(size),
                    }
                }
            }
        }
        self.work_group_size = common;
        self.register_type(LookupType::Local(LocalType::Value {
            vector_size: None,
            kind: ScalarKind::Uint,
            width: 4,
        }));
        let vec3 = LookupType::Local(LocalType::Value {
            vector_size: Some(VectorSize::Tri),
            kind: ScalarKind::Uint,
            width: 4,
        });
        self.register_type(vec3);
        self.register_type(LookupType::Local(LocalType::ValuePointer {
            vector_size: Some(VectorSize::Tri),
            kind: ScalarKind::Uint,
            width: 4,
            class: spirv::StorageClass::Private,
        }));
        if let Some([x, y, z]) = common {
            for &value in [x, y, z].iter() {
                self.register_uint_constant(value as u64, 4);
            }
            self.register_constant_key(ConstantKey::Composite {
                ty: vec3,
                components: vec![
                    ConstantKey::Uint {
                        value: x as u64,
                        width: 4,
                    },
                    ConstantKey::Uint {
                        value: y as u64,
                        width: 4,
                    },
                    ConstantKey::Uint {
                        value: z as u64,
                        width: 4,
                    },
                ],
            });
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // type emission
    // ------------------------------------------------------------------

    fn scalar_key(&self, kind: ScalarKind, width: Bytes) -> LookupType {
        match canonical_value(None, kind, width) {
            Ok(local) => LookupType::Local(local),
            Err(_) => unreachable!("scalar shapes always canonicalize"),
        }
    }

    fn emit_types(&mut self, module: &Module) -> Result<(), Error> {
        let order = self.type_order.clone();
        for lookup in order {
            self.write_type(module, lookup)?;
        }
        let sampled = self.sampled_image_order.clone();
        for local in sampled {
            let image_id = self.get_type_id(LookupType::Local(LocalType::Image {
                dim: match local {
                    LocalType::SampledImage { dim } => dim,
                    _ => unreachable!(),
                },
                access: ImageAccess::ReadOnly,
            }));
            let id = self.id_gen.next();
            self.logical_layout
                .declarations
                .push(instructions::instruction_type_sampled_image(id, image_id));
            self.lookup_type.insert(LookupType::Local(local), id);
        }
        Ok(())
    }

    fn write_type(&mut self, module: &Module, lookup: LookupType) -> Result<(), Error> {
        let id = self.id_gen.next();
        if self.flags.contains(WriterFlags::SHOW_IDS) {
            log::debug!("%{} = type {:?}", id, lookup);
        }
        let instruction = match lookup {
            LookupType::Local(local) => match local {
                LocalType::Void => instructions::instruction_type_void(id),
                LocalType::Bool => instructions::instruction_type_bool(id),
                LocalType::Value {
                    vector_size: None,
                    kind,
                    width,
                } => match kind {
                    ScalarKind::Float => {
                        match width {
                            2 => self.capabilities.insert(spirv::Capability::Float16),
                            8 => self.capabilities.insert(spirv::Capability::Float64),
                            _ => false,
                        };
                        instructions::instruction_type_float(id, width as u32 * 8)
                    }
                    _ => {
                        match width {
                            2 => self.capabilities.insert(spirv::Capability::Int16),
                            8 => self.capabilities.insert(spirv::Capability::Int64),
                            _ => false,
                        };
                        // All integers are signless; emit them unsigned.
                        instructions::instruction_type_int(id, width as u32 * 8, 0)
                    }
                },
                LocalType::Value {
                    vector_size: Some(size),
                    kind,
                    width,
                } => {
                    let component_id = self.get_type_id(self.scalar_key(kind, width));
                    instructions::instruction_type_vector(id, component_id, size as u32)
                }
                LocalType::Pointer { base, class } => {
                    let base_id = self.get_type_id(self.localize(module, base)?);
                    instructions::instruction_type_pointer(id, class, base_id)
                }
                LocalType::ValuePointer {
                    vector_size,
                    kind,
                    width,
                    class,
                } => {
                    let pointee = match vector_size {
                        None => self.scalar_key(kind, width),
                        Some(size) => LookupType::Local(LocalType::Value {
                            vector_size: Some(size),
                            kind,
                            width,
                        }),
                    };
                    let base_id = self.get_type_id(pointee);
                    instructions::instruction_type_pointer(id, class, base_id)
                }
                LocalType::Image { dim, access } => {
                    let sampled_type_id = self.get_type_id(LookupType::Local(LocalType::Value {
                        vector_size: None,
                        kind: ScalarKind::Float,
                        width: 4,
                    }));
                    let (spirv_dim, sampled) = match (dim, access) {
                        (ImageDimension::D2, ImageAccess::ReadOnly) => (spirv::Dim::Dim2D, 1),
                        (ImageDimension::D2, ImageAccess::WriteOnly) => (spirv::Dim::Dim2D, 2),
                        (ImageDimension::D3, ImageAccess::ReadOnly) => (spirv::Dim::Dim3D, 1),
                        (ImageDimension::D3, ImageAccess::WriteOnly) => (spirv::Dim::Dim3D, 2),
                    };
                    if access == ImageAccess::WriteOnly {
                        self.capabilities
                            .insert(spirv::Capability::StorageImageWriteWithoutFormat);
                    }
                    instructions::instruction_type_image(id, sampled_type_id, spirv_dim, sampled)
                }
                LocalType::ImagePointer { dim, access } => {
                    let image_id =
                        self.get_type_id(LookupType::Local(LocalType::Image { dim, access }));
                    instructions::instruction_type_pointer(
                        id,
                        spirv::StorageClass::UniformConstant,
                        image_id,
                    )
                }
                LocalType::Sampler => instructions::instruction_type_sampler(id),
                LocalType::SamplerPointer => {
                    let sampler_id = self.get_type_id(LookupType::Local(LocalType::Sampler));
                    instructions::instruction_type_pointer(
                        id,
                        spirv::StorageClass::UniformConstant,
                        sampler_id,
                    )
                }
                LocalType::SampledImage { .. } => unreachable!("emitted after regular types"),
                LocalType::RuntimeArray { base } => {
                    let base_id = self.get_type_id(self.localize(module, base)?);
                    // Runtime arrays on the interface carry their stride.
                    let stride = layout::array_stride(module, base);
                    if self.strided_ids.insert(id) {
                        self.logical_layout
                            .annotations
                            .push(instructions::instruction_decorate(
                                id,
                                spirv::Decoration::ArrayStride,
                                &[stride],
                            ));
                    }
                    instructions::instruction_type_runtime_array(id, base_id)
                }
                LocalType::BufferWrapper { base } => {
                    let member_id =
                        self.get_type_id(LookupType::Local(LocalType::RuntimeArray { base }));
                    self.decorate_wrapper(id);
                    instructions::instruction_type_struct(id, &[member_id])
                }
                LocalType::PodWrapper { base } => {
                    let member_id = self.get_type_id(self.localize(module, base)?);
                    self.decorate_wrapper(id);
                    instructions::instruction_type_struct(id, &[member_id])
                }
                LocalType::BufferWrapperPointer { base, class } => {
                    let wrapper_id =
                        self.get_type_id(LookupType::Local(LocalType::BufferWrapper { base }));
                    instructions::instruction_type_pointer(id, class, wrapper_id)
                }
                LocalType::PodWrapperPointer { base, class } => {
                    let wrapper_id =
                        self.get_type_id(LookupType::Local(LocalType::PodWrapper { base }));
                    instructions::instruction_type_pointer(id, class, wrapper_id)
                }
                LocalType::LocalArray { base, spec_id } => {
                    let base_id = self.get_type_id(self.localize(module, base)?);
                    // The length is a specialization constant owned by this
                    // argument, defaulting to one element.
                    let length_id = self.id_gen.next();
                    let u32_id = self.get_type_id(self.scalar_key(ScalarKind::Uint, 4));
                    self.logical_layout
                        .declarations
                        .push(instructions::instruction_spec_constant(u32_id, length_id, 1));
                    self.local_spec_constants.insert(spec_id, length_id);
                    instructions::instruction_type_array(id, base_id, length_id)
                }
                LocalType::LocalArrayPointer { base, spec_id } => {
                    let array_id =
                        self.get_type_id(LookupType::Local(LocalType::LocalArray { base, spec_id }));
                    instructions::instruction_type_pointer(
                        id,
                        spirv::StorageClass::Workgroup,
                        array_id,
                    )
                }
            },
            LookupType::Handle(handle) => match module.types[handle].inner {
                TypeInner::Array { base, length } => {
                    let base_id = self.get_type_id(self.localize(module, base)?);
                    let length_id = self.emit_constant_key_now(ConstantKey::Uint {
                        value: length as u64,
                        width: 4,
                    })?;
                    // Fixed arrays get their stride in the decoration pass.
                    self.needs_array_stride
                        .push((id, layout::array_stride(module, base)));
                    instructions::instruction_type_array(id, base_id, length_id)
                }
                TypeInner::Struct { ref members } => {
                    let mut member_ids = Vec::with_capacity(members.len());
                    for &member in members.iter() {
                        member_ids.push(self.get_type_id(self.localize(module, member)?));
                    }
                    let (offsets, _, _) = layout::struct_layout(module, members);
                    for (index, &offset) in offsets.iter().enumerate() {
                        self.logical_layout
                            .annotations
                            .push(instructions::instruction_member_decorate(
                                id,
                                index as u32,
                                spirv::Decoration::Offset,
                                &[offset],
                            ));
                    }
                    instructions::instruction_type_struct(id, &member_ids)
                }
                _ => unreachable!("non-composite type interned by handle"),
            },
        };
        self.logical_layout.declarations.push(instruction);
        self.lookup_type.insert(lookup, id);
        Ok(())
    }

    /// Block decoration and member offset of a single-member wrapper struct.
    fn decorate_wrapper(&mut self, struct_id: Word) {
        self.logical_layout
            .annotations
            .push(instructions::instruction_decorate(
                struct_id,
                spirv::Decoration::Block,
                &[],
            ));
        self.logical_layout
            .annotations
            .push(instructions::instruction_member_decorate(
                struct_id,
                0,
                spirv::Decoration::Offset,
                &[0],
            ));
    }

    // ------------------------------------------------------------------
    // constant emission
    // ------------------------------------------------------------------

    fn emit_constants(&mut self, _module: &Module) -> Result<(), Error> {
        let order = self.constant_order.clone();
        for key in order {
            if self.cached_constants.contains_key(&key) {
                continue;
            }
            self.emit_constant_key_now(key)?;
        }
        Ok(())
    }

    fn emit_constant_key_now(&mut self, key: ConstantKey) -> Result<Word, Error> {
        if let Some(&id) = self.cached_constants.get(&key) {
            return Ok(id);
        }
        let id = self.id_gen.next();
        if self.flags.contains(WriterFlags::SHOW_IDS) {
            log::debug!("%{} = constant {:?}", id, key);
        }
        let instruction = match key {
            ConstantKey::Bool(true) => {
                let type_id = self.get_type_id(LookupType::Local(LocalType::Bool));
                instructions::instruction_constant_true(type_id, id)
            }
            ConstantKey::Bool(false) => {
                let type_id = self.get_type_id(LookupType::Local(LocalType::Bool));
                instructions::instruction_constant_false(type_id, id)
            }
            ConstantKey::Uint { value, width } => {
                let type_id = self.get_type_id(self.scalar_key(ScalarKind::Uint, width));
                if width == 8 {
                    instructions::instruction_constant_64bit(type_id, id, value)
                } else {
                    instructions::instruction_constant_32bit(type_id, id, value as u32)
                }
            }
            ConstantKey::Float { bits, width } => {
                let type_id = self.get_type_id(self.scalar_key(ScalarKind::Float, width));
                if width == 8 {
                    instructions::instruction_constant_64bit(type_id, id, bits)
                } else {
                    instructions::instruction_constant_float(
                        type_id,
                        id,
                        f32::from_bits(bits as u32),
                    )
                }
            }
            ConstantKey::Null(ty) => {
                let type_id = self.get_type_id(ty);
                instructions::instruction_constant_null(type_id, id)
            }
            ConstantKey::Undef(ty) => {
                let type_id = self.get_type_id(ty);
                instructions::instruction_undef(type_id, id)
            }
            ConstantKey::Composite {
                ty,
                ref components,
            } => {
                let type_id = self.get_type_id(ty);
                let component_ids: Vec<Word> = components
                    .iter()
                    .map(|component| self.get_constant_id(component))
                    .collect();
                instructions::instruction_constant_composite(type_id, id, &component_ids)
            }
        };
        self.logical_layout.declarations.push(instruction);
        self.cached_constants.insert(key, id);
        Ok(id)
    }

    fn emit_work_group_size(&mut self, _module: &Module) -> Result<(), Error> {
        if !self.uses_work_group_size {
            return Ok(());
        }
        let vec3 = LookupType::Local(LocalType::Value {
            vector_size: Some(VectorSize::Tri),
            kind: ScalarKind::Uint,
            width: 4,
        });
        let vec3_id = self.get_type_id(vec3);
        let value_id = match self.work_group_size {
            Some([x, y, z]) => self.get_constant_id(&ConstantKey::Composite {
                ty: vec3,
                components: vec![
                    ConstantKey::Uint {
                        value: x as u64,
                        width: 4,
                    },
                    ConstantKey::Uint {
                        value: y as u64,
                        width: 4,
                    },
                    ConstantKey::Uint {
                        value: z as u64,
                        width: 4,
                    },
                ],
            }),
            None => {
                // Without a fixed size, each dimension is a specialization
                // constant defaulting to one.
                let u32_id = self.get_type_id(self.scalar_key(ScalarKind::Uint, 4));
                let mut spec_ids = [0; 3];
                for slot in spec_ids.iter_mut() {
                    let spec_id = self.id_gen.next();
                    self.logical_layout
                        .declarations
                        .push(instructions::instruction_spec_constant(u32_id, spec_id, 1));
                    *slot = spec_id;
                }
                let composite_id = self.id_gen.next();
                self.logical_layout
                    .declarations
                    .push(instructions::instruction_spec_constant_composite(
                        vec3_id,
                        composite_id,
                        &spec_ids,
                    ));
                self.logical_layout
                    .annotations
                    .push(instructions::instruction_decorate_builtin(
                        composite_id,
                        spirv::BuiltIn::WorkgroupSize,
                    ));
                self.work_group_size_spec_ids = Some(spec_ids);
                composite_id
            }
        };
        self.work_group_size_value_id = value_id;
        // A private variable initialized to the workgroup size; some drivers
        // want the value stored explicitly at kernel entry instead.
        let pointer_id = self.get_type_id(LookupType::Local(LocalType::ValuePointer {
            vector_size: Some(VectorSize::Tri),
            kind: ScalarKind::Uint,
            width: 4,
            class: spirv::StorageClass::Private,
        }));
        let var_id = self.id_gen.next();
        self.logical_layout
            .declarations
            .push(instructions::instruction_variable(
                pointer_id,
                var_id,
                spirv::StorageClass::Private,
                Some(value_id),
            ));
        self.work_group_size_var_id = var_id;
        Ok(())
    }

    // ------------------------------------------------------------------
    // module-scope variables
    // ------------------------------------------------------------------

    fn emit_global_variables(&mut self, module: &Module) -> Result<(), Error> {
        // Sampler-map samplers first: they own the lowest bindings of set 0.
        for index in 0..self.sampler_map.len() {
            let pointer_id = self.get_type_id(LookupType::Local(LocalType::SamplerPointer));
            let id = self.id_gen.next();
            self.logical_layout
                .declarations
                .push(instructions::instruction_variable(
                    pointer_id,
                    id,
                    spirv::StorageClass::UniformConstant,
                    None,
                ));
            self.decorate_binding(id, 0, index as u32);
            self.sampler_variables.push(id);
        }

        // Kernel arguments, in kernel then argument order.
        for (fun_idx, (_, fun)) in module.functions.iter().enumerate() {
            if !fun.is_kernel() {
                continue;
            }
            for (arg_idx, argument) in fun.arguments.iter().enumerate() {
                let arg_idx = arg_idx as u32;
                if let Some(binding) = self.argument_bindings.get(&(fun_idx, arg_idx)).cloned() {
                    let pointer_key = self.argument_pointer_key(module, argument.ty, binding.kind)?;
                    let reuse_key = (binding.descriptor_set, binding.binding, pointer_key);
                    let id = match self.variable_reuse.get(&reuse_key) {
                        // Kernels with an argument of equal type at the same
                        // binding share one module-scope variable.
                        Some(&id) => id,
                        None => {
                            let pointer_id = self.get_type_id(pointer_key);
                            let id = self.id_gen.next();
                            self.logical_layout
                                .declarations
                                .push(instructions::instruction_variable(
                                    pointer_id,
                                    id,
                                    resources::storage_class(binding.kind),
                                    None,
                                ));
                            self.decorate_binding(id, binding.descriptor_set, binding.binding);
                            match binding.kind {
                                resources::ArgKind::ReadOnlyImage => {
                                    self.logical_layout.annotations.push(
                                        instructions::instruction_decorate(
                                            id,
                                            spirv::Decoration::NonWritable,
                                            &[],
                                        ),
                                    );
                                }
                                resources::ArgKind::WriteOnlyImage => {
                                    self.logical_layout.annotations.push(
                                        instructions::instruction_decorate(
                                            id,
                                            spirv::Decoration::NonReadable,
                                            &[],
                                        ),
                                    );
                                }
                                resources::ArgKind::Buffer => {
                                    if let TypeInner::Pointer {
                                        space: AddressSpace::Constant,
                                        ..
                                    } = module.types[argument.ty].inner
                                    {
                                        self.logical_layout.annotations.push(
                                            instructions::instruction_decorate(
                                                id,
                                                spirv::Decoration::NonWritable,
                                                &[],
                                            ),
                                        );
                                    }
                                }
                                _ => {}
                            }
                            self.variable_reuse.insert(reuse_key, id);
                            id
                        }
                    };
                    self.argument_variables.insert((fun_idx, arg_idx), id);
                } else if let Some(info) = self.local_args.get(&(fun_idx, arg_idx)).cloned() {
                    let pointer_id = self.get_type_id(LookupType::Local(
                        LocalType::LocalArrayPointer {
                            base: info.elem_type,
                            spec_id: info.spec_id,
                        },
                    ));
                    let id = self.id_gen.next();
                    self.logical_layout
                        .declarations
                        .push(instructions::instruction_variable(
                            pointer_id,
                            id,
                            spirv::StorageClass::Workgroup,
                            None,
                        ));
                    let spec_constant_id = self.local_spec_constants[&info.spec_id];
                    self.local_args.insert(
                        (fun_idx, arg_idx),
                        LocalArgInfo {
                            variable_id: id,
                            spec_constant_id,
                            ..info
                        },
                    );
                }
            }
        }

        // The module's own globals.
        let buffer_mode = self.flags.contains(WriterFlags::CONSTANTS_IN_STORAGE_BUFFER);
        let kernel_sets = if self.flags.contains(WriterFlags::DISTINCT_DESCRIPTOR_SETS) {
            module
                .functions
                .iter()
                .filter(|(_, fun)| fun.is_kernel())
                .count() as u32
        } else {
            1
        };
        let mut constant_binding = 0;
        for (_, var) in module.global_variables.iter() {
            let id = match var.space {
                AddressSpace::Constant if buffer_mode => {
                    let pointer_id =
                        self.get_type_id(LookupType::Local(LocalType::PodWrapperPointer {
                            base: var.ty,
                            class: spirv::StorageClass::StorageBuffer,
                        }));
                    let id = self.id_gen.next();
                    self.logical_layout
                        .declarations
                        .push(instructions::instruction_variable(
                            pointer_id,
                            id,
                            spirv::StorageClass::StorageBuffer,
                            None,
                        ));
                    self.decorate_binding(id, kernel_sets, constant_binding);
                    self.logical_layout
                        .annotations
                        .push(instructions::instruction_decorate(
                            id,
                            spirv::Decoration::NonWritable,
                            &[],
                        ));
                    let bytes = match var.init {
                        Some(init) => layout::constant_bytes(module, init),
                        None => vec![0; layout::layout_of(module, var.ty).size as usize],
                    };
                    let hex: String =
                        bytes.iter().map(|byte| format!("{:02x}", byte)).collect();
                    self.descriptor_map
                        .entries
                        .push(resources::DescriptorMapEntry::Constant {
                            descriptor_set: kernel_sets,
                            hex_bytes: hex,
                        });
                    constant_binding += 1;
                    id
                }
                AddressSpace::Constant | AddressSpace::Private => {
                    let pointer_key =
                        self.pointer_key(module, var.ty, spirv::StorageClass::Private)?;
                    let pointer_id = self.get_type_id(pointer_key);
                    let init_id = match var.init {
                        Some(init) => Some(self.lookup_constant(module, init)?),
                        None => None,
                    };
                    let id = self.id_gen.next();
                    self.logical_layout
                        .declarations
                        .push(instructions::instruction_variable(
                            pointer_id,
                            id,
                            spirv::StorageClass::Private,
                            init_id,
                        ));
                    id
                }
                AddressSpace::Local => {
                    let pointer_key =
                        self.pointer_key(module, var.ty, spirv::StorageClass::Workgroup)?;
                    let pointer_id = self.get_type_id(pointer_key);
                    let id = self.id_gen.next();
                    self.logical_layout
                        .declarations
                        .push(instructions::instruction_variable(
                            pointer_id,
                            id,
                            spirv::StorageClass::Workgroup,
                            None,
                        ));
                    id
                }
                _ => return Err(Error::Validation("global variable address space")),
            };
            self.global_variable_ids.push(id);
        }
        Ok(())
    }

    fn argument_pointer_key(
        &self,
        module: &Module,
        ty: Handle<crate::Type>,
        kind: resources::ArgKind,
    ) -> Result<LookupType, Error> {
        Ok(match kind {
            resources::ArgKind::Buffer => {
                let base = match module.types[ty].inner {
                    TypeInner::Pointer { base, .. } => base,
                    _ => unreachable!(),
                };
                LookupType::Local(LocalType::BufferWrapperPointer {
                    base,
                    class: spirv::StorageClass::StorageBuffer,
                })
            }
            resources::ArgKind::Pod | resources::ArgKind::PodUniform => {
                LookupType::Local(LocalType::PodWrapperPointer {
                    base: ty,
                    class: resources::storage_class(kind),
                })
            }
            resources::ArgKind::ReadOnlyImage | resources::ArgKind::WriteOnlyImage => {
                match module.types[ty].inner {
                    TypeInner::Image { dim, access } => {
                        LookupType::Local(LocalType::ImagePointer { dim, access })
                    }
                    _ => unreachable!(),
                }
            }
            resources::ArgKind::Sampler => LookupType::Local(LocalType::SamplerPointer),
            resources::ArgKind::Local => unreachable!("local arguments have no binding"),
        })
    }

    fn decorate_binding(&mut self, id: Word, descriptor_set: u32, binding: u32) {
        self.logical_layout
            .annotations
            .push(instructions::instruction_decorate(
                id,
                spirv::Decoration::DescriptorSet,
                &[descriptor_set],
            ));
        self.logical_layout
            .annotations
            .push(instructions::instruction_decorate(
                id,
                spirv::Decoration::Binding,
                &[binding],
            ));
    }
}

impl Writer {
    // ------------------------------------------------------------------
    // function lowering
    // ------------------------------------------------------------------

    fn get_function_type(&mut self, lookup: LookupFunctionType) -> Word {
        match self.lookup_function_type.get(&lookup) {
            Some(&id) => id,
            None => {
                let id = self.id_gen.next();
                self.logical_layout
                    .declarations
                    .push(instructions::instruction_type_function(
                        id,
                        lookup.return_type_id,
                        &lookup.parameter_type_ids,
                    ));
                self.lookup_function_type.insert(lookup, id);
                id
            }
        }
    }

    /// Parameter type of a non-kernel function, with the tracked
    /// constant-pointer rewrite applied.
    fn parameter_key(
        &self,
        module: &Module,
        handle: Handle<crate::Function>,
        index: u32,
        ty: Handle<crate::Type>,
    ) -> Result<LookupType, Error> {
        if self.constant_func_types.get(&handle) == Some(&index) {
            match module.types[ty].inner {
                TypeInner::Pointer { base, .. } => {
                    self.pointer_key(module, base, spirv::StorageClass::Private)
                }
                _ => Err(Error::Validation("tracked parameter is not a pointer")),
            }
        } else {
            self.localize(module, ty)
        }
    }

    fn emit_functions(&mut self, module: &Module) -> Result<(), Error> {
        for (fun_idx, (handle, ir_fun)) in module.functions.iter().enumerate() {
            self.emit_function(module, fun_idx, handle, ir_fun)?;
        }
        Ok(())
    }

    fn emit_function(
        &mut self,
        module: &Module,
        fun_idx: usize,
        handle: Handle<crate::Function>,
        ir_fun: &crate::Function,
    ) -> Result<(), Error> {
        let mut function = super::Function::new();
        let mut info = FunctionInfo::default();
        info.values.reset(ir_fun.values.len());
        info.argument_ids = vec![0; ir_fun.arguments.len()];

        let return_type_id = match ir_fun.result {
            Some(ty) => {
                let key = self.localize(module, ty)?;
                self.get_type_id(key)
            }
            None => self.get_type_id(LookupType::Local(LocalType::Void)),
        };
        // Kernel entry points take no parameters on the Vulkan side.
        let mut parameter_type_ids = Vec::new();
        if !ir_fun.is_kernel() {
            for (index, argument) in ir_fun.arguments.iter().enumerate() {
                let key = self.parameter_key(module, handle, index as u32, argument.ty)?;
                parameter_type_ids.push(self.get_type_id(key));
            }
        }
        let function_type_id = self.get_function_type(LookupFunctionType {
            parameter_type_ids: parameter_type_ids.clone(),
            return_type_id,
        });
        let fun_id = self.id_gen.next();
        if self.flags.contains(WriterFlags::SHOW_IDS) {
            log::debug!("%{} = function {}", fun_id, ir_fun.name);
        }
        self.lookup_function.insert(handle, fun_id);
        function.signature = Some(instructions::instruction_function(
            return_type_id,
            fun_id,
            spirv::FunctionControl::NONE,
            function_type_id,
        ));
        for (index, &type_id) in parameter_type_ids.iter().enumerate() {
            let id = self.id_gen.next();
            function
                .parameters
                .push(instructions::instruction_function_parameter(type_id, id));
            info.argument_ids[index] = id;
        }
        info.labels = ir_fun.blocks.iter().map(|_| self.id_gen.next()).collect();
        self.function_infos.push(info);
        debug_assert_eq!(self.function_infos.len() - 1, fun_idx);

        for (block_idx, ir_block) in ir_fun.blocks.iter().enumerate() {
            let label_id = self.function_infos[fun_idx].labels[block_idx];
            let mut block = super::Block::new(label_id);
            if block_idx == 0 {
                // Stack allocations precede everything else in the body.
                for &value in ir_block.body.iter() {
                    if let Value::Alloca { ty } = ir_fun.values[value] {
                        let key = self.pointer_key(module, ty, spirv::StorageClass::Function)?;
                        let pointer_id = self.get_type_id(key);
                        let id = self.id_gen.next();
                        function
                            .variables
                            .push(instructions::instruction_variable(
                                pointer_id,
                                id,
                                spirv::StorageClass::Function,
                                None,
                            ));
                        self.function_infos[fun_idx].values[value] = id;
                    }
                }
                if ir_fun.is_kernel() {
                    self.emit_kernel_prologue(module, fun_idx, ir_fun, &mut block)?;
                }
            }
            for &value in ir_block.body.iter() {
                match ir_fun.values[value] {
                    Value::Alloca { .. } => {
                        if block_idx != 0 {
                            return Err(Error::Unsupported("alloca outside the entry block"));
                        }
                    }
                    _ => {
                        self.emit_value(module, handle, fun_idx, ir_fun, value, &mut block, block_idx)?
                    }
                }
            }
            match ir_block.terminator {
                Terminator::Return { value } => {
                    let instruction = match value {
                        Some(value) => {
                            let id = self.value_id(module, fun_idx, ir_fun, value)?;
                            instructions::instruction_return_value(id)
                        }
                        None => instructions::instruction_return(),
                    };
                    block.termination.push(instruction);
                }
                Terminator::Branch { .. } | Terminator::BranchConditional { .. } => {
                    self.deferred.push(DeferredItem::Terminator {
                        fun: fun_idx,
                        block: block_idx,
                    });
                }
                Terminator::Switch { .. } => return Err(Error::Unsupported("switch")),
            }
            function.blocks.push(block);
        }
        self.functions.push(function);
        Ok(())
    }

    /// Load handles and unwrap bound arguments at kernel entry.
    fn emit_kernel_prologue(
        &mut self,
        module: &Module,
        fun_idx: usize,
        ir_fun: &crate::Function,
        block: &mut super::Block,
    ) -> Result<(), Error> {
        let zero = ConstantKey::Uint { value: 0, width: 4 };
        for (arg_idx, argument) in ir_fun.arguments.iter().enumerate() {
            let arg_key = (fun_idx, arg_idx as u32);
            // Unreferenced arguments still get a binding, but no prologue
            // instructions.
            let used = ir_fun
                .values
                .iter()
                .any(|(_, value)| matches!(*value, Value::Argument(index) if index == arg_idx as u32));
            let id = if let Some(binding) = self.argument_bindings.get(&arg_key).cloned() {
                let variable_id = self.argument_variables[&arg_key];
                if !used && binding.kind != resources::ArgKind::Buffer {
                    continue;
                }
                match binding.kind {
                    resources::ArgKind::Buffer => variable_id,
                    resources::ArgKind::Pod | resources::ArgKind::PodUniform => {
                        let zero_id = self.get_constant_id(&zero);
                        let pointer_key = self.pointer_key(
                            module,
                            argument.ty,
                            resources::storage_class(binding.kind),
                        )?;
                        let pointer_id = self.get_type_id(pointer_key);
                        let chain_id = self.id_gen.next();
                        block.body.push(instructions::instruction_access_chain(
                            pointer_id,
                            chain_id,
                            variable_id,
                            &[zero_id],
                        ));
                        let value_type_id = {
                            let key = self.localize(module, argument.ty)?;
                            self.get_type_id(key)
                        };
                        let load_id = self.id_gen.next();
                        block.body.push(instructions::instruction_load(
                            value_type_id,
                            load_id,
                            chain_id,
                        ));
                        load_id
                    }
                    resources::ArgKind::ReadOnlyImage
                    | resources::ArgKind::WriteOnlyImage
                    | resources::ArgKind::Sampler => {
                        let value_type_id = {
                            let key = self.localize(module, argument.ty)?;
                            self.get_type_id(key)
                        };
                        let load_id = self.id_gen.next();
                        block.body.push(instructions::instruction_load(
                            value_type_id,
                            load_id,
                            variable_id,
                        ));
                        load_id
                    }
                    resources::ArgKind::Local => unreachable!(),
                }
            } else if let Some(local) = self.local_args.get(&arg_key).cloned() {
                if !used {
                    continue;
                }
                // Pre-computed pointer to element 0 of the workgroup array.
                let zero_id = self.get_constant_id(&zero);
                let pointer_key =
                    self.pointer_key(module, local.elem_type, spirv::StorageClass::Workgroup)?;
                let pointer_id = self.get_type_id(pointer_key);
                let chain_id = self.id_gen.next();
                block.body.push(instructions::instruction_access_chain(
                    pointer_id,
                    chain_id,
                    local.variable_id,
                    &[zero_id],
                ));
                chain_id
            } else {
                continue;
            };
            self.function_infos[fun_idx].argument_ids[arg_idx] = id;
        }
        if self.flags.contains(WriterFlags::HACK_INITIALIZERS) && self.work_group_size_var_id != 0
        {
            block.body.push(instructions::instruction_store(
                self.work_group_size_var_id,
                self.work_group_size_value_id,
            ));
        }
        Ok(())
    }

    /// The id of an operand value. Leaf values resolve lazily; instruction
    /// values must have been lowered already.
    fn value_id(
        &mut self,
        module: &Module,
        fun_idx: usize,
        ir_fun: &crate::Function,
        value: Handle<Value>,
    ) -> Result<Word, Error> {
        let cached = self.function_infos[fun_idx].values.ids[value.index()];
        if cached != 0 {
            return Ok(cached);
        }
        let id = match ir_fun.values[value] {
            Value::Constant(constant) => self.lookup_constant(module, constant)?,
            Value::Argument(index) => {
                let id = self.function_infos[fun_idx].argument_ids[index as usize];
                if id == 0 {
                    unreachable!("Argument {} has no id!", index);
                }
                id
            }
            Value::Global(global) => self.global_variable_ids[global.index()],
            ref other => unreachable!("Value {:?} is not lowered yet!", other),
        };
        self.function_infos[fun_idx].values.ids[value.index()] = id;
        Ok(id)
    }

    /// The id of the emitted type of a value.
    fn result_type_id(
        &self,
        module: &Module,
        ir_fun: &crate::Function,
        value: Handle<Value>,
    ) -> Result<Word, Error> {
        let resolution = resolve_value(module, ir_fun, value)?;
        let key = self.resolution_key(module, &resolution)?;
        Ok(self.get_type_id(key))
    }

    /// Normalize a pointer operand; a buffer argument dereferenced directly
    /// steps through its wrapper struct and runtime array first.
    fn pointer_operand_id(
        &mut self,
        module: &Module,
        fun_idx: usize,
        ir_fun: &crate::Function,
        pointer: Handle<Value>,
        block: &mut super::Block,
    ) -> Result<Word, Error> {
        if let Some((arg_idx, resources::ArgKind::Buffer)) =
            self.argument_kind(ir_fun, fun_idx, pointer)
        {
            let zero_id = self.get_constant_id(&ConstantKey::Uint { value: 0, width: 4 });
            let variable_id = self.argument_variables[&(fun_idx, arg_idx)];
            let base = match module.types[ir_fun.arguments[arg_idx as usize].ty].inner {
                TypeInner::Pointer { base, .. } => base,
                _ => unreachable!(),
            };
            let pointer_key =
                self.pointer_key(module, base, spirv::StorageClass::StorageBuffer)?;
            let pointer_id = self.get_type_id(pointer_key);
            let id = self.id_gen.next();
            block.body.push(instructions::instruction_access_chain(
                pointer_id,
                id,
                variable_id,
                &[zero_id, zero_id],
            ));
            Ok(id)
        } else {
            self.value_id(module, fun_idx, ir_fun, pointer)
        }
    }

    fn is_const_true(
        &self,
        module: &Module,
        ir_fun: &crate::Function,
        value: Handle<Value>,
    ) -> bool {
        match ir_fun.values[value] {
            Value::Constant(constant) => {
                matches!(module.constants[constant].inner, ConstantInner::Bool(true))
            }
            _ => false,
        }
    }

    /// Record that a pointer type produced by `OpPtrAccessChain` needs an
    /// `ArrayStride` decoration.
    fn mark_stride(&mut self, type_id: Word, stride: u32) {
        if self.strided_ids.insert(type_id) {
            self.needs_array_stride.push((type_id, stride));
        }
    }

    /// The (accept, reject) constants a boolean-widening cast selects over.
    fn bool_widen_keys(
        &self,
        kind: CastKind,
        vector_size: Option<VectorSize>,
        target_kind: ScalarKind,
        target_width: Bytes,
    ) -> (ConstantKey, ConstantKey) {
        let (accept, reject) = match kind {
            CastKind::SignExtend => {
                let ones = match target_width {
                    8 => !0u64,
                    2 => 0xFFFF,
                    _ => 0xFFFF_FFFF,
                };
                (
                    ConstantKey::Uint {
                        value: ones,
                        width: target_width,
                    },
                    ConstantKey::Uint {
                        value: 0,
                        width: target_width,
                    },
                )
            }
            CastKind::UintToFloat | CastKind::SintToFloat => (
                ConstantKey::Float {
                    bits: if target_width == 8 {
                        1f64.to_bits()
                    } else {
                        1f32.to_bits() as u64
                    },
                    width: target_width,
                },
                ConstantKey::Float {
                    bits: 0,
                    width: target_width,
                },
            ),
            _ => (
                ConstantKey::Uint {
                    value: 1,
                    width: target_width,
                },
                ConstantKey::Uint {
                    value: 0,
                    width: target_width,
                },
            ),
        };
        (
            self.splat_key(vector_size, target_kind, target_width, accept),
            self.splat_key(vector_size, target_kind, target_width, reject),
        )
    }

    /// The shift-amount id for a `<4 x i8>` lane index: a constant
    /// `index * 8` when the lane is known, or a runtime multiply by 8.
    fn char_shift_id(
        &mut self,
        module: &Module,
        fun_idx: usize,
        ir_fun: &crate::Function,
        index: Handle<Value>,
        block: &mut super::Block,
    ) -> Result<Word, Error> {
        let u32_id = self.get_type_id(self.scalar_key(ScalarKind::Uint, 4));
        match self.constant_scalar(module, ir_fun, index) {
            Some(lane) => Ok(self.get_constant_id(&ConstantKey::Uint {
                value: lane * 8,
                width: 4,
            })),
            None => {
                let eight = self.get_constant_id(&ConstantKey::Uint { value: 8, width: 4 });
                let index_id = self.value_id(module, fun_idx, ir_fun, index)?;
                let id = self.id_gen.next();
                block.body.push(instructions::instruction_binary(
                    Op::IMul,
                    u32_id,
                    id,
                    index_id,
                    eight,
                ));
                Ok(id)
            }
        }
    }
}

impl Writer {
    // ------------------------------------------------------------------
    // the instruction lowerer
    // ------------------------------------------------------------------

    #[allow(clippy::too_many_arguments)]
    fn emit_value(
        &mut self,
        module: &Module,
        handle: Handle<crate::Function>,
        fun_idx: usize,
        ir_fun: &crate::Function,
        value: Handle<Value>,
        block: &mut super::Block,
        block_idx: usize,
    ) -> Result<(), Error> {
        match ir_fun.values[value] {
            Value::Argument(_) | Value::Global(_) | Value::Constant(_) | Value::Alloca { .. } => {
                Ok(())
            }
            Value::Binary { op, left, right } => {
                let (vector_size, kind, width) = self
                    .numeric_shape(module, ir_fun, left)?
                    .ok_or(Error::Unsupported("binary operator on a non-numeric type"))?;
                let left_id = self.value_id(module, fun_idx, ir_fun, left)?;
                let right_id = self.value_id(module, fun_idx, ir_fun, right)?;
                let type_id =
                    self.get_type_id(LookupType::Local(canonical_value(vector_size, kind, width)?));
                let id = self.id_gen.next();
                let instruction = if kind == ScalarKind::Bool {
                    match op {
                        BinaryOperator::And => instructions::instruction_binary(
                            Op::LogicalAnd,
                            type_id,
                            id,
                            left_id,
                            right_id,
                        ),
                        BinaryOperator::InclusiveOr => instructions::instruction_binary(
                            Op::LogicalOr,
                            type_id,
                            id,
                            left_id,
                            right_id,
                        ),
                        BinaryOperator::ExclusiveOr => {
                            // `xor i1 %x, true` is a negation.
                            if self.is_const_true(module, ir_fun, right) {
                                instructions::instruction_unary(
                                    Op::LogicalNot,
                                    type_id,
                                    id,
                                    left_id,
                                )
                            } else if self.is_const_true(module, ir_fun, left) {
                                instructions::instruction_unary(
                                    Op::LogicalNot,
                                    type_id,
                                    id,
                                    right_id,
                                )
                            } else {
                                instructions::instruction_binary(
                                    Op::LogicalNotEqual,
                                    type_id,
                                    id,
                                    left_id,
                                    right_id,
                                )
                            }
                        }
                        _ => {
                            return Err(Error::Unsupported("arithmetic on booleans"));
                        }
                    }
                } else {
                    instructions::instruction_binary(
                        binary_op(op, kind),
                        type_id,
                        id,
                        left_id,
                        right_id,
                    )
                };
                block.body.push(instruction);
                self.function_infos[fun_idx].values[value] = id;
                Ok(())
            }
            Value::Compare { op, left, right } => {
                if self.is_pointer(module, ir_fun, left)? || self.is_pointer(module, ir_fun, right)?
                {
                    return Err(Error::Unsupported("pointer equality"));
                }
                let shape = self.numeric_shape(module, ir_fun, left)?;
                let vector_size = shape.and_then(|(size, _, _)| size);
                let type_id = self.get_type_id(LookupType::Local(canonical_value(
                    vector_size,
                    ScalarKind::Bool,
                    1,
                )?));
                let left_id = self.value_id(module, fun_idx, ir_fun, left)?;
                let right_id = self.value_id(module, fun_idx, ir_fun, right)?;
                let id = self.id_gen.next();
                block.body.push(instructions::instruction_binary(
                    comparison_op(op),
                    type_id,
                    id,
                    left_id,
                    right_id,
                ));
                self.function_infos[fun_idx].values[value] = id;
                Ok(())
            }
            Value::Cast {
                kind,
                value: source,
                to,
            } => {
                let source_shape = self.numeric_shape(module, ir_fun, source)?;
                let target_key = self.localize(module, to)?;
                let target_id = self.get_type_id(target_key);
                let source_id = self.value_id(module, fun_idx, ir_fun, source)?;
                if let Some((_, ScalarKind::Bool, _)) = source_shape {
                    // Predicate widening becomes a select over the constants
                    // registered during discovery.
                    let (size, target_kind, target_width) = match module.types[to].inner {
                        TypeInner::Scalar { kind, width } => (None, kind, width),
                        TypeInner::Vector { size, kind, width } => (Some(size), kind, width),
                        _ => return Err(Error::Unsupported("cast to a non-numeric type")),
                    };
                    let (accept, reject) =
                        self.bool_widen_keys(kind, size, target_kind, target_width);
                    let accept_id = self.get_constant_id(&accept);
                    let reject_id = self.get_constant_id(&reject);
                    let id = self.id_gen.next();
                    block.body.push(instructions::instruction_select(
                        target_id, id, source_id, accept_id, reject_id,
                    ));
                    self.function_infos[fun_idx].values[value] = id;
                    return Ok(());
                }
                let target_shape = match module.types[to].inner {
                    TypeInner::Scalar { kind, width } => (None, kind, width),
                    TypeInner::Vector { size, kind, width } => (Some(size), kind, width),
                    _ => return Err(Error::Unsupported("cast to a non-numeric type")),
                };
                if kind == CastKind::Trunc && target_shape.2 == 1 {
                    // i32 -> i8 keeps the low byte.
                    let mask = self.get_constant_id(&ConstantKey::Uint {
                        value: 0xFF,
                        width: 4,
                    });
                    let id = self.id_gen.next();
                    block.body.push(instructions::instruction_binary(
                        Op::BitwiseAnd,
                        target_id,
                        id,
                        source_id,
                        mask,
                    ));
                    self.function_infos[fun_idx].values[value] = id;
                    return Ok(());
                }
                if let Some((size, source_kind, source_width)) = source_shape {
                    // Aliased types need no conversion at all.
                    if canonical_value(size, source_kind, source_width)?
                        == canonical_value(target_shape.0, target_shape.1, target_shape.2)?
                    {
                        self.function_infos[fun_idx].values[value] = source_id;
                        return Ok(());
                    }
                }
                let op = match kind {
                    CastKind::Trunc | CastKind::ZeroExtend => Op::UConvert,
                    CastKind::SignExtend => Op::SConvert,
                    CastKind::FloatTrunc | CastKind::FloatExtend => Op::FConvert,
                    CastKind::FloatToUint => Op::ConvertFToU,
                    CastKind::FloatToSint => Op::ConvertFToS,
                    CastKind::UintToFloat => Op::ConvertUToF,
                    CastKind::SintToFloat => Op::ConvertSToF,
                    CastKind::Bitcast => Op::Bitcast,
                };
                let id = self.id_gen.next();
                block
                    .body
                    .push(instructions::instruction_unary(op, target_id, id, source_id));
                self.function_infos[fun_idx].values[value] = id;
                Ok(())
            }
            Value::Select {
                condition,
                accept,
                reject,
            } => {
                let type_id = self.result_type_id(module, ir_fun, value)?;
                let condition_id = self.value_id(module, fun_idx, ir_fun, condition)?;
                let accept_id = self.value_id(module, fun_idx, ir_fun, accept)?;
                let reject_id = self.value_id(module, fun_idx, ir_fun, reject)?;
                let id = self.id_gen.next();
                block.body.push(instructions::instruction_select(
                    type_id,
                    id,
                    condition_id,
                    accept_id,
                    reject_id,
                ));
                self.function_infos[fun_idx].values[value] = id;
                Ok(())
            }
            Value::Compose { ty, ref components } => {
                let type_id = {
                    let key = self.localize(module, ty)?;
                    self.get_type_id(key)
                };
                let mut component_ids = Vec::with_capacity(components.len());
                for &component in components.clone().iter() {
                    component_ids.push(self.value_id(module, fun_idx, ir_fun, component)?);
                }
                let id = self.id_gen.next();
                block.body.push(instructions::instruction_composite_construct(
                    type_id,
                    id,
                    &component_ids,
                ));
                self.function_infos[fun_idx].values[value] = id;
                Ok(())
            }
            Value::GetPtr { base, ref indices } => {
                let indices = indices.clone();
                let class = self.pointer_class(module, handle, ir_fun, fun_idx, base)?;
                let result_key = match resolve_value(module, ir_fun, value)? {
                    TypeResolution::Pointer { base: pointee, .. } => {
                        self.pointer_key(module, pointee, class)?
                    }
                    TypeResolution::ScalarPointer { kind, width, .. } => {
                        self.value_pointer_key(None, kind, width, class)?
                    }
                    _ => return Err(Error::Validation("access chain over a non-pointer")),
                };
                let result_type_id = self.get_type_id(result_key);
                let stride = match resolve_value(module, ir_fun, value)? {
                    TypeResolution::Pointer { base: pointee, .. } => {
                        layout::array_stride(module, pointee)
                    }
                    TypeResolution::ScalarPointer { width, .. } => width as u32,
                    _ => 4,
                };
                match self.argument_kind(ir_fun, fun_idx, base) {
                    Some((arg_idx, resources::ArgKind::Buffer)) => {
                        // Step through the wrapper struct first.
                        let zero_id =
                            self.get_constant_id(&ConstantKey::Uint { value: 0, width: 4 });
                        let variable_id = self.argument_variables[&(fun_idx, arg_idx)];
                        let mut index_ids = vec![zero_id];
                        for &index in indices.iter() {
                            index_ids.push(self.value_id(module, fun_idx, ir_fun, index)?);
                        }
                        let id = self.id_gen.next();
                        block.body.push(instructions::instruction_access_chain(
                            result_type_id,
                            id,
                            variable_id,
                            &index_ids,
                        ));
                        self.function_infos[fun_idx].values[value] = id;
                    }
                    Some((_, resources::ArgKind::Local)) => {
                        // The argument already is a pointer to element zero.
                        let base_id = self.value_id(module, fun_idx, ir_fun, base)?;
                        match indices.split_first() {
                            None => {
                                self.function_infos[fun_idx].values[value] = base_id;
                            }
                            Some((&first, rest))
                                if rest.is_empty()
                                    && self.constant_scalar(module, ir_fun, first) == Some(0) =>
                            {
                                self.function_infos[fun_idx].values[value] = base_id;
                            }
                            Some((&first, rest)) => {
                                let element_id = self.value_id(module, fun_idx, ir_fun, first)?;
                                let mut index_ids = Vec::with_capacity(rest.len());
                                for &index in rest {
                                    index_ids.push(self.value_id(module, fun_idx, ir_fun, index)?);
                                }
                                let id = self.id_gen.next();
                                block.body.push(instructions::instruction_ptr_access_chain(
                                    result_type_id,
                                    id,
                                    base_id,
                                    element_id,
                                    &index_ids,
                                ));
                                self.mark_stride(result_type_id, stride);
                                self.function_infos[fun_idx].values[value] = id;
                            }
                        }
                    }
                    _ if self.is_wrapped_global(module, ir_fun, base) => {
                        // The leading zero index of the source GEP becomes
                        // the wrapper's member index.
                        let base_id = self.value_id(module, fun_idx, ir_fun, base)?;
                        let mut index_ids = Vec::with_capacity(indices.len());
                        for &index in indices.iter() {
                            index_ids.push(self.value_id(module, fun_idx, ir_fun, index)?);
                        }
                        let id = self.id_gen.next();
                        block.body.push(instructions::instruction_access_chain(
                            result_type_id,
                            id,
                            base_id,
                            &index_ids,
                        ));
                        self.function_infos[fun_idx].values[value] = id;
                    }
                    _ => {
                        let base_id = self.value_id(module, fun_idx, ir_fun, base)?;
                        match indices.split_first() {
                            None => {
                                self.function_infos[fun_idx].values[value] = base_id;
                            }
                            Some((&first, rest))
                                if self.constant_scalar(module, ir_fun, first) == Some(0) =>
                            {
                                if rest.is_empty() {
                                    self.function_infos[fun_idx].values[value] = base_id;
                                } else {
                                    let mut index_ids = Vec::with_capacity(rest.len());
                                    for &index in rest {
                                        index_ids
                                            .push(self.value_id(module, fun_idx, ir_fun, index)?);
                                    }
                                    let id = self.id_gen.next();
                                    block.body.push(instructions::instruction_access_chain(
                                        result_type_id,
                                        id,
                                        base_id,
                                        &index_ids,
                                    ));
                                    self.function_infos[fun_idx].values[value] = id;
                                }
                            }
                            Some((&first, rest)) => {
                                let element_id = self.value_id(module, fun_idx, ir_fun, first)?;
                                let mut index_ids = Vec::with_capacity(rest.len());
                                for &index in rest {
                                    index_ids.push(self.value_id(module, fun_idx, ir_fun, index)?);
                                }
                                let id = self.id_gen.next();
                                block.body.push(instructions::instruction_ptr_access_chain(
                                    result_type_id,
                                    id,
                                    base_id,
                                    element_id,
                                    &index_ids,
                                ));
                                self.mark_stride(result_type_id, stride);
                                self.function_infos[fun_idx].values[value] = id;
                            }
                        }
                    }
                }
                Ok(())
            }
            Value::Load { pointer } => {
                let type_id = self.result_type_id(module, ir_fun, value)?;
                let pointer_id =
                    self.pointer_operand_id(module, fun_idx, ir_fun, pointer, block)?;
                let id = self.id_gen.next();
                block
                    .body
                    .push(instructions::instruction_load(type_id, id, pointer_id));
                self.function_infos[fun_idx].values[value] = id;
                Ok(())
            }
            Value::Store {
                pointer,
                value: object,
            } => {
                let pointer_id =
                    self.pointer_operand_id(module, fun_idx, ir_fun, pointer, block)?;
                let object_id = self.value_id(module, fun_idx, ir_fun, object)?;
                block
                    .body
                    .push(instructions::instruction_store(pointer_id, object_id));
                Ok(())
            }
            Value::ExtractElement { vector, index } => {
                let type_id = self.result_type_id(module, ir_fun, value)?;
                if self.is_char_vector(module, ir_fun, vector)? {
                    // Byte extraction out of the folded i32.
                    let vector_id = self.value_id(module, fun_idx, ir_fun, vector)?;
                    let shift_id =
                        self.char_shift_id(module, fun_idx, ir_fun, index, block)?;
                    let mask_id = self.get_constant_id(&ConstantKey::Uint {
                        value: 0xFF,
                        width: 4,
                    });
                    let shifted_id = self.id_gen.next();
                    block.body.push(instructions::instruction_binary(
                        Op::ShiftRightLogical,
                        type_id,
                        shifted_id,
                        vector_id,
                        shift_id,
                    ));
                    let id = self.id_gen.next();
                    block.body.push(instructions::instruction_binary(
                        Op::BitwiseAnd,
                        type_id,
                        id,
                        shifted_id,
                        mask_id,
                    ));
                    self.function_infos[fun_idx].values[value] = id;
                    return Ok(());
                }
                let vector_id = self.value_id(module, fun_idx, ir_fun, vector)?;
                let id = self.id_gen.next();
                match self.constant_scalar(module, ir_fun, index) {
                    Some(lane) => block.body.push(instructions::instruction_composite_extract(
                        type_id,
                        id,
                        vector_id,
                        &[lane as u32],
                    )),
                    None => {
                        let index_id = self.value_id(module, fun_idx, ir_fun, index)?;
                        block
                            .body
                            .push(instructions::instruction_vector_extract_dynamic(
                                type_id, id, vector_id, index_id,
                            ))
                    }
                }
                self.function_infos[fun_idx].values[value] = id;
                Ok(())
            }
            Value::InsertElement {
                vector,
                component,
                index,
            } => {
                let type_id = self.result_type_id(module, ir_fun, value)?;
                if self.is_char_vector(module, ir_fun, vector)? {
                    // Clear the byte, then or the shifted replacement in.
                    let vector_id = self.value_id(module, fun_idx, ir_fun, vector)?;
                    let component_id = self.value_id(module, fun_idx, ir_fun, component)?;
                    let shift_id =
                        self.char_shift_id(module, fun_idx, ir_fun, index, block)?;
                    let byte_mask = self.get_constant_id(&ConstantKey::Uint {
                        value: 0xFF,
                        width: 4,
                    });
                    let mask_id = self.id_gen.next();
                    block.body.push(instructions::instruction_binary(
                        Op::ShiftLeftLogical,
                        type_id,
                        mask_id,
                        byte_mask,
                        shift_id,
                    ));
                    let inverted_id = self.id_gen.next();
                    block.body.push(instructions::instruction_unary(
                        Op::Not,
                        type_id,
                        inverted_id,
                        mask_id,
                    ));
                    let cleared_id = self.id_gen.next();
                    block.body.push(instructions::instruction_binary(
                        Op::BitwiseAnd,
                        type_id,
                        cleared_id,
                        vector_id,
                        inverted_id,
                    ));
                    let shifted_id = self.id_gen.next();
                    block.body.push(instructions::instruction_binary(
                        Op::ShiftLeftLogical,
                        type_id,
                        shifted_id,
                        component_id,
                        shift_id,
                    ));
                    let id = self.id_gen.next();
                    block.body.push(instructions::instruction_binary(
                        Op::BitwiseOr,
                        type_id,
                        id,
                        cleared_id,
                        shifted_id,
                    ));
                    self.function_infos[fun_idx].values[value] = id;
                    return Ok(());
                }
                let vector_id = self.value_id(module, fun_idx, ir_fun, vector)?;
                let component_id = self.value_id(module, fun_idx, ir_fun, component)?;
                let id = self.id_gen.next();
                match self.constant_scalar(module, ir_fun, index) {
                    Some(lane) => block.body.push(instructions::instruction_composite_insert(
                        type_id,
                        id,
                        component_id,
                        vector_id,
                        &[lane as u32],
                    )),
                    None => {
                        let index_id = self.value_id(module, fun_idx, ir_fun, index)?;
                        block
                            .body
                            .push(instructions::instruction_vector_insert_dynamic(
                                type_id,
                                id,
                                vector_id,
                                component_id,
                                index_id,
                            ))
                    }
                }
                self.function_infos[fun_idx].values[value] = id;
                Ok(())
            }
            Value::Shuffle {
                first,
                second,
                ref pattern,
            } => {
                if self.is_char_vector(module, ir_fun, first)? {
                    return Err(Error::Unsupported("shuffle of 8-bit vectors"));
                }
                let pattern = pattern.clone();
                let type_id = self.result_type_id(module, ir_fun, value)?;
                let first_id = self.value_id(module, fun_idx, ir_fun, first)?;
                let second_id = self.value_id(module, fun_idx, ir_fun, second)?;
                let id = self.id_gen.next();
                block.body.push(instructions::instruction_vector_shuffle(
                    type_id, id, first_id, second_id, &pattern,
                ));
                self.function_infos[fun_idx].values[value] = id;
                Ok(())
            }
            Value::ExtractValue {
                composite,
                ref indices,
            } => {
                let indices = indices.clone();
                let type_id = self.result_type_id(module, ir_fun, value)?;
                let composite_id = self.value_id(module, fun_idx, ir_fun, composite)?;
                let id = self.id_gen.next();
                block.body.push(instructions::instruction_composite_extract(
                    type_id,
                    id,
                    composite_id,
                    &indices,
                ));
                self.function_infos[fun_idx].values[value] = id;
                Ok(())
            }
            Value::InsertValue {
                composite,
                object,
                ref indices,
            } => {
                let indices = indices.clone();
                let type_id = self.result_type_id(module, ir_fun, value)?;
                let composite_id = self.value_id(module, fun_idx, ir_fun, composite)?;
                let object_id = self.value_id(module, fun_idx, ir_fun, object)?;
                let id = self.id_gen.next();
                block.body.push(instructions::instruction_composite_insert(
                    type_id,
                    id,
                    object_id,
                    composite_id,
                    &indices,
                ));
                self.function_infos[fun_idx].values[value] = id;
                Ok(())
            }
            Value::Atomic {
                op,
                pointer,
                value: operand,
            } => {
                let type_id = self.result_type_id(module, ir_fun, value)?;
                let pointer_id =
                    self.pointer_operand_id(module, fun_idx, ir_fun, pointer, block)?;
                let scope_id = self.get_constant_id(&ConstantKey::Uint {
                    value: SCOPE_DEVICE as u64,
                    width: 4,
                });
                let semantics_id = self.get_constant_id(&ConstantKey::Uint {
                    value: SEMANTICS_ATOMIC as u64,
                    width: 4,
                });
                let operand_id = match operand {
                    Some(operand) => Some(self.value_id(module, fun_idx, ir_fun, operand)?),
                    None => None,
                };
                let id = self.id_gen.next();
                block.body.push(instructions::instruction_atomic(
                    atomic_op(op),
                    type_id,
                    id,
                    pointer_id,
                    scope_id,
                    semantics_id,
                    operand_id,
                ));
                self.function_infos[fun_idx].values[value] = id;
                Ok(())
            }
            Value::Phi { .. } => {
                // Sources may not exist yet; reserve the result and patch
                // the instruction in later.
                let id = self.id_gen.next();
                self.function_infos[fun_idx].values[value] = id;
                self.deferred.push(DeferredItem::Phi {
                    fun: fun_idx,
                    block: block_idx,
                    at: block.body.len(),
                    value,
                    id,
                });
                Ok(())
            }
            Value::Call {
                ref origin,
                ref arguments,
            } => {
                let origin = origin.clone();
                let arguments = arguments.clone();
                self.emit_call(
                    module, fun_idx, ir_fun, value, &origin, &arguments, block, block_idx,
                )
            }
        }
    }
}

impl Writer {
    // ------------------------------------------------------------------
    // calls
    // ------------------------------------------------------------------

    #[allow(clippy::too_many_arguments)]
    fn emit_call(
        &mut self,
        module: &Module,
        fun_idx: usize,
        ir_fun: &crate::Function,
        value: Handle<Value>,
        origin: &FunctionOrigin,
        arguments: &[Handle<Value>],
        block: &mut super::Block,
        block_idx: usize,
    ) -> Result<(), Error> {
        let name = match *origin {
            FunctionOrigin::Local(_) => {
                // The callee body may not exist yet; reserve the result and
                // defer the call.
                let id = self.id_gen.next();
                self.function_infos[fun_idx].values[value] = id;
                self.deferred.push(DeferredItem::Call {
                    fun: fun_idx,
                    block: block_idx,
                    at: block.body.len(),
                    value,
                    id,
                    post_id: None,
                });
                return Ok(());
            }
            FunctionOrigin::External(ref name) => name,
        };
        let builtin = find_builtin(name).ok_or_else(|| Error::UnknownBuiltin(name.clone()))?;
        match builtin {
            Builtin::ExtInst(_) => {
                let id = self.id_gen.next();
                self.function_infos[fun_idx].values[value] = id;
                self.deferred.push(DeferredItem::Call {
                    fun: fun_idx,
                    block: block_idx,
                    at: block.body.len(),
                    value,
                    id,
                    post_id: None,
                });
            }
            Builtin::ExtInstIndirect(..) => {
                let id = self.id_gen.next();
                let post_id = self.id_gen.next();
                self.function_infos[fun_idx].values[value] = post_id;
                self.deferred.push(DeferredItem::Call {
                    fun: fun_idx,
                    block: block_idx,
                    at: block.body.len(),
                    value,
                    id,
                    post_id: Some(post_id),
                });
            }
            Builtin::ReadImage => {
                let dim = self.image_operand_dim(module, ir_fun, arguments[0])?;
                let sampled_image_type_id =
                    self.get_type_id(LookupType::Local(LocalType::SampledImage { dim }));
                let image_id = self.value_id(module, fun_idx, ir_fun, arguments[0])?;
                let sampler_id = self.value_id(module, fun_idx, ir_fun, arguments[1])?;
                let coordinate_id = self.value_id(module, fun_idx, ir_fun, arguments[2])?;
                let sampled_image_id = self.id_gen.next();
                block.body.push(instructions::instruction_sampled_image(
                    sampled_image_type_id,
                    sampled_image_id,
                    image_id,
                    sampler_id,
                ));
                let result_type_id = self.get_type_id(LookupType::Local(LocalType::Value {
                    vector_size: Some(VectorSize::Quad),
                    kind: ScalarKind::Float,
                    width: 4,
                }));
                let lod_id = self.get_constant_id(&ConstantKey::Float { bits: 0, width: 4 });
                let id = self.id_gen.next();
                block
                    .body
                    .push(instructions::instruction_image_sample_explicit_lod(
                        result_type_id,
                        id,
                        sampled_image_id,
                        coordinate_id,
                        lod_id,
                    ));
                self.function_infos[fun_idx].values[value] = id;
            }
            Builtin::WriteImage => {
                let image_id = self.value_id(module, fun_idx, ir_fun, arguments[0])?;
                let coordinate_id = self.value_id(module, fun_idx, ir_fun, arguments[1])?;
                let texel_id = self.value_id(module, fun_idx, ir_fun, arguments[2])?;
                block.body.push(instructions::instruction_image_write(
                    image_id,
                    coordinate_id,
                    texel_id,
                ));
            }
            Builtin::ImageSize { component } => {
                let dim = self.image_operand_dim(module, ir_fun, arguments[0])?;
                if component == 2 && dim == ImageDimension::D2 {
                    return Err(Error::Unsupported("depth query on a 2D image"));
                }
                let size = match dim {
                    ImageDimension::D2 => VectorSize::Bi,
                    ImageDimension::D3 => VectorSize::Tri,
                };
                let size_type_id = self.get_type_id(LookupType::Local(LocalType::Value {
                    vector_size: Some(size),
                    kind: ScalarKind::Uint,
                    width: 4,
                }));
                let image_id = self.value_id(module, fun_idx, ir_fun, arguments[0])?;
                let size_id = self.id_gen.next();
                block.body.push(instructions::instruction_image_query_size(
                    size_type_id,
                    size_id,
                    image_id,
                ));
                let u32_id = self.get_type_id(self.scalar_key(ScalarKind::Uint, 4));
                let id = self.id_gen.next();
                block.body.push(instructions::instruction_composite_extract(
                    u32_id,
                    id,
                    size_id,
                    &[component],
                ));
                self.function_infos[fun_idx].values[value] = id;
            }
            Builtin::Dot => {
                let shape = self
                    .numeric_shape(module, ir_fun, arguments[0])?
                    .ok_or(Error::Validation("dot of a non-numeric value"))?;
                let scalar_id = self.get_type_id(self.scalar_key(shape.1, shape.2));
                let left_id = self.value_id(module, fun_idx, ir_fun, arguments[0])?;
                let right_id = self.value_id(module, fun_idx, ir_fun, arguments[1])?;
                let id = self.id_gen.next();
                let op = match shape.0 {
                    Some(_) => Op::Dot,
                    None => Op::FMul,
                };
                block.body.push(instructions::instruction_binary(
                    op, scalar_id, id, left_id, right_id,
                ));
                self.function_infos[fun_idx].values[value] = id;
            }
            Builtin::FMod => {
                let type_id = self.result_type_id(module, ir_fun, value)?;
                let left_id = self.value_id(module, fun_idx, ir_fun, arguments[0])?;
                let right_id = self.value_id(module, fun_idx, ir_fun, arguments[1])?;
                let id = self.id_gen.next();
                block.body.push(instructions::instruction_binary(
                    Op::FRem,
                    type_id,
                    id,
                    left_id,
                    right_id,
                ));
                self.function_infos[fun_idx].values[value] = id;
            }
            Builtin::PopCount => {
                let type_id = self.result_type_id(module, ir_fun, value)?;
                let operand_id = self.value_id(module, fun_idx, ir_fun, arguments[0])?;
                let id = self.id_gen.next();
                block.body.push(instructions::instruction_unary(
                    Op::BitCount,
                    type_id,
                    id,
                    operand_id,
                ));
                self.function_infos[fun_idx].values[value] = id;
            }
            Builtin::Any | Builtin::All => {
                let bool_id = self.get_type_id(LookupType::Local(LocalType::Bool));
                let operand_id = self.value_id(module, fun_idx, ir_fun, arguments[0])?;
                let id = self.id_gen.next();
                let op = match builtin {
                    Builtin::Any => Op::Any,
                    _ => Op::All,
                };
                block
                    .body
                    .push(instructions::instruction_unary(op, bool_id, id, operand_id));
                self.function_infos[fun_idx].values[value] = id;
            }
            Builtin::IsInf | Builtin::IsNan => {
                let type_id = self.result_type_id(module, ir_fun, value)?;
                let operand_id = self.value_id(module, fun_idx, ir_fun, arguments[0])?;
                let id = self.id_gen.next();
                let op = match builtin {
                    Builtin::IsInf => Op::IsInf,
                    _ => Op::IsNan,
                };
                block
                    .body
                    .push(instructions::instruction_unary(op, type_id, id, operand_id));
                self.function_infos[fun_idx].values[value] = id;
            }
            Builtin::Barrier => {
                let scope_id = self.get_constant_id(&ConstantKey::Uint {
                    value: SCOPE_WORKGROUP as u64,
                    width: 4,
                });
                let semantics = self.barrier_semantics(module, ir_fun, arguments.first())?;
                let semantics_id = self.get_constant_id(&ConstantKey::Uint {
                    value: semantics as u64,
                    width: 4,
                });
                block.body.push(instructions::instruction_control_barrier(
                    scope_id,
                    scope_id,
                    semantics_id,
                ));
            }
            Builtin::MemFence => {
                let scope_id = self.get_constant_id(&ConstantKey::Uint {
                    value: SCOPE_WORKGROUP as u64,
                    width: 4,
                });
                let semantics = self.barrier_semantics(module, ir_fun, arguments.first())?;
                let semantics_id = self.get_constant_id(&ConstantKey::Uint {
                    value: semantics as u64,
                    width: 4,
                });
                block.body.push(instructions::instruction_memory_barrier(
                    scope_id,
                    semantics_id,
                ));
            }
            Builtin::SamplerInit => {
                let literal = self
                    .constant_scalar(module, ir_fun, arguments[0])
                    .ok_or(Error::Validation("non-constant sampler literal"))?
                    as u32;
                let index = self
                    .sampler_map
                    .iter()
                    .position(|entry| entry.value == literal)
                    .ok_or(Error::MissingSamplerMapEntry(literal))?;
                let variable_id = self.sampler_variables[index];
                let sampler_type_id = self.get_type_id(LookupType::Local(LocalType::Sampler));
                let id = self.id_gen.next();
                block.body.push(instructions::instruction_load(
                    sampler_type_id,
                    id,
                    variable_id,
                ));
                self.function_infos[fun_idx].values[value] = id;
            }
            Builtin::WorkGroupSize => {
                let vec3_id = self.get_type_id(LookupType::Local(LocalType::Value {
                    vector_size: Some(VectorSize::Tri),
                    kind: ScalarKind::Uint,
                    width: 4,
                }));
                // Some drivers lose the variable initializer, so the value
                // is rematerialized through a no-op bitwise and.
                let loaded_id = self.id_gen.next();
                block.body.push(instructions::instruction_binary(
                    Op::BitwiseAnd,
                    vec3_id,
                    loaded_id,
                    self.work_group_size_value_id,
                    self.work_group_size_value_id,
                ));
                let u32_id = self.get_type_id(self.scalar_key(ScalarKind::Uint, 4));
                let id = self.id_gen.next();
                match self.constant_scalar(module, ir_fun, arguments[0]) {
                    Some(dim) => block.body.push(instructions::instruction_composite_extract(
                        u32_id,
                        id,
                        loaded_id,
                        &[dim as u32],
                    )),
                    None => {
                        let index_id = self.value_id(module, fun_idx, ir_fun, arguments[0])?;
                        block
                            .body
                            .push(instructions::instruction_vector_extract_dynamic(
                                u32_id, id, loaded_id, index_id,
                            ))
                    }
                }
                self.function_infos[fun_idx].values[value] = id;
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // deferred fixup
    // ------------------------------------------------------------------

    fn apply_deferred(&mut self, module: &Module) -> Result<(), Error> {
        let handles: Vec<Handle<crate::Function>> =
            module.functions.iter().map(|(handle, _)| handle).collect();
        let items = std::mem::take(&mut self.deferred);
        // Reverse order keeps every recorded insertion position valid.
        for item in items.into_iter().rev() {
            match item {
                DeferredItem::Terminator { fun, block } => {
                    let ir_fun = &module.functions[handles[fun]];
                    let termination = self.lower_terminator(module, fun, ir_fun, block)?;
                    self.functions[fun].blocks[block].termination = termination;
                }
                DeferredItem::Phi {
                    fun,
                    block,
                    at,
                    value,
                    id,
                } => {
                    let ir_fun = &module.functions[handles[fun]];
                    let (ty, sources) = match ir_fun.values[value] {
                        Value::Phi { ty, ref sources } => (ty, sources.clone()),
                        _ => unreachable!(),
                    };
                    let type_id = {
                        let key = self.localize(module, ty)?;
                        self.get_type_id(key)
                    };
                    let mut pairs = Vec::with_capacity(sources.len());
                    for (source, predecessor) in sources {
                        let source_id = self.value_id(module, fun, ir_fun, source)?;
                        let parent_id = self.function_infos[fun].labels[predecessor as usize];
                        pairs.push((source_id, parent_id));
                    }
                    let instruction = instructions::instruction_phi(type_id, id, &pairs);
                    self.functions[fun].blocks[block].body.insert(at, instruction);
                }
                DeferredItem::Call {
                    fun,
                    block,
                    at,
                    value,
                    id,
                    post_id,
                } => {
                    let ir_fun = &module.functions[handles[fun]];
                    let (origin, arguments) = match ir_fun.values[value] {
                        Value::Call {
                            ref origin,
                            ref arguments,
                        } => (origin.clone(), arguments.clone()),
                        _ => unreachable!(),
                    };
                    let mut argument_ids = Vec::with_capacity(arguments.len());
                    for argument in arguments {
                        argument_ids.push(self.value_id(module, fun, ir_fun, argument)?);
                    }
                    match origin {
                        FunctionOrigin::Local(callee) => {
                            let return_type_id = match module.functions[callee].result {
                                Some(ty) => {
                                    let key = self.localize(module, ty)?;
                                    self.get_type_id(key)
                                }
                                None => self.get_type_id(LookupType::Local(LocalType::Void)),
                            };
                            let function_id = self.lookup_function[&callee];
                            let instruction = instructions::instruction_function_call(
                                return_type_id,
                                id,
                                function_id,
                                &argument_ids,
                            );
                            self.functions[fun].blocks[block].body.insert(at, instruction);
                        }
                        FunctionOrigin::External(name) => {
                            let type_id = self.result_type_id(module, ir_fun, value)?;
                            match find_builtin(&name) {
                                Some(Builtin::ExtInst(ext_op)) => {
                                    let instruction = instructions::instruction_ext_inst(
                                        type_id,
                                        id,
                                        self.gl450_ext_inst_id,
                                        ext_op,
                                        &argument_ids,
                                    );
                                    self.functions[fun].blocks[block]
                                        .body
                                        .insert(at, instruction);
                                }
                                Some(Builtin::ExtInstIndirect(ext_op, indirect)) => {
                                    let shape = self
                                        .numeric_shape(module, ir_fun, value)?
                                        .ok_or(Error::Validation("non-numeric extended result"))?;
                                    let post = match indirect {
                                        Indirect::SubFrom31 => {
                                            let key = self.splat_key(
                                                shape.0,
                                                ScalarKind::Uint,
                                                4,
                                                ConstantKey::Uint {
                                                    value: 31,
                                                    width: 4,
                                                },
                                            );
                                            let const_id = self.get_constant_id(&key);
                                            instructions::instruction_binary(
                                                Op::ISub,
                                                type_id,
                                                post_id.unwrap(),
                                                const_id,
                                                id,
                                            )
                                        }
                                        Indirect::MulInvPi => {
                                            let key = self.splat_key(
                                                shape.0,
                                                ScalarKind::Float,
                                                4,
                                                ConstantKey::Float {
                                                    bits: (INV_PI as f32).to_bits() as u64,
                                                    width: 4,
                                                },
                                            );
                                            let const_id = self.get_constant_id(&key);
                                            instructions::instruction_binary(
                                                Op::FMul,
                                                type_id,
                                                post_id.unwrap(),
                                                id,
                                                const_id,
                                            )
                                        }
                                    };
                                    let primary = instructions::instruction_ext_inst(
                                        type_id,
                                        id,
                                        self.gl450_ext_inst_id,
                                        ext_op,
                                        &argument_ids,
                                    );
                                    let body = &mut self.functions[fun].blocks[block].body;
                                    body.insert(at, post);
                                    body.insert(at, primary);
                                }
                                _ => unreachable!("only extended instructions are deferred"),
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Compute the merge and branch instructions of a deferred terminator.
    fn lower_terminator(
        &mut self,
        module: &Module,
        fun: usize,
        ir_fun: &crate::Function,
        block: usize,
    ) -> Result<Vec<Instruction>, Error> {
        // Loop headers carry a merge naming the loop's exit and its
        // continue target.
        let merge = {
            let flow = &self.flows[fun];
            match flow.loop_with_header(block as crate::BlockIndex) {
                Some(lp) => {
                    if lp.exits.len() != 1 {
                        return Err(Error::MultipleLoopExits(
                            block as crate::BlockIndex,
                            lp.exits.len(),
                        ));
                    }
                    let merge_block = lp.exits[0];
                    let continue_block = if lp.latches.contains(&(block as crate::BlockIndex)) {
                        block as crate::BlockIndex
                    } else {
                        // The deepest in-loop block dominating every latch.
                        let mut best: Option<crate::BlockIndex> = None;
                        for candidate in lp.blocks.iter() {
                            let candidate = candidate as crate::BlockIndex;
                            if lp
                                .latches
                                .iter()
                                .all(|&latch| flow.dominates(candidate, latch))
                            {
                                best = match best {
                                    Some(current)
                                        if flow.dom_depth[current as usize]
                                            >= flow.dom_depth[candidate as usize] =>
                                    {
                                        Some(current)
                                    }
                                    _ => Some(candidate),
                                };
                            }
                        }
                        best.ok_or(Error::NoContinueTarget(block as crate::BlockIndex))?
                    };
                    let labels = &self.function_infos[fun].labels;
                    Some((
                        labels[merge_block as usize],
                        labels[continue_block as usize],
                    ))
                }
                None => None,
            }
        };

        let mut termination = Vec::new();
        match ir_fun.blocks[block].terminator {
            Terminator::Branch { target } => {
                if let Some((merge_label, continue_label)) = merge {
                    termination.push(instructions::instruction_loop_merge(
                        merge_label,
                        continue_label,
                    ));
                }
                let target_label = self.function_infos[fun].labels[target as usize];
                termination.push(instructions::instruction_branch(target_label));
            }
            Terminator::BranchConditional {
                condition,
                accept,
                reject,
            } => {
                let condition_id = self.value_id(module, fun, ir_fun, condition)?;
                let (accept_label, reject_label) = {
                    let labels = &self.function_infos[fun].labels;
                    (labels[accept as usize], labels[reject as usize])
                };
                match merge {
                    Some((merge_label, continue_label)) => {
                        termination.push(instructions::instruction_loop_merge(
                            merge_label,
                            continue_label,
                        ));
                    }
                    None => {
                        let flow = &self.flows[fun];
                        let has_back_edge = flow
                            .is_back_edge(block as crate::BlockIndex, accept)
                            || flow.is_back_edge(block as crate::BlockIndex, reject);
                        // Rejoining conditionals merge at their false edge.
                        if !has_back_edge {
                            termination
                                .push(instructions::instruction_selection_merge(reject_label));
                        }
                    }
                }
                termination.push(instructions::instruction_branch_conditional(
                    condition_id,
                    accept_label,
                    reject_label,
                ));
            }
            _ => unreachable!("only branches are deferred"),
        }
        Ok(termination)
    }

    // ------------------------------------------------------------------
    // decorations and preamble
    // ------------------------------------------------------------------

    fn emit_decorations(&mut self, _module: &Module) -> Result<(), Error> {
        let strides = std::mem::take(&mut self.needs_array_stride);
        for (type_id, stride) in strides {
            self.logical_layout
                .annotations
                .push(instructions::instruction_decorate(
                    type_id,
                    spirv::Decoration::ArrayStride,
                    &[stride],
                ));
        }
        // Tie each local-argument length to its caller-assigned spec id.
        let mut locals: Vec<_> = self
            .local_args
            .iter()
            .map(|(&key, &info)| (key, info))
            .collect();
        locals.sort_unstable_by_key(|&(key, _)| key);
        for (_, info) in locals {
            self.logical_layout
                .annotations
                .push(instructions::instruction_decorate(
                    info.spec_constant_id,
                    spirv::Decoration::SpecId,
                    &[info.spec_id],
                ));
        }
        if let Some(spec_ids) = self.work_group_size_spec_ids {
            for (dimension, &constant_id) in spec_ids.iter().enumerate() {
                self.logical_layout
                    .annotations
                    .push(instructions::instruction_decorate(
                        constant_id,
                        spirv::Decoration::SpecId,
                        &[dimension as u32],
                    ));
            }
        }
        Ok(())
    }

    fn write_preamble(&mut self, module: &Module) -> Result<(), Error> {
        let mut capabilities = vec![spirv::Capability::Shader];
        for &capability in [
            spirv::Capability::Int16,
            spirv::Capability::Int64,
            spirv::Capability::Float16,
            spirv::Capability::Float64,
            spirv::Capability::StorageImageWriteWithoutFormat,
        ]
        .iter()
        {
            if self.capabilities.contains(&capability) {
                capabilities.push(capability);
            }
        }
        if self.uses_image_query {
            capabilities.push(spirv::Capability::ImageQuery);
        }
        capabilities.push(spirv::Capability::VariablePointers);
        for capability in capabilities {
            self.logical_layout
                .capabilities
                .push(instructions::instruction_capability(capability));
        }

        self.logical_layout
            .extensions
            .push(instructions::instruction_extension(
                "SPV_KHR_storage_buffer_storage_class",
            ));
        self.logical_layout
            .extensions
            .push(instructions::instruction_extension(
                "SPV_KHR_variable_pointers",
            ));
        if self.gl450_ext_inst_id != 0 {
            self.logical_layout
                .ext_inst_imports
                .push(instructions::instruction_ext_inst_import(
                    self.gl450_ext_inst_id,
                    EXT_INST_SET,
                ));
        }
        self.logical_layout
            .memory_model
            .push(instructions::instruction_memory_model(
                spirv::AddressingModel::Logical,
                spirv::MemoryModel::GLSL450,
            ));

        for (handle, fun) in module.functions.iter() {
            let kernel = match fun.kernel {
                Some(ref kernel) => kernel,
                None => continue,
            };
            let function_id = self.lookup_function[&handle];
            // Kernel resources are all descriptor-bound; the interface list
            // carries only Input-class globals, of which there are none.
            self.logical_layout
                .entry_points
                .push(instructions::instruction_entry_point(
                    spirv::ExecutionModel::GLCompute,
                    function_id,
                    &fun.name,
                    &[],
                ));
            if let Some([x, y, z]) = kernel.work_group_size {
                self.logical_layout
                    .execution_modes
                    .push(instructions::instruction_execution_mode(
                        function_id,
                        spirv::ExecutionMode::LocalSize,
                        &[x, y, z],
                    ));
            }
        }
        self.logical_layout
            .debugs
            .push(instructions::instruction_source(
                spirv::SourceLanguage::OpenCL_C,
                120,
            ));
        Ok(())
    }
}
