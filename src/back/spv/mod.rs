/*! OpenCL compute-kernel to Vulkan SPIR-V backend
!*/

mod helpers;
mod instructions;
mod layout;
mod resources;
#[cfg(test)]
mod test_framework;
mod text;
mod writer;

pub use resources::{ArgKind, DescriptorMap, DescriptorMapEntry, SamplerMapEntry};
pub use spirv::Capability;

use crate::{
    arena::Handle, proc::ResolveError, Bytes, ImageAccess, ImageDimension, ScalarKind, VectorSize,
};

use instructions::Instruction;
use spirv::Word;
use std::ops;
use thiserror::Error;

/// The generator word this tool writes into the module header.
const GENERATOR: Word = 0x3 << 16;

struct PhysicalLayout {
    magic_number: Word,
    version: Word,
    generator: Word,
    bound: Word,
    instruction_schema: Word,
}

impl PhysicalLayout {
    fn new(major: u8, minor: u8) -> Self {
        PhysicalLayout {
            magic_number: spirv::MAGIC_NUMBER,
            version: (major as Word) << 16 | (minor as Word) << 8,
            generator: GENERATOR,
            bound: 0,
            instruction_schema: 0,
        }
    }

    fn in_words(&self, sink: &mut Vec<Word>) {
        sink.push(self.magic_number);
        sink.push(self.version);
        sink.push(self.generator);
        sink.push(self.bound);
        sink.push(self.instruction_schema);
    }
}

/// The logical sections of a module, in the order SPIR-V requires them to
/// be serialized.
#[derive(Default)]
struct LogicalLayout {
    capabilities: Vec<Instruction>,
    extensions: Vec<Instruction>,
    ext_inst_imports: Vec<Instruction>,
    memory_model: Vec<Instruction>,
    entry_points: Vec<Instruction>,
    execution_modes: Vec<Instruction>,
    debugs: Vec<Instruction>,
    annotations: Vec<Instruction>,
    declarations: Vec<Instruction>,
    function_definitions: Vec<Instruction>,
}

impl LogicalLayout {
    fn iter(&self) -> impl Iterator<Item = &Instruction> {
        self.capabilities
            .iter()
            .chain(self.extensions.iter())
            .chain(self.ext_inst_imports.iter())
            .chain(self.memory_model.iter())
            .chain(self.entry_points.iter())
            .chain(self.execution_modes.iter())
            .chain(self.debugs.iter())
            .chain(self.annotations.iter())
            .chain(self.declarations.iter())
            .chain(self.function_definitions.iter())
    }
}

#[derive(Default)]
struct IdGenerator(Word);

impl IdGenerator {
    fn next(&mut self) -> Word {
        self.0 += 1;
        self.0
    }
}

/// A lowered basic block: a label, a body, and the terminating run of
/// instructions (merge plus branch) supplied by the deferred-fixup phase.
struct Block {
    label_id: Word,
    body: Vec<Instruction>,
    termination: Vec<Instruction>,
}

impl Block {
    fn new(label_id: Word) -> Self {
        Block {
            label_id,
            body: Vec::new(),
            termination: Vec::new(),
        }
    }
}

/// A lowered function, kept in instruction form until the deferred-fixup
/// phase has patched every forward reference.
struct Function {
    signature: Option<Instruction>,
    parameters: Vec<Instruction>,
    /// Stack allocations; serialized at the top of the entry block.
    variables: Vec<Instruction>,
    blocks: Vec<Block>,
}

impl Function {
    fn new() -> Self {
        Function {
            signature: None,
            parameters: Vec::new(),
            variables: Vec::new(),
            blocks: Vec::new(),
        }
    }

    /// The function as a flat instruction stream, for the serializers.
    fn collect(&self, sink: &mut Vec<Instruction>) {
        sink.push(self.signature.clone().unwrap());
        sink.extend(self.parameters.iter().cloned());
        for (index, block) in self.blocks.iter().enumerate() {
            sink.push(instructions::instruction_label(block.label_id));
            if index == 0 {
                sink.extend(self.variables.iter().cloned());
            }
            sink.extend(block.body.iter().cloned());
            sink.extend(block.termination.iter().cloned());
        }
        sink.push(instructions::instruction_function_end());
    }
}

/// A SPIR-V type constructed during code generation.
///
/// The IR module's type arena does not contain the synthetic types the
/// backend needs (wrapper structs, runtime arrays, pointers into them), and
/// the aliasing rules collapse several IR types into one SPIR-V type, so the
/// interning tables are keyed by this canonical descriptor instead of by
/// `Handle<Type>` alone. Converting an IR type into a `LocalType` applies
/// the aliasing: 8-bit integers become 32-bit unsigned ones, `<4 x i8>`
/// becomes `i32`, and `constant`/`global` pointers collapse to the same
/// storage class.
#[derive(Debug, PartialEq, Hash, Eq, Copy, Clone)]
enum LocalType {
    Void,
    Bool,
    /// A scalar or vector.
    Value {
        /// If `None`, this represents a scalar type. If `Some`, this
        /// represents a vector type of the given size.
        vector_size: Option<VectorSize>,
        kind: ScalarKind,
        width: Bytes,
    },
    /// Pointer to an arena-tracked type.
    Pointer {
        base: Handle<crate::Type>,
        class: spirv::StorageClass,
    },
    /// Pointer to a scalar or vector.
    ValuePointer {
        vector_size: Option<VectorSize>,
        kind: ScalarKind,
        width: Bytes,
        class: spirv::StorageClass,
    },
    Image {
        dim: ImageDimension,
        access: ImageAccess,
    },
    ImagePointer {
        dim: ImageDimension,
        access: ImageAccess,
    },
    Sampler,
    SamplerPointer,
    SampledImage {
        dim: ImageDimension,
    },
    /// Unsized array backing a kernel buffer argument.
    RuntimeArray {
        base: Handle<crate::Type>,
    },
    /// Shader-interface block wrapping a runtime array.
    BufferWrapper {
        base: Handle<crate::Type>,
    },
    /// Shader-interface block wrapping a by-value argument.
    PodWrapper {
        base: Handle<crate::Type>,
    },
    BufferWrapperPointer {
        base: Handle<crate::Type>,
        class: spirv::StorageClass,
    },
    PodWrapperPointer {
        base: Handle<crate::Type>,
        class: spirv::StorageClass,
    },
    /// Workgroup array backing a pointer-to-local argument, sized by the
    /// specialization constant with the given id.
    LocalArray {
        base: Handle<crate::Type>,
        spec_id: u32,
    },
    LocalArrayPointer {
        base: Handle<crate::Type>,
        spec_id: u32,
    },
}

#[derive(Debug, PartialEq, Hash, Eq, Copy, Clone)]
enum LookupType {
    Handle(Handle<crate::Type>),
    Local(LocalType),
}

impl From<LocalType> for LookupType {
    fn from(local: LocalType) -> Self {
        Self::Local(local)
    }
}

#[derive(Debug, PartialEq, Clone, Hash, Eq)]
struct LookupFunctionType {
    parameter_type_ids: Vec<Word>,
    return_type_id: Word,
}

/// Canonical descriptor of a constant, the unit of constant deduplication.
///
/// `<4 x i8>` constants fold to a single 32-bit integer here, so they share
/// ids with equal plain integers.
#[derive(Debug, PartialEq, Clone, Hash, Eq)]
enum ConstantKey {
    Bool(bool),
    Uint {
        value: u64,
        width: Bytes,
    },
    Float {
        bits: u64,
        width: Bytes,
    },
    Null(LookupType),
    Undef(LookupType),
    Composite {
        ty: LookupType,
        components: Vec<ConstantKey>,
    },
}

/// Value-to-id cache of one lowered function.
#[derive(Default)]
struct CachedValues {
    ids: Vec<Word>,
}

impl CachedValues {
    fn reset(&mut self, length: usize) {
        self.ids.clear();
        self.ids.resize(length, 0);
    }
}

impl ops::Index<Handle<crate::Value>> for CachedValues {
    type Output = Word;
    fn index(&self, handle: Handle<crate::Value>) -> &Word {
        let id = &self.ids[handle.index()];
        if *id == 0 {
            unreachable!("Value {:?} is not cached!", handle);
        }
        id
    }
}

impl ops::IndexMut<Handle<crate::Value>> for CachedValues {
    fn index_mut(&mut self, handle: Handle<crate::Value>) -> &mut Word {
        let id = &mut self.ids[handle.index()];
        if *id != 0 {
            unreachable!("Value {:?} is already cached!", handle);
        }
        id
    }
}

/// Per-function lowering state kept alive for the deferred-fixup phase.
#[derive(Default)]
struct FunctionInfo {
    values: CachedValues,
    /// Label id of every basic block.
    labels: Vec<Word>,
    /// Resolved id of every formal argument.
    argument_ids: Vec<Word>,
}

/// Work item recorded while lowering a function body, resolved once every
/// label and function id exists. Items are drained in reverse insertion
/// order so recorded body positions stay valid while inserting.
enum DeferredItem {
    /// The block's branch, together with its structured merge instruction.
    Terminator {
        fun: usize,
        block: usize,
    },
    Phi {
        fun: usize,
        block: usize,
        at: usize,
        value: Handle<crate::Value>,
        id: Word,
    },
    /// A call: either `OpFunctionCall` or an extended instruction with an
    /// optional follow-up operation owning `post_id`.
    Call {
        fun: usize,
        block: usize,
        at: usize,
        value: Handle<crate::Value>,
        id: Word,
        post_id: Option<Word>,
    },
}

/// Descriptor address and synthesized variable of one bound kernel argument.
#[derive(Clone, Copy, Debug)]
struct ArgBinding {
    kind: ArgKind,
    descriptor_set: u32,
    binding: u32,
}

/// Backing storage for a pointer-to-local argument.
#[derive(Clone, Copy, Debug)]
struct LocalArgInfo {
    /// The caller-assigned specialization-constant id.
    spec_id: u32,
    /// Result id of the `OpSpecConstant` holding the element count.
    spec_constant_id: Word,
    /// The Workgroup-class array variable.
    variable_id: Word,
    elem_type: Handle<crate::Type>,
}

#[derive(Clone, Debug, Error)]
pub enum Error {
    #[error("target SPIRV-{0}.{1} is not supported")]
    UnsupportedVersion(u8, u8),
    #[error("unsupported IR construct: {0}")]
    Unsupported(&'static str),
    #[error("loop with header block {0} has {1} exit blocks")]
    MultipleLoopExits(crate::BlockIndex, usize),
    #[error("no continue target candidate in loop with header block {0}")]
    NoContinueTarget(crate::BlockIndex),
    #[error("kernels disagree on reqd_work_group_size")]
    WorkGroupSizeMismatch,
    #[error("module constant data spans {0} bytes, above the 65536 byte storage buffer limit")]
    ConstantBufferTooLarge(u32),
    #[error("literal sampler {0:#010x} is missing from the sampler map")]
    MissingSamplerMapEntry(u32),
    #[error("unknown builtin function '{0}'")]
    UnknownBuiltin(String),
    #[error("module is not valid: {0}")]
    Validation(&'static str),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
}

bitflags::bitflags! {
    pub struct WriterFlags: u32 {
        /// Emit `constant` address-space data as a descriptor-bound storage
        /// buffer instead of inlining it into private memory.
        const CONSTANTS_IN_STORAGE_BUFFER = 0x1;
        /// Bind by-value kernel arguments as uniform buffers.
        const POD_UNIFORM_BUFFER = 0x2;
        /// Give every kernel its own descriptor set.
        const DISTINCT_DESCRIPTOR_SETS = 0x4;
        /// Rewrite undefined numeric constants as zero. Works around
        /// drivers that reject `OpUndef` in constant expressions.
        const HACK_UNDEF = 0x8;
        /// Store the workgroup-size constant into its private variable at
        /// each kernel entry. Works around drivers that ignore variable
        /// initializers.
        const HACK_INITIALIZERS = 0x10;
        /// Trace id assignment through `log`.
        const SHOW_IDS = 0x20;
    }
}

#[derive(Debug, Clone)]
pub struct Options {
    /// (Major, Minor) target version of the SPIR-V.
    pub lang_version: (u8, u8),
    /// Configuration flags for the writer.
    pub flags: WriterFlags,
    /// Literal samplers available to `__translate_sampler_initializer`.
    pub sampler_map: Vec<SamplerMapEntry>,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            lang_version: (1, 0),
            flags: WriterFlags::empty(),
            sampler_map: Vec::new(),
        }
    }
}

pub struct Writer {
    physical_layout: PhysicalLayout,
    logical_layout: LogicalLayout,
    id_gen: IdGenerator,
    capabilities: crate::FastHashSet<Capability>,
    flags: WriterFlags,
    sampler_map: Vec<SamplerMapEntry>,

    lookup_type: crate::FastHashMap<LookupType, Word>,
    /// Types in discovery order; emission assigns ids in this order.
    type_order: Vec<LookupType>,
    /// Sampled-image types, emitted after the regular types.
    sampled_image_order: Vec<LocalType>,
    lookup_function: crate::FastHashMap<Handle<crate::Function>, Word>,
    lookup_function_type: crate::FastHashMap<LookupFunctionType, Word>,
    /// Constants in discovery order.
    constant_order: Vec<ConstantKey>,
    known_constants: crate::FastHashSet<ConstantKey>,
    cached_constants: crate::FastHashMap<ConstantKey, Word>,

    /// (kernel ordinal, argument ordinal) to its binding record.
    argument_bindings: crate::FastHashMap<(usize, u32), ArgBinding>,
    /// Module-scope variables shared between kernels with equal bindings.
    variable_reuse: crate::FastHashMap<(u32, u32, LookupType), Word>,
    /// Resolved variable id per (function ordinal, argument ordinal).
    argument_variables: crate::FastHashMap<(usize, u32), Word>,
    local_args: crate::FastHashMap<(usize, u32), LocalArgInfo>,
    /// `OpSpecConstant` id per local-argument spec id.
    local_spec_constants: crate::FastHashMap<u32, Word>,
    sampler_variables: Vec<Word>,
    /// Ids of the IR module's own global variables, by arena index.
    global_variable_ids: Vec<Word>,

    /// Type ids that still need an `ArrayStride` decoration, with their
    /// element strides.
    needs_array_stride: Vec<(Word, u32)>,
    strided_ids: crate::FastHashSet<Word>,
    /// Non-kernel functions whose tracked pointer parameter moves to the
    /// private address space, by parameter index. Only the last recorded
    /// index per function survives.
    constant_func_types: crate::FastHashMap<Handle<crate::Function>, u32>,

    /// Common `reqd_work_group_size` of the module's kernels.
    work_group_size: Option<[u32; 3]>,
    uses_work_group_size: bool,
    work_group_size_value_id: Word,
    work_group_size_var_id: Word,
    work_group_size_spec_ids: Option<[Word; 3]>,

    gl450_ext_inst_id: Word,
    uses_image_query: bool,

    deferred: Vec<DeferredItem>,
    functions: Vec<Function>,
    function_infos: Vec<FunctionInfo>,
    flows: Vec<crate::proc::FlowInfo>,
    descriptor_map: DescriptorMap,
}

pub fn write_vec(
    module: &crate::Module,
    options: &Options,
) -> Result<(Vec<u32>, DescriptorMap), Error> {
    let mut w = Writer::new(options)?;
    w.write(module)?;
    let mut words = Vec::new();
    w.serialize(&mut words);
    Ok((words, w.take_descriptor_map()))
}

pub fn write_assembly(
    module: &crate::Module,
    options: &Options,
) -> Result<(String, DescriptorMap), Error> {
    let mut w = Writer::new(options)?;
    w.write(module)?;
    let text = text::disassemble(&w.physical_layout, &w.logical_layout, w.id_gen.0 + 1);
    Ok((text, w.take_descriptor_map()))
}

/// Like [`write_vec`], but renders the binary as a C initializer list.
pub fn write_c_initializer(
    module: &crate::Module,
    options: &Options,
) -> Result<(String, DescriptorMap), Error> {
    let (words, map) = write_vec(module, options)?;
    Ok((text::c_initializer(&words), map))
}
