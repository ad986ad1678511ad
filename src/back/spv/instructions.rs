use crate::back::spv::helpers;
use spirv::{Op, Word};

/// A single instruction operand.
///
/// Binary serialization only needs the raw words, but the assembly emitter
/// wants to print enums symbolically and literals as literals, so the
/// distinction is kept until the module is streamed out.
#[derive(Clone, Debug)]
pub(super) enum Operand {
    IdRef(Word),
    LiteralInt32(u32),
    LiteralInt64(u64),
    LiteralFloat32(f32),
    LiteralString(String),
    StorageClass(spirv::StorageClass),
    Decoration(spirv::Decoration),
    BuiltIn(spirv::BuiltIn),
    Capability(spirv::Capability),
    ExecutionModel(spirv::ExecutionModel),
    ExecutionMode(spirv::ExecutionMode),
    AddressingModel(spirv::AddressingModel),
    MemoryModel(spirv::MemoryModel),
    SourceLanguage(spirv::SourceLanguage),
    Dim(spirv::Dim),
    ImageFormat(spirv::ImageFormat),
}

impl Operand {
    pub(super) fn word_count(&self) -> u32 {
        match *self {
            Operand::LiteralInt64(_) => 2,
            Operand::LiteralString(ref value) => helpers::string_word_count(value),
            _ => 1,
        }
    }

    pub(super) fn to_words(&self, sink: &mut Vec<Word>) {
        match *self {
            Operand::IdRef(id) => sink.push(id),
            Operand::LiteralInt32(value) => sink.push(value),
            Operand::LiteralInt64(value) => {
                sink.push(value as u32);
                sink.push((value >> 32) as u32);
            }
            Operand::LiteralFloat32(value) => sink.push(value.to_bits()),
            Operand::LiteralString(ref value) => sink.extend(helpers::string_to_words(value)),
            Operand::StorageClass(value) => sink.push(value as u32),
            Operand::Decoration(value) => sink.push(value as u32),
            Operand::BuiltIn(value) => sink.push(value as u32),
            Operand::Capability(value) => sink.push(value as u32),
            Operand::ExecutionModel(value) => sink.push(value as u32),
            Operand::ExecutionMode(value) => sink.push(value as u32),
            Operand::AddressingModel(value) => sink.push(value as u32),
            Operand::MemoryModel(value) => sink.push(value as u32),
            Operand::SourceLanguage(value) => sink.push(value as u32),
            Operand::Dim(value) => sink.push(value as u32),
            Operand::ImageFormat(value) => sink.push(value as u32),
        }
    }
}

/// A not-yet-serialized SPIR-V instruction.
#[derive(Clone, Debug)]
pub(super) struct Instruction {
    pub op: Op,
    pub type_id: Option<Word>,
    pub result_id: Option<Word>,
    pub operands: Vec<Operand>,
}

impl Instruction {
    pub(super) fn new(op: Op) -> Self {
        Instruction {
            op,
            type_id: None,
            result_id: None,
            operands: Vec::new(),
        }
    }

    pub(super) fn set_type(&mut self, id: Word) {
        assert!(self.type_id.is_none(), "duplicated type id");
        self.type_id = Some(id);
    }

    pub(super) fn set_result(&mut self, id: Word) {
        assert!(self.result_id.is_none(), "duplicated result id");
        self.result_id = Some(id);
    }

    pub(super) fn add_operand(&mut self, operand: Operand) {
        self.operands.push(operand);
    }

    pub(super) fn add_id(&mut self, id: Word) {
        self.operands.push(Operand::IdRef(id));
    }

    pub(super) fn add_ids(&mut self, ids: &[Word]) {
        for &id in ids {
            self.add_id(id);
        }
    }

    pub(super) fn add_literal(&mut self, value: u32) {
        self.operands.push(Operand::LiteralInt32(value));
    }

    pub(super) fn add_string(&mut self, value: &str) {
        self.operands.push(Operand::LiteralString(value.to_string()));
    }

    /// Total word count of the instruction, the opcode word included.
    pub(super) fn word_count(&self) -> u32 {
        1 + self.type_id.is_some() as u32
            + self.result_id.is_some() as u32
            + self
                .operands
                .iter()
                .map(|operand| operand.word_count())
                .sum::<u32>()
    }

    pub(super) fn to_words(&self, sink: &mut Vec<Word>) {
        sink.push(self.word_count() << 16 | self.op as u32);
        sink.extend(self.type_id);
        sink.extend(self.result_id);
        for operand in self.operands.iter() {
            operand.to_words(sink);
        }
    }
}

//
// Debug Instructions
//

pub(super) fn instruction_source(
    source_language: spirv::SourceLanguage,
    version: u32,
) -> Instruction {
    let mut instruction = Instruction::new(Op::Source);
    instruction.add_operand(Operand::SourceLanguage(source_language));
    instruction.add_literal(version);
    instruction
}

//
// Annotation Instructions
//

pub(super) fn instruction_decorate(
    target_id: Word,
    decoration: spirv::Decoration,
    operands: &[u32],
) -> Instruction {
    let mut instruction = Instruction::new(Op::Decorate);
    instruction.add_id(target_id);
    instruction.add_operand(Operand::Decoration(decoration));
    for &operand in operands {
        instruction.add_literal(operand);
    }
    instruction
}

pub(super) fn instruction_member_decorate(
    struct_type_id: Word,
    member: u32,
    decoration: spirv::Decoration,
    operands: &[u32],
) -> Instruction {
    let mut instruction = Instruction::new(Op::MemberDecorate);
    instruction.add_id(struct_type_id);
    instruction.add_literal(member);
    instruction.add_operand(Operand::Decoration(decoration));
    for &operand in operands {
        instruction.add_literal(operand);
    }
    instruction
}

pub(super) fn instruction_decorate_builtin(
    target_id: Word,
    built_in: spirv::BuiltIn,
) -> Instruction {
    let mut instruction = Instruction::new(Op::Decorate);
    instruction.add_id(target_id);
    instruction.add_operand(Operand::Decoration(spirv::Decoration::BuiltIn));
    instruction.add_operand(Operand::BuiltIn(built_in));
    instruction
}

//
// Extension Instructions
//

pub(super) fn instruction_extension(name: &str) -> Instruction {
    let mut instruction = Instruction::new(Op::Extension);
    instruction.add_string(name);
    instruction
}

pub(super) fn instruction_ext_inst_import(id: Word, name: &str) -> Instruction {
    let mut instruction = Instruction::new(Op::ExtInstImport);
    instruction.set_result(id);
    instruction.add_string(name);
    instruction
}

pub(super) fn instruction_ext_inst(
    result_type_id: Word,
    id: Word,
    set_id: Word,
    ext_op: spirv::GLOp,
    operand_ids: &[Word],
) -> Instruction {
    let mut instruction = Instruction::new(Op::ExtInst);
    instruction.set_type(result_type_id);
    instruction.set_result(id);
    instruction.add_id(set_id);
    instruction.add_literal(ext_op as u32);
    instruction.add_ids(operand_ids);
    instruction
}

//
// Mode-Setting Instructions
//

pub(super) fn instruction_memory_model(
    addressing_model: spirv::AddressingModel,
    memory_model: spirv::MemoryModel,
) -> Instruction {
    let mut instruction = Instruction::new(Op::MemoryModel);
    instruction.add_operand(Operand::AddressingModel(addressing_model));
    instruction.add_operand(Operand::MemoryModel(memory_model));
    instruction
}

pub(super) fn instruction_entry_point(
    execution_model: spirv::ExecutionModel,
    entry_point_id: Word,
    name: &str,
    interface_ids: &[Word],
) -> Instruction {
    let mut instruction = Instruction::new(Op::EntryPoint);
    instruction.add_operand(Operand::ExecutionModel(execution_model));
    instruction.add_id(entry_point_id);
    instruction.add_string(name);
    instruction.add_ids(interface_ids);
    instruction
}

pub(super) fn instruction_execution_mode(
    entry_point_id: Word,
    execution_mode: spirv::ExecutionMode,
    args: &[u32],
) -> Instruction {
    let mut instruction = Instruction::new(Op::ExecutionMode);
    instruction.add_id(entry_point_id);
    instruction.add_operand(Operand::ExecutionMode(execution_mode));
    for &arg in args {
        instruction.add_literal(arg);
    }
    instruction
}

pub(super) fn instruction_capability(capability: spirv::Capability) -> Instruction {
    let mut instruction = Instruction::new(Op::Capability);
    instruction.add_operand(Operand::Capability(capability));
    instruction
}

//
// Type-Declaration Instructions
//

pub(super) fn instruction_type_void(id: Word) -> Instruction {
    let mut instruction = Instruction::new(Op::TypeVoid);
    instruction.set_result(id);
    instruction
}

pub(super) fn instruction_type_bool(id: Word) -> Instruction {
    let mut instruction = Instruction::new(Op::TypeBool);
    instruction.set_result(id);
    instruction
}

pub(super) fn instruction_type_int(id: Word, width: Word, signedness: Word) -> Instruction {
    let mut instruction = Instruction::new(Op::TypeInt);
    instruction.set_result(id);
    instruction.add_literal(width);
    instruction.add_literal(signedness);
    instruction
}

pub(super) fn instruction_type_float(id: Word, width: Word) -> Instruction {
    let mut instruction = Instruction::new(Op::TypeFloat);
    instruction.set_result(id);
    instruction.add_literal(width);
    instruction
}

pub(super) fn instruction_type_vector(
    id: Word,
    component_type_id: Word,
    component_count: u32,
) -> Instruction {
    let mut instruction = Instruction::new(Op::TypeVector);
    instruction.set_result(id);
    instruction.add_id(component_type_id);
    instruction.add_literal(component_count);
    instruction
}

pub(super) fn instruction_type_image(
    id: Word,
    sampled_type_id: Word,
    dim: spirv::Dim,
    sampled: u32,
) -> Instruction {
    let mut instruction = Instruction::new(Op::TypeImage);
    instruction.set_result(id);
    instruction.add_id(sampled_type_id);
    instruction.add_operand(Operand::Dim(dim));
    // depth, arrayed, multisampled
    instruction.add_literal(0);
    instruction.add_literal(0);
    instruction.add_literal(0);
    instruction.add_literal(sampled);
    instruction.add_operand(Operand::ImageFormat(spirv::ImageFormat::Unknown));
    instruction
}

pub(super) fn instruction_type_sampler(id: Word) -> Instruction {
    let mut instruction = Instruction::new(Op::TypeSampler);
    instruction.set_result(id);
    instruction
}

pub(super) fn instruction_type_sampled_image(id: Word, image_type_id: Word) -> Instruction {
    let mut instruction = Instruction::new(Op::TypeSampledImage);
    instruction.set_result(id);
    instruction.add_id(image_type_id);
    instruction
}

pub(super) fn instruction_type_array(
    id: Word,
    element_type_id: Word,
    length_id: Word,
) -> Instruction {
    let mut instruction = Instruction::new(Op::TypeArray);
    instruction.set_result(id);
    instruction.add_id(element_type_id);
    instruction.add_id(length_id);
    instruction
}

pub(super) fn instruction_type_runtime_array(id: Word, element_type_id: Word) -> Instruction {
    let mut instruction = Instruction::new(Op::TypeRuntimeArray);
    instruction.set_result(id);
    instruction.add_id(element_type_id);
    instruction
}

pub(super) fn instruction_type_struct(id: Word, member_ids: &[Word]) -> Instruction {
    let mut instruction = Instruction::new(Op::TypeStruct);
    instruction.set_result(id);
    instruction.add_ids(member_ids);
    instruction
}

pub(super) fn instruction_type_pointer(
    id: Word,
    storage_class: spirv::StorageClass,
    type_id: Word,
) -> Instruction {
    let mut instruction = Instruction::new(Op::TypePointer);
    instruction.set_result(id);
    instruction.add_operand(Operand::StorageClass(storage_class));
    instruction.add_id(type_id);
    instruction
}

pub(super) fn instruction_type_function(
    id: Word,
    return_type_id: Word,
    parameter_ids: &[Word],
) -> Instruction {
    let mut instruction = Instruction::new(Op::TypeFunction);
    instruction.set_result(id);
    instruction.add_id(return_type_id);
    instruction.add_ids(parameter_ids);
    instruction
}

//
// Constant-Creation Instructions
//

pub(super) fn instruction_constant_true(result_type_id: Word, id: Word) -> Instruction {
    let mut instruction = Instruction::new(Op::ConstantTrue);
    instruction.set_type(result_type_id);
    instruction.set_result(id);
    instruction
}

pub(super) fn instruction_constant_false(result_type_id: Word, id: Word) -> Instruction {
    let mut instruction = Instruction::new(Op::ConstantFalse);
    instruction.set_type(result_type_id);
    instruction.set_result(id);
    instruction
}

pub(super) fn instruction_constant_32bit(result_type_id: Word, id: Word, value: u32) -> Instruction {
    let mut instruction = Instruction::new(Op::Constant);
    instruction.set_type(result_type_id);
    instruction.set_result(id);
    instruction.add_literal(value);
    instruction
}

pub(super) fn instruction_constant_64bit(result_type_id: Word, id: Word, value: u64) -> Instruction {
    let mut instruction = Instruction::new(Op::Constant);
    instruction.set_type(result_type_id);
    instruction.set_result(id);
    instruction.add_operand(Operand::LiteralInt64(value));
    instruction
}

pub(super) fn instruction_constant_float(result_type_id: Word, id: Word, value: f32) -> Instruction {
    let mut instruction = Instruction::new(Op::Constant);
    instruction.set_type(result_type_id);
    instruction.set_result(id);
    instruction.add_operand(Operand::LiteralFloat32(value));
    instruction
}

pub(super) fn instruction_constant_composite(
    result_type_id: Word,
    id: Word,
    constituent_ids: &[Word],
) -> Instruction {
    let mut instruction = Instruction::new(Op::ConstantComposite);
    instruction.set_type(result_type_id);
    instruction.set_result(id);
    instruction.add_ids(constituent_ids);
    instruction
}

pub(super) fn instruction_constant_null(result_type_id: Word, id: Word) -> Instruction {
    let mut instruction = Instruction::new(Op::ConstantNull);
    instruction.set_type(result_type_id);
    instruction.set_result(id);
    instruction
}

pub(super) fn instruction_undef(result_type_id: Word, id: Word) -> Instruction {
    let mut instruction = Instruction::new(Op::Undef);
    instruction.set_type(result_type_id);
    instruction.set_result(id);
    instruction
}

pub(super) fn instruction_spec_constant(result_type_id: Word, id: Word, value: u32) -> Instruction {
    let mut instruction = Instruction::new(Op::SpecConstant);
    instruction.set_type(result_type_id);
    instruction.set_result(id);
    instruction.add_literal(value);
    instruction
}

pub(super) fn instruction_spec_constant_composite(
    result_type_id: Word,
    id: Word,
    constituent_ids: &[Word],
) -> Instruction {
    let mut instruction = Instruction::new(Op::SpecConstantComposite);
    instruction.set_type(result_type_id);
    instruction.set_result(id);
    instruction.add_ids(constituent_ids);
    instruction
}

//
// Memory Instructions
//

pub(super) fn instruction_variable(
    result_type_id: Word,
    id: Word,
    storage_class: spirv::StorageClass,
    initializer_id: Option<Word>,
) -> Instruction {
    let mut instruction = Instruction::new(Op::Variable);
    instruction.set_type(result_type_id);
    instruction.set_result(id);
    instruction.add_operand(Operand::StorageClass(storage_class));
    if let Some(initializer_id) = initializer_id {
        instruction.add_id(initializer_id);
    }
    instruction
}

pub(super) fn instruction_load(result_type_id: Word, id: Word, pointer_id: Word) -> Instruction {
    let mut instruction = Instruction::new(Op::Load);
    instruction.set_type(result_type_id);
    instruction.set_result(id);
    instruction.add_id(pointer_id);
    instruction
}

pub(super) fn instruction_store(pointer_id: Word, object_id: Word) -> Instruction {
    let mut instruction = Instruction::new(Op::Store);
    instruction.add_id(pointer_id);
    instruction.add_id(object_id);
    instruction
}

pub(super) fn instruction_access_chain(
    result_type_id: Word,
    id: Word,
    base_id: Word,
    index_ids: &[Word],
) -> Instruction {
    let mut instruction = Instruction::new(Op::AccessChain);
    instruction.set_type(result_type_id);
    instruction.set_result(id);
    instruction.add_id(base_id);
    instruction.add_ids(index_ids);
    instruction
}

pub(super) fn instruction_ptr_access_chain(
    result_type_id: Word,
    id: Word,
    base_id: Word,
    element_id: Word,
    index_ids: &[Word],
) -> Instruction {
    let mut instruction = Instruction::new(Op::PtrAccessChain);
    instruction.set_type(result_type_id);
    instruction.set_result(id);
    instruction.add_id(base_id);
    instruction.add_id(element_id);
    instruction.add_ids(index_ids);
    instruction
}

//
// Function Instructions
//

pub(super) fn instruction_function(
    return_type_id: Word,
    id: Word,
    function_control: spirv::FunctionControl,
    function_type_id: Word,
) -> Instruction {
    let mut instruction = Instruction::new(Op::Function);
    instruction.set_type(return_type_id);
    instruction.set_result(id);
    instruction.add_literal(function_control.bits());
    instruction.add_id(function_type_id);
    instruction
}

pub(super) fn instruction_function_parameter(result_type_id: Word, id: Word) -> Instruction {
    let mut instruction = Instruction::new(Op::FunctionParameter);
    instruction.set_type(result_type_id);
    instruction.set_result(id);
    instruction
}

pub(super) fn instruction_function_end() -> Instruction {
    Instruction::new(Op::FunctionEnd)
}

pub(super) fn instruction_function_call(
    result_type_id: Word,
    id: Word,
    function_id: Word,
    argument_ids: &[Word],
) -> Instruction {
    let mut instruction = Instruction::new(Op::FunctionCall);
    instruction.set_type(result_type_id);
    instruction.set_result(id);
    instruction.add_id(function_id);
    instruction.add_ids(argument_ids);
    instruction
}

//
// Image Instructions
//

pub(super) fn instruction_sampled_image(
    result_type_id: Word,
    id: Word,
    image_id: Word,
    sampler_id: Word,
) -> Instruction {
    let mut instruction = Instruction::new(Op::SampledImage);
    instruction.set_type(result_type_id);
    instruction.set_result(id);
    instruction.add_id(image_id);
    instruction.add_id(sampler_id);
    instruction
}

pub(super) fn instruction_image_sample_explicit_lod(
    result_type_id: Word,
    id: Word,
    sampled_image_id: Word,
    coordinate_id: Word,
    lod_id: Word,
) -> Instruction {
    let mut instruction = Instruction::new(Op::ImageSampleExplicitLod);
    instruction.set_type(result_type_id);
    instruction.set_result(id);
    instruction.add_id(sampled_image_id);
    instruction.add_id(coordinate_id);
    instruction.add_literal(spirv::ImageOperands::LOD.bits());
    instruction.add_id(lod_id);
    instruction
}

pub(super) fn instruction_image_write(
    image_id: Word,
    coordinate_id: Word,
    texel_id: Word,
) -> Instruction {
    let mut instruction = Instruction::new(Op::ImageWrite);
    instruction.add_id(image_id);
    instruction.add_id(coordinate_id);
    instruction.add_id(texel_id);
    instruction
}

pub(super) fn instruction_image_query_size(
    result_type_id: Word,
    id: Word,
    image_id: Word,
) -> Instruction {
    let mut instruction = Instruction::new(Op::ImageQuerySize);
    instruction.set_type(result_type_id);
    instruction.set_result(id);
    instruction.add_id(image_id);
    instruction
}

//
// Composite Instructions
//

pub(super) fn instruction_composite_construct(
    result_type_id: Word,
    id: Word,
    constituent_ids: &[Word],
) -> Instruction {
    let mut instruction = Instruction::new(Op::CompositeConstruct);
    instruction.set_type(result_type_id);
    instruction.set_result(id);
    instruction.add_ids(constituent_ids);
    instruction
}

pub(super) fn instruction_composite_extract(
    result_type_id: Word,
    id: Word,
    composite_id: Word,
    indices: &[u32],
) -> Instruction {
    let mut instruction = Instruction::new(Op::CompositeExtract);
    instruction.set_type(result_type_id);
    instruction.set_result(id);
    instruction.add_id(composite_id);
    for &index in indices {
        instruction.add_literal(index);
    }
    instruction
}

pub(super) fn instruction_composite_insert(
    result_type_id: Word,
    id: Word,
    object_id: Word,
    composite_id: Word,
    indices: &[u32],
) -> Instruction {
    let mut instruction = Instruction::new(Op::CompositeInsert);
    instruction.set_type(result_type_id);
    instruction.set_result(id);
    instruction.add_id(object_id);
    instruction.add_id(composite_id);
    for &index in indices {
        instruction.add_literal(index);
    }
    instruction
}

pub(super) fn instruction_vector_extract_dynamic(
    result_type_id: Word,
    id: Word,
    vector_id: Word,
    index_id: Word,
) -> Instruction {
    let mut instruction = Instruction::new(Op::VectorExtractDynamic);
    instruction.set_type(result_type_id);
    instruction.set_result(id);
    instruction.add_id(vector_id);
    instruction.add_id(index_id);
    instruction
}

pub(super) fn instruction_vector_insert_dynamic(
    result_type_id: Word,
    id: Word,
    vector_id: Word,
    component_id: Word,
    index_id: Word,
) -> Instruction {
    let mut instruction = Instruction::new(Op::VectorInsertDynamic);
    instruction.set_type(result_type_id);
    instruction.set_result(id);
    instruction.add_id(vector_id);
    instruction.add_id(component_id);
    instruction.add_id(index_id);
    instruction
}

pub(super) fn instruction_vector_shuffle(
    result_type_id: Word,
    id: Word,
    first_id: Word,
    second_id: Word,
    pattern: &[u32],
) -> Instruction {
    let mut instruction = Instruction::new(Op::VectorShuffle);
    instruction.set_type(result_type_id);
    instruction.set_result(id);
    instruction.add_id(first_id);
    instruction.add_id(second_id);
    for &component in pattern {
        instruction.add_literal(component);
    }
    instruction
}

//
// Arithmetic, Bit, Relational and Conversion Instructions
//
// The opcode carries all the information here, so a pair of generic
// constructors covers the whole family.
//

pub(super) fn instruction_unary(op: Op, result_type_id: Word, id: Word, value: Word) -> Instruction {
    let mut instruction = Instruction::new(op);
    instruction.set_type(result_type_id);
    instruction.set_result(id);
    instruction.add_id(value);
    instruction
}

pub(super) fn instruction_binary(
    op: Op,
    result_type_id: Word,
    id: Word,
    left_id: Word,
    right_id: Word,
) -> Instruction {
    let mut instruction = Instruction::new(op);
    instruction.set_type(result_type_id);
    instruction.set_result(id);
    instruction.add_id(left_id);
    instruction.add_id(right_id);
    instruction
}

pub(super) fn instruction_select(
    result_type_id: Word,
    id: Word,
    condition_id: Word,
    accept_id: Word,
    reject_id: Word,
) -> Instruction {
    let mut instruction = Instruction::new(Op::Select);
    instruction.set_type(result_type_id);
    instruction.set_result(id);
    instruction.add_id(condition_id);
    instruction.add_id(accept_id);
    instruction.add_id(reject_id);
    instruction
}

//
// Atomic Instructions
//

pub(super) fn instruction_atomic(
    op: Op,
    result_type_id: Word,
    id: Word,
    pointer_id: Word,
    scope_id: Word,
    semantics_id: Word,
    value_id: Option<Word>,
) -> Instruction {
    let mut instruction = Instruction::new(op);
    instruction.set_type(result_type_id);
    instruction.set_result(id);
    instruction.add_id(pointer_id);
    instruction.add_id(scope_id);
    instruction.add_id(semantics_id);
    if let Some(value_id) = value_id {
        instruction.add_id(value_id);
    }
    instruction
}

//
// Barrier Instructions
//

pub(super) fn instruction_control_barrier(
    execution_scope_id: Word,
    memory_scope_id: Word,
    semantics_id: Word,
) -> Instruction {
    let mut instruction = Instruction::new(Op::ControlBarrier);
    instruction.add_id(execution_scope_id);
    instruction.add_id(memory_scope_id);
    instruction.add_id(semantics_id);
    instruction
}

pub(super) fn instruction_memory_barrier(memory_scope_id: Word, semantics_id: Word) -> Instruction {
    let mut instruction = Instruction::new(Op::MemoryBarrier);
    instruction.add_id(memory_scope_id);
    instruction.add_id(semantics_id);
    instruction
}

//
// Control-Flow Instructions
//

pub(super) fn instruction_label(id: Word) -> Instruction {
    let mut instruction = Instruction::new(Op::Label);
    instruction.set_result(id);
    instruction
}

pub(super) fn instruction_phi(
    result_type_id: Word,
    id: Word,
    sources: &[(Word, Word)],
) -> Instruction {
    let mut instruction = Instruction::new(Op::Phi);
    instruction.set_type(result_type_id);
    instruction.set_result(id);
    for &(value_id, parent_id) in sources {
        instruction.add_id(value_id);
        instruction.add_id(parent_id);
    }
    instruction
}

pub(super) fn instruction_selection_merge(merge_block_id: Word) -> Instruction {
    let mut instruction = Instruction::new(Op::SelectionMerge);
    instruction.add_id(merge_block_id);
    instruction.add_literal(spirv::SelectionControl::NONE.bits());
    instruction
}

pub(super) fn instruction_loop_merge(
    merge_block_id: Word,
    continue_target_id: Word,
) -> Instruction {
    let mut instruction = Instruction::new(Op::LoopMerge);
    instruction.add_id(merge_block_id);
    instruction.add_id(continue_target_id);
    instruction.add_literal(spirv::LoopControl::NONE.bits());
    instruction
}

pub(super) fn instruction_branch(target_id: Word) -> Instruction {
    let mut instruction = Instruction::new(Op::Branch);
    instruction.add_id(target_id);
    instruction
}

pub(super) fn instruction_branch_conditional(
    condition_id: Word,
    accept_id: Word,
    reject_id: Word,
) -> Instruction {
    let mut instruction = Instruction::new(Op::BranchConditional);
    instruction.add_id(condition_id);
    instruction.add_id(accept_id);
    instruction.add_id(reject_id);
    instruction
}

pub(super) fn instruction_return() -> Instruction {
    Instruction::new(Op::Return)
}

pub(super) fn instruction_return_value(value_id: Word) -> Instruction {
    let mut instruction = Instruction::new(Op::ReturnValue);
    instruction.add_id(value_id);
    instruction
}

#[cfg(test)]
mod tests {
    use crate::back::spv::test_framework::*;
    use spirv::*;

    #[test]
    fn test_spec_conformance() {
        let suite = SpecConformanceSuite {};
        suite.test_all_instructions()
    }

    struct SpecConformanceSuite;

    impl SpecConformanceSuite {
        fn test_all_instructions(&self) {
            self.test_instruction_source();
            self.test_instruction_decorate();
            self.test_instruction_member_decorate();
            self.test_instruction_ext_inst_import();
            self.test_instruction_ext_inst();
            self.test_instruction_memory_model();
            self.test_instruction_entry_point();
            self.test_instruction_execution_mode();
            self.test_instruction_capability();
            self.test_instruction_type_void();
            self.test_instruction_type_bool();
            self.test_instruction_type_int();
            self.test_instruction_type_float();
            self.test_instruction_type_vector();
            self.test_instruction_type_image();
            self.test_instruction_type_sampler();
            self.test_instruction_type_sampled_image();
            self.test_instruction_type_array();
            self.test_instruction_type_runtime_array();
            self.test_instruction_type_struct();
            self.test_instruction_type_pointer();
            self.test_instruction_type_function();
            self.test_instruction_constant_true();
            self.test_instruction_constant_false();
            self.test_instruction_constant_32bit();
            self.test_instruction_constant_64bit();
            self.test_instruction_constant_composite();
            self.test_instruction_spec_constant();
            self.test_instruction_variable();
            self.test_instruction_load();
            self.test_instruction_store();
            self.test_instruction_access_chain();
            self.test_instruction_ptr_access_chain();
            self.test_instruction_function();
            self.test_instruction_function_parameter();
            self.test_instruction_function_end();
            self.test_instruction_function_call();
            self.test_instruction_sampled_image();
            self.test_instruction_image_sample_explicit_lod();
            self.test_instruction_image_write();
            self.test_instruction_atomic();
            self.test_instruction_control_barrier();
            self.test_instruction_label();
            self.test_instruction_phi();
            self.test_instruction_selection_merge();
            self.test_instruction_loop_merge();
            self.test_instruction_branch();
            self.test_instruction_branch_conditional();
            self.test_instruction_return();
            self.test_instruction_return_value();
        }

        fn test_instruction_source(&self) {
            let version = 120;
            let instruction = super::instruction_source(SourceLanguage::OpenCL_C, version);
            let requirements = SpecRequirements {
                op: Op::Source,
                wc: 3,
                type_id: false,
                result_id: false,
                operands: true,
            };
            validate_spec_requirements(requirements, &instruction);
            validate_instruction(&instruction);
        }

        fn test_instruction_decorate(&self) {
            let instruction = super::instruction_decorate(1, Decoration::Binding, &[2]);
            let requirements = SpecRequirements {
                op: Op::Decorate,
                wc: 3,
                type_id: false,
                result_id: false,
                operands: true,
            };
            validate_spec_requirements(requirements, &instruction);
            validate_instruction(&instruction);
        }

        fn test_instruction_member_decorate(&self) {
            let instruction = super::instruction_member_decorate(1, 0, Decoration::Offset, &[0]);
            let requirements = SpecRequirements {
                op: Op::MemberDecorate,
                wc: 4,
                type_id: false,
                result_id: false,
                operands: true,
            };
            validate_spec_requirements(requirements, &instruction);
            validate_instruction(&instruction);
        }

        fn test_instruction_ext_inst_import(&self) {
            let import_name = "GLSL.std.450";
            let instruction = super::instruction_ext_inst_import(1, import_name);
            let requirements = SpecRequirements {
                op: Op::ExtInstImport,
                wc: 3,
                type_id: false,
                result_id: true,
                operands: true,
            };
            validate_spec_requirements(requirements, &instruction);
            validate_instruction(&instruction);
        }

        fn test_instruction_ext_inst(&self) {
            let instruction = super::instruction_ext_inst(1, 2, 3, GLOp::Sqrt, &[4]);
            let requirements = SpecRequirements {
                op: Op::ExtInst,
                wc: 6,
                type_id: true,
                result_id: true,
                operands: true,
            };
            validate_spec_requirements(requirements, &instruction);
            validate_instruction(&instruction);
        }

        fn test_instruction_memory_model(&self) {
            let instruction =
                super::instruction_memory_model(AddressingModel::Logical, MemoryModel::GLSL450);
            let requirements = SpecRequirements {
                op: Op::MemoryModel,
                wc: 3,
                type_id: false,
                result_id: false,
                operands: true,
            };
            validate_spec_requirements(requirements, &instruction);
            validate_instruction(&instruction);
        }

        fn test_instruction_entry_point(&self) {
            let instruction =
                super::instruction_entry_point(ExecutionModel::GLCompute, 1, "foo", &[]);
            let requirements = SpecRequirements {
                op: Op::EntryPoint,
                wc: 4,
                type_id: false,
                result_id: false,
                operands: true,
            };
            validate_spec_requirements(requirements, &instruction);
            validate_instruction(&instruction);
        }

        fn test_instruction_execution_mode(&self) {
            let instruction =
                super::instruction_execution_mode(1, ExecutionMode::LocalSize, &[1, 1, 1]);
            let requirements = SpecRequirements {
                op: Op::ExecutionMode,
                wc: 6,
                type_id: false,
                result_id: false,
                operands: true,
            };
            validate_spec_requirements(requirements, &instruction);
            validate_instruction(&instruction);
        }

        fn test_instruction_capability(&self) {
            let instruction = super::instruction_capability(Capability::Shader);
            let requirements = SpecRequirements {
                op: Op::Capability,
                wc: 2,
                type_id: false,
                result_id: false,
                operands: true,
            };
            validate_spec_requirements(requirements, &instruction);
            validate_instruction(&instruction);
        }

        fn test_instruction_type_void(&self) {
            let instruction = super::instruction_type_void(1);
            let requirements = SpecRequirements {
                op: Op::TypeVoid,
                wc: 2,
                type_id: false,
                result_id: true,
                operands: false,
            };
            validate_spec_requirements(requirements, &instruction);
            validate_instruction(&instruction);
        }

        fn test_instruction_type_bool(&self) {
            let instruction = super::instruction_type_bool(1);
            let requirements = SpecRequirements {
                op: Op::TypeBool,
                wc: 2,
                type_id: false,
                result_id: true,
                operands: false,
            };
            validate_spec_requirements(requirements, &instruction);
            validate_instruction(&instruction);
        }

        fn test_instruction_type_int(&self) {
            let instruction = super::instruction_type_int(1, 32, 0);
            let requirements = SpecRequirements {
                op: Op::TypeInt,
                wc: 4,
                type_id: false,
                result_id: true,
                operands: true,
            };
            validate_spec_requirements(requirements, &instruction);
            validate_instruction(&instruction);
        }

        fn test_instruction_type_float(&self) {
            let instruction = super::instruction_type_float(1, 32);
            let requirements = SpecRequirements {
                op: Op::TypeFloat,
                wc: 3,
                type_id: false,
                result_id: true,
                operands: true,
            };
            validate_spec_requirements(requirements, &instruction);
            validate_instruction(&instruction);
        }

        fn test_instruction_type_vector(&self) {
            let instruction = super::instruction_type_vector(1, 2, 4);
            let requirements = SpecRequirements {
                op: Op::TypeVector,
                wc: 4,
                type_id: false,
                result_id: true,
                operands: true,
            };
            validate_spec_requirements(requirements, &instruction);
            validate_instruction(&instruction);
        }

        fn test_instruction_type_image(&self) {
            let instruction = super::instruction_type_image(1, 2, Dim::Dim2D, 1);
            let requirements = SpecRequirements {
                op: Op::TypeImage,
                wc: 9,
                type_id: false,
                result_id: true,
                operands: true,
            };
            validate_spec_requirements(requirements, &instruction);
            validate_instruction(&instruction);
        }

        fn test_instruction_type_sampler(&self) {
            let instruction = super::instruction_type_sampler(1);
            let requirements = SpecRequirements {
                op: Op::TypeSampler,
                wc: 2,
                type_id: false,
                result_id: true,
                operands: false,
            };
            validate_spec_requirements(requirements, &instruction);
            validate_instruction(&instruction);
        }

        fn test_instruction_type_sampled_image(&self) {
            let instruction = super::instruction_type_sampled_image(1, 2);
            let requirements = SpecRequirements {
                op: Op::TypeSampledImage,
                wc: 3,
                type_id: false,
                result_id: true,
                operands: true,
            };
            validate_spec_requirements(requirements, &instruction);
            validate_instruction(&instruction);
        }

        fn test_instruction_type_array(&self) {
            let instruction = super::instruction_type_array(1, 2, 3);
            let requirements = SpecRequirements {
                op: Op::TypeArray,
                wc: 4,
                type_id: false,
                result_id: true,
                operands: true,
            };
            validate_spec_requirements(requirements, &instruction);
            validate_instruction(&instruction);
        }

        fn test_instruction_type_runtime_array(&self) {
            let instruction = super::instruction_type_runtime_array(1, 2);
            let requirements = SpecRequirements {
                op: Op::TypeRuntimeArray,
                wc: 3,
                type_id: false,
                result_id: true,
                operands: true,
            };
            validate_spec_requirements(requirements, &instruction);
            validate_instruction(&instruction);
        }

        fn test_instruction_type_struct(&self) {
            let instruction = super::instruction_type_struct(1, &[2]);
            let requirements = SpecRequirements {
                op: Op::TypeStruct,
                wc: 2,
                type_id: false,
                result_id: true,
                operands: true,
            };
            validate_spec_requirements(requirements, &instruction);
            validate_instruction(&instruction);
        }

        fn test_instruction_type_pointer(&self) {
            let instruction = super::instruction_type_pointer(1, StorageClass::StorageBuffer, 2);
            let requirements = SpecRequirements {
                op: Op::TypePointer,
                wc: 4,
                type_id: false,
                result_id: true,
                operands: true,
            };
            validate_spec_requirements(requirements, &instruction);
            validate_instruction(&instruction);
        }

        fn test_instruction_type_function(&self) {
            let instruction = super::instruction_type_function(1, 2, &[]);
            let requirements = SpecRequirements {
                op: Op::TypeFunction,
                wc: 3,
                type_id: false,
                result_id: true,
                operands: true,
            };
            validate_spec_requirements(requirements, &instruction);
            validate_instruction(&instruction);
        }

        fn test_instruction_constant_true(&self) {
            let instruction = super::instruction_constant_true(1, 2);
            let requirements = SpecRequirements {
                op: Op::ConstantTrue,
                wc: 3,
                type_id: true,
                result_id: true,
                operands: false,
            };
            validate_spec_requirements(requirements, &instruction);
            validate_instruction(&instruction);
        }

        fn test_instruction_constant_false(&self) {
            let instruction = super::instruction_constant_false(1, 2);
            let requirements = SpecRequirements {
                op: Op::ConstantFalse,
                wc: 3,
                type_id: true,
                result_id: true,
                operands: false,
            };
            validate_spec_requirements(requirements, &instruction);
            validate_instruction(&instruction);
        }

        fn test_instruction_constant_32bit(&self) {
            let instruction = super::instruction_constant_32bit(1, 2, 42);
            let requirements = SpecRequirements {
                op: Op::Constant,
                wc: 4,
                type_id: true,
                result_id: true,
                operands: true,
            };
            validate_spec_requirements(requirements, &instruction);
            validate_instruction(&instruction);
        }

        fn test_instruction_constant_64bit(&self) {
            let instruction = super::instruction_constant_64bit(1, 2, !0u64);
            let requirements = SpecRequirements {
                op: Op::Constant,
                wc: 5,
                type_id: true,
                result_id: true,
                operands: true,
            };
            validate_spec_requirements(requirements, &instruction);
            validate_instruction(&instruction);
        }

        fn test_instruction_constant_composite(&self) {
            let instruction = super::instruction_constant_composite(1, 2, &[3, 4]);
            let requirements = SpecRequirements {
                op: Op::ConstantComposite,
                wc: 3,
                type_id: true,
                result_id: true,
                operands: true,
            };
            validate_spec_requirements(requirements, &instruction);
            validate_instruction(&instruction);
        }

        fn test_instruction_spec_constant(&self) {
            let instruction = super::instruction_spec_constant(1, 2, 1);
            let requirements = SpecRequirements {
                op: Op::SpecConstant,
                wc: 4,
                type_id: true,
                result_id: true,
                operands: true,
            };
            validate_spec_requirements(requirements, &instruction);
            validate_instruction(&instruction);
        }

        fn test_instruction_variable(&self) {
            let instruction =
                super::instruction_variable(1, 2, StorageClass::UniformConstant, None);
            let requirements = SpecRequirements {
                op: Op::Variable,
                wc: 4,
                type_id: true,
                result_id: true,
                operands: true,
            };
            validate_spec_requirements(requirements, &instruction);
            validate_instruction(&instruction);
        }

        fn test_instruction_load(&self) {
            let instruction = super::instruction_load(1, 2, 3);
            let requirements = SpecRequirements {
                op: Op::Load,
                wc: 4,
                type_id: true,
                result_id: true,
                operands: true,
            };
            validate_spec_requirements(requirements, &instruction);
            validate_instruction(&instruction);
        }

        fn test_instruction_store(&self) {
            let instruction = super::instruction_store(1, 2);
            let requirements = SpecRequirements {
                op: Op::Store,
                wc: 3,
                type_id: false,
                result_id: false,
                operands: true,
            };
            validate_spec_requirements(requirements, &instruction);
            validate_instruction(&instruction);
        }

        fn test_instruction_access_chain(&self) {
            let instruction = super::instruction_access_chain(1, 2, 3, &[4]);
            let requirements = SpecRequirements {
                op: Op::AccessChain,
                wc: 4,
                type_id: true,
                result_id: true,
                operands: true,
            };
            validate_spec_requirements(requirements, &instruction);
            validate_instruction(&instruction);
        }

        fn test_instruction_ptr_access_chain(&self) {
            let instruction = super::instruction_ptr_access_chain(1, 2, 3, 4, &[]);
            let requirements = SpecRequirements {
                op: Op::PtrAccessChain,
                wc: 5,
                type_id: true,
                result_id: true,
                operands: true,
            };
            validate_spec_requirements(requirements, &instruction);
            validate_instruction(&instruction);
        }

        fn test_instruction_function(&self) {
            let instruction = super::instruction_function(1, 2, FunctionControl::NONE, 3);
            let requirements = SpecRequirements {
                op: Op::Function,
                wc: 5,
                type_id: true,
                result_id: true,
                operands: true,
            };
            validate_spec_requirements(requirements, &instruction);
            validate_instruction(&instruction);
        }

        fn test_instruction_function_parameter(&self) {
            let instruction = super::instruction_function_parameter(1, 2);
            let requirements = SpecRequirements {
                op: Op::FunctionParameter,
                wc: 3,
                type_id: true,
                result_id: true,
                operands: false,
            };
            validate_spec_requirements(requirements, &instruction);
            validate_instruction(&instruction);
        }

        fn test_instruction_function_end(&self) {
            let instruction = super::instruction_function_end();
            let requirements = SpecRequirements {
                op: Op::FunctionEnd,
                wc: 1,
                type_id: false,
                result_id: false,
                operands: false,
            };
            validate_spec_requirements(requirements, &instruction);
            validate_instruction(&instruction);
        }

        fn test_instruction_function_call(&self) {
            let instruction = super::instruction_function_call(1, 2, 3, &[4]);
            let requirements = SpecRequirements {
                op: Op::FunctionCall,
                wc: 4,
                type_id: true,
                result_id: true,
                operands: true,
            };
            validate_spec_requirements(requirements, &instruction);
            validate_instruction(&instruction);
        }

        fn test_instruction_sampled_image(&self) {
            let instruction = super::instruction_sampled_image(1, 2, 3, 4);
            let requirements = SpecRequirements {
                op: Op::SampledImage,
                wc: 5,
                type_id: true,
                result_id: true,
                operands: true,
            };
            validate_spec_requirements(requirements, &instruction);
            validate_instruction(&instruction);
        }

        fn test_instruction_image_sample_explicit_lod(&self) {
            let instruction = super::instruction_image_sample_explicit_lod(1, 2, 3, 4, 5);
            let requirements = SpecRequirements {
                op: Op::ImageSampleExplicitLod,
                wc: 7,
                type_id: true,
                result_id: true,
                operands: true,
            };
            validate_spec_requirements(requirements, &instruction);
            validate_instruction(&instruction);
        }

        fn test_instruction_image_write(&self) {
            let instruction = super::instruction_image_write(1, 2, 3);
            let requirements = SpecRequirements {
                op: Op::ImageWrite,
                wc: 4,
                type_id: false,
                result_id: false,
                operands: true,
            };
            validate_spec_requirements(requirements, &instruction);
            validate_instruction(&instruction);
        }

        fn test_instruction_atomic(&self) {
            let instruction = super::instruction_atomic(Op::AtomicIAdd, 1, 2, 3, 4, 5, Some(6));
            let requirements = SpecRequirements {
                op: Op::AtomicIAdd,
                wc: 7,
                type_id: true,
                result_id: true,
                operands: true,
            };
            validate_spec_requirements(requirements, &instruction);
            validate_instruction(&instruction);
        }

        fn test_instruction_control_barrier(&self) {
            let instruction = super::instruction_control_barrier(1, 2, 3);
            let requirements = SpecRequirements {
                op: Op::ControlBarrier,
                wc: 4,
                type_id: false,
                result_id: false,
                operands: true,
            };
            validate_spec_requirements(requirements, &instruction);
            validate_instruction(&instruction);
        }

        fn test_instruction_label(&self) {
            let instruction = super::instruction_label(1);
            let requirements = SpecRequirements {
                op: Op::Label,
                wc: 2,
                type_id: false,
                result_id: true,
                operands: false,
            };
            validate_spec_requirements(requirements, &instruction);
            validate_instruction(&instruction);
        }

        fn test_instruction_phi(&self) {
            let instruction = super::instruction_phi(1, 2, &[(3, 4), (5, 6)]);
            let requirements = SpecRequirements {
                op: Op::Phi,
                wc: 7,
                type_id: true,
                result_id: true,
                operands: true,
            };
            validate_spec_requirements(requirements, &instruction);
            validate_instruction(&instruction);
        }

        fn test_instruction_selection_merge(&self) {
            let instruction = super::instruction_selection_merge(1);
            let requirements = SpecRequirements {
                op: Op::SelectionMerge,
                wc: 3,
                type_id: false,
                result_id: false,
                operands: true,
            };
            validate_spec_requirements(requirements, &instruction);
            validate_instruction(&instruction);
        }

        fn test_instruction_loop_merge(&self) {
            let instruction = super::instruction_loop_merge(1, 2);
            let requirements = SpecRequirements {
                op: Op::LoopMerge,
                wc: 4,
                type_id: false,
                result_id: false,
                operands: true,
            };
            validate_spec_requirements(requirements, &instruction);
            validate_instruction(&instruction);
        }

        fn test_instruction_branch(&self) {
            let instruction = super::instruction_branch(1);
            let requirements = SpecRequirements {
                op: Op::Branch,
                wc: 2,
                type_id: false,
                result_id: false,
                operands: true,
            };
            validate_spec_requirements(requirements, &instruction);
            validate_instruction(&instruction);
        }

        fn test_instruction_branch_conditional(&self) {
            let instruction = super::instruction_branch_conditional(1, 2, 3);
            let requirements = SpecRequirements {
                op: Op::BranchConditional,
                wc: 4,
                type_id: false,
                result_id: false,
                operands: true,
            };
            validate_spec_requirements(requirements, &instruction);
            validate_instruction(&instruction);
        }

        fn test_instruction_return(&self) {
            let instruction = super::instruction_return();
            let requirements = SpecRequirements {
                op: Op::Return,
                wc: 1,
                type_id: false,
                result_id: false,
                operands: false,
            };
            validate_spec_requirements(requirements, &instruction);
            validate_instruction(&instruction);
        }

        fn test_instruction_return_value(&self) {
            let instruction = super::instruction_return_value(1);
            let requirements = SpecRequirements {
                op: Op::ReturnValue,
                wc: 2,
                type_id: false,
                result_id: false,
                operands: true,
            };
            validate_spec_requirements(requirements, &instruction);
            validate_instruction(&instruction);
        }
    }
}
