use crate::back::spv::instructions::Instruction;
use spirv::Op;

/// Basic validity requirements an instruction class imposes, per the
/// instruction table of the SPIR-V specification.
pub struct SpecRequirements {
    pub op: Op,
    /// Minimum word count; variable-length instructions may exceed it.
    pub wc: u32,
    pub type_id: bool,
    pub result_id: bool,
    pub operands: bool,
}

pub fn validate_spec_requirements(requirements: SpecRequirements, instruction: &Instruction) {
    assert_eq!(requirements.op, instruction.op);
    assert!(instruction.word_count() >= requirements.wc);
    assert_eq!(requirements.type_id, instruction.type_id.is_some());
    assert_eq!(requirements.result_id, instruction.result_id.is_some());
    assert_eq!(requirements.operands, !instruction.operands.is_empty());
}

pub fn validate_instruction(instruction: &Instruction) {
    let mut output = Vec::new();
    instruction.to_words(&mut output);
    assert_eq!(output.len() as u32, instruction.word_count());
    assert_eq!(output[0] & 0xFFFF, instruction.op as u32);
    assert_eq!(output[0] >> 16, instruction.word_count());

    let mut index = 1;
    if let Some(type_id) = instruction.type_id {
        assert_eq!(output[index], type_id);
        index += 1;
    }
    if let Some(result_id) = instruction.result_id {
        assert_eq!(output[index], result_id);
    }
}
