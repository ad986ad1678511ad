//! Textual output: an assembly listing of the instruction stream and the
//! C initializer-list rendering of the binary.

use super::instructions::{Instruction, Operand};
use super::{LogicalLayout, PhysicalLayout};
use spirv::Word;
use std::fmt::Write;

fn write_operand(out: &mut String, operand: &Operand) {
    match *operand {
        Operand::IdRef(id) => write!(out, " %{}", id),
        Operand::LiteralInt32(value) => write!(out, " {}", value),
        Operand::LiteralInt64(value) => write!(out, " {}", value),
        Operand::LiteralFloat32(value) => write!(out, " {}", value),
        Operand::LiteralString(ref value) => write!(out, " \"{}\"", value),
        Operand::StorageClass(value) => write!(out, " {:?}", value),
        Operand::Decoration(value) => write!(out, " {:?}", value),
        Operand::BuiltIn(value) => write!(out, " {:?}", value),
        Operand::Capability(value) => write!(out, " {:?}", value),
        Operand::ExecutionModel(value) => write!(out, " {:?}", value),
        Operand::ExecutionMode(value) => write!(out, " {:?}", value),
        Operand::AddressingModel(value) => write!(out, " {:?}", value),
        Operand::MemoryModel(value) => write!(out, " {:?}", value),
        Operand::SourceLanguage(value) => write!(out, " {:?}", value),
        Operand::Dim(value) => write!(out, " {:?}", value),
        Operand::ImageFormat(value) => write!(out, " {:?}", value),
    }
    .unwrap()
}

fn write_instruction(out: &mut String, instruction: &Instruction) {
    match instruction.result_id {
        Some(id) => write!(out, "%{} = Op{:?}", id, instruction.op).unwrap(),
        None => write!(out, "Op{:?}", instruction.op).unwrap(),
    }
    if let Some(type_id) = instruction.type_id {
        write!(out, " %{}", type_id).unwrap();
    }
    for operand in instruction.operands.iter() {
        write_operand(out, operand);
    }
    out.push('\n');
}

/// Render the module as an assembly listing. The header becomes five
/// comment lines; result ids print as `%<decimal>`.
pub(super) fn disassemble(
    physical: &PhysicalLayout,
    logical: &LogicalLayout,
    bound: Word,
) -> String {
    let mut out = String::new();
    writeln!(out, "; SPIR-V").unwrap();
    writeln!(
        out,
        "; Version: {}.{}",
        physical.version >> 16 & 0xFF,
        physical.version >> 8 & 0xFF
    )
    .unwrap();
    writeln!(out, "; Generator: {:#010x}", physical.generator).unwrap();
    writeln!(out, "; Bound: {}", bound).unwrap();
    writeln!(out, "; Schema: {}", physical.instruction_schema).unwrap();
    for instruction in logical.iter() {
        write_instruction(&mut out, instruction);
    }
    out
}

/// Render the binary words as a comma-separated C initializer list.
pub(super) fn c_initializer(words: &[Word]) -> String {
    let mut out = String::new();
    for (index, word) in words.iter().enumerate() {
        if index > 0 {
            out.push(',');
            if index % 8 == 0 {
                out.push('\n');
            }
        }
        write!(out, "{:#010x}", word).unwrap();
    }
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use crate::back::spv::instructions;

    #[test]
    fn renders_result_and_type() {
        let instruction = instructions::instruction_load(2, 7, 5);
        let mut out = String::new();
        super::write_instruction(&mut out, &instruction);
        assert_eq!(out, "%7 = OpLoad %2 %5\n");
    }

    #[test]
    fn renders_enums_symbolically() {
        let instruction =
            instructions::instruction_type_pointer(3, spirv::StorageClass::StorageBuffer, 2);
        let mut out = String::new();
        super::write_instruction(&mut out, &instruction);
        assert_eq!(out, "%3 = OpTypePointer StorageBuffer %2\n");
    }

    #[test]
    fn c_initializer_wraps_lines() {
        let words: Vec<u32> = (0..10).collect();
        let text = super::c_initializer(&words);
        assert!(text.starts_with("0x00000000,0x00000001"));
        assert_eq!(text.matches('\n').count(), 2);
        assert!(text.ends_with('\n'));
    }
}
