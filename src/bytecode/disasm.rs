use std::fmt;

use crate::bytecode::image::{BytecodeImage, CODE_SIZE};
use crate::bytecode::op::{InstructionTable, Op, OperandKind};

/// Operand as it appears in the image. Label names are not kept, so label
/// operands decode to their resolved address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    None,
    Number(u8),
    Register(u8),
    Address(u16),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decoded {
    Op(Op, Operand),
    /// A byte missing from the instruction table.
    Unknown(u8),
}

/// One decoded instruction and its offset in the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    pub offset: u16,
    pub decoded: Decoded,
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.decoded {
            Decoded::Op(op, Operand::None) => write!(f, "{}", op),
            Decoded::Op(op, Operand::Number(n)) => write!(f, "{} {}", op, n),
            Decoded::Op(op, Operand::Register(r)) => write!(f, "{} r{}", op, r),
            Decoded::Op(op, Operand::Address(a)) => write!(f, "{} {}", op, a),
            Decoded::Unknown(byte) => write!(f, "??({})", byte),
        }
    }
}

/// Decode the code region up to the first zero byte.
pub fn decompile(image: &BytecodeImage) -> Vec<Instruction> {
    let code = image.code();
    let table = InstructionTable::get();
    let mut out = Vec::new();
    let mut at = 0usize;

    while at < CODE_SIZE && code[at] != 0 {
        let byte = code[at];
        let Some(op) = table.by_code(byte) else {
            out.push(Instruction {
                offset: at as u16,
                decoded: Decoded::Unknown(byte),
            });
            at += 1;
            continue;
        };

        // Operands cut off by the end of the region read as zero.
        let operand_byte = |i: usize| code.get(at + i).copied().unwrap_or(0);
        let operand = match op.operand() {
            OperandKind::None => Operand::None,
            OperandKind::Number => Operand::Number(operand_byte(1)),
            OperandKind::Register => Operand::Register(operand_byte(1)),
            OperandKind::Label => {
                Operand::Address(u16::from_be_bytes([operand_byte(1), operand_byte(2)]))
            }
        };

        out.push(Instruction {
            offset: at as u16,
            decoded: Decoded::Op(op, operand),
        });
        at += op.encoded_len() as usize;
    }

    out
}

/// Space-separated mnemonic text, e.g. `INP INP ADD OUT`.
pub fn decompile_text(image: &BytecodeImage) -> String {
    decompile(image)
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}

/// One instruction per line with offsets; jump and call targets are marked.
pub fn listing(image: &BytecodeImage) -> String {
    let instructions = decompile(image);
    let targets = collect_jump_targets(&instructions);
    let mut out = String::new();

    out.push_str("════════════════════════════════════════\n");
    out.push_str(&format!(
        " {} instructions, {} bytes\n",
        instructions.len(),
        image.code_len()
    ));
    out.push_str("════════════════════════════════════════\n");

    for ins in &instructions {
        let marker = if targets.contains(&ins.offset) {
            "► "
        } else {
            "  "
        };
        out.push_str(&format!("{:04} {}{}\n", ins.offset, marker, ins));
    }
    out
}

fn collect_jump_targets(instructions: &[Instruction]) -> Vec<u16> {
    let mut targets = Vec::new();
    for ins in instructions {
        if let Decoded::Op(_, Operand::Address(a)) = ins.decoded {
            if !targets.contains(&a) {
                targets.push(a);
            }
        }
    }
    targets
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::compile::Compiler;
    use crate::frontend::lexer::Lexer;

    fn assemble(source: &str) -> BytecodeImage {
        let tokens = Lexer::new(source).tokenize().unwrap();
        Compiler::new(&tokens, source).compile().unwrap().image
    }

    #[test]
    fn test_plain_ops() {
        assert_eq!(decompile_text(&assemble("inp inp add out")), "INP INP ADD OUT");
    }

    #[test]
    fn test_operands_render_in_decimal() {
        let image = assemble("psh $19 sav &3 lod &3 out");
        assert_eq!(decompile_text(&image), "PSH 25 SAV r3 LOD r3 OUT");
    }

    #[test]
    fn test_labels_render_as_addresses() {
        let image = assemble("lab #top inp jez #end jmp #top lab #end");
        assert_eq!(decompile_text(&image), "INP JEZ 7 JMP 0");
    }

    #[test]
    fn test_hex_operand_ends_at_first_letter() {
        assert_eq!(decompile_text(&assemble("psh $1add")), "PSH 1 ADD");
    }

    #[test]
    fn test_high_address_byte_is_kept() {
        let mut code = vec![Op::Jmp.code(), 0x01, 0x02];
        code.push(Op::Hlt.code());
        let image = BytecodeImage::from_code(&code).unwrap();
        assert_eq!(decompile_text(&image), "JMP 258 HLT");
    }

    #[test]
    fn test_unknown_byte_does_not_panic() {
        let image = BytecodeImage::from_code(&[0x01, 0xEE, 0x02]).unwrap();
        assert_eq!(decompile_text(&image), "INP ??(238) OUT");
    }

    #[test]
    fn test_empty_image() {
        assert!(decompile(&BytecodeImage::new()).is_empty());
    }

    #[test]
    fn test_offsets_track_operand_widths() {
        let offsets: Vec<u16> = decompile(&assemble("psh 1 jmp #x lab #x out"))
            .iter()
            .map(|i| i.offset)
            .collect();
        assert_eq!(offsets, vec![0, 2, 5]);
    }

    #[test]
    fn test_listing_marks_targets() {
        let text = listing(&assemble("lab #top inp out jmp #top"));
        assert!(text.contains("0000 ► INP"));
        assert!(text.contains("0002   JMP 0"));
        assert!(text.contains("3 instructions, 5 bytes"));
    }
}
