use std::collections::HashMap;
use std::sync::LazyLock;

// =============================================================================
// OP - Instruction set
// =============================================================================

/// How many bytes follow an opcode, and how to read them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandKind {
    None,
    /// One raw byte.
    Number,
    /// One register index byte.
    Register,
    /// Two bytes, big-endian absolute address.
    Label,
}

impl OperandKind {
    pub fn width(self) -> u16 {
        match self {
            OperandKind::None => 0,
            OperandKind::Number | OperandKind::Register => 1,
            OperandKind::Label => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    // I/O
    Inp,
    Out,

    // stack ops
    Del,
    Dup,
    Swp,
    Rot,
    Len,
    Pze,
    Psh,

    // arithmetic (wrapping)
    Inc,
    Dec,
    Neg,
    Add,
    Sub,

    // control flow
    Jmp,
    Jez,
    Jnz,
    Jlz,
    Jgz,
    Jsr,
    Ret,

    // registers
    Lod,
    Sav,

    // machine
    Hlt,
    Brk,
    Rng,
    Dmp,
}

/// One row of the instruction catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpInfo {
    pub mnemonic: &'static str,
    pub code: u8,
    pub pops: u8,
    pub pushes: u8,
    pub operand: OperandKind,
}

impl Op {
    pub const ALL: [Op; 27] = [
        Op::Inp,
        Op::Out,
        Op::Del,
        Op::Dup,
        Op::Swp,
        Op::Rot,
        Op::Len,
        Op::Pze,
        Op::Psh,
        Op::Inc,
        Op::Dec,
        Op::Neg,
        Op::Add,
        Op::Sub,
        Op::Jmp,
        Op::Jez,
        Op::Jnz,
        Op::Jlz,
        Op::Jgz,
        Op::Jsr,
        Op::Ret,
        Op::Lod,
        Op::Sav,
        Op::Hlt,
        Op::Brk,
        Op::Rng,
        Op::Dmp,
    ];

    pub const fn info(self) -> OpInfo {
        use OperandKind::{Label, None, Number, Register};
        use Op::*;

        let (mnemonic, code, pops, pushes, operand) = match self {
            Inp => ("INP", 0x01, 0, 1, None),
            Out => ("OUT", 0x02, 1, 0, None),

            Del => ("DEL", 0x03, 1, 0, None),
            Dup => ("DUP", 0x04, 1, 2, None),
            Swp => ("SWP", 0x05, 2, 2, None),
            Rot => ("ROT", 0x06, 3, 3, None),
            Len => ("LEN", 0x07, 0, 1, None),
            Pze => ("PZE", 0x08, 0, 1, None),
            Psh => ("PSH", 0x09, 0, 1, Number),

            Inc => ("INC", 0x0A, 1, 1, None),
            Dec => ("DEC", 0x0B, 1, 1, None),
            Neg => ("NEG", 0x0C, 1, 1, None),
            Add => ("ADD", 0x0D, 2, 1, None),
            Sub => ("SUB", 0x0E, 2, 1, None),

            Jmp => ("JMP", 0x10, 0, 0, Label),
            Jez => ("JEZ", 0x11, 1, 0, Label),
            Jnz => ("JNZ", 0x12, 1, 0, Label),
            Jlz => ("JLZ", 0x13, 1, 0, Label),
            Jgz => ("JGZ", 0x14, 1, 0, Label),
            Jsr => ("JSR", 0x15, 0, 0, Label),
            Ret => ("RET", 0x16, 0, 0, None),

            Lod => ("LOD", 0x20, 0, 1, Register),
            Sav => ("SAV", 0x21, 1, 0, Register),

            Hlt => ("HLT", 0xF0, 0, 0, None),
            Brk => ("BRK", 0xF1, 0, 0, None),
            Rng => ("RNG", 0xF2, 0, 1, None),
            Dmp => ("DMP", 0xF3, 0, 0, None),
        };

        OpInfo {
            mnemonic,
            code,
            pops,
            pushes,
            operand,
        }
    }

    pub fn code(self) -> u8 {
        self.info().code
    }

    pub fn mnemonic(self) -> &'static str {
        self.info().mnemonic
    }

    pub fn operand(self) -> OperandKind {
        self.info().operand
    }

    /// Total encoded length: opcode plus operand bytes.
    pub fn encoded_len(self) -> u16 {
        1 + self.operand().width()
    }

    pub fn from_code(code: u8) -> Option<Op> {
        InstructionTable::get().by_code(code)
    }
}

impl std::fmt::Display for Op {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.mnemonic())
    }
}

/// What a mnemonic names: a real instruction, or the `LAB` pseudo-op that
/// defines a label and emits nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mnemonic {
    Op(Op),
    DefineLabel,
}

impl Mnemonic {
    pub const DEFINE_LABEL: &'static str = "LAB";

    pub fn operand(self) -> OperandKind {
        match self {
            Mnemonic::Op(op) => op.operand(),
            Mnemonic::DefineLabel => OperandKind::Label,
        }
    }

    pub fn lookup(name: &str) -> Option<Mnemonic> {
        InstructionTable::get().by_name(name)
    }
}

/// Both views of the catalog, built once. `LAB` is only in the by-name view.
pub struct InstructionTable {
    by_name: HashMap<&'static str, Mnemonic>,
    by_code: [Option<Op>; 256],
}

static TABLE: LazyLock<InstructionTable> = LazyLock::new(InstructionTable::build);

impl InstructionTable {
    pub fn get() -> &'static InstructionTable {
        &TABLE
    }

    fn build() -> Self {
        let mut by_name = HashMap::new();
        let mut by_code = [None; 256];

        for op in Op::ALL {
            let info = op.info();
            by_name.insert(info.mnemonic, Mnemonic::Op(op));
            by_code[info.code as usize] = Some(op);
        }
        by_name.insert(Mnemonic::DEFINE_LABEL, Mnemonic::DefineLabel);

        InstructionTable { by_name, by_code }
    }

    pub fn by_name(&self, name: &str) -> Option<Mnemonic> {
        self.by_name.get(name).copied()
    }

    pub fn by_code(&self, code: u8) -> Option<Op> {
        self.by_code[code as usize]
    }
}
