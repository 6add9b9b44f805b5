//! Assembler and virtual machine for a small 8-bit stack machine, with a
//! validation driver for puzzle-style programs.

pub mod bytecode;
pub mod diagnostic;
pub mod frontend;
pub mod puzzle;
pub mod runtime;

pub use bytecode::{Assembly, BytecodeImage, Compiler, Op};
pub use diagnostic::{AssembleError, Diagnostic, assemble};
pub use frontend::{Lexer, SourceMap};
pub use puzzle::{Puzzle, ValidationReport, validate};
pub use runtime::{RunInput, RuntimeError, VmBc, VmBcConfig, VmState};
