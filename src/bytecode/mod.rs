pub mod compile;
pub mod compile_error;
pub mod disasm;
pub mod image;
pub mod op;

pub use compile::{Assembly, Compiler};
pub use image::BytecodeImage;
pub use op::Op;
