pub mod runtime_error;
pub mod vm_bc;

pub use runtime_error::{RuntimeError, RuntimeErrorKind};
pub use vm_bc::{RunInput, VmBc, VmBcConfig, VmState};
