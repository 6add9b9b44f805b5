use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeErrorKind {
    #[error("unrecognized opcode '{0}'")]
    UnknownOpcode(u8),
    #[error("instruction pointer {0} is outside the code region")]
    IpOutOfBounds(u16),
    #[error("stack underflow")]
    StackUnderflow,
    #[error("stack overflow")]
    StackOverflow,
    #[error("subroutine stack overflow")]
    CallStackOverflow,
    #[error("subroutine stack underflow")]
    CallStackUnderflow,
    #[error("too many elements in output (expected {expected})")]
    TooManyOutputs { expected: usize },
    #[error("invalid element in output at index {index}: expected {expected}, got {found}")]
    OutputMismatch { index: usize, expected: i8, found: i8 },
    #[error("not enough elements in output (expected {expected}, got {produced})")]
    NotEnoughOutputs { expected: usize, produced: usize },
    #[error("stack must be empty at the end of execution ({0} left)")]
    StackNotEmpty(usize),
    #[error("cycle budget of {0} exceeded")]
    CycleBudgetExceeded(u64),
}

/// A runtime error at the bytecode offset of the instruction that raised it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("runtime error: {kind}")]
pub struct RuntimeError {
    pub kind: RuntimeErrorKind,
    pub offset: u16,
}

impl RuntimeError {
    pub fn new(kind: RuntimeErrorKind, offset: u16) -> Self {
        RuntimeError { kind, offset }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_is_prefixed() {
        let err = RuntimeError::new(RuntimeErrorKind::StackUnderflow, 3);
        assert_eq!(err.to_string(), "runtime error: stack underflow");
    }

    #[test]
    fn test_output_mismatch_display() {
        let kind = RuntimeErrorKind::OutputMismatch {
            index: 2,
            expected: 5,
            found: -1,
        };
        let msg = kind.to_string();
        assert!(msg.contains("index 2"));
        assert!(msg.contains("expected 5, got -1"));
    }
}
