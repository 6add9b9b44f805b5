use thiserror::Error;

use crate::bytecode::image::CODE_SIZE;
use crate::frontend::token::TokenKind;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileErrorKind {
    /// A label, number or register where an instruction was expected
    #[error("identifier '{0}' is not an operation")]
    NotAnOperation(String),
    /// A mnemonic missing from the instruction table
    #[error("invalid op name '{0}'")]
    InvalidOpName(String),
    /// An operand of the wrong kind
    #[error("expected a {expected}, instead found a {found}")]
    UnexpectedOperand {
        expected: TokenKind,
        found: TokenKind,
    },
    #[error("unexpected EOF")]
    UnexpectedEof,
    #[error("attempt to reset the label '{0}'")]
    LabelReset(String),
    #[error("label '{0}' is never set")]
    LabelNeverSet(String),
    #[error("program exceeds the {size}-byte code region", size = CODE_SIZE)]
    CodeOverflow,
}

impl CompileErrorKind {
    /// Errors after which the emission pass cannot continue.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            CompileErrorKind::NotAnOperation(_)
                | CompileErrorKind::UnexpectedEof
                | CompileErrorKind::CodeOverflow
        )
    }

    pub fn hint(&self) -> Option<String> {
        match self {
            CompileErrorKind::LabelNeverSet(name) => {
                Some(format!("define it with 'LAB #{}'", name))
            }
            CompileErrorKind::LabelReset(_) => {
                Some("labels can only be defined once".to_string())
            }
            CompileErrorKind::UnexpectedEof => {
                Some("the last instruction is missing its operand".to_string())
            }
            _ => None,
        }
    }
}

/// An assembly error at a char offset in the source.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("compile error: {kind}")]
pub struct CompileError {
    pub kind: CompileErrorKind,
    pub pos: usize,
}

impl CompileError {
    pub fn new(kind: CompileErrorKind, pos: usize) -> Self {
        CompileError { kind, pos }
    }
}

/// Every error recorded by one compile, in the order found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompileErrors(pub Vec<CompileError>);

impl CompileErrors {
    pub fn push(&mut self, error: CompileError) {
        self.0.push(error);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CompileError> {
        self.0.iter()
    }
}

impl std::fmt::Display for CompileErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", err)?;
        }
        Ok(())
    }
}

impl std::error::Error for CompileErrors {}

impl<'a> IntoIterator for &'a CompileErrors {
    type Item = &'a CompileError;
    type IntoIter = std::slice::Iter<'a, CompileError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
