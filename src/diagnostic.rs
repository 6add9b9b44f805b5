use std::fmt;

use thiserror::Error;

use crate::bytecode::compile::{Assembly, Compiler};
use crate::bytecode::compile_error::{CompileError, CompileErrors};
use crate::frontend::lexer::{Lexer, LexerError};
use crate::frontend::source_map::{SourceInfo, SourceMap};
use crate::runtime::runtime_error::{RuntimeError, RuntimeErrorKind};

/// Why a source file produced no image.
#[derive(Debug, Clone, Error)]
pub enum AssembleError {
    #[error("lexer error: {0}")]
    Lex(#[from] LexerError),
    #[error("{0}")]
    Compile(#[from] CompileErrors),
}

impl AssembleError {
    /// One positioned diagnostic per recorded error.
    pub fn diagnostics(&self, source: &str) -> Vec<Diagnostic> {
        let map = SourceMap::new(source);
        match self {
            AssembleError::Lex(err) => vec![Diagnostic::lexer(err, &map)],
            AssembleError::Compile(errors) => {
                errors.iter().map(|e| Diagnostic::compile(e, &map)).collect()
            }
        }
    }
}

/// Lex and compile `source` into an image and its source map.
pub fn assemble(source: &str) -> Result<Assembly, AssembleError> {
    let tokens = Lexer::new(source).tokenize()?;
    Ok(Compiler::new(&tokens, source).compile()?)
}

/// An error message tied to a place in the source, rendered as
///
/// ```text
/// error on line 2: runtime error: stack underflow
/// psh 1 add
/// ======^==
/// hint: ...
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub message: String,
    pub info: Option<SourceInfo>,
    pub hint: Option<String>,
}

impl Diagnostic {
    pub fn lexer(err: &LexerError, map: &SourceMap) -> Self {
        Diagnostic {
            message: format!("lexer error: {}", err),
            info: Some(map.info_at_char(err.pos)),
            hint: None,
        }
    }

    pub fn compile(err: &CompileError, map: &SourceMap) -> Self {
        Diagnostic {
            message: err.to_string(),
            info: Some(map.info_at_char(err.pos)),
            hint: err.kind.hint(),
        }
    }

    /// Resolves the error's bytecode offset through the map. An empty map
    /// (e.g. an image loaded without its source) yields no position.
    pub fn runtime(err: &RuntimeError, map: &SourceMap) -> Self {
        Diagnostic {
            message: err.to_string(),
            info: map.info_at_offset(err.offset),
            hint: runtime_hint(&err.kind),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.info {
            Some(info) => write!(f, "{}", info.render(&self.message))?,
            None => write!(f, "error: {}", self.message)?,
        }
        if let Some(hint) = &self.hint {
            write!(f, "\nhint: {}", hint)?;
        }
        Ok(())
    }
}

fn runtime_hint(kind: &RuntimeErrorKind) -> Option<String> {
    match kind {
        RuntimeErrorKind::StackNotEmpty(_) => {
            Some("remove leftover values with DEL before halting".to_string())
        }
        RuntimeErrorKind::CallStackOverflow => {
            Some("subroutine calls can only nest 16 deep".to_string())
        }
        RuntimeErrorKind::CallStackUnderflow => {
            Some("RET was reached without a matching JSR".to_string())
        }
        RuntimeErrorKind::CycleBudgetExceeded(_) => {
            Some("the program may be stuck in a loop".to_string())
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::vm_bc::{RunInput, VmBc};

    fn runtime_diagnostic(source: &str, run: RunInput) -> Diagnostic {
        let assembly = assemble(source).unwrap();
        let mut vm = VmBc::new(assembly.image, run);
        let err = vm.run().unwrap_err();
        Diagnostic::runtime(&err, &assembly.source_map)
    }

    #[test]
    fn test_lexer_error_points_at_char() {
        let source = "inp\nout ?";
        let err = assemble(source).unwrap_err();
        let diags = err.diagnostics(source);
        assert_eq!(diags.len(), 1);
        let text = diags[0].to_string();
        assert!(text.starts_with("error on line 2: lexer error: "));
        assert!(text.contains("\nout ?\n====^"));
    }

    #[test]
    fn test_every_compile_error_gets_a_diagnostic() {
        let source = "foo\nbar\npsh 1";
        let err = assemble(source).unwrap_err();
        let diags = err.diagnostics(source);
        assert_eq!(diags.len(), 2);
        assert_eq!(diags[1].info.as_ref().unwrap().line_number, 2);
    }

    #[test]
    fn test_undefined_label_diagnostic_has_hint() {
        let source = "inp\njmp #nowhere";
        let diags = assemble(source).unwrap_err().diagnostics(source);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].info.as_ref().unwrap().line_number, 2);
        assert!(diags[0].to_string().ends_with("hint: define it with 'LAB #NOWHERE'"));
    }

    #[test]
    fn test_runtime_error_resolves_to_instruction() {
        let diag = runtime_diagnostic("psh 1\nadd", RunInput::default());
        let rendered = diag.to_string();
        assert_eq!(
            rendered,
            "error on line 2: runtime error: stack underflow\nadd\n^=="
        );
    }

    #[test]
    fn test_runtime_error_inside_operand_uses_nearest_token() {
        let err = RuntimeError::new(RuntimeErrorKind::StackOverflow, 1);
        let assembly = assemble("psh 5\ninp").unwrap();
        let diag = Diagnostic::runtime(&err, &assembly.source_map);
        assert_eq!(diag.info.unwrap().line_number, 1);
    }

    #[test]
    fn test_mismatch_points_at_out() {
        let source = "psh 1 out\npsh 2 out";
        let diag = runtime_diagnostic(source, RunInput::default().expecting(vec![1, 3]));
        let info = diag.info.unwrap();
        assert_eq!(info.line_number, 2);
        assert_eq!(info.column, 6);
    }

    #[test]
    fn test_unpositioned_runtime_error() {
        let err = RuntimeError::new(RuntimeErrorKind::StackNotEmpty(2), 0);
        let diag = Diagnostic::runtime(&err, &SourceMap::default());
        let text = diag.to_string();
        assert!(text.starts_with("error: runtime error: stack must be empty"));
        assert!(text.contains("hint: remove leftover values"));
    }
}
