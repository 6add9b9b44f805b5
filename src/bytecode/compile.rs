use std::collections::HashMap;

use tracing::debug;

use crate::{
    bytecode::{
        compile_error::{CompileError, CompileErrorKind, CompileErrors},
        image::{BytecodeImage, CODE_SIZE},
        op::{Mnemonic, OperandKind},
    },
    frontend::{
        source_map::SourceMap,
        token::{Token, TokenKind},
    },
};

/// Output of a successful compile.
#[derive(Debug, Clone)]
pub struct Assembly {
    pub image: BytecodeImage,
    pub source_map: SourceMap,
}

#[derive(Debug)]
struct LabelEntry {
    name: String,
    address: u16,
    /// Char offset of the defining `LAB`; set once the label is resolved.
    defined_at: Option<usize>,
    /// Char offset of the first instruction that referenced the label.
    first_use: Option<usize>,
    /// Offsets of the two placeholder bytes written by each reference.
    patch_sites: Vec<u16>,
}

/// Labels for one compile, indexed by name, kept in first-mention order.
#[derive(Debug, Default)]
struct LabelTable {
    index: HashMap<String, usize>,
    entries: Vec<LabelEntry>,
}

impl LabelTable {
    fn entry(&mut self, name: &str) -> &mut LabelEntry {
        let idx = match self.index.get(name).copied() {
            Some(idx) => idx,
            None => {
                self.entries.push(LabelEntry {
                    name: name.to_string(),
                    address: 0,
                    defined_at: None,
                    first_use: None,
                    patch_sites: Vec::new(),
                });
                let idx = self.entries.len() - 1;
                self.index.insert(name.to_string(), idx);
                idx
            }
        };
        &mut self.entries[idx]
    }

    fn define(&mut self, name: &str, address: u16, pos: usize) -> Result<(), CompileErrorKind> {
        let entry = self.entry(name);
        if entry.defined_at.is_some() {
            return Err(CompileErrorKind::LabelReset(name.to_string()));
        }
        entry.address = address;
        entry.defined_at = Some(pos);
        Ok(())
    }

    fn add_patch_site(&mut self, name: &str, site: u16, pos: usize) {
        let entry = self.entry(name);
        entry.first_use.get_or_insert(pos);
        entry.patch_sites.push(site);
    }
}

pub struct Compiler<'a> {
    tokens: &'a [Token],
    current: usize,
    code: Vec<u8>,
    labels: LabelTable,
    source_map: SourceMap,
    errors: CompileErrors,
}

impl<'a> Compiler<'a> {
    /// `source` is only kept for diagnostics.
    pub fn new(tokens: &'a [Token], source: &str) -> Self {
        Self {
            tokens,
            current: 0,
            code: Vec::new(),
            labels: LabelTable::default(),
            source_map: SourceMap::new(source),
            errors: CompileErrors::default(),
        }
    }

    pub fn compile(mut self) -> Result<Assembly, CompileErrors> {
        self.emit_all();
        if !self.errors.is_empty() {
            return Err(self.errors);
        }

        self.resolve_labels();
        if !self.errors.is_empty() {
            return Err(self.errors);
        }

        debug!(
            bytes = self.code.len(),
            labels = self.labels.entries.len(),
            "assembled program"
        );

        let image = BytecodeImage::from_code(&self.code).map_err(|_| {
            CompileErrors(vec![CompileError::new(
                CompileErrorKind::CodeOverflow,
                self.tokens.last().map(|t| t.pos).unwrap_or_default(),
            )])
        })?;

        Ok(Assembly {
            image,
            source_map: self.source_map,
        })
    }

    fn advance(&mut self) -> Option<&'a Token> {
        let token = self.tokens.get(self.current)?;
        self.current += 1;
        Some(token)
    }

    fn offset(&self) -> u16 {
        self.code.len() as u16
    }

    fn emit(&mut self, byte: u8, at: &Token) -> Result<(), CompileError> {
        if self.code.len() >= CODE_SIZE {
            return Err(CompileError::new(CompileErrorKind::CodeOverflow, at.pos));
        }
        self.code.push(byte);
        Ok(())
    }

    fn emit_all(&mut self) {
        while let Some(token) = self.advance() {
            if let Err(e) = self.emit_instruction(token) {
                let stop = e.kind.is_structural();
                self.errors.push(e);
                if stop {
                    break;
                }
            }
        }
    }

    /// Emit one instruction. Whether the pass goes on after an error is up
    /// to `CompileErrorKind::is_structural`.
    fn emit_instruction(&mut self, token: &'a Token) -> Result<(), CompileError> {
        if token.kind != TokenKind::Mnemonic {
            return Err(CompileError::new(
                CompileErrorKind::NotAnOperation(token.literal.clone()),
                token.pos,
            ));
        }

        let Some(mnemonic) = Mnemonic::lookup(&token.literal) else {
            return Err(CompileError::new(
                CompileErrorKind::InvalidOpName(token.literal.clone()),
                token.pos,
            ));
        };

        let operand = mnemonic.operand();
        if operand == OperandKind::None {
            if let Mnemonic::Op(op) = mnemonic {
                self.source_map.add_token(self.offset(), token.clone());
                self.emit(op.code(), token)?;
            }
            return Ok(());
        }

        let Some(arg) = self.advance() else {
            return Err(CompileError::new(CompileErrorKind::UnexpectedEof, token.pos));
        };

        let expected = match operand {
            OperandKind::Number => TokenKind::Number,
            OperandKind::Register => TokenKind::Register,
            OperandKind::Label | OperandKind::None => TokenKind::Label,
        };
        let byte = operand_byte(arg, expected);
        if arg.kind != expected || (expected != TokenKind::Label && byte.is_none()) {
            return Err(CompileError::new(
                CompileErrorKind::UnexpectedOperand {
                    expected,
                    found: arg.kind,
                },
                arg.pos,
            ));
        }

        let op = match mnemonic {
            Mnemonic::Op(op) => op,
            Mnemonic::DefineLabel => {
                let address = self.offset();
                return self
                    .labels
                    .define(&arg.literal, address, token.pos)
                    .map_err(|kind| CompileError::new(kind, arg.pos));
            }
        };

        self.source_map.add_token(self.offset(), token.clone());
        self.emit(op.code(), token)?;

        match byte {
            Some(byte) => self.emit(byte, token)?,
            None => {
                let site = self.offset();
                self.labels.add_patch_site(&arg.literal, site, token.pos);
                self.emit(0, token)?;
                self.emit(0, token)?;
            }
        }
        Ok(())
    }

    fn resolve_labels(&mut self) {
        for entry in &self.labels.entries {
            if entry.defined_at.is_none() {
                let pos = entry.first_use.unwrap_or_default();
                self.errors.push(CompileError::new(
                    CompileErrorKind::LabelNeverSet(entry.name.clone()),
                    pos,
                ));
                continue;
            }

            let [high, low] = entry.address.to_be_bytes();
            for site in &entry.patch_sites {
                let site = *site as usize;
                self.code[site] = high;
                self.code[site + 1] = low;
            }
        }
    }
}

/// The single operand byte for number and register operands.
fn operand_byte(arg: &Token, expected: TokenKind) -> Option<u8> {
    match (arg.kind, expected) {
        (TokenKind::Number, TokenKind::Number) => {
            arg.literal.parse::<u16>().ok().map(|v| v as u8)
        }
        (TokenKind::Register, TokenKind::Register) => arg.literal.parse::<u8>().ok(),
        _ => None,
    }
}
