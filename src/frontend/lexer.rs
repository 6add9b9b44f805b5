use thiserror::Error;
use tracing::debug;

use crate::frontend::token::{Token, TokenKind};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LexerErrorKind {
    #[error("unexpected character '{0}'")]
    UnexpectedCharacter(char),
    #[error("invalid label name")]
    InvalidLabel,
    #[error("invalid register name")]
    InvalidRegister,
    #[error("invalid hex number")]
    InvalidHex,
    #[error("invalid number '{0}'")]
    InvalidNumber(String),
}

/// The first lexical error in a source; `pos` is a char offset.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}")]
pub struct LexerError {
    pub kind: LexerErrorKind,
    pub pos: usize,
}

impl LexerError {
    fn new(kind: LexerErrorKind, pos: usize) -> Self {
        LexerError { kind, pos }
    }
}

pub struct Lexer {
    source: Vec<char>,
    start: usize,
    pos: usize,
    line: usize,
}

impl Lexer {
    /// Mnemonics and labels are case-insensitive, so the source
    /// is folded to upper case up front. ASCII folding keeps char offsets
    /// aligned with the source text.
    pub fn new(source: &str) -> Self {
        Lexer {
            source: source.to_ascii_uppercase().chars().collect(),
            start: 0,
            pos: 0,
            line: 1,
        }
    }

    fn current(&self) -> Option<char> {
        self.source.get(self.pos).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.current();
        if ch == Some('\n') {
            self.line += 1;
        }
        self.pos += 1;
        ch
    }

    fn at(&self, pred: impl Fn(char) -> bool) -> bool {
        self.current().is_some_and(pred)
    }

    fn advance_while(&mut self, pred: impl Fn(char) -> bool) {
        while self.at(&pred) {
            self.advance();
        }
    }

    fn slice(&self, from: usize) -> String {
        self.source[from..self.pos].iter().collect()
    }

    fn error(&self, kind: LexerErrorKind) -> LexerError {
        LexerError::new(kind, self.start)
    }

    fn whitespace(&mut self) -> bool {
        if !self.at(is_whitespace) {
            return false;
        }
        self.advance_while(is_whitespace);
        true
    }

    fn comment(&mut self) -> bool {
        if self.current() != Some(';') {
            return false;
        }
        while let Some(ch) = self.advance() {
            if ch == '\n' {
                break;
            }
        }
        true
    }

    fn mnemonic(&mut self) -> Option<Token> {
        if !self.at(is_alpha) {
            return None;
        }
        self.advance_while(is_alpha);
        Some(Token::new(TokenKind::Mnemonic, self.slice(self.start), self.start))
    }

    fn label(&mut self) -> Option<Result<Token, LexerError>> {
        if self.current() != Some('#') {
            return None;
        }
        self.advance();
        if !self.at(is_alpha) {
            return Some(Err(self.error(LexerErrorKind::InvalidLabel)));
        }
        self.advance_while(is_alpha);
        Some(Ok(Token::new(
            TokenKind::Label,
            self.slice(self.start + 1),
            self.start,
        )))
    }

    fn register(&mut self) -> Option<Result<Token, LexerError>> {
        if self.current() != Some('&') {
            return None;
        }
        self.advance();
        let Some(digit) = self.current().filter(char::is_ascii_digit) else {
            return Some(Err(self.error(LexerErrorKind::InvalidRegister)));
        };
        self.advance();
        if self.at(|c| is_alpha(c) || c.is_ascii_digit()) {
            return Some(Err(self.error(LexerErrorKind::InvalidRegister)));
        }
        Some(Ok(Token::new(
            TokenKind::Register,
            digit.to_string(),
            self.start,
        )))
    }

    fn decimal(&mut self) -> Option<Result<Token, LexerError>> {
        if !self.at(|c| c.is_ascii_digit()) {
            return None;
        }
        self.advance_while(|c| c.is_ascii_digit());
        let digits = self.slice(self.start);
        Some(self.number(&digits, 10))
    }

    fn hex(&mut self) -> Option<Result<Token, LexerError>> {
        if self.current() != Some('$') {
            return None;
        }
        self.advance();
        if !self.at(|c| c.is_ascii_digit()) {
            return Some(Err(self.error(LexerErrorKind::InvalidHex)));
        }
        self.advance_while(|c| c.is_ascii_digit());
        let digits = self.slice(self.start + 1);
        Some(self.number(&digits, 16))
    }

    fn number(&self, digits: &str, radix: u32) -> Result<Token, LexerError> {
        let value = u16::from_str_radix(digits, radix)
            .map_err(|_| self.error(LexerErrorKind::InvalidNumber(digits.to_string())))?;
        Ok(Token::new(TokenKind::Number, value.to_string(), self.start))
    }

    pub fn tokenize(&mut self) -> Result<Vec<Token>, LexerError> {
        let mut tokens = Vec::new();

        while self.current().is_some() {
            self.start = self.pos;

            if self.whitespace() || self.comment() {
                continue;
            }
            if let Some(token) = self.mnemonic() {
                tokens.push(token);
                continue;
            }

            let lexed = self
                .label()
                .or_else(|| self.register())
                .or_else(|| self.decimal())
                .or_else(|| self.hex());

            match lexed {
                Some(token) => tokens.push(token?),
                None => {
                    let ch = self.current().unwrap_or_default();
                    return Err(self.error(LexerErrorKind::UnexpectedCharacter(ch)));
                }
            }
        }

        debug!(tokens = tokens.len(), lines = self.line, "lexed source");
        Ok(tokens)
    }
}

fn is_whitespace(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\r' | '\n')
}

fn is_alpha(c: char) -> bool {
    c.is_ascii_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(source: &str) -> Vec<(TokenKind, String)> {
        Lexer::new(source)
            .tokenize()
            .expect("lexing failed")
            .into_iter()
            .map(|t| (t.kind, t.literal))
            .collect()
    }

    fn lex_error(source: &str) -> LexerError {
        Lexer::new(source).tokenize().unwrap_err()
    }

    fn tok(kind: TokenKind, literal: &str) -> (TokenKind, String) {
        (kind, literal.to_string())
    }

    #[test]
    fn test_mnemonics_are_case_folded() {
        assert_eq!(
            tokens("inp Out aDd"),
            vec![
                tok(TokenKind::Mnemonic, "INP"),
                tok(TokenKind::Mnemonic, "OUT"),
                tok(TokenKind::Mnemonic, "ADD"),
            ]
        );
    }

    #[test]
    fn test_labels_registers_numbers() {
        assert_eq!(
            tokens("jmp #loop lod &3 psh 42"),
            vec![
                tok(TokenKind::Mnemonic, "JMP"),
                tok(TokenKind::Label, "LOOP"),
                tok(TokenKind::Mnemonic, "LOD"),
                tok(TokenKind::Register, "3"),
                tok(TokenKind::Mnemonic, "PSH"),
                tok(TokenKind::Number, "42"),
            ]
        );
    }

    #[test]
    fn test_hex_is_reemitted_as_decimal() {
        assert_eq!(
            tokens("$10 $99 $7"),
            vec![
                tok(TokenKind::Number, "16"),
                tok(TokenKind::Number, "153"),
                tok(TokenKind::Number, "7"),
            ]
        );
    }

    #[test]
    fn test_hex_digits_are_decimal_digits_only() {
        assert_eq!(
            tokens("$1add"),
            vec![tok(TokenKind::Number, "1"), tok(TokenKind::Mnemonic, "ADD")]
        );
    }

    #[test]
    fn test_comments_and_newlines_are_skipped() {
        assert_eq!(
            tokens("; header\ninp ; read\n\n  out\n;trailing"),
            vec![tok(TokenKind::Mnemonic, "INP"), tok(TokenKind::Mnemonic, "OUT")]
        );
    }

    #[test]
    fn test_mnemonic_is_maximal_letter_run() {
        assert_eq!(
            tokens("INPOUT12"),
            vec![
                tok(TokenKind::Mnemonic, "INPOUT"),
                tok(TokenKind::Number, "12"),
            ]
        );
    }

    #[test]
    fn test_token_positions_are_char_offsets() {
        let toks = Lexer::new("inp\n  #end &1").tokenize().unwrap();
        let positions: Vec<usize> = toks.iter().map(|t| t.pos).collect();
        assert_eq!(positions, vec![0, 6, 11]);
    }

    #[test]
    fn test_unexpected_character_error() {
        let err = lex_error("inp @");
        assert_eq!(err.kind, LexerErrorKind::UnexpectedCharacter('@'));
        assert_eq!(err.pos, 4);
        assert!(err.to_string().contains("unexpected character"));
    }

    #[test]
    fn test_invalid_label_error() {
        let err = lex_error("jmp #1");
        assert_eq!(err.kind, LexerErrorKind::InvalidLabel);
        assert_eq!(err.pos, 4);
    }

    #[test]
    fn test_register_needs_exactly_one_digit() {
        assert_eq!(lex_error("lod &").kind, LexerErrorKind::InvalidRegister);
        assert_eq!(lex_error("lod &12").kind, LexerErrorKind::InvalidRegister);
        assert_eq!(lex_error("lod &1x").kind, LexerErrorKind::InvalidRegister);
    }

    #[test]
    fn test_invalid_hex_error() {
        assert_eq!(lex_error("psh $").kind, LexerErrorKind::InvalidHex);
        assert_eq!(lex_error("psh $g").kind, LexerErrorKind::InvalidHex);
        assert_eq!(lex_error("psh $ff").kind, LexerErrorKind::InvalidHex);
    }

    #[test]
    fn test_number_too_large() {
        assert!(matches!(
            lex_error("psh 70000").kind,
            LexerErrorKind::InvalidNumber(_)
        ));
    }

    #[test]
    fn test_lexing_stops_at_first_error() {
        // the second bad character is never reached
        let err = lex_error("inp ! out ?");
        assert_eq!(err.kind, LexerErrorKind::UnexpectedCharacter('!'));
    }
}
