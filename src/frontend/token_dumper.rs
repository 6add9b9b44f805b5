use crate::bytecode::op::{InstructionTable, Mnemonic};
use crate::frontend::source_map::SourceMap;
use crate::frontend::token::{Token, TokenKind};

pub struct TokenDumper {
    pub color: bool,
}

impl Default for TokenDumper {
    fn default() -> Self {
        Self { color: true }
    }
}

impl TokenDumper {
    // ANSI colors
    const RESET: &'static str = "\x1b[0m";
    const RED: &'static str = "\x1b[31m";
    const GRN: &'static str = "\x1b[32m";
    const YEL: &'static str = "\x1b[33m";
    const CYN: &'static str = "\x1b[36m";
    const MAG: &'static str = "\x1b[35m";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn no_color(mut self) -> Self {
        self.color = false;
        self
    }

    pub fn dump(&self, tokens: &[Token], source: &SourceMap) {
        print!("{}", self.render(tokens, source));
    }

    /// One line per token: `[line:col] KIND text`.
    pub fn render(&self, tokens: &[Token], source: &SourceMap) -> String {
        let mut out = String::new();
        for token in tokens {
            let info = source.info_at_char(token.pos);
            let (colr, reset) = if self.color {
                (self.color(token), Self::RESET)
            } else {
                ("", "")
            };
            out.push_str(&format!(
                "[{:02}:{:02}] {}{:<8} {}{}\n",
                info.line_number,
                info.column,
                colr,
                self.kind(token),
                token,
                reset
            ));
        }
        out
    }

    fn kind(&self, t: &Token) -> &'static str {
        match t.kind {
            TokenKind::Mnemonic => "OP",
            TokenKind::Label => "LABEL",
            TokenKind::Number => "NUMBER",
            TokenKind::Register => "REGISTER",
        }
    }

    fn color(&self, t: &Token) -> &'static str {
        match t.kind {
            // unknown mnemonics stand out before compile reports them
            TokenKind::Mnemonic => match InstructionTable::get().by_name(&t.literal) {
                Some(Mnemonic::DefineLabel) => Self::GRN,
                Some(Mnemonic::Op(_)) => Self::MAG,
                None => Self::RED,
            },
            TokenKind::Label => Self::YEL,
            TokenKind::Number | TokenKind::Register => Self::CYN,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::lexer::Lexer;

    fn render(source: &str, dumper: TokenDumper) -> String {
        let tokens = Lexer::new(source).tokenize().unwrap();
        dumper.render(&tokens, &SourceMap::new(source))
    }

    #[test]
    fn test_plain_dump() {
        let out = render("inp\n  psh $10 ; sixteen\nlab #end", TokenDumper::new().no_color());
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[0], "[01:00] OP       INP");
        assert_eq!(lines[2], "[02:06] NUMBER   16");
        assert_eq!(lines[4], "[03:04] LABEL    #END");
    }

    #[test]
    fn test_color_dump_flags_unknown_ops() {
        let out = render("nop", TokenDumper::new());
        assert!(out.contains(TokenDumper::RED));
        assert!(out.ends_with("\x1b[0m\n"));
    }
}
