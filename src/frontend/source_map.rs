use std::collections::BTreeMap;

use crate::frontend::token::Token;

/// Where a char offset falls in the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceInfo {
    /// Text of the enclosing line, without its newline.
    pub line: String,
    /// 1-based.
    pub line_number: usize,
    /// 0-based char column within `line`.
    pub column: usize,
}

/// Maps bytecode offsets back to the tokens that produced them, and char
/// offsets back to lines.
#[derive(Debug, Clone, Default)]
pub struct SourceMap {
    source: String,
    tokens: BTreeMap<u16, Token>,
}

impl SourceMap {
    pub fn new(source: impl Into<String>) -> Self {
        SourceMap {
            source: source.into(),
            tokens: BTreeMap::new(),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Record the token an instruction starting at `offset` came from.
    pub fn add_token(&mut self, offset: u16, token: Token) {
        self.tokens.insert(offset, token);
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Token recorded at `offset`, or the one recorded closest to it when
    /// `offset` lies inside an operand. Ties go to the lower offset.
    pub fn token_at(&self, offset: u16) -> Option<&Token> {
        let below = self.tokens.range(..=offset).next_back();
        let above = self.tokens.range(offset..).next();

        match (below, above) {
            (Some((lo, lo_tok)), Some((hi, hi_tok))) => {
                if offset - lo <= hi - offset {
                    Some(lo_tok)
                } else {
                    Some(hi_tok)
                }
            }
            (Some((_, tok)), None) | (None, Some((_, tok))) => Some(tok),
            (None, None) => None,
        }
    }

    pub fn info_at_offset(&self, offset: u16) -> Option<SourceInfo> {
        self.token_at(offset).map(|t| self.info_at_char(t.pos))
    }

    pub fn info_at_char(&self, char_pos: usize) -> SourceInfo {
        let mut line_number = 1;
        let mut line_start = 0;

        for (idx, ch) in self.source.chars().enumerate() {
            if idx >= char_pos {
                break;
            }
            if ch == '\n' {
                line_number += 1;
                line_start = idx + 1;
            }
        }

        let line: String = self
            .source
            .chars()
            .skip(line_start)
            .take_while(|c| *c != '\n')
            .collect();
        let line = line.strip_suffix('\r').map(str::to_string).unwrap_or(line);

        SourceInfo {
            line,
            line_number,
            column: char_pos - line_start,
        }
    }
}

impl SourceInfo {
    /// `error on line N: message`, the line, then a `=` ruler with `^`
    /// under the column.
    pub fn render(&self, message: &str) -> String {
        let width = self.line.chars().count().max(self.column + 1);
        let marker: String = (0..width)
            .map(|idx| if idx == self.column { '^' } else { '=' })
            .collect();
        format!(
            "error on line {}: {}\n{}\n{}",
            self.line_number, message, self.line, marker
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::token::TokenKind;

    fn map_with(offsets: &[(u16, usize)]) -> SourceMap {
        let mut map = SourceMap::new("inp\npsh 5\nadd\n");
        for (offset, pos) in offsets {
            map.add_token(*offset, Token::new(TokenKind::Mnemonic, "X", *pos));
        }
        map
    }

    #[test]
    fn test_exact_offset_lookup() {
        let map = map_with(&[(0, 0), (1, 4), (3, 10)]);
        assert_eq!(map.token_at(1).map(|t| t.pos), Some(4));
        assert_eq!(map.token_at(3).map(|t| t.pos), Some(10));
    }

    #[test]
    fn test_operand_offset_falls_back_to_nearest() {
        // offset 2 is PSH's operand byte: one away from both neighbours
        let map = map_with(&[(0, 0), (1, 4), (3, 10)]);
        assert_eq!(map.token_at(2).map(|t| t.pos), Some(4));

        let map = map_with(&[(0, 0), (5, 4)]);
        assert_eq!(map.token_at(4).map(|t| t.pos), Some(4));
        assert_eq!(map.token_at(100).map(|t| t.pos), Some(4));
    }

    #[test]
    fn test_empty_map_has_no_token() {
        assert!(SourceMap::new("").token_at(0).is_none());
    }

    #[test]
    fn test_info_at_char() {
        let map = SourceMap::new("inp\npsh 5\nadd\n");
        assert_eq!(
            map.info_at_char(8),
            SourceInfo {
                line: "psh 5".to_string(),
                line_number: 2,
                column: 4,
            }
        );
        assert_eq!(map.info_at_char(0).line_number, 1);
        assert_eq!(map.info_at_char(10).line, "add");
    }

    #[test]
    fn test_info_strips_carriage_return() {
        let map = SourceMap::new("inp\r\nout\r\n");
        let info = map.info_at_char(5);
        assert_eq!(info.line, "out");
        assert_eq!(info.line_number, 2);
        assert_eq!(info.column, 0);
    }

    #[test]
    fn test_render_places_caret_under_column() {
        let map = SourceMap::new("inp\npsh ?\n");
        let info = map.info_at_char(8);
        let rendered = info.render("unexpected character '?'");
        assert_eq!(
            rendered,
            "error on line 2: unexpected character '?'\npsh ?\n====^"
        );
    }

    #[test]
    fn test_render_caret_past_end_of_line() {
        let map = SourceMap::new("jmp");
        let info = map.info_at_char(3);
        assert!(info.render("unexpected EOF").ends_with("===^"));
    }
}
