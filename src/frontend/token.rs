#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Mnemonic,
    Label,
    Number,
    Register,
}

impl TokenKind {
    pub fn describe(self) -> &'static str {
        match self {
            TokenKind::Mnemonic => "mnemonic",
            TokenKind::Label => "label",
            TokenKind::Number => "number",
            TokenKind::Register => "register",
        }
    }
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.describe())
    }
}

/// A lexed token.
///
/// `literal` is already upper-cased. Labels drop their `#`, registers keep
/// only the digit and hex numbers are re-emitted in decimal. `pos` is the
/// char offset of the first character of the token in the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub literal: String,
    pub pos: usize,
}

impl Token {
    pub fn new(kind: TokenKind, literal: impl Into<String>, pos: usize) -> Self {
        Token {
            kind,
            literal: literal.into(),
            pos,
        }
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            TokenKind::Mnemonic | TokenKind::Number => write!(f, "{}", self.literal),
            TokenKind::Label => write!(f, "#{}", self.literal),
            TokenKind::Register => write!(f, "&{}", self.literal),
        }
    }
}
