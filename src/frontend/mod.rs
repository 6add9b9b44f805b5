pub mod lexer;
pub mod source_map;
pub mod token;
pub mod token_dumper;

pub use lexer::Lexer;
pub use source_map::SourceMap;
pub use token::{Token, TokenKind};
