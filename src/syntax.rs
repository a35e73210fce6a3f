pub mod errors;
pub mod parser;
pub mod tokenizer;
pub mod tree;

pub use errors::{ParseError, ParseErrorKind};
pub use parser::Parser;
pub use tokenizer::{EffectiveRange, Position, Token, TokenError, TokenKind, Tokenizer};
pub use tree::{
    BinaryOperator, Block, ConstValue, Declaration, DeclarationKind, Expression, ExpressionKind,
    Ident, Program, Statement,
};
