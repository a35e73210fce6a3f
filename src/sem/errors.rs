use crate::sem::Type;
use crate::syntax::BinaryOperator;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum SemanticError {
    #[error("`{0}` is already declared in this scope")]
    DuplicateDeclaration(String),

    #[error("Undefined reference `{0}`")]
    UndefinedReference(String),

    #[error("Type conflict: expected {expected}, but was {found}")]
    TypeConflict { expected: Type, found: Type },

    #[error("Operator `{op}` is not defined for {operand} operands")]
    InvalidOperand { op: BinaryOperator, operand: Type },

    #[error("Cannot assign to constant `{0}`")]
    AssignToConstant(String),

    #[error("Cannot assign to procedure `{0}`")]
    AssignToProcedure(String),

    #[error("`{0}` is not a procedure")]
    NotCallable(String),

    #[error("Cannot read into constant `{0}`")]
    InputToConstant(String),

    #[error("Cannot read into procedure `{0}`")]
    InputToProcedure(String),

    #[error("Cannot output a {0} value")]
    InvalidOutput(Type),

    #[error("Program is not fully typed and no further types can be inferred")]
    Unresolved,

    #[error("Type inference did not settle after {0} passes")]
    DivergentInference(usize),
}
