use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum CodegenError {
    /// Raised as soon as lowering reaches a construct this backend
    /// deliberately does not implement, never skipped over.
    #[error("`{0}` is not supported by this backend")]
    UnsupportedConstruct(&'static str),

    #[error("Internal error: `{0}` is not bound to a declaration")]
    UnboundReference(String),

    #[error("Internal error: `{0}` has no resolved type")]
    Untyped(String),
}

/// A fault while executing compiled units.
#[derive(Error, Debug, PartialEq)]
pub enum EvalError {
    #[error("No entry unit")]
    NoEntryUnit,

    #[error("Unknown unit `{0}`")]
    UnknownUnit(String),

    #[error("Unknown label `{0}`")]
    UnknownLabel(String),

    #[error("Undefined field `{0}`")]
    UndefinedField(String),

    #[error("No access link for depth {0}")]
    MissingAccessLink(usize),

    #[error("Operand stack underflow")]
    StackUnderflow,

    #[error("Expected a {expected} operand")]
    OperandMismatch { expected: &'static str },

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Uninitialized local slot {0}")]
    UninitializedLocal(usize),
}
