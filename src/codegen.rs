pub mod compiler;
pub mod errors;
pub mod machine;
pub mod unit;

pub use compiler::compile;
pub use errors::{CodegenError, EvalError};
pub use machine::{Machine, Value};
pub use unit::{Condition, Field, Op, Representation, Unit};
