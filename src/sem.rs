pub mod errors;
pub mod inferencer;
pub mod resolver;
pub mod scope;

pub use errors::SemanticError;
pub use inferencer::TypeInferencer;
pub use resolver::ScopeResolver;
pub use scope::ScopeTable;

use crate::syntax::Program;
use std::fmt;

/// The type of a declaration or an expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Type {
    Number,
    Boolean,
    String,
    /// Assigned to procedure declarations only; procedures are not
    /// values.
    Procedure,
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Number => write!(f, "number"),
            Type::Boolean => write!(f, "boolean"),
            Type::String => write!(f, "string"),
            Type::Procedure => write!(f, "procedure"),
        }
    }
}

/// Runs the semantic passes in order. A failed pass aborts the
/// pipeline; the next pass never sees a tree the previous one
/// rejected.
pub fn analyze(program: &Program) -> Result<(), SemanticError> {
    ScopeResolver::new().resolve(program)?;
    TypeInferencer::new().infer(program)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::{Parser, Tokenizer};
    use assert_matches::assert_matches;

    #[test]
    fn analyze_runs_both_passes() {
        let mut tokenizer = Tokenizer::from_string(
            "
            VAR x;
            BEGIN x := 1; !x END.
            ",
        );
        let program = Parser::new().parse(&mut tokenizer).unwrap();

        analyze(&program).unwrap();

        assert_eq!(program.block.variables[0].r#type(), Some(Type::Number));
        assert_eq!(program.block.variables[0].depth(), Some(0));
    }

    #[test]
    fn analyze_stops_at_scope_errors() {
        let mut tokenizer = Tokenizer::from_string("BEGIN y := 1 END.");
        let program = Parser::new().parse(&mut tokenizer).unwrap();

        assert_matches!(
            analyze(&program),
            Err(SemanticError::UndefinedReference(name)) => {
                assert_eq!(name, "y");
            }
        );
    }
}
