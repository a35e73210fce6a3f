//! Scope resolution: a single walk binding every identifier reference
//! to its declaration and stamping nesting depths.
use crate::sem::scope::ScopeTable;
use crate::sem::SemanticError;
use crate::syntax::{Block, Expression, ExpressionKind, Ident, Program, Statement};
use log::debug;

#[derive(Debug, Default)]
pub struct ScopeResolver {
    scopes: ScopeTable,
}

impl ScopeResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolution stops at the first duplicate declaration or
    /// undefined reference.
    pub fn resolve(&mut self, program: &Program) -> Result<(), SemanticError> {
        self.resolve_block(&program.block)
    }

    fn resolve_block(&mut self, block: &Block) -> Result<(), SemanticError> {
        self.scopes.enter_scope();
        let result = self.resolve_scoped_block(block);

        // The scope must be closed on the error path too.
        self.scopes.exit_scope();
        result
    }

    fn resolve_scoped_block(&mut self, block: &Block) -> Result<(), SemanticError> {
        for declaration in block.constants.iter().chain(&block.variables) {
            let depth = self.scopes.insert(declaration)?;
            declaration.assign_depth(depth);
        }

        // All procedure names are inserted before any body is visited,
        // so a body can call siblings declared after it.
        for declaration in &block.procedures {
            let depth = self.scopes.insert(declaration)?;
            declaration.assign_depth(depth);
        }

        for declaration in &block.procedures {
            if let Some(body) = declaration.block() {
                self.resolve_block(body)?;
            }
        }

        self.resolve_statement(&block.statement)
    }

    fn resolve_statement(&mut self, statement: &Statement) -> Result<(), SemanticError> {
        match statement {
            Statement::Assign { target, expression } => {
                self.resolve_ident(target)?;
                self.resolve_expression(expression)
            }
            Statement::Call { procedure } => self.resolve_ident(procedure),
            Statement::Input { target } => self.resolve_ident(target),
            Statement::Output { expression } => self.resolve_expression(expression),
            Statement::Compound(statements) => {
                for statement in statements {
                    self.resolve_statement(statement)?;
                }
                Ok(())
            }
            Statement::If { condition, body } | Statement::While { condition, body } => {
                self.resolve_expression(condition)?;
                self.resolve_statement(body)
            }
            Statement::Empty => Ok(()),
        }
    }

    fn resolve_expression(&mut self, expression: &Expression) -> Result<(), SemanticError> {
        match expression.kind() {
            ExpressionKind::Binary { lhs, rhs, .. } => {
                self.resolve_expression(lhs)?;
                self.resolve_expression(rhs)
            }
            ExpressionKind::Ident(ident) => self.resolve_ident(ident),
            ExpressionKind::Literal(_) => Ok(()),
        }
    }

    fn resolve_ident(&mut self, ident: &Ident) -> Result<(), SemanticError> {
        let declaration = self.scopes.lookup(ident.name())?;

        ident.bind(&declaration);
        // The depth of the reference site, not the declaration's.
        ident.assign_depth(self.scopes.depth());

        debug!(
            "bound `{}` (depth {:?}) referenced at depth {}",
            ident.name(),
            declaration.depth(),
            self.scopes.depth()
        );
        Ok(())
    }
}
