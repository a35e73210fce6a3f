//! Type inference over the scope-resolved tree.
//!
//! There is no type annotation syntax, so types flow bidirectionally
//! between expressions and the declarations they reference. Full-tree
//! passes repeat until a pass assigns no new type: if the tree is
//! fully typed by then the program is accepted, otherwise it is
//! under-constrained and rejected.
use crate::sem::{SemanticError, Type};
use crate::syntax::{
    BinaryOperator, Block, Declaration, Expression, ExpressionKind, Ident, Program, Statement,
};
use log::debug;
use std::rc::Rc;

#[derive(Debug, Default)]
pub struct TypeInferencer {
    /// Type assignments newly made in the current pass.
    changes: usize,
}

impl TypeInferencer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn infer(&mut self, program: &Program) -> Result<(), SemanticError> {
        // A fixpoint cannot need more passes than there are nodes to
        // newly type; more passes than that is an inference bug, not
        // slow convergence.
        let limit = block_size(&program.block);
        let mut passes = 0;

        loop {
            let typed = self.infer_block(&program.block)?;

            passes += 1;
            debug!("pass {}: {} new type assignments", passes, self.changes);

            if typed {
                return Ok(());
            }
            if self.changes == 0 {
                return Err(SemanticError::Unresolved);
            }
            if passes > limit {
                return Err(SemanticError::DivergentInference(passes));
            }

            self.changes = 0;
        }
    }

    fn infer_block(&mut self, block: &Block) -> Result<bool, SemanticError> {
        let mut typed = true;

        for declaration in &block.constants {
            // A constant's type is known from its literal value.
            if let Some(value) = declaration.constant_value() {
                self.declare_type(declaration, value.r#type())?;
            }
        }

        for declaration in &block.variables {
            // Variables pick up types from assignments elsewhere; an
            // unused variable never becomes typed and keeps the tree
            // incomplete.
            typed &= declaration.r#type().is_some();
        }

        for declaration in &block.procedures {
            self.declare_type(declaration, Type::Procedure)?;
            if let Some(body) = declaration.block() {
                typed &= self.infer_block(body)?;
            }
        }

        typed &= self.infer_statement(&block.statement)?;
        Ok(typed)
    }

    fn infer_statement(&mut self, statement: &Statement) -> Result<bool, SemanticError> {
        match statement {
            Statement::Assign { target, expression } => {
                let expression_typed = self.infer_expression(expression)?;
                let declaration = self.declaration_of(target)?;

                if declaration.is_constant() {
                    return Err(SemanticError::AssignToConstant(target.name().to_string()));
                }

                let expression_type = expression.r#type();
                let target_type = declaration.r#type();

                match (expression_type, target_type) {
                    (Some(ty), None) => self.declare_type(&declaration, ty)?,
                    (None, Some(ty)) => self.express_type(expression, ty)?,
                    _ => {}
                }

                if let (Some(found), Some(expected)) = (expression_type, target_type) {
                    if found != expected {
                        return Err(SemanticError::TypeConflict { expected, found });
                    }
                    if found == Type::Procedure {
                        return Err(SemanticError::AssignToProcedure(target.name().to_string()));
                    }
                }

                Ok(expression_typed & expression.r#type().is_some())
            }
            Statement::Call { procedure } => {
                let declaration = self.declaration_of(procedure)?;

                match declaration.r#type() {
                    Some(Type::Procedure) => Ok(true),
                    Some(_) => Err(SemanticError::NotCallable(procedure.name().to_string())),
                    None => Ok(false),
                }
            }
            Statement::Input { target } => {
                let declaration = self.declaration_of(target)?;

                if declaration.is_constant() {
                    return Err(SemanticError::InputToConstant(target.name().to_string()));
                }

                match declaration.r#type() {
                    Some(Type::Procedure) => {
                        Err(SemanticError::InputToProcedure(target.name().to_string()))
                    }
                    Some(_) => Ok(true),
                    None => Ok(false),
                }
            }
            Statement::Output { expression } => {
                let expression_typed = self.infer_expression(expression)?;

                match expression.r#type() {
                    Some(Type::Procedure) => Err(SemanticError::InvalidOutput(Type::Procedure)),
                    Some(_) => Ok(expression_typed),
                    None => Ok(false),
                }
            }
            Statement::Compound(statements) => {
                let mut typed = true;

                for statement in statements {
                    typed &= self.infer_statement(statement)?;
                }
                Ok(typed)
            }
            Statement::If { condition, body } | Statement::While { condition, body } => {
                let mut typed = self.infer_expression(condition)?;

                typed &= self.infer_statement(body)?;

                if let Some(found) = condition.r#type() {
                    if found != Type::Boolean {
                        return Err(SemanticError::TypeConflict {
                            expected: Type::Boolean,
                            found,
                        });
                    }
                }
                Ok(typed)
            }
            Statement::Empty => Ok(true),
        }
    }

    fn infer_expression(&mut self, expression: &Expression) -> Result<bool, SemanticError> {
        match expression.kind() {
            ExpressionKind::Literal(value) => {
                self.express_type(expression, value.r#type())?;
                Ok(true)
            }
            ExpressionKind::Ident(ident) => {
                let declaration = self.declaration_of(ident)?;

                // A declaration's type is shared by every reference to
                // it, in whichever direction it is known first.
                if let Some(ty) = expression.r#type() {
                    self.declare_type(&declaration, ty)?;
                } else if let Some(ty) = declaration.r#type() {
                    self.express_type(expression, ty)?;
                }

                Ok(expression.r#type().is_some())
            }
            ExpressionKind::Binary { op, lhs, rhs } => {
                self.infer_binary_expression(expression, *op, lhs, rhs)
            }
        }
    }

    fn infer_binary_expression(
        &mut self,
        expression: &Expression,
        op: BinaryOperator,
        lhs: &Expression,
        rhs: &Expression,
    ) -> Result<bool, SemanticError> {
        // A known result type constrains the operands, except for
        // comparisons whose Boolean result says nothing about them.
        if let Some(ty) = expression.r#type() {
            if !op.is_comparison() {
                self.express_type(lhs, ty)?;
                self.express_type(rhs, ty)?;
            }
        }

        let typed = self.infer_expression(lhs)? & self.infer_expression(rhs)?;

        let mut left = lhs.r#type();
        let mut right = rhs.r#type();

        // Operands must agree, so a one-sided type crosses over.
        match (left, right) {
            (None, Some(ty)) => {
                self.express_type(lhs, ty)?;
                left = right;
            }
            (Some(ty), None) => {
                self.express_type(rhs, ty)?;
                right = left;
            }
            _ => {}
        }

        if let (Some(l), Some(r)) = (left, right) {
            if l != r {
                return Err(SemanticError::TypeConflict {
                    expected: l,
                    found: r,
                });
            }
        }

        if let Some(operand) = left {
            match op {
                BinaryOperator::Add => {
                    // Numeric addition, boolean OR or string
                    // concatenation.
                    if operand == Type::Procedure {
                        return Err(SemanticError::InvalidOperand { op, operand });
                    }
                    self.express_type(expression, operand)?;
                }
                BinaryOperator::Sub | BinaryOperator::Div | BinaryOperator::Mod => {
                    if operand != Type::Number {
                        return Err(SemanticError::InvalidOperand { op, operand });
                    }
                    self.express_type(expression, Type::Number)?;
                }
                BinaryOperator::Mul => {
                    // Numeric multiplication or boolean AND.
                    if operand != Type::Number && operand != Type::Boolean {
                        return Err(SemanticError::InvalidOperand { op, operand });
                    }
                    self.express_type(expression, operand)?;
                }
                BinaryOperator::Eq
                | BinaryOperator::Ne
                | BinaryOperator::Lt
                | BinaryOperator::Le
                | BinaryOperator::Gt
                | BinaryOperator::Ge => {
                    if operand == Type::Procedure {
                        return Err(SemanticError::InvalidOperand { op, operand });
                    }
                    self.express_type(expression, Type::Boolean)?;
                }
            }
        }

        Ok(typed & expression.r#type().is_some())
    }

    fn declaration_of(&self, ident: &Ident) -> Result<Rc<Declaration>, SemanticError> {
        ident
            .declaration()
            .ok_or_else(|| SemanticError::UndefinedReference(ident.name().to_string()))
    }

    /// Assigns a type to a declaration. Once set, a differing
    /// assignment is a conflict, never an overwrite.
    fn declare_type(&mut self, declaration: &Declaration, ty: Type) -> Result<(), SemanticError> {
        match declaration.r#type() {
            None => {
                declaration.assign_type(ty);
                self.changes += 1;
                Ok(())
            }
            Some(existing) if existing != ty => Err(SemanticError::TypeConflict {
                expected: existing,
                found: ty,
            }),
            Some(_) => Ok(()),
        }
    }

    /// Assigns a type to an expression node, with the same
    /// set-exactly-once contract as [`TypeInferencer::declare_type`].
    fn express_type(&mut self, expression: &Expression, ty: Type) -> Result<(), SemanticError> {
        match expression.r#type() {
            None => {
                expression.assign_type(ty);
                self.changes += 1;
                Ok(())
            }
            Some(existing) if existing != ty => Err(SemanticError::TypeConflict {
                expected: existing,
                found: ty,
            }),
            Some(_) => Ok(()),
        }
    }
}

fn block_size(block: &Block) -> usize {
    let mut size = 1;

    size += block.constants.len() + block.variables.len();
    for declaration in &block.procedures {
        size += 1;
        if let Some(body) = declaration.block() {
            size += block_size(body);
        }
    }

    size + statement_size(&block.statement)
}

fn statement_size(statement: &Statement) -> usize {
    match statement {
        Statement::Assign { expression, .. } => 2 + expression_size(expression),
        Statement::Call { .. } | Statement::Input { .. } => 2,
        Statement::Output { expression } => 1 + expression_size(expression),
        Statement::Compound(statements) => {
            1 + statements.iter().map(statement_size).sum::<usize>()
        }
        Statement::If { condition, body } | Statement::While { condition, body } => {
            1 + expression_size(condition) + statement_size(body)
        }
        Statement::Empty => 1,
    }
}

fn expression_size(expression: &Expression) -> usize {
    match expression.kind() {
        ExpressionKind::Binary { lhs, rhs, .. } => {
            1 + expression_size(lhs) + expression_size(rhs)
        }
        ExpressionKind::Ident(_) | ExpressionKind::Literal(_) => 1,
    }
}
