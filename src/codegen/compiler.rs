//! Lowers the analyzed tree into units.
//!
//! Every block becomes a unit; every procedure call becomes
//! new-instance-plus-call on the callee's unit; every reference to a
//! declaration of an enclosing block goes through the access link for
//! the declaring depth. The walk threads its surroundings explicitly
//! as a [`UnitContext`] instead of mutating compiler state.
use crate::codegen::errors::CodegenError;
use crate::codegen::unit::{Condition, Field, Op, Representation, Unit};
use crate::sem::Type;
use crate::syntax::{
    BinaryOperator, Block, ConstValue, Declaration, Expression, ExpressionKind, Ident, Program,
    Statement,
};
use crate::util::naming::SequenceNaming;
use log::debug;
use std::rc::Rc;

/// Compiles a program into units, the entry unit first.
pub fn compile(program: &Program, name: &str) -> Result<Vec<Unit>, CodegenError> {
    let mut compiler = ClosureCompiler::new();

    compiler.compile_block(&program.block, UnitContext::entry(name))?;
    Ok(compiler.units)
}

/// The lexical surroundings of the unit being compiled: its own name
/// and the names of all enclosing units, outermost first.
#[derive(Debug, Clone)]
struct UnitContext {
    name: String,
    enclosing: Vec<String>,
}

impl UnitContext {
    fn entry(name: &str) -> Self {
        Self {
            name: name.to_string(),
            enclosing: vec![],
        }
    }

    fn depth(&self) -> usize {
        self.enclosing.len()
    }

    /// The context of a procedure declared directly inside this unit.
    fn nested(&self, procedure: &str) -> Self {
        let mut enclosing = self.enclosing.clone();

        enclosing.push(self.name.clone());
        Self {
            name: format!("{}${}", self.name, procedure),
            enclosing,
        }
    }

    /// The name of the unit at `depth` on the static chain.
    fn unit_at(&self, depth: usize) -> &str {
        if depth == self.depth() {
            self.name.as_str()
        } else {
            self.enclosing[depth].as_str()
        }
    }
}

#[derive(Debug, Default)]
struct ClosureCompiler {
    units: Vec<Unit>,
    labels: SequenceNaming,
}

impl ClosureCompiler {
    fn new() -> Self {
        Self::default()
    }

    fn compile_block(&mut self, block: &Block, context: UnitContext) -> Result<(), CodegenError> {
        let mut fields = vec![];
        let mut body = vec![];

        // Constants become immutable fields initialized to their
        // literal value, then variables follow with their defaults.
        for declaration in &block.constants {
            let representation = Representation::of(self.type_of(declaration)?);
            let name = declaration.name().to_string();

            if let Some(value) = declaration.constant_value() {
                body.push(Op::LoadSelf);
                body.push(Op::Const(value.clone()));
                body.push(Op::StoreField {
                    name: name.clone(),
                    representation,
                });
            }

            fields.push(Field {
                name,
                representation,
                mutable: false,
            });
        }

        for declaration in &block.variables {
            let r#type = self.type_of(declaration)?;
            let representation = Representation::of(r#type);
            let name = declaration.name().to_string();

            body.push(Op::LoadSelf);
            body.push(Op::Const(default_value(r#type)));
            body.push(Op::StoreField {
                name: name.clone(),
                representation,
            });

            fields.push(Field {
                name,
                representation,
                mutable: true,
            });
        }

        let nested = block
            .procedures
            .iter()
            .map(|declaration| format!("{}${}", context.name, declaration.name()))
            .collect();

        self.compile_statement(&block.statement, &context, &mut body)?;
        body.push(Op::Return);

        debug!("compiled unit `{}` ({} ops)", context.name, body.len());
        self.units.push(Unit::new(
            context.name.clone(),
            context.enclosing.clone(),
            fields,
            nested,
            body,
        ));

        for declaration in &block.procedures {
            if let Some(block) = declaration.block() {
                self.compile_block(block, context.nested(declaration.name()))?;
            }
        }

        Ok(())
    }

    fn compile_statement(
        &mut self,
        statement: &Statement,
        context: &UnitContext,
        body: &mut Vec<Op>,
    ) -> Result<(), CodegenError> {
        match statement {
            Statement::Assign { target, expression } => {
                let declaration = self.declaration_of(target)?;

                self.load_owner(target, &declaration, body)?;
                self.compile_expression(expression, context, body)?;
                body.push(Op::StoreField {
                    name: declaration.name().to_string(),
                    representation: Representation::of(self.type_of(&declaration)?),
                });
                Ok(())
            }
            Statement::Call { procedure } => {
                let declaration = self.declaration_of(procedure)?;
                let depth = self.depth_of(procedure, &declaration)?.0;

                // The callee's unit is nested in the unit that
                // declares the procedure.
                let unit = format!("{}${}", context.unit_at(depth), declaration.name());

                body.push(Op::New(unit.clone()));
                body.push(Op::Call(unit));
                Ok(())
            }
            Statement::Input { .. } => Err(CodegenError::UnsupportedConstruct("?")),
            Statement::While { .. } => Err(CodegenError::UnsupportedConstruct("WHILE")),
            Statement::Output { expression } => {
                self.compile_expression(expression, context, body)?;
                body.push(Op::Output);
                Ok(())
            }
            Statement::Compound(statements) => {
                for statement in statements {
                    self.compile_statement(statement, context, body)?;
                }
                Ok(())
            }
            Statement::If { condition, body: then } => {
                let end = self.labels.next("endif");

                self.compile_expression(condition, context, body)?;
                body.push(Op::Branch {
                    condition: Condition::False,
                    target: end.clone(),
                });
                self.compile_statement(then, context, body)?;
                body.push(Op::Label(end));
                Ok(())
            }
            Statement::Empty => Ok(()),
        }
    }

    fn compile_expression(
        &mut self,
        expression: &Expression,
        context: &UnitContext,
        body: &mut Vec<Op>,
    ) -> Result<(), CodegenError> {
        match expression.kind() {
            ExpressionKind::Literal(value) => {
                body.push(Op::Const(value.clone()));
                Ok(())
            }
            ExpressionKind::Ident(ident) => {
                let declaration = self.declaration_of(ident)?;

                self.load_owner(ident, &declaration, body)?;
                body.push(Op::LoadField {
                    name: declaration.name().to_string(),
                    representation: Representation::of(self.type_of(&declaration)?),
                });
                Ok(())
            }
            ExpressionKind::Binary { op, lhs, rhs } => {
                let operand = lhs
                    .r#type()
                    .ok_or_else(|| CodegenError::Untyped(op.to_string()))?;

                self.compile_expression(lhs, context, body)?;
                self.compile_expression(rhs, context, body)?;
                self.compile_operator(*op, operand, body);
                Ok(())
            }
        }
    }

    fn compile_operator(&mut self, op: BinaryOperator, operand: Type, body: &mut Vec<Op>) {
        if operand == Type::String {
            return self.compile_string_operator(op, body);
        }

        match op {
            BinaryOperator::Add => body.push(match operand {
                Type::Boolean => Op::Or,
                _ => Op::Add,
            }),
            BinaryOperator::Sub => body.push(Op::Sub),
            BinaryOperator::Mul => body.push(match operand {
                Type::Boolean => Op::And,
                _ => Op::Mul,
            }),
            BinaryOperator::Div => body.push(Op::Div),
            BinaryOperator::Mod => body.push(Op::Rem),
            BinaryOperator::Eq => self.push_comparison(Condition::Ne, body),
            BinaryOperator::Ne => self.push_comparison(Condition::Eq, body),
            BinaryOperator::Lt => self.push_comparison(Condition::Ge, body),
            BinaryOperator::Le => self.push_comparison(Condition::Gt, body),
            BinaryOperator::Gt => self.push_comparison(Condition::Le, body),
            BinaryOperator::Ge => self.push_comparison(Condition::Lt, body),
        }
    }

    fn compile_string_operator(&mut self, op: BinaryOperator, body: &mut Vec<Op>) {
        match op {
            BinaryOperator::Add => body.push(Op::Concat),
            BinaryOperator::Eq => body.push(Op::StringEq),
            BinaryOperator::Ne => {
                body.push(Op::StringEq);
                self.push_comparison(Condition::True, body);
            }
            // String ordering is containment, not lexicographic:
            // `a < b` holds when `b` starts with `a` and the two
            // differ; `>`/`>=` mirror it with the suffix test.
            BinaryOperator::Lt => self.push_string_comparison(Op::StartsWith, true, body),
            BinaryOperator::Le => self.push_string_comparison(Op::StartsWith, false, body),
            BinaryOperator::Gt => self.push_string_comparison(Op::EndsWith, true, body),
            BinaryOperator::Ge => self.push_string_comparison(Op::EndsWith, false, body),
            BinaryOperator::Sub | BinaryOperator::Mul | BinaryOperator::Div | BinaryOperator::Mod => {
                unreachable!("`{}` is rejected for string operands", op)
            }
        }
    }

    /// The double-branch idiom: the machine model has conditional
    /// branches but no compare-to-boolean operation, so the *negated*
    /// condition branches to a label pushing false, otherwise true is
    /// pushed and execution jumps past it.
    fn push_comparison(&mut self, negated: Condition, body: &mut Vec<Op>) {
        let otherwise = self.labels.next("cmp.false");
        let join = self.labels.next("cmp.join");

        body.push(Op::Branch {
            condition: negated,
            target: otherwise.clone(),
        });
        body.push(Op::Const(ConstValue::Boolean(true)));
        body.push(Op::Jump(join.clone()));
        body.push(Op::Label(otherwise));
        body.push(Op::Const(ConstValue::Boolean(false)));
        body.push(Op::Label(join));
    }

    /// Strict orderings also require the operands to differ, so the
    /// containment test is combined with an (inverted) equality test.
    fn push_string_comparison(&mut self, containment: Op, strict: bool, body: &mut Vec<Op>) {
        body.push(Op::StoreLocal(1));
        body.push(Op::StoreLocal(0));

        if containment == Op::StartsWith {
            // The right operand carries the candidate prefix's
            // container: `a < b` asks whether `b` starts with `a`.
            body.push(Op::LoadLocal(1));
            body.push(Op::LoadLocal(0));
        } else {
            body.push(Op::LoadLocal(0));
            body.push(Op::LoadLocal(1));
        }
        body.push(containment);

        body.push(Op::LoadLocal(0));
        body.push(Op::LoadLocal(1));
        body.push(Op::StringEq);

        if strict {
            self.push_comparison(Condition::True, body);
            body.push(Op::And);
        } else {
            body.push(Op::Or);
        }
    }

    /// Emits the operations putting the instance that owns
    /// `declaration` on the stack: the running instance itself, or one
    /// access-link read for the declaring depth. A single read
    /// suffices because links are flattened per level at construction
    /// time.
    fn load_owner(
        &mut self,
        ident: &Ident,
        declaration: &Rc<Declaration>,
        body: &mut Vec<Op>,
    ) -> Result<(), CodegenError> {
        let (declared, referenced) = self.depth_of(ident, declaration)?;

        body.push(Op::LoadSelf);
        if declared != referenced {
            body.push(Op::LoadLink(declared));
        }
        Ok(())
    }

    fn declaration_of(&self, ident: &Ident) -> Result<Rc<Declaration>, CodegenError> {
        ident
            .declaration()
            .ok_or_else(|| CodegenError::UnboundReference(ident.name().to_string()))
    }

    /// The declaring depth and the reference-site depth of a bound
    /// identifier.
    fn depth_of(
        &self,
        ident: &Ident,
        declaration: &Rc<Declaration>,
    ) -> Result<(usize, usize), CodegenError> {
        let declared = declaration
            .depth()
            .ok_or_else(|| CodegenError::UnboundReference(ident.name().to_string()))?;
        let referenced = ident
            .depth()
            .ok_or_else(|| CodegenError::UnboundReference(ident.name().to_string()))?;

        Ok((declared, referenced))
    }

    fn type_of(&self, declaration: &Rc<Declaration>) -> Result<Type, CodegenError> {
        declaration
            .r#type()
            .ok_or_else(|| CodegenError::Untyped(declaration.name().to_string()))
    }
}

fn default_value(r#type: Type) -> ConstValue {
    match r#type {
        Type::Boolean => ConstValue::Boolean(false),
        Type::String => ConstValue::String(String::new()),
        _ => ConstValue::Number(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sem;
    use crate::syntax::{Parser, Tokenizer};
    use assert_matches::assert_matches;

    fn compile_string(src: &str) -> Result<Vec<Unit>, CodegenError> {
        let mut tokenizer = Tokenizer::from_string(src);
        let program = Parser::new().parse(&mut tokenizer).unwrap();

        sem::analyze(&program).unwrap();
        compile(&program, "Main")
    }

    #[test]
    fn entry_unit_has_no_links() {
        let units = compile_string(
            "
            CONST n = 5;
            VAR x;
            x := n.
            ",
        )
        .unwrap();

        assert_eq!(units.len(), 1);

        let main = &units[0];
        assert_eq!(main.name(), "Main");
        assert_eq!(main.depth(), 0);
        assert!(main.access_links().is_empty());

        assert_eq!(main.fields().len(), 2);
        assert!(!main.fields()[0].mutable);
        assert!(main.fields()[1].mutable);

        // Constant initializers come first, then variable defaults.
        assert_eq!(
            &main.body()[..6],
            &[
                Op::LoadSelf,
                Op::Const(ConstValue::Number(5)),
                Op::StoreField {
                    name: "n".to_string(),
                    representation: Representation::Value,
                },
                Op::LoadSelf,
                Op::Const(ConstValue::Number(0)),
                Op::StoreField {
                    name: "x".to_string(),
                    representation: Representation::Value,
                },
            ]
        );
        assert_eq!(main.body().last(), Some(&Op::Return));
    }

    #[test]
    fn nested_units_carry_one_link_per_enclosing_level() {
        let units = compile_string(
            "
            VAR x;
            PROCEDURE p;
              PROCEDURE q;
                PROCEDURE r;
                  x := 1;
                CALL r;
              CALL q;
            BEGIN CALL p; !x END.
            ",
        )
        .unwrap();

        let names: Vec<_> = units.iter().map(|u| u.name().to_string()).collect();
        assert_eq!(names, ["Main", "Main$p", "Main$p$q", "Main$p$q$r"]);

        assert_eq!(units[1].access_links(), ["Main"]);
        assert_eq!(units[2].access_links(), ["Main", "Main$p"]);
        assert_eq!(units[3].access_links(), ["Main", "Main$p", "Main$p$q"]);

        // Reaching `x` (depth 0) from depth 3 is a single link read;
        // the chain was flattened when the instances were built.
        let r = &units[3];
        assert_eq!(
            &r.body()[..4],
            &[
                Op::LoadSelf,
                Op::LoadLink(0),
                Op::Const(ConstValue::Number(1)),
                Op::StoreField {
                    name: "x".to_string(),
                    representation: Representation::Value,
                },
            ]
        );
    }

    #[test]
    fn local_access_skips_the_links() {
        let units = compile_string(
            "
            VAR x;
            x := 7.
            ",
        )
        .unwrap();

        assert_matches!(
            &units[0].body()[3..5],
            [Op::LoadSelf, Op::Const(ConstValue::Number(7))]
        );
    }

    #[test]
    fn call_lowers_to_new_and_call() {
        let units = compile_string(
            "
            PROCEDURE p;
              ;
            CALL p.
            ",
        )
        .unwrap();

        assert_eq!(
            &units[0].body()[..2],
            &[Op::New("Main$p".to_string()), Op::Call("Main$p".to_string())]
        );
        assert_eq!(units[0].nested(), ["Main$p"]);
    }

    #[test]
    fn sibling_call_goes_through_the_declaring_unit() {
        let units = compile_string(
            "
            PROCEDURE a;
              ;
            PROCEDURE b;
              CALL a;
            CALL b.
            ",
        )
        .unwrap();

        // `a` is declared at depth 0, so `b` instantiates `Main$a`,
        // not a unit of its own.
        let b = units.iter().find(|u| u.name() == "Main$b").unwrap();
        assert_eq!(
            &b.body()[..2],
            &[Op::New("Main$a".to_string()), Op::Call("Main$a".to_string())]
        );
    }

    #[test]
    fn comparison_uses_the_negated_branch() {
        let units = compile_string("! 1 < 2.").unwrap();

        assert_eq!(
            &units[0].body()[..8],
            &[
                Op::Const(ConstValue::Number(1)),
                Op::Const(ConstValue::Number(2)),
                Op::Branch {
                    condition: Condition::Ge,
                    target: "cmp.false.0".to_string()
                },
                Op::Const(ConstValue::Boolean(true)),
                Op::Jump("cmp.join.0".to_string()),
                Op::Label("cmp.false.0".to_string()),
                Op::Const(ConstValue::Boolean(false)),
                Op::Label("cmp.join.0".to_string()),
            ]
        );
    }

    #[test]
    fn string_less_than_tests_prefix_and_difference() {
        let units = compile_string(
            "
            CONST a = \"ab\", b = \"abc\";
            ! a < b.
            ",
        )
        .unwrap();

        let body = units[0].body();
        let start = body
            .iter()
            .position(|op| *op == Op::StoreLocal(1))
            .unwrap();

        assert_eq!(
            &body[start..start + 9],
            &[
                Op::StoreLocal(1),
                Op::StoreLocal(0),
                Op::LoadLocal(1),
                Op::LoadLocal(0),
                Op::StartsWith,
                Op::LoadLocal(0),
                Op::LoadLocal(1),
                Op::StringEq,
                Op::Branch {
                    condition: Condition::True,
                    target: "cmp.false.0".to_string()
                },
            ]
        );
        // The inverted equality joins the containment test with AND.
        assert_eq!(body[start + 14], Op::And);
    }

    #[test]
    fn while_is_unsupported() {
        let result = compile_string(
            "
            VAR x;
            BEGIN x := 0; WHILE x < 1 DO x := x + 1 END.
            ",
        );

        assert_matches!(result, Err(CodegenError::UnsupportedConstruct("WHILE")));
    }

    #[test]
    fn input_is_unsupported() {
        let result = compile_string(
            "
            VAR x;
            BEGIN x := 1; ? x END.
            ",
        );

        assert_matches!(result, Err(CodegenError::UnsupportedConstruct("?")));
    }

    #[test]
    fn boolean_operators_lower_to_logic_ops() {
        let units = compile_string("! TRUE + FALSE * TRUE.").unwrap();

        let body = units[0].body();
        assert!(body.contains(&Op::And));
        assert!(body.contains(&Op::Or));
    }
}
