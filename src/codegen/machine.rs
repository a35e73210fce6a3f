//! A stack evaluator over compiled units, used by tests and the CLI
//! to observe compiled programs.
use crate::codegen::errors::EvalError;
use crate::codegen::unit::{Condition, Op, Unit};
use crate::syntax::ConstValue;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

#[derive(Debug, Clone)]
pub enum Value {
    Number(i32),
    Boolean(bool),
    String(String),
    Instance(Rc<RefCell<Instance>>),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(i) => write!(f, "{}", i),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::String(s) => write!(f, "{}", s),
            Value::Instance(instance) => write!(f, "<{}>", instance.borrow().unit),
        }
    }
}

/// A running unit instance: its access links, fixed at construction,
/// and its field values.
#[derive(Debug)]
pub struct Instance {
    unit: String,
    links: Vec<Rc<RefCell<Instance>>>,
    fields: HashMap<String, Value>,
}

impl Instance {
    fn new(unit: &str, links: Vec<Rc<RefCell<Instance>>>) -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self {
            unit: unit.to_string(),
            links,
            fields: HashMap::new(),
        }))
    }
}

#[derive(Debug, Default)]
pub struct Machine {
    output: Vec<String>,
}

impl Machine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Instantiates the entry unit and runs its body.
    pub fn run(&mut self, units: &[Unit]) -> Result<(), EvalError> {
        let entry = units.first().ok_or(EvalError::NoEntryUnit)?;
        let instance = Instance::new(entry.name(), vec![]);

        self.call(units, instance)
    }

    pub fn output(&self) -> &[String] {
        &self.output
    }

    pub fn into_output(self) -> Vec<String> {
        self.output
    }

    fn call(
        &mut self,
        units: &[Unit],
        instance: Rc<RefCell<Instance>>,
    ) -> Result<(), EvalError> {
        let unit_name = instance.borrow().unit.clone();
        let unit = find_unit(units, &unit_name)?;
        let body = unit.body();

        let mut stack: Vec<Value> = vec![];
        let mut locals: Vec<Option<Value>> = vec![];
        let mut pc = 0;

        while pc < body.len() {
            let op = &body[pc];
            pc += 1;

            match op {
                Op::Const(value) => stack.push(value.clone().into()),
                Op::LoadSelf => stack.push(Value::Instance(Rc::clone(&instance))),
                Op::LoadLink(depth) => {
                    let target = pop_instance(&mut stack)?;
                    let link = target
                        .borrow()
                        .links
                        .get(*depth)
                        .map(Rc::clone)
                        .ok_or(EvalError::MissingAccessLink(*depth))?;

                    stack.push(Value::Instance(link));
                }
                Op::LoadField { name, .. } => {
                    let target = pop_instance(&mut stack)?;
                    let value = target
                        .borrow()
                        .fields
                        .get(name)
                        .cloned()
                        .ok_or_else(|| EvalError::UndefinedField(name.clone()))?;

                    stack.push(value);
                }
                Op::StoreField { name, .. } => {
                    let value = pop(&mut stack)?;
                    let target = pop_instance(&mut stack)?;

                    target.borrow_mut().fields.insert(name.clone(), value);
                }
                Op::New(name) => {
                    let callee = find_unit(units, name)?;
                    let caller = instance.borrow();
                    // Flatten the chain: every link of the callee is
                    // one of the caller's own links, except the link
                    // to the caller's level, which is the caller
                    // itself.
                    let links = (0..callee.depth())
                        .map(|depth| {
                            if depth < caller.links.len() {
                                Ok(Rc::clone(&caller.links[depth]))
                            } else if depth == caller.links.len() {
                                Ok(Rc::clone(&instance))
                            } else {
                                Err(EvalError::MissingAccessLink(depth))
                            }
                        })
                        .collect::<Result<Vec<_>, _>>()?;

                    stack.push(Value::Instance(Instance::new(name, links)));
                }
                Op::Call(_) => {
                    let callee = pop_instance(&mut stack)?;
                    self.call(units, callee)?;
                }
                Op::Add => {
                    let (lhs, rhs) = pop_numbers(&mut stack)?;
                    stack.push(Value::Number(lhs.wrapping_add(rhs)));
                }
                Op::Sub => {
                    let (lhs, rhs) = pop_numbers(&mut stack)?;
                    stack.push(Value::Number(lhs.wrapping_sub(rhs)));
                }
                Op::Mul => {
                    let (lhs, rhs) = pop_numbers(&mut stack)?;
                    stack.push(Value::Number(lhs.wrapping_mul(rhs)));
                }
                Op::Div => {
                    let (lhs, rhs) = pop_numbers(&mut stack)?;

                    if rhs == 0 {
                        return Err(EvalError::DivisionByZero);
                    }
                    stack.push(Value::Number(lhs.wrapping_div(rhs)));
                }
                Op::Rem => {
                    let (lhs, rhs) = pop_numbers(&mut stack)?;

                    if rhs == 0 {
                        return Err(EvalError::DivisionByZero);
                    }
                    stack.push(Value::Number(lhs.wrapping_rem(rhs)));
                }
                Op::And => {
                    let (lhs, rhs) = pop_booleans(&mut stack)?;
                    stack.push(Value::Boolean(lhs & rhs));
                }
                Op::Or => {
                    let (lhs, rhs) = pop_booleans(&mut stack)?;
                    stack.push(Value::Boolean(lhs | rhs));
                }
                Op::Concat => {
                    let (lhs, rhs) = pop_strings(&mut stack)?;
                    stack.push(Value::String(lhs + &rhs));
                }
                Op::StringEq => {
                    let (lhs, rhs) = pop_strings(&mut stack)?;
                    stack.push(Value::Boolean(lhs == rhs));
                }
                Op::StartsWith => {
                    let (receiver, prefix) = pop_strings(&mut stack)?;
                    stack.push(Value::Boolean(receiver.starts_with(&prefix)));
                }
                Op::EndsWith => {
                    let (receiver, suffix) = pop_strings(&mut stack)?;
                    stack.push(Value::Boolean(receiver.ends_with(&suffix)));
                }
                Op::Branch { condition, target } => {
                    let taken = match condition {
                        Condition::True => pop_boolean(&mut stack)?,
                        Condition::False => !pop_boolean(&mut stack)?,
                        _ => {
                            let (lhs, rhs) = pop_comparable(&mut stack)?;

                            match condition {
                                Condition::Eq => lhs == rhs,
                                Condition::Ne => lhs != rhs,
                                Condition::Lt => lhs < rhs,
                                Condition::Le => lhs <= rhs,
                                Condition::Gt => lhs > rhs,
                                Condition::Ge => lhs >= rhs,
                                _ => unreachable!(),
                            }
                        }
                    };

                    if taken {
                        pc = resolve_label(body, target)?;
                    }
                }
                Op::Jump(target) => {
                    pc = resolve_label(body, target)?;
                }
                Op::Label(_) => {}
                Op::StoreLocal(index) => {
                    let value = pop(&mut stack)?;

                    if locals.len() <= *index {
                        locals.resize(*index + 1, None);
                    }
                    locals[*index] = Some(value);
                }
                Op::LoadLocal(index) => {
                    let value = locals
                        .get(*index)
                        .cloned()
                        .flatten()
                        .ok_or(EvalError::UninitializedLocal(*index))?;

                    stack.push(value);
                }
                Op::Output => {
                    let value = pop(&mut stack)?;
                    self.output.push(value.to_string());
                }
                Op::Return => break,
            }
        }

        Ok(())
    }
}

impl From<ConstValue> for Value {
    fn from(value: ConstValue) -> Self {
        match value {
            ConstValue::Number(i) => Value::Number(i),
            ConstValue::Boolean(b) => Value::Boolean(b),
            ConstValue::String(s) => Value::String(s),
        }
    }
}

fn find_unit<'a>(units: &'a [Unit], name: &str) -> Result<&'a Unit, EvalError> {
    units
        .iter()
        .find(|unit| unit.name() == name)
        .ok_or_else(|| EvalError::UnknownUnit(name.to_string()))
}

fn resolve_label(body: &[Op], target: &str) -> Result<usize, EvalError> {
    body.iter()
        .position(|op| matches!(op, Op::Label(name) if name == target))
        .ok_or_else(|| EvalError::UnknownLabel(target.to_string()))
}

fn pop(stack: &mut Vec<Value>) -> Result<Value, EvalError> {
    stack.pop().ok_or(EvalError::StackUnderflow)
}

fn pop_instance(stack: &mut Vec<Value>) -> Result<Rc<RefCell<Instance>>, EvalError> {
    match pop(stack)? {
        Value::Instance(instance) => Ok(instance),
        _ => Err(EvalError::OperandMismatch {
            expected: "instance",
        }),
    }
}

fn pop_boolean(stack: &mut Vec<Value>) -> Result<bool, EvalError> {
    match pop(stack)? {
        Value::Boolean(b) => Ok(b),
        _ => Err(EvalError::OperandMismatch {
            expected: "boolean",
        }),
    }
}

fn pop_booleans(stack: &mut Vec<Value>) -> Result<(bool, bool), EvalError> {
    let rhs = pop_boolean(stack)?;
    let lhs = pop_boolean(stack)?;

    Ok((lhs, rhs))
}

fn pop_numbers(stack: &mut Vec<Value>) -> Result<(i32, i32), EvalError> {
    let rhs = pop_number(stack)?;
    let lhs = pop_number(stack)?;

    Ok((lhs, rhs))
}

fn pop_number(stack: &mut Vec<Value>) -> Result<i32, EvalError> {
    match pop(stack)? {
        Value::Number(i) => Ok(i),
        _ => Err(EvalError::OperandMismatch { expected: "number" }),
    }
}

fn pop_strings(stack: &mut Vec<Value>) -> Result<(String, String), EvalError> {
    let rhs = pop_string(stack)?;
    let lhs = pop_string(stack)?;

    Ok((lhs, rhs))
}

fn pop_string(stack: &mut Vec<Value>) -> Result<String, EvalError> {
    match pop(stack)? {
        Value::String(s) => Ok(s),
        _ => Err(EvalError::OperandMismatch { expected: "string" }),
    }
}

/// Comparison branches accept numbers and booleans; booleans compare
/// as 0 and 1.
fn pop_comparable(stack: &mut Vec<Value>) -> Result<(i32, i32), EvalError> {
    let rhs = pop_comparable_operand(stack)?;
    let lhs = pop_comparable_operand(stack)?;

    Ok((lhs, rhs))
}

fn pop_comparable_operand(stack: &mut Vec<Value>) -> Result<i32, EvalError> {
    match pop(stack)? {
        Value::Number(i) => Ok(i),
        Value::Boolean(b) => Ok(i32::from(b)),
        _ => Err(EvalError::OperandMismatch {
            expected: "number or boolean",
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen;
    use crate::sem;
    use crate::syntax::{Parser, Tokenizer};

    fn run_string(src: &str) -> Vec<String> {
        let mut tokenizer = Tokenizer::from_string(src);
        let program = Parser::new().parse(&mut tokenizer).unwrap();

        sem::analyze(&program).unwrap();

        let units = codegen::compile(&program, "Main").unwrap();
        let mut machine = Machine::new();

        machine.run(&units).unwrap();
        machine.into_output()
    }

    #[test]
    fn closure_writes_an_outer_variable() {
        let output = run_string(
            "
            CONST n = 5;
            VAR x;
            PROCEDURE p;
              BEGIN x := n END;
            BEGIN CALL p; !x END.
            ",
        );

        assert_eq!(output, ["5"]);
    }

    #[test]
    fn arithmetic() {
        let output = run_string("! (1 + 2) * 3 - 10 % 3.");

        assert_eq!(output, ["8"]);
    }

    #[test]
    fn comparisons() {
        let output = run_string(
            "
            VAR x;
            BEGIN
              x := 4;
              ! x < 5;
              ! x # 4;
              ! x >= 4
            END.
            ",
        );

        assert_eq!(output, ["true", "false", "true"]);
    }

    #[test]
    fn conditional_statement() {
        let output = run_string(
            "
            VAR x;
            BEGIN
              x := 1;
              IF x = 1 THEN ! \"one\";
              IF x # 1 THEN ! \"other\"
            END.
            ",
        );

        assert_eq!(output, ["one"]);
    }

    #[test]
    fn string_ordering_is_containment() {
        let output = run_string(
            "
            CONST a = \"ab\", b = \"abc\";
            BEGIN
              ! a < b;
              ! a > b;
              ! a <= a
            END.
            ",
        );

        assert_eq!(output, ["true", "false", "true"]);
    }

    #[test]
    fn string_suffix_ordering() {
        let output = run_string(
            "
            CONST a = \"bc\", b = \"abc\";
            BEGIN
              ! b > a;
              ! b >= b;
              ! b < a
            END.
            ",
        );

        assert_eq!(output, ["true", "true", "false"]);
    }

    #[test]
    fn string_concatenation() {
        let output = run_string("! \"foo\" + \"bar\".");

        assert_eq!(output, ["foobar"]);
    }

    #[test]
    fn boolean_algebra() {
        let output = run_string(
            "
            BEGIN
              ! TRUE * FALSE;
              ! TRUE + FALSE;
              ! TRUE = TRUE
            END.
            ",
        );

        assert_eq!(output, ["false", "true", "true"]);
    }

    #[test]
    fn deeply_nested_closure_reads_the_root() {
        let output = run_string(
            "
            VAR x;
            PROCEDURE p;
              PROCEDURE q;
                PROCEDURE r;
                  x := x + 1;
                BEGIN CALL r; CALL r END;
              CALL q;
            BEGIN x := 0; CALL p; !x END.
            ",
        );

        assert_eq!(output, ["2"]);
    }

    #[test]
    fn each_call_gets_fresh_locals() {
        // `p` has its own counter field, reset on every call; the
        // outer variable accumulates across calls.
        let output = run_string(
            "
            VAR total;
            PROCEDURE p;
              VAR mine;
              BEGIN mine := total + 1; total := mine END;
            BEGIN total := 0; CALL p; CALL p; !total END.
            ",
        );

        assert_eq!(output, ["2"]);
    }

    #[test]
    fn recursion_terminates_through_conditionals() {
        let output = run_string(
            "
            VAR n;
            PROCEDURE countdown;
              BEGIN
                ! n;
                n := n - 1;
                IF n > 0 THEN CALL countdown
              END;
            BEGIN n := 3; CALL countdown END.
            ",
        );

        assert_eq!(output, ["3", "2", "1"]);
    }

    #[test]
    fn division_by_zero_faults() {
        let mut tokenizer = Tokenizer::from_string("VAR x; BEGIN x := 0; ! 1 / x END.");
        let program = Parser::new().parse(&mut tokenizer).unwrap();

        sem::analyze(&program).unwrap();

        let units = codegen::compile(&program, "Main").unwrap();
        let mut machine = Machine::new();

        assert_eq!(machine.run(&units), Err(EvalError::DivisionByZero));
    }
}
