//! The compiled artifacts: one callable unit per block, carrying its
//! access links, its field layout and its body as a list of abstract
//! operations. Serializing units to a concrete binary format is the
//! emitter's concern, not ours.
use crate::sem::Type;
use crate::syntax::ConstValue;
use std::fmt;

/// How a field value is carried: numbers and booleans by value,
/// strings by reference.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Representation {
    Value,
    Reference,
}

impl Representation {
    pub fn of(r#type: Type) -> Self {
        match r#type {
            Type::String => Representation::Reference,
            _ => Representation::Value,
        }
    }
}

impl fmt::Display for Representation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Representation::Value => write!(f, "value"),
            Representation::Reference => write!(f, "ref"),
        }
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct Field {
    pub name: String,
    pub representation: Representation,
    pub mutable: bool,
}

/// The condition of a conditional branch. Comparisons pop two
/// operands; `True` and `False` pop a single boolean.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Condition {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    True,
    False,
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Condition::Eq => "eq",
            Condition::Ne => "ne",
            Condition::Lt => "lt",
            Condition::Le => "le",
            Condition::Gt => "gt",
            Condition::Ge => "ge",
            Condition::True => "true",
            Condition::False => "false",
        };

        write!(f, "{}", name)
    }
}

/// An abstract machine operation.
#[derive(Debug, PartialEq, Clone)]
pub enum Op {
    /// Push a literal value.
    Const(ConstValue),
    /// Push the instance the body is running on.
    LoadSelf,
    /// Pop an instance, push its access link for the given depth.
    LoadLink(usize),
    /// Pop an instance, push the named field's value.
    LoadField {
        name: String,
        representation: Representation,
    },
    /// Pop a value, pop an instance, store the value into the named
    /// field.
    StoreField {
        name: String,
        representation: Representation,
    },
    /// Push a new instance of the named unit, constructed from the
    /// running instance as the caller.
    New(String),
    /// Pop an instance and execute its unit's body.
    Call(String),

    // Arithmetic and logic; all pop two operands.
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    And,
    Or,

    // String operations; all pop two operands.
    Concat,
    StringEq,
    StartsWith,
    EndsWith,

    /// Pop one or two operands and jump to the label if the condition
    /// holds.
    Branch { condition: Condition, target: String },
    /// Unconditional jump.
    Jump(String),
    /// A jump target; no effect when executed.
    Label(String),

    // Spill slots for operands that are needed twice.
    StoreLocal(usize),
    LoadLocal(usize),

    /// Pop a value and print it on its own line.
    Output,
    Return,
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Op::Const(ConstValue::String(s)) => write!(f, "const {:?}", s),
            Op::Const(value) => write!(f, "const {}", value),
            Op::LoadSelf => write!(f, "load_self"),
            Op::LoadLink(depth) => write!(f, "load_link {}", depth),
            Op::LoadField {
                name,
                representation,
            } => write!(f, "load_field {}:{}", name, representation),
            Op::StoreField {
                name,
                representation,
            } => write!(f, "store_field {}:{}", name, representation),
            Op::New(unit) => write!(f, "new {}", unit),
            Op::Call(unit) => write!(f, "call {}", unit),
            Op::Add => write!(f, "add"),
            Op::Sub => write!(f, "sub"),
            Op::Mul => write!(f, "mul"),
            Op::Div => write!(f, "div"),
            Op::Rem => write!(f, "rem"),
            Op::And => write!(f, "and"),
            Op::Or => write!(f, "or"),
            Op::Concat => write!(f, "concat"),
            Op::StringEq => write!(f, "string_eq"),
            Op::StartsWith => write!(f, "starts_with"),
            Op::EndsWith => write!(f, "ends_with"),
            Op::Branch { condition, target } => write!(f, "branch {} {}", condition, target),
            Op::Jump(target) => write!(f, "jump {}", target),
            Op::Label(name) => write!(f, "label {}:", name),
            Op::StoreLocal(index) => write!(f, "store_local {}", index),
            Op::LoadLocal(index) => write!(f, "load_local {}", index),
            Op::Output => write!(f, "output"),
            Op::Return => write!(f, "return"),
        }
    }
}

/// One compiled block: the program entry or a procedure. A unit nested
/// at depth `n` holds one access link per enclosing lexical level
/// `0..n`, established when an instance is constructed and immutable
/// thereafter.
#[derive(Debug)]
pub struct Unit {
    name: String,
    /// Names of the enclosing units, outermost first; the index is the
    /// enclosing level's depth.
    access_links: Vec<String>,
    fields: Vec<Field>,
    /// Units for the procedures declared directly inside this block.
    nested: Vec<String>,
    body: Vec<Op>,
}

impl Unit {
    pub fn new(
        name: String,
        access_links: Vec<String>,
        fields: Vec<Field>,
        nested: Vec<String>,
        body: Vec<Op>,
    ) -> Self {
        Self {
            name,
            access_links,
            fields,
            nested,
            body,
        }
    }

    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    pub fn depth(&self) -> usize {
        self.access_links.len()
    }

    pub fn access_links(&self) -> &[String] {
        &self.access_links
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn nested(&self) -> &[String] {
        &self.nested
    }

    pub fn body(&self) -> &[Op] {
        &self.body
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "unit {} (depth {})", self.name, self.depth())?;

        for (depth, enclosing) in self.access_links.iter().enumerate() {
            writeln!(f, "  link {} -> {}", depth, enclosing)?;
        }

        for field in &self.fields {
            let kind = if field.mutable { "var" } else { "const" };
            writeln!(f, "  {} {}:{}", kind, field.name, field.representation)?;
        }

        for nested in &self.nested {
            writeln!(f, "  nested {}", nested)?;
        }

        writeln!(f, "  body:")?;
        for op in &self.body {
            writeln!(f, "    {}", op)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn representation_by_type() {
        assert_eq!(Representation::of(Type::Number), Representation::Value);
        assert_eq!(Representation::of(Type::Boolean), Representation::Value);
        assert_eq!(Representation::of(Type::String), Representation::Reference);
    }

    #[test]
    fn op_rendering() {
        let op = Op::LoadField {
            name: "x".to_string(),
            representation: Representation::Value,
        };
        assert_eq!(op.to_string(), "load_field x:value");

        assert_eq!(
            Op::Const(ConstValue::String("a b".to_string())).to_string(),
            "const \"a b\""
        );
        assert_eq!(
            Op::Branch {
                condition: Condition::Ge,
                target: "cmp.false.0".to_string()
            }
            .to_string(),
            "branch ge cmp.false.0"
        );
    }
}
