//! Expression tree produced by the grammar in [`super::parser`].

use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Variable(String),
    List(Vec<Expr>),
    Dict(Vec<(Expr, Expr)>),
    Attribute {
        target: Box<Expr>,
        name: String,
    },
    Index {
        target: Box<Expr>,
        index: Box<Expr>,
    },
    Not(Box<Expr>),
    Negate(Box<Expr>),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Filter {
        target: Box<Expr>,
        name: String,
        args: Vec<Expr>,
    },
    Test {
        target: Box<Expr>,
        name: String,
        args: Vec<Expr>,
        negated: bool,
    },
    /// `then if condition else otherwise`
    Conditional {
        then: Box<Expr>,
        condition: Box<Expr>,
        otherwise: Option<Box<Expr>>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
    Add,
    Sub,
    /// `~`, string concatenation
    Concat,
    Mul,
    Div,
    FloorDiv,
    Mod,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Or => "or",
            Self::And => "and",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::In => "in",
            Self::NotIn => "not in",
            Self::Add => "+",
            Self::Sub => "-",
            Self::Concat => "~",
            Self::Mul => "*",
            Self::Div => "/",
            Self::FloorDiv => "//",
            Self::Mod => "%",
        }
    }
}

/// Trailing operators parsed after a primary expression.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Postfix {
    Attribute(String),
    Index(Expr),
    Filter(String, Vec<Expr>),
    Test(String, Vec<Expr>, bool),
}

impl Expr {
    pub(crate) fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Self::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub(crate) fn apply(self, postfix: Postfix) -> Self {
        let target = Box::new(self);
        match postfix {
            Postfix::Attribute(name) => Self::Attribute { target, name },
            Postfix::Index(index) => Self::Index {
                target,
                index: Box::new(index),
            },
            Postfix::Filter(name, args) => Self::Filter { target, name, args },
            Postfix::Test(name, args, negated) => Self::Test {
                target,
                name,
                args,
                negated,
            },
        }
    }
}
