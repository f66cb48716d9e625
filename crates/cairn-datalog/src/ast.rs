//! Abstract syntax for the rule language.

use std::fmt;

use cairn_facts::{Fact, Symbol, Value};

/// One argument position in an atom.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Term {
    /// A named variable (`N`, `CpuFree`).
    Var(String),
    /// An anonymous variable (`_`), existential in negated atoms.
    Wildcard,
    /// A ground constant (symbol, string, or integer).
    Const(Value),
}

/// A predicate applied to terms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Atom {
    pub pred: Symbol,
    pub args: Vec<Term>,
}

impl Atom {
    /// Named variables appearing in this atom.
    pub fn vars(&self) -> impl Iterator<Item = &str> {
        self.args.iter().filter_map(|t| match t {
            Term::Var(name) => Some(name.as_str()),
            _ => None,
        })
    }

    pub fn is_ground(&self) -> bool {
        self.args.iter().all(|t| matches!(t, Term::Const(_)))
    }

    /// Convert a ground atom into a fact. Returns `None` if any
    /// argument is a variable or wildcard.
    pub fn to_fact(&self) -> Option<Fact> {
        let args = self
            .args
            .iter()
            .map(|t| match t {
                Term::Const(v) => Some(v.clone()),
                _ => None,
            })
            .collect::<Option<Vec<Value>>>()?;
        Some(Fact {
            pred: self.pred.clone(),
            args,
        })
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.pred)?;
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            match arg {
                Term::Var(name) => write!(f, "{name}")?,
                Term::Wildcard => write!(f, "_")?,
                Term::Const(v) => write!(f, "{v}")?,
            }
        }
        write!(f, ")")
    }
}

/// Comparison operators over bound expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl fmt::Display for CmpOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
        };
        write!(f, "{s}")
    }
}

/// Integer arithmetic operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
}

/// An arithmetic expression over constants and bound variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Term(Term),
    BinOp(ArithOp, Box<Expr>, Box<Expr>),
}

impl Expr {
    /// Named variables appearing in this expression.
    pub fn vars<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Expr::Term(Term::Var(name)) => out.push(name),
            Expr::Term(_) => {}
            Expr::BinOp(_, lhs, rhs) => {
                lhs.vars(out);
                rhs.vars(out);
            }
        }
    }
}

/// One body element of a rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Literal {
    /// A positive atom — binds variables.
    Pos(Atom),
    /// A negated atom — negation as failure, cannot bind.
    Neg(Atom),
    /// A comparison between two bound expressions.
    Cmp(Expr, CmpOp, Expr),
}

/// `head :- body.`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub head: Atom,
    pub body: Vec<Literal>,
}

/// A parsed rule-text unit: ground facts plus rules.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Program {
    pub facts: Vec<Fact>,
    pub rules: Vec<Rule>,
}

impl Program {
    pub fn is_empty(&self) -> bool {
        self.facts.is_empty() && self.rules.is_empty()
    }

    /// Merge another program into this one, preserving order.
    pub fn extend(&mut self, other: Program) {
        self.facts.extend(other.facts);
        self.rules.extend(other.rules);
    }
}
