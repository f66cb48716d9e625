//! Tagged values, facts, and query patterns.
//!
//! Symbols are interned process-wide so symbol equality has the same
//! cheap semantics as in the rule language. Strings carry opaque data
//! (ids, hostnames); integers carry resource counts and timestamps.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex, OnceLock};

static INTERNER: OnceLock<Mutex<HashSet<Arc<str>>>> = OnceLock::new();

/// An interned atom, e.g. a predicate name or a status.
#[derive(Debug, Clone, Eq)]
pub struct Symbol(Arc<str>);

impl Symbol {
    /// Intern a name, returning the canonical shared instance.
    pub fn intern(name: &str) -> Self {
        let interner = INTERNER.get_or_init(|| Mutex::new(HashSet::new()));
        let mut set = interner.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(existing) = set.get(name) {
            Symbol(Arc::clone(existing))
        } else {
            let arc: Arc<str> = Arc::from(name);
            set.insert(Arc::clone(&arc));
            Symbol(arc)
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl PartialEq for Symbol {
    fn eq(&self, other: &Self) -> bool {
        // Interned: pointer equality is the common case.
        Arc::ptr_eq(&self.0, &other.0) || self.0 == other.0
    }
}

impl PartialOrd for Symbol {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Symbol {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(&other.0)
    }
}

impl std::hash::Hash for Symbol {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Symbol {
    fn from(name: &str) -> Self {
        Symbol::intern(name)
    }
}

/// A tagged argument value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Value {
    Sym(Symbol),
    Str(String),
    Int(i64),
}

impl Value {
    pub fn sym(name: &str) -> Self {
        Value::Sym(Symbol::intern(name))
    }

    pub fn str(s: impl Into<String>) -> Self {
        Value::Str(s.into())
    }

    pub fn int(n: i64) -> Self {
        Value::Int(n)
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// The string content of a `Str` or the name of a `Sym`.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            Value::Sym(s) => Some(s.as_str()),
            Value::Int(_) => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Sym(s) => write!(f, "{s}"),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::Int(n) => write!(f, "{n}"),
        }
    }
}

/// A ground tuple in the fact base.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fact {
    pub pred: Symbol,
    pub args: Vec<Value>,
}

impl Fact {
    pub fn new(pred: &str, args: Vec<Value>) -> Self {
        Self {
            pred: Symbol::intern(pred),
            args,
        }
    }

    pub fn arity(&self) -> usize {
        self.args.len()
    }
}

impl fmt::Display for Fact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.pred)?;
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{arg}")?;
        }
        write!(f, ")")
    }
}

/// One position in a query pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Term {
    /// Matches any value.
    Any,
    /// Matches exactly this value.
    Bound(Value),
}

/// A predicate plus per-argument constraints, matched against facts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    pub pred: Symbol,
    pub args: Vec<Term>,
}

impl Pattern {
    pub fn new(pred: &str, args: Vec<Term>) -> Self {
        Self {
            pred: Symbol::intern(pred),
            args,
        }
    }

    /// A pattern matching every fact of `pred` at the given arity.
    pub fn wildcard(pred: &str, arity: usize) -> Self {
        Self::new(pred, vec![Term::Any; arity])
    }

    /// A pattern binding only the first argument (the usual entity-id query).
    pub fn keyed(pred: &str, key: Value, arity: usize) -> Self {
        let mut args = vec![Term::Any; arity];
        args[0] = Term::Bound(key);
        Self::new(pred, args)
    }

    pub fn matches(&self, fact: &Fact) -> bool {
        if self.pred != fact.pred || self.args.len() != fact.args.len() {
            return false;
        }
        self.args
            .iter()
            .zip(&fact.args)
            .all(|(term, value)| match term {
                Term::Any => true,
                Term::Bound(v) => v == value,
            })
    }
}
