//! Stratified bottom-up evaluation.
//!
//! Facts are kept in per-predicate indexes; joins are nested loops
//! with backtracking over an environment of variable bindings. Within
//! a stratum the fixpoint is predicate-level semi-naïve: after the
//! first pass a rule only re-fires when one of its positive body
//! predicates gained tuples in the previous pass.

use std::collections::{HashMap, HashSet};

use cairn_facts::{Fact, Pattern, Symbol, Value};

use crate::ast::{ArithOp, Atom, CmpOp, Expr, Literal, Rule, Term};

/// Per-predicate fact storage. The inner set makes assertion
/// idempotent by construction.
pub type FactIndex = HashMap<Symbol, HashSet<Vec<Value>>>;

/// Variable bindings accumulated while solving a rule body.
type Env = HashMap<String, Value>;

/// Insert a fact; returns true if it was new.
pub fn index_insert(index: &mut FactIndex, fact: &Fact) -> bool {
    index
        .entry(fact.pred.clone())
        .or_default()
        .insert(fact.args.clone())
}

/// Remove a fact; returns true if it was present.
pub fn index_remove(index: &mut FactIndex, fact: &Fact) -> bool {
    match index.get_mut(&fact.pred) {
        Some(tuples) => tuples.remove(&fact.args),
        None => false,
    }
}

pub fn index_contains(index: &FactIndex, fact: &Fact) -> bool {
    index
        .get(&fact.pred)
        .is_some_and(|tuples| tuples.contains(&fact.args))
}

/// Collect the facts in an index matching a pattern, sorted.
pub fn index_matching(index: &FactIndex, pattern: &Pattern) -> Vec<Fact> {
    let mut out = Vec::new();
    if let Some(tuples) = index.get(&pattern.pred) {
        for tuple in tuples {
            let fact = Fact {
                pred: pattern.pred.clone(),
                args: tuple.clone(),
            };
            if pattern.matches(&fact) {
                out.push(fact);
            }
        }
    }
    out.sort();
    out
}

/// Read-only union of the base facts and the derivations so far.
struct View<'a> {
    base: &'a FactIndex,
    derived: &'a FactIndex,
}

impl View<'_> {
    fn tuples(&self, pred: &Symbol) -> impl Iterator<Item = &Vec<Value>> {
        let base = self.base.get(pred).into_iter().flatten();
        let derived = self.derived.get(pred).into_iter().flatten();
        base.chain(derived)
    }

    /// Does any tuple match the atom under the current bindings?
    /// Unbound variables and wildcards are existential.
    fn exists(&self, atom: &Atom, env: &Env) -> bool {
        self.tuples(&atom.pred)
            .any(|tuple| unify(&atom.args, tuple, env).is_some())
    }
}

/// Compute all derived facts entailed by `rules` from `base`.
pub fn evaluate(base: &FactIndex, rules: &[Rule], strata: &[Vec<usize>]) -> FactIndex {
    let mut derived: FactIndex = HashMap::new();

    for stratum in strata {
        let mut first_pass = true;
        let mut changed: HashSet<Symbol> = HashSet::new();

        loop {
            let mut now_changed: HashSet<Symbol> = HashSet::new();

            for &idx in stratum {
                let rule = &rules[idx];
                if !first_pass && !reads_any(rule, &changed) {
                    continue;
                }

                let heads: Vec<Fact> = {
                    let view = View {
                        base,
                        derived: &derived,
                    };
                    let mut out = Vec::new();
                    solve(&rule.body, &view, &Env::new(), &mut |env| {
                        if let Some(fact) = instantiate(&rule.head, env) {
                            out.push(fact);
                        }
                    });
                    out
                };

                for fact in heads {
                    if !index_contains(base, &fact) && index_insert(&mut derived, &fact) {
                        now_changed.insert(fact.pred.clone());
                    }
                }
            }

            if now_changed.is_empty() {
                break;
            }
            changed = now_changed;
            first_pass = false;
        }
    }

    derived
}

/// Does the rule read any of the given predicates positively?
fn reads_any(rule: &Rule, preds: &HashSet<Symbol>) -> bool {
    rule.body.iter().any(|lit| match lit {
        Literal::Pos(atom) => preds.contains(&atom.pred),
        _ => false,
    })
}

/// Solve a rule body left to right, emitting every complete binding.
fn solve(body: &[Literal], view: &View<'_>, env: &Env, emit: &mut dyn FnMut(&Env)) {
    let Some((first, rest)) = body.split_first() else {
        emit(env);
        return;
    };

    match first {
        Literal::Pos(atom) => {
            for tuple in view.tuples(&atom.pred) {
                if let Some(extended) = unify(&atom.args, tuple, env) {
                    solve(rest, view, &extended, emit);
                }
            }
        }
        Literal::Neg(atom) => {
            if !view.exists(atom, env) {
                solve(rest, view, env, emit);
            }
        }
        Literal::Cmp(lhs, op, rhs) => {
            if compare(lhs, *op, rhs, env) {
                solve(rest, view, env, emit);
            }
        }
    }
}

/// Match atom arguments against a stored tuple, extending the
/// environment. Returns `None` on mismatch.
fn unify(args: &[Term], tuple: &[Value], env: &Env) -> Option<Env> {
    if args.len() != tuple.len() {
        return None;
    }
    let mut extended = env.clone();
    for (term, value) in args.iter().zip(tuple) {
        match term {
            Term::Wildcard => {}
            Term::Const(expected) => {
                if expected != value {
                    return None;
                }
            }
            Term::Var(name) => match extended.get(name) {
                Some(bound) => {
                    if bound != value {
                        return None;
                    }
                }
                None => {
                    extended.insert(name.clone(), value.clone());
                }
            },
        }
    }
    Some(extended)
}

/// Build the head fact from a complete binding. `None` when a head
/// variable is unbound, which safety checking rules out up front.
fn instantiate(head: &Atom, env: &Env) -> Option<Fact> {
    let args = head
        .args
        .iter()
        .map(|term| match term {
            Term::Const(v) => Some(v.clone()),
            Term::Var(name) => env.get(name).cloned(),
            Term::Wildcard => None,
        })
        .collect::<Option<Vec<Value>>>()?;
    Some(Fact {
        pred: head.pred.clone(),
        args,
    })
}

/// Evaluate a comparison under the current bindings. Ordering
/// operators require integers; a failed arithmetic evaluation
/// (division by zero, overflow) fails the comparison.
fn compare(lhs: &Expr, op: CmpOp, rhs: &Expr, env: &Env) -> bool {
    let (Some(left), Some(right)) = (eval_expr(lhs, env), eval_expr(rhs, env)) else {
        return false;
    };
    match op {
        CmpOp::Eq => left == right,
        CmpOp::Ne => left != right,
        CmpOp::Lt | CmpOp::Le | CmpOp::Gt | CmpOp::Ge => {
            let (Value::Int(a), Value::Int(b)) = (&left, &right) else {
                return false;
            };
            match op {
                CmpOp::Lt => a < b,
                CmpOp::Le => a <= b,
                CmpOp::Gt => a > b,
                CmpOp::Ge => a >= b,
                _ => unreachable!(),
            }
        }
    }
}

fn eval_expr(expr: &Expr, env: &Env) -> Option<Value> {
    match expr {
        Expr::Term(Term::Const(v)) => Some(v.clone()),
        Expr::Term(Term::Var(name)) => env.get(name).cloned(),
        Expr::Term(Term::Wildcard) => None,
        Expr::BinOp(op, lhs, rhs) => {
            let a = eval_expr(lhs, env)?.as_int()?;
            let b = eval_expr(rhs, env)?.as_int()?;
            let result = match op {
                ArithOp::Add => a.checked_add(b)?,
                ArithOp::Sub => a.checked_sub(b)?,
                ArithOp::Mul => a.checked_mul(b)?,
                ArithOp::Div => a.checked_div(b)?,
            };
            Some(Value::Int(result))
        }
    }
}
