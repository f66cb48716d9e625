//! Rule safety checking.
//!
//! A rule is safe when every variable that must be ground at use time
//! is bound by a positive body atom: head variables, variables in
//! negated atoms, and variables in comparisons. Wildcards inside
//! negated atoms are existential and always allowed; a wildcard in the
//! head would be unbound and is rejected by the same head rule.

use std::collections::HashSet;

use crate::ast::{Literal, Rule, Term};
use crate::error::{RuleError, RuleResult};

/// Check one rule; returns `RuleError::Unsafe` on the first violation.
pub fn check_rule(rule: &Rule) -> RuleResult<()> {
    let bound: HashSet<&str> = rule
        .body
        .iter()
        .filter_map(|lit| match lit {
            Literal::Pos(atom) => Some(atom.vars()),
            _ => None,
        })
        .flatten()
        .collect();

    let unsafe_err = |message: String| RuleError::Unsafe {
        rule: rule.head.pred.as_str().to_string(),
        message,
    };

    for term in &rule.head.args {
        match term {
            Term::Var(name) if !bound.contains(name.as_str()) => {
                return Err(unsafe_err(format!(
                    "head variable '{name}' is not bound by a positive body atom"
                )));
            }
            Term::Wildcard => {
                return Err(unsafe_err("wildcard in rule head".to_string()));
            }
            _ => {}
        }
    }

    for lit in &rule.body {
        match lit {
            Literal::Pos(_) => {}
            Literal::Neg(atom) => {
                for name in atom.vars() {
                    if !bound.contains(name) {
                        return Err(unsafe_err(format!(
                            "variable '{name}' in negated atom '{atom}' is not bound by a \
                             positive body atom"
                        )));
                    }
                }
            }
            Literal::Cmp(lhs, _, rhs) => {
                let mut vars = Vec::new();
                lhs.vars(&mut vars);
                rhs.vars(&mut vars);
                for name in vars {
                    if !bound.contains(name) {
                        return Err(unsafe_err(format!(
                            "variable '{name}' in comparison is not bound by a positive \
                             body atom"
                        )));
                    }
                }
            }
        }
    }

    Ok(())
}

/// Check every rule in a slice.
pub fn check_program(rules: &[Rule]) -> RuleResult<()> {
    for rule in rules {
        check_rule(rule)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::parse;

    fn rules_of(text: &str) -> Vec<Rule> {
        // Bypass parse()'s own safety pass by asserting it succeeds here;
        // these helpers are for rules that ARE safe.
        parse(text).unwrap().rules
    }

    #[test]
    fn safe_rule_passes() {
        let rules = rules_of("healthy(N) :- node(N, _, available), node_heartbeat(N, _).");
        assert!(check_program(&rules).is_ok());
    }

    #[test]
    fn negation_over_bound_variable_passes() {
        let rules = rules_of(
            "violated(W, N) :- workload_constraint(W, T, V), node(N, _, _), \
             not node_capability(N, T, V).",
        );
        assert!(check_program(&rules).is_ok());
    }

    #[test]
    fn unbound_head_variable_fails() {
        // Construct via the parser's components but check directly:
        // p(X) :- q(Y).
        let err = parse("p(X) :- q(Y).").unwrap_err();
        assert!(matches!(err, RuleError::Unsafe { .. }));
    }

    #[test]
    fn unbound_negated_variable_fails() {
        let err = parse("p(X) :- q(X), not r(Z).").unwrap_err();
        let RuleError::Unsafe { message, .. } = err else {
            panic!("expected unsafe error");
        };
        assert!(message.contains("'Z'"));
    }

    #[test]
    fn wildcard_in_negated_atom_is_existential() {
        let rules = rules_of("orphan(W) :- placement(W, N), not node(N, _, _).");
        assert!(check_program(&rules).is_ok());
    }

    #[test]
    fn unbound_comparison_variable_fails() {
        let err = parse("p(X) :- q(X), Y > 10.").unwrap_err();
        assert!(matches!(err, RuleError::Unsafe { .. }));
    }

    #[test]
    fn head_variable_bound_only_by_negation_fails() {
        let err = parse("p(N) :- q(_), not r(N).").unwrap_err();
        assert!(matches!(err, RuleError::Unsafe { .. }));
    }
}
