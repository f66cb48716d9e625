//! Predicate stratification.
//!
//! Negation as failure is only well-defined when no predicate depends
//! on its own negation. Stratification assigns each head predicate a
//! stratum such that positive dependencies stay within a stratum or
//! below and negative dependencies point strictly below; evaluation
//! then runs the strata bottom-up.

use std::collections::HashMap;

use cairn_facts::Symbol;

use crate::ast::{Literal, Rule};
use crate::error::{RuleError, RuleResult};

/// Group rule indexes into evaluation strata, lowest first.
///
/// Predicates with no rules (EDB predicates) implicitly sit at stratum
/// zero. Fails with `NotStratifiable` when negation occurs in a
/// dependency cycle.
pub fn stratify(rules: &[Rule]) -> RuleResult<Vec<Vec<usize>>> {
    let mut stratum: HashMap<Symbol, usize> = HashMap::new();
    for rule in rules {
        stratum.entry(rule.head.pred.clone()).or_insert(0);
    }

    // The stratum of any predicate is bounded by the number of head
    // predicates; one extra pass detects divergence (a negation cycle).
    let max_rounds = stratum.len() + 1;
    for round in 0..=max_rounds {
        let mut changed = false;
        for rule in rules {
            let head = rule.head.pred.clone();
            for lit in &rule.body {
                let (dep, strict) = match lit {
                    Literal::Pos(atom) => (atom.pred.clone(), false),
                    Literal::Neg(atom) => (atom.pred.clone(), true),
                    Literal::Cmp(..) => continue,
                };
                let dep_stratum = stratum.get(&dep).copied().unwrap_or(0);
                let required = if strict { dep_stratum + 1 } else { dep_stratum };
                let current = stratum.get(&head).copied().unwrap_or(0);
                if required > current {
                    stratum.insert(head.clone(), required);
                    changed = true;
                }
            }
        }
        if !changed {
            break;
        }
        if round == max_rounds {
            // Still growing after the bound: some head is in a negation cycle.
            let culprit = stratum
                .iter()
                .max_by_key(|(_, s)| **s)
                .map(|(p, _)| p.as_str().to_string())
                .unwrap_or_default();
            return Err(RuleError::NotStratifiable(culprit));
        }
    }

    let top = stratum.values().copied().max().unwrap_or(0);
    let mut grouped: Vec<Vec<usize>> = vec![Vec::new(); top + 1];
    for (idx, rule) in rules.iter().enumerate() {
        let s = stratum.get(&rule.head.pred).copied().unwrap_or(0);
        grouped[s].push(idx);
    }
    grouped.retain(|g| !g.is_empty());
    Ok(grouped)
}
