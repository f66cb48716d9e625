//! The fact base handle.
//!
//! A `Database` owns the asserted base facts, the loaded rule set, and
//! the derived facts computed from them. Writers call `assert_fact`,
//! `retract`, or `load_rules` and then `evaluate`; readers call
//! `query`. Derived facts are never asserted or retracted directly —
//! they are recomputed from the base whenever the base or the rules
//! change.

use cairn_facts::{Fact, Pattern};

use crate::ast::Rule;
use crate::error::RuleResult;
use crate::eval::{
    FactIndex, evaluate, index_contains, index_insert, index_matching, index_remove,
};
use crate::safety;
use crate::strata::stratify;

/// An in-memory, single-writer fact base with attached rules.
#[derive(Default)]
pub struct Database {
    base: FactIndex,
    derived: FactIndex,
    rules: Vec<Rule>,
    strata: Vec<Vec<usize>>,
    dirty: bool,
}

impl Database {
    /// Construct an empty fact base with no rules.
    pub fn new() -> Self {
        Self::default()
    }

    /// Assert one base fact. Idempotent; returns true if it was new.
    pub fn assert_fact(&mut self, fact: Fact) -> bool {
        let inserted = index_insert(&mut self.base, &fact);
        if inserted {
            self.dirty = true;
        }
        inserted
    }

    /// Assert a batch of base facts.
    pub fn assert_all(&mut self, facts: impl IntoIterator<Item = Fact>) {
        for fact in facts {
            self.assert_fact(fact);
        }
    }

    /// Retract one base fact. Returns true if it was present.
    pub fn retract(&mut self, fact: &Fact) -> bool {
        let removed = index_remove(&mut self.base, fact);
        if removed {
            self.dirty = true;
        }
        removed
    }

    /// Replace the rule set and mark derivations stale.
    ///
    /// Rules are safety-checked and stratified before anything is
    /// replaced; on error the previous rule set stays loaded.
    pub fn load_rules(&mut self, rules: Vec<Rule>) -> RuleResult<()> {
        safety::check_program(&rules)?;
        let strata = stratify(&rules)?;
        self.rules = rules;
        self.strata = strata;
        self.dirty = true;
        Ok(())
    }

    /// The currently loaded rules.
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Recompute derived facts if the base or rules changed since the
    /// last evaluation.
    pub fn evaluate(&mut self) {
        if !self.dirty {
            return;
        }
        self.derived = evaluate(&self.base, &self.rules, &self.strata);
        self.dirty = false;
    }

    /// Match a pattern against base and derived facts. Results are
    /// deduplicated (the two indexes are disjoint) and sorted.
    ///
    /// Reflects the last `evaluate`; the owning service evaluates
    /// after every mutation batch.
    pub fn query(&self, pattern: &Pattern) -> Vec<Fact> {
        let mut out = index_matching(&self.base, pattern);
        out.extend(index_matching(&self.derived, pattern));
        out.sort();
        out.dedup();
        out
    }

    /// Match a pattern against base facts only — the view used by
    /// change handling and reconciliation, which must never see
    /// derivations.
    pub fn query_base(&self, pattern: &Pattern) -> Vec<Fact> {
        index_matching(&self.base, pattern)
    }

    /// Is the fact present, either asserted or derived?
    pub fn contains(&self, fact: &Fact) -> bool {
        index_contains(&self.base, fact) || index_contains(&self.derived, fact)
    }

    /// Number of asserted base facts.
    pub fn base_len(&self) -> usize {
        self.base.values().map(|t| t.len()).sum()
    }

    /// Number of derived facts as of the last evaluation.
    pub fn derived_len(&self) -> usize {
        self.derived.values().map(|t| t.len()).sum()
    }

    /// Whether mutations are pending evaluation.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }
}
