//! Set difference between a live fact slice and a desired projection.

use std::collections::HashSet;

use crate::value::Fact;

/// Compute `(to_assert, to_retract)` between the current and desired
/// fact sets: `desired − current` must be asserted, `current − desired`
/// retracted. Output is sorted for deterministic application order.
pub fn diff(current: &[Fact], desired: &[Fact]) -> (Vec<Fact>, Vec<Fact>) {
    let current_set: HashSet<&Fact> = current.iter().collect();
    let desired_set: HashSet<&Fact> = desired.iter().collect();

    let mut to_assert: Vec<Fact> = desired_set
        .difference(&current_set)
        .map(|f| (*f).clone())
        .collect();
    let mut to_retract: Vec<Fact> = current_set
        .difference(&desired_set)
        .map(|f| (*f).clone())
        .collect();

    to_assert.sort();
    to_retract.sort();
    (to_assert, to_retract)
}
