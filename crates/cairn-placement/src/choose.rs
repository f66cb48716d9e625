//! Candidate scoring and selection.

use cairn_core::Strategy;
use rand::seq::IndexedRandom;
use tracing::debug;

/// One eligible node for a pending workload, with its free resources
/// as bound by the rules engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub node_id: String,
    pub cpu_free: i64,
    pub mem_free_mb: i64,
}

/// Free-resource score: `cpu_free + mem_free_mb / 1024` in integer
/// arithmetic. Roughly one core per GiB.
pub fn score(candidate: &Candidate) -> i64 {
    candidate.cpu_free + candidate.mem_free_mb / 1024
}

/// Pick one candidate by strategy.
///
/// `spread` takes the max score, `pack` the min, `random` a uniform
/// choice. Score ties break lexicographically by node id so the
/// deterministic strategies stay deterministic.
pub fn choose(candidates: &[Candidate], strategy: Strategy) -> Option<&Candidate> {
    if candidates.is_empty() {
        return None;
    }

    let chosen = match strategy {
        Strategy::Spread => candidates.iter().max_by(|a, b| {
            // Prefer higher score; among equals prefer the smaller id
            // (max_by keeps the later of equals, so order the id
            // comparison in reverse).
            score(a)
                .cmp(&score(b))
                .then_with(|| b.node_id.cmp(&a.node_id))
        }),
        Strategy::Pack => candidates.iter().min_by(|a, b| {
            score(a)
                .cmp(&score(b))
                .then_with(|| a.node_id.cmp(&b.node_id))
        }),
        Strategy::Random => candidates.choose(&mut rand::rng()),
    };

    if let Some(c) = chosen {
        debug!(
            node = %c.node_id,
            score = score(c),
            ?strategy,
            candidates = candidates.len(),
            "candidate chosen"
        );
    }
    chosen
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(node_id: &str, cpu_free: i64, mem_free_mb: i64) -> Candidate {
        Candidate {
            node_id: node_id.to_string(),
            cpu_free,
            mem_free_mb,
        }
    }

    #[test]
    fn score_mixes_cpu_and_gib() {
        assert_eq!(score(&candidate("n1", 4, 8192)), 12);
        // Integer division truncates sub-GiB remainders.
        assert_eq!(score(&candidate("n1", 4, 1023)), 4);
        assert_eq!(score(&candidate("n1", 0, 2048)), 2);
    }

    #[test]
    fn empty_candidates_choose_none() {
        assert!(choose(&[], Strategy::Spread).is_none());
        assert!(choose(&[], Strategy::Random).is_none());
    }

    #[test]
    fn spread_takes_emptiest() {
        let candidates = vec![
            candidate("n1", 2, 2048),
            candidate("n2", 6, 8192),
            candidate("n3", 4, 4096),
        ];
        let chosen = choose(&candidates, Strategy::Spread).unwrap();
        assert_eq!(chosen.node_id, "n2");
    }

    #[test]
    fn pack_takes_fullest() {
        let candidates = vec![
            candidate("n1", 2, 2048),
            candidate("n2", 6, 8192),
            candidate("n3", 4, 4096),
        ];
        let chosen = choose(&candidates, Strategy::Pack).unwrap();
        assert_eq!(chosen.node_id, "n1");
    }

    #[test]
    fn ties_break_lexicographically() {
        let candidates = vec![
            candidate("n2", 4, 4096),
            candidate("n1", 4, 4096),
            candidate("n3", 4, 4096),
        ];
        assert_eq!(
            choose(&candidates, Strategy::Spread).unwrap().node_id,
            "n1"
        );
        assert_eq!(choose(&candidates, Strategy::Pack).unwrap().node_id, "n1");
    }

    #[test]
    fn random_picks_from_the_set() {
        let candidates = vec![
            candidate("n1", 2, 2048),
            candidate("n2", 6, 8192),
        ];
        for _ in 0..20 {
            let chosen = choose(&candidates, Strategy::Random).unwrap();
            assert!(candidates.contains(chosen));
        }
    }

    #[test]
    fn single_candidate_wins_under_any_strategy() {
        let candidates = vec![candidate("only", 1, 1024)];
        for strategy in [Strategy::Spread, Strategy::Pack, Strategy::Random] {
            assert_eq!(choose(&candidates, strategy).unwrap().node_id, "only");
        }
    }
}
