//! cairn-placement — choosing one node among placement candidates.
//!
//! Candidates come out of the rules engine (`placement_candidate/4`);
//! this crate only scores and picks. The score is the mixed-unit sum
//! `cpu_free + mem_free_mb / 1024` (roughly one CPU per GiB), and
//! every strategy ranks candidates with it so placement stays
//! deterministic across restarts.

pub mod choose;

pub use choose::{Candidate, choose, score};
