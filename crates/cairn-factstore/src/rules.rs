//! Shipped rule assets.
//!
//! Three files loaded in fixed order: scheduling, lifecycle, health.
//! The health file is a template; the staleness and overload
//! thresholds are substituted from configuration at load time.

use cairn_core::CairnConfig;
use cairn_datalog::{Program, parse};

use crate::error::{FactStoreError, FactStoreResult};

const SCHEDULING: &str = include_str!("../rules/scheduling.dl");
const LIFECYCLE: &str = include_str!("../rules/lifecycle.dl");
const HEALTH_TEMPLATE: &str = include_str!("../rules/health.dl");

/// Render the health rules with the configured thresholds.
pub fn health_rules(stale_threshold_s: i64, overload_threshold_pct: i64) -> String {
    HEALTH_TEMPLATE
        .replace("{stale_threshold_s}", &stale_threshold_s.to_string())
        .replace("{overload_threshold_pct}", &overload_threshold_pct.to_string())
}

/// Parse the three shipped files in load order into one program.
/// Any failure here is fatal: the shipped rules define the system.
pub fn shipped_program(config: &CairnConfig) -> FactStoreResult<Program> {
    let health = health_rules(config.node_stale_threshold_s, config.overload_threshold_pct);

    let mut program = Program::default();
    for (file, text) in [
        ("scheduling.dl", SCHEDULING),
        ("lifecycle.dl", LIFECYCLE),
        ("health.dl", health.as_str()),
    ] {
        let parsed = parse(text).map_err(|source| FactStoreError::ShippedRule { file, source })?;
        program.extend(parsed);
    }
    Ok(program)
}
