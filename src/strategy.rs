//! Strategy failure taxonomy and priority ranking.
//!
//! Every pluggable automation (find, download, timing, difficulty) is a named
//! strategy; its name is stamped into `added_by` on the rows it creates.
//! Strategies are registered in a fixed priority order, and the `"manual"`
//! pseudo-strategy always outranks all of them.

use sea_orm::DbErr;
use thiserror::Error;

pub const MANUAL: &str = "manual";

/// The two failure kinds worker loops are allowed to absorb. Anything else
/// coming out of a strategy is a bug and must propagate.
#[derive(Debug, Error)]
pub enum StrategyError {
    /// The input row is permanently unusable; the caller marks it `invalid`.
    #[error("invalid source: {0}")]
    InvalidSource(String),

    /// A retryable condition; the caller bans the row for `ban_duration`.
    #[error("temporary failure: {0}")]
    TemporaryFailure(String),

    #[error(transparent)]
    Db(#[from] DbErr),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// A priority list with `"manual"` prepended (rank 0). Callers configure the
/// automated strategy order; manual rows always win ties against them.
#[must_use]
pub fn with_manual(strategies: &[String]) -> Vec<String> {
    let mut out = Vec::with_capacity(strategies.len() + 1);
    out.push(MANUAL.to_string());
    for s in strategies {
        if s != MANUAL {
            out.push(s.clone());
        }
    }
    out
}

/// Rank of `added_by` within `priorities` (lower is better). Names absent
/// from the list sort after every listed one.
#[must_use]
pub fn rank(priorities: &[String], added_by: &str) -> usize {
    priorities
        .iter()
        .position(|p| p == added_by)
        .unwrap_or(priorities.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_is_always_first() {
        let ps = with_manual(&["strategy_a".to_string(), "manual".to_string()]);
        assert_eq!(ps, vec!["manual", "strategy_a"]);
        assert_eq!(rank(&ps, "manual"), 0);
        assert_eq!(rank(&ps, "strategy_a"), 1);
    }

    #[test]
    fn unknown_names_rank_last() {
        let ps = with_manual(&["strategy_a".to_string()]);
        assert_eq!(rank(&ps, "strategy_zzz"), ps.len());
        assert!(rank(&ps, "strategy_zzz") > rank(&ps, "strategy_a"));
    }
}
