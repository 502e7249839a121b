//! Quiz assembler: a one-shot job picking N rendered parts under a random
//! policy and concatenating them into the finished quiz video.

use anyhow::{Context, Result};
use rand::Rng;
use rand::seq::IndexedRandom;
use std::collections::VecDeque;
use std::path::PathBuf;
use tracing::info;

use crate::db::PartFilters;
use crate::state::AppContext;
use crate::video::concat;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RandomPolicy {
    /// Independent uniform draws with replacement.
    Simple,

    /// Uniform draws excluding the last `M` picks.
    Memory(usize),
}

/// Draw `n` part ids from `pool` under `policy`. The memory window is capped
/// at `pool.len() - 1` so small pools stay drawable.
pub fn pick<R: Rng + ?Sized>(
    pool: &[i32],
    n: usize,
    policy: RandomPolicy,
    rng: &mut R,
) -> Vec<i32> {
    if pool.is_empty() {
        return Vec::new();
    }
    match policy {
        RandomPolicy::Simple => (0..n)
            .map(|_| *pool.choose(rng).expect("pool is non-empty"))
            .collect(),
        RandomPolicy::Memory(m) => {
            let window = m.min(pool.len() - 1);
            let mut recent: VecDeque<i32> = VecDeque::with_capacity(window);
            let mut out = Vec::with_capacity(n);
            for _ in 0..n {
                let candidates: Vec<i32> = pool
                    .iter()
                    .copied()
                    .filter(|id| !recent.contains(id))
                    .collect();
                let id = *candidates.choose(rng).expect("window < pool size");
                if window > 0 {
                    if recent.len() == window {
                        recent.pop_front();
                    }
                    recent.push_back(id);
                }
                out.push(id);
            }
            out
        }
    }
}

pub async fn assemble(
    ctx: &AppContext,
    filters: &PartFilters,
    timing_strategies: &[String],
    difficulty_strategies: &[String],
    n: usize,
    policy: RandomPolicy,
    output_name: &str,
) -> Result<PathBuf> {
    let parts = ctx
        .store
        .quiz_parts()
        .filtered(filters, timing_strategies, difficulty_strategies)
        .await?;
    let parts: Vec<_> = parts.into_iter().filter(|p| !p.local_fp.is_empty()).collect();
    anyhow::ensure!(!parts.is_empty(), "no quiz parts match the filters");

    info!("Assembling {} picks from a pool of {}", n, parts.len());

    let ids: Vec<i32> = parts.iter().map(|p| p.id).collect();
    let picked = pick(&ids, n, policy, &mut rand::rng());

    let by_id: std::collections::HashMap<i32, &str> = parts
        .iter()
        .map(|p| (p.id, p.local_fp.as_str()))
        .collect();
    let inputs: Vec<String> = picked
        .iter()
        .map(|id| {
            by_id
                .get(id)
                .map(|fp| (*fp).to_string())
                .context("picked id missing from pool")
        })
        .collect::<Result<_>>()?;

    let output_fp = ctx.quiz_dir().join(output_name);
    concat::concat(&inputs, &output_fp).await?;
    info!("Quiz written to {}", output_fp.display());
    Ok(output_fp)
}
