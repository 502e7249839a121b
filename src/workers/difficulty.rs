//! Difficulty worker: one value per (qitem, strategy) pair that does not
//! have one yet.

use anyhow::Result;
use async_trait::async_trait;
use rand::Rng;
use rand::seq::SliceRandom;
use std::sync::Arc;
use tracing::{debug, info};

use super::LoopOptions;
use crate::constants;
use crate::state::AppContext;
use crate::strategy::StrategyError;

#[async_trait]
pub trait DifficultyStrategy: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self, ctx: &AppContext, qitem_id: i32) -> Result<(), StrategyError>;
}

/// Uniform draw over the whole [0, 100] range; a placeholder until something
/// smarter grades by popularity.
pub struct RandomDifficulty;

#[async_trait]
impl DifficultyStrategy for RandomDifficulty {
    fn name(&self) -> &str {
        constants::STRATEGY_RANDOM_DIFFICULTY
    }

    async fn run(&self, ctx: &AppContext, qitem_id: i32) -> Result<(), StrategyError> {
        let value = rand::rng().random_range(0..=100);
        ctx.store
            .difficulties()
            .insert(qitem_id, value, self.name())
            .await
            .map_err(StrategyError::Other)?;
        Ok(())
    }
}

pub fn registry(ctx: &AppContext) -> Result<Vec<Arc<dyn DifficultyStrategy>>> {
    let mut out: Vec<Arc<dyn DifficultyStrategy>> = Vec::new();
    for name in &ctx.config.strategies.difficulty {
        let strategy: Arc<dyn DifficultyStrategy> = match name.as_str() {
            constants::STRATEGY_RANDOM_DIFFICULTY => Arc::new(RandomDifficulty),
            other => anyhow::bail!("unknown difficulty strategy in config: {other}"),
        };
        out.push(strategy);
    }
    Ok(out)
}

pub async fn run(ctx: Arc<AppContext>, opts: LoopOptions) -> Result<()> {
    let strategies = registry(&ctx)?;
    anyhow::ensure!(!strategies.is_empty(), "no difficulty strategies configured");

    tokio::time::sleep(opts.startup_delay).await;
    info!("Difficulty worker started");

    let gate = crate::sync::RateGate::new(opts.interval, true);
    loop {
        if !gate.run(run_one(&ctx, &strategies)).await? {
            debug!("No jobs were found");
            tokio::time::sleep(opts.wait).await;
        }
    }
}

pub async fn run_one(
    ctx: &AppContext,
    strategies: &[Arc<dyn DifficultyStrategy>],
) -> Result<bool> {
    let mut order: Vec<&Arc<dyn DifficultyStrategy>> = strategies.iter().collect();
    order.shuffle(&mut rand::rng());

    for strategy in order {
        let missing = ctx
            .store
            .qitems()
            .ids_missing_difficulty_by(strategy.name())
            .await?;
        let Some(qitem_id) = missing.first() else {
            continue;
        };

        info!(
            "Running strategy \"{}\" on qitem_id={}",
            strategy.name(),
            qitem_id
        );
        strategy.run(ctx, *qitem_id).await?;
        return Ok(true);
    }
    Ok(false)
}
