//! Timing worker: one guess/reveal pair per (source, strategy) pair that
//! does not have one yet.

use anyhow::Result;
use async_trait::async_trait;
use rand::Rng;
use rand::seq::SliceRandom;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::LoopOptions;
use crate::constants;
use crate::state::AppContext;
use crate::strategy::StrategyError;
use crate::timecode;

#[async_trait]
pub trait TimingStrategy: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self, ctx: &AppContext, source_id: i32) -> Result<(), StrategyError>;
}

/// The safe baseline: guess from the very start, reveal at 50 seconds.
pub struct DefaultTiming;

#[async_trait]
impl TimingStrategy for DefaultTiming {
    fn name(&self) -> &str {
        constants::STRATEGY_DEFAULT_TIMING
    }

    async fn run(&self, ctx: &AppContext, source_id: i32) -> Result<(), StrategyError> {
        ctx.store
            .timings()
            .insert(
                source_id,
                &timecode::zero(),
                &timecode::format(Duration::from_secs(50)),
                self.name(),
            )
            .await
            .map_err(StrategyError::Other)?;
        Ok(())
    }
}

/// A single instant sampled uniformly from the first 80 seconds, used for
/// both guess and reveal.
pub struct RandomTiming;

#[async_trait]
impl TimingStrategy for RandomTiming {
    fn name(&self) -> &str {
        constants::STRATEGY_RANDOM_TIMING
    }

    async fn run(&self, ctx: &AppContext, source_id: i32) -> Result<(), StrategyError> {
        let micros = rand::rng().random_range(1_000_000..=80_000_000u64);
        let at = timecode::format(Duration::from_micros(micros));
        ctx.store
            .timings()
            .insert(source_id, &at, &at, self.name())
            .await
            .map_err(StrategyError::Other)?;
        Ok(())
    }
}

pub fn registry(ctx: &AppContext) -> Result<Vec<Arc<dyn TimingStrategy>>> {
    let mut out: Vec<Arc<dyn TimingStrategy>> = Vec::new();
    for name in &ctx.config.strategies.timing {
        let strategy: Arc<dyn TimingStrategy> = match name.as_str() {
            constants::STRATEGY_DEFAULT_TIMING => Arc::new(DefaultTiming),
            constants::STRATEGY_RANDOM_TIMING => Arc::new(RandomTiming),
            other => anyhow::bail!("unknown timing strategy in config: {other}"),
        };
        out.push(strategy);
    }
    Ok(out)
}

pub async fn run(ctx: Arc<AppContext>, opts: LoopOptions) -> Result<()> {
    let strategies = registry(&ctx)?;
    anyhow::ensure!(!strategies.is_empty(), "no timing strategies configured");

    tokio::time::sleep(opts.startup_delay).await;
    info!("Timing worker started");

    let gate = crate::sync::RateGate::new(opts.interval, true);
    loop {
        if !gate.run(run_one(&ctx, &strategies)).await? {
            debug!("No jobs were found");
            tokio::time::sleep(opts.wait).await;
        }
    }
}

/// One job-selection cycle: strategies are visited in random order so a
/// backlog on one cannot starve the others. Returns whether a job ran.
pub async fn run_one(
    ctx: &AppContext,
    strategies: &[Arc<dyn TimingStrategy>],
) -> Result<bool> {
    let mut order: Vec<&Arc<dyn TimingStrategy>> = strategies.iter().collect();
    order.shuffle(&mut rand::rng());

    for strategy in order {
        let missing = ctx
            .store
            .sources()
            .ids_missing_timing_by(strategy.name())
            .await?;
        let Some(source_id) = missing.first() else {
            continue;
        };

        info!(
            "Running strategy \"{}\" on source_id={}",
            strategy.name(),
            source_id
        );
        strategy.run(ctx, *source_id).await?;
        return Ok(true);
    }
    Ok(false)
}
