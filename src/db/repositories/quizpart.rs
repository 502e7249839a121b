use crate::entities::{
    prelude::*, qitem, qitem_difficulty, qitem_source, qitem_source_timing, quiz_part,
};
use crate::models::Category;
use crate::strategy;
use anyhow::Result;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use std::collections::{HashMap, HashSet};

/// Operator filters shared by the quiz-part worker and the quiz assembler.
/// Empty vectors mean "no restriction".
#[derive(Debug, Clone, Default)]
pub struct PartFilters {
    pub category: Option<Category>,
    pub anime_ids: Vec<i32>,
    pub source_strategies: Vec<String>,
    pub styles: Vec<String>,
}

/// The winning (difficulty, timing) combination for one downloaded source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BestTriple {
    pub source_id: i32,
    pub qitem_id: i32,
    pub difficulty_id: i32,
    pub timing_id: i32,
}

/// Everything a part links to, resolved in one sweep: timing, difficulty,
/// and the source/qitem chain behind the timing.
struct LinkMaps {
    timings: HashMap<i32, qitem_source_timing::Model>,
    difficulties: HashMap<i32, qitem_difficulty::Model>,
    sources: HashMap<i32, qitem_source::Model>,
    qitems: HashMap<i32, qitem::Model>,
}

impl LinkMaps {
    /// Source behind a part, via its timing.
    fn source_of(&self, part: &quiz_part::Model) -> Option<&qitem_source::Model> {
        let timing = self.timings.get(&part.timing_id)?;
        self.sources.get(&timing.qitem_source_id)
    }

    fn qitem_of(&self, part: &quiz_part::Model) -> Option<&qitem::Model> {
        self.qitems.get(&self.source_of(part)?.qitem_id)
    }

    fn passes(&self, part: &quiz_part::Model, filters: &PartFilters) -> bool {
        if !filters.styles.is_empty() && !filters.styles.contains(&part.style) {
            return false;
        }
        if !filters.source_strategies.is_empty() {
            match self.source_of(part) {
                Some(s) if filters.source_strategies.contains(&s.added_by) => {}
                _ => return false,
            }
        }
        if filters.category.is_some() || !filters.anime_ids.is_empty() {
            let Some(q) = self.qitem_of(part) else {
                return false;
            };
            if let Some(cat) = filters.category
                && q.category != cat.as_db()
            {
                return false;
            }
            if !filters.anime_ids.is_empty() && !filters.anime_ids.contains(&q.anime_id) {
                return false;
            }
        }
        true
    }
}

pub struct QuizPartRepository {
    conn: DatabaseConnection,
}

impl QuizPartRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn get(&self, id: i32) -> Result<Option<quiz_part::Model>> {
        Ok(QuizPart::find_by_id(id).one(&self.conn).await?)
    }

    pub async fn all(&self) -> Result<Vec<quiz_part::Model>> {
        Ok(QuizPart::find()
            .order_by_asc(quiz_part::Column::Id)
            .all(&self.conn)
            .await?)
    }

    async fn link_maps(&self, parts: &[quiz_part::Model]) -> Result<LinkMaps> {
        let timing_ids: Vec<i32> = parts.iter().map(|p| p.timing_id).collect();
        let difficulty_ids: Vec<i32> = parts.iter().map(|p| p.difficulty_id).collect();

        let timings: HashMap<i32, _> = if timing_ids.is_empty() {
            HashMap::new()
        } else {
            QItemSourceTiming::find()
                .filter(qitem_source_timing::Column::Id.is_in(timing_ids))
                .all(&self.conn)
                .await?
                .into_iter()
                .map(|t| (t.id, t))
                .collect()
        };

        let difficulties: HashMap<i32, _> = if difficulty_ids.is_empty() {
            HashMap::new()
        } else {
            QItemDifficulty::find()
                .filter(qitem_difficulty::Column::Id.is_in(difficulty_ids))
                .all(&self.conn)
                .await?
                .into_iter()
                .map(|d| (d.id, d))
                .collect()
        };

        let source_ids: Vec<i32> = timings.values().map(|t| t.qitem_source_id).collect();
        let sources: HashMap<i32, _> = if source_ids.is_empty() {
            HashMap::new()
        } else {
            QItemSource::find()
                .filter(qitem_source::Column::Id.is_in(source_ids))
                .all(&self.conn)
                .await?
                .into_iter()
                .map(|s| (s.id, s))
                .collect()
        };

        let qitem_ids: Vec<i32> = sources.values().map(|s| s.qitem_id).collect();
        let qitems: HashMap<i32, _> = if qitem_ids.is_empty() {
            HashMap::new()
        } else {
            QItem::find()
                .filter(qitem::Column::Id.is_in(qitem_ids))
                .all(&self.conn)
                .await?
                .into_iter()
                .map(|q| (q.id, q))
                .collect()
        };

        Ok(LinkMaps {
            timings,
            difficulties,
            sources,
            qitems,
        })
    }

    /// Parts invalidated by an upstream edit: `updated_at` behind the linked
    /// difficulty's or timing's. Parts whose linked rows were deleted
    /// outright are reported stale too — nothing can ever refresh them.
    pub async fn stale(&self, filters: &PartFilters) -> Result<Vec<quiz_part::Model>> {
        let parts = self.all().await?;
        let links = self.link_maps(&parts).await?;

        Ok(parts
            .into_iter()
            .filter(|p| links.passes(p, filters))
            .filter(|p| {
                match (
                    links.difficulties.get(&p.difficulty_id),
                    links.timings.get(&p.timing_id),
                ) {
                    (Some(d), Some(t)) => {
                        p.updated_at < d.updated_at || p.updated_at < t.updated_at
                    }
                    _ => true,
                }
            })
            .collect())
    }

    /// Step B of the quiz-part worker: for every downloaded source passing
    /// the filters, the highest-priority (difficulty, timing) pair, ranked
    /// by `(d_rank, t_rank, d.updated_at DESC, t.updated_at DESC)`. Only
    /// strategies present in the priority lists are eligible.
    pub async fn best_triples(
        &self,
        difficulty_priorities: &[String],
        timing_priorities: &[String],
        filters: &PartFilters,
    ) -> Result<Vec<BestTriple>> {
        let mut sources = QItemSource::find()
            .filter(qitem_source::Column::LocalFp.is_not_null())
            .order_by_asc(qitem_source::Column::Id)
            .all(&self.conn)
            .await?;

        if !filters.source_strategies.is_empty() {
            sources.retain(|s| filters.source_strategies.contains(&s.added_by));
        }

        if filters.category.is_some() || !filters.anime_ids.is_empty() {
            let qitem_ids: Vec<i32> = sources.iter().map(|s| s.qitem_id).collect();
            let qitems: HashMap<i32, qitem::Model> = QItem::find()
                .filter(qitem::Column::Id.is_in(qitem_ids))
                .all(&self.conn)
                .await?
                .into_iter()
                .map(|q| (q.id, q))
                .collect();
            sources.retain(|s| {
                let Some(q) = qitems.get(&s.qitem_id) else {
                    return false;
                };
                if let Some(cat) = filters.category
                    && q.category != cat.as_db()
                {
                    return false;
                }
                filters.anime_ids.is_empty() || filters.anime_ids.contains(&q.anime_id)
            });
        }

        if sources.is_empty() {
            return Ok(Vec::new());
        }

        let qitem_ids: Vec<i32> = sources.iter().map(|s| s.qitem_id).collect();
        let source_ids: Vec<i32> = sources.iter().map(|s| s.id).collect();

        let difficulties = QItemDifficulty::find()
            .filter(qitem_difficulty::Column::QitemId.is_in(qitem_ids))
            .filter(qitem_difficulty::Column::AddedBy.is_in(difficulty_priorities.iter().cloned()))
            .all(&self.conn)
            .await?;

        let timings = QItemSourceTiming::find()
            .filter(qitem_source_timing::Column::QitemSourceId.is_in(source_ids))
            .filter(qitem_source_timing::Column::AddedBy.is_in(timing_priorities.iter().cloned()))
            .all(&self.conn)
            .await?;

        // `(rank, Reverse(updated_at))`: lowest rank wins, freshest row
        // breaks ties within a rank.
        fn sort_key<'a>(priorities: &[String], added_by: &'a str, updated_at: &'a str) -> (usize, std::cmp::Reverse<&'a str>) {
            (
                strategy::rank(priorities, added_by),
                std::cmp::Reverse(updated_at),
            )
        }

        let mut best_difficulty: HashMap<i32, &qitem_difficulty::Model> = HashMap::new();
        for d in &difficulties {
            let entry = best_difficulty.entry(d.qitem_id).or_insert(d);
            let cur = *entry;
            if sort_key(difficulty_priorities, &d.added_by, &d.updated_at)
                < sort_key(difficulty_priorities, &cur.added_by, &cur.updated_at)
            {
                *entry = d;
            }
        }

        let mut best_timing: HashMap<i32, &qitem_source_timing::Model> = HashMap::new();
        for t in &timings {
            let entry = best_timing.entry(t.qitem_source_id).or_insert(t);
            let cur = *entry;
            if sort_key(timing_priorities, &t.added_by, &t.updated_at)
                < sort_key(timing_priorities, &cur.added_by, &cur.updated_at)
            {
                *entry = t;
            }
        }

        Ok(sources
            .iter()
            .filter_map(|s| {
                let d = best_difficulty.get(&s.qitem_id)?;
                let t = best_timing.get(&s.id)?;
                Some(BestTriple {
                    source_id: s.id,
                    qitem_id: s.qitem_id,
                    difficulty_id: d.id,
                    timing_id: t.id,
                })
            })
            .collect())
    }

    /// Keys of every existing render, for the step-C anti-join.
    pub async fn existing_keys(&self) -> Result<HashSet<(i32, i32, String)>> {
        Ok(self
            .all()
            .await?
            .into_iter()
            .map(|p| (p.timing_id, p.difficulty_id, p.style))
            .collect())
    }

    /// Step D.1: placeholder row flushed to obtain the id the output path is
    /// named after. Returns `None` when another worker already rendered this
    /// (timing, difficulty, style).
    pub async fn insert_placeholder(
        &self,
        timing_id: i32,
        difficulty_id: i32,
        style: &str,
    ) -> Result<Option<quiz_part::Model>> {
        let now = crate::db::now();
        let model = quiz_part::ActiveModel {
            timing_id: Set(timing_id),
            difficulty_id: Set(difficulty_id),
            style: Set(style.to_string()),
            local_fp: Set(String::new()),
            created_at: Set(now.clone()),
            updated_at: Set(now),
            ..Default::default()
        };
        match QuizPart::insert(model).exec(&self.conn).await {
            Ok(res) => Ok(self.get(res.last_insert_id).await?),
            Err(e) if crate::db::is_unique_violation(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn set_local_fp(&self, id: i32, local_fp: &str) -> Result<()> {
        let Some(row) = QuizPart::find_by_id(id).one(&self.conn).await? else {
            anyhow::bail!("quiz part {id} not found");
        };
        let mut am: quiz_part::ActiveModel = row.into();
        am.local_fp = Set(local_fp.to_string());
        am.updated_at = Set(crate::db::now());
        am.update(&self.conn).await?;
        Ok(())
    }

    pub async fn delete(&self, id: i32) -> Result<()> {
        QuizPart::delete_by_id(id).exec(&self.conn).await?;
        Ok(())
    }

    /// All parts rendered from any timing of `source_id` (step E and the
    /// cleanup sweeps walk these).
    pub async fn parts_for_source(&self, source_id: i32) -> Result<Vec<quiz_part::Model>> {
        let timing_ids: Vec<i32> = QItemSourceTiming::find()
            .filter(qitem_source_timing::Column::QitemSourceId.eq(source_id))
            .all(&self.conn)
            .await?
            .into_iter()
            .map(|t| t.id)
            .collect();
        if timing_ids.is_empty() {
            return Ok(Vec::new());
        }
        Ok(QuizPart::find()
            .filter(quiz_part::Column::TimingId.is_in(timing_ids))
            .order_by_asc(quiz_part::Column::Id)
            .all(&self.conn)
            .await?)
    }

    /// Ids of parts duplicating another on (timing, difficulty, style),
    /// keeping the highest id of each group. The unique index prevents new
    /// duplicates; this reconciles anything predating it.
    pub async fn duplicate_ids(&self) -> Result<Vec<i32>> {
        let mut newest: HashMap<(i32, i32, String), i32> = HashMap::new();
        let mut doomed = Vec::new();
        for p in self.all().await? {
            let key = (p.timing_id, p.difficulty_id, p.style.clone());
            match newest.entry(key) {
                std::collections::hash_map::Entry::Occupied(mut entry) => {
                    let best = entry.get_mut();
                    if *best >= p.id {
                        doomed.push(p.id);
                    } else {
                        doomed.push(*best);
                        *best = p.id;
                    }
                }
                std::collections::hash_map::Entry::Vacant(entry) => {
                    entry.insert(p.id);
                }
            }
        }
        Ok(doomed)
    }

    /// Assembler pool: parts passing the filters, with the timing/difficulty
    /// strategy allow-lists applied through the linked rows.
    pub async fn filtered(
        &self,
        filters: &PartFilters,
        timing_strategies: &[String],
        difficulty_strategies: &[String],
    ) -> Result<Vec<quiz_part::Model>> {
        let parts = self.all().await?;
        let links = self.link_maps(&parts).await?;

        Ok(parts
            .into_iter()
            .filter(|p| links.passes(p, filters))
            .filter(|p| {
                if timing_strategies.is_empty() {
                    true
                } else {
                    links
                        .timings
                        .get(&p.timing_id)
                        .is_some_and(|t| timing_strategies.contains(&t.added_by))
                }
            })
            .filter(|p| {
                if difficulty_strategies.is_empty() {
                    true
                } else {
                    links
                        .difficulties
                        .get(&p.difficulty_id)
                        .is_some_and(|d| difficulty_strategies.contains(&d.added_by))
                }
            })
            .collect())
    }
}
