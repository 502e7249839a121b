//! Find strategy over the anime's pre-fetched attachment list: no network,
//! just scoring the uploader-labelled clips already on the row.

use async_trait::async_trait;
use regex::Regex;
use std::sync::OnceLock;
use tracing::{debug, info};

use super::FindStrategy;
use crate::constants;
use crate::entities::qitem;
use crate::models::{Attachment, Category};
use crate::state::AppContext;
use crate::strategy::StrategyError;

pub struct AttachmentsStrategy;

struct ScoreRegex {
    opening: Regex,
    ending: Regex,
    version: Regex,
    category_op: Regex,
    category_ed: Regex,
    full_op: Regex,
    full_ed: Regex,
}

impl ScoreRegex {
    /// `\b(nc *)?op *(\d+)? *(v\d+)?\b` for the qitem's category.
    const fn category(&self, category: Category) -> &Regex {
        match category {
            Category::Opening => &self.category_op,
            Category::Ending => &self.category_ed,
        }
    }

    /// The category pattern with a trailing `full` — the full-song demerit.
    const fn full(&self, category: Category) -> &Regex {
        match category {
            Category::Opening => &self.full_op,
            Category::Ending => &self.full_ed,
        }
    }
}

fn score_regex() -> &'static ScoreRegex {
    static INSTANCE: OnceLock<ScoreRegex> = OnceLock::new();
    fn category_regex(category: Category) -> Regex {
        Regex::new(&format!(
            r"\b(nc *)?{} *([0-9]+)? *(v[0-9]+)?\b",
            category.short()
        ))
        .expect("Invalid Regex")
    }
    fn full_regex(category: Category) -> Regex {
        Regex::new(&format!(
            r"\b(nc *)?{} *([0-9]+)? *(v[0-9]+)? *full\b",
            category.short()
        ))
        .expect("Invalid Regex")
    }
    INSTANCE.get_or_init(|| ScoreRegex {
        opening: Regex::new(r"\bopening").expect("Invalid Regex"),
        ending: Regex::new(r"\bending").expect("Invalid Regex"),
        version: Regex::new(r"(ver\.|v\.|version) *([0-9]+)").expect("Invalid Regex"),
        category_op: category_regex(Category::Opening),
        category_ed: category_regex(Category::Ending),
        full_op: full_regex(Category::Opening),
        full_ed: full_regex(Category::Ending),
    })
}

/// Composable title score: category+number pattern match, v1 preference,
/// creditless preference, song-name hit, and a demerit for full-length
/// uploads. Zero means "reject".
fn score(title: &str, item: &qitem::Model, category: Category) -> f64 {
    let r = score_regex();
    let mut title = title.to_lowercase();
    title = r.opening.replace_all(&title, "op").into_owned();
    title = r.ending.replace_all(&title, "ed").into_owned();

    let cat_match = r.category(category).captures(&title);

    let creditless = cat_match
        .as_ref()
        .is_some_and(|c| c.get(1).is_some());
    let creditless_penalty = if creditless { 1.0 } else { 0.5 };

    let number = cat_match
        .as_ref()
        .and_then(|c| c.get(2))
        .and_then(|m| m.as_str().parse::<i32>().ok())
        .unwrap_or(1);
    let number_match = number == item.number;

    // Version can ride on the category tag (`ed2v2`) or stand alone
    // (`ver. 2`); lower is better.
    let version = cat_match
        .as_ref()
        .and_then(|c| c.get(3))
        .and_then(|m| m.as_str()[1..].parse::<i32>().ok())
        .or_else(|| {
            r.version
                .captures(&title)
                .and_then(|c| c[2].parse::<i32>().ok())
        })
        .unwrap_or(1);
    let version_penalty = 0.5 + 0.5 / f64::from(version.max(1));

    let is_full = r.full(category).is_match(&title);

    let song_name_match = item.song_name.as_ref().is_some_and(|name| {
        let name = name.to_lowercase();
        name.len() >= 3 && (title.contains(&name) || crate::matching::ratio(&name, &title) > 0.9)
    });

    let accepted = !is_full && (song_name_match || number_match);
    let total = if accepted {
        version_penalty * creditless_penalty
    } else {
        0.0
    };
    debug!(
        "Scoring {title:?}: full={is_full}, number_match={number_match}, \
         song_name_match={song_name_match}, version_penalty={version_penalty}, \
         creditless={creditless}; total={total}"
    );
    total
}

#[async_trait]
impl FindStrategy for AttachmentsStrategy {
    fn name(&self) -> &str {
        constants::STRATEGY_ATTACHMENTS
    }

    async fn run(&self, ctx: &AppContext, qitem_id: i32) -> Result<(), StrategyError> {
        let Some((item, anime)) = ctx
            .store
            .qitems()
            .get_with_anime(qitem_id)
            .await
            .map_err(StrategyError::Other)?
        else {
            return Err(StrategyError::InvalidSource(format!(
                "qitem {qitem_id} does not exist"
            )));
        };
        let Some(category) = Category::from_db(&item.category) else {
            return Err(StrategyError::InvalidSource(format!(
                "qitem {qitem_id} has unknown category {:?}",
                item.category
            )));
        };

        let attachments: Vec<Attachment> = anime
            .attachments
            .as_deref()
            .and_then(|s| serde_json::from_str(s).ok())
            .unwrap_or_default();

        let candidates: Vec<&Attachment> = attachments
            .iter()
            .filter(|a| a.kind.to_lowercase() == category.short())
            .collect();
        if candidates.is_empty() {
            info!("No suitable videos were found in attachments");
            return Ok(());
        }
        info!("Attachments of correct type: {}", candidates.len());

        let best = candidates
            .iter()
            .map(|a| (score(&a.title, &item, category), *a))
            .max_by(|(s1, _), (s2, _)| s1.total_cmp(s2));

        let Some((best_score, best_attachment)) = best else {
            return Ok(());
        };
        if best_score > 0.0 {
            info!(
                "Success, score = {best_score}, title = {:?}, link = {}",
                best_attachment.title, best_attachment.url
            );
            ctx.store
                .sources()
                .insert(
                    qitem_id,
                    constants::PLATFORM_YTDLP,
                    &best_attachment.url,
                    None,
                    self.name(),
                )
                .await
                .map_err(StrategyError::Other)?;
        } else {
            info!(
                "Failure, score = {best_score}, title = {:?}",
                best_attachment.title
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(number: i32, song_name: Option<&str>) -> qitem::Model {
        qitem::Model {
            id: 1,
            anime_id: 1,
            category: "opening".to_string(),
            number,
            song_name: song_name.map(String::from),
            song_artist: None,
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    #[test]
    fn creditless_beats_credited() {
        let q = item(1, None);
        let nc = score("NCOP 1", &q, Category::Opening);
        let plain = score("Opening 1", &q, Category::Opening);
        assert!(nc > plain);
        assert!(plain > 0.0);
    }

    #[test]
    fn wrong_number_rejected_without_song_match() {
        let q = item(2, None);
        assert_eq!(score("Opening 1", &q, Category::Opening), 0.0);
        assert!(score("Opening 2", &q, Category::Opening) > 0.0);
    }

    #[test]
    fn full_version_is_a_demerit() {
        let q = item(1, None);
        assert_eq!(score("OP 1 Full", &q, Category::Opening), 0.0);
    }

    #[test]
    fn song_name_rescues_unnumbered_title() {
        let q = item(3, Some("Silhouette"));
        assert!(score("silhouette (tv size)", &q, Category::Opening) > 0.0);
    }

    #[test]
    fn v1_beats_v2() {
        let q = item(1, None);
        let v1 = score("OP 1", &q, Category::Opening);
        let v2 = score("OP 1 v2", &q, Category::Opening);
        assert!(v1 > v2);
    }
}
