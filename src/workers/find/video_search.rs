//! Find strategy over the external video search provider: two queries per
//! qitem (romanized and English title), candidates scored on title match,
//! duration plausibility and helper keywords.

use async_trait::async_trait;
use std::collections::HashMap;
use tracing::{debug, info};

use super::FindStrategy;
use crate::clients::video_search::SearchVideo;
use crate::config::Config;
use crate::constants;
use crate::matching;
use crate::models::Category;
use crate::state::AppContext;
use crate::strategy::StrategyError;

pub struct VideoSearchStrategy {
    score_threshold: f64,
    expected_durations: Vec<f64>,
    helpers: Vec<String>,
    negative_helpers: Vec<String>,
}

impl VideoSearchStrategy {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            score_threshold: config.search.score_threshold,
            expected_durations: config.search.expected_durations.clone(),
            helpers: config.search.helpers.clone(),
            negative_helpers: config.search.negative_helpers.clone(),
        }
    }

    fn title_score(&self, title: &str, query: &str) -> f64 {
        matching::token_ratio(
            &matching::preprocess(query, 5),
            &matching::preprocess(title, 5),
        )
    }

    fn duration_score(&self, duration: f64) -> f64 {
        self.expected_durations
            .iter()
            .map(|d| matching::asymmetrical_similarity(duration, *d))
            .fold(0.0, f64::max)
    }

    /// A non-zero veto keyword hit forces the score to zero; otherwise the
    /// sharpened title match gates the duration kernel, with helper keywords
    /// as a flat bonus.
    fn score(&self, video: &SearchVideo, query: &str) -> f64 {
        if matching::keyword_score(&self.negative_helpers, &video.title) > 0.0 {
            return 0.0;
        }

        let title_score = self.title_score(&video.title, query);
        let helpers_score = matching::keyword_score(&self.helpers, &video.title);
        let duration_score = self.duration_score(video.duration);

        matching::contrast(title_score, 2.5).powi(2) * duration_score + 0.5 * helpers_score
    }
}

#[async_trait]
impl FindStrategy for VideoSearchStrategy {
    fn name(&self) -> &str {
        constants::STRATEGY_VIDEO_SEARCH
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

        let titles: Vec<&String> = [Some(&anime.title_ro), anime.title_en.as_ref()]
            .into_iter()
            .flatten()
            .collect();

        // Each link keeps its best score across both query variants.
        let mut scores: HashMap<String, (f64, String)> = HashMap::new();
        for title in titles {
            let query = format!("{title} {} {}", category.short(), item.number);
            info!("Video search query: {query}");
            let results = ctx
                .search
                .search(&query)
                .await
                .map_err(|e| StrategyError::TemporaryFailure(format!("search failed: {e:#}")))?;
            info!("Found {} search results", results.len());

            for video in results {
                let score = self.score(&video, &query);
                debug!(
                    "Title={:?}, link={}, score={:.3}",
                    video.title, video.link, score
                );
                let entry = scores
                    .entry(video.link.clone())
                    .or_insert((score, video.title.clone()));
                if score > entry.0 {
                    *entry = (score, video.title.clone());
                }
            }
        }

        let best = scores
            .iter()
            .max_by(|(_, (s1, _)), (_, (s2, _))| s1.total_cmp(s2));
        let Some((link, (score, title))) = best else {
            info!("No results at all");
            return Ok(());
        };

        if *score >= self.score_threshold {
            info!(
                "Top score: {score:.3} >= {}, link={link}, success ({title:?})",
                self.score_threshold
            );
            ctx.store
                .sources()
                .insert(
                    qitem_id,
                    constants::PLATFORM_YTDLP,
                    link,
                    None,
                    self.name(),
                )
                .await
                .map_err(StrategyError::Other)?;
        } else {
            info!(
                "Top score: {score:.3} < {}, link={link}, failure",
                self.score_threshold
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strategy() -> VideoSearchStrategy {
        VideoSearchStrategy::from_config(&Config::default())
    }

    fn video(title: &str, duration: f64) -> SearchVideo {
        SearchVideo {
            title: title.to_string(),
            link: "https://example.invalid/v".to_string(),
            duration,
        }
    }

    #[test]
    fn veto_keyword_zeroes_the_score() {
        let s = strategy();
        let q = "cowboy bebop op 1";
        assert_eq!(s.score(&video("Cowboy Bebop OP 1 Full", 271.0), q), 0.0);
        assert!(s.score(&video("Cowboy Bebop OP 1", 90.0), q) > 0.0);
    }

    #[test]
    fn exact_match_at_expected_duration_clears_the_threshold() {
        let s = strategy();
        let q = "cowboy bebop op 1";
        let score = s.score(&video("Cowboy Bebop OP 1", 90.0), q);
        assert!(score >= s.score_threshold, "score was {score}");
    }

    #[test]
    fn full_length_duration_tanks_the_score() {
        let s = strategy();
        let q = "cowboy bebop op 1";
        let tv_size = s.score(&video("Cowboy Bebop OP 1", 90.0), q);
        let full = s.score(&video("Cowboy Bebop OP 1", 272.0), q);
        assert!(full < tv_size / 2.0);
    }

    #[test]
    fn helper_keywords_add_a_bonus() {
        let q = "cowboy bebop op 1";
        let v = video("Cowboy Bebop OP 1 Creditless", 90.0);

        let with_helpers = strategy();
        let mut config = Config::default();
        config.search.helpers.clear();
        let without_helpers = VideoSearchStrategy::from_config(&config);

        assert!(with_helpers.score(&v, q) > without_helpers.score(&v, q));
    }

    #[test]
    fn wrong_number_scores_below_right_number() {
        let s = strategy();
        let q = "naruto op 2";
        let right = s.score(&video("Naruto OP 2", 90.0), q);
        let wrong = s.score(&video("Naruto OP 7", 90.0), q);
        assert!(right > wrong);
    }
}
