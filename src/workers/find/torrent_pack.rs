//! Find strategy over a curated theme-song torrent pack: pick the folder by
//! fuzzy title match, then the file by decoding the pack's name grammar and
//! scoring it against the qitem.

use async_trait::async_trait;
use lava_torrent::torrent::v1::Torrent;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use super::FindStrategy;
use crate::config::Config;
use crate::constants;
use crate::entities::{anime, aod_anime, qitem};
use crate::matching::{self, pack_name};
use crate::models::{Category, string_list};
use crate::state::AppContext;
use crate::strategy::StrategyError;

pub struct TorrentPackStrategy {
    torrent_fp: PathBuf,
    folder_threshold: f64,
    file_threshold: f64,
    files: OnceCell<BTreeMap<String, Vec<String>>>,
}

impl TorrentPackStrategy {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            torrent_fp: config.pack_torrent_path(),
            folder_threshold: config.pack.folder_threshold,
            file_threshold: config.pack.file_threshold,
            files: OnceCell::new(),
        }
    }

    /// Pack contents grouped by folder, loaded from the torrent metadata on
    /// first use.
    async fn files(&self) -> Result<&BTreeMap<String, Vec<String>>, StrategyError> {
        self.files
            .get_or_try_init(|| async {
                let fp = self.torrent_fp.clone();
                let torrent = tokio::task::spawn_blocking(move || Torrent::read_from_file(&fp))
                    .await
                    .map_err(|e| StrategyError::Other(e.into()))?
                    .map_err(|e| {
                        StrategyError::Other(anyhow::anyhow!(
                            "reading pack torrent {}: {e}",
                            self.torrent_fp.display()
                        ))
                    })?;

                let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();
                for file in torrent.files.unwrap_or_default() {
                    let parts: Vec<String> = file
                        .path
                        .components()
                        .map(|c| c.as_os_str().to_string_lossy().into_owned())
                        .collect();
                    let Some((name, folder)) = parts.split_last() else {
                        continue;
                    };
                    grouped
                        .entry(folder.join("/"))
                        .or_default()
                        .push(name.clone());
                }
                Ok(grouped)
            })
            .await
    }

    fn find_folder<'a>(
        &self,
        files: &'a BTreeMap<String, Vec<String>>,
        anime: &anime::Model,
    ) -> Option<&'a str> {
        info!("Trying to find folder...");
        let titles: Vec<&String> = [Some(&anime.title_ro), anime.title_en.as_ref()]
            .into_iter()
            .flatten()
            .collect();

        let mut scored: Vec<(&str, f64)> = files
            .keys()
            .map(|folder| {
                let score = titles
                    .iter()
                    .map(|t| matching::ratio(t, folder))
                    .fold(0.0, f64::max);
                (folder.as_str(), score)
            })
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));

        for (folder, score) in scored.iter().take(3) {
            debug!("Folder candidate: ({folder} - {score:.3})");
        }

        let (best, best_score) = scored.first()?;
        if *best_score >= self.folder_threshold {
            info!(
                "Folder success! Best score = {best_score:.3} >= {:.3}",
                self.folder_threshold
            );
            Some(best)
        } else {
            info!(
                "Folder failure! Best score = {best_score:.3} < {:.3}",
                self.folder_threshold
            );
            None
        }
    }
}

/// Score one decoded pack entry against the qitem. Geometric mean keeps a
/// single bad dimension from being papered over by the others.
fn score_file(
    parsed: &pack_name::PackFileName,
    item: &qitem::Model,
    category: Category,
    season: i32,
    aod: Option<&aod_anime::Model>,
) -> f64 {
    let song_name_score = item.song_name.as_ref().map_or(0.0, |name| {
        let r = matching::ratio(&name.to_lowercase(), &parsed.song_name.to_lowercase());
        if r >= 0.9 { r } else { 0.0 }
    });
    let version_score = {
        let weight = 0.25;
        1.0 - weight + weight / f64::from(parsed.version.unwrap_or(1).max(1))
    };

    // A confident song-name hit trumps everything else.
    if song_name_score > 0.0 {
        return version_score * 2.0;
    }
    if parsed.theme_type != category {
        return 0.0;
    }

    let expected_show_type = match aod.map(|a| a.anime_type.as_str()) {
        Some("ova") => "ova",
        Some("ona") => "ona",
        Some("special") => "special",
        Some("movie") => "movie",
        _ => "tv",
    };
    let season_score = parsed
        .show_types
        .get(expected_show_type)
        .map_or(0.0, |n| matching::divergence(f64::from(*n), f64::from(season)));

    let theme_number_score =
        matching::divergence(f64::from(parsed.theme_num), f64::from(item.number));

    // Episode-specific themes lose a little against the regular cut.
    let episode_score = if parsed.episode.is_none() { 1.0 } else { 0.9 };

    (theme_number_score * season_score * version_score * episode_score).powf(0.25)
}

#[async_trait]
impl FindStrategy for TorrentPackStrategy {
    fn name(&self) -> &str {
        constants::STRATEGY_TORRENT_PACK
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
        let aod = ctx
            .store
            .animes()
            .get_with_aod(anime.mal_id)
            .await
            .map_err(StrategyError::Other)?
            .and_then(|(_, aod)| aod);

        let files = self.files().await?;
        let Some(folder) = self.find_folder(files, &anime) else {
            info!("Strategy failure! qitem_id={qitem_id}");
            return Ok(());
        };

        let mut season_titles: Vec<String> = vec![anime.title_ro.clone()];
        season_titles.extend(anime.title_en.clone());
        season_titles.extend(anime.title_native.clone());
        season_titles.extend(string_list(anime.synonyms.as_ref()));
        if let Some(aod) = &aod {
            season_titles.extend(string_list(Some(&aod.synonyms)));
        }
        let season = pack_name::infer_season(&season_titles);

        let names = &files[folder];
        let mut scored: Vec<(&String, f64)> = names
            .iter()
            .map(|name| {
                let score = pack_name::parse(name)
                    .map_or(0.0, |parsed| {
                        score_file(&parsed, &item, category, season, aod.as_ref())
                    });
                (name, score)
            })
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));

        for (name, score) in scored.iter().take(3) {
            debug!("File candidate: ({name} - {score:.3})");
        }

        let Some((best_name, best_score)) = scored.first() else {
            return Ok(());
        };
        if *best_score >= self.file_threshold {
            info!(
                "File success! Best score = {best_score:.3} >= {:.3}",
                self.file_threshold
            );
            let additional = format!("{folder}/{best_name}");
            ctx.store
                .sources()
                .insert(
                    qitem_id,
                    constants::PLATFORM_TORRENT,
                    &self.torrent_fp.display().to_string(),
                    Some(additional),
                    self.name(),
                )
                .await
                .map_err(StrategyError::Other)?;
            info!("Strategy success! New source for qitem_id={qitem_id}");
        } else {
            info!(
                "File failure! Best score = {best_score:.3} < {:.3}",
                self.file_threshold
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(category: &str, number: i32, song_name: Option<&str>) -> qitem::Model {
        qitem::Model {
            id: 1,
            anime_id: 1,
            category: category.to_string(),
            number,
            song_name: song_name.map(String::from),
            song_artist: None,
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    fn parsed(name: &str) -> pack_name::PackFileName {
        pack_name::parse(name).unwrap()
    }

    #[test]
    fn matching_theme_and_season_scores_high() {
        let q = item("opening", 1, None);
        let p = parsed("[Pack] Show TV 1 OP01 - Song (Artist).mkv");
        let s = score_file(&p, &q, Category::Opening, 1, None);
        assert!(s >= 0.8, "score was {s}");
    }

    #[test]
    fn wrong_theme_type_is_zero() {
        let q = item("ending", 1, None);
        let p = parsed("[Pack] Show TV 1 OP01 - Song (Artist).mkv");
        assert_eq!(score_file(&p, &q, Category::Ending, 1, None), 0.0);
    }

    #[test]
    fn theme_number_distance_decays() {
        let q = item("opening", 1, None);
        let near = parsed("[Pack] Show TV 1 OP02 - Song (Artist).mkv");
        let far = parsed("[Pack] Show TV 1 OP09 - Song (Artist).mkv");
        let s_near = score_file(&near, &q, Category::Opening, 1, None);
        let s_far = score_file(&far, &q, Category::Opening, 1, None);
        assert!(s_near > s_far);
    }

    #[test]
    fn song_name_hit_wins_even_with_wrong_tag() {
        let q = item("opening", 1, Some("Tank!"));
        let p = parsed("[Pack] Show TV 1 ED05 - Tank! (Seatbelts).mkv");
        let s = score_file(&p, &q, Category::Opening, 1, None);
        assert!(s > 1.0);
    }

    #[test]
    fn season_mismatch_decays() {
        let q = item("opening", 1, None);
        let p = parsed("[Pack] Show TV 2 OP01 - Song (Artist).mkv");
        let right_season = score_file(&p, &q, Category::Opening, 2, None);
        let wrong_season = score_file(&p, &q, Category::Opening, 1, None);
        assert!(right_season > wrong_season);
    }
}
