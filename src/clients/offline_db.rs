//! Anime-offline-database refresh: download the minified dump, extract the
//! (MAL, AniDB) id pair from each entry's source URLs, and wholesale-replace
//! the `aod_anime` mirror. Strategies read the mirror for type and season
//! inference.

use anyhow::{Context, Result};
use regex::Regex;
use sea_orm::Set;
use serde::Deserialize;
use std::sync::OnceLock;
use tracing::info;

use crate::constants;
use crate::db::Store;
use crate::entities::aod_anime;

const DATABASE_URL: &str = "https://github.com/manami-project/anime-offline-database/releases/latest/download/anime-offline-database-minified.json.zst";

#[derive(Debug, Deserialize)]
struct DatabaseRoot {
    #[serde(default, rename = "lastUpdate")]
    last_update: String,
    data: Vec<AnimeEntry>,
}

#[derive(Debug, Deserialize)]
struct AnimeEntry {
    title: String,
    sources: Vec<String>,
    #[serde(default)]
    synonyms: Vec<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    episodes: i32,
    #[serde(default, rename = "type")]
    anime_type: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    picture: String,
    #[serde(default, rename = "animeSeason")]
    anime_season: Option<AnimeSeason>,
    #[serde(default)]
    duration: Option<DurationEntry>,
}

#[derive(Debug, Deserialize)]
struct AnimeSeason {
    #[serde(default)]
    season: String,
    year: Option<i32>,
}

#[derive(Debug, Deserialize)]
struct DurationEntry {
    #[serde(default)]
    value: i64,
}

fn extract_id(re: &Regex, sources: &[String]) -> Option<i32> {
    sources
        .iter()
        .find_map(|s| re.captures(s))
        .and_then(|c| c[1].parse().ok())
}

fn mal_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^https://myanimelist\.net/anime/([0-9]+)$").expect("Invalid Regex")
    })
}

fn anidb_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^https://anidb\.net/anime/([0-9]+)").expect("Invalid Regex"))
}

fn entry_to_model(entry: &AnimeEntry, now: &str) -> Option<aod_anime::ActiveModel> {
    // Only entries carrying both catalog ids are useful to us.
    let mal_id = extract_id(mal_regex(), &entry.sources)?;
    let anidb_id = extract_id(anidb_regex(), &entry.sources)?;

    let (season, year) = entry
        .anime_season
        .as_ref()
        .map_or((String::new(), None), |s| (s.season.clone(), s.year));

    Some(aod_anime::ActiveModel {
        mal_id: Set(mal_id),
        anidb_id: Set(anidb_id),
        title: Set(entry.title.clone()),
        poster_url: Set(if entry.picture.is_empty() {
            None
        } else {
            Some(entry.picture.clone())
        }),
        episodes: Set(entry.episodes),
        duration: Set(entry
            .duration
            .as_ref()
            .and_then(|d| i32::try_from(d.value).ok())),
        release_year: Set(year),
        release_season: Set(season.to_lowercase()),
        status: Set(entry.status.to_lowercase()),
        anime_type: Set(entry.anime_type.to_lowercase()),
        sources: Set(serde_json::to_string(&entry.sources).ok()?),
        tags: Set(serde_json::to_string(&entry.tags).ok()?),
        synonyms: Set(serde_json::to_string(&entry.synonyms).ok()?),
        created_at: Set(now.to_string()),
        updated_at: Set(now.to_string()),
    })
}

pub async fn update(store: &Store) -> Result<usize> {
    let client = reqwest::Client::builder()
        .user_agent(constants::USER_AGENT)
        .build()?;

    info!("Downloading offline database...");
    let compressed = client
        .get(DATABASE_URL)
        .send()
        .await?
        .error_for_status()?
        .bytes()
        .await
        .context("downloading offline database")?;
    info!("Downloaded {} bytes", compressed.len());

    // Decompression and parsing are CPU-bound; keep them off the runtime.
    let root: DatabaseRoot = tokio::task::spawn_blocking(move || -> Result<DatabaseRoot> {
        let raw = zstd::decode_all(compressed.as_ref()).context("decompressing dump")?;
        Ok(serde_json::from_slice(&raw)?)
    })
    .await??;

    info!(
        "Offline database from {}: {} entries",
        root.last_update,
        root.data.len()
    );

    let now = crate::db::now();
    let models: Vec<aod_anime::ActiveModel> = root
        .data
        .iter()
        .filter_map(|e| entry_to_model(e, &now))
        .collect();

    store.animes().replace_aod(models).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(sources: &[&str]) -> AnimeEntry {
        AnimeEntry {
            title: "Example".to_string(),
            sources: sources.iter().map(|s| (*s).to_string()).collect(),
            synonyms: vec![],
            tags: vec![],
            episodes: 12,
            anime_type: "TV".to_string(),
            status: "FINISHED".to_string(),
            picture: String::new(),
            anime_season: Some(AnimeSeason {
                season: "SPRING".to_string(),
                year: Some(2019),
            }),
            duration: None,
        }
    }

    #[test]
    fn extracts_both_catalog_ids() {
        let e = entry(&[
            "https://anidb.net/anime/4563",
            "https://myanimelist.net/anime/5114",
            "https://kitsu.app/anime/3919",
        ]);
        let m = entry_to_model(&e, "2026-01-01T00:00:00Z").unwrap();
        assert_eq!(m.mal_id, Set(5114));
        assert_eq!(m.anidb_id, Set(4563));
        assert_eq!(m.anime_type, Set("tv".to_string()));
        assert_eq!(m.release_season, Set("spring".to_string()));
    }

    #[test]
    fn entries_missing_an_id_are_skipped() {
        let e = entry(&["https://myanimelist.net/anime/5114"]);
        assert!(entry_to_model(&e, "2026-01-01T00:00:00Z").is_none());
    }
}
