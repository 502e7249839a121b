//! File-name grammar of curated theme-song torrent packs:
//! `[TAG] <show title> - <song name> (<artist>).ext`, where the show title
//! ends in a space-separated tag set such as `TV 2 OP03 v2` or
//! `Movie 1-6 ED01 EP04`.

use crate::models::Category;
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

#[derive(Debug, Clone)]
pub struct PackFileName {
    /// Show title with the trailing tag set still attached (tags are decoded
    /// into the fields below).
    pub show_title: String,
    pub song_name: String,
    pub song_artist: String,
    /// Show-type tag → season number (`TV 2` → ("tv", 2); bare `OVA` → 1).
    pub show_types: HashMap<String, i32>,
    pub theme_type: Category,
    pub theme_num: i32,
    /// `v2` and friends; `None` means unversioned (treated as v1).
    pub version: Option<i32>,
    /// `EP04`: the theme only plays on one episode.
    pub episode: Option<i32>,
}

struct PackRegex {
    global: Regex,
    tag: Regex,
    tag_num: Regex,
    season: Regex,
    number: Regex,
}

fn pack_regex() -> &'static PackRegex {
    static INSTANCE: OnceLock<PackRegex> = OnceLock::new();
    INSTANCE.get_or_init(|| PackRegex {
        global: Regex::new(r"^\[[^\]]+\] (.+?) - (.+) \((.+)\)\.[^.]+$").expect("Invalid Regex"),
        tag: Regex::new(r"([A-Za-z]+)[ -]?(\d+-\d+|\d+)?(?: |, |$)").expect("Invalid Regex"),
        tag_num: Regex::new(r"^(?:(\d+)-(\d+)|(\d+))$").expect("Invalid Regex"),
        season: Regex::new(r"(?i)(?:season *(\d+)|(\d+)(?:st|nd|rd|th)? *season|\bs(\d+)\b)")
            .expect("Invalid Regex"),
        number: Regex::new(r"\b(\d+)\b").expect("Invalid Regex"),
    })
}

/// Parse one pack file name. `None` when the name does not follow the
/// grammar (the caller scores such files as zero).
#[must_use]
pub fn parse(filename: &str) -> Option<PackFileName> {
    let r = pack_regex();
    let caps = r.global.captures(filename)?;
    let show_title = caps[1].trim().to_string();
    let song_name = caps[2].to_string();
    let song_artist = caps[3].to_string();

    let mut show_types = HashMap::new();
    let mut theme_type = None;
    let mut theme_num = 1;
    let mut version = None;
    let mut episode = None;

    // Tags trail the title; words that do not decode as tags are title text.
    for caps in r.tag.captures_iter(&show_title) {
        let name = caps[1].to_lowercase();
        let name = if name == "sp" { "special".to_string() } else { name };

        let num = caps.get(2).and_then(|m| {
            let nc = r.tag_num.captures(m.as_str())?;
            // A range like `1-6` counts as its first entry.
            nc.get(3)
                .or_else(|| nc.get(1))
                .and_then(|g| g.as_str().parse::<i32>().ok())
        });

        match name.as_str() {
            "tv" | "special" | "ona" | "ova" | "movie" | "game" => {
                show_types.insert(name, num.unwrap_or(1));
            }
            "op" | "ed" => {
                theme_type = Some(if name == "op" {
                    Category::Opening
                } else {
                    Category::Ending
                });
                theme_num = num.unwrap_or(1);
            }
            "v" => version = num,
            "ep" => episode = num,
            _ => {}
        }
    }

    Some(PackFileName {
        show_title,
        song_name,
        song_artist,
        show_types,
        // A handful of pack entries omit the theme tag; they are openings.
        theme_type: theme_type.unwrap_or(Category::Opening),
        theme_num,
        version,
        episode,
    })
}

/// Which season of the show this anime is, inferred from its titles: an
/// explicit `season N` / `Nth season` / `sN` marker wins; otherwise the most
/// frequent bare number across titles, when it repeats enough to be a
/// pattern rather than part of a name.
#[must_use]
pub fn infer_season(titles: &[String]) -> i32 {
    let r = pack_regex();
    let mut numbers: HashMap<i32, usize> = HashMap::new();

    for title in titles {
        if title.is_empty() {
            continue;
        }
        if let Some(caps) = r.season.captures(title) {
            let n = caps
                .get(1)
                .or_else(|| caps.get(2))
                .or_else(|| caps.get(3))
                .and_then(|m| m.as_str().parse::<i32>().ok());
            if let Some(n) = n {
                return n;
            }
        }
        if let Some(caps) = r.number.captures(title)
            && let Ok(n) = caps[1].parse::<i32>()
        {
            *numbers.entry(n).or_insert(0) += 1;
        }
    }

    let (best, count) = numbers
        .into_iter()
        .max_by_key(|&(n, c)| (c, std::cmp::Reverse(n)))
        .unwrap_or((0, 0));
    if count > 3 { best } else { 1 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_op_entry() {
        let f = parse("[AniTousen] Fullmetal Alchemist TV 1 OP01 - Melissa (Porno Graffitti).mkv")
            .unwrap();
        assert_eq!(f.theme_type, Category::Opening);
        assert_eq!(f.theme_num, 1);
        assert_eq!(f.show_types.get("tv"), Some(&1));
        assert_eq!(f.song_name, "Melissa");
        assert_eq!(f.song_artist, "Porno Graffitti");
        assert_eq!(f.version, None);
        assert_eq!(f.episode, None);
    }

    #[test]
    fn parses_version_and_episode_tags() {
        let f = parse("[Pack] Gintama TV 2 ED04 v2 EP12 - Song (Artist).webm").unwrap();
        assert_eq!(f.theme_type, Category::Ending);
        assert_eq!(f.theme_num, 4);
        assert_eq!(f.show_types.get("tv"), Some(&2));
        assert_eq!(f.version, Some(2));
        assert_eq!(f.episode, Some(12));
    }

    #[test]
    fn movie_range_counts_as_first() {
        let f = parse("[Pack] Kara no Kyoukai Movie 1-6 OP01 - Oblivious (Kalafina).mkv").unwrap();
        assert_eq!(f.show_types.get("movie"), Some(&1));
    }

    #[test]
    fn sp_is_an_alias_for_special() {
        let f = parse("[Pack] Some Show SP 1 OP02 - Name (Who).mkv").unwrap();
        assert_eq!(f.show_types.get("special"), Some(&1));
    }

    #[test]
    fn missing_theme_tag_defaults_to_opening() {
        let f = parse("[Pack] Lone Exception TV 1 - Name (Who).mkv").unwrap();
        assert_eq!(f.theme_type, Category::Opening);
        assert_eq!(f.theme_num, 1);
    }

    #[test]
    fn non_grammar_names_are_rejected() {
        assert!(parse("random_video.mkv").is_none());
        assert!(parse("[Pack] no song part.mkv").is_none());
    }

    #[test]
    fn season_markers_win() {
        assert_eq!(infer_season(&["Shingeki no Kyojin Season 3".to_string()]), 3);
        assert_eq!(infer_season(&["Gintama 4th season".to_string()]), 4);
        assert_eq!(infer_season(&["Overlord s2".to_string()]), 2);
    }

    #[test]
    fn frequent_bare_number_needs_quorum() {
        let titles: Vec<String> = ["Title 2", "T2", "Second 2", "Another 2", "More 2"]
            .iter()
            .map(|s| (*s).to_string())
            .collect();
        assert_eq!(infer_season(&titles), 2);
        assert_eq!(infer_season(&["Evangelion 1995".to_string()]), 1);
        assert_eq!(infer_season(&[]), 1);
    }
}
