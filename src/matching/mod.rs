//! Scoring toolbox shared by the find strategies: similarity kernels, search
//! query preprocessing, and keyword bonus/veto scores.

pub mod pack_name;

use regex::Regex;
use std::sync::OnceLock;

/// Bell-ish kernel around `|x - y|`: 1 at equality, decaying with distance.
/// `k` adds a linear cutoff component on top of the rational decay.
#[must_use]
pub fn similarity(x: f64, y: f64, sigma: f64, p: f64, k: f64) -> f64 {
    let d = (x - y).abs();
    (1.0 - d * k).max(0.0) / (1.0 + 10f64.powf(sigma) * d.powf(p))
}

/// Duration kernel that forgives "too short" far more than "too long": a
/// candidate twice the expected length is almost certainly a full song, not
/// a TV-size cut.
#[must_use]
pub fn asymmetrical_similarity(x: f64, y: f64) -> f64 {
    if x < y {
        similarity(x, y, -1.0, 4.0, 0.0)
    } else {
        similarity(x, y, -8.0, 6.0, 0.008)
    }
}

/// S-curve that pushes mid scores toward the extremes; `k` controls how
/// hard. Used to sharpen fuzzy title scores before they multiply into the
/// total.
#[must_use]
pub fn contrast(x: f64, k: f64) -> f64 {
    if x < 0.5 {
        (x * 2.0).powf(k) / 2.0
    } else {
        1.0 - ((1.0 - x) * 2.0).powf(k) / 2.0
    }
}

/// `1 / (1 + |x - y|)^p` — proximity of two counts (theme numbers, seasons).
#[must_use]
pub fn divergence(x: f64, y: f64) -> f64 {
    1.0 / (1.0 + (x - y).abs()).powi(2)
}

/// Token-sorted fuzzy ratio in [0, 1].
#[must_use]
pub fn token_ratio(a: &str, b: &str) -> f64 {
    let mut ta: Vec<&str> = a.split_whitespace().collect();
    let mut tb: Vec<&str> = b.split_whitespace().collect();
    ta.sort_unstable();
    tb.sort_unstable();
    strsim::normalized_levenshtein(&ta.join(" "), &tb.join(" "))
}

/// Plain fuzzy ratio in [0, 1].
#[must_use]
pub fn ratio(a: &str, b: &str) -> f64 {
    strsim::normalized_levenshtein(a, b)
}

struct PreprocessRegex {
    strip: Regex,
    opening: Regex,
    ending: Regex,
    cat_number: Regex,
    bare_cat: Regex,
    season_word: Regex,
    ordinal_seasons: Vec<Regex>,
    digits: Regex,
    spaces: Regex,
}

fn preprocess_regex() -> &'static PreprocessRegex {
    static INSTANCE: OnceLock<PreprocessRegex> = OnceLock::new();
    INSTANCE.get_or_init(|| PreprocessRegex {
        strip: Regex::new(r"[^A-Za-z0-9 \-!?:/]").expect("Invalid Regex"),
        opening: Regex::new(r"\bopening\b").expect("Invalid Regex"),
        ending: Regex::new(r"\bending\b").expect("Invalid Regex"),
        cat_number: Regex::new(r"\b(op|ed)\b +([0-9]+)").expect("Invalid Regex"),
        bare_cat: Regex::new(r"\b(op|ed)\b").expect("Invalid Regex"),
        season_word: Regex::new(r"\bseason\b +([0-9]+)").expect("Invalid Regex"),
        ordinal_seasons: [
            "1st", "2nd", "3rd", "4th", "5th", "6th", "7th", "8th", "9th", "10th",
        ]
        .iter()
        .map(|s| Regex::new(&format!(r"{s} +\bseason\b")).expect("Invalid Regex"))
        .collect(),
        digits: Regex::new(r"[0-9]").expect("Invalid Regex"),
        spaces: Regex::new(r" {2,}").expect("Invalid Regex"),
    })
}

/// Normalize a title or query before fuzzy comparison: lowercase, strip
/// punctuation, collapse "opening 2" → "op2", "3rd season" → "s3". `num_w`
/// repeats every digit so numeric disagreements cost more than letter ones.
#[must_use]
pub fn preprocess(title: &str, num_w: usize) -> String {
    let r = preprocess_regex();
    let mut t = title.to_lowercase().trim().to_string();
    t = r.strip.replace_all(&t, " ").into_owned();
    t = r.opening.replace_all(&t, "op").into_owned();
    t = r.ending.replace_all(&t, "ed").into_owned();
    t = r.cat_number.replace_all(&t, "$1$2").into_owned();
    t = r.bare_cat.replace_all(&t, "${1}1").into_owned();
    t = r.season_word.replace_all(&t, "s$1").into_owned();
    for (i, re) in r.ordinal_seasons.iter().enumerate() {
        t = re.replace_all(&t, format!("s{}", i + 1)).into_owned();
    }
    if num_w > 1 {
        t = r
            .digits
            .replace_all(&t, |c: &regex::Captures<'_>| c[0].repeat(num_w))
            .into_owned();
    }
    r.spaces.replace_all(&t, " ").into_owned()
}

/// Fraction of `keywords` found in `s` (case-sensitive, like the provider
/// titles they are matched against).
#[must_use]
pub fn keyword_score(keywords: &[String], s: &str) -> f64 {
    if keywords.is_empty() {
        return 0.0;
    }
    let hits = keywords.iter().filter(|w| s.contains(w.as_str())).count();
    hits as f64 / keywords.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn similarity_peaks_at_equality() {
        assert!((asymmetrical_similarity(90.0, 90.0) - 1.0).abs() < 1e-9);
        assert!(asymmetrical_similarity(60.0, 90.0) > 0.0);
    }

    #[test]
    fn too_long_is_punished_harder_than_too_short() {
        let short = asymmetrical_similarity(60.0, 90.0);
        let long = asymmetrical_similarity(120.0, 90.0);
        assert!(long < short);
    }

    #[test]
    fn contrast_sharpens_mid_scores() {
        assert!(contrast(0.3, 2.5) < 0.3);
        assert!(contrast(0.8, 2.5) > 0.8);
        assert!((contrast(0.5, 2.5) - 0.5).abs() < 1e-9);
        assert!((contrast(1.0, 2.5) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn preprocess_collapses_category_forms() {
        assert_eq!(preprocess("Naruto Opening 2", 1), "naruto op2");
        assert_eq!(preprocess("Bleach ENDING", 1), "bleach ed1");
        assert_eq!(preprocess("Gintama 3rd Season", 1), "gintama s3");
        assert_eq!(preprocess("K-On! season 2", 1), "k-on! s2");
    }

    #[test]
    fn preprocess_weighs_digits() {
        assert_eq!(preprocess("op 12", 3), "op111222");
    }

    #[test]
    fn keyword_score_counts_fraction() {
        let ks = vec!["Creditless".to_string(), "1080p".to_string()];
        assert!((keyword_score(&ks, "NCOP Creditless 1080p") - 1.0).abs() < 1e-9);
        assert!((keyword_score(&ks, "Creditless only") - 0.5).abs() < 1e-9);
        assert!((keyword_score(&ks, "nothing") - 0.0).abs() < 1e-9);
    }

    #[test]
    fn divergence_decays_with_distance() {
        assert!((divergence(3.0, 3.0) - 1.0).abs() < 1e-9);
        assert!(divergence(3.0, 4.0) < divergence(3.0, 3.0));
        assert!(divergence(3.0, 5.0) < divergence(3.0, 4.0));
    }
}
