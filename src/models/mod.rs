//! Small domain types shared across workers and repositories.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opening or ending. Stored in the `qitem.category` column as
/// `"opening"` / `"ending"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Category {
    #[value(alias = "op")]
    Opening,
    #[value(alias = "ed")]
    Ending,
}

impl Category {
    #[must_use]
    pub const fn as_db(self) -> &'static str {
        match self {
            Self::Opening => "opening",
            Self::Ending => "ending",
        }
    }

    /// Short form used in search queries and file-name tags ("op" / "ed").
    #[must_use]
    pub const fn short(self) -> &'static str {
        match self {
            Self::Opening => "op",
            Self::Ending => "ed",
        }
    }

    #[must_use]
    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "opening" => Some(Self::Opening),
            "ending" => Some(Self::Ending),
            _ => None,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_db())
    }
}

/// One pre-fetched attachment record on an Anime row, stored as a JSON array
/// in `anime.attachments`. `kind` is the uploader's label ("op", "ed", "pv"…).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub title: String,
    pub url: String,
}

/// Decode a JSON-array column of strings; absent or malformed means empty.
#[must_use]
pub fn string_list(column: Option<&String>) -> Vec<String> {
    column
        .and_then(|s| serde_json::from_str(s).ok())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_round_trip() {
        assert_eq!(Category::from_db("opening"), Some(Category::Opening));
        assert_eq!(Category::from_db("ending"), Some(Category::Ending));
        assert_eq!(Category::from_db("Opening"), None);
        assert_eq!(Category::Opening.short(), "op");
    }

    #[test]
    fn string_list_tolerates_junk() {
        assert!(string_list(None).is_empty());
        assert!(string_list(Some(&"not json".to_string())).is_empty());
        assert_eq!(
            string_list(Some(&r#"["a","b"]"#.to_string())),
            vec!["a".to_string(), "b".to_string()]
        );
    }
}
