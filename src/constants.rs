//! Names shared across workers, strategies and the filesystem layout.

pub const STRATEGY_ATTACHMENTS: &str = "strategy_attachments";
pub const STRATEGY_VIDEO_SEARCH: &str = "strategy_video_search";
pub const STRATEGY_TORRENT_PACK: &str = "strategy_torrent_pack";
pub const STRATEGY_DEFAULT_TIMING: &str = "strategy_default";
pub const STRATEGY_RANDOM_TIMING: &str = "strategy_random";
pub const STRATEGY_RANDOM_DIFFICULTY: &str = "strategy_random";

pub const PLATFORM_LOCAL: &str = "local";
pub const PLATFORM_YTDLP: &str = "yt-dlp";
pub const PLATFORM_TORRENT: &str = "torrent";

/// `resources_dir` subtrees.
pub const SOURCES_DIR: &str = "videos/sources";
pub const QUIZPARTS_DIR: &str = "videos/quizparts";
pub const QUIZ_DIR: &str = "videos/quiz";
pub const WORKERS_DIR: &str = "workers";

/// `static_dir` entries.
pub const COUNTDOWNS_DIR: &str = "video/countdowns";
pub const PACK_TORRENT_FILE: &str = "anitousen.torrent";

pub const QBT_CATEGORY: &str = "quizarr";

/// Catalog fetches go out with a browser-like identity; some hosts refuse
/// obvious bots.
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                              (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";
