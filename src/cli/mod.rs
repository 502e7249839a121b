//! Command-line interface: one subcommand per worker loop plus the one-shot
//! maintenance jobs. Loop pacing flags default to the config file values.

use clap::{Args, Parser, Subcommand};

use crate::models::Category;

/// quizarr - anime music quiz content pipeline
#[derive(Parser)]
#[command(name = "quizarr")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Pacing flags shared by the long-running workers.
#[derive(Args, Debug, Clone, Copy)]
pub struct LoopArgs {
    /// Seconds between job runs
    #[arg(short = 't', long = "interval")]
    pub interval: Option<u64>,

    /// Seconds to sleep when no jobs were found
    #[arg(short = 'w', long = "wait")]
    pub wait: Option<u64>,

    /// Seconds a row stays banned after a temporary failure
    #[arg(short = 'b', long = "ban-duration")]
    pub ban_duration: Option<u64>,

    /// Seconds to delay this worker's start
    #[arg(short = 'd', long = "delay")]
    pub startup_delay: Option<u64>,
}

/// Row filters shared by the quiz-part worker and the assembler.
#[derive(Args, Debug, Clone, Default)]
pub struct FilterArgs {
    /// Restrict to one category
    #[arg(short = 'c', long = "category", value_enum)]
    pub category: Option<Category>,

    /// Restrict to these anime (MAL ids)
    #[arg(short = 'a', long = "anime", value_delimiter = ',')]
    pub anime_ids: Vec<i32>,

    /// Accept only sources found by these strategies
    #[arg(short = 's', long = "source-strategy", value_delimiter = ',')]
    pub source_strategies: Vec<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the source-find workers (one loop per configured strategy)
    Find {
        #[command(flatten)]
        loop_args: LoopArgs,
    },

    /// Run a source-download worker for one platform
    Download {
        /// Platform to serve: local, yt-dlp or torrent
        #[arg(value_name = "PLATFORM")]
        platform: String,

        #[command(flatten)]
        loop_args: LoopArgs,
    },

    /// Poll the torrent client and finalize finished downloads
    TorrentStatus {
        /// Seconds between polls
        #[arg(short = 't', long = "interval", default_value = "15")]
        interval: u64,
    },

    /// Run the timing worker
    Timing {
        #[command(flatten)]
        loop_args: LoopArgs,
    },

    /// Run the difficulty worker
    Difficulty {
        #[command(flatten)]
        loop_args: LoopArgs,
    },

    /// Run the quiz-part render worker
    Quizpart {
        #[command(flatten)]
        loop_args: LoopArgs,

        #[command(flatten)]
        filters: FilterArgs,

        /// Rendering style
        #[arg(long = "style", default_value = crate::video::STYLE_CLASSIC)]
        style: String,

        /// Keep renders demoted by a better-priority combination
        #[arg(short = 'k', long = "keep-demoted")]
        keep_demoted: bool,
    },

    /// Assemble a quiz from rendered parts (one-shot)
    Assemble {
        #[command(flatten)]
        filters: FilterArgs,

        /// Accept only timings by these strategies
        #[arg(short = 't', long = "timing-strategy", value_delimiter = ',')]
        timing_strategies: Vec<String>,

        /// Accept only difficulties by these strategies
        #[arg(short = 'd', long = "difficulty-strategy", value_delimiter = ',')]
        difficulty_strategies: Vec<String>,

        /// Accept these styles (default: all)
        #[arg(long = "style", value_delimiter = ',')]
        styles: Vec<String>,

        /// Number of parts in the quiz
        #[arg(short = 'n', long = "count", default_value = "20")]
        count: usize,

        /// Output file name under videos/quiz/
        #[arg(short = 'o', long = "output")]
        output: String,

        /// Random pick policy
        #[arg(short = 'r', long = "random", value_enum, default_value = "simple")]
        policy: PolicyArg,

        /// Memory size for the memory policy
        #[arg(short = 'M', long = "memory", default_value = "5")]
        memory: usize,
    },

    /// Remove orphaned files and rows, demote duplicate downloads (one-shot)
    Cleanup,

    /// Refresh the offline anime database mirror (one-shot)
    AodUpdate,

    /// Create a default config file
    Init,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum PolicyArg {
    Simple,
    Memory,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn download_takes_a_platform() {
        let cli = Cli::parse_from(["quizarr", "download", "local", "-t", "5", "-b", "60"]);
        match cli.command {
            Some(Commands::Download {
                platform,
                loop_args,
            }) => {
                assert_eq!(platform, "local");
                assert_eq!(loop_args.interval, Some(5));
                assert_eq!(loop_args.ban_duration, Some(60));
                assert_eq!(loop_args.wait, None);
            }
            _ => panic!("wrong command"),
        }
    }

    #[test]
    fn assemble_strategy_allow_lists_parse() {
        let cli = Cli::parse_from([
            "quizarr", "assemble", "-o", "quiz.mp4", "-n", "10", "-r", "memory", "-M", "3", "-t",
            "manual,strategy_default", "-c", "op",
        ]);
        match cli.command {
            Some(Commands::Assemble {
                timing_strategies,
                policy,
                memory,
                count,
                filters,
                ..
            }) => {
                assert_eq!(timing_strategies, vec!["manual", "strategy_default"]);
                assert_eq!(policy, PolicyArg::Memory);
                assert_eq!(memory, 3);
                assert_eq!(count, 10);
                assert_eq!(filters.category, Some(Category::Opening));
            }
            _ => panic!("wrong command"),
        }
    }

    #[test]
    fn quizpart_flags_parse() {
        let cli = Cli::parse_from([
            "quizarr", "quizpart", "-k", "--style", "onesec", "-a", "1,2", "-s",
            "manual",
        ]);
        match cli.command {
            Some(Commands::Quizpart {
                keep_demoted,
                style,
                filters,
                ..
            }) => {
                assert!(keep_demoted);
                assert_eq!(style, "onesec");
                assert_eq!(filters.anime_ids, vec![1, 2]);
                assert_eq!(filters.source_strategies, vec!["manual"]);
            }
            _ => panic!("wrong command"),
        }
    }
}
