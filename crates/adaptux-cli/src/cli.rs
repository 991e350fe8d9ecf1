use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::filter::LevelFilter;

/// Log level options for CLI
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    /// No logging output
    Off,
    /// Error messages only
    Error,
    /// Warnings and errors (default)
    Warn,
    /// Informational messages
    Info,
    /// Debug messages (default for verbose)
    Debug,
    /// Trace-level messages, including per-rule evaluation
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => LevelFilter::OFF,
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

#[derive(Parser)]
#[command(name = "adaptux")]
#[command(about = "adaptux - evaluate adaptive UI rules against behavioral signals")]
#[command(version)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Set log level (off, error, warn, info, debug, trace)
    /// If not specified, RUST_LOG is used, then 'warn'
    #[arg(short = 'l', long, global = true, value_enum)]
    pub log_level: Option<LogLevel>,

    /// Enable verbose logging (shortcut for --log-level=debug)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

impl Cli {
    /// Level requested on the command line, if any
    pub fn level_filter(&self) -> Option<LevelFilter> {
        match (self.log_level, self.verbose) {
            (Some(level), _) => Some(level.into()),
            (None, true) => Some(LevelFilter::DEBUG),
            (None, false) => None,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Load and normalize a config file, then report what the engine would see
    Check {
        /// Config file (.json, .yaml, .yml or .toml)
        #[arg(short = 'c', long)]
        config: PathBuf,
    },

    /// Run one set of signal values through a fresh engine
    ///
    /// Prints the resulting UI map as JSON.
    Eval {
        /// Config file (.json, .yaml, .yml or .toml)
        #[arg(short = 'c', long)]
        config: PathBuf,

        /// Signal values as a JSON object, e.g. '{"focus": 0.3}'
        #[arg(short = 's', long)]
        signals: String,

        /// Context entries as a JSON object, visible to match conditions
        #[arg(long)]
        context: Option<String>,
    },

    /// Stream recorded signal emissions through an engine
    ///
    /// Each input line is one emission such as
    /// `{"type": "scroll", "position": 840}`. Every adaptation change is
    /// printed as one JSON line, followed by the final UI map.
    Replay {
        /// Config file (.json, .yaml, .yml or .toml)
        #[arg(short = 'c', long)]
        config: PathBuf,

        /// JSON lines file to read, or '-' for stdin
        #[arg(short = 'e', long, default_value = "-")]
        events: PathBuf,
    },
}
