use crate::domain::config::TransportKind;
use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};

/// Command line arguments for tarot-live
#[derive(Parser, Debug)]
#[command(
    name = "tarot-live",
    version = env!("CARGO_PKG_VERSION"),
    about = "Live session and notification feed for the Tarot admin console",
    long_about = "Keeps a STOMP link to the Tarot marketplace backend, tails admin notifications and reading sessions as they happen, and publishes test frames."
)]
pub struct Args {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress log output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text", global = true)]
    pub output: OutputFormat,

    /// Command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Stream live events until interrupted
    Watch(WatchArgs),
    /// Send one JSON frame to a destination
    Publish(PublishArgs),
    /// List the configured topics
    Topics,
    /// Configuration management commands
    Config(ConfigArgs),
    /// Display version information
    Version,
}

/// Output format options
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum OutputFormat {
    /// Human-readable text output
    #[default]
    Text,
    /// JSON output, one document per event
    Json,
    /// Table output
    Table,
    /// CSV output
    Csv,
}

/// Connection overrides shared by commands that open a link
#[derive(ClapArgs, Debug, Default)]
pub struct ConnectArgs {
    /// Server origin, overrides config and environment
    #[arg(long)]
    pub server: Option<String>,

    /// Transport (auto, websocket, sockjs, xhr-polling)
    #[arg(long)]
    pub transport: Option<TransportKind>,

    /// Treat the hosting page as HTTPS
    #[arg(long)]
    pub secure: bool,
}

/// Arguments for `watch`
#[derive(ClapArgs, Debug)]
pub struct WatchArgs {
    /// Topic to subscribe to; repeatable. Defaults to the configured topics.
    #[arg(short, long = "topic")]
    pub topics: Vec<String>,

    /// Size of the live lists
    #[arg(short, long)]
    pub max: Option<usize>,

    /// Exit after this many events
    #[arg(short = 'n', long)]
    pub count: Option<u64>,

    /// Show each session once, moving it to the top when it is updated
    #[arg(long)]
    pub dedupe: bool,

    #[command(flatten)]
    pub connect: ConnectArgs,
}

/// Arguments for `publish`
#[derive(ClapArgs, Debug)]
pub struct PublishArgs {
    /// Destination, e.g. /app/admin/ping
    pub destination: String,

    /// JSON body
    pub body: String,

    /// Seconds to wait for the connection before giving up
    #[arg(long, default_value = "10")]
    pub wait: u64,

    #[command(flatten)]
    pub connect: ConnectArgs,
}

/// Configuration management arguments
#[derive(ClapArgs, Debug)]
pub struct ConfigArgs {
    /// Configuration subcommand
    #[command(subcommand)]
    pub command: ConfigCommand,
}

/// Configuration management subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show the effective configuration
    Show,
    /// Validate a configuration file
    Validate {
        /// Configuration file path
        file: Option<String>,
    },
    /// Create a default configuration
    Init {
        /// Directory to create `.tarot-live/config.toml` in
        #[arg(short, long)]
        dir: Option<String>,
        /// Write the global configuration instead
        #[arg(short, long)]
        global: bool,
    },
    /// Print the configuration file locations
    Path,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Table => write!(f, "table"),
            OutputFormat::Csv => write!(f, "csv"),
        }
    }
}
