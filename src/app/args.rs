use crate::bridge::{DEFAULT_MAX_LINE_BYTES, DEFAULT_PORT, DEFAULT_WORKERS};
use crate::types::Phase;
use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug, Clone)]
#[command(name = "event-bridge")]
#[command(about = "Centralized operation-event logging bridge")]
pub struct AppArgs {
    #[command(subcommand)]
    pub command: Option<Command>,

    #[arg(long, global = true, help = "Enable debug logging")]
    pub verbose: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the bridge (default)
    Serve(ServeArgs),
    /// Send a single event to a running bridge
    Send(SendArgs),
    /// Print the records held by a running bridge
    Query(QueryArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    #[arg(long, default_value = "127.0.0.1", help = "Address to listen on")]
    pub host: String,

    #[arg(
        long,
        help = "Port to listen on (or set EVENT_BRIDGE_PORT, default 25334)"
    )]
    pub port: Option<u16>,

    #[arg(long, default_value = "game_logs.txt", help = "Durable log file")]
    pub log_file: String,

    #[arg(long, default_value_t = DEFAULT_WORKERS, help = "Connections served in parallel")]
    pub workers: usize,

    #[arg(long, default_value_t = DEFAULT_MAX_LINE_BYTES, help = "Longest accepted request line")]
    pub max_line_bytes: usize,

    #[arg(long, help = "Answer getAllLogs, getLogsFor and clearLogs requests")]
    pub expose_queries: bool,
}

impl Default for ServeArgs {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: None,
            log_file: "game_logs.txt".to_string(),
            workers: DEFAULT_WORKERS,
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
            expose_queries: false,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum PhaseArg {
    Start,
    End,
}

impl From<PhaseArg> for Phase {
    fn from(phase: PhaseArg) -> Self {
        match phase {
            PhaseArg::Start => Phase::Start,
            PhaseArg::End => Phase::End,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct SendArgs {
    #[arg(long, default_value_t = default_addr(), help = "Bridge address")]
    pub addr: String,

    #[arg(long, value_enum, default_value = "start")]
    pub phase: PhaseArg,

    #[arg(long, help = "Logical timestamp (defaults to now, in milliseconds)")]
    pub timestamp: Option<i64>,

    #[arg(long)]
    pub source_id: String,

    #[arg(long)]
    pub operation: String,

    #[arg(
        long,
        default_value = "local_logs.json",
        help = "Where to save the event if it cannot be delivered"
    )]
    pub pending_file: String,

    #[arg(help = "Additional details, in order")]
    pub details: Vec<String>,
}

#[derive(Args, Debug, Clone)]
pub struct QueryArgs {
    #[arg(long, default_value_t = default_addr(), help = "Bridge address")]
    pub addr: String,

    #[arg(long, help = "Only records containing this source id")]
    pub source_id: Option<String>,

    #[arg(
        long,
        conflicts_with = "source_id",
        help = "Wipe the bridge's history instead of listing it"
    )]
    pub clear: bool,
}

fn default_addr() -> String {
    format!("127.0.0.1:{}", DEFAULT_PORT)
}

impl AppArgs {
    pub fn from_cli() -> Self {
        <Self as Parser>::parse()
    }
}
