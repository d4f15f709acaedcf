use std::path::PathBuf;

use clap::Parser;

/// Sends one prompt through the engine and prints the answer.
#[derive(Debug, Parser)]
#[command(name = "switchboard", version, about)]
pub struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, env = "SWITCHBOARD_CONFIG", default_value = "./switchboard.toml")]
    pub config: PathBuf,

    /// Model identifier to route.
    #[arg(short, long, env = "SWITCHBOARD_MODEL")]
    pub model: String,

    /// Optional system message sent before the prompt.
    #[arg(long)]
    pub system: Option<String>,

    /// Print fragments as they arrive.
    #[arg(long)]
    pub stream: bool,

    /// Prefer reasoning-capable providers.
    #[arg(long)]
    pub reasoning: bool,

    /// Augment the prompt with search results.
    #[arg(long)]
    pub search: bool,

    /// Dispatch straight to the backup channel.
    #[arg(long)]
    pub prefer_backup: bool,

    /// Serve models marked as restricted.
    #[arg(long)]
    pub allow_restricted: bool,

    #[arg(long)]
    pub max_tokens: Option<u32>,

    #[arg(long)]
    pub temperature: Option<f32>,

    /// Sampling seed forwarded to backends that accept one.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Log filter, e.g. "info" or "llm=debug".
    #[arg(long, env = "SWITCHBOARD_LOG", default_value = "info")]
    pub log: String,

    /// Print the collected spans to stderr on exit.
    #[arg(long)]
    pub trace: bool,

    /// The prompt. Read from stdin when omitted.
    pub prompt: Option<String>,
}
